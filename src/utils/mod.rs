//! Common utilities and helpers

pub mod logging;
pub mod time;

use crate::domain::timeline::{micros_to_secs, Micros};

/// Format a microsecond timestamp as `MM:SS.mmm` / `HH:MM:SS.mmm`
pub fn format_micros(micros: Micros) -> String {
    time::TimeParser::new().format_time(micros_to_secs(micros.max(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_micros() {
        assert_eq!(format_micros(4_750_000), "00:04.750");
        assert_eq!(format_micros(-5), "00:00.000");
    }
}
