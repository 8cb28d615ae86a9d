//! Time parsing and formatting utilities

use crate::domain::plan::SegmentPlan;
use crate::error::{PipelineError, PipelineResult};

/// Time parser for the formats accepted on the command line
#[derive(Debug, Default)]
pub struct TimeParser;

impl TimeParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse seconds, `MM:SS(.ms)` or `HH:MM:SS(.ms)` into seconds
    pub fn parse_time(&self, time_str: &str) -> PipelineResult<f64> {
        let time_str = time_str.trim();
        let invalid = || PipelineError::InvalidConfig {
            message: format!("invalid time '{}'", time_str),
        };

        let parts: Vec<&str> = time_str.split(':').collect();
        if parts.len() > 3 || parts.iter().any(|part| part.is_empty()) {
            return Err(invalid());
        }

        let mut seconds = 0.0;
        for (position, part) in parts.iter().enumerate() {
            let value: f64 = part.trim().parse().map_err(|_| invalid())?;
            let is_last = position + 1 == parts.len();
            if !value.is_finite() || value < 0.0 || (!is_last && value.fract() != 0.0) {
                return Err(invalid());
            }
            // Minutes and seconds fields of a clock time stay below 60
            if position > 0 && value >= 60.0 {
                return Err(invalid());
            }
            seconds = seconds * 60.0 + value;
        }
        Ok(seconds)
    }

    /// Format seconds to `HH:MM:SS.mmm` (hours omitted when zero)
    pub fn format_time(&self, seconds: f64) -> String {
        let total_ms = (seconds * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        let milliseconds = total_ms % 1000;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, milliseconds)
        } else {
            format!("{:02}:{:02}.{:03}", minutes, secs, milliseconds)
        }
    }

    /// Parse `START-END@SPEED`; the speed defaults to 1.0 when omitted
    pub fn parse_segment(&self, spec: &str) -> PipelineResult<(f64, f64, f64)> {
        let spec = spec.trim();
        let invalid = |reason: &str| PipelineError::InvalidConfig {
            message: format!("invalid segment '{}': {}", spec, reason),
        };

        let (range, speed) = match spec.split_once('@') {
            Some((range, speed)) => {
                let speed: f64 = speed
                    .trim()
                    .trim_end_matches(['x', 'X'])
                    .parse()
                    .map_err(|_| invalid("speed is not a number"))?;
                (range, speed)
            }
            None => (spec, 1.0),
        };

        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| invalid("expected START-END@SPEED"))?;
        Ok((self.parse_time(start)?, self.parse_time(end)?, speed))
    }

    /// Build a plan from several `START-END@SPEED` strings
    pub fn parse_plan<S: AsRef<str>>(&self, specs: &[S]) -> PipelineResult<SegmentPlan> {
        let mut starts = Vec::with_capacity(specs.len());
        let mut ends = Vec::with_capacity(specs.len());
        let mut speeds = Vec::with_capacity(specs.len());
        for spec in specs {
            let (start, end, speed) = self.parse_segment(spec.as_ref())?;
            starts.push(start);
            ends.push(end);
            speeds.push(speed);
        }
        SegmentPlan::from_arrays(&starts, &ends, &speeds)
    }
}
