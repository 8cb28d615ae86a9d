// Timeline arithmetic - maps source timestamps onto the sped-up output timeline

use crate::domain::plan::Segment;

/// Timestamps and durations in microseconds
pub type Micros = i64;

pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// Convert floating point seconds to microseconds, truncating toward zero
pub fn secs_to_micros(seconds: f64) -> Micros {
    (seconds * MICROS_PER_SECOND as f64) as Micros
}

/// Convert microseconds to floating point seconds
pub fn micros_to_secs(micros: Micros) -> f64 {
    micros as f64 / MICROS_PER_SECOND as f64
}

/// Pure mapping from source time to output time for one segment
pub struct TimelineMapper;

impl TimelineMapper {
    /// Output pts of a source pts inside `segment`, given the stream's cursor
    pub fn map_pts(segment: &Segment, source_pts: Micros, output_cursor: Micros) -> Micros {
        let relative = (source_pts - segment.start()) as f64;
        output_cursor + (relative / segment.speed()) as Micros
    }

    /// Length of the segment once laid onto the output timeline
    pub fn output_duration(segment: &Segment) -> Micros {
        (segment.source_duration() as f64 / segment.speed()) as Micros
    }
}

/// Per-stream output cursor, advanced once per finished segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineState {
    output_cursor: Micros,
}

impl TimelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_cursor(&self) -> Micros {
        self.output_cursor
    }

    /// Output pts for a packet of `segment` at the current cursor
    pub fn map(&self, segment: &Segment, source_pts: Micros) -> Micros {
        TimelineMapper::map_pts(segment, source_pts, self.output_cursor)
    }

    /// Lay the whole segment onto the output timeline; returns the new cursor
    pub fn finish_segment(&mut self, segment: &Segment) -> Micros {
        self.output_cursor += TimelineMapper::output_duration(segment);
        self.output_cursor
    }
}

/// Output clock for the re-encoded audio stream.
///
/// Pts are derived from the total frame count since the last anchor, so
/// integer truncation does not accumulate across pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioClock {
    sample_rate: u32,
    anchor: Micros,
    frames_since_anchor: u64,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            anchor: 0,
            frames_since_anchor: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Pts of the next frame to be emitted
    pub fn current_pts(&self) -> Micros {
        let elapsed = self.frames_since_anchor as i128 * MICROS_PER_SECOND as i128
            / self.sample_rate as i128;
        self.anchor + elapsed as Micros
    }

    /// Account for `frames` emitted frames; returns the pts they start at
    pub fn advance(&mut self, frames: usize) -> Micros {
        let pts = self.current_pts();
        self.frames_since_anchor += frames as u64;
        pts
    }

    /// Re-anchor the clock at `at`. The clock never moves backwards, so an
    /// anchor behind the current position is ignored.
    pub fn anchor(&mut self, at: Micros) -> Micros {
        let current = self.current_pts();
        if at > current {
            self.anchor = at;
            self.frames_since_anchor = 0;
        }
        self.current_pts()
    }
}

/// Keeps one output track's decode timestamps strictly increasing.
///
/// Works in the track's own time-base ticks. A packet whose dts does not
/// move past the previous one (keyframe slack landing behind the previous
/// segment's tail) is placed one tick after it, and its pts is raised so it
/// never precedes its dts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOrder {
    last_dts: Option<i64>,
}

impl DecodeOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(pts, dts)` to write for a packet stamped `pts`/`dts`
    pub fn stamp(&mut self, pts: i64, dts: i64) -> (i64, i64) {
        let dts = match self.last_dts {
            Some(last) if dts <= last => last + 1,
            _ => dts,
        };
        self.last_dts = Some(dts);
        (pts.max(dts), dts)
    }
}
