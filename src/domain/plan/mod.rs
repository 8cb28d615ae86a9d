// Segment plan - validated, ordered speed segments for one processing run

use serde::Serialize;
use std::fmt;

use crate::domain::timeline::{micros_to_secs, secs_to_micros, Micros, TimelineMapper};
use crate::error::{PipelineError, PipelineResult};

/// A half-open source range `[start, end)` played back at `speed`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    start: Micros,
    end: Micros,
    speed: f64,
}

impl Segment {
    /// Create a segment from microsecond bounds
    pub fn new(start: Micros, end: Micros, speed: f64) -> PipelineResult<Self> {
        Self::validated(0, start, end, speed)
    }

    /// Create a segment from second bounds, as supplied by the host
    pub fn from_secs(start: f64, end: f64, speed: f64) -> PipelineResult<Self> {
        Self::from_secs_at(0, start, end, speed)
    }

    fn from_secs_at(index: usize, start: f64, end: f64, speed: f64) -> PipelineResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(PipelineError::InvalidSegment {
                index,
                reason: format!("bounds must be finite (start={}, end={})", start, end),
            });
        }
        Self::validated(index, secs_to_micros(start), secs_to_micros(end), speed)
    }

    fn validated(index: usize, start: Micros, end: Micros, speed: f64) -> PipelineResult<Self> {
        if start >= end {
            return Err(PipelineError::InvalidSegment {
                index,
                reason: format!(
                    "start ({:.6}s) must be before end ({:.6}s)",
                    micros_to_secs(start),
                    micros_to_secs(end)
                ),
            });
        }
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PipelineError::InvalidSegment {
                index,
                reason: format!("speed must be a positive number, got {}", speed),
            });
        }
        Ok(Self { start, end, speed })
    }

    pub fn start(&self) -> Micros {
        self.start
    }

    pub fn end(&self) -> Micros {
        self.end
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Whether `pts` falls inside `[start, end)`
    pub fn contains(&self, pts: Micros) -> bool {
        pts >= self.start && pts < self.end
    }

    pub fn source_duration(&self) -> Micros {
        self.end - self.start
    }

    pub fn output_duration(&self) -> Micros {
        TimelineMapper::output_duration(self)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3}s-{:.3}s @ {}x",
            micros_to_secs(self.start),
            micros_to_secs(self.end),
            self.speed
        )
    }
}

/// One row of the planned output timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlannedSegment {
    pub segment: Segment,
    pub output_start: Micros,
    pub output_duration: Micros,
}

/// Ordered segments for one run; read-only once built
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    segments: Vec<Segment>,
}

impl SegmentPlan {
    /// Build a plan from already validated segments
    pub fn new(segments: Vec<Segment>) -> PipelineResult<Self> {
        if segments.is_empty() {
            return Err(PipelineError::InvalidSegment {
                index: 0,
                reason: "at least one segment is required".to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// Build a plan from the host's parallel arrays of seconds
    pub fn from_arrays(starts: &[f64], ends: &[f64], speeds: &[f64]) -> PipelineResult<Self> {
        if starts.len() != ends.len() || starts.len() != speeds.len() {
            return Err(PipelineError::InvalidSegment {
                index: starts.len().min(ends.len()).min(speeds.len()),
                reason: format!(
                    "segment arrays differ in length (starts={}, ends={}, speeds={})",
                    starts.len(),
                    ends.len(),
                    speeds.len()
                ),
            });
        }

        let segments = starts
            .iter()
            .zip(ends)
            .zip(speeds)
            .enumerate()
            .map(|(index, ((&start, &end), &speed))| {
                Segment::from_secs_at(index, start, end, speed)
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Self::new(segments)
    }

    /// First segment whose `[start, end)` contains `pts`.
    ///
    /// Overlapping segments resolve to the earliest listed one.
    pub fn segment_at(&self, pts: Micros) -> Option<&Segment> {
        self.position_at(pts).map(|(_, segment)| segment)
    }

    /// Like [`segment_at`](Self::segment_at) but also returns the segment index
    pub fn position_at(&self, pts: Micros) -> Option<(usize, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .find(|(_, segment)| segment.contains(pts))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    /// Segments laid end to end on the output timeline, in plan order
    pub fn output_layout(&self) -> Vec<PlannedSegment> {
        let mut cursor = 0;
        self.segments
            .iter()
            .map(|segment| {
                let output_duration = segment.output_duration();
                let planned = PlannedSegment {
                    segment: *segment,
                    output_start: cursor,
                    output_duration,
                };
                cursor += output_duration;
                planned
            })
            .collect()
    }

    /// Sum of all per-segment output durations
    pub fn total_output_duration(&self) -> Micros {
        self.segments.iter().map(Segment::output_duration).sum()
    }
}

impl<'a> IntoIterator for &'a SegmentPlan {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}
