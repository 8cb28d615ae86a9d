//! Processing engine: video remap stage, audio speed stage and the orchestrator

use serde::Serialize;

use crate::domain::plan::{PlannedSegment, SegmentPlan};
use crate::domain::timeline::Micros;

pub mod audio;
pub mod orchestrator;
pub mod pool;
pub mod video;

pub use audio::{AudioSpeedStage, AudioStageReport, PcmLayout};
pub use orchestrator::PipelineOrchestrator;
pub use video::{VideoRemapStage, VideoStageReport};

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Planned output timeline, one row per segment
    pub layout: Vec<PlannedSegment>,
    pub planned_duration_us: Micros,
    pub video: VideoStageReport,
    /// `None` when the source had no audio track
    pub audio: Option<AudioStageReport>,
}

impl PipelineReport {
    pub fn new(plan: &SegmentPlan, video: VideoStageReport, audio: Option<AudioStageReport>) -> Self {
        Self {
            layout: plan.output_layout(),
            planned_duration_us: plan.total_output_duration(),
            video,
            audio,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Difference between the audio and video output durations
    pub fn audio_drift_us(&self) -> Option<Micros> {
        self.audio
            .as_ref()
            .map(|audio| audio.output_duration_us - self.video.output_duration_us)
    }
}
