//! SpeedX segment speed transcoder library
//!
//! Re-times a video according to an ordered list of speed segments: video
//! packets are stream-copied with remapped timestamps while audio is decoded,
//! time-stretched and re-encoded. Media I/O goes through the traits in
//! [`ports`]; the `ffmpeg` feature provides a libav-backed implementation.

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use config::{AudioSyncMode, PipelineConfig};
pub use domain::plan::{Segment, SegmentPlan};
pub use domain::timeline::{Micros, TimelineMapper};
pub use engine::{PipelineOrchestrator, PipelineReport};
pub use error::{ErrorKind, PipelineError, PipelineResult};

#[cfg(feature = "ffmpeg")]
pub use api::process_video;
pub use api::process_with;
