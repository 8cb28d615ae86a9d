//! Host boundary: plain arrays in, integer status out

use std::path::Path;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::domain::plan::SegmentPlan;
use crate::engine::{PipelineOrchestrator, PipelineReport};
use crate::error::PipelineResult;
use crate::ports::MediaBackend;

/// Status returned for a successful run
pub const STATUS_OK: i32 = 0;

/// Validate the segment arrays and run the pipeline on `backend`.
///
/// An invalid plan is rejected before either file is opened.
pub fn run_with<B: MediaBackend>(
    backend: B,
    config: PipelineConfig,
    source: &Path,
    destination: &Path,
    starts: &[f64],
    ends: &[f64],
    speeds: &[f64],
) -> PipelineResult<PipelineReport> {
    let plan = SegmentPlan::from_arrays(starts, ends, speeds)?;
    PipelineOrchestrator::new(backend, config).run(source, destination, &plan)
}

/// [`run_with`] reduced to a status code: `0` on success, a negative code per error kind
pub fn process_with<B: MediaBackend>(
    backend: B,
    config: PipelineConfig,
    source: &Path,
    destination: &Path,
    starts: &[f64],
    ends: &[f64],
    speeds: &[f64],
) -> i32 {
    match run_with(backend, config, source, destination, starts, ends, speeds) {
        Ok(report) => {
            info!(
                "Processed {} -> {} (video {}us)",
                source.display(),
                destination.display(),
                report.video.output_duration_us
            );
            STATUS_OK
        }
        Err(e) => {
            error!("Processing {} failed: {}", source.display(), e);
            e.status_code()
        }
    }
}

/// Process `source` into `destination` with the libav backend and default settings
#[cfg(feature = "ffmpeg")]
pub fn process_video(
    source: &Path,
    destination: &Path,
    starts: &[f64],
    ends: &[f64],
    speeds: &[f64],
) -> i32 {
    let backend = match crate::adapters::ffmpeg::FfmpegBackend::new() {
        Ok(backend) => backend,
        Err(e) => {
            error!("{}", e);
            return e.status_code();
        }
    };
    process_with(
        backend,
        PipelineConfig::default(),
        source,
        destination,
        starts,
        ends,
        speeds,
    )
}
