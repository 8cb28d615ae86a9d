//! Command implementations

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::args::{PlanArgs, RunArgs};
use crate::config::PipelineConfig;
use crate::domain::plan::SegmentPlan;
use crate::engine::{PipelineOrchestrator, PipelineReport};
use crate::ports::MediaBackend;
use crate::utils::format_micros;
use crate::utils::time::TimeParser;

/// Execute the run command against `backend`
pub fn run<B: MediaBackend>(backend: B, args: &RunArgs, config: PipelineConfig) -> Result<PipelineReport> {
    info!("Starting run");
    info!("Input: {}", args.input.display());
    info!("Output: {}", args.output.display());

    let plan = TimeParser::new()
        .parse_plan(&args.segments)
        .context("Invalid segment plan")?;

    let orchestrator = PipelineOrchestrator::new(backend, config);
    let report = orchestrator
        .run(&args.input, &args.output, &plan)
        .with_context(|| format!("Failed to process {}", args.input.display()))?;

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report)
}

/// Execute the plan command
pub fn plan(args: &PlanArgs) -> Result<SegmentPlan> {
    let plan = TimeParser::new()
        .parse_plan(&args.segments)
        .context("Invalid segment plan")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan.output_layout())?);
    } else {
        print_plan(&plan);
    }
    Ok(plan)
}

fn print_plan(plan: &SegmentPlan) {
    println!("{:>3}  {:<24} {:>12} {:>12}", "#", "source", "output at", "duration");
    for (index, row) in plan.output_layout().iter().enumerate() {
        println!(
            "{:>3}  {:<24} {:>12} {:>12}",
            index,
            row.segment.to_string(),
            format_micros(row.output_start),
            format_micros(row.output_duration)
        );
    }
    println!("Total output: {}", format_micros(plan.total_output_duration()));
}

fn print_report(report: &PipelineReport) {
    println!(
        "Video: {} packets in {} segments, {}",
        report.video.packets_written,
        report.video.segments_processed,
        format_micros(report.video.output_duration_us)
    );
    match &report.audio {
        Some(audio) => {
            println!(
                "Audio: {} encoded frames, {}",
                audio.encoded_frames_written,
                format_micros(audio.output_duration_us)
            );
            if let Some(drift) = report.audio_drift_us() {
                println!("Audio/video drift: {}us", drift);
            }
        }
        None => println!("Audio: none"),
    }
}
