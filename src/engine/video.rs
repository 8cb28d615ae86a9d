//! Video remap stage: stream-copies packets per segment with remapped timestamps

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::domain::media::{BufferInfo, SeekMode};
use crate::domain::plan::{Segment, SegmentPlan};
use crate::domain::timeline::{Micros, TimelineState};
use crate::engine::pool::BufferPool;
use crate::error::PipelineResult;
use crate::ports::{Demuxer, Muxer};

/// Outcome of one video stage run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoStageReport {
    pub packets_written: u64,
    pub segments_processed: usize,
    /// Output timeline length after the last processed segment
    pub output_duration_us: Micros,
    /// Whether the source ran out before all segments were visited
    pub reached_end_of_stream: bool,
}

/// How a single segment's read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentExit {
    /// A packet at or past the segment end was reached
    Complete,
    /// The per-segment packet cap was hit
    Capped,
    EndOfStream,
}

/// Copies video packets segment by segment without decoding
pub struct VideoRemapStage<'a> {
    plan: &'a SegmentPlan,
    config: &'a PipelineConfig,
    output_track: usize,
}

impl<'a> VideoRemapStage<'a> {
    pub fn new(plan: &'a SegmentPlan, config: &'a PipelineConfig, output_track: usize) -> Self {
        Self {
            plan,
            config,
            output_track,
        }
    }

    /// Run every segment in plan order. The demuxer must already have the
    /// video track selected; the muxer must be started.
    pub fn run<D, M>(&self, demuxer: &mut D, muxer: &mut M) -> PipelineResult<VideoStageReport>
    where
        D: Demuxer,
        M: Muxer,
    {
        info!("Processing video track across {} segments", self.plan.len());

        let mut pool: BufferPool<u8> = BufferPool::new(self.config.video_buffer_capacity);
        let mut buffer = pool.acquire();
        let mut timeline = TimelineState::new();
        let mut report = VideoStageReport::default();

        for (index, segment) in self.plan.iter().enumerate() {
            info!("Processing video segment {}: {}", index, segment);

            let output_start = timeline.output_cursor();
            let (written, exit) =
                self.remap_segment(index, segment, &timeline, demuxer, muxer, &mut buffer)?;

            timeline.finish_segment(segment);
            report.packets_written += written;
            report.segments_processed += 1;

            info!(
                "Completed video segment {}: {} packets, output {}us -> {}us",
                index,
                written,
                output_start,
                timeline.output_cursor()
            );

            if exit == SegmentExit::EndOfStream {
                report.reached_end_of_stream = true;
                if index + 1 < self.plan.len() {
                    warn!(
                        "Source video ended during segment {}; {} later segments skipped",
                        index,
                        self.plan.len() - index - 1
                    );
                }
                break;
            }
        }

        pool.release(buffer);
        report.output_duration_us = timeline.output_cursor();

        info!(
            "Video track completed: {} packets across {} segments, output duration {}us",
            report.packets_written, report.segments_processed, report.output_duration_us
        );
        Ok(report)
    }

    /// SEEK then READ_LOOP for one segment
    fn remap_segment<D, M>(
        &self,
        index: usize,
        segment: &Segment,
        timeline: &TimelineState,
        demuxer: &mut D,
        muxer: &mut M,
        buffer: &mut [u8],
    ) -> PipelineResult<(u64, SegmentExit)>
    where
        D: Demuxer,
        M: Muxer,
    {
        demuxer.seek_to(segment.start(), SeekMode::PreviousSync)?;

        let mut written: u64 = 0;
        loop {
            if written as usize >= self.config.max_packets_per_segment {
                warn!(
                    "Video segment {} hit the {} packet cap; ending it early",
                    index, self.config.max_packets_per_segment
                );
                return Ok((written, SegmentExit::Capped));
            }

            let size = match demuxer.read_packet(buffer)? {
                Some(size) => size,
                None => return Ok((written, SegmentExit::EndOfStream)),
            };
            let source_pts = match demuxer.packet_pts() {
                Some(pts) => pts,
                None => return Ok((written, SegmentExit::EndOfStream)),
            };
            let source_dts = demuxer.packet_dts();
            let flags = demuxer.packet_flags();

            if source_pts >= segment.end() {
                // Belongs to a later segment; step past it so it is not re-read
                demuxer.advance();
                return Ok((written, SegmentExit::Complete));
            }

            if source_pts < segment.start() {
                debug!(
                    "Segment {}: keyframe slack packet at {}us before start {}us",
                    index,
                    source_pts,
                    segment.start()
                );
            }

            let output_pts = timeline.map(segment, source_pts);
            let output_dts = source_dts.map(|dts| timeline.map(segment, dts));
            muxer.write_sample(
                self.output_track,
                &buffer[..size],
                &BufferInfo::new(size, output_pts, flags).with_dts(output_dts),
            )?;
            written += 1;

            if written as usize % self.config.progress_log_interval == 0 {
                debug!(
                    "Segment {}: processed {} packets, pts {}us -> {}us",
                    index, written, source_pts, output_pts
                );
            }

            if !demuxer.advance() {
                return Ok((written, SegmentExit::EndOfStream));
            }
        }
    }
}
