//! Audio speed stage: decode -> time-stretch -> encode -> mux as one continuous pump
//!
//! The whole audio track is decoded as a single stream. For every decoded
//! chunk the governing segment is looked up by the chunk's *source* pts and
//! the stretcher speed is switched accordingly. The four roles (feed, decode
//! drain, encode feed, encode drain) are polled in one cooperative loop; a
//! role that cannot make progress simply yields to the next iteration.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{AudioSyncMode, PipelineConfig};
use crate::domain::media::{BufferFlags, BufferInfo, SeekMode};
use crate::domain::plan::{PlannedSegment, SegmentPlan};
use crate::domain::timeline::{AudioClock, Micros, MICROS_PER_SECOND};
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{Demuxer, MediaCodec, Muxer, TimeStretcher};

/// Stretcher speed for audio outside every declared segment
pub const NEUTRAL_SPEED: f64 = 1.0;

const BYTES_PER_SAMPLE: usize = std::mem::size_of::<i16>();

/// Outcome of one audio stage run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioStageReport {
    pub packets_fed: u64,
    pub pcm_frames_decoded: u64,
    pub pcm_frames_stretched: u64,
    /// Decoded frames discarded because no segment covered them
    pub pcm_frames_dropped: u64,
    pub encoded_frames_written: u64,
    pub speed_switches: u64,
    pub output_duration_us: Micros,
}

/// Audio shape the stage works with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmLayout {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Drives the audio track through decoder, stretcher and encoder into the muxer
pub struct AudioSpeedStage<'a> {
    plan: &'a SegmentPlan,
    config: &'a PipelineConfig,
    output_track: usize,
    pcm: PcmLayout,
}

impl<'a> AudioSpeedStage<'a> {
    pub fn new(
        plan: &'a SegmentPlan,
        config: &'a PipelineConfig,
        output_track: usize,
        pcm: PcmLayout,
    ) -> Self {
        Self {
            plan,
            config,
            output_track,
            pcm,
        }
    }

    /// Pump until the encoder emits its end-of-stream buffer. The demuxer
    /// must have the audio track selected and both codecs must be started.
    pub fn run<D, Dec, S, Enc, M>(
        &self,
        demuxer: &mut D,
        decoder: &mut Dec,
        stretcher: &mut S,
        encoder: &mut Enc,
        muxer: &mut M,
    ) -> PipelineResult<AudioStageReport>
    where
        D: Demuxer,
        Dec: MediaCodec,
        S: TimeStretcher,
        Enc: MediaCodec,
        M: Muxer,
    {
        if self.pcm.channels == 0 || self.pcm.sample_rate == 0 {
            return Err(PipelineError::InvalidConfig {
                message: format!(
                    "audio track reports {} Hz / {} channels",
                    self.pcm.sample_rate, self.pcm.channels
                ),
            });
        }

        info!(
            "Processing audio track: {} Hz, {} channels, sync mode {:?}",
            self.pcm.sample_rate, self.pcm.channels, self.config.audio_sync
        );

        demuxer.seek_to(0, SeekMode::PreviousSync)?;
        stretcher.set_speed(NEUTRAL_SPEED)?;

        let mut pump = AudioPump::new(self, demuxer, decoder, stretcher, encoder, muxer);
        pump.run()?;

        let mut report = pump.report;
        report.output_duration_us = pump.clock.current_pts();
        info!(
            "Audio track completed: {} encoded frames, {} speed switches, output duration {}us",
            report.encoded_frames_written, report.speed_switches, report.output_duration_us
        );
        Ok(report)
    }
}

/// Stretched samples waiting for encoder input space
struct PcmRun {
    start_pts: Micros,
    samples: Vec<i16>,
    consumed: usize,
}

impl PcmRun {
    fn remaining(&self) -> usize {
        self.samples.len() - self.consumed
    }
}

/// Loop state of one audio stage run
struct AudioPump<'r, D, Dec, S, Enc, M> {
    plan: &'r SegmentPlan,
    layout: Vec<PlannedSegment>,
    sync: AudioSyncMode,
    poll_timeout: Duration,
    stall_limit: u32,
    log_interval: u64,
    output_track: usize,
    channels: usize,
    sample_rate: u32,

    demuxer: &'r mut D,
    decoder: &'r mut Dec,
    stretcher: &'r mut S,
    encoder: &'r mut Enc,
    muxer: &'r mut M,

    packet_buf: Vec<u8>,
    pcm: Vec<i16>,
    stretch_out: Vec<i16>,
    encode_bytes: Vec<u8>,
    pending: VecDeque<PcmRun>,
    recycled: Vec<Vec<i16>>,
    high_water: usize,
    start_new_run: bool,

    clock: AudioClock,
    active_segment: Option<usize>,
    input_done: bool,
    decoder_done: bool,
    encoder_eos_sent: bool,
    encoder_done: bool,
    idle_polls: u32,
    report: AudioStageReport,
}

impl<'r, D, Dec, S, Enc, M> AudioPump<'r, D, Dec, S, Enc, M>
where
    D: Demuxer,
    Dec: MediaCodec,
    S: TimeStretcher,
    Enc: MediaCodec,
    M: Muxer,
{
    fn new(
        stage: &AudioSpeedStage<'r>,
        demuxer: &'r mut D,
        decoder: &'r mut Dec,
        stretcher: &'r mut S,
        encoder: &'r mut Enc,
        muxer: &'r mut M,
    ) -> Self {
        let config = stage.config;
        let channels = stage.pcm.channels as usize;
        let chunk_samples = config.pcm_chunk_frames * channels;
        let stretch_samples = chunk_samples * config.stretch_headroom;

        Self {
            plan: stage.plan,
            layout: stage.plan.output_layout(),
            sync: config.audio_sync,
            poll_timeout: config.poll_timeout(),
            stall_limit: config.stall_limit,
            log_interval: config.progress_log_interval as u64,
            output_track: stage.output_track,
            channels,
            sample_rate: stage.pcm.sample_rate,
            demuxer,
            decoder,
            stretcher,
            encoder,
            muxer,
            packet_buf: Vec::new(),
            pcm: Vec::with_capacity(chunk_samples),
            stretch_out: vec![0; stretch_samples],
            encode_bytes: Vec::with_capacity(chunk_samples * BYTES_PER_SAMPLE),
            pending: VecDeque::new(),
            recycled: Vec::new(),
            high_water: stretch_samples * 2,
            start_new_run: true,
            clock: AudioClock::new(stage.pcm.sample_rate),
            active_segment: None,
            input_done: false,
            decoder_done: false,
            encoder_eos_sent: false,
            encoder_done: false,
            idle_polls: 0,
            report: AudioStageReport::default(),
        }
    }

    fn run(&mut self) -> PipelineResult<()> {
        while !self.encoder_done {
            let mut progressed = self.feed_decoder()?;
            if self.pending_samples() < self.high_water {
                progressed |= self.drain_decoder()?;
            }
            progressed |= self.feed_encoder()?;
            progressed |= self.drain_encoder()?;

            if progressed {
                self.idle_polls = 0;
            } else {
                self.idle_polls += 1;
                if self.idle_polls >= self.stall_limit {
                    warn!(
                        "Audio pipeline made no progress for {} polls (input_done={}, decoder_done={}, encoder_eos_sent={})",
                        self.idle_polls, self.input_done, self.decoder_done, self.encoder_eos_sent
                    );
                    return Err(PipelineError::PipelineStalled {
                        stage: "audio",
                        polls: self.idle_polls,
                    });
                }
            }
        }
        Ok(())
    }

    /// Feed: move one compressed packet (or the end marker) into the decoder
    fn feed_decoder(&mut self) -> PipelineResult<bool> {
        if self.input_done {
            return Ok(false);
        }
        let slot = match self.decoder.dequeue_input_slot(self.poll_timeout)? {
            Some(slot) => slot,
            None => return Ok(false),
        };

        if self.packet_buf.len() < slot.capacity {
            self.packet_buf.resize(slot.capacity, 0);
        }
        let read = self.demuxer.read_packet(&mut self.packet_buf[..slot.capacity])?;
        match (read, self.demuxer.packet_pts()) {
            (Some(size), Some(pts)) => {
                let flags = self.demuxer.packet_flags();
                self.decoder
                    .queue_input(slot, &self.packet_buf[..size], pts, flags)?;
                self.demuxer.advance();
                self.report.packets_fed += 1;
            }
            _ => {
                self.decoder
                    .queue_input(slot, &[], 0, BufferFlags::END_OF_STREAM)?;
                self.input_done = true;
                info!(
                    "Sent end of stream to audio decoder after {} packets",
                    self.report.packets_fed
                );
            }
        }
        Ok(true)
    }

    /// Decode drain: take one PCM chunk, stretch it, collect stretched output
    fn drain_decoder(&mut self) -> PipelineResult<bool> {
        if self.decoder_done {
            return Ok(false);
        }
        let output = match self.decoder.dequeue_output(self.poll_timeout)? {
            Some(output) => output,
            None => return Ok(false),
        };

        self.pcm.clear();
        if output.info.size > 0 {
            let data = self.decoder.output_data(&output);
            let whole = data.len() / (BYTES_PER_SAMPLE * self.channels) * self.channels;
            self.pcm.extend(
                data.chunks_exact(BYTES_PER_SAMPLE)
                    .take(whole)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );
        }
        self.decoder.release_output(output)?;

        if !self.pcm.is_empty() {
            let samples = std::mem::take(&mut self.pcm);
            let result = self.process_chunk(output.info.pts, &samples);
            self.pcm = samples;
            result?;
        }

        if output.info.flags.is_end_of_stream() {
            info!("Audio decoder reached end of stream; flushing stretcher");
            self.stretcher.flush()?;
            self.drain_stretcher()?;
            self.decoder_done = true;
        }
        Ok(true)
    }

    /// Apply the speed governing `source_pts` and push the chunk through the stretcher
    fn process_chunk(&mut self, source_pts: Micros, samples: &[i16]) -> PipelineResult<()> {
        let frames = (samples.len() / self.channels) as u64;
        self.report.pcm_frames_decoded += frames;

        let governing = self
            .plan
            .position_at(source_pts)
            .map(|(index, segment)| (index, segment.speed()));
        let index = governing.map(|(index, _)| index);
        let speed = governing.map_or(NEUTRAL_SPEED, |(_, speed)| speed);

        if index != self.active_segment {
            self.enter_zone(index, source_pts)?;
        }

        if self.sync == AudioSyncMode::SegmentAligned && index.is_none() {
            self.report.pcm_frames_dropped += frames;
            return Ok(());
        }

        if self.stretcher.speed() != speed {
            self.stretcher.set_speed(speed)?;
        }
        self.stretcher.write_samples(samples)?;
        self.drain_stretcher()
    }

    /// Governing segment changed between chunks
    fn enter_zone(&mut self, index: Option<usize>, source_pts: Micros) -> PipelineResult<()> {
        match index {
            Some(i) => info!(
                "Audio switched to segment {} at {}us: speed {}x",
                i,
                source_pts,
                self.plan.segments()[i].speed()
            ),
            None => info!("Audio left declared segments at {}us", source_pts),
        }
        self.report.speed_switches += 1;

        if self.sync == AudioSyncMode::SegmentAligned {
            if self.active_segment.is_some() {
                self.stretcher.flush()?;
                self.drain_stretcher()?;
            }
            if let Some(i) = index {
                let anchored = self.clock.anchor(self.layout[i].output_start);
                self.start_new_run = true;
                debug!("Audio clock anchored at {}us for segment {}", anchored, i);
            }
        }

        self.active_segment = index;
        Ok(())
    }

    /// Move everything the stretcher has ready into the pending queue
    fn drain_stretcher(&mut self) -> PipelineResult<()> {
        let mut out = std::mem::take(&mut self.stretch_out);
        let result = loop {
            let frames = match self.stretcher.read_samples(&mut out) {
                Ok(frames) => frames.min(out.len() / self.channels),
                Err(e) => break Err(e),
            };
            if frames == 0 {
                break Ok(());
            }
            self.append_pending(&out[..frames * self.channels]);
        };
        self.stretch_out = out;
        result
    }

    fn append_pending(&mut self, samples: &[i16]) {
        let frames = samples.len() / self.channels;
        let pts = self.clock.advance(frames);
        self.report.pcm_frames_stretched += frames as u64;

        if self.start_new_run || self.pending.is_empty() {
            let mut buffer = self.recycled.pop().unwrap_or_default();
            buffer.clear();
            buffer.extend_from_slice(samples);
            self.pending.push_back(PcmRun {
                start_pts: pts,
                samples: buffer,
                consumed: 0,
            });
            self.start_new_run = false;
        } else if let Some(run) = self.pending.back_mut() {
            run.samples.extend_from_slice(samples);
        }
    }

    fn pending_samples(&self) -> usize {
        self.pending.iter().map(PcmRun::remaining).sum()
    }

    /// Encode feed: push pending samples (clipped to slot capacity), then the end marker
    fn feed_encoder(&mut self) -> PipelineResult<bool> {
        if self.encoder_eos_sent {
            return Ok(false);
        }

        let mut progressed = false;
        let mut timeout = self.poll_timeout;
        while !self.pending.is_empty() {
            let slot = match self.encoder.dequeue_input_slot(timeout)? {
                Some(slot) => slot,
                None => return Ok(progressed),
            };
            timeout = Duration::ZERO;

            let frame_bytes = self.channels * BYTES_PER_SAMPLE;
            let max_frames = slot.capacity / frame_bytes;
            if max_frames == 0 {
                return Err(PipelineError::collaborator(
                    "audio encoder input",
                    format!("{} byte input buffer cannot hold one frame", slot.capacity),
                ));
            }

            let run = match self.pending.front_mut() {
                Some(run) => run,
                None => break,
            };
            let take = (run.remaining() / self.channels).min(max_frames) * self.channels;
            let consumed_frames = (run.consumed / self.channels) as i128;
            let pts = run.start_pts
                + (consumed_frames * MICROS_PER_SECOND as i128 / self.sample_rate as i128) as Micros;

            self.encode_bytes.clear();
            for sample in &run.samples[run.consumed..run.consumed + take] {
                self.encode_bytes.extend_from_slice(&sample.to_le_bytes());
            }
            run.consumed += take;
            let exhausted = run.remaining() < self.channels;

            self.encoder
                .queue_input(slot, &self.encode_bytes, pts, BufferFlags::NONE)?;
            progressed = true;

            if exhausted {
                if let Some(done) = self.pending.pop_front() {
                    self.recycled.push(done.samples);
                }
            }
        }

        if self.decoder_done {
            let slot = match self.encoder.dequeue_input_slot(timeout)? {
                Some(slot) => slot,
                None => return Ok(progressed),
            };
            let pts = self.clock.current_pts();
            self.encoder
                .queue_input(slot, &[], pts, BufferFlags::END_OF_STREAM)?;
            self.encoder_eos_sent = true;
            info!("Sent end of stream to audio encoder at {}us", pts);
            progressed = true;
        }
        Ok(progressed)
    }

    /// Encode drain: write every ready encoded frame to the muxer
    fn drain_encoder(&mut self) -> PipelineResult<bool> {
        let mut progressed = false;
        while !self.encoder_done {
            let output = match self.encoder.dequeue_output(Duration::ZERO)? {
                Some(output) => output,
                None => break,
            };
            progressed = true;

            let flags = output.info.flags;
            if output.info.size > 0 && !flags.contains(BufferFlags::CODEC_CONFIG) {
                let data = self.encoder.output_data(&output);
                let info = BufferInfo::new(
                    data.len(),
                    output.info.pts,
                    flags.without(BufferFlags::END_OF_STREAM),
                );
                self.muxer.write_sample(self.output_track, data, &info)?;
                self.report.encoded_frames_written += 1;

                if self.report.encoded_frames_written % self.log_interval == 0 {
                    debug!(
                        "Processed {} audio frames, current segment {:?}",
                        self.report.encoded_frames_written, self.active_segment
                    );
                }
            }
            self.encoder.release_output(output)?;

            if flags.is_end_of_stream() {
                info!("Audio encoder reached end of stream");
                self.encoder_done = true;
            }
        }
        Ok(progressed)
    }
}
