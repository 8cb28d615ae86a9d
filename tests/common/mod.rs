//! In-memory media backend for driving the engine without native libraries

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use speedx_cli::domain::media::{BufferFlags, BufferInfo, SeekMode, TrackFormat};
use speedx_cli::domain::timeline::Micros;
use speedx_cli::error::{PipelineError, PipelineResult};
use speedx_cli::ports::{
    Demuxer, EncoderSettings, InputSlot, MediaBackend, MediaCodec, Muxer, OutputSlot,
    TimeStretcher,
};

pub type EventLog = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct FakeFormat {
    pub mime: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl FakeFormat {
    pub fn video() -> Self {
        Self {
            mime: "video/avc".to_string(),
            sample_rate: None,
            channels: None,
        }
    }

    pub fn audio(sample_rate: u32, channels: u16) -> Self {
        Self {
            mime: "audio/mp4a-latm".to_string(),
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }
}

impl TrackFormat for FakeFormat {
    fn mime(&self) -> &str {
        &self.mime
    }

    fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn channel_count(&self) -> Option<u16> {
        self.channels
    }
}

#[derive(Debug, Clone)]
pub struct FakePacket {
    pub pts: Micros,
    pub dts: Option<Micros>,
    pub data: Vec<u8>,
    pub flags: BufferFlags,
}

#[derive(Debug, Clone)]
pub struct FakeTrack {
    pub format: FakeFormat,
    pub packets: Vec<FakePacket>,
}

/// Video track of `duration_s` at `fps`, a keyframe every `gop` frames
pub fn video_track(duration_s: f64, fps: u32, gop: usize) -> FakeTrack {
    let count = (duration_s * fps as f64).round() as usize;
    let packets = (0..count)
        .map(|i| FakePacket {
            pts: i as i64 * 1_000_000 / fps as i64,
            dts: None,
            data: vec![(i % 251) as u8; 64],
            flags: if i % gop == 0 {
                BufferFlags::KEY_FRAME
            } else {
                BufferFlags::NONE
            },
        })
        .collect();
    FakeTrack {
        format: FakeFormat::video(),
        packets,
    }
}

/// Video track with packets at exactly the given timestamps, all keyframes
pub fn video_track_at(timestamps: &[Micros]) -> FakeTrack {
    FakeTrack {
        format: FakeFormat::video(),
        packets: timestamps
            .iter()
            .map(|&pts| FakePacket {
                pts,
                dts: None,
                data: vec![1; 16],
                flags: BufferFlags::KEY_FRAME,
            })
            .collect(),
    }
}

/// Stamp every packet with a decode time `lag` ahead of its presentation time
pub fn with_decode_lag(mut track: FakeTrack, lag: Micros) -> FakeTrack {
    for packet in &mut track.packets {
        packet.dts = Some(packet.pts - lag);
    }
    track
}

/// Audio track whose "compressed" packets carry raw S16 LE PCM
pub fn audio_track(duration_s: f64, sample_rate: u32, channels: u16, frames_per_packet: usize) -> FakeTrack {
    let total_frames = (duration_s * sample_rate as f64).round() as usize;
    let mut packets = Vec::new();
    let mut frame = 0;
    while frame < total_frames {
        let frames = frames_per_packet.min(total_frames - frame);
        let mut data = Vec::with_capacity(frames * channels as usize * 2);
        for i in 0..frames * channels as usize {
            data.extend_from_slice(&(((frame + i) % 1000) as i16).to_le_bytes());
        }
        packets.push(FakePacket {
            pts: (frame as i64 * 1_000_000) / sample_rate as i64,
            dts: None,
            data,
            flags: BufferFlags::KEY_FRAME,
        });
        frame += frames;
    }
    FakeTrack {
        format: FakeFormat::audio(sample_rate, channels),
        packets,
    }
}

/// One sample written to a fake muxer
#[derive(Debug, Clone, PartialEq)]
pub struct MuxedSample {
    pub track: usize,
    pub pts: Micros,
    pub dts: Option<Micros>,
    pub size: usize,
    pub flags: BufferFlags,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MuxRecord {
    pub tracks: Vec<String>,
    pub samples: Vec<MuxedSample>,
    pub started: bool,
    pub stopped: bool,
}

impl MuxRecord {
    pub fn track_samples(&self, track: usize) -> Vec<&MuxedSample> {
        self.samples.iter().filter(|s| s.track == track).collect()
    }

    pub fn track_index(&self, prefix: &str) -> Option<usize> {
        self.tracks.iter().position(|mime| mime.starts_with(prefix))
    }

    /// PCM bytes the fake encoder consumed, summed over the audio track
    pub fn encoded_pcm_bytes(&self, track: usize) -> usize {
        self.track_samples(track)
            .iter()
            .map(|s| u32::from_le_bytes([s.data[0], s.data[1], s.data[2], s.data[3]]) as usize)
            .sum()
    }
}

/// Failure injection knobs
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fail the muxer write after this many successful writes
    pub muxer_write_limit: Option<usize>,
    pub muxer_stop_fails: bool,
    /// Decoder never accepts input nor produces output
    pub decoder_wedged: bool,
    pub encoder_config_fails: bool,
}

/// Behaviour knobs for the fake codecs and stretcher
#[derive(Debug, Clone)]
pub struct FakeTuning {
    /// Encoder input buffer size in bytes
    pub encoder_capacity: usize,
    /// Encoder emits a codec-config buffer before any frame
    pub encoder_config_buffer: bool,
    /// Frames the stretcher holds back until more input or a flush
    pub stretcher_latency: usize,
    /// Decoded outputs queued before the decoder stops accepting input
    pub decoder_queue_depth: usize,
}

impl Default for FakeTuning {
    fn default() -> Self {
        Self {
            encoder_capacity: 4096,
            encoder_config_buffer: true,
            stretcher_latency: 0,
            decoder_queue_depth: 4,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    sources: HashMap<PathBuf, Vec<FakeTrack>>,
    pub events: EventLog,
    pub outputs: Rc<RefCell<HashMap<PathBuf, Rc<RefCell<MuxRecord>>>>>,
    pub speeds: Rc<RefCell<Vec<f64>>>,
    pub faults: Faults,
    pub tuning: FakeTuning,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>, tracks: Vec<FakeTrack>) -> Self {
        self.sources.insert(path.into(), tracks);
        self
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_tuning(mut self, tuning: FakeTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn output(&self, path: &Path) -> Option<Rc<RefCell<MuxRecord>>> {
        self.outputs.borrow().get(path).cloned()
    }

    fn log(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }
}

pub struct FakeDemuxer {
    tracks: Vec<FakeTrack>,
    selected: Option<usize>,
    cursor: usize,
    events: EventLog,
}

impl FakeDemuxer {
    fn packets(&self) -> &[FakePacket] {
        match self.selected {
            Some(index) => &self.tracks[index].packets,
            None => &[],
        }
    }

    fn current(&self) -> Option<&FakePacket> {
        self.packets().get(self.cursor)
    }
}

impl Demuxer for FakeDemuxer {
    type Format = FakeFormat;

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> PipelineResult<FakeFormat> {
        self.tracks
            .get(index)
            .map(|track| track.format.clone())
            .ok_or_else(|| PipelineError::collaborator("track format", index))
    }

    fn select_track(&mut self, index: usize) -> PipelineResult<()> {
        self.events
            .borrow_mut()
            .push(format!("demuxer.select {}", index));
        self.selected = Some(index);
        self.cursor = 0;
        Ok(())
    }

    fn seek_to(&mut self, pts: Micros, mode: SeekMode) -> PipelineResult<()> {
        let packets = self.packets();
        let is_sync = |p: &FakePacket| p.flags.contains(BufferFlags::KEY_FRAME);
        let target = match mode {
            SeekMode::PreviousSync => packets
                .iter()
                .rposition(|p| p.pts <= pts && is_sync(p))
                .unwrap_or(0),
        };
        self.cursor = target;
        self.events.borrow_mut().push(format!("demuxer.seek {}", pts));
        Ok(())
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> PipelineResult<Option<usize>> {
        match self.current() {
            Some(packet) => {
                let size = packet.data.len();
                if size > buf.len() {
                    return Err(PipelineError::collaborator("demuxer read", "buffer too small"));
                }
                buf[..size].copy_from_slice(&packet.data);
                Ok(Some(size))
            }
            None => Ok(None),
        }
    }

    fn packet_pts(&self) -> Option<Micros> {
        self.current().map(|p| p.pts)
    }

    fn packet_dts(&self) -> Option<Micros> {
        self.current().and_then(|p| p.dts)
    }

    fn packet_flags(&self) -> BufferFlags {
        self.current().map_or(BufferFlags::NONE, |p| p.flags)
    }

    fn advance(&mut self) -> bool {
        if self.cursor < self.packets().len() {
            self.cursor += 1;
        }
        self.cursor < self.packets().len()
    }
}

impl Drop for FakeDemuxer {
    fn drop(&mut self) {
        self.events.borrow_mut().push("demuxer.drop".to_string());
    }
}

pub struct FakeMuxer {
    record: Rc<RefCell<MuxRecord>>,
    writes: usize,
    faults: Faults,
    events: EventLog,
}

impl Muxer for FakeMuxer {
    type Format = FakeFormat;

    fn add_track(&mut self, format: &FakeFormat) -> PipelineResult<usize> {
        let mut record = self.record.borrow_mut();
        if record.started {
            return Err(PipelineError::collaborator("muxer add track", "already started"));
        }
        record.tracks.push(format.mime.clone());
        self.events
            .borrow_mut()
            .push(format!("muxer.add_track {}", format.mime));
        Ok(record.tracks.len() - 1)
    }

    fn start(&mut self) -> PipelineResult<()> {
        self.record.borrow_mut().started = true;
        self.events.borrow_mut().push("muxer.start".to_string());
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> PipelineResult<()> {
        if let Some(limit) = self.faults.muxer_write_limit {
            if self.writes >= limit {
                return Err(PipelineError::collaborator("muxer write", "disk full"));
            }
        }
        let mut record = self.record.borrow_mut();
        if !record.started || track >= record.tracks.len() {
            return Err(PipelineError::collaborator("muxer write", "bad state or track"));
        }
        self.writes += 1;
        record.samples.push(MuxedSample {
            track,
            pts: info.pts,
            dts: info.dts,
            size: data.len(),
            flags: info.flags,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.events.borrow_mut().push("muxer.stop".to_string());
        if self.faults.muxer_stop_fails {
            return Err(PipelineError::collaborator("muxer stop", "trailer write failed"));
        }
        self.record.borrow_mut().stopped = true;
        Ok(())
    }
}

impl Drop for FakeMuxer {
    fn drop(&mut self) {
        self.events.borrow_mut().push("muxer.drop".to_string());
    }
}

/// Shared buffer-queue mechanics of the fake codecs
struct CodecQueues {
    outputs: VecDeque<(Vec<u8>, BufferInfo)>,
    current: Vec<u8>,
    next_index: usize,
    eos_in: bool,
}

impl CodecQueues {
    fn new() -> Self {
        Self {
            outputs: VecDeque::new(),
            current: Vec::new(),
            next_index: 0,
            eos_in: false,
        }
    }

    fn push(&mut self, data: Vec<u8>, pts: Micros, flags: BufferFlags) {
        let info = BufferInfo::new(data.len(), pts, flags);
        self.outputs.push_back((data, info));
    }

    fn pop(&mut self) -> Option<OutputSlot> {
        let (data, info) = self.outputs.pop_front()?;
        self.current = data;
        self.next_index += 1;
        Some(OutputSlot {
            index: self.next_index,
            info,
        })
    }
}

/// Passes PCM packets straight through as decoded chunks
pub struct FakeDecoder {
    queues: CodecQueues,
    depth: usize,
    wedged: bool,
    events: EventLog,
}

impl MediaCodec for FakeDecoder {
    type Format = FakeFormat;

    fn start(&mut self) -> PipelineResult<()> {
        self.events.borrow_mut().push("decoder.start".to_string());
        Ok(())
    }

    fn output_format(&self) -> PipelineResult<FakeFormat> {
        Ok(FakeFormat {
            mime: "audio/raw".to_string(),
            sample_rate: None,
            channels: None,
        })
    }

    fn dequeue_input_slot(&mut self, _timeout: Duration) -> PipelineResult<Option<InputSlot>> {
        if self.wedged || self.queues.eos_in || self.queues.outputs.len() >= self.depth {
            return Ok(None);
        }
        Ok(Some(InputSlot {
            index: 0,
            capacity: 64 * 1024,
        }))
    }

    fn queue_input(
        &mut self,
        _slot: InputSlot,
        data: &[u8],
        pts: Micros,
        flags: BufferFlags,
    ) -> PipelineResult<()> {
        if flags.is_end_of_stream() {
            self.queues.eos_in = true;
            self.queues.push(Vec::new(), pts, BufferFlags::END_OF_STREAM);
        } else {
            self.queues.push(data.to_vec(), pts, BufferFlags::NONE);
        }
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> PipelineResult<Option<OutputSlot>> {
        if self.wedged {
            return Ok(None);
        }
        Ok(self.queues.pop())
    }

    fn output_data(&self, _slot: &OutputSlot) -> &[u8] {
        &self.queues.current
    }

    fn release_output(&mut self, _slot: OutputSlot) -> PipelineResult<()> {
        self.queues.current.clear();
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.events.borrow_mut().push("decoder.stop".to_string());
        Ok(())
    }
}

impl Drop for FakeDecoder {
    fn drop(&mut self) {
        self.events.borrow_mut().push("decoder.drop".to_string());
    }
}

/// Emits one small "encoded frame" per input buffer, carrying the input pts
pub struct FakeEncoder {
    queues: CodecQueues,
    capacity: usize,
    pending_config: bool,
    pub inputs: Rc<RefCell<Vec<(Micros, usize)>>>,
    events: EventLog,
}

impl MediaCodec for FakeEncoder {
    type Format = FakeFormat;

    fn start(&mut self) -> PipelineResult<()> {
        self.events.borrow_mut().push("encoder.start".to_string());
        Ok(())
    }

    fn output_format(&self) -> PipelineResult<FakeFormat> {
        Ok(FakeFormat {
            mime: "audio/aac-encoded".to_string(),
            sample_rate: Some(48_000),
            channels: Some(2),
        })
    }

    fn dequeue_input_slot(&mut self, _timeout: Duration) -> PipelineResult<Option<InputSlot>> {
        if self.queues.eos_in || self.queues.outputs.len() >= 8 {
            return Ok(None);
        }
        Ok(Some(InputSlot {
            index: 0,
            capacity: self.capacity,
        }))
    }

    fn queue_input(
        &mut self,
        _slot: InputSlot,
        data: &[u8],
        pts: Micros,
        flags: BufferFlags,
    ) -> PipelineResult<()> {
        if data.len() > self.capacity {
            return Err(PipelineError::collaborator("encoder input", "overflow"));
        }
        if self.pending_config {
            self.pending_config = false;
            self.queues.push(vec![0xC0; 2], 0, BufferFlags::CODEC_CONFIG);
        }
        if flags.is_end_of_stream() {
            self.queues.eos_in = true;
            self.queues.push(Vec::new(), pts, BufferFlags::END_OF_STREAM);
        } else {
            self.inputs.borrow_mut().push((pts, data.len()));
            self.queues
                .push((data.len() as u32).to_le_bytes().to_vec(), pts, BufferFlags::NONE);
        }
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> PipelineResult<Option<OutputSlot>> {
        Ok(self.queues.pop())
    }

    fn output_data(&self, _slot: &OutputSlot) -> &[u8] {
        &self.queues.current
    }

    fn release_output(&mut self, _slot: OutputSlot) -> PipelineResult<()> {
        self.queues.current.clear();
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.events.borrow_mut().push("encoder.stop".to_string());
        Ok(())
    }
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        self.events.borrow_mut().push("encoder.drop".to_string());
    }
}

/// Nearest-frame resampler: `frames / speed` output frames per input run
pub struct FakeStretcher {
    channels: usize,
    speed: f64,
    carry: f64,
    ready: VecDeque<i16>,
    latency: usize,
    pub speeds: Rc<RefCell<Vec<f64>>>,
    events: EventLog,
}

impl FakeStretcher {
    fn releasable(&self) -> usize {
        let held = self.latency * self.channels;
        self.ready.len().saturating_sub(held) / self.channels
    }
}

impl TimeStretcher for FakeStretcher {
    fn set_speed(&mut self, speed: f64) -> PipelineResult<()> {
        if speed <= 0.0 {
            return Err(PipelineError::collaborator("stretcher speed", speed));
        }
        self.speed = speed;
        self.speeds.borrow_mut().push(speed);
        Ok(())
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn write_samples(&mut self, samples: &[i16]) -> PipelineResult<()> {
        let frames = samples.len() / self.channels;
        self.carry += frames as f64 / self.speed;
        let emit = self.carry.floor() as usize;
        self.carry -= emit as f64;
        for k in 0..emit {
            let source = ((k as f64 * self.speed) as usize).min(frames.saturating_sub(1));
            let start = source * self.channels;
            self.ready.extend(&samples[start..start + self.channels]);
        }
        Ok(())
    }

    fn read_samples(&mut self, out: &mut [i16]) -> PipelineResult<usize> {
        let frames = (out.len() / self.channels).min(self.releasable());
        for (slot, value) in out.iter_mut().zip(self.ready.drain(..frames * self.channels)) {
            *slot = value;
        }
        Ok(frames)
    }

    fn flush(&mut self) -> PipelineResult<()> {
        self.events.borrow_mut().push("stretcher.flush".to_string());
        self.latency = 0;
        self.carry = 0.0;
        Ok(())
    }
}

impl Drop for FakeStretcher {
    fn drop(&mut self) {
        self.events.borrow_mut().push("stretcher.drop".to_string());
    }
}

impl MediaBackend for FakeBackend {
    type Format = FakeFormat;
    type Demuxer = FakeDemuxer;
    type Muxer = FakeMuxer;
    type Decoder = FakeDecoder;
    type Encoder = FakeEncoder;
    type Stretcher = FakeStretcher;

    fn open_demuxer(&self, path: &Path) -> PipelineResult<FakeDemuxer> {
        let tracks = self
            .sources
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::NotOpenable {
                path: path.display().to_string(),
                message: "no such source".to_string(),
            })?;
        self.log("demuxer.open");
        Ok(FakeDemuxer {
            tracks,
            selected: None,
            cursor: 0,
            events: self.events.clone(),
        })
    }

    fn open_muxer(&self, path: &Path) -> PipelineResult<FakeMuxer> {
        // Opening the muxer creates the destination, like a real container writer
        std::fs::write(path, b"").map_err(|e| PipelineError::NotOpenable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let record = Rc::new(RefCell::new(MuxRecord::default()));
        self.outputs
            .borrow_mut()
            .insert(path.to_path_buf(), record.clone());
        self.log("muxer.open");
        Ok(FakeMuxer {
            record,
            writes: 0,
            faults: self.faults.clone(),
            events: self.events.clone(),
        })
    }

    fn create_decoder(&self, _format: &FakeFormat) -> PipelineResult<FakeDecoder> {
        self.log("decoder.create");
        Ok(FakeDecoder {
            queues: CodecQueues::new(),
            depth: self.tuning.decoder_queue_depth,
            wedged: self.faults.decoder_wedged,
            events: self.events.clone(),
        })
    }

    fn create_encoder(&self, settings: &EncoderSettings) -> PipelineResult<FakeEncoder> {
        if self.faults.encoder_config_fails {
            return Err(PipelineError::collaborator(
                "audio encoder configure",
                format!("unsupported codec {}", settings.codec),
            ));
        }
        self.log(format!(
            "encoder.create {} {} {} {}",
            settings.codec, settings.bit_rate, settings.sample_rate, settings.channels
        ));
        Ok(FakeEncoder {
            queues: CodecQueues::new(),
            capacity: self.tuning.encoder_capacity,
            pending_config: self.tuning.encoder_config_buffer,
            inputs: Rc::new(RefCell::new(Vec::new())),
            events: self.events.clone(),
        })
    }

    fn create_stretcher(&self, sample_rate: u32, channels: u16) -> PipelineResult<FakeStretcher> {
        self.log(format!("stretcher.create {} {}", sample_rate, channels));
        Ok(FakeStretcher {
            channels: channels as usize,
            speed: 1.0,
            carry: 0.0,
            ready: VecDeque::new(),
            latency: self.tuning.stretcher_latency,
            speeds: self.speeds.clone(),
            events: self.events.clone(),
        })
    }
}
