// Ports - Capability contracts for the demuxer, codecs, time-stretcher and muxer

use std::path::Path;
use std::time::Duration;

use crate::domain::media::{BufferFlags, BufferInfo, SeekMode, TrackFormat};
use crate::domain::timeline::Micros;
use crate::error::PipelineResult;

/// Port for reading packets out of a source container.
///
/// The demuxer keeps a read cursor on the current packet of the selected
/// track: `read_packet` copies it out without moving, `advance` moves on.
pub trait Demuxer {
    type Format: TrackFormat;

    /// Number of tracks in the container
    fn track_count(&self) -> usize;

    /// Source format of track `index`
    fn track_format(&self, index: usize) -> PipelineResult<Self::Format>;

    /// Restrict reads to track `index`; replaces any previous selection
    fn select_track(&mut self, index: usize) -> PipelineResult<()>;

    /// Reposition the read cursor on the selected track
    fn seek_to(&mut self, pts: Micros, mode: SeekMode) -> PipelineResult<()>;

    /// Copy the current packet into `buf`; `Ok(None)` at end of stream
    fn read_packet(&mut self, buf: &mut [u8]) -> PipelineResult<Option<usize>>;

    /// Presentation time of the current packet, `None` at end of stream
    fn packet_pts(&self) -> Option<Micros>;

    /// Decode time of the current packet, when the container records one
    fn packet_dts(&self) -> Option<Micros>;

    /// Flags of the current packet
    fn packet_flags(&self) -> BufferFlags;

    /// Move to the next packet; returns `false` once the stream is exhausted
    fn advance(&mut self) -> bool;
}

/// Handle to a codec input buffer obtained from [`MediaCodec::dequeue_input_slot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    pub index: usize,
    pub capacity: usize,
}

/// Handle to a filled codec output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSlot {
    pub index: usize,
    pub info: BufferInfo,
}

/// Port for an asynchronous buffer-queue codec (decoder or encoder).
///
/// Raw audio crossing this port is interleaved signed 16-bit little-endian
/// PCM. "No slot available" is backpressure, reported as `Ok(None)`.
pub trait MediaCodec {
    type Format: TrackFormat;

    fn start(&mut self) -> PipelineResult<()>;

    /// Format the codec produces once configured
    fn output_format(&self) -> PipelineResult<Self::Format>;

    /// Wait up to `timeout` for a free input buffer
    fn dequeue_input_slot(&mut self, timeout: Duration) -> PipelineResult<Option<InputSlot>>;

    /// Submit `data` (at most `slot.capacity` bytes) for processing
    fn queue_input(
        &mut self,
        slot: InputSlot,
        data: &[u8],
        pts: Micros,
        flags: BufferFlags,
    ) -> PipelineResult<()>;

    /// Wait up to `timeout` for a filled output buffer
    fn dequeue_output(&mut self, timeout: Duration) -> PipelineResult<Option<OutputSlot>>;

    /// Payload of a dequeued output buffer
    fn output_data(&self, slot: &OutputSlot) -> &[u8];

    /// Hand an output buffer back to the codec
    fn release_output(&mut self, slot: OutputSlot) -> PipelineResult<()>;

    fn stop(&mut self) -> PipelineResult<()>;
}

/// Port for a pitch-preserving time-stretcher over interleaved i16 PCM
pub trait TimeStretcher {
    /// Playback speed multiplier; 1.0 is neutral
    fn set_speed(&mut self, speed: f64) -> PipelineResult<()>;

    fn speed(&self) -> f64;

    /// Append interleaved samples (a whole number of frames)
    fn write_samples(&mut self, samples: &[i16]) -> PipelineResult<()>;

    /// Read up to `out.len()` interleaved samples; returns frames read.
    /// Zero means nothing is ready yet.
    fn read_samples(&mut self, out: &mut [i16]) -> PipelineResult<usize>;

    /// Force out any buffered tail
    fn flush(&mut self) -> PipelineResult<()>;
}

/// Port for writing samples into an output container
pub trait Muxer {
    type Format: TrackFormat;

    /// Register an output track; returns its index
    fn add_track(&mut self, format: &Self::Format) -> PipelineResult<usize>;

    /// Commit the header; no tracks may be added afterwards
    fn start(&mut self) -> PipelineResult<()>;

    fn write_sample(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> PipelineResult<()>;

    /// Write the trailer/index and close the file
    fn stop(&mut self) -> PipelineResult<()>;
}

/// Settings for the audio re-encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub codec: String,
    pub bit_rate: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Factory for the collaborators of one run
pub trait MediaBackend {
    type Format: TrackFormat;
    type Demuxer: Demuxer<Format = Self::Format>;
    type Muxer: Muxer<Format = Self::Format>;
    type Decoder: MediaCodec<Format = Self::Format>;
    type Encoder: MediaCodec<Format = Self::Format>;
    type Stretcher: TimeStretcher;

    fn open_demuxer(&self, path: &Path) -> PipelineResult<Self::Demuxer>;

    fn open_muxer(&self, path: &Path) -> PipelineResult<Self::Muxer>;

    /// Create and configure a decoder for `format`
    fn create_decoder(&self, format: &Self::Format) -> PipelineResult<Self::Decoder>;

    /// Create and configure an encoder
    fn create_encoder(&self, settings: &EncoderSettings) -> PipelineResult<Self::Encoder>;

    fn create_stretcher(&self, sample_rate: u32, channels: u16) -> PipelineResult<Self::Stretcher>;
}
