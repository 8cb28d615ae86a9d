//! libav-backed collaborators via ffmpeg-next
//!
//! Timestamps cross the port boundary in microseconds; each adapter rescales
//! to and from the stream time base it owns.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, media, Rational};
use std::path::Path;
use tracing::info;

use crate::domain::media::TrackFormat;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{EncoderSettings, MediaBackend};

mod codec_audio;
mod demux;
mod mux;
mod stretch;

pub use codec_audio::{FfmpegAudioDecoder, FfmpegAudioEncoder};
pub use demux::FfmpegDemuxer;
pub use mux::FfmpegMuxer;
pub use stretch::{atempo_chain, AtempoStretcher};

/// Time base of every timestamp exchanged with the engine
pub(crate) const MICROS_TIME_BASE: Rational = Rational(1, 1_000_000);

pub(crate) fn ff_error(operation: &str) -> impl FnOnce(ffmpeg::Error) -> PipelineError + '_ {
    move |e| PipelineError::collaborator(operation, e)
}

/// Track format backed by libav codec parameters
#[derive(Clone)]
pub struct FfmpegFormat {
    mime: String,
    parameters: codec::Parameters,
    time_base: Rational,
    sample_rate: Option<u32>,
    channels: Option<u16>,
}

impl FfmpegFormat {
    pub(crate) fn from_parameters(parameters: codec::Parameters, time_base: Rational) -> Self {
        let id = parameters.id();
        let prefix = match parameters.medium() {
            media::Type::Video => "video",
            media::Type::Audio => "audio",
            media::Type::Subtitle => "text",
            _ => "application",
        };
        let mime = format!("{}/{}", prefix, id.name());

        let (sample_rate, channels) = if parameters.medium() == media::Type::Audio {
            match codec::context::Context::from_parameters(parameters.clone())
                .and_then(|ctx| ctx.decoder().audio())
            {
                Ok(audio) => (Some(audio.rate()), Some(audio.channels())),
                Err(_) => (None, None),
            }
        } else {
            (None, None)
        };

        Self {
            mime,
            parameters,
            time_base,
            sample_rate,
            channels,
        }
    }

    pub fn parameters(&self) -> &codec::Parameters {
        &self.parameters
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }
}

impl std::fmt::Debug for FfmpegFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegFormat")
            .field("mime", &self.mime)
            .field("time_base", &self.time_base)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

impl TrackFormat for FfmpegFormat {
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

/// Factory wiring the libav adapters into the engine
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// Initialize libav once per process
    pub fn new() -> PipelineResult<Self> {
        ffmpeg::init().map_err(ff_error("FFmpeg initialization"))?;
        info!("FFmpeg initialized");
        Ok(Self)
    }
}

impl MediaBackend for FfmpegBackend {
    type Format = FfmpegFormat;
    type Demuxer = FfmpegDemuxer;
    type Muxer = FfmpegMuxer;
    type Decoder = FfmpegAudioDecoder;
    type Encoder = FfmpegAudioEncoder;
    type Stretcher = AtempoStretcher;

    fn open_demuxer(&self, path: &Path) -> PipelineResult<FfmpegDemuxer> {
        FfmpegDemuxer::open(path)
    }

    fn open_muxer(&self, path: &Path) -> PipelineResult<FfmpegMuxer> {
        FfmpegMuxer::create(path)
    }

    fn create_decoder(&self, format: &FfmpegFormat) -> PipelineResult<FfmpegAudioDecoder> {
        FfmpegAudioDecoder::new(format)
    }

    fn create_encoder(&self, settings: &EncoderSettings) -> PipelineResult<FfmpegAudioEncoder> {
        FfmpegAudioEncoder::new(settings)
    }

    fn create_stretcher(&self, sample_rate: u32, channels: u16) -> PipelineResult<AtempoStretcher> {
        AtempoStretcher::new(sample_rate, channels)
    }
}
