// Muxer adapter over a libav output context

use ffmpeg_next::{codec, encoder, format, packet, Packet, Rescale};
use std::path::Path;
use tracing::debug;

use super::{ff_error, FfmpegFormat, MICROS_TIME_BASE};
use crate::domain::media::{BufferFlags, BufferInfo};
use crate::domain::timeline::DecodeOrder;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::Muxer;

pub struct FfmpegMuxer {
    output: format::context::Output,
    path: String,
    started: bool,
    /// Per output track, indexed like the streams
    decode_order: Vec<DecodeOrder>,
}

impl FfmpegMuxer {
    pub fn create(path: &Path) -> PipelineResult<Self> {
        let output = format::output(&path).map_err(|e| PipelineError::NotOpenable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            output,
            path: path.display().to_string(),
            started: false,
            decode_order: Vec::new(),
        })
    }
}

impl Muxer for FfmpegMuxer {
    type Format = FfmpegFormat;

    fn add_track(&mut self, format: &FfmpegFormat) -> PipelineResult<usize> {
        if self.started {
            return Err(PipelineError::collaborator(
                "muxer add track",
                "tracks cannot be added after the header is written",
            ));
        }
        let mut stream = self
            .output
            .add_stream(encoder::find(codec::Id::None))
            .map_err(ff_error("muxer add track"))?;
        stream.set_parameters(format.parameters().clone());
        stream.set_time_base(format.time_base());
        let index = stream.index();
        debug!("Added output track {} ({:?})", index, format);

        if self.decode_order.len() <= index {
            self.decode_order.resize(index + 1, DecodeOrder::new());
        }
        Ok(index)
    }

    fn start(&mut self) -> PipelineResult<()> {
        self.output
            .write_header()
            .map_err(ff_error("muxer write header"))?;
        self.started = true;
        debug!("Wrote header for {}", self.path);
        Ok(())
    }

    fn write_sample(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> PipelineResult<()> {
        let time_base = self
            .output
            .stream(track)
            .map(|stream| stream.time_base())
            .ok_or_else(|| {
                PipelineError::collaborator("muxer write", format!("no output track {}", track))
            })?;

        let order = self.decode_order.get_mut(track).ok_or_else(|| {
            PipelineError::collaborator("muxer write", format!("no output track {}", track))
        })?;
        let (pts, dts) = order.stamp(
            info.pts.rescale(MICROS_TIME_BASE, time_base),
            info.decode_ts().rescale(MICROS_TIME_BASE, time_base),
        );

        let mut packet = Packet::copy(&data[..info.size.min(data.len())]);
        packet.set_stream(track);
        packet.set_pts(Some(pts));
        packet.set_dts(Some(dts));
        if info.flags.contains(BufferFlags::KEY_FRAME) {
            packet.set_flags(packet::Flags::KEY);
        }
        packet
            .write_interleaved(&mut self.output)
            .map_err(ff_error("muxer write"))
    }

    fn stop(&mut self) -> PipelineResult<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.output
            .write_trailer()
            .map_err(ff_error("muxer write trailer"))?;
        debug!("Wrote trailer for {}", self.path);
        Ok(())
    }
}
