// Demuxer adapter over a libav input context

use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, Packet, Rational, Rescale};
use std::path::Path;
use tracing::debug;

use super::{ff_error, FfmpegFormat, MICROS_TIME_BASE};
use crate::domain::media::{BufferFlags, SeekMode};
use crate::domain::timeline::Micros;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::Demuxer;

pub struct FfmpegDemuxer {
    input: format::context::Input,
    selected: Option<usize>,
    time_base: Rational,
    current: Option<Packet>,
}

impl FfmpegDemuxer {
    pub fn open(path: &Path) -> PipelineResult<Self> {
        let input = format::input(&path).map_err(|e| PipelineError::NotOpenable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(
            "Opened {} ({} streams)",
            path.display(),
            input.streams().count()
        );
        Ok(Self {
            input,
            selected: None,
            time_base: MICROS_TIME_BASE,
            current: None,
        })
    }

    /// Load the next packet of the selected stream into `current`
    fn load_next(&mut self) -> PipelineResult<bool> {
        let selected = match self.selected {
            Some(index) => index,
            None => {
                self.current = None;
                return Ok(false);
            }
        };

        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == selected => {
                    self.current = Some(packet);
                    return Ok(true);
                }
                Ok(()) => continue,
                Err(ffmpeg::Error::Eof) => {
                    self.current = None;
                    return Ok(false);
                }
                Err(e) => return Err(PipelineError::collaborator("demuxer read", e)),
            }
        }
    }

    fn ensure_current(&mut self) -> PipelineResult<()> {
        if self.current.is_none() {
            self.load_next()?;
        }
        Ok(())
    }
}

impl Demuxer for FfmpegDemuxer {
    type Format = FfmpegFormat;

    fn track_count(&self) -> usize {
        self.input.streams().count()
    }

    fn track_format(&self, index: usize) -> PipelineResult<FfmpegFormat> {
        let stream = self.input.stream(index).ok_or_else(|| {
            PipelineError::collaborator("track format", format!("no stream {}", index))
        })?;
        Ok(FfmpegFormat::from_parameters(
            stream.parameters(),
            stream.time_base(),
        ))
    }

    fn select_track(&mut self, index: usize) -> PipelineResult<()> {
        let stream = self.input.stream(index).ok_or_else(|| {
            PipelineError::collaborator("select track", format!("no stream {}", index))
        })?;
        self.time_base = stream.time_base();
        self.selected = Some(index);
        self.current = None;
        debug!("Selected stream {} (time base {})", index, self.time_base);
        Ok(())
    }

    fn seek_to(&mut self, pts: Micros, mode: SeekMode) -> PipelineResult<()> {
        let ts = pts.rescale(MICROS_TIME_BASE, Rational(1, ffmpeg::ffi::AV_TIME_BASE));
        match mode {
            SeekMode::PreviousSync => self.input.seek(ts, ..ts),
        }
        .map_err(ff_error("demuxer seek"))?;
        self.current = None;
        Ok(())
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> PipelineResult<Option<usize>> {
        self.ensure_current()?;
        let packet = match &self.current {
            Some(packet) => packet,
            None => return Ok(None),
        };
        let data = packet.data().unwrap_or(&[]);
        if data.len() > buf.len() {
            return Err(PipelineError::collaborator(
                "demuxer read",
                format!("{} byte packet exceeds {} byte buffer", data.len(), buf.len()),
            ));
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(Some(data.len()))
    }

    fn packet_pts(&self) -> Option<Micros> {
        let packet = self.current.as_ref()?;
        let pts = packet.pts().or(packet.dts())?;
        Some(pts.rescale(self.time_base, MICROS_TIME_BASE))
    }

    fn packet_dts(&self) -> Option<Micros> {
        let dts = self.current.as_ref()?.dts()?;
        Some(dts.rescale(self.time_base, MICROS_TIME_BASE))
    }

    fn packet_flags(&self) -> BufferFlags {
        match &self.current {
            Some(packet) if packet.is_key() => BufferFlags::KEY_FRAME,
            _ => BufferFlags::NONE,
        }
    }

    fn advance(&mut self) -> bool {
        match self.load_next() {
            Ok(more) => more,
            Err(e) => {
                debug!("Treating read failure as end of stream: {}", e);
                false
            }
        }
    }
}
