// Pitch-preserving time-stretch through an atempo filter graph

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{sample, Sample};
use ffmpeg_next::{filter, frame, ChannelLayout};
use std::collections::VecDeque;
use tracing::debug;

use super::ff_error;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::TimeStretcher;

/// Tempo range a single atempo instance accepts
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 100.0;

/// Filter chain realizing `speed` with atempo instances kept inside their range
pub fn atempo_chain(speed: f64) -> String {
    let mut factors = Vec::new();
    let mut remaining = speed;
    while remaining < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    while remaining > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    factors.push(remaining);

    factors
        .iter()
        .map(|factor| format!("atempo={}", factor))
        .collect::<Vec<_>>()
        .join(",")
}

/// abuffer -> atempo chain -> abuffersink over packed S16 audio.
///
/// The graph is rebuilt on every speed change after its tail is drained.
pub struct AtempoStretcher {
    graph: filter::Graph,
    speed: f64,
    sample_rate: u32,
    channels: u16,
    layout: ChannelLayout,
    /// Source-side sample counter, used as the abuffer pts
    samples_in: i64,
    ready: VecDeque<i16>,
}

impl AtempoStretcher {
    pub fn new(sample_rate: u32, channels: u16) -> PipelineResult<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(PipelineError::collaborator(
                "time stretcher",
                format!("unsupported layout {} Hz / {} channels", sample_rate, channels),
            ));
        }
        let layout = ChannelLayout::default(channels as i32);
        let graph = build_graph(sample_rate, layout, 1.0)?;
        Ok(Self {
            graph,
            speed: 1.0,
            sample_rate,
            channels,
            layout,
            samples_in: 0,
            ready: VecDeque::new(),
        })
    }

    /// Move every frame the sink has ready into `ready`
    fn pull(&mut self) -> PipelineResult<()> {
        let mut sink = self
            .graph
            .get("out")
            .ok_or_else(|| PipelineError::collaborator("time stretcher", "missing sink"))?;
        let mut stretched = frame::Audio::empty();
        loop {
            match sink.sink().frame(&mut stretched) {
                Ok(()) => {
                    let samples = stretched.samples() * self.channels as usize;
                    let plane = stretched.data(0);
                    let bytes = (samples * 2).min(plane.len());
                    self.ready.extend(
                        plane[..bytes]
                            .chunks_exact(2)
                            .map(|pair| i16::from_ne_bytes([pair[0], pair[1]])),
                    );
                }
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                    return Ok(())
                }
                Err(e) => return Err(PipelineError::collaborator("time stretcher read", e)),
            }
        }
    }

    /// Signal end of input, drain the tail and start a fresh graph at `speed`
    fn drain_and_rebuild(&mut self, speed: f64) -> PipelineResult<()> {
        {
            let mut source = self
                .graph
                .get("in")
                .ok_or_else(|| PipelineError::collaborator("time stretcher", "missing source"))?;
            source
                .source()
                .flush()
                .map_err(ff_error("time stretcher flush"))?;
        }
        self.pull()?;
        self.graph = build_graph(self.sample_rate, self.layout, speed)?;
        self.samples_in = 0;
        Ok(())
    }
}

fn build_graph(sample_rate: u32, layout: ChannelLayout, speed: f64) -> PipelineResult<filter::Graph> {
    let mut graph = filter::Graph::new();
    let args = format!(
        "time_base=1/{rate}:sample_rate={rate}:sample_fmt={fmt}:channel_layout=0x{layout:x}",
        rate = sample_rate,
        fmt = Sample::I16(sample::Type::Packed).name(),
        layout = layout.bits()
    );

    let abuffer = filter::find("abuffer")
        .ok_or_else(|| PipelineError::collaborator("time stretcher", "abuffer filter missing"))?;
    let abuffersink = filter::find("abuffersink").ok_or_else(|| {
        PipelineError::collaborator("time stretcher", "abuffersink filter missing")
    })?;

    graph
        .add(&abuffer, "in", &args)
        .map_err(ff_error("time stretcher source"))?;
    graph
        .add(&abuffersink, "out", "")
        .map_err(ff_error("time stretcher sink"))?;

    let chain = atempo_chain(speed);
    graph
        .output("in", 0)
        .and_then(|parser| parser.input("out", 0))
        .and_then(|parser| parser.parse(&chain))
        .map_err(ff_error("time stretcher chain"))?;
    graph.validate().map_err(ff_error("time stretcher graph"))?;

    debug!("Built time-stretch graph: {}", chain);
    Ok(graph)
}

impl TimeStretcher for AtempoStretcher {
    fn set_speed(&mut self, speed: f64) -> PipelineResult<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PipelineError::collaborator(
                "time stretcher",
                format!("invalid speed {}", speed),
            ));
        }
        if speed != self.speed {
            self.drain_and_rebuild(speed)?;
            self.speed = speed;
        }
        Ok(())
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn write_samples(&mut self, samples: &[i16]) -> PipelineResult<()> {
        let frames = samples.len() / self.channels as usize;
        if frames == 0 {
            return Ok(());
        }

        let mut input = frame::Audio::new(Sample::I16(sample::Type::Packed), frames, self.layout);
        input.set_rate(self.sample_rate);
        input.set_pts(Some(self.samples_in));
        for (slot, value) in input.data_mut(0).chunks_exact_mut(2).zip(samples) {
            slot.copy_from_slice(&value.to_ne_bytes());
        }
        self.samples_in += frames as i64;

        {
            let mut source = self
                .graph
                .get("in")
                .ok_or_else(|| PipelineError::collaborator("time stretcher", "missing source"))?;
            source
                .source()
                .add(&input)
                .map_err(ff_error("time stretcher write"))?;
        }
        self.pull()
    }

    fn read_samples(&mut self, out: &mut [i16]) -> PipelineResult<usize> {
        let channels = self.channels as usize;
        let frames = (out.len() / channels).min(self.ready.len() / channels);
        for (slot, value) in out[..frames * channels].iter_mut().zip(self.ready.drain(..frames * channels)) {
            *slot = value;
        }
        Ok(frames)
    }

    fn flush(&mut self) -> PipelineResult<()> {
        self.drain_and_rebuild(self.speed)
    }
}
