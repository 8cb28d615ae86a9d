// Audio decoder/encoder adapters presenting libav's send/receive API as buffer queues

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{sample, Sample};
use ffmpeg_next::software::resampling;
use ffmpeg_next::{codec, decoder, encoder, frame, ChannelLayout, Packet, Rational, Rescale};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::{ff_error, FfmpegFormat, MICROS_TIME_BASE};
use crate::domain::media::{BufferFlags, BufferInfo};
use crate::domain::timeline::{Micros, MICROS_PER_SECOND};
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{EncoderSettings, InputSlot, MediaCodec, OutputSlot};

/// Largest compressed audio packet accepted by the decoder
const DECODER_INPUT_CAPACITY: usize = 64 * 1024;

/// Encoder input slot size, in encoder frames
const ENCODER_INPUT_FRAMES: usize = 4;

/// Frame size assumed for encoders that accept any size
const FALLBACK_FRAME_SIZE: usize = 1024;

fn packed_s16() -> Sample {
    Sample::I16(sample::Type::Packed)
}

fn is_again(error: &ffmpeg::Error) -> bool {
    matches!(error, ffmpeg::Error::Other { errno } if *errno == ffmpeg::util::error::EAGAIN)
}

fn layout_for(layout: ChannelLayout, channels: u16) -> ChannelLayout {
    if layout.is_empty() {
        ChannelLayout::default(channels as i32)
    } else {
        layout
    }
}

/// Ready output buffers plus the one currently handed to the engine
#[derive(Default)]
struct OutputQueue {
    ready: VecDeque<(Vec<u8>, BufferInfo)>,
    current: Vec<u8>,
    next_index: usize,
    eos_emitted: bool,
}

impl OutputQueue {
    fn push(&mut self, data: Vec<u8>, pts: Micros, flags: BufferFlags) {
        let info = BufferInfo::new(data.len(), pts, flags);
        self.ready.push_back((data, info));
    }

    fn push_end_of_stream(&mut self, pts: Micros) {
        if !self.eos_emitted {
            self.eos_emitted = true;
            self.push(Vec::new(), pts, BufferFlags::END_OF_STREAM);
        }
    }

    fn pop(&mut self) -> Option<OutputSlot> {
        let (data, info) = self.ready.pop_front()?;
        self.current = data;
        let index = self.next_index;
        self.next_index += 1;
        Some(OutputSlot { index, info })
    }

    fn clear(&mut self) {
        self.ready.clear();
        self.current.clear();
    }
}

/// Decodes compressed audio to interleaved S16 PCM
pub struct FfmpegAudioDecoder {
    decoder: decoder::Audio,
    resampler: Option<resampling::Context>,
    outputs: OutputQueue,
    next_pts: Micros,
    eos_sent: bool,
}

impl FfmpegAudioDecoder {
    pub fn new(format: &FfmpegFormat) -> PipelineResult<Self> {
        let decoder = codec::context::Context::from_parameters(format.parameters().clone())
            .and_then(|ctx| ctx.decoder().audio())
            .map_err(ff_error("audio decoder configure"))?;
        debug!(
            "Audio decoder: {:?} {} Hz, {} channels",
            decoder.id(),
            decoder.rate(),
            decoder.channels()
        );
        Ok(Self {
            decoder,
            resampler: None,
            outputs: OutputQueue::default(),
            next_pts: 0,
            eos_sent: false,
        })
    }

    fn collect(&mut self) -> PipelineResult<()> {
        let mut decoded = frame::Audio::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pts = decoded.pts().unwrap_or(self.next_pts);
                    let bytes = self.to_interleaved(&decoded)?;
                    let rate = decoded.rate().max(1) as i64;
                    self.next_pts = pts + decoded.samples() as i64 * MICROS_PER_SECOND / rate;
                    self.outputs.push(bytes, pts, BufferFlags::NONE);
                }
                Err(ffmpeg::Error::Eof) => {
                    self.outputs.push_end_of_stream(self.next_pts);
                    return Ok(());
                }
                Err(e) if is_again(&e) => return Ok(()),
                Err(e) => return Err(PipelineError::collaborator("audio decode", e)),
            }
        }
    }

    fn to_interleaved(&mut self, decoded: &frame::Audio) -> PipelineResult<Vec<u8>> {
        let channels = decoded.channels();
        if decoded.format() == packed_s16() {
            return Ok(native_to_le(decoded.data(0), decoded.samples() * channels as usize));
        }

        if self.resampler.is_none() {
            let layout = layout_for(decoded.channel_layout(), channels);
            let resampler = resampling::Context::get(
                decoded.format(),
                layout,
                decoded.rate(),
                packed_s16(),
                layout,
                decoded.rate(),
            )
            .map_err(ff_error("audio decoder resampler"))?;
            self.resampler = Some(resampler);
        }

        let mut converted = frame::Audio::empty();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler
                .run(decoded, &mut converted)
                .map_err(ff_error("audio decoder resample"))?;
        }
        Ok(native_to_le(
            converted.data(0),
            converted.samples() * channels as usize,
        ))
    }
}

/// Copy `samples` native-endian i16 values out of a frame plane as little-endian bytes
fn native_to_le(plane: &[u8], samples: usize) -> Vec<u8> {
    let bytes = (samples * 2).min(plane.len());
    let mut out = Vec::with_capacity(bytes);
    for pair in plane[..bytes].chunks_exact(2) {
        let value = i16::from_ne_bytes([pair[0], pair[1]]);
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

impl MediaCodec for FfmpegAudioDecoder {
    type Format = FfmpegFormat;

    fn start(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    fn output_format(&self) -> PipelineResult<FfmpegFormat> {
        Ok(FfmpegFormat::from_parameters(
            codec::Parameters::from(&self.decoder),
            MICROS_TIME_BASE,
        ))
    }

    // libav calls are synchronous, so the timeout is never waited on
    fn dequeue_input_slot(&mut self, _timeout: Duration) -> PipelineResult<Option<InputSlot>> {
        if self.eos_sent {
            return Ok(None);
        }
        Ok(Some(InputSlot {
            index: 0,
            capacity: DECODER_INPUT_CAPACITY,
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
            self.decoder.send_eof().map_err(ff_error("audio decoder eof"))?;
            self.eos_sent = true;
            return self.collect();
        }

        let mut packet = Packet::copy(data);
        packet.set_pts(Some(pts));
        if let Err(e) = self.decoder.send_packet(&packet) {
            if !is_again(&e) {
                return Err(PipelineError::collaborator("audio decoder input", e));
            }
            self.collect()?;
            self.decoder
                .send_packet(&packet)
                .map_err(ff_error("audio decoder input"))?;
        }
        self.collect()
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> PipelineResult<Option<OutputSlot>> {
        if self.outputs.ready.is_empty() {
            self.collect()?;
        }
        Ok(self.outputs.pop())
    }

    fn output_data(&self, _slot: &OutputSlot) -> &[u8] {
        &self.outputs.current
    }

    fn release_output(&mut self, _slot: OutputSlot) -> PipelineResult<()> {
        self.outputs.current.clear();
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.outputs.clear();
        self.decoder.flush();
        Ok(())
    }
}

/// Encodes interleaved S16 PCM into fixed-size codec frames
pub struct FfmpegAudioEncoder {
    encoder: encoder::Audio,
    resampler: resampling::Context,
    layout: ChannelLayout,
    sample_rate: u32,
    channels: u16,
    frame_size: usize,
    fifo: Vec<i16>,
    /// Output pts of the first frame left in `fifo`
    fifo_pts: Option<Micros>,
    outputs: OutputQueue,
    last_pts: Micros,
    eos_sent: bool,
}

impl FfmpegAudioEncoder {
    pub fn new(settings: &EncoderSettings) -> PipelineResult<Self> {
        let codec = encoder::find_by_name(&settings.codec).ok_or_else(|| {
            PipelineError::collaborator(
                "audio encoder configure",
                format!("encoder '{}' not available", settings.codec),
            )
        })?;

        let mut audio = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(ff_error("audio encoder configure"))?;

        let layout = ChannelLayout::default(settings.channels as i32);
        let format = codec
            .audio()
            .ok()
            .and_then(|audio| audio.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(Sample::F32(sample::Type::Planar));

        audio.set_rate(settings.sample_rate as i32);
        audio.set_channel_layout(layout);
        audio.set_format(format);
        audio.set_bit_rate(settings.bit_rate as usize);
        audio.set_time_base(Rational(1, settings.sample_rate as i32));
        audio.set_flags(codec::flag::Flags::GLOBAL_HEADER);

        let encoder = audio
            .open_as(codec)
            .map_err(ff_error("audio encoder open"))?;

        let frame_size = match encoder.frame_size() as usize {
            0 => FALLBACK_FRAME_SIZE,
            size => size,
        };

        let resampler = resampling::Context::get(
            packed_s16(),
            layout,
            settings.sample_rate,
            format,
            layout,
            settings.sample_rate,
        )
        .map_err(ff_error("audio encoder resampler"))?;

        debug!(
            "Audio encoder {}: {} Hz, {} channels, {} bps, frame size {}",
            settings.codec, settings.sample_rate, settings.channels, settings.bit_rate, frame_size
        );

        Ok(Self {
            encoder,
            resampler,
            layout,
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            frame_size,
            fifo: Vec::new(),
            fifo_pts: None,
            outputs: OutputQueue::default(),
            last_pts: 0,
            eos_sent: false,
        })
    }

    fn encoder_time_base(&self) -> Rational {
        Rational(1, self.sample_rate as i32)
    }

    /// Encode the first `frames` frames of the fifo
    fn encode_frames(&mut self, frames: usize) -> PipelineResult<()> {
        let samples = frames * self.channels as usize;
        let pts = self.fifo_pts.unwrap_or(self.last_pts);

        let mut input = frame::Audio::new(packed_s16(), frames, self.layout);
        input.set_rate(self.sample_rate);
        for (slot, value) in input
            .data_mut(0)
            .chunks_exact_mut(2)
            .zip(&self.fifo[..samples])
        {
            slot.copy_from_slice(&value.to_ne_bytes());
        }
        self.fifo.drain(..samples);

        let mut converted = frame::Audio::empty();
        self.resampler
            .run(&input, &mut converted)
            .map_err(ff_error("audio encoder resample"))?;
        converted.set_pts(Some(pts.rescale(MICROS_TIME_BASE, self.encoder_time_base())));

        self.encoder
            .send_frame(&converted)
            .map_err(ff_error("audio encoder input"))?;

        let next = pts + frames as i64 * MICROS_PER_SECOND / self.sample_rate as i64;
        self.fifo_pts = if self.fifo.is_empty() { None } else { Some(next) };
        self.last_pts = next;
        self.collect()
    }

    fn collect(&mut self) -> PipelineResult<()> {
        let time_base = self.encoder_time_base();
        let mut packet = Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    let pts = packet
                        .pts()
                        .map_or(self.last_pts, |pts| pts.rescale(time_base, MICROS_TIME_BASE));
                    let data = packet.data().map(<[u8]>::to_vec).unwrap_or_default();
                    self.outputs.push(data, pts, BufferFlags::NONE);
                }
                Err(ffmpeg::Error::Eof) => {
                    self.outputs.push_end_of_stream(self.last_pts);
                    return Ok(());
                }
                Err(e) if is_again(&e) => return Ok(()),
                Err(e) => return Err(PipelineError::collaborator("audio encode", e)),
            }
        }
    }
}

impl MediaCodec for FfmpegAudioEncoder {
    type Format = FfmpegFormat;

    fn start(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    fn output_format(&self) -> PipelineResult<FfmpegFormat> {
        Ok(FfmpegFormat::from_parameters(
            codec::Parameters::from(&self.encoder),
            self.encoder_time_base(),
        ))
    }

    fn dequeue_input_slot(&mut self, _timeout: Duration) -> PipelineResult<Option<InputSlot>> {
        if self.eos_sent {
            return Ok(None);
        }
        Ok(Some(InputSlot {
            index: 0,
            capacity: self.frame_size * ENCODER_INPUT_FRAMES * self.channels as usize * 2,
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
            let remaining = self.fifo.len() / self.channels as usize;
            if remaining > 0 {
                self.encode_frames(remaining)?;
            }
            self.encoder.send_eof().map_err(ff_error("audio encoder eof"))?;
            self.eos_sent = true;
            return self.collect();
        }

        if self.fifo.is_empty() {
            self.fifo_pts = Some(pts);
        }
        self.fifo.extend(
            data.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );

        let frame_samples = self.frame_size * self.channels as usize;
        while self.fifo.len() >= frame_samples {
            self.encode_frames(self.frame_size)?;
        }
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> PipelineResult<Option<OutputSlot>> {
        if self.outputs.ready.is_empty() {
            self.collect()?;
        }
        Ok(self.outputs.pop())
    }

    fn output_data(&self, _slot: &OutputSlot) -> &[u8] {
        &self.outputs.current
    }

    fn release_output(&mut self, _slot: OutputSlot) -> PipelineResult<()> {
        self.outputs.current.clear();
        Ok(())
    }

    fn stop(&mut self) -> PipelineResult<()> {
        self.outputs.clear();
        self.fifo.clear();
        Ok(())
    }
}
