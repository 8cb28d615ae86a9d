//! Pipeline orchestrator: owns the collaborators of one run and sequences the stages

use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::domain::media::{TrackFormat, TrackKind};
use crate::domain::plan::SegmentPlan;
use crate::engine::audio::{AudioSpeedStage, PcmLayout};
use crate::engine::video::VideoRemapStage;
use crate::engine::PipelineReport;
use crate::error::{PipelineError, PipelineResult};
use crate::ports::{Demuxer, EncoderSettings, MediaBackend, MediaCodec, Muxer};

/// Everything acquired during a run; released in a fixed order by [`Resources::teardown`]
struct Resources<B: MediaBackend> {
    demuxer: Option<B::Demuxer>,
    muxer: Option<B::Muxer>,
    decoder: Option<B::Decoder>,
    encoder: Option<B::Encoder>,
    stretcher: Option<B::Stretcher>,
    muxer_started: bool,
    decoder_started: bool,
    encoder_started: bool,
}

impl<B: MediaBackend> Resources<B> {
    fn new() -> Self {
        Self {
            demuxer: None,
            muxer: None,
            decoder: None,
            encoder: None,
            stretcher: None,
            muxer_started: false,
            decoder_started: false,
            encoder_started: false,
        }
    }

    /// Encoder, decoder, stretcher, muxer, demuxer. Every step runs even if an
    /// earlier one failed; the first error is returned.
    fn teardown(&mut self) -> PipelineResult<()> {
        let mut first_error = None;

        if let Some(mut encoder) = self.encoder.take() {
            if self.encoder_started {
                record(&mut first_error, "audio encoder", encoder.stop());
            }
            debug!("Released audio encoder");
        }
        if let Some(mut decoder) = self.decoder.take() {
            if self.decoder_started {
                record(&mut first_error, "audio decoder", decoder.stop());
            }
            debug!("Released audio decoder");
        }
        if self.stretcher.take().is_some() {
            debug!("Released time stretcher");
        }
        if let Some(mut muxer) = self.muxer.take() {
            if self.muxer_started {
                record(&mut first_error, "muxer", muxer.stop());
            }
            debug!("Released muxer");
        }
        if self.demuxer.take().is_some() {
            debug!("Released demuxer");
        }

        self.encoder_started = false;
        self.decoder_started = false;
        self.muxer_started = false;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<B: MediaBackend> Drop for Resources<B> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Error while releasing pipeline resources: {}", e);
        }
    }
}

fn record(slot: &mut Option<PipelineError>, what: &str, result: PipelineResult<()>) {
    if let Err(e) = result {
        warn!("Failed to stop {}: {}", what, e);
        if slot.is_none() {
            *slot = Some(e);
        }
    }
}

/// Track selection found in the source
struct SourceTracks<F> {
    video_index: usize,
    video_format: F,
    audio: Option<(usize, F)>,
}

/// Runs the video stage and then the optional audio stage against one backend
pub struct PipelineOrchestrator<B: MediaBackend> {
    backend: B,
    config: PipelineConfig,
}

impl<B: MediaBackend> PipelineOrchestrator<B> {
    pub fn new(backend: B, config: PipelineConfig) -> Self {
        Self { backend, config }
    }

    /// Process `source` into `destination` according to `plan`.
    ///
    /// Codec and track problems are detected before the destination is
    /// opened, so those failures leave it untouched.
    pub fn run(
        &self,
        source: &Path,
        destination: &Path,
        plan: &SegmentPlan,
    ) -> PipelineResult<PipelineReport> {
        self.config.validate()?;
        info!(
            "Starting pipeline: {} -> {} ({} segments, planned output {}us)",
            source.display(),
            destination.display(),
            plan.len(),
            plan.total_output_duration()
        );

        let mut resources: Resources<B> = Resources::new();
        match self.execute(&mut resources, source, destination, plan) {
            Ok(report) => {
                resources.teardown()?;
                info!(
                    "Pipeline finished: {} video packets, {} audio frames",
                    report.video.packets_written,
                    report
                        .audio
                        .as_ref()
                        .map_or(0, |audio| audio.encoded_frames_written)
                );
                Ok(report)
            }
            Err(e) => {
                error!("Pipeline failed: {}", e);
                if let Err(cleanup) = resources.teardown() {
                    debug!("Secondary error during teardown: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        resources: &mut Resources<B>,
        source: &Path,
        destination: &Path,
        plan: &SegmentPlan,
    ) -> PipelineResult<PipelineReport> {
        let demuxer = resources.demuxer.insert(self.backend.open_demuxer(source)?);
        let tracks = find_tracks(demuxer)?;

        let mut pcm = None;
        if let Some((index, format)) = &tracks.audio {
            let layout = pcm_layout(format)?;
            info!(
                "Audio track {}: {} ({} Hz, {} channels)",
                index,
                format.mime(),
                layout.sample_rate,
                layout.channels
            );

            resources.decoder = Some(self.backend.create_decoder(format)?);

            let settings = EncoderSettings {
                codec: self.config.audio_codec.clone(),
                bit_rate: self.config.audio_bitrate,
                sample_rate: layout.sample_rate,
                channels: layout.channels,
            };
            let encoder = resources
                .encoder
                .insert(self.backend.create_encoder(&settings)?);
            encoder.start()?;
            resources.encoder_started = true;

            resources.stretcher = Some(
                self.backend
                    .create_stretcher(layout.sample_rate, layout.channels)?,
            );
            pcm = Some(layout);
        } else {
            info!("Source has no audio track; producing video-only output");
        }

        let muxer = resources.muxer.insert(self.backend.open_muxer(destination)?);
        let video_track = muxer.add_track(&tracks.video_format)?;
        let audio_track = match resources.encoder.as_ref() {
            Some(encoder) => Some(muxer.add_track(&encoder.output_format()?)?),
            None => None,
        };
        muxer.start()?;
        resources.muxer_started = true;

        let (demuxer, muxer) = match (resources.demuxer.as_mut(), resources.muxer.as_mut()) {
            (Some(demuxer), Some(muxer)) => (demuxer, muxer),
            _ => return Err(PipelineError::collaborator("pipeline", "resources released early")),
        };

        demuxer.select_track(tracks.video_index)?;
        let video = VideoRemapStage::new(plan, &self.config, video_track).run(demuxer, muxer)?;

        let audio = match (tracks.audio, audio_track, pcm) {
            (Some((audio_index, _)), Some(track), Some(layout)) => {
                demuxer.select_track(audio_index)?;
                let (decoder, stretcher, encoder) = match (
                    resources.decoder.as_mut(),
                    resources.stretcher.as_mut(),
                    resources.encoder.as_mut(),
                ) {
                    (Some(decoder), Some(stretcher), Some(encoder)) => (decoder, stretcher, encoder),
                    _ => {
                        return Err(PipelineError::collaborator(
                            "pipeline",
                            "audio collaborators missing",
                        ))
                    }
                };
                decoder.start()?;
                resources.decoder_started = true;

                let stage = AudioSpeedStage::new(plan, &self.config, track, layout);
                Some(stage.run(demuxer, decoder, stretcher, encoder, muxer)?)
            }
            _ => None,
        };

        Ok(PipelineReport::new(plan, video, audio))
    }
}

/// First video and first audio track of the source
fn find_tracks<D: Demuxer>(demuxer: &D) -> PipelineResult<SourceTracks<D::Format>> {
    let mut video = None;
    let mut audio = None;

    for index in 0..demuxer.track_count() {
        let format = demuxer.track_format(index)?;
        debug!("Track {}: {}", index, format.mime());
        match format.kind() {
            TrackKind::Video if video.is_none() => video = Some((index, format)),
            TrackKind::Audio if audio.is_none() => audio = Some((index, format)),
            _ => {}
        }
    }

    let (video_index, video_format) = video.ok_or(PipelineError::NoVideoTrack)?;
    info!("Video track {}: {}", video_index, video_format.mime());
    Ok(SourceTracks {
        video_index,
        video_format,
        audio,
    })
}

fn pcm_layout<F: TrackFormat>(format: &F) -> PipelineResult<PcmLayout> {
    match (format.sample_rate(), format.channel_count()) {
        (Some(sample_rate), Some(channels)) if sample_rate > 0 && channels > 0 => Ok(PcmLayout {
            sample_rate,
            channels,
        }),
        (rate, channels) => Err(PipelineError::collaborator(
            "audio track format",
            format!(
                "missing sample rate or channel count (rate={:?}, channels={:?})",
                rate, channels
            ),
        )),
    }
}
