// Adapters - Concrete collaborator implementations

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::FfmpegBackend;
