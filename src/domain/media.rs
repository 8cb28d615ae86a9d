// Media value types shared by the ports and the engine

use std::fmt;
use std::ops::BitOr;

use crate::domain::timeline::Micros;

/// Kind of elementary stream carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

impl TrackKind {
    /// Classify a track from its MIME type (`video/avc`, `audio/mp4a-latm`, ...)
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("video/") {
            TrackKind::Video
        } else if mime.starts_with("audio/") {
            TrackKind::Audio
        } else {
            TrackKind::Other
        }
    }
}

/// Per-buffer flags attached to packets and codec buffers
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    pub const KEY_FRAME: BufferFlags = BufferFlags(1);
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(1 << 1);
    pub const END_OF_STREAM: BufferFlags = BufferFlags(1 << 2);

    pub fn from_bits(bits: u32) -> Self {
        BufferFlags(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// These flags with every bit of `other` cleared
    pub fn without(self, other: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 & !other.0)
    }

    pub fn is_end_of_stream(self) -> bool {
        self.contains(BufferFlags::END_OF_STREAM)
    }
}

impl BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(BufferFlags::KEY_FRAME) {
            names.push("KEY_FRAME");
        }
        if self.contains(BufferFlags::CODEC_CONFIG) {
            names.push("CODEC_CONFIG");
        }
        if self.contains(BufferFlags::END_OF_STREAM) {
            names.push("END_OF_STREAM");
        }
        write!(f, "BufferFlags({})", names.join(" | "))
    }
}

/// Where a seek lands relative to the requested timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Nearest sync point at or before the target
    PreviousSync,
}

/// Size, timestamp and flags of one codec or muxer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub size: usize,
    pub pts: Micros,
    /// Decode timestamp; `None` means decode order equals presentation order
    pub dts: Option<Micros>,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn new(size: usize, pts: Micros, flags: BufferFlags) -> Self {
        Self {
            size,
            pts,
            dts: None,
            flags,
        }
    }

    pub fn with_dts(mut self, dts: Option<Micros>) -> Self {
        self.dts = dts;
        self
    }

    /// Decode timestamp, falling back to the presentation timestamp
    pub fn decode_ts(&self) -> Micros {
        self.dts.unwrap_or(self.pts)
    }
}

/// Track format as exposed by a demuxer or negotiated by a codec.
///
/// Backends keep whatever native parameters they need alongside these
/// accessors; the engine only reads the fields below.
pub trait TrackFormat: Clone + fmt::Debug {
    /// MIME type of the track
    fn mime(&self) -> &str;

    /// Audio sample rate in Hz
    fn sample_rate(&self) -> Option<u32>;

    /// Audio channel count
    fn channel_count(&self) -> Option<u16>;

    fn kind(&self) -> TrackKind {
        TrackKind::from_mime(self.mime())
    }
}
