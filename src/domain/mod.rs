// Domain layer - Segment plan, timeline arithmetic and media value types

pub mod media;
pub mod plan;
pub mod timeline;

pub use media::{BufferFlags, BufferInfo, SeekMode, TrackFormat, TrackKind};
pub use plan::{Segment, SegmentPlan};
pub use timeline::{
    secs_to_micros, AudioClock, DecodeOrder, Micros, TimelineMapper, TimelineState,
};
