//! Binary container format for VRAW streams

mod audio;
mod format;
mod index;
mod reader;
mod writer;

pub use audio::{AudioBlock, AudioHeader};
pub use format::{
    AudioDescriptor, BayerPattern, FinalFields, FrameHeader, PixelEncoding, StreamHeader,
    Timecode, TimecodeFormat, AUDIO_HEADER_SIZE, AUDIO_MAGIC, FILE_MAGIC, FILE_VERSION,
    FILE_VERSION_V1, FRAME_HEADER_SIZE, HEADER_SIZE, INDEX_ENTRY_SIZE, INDEX_MAGIC,
    INDEX_TRAILER_SIZE, LEGACY_FILE_MAGIC,
};
pub use index::{FrameIndex, IndexSource};
pub use reader::{Frame, VrawReader};
pub use writer::{FrameMetadata, RecordingStats, VrawWriter, WriterState};
