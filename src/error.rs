//! Error types for VRAW

use std::io;
use thiserror::Error;

/// Result type for VRAW operations
pub type Result<T> = std::result::Result<T, VrawError>;

/// Errors that can occur while writing or reading VRAW streams
#[derive(Debug, Error)]
pub enum VrawError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid or corrupt stream header
    #[error("Invalid VRAW format: {0}")]
    InvalidFormat(String),

    /// Encoding that this codec cannot produce or consume
    #[error("Unsupported pixel encoding: {0}")]
    UnsupportedEncoding(String),

    /// No frame index could be read, validated, or rebuilt
    #[error("Frame index unrecoverable: {0}")]
    IndexUnrecoverable(String),

    /// Frame payload failed size or structure checks
    #[error("Frame {frame} is corrupt: {reason}")]
    CorruptFrame {
        /// Frame index within the stream
        frame: usize,
        /// What was wrong with the payload
        reason: String,
    },

    /// Block compressor rejected its input
    #[error("Compression error: {0}")]
    Compression(String),

    /// Operation not legal in the current writer state
    #[error("Invalid writer state: {0}")]
    InvalidState(String),

    /// Submitted sample buffer does not match the stream resolution
    #[error("Frame size mismatch: got {actual} samples, expected {expected}")]
    FrameSizeMismatch {
        /// Samples expected (width × height)
        expected: usize,
        /// Samples supplied
        actual: usize,
    },

    /// Sample value exceeds the packed bit depth
    #[error("Sample {value} at position {position} exceeds {bits}-bit range")]
    SampleOutOfRange {
        /// Position of the offending sample
        position: usize,
        /// Offending value
        value: u16,
        /// Active bit depth
        bits: u32,
    },

    /// Frame index past the end of the stream
    #[error("Frame index {index} out of range ({count} frames)")]
    FrameOutOfRange {
        /// Requested frame
        index: usize,
        /// Frames available
        count: usize,
    },

    /// Stream carries no audio block
    #[error("Stream has no audio")]
    AudioUnavailable,

    /// Audio block is present but malformed
    #[error("Invalid audio block: {0}")]
    InvalidAudio(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
