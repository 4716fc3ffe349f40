//! VRAW - RAW sensor video codec and container
//!
//! Frames of 10/12-bit sensor samples pass through an optional log curve,
//! optional bit packing and optional LZ4 block compression before landing
//! in a seekable container. The container carries a frame index that can be
//! rebuilt from the frame headers when a recording was never finalized.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::multiple_crate_versions
)]

pub mod compression;
pub mod config;
pub mod error;
pub mod packing;
pub mod storage;
pub mod transform;

pub use compression::Compression;
pub use config::{AudioConfig, WriterConfig};
pub use error::{Result, VrawError};
pub use packing::BitDepth;
pub use storage::{
    BayerPattern, Frame, FrameMetadata, PixelEncoding, RecordingStats, VrawReader, VrawWriter,
};
pub use transform::LogCurve;
