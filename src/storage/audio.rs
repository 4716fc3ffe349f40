//! PCM audio block codec

use std::io::{Read, Write};

use bytemuck::{bytes_of, cast_slice, cast_slice_mut, from_bytes, Zeroable};

use super::format::{RawAudioHeader, AUDIO_BIT_DEPTH, AUDIO_HEADER_SIZE, AUDIO_MAGIC, AUDIO_VERSION};
use crate::{Result, VrawError};

/// Shape and timing of an audio block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHeader {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample (always 16)
    pub bit_depth: u16,
    /// Samples per channel
    pub sample_count: u64,
    /// Timestamp of the first sample (µs)
    pub start_timestamp_us: u64,
}

/// Interleaved PCM16 audio with its header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlock {
    /// Block header
    pub header: AudioHeader,
    /// Samples, one frame of `channels` values after another
    pub samples: Vec<i16>,
}

impl AudioBlock {
    /// Build a block from interleaved samples
    ///
    /// # Errors
    ///
    /// Returns error if `channels` is zero or the samples do not divide
    /// evenly into channel frames
    pub fn new(
        sample_rate: u32,
        channels: u16,
        start_timestamp_us: u64,
        samples: Vec<i16>,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(VrawError::InvalidAudio("zero channels".to_string()));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(VrawError::InvalidAudio(format!(
                "{} samples do not fill whole {channels}-channel frames",
                samples.len()
            )));
        }

        Ok(Self {
            header: AudioHeader {
                sample_rate,
                channels,
                bit_depth: u16::from(AUDIO_BIT_DEPTH),
                sample_count: (samples.len() / usize::from(channels)) as u64,
                start_timestamp_us,
            },
            samples,
        })
    }

    /// Bytes occupied on disk, header included
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        (AUDIO_HEADER_SIZE + self.samples.len() * 2) as u64
    }

    /// Write header and samples
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut raw = RawAudioHeader::zeroed();
        raw.magic = AUDIO_MAGIC;
        raw.version = AUDIO_VERSION;
        raw.sample_rate = self.header.sample_rate;
        raw.channels = self.header.channels;
        raw.bit_depth = self.header.bit_depth;
        raw.sample_count = self.header.sample_count;
        raw.start_timestamp_us = self.header.start_timestamp_us;

        w.write_all(bytes_of(&raw))?;
        w.write_all(cast_slice(&self.samples))?;
        Ok(())
    }

    /// Read a block from the current position
    ///
    /// `available` bounds the bytes the block may occupy, so a corrupt
    /// sample count cannot trigger an oversized allocation.
    ///
    /// # Errors
    ///
    /// Returns error on a bad magic, unsupported bit depth, a sample count
    /// exceeding `available`, or a short read
    pub fn read_from<R: Read>(r: &mut R, available: u64) -> Result<Self> {
        let mut bytes = [0u8; AUDIO_HEADER_SIZE];
        r.read_exact(&mut bytes)?;
        let raw: RawAudioHeader = *from_bytes(&bytes);

        let magic = raw.magic;
        if magic != AUDIO_MAGIC {
            return Err(VrawError::InvalidAudio(format!(
                "Invalid audio magic: expected {AUDIO_MAGIC:?}, got {magic:?}"
            )));
        }

        let header = AudioHeader {
            sample_rate: raw.sample_rate,
            channels: raw.channels,
            bit_depth: raw.bit_depth,
            sample_count: raw.sample_count,
            start_timestamp_us: raw.start_timestamp_us,
        };

        if header.bit_depth != u16::from(AUDIO_BIT_DEPTH) {
            return Err(VrawError::InvalidAudio(format!(
                "Unsupported audio bit depth {}",
                header.bit_depth
            )));
        }
        if header.channels == 0 {
            return Err(VrawError::InvalidAudio("zero channels".to_string()));
        }

        let payload = header
            .sample_count
            .checked_mul(u64::from(header.channels) * 2)
            .filter(|&len| len <= available.saturating_sub(AUDIO_HEADER_SIZE as u64))
            .ok_or_else(|| {
                VrawError::InvalidAudio(format!(
                    "{} samples x {} channels exceed the {available} bytes available",
                    header.sample_count, header.channels
                ))
            })?;

        let mut samples = vec![0i16; (payload / 2) as usize];
        r.read_exact(cast_slice_mut(&mut samples))?;

        Ok(Self { header, samples })
    }
}
