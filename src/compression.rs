//! Block compression for frame payloads
//!
//! Frames store both their original and compressed sizes, so decompression
//! always targets an exactly-sized buffer. The stream header declares one of
//! several compression tiers but only LZ4 block compression is ever run; the
//! balanced and high tiers are reserved.

use serde::{Deserialize, Serialize};

use crate::{Result, VrawError};

/// Compression mode declared in the stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Compression {
    /// Frames stored uncompressed
    None = 0,
    /// LZ4 block compression (default)
    #[default]
    Lz4Fast = 1,
    /// Reserved tier, decoded as LZ4
    Lz4Balanced = 2,
    /// Reserved tier, decoded as LZ4
    Lz4High = 3,
}

impl Compression {
    /// Parse a header discriminant
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Lz4Fast),
            2 => Some(Self::Lz4Balanced),
            3 => Some(Self::Lz4High),
            _ => None,
        }
    }

    /// Whether frames may carry compressed payloads
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self != Self::None
    }

    /// Whether the writer can produce this mode
    #[must_use]
    pub fn is_writable(self) -> bool {
        matches!(self, Self::None | Self::Lz4Fast)
    }
}

/// Byte compressor used for frame payloads
pub trait ByteCompressor {
    /// Worst-case output size for `input_len` bytes of input
    fn max_compressed_len(&self, input_len: usize) -> usize;

    /// Compress `src` into `dst`, returning the compressed length
    ///
    /// # Errors
    ///
    /// Returns error if `dst` is too small or compression fails
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize>;

    /// Decompress `src` into `dst`, which must be exactly the original size
    ///
    /// # Errors
    ///
    /// Returns error if `src` is malformed or does not expand to `dst.len()`
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<()>;
}

/// LZ4 block format, no size prefix
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Block;

impl ByteCompressor for Lz4Block {
    fn max_compressed_len(&self, input_len: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(input_len)
    }

    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        lz4_flex::block::compress_into(src, dst)
            .map_err(|e| VrawError::Compression(format!("LZ4 compress failed: {e}")))
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<()> {
        let written = lz4_flex::block::decompress_into(src, dst)
            .map_err(|e| VrawError::Compression(format!("LZ4 decompress failed: {e}")))?;

        if written != dst.len() {
            return Err(VrawError::Compression(format!(
                "LZ4 decompressed {written} bytes, expected {}",
                dst.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_roundtrip() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 17) as u8).collect();
        let codec = Lz4Block;

        let mut compressed = vec![0u8; codec.max_compressed_len(data.len())];
        let len = codec.compress(&data, &mut compressed).unwrap();
        assert!(len < data.len());

        let mut restored = vec![0u8; data.len()];
        codec.decompress(&compressed[..len], &mut restored).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_lz4_size_mismatch() {
        let data = vec![7u8; 1000];
        let codec = Lz4Block;

        let mut compressed = vec![0u8; codec.max_compressed_len(data.len())];
        let len = codec.compress(&data, &mut compressed).unwrap();

        let mut short = vec![0u8; 999];
        assert!(codec.decompress(&compressed[..len], &mut short).is_err());

        let mut long = vec![0u8; 1001];
        assert!(codec.decompress(&compressed[..len], &mut long).is_err());
    }

    #[test]
    fn test_lz4_rejects_garbage() {
        let mut out = vec![0u8; 64];
        assert!(Lz4Block.decompress(&[0xFF, 0xFF, 0xFF], &mut out).is_err());
    }

    #[test]
    fn test_compression_modes() {
        assert_eq!(Compression::from_u8(0), Some(Compression::None));
        assert_eq!(Compression::from_u8(3), Some(Compression::Lz4High));
        assert_eq!(Compression::from_u8(4), None);

        assert!(!Compression::None.is_enabled());
        assert!(Compression::Lz4High.is_enabled());
        assert!(Compression::Lz4Fast.is_writable());
        assert!(!Compression::Lz4Balanced.is_writable());
    }
}
