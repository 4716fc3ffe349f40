//! VRAW stream reader

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytemuck::cast_slice_mut;
use tracing::{debug, warn};

use super::audio::AudioBlock;
use super::format::{FrameHeader, StreamHeader, FRAME_HEADER_SIZE};
use super::index::{FrameIndex, IndexSource};
use crate::compression::{ByteCompressor, Lz4Block};
use crate::packing::{unpack, BitDepth};
use crate::transform::LogCurve;
use crate::{Result, VrawError};

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame header as stored
    pub header: FrameHeader,
    /// Row-major samples (log codes for log-encoded streams)
    pub samples: Vec<u16>,
}

/// Reader for VRAW streams
pub struct VrawReader<R: Read + Seek = BufReader<File>> {
    source: R,
    header: StreamHeader,
    index: FrameIndex,
    index_source: IndexSource,
    file_len: u64,
    depth: Option<BitDepth>,
    curve: Option<LogCurve>,
    last_packed: bool,
    payload: Vec<u8>,
    decompressed: Vec<u8>,
    codec: Lz4Block,
}

impl VrawReader<BufReader<File>> {
    /// Open a VRAW file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened, the header is invalid,
    /// or no frame index can be recovered
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_source(BufReader::new(file))
    }
}

impl<R: Read + Seek> VrawReader<R> {
    /// Parse the header and acquire the frame index from `source`
    ///
    /// # Errors
    ///
    /// Returns error if the header is invalid or no frame index can be
    /// recovered
    pub fn from_source(mut source: R) -> Result<Self> {
        let file_len = source.seek(SeekFrom::End(0))?;
        source.rewind()?;

        let header = StreamHeader::read_from(&mut source)?;
        let (index, index_source) = FrameIndex::acquire(&mut source, &header, file_len)?;

        if index.len() != header.frame_count as usize {
            warn!(
                "Header declares {} frames, {} recovered",
                header.frame_count,
                index.len()
            );
        }

        let depth = header.encoding.bit_depth();
        let curve = match depth {
            Some(depth) if header.encoding.is_log() => Some(LogCurve::new(
                header.mean_black_level(),
                header.white_level,
                depth,
            )),
            _ => None,
        };

        debug!(
            "Opened VRAW v{}: {}x{}, {:?}, {} frames",
            header.version,
            header.width,
            header.height,
            header.encoding,
            index.len()
        );

        Ok(Self {
            source,
            header,
            index,
            index_source,
            file_len,
            depth,
            curve,
            last_packed: false,
            payload: Vec::new(),
            decompressed: Vec::new(),
            codec: Lz4Block,
        })
    }

    /// Stream header
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Frame index in use
    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    /// How the frame index was obtained
    pub fn index_source(&self) -> IndexSource {
        self.index_source
    }

    /// Number of readable frames
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Frame width
    pub fn width(&self) -> u32 {
        self.header.width
    }

    /// Frame height
    pub fn height(&self) -> u32 {
        self.header.height
    }

    /// Whether the stream declares an audio block
    pub fn has_audio(&self) -> bool {
        self.header.audio.is_some()
    }

    /// Whether the last frame read was bit-packed
    pub fn is_packed(&self) -> bool {
        self.last_packed
    }

    /// Total size of the source
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    fn frame_offset(&self, i: usize) -> Result<u64> {
        self.index.get(i).ok_or(VrawError::FrameOutOfRange {
            index: i,
            count: self.index.len(),
        })
    }

    /// Read only the header of frame `i`
    ///
    /// # Errors
    ///
    /// Returns error if `i` is out of range or the read fails
    pub fn read_frame_header(&mut self, i: usize) -> Result<FrameHeader> {
        let offset = self.frame_offset(i)?;
        self.source.seek(SeekFrom::Start(offset))?;
        FrameHeader::read_from(&mut self.source)
    }

    /// Read and decode frame `i` to stored samples
    ///
    /// Log-encoded streams yield log codes; see
    /// [`read_frame_linear`](VrawReader::read_frame_linear).
    ///
    /// # Errors
    ///
    /// Returns error if `i` is out of range, the read fails, or the payload
    /// is corrupt. A corrupt frame does not affect other frames.
    pub fn read_frame(&mut self, i: usize) -> Result<Frame> {
        let header = self.read_frame_header(i)?;
        let offset = self.frame_offset(i)?;

        let n = self.header.pixel_count();
        let full = self.header.full_frame_size();
        let payload_len = header.payload_size();
        let uncompressed = u64::from(header.uncompressed_size);

        let corrupt = |reason: String| {
            warn!("Frame {i} at offset {offset}: {reason}");
            VrawError::CorruptFrame { frame: i, reason }
        };

        if offset + FRAME_HEADER_SIZE as u64 + payload_len > self.file_len {
            return Err(corrupt(format!(
                "{payload_len}-byte payload extends past end of file"
            )));
        }

        let compressed = header.compressed_size > 0 && self.header.compression.is_enabled();
        let packed = uncompressed > 0 && uncompressed < full;
        if compressed && uncompressed > full {
            return Err(corrupt(format!(
                "uncompressed size {uncompressed} exceeds full frame size {full}"
            )));
        }
        let mut samples = vec![0u16; n];

        if !compressed && !packed {
            if payload_len != full {
                return Err(corrupt(format!(
                    "payload of {payload_len} bytes, expected {full}"
                )));
            }
            self.source.read_exact(cast_slice_mut(&mut samples))?;
            self.last_packed = false;
            return Ok(Frame { header, samples });
        }

        let payload_len = payload_len as usize;
        if self.payload.len() < payload_len {
            self.payload.resize(payload_len, 0);
        }
        self.source.read_exact(&mut self.payload[..payload_len])?;

        let data: &[u8] = if compressed {
            let len = uncompressed as usize;
            if self.decompressed.len() < len {
                self.decompressed.resize(len, 0);
            }
            self.codec
                .decompress(&self.payload[..payload_len], &mut self.decompressed[..len])
                .map_err(|e| corrupt(e.to_string()))?;
            &self.decompressed[..len]
        } else {
            &self.payload[..payload_len]
        };

        if packed {
            let depth = self.depth.ok_or_else(|| {
                VrawError::UnsupportedEncoding(format!("{:?}", self.header.encoding))
            })?;
            let decoded = unpack(depth, data, &mut samples);
            if decoded < n {
                return Err(corrupt(format!(
                    "packed payload holds {decoded} of {n} samples"
                )));
            }
        } else {
            if data.len() as u64 != full {
                return Err(corrupt(format!(
                    "decompressed {} bytes, expected {full}",
                    data.len()
                )));
            }
            cast_slice_mut::<u16, u8>(&mut samples).copy_from_slice(data);
        }

        self.last_packed = packed;
        Ok(Frame { header, samples })
    }

    /// Read frame `i` as linear sensor values
    ///
    /// Log-encoded streams are decoded against the mean black level; linear
    /// streams are returned unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`read_frame`](VrawReader::read_frame)
    pub fn read_frame_linear(&mut self, i: usize) -> Result<Frame> {
        let mut frame = self.read_frame(i)?;
        if let Some(curve) = &self.curve {
            let mut linear = vec![0u16; frame.samples.len()];
            curve.decode(&frame.samples, &mut linear);
            frame.samples = linear;
        }
        Ok(frame)
    }

    /// Read the audio block
    ///
    /// # Errors
    ///
    /// Returns [`VrawError::AudioUnavailable`] if the stream has no audio,
    /// or error if the block is malformed
    pub fn read_audio(&mut self) -> Result<AudioBlock> {
        let offset = match self.header.audio {
            Some(audio) if audio.offset != 0 => audio.offset,
            _ => return Err(VrawError::AudioUnavailable),
        };
        if offset >= self.file_len {
            return Err(VrawError::InvalidAudio(format!(
                "audio offset {offset} is past end of file ({})",
                self.file_len
            )));
        }

        self.source.seek(SeekFrom::Start(offset))?;
        AudioBlock::read_from(&mut self.source, self.file_len - offset)
    }

    /// Release the underlying source
    pub fn into_inner(self) -> R {
        self.source
    }
}
