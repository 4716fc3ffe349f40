//! Binary format structures
//!
//! ```text
//! +---------------------------+  0
//! | file header (512 bytes)   |
//! +---------------------------+  512
//! | frame header (64 bytes)   |
//! | frame payload             |
//! | ... one pair per frame    |
//! +---------------------------+
//! | audio block (optional)    |
//! +---------------------------+  index_offset
//! | u64 offset per frame      |
//! | "MIDX" | count | reserved |
//! +---------------------------+
//! ```
//!
//! All multi-byte fields are little-endian. Header records are read and
//! written by casting packed `Pod` structs, so hosts must be little-endian.

use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::offset_of;

use bytemuck::{bytes_of, from_bytes, Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::packing::BitDepth;
use crate::{Result, VrawError};

#[cfg(not(target_endian = "little"))]
compile_error!("VRAW header records are cast directly and require a little-endian host");

/// File magic written by this codec
pub const FILE_MAGIC: [u8; 4] = *b"VRAW";

/// File magic of legacy recordings, accepted on read
pub const LEGACY_FILE_MAGIC: [u8; 4] = *b"MRAW";

/// Audio block magic
pub const AUDIO_MAGIC: [u8; 4] = *b"MAUD";

/// Index trailer magic
pub const INDEX_MAGIC: [u8; 4] = *b"MIDX";

/// Current format version
/// Version 2 adds native resolution, binning, audio, timecode and orientation
pub const FILE_VERSION: u32 = 2;

/// Format version 1 (legacy)
pub const FILE_VERSION_V1: u32 = 1;

/// Audio block version
pub const AUDIO_VERSION: u32 = 1;

/// File header size
pub const HEADER_SIZE: usize = 512;

/// Frame header size
pub const FRAME_HEADER_SIZE: usize = 64;

/// Audio block header size
pub const AUDIO_HEADER_SIZE: usize = 64;

/// Index entry size (one absolute u64 offset)
pub const INDEX_ENTRY_SIZE: usize = 8;

/// Index trailer size: magic + frame count + reserved
pub const INDEX_TRAILER_SIZE: usize = 16;

/// Sample bit depth of the audio stream
pub const AUDIO_BIT_DEPTH: u8 = 16;

/// Sensor color filter arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum BayerPattern {
    /// Red, green / green, blue
    #[default]
    Rggb = 0,
    /// Green, red / blue, green
    Grbg = 1,
    /// Green, blue / red, green
    Gbrg = 2,
    /// Blue, green / green, red
    Bggr = 3,
}

impl BayerPattern {
    /// Parse a header discriminant
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Rggb),
            1 => Some(Self::Grbg),
            2 => Some(Self::Gbrg),
            3 => Some(Self::Bggr),
            _ => None,
        }
    }
}

/// Pixel encoding of frame samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PixelEncoding {
    /// Linear 10-bit samples
    Linear10 = 0,
    /// Log2-encoded 10-bit codes
    Log10 = 1,
    /// Reserved
    Log8 = 2,
    /// Reserved
    Cineon10 = 3,
    /// Log2-encoded 12-bit codes
    Log12 = 4,
    /// Linear 12-bit samples
    #[default]
    Linear12 = 5,
}

impl PixelEncoding {
    /// Parse a header discriminant
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Linear10),
            1 => Some(Self::Log10),
            2 => Some(Self::Log8),
            3 => Some(Self::Cineon10),
            4 => Some(Self::Log12),
            5 => Some(Self::Linear12),
            _ => None,
        }
    }

    /// Bit depth of stored samples, `None` for reserved encodings
    #[must_use]
    pub fn bit_depth(self) -> Option<BitDepth> {
        match self {
            Self::Linear10 | Self::Log10 => Some(BitDepth::Ten),
            Self::Linear12 | Self::Log12 => Some(BitDepth::Twelve),
            Self::Log8 | Self::Cineon10 => None,
        }
    }

    /// Whether samples pass through the log tone curve
    #[must_use]
    pub fn is_log(self) -> bool {
        matches!(self, Self::Log10 | Self::Log12)
    }
}

/// Timecode flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TimecodeFormat {
    /// SMPTE 12M
    #[default]
    Smpte = 0,
    /// Linear timecode
    Ltc = 1,
    /// EBU
    Ebu = 2,
}

impl TimecodeFormat {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ltc,
            2 => Self::Ebu,
            _ => Self::Smpte,
        }
    }
}

/// Start timecode of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timecode {
    /// Hours
    pub hours: u8,
    /// Minutes
    pub minutes: u8,
    /// Seconds
    pub seconds: u8,
    /// Frames within the second
    pub frames: u8,
    /// Nominal frame rate
    pub fps: u8,
    /// Drop-frame counting
    #[serde(default)]
    pub drop_frame: bool,
    /// Timecode flavour
    #[serde(default)]
    pub format: TimecodeFormat,
    /// Frame number the timecode applies to
    #[serde(default)]
    pub start_frame: u32,
}

impl Timecode {
    /// Wall-clock (UTC) timecode for a Unix timestamp in seconds
    #[must_use]
    pub fn from_unix_time(secs: u64, fps: u8) -> Self {
        let day_secs = secs % 86_400;
        Self {
            hours: (day_secs / 3600) as u8,
            minutes: (day_secs / 60 % 60) as u8,
            seconds: (day_secs % 60) as u8,
            frames: 0,
            fps,
            drop_frame: false,
            format: TimecodeFormat::Smpte,
            start_frame: 0,
        }
    }
}

/// Location and shape of the audio block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDescriptor {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u8,
    /// Bits per sample (always 16)
    pub bit_depth: u8,
    /// Absolute offset of the audio block
    pub offset: u64,
    /// Timestamp of the first sample (µs)
    pub start_time_us: u64,
}

/// On-disk file header (512 bytes)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub(crate) struct RawFileHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub bayer_pattern: u8,
    pub encoding: u8,
    pub compression: u8,
    pub reserved1: u8,
    pub black_level: [u16; 4],
    pub white_level: u16,
    pub reserved2: u16,
    pub frame_count: u32,
    pub index_offset: u64,

    // Version 2 fields
    pub native_width: u32,
    pub native_height: u32,
    pub binning_num: u32,
    pub binning_den: u32,

    pub has_audio: u8,
    pub audio_channels: u8,
    pub audio_bit_depth: u8,
    pub reserved3: u8,
    pub audio_sample_rate: u32,
    pub audio_offset: u64,
    pub audio_start_time_us: u64,

    pub has_timecode: u8,
    pub timecode_format: u8,
    pub timecode_fps: u8,
    pub timecode_drop_frame: u8,
    pub timecode_start_frame: u32,
    pub timecode_hours: u8,
    pub timecode_minutes: u8,
    pub timecode_seconds: u8,
    pub timecode_frames: u8,
    pub reserved_tc: [u8; 4],

    pub sensor_orientation: i32,
    pub reserved: [u8; 408],
}

static_assertions::const_assert_eq!(std::mem::size_of::<RawFileHeader>(), HEADER_SIZE);
static_assertions::const_assert_eq!(offset_of!(RawFileHeader, frame_count), 32);
static_assertions::const_assert_eq!(offset_of!(RawFileHeader, index_offset), 36);
static_assertions::const_assert_eq!(offset_of!(RawFileHeader, has_audio), 60);
static_assertions::const_assert_eq!(offset_of!(RawFileHeader, audio_start_time_us), 76);
static_assertions::const_assert_eq!(offset_of!(RawFileHeader, sensor_orientation), 100);

/// Byte range patched with frame count and index offset at finalize
const FINAL_COUNTS: std::ops::Range<usize> = 32..44;

/// Byte range patched with the audio descriptor at finalize
const FINAL_AUDIO: std::ops::Range<usize> = 60..84;

/// On-disk frame header (64 bytes)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub(crate) struct RawFrameHeader {
    pub timestamp_us: u64,
    pub frame_number: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub iso: f32,
    pub exposure_time_ms: f32,
    pub white_balance_r: f32,
    pub white_balance_g: f32,
    pub white_balance_b: f32,
    pub focal_length: f32,
    pub aperture: f32,
    pub focus_distance: f32,
    pub black_level: [u16; 4],
    pub reserved: [u8; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<RawFrameHeader>(), FRAME_HEADER_SIZE);

/// On-disk audio block header (64 bytes)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub(crate) struct RawAudioHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub sample_count: u64,
    pub start_timestamp_us: u64,
    pub reserved: [u8; 32],
}

static_assertions::const_assert_eq!(std::mem::size_of::<RawAudioHeader>(), AUDIO_HEADER_SIZE);

/// Stream-level metadata from the file header
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHeader {
    /// Format version (1 = legacy)
    pub version: u32,
    /// Effective frame width
    pub width: u32,
    /// Effective frame height
    pub height: u32,
    /// Full sensor width
    pub native_width: u32,
    /// Full sensor height
    pub native_height: u32,
    /// Color filter arrangement
    pub bayer_pattern: BayerPattern,
    /// Sample encoding
    pub encoding: PixelEncoding,
    /// Declared compression mode
    pub compression: Compression,
    /// Per-channel black level
    pub black_level: [u16; 4],
    /// Sensor saturation level
    pub white_level: u16,
    /// Binning ratio numerator
    pub binning_num: u32,
    /// Binning ratio denominator
    pub binning_den: u32,
    /// Sensor orientation in degrees
    pub sensor_orientation: i32,
    /// Start timecode
    pub timecode: Option<Timecode>,
    /// Audio block descriptor
    pub audio: Option<AudioDescriptor>,
    /// Frames declared in the header
    pub frame_count: u32,
    /// Absolute offset of the index table (0 if never finalized)
    pub index_offset: u64,
}

/// Fields written into the header once recording stops
#[derive(Debug, Clone, Copy)]
pub struct FinalFields {
    /// Frames recorded
    pub frame_count: u32,
    /// Absolute offset of the index table
    pub index_offset: u64,
    /// Audio block, if one was written
    pub audio: Option<AudioDescriptor>,
}

impl StreamHeader {
    /// Samples per frame
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes of an unpacked frame (16 bits per sample)
    #[must_use]
    pub fn full_frame_size(&self) -> u64 {
        self.pixel_count() as u64 * 2
    }

    /// Bit depth of stored samples
    ///
    /// # Errors
    ///
    /// Returns error for reserved encodings
    pub fn bit_depth(&self) -> Result<BitDepth> {
        self.encoding
            .bit_depth()
            .ok_or_else(|| VrawError::UnsupportedEncoding(format!("{:?}", self.encoding)))
    }

    /// Mean of the four channel black levels, used by the log curve
    ///
    /// Log encoding does not keep per-channel black levels; every channel is
    /// normalized against this single value.
    #[must_use]
    pub fn mean_black_level(&self) -> u16 {
        let sum: u32 = self.black_level.iter().map(|&b| u32::from(b)).sum();
        (sum / 4) as u16
    }

    /// Serialize to the fixed 512-byte layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut raw = RawFileHeader::zeroed();
        raw.magic = FILE_MAGIC;
        raw.version = self.version;
        raw.width = self.width;
        raw.height = self.height;
        raw.bayer_pattern = self.bayer_pattern as u8;
        raw.encoding = self.encoding as u8;
        raw.compression = self.compression as u8;
        raw.black_level = self.black_level;
        raw.white_level = self.white_level;
        raw.frame_count = self.frame_count;
        raw.index_offset = self.index_offset;

        raw.native_width = self.native_width;
        raw.native_height = self.native_height;
        raw.binning_num = self.binning_num;
        raw.binning_den = self.binning_den;

        if let Some(audio) = self.audio {
            raw.has_audio = 1;
            raw.audio_channels = audio.channels;
            raw.audio_bit_depth = audio.bit_depth;
            raw.audio_sample_rate = audio.sample_rate;
            raw.audio_offset = audio.offset;
            raw.audio_start_time_us = audio.start_time_us;
        }

        if let Some(tc) = self.timecode {
            raw.has_timecode = 1;
            raw.timecode_format = tc.format as u8;
            raw.timecode_fps = tc.fps;
            raw.timecode_drop_frame = u8::from(tc.drop_frame);
            raw.timecode_start_frame = tc.start_frame;
            raw.timecode_hours = tc.hours;
            raw.timecode_minutes = tc.minutes;
            raw.timecode_seconds = tc.seconds;
            raw.timecode_frames = tc.frames;
        }

        raw.sensor_orientation = self.sensor_orientation;

        let mut bytes = [0u8; HEADER_SIZE];
        bytes.copy_from_slice(bytes_of(&raw));
        bytes
    }

    /// Parse the fixed 512-byte layout
    ///
    /// Version 1 headers get defaults for every version 2 field.
    ///
    /// # Errors
    ///
    /// Returns error if the magic, version, dimensions or an enum field is
    /// invalid
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let raw: RawFileHeader = *from_bytes(bytes);

        let magic = raw.magic;
        if magic != FILE_MAGIC && magic != LEGACY_FILE_MAGIC {
            return Err(VrawError::InvalidFormat(format!(
                "Invalid magic bytes: expected {FILE_MAGIC:?} or {LEGACY_FILE_MAGIC:?}, got {magic:?}"
            )));
        }

        let version = raw.version;
        if version == 0 {
            return Err(VrawError::InvalidFormat(
                "Header version is zero".to_string(),
            ));
        }

        let (width, height) = (raw.width, raw.height);
        if width == 0 || height == 0 {
            return Err(VrawError::InvalidFormat(format!(
                "Invalid dimensions {width}x{height}"
            )));
        }

        let bayer_pattern = BayerPattern::from_u8(raw.bayer_pattern).ok_or_else(|| {
            VrawError::InvalidFormat(format!("Unknown bayer pattern {}", raw.bayer_pattern))
        })?;
        let encoding = PixelEncoding::from_u8(raw.encoding).ok_or_else(|| {
            VrawError::InvalidFormat(format!("Unknown pixel encoding {}", raw.encoding))
        })?;
        let compression = Compression::from_u8(raw.compression).ok_or_else(|| {
            VrawError::InvalidFormat(format!("Unknown compression mode {}", raw.compression))
        })?;

        let mut header = Self {
            version,
            width,
            height,
            native_width: width,
            native_height: height,
            bayer_pattern,
            encoding,
            compression,
            black_level: raw.black_level,
            white_level: raw.white_level,
            binning_num: 1,
            binning_den: 1,
            sensor_orientation: 0,
            timecode: None,
            audio: None,
            frame_count: raw.frame_count,
            index_offset: raw.index_offset,
        };

        if version >= FILE_VERSION {
            header.native_width = raw.native_width;
            header.native_height = raw.native_height;
            header.binning_num = raw.binning_num.max(1);
            header.binning_den = raw.binning_den.max(1);
            header.sensor_orientation = raw.sensor_orientation;

            if raw.has_audio != 0 {
                header.audio = Some(AudioDescriptor {
                    sample_rate: raw.audio_sample_rate,
                    channels: raw.audio_channels,
                    bit_depth: raw.audio_bit_depth,
                    offset: raw.audio_offset,
                    start_time_us: raw.audio_start_time_us,
                });
            }

            if raw.has_timecode != 0 {
                header.timecode = Some(Timecode {
                    hours: raw.timecode_hours,
                    minutes: raw.timecode_minutes,
                    seconds: raw.timecode_seconds,
                    frames: raw.timecode_frames,
                    fps: raw.timecode_fps,
                    drop_frame: raw.timecode_drop_frame != 0,
                    format: TimecodeFormat::from_u8(raw.timecode_format),
                    start_frame: raw.timecode_start_frame,
                });
            }
        }

        Ok(header)
    }

    /// Read and parse a header from the current position
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or the header is invalid
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut bytes = [0u8; HEADER_SIZE];
        r.read_exact(&mut bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                VrawError::InvalidFormat("File too small to contain header".to_string())
            } else {
                VrawError::Io(e)
            }
        })?;
        Self::from_bytes(&bytes)
    }

    /// Write the header as it stands at the start of a recording
    ///
    /// Frame count, index offset and audio descriptor are placeholders until
    /// [`StreamHeader::patch_final`] runs.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_provisional<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Record the final fields and rewrite them in place
    ///
    /// Only the frame count, index offset and audio descriptor bytes are
    /// touched. The sink is left positioned at its end.
    ///
    /// # Errors
    ///
    /// Returns error if a seek or write fails
    pub fn patch_final<W: Write + Seek>(&mut self, w: &mut W, fields: FinalFields) -> Result<()> {
        self.frame_count = fields.frame_count;
        self.index_offset = fields.index_offset;
        if fields.audio.is_some() {
            self.audio = fields.audio;
        }

        let bytes = self.to_bytes();

        w.seek(SeekFrom::Start(FINAL_COUNTS.start as u64))?;
        w.write_all(&bytes[FINAL_COUNTS])?;

        if fields.audio.is_some() {
            w.seek(SeekFrom::Start(FINAL_AUDIO.start as u64))?;
            w.write_all(&bytes[FINAL_AUDIO])?;
        }

        w.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

/// Per-frame header preceding each payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Capture timestamp (µs)
    pub timestamp_us: u64,
    /// Zero-based sequence number assigned by the writer
    pub frame_number: u32,
    /// Stored payload size if compressed, else 0
    pub compressed_size: u32,
    /// Payload size before compression (packed size when packed)
    pub uncompressed_size: u32,
    /// Sensor sensitivity
    pub iso: f32,
    /// Exposure time (ms)
    pub exposure_time_ms: f32,
    /// White balance multipliers (R, G, B)
    pub white_balance: [f32; 3],
    /// Focal length (mm)
    pub focal_length: f32,
    /// Aperture (f-number)
    pub aperture: f32,
    /// Focus distance
    pub focus_distance: f32,
    /// Per-frame black level
    pub black_level: [u16; 4],
}

impl FrameHeader {
    /// Bytes of payload following the header
    #[must_use]
    pub fn payload_size(&self) -> u64 {
        if self.compressed_size > 0 {
            u64::from(self.compressed_size)
        } else {
            u64::from(self.uncompressed_size)
        }
    }

    /// Serialize to the fixed 64-byte layout
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let raw = RawFrameHeader {
            timestamp_us: self.timestamp_us,
            frame_number: self.frame_number,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            iso: self.iso,
            exposure_time_ms: self.exposure_time_ms,
            white_balance_r: self.white_balance[0],
            white_balance_g: self.white_balance[1],
            white_balance_b: self.white_balance[2],
            focal_length: self.focal_length,
            aperture: self.aperture,
            focus_distance: self.focus_distance,
            black_level: self.black_level,
            reserved: [0; 4],
        };

        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        bytes.copy_from_slice(bytes_of(&raw));
        bytes
    }

    /// Parse the fixed 64-byte layout
    #[must_use]
    pub fn from_bytes(bytes: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let raw: RawFrameHeader = *from_bytes(bytes);
        Self {
            timestamp_us: raw.timestamp_us,
            frame_number: raw.frame_number,
            compressed_size: raw.compressed_size,
            uncompressed_size: raw.uncompressed_size,
            iso: raw.iso,
            exposure_time_ms: raw.exposure_time_ms,
            white_balance: [raw.white_balance_r, raw.white_balance_g, raw.white_balance_b],
            focal_length: raw.focal_length,
            aperture: raw.aperture,
            focus_distance: raw.focus_distance,
            black_level: raw.black_level,
        }
    }

    /// Read a frame header from the current position
    ///
    /// # Errors
    ///
    /// Returns error if fewer than 64 bytes can be read
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        r.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Write the frame header at the current position
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        Ok(())
    }
}
