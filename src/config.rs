//! Configuration types for VRAW writers

use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::storage::{BayerPattern, PixelEncoding, Timecode};
use crate::{Result, VrawError};

/// Stream configuration fixed when a writer is initialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Effective frame width
    pub width: u32,
    /// Effective frame height
    pub height: u32,
    /// Full sensor width (defaults to `width`)
    #[serde(default)]
    pub native_width: Option<u32>,
    /// Full sensor height (defaults to `height`)
    #[serde(default)]
    pub native_height: Option<u32>,
    /// Sample encoding
    #[serde(default)]
    pub encoding: PixelEncoding,
    /// Bit-pack samples at the encoding's depth
    #[serde(default)]
    pub packed: bool,
    /// Payload compression
    #[serde(default)]
    pub compression: Compression,
    /// Color filter arrangement
    #[serde(default)]
    pub bayer_pattern: BayerPattern,
    /// Per-channel black level
    #[serde(default = "default_black_level")]
    pub black_level: [u16; 4],
    /// Sensor saturation level
    #[serde(default = "default_white_level")]
    pub white_level: u16,
    /// Sensor orientation in degrees
    #[serde(default)]
    pub sensor_orientation: i32,
    /// Start timecode
    #[serde(default)]
    pub timecode: Option<Timecode>,
    /// Audio capture
    #[serde(default)]
    pub audio: Option<AudioConfig>,
}

/// Audio capture configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u8,
}

fn default_black_level() -> [u16; 4] {
    [64; 4]
}

fn default_white_level() -> u16 {
    4095
}

impl WriterConfig {
    /// Configuration with camera defaults for the given resolution
    ///
    /// Linear 12-bit, unpacked, LZ4 fast, RGGB, black 64, white 4095.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            native_width: None,
            native_height: None,
            encoding: PixelEncoding::default(),
            packed: false,
            compression: Compression::default(),
            bayer_pattern: BayerPattern::default(),
            black_level: default_black_level(),
            white_level: default_white_level(),
            sensor_orientation: 0,
            timecode: None,
            audio: None,
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or fails validation
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VrawError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| VrawError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Full sensor resolution, falling back to the effective resolution
    #[must_use]
    pub fn native_resolution(&self) -> (u32, u32) {
        (
            self.native_width.unwrap_or(self.width),
            self.native_height.unwrap_or(self.height),
        )
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VrawError::ConfigError(format!(
                "Invalid resolution {}x{}",
                self.width, self.height
            )));
        }

        // Unpacked frames record their size in a u32
        let frame_bytes = u64::from(self.width) * u64::from(self.height) * 2;
        if frame_bytes > u64::from(u32::MAX) {
            return Err(VrawError::ConfigError(format!(
                "Frame of {}x{} exceeds the 4 GiB frame limit",
                self.width, self.height
            )));
        }

        let (native_width, native_height) = self.native_resolution();
        if native_width == 0 || native_height == 0 {
            return Err(VrawError::ConfigError(format!(
                "Invalid native resolution {native_width}x{native_height}"
            )));
        }

        let Some(depth) = self.encoding.bit_depth() else {
            return Err(VrawError::ConfigError(format!(
                "Encoding {:?} is reserved and cannot be written",
                self.encoding
            )));
        };

        if !self.compression.is_writable() {
            return Err(VrawError::ConfigError(format!(
                "Compression tier {:?} is reserved",
                self.compression
            )));
        }

        if let Some((channel, &black)) = self
            .black_level
            .iter()
            .enumerate()
            .find(|&(_, &black)| black >= self.white_level)
        {
            return Err(VrawError::ConfigError(format!(
                "Black level {black} on channel {channel} is not below white level {}",
                self.white_level
            )));
        }

        // Log encodings take full-range sensor input; linear samples are
        // stored as-is and must fit the depth
        if !self.encoding.is_log() && self.white_level > depth.max_value() {
            return Err(VrawError::ConfigError(format!(
                "White level {} exceeds {}-bit range of {:?}",
                self.white_level,
                depth.bits(),
                self.encoding
            )));
        }

        if !matches!(self.sensor_orientation, 0 | 90 | 180 | 270) {
            return Err(VrawError::ConfigError(format!(
                "Sensor orientation must be 0, 90, 180 or 270, got {}",
                self.sensor_orientation
            )));
        }

        if let Some(audio) = self.audio {
            if audio.channels == 0 {
                return Err(VrawError::ConfigError(
                    "Audio channel count cannot be 0".to_string(),
                ));
            }
            if audio.sample_rate == 0 {
                return Err(VrawError::ConfigError(
                    "Audio sample rate cannot be 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}
