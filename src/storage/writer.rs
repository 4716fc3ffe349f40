//! VRAW stream writer
//!
//! A writer moves through `Uninitialized → Initialized → Recording →
//! Finalized`. The stream header is written provisionally at init, frames
//! are appended while recording, and `stop` appends the audio block and
//! frame index before patching the header in place.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use bytemuck::cast_slice;
use tracing::{debug, error, info, warn};

use super::audio::AudioBlock;
use super::format::{
    AudioDescriptor, FinalFields, FrameHeader, StreamHeader, AUDIO_BIT_DEPTH, FILE_VERSION,
    FRAME_HEADER_SIZE, HEADER_SIZE,
};
use super::index::FrameIndex;
use crate::compression::{ByteCompressor, Lz4Block};
use crate::config::WriterConfig;
use crate::packing::{pack, BitDepth};
use crate::transform::LogCurve;
use crate::{Result, VrawError};

/// Lifecycle state of a writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No sink attached
    Uninitialized,
    /// Header written, not yet accepting frames
    Initialized,
    /// Accepting frames and audio
    Recording,
    /// Index and header finalized
    Finalized,
}

/// Camera metadata attached to a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetadata {
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
    /// Per-frame black level, `None` to use the stream levels
    pub black_level: Option<[u16; 4]>,
}

impl Default for FrameMetadata {
    fn default() -> Self {
        Self {
            iso: 100.0,
            exposure_time_ms: 16.67,
            white_balance: [1.0; 3],
            focal_length: 0.0,
            aperture: 0.0,
            focus_distance: 0.0,
            black_level: None,
        }
    }
}

/// Statistics from a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingStats {
    /// Frames written
    pub frame_count: u32,
    /// Total file size
    pub total_bytes: u64,
    /// Frames stored with a compressed payload
    pub compressed_frames: u32,
    /// Audio samples per channel
    pub audio_samples: u64,
}

impl fmt::Display for RecordingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frames: {} ({} compressed), Size: {:.2} MB, Audio samples: {}",
            self.frame_count,
            self.compressed_frames,
            self.total_bytes as f64 / (1024.0 * 1024.0),
            self.audio_samples
        )
    }
}

/// Header, sink and index of an initialized stream
struct Session<W> {
    sink: W,
    header: StreamHeader,
    depth: BitDepth,
    packed: bool,
    curve: Option<LogCurve>,
    index: FrameIndex,
    position: u64,
    compressed_frames: u32,
}

/// Audio accumulated until finalize
struct AudioCapture {
    sample_rate: u32,
    channels: u8,
    samples: Vec<i16>,
    sample_count: u64,
    start_timestamp_us: Option<u64>,
}

/// Payload ready to be written
struct StagedFrame<'a> {
    payload: &'a [u8],
    uncompressed_size: u32,
    compressed_size: u32,
}

/// Staging buffers reused across frames
///
/// Buffers only grow, so a session allocates once per resolution.
#[derive(Default)]
struct Scratch {
    encoded: Vec<u16>,
    packed: Vec<u8>,
    compressed: Vec<u8>,
}

fn grow<T: Clone + Default>(buf: &mut Vec<T>, len: usize) {
    if buf.len() < len {
        buf.resize(len, T::default());
    }
}

impl Scratch {
    /// Run the encode → pack → compress pipeline over one frame
    fn stage<'a>(
        &'a mut self,
        samples: &'a [u16],
        curve: Option<&LogCurve>,
        packing: Option<BitDepth>,
        codec: Option<&dyn ByteCompressor>,
    ) -> StagedFrame<'a> {
        let n = samples.len();

        let source: &[u16] = match curve {
            Some(curve) => {
                grow(&mut self.encoded, n);
                curve.encode(samples, &mut self.encoded[..n]);
                &self.encoded[..n]
            }
            None => samples,
        };

        // A lone sample packs to two bytes, indistinguishable from raw
        let raw: &[u8] = match packing.filter(|d| d.packed_len(n) < n * 2) {
            Some(depth) => {
                let len = depth.packed_len(n);
                grow(&mut self.packed, len);
                pack(depth, source, &mut self.packed[..len]);
                &self.packed[..len]
            }
            None => cast_slice(source),
        };
        let uncompressed_size = raw.len() as u32;

        if let Some(codec) = codec {
            let bound = codec.max_compressed_len(raw.len());
            grow(&mut self.compressed, bound);
            match codec.compress(raw, &mut self.compressed[..bound]) {
                Ok(len) if len < raw.len() => {
                    return StagedFrame {
                        payload: &self.compressed[..len],
                        uncompressed_size,
                        compressed_size: len as u32,
                    };
                }
                Ok(len) => debug!("Compressed {len} >= raw {}, storing raw", raw.len()),
                Err(e) => warn!("Compression failed, storing raw: {e}"),
            }
        }

        StagedFrame {
            payload: raw,
            uncompressed_size,
            compressed_size: 0,
        }
    }
}

/// Writer for VRAW streams
///
/// Dropping a writer that is still recording finalizes the stream.
pub struct VrawWriter<W: Write + Seek = BufWriter<File>> {
    state: WriterState,
    session: Option<Session<W>>,
    audio: Option<AudioCapture>,
    scratch: Scratch,
    codec: Lz4Block,
}

impl VrawWriter<BufWriter<File>> {
    /// Create a file at `path` and initialize a stream in it
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or the config is invalid
    pub fn create<P: AsRef<Path>>(path: P, config: &WriterConfig) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        let mut writer = Self::new();
        writer.init(BufWriter::new(file), config)?;
        Ok(writer)
    }
}

impl<W: Write + Seek> Default for VrawWriter<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Seek> VrawWriter<W> {
    /// Writer with no sink attached
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: WriterState::Uninitialized,
            session: None,
            audio: None,
            scratch: Scratch::default(),
            codec: Lz4Block,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Whether frames are being accepted
    pub fn is_recording(&self) -> bool {
        self.state == WriterState::Recording
    }

    /// Header of the stream being written
    pub fn header(&self) -> Option<&StreamHeader> {
        self.session.as_ref().map(|s| &s.header)
    }

    /// Frames accepted so far
    pub fn frame_count(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.index.len() as u32)
    }

    /// Bytes written to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.position)
    }

    /// Audio samples per channel accepted so far
    pub fn audio_sample_count(&self) -> u64 {
        self.audio.as_ref().map_or(0, |a| a.sample_count)
    }

    fn require(&self, expected: WriterState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(VrawError::InvalidState(format!(
                "{operation} requires {expected:?}, writer is {:?}",
                self.state
            )))
        }
    }

    /// Attach a sink and write the provisional stream header
    ///
    /// Audio from `config.audio` replaces any earlier [`enable_audio`]
    /// call.
    ///
    /// [`enable_audio`]: VrawWriter::enable_audio
    ///
    /// # Errors
    ///
    /// Returns error if the writer was already initialized, the config is
    /// invalid, or the header cannot be written
    pub fn init(&mut self, mut sink: W, config: &WriterConfig) -> Result<()> {
        self.require(WriterState::Uninitialized, "init")?;
        config.validate()?;

        let header = stream_header(config);
        let depth = header.bit_depth()?;
        let curve = header
            .encoding
            .is_log()
            .then(|| LogCurve::new(header.mean_black_level(), header.white_level, depth));

        sink.rewind()?;
        header.write_provisional(&mut sink)?;

        if let Some(audio) = config.audio {
            self.audio = Some(AudioCapture::new(audio.sample_rate, audio.channels));
        }

        info!(
            "Initialized VRAW stream: {}x{} (native {}x{}), {:?}, packed={}, {:?}",
            header.width,
            header.height,
            header.native_width,
            header.native_height,
            header.encoding,
            config.packed,
            header.compression
        );

        self.session = Some(Session {
            sink,
            header,
            depth,
            packed: config.packed,
            curve,
            index: FrameIndex::new(),
            position: HEADER_SIZE as u64,
            compressed_frames: 0,
        });
        self.state = WriterState::Initialized;
        Ok(())
    }

    /// Enable audio capture
    ///
    /// # Errors
    ///
    /// Returns error if recording has started or the parameters are zero
    pub fn enable_audio(&mut self, sample_rate: u32, channels: u8) -> Result<()> {
        if !matches!(
            self.state,
            WriterState::Uninitialized | WriterState::Initialized
        ) {
            return Err(VrawError::InvalidState(format!(
                "enable_audio requires a writer that has not started, writer is {:?}",
                self.state
            )));
        }
        if sample_rate == 0 || channels == 0 {
            return Err(VrawError::InvalidAudio(format!(
                "{sample_rate} Hz x {channels} channels"
            )));
        }

        self.audio = Some(AudioCapture::new(sample_rate, channels));
        Ok(())
    }

    /// Begin accepting frames
    ///
    /// # Errors
    ///
    /// Returns error unless the writer is initialized
    pub fn start(&mut self) -> Result<()> {
        self.require(WriterState::Initialized, "start")?;
        self.state = WriterState::Recording;
        info!("Recording started");
        Ok(())
    }

    /// Encode and append a frame, returning its frame number
    ///
    /// # Errors
    ///
    /// Returns error if the writer is not recording, `samples` does not
    /// match the stream resolution, a linear sample exceeds the packed bit
    /// depth, or the write fails. A failed write leaves no frame behind; if
    /// the sink cannot be rewound the writer is finalized without an index.
    pub fn submit_frame(
        &mut self,
        samples: &[u16],
        timestamp_us: u64,
        metadata: &FrameMetadata,
    ) -> Result<u32> {
        self.require(WriterState::Recording, "submit_frame")?;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| VrawError::InvalidState("no sink attached".to_string()))?;

        let expected = session.header.pixel_count();
        if samples.len() != expected {
            return Err(VrawError::FrameSizeMismatch {
                expected,
                actual: samples.len(),
            });
        }

        // Linear samples are packed as-is, log codes are always in range
        if session.packed && session.curve.is_none() {
            let max = session.depth.max_value();
            if let Some((position, &value)) = samples.iter().enumerate().find(|&(_, &v)| v > max)
            {
                return Err(VrawError::SampleOutOfRange {
                    position,
                    value,
                    bits: session.depth.bits(),
                });
            }
        }

        let frame_number = u32::try_from(session.index.len())
            .map_err(|_| VrawError::InvalidState("frame count limit reached".to_string()))?;

        let staged = self.scratch.stage(
            samples,
            session.curve.as_ref(),
            session.packed.then_some(session.depth),
            session
                .header
                .compression
                .is_enabled()
                .then_some(&self.codec as &dyn ByteCompressor),
        );

        let frame = FrameHeader {
            timestamp_us,
            frame_number,
            compressed_size: staged.compressed_size,
            uncompressed_size: staged.uncompressed_size,
            iso: metadata.iso,
            exposure_time_ms: metadata.exposure_time_ms,
            white_balance: metadata.white_balance,
            focal_length: metadata.focal_length,
            aperture: metadata.aperture,
            focus_distance: metadata.focus_distance,
            black_level: metadata.black_level.unwrap_or(session.header.black_level),
        };

        let offset = session.position;
        let written = frame
            .write_to(&mut session.sink)
            .and_then(|()| Ok(session.sink.write_all(staged.payload)?));
        if let Err(e) = written {
            // Drop the partial frame so the next one lands at `offset`
            if let Err(seek) = session.sink.seek(SeekFrom::Start(offset)) {
                error!("Cannot rewind to frame {frame_number} at {offset}: {seek}");
                self.state = WriterState::Finalized;
            } else {
                warn!("Frame {frame_number} discarded: {e}");
            }
            return Err(e);
        }

        session.position += (FRAME_HEADER_SIZE + staged.payload.len()) as u64;
        session.index.push(offset);
        if staged.compressed_size > 0 {
            session.compressed_frames += 1;
        }

        Ok(frame_number)
    }

    /// Append interleaved audio samples
    ///
    /// The timestamp of the first submission becomes the audio start time.
    ///
    /// # Errors
    ///
    /// Returns error if the writer is not recording, audio is not enabled,
    /// `samples_per_channel` is zero, or `samples` does not hold
    /// `samples_per_channel` frames
    pub fn submit_audio(
        &mut self,
        samples: &[i16],
        samples_per_channel: usize,
        timestamp_us: u64,
    ) -> Result<()> {
        self.require(WriterState::Recording, "submit_audio")?;
        let audio = self
            .audio
            .as_mut()
            .ok_or_else(|| VrawError::InvalidState("audio is not enabled".to_string()))?;

        if samples_per_channel == 0 {
            return Err(VrawError::InvalidAudio("empty audio submission".to_string()));
        }
        let expected = samples_per_channel * usize::from(audio.channels);
        if samples.len() != expected {
            return Err(VrawError::InvalidAudio(format!(
                "expected {expected} interleaved samples, got {}",
                samples.len()
            )));
        }

        audio.start_timestamp_us.get_or_insert(timestamp_us);
        audio.samples.extend_from_slice(samples);
        audio.sample_count += samples_per_channel as u64;
        Ok(())
    }

    /// Flush buffered bytes to the sink
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails
    pub fn flush(&mut self) -> Result<()> {
        if let Some(session) = self.session.as_mut() {
            session.sink.flush()?;
        }
        Ok(())
    }

    /// Finalize the stream
    ///
    /// Appends the audio block and frame index, then patches frame count,
    /// index offset and audio descriptor into the header. The writer is
    /// finalized even if a write fails.
    ///
    /// # Errors
    ///
    /// Returns error if the writer is not recording or a write fails
    pub fn stop(&mut self) -> Result<RecordingStats> {
        self.require(WriterState::Recording, "stop")?;
        self.state = WriterState::Finalized;

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| VrawError::InvalidState("no sink attached".to_string()))?;

        let mut descriptor = None;
        let mut audio_samples = 0;
        if let Some(audio) = self.audio.as_mut().filter(|a| a.sample_count > 0) {
            let block = AudioBlock::new(
                audio.sample_rate,
                u16::from(audio.channels),
                audio.start_timestamp_us.unwrap_or(0),
                std::mem::take(&mut audio.samples),
            )?;

            let offset = session.position;
            block.write_to(&mut session.sink)?;
            session.position += block.encoded_len();
            audio_samples = block.header.sample_count;

            descriptor = Some(AudioDescriptor {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                bit_depth: AUDIO_BIT_DEPTH,
                offset,
                start_time_us: block.header.start_timestamp_us,
            });
            debug!("Audio block at {offset}: {audio_samples} samples per channel");
        }

        let index_offset = session.position;
        session.position += session.index.write_to(&mut session.sink)?;

        let frame_count = session.index.len() as u32;
        session.header.patch_final(
            &mut session.sink,
            FinalFields {
                frame_count,
                index_offset,
                audio: descriptor,
            },
        )?;
        session.sink.flush()?;

        let stats = RecordingStats {
            frame_count,
            total_bytes: session.position,
            compressed_frames: session.compressed_frames,
            audio_samples,
        };
        info!("Recording finalized: {}", stats);
        Ok(stats)
    }

    /// Detach the sink
    ///
    /// A stream still recording is not finalized.
    pub fn into_inner(mut self) -> Option<W> {
        self.session.take().map(|s| s.sink)
    }
}

impl<W: Write + Seek> Drop for VrawWriter<W> {
    fn drop(&mut self) {
        if self.state == WriterState::Recording && self.session.is_some() {
            if let Err(e) = self.stop() {
                error!("Failed to finalize VRAW stream on drop: {e}");
            }
        }
    }
}

impl AudioCapture {
    fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            sample_rate,
            channels,
            samples: Vec::new(),
            sample_count: 0,
            start_timestamp_us: None,
        }
    }
}

/// Build the provisional header for `config`
///
/// Binning is derived when the sensor is larger than the frame in both axes.
fn stream_header(config: &WriterConfig) -> StreamHeader {
    let (native_width, native_height) = config.native_resolution();
    let (binning_num, binning_den) =
        if native_width > config.width && native_height > config.height {
            (1, native_width / config.width)
        } else {
            (1, 1)
        };

    StreamHeader {
        version: FILE_VERSION,
        width: config.width,
        height: config.height,
        native_width,
        native_height,
        bayer_pattern: config.bayer_pattern,
        encoding: config.encoding,
        compression: config.compression,
        black_level: config.black_level,
        white_level: config.white_level,
        binning_num,
        binning_den,
        sensor_orientation: config.sensor_orientation,
        timecode: config.timecode,
        audio: None,
        frame_count: 0,
        index_offset: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compression;
    use crate::storage::format::{PixelEncoding, INDEX_MAGIC};
    use crate::storage::{IndexSource, VrawReader};
    use std::io::{self, Cursor};

    type MemWriter = VrawWriter<Cursor<Vec<u8>>>;

    /// In-memory sink that fails the first write at or past `fail_at`
    struct FailingSink {
        inner: Cursor<Vec<u8>>,
        fail_at: Option<u64>,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self
                .fail_at
                .is_some_and(|at| self.inner.position() >= at)
            {
                self.fail_at = None;
                return Err(io::Error::other("disk full"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for FailingSink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    fn recording(config: &WriterConfig) -> MemWriter {
        let mut writer = MemWriter::new();
        writer.init(Cursor::new(Vec::new()), config).unwrap();
        writer.start().unwrap();
        writer
    }

    fn noise(len: usize, max: u16) -> Vec<u16> {
        let mut state = 0x2545_F491_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state % (u32::from(max) + 1)) as u16
            })
            .collect()
    }

    fn parse_header(bytes: &[u8]) -> StreamHeader {
        let mut fixed = [0u8; HEADER_SIZE];
        fixed.copy_from_slice(&bytes[..HEADER_SIZE]);
        StreamHeader::from_bytes(&fixed).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let config = WriterConfig::new(4, 2);
        let frame = [100u16; 8];
        let mut writer = MemWriter::new();
        assert_eq!(writer.state(), WriterState::Uninitialized);

        assert!(matches!(writer.start(), Err(VrawError::InvalidState(_))));
        assert!(writer.stop().is_err());
        assert_eq!(writer.state(), WriterState::Uninitialized);

        writer.init(Cursor::new(Vec::new()), &config).unwrap();
        assert!(writer.init(Cursor::new(Vec::new()), &config).is_err());
        assert!(writer
            .submit_frame(&frame, 0, &FrameMetadata::default())
            .is_err());
        assert_eq!(writer.state(), WriterState::Initialized);

        writer.start().unwrap();
        assert!(writer.is_recording());
        assert!(writer.start().is_err());
        assert!(writer.enable_audio(48_000, 2).is_err());
        writer
            .submit_frame(&frame, 0, &FrameMetadata::default())
            .unwrap();

        writer.stop().unwrap();
        assert_eq!(writer.state(), WriterState::Finalized);
        assert!(writer.stop().is_err());
        assert!(writer.start().is_err());
        assert!(writer
            .submit_frame(&frame, 1, &FrameMetadata::default())
            .is_err());
    }

    #[test]
    fn test_invalid_config_leaves_writer_uninitialized() {
        let mut writer = MemWriter::new();
        let config = WriterConfig::new(0, 2);
        assert!(writer.init(Cursor::new(Vec::new()), &config).is_err());
        assert_eq!(writer.state(), WriterState::Uninitialized);
    }

    #[test]
    fn test_frame_size_mismatch() {
        let mut writer = recording(&WriterConfig::new(4, 2));
        let result = writer.submit_frame(&[0; 7], 0, &FrameMetadata::default());
        assert!(matches!(
            result,
            Err(VrawError::FrameSizeMismatch {
                expected: 8,
                actual: 7
            })
        ));
        assert_eq!(writer.frame_count(), 0);
        assert_eq!(writer.bytes_written(), HEADER_SIZE as u64);
    }

    #[test]
    fn test_sample_out_of_range_when_packed() {
        let mut config = WriterConfig::new(4, 2);
        config.encoding = PixelEncoding::Linear10;
        config.white_level = 1023;
        config.packed = true;
        let mut writer = recording(&config);

        let mut frame = [512u16; 8];
        frame[5] = 1024;
        assert!(matches!(
            writer.submit_frame(&frame, 0, &FrameMetadata::default()),
            Err(VrawError::SampleOutOfRange {
                position: 5,
                value: 1024,
                bits: 10
            })
        ));
        assert_eq!(writer.frame_count(), 0);
    }

    #[test]
    fn test_frame_layout() {
        let mut config = WriterConfig::new(64, 48);
        config.packed = true;
        config.compression = Compression::None;
        let mut writer = recording(&config);

        let metadata = FrameMetadata {
            iso: 800.0,
            black_level: Some([60, 61, 62, 63]),
            ..FrameMetadata::default()
        };
        for n in 0..3u32 {
            let number = writer
                .submit_frame(&[1000; 64 * 48], u64::from(n) * 33_333, &metadata)
                .unwrap();
            assert_eq!(number, n);
        }
        let stats = writer.stop().unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();

        let frame_size = FRAME_HEADER_SIZE + 64 * 48 * 3 / 2;
        let index_offset = HEADER_SIZE + 3 * frame_size;
        assert_eq!(stats.frame_count, 3);
        assert_eq!(stats.compressed_frames, 0);
        assert_eq!(stats.total_bytes as usize, index_offset + 3 * 8 + 16);
        assert_eq!(bytes.len() as u64, stats.total_bytes);

        let header = parse_header(&bytes);
        assert_eq!(header.frame_count, 3);
        assert_eq!(header.index_offset as usize, index_offset);
        assert_eq!(&bytes[index_offset + 24..index_offset + 28], &INDEX_MAGIC);

        let mut raw = [0u8; FRAME_HEADER_SIZE];
        raw.copy_from_slice(&bytes[HEADER_SIZE + frame_size..][..FRAME_HEADER_SIZE]);
        let second = FrameHeader::from_bytes(&raw);
        assert_eq!(second.frame_number, 1);
        assert_eq!(second.timestamp_us, 33_333);
        assert_eq!(second.compressed_size, 0);
        assert_eq!(second.uncompressed_size as usize, 64 * 48 * 3 / 2);
        assert_eq!(second.iso, 800.0);
        assert_eq!(second.black_level, [60, 61, 62, 63]);
    }

    #[test]
    fn test_compression_kept_only_when_smaller() {
        let mut writer = recording(&WriterConfig::new(64, 48));
        let flat = vec![1000u16; 64 * 48];
        let mut config = WriterConfig::new(64, 48);
        config.packed = true;

        writer
            .submit_frame(&flat, 0, &FrameMetadata::default())
            .unwrap();
        let stats = writer.stop().unwrap();
        assert_eq!(stats.compressed_frames, 1);

        let mut writer = recording(&config);
        writer
            .submit_frame(&noise(64 * 48, 4095), 0, &FrameMetadata::default())
            .unwrap();
        let stats = writer.stop().unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();

        assert_eq!(stats.compressed_frames, 0);
        let mut raw = [0u8; FRAME_HEADER_SIZE];
        raw.copy_from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + FRAME_HEADER_SIZE]);
        let frame = FrameHeader::from_bytes(&raw);
        assert_eq!(frame.compressed_size, 0);
        assert_eq!(frame.uncompressed_size as usize, 64 * 48 * 3 / 2);
    }

    #[test]
    fn test_binning_derived() {
        let mut config = WriterConfig::new(960, 540);
        config.native_width = Some(3840);
        config.native_height = Some(2160);
        let writer = {
            let mut w = MemWriter::new();
            w.init(Cursor::new(Vec::new()), &config).unwrap();
            w
        };
        let header = writer.header().unwrap();
        assert_eq!((header.binning_num, header.binning_den), (1, 4));

        // Cropped in one axis only: no binning
        config.native_height = Some(540);
        let mut writer = MemWriter::new();
        writer.init(Cursor::new(Vec::new()), &config).unwrap();
        let header = writer.header().unwrap();
        assert_eq!((header.binning_num, header.binning_den), (1, 1));
    }

    #[test]
    fn test_audio_capture() {
        let mut writer = MemWriter::new();
        writer.enable_audio(48_000, 2).unwrap();
        let mut config = WriterConfig::new(4, 2);
        config.compression = Compression::None;
        writer.init(Cursor::new(Vec::new()), &config).unwrap();
        writer.start().unwrap();

        assert!(matches!(
            writer.submit_audio(&[0; 5], 3, 0),
            Err(VrawError::InvalidAudio(_))
        ));
        writer.submit_audio(&[1, -1, 2, -2], 2, 5_000).unwrap();
        writer.submit_audio(&[3, -3], 1, 9_000).unwrap();
        assert_eq!(writer.audio_sample_count(), 3);

        writer
            .submit_frame(&[100; 8], 0, &FrameMetadata::default())
            .unwrap();
        let stats = writer.stop().unwrap();
        assert_eq!(stats.audio_samples, 3);

        let bytes = writer.into_inner().unwrap().into_inner();
        let header = parse_header(&bytes);
        let audio = header.audio.unwrap();
        assert_eq!(audio.sample_rate, 48_000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.start_time_us, 5_000);

        let offset = audio.offset as usize;
        assert_eq!(offset, HEADER_SIZE + FRAME_HEADER_SIZE + 16);
        assert_eq!(&bytes[offset..offset + 4], b"MAUD");
        assert_eq!(header.index_offset as usize, offset + 64 + 12);
    }

    #[test]
    fn test_audio_requires_enable() {
        let mut writer = recording(&WriterConfig::new(4, 2));
        assert!(matches!(
            writer.submit_audio(&[0; 2], 1, 0),
            Err(VrawError::InvalidState(_))
        ));
    }

    #[test]
    fn test_scratch_buffers_grow_only() {
        let mut scratch = Scratch::default();
        let curve = LogCurve::new(64, 4095, BitDepth::Twelve);

        scratch.stage(&[500; 100], Some(&curve), Some(BitDepth::Twelve), None);
        assert_eq!(scratch.encoded.len(), 100);
        assert_eq!(scratch.packed.len(), 150);

        let staged = scratch.stage(&[500; 10], Some(&curve), Some(BitDepth::Twelve), None);
        assert_eq!(staged.payload.len(), 15);
        assert_eq!(scratch.encoded.len(), 100);
        assert_eq!(scratch.packed.len(), 150);
    }

    #[test]
    fn test_single_sample_frame_stored_unpacked() {
        for encoding in [PixelEncoding::Linear10, PixelEncoding::Linear12] {
            let mut config = WriterConfig::new(1, 1);
            config.encoding = encoding;
            config.white_level = 1023;
            config.packed = true;
            config.compression = Compression::None;

            let mut writer = recording(&config);
            writer
                .submit_frame(&[1000], 0, &FrameMetadata::default())
                .unwrap();
            writer.stop().unwrap();
            let bytes = writer.into_inner().unwrap().into_inner();

            let mut reader = VrawReader::from_source(Cursor::new(bytes)).unwrap();
            let frame = reader.read_frame(0).unwrap();
            assert_eq!(frame.header.uncompressed_size, 2, "{encoding:?}");
            assert_eq!(frame.samples, vec![1000], "{encoding:?}");
            assert!(!reader.is_packed());
        }
    }

    #[test]
    fn test_failed_write_discards_frame() {
        let mut config = WriterConfig::new(4, 2);
        config.compression = Compression::None;
        let sink = FailingSink {
            inner: Cursor::new(Vec::new()),
            fail_at: Some((HEADER_SIZE + FRAME_HEADER_SIZE) as u64),
        };

        let mut writer = VrawWriter::new();
        writer.init(sink, &config).unwrap();
        writer.start().unwrap();

        // Header lands, payload write fails
        assert!(matches!(
            writer.submit_frame(&[100; 8], 0, &FrameMetadata::default()),
            Err(VrawError::Io(_))
        ));
        assert!(writer.is_recording());
        assert_eq!(writer.frame_count(), 0);
        assert_eq!(writer.bytes_written(), HEADER_SIZE as u64);

        let number = writer
            .submit_frame(&[200; 8], 33_333, &FrameMetadata::default())
            .unwrap();
        assert_eq!(number, 0);
        let stats = writer.stop().unwrap();
        assert_eq!(stats.frame_count, 1);

        let bytes = writer.into_inner().unwrap().inner.into_inner();
        let mut reader = VrawReader::from_source(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.index_source(), IndexSource::Table);
        assert_eq!(reader.frame_count(), 1);

        let frame = reader.read_frame(0).unwrap();
        assert_eq!(frame.header.frame_number, 0);
        assert_eq!(frame.header.timestamp_us, 33_333);
        assert_eq!(frame.samples, vec![200; 8]);
    }

    #[test]
    fn test_empty_audio_rejected() {
        let mut config = WriterConfig::new(4, 2);
        config.compression = Compression::None;
        let mut writer = MemWriter::new();
        writer.enable_audio(48_000, 1).unwrap();
        writer.init(Cursor::new(Vec::new()), &config).unwrap();
        writer.start().unwrap();

        assert!(matches!(
            writer.submit_audio(&[], 0, 1_000),
            Err(VrawError::InvalidAudio(_))
        ));
        writer.submit_audio(&[7, 8], 2, 5_000).unwrap();
        writer
            .submit_frame(&[100; 8], 0, &FrameMetadata::default())
            .unwrap();
        writer.stop().unwrap();

        let bytes = writer.into_inner().unwrap().into_inner();
        let audio = parse_header(&bytes).audio.unwrap();
        assert_eq!(audio.start_time_us, 5_000);
    }

    #[test]
    fn test_stats_display() {
        let stats = RecordingStats {
            frame_count: 3,
            total_bytes: 2 * 1024 * 1024,
            compressed_frames: 2,
            audio_samples: 480,
        };
        assert_eq!(
            stats.to_string(),
            "Frames: 3 (2 compressed), Size: 2.00 MB, Audio samples: 480"
        );
    }
}
