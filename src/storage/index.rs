//! Frame index table and its recovery chain
//!
//! A finalized file ends with a table of absolute frame offsets. Files left
//! open by a crash have no table (or a header pointing past the end of the
//! file), so the reader falls back to walking frame headers from the start
//! of the data section. Each strategy produces a candidate index, and the
//! first candidate that passes bounds validation wins.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use tracing::{debug, info, warn};

use super::format::{
    FrameHeader, StreamHeader, FRAME_HEADER_SIZE, HEADER_SIZE, INDEX_ENTRY_SIZE, INDEX_MAGIC,
    INDEX_TRAILER_SIZE,
};
use crate::{Result, VrawError};

/// How a frame index was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    /// Read from the table at the header's index offset
    Table,
    /// Rebuilt by scanning frame headers
    Scan,
}

/// Strategies in the order they are tried
const STRATEGIES: [IndexSource; 2] = [IndexSource::Table, IndexSource::Scan];

/// Ordered absolute offsets of frame headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameIndex {
    offsets: Vec<u64>,
}

impl FrameIndex {
    /// Empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the offset of the next frame
    pub fn push(&mut self, offset: u64) {
        self.offsets.push(offset);
    }

    /// Number of frames indexed
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no frames are indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offset of frame `i`
    #[must_use]
    pub fn get(&self, i: usize) -> Option<u64> {
        self.offsets.get(i).copied()
    }

    /// All offsets in frame order
    #[must_use]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Whether every offset lies inside the data section of a file of
    /// `file_len` bytes
    #[must_use]
    pub fn is_within(&self, file_len: u64) -> bool {
        !self.offsets.is_empty()
            && self
                .offsets
                .iter()
                .all(|&offset| offset >= HEADER_SIZE as u64 && offset < file_len)
    }

    /// Write the offset table followed by its trailer, returning bytes written
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<u64> {
        let mut table =
            Vec::with_capacity(self.offsets.len() * INDEX_ENTRY_SIZE + INDEX_TRAILER_SIZE);
        for offset in &self.offsets {
            table.extend_from_slice(&offset.to_le_bytes());
        }
        table.extend_from_slice(&INDEX_MAGIC);
        table.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        table.extend_from_slice(&[0u8; 8]);

        w.write_all(&table)?;
        Ok(table.len() as u64)
    }

    /// Obtain a validated index for `header`, trying each strategy in turn
    ///
    /// # Errors
    ///
    /// Returns [`VrawError::IndexUnrecoverable`] if no strategy yields a
    /// valid, non-empty index, or an I/O error if the source fails
    pub fn acquire<R: Read + Seek>(
        r: &mut R,
        header: &StreamHeader,
        file_len: u64,
    ) -> Result<(Self, IndexSource)> {
        for strategy in STRATEGIES {
            let candidate = match strategy {
                IndexSource::Table => Self::read_table(r, header, file_len)?,
                IndexSource::Scan => Self::scan(r, header, file_len)?,
            };

            match candidate {
                Some(index) if index.is_within(file_len) => {
                    info!("Frame index from {:?}: {} frames", strategy, index.len());
                    return Ok((index, strategy));
                }
                Some(index) => {
                    warn!(
                        "Discarding {:?} index of {} frames: offsets outside file bounds",
                        strategy,
                        index.len()
                    );
                }
                None => debug!("{:?} strategy found no frames", strategy),
            }
        }

        Err(VrawError::IndexUnrecoverable(format!(
            "no complete frames in {file_len}-byte file"
        )))
    }

    /// Read the table the header points at
    ///
    /// # Errors
    ///
    /// Returns error if the source fails for a reason other than EOF
    pub fn read_table<R: Read + Seek>(
        r: &mut R,
        header: &StreamHeader,
        file_len: u64,
    ) -> Result<Option<Self>> {
        if header.index_offset == 0 || header.frame_count == 0 {
            return Ok(None);
        }

        let table_len = u64::from(header.frame_count) * INDEX_ENTRY_SIZE as u64;
        if header.index_offset.saturating_add(table_len) > file_len {
            debug!(
                "Index table at {} ({} bytes) extends past end of file ({})",
                header.index_offset, table_len, file_len
            );
            return Ok(None);
        }

        r.seek(SeekFrom::Start(header.index_offset))?;
        let mut table = vec![0u8; table_len as usize];
        match r.read_exact(&mut table) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let offsets = table
            .chunks_exact(INDEX_ENTRY_SIZE)
            .map(|entry| {
                let mut bytes = [0u8; INDEX_ENTRY_SIZE];
                bytes.copy_from_slice(entry);
                u64::from_le_bytes(bytes)
            })
            .collect();

        Ok(Some(Self { offsets }))
    }

    /// Rebuild the index by walking frame headers from the data section
    ///
    /// Stops before the first frame whose header or payload is incomplete,
    /// whose payload size is zero, or whose frame number breaks the
    /// sequence. A declared frame count caps the scan; a count of zero (a
    /// file that was never finalized) leaves it unbounded.
    ///
    /// # Errors
    ///
    /// Returns error if a seek or read fails
    pub fn scan<R: Read + Seek>(
        r: &mut R,
        header: &StreamHeader,
        file_len: u64,
    ) -> Result<Option<Self>> {
        let limit = match header.frame_count {
            0 => usize::MAX,
            n => n as usize,
        };

        let mut index = Self::new();
        let mut pos = HEADER_SIZE as u64;

        while index.len() < limit && pos + FRAME_HEADER_SIZE as u64 <= file_len {
            r.seek(SeekFrom::Start(pos))?;
            let frame = FrameHeader::read_from(r)?;

            let payload = frame.payload_size();
            if payload == 0 {
                debug!("Scan stopped at {pos}: empty payload");
                break;
            }
            if frame.frame_number as usize != index.len() {
                debug!(
                    "Scan stopped at {pos}: frame number {} out of sequence",
                    frame.frame_number
                );
                break;
            }

            let end = pos + FRAME_HEADER_SIZE as u64 + payload;
            if end > file_len {
                debug!("Scan stopped at {pos}: payload ends at {end}, file ends at {file_len}");
                break;
            }

            index.push(pos);
            pos = end;
        }

        Ok((!index.is_empty()).then_some(index))
    }
}
