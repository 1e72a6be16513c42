//! Append-only table journal
//!
//! Every committed batch is one frame:
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32 LE, whole frame including this field)
//! +------------------+
//! | Entry            | (JSON: sequence number + mutations)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 over length + entry)
//! +------------------+
//! ```
//!
//! A batch is durable once its frame is written and fsynced. On open, a frame
//! cut short at the end of the file is an interrupted commit and is discarded;
//! a complete frame with a bad checksum is corruption.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::errors::{TableError, TableResult};
use super::state::Mutation;

const HEADER_SIZE: usize = 4;
const CHECKSUM_SIZE: usize = 4;
const MIN_FRAME_SIZE: usize = HEADER_SIZE + 2 + CHECKSUM_SIZE;

/// One committed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonic commit number within the journal
    pub sequence: u64,
    /// Row changes of the batch, in order
    pub mutations: Vec<Mutation>,
}

/// Computes the CRC32 (IEEE) checksum of a byte slice.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

impl JournalEntry {
    /// Encodes the entry as a complete frame.
    pub fn encode(&self) -> TableResult<Vec<u8>> {
        let body = serde_json::to_vec(self).map_err(|e| {
            TableError::write_failed(
                "failed to encode journal entry",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        let frame_length = (HEADER_SIZE + body.len() + CHECKSUM_SIZE) as u32;

        let mut frame = Vec::with_capacity(frame_length as usize);
        frame.extend_from_slice(&frame_length.to_le_bytes());
        frame.extend_from_slice(&body);
        let checksum = compute_checksum(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());
        Ok(frame)
    }

    /// Decodes a complete frame, verifying its checksum.
    pub fn decode(frame: &[u8], offset: u64) -> TableResult<Self> {
        if frame.len() < MIN_FRAME_SIZE {
            return Err(TableError::corruption_at_offset(
                offset,
                format!("frame too short: {} bytes", frame.len()),
            ));
        }
        let checksum_offset = frame.len() - CHECKSUM_SIZE;
        let stored = u32::from_le_bytes([
            frame[checksum_offset],
            frame[checksum_offset + 1],
            frame[checksum_offset + 2],
            frame[checksum_offset + 3],
        ]);
        let computed = compute_checksum(&frame[..checksum_offset]);
        if stored != computed {
            return Err(TableError::corruption_at_offset(
                offset,
                format!(
                    "checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
            ));
        }
        serde_json::from_slice(&frame[HEADER_SIZE..checksum_offset]).map_err(|e| {
            TableError::corruption_at_offset(offset, format!("undecodable entry: {}", e))
        })
    }
}

/// Sequential journal reader used for replay.
pub struct JournalReader {
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
    torn_tail: bool,
}

impl JournalReader {
    /// Opens a journal for reading.
    pub fn open(path: &Path) -> TableResult<Self> {
        let file = File::open(path).map_err(|e| {
            TableError::read_failed(format!("failed to open journal: {}", path.display()), e)
        })?;
        let file_size = file
            .metadata()
            .map_err(|e| TableError::read_failed("failed to read journal metadata", e))?
            .len();
        Ok(Self {
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
            torn_tail: false,
        })
    }

    /// Offset just past the last complete frame read.
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// True when reading stopped at an incomplete trailing frame.
    pub fn has_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Reads the next entry, or `None` at the end of the valid journal.
    pub fn read_next(&mut self) -> TableResult<Option<JournalEntry>> {
        if self.torn_tail || self.current_offset >= self.file_size {
            return Ok(None);
        }
        let remaining = self.file_size - self.current_offset;
        if remaining < HEADER_SIZE as u64 {
            self.torn_tail = true;
            return Ok(None);
        }

        let mut len_buf = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            TableError::read_failed(
                format!("failed to read frame length at offset {}", self.current_offset),
                e,
            )
        })?;
        let frame_length = u32::from_le_bytes(len_buf) as u64;

        if frame_length < MIN_FRAME_SIZE as u64 {
            return Err(TableError::corruption_at_offset(
                self.current_offset,
                format!("invalid frame length: {}", frame_length),
            ));
        }
        if frame_length > remaining {
            self.torn_tail = true;
            return Ok(None);
        }

        let mut frame = vec![0u8; frame_length as usize];
        frame[..HEADER_SIZE].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut frame[HEADER_SIZE..]).map_err(|e| {
            TableError::read_failed(
                format!("failed to read frame at offset {}", self.current_offset),
                e,
            )
        })?;

        let entry = JournalEntry::decode(&frame, self.current_offset)?;
        self.current_offset += frame_length;
        Ok(Some(entry))
    }
}

/// Append-only journal writer with fsync after every frame.
///
/// A failed append truncates the file back to the last committed frame. If
/// that truncation fails too, the writer is poisoned and refuses further
/// appends until the table is reopened.
pub struct JournalWriter {
    path: PathBuf,
    file: File,
    next_sequence: u64,
    committed_len: u64,
    poisoned: bool,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl JournalWriter {
    /// Opens the journal for appending, discarding anything past `valid_len`.
    pub fn open(path: &Path, valid_len: u64, next_sequence: u64) -> TableResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    TableError::write_failed(
                        format!("failed to create table directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                TableError::write_failed(format!("failed to open journal: {}", path.display()), e)
            })?;

        let len = file
            .metadata()
            .map_err(|e| TableError::io_error("failed to read journal metadata", e))?
            .len();
        if len > valid_len {
            file.set_len(valid_len)
                .map_err(|e| TableError::write_failed("failed to discard torn journal tail", e))?;
            file.sync_all()
                .map_err(|e| TableError::write_failed("fsync failed after truncation", e))?;
        }

        let mut writer = Self {
            path: path.to_path_buf(),
            file,
            next_sequence,
            committed_len: len.min(valid_len),
            poisoned: false,
            #[cfg(test)]
            fail_after: None,
        };
        writer.seek_end()?;
        Ok(writer)
    }

    fn seek_end(&mut self) -> TableResult<()> {
        use std::io::{Seek, SeekFrom};
        self.file
            .seek(SeekFrom::End(0))
            .map_err(|e| TableError::io_error("failed to seek journal end", e))?;
        Ok(())
    }

    /// Returns the journal path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once a failed append could not be undone.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Appends one committed batch and fsyncs it.
    ///
    /// On failure nothing of the frame is left in the file.
    pub fn append(&mut self, mutations: &[Mutation]) -> TableResult<u64> {
        if self.poisoned {
            return Err(TableError::journal_poisoned(format!(
                "journal {} has an unremovable partial frame; reopen the table",
                self.path.display()
            )));
        }

        let entry = JournalEntry {
            sequence: self.next_sequence,
            mutations: mutations.to_vec(),
        };
        let frame = entry.encode()?;

        if let Err(e) = self.write_frame(&frame) {
            self.discard_partial_frame();
            return Err(TableError::write_failed(
                format!("failed to append journal frame {}", entry.sequence),
                e,
            ));
        }
        if let Err(e) = self.file.sync_all() {
            self.discard_partial_frame();
            return Err(TableError::write_failed(
                format!("fsync failed after journal frame {}", entry.sequence),
                e,
            ));
        }

        self.committed_len += frame.len() as u64;
        self.next_sequence += 1;
        Ok(entry.sequence)
    }

    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        {
            if let Some(n) = self.fail_after.take() {
                self.file.write_all(&frame[..n.min(frame.len())])?;
                return Err(std::io::Error::other("injected write failure"));
            }
        }
        self.file.write_all(frame)
    }

    fn discard_partial_frame(&mut self) {
        let restored = self
            .file
            .set_len(self.committed_len)
            .and_then(|_| self.file.sync_all())
            .map_err(|e| TableError::write_failed("failed to truncate partial frame", e))
            .and_then(|_| self.seek_end());
        if restored.is_err() {
            self.poisoned = true;
        }
    }

    /// Makes the next append write only `bytes` of its frame and then fail.
    #[cfg(test)]
    pub(crate) fn fail_next_append_after(&mut self, bytes: usize) {
        self.fail_after = Some(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Instant;
    use tempfile::TempDir;

    fn entry(sequence: u64) -> JournalEntry {
        JournalEntry {
            sequence,
            mutations: vec![Mutation::SetEnd {
                id: 3,
                end: Instant::from_micros(42),
            }],
        }
    }

    #[test]
    fn test_frame_decodes_after_encode() {
        let frame = entry(1).encode().unwrap();
        assert_eq!(JournalEntry::decode(&frame, 0).unwrap(), entry(1));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut frame = entry(1).encode().unwrap();
        let mid = frame.len() / 2;
        frame[mid] ^= 0xFF;
        let err = JournalEntry::decode(&frame, 0).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_reader_stops_at_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.journal");
        {
            let mut writer = JournalWriter::open(&path, 0, 1).unwrap();
            writer.append(&entry(1).mutations).unwrap();
            writer.append(&entry(2).mutations).unwrap();
        }
        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() - 3]).unwrap();

        let mut reader = JournalReader::open(&path).unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap().sequence, 1);
        assert!(reader.read_next().unwrap().is_none());
        assert!(reader.has_torn_tail());

        let valid = reader.current_offset();
        let mut writer = JournalWriter::open(&path, valid, 2).unwrap();
        writer.append(&entry(2).mutations).unwrap();

        let mut reader = JournalReader::open(&path).unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap().sequence, 1);
        assert_eq!(reader.read_next().unwrap().unwrap().sequence, 2);
        assert!(reader.read_next().unwrap().is_none());
        assert!(!reader.has_torn_tail());
    }

    #[test]
    fn test_failed_append_leaves_no_partial_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.journal");
        let mut writer = JournalWriter::open(&path, 0, 1).unwrap();
        writer.append(&entry(1).mutations).unwrap();
        let committed = fs::metadata(&path).unwrap().len();

        writer.fail_next_append_after(7);
        let err = writer.append(&entry(2).mutations).unwrap_err();
        assert_eq!(err.code(), crate::table::TableErrorCode::ChronoTableWriteFailed);
        assert!(!writer.is_poisoned());
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);

        // the sequence number is reused by the next successful append
        assert_eq!(writer.append(&entry(2).mutations).unwrap(), 2);
        drop(writer);

        let mut reader = JournalReader::open(&path).unwrap();
        assert_eq!(reader.read_next().unwrap().unwrap().sequence, 1);
        assert_eq!(reader.read_next().unwrap().unwrap().sequence, 2);
        assert!(reader.read_next().unwrap().is_none());
        assert!(!reader.has_torn_tail());
    }
}
