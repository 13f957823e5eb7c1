//! Durable ledger journal.
//!
//! A single append-only file holding every committed record mutation and its
//! paired event. Each journal record has the following on-disk format:
//!
//! ```text
//! +----------+----------+----------+----------+----------+----------+
//! | magic    | type     | flags    | reserved | length   | crc32c   |
//! | 4 bytes  | 1 byte   | 1 byte   | 2 bytes  | 4 bytes  | 4 bytes  |
//! +----------+----------+----------+----------+----------+----------+
//! | sequence_number     | payload (JSON)                            |
//! | 8 bytes             | length bytes                              |
//! +---------------------+-------------------------------------------+
//! ```
//!
//! Opening the journal replays all valid records and truncates a torn or
//! corrupt tail, so a crash mid-append never poisons the file.

use crate::error::JournalError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use custody_core::{ShipmentRecord, TransitionEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Magic bytes for journal records: "CLOG"
pub const JOURNAL_MAGIC: [u8; 4] = *b"CLOG";

/// Journal record header size in bytes.
pub const RECORD_HEADER_SIZE: usize = 24;

/// Maximum record payload size (1 MiB).
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// A committed change, as persisted.
///
/// Both variants carry the full post-state record, so replay is assignment
/// and never re-runs validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalEntry {
    /// Record created.
    Created { record: ShipmentRecord },
    /// Transition committed: post-state record plus its paired event.
    Transition {
        record: ShipmentRecord,
        event: TransitionEvent,
    },
}

impl JournalEntry {
    fn type_byte(&self) -> u8 {
        match self {
            JournalEntry::Created { .. } => 1,
            JournalEntry::Transition { .. } => 2,
        }
    }
}

/// A framed journal record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub entry_type: u8,
    pub sequence: u64,
    pub payload: Bytes,
}

impl Frame {
    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, JournalError> {
        if self.payload.len() > MAX_RECORD_SIZE {
            return Err(JournalError::RecordTooLarge {
                size: self.payload.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + self.payload.len());
        buf.put_slice(&JOURNAL_MAGIC);
        buf.put_u8(self.entry_type);
        buf.put_u8(0); // flags
        buf.put_u16(0); // reserved
        buf.put_u32(self.payload.len() as u32);
        buf.put_u32(crc32c::crc32c(&self.payload));
        buf.put_u64(self.sequence);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes one frame from the start of `buf`.
    ///
    /// Returns `Ok(None)` for a partial record at the tail (not enough bytes
    /// yet), `Err` for corruption, and the consumed byte count otherwise.
    pub fn decode(buf: &[u8], offset: u64) -> Result<Option<(Frame, usize)>, JournalError> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Ok(None);
        }

        let magic: [u8; 4] = buf[0..4].try_into().unwrap();
        if magic != JOURNAL_MAGIC {
            // All-zero padding reads as EOF, anything else is corruption.
            if magic == [0, 0, 0, 0] {
                return Ok(None);
            }
            return Err(JournalError::InvalidHeader {
                offset,
                reason: format!("bad magic: {:02x?}", magic),
            });
        }

        let mut header = &buf[4..RECORD_HEADER_SIZE];
        let entry_type = header.get_u8();
        let _flags = header.get_u8();
        let _reserved = header.get_u16();
        let payload_len = header.get_u32() as usize;
        let expected_crc = header.get_u32();
        let sequence = header.get_u64();

        if payload_len > MAX_RECORD_SIZE {
            return Err(JournalError::InvalidHeader {
                offset,
                reason: format!("payload length {} exceeds maximum", payload_len),
            });
        }
        if buf.len() < RECORD_HEADER_SIZE + payload_len {
            return Ok(None);
        }

        let payload = Bytes::copy_from_slice(
            &buf[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + payload_len],
        );
        let actual_crc = crc32c::crc32c(&payload);
        if actual_crc != expected_crc {
            return Err(JournalError::ChecksumMismatch {
                offset,
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        Ok(Some((
            Frame {
                entry_type,
                sequence,
                payload,
            },
            RECORD_HEADER_SIZE + payload_len,
        )))
    }
}

/// Append-only, checksummed journal file.
pub struct Journal {
    file: Mutex<File>,
    path: PathBuf,
    next_sequence: AtomicU64,
}

impl Journal {
    /// Opens (or creates) the journal at `path` and replays it.
    ///
    /// Returns the journal plus every valid entry in append order. A torn or
    /// corrupt tail is truncated away.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<(u64, JournalEntry)>), JournalError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut entries = Vec::new();
        let mut pos = 0usize;
        let mut next_sequence = 0u64;

        while pos < data.len() {
            match Frame::decode(&data[pos..], pos as u64) {
                Ok(Some((frame, consumed))) => {
                    match serde_json::from_slice::<JournalEntry>(&frame.payload) {
                        Ok(entry) => {
                            next_sequence = frame.sequence + 1;
                            entries.push((frame.sequence, entry));
                            pos += consumed;
                        }
                        Err(e) => {
                            tracing::warn!(
                                offset = pos,
                                error = %e,
                                "unreadable journal payload, truncating tail"
                            );
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(offset = pos, error = %e, "corrupt journal tail, truncating");
                    break;
                }
            }
        }

        if pos < data.len() {
            file.set_len(pos as u64)?;
            file.sync_data()?;
            tracing::warn!(
                path = %path.display(),
                bytes_truncated = data.len() - pos,
                "journal recovered with truncation"
            );
        }
        file.seek(SeekFrom::End(0))?;

        Ok((
            Self {
                file: Mutex::new(file),
                path,
                next_sequence: AtomicU64::new(next_sequence),
            },
            entries,
        ))
    }

    /// Appends one entry and syncs it to disk. Returns its sequence number.
    pub fn append(&self, entry: &JournalEntry) -> Result<u64, JournalError> {
        let payload = Bytes::from(serde_json::to_vec(entry)?);
        let mut file = self.file.lock();
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let frame = Frame {
            entry_type: entry.type_byte(),
            sequence,
            payload,
        };
        let encoded = frame.encode()?;
        file.write_all(&encoded)?;
        file.sync_data()?;
        Ok(sequence)
    }

    /// Returns the next sequence number that will be assigned.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    /// Returns the journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
