//! Optional on-disk write-ahead journal, behind the `journal` feature.
//!
//! This is additive durability beyond the store's minimum contract: the
//! default [`InMemoryTransactionStore`](crate::InMemoryTransactionStore)
//! needs no disk I/O at all. When enabled, every status transition is
//! appended as a checksummed, length-prefixed [`JournalRecord`] — one
//! record per mutation, checksummed independently so a torn write at the
//! tail is detectable and simply truncates replay rather than corrupting
//! earlier records.
//!
//! `Step` values are opaque to this crate, so recovering a stack across a
//! restart needs an embedder-supplied [`fate_core::StepCodec`] for their
//! own step types. Given one, [`InMemoryTransactionStore::with_journal`]
//! fully reconstructs every row — status, stack, deletion — from replay,
//! because `push`/`pop` also append [`JournalRecord::Pushed`] /
//! [`JournalRecord::Popped`] records. Without a codec, the journal still
//! recovers id allocation and status history (enough to avoid reissuing a
//! `FateId` and to replay an audit trail of what happened to a row), but a
//! recovered row always comes back with an empty stack.

use fate_core::{FateId, Status};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// One durable fact about a transaction, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JournalRecord {
    /// A new row was allocated.
    Created {
        /// The allocated id.
        id: FateId,
    },
    /// A row's status changed.
    StatusChanged {
        /// Which row.
        id: FateId,
        /// Its new status.
        to: Status,
    },
    /// A row was deleted and its id returned to `UNKNOWN`.
    Deleted {
        /// Which row.
        id: FateId,
    },
    /// A step was pushed onto a row's stack.
    Pushed {
        /// Which row.
        id: FateId,
        /// The step's [`name()`](fate_core::Step::name), handed back to the
        /// codec's `decode` alongside `bytes`.
        step_name: String,
        /// The codec-encoded step.
        bytes: Vec<u8>,
    },
    /// The top of a row's stack was popped.
    Popped {
        /// Which row.
        id: FateId,
    },
}

/// Errors from journal I/O.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The underlying file could not be read or written.
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),
    /// A record failed to serialize.
    #[error("journal encode error: {0}")]
    Encode(#[from] bincode::Error),
    /// A record's checksum did not match its bytes; recovery stops here.
    #[error("journal checksum mismatch at offset {offset}")]
    Corrupt {
        /// Byte offset of the bad record.
        offset: u64,
    },
}

/// An append-only, checksummed journal file.
///
/// Each record is written as `[len: u32 LE][crc32: u32 LE][bincode bytes]`.
/// Appends are fsync'd immediately — FATE rows mutate far less often than
/// a storage engine's write path, so the extra fsync is not a concern on
/// any path this crate cares about.
pub struct Journal {
    path: PathBuf,
    file: parking_lot::Mutex<File>,
}

impl Journal {
    /// Open (creating if necessary) a journal file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        Ok(Journal {
            path,
            file: parking_lot::Mutex::new(file),
        })
    }

    /// Append one record, fsync'd before returning.
    pub fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let bytes = bincode::serialize(record)?;
        let checksum = crc32fast::hash(&bytes);
        let mut file = self.file.lock();
        file.write_all(&(bytes.len() as u32).to_le_bytes())?;
        file.write_all(&checksum.to_le_bytes())?;
        file.write_all(&bytes)?;
        file.sync_data()?;
        Ok(())
    }

    /// Replay every well-formed record in order. Stops (without error) at
    /// the first truncated trailing record — the tail of a journal whose
    /// last append was interrupted by a crash mid-write.
    pub fn replay(&self) -> Result<Vec<JournalRecord>, JournalError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset = 0u64;
        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut crc_buf = [0u8; 4];
            if reader.read_exact(&mut crc_buf).is_err() {
                break; // torn tail: length written, checksum never was
            }
            let expected_crc = u32::from_le_bytes(crc_buf);

            let mut payload = vec![0u8; len];
            if reader.read_exact(&mut payload).is_err() {
                break; // torn tail: header written, payload never was
            }
            if crc32fast::hash(&payload) != expected_crc {
                return Err(JournalError::Corrupt { offset });
            }
            records.push(bincode::deserialize(&payload)?);
            offset += 8 + len as u64;
        }
        Ok(records)
    }
}

/// A shared handle to a [`Journal`], cloned into every
/// [`ReservedTx`](crate::ReservedTx) so appends don't need to round-trip
/// through the store.
pub type JournalHandle = Arc<Journal>;
