//! Error types for the journal and the run loop.

use crate::engine::error::EngineFault;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure modes of the append-only recovery journal.
#[derive(Debug)]
#[non_exhaustive]
pub enum JournalError {
    /// An I/O error while reading or writing journal files.
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file involved, if known.
        path: Option<PathBuf>,
    },

    /// An entry failed CRC32 verification.
    CorruptEntry {
        /// The entry sequence of the corrupt frame.
        entry_seq: u64,
        /// CRC stored on disk.
        expected_crc: u32,
        /// CRC computed from the frame bytes.
        actual_crc: u32,
    },

    /// An entry frame is malformed (truncated header or impossible
    /// length).
    InvalidEntryFrame {
        /// Byte offset within the segment.
        offset: usize,
        /// What was wrong with the frame.
        message: String,
    },

    /// The payload could not be serialized for writing.
    SerializationError {
        message: String,
    },

    /// The payload could not be deserialized on read-back.
    DeserializationError {
        /// The entry sequence of the undecodable frame.
        entry_seq: u64,
        message: String,
    },

    /// A single entry exceeds the segment capacity.
    EntryTooLarge {
        entry_bytes: usize,
        segment_size: usize,
    },

    /// The journal directory does not exist or is not usable.
    InvalidDirectory {
        path: PathBuf,
    },
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "journal I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "journal I/O error: {message}")
                }
            }
            JournalError::CorruptEntry {
                entry_seq,
                expected_crc,
                actual_crc,
            } => {
                write!(
                    f,
                    "corrupt journal entry {entry_seq}: \
                     expected CRC {expected_crc:#010x}, got {actual_crc:#010x}"
                )
            }
            JournalError::InvalidEntryFrame { offset, message } => {
                write!(f, "invalid journal frame at offset {offset}: {message}")
            }
            JournalError::SerializationError { message } => {
                write!(f, "journal serialization error: {message}")
            }
            JournalError::DeserializationError { entry_seq, message } => {
                write!(
                    f,
                    "journal deserialization error at entry {entry_seq}: {message}"
                )
            }
            JournalError::EntryTooLarge {
                entry_bytes,
                segment_size,
            } => {
                write!(
                    f,
                    "journal entry too large: {entry_bytes} bytes exceeds \
                     segment size {segment_size} bytes"
                )
            }
            JournalError::InvalidDirectory { path } => {
                write!(f, "invalid journal directory: {}", path.display())
            }
        }
    }
}

impl std::error::Error for JournalError {}

impl From<std::io::Error> for JournalError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        JournalError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

/// Failures of the sequencer run loop.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SequencerError {
    /// The journal refused a write or failed verification. Fatal: the
    /// journal must stay truthful up to the last flushed event.
    #[error("journal failure: {0}")]
    Journal(#[from] JournalError),

    /// The engine hit a fatal invariant violation.
    #[error("engine fault: {0}")]
    Fault(#[from] EngineFault),

    /// The event consumer went away; the core never buffers unboundedly
    /// on its behalf.
    #[error("event egress closed")]
    EgressClosed,

    /// A journaled command failed admission during replay. The journal
    /// and the engine disagree; state cannot be trusted.
    #[error("replay diverged: journaled command at arrival_seq {arrival_seq} was rejected")]
    ReplayDiverged { arrival_seq: u64 },
}
