//! Append-only journal trait for deterministic replay.
//!
//! The [`Journal`] contract is write-ahead: an inbound command is appended
//! after admission and *before* any state mutates; an outbound event is
//! appended after sequencing and before dispatch. An entry is committed
//! only once [`append`](Journal::append) returns `Ok`.
//!
//! # On-disk frame (little-endian)
//!
//! ```text
//! [8 bytes: entry_seq][4 bytes: payload_len][N bytes: JSON payload][4 bytes: CRC32]
//! ```
//!
//! The CRC32 covers `entry_seq ‖ payload`. `payload_len` is the payload
//! byte count only; a frame with `payload_len == 0` marks the zeroed tail
//! of a pre-allocated segment, i.e. the end of the log.

use super::error::JournalError;
use super::types::{JournalEntry, JournalRecord};

/// Frame header size in bytes: entry_seq + payload_len.
pub const ENTRY_HEADER_SIZE: usize = 8 + 4;

/// CRC32 trailer size in bytes.
pub const ENTRY_CRC_SIZE: usize = 4;

/// Fixed overhead per entry (header + trailer).
pub const ENTRY_OVERHEAD: usize = ENTRY_HEADER_SIZE + ENTRY_CRC_SIZE;

/// Iterator over decoded journal entries.
///
/// Items are `Err` for frames that fail CRC or deserialization; iteration
/// stops at the first clean end-of-log.
pub type JournalReadIter = Box<dyn Iterator<Item = Result<JournalEntry, JournalError>>>;

/// An append-only, checksummed record log.
///
/// Intended usage is single-writer: the sequencer thread owns the journal
/// and appends from the hot loop; readers exist only at startup (replay)
/// and in diagnostics.
pub trait Journal: Send {
    /// Durably appends a record and returns its entry sequence.
    ///
    /// The record must be flushed to storage before this returns.
    ///
    /// # Errors
    /// Any serialization or I/O failure. The caller must treat an error
    /// as fatal; a journal that silently drops entries cannot replay.
    fn append(&mut self, record: &JournalRecord) -> Result<u64, JournalError>;

    /// Reads entries in order starting at `entry_seq` (inclusive).
    ///
    /// # Errors
    /// Fails if segment files cannot be opened.
    fn read_from(&self, entry_seq: u64) -> Result<JournalReadIter, JournalError>;

    /// The entry sequence of the last committed record, `None` when the
    /// journal is empty.
    #[must_use]
    fn last_entry_seq(&self) -> Option<u64>;

    /// Walks every frame and verifies its CRC32.
    ///
    /// # Errors
    /// Returns the first corrupt or malformed frame found.
    fn verify_integrity(&self) -> Result<(), JournalError>;

    /// Rotates the log on clean shutdown: committed segments are renamed
    /// aside and a fresh segment begins. Returns the number of segments
    /// archived.
    ///
    /// # Errors
    /// Fails if segment files cannot be flushed or renamed.
    fn archive(&mut self) -> Result<usize, JournalError>;
}
