//! Journal record types.
//!
//! The recovery journal interleaves two record kinds: admitted inbound
//! commands (written after admission, before any mutation) and emitted
//! outbound events (written after sequencing, before dispatch). Inbound
//! records alone determine the post-replay state; outbound records exist
//! to keep the event sequence gap-free across a restart and for
//! post-mortem inspection.

use crate::engine::command::SequencedCommand;
use crate::engine::event::SequencedEvent;
use serde::{Deserialize, Serialize};

/// One journal payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    /// An admitted command, with its arrival stamp.
    Inbound(SequencedCommand),
    /// A sequenced outbound event.
    Outbound(SequencedEvent),
}

/// A record read back from storage together with its frame metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Position of the entry in the journal, monotonic and gap-free.
    pub entry_seq: u64,
    /// The decoded payload.
    pub record: JournalRecord,
    /// The CRC32 stored alongside the entry on disk.
    pub stored_crc: u32,
}
