//! Sequenced I/O around the engine: journal, replay, and the run loop.

mod error;
mod file_journal;
mod journal;
mod runner;
mod types;

pub use error::{JournalError, SequencerError};
pub use file_journal::FileJournal;
pub use journal::{ENTRY_CRC_SIZE, ENTRY_HEADER_SIZE, ENTRY_OVERHEAD, Journal, JournalReadIter};
pub use runner::{ReplaySummary, Sequencer};
pub use types::{JournalEntry, JournalRecord};
