//! The sequencer run loop: the engine's single mutator.
//!
//! One thread pulls commands from a bounded ingress channel, stamps each
//! with an arrival sequence and timestamp, runs admission, journals the
//! admitted command, executes it, journals the resulting events, and
//! pushes them to the bounded egress channel. Nothing else touches the
//! engine, the journal, or the book; observers receive copies via events.
//!
//! On startup [`Sequencer::recover`] replays a non-empty journal through
//! the same admit/execute pipeline; determinism makes the post-replay
//! state bit-identical to the pre-shutdown state.

use super::error::{JournalError, SequencerError};
use super::journal::Journal;
use super::types::JournalRecord;
use crate::engine::command::{Command, SequencedCommand};
use crate::engine::event::SequencedEvent;
use crate::engine::state::{Admission, Engine};
use crate::utils::current_time_nanos;
use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

/// What a startup replay processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Inbound commands re-executed.
    pub commands_replayed: u64,
    /// Outbound records observed (used to fast-forward event sequencing).
    pub events_observed: u64,
}

/// Owns the engine, the journal, and both channel endpoints.
pub struct Sequencer<J: Journal> {
    engine: Engine,
    journal: J,
    inbound: Receiver<Command>,
    outbound: Sender<SequencedEvent>,
    next_arrival_seq: u64,
}

impl<J: Journal> Sequencer<J> {
    pub fn new(
        engine: Engine,
        journal: J,
        inbound: Receiver<Command>,
        outbound: Sender<SequencedEvent>,
    ) -> Self {
        Sequencer {
            engine,
            journal,
            inbound,
            outbound,
            next_arrival_seq: 1,
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Replays the journal into the engine.
    ///
    /// Inbound records re-run the full admit/execute pipeline and their
    /// events are discarded (they are re-derived identically). Outbound
    /// records only fast-forward the event sequence counter, which keeps
    /// it gap-free across rejection events whose commands were never
    /// journaled. Must run before [`Sequencer::run`] admits live traffic.
    ///
    /// # Errors
    /// A corrupt journal entry or a command that no longer admits is
    /// fatal; the operator inspects the journal rather than the engine
    /// guessing.
    pub fn recover(&mut self) -> Result<ReplaySummary, SequencerError> {
        let mut summary = ReplaySummary::default();
        let entries = self.journal.read_from(0)?;
        for entry in entries {
            let entry = entry?;
            match entry.record {
                JournalRecord::Inbound(cmd) => {
                    match self.engine.admit(&cmd)? {
                        Admission::Admitted => {}
                        Admission::Rejected(_) => {
                            error!(
                                arrival_seq = cmd.arrival_seq,
                                "journaled command no longer admits"
                            );
                            return Err(SequencerError::ReplayDiverged {
                                arrival_seq: cmd.arrival_seq,
                            });
                        }
                    }
                    let _ = self.engine.execute(&cmd)?;
                    self.next_arrival_seq = cmd.arrival_seq + 1;
                    summary.commands_replayed += 1;
                }
                JournalRecord::Outbound(event) => {
                    self.engine.note_outbound_seq(event.sequence_num);
                    summary.events_observed += 1;
                }
            }
        }
        if summary.commands_replayed > 0 {
            info!(
                commands = summary.commands_replayed,
                events = summary.events_observed,
                "journal replay complete"
            );
        }
        Ok(summary)
    }

    /// Processes commands until the ingress channel closes, then returns
    /// the engine and the journal for inspection.
    ///
    /// The journal is *not* archived here: every append is already
    /// flushed, so a process that stops without the clean-shutdown
    /// rotation still replays to the same state. Call
    /// [`Journal::archive`] on the returned journal to rotate the log
    /// when the session is truly over.
    ///
    /// # Errors
    /// Journal failures and engine faults are fatal. A fault is journaled
    /// and dispatched as a final `engine_fault` event before this
    /// returns; the embedding process is expected to exit non-zero.
    pub fn run(mut self) -> Result<(Engine, J), SequencerError> {
        info!("sequencer running");
        while let Ok(command) = self.inbound.recv() {
            self.process(command)?;
        }
        debug!("ingress closed; sequencer shutting down");
        Ok((self.engine, self.journal))
    }

    /// Stamps and fully processes one command.
    fn process(&mut self, command: Command) -> Result<(), SequencerError> {
        let stamped = SequencedCommand {
            arrival_seq: self.next_arrival_seq,
            timestamp_ns: current_time_nanos(),
            command,
        };
        self.next_arrival_seq += 1;

        match self.engine.admit(&stamped) {
            Ok(Admission::Admitted) => {
                // Write-ahead: the command is durable before any mutation.
                self.journal.append(&JournalRecord::Inbound(stamped.clone()))?;
                match self.engine.execute(&stamped) {
                    Ok(events) => self.dispatch(events),
                    Err(fault) => self.fail(stamped.timestamp_ns, fault),
                }
            }
            Ok(Admission::Rejected(events)) => self.dispatch(events),
            Err(fault) => self.fail(stamped.timestamp_ns, fault),
        }
    }

    /// Journals and forwards sequenced events, in order.
    fn dispatch(&mut self, events: Vec<SequencedEvent>) -> Result<(), SequencerError> {
        for event in events {
            self.journal.append(&JournalRecord::Outbound(event.clone()))?;
            if self.outbound.send(event).is_err() {
                warn!("event egress closed; stopping");
                return Err(SequencerError::EgressClosed);
            }
        }
        Ok(())
    }

    /// Terminal path: journal the fault event, dispatch it best-effort,
    /// and surface the fault.
    fn fail(
        &mut self,
        timestamp_ns: u64,
        fault: crate::engine::error::EngineFault,
    ) -> Result<(), SequencerError> {
        error!(%fault, "fatal engine fault");
        let event = self.engine.fault_event(timestamp_ns, &fault);
        // The journal must stay truthful up to the final event; a journal
        // failure here still reports the original fault.
        if let Err(journal_err) = self.journal.append(&JournalRecord::Outbound(event.clone())) {
            error!(%journal_err, "could not journal the fault event");
        }
        let _ = self.outbound.send(event);
        Err(SequencerError::Fault(fault))
    }
}

impl<J: Journal> Sequencer<J> {
    /// Verifies the whole journal's CRC chain.
    ///
    /// # Errors
    /// Returns the first corrupt frame.
    pub fn verify_journal(&self) -> Result<(), JournalError> {
        self.journal.verify_integrity()
    }
}

impl<J: Journal + 'static> Sequencer<J> {
    /// Moves the sequencer onto its own thread.
    #[must_use]
    pub fn spawn(self) -> std::thread::JoinHandle<Result<(Engine, J), SequencerError>> {
        std::thread::Builder::new()
            .name("sequencer".to_string())
            .spawn(move || self.run())
            .expect("spawn sequencer thread")
    }
}
