//! The engine: a single value owned by a single run loop.
//!
//! Commands enter through [`Engine::admit`] and, once journaled, execute
//! through [`Engine::execute`]. A command is processed to completion
//! before the next one is pulled; the only clock the engine sees is the
//! arrival timestamp stamped on the command. Every observable effect
//! leaves as a [`SequencedEvent`] with a gap-free sequence number.

use crate::engine::book::OrderBook;
use crate::engine::command::{Command, SequencedCommand};
use crate::engine::config::{ConfigError, EngineConfig};
use crate::engine::error::EngineFault;
use crate::engine::event::{EngineEvent, RejectReason, SequencedEvent};
use crate::engine::order::TraderId;
use crate::engine::position::Accounts;
use crate::engine::risk::{Gate, RateLimiter};
use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Engine-wide halt flag. When halted, all new orders are rejected;
/// cancels still pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSwitch {
    Running,
    Halted,
}

/// Who originated a submit.
///
/// Liquidation-sourced orders skip exactly the initial-margin check and
/// never trigger a nested maintenance scan of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OrderSource {
    Client,
    Liquidation,
}

/// Outcome of admission for one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Journal the command, then call [`Engine::execute`].
    Admitted,
    /// The command was refused; these events are final. The command must
    /// not be journaled.
    Rejected(Vec<SequencedEvent>),
}

/// The deterministic matching and accounting state machine.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) book: OrderBook,
    pub(crate) accounts: Accounts,
    pub(crate) rate: RateLimiter,
    pub(crate) kill_switch: KillSwitch,
    pub(crate) last_trade_price: Option<Fixed>,
    pub(crate) next_order_id: u64,
    pub(crate) next_trade_id: u64,
    pub(crate) next_event_seq: u64,
    /// Consecutive post-trade ticks each trader has stayed in breach.
    pub(crate) breach_ticks: HashMap<TraderId, u32>,
}

impl Engine {
    /// Builds an engine around a validated configuration.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] in the configuration.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let accounts = Accounts::new(config.starting_capital);
        Ok(Engine {
            config,
            book: OrderBook::new(),
            accounts,
            rate: RateLimiter::default(),
            kill_switch: KillSwitch::Running,
            last_trade_price: None,
            next_order_id: 1,
            next_trade_id: 1,
            next_event_seq: 1,
            breach_ticks: HashMap::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[must_use]
    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    #[must_use]
    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch
    }

    #[must_use]
    pub fn last_trade_price(&self) -> Option<Fixed> {
        self.last_trade_price
    }

    #[must_use]
    pub fn next_event_seq(&self) -> u64 {
        self.next_event_seq
    }

    #[must_use]
    pub fn next_order_id(&self) -> u64 {
        self.next_order_id
    }

    #[must_use]
    pub fn next_trade_id(&self) -> u64 {
        self.next_trade_id
    }

    /// Mark price: mid when both sides quote, else the last trade, else
    /// undefined.
    #[must_use]
    pub fn mark_price(&self) -> Option<Fixed> {
        match (self.book.best_bid(), self.book.best_ask()) {
            (Some(bid), Some(ask)) => Some(bid.mid(ask)),
            _ => self.last_trade_price,
        }
    }

    /// Runs the pre-trade gate for a stamped command.
    ///
    /// Admission mutates nothing but the rate buckets. Rejection events
    /// are sequenced here so the outbound stream stays gap-free.
    ///
    /// # Errors
    /// Arithmetic overflow during margin projection is fatal.
    pub fn admit(&mut self, cmd: &SequencedCommand) -> Result<Admission, EngineFault> {
        match &cmd.command {
            Command::SubmitOrder {
                trader_id,
                side,
                kind,
                qty,
                price,
                client_order_id,
                ..
            } => {
                let gate = self.gate_submit(
                    trader_id,
                    *side,
                    *kind,
                    *qty,
                    *price,
                    OrderSource::Client,
                    cmd.timestamp_ns,
                )?;
                match gate {
                    Gate::Pass => Ok(Admission::Admitted),
                    Gate::Reject { reason, details } => {
                        debug!(trader = %trader_id, %reason, "order refused at the gate");
                        let event = EngineEvent::OrderRejected {
                            reason,
                            details,
                            trader_id: Some(trader_id.clone()),
                            client_order_id: Some(*client_order_id),
                        };
                        Ok(Admission::Rejected(
                            self.seal(cmd.timestamp_ns, vec![event]),
                        ))
                    }
                }
            }

            // Cancels carry nothing the gate can refuse; unknown ids are
            // discovered in execution.
            Command::CancelOrder { .. } | Command::CancelAll { .. } => Ok(Admission::Admitted),

            Command::AdminHalt { auth } | Command::AdminResume { auth } => {
                if self.admin_authorized(auth.as_deref()) {
                    Ok(Admission::Admitted)
                } else {
                    let event = EngineEvent::OrderRejected {
                        reason: RejectReason::InvalidMessage,
                        details: Some("admin auth token mismatch".to_string()),
                        trader_id: None,
                        client_order_id: None,
                    };
                    Ok(Admission::Rejected(
                        self.seal(cmd.timestamp_ns, vec![event]),
                    ))
                }
            }
        }
    }

    /// Executes an admitted command to completion.
    ///
    /// # Errors
    /// A fatal fault leaves the engine unusable; the caller must journal
    /// the fault event and stop.
    pub fn execute(&mut self, cmd: &SequencedCommand) -> Result<Vec<SequencedEvent>, EngineFault> {
        let mut out = Vec::new();
        let mut mutated = match &cmd.command {
            Command::SubmitOrder {
                trader_id,
                side,
                kind,
                qty,
                price,
                tif,
                client_order_id,
            } => {
                self.execute_submit(
                    trader_id.clone(),
                    *side,
                    *kind,
                    *qty,
                    *price,
                    *tif,
                    *client_order_id,
                    cmd.arrival_seq,
                    &mut out,
                )?
                .mutated_book
            }

            Command::CancelOrder {
                trader_id,
                order_id,
            } => self.execute_cancel(trader_id, *order_id, &mut out),

            Command::CancelAll { trader_id } => self.execute_cancel_all(trader_id, &mut out),

            Command::AdminHalt { .. } => {
                info!("kill switch set: halting order intake");
                self.kill_switch = KillSwitch::Halted;
                false
            }

            Command::AdminResume { .. } => {
                info!("kill switch cleared: resuming order intake");
                self.kill_switch = KillSwitch::Running;
                false
            }
        };

        // Any mutation can move the mark, so the maintenance scan runs
        // after every mutating command, not only after fills.
        if mutated {
            mutated |= self.maintenance_scan(cmd.arrival_seq, cmd.timestamp_ns, &mut out)?;
        }

        if mutated {
            let (bids, asks) = self.book.depth(self.config.book_depth_in_updates);
            out.push(EngineEvent::BookUpdate {
                best_bid: self.book.best_bid(),
                best_ask: self.book.best_ask(),
                bids,
                asks,
            });
        }

        if self.book.has_executable_cross() {
            // Unreachable by construction; reaching it means the matching
            // loop is broken and nothing downstream can be trusted.
            return Err(EngineFault::CrossedBook {
                best_bid: self.book.best_bid().unwrap_or(Fixed::ZERO),
                best_ask: self.book.best_ask().unwrap_or(Fixed::ZERO),
            });
        }
        #[cfg(debug_assertions)]
        self.check_invariants()?;

        Ok(self.seal(cmd.timestamp_ns, out))
    }

    /// Reconciles account tallies against the book.
    ///
    /// Cheap enough for tests and debug builds after every command; the
    /// release hot path relies on the always-on crossed-book check.
    ///
    /// # Errors
    /// Returns [`EngineFault::AccountingMismatch`] on the first
    /// discrepancy found.
    pub fn check_invariants(&self) -> Result<(), EngineFault> {
        for acct in self.accounts.iter() {
            if (acct.position == 0) != acct.avg_entry_price.is_zero() {
                return Err(EngineFault::AccountingMismatch {
                    details: format!(
                        "trader {}: position {} with avg entry {}",
                        acct.trader, acct.position, acct.avg_entry_price
                    ),
                });
            }
            for side in [crate::engine::order::Side::Buy, crate::engine::order::Side::Sell] {
                let book_qty = self.book.resting_qty_for(&acct.trader, side);
                if book_qty != acct.open_qty(side) {
                    return Err(EngineFault::AccountingMismatch {
                        details: format!(
                            "trader {}: open {side} tally {} but book holds {}",
                            acct.trader,
                            acct.open_qty(side),
                            book_qty
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Sequences a fatal fault as the engine's final event and sets the
    /// kill switch.
    pub fn fault_event(&mut self, timestamp_ns: u64, fault: &EngineFault) -> SequencedEvent {
        self.kill_switch = KillSwitch::Halted;
        let event = EngineEvent::EngineFault {
            invariant: fault.invariant_name().to_string(),
            details: fault.to_string(),
        };
        let mut sealed = self.seal(timestamp_ns, vec![event]);
        sealed.remove(0)
    }

    /// Fast-forwards the event counter past a journaled outbound event.
    ///
    /// Used only during replay: rejection events consume sequence numbers
    /// although their commands are never journaled, and this keeps the
    /// stream gap-free across a restart.
    pub fn note_outbound_seq(&mut self, sequence_num: u64) {
        if sequence_num >= self.next_event_seq {
            self.next_event_seq = sequence_num + 1;
        }
    }

    /// Stamps events with gap-free sequence numbers and the command's
    /// arrival timestamp.
    pub(crate) fn seal(
        &mut self,
        timestamp_ns: u64,
        events: Vec<EngineEvent>,
    ) -> Vec<SequencedEvent> {
        events
            .into_iter()
            .map(|event| {
                let sequence_num = self.next_event_seq;
                self.next_event_seq += 1;
                SequencedEvent {
                    sequence_num,
                    timestamp_ns,
                    event,
                }
            })
            .collect()
    }

    fn admin_authorized(&self, presented: Option<&str>) -> bool {
        match &self.config.admin_token {
            None => true,
            Some(expected) => presented == Some(expected.as_str()),
        }
    }
}
