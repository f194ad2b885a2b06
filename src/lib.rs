//! # Deterministic Exchange Core
//!
//! A matching and accounting engine for a local exchange: orders in,
//! sequenced events out, nothing else. The crate is the single source of
//! truth for every downstream consumer — gateways, relays, dashboards,
//! and audit sinks all reconstruct their view from the event stream this
//! engine emits.
//!
//! ## What it does
//!
//! - **Matching**: strict price-time priority over a limit order book.
//!   FIFO within a price level, maker-price execution, GTC/IOC/FOK
//!   time-in-force, market orders, and a configurable self-match policy.
//! - **Accounting**: both legs of every fill applied with exact
//!   fixed-point arithmetic (`i64` scaled by 10^8, `i128` notionals, no
//!   floating point anywhere in the pipeline). Weighted-average entries,
//!   realized PnL on reduction, derived unrealized PnL and equity.
//! - **Risk**: an ordered pre-trade gate (kill switch, validation, price
//!   collar, size and notional caps, token-bucket rate limiting, initial
//!   margin) that runs before any state mutates, plus post-trade
//!   maintenance scans.
//! - **Liquidation**: breached accounts are closed by synthetic market
//!   orders that route through the same matching path, with bounded
//!   attempts and an account-freeze once liquidity is exhausted.
//! - **Sequencing and recovery**: every event carries a gap-free
//!   sequence number; admitted commands and emitted events are journaled
//!   to an append-only, CRC32-framed log that replays to a bit-identical
//!   state.
//!
//! ## Design
//!
//! The engine is a value owned by exactly one run loop
//! ([`Sequencer`](sequencer::Sequencer)). Ingress and egress are bounded
//! channels; there is no shared mutable state and no locking in the
//! matching path. A command is processed to completion before the next
//! is pulled, which makes the inbound order the canonical serialization
//! of reality — and replay trivially deterministic, because the engine's
//! only clock is the timestamp stamped on each command at intake.
//!
//! ## Example
//!
//! ```rust
//! use exchange_core::prelude::*;
//! use uuid::Uuid;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = Engine::new(EngineConfig::default())?;
//!
//! let submit = SequencedCommand {
//!     arrival_seq: 1,
//!     timestamp_ns: 0,
//!     command: Command::SubmitOrder {
//!         trader_id: TraderId::new("alice"),
//!         side: Side::Buy,
//!         kind: OrderKind::Limit,
//!         qty: 5,
//!         price: Some("100.00".parse()?),
//!         tif: TimeInForce::Gtc,
//!         client_order_id: Uuid::new_v4(),
//!     },
//! };
//! assert_eq!(engine.admit(&submit)?, Admission::Admitted);
//! let events = engine.execute(&submit)?;
//! assert!(matches!(events[0].event, EngineEvent::OrderAccepted { .. }));
//! # Ok(())
//! # }
//! ```
//!
//! ## Out of scope
//!
//! Network transport, strategy processes, dashboards, CSV audit sinks,
//! and session orchestration are external collaborators: they speak to
//! the core only through the command and event types defined here.

pub mod engine;
pub mod fixed;
pub mod prelude;
pub mod sequencer;
mod utils;

pub use engine::{
    Admission, BookLevel, Command, ConfigError, Engine, EngineConfig, EngineEvent, EngineFault,
    KillSwitch, LiquidationReason, MarginMode, Order, OrderBook, OrderId, OrderKind, PriceLevel,
    RejectReason, SelfMatchPolicy, SequencedCommand, SequencedEvent, Side, TimeInForce, TradeId,
    TraderId,
};
pub use fixed::{Fixed, Notional, SCALE};
pub use sequencer::{
    FileJournal, Journal, JournalEntry, JournalError, JournalRecord, ReplaySummary, Sequencer,
    SequencerError,
};
pub use utils::current_time_nanos;
