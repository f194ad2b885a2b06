//! Prelude module that re-exports the commonly used types.
//!
//! ```rust
//! use exchange_core::prelude::*;
//! ```

// Engine and its wire types
pub use crate::engine::{
    Admission, Command, Engine, EngineConfig, EngineEvent, EngineFault, KillSwitch,
    LiquidationReason, MarginMode, RejectReason, SelfMatchPolicy, SequencedCommand, SequencedEvent,
};

// Domain types
pub use crate::engine::{
    Accounts, BookLevel, Order, OrderBook, OrderId, OrderKind, PriceLevel, Side, TimeInForce,
    TradeId, TraderAccount, TraderId,
};

// Fixed-point arithmetic
pub use crate::fixed::{Fixed, Notional, SCALE};

// Journal and run loop
pub use crate::sequencer::{
    FileJournal, Journal, JournalEntry, JournalError, JournalRecord, ReplaySummary, Sequencer,
    SequencerError,
};
