//! Outbound event protocol.
//!
//! Every mutation the engine performs is observable only through this
//! closed event set. Events are emitted into a per-command buffer, stamped
//! with a gap-free `sequence_num` and the arrival timestamp of the command
//! being processed, then journaled and handed to subscribers in order.

use crate::engine::order::{OrderId, Side, TradeId, TraderId};
use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Closed set of rejection reason codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Malformed or unauthorized message.
    InvalidMessage,
    /// The kill switch is set.
    ExchangeHalted,
    /// Limit price outside the collar around the last trade.
    InvalidPriceReference,
    /// Quantity above the fat-finger cap.
    OrderSizeCap,
    /// Limit notional above the per-trader cap.
    NotionalCap,
    /// Token bucket empty.
    RateLimited,
    /// Projected exposure exceeds available equity.
    InitialMarginInsufficient,
    /// Market order arrived at an empty opposite book.
    NoLiquidity,
    /// Fill-or-kill order not fully fillable at acceptable prices.
    FillOrKillUnfillable,
    /// Cancel referenced an unknown or foreign order.
    UnknownOrder,
    /// The account was frozen after an exhausted liquidation.
    AccountFrozen,
    /// Informational: residual quantity dropped by the self-match policy.
    /// Not a terminal rejection; fills before the skip stand.
    SelfMatchSkipped,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::InvalidMessage => "invalid_message",
            RejectReason::ExchangeHalted => "exchange_halted",
            RejectReason::InvalidPriceReference => "invalid_price_reference",
            RejectReason::OrderSizeCap => "order_size_cap",
            RejectReason::NotionalCap => "notional_cap",
            RejectReason::RateLimited => "rate_limited",
            RejectReason::InitialMarginInsufficient => "initial_margin_insufficient",
            RejectReason::NoLiquidity => "no_liquidity",
            RejectReason::FillOrKillUnfillable => "fill_or_kill_unfillable",
            RejectReason::UnknownOrder => "unknown_order",
            RejectReason::AccountFrozen => "account_frozen",
            RejectReason::SelfMatchSkipped => "self_match_skipped",
        };
        f.write_str(s)
    }
}

/// Why a liquidation event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidationReason {
    /// Equity fell below the maintenance requirement; a close was executed.
    MaintenanceMarginBreach,
    /// Repeated close attempts found no liquidity; the account is frozen.
    LiquidityExhausted,
}

impl fmt::Display for LiquidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquidationReason::MaintenanceMarginBreach => write!(f, "maintenance_margin_breach"),
            LiquidationReason::LiquidityExhausted => write!(f, "liquidity_exhausted"),
        }
    }
}

/// One aggregated price level in a `book_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Fixed,
    /// Total resting quantity at this price.
    pub qty: u64,
}

/// An event emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The order passed admission and entered the matching path.
    OrderAccepted {
        order_id: OrderId,
        trader_id: TraderId,
        client_order_id: Uuid,
    },

    /// The order was refused; engine state is unchanged by it.
    OrderRejected {
        reason: RejectReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trader_id: Option<TraderId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_order_id: Option<Uuid>,
    },

    /// A resting order left the book without fully filling.
    OrderCancelled {
        order_id: OrderId,
        trader_id: TraderId,
    },

    /// A cancel request was refused.
    CancelRejected {
        reason: RejectReason,
        trader_id: TraderId,
        order_id: OrderId,
    },

    /// A fill between two orders. Immutable once emitted.
    Trade {
        trade_id: TradeId,
        price: Fixed,
        qty: u32,
        buy_trader_id: TraderId,
        sell_trader_id: TraderId,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
    },

    /// Coalesced top-of-book snapshot after a mutating command.
    BookUpdate {
        best_bid: Option<Fixed>,
        best_ask: Option<Fixed>,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    },

    /// Account snapshot for a trader touched by a fill or liquidation.
    PositionUpdate {
        trader_id: TraderId,
        position: i64,
        cash: Fixed,
        avg_entry_price: Fixed,
        realized_pnl: Fixed,
        unrealized_pnl: Fixed,
        total_equity: Fixed,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mark_price: Option<Fixed>,
    },

    /// A forced close was executed (or abandoned) for a breached account.
    Liquidation {
        trader_id: TraderId,
        reason: LiquidationReason,
        qty: u32,
        side: Side,
    },

    /// A fatal invariant violation. Terminal: the kill switch is set and
    /// the process is expected to exit after journaling this event.
    EngineFault { invariant: String, details: String },
}

/// An event stamped with its place in the outbound stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// Strictly increasing, gap-free sequence number.
    pub sequence_num: u64,
    /// Arrival timestamp of the command that caused this event.
    pub timestamp_ns: u64,
    /// The event payload.
    pub event: EngineEvent,
}
