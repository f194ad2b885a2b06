//! Order and identity types shared across the engine.

use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which side of the book an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Bid side.
    Buy,
    /// Ask side.
    Sell,
}

impl Side {
    /// The side an incoming order matches against.
    #[must_use]
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Whether an order carries a limit price or sweeps the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Executes at `price` or better; may rest.
    Limit,
    /// Executes against whatever liquidity exists; never rests.
    Market,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Limit => write!(f, "limit"),
            OrderKind::Market => write!(f, "market"),
        }
    }
}

/// Time-in-force policy for the residual of a partially matched order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    /// Good-till-cancel: the residual rests on the book.
    #[default]
    Gtc,
    /// Immediate-or-cancel: the residual is discarded.
    Ioc,
    /// Fill-or-kill: rejected outright unless fully fillable on arrival.
    Fok,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "gtc"),
            TimeInForce::Ioc => write!(f, "ioc"),
            TimeInForce::Fok => write!(f, "fok"),
        }
    }
}

/// Engine-assigned order identifier, monotonic within a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-assigned trade identifier, monotonic within a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque trader identity as presented by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraderId(String);

impl TraderId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        TraderId(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TraderId {
    fn from(s: &str) -> Self {
        TraderId(s.to_string())
    }
}

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live order.
///
/// Created at admission; `qty_leaves` is reduced only by the matching
/// engine. An order whose `qty_leaves` reaches zero is removed from the
/// book. Resting orders always carry a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Engine-assigned identifier.
    pub id: OrderId,
    /// Owner.
    pub trader: TraderId,
    pub side: Side,
    pub kind: OrderKind,
    pub tif: TimeInForce,
    /// Limit price; `None` only for market orders, which never rest.
    pub price: Option<Fixed>,
    /// Quantity at admission.
    pub qty_original: u32,
    /// Unfilled quantity.
    pub qty_leaves: u32,
    /// Client-supplied opaque identifier, echoed on acknowledgements.
    pub client_order_id: Uuid,
    /// Arrival sequence of the command that created this order.
    pub arrival_seq: u64,
}

impl Order {
    /// `true` once nothing is left to fill.
    #[must_use]
    #[inline]
    pub fn is_filled(&self) -> bool {
        self.qty_leaves == 0
    }

    /// The limit price of a resting order.
    ///
    /// # Panics
    /// Never for orders on the book: only priced orders rest.
    #[must_use]
    #[inline]
    pub(crate) fn resting_price(&self) -> Fixed {
        debug_assert!(self.price.is_some(), "resting order without a price");
        self.price.unwrap_or(Fixed::ZERO)
    }
}
