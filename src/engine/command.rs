//! Inbound command protocol.
//!
//! One message per command, framed by the transport. Tagged serde enums
//! make the JSON wire shape (`{"type": "submit_order", ...}`) fall
//! directly out of the type definitions, and the same payload is what the
//! recovery journal persists for admitted commands.

use crate::engine::order::{OrderId, OrderKind, Side, TimeInForce, TraderId};
use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A command submitted to the engine for total-ordered execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Place a new order.
    SubmitOrder {
        trader_id: TraderId,
        side: Side,
        kind: OrderKind,
        qty: u32,
        /// Required for limit orders, absent for market orders.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        price: Option<Fixed>,
        #[serde(default)]
        tif: TimeInForce,
        /// Opaque client token echoed back on acknowledgements.
        client_order_id: Uuid,
    },

    /// Cancel a resting order owned by `trader_id`.
    CancelOrder {
        trader_id: TraderId,
        order_id: OrderId,
    },

    /// Cancel every resting order for `trader_id` in one pass.
    ///
    /// Injected by the transport on client disconnect, but valid as an
    /// ordinary client command too.
    CancelAll { trader_id: TraderId },

    /// Set the kill switch: all new orders are rejected until resume.
    AdminHalt {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<String>,
    },

    /// Clear the kill switch.
    AdminResume {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<String>,
    },
}

impl Command {
    /// The trader a rejection for this command should be addressed to,
    /// when one exists.
    #[must_use]
    pub fn trader_id(&self) -> Option<&TraderId> {
        match self {
            Command::SubmitOrder { trader_id, .. }
            | Command::CancelOrder { trader_id, .. }
            | Command::CancelAll { trader_id } => Some(trader_id),
            Command::AdminHalt { .. } | Command::AdminResume { .. } => None,
        }
    }
}

/// A command stamped by the sequencer at intake.
///
/// `arrival_seq` is the canonical total order of reality; `timestamp_ns`
/// is the only clock the engine ever sees. Both are journaled with the
/// command, which is what makes replay deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedCommand {
    /// Position in the canonical inbound order, monotonic and gap-free.
    pub arrival_seq: u64,
    /// Nanosecond wall-clock timestamp assigned at intake.
    pub timestamp_ns: u64,
    /// The command itself.
    pub command: Command,
}
