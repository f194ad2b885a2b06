//! Shared harness for scenario tests: stamps commands the way the
//! sequencer does and runs them through admit + execute.

use crate::engine::{
    Admission, Command, Engine, EngineConfig, EngineEvent, OrderId, OrderKind, RejectReason,
    SequencedCommand, SequencedEvent, Side, TimeInForce, TraderId,
};
use crate::fixed::Fixed;
use uuid::Uuid;

pub fn fx(s: &str) -> Fixed {
    s.parse().expect("valid price literal")
}

/// A deterministic stand-in for the sequencer: monotonically stamped
/// commands against one engine.
pub struct Sim {
    pub engine: Engine,
    arrival_seq: u64,
    now_ns: u64,
}

impl Sim {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Sim {
            engine: Engine::new(config).expect("valid config"),
            arrival_seq: 1,
            now_ns: 1_000,
        }
    }

    /// Advances the simulated intake clock.
    pub fn tick(&mut self, ns: u64) {
        self.now_ns += ns;
    }

    /// Stamps and fully processes one command, returning all events.
    pub fn command(&mut self, command: Command) -> Vec<SequencedEvent> {
        let stamped = SequencedCommand {
            arrival_seq: self.arrival_seq,
            timestamp_ns: self.now_ns,
            command,
        };
        self.arrival_seq += 1;
        self.now_ns += 1;
        match self.engine.admit(&stamped).expect("no fault at admission") {
            Admission::Admitted => self.engine.execute(&stamped).expect("no fault in execution"),
            Admission::Rejected(events) => events,
        }
    }

    pub fn limit(
        &mut self,
        trader: &str,
        side: Side,
        price: &str,
        qty: u32,
    ) -> Vec<SequencedEvent> {
        self.limit_tif(trader, side, price, qty, TimeInForce::Gtc)
    }

    pub fn limit_tif(
        &mut self,
        trader: &str,
        side: Side,
        price: &str,
        qty: u32,
        tif: TimeInForce,
    ) -> Vec<SequencedEvent> {
        self.command(Command::SubmitOrder {
            trader_id: TraderId::new(trader),
            side,
            kind: OrderKind::Limit,
            qty,
            price: Some(fx(price)),
            tif,
            client_order_id: Uuid::new_v4(),
        })
    }

    pub fn market(&mut self, trader: &str, side: Side, qty: u32) -> Vec<SequencedEvent> {
        self.command(Command::SubmitOrder {
            trader_id: TraderId::new(trader),
            side,
            kind: OrderKind::Market,
            qty,
            price: None,
            tif: TimeInForce::Ioc,
            client_order_id: Uuid::new_v4(),
        })
    }

    pub fn cancel(&mut self, trader: &str, order_id: OrderId) -> Vec<SequencedEvent> {
        self.command(Command::CancelOrder {
            trader_id: TraderId::new(trader),
            order_id,
        })
    }

    pub fn cancel_all(&mut self, trader: &str) -> Vec<SequencedEvent> {
        self.command(Command::CancelAll {
            trader_id: TraderId::new(trader),
        })
    }
}

/// Trades in the event batch as `(price, qty, buyer, seller)`.
pub fn trades(events: &[SequencedEvent]) -> Vec<(Fixed, u32, String, String)> {
    events
        .iter()
        .filter_map(|e| match &e.event {
            EngineEvent::Trade {
                price,
                qty,
                buy_trader_id,
                sell_trader_id,
                ..
            } => Some((
                *price,
                *qty,
                buy_trader_id.to_string(),
                sell_trader_id.to_string(),
            )),
            _ => None,
        })
        .collect()
}

/// The order id from the batch's `order_accepted`, if any.
pub fn accepted_id(events: &[SequencedEvent]) -> Option<OrderId> {
    events.iter().find_map(|e| match &e.event {
        EngineEvent::OrderAccepted { order_id, .. } => Some(*order_id),
        _ => None,
    })
}

/// The first rejection reason in the batch, if any.
pub fn reject_reason(events: &[SequencedEvent]) -> Option<RejectReason> {
    events.iter().find_map(|e| match &e.event {
        EngineEvent::OrderRejected { reason, .. } => Some(*reason),
        _ => None,
    })
}

/// Order ids cancelled in the batch.
pub fn cancelled_ids(events: &[SequencedEvent]) -> Vec<OrderId> {
    events
        .iter()
        .filter_map(|e| match &e.event {
            EngineEvent::OrderCancelled { order_id, .. } => Some(*order_id),
            _ => None,
        })
        .collect()
}
