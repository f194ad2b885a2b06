//! Shared harness for integration tests: stamps commands the way the
//! sequencer does and fingerprints engine state for replay comparison.
#![allow(dead_code)]

use exchange_core::prelude::*;
use uuid::Uuid;

/// Drives one engine through admit + execute with deterministic stamps.
pub struct Harness {
    pub engine: Engine,
    arrival_seq: u64,
    now_ns: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Harness {
            engine: Engine::new(config).expect("valid config"),
            arrival_seq: 1,
            now_ns: 1_000,
        }
    }

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
}

/// Deterministic client order ids for reproducible streams.
pub fn client_id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn submit_limit(trader: &str, side: Side, price: &str, qty: u32, id: u128) -> Command {
    Command::SubmitOrder {
        trader_id: TraderId::new(trader),
        side,
        kind: OrderKind::Limit,
        qty,
        price: Some(price.parse().expect("price literal")),
        tif: TimeInForce::Gtc,
        client_order_id: client_id(id),
    }
}

pub fn submit_market(trader: &str, side: Side, qty: u32, id: u128) -> Command {
    Command::SubmitOrder {
        trader_id: TraderId::new(trader),
        side,
        kind: OrderKind::Market,
        qty,
        price: None,
        tif: TimeInForce::Ioc,
        client_order_id: client_id(id),
    }
}

/// A stable, order-independent rendering of everything the replay
/// property promises to restore: book, accounts, counters, kill switch.
pub fn fingerprint(engine: &Engine) -> String {
    let orders: Vec<String> = engine
        .book()
        .iter_orders()
        .map(|o| serde_json::to_string(o).expect("order serializes"))
        .collect();

    let mut accounts: Vec<String> = engine
        .accounts()
        .iter()
        .map(|a| serde_json::to_string(a).expect("account serializes"))
        .collect();
    accounts.sort();

    format!(
        "orders={orders:?} accounts={accounts:?} last_trade={:?} \
         next_order={} next_trade={} next_event={} halted={:?}",
        engine.last_trade_price().map(|p| p.raw()),
        engine.next_order_id(),
        engine.next_trade_id(),
        engine.next_event_seq(),
        engine.kill_switch(),
    )
}
