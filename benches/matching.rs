//! Criterion benchmarks for the matching hot path.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use exchange_core::prelude::*;
use uuid::Uuid;

struct Driver {
    engine: Engine,
    arrival_seq: u64,
}

impl Driver {
    fn new() -> Self {
        let config = EngineConfig {
            // Wide caps so the bench measures matching, not the gate.
            max_order_qty: 1_000_000,
            max_order_notional: i128::MAX,
            rate_limit_tokens_per_sec: u32::MAX,
            rate_limit_burst: u32::MAX,
            price_collar_pct: "1000".parse().unwrap(),
            ..EngineConfig::default()
        };
        Driver {
            engine: Engine::new(config).expect("valid config"),
            arrival_seq: 1,
        }
    }

    fn submit(&mut self, trader: &str, side: Side, kind: OrderKind, price: Option<i64>, qty: u32) {
        let stamped = SequencedCommand {
            arrival_seq: self.arrival_seq,
            timestamp_ns: self.arrival_seq,
            command: Command::SubmitOrder {
                trader_id: TraderId::new(trader),
                side,
                kind,
                qty,
                price: price.map(|p| Fixed::from_int(p).expect("price fits")),
                tif: TimeInForce::Gtc,
                client_order_id: Uuid::nil(),
            },
        };
        self.arrival_seq += 1;
        if let Admission::Admitted = self.engine.admit(&stamped).expect("no fault") {
            let _ = self.engine.execute(&stamped).expect("no fault");
        }
    }
}

/// A book with `levels` price levels per side, `per_level` orders each.
fn seeded(levels: i64, per_level: u32) -> Driver {
    let mut driver = Driver::new();
    for level in 0..levels {
        for _ in 0..per_level {
            driver.submit("maker-bid", Side::Buy, OrderKind::Limit, Some(99 - level), 10);
            driver.submit("maker-ask", Side::Sell, OrderKind::Limit, Some(101 + level), 10);
        }
    }
    driver
}

fn bench_passive_inserts(c: &mut Criterion) {
    c.bench_function("rest_1000_passive_limits", |b| {
        b.iter_batched(
            Driver::new,
            |mut driver| {
                for i in 0..1_000i64 {
                    let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                    let price = if i % 2 == 0 { 90 - (i % 40) } else { 110 + (i % 40) };
                    driver.submit("maker", side, OrderKind::Limit, Some(price), 10);
                }
                driver
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_aggressive_sweep(c: &mut Criterion) {
    c.bench_function("sweep_20_levels", |b| {
        b.iter_batched(
            || seeded(20, 5),
            |mut driver| {
                driver.submit("taker", Side::Buy, OrderKind::Market, None, 900);
                driver
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_mixed_flow(c: &mut Criterion) {
    c.bench_function("mixed_cross_and_rest", |b| {
        b.iter_batched(
            || seeded(10, 3),
            |mut driver| {
                for i in 0..100i64 {
                    match i % 3 {
                        0 => driver.submit("flow", Side::Buy, OrderKind::Limit, Some(101), 10),
                        1 => driver.submit("flow", Side::Sell, OrderKind::Limit, Some(99), 10),
                        _ => driver.submit("flow", Side::Buy, OrderKind::Limit, Some(95), 5),
                    }
                }
                driver
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_passive_inserts,
    bench_aggressive_sweep,
    bench_mixed_flow
);
criterion_main!(benches);
