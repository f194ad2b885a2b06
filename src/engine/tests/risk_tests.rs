//! The pre-trade gate, check by check.

use super::helpers::{fx, reject_reason, Sim};
use crate::engine::{
    Command, EngineConfig, EngineEvent, MarginMode, OrderKind, RejectReason, Side, TimeInForce,
    TraderId,
};
use uuid::Uuid;

fn submit_raw(
    sim: &mut Sim,
    trader: &str,
    kind: OrderKind,
    qty: u32,
    price: Option<&str>,
) -> Option<RejectReason> {
    let events = sim.command(Command::SubmitOrder {
        trader_id: TraderId::new(trader),
        side: Side::Buy,
        kind,
        qty,
        price: price.map(fx),
        tif: TimeInForce::Gtc,
        client_order_id: Uuid::new_v4(),
    });
    reject_reason(&events)
}

#[test]
fn test_zero_qty_is_invalid() {
    let mut sim = Sim::new();
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 0, Some("100.00")),
        Some(RejectReason::InvalidMessage)
    );
}

#[test]
fn test_limit_requires_price_and_market_forbids_it() {
    let mut sim = Sim::new();
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 1, None),
        Some(RejectReason::InvalidMessage)
    );
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Market, 1, Some("100.00")),
        Some(RejectReason::InvalidMessage)
    );
}

#[test]
fn test_price_must_be_tick_multiple() {
    let mut sim = Sim::with_config(EngineConfig {
        tick_size: fx("0.5"),
        ..EngineConfig::default()
    });
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("100.30")),
        Some(RejectReason::InvalidMessage)
    );
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("100.50")),
        None
    );
}

#[test]
fn test_price_collar_against_last_trade() {
    let mut sim = Sim::new();
    // Establish a last trade at 100.
    sim.limit("M", Side::Sell, "100.00", 1);
    sim.limit("N", Side::Buy, "100.00", 1);

    // 5% collar: 106 is out, 105 is the boundary and passes.
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("106.00")),
        Some(RejectReason::InvalidPriceReference)
    );
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("105.00")),
        None
    );
}

#[test]
fn test_no_collar_before_first_trade() {
    let mut sim = Sim::new();
    // Any (notional-capped) price is acceptable while no trade exists.
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("9000.00")),
        None
    );
}

#[test]
fn test_fat_finger_size_cap() {
    let mut sim = Sim::new();
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 10_001, Some("1.00")),
        Some(RejectReason::OrderSizeCap)
    );
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 10_000, Some("1.00")),
        None
    );
}

#[test]
fn test_notional_cap_for_limit_orders() {
    let mut sim = Sim::with_config(EngineConfig {
        max_order_notional: fx("1000.00").raw() as i128,
        ..EngineConfig::default()
    });
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 11, Some("100.00")),
        Some(RejectReason::NotionalCap)
    );
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 10, Some("100.00")),
        None
    );
}

#[test]
fn test_rate_limit_consumes_one_token_per_order() {
    let mut sim = Sim::with_config(EngineConfig {
        rate_limit_tokens_per_sec: 1,
        rate_limit_burst: 2,
        ..EngineConfig::default()
    });
    assert_eq!(submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("10.00")), None);
    assert_eq!(submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("10.00")), None);
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("10.00")),
        Some(RejectReason::RateLimited)
    );
    // Other traders have their own bucket.
    assert_eq!(submit_raw(&mut sim, "B", OrderKind::Limit, 1, Some("10.00")), None);

    // A second of simulated time refills one token.
    sim.tick(1_000_000_000);
    assert_eq!(submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("10.00")), None);
}

#[test]
fn test_initial_margin_rejects_oversized_exposure() {
    let mut sim = Sim::with_config(EngineConfig {
        margin_mode: MarginMode::InitialOnly,
        starting_capital: fx("100.00"),
        initial_margin_pct: fx("0.10"),
        ..EngineConfig::default()
    });

    // 20 @ 100 projects 2000 of exposure; 10% of that is 200 > 100 equity.
    let events = sim.command(Command::SubmitOrder {
        trader_id: TraderId::new("A"),
        side: Side::Buy,
        kind: OrderKind::Limit,
        qty: 20,
        price: Some(fx("100.00")),
        tif: TimeInForce::Gtc,
        client_order_id: Uuid::new_v4(),
    });
    let (reason, details) = events
        .iter()
        .find_map(|e| match &e.event {
            EngineEvent::OrderRejected {
                reason, details, ..
            } => Some((*reason, details.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(reason, RejectReason::InitialMarginInsufficient);
    let details = details.unwrap();
    assert!(details.contains("equity 100"), "details: {details}");
    assert!(details.contains("required_margin 200"), "details: {details}");

    // 10 @ 100 requires exactly the full equity and passes.
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 10, Some("100.00")),
        None
    );
}

#[test]
fn test_initial_margin_counts_open_orders() {
    let mut sim = Sim::with_config(EngineConfig {
        margin_mode: MarginMode::InitialOnly,
        starting_capital: fx("100.00"),
        initial_margin_pct: fx("0.10"),
        ..EngineConfig::default()
    });

    // First 5 @ 100 rests (margin 50 <= 100).
    assert_eq!(submit_raw(&mut sim, "A", OrderKind::Limit, 5, Some("100.00")), None);
    // Another 6 @ 100 projects 11 * 100 * 10% = 110 > 100.
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 6, Some("100.00")),
        Some(RejectReason::InitialMarginInsufficient)
    );
}

#[test]
fn test_margin_disabled_skips_the_check() {
    let mut sim = Sim::with_config(EngineConfig {
        margin_mode: MarginMode::Disabled,
        starting_capital: fx("1.00"),
        ..EngineConfig::default()
    });
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 10_000, Some("100.00")),
        None
    );
}

#[test]
fn test_admin_commands_require_the_configured_token() {
    let mut sim = Sim::with_config(EngineConfig {
        admin_token: Some("sesame".to_string()),
        ..EngineConfig::default()
    });

    let events = sim.command(Command::AdminHalt { auth: None });
    assert_eq!(reject_reason(&events), Some(RejectReason::InvalidMessage));
    let events = sim.command(Command::AdminHalt {
        auth: Some("wrong".to_string()),
    });
    assert_eq!(reject_reason(&events), Some(RejectReason::InvalidMessage));

    sim.command(Command::AdminHalt {
        auth: Some("sesame".to_string()),
    });
    assert_eq!(
        submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("10.00")),
        Some(RejectReason::ExchangeHalted)
    );
}

#[test]
fn test_gate_rejection_leaves_state_untouched() {
    let mut sim = Sim::new();
    sim.limit("M", Side::Sell, "100.00", 1);
    sim.limit("N", Side::Buy, "100.00", 1);
    let before_orders = sim.engine.book().order_count();

    submit_raw(&mut sim, "A", OrderKind::Limit, 1, Some("200.00"));
    assert_eq!(sim.engine.book().order_count(), before_orders);
    assert!(sim.engine.accounts().get(&TraderId::new("A")).is_none());
}

#[test]
fn test_rejected_order_still_consumes_sequence_numbers() {
    let mut sim = Sim::new();
    let ok = sim.limit("A", Side::Buy, "10.00", 1);
    let last_seq = ok.last().unwrap().sequence_num;

    let rejected = submit_events(&mut sim);
    assert_eq!(rejected[0].sequence_num, last_seq + 1);

    fn submit_events(sim: &mut Sim) -> Vec<crate::engine::SequencedEvent> {
        sim.command(Command::SubmitOrder {
            trader_id: TraderId::new("A"),
            side: Side::Buy,
            kind: OrderKind::Limit,
            qty: 0,
            price: Some(fx("10.00")),
            tif: TimeInForce::Gtc,
            client_order_id: Uuid::new_v4(),
        })
    }
}
