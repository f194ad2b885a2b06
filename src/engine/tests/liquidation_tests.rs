//! Maintenance breaches, forced closes, and account freezing.
//!
//! Cash moves by full notional on every leg, so the numbers here are
//! chosen so that only the short trader `T` ever breaches: with capital
//! 2000 and `T` short 10 @ 100, a long counterparty's equity is `10 × mark`
//! (always above a 10% requirement) while `T`'s is `4000 − 10 × mark`,
//! which breaches once the mark passes ~364.

use super::helpers::{fx, reject_reason, trades, Sim};
use crate::engine::{
    EngineConfig, EngineEvent, LiquidationReason, MarginMode, RejectReason, SequencedEvent, Side,
    TraderId,
};

fn margin_config() -> EngineConfig {
    EngineConfig {
        margin_mode: MarginMode::InitialAndMaintenance,
        starting_capital: fx("2000.00"),
        initial_margin_pct: fx("0.10"),
        maintenance_margin_pct: fx("0.10"),
        // Wide collar so a single trade can move the mark into breach
        // territory.
        price_collar_pct: fx("10.00"),
        liquidation_max_attempts: 3,
        ..EngineConfig::default()
    }
}

fn liquidations(events: &[SequencedEvent]) -> Vec<(String, LiquidationReason, u32, Side)> {
    events
        .iter()
        .filter_map(|e| match &e.event {
            EngineEvent::Liquidation {
                trader_id,
                reason,
                qty,
                side,
            } => Some((trader_id.to_string(), *reason, *qty, *side)),
            _ => None,
        })
        .collect()
}

/// Puts T short 10 @ 100 against B, leaving the book empty.
fn open_short(sim: &mut Sim) {
    sim.limit("B", Side::Buy, "100.00", 10);
    let events = sim.limit("T", Side::Sell, "100.00", 10);
    assert_eq!(trades(&events).len(), 1);
    assert_eq!(
        sim.engine.accounts().get(&TraderId::new("T")).unwrap().position,
        -10
    );
}

/// One trade at `price` between fresh traders C and D, moving the last
/// trade (and with it the one-sided-book mark).
fn move_mark(sim: &mut Sim, price: &str) -> Vec<SequencedEvent> {
    sim.limit("C", Side::Sell, price, 1);
    sim.limit("D", Side::Buy, price, 1)
}

#[test]
fn test_breach_triggers_forced_close_through_matching() {
    let mut sim = Sim::with_config(margin_config());
    open_short(&mut sim);

    // Resting liquidity the forced close will consume.
    sim.limit("E", Side::Sell, "380.00", 10);

    // The mark-moving trade: equity of T drops to 4000 - 3790 = 210,
    // below the 379 maintenance requirement.
    let events = move_mark(&mut sim, "379.00");

    // D's own fill first, then T's forced close against E.
    let fills = trades(&events);
    assert_eq!(fills.len(), 2);
    assert_eq!(fills[0], (fx("379.00"), 1, "D".to_string(), "C".to_string()));
    assert_eq!(fills[1], (fx("380.00"), 10, "T".to_string(), "E".to_string()));

    assert_eq!(
        liquidations(&events),
        vec![(
            "T".to_string(),
            LiquidationReason::MaintenanceMarginBreach,
            10,
            Side::Buy
        )]
    );

    let t = sim.engine.accounts().get(&TraderId::new("T")).unwrap();
    assert_eq!(t.position, 0);
    assert_eq!(t.realized_pnl, fx("-2800.00"));
    assert!(!t.frozen);
    sim.engine.check_invariants().unwrap();
}

#[test]
fn test_underfilled_liquidation_leaves_position_open() {
    let mut sim = Sim::with_config(margin_config());
    open_short(&mut sim);

    // Only 4 units of ask liquidity above the breach point.
    sim.limit("E", Side::Sell, "380.00", 4);
    let events = move_mark(&mut sim, "379.00");

    // The close consumed what existed and reported it.
    let liqs = liquidations(&events);
    assert_eq!(liqs.len(), 1);
    assert_eq!(liqs[0].1, LiquidationReason::MaintenanceMarginBreach);
    assert_eq!(liqs[0].2, 4);

    let t = sim.engine.accounts().get(&TraderId::new("T")).unwrap();
    assert_eq!(t.position, -6);
    assert!(!t.frozen);
}

#[test]
fn test_exhausted_liquidity_freezes_the_account() {
    let mut sim = Sim::with_config(margin_config());
    open_short(&mut sim);

    // Breach T with a trade at 379, leaving no ask liquidity at all.
    let first = move_mark(&mut sim, "379.00");
    // Scan 1: nothing to close into, no liquidation to report yet.
    assert!(liquidations(&first).is_empty());

    // Two more mutating commands, two more failed scans. Bids do not
    // help a forced *buy*.
    sim.limit("G", Side::Buy, "100.00", 1);
    let third = sim.limit("G", Side::Buy, "99.00", 1);

    assert_eq!(
        liquidations(&third),
        vec![(
            "T".to_string(),
            LiquidationReason::LiquidityExhausted,
            10,
            Side::Buy
        )]
    );
    let t = sim.engine.accounts().get(&TraderId::new("T")).unwrap();
    assert!(t.frozen);
    assert_eq!(t.position, -10);

    // Frozen accounts get rejected at the gate.
    let events = sim.limit("T", Side::Buy, "100.00", 1);
    assert_eq!(reject_reason(&events), Some(RejectReason::AccountFrozen));

    // The freeze is terminal: further mutating commands neither retry
    // the close nor announce liquidity_exhausted again.
    let later = sim.limit("G", Side::Buy, "98.00", 1);
    assert!(liquidations(&later).is_empty());
    let again = sim.cancel_all("G");
    assert!(liquidations(&again).is_empty());
    let t = sim.engine.accounts().get(&TraderId::new("T")).unwrap();
    assert!(t.frozen);
    assert_eq!(t.position, -10);
}

#[test]
fn test_breach_clears_when_liquidity_returns() {
    let mut sim = Sim::with_config(margin_config());
    open_short(&mut sim);

    // One failed scan with no liquidity.
    move_mark(&mut sim, "379.00");

    // Liquidity returns before the freeze threshold; the scan on this
    // very command closes T out.
    let events = sim.limit("E", Side::Sell, "380.00", 10);
    let liqs = liquidations(&events);
    assert_eq!(liqs.len(), 1);
    assert_eq!(liqs[0].1, LiquidationReason::MaintenanceMarginBreach);

    let t = sim.engine.accounts().get(&TraderId::new("T")).unwrap();
    assert_eq!(t.position, 0);
    assert!(!t.frozen);
}

#[test]
fn test_no_scan_when_maintenance_disabled() {
    let mut sim = Sim::with_config(EngineConfig {
        margin_mode: MarginMode::InitialOnly,
        ..margin_config()
    });
    open_short(&mut sim);

    let events = move_mark(&mut sim, "379.00");
    assert!(liquidations(&events).is_empty());
    assert_eq!(
        sim.engine.accounts().get(&TraderId::new("T")).unwrap().position,
        -10
    );
}

#[test]
fn test_healthy_accounts_are_not_liquidated() {
    let mut sim = Sim::with_config(margin_config());
    open_short(&mut sim);

    // A small uptick: T loses a little but stays above maintenance
    // (equity 2950 against a 105 requirement).
    let events = move_mark(&mut sim, "105.00");

    assert!(liquidations(&events).is_empty());
    assert_eq!(
        sim.engine.accounts().get(&TraderId::new("T")).unwrap().position,
        -10
    );
}
