//! Maintenance scans and forced position closes.
//!
//! A liquidation is not a special execution path: it is a synthetic
//! market order on the closing side, gated like any other order except
//! for the initial-margin check, and routed through the same matching
//! code. What bounds it is the work discipline here: each trader is
//! visited at most once per scan, each visit makes at most
//! `liquidation_max_attempts` close attempts, and a zero-fill attempt
//! ends the visit.

use crate::engine::error::EngineFault;
use crate::engine::event::{EngineEvent, LiquidationReason};
use crate::engine::order::{OrderKind, Side, TimeInForce, TraderId};
use crate::engine::risk::Gate;
use crate::engine::state::{Engine, OrderSource};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

impl Engine {
    /// Post-trade maintenance scan.
    ///
    /// Any mutation can move the mark (fills move the last trade, rests
    /// and cancels move the mid), so the scan walks every account with an
    /// open position rather than only the traders the command touched.
    /// Traders pushed into breach by a liquidation fill are appended to
    /// the same worklist and handled within this scan.
    ///
    /// Returns whether the scan itself mutated the book.
    ///
    /// # Errors
    /// Arithmetic overflow in margin or fill accounting is fatal.
    pub(crate) fn maintenance_scan(
        &mut self,
        arrival_seq: u64,
        timestamp_ns: u64,
        out: &mut Vec<EngineEvent>,
    ) -> Result<bool, EngineFault> {
        if !self.config.margin_mode.maintenance_enabled() {
            return Ok(false);
        }

        let mut seen: HashSet<TraderId> = HashSet::new();
        let mut worklist: VecDeque<TraderId> = VecDeque::new();
        for trader in self.position_holders() {
            if seen.insert(trader.clone()) {
                worklist.push_back(trader);
            }
        }

        let mut mutated = false;
        while let Some(trader) = worklist.pop_front() {
            if !self.maintenance_breached(&trader)? {
                self.breach_ticks.remove(&trader);
                continue;
            }
            mutated |= self.liquidate(&trader, arrival_seq, timestamp_ns, out)?;

            // A close fill may have pushed a previously flat counterparty
            // into a position; pick up anyone not yet visited.
            for holder in self.position_holders() {
                if seen.insert(holder.clone()) {
                    worklist.push_back(holder);
                }
            }
        }
        Ok(mutated)
    }

    /// One liquidation visit for one breached trader.
    fn liquidate(
        &mut self,
        trader: &TraderId,
        arrival_seq: u64,
        timestamp_ns: u64,
        out: &mut Vec<EngineEvent>,
    ) -> Result<bool, EngineFault> {
        let max_attempts = self.config.liquidation_max_attempts;
        let mut executed_total: u64 = 0;
        let mut close_side = Side::Buy;
        let mut mutated = false;

        for _attempt in 0..max_attempts {
            let Some(acct) = self.accounts.get(trader) else {
                break;
            };
            if acct.position == 0 {
                break;
            }
            close_side = if acct.position > 0 {
                Side::Sell
            } else {
                Side::Buy
            };
            let close_qty = u32::try_from(acct.position.unsigned_abs()).unwrap_or(u32::MAX);
            debug!(%trader, side = %close_side, qty = close_qty, "liquidation close attempt");

            // Same gate as any order, minus the margin check the trader
            // already fails by definition.
            let gate = self.gate_submit(
                trader,
                close_side,
                OrderKind::Market,
                close_qty,
                None,
                OrderSource::Liquidation,
                timestamp_ns,
            )?;
            if let Gate::Reject { reason, details } = gate {
                warn!(%trader, %reason, "liquidation order refused at the gate");
                out.push(EngineEvent::OrderRejected {
                    reason,
                    details,
                    trader_id: Some(trader.clone()),
                    client_order_id: None,
                });
                break;
            }

            let outcome = self.execute_submit(
                trader.clone(),
                close_side,
                OrderKind::Market,
                close_qty,
                None,
                TimeInForce::Ioc,
                Uuid::nil(),
                arrival_seq,
                out,
            )?;
            mutated |= outcome.mutated_book;
            executed_total += u64::from(outcome.executed_qty);

            if outcome.executed_qty == 0 {
                // The book has nothing for us this tick; retrying now
                // cannot fill either.
                warn!(%trader, "liquidation found no liquidity");
                break;
            }
            if !self.maintenance_breached(trader)? {
                break;
            }
        }

        if executed_total > 0 {
            out.push(EngineEvent::Liquidation {
                trader_id: trader.clone(),
                reason: LiquidationReason::MaintenanceMarginBreach,
                qty: u32::try_from(executed_total).unwrap_or(u32::MAX),
                side: close_side,
            });
        }

        if self.maintenance_breached(trader)? {
            let ticks = self.breach_ticks.entry(trader.clone()).or_insert(0);
            *ticks += 1;
            if *ticks >= max_attempts {
                self.breach_ticks.remove(trader);
                if let Some(acct) = self.accounts.get_mut(trader) {
                    acct.frozen = true;
                    let side = if acct.position > 0 {
                        Side::Sell
                    } else {
                        Side::Buy
                    };
                    let qty = u32::try_from(acct.position.unsigned_abs()).unwrap_or(u32::MAX);
                    warn!(%trader, "liquidity exhausted; account frozen");
                    out.push(EngineEvent::Liquidation {
                        trader_id: trader.clone(),
                        reason: LiquidationReason::LiquidityExhausted,
                        qty,
                        side,
                    });
                }
            }
        } else {
            self.breach_ticks.remove(trader);
        }

        Ok(mutated)
    }

    /// Traders with open positions, in a deterministic order.
    ///
    /// Frozen accounts are excluded: the freeze is terminal for the
    /// session, so the scan must not re-enqueue them and re-announce
    /// `liquidity_exhausted` on every later command.
    fn position_holders(&self) -> Vec<TraderId> {
        let mut holders: Vec<TraderId> = self
            .accounts
            .iter()
            .filter(|a| a.position != 0 && !a.frozen)
            .map(|a| a.trader.clone())
            .collect();
        holders.sort();
        holders
    }
}
