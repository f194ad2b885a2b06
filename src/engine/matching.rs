//! The matching engine: fills, residuals, and cancel paths.
//!
//! An admitted incoming order walks the opposite ladder from the top of
//! the book, filling FIFO at each crossing level at the maker's price.
//! The walk re-scans from the best price after every fill, which keeps
//! each step a single short borrow of the book and makes the self-match
//! policies a property of the scan rather than of queue surgery.

use crate::engine::config::SelfMatchPolicy;
use crate::engine::error::EngineFault;
use crate::engine::event::{EngineEvent, RejectReason};
use crate::engine::order::{Order, OrderId, OrderKind, Side, TimeInForce, TradeId, TraderId};
use crate::engine::state::Engine;
use crate::fixed::Fixed;
use tracing::trace;
use uuid::Uuid;

/// What the counterparty scan found.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NextAction {
    /// Fill against this resting order at its price.
    Fill {
        maker_id: OrderId,
        maker_trader: TraderId,
        maker_leaves: u32,
        price: Fixed,
    },
    /// Self-match under `cancel_resting`: remove this maker first.
    CancelResting(OrderId),
    /// Self-match under `cancel_incoming`: drop the incoming residual.
    CancelIncoming,
    /// No crossing liquidity remains.
    Exhausted,
}

/// What a submit did to the book.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SubmitOutcome {
    /// Whether the book changed (fills, rests, policy cancels).
    pub mutated_book: bool,
    /// Total quantity executed for the incoming order.
    pub executed_qty: u32,
}

impl Engine {
    /// Runs an admitted order through matching and rests or discards the
    /// residual per its time-in-force.
    ///
    /// # Errors
    /// Arithmetic overflow in fill accounting is fatal.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn execute_submit(
        &mut self,
        trader: TraderId,
        side: Side,
        kind: OrderKind,
        qty: u32,
        price: Option<Fixed>,
        tif: TimeInForce,
        client_order_id: Uuid,
        arrival_seq: u64,
        out: &mut Vec<EngineEvent>,
    ) -> Result<SubmitOutcome, EngineFault> {
        // Fill-or-kill admissibility: fully fillable now, at acceptable
        // prices, from liquidity the trader does not own — or nothing
        // happens at all.
        if tif == TimeInForce::Fok {
            let fillable = self.book.fillable_qty(side, price, &trader);
            if fillable < u64::from(qty) {
                out.push(EngineEvent::OrderRejected {
                    reason: RejectReason::FillOrKillUnfillable,
                    details: None,
                    trader_id: Some(trader),
                    client_order_id: Some(client_order_id),
                });
                return Ok(SubmitOutcome::default());
            }
        }

        let order_id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        let mut order = Order {
            id: order_id,
            trader: trader.clone(),
            side,
            kind,
            tif,
            price,
            qty_original: qty,
            qty_leaves: qty,
            client_order_id,
            arrival_seq,
        };

        let mut fills: Vec<EngineEvent> = Vec::new();
        let mut outcome = SubmitOutcome::default();
        let mut incoming_cancelled = false;

        while order.qty_leaves > 0 {
            match self.next_counterparty(side, price, &trader) {
                NextAction::Exhausted => break,

                NextAction::CancelIncoming => {
                    fills.push(EngineEvent::OrderRejected {
                        reason: RejectReason::SelfMatchSkipped,
                        details: Some("residual dropped by self-match policy".to_string()),
                        trader_id: Some(trader.clone()),
                        client_order_id: Some(client_order_id),
                    });
                    incoming_cancelled = true;
                    break;
                }

                NextAction::CancelResting(maker_id) => {
                    if let Some(removed) = self.book.cancel(maker_id) {
                        self.accounts
                            .get_or_create(&removed.trader)
                            .adjust_open_qty(removed.side, -i64::from(removed.qty_leaves));
                        fills.push(EngineEvent::OrderCancelled {
                            order_id: removed.id,
                            trader_id: removed.trader,
                        });
                        outcome.mutated_book = true;
                    }
                }

                NextAction::Fill {
                    maker_id,
                    maker_trader,
                    maker_leaves,
                    price: fill_price,
                } => {
                    let fill_qty = order.qty_leaves.min(maker_leaves);
                    self.book.reduce(maker_id, fill_qty);
                    order.qty_leaves -= fill_qty;
                    self.last_trade_price = Some(fill_price);
                    outcome.mutated_book = true;
                    outcome.executed_qty += fill_qty;

                    let trade_id = TradeId(self.next_trade_id);
                    self.next_trade_id += 1;

                    let maker_side = side.opposite();
                    self.accounts
                        .get_or_create(&maker_trader)
                        .adjust_open_qty(maker_side, -i64::from(fill_qty));

                    let (buy_trader, sell_trader, buy_order, sell_order) = match side {
                        Side::Buy => (&trader, &maker_trader, order_id, maker_id),
                        Side::Sell => (&maker_trader, &trader, maker_id, order_id),
                    };
                    trace!(
                        %trade_id,
                        price = %fill_price,
                        qty = fill_qty,
                        buyer = %buy_trader,
                        seller = %sell_trader,
                        "trade"
                    );
                    fills.push(EngineEvent::Trade {
                        trade_id,
                        price: fill_price,
                        qty: fill_qty,
                        buy_trader_id: buy_trader.clone(),
                        sell_trader_id: sell_trader.clone(),
                        buy_order_id: buy_order,
                        sell_order_id: sell_order,
                    });

                    self.apply_leg(buy_trader.clone(), Side::Buy, fill_price, fill_qty)?;
                    self.apply_leg(sell_trader.clone(), Side::Sell, fill_price, fill_qty)?;

                    fills.push(self.position_event(buy_trader.clone())?);
                    fills.push(self.position_event(sell_trader.clone())?);
                }
            }
        }

        let traded = outcome.executed_qty > 0;

        // A market order that found nothing is a rejection, not an ack.
        if kind == OrderKind::Market && !traded && !incoming_cancelled {
            out.push(EngineEvent::OrderRejected {
                reason: RejectReason::NoLiquidity,
                details: None,
                trader_id: Some(trader),
                client_order_id: Some(client_order_id),
            });
            out.extend(fills);
            return Ok(outcome);
        }

        out.push(EngineEvent::OrderAccepted {
            order_id,
            trader_id: trader.clone(),
            client_order_id,
        });
        out.extend(fills);

        if order.qty_leaves > 0 && !incoming_cancelled {
            match (kind, tif) {
                (OrderKind::Limit, TimeInForce::Gtc) => {
                    self.accounts
                        .get_or_create(&trader)
                        .adjust_open_qty(side, i64::from(order.qty_leaves));
                    self.book.insert(order);
                    outcome.mutated_book = true;
                }
                // IOC and market residuals are discarded atomically; the
                // FOK pre-check makes a leftover impossible under
                // skip-resting, and other policies drop it the same way.
                (OrderKind::Limit, TimeInForce::Ioc | TimeInForce::Fok)
                | (OrderKind::Market, _) => {}
            }
        }

        Ok(outcome)
    }

    /// Cancel one resting order. Unknown ids and foreign owners get the
    /// same `unknown_order` answer; a second cancel of the same id is a
    /// rejection, never a second `order_cancelled`.
    pub(crate) fn execute_cancel(
        &mut self,
        trader: &TraderId,
        order_id: OrderId,
        out: &mut Vec<EngineEvent>,
    ) -> bool {
        let owned = self
            .book
            .owner_of(order_id)
            .is_some_and(|owner| owner == trader);
        if !owned {
            out.push(EngineEvent::CancelRejected {
                reason: RejectReason::UnknownOrder,
                trader_id: trader.clone(),
                order_id,
            });
            return false;
        }
        match self.book.cancel(order_id) {
            Some(removed) => {
                self.accounts
                    .get_or_create(&removed.trader)
                    .adjust_open_qty(removed.side, -i64::from(removed.qty_leaves));
                out.push(EngineEvent::OrderCancelled {
                    order_id: removed.id,
                    trader_id: removed.trader,
                });
                true
            }
            None => {
                out.push(EngineEvent::CancelRejected {
                    reason: RejectReason::UnknownOrder,
                    trader_id: trader.clone(),
                    order_id,
                });
                false
            }
        }
    }

    /// Cancel every resting order for a trader in a single pass; the
    /// transport injects this on disconnect.
    pub(crate) fn execute_cancel_all(
        &mut self,
        trader: &TraderId,
        out: &mut Vec<EngineEvent>,
    ) -> bool {
        let removed = self.book.cancel_all_for(trader);
        for order in &removed {
            self.accounts
                .get_or_create(&order.trader)
                .adjust_open_qty(order.side, -i64::from(order.qty_leaves));
            out.push(EngineEvent::OrderCancelled {
                order_id: order.id,
                trader_id: order.trader.clone(),
            });
        }
        !removed.is_empty()
    }

    /// Builds a `position_update` snapshot for a trader at the current
    /// mark.
    pub(crate) fn position_event(&self, trader: TraderId) -> Result<EngineEvent, EngineFault> {
        let Some(acct) = self.accounts.get(&trader) else {
            return Err(EngineFault::AccountingMismatch {
                details: format!("position update for unknown trader {trader}"),
            });
        };
        let mark = self.mark_price();
        let unrealized =
            acct.unrealized_pnl(mark)
                .ok_or_else(|| EngineFault::ArithmeticOverflow {
                    context: format!("unrealized pnl for {trader}"),
                })?;
        let equity = acct
            .total_equity(mark)
            .ok_or_else(|| EngineFault::ArithmeticOverflow {
                context: format!("equity for {trader}"),
            })?;
        Ok(EngineEvent::PositionUpdate {
            trader_id: trader,
            position: acct.position,
            cash: acct.cash,
            avg_entry_price: acct.avg_entry_price,
            realized_pnl: acct.realized_pnl,
            unrealized_pnl: unrealized,
            total_equity: equity,
            mark_price: mark,
        })
    }

    fn apply_leg(
        &mut self,
        trader: TraderId,
        leg: Side,
        price: Fixed,
        qty: u32,
    ) -> Result<(), EngineFault> {
        self.accounts
            .get_or_create(&trader)
            .apply_fill(leg, price, qty)
            .ok_or_else(|| EngineFault::ArithmeticOverflow {
                context: format!("fill accounting for {trader}"),
            })
    }

    /// Scans the opposite ladder from the top of the book for the next
    /// actionable resting order, applying the self-match policy along the
    /// way. Skipped same-trader orders keep their queue position.
    fn next_counterparty(
        &self,
        side: Side,
        limit: Option<Fixed>,
        trader: &TraderId,
    ) -> NextAction {
        let maker_side = side.opposite();
        let mut cursor = self.book.best_price(maker_side);
        while let Some(level_price) = cursor {
            let crosses = match (side, limit) {
                (_, None) => true,
                (Side::Buy, Some(lim)) => level_price <= lim,
                (Side::Sell, Some(lim)) => level_price >= lim,
            };
            if !crosses {
                return NextAction::Exhausted;
            }
            if let Some(level) = self.book.level(maker_side, level_price) {
                for resting in level.iter() {
                    if &resting.trader == trader {
                        match self.config.self_match_policy {
                            SelfMatchPolicy::SkipResting => continue,
                            SelfMatchPolicy::CancelResting => {
                                return NextAction::CancelResting(resting.id);
                            }
                            SelfMatchPolicy::CancelIncoming => return NextAction::CancelIncoming,
                        }
                    }
                    return NextAction::Fill {
                        maker_id: resting.id,
                        maker_trader: resting.trader.clone(),
                        maker_leaves: resting.qty_leaves,
                        price: level_price,
                    };
                }
            }
            cursor = self.book.next_price(maker_side, level_price);
        }
        NextAction::Exhausted
    }
}
