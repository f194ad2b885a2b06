//! The limit order book: two price-indexed ladders of FIFO levels.
//!
//! Best-price access is O(log P) through the ladder maps; cancels are
//! amortized O(queue length) through a secondary index mapping each order
//! id to its side and price. The book is owned by exactly one engine and
//! is never shared across threads; observers see copies via events.

use crate::engine::event::BookLevel;
use crate::engine::level::PriceLevel;
use crate::engine::order::{Order, OrderId, Side, TraderId};
use crate::fixed::Fixed;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

/// Price-time order book.
#[derive(Debug, Default, Clone)]
pub struct OrderBook {
    /// Buy ladder; the best bid is the greatest key.
    bids: BTreeMap<Fixed, PriceLevel>,
    /// Sell ladder; the best ask is the smallest key.
    asks: BTreeMap<Fixed, PriceLevel>,
    /// Order id → (side, price) for O(log P) cancels.
    locations: HashMap<OrderId, (Side, Fixed)>,
    /// Trader → resting order ids, ordered by admission for deterministic
    /// mass cancellation.
    by_trader: HashMap<TraderId, BTreeSet<OrderId>>,
}

impl OrderBook {
    #[must_use]
    pub fn new() -> Self {
        OrderBook::default()
    }

    fn ladder(&self, side: Side) -> &BTreeMap<Fixed, PriceLevel> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn ladder_mut(&mut self, side: Side) -> &mut BTreeMap<Fixed, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Rests an order at the tail of its price level, creating the level
    /// if absent.
    pub fn insert(&mut self, order: Order) {
        let price = order.resting_price();
        let side = order.side;
        trace!(order_id = %order.id, %side, %price, qty = order.qty_leaves, "resting order");
        self.locations.insert(order.id, (side, price));
        self.by_trader
            .entry(order.trader.clone())
            .or_default()
            .insert(order.id);
        self.ladder_mut(side)
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(order);
    }

    /// Best resting price on `side` (max bid / min ask).
    #[must_use]
    pub fn best_price(&self, side: Side) -> Option<Fixed> {
        match side {
            Side::Buy => self.bids.last_key_value().map(|(p, _)| *p),
            Side::Sell => self.asks.first_key_value().map(|(p, _)| *p),
        }
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Fixed> {
        self.best_price(Side::Buy)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Fixed> {
        self.best_price(Side::Sell)
    }

    /// The next populated price on `side` strictly past `after`, walking
    /// away from the top of the book (downward for bids, upward for asks).
    #[must_use]
    pub fn next_price(&self, side: Side, after: Fixed) -> Option<Fixed> {
        use std::ops::Bound::{Excluded, Unbounded};
        match side {
            Side::Buy => self
                .bids
                .range((Unbounded, Excluded(after)))
                .next_back()
                .map(|(p, _)| *p),
            Side::Sell => self
                .asks
                .range((Excluded(after), Unbounded))
                .next()
                .map(|(p, _)| *p),
        }
    }

    /// The level at an exact price, if populated.
    #[must_use]
    pub fn level(&self, side: Side, price: Fixed) -> Option<&PriceLevel> {
        self.ladder(side).get(&price)
    }

    /// Head order at the best level on `side`, without removing it.
    #[must_use]
    pub fn match_peek(&self, side: Side) -> Option<&Order> {
        let price = self.best_price(side)?;
        self.ladder(side).get(&price)?.get(0)
    }

    /// Reduces a resting order by `qty` at its known location, dropping
    /// the order when consumed and the level when emptied. Returns the
    /// removed order if it was fully consumed.
    pub fn reduce(&mut self, order_id: OrderId, qty: u32) -> Option<Order> {
        let (side, price) = *self.locations.get(&order_id)?;
        let ladder = self.ladder_mut(side);
        let level = ladder.get_mut(&price)?;
        let removed = level.reduce(order_id, qty);
        if level.is_empty() {
            ladder.remove(&price);
        }
        if let Some(order) = &removed {
            self.unindex(order);
        }
        removed
    }

    /// Removes a resting order outright. Returns it with its remaining
    /// quantity intact, or `None` when the id is unknown.
    pub fn cancel(&mut self, order_id: OrderId) -> Option<Order> {
        let (side, price) = *self.locations.get(&order_id)?;
        let ladder = self.ladder_mut(side);
        let level = ladder.get_mut(&price)?;
        let removed = level.remove(order_id);
        if level.is_empty() {
            ladder.remove(&price);
        }
        if let Some(order) = &removed {
            trace!(order_id = %order.id, side = %order.side, price = %price, "order removed from book");
            self.unindex(order);
        }
        removed
    }

    /// The owner of a resting order, if it exists.
    #[must_use]
    pub fn owner_of(&self, order_id: OrderId) -> Option<&TraderId> {
        let (side, price) = self.locations.get(&order_id)?;
        self.ladder(*side)
            .get(price)?
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| &o.trader)
    }

    /// Removes every resting order for `trader`, in admission order.
    pub fn cancel_all_for(&mut self, trader: &TraderId) -> Vec<Order> {
        let ids: Vec<OrderId> = self
            .by_trader
            .get(trader)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.cancel(id)).collect()
    }

    /// Total opposite-side quantity fillable by `trader` within an
    /// optional price limit, excluding the trader's own resting orders.
    ///
    /// This is the fill-or-kill admissibility check: own orders cannot
    /// fill the taker, so they do not count as liquidity.
    #[must_use]
    pub fn fillable_qty(&self, taker_side: Side, limit: Option<Fixed>, trader: &TraderId) -> u64 {
        let opposite = taker_side.opposite();
        let within = |price: Fixed| match (taker_side, limit) {
            (_, None) => true,
            (Side::Buy, Some(lim)) => price <= lim,
            (Side::Sell, Some(lim)) => price >= lim,
        };
        let mut total = 0u64;
        let iter: Box<dyn Iterator<Item = (&Fixed, &PriceLevel)>> = match opposite {
            Side::Sell => Box::new(self.asks.iter()),
            Side::Buy => Box::new(self.bids.iter().rev()),
        };
        for (price, level) in iter {
            if !within(*price) {
                break;
            }
            total += level
                .iter()
                .filter(|o| &o.trader != trader)
                .map(|o| u64::from(o.qty_leaves))
                .sum::<u64>();
        }
        total
    }

    /// Top-`n` aggregated levels per side, best first.
    #[must_use]
    pub fn depth(&self, n: usize) -> (Vec<BookLevel>, Vec<BookLevel>) {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(n)
            .map(|(p, l)| BookLevel {
                price: *p,
                qty: l.total_qty(),
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(n)
            .map(|(p, l)| BookLevel {
                price: *p,
                qty: l.total_qty(),
            })
            .collect();
        (bids, asks)
    }

    /// `true` when the best bid meets or crosses the best ask.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// `true` when a bid and an ask from *different* traders overlap in
    /// price. Same-trader overlaps persist legitimately under the
    /// skip-resting self-match policy; an overlap between two traders
    /// means the matching loop failed and must never survive a command.
    #[must_use]
    pub fn has_executable_cross(&self) -> bool {
        let (Some(best_bid), Some(best_ask)) = (self.best_bid(), self.best_ask()) else {
            return false;
        };
        if best_bid < best_ask {
            return false;
        }
        for (bid_price, bid_level) in self.bids.range(best_ask..).rev() {
            for bid_order in bid_level.iter() {
                for (ask_price, ask_level) in self.asks.range(..=best_bid) {
                    if ask_price > bid_price {
                        break;
                    }
                    if ask_level.iter().any(|a| a.trader != bid_order.trader) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Number of resting orders across both ladders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.locations.len()
    }

    /// Every resting order, asks then bids, in ladder-then-queue order.
    /// The iteration order is deterministic, which makes it usable for
    /// state comparison after replay.
    pub fn iter_orders(&self) -> impl Iterator<Item = &Order> {
        self.asks
            .values()
            .flat_map(|l| l.iter())
            .chain(self.bids.values().flat_map(|l| l.iter()))
    }

    /// Sum of resting `qty_leaves` for one trader and side. Used by the
    /// accounting reconciliation checks.
    #[must_use]
    pub fn resting_qty_for(&self, trader: &TraderId, side: Side) -> u64 {
        let Some(ids) = self.by_trader.get(trader) else {
            return 0;
        };
        ids.iter()
            .filter_map(|id| {
                let (s, price) = self.locations.get(id)?;
                if *s != side {
                    return None;
                }
                self.ladder(*s)
                    .get(price)?
                    .iter()
                    .find(|o| &o.id == id)
                    .map(|o| u64::from(o.qty_leaves))
            })
            .sum()
    }

    fn unindex(&mut self, order: &Order) {
        self.locations.remove(&order.id);
        if let Some(set) = self.by_trader.get_mut(&order.trader) {
            set.remove(&order.id);
            if set.is_empty() {
                self.by_trader.remove(&order.trader);
            }
        }
    }
}
