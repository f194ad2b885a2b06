//! A single price level: a FIFO queue of resting orders plus aggregates.
//!
//! `total_qty` is the sum of `qty_leaves` over the queue and is maintained
//! as an invariant on every mutation. A level with an empty queue is
//! removed from its ladder by the book; it never persists empty.

use crate::engine::order::{Order, OrderId};
use crate::fixed::Fixed;
use std::collections::VecDeque;

/// FIFO queue of resting orders at one price.
///
/// Time priority is queue position: earlier-inserted orders match first,
/// absolutely. There is no size priority and no pro-rata allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    price: Fixed,
    queue: VecDeque<Order>,
    total_qty: u64,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Fixed) -> Self {
        PriceLevel {
            price,
            queue: VecDeque::new(),
            total_qty: 0,
        }
    }

    #[must_use]
    #[inline]
    pub fn price(&self) -> Fixed {
        self.price
    }

    /// Sum of `qty_leaves` over the queue.
    #[must_use]
    #[inline]
    pub fn total_qty(&self) -> u64 {
        self.total_qty
    }

    #[must_use]
    #[inline]
    pub fn order_count(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Appends an order at the tail of the queue.
    pub fn push_back(&mut self, order: Order) {
        debug_assert_eq!(order.resting_price(), self.price);
        debug_assert!(order.qty_leaves > 0);
        self.total_qty += u64::from(order.qty_leaves);
        self.queue.push_back(order);
    }

    /// The order at queue position `idx` (0 = head).
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Order> {
        self.queue.get(idx)
    }

    /// Iterates the queue in time priority.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.queue.iter()
    }

    /// Reduces an order's `qty_leaves` by `qty`, removing it when it
    /// reaches zero. Returns the removed order, or `None` if it still
    /// rests.
    ///
    /// # Panics
    /// Debug-asserts that the order exists and has at least `qty` left;
    /// the matching engine never over-consumes.
    pub fn reduce(&mut self, order_id: OrderId, qty: u32) -> Option<Order> {
        let idx = self.queue.iter().position(|o| o.id == order_id)?;
        let order = &mut self.queue[idx];
        debug_assert!(order.qty_leaves >= qty);
        order.qty_leaves -= qty;
        self.total_qty -= u64::from(qty);
        if order.qty_leaves == 0 {
            self.queue.remove(idx)
        } else {
            None
        }
    }

    /// Removes an order from the queue regardless of remaining quantity.
    pub fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let idx = self.queue.iter().position(|o| o.id == order_id)?;
        let order = self.queue.remove(idx)?;
        self.total_qty -= u64::from(order.qty_leaves);
        Some(order)
    }
}
