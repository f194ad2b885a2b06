//! Per-trader accounts and exact fill accounting.
//!
//! Every trade touches two accounts; both legs are applied with integer
//! arithmetic only. Cash moves by the full notional of each leg, so
//! realized PnL is informational: it accumulates the same deltas that
//! already flowed through cash. Unrealized PnL and equity are derived on
//! demand from a mark and never stored.
//!
//! Arithmetic here is checked end to end. A `None` from any of these
//! methods means an `i64`/`i128` bound was exceeded; the engine treats
//! that as a fatal fault, never as a value to continue with.

use crate::engine::order::{Side, TraderId};
use crate::fixed::{Fixed, SCALE};
use std::collections::HashMap;
use tracing::trace;

/// One trader's ledger entry.
///
/// Created lazily on first contact, destroyed only with the session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TraderAccount {
    pub trader: TraderId,
    /// Net position in whole units; positive = long.
    pub position: i64,
    pub cash: Fixed,
    /// Volume-weighted entry price of the open position; zero iff flat.
    pub avg_entry_price: Fixed,
    /// Cumulative PnL from position reductions.
    pub realized_pnl: Fixed,
    /// Resting buy quantity across the trader's open orders.
    pub open_buy_qty: u64,
    /// Resting sell quantity across the trader's open orders.
    pub open_sell_qty: u64,
    /// Set when liquidation exhausted available liquidity; new orders are
    /// rejected until session reset.
    pub frozen: bool,
}

impl TraderAccount {
    #[must_use]
    pub fn new(trader: TraderId, starting_capital: Fixed) -> Self {
        TraderAccount {
            trader,
            position: 0,
            cash: starting_capital,
            avg_entry_price: Fixed::ZERO,
            realized_pnl: Fixed::ZERO,
            open_buy_qty: 0,
            open_sell_qty: 0,
            frozen: false,
        }
    }

    /// Applies one leg of a fill at `price` for `qty` units.
    ///
    /// Increasing legs re-weight the average entry; reducing legs realize
    /// PnL against it; a leg that crosses flat opens the residual at the
    /// fill price. Cash always moves by the full notional.
    ///
    /// Returns `None` on arithmetic overflow.
    #[must_use]
    pub fn apply_fill(&mut self, side: Side, price: Fixed, qty: u32) -> Option<()> {
        debug_assert!(qty > 0);
        let signed_qty = match side {
            Side::Buy => i64::from(qty),
            Side::Sell => -i64::from(qty),
        };
        let old_position = self.position;
        let new_position = old_position.checked_add(signed_qty)?;

        if old_position == 0 || old_position.signum() == signed_qty.signum() {
            // Opening or increasing: volume-weighted entry, truncated.
            let old_abs = old_position.unsigned_abs() as i128;
            let weighted = self.avg_entry_price.raw() as i128 * old_abs
                + price.raw() as i128 * qty as i128;
            let denom = old_abs + qty as i128;
            self.avg_entry_price = Fixed::from_raw(i64::try_from(weighted / denom).ok()?);
        } else {
            // Reducing (and possibly flipping through flat).
            let closed = i64::from(qty).min(old_position.abs());
            let per_unit = match old_position.signum() {
                1 => price.checked_sub(self.avg_entry_price)?,
                _ => self.avg_entry_price.checked_sub(price)?,
            };
            let realized = Fixed::from_notional(per_unit.raw() as i128 * closed as i128)?;
            self.realized_pnl = self.realized_pnl.checked_add(realized)?;
            if new_position == 0 {
                self.avg_entry_price = Fixed::ZERO;
            } else if new_position.signum() != old_position.signum() {
                self.avg_entry_price = price;
            }
        }

        self.position = new_position;
        let notional = Fixed::from_notional(price.notional(qty))?;
        self.cash = match side {
            Side::Buy => self.cash.checked_sub(notional)?,
            Side::Sell => self.cash.checked_add(notional)?,
        };
        trace!(
            trader = %self.trader,
            %side,
            %price,
            qty,
            position = self.position,
            cash = %self.cash,
            "fill applied"
        );
        Some(())
    }

    /// `(mark − avg_entry) × position`; zero when no mark exists.
    #[must_use]
    pub fn unrealized_pnl(&self, mark: Option<Fixed>) -> Option<Fixed> {
        let Some(mark) = mark else {
            return Some(Fixed::ZERO);
        };
        if self.position == 0 {
            return Some(Fixed::ZERO);
        }
        let per_unit = mark.checked_sub(self.avg_entry_price)?;
        Fixed::from_notional(per_unit.raw() as i128 * self.position as i128)
    }

    /// `cash + unrealized_pnl`. Realized PnL is already inside cash.
    #[must_use]
    pub fn total_equity(&self, mark: Option<Fixed>) -> Option<Fixed> {
        self.cash.checked_add(self.unrealized_pnl(mark)?)
    }

    /// Maintenance margin required for the open position at `mark`:
    /// `|position| × mark × ratio`.
    #[must_use]
    pub fn maintenance_margin(&self, mark: Fixed, ratio: Fixed) -> Option<Fixed> {
        let exposure = mark.raw() as i128 * self.position.unsigned_abs() as i128;
        let required = exposure * ratio.raw() as i128 / SCALE as i128;
        Fixed::from_notional(required)
    }

    /// Resting quantity on one side.
    #[must_use]
    pub fn open_qty(&self, side: Side) -> u64 {
        match side {
            Side::Buy => self.open_buy_qty,
            Side::Sell => self.open_sell_qty,
        }
    }

    /// Adjusts the resting-quantity tally when orders rest, fill, or
    /// cancel. Saturating down: the tally can never go negative.
    pub fn adjust_open_qty(&mut self, side: Side, delta: i64) {
        let slot = match side {
            Side::Buy => &mut self.open_buy_qty,
            Side::Sell => &mut self.open_sell_qty,
        };
        *slot = if delta >= 0 {
            slot.saturating_add(delta as u64)
        } else {
            slot.saturating_sub(delta.unsigned_abs())
        };
    }
}

/// The account set, keyed by trader.
#[derive(Debug, Clone, Default)]
pub struct Accounts {
    map: HashMap<TraderId, TraderAccount>,
    starting_capital: Fixed,
}

impl Accounts {
    #[must_use]
    pub fn new(starting_capital: Fixed) -> Self {
        Accounts {
            map: HashMap::new(),
            starting_capital,
        }
    }

    /// Fetches an account, creating it with the configured starting
    /// capital on first contact.
    pub fn get_or_create(&mut self, trader: &TraderId) -> &mut TraderAccount {
        self.map
            .entry(trader.clone())
            .or_insert_with(|| TraderAccount::new(trader.clone(), self.starting_capital))
    }

    #[must_use]
    pub fn get(&self, trader: &TraderId) -> Option<&TraderAccount> {
        self.map.get(trader)
    }

    #[must_use]
    pub fn get_mut(&mut self, trader: &TraderId) -> Option<&mut TraderAccount> {
        self.map.get_mut(trader)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraderAccount> {
        self.map.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
