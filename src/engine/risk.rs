//! Pre-trade risk gate and margin arithmetic.
//!
//! Every check runs before any state mutates, in a fixed order: kill
//! switch, frozen account, field validation, price collar, fat-finger
//! size, notional cap, rate limit, initial margin. The first failure wins
//! and is surfaced as a single rejection; the engine state is unchanged
//! except for the rate bucket, which charges one token per attempt.
//!
//! The token buckets refill from command arrival timestamps, never from
//! the wall clock, so admission decisions replay deterministically.

use crate::engine::config::EngineConfig;
use crate::engine::error::EngineFault;
use crate::engine::event::RejectReason;
use crate::engine::order::{OrderKind, Side, TraderId};
use crate::engine::state::{Engine, KillSwitch, OrderSource};
use crate::fixed::{Fixed, Notional, SCALE};
use std::collections::HashMap;
use tracing::trace;

/// Nano-tokens per token; refill math stays in integers.
const TOKEN_SCALE: u128 = 1_000_000_000;

/// Per-trader token bucket state.
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Available tokens in nano-tokens.
    tokens: u128,
    /// Timestamp of the last refill.
    last_refill_ns: u64,
}

/// Token-bucket rate limiter keyed by trader.
#[derive(Debug, Clone, Default)]
pub(crate) struct RateLimiter {
    buckets: HashMap<TraderId, TokenBucket>,
}

impl RateLimiter {
    /// Attempts to take one token for `trader` at `now_ns`.
    ///
    /// Buckets start full (burst capacity) on first contact.
    fn try_consume(&mut self, trader: &TraderId, now_ns: u64, cfg: &EngineConfig) -> bool {
        let capacity = cfg.rate_limit_burst as u128 * TOKEN_SCALE;
        let bucket = self
            .buckets
            .entry(trader.clone())
            .or_insert_with(|| TokenBucket {
                tokens: capacity,
                last_refill_ns: now_ns,
            });

        let elapsed = now_ns.saturating_sub(bucket.last_refill_ns) as u128;
        let refill = elapsed * cfg.rate_limit_tokens_per_sec as u128;
        bucket.tokens = (bucket.tokens + refill).min(capacity);
        bucket.last_refill_ns = now_ns;

        if bucket.tokens >= TOKEN_SCALE {
            bucket.tokens -= TOKEN_SCALE;
            true
        } else {
            false
        }
    }
}

/// Outcome of the pre-trade gate for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Gate {
    Pass,
    Reject {
        reason: RejectReason,
        details: Option<String>,
    },
}

impl Gate {
    fn reject(reason: RejectReason) -> Gate {
        Gate::Reject {
            reason,
            details: None,
        }
    }
}

impl Engine {
    /// Runs the ordered pre-trade checks for a submit.
    ///
    /// Liquidation-sourced orders skip exactly the initial-margin check;
    /// every other check applies to them unchanged.
    ///
    /// # Errors
    /// Only arithmetic overflow in the margin projection is fatal.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn gate_submit(
        &mut self,
        trader: &TraderId,
        side: Side,
        kind: OrderKind,
        qty: u32,
        price: Option<Fixed>,
        source: OrderSource,
        now_ns: u64,
    ) -> Result<Gate, EngineFault> {
        // 1. Kill switch.
        if self.kill_switch == KillSwitch::Halted {
            return Ok(Gate::reject(RejectReason::ExchangeHalted));
        }

        // 2. Frozen account (set by an exhausted liquidation).
        if self.accounts.get(trader).is_some_and(|a| a.frozen) {
            return Ok(Gate::reject(RejectReason::AccountFrozen));
        }

        // 3. Field validation.
        if qty == 0 {
            return Ok(Gate::Reject {
                reason: RejectReason::InvalidMessage,
                details: Some("qty must be positive".to_string()),
            });
        }
        match (kind, price) {
            (OrderKind::Limit, None) => {
                return Ok(Gate::Reject {
                    reason: RejectReason::InvalidMessage,
                    details: Some("limit order requires a price".to_string()),
                });
            }
            (OrderKind::Market, Some(_)) => {
                return Ok(Gate::Reject {
                    reason: RejectReason::InvalidMessage,
                    details: Some("market order must not carry a price".to_string()),
                });
            }
            (OrderKind::Limit, Some(p)) => {
                if !p.is_positive() || !p.is_multiple_of(self.config.tick_size) {
                    return Ok(Gate::Reject {
                        reason: RejectReason::InvalidMessage,
                        details: Some(format!(
                            "price {p} is not a positive multiple of tick {}",
                            self.config.tick_size
                        )),
                    });
                }
            }
            (OrderKind::Market, None) => {}
        }

        // 4. Price collar against the last trade.
        if let (Some(p), Some(last)) = (price, self.last_trade_price) {
            let band = last
                .mul_pct(self.config.price_collar_pct)
                .ok_or_else(|| EngineFault::ArithmeticOverflow {
                    context: "price collar band".to_string(),
                })?;
            if p.abs_diff(last) > band {
                return Ok(Gate::Reject {
                    reason: RejectReason::InvalidPriceReference,
                    details: Some(format!("price {p} outside collar around {last}")),
                });
            }
        }

        // 5. Fat-finger size cap.
        if qty > self.config.max_order_qty {
            return Ok(Gate::Reject {
                reason: RejectReason::OrderSizeCap,
                details: Some(format!("qty {qty} > cap {}", self.config.max_order_qty)),
            });
        }

        // 6. Notional cap, limit orders only.
        if let Some(p) = price {
            let notional: Notional = p.notional(qty);
            if notional > self.config.max_order_notional {
                return Ok(Gate::reject(RejectReason::NotionalCap));
            }
        }

        // 7. Rate limit: one token per attempt.
        if !self.rate.try_consume(trader, now_ns, &self.config) {
            return Ok(Gate::reject(RejectReason::RateLimited));
        }

        // 8. Initial margin.
        if self.config.margin_mode.initial_enabled() && source == OrderSource::Client {
            if let Some(gate) = self.gate_initial_margin(trader, side, qty, price)? {
                return Ok(gate);
            }
        }

        trace!(%trader, %side, %kind, qty, "order admitted");
        Ok(Gate::Pass)
    }

    /// Initial-margin projection: the worst-case exposure if this order
    /// and every same-side resting order filled must be coverable by
    /// current equity.
    ///
    /// The reference price is the mark when one exists, else the order's
    /// limit price. A market order with no mark has no reference and the
    /// check is skipped.
    fn gate_initial_margin(
        &self,
        trader: &TraderId,
        side: Side,
        qty: u32,
        price: Option<Fixed>,
    ) -> Result<Option<Gate>, EngineFault> {
        let mark = self.mark_price();
        let Some(reference) = mark.or(price) else {
            return Ok(None);
        };

        let (position, open_same, equity) = match self.accounts.get(trader) {
            Some(acct) => {
                let equity =
                    acct.total_equity(mark)
                        .ok_or_else(|| EngineFault::ArithmeticOverflow {
                            context: "equity for margin check".to_string(),
                        })?;
                (acct.position, acct.open_qty(side), equity)
            }
            None => (0, 0, self.config.starting_capital),
        };

        let working = open_same as i128 + qty as i128;
        let projected = match side {
            Side::Buy => position as i128 + working,
            Side::Sell => position as i128 - working,
        };
        let exposure = reference.raw() as i128 * projected.unsigned_abs() as i128;
        let required_raw = exposure * self.config.initial_margin_pct.raw() as i128 / SCALE as i128;
        let required =
            Fixed::from_notional(required_raw).ok_or_else(|| EngineFault::ArithmeticOverflow {
                context: "initial margin requirement".to_string(),
            })?;

        if required > equity {
            return Ok(Some(Gate::Reject {
                reason: RejectReason::InitialMarginInsufficient,
                details: Some(format!(
                    "equity {equity}, required_margin {required}"
                )),
            }));
        }
        Ok(None)
    }

    /// `true` when `trader` currently violates maintenance margin.
    ///
    /// No mark or no position means no breach by definition.
    pub(crate) fn maintenance_breached(&self, trader: &TraderId) -> Result<bool, EngineFault> {
        if !self.config.margin_mode.maintenance_enabled() {
            return Ok(false);
        }
        let Some(mark) = self.mark_price() else {
            return Ok(false);
        };
        let Some(acct) = self.accounts.get(trader) else {
            return Ok(false);
        };
        if acct.position == 0 {
            return Ok(false);
        }
        let required = acct
            .maintenance_margin(mark, self.config.maintenance_margin_pct)
            .ok_or_else(|| EngineFault::ArithmeticOverflow {
                context: "maintenance margin requirement".to_string(),
            })?;
        let equity = acct
            .total_equity(Some(mark))
            .ok_or_else(|| EngineFault::ArithmeticOverflow {
                context: "equity for maintenance scan".to_string(),
            })?;
        Ok(equity < required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_starts_full_and_drains() {
        let mut limiter = RateLimiter::default();
        let cfg = EngineConfig {
            rate_limit_tokens_per_sec: 1,
            rate_limit_burst: 2,
            ..EngineConfig::default()
        };
        let t = TraderId::new("t");

        assert!(limiter.try_consume(&t, 0, &cfg));
        assert!(limiter.try_consume(&t, 0, &cfg));
        assert!(!limiter.try_consume(&t, 0, &cfg));
    }

    #[test]
    fn test_bucket_refills_from_timestamps() {
        let mut limiter = RateLimiter::default();
        let cfg = EngineConfig {
            rate_limit_tokens_per_sec: 1,
            rate_limit_burst: 1,
            ..EngineConfig::default()
        };
        let t = TraderId::new("t");

        assert!(limiter.try_consume(&t, 0, &cfg));
        assert!(!limiter.try_consume(&t, 500_000_000, &cfg));
        // One full second after the drain: one token back.
        assert!(limiter.try_consume(&t, 1_500_000_000, &cfg));
    }

    #[test]
    fn test_bucket_caps_at_burst() {
        let mut limiter = RateLimiter::default();
        let cfg = EngineConfig {
            rate_limit_tokens_per_sec: 1000,
            rate_limit_burst: 3,
            ..EngineConfig::default()
        };
        let t = TraderId::new("t");

        // A long quiet period cannot accumulate beyond the burst.
        assert!(limiter.try_consume(&t, 0, &cfg));
        for _ in 0..3 {
            assert!(limiter.try_consume(&t, 60_000_000_000, &cfg));
        }
        assert!(!limiter.try_consume(&t, 60_000_000_000, &cfg));
    }

    #[test]
    fn test_buckets_are_per_trader() {
        let mut limiter = RateLimiter::default();
        let cfg = EngineConfig {
            rate_limit_tokens_per_sec: 1,
            rate_limit_burst: 1,
            ..EngineConfig::default()
        };

        assert!(limiter.try_consume(&TraderId::new("a"), 0, &cfg));
        assert!(limiter.try_consume(&TraderId::new("b"), 0, &cfg));
        assert!(!limiter.try_consume(&TraderId::new("a"), 0, &cfg));
    }
}
