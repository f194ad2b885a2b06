//! Startup-time engine configuration.
//!
//! The set is closed and read once at construction; there is no live
//! reconfiguration of risk caps during a running session.

use crate::fixed::{Fixed, Notional, SCALE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which margin checks the risk gate runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    /// No margin checks; accounts can run unbounded exposure.
    #[default]
    Disabled,
    /// Pre-trade initial margin only.
    InitialOnly,
    /// Pre-trade initial margin plus post-trade maintenance scans.
    InitialAndMaintenance,
}

impl MarginMode {
    #[must_use]
    #[inline]
    pub fn initial_enabled(self) -> bool {
        self != MarginMode::Disabled
    }

    #[must_use]
    #[inline]
    pub fn maintenance_enabled(self) -> bool {
        self == MarginMode::InitialAndMaintenance
    }
}

/// What the matching engine does when an incoming order meets a resting
/// order from the same trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfMatchPolicy {
    /// Skip the resting order and keep matching past it.
    #[default]
    SkipResting,
    /// Cancel the resting order and keep matching.
    CancelResting,
    /// Cancel the incoming order's residual and stop matching.
    CancelIncoming,
}

/// Closed configuration set, fixed for the lifetime of an [`crate::engine::Engine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum price increment; order prices must be positive multiples.
    pub tick_size: Fixed,
    /// Allowed deviation of a limit price from the last trade, as a ratio.
    pub price_collar_pct: Fixed,
    /// Fat-finger cap on a single order's quantity.
    pub max_order_qty: u32,
    /// Cap on a single limit order's notional (price × qty, scaled).
    pub max_order_notional: Notional,
    /// Token bucket refill rate, tokens per second.
    pub rate_limit_tokens_per_sec: u32,
    /// Token bucket capacity (burst).
    pub rate_limit_burst: u32,
    /// Cash granted to each account on first contact.
    pub starting_capital: Fixed,
    /// Number of levels per side carried in `book_update` events.
    pub book_depth_in_updates: usize,
    pub margin_mode: MarginMode,
    /// Initial margin requirement as a ratio of projected exposure.
    pub initial_margin_pct: Fixed,
    /// Maintenance margin requirement as a ratio of open exposure.
    pub maintenance_margin_pct: Fixed,
    /// Liquidation attempts per trader per engine tick, and the number of
    /// consecutive breached ticks tolerated before the account freezes.
    pub liquidation_max_attempts: u32,
    pub self_match_policy: SelfMatchPolicy,
    /// Shared secret for `admin_halt` / `admin_resume`. `None` leaves the
    /// admin commands unauthenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tick_size: Fixed::from_raw(1),
            price_collar_pct: Fixed::from_raw(5_000_000), // 0.05
            max_order_qty: 10_000,
            max_order_notional: 1_000_000_000_000, // 10^12 scaled units
            rate_limit_tokens_per_sec: 1_000,
            rate_limit_burst: 1_000,
            starting_capital: Fixed::from_raw(10_000 * SCALE),
            book_depth_in_updates: 10,
            margin_mode: MarginMode::default(),
            initial_margin_pct: Fixed::from_raw(10_000_000), // 0.10
            maintenance_margin_pct: Fixed::from_raw(10_000_000), // 0.10
            liquidation_max_attempts: 3,
            self_match_policy: SelfMatchPolicy::default(),
            admin_token: None,
        }
    }
}

/// A configuration value that cannot be run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("tick_size must be positive, got {0}")]
    NonPositiveTick(Fixed),
    #[error("price_collar_pct must not be negative, got {0}")]
    NegativeCollar(Fixed),
    #[error("max_order_qty must be positive")]
    ZeroMaxOrderQty,
    #[error("rate_limit_burst must be positive")]
    ZeroBurst,
    #[error("margin ratios must be positive when margin mode is enabled")]
    NonPositiveMarginRatio,
    #[error("liquidation_max_attempts must be positive")]
    ZeroLiquidationAttempts,
}

impl EngineConfig {
    /// Validates the closed set before an engine is built around it.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick_size.is_positive() {
            return Err(ConfigError::NonPositiveTick(self.tick_size));
        }
        if self.price_collar_pct < Fixed::ZERO {
            return Err(ConfigError::NegativeCollar(self.price_collar_pct));
        }
        if self.max_order_qty == 0 {
            return Err(ConfigError::ZeroMaxOrderQty);
        }
        if self.rate_limit_burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if self.margin_mode.initial_enabled()
            && (!self.initial_margin_pct.is_positive()
                || !self.maintenance_margin_pct.is_positive())
        {
            return Err(ConfigError::NonPositiveMarginRatio);
        }
        if self.liquidation_max_attempts == 0 {
            return Err(ConfigError::ZeroLiquidationAttempts);
        }
        Ok(())
    }
}
