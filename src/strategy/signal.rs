//! Trading signals emitted by strategies.
//!
//! Signals are ephemeral: produced during one simulation step, applied to
//! the ledger immediately, never persisted beyond the trade log.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }

    /// Sign applied to quantities: +1 for buys, -1 for sells.
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Buy => Decimal::ONE,
            Self::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

/// An order request from a strategy at a single simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub market_id: String,
    pub outcome: String,
    pub side: Side,

    /// Contracts requested (positive).
    pub quantity: Decimal,

    /// Strategy confidence in [0, 1]; advisory only.
    pub strength: f64,

    /// Free-form explanation recorded for audit.
    pub reason: String,
}

impl TradingSignal {
    pub fn buy(
        market_id: impl Into<String>,
        outcome: impl Into<String>,
        quantity: Decimal,
        strength: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            outcome: outcome.into(),
            side: Side::Buy,
            quantity,
            strength: strength.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }

    pub fn sell(
        market_id: impl Into<String>,
        outcome: impl Into<String>,
        quantity: Decimal,
        strength: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            outcome: outcome.into(),
            side: Side::Sell,
            quantity,
            strength: strength.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}
