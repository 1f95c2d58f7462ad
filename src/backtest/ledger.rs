//! Position and capital bookkeeping.
//!
//! The ledger owns cash, the open position map, the last observed price
//! per `(market_id, outcome)`, and the append-only trade log. Signals are
//! applied one at a time; constraint violations return a rejection on the
//! normal control path instead of an error.
//!
//! Cash moves by one signed rule: buys debit `quantity x price + fee`,
//! sells credit `quantity x price - fee`. With positions valued at
//! `quantity x last_price` (signed), `equity = cash + positions_value`
//! holds for longs and shorts alike.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::strategy::{Side, TradingSignal};

use super::engine::BacktestConfig;

/// Position lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A holding in one outcome of one market.
///
/// Quantity is signed: positive is long, negative is short. At most one
/// open position exists per `(market_id, outcome)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub outcome: String,
    pub quantity: Decimal,
    pub average_entry_price: Decimal,
    pub open_timestamp: DateTime<Utc>,
    pub status: PositionStatus,

    /// P&L locked in by reductions of this position so far.
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// +1 for long, -1 for short.
    pub fn direction(&self) -> Decimal {
        if self.is_long() {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        }
    }

    /// Signed value at the given price.
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    /// Mark-to-market P&L at the given price.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.average_entry_price) * self.quantity
    }
}

/// Immutable record of one executed signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: DateTime<Utc>,
    pub market_id: String,
    pub outcome: String,
    pub side: Side,

    /// Executed contracts (positive; may be clamped on reductions).
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,

    /// Set only when the trade reduced or closed a position.
    pub realized_pnl: Option<Decimal>,
}

/// Why a signal was not executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    InsufficientCash { required: Decimal, available: Decimal },
    PositionSizeExceeded { notional: Decimal, limit: Decimal },
    MaxPositionsReached { limit: usize },
    NoQuotedPrice,
    NonPositiveQuantity,
}

impl RejectionReason {
    /// Short label for logs and counters.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InsufficientCash { .. } => "insufficient_cash",
            Self::PositionSizeExceeded { .. } => "position_size_exceeded",
            Self::MaxPositionsReached { .. } => "max_positions_reached",
            Self::NoQuotedPrice => "no_quoted_price",
            Self::NonPositiveQuantity => "non_positive_quantity",
        }
    }
}

/// Outcome of applying one signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Executed(Trade),
    Rejected(RejectionReason),
}

/// Cash, positions, prices, and the trade log for one run.
pub struct Ledger {
    cash: Decimal,
    commission_rate: Decimal,
    max_position_size: Decimal,
    max_positions: usize,
    positions: BTreeMap<(String, String), Position>,
    last_prices: BTreeMap<(String, String), Decimal>,
    trades: Vec<Trade>,
    closed_positions: Vec<Position>,
    total_fees: Decimal,
}

impl Ledger {
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            cash: config.initial_capital,
            commission_rate: config.commission_per_trade,
            max_position_size: Decimal::from_f64_retain(config.max_position_size)
                .unwrap_or_default(),
            max_positions: config.max_positions,
            positions: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            trades: Vec::new(),
            closed_positions: Vec::new(),
            total_fees: Decimal::ZERO,
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn total_fees(&self) -> Decimal {
        self.total_fees
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Record the latest quoted price for an outcome.
    pub fn update_price(&mut self, market_id: &str, outcome: &str, price: Decimal) {
        self.last_prices
            .insert((market_id.to_string(), outcome.to_string()), price);
    }

    pub fn last_price(&self, market_id: &str, outcome: &str) -> Option<Decimal> {
        self.last_prices
            .get(&(market_id.to_string(), outcome.to_string()))
            .copied()
    }

    /// All last observed prices, keyed by `(market_id, outcome)`.
    pub fn last_prices(&self) -> &BTreeMap<(String, String), Decimal> {
        &self.last_prices
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    /// Snapshot of open positions in deterministic key order.
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Signed value of all open positions at last observed prices.
    pub fn positions_value(&self) -> Decimal {
        self.positions
            .iter()
            .map(|(key, p)| {
                let price = self
                    .last_prices
                    .get(key)
                    .copied()
                    .unwrap_or(p.average_entry_price);
                p.market_value(price)
            })
            .sum()
    }

    /// Cash plus mark-to-market of open positions.
    pub fn total_equity(&self) -> Decimal {
        self.cash + self.positions_value()
    }

    /// Apply one signal at the quoted execution price.
    ///
    /// Opens, increases, reduces, or closes the position for the signal's
    /// `(market_id, outcome)`. Reducing quantity is clamped to the open
    /// quantity; a direction reversal takes two signals. A signal for an
    /// outcome that has never quoted is rejected.
    pub fn apply_signal(
        &mut self,
        signal: &TradingSignal,
        execution_price: Option<Decimal>,
        timestamp: DateTime<Utc>,
    ) -> SignalOutcome {
        let Some(execution_price) = execution_price else {
            return self.reject(signal, RejectionReason::NoQuotedPrice);
        };
        if signal.quantity <= Decimal::ZERO {
            return self.reject(signal, RejectionReason::NonPositiveQuantity);
        }

        let key = (signal.market_id.clone(), signal.outcome.clone());
        let reduces = self
            .positions
            .get(&key)
            .map(|p| p.is_long() != (signal.side == Side::Buy))
            .unwrap_or(false);

        if reduces {
            return self.reduce_position(signal, execution_price, timestamp);
        }
        self.open_or_increase(signal, execution_price, timestamp)
    }

    fn open_or_increase(
        &mut self,
        signal: &TradingSignal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> SignalOutcome {
        let key = (signal.market_id.clone(), signal.outcome.clone());
        let existing_abs = self
            .positions
            .get(&key)
            .map(|p| p.quantity.abs())
            .unwrap_or(Decimal::ZERO);

        if existing_abs.is_zero() && self.positions.len() >= self.max_positions {
            return self.reject(
                signal,
                RejectionReason::MaxPositionsReached {
                    limit: self.max_positions,
                },
            );
        }

        let resulting_notional = (existing_abs + signal.quantity) * price;
        let limit = self.max_position_size * self.total_equity();
        if resulting_notional > limit {
            return self.reject(
                signal,
                RejectionReason::PositionSizeExceeded {
                    notional: resulting_notional,
                    limit,
                },
            );
        }

        let fee = self.commission_rate * signal.quantity * price;
        if signal.side == Side::Buy {
            let required = signal.quantity * price + fee;
            if required > self.cash {
                return self.reject(
                    signal,
                    RejectionReason::InsufficientCash {
                        required,
                        available: self.cash,
                    },
                );
            }
            self.cash -= required;
        } else {
            self.cash += signal.quantity * price - fee;
        }

        let signed_quantity = signal.side.sign() * signal.quantity;
        match self.positions.get_mut(&key) {
            Some(position) => {
                let new_abs = existing_abs + signal.quantity;
                position.average_entry_price = (position.average_entry_price * existing_abs
                    + price * signal.quantity)
                    / new_abs;
                position.quantity += signed_quantity;
            }
            None => {
                self.positions.insert(
                    key,
                    Position {
                        market_id: signal.market_id.clone(),
                        outcome: signal.outcome.clone(),
                        quantity: signed_quantity,
                        average_entry_price: price,
                        open_timestamp: timestamp,
                        status: PositionStatus::Open,
                        realized_pnl: Decimal::ZERO,
                    },
                );
            }
        }

        self.record(Trade {
            timestamp,
            market_id: signal.market_id.clone(),
            outcome: signal.outcome.clone(),
            side: signal.side,
            quantity: signal.quantity,
            price,
            fee,
            realized_pnl: None,
        })
    }

    fn reduce_position(
        &mut self,
        signal: &TradingSignal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> SignalOutcome {
        let key = (signal.market_id.clone(), signal.outcome.clone());
        let Some(mut position) = self.positions.remove(&key) else {
            // Nothing to reduce; a sell from flat opens a short.
            return self.open_or_increase(signal, price, timestamp);
        };

        let closed_quantity = signal.quantity.min(position.quantity.abs());
        let fee = self.commission_rate * closed_quantity * price;
        let realized =
            position.direction() * (price - position.average_entry_price) * closed_quantity - fee;

        if signal.side == Side::Buy {
            // A covering buy debits cash, so it gets the same funding check
            // as an opening buy.
            let required = closed_quantity * price + fee;
            if required > self.cash {
                self.positions.insert(key, position);
                return self.reject(
                    signal,
                    RejectionReason::InsufficientCash {
                        required,
                        available: self.cash,
                    },
                );
            }
            self.cash -= required;
        } else {
            self.cash += closed_quantity * price - fee;
        }

        position.quantity += signal.side.sign() * closed_quantity;
        position.realized_pnl += realized;

        if position.quantity.is_zero() {
            position.status = PositionStatus::Closed;
            self.closed_positions.push(position);
        } else {
            self.positions.insert(key, position);
        }

        self.record(Trade {
            timestamp,
            market_id: signal.market_id.clone(),
            outcome: signal.outcome.clone(),
            side: signal.side,
            quantity: closed_quantity,
            price,
            fee,
            realized_pnl: Some(realized),
        })
    }

    fn record(&mut self, trade: Trade) -> SignalOutcome {
        self.total_fees += trade.fee;
        self.trades.push(trade.clone());
        SignalOutcome::Executed(trade)
    }

    fn reject(&self, signal: &TradingSignal, reason: RejectionReason) -> SignalOutcome {
        debug!(
            market_id = %signal.market_id,
            outcome = %signal.outcome,
            side = signal.side.as_str(),
            quantity = %signal.quantity,
            reason = reason.label(),
            "signal rejected"
        );
        SignalOutcome::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn config(capital: Decimal) -> BacktestConfig {
        BacktestConfig {
            initial_capital: capital,
            commission_per_trade: dec!(0.01),
            max_position_size: 1.0,
            max_positions: 10,
            ..BacktestConfig::default()
        }
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap()
    }

    fn executed(outcome: SignalOutcome) -> Trade {
        match outcome {
            SignalOutcome::Executed(trade) => trade,
            SignalOutcome::Rejected(reason) => panic!("unexpected rejection: {:?}", reason),
        }
    }

    #[test]
    fn test_open_long_debits_cash_and_fee() {
        let mut ledger = Ledger::new(&config(dec!(10000)));
        ledger.update_price("m1", "yes", dec!(0.40));

        let signal = TradingSignal::buy("m1", "yes", dec!(100), 0.8, "entry");
        let trade = executed(ledger.apply_signal(&signal, Some(dec!(0.40)), ts(1)));

        // 100 * 0.40 = 40 notional, 1% fee = 0.40
        assert_eq!(trade.fee, dec!(0.4));
        assert_eq!(trade.realized_pnl, None);
        assert_eq!(ledger.cash(), dec!(9959.6));
        assert_eq!(ledger.open_position_count(), 1);

        let position = &ledger.open_positions()[0];
        assert_eq!(position.quantity, dec!(100));
        assert_eq!(position.average_entry_price, dec!(0.40));
    }

    #[test]
    fn test_increase_recomputes_weighted_average() {
        let mut ledger = Ledger::new(&config(dec!(10000)));
        ledger.update_price("m1", "yes", dec!(0.40));

        let buy = TradingSignal::buy("m1", "yes", dec!(100), 0.8, "entry");
        executed(ledger.apply_signal(&buy, Some(dec!(0.40)), ts(1)));
        executed(ledger.apply_signal(&buy, Some(dec!(0.60)), ts(2)));

        let position = &ledger.open_positions()[0];
        assert_eq!(position.quantity, dec!(200));
        assert_eq!(position.average_entry_price, dec!(0.50));
        assert_eq!(ledger.open_position_count(), 1);
    }

    #[test]
    fn test_round_trip_realizes_pnl_net_of_fee() {
        let mut ledger = Ledger::new(&config(dec!(10000)));
        ledger.update_price("m1", "yes", dec!(0.40));

        executed(ledger.apply_signal(
            &TradingSignal::buy("m1", "yes", dec!(100), 0.8, "entry"),
            Some(dec!(0.40)),
            ts(1),
        ));
        let close = executed(ledger.apply_signal(
            &TradingSignal::sell("m1", "yes", dec!(100), 0.8, "exit"),
            Some(dec!(0.60)),
            ts(2),
        ));

        // (0.60 - 0.40) * 100 - 0.60 close fee
        assert_eq!(close.realized_pnl, Some(dec!(19.4)));
        assert_eq!(ledger.open_position_count(), 0);
        // 10000 - 40.40 entry + 59.40 exit proceeds
        assert_eq!(ledger.cash(), dec!(10019.0));
        assert_eq!(ledger.total_fees(), dec!(1.0));
    }

    #[test]
    fn test_over_close_is_clamped_to_open_quantity() {
        let mut ledger = Ledger::new(&config(dec!(10000)));
        ledger.update_price("m1", "yes", dec!(0.50));

        executed(ledger.apply_signal(
            &TradingSignal::buy("m1", "yes", dec!(50), 0.8, "entry"),
            Some(dec!(0.50)),
            ts(1),
        ));
        let close = executed(ledger.apply_signal(
            &TradingSignal::sell("m1", "yes", dec!(500), 0.8, "exit"),
            Some(dec!(0.50)),
            ts(2),
        ));

        assert_eq!(close.quantity, dec!(50));
        assert_eq!(ledger.open_position_count(), 0);
    }

    #[test]
    fn test_short_open_credits_cash_and_equity_is_conserved() {
        let mut ledger = Ledger::new(&config(dec!(10000)));
        ledger.update_price("m1", "yes", dec!(0.50));

        executed(ledger.apply_signal(
            &TradingSignal::sell("m1", "yes", dec!(100), 0.8, "short"),
            Some(dec!(0.50)),
            ts(1),
        ));

        // Proceeds 50 minus 0.50 fee
        assert_eq!(ledger.cash(), dec!(10049.5));
        let position = &ledger.open_positions()[0];
        assert_eq!(position.quantity, dec!(-100));
        // Equity = cash + (-100 * 0.50) = initial - fee
        assert_eq!(ledger.total_equity(), dec!(9999.5));

        // Price drops; the short gains.
        ledger.update_price("m1", "yes", dec!(0.30));
        assert_eq!(ledger.total_equity(), dec!(10019.5));
    }

    #[test]
    fn test_underfunded_cover_is_rejected() {
        let mut ledger = Ledger::new(&config(dec!(100)));
        ledger.update_price("m1", "yes", dec!(0.05));

        // Short 1000 @ 0.05: proceeds 50 minus 0.50 fee leaves cash 149.50.
        executed(ledger.apply_signal(
            &TradingSignal::sell("m1", "yes", dec!(1000), 0.8, "short"),
            Some(dec!(0.05)),
            ts(1),
        ));

        // Covering at 0.90 would debit 900 + 9 fee, more than is on hand.
        ledger.update_price("m1", "yes", dec!(0.90));
        let outcome = ledger.apply_signal(
            &TradingSignal::buy("m1", "yes", dec!(1000), 0.8, "cover"),
            Some(dec!(0.90)),
            ts(2),
        );

        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectionReason::InsufficientCash { .. })
        ));
        assert_eq!(ledger.cash(), dec!(149.5));
        assert_eq!(ledger.open_positions()[0].quantity, dec!(-1000));
        assert_eq!(ledger.trades().len(), 1);
    }

    #[test]
    fn test_max_positions_rejection() {
        let mut ledger = Ledger::new(&BacktestConfig {
            max_positions: 1,
            ..config(dec!(10000))
        });
        ledger.update_price("m1", "yes", dec!(0.50));
        ledger.update_price("m2", "yes", dec!(0.50));

        executed(ledger.apply_signal(
            &TradingSignal::buy("m1", "yes", dec!(10), 0.8, "first"),
            Some(dec!(0.50)),
            ts(1),
        ));
        let outcome = ledger.apply_signal(
            &TradingSignal::buy("m2", "yes", dec!(10), 0.8, "second"),
            Some(dec!(0.50)),
            ts(1),
        );

        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectionReason::MaxPositionsReached { limit: 1 })
        ));
        assert_eq!(ledger.trades().len(), 1);
    }

    #[test]
    fn test_position_size_rejection() {
        let mut ledger = Ledger::new(&BacktestConfig {
            max_position_size: 0.10,
            ..config(dec!(1000))
        });

        // 300 * 0.50 = 150 notional > 10% of 1000
        let outcome = ledger.apply_signal(
            &TradingSignal::buy("m1", "yes", dec!(300), 0.8, "too big"),
            Some(dec!(0.50)),
            ts(1),
        );

        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectionReason::PositionSizeExceeded { .. })
        ));
        assert!(ledger.trades().is_empty());
        assert_eq!(ledger.cash(), dec!(1000));
    }

    #[test]
    fn test_insufficient_cash_rejection() {
        let mut ledger = Ledger::new(&config(dec!(50)));

        // Notional 50 sits exactly at the size limit; the 0.50 fee pushes
        // the required debit past the available cash.
        let outcome = ledger.apply_signal(
            &TradingSignal::buy("m1", "yes", dec!(100), 0.8, "broke"),
            Some(dec!(0.50)),
            ts(1),
        );

        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectionReason::InsufficientCash { .. })
        ));
    }

    #[test]
    fn test_non_positive_quantity_rejection() {
        let mut ledger = Ledger::new(&config(dec!(10000)));
        let outcome = ledger.apply_signal(
            &TradingSignal::buy("m1", "yes", Decimal::ZERO, 0.8, "empty"),
            Some(dec!(0.50)),
            ts(1),
        );
        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectionReason::NonPositiveQuantity)
        ));
    }

    #[test]
    fn test_unquoted_signal_rejected() {
        let mut ledger = Ledger::new(&config(dec!(10000)));
        let outcome = ledger.apply_signal(
            &TradingSignal::buy("m1", "yes", dec!(10), 0.8, "early"),
            None,
            ts(1),
        );
        assert!(matches!(
            outcome,
            SignalOutcome::Rejected(RejectionReason::NoQuotedPrice)
        ));
        assert!(ledger.trades().is_empty());
    }
}
