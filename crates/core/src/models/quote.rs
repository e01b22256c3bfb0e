use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One OHLCV bar for a single trading interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjclose: f64,
    pub volume: u64,
}

impl QuoteBar {
    /// A flat bar where every price field equals `price`.
    /// Used for manual quote entry and single-snapshot refreshes.
    #[must_use]
    pub fn flat(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            adjclose: price,
            volume: 0,
        }
    }
}

/// A cash dividend paid per held unit on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub date: NaiveDate,
    /// Amount per unit, in the asset's native currency.
    pub amount: f64,
}

/// A stock split expressed as `numerator:denominator` (e.g. 2:1).
///
/// Holdings acquired before the split are multiplied by the ratio;
/// per-unit cost divides by it, so total cost basis is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEvent {
    pub date: NaiveDate,
    pub numerator: u32,
    pub denominator: u32,
}

impl SplitEvent {
    #[must_use]
    pub fn ratio(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }
}
