use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::TransactionKind;

/// One instrument position inside a holdings report.
///
/// `current_value` and `unrealized_gain_loss` are `None` when the quote or
/// currency lookup for the symbol failed — the position itself is still
/// reported, together with a warning, so one bad symbol never blocks the
/// rest of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    /// Weighted-average cost per unit, in the reporting currency.
    pub average_cost: f64,
    /// Total cost basis (`quantity * average_cost`), in the reporting currency.
    pub cost_basis: f64,
    pub current_value: Option<f64>,
    pub unrealized_gain_loss: Option<f64>,
}

/// Cash held in one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashBalance {
    pub currency: String,
    pub amount: f64,
}

/// A non-fatal problem encountered while replaying or valuing a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationWarning {
    pub portfolio_id: i64,
    pub symbol: Option<String>,
    pub date: NaiveDateTime,
    /// Id of the offending transaction, if attributable to one.
    pub transaction_id: Option<Uuid>,
    pub message: String,
}

impl std::fmt::Display for AggregationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "portfolio {} {} on {}: {}",
            self.portfolio_id,
            self.symbol.as_deref().unwrap_or("-"),
            self.date,
            self.message
        )
    }
}

/// Aggregated state of one portfolio (or the "All" aggregate) at a point
/// in time: positions, cash, realized results, and total valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingsReport {
    pub portfolio_id: i64,
    pub as_of: NaiveDateTime,
    /// Reporting currency all monetary fields are expressed in.
    pub currency: String,
    /// Positions sorted by symbol.
    pub holdings: Vec<Holding>,
    /// Cash balances sorted by currency.
    pub cash: Vec<CashBalance>,
    pub realized_gain_loss: f64,
    pub dividend_income: f64,
    /// Sum of valued positions and cash. Positions whose value degraded to
    /// unknown are excluded and flagged in `warnings`.
    pub total_value: f64,
    pub warnings: Vec<AggregationWarning>,
}

impl HoldingsReport {
    #[must_use]
    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        let upper = symbol.to_uppercase();
        self.holdings.iter().find(|h| h.symbol == upper)
    }

    #[must_use]
    pub fn cash_in(&self, currency: &str) -> f64 {
        let upper = currency.to_uppercase();
        self.cash
            .iter()
            .find(|c| c.currency == upper)
            .map_or(0.0, |c| c.amount)
    }
}

/// A ledger event annotated onto a valuation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationEntry {
    pub kind: TransactionKind,
    pub symbol: Option<String>,
    pub quantity: f64,
}

/// Daily portfolio value for chart rendering. Days without quote data
/// carry the last known value forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationPoint {
    pub date: NaiveDate,
    /// Portfolio value in the reporting currency.
    pub value: f64,
    /// Ledger activity on this date.
    pub entries: Vec<ValuationEntry>,
}
