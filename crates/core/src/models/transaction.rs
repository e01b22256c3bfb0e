use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recurrence::Recurrence;

/// Kind of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Acquire units of an instrument for cash.
    Buy,
    /// Dispose of units of an instrument for cash.
    Sell,
    /// Cash dividend received (per-unit amount in `price`).
    Dividend,
    /// Cash paid into a portfolio.
    Deposit,
    /// Cash taken out of a portfolio.
    Withdraw,
    /// Move units or cash to another portfolio. The only kind carrying
    /// `target_portfolio_id`; no gain or loss is realized.
    Transfer,
}

impl TransactionKind {
    /// Kinds that always operate on cash only (no instrument reference).
    #[must_use]
    pub fn is_cash_only(&self) -> bool {
        matches!(self, Self::Deposit | Self::Withdraw)
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
            Self::Dividend => "Dividend",
            Self::Deposit => "Deposit",
            Self::Withdraw => "Withdraw",
            Self::Transfer => "Transfer",
        };
        write!(f, "{s}")
    }
}

/// Reference to the traded instrument: its symbol plus whether the asset
/// record was sourced from a provider (two assets may share a symbol if
/// one is manual).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRef {
    pub symbol: String,
    pub from_api: bool,
}

impl InstrumentRef {
    pub fn new(symbol: impl Into<String>, from_api: bool) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            from_api,
        }
    }
}

/// A concrete, dated ledger entry.
///
/// `instrument = None` marks a cash-only row (Deposit, Withdraw, or a cash
/// Transfer); `quantity` is then the cash amount and `price` is ignored.
/// All magnitudes are non-negative; amounts are denominated in `currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Owning portfolio. For transfers this is the source side.
    pub portfolio_id: i64,
    pub kind: TransactionKind,
    pub instrument: Option<InstrumentRef>,
    pub quantity: f64,
    /// Per-unit price in `currency`. For Dividend rows, the per-unit payout.
    pub price: f64,
    pub commission: f64,
    pub tax: f64,
    pub currency: String,
    pub date: NaiveDateTime,
    /// Counterparty portfolio — set exactly when `kind` is `Transfer`.
    pub target_portfolio_id: Option<i64>,
    /// System-generated rows (e.g. auto-conversion adjustments), hidden
    /// from user-facing listings by default.
    #[serde(default)]
    pub housekeeping: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Transaction {
    /// A transaction against an instrument (Buy, Sell, Dividend, or an
    /// in-kind Transfer).
    pub fn asset(
        portfolio_id: i64,
        kind: TransactionKind,
        instrument: InstrumentRef,
        quantity: f64,
        price: f64,
        currency: impl Into<String>,
        date: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            portfolio_id,
            kind,
            instrument: Some(instrument),
            quantity,
            price,
            commission: 0.0,
            tax: 0.0,
            currency: currency.into().to_uppercase(),
            date,
            target_portfolio_id: None,
            housekeeping: false,
            notes: None,
        }
    }

    /// A cash-only transaction (Deposit, Withdraw, or a cash Transfer).
    pub fn cash(
        portfolio_id: i64,
        kind: TransactionKind,
        amount: f64,
        currency: impl Into<String>,
        date: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            portfolio_id,
            kind,
            instrument: None,
            quantity: amount,
            price: 0.0,
            commission: 0.0,
            tax: 0.0,
            currency: currency.into().to_uppercase(),
            date,
            target_portfolio_id: None,
            housekeeping: false,
            notes: None,
        }
    }

    pub fn with_costs(mut self, commission: f64, tax: f64) -> Self {
        self.commission = commission;
        self.tax = tax;
        self
    }

    pub fn with_target(mut self, target_portfolio_id: i64) -> Self {
        self.target_portfolio_id = Some(target_portfolio_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn as_housekeeping(mut self) -> Self {
        self.housekeeping = true;
        self
    }

    /// Whether this row moves units or cash to a counterparty portfolio.
    #[must_use]
    pub fn is_transfer(&self) -> bool {
        self.kind == TransactionKind::Transfer
    }
}

/// A recurring-transaction template.
///
/// Deliberately a distinct type from [`Transaction`]: a template carries no
/// executed date and is never summed into holdings — only its expanded
/// occurrences are. `materialized_until` is the high-water mark at or below
/// which occurrences have already been converted into stored rows, so
/// expansion and materialized rows never double-count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub id: Uuid,
    pub portfolio_id: i64,
    pub kind: TransactionKind,
    pub instrument: Option<InstrumentRef>,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub tax: f64,
    pub currency: String,
    pub recurrence: Recurrence,
    /// Occurrences before `start` are never generated.
    pub start: NaiveDateTime,
    /// Inclusive end of the schedule, open-ended if `None`.
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub materialized_until: Option<NaiveDateTime>,
    pub target_portfolio_id: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RecurringTemplate {
    pub fn new(
        portfolio_id: i64,
        kind: TransactionKind,
        instrument: Option<InstrumentRef>,
        quantity: f64,
        price: f64,
        currency: impl Into<String>,
        recurrence: Recurrence,
        start: NaiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            portfolio_id,
            kind,
            instrument,
            quantity,
            price,
            commission: 0.0,
            tax: 0.0,
            currency: currency.into().to_uppercase(),
            recurrence,
            start,
            end: None,
            materialized_until: None,
            target_portfolio_id: None,
            notes: None,
        }
    }

    pub fn with_costs(mut self, commission: f64, tax: f64) -> Self {
        self.commission = commission;
        self.tax = tax;
        self
    }

    pub fn with_end(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_target(mut self, target_portfolio_id: i64) -> Self {
        self.target_portfolio_id = Some(target_portfolio_id);
        self
    }

    /// Structural copy of the template as a virtual transaction dated at
    /// one occurrence. Reuses the template id so that expansion stays a
    /// pure function of the template and the window.
    #[must_use]
    pub fn instantiate(&self, at: NaiveDateTime) -> Transaction {
        Transaction {
            id: self.id,
            portfolio_id: self.portfolio_id,
            kind: self.kind,
            instrument: self.instrument.clone(),
            quantity: self.quantity,
            price: self.price,
            commission: self.commission,
            tax: self.tax,
            currency: self.currency.clone(),
            date: at,
            target_portfolio_id: self.target_portfolio_id,
            housekeeping: false,
            notes: self.notes.clone(),
        }
    }

    /// Materialize one occurrence as a brand-new stored transaction.
    #[must_use]
    pub fn materialize(&self, at: NaiveDateTime) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            ..self.instantiate(at)
        }
    }
}
