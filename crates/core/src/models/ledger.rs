use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::{Transaction, TransactionKind};

/// Where a ledger entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryOrigin {
    /// A stored transaction row.
    Stored,
    /// A virtual occurrence expanded from a recurring template.
    Recurring { template_id: Uuid },
}

/// Which side of a transfer a portfolio view sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Outflow from the viewed portfolio.
    Out,
    /// Inflow into the viewed portfolio.
    In,
}

/// One row of a portfolio's merged ledger view.
///
/// A single stored transfer row appears as `Out` in the source portfolio's
/// view and `In` in the target's; the "All" view carries it once with
/// `transfer = None`, where it nets to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub transaction: Transaction,
    pub origin: EntryOrigin,
    pub transfer: Option<TransferDirection>,
}

impl LedgerEntry {
    /// Signed effect of this entry on the viewed portfolio's position in
    /// its subject (instrument units, or cash for cash-only rows).
    /// Inflows are positive; rows with no quantity effect are zero.
    #[must_use]
    pub fn signed_quantity(&self) -> f64 {
        match self.transaction.kind {
            TransactionKind::Buy | TransactionKind::Deposit => self.transaction.quantity,
            TransactionKind::Sell | TransactionKind::Withdraw => -self.transaction.quantity,
            TransactionKind::Dividend => 0.0,
            TransactionKind::Transfer => match self.transfer {
                Some(TransferDirection::Out) => -self.transaction.quantity,
                Some(TransferDirection::In) => self.transaction.quantity,
                // "All" view: both sides cancel.
                None => 0.0,
            },
        }
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self.origin, EntryOrigin::Recurring { .. })
    }
}

/// Options for ledger listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerOptions {
    /// Include system-generated housekeeping rows.
    pub include_housekeeping: bool,
}
