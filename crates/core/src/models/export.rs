use serde::{Deserialize, Serialize};

use super::institution::Institution;
use super::portfolio::Portfolio;
use super::transaction::{RecurringTemplate, Transaction};

/// Read-only export of a user's data: real portfolios, their transactions
/// and templates, and only the institutions those portfolios reference.
/// The virtual "All" portfolio is never part of an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub portfolios: Vec<Portfolio>,
    pub transactions: Vec<Transaction>,
    pub templates: Vec<RecurringTemplate>,
    pub institutions: Vec<Institution>,
}
