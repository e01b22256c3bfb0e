use serde::{Deserialize, Serialize};

/// Sentinel id of the virtual "All" portfolio: the symbol-wise aggregate of
/// every real portfolio, with inter-portfolio transfers netted out. Never
/// stored, never exported. All real portfolios have `id >= 0`.
pub const ALL_PORTFOLIO_ID: i64 = -1;

/// A user-defined portfolio of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    /// Reporting currency: aggregated values for this portfolio are
    /// expressed in it.
    pub currency: String,
    pub institution_id: Option<i64>,
    /// UI selection flag — at most one portfolio is selected at a time.
    #[serde(default)]
    pub selected: bool,
}

impl Portfolio {
    pub fn new(id: i64, name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            currency: currency.into().to_uppercase(),
            institution_id: None,
            selected: false,
        }
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.id < 0
    }
}
