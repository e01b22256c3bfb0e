use serde::{Deserialize, Serialize};

/// User-configurable settings, stored inside the encrypted snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Display currency for aggregate views such as the "All" portfolio.
    /// Changing it is a settings edit only — stored exchange rates stay
    /// relative to the fixed reference currency.
    pub default_currency: String,

    /// Timeout applied to quote/FX provider requests.
    pub quote_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            quote_timeout_secs: 30,
        }
    }
}
