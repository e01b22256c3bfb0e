use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;

/// The fixed reference currency all exchange rates are stored against.
///
/// Rates are deliberately NOT stored relative to the user's display
/// currency: changing the display currency is then a settings edit, not a
/// rewrite of every stored rate.
pub const REFERENCE_CURRENCY: &str = "USD";

/// Exchange-rate table: currency code → multiplicative factor converting
/// one unit of that currency into the reference currency.
///
/// `rate(REFERENCE_CURRENCY)` is pinned at 1.0 and cannot be changed or
/// removed. Any-to-any conversion routes through the reference:
/// `amount_in_to = amount * rate(from) / rate(to)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyTable {
    rates: HashMap<String, f64>,
}

impl Default for CurrencyTable {
    fn default() -> Self {
        let mut rates = HashMap::new();
        rates.insert(REFERENCE_CURRENCY.to_string(), 1.0);
        Self { rates }
    }
}

impl CurrencyTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored rate-to-reference for a currency code.
    pub fn rate(&self, code: &str) -> Result<f64, CoreError> {
        let key = code.trim().to_uppercase();
        self.rates
            .get(&key)
            .copied()
            .ok_or(CoreError::UnknownCurrency { code: key })
    }

    /// Convert an amount between any two known currencies.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, CoreError> {
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to)?;
        Ok(amount * from_rate / to_rate)
    }

    /// Insert or update a currency's rate-to-reference.
    ///
    /// The code must be exactly 3 ASCII letters; the rate must be positive
    /// and finite. The reference currency's rate cannot be changed.
    pub fn set_rate(&mut self, code: &str, rate: f64) -> Result<(), CoreError> {
        let key = validate_code(code)?;
        if key == REFERENCE_CURRENCY && (rate - 1.0).abs() > f64::EPSILON {
            return Err(CoreError::ValidationError(format!(
                "Rate of the reference currency {REFERENCE_CURRENCY} is fixed at 1.0"
            )));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CoreError::ValidationError(format!(
                "Exchange rate for {key} must be positive and finite, got {rate}"
            )));
        }
        self.rates.insert(key, rate);
        Ok(())
    }

    /// Remove a currency from the table. The reference currency is refused;
    /// the caller must additionally refuse the current display currency.
    pub fn remove(&mut self, code: &str) -> Result<(), CoreError> {
        let key = code.trim().to_uppercase();
        if key == REFERENCE_CURRENCY {
            return Err(CoreError::ValidationError(format!(
                "Reference currency {REFERENCE_CURRENCY} cannot be removed"
            )));
        }
        if self.rates.remove(&key).is_none() {
            return Err(CoreError::UnknownCurrency { code: key });
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.rates.contains_key(&code.trim().to_uppercase())
    }

    /// All known codes, sorted for deterministic iteration.
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.rates.keys().cloned().collect();
        codes.sort();
        codes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Validate and normalize a currency code: exactly 3 ASCII letters, uppercased.
pub fn validate_code(code: &str) -> Result<String, CoreError> {
    let trimmed = code.trim().to_uppercase();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::ValidationError(format!(
            "Invalid currency code '{code}': must be exactly 3 ASCII letters (e.g., USD, EUR, PLN)"
        )));
    }
    Ok(trimmed)
}
