use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::CoreError;
use crate::models::asset::InstrumentKind;
use crate::models::quote::{DividendEvent, QuoteBar, SplitEvent};

/// Sampling interval for historical series requests.
///
/// Closed enumeration of the values quote providers accept; anything else
/// is rejected at parse time instead of being passed through to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
    NinetyMinutes,
    OneHour,
    OneDay,
    FiveDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
}

impl Interval {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::TwoMinutes => "2m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::SixtyMinutes => "60m",
            Self::NinetyMinutes => "90m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneWeek => "1wk",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::OneMinute),
            "2m" => Ok(Self::TwoMinutes),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "60m" => Ok(Self::SixtyMinutes),
            "90m" => Ok(Self::NinetyMinutes),
            "1h" => Ok(Self::OneHour),
            "1d" => Ok(Self::OneDay),
            "5d" => Ok(Self::FiveDays),
            "1wk" => Ok(Self::OneWeek),
            "1mo" => Ok(Self::OneMonth),
            "3mo" => Ok(Self::ThreeMonths),
            _ => Err(CoreError::ValidationError(format!(
                "Invalid interval '{s}' (expected one of 1m,2m,5m,15m,30m,60m,90m,1h,1d,5d,1wk,1mo,3mo)"
            ))),
        }
    }
}

/// Latest price snapshot for a symbol, with enough metadata to register
/// the asset locally.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub price: f64,
    pub currency: String,
    pub exchange: Option<String>,
    pub kind: InstrumentKind,
    pub name: Option<String>,
    pub date: NaiveDate,
}

/// One hit from a symbol search.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolCandidate {
    pub symbol: String,
    pub name: String,
    pub exchange: Option<String>,
    pub kind: InstrumentKind,
}

/// Historical series plus the corporate actions inside the window,
/// fetched in one provider round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteHistory {
    pub bars: Vec<QuoteBar>,
    pub dividends: Vec<DividendEvent>,
    pub splits: Vec<SplitEvent>,
}

/// Trait abstraction for market-data providers.
///
/// If a provider's API stops working or changes, only its implementation
/// is replaced — the services above are untouched.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Search for symbols matching a free-text query.
    async fn search(&self, query: &str) -> Result<Vec<SymbolCandidate>, CoreError>;

    /// Latest price snapshot for a symbol.
    async fn latest(&self, symbol: &str) -> Result<QuoteSnapshot, CoreError>;

    /// Historical series for `[from, to]` at the given interval, including
    /// dividend and split events in the window.
    async fn history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: Interval,
    ) -> Result<QuoteHistory, CoreError>;
}

/// Trait abstraction for foreign-exchange rate providers.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait FxRateProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Latest rates quoted as units of each `code` per one unit of `base`.
    async fn latest_rates(
        &self,
        base: &str,
        codes: &[String],
    ) -> Result<HashMap<String, f64>, CoreError>;

    /// Rate of `code` per one unit of `base` on a past date.
    async fn historical_rate(
        &self,
        code: &str,
        base: &str,
        date: NaiveDate,
    ) -> Result<f64, CoreError>;
}
