use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::errors::CoreError;
use super::quote::{DividendEvent, QuoteBar, SplitEvent};

/// Closed set of instrument categories.
///
/// A total mapping in both directions — provider strings that don't map
/// cleanly become `Other` explicitly, never a silent string fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    Equity,
    Etf,
    MutualFund,
    Crypto,
    Currency,
    Index,
    Other,
}

impl InstrumentKind {
    /// Lenient mapping for provider `quoteType` strings (e.g. "EQUITY").
    #[must_use]
    pub fn from_provider(quote_type: &str) -> Self {
        match quote_type.to_uppercase().as_str() {
            "EQUITY" => Self::Equity,
            "ETF" => Self::Etf,
            "MUTUALFUND" => Self::MutualFund,
            "CRYPTOCURRENCY" => Self::Crypto,
            "CURRENCY" => Self::Currency,
            "INDEX" => Self::Index,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Equity => "Equity",
            Self::Etf => "ETF",
            Self::MutualFund => "Mutual Fund",
            Self::Crypto => "Crypto",
            Self::Currency => "Currency",
            Self::Index => "Index",
            Self::Other => "Other",
        };
        write!(f, "{s}")
    }
}

impl FromStr for InstrumentKind {
    type Err = CoreError;

    /// Strict parse for user input — unknown strings are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equity" | "stock" => Ok(Self::Equity),
            "etf" => Ok(Self::Etf),
            "mutual fund" | "mutualfund" | "fund" => Ok(Self::MutualFund),
            "crypto" | "cryptocurrency" => Ok(Self::Crypto),
            "currency" => Ok(Self::Currency),
            "index" => Ok(Self::Index),
            "other" => Ok(Self::Other),
            _ => Err(CoreError::ValidationError(format!(
                "Unknown instrument kind '{s}'"
            ))),
        }
    }
}

/// A tracked instrument with its cached quote history and corporate actions.
///
/// Invariants: `quotes`, `dividends`, and `splits` are strictly ascending
/// by date, maintained by sorted upsert. Manual assets (`from_api = false`)
/// are never refreshed from providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Ticker symbol, uppercased (e.g. "AAPL", "VWCE.DE").
    pub symbol: String,
    pub name: String,
    /// Native currency of quotes, dividends, and transaction amounts.
    pub currency: String,
    pub exchange: Option<String>,
    pub kind: InstrumentKind,
    /// Whether the asset was sourced from a quote provider.
    pub from_api: bool,
    pub quotes: Vec<QuoteBar>,
    pub dividends: Vec<DividendEvent>,
    pub splits: Vec<SplitEvent>,
}

impl Asset {
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        currency: impl Into<String>,
        kind: InstrumentKind,
        from_api: bool,
    ) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            name: name.into(),
            currency: currency.into().to_uppercase(),
            exchange: None,
            kind,
            from_api,
            quotes: Vec::new(),
            dividends: Vec::new(),
            splits: Vec::new(),
        }
    }

    /// A manually maintained asset that never receives provider refreshes.
    pub fn manual(
        symbol: impl Into<String>,
        name: impl Into<String>,
        currency: impl Into<String>,
        kind: InstrumentKind,
    ) -> Self {
        Self::new(symbol, name, currency, kind, false)
    }

    // ── Quote lookups ───────────────────────────────────────────────

    /// Close of the most recent bar, if any quotes exist.
    #[must_use]
    pub fn latest_close(&self) -> Option<f64> {
        self.quotes.last().map(|bar| bar.close)
    }

    /// Close at or immediately before `as_of`.
    pub fn close_at_or_before(&self, as_of: NaiveDate) -> Result<f64, CoreError> {
        let idx = self.quotes.partition_point(|bar| bar.date <= as_of);
        if idx == 0 {
            return Err(CoreError::NoDataBefore {
                symbol: self.symbol.clone(),
                date: as_of,
            });
        }
        Ok(self.quotes[idx - 1].close)
    }

    // ── Corporate actions ───────────────────────────────────────────

    /// Cumulative split ratio for splits with `after < date <= until`,
    /// applied in chronological order.
    #[must_use]
    pub fn split_factor_between(&self, after: NaiveDate, until: NaiveDate) -> f64 {
        self.splits
            .iter()
            .filter(|s| s.date > after && s.date <= until)
            .map(SplitEvent::ratio)
            .product()
    }

    /// Dividend events with `after < date <= until`, in chronological order.
    #[must_use]
    pub fn dividends_between(&self, after: NaiveDate, until: NaiveDate) -> Vec<&DividendEvent> {
        self.dividends
            .iter()
            .filter(|d| d.date > after && d.date <= until)
            .collect()
    }

    // ── Sorted upserts ──────────────────────────────────────────────

    /// Insert or replace the bar for its date, keeping quotes strictly
    /// ascending. O(log n) search, idempotent on re-merge.
    pub fn upsert_bar(&mut self, bar: QuoteBar) {
        match self.quotes.binary_search_by_key(&bar.date, |b| b.date) {
            Ok(idx) => self.quotes[idx] = bar,
            Err(idx) => self.quotes.insert(idx, bar),
        }
    }

    pub fn upsert_dividend(&mut self, dividend: DividendEvent) {
        match self
            .dividends
            .binary_search_by_key(&dividend.date, |d| d.date)
        {
            Ok(idx) => self.dividends[idx] = dividend,
            Err(idx) => self.dividends.insert(idx, dividend),
        }
    }

    pub fn upsert_split(&mut self, split: SplitEvent) {
        match self.splits.binary_search_by_key(&split.date, |s| s.date) {
            Ok(idx) => self.splits[idx] = split,
            Err(idx) => self.splits.insert(idx, split),
        }
    }
}

/// Symbol-keyed collection of assets with per-symbol refresh tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetBook {
    assets: HashMap<String, Asset>,
    /// Date each symbol was last refreshed from a provider. Used to limit
    /// refreshes to once per day.
    last_refreshed: HashMap<String, NaiveDate>,
}

impl AssetBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&Asset> {
        self.assets.get(&symbol.to_uppercase())
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut Asset> {
        self.assets.get_mut(&symbol.to_uppercase())
    }

    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.assets.contains_key(&symbol.to_uppercase())
    }

    /// Insert or replace an asset, keyed by its uppercased symbol.
    pub fn upsert(&mut self, asset: Asset) {
        self.assets.insert(asset.symbol.clone(), asset);
    }

    /// Remove an asset. The caller is responsible for checking that no
    /// transaction or template still references the symbol.
    pub fn remove(&mut self, symbol: &str) -> Option<Asset> {
        let key = symbol.to_uppercase();
        self.last_refreshed.remove(&key);
        self.assets.remove(&key)
    }

    /// All assets, sorted by symbol for deterministic iteration.
    #[must_use]
    pub fn all(&self) -> Vec<&Asset> {
        let mut assets: Vec<&Asset> = self.assets.values().collect();
        assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Whether the symbol was already refreshed on `today`.
    #[must_use]
    pub fn is_fresh(&self, symbol: &str, today: NaiveDate) -> bool {
        self.last_refreshed
            .get(&symbol.to_uppercase())
            .is_some_and(|&d| d == today)
    }

    pub fn mark_refreshed(&mut self, symbol: &str, today: NaiveDate) {
        self.last_refreshed.insert(symbol.to_uppercase(), today);
    }

    #[must_use]
    pub fn last_refreshed(&self, symbol: &str) -> Option<NaiveDate> {
        self.last_refreshed.get(&symbol.to_uppercase()).copied()
    }
}
