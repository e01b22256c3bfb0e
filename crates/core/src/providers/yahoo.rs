use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::asset::InstrumentKind;
use crate::models::quote::{DividendEvent, QuoteBar, SplitEvent};
use super::traits::{Interval, QuoteHistory, QuoteProvider, QuoteSnapshot, SymbolCandidate};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";

/// Yahoo Finance quote provider, consuming the chart and search endpoints
/// directly.
///
/// - **Free**: no API key required (unofficial public API).
/// - **Coverage**: global equities, ETFs, indices, mutual funds, crypto.
/// - The chart endpoint returns the series AND dividend/split events in a
///   single payload (`events=div,split`), so a history backfill needs one
///   round-trip per symbol.
///
/// Prices come back in the instrument's native currency; conversion to a
/// reporting currency happens in the aggregation layer.
pub struct YahooProvider {
    client: Client,
}

impl YahooProvider {
    /// Build a provider with the given request timeout. Expiry surfaces
    /// to callers as `QuoteUnavailable` for the affected symbol only.
    pub fn new(timeout_secs: u64) -> Self {
        let mut headers = HeaderMap::new();
        // Yahoo rejects requests without a browser User-Agent.
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        );
        let builder = Client::builder().default_headers(headers);
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(timeout_secs));
        #[cfg(target_arch = "wasm32")]
        let _ = timeout_secs;
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
        }
    }

    async fn fetch_chart(&self, symbol: &str, query: &str) -> Result<ChartData, CoreError> {
        let url = format!(
            "{CHART_URL}/{}?{query}",
            urlencoding::encode(&symbol.to_uppercase())
        );
        log::debug!("Fetching Yahoo chart for {symbol}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            CoreError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: CoreError::from(e).to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let payload: ChartResponse = response.json().await.map_err(|e| CoreError::Api {
            provider: "Yahoo Finance".into(),
            message: format!("Failed to parse chart response for {symbol}: {e}"),
        })?;

        if let Some(error) = payload.chart.error {
            return Err(CoreError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: format!("{}: {}", error.code, error.description),
            });
        }

        payload
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| CoreError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: "empty chart result".into(),
            })
    }
}

/// Epoch seconds → calendar date. Returns `None` for out-of-range stamps.
fn timestamp_to_date(ts: i64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl QuoteProvider for YahooProvider {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolCandidate>, CoreError> {
        let url = format!(
            "{SEARCH_URL}?q={}&quotesCount=10&newsCount=0",
            urlencoding::encode(query)
        );
        log::debug!("Searching Yahoo symbols for '{query}'");

        let payload: SearchResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "Yahoo Finance".into(),
                message: format!("Failed to parse search response: {e}"),
            })?;

        let candidates = payload
            .quotes
            .into_iter()
            .filter_map(|q| {
                let symbol = q.symbol?;
                let name = q.longname.or(q.shortname).unwrap_or_else(|| symbol.clone());
                Some(SymbolCandidate {
                    symbol,
                    name,
                    exchange: q.exchange,
                    kind: InstrumentKind::from_provider(q.quote_type.as_deref().unwrap_or("")),
                })
            })
            .collect();
        Ok(candidates)
    }

    async fn latest(&self, symbol: &str) -> Result<QuoteSnapshot, CoreError> {
        let data = self.fetch_chart(symbol, "interval=1d&range=5d").await?;
        let meta = data.meta;

        let price = meta
            .regular_market_price
            .ok_or_else(|| CoreError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: "no regular market price in payload".into(),
            })?;
        if !price.is_finite() || price < 0.0 {
            return Err(CoreError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: format!("invalid price {price}"),
            });
        }

        let date = meta
            .regular_market_time
            .and_then(timestamp_to_date)
            .unwrap_or_else(|| chrono::Utc::now().date_naive());

        Ok(QuoteSnapshot {
            symbol: meta.symbol.unwrap_or_else(|| symbol.to_uppercase()),
            price,
            currency: meta.currency.unwrap_or_else(|| "USD".into()).to_uppercase(),
            exchange: meta.exchange_name,
            kind: InstrumentKind::from_provider(meta.instrument_type.as_deref().unwrap_or("")),
            name: meta.long_name.or(meta.short_name),
            date,
        })
    }

    async fn history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: Interval,
    ) -> Result<QuoteHistory, CoreError> {
        let from_ts = from.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let to_ts = to
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(from_ts);

        let query = format!(
            "period1={from_ts}&period2={to_ts}&interval={interval}&events=div,split"
        );
        let data = self.fetch_chart(symbol, &query).await?;

        let timestamps = data.timestamp.unwrap_or_default();
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .unwrap_or_default();
        let adjclose = data
            .indicators
            .adjclose
            .and_then(|blocks| blocks.into_iter().next())
            .and_then(|b| b.adjclose)
            .unwrap_or_default();

        let mut history = QuoteHistory::default();

        for (i, ts) in timestamps.iter().enumerate() {
            let Some(date) = timestamp_to_date(*ts) else {
                continue;
            };
            // Bars with a null close are non-trading gaps; skip them.
            let Some(close) = field(&quote.close, i) else {
                continue;
            };
            history.bars.push(QuoteBar {
                date,
                open: field(&quote.open, i).unwrap_or(close),
                high: field(&quote.high, i).unwrap_or(close),
                low: field(&quote.low, i).unwrap_or(close),
                close,
                adjclose: adjclose.get(i).copied().flatten().unwrap_or(close),
                volume: field(&quote.volume, i).unwrap_or(0),
            });
        }

        if let Some(events) = data.events {
            for payload in events.dividends.unwrap_or_default().into_values() {
                if let Some(date) = timestamp_to_date(payload.date) {
                    history.dividends.push(DividendEvent {
                        date,
                        amount: payload.amount,
                    });
                }
            }
            for payload in events.splits.unwrap_or_default().into_values() {
                if let Some(date) = timestamp_to_date(payload.date) {
                    // Yahoo reports ratios as floats; actual splits are
                    // integral, so round rather than truncate.
                    history.splits.push(SplitEvent {
                        date,
                        numerator: payload.numerator.round().max(1.0) as u32,
                        denominator: payload.denominator.round().max(1.0) as u32,
                    });
                }
            }
        }

        history.bars.sort_by_key(|b| b.date);
        history.bars.dedup_by_key(|b| b.date);
        history.dividends.sort_by_key(|d| d.date);
        history.splits.sort_by_key(|s| s.date);
        Ok(history)
    }
}

fn field<T: Copy>(column: &Option<Vec<Option<T>>>, i: usize) -> Option<T> {
    column.as_ref().and_then(|v| v.get(i).copied().flatten())
}

// ── Yahoo chart API response types ──────────────────────────────────

#[derive(Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ChartData {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: ChartIndicators,
    events: Option<ChartEvents>,
}

#[derive(Deserialize)]
struct ChartMeta {
    symbol: Option<String>,
    currency: Option<String>,
    #[serde(rename = "exchangeName")]
    exchange_name: Option<String>,
    #[serde(rename = "instrumentType")]
    instrument_type: Option<String>,
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "regularMarketTime")]
    regular_market_time: Option<i64>,
    #[serde(rename = "longName")]
    long_name: Option<String>,
    #[serde(rename = "shortName")]
    short_name: Option<String>,
}

#[derive(Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
    adjclose: Option<Vec<AdjCloseColumn>>,
}

#[derive(Default, Deserialize)]
struct QuoteColumns {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

#[derive(Deserialize)]
struct AdjCloseColumn {
    adjclose: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize)]
struct ChartEvents {
    dividends: Option<HashMap<String, DividendPayload>>,
    splits: Option<HashMap<String, SplitPayload>>,
}

#[derive(Deserialize)]
struct DividendPayload {
    date: i64,
    amount: f64,
}

#[derive(Deserialize)]
struct SplitPayload {
    date: i64,
    numerator: f64,
    denominator: f64,
}

// ── Yahoo search API response types ─────────────────────────────────

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Deserialize)]
struct SearchQuote {
    symbol: Option<String>,
    shortname: Option<String>,
    longname: Option<String>,
    exchange: Option<String>,
    #[serde(rename = "quoteType")]
    quote_type: Option<String>,
}
