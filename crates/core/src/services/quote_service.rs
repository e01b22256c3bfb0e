use chrono::NaiveDate;
use log::{debug, warn};

use crate::errors::CoreError;
use crate::models::asset::Asset;
use crate::models::currency::REFERENCE_CURRENCY;
use crate::models::dataset::Dataset;
use crate::providers::registry::ProviderRegistry;
use crate::providers::traits::{Interval, QuoteSnapshot, SymbolCandidate};

/// Fetches market data and FX rates through the provider registry.
///
/// Refresh strategy:
/// - **Latest quotes**: once per day per symbol; an explicit refresh after
///   that is a no-op until the next day. Manual assets are never touched.
/// - **History backfill**: fetched on demand and merged via sorted upsert,
///   so cached bars survive and refetches are idempotent.
/// - Providers are tried in registration order with automatic fallback.
///
/// **Note on precision**: all prices are `f64` (~15-17 significant decimal
/// digits), which is sufficient here but accumulates small errors under
/// repeated arithmetic.
pub struct QuoteService {
    registry: ProviderRegistry,
}

impl QuoteService {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // ── Symbol lookup ───────────────────────────────────────────────

    /// Search providers for symbols matching a free-text query.
    pub async fn search(&self, query: &str) -> Result<Vec<SymbolCandidate>, CoreError> {
        let providers = self.registry.quote_providers();
        if providers.is_empty() {
            return Err(CoreError::NoProvider("quotes".into()));
        }
        let mut last_error = None;
        for provider in providers {
            match provider.search(query).await {
                Ok(candidates) => return Ok(candidates),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider("quotes".into())))
    }

    /// Register a provider-backed asset from its latest snapshot. The
    /// snapshot's close becomes the first cached bar, so the asset is
    /// valuable immediately.
    pub async fn add_asset_from_api(
        &self,
        dataset: &mut Dataset,
        symbol: &str,
    ) -> Result<(), CoreError> {
        let snapshot = self.fetch_latest(symbol).await?;
        let mut asset = Asset::new(
            snapshot.symbol.clone(),
            snapshot.name.clone().unwrap_or(snapshot.symbol.clone()),
            snapshot.currency.clone(),
            snapshot.kind,
            true,
        );
        asset.exchange = snapshot.exchange.clone();
        asset.upsert_bar(crate::models::quote::QuoteBar::flat(
            snapshot.date,
            snapshot.price,
        ));
        if !dataset.currencies.contains(&asset.currency) {
            warn!(
                "Asset {} quoted in {}, which has no exchange rate yet",
                asset.symbol, asset.currency
            );
        }
        dataset.assets.upsert(asset);
        dataset.assets.mark_refreshed(symbol, snapshot.date);
        Ok(())
    }

    // ── Quote refresh ───────────────────────────────────────────────

    /// Refresh latest quotes for every provider-backed asset not already
    /// refreshed today. Per-symbol failures are logged and skipped; the
    /// refresh never aborts halfway.
    ///
    /// Returns the symbols actually refreshed.
    pub async fn refresh_latest(&self, dataset: &mut Dataset) -> Result<Vec<String>, CoreError> {
        if !self.registry.has_quote_provider() {
            return Err(CoreError::NoProvider("quotes".into()));
        }
        let today = chrono::Utc::now().date_naive();
        let stale: Vec<String> = dataset
            .assets
            .all()
            .iter()
            .filter(|a| a.from_api && !dataset.assets.is_fresh(&a.symbol, today))
            .map(|a| a.symbol.clone())
            .collect();

        let mut refreshed = Vec::new();
        for symbol in stale {
            match self.fetch_latest(&symbol).await {
                Ok(snapshot) => {
                    if let Some(asset) = dataset.assets.get_mut(&symbol) {
                        asset.upsert_bar(crate::models::quote::QuoteBar::flat(
                            snapshot.date,
                            snapshot.price,
                        ));
                    }
                    dataset.assets.mark_refreshed(&symbol, today);
                    refreshed.push(symbol);
                }
                Err(e) => warn!("Skipping quote refresh for {symbol}: {e}"),
            }
        }
        Ok(refreshed)
    }

    /// Backfill historical bars and corporate actions for one symbol over
    /// `[from, to]`. Existing bars are kept; overlapping dates are replaced.
    pub async fn backfill_history(
        &self,
        dataset: &mut Dataset,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: Interval,
    ) -> Result<usize, CoreError> {
        let asset = dataset
            .assets
            .get(symbol)
            .ok_or_else(|| CoreError::AssetNotFound(symbol.to_string()))?;
        if !asset.from_api {
            return Err(CoreError::ValidationError(format!(
                "Asset {symbol} is manually maintained and cannot be backfilled"
            )));
        }
        if from > to {
            return Err(CoreError::ValidationError(format!(
                "'from' date ({from}) must not be after 'to' date ({to})"
            )));
        }

        let providers = self.registry.quote_providers();
        let mut last_error = None;
        for provider in providers {
            match provider.history(symbol, from, to, interval).await {
                Ok(history) => {
                    debug!(
                        "Backfilled {} bars for {symbol} from {}",
                        history.bars.len(),
                        provider.name()
                    );
                    let asset = dataset
                        .assets
                        .get_mut(symbol)
                        .ok_or_else(|| CoreError::AssetNotFound(symbol.to_string()))?;
                    let count = history.bars.len();
                    for bar in history.bars {
                        asset.upsert_bar(bar);
                    }
                    for dividend in history.dividends {
                        asset.upsert_dividend(dividend);
                    }
                    for split in history.splits {
                        asset.upsert_split(split);
                    }
                    return Ok(count);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider("quotes".into())))
    }

    // ── FX rates ────────────────────────────────────────────────────

    /// Refresh the rate-to-reference of every known currency.
    ///
    /// Providers quote units-of-code per one unit of base; with the
    /// reference as base, the stored rate (reference units per one unit of
    /// code) is the inverse of what the provider returns. Currencies the
    /// provider doesn't cover keep their manual rates.
    pub async fn refresh_rates(&self, dataset: &mut Dataset) -> Result<usize, CoreError> {
        let providers = self.registry.fx_providers();
        if providers.is_empty() {
            return Err(CoreError::NoProvider("FX rates".into()));
        }

        let codes: Vec<String> = dataset
            .currencies
            .codes()
            .into_iter()
            .filter(|c| c != REFERENCE_CURRENCY)
            .collect();
        if codes.is_empty() {
            return Ok(0);
        }

        let mut last_error = None;
        for provider in providers {
            match provider.latest_rates(REFERENCE_CURRENCY, &codes).await {
                Ok(per_reference) => {
                    let mut updated = 0;
                    for (code, units_per_reference) in per_reference {
                        if !(units_per_reference.is_finite() && units_per_reference > 0.0) {
                            warn!(
                                "Ignoring invalid rate {units_per_reference} for {code} from {}",
                                provider.name()
                            );
                            continue;
                        }
                        dataset
                            .currencies
                            .set_rate(&code, 1.0 / units_per_reference)?;
                        updated += 1;
                    }
                    return Ok(updated);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider("FX rates".into())))
    }

    /// Historical rate-to-reference for one currency on a past date.
    pub async fn historical_rate(
        &self,
        code: &str,
        date: NaiveDate,
    ) -> Result<f64, CoreError> {
        let providers = self.registry.fx_providers();
        if providers.is_empty() {
            return Err(CoreError::NoProvider("FX rates".into()));
        }
        let mut last_error = None;
        for provider in providers {
            match provider
                .historical_rate(code, REFERENCE_CURRENCY, date)
                .await
            {
                Ok(units_per_reference) => {
                    if !(units_per_reference.is_finite() && units_per_reference > 0.0) {
                        last_error = Some(CoreError::Api {
                            provider: provider.name().to_string(),
                            message: format!(
                                "Invalid rate {units_per_reference} for {code} on {date}"
                            ),
                        });
                        continue;
                    }
                    return Ok(1.0 / units_per_reference);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider("FX rates".into())))
    }

    // ── Internal ────────────────────────────────────────────────────

    /// Latest snapshot with provider fallback and price validation.
    async fn fetch_latest(&self, symbol: &str) -> Result<QuoteSnapshot, CoreError> {
        let providers = self.registry.quote_providers();
        if providers.is_empty() {
            return Err(CoreError::NoProvider("quotes".into()));
        }
        let mut last_error = None;
        for provider in providers {
            match provider.latest(symbol).await {
                Ok(snapshot) => {
                    if !snapshot.price.is_finite() || snapshot.price < 0.0 {
                        last_error = Some(CoreError::Api {
                            provider: provider.name().to_string(),
                            message: format!(
                                "Invalid price returned for {symbol}: {} (must be finite and non-negative)",
                                snapshot.price
                            ),
                        });
                        continue;
                    }
                    return Ok(snapshot);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider("quotes".into())))
    }
}
