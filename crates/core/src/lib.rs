pub mod errors;
pub mod models;
pub mod providers;
pub mod recurrence;
pub mod services;
pub mod storage;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use errors::CoreError;
use models::{
    asset::Asset,
    currency::validate_code,
    dataset::Dataset,
    export::ExportSnapshot,
    holdings::{HoldingsReport, ValuationPoint},
    ledger::{LedgerEntry, LedgerOptions},
    portfolio::{Portfolio, ALL_PORTFOLIO_ID},
    settings::Settings,
    transaction::{RecurringTemplate, Transaction},
};
use providers::identity::{Credentials, IdentityProvider, Session};
use providers::registry::ProviderRegistry;
use providers::traits::{Interval, SymbolCandidate};
use services::{
    aggregation_service::AggregationService, export_service::ExportService,
    ledger_service::LedgerService, portfolio_service::PortfolioService,
    quote_service::QuoteService,
};
use storage::manager::StorageManager;

/// Main entry point for the portfolio tracker core library.
/// Holds the dataset and all services needed to operate on it.
#[must_use]
pub struct PortfolioTracker {
    dataset: Dataset,
    portfolio_service: PortfolioService,
    ledger_service: LedgerService,
    aggregation_service: AggregationService,
    quote_service: QuoteService,
    export_service: ExportService,
    /// Tracks whether any mutation has occurred since the last save/load.
    dirty: bool,
}

impl std::fmt::Debug for PortfolioTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioTracker")
            .field("portfolios", &self.dataset.portfolios.len())
            .field("transactions", &self.dataset.transactions.len())
            .field("templates", &self.dataset.templates.len())
            .field("assets", &self.dataset.assets.len())
            .field("settings", &self.dataset.settings)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl PortfolioTracker {
    /// Create a brand new empty dataset with default settings.
    pub fn create_new() -> Self {
        Self::build(Dataset::new())
    }

    /// Load an existing dataset from encrypted bytes (password required).
    /// Use this for WASM / Tauri where the frontend handles file I/O.
    pub fn load_from_bytes(encrypted: &[u8], password: &str) -> Result<Self, CoreError> {
        let dataset = StorageManager::load_from_bytes(encrypted, password)?;
        Ok(Self::build(dataset))
    }

    /// Save the current dataset to encrypted bytes.
    /// Returns raw bytes that the frontend can write to a file.
    /// Clears the unsaved-changes flag on success.
    pub fn save_to_bytes(&mut self, password: &str) -> Result<Vec<u8>, CoreError> {
        let bytes = StorageManager::save_to_bytes(&self.dataset, password)?;
        self.dirty = false;
        Ok(bytes)
    }

    /// Load from an encrypted file on disk (native only, not WASM).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str, password: &str) -> Result<Self, CoreError> {
        let dataset = StorageManager::load_from_file(path, password)?;
        Ok(Self::build(dataset))
    }

    /// Save to an encrypted file on disk (native only, not WASM).
    /// Clears the unsaved-changes flag on success.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(&mut self, path: &str, password: &str) -> Result<(), CoreError> {
        StorageManager::save_to_file(&self.dataset, path, password)?;
        self.dirty = false;
        Ok(())
    }

    /// Re-encrypt the dataset with a new password.
    /// Returns the encrypted bytes. The caller should write them to storage.
    ///
    /// `last_saved_bytes` must be the most recently saved encrypted bytes
    /// for this dataset; the current password is verified by decrypting
    /// them. Returns `CoreError::Decryption` if verification fails.
    pub fn change_password(
        &mut self,
        last_saved_bytes: &[u8],
        current_password: &str,
        new_password: &str,
    ) -> Result<Vec<u8>, CoreError> {
        StorageManager::load_from_bytes(last_saved_bytes, current_password)?;
        let new_bytes = StorageManager::save_to_bytes(&self.dataset, new_password)?;
        self.dirty = false;
        Ok(new_bytes)
    }

    /// Returns `true` if the dataset has been modified since the last save
    /// or load.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    // ── Identity ────────────────────────────────────────────────────

    /// Authenticate against an identity provider and bind the dataset to
    /// the authenticated user. A dataset already owned by a different user
    /// refuses the login.
    pub async fn login(
        &mut self,
        provider: &dyn IdentityProvider,
        username: &str,
        password: &str,
    ) -> Result<Session, CoreError> {
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let session = provider.authenticate(&credentials).await?;
        if let Some(owner) = &self.dataset.owner {
            if owner.id != session.user.id {
                return Err(CoreError::Unauthorized(format!(
                    "This dataset belongs to {}, not {}",
                    owner.username, session.user.username
                )));
            }
        } else {
            self.dataset.owner = Some(session.user.clone());
            self.dirty = true;
        }
        Ok(session)
    }

    /// Validate an existing session token against an identity provider.
    pub async fn validate_session(
        &self,
        provider: &dyn IdentityProvider,
        token: &str,
    ) -> Result<Session, CoreError> {
        provider.validate(token).await
    }

    #[must_use]
    pub fn owner(&self) -> Option<&providers::identity::User> {
        self.dataset.owner.as_ref()
    }

    // ── Currencies ──────────────────────────────────────────────────

    /// Add or update a currency's rate against the fixed reference.
    pub fn set_exchange_rate(&mut self, code: &str, rate: f64) -> Result<(), CoreError> {
        self.dataset.currencies.set_rate(code, rate)?;
        self.dirty = true;
        Ok(())
    }

    /// Remove a currency. The reference currency, the current display
    /// currency, and any currency still used by a portfolio are refused.
    pub fn remove_currency(&mut self, code: &str) -> Result<(), CoreError> {
        let upper = code.trim().to_uppercase();
        if upper == self.dataset.settings.default_currency {
            return Err(CoreError::ValidationError(format!(
                "{upper} is the current display currency and cannot be removed"
            )));
        }
        if self.dataset.portfolios.iter().any(|p| p.currency == upper) {
            return Err(CoreError::ValidationError(format!(
                "{upper} is still used by a portfolio and cannot be removed"
            )));
        }
        self.dataset.currencies.remove(&upper)?;
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn currencies(&self) -> Vec<String> {
        self.dataset.currencies.codes()
    }

    /// Convert an amount between two known currencies at stored rates.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, CoreError> {
        self.dataset.currencies.convert(amount, from, to)
    }

    /// Refresh exchange rates for every known currency from FX providers.
    /// Returns how many rates were updated.
    pub async fn refresh_exchange_rates(&mut self) -> Result<usize, CoreError> {
        let updated = self.quote_service.refresh_rates(&mut self.dataset).await?;
        if updated > 0 {
            self.dirty = true;
        }
        Ok(updated)
    }

    /// Rate-to-reference of one currency on a past date, fetched from FX
    /// providers. The stored table is not modified.
    pub async fn historical_exchange_rate(
        &self,
        code: &str,
        date: NaiveDate,
    ) -> Result<f64, CoreError> {
        self.quote_service.historical_rate(code, date).await
    }

    // ── Institutions ────────────────────────────────────────────────

    pub fn add_institution(&mut self, name: &str) -> Result<i64, CoreError> {
        let id = self.portfolio_service.add_institution(&mut self.dataset, name)?;
        self.dirty = true;
        Ok(id)
    }

    pub fn remove_institution(&mut self, id: i64) -> Result<(), CoreError> {
        self.portfolio_service.remove_institution(&mut self.dataset, id)?;
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn institutions(&self) -> &[models::institution::Institution] {
        &self.dataset.institutions
    }

    // ── Portfolios ──────────────────────────────────────────────────

    pub fn add_portfolio(
        &mut self,
        name: &str,
        currency: &str,
        institution_id: Option<i64>,
    ) -> Result<i64, CoreError> {
        let id = self
            .portfolio_service
            .add_portfolio(&mut self.dataset, name, currency, institution_id)?;
        self.dirty = true;
        Ok(id)
    }

    pub fn rename_portfolio(&mut self, id: i64, name: &str) -> Result<(), CoreError> {
        self.portfolio_service
            .rename_portfolio(&mut self.dataset, id, name)?;
        self.dirty = true;
        Ok(())
    }

    pub fn select_portfolio(&mut self, id: i64) -> Result<(), CoreError> {
        self.portfolio_service.select_portfolio(&mut self.dataset, id)?;
        self.dirty = true;
        Ok(())
    }

    pub fn remove_portfolio(&mut self, id: i64) -> Result<(), CoreError> {
        self.portfolio_service.remove_portfolio(&mut self.dataset, id)?;
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn portfolios(&self) -> &[Portfolio] {
        &self.dataset.portfolios
    }

    #[must_use]
    pub fn portfolio(&self, id: i64) -> Option<&Portfolio> {
        self.dataset.portfolio(id)
    }

    /// The currently selected portfolio id, or `ALL_PORTFOLIO_ID` when no
    /// real portfolio is selected.
    #[must_use]
    pub fn selected_portfolio_id(&self) -> i64 {
        self.dataset
            .portfolios
            .iter()
            .find(|p| p.selected)
            .map_or(ALL_PORTFOLIO_ID, |p| p.id)
    }

    // ── Assets ──────────────────────────────────────────────────────

    /// Search quote providers for symbols matching a free-text query.
    pub async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolCandidate>, CoreError> {
        self.quote_service.search(query).await
    }

    /// Register an asset from a quote provider by symbol.
    pub async fn add_asset_from_api(&mut self, symbol: &str) -> Result<(), CoreError> {
        self.quote_service
            .add_asset_from_api(&mut self.dataset, symbol)
            .await?;
        self.dirty = true;
        Ok(())
    }

    /// Register a manually maintained asset. Manual assets are never
    /// refreshed from providers; quotes are entered by hand.
    pub fn add_manual_asset(&mut self, asset: Asset) -> Result<(), CoreError> {
        validate_code(&asset.currency)?;
        if self.dataset.assets.contains(&asset.symbol) {
            return Err(CoreError::ValidationError(format!(
                "Asset {} already exists",
                asset.symbol
            )));
        }
        self.dataset.assets.upsert(asset);
        self.dirty = true;
        Ok(())
    }

    /// Record a manual quote for an asset (a flat bar at `price`).
    pub fn set_manual_quote(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        price: f64,
    ) -> Result<(), CoreError> {
        if !(price.is_finite() && price >= 0.0) {
            return Err(CoreError::ValidationError(format!(
                "Price must be finite and non-negative, got {price}"
            )));
        }
        let asset = self
            .dataset
            .assets
            .get_mut(symbol)
            .ok_or_else(|| CoreError::AssetNotFound(symbol.to_string()))?;
        asset.upsert_bar(models::quote::QuoteBar::flat(date, price));
        self.dirty = true;
        Ok(())
    }

    /// Record a split event for an asset (e.g. 2:1). Quantities held before
    /// the date scale by the ratio during replay; cost basis is unchanged.
    pub fn add_split_event(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        numerator: u32,
        denominator: u32,
    ) -> Result<(), CoreError> {
        if numerator == 0 || denominator == 0 {
            return Err(CoreError::ValidationError(
                "Split ratio terms must be at least 1".into(),
            ));
        }
        let asset = self
            .dataset
            .assets
            .get_mut(symbol)
            .ok_or_else(|| CoreError::AssetNotFound(symbol.to_string()))?;
        asset.upsert_split(models::quote::SplitEvent {
            date,
            numerator,
            denominator,
        });
        self.dirty = true;
        Ok(())
    }

    /// Record a per-unit cash dividend event for an asset, in the asset's
    /// native currency.
    pub fn add_dividend_event(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        amount: f64,
    ) -> Result<(), CoreError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(CoreError::ValidationError(format!(
                "Dividend amount must be positive, got {amount}"
            )));
        }
        let asset = self
            .dataset
            .assets
            .get_mut(symbol)
            .ok_or_else(|| CoreError::AssetNotFound(symbol.to_string()))?;
        asset.upsert_dividend(models::quote::DividendEvent { date, amount });
        self.dirty = true;
        Ok(())
    }

    /// Remove an asset with no transaction or template references.
    pub fn remove_asset(&mut self, symbol: &str) -> Result<(), CoreError> {
        if !self.dataset.assets.contains(symbol) {
            return Err(CoreError::AssetNotFound(symbol.to_string()));
        }
        if self.dataset.symbol_referenced(symbol) {
            return Err(CoreError::ValidationError(format!(
                "Asset {symbol} is referenced by transactions or templates and cannot be removed"
            )));
        }
        self.dataset.assets.remove(symbol);
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn asset(&self, symbol: &str) -> Option<&Asset> {
        self.dataset.assets.get(symbol)
    }

    #[must_use]
    pub fn assets(&self) -> Vec<&Asset> {
        self.dataset.assets.all()
    }

    /// Refresh latest quotes for all provider-backed assets (at most once
    /// per day per symbol). Returns the symbols refreshed.
    pub async fn refresh_quotes(&mut self) -> Result<Vec<String>, CoreError> {
        let refreshed = self.quote_service.refresh_latest(&mut self.dataset).await?;
        if !refreshed.is_empty() {
            self.dirty = true;
        }
        Ok(refreshed)
    }

    /// Backfill historical bars and corporate actions for one symbol.
    /// Returns the number of bars merged.
    pub async fn backfill_history(
        &mut self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: Interval,
    ) -> Result<usize, CoreError> {
        let count = self
            .quote_service
            .backfill_history(&mut self.dataset, symbol, from, to, interval)
            .await?;
        if count > 0 {
            self.dirty = true;
        }
        Ok(count)
    }

    // ── Transactions ────────────────────────────────────────────────

    /// Add a stored transaction. Disposals are checked against units held
    /// at the transaction's date.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<Uuid, CoreError> {
        let id = self
            .portfolio_service
            .add_transaction(&mut self.dataset, transaction)?;
        self.dirty = true;
        Ok(id)
    }

    /// Replace a stored transaction. The edit is rolled back if it would
    /// leave any later disposal unbacked.
    pub fn update_transaction(&mut self, id: Uuid, updated: Transaction) -> Result<(), CoreError> {
        self.portfolio_service
            .update_transaction(&mut self.dataset, id, updated)?;
        self.dirty = true;
        Ok(())
    }

    /// Remove a stored transaction, rolled back under the same consistency
    /// rule as updates.
    pub fn remove_transaction(&mut self, id: Uuid) -> Result<(), CoreError> {
        self.portfolio_service
            .remove_transaction(&mut self.dataset, id)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_transaction_notes(
        &mut self,
        id: Uuid,
        notes: Option<String>,
    ) -> Result<(), CoreError> {
        self.portfolio_service
            .set_transaction_notes(&mut self.dataset, id, notes)?;
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.dataset.transaction(id)
    }

    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.dataset.transactions.len()
    }

    // ── Recurring templates ─────────────────────────────────────────

    pub fn add_template(&mut self, template: RecurringTemplate) -> Result<Uuid, CoreError> {
        let id = self.portfolio_service.add_template(&mut self.dataset, template)?;
        self.dirty = true;
        Ok(id)
    }

    pub fn update_template(
        &mut self,
        id: Uuid,
        updated: RecurringTemplate,
    ) -> Result<(), CoreError> {
        self.portfolio_service
            .update_template(&mut self.dataset, id, updated)?;
        self.dirty = true;
        Ok(())
    }

    /// Remove a template. Previously materialized rows stay in the ledger.
    pub fn remove_template(&mut self, id: Uuid) -> Result<(), CoreError> {
        self.portfolio_service.remove_template(&mut self.dataset, id)?;
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn template(&self, id: Uuid) -> Option<&RecurringTemplate> {
        self.dataset.template(id)
    }

    #[must_use]
    pub fn templates(&self) -> &[RecurringTemplate] {
        &self.dataset.templates
    }

    /// Convert every due template occurrence into stored rows. Returns the
    /// ids of the transactions created.
    pub fn materialize_due(&mut self, now: NaiveDateTime) -> Result<Vec<Uuid>, CoreError> {
        let created = self.portfolio_service.materialize_due(&mut self.dataset, now)?;
        if !created.is_empty() {
            self.dirty = true;
        }
        Ok(created)
    }

    /// Preview the next `count` occurrences of a template from `from`.
    pub fn preview_occurrences(
        &self,
        template_id: Uuid,
        from: NaiveDateTime,
        count: usize,
    ) -> Result<Vec<NaiveDateTime>, CoreError> {
        self.portfolio_service
            .preview_occurrences(&self.dataset, template_id, from, count)
    }

    // ── Ledger / holdings / valuation ───────────────────────────────

    /// The merged ledger of one portfolio (or `ALL_PORTFOLIO_ID`): stored
    /// rows plus virtual occurrences, deterministically ordered.
    pub fn ledger(
        &self,
        portfolio_id: i64,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
        options: LedgerOptions,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        self.ledger_service
            .list_for_portfolio(&self.dataset, portfolio_id, from, to, options)
    }

    /// Holdings report for one portfolio (or `ALL_PORTFOLIO_ID`) as of an
    /// instant.
    pub fn holdings(
        &self,
        portfolio_id: i64,
        as_of: NaiveDateTime,
    ) -> Result<HoldingsReport, CoreError> {
        self.aggregation_service
            .holdings(&self.dataset, portfolio_id, as_of)
    }

    /// Daily valuation series for chart rendering.
    pub fn valuation_history(
        &self,
        portfolio_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ValuationPoint>, CoreError> {
        self.aggregation_service
            .valuation_history(&self.dataset, portfolio_id, from, to)
    }

    // ── Export ──────────────────────────────────────────────────────

    /// Read-only snapshot of portfolios, transactions, templates, and
    /// referenced institutions.
    #[must_use]
    pub fn export_snapshot(&self) -> ExportSnapshot {
        self.export_service.snapshot(&self.dataset)
    }

    /// Pretty-printed JSON export of the snapshot.
    pub fn export_to_json(&self) -> Result<String, CoreError> {
        self.export_service.to_json(&self.dataset)
    }

    /// CSV rendering of the stored transaction log.
    #[must_use]
    pub fn export_transactions_to_csv(&self) -> String {
        self.export_service.transactions_to_csv(&self.dataset)
    }

    // ── Settings ────────────────────────────────────────────────────

    /// Set the display currency for aggregate views. Stored exchange rates
    /// are unaffected — they stay relative to the fixed reference.
    pub fn set_default_currency(&mut self, currency: &str) -> Result<(), CoreError> {
        let code = validate_code(currency)?;
        if !self.dataset.currencies.contains(&code) {
            return Err(CoreError::UnknownCurrency { code });
        }
        self.dataset.settings.default_currency = code;
        self.dirty = true;
        Ok(())
    }

    /// Set the provider request timeout and rebuild the registry so it
    /// takes effect immediately.
    pub fn set_quote_timeout(&mut self, timeout_secs: u64) -> Result<(), CoreError> {
        if timeout_secs == 0 {
            return Err(CoreError::ValidationError(
                "Quote timeout must be at least 1 second".into(),
            ));
        }
        self.dataset.settings.quote_timeout_secs = timeout_secs;
        self.quote_service =
            QuoteService::new(ProviderRegistry::new_with_defaults(timeout_secs));
        self.dirty = true;
        Ok(())
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.dataset.settings
    }

    /// Replace the provider registry (custom providers, test doubles).
    pub fn set_provider_registry(&mut self, registry: ProviderRegistry) {
        self.quote_service = QuoteService::new(registry);
    }

    // ── Internal ────────────────────────────────────────────────────

    fn build(dataset: Dataset) -> Self {
        let registry = ProviderRegistry::new_with_defaults(dataset.settings.quote_timeout_secs);
        Self {
            dataset,
            portfolio_service: PortfolioService::new(),
            ledger_service: LedgerService::new(),
            aggregation_service: AggregationService::new(),
            quote_service: QuoteService::new(registry),
            export_service: ExportService::new(),
            dirty: false,
        }
    }
}
