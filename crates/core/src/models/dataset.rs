use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::providers::identity::User;
use super::asset::AssetBook;
use super::currency::CurrencyTable;
use super::institution::Institution;
use super::portfolio::Portfolio;
use super::settings::Settings;
use super::transaction::{RecurringTemplate, Transaction};

/// The main data container. Everything in here gets serialized, encrypted,
/// and saved to the portable snapshot file.
///
/// `transactions` is kept ordered by `(date, id)` via binary insertion —
/// the ledger and aggregation layers rely on that ordering being stable
/// and deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub currencies: CurrencyTable,
    pub assets: AssetBook,
    pub institutions: Vec<Institution>,
    pub portfolios: Vec<Portfolio>,
    pub transactions: Vec<Transaction>,
    pub templates: Vec<RecurringTemplate>,
    pub settings: Settings,
    /// Authenticated owner, if a login has happened. The owner's id is
    /// trusted as the key this dataset belongs to.
    #[serde(default)]
    pub owner: Option<User>,
    next_portfolio_id: i64,
    next_institution_id: i64,
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            currencies: CurrencyTable::default(),
            assets: AssetBook::new(),
            institutions: Vec::new(),
            portfolios: Vec::new(),
            transactions: Vec::new(),
            templates: Vec::new(),
            settings: Settings::default(),
            owner: None,
            next_portfolio_id: 0,
            next_institution_id: 0,
        }
    }
}

impl Dataset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Id sequences ────────────────────────────────────────────────

    /// Next real portfolio id. Real ids start at 0; negative ids are
    /// reserved for virtual aggregates.
    pub fn allocate_portfolio_id(&mut self) -> i64 {
        let id = self.next_portfolio_id;
        self.next_portfolio_id += 1;
        id
    }

    pub fn allocate_institution_id(&mut self) -> i64 {
        let id = self.next_institution_id;
        self.next_institution_id += 1;
        id
    }

    // ── Portfolio / institution lookups ─────────────────────────────

    #[must_use]
    pub fn portfolio(&self, id: i64) -> Option<&Portfolio> {
        self.portfolios.iter().find(|p| p.id == id)
    }

    pub fn portfolio_mut(&mut self, id: i64) -> Option<&mut Portfolio> {
        self.portfolios.iter_mut().find(|p| p.id == id)
    }

    #[must_use]
    pub fn institution(&self, id: i64) -> Option<&Institution> {
        self.institutions.iter().find(|i| i.id == id)
    }

    // ── Transactions ────────────────────────────────────────────────

    /// Insert keeping `(date, id)` order.
    pub fn insert_transaction(&mut self, transaction: Transaction) {
        let key = (transaction.date, transaction.id);
        let pos = self
            .transactions
            .binary_search_by_key(&key, |t| (t.date, t.id))
            .unwrap_or_else(|pos| pos);
        self.transactions.insert(pos, transaction);
    }

    #[must_use]
    pub fn transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    pub fn remove_transaction(&mut self, id: Uuid) -> Option<Transaction> {
        let idx = self.transactions.iter().position(|t| t.id == id)?;
        Some(self.transactions.remove(idx))
    }

    // ── Templates ───────────────────────────────────────────────────

    #[must_use]
    pub fn template(&self, id: Uuid) -> Option<&RecurringTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn template_mut(&mut self, id: Uuid) -> Option<&mut RecurringTemplate> {
        self.templates.iter_mut().find(|t| t.id == id)
    }

    pub fn remove_template(&mut self, id: Uuid) -> Option<RecurringTemplate> {
        let idx = self.templates.iter().position(|t| t.id == id)?;
        Some(self.templates.remove(idx))
    }

    // ── Reference checks ────────────────────────────────────────────

    /// Whether any transaction or template trades the symbol. Assets with
    /// references cannot be removed.
    #[must_use]
    pub fn symbol_referenced(&self, symbol: &str) -> bool {
        let upper = symbol.to_uppercase();
        self.transactions
            .iter()
            .any(|t| t.instrument.as_ref().is_some_and(|i| i.symbol == upper))
            || self
                .templates
                .iter()
                .any(|t| t.instrument.as_ref().is_some_and(|i| i.symbol == upper))
    }

    /// Whether any transaction or template belongs to or targets the
    /// portfolio. Portfolios with history cannot be removed.
    #[must_use]
    pub fn portfolio_referenced(&self, id: i64) -> bool {
        self.transactions
            .iter()
            .any(|t| t.portfolio_id == id || t.target_portfolio_id == Some(id))
            || self
                .templates
                .iter()
                .any(|t| t.portfolio_id == id || t.target_portfolio_id == Some(id))
    }

    #[must_use]
    pub fn institution_referenced(&self, id: i64) -> bool {
        self.portfolios
            .iter()
            .any(|p| p.institution_id == Some(id))
    }
}
