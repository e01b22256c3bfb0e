use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::currency::validate_code;
use crate::models::dataset::Dataset;
use crate::models::institution::Institution;
use crate::models::portfolio::{Portfolio, ALL_PORTFOLIO_ID};
use crate::models::transaction::{RecurringTemplate, Transaction, TransactionKind};
use super::aggregation_service::AggregationService;
use super::ledger_service::expand_template;

/// Manages portfolios, institutions, transactions, and recurring templates.
///
/// Pure business logic — no I/O, no API calls. Every mutation validates
/// first and commits only when the resulting dataset is consistent; a
/// failed edit rolls back and returns the error with the dataset untouched.
pub struct PortfolioService {
    aggregation: AggregationService,
}

impl PortfolioService {
    pub fn new() -> Self {
        Self {
            aggregation: AggregationService::new(),
        }
    }

    // ── Portfolios ──────────────────────────────────────────────────

    /// Create a portfolio and return its id. The first real portfolio is
    /// auto-selected.
    pub fn add_portfolio(
        &self,
        dataset: &mut Dataset,
        name: &str,
        currency: &str,
        institution_id: Option<i64>,
    ) -> Result<i64, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::ValidationError(
                "Portfolio name must not be empty".into(),
            ));
        }
        let currency = validate_code(currency)?;
        if !dataset.currencies.contains(&currency) {
            return Err(CoreError::UnknownCurrency { code: currency });
        }
        if let Some(iid) = institution_id {
            if dataset.institution(iid).is_none() {
                return Err(CoreError::InstitutionNotFound(iid));
            }
        }

        let id = dataset.allocate_portfolio_id();
        let selected = dataset.portfolios.is_empty();
        dataset.portfolios.push(Portfolio {
            id,
            name: name.to_string(),
            currency,
            institution_id,
            selected,
        });
        Ok(id)
    }

    pub fn rename_portfolio(
        &self,
        dataset: &mut Dataset,
        id: i64,
        name: &str,
    ) -> Result<(), CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::ValidationError(
                "Portfolio name must not be empty".into(),
            ));
        }
        let portfolio = dataset
            .portfolio_mut(id)
            .ok_or(CoreError::PortfolioNotFound(id))?;
        portfolio.name = name.to_string();
        Ok(())
    }

    /// Select a portfolio for display; all others are deselected. Passing
    /// `ALL_PORTFOLIO_ID` deselects every real portfolio (the aggregate
    /// view is active).
    pub fn select_portfolio(&self, dataset: &mut Dataset, id: i64) -> Result<(), CoreError> {
        if id != ALL_PORTFOLIO_ID && dataset.portfolio(id).is_none() {
            return Err(CoreError::PortfolioNotFound(id));
        }
        for portfolio in &mut dataset.portfolios {
            portfolio.selected = portfolio.id == id;
        }
        Ok(())
    }

    /// Remove an empty portfolio. A portfolio with any transaction or
    /// template history (including as a transfer target) is refused.
    pub fn remove_portfolio(&self, dataset: &mut Dataset, id: i64) -> Result<(), CoreError> {
        let idx = dataset
            .portfolios
            .iter()
            .position(|p| p.id == id)
            .ok_or(CoreError::PortfolioNotFound(id))?;
        if dataset.portfolio_referenced(id) {
            return Err(CoreError::ValidationError(format!(
                "Portfolio {id} still has transactions or templates and cannot be removed"
            )));
        }
        let removed = dataset.portfolios.remove(idx);
        if removed.selected {
            if let Some(first) = dataset.portfolios.first_mut() {
                first.selected = true;
            }
        }
        Ok(())
    }

    // ── Institutions ────────────────────────────────────────────────

    pub fn add_institution(&self, dataset: &mut Dataset, name: &str) -> Result<i64, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::ValidationError(
                "Institution name must not be empty".into(),
            ));
        }
        let id = dataset.allocate_institution_id();
        dataset.institutions.push(Institution {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    /// Remove an institution. Portfolios pointing at it keep working; their
    /// link is cleared.
    pub fn remove_institution(&self, dataset: &mut Dataset, id: i64) -> Result<(), CoreError> {
        let idx = dataset
            .institutions
            .iter()
            .position(|i| i.id == id)
            .ok_or(CoreError::InstitutionNotFound(id))?;
        dataset.institutions.remove(idx);
        for portfolio in &mut dataset.portfolios {
            if portfolio.institution_id == Some(id) {
                portfolio.institution_id = None;
            }
        }
        Ok(())
    }

    // ── Transactions ────────────────────────────────────────────────

    /// Add a stored transaction. Validates shape and, for disposals, that
    /// enough units are held at the transaction's date. The whole history
    /// is revalidated afterwards so a backdated row cannot leave a later
    /// disposal unbacked; on failure the insert is rolled back.
    pub fn add_transaction(
        &self,
        dataset: &mut Dataset,
        transaction: Transaction,
    ) -> Result<Uuid, CoreError> {
        self.validate_transaction(dataset, &transaction)?;
        self.check_disposal(dataset, &transaction)?;
        let id = transaction.id;
        dataset.insert_transaction(transaction);
        if let Err(e) = self.aggregation.verify_consistency(dataset) {
            dataset.remove_transaction(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Replace a stored transaction in place. The whole history is
    /// revalidated afterwards so the edit cannot leave a later disposal
    /// unbacked; on failure the original row is restored.
    pub fn update_transaction(
        &self,
        dataset: &mut Dataset,
        id: Uuid,
        mut updated: Transaction,
    ) -> Result<(), CoreError> {
        let old = dataset
            .remove_transaction(id)
            .ok_or(CoreError::TransactionNotFound(id))?;
        updated.id = old.id;

        if let Err(e) = self
            .validate_transaction(dataset, &updated)
            .and_then(|()| {
                dataset.insert_transaction(updated);
                self.aggregation.verify_consistency(dataset)
            })
        {
            dataset.remove_transaction(id);
            dataset.insert_transaction(old);
            return Err(e);
        }
        Ok(())
    }

    /// Remove a stored transaction, revalidating the remaining history.
    /// On failure the row is restored.
    pub fn remove_transaction(&self, dataset: &mut Dataset, id: Uuid) -> Result<(), CoreError> {
        let removed = dataset
            .remove_transaction(id)
            .ok_or(CoreError::TransactionNotFound(id))?;
        if let Err(e) = self.aggregation.verify_consistency(dataset) {
            dataset.insert_transaction(removed);
            return Err(e);
        }
        Ok(())
    }

    pub fn set_transaction_notes(
        &self,
        dataset: &mut Dataset,
        id: Uuid,
        notes: Option<String>,
    ) -> Result<(), CoreError> {
        let transaction = dataset
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(CoreError::TransactionNotFound(id))?;
        transaction.notes = notes;
        Ok(())
    }

    // ── Recurring templates ─────────────────────────────────────────

    pub fn add_template(
        &self,
        dataset: &mut Dataset,
        template: RecurringTemplate,
    ) -> Result<Uuid, CoreError> {
        self.validate_template(dataset, &template)?;
        let id = template.id;
        dataset.templates.push(template);
        Ok(id)
    }

    pub fn update_template(
        &self,
        dataset: &mut Dataset,
        id: Uuid,
        mut updated: RecurringTemplate,
    ) -> Result<(), CoreError> {
        let idx = dataset
            .templates
            .iter()
            .position(|t| t.id == id)
            .ok_or(CoreError::TemplateNotFound(id))?;
        updated.id = id;
        // The high-water mark survives edits so already-materialized
        // occurrences never reappear as virtual rows.
        updated.materialized_until = updated
            .materialized_until
            .max(dataset.templates[idx].materialized_until);
        self.validate_template(dataset, &updated)?;
        dataset.templates[idx] = updated;
        Ok(())
    }

    /// Remove a template. Rows it materialized earlier are ordinary stored
    /// transactions and stay in the ledger.
    pub fn remove_template(&self, dataset: &mut Dataset, id: Uuid) -> Result<(), CoreError> {
        dataset
            .remove_template(id)
            .map(|_| ())
            .ok_or(CoreError::TemplateNotFound(id))
    }

    /// Convert every due occurrence (at or before `now`) of every template
    /// into stored rows, advancing each template's high-water mark. Returns
    /// the ids of the new transactions.
    ///
    /// Occurrences that fail disposal checks are skipped without advancing
    /// past them, so they are retried on the next run.
    pub fn materialize_due(
        &self,
        dataset: &mut Dataset,
        now: NaiveDateTime,
    ) -> Result<Vec<Uuid>, CoreError> {
        let mut created = Vec::new();
        let template_ids: Vec<Uuid> = dataset.templates.iter().map(|t| t.id).collect();

        for template_id in template_ids {
            let Some(template) = dataset.template(template_id) else {
                continue;
            };
            let due = expand_template(template, None, now);
            let template = template.clone();

            let mut high_water = template.materialized_until;
            for occurrence in due {
                let transaction = template.materialize(occurrence);
                // Advance the stored mark before the disposal check:
                // otherwise the replay counts this occurrence as a virtual
                // row on top of the candidate itself, and re-counts rows
                // materialized earlier in this loop.
                if let Some(stored) = dataset.template_mut(template_id) {
                    stored.materialized_until = Some(occurrence);
                }
                match self.check_disposal(dataset, &transaction) {
                    Ok(()) => {
                        created.push(transaction.id);
                        dataset.insert_transaction(transaction);
                        high_water = Some(occurrence);
                    }
                    Err(_) => break,
                }
            }
            // On failure this rolls the mark back to the last occurrence
            // actually stored, so the refused one is retried next run.
            if let Some(template) = dataset.template_mut(template_id) {
                template.materialized_until = high_water;
            }
        }
        Ok(created)
    }

    /// Upcoming occurrence timestamps of one template, for preview.
    pub fn preview_occurrences(
        &self,
        dataset: &Dataset,
        template_id: Uuid,
        from: NaiveDateTime,
        count: usize,
    ) -> Result<Vec<NaiveDateTime>, CoreError> {
        let template = dataset
            .template(template_id)
            .ok_or(CoreError::TemplateNotFound(template_id))?;
        let mut occurrences = Vec::with_capacity(count);
        let mut cursor = from.max(template.start);
        while occurrences.len() < count {
            let Some(next) = template.recurrence.next_at_or_after(cursor) else {
                break;
            };
            if template.end.is_some_and(|end| next > end) {
                break;
            }
            occurrences.push(next);
            cursor = next + chrono::Duration::minutes(1);
        }
        Ok(occurrences)
    }

    // ── Validation ──────────────────────────────────────────────────

    fn validate_transaction(
        &self,
        dataset: &Dataset,
        transaction: &Transaction,
    ) -> Result<(), CoreError> {
        self.validate_row_shape(
            dataset,
            transaction.portfolio_id,
            transaction.kind,
            transaction.instrument.as_ref().map(|i| i.symbol.as_str()),
            transaction.quantity,
            transaction.price,
            transaction.commission,
            transaction.tax,
            &transaction.currency,
            transaction.target_portfolio_id,
        )
    }

    fn validate_template(
        &self,
        dataset: &Dataset,
        template: &RecurringTemplate,
    ) -> Result<(), CoreError> {
        self.validate_row_shape(
            dataset,
            template.portfolio_id,
            template.kind,
            template.instrument.as_ref().map(|i| i.symbol.as_str()),
            template.quantity,
            template.price,
            template.commission,
            template.tax,
            &template.currency,
            template.target_portfolio_id,
        )?;
        if let Some(end) = template.end {
            if end < template.start {
                return Err(CoreError::ValidationError(format!(
                    "Template end ({end}) must not be before its start ({})",
                    template.start
                )));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn validate_row_shape(
        &self,
        dataset: &Dataset,
        portfolio_id: i64,
        kind: TransactionKind,
        symbol: Option<&str>,
        quantity: f64,
        price: f64,
        commission: f64,
        tax: f64,
        currency: &str,
        target_portfolio_id: Option<i64>,
    ) -> Result<(), CoreError> {
        if portfolio_id < 0 {
            return Err(CoreError::ValidationError(
                "Transactions must belong to a real portfolio, not a virtual aggregate".into(),
            ));
        }
        if dataset.portfolio(portfolio_id).is_none() {
            return Err(CoreError::PortfolioNotFound(portfolio_id));
        }
        if !(quantity > 0.0 && quantity.is_finite()) {
            return Err(CoreError::ValidationError(
                "Quantity must be positive".into(),
            ));
        }
        if !(price >= 0.0 && price.is_finite()) {
            return Err(CoreError::ValidationError(
                "Price must be non-negative".into(),
            ));
        }
        if !(commission >= 0.0 && tax >= 0.0 && commission.is_finite() && tax.is_finite()) {
            return Err(CoreError::ValidationError(
                "Commission and tax must be non-negative".into(),
            ));
        }
        let currency = validate_code(currency)?;
        if !dataset.currencies.contains(&currency) {
            return Err(CoreError::UnknownCurrency { code: currency });
        }

        match symbol {
            Some(symbol) => {
                if kind.is_cash_only() {
                    return Err(CoreError::ValidationError(format!(
                        "{kind} rows are cash-only and cannot reference an instrument"
                    )));
                }
                if !dataset.assets.contains(symbol) {
                    return Err(CoreError::AssetNotFound(symbol.to_string()));
                }
            }
            None => {
                if matches!(
                    kind,
                    TransactionKind::Buy | TransactionKind::Sell | TransactionKind::Dividend
                ) {
                    return Err(CoreError::ValidationError(format!(
                        "{kind} rows must reference an instrument"
                    )));
                }
            }
        }

        match (kind, target_portfolio_id) {
            (TransactionKind::Transfer, None) => Err(CoreError::ValidationError(
                "Transfers must name a target portfolio".into(),
            )),
            (TransactionKind::Transfer, Some(target)) => {
                if target == portfolio_id {
                    return Err(CoreError::ValidationError(
                        "Transfer source and target must differ".into(),
                    ));
                }
                if dataset.portfolio(target).is_none() {
                    return Err(CoreError::PortfolioNotFound(target));
                }
                Ok(())
            }
            (_, Some(_)) => Err(CoreError::ValidationError(format!(
                "Only transfers carry a target portfolio, not {kind} rows"
            ))),
            (_, None) => Ok(()),
        }
    }

    /// For unit disposals (Sell, in-kind Transfer): refuse if the portfolio
    /// does not hold enough units at the row's date, counting virtual
    /// occurrences up to that instant.
    fn check_disposal(&self, dataset: &Dataset, transaction: &Transaction) -> Result<(), CoreError> {
        let disposes = match transaction.kind {
            TransactionKind::Sell => true,
            TransactionKind::Transfer => transaction.instrument.is_some(),
            _ => false,
        };
        if !disposes {
            return Ok(());
        }
        let Some(instrument) = &transaction.instrument else {
            return Ok(());
        };
        let held = self.aggregation.held_quantity(
            dataset,
            transaction.portfolio_id,
            &instrument.symbol,
            transaction.date,
        );
        if transaction.quantity > held + 1e-9 {
            return Err(CoreError::OverdraftSell {
                symbol: instrument.symbol.clone(),
                portfolio_id: transaction.portfolio_id,
                date: transaction.date,
                requested: transaction.quantity,
                held,
            });
        }
        Ok(())
    }
}

impl Default for PortfolioService {
    fn default() -> Self {
        Self::new()
    }
}
