use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::dataset::Dataset;
use crate::models::holdings::{
    AggregationWarning, CashBalance, Holding, HoldingsReport, ValuationEntry, ValuationPoint,
};
use crate::models::ledger::EntryOrigin;
use crate::models::portfolio::ALL_PORTFOLIO_ID;
use crate::models::transaction::{Transaction, TransactionKind};
use super::ledger_service::expand_template;

/// Quantities at or below this are treated as a closed position.
const EPSILON: f64 = 1e-9;

/// Maximum valuation-history range in days (10 years).
const MAX_HISTORY_RANGE_DAYS: i64 = 3650;

/// Replays the transaction timeline into holdings, cost basis, realized
/// results, and valuations.
///
/// The replay is always system-wide (every portfolio jointly): an incoming
/// transfer needs the source portfolio's average cost at transfer time, so
/// no portfolio's state can be derived in isolation. The "All" aggregate is
/// the symbol-wise sum of every real portfolio's state, never a re-replay
/// of a merged ledger — that is what keeps transfers netted to zero.
///
/// Cost basis uses the weighted-average method: buys blend into a single
/// per-unit cost, sells realize against it and leave it unchanged.
/// Short positions are not supported; an overdrafting sell is skipped with
/// a warning rather than driving quantity negative.
pub struct AggregationService;

impl AggregationService {
    pub fn new() -> Self {
        Self
    }

    /// Holdings of one portfolio (or the "All" aggregate) as of an instant.
    ///
    /// Valuation degradations (missing quote, unknown currency) null the
    /// affected holding's `current_value` and add a warning; they never
    /// abort the rest of the report.
    pub fn holdings(
        &self,
        dataset: &Dataset,
        portfolio_id: i64,
        as_of: NaiveDateTime,
    ) -> Result<HoldingsReport, CoreError> {
        if portfolio_id != ALL_PORTFOLIO_ID && dataset.portfolio(portfolio_id).is_none() {
            return Err(CoreError::PortfolioNotFound(portfolio_id));
        }

        let mut replay = Replay::new(dataset);
        for item in build_timeline(dataset, as_of, true) {
            replay.apply(&item);
        }
        Ok(self.report(dataset, portfolio_id, as_of, replay))
    }

    /// Units of `symbol` held by a portfolio at an instant, including the
    /// effect of virtual occurrences. Used by write-path validation.
    pub fn held_quantity(
        &self,
        dataset: &Dataset,
        portfolio_id: i64,
        symbol: &str,
        as_of: NaiveDateTime,
    ) -> f64 {
        let mut replay = Replay::new(dataset);
        for item in build_timeline(dataset, as_of, true) {
            replay.apply(&item);
        }
        let upper = symbol.to_uppercase();
        replay
            .states
            .get(&portfolio_id)
            .and_then(|s| s.positions.get(&upper))
            .map_or(0.0, |p| p.quantity)
    }

    /// Replay every stored transaction and fail on the first overdraft a
    /// stored row would cause. Run after removals/updates so an edit can
    /// never leave a later sell unbacked.
    pub fn verify_consistency(&self, dataset: &Dataset) -> Result<(), CoreError> {
        let end = dataset
            .transactions
            .last()
            .map_or_else(|| chrono::Utc::now().naive_utc(), |t| t.date);
        let mut replay = Replay::new(dataset);
        for item in build_timeline(dataset, end, false) {
            replay.apply(&item);
            if let Some(w) = replay.overdrafts.first() {
                return Err(w.clone());
            }
        }
        Ok(())
    }

    /// Daily portfolio value series for `[from, to]`, with ledger activity
    /// annotated per day. Days where no held position can be priced carry
    /// the last known value forward (weekends, holidays).
    pub fn valuation_history(
        &self,
        dataset: &Dataset,
        portfolio_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ValuationPoint>, CoreError> {
        if portfolio_id != ALL_PORTFOLIO_ID && dataset.portfolio(portfolio_id).is_none() {
            return Err(CoreError::PortfolioNotFound(portfolio_id));
        }
        if from > to {
            return Err(CoreError::ValidationError(format!(
                "'from' date ({from}) must not be after 'to' date ({to})"
            )));
        }
        let range_days = (to - from).num_days();
        if range_days > MAX_HISTORY_RANGE_DAYS {
            return Err(CoreError::ValidationError(format!(
                "Valuation range of {range_days} days exceeds maximum of {MAX_HISTORY_RANGE_DAYS} days (10 years)"
            )));
        }

        let end_of_window = end_of_day(to);
        let timeline = build_timeline(dataset, end_of_window, true);
        let mut replay = Replay::new(dataset);

        // Advance to the day before the window so day one starts complete.
        let mut idx = 0;
        let window_start = from.and_time(NaiveTime::MIN);
        while idx < timeline.len() && timeline[idx].at() < window_start {
            replay.apply(&timeline[idx]);
            idx += 1;
        }

        let reporting_currency = self.reporting_currency(dataset, portfolio_id);
        let mut points = Vec::new();
        let mut last_known_value = 0.0;
        let mut day = from;

        while day <= to {
            let day_end = end_of_day(day);
            let mut entries = Vec::new();
            while idx < timeline.len() && timeline[idx].at() <= day_end {
                let item = &timeline[idx];
                replay.apply(item);
                if let ReplayItem::Txn { transaction, .. } = item {
                    if concerns_portfolio(transaction, portfolio_id) {
                        entries.push(ValuationEntry {
                            kind: transaction.kind,
                            symbol: transaction.instrument.as_ref().map(|i| i.symbol.clone()),
                            quantity: transaction.quantity,
                        });
                    }
                }
                idx += 1;
            }

            let (value, any_priced, has_positions) =
                self.value_on_day(dataset, portfolio_id, &reporting_currency, &replay, day);
            let value = if has_positions && !any_priced {
                last_known_value
            } else {
                last_known_value = value;
                value
            };

            points.push(ValuationPoint {
                date: day,
                value,
                entries,
            });
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(points)
    }

    // ── Report assembly ─────────────────────────────────────────────

    fn reporting_currency(&self, dataset: &Dataset, portfolio_id: i64) -> String {
        if portfolio_id == ALL_PORTFOLIO_ID {
            dataset.settings.default_currency.clone()
        } else {
            dataset
                .portfolio(portfolio_id)
                .map(|p| p.currency.clone())
                .unwrap_or_else(|| dataset.settings.default_currency.clone())
        }
    }

    fn report(
        &self,
        dataset: &Dataset,
        portfolio_id: i64,
        as_of: NaiveDateTime,
        replay: Replay<'_>,
    ) -> HoldingsReport {
        let currency = self.reporting_currency(dataset, portfolio_id);
        let mut warnings: Vec<AggregationWarning> = replay
            .warnings
            .iter()
            .filter(|w| portfolio_id == ALL_PORTFOLIO_ID || w.portfolio_id == portfolio_id)
            .cloned()
            .collect();

        let (positions, cash, realized, dividends) =
            merge_states(dataset, portfolio_id, &currency, &replay, &mut warnings);

        let mut holdings: Vec<Holding> = Vec::new();
        let mut total_value = 0.0;
        let mut symbols: Vec<&String> = positions.keys().collect();
        symbols.sort();

        for symbol in symbols {
            let position = &positions[symbol];
            if position.quantity <= EPSILON {
                continue;
            }
            let current_value =
                match self.value_position(dataset, symbol, position.quantity, &currency, as_of.date()) {
                    Ok(value) => {
                        total_value += value;
                        Some(value)
                    }
                    Err(e) => {
                        warn!("Degrading {symbol} valuation in portfolio {portfolio_id}: {e}");
                        warnings.push(AggregationWarning {
                            portfolio_id,
                            symbol: Some(symbol.clone()),
                            date: as_of,
                            transaction_id: None,
                            message: e.to_string(),
                        });
                        None
                    }
                };
            holdings.push(Holding {
                symbol: symbol.clone(),
                quantity: position.quantity,
                average_cost: position.average_cost(),
                cost_basis: position.cost_basis,
                unrealized_gain_loss: current_value.map(|v| v - position.cost_basis),
                current_value,
            });
        }

        let mut cash_balances: Vec<CashBalance> = cash
            .into_iter()
            .filter(|(_, amount)| amount.abs() > EPSILON)
            .map(|(currency, amount)| CashBalance { currency, amount })
            .collect();
        cash_balances.sort_by(|a, b| a.currency.cmp(&b.currency));

        for balance in &cash_balances {
            match dataset
                .currencies
                .convert(balance.amount, &balance.currency, &currency)
            {
                Ok(value) => total_value += value,
                Err(e) => warnings.push(AggregationWarning {
                    portfolio_id,
                    symbol: None,
                    date: as_of,
                    transaction_id: None,
                    message: format!("Cash balance in {} not convertible: {e}", balance.currency),
                }),
            }
        }

        HoldingsReport {
            portfolio_id,
            as_of,
            currency,
            holdings,
            cash: cash_balances,
            realized_gain_loss: realized,
            dividend_income: dividends,
            total_value,
            warnings,
        }
    }

    fn value_position(
        &self,
        dataset: &Dataset,
        symbol: &str,
        quantity: f64,
        reporting_currency: &str,
        as_of: NaiveDate,
    ) -> Result<f64, CoreError> {
        let asset = dataset
            .assets
            .get(symbol)
            .ok_or_else(|| CoreError::AssetNotFound(symbol.to_string()))?;
        let close = asset.close_at_or_before(as_of)?;
        dataset
            .currencies
            .convert(quantity * close, &asset.currency, reporting_currency)
    }

    /// Value of the requested portfolio on one day: (value, any position
    /// priced, any position held).
    fn value_on_day(
        &self,
        dataset: &Dataset,
        portfolio_id: i64,
        reporting_currency: &str,
        replay: &Replay<'_>,
        day: NaiveDate,
    ) -> (f64, bool, bool) {
        let mut value = 0.0;
        let mut any_priced = false;
        let mut has_positions = false;

        let mut discard = Vec::new();
        let (positions, cash, _, _) =
            merge_states(dataset, portfolio_id, reporting_currency, replay, &mut discard);

        for (symbol, position) in &positions {
            if position.quantity <= EPSILON {
                continue;
            }
            has_positions = true;
            if let Ok(v) =
                self.value_position(dataset, symbol, position.quantity, reporting_currency, day)
            {
                value += v;
                any_priced = true;
            }
        }
        for (currency, amount) in &cash {
            if let Ok(v) = dataset.currencies.convert(*amount, currency, reporting_currency) {
                value += v;
            }
        }
        (value, any_priced, has_positions)
    }
}

impl Default for AggregationService {
    fn default() -> Self {
        Self::new()
    }
}

// ── Replay state ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Position {
    quantity: f64,
    /// In the owning portfolio's reporting currency.
    cost_basis: f64,
}

impl Position {
    fn average_cost(&self) -> f64 {
        if self.quantity > EPSILON {
            self.cost_basis / self.quantity
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PortfolioState {
    positions: HashMap<String, Position>,
    cash: HashMap<String, f64>,
    realized: f64,
    dividends: f64,
}

enum ReplayItem {
    /// A stock split or dividend event, applied at the start of its day.
    Action {
        at: NaiveDateTime,
        symbol: String,
        action: CorporateAction,
    },
    Txn {
        transaction: Transaction,
        origin: EntryOrigin,
    },
}

enum CorporateAction {
    Split { ratio: f64 },
    Dividend { amount_per_unit: f64 },
}

impl ReplayItem {
    fn at(&self) -> NaiveDateTime {
        match self {
            Self::Action { at, .. } => *at,
            Self::Txn { transaction, .. } => transaction.date,
        }
    }

    fn sort_key(&self) -> (NaiveDateTime, u8, Uuid) {
        match self {
            // Corporate actions apply before any same-instant transaction.
            Self::Action { at, .. } => (*at, 0, Uuid::nil()),
            Self::Txn {
                transaction,
                origin,
            } => {
                let rank = match origin {
                    EntryOrigin::Stored => 1,
                    EntryOrigin::Recurring { .. } => 2,
                };
                (transaction.date, rank, transaction.id)
            }
        }
    }
}

/// All replayable items up to `until`, in deterministic order: stored
/// transactions, optionally virtual occurrences, and corporate actions.
fn build_timeline(dataset: &Dataset, until: NaiveDateTime, include_virtual: bool) -> Vec<ReplayItem> {
    let mut items: Vec<ReplayItem> = Vec::new();

    for transaction in &dataset.transactions {
        if transaction.date <= until {
            items.push(ReplayItem::Txn {
                transaction: transaction.clone(),
                origin: EntryOrigin::Stored,
            });
        }
    }

    if include_virtual {
        for template in &dataset.templates {
            for occurrence in expand_template(template, None, until) {
                items.push(ReplayItem::Txn {
                    transaction: template.instantiate(occurrence),
                    origin: EntryOrigin::Recurring {
                        template_id: template.id,
                    },
                });
            }
        }
    }

    for asset in dataset.assets.all() {
        for split in &asset.splits {
            let at = split.date.and_time(NaiveTime::MIN);
            if at <= until {
                items.push(ReplayItem::Action {
                    at,
                    symbol: asset.symbol.clone(),
                    action: CorporateAction::Split {
                        ratio: split.ratio(),
                    },
                });
            }
        }
        for dividend in &asset.dividends {
            let at = dividend.date.and_time(NaiveTime::MIN);
            if at <= until {
                items.push(ReplayItem::Action {
                    at,
                    symbol: asset.symbol.clone(),
                    action: CorporateAction::Dividend {
                        amount_per_unit: dividend.amount,
                    },
                });
            }
        }
    }

    items.sort_by_key(ReplayItem::sort_key);
    items
}

struct Replay<'a> {
    dataset: &'a Dataset,
    states: HashMap<i64, PortfolioState>,
    warnings: Vec<AggregationWarning>,
    /// Overdrafts caused by stored rows, kept as errors for consistency
    /// verification.
    overdrafts: Vec<CoreError>,
}

impl<'a> Replay<'a> {
    fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            states: HashMap::new(),
            warnings: Vec::new(),
            overdrafts: Vec::new(),
        }
    }

    fn apply(&mut self, item: &ReplayItem) {
        match item {
            ReplayItem::Action { at, symbol, action } => self.apply_action(*at, symbol, action),
            ReplayItem::Txn {
                transaction,
                origin,
            } => self.apply_transaction(transaction, origin),
        }
    }

    fn apply_action(&mut self, at: NaiveDateTime, symbol: &str, action: &CorporateAction) {
        match action {
            CorporateAction::Split { ratio } => {
                // Quantity scales, total basis is invariant, so per-unit
                // cost divides by the ratio.
                for state in self.states.values_mut() {
                    if let Some(position) = state.positions.get_mut(symbol) {
                        position.quantity *= ratio;
                    }
                }
            }
            CorporateAction::Dividend { amount_per_unit } => {
                let asset_currency = match self.dataset.assets.get(symbol) {
                    Some(asset) => asset.currency.clone(),
                    None => return,
                };
                let portfolio_ids: Vec<i64> = self.states.keys().copied().collect();
                for pid in portfolio_ids {
                    let quantity = self.states[&pid]
                        .positions
                        .get(symbol)
                        .map_or(0.0, |p| p.quantity);
                    if quantity <= EPSILON {
                        continue;
                    }
                    let reporting = self.portfolio_currency(pid);
                    match self.dataset.currencies.convert(
                        quantity * amount_per_unit,
                        &asset_currency,
                        &reporting,
                    ) {
                        Ok(income) => {
                            if let Some(state) = self.states.get_mut(&pid) {
                                state.dividends += income;
                            }
                        }
                        Err(e) => self.push_warning(pid, Some(symbol), at, None, e.to_string()),
                    }
                }
            }
        }
    }

    fn apply_transaction(&mut self, txn: &Transaction, origin: &EntryOrigin) {
        let pid = txn.portfolio_id;
        let reporting = self.portfolio_currency(pid);

        match txn.kind {
            TransactionKind::Buy => {
                // Commission is a cash cost, not capitalized: average cost
                // stays the pure price average, and only the sell-side
                // commission reduces realized results.
                let cost = txn.quantity * txn.price;
                let Some(cost) = self.convert_or_warn(txn, cost, &reporting) else {
                    return;
                };
                let position = self.position_mut(pid, txn);
                position.quantity += txn.quantity;
                position.cost_basis += cost;
            }
            TransactionKind::Sell => {
                let held = self
                    .position_quantity(pid, txn);
                if txn.quantity > held + EPSILON {
                    self.record_overdraft(txn, origin, held);
                    return;
                }
                let proceeds = txn.quantity * txn.price - txn.commission - txn.tax;
                let Some(proceeds) = self.convert_or_warn(txn, proceeds, &reporting) else {
                    return;
                };
                let position = self.position_mut(pid, txn);
                let average = position.average_cost();
                position.quantity -= txn.quantity;
                position.cost_basis -= txn.quantity * average;
                if position.quantity <= EPSILON {
                    position.quantity = 0.0;
                    position.cost_basis = 0.0;
                }
                self.state_mut(pid).realized += proceeds - txn.quantity * average;
            }
            TransactionKind::Dividend => {
                let income = txn.quantity * txn.price - txn.commission - txn.tax;
                let Some(income) = self.convert_or_warn(txn, income, &reporting) else {
                    return;
                };
                self.state_mut(pid).dividends += income;
            }
            TransactionKind::Deposit => {
                *self
                    .state_mut(pid)
                    .cash
                    .entry(txn.currency.clone())
                    .or_insert(0.0) += txn.quantity;
            }
            TransactionKind::Withdraw => {
                *self
                    .state_mut(pid)
                    .cash
                    .entry(txn.currency.clone())
                    .or_insert(0.0) -= txn.quantity;
            }
            TransactionKind::Transfer => self.apply_transfer(txn, origin),
        }
    }

    /// Units and basis move at unchanged average cost; no gain or loss is
    /// realized by the transfer itself.
    fn apply_transfer(&mut self, txn: &Transaction, origin: &EntryOrigin) {
        let source = txn.portfolio_id;
        let Some(target) = txn.target_portfolio_id else {
            self.push_warning(
                source,
                txn.instrument.as_ref().map(|i| i.symbol.as_str()),
                txn.date,
                Some(txn.id),
                "Transfer without target portfolio skipped".into(),
            );
            return;
        };

        match &txn.instrument {
            Some(instrument) => {
                let held = self.position_quantity(source, txn);
                if txn.quantity > held + EPSILON {
                    self.record_overdraft(txn, origin, held);
                    return;
                }
                let source_currency = self.portfolio_currency(source);
                let target_currency = self.portfolio_currency(target);

                let position = self.position_mut(source, txn);
                let average = position.average_cost();
                let moved_basis = txn.quantity * average;
                position.quantity -= txn.quantity;
                position.cost_basis -= moved_basis;
                if position.quantity <= EPSILON {
                    position.quantity = 0.0;
                    position.cost_basis = 0.0;
                }

                let moved_basis_target = match self.dataset.currencies.convert(
                    moved_basis,
                    &source_currency,
                    &target_currency,
                ) {
                    Ok(v) => v,
                    Err(e) => {
                        // Units were already moved out; book them in at the
                        // unconverted basis and flag it.
                        self.push_warning(
                            target,
                            Some(instrument.symbol.as_str()),
                            txn.date,
                            Some(txn.id),
                            format!("Transfer basis conversion failed: {e}"),
                        );
                        moved_basis
                    }
                };
                let target_position = self
                    .state_mut(target)
                    .positions
                    .entry(instrument.symbol.clone())
                    .or_default();
                target_position.quantity += txn.quantity;
                target_position.cost_basis += moved_basis_target;
            }
            None => {
                *self
                    .state_mut(source)
                    .cash
                    .entry(txn.currency.clone())
                    .or_insert(0.0) -= txn.quantity;
                *self
                    .state_mut(target)
                    .cash
                    .entry(txn.currency.clone())
                    .or_insert(0.0) += txn.quantity;
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn portfolio_currency(&self, portfolio_id: i64) -> String {
        self.dataset
            .portfolio(portfolio_id)
            .map(|p| p.currency.clone())
            .unwrap_or_else(|| self.dataset.settings.default_currency.clone())
    }

    fn state_mut(&mut self, portfolio_id: i64) -> &mut PortfolioState {
        self.states.entry(portfolio_id).or_default()
    }

    fn position_mut(&mut self, portfolio_id: i64, txn: &Transaction) -> &mut Position {
        let symbol = txn
            .instrument
            .as_ref()
            .map(|i| i.symbol.clone())
            .unwrap_or_default();
        self.state_mut(portfolio_id)
            .positions
            .entry(symbol)
            .or_default()
    }

    fn position_quantity(&self, portfolio_id: i64, txn: &Transaction) -> f64 {
        let Some(instrument) = &txn.instrument else {
            return 0.0;
        };
        self.states
            .get(&portfolio_id)
            .and_then(|s| s.positions.get(&instrument.symbol))
            .map_or(0.0, |p| p.quantity)
    }

    fn convert_or_warn(&mut self, txn: &Transaction, amount: f64, to: &str) -> Option<f64> {
        match self.dataset.currencies.convert(amount, &txn.currency, to) {
            Ok(v) => Some(v),
            Err(e) => {
                self.push_warning(
                    txn.portfolio_id,
                    txn.instrument.as_ref().map(|i| i.symbol.as_str()),
                    txn.date,
                    Some(txn.id),
                    format!("Transaction skipped: {e}"),
                );
                None
            }
        }
    }

    fn record_overdraft(&mut self, txn: &Transaction, origin: &EntryOrigin, held: f64) {
        let symbol = txn
            .instrument
            .as_ref()
            .map(|i| i.symbol.clone())
            .unwrap_or_default();
        if matches!(origin, EntryOrigin::Stored) {
            self.overdrafts.push(CoreError::OverdraftSell {
                symbol: symbol.clone(),
                portfolio_id: txn.portfolio_id,
                date: txn.date,
                requested: txn.quantity,
                held,
            });
        }
        self.push_warning(
            txn.portfolio_id,
            Some(&symbol),
            txn.date,
            Some(txn.id),
            format!(
                "Cannot dispose of {} units — only {held} held; transaction skipped",
                txn.quantity
            ),
        );
    }

    fn push_warning(
        &mut self,
        portfolio_id: i64,
        symbol: Option<&str>,
        date: NaiveDateTime,
        transaction_id: Option<Uuid>,
        message: String,
    ) {
        let warning = AggregationWarning {
            portfolio_id,
            symbol: symbol.map(str::to_string),
            date,
            transaction_id,
            message,
        };
        warn!("{warning}");
        self.warnings.push(warning);
    }
}

/// Collapse replay state into the requested portfolio's view: either one
/// real portfolio's state as-is, or the converted symbol-wise sum of every
/// real portfolio for the "All" aggregate.
fn merge_states(
    dataset: &Dataset,
    portfolio_id: i64,
    reporting_currency: &str,
    replay: &Replay<'_>,
    warnings: &mut Vec<AggregationWarning>,
) -> (HashMap<String, Position>, HashMap<String, f64>, f64, f64) {
    if portfolio_id != ALL_PORTFOLIO_ID {
        let state = replay.states.get(&portfolio_id).cloned().unwrap_or_default();
        return (state.positions, state.cash, state.realized, state.dividends);
    }

    let mut positions: HashMap<String, Position> = HashMap::new();
    let mut cash: HashMap<String, f64> = HashMap::new();
    let mut realized = 0.0;
    let mut dividends = 0.0;

    for portfolio in &dataset.portfolios {
        let Some(state) = replay.states.get(&portfolio.id) else {
            continue;
        };
        let convert = |amount: f64, warnings: &mut Vec<AggregationWarning>| {
            match dataset
                .currencies
                .convert(amount, &portfolio.currency, reporting_currency)
            {
                Ok(v) => v,
                Err(e) => {
                    warnings.push(AggregationWarning {
                        portfolio_id: ALL_PORTFOLIO_ID,
                        symbol: None,
                        date: chrono::Utc::now().naive_utc(),
                        transaction_id: None,
                        message: format!(
                            "Portfolio {} amounts not convertible to {reporting_currency}: {e}",
                            portfolio.id
                        ),
                    });
                    0.0
                }
            }
        };
        for (symbol, position) in &state.positions {
            let merged = positions.entry(symbol.clone()).or_default();
            merged.quantity += position.quantity;
            merged.cost_basis += convert(position.cost_basis, warnings);
        }
        for (currency, amount) in &state.cash {
            *cash.entry(currency.clone()).or_insert(0.0) += amount;
        }
        realized += convert(state.realized, warnings);
        dividends += convert(state.dividends, warnings);
    }

    (positions, cash, realized, dividends)
}

fn concerns_portfolio(transaction: &Transaction, portfolio_id: i64) -> bool {
    portfolio_id == ALL_PORTFOLIO_ID
        || transaction.portfolio_id == portfolio_id
        || transaction.target_portfolio_id == Some(portfolio_id)
}

fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}
