use chrono::{Duration, NaiveDateTime};

use crate::errors::CoreError;
use crate::models::dataset::Dataset;
use crate::models::ledger::{EntryOrigin, LedgerEntry, LedgerOptions, TransferDirection};
use crate::models::portfolio::ALL_PORTFOLIO_ID;
use crate::models::transaction::{RecurringTemplate, Transaction};

/// Builds merged ledger views: stored transactions plus virtual occurrences
/// expanded from recurring templates.
///
/// Pure business logic — no I/O, no API calls.
pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        Self
    }

    /// The ordered ledger of one portfolio (or the "All" aggregate).
    ///
    /// Ordering is ascending by date; at equal timestamps stored rows come
    /// before virtual occurrences, and equal-origin ties break by id. A
    /// transfer appears once in each counterparty's view (out, then in) but
    /// only once, direction-less, in the "All" view.
    ///
    /// Virtual occurrences are expanded up to `to`; with an open-ended
    /// window, expansion stops at the current time so an unbounded listing
    /// never runs into the infinite future.
    pub fn list_for_portfolio(
        &self,
        dataset: &Dataset,
        portfolio_id: i64,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
        options: LedgerOptions,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        if portfolio_id != ALL_PORTFOLIO_ID && dataset.portfolio(portfolio_id).is_none() {
            return Err(CoreError::PortfolioNotFound(portfolio_id));
        }

        let expansion_end = to.unwrap_or_else(|| chrono::Utc::now().naive_utc());
        let mut entries: Vec<LedgerEntry> = Vec::new();

        for transaction in &dataset.transactions {
            if transaction.housekeeping && !options.include_housekeeping {
                continue;
            }
            if !in_window(transaction.date, from, to) {
                continue;
            }
            if let Some(direction) = view_direction(transaction, portfolio_id) {
                entries.push(LedgerEntry {
                    transaction: transaction.clone(),
                    origin: EntryOrigin::Stored,
                    transfer: direction_for_entry(transaction, direction),
                });
            }
        }

        for template in &dataset.templates {
            let Some(direction) = template_view_direction(template, portfolio_id) else {
                continue;
            };
            for occurrence in expand_template(template, from, expansion_end) {
                let transaction = template.instantiate(occurrence);
                entries.push(LedgerEntry {
                    transfer: direction_for_entry(&transaction, direction),
                    transaction,
                    origin: EntryOrigin::Recurring {
                        template_id: template.id,
                    },
                });
            }
        }

        entries.sort_by_key(|e| {
            let origin_rank = match e.origin {
                EntryOrigin::Stored => 0u8,
                EntryOrigin::Recurring { .. } => 1,
            };
            (e.transaction.date, origin_rank, e.transaction.id)
        });

        Ok(entries)
    }
}

impl Default for LedgerService {
    fn default() -> Self {
        Self::new()
    }
}

/// Occurrence timestamps of a template within the listing window,
/// excluding anything already materialized into stored rows.
pub(crate) fn expand_template(
    template: &RecurringTemplate,
    from: Option<NaiveDateTime>,
    until: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    let mut start = template.start;
    if let Some(materialized) = template.materialized_until {
        // Occurrences at or before the high-water mark are stored rows now.
        start = start.max(materialized + Duration::minutes(1));
    }
    if let Some(from) = from {
        start = start.max(from);
    }
    let end = match template.end {
        Some(template_end) => until.min(template_end),
        None => until,
    };
    if start > end {
        return Vec::new();
    }
    template.recurrence.occurrences_between(start, end).collect()
}

fn in_window(date: NaiveDateTime, from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> bool {
    from.is_none_or(|f| date >= f) && to.is_none_or(|t| date <= t)
}

/// How a transaction shows up in the given portfolio's view, if at all.
fn view_direction(transaction: &Transaction, portfolio_id: i64) -> Option<ViewSide> {
    if portfolio_id == ALL_PORTFOLIO_ID {
        // Every row exactly once; transfer double-counting is suppressed
        // by emitting the single row direction-less.
        return Some(ViewSide::Aggregate);
    }
    if transaction.portfolio_id == portfolio_id {
        Some(ViewSide::Source)
    } else if transaction.target_portfolio_id == Some(portfolio_id) {
        Some(ViewSide::Target)
    } else {
        None
    }
}

fn template_view_direction(template: &RecurringTemplate, portfolio_id: i64) -> Option<ViewSide> {
    if portfolio_id == ALL_PORTFOLIO_ID {
        Some(ViewSide::Aggregate)
    } else if template.portfolio_id == portfolio_id {
        Some(ViewSide::Source)
    } else if template.target_portfolio_id == Some(portfolio_id) {
        Some(ViewSide::Target)
    } else {
        None
    }
}

fn direction_for_entry(transaction: &Transaction, side: ViewSide) -> Option<TransferDirection> {
    if !transaction.is_transfer() {
        return None;
    }
    match side {
        ViewSide::Source => Some(TransferDirection::Out),
        ViewSide::Target => Some(TransferDirection::In),
        ViewSide::Aggregate => None,
    }
}

#[derive(Clone, Copy)]
enum ViewSide {
    Source,
    Target,
    Aggregate,
}
