use crate::errors::CoreError;
use crate::models::dataset::Dataset;
use crate::models::export::ExportSnapshot;
use crate::models::transaction::Transaction;

/// Produces read-only exports of the dataset: a JSON snapshot of all user
/// data, and a CSV rendering of the transaction log.
///
/// Exports are plaintext by design — they are for interop with other
/// tools, not for backup (the encrypted snapshot file covers that).
pub struct ExportService;

impl ExportService {
    pub fn new() -> Self {
        Self
    }

    /// Snapshot of all real portfolios, transactions, and templates.
    /// Institutions are included only if some portfolio references them.
    #[must_use]
    pub fn snapshot(&self, dataset: &Dataset) -> ExportSnapshot {
        let institutions = dataset
            .institutions
            .iter()
            .filter(|i| dataset.institution_referenced(i.id))
            .cloned()
            .collect();
        ExportSnapshot {
            portfolios: dataset.portfolios.clone(),
            transactions: dataset.transactions.clone(),
            templates: dataset.templates.clone(),
            institutions,
        }
    }

    /// Pretty-printed JSON export.
    pub fn to_json(&self, dataset: &Dataset) -> Result<String, CoreError> {
        let snapshot = self.snapshot(dataset);
        serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// CSV rendering of the stored transaction log, ordered as stored
    /// (ascending by date). Housekeeping rows are included so the export
    /// reproduces balances exactly.
    #[must_use]
    pub fn transactions_to_csv(&self, dataset: &Dataset) -> String {
        let mut out = String::from(
            "id,date,portfolio_id,kind,symbol,quantity,price,commission,tax,currency,target_portfolio_id,housekeeping,notes\n",
        );
        for transaction in &dataset.transactions {
            out.push_str(&Self::csv_row(transaction));
            out.push('\n');
        }
        out
    }

    fn csv_row(t: &Transaction) -> String {
        let symbol = t
            .instrument
            .as_ref()
            .map(|i| i.symbol.as_str())
            .unwrap_or("");
        let target = t
            .target_portfolio_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            t.id,
            t.date.format("%Y-%m-%d %H:%M"),
            t.portfolio_id,
            t.kind,
            csv_escape(symbol),
            t.quantity,
            t.price,
            t.commission,
            t.tax,
            t.currency,
            target,
            t.housekeeping,
            csv_escape(t.notes.as_deref().unwrap_or("")),
        )
    }
}

impl Default for ExportService {
    fn default() -> Self {
        Self::new()
    }
}

/// Quote a CSV field if it contains a delimiter, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
