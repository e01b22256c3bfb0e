use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Unified error type for the entire portfolio-tracker-core library.
/// Every fallible public function returns `Result<T, CoreError>`.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Storage / File ──────────────────────────────────────────────
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(u16),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed — wrong password or corrupted file")]
    Decryption,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ── File I/O (native only) ──────────────────────────────────────
    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("API error ({provider}): {message}")]
    Api { provider: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Quote unavailable for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("No provider available for: {0}")]
    NoProvider(String),

    // ── Identity ────────────────────────────────────────────────────
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ── Recurrence ──────────────────────────────────────────────────
    #[error("Invalid recurrence '{spec}': {reason}")]
    InvalidRecurrence { spec: String, reason: String },

    // ── Currency ────────────────────────────────────────────────────
    #[error("Unknown currency: {code}")]
    UnknownCurrency { code: String },

    // ── Quotes / Corporate actions ──────────────────────────────────
    #[error("No quote data for {symbol} at or before {date}")]
    NoDataBefore { symbol: String, date: NaiveDate },

    // ── Ledger / Aggregation ────────────────────────────────────────
    #[error(
        "Cannot sell {requested} {symbol} from portfolio {portfolio_id} on {date} — only {held} held"
    )]
    OverdraftSell {
        symbol: String,
        portfolio_id: i64,
        date: NaiveDateTime,
        requested: f64,
        held: f64,
    },

    // ── Entity lookups ──────────────────────────────────────────────
    #[error("Portfolio not found: {0}")]
    PortfolioNotFound(i64),

    #[error("Institution not found: {0}")]
    InstitutionNotFound(i64),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(uuid::Uuid),

    #[error("Recurring template not found: {0}")]
    TemplateNotFound(uuid::Uuid),

    // ── Validation ──────────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // Sanitize error message: strip query parameters from URLs so that
        // symbols and API parameters never leak into logs verbatim.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}

impl From<aes_gcm::Error> for CoreError {
    fn from(_: aes_gcm::Error) -> Self {
        CoreError::Decryption
    }
}
