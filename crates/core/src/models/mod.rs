pub mod asset;
pub mod currency;
pub mod dataset;
pub mod export;
pub mod holdings;
pub mod institution;
pub mod ledger;
pub mod portfolio;
pub mod quote;
pub mod settings;
pub mod transaction;
