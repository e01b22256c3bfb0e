pub mod aggregation_service;
pub mod export_service;
pub mod ledger_service;
pub mod portfolio_service;
pub mod quote_service;
