// ═══════════════════════════════════════════════════════════════════
// Model Tests — Asset, AssetBook, Dataset, Transaction, templates
// ═══════════════════════════════════════════════════════════════════

use chrono::{NaiveDate, NaiveDateTime};
use std::str::FromStr;
use uuid::Uuid;

use portfolio_tracker_core::errors::CoreError;
use portfolio_tracker_core::models::asset::{Asset, AssetBook, InstrumentKind};
use portfolio_tracker_core::models::dataset::Dataset;
use portfolio_tracker_core::models::quote::{QuoteBar, SplitEvent};
use portfolio_tracker_core::models::transaction::{
    InstrumentRef, RecurringTemplate, Transaction, TransactionKind,
};
use portfolio_tracker_core::providers::traits::Interval;
use portfolio_tracker_core::recurrence::Recurrence;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn dt(y: i32, m: u32, day: u32, h: u32, min: u32) -> NaiveDateTime {
    d(y, m, day).and_hms_opt(h, min, 0).unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// Asset
// ═══════════════════════════════════════════════════════════════════

mod asset {
    use super::*;

    fn with_quotes() -> Asset {
        let mut asset = Asset::manual("aapl", "Apple Inc.", "usd", InstrumentKind::Equity);
        asset.upsert_bar(QuoteBar::flat(d(2025, 1, 10), 100.0));
        asset.upsert_bar(QuoteBar::flat(d(2025, 1, 20), 110.0));
        asset.upsert_bar(QuoteBar::flat(d(2025, 1, 30), 120.0));
        asset
    }

    #[test]
    fn symbol_and_currency_are_uppercased() {
        let asset = with_quotes();
        assert_eq!(asset.symbol, "AAPL");
        assert_eq!(asset.currency, "USD");
        assert!(!asset.from_api);
    }

    #[test]
    fn close_at_or_before_picks_the_nearest_earlier_bar() {
        let asset = with_quotes();
        assert_eq!(asset.close_at_or_before(d(2025, 1, 10)).unwrap(), 100.0);
        assert_eq!(asset.close_at_or_before(d(2025, 1, 25)).unwrap(), 110.0);
        assert_eq!(asset.close_at_or_before(d(2025, 6, 1)).unwrap(), 120.0);
    }

    #[test]
    fn close_before_first_bar_is_an_error() {
        let asset = with_quotes();
        let err = asset.close_at_or_before(d(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, CoreError::NoDataBefore { .. }));
    }

    #[test]
    fn upsert_bar_replaces_same_date_and_keeps_order() {
        let mut asset = with_quotes();
        asset.upsert_bar(QuoteBar::flat(d(2025, 1, 20), 111.0));
        asset.upsert_bar(QuoteBar::flat(d(2025, 1, 5), 90.0));
        assert_eq!(asset.quotes.len(), 4);
        assert!(asset.quotes.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(asset.close_at_or_before(d(2025, 1, 20)).unwrap(), 111.0);
    }

    #[test]
    fn split_factor_is_the_product_inside_the_window() {
        let mut asset = with_quotes();
        asset.upsert_split(SplitEvent {
            date: d(2025, 2, 1),
            numerator: 2,
            denominator: 1,
        });
        asset.upsert_split(SplitEvent {
            date: d(2025, 3, 1),
            numerator: 3,
            denominator: 1,
        });
        assert_eq!(asset.split_factor_between(d(2025, 1, 1), d(2025, 3, 31)), 6.0);
        assert_eq!(asset.split_factor_between(d(2025, 2, 1), d(2025, 3, 31)), 3.0);
        assert_eq!(asset.split_factor_between(d(2025, 3, 1), d(2025, 3, 31)), 1.0);
    }

    #[test]
    fn latest_close_is_the_last_bar() {
        assert_eq!(with_quotes().latest_close(), Some(120.0));
        let empty = Asset::manual("X", "X", "USD", InstrumentKind::Other);
        assert_eq!(empty.latest_close(), None);
    }
}

// ═══════════════════════════════════════════════════════════════════
// AssetBook
// ═══════════════════════════════════════════════════════════════════

mod asset_book {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut book = AssetBook::new();
        book.upsert(Asset::manual("VWCE.DE", "FTSE All-World", "EUR", InstrumentKind::Etf));
        assert!(book.contains("vwce.de"));
        assert!(book.get("vwce.de").is_some());
    }

    #[test]
    fn all_is_sorted_by_symbol() {
        let mut book = AssetBook::new();
        book.upsert(Asset::manual("MSFT", "Microsoft", "USD", InstrumentKind::Equity));
        book.upsert(Asset::manual("AAPL", "Apple", "USD", InstrumentKind::Equity));
        let symbols: Vec<_> = book.all().iter().map(|a| a.symbol.clone()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn freshness_is_per_symbol_per_day() {
        let mut book = AssetBook::new();
        book.upsert(Asset::manual("AAPL", "Apple", "USD", InstrumentKind::Equity));
        let today = d(2025, 5, 1);
        assert!(!book.is_fresh("AAPL", today));
        book.mark_refreshed("aapl", today);
        assert!(book.is_fresh("AAPL", today));
        assert!(!book.is_fresh("AAPL", d(2025, 5, 2)));
    }

    #[test]
    fn remove_clears_refresh_tracking() {
        let mut book = AssetBook::new();
        book.upsert(Asset::manual("AAPL", "Apple", "USD", InstrumentKind::Equity));
        book.mark_refreshed("AAPL", d(2025, 5, 1));
        assert!(book.remove("AAPL").is_some());
        assert_eq!(book.last_refreshed("AAPL"), None);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Dataset
// ═══════════════════════════════════════════════════════════════════

mod dataset {
    use super::*;

    #[test]
    fn transactions_stay_sorted_by_date_then_id() {
        let mut dataset = Dataset::new();
        dataset.insert_transaction(Transaction::cash(
            0,
            TransactionKind::Deposit,
            2.0,
            "USD",
            dt(2025, 2, 1, 0, 0),
        ));
        dataset.insert_transaction(Transaction::cash(
            0,
            TransactionKind::Deposit,
            1.0,
            "USD",
            dt(2025, 1, 1, 0, 0),
        ));
        dataset.insert_transaction(Transaction::cash(
            0,
            TransactionKind::Deposit,
            3.0,
            "USD",
            dt(2025, 1, 15, 0, 0),
        ));
        let dates: Vec<_> = dataset.transactions.iter().map(|t| t.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[test]
    fn id_sequences_are_monotonic() {
        let mut dataset = Dataset::new();
        assert_eq!(dataset.allocate_portfolio_id(), 0);
        assert_eq!(dataset.allocate_portfolio_id(), 1);
        assert_eq!(dataset.allocate_institution_id(), 0);
        assert_eq!(dataset.allocate_institution_id(), 1);
    }

    #[test]
    fn symbol_reference_checks_cover_templates() {
        let mut dataset = Dataset::new();
        assert!(!dataset.symbol_referenced("AAPL"));
        dataset.templates.push(RecurringTemplate::new(
            0,
            TransactionKind::Buy,
            Some(InstrumentRef::new("AAPL", false)),
            1.0,
            100.0,
            "USD",
            Recurrence::parse("monthly").unwrap(),
            dt(2025, 1, 1, 0, 0),
        ));
        assert!(dataset.symbol_referenced("aapl"));
    }

    #[test]
    fn portfolio_reference_includes_transfer_targets() {
        let mut dataset = Dataset::new();
        dataset.insert_transaction(
            Transaction::cash(0, TransactionKind::Transfer, 1.0, "USD", dt(2025, 1, 1, 0, 0))
                .with_target(7),
        );
        assert!(dataset.portfolio_referenced(0));
        assert!(dataset.portfolio_referenced(7));
        assert!(!dataset.portfolio_referenced(3));
    }

    #[test]
    fn remove_transaction_returns_the_row() {
        let mut dataset = Dataset::new();
        let txn = Transaction::cash(0, TransactionKind::Deposit, 1.0, "USD", dt(2025, 1, 1, 0, 0));
        let id = txn.id;
        dataset.insert_transaction(txn);
        assert!(dataset.remove_transaction(id).is_some());
        assert!(dataset.remove_transaction(id).is_none());
        assert!(dataset.transaction(id).is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Transactions & templates
// ═══════════════════════════════════════════════════════════════════

mod transactions {
    use super::*;

    #[test]
    fn constructors_normalize_currency_and_symbol() {
        let txn = Transaction::asset(
            0,
            TransactionKind::Buy,
            InstrumentRef::new("aapl", true),
            1.0,
            100.0,
            "usd",
            dt(2025, 1, 1, 0, 0),
        );
        assert_eq!(txn.currency, "USD");
        assert_eq!(txn.instrument.unwrap().symbol, "AAPL");
    }

    #[test]
    fn cash_rows_have_no_instrument() {
        let txn = Transaction::cash(0, TransactionKind::Deposit, 50.0, "EUR", dt(2025, 1, 1, 0, 0));
        assert!(txn.instrument.is_none());
        assert_eq!(txn.quantity, 50.0);
        assert!(!txn.is_transfer());
    }

    #[test]
    fn builder_helpers_compose() {
        let txn = Transaction::cash(0, TransactionKind::Transfer, 10.0, "USD", dt(2025, 1, 1, 0, 0))
            .with_target(1)
            .with_notes("monthly sweep")
            .as_housekeeping();
        assert_eq!(txn.target_portfolio_id, Some(1));
        assert_eq!(txn.notes.as_deref(), Some("monthly sweep"));
        assert!(txn.housekeeping);
        assert!(txn.is_transfer());
    }

    #[test]
    fn instantiate_reuses_the_template_id() {
        let template = RecurringTemplate::new(
            0,
            TransactionKind::Deposit,
            None,
            100.0,
            0.0,
            "USD",
            Recurrence::parse("monthly").unwrap(),
            dt(2025, 1, 1, 0, 0),
        );
        let at = dt(2025, 2, 1, 9, 0);
        let virtual_row = template.instantiate(at);
        assert_eq!(virtual_row.id, template.id);
        assert_eq!(virtual_row.date, at);
        assert!(!virtual_row.housekeeping);
    }

    #[test]
    fn materialize_mints_a_new_id() {
        let template = RecurringTemplate::new(
            0,
            TransactionKind::Deposit,
            None,
            100.0,
            0.0,
            "USD",
            Recurrence::parse("monthly").unwrap(),
            dt(2025, 1, 1, 0, 0),
        );
        let at = dt(2025, 2, 1, 9, 0);
        let stored = template.materialize(at);
        assert_ne!(stored.id, template.id);
        assert_ne!(stored.id, Uuid::nil());
        assert_eq!(stored.date, at);
        assert_eq!(stored.quantity, 100.0);
    }

    #[test]
    fn cash_only_kinds() {
        assert!(TransactionKind::Deposit.is_cash_only());
        assert!(TransactionKind::Withdraw.is_cash_only());
        assert!(!TransactionKind::Buy.is_cash_only());
        assert!(!TransactionKind::Transfer.is_cash_only());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Enums
// ═══════════════════════════════════════════════════════════════════

mod enums {
    use super::*;

    #[test]
    fn interval_round_trips_through_strings() {
        for s in ["1m", "15m", "1h", "1d", "1wk", "1mo", "3mo"] {
            let interval = Interval::from_str(s).unwrap();
            assert_eq!(interval.as_str(), s);
        }
        assert!(Interval::from_str("2d").is_err());
        assert!(Interval::from_str("").is_err());
    }

    #[test]
    fn instrument_kind_provider_mapping_is_total() {
        assert_eq!(InstrumentKind::from_provider("EQUITY"), InstrumentKind::Equity);
        assert_eq!(InstrumentKind::from_provider("etf"), InstrumentKind::Etf);
        assert_eq!(
            InstrumentKind::from_provider("CRYPTOCURRENCY"),
            InstrumentKind::Crypto
        );
        // Unknown strings become Other, never an error.
        assert_eq!(InstrumentKind::from_provider("WARRANT"), InstrumentKind::Other);
    }

    #[test]
    fn instrument_kind_user_parse_is_strict() {
        assert_eq!(InstrumentKind::from_str("stock").unwrap(), InstrumentKind::Equity);
        assert_eq!(InstrumentKind::from_str("Mutual Fund").unwrap(), InstrumentKind::MutualFund);
        assert!(InstrumentKind::from_str("warrant").is_err());
    }
}
