//! Relational store integration tests

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use crate::common::{fixtures, fresh_database, logging};
use fundamentals_graph::models::StatementKind;
use fundamentals_graph::PipelineError;

#[test_log::test(tokio::test)]
async fn test_register_company_is_idempotent() {
    let store = fresh_database().await;

    let first = store.db.register_company("IBM", "International Business Machines").await.unwrap();
    let second = store.db.register_company("IBM", "IBM again").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.db.find_company_id("IBM").await.unwrap(), Some(first));
    assert_eq!(store.db.find_company_id("MSFT").await.unwrap(), None);
    assert_eq!(store.db.list_companies().await.unwrap().len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_initialize_twice_is_harmless() {
    let store = fresh_database().await;
    store.db.initialize().await.unwrap();

    for kind in StatementKind::ALL {
        assert_eq!(store.db.count_statements(kind).await.unwrap(), 0);
    }
}

#[test_log::test(tokio::test)]
async fn test_insert_all_statement_kinds() {
    logging::log_test_step("Inserting two periods of statements");
    let store = fresh_database().await;
    let ids = store.with_companies(&["IBM"]).await;

    let mut records = fixtures::full_period(ids[0], "2023-12-31");
    records.extend(fixtures::full_period(ids[0], "2022-12-31"));

    let report = store.db.insert_financial_data("IBM", &records).await.unwrap();
    logging::log_test_data("Insert report", &report);

    assert_eq!(report.total_inserted(), 6);
    assert_eq!(report.skipped, 0);
    for kind in StatementKind::ALL {
        assert_eq!(report.inserted_for(kind), 2);
        assert_eq!(store.db.count_statements(kind).await.unwrap(), 2);
    }
}

#[test_log::test(tokio::test)]
async fn test_mismatched_record_is_skipped_and_batch_continues() {
    let store = fresh_database().await;
    let ids = store.with_companies(&["AAPL"]).await;

    let mut broken = fixtures::balance_sheet_record(ids[0], "2023-09-30", 10.0);
    broken.values.remove("goodwill");

    let records = vec![
        fixtures::balance_sheet_record(ids[0], "2022-09-30", 9.0),
        broken,
        fixtures::balance_sheet_record(ids[0], "2021-09-30", 8.0),
        fixtures::income_statement_record(ids[0], "2023-09-30", 100.0),
    ];

    let report = store.db.insert_financial_data("AAPL", &records).await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.inserted_for(StatementKind::BalanceSheet), 2);
    assert_eq!(report.inserted_for(StatementKind::IncomeStatement), 1);
    assert_eq!(store.db.count_statements(StatementKind::BalanceSheet).await.unwrap(), 2);
}

#[test_log::test(tokio::test)]
async fn test_unknown_company_rolls_back_whole_unit() {
    let store = fresh_database().await;
    let ids = store.with_companies(&["MSFT"]).await;

    let records = vec![
        fixtures::cash_flow_record(ids[0], "2023-06-30", 1.0),
        fixtures::balance_sheet_record(ids[0] + 100, "2023-06-30", 1.0),
    ];

    let err = store.db.insert_financial_data("MSFT", &records).await.unwrap_err();

    assert_matches!(err, PipelineError::Constraint(_));
    assert!(!err.is_retryable());
    assert_eq!(store.db.count_statements(StatementKind::CashFlow).await.unwrap(), 0);
    assert_eq!(store.db.count_statements(StatementKind::BalanceSheet).await.unwrap(), 0);
}

#[test_log::test(tokio::test)]
async fn test_stored_records_read_back_with_ids() {
    let store = fresh_database().await;
    let ids = store.with_companies(&["IBM", "TXN"]).await;

    let mut records = fixtures::full_period(ids[0], "2023-12-31");
    store.db.insert_financial_data("IBM", &records).await.unwrap();
    records = fixtures::full_period(ids[1], "2023-12-31");
    store.db.insert_financial_data("TXN", &records).await.unwrap();

    let cash_flows = store.db.fetch_statement_records(StatementKind::CashFlow).await.unwrap();

    assert_eq!(cash_flows.len(), 2);
    assert_eq!(cash_flows[0].company_id, ids[0]);
    assert_eq!(cash_flows[1].company_id, ids[1]);
    assert!(cash_flows.iter().all(|r| r.statement_id.is_some()));
    assert_eq!(cash_flows[0].value("operating_cashflow"), Some(1_500.0));
    // absent at the source, stored as the default and still flagged
    assert_eq!(cash_flows[0].value("cashflow_from_financing"), Some(0.0));
    assert!(cash_flows[0].is_defaulted("cashflow_from_financing"));
    assert!(!cash_flows[0].is_defaulted("operating_cashflow"));
    assert_eq!(cash_flows[0].defaulted_fields(), records[2].defaulted_fields());
    assert_eq!(cash_flows[0].reported_currency.as_deref(), Some("USD"));
    assert_eq!(cash_flows[0].fiscal_date_ending.to_string(), "2023-12-31");
}

#[test_log::test(tokio::test)]
async fn test_unreadable_numeric_column_is_not_read_as_zero() {
    let store = fresh_database().await;
    let ids = store.with_companies(&["IBM"]).await;

    let records = vec![
        fixtures::cash_flow_record(ids[0], "2023-12-31", 1_500.0),
        fixtures::cash_flow_record(ids[0], "2022-12-31", 1_200.0),
    ];
    store.db.insert_financial_data("IBM", &records).await.unwrap();
    store
        .execute_raw("UPDATE CASH_FLOW SET operating_cashflow = 'n/a' WHERE fiscal_date_ending = '2023-12-31'")
        .await;

    let cash_flows = store.db.fetch_statement_records(StatementKind::CashFlow).await.unwrap();

    assert_eq!(cash_flows.len(), 1);
    assert_eq!(cash_flows[0].fiscal_date_ending.to_string(), "2022-12-31");
    assert_eq!(cash_flows[0].value("operating_cashflow"), Some(1_200.0));
}
