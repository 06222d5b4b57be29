//! Provider → relational ingest against a mocked Alpha Vantage

use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{fixtures, fresh_database};
use fundamentals_graph::analysis::{fetch_analysis_frame, prepare_data, ImputationPolicy};
use fundamentals_graph::api::{AlphaVantageClient, StatementProvider};
use fundamentals_graph::graph::sync::sync_all;
use fundamentals_graph::graph::MemoryGraph;
use fundamentals_graph::ingest::{fetch_financial_data, ingest_companies, ingest_company};
use fundamentals_graph::models::StatementKind;
use fundamentals_graph::retry::RetryPolicy;

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(1),
    }
}

async fn mock_function(server: &MockServer, function: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", function))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn client_for(server: &MockServer) -> AlphaVantageClient {
    AlphaVantageClient::with_base_url("demo".to_string(), format!("{}/query", server.uri()), 0).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_client_sends_function_symbol_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "CASH_FLOW"))
        .and(query_param("symbol", "IBM"))
        .and(query_param("apikey", "demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::statements_body(
            "IBM",
            vec![fixtures::cash_flow_report("2023-12-31", 1.0)],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let rows = client_for(&server)
        .fetch_statements(StatementKind::CashFlow, "IBM")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["fiscalDateEnding"], "2023-12-31");
}

#[test_log::test(tokio::test)]
async fn test_each_statement_type_fails_independently() {
    let server = MockServer::start().await;
    mock_function(
        &server,
        "INCOME_STATEMENT",
        json!({"Information": "Thank you for using Alpha Vantage! Please upgrade to premium."}),
    )
    .await;
    mock_function(&server, "BALANCE_SHEET", fixtures::statements_body("IBM", vec![])).await;
    mock_function(
        &server,
        "CASH_FLOW",
        fixtures::statements_body("IBM", vec![fixtures::cash_flow_report("2023-12-31", 5.0)]),
    )
    .await;

    let fetched = fetch_financial_data(&client_for(&server), "IBM").await;

    assert!(fetched.income_statement.is_none());
    assert!(fetched.balance_sheet.is_none());
    assert_eq!(fetched.cash_flow.map(|rows| rows.len()), Some(1));
}

#[test_log::test(tokio::test)]
async fn test_server_error_yields_no_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetched = fetch_financial_data(&client_for(&server), "IBM").await;
    assert!(fetched.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_ingest_company_end_to_end() {
    let server = MockServer::start().await;
    mock_function(
        &server,
        "INCOME_STATEMENT",
        fixtures::statements_body(
            "IBM",
            vec![
                fixtures::income_statement_report("2023-12-31", 61_860.0),
                fixtures::income_statement_report("2022-12-31", 60_530.0),
            ],
        ),
    )
    .await;
    mock_function(
        &server,
        "BALANCE_SHEET",
        fixtures::statements_body("IBM", vec![fixtures::balance_sheet_report("2023-12-31", 135_241.0)]),
    )
    .await;
    mock_function(
        &server,
        "CASH_FLOW",
        fixtures::statements_body(
            "IBM",
            vec![
                fixtures::cash_flow_report("2023-12-31", 13_931.0),
                json!({"reportedCurrency": "USD", "operatingCashflow": "1"}),
            ],
        ),
    )
    .await;

    let store = fresh_database().await;
    store.with_companies(&["IBM"]).await;

    let report = ingest_company(&client_for(&server), &store.db, &quick_retry(), "IBM")
        .await
        .unwrap()
        .expect("IBM is registered and has data");

    assert_eq!(report.inserted_for(StatementKind::IncomeStatement), 2);
    assert_eq!(report.inserted_for(StatementKind::BalanceSheet), 1);
    assert_eq!(report.inserted_for(StatementKind::CashFlow), 1);
    assert_eq!(store.db.count_statements(StatementKind::IncomeStatement).await.unwrap(), 2);

    let incomes = store.db.fetch_statement_records(StatementKind::IncomeStatement).await.unwrap();
    assert_eq!(incomes[0].value("total_revenue"), Some(61_860.0));
    assert_eq!(incomes[0].value("cost_of_goods_and_services_sold"), Some(400.0));
}

#[test_log::test(tokio::test)]
async fn test_unregistered_companies_are_skipped() {
    let server = MockServer::start().await;
    mock_function(
        &server,
        "CASH_FLOW",
        fixtures::statements_body("TXN", vec![fixtures::cash_flow_report("2023-12-31", 2.0)]),
    )
    .await;
    mock_function(&server, "INCOME_STATEMENT", fixtures::statements_body("TXN", vec![])).await;
    mock_function(&server, "BALANCE_SHEET", fixtures::statements_body("TXN", vec![])).await;

    let store = fresh_database().await;
    store.with_companies(&["TXN"]).await;

    let symbols = vec!["TXN".to_string(), "NOPE".to_string()];
    let summary = ingest_companies(&client_for(&server), &store.db, &quick_retry(), &symbols).await;

    assert_eq!(summary.companies_processed, 1);
    assert_eq!(summary.companies_skipped, 1);
    assert_eq!(summary.companies_failed, 0);
    assert_eq!(summary.rows_inserted, 1);
    assert_eq!(store.db.count_statements(StatementKind::CashFlow).await.unwrap(), 1);
}

#[test_log::test(tokio::test)]
async fn test_source_absent_treatment_is_dropped_after_sync() {
    let server = MockServer::start().await;
    mock_function(
        &server,
        "CASH_FLOW",
        fixtures::statements_body(
            "IBM",
            vec![
                json!({
                    "fiscalDateEnding": "2023-12-31",
                    "operatingCashflow": "13931",
                    "cashflowFromInvestment": "-7070",
                    "cashflowFromFinancing": "-6245",
                }),
                json!({
                    "fiscalDateEnding": "2022-12-31",
                    "cashflowFromInvestment": "-4202",
                    "cashflowFromFinancing": "-6426",
                }),
            ],
        ),
    )
    .await;
    mock_function(
        &server,
        "BALANCE_SHEET",
        fixtures::statements_body(
            "IBM",
            vec![
                fixtures::balance_sheet_report("2023-12-31", 135_241.0),
                fixtures::balance_sheet_report("2022-12-31", 127_243.0),
            ],
        ),
    )
    .await;
    mock_function(
        &server,
        "INCOME_STATEMENT",
        fixtures::statements_body(
            "IBM",
            vec![
                fixtures::income_statement_report("2023-12-31", 61_860.0),
                fixtures::income_statement_report("2022-12-31", 60_530.0),
            ],
        ),
    )
    .await;

    let store = fresh_database().await;
    store.with_companies(&["IBM"]).await;
    ingest_company(&client_for(&server), &store.db, &quick_retry(), "IBM")
        .await
        .unwrap()
        .expect("IBM is registered and has data");

    let graph = MemoryGraph::new();
    sync_all(&store.db, &graph, &StatementKind::ALL).await.unwrap();
    let frame = fetch_analysis_frame(&graph).await;

    assert_eq!(frame.len(), 2);
    assert_eq!(frame.rows[0].fiscal_date_ending, "2022-12-31");
    assert_eq!(frame.rows[0].operating_cashflow, None);
    assert_eq!(frame.rows[1].operating_cashflow, Some(13_931.0));

    let complete = prepare_data(&frame, ImputationPolicy::DropIncomplete);
    assert_eq!(complete.dropped, 1);
    assert_eq!(complete.rows.len(), 1);
    assert_eq!(complete.rows[0].fiscal_date_ending, "2023-12-31");

    let filled = prepare_data(&frame, ImputationPolicy::ZeroFill);
    assert_eq!(filled.dropped, 0);
    assert_eq!(filled.treatment(), vec![0.0, 13_931.0]);
}
