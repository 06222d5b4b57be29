//! MERGE semantics of the in-process graph

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use crate::common::fixtures;
use fundamentals_graph::graph::{GraphStore, MemoryGraph};
use fundamentals_graph::models::{Company, StatementKind};
use fundamentals_graph::PipelineError;

fn company(id: i64, symbol: &str) -> Company {
    Company {
        id,
        symbol: symbol.to_string(),
        name: format!("{} Corp", symbol),
    }
}

#[test_log::test(tokio::test)]
async fn test_merging_twice_keeps_one_node_and_edge() {
    let graph = MemoryGraph::new();
    graph.merge_company(&company(1, "IBM")).await.unwrap();

    let mut record = fixtures::cash_flow_record(1, "2023-12-31", 100.0);
    record.statement_id = Some(10);

    graph.merge_statement(&record).await.unwrap();
    graph.merge_statement(&record).await.unwrap();
    graph.merge_company(&company(1, "IBM")).await.unwrap();

    assert_eq!(graph.company_count(), 1);
    assert_eq!(graph.node_count(StatementKind::CashFlow), 1);
    assert_eq!(graph.edge_count(StatementKind::CashFlow), 1);
}

#[test_log::test(tokio::test)]
async fn test_remerge_overwrites_properties() {
    let graph = MemoryGraph::new();
    graph.merge_company(&company(1, "IBM")).await.unwrap();

    let mut record = fixtures::balance_sheet_record(1, "2023-12-31", 5_000.0);
    record.statement_id = Some(3);
    graph.merge_statement(&record).await.unwrap();

    let mut restated = fixtures::balance_sheet_record(1, "2023-12-31", 6_000.0);
    restated.statement_id = Some(3);
    graph.merge_statement(&restated).await.unwrap();

    assert_eq!(graph.node_count(StatementKind::BalanceSheet), 1);
    assert_eq!(graph.node_value(StatementKind::BalanceSheet, 3, "total_assets"), Some(6_000.0));
    assert!(graph
        .node_defaulted(StatementKind::BalanceSheet, 3)
        .contains(&"goodwill".to_string()));
}

#[test_log::test(tokio::test)]
async fn test_statement_without_company_is_rejected() {
    let graph = MemoryGraph::new();
    let mut record = fixtures::income_statement_record(7, "2023-12-31", 1.0);
    record.statement_id = Some(1);

    let err = graph.merge_statement(&record).await.unwrap_err();
    assert_matches!(err, PipelineError::Constraint(_));
    assert_eq!(graph.node_count(StatementKind::IncomeStatement), 0);
}

#[test_log::test(tokio::test)]
async fn test_unsaved_record_cannot_be_merged() {
    let graph = MemoryGraph::new();
    graph.merge_company(&company(1, "IBM")).await.unwrap();

    let record = fixtures::income_statement_record(1, "2023-12-31", 1.0);
    let err = graph.merge_statement(&record).await.unwrap_err();
    assert_matches!(err, PipelineError::SchemaMismatch { .. });
}

#[test_log::test(tokio::test)]
async fn test_analysis_rows_require_all_three_statements() {
    let graph = MemoryGraph::new();
    graph.merge_company(&company(1, "IBM")).await.unwrap();

    let mut next_id = 1;
    let mut records = fixtures::full_period(1, "2023-12-31");
    records.push(fixtures::cash_flow_record(1, "2022-12-31", 1_200.0));
    for record in &mut records {
        record.statement_id = Some(next_id);
        next_id += 1;
        graph.merge_statement(record).await.unwrap();
    }

    let rows = graph.fetch_analysis_rows().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].symbol, "IBM");
    assert_eq!(rows[0].fiscal_date_ending, "2023-12-31");
    assert_eq!(rows[0].operating_cashflow, Some(1_500.0));
    assert_eq!(rows[0].investment_cashflow, Some(-2_000.0));
    // "None" at the source: stored as 0 but reported as missing
    assert_eq!(rows[0].financing_cashflow, None);
    assert_eq!(rows[0].total_revenue, Some(10_000.0));
    assert_eq!(rows[0].total_assets, Some(5_000.0));
    assert_eq!(rows[0].total_liabilities, Some(3_000.0));
    assert_eq!(rows[0].total_shareholder_equity, Some(2_000.0));
    assert_eq!(rows[0].net_income, Some(900.0));
}
