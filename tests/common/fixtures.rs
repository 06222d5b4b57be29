//! Provider payloads and mapped records

use fundamentals_graph::api::ProviderRow;
use fundamentals_graph::mapping::{map_record, FieldKey};
use fundamentals_graph::models::{StatementKind, StatementRecord};
use serde_json::{json, Value};

pub fn provider_row(value: Value) -> ProviderRow {
    value.as_object().cloned().expect("fixture must be a JSON object")
}

/// An Alpha Vantage fundamentals body wrapping `reports`
pub fn statements_body(symbol: &str, reports: Vec<Value>) -> Value {
    json!({
        "symbol": symbol,
        "annualReports": reports,
        "quarterlyReports": [],
    })
}

pub fn cash_flow_report(date: &str, operating_cashflow: f64) -> Value {
    json!({
        "fiscalDateEnding": date,
        "reportedCurrency": "USD",
        "operatingCashflow": operating_cashflow.to_string(),
        "cashflowFromInvestment": "-2000",
        "cashflowFromFinancing": "None",
        "netIncome": "900",
    })
}

pub fn balance_sheet_report(date: &str, total_assets: f64) -> Value {
    json!({
        "fiscalDateEnding": date,
        "reportedCurrency": "USD",
        "totalAssets": total_assets.to_string(),
        "totalLiabilities": "3000",
        "totalShareholderEquity": "2000",
        "cashAndCashEquivalentsAtCarryingValue": "750",
    })
}

pub fn income_statement_report(date: &str, total_revenue: f64) -> Value {
    json!({
        "fiscalDateEnding": date,
        "reportedCurrency": "USD",
        "totalRevenue": total_revenue.to_string(),
        "netIncome": "900",
        "costofGoodsAndServicesSold": "400",
    })
}

fn record(kind: StatementKind, report: Value, company_id: i64) -> StatementRecord {
    map_record(kind, &provider_row(report), FieldKey::Source, company_id).expect("fixture must map")
}

pub fn cash_flow_record(company_id: i64, date: &str, operating_cashflow: f64) -> StatementRecord {
    record(StatementKind::CashFlow, cash_flow_report(date, operating_cashflow), company_id)
}

pub fn balance_sheet_record(company_id: i64, date: &str, total_assets: f64) -> StatementRecord {
    record(StatementKind::BalanceSheet, balance_sheet_report(date, total_assets), company_id)
}

pub fn income_statement_record(company_id: i64, date: &str, total_revenue: f64) -> StatementRecord {
    record(StatementKind::IncomeStatement, income_statement_report(date, total_revenue), company_id)
}

/// One statement of each kind for the same period
pub fn full_period(company_id: i64, date: &str) -> Vec<StatementRecord> {
    vec![
        income_statement_record(company_id, date, 10_000.0),
        balance_sheet_record(company_id, date, 5_000.0),
        cash_flow_record(company_id, date, 1_500.0),
    ]
}
