//! Provider → relational ingest, one company at a time.

use tracing::{error, info, warn};

use crate::api::{ProviderRow, StatementProvider};
use crate::database::{DatabaseManager, InsertReport};
use crate::error::Result;
use crate::mapping::{map_record, FieldKey};
use crate::models::{StatementKind, StatementRecord};
use crate::retry::{retry_operation, RetryPolicy};

/// Raw rows for one company; `None` means the statement type was unavailable.
#[derive(Debug, Default, Clone)]
pub struct FetchedStatements {
    pub income_statement: Option<Vec<ProviderRow>>,
    pub balance_sheet: Option<Vec<ProviderRow>>,
    pub cash_flow: Option<Vec<ProviderRow>>,
}

impl FetchedStatements {
    pub fn rows(&self, kind: StatementKind) -> Option<&[ProviderRow]> {
        match kind {
            StatementKind::IncomeStatement => self.income_statement.as_deref(),
            StatementKind::BalanceSheet => self.balance_sheet.as_deref(),
            StatementKind::CashFlow => self.cash_flow.as_deref(),
        }
    }

    fn slot(&mut self, kind: StatementKind) -> &mut Option<Vec<ProviderRow>> {
        match kind {
            StatementKind::IncomeStatement => &mut self.income_statement,
            StatementKind::BalanceSheet => &mut self.balance_sheet,
            StatementKind::CashFlow => &mut self.cash_flow,
        }
    }

    pub fn is_empty(&self) -> bool {
        StatementKind::ALL.iter().all(|kind| self.rows(*kind).is_none())
    }

    /// Map every available row, dropping rows that cannot be mapped.
    pub fn to_records(&self, symbol: &str, company_id: i64) -> Vec<StatementRecord> {
        let mut records = Vec::new();
        for kind in StatementKind::ALL {
            for row in self.rows(kind).unwrap_or_default() {
                match map_record(kind, row, FieldKey::Source, company_id) {
                    Ok(record) => records.push(record),
                    Err(e) => error!("Skipping {} row for {}: {}", kind, symbol, e),
                }
            }
        }
        records
    }
}

/// Fetch all three statement types for `symbol`. Never fails; each type is
/// fetched on its own and comes back `None` when it failed or was empty.
pub async fn fetch_financial_data(provider: &dyn StatementProvider, symbol: &str) -> FetchedStatements {
    let mut fetched = FetchedStatements::default();

    for kind in StatementKind::ALL {
        match provider.fetch_statements(kind, symbol).await {
            Ok(rows) if rows.is_empty() => {
                warn!("{} data is empty for {}", kind.display_name(), symbol);
            }
            Ok(rows) => {
                info!("Fetched {} {} reports for {}", rows.len(), kind, symbol);
                *fetched.slot(kind) = Some(rows);
            }
            Err(e) => {
                error!("Error fetching {} data for {}: {}", kind, symbol, e);
            }
        }
    }

    fetched
}

/// Per-run totals
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestSummary {
    pub companies_processed: usize,
    pub companies_skipped: usize,
    pub companies_failed: usize,
    pub rows_inserted: usize,
    pub rows_skipped: usize,
}

/// Fetch, map and store one company's statements.
///
/// Returns `Ok(None)` when the company is not registered or the provider had
/// nothing for it.
pub async fn ingest_company(
    provider: &dyn StatementProvider,
    db: &DatabaseManager,
    policy: &RetryPolicy,
    symbol: &str,
) -> Result<Option<InsertReport>> {
    let Some(company_id) = db.find_company_id(symbol).await? else {
        warn!("Company ID for {} not found. Skipping...", symbol);
        return Ok(None);
    };

    let fetched = fetch_financial_data(provider, symbol).await;
    if fetched.is_empty() {
        warn!("No financial data available for {}", symbol);
        return Ok(None);
    }

    let records = fetched.to_records(symbol, company_id);
    let records = records.as_slice();
    let report = retry_operation(*policy, move || db.insert_financial_data(symbol, records)).await?;
    Ok(Some(report))
}

/// Ingest each symbol in order; one company's failure does not stop the run.
pub async fn ingest_companies(
    provider: &dyn StatementProvider,
    db: &DatabaseManager,
    policy: &RetryPolicy,
    symbols: &[String],
) -> IngestSummary {
    let mut summary = IngestSummary::default();

    for symbol in symbols {
        info!("Processing {}...", symbol);
        match ingest_company(provider, db, policy, symbol).await {
            Ok(Some(report)) => {
                summary.companies_processed += 1;
                summary.rows_inserted += report.total_inserted();
                summary.rows_skipped += report.skipped;
            }
            Ok(None) => summary.companies_skipped += 1,
            Err(e) => {
                error!("Failed to store financial data for {}: {}", symbol, e);
                summary.companies_failed += 1;
            }
        }
    }

    info!(
        "Ingest finished: {} processed, {} skipped, {} failed, {} rows inserted",
        summary.companies_processed, summary.companies_skipped, summary.companies_failed, summary.rows_inserted
    );
    summary
}
