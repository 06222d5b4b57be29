//! Relational → graph sync.

use tracing::{error, info, warn};

use super::GraphStore;
use crate::database::DatabaseManager;
use crate::error::Result;
use crate::models::StatementKind;

/// MERGE every registered company as a `Company` node.
pub async fn sync_companies_to_graph(db: &DatabaseManager, graph: &dyn GraphStore) -> Result<usize> {
    let companies = db.list_companies().await?;
    for company in &companies {
        graph.merge_company(company).await?;
    }
    info!("Merged {} company nodes into the graph", companies.len());
    Ok(companies.len())
}

/// Copy every stored statement of `kind` into the graph.
///
/// A read failure counts as an empty batch. A write failure aborts the rest
/// of the batch and is reported once; `None` means the batch did not finish.
pub async fn sync_statements_to_graph(
    db: &DatabaseManager,
    graph: &dyn GraphStore,
    kind: StatementKind,
) -> Option<usize> {
    let records = match db.fetch_statement_records(kind).await {
        Ok(records) => records,
        Err(e) => {
            error!("Error fetching {} data: {}", kind, e);
            Vec::new()
        }
    };

    if records.is_empty() {
        warn!("No {} records to sync", kind);
        return Some(0);
    }

    let mut merged = 0;
    for record in &records {
        if let Err(e) = graph.merge_statement(record).await {
            error!("Error inserting {} data into the graph: {}", kind, e);
            return None;
        }
        merged += 1;
    }

    info!("{} data inserted into the graph ({} nodes).", kind.display_name(), merged);
    Some(merged)
}

/// Companies first, then each requested statement kind in turn.
pub async fn sync_all(
    db: &DatabaseManager,
    graph: &dyn GraphStore,
    kinds: &[StatementKind],
) -> Result<Vec<(StatementKind, Option<usize>)>> {
    sync_companies_to_graph(db, graph).await?;

    let mut outcomes = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        outcomes.push((kind, sync_statements_to_graph(db, graph, kind).await));
    }
    Ok(outcomes)
}
