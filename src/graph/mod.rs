//! Graph store: Company nodes linked to one node per statement.

use crate::analysis::AnalysisRow;
use crate::error::Result;
use crate::models::{Company, StatementRecord};

pub mod memory;
pub mod neo4j;
pub mod sync;

pub use memory::MemoryGraph;
pub use neo4j::Neo4jGraph;

pub const EXPECTED_LABELS: &[&str] = &["Company", "CashFlow", "BalanceSheet", "IncomeStatement"];
pub const EXPECTED_RELATIONSHIPS: &[&str] =
    &["HAS_CASH_FLOW", "HAS_BALANCE_SHEET", "HAS_INCOME_STATEMENT"];

/// Labels and relationship types present in a graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphInventory {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
}

impl GraphInventory {
    pub fn missing_labels(&self) -> Vec<&'static str> {
        EXPECTED_LABELS
            .iter()
            .copied()
            .filter(|label| !self.labels.iter().any(|l| l == label))
            .collect()
    }

    pub fn missing_relationships(&self) -> Vec<&'static str> {
        EXPECTED_RELATIONSHIPS
            .iter()
            .copied()
            .filter(|rel| !self.relationship_types.iter().any(|r| r == rel))
            .collect()
    }
}

/// Write and read operations the pipelines need from a graph backend.
///
/// Writes are MERGEs: repeating one with the same key leaves exactly one
/// node and one edge.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    async fn merge_company(&self, company: &Company) -> Result<()>;

    /// MERGE the statement node keyed on `(statement id, fiscal date)` and
    /// its edge from the owning company, which must already exist.
    async fn merge_statement(&self, record: &StatementRecord) -> Result<()>;

    async fn inventory(&self) -> Result<GraphInventory>;

    /// One row per company and fiscal date that has all three statements.
    async fn fetch_analysis_rows(&self) -> Result<Vec<AnalysisRow>>;
}

pub(crate) fn require_statement_id(record: &StatementRecord) -> Result<i64> {
    record.statement_id.ok_or_else(|| {
        crate::error::PipelineError::schema_mismatch(
            record.kind,
            format!("{} is not set; write the record to the relational store first", record.kind.id_column()),
        )
    })
}
