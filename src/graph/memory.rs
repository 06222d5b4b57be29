use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::{require_statement_id, GraphInventory, GraphStore};
use crate::analysis::AnalysisRow;
use crate::error::{PipelineError, Result};
use crate::models::{Company, StatementKind, StatementRecord};

type NodeKey = (StatementKind, i64, NaiveDate);

#[derive(Debug, Clone)]
struct StatementNode {
    company_id: i64,
    values: BTreeMap<String, f64>,
    defaulted: BTreeSet<String>,
}

impl StatementNode {
    /// `None` when the column is absent or only holds a substituted default
    fn reported(&self, column: &str) -> Option<f64> {
        if self.defaulted.contains(column) {
            return None;
        }
        self.values.get(column).copied()
    }
}

#[derive(Debug, Default)]
struct GraphState {
    companies: BTreeMap<i64, Company>,
    nodes: BTreeMap<NodeKey, StatementNode>,
    edges: BTreeSet<(i64, NodeKey)>,
}

/// In-process graph with the same MERGE semantics as the Neo4j store.
///
/// Used for tests and dry runs of the sync pipeline.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<GraphState>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, GraphState>> {
        self.state
            .lock()
            .map_err(|_| PipelineError::Constraint("in-memory graph lock poisoned".to_string()))
    }

    pub fn company_count(&self) -> usize {
        self.lock().map(|s| s.companies.len()).unwrap_or(0)
    }

    pub fn node_count(&self, kind: StatementKind) -> usize {
        self.lock()
            .map(|s| s.nodes.keys().filter(|(k, _, _)| *k == kind).count())
            .unwrap_or(0)
    }

    pub fn edge_count(&self, kind: StatementKind) -> usize {
        self.lock()
            .map(|s| s.edges.iter().filter(|(_, (k, _, _))| *k == kind).count())
            .unwrap_or(0)
    }

    /// Stored property of one statement node, if the node exists
    pub fn node_value(&self, kind: StatementKind, statement_id: i64, column: &str) -> Option<f64> {
        let state = self.lock().ok()?;
        state
            .nodes
            .iter()
            .find(|((k, id, _), _)| *k == kind && *id == statement_id)
            .and_then(|(_, node)| node.values.get(column).copied())
    }

    /// Columns of one statement node that hold substituted defaults
    pub fn node_defaulted(&self, kind: StatementKind, statement_id: i64) -> Vec<String> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        state
            .nodes
            .iter()
            .find(|((k, id, _), _)| *k == kind && *id == statement_id)
            .map(|(_, node)| node.defaulted.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryGraph {
    async fn merge_company(&self, company: &Company) -> Result<()> {
        self.lock()?.companies.insert(company.id, company.clone());
        Ok(())
    }

    async fn merge_statement(&self, record: &StatementRecord) -> Result<()> {
        let statement_id = require_statement_id(record)?;
        let mut state = self.lock()?;

        if !state.companies.contains_key(&record.company_id) {
            return Err(PipelineError::Constraint(format!(
                "Company {} does not exist in the graph",
                record.company_id
            )));
        }

        let key = (record.kind, statement_id, record.fiscal_date_ending);
        let values = record
            .kind
            .schema()
            .fields
            .iter()
            .map(|spec| {
                let value = record.value(spec.column).unwrap_or(spec.default);
                (spec.column.to_string(), value)
            })
            .collect();

        let defaulted = record.defaulted_fields().into_iter().map(str::to_string).collect();

        state.nodes.insert(
            key,
            StatementNode {
                company_id: record.company_id,
                values,
                defaulted,
            },
        );
        state.edges.insert((record.company_id, key));
        Ok(())
    }

    async fn inventory(&self) -> Result<GraphInventory> {
        let state = self.lock()?;
        let mut inventory = GraphInventory::default();

        if !state.companies.is_empty() {
            inventory.labels.push("Company".to_string());
        }
        for kind in StatementKind::ALL {
            if state.nodes.keys().any(|(k, _, _)| *k == kind) {
                inventory.labels.push(kind.graph_label().to_string());
            }
            if state.edges.iter().any(|(_, (k, _, _))| *k == kind) {
                inventory.relationship_types.push(kind.relationship().to_string());
            }
        }
        Ok(inventory)
    }

    async fn fetch_analysis_rows(&self) -> Result<Vec<AnalysisRow>> {
        let state = self.lock()?;

        let linked = |kind: StatementKind, company_id: i64, date: NaiveDate| {
            state
                .edges
                .iter()
                .filter(|(owner, (k, _, d))| *owner == company_id && *k == kind && *d == date)
                .filter_map(|(_, key)| state.nodes.get(key))
                .filter(|node| node.company_id == company_id)
                .collect::<Vec<_>>()
        };

        let mut rows = Vec::new();
        for (owner, key) in state.edges.iter() {
            let (kind, _, date) = key;
            if *kind != StatementKind::CashFlow {
                continue;
            }
            let (Some(company), Some(cash_flow)) = (state.companies.get(owner), state.nodes.get(key)) else {
                continue;
            };
            let date = *date;

            for balance in linked(StatementKind::BalanceSheet, *owner, date) {
                for income in linked(StatementKind::IncomeStatement, *owner, date) {
                    rows.push(AnalysisRow {
                        symbol: company.symbol.clone(),
                        fiscal_date_ending: date.format("%Y-%m-%d").to_string(),
                        operating_cashflow: cash_flow.reported("operating_cashflow"),
                        investment_cashflow: cash_flow.reported("cashflow_from_investment"),
                        financing_cashflow: cash_flow.reported("cashflow_from_financing"),
                        net_income: income.reported("net_income"),
                        total_shareholder_equity: balance.reported("total_shareholder_equity"),
                        total_revenue: income.reported("total_revenue"),
                        total_liabilities: balance.reported("total_liabilities"),
                        total_assets: balance.reported("total_assets"),
                    });
                }
            }
        }

        rows.sort_by(|a, b| {
            (a.symbol.as_str(), a.fiscal_date_ending.as_str())
                .cmp(&(b.symbol.as_str(), b.fiscal_date_ending.as_str()))
        });
        Ok(rows)
    }
}
