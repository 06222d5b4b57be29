//! Causal analysis of operating cash flow on revenue over the graph.

use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::graph::GraphStore;

pub mod dml;
pub mod forest;
pub mod linalg;

pub use dml::{FittedDml, LinearDml};
pub use forest::{RandomForestRegressor, Regressor};

/// One company-period with the three statements joined; values are nullable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRow {
    pub symbol: String,
    pub fiscal_date_ending: String,
    pub operating_cashflow: Option<f64>,
    pub investment_cashflow: Option<f64>,
    pub financing_cashflow: Option<f64>,
    pub net_income: Option<f64>,
    pub total_shareholder_equity: Option<f64>,
    pub total_revenue: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub total_assets: Option<f64>,
}

impl AnalysisRow {
    fn numeric_columns(&self) -> [Option<f64>; 8] {
        [
            self.operating_cashflow,
            self.investment_cashflow,
            self.financing_cashflow,
            self.net_income,
            self.total_shareholder_equity,
            self.total_revenue,
            self.total_liabilities,
            self.total_assets,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFrame {
    pub rows: Vec<AnalysisRow>,
}

impl AnalysisFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Load the flattened analysis rows; a graph failure yields an empty frame.
pub async fn fetch_analysis_frame(graph: &dyn GraphStore) -> AnalysisFrame {
    info!("Fetching data from the graph...");
    match graph.fetch_analysis_rows().await {
        Ok(rows) => {
            info!("Fetched {} rows from the graph.", rows.len());
            AnalysisFrame { rows }
        }
        Err(e) => {
            error!("Error fetching analysis data from the graph: {}", e);
            AnalysisFrame::default()
        }
    }
}

/// Log the graph's labels and relationship types and warn about missing ones.
///
/// Returns `false` when anything expected is missing or the graph could not be read.
pub async fn verify_graph(graph: &dyn GraphStore) -> bool {
    let inventory = match graph.inventory().await {
        Ok(inventory) => inventory,
        Err(e) => {
            error!("Error verifying graph data: {}", e);
            return false;
        }
    };

    info!("Available labels: {:?}", inventory.labels);
    info!("Available relationship types: {:?}", inventory.relationship_types);

    let missing_labels = inventory.missing_labels();
    let missing_relationships = inventory.missing_relationships();
    for label in &missing_labels {
        warn!("Label {} is missing from the graph", label);
    }
    for relationship in &missing_relationships {
        warn!("Relationship type {} is missing from the graph", relationship);
    }
    missing_labels.is_empty() && missing_relationships.is_empty()
}

/// How null values in the frame are handled before estimation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImputationPolicy {
    /// Replace nulls with 0
    #[default]
    ZeroFill,
    /// Drop any row with a null
    DropIncomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedRow {
    pub symbol: String,
    pub fiscal_date_ending: String,
    pub operating_cashflow: f64,
    pub investment_cashflow: f64,
    pub financing_cashflow: f64,
    pub net_income: f64,
    pub total_shareholder_equity: f64,
    pub total_revenue: f64,
    pub total_liabilities: f64,
    pub total_assets: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedFrame {
    pub rows: Vec<PreparedRow>,
    pub dropped: usize,
}

impl PreparedFrame {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Outcome: total revenue
    pub fn outcome(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.total_revenue).collect()
    }

    /// Treatment: operating cash flow
    pub fn treatment(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.operating_cashflow).collect()
    }

    /// Covariates: investment and financing cash flow
    pub fn covariates(&self) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .map(|r| vec![r.investment_cashflow, r.financing_cashflow])
            .collect()
    }
}

/// Apply `policy` to the nullable frame, producing all-f64 rows.
pub fn prepare_data(frame: &AnalysisFrame, policy: ImputationPolicy) -> PreparedFrame {
    let mut prepared = PreparedFrame::default();

    for row in &frame.rows {
        if policy == ImputationPolicy::DropIncomplete && row.numeric_columns().iter().any(Option::is_none) {
            prepared.dropped += 1;
            continue;
        }
        let fill = |value: Option<f64>| value.unwrap_or(0.0);
        prepared.rows.push(PreparedRow {
            symbol: row.symbol.clone(),
            fiscal_date_ending: row.fiscal_date_ending.clone(),
            operating_cashflow: fill(row.operating_cashflow),
            investment_cashflow: fill(row.investment_cashflow),
            financing_cashflow: fill(row.financing_cashflow),
            net_income: fill(row.net_income),
            total_shareholder_equity: fill(row.total_shareholder_equity),
            total_revenue: fill(row.total_revenue),
            total_liabilities: fill(row.total_liabilities),
            total_assets: fill(row.total_assets),
        });
    }

    if prepared.dropped > 0 {
        info!("Dropped {} incomplete rows", prepared.dropped);
    }
    debug!("Prepared frame: {:?}", prepared.rows);
    prepared
}

/// Estimator settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CausalConfig {
    pub folds: usize,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for CausalConfig {
    fn default() -> Self {
        Self {
            folds: 2,
            n_estimators: 100,
            max_depth: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CausalEstimate {
    pub mean_effect: f64,
    pub effects: Vec<f64>,
    pub rows: usize,
}

/// Estimate the effect of operating cash flow on total revenue.
///
/// Returns `None` without fitting anything when the frame is empty, and
/// `None` with an error log when the estimator cannot be fitted.
pub fn perform_causal_analysis(frame: &PreparedFrame, config: &CausalConfig) -> Option<CausalEstimate> {
    if frame.is_empty() {
        warn!("No data available for causal analysis.");
        return None;
    }

    let y = frame.outcome();
    let t = frame.treatment();
    let x = frame.covariates();

    let forest = RandomForestRegressor::new(config.n_estimators, config.max_depth);
    let estimator = LinearDml::new(forest.clone(), forest, config.folds, config.seed);

    match estimator.fit(&y, &t, &x).and_then(|fitted| fitted.effect(&x)) {
        Ok(effects) => {
            let mean_effect = effects.iter().sum::<f64>() / effects.len() as f64;
            info!("Estimated causal effect: {}", mean_effect);
            Some(CausalEstimate {
                mean_effect,
                effects,
                rows: y.len(),
            })
        }
        Err(e) => {
            error!("Error during causal analysis: {}", e);
            None
        }
    }
}

/// Write the prepared frame to `path` as CSV with a header row.
pub fn export_csv(frame: &PreparedFrame, path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in &frame.rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", frame.rows.len(), path.display());
    Ok(())
}
