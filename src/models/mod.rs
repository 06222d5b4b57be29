use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::{PipelineError, Result};

pub mod schema;

pub use schema::{FieldSpec, StatementSchema};

/// Company that owns statements; rows come from the `Companies` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub symbol: String,
    pub name: String,
}

/// The three statement types moved through every pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [
        StatementKind::IncomeStatement,
        StatementKind::BalanceSheet,
        StatementKind::CashFlow,
    ];

    /// Relational table name
    pub fn table(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "INCOME_STATEMENT",
            StatementKind::BalanceSheet => "BALANCE_SHEET",
            StatementKind::CashFlow => "CASH_FLOW",
        }
    }

    /// Synthetic per-type id column, also the graph node key
    pub fn id_column(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "income_statement_id",
            StatementKind::BalanceSheet => "balance_sheet_id",
            StatementKind::CashFlow => "cash_flow_id",
        }
    }

    pub fn graph_label(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "IncomeStatement",
            StatementKind::BalanceSheet => "BalanceSheet",
            StatementKind::CashFlow => "CashFlow",
        }
    }

    pub fn relationship(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "HAS_INCOME_STATEMENT",
            StatementKind::BalanceSheet => "HAS_BALANCE_SHEET",
            StatementKind::CashFlow => "HAS_CASH_FLOW",
        }
    }

    /// Alpha Vantage `function=` parameter
    pub fn provider_function(&self) -> &'static str {
        self.table()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "Income statement",
            StatementKind::BalanceSheet => "Balance sheet",
            StatementKind::CashFlow => "Cash flow",
        }
    }

    pub fn schema(&self) -> StatementSchema {
        StatementSchema::for_kind(*self)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A mapped numeric value; `defaulted` marks values substituted for an absent source field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: f64,
    pub defaulted: bool,
}

impl FieldValue {
    pub fn present(value: f64) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    pub fn defaulted(value: f64) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }
}

/// One statement for one company and fiscal period, with values keyed by column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub kind: StatementKind,
    pub company_id: i64,
    /// Assigned by the relational store; `None` before the first write.
    pub statement_id: Option<i64>,
    pub fiscal_date_ending: NaiveDate,
    pub reported_currency: Option<String>,
    pub values: BTreeMap<String, FieldValue>,
}

impl StatementRecord {
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).map(|v| v.value)
    }

    pub fn defaulted_fields(&self) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(_, v)| v.defaulted)
            .map(|(column, _)| column.as_str())
            .collect()
    }

    /// Flag the named columns as defaulted; unknown names are ignored.
    pub fn mark_defaulted<S: AsRef<str>>(&mut self, columns: &[S]) {
        for column in columns {
            if let Some(value) = self.values.get_mut(column.as_ref()) {
                value.defaulted = true;
            }
        }
    }

    pub fn is_defaulted(&self, column: &str) -> bool {
        self.values.get(column).is_some_and(|v| v.defaulted)
    }
}

/// Symbols ingested when `COMPANY_SYMBOLS` is not set
pub const DEFAULT_SYMBOLS: &[&str] = &[
    "AVB", "CME", "EQR", "BEN", "HST", "NTRS", "PLD", "STT", "USB", "VTR", "AEE", "AEP", "CMS",
    "DTE", "DUK", "ETR", "PNW", "PPL", "WEC", "XEL", "A", "AKAM", "ADSK", "CSCO", "CTSH", "EBAY",
    "MCHP", "PAYX", "TXN", "VRSN", "ABT", "BDX", "BIIB", "BMY", "GILD", "HUM", "JNJ", "LH", "MDT",
    "DGX",
];

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub alpha_vantage_api_key: Option<String>,
    pub alpha_vantage_base_url: String,
    pub database_url: String,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: Option<String>,
    pub symbols: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any name → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Config {
            alpha_vantage_api_key: non_empty("ALPHA_VANTAGE_API_KEY"),
            alpha_vantage_base_url: var_or("ALPHA_VANTAGE_BASE_URL", "https://www.alphavantage.co/query"),
            database_url: var_or("DATABASE_URL", "sqlite:db/fundamentals.db"),
            neo4j_uri: var_or("NEO4J_URI", "bolt://localhost:7687"),
            neo4j_user: var_or("NEO4J_USER", "neo4j"),
            neo4j_password: non_empty("NEO4J_PASSWORD"),
            symbols: match lookup("COMPANY_SYMBOLS") {
                Some(list) => parse_symbols(&list),
                None => DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            },
            rate_limit_per_minute: parse_value("RATE_LIMIT_PER_MINUTE", lookup("RATE_LIMIT_PER_MINUTE"), 5)?,
            retry_attempts: parse_value("RETRY_ATTEMPTS", lookup("RETRY_ATTEMPTS"), 3)?,
            retry_delay: Duration::from_secs(parse_value("RETRY_DELAY_SECS", lookup("RETRY_DELAY_SECS"), 5)?),
        })
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.alpha_vantage_api_key.as_deref().ok_or_else(|| {
            PipelineError::Config("ALPHA_VANTAGE_API_KEY environment variable required".to_string())
        })
    }

    pub fn require_neo4j_password(&self) -> Result<&str> {
        self.neo4j_password.as_deref().ok_or_else(|| {
            PipelineError::Config("NEO4J_PASSWORD environment variable required".to_string())
        })
    }
}

/// Split a comma/whitespace separated symbol list, upper-casing each entry.
pub fn parse_symbols(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn parse_value<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PipelineError::Config(format!("{} has an invalid value: {}", name, raw))),
        None => Ok(default),
    }
}
