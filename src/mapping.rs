//! Field mapper: turns a raw source row into a named-field [`StatementRecord`].

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{FieldValue, StatementKind, StatementRecord};

/// A raw cell read from a provider payload or a relational row.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Null,
}

/// Anything the mapper can read named cells from.
pub trait SourceRow {
    fn raw(&self, key: &str) -> Option<RawValue>;
}

impl SourceRow for serde_json::Map<String, Value> {
    fn raw(&self, key: &str) -> Option<RawValue> {
        self.get(key).map(|value| match value {
            Value::Null => RawValue::Null,
            Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Null),
            Value::String(s) => RawValue::Text(s.clone()),
            other => RawValue::Text(other.to_string()),
        })
    }
}

impl SourceRow for HashMap<String, RawValue> {
    fn raw(&self, key: &str) -> Option<RawValue> {
        self.get(key).cloned()
    }
}

/// Which name of a field table entry a row is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey {
    /// Provider camelCase names (`totalRevenue`)
    Source,
    /// Store snake_case names (`total_revenue`)
    Column,
}

impl FieldKey {
    fn fiscal_date(&self) -> &'static str {
        match self {
            FieldKey::Source => "fiscalDateEnding",
            FieldKey::Column => "fiscal_date_ending",
        }
    }

    fn currency(&self) -> &'static str {
        match self {
            FieldKey::Source => "reportedCurrency",
            FieldKey::Column => "reported_currency",
        }
    }
}

/// Read a cell, treating absence, null and the literal text "None" alike.
pub fn safe_get(row: &dyn SourceRow, key: &str) -> Option<RawValue> {
    match row.raw(key) {
        None | Some(RawValue::Null) => None,
        Some(RawValue::Text(text)) if text.trim().is_empty() || text.trim() == "None" => None,
        Some(value) => Some(value),
    }
}

fn numeric(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) => Some(*n),
        RawValue::Text(text) => text.trim().parse::<f64>().ok(),
        RawValue::Null => None,
    }
}

fn text(value: RawValue) -> Option<String> {
    match value {
        RawValue::Text(s) => Some(s.trim().to_string()),
        RawValue::Number(n) => Some(n.to_string()),
        RawValue::Null => None,
    }
}

/// Map one source row into a record of `kind` owned by `company_id`.
///
/// Numeric fields fall back to their declared default when absent; the
/// fiscal date has no default and its absence rejects the row.
pub fn map_record(
    kind: StatementKind,
    row: &dyn SourceRow,
    key: FieldKey,
    company_id: i64,
) -> Result<StatementRecord> {
    let schema = kind.schema();

    let fiscal_date_ending = safe_get(row, key.fiscal_date())
        .and_then(text)
        .ok_or_else(|| PipelineError::schema_mismatch(kind, "fiscal_date_ending is missing"))
        .and_then(|raw| {
            let date_part = raw.get(..10).unwrap_or(&raw);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
                PipelineError::schema_mismatch(kind, format!("fiscal_date_ending '{}' is not a date", raw))
            })
        })?;

    let reported_currency = safe_get(row, key.currency()).and_then(text);

    let mut values = BTreeMap::new();
    for spec in schema.fields {
        let name = match key {
            FieldKey::Source => spec.source,
            FieldKey::Column => spec.column,
        };
        let value = match safe_get(row, name) {
            Some(raw) => match numeric(&raw) {
                Some(n) => FieldValue::present(n),
                None => {
                    debug!("{} {}: unparseable value {:?}, using default", kind, name, raw);
                    FieldValue::defaulted(spec.default)
                }
            },
            None => FieldValue::defaulted(spec.default),
        };
        values.insert(spec.column.to_string(), value);
    }

    Ok(StatementRecord {
        kind,
        company_id,
        statement_id: None,
        fiscal_date_ending,
        reported_currency,
        values,
    })
}
