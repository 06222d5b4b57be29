use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, Result};
use crate::mapping::{map_record, FieldKey, RawValue};
use crate::models::schema::DEFAULTED_COLUMN;
use crate::models::{Company, StatementKind, StatementRecord};

/// Order in which one company's statements are written
pub const WRITE_ORDER: [StatementKind; 3] = [
    StatementKind::CashFlow,
    StatementKind::BalanceSheet,
    StatementKind::IncomeStatement,
];

/// Outcome of writing one company's statements
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InsertReport {
    pub inserted: BTreeMap<StatementKind, usize>,
    pub skipped: usize,
}

impl InsertReport {
    pub fn total_inserted(&self) -> usize {
        self.inserted.values().sum()
    }

    pub fn inserted_for(&self, kind: StatementKind) -> usize {
        self.inserted.get(&kind).copied().unwrap_or(0)
    }
}

/// Relational store for companies and statements.
///
/// Every operation opens its own connection and closes it before returning.
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    options: SqliteConnectOptions,
}

impl DatabaseManager {
    pub fn new(database_url: &str) -> Result<Self> {
        // Ensure the connection string is properly formatted for SQLite
        let connection_string = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite:{}", database_url)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .foreign_keys(true);

        Ok(Self { options })
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        Ok(self.options.connect().await?)
    }

    async fn close(conn: SqliteConnection) {
        if let Err(e) = conn.close().await {
            warn!("Failed to close database connection: {}", e);
        }
    }

    /// Create the companies table and one table per statement kind
    pub async fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let mut conn = self.connect().await?;
        let outcome = Self::create_schema(&mut conn).await;
        Self::close(conn).await;
        outcome?;

        info!("Database schema ready at {}", self.options.get_filename().display());
        Ok(())
    }

    async fn create_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        for kind in StatementKind::ALL {
            let ddl = kind.schema().create_table_sql();
            sqlx::query(&ddl).execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// Look up a company id by symbol
    pub async fn find_company_id(&self, symbol: &str) -> Result<Option<i64>> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT id FROM Companies WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&mut conn)
            .await;
        Self::close(conn).await;

        let company_id = row?.map(|r| r.get::<i64, _>("id"));
        if let Some(id) = company_id {
            info!("Found existing company ID for {}: {}", symbol, id);
        }
        Ok(company_id)
    }

    /// Fetch the company id for `symbol`, inserting the company if it is new
    pub async fn register_company(&self, symbol: &str, name: &str) -> Result<i64> {
        if let Some(id) = self.find_company_id(symbol).await? {
            return Ok(id);
        }

        let mut conn = self.connect().await?;
        let row = sqlx::query("INSERT INTO Companies (symbol, name) VALUES (?, ?) RETURNING id")
            .bind(symbol)
            .bind(name)
            .fetch_one(&mut conn)
            .await;
        Self::close(conn).await;

        let id = row?.get::<i64, _>("id");
        info!("Registered company {} ({}) with ID {}", symbol, name, id);
        Ok(id)
    }

    pub async fn list_companies(&self) -> Result<Vec<Company>> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query("SELECT id, symbol, name FROM Companies ORDER BY id")
            .fetch_all(&mut conn)
            .await;
        Self::close(conn).await;

        Ok(rows?
            .into_iter()
            .map(|r| Company {
                id: r.get::<i64, _>("id"),
                symbol: r.get::<String, _>("symbol"),
                name: r.get::<String, _>("name"),
            })
            .collect())
    }

    pub async fn count_statements(&self, kind: StatementKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS count FROM {}", kind.table());
        let mut conn = self.connect().await?;
        let row = sqlx::query(&sql).fetch_one(&mut conn).await;
        Self::close(conn).await;

        Ok(row?.get::<i64, _>("count"))
    }

    /// Insert one company's statements in a single transaction.
    ///
    /// A record that does not match its table schema is logged and skipped;
    /// any SQL failure rolls the whole unit back.
    pub async fn insert_financial_data(
        &self,
        symbol: &str,
        records: &[StatementRecord],
    ) -> Result<InsertReport> {
        let mut conn = self.connect().await?;
        let outcome = Self::insert_records(&mut conn, symbol, records).await;
        Self::close(conn).await;

        match &outcome {
            Ok(report) => info!(
                "Successfully inserted financial data for {} ({} rows, {} skipped)",
                symbol,
                report.total_inserted(),
                report.skipped
            ),
            Err(e) => error!("Database error for {}: {}", symbol, e),
        }
        outcome
    }

    async fn insert_records(
        conn: &mut SqliteConnection,
        symbol: &str,
        records: &[StatementRecord],
    ) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        let mut tx = conn.begin().await?;

        for kind in WRITE_ORDER {
            let schema = kind.schema();
            let sql = schema.insert_sql();

            for record in records.iter().filter(|r| r.kind == kind) {
                if let Err(e) = schema.validate(record) {
                    error!("Skipping {} row for {} ({}): {}", kind, symbol, record.fiscal_date_ending, e);
                    report.skipped += 1;
                    continue;
                }

                debug!(
                    "{} params for {} {}: {} values, defaulted: {:?}",
                    kind,
                    symbol,
                    record.fiscal_date_ending,
                    record.values.len(),
                    record.defaulted_fields()
                );

                let mut query = sqlx::query(&sql)
                    .bind(record.company_id)
                    .bind(record.fiscal_date_ending)
                    .bind(record.reported_currency.clone());
                for spec in schema.fields {
                    let value = record
                        .values
                        .get(spec.column)
                        .map(|v| v.value)
                        .unwrap_or(spec.default);
                    query = query.bind(value);
                }
                let defaulted = serde_json::to_string(&record.defaulted_fields())
                    .map_err(|e| PipelineError::schema_mismatch(kind, e.to_string()))?;
                query.bind(defaulted).execute(&mut *tx).await?;

                *report.inserted.entry(kind).or_insert(0) += 1;
                debug!("Inserted {} for {}", kind, symbol);
            }
        }

        tx.commit().await?;
        Ok(report)
    }

    /// Every stored statement of `kind` joined to its owning company
    pub async fn fetch_statement_records(&self, kind: StatementKind) -> Result<Vec<StatementRecord>> {
        info!("Fetching {} data from the relational store...", kind.display_name().to_lowercase());

        let sql = kind.schema().select_with_company_sql();
        let mut conn = self.connect().await?;
        let rows = sqlx::query(&sql).fetch_all(&mut conn).await;
        Self::close(conn).await;

        let mut records = Vec::new();
        for row in rows? {
            match Self::record_from_row(kind, &row) {
                Ok(record) => records.push(record),
                Err(e) => error!("Skipping unreadable {} row: {}", kind, e),
            }
        }

        info!("Successfully fetched {} {} records.", records.len(), kind);
        Ok(records)
    }

    fn record_from_row(kind: StatementKind, row: &SqliteRow) -> Result<StatementRecord> {
        let schema = kind.schema();
        let mut cells: HashMap<String, RawValue> = HashMap::new();

        let fiscal_date: NaiveDate = row.try_get("fiscal_date_ending")?;
        cells.insert(
            "fiscal_date_ending".to_string(),
            RawValue::Text(fiscal_date.format("%Y-%m-%d").to_string()),
        );
        if let Some(currency) = row.try_get::<Option<String>, _>("reported_currency")? {
            cells.insert("reported_currency".to_string(), RawValue::Text(currency));
        }
        for spec in schema.fields {
            let cell = match row.try_get::<Option<f64>, _>(spec.column) {
                Ok(Some(value)) => RawValue::Number(value),
                Ok(None) => RawValue::Null,
                Err(e) => {
                    return Err(PipelineError::schema_mismatch(
                        kind,
                        format!("column {} is unreadable: {}", spec.column, e),
                    ))
                }
            };
            cells.insert(spec.column.to_string(), cell);
        }

        let defaulted: Vec<String> = match row.try_get::<Option<String>, _>(DEFAULTED_COLUMN) {
            Ok(Some(json)) => serde_json::from_str(&json).map_err(|e| {
                PipelineError::schema_mismatch(kind, format!("{} is not a JSON list: {}", DEFAULTED_COLUMN, e))
            })?,
            Ok(None) => Vec::new(),
            // Tables created before the column existed
            Err(sqlx::Error::ColumnNotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let company_id: i64 = row.try_get("owner_id")?;
        let mut record = map_record(kind, &cells, FieldKey::Column, company_id)?;
        record.statement_id = Some(row.try_get::<i64, _>(kind.id_column())?);
        record.mark_defaulted(&defaulted);
        Ok(record)
    }
}
