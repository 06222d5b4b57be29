use neo4rs::{query, Graph, Query, Row};
use tracing::{debug, info};

use super::{require_statement_id, GraphInventory, GraphStore};
use crate::analysis::AnalysisRow;
use crate::error::{PipelineError, Result};
use crate::models::{Company, Config, StatementRecord};

/// Joins each company's statements on the same fiscal period. Columns listed in
/// a node's `defaulted_fields` come back as null.
const ANALYSIS_QUERY: &str = "
    MATCH (c:Company)-[:HAS_CASH_FLOW]->(cf:CashFlow),
          (c)-[:HAS_BALANCE_SHEET]->(bs:BalanceSheet),
          (c)-[:HAS_INCOME_STATEMENT]->(inc:IncomeStatement)
    WHERE bs.fiscal_date_ending = cf.fiscal_date_ending
      AND inc.fiscal_date_ending = cf.fiscal_date_ending
    RETURN c.symbol AS symbol,
           cf.fiscal_date_ending AS fiscal_date_ending,
           CASE WHEN 'operating_cashflow' IN coalesce(cf.defaulted_fields, []) THEN null
                ELSE cf.operating_cashflow END AS operating_cashflow,
           CASE WHEN 'cashflow_from_investment' IN coalesce(cf.defaulted_fields, []) THEN null
                ELSE cf.cashflow_from_investment END AS investment_cashflow,
           CASE WHEN 'cashflow_from_financing' IN coalesce(cf.defaulted_fields, []) THEN null
                ELSE cf.cashflow_from_financing END AS financing_cashflow,
           CASE WHEN 'net_income' IN coalesce(inc.defaulted_fields, []) THEN null
                ELSE inc.net_income END AS net_income,
           CASE WHEN 'total_shareholder_equity' IN coalesce(bs.defaulted_fields, []) THEN null
                ELSE bs.total_shareholder_equity END AS total_shareholder_equity,
           CASE WHEN 'total_revenue' IN coalesce(inc.defaulted_fields, []) THEN null
                ELSE inc.total_revenue END AS total_revenue,
           CASE WHEN 'total_liabilities' IN coalesce(bs.defaulted_fields, []) THEN null
                ELSE bs.total_liabilities END AS total_liabilities,
           CASE WHEN 'total_assets' IN coalesce(bs.defaulted_fields, []) THEN null
                ELSE bs.total_assets END AS total_assets
    ORDER BY symbol, fiscal_date_ending";

/// Neo4j-backed graph store speaking bolt through neo4rs
pub struct Neo4jGraph {
    graph: Graph,
}

impl Neo4jGraph {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        info!("Connecting to Neo4j at {}...", uri);
        let graph = Graph::new(uri, user, password).await?;
        Ok(Self { graph })
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::connect(&config.neo4j_uri, &config.neo4j_user, config.require_neo4j_password()?).await
    }

    async fn single_column(&self, q: Query, column: &str) -> Result<Vec<String>> {
        let mut stream = self.graph.execute(q).await?;
        let mut values = Vec::new();
        while let Some(row) = stream.next().await? {
            values.push(column_value::<String>(&row, column)?);
        }
        Ok(values)
    }
}

fn column_value<'r, T: serde::Deserialize<'r>>(row: &'r Row, column: &str) -> Result<T> {
    row.get::<T>(column)
        .map_err(|e| PipelineError::Graph(neo4rs::Error::DeserializationError(e)))
}

/// A statement MERGE that matched no company reports zero merged nodes.
fn ensure_merged(merged: i64, record: &StatementRecord) -> Result<()> {
    if merged == 0 {
        return Err(PipelineError::Constraint(format!(
            "Company {} does not exist in the graph",
            record.company_id
        )));
    }
    Ok(())
}

/// Cypher for one statement MERGE; numeric properties come from the schema table.
pub fn merge_statement_cypher(record: &StatementRecord) -> String {
    let kind = record.kind;
    let assignments: Vec<String> = kind
        .schema()
        .fields
        .iter()
        .map(|f| format!("s.{0} = ${0}", f.column))
        .collect();

    format!(
        "MATCH (c:Company {{id: $company_id}})
         MERGE (s:{label} {{{id_column}: $statement_id, fiscal_date_ending: $fiscal_date_ending}})
         SET s.reported_currency = $reported_currency,
             s.company_id = $company_id,
             s.defaulted_fields = $defaulted_fields,
             {assignments}
         MERGE (c)-[:{relationship}]->(s)
         RETURN count(s) AS merged",
        label = kind.graph_label(),
        id_column = kind.id_column(),
        assignments = assignments.join(",\n             "),
        relationship = kind.relationship(),
    )
}

#[async_trait::async_trait]
impl GraphStore for Neo4jGraph {
    async fn merge_company(&self, company: &Company) -> Result<()> {
        let q = query("MERGE (c:Company {id: $id}) SET c.symbol = $symbol, c.name = $name")
            .param("id", company.id)
            .param("symbol", company.symbol.as_str())
            .param("name", company.name.as_str());
        self.graph.run(q).await?;
        Ok(())
    }

    async fn merge_statement(&self, record: &StatementRecord) -> Result<()> {
        let statement_id = require_statement_id(record)?;
        let cypher = merge_statement_cypher(record);

        let mut q = query(&cypher)
            .param("company_id", record.company_id)
            .param("statement_id", statement_id)
            .param(
                "fiscal_date_ending",
                record.fiscal_date_ending.format("%Y-%m-%d").to_string(),
            )
            .param("reported_currency", record.reported_currency.clone())
            .param("defaulted_fields", record.defaulted_fields());
        for spec in record.kind.schema().fields {
            let value = record.value(spec.column).unwrap_or(spec.default);
            q = q.param(spec.column, value);
        }

        let mut stream = self.graph.execute(q).await?;
        let mut merged = 0;
        while let Some(row) = stream.next().await? {
            merged += column_value::<i64>(&row, "merged")?;
        }

        ensure_merged(merged, record)?;
        debug!("Merged {} {} for company {}", record.kind, statement_id, record.company_id);
        Ok(())
    }

    async fn inventory(&self) -> Result<GraphInventory> {
        Ok(GraphInventory {
            labels: self.single_column(query("CALL db.labels()"), "label").await?,
            relationship_types: self
                .single_column(query("CALL db.relationshipTypes()"), "relationshipType")
                .await?,
        })
    }

    async fn fetch_analysis_rows(&self) -> Result<Vec<AnalysisRow>> {
        let mut stream = self.graph.execute(query(ANALYSIS_QUERY)).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            let number = |key: &str| column_value::<Option<f64>>(&row, key);
            rows.push(AnalysisRow {
                symbol: column_value(&row, "symbol")?,
                fiscal_date_ending: column_value(&row, "fiscal_date_ending")?,
                operating_cashflow: number("operating_cashflow")?,
                investment_cashflow: number("investment_cashflow")?,
                financing_cashflow: number("financing_cashflow")?,
                net_income: number("net_income")?,
                total_shareholder_equity: number("total_shareholder_equity")?,
                total_revenue: number("total_revenue")?,
                total_liabilities: number("total_liabilities")?,
                total_assets: number("total_assets")?,
            });
        }
        Ok(rows)
    }
}
