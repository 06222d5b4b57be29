//! Declarative field tables for the three statement kinds.
//!
//! One table per kind drives provider mapping, relational DDL and inserts,
//! relational read-back and graph property names, so the column order used
//! by any writer is always the order declared here.

use super::{StatementKind, StatementRecord};
use crate::error::{PipelineError, Result};

/// One numeric statement field: provider name, store column, default when absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub source: &'static str,
    pub column: &'static str,
    pub default: f64,
}

const fn field(source: &'static str, column: &'static str) -> FieldSpec {
    FieldSpec {
        source,
        column,
        default: 0.0,
    }
}

pub const CASH_FLOW_FIELDS: &[FieldSpec] = &[
    field("operatingCashflow", "operating_cashflow"),
    field("paymentsForOperatingActivities", "payments_for_operating_activities"),
    field("proceedsFromOperatingActivities", "proceeds_from_operating_activities"),
    field("changeInOperatingLiabilities", "change_in_operating_liabilities"),
    field("changeInOperatingAssets", "change_in_operating_assets"),
    field("depreciationDepletionAndAmortization", "depreciation_depletion_and_amortization"),
    field("capitalExpenditures", "capital_expenditures"),
    field("changeInReceivables", "change_in_receivables"),
    field("changeInInventory", "change_in_inventory"),
    field("profitLoss", "profit_loss"),
    field("cashflowFromInvestment", "cashflow_from_investment"),
    field("cashflowFromFinancing", "cashflow_from_financing"),
    field("proceedsFromRepaymentsOfShortTermDebt", "proceeds_from_repayments_of_short_term_debt"),
    field("paymentsForRepurchaseOfCommonStock", "payments_for_repurchase_of_common_stock"),
    field("paymentsForRepurchaseOfEquity", "payments_for_repurchase_of_equity"),
    field("paymentsForRepurchaseOfPreferredStock", "payments_for_repurchase_of_preferred_stock"),
    field("dividendPayout", "dividend_payout"),
    field("dividendPayoutCommonStock", "dividend_payout_common_stock"),
    field("dividendPayoutPreferredStock", "dividend_payout_preferred_stock"),
    field("proceedsFromIssuanceOfCommonStock", "proceeds_from_issuance_of_common_stock"),
    field(
        "proceedsFromIssuanceOfLongTermDebtAndCapitalSecuritiesNet",
        "proceeds_from_issuance_of_long_term_debt",
    ),
    field("proceedsFromIssuanceOfPreferredStock", "proceeds_from_issuance_of_preferred_stock"),
    field("proceedsFromRepurchaseOfEquity", "proceeds_from_repurchase_of_equity"),
    field("proceedsFromSaleOfTreasuryStock", "proceeds_from_sale_of_treasury_stock"),
    field("changeInCashAndCashEquivalents", "change_in_cash_and_cash_equivalents"),
    field("changeInExchangeRate", "change_in_exchange_rate"),
    field("netIncome", "net_income"),
];

pub const BALANCE_SHEET_FIELDS: &[FieldSpec] = &[
    field("totalAssets", "total_assets"),
    field("totalCurrentAssets", "total_current_assets"),
    field("cashAndCashEquivalentsAtCarryingValue", "cash_and_cash_equivalents"),
    field("cashAndShortTermInvestments", "cash_and_short_term_investments"),
    field("inventory", "inventory"),
    field("currentNetReceivables", "current_net_receivables"),
    field("totalNonCurrentAssets", "total_non_current_assets"),
    field("propertyPlantEquipment", "property_plant_equipment"),
    field("accumulatedDepreciationAmortizationPPE", "accumulated_depreciation_amortization"),
    field("intangibleAssets", "intangible_assets"),
    field("intangibleAssetsExcludingGoodwill", "intangible_assets_excluding_goodwill"),
    field("goodwill", "goodwill"),
    field("investments", "investments"),
    field("longTermInvestments", "long_term_investments"),
    field("shortTermInvestments", "short_term_investments"),
    field("otherCurrentAssets", "other_current_assets"),
    field("otherNonCurrentAssets", "other_non_current_assets"),
    field("totalLiabilities", "total_liabilities"),
    field("totalCurrentLiabilities", "total_current_liabilities"),
    field("currentAccountsPayable", "current_accounts_payable"),
    field("deferredRevenue", "deferred_revenue"),
    field("currentDebt", "current_debt"),
    field("shortTermDebt", "short_term_debt"),
    field("totalNonCurrentLiabilities", "total_non_current_liabilities"),
    field("capitalLeaseObligations", "capital_lease_obligations"),
    field("longTermDebt", "long_term_debt"),
    field("currentLongTermDebt", "current_long_term_debt"),
    field("longTermDebtNoncurrent", "long_term_debt_noncurrent"),
    field("shortLongTermDebtTotal", "short_long_term_debt_total"),
    field("otherCurrentLiabilities", "other_current_liabilities"),
    field("otherNonCurrentLiabilities", "other_non_current_liabilities"),
    field("totalShareholderEquity", "total_shareholder_equity"),
    field("treasuryStock", "treasury_stock"),
    field("retainedEarnings", "retained_earnings"),
    field("commonStock", "common_stock"),
    field("commonStockSharesOutstanding", "common_stock_shares_outstanding"),
];

pub const INCOME_STATEMENT_FIELDS: &[FieldSpec] = &[
    field("totalRevenue", "total_revenue"),
    field("grossProfit", "gross_profit"),
    field("costOfRevenue", "cost_of_revenue"),
    field("costofGoodsAndServicesSold", "cost_of_goods_and_services_sold"),
    field("operatingIncome", "operating_income"),
    field("netIncome", "net_income"),
    field("sellingGeneralAndAdministrative", "selling_general_and_administrative"),
    field("researchAndDevelopment", "research_and_development"),
    field("operatingExpenses", "operating_expenses"),
    field("depreciation", "depreciation"),
    field("depreciationAndAmortization", "depreciation_and_amortization"),
    field("incomeBeforeTax", "income_before_tax"),
    field("incomeTaxExpense", "income_tax_expense"),
    field("investmentIncomeNet", "investment_income_net"),
    field("netInterestIncome", "net_interest_income"),
    field("interestIncome", "interest_income"),
    field("interestExpense", "interest_expense"),
    field("nonInterestIncome", "non_interest_income"),
    field("otherNonOperatingIncome", "other_non_operating_income"),
    field("netIncomeFromContinuingOperations", "net_income_from_continuing_operations"),
    field("comprehensiveIncomeNetOfTax", "comprehensive_income_net_of_tax"),
    field("ebit", "ebit"),
    field("ebitda", "ebitda"),
];

/// Identity columns that precede the numeric fields in every statement table.
pub const IDENTITY_COLUMNS: &[&str] = &["company_id", "fiscal_date_ending", "reported_currency"];

/// JSON list of the columns whose stored 0 stands in for an absent source value.
pub const DEFAULTED_COLUMN: &str = "defaulted_fields";

/// Destination schema for one statement kind.
#[derive(Debug, Clone, Copy)]
pub struct StatementSchema {
    pub kind: StatementKind,
    pub fields: &'static [FieldSpec],
}

impl StatementSchema {
    pub fn for_kind(kind: StatementKind) -> Self {
        let fields = match kind {
            StatementKind::IncomeStatement => INCOME_STATEMENT_FIELDS,
            StatementKind::BalanceSheet => BALANCE_SHEET_FIELDS,
            StatementKind::CashFlow => CASH_FLOW_FIELDS,
        };
        Self { kind, fields }
    }

    /// Every column written by an INSERT: identity columns, numeric fields, then the defaulted list.
    pub fn insert_columns(&self) -> Vec<&'static str> {
        IDENTITY_COLUMNS
            .iter()
            .copied()
            .chain(self.fields.iter().map(|f| f.column))
            .chain(std::iter::once(DEFAULTED_COLUMN))
            .collect()
    }

    pub fn column_count(&self) -> usize {
        IDENTITY_COLUMNS.len() + self.fields.len() + 1
    }

    pub fn field(&self, column: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Check that a record carries exactly this schema's fields.
    pub fn validate(&self, record: &StatementRecord) -> Result<()> {
        if record.kind != self.kind {
            return Err(PipelineError::schema_mismatch(
                self.kind,
                format!("record is a {} record", record.kind),
            ));
        }

        let missing: Vec<&str> = self
            .fields
            .iter()
            .map(|f| f.column)
            .filter(|column| !record.values.contains_key(*column))
            .collect();
        let unexpected: Vec<&str> = record
            .values
            .keys()
            .map(String::as_str)
            .filter(|column| self.field(column).is_none())
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }

        Err(PipelineError::schema_mismatch(
            self.kind,
            format!(
                "expected {} values, got {} (missing: [{}], unexpected: [{}])",
                self.fields.len(),
                record.values.len(),
                missing.join(", "),
                unexpected.join(", ")
            ),
        ))
    }

    pub fn create_table_sql(&self) -> String {
        let id_column = self.kind.id_column();
        let numeric_columns: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("    {} REAL NOT NULL DEFAULT 0", f.column))
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    {id_column} INTEGER PRIMARY KEY AUTOINCREMENT,\n    company_id INTEGER NOT NULL,\n    fiscal_date_ending DATE NOT NULL,\n    reported_currency TEXT,\n{numeric},\n    {defaulted} TEXT NOT NULL DEFAULT '[]',\n    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,\n    FOREIGN KEY (company_id) REFERENCES Companies(id)\n)",
            table = self.kind.table(),
            numeric = numeric_columns.join(",\n"),
            defaulted = DEFAULTED_COLUMN,
        )
    }

    pub fn insert_sql(&self) -> String {
        let columns = self.insert_columns();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.kind.table(),
            columns.join(", "),
            placeholders
        )
    }

    pub fn select_with_company_sql(&self) -> String {
        format!(
            "SELECT s.*, c.id AS owner_id FROM {} s INNER JOIN Companies c ON s.company_id = c.id ORDER BY s.{}",
            self.kind.table(),
            self.kind.id_column()
        )
    }
}
