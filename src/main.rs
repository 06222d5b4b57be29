use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};

use fundamentals_graph::analysis::{
    export_csv, fetch_analysis_frame, perform_causal_analysis, prepare_data, verify_graph,
    CausalConfig, ImputationPolicy,
};
use fundamentals_graph::api::AlphaVantageClient;
use fundamentals_graph::database::DatabaseManager;
use fundamentals_graph::graph::{sync, Neo4jGraph};
use fundamentals_graph::ingest::ingest_companies;
use fundamentals_graph::models::{parse_symbols, Config, StatementKind};
use fundamentals_graph::retry::RetryPolicy;
use fundamentals_graph::utils::init_logging;

#[derive(Parser)]
#[command(
    name = "fundamentals-graph",
    about = "Financial statements → SQLite → Neo4j → causal analysis",
    long_about = "Ingests Alpha Vantage statements into SQLite, mirrors them into a Neo4j graph, and estimates the effect of operating cash flow on revenue."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug-level logging for this crate
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create the relational tables
    InitDb,
    /// Register a company so ingest will pick it up
    AddCompany {
        symbol: String,
        /// Display name (defaults to the symbol)
        #[arg(long)]
        name: Option<String>,
    },
    /// Fetch statements from Alpha Vantage into the relational store
    Ingest {
        /// Comma-separated symbols; defaults to COMPANY_SYMBOLS
        #[arg(long)]
        symbols: Option<String>,
    },
    /// Copy companies and statements from the relational store into the graph
    SyncGraph {
        #[arg(long, value_enum, default_value_t = StatementArg::All)]
        statement: StatementArg,
    },
    /// Report which labels and relationship types the graph holds
    VerifyGraph,
    /// Estimate the effect of operating cash flow on total revenue
    Analyze {
        /// Drop rows with missing values instead of zero-filling them
        #[arg(long)]
        drop_incomplete: bool,
        #[arg(long, default_value_t = 2)]
        folds: usize,
        #[arg(long, default_value_t = 100)]
        trees: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Write the prepared frame to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatementArg {
    All,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl StatementArg {
    fn kinds(self) -> Vec<StatementKind> {
        match self {
            StatementArg::All => StatementKind::ALL.to_vec(),
            StatementArg::IncomeStatement => vec![StatementKind::IncomeStatement],
            StatementArg::BalanceSheet => vec![StatementKind::BalanceSheet],
            StatementArg::CashFlow => vec![StatementKind::CashFlow],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::InitDb => {
            let db = DatabaseManager::new(&config.database_url)?;
            db.initialize().await?;
        }
        Command::AddCompany { symbol, name } => {
            let symbol = symbol.trim().to_uppercase();
            let name = name.unwrap_or_else(|| symbol.clone());
            let db = DatabaseManager::new(&config.database_url)?;
            db.initialize().await?;
            let id = db.register_company(&symbol, &name).await?;
            println!("{} -> company id {}", symbol, id);
        }
        Command::Ingest { symbols } => {
            let symbols = symbols.map(|s| parse_symbols(&s)).unwrap_or_else(|| config.symbols.clone());
            let client = AlphaVantageClient::from_config(&config)?;
            let db = DatabaseManager::new(&config.database_url)?;
            db.initialize().await?;

            let summary = ingest_companies(&client, &db, &RetryPolicy::from_config(&config), &symbols).await;
            println!(
                "Ingested {} companies ({} rows, {} skipped rows); {} skipped, {} failed",
                summary.companies_processed,
                summary.rows_inserted,
                summary.rows_skipped,
                summary.companies_skipped,
                summary.companies_failed
            );
        }
        Command::SyncGraph { statement } => {
            let db = DatabaseManager::new(&config.database_url)?;
            let graph = Neo4jGraph::from_config(&config).await?;

            for (kind, outcome) in sync::sync_all(&db, &graph, &statement.kinds()).await? {
                match outcome {
                    Some(count) => println!("{}: {} nodes merged", kind.display_name(), count),
                    None => println!("{}: sync failed, see log", kind.display_name()),
                }
            }
        }
        Command::VerifyGraph => {
            let graph = Neo4jGraph::from_config(&config).await?;
            if verify_graph(&graph).await {
                println!("Graph has every expected label and relationship type");
            } else {
                println!("Graph is incomplete, see log");
            }
        }
        Command::Analyze {
            drop_incomplete,
            folds,
            trees,
            seed,
            export,
        } => {
            let graph = Neo4jGraph::from_config(&config).await?;
            verify_graph(&graph).await;

            let frame = fetch_analysis_frame(&graph).await;
            let policy = if drop_incomplete {
                ImputationPolicy::DropIncomplete
            } else {
                ImputationPolicy::ZeroFill
            };
            let prepared = prepare_data(&frame, policy);

            if let Some(path) = export {
                export_csv(&prepared, &path)?;
            }

            let causal = CausalConfig {
                folds,
                n_estimators: trees,
                seed,
                ..CausalConfig::default()
            };
            match perform_causal_analysis(&prepared, &causal) {
                Some(estimate) => println!(
                    "Estimated causal effect of operating cash flow on total revenue: {:.4} ({} rows)",
                    estimate.mean_effect, estimate.rows
                ),
                None => warn!("No causal estimate produced"),
            }
        }
    }

    info!("Done");
    Ok(())
}
