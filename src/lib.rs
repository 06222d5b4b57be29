//! Financial statement ingest into SQLite, sync into a Neo4j graph, and a
//! double-ML estimate of operating cash flow's effect on revenue.

pub mod analysis;
pub mod api;
pub mod database;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod mapping;
pub mod models;
pub mod retry;
pub mod utils;

pub use error::{PipelineError, Result};
