use thiserror::Error;

use crate::models::StatementKind;

/// Failure taxonomy shared by every pipeline stage.
///
/// Callers branch on [`PipelineError::is_retryable`] instead of matching
/// on log text.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("graph error: {0}")]
    Graph(#[from] neo4rs::Error),

    #[error("{kind} record does not match its schema: {detail}")]
    SchemaMismatch { kind: StatementKind, detail: String },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("estimation failed: {0}")]
    Estimation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Transport and storage-layer failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Transport(_) | PipelineError::Database(_) | PipelineError::Graph(_)
        )
    }

    pub fn schema_mismatch(kind: StatementKind, detail: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return PipelineError::Constraint(db_err.message().to_string());
                }
                _ => {}
            }
        }
        PipelineError::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
