use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("not initialized: run 'triage config init' or create .triage/config.yaml")]
    NotInitialized,

    #[error("operation not found: {0}")]
    UnknownOperation(String),

    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("malformed operation data: {0}")]
    MalformedData(String),

    #[error("an execution is already running (request {0})")]
    Busy(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("push channel error: {0}")]
    Channel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
