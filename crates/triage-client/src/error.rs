use thiserror::Error;
use triage_core::TriageError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn into_search(self) -> TriageError {
        TriageError::Search(self.to_string())
    }

    pub fn into_execution(self) -> TriageError {
        TriageError::Execution(self.to_string())
    }

    /// True for a 404 from the server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }
}
