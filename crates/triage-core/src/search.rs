//! Search backend contract.
//!
//! The backend accepts a query string plus pagination and answers with the
//! total match count and the matched items. Validation previews only need
//! the count, so they send `rows = 0`.

use crate::action::Action;
use crate::error::{Result, TriageError};
use crate::validation::sanitize_term;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<bool>,
    /// Comma-separated list of fields to return for each item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fl: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, rows: usize) -> Self {
        Self {
            query: query.into(),
            rows,
            offset: None,
            track_total_hits: None,
            fl: None,
        }
    }

    /// A request that only asks for an exact total.
    pub fn count_only(query: impl Into<String>) -> Self {
        Self {
            track_total_hits: Some(true),
            ..Self::new(query, 0)
        }
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn fields(mut self, fl: impl Into<String>) -> Self {
        self.fl = Some(fl.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: u64,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub rows: usize,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;
}

/// Restrict `clause` to items matching `base`.
pub fn scoped_query(base: &str, clause: &str) -> String {
    format!("({base}) AND ({clause})")
}

/// Look up a stored action by id.
pub async fn find_action(backend: &dyn SearchBackend, action_id: &str) -> Result<Option<Action>> {
    let request = SearchRequest::new(format!("action_id:{}", sanitize_term(action_id)), 1);
    let response = backend.search(&request).await?;
    match response.items.into_iter().next() {
        None => Ok(None),
        Some(item) => serde_json::from_value(item)
            .map(Some)
            .map_err(|e| TriageError::Search(format!("stored action {action_id} is unreadable: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
