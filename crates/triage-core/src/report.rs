//! Per-operation outcome report returned by a bulk execution.

use crate::action::ConfiguredOperation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Skipped,
    Error,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Error => "error",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    /// The query the backend actually applied for this outcome.
    #[serde(default)]
    pub query: String,
    pub outcome: OutcomeKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub success: usize,
    pub skipped: usize,
    pub error: usize,
}

impl ReportSummary {
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.error
    }
}

/// `operation_id` → outcomes, in the order the backend sent them.
///
/// The report never reorders or deduplicates outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionReport {
    entries: BTreeMap<String, Vec<OperationOutcome>>,
}

impl ActionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation_id: impl Into<String>, outcome: OperationOutcome) {
        self.entries
            .entry(operation_id.into())
            .or_default()
            .push(outcome);
    }

    pub fn outcomes(&self, operation_id: &str) -> Option<&[OperationOutcome]> {
        self.entries.get(operation_id).map(Vec::as_slice)
    }

    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[OperationOutcome])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for outcome in self.entries.values().flatten() {
            match outcome.outcome {
                OutcomeKind::Success => summary.success += 1,
                OutcomeKind::Skipped => summary.skipped += 1,
                OutcomeKind::Error => summary.error += 1,
            }
        }
        summary
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .values()
            .flatten()
            .any(|o| o.outcome == OutcomeKind::Error)
    }

    /// Give every executed operation an entry, possibly empty.
    ///
    /// Returns the ids that had to be added.
    pub fn complete_for(&mut self, executed: &[ConfiguredOperation]) -> Vec<String> {
        let mut added = Vec::new();
        for op in executed {
            if !self.entries.contains_key(&op.operation_id) {
                self.entries.insert(op.operation_id.clone(), Vec::new());
                added.push(op.operation_id.clone());
            }
        }
        added
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
