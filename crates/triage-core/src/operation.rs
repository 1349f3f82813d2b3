//! Catalog operations: reusable, multi-step remediation procedures.
//!
//! Operations are owned by the backend catalog and are read-only here. The
//! [`OperationCatalog`] is built once from the catalog endpoint's response
//! and answers availability (role filtering) and trigger compatibility
//! questions for actions being composed.

use crate::error::Result;
use crate::registry::OperationRegistry;
use crate::resolver::ArgumentResolver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// StepArg
// ---------------------------------------------------------------------------

/// One argument a step may expose.
///
/// `when` maps another argument key to the values that make this argument
/// relevant. An empty list means "any non-empty value".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StepArgRepr", into = "StepArgRepr")]
pub struct StepArg {
    pub key: String,
    pub when: BTreeMap<String, Vec<String>>,
}

impl StepArg {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            when: BTreeMap::new(),
        }
    }

    pub fn when(mut self, key: impl Into<String>, allowed: &[&str]) -> Self {
        self.when.insert(
            key.into(),
            allowed.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn is_conditional(&self) -> bool {
        !self.when.is_empty()
    }
}

/// Wire form: either `"key"` or `{"key": "...", "when": {...}}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StepArgRepr {
    Bare(String),
    Full {
        key: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        when: BTreeMap<String, Vec<String>>,
    },
}

impl From<StepArgRepr> for StepArg {
    fn from(repr: StepArgRepr) -> Self {
        match repr {
            StepArgRepr::Bare(key) => StepArg::new(key),
            StepArgRepr::Full { key, when } => StepArg { key, when },
        }
    }
}

impl From<StepArg> for StepArgRepr {
    fn from(arg: StepArg) -> Self {
        if arg.when.is_empty() {
            StepArgRepr::Bare(arg.key)
        } else {
            StepArgRepr::Full {
                key: arg.key,
                when: arg.when,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OptionSource
// ---------------------------------------------------------------------------

/// Where the selectable values for an argument come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionSource {
    /// A fixed list of allowed values.
    Static(Vec<String>),
    /// Values keyed by the current value of another argument (`on`).
    Dependent {
        on: String,
        values: BTreeMap<String, Vec<String>>,
    },
}

// ---------------------------------------------------------------------------
// Validation rules
// ---------------------------------------------------------------------------

/// A preview query template plus the message shown when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub query: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepValidationRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<ValidationRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationRule>,
}

// ---------------------------------------------------------------------------
// OperationStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationStep {
    #[serde(default)]
    pub args: Vec<StepArg>,
    #[serde(default)]
    pub options: BTreeMap<String, OptionSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<StepValidationRules>,
}

impl OperationStep {
    pub fn with_args(keys: &[&str]) -> Self {
        Self {
            args: keys.iter().map(|k| StepArg::new(*k)).collect(),
            ..Default::default()
        }
    }

    pub fn declares(&self, key: &str) -> bool {
        self.args.iter().any(|a| a.key == key)
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationDescription {
    #[serde(default)]
    pub short: String,
    #[serde(default)]
    pub long: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: OperationDescription,
    #[serde(default, rename = "i18nKey", skip_serializing_if = "Option::is_none")]
    pub i18n_key: Option<String>,
    /// Capability tags a user must all hold to configure this operation.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub triggers: BTreeSet<String>,
    /// Display ordering hint only; lower sorts first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub steps: Vec<OperationStep>,
}

impl Operation {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn available_to(&self, roles: &BTreeSet<String>) -> bool {
        self.roles.is_subset(roles)
    }

    pub fn supports(&self, trigger: &str) -> bool {
        self.triggers.contains(trigger)
    }

    /// Every argument key declared by any step.
    pub fn declared_keys(&self) -> BTreeSet<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.args.iter().map(|a| a.key.as_str()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// OperationSource
// ---------------------------------------------------------------------------

/// The catalog endpoint: returns the full list of operations.
#[async_trait]
pub trait OperationSource: Send + Sync {
    async fn operations(&self) -> Result<Vec<Operation>>;
}

// ---------------------------------------------------------------------------
// OperationCatalog
// ---------------------------------------------------------------------------

/// Loaded catalog, kept in display order (priority, then id).
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: Vec<Operation>,
}

impl OperationCatalog {
    pub fn new(operations: Vec<Operation>) -> Self {
        let mut seen = BTreeSet::new();
        let mut kept = Vec::with_capacity(operations.len());
        for op in operations {
            if !seen.insert(op.id.clone()) {
                tracing::warn!(operation = %op.id, "duplicate operation id in catalog; keeping the first");
                continue;
            }
            kept.push(op);
        }
        kept.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Self { operations: kept }
    }

    /// Fetch the catalog from `source`.
    pub async fn load(source: &dyn OperationSource) -> Result<Self> {
        let operations = source.operations().await?;
        tracing::debug!(count = operations.len(), "operation catalog loaded");
        Ok(Self::new(operations))
    }

    /// Bind registered handlers to this catalog, yielding the resolver to use with it.
    ///
    /// Handlers for ids the catalog does not contain are kept but logged.
    pub fn bind(&self, registry: OperationRegistry) -> ArgumentResolver {
        for id in registry.operation_ids() {
            if self.get(id).is_none() {
                tracing::warn!(operation = %id, "handler registered for operation missing from catalog");
            }
        }
        ArgumentResolver::new(registry)
    }

    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.id == id)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations the holder of `roles` may configure, in display order.
    pub fn available_for(&self, roles: &BTreeSet<String>) -> Vec<&Operation> {
        self.operations
            .iter()
            .filter(|o| o.available_to(roles))
            .collect()
    }

    /// Triggers supported by every listed operation.
    ///
    /// An empty list, or any id missing from the catalog, yields no triggers.
    pub fn supported_triggers<'a, I>(&self, ids: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result: Option<BTreeSet<String>> = None;
        for id in ids {
            let Some(op) = self.get(id) else {
                return BTreeSet::new();
            };
            result = Some(match result {
                None => op.triggers.clone(),
                Some(acc) => acc.intersection(&op.triggers).cloned().collect(),
            });
        }
        result.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
