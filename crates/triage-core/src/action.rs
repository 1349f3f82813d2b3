//! User-authored actions.
//!
//! An `Action` binds a base search query to an ordered list of configured
//! catalog operations, plus the triggers that may fire it automatically.
//! Actions are persisted by the backend; this crate only reads, composes and
//! executes them.

use crate::error::Result;
use crate::values::ArgValues;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ConfiguredOperation
// ---------------------------------------------------------------------------

/// A catalog operation plus the arguments entered for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredOperation {
    pub operation_id: String,
    /// Serialized argument object, as persisted by the backend.
    #[serde(default = "empty_data")]
    pub data_json: String,
}

fn empty_data() -> String {
    "{}".to_string()
}

impl ConfiguredOperation {
    pub fn new(operation_id: impl Into<String>, data_json: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            data_json: data_json.into(),
        }
    }

    pub fn with_values(operation_id: impl Into<String>, values: &ArgValues) -> Result<Self> {
        Ok(Self::new(operation_id, values.to_data_json()?))
    }

    pub fn values(&self) -> Result<ArgValues> {
        ArgValues::parse(&self.data_json)
    }

    pub fn values_lenient(&self) -> ArgValues {
        ArgValues::parse_lenient(&self.data_json)
    }

    pub fn set_values(&mut self, values: &ArgValues) -> Result<()> {
        self.data_json = values.to_data_json()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub name: String,
    /// Base query: the action applies to every item matching it.
    pub query: String,
    #[serde(default)]
    pub operations: Vec<ConfiguredOperation>,
    /// Automatic-invocation events this action is enabled for.
    #[serde(default)]
    pub triggers: BTreeSet<String>,
}

impl Action {
    /// A new, unsaved action with a fresh id and no operations.
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            action_id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            query: query.into(),
            operations: Vec::new(),
            triggers: BTreeSet::new(),
        }
    }

    pub fn with_operation(mut self, operation: ConfiguredOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|o| o.operation_id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
