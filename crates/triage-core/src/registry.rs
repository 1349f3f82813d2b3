//! Per-operation behavior hooks.
//!
//! Some operations compute their argument options from live context rather
//! than from the catalog's static lists. Those behaviors are registered here,
//! keyed by operation id, and the registry is handed to
//! [`ArgumentResolver`](crate::resolver::ArgumentResolver) at construction.

use crate::operation::OperationStep;
use crate::values::ArgValues;
use std::collections::HashMap;
use std::sync::Arc;

/// Custom behavior for one catalog operation.
pub trait OperationHandler: Send + Sync {
    /// Options for `key`, or `None` to fall back to the step's declared source.
    fn options(&self, step: &OperationStep, key: &str, values: &ArgValues) -> Option<Vec<String>>;

    /// Replacement active-argument list for `step`. `None` keeps the declared `when` rules.
    fn active_args(&self, _step: &OperationStep, _values: &ArgValues) -> Option<Vec<String>> {
        None
    }
}

impl<F> OperationHandler for F
where
    F: Fn(&OperationStep, &str, &ArgValues) -> Option<Vec<String>> + Send + Sync,
{
    fn options(&self, step: &OperationStep, key: &str, values: &ArgValues) -> Option<Vec<String>> {
        self(step, key, values)
    }
}

#[derive(Clone, Default)]
pub struct OperationRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `operation_id`, replacing any earlier one.
    pub fn register(
        mut self,
        operation_id: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Self {
        self.handlers.insert(operation_id.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, operation_id: &str) -> Option<&Arc<dyn OperationHandler>> {
        self.handlers.get(operation_id)
    }

    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().collect();
        ids.sort();
        f.debug_struct("OperationRegistry")
            .field("operations", &ids)
            .finish()
    }
}
