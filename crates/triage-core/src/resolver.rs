//! Argument context resolution.
//!
//! Pure functions deciding, for one step and the values entered so far,
//! which arguments are currently relevant and which values each may take.

use crate::operation::{OptionSource, OperationStep, StepArg};
use crate::registry::OperationRegistry;
use crate::values::ArgValues;
use std::collections::HashSet;

/// Keys of `step.args` that should be exposed given `values`, in declaration order.
///
/// An argument with `when` conditions is active only if each referenced
/// argument holds a matching value. A condition on another argument of the
/// same step additionally requires that argument to be active itself, so
/// stale answers to hidden arguments never unlock anything.
pub fn active_args(step: &OperationStep, values: &ArgValues) -> Vec<String> {
    let mut active: Vec<String> = Vec::with_capacity(step.args.len());
    for arg in &step.args {
        if conditions_met(step, arg, values, &active) {
            active.push(arg.key.clone());
        }
    }
    active
}

fn conditions_met(
    step: &OperationStep,
    arg: &StepArg,
    values: &ArgValues,
    active: &[String],
) -> bool {
    arg.when.iter().all(|(other, allowed)| {
        if step.declares(other) && !active.iter().any(|k| k == other) {
            return false;
        }
        match values.get(other) {
            None => false,
            Some(v) if allowed.is_empty() => v.is_filled(),
            Some(v) => v.matches_any(allowed),
        }
    })
}

/// Allowed values for `key` given `values`.
///
/// Dependent options follow the current selection(s) of the argument they
/// depend on; nothing is offered until that argument has a value.
pub fn options(step: &OperationStep, key: &str, values: &ArgValues) -> Vec<String> {
    match step.options.get(key) {
        None => Vec::new(),
        Some(OptionSource::Static(list)) => list.clone(),
        Some(OptionSource::Dependent { on, values: table }) => {
            let Some(current) = values.get(on) else {
                return Vec::new();
            };
            let mut seen = HashSet::new();
            current
                .selections()
                .into_iter()
                .filter_map(|sel| table.get(sel))
                .flatten()
                .filter(|v| seen.insert(v.as_str()))
                .cloned()
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// ArgumentResolver
// ---------------------------------------------------------------------------

/// Resolver bound to an operation registry.
///
/// Works on raw `data_json` so callers can feed it straight from a stored
/// action; malformed data resolves as if nothing had been entered.
#[derive(Debug, Clone, Default)]
pub struct ArgumentResolver {
    registry: OperationRegistry,
}

impl ArgumentResolver {
    pub fn new(registry: OperationRegistry) -> Self {
        Self { registry }
    }

    pub fn active_args(&self, step: &OperationStep, data_json: &str) -> Vec<String> {
        active_args(step, &ArgValues::parse_lenient(data_json))
    }

    /// Like [`Self::active_args`], letting the handler for `operation_id` decide first.
    pub fn active_args_for(&self, operation_id: &str, step: &OperationStep, data_json: &str) -> Vec<String> {
        self.resolve_active(operation_id, step, &ArgValues::parse_lenient(data_json))
    }

    /// Active keys of `step` for already-parsed values, handler first.
    ///
    /// Readiness and validation go through here so they judge the same
    /// arguments the form shows.
    pub fn resolve_active(&self, operation_id: &str, step: &OperationStep, values: &ArgValues) -> Vec<String> {
        self.registry
            .get(operation_id)
            .and_then(|handler| handler.active_args(step, values))
            .unwrap_or_else(|| active_args(step, values))
    }

    pub fn options(
        &self,
        operation_id: &str,
        step: &OperationStep,
        key: &str,
        data_json: &str,
    ) -> Vec<String> {
        let values = ArgValues::parse_lenient(data_json);
        if let Some(handler) = self.registry.get(operation_id) {
            if let Some(generated) = handler.options(step, key, &values) {
                return generated;
            }
        }
        options(step, key, &values)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
