//! Readiness evaluation for steps, operations and actions.
//!
//! Everything here is pure and synchronous. Configuration problems are not
//! errors: they come back as [`ConfigIssue`] values that the console renders
//! as an explanation next to a disabled execute button.

use crate::action::Action;
use crate::operation::{Operation, OperationCatalog, OperationStep};
use crate::resolver::{active_args, ArgumentResolver};
use crate::values::ArgValues;
use std::fmt;

fn all_filled(keys: &[String], values: &ArgValues) -> bool {
    keys.iter().all(|key| values.is_filled(key))
}

/// True iff every currently active argument of `step` has a value.
pub fn step_filled(step: &OperationStep, values: &ArgValues) -> bool {
    all_filled(&active_args(step, values), values)
}

/// [`step_filled`] with the active arguments chosen by `resolver`, so a
/// handler's override of `operation_id` is honoured.
pub fn step_filled_for(
    resolver: &ArgumentResolver,
    operation_id: &str,
    step: &OperationStep,
    values: &ArgValues,
) -> bool {
    all_filled(&resolver.resolve_active(operation_id, step, values), values)
}

/// Progressive disclosure: step `i` is shown only once steps `0..i` are filled.
pub fn step_visible(steps: &[OperationStep], index: usize, values: &ArgValues) -> bool {
    if index >= steps.len() {
        return false;
    }
    steps[..index].iter().all(|s| step_filled(s, values))
}

pub fn step_visible_for(
    resolver: &ArgumentResolver,
    operation: &Operation,
    index: usize,
    values: &ArgValues,
) -> bool {
    if index >= operation.steps.len() {
        return false;
    }
    operation.steps[..index]
        .iter()
        .all(|s| step_filled_for(resolver, &operation.id, s, values))
}

/// True iff `data_json` parses and every step of `operation` is filled.
///
/// Unlike [`step_visible`], this ignores disclosure order.
pub fn operation_ready(data_json: &str, operation: &Operation) -> bool {
    operation_ready_for(&ArgumentResolver::default(), data_json, operation)
}

pub fn operation_ready_for(
    resolver: &ArgumentResolver,
    data_json: &str,
    operation: &Operation,
) -> bool {
    match ArgValues::parse(data_json) {
        Ok(values) => operation
            .steps
            .iter()
            .all(|s| step_filled_for(resolver, &operation.id, s, &values)),
        Err(_) => false,
    }
}

/// Active keys still missing a value, from the first unfilled step.
pub fn missing_args(operation: &Operation, values: &ArgValues) -> Vec<String> {
    missing_args_for(&ArgumentResolver::default(), operation, values)
}

pub fn missing_args_for(
    resolver: &ArgumentResolver,
    operation: &Operation,
    values: &ArgValues,
) -> Vec<String> {
    operation
        .steps
        .iter()
        .map(|s| {
            resolver
                .resolve_active(&operation.id, s, values)
                .into_iter()
                .filter(|k| !values.is_filled(k))
                .collect::<Vec<_>>()
        })
        .find(|missing| !missing.is_empty())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// ConfigIssue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    MissingQuery,
    QueryNotSearched,
    MissingName,
    UnknownOperation {
        operation_id: String,
    },
    MalformedData {
        operation_id: String,
    },
    IncompleteOperation {
        operation_id: String,
        missing: Vec<String>,
    },
    UnsupportedTrigger {
        trigger: String,
    },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::MissingQuery => f.write_str("enter a query to apply this action to"),
            ConfigIssue::QueryNotSearched => {
                f.write_str("run a search with the current query before executing")
            }
            ConfigIssue::MissingName => f.write_str("give this action a name"),
            ConfigIssue::UnknownOperation { operation_id } => {
                write!(f, "operation '{operation_id}' is not in the catalog")
            }
            ConfigIssue::MalformedData { operation_id } => {
                write!(f, "the saved arguments for '{operation_id}' are unreadable")
            }
            ConfigIssue::IncompleteOperation {
                operation_id,
                missing,
            } if missing.is_empty() => write!(f, "operation '{operation_id}' is incomplete"),
            ConfigIssue::IncompleteOperation {
                operation_id,
                missing,
            } => write!(
                f,
                "operation '{operation_id}' is missing: {}",
                missing.join(", ")
            ),
            ConfigIssue::UnsupportedTrigger { trigger } => write!(
                f,
                "trigger '{trigger}' is not supported by every configured operation"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Action readiness
// ---------------------------------------------------------------------------

/// What the evaluator needs besides the action itself.
pub struct ReadinessContext<'a> {
    pub catalog: &'a OperationCatalog,
    /// The query most recently searched in the console, if any. An action
    /// whose query differs is "dirty" and may not run until re-searched.
    pub searched_query: Option<&'a str>,
    /// Handler-aware resolver; `None` uses the declared `when` rules only.
    pub resolver: Option<&'a ArgumentResolver>,
}

/// Every reason `action` cannot be executed yet, in display order.
pub fn evaluate_action(action: &Action, ctx: &ReadinessContext<'_>) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    let declared = ArgumentResolver::default();
    let resolver = ctx.resolver.unwrap_or(&declared);

    let query = action.query.trim();
    if query.is_empty() {
        issues.push(ConfigIssue::MissingQuery);
    } else if ctx.searched_query.map(str::trim) != Some(query) {
        issues.push(ConfigIssue::QueryNotSearched);
    }

    if action.name.trim().is_empty() {
        issues.push(ConfigIssue::MissingName);
    }

    for configured in &action.operations {
        let operation_id = configured.operation_id.clone();
        let Some(operation) = ctx.catalog.get(&configured.operation_id) else {
            issues.push(ConfigIssue::UnknownOperation { operation_id });
            continue;
        };
        let Ok(values) = ArgValues::parse(&configured.data_json) else {
            issues.push(ConfigIssue::MalformedData { operation_id });
            continue;
        };
        let filled = operation
            .steps
            .iter()
            .all(|s| step_filled_for(resolver, &operation.id, s, &values));
        if !filled {
            issues.push(ConfigIssue::IncompleteOperation {
                operation_id,
                missing: missing_args_for(resolver, operation, &values),
            });
        }
    }

    let supported = ctx
        .catalog
        .supported_triggers(action.operations.iter().map(|o| o.operation_id.as_str()));
    for trigger in &action.triggers {
        if !supported.contains(trigger) {
            issues.push(ConfigIssue::UnsupportedTrigger {
                trigger: trigger.clone(),
            });
        }
    }

    issues
}

pub fn action_executable(action: &Action, ctx: &ReadinessContext<'_>) -> bool {
    evaluate_action(action, ctx).is_empty()
}

/// User-facing explanation for the first blocking issue, if any.
pub fn explain(issues: &[ConfigIssue]) -> Option<String> {
    issues.first().map(|issue| {
        let mut text = issue.to_string();
        if let Some(first) = text.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        text
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
