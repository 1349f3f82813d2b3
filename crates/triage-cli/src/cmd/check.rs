use super::{load_action, runtime, Session};
use crate::output::print_json;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use triage_core::action::Action;
use triage_core::operation::OperationCatalog;
use triage_core::readiness::{
    evaluate_action, step_filled_for, step_visible_for, ReadinessContext,
};
use triage_core::resolver::ArgumentResolver;
use triage_core::validation::{StepValidation, StepValidator, ValidationStatus};
use triage_core::values::ArgValues;

#[derive(Serialize)]
struct StepPreview {
    operation_id: String,
    /// 1-based, as shown to analysts.
    step: usize,
    #[serde(flatten)]
    result: StepValidation,
    /// Why the preview could not run; the step then stays `unset`.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(root: &Path, file: &Path, preview: bool, json: bool) -> anyhow::Result<()> {
    let action = load_action(file)?;
    let session = Session::open(root)?;
    let rt = runtime()?;

    let (catalog, resolver) = rt.block_on(session.catalog())?;
    let matches = if action.query.trim().is_empty() {
        None
    } else {
        Some(rt.block_on(session.count(&action.query))?)
    };

    let ctx = ReadinessContext {
        catalog: &catalog,
        searched_query: matches.map(|_| action.query.as_str()),
        resolver: Some(&resolver),
    };
    let issues = evaluate_action(&action, &ctx);
    let unknown = unknown_keys(&action, &catalog);

    let previews = if preview {
        let validator =
            StepValidator::new(Arc::new(session.backend.clone())).with_resolver(resolver.clone());
        rt.block_on(previews(&validator, &resolver, &action, &catalog))
    } else {
        Vec::new()
    };

    if json {
        print_json(&serde_json::json!({
            "action_id": action.action_id,
            "matches": matches,
            "ready": issues.is_empty(),
            "issues": issues.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "unknown_keys": unknown,
            "previews": previews,
        }))?;
    } else {
        print_text(&action, matches, &issues, &unknown, &previews);
    }

    if !issues.is_empty() {
        anyhow::bail!("action is not ready ({} issue(s))", issues.len());
    }
    if previews
        .iter()
        .any(|p| p.result.status == ValidationStatus::Error)
    {
        anyhow::bail!("preview found items the action must not be applied to");
    }
    Ok(())
}

/// `operation_id.key` for every stored value no step declares.
fn unknown_keys(action: &Action, catalog: &OperationCatalog) -> Vec<String> {
    action
        .operations
        .iter()
        .filter_map(|c| {
            let op = catalog.get(&c.operation_id)?;
            let values = c.values().ok()?;
            Some(
                values
                    .unknown_keys(op)
                    .into_iter()
                    .map(|k| format!("{}.{k}", c.operation_id))
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect()
}

/// Preview every visible, filled step that carries validation rules.
///
/// A failed preview leaves its step `unset` and never blocks the check.
async fn previews(
    validator: &StepValidator,
    resolver: &ArgumentResolver,
    action: &Action,
    catalog: &OperationCatalog,
) -> Vec<StepPreview> {
    let mut out = Vec::new();
    for configured in &action.operations {
        let Some(op) = catalog.get(&configured.operation_id) else {
            continue;
        };
        let Ok(values) = ArgValues::parse(&configured.data_json) else {
            continue;
        };
        for (index, step) in op.steps.iter().enumerate() {
            if step.validation.is_none()
                || !step_visible_for(resolver, op, index, &values)
                || !step_filled_for(resolver, &op.id, step, &values)
            {
                continue;
            }
            let (result, error) = match validator
                .validate_operation_step(&op.id, step, &action.query, &values)
                .await
            {
                Ok(result) => (result, None),
                Err(e) => {
                    tracing::warn!(operation = %op.id, step = index + 1, error = %e, "preview failed");
                    (StepValidation::default(), Some(e.to_string()))
                }
            };
            tracing::debug!(operation = %op.id, step = index + 1, status = %result.status, "preview");
            out.push(StepPreview {
                operation_id: op.id.clone(),
                step: index + 1,
                result,
                error,
            });
        }
    }
    out
}

fn print_text(
    action: &Action,
    matches: Option<u64>,
    issues: &[triage_core::readiness::ConfigIssue],
    unknown: &[String],
    previews: &[StepPreview],
) {
    let name = if action.name.trim().is_empty() {
        "(unnamed)"
    } else {
        action.name.as_str()
    };
    println!("Action: {name} [{}]", action.action_id);
    match matches {
        Some(n) => println!("Query:  {} ({n} matching)", action.query),
        None => println!("Query:  (none)"),
    }

    if issues.is_empty() {
        println!("\nReady to run.");
    } else {
        println!("\nIssues:");
        for issue in issues {
            println!("  - {issue}");
        }
    }

    for key in unknown {
        println!("[warning] '{key}' is not declared by any step and will be ignored");
    }

    if !previews.is_empty() {
        println!("\nPreview:");
        for p in previews {
            let mut counts = Vec::new();
            if let Some(n) = p.result.error_total {
                counts.push(format!("error {n}"));
            }
            if let Some(n) = p.result.warn_total {
                counts.push(format!("warn {n}"));
            }
            print!("  {} step {}: {}", p.operation_id, p.step, p.result.status);
            if !counts.is_empty() {
                print!(" ({})", counts.join(", "));
            }
            match (&p.error, &p.result.message) {
                (Some(e), _) => println!(" preview unavailable: {e}"),
                (None, Some(msg)) => println!(" {msg}"),
                (None, None) => println!(),
            }
        }
    }
}
