use super::{execute, runtime, Session};
use anyhow::Context;
use std::path::Path;
use triage_core::search::find_action;
use triage_core::TriageError;

pub fn run(root: &Path, action_id: &str, query: Option<&str>, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root)?;

    runtime()?.block_on(async {
        let action = find_action(&session.backend, action_id)
            .await
            .context("failed to look up action")?
            .ok_or_else(|| TriageError::ActionNotFound(action_id.to_string()))?;
        tracing::info!(
            action_id,
            name = %action.name,
            query = query.unwrap_or(&action.query),
            "applying saved action"
        );

        execute(&session, json, move |coordinator| async move {
            coordinator.execute_by_reference(action_id, query).await
        })
        .await
    })
}
