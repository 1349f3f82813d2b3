use super::{execute, load_action, runtime, Session};
use std::path::Path;
use triage_core::readiness::{evaluate_action, explain, ReadinessContext};

pub fn run(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let action = load_action(file)?;
    let session = Session::open(root)?;

    runtime()?.block_on(async {
        let (catalog, resolver) = session.catalog().await?;
        let searched = if action.query.trim().is_empty() {
            None
        } else {
            let matches = session.count(&action.query).await?;
            tracing::info!(query = %action.query, matches, "applying to matching items");
            Some(action.query.as_str())
        };

        let ctx = ReadinessContext {
            catalog: &catalog,
            searched_query: searched,
            resolver: Some(&resolver),
        };
        let issues = evaluate_action(&action, &ctx);
        if let Some(reason) = explain(&issues) {
            anyhow::bail!("action is not ready: {reason}");
        }

        let (query, operations) = (&action.query, &action.operations);
        execute(&session, json, move |coordinator| async move {
            coordinator.execute(query, operations).await
        })
        .await
    })
}
