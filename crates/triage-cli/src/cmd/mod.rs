pub mod apply;
pub mod check;
pub mod config;
pub mod operations;
pub mod run;

use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use triage_client::{EventFeed, HttpBackend};
use triage_core::action::{Action, ConfiguredOperation};
use triage_core::channel::PushChannel;
use triage_core::config::ConsoleConfig;
use triage_core::execution::{ExecutionCoordinator, ExecutionPhase};
use triage_core::operation::OperationCatalog;
use triage_core::registry::OperationRegistry;
use triage_core::report::ActionReport;
use triage_core::resolver::ArgumentResolver;
use triage_core::search::{SearchBackend, SearchRequest};

use crate::output::{print_json, print_table};

/// Loaded config plus a client for its backend.
pub struct Session {
    pub config: ConsoleConfig,
    pub backend: HttpBackend,
}

impl Session {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let config = ConsoleConfig::load(root).context("failed to load config")?;
        let backend = HttpBackend::from_config(&config.api)
            .with_context(|| format!("invalid backend at {}", config.api.base_url))?;
        Ok(Self { config, backend })
    }

    /// Fetch the catalog and bind it to the built-in handler registry.
    pub async fn catalog(&self) -> anyhow::Result<(OperationCatalog, ArgumentResolver)> {
        let catalog = OperationCatalog::load(&self.backend)
            .await
            .with_context(|| format!("failed to fetch operations from {}", self.backend.base_url()))?;
        let resolver = catalog.bind(handlers());
        Ok((catalog, resolver))
    }

    /// Count the items `query` matches. A successful count is what marks the
    /// query as searched for readiness.
    pub async fn count(&self, query: &str) -> anyhow::Result<u64> {
        let response = self
            .backend
            .search(&SearchRequest::count_only(query))
            .await
            .with_context(|| format!("search for '{query}' failed"))?;
        Ok(response.total)
    }
}

/// Operation handlers compiled into this binary. None ship yet; every
/// operation follows its catalog `when` rules.
pub fn handlers() -> OperationRegistry {
    OperationRegistry::new()
}

pub fn runtime() -> anyhow::Result<Runtime> {
    Runtime::new().context("failed to start async runtime")
}

/// On-disk form of an action; `action_id` may be omitted for drafts.
#[derive(Deserialize)]
struct ActionFile {
    #[serde(default)]
    action_id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    operations: Vec<ConfiguredOperation>,
    #[serde(default)]
    triggers: BTreeSet<String>,
}

pub fn load_action(path: &Path) -> anyhow::Result<Action> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let file: ActionFile = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a valid action", path.display()))?;

    let mut action = Action::new(file.name, file.query);
    if let Some(id) = file.action_id.filter(|id| !id.trim().is_empty()) {
        action.action_id = id;
    }
    action.operations = file.operations;
    action.triggers = file.triggers;
    Ok(action)
}

/// Print phase changes and progress of `coordinator` to stderr until the
/// execution settles. Terminal phases are coalesced away by `watch`, so the
/// caller reports the outcome from the execute result.
///
/// Must be spawned while the coordinator is idle, before the execution starts.
pub fn spawn_progress(coordinator: &ExecutionCoordinator) -> tokio::task::JoinHandle<()> {
    let mut rx = coordinator.watch();
    tokio::spawn(async move {
        let mut last = None;
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            let line = match snapshot.phase {
                ExecutionPhase::Idle | ExecutionPhase::Completed | ExecutionPhase::Failed => break,
                ExecutionPhase::Running => format!(
                    "running: {}/{}",
                    snapshot.progress.processed, snapshot.progress.total
                ),
                phase => phase.to_string(),
            };
            if last.as_ref() != Some(&line) {
                eprintln!("{line}");
                last = Some(line);
            }
        }
    })
}

pub fn print_report(report: &ActionReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "report": report,
            "summary": report.summary(),
        }));
    }

    let mut rows = Vec::new();
    for (operation_id, outcomes) in report.iter() {
        if outcomes.is_empty() {
            rows.push(vec![
                operation_id.to_string(),
                "-".to_string(),
                "(no outcome reported)".to_string(),
                String::new(),
            ]);
        }
        for outcome in outcomes {
            rows.push(vec![
                operation_id.to_string(),
                outcome.outcome.to_string(),
                outcome.title.clone(),
                outcome.message.clone(),
            ]);
        }
    }
    print_table(&["OPERATION", "OUTCOME", "TITLE", "MESSAGE"], rows);

    let summary = report.summary();
    println!(
        "\n{} succeeded, {} skipped, {} failed",
        summary.success, summary.skipped, summary.error
    );
    Ok(())
}

/// Run one execution with the event feed attached and progress on stderr,
/// then print its report.
pub async fn execute<F, Fut>(session: &Session, json: bool, start: F) -> anyhow::Result<()>
where
    F: FnOnce(ExecutionCoordinator) -> Fut,
    Fut: std::future::Future<Output = triage_core::Result<ActionReport>>,
{
    let channel = PushChannel::new();
    let feed = EventFeed::new(session.backend.clone(), Arc::clone(&channel)).spawn();
    let coordinator = ExecutionCoordinator::new(Arc::new(session.backend.clone()), channel);

    let progress = spawn_progress(&coordinator);
    let result = start(coordinator).await;
    let _ = progress.await;
    feed.abort();
    match &result {
        Ok(_) => eprintln!("{}", ExecutionPhase::Completed),
        Err(_) => eprintln!("{}", ExecutionPhase::Failed),
    }

    let report = result?;
    print_report(&report, json)?;
    if report.has_errors() {
        eprintln!("warning: some operations reported errors");
    }
    Ok(())
}
