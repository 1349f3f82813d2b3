use super::{runtime, Session};
use crate::output::{join_or_dash, print_json, print_table};
use std::path::Path;

pub fn run(root: &Path, all: bool, json: bool) -> anyhow::Result<()> {
    let session = Session::open(root)?;
    let (catalog, _) = runtime()?.block_on(session.catalog())?;

    let operations = if all {
        catalog.operations().iter().collect()
    } else {
        catalog.available_for(&session.config.user.roles)
    };

    if json {
        return print_json(&operations);
    }
    if operations.is_empty() {
        println!("No operations available for roles: {}", join_or_dash(&session.config.user.roles));
        return Ok(());
    }

    let rows = operations
        .iter()
        .map(|op| {
            vec![
                op.id.clone(),
                op.title.clone(),
                op.priority.to_string(),
                op.steps.len().to_string(),
                join_or_dash(&op.triggers),
                join_or_dash(&op.roles),
            ]
        })
        .collect();
    print_table(&["ID", "TITLE", "PRIORITY", "STEPS", "TRIGGERS", "ROLES"], rows);
    Ok(())
}
