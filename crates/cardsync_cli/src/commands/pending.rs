//! Pending import commands: list, accept, reject.

use super::CliResult;
use crate::state_dir::Workspace;
use cardsync_engine::{ImportReport, ImportSource, PendingImportId};

/// Runs `pending list`.
pub fn list(workspace: &Workspace, format: &str) -> CliResult {
    let pending = workspace.engine().pending_imports()?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&pending)?);
        return Ok(());
    }
    if pending.is_empty() {
        println!("no pending imports");
    }
    for p in &pending {
        let source = match &p.source {
            ImportSource::Connection(id) => format!("connection {id}"),
            ImportSource::Upload { user } => format!("upload by {user}"),
        };
        println!("{}  {}  ({source})", p.id, p.display_name);
        if !p.possible_duplicates.is_empty() {
            println!("    possible duplicate of {} contact(s)", p.possible_duplicates.len());
        }
    }
    Ok(())
}

/// Runs `pending accept`. With no ids every pending import is accepted.
pub fn accept(workspace: &Workspace, ids: &[PendingImportId]) -> CliResult<ImportReport> {
    let ids = resolve_ids(workspace, ids)?;
    let report = workspace.engine().accept_pending_imports(&ids);
    println!(
        "accepted {}, already mapped {}, failed {}",
        report.imported, report.already_existing, report.errored
    );
    Ok(report)
}

/// Runs `pending reject`. With no ids every pending import is rejected.
pub fn reject(workspace: &Workspace, ids: &[PendingImportId]) -> CliResult<ImportReport> {
    let ids = resolve_ids(workspace, ids)?;
    let report = workspace.engine().reject_pending_imports(&ids);
    println!("rejected {}, failed {}", report.skipped, report.errored);
    Ok(report)
}

fn resolve_ids(workspace: &Workspace, ids: &[PendingImportId]) -> CliResult<Vec<PendingImportId>> {
    if !ids.is_empty() {
        return Ok(ids.to_vec());
    }
    Ok(workspace
        .engine()
        .pending_imports()?
        .into_iter()
        .map(|p| p.id)
        .collect())
}
