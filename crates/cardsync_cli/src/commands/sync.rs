//! Sync command implementation.

use super::CliResult;
use crate::state_dir::Workspace;
use cardsync_engine::{ConnectionId, SyncReport, SyncResult};
use chrono::Utc;

/// Which connections to synchronize.
#[derive(Debug, Clone, Copy)]
pub enum Target {
    /// One connection.
    One(ConnectionId),
    /// Connections whose interval has elapsed.
    Due,
    /// Every enabled connection.
    All,
}

/// Runs the sync command. Fails if any connection failed; the others
/// still run.
pub fn run(workspace: &Workspace, target: Target, format: &str) -> CliResult {
    workspace.require_key()?;
    let engine = workspace.engine();

    let results: Vec<(ConnectionId, SyncResult<SyncReport>)> = match target {
        Target::One(id) => vec![(id, engine.sync(id))],
        Target::Due => engine.sync_due(Utc::now())?,
        Target::All => engine
            .connections()?
            .into_iter()
            .filter(|c| c.sync_enabled)
            .map(|c| (c.id, engine.sync(c.id)))
            .collect(),
    };

    let mut failed = 0;
    for (id, result) in &results {
        match result {
            Ok(report) if format == "json" => println!("{}", serde_json::to_string(report)?),
            Ok(report) => print_report(report),
            Err(err) => {
                failed += 1;
                eprintln!("{id}: sync failed: {err}");
            }
        }
    }
    if results.is_empty() {
        println!("nothing to sync");
    }
    if failed > 0 {
        return Err(format!("{failed} of {} sync run(s) failed", results.len()).into());
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "{}: pulled {} (+{} ~{} -{}), pushed {} (+{} ~{} -{}), staged {}, conflicts {}, errors {} in {} ms",
        report.connection_id,
        report.pulled(),
        report.created_local,
        report.updated_local,
        report.deleted_local,
        report.pushed(),
        report.pushed_creates,
        report.pushed_updates,
        report.deleted_remote,
        report.staged,
        report.conflicts,
        report.errors,
        report.duration.as_millis()
    );
}
