//! Conflict commands: list and resolve.

use super::CliResult;
use crate::state_dir::Workspace;
use cardsync_engine::{Conflict, ConflictId, ConflictResolution, MergeChoice};
use std::collections::BTreeMap;

/// Runs `conflicts list`.
pub fn list(workspace: &Workspace, format: &str) -> CliResult {
    let conflicts = workspace.engine().open_conflicts(None)?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }
    if conflicts.is_empty() {
        println!("no open conflicts");
    }
    for conflict in &conflicts {
        print_conflict(conflict);
    }
    Ok(())
}

fn print_conflict(conflict: &Conflict) {
    println!(
        "{}  {}  ({})",
        conflict.id,
        conflict.local.display_name(),
        conflict.href
    );
    for field in conflict.differing_fields() {
        println!("    {field}");
    }
}

/// Builds a resolution from the command-line flags.
///
/// `keep` wins when given. Otherwise `take` entries (`field=local` or
/// `field=remote`) and `set` entries (`field=value`) form a merge.
pub fn resolution(keep: Option<&str>, take: &[String], set: &[String]) -> CliResult<ConflictResolution> {
    match keep {
        Some("local") => return Ok(ConflictResolution::KeepLocal),
        Some("remote") => return Ok(ConflictResolution::KeepRemote),
        Some(other) => return Err(format!("--keep must be local or remote, not '{other}'").into()),
        None => {}
    }

    let mut choices = BTreeMap::new();
    for entry in take {
        let (field, side) = split_pair(entry)?;
        let choice = match side {
            "local" => MergeChoice::Local,
            "remote" => MergeChoice::Remote,
            other => return Err(format!("'{field}' must take local or remote, not '{other}'").into()),
        };
        choices.insert(field.to_string(), choice);
    }
    for entry in set {
        let (field, value) = split_pair(entry)?;
        choices.insert(field.to_string(), MergeChoice::Value(value.to_string()));
    }
    if choices.is_empty() {
        return Err("nothing to resolve with: pass --keep, --take or --set".into());
    }
    Ok(ConflictResolution::Merge(choices))
}

fn split_pair(entry: &str) -> CliResult<(&str, &str)> {
    entry
        .split_once('=')
        .map(|(k, v)| (k.trim(), v))
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{entry}'").into())
}

/// Runs `resolve`.
pub fn resolve(workspace: &Workspace, id: ConflictId, resolution: ConflictResolution) -> CliResult {
    workspace.require_key()?;
    let conflict = workspace.engine().resolve_conflict(id, resolution)?;
    println!("resolved conflict {} for {}", conflict.id, conflict.href);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_from_flags() {
        assert_eq!(resolution(Some("local"), &[], &[]).unwrap(), ConflictResolution::KeepLocal);
        assert_eq!(resolution(Some("remote"), &[], &[]).unwrap(), ConflictResolution::KeepRemote);
        assert!(resolution(Some("both"), &[], &[]).is_err());
        assert!(resolution(None, &[], &[]).is_err());

        let merged = resolution(
            None,
            &["phones=remote".to_string()],
            &["notes=met at the fair".to_string()],
        )
        .unwrap();
        let mut expected = BTreeMap::new();
        expected.insert("phones".to_string(), MergeChoice::Remote);
        expected.insert("notes".to_string(), MergeChoice::Value("met at the fair".into()));
        assert_eq!(merged, ConflictResolution::Merge(expected));

        assert!(resolution(None, &["phones".to_string()], &[]).is_err());
        assert!(resolution(None, &["phones=both".to_string()], &[]).is_err());
    }
}
