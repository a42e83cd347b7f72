//! Connection commands: add, list, remove, test.

use super::CliResult;
use crate::state_dir::Workspace;
use cardsync_engine::{ConflictPolicy, Connection, ConnectionId, ImportMode, NewConnection};
use std::time::Duration;

/// Settings for a new connection as given on the command line.
#[derive(Debug, Clone)]
pub struct AddArgs {
    /// Server URL.
    pub url: String,
    /// Account name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Display name.
    pub name: Option<String>,
    /// Stage new remote contacts for review.
    pub review: bool,
    /// Upload local contacts the server does not have.
    pub auto_export: bool,
    /// What to do when both sides changed.
    pub conflict_policy: ConflictPolicy,
    /// Minutes between scheduled syncs.
    pub interval_minutes: u64,
}

/// Runs `connection add`.
pub fn add(workspace: &Workspace, args: AddArgs) -> CliResult<Connection> {
    workspace.require_key()?;
    let mut new = NewConnection::new(args.url, args.username, args.password)
        .with_auto_export(args.auto_export)
        .with_conflict_policy(args.conflict_policy)
        .with_sync_interval(Duration::from_secs(args.interval_minutes.max(1) * 60))
        .with_import_mode(if args.review {
            ImportMode::Review
        } else {
            ImportMode::Auto
        });
    if let Some(name) = args.name {
        new = new.with_name(name);
    }
    let connection = workspace.engine().register_connection(new)?;
    println!("added connection {} ({})", connection.id, connection.name);
    Ok(connection)
}

/// Runs `connection list`.
pub fn list(workspace: &Workspace, format: &str) -> CliResult {
    let connections = workspace.engine().connections()?;
    if format == "json" {
        // Encrypted passwords stay out of the output.
        let view: Vec<_> = connections
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "name": c.name,
                    "url": c.url,
                    "username": c.username,
                    "sync_enabled": c.sync_enabled,
                    "auto_export": c.auto_export,
                    "import_mode": c.import_mode,
                    "conflict_policy": c.conflict_policy,
                    "last_sync_at": c.last_sync_at,
                    "last_error": c.last_error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    for c in &connections {
        let last = c
            .last_sync_at
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
        println!("{}  {}  {}  last sync: {last}", c.id, c.name, c.url);
        if let Some(err) = &c.last_error {
            println!("    last error: {err}");
        }
    }
    Ok(())
}

/// Runs `connection remove`.
pub fn remove(workspace: &Workspace, id: ConnectionId) -> CliResult {
    if workspace.engine().delete_connection(id)? {
        println!("removed connection {id}");
        Ok(())
    } else {
        Err(format!("no connection {id}").into())
    }
}

/// Runs `connection test`.
pub fn test(workspace: &Workspace, id: ConnectionId) -> CliResult {
    workspace.require_key()?;
    let objects = workspace.engine().test_connection(id)?;
    println!("connection {id} ok: {objects} object(s) on the server");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardsync_engine::SyncConfig;
    use cardsync_security::VaultKey;
    use tempfile::tempdir;

    fn args(url: &str) -> AddArgs {
        AddArgs {
            url: url.to_string(),
            username: "ana".into(),
            password: "pw".into(),
            name: Some("Work".into()),
            review: true,
            auto_export: false,
            conflict_policy: ConflictPolicy::KeepRemote,
            interval_minutes: 30,
        }
    }

    #[test]
    fn add_and_remove() {
        let temp = tempdir().unwrap();
        let workspace =
            Workspace::open(temp.path(), Some(VaultKey::generate()), SyncConfig::default()).unwrap();

        let connection = add(&workspace, args("https://93.184.216.34/dav/")).unwrap();
        assert_eq!(connection.name, "Work");
        assert_eq!(connection.import_mode, ImportMode::Review);
        assert_eq!(connection.sync_interval, Duration::from_secs(1800));

        remove(&workspace, connection.id).unwrap();
        assert!(remove(&workspace, connection.id).is_err());
    }

    #[test]
    fn add_refuses_internal_urls_and_missing_key() {
        let temp = tempdir().unwrap();
        let workspace =
            Workspace::open(temp.path(), Some(VaultKey::generate()), SyncConfig::default()).unwrap();
        assert!(add(&workspace, args("http://10.0.0.1/dav/")).is_err());
        drop(workspace);

        let workspace = Workspace::open(temp.path(), None, SyncConfig::default()).unwrap();
        assert!(add(&workspace, args("https://93.184.216.34/dav/")).is_err());
    }
}
