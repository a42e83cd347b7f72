//! Import and export commands.

use super::CliResult;
use crate::state_dir::Workspace;
use cardsync_engine::{ImportMode, ImportReport};
use cardsync_vcard::EncodeOptions;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// Runs the import command.
pub fn import(workspace: &Workspace, path: &Path, user: &str, review: bool) -> CliResult<ImportReport> {
    let content = fs::read_to_string(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mode = if review { ImportMode::Review } else { ImportMode::Auto };

    let report = workspace.engine().stage_file_import(user, &file_name, &content, mode)?;
    println!(
        "imported {}, staged {}, already present {}, unreadable {}",
        report.imported, report.staged, report.already_existing, report.errored
    );
    Ok(report)
}

/// Runs the export command. Writes into `out` when it is a directory,
/// to `out` itself otherwise, and to the current directory by default.
pub fn export(
    workspace: &Workspace,
    name: &str,
    out: Option<&Path>,
    options: &EncodeOptions,
) -> CliResult<PathBuf> {
    let (file_name, body) = workspace
        .engine()
        .export_contacts(name, Utc::now().date_naive(), options)?;
    let path = match out {
        Some(dir) if dir.is_dir() => dir.join(&file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(&file_name),
    };
    fs::write(&path, body)?;
    println!("wrote {}", path.display());
    Ok(path)
}
