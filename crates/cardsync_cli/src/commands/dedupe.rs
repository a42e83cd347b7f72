//! Dedupe command implementation.

use super::CliResult;
use crate::state_dir::Workspace;
use cardsync_engine::ContactStore;
use serde::Serialize;
use std::collections::HashMap;

/// A group of contacts that look alike.
#[derive(Debug, Serialize)]
pub struct GroupView {
    /// Best pairwise similarity inside the group.
    pub score: f64,
    /// Contact ids with their names.
    pub members: Vec<(String, String)>,
}

/// Finds duplicate groups among the workspace contacts.
pub fn groups(workspace: &Workspace) -> CliResult<Vec<GroupView>> {
    let engine = workspace.engine();
    let names: HashMap<_, _> = engine
        .contacts()
        .list()?
        .into_iter()
        .map(|(id, contact)| (id, contact.display_name()))
        .collect();

    Ok(engine
        .duplicate_groups()?
        .into_iter()
        .map(|group| GroupView {
            score: group.score,
            members: group
                .members
                .iter()
                .map(|id| (id.to_string(), names.get(id).cloned().unwrap_or_default()))
                .collect(),
        })
        .collect())
}

/// Runs the dedupe command.
pub fn run(workspace: &Workspace, format: &str) -> CliResult {
    let groups = groups(workspace)?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }
    if groups.is_empty() {
        println!("no duplicates found");
    }
    for (index, group) in groups.iter().enumerate() {
        println!("group {} (score {:.2})", index + 1, group.score);
        for (id, name) in &group.members {
            println!("  {id}  {name}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardsync_engine::SyncConfig;
    use cardsync_vcard::Contact;
    use tempfile::tempdir;

    #[test]
    fn similar_names_are_grouped() {
        let temp = tempdir().unwrap();
        let workspace = Workspace::open(temp.path(), None, SyncConfig::default()).unwrap();
        let contacts = workspace.engine().contacts();
        contacts.insert(Contact::named("Carla", "Dias")).unwrap();
        contacts.insert(Contact::named("Karla", "Dias")).unwrap();
        contacts.insert(Contact::named("Bruno", "Costa")).unwrap();

        let groups = groups(&workspace).unwrap();

        assert_eq!(groups.len(), 1);
        let mut names: Vec<_> = groups[0].members.iter().map(|(_, n)| n.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Carla Dias", "Karla Dias"]);
    }
}
