//! # CardSync Dedupe
//!
//! Fuzzy duplicate-contact detection by normalized edit distance.
//!
//! Two contacts are candidate duplicates when the similarity of their
//! "given name + surname" strings reaches [`DUPLICATE_THRESHOLD`].
//! [`find_all_duplicate_groups`] clusters a whole contact list with a
//! union-find, so `A ~ B` and `B ~ C` put all three in one group even when
//! `A` and `C` are further apart.
//!
//! ```
//! use cardsync_dedupe::{find_all_duplicate_groups, NamedEntry};
//!
//! let entries = vec![
//!     NamedEntry::new(1, "John", "Smith"),
//!     NamedEntry::new(2, "Jon", "Smith"),
//!     NamedEntry::new(3, "Alice", "Jones"),
//! ];
//! let groups = find_all_duplicate_groups(&entries);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].members, vec![1, 2]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod similarity;
mod union_find;

pub use similarity::{levenshtein, similarity};

use serde::{Deserialize, Serialize};
use similarity::{normalize, similarity_normalized};
use std::collections::HashMap;
use union_find::UnionFind;

/// Similarity at or above which two contacts are reported as duplicates.
pub const DUPLICATE_THRESHOLD: f64 = 0.75;

/// A contact reduced to what duplicate detection looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntry<K> {
    /// Caller's identifier for the contact.
    pub id: K,
    /// Given name.
    pub name: String,
    /// Surname.
    pub surname: String,
}

impl<K> NamedEntry<K> {
    /// Creates an entry.
    pub fn new(id: K, name: impl Into<String>, surname: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            surname: surname.into(),
        }
    }

    /// Given name and surname joined by a space.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// Another contact that resembles the query target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate<K> {
    /// Identifier of the similar contact.
    pub id: K,
    /// Its full name.
    pub full_name: String,
    /// Similarity to the target, in `[threshold, 1]`.
    pub score: f64,
}

/// Two or more mutually similar contacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup<K> {
    /// Member identifiers in input order.
    pub members: Vec<K>,
    /// Highest pairwise similarity inside the group.
    pub score: f64,
}

/// Duplicate detection with a configurable threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateDetector {
    threshold: f64,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self {
            threshold: DUPLICATE_THRESHOLD,
        }
    }
}

impl DuplicateDetector {
    /// Creates a detector with [`DUPLICATE_THRESHOLD`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the similarity threshold, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// The configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Every other entry at or above the threshold, most similar first.
    ///
    /// The target is recognised by `id` and skipped, whether or not it is
    /// part of `entries`.
    pub fn find_duplicates<K: Clone + PartialEq>(
        &self,
        target: &NamedEntry<K>,
        entries: &[NamedEntry<K>],
    ) -> Vec<DuplicateCandidate<K>> {
        let wanted = normalize(&target.full_name());
        let mut candidates: Vec<DuplicateCandidate<K>> = entries
            .iter()
            .filter(|entry| entry.id != target.id)
            .filter_map(|entry| {
                let full_name = entry.full_name();
                let score = similarity_normalized(&wanted, &normalize(&full_name));
                (score >= self.threshold).then(|| DuplicateCandidate {
                    id: entry.id.clone(),
                    full_name,
                    score,
                })
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    /// Clusters all entries into groups of two or more, highest score first.
    pub fn find_all_duplicate_groups<K: Clone>(
        &self,
        entries: &[NamedEntry<K>],
    ) -> Vec<DuplicateGroup<K>> {
        let names: Vec<Vec<char>> = entries.iter().map(|e| normalize(&e.full_name())).collect();
        let mut sets = UnionFind::new(entries.len());
        let mut best_edge = vec![f64::NEG_INFINITY; entries.len()];

        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let score = similarity_normalized(&names[i], &names[j]);
                if score < self.threshold {
                    continue;
                }
                let (ri, rj) = (sets.find(i), sets.find(j));
                let carried = best_edge[ri].max(best_edge[rj]).max(score);
                let root = sets.union(ri, rj);
                best_edge[root] = carried;
            }
        }

        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<DuplicateGroup<K>> = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            let root = sets.find(idx);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                groups.push(DuplicateGroup {
                    members: Vec::new(),
                    score: best_edge[root],
                });
                groups.len() - 1
            });
            groups[slot].members.push(entry.id.clone());
        }

        groups.retain(|g| g.members.len() >= 2);
        groups.sort_by(|a, b| b.score.total_cmp(&a.score));
        tracing::debug!(
            entries = entries.len(),
            groups = groups.len(),
            "duplicate clustering finished"
        );
        groups
    }
}

/// [`DuplicateDetector::find_duplicates`] with the default threshold.
pub fn find_duplicates<K: Clone + PartialEq>(
    target: &NamedEntry<K>,
    entries: &[NamedEntry<K>],
) -> Vec<DuplicateCandidate<K>> {
    DuplicateDetector::default().find_duplicates(target, entries)
}

/// [`DuplicateDetector::find_all_duplicate_groups`] with the default threshold.
pub fn find_all_duplicate_groups<K: Clone>(entries: &[NamedEntry<K>]) -> Vec<DuplicateGroup<K>> {
    DuplicateDetector::default().find_all_duplicate_groups(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Vec<NamedEntry<char>> {
        vec![
            NamedEntry::new('A', "John", "Smith"),
            NamedEntry::new('B', "Jon", "Smith"),
            NamedEntry::new('C', "Jon", "Smyth"),
            NamedEntry::new('D', "Alice", "Jones"),
        ]
    }

    #[test]
    fn clusters_similar_names_and_leaves_outlier() {
        let groups = find_all_duplicate_groups(&people());

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec!['A', 'B', 'C']);
        assert!((groups[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn groups_are_sorted_by_score() {
        let mut entries = people();
        entries.push(NamedEntry::new('E', "Alice", "Jones"));
        let groups = find_all_duplicate_groups(&entries);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec!['D', 'E']);
        assert_eq!(groups[0].score, 1.0);
        assert_eq!(groups[1].members, vec!['A', 'B', 'C']);
    }

    #[test]
    fn transitive_membership_through_a_bridge() {
        // "abcd" ~ "abce" ~ "abee" but "abcd" vs "abee" is only 0.5.
        let entries = vec![
            NamedEntry::new(1, "abcd", ""),
            NamedEntry::new(2, "abce", ""),
            NamedEntry::new(3, "abee", ""),
        ];
        let groups = DuplicateDetector::new().find_all_duplicate_groups(&entries);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![1, 2, 3]);
    }

    #[test]
    fn no_groups_for_distinct_names() {
        let entries = vec![
            NamedEntry::new(1, "Alice", "Jones"),
            NamedEntry::new(2, "Bob", "Marley"),
        ];
        assert!(find_all_duplicate_groups(&entries).is_empty());
        assert!(find_all_duplicate_groups::<u8>(&[]).is_empty());
    }

    #[test]
    fn find_duplicates_excludes_target_and_sorts() {
        let entries = people();
        let found = find_duplicates(&entries[0], &entries);

        let ids: Vec<char> = found.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!['B', 'C']);
        assert!(found[0].score >= found[1].score);
        assert_eq!(found[0].full_name, "Jon Smith");
    }

    #[test]
    fn threshold_is_configurable() {
        let entries = people();
        let strict = DuplicateDetector::new().with_threshold(0.85);
        let found = strict.find_duplicates(&entries[0], &entries);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 'B');

        assert_eq!(DuplicateDetector::new().with_threshold(7.0).threshold(), 1.0);
    }
}
