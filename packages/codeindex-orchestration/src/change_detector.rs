//! Change detection
//!
//! Diffs the working tree HEAD against the last indexed commit. Renames are
//! one logical operation, reported as `(old, new)` pairs so chunking can
//! propagate path-parameterized chunk IDs. Without a VCS or a recorded
//! commit, everything is added.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::IndexingConfig;
use crate::discovery::FileDiscovery;
use crate::git::{GitChange, GitHelper};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: HashSet<String>,
    pub modified: HashSet<String>,
    pub deleted: HashSet<String>,
    pub renamed: Vec<(String, String)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.renamed.is_empty()
    }

    /// Every path this change set touches on the new side (renames count as
    /// their new path)
    pub fn all_changed(&self) -> HashSet<String> {
        let mut all: HashSet<String> = self
            .added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
            .cloned()
            .collect();
        for (_, new) in &self.renamed {
            all.insert(new.clone());
        }
        all
    }

    /// Paths needing re-parse: added + modified + rename targets
    pub fn paths_to_index(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .added
            .iter()
            .chain(self.modified.iter())
            .cloned()
            .collect();
        for (_, new) in &self.renamed {
            paths.push(new.clone());
        }
        paths.sort();
        paths.dedup();
        paths
    }

    /// Paths disappearing from the store: deleted + rename sources
    pub fn paths_to_remove(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.deleted.iter().cloned().collect();
        for (old, _) in &self.renamed {
            paths.push(old.clone());
        }
        paths.sort();
        paths.dedup();
        paths
    }
}

pub struct ChangeDetector {
    config: IndexingConfig,
}

impl ChangeDetector {
    pub fn new(config: IndexingConfig) -> Self {
        Self { config }
    }

    /// Diff against `last_commit`; `None` (or no git) means full change set.
    pub fn detect_changes(
        &self,
        repo_path: &Path,
        repo_id: &str,
        last_commit: Option<&str>,
    ) -> ChangeSet {
        let git = GitHelper::new(repo_path);

        if let Some(base) = last_commit {
            if git.is_git_repo() {
                match git.diff_name_status(base) {
                    Ok(changes) => {
                        let set = self.from_git_changes(changes);
                        tracing::info!(
                            repo_id,
                            added = set.added.len(),
                            modified = set.modified.len(),
                            deleted = set.deleted.len(),
                            renamed = set.renamed.len(),
                            "incremental_changes_detected"
                        );
                        return set;
                    }
                    Err(e) => {
                        tracing::warn!(repo_id, error = %e, "git_diff_failed_falling_back_to_full");
                    }
                }
            }
        }

        // Everything as added
        let discovery = FileDiscovery::new(self.config.clone());
        let mut set = ChangeSet::default();
        for file in discovery.discover_files(repo_path, None) {
            set.added.insert(file.rel_path);
        }
        tracing::info!(repo_id, added = set.added.len(), "full_change_set");
        set
    }

    fn from_git_changes(&self, changes: Vec<GitChange>) -> ChangeSet {
        let mut set = ChangeSet::default();
        for change in changes {
            match change {
                GitChange::Added(p) => {
                    set.added.insert(p);
                }
                GitChange::Modified(p) => {
                    set.modified.insert(p);
                }
                GitChange::Deleted(p) => {
                    set.deleted.insert(p);
                }
                GitChange::Renamed { old, new } => {
                    set.renamed.push((old, new));
                }
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_no_git_everything_added() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.py"), "x = 1\n").unwrap();

        let detector = ChangeDetector::new(IndexingConfig::default());
        let set = detector.detect_changes(tmp.path(), "r", None);
        assert_eq!(set.added, HashSet::from(["a.py".to_string()]));
        assert!(set.modified.is_empty());
    }

    #[test]
    fn test_rename_is_one_logical_operation() {
        let mut set = ChangeSet::default();
        set.renamed.push(("a.py".into(), "src/a.py".into()));

        assert!(!set.is_empty());
        assert_eq!(set.paths_to_index(), vec!["src/a.py".to_string()]);
        assert_eq!(set.paths_to_remove(), vec!["a.py".to_string()]);
        // Not double-reported as add+delete
        assert!(set.added.is_empty());
        assert!(set.deleted.is_empty());
    }

    #[test]
    fn test_all_changed_union() {
        let mut set = ChangeSet::default();
        set.added.insert("a.py".into());
        set.modified.insert("b.py".into());
        set.deleted.insert("c.py".into());
        set.renamed.push(("d.py".into(), "e.py".into()));

        let all = set.all_changed();
        assert!(all.contains("a.py"));
        assert!(all.contains("b.py"));
        assert!(all.contains("c.py"));
        assert!(all.contains("e.py"));
    }
}
