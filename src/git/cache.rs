use std::collections::HashMap;

use tracing::warn;

use crate::models::{CommitInfo, GitReference, ZERO_SHA};

/// In-memory store of parsed commits and references.
///
/// Single source of truth queried by consumers. The cache is cleared and
/// fully rebuilt on each load cycle; there is no incremental merge. Commits
/// keep their insertion order, which is the topological order of the log
/// stream. The working-tree pseudo-commit lives in its own slot next to the
/// untracked list and the two raw diff blobs.
#[derive(Debug, Default)]
pub struct RevisionCache {
    commits: Vec<CommitInfo>,
    by_id: HashMap<String, usize>,
    references: HashMap<String, GitReference>,
    untracked: Vec<String>,
    wip: Option<CommitInfo>,
    unstaged_diff: String,
    staged_diff: String,
    expected_total: usize,
    version: u64,
}

impl RevisionCache {
    pub fn new() -> Self {
        RevisionCache::default()
    }

    /// Drops all commits, references and working-tree state and bumps the
    /// cache version. Runs at the start of every load cycle.
    pub fn clear(&mut self) {
        self.commits.clear();
        self.by_id.clear();
        self.references.clear();
        self.untracked.clear();
        self.wip = None;
        self.unstaged_diff.clear();
        self.staged_diff.clear();
        self.expected_total = 0;
        self.version += 1;
    }

    /// Records how many records the incoming batch holds. Set before any
    /// insert so consumers can report progress against a stable total.
    pub fn configure(&mut self, expected_total: usize) {
        self.expected_total = expected_total;
    }

    pub fn expected_total(&self) -> usize {
        self.expected_total
    }

    /// Opaque token bumped on every clear; carried by the completion event.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn insert_commit(&mut self, commit: CommitInfo) {
        if self.by_id.contains_key(&commit.id) {
            warn!("duplicate commit id {} ignored", commit.id);
            return;
        }
        self.by_id.insert(commit.id.clone(), self.commits.len());
        self.commits.push(commit);
    }

    /// Looks a commit up by id. The all-zero sentinel resolves to the
    /// working-tree pseudo-commit.
    pub fn commit(&self, id: &str) -> Option<&CommitInfo> {
        if id == ZERO_SHA {
            return self.wip.as_ref();
        }
        self.by_id.get(id).map(|&index| &self.commits[index])
    }

    /// Commits in topological log order.
    pub fn commits(&self) -> &[CommitInfo] {
        &self.commits
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Fetch-or-create the reference record for a commit id. Keying by id
    /// keeps at most one record per commit; multiple names aggregate into it.
    pub fn get_or_insert_reference(&mut self, id: &str) -> &mut GitReference {
        self.references.entry(id.to_string()).or_default()
    }

    pub fn reference(&self, id: &str) -> Option<&GitReference> {
        self.references.get(id)
    }

    pub fn remove_reference(&mut self, id: &str) -> Option<GitReference> {
        self.references.remove(id)
    }

    pub fn references(&self) -> &HashMap<String, GitReference> {
        &self.references
    }

    pub fn set_untracked_files(&mut self, files: Vec<String>) {
        self.untracked = files;
    }

    pub fn untracked_files(&self) -> &[String] {
        &self.untracked
    }

    /// Rebuilds the pseudo-commit from the resolved HEAD id and the two raw
    /// diff blobs. An empty `parent_id` (unborn repository) produces a
    /// parentless pseudo-commit.
    pub fn update_wip_commit(&mut self, parent_id: &str, unstaged_diff: String, staged_diff: String) {
        self.unstaged_diff = unstaged_diff;
        self.staged_diff = staged_diff;
        let parent = (!parent_id.is_empty()).then(|| parent_id.to_string());
        self.wip = Some(CommitInfo::new_wip(parent));
    }

    pub fn wip_commit(&self) -> Option<&CommitInfo> {
        self.wip.as_ref()
    }

    pub fn unstaged_diff(&self) -> &str {
        &self.unstaged_diff
    }

    pub fn staged_diff(&self) -> &str {
        &self.staged_diff
    }
}
