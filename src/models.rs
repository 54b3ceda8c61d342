//! Core data models used throughout repo-scout.
//!
//! A [`RepositorySnapshot`] is the indexed, immutable view of one repository
//! at one point in time. Per-question values ([`QueryDecision`],
//! [`ThinkingStep`]) are transient and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Owner/name pair identifying a repository on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoKey {
    pub owner: String,
    pub name: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Store key, `owner/name` lowercased so differently-cased URLs share an entry.
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.owner, self.name).to_lowercase()
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Whether a file-tree entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One node of the repository file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

impl FileEntry {
    pub fn file(path: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// An open issue (pull requests excluded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub comments: u64,
    pub url: String,
}

impl IssueSummary {
    /// Case-insensitive substring match against every label.
    pub fn has_label_containing(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.labels
            .iter()
            .any(|l| l.to_lowercase().contains(&needle))
    }
}

/// An open pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub draft: bool,
}

/// Repository-level metadata as reported by the hosting service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub full_name: String,
    pub url: String,
    pub default_branch: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub topics: BTreeSet<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
}

/// The complete indexed state of one repository at one point in time.
///
/// Built in full by [`SnapshotBuilder`](crate::snapshot::SnapshotBuilder) and
/// never mutated afterwards; a rebuild replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub key: RepoKey,
    pub metadata: RepoMetadata,
    /// Language name to byte count.
    pub languages: BTreeMap<String, u64>,
    pub readme: Option<String>,
    pub contributing: Option<String>,
    pub file_tree: Vec<FileEntry>,
    pub issues: Vec<IssueSummary>,
    pub pull_requests: Vec<PullRequestSummary>,
    pub indexed_at: DateTime<Utc>,
}

impl RepositorySnapshot {
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            full_name: self.metadata.full_name.clone(),
            stars: self.metadata.stars,
            language: self.metadata.language.clone(),
            files: self.file_tree.iter().filter(|e| e.is_file()).count(),
            issues: self.issues.len(),
            pull_requests: self.pull_requests.len(),
            has_readme: self.readme.is_some(),
            has_contributing: self.contributing.is_some(),
        }
    }
}

/// Summary counts reported after indexing and by the status operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub full_name: String,
    pub stars: u64,
    pub language: Option<String>,
    pub files: usize,
    pub issues: usize,
    pub pull_requests: usize,
    pub has_readme: bool,
    pub has_contributing: bool,
}

/// Router output: whether source files are needed, and which.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDecision {
    pub needs_files: bool,
    pub files: Vec<String>,
}

impl QueryDecision {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Completion state of one trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Complete,
    Failed,
}

/// One human-readable trace entry describing a pipeline stage that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThinkingStep {
    pub label: String,
    pub detail: String,
    pub status: StepStatus,
}
