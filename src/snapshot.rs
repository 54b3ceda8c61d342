//! Repository snapshot builder.
//!
//! Assembles a [`RepositorySnapshot`] from a [`RepoHost`]. The seven
//! sub-fetches run concurrently; only the metadata fetch is mandatory. Every
//! other failure is logged and degrades to empty/absent data, so one flaky
//! endpoint never aborts indexing.
//!
//! # Ingestion limits
//!
//! | Field | Max characters |
//! |-------|---------------:|
//! | README | 8000 |
//! | contributing guide | 3000 |
//! | issue body | 500 |
//! | pull request body | 300 |
//! | fetched file body | 6000 |

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{Clock, SystemClock};
use crate::error::{Result, ScoutError};
use crate::github::{DirEntry, IssueRecord, PullRecord, RepoHost};
use crate::models::{
    EntryKind, FileEntry, IssueSummary, PullRequestSummary, RepoKey, RepositorySnapshot,
};

pub const README_MAX_CHARS: usize = 8000;
pub const CONTRIBUTING_MAX_CHARS: usize = 3000;
pub const ISSUE_BODY_MAX_CHARS: usize = 500;
pub const PR_BODY_MAX_CHARS: usize = 300;
pub const FILE_BODY_MAX_CHARS: usize = 6000;

/// Paths fetched per question, regardless of how many are requested.
pub const MAX_FILES_PER_QUESTION: usize = 5;

/// Directories at this depth are recorded but not listed.
pub const MAX_TREE_DEPTH: usize = 3;

/// Directory names never descended into.
pub const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "vendor",
    "__pycache__",
    ".git",
    ".next",
    "coverage",
    "venv",
];

/// Locations probed for a contributing guide, first hit wins.
const CONTRIBUTING_PATHS: &[&str] = &[
    "CONTRIBUTING.md",
    ".github/CONTRIBUTING.md",
    "docs/CONTRIBUTING.md",
];

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

pub fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

/// Builds snapshots and fetches file bodies on demand.
#[derive(Clone)]
pub struct SnapshotBuilder {
    host: Arc<dyn RepoHost>,
    clock: Arc<dyn Clock>,
}

impl SnapshotBuilder {
    pub fn new(host: Arc<dyn RepoHost>) -> Self {
        Self::with_clock(host, Arc::new(SystemClock))
    }

    /// Builder whose snapshots are stamped by `clock`.
    pub fn with_clock(host: Arc<dyn RepoHost>, clock: Arc<dyn Clock>) -> Self {
        Self { host, clock }
    }

    /// Build a complete snapshot of `repo`.
    ///
    /// # Errors
    ///
    /// [`ScoutError::RepositoryUnavailable`] when the metadata fetch fails.
    /// No other sub-fetch can fail the build.
    pub async fn build(&self, repo: &RepoKey) -> Result<RepositorySnapshot> {
        tracing::info!(repo = %repo, "building repository snapshot");

        let (metadata, readme, contributing, file_tree, issues, pulls, languages) = tokio::join!(
            self.host.metadata(repo),
            self.host.readme(repo),
            self.fetch_contributing(repo),
            self.fetch_file_tree(repo),
            self.host.open_issues(repo),
            self.host.open_pulls(repo),
            self.host.languages(repo),
        );

        let metadata = metadata.map_err(|e| match e {
            ScoutError::RepositoryUnavailable { .. } => e,
            other => ScoutError::RepositoryUnavailable {
                repo: repo.to_string(),
                reason: other.to_string(),
            },
        })?;

        let readme = absorb(repo, "readme", readme)
            .flatten()
            .map(|text| truncate_chars(&text, README_MAX_CHARS));
        let contributing = contributing.map(|text| truncate_chars(&text, CONTRIBUTING_MAX_CHARS));
        let issues = absorb(repo, "issues", issues)
            .unwrap_or_default()
            .into_iter()
            .filter(|i| !i.is_pull_request)
            .map(ingest_issue)
            .collect();
        let pull_requests = absorb(repo, "pulls", pulls)
            .unwrap_or_default()
            .into_iter()
            .map(ingest_pull)
            .collect();
        let languages = absorb(repo, "languages", languages).unwrap_or_default();

        let snapshot = RepositorySnapshot {
            key: repo.clone(),
            metadata,
            languages,
            readme,
            contributing,
            file_tree,
            issues,
            pull_requests,
            indexed_at: self.clock.now(),
        };

        tracing::info!(
            repo = %repo,
            files = snapshot.file_tree.len(),
            issues = snapshot.issues.len(),
            pulls = snapshot.pull_requests.len(),
            "snapshot built"
        );
        Ok(snapshot)
    }

    async fn fetch_contributing(&self, repo: &RepoKey) -> Option<String> {
        for path in CONTRIBUTING_PATHS {
            match self.host.file_content(repo, path).await {
                Ok(Some(text)) => return Some(text),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(repo = %repo, path, error = %e, "contributing fetch failed");
                }
            }
        }
        None
    }

    /// Breadth-first listing bounded to [`MAX_TREE_DEPTH`]. Sibling directories
    /// at each level are listed concurrently; skipped directories are recorded
    /// but never listed.
    pub async fn fetch_file_tree(&self, repo: &RepoKey) -> Vec<FileEntry> {
        let mut tree = Vec::new();
        let mut level: Vec<String> = vec![String::new()];

        for depth in 0..MAX_TREE_DEPTH {
            if level.is_empty() {
                break;
            }
            let listings = join_all(level.iter().map(|dir| self.list_dir_or_empty(repo, dir))).await;

            let mut next = Vec::new();
            for entries in listings {
                for entry in entries {
                    if entry.kind == EntryKind::Directory
                        && !is_skipped_dir(&entry.name)
                        && depth + 1 < MAX_TREE_DEPTH
                    {
                        next.push(entry.path.clone());
                    }
                    tree.push(into_file_entry(entry));
                }
            }
            level = next;
        }

        tree
    }

    async fn list_dir_or_empty(&self, repo: &RepoKey, path: &str) -> Vec<DirEntry> {
        match self.host.list_dir(repo, path).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(repo = %repo, path, error = %e, "directory listing failed");
                Vec::new()
            }
        }
    }

    /// Fetch up to [`MAX_FILES_PER_QUESTION`] file bodies concurrently.
    ///
    /// Paths beyond the cap are ignored. Paths that fail to fetch or decode are
    /// silently omitted, so the result may hold fewer entries than requested.
    pub async fn fetch_file_bodies(
        &self,
        repo: &RepoKey,
        paths: &[String],
    ) -> BTreeMap<String, String> {
        let capped = &paths[..paths.len().min(MAX_FILES_PER_QUESTION)];
        let bodies = join_all(capped.iter().map(|path| async move {
            let result = self.host.file_content(repo, path).await;
            (path, result)
        }))
        .await;

        let mut files = BTreeMap::new();
        for (path, result) in bodies {
            match result {
                Ok(Some(body)) => {
                    files.insert(path.clone(), truncate_chars(&body, FILE_BODY_MAX_CHARS));
                }
                Ok(None) => {
                    tracing::debug!(repo = %repo, path = %path, "requested file does not exist");
                }
                Err(e) => {
                    tracing::warn!(repo = %repo, path = %path, error = %e, "file fetch failed");
                }
            }
        }
        files
    }
}

fn absorb<T>(repo: &RepoKey, what: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(repo = %repo, fetch = what, error = %e, "sub-fetch failed, continuing without it");
            None
        }
    }
}

fn into_file_entry(entry: DirEntry) -> FileEntry {
    FileEntry {
        path: entry.path,
        kind: entry.kind,
        size: entry.size,
    }
}

fn ingest_issue(record: IssueRecord) -> IssueSummary {
    IssueSummary {
        number: record.number,
        title: record.title,
        body: record.body.map(|b| truncate_chars(&b, ISSUE_BODY_MAX_CHARS)),
        labels: record.labels,
        author: record.author,
        created_at: record.created_at,
        comments: record.comments,
        url: record.url,
    }
}

fn ingest_pull(record: PullRecord) -> PullRequestSummary {
    PullRequestSummary {
        number: record.number,
        title: record.title,
        body: record.body.map(|b| truncate_chars(&b, PR_BODY_MAX_CHARS)),
        author: record.author,
        created_at: record.created_at,
        url: record.url,
        draft: record.draft,
    }
}
