//! In-process fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repo_scout::assistant::{Assistant, ModelLimits};
use repo_scout::cache::{InMemorySnapshotStore, ManualClock, SnapshotCache};
use repo_scout::error::{Result, ScoutError};
use repo_scout::github::{DirEntry, IssueRecord, PullRecord, RepoHost};
use repo_scout::llm::{ChatMessage, LanguageModel, RawResponse};
use repo_scout::models::{EntryKind, RepoKey, RepoMetadata};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ─── FakeHost ───────────────────────────────────────────────────────

/// A repository host serving canned data and recording what was asked.
#[derive(Default)]
pub struct FakeHost {
    pub metadata: Option<RepoMetadata>,
    pub readme: Option<String>,
    pub readme_fails: bool,
    pub files: HashMap<String, String>,
    pub failing_files: HashSet<String>,
    pub dirs: HashMap<String, Vec<DirEntry>>,
    pub issues: Vec<IssueRecord>,
    pub issues_fail: bool,
    pub pulls: Vec<PullRecord>,
    pub languages: BTreeMap<String, u64>,

    pub metadata_calls: AtomicUsize,
    pub file_requests: Mutex<Vec<String>>,
    pub listed_dirs: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn with_metadata(stars: u64, open_issues: u64) -> Self {
        Self {
            metadata: Some(metadata("owner/repo", stars, open_issues)),
            ..Default::default()
        }
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn file_requests(&self) -> Vec<String> {
        self.file_requests.lock().unwrap().clone()
    }

    pub fn listed_dirs(&self) -> Vec<String> {
        self.listed_dirs.lock().unwrap().clone()
    }

    pub fn add_dir(&mut self, parent: &str, entries: Vec<DirEntry>) {
        self.dirs.insert(parent.to_string(), entries);
    }
}

#[async_trait]
impl RepoHost for FakeHost {
    async fn metadata(&self, repo: &RepoKey) -> Result<RepoMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.metadata
            .clone()
            .ok_or_else(|| ScoutError::RepositoryUnavailable {
                repo: repo.to_string(),
                reason: "GitHub API error 404 Not Found".to_string(),
            })
    }

    async fn readme(&self, _repo: &RepoKey) -> Result<Option<String>> {
        if self.readme_fails {
            return Err(ScoutError::Upstream("readme exploded".to_string()));
        }
        Ok(self.readme.clone())
    }

    async fn file_content(&self, _repo: &RepoKey, path: &str) -> Result<Option<String>> {
        self.file_requests.lock().unwrap().push(path.to_string());
        if self.failing_files.contains(path) {
            return Err(ScoutError::Upstream(format!("invalid base64 content in {}", path)));
        }
        Ok(self.files.get(path).cloned())
    }

    async fn list_dir(&self, _repo: &RepoKey, path: &str) -> Result<Vec<DirEntry>> {
        self.listed_dirs.lock().unwrap().push(path.to_string());
        Ok(self.dirs.get(path).cloned().unwrap_or_default())
    }

    async fn open_issues(&self, _repo: &RepoKey) -> Result<Vec<IssueRecord>> {
        if self.issues_fail {
            return Err(ScoutError::Upstream("GitHub API error 502".to_string()));
        }
        Ok(self.issues.clone())
    }

    async fn open_pulls(&self, _repo: &RepoKey) -> Result<Vec<PullRecord>> {
        Ok(self.pulls.clone())
    }

    async fn languages(&self, _repo: &RepoKey) -> Result<BTreeMap<String, u64>> {
        Ok(self.languages.clone())
    }
}

// ─── ScriptedModel ──────────────────────────────────────────────────

/// A model that replays queued envelopes and records every call.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Value>>>,
    pub calls: Mutex<Vec<(Vec<ChatMessage>, u32)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a chat-completions style reply.
    pub fn reply(self, text: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(json!({ "choices": [{ "message": { "content": text } }] })));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(ScoutError::Upstream(message.to_string())));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call(&self, idx: usize) -> (Vec<ChatMessage>, u32) {
        self.calls.lock().unwrap()[idx].clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[ChatMessage], max_tokens: u32) -> Result<RawResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), max_tokens));
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(v)) => Ok(RawResponse(v)),
            Some(Err(e)) => Err(e),
            None => Ok(RawResponse(json!({
                "content": [{ "type": "text", "text": "default answer" }]
            }))),
        }
    }
}

// ─── Builders ───────────────────────────────────────────────────────

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn metadata(full_name: &str, stars: u64, open_issues: u64) -> RepoMetadata {
    RepoMetadata {
        full_name: full_name.to_string(),
        url: format!("https://github.com/{}", full_name),
        default_branch: "main".to_string(),
        description: Some("A test repository".to_string()),
        language: Some("TypeScript".to_string()),
        topics: BTreeSet::from(["ui".to_string(), "components".to_string()]),
        stars,
        forks: 4,
        open_issues,
    }
}

pub fn issue(number: u64, title: &str, labels: &[&str]) -> IssueRecord {
    IssueRecord {
        number,
        title: title.to_string(),
        body: Some(format!("Body of issue {}", number)),
        labels: labels.iter().map(|s| s.to_string()).collect(),
        author: "alice".to_string(),
        created_at: t0(),
        comments: 1,
        url: format!("https://github.com/owner/repo/issues/{}", number),
        is_pull_request: false,
    }
}

pub fn pull(number: u64, title: &str, draft: bool) -> PullRecord {
    PullRecord {
        number,
        title: title.to_string(),
        body: Some("PR body".to_string()),
        author: "bob".to_string(),
        created_at: t0(),
        url: format!("https://github.com/owner/repo/pull/{}", number),
        draft,
    }
}

pub fn file(path: &str, size: u64) -> DirEntry {
    DirEntry {
        name: path.rsplit('/').next().unwrap().to_string(),
        path: path.to_string(),
        kind: EntryKind::File,
        size: Some(size),
    }
}

pub fn dir(path: &str) -> DirEntry {
    DirEntry {
        name: path.rsplit('/').next().unwrap().to_string(),
        path: path.to_string(),
        kind: EntryKind::Directory,
        size: None,
    }
}

/// A small component library: a few source files under `src/`.
pub fn component_repo() -> FakeHost {
    let mut host = FakeHost::with_metadata(100, 3);
    host.readme = Some("# Repo\n\nA component library.".to_string());
    host.add_dir(
        "",
        vec![
            file("README.md", 40),
            file("package.json", 300),
            dir("src"),
            dir("node_modules"),
        ],
    );
    host.add_dir(
        "src",
        vec![
            file("src/index.ts", 200),
            file("src/render.ts", 900),
            dir("src/components"),
        ],
    );
    host.add_dir("src/components", vec![file("src/components/Button.tsx", 500)]);
    host.files.insert(
        "src/render.ts".to_string(),
        "export function render() {\n  return 42;\n}\n".to_string(),
    );
    host.files.insert(
        "src/index.ts".to_string(),
        "export * from './render';\n".to_string(),
    );
    host.issues = vec![
        issue(1, "Fix button focus ring", &["good first issue"]),
        issue(2, "Rendering is slow", &["performance"]),
    ];
    host.pulls = vec![pull(10, "Add dark mode", true)];
    host.languages = BTreeMap::from([
        ("TypeScript".to_string(), 900),
        ("CSS".to_string(), 100),
    ]);
    host
}

pub struct Harness {
    pub host: Arc<FakeHost>,
    pub model: Arc<ScriptedModel>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemorySnapshotStore>,
    pub assistant: Assistant,
}

pub fn harness(host: FakeHost, model: ScriptedModel) -> Harness {
    let host = Arc::new(host);
    let model = Arc::new(model);
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(InMemorySnapshotStore::new(clock.clone()));
    let cache = SnapshotCache::new(store.clone(), clock.clone(), 1800);
    let assistant = Assistant::new(host.clone(), cache, model.clone(), ModelLimits::default());
    Harness {
        host,
        model,
        clock,
        store,
        assistant,
    }
}
