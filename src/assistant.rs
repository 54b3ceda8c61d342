//! Per-question orchestration.
//!
//! ```text
//! LoadSnapshot ─▶ (Rebuild) ─▶ RouteQuery ─▶ (FetchFiles) ─▶ AssembleContext ─▶ GenerateAnswer
//!                    │
//!                    └─ failure: access-failure answer, later stages skipped
//! ```
//!
//! Collaborators (repository host, snapshot store, clock, model) are injected
//! at construction so tests can run the whole pipeline in memory.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::answer::generate_answer;
use crate::cache::{
    Clock, InMemorySnapshotStore, Lookup, SnapshotCache, SnapshotStore, SqliteSnapshotStore,
    SystemClock,
};
use crate::config::Config;
use crate::context::assemble_context;
use crate::error::{Result, ScoutError};
use crate::github::{parse_identifier, GithubClient, RepoHost};
use crate::llm::{create_model, LanguageModel};
use crate::models::{IndexStats, RepoKey, RepositorySnapshot, ThinkingStep};
use crate::router::{route_query, RouteTier};
use crate::snapshot::SnapshotBuilder;
use crate::trace::{
    Trace, STEP_ANSWER, STEP_CONTEXT, STEP_FETCH, STEP_LOAD, STEP_REBUILD, STEP_ROUTE,
};

/// Token ceilings for the two model calls.
#[derive(Debug, Clone, Copy)]
pub struct ModelLimits {
    pub routing_max_tokens: u32,
    pub answer_max_tokens: u32,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            routing_max_tokens: 512,
            answer_max_tokens: 2048,
        }
    }
}

/// Result of indexing a repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOutcome {
    pub repo: String,
    pub indexed_at: DateTime<Utc>,
    pub stats: IndexStats,
}

/// Result of asking a question.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskOutcome {
    pub answer: String,
    pub steps: Vec<ThinkingStep>,
    /// Paths whose bodies were included in the context.
    pub files_used: Vec<String>,
}

/// Cached state of one repository.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutcome {
    pub repo: String,
    pub indexed: bool,
    pub fresh: bool,
    pub indexed_at: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
    pub stats: Option<IndexStats>,
}

pub struct Assistant {
    builder: SnapshotBuilder,
    cache: SnapshotCache,
    model: Arc<dyn LanguageModel>,
    limits: ModelLimits,
}

impl Assistant {
    pub fn new(
        host: Arc<dyn RepoHost>,
        cache: SnapshotCache,
        model: Arc<dyn LanguageModel>,
        limits: ModelLimits,
    ) -> Self {
        Self {
            builder: SnapshotBuilder::with_clock(host, cache.clock()),
            cache,
            model,
            limits,
        }
    }

    /// Wire up the production collaborators named by `config`.
    ///
    /// Fails immediately if the GitHub or model credential is missing.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let host: Arc<dyn RepoHost> = Arc::new(GithubClient::new(&config.github)?);
        let model: Arc<dyn LanguageModel> = Arc::from(create_model(&config.llm)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store: Arc<dyn SnapshotStore> = match config.cache.backend.as_str() {
            "sqlite" => {
                let path = config
                    .cache
                    .path
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("cache.path required for sqlite backend"))?;
                Arc::new(SqliteSnapshotStore::connect(path, clock.clone()).await?)
            }
            _ => Arc::new(InMemorySnapshotStore::new(clock.clone())),
        };

        let cache = SnapshotCache::new(store, clock, config.cache.ttl_secs);
        let limits = ModelLimits {
            routing_max_tokens: config.llm.routing_max_tokens,
            answer_max_tokens: config.llm.answer_max_tokens,
        };
        Ok(Self::new(host, cache, model, limits))
    }

    /// Build a fresh snapshot and cache it, replacing any prior entry.
    pub async fn index(&self, url: &str) -> Result<IndexOutcome> {
        let repo = parse_identifier(url)?;
        let snapshot = self.builder.build(&repo).await?;
        self.cache.store(&snapshot).await?;
        Ok(IndexOutcome {
            repo: repo.to_string(),
            indexed_at: snapshot.indexed_at,
            stats: snapshot.stats(),
        })
    }

    /// Report what the cache holds for `url` without fetching anything.
    pub async fn status(&self, url: &str) -> Result<StatusOutcome> {
        let repo = parse_identifier(url)?;
        let (snapshot, fresh) = match self.cache.lookup(&repo).await {
            Lookup::Fresh(s) => (Some(s), true),
            Lookup::Stale(s) => (Some(s), false),
            Lookup::Missing => (None, false),
        };
        let now = self.cache.now();
        Ok(StatusOutcome {
            repo: repo.to_string(),
            indexed: snapshot.is_some(),
            fresh,
            indexed_at: snapshot.as_ref().map(|s| s.indexed_at),
            age_secs: snapshot.as_ref().map(|s| (now - s.indexed_at).num_seconds()),
            stats: snapshot.as_ref().map(|s| s.stats()),
        })
    }

    /// Answer `question` about the repository at `url`.
    ///
    /// Only a malformed identifier is an `Err`. An unreachable repository
    /// yields an access-failure answer with the trace up to that point.
    pub async fn ask(&self, url: &str, question: &str) -> Result<AskOutcome> {
        let repo = parse_identifier(url)?;
        let mut trace = Trace::new();

        let snapshot = match self.load_or_rebuild(&repo, &mut trace).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return Ok(AskOutcome {
                    answer: e.user_message(),
                    steps: trace.into_steps(),
                    files_used: Vec::new(),
                });
            }
        };

        let routed = route_query(
            question,
            &snapshot,
            self.model.as_ref(),
            self.limits.routing_max_tokens,
        )
        .await;
        trace.complete(STEP_ROUTE, route_detail(routed.tier, &routed.decision.files));

        let files = if routed.decision.needs_files {
            let files = self
                .builder
                .fetch_file_bodies(&repo, &routed.decision.files)
                .await;
            let fetched: Vec<&str> = files.keys().map(|k| k.as_str()).collect();
            trace.complete(
                STEP_FETCH,
                format!(
                    "Fetched {} of {} requested files: {}",
                    files.len(),
                    routed.decision.files.len(),
                    if fetched.is_empty() {
                        "none".to_string()
                    } else {
                        fetched.join(", ")
                    }
                ),
            );
            files
        } else {
            BTreeMap::new()
        };

        let context = assemble_context(&snapshot, &files);
        trace.complete(
            STEP_CONTEXT,
            format!(
                "{} characters from {} issues, {} pull requests, {} files",
                context.chars().count(),
                snapshot.issues.len(),
                snapshot.pull_requests.len(),
                files.len()
            ),
        );

        let answer = generate_answer(
            self.model.as_ref(),
            &context,
            question,
            self.limits.answer_max_tokens,
        )
        .await;
        trace.complete(STEP_ANSWER, format!("Answered with {}", self.model.model_name()));

        Ok(AskOutcome {
            answer,
            steps: trace.into_steps(),
            files_used: files.into_keys().collect(),
        })
    }

    async fn load_or_rebuild(
        &self,
        repo: &RepoKey,
        trace: &mut Trace,
    ) -> Result<RepositorySnapshot> {
        if let Some(snapshot) = self.cache.load_fresh(repo).await {
            let age = (self.cache.now() - snapshot.indexed_at).num_seconds();
            tracing::debug!(repo = %repo, age_secs = age, "snapshot cache hit");
            trace.complete(
                STEP_LOAD,
                format!("Using cached index of {} ({}s old)", repo, age),
            );
            return Ok(snapshot);
        }

        tracing::debug!(repo = %repo, "snapshot cache miss or expired");
        trace.complete(STEP_LOAD, format!("No fresh index cached for {}", repo));

        match self.builder.build(repo).await {
            Ok(snapshot) => {
                if let Err(e) = self.cache.store(&snapshot).await {
                    tracing::warn!(repo = %repo, error = %e, "failed to cache rebuilt snapshot");
                }
                let stats = snapshot.stats();
                trace.complete(
                    STEP_REBUILD,
                    format!(
                        "Indexed {} files, {} issues, {} pull requests",
                        stats.files, stats.issues, stats.pull_requests
                    ),
                );
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!(repo = %repo, error = %e, "rebuild failed");
                trace.fail(STEP_REBUILD, e.to_string());
                Err(match e {
                    ScoutError::RepositoryUnavailable { .. } => e,
                    other => ScoutError::RepositoryUnavailable {
                        repo: repo.to_string(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}

fn route_detail(tier: RouteTier, files: &[String]) -> String {
    match tier {
        RouteTier::IssueIntent => "Issue and pull request data is enough; no files needed".to_string(),
        RouteTier::NoCodeSignal => "Repository overview is enough; no files needed".to_string(),
        RouteTier::EmptyTree => "No files indexed to inspect".to_string(),
        RouteTier::Model if files.is_empty() => "Model decided no files are needed".to_string(),
        RouteTier::Model => format!("Selected files: {}", files.join(", ")),
        RouteTier::ModelFallback => "Could not decide on files; answering without them".to_string(),
    }
}
