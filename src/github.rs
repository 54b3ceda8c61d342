//! GitHub REST client.
//!
//! [`RepoHost`] is the seam between the snapshot builder and the hosting
//! service. [`GithubClient`] implements it over the v3 REST API with a bearer
//! token; tests substitute an in-memory host.
//!
//! # Endpoints
//!
//! | Data | Endpoint |
//! |------|----------|
//! | metadata | `GET /repos/{owner}/{repo}` |
//! | README | `GET /repos/{owner}/{repo}/readme` |
//! | file / directory | `GET /repos/{owner}/{repo}/contents/{path}` |
//! | issues | `GET /repos/{owner}/{repo}/issues?state=open` |
//! | pull requests | `GET /repos/{owner}/{repo}/pulls?state=open` |
//! | languages | `GET /repos/{owner}/{repo}/languages` |
//!
//! File bodies arrive base64-encoded with embedded line breaks and are decoded
//! here, so callers only ever see UTF-8 text.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::config::GithubConfig;
use crate::error::{Result, ScoutError};
use crate::models::{EntryKind, RepoKey, RepoMetadata};

/// Issues and pull requests listed per repository.
const PAGE_SIZE: u32 = 30;

// ═══════════════════════════════════════════════════════════════════════
// Identifier parsing
// ═══════════════════════════════════════════════════════════════════════

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)(?:/.*)?$")
        .expect("valid regex")
});

// Account names never contain dots, so `github.com/foo` cannot read as an owner.
static BARE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_-]+)/([A-Za-z0-9_.-]+)$").expect("valid regex"));

/// Parse a repository identifier into an owner/name pair.
///
/// Accepts `owner/name`, `github.com/owner/name`, and
/// `https://github.com/owner/name`, each with or without a trailing `.git`
/// or slash.
pub fn parse_identifier(input: &str) -> Result<RepoKey> {
    let trimmed = input.trim().trim_end_matches('/');

    let caps = URL_PATTERN
        .captures(trimmed)
        .or_else(|| BARE_PATTERN.captures(trimmed))
        .ok_or_else(|| ScoutError::InvalidIdentifier(input.to_string()))?;

    let owner = &caps[1];
    let name = caps[2].strip_suffix(".git").unwrap_or(&caps[2]);

    if owner.is_empty() || name.is_empty() || name == "." || name == ".." {
        return Err(ScoutError::InvalidIdentifier(input.to_string()));
    }

    Ok(RepoKey::new(owner, name))
}

// ═══════════════════════════════════════════════════════════════════════
// RepoHost trait
// ═══════════════════════════════════════════════════════════════════════

/// One entry of a single-level directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

/// An item from the issue listing. The hosting service returns pull requests
/// through the same endpoint; `is_pull_request` marks them.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub comments: u64,
    pub url: String,
    pub is_pull_request: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PullRecord {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub url: String,
    pub draft: bool,
}

/// Read-only access to a repository on the hosting service.
///
/// Each method is one bounded network call with no retries. Optional
/// documents that do not exist are `Ok(None)`; everything else that goes
/// wrong is an `Err`, which the snapshot builder decides whether to absorb.
#[async_trait]
pub trait RepoHost: Send + Sync {
    async fn metadata(&self, repo: &RepoKey) -> Result<RepoMetadata>;

    /// Decoded README text, if the repository has one.
    async fn readme(&self, repo: &RepoKey) -> Result<Option<String>>;

    /// Decoded body of the file at `path`, if it exists.
    async fn file_content(&self, repo: &RepoKey, path: &str) -> Result<Option<String>>;

    /// Single-level listing of `path` (`""` is the repository root).
    async fn list_dir(&self, repo: &RepoKey, path: &str) -> Result<Vec<DirEntry>>;

    async fn open_issues(&self, repo: &RepoKey) -> Result<Vec<IssueRecord>>;

    async fn open_pulls(&self, repo: &RepoKey) -> Result<Vec<PullRecord>>;

    /// Language name to byte count.
    async fn languages(&self, repo: &RepoKey) -> Result<BTreeMap<String, u64>>;
}

// ═══════════════════════════════════════════════════════════════════════
// GithubClient
// ═══════════════════════════════════════════════════════════════════════

/// [`RepoHost`] backed by the GitHub REST API.
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    user_agent: String,
}

impl GithubClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::MissingCredential`] if the token variable is
    /// unset, before any request is attempted.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let token = config.token()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
            user_agent: config.user_agent.clone(),
        })
    }

    fn repo_url(&self, repo: &RepoKey, tail: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| ScoutError::Upstream(format!("bad api_base: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ScoutError::Upstream("api_base cannot be a base URL".to_string()))?;
            segments.pop_if_empty();
            segments.extend(["repos", repo.owner.as_str(), repo.name.as_str()]);
            for part in tail {
                segments.extend(part.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    /// GET a JSON document; HTTP 404 maps to `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let response = self
            .http
            .get(url.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoutError::Upstream(format!(
                "GitHub API error {} for {}: {}",
                status,
                url.path(),
                truncate_error(&body)
            )));
        }

        Ok(Some(response.json::<T>().await?))
    }

    async fn get_content(&self, url: Url) -> Result<Option<String>> {
        // Directories come back as arrays; treat anything else as a file object.
        let value: Option<serde_json::Value> = self.get_json(url).await?;
        let Some(value) = value else {
            return Ok(None);
        };
        if value.is_array() {
            return Ok(None);
        }
        let file: ApiContent = serde_json::from_value(value)
            .map_err(|e| ScoutError::Upstream(format!("unexpected contents payload: {}", e)))?;
        file.decode().map(Some)
    }
}

#[async_trait]
impl RepoHost for GithubClient {
    async fn metadata(&self, repo: &RepoKey) -> Result<RepoMetadata> {
        let url = self.repo_url(repo, &[])?;
        let api: ApiRepo =
            self.get_json(url)
                .await?
                .ok_or_else(|| ScoutError::RepositoryUnavailable {
                    repo: repo.to_string(),
                    reason: "not found".to_string(),
                })?;
        Ok(api.into_metadata())
    }

    async fn readme(&self, repo: &RepoKey) -> Result<Option<String>> {
        let url = self.repo_url(repo, &["readme"])?;
        self.get_content(url).await
    }

    async fn file_content(&self, repo: &RepoKey, path: &str) -> Result<Option<String>> {
        let url = self.repo_url(repo, &["contents", path])?;
        self.get_content(url).await
    }

    async fn list_dir(&self, repo: &RepoKey, path: &str) -> Result<Vec<DirEntry>> {
        let url = self.repo_url(repo, &["contents", path])?;
        let items: Option<Vec<ApiDirItem>> = self.get_json(url).await?;
        Ok(items
            .unwrap_or_default()
            .into_iter()
            .filter_map(ApiDirItem::into_entry)
            .collect())
    }

    async fn open_issues(&self, repo: &RepoKey) -> Result<Vec<IssueRecord>> {
        let mut url = self.repo_url(repo, &["issues"])?;
        list_query(&mut url);
        let items: Option<Vec<ApiIssue>> = self.get_json(url).await?;
        Ok(items
            .unwrap_or_default()
            .into_iter()
            .map(ApiIssue::into_record)
            .collect())
    }

    async fn open_pulls(&self, repo: &RepoKey) -> Result<Vec<PullRecord>> {
        let mut url = self.repo_url(repo, &["pulls"])?;
        list_query(&mut url);
        let items: Option<Vec<ApiPull>> = self.get_json(url).await?;
        Ok(items
            .unwrap_or_default()
            .into_iter()
            .map(ApiPull::into_record)
            .collect())
    }

    async fn languages(&self, repo: &RepoKey) -> Result<BTreeMap<String, u64>> {
        let url = self.repo_url(repo, &["languages"])?;
        Ok(self.get_json(url).await?.unwrap_or_default())
    }
}

fn list_query(url: &mut Url) {
    url.query_pairs_mut()
        .append_pair("state", "open")
        .append_pair("sort", "created")
        .append_pair("direction", "desc")
        .append_pair("per_page", &PAGE_SIZE.to_string());
}

fn truncate_error(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}... (truncated)", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

/// Decode a base64 content payload, ignoring embedded whitespace.
pub fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ScoutError::Upstream(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes).map_err(|_| ScoutError::Upstream("content is not UTF-8".to_string()))
}

// ============ Wire types ============

#[derive(Deserialize)]
struct ApiOwner {
    login: String,
}

#[derive(Deserialize)]
struct ApiRepo {
    full_name: String,
    html_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    description: Option<String>,
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    open_issues_count: u64,
}

impl ApiRepo {
    fn into_metadata(self) -> RepoMetadata {
        RepoMetadata {
            full_name: self.full_name,
            url: self.html_url,
            default_branch: self.default_branch.unwrap_or_else(|| "main".to_string()),
            description: self.description,
            language: self.language,
            topics: self.topics.into_iter().collect::<BTreeSet<_>>(),
            stars: self.stargazers_count,
            forks: self.forks_count,
            open_issues: self.open_issues_count,
        }
    }
}

#[derive(Deserialize)]
struct ApiContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

impl ApiContent {
    fn decode(self) -> Result<String> {
        let content = self.content.unwrap_or_default();
        match self.encoding.as_deref() {
            Some("base64") => decode_content(&content),
            Some("none") | None if content.is_empty() => Err(ScoutError::Upstream(
                "file too large for the contents API".to_string(),
            )),
            _ => Ok(content),
        }
    }
}

#[derive(Deserialize)]
struct ApiDirItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

impl ApiDirItem {
    fn into_entry(self) -> Option<DirEntry> {
        let kind = match self.kind.as_str() {
            "file" => EntryKind::File,
            "dir" => EntryKind::Directory,
            // symlinks and submodules are not part of the tree
            _ => return None,
        };
        let size = match kind {
            EntryKind::File => self.size,
            EntryKind::Directory => None,
        };
        Some(DirEntry {
            name: self.name,
            path: self.path,
            kind,
            size,
        })
    }
}

#[derive(Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    user: Option<ApiOwner>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    comments: u64,
    html_url: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl ApiIssue {
    fn into_record(self) -> IssueRecord {
        IssueRecord {
            number: self.number,
            title: self.title,
            body: self.body,
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            author: self.user.map(|u| u.login).unwrap_or_else(|| "ghost".to_string()),
            created_at: self.created_at,
            comments: self.comments,
            url: self.html_url,
            is_pull_request: self.pull_request.is_some(),
        }
    }
}

#[derive(Deserialize)]
struct ApiPull {
    number: u64,
    title: String,
    body: Option<String>,
    user: Option<ApiOwner>,
    created_at: DateTime<Utc>,
    html_url: String,
    #[serde(default)]
    draft: bool,
}

impl ApiPull {
    fn into_record(self) -> PullRecord {
        PullRecord {
            number: self.number,
            title: self.title,
            body: self.body,
            author: self.user.map(|u| u.login).unwrap_or_else(|| "ghost".to_string()),
            created_at: self.created_at,
            url: self.html_url,
            draft: self.draft,
        }
    }
}
