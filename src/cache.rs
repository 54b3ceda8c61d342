//! Snapshot cache.
//!
//! [`SnapshotStore`] is a plain key/value store with a backstop TTL; it does
//! not judge staleness. [`SnapshotCache`] layers the freshness policy on top:
//! a snapshot is usable while `now - indexed_at < ttl`, and anything older is
//! treated as a miss. Concurrent rebuilds of the same repository are not
//! deduplicated; the last `put` wins.
//!
//! Two stores are provided:
//! - **[`InMemorySnapshotStore`]**: process-local, used by default and in tests.
//! - **[`SqliteSnapshotStore`]**: survives restarts; one row per repository.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Result, ScoutError};
use crate::models::{RepoKey, RepositorySnapshot};

// ═══════════════════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════════════════

/// Source of "now", injectable so expiry can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SnapshotStore trait
// ═══════════════════════════════════════════════════════════════════════

/// Key/value persistence for snapshots, keyed by repository.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the stored snapshot regardless of its age, unless the backstop
    /// TTL has evicted it.
    async fn get(&self, key: &str) -> Result<Option<RepositorySnapshot>>;

    /// Replaces any existing entry and resets the backstop expiry.
    async fn put(&self, key: &str, snapshot: &RepositorySnapshot, ttl_secs: u64) -> Result<()>;
}

/// `ttl_secs` as a duration, or `None` if it exceeds chrono's range.
fn ttl_duration(ttl_secs: u64) -> Option<Duration> {
    i64::try_from(ttl_secs).ok().and_then(Duration::try_seconds)
}

/// `now + ttl_secs`, saturating at the latest representable instant.
fn expiry(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    ttl_duration(ttl_secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============ In-memory store ============

struct StoredEntry {
    snapshot: RepositorySnapshot,
    expires_at: DateTime<Utc>,
}

pub struct InMemorySnapshotStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemorySnapshotStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<RepositorySnapshot>> {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ScoutError::Store("snapshot store lock poisoned".to_string()))?;

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.snapshot.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, snapshot: &RepositorySnapshot, ttl_secs: u64) -> Result<()> {
        let now = self.clock.now();
        let expires_at = expiry(now, ttl_secs);
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ScoutError::Store("snapshot store lock poisoned".to_string()))?;
        // entries for repositories nobody asks about again are dropped here
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            StoredEntry {
                snapshot: snapshot.clone(),
                expires_at,
            },
        );
        Ok(())
    }
}

// ============ SQLite store ============

/// Snapshot store persisted as JSON rows in SQLite.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteSnapshotStore {
    /// Open (creating if needed) the database at `path` and ensure the table exists.
    pub async fn connect(path: &Path, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                repo_key TEXT PRIMARY KEY,
                snapshot_json TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, clock })
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<RepositorySnapshot>> {
        let now = self.clock.now().timestamp();
        let row = sqlx::query("SELECT snapshot_json, expires_at FROM snapshots WHERE repo_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: i64 = row.get("expires_at");
        if expires_at <= now {
            sqlx::query("DELETE FROM snapshots WHERE repo_key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        let json: String = row.get("snapshot_json");
        Ok(Some(serde_json::from_str(&json)?))
    }

    async fn put(&self, key: &str, snapshot: &RepositorySnapshot, ttl_secs: u64) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        let expires_at = expiry(self.clock.now(), ttl_secs).timestamp();

        sqlx::query(
            r#"
            INSERT INTO snapshots (repo_key, snapshot_json, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(repo_key) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(json)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Freshness policy
// ═══════════════════════════════════════════════════════════════════════

/// Result of looking a repository up in the cache.
#[derive(Debug, Clone)]
pub enum Lookup {
    Fresh(RepositorySnapshot),
    Stale(RepositorySnapshot),
    Missing,
}

/// Freshness policy over a [`SnapshotStore`].
#[derive(Clone)]
pub struct SnapshotCache {
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            store,
            clock,
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn is_fresh(&self, snapshot: &RepositorySnapshot) -> bool {
        let age = self.clock.now() - snapshot.indexed_at;
        match ttl_duration(self.ttl_secs) {
            Some(ttl) => age < ttl,
            None => true,
        }
    }

    /// Look `repo` up and classify it. Store errors read as a miss.
    pub async fn lookup(&self, repo: &RepoKey) -> Lookup {
        match self.store.get(&repo.cache_key()).await {
            Ok(Some(snapshot)) if self.is_fresh(&snapshot) => Lookup::Fresh(snapshot),
            Ok(Some(snapshot)) => Lookup::Stale(snapshot),
            Ok(None) => Lookup::Missing,
            Err(e) => {
                tracing::warn!(repo = %repo, error = %e, "snapshot store read failed");
                Lookup::Missing
            }
        }
    }

    /// The cached snapshot if it is still fresh.
    pub async fn load_fresh(&self, repo: &RepoKey) -> Option<RepositorySnapshot> {
        match self.lookup(repo).await {
            Lookup::Fresh(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Store `snapshot`, replacing any prior entry for its repository.
    pub async fn store(&self, snapshot: &RepositorySnapshot) -> Result<()> {
        self.store
            .put(&snapshot.key.cache_key(), snapshot, self.ttl_secs)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepoMetadata;
    use std::collections::{BTreeMap, BTreeSet};

    fn snapshot_at(at: DateTime<Utc>) -> RepositorySnapshot {
        RepositorySnapshot {
            key: RepoKey::new("o", "r"),
            metadata: RepoMetadata {
                full_name: "o/r".to_string(),
                url: "https://github.com/o/r".to_string(),
                default_branch: "main".to_string(),
                description: None,
                language: None,
                topics: BTreeSet::new(),
                stars: 0,
                forks: 0,
                open_issues: 0,
            },
            languages: BTreeMap::new(),
            readme: None,
            contributing: None,
            file_tree: vec![],
            issues: vec![],
            pull_requests: vec![],
            indexed_at: at,
        }
    }

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn in_memory_backstop_evicts() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = InMemorySnapshotStore::new(clock.clone());
        store.put("o/r", &snapshot_at(start()), 60).await.unwrap();

        clock.advance(Duration::seconds(59));
        assert!(store.get("o/r").await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get("o/r").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = InMemorySnapshotStore::new(clock.clone());
        store.put("o/r", &snapshot_at(start()), 60).await.unwrap();
        let later = start() + Duration::seconds(30);
        store.put("o/r", &snapshot_at(later), 60).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("o/r").await.unwrap().unwrap().indexed_at, later);
    }

    #[tokio::test]
    async fn put_sweeps_expired_entries_of_other_repositories() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = InMemorySnapshotStore::new(clock.clone());
        store.put("a/one", &snapshot_at(start()), 60).await.unwrap();
        store.put("b/two", &snapshot_at(start()), 600).await.unwrap();

        clock.advance(Duration::seconds(120));
        store.put("c/three", &snapshot_at(start()), 60).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("b/two").await.unwrap().is_some());
        assert!(store.get("a/one").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn huge_ttl_saturates_instead_of_panicking() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(InMemorySnapshotStore::new(clock.clone()));
        let cache = SnapshotCache::new(store.clone(), clock.clone(), u64::MAX);
        store.put("o/r", &snapshot_at(start()), u64::MAX).await.unwrap();

        clock.advance(Duration::days(3650));
        assert!(cache.load_fresh(&RepoKey::new("o", "r")).await.is_some());
        assert_eq!(expiry(start(), i64::MAX as u64), DateTime::<Utc>::MAX_UTC);
    }

    #[tokio::test]
    async fn freshness_boundary() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(InMemorySnapshotStore::new(clock.clone()));
        let cache = SnapshotCache::new(store, clock.clone(), 1800);
        let key = RepoKey::new("o", "r");
        cache.store(&snapshot_at(start())).await.unwrap();

        clock.advance(Duration::seconds(1799));
        assert!(matches!(cache.lookup(&key).await, Lookup::Fresh(_)));

        clock.set(start() + Duration::seconds(1800));
        assert!(cache.load_fresh(&key).await.is_none());
    }

    #[tokio::test]
    async fn stale_entry_still_readable_before_backstop() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(InMemorySnapshotStore::new(clock.clone()));
        let cache = SnapshotCache::new(store.clone(), clock.clone(), 1800);
        // snapshot assembled long before it was stored
        store
            .put("o/r", &snapshot_at(start() - Duration::hours(2)), 1800)
            .await
            .unwrap();

        assert!(matches!(
            cache.lookup(&RepoKey::new("o", "r")).await,
            Lookup::Stale(_)
        ));
    }

    #[tokio::test]
    async fn sqlite_store_round_trip_and_expiry() {
        let tmp = tempfile::TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let store = SqliteSnapshotStore::connect(&tmp.path().join("cache.sqlite"), clock.clone())
            .await
            .unwrap();

        store.put("o/r", &snapshot_at(start()), 100).await.unwrap();
        let loaded = store.get("o/r").await.unwrap().unwrap();
        assert_eq!(loaded.key, RepoKey::new("o", "r"));

        clock.advance(Duration::seconds(100));
        assert!(store.get("o/r").await.unwrap().is_none());
    }
}
