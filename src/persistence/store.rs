//! SQLite-based cache backend

use crate::core::PipelineScope;
use crate::persistence::{CacheEntry, CacheError, LocalCache, MAX_INIT_ATTEMPTS};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Schema version stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

const MEMORY_PATH: &str = ":memory:";

/// SQLite cache store
///
/// The database is opened by [`LocalCache::init`], not by the constructor, so
/// a broken file can be recovered from before anything reads it.
pub struct SqliteCache {
    db_path: PathBuf,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteCache {
    /// Create a cache backed by the given file (or `:memory:`)
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            pool: RwLock::new(None),
        }
    }

    /// Create cache with default path
    pub fn with_default_path() -> Result<Self, CacheError> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        let db_dir = data_dir.join("pipeline-studio");
        std::fs::create_dir_all(&db_dir).map_err(|e| CacheError::backend("Failed to create cache directory", e))?;

        Ok(Self::new(db_dir.join("cache.db")))
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn is_memory(&self) -> bool {
        self.db_path.as_os_str() == MEMORY_PATH
    }

    async fn connect(&self) -> Result<SqlitePool, CacheError> {
        let options = if self.is_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| CacheError::backend("Invalid database URL", e))?
        } else {
            SqliteConnectOptions::new().filename(&self.db_path).create_if_missing(true)
        };

        // An in-memory database lives exactly as long as its only connection
        let pool_options = if self.is_memory() {
            SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        pool_options
            .connect_with(options)
            .await
            .map_err(|e| CacheError::backend("Failed to connect to database", e))
    }

    /// Bring the schema to [`SCHEMA_VERSION`]
    async fn migrate(pool: &SqlitePool) -> Result<(), CacheError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(|e| CacheError::backend("Failed to read schema version", e))?;

        if version > SCHEMA_VERSION {
            return Err(CacheError::SchemaDowngrade {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        if version < SCHEMA_VERSION {
            debug!("Upgrading cache schema from version {} to {}", version, SCHEMA_VERSION);
            sqlx::query("DROP TABLE IF EXISTS pipeline_cache")
                .execute(pool)
                .await
                .map_err(|e| CacheError::backend("Failed to drop stale table", e))?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_cache (
                account_id TEXT NOT NULL,
                org_identifier TEXT NOT NULL,
                project_identifier TEXT NOT NULL,
                pipeline_identifier TEXT NOT NULL,
                repo_identifier TEXT NOT NULL,
                branch TEXT NOT NULL,
                entry TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (
                    account_id, org_identifier, project_identifier,
                    pipeline_identifier, repo_identifier, branch
                )
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| CacheError::backend("Failed to create table", e))?;

        if version < SCHEMA_VERSION {
            sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
                .execute(pool)
                .await
                .map_err(|e| CacheError::backend("Failed to write schema version", e))?;
        }

        Ok(())
    }

    async fn open(&self) -> Result<SqlitePool, CacheError> {
        let pool = self.connect().await?;
        match Self::migrate(&pool).await {
            Ok(()) => Ok(pool),
            Err(err) => {
                pool.close().await;
                Err(err)
            }
        }
    }

    /// Delete the database file and its journal side files
    async fn remove_database_files(&self) {
        if self.is_memory() {
            return;
        }

        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut path = self.db_path.clone().into_os_string();
            path.push(suffix);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            }
        }
    }

    async fn pool(&self) -> Result<SqlitePool, CacheError> {
        self.pool.read().await.clone().ok_or(CacheError::NotInitialized)
    }
}

#[async_trait::async_trait]
impl LocalCache for SqliteCache {
    async fn init(&self) -> Result<(), CacheError> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let mut last_error = String::new();
        for attempt in 1..=MAX_INIT_ATTEMPTS {
            match self.open().await {
                Ok(pool) => {
                    info!("Opened local cache at {}", self.db_path.display());
                    *slot = Some(pool);
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        "Local cache init attempt {}/{} failed: {}",
                        attempt, MAX_INIT_ATTEMPTS, err
                    );
                    last_error = err.to_string();
                    self.remove_database_files().await;
                }
            }
        }

        Err(CacheError::InitFailed {
            attempts: MAX_INIT_ATTEMPTS,
            reason: last_error,
        })
    }

    async fn get(&self, key: &PipelineScope) -> Result<Option<CacheEntry>, CacheError> {
        let pool = self.pool().await?;
        let entry: Option<String> = sqlx::query_scalar(
            r#"
            SELECT entry FROM pipeline_cache
            WHERE account_id = ?1 AND org_identifier = ?2 AND project_identifier = ?3
              AND pipeline_identifier = ?4 AND repo_identifier = ?5 AND branch = ?6
            "#,
        )
        .bind(&key.account_id)
        .bind(&key.org_identifier)
        .bind(&key.project_identifier)
        .bind(&key.pipeline_identifier)
        .bind(&key.repo_identifier)
        .bind(&key.branch)
        .fetch_optional(&pool)
        .await
        .map_err(|e| CacheError::backend("Failed to load cache entry", e))?;

        match entry {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let pool = self.pool().await?;
        let json = serde_json::to_string(entry)?;
        let key = &entry.key;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO pipeline_cache
            (account_id, org_identifier, project_identifier, pipeline_identifier, repo_identifier, branch, entry, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&key.account_id)
        .bind(&key.org_identifier)
        .bind(&key.project_identifier)
        .bind(&key.pipeline_identifier)
        .bind(&key.repo_identifier)
        .bind(&key.branch)
        .bind(json)
        .bind(entry.updated_at)
        .execute(&pool)
        .await
        .map_err(|e| CacheError::backend("Failed to save cache entry", e))?;

        Ok(())
    }

    async fn delete(&self, key: &PipelineScope) -> Result<(), CacheError> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            DELETE FROM pipeline_cache
            WHERE account_id = ?1 AND org_identifier = ?2 AND project_identifier = ?3
              AND pipeline_identifier = ?4 AND repo_identifier = ?5 AND branch = ?6
            "#,
        )
        .bind(&key.account_id)
        .bind(&key.org_identifier)
        .bind(&key.project_identifier)
        .bind(&key.pipeline_identifier)
        .bind(&key.repo_identifier)
        .bind(&key.branch)
        .execute(&pool)
        .await
        .map_err(|e| CacheError::backend("Failed to delete cache entry", e))?;

        Ok(())
    }
}
