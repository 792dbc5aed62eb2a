//! The SQLite database behind the identity and audit stores.
//!
//! One file holds both tables. It is opened in WAL mode so the audit writer
//! and enrollment commands never block the recognition loop's reads for
//! long, and the schema in the workspace `migrations/` directory is applied
//! on open.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Where the database lives when nothing else is configured.
pub const DEFAULT_DATABASE_PATH: &str = "facegate.db";

/// How to open the database.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Database file. Missing parent directories are created.
    pub database_path: String,

    pub max_connections: u32,

    /// Upper bound on waiting for a pooled connection.
    pub acquire_timeout: Duration,

    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,

    pub create_if_missing: bool,

    /// Apply pending migrations on open.
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", self.database_path))
            .map_err(|e| self.path_error(e))?;

        Ok(options
            .create_if_missing(self.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging())
    }

    fn prepare_directory(&self) -> StorageResult<()> {
        match Path::new(&self.database_path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                std::fs::create_dir_all(parent).map_err(|e| self.path_error(e))
            }
            _ => Ok(()),
        }
    }

    fn path_error(&self, reason: impl std::fmt::Display) -> StorageError {
        StorageError::Path {
            path: self.database_path.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Pooled handle to the facegate database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database described by `config`, migrating it unless
    /// `auto_migrate` is off.
    ///
    /// # Errors
    ///
    /// [`StorageError::Path`] when the file cannot be placed at the
    /// configured path, and database or migration errors otherwise. The
    /// door controller treats all of them as fatal at startup.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use facegate_storage::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::new(DatabaseConfig::new("/var/lib/facegate/facegate.db")).await?;
    /// db.health_check().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        config.prepare_directory()?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options()?)
            .await?;
        let db = Self { pool };

        if config.auto_migrate {
            db.migrate().await?;
        }

        info!(path = %config.database_path, "Database opened");
        Ok(db)
    }

    /// A private in-memory database with the schema applied.
    pub async fn in_memory() -> StorageResult<Self> {
        // A second connection would see a different, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply the migrations embedded from the workspace `migrations/`
    /// directory. Already applied migrations are skipped.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        debug!("Database schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
