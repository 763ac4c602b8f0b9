//! SQLite connections: user databases and the ingestion store.
//!
//! User databases are addressed by connection strings. Besides sqlx's own
//! `sqlite:` forms, the URL form `sqlite:///relative.db` and
//! `sqlite:////absolute/path.db` is accepted, so strings written for other
//! tooling work unchanged. One lazily connected pool is kept per distinct
//! connection string.

use anyhow::{bail, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::PoolConfig;

/// Where a connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Memory,
    File(PathBuf),
}

/// Parse a SQLite connection string into a target.
///
/// | Input                     | Target            |
/// |---------------------------|-------------------|
/// | `sqlite::memory:`         | in-memory         |
/// | `sqlite:////abs/x.db`     | `/abs/x.db`       |
/// | `sqlite:///rel/x.db`      | `rel/x.db`        |
/// | `sqlite://x.db`           | `x.db`            |
/// | `sqlite:x.db`             | `x.db`            |
pub fn parse_target(connection_string: &str) -> Result<Target> {
    let cs = connection_string.trim();
    let Some(rest) = cs.strip_prefix("sqlite:") else {
        match cs.split_once("://") {
            Some((scheme, _)) => bail!(
                "unsupported database scheme '{}': only sqlite connection strings are supported",
                scheme
            ),
            None => bail!("invalid connection string '{}'", cs),
        }
    };
    // Drop URL query parameters such as `?mode=ro`.
    let rest = rest.split('?').next().unwrap_or_default();

    if rest == ":memory:" || rest == "//:memory:" {
        return Ok(Target::Memory);
    }
    let path = if let Some(abs) = rest.strip_prefix("////") {
        format!("/{abs}")
    } else if let Some(rel) = rest.strip_prefix("///") {
        rel.to_string()
    } else if let Some(p) = rest.strip_prefix("//") {
        p.to_string()
    } else {
        rest.to_string()
    };
    if path.is_empty() {
        bail!("connection string '{}' names no database file", cs);
    }
    Ok(Target::File(PathBuf::from(path)))
}

/// Connect options for an existing user database. Never creates files.
pub fn connect_options(connection_string: &str) -> Result<SqliteConnectOptions> {
    Ok(match parse_target(connection_string)? {
        Target::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
        Target::File(path) => SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false),
    })
}

/// One pool per distinct connection string, created on first use.
///
/// Pools connect lazily, so creating one never blocks and the registry
/// lock is never held across an await. Each pool holds at most
/// `size + max_overflow` connections; callers wait up to the acquire
/// timeout when all are busy.
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, SqlitePool>>,
    settings: PoolConfig,
}

impl PoolRegistry {
    pub fn new(settings: PoolConfig) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn get(&self, connection_string: &str) -> Result<SqlitePool> {
        let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pool) = pools.get(connection_string) {
            return Ok(pool.clone());
        }

        let options = connect_options(connection_string)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(self.settings.size + self.settings.max_overflow)
            .acquire_timeout(Duration::from_secs(self.settings.acquire_timeout_secs))
            .connect_lazy_with(options);
        tracing::debug!(connection = connection_string, "created pool");
        pools.insert(connection_string.to_string(), pool.clone());
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.pools.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Open (and create if needed) the ingestion store for writing.
pub async fn connect_store(path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Read-only pool over an existing ingestion store, or `None` if the file
/// does not exist yet. The ingestion writer keeps appending concurrently.
pub async fn open_store(path: &Path) -> Result<Option<SqlitePool>> {
    if !path.exists() {
        return Ok(None);
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;
    Ok(Some(pool))
}
