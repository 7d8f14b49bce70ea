//! Process-wide cache of open SQLite connections.
//!
//! Every physical collection lives in `<data_dir>/<db_name>.sqlite3`. The
//! on-disk schema version is SQLite's `user_version` pragma. Opening a
//! database at a higher version than it carries runs the upgrade hook inside
//! one `IMMEDIATE` transaction that also bumps `user_version`, so a failed
//! upgrade leaves the file exactly as it was.

use super::{create_collection_table, lock, validate_table_name};
use parley_core::error::{ParleyError, Result};
use parley_core::store_config::StoreConfig;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub type SharedConnection = Arc<Mutex<Connection>>;

/// What an upgrade hook is asked to do.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeContext<'a> {
    pub config: &'a StoreConfig,
    /// Version found on disk; 0 for a database that was just created.
    pub old_version: u32,
    pub new_version: u32,
}

impl UpgradeContext<'_> {
    pub fn is_fresh(&self) -> bool {
        self.old_version == 0
    }
}

/// Runs inside the upgrade transaction. Returning an error rolls the upgrade
/// back.
pub type UpgradeHook =
    Arc<dyn Fn(&Transaction<'_>, &UpgradeContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Hands out one shared connection per `(db_name, version)`.
///
/// Concurrent `connect` calls for the same pair return the same connection;
/// the upgrade runs at most once.
pub struct ConnectionRegistry {
    data_dir: PathBuf,
    connections: Mutex<HashMap<(String, u32), SharedConnection>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_path(&self, db_name: &str) -> PathBuf {
        self.data_dir.join(format!("{db_name}.sqlite3"))
    }

    /// Returns the open connection for `config`, opening and upgrading the
    /// database on first use.
    ///
    /// Without a hook the upgrade only creates the collection table.
    ///
    /// # Errors
    ///
    /// [`ParleyError::Connection`] when the file cannot be opened, when it
    /// carries a newer version than requested, or when the upgrade fails.
    pub async fn connect(
        &self,
        config: &StoreConfig,
        hook: Option<&UpgradeHook>,
    ) -> Result<SharedConnection> {
        let key = (config.db_name.clone(), config.version);
        let mut connections = lock(&self.connections)?;
        if let Some(existing) = connections.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let connection = self.open(config, hook)?;
        let shared = Arc::new(Mutex::new(connection));
        connections.insert(key, Arc::clone(&shared));
        Ok(shared)
    }

    /// Drops the cached connection; the next `connect` reopens the file.
    pub fn close(&self, config: &StoreConfig) -> bool {
        match self.connections.lock() {
            Ok(mut connections) => connections
                .remove(&(config.db_name.clone(), config.version))
                .is_some(),
            Err(_) => false,
        }
    }

    pub fn open_count(&self) -> usize {
        self.connections.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn open(&self, config: &StoreConfig, hook: Option<&UpgradeHook>) -> Result<Connection> {
        validate_table_name(&config.collection_name)?;
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            ParleyError::connection(format!(
                "cannot create data directory {}: {e}",
                self.data_dir.display()
            ))
        })?;

        let path = self.db_path(&config.db_name);
        let mut conn = Connection::open(&path).map_err(|e| {
            ParleyError::connection(format!("cannot open {}: {e}", path.display()))
        })?;
        configure_connection(&conn)
            .map_err(|e| ParleyError::connection(format!("{}: {e:#}", config.db_name)))?;

        upgrade(&mut conn, config, hook).map_err(|e| {
            tracing::error!(
                db = %config.db_name,
                version = config.version,
                error = %format!("{e:#}"),
                "Database upgrade failed"
            );
            ParleyError::connection(format!("{}: {e:#}", config.db_name))
        })?;

        tracing::debug!(
            db = %config.db_name,
            version = config.version,
            path = %path.display(),
            "Opened database"
        );
        Ok(conn)
    }
}

fn configure_connection(conn: &Connection) -> anyhow::Result<()> {
    use anyhow::Context;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("failed to apply sqlite PRAGMAs")?;
    Ok(())
}

pub(crate) fn read_user_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .map(|v| u32::try_from(v).unwrap_or(0))
}

fn upgrade(
    conn: &mut Connection,
    config: &StoreConfig,
    hook: Option<&UpgradeHook>,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let current = read_user_version(conn).context("failed to read user_version")?;
    if current > config.version {
        anyhow::bail!(
            "database is at version {current}, newer than requested version {}",
            config.version
        );
    }
    if current == config.version {
        return Ok(());
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin upgrade transaction")?;

    let context = UpgradeContext {
        config,
        old_version: current,
        new_version: config.version,
    };
    tracing::info!(
        db = %config.db_name,
        from = current,
        to = config.version,
        "Upgrading database"
    );

    match hook {
        Some(hook) => hook(&tx, &context)?,
        None => create_collection_table(&tx, &config.collection_name)?,
    }

    tx.pragma_update(None, "user_version", i64::from(config.version))
        .context("failed to update user_version")?;
    tx.commit().context("failed to commit upgrade transaction")?;
    Ok(())
}
