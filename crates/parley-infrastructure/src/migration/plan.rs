//! Linear migration chain for one collection.
//!
//! A plan knows the collection's current document shape and the registered
//! transforms between versions. It runs inside the upgrade transaction opened
//! by [`ConnectionRegistry`](crate::sqlite::ConnectionRegistry):
//!
//! 1. A fresh database only gets its table.
//! 2. Walking up from the stored version, each registered step that starts
//!    at the current version is applied to every document, in order.
//! 3. If no step ran and some document does not decode as the current shape,
//!    the collection is cleared. This is deliberately lossy: the areas that
//!    rely on it hold caches and short histories, not primary data.
//! 4. If a step ran and its output does not decode, the upgrade fails.

use super::traits::{Migration, RecordMigration};
use crate::sqlite::{UpgradeContext, UpgradeHook, create_collection_table};
use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, params};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

type ShapeCheck = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Outcome of one upgrade, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub steps_applied: usize,
    pub records_migrated: usize,
    pub cleared: bool,
}

pub struct MigrationPlan {
    latest_version: u32,
    migrations: Vec<Arc<dyn RecordMigration>>,
    shape_check: ShapeCheck,
}

impl std::fmt::Debug for MigrationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPlan")
            .field("latest_version", &self.latest_version)
            .field("migrations", &self.migrations)
            .finish_non_exhaustive()
    }
}

impl MigrationPlan {
    /// Creates a plan whose current document shape is `T`.
    pub fn new<T: DeserializeOwned + 'static>(latest_version: u32) -> Self {
        Self {
            latest_version,
            migrations: Vec::new(),
            shape_check: Arc::new(|value: &Value| T::deserialize(value).is_ok()),
        }
    }

    pub fn latest_version(&self) -> u32 {
        self.latest_version
    }

    /// Registers a single migration, validating chain continuity.
    ///
    /// # Panics
    ///
    /// Panics if the migration does not start where the previous one ended,
    /// or if it targets a version beyond the plan's latest version.
    pub fn register(&mut self, migration: Arc<dyn RecordMigration>) {
        if let Some(last) = self.migrations.last() {
            assert_eq!(
                last.to_version(),
                migration.from_version(),
                "Migration chain broken: expected migration from {} (previous to_version), but got migration from {}. \
                 Description: '{}' (previous) -> '{}' (current)",
                last.to_version(),
                migration.from_version(),
                last.description(),
                migration.description()
            );
        }

        if migration.to_version() > self.latest_version {
            panic!(
                "Migration target version {} exceeds plan's latest version {}",
                migration.to_version(),
                self.latest_version
            );
        }

        self.migrations.push(migration);
    }

    pub fn with(mut self, migration: Arc<dyn RecordMigration>) -> Self {
        self.register(migration);
        self
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Steps to run for `old -> new`, walking one version at a time from the
    /// stored version. Versions without a registered step are skipped.
    fn steps_between(&self, old: u32, new: u32) -> Vec<&Arc<dyn RecordMigration>> {
        let mut steps = Vec::new();
        let mut version = old;
        while version < new {
            match self
                .migrations
                .iter()
                .find(|m| m.can_migrate(version) && m.to_version() <= new)
            {
                Some(step) => {
                    steps.push(step);
                    version = step.to_version();
                }
                None => version += 1,
            }
        }
        steps
    }

    /// Wraps the plan as an upgrade hook for the connection registry.
    pub fn into_hook(self) -> UpgradeHook {
        let plan = Arc::new(self);
        Arc::new(
            move |tx: &Transaction<'_>, context: &UpgradeContext<'_>| -> Result<()> {
                plan.apply(tx, context).map(|_| ())
            },
        )
    }

    /// Runs the upgrade described by `context` on `conn`.
    ///
    /// `conn` is expected to be inside a transaction; this function neither
    /// begins nor commits one.
    pub fn apply(&self, conn: &Connection, context: &UpgradeContext<'_>) -> Result<MigrationReport> {
        let table = context.config.collection_name.as_str();
        create_collection_table(conn, table)
            .with_context(|| format!("failed to create table '{table}'"))?;

        let mut report = MigrationReport {
            from_version: context.old_version,
            to_version: context.new_version,
            ..MigrationReport::default()
        };
        if context.is_fresh() {
            return Ok(report);
        }

        let mut records = load_records(conn, table)?;
        let steps = self.steps_between(context.old_version, context.new_version);

        for (i, migration) in steps.iter().enumerate() {
            tracing::info!(
                collection = table,
                step = i + 1,
                total = steps.len(),
                from = migration.from_version(),
                to = migration.to_version(),
                "Migration step: {}",
                migration.description()
            );
            records = records
                .into_iter()
                .map(|(id, body)| -> Result<(String, Result<Value>)> {
                    let body = body.with_context(|| format!("record '{id}' is not valid JSON"))?;
                    let migrated = migration.migrate(body).with_context(|| {
                        format!(
                            "Migration failed for record '{id}': {} -> {}",
                            migration.from_version(),
                            migration.to_version()
                        )
                    })?;
                    Ok((id, Ok(migrated)))
                })
                .collect::<Result<Vec<_>>>()?;
            report.steps_applied += 1;
        }

        let mismatched = records
            .iter()
            .filter(|(_, body)| !body.as_ref().is_ok_and(|v| (self.shape_check)(v)))
            .count();

        if report.steps_applied > 0 {
            if mismatched > 0 {
                anyhow::bail!(
                    "{mismatched} record(s) in '{table}' do not match the current schema after migration"
                );
            }
            rewrite(conn, table, &records)?;
            report.records_migrated = records.len();
        } else if mismatched > 0 {
            tracing::warn!(
                collection = table,
                from = context.old_version,
                to = context.new_version,
                records = records.len(),
                mismatched,
                "No migration registered and records do not match the new schema; clearing collection"
            );
            conn.execute(&format!("DELETE FROM \"{table}\""), [])
                .with_context(|| format!("failed to clear '{table}'"))?;
            report.cleared = true;
        }

        tracing::info!(
            collection = table,
            from = context.old_version,
            to = context.new_version,
            steps = report.steps_applied,
            migrated = report.records_migrated,
            cleared = report.cleared,
            "Collection upgraded"
        );
        Ok(report)
    }
}

/// Documents keyed by row id. Bodies that are not JSON are kept as errors so
/// that the caller decides whether they are fatal.
type Rows = Vec<(String, Result<Value>)>;

fn load_records(conn: &Connection, table: &str) -> Result<Rows> {
    let mut stmt = conn
        .prepare(&format!("SELECT id, body FROM \"{table}\""))
        .with_context(|| format!("failed to read '{table}'"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows
        .into_iter()
        .map(|(id, body)| {
            let parsed = serde_json::from_str(&body).map_err(anyhow::Error::from);
            (id, parsed)
        })
        .collect())
}

fn rewrite(conn: &Connection, table: &str, records: &Rows) -> Result<()> {
    let mut stmt = conn.prepare(&format!("UPDATE \"{table}\" SET body = ?2 WHERE id = ?1"))?;
    for (id, body) in records {
        if let Ok(body) = body {
            stmt.execute(params![id, serde_json::to_string(body)?])
                .with_context(|| format!("failed to write migrated record '{id}'"))?;
        }
    }
    Ok(())
}
