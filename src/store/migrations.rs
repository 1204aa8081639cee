//! Version-tracked schema migrations for the libSQL tag store.
//!
//! Each migration has a version number and SQL. `run_migrations()` applies
//! every version not yet recorded in `_migrations`, each in its own
//! transaction together with its record.

use std::collections::BTreeSet;

use libsql::{Connection, params};
use tracing::{debug, info};

use crate::error::StoreError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "message_tags",
        sql: r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                filename TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                tag TEXT NOT NULL,
                PRIMARY KEY (message_id, tag)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "lookup_indexes",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);
            CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);
        "#,
    },
];

/// Apply every migration not yet recorded in `_migrations`.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StoreError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let applied = applied_versions(conn).await?;
    let mut fresh = 0;
    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        apply(conn, migration).await?;
        fresh += 1;
    }

    debug!(already = applied.len(), fresh, "Store schema up to date");
    Ok(())
}

/// Versions already recorded as applied.
async fn applied_versions(conn: &Connection) -> Result<BTreeSet<i64>, StoreError> {
    let mut rows = conn
        .query("SELECT version FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Migration(format!("Failed to list applied migrations: {e}")))?;

    let mut versions = BTreeSet::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => {
                let version: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Migration(format!("Bad migration row: {e}")))?;
                versions.insert(version);
            }
            Ok(None) => return Ok(versions),
            Err(e) => {
                return Err(StoreError::Migration(format!(
                    "Failed to list applied migrations: {e}"
                )));
            }
        }
    }
}

/// Run one migration and record it; both land or neither does.
async fn apply(conn: &Connection, migration: &Migration) -> Result<(), StoreError> {
    let failed = |e: libsql::Error| {
        StoreError::Migration(format!(
            "Migration V{} ({}) failed: {e}",
            migration.version, migration.name
        ))
    };

    let tx = conn.transaction().await.map_err(failed)?;
    let outcome = async {
        tx.execute_batch(migration.sql).await?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )
        .await?;
        Ok::<(), libsql::Error>(())
    }
    .await;

    match outcome {
        Ok(()) => tx.commit().await.map_err(failed),
        Err(e) => {
            let _ = tx.rollback().await;
            Err(failed(e))
        }
    }
}
