//! libSQL backend: async `TagStore` implementation.
//!
//! Messages live in `messages`, one row per (message, tag) in `tags`.
//! Queries compile to a `WHERE` clause over `messages m` with positional
//! parameters. Supports local file and in-memory databases.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Connection, Database as LibSqlDatabase, OpenFlags, Value, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::query::Query;
use crate::store::traits::{StoreMode, StoredMessage, TagOp, TagStore};

/// Separator used when aggregating a message's tags into one column.
const TAG_SEPARATOR: char = '\u{1f}';

/// libSQL-backed message store.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    mode: StoreMode,
}

impl LibSqlStore {
    /// Open a local database file.
    ///
    /// A read-write handle creates the file (and parent directories) when
    /// missing and runs migrations. A read-only handle requires an existing
    /// database and opens it with SQLite's read-only flag.
    pub async fn open(path: &Path, mode: StoreMode) -> Result<Self, StoreError> {
        match mode {
            StoreMode::ReadOnly if !path.exists() => {
                return Err(StoreError::Open(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            StoreMode::ReadWrite => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Open(format!("Failed to create store directory: {e}"))
                    })?;
                }
            }
            StoreMode::ReadOnly => {}
        }

        let flags = match mode {
            StoreMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            StoreMode::ReadWrite => OpenFlags::default(),
        };
        let db = libsql::Builder::new_local(path)
            .flags(flags)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            mode,
        };
        if mode == StoreMode::ReadWrite {
            migrations::run_migrations(store.conn()).await?;
        }
        info!(path = %path.display(), mode = ?mode, "Store opened");
        Ok(store)
    }

    /// Create a read-write in-memory store (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            mode: StoreMode::ReadWrite,
        };
        migrations::run_migrations(store.conn()).await?;
        Ok(store)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    fn ensure_writable(&self, operation: &str) -> Result<(), StoreError> {
        match self.mode {
            StoreMode::ReadWrite => Ok(()),
            StoreMode::ReadOnly => Err(StoreError::ReadOnly {
                operation: operation.to_string(),
            }),
        }
    }

    /// Insert or replace a message record and its full tag set.
    ///
    /// This is the indexer's entry point; the retag pipeline itself only
    /// ever mutates tags of messages that already exist.
    pub async fn index_message(
        &self,
        id: &str,
        thread_id: &str,
        filename: &Path,
        tags: &[&str],
    ) -> Result<(), StoreError> {
        self.ensure_writable("index a message")?;

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("index_message begin: {e}")))?;

        let outcome = async {
            tx.execute(
                "INSERT INTO messages (id, thread_id, filename) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    thread_id = excluded.thread_id,
                    filename = excluded.filename",
                params![id, thread_id, filename.to_string_lossy().to_string()],
            )
            .await?;
            tx.execute("DELETE FROM tags WHERE message_id = ?1", params![id])
                .await?;
            for tag in tags {
                tx.execute(
                    "INSERT OR IGNORE INTO tags (message_id, tag) VALUES (?1, ?2)",
                    params![id, *tag],
                )
                .await?;
            }
            Ok::<(), libsql::Error>(())
        }
        .await;

        match outcome {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| StoreError::Query(format!("index_message commit: {e}")))?,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(StoreError::Query(format!("index_message: {e}")));
            }
        }

        debug!(id = id, thread_id = thread_id, "Message indexed");
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Translate a query into a SQL predicate over `messages m`, pushing its
/// parameters onto `args` in placeholder order.
fn compile_query(query: &Query, args: &mut Vec<Value>) -> String {
    match query {
        Query::Tag(tag) => {
            args.push(Value::Text(tag.clone()));
            format!(
                "EXISTS (SELECT 1 FROM tags t WHERE t.message_id = m.id AND t.tag = ?{})",
                args.len()
            )
        }
        Query::Id(id) => {
            args.push(Value::Text(id.clone()));
            format!("m.id = ?{}", args.len())
        }
        Query::Thread(thread) => {
            args.push(Value::Text(thread.clone()));
            format!("m.thread_id = ?{}", args.len())
        }
        Query::Not(inner) => format!("NOT ({})", compile_query(inner, args)),
        Query::And(terms) if terms.is_empty() => "1".to_string(),
        Query::And(terms) => terms
            .iter()
            .map(|term| format!("({})", compile_query(term, args)))
            .collect::<Vec<_>>()
            .join(" AND "),
    }
}

/// Map a libsql Row to a StoredMessage.
///
/// Column order: 0:id, 1:thread_id, 2:filename, 3:separator-joined tags
fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let id: String = row.get(0)?;
    let thread_id: String = row.get(1)?;
    let filename: String = row.get(2)?;
    let joined: String = row.get(3)?;

    let tags: BTreeSet<String> = joined
        .split(TAG_SEPARATOR)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok(StoredMessage {
        id,
        thread_id,
        filename: PathBuf::from(filename),
        tags,
    })
}

/// Apply tag operations through an open transaction.
async fn apply_ops(conn: &Connection, id: &str, ops: &[TagOp]) -> Result<(), StoreError> {
    let mut rows = conn
        .query("SELECT 1 FROM messages WHERE id = ?1", params![id])
        .await
        .map_err(|e| StoreError::Query(format!("apply_tags lookup: {e}")))?;
    let exists = rows
        .next()
        .await
        .map_err(|e| StoreError::Query(format!("apply_tags lookup: {e}")))?
        .is_some();
    if !exists {
        return Err(StoreError::NotFound { id: id.to_string() });
    }

    for op in ops {
        let sql = match op {
            TagOp::Add(_) => "INSERT OR IGNORE INTO tags (message_id, tag) VALUES (?1, ?2)",
            TagOp::Remove(_) => "DELETE FROM tags WHERE message_id = ?1 AND tag = ?2",
        };
        conn.execute(sql, params![id, op.tag()])
            .await
            .map_err(|e| StoreError::Query(format!("apply_tags {op}: {e}")))?;
    }
    Ok(())
}

// ── TagStore implementation ─────────────────────────────────────────

#[async_trait]
impl TagStore for LibSqlStore {
    fn mode(&self) -> StoreMode {
        self.mode
    }

    async fn search(&self, query: &Query) -> Result<Vec<StoredMessage>, StoreError> {
        let mut args = Vec::new();
        let predicate = compile_query(query, &mut args);
        let sql = format!(
            "SELECT m.id, m.thread_id, m.filename,
                COALESCE((SELECT group_concat(tag, char(31)) FROM tags WHERE message_id = m.id), '')
             FROM messages m WHERE {predicate} ORDER BY m.id"
        );
        debug!(query = %query, "Searching store");

        let mut rows = self
            .conn()
            .query(&sql, Params::Positional(args))
            .await
            .map_err(|e| StoreError::Query(format!("search {query}: {e}")))?;

        let mut messages = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let msg = row_to_message(&row)
                        .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
                    messages.push(msg);
                }
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("search {query}: {e}"))),
            }
        }
        Ok(messages)
    }

    async fn count(&self, query: &Query) -> Result<usize, StoreError> {
        let mut args = Vec::new();
        let predicate = compile_query(query, &mut args);
        let sql = format!("SELECT COUNT(*) FROM messages m WHERE {predicate}");

        let mut rows = self
            .conn()
            .query(&sql, Params::Positional(args))
            .await
            .map_err(|e| StoreError::Query(format!("count {query}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StoreError::Query(format!("count {query}: {e}"))),
        }
    }

    async fn apply_tags(&self, id: &str, ops: &[TagOp]) -> Result<(), StoreError> {
        self.ensure_writable("mutate tags")?;

        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| StoreError::Query(format!("apply_tags begin: {e}")))?;

        match apply_ops(&tx, id, ops).await {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| StoreError::Query(format!("apply_tags commit: {e}")))?;
                debug!(id = id, ops = ops.len(), "Tag batch committed");
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}
