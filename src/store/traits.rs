//! `TagStore` trait: the async interface the pipeline needs from a
//! searchable, taggable message store.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::query::Query;

/// Whether a store handle may mutate tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    ReadOnly,
    ReadWrite,
}

/// A single tag mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagOp {
    Add(String),
    Remove(String),
}

impl TagOp {
    /// The tag this operation touches.
    pub fn tag(&self) -> &str {
        match self {
            Self::Add(tag) | Self::Remove(tag) => tag,
        }
    }
}

impl fmt::Display for TagOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(tag) => write!(f, "+{tag}"),
            Self::Remove(tag) => write!(f, "-{tag}"),
        }
    }
}

/// A message as the store knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Message-ID without angle brackets.
    pub id: String,
    pub thread_id: String,
    /// Path of the mail file on disk.
    pub filename: PathBuf,
    pub tags: BTreeSet<String>,
}

/// Backend-agnostic message store.
///
/// Writers must hold a `StoreMode::ReadWrite` handle; the backend rejects
/// mutations through a read-only one.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Mode this handle was opened with.
    fn mode(&self) -> StoreMode;

    /// All messages matching `query`, each with its current tag set.
    async fn search(&self, query: &Query) -> Result<Vec<StoredMessage>, StoreError>;

    /// Number of messages matching `query`.
    async fn count(&self, query: &Query) -> Result<usize, StoreError> {
        Ok(self.search(query).await?.len())
    }

    /// Look a message up by exact identifier.
    async fn find_message(&self, id: &str) -> Result<Option<StoredMessage>, StoreError> {
        Ok(self.search(&Query::id(id)).await?.into_iter().next())
    }

    /// Apply `ops` to one message as a single atomic batch, in order.
    ///
    /// Other readers observe either the tag set before the batch or the
    /// one after it, never an intermediate state.
    async fn apply_tags(&self, id: &str, ops: &[TagOp]) -> Result<(), StoreError>;
}
