//! Tag mutator: turns one classification into one atomic tag batch.

use std::sync::Arc;

use tracing::info;

use crate::error::PipelineError;
use crate::pipeline::types::{Classification, parse_tag_delta, strip_message_id};
use crate::store::{TagOp, TagStore};

/// Applies classifications to the store through a writable handle.
pub struct TagMutator {
    store: Arc<dyn TagStore>,
}

impl TagMutator {
    pub fn new(store: Arc<dyn TagStore>) -> Self {
        Self { store }
    }

    /// Apply one classification and return the operations applied.
    ///
    /// A Message-ID without `<...>` brackets, or one the store does not
    /// know, is fatal for the mutation phase.
    pub async fn apply(&self, classification: &Classification) -> Result<Vec<TagOp>, PipelineError> {
        let message_id = strip_message_id(&classification.message_id).ok_or_else(|| {
            PipelineError::MalformedMessageId {
                message_id: classification.message_id.clone(),
                path: classification.filename.clone(),
            }
        })?;

        if self.store.find_message(message_id).await?.is_none() {
            return Err(PipelineError::MessageNotInStore {
                message_id: message_id.to_string(),
                path: classification.filename.clone(),
            });
        }

        let ops = parse_tag_delta(&classification.tag_delta);
        info!(
            message_id = message_id,
            tags = %classification.tag_delta.trim(),
            "Applying tags"
        );

        if !ops.is_empty() {
            self.store.apply_tags(message_id, &ops).await?;
        }
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};

    use crate::store::LibSqlStore;

    async fn store_with(id: &str, tags: &[&str]) -> Arc<LibSqlStore> {
        let store = LibSqlStore::new_memory().await.unwrap();
        store
            .index_message(id, "thread-1", Path::new("/mail/cur/1"), tags)
            .await
            .unwrap();
        Arc::new(store)
    }

    fn classification(message_id: &str, tag_delta: &str) -> Classification {
        Classification {
            message_id: message_id.into(),
            tag_delta: tag_delta.into(),
            filename: PathBuf::from("/mail/cur/1"),
        }
    }

    fn tag_set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn add_and_remove() {
        let store = store_with("abc@x", &["b", "c"]).await;
        let mutator = TagMutator::new(store.clone());

        let ops = mutator
            .apply(&classification("<abc@x>", " +a -b"))
            .await
            .unwrap();
        assert_eq!(ops, vec![TagOp::Add("a".into()), TagOp::Remove("b".into())]);

        let msg = store.find_message("abc@x").await.unwrap().unwrap();
        assert_eq!(msg.tags, tag_set(&["a", "c"]));
    }

    #[tokio::test]
    async fn later_ops_win_within_a_delta() {
        let store = store_with("abc@x", &["inbox"]).await;
        let mutator = TagMutator::new(store.clone());

        mutator
            .apply(&classification("<abc@x>", " +archive -inbox +inbox"))
            .await
            .unwrap();

        let msg = store.find_message("abc@x").await.unwrap().unwrap();
        assert_eq!(msg.tags, tag_set(&["archive", "inbox"]));
    }

    #[tokio::test]
    async fn empty_delta_leaves_tags_alone() {
        let store = store_with("abc@x", &["new"]).await;
        let mutator = TagMutator::new(store.clone());

        let ops = mutator.apply(&classification("<abc@x>", "")).await.unwrap();
        assert!(ops.is_empty());

        let msg = store.find_message("abc@x").await.unwrap().unwrap();
        assert_eq!(msg.tags, tag_set(&["new"]));
    }

    #[tokio::test]
    async fn unknown_message_is_reported() {
        let store = store_with("other@x", &[]).await;
        let mutator = TagMutator::new(store);

        let err = mutator
            .apply(&classification("<abc@x>", " +a"))
            .await
            .unwrap_err();
        match err {
            PipelineError::MessageNotInStore { message_id, path } => {
                assert_eq!(message_id, "abc@x");
                assert_eq!(path, PathBuf::from("/mail/cur/1"));
            }
            other => panic!("Expected MessageNotInStore, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unbracketed_id_is_malformed() {
        let store = store_with("abc@x", &[]).await;
        let mutator = TagMutator::new(store);

        let err = mutator
            .apply(&classification("abc@x", " +a"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedMessageId { .. }));
    }
}
