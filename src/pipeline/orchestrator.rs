//! Run orchestration.
//!
//! One run: load rules, list the messages carrying the source tag through
//! a read-only store handle, classify them on the worker pool while the
//! mutator applies each result through a writable handle, then normalize.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RetagConfig;
use crate::error::{Error, PipelineError, StoreError};
use crate::pipeline::aggregator::ResultStream;
use crate::pipeline::mutator::TagMutator;
use crate::pipeline::normalizer::{RuleHits, TagNormalizer};
use crate::pipeline::rules::RuleSet;
use crate::pipeline::workers::WorkerPool;
use crate::store::{LibSqlStore, Query, StoreMode, TagStore};

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages carrying the source tag.
    pub selected: usize,
    /// Messages the workers classified.
    pub classified: usize,
    /// Messages skipped for lack of a Message-ID.
    pub skipped: usize,
    /// Messages that received at least one tag operation.
    pub mutated: usize,
    /// Normalizer outcome, one entry per rule in order.
    pub normalized: Vec<RuleHits>,
}

impl RunSummary {
    /// Messages touched by the normalizer across all rules.
    pub fn normalized_total(&self) -> usize {
        self.normalized.iter().map(|h| h.touched).sum()
    }
}

#[derive(Debug, Default)]
struct Tally {
    classified: usize,
    mutated: usize,
}

/// Drives classification, mutation and normalization for one run.
pub struct Orchestrator {
    rules: Arc<RuleSet>,
    pool_size: usize,
    source_tag: String,
}

impl Orchestrator {
    pub fn new(rules: RuleSet, pool_size: usize, source_tag: impl Into<String>) -> Self {
        Self {
            rules: Arc::new(rules),
            pool_size,
            source_tag: source_tag.into(),
        }
    }

    /// Filenames of every message carrying the source tag.
    pub async fn select(&self, reader: &dyn TagStore) -> Result<Vec<PathBuf>, StoreError> {
        let query = Query::tag(&self.source_tag);
        let count = reader.count(&query).await?;
        info!(tag = %self.source_tag, count, "Messages to classify");

        let messages = reader.search(&query).await?;
        Ok(messages.into_iter().map(|m| m.filename).collect())
    }

    /// Classify `filenames`, apply every result, then normalize.
    ///
    /// Mutations applied before a fatal error stay in the store.
    pub async fn process(
        &self,
        filenames: Vec<PathBuf>,
        writer: Arc<dyn TagStore>,
    ) -> Result<RunSummary, Error> {
        if writer.mode() == StoreMode::ReadOnly {
            return Err(StoreError::ReadOnly {
                operation: "run the tagging phase".into(),
            }
            .into());
        }
        let selected = filenames.len();
        let mutator = TagMutator::new(Arc::clone(&writer));

        let tally = self.classify_and_tag(filenames, &mutator).await?;
        let normalized = TagNormalizer::new(writer).run().await?;

        Ok(RunSummary {
            selected,
            classified: tally.classified,
            skipped: selected.saturating_sub(tally.classified),
            mutated: tally.mutated,
            normalized,
        })
    }

    async fn classify_and_tag(
        &self,
        filenames: Vec<PathBuf>,
        mutator: &TagMutator,
    ) -> Result<Tally, PipelineError> {
        let files = filenames.len();
        let (pool, mut stream) =
            WorkerPool::start(Arc::clone(&self.rules), self.pool_size, filenames);
        debug!(workers = pool.size(), files, "Classifying");

        let mut tally = Tally::default();
        let outcome = drain(&mut stream, mutator, &mut tally).await;
        tally.classified = stream.received();
        // Dropping the receiver unblocks any worker still sending.
        drop(stream);

        match outcome {
            Ok(()) => {
                pool.join().await?;
                debug!(
                    classified = tally.classified,
                    mutated = tally.mutated,
                    "Classification done"
                );
                Ok(tally)
            }
            Err(e) => {
                pool.abort();
                Err(e)
            }
        }
    }
}

async fn drain(
    stream: &mut ResultStream,
    mutator: &TagMutator,
    tally: &mut Tally,
) -> Result<(), PipelineError> {
    while let Some(classification) = stream.next().await? {
        let ops = mutator.apply(&classification).await?;
        if !ops.is_empty() {
            tally.mutated += 1;
        }
    }
    Ok(())
}

/// Run the whole pipeline against the configured store.
pub async fn run(config: &RetagConfig) -> Result<RunSummary, Error> {
    info!(
        mail_root = %config.mail_root.display(),
        pool_size = config.pool_size,
        "Starting retag run"
    );

    let rules = RuleSet::load(&config.rules_path)?;
    let orchestrator = Orchestrator::new(rules, config.pool_size, config.source_tag.as_str());

    let filenames = {
        let reader = LibSqlStore::open(&config.db_path, StoreMode::ReadOnly).await?;
        orchestrator.select(&reader).await?
    };

    let writer = LibSqlStore::open(&config.db_path, StoreMode::ReadWrite).await?;
    orchestrator.process(filenames, Arc::new(writer)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::time::Duration;

    use crate::pipeline::rules::TagRule;

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    fn write_mail(dir: &Path, name: &str, headers: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("{headers}\r\n\r\nbody\r\n")).unwrap();
        path
    }

    fn rules() -> RuleSet {
        RuleSet::new(vec![
            TagRule::new("From", "lists\\.example\\.com", "+list -new"),
            TagRule::new("From", "boss@", "+inbox -new"),
            TagRule::new("Subject", "(?i)read me", "+seen"),
        ])
    }

    async fn tags_of(store: &LibSqlStore, id: &str) -> BTreeSet<String> {
        store.find_message(id).await.unwrap().unwrap().tags
    }

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn classifies_mutates_and_normalizes() {
        let tmp = tempfile::tempdir().unwrap();
        let list = write_mail(
            tmp.path(),
            "list",
            "From: dev@lists.example.com\r\nSubject: patch\r\nMessage-ID: <list@x>",
        );
        let boss = write_mail(
            tmp.path(),
            "boss",
            "From: boss@example.com\r\nSubject: Read me\r\nMessage-ID: <boss@x>",
        );
        let sibling = tmp.path().join("sibling");

        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        store.index_message("list@x", "t1", &list, &["new"]).await.unwrap();
        store.index_message("boss@x", "t2", &boss, &["new"]).await.unwrap();
        store.index_message("sib@x", "t3", &sibling, &[]).await.unwrap();

        let orchestrator = Orchestrator::new(rules(), 3, "new");
        let filenames = orchestrator.select(&*store).await.unwrap();
        assert_eq!(filenames.len(), 2);

        let summary = tokio::time::timeout(
            TEST_TIMEOUT,
            orchestrator.process(filenames, store.clone()),
        )
        .await
        .expect("run hung")
        .unwrap();

        assert_eq!(summary.selected, 2);
        assert_eq!(summary.classified, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.mutated, 2);
        assert_eq!(summary.normalized.len(), 7);

        assert_eq!(tags_of(&store, "list@x").await, set(&["list"]));
        // inbox + seen without list: archived by the normalizer.
        assert_eq!(tags_of(&store, "boss@x").await, set(&["archive", "seen"]));
        assert!(tags_of(&store, "sib@x").await.is_empty());
    }

    #[tokio::test]
    async fn message_without_id_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let anon = write_mail(tmp.path(), "anon", "From: boss@example.com\r\nSubject: hi");

        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let orchestrator = Orchestrator::new(rules(), 2, "new");

        let summary = orchestrator
            .process(vec![anon], store.clone())
            .await
            .unwrap();
        assert_eq!(summary.selected, 1);
        assert_eq!(summary.classified, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.mutated, 0);
    }

    #[tokio::test]
    async fn missing_store_message_aborts_run() {
        let tmp = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..10)
            .map(|i| {
                write_mail(
                    tmp.path(),
                    &format!("{i}"),
                    &format!("From: boss@example.com\r\nMessage-ID: <{i}@x>"),
                )
            })
            .collect();

        // Nothing indexed: the first classification fails the mutation phase.
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let orchestrator = Orchestrator::new(rules(), 4, "new");

        let err = tokio::time::timeout(TEST_TIMEOUT, orchestrator.process(files, store))
            .await
            .expect("run hung")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::MessageNotInStore { .. })
        ));
    }

    #[tokio::test]
    async fn normalizer_runs_with_nothing_selected() {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        store
            .index_message("a@x", "t1", Path::new("/mail/a"), &["inbox"])
            .await
            .unwrap();
        store
            .index_message("b@x", "t1", Path::new("/mail/b"), &[])
            .await
            .unwrap();

        let orchestrator = Orchestrator::new(rules(), 2, "new");
        let filenames = orchestrator.select(&*store).await.unwrap();
        assert!(filenames.is_empty());

        let summary = orchestrator.process(filenames, store.clone()).await.unwrap();
        assert_eq!(summary.selected, 0);
        assert_eq!(summary.normalized_total(), 2);
        assert_eq!(tags_of(&store, "b@x").await, set(&["inbox"]));
    }

    #[tokio::test]
    async fn read_only_writer_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.db");
        LibSqlStore::open(&path, StoreMode::ReadWrite).await.unwrap();
        let reader = LibSqlStore::open(&path, StoreMode::ReadOnly).await.unwrap();

        let orchestrator = Orchestrator::new(rules(), 1, "new");
        let err = orchestrator
            .process(Vec::new(), Arc::new(reader))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::ReadOnly { .. })));
    }
}
