//! Classification worker pool.
//!
//! A feeder task pushes every filename, then one `Stop` per worker, into a
//! zero-capacity MPMC channel. Each worker classifies files until it
//! receives `Stop`, then reports `Finished` exactly once and exits. All
//! workers report on one shared zero-capacity result channel, drained by a
//! single `ResultStream`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::PipelineError;
use crate::pipeline::aggregator::ResultStream;
use crate::pipeline::headers::HeaderView;
use crate::pipeline::matcher::match_headers;
use crate::pipeline::rules::RuleSet;
use crate::pipeline::types::{Classification, WorkItem, WorkerEvent};

/// Header carrying the store join key.
const MESSAGE_ID_HEADER: &str = "Message-ID";

/// Running worker tasks plus the feeder.
pub struct WorkerPool {
    size: usize,
    workers: Vec<JoinHandle<()>>,
    feeder: JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn `size` workers and a feeder for `filenames`.
    ///
    /// Returns the pool handle and the only receiver of worker events.
    pub fn start(
        rules: Arc<RuleSet>,
        size: usize,
        filenames: Vec<PathBuf>,
    ) -> (Self, ResultStream) {
        let size = size.max(1);
        let (work_tx, work_rx) = flume::bounded::<WorkItem>(0);
        let (events_tx, events_rx) = flume::bounded::<WorkerEvent>(0);

        let workers = (0..size)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&rules),
                    work_rx.clone(),
                    events_tx.clone(),
                ))
            })
            .collect();

        let feeder = tokio::spawn(feed(work_tx, filenames, size));

        debug!(size, "Worker pool started");
        (
            Self {
                size,
                workers,
                feeder,
            },
            ResultStream::new(events_rx, size),
        )
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for the feeder and every worker to exit.
    pub async fn join(self) -> Result<(), PipelineError> {
        self.feeder.await.map_err(|e| PipelineError::TaskFailed {
            task: "feeder".into(),
            reason: e.to_string(),
        })?;
        for (worker, handle) in self.workers.into_iter().enumerate() {
            handle.await.map_err(|e| PipelineError::TaskFailed {
                task: format!("worker {worker}"),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Stop the feeder and every worker without waiting for them.
    pub fn abort(self) {
        self.feeder.abort();
        for handle in self.workers {
            handle.abort();
        }
    }
}

/// Push every filename, then one `Stop` per worker.
async fn feed(work_tx: flume::Sender<WorkItem>, filenames: Vec<PathBuf>, pool_size: usize) {
    let items = filenames
        .into_iter()
        .map(WorkItem::Mail)
        .chain(std::iter::repeat_n(WorkItem::Stop, pool_size));

    for item in items {
        if work_tx.send_async(item).await.is_err() {
            debug!("All workers gone, feeder stopping");
            return;
        }
    }
    debug!("Feeder done");
}

/// Worker loop: classify until `Stop`, then report `Finished`.
async fn run_worker(
    worker: usize,
    rules: Arc<RuleSet>,
    work_rx: flume::Receiver<WorkItem>,
    events_tx: flume::Sender<WorkerEvent>,
) {
    debug!(worker, "Classification worker started");

    while let Ok(item) = work_rx.recv_async().await {
        let event = match item {
            WorkItem::Stop => {
                let _ = events_tx.send_async(WorkerEvent::Finished { worker }).await;
                debug!(worker, "Classification worker finished");
                return;
            }
            WorkItem::Mail(path) => match classify_file(&path, &rules).await {
                Ok(Some(classification)) => WorkerEvent::Classified(classification),
                Ok(None) => continue,
                Err(error) => {
                    error!(worker, error = %error, "Classification failed");
                    let _ = events_tx
                        .send_async(WorkerEvent::Failed { worker, error })
                        .await;
                    return;
                }
            },
        };

        if events_tx.send_async(event).await.is_err() {
            debug!(worker, "Result consumer gone, worker stopping");
            return;
        }
    }

    debug!(worker, "Work channel closed before Stop");
}

/// Classify one mail file.
///
/// Returns `Ok(None)` for a message without a Message-ID header; read and
/// parse failures are errors.
pub async fn classify_file(
    path: &Path,
    rules: &RuleSet,
) -> Result<Option<Classification>, PipelineError> {
    let headers = HeaderView::read(path).await?;

    let message_id = headers.get(MESSAGE_ID_HEADER);
    if message_id.is_empty() {
        warn!(path = %path.display(), "No Message-ID, skipping");
        return Ok(None);
    }

    Ok(Some(Classification {
        message_id: message_id.to_string(),
        tag_delta: match_headers(&headers, rules),
        filename: path.to_path_buf(),
    }))
}
