//! Result aggregation and termination.
//!
//! The stream ends once it has seen one `Finished` per worker. How many
//! classifications arrive before that is irrelevant to termination.

use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::types::{Classification, WorkerEvent};

/// Single consumer of the shared worker event channel.
pub struct ResultStream {
    events: flume::Receiver<WorkerEvent>,
    remaining: usize,
    received: usize,
}

impl ResultStream {
    /// Consume `events` until `pool_size` workers have finished.
    pub fn new(events: flume::Receiver<WorkerEvent>, pool_size: usize) -> Self {
        Self {
            events,
            remaining: pool_size,
            received: 0,
        }
    }

    /// Classifications handed out so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Next classification, or `None` once every worker has finished.
    ///
    /// A worker failure, or the channel closing while workers are still
    /// outstanding, is an error.
    pub async fn next(&mut self) -> Result<Option<Classification>, PipelineError> {
        while self.remaining > 0 {
            match self.events.recv_async().await {
                Ok(WorkerEvent::Classified(classification)) => {
                    self.received += 1;
                    return Ok(Some(classification));
                }
                Ok(WorkerEvent::Finished { worker }) => {
                    self.remaining -= 1;
                    debug!(worker, remaining = self.remaining, "Worker drained");
                }
                Ok(WorkerEvent::Failed { error, .. }) => return Err(error),
                Err(_) => {
                    return Err(PipelineError::ChannelClosed {
                        remaining: self.remaining,
                    });
                }
            }
        }
        Ok(None)
    }
}
