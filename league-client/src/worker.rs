//! Background history worker.
//!
//! Remote-change notifications are queued and processed one at a time, in
//! arrival order, off the caller's task.

use crate::error::ClientError;
use crate::history::HistoryProcessor;
use crate::relay::Relay;
use league_types::StoreId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

enum Job {
    Process(StoreId),
    Flush(oneshot::Sender<()>),
}

/// Handle to the serial history worker.
#[derive(Debug)]
pub struct WorkerHandle {
    jobs: mpsc::UnboundedSender<Job>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Start the worker on the current Tokio runtime.
    pub fn spawn<R: Relay>(processor: Arc<HistoryProcessor<R>>) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            info!("History worker started");
            while let Some(job) = queue.recv().await {
                match job {
                    Job::Process(store_id) => {
                        // Failures are logged and published by the processor.
                        let _ = processor.process_now(store_id).await;
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            info!("History worker stopped");
        });
        Self { jobs, task }
    }

    /// Queue processing of `store_id`.
    pub fn enqueue(&self, store_id: StoreId) -> Result<(), ClientError> {
        self.jobs
            .send(Job::Process(store_id))
            .map_err(|_| ClientError::WorkerStopped)
    }

    /// Wait until everything queued before this call was processed.
    pub async fn flush(&self) -> Result<(), ClientError> {
        let (done, wait) = oneshot::channel();
        self.jobs
            .send(Job::Flush(done))
            .map_err(|_| ClientError::WorkerStopped)?;
        wait.await.map_err(|_| ClientError::WorkerStopped)
    }

    /// Finish the queued jobs and stop.
    pub async fn shutdown(self) {
        drop(self.jobs);
        if let Err(e) = self.task.await {
            warn!("History worker ended abnormally: {}", e);
        }
    }
}
