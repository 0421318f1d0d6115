//! Bounded-concurrency execution of import operations.
//!
//! Each import runs in its own task holding a semaphore permit; the engine
//! awaits its subprocess there. The outcome is sent back to the session
//! controller over a channel before the permit is released, so the controller
//! always sees a completion before the freed slot.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;

use super::item::ResourceItem;
use crate::iac::{EngineError, IacEngine};
use crate::infrastructure::error::{ImportError, ImportResult, RejectReason};

/// Everything a worker needs to import one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportJob {
    pub cloud_id: String,
    pub address: String,
    pub resource_type: String,
}

impl ImportJob {
    pub fn from_item(item: &ResourceItem) -> Self {
        Self {
            cloud_id: item.cloud_id.clone(),
            address: item.target_address.clone(),
            resource_type: item.target_type.clone(),
        }
    }
}

/// Outcome of one import, keyed by cloud identifier
#[derive(Debug)]
pub struct ImportCompletion {
    pub cloud_id: String,
    pub result: ImportResult<()>,
}

/// Runs imports against the engine, at most `parallelism` at a time
pub struct ImportExecutor {
    engine: Arc<dyn IacEngine>,
    semaphore: Arc<Semaphore>,
    parallelism: usize,
}

impl ImportExecutor {
    pub fn new(engine: Arc<dyn IacEngine>, parallelism: usize) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            engine,
            semaphore: Arc::new(Semaphore::new(parallelism)),
            parallelism,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Wait for a free worker slot
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        loop {
            // The semaphore is owned here and never closed
            if let Ok(permit) = self.semaphore.clone().acquire_owned().await {
                return permit;
            }
        }
    }

    /// Start importing `job` on a worker holding `permit`
    pub fn spawn(
        &self,
        permit: OwnedSemaphorePermit,
        job: ImportJob,
        completions: mpsc::UnboundedSender<ImportCompletion>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);

        tokio::spawn(async move {
            let cloud_id = job.cloud_id.clone();
            tracing::info!(cloud_id = %job.cloud_id, address = %job.address, "import started");

            // Inner task so a panicking engine still yields a completion
            let result = tokio::spawn(async move { import_with(engine.as_ref(), &job).await })
                .await
                .unwrap_or_else(|e| {
                    Err(ImportError::ImportRejected {
                        cloud_id: cloud_id.clone(),
                        address: String::new(),
                        reason: RejectReason::Engine(format!("Task panicked: {}", e)),
                    })
                });

            match &result {
                Ok(()) => tracing::info!(cloud_id = %cloud_id, "import finished"),
                Err(e) => tracing::warn!(cloud_id = %cloud_id, error = %e, "import failed"),
            }

            // The receiver only goes away when the session is torn down
            let _ = completions.send(ImportCompletion { cloud_id, result });
            drop(permit);
        })
    }
}

/// Import one resource, classifying engine failures
async fn import_with(engine: &dyn IacEngine, job: &ImportJob) -> ImportResult<()> {
    engine
        .import(&job.address, &job.resource_type, &job.cloud_id)
        .await
        .map_err(|e| match e {
            EngineError::Unavailable(message) => ImportError::EngineUnavailable {
                cloud_id: job.cloud_id.clone(),
                message,
            },
            EngineError::Rejected(reason) => ImportError::ImportRejected {
                cloud_id: job.cloud_id.clone(),
                address: job.address.clone(),
                reason,
            },
        })
}
