// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Local executor: workers run on this host, at most `max_workers` at once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use super::TaskHandle;
use crate::error::WorkerFailure;
use crate::resources::host_cores;
use crate::worker::{self, ParameterBundle, WorkerCommand};

#[derive(Debug)]
pub struct LocalExecutor {
    slots: Arc<Semaphore>,
    max_workers: usize,
    worker: WorkerCommand,
}

impl LocalExecutor {
    /// Pool bounded by `max_workers`, or by the host's parallelism
    pub fn new(max_workers: Option<usize>, worker: WorkerCommand) -> Self {
        let max_workers = max_workers.unwrap_or_else(host_cores).max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            worker,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn submit(&self, bundle: ParameterBundle) -> TaskHandle {
        let slots = Arc::clone(&self.slots);
        let argv = self.worker.argv(&bundle);
        let subject = bundle.subject.clone();

        let task = tokio::spawn(async move {
            let _slot = slots.acquire_owned().await.map_err(|e| WorkerFailure::Aborted {
                subject: bundle.subject.clone(),
                reason: e.to_string(),
            })?;
            debug!(subject = %bundle.subject, "local slot acquired");
            worker::invoke(&bundle, &argv).await
        });

        TaskHandle::new(subject, task)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::worker::tests::{bundle_in, sh};

    #[test]
    fn test_pool_size_defaults_to_host() {
        assert_eq!(LocalExecutor::new(None, sh("true")).max_workers(), host_cores());
        assert_eq!(LocalExecutor::new(Some(0), sh("true")).max_workers(), 1);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new(Some(1), sh("sleep 0.3"));

        let start = Instant::now();
        let handles: Vec<_> = ["A", "B"]
            .iter()
            .map(|n| executor.submit(bundle_in(dir.path(), n)))
            .collect();
        for handle in handles {
            handle.join().await.unwrap();
        }

        // One slot: the two sleeps cannot overlap
        assert!(start.elapsed() >= Duration::from_millis(600));
    }
}
