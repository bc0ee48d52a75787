// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Execution backends.
//!
//! The backends form a closed set behind one interface: [`configure`] builds
//! an [`Executor`] once per run, [`Executor::submit`] turns a bundle into a
//! running task without blocking, and [`TaskHandle::join`] waits for it.
//! Backend quirks (e.g. Flux needing its launcher binary) are validated at
//! configure time.

pub mod batch;
pub mod local;

use std::path::Path;

use anyhow::Result;
use tokio::task::JoinHandle;

pub use batch::{BatchExecutor, Launcher};
pub use local::LocalExecutor;

use crate::config::{BackendKind, ExecutorConfig};
use crate::error::{ConfigurationError, WorkerFailure};
use crate::resources::ResourceEstimate;
use crate::worker::{ParameterBundle, WorkerCommand};

/// A configured backend
#[derive(Debug)]
pub enum Executor {
    Local(LocalExecutor),
    Slurm(BatchExecutor),
    Flux(BatchExecutor),
}

/// Build the executor for a run.
///
/// `block_dir` is where batch backends write their block script.
pub fn configure(
    config: &ExecutorConfig,
    resources: ResourceEstimate,
    worker: WorkerCommand,
    block_dir: &Path,
) -> Result<Executor, ConfigurationError> {
    match config.kind {
        BackendKind::Local => Ok(Executor::Local(LocalExecutor::new(config.max_local_workers, worker))),
        BackendKind::Slurm => {
            config.scheduler.validate()?;
            Ok(Executor::Slurm(BatchExecutor::new(
                Launcher::Srun,
                &config.scheduler,
                resources,
                worker,
                block_dir,
            )))
        }
        BackendKind::Flux => {
            config.scheduler.validate()?;
            let launcher = Launcher::flux(config.scheduler.flux_path.as_deref())?;
            Ok(Executor::Flux(BatchExecutor::new(
                launcher,
                &config.scheduler,
                resources,
                worker,
                block_dir,
            )))
        }
    }
}

impl Executor {
    pub fn kind(&self) -> BackendKind {
        match self {
            Executor::Local(_) => BackendKind::Local,
            Executor::Slurm(_) => BackendKind::Slurm,
            Executor::Flux(_) => BackendKind::Flux,
        }
    }

    /// Acquire whatever the backend needs before the first submission
    pub async fn start(&mut self) -> Result<()> {
        match self {
            Executor::Local(_) => Ok(()),
            Executor::Slurm(batch) | Executor::Flux(batch) => batch.start().await,
        }
    }

    /// Launch the worker for `bundle`. Never blocks; must be called from
    /// within the tokio runtime.
    pub fn submit(&self, bundle: ParameterBundle) -> TaskHandle {
        match self {
            Executor::Local(local) => local.submit(bundle),
            Executor::Slurm(batch) | Executor::Flux(batch) => batch.submit(bundle),
        }
    }

    /// Release backend resources once every handle has been joined
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Executor::Local(_) => Ok(()),
            Executor::Slurm(batch) | Executor::Flux(batch) => batch.shutdown().await,
        }
    }
}

/// A submitted, possibly still running task
#[derive(Debug)]
pub struct TaskHandle {
    subject: String,
    inner: JoinHandle<Result<(), WorkerFailure>>,
}

impl TaskHandle {
    pub(crate) fn new(subject: String, inner: JoinHandle<Result<(), WorkerFailure>>) -> Self {
        Self { subject, inner }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait for the task and return the worker's outcome
    pub async fn join(self) -> Result<(), WorkerFailure> {
        match self.inner.await {
            Ok(result) => result,
            Err(e) => Err(WorkerFailure::Aborted {
                subject: self.subject,
                reason: e.to_string(),
            }),
        }
    }
}
