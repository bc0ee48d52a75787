// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Worker invocation contract.
//!
//! The worker is an opaque program inside a container image. For each
//! subject it receives the path of a JSON parameter bundle as its last
//! argument, runs with the subject directory as working directory, and
//! writes combined stdout/stderr to the bundle's log file. Exit status 0
//! means success.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::config::BaseParams;
use crate::error::WorkerFailure;
use crate::resources::ResourceEstimate;
use crate::subject::{Subject, SubjectSet};

/// Bundle file written into each subject directory
pub const PARAMS_FILE: &str = "params.json";

/// Combined stdout/stderr of the worker
pub const WORKER_LOG: &str = "worker.stdout";

/// Everything the worker needs for one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBundle {
    pub subject: String,
    #[serde(flatten)]
    pub base: BaseParams,
    /// Subject directory, owned by this subject alone
    pub work_dir: PathBuf,
    pub input_reads: Vec<PathBuf>,
    /// Worker log location
    pub stdout: PathBuf,
    pub cores: usize,
    pub memory_gb: f64,
}

impl ParameterBundle {
    pub fn new(subject: &Subject, base: &BaseParams, outputs: &Path, resources: &ResourceEstimate) -> Self {
        let work_dir = outputs.join(&subject.name);
        Self {
            subject: subject.name.clone(),
            base: base.clone(),
            stdout: work_dir.join(WORKER_LOG),
            work_dir,
            input_reads: subject.input_paths(),
            cores: resources.cores_per_task,
            memory_gb: resources.memory_per_task_gb,
        }
    }

    pub fn params_path(&self) -> PathBuf {
        self.work_dir.join(PARAMS_FILE)
    }
}

/// One bundle per subject, in subject order
pub fn build_bundles(
    subjects: &SubjectSet,
    base: &BaseParams,
    outputs: &Path,
    resources: &ResourceEstimate,
) -> Vec<ParameterBundle> {
    subjects
        .iter()
        .map(|s| ParameterBundle::new(s, base, outputs, resources))
        .collect()
}

/// Command line that starts the worker, minus the bundle path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// `<runtime> exec --cleanenv <image> <entrypoint>`
    pub fn container(runtime: &str, image: &Path, entrypoint: &str) -> Self {
        Self {
            program: runtime.to_string(),
            args: vec![
                "exec".to_string(),
                "--cleanenv".to_string(),
                image.display().to_string(),
                entrypoint.to_string(),
            ],
        }
    }

    /// Full argv for one bundle
    pub fn argv(&self, bundle: &ParameterBundle) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv.push(bundle.params_path().display().to_string());
        argv
    }
}

/// Write the bundle, run `argv` to completion and map its exit status.
///
/// `argv` is the worker command, possibly wrapped by a scheduler launcher.
pub async fn invoke(bundle: &ParameterBundle, argv: &[String]) -> Result<(), WorkerFailure> {
    let subject = &bundle.subject;
    let prepare = |path: &Path, source: io::Error| WorkerFailure::Prepare {
        subject: subject.clone(),
        path: path.to_path_buf(),
        source,
    };

    let params_path = bundle.params_path();
    let params = serde_json::to_vec_pretty(bundle).map_err(|e| prepare(&params_path, e.into()))?;
    tokio::fs::write(&params_path, params)
        .await
        .map_err(|e| prepare(&params_path, e))?;

    let log = File::create(&bundle.stdout).map_err(|e| prepare(&bundle.stdout, e))?;
    let log_err = log.try_clone().map_err(|e| prepare(&bundle.stdout, e))?;

    let (program, args) = argv.split_first().ok_or_else(|| WorkerFailure::Launch {
        subject: subject.clone(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "empty worker command"),
    })?;

    debug!(subject = %subject, command = %argv.join(" "), "starting worker");
    let status = Command::new(program)
        .args(args)
        .current_dir(&bundle.work_dir)
        .env("SINGULARITY_BIND", &bundle.work_dir)
        .env("APPTAINER_BIND", &bundle.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .status()
        .await
        .map_err(|source| WorkerFailure::Launch {
            subject: subject.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(WorkerFailure::Exited {
            subject: subject.clone(),
            status,
            log: bundle.stdout.clone(),
        })
    }
}
