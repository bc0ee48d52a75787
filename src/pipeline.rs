// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! End-to-end run: validate, group, stage, size, dispatch.
//!
//! Everything that can fail for the run as a whole happens before the first
//! task is submitted.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::dispatch::{self, DispatchReport};
use crate::executor::{self, Executor};
use crate::resources;
use crate::staging::StagingArea;
use crate::subject;
use crate::worker::{build_bundles, ParameterBundle, WorkerCommand};

/// Run every subject of `config` to completion
pub fn run(config: &RunConfig) -> Result<DispatchReport> {
    config.check_layout()?;
    config.check_prerequisites()?;

    let inputs = input_reads(config)?;
    let subjects = subject::group(&inputs)?;
    info!(
        subjects = subjects.len(),
        paired = subjects.iter().filter(|s| s.is_paired()).count(),
        inputs = inputs.len(),
        "grouped inputs"
    );
    debug!(names = ?subjects.names().collect::<Vec<_>>(), "subjects");

    let resources = resources::estimate(&subjects, config.use_full_node);
    info!(
        cores_per_task = resources.cores_per_task,
        memory_per_task_gb = resources.memory_per_task_gb,
        "resource estimate"
    );

    fs::create_dir_all(&config.outputs)
        .with_context(|| format!("Failed to create output directory {}", config.outputs.display()))?;

    let worker = WorkerCommand::container(&config.worker.runtime, &config.base.container, &config.worker.entrypoint);
    let executor = executor::configure(&config.executor, resources, worker, &config.outputs)?;
    if let Executor::Local(local) = &executor {
        info!(max_workers = local.max_workers(), "local worker pool");
    }

    let staging = StagingArea::prepare(&config.staging_dir, &config.template_dir())?;
    let bundles = build_bundles(&subjects, &config.base, &config.outputs, &resources);
    for bundle in &bundles {
        staging.stage_subject(&bundle.work_dir)?;
    }
    info!(staging = %staging.path().display(), subjects = bundles.len(), "staged work directories");
    staging.remove()?;

    dispatch_all(bundles, executor)
}

/// Start the executor, dispatch, and release the executor again
fn dispatch_all(bundles: Vec<ParameterBundle>, mut executor: Executor) -> Result<DispatchReport> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        if let Err(e) = executor.start().await {
            if let Err(cleanup) = executor.shutdown().await {
                warn!(error = %cleanup, "failed to release executor");
            }
            return Err(e.context(format!("Failed to start {} executor", executor.kind().name())));
        }

        let report = dispatch::run(bundles, &executor).await;

        if let Err(e) = executor.shutdown().await {
            warn!(error = %e, "failed to release executor");
        }
        Ok(report)
    })
}

/// Reads given on the command line, or the bundled examples in test mode
pub fn input_reads(config: &RunConfig) -> Result<Vec<PathBuf>> {
    if config.test_mode {
        example_inputs(&config.example_inputs_dir())
    } else {
        Ok(config.inputs.clone())
    }
}

fn example_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut reads: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read example inputs in {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".fastq.gz"))
        })
        .collect();
    reads.sort();
    Ok(reads)
}
