// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Error taxonomy of a run.
//!
//! - [`ValidationError`] and [`ConfigurationError`] abort the run before any
//!   task is submitted.
//! - [`WorkerFailure`] is scoped to one subject and never aborts its siblings.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::subject::ReadRole;

/// Inputs or host prerequisites are unusable
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("No input reads given")]
    NoInputs,

    #[error("Missing paired read: {} ({role} mate of {})", missing.display(), present.display())]
    MissingPairedRead {
        /// The counterpart that should have been among the inputs
        missing: PathBuf,
        /// Role of the missing file
        role: ReadRole,
        /// The file whose mate is missing
        present: PathBuf,
    },

    #[error("Input {} has no usable file name", path.display())]
    InvalidFileName { path: PathBuf },

    #[error(
        "Subject '{subject}' is claimed by both {} and {}",
        first.display(),
        second.display()
    )]
    ConflictingReads {
        subject: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Missing {name} executable in PATH.\n\nPlease ensure {name} is installed")]
    MissingExecutable { name: String },

    #[error(
        "Missing container image at {}\n\nEither specify another image with --container\nOr build or pull the image first",
        path.display()
    )]
    MissingContainer { path: PathBuf },
}

/// The executor configuration is contradictory or incomplete
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("--slurm and --flux are mutually exclusive")]
    ConflictingBackends,

    #[error("The {backend} backend requires a launcher path (--flux-path)")]
    MissingLauncher { backend: &'static str },

    #[error("Launcher not found at {}", path.display())]
    LauncherNotFound { path: PathBuf },

    #[error("Invalid walltime '{value}', expected HH:MM:SS")]
    InvalidWalltime { value: String },

    #[error("Node count must be at least 1")]
    InvalidNodeCount,

    #[error(
        "Output directory {} lies inside the staging directory {}, which is removed on every run",
        outputs.display(),
        staging.display()
    )]
    OutputsInStaging { outputs: PathBuf, staging: PathBuf },
}

/// The worker for one subject did not succeed
#[derive(Error, Debug)]
pub enum WorkerFailure {
    #[error("Worker for '{subject}' exited with {status}, see {}", log.display())]
    Exited {
        subject: String,
        status: ExitStatus,
        log: PathBuf,
    },

    #[error("Failed to launch worker for '{subject}': {source}")]
    Launch {
        subject: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prepare {} for '{subject}': {source}", path.display())]
    Prepare {
        subject: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Task for '{subject}' did not run to completion: {reason}")]
    Aborted { subject: String, reason: String },
}
