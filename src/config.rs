// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Immutable run configuration.
//!
//! Everything here is built once from the command line before any work
//! starts. [`BaseParams`] is cloned into every subject's bundle, never shared
//! mutably.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ValidationError};

/// Primer scheme handed to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Primers {
    #[value(name = "400")]
    #[serde(rename = "400")]
    Bp400,
    #[value(name = "1200")]
    #[serde(rename = "1200")]
    Bp1200,
    #[value(name = "v4")]
    #[serde(rename = "v4")]
    V4,
    #[value(name = "v4.1")]
    #[serde(rename = "v4.1")]
    V4_1,
    #[value(name = "combo_3_4.1")]
    #[serde(rename = "combo_3_4.1")]
    Combo3V4_1,
}

impl fmt::Display for Primers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Primers::Bp400 => "400",
            Primers::Bp1200 => "1200",
            Primers::V4 => "v4",
            Primers::V4_1 => "v4.1",
            Primers::Combo3V4_1 => "combo_3_4.1",
        };
        f.write_str(s)
    }
}

/// Processing options shared by every subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseParams {
    /// Container image the worker runs in
    pub container: PathBuf,
    /// Read length written to the V-pipe sample sheet
    pub read_length: u32,
    /// iVar variant frequency cutoff
    pub variant_frequency: f64,
    /// iVar: keep reads longer than this many base pairs
    pub read_cutoff_bp: u32,
    /// Drop duplicated reads/pairs
    pub dedup: bool,
    pub primers_bp: Primers,
    /// lofreq coverage depth cap
    pub depth_cap: f64,
    /// Threads for the fastp filtering step
    pub threads: u32,
    /// Bases trimmed from start/end of each read
    pub trim_front_tail: u32,
}

/// Which executor runs the tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Slurm,
    Flux,
}

impl BackendKind {
    /// Resolve the scheduler flags; at most one may be set.
    pub fn from_flags(slurm: bool, flux: bool) -> Result<Self, ConfigurationError> {
        match (slurm, flux) {
            (true, true) => Err(ConfigurationError::ConflictingBackends),
            (true, false) => Ok(BackendKind::Slurm),
            (false, true) => Ok(BackendKind::Flux),
            (false, false) => Ok(BackendKind::Local),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Slurm => "slurm",
            BackendKind::Flux => "flux",
        }
    }
}

/// Parameters passed through to the batch scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerParams {
    pub nodes_per_block: u32,
    pub partition: String,
    /// Wallclock limit, `HH:MM:SS`
    pub walltime: String,
    /// Bank/account charged for the allocation
    pub account: String,
    /// Path of the `flux` binary (Flux backend only)
    pub flux_path: Option<PathBuf>,
}

impl SchedulerParams {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.nodes_per_block == 0 {
            return Err(ConfigurationError::InvalidNodeCount);
        }
        validate_walltime(&self.walltime)
    }
}

/// Check a `HH:MM:SS` wallclock limit
pub fn validate_walltime(value: &str) -> Result<(), ConfigurationError> {
    let invalid = || ConfigurationError::InvalidWalltime {
        value: value.to_string(),
    };

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid());
    }

    let minutes: u32 = parts[1].parse().map_err(|_| invalid())?;
    let seconds: u32 = parts[2].parse().map_err(|_| invalid())?;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }
    Ok(())
}

/// Executor selection, fixed for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub kind: BackendKind,
    pub scheduler: SchedulerParams,
    /// Upper bound on concurrent local workers (host parallelism when unset)
    pub max_local_workers: Option<usize>,
}

/// How the worker is started inside its container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Container runtime binary, looked up on `PATH`
    pub runtime: String,
    /// Program inside the image that consumes a parameter bundle
    pub entrypoint: String,
}

/// Everything a run needs, resolved to absolute paths
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base: BaseParams,
    pub executor: ExecutorConfig,
    pub worker: WorkerSettings,
    /// Read files to process
    pub inputs: Vec<PathBuf>,
    /// Use the bundled example inputs instead of `inputs`
    pub test_mode: bool,
    /// Root under which one directory per subject is created
    pub outputs: PathBuf,
    /// Holds `extra_files/` (template) and `example_inputs/`
    pub data_dir: PathBuf,
    /// Shared staging directory, recreated for every run
    pub staging_dir: PathBuf,
    pub use_full_node: bool,
}

impl RunConfig {
    /// Template copied into every subject directory
    pub fn template_dir(&self) -> PathBuf {
        self.data_dir.join("extra_files")
    }

    /// Directory scanned for `*.fastq.gz` in test mode
    pub fn example_inputs_dir(&self) -> PathBuf {
        self.data_dir.join("example_inputs")
    }

    /// Outputs must survive the staging directory being recreated
    pub fn check_layout(&self) -> Result<(), ConfigurationError> {
        if self.outputs.starts_with(&self.staging_dir) {
            return Err(ConfigurationError::OutputsInStaging {
                outputs: self.outputs.clone(),
                staging: self.staging_dir.clone(),
            });
        }
        Ok(())
    }

    /// Container runtime on `PATH` and container image on disk
    pub fn check_prerequisites(&self) -> Result<(), ValidationError> {
        if find_executable(&self.worker.runtime).is_none() {
            return Err(ValidationError::MissingExecutable {
                name: self.worker.runtime.clone(),
            });
        }
        // Sandbox images are directories
        if !self.base.container.exists() {
            return Err(ValidationError::MissingContainer {
                path: self.base.container.clone(),
            });
        }
        Ok(())
    }
}

/// Resolve `path` against `cwd` unless it is already absolute
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Locate an executable by name on `PATH`, or check it directly if `name`
/// contains a path separator.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}
