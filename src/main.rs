// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod dispatch;
mod error;
mod executor;
mod pipeline;
mod resources;
mod slurm;
mod staging;
mod subject;
mod worker;

use config::{absolutize, BackendKind, BaseParams, ExecutorConfig, Primers, RunConfig, SchedulerParams, WorkerSettings};

#[derive(Parser, Debug)]
#[command(name = "mappgene")]
#[command(about = "Group paired FASTQ reads into subjects and run one containerized worker per subject")]
#[command(version)]
struct Args {
    /// Paths to FASTQ input file(s)
    #[arg(required_unless_present = "test")]
    inputs: Vec<PathBuf>,

    /// Test using the example inputs
    #[arg(long)]
    test: bool,

    /// Enable deduplication to drop the duplicated reads/pairs
    #[arg(short = 'D', long)]
    dedup: bool,

    /// Number of threads used by fastp filtering step
    #[arg(long, default_value = "4")]
    threads: u32,

    /// Number of NTs to remove from the start/end of read
    #[arg(long = "trim_front_tail", default_value = "10")]
    trim_front_tail: u32,

    /// Path to output directory
    #[arg(short, long, default_value = "mappgene_outputs/")]
    outputs: PathBuf,

    /// Path to Singularity container image
    #[arg(long, default_value = "image.sif")]
    container: PathBuf,

    /// V-pipe: read length in sample.tsv
    #[arg(long = "read-length", default_value = "130")]
    read_length: u32,

    /// iVar: variant frequency cutoff
    #[arg(long = "variant_frequency", default_value = "0.01")]
    variant_frequency: f64,

    /// iVar: keep reads greater than this number of base pairs
    #[arg(long = "read_cutoff_bp", default_value = "30")]
    read_cutoff_bp: u32,

    /// iVar: use primer files with this number of base pairs
    #[arg(long = "primers_bp", value_enum, default_value = "400")]
    primers_bp: Primers,

    /// iVar: lofreq coverage depth cap
    #[arg(long = "depth_cap", default_value = "3e5")]
    depth_cap: f64,

    /// Use the Slurm scheduler
    #[arg(long, conflicts_with = "flux")]
    slurm: bool,

    /// Use the Flux scheduler
    #[arg(long)]
    flux: bool,

    /// Flux: path to the flux binary
    #[arg(long = "flux-path")]
    flux_path: Option<PathBuf>,

    /// Slurm/Flux: number of nodes
    #[arg(short = 'n', long, default_value = "1")]
    nnodes: u32,

    /// Slurm/Flux: use entire node for each subject, disabling per-task memory management
    #[arg(long = "use_full_node")]
    use_full_node: bool,

    /// Slurm/Flux: bank to charge for jobs
    #[arg(short, long, default_value = "asccasc")]
    bank: String,

    /// Slurm/Flux: partition to assign jobs
    #[arg(short, long, default_value = "pbatch")]
    partition: String,

    /// Slurm/Flux: walltime in format HH:MM:SS
    #[arg(short = 't', long, default_value = "11:59:00")]
    walltime: String,

    /// Local: maximum number of concurrent workers (default: all cores)
    #[arg(long = "max-workers")]
    max_workers: Option<usize>,

    /// Directory holding extra_files/ and example_inputs/
    #[arg(long = "data-dir", default_value = "data")]
    data_dir: PathBuf,

    /// Container runtime executable
    #[arg(long, default_value = "singularity")]
    runtime: String,

    /// Worker program inside the container image
    #[arg(long, default_value = "mappgene-worker")]
    entrypoint: String,
}

impl Args {
    /// Resolve paths against the working directory and freeze the configuration
    fn into_config(self) -> Result<RunConfig> {
        let cwd = env::current_dir().context("Failed to determine working directory")?;

        let kind = BackendKind::from_flags(self.slurm, self.flux)?;
        if kind == BackendKind::Local && self.flux_path.is_some() {
            warn!("--flux-path is ignored without --flux");
        }

        let config = RunConfig {
            base: BaseParams {
                container: absolutize(&self.container, &cwd),
                read_length: self.read_length,
                variant_frequency: self.variant_frequency,
                read_cutoff_bp: self.read_cutoff_bp,
                dedup: self.dedup,
                primers_bp: self.primers_bp,
                depth_cap: self.depth_cap,
                threads: self.threads,
                trim_front_tail: self.trim_front_tail,
            },
            executor: ExecutorConfig {
                kind,
                scheduler: SchedulerParams {
                    nodes_per_block: self.nnodes,
                    partition: self.partition,
                    walltime: self.walltime,
                    account: self.bank,
                    flux_path: self.flux_path.map(|p| absolutize(&p, &cwd)),
                },
                max_local_workers: self.max_workers,
            },
            worker: WorkerSettings {
                runtime: self.runtime,
                entrypoint: self.entrypoint,
            },
            inputs: self.inputs.iter().map(|p| absolutize(p, &cwd)).collect(),
            test_mode: self.test,
            outputs: absolutize(&self.outputs, &cwd),
            data_dir: absolutize(&self.data_dir, &cwd),
            staging_dir: cwd.join("tmp"),
            use_full_node: self.use_full_node,
        };
        config.check_layout()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.into_config()?;

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(host = %host, backend = config.executor.kind.name(), outputs = %config.outputs.display(), "starting run");

    let report = pipeline::run(&config)?;

    let failed: Vec<&str> = report.failed().map(|o| o.subject.as_str()).collect();
    info!(
        succeeded = report.succeeded().count(),
        failed = failed.len(),
        "run complete"
    );
    if !report.is_success() {
        bail!(
            "{} of {} subjects failed: {}",
            failed.len(),
            report.outcomes.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let args = Args::try_parse_from(["mappgene", "A_R1.fastq.gz", "A_R2.fastq.gz"]).unwrap();
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.threads, 4);
        assert_eq!(args.trim_front_tail, 10);
        assert_eq!(args.read_length, 130);
        assert_eq!(args.primers_bp, Primers::Bp400);
        assert_eq!(args.depth_cap, 300000.0);
        assert_eq!(args.walltime, "11:59:00");
        assert_eq!(args.bank, "asccasc");
        assert_eq!(args.partition, "pbatch");
        assert!(!args.slurm && !args.flux);
    }

    #[test]
    fn test_schedulers_are_mutually_exclusive() {
        let err = Args::try_parse_from(["mappgene", "--slurm", "--flux", "x.fastq"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_inputs_required_unless_test() {
        assert!(Args::try_parse_from(["mappgene"]).is_err());
        let args = Args::try_parse_from(["mappgene", "--test"]).unwrap();
        assert!(args.inputs.is_empty());
    }

    #[test]
    fn test_primer_choices() {
        let args = Args::try_parse_from(["mappgene", "--primers_bp", "combo_3_4.1", "x.fastq"]).unwrap();
        assert_eq!(args.primers_bp, Primers::Combo3V4_1);
        assert!(Args::try_parse_from(["mappgene", "--primers_bp", "999", "x.fastq"]).is_err());
    }

    #[test]
    fn test_into_config_resolves_paths() {
        let args = Args::try_parse_from([
            "mappgene",
            "--flux",
            "--flux-path",
            "/usr/bin/flux",
            "-n",
            "3",
            "reads/S_R1.fastq.gz",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.executor.kind, BackendKind::Flux);
        assert_eq!(config.executor.scheduler.nodes_per_block, 3);
        assert_eq!(config.executor.scheduler.flux_path, Some(PathBuf::from("/usr/bin/flux")));
        assert!(config.inputs[0].is_absolute());
        assert!(config.inputs[0].ends_with("reads/S_R1.fastq.gz"));
        assert!(config.outputs.is_absolute());
        assert!(config.base.container.ends_with("image.sif"));
        assert_eq!(config.template_dir(), config.data_dir.join("extra_files"));
    }

    #[test]
    fn test_outputs_under_tmp_rejected() {
        let args = Args::try_parse_from(["mappgene", "-o", "tmp/results", "x.fastq"]).unwrap();
        let err = args.into_config().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<error::ConfigurationError>(),
            Some(error::ConfigurationError::OutputsInStaging { .. })
        ));
    }
}
