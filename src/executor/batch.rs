// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Batch executors (Slurm and Flux).
//!
//! Both hold one exclusive block of nodes for the whole run and pack tasks
//! onto it by cores and memory per task. They differ only in how a task is
//! launched into the block:
//! - Slurm: `srun --jobid <block> ...` job steps
//! - Flux: a `flux start` instance spans the block and tasks go through
//!   `flux proxy slurm:<block> flux run ...`

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::TaskHandle;
use crate::config::{is_executable, SchedulerParams};
use crate::error::{ConfigurationError, WorkerFailure};
use crate::resources::ResourceEstimate;
use crate::slurm::{BlockRequest, SlurmCli};
use crate::worker::{self, ParameterBundle, WorkerCommand};

/// Name of the block script written to the block directory
pub const BLOCK_SCRIPT: &str = "block.sbatch";

/// Interval between scheduler polls while the block starts up
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls of the Flux instance before giving up
const FLUX_READY_ATTEMPTS: u32 = 60;

/// How tasks are launched into the block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    Srun,
    Flux { path: PathBuf },
}

impl Launcher {
    /// Flux launcher, which must point at an existing executable
    pub fn flux(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let path = path.ok_or(ConfigurationError::MissingLauncher { backend: "flux" })?;
        if !is_executable(path) {
            return Err(ConfigurationError::LauncherNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(Launcher::Flux {
            path: path.to_path_buf(),
        })
    }

    /// What the block job runs while it holds its nodes
    pub fn block_body(&self, nodes: u32) -> String {
        match self {
            Launcher::Srun => "exec sleep infinity".to_string(),
            Launcher::Flux { path } => format!(
                "exec srun --nodes={nodes} --ntasks={nodes} --ntasks-per-node=1 --mpi=none {} start sleep infinity",
                path.display()
            ),
        }
    }

    /// Command prefix that runs one task inside block `jobid`
    pub fn task_prefix(&self, jobid: u32, resources: &ResourceEstimate) -> Vec<String> {
        match self {
            Launcher::Srun => vec![
                "srun".to_string(),
                format!("--jobid={jobid}"),
                "--nodes=1".to_string(),
                "--ntasks=1".to_string(),
                format!("--cpus-per-task={}", resources.cores_per_task),
                format!("--mem={}M", resources.memory_mib()),
                "--exact".to_string(),
                "--".to_string(),
            ],
            // flux run schedules cores only; memory reaches the worker via params.json
            Launcher::Flux { path } => {
                let flux = path.display().to_string();
                vec![
                    flux.clone(),
                    "proxy".to_string(),
                    format!("slurm:{jobid}"),
                    flux,
                    "run".to_string(),
                    "--nodes=1".to_string(),
                    "--ntasks=1".to_string(),
                    format!("--cores-per-task={}", resources.cores_per_task),
                ]
            }
        }
    }
}

#[derive(Debug)]
pub struct BatchExecutor {
    launcher: Launcher,
    request: BlockRequest,
    resources: ResourceEstimate,
    worker: WorkerCommand,
    slurm: SlurmCli,
    script_path: PathBuf,
    poll_interval: Duration,
    /// Job id of the block once submitted
    block: Option<u32>,
}

impl BatchExecutor {
    pub fn new(
        launcher: Launcher,
        scheduler: &SchedulerParams,
        resources: ResourceEstimate,
        worker: WorkerCommand,
        block_dir: &Path,
    ) -> Self {
        Self {
            launcher,
            request: BlockRequest {
                job_name: block_job_name(),
                nodes: scheduler.nodes_per_block,
                partition: scheduler.partition.clone(),
                walltime: scheduler.walltime.clone(),
                account: scheduler.account.clone(),
                exclusive: true,
            },
            resources,
            worker,
            slurm: SlurmCli::default(),
            script_path: block_dir.join(BLOCK_SCRIPT),
            poll_interval: POLL_INTERVAL,
            block: None,
        }
    }

    /// Use other Slurm client programs and poll interval
    #[cfg(test)]
    pub(crate) fn with_slurm(mut self, slurm: SlurmCli, poll_interval: Duration) -> Self {
        self.slurm = slurm;
        self.poll_interval = poll_interval;
        self
    }

    /// Batch script that allocates the block
    pub fn block_script(&self) -> String {
        self.request
            .render_script(&self.launcher.block_body(self.request.nodes))
    }

    /// Full command line of one task inside block `jobid`
    pub fn task_argv(&self, jobid: u32, bundle: &ParameterBundle) -> Vec<String> {
        let mut argv = self.launcher.task_prefix(jobid, &self.resources);
        argv.extend(self.worker.argv(bundle));
        argv
    }

    /// Submit the block and wait until it holds its nodes
    pub async fn start(&mut self) -> Result<()> {
        if self.block.is_some() {
            return Ok(());
        }

        tokio::fs::write(&self.script_path, self.block_script())
            .await
            .with_context(|| format!("Failed to write {}", self.script_path.display()))?;

        let jobid = self.slurm.submit_batch(&self.script_path).await?;
        self.block = Some(jobid);
        info!(
            jobid,
            nodes = self.request.nodes,
            partition = %self.request.partition,
            walltime = %self.request.walltime,
            "submitted block job"
        );

        let job = self.slurm.wait_until_running(jobid, self.poll_interval).await?;
        match self.slurm.expand_nodelist(&job.nodelist).await {
            Ok(hosts) => info!(
                jobid,
                nodes = job.num_nodes,
                hosts = %hosts.join(","),
                account = %job.account,
                time_limit = %job.time_limit,
                "block is running"
            ),
            Err(e) => warn!(jobid, error = %e, "block is running, cannot expand its nodelist"),
        }

        if let Launcher::Flux { path } = &self.launcher {
            wait_for_flux(path, jobid, self.poll_interval).await?;
        }
        Ok(())
    }

    pub fn submit(&self, bundle: ParameterBundle) -> TaskHandle {
        let subject = bundle.subject.clone();
        let argv = self.block.map(|jobid| self.task_argv(jobid, &bundle));

        let task = tokio::spawn(async move {
            let argv = argv.ok_or_else(|| WorkerFailure::Aborted {
                subject: bundle.subject.clone(),
                reason: "no block allocation, executor was not started".to_string(),
            })?;
            worker::invoke(&bundle, &argv).await
        });

        TaskHandle::new(subject, task)
    }

    /// Cancel the block, if one was submitted
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(jobid) = self.block.take() {
            self.slurm.cancel_job(jobid).await?;
            info!(jobid, "released block");
        }
        Ok(())
    }
}

fn block_job_name() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("mappgene-{host}")
}

/// Wait until the Flux instance inside block `jobid` answers
async fn wait_for_flux(flux: &Path, jobid: u32, poll: Duration) -> Result<()> {
    let uri = format!("slurm:{jobid}");
    for attempt in 1..=FLUX_READY_ATTEMPTS {
        let status = Command::new(flux)
            .args(["uri", &uri])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to execute {}", flux.display()))?;
        if status.success() {
            info!(jobid, "flux instance is up");
            return Ok(());
        }
        debug!(jobid, attempt, "flux instance not reachable yet");
        tokio::time::sleep(poll).await;
    }
    bail!("Flux instance in block {} did not come up", jobid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::tests::{bundle_in, sh};

    fn scheduler() -> SchedulerParams {
        SchedulerParams {
            nodes_per_block: 2,
            partition: "pbatch".to_string(),
            walltime: "11:59:00".to_string(),
            account: "asccasc".to_string(),
            flux_path: None,
        }
    }

    fn resources() -> ResourceEstimate {
        ResourceEstimate {
            cores_per_task: 4,
            memory_per_task_gb: 2.0,
        }
    }

    #[test]
    fn test_srun_task_argv() {
        let dir = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(Launcher::Srun, &scheduler(), resources(), sh("true"), dir.path());
        let bundle = bundle_in(dir.path(), "S1");

        let argv = executor.task_argv(777, &bundle);
        assert_eq!(
            &argv[..8],
            &[
                "srun",
                "--jobid=777",
                "--nodes=1",
                "--ntasks=1",
                "--cpus-per-task=4",
                "--mem=1908M",
                "--exact",
                "--"
            ]
        );
        assert_eq!(&argv[8..10], &["sh", "-c"]);
        assert_eq!(argv.last().unwrap(), &bundle.params_path().display().to_string());
    }

    #[test]
    fn test_flux_task_argv() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Launcher::Flux {
            path: PathBuf::from("/opt/flux/bin/flux"),
        };
        let executor = BatchExecutor::new(launcher, &scheduler(), resources(), sh("true"), dir.path());
        let bundle = bundle_in(dir.path(), "S1");

        let argv = executor.task_argv(9, &bundle);
        assert_eq!(
            &argv[..8],
            &[
                "/opt/flux/bin/flux",
                "proxy",
                "slurm:9",
                "/opt/flux/bin/flux",
                "run",
                "--nodes=1",
                "--ntasks=1",
                "--cores-per-task=4"
            ]
        );
    }

    #[test]
    fn test_block_script_carries_directives() {
        let dir = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(Launcher::Srun, &scheduler(), resources(), sh("true"), dir.path());
        let script = executor.block_script();

        assert!(executor.request.exclusive);
        assert!(executor.request.job_name.starts_with("mappgene-"));
        assert!(script.contains("#SBATCH --exclusive\n#SBATCH -A asccasc\n"));
        assert!(script.contains("#SBATCH --nodes=2\n"));
        assert!(script.trim_end().ends_with("exec sleep infinity"));
    }

    #[test]
    fn test_flux_block_starts_instance_on_every_node() {
        let launcher = Launcher::Flux {
            path: PathBuf::from("/opt/flux/bin/flux"),
        };
        assert_eq!(
            launcher.block_body(3),
            "exec srun --nodes=3 --ntasks=3 --ntasks-per-node=1 --mpi=none /opt/flux/bin/flux start sleep infinity"
        );
    }

    #[test]
    fn test_flux_launcher_validation() {
        assert_eq!(
            Launcher::flux(None),
            Err(ConfigurationError::MissingLauncher { backend: "flux" })
        );
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Launcher::flux(Some(dir.path())),
            Err(ConfigurationError::LauncherNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_before_start_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let executor = BatchExecutor::new(Launcher::Srun, &scheduler(), resources(), sh("true"), dir.path());

        let handle = executor.submit(bundle_in(dir.path(), "S1"));
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, WorkerFailure::Aborted { .. }));
        assert!(!dir.path().join("S1").join("worker.stdout").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_block_lifecycle() {
        use crate::slurm::slurm::tests::fake_slurm;

        let dir = tempfile::tempdir().unwrap();
        let slurm = fake_slurm(
            dir.path(),
            "echo 'JobId=4242 JobState=RUNNING Reason=None NodeList=node[1-2] NumNodes=2 Account=asccasc'",
        );
        let mut executor = BatchExecutor::new(Launcher::Srun, &scheduler(), resources(), sh("true"), dir.path())
            .with_slurm(slurm, Duration::from_millis(10));

        executor.start().await.unwrap();
        assert_eq!(executor.block, Some(4242));
        let script = std::fs::read_to_string(dir.path().join(BLOCK_SCRIPT)).unwrap();
        assert!(script.contains("#SBATCH --exclusive\n#SBATCH -A asccasc\n"));

        executor.shutdown().await.unwrap();
        assert_eq!(executor.block, None);
        let cancelled = std::fs::read_to_string(dir.path().join("cancelled")).unwrap();
        assert_eq!(cancelled, "4242\n");

        // A second shutdown has nothing left to release
        executor.shutdown().await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("cancelled")).unwrap(), "4242\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_block_that_never_runs_is_still_released() {
        use crate::slurm::slurm::tests::fake_slurm;

        let dir = tempfile::tempdir().unwrap();
        let slurm = fake_slurm(dir.path(), "echo 'JobId=4242 JobState=CANCELLED Reason=None'");
        let mut executor = BatchExecutor::new(Launcher::Srun, &scheduler(), resources(), sh("true"), dir.path())
            .with_slurm(slurm, Duration::from_millis(10));

        let err = executor.start().await.unwrap_err();
        assert!(err.to_string().contains("ended before it started running"), "{err}");
        assert_eq!(executor.block, Some(4242));

        executor.shutdown().await.unwrap();
        let cancelled = std::fs::read_to_string(dir.path().join("cancelled")).unwrap();
        assert_eq!(cancelled, "4242\n");
    }

    #[tokio::test]
    async fn test_shutdown_without_block_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = BatchExecutor::new(Launcher::Srun, &scheduler(), resources(), sh("true"), dir.path());
        executor.shutdown().await.unwrap();
    }
}
