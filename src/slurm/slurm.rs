// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Slurm CLI integration: submit, inspect and cancel the block job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Job state as reported by Slurm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Configuring,
    Running,
    Completing,
    Completed,
    Cancelled,
    Failed,
    Timeout,
    NodeFail,
    Preempted,
    OutOfMemory,
    BootFail,
    Deadline,
    Revoked,
    SpecialExit,
    Unknown(String),
}

impl From<&str> for JobState {
    fn from(s: &str) -> Self {
        // scontrol may append a reason, e.g. "CANCELLED by 1234"
        let state = s.split_whitespace().next().unwrap_or("").to_uppercase();
        match state.as_str() {
            "PENDING" | "PD" => JobState::Pending,
            "CONFIGURING" | "CF" => JobState::Configuring,
            "RUNNING" | "R" => JobState::Running,
            "COMPLETING" | "CG" => JobState::Completing,
            "COMPLETED" | "CD" => JobState::Completed,
            "CANCELLED" | "CA" => JobState::Cancelled,
            "FAILED" | "F" => JobState::Failed,
            "TIMEOUT" | "TO" => JobState::Timeout,
            "NODE_FAIL" | "NF" => JobState::NodeFail,
            "PREEMPTED" | "PR" => JobState::Preempted,
            "OUT_OF_MEMORY" | "OOM" => JobState::OutOfMemory,
            "BOOT_FAIL" | "BF" => JobState::BootFail,
            "DEADLINE" | "DL" => JobState::Deadline,
            "REVOKED" | "RV" => JobState::Revoked,
            "SPECIAL_EXIT" | "SE" => JobState::SpecialExit,
            _ => JobState::Unknown(state),
        }
    }
}

impl JobState {
    /// Nodes are allocated and job steps can be launched
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    /// Still waiting for its allocation
    pub fn is_waiting(&self) -> bool {
        matches!(self, JobState::Pending | JobState::Configuring)
    }

    /// The job will never run (again)
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobState::Completing
                | JobState::Completed
                | JobState::Cancelled
                | JobState::Failed
                | JobState::Timeout
                | JobState::NodeFail
                | JobState::Preempted
                | JobState::OutOfMemory
                | JobState::BootFail
                | JobState::Deadline
                | JobState::Revoked
                | JobState::SpecialExit
        )
    }
}

/// What the block job looks like to Slurm
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub job_id: u32,
    pub name: String,
    pub state: JobState,
    /// Why a pending job is waiting
    pub reason: String,
    /// Compact nodelist (e.g., "node[001-003]")
    pub nodelist: String,
    pub num_nodes: u32,
    pub partition: String,
    pub account: String,
    pub time_limit: String,
}

/// Consecutive `scontrol` failures tolerated while waiting for the block
const SCONTROL_RETRIES: u32 = 3;

/// Consecutive polls in a state we cannot classify before giving up
const MAX_UNKNOWN_POLLS: u32 = 12;

/// Slurm client programs used to manage the block job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmCli {
    pub sbatch: PathBuf,
    pub scontrol: PathBuf,
    pub scancel: PathBuf,
}

impl Default for SlurmCli {
    fn default() -> Self {
        Self {
            sbatch: PathBuf::from("sbatch"),
            scontrol: PathBuf::from("scontrol"),
            scancel: PathBuf::from("scancel"),
        }
    }
}

impl SlurmCli {
    /// Submit a batch script, returning the job id
    pub async fn submit_batch(&self, script: &Path) -> Result<u32> {
        let output = Command::new(&self.sbatch)
            .arg("--parsable")
            .arg(script)
            .output()
            .await
            .context("Failed to execute sbatch")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("sbatch rejected {}: {}", script.display(), stderr.trim());
        }

        parse_sbatch_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Get job information from Slurm via scontrol
    pub async fn get_job_info(&self, jobid: u32) -> Result<JobInfo> {
        let output = Command::new(&self.scontrol)
            .args(["show", "job", &jobid.to_string(), "--oneliner"])
            .output()
            .await
            .context("Failed to execute scontrol")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Invalid job id") || stderr.contains("not found") {
                return Err(anyhow!("Job {} not found", jobid));
            }
            return Err(anyhow!("scontrol failed: {}", stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_scontrol_output(&stdout, jobid)
    }

    /// Poll the job until its nodes are allocated.
    ///
    /// Fails if the job ends before it ever runs, if `scontrol` keeps
    /// failing, or if the job stays in a state we do not recognize.
    pub async fn wait_until_running(&self, jobid: u32, poll: Duration) -> Result<JobInfo> {
        let mut last_reason = String::new();
        let mut failures = 0;
        let mut unknown = 0;
        loop {
            let info = match self.get_job_info(jobid).await {
                Ok(info) => {
                    failures = 0;
                    info
                }
                Err(e) => {
                    failures += 1;
                    if failures >= SCONTROL_RETRIES {
                        return Err(e.context(format!("Lost track of block job {}", jobid)));
                    }
                    warn!(jobid, attempt = failures, error = %e, "scontrol failed, retrying");
                    tokio::time::sleep(poll).await;
                    continue;
                }
            };

            if info.state.is_running() {
                return Ok(info);
            }
            if info.state.is_finished() {
                bail!(
                    "Block job {} ended before it started running (state: {:?}, reason: {})",
                    jobid,
                    info.state,
                    info.reason
                );
            }
            if info.state.is_waiting() {
                unknown = 0;
                if info.reason != last_reason {
                    info!(
                        jobid,
                        name = %info.name,
                        partition = %info.partition,
                        reason = %info.reason,
                        "waiting for block allocation"
                    );
                    last_reason = info.reason.clone();
                }
            } else {
                unknown += 1;
                if unknown >= MAX_UNKNOWN_POLLS {
                    bail!("Block job {} stuck in unexpected state {:?}", jobid, info.state);
                }
                warn!(jobid, state = ?info.state, "block job in unexpected state");
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Expand a Slurm nodelist to individual hostnames
    ///
    /// Uses `scontrol show hostnames` which handles all Slurm nodelist formats.
    pub async fn expand_nodelist(&self, nodelist: &str) -> Result<Vec<String>> {
        if nodelist.is_empty() || nodelist == "(null)" {
            return Ok(Vec::new());
        }

        let output = Command::new(&self.scontrol)
            .args(["show", "hostnames", nodelist])
            .output()
            .await
            .context("Failed to execute scontrol show hostnames")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Failed to expand nodelist '{}': {}", nodelist, stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Release the block
    pub async fn cancel_job(&self, jobid: u32) -> Result<()> {
        let status = Command::new(&self.scancel)
            .arg(jobid.to_string())
            .status()
            .await
            .context("Failed to execute scancel")?;

        if !status.success() {
            bail!("scancel {} failed with {}", jobid, status);
        }
        debug!(jobid, "cancelled block job");
        Ok(())
    }
}

/// Parse `sbatch --parsable` output: `<jobid>` or `<jobid>;<cluster>`
fn parse_sbatch_output(output: &str) -> Result<u32> {
    let line = output
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| anyhow!("Empty sbatch output"))?;
    let id = line.trim().split(';').next().unwrap_or("");
    id.parse()
        .with_context(|| format!("Unexpected sbatch output '{}'", line.trim()))
}

/// Parse scontrol show job output (oneliner format)
fn parse_scontrol_output(output: &str, jobid: u32) -> Result<JobInfo> {
    let line = output
        .lines()
        .find(|l| !l.is_empty())
        .ok_or_else(|| anyhow!("Empty scontrol output"))?;

    let mut info = JobInfo {
        job_id: jobid,
        name: String::new(),
        state: JobState::Unknown(String::new()),
        reason: String::new(),
        nodelist: String::new(),
        num_nodes: 0,
        partition: String::new(),
        account: String::new(),
        time_limit: String::new(),
    };

    for part in line.split_whitespace() {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key {
            "JobId" => info.job_id = value.parse().unwrap_or(jobid),
            "JobName" => info.name = value.to_string(),
            "JobState" => info.state = JobState::from(value),
            "Reason" => info.reason = value.to_string(),
            "NodeList" => info.nodelist = value.to_string(),
            "NumNodes" => {
                // May be a range such as "2-4" while pending
                info.num_nodes = value.split('-').next().and_then(|n| n.parse().ok()).unwrap_or(0);
            }
            "Partition" => info.partition = value.to_string(),
            "Account" => info.account = value.to_string(),
            "TimeLimit" => info.time_limit = value.to_string(),
            _ => {}
        }
    }

    Ok(info)
}
