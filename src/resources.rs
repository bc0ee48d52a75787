// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Per-task resource sizing.
//!
//! One estimate covers the whole run: the executor is configured once, so
//! every task reserves what the largest subject needs.

use serde::{Deserialize, Serialize};

use crate::subject::SubjectSet;

/// Lower bound for the memory reserved per task, in GB
pub const MIN_MEMORY_GB: f64 = 0.1;

/// Peak worker memory relative to the size of one input file
pub const MEMORY_PER_INPUT_GB: f64 = 2.0;

/// Cores and memory reserved for every task of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    pub cores_per_task: usize,
    pub memory_per_task_gb: f64,
}

impl ResourceEstimate {
    /// Memory per task in MiB, rounded up (Slurm's `--mem` unit)
    pub fn memory_mib(&self) -> u64 {
        (self.memory_per_task_gb * 1.0e9 / (1024.0 * 1024.0)).ceil() as u64
    }
}

/// Number of cores on the dispatching host
pub fn host_cores() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Estimate resources for `subjects` on this host
pub fn estimate(subjects: &SubjectSet, use_full_node: bool) -> ResourceEstimate {
    estimate_with_cores(subjects, use_full_node, host_cores())
}

/// Estimate resources assuming a node with `node_cores` cores.
///
/// A full-node task takes every core, otherwise tasks are packed one core
/// each. Memory is the largest `2 x file size` over all inputs, never below
/// [`MIN_MEMORY_GB`].
pub fn estimate_with_cores(subjects: &SubjectSet, use_full_node: bool, node_cores: usize) -> ResourceEstimate {
    let cores_per_task = if use_full_node { node_cores.max(1) } else { 1 };

    let memory_per_task_gb = subjects
        .iter()
        .flat_map(|s| s.files.iter())
        .map(|f| MEMORY_PER_INPUT_GB * f.size_gb())
        .fold(MIN_MEMORY_GB, f64::max);

    ResourceEstimate {
        cores_per_task,
        memory_per_task_gb,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::subject::types::InputFile;
    use crate::subject::{ReadRole, Subject};

    fn file(name: &str, role: ReadRole, size_bytes: u64) -> InputFile {
        InputFile {
            path: PathBuf::from(name),
            role,
            size_bytes,
        }
    }

    fn subject(name: &str, files: Vec<InputFile>) -> Subject {
        Subject {
            name: name.to_string(),
            files,
        }
    }

    #[test]
    fn test_worst_case_memory() {
        let subjects: SubjectSet = vec![
            subject(
                "A",
                vec![
                    file("A_R1.fastq.gz", ReadRole::R1, 1_000_000_000),
                    file("A_R2.fastq.gz", ReadRole::R2, 1_000_000_000),
                ],
            ),
            subject("B", vec![file("B.fastq.gz", ReadRole::Unpaired, 10_000_000)]),
        ]
        .into_iter()
        .collect();
        let est = estimate_with_cores(&subjects, false, 16);
        assert!((est.memory_per_task_gb - 2.0).abs() < 1e-9);
        assert_eq!(est.cores_per_task, 1);
    }

    #[test]
    fn test_memory_floor() {
        let subjects: SubjectSet = vec![
            subject("tiny", vec![file("tiny.fastq", ReadRole::Unpaired, 1024)]),
            subject("empty", vec![file("empty.fastq", ReadRole::Unpaired, 0)]),
        ]
        .into_iter()
        .collect();
        let est = estimate_with_cores(&subjects, false, 4);
        assert_eq!(est.memory_per_task_gb, MIN_MEMORY_GB);
    }

    #[test]
    fn test_memory_is_monotonic_in_file_size() {
        let mut size = 1_000_000u64;
        let mut last = 0.0;
        for _ in 0..12 {
            let subjects: SubjectSet = std::iter::once(subject(
                "S",
                vec![
                    file("S_R1.fastq.gz", ReadRole::R1, size),
                    file("S_R2.fastq.gz", ReadRole::R2, 5_000_000),
                ],
            ))
            .collect();
            let est = estimate_with_cores(&subjects, false, 1);
            assert!(est.memory_per_task_gb >= last);
            last = est.memory_per_task_gb;
            size *= 2;
        }
    }

    #[test]
    fn test_full_node_takes_all_cores() {
        let subjects: SubjectSet = std::iter::once(subject("B", vec![file("B.fastq.gz", ReadRole::Unpaired, 1)])).collect();
        assert_eq!(estimate_with_cores(&subjects, true, 48).cores_per_task, 48);
        assert_eq!(estimate_with_cores(&subjects, false, 48).cores_per_task, 1);
        assert_eq!(estimate(&subjects, true).cores_per_task, host_cores());
        assert_eq!(estimate(&subjects, false).cores_per_task, 1);
    }

    #[test]
    fn test_memory_mib() {
        let est = ResourceEstimate {
            cores_per_task: 1,
            memory_per_task_gb: 2.0,
        };
        assert_eq!(est.memory_mib(), 1908);
    }
}
