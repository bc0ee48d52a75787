// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Slurm integration for the batch executors.
//!
//! Architecture:
//! - A single block job (`sbatch`) holds the requested nodes for the run
//! - Tasks are launched into that block as job steps (or Flux jobs)
//! - The block is cancelled once every task has been joined

pub mod slurm;
pub mod types;

pub use slurm::SlurmCli;
pub use types::BlockRequest;
