// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Block requests: the batch job that holds the nodes tasks are packed onto.

/// One allocation ("block") requested from Slurm for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRequest {
    /// Job name shown in squeue
    pub job_name: String,
    pub nodes: u32,
    pub partition: String,
    /// Wallclock limit, `HH:MM:SS`
    pub walltime: String,
    /// Bank/account charged
    pub account: String,
    /// Request the nodes for this job alone
    pub exclusive: bool,
}

impl BlockRequest {
    /// Directives passed to the scheduler verbatim
    pub fn scheduler_options(&self) -> String {
        let mut options = String::new();
        if self.exclusive {
            options.push_str("#SBATCH --exclusive\n");
        }
        options.push_str(&format!("#SBATCH -A {}\n", self.account));
        options
    }

    /// Render the batch script that holds the block while running `body`
    pub fn render_script(&self, body: &str) -> String {
        format!(
            "#!/bin/bash\n\
             #SBATCH --job-name={name}\n\
             #SBATCH --nodes={nodes}\n\
             #SBATCH --partition={partition}\n\
             #SBATCH --time={walltime}\n\
             #SBATCH --output=/dev/null\n\
             {options}\n\
             {body}\n",
            name = self.job_name,
            nodes = self.nodes,
            partition = self.partition,
            walltime = self.walltime,
            options = self.scheduler_options(),
            body = body,
        )
    }
}
