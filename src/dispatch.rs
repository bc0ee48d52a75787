// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Fan-out / fan-in over subjects.
//!
//! Every bundle is submitted before the first join, so all subjects run
//! concurrently up to the executor's own limits. Handles are then joined in
//! submission order; a failure is recorded for its subject and the
//! remaining handles are still joined.

use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::error::WorkerFailure;
use crate::executor::Executor;
use crate::worker::ParameterBundle;

/// How one subject's worker ended
#[derive(Debug)]
pub struct SubjectOutcome {
    pub subject: String,
    pub result: Result<(), WorkerFailure>,
    /// Time from submission until the join returned
    pub elapsed: Duration,
}

impl SubjectOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of a run, in submission order
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<SubjectOutcome>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &SubjectOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SubjectOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(SubjectOutcome::is_success)
    }
}

/// Run one task per bundle on `executor` and wait for all of them
pub async fn run(bundles: Vec<ParameterBundle>, executor: &Executor) -> DispatchReport {
    let started = Instant::now();
    let total = bundles.len();

    let handles: Vec<_> = bundles
        .into_iter()
        .map(|bundle| {
            info!(subject = %bundle.subject, work_dir = %bundle.work_dir.display(), "submitting");
            executor.submit(bundle)
        })
        .collect();
    info!(tasks = total, backend = executor.kind().name(), "all tasks submitted");

    let mut report = DispatchReport::default();
    for handle in handles {
        let subject = handle.subject().to_string();
        let result = handle.join().await;
        let elapsed = started.elapsed();
        match &result {
            Ok(()) => info!(subject = %subject, elapsed = ?elapsed, "subject finished"),
            Err(e) => error!(subject = %subject, elapsed = ?elapsed, error = %e, "subject failed"),
        }
        report.outcomes.push(SubjectOutcome {
            subject,
            result,
            elapsed,
        });
    }

    report
}
