// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Group read files into subjects.
//!
//! Grouping runs in two passes: every path is parsed into a
//! `(subject, role)` pair first, then the complete input set is checked for
//! missing mates. Only a fully consistent set is turned into subjects, so a
//! failure never leaves half-built state behind.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::parser::{parse_read_name, ReadName};
use super::types::{InputFile, SubjectSet};
use crate::error::ValidationError;

/// Group `inputs` into subjects, in first-seen order.
///
/// Fails when an `R1` file lacks its `R2` counterpart (or vice versa), when
/// two files claim the same slot of one subject, or when nothing was given.
pub fn group(inputs: &[PathBuf]) -> Result<SubjectSet, ValidationError> {
    if inputs.is_empty() {
        return Err(ValidationError::NoInputs);
    }

    let parsed = inputs
        .iter()
        .map(|path| parse_path(path).map(|name| (path, name)))
        .collect::<Result<Vec<_>, _>>()?;

    let present: HashSet<&Path> = inputs.iter().map(PathBuf::as_path).collect();
    for (path, name) in &parsed {
        check_mate(path, name, &present)?;
    }

    let mut subjects = SubjectSet::new();
    for (path, name) in parsed {
        let file = InputFile {
            path: path.clone(),
            role: name.role,
            size_bytes: file_size(path),
        };

        let (subject, created) = subjects.entry(&name.subject);
        if created {
            debug!(subject = %subject.name, "new subject");
        }
        if let Some(clash) = subject
            .files
            .iter()
            .find(|existing| existing.role == file.role || !existing.role.is_paired() || !file.role.is_paired())
        {
            return Err(ValidationError::ConflictingReads {
                subject: subject.name.clone(),
                first: clash.path.clone(),
                second: file.path,
            });
        }
        subject.files.push(file);
    }

    Ok(subjects)
}

fn parse_path(path: &Path) -> Result<ReadName, ValidationError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ValidationError::InvalidFileName {
            path: path.to_path_buf(),
        })?;
    Ok(parse_read_name(file_name))
}

fn check_mate(path: &Path, name: &ReadName, present: &HashSet<&Path>) -> Result<(), ValidationError> {
    let (Some(mate_role), Some(file_name)) = (name.role.mate(), path.file_name().and_then(|n| n.to_str())) else {
        return Ok(());
    };
    let Some(mate_name) = name.mate_file_name(file_name) else {
        return Ok(());
    };

    let mate = path.with_file_name(mate_name);
    if present.contains(mate.as_path()) {
        Ok(())
    } else {
        Err(ValidationError::MissingPairedRead {
            missing: mate,
            role: mate_role,
            present: path.to_path_buf(),
        })
    }
}

fn file_size(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read input size, assuming 0 bytes");
            0
        }
    }
}
