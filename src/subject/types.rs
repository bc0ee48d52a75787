// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Pairing role of a read file, inferred from its `_R1`/`_R2` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadRole {
    Unpaired,
    R1,
    R2,
}

impl ReadRole {
    /// The marker this role carries in a file name
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            ReadRole::Unpaired => None,
            ReadRole::R1 => Some("_R1"),
            ReadRole::R2 => Some("_R2"),
        }
    }

    /// The role of the other file in a pair
    pub fn mate(&self) -> Option<ReadRole> {
        match self {
            ReadRole::Unpaired => None,
            ReadRole::R1 => Some(ReadRole::R2),
            ReadRole::R2 => Some(ReadRole::R1),
        }
    }

    pub fn is_paired(&self) -> bool {
        !matches!(self, ReadRole::Unpaired)
    }
}

impl fmt::Display for ReadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadRole::Unpaired => write!(f, "unpaired"),
            ReadRole::R1 => write!(f, "R1"),
            ReadRole::R2 => write!(f, "R2"),
        }
    }
}

/// A sequencing read file found on the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Path exactly as it takes part in pairing checks
    pub path: PathBuf,
    /// Pairing role from the file name
    pub role: ReadRole,
    /// Size on disk in bytes (0 when the file could not be inspected)
    pub size_bytes: u64,
}

impl InputFile {
    /// Size in decimal gigabytes
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 * 1.0e-9
    }
}

/// One unit of work: every read file belonging to a single sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    /// Files in the order they were first seen (1 or 2 entries)
    pub files: Vec<InputFile>,
}

impl Subject {
    pub fn is_paired(&self) -> bool {
        self.files.iter().any(|f| f.role.is_paired())
    }

    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Subjects keyed by name, iterated in first-seen order
#[derive(Debug, Clone, Default)]
pub struct SubjectSet {
    subjects: Vec<Subject>,
    index: HashMap<String, usize>,
}

impl SubjectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Subject> {
        self.index.get(name).map(|&i| &self.subjects[i])
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Subject> {
        self.subjects.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.subjects.iter().map(|s| s.name.as_str())
    }

    /// Get the subject called `name`, creating it (empty) when unseen.
    /// The flag is true when the subject was created by this call.
    pub(super) fn entry(&mut self, name: &str) -> (&mut Subject, bool) {
        match self.index.get(name) {
            Some(&i) => (&mut self.subjects[i], false),
            None => {
                self.index.insert(name.to_string(), self.subjects.len());
                self.subjects.push(Subject {
                    name: name.to_string(),
                    files: Vec::new(),
                });
                let last = self.subjects.len() - 1;
                (&mut self.subjects[last], true)
            }
        }
    }
}

impl FromIterator<Subject> for SubjectSet {
    /// Collect subjects; files of a repeated name are appended to the first.
    fn from_iter<I: IntoIterator<Item = Subject>>(iter: I) -> Self {
        let mut set = SubjectSet::new();
        for subject in iter {
            let (entry, _) = set.entry(&subject.name);
            entry.files.extend(subject.files);
        }
        set
    }
}

impl<'a> IntoIterator for &'a SubjectSet {
    type Item = &'a Subject;
    type IntoIter = std::slice::Iter<'a, Subject>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
