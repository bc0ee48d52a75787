// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Working directory staging.
//!
//! A shared staging directory is filled from the template once per run and
//! then copied into each subject's own directory, so subjects never write
//! into a shared tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

/// The shared staging directory of one run
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Recreate `root` and fill it from `template` (skipped when absent)
    pub fn prepare(root: &Path, template: &Path) -> Result<Self> {
        remove_if_exists(root)
            .with_context(|| format!("Failed to clear staging directory {}", root.display()))?;
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create staging directory {}", root.display()))?;

        if template.is_dir() {
            copy_dir_all(template, root)
                .with_context(|| format!("Failed to copy template {}", template.display()))?;
            info!(template = %template.display(), staging = %root.display(), "staged template");
        } else {
            debug!(template = %template.display(), "no template directory, staging empty tree");
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Give a subject its own copy of the staged tree
    pub fn stage_subject(&self, subject_dir: &Path) -> Result<()> {
        fs::create_dir_all(subject_dir)
            .with_context(|| format!("Failed to create {}", subject_dir.display()))?;
        copy_dir_all(&self.root, subject_dir)
            .with_context(|| format!("Failed to stage {}", subject_dir.display()))
    }

    /// Delete the staging directory
    pub fn remove(self) -> Result<()> {
        remove_if_exists(&self.root)
            .with_context(|| format!("Failed to remove staging directory {}", self.root.display()))
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Recursively copy the contents of `src` into `dst`, overwriting files
fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_copies_template() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("extra_files");
        fs::create_dir_all(template.join("refs")).unwrap();
        fs::write(template.join("refs/primers.bed"), "chr1\t1\t2\n").unwrap();
        fs::write(template.join("config.yaml"), "k: v\n").unwrap();

        let root = dir.path().join("tmp");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("stale"), "old").unwrap();

        let staging = StagingArea::prepare(&root, &template).unwrap();
        assert!(!root.join("stale").exists());
        assert!(root.join("config.yaml").is_file());
        assert_eq!(
            fs::read_to_string(root.join("refs/primers.bed")).unwrap(),
            "chr1\t1\t2\n"
        );

        let subject_dir = dir.path().join("out/S1");
        staging.stage_subject(&subject_dir).unwrap();
        assert!(subject_dir.join("refs/primers.bed").is_file());

        staging.remove().unwrap();
        assert!(!root.exists());
        assert!(subject_dir.join("config.yaml").is_file());
    }

    #[test]
    fn test_missing_template_gives_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tmp");
        let staging = StagingArea::prepare(&root, &dir.path().join("nope")).unwrap();
        assert_eq!(staging.path(), root.as_path());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }
}
