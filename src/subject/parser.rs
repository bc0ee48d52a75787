// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! File name rules: which sample a read file belongs to and which mate it is.

use std::ops::Range;

use super::types::ReadRole;

/// Recognized read file suffixes, longest first
pub const FASTQ_SUFFIXES: [&str; 2] = [".fastq.gz", ".fastq"];

/// A read file name split into subject identity and pairing role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadName {
    /// Normalized subject name
    pub subject: String,
    pub role: ReadRole,
    /// Byte range of the `_R1`/`_R2` marker within the file name
    marker: Option<Range<usize>>,
}

impl ReadName {
    /// File name of the other mate, if this file is one half of a pair.
    ///
    /// `file_name` must be the name this `ReadName` was parsed from.
    pub fn mate_file_name(&self, file_name: &str) -> Option<String> {
        let range = self.marker.clone()?;
        let mate_marker = self.role.mate()?.marker()?;
        Some(format!(
            "{}{}{}",
            &file_name[..range.start],
            mate_marker,
            &file_name[range.end..]
        ))
    }
}

/// Parse a read file name (no directory part).
///
/// The role marker is the rightmost `_R1` or `_R2` token of the name, minus
/// its FASTQ suffix, that is followed by the end of the name, `_`, `.` or `-`.
/// The subject name is what remains once suffix and marker are removed, with
/// `.` replaced by `_`.
pub fn parse_read_name(file_name: &str) -> ReadName {
    let stem = strip_fastq_suffix(file_name);

    match find_marker(stem) {
        Some((range, role)) => {
            let subject = format!("{}{}", &stem[..range.start], &stem[range.end..]);
            ReadName {
                subject: subject.replace('.', "_"),
                role,
                marker: Some(range),
            }
        }
        None => ReadName {
            subject: stem.replace('.', "_"),
            role: ReadRole::Unpaired,
            marker: None,
        },
    }
}

fn strip_fastq_suffix(name: &str) -> &str {
    FASTQ_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

fn find_marker(stem: &str) -> Option<(Range<usize>, ReadRole)> {
    let bytes = stem.as_bytes();

    stem.rmatch_indices("_R").find_map(|(start, _)| {
        let role = match bytes.get(start + 2) {
            Some(b'1') => ReadRole::R1,
            Some(b'2') => ReadRole::R2,
            _ => return None,
        };
        let end = start + 3;
        // Intentionally stricter than swapping `_R1` for `_R2` anywhere:
        // the marker must end at a boundary, so `S_R10` stays unpaired.
        match bytes.get(end) {
            None | Some(b'_') | Some(b'.') | Some(b'-') => Some((start..end, role)),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paired_names() {
        let r1 = parse_read_name("A_R1.fastq.gz");
        assert_eq!(r1.subject, "A");
        assert_eq!(r1.role, ReadRole::R1);

        let r2 = parse_read_name("A_R2.fastq");
        assert_eq!(r2.subject, "A");
        assert_eq!(r2.role, ReadRole::R2);
    }

    #[test]
    fn test_parse_unpaired_name() {
        let name = parse_read_name("B.fastq.gz");
        assert_eq!(name.subject, "B");
        assert_eq!(name.role, ReadRole::Unpaired);
        assert_eq!(name.mate_file_name("B.fastq.gz"), None);
    }

    #[test]
    fn test_parse_illumina_name() {
        let name = parse_read_name("S12_L001_R2_001.fastq.gz");
        assert_eq!(name.subject, "S12_L001_001");
        assert_eq!(name.role, ReadRole::R2);
        assert_eq!(
            name.mate_file_name("S12_L001_R2_001.fastq.gz").as_deref(),
            Some("S12_L001_R1_001.fastq.gz")
        );
    }

    #[test]
    fn test_dots_are_normalized() {
        let name = parse_read_name("run.7.sample_R1.fastq.gz");
        assert_eq!(name.subject, "run_7_sample");
        assert_eq!(name.role, ReadRole::R1);
    }

    #[test]
    fn test_marker_needs_boundary() {
        // `_R10` is a sample label, not a mate marker
        let name = parse_read_name("plate_R10.fastq.gz");
        assert_eq!(name.role, ReadRole::Unpaired);
        assert_eq!(name.subject, "plate_R10");
        assert_eq!(parse_read_name("S_R20.fastq.gz").role, ReadRole::Unpaired);
    }

    #[test]
    fn test_rightmost_marker_wins() {
        let name = parse_read_name("X_R1_batch_R2.fastq.gz");
        assert_eq!(name.role, ReadRole::R2);
        assert_eq!(name.subject, "X_R1_batch");
        assert_eq!(
            name.mate_file_name("X_R1_batch_R2.fastq.gz").as_deref(),
            Some("X_R1_batch_R1.fastq.gz")
        );
    }

    #[test]
    fn test_mate_file_name() {
        let name = parse_read_name("A_R1.fastq.gz");
        assert_eq!(
            name.mate_file_name("A_R1.fastq.gz").as_deref(),
            Some("A_R2.fastq.gz")
        );
    }

    #[test]
    fn test_unknown_suffix_is_kept() {
        let name = parse_read_name("reads_R1.fq");
        assert_eq!(name.role, ReadRole::R1);
        assert_eq!(name.subject, "reads_fq");
        assert_eq!(name.mate_file_name("reads_R1.fq").as_deref(), Some("reads_R2.fq"));
    }
}
