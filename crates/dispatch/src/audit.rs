//! Drift detection between a device's output and its baseline.
//!
//! Compares line by line after normalizing both sides:
//! - Lines in the baseline but not on the device (missing)
//! - Lines on the device but not in the baseline (extra)
//! - Lines present on both sides but changed (paired)

use crate::types::{DiffEntry, OutcomeStatus};
use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffOp, capture_diff_slices};

/// Normalization applied to both sides before comparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditOptions {
    /// Ignore whitespace at the end of lines
    pub trim_trailing_whitespace: bool,
    /// Drop empty lines entirely
    pub ignore_blank_lines: bool,
    /// Drop lines starting with any of these (after leading whitespace)
    pub ignore_line_prefixes: Vec<String>,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            trim_trailing_whitespace: true,
            ignore_blank_lines: true,
            ignore_line_prefixes: Vec::new(),
        }
    }
}

/// Result of comparing one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditResult {
    /// `DiffClean` or `DiffFound`
    pub status: OutcomeStatus,
    pub diff: Vec<DiffEntry>,
}

impl AuditResult {
    pub fn is_clean(&self) -> bool {
        self.diff.is_empty()
    }
}

/// Compare actual device output against the expected baseline.
pub fn compare(actual: &str, expected: &str, options: &AuditOptions) -> AuditResult {
    let expected_lines = normalize(expected, options);
    let actual_lines = normalize(actual, options);

    let old: Vec<&str> = expected_lines.iter().map(|(_, l)| l.as_str()).collect();
    let new: Vec<&str> = actual_lines.iter().map(|(_, l)| l.as_str()).collect();

    let anchor = |index: usize| -> usize {
        expected_lines
            .get(index)
            .map(|(line, _)| *line)
            .unwrap_or_else(|| expected_lines.last().map_or(1, |(line, _)| line + 1))
    };

    let mut diff = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, &old, &new) {
        match op {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                for (line, text) in &expected_lines[old_index..old_index + old_len] {
                    diff.push(DiffEntry {
                        line: *line,
                        expected: Some(text.clone()),
                        actual: None,
                    });
                }
            }
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => {
                for (_, text) in &actual_lines[new_index..new_index + new_len] {
                    diff.push(DiffEntry {
                        line: anchor(old_index),
                        expected: None,
                        actual: Some(text.clone()),
                    });
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                for k in 0..old_len.max(new_len) {
                    let expected = (k < old_len).then(|| expected_lines[old_index + k].1.clone());
                    let actual = (k < new_len).then(|| actual_lines[new_index + k].1.clone());
                    let line = if k < old_len {
                        expected_lines[old_index + k].0
                    } else {
                        anchor(old_index + old_len)
                    };
                    diff.push(DiffEntry {
                        line,
                        expected,
                        actual,
                    });
                }
            }
        }
    }

    let status = if diff.is_empty() {
        OutcomeStatus::DiffClean
    } else {
        OutcomeStatus::DiffFound
    };

    AuditResult { status, diff }
}

/// Normalize text into (original 1-indexed line number, line) pairs.
fn normalize(text: &str, options: &AuditOptions) -> Vec<(usize, String)> {
    text.lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let line = if options.trim_trailing_whitespace {
                raw.trim_end()
            } else {
                raw
            };
            if options.ignore_blank_lines && line.trim().is_empty() {
                return None;
            }
            let leading = line.trim_start();
            if options
                .ignore_line_prefixes
                .iter()
                .any(|prefix| !prefix.is_empty() && leading.starts_with(prefix.as_str()))
            {
                return None;
            }
            Some((i + 1, line.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(line: usize, expected: Option<&str>, actual: Option<&str>) -> DiffEntry {
        DiffEntry {
            line,
            expected: expected.map(str::to_string),
            actual: actual.map(str::to_string),
        }
    }

    const BASELINE: &str = "hostname core-1\nntp server 10.0.0.1\nlogging host 10.0.0.9\n";

    #[test]
    fn test_identical_is_clean() {
        let result = compare(BASELINE, BASELINE, &AuditOptions::default());
        assert_eq!(result.status, OutcomeStatus::DiffClean);
        assert!(result.is_clean());
    }

    #[test]
    fn test_trailing_whitespace_and_blank_lines_ignored_by_default() {
        let actual = "hostname core-1   \n\nntp server 10.0.0.1\nlogging host 10.0.0.9\n\n";
        let result = compare(actual, BASELINE, &AuditOptions::default());
        assert!(result.is_clean());
    }

    #[test]
    fn test_strict_options_see_whitespace() {
        let options = AuditOptions {
            trim_trailing_whitespace: false,
            ignore_blank_lines: false,
            ignore_line_prefixes: Vec::new(),
        };
        let result = compare("a \nb\n", "a\nb\n", &options);
        assert_eq!(result.diff, vec![entry(1, Some("a"), Some("a "))]);
    }

    #[test]
    fn test_changed_line_is_paired() {
        let actual = "hostname core-1\nntp server 10.0.0.2\nlogging host 10.0.0.9\n";
        let result = compare(actual, BASELINE, &AuditOptions::default());
        assert_eq!(result.status, OutcomeStatus::DiffFound);
        assert_eq!(
            result.diff,
            vec![entry(
                2,
                Some("ntp server 10.0.0.1"),
                Some("ntp server 10.0.0.2")
            )]
        );
    }

    #[test]
    fn test_missing_line() {
        let actual = "hostname core-1\nlogging host 10.0.0.9\n";
        let result = compare(actual, BASELINE, &AuditOptions::default());
        assert_eq!(result.diff, vec![entry(2, Some("ntp server 10.0.0.1"), None)]);
    }

    #[test]
    fn test_extra_line_at_end_anchors_after_last_baseline_line() {
        let actual = format!("{BASELINE}snmp-server community public\n");
        let result = compare(&actual, BASELINE, &AuditOptions::default());
        assert_eq!(
            result.diff,
            vec![entry(4, None, Some("snmp-server community public"))]
        );
    }

    #[test]
    fn test_line_numbers_refer_to_original_baseline() {
        let baseline = "a\n\nb\n\nc\n";
        let result = compare("a\nb\nX\n", baseline, &AuditOptions::default());
        assert_eq!(result.diff, vec![entry(5, Some("c"), Some("X"))]);
    }

    #[test]
    fn test_ignored_prefixes() {
        let options = AuditOptions {
            ignore_line_prefixes: vec!["!".into(), "Building configuration".into()],
            ..AuditOptions::default()
        };
        let actual = "Building configuration...\n!\nhostname core-1\n  ! comment\n";
        let result = compare(actual, "hostname core-1\n", &options);
        assert!(result.is_clean());
    }

    #[test]
    fn test_empty_actual_reports_every_baseline_line() {
        let result = compare("", BASELINE, &AuditOptions::default());
        assert_eq!(result.diff.len(), 3);
        assert!(result.diff.iter().all(|d| d.actual.is_none()));
    }

    #[test]
    fn test_compare_is_idempotent() {
        let actual = "hostname core-2\nntp server 10.0.0.1\n";
        let first = compare(actual, BASELINE, &AuditOptions::default());
        let second = compare(actual, BASELINE, &AuditOptions::default());
        assert_eq!(first, second);
    }
}
