//! Run report aggregation

use crate::types::{DeviceOutcome, OutcomeStatus, RunMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use template::RenderedPayload;

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    AllSuccess,
    PartialFailure,
    AllFailed,
}

impl OverallStatus {
    /// Pure fold over outcomes.
    ///
    /// `AllSuccess` iff there is at least one outcome and every one is a
    /// success; `AllFailed` iff none is; otherwise `PartialFailure`.
    pub fn from_outcomes(outcomes: &[DeviceOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        if succeeded == 0 {
            Self::AllFailed
        } else if succeeded == outcomes.len() {
            Self::AllSuccess
        } else {
            Self::PartialFailure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllSuccess => "all_success",
            Self::PartialFailure => "partial_failure",
            Self::AllFailed => "all_failed",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of outcomes per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failed: usize,
    pub timeout: usize,
    pub diff_found: usize,
    pub diff_clean: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn from_outcomes(outcomes: &[DeviceOutcome]) -> Self {
        let mut counts = Self::default();
        for outcome in outcomes {
            counts.add(outcome.status);
        }
        counts
    }

    fn add(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Success => self.success += 1,
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::Timeout => self.timeout += 1,
            OutcomeStatus::DiffFound => self.diff_found += 1,
            OutcomeStatus::DiffClean => self.diff_clean += 1,
            OutcomeStatus::Cancelled => self.cancelled += 1,
        }
        self.total += 1;
    }

    /// Outcomes that count as success
    pub fn succeeded(&self) -> usize {
        self.success + self.diff_clean
    }
}

/// Identity of a run, fixed at submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHeader {
    pub run_id: String,
    pub submitted_at: DateTime<Utc>,
    pub mode: RunMode,
}

/// Complete, request-ordered result of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: RunMode,
    pub status: OverallStatus,
    pub counts: StatusCounts,
    pub outcomes: Vec<DeviceOutcome>,
}

impl RunReport {
    /// Build a report. `outcomes` must already be in request order.
    pub fn aggregate(
        header: RunHeader,
        finished_at: DateTime<Utc>,
        outcomes: Vec<DeviceOutcome>,
    ) -> Self {
        Self {
            run_id: header.run_id,
            submitted_at: header.submitted_at,
            finished_at,
            mode: header.mode,
            status: OverallStatus::from_outcomes(&outcomes),
            counts: StatusCounts::from_outcomes(&outcomes),
            outcomes,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OverallStatus::AllSuccess
    }

    /// Find the outcome for a device
    pub fn outcome(&self, device_id: &str) -> Option<&DeviceOutcome> {
        self.outcomes.iter().find(|o| o.device_id == device_id)
    }

    /// Outcomes that did not succeed, in request order
    pub fn unsuccessful(&self) -> impl Iterator<Item = &DeviceOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Derive a run identifier from what was submitted.
///
/// Hashes the submission time, a process-wide counter, the payload and the
/// device ids, so two runs never share an id within a process.
pub fn generate_run_id<'a>(
    submitted_at: DateTime<Utc>,
    payload: &RenderedPayload,
    device_ids: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(submitted_at.to_rfc3339().as_bytes());
    hasher.update(&RUN_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(payload.as_str().as_bytes());
    for id in device_ids {
        hasher.update(id.as_bytes());
        hasher.update(&[0]);
    }
    let hex = hasher.finalize().to_hex();
    format!("run-{}", &hex[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcomes(statuses: &[OutcomeStatus]) -> Vec<DeviceOutcome> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let id = format!("d{i}");
                match status {
                    OutcomeStatus::Success => DeviceOutcome::success(&id),
                    OutcomeStatus::Failed => DeviceOutcome::failed(&id, "x"),
                    OutcomeStatus::Timeout => DeviceOutcome::timeout(&id, Duration::from_secs(1)),
                    OutcomeStatus::DiffClean => DeviceOutcome::audited(&id, Vec::new()),
                    OutcomeStatus::DiffFound => DeviceOutcome::audited(
                        &id,
                        vec![crate::types::DiffEntry {
                            line: 1,
                            expected: None,
                            actual: Some("x".into()),
                        }],
                    ),
                    OutcomeStatus::Cancelled => DeviceOutcome::cancelled(&id, "stop"),
                }
            })
            .collect()
    }

    #[test]
    fn test_overall_status_fold() {
        use OutcomeStatus::*;
        assert_eq!(
            OverallStatus::from_outcomes(&outcomes(&[Success, DiffClean])),
            OverallStatus::AllSuccess
        );
        assert_eq!(
            OverallStatus::from_outcomes(&outcomes(&[Success, Timeout])),
            OverallStatus::PartialFailure
        );
        assert_eq!(
            OverallStatus::from_outcomes(&outcomes(&[Failed, DiffFound, Cancelled])),
            OverallStatus::AllFailed
        );
        assert_eq!(OverallStatus::from_outcomes(&[]), OverallStatus::AllFailed);
    }

    #[test]
    fn test_overall_status_ignores_order() {
        use OutcomeStatus::*;
        let mut list = outcomes(&[Success, Failed, Timeout]);
        let forward = OverallStatus::from_outcomes(&list);
        list.reverse();
        assert_eq!(forward, OverallStatus::from_outcomes(&list));
    }

    #[test]
    fn test_counts() {
        use OutcomeStatus::*;
        let counts = StatusCounts::from_outcomes(&outcomes(&[
            Success, Success, Failed, Timeout, DiffClean, DiffFound, Cancelled,
        ]));
        assert_eq!(counts.success, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.timeout, 1);
        assert_eq!(counts.diff_clean, 1);
        assert_eq!(counts.diff_found, 1);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.total, 7);
        assert_eq!(counts.succeeded(), 3);
    }

    #[test]
    fn test_aggregate_keeps_order_and_header() {
        use OutcomeStatus::*;
        let now = Utc::now();
        let header = RunHeader {
            run_id: "run-1".into(),
            submitted_at: now,
            mode: RunMode::Push,
        };
        let report = RunReport::aggregate(header, now, outcomes(&[Failed, Success]));
        assert_eq!(report.run_id, "run-1");
        assert_eq!(report.status, OverallStatus::PartialFailure);
        let ids: Vec<&str> = report.outcomes.iter().map(|o| o.device_id.as_str()).collect();
        assert_eq!(ids, vec!["d0", "d1"]);
        assert_eq!(report.unsuccessful().count(), 1);
        assert!(report.outcome("d1").unwrap().is_success());
    }

    #[test]
    fn test_generated_run_ids_are_unique() {
        let now = Utc::now();
        let payload = RenderedPayload::new("show version");
        let a = generate_run_id(now, &payload, ["sw1", "sw2"]);
        let b = generate_run_id(now, &payload, ["sw1", "sw2"]);
        assert_ne!(a, b);
        assert!(a.starts_with("run-"));
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_report_json_shape() {
        use OutcomeStatus::*;
        let now = Utc::now();
        let header = RunHeader {
            run_id: "r".into(),
            submitted_at: now,
            mode: RunMode::Audit,
        };
        let report = RunReport::aggregate(header, now, outcomes(&[DiffClean]));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "audit");
        assert_eq!(json["status"], "all_success");
        assert_eq!(json["counts"]["diff_clean"], 1);
        assert_eq!(json["outcomes"][0]["status"], "diff_clean");
    }
}
