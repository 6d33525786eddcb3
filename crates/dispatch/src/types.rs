//! Core types for dispatch runs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How to reach a device. Interpreted only by connectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Host name, `host:port`, or URL
    pub address: String,
    /// Transport name (e.g. "ssh", "http"); connectors pick a default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Opaque credential reference (key path, env var name, vault path)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,
}

/// A target device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique identifier within a run
    pub id: String,
    /// Connection descriptor
    pub connection: Connection,
    /// Expected output, used only in audit mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
}

impl Device {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connection: Connection {
                address: address.into(),
                transport: None,
                credential_ref: None,
            },
            baseline: None,
        }
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.connection.transport = Some(transport.into());
        self
    }

    pub fn with_credential_ref(mut self, credential_ref: impl Into<String>) -> Self {
        self.connection.credential_ref = Some(credential_ref.into());
        self
    }

    pub fn with_baseline(mut self, baseline: impl Into<String>) -> Self {
        self.baseline = Some(baseline.into());
        self
    }
}

/// What a run does with the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Apply the payload to each device
    Push,
    /// Compare each device's output against its baseline
    Audit,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Audit => "audit",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Timeout,
    DiffFound,
    DiffClean,
    Cancelled,
}

impl OutcomeStatus {
    /// Whether this status counts as success for the overall run
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::DiffClean)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::DiffFound => "diff_found",
            Self::DiffClean => "diff_clean",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line-level difference between baseline and actual output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Baseline line the difference anchors to (1-indexed)
    pub line: usize,
    /// Baseline text, absent when the device has an extra line
    pub expected: Option<String>,
    /// Device text, absent when the device is missing the line
    pub actual: Option<String>,
}

/// Terminal result for one device.
///
/// Built only through the status constructors, which keep `error` present
/// exactly when the status is not a success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOutcome {
    pub device_id: String,
    pub status: OutcomeStatus,
    /// Raw device output, possibly truncated
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub output_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<DiffEntry>,
}

impl DeviceOutcome {
    fn new(device_id: &str, status: OutcomeStatus, error: Option<String>) -> Self {
        Self {
            device_id: device_id.to_string(),
            status,
            output: String::new(),
            output_truncated: false,
            error,
            elapsed: Duration::ZERO,
            retry_count: 0,
            diff: Vec::new(),
        }
    }

    pub fn success(device_id: &str) -> Self {
        Self::new(device_id, OutcomeStatus::Success, None)
    }

    pub fn failed(device_id: &str, error: impl Into<String>) -> Self {
        Self::new(device_id, OutcomeStatus::Failed, Some(error.into()))
    }

    pub fn timeout(device_id: &str, timeout: Duration) -> Self {
        Self::new(
            device_id,
            OutcomeStatus::Timeout,
            Some(format!("no response within {}ms", timeout.as_millis())),
        )
    }

    pub fn cancelled(device_id: &str, reason: impl Into<String>) -> Self {
        Self::new(device_id, OutcomeStatus::Cancelled, Some(reason.into()))
    }

    /// Audit result: clean when `diff` is empty
    pub fn audited(device_id: &str, diff: Vec<DiffEntry>) -> Self {
        if diff.is_empty() {
            return Self::new(device_id, OutcomeStatus::DiffClean, None);
        }
        let noun = if diff.len() == 1 { "line" } else { "lines" };
        let mut outcome = Self::new(
            device_id,
            OutcomeStatus::DiffFound,
            Some(format!("{} {noun} differ from baseline", diff.len())),
        );
        outcome.diff = diff;
        outcome
    }

    pub fn with_output(mut self, output: String, truncated: bool) -> Self {
        self.output = output;
        self.output_truncated = truncated;
        self
    }

    pub fn with_timing(mut self, elapsed: Duration, retry_count: u32) -> Self {
        self.elapsed = elapsed;
        self.retry_count = retry_count;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Truncate to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_output(mut output: String, max_bytes: usize) -> (String, bool) {
    if output.len() <= max_bytes {
        return (output, false);
    }
    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    (output, true)
}

/// Serialize `Duration` as whole milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
