//! # dispatch
//!
//! Concurrent fan-out of one rendered payload to a fleet of devices.
//!
//! This crate provides:
//! - A bounded worker pool that dispatches to every device in parallel
//! - Per-device deadlines, retries with backoff, and failure isolation
//! - Line-level audit diffs against a per-device baseline
//! - A request-ordered [`RunReport`] with an overall status
//!
//! Transports are plugged in through the [`Connector`] trait.
//!
//! ## Example
//!
//! ```
//! use dispatch::{
//!     Connector, ConnectorError, Deadline, Device, Engine, RunConfig, RunMode,
//! };
//! use std::sync::Arc;
//! use template::RenderedPayload;
//!
//! struct Loopback;
//!
//! impl Connector for Loopback {
//!     fn name(&self) -> &str {
//!         "loopback"
//!     }
//!
//!     fn send(
//!         &self,
//!         _device: &Device,
//!         payload: &RenderedPayload,
//!         _deadline: &Deadline,
//!     ) -> Result<String, ConnectorError> {
//!         Ok(payload.as_str().to_string())
//!     }
//! }
//!
//! let engine = Engine::new(Arc::new(Loopback));
//! let devices = vec![Device::new("sw1", "10.0.0.1"), Device::new("sw2", "10.0.0.2")];
//! let payload = RenderedPayload::new("ntp server 10.0.0.1");
//!
//! let report = engine.run_simple(&payload, &devices, RunMode::Audit, &RunConfig::default())?;
//! assert!(report.is_success());
//! assert_eq!(report.outcomes[1].device_id, "sw2");
//! # Ok::<(), dispatch::EngineError>(())
//! ```

pub mod audit;
pub mod cancel;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod report;
pub mod types;
mod worker;

#[cfg(test)]
mod testing;

pub use audit::{AuditOptions, AuditResult, compare};
pub use cancel::{CancelToken, Deadline};
pub use config::{MAX_CONCURRENCY_LIMIT, MAX_PER_DEVICE_TIMEOUT, RunConfig};
pub use context::{Connector, NoObserver, RunObserver};
pub use engine::{Engine, RunControl, validate_devices};
pub use error::{
    ConnectorError, ConnectorErrorKind, EngineError, Result, ValidationError, ValidationErrorKind,
};
pub use report::{OverallStatus, RunHeader, RunReport, StatusCounts, generate_run_id};
pub use types::{Connection, Device, DeviceOutcome, DiffEntry, OutcomeStatus, RunMode};
