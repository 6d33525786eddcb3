//! Connector and observer traits
//!
//! These traits keep the engine independent of any transport or UI. The
//! engine only sees a [`Connector`] it was handed at construction and an
//! optional [`RunObserver`] per run.

use crate::cancel::Deadline;
use crate::error::ConnectorError;
use crate::report::RunReport;
use crate::types::{Device, DeviceOutcome};
use template::RenderedPayload;

/// Sends a payload to one device and returns its raw output.
///
/// Implementations are shared across worker threads. Each call is one attempt;
/// retries are the worker's job. A call that outlives `deadline` is abandoned
/// by the worker, so implementations should watch
/// [`Deadline::should_stop`] and release their resources when it turns true.
pub trait Connector: Send + Sync {
    /// Short transport name for logs
    fn name(&self) -> &str;

    /// Deliver `payload` to `device`
    fn send(
        &self,
        device: &Device,
        payload: &RenderedPayload,
        deadline: &Deadline,
    ) -> Result<String, ConnectorError>;
}

/// Receives progress notifications during a run.
///
/// `on_device_start` is called from worker threads; the other callbacks are
/// called from the thread that invoked the run.
pub trait RunObserver: Send + Sync {
    /// Called once, after validation, before any device is contacted
    fn on_run_start(&self, run_id: &str, total: usize);

    /// Called when a worker picks up a device
    fn on_device_start(&self, device_id: &str);

    /// Called as each device reaches its terminal outcome, in completion order
    fn on_device_complete(&self, outcome: &DeviceOutcome);

    /// Called with the final report
    fn on_run_complete(&self, report: &RunReport);
}

/// No-op observer
pub struct NoObserver;

impl RunObserver for NoObserver {
    fn on_run_start(&self, _run_id: &str, _total: usize) {}
    fn on_device_start(&self, _device_id: &str) {}
    fn on_device_complete(&self, _outcome: &DeviceOutcome) {}
    fn on_run_complete(&self, _report: &RunReport) {}
}
