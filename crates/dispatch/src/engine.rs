//! Dispatch engine - bounded fan-out with ordered collection
//!
//! Device jobs are queued on a rayon pool sized to `max_concurrency`, in
//! request order. Each job publishes its outcome over a channel tagged with
//! the device's request index; the calling thread collects outcomes into
//! per-index slots, notifies the observer, then aggregates the report.

use crate::cancel::CancelToken;
use crate::config::RunConfig;
use crate::context::{Connector, NoObserver, RunObserver};
use crate::error::{EngineError, Result, ValidationError};
use crate::report::{RunHeader, RunReport, generate_run_id};
use crate::types::{Device, DeviceOutcome, RunMode};
use crate::worker::Worker;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use template::RenderedPayload;

/// Per-run controls supplied by the caller
pub struct RunControl<'a> {
    /// Caller-chosen run id; generated when absent or blank
    pub run_id: Option<String>,
    /// Cancels the run when triggered
    pub cancel: CancelToken,
    /// Progress notifications
    pub observer: &'a dyn RunObserver,
}

impl Default for RunControl<'_> {
    fn default() -> Self {
        Self {
            run_id: None,
            cancel: CancelToken::new(),
            observer: &NoObserver,
        }
    }
}

/// Fans a rendered payload out to a device fleet.
///
/// The connector is fixed at construction; every run shares it.
pub struct Engine {
    connector: Arc<dyn Connector>,
}

impl Engine {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// Dispatch `payload` to every device and wait for all of them.
    ///
    /// Returns a report with exactly one outcome per device, in request
    /// order, whatever the individual outcomes. Fails only when the request
    /// is invalid (before any device is contacted) or on an internal fault.
    pub fn run(
        &self,
        payload: &RenderedPayload,
        devices: &[Device],
        mode: RunMode,
        config: &RunConfig,
        control: RunControl<'_>,
    ) -> Result<RunReport> {
        validate_devices(devices)?;
        config.validate()?;

        let submitted_at = Utc::now();
        let run_id = control
            .run_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| {
                generate_run_id(submitted_at, payload, devices.iter().map(|d| d.id.as_str()))
            });

        info!(
            "{run_id} - {mode} to {} device(s) via {}, concurrency {}",
            devices.len(),
            self.connector.name(),
            config.max_concurrency
        );
        control.observer.on_run_start(&run_id, devices.len());

        let worker = Worker::new(
            Arc::clone(&self.connector),
            Arc::new(payload.clone()),
            config,
            control.cancel,
        );
        let outcomes = dispatch(&worker, devices, mode, config.max_concurrency, control.observer)?;

        let header = RunHeader {
            run_id,
            submitted_at,
            mode,
        };
        let report = RunReport::aggregate(header, Utc::now(), outcomes);
        info!(
            "{} - {} ({}/{} succeeded)",
            report.run_id,
            report.status,
            report.counts.succeeded(),
            report.counts.total
        );
        control.observer.on_run_complete(&report);
        Ok(report)
    }

    /// Run with a fresh cancel token and no observer.
    pub fn run_simple(
        &self,
        payload: &RenderedPayload,
        devices: &[Device],
        mode: RunMode,
        config: &RunConfig,
    ) -> Result<RunReport> {
        self.run(payload, devices, mode, config, RunControl::default())
    }
}

/// Reject empty lists, blank ids and duplicate ids.
pub fn validate_devices(devices: &[Device]) -> std::result::Result<(), ValidationError> {
    if devices.is_empty() {
        return Err(ValidationError::EmptyDeviceList);
    }
    let mut seen = HashSet::with_capacity(devices.len());
    for (index, device) in devices.iter().enumerate() {
        if device.id.trim().is_empty() {
            return Err(ValidationError::BlankDeviceId { index });
        }
        if !seen.insert(device.id.as_str()) {
            return Err(ValidationError::DuplicateDevice {
                id: device.id.clone(),
            });
        }
    }
    Ok(())
}

/// One device's job; a panic becomes that device's failed outcome.
fn run_job(
    worker: &Worker<'_>,
    device: &Device,
    mode: RunMode,
    observer: &dyn RunObserver,
) -> DeviceOutcome {
    if worker.is_cancelled() {
        debug!("{} - skipped, run cancelled", device.id);
        return DeviceOutcome::cancelled(&device.id, "run cancelled before dispatch");
    }
    panic::catch_unwind(AssertUnwindSafe(|| {
        observer.on_device_start(&device.id);
        worker.execute(device, mode)
    }))
    .unwrap_or_else(|_| {
        warn!("{} - worker panicked", device.id);
        DeviceOutcome::failed(&device.id, "worker panicked")
    })
}

/// Run every device on a bounded pool and collect outcomes in request order.
fn dispatch(
    worker: &Worker<'_>,
    devices: &[Device],
    mode: RunMode,
    max_concurrency: usize,
    observer: &dyn RunObserver,
) -> Result<Vec<DeviceOutcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_concurrency)
        .thread_name(|i| format!("dispatch-worker-{i}"))
        .build()
        .map_err(|e| EngineError::Fault(format!("failed to create thread pool: {e}")))?;

    let (tx, rx) = mpsc::channel::<(usize, DeviceOutcome)>();
    let mut slots: Vec<Option<DeviceOutcome>> = vec![None; devices.len()];

    thread::scope(|scope| -> Result<()> {
        let dispatcher = thread::Builder::new()
            .name("dispatch".to_string())
            .spawn_scoped(scope, move || {
                pool.scope_fifo(|jobs| {
                    for (index, device) in devices.iter().enumerate() {
                        let tx = tx.clone();
                        jobs.spawn_fifo(move |_| {
                            let outcome = run_job(worker, device, mode, observer);
                            // Receiver only goes away once collection has failed
                            let _ = tx.send((index, outcome));
                        });
                    }
                });
            })
            .map_err(|e| EngineError::Fault(format!("failed to start dispatcher: {e}")))?;

        for (index, outcome) in rx {
            let slot = slots.get_mut(index).ok_or_else(|| {
                EngineError::Fault(format!("outcome for unknown request index {index}"))
            })?;
            if slot.is_some() {
                return Err(EngineError::Fault(format!(
                    "second outcome for device {}",
                    outcome.device_id
                )));
            }
            observer.on_device_complete(&outcome);
            *slot = Some(outcome);
        }

        dispatcher
            .join()
            .map_err(|_| EngineError::Fault("dispatcher panicked".to_string()))
    })?;

    slots
        .into_iter()
        .zip(devices)
        .map(|(slot, device)| {
            slot.ok_or_else(|| {
                EngineError::Fault(format!("no outcome recorded for device {}", device.id))
            })
        })
        .collect()
}
