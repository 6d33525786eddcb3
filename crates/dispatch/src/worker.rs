//! Per-device worker: attempts, deadlines, retries
//!
//! Each attempt runs the connector on its own thread so a hung connector can
//! be abandoned at the deadline without blocking the pool thread. The worker
//! waits on a channel and checks the run's cancel token between waits.
//!
//! An attempt thread holds a connection permit until `send` returns, so
//! abandoned calls still count against `max_concurrency`.

use crate::audit;
use crate::cancel::{CancelToken, Deadline};
use crate::config::RunConfig;
use crate::context::Connector;
use crate::error::{ConnectorError, ConnectorErrorKind};
use crate::types::{Device, DeviceOutcome, RunMode, truncate_output};
use log::{debug, info, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use template::RenderedPayload;

/// Longest the worker waits before re-checking for cancellation
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// One try against a device
#[derive(Debug)]
struct Attempt {
    /// 1-indexed
    number: u32,
    deadline: Deadline,
}

/// How an attempt ended
#[derive(Debug)]
enum AttemptResult {
    Output(String),
    Error(ConnectorError),
    TimedOut,
    Cancelled,
    Panicked,
}

/// Counting semaphore over live connector calls
#[derive(Debug)]
struct Permits {
    available: Mutex<usize>,
    released: Condvar,
}

impl Permits {
    fn new(count: usize) -> Arc<Self> {
        Arc::new(Self {
            available: Mutex::new(count),
            released: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a free permit; `None` once the run is cancelled.
    fn acquire(self: &Arc<Self>, cancel: &CancelToken) -> Option<Permit> {
        let mut available = self.lock();
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if *available > 0 {
                *available -= 1;
                return Some(Permit(Arc::clone(self)));
            }
            available = self
                .released
                .wait_timeout(available, CANCEL_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Returned to the pool on drop, including while unwinding
struct Permit(Arc<Permits>);

impl Drop for Permit {
    fn drop(&mut self) {
        *self.0.lock() += 1;
        self.0.released.notify_one();
    }
}

/// What the worker does after an attempt
#[derive(Debug)]
enum Step {
    Finish(DeviceOutcome),
    Retry {
        delay: Duration,
        error: ConnectorError,
    },
}

/// Drives one device from first attempt to terminal outcome.
///
/// Shared by every pool thread of a run.
pub(crate) struct Worker<'a> {
    connector: Arc<dyn Connector>,
    payload: Arc<RenderedPayload>,
    config: &'a RunConfig,
    cancel: CancelToken,
    permits: Arc<Permits>,
}

impl<'a> Worker<'a> {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        payload: Arc<RenderedPayload>,
        config: &'a RunConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            connector,
            payload,
            config,
            permits: Permits::new(config.max_concurrency),
            cancel,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run attempts until the device reaches a terminal outcome.
    pub(crate) fn execute(&self, device: &Device, mode: RunMode) -> DeviceOutcome {
        let started = Instant::now();
        let mut retries = 0;

        loop {
            if self.cancel.is_cancelled() {
                let outcome = DeviceOutcome::cancelled(&device.id, "run cancelled");
                return self.finish(outcome, started, retries);
            }

            // Held until the connector call returns, even past the deadline
            let Some(permit) = self.permits.acquire(&self.cancel) else {
                let outcome = DeviceOutcome::cancelled(&device.id, "run cancelled");
                return self.finish(outcome, started, retries);
            };
            let attempt = Attempt {
                number: retries + 1,
                deadline: Deadline::new(self.config.per_device_timeout, self.cancel.clone()),
            };
            debug!(
                "{} - attempt {} via {} ({}ms deadline)",
                device.id,
                attempt.number,
                self.connector.name(),
                self.config.per_device_timeout.as_millis()
            );

            let result = self.run_attempt(device, &attempt, permit);
            match self.step(device, mode, retries, result) {
                Step::Finish(outcome) => return self.finish(outcome, started, retries),
                Step::Retry { delay, error } => {
                    warn!(
                        "{} - attempt {} failed: {error}; retrying in {}ms",
                        device.id,
                        attempt.number,
                        delay.as_millis()
                    );
                    retries += 1;
                    if self.cancel.wait_timeout(delay) {
                        let outcome =
                            DeviceOutcome::cancelled(&device.id, "run cancelled during retry backoff");
                        return self.finish(outcome, started, retries);
                    }
                }
            }
        }
    }

    /// Run the connector on a helper thread and wait for it up to the deadline.
    fn run_attempt(&self, device: &Device, attempt: &Attempt, permit: Permit) -> AttemptResult {
        let (tx, rx) = mpsc::channel();
        let connector = Arc::clone(&self.connector);
        let payload = Arc::clone(&self.payload);
        let target = device.clone();
        let deadline = attempt.deadline.clone();

        let spawned = thread::Builder::new()
            .name(format!("attempt-{}", attempt.number))
            .spawn(move || {
                let _permit = permit;
                let result = connector.send(&target, &payload, &deadline);
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return AttemptResult::Error(ConnectorError::other(format!(
                "failed to start attempt thread: {e}"
            )));
        }

        loop {
            let remaining = attempt.deadline.remaining();
            if remaining.is_zero() {
                return AttemptResult::TimedOut;
            }
            match rx.recv_timeout(remaining.min(CANCEL_POLL)) {
                Ok(Ok(output)) => return AttemptResult::Output(output),
                // A connector that gave up because its deadline passed
                Ok(Err(_)) if attempt.deadline.is_expired() && !attempt.deadline.is_cancelled() => {
                    return AttemptResult::TimedOut;
                }
                Ok(Err(error)) => return AttemptResult::Error(error),
                Err(RecvTimeoutError::Disconnected) => return AttemptResult::Panicked,
                Err(RecvTimeoutError::Timeout) => {
                    if attempt.deadline.is_cancelled() {
                        return AttemptResult::Cancelled;
                    }
                }
            }
        }
    }

    /// Decide between finishing and retrying.
    fn step(&self, device: &Device, mode: RunMode, retries: u32, result: AttemptResult) -> Step {
        match result {
            AttemptResult::Output(raw) => Step::Finish(self.completed(device, mode, raw)),
            AttemptResult::Error(error) if error.kind == ConnectorErrorKind::Cancelled => {
                Step::Finish(DeviceOutcome::cancelled(&device.id, error.message))
            }
            AttemptResult::Error(error)
                if error.is_transient()
                    && retries < self.config.max_retries
                    && !self.cancel.is_cancelled() =>
            {
                Step::Retry {
                    delay: self.config.backoff_for(retries),
                    error,
                }
            }
            AttemptResult::Error(error) => {
                Step::Finish(DeviceOutcome::failed(&device.id, error.to_string()))
            }
            AttemptResult::TimedOut => Step::Finish(DeviceOutcome::timeout(
                &device.id,
                self.config.per_device_timeout,
            )),
            AttemptResult::Cancelled => {
                Step::Finish(DeviceOutcome::cancelled(&device.id, "run cancelled"))
            }
            AttemptResult::Panicked => {
                Step::Finish(DeviceOutcome::failed(&device.id, "connector panicked"))
            }
        }
    }

    /// Outcome for a device that answered
    fn completed(&self, device: &Device, mode: RunMode, raw: String) -> DeviceOutcome {
        let outcome = match mode {
            RunMode::Push => DeviceOutcome::success(&device.id),
            RunMode::Audit => {
                let baseline = device
                    .baseline
                    .as_deref()
                    .unwrap_or_else(|| self.payload.as_str());
                let result = audit::compare(&raw, baseline, &self.config.audit);
                DeviceOutcome::audited(&device.id, result.diff)
            }
        };
        let (output, truncated) = truncate_output(raw, self.config.max_output_bytes);
        if truncated {
            debug!(
                "{} - output truncated to {} bytes",
                device.id, self.config.max_output_bytes
            );
        }
        outcome.with_output(output, truncated)
    }

    fn finish(&self, outcome: DeviceOutcome, started: Instant, retries: u32) -> DeviceOutcome {
        let outcome = outcome.with_timing(started.elapsed(), retries);
        match &outcome.error {
            Some(error) => info!(
                "{} - {} after {}ms: {error}",
                outcome.device_id,
                outcome.status,
                outcome.elapsed.as_millis()
            ),
            None => info!(
                "{} - {} in {}ms",
                outcome.device_id,
                outcome.status,
                outcome.elapsed.as_millis()
            ),
        }
        outcome
    }
}
