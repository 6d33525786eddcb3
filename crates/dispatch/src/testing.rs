//! Scripted connector shared by unit tests

use crate::cancel::Deadline;
use crate::context::Connector;
use crate::error::ConnectorError;
use crate::types::Device;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use template::RenderedPayload;

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Return the payload unchanged
    Echo,
    Reply(&'static str),
    /// Network error on the first attempt, then "ok"
    FlakyOnce,
    /// Network error on every attempt
    Unreachable,
    Reject,
    /// Never answer; returns once the deadline says stop
    Hang,
    /// Answer "ok" after a delay, unless stopped first
    Sleep(Duration),
    /// Answer "ok" after a delay, ignoring the deadline
    Stall(Duration),
    Panic,
}

#[derive(Default)]
pub struct FakeConnector {
    behaviors: HashMap<String, Behavior>,
    attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, device_id: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(device_id.to_string(), behavior);
        self
    }

    pub fn attempts(&self, device_id: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(device_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    /// Highest number of simultaneous `send` calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, device_id: &str) -> u32 {
        let mut attempts = self.attempts.lock().unwrap();
        let count = attempts.entry(device_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn wait_until(deadline: &Deadline, duration: Option<Duration>) -> bool {
    let started = Instant::now();
    loop {
        if deadline.should_stop() {
            return false;
        }
        if duration.is_some_and(|d| started.elapsed() >= d) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

impl Connector for FakeConnector {
    fn name(&self) -> &str {
        "fake"
    }

    fn send(
        &self,
        device: &Device,
        payload: &RenderedPayload,
        deadline: &Deadline,
    ) -> Result<String, ConnectorError> {
        let attempt = self.record(&device.id);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let behavior = self
            .behaviors
            .get(&device.id)
            .copied()
            .unwrap_or(Behavior::Echo);
        match behavior {
            Behavior::Echo => Ok(payload.as_str().to_string()),
            Behavior::Reply(text) => Ok(text.to_string()),
            Behavior::FlakyOnce if attempt == 1 => Err(ConnectorError::network("connection reset")),
            Behavior::FlakyOnce => Ok("ok".to_string()),
            Behavior::Unreachable => Err(ConnectorError::network("no route to host")),
            Behavior::Reject => Err(ConnectorError::rejected("% Invalid input")),
            Behavior::Hang => {
                wait_until(deadline, None);
                Err(ConnectorError::cancelled("gave up"))
            }
            Behavior::Sleep(duration) => {
                if wait_until(deadline, Some(duration)) {
                    Ok("ok".to_string())
                } else {
                    Err(ConnectorError::cancelled("stopped while waiting"))
                }
            }
            Behavior::Stall(duration) => {
                thread::sleep(duration);
                Ok("ok".to_string())
            }
            Behavior::Panic => panic!("scripted connector panic"),
        }
    }
}
