//! SSH transport using the system `ssh` client
//!
//! The payload is written to the remote shell's stdin and stdout is returned
//! as device output. The child is polled so it can be killed when the attempt
//! deadline passes or the run is cancelled.

use crate::config::SshConfig;
use crate::paths;
use dispatch::{Connector, ConnectorError, Deadline, Device};
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use template::RenderedPayload;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// stderr fragments that mean the device could not be reached
const NETWORK_PATTERNS: &[&str] = &[
    "Connection refused",
    "Connection timed out",
    "Connection reset",
    "Connection closed by",
    "No route to host",
    "Network is unreachable",
    "Could not resolve hostname",
    "Operation timed out",
];

/// stderr fragments that mean credentials were refused
const AUTH_PATTERNS: &[&str] = &[
    "Permission denied",
    "Host key verification failed",
    "Too many authentication failures",
];

pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the ssh client for `device`
    pub fn args(&self, device: &Device) -> Vec<String> {
        let mut args = vec![
            "-T".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
        ];
        for option in &self.config.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        if let Some(port) = self.config.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &device.connection.credential_ref {
            args.push("-i".to_string());
            args.push(paths::expand(identity).display().to_string());
        }
        let address = &device.connection.address;
        if let Some(user) = self.config.user.as_deref().filter(|_| !address.contains('@')) {
            args.push("-l".to_string());
            args.push(user.to_string());
        }
        args.push(address.clone());
        args
    }

    fn spawn(&self, device: &Device) -> Result<Child, ConnectorError> {
        Command::new(&self.config.program)
            .args(self.args(device))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ConnectorError::other(format!("failed to start {}: {e}", self.config.program))
            })
    }
}

impl Connector for SshConnector {
    fn name(&self) -> &str {
        "ssh"
    }

    fn send(
        &self,
        device: &Device,
        payload: &RenderedPayload,
        deadline: &Deadline,
    ) -> Result<String, ConnectorError> {
        log::trace!("{} - {} {}", device.id, self.config.program, self.args(device).join(" "));
        let mut child = self.spawn(device)?;

        let writer = child.stdin.take().map(|mut stdin| {
            let text = payload.as_str().to_string();
            thread::spawn(move || {
                // The remote side may exit before reading everything
                let _ = stdin.write_all(text.as_bytes());
            })
        });
        let stdout = child.stdout.take().map(read_all);
        let stderr = child.stderr.take().map(read_all);

        let status = wait(&mut child, deadline)?;

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if status.success() {
            return Ok(stdout);
        }
        Err(classify_failure(status.code(), &stderr))
    }
}

/// Poll the child until it exits, killing it once the deadline says stop.
fn wait(child: &mut Child, deadline: &Deadline) -> Result<ExitStatus, ConnectorError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if deadline.should_stop() => {
                let _ = child.kill();
                let _ = child.wait();
                if deadline.is_cancelled() {
                    return Err(ConnectorError::cancelled("run cancelled, ssh session killed"));
                }
                return Err(ConnectorError::network("deadline reached, ssh session killed"));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL.min(deadline.remaining())),
            Err(e) => return Err(ConnectorError::other(format!("failed to wait for ssh: {e}"))),
        }
    }
}

fn read_all<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    let bytes = handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Map a failed ssh exit onto an error category.
///
/// Exit status 255 is ssh's own failure; anything else came from the remote
/// command, which means the device refused the payload.
pub fn classify_failure(code: Option<i32>, stderr: &str) -> ConnectorError {
    let detail = stderr
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string);

    let Some(code) = code else {
        return ConnectorError::other(detail.unwrap_or_else(|| "ssh killed by signal".into()));
    };
    let detail = detail.unwrap_or_else(|| format!("exit status {code}"));

    if AUTH_PATTERNS.iter().any(|p| stderr.contains(p)) {
        ConnectorError::authentication(detail)
    } else if NETWORK_PATTERNS.iter().any(|p| stderr.contains(p)) || code == 255 {
        ConnectorError::network(detail)
    } else {
        ConnectorError::rejected(detail)
    }
}
