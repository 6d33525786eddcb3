//! HTTP transport for devices with a management API
//!
//! POSTs the payload and returns the response body. The request timeout is
//! whatever remains of the attempt deadline.

use crate::config::HttpConfig;
use dispatch::{Connector, ConnectorError, Deadline, Device};
use template::RenderedPayload;

pub struct HttpConnector {
    agent: ureq::Agent,
    config: HttpConfig,
}

impl HttpConnector {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            config,
        }
    }

    /// Full URL for a device address
    pub fn url(&self, address: &str) -> String {
        if address.contains("://") {
            return address.to_string();
        }
        let path = self.config.path.trim_start_matches('/');
        format!(
            "{}://{}/{}",
            self.config.scheme,
            address.trim_end_matches('/'),
            path
        )
    }

    /// Bearer token from the environment variable named by `credential_ref`
    fn token(device: &Device) -> Result<Option<String>, ConnectorError> {
        let Some(var) = device.connection.credential_ref.as_deref() else {
            return Ok(None);
        };
        std::env::var(var).map(Some).map_err(|_| {
            ConnectorError::authentication(format!("credential variable {var} is not set"))
        })
    }
}

impl Connector for HttpConnector {
    fn name(&self) -> &str {
        "http"
    }

    fn send(
        &self,
        device: &Device,
        payload: &RenderedPayload,
        deadline: &Deadline,
    ) -> Result<String, ConnectorError> {
        let url = self.url(&device.connection.address);
        log::trace!("{} - POST {url}", device.id);

        let mut request = self
            .agent
            .post(&url)
            .config()
            .timeout_global(Some(deadline.remaining()))
            .build()
            .header("Content-Type", &self.config.content_type)
            .header("User-Agent", concat!("fleetrun/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = Self::token(device)? {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let mut response = request.send(payload.as_str()).map_err(classify)?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|e| ConnectorError::protocol(format!("unreadable response body: {e}")))
    }
}

/// Map a ureq failure onto an error category.
pub fn classify(err: ureq::Error) -> ConnectorError {
    match err {
        ureq::Error::StatusCode(code) => classify_status(code),
        ureq::Error::Timeout(_) => ConnectorError::network(err.to_string()),
        ureq::Error::Io(_) | ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => {
            ConnectorError::network(err.to_string())
        }
        ureq::Error::BadUri(_) | ureq::Error::Http(_) => ConnectorError::other(err.to_string()),
        other => ConnectorError::protocol(other.to_string()),
    }
}

/// 5xx and 429 are worth retrying; 401/403 are credential problems.
pub fn classify_status(code: u16) -> ConnectorError {
    let message = format!("HTTP {code}");
    match code {
        429 | 500..=599 => ConnectorError::busy(message),
        401 | 403 => ConnectorError::authentication(message),
        400..=499 => ConnectorError::rejected(message),
        _ => ConnectorError::protocol(message),
    }
}
