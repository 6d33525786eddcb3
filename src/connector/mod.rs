//! Concrete device transports

pub mod http;
pub mod ssh;

use crate::config::Config;
use dispatch::{Connector, ConnectorError, Deadline, Device};
use std::collections::BTreeMap;
use std::sync::Arc;
use template::RenderedPayload;

pub use http::HttpConnector;
pub use ssh::SshConnector;

/// Routes each device to the transport named in its connection.
pub struct Transports {
    routes: BTreeMap<String, Arc<dyn Connector>>,
    default: String,
    name: String,
}

impl Transports {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            routes: BTreeMap::new(),
            default: default.into(),
            name: String::new(),
        }
    }

    /// Register a connector under its own name
    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.routes.insert(connector.name().to_string(), connector);
        self.name = self.routes.keys().cloned().collect::<Vec<_>>().join("|");
        self
    }

    /// ssh and http, configured from the config file
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.transport.default.clone())
            .with(Arc::new(SshConnector::new(config.ssh.clone())))
            .with(Arc::new(HttpConnector::new(config.http.clone())))
    }

    fn route(&self, device: &Device) -> Result<&Arc<dyn Connector>, ConnectorError> {
        let transport = device
            .connection
            .transport
            .as_deref()
            .unwrap_or(&self.default);
        let key = if transport == "https" { "http" } else { transport };
        self.routes.get(key).ok_or_else(|| {
            ConnectorError::other(format!(
                "unknown transport '{transport}' (available: {})",
                self.name
            ))
        })
    }
}

impl Connector for Transports {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(
        &self,
        device: &Device,
        payload: &RenderedPayload,
        deadline: &Deadline,
    ) -> Result<String, ConnectorError> {
        self.route(device)?.send(device, payload, deadline)
    }
}
