//! Request handling shared by the CLI and the HTTP server
//!
//! Turns a render or run request into a payload and engine options, and maps
//! library errors onto request-level errors with an HTTP status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch::{
    CancelToken, Device, Engine, EngineError, RunConfig, RunControl, RunMode, RunObserver,
    RunReport,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use template::{RenderError, RenderedPayload, Variables};
use thiserror::Error;

// ============================================================================
// Requests
// ============================================================================

/// Where the payload comes from. Exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSource {
    /// Inline template body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Template file in the templates directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Raw commands, sent as-is without rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
}

impl PayloadSource {
    /// Produce the payload, rendering templates with `variables`.
    pub fn resolve(
        &self,
        variables: &Variables,
        templates_dir: &Path,
    ) -> Result<RenderedPayload, ApiError> {
        match (&self.template, &self.template_name, &self.commands) {
            (Some(body), None, None) => Ok(template::render(body, variables)?),
            (None, Some(name), None) => {
                let body = load_named_template(templates_dir, name)?;
                Ok(template::render(&body, variables)?)
            }
            (None, None, Some(commands)) => {
                if commands.is_empty() {
                    return Err(ApiError::invalid_request("commands must not be empty"));
                }
                Ok(RenderedPayload::from_commands(commands))
            }
            (None, None, None) => Err(ApiError::invalid_request(
                "one of template, template_name or commands is required",
            )),
            _ => Err(ApiError::invalid_request(
                "template, template_name and commands are mutually exclusive",
            )),
        }
    }
}

/// Read `<dir>/<name>` or `<dir>/<name>.tmpl`.
pub fn load_named_template(dir: &Path, name: &str) -> Result<String, ApiError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with('.');
    if !valid {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_template_name",
            format!("'{name}' is not a template name"),
        ));
    }

    for candidate in [dir.join(name), dir.join(format!("{name}.tmpl"))] {
        match fs::read_to_string(&candidate) {
            Ok(body) => {
                log::debug!("Loaded template {}", candidate.display());
                return Ok(body);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ApiError::internal(format!(
                    "could not read {}: {e}",
                    candidate.display()
                )));
            }
        }
    }
    Err(ApiError::new(
        StatusCode::BAD_REQUEST,
        "template_not_found",
        format!("no template '{name}' in {}", dir.display()),
    ))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderRequest {
    #[serde(flatten)]
    pub source: PayloadSource,
    #[serde(default)]
    pub variables: Variables,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResponse {
    pub payload: RenderedPayload,
}

/// What a run request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    RenderOnly,
    Push,
    Audit,
}

impl TargetMode {
    /// Engine mode, or `None` when nothing is dispatched
    pub fn run_mode(self) -> Option<RunMode> {
        match self {
            Self::RenderOnly => None,
            Self::Push => Some(RunMode::Push),
            Self::Audit => Some(RunMode::Audit),
        }
    }
}

/// Per-request overrides for the configured engine options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub max_concurrency: Option<usize>,
    pub per_device_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub max_output_bytes: Option<usize>,
}

impl RunOptions {
    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(n) = self.max_concurrency {
            config.max_concurrency = n;
        }
        if let Some(ms) = self.per_device_timeout_ms {
            config.per_device_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        if let Some(ms) = self.retry_backoff_ms {
            config.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(factor) = self.backoff_factor {
            config.backoff_factor = factor;
        }
        if let Some(bytes) = self.max_output_bytes {
            config.max_output_bytes = bytes;
        }
        config
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    /// Groups log lines and reports; generated when absent
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(flatten)]
    pub source: PayloadSource,
    #[serde(default)]
    pub variables: Variables,
    pub mode: TargetMode,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub options: RunOptions,
}

/// A run request resolved into everything the engine needs
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub run_id: Option<String>,
    pub payload: RenderedPayload,
    pub devices: Vec<Device>,
    pub mode: RunMode,
    pub config: RunConfig,
}

impl RunRequest {
    /// Render the payload and merge options. Nothing is dispatched.
    pub fn prepare(self, base: &RunConfig, templates_dir: &Path) -> Result<PreparedRun, ApiError> {
        let mode = self.mode.run_mode().ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "invalid_mode",
                "render_only is served by the render endpoint",
            )
        })?;
        let payload = self.source.resolve(&self.variables, templates_dir)?;
        Ok(PreparedRun {
            run_id: self.run_id,
            payload,
            devices: self.devices,
            mode,
            config: self.options.apply(base.clone()),
        })
    }
}

impl PreparedRun {
    /// Dispatch through `engine` and wait for the report.
    pub fn execute(
        self,
        engine: &Engine,
        cancel: CancelToken,
        observer: &dyn RunObserver,
    ) -> Result<RunReport, ApiError> {
        let control = RunControl {
            run_id: self.run_id,
            cancel,
            observer,
        };
        let report = engine.run(&self.payload, &self.devices, self.mode, &self.config, control)?;
        Ok(report)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A request that could not be served, with its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub detail: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    detail: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", detail)
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.kind().as_str(), err.detail())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(e) => {
                Self::new(StatusCode::BAD_REQUEST, e.kind().as_str(), e.to_string())
            }
            EngineError::Fault(detail) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "engine_fault", detail)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            detail: &self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}
