//! HTTP surface for render and run requests
//!
//! Routes live under the configured root path. Runs execute on the blocking
//! pool; each in-flight run registers its cancel token so shutdown can stop it.

use crate::api::{ApiError, RenderRequest, RenderResponse, RunRequest};
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use dispatch::{CancelToken, Engine, NoObserver, RunConfig, RunReport};
use log::{info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;

/// State shared by every handler
pub struct AppState {
    engine: Arc<Engine>,
    base_config: RunConfig,
    templates_dir: PathBuf,
    serving: AtomicBool,
    runs: Mutex<HashMap<u64, CancelToken>>,
    next_run: AtomicU64,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, base_config: RunConfig, templates_dir: PathBuf) -> Self {
        Self {
            engine,
            base_config,
            templates_dir,
            serving: AtomicBool::new(true),
            runs: Mutex::new(HashMap::new()),
            next_run: AtomicU64::new(0),
        }
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    /// Fail health checks and cancel every in-flight run.
    pub fn begin_shutdown(&self) {
        self.serving.store(false, Ordering::SeqCst);
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if !runs.is_empty() {
            warn!("Cancelling {} in-flight run(s)", runs.len());
        }
        for token in runs.values() {
            token.cancel();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn register(self: &Arc<Self>) -> RunGuard {
        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, cancel.clone());
        RunGuard {
            state: Arc::clone(self),
            id,
            cancel,
        }
    }
}

/// Keeps a run's cancel token registered while the run is in flight
struct RunGuard {
    state: Arc<AppState>,
    id: u64,
    cancel: CancelToken,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Build the router, nested under `root_path` when one is set.
pub fn router(state: Arc<AppState>, root_path: &str) -> Router {
    let routes = Router::new()
        .route("/health", get(health))
        .route("/render", post(render))
        .route("/run", post(run))
        .with_state(state);

    match normalize_root(root_path) {
        Some(prefix) => Router::new().nest(&prefix, routes),
        None => routes,
    }
}

/// `"api/v1/"` becomes `"/api/v1"`; empty and `"/"` mean no prefix.
pub fn normalize_root(root_path: &str) -> Option<String> {
    let trimmed = root_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

/// Bind and serve until ctrl-c or SIGTERM.
pub async fn serve(state: Arc<AppState>, bind: &str, root_path: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    info!(
        "Serving on http://{addr}{}",
        normalize_root(root_path).unwrap_or_default()
    );

    let app = router(Arc::clone(&state), root_path);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await
        .context("Server error")?;

    let remaining = state.in_flight();
    if remaining > 0 {
        warn!("{remaining} run(s) still in flight at exit");
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown requested");
    state.begin_shutdown();
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if state.is_serving() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    }
}

async fn render(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Json<RenderResponse>, ApiError> {
    let Json(request) = body?;
    let payload = request
        .source
        .resolve(&request.variables, &state.templates_dir)?;
    Ok(Json(RenderResponse { payload }))
}

async fn run(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<RunReport>, ApiError> {
    if !state.is_serving() {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "shutting_down",
            "server is shutting down",
        ));
    }
    let Json(request) = body?;
    let prepared = request.prepare(&state.base_config, &state.templates_dir)?;

    let guard = state.register();
    let engine = Arc::clone(&state.engine);
    let report = tokio::task::spawn_blocking(move || {
        let cancel = guard.cancel.clone();
        let result = prepared.execute(&engine, cancel, &NoObserver);
        drop(guard);
        result
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "engine_fault", e.to_string()))??;

    Ok(Json(report))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use dispatch::{Connector, ConnectorError, Deadline, Device};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use template::RenderedPayload;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Echoes the payload; devices whose id starts with "down" are unreachable
    struct Lab;

    impl Connector for Lab {
        fn name(&self) -> &str {
            "lab"
        }

        fn send(
            &self,
            device: &Device,
            payload: &RenderedPayload,
            _deadline: &Deadline,
        ) -> Result<String, ConnectorError> {
            if device.id.starts_with("down") {
                return Err(ConnectorError::network("no route to host"));
            }
            Ok(payload.as_str().to_string())
        }
    }

    fn state(templates_dir: PathBuf) -> Arc<AppState> {
        Arc::new(AppState::new(
            Arc::new(Engine::new(Arc::new(Lab))),
            RunConfig::default(),
            templates_dir,
        ))
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn test_health_flips_on_shutdown() {
        let state = state(PathBuf::from("."));
        let (status, body) = call(router(Arc::clone(&state), ""), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("OK".into()));

        state.begin_shutdown();
        let (status, _) = call(router(Arc::clone(&state), ""), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = call(
            router(state, ""),
            "POST",
            "/run",
            Some(json!({"template": "x", "mode": "push", "devices": []})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "shutting_down");
    }

    #[tokio::test]
    async fn test_render_ok_and_missing_variable() {
        let app = router(state(PathBuf::from(".")), "");
        let (status, body) = call(
            app.clone(),
            "POST",
            "/render",
            Some(json!({"template": "vlan {{ id }}", "variables": {"id": 42}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payload"], "vlan 42");

        let (status, body) = call(
            app,
            "POST",
            "/render",
            Some(json!({"template": "vlan {{ id }} name {{ name }}"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_variable");
        assert_eq!(body["detail"], "id, name");
    }

    #[tokio::test]
    async fn test_render_named_template() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("banner.tmpl"), "banner motd ^{{ text }}^").unwrap();
        let app = router(state(dir.path().to_path_buf()), "");
        let (status, body) = call(
            app,
            "POST",
            "/render",
            Some(json!({"template_name": "banner", "variables": {"text": "lab"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payload"], "banner motd ^lab^");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = router(state(PathBuf::from(".")), "");
        let request = Request::builder()
            .method("POST")
            .uri("/run")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_run_returns_report_for_partial_failure() {
        let state = state(PathBuf::from("."));
        let (status, body) = call(
            router(Arc::clone(&state), ""),
            "POST",
            "/run",
            Some(json!({
                "run_id": "chg-7",
                "template": "hostname {{ h }}",
                "variables": {"h": "edge"},
                "mode": "push",
                "devices": [
                    {"id": "edge-1", "connection": {"address": "10.1.0.1"}},
                    {"id": "down-2", "connection": {"address": "10.1.0.2"}},
                    {"id": "edge-3", "connection": {"address": "10.1.0.3"}}
                ],
                "options": {"max_concurrency": 2}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run_id"], "chg-7");
        assert_eq!(body["status"], "partial_failure");
        let ids: Vec<&str> = body["outcomes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["device_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["edge-1", "down-2", "edge-3"]);
        assert_eq!(body["outcomes"][1]["status"], "failed");
        assert_eq!(state.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_run_validation_errors() {
        let app = router(state(PathBuf::from(".")), "");
        let (status, body) = call(
            app.clone(),
            "POST",
            "/run",
            Some(json!({"template": "x", "mode": "push", "devices": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "empty_device_list");

        let (status, body) = call(
            app.clone(),
            "POST",
            "/run",
            Some(json!({
                "template": "x",
                "mode": "audit",
                "devices": [
                    {"id": "a", "connection": {"address": "1"}},
                    {"id": "a", "connection": {"address": "2"}}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "duplicate_device");

        let (status, body) = call(
            app.clone(),
            "POST",
            "/run",
            Some(json!({
                "template": "x",
                "mode": "render_only",
                "devices": [{"id": "a", "connection": {"address": "1"}}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_mode");

        let (status, body) = call(
            app,
            "POST",
            "/run",
            Some(json!({
                "template": "x",
                "mode": "push",
                "devices": [{"id": "a", "connection": {"address": "1"}}],
                "options": {"max_concurrency": 0}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_config");
    }

    #[tokio::test]
    async fn test_routes_nested_under_root_path() {
        let state = state(PathBuf::from("."));
        let (status, _) = call(router(Arc::clone(&state), "/fleet/"), "GET", "/fleet/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(router(state, "/fleet/"), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_root(""), None);
        assert_eq!(normalize_root("/"), None);
        assert_eq!(normalize_root("api/v1/").as_deref(), Some("/api/v1"));
    }

    #[test]
    fn test_shutdown_cancels_registered_runs() {
        let state = state(PathBuf::from("."));
        let guard = state.register();
        assert_eq!(state.in_flight(), 1);
        state.begin_shutdown();
        assert!(guard.cancel.is_cancelled());
        drop(guard);
        assert_eq!(state.in_flight(), 0);
    }
}
