//! `GatewayServer`: Axum HTTP + WebSocket surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use hoist_core::DeliveryError;
use hoist_settings::ServerSettings;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::AuthDecision;
use crate::gateway::Gateway;
use crate::health::{self, HealthResponse};
use crate::router::run_device_session;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The gateway every handler operates on.
    pub gateway: Arc<Gateway>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// Errors returned by the HTTP API as plain-text responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request body.
    #[error("Bad Request")]
    BadRequest,
    /// No live session for the device.
    #[error("Device Offline")]
    DeviceOffline,
    /// The device is connected but its outbound queue refused the frame.
    #[error("Delivery Failed")]
    DeliveryFailed,
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Offline(_) => Self::DeviceOffline,
            DeliveryError::QueueFull(_) | DeliveryError::Closed(_) => Self::DeliveryFailed,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::DeviceOffline => StatusCode::NOT_FOUND,
            Self::DeliveryFailed => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}

/// The HTTP/WebSocket front of a [`Gateway`].
pub struct GatewayServer {
    config: ServerSettings,
    gateway: Arc<Gateway>,
    metrics: Option<PrometheusHandle>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl GatewayServer {
    /// Create a new server.
    pub fn new(config: ServerSettings, gateway: Arc<Gateway>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            config,
            gateway,
            metrics,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            gateway: self.gateway.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/send", post(send_handler))
            .route(
                "/api/v1/devices/remote/{device_id}/snapshot",
                get(snapshot_handler).post(snapshot_handler),
            )
            .route("/api/stats", get(stats_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the listener, then serve and run the liveness monitor in the
    /// background until shutdown. Returns the bound address.
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;

        let monitor = self.gateway.liveness_monitor();
        self.shutdown.track(tokio::spawn(monitor.run(self.shutdown.token())));

        let app = self.router();
        let token = self.shutdown.token();
        self.shutdown.track(tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "http server failed");
            }
        }));

        info!(%addr, "gateway listening");
        Ok(addr)
    }

    /// Stop accepting connections, close every session, drain queued work,
    /// and wait for the background tasks.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.shutdown();
        self.gateway.shutdown(timeout).await;
        self.shutdown.graceful_shutdown(Some(timeout)).await;
    }

    /// The gateway behind this server.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Get the shutdown coordinator.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerSettings {
        &self.config
    }
}

/// Query parameters of the device upgrade request.
#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    device_id: Option<String>,
    token: Option<String>,
}

/// GET /ws: authenticate, then upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let device_id = params.device_id.unwrap_or_default();
    let token = params.token.unwrap_or_default();

    if let AuthDecision::Rejected(reason) = state.gateway.auth().check(&device_id, &token).await {
        warn!(device_id = %device_id, reason = reason.as_str(), "device rejected");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };
    let gateway = state.gateway.clone();
    upgrade
        .max_message_size(gateway.max_message_size())
        .on_upgrade(move |socket| run_device_session(socket, device_id, gateway))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    device_id: String,
    command: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct SendResponse {
    status: &'static str,
    cmd_id: String,
}

/// POST /api/send
async fn send_handler(State(state): State<AppState>, body: Bytes) -> Result<Json<SendResponse>, ApiError> {
    let request: SendRequest = serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest)?;
    if request.device_id.is_empty() || request.command.is_empty() {
        return Err(ApiError::BadRequest);
    }
    let cmd_id = state
        .gateway
        .push_command(&request.device_id, &request.command, request.data)?;
    Ok(Json(SendResponse {
        status: "ok",
        cmd_id: cmd_id.into_inner(),
    }))
}

#[derive(Debug, Serialize)]
struct SnapshotResponse {
    req_id: String,
}

/// GET|POST /api/v1/devices/remote/{device_id}/snapshot
async fn snapshot_handler(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<SnapshotResponse>, ApiError> {
    let req_id = state.gateway.request_snapshot(&device_id)?;
    Ok(Json(SnapshotResponse {
        req_id: req_id.into_inner(),
    }))
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    online_count: usize,
    devices: Vec<String>,
    server_time: String,
}

/// GET /api/stats
async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let devices = state.gateway.presence().online_devices().await;
    Json(StatsResponse {
        online_count: devices.len(),
        devices,
        server_time: chrono::Utc::now().format("%H:%M:%S").to_string(),
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = &state.gateway;
    Json(health::health_check(
        state.start_time,
        gateway.registry().len(),
        gateway.correlator().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use hoist_settings::GatewaySettings;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> GatewayServer {
        let mut settings = GatewaySettings::default();
        let _ = settings.auth.devices.insert("E1".into(), "secret".into());
        let gateway = Gateway::builder(settings.clone()).build();
        GatewayServer::new(settings.server, gateway, None)
    }

    async fn body_string(resp: Response) -> String {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        serde_json::from_str(&body_string(resp).await).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let resp = server.router().oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["pending_requests"], 0);
    }

    #[tokio::test]
    async fn ws_without_credentials_is_unauthorized() {
        let server = make_server();
        let resp = server.router().oneshot(get("/ws")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(resp).await, "Unauthorized");
    }

    #[tokio::test]
    async fn ws_with_wrong_token_is_unauthorized() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(get("/ws?device_id=E1&token=guess"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ws_with_valid_token_needs_an_upgrade() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(get("/ws?device_id=E1&token=secret"))
            .await
            .unwrap();
        assert_ne!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(server.gateway().registry().is_empty());
    }

    #[tokio::test]
    async fn send_to_offline_device() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(post_json("/api/send", r#"{"device_id":"E1","command":"REBOOT"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(resp).await, "Device Offline");
    }

    #[tokio::test]
    async fn send_with_malformed_body() {
        let server = make_server();
        for body in ["not json", r#"{"device_id":"E1"}"#, r#"{"device_id":"","command":"X"}"#] {
            let resp = server.router().oneshot(post_json("/api/send", body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(body_string(resp).await, "Bad Request");
        }
    }

    #[tokio::test]
    async fn send_rejects_other_methods() {
        let server = make_server();
        let resp = server.router().oneshot(get("/api/send")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn send_to_connected_device() {
        let server = make_server();
        let gateway = server.gateway().clone();
        let (conn, mut rx) = gateway.open_connection("E1");
        let _ = gateway.registry().register(conn).await;

        let resp = server
            .router()
            .oneshot(post_json(
                "/api/send",
                r#"{"device_id":"E1","command":"REBOOT","data":{"delay":5}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["payload"], "REBOOT");
        assert_eq!(frame["cmd_id"], parsed["cmd_id"]);
    }

    #[tokio::test]
    async fn send_to_full_queue_is_service_unavailable() {
        let mut settings = GatewaySettings::default();
        settings.server.outbound_buffer = 1;
        let gateway = Gateway::builder(settings.clone()).build();
        let server = GatewayServer::new(settings.server, gateway.clone(), None);
        let (conn, _rx) = gateway.open_connection("E1");
        let _ = gateway.registry().register(conn).await;

        let body = r#"{"device_id":"E1","command":"REBOOT"}"#;
        let first = server.router().oneshot(post_json("/api/send", body)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = server.router().oneshot(post_json("/api/send", body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn snapshot_trigger() {
        let server = make_server();
        let uri = "/api/v1/devices/remote/E1/snapshot";

        let resp = server.router().oneshot(post_json(uri, "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let gateway = server.gateway().clone();
        let (conn, mut rx) = gateway.open_connection("E1");
        let _ = gateway.registry().register(conn).await;

        let resp = server.router().oneshot(get(uri)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "snapshot_request");
        assert_eq!(frame["req_id"], parsed["req_id"]);
    }

    #[tokio::test]
    async fn stats_lists_online_devices() {
        let server = make_server();
        let resp = server.router().oneshot(get("/api/stats")).await.unwrap();
        let parsed = body_json(resp).await;
        assert_eq!(parsed["online_count"], 0);
        assert_eq!(parsed["devices"], serde_json::json!([]));

        let gateway = server.gateway().clone();
        let (conn, _rx) = gateway.open_connection("E1");
        let _ = gateway.registry().register(conn).await;

        let resp = server.router().oneshot(get("/api/stats")).await.unwrap();
        let parsed = body_json(resp).await;
        assert_eq!(parsed["online_count"], 1);
        assert_eq!(parsed["devices"], serde_json::json!(["E1"]));
        assert_eq!(parsed["server_time"].as_str().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let server = make_server();
        let resp = server.router().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let settings = GatewaySettings::default();
        let server = GatewayServer::new(settings.server.clone(), Gateway::builder(settings).build(), Some(handle));
        let resp = server.router().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let resp = server.router().oneshot(get("/nonexistent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_and_shuts_down() {
        let mut settings = GatewaySettings::default();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 0;
        let gateway = Gateway::builder(settings.clone()).build();
        let server = GatewayServer::new(settings.server, gateway, None);

        let addr = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown(Duration::from_secs(5)).await;
        assert!(server.shutdown_coordinator().is_shutting_down());
    }
}
