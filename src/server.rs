// HTTP front for the capture handler

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

use crate::capture::FrameCapturer;
use crate::handler::{handle, CaptureQuery, FunctionResponse};

#[derive(Clone)]
pub struct AppState {
    pub capturer: Arc<FrameCapturer>,
}

impl IntoResponse for FunctionResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        if self.is_base64_encoded {
            headers.insert(
                HeaderName::from_static("content-transfer-encoding"),
                HeaderValue::from_static("base64"),
            );
        }
        response
    }
}

async fn capture_frame(
    State(state): State<AppState>,
    Query(query): Query<CaptureQuery>,
) -> FunctionResponse {
    handle(&state.capturer, &query).await
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "resolver": state.capturer.resolver_name(),
    }))
}

pub fn router(capturer: Arc<FrameCapturer>) -> Router {
    Router::new()
        .route("/api/capture-frame", get(capture_frame))
        .route("/.netlify/functions/capture-frame", get(capture_frame))
        .route("/api/health", get(health))
        .with_state(AppState { capturer })
}

/// Serve until the process is stopped
pub async fn serve(addr: SocketAddr, capturer: Arc<FrameCapturer>) -> std::io::Result<()> {
    let app = router(capturer);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "frame capture server listening");
    axum::serve(listener, app).await
}
