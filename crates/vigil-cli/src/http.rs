// HTTP transport: /health and multipart /detect

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use vigil_proto::detect::{ErrorBody, ErrorKind};
use vigil_proto::health::HealthStatus;
use vigil_vision::pipeline::process;
use vigil_vision::{AnnotationRequest, PipelineError, VisionContext};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), max_upload_mb: default_max_upload_mb(), cors_allow_any: true }
    }
}

fn default_bind() -> String { "0.0.0.0:8000".into() }
fn default_max_upload_mb() -> usize { 20 }
fn default_true() -> bool { true }

#[derive(Clone)]
pub struct AppState {
    ctx: VisionContext,
    model_name: Arc<str>,
}

impl AppState {
    pub fn new(ctx: VisionContext, model_name: &str) -> Self {
        Self { ctx, model_name: model_name.into() }
    }
}

pub fn create_router(state: AppState, cfg: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/detect", post(detect_handler))
        .layer(DefaultBodyLimit::max(cfg.max_upload_mb.saturating_mul(1024 * 1024)))
        .with_state(state);

    if cfg.cors_allow_any {
        router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    } else {
        router
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus::ok(&*state.model_name))
}

async fn detect_handler(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_form(multipart).await {
        Ok(f) => f,
        Err(e) => return e.into_response(),
    };

    // decode/inference/render are CPU-bound
    let ctx = state.ctx.clone();
    let joined = tokio::task::spawn_blocking(move || process(&ctx, &form.file, &form.request)).await;

    match joined {
        Ok(Ok(result)) => Json(result.to_response()).into_response(),
        Ok(Err(e)) => ApiError::from(e).into_response(),
        Err(e) => {
            error!("detect: worker task failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Detector, "worker task failed")
                .into_response()
        }
    }
}

struct DetectForm {
    file: Bytes,
    request: AnnotationRequest,
}

async fn read_form(mut multipart: Multipart) -> Result<DetectForm, ApiError> {
    let mut file = None;
    let mut request = AnnotationRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => file = Some(field.bytes().await.map_err(bad_multipart)?),
            "camera_name" => {
                let v = field.text().await.map_err(bad_multipart)?;
                request.camera_label = (!v.is_empty()).then_some(v);
            }
            "show_confidence" => {
                request.show_confidence = parse_form_bool(&name, &field.text().await.map_err(bad_multipart)?)?;
            }
            "show_label" => {
                request.show_label = parse_form_bool(&name, &field.text().await.map_err(bad_multipart)?)?;
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::bad_request("missing multipart field `file`"))?;
    Ok(DetectForm { file, request })
}

fn bad_multipart(e: MultipartError) -> ApiError {
    ApiError::bad_request(format!("multipart: {}", e))
}

/// Form booleans: true/false, 1/0, yes/no, on/off (any case).
fn parse_form_bool(field: &str, v: &str) -> Result<bool, ApiError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ApiError::bad_request(format!("field `{}`: not a boolean: {:?}", field, v))),
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { status, body: ErrorBody { kind, message: message.into() } }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::BadRequest, message)
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let msg = e.to_string();
        if e.is_client_error() {
            warn!("detect: {}", msg);
        } else {
            error!("detect: {}", msg);
        }
        let (status, kind) = match e {
            PipelineError::Decode(_) => (StatusCode::BAD_REQUEST, ErrorKind::Decode),
            PipelineError::DetectionData(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::DetectionData),
            PipelineError::Encoding(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Encoding),
            PipelineError::Detector(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Detector),
        };
        Self::new(status, kind, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
