//! HTTP control surface: axum router and request handlers.
//!
//! The server runs on the tokio runtime while the slideshow runs on a plain
//! `std::thread`. Handlers never touch the panel; they send
//! [`ControlCommand`]s through a `std::sync::mpsc` channel and read the
//! shared [`DisplayStatus`].

use crate::control::ControlCommand;
use crate::status::{self, DisplayState, DisplayStatus, SharedStatus};
use crate::store::{self, ImageEntry};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State`
/// extractor.
///
/// Rust concept: crossing from async to sync
/// Handlers run on the tokio runtime, but the slideshow lives on a plain
/// thread. A `std::sync::mpsc::Sender` is `Clone + Send` and `send` never
/// blocks, so it is safe to call from async code. The render thread polls
/// the other end between frames with `try_recv`.
#[derive(Clone)]
pub struct AppState {
    /// Channel to the render thread
    pub command_tx: Sender<ControlCommand>,
    /// Shared display status (render thread writes, handlers read)
    pub status: SharedStatus,
    /// Folder the slideshow loads from
    pub image_dir: PathBuf,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        get_images,
        post_brightness,
        post_next,
        post_rescan,
        post_display_off,
        post_display_on,
    ),
    components(schemas(DisplayStatus, DisplayState, ImageEntry, BrightnessRequest)),
    tags(
        (name = "display", description = "Display control endpoints"),
        (name = "slideshow", description = "Slideshow endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "LED Slideshow API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for controlling an LED matrix slideshow"
    )
)]
pub struct ApiDoc;

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BrightnessRequest {
    /// Brightness level (1-100)
    #[schema(example = 75, minimum = 1, maximum = 100)]
    value: i64,
}

type ApiError = (StatusCode, String);

/// Range-check a brightness request.
pub fn validate_brightness(value: i64) -> Result<u8, ApiError> {
    if (1..=100).contains(&value) {
        Ok(value as u8)
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            format!("Brightness must be between 1 and 100, got {value}"),
        ))
    }
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/images", get(get_images))
        .route("/api/v1/brightness", post(post_brightness))
        .route("/api/v1/slideshow/next", post(post_next))
        .route("/api/v1/slideshow/rescan", post(post_rescan))
        .route("/api/v1/display/off", post(post_display_off))
        .route("/api/v1/display/on", post(post_display_on))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn send(state: &AppState, cmd: ControlCommand) -> Result<StatusCode, ApiError> {
    state.command_tx.send(cmd).map_err(|_| {
        tracing::error!("Render thread gone, dropping {:?}", cmd);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Render thread gone".to_string(),
        )
    })?;
    Ok(StatusCode::OK)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status — return current display state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current display status", body = DisplayStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<DisplayStatus> {
    Json(status::snapshot(&state.status))
}

/// GET /api/v1/images — list image files in the slideshow folder
#[utoipa::path(
    get,
    path = "/api/v1/images",
    tag = "slideshow",
    responses(
        (status = 200, description = "Images in the slideshow folder", body = Vec<ImageEntry>)
    )
)]
async fn get_images(State(state): State<AppState>) -> Json<Vec<ImageEntry>> {
    Json(store::list_images(&state.image_dir))
}

/// POST /api/v1/brightness — set panel brightness (1-100)
#[utoipa::path(
    post,
    path = "/api/v1/brightness",
    tag = "display",
    request_body = BrightnessRequest,
    responses(
        (status = 200, description = "Brightness updated"),
        (status = 400, description = "Brightness out of range")
    )
)]
async fn post_brightness(
    State(state): State<AppState>,
    Json(req): Json<BrightnessRequest>,
) -> Result<StatusCode, ApiError> {
    let level = validate_brightness(req.value)?;
    send(&state, ControlCommand::SetBrightness(level))
}

/// POST /api/v1/slideshow/next — skip the rest of the current hold
#[utoipa::path(
    post,
    path = "/api/v1/slideshow/next",
    tag = "slideshow",
    responses((status = 200, description = "Advance requested"))
)]
async fn post_next(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, ControlCommand::Next)
}

/// POST /api/v1/slideshow/rescan — reload the image folder
#[utoipa::path(
    post,
    path = "/api/v1/slideshow/rescan",
    tag = "slideshow",
    responses((status = 200, description = "Rescan requested"))
)]
async fn post_rescan(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, ControlCommand::Rescan)
}

/// POST /api/v1/display/off — fade to black and stay dark
#[utoipa::path(
    post,
    path = "/api/v1/display/off",
    tag = "display",
    responses((status = 200, description = "Display turning off"))
)]
async fn post_display_off(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, ControlCommand::Off)
}

/// POST /api/v1/display/on — fade the current image back in
#[utoipa::path(
    post,
    path = "/api/v1/display/on",
    tag = "display",
    responses((status = 200, description = "Display turning on"))
)]
async fn post_display_on(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, ControlCommand::On)
}
