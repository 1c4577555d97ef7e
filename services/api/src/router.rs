//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the signaling webhook, the media-stream WebSocket endpoint, and
//! the OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, HealthResponse, MEDIA_STREAM_PATH},
    state::AppState,
    ws::media_stream_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::incoming_call, handlers::health),
    components(schemas(HealthResponse, ErrorResponse)),
    tags(
        (name = "callbridge", description = "Telephony to realtime AI voice relay")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let call_router = Router::new()
        .route(
            "/incoming-call",
            get(handlers::incoming_call).post(handlers::incoming_call),
        )
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .route("/health", get(handlers::health))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(call_router)
}
