//! Axum Handlers for the HTTP routes
//!
//! Signaling (the carrier's incoming-call webhook) and liveness. Both use
//! `utoipa` annotations to generate OpenAPI documentation.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{ConnectDirective, ErrorResponse, HealthResponse},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    Forbidden,
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Forbidden => {
                let message = "Forbidden".to_string();
                (StatusCode::FORBIDDEN, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Answer an incoming call by connecting it to the media stream.
#[utoipa::path(
    method(get, post),
    path = "/incoming-call",
    responses(
        (status = 200, description = "TwiML connect directive", body = String, content_type = "text/xml"),
        (status = 400, description = "No host available to build the stream URL", body = ErrorResponse),
        (status = 403, description = "Shared secret mismatch", body = ErrorResponse)
    ),
    params(
        ("x-stream-secret" = Option<String>, Header, description = "Shared secret, required when the service is configured with one. The header name follows STREAM_SECRET_HEADER")
    )
)]
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !state.config.secret_matches(&headers) {
        warn!("Rejected incoming call: shared secret mismatch");
        return Err(ApiError::Forbidden);
    }

    let host = match &state.config.public_host {
        Some(host) => host.clone(),
        None => headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| ApiError::BadRequest("Host header is required".to_string()))?,
    };

    let directive = ConnectDirective::for_host(&host);
    info!(stream_url = %directive.stream_url, "Answering incoming call");
    Ok((
        [(header::CONTENT_TYPE, "text/xml")],
        directive.to_twiml(),
    )
        .into_response())
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, ws::provider::RealtimeConnector, ws::provider::RealtimeLink};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use callbridge_core::{generic_types::SessionConfig, observer::TracingObserver};

    struct UnusedConnector;

    #[async_trait]
    impl RealtimeConnector for UnusedConnector {
        async fn connect(&self) -> anyhow::Result<RealtimeLink> {
            anyhow::bail!("not used by HTTP handlers")
        }
    }

    fn state_with(config: Config) -> Arc<AppState> {
        Arc::new(AppState {
            config: Arc::new(config),
            session_config: Arc::new(SessionConfig::new(
                "Be brief.".into(),
                "alloy".into(),
                "Hello.".into(),
            )),
            connector: Arc::new(UnusedConnector),
            observer: Arc::new(TracingObserver),
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_incoming_call_uses_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("abc.ngrok.app"));

        let response = incoming_call(State(state_with(Config::for_tests())), headers)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/xml");
        let body = body_text(response).await;
        assert!(body.contains(
            r#"<Response><Connect><Stream url="wss://abc.ngrok.app/media-stream"/></Connect></Response>"#
        ));
    }

    #[tokio::test]
    async fn test_incoming_call_prefers_public_host() {
        let mut config = Config::for_tests();
        config.public_host = Some("relay.example.com".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:7860"));

        let response = incoming_call(State(state_with(config)), headers)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("wss://relay.example.com/media-stream"));
    }

    #[tokio::test]
    async fn test_incoming_call_secret_check() {
        let mut config = Config::for_tests();
        config.stream_secret = Some("s3cret".to_string());
        let state = state_with(config);

        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("abc.ngrok.app"));
        let rejected = incoming_call(State(state.clone()), headers.clone())
            .await
            .into_response();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

        headers.insert("x-stream-secret", HeaderValue::from_static("s3cret"));
        let accepted = incoming_call(State(state), headers).await.into_response();
        assert_eq!(accepted.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_incoming_call_without_any_host() {
        let response = incoming_call(State(state_with(Config::for_tests())), HeaderMap::new())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body, HealthResponse::ok());
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = ApiError::from(anyhow::anyhow!("database password is hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert!(!body.contains("hunter2"));
    }
}
