//! HTTP Models
//!
//! Response bodies for the signaling and liveness routes, with `utoipa`
//! schemas for the generated OpenAPI document.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Path of the telephony media-stream WebSocket route.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// Instructs the carrier to open a media stream to this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectDirective {
    pub stream_url: String,
}

impl ConnectDirective {
    /// Points the carrier at `wss://{host}/media-stream`.
    pub fn for_host(host: &str) -> Self {
        Self {
            stream_url: format!("wss://{}{}", host, MEDIA_STREAM_PATH),
        }
    }

    /// Renders the TwiML document returned to the carrier.
    pub fn to_twiml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}"/></Connect></Response>"#,
            escape_xml(&self.stream_url)
        )
    }
}

fn escape_xml(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
