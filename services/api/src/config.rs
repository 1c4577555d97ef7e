use axum::http::{HeaderMap, HeaderName};
use callbridge_core::{
    generic_types::{
        DEFAULT_AUDIO_MILESTONE_FRAMES, DEFAULT_MAX_BUFFERED_FRAMES, DEFAULT_VAD_THRESHOLD,
        MIN_BUFFERED_FRAMES,
    },
    instructions::DEFAULT_KNOWLEDGE_MAX_CHARS,
    routing::{DEFAULT_DESTINATIONS, RouteTable},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Default header carrying the optional shared secret on signaling and stream
/// requests. Override with `STREAM_SECRET_HEADER`.
pub const DEFAULT_STREAM_SECRET_HEADER: &str = "x-stream-secret";

/// Greeting requested from the AI when no `GREETING` is configured.
pub const DEFAULT_GREETING: &str =
    "Greet the caller warmly, introduce yourself as the receptionist, and ask how you can help.";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub model: String,
    pub voice: String,
    pub realtime_url: String,
    pub stream_secret: Option<String>,
    pub stream_secret_header: HeaderName,
    pub public_host: Option<String>,
    pub log_level: Level,
    pub prompt_path: Option<PathBuf>,
    pub knowledge_path: Option<PathBuf>,
    pub knowledge_max_chars: usize,
    pub greeting: String,
    pub vad_threshold: f32,
    pub include_text: bool,
    pub routes: RouteTable,
    pub ai_connect_timeout: Duration,
    pub max_buffered_frames: usize,
    pub audio_milestone_frames: u64,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = match std::env::var("BIND_ADDRESS") {
            Ok(addr) => addr,
            Err(_) => std::env::var("PORT")
                .map(|port| format!("0.0.0.0:{port}"))
                .unwrap_or_else(|_| "0.0.0.0:7860".to_string()),
        };
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini-realtime".to_string());
        let voice = std::env::var("VOICE").unwrap_or_else(|_| "alloy".to_string());
        let realtime_url = std::env::var("REALTIME_URL")
            .unwrap_or_else(|_| "wss://api.openai.com/v1/realtime".to_string());

        let stream_secret = optional_var("STREAM_SECRET");
        let stream_secret_header = parse_var(
            "STREAM_SECRET_HEADER",
            HeaderName::from_static(DEFAULT_STREAM_SECRET_HEADER),
        )?;
        let public_host = optional_var("PUBLIC_HOST");

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompt_path = optional_var("PROMPT_PATH").map(PathBuf::from);
        let knowledge_path = optional_var("KNOWLEDGE_PATH").map(PathBuf::from);
        let knowledge_max_chars = parse_var("KNOWLEDGE_MAX_CHARS", DEFAULT_KNOWLEDGE_MAX_CHARS)?;
        let greeting = optional_var("GREETING").unwrap_or_else(|| DEFAULT_GREETING.to_string());

        let vad_threshold: f32 = parse_var("VAD_THRESHOLD", DEFAULT_VAD_THRESHOLD)?;
        if !(0.0..=1.0).contains(&vad_threshold) {
            return Err(ConfigError::InvalidValue(
                "VAD_THRESHOLD".to_string(),
                format!("{} is outside [0, 1]", vad_threshold),
            ));
        }

        let include_text = parse_var("INCLUDE_TEXT", true)?;

        let routes = match optional_var("ROUTE_DESTINATIONS") {
            Some(list) => RouteTable::new(list.split(',')),
            None => RouteTable::new(DEFAULT_DESTINATIONS.iter().copied()),
        };

        let ai_connect_timeout = Duration::from_secs(parse_var("AI_CONNECT_TIMEOUT_SECS", 10)?);
        let max_buffered_frames = parse_var("MAX_BUFFERED_FRAMES", DEFAULT_MAX_BUFFERED_FRAMES)?;
        if max_buffered_frames < MIN_BUFFERED_FRAMES {
            return Err(ConfigError::InvalidValue(
                "MAX_BUFFERED_FRAMES".to_string(),
                format!(
                    "{} is below the minimum of {}",
                    max_buffered_frames, MIN_BUFFERED_FRAMES
                ),
            ));
        }
        let audio_milestone_frames =
            parse_var("AUDIO_MILESTONE_FRAMES", DEFAULT_AUDIO_MILESTONE_FRAMES)?;

        Ok(Self {
            bind_address,
            openai_api_key,
            model,
            voice,
            realtime_url,
            stream_secret,
            stream_secret_header,
            public_host,
            log_level,
            prompt_path,
            knowledge_path,
            knowledge_max_chars,
            greeting,
            vad_threshold,
            include_text,
            routes,
            ai_connect_timeout,
            max_buffered_frames,
            audio_milestone_frames,
        })
    }

    /// Checks the shared-secret header. Always passes when no secret is configured.
    pub fn secret_matches(&self, headers: &HeaderMap) -> bool {
        match &self.stream_secret {
            None => true,
            Some(expected) => headers
                .get(&self.stream_secret_header)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|provided| provided == expected),
        }
    }
}

#[cfg(test)]
impl Config {
    /// A fully populated configuration that never touches the environment.
    pub(crate) fn for_tests() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            openai_api_key: "test-openai-key".to_string(),
            model: "gpt-4o-mini-realtime".to_string(),
            voice: "alloy".to_string(),
            realtime_url: "wss://api.openai.com/v1/realtime".to_string(),
            stream_secret: None,
            stream_secret_header: HeaderName::from_static(DEFAULT_STREAM_SECRET_HEADER),
            public_host: None,
            log_level: Level::INFO,
            prompt_path: None,
            knowledge_path: None,
            knowledge_max_chars: DEFAULT_KNOWLEDGE_MAX_CHARS,
            greeting: DEFAULT_GREETING.to_string(),
            vad_threshold: DEFAULT_VAD_THRESHOLD,
            include_text: true,
            routes: RouteTable::default(),
            ai_connect_timeout: Duration::from_secs(10),
            max_buffered_frames: DEFAULT_MAX_BUFFERED_FRAMES,
            audio_milestone_frames: DEFAULT_AUDIO_MILESTONE_FRAMES,
        }
    }
}

/// Reads a variable, treating blank values as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}
