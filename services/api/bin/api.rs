//! Main Entrypoint for the callbridge API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Assembling the per-call session configuration (prompt, knowledge, routing).
//! 3. Initializing the realtime connector and diagnostics observer.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use callbridge_api::{
    config::Config, router::create_router, state::AppState, ws::provider::OpenAiConnector,
};
use callbridge_core::{
    generic_types::SessionConfig, instructions::InstructionsBuilder, observer::TracingObserver,
};
use std::{fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

const DEFAULT_SYSTEM_PROMPT: &str = "You are the company's phone receptionist. Be brief, friendly, and efficient. \
Collect the caller's name, callback number, and the reason for the call. \
If the matter seems urgent or unclear, offer a transfer to a human. \
Speak clearly, one idea per sentence, and pause for the caller.";

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Reads an optional text file named by configuration.
fn load_text(path: Option<&Path>, what: &str) -> anyhow::Result<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from {}", what, path.display()))?;
    info!(path = %path.display(), chars = content.chars().count(), "Loaded {}", what);
    Ok(Some(content))
}

fn build_session_config(config: &Config) -> anyhow::Result<SessionConfig> {
    let prompt = load_text(config.prompt_path.as_deref(), "system prompt")?
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let knowledge = load_text(config.knowledge_path.as_deref(), "knowledge")?;

    let mut builder = InstructionsBuilder::new(prompt)
        .knowledge_max_chars(config.knowledge_max_chars)
        .routes(&config.routes);
    if let Some(knowledge) = knowledge {
        builder = builder.knowledge(knowledge);
    }

    let mut session_config = SessionConfig::new(
        builder.build(),
        config.voice.clone(),
        config.greeting.clone(),
    );
    session_config.include_text = config.include_text;
    session_config.vad_threshold = config.vad_threshold;
    session_config.routes = Arc::new(config.routes.clone());
    session_config.max_buffered_frames = config.max_buffered_frames;
    session_config.audio_milestone_frames = config.audio_milestone_frames;
    Ok(session_config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Build Shared Services ---
    let session_config = build_session_config(&config)?;
    let connector = OpenAiConnector::new(&config, session_config.codec);
    info!(
        instructions_chars = session_config.instructions.chars().count(),
        codec = session_config.codec.as_str(),
        destinations = ?config.routes.destinations(),
        "Session configuration assembled."
    );

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        session_config: Arc::new(session_config),
        connector: Arc::new(connector),
        observer: Arc::new(TracingObserver),
    });

    // --- 4. Create Router and Apply Middleware ---
    let app = create_router(app_state).layer(TraceLayer::new_for_http());

    // --- 5. Start Server ---
    info!(
        model = %config.model,
        voice = %config.voice,
        secret_required = config.stream_secret.is_some(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
