//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the immutable
//! resources every call shares: configuration, the per-call session template,
//! the realtime connector and the diagnostics sink.

use crate::{config::Config, ws::provider::RealtimeConnector};
use callbridge_core::{generic_types::SessionConfig, observer::CallObserver};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session_config: Arc<SessionConfig>,
    pub connector: Arc<dyn RealtimeConnector>,
    pub observer: Arc<dyn CallObserver>,
}
