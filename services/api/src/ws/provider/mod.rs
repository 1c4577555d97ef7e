//! Connections to the realtime AI service.
//!
//! The call coordinator only sees a [`RealtimeConnector`], so the WebSocket
//! transport can be swapped for an in-memory script in tests.

pub mod openai;

use async_trait::async_trait;
use futures_util::{Sink, stream::BoxStream};
use std::pin::Pin;

pub use openai::OpenAiConnector;

/// Outbound half of an open AI connection. Accepts serialized JSON frames.
pub type RealtimeSink = Pin<Box<dyn Sink<String, Error = anyhow::Error> + Send>>;

/// Inbound half of an open AI connection. Yields text frames until the
/// connection ends; an `Err` item means the connection failed.
pub type RealtimeStream = BoxStream<'static, anyhow::Result<String>>;

/// An open, handshaken connection to the realtime AI service.
pub struct RealtimeLink {
    pub sink: RealtimeSink,
    pub stream: RealtimeStream,
}

#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    /// Opens a new AI connection for a single call. Resolves once the
    /// connection is ready to accept frames.
    async fn connect(&self) -> anyhow::Result<RealtimeLink>;
}
