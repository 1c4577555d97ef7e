//! Handles the real-time WebSocket connection to OpenAI for voice interaction.

use super::{RealtimeConnector, RealtimeLink};
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use callbridge_core::generic_types::AudioCodec;
use futures_util::{SinkExt, StreamExt, future};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info};

/// Opens one OpenAI Realtime connection per call.
#[derive(Debug, Clone)]
pub struct OpenAiConnector {
    url: String,
    api_key: String,
}

impl OpenAiConnector {
    pub fn new(config: &Config, codec: AudioCodec) -> Self {
        Self {
            url: realtime_url(&config.realtime_url, &config.model, &config.voice, codec),
            api_key: config.openai_api_key.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Builds `{base}?model=..&voice=..&format=..`, appending to any query already present.
fn realtime_url(base: &str, model: &str, voice: &str, codec: AudioCodec) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!(
        "{}{}model={}&voice={}&format={}",
        base,
        separator,
        model,
        voice,
        codec.url_selector()
    )
}

#[async_trait]
impl RealtimeConnector for OpenAiConnector {
    async fn connect(&self) -> Result<RealtimeLink> {
        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {}", self.api_key).parse()?);
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse()?);

        let (ws_stream, _) = connect_async(request)
            .await
            .context("Failed to connect to OpenAI Realtime WebSocket")?;
        info!(url = %self.url, "Connected to OpenAI Realtime API.");

        let (ws_tx, ws_rx) = ws_stream.split();

        let sink = ws_tx
            .sink_map_err(anyhow::Error::from)
            .with(|text: String| future::ready(Ok::<_, anyhow::Error>(WsMessage::Text(text.into()))));

        // Text frames are forwarded; a close frame ends the stream; control
        // and binary frames are skipped.
        let stream = ws_rx
            .take_while(|msg| future::ready(!matches!(msg, Ok(WsMessage::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(WsMessage::Text(text)) => Some(Ok(text.to_string())),
                    Ok(other) => {
                        debug!(kind = ?other, "Skipping non-text realtime frame");
                        None
                    }
                    Err(e) => Some(Err(anyhow::Error::from(e))),
                })
            });

        Ok(RealtimeLink {
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}
