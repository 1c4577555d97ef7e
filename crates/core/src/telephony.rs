//! Wire format of the telephony media stream.
//!
//! Inbound frames are JSON objects discriminated by an `event` field;
//! outbound frames use the same envelope.

use serde::{Deserialize, Serialize};

/// Track marker attached to every audio frame sent back to the caller.
pub const OUTBOUND_TRACK: &str = "outbound";
/// Name of the mark emitted when an AI turn completes.
pub const TURN_MARK_NAME: &str = "done";

/// Events received from the telephony side.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// Informational handshake, sent once when the socket opens.
    Connected,
    /// The media stream has started; carries the call identifiers.
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StartMetadata>,
    },
    /// One chunk of caller audio.
    Media { media: InboundMedia },
    /// The caller hung up or the stream was ended.
    Stop,
    /// Any event kind the relay does not act on (marks, DTMF, ...).
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct StartMetadata {
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InboundMedia {
    /// Base64 encoded μ-law audio.
    pub payload: String,
}

impl TelephonyEvent {
    /// Parses a text frame, returning `None` for anything that is not a
    /// well-formed telephony event.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed telephony frame");
                None
            }
        }
    }

    /// The identifier that must accompany outbound frames for this stream.
    ///
    /// Prefers the stream SID and falls back to the call SID.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::Start { stream_sid, start } => stream_sid
                .as_deref()
                .or_else(|| start.as_ref().and_then(|s| s.stream_sid.as_deref()))
                .or_else(|| start.as_ref().and_then(|s| s.call_sid.as_deref())),
            _ => None,
        }
    }

    /// The carrier-level call SID, when present on a `start` event.
    pub fn call_sid(&self) -> Option<&str> {
        match self {
            Self::Start { start, .. } => start.as_ref().and_then(|s| s.call_sid.as_deref()),
            _ => None,
        }
    }
}

/// Frames sent to the telephony side.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyCommand {
    /// Audio to play to the caller.
    Media {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        media: OutboundMedia,
    },
    /// A named marker in the outbound audio stream.
    Mark {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        mark: MarkLabel,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
    pub track: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MarkLabel {
    pub name: String,
}
