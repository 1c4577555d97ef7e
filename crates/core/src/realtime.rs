//! Wire format of the realtime AI connection.
//!
//! Outbound messages are strongly typed. Inbound messages are normalized into
//! [`RealtimeEvent`], because the service spells the same event differently
//! across API versions; every known spelling is listed here and nowhere else.

use crate::generic_types::{AudioCodec, RealtimeEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const AUDIO_DELTA_TYPES: &[&str] = &[
    "response.audio.delta",
    "response.output_audio.delta",
    "output_audio.delta",
];

const TEXT_DELTA_TYPES: &[&str] = &[
    "response.text.delta",
    "response.output_text.delta",
    "output_text.delta",
    "response.audio_transcript.delta",
    "response.output_audio_transcript.delta",
    "output_audio_transcript.delta",
];

const AUDIO_DONE_TYPES: &[&str] = &[
    "response.audio.done",
    "response.output_audio.done",
    "output_audio.done",
];

const TURN_COMPLETE_TYPES: &[&str] = &["response.done"];

const COMMIT_REQUEST_TYPES: &[&str] = &[
    "input_audio_buffer.commit",
    "input_audio_buffer.commit_requested",
];

/// Messages sent to the AI connection.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },
    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseSettings },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String, format: AudioCodec },
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub instructions: String,
    pub modalities: Vec<Modality>,
    pub voice: String,
    pub input_audio_format: AudioCodec,
    pub output_audio_format: AudioCodec,
    pub turn_detection: TurnDetection,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Text,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad { threshold: f32 },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResponseSettings {
    pub instructions: String,
}

/// Loose view over any inbound message; payload fields are read by name so
/// unexpected shapes on unrelated events never fail the parse.
#[derive(Deserialize, Debug)]
struct RawServerEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: serde_json::Map<String, Value>,
}

impl RawServerEvent {
    /// The first of `names` present as a string field.
    fn string_field(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|name| self.fields.get(*name).and_then(Value::as_str))
            .map(str::to_owned)
    }

    fn error_message(&self) -> String {
        self.fields
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("unspecified error")
            .to_string()
    }
}

/// Parses and normalizes one inbound AI frame.
///
/// Returns `None` for frames that are not JSON objects with a string `type`.
pub fn normalize(text: &str) -> Option<RealtimeEvent> {
    let raw: RawServerEvent = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed realtime frame");
            return None;
        }
    };
    let kind = raw.kind.as_str();

    let event = if AUDIO_DELTA_TYPES.contains(&kind) {
        raw.string_field(&["delta", "audio"])
            .map_or(RealtimeEvent::Ignored, RealtimeEvent::AudioDelta)
    } else if TEXT_DELTA_TYPES.contains(&kind) {
        raw.string_field(&["delta", "text", "transcript"])
            .map_or(RealtimeEvent::Ignored, RealtimeEvent::TextDelta)
    } else if AUDIO_DONE_TYPES.contains(&kind) {
        RealtimeEvent::AudioDone
    } else if TURN_COMPLETE_TYPES.contains(&kind) {
        RealtimeEvent::TurnComplete
    } else if COMMIT_REQUEST_TYPES.contains(&kind) {
        RealtimeEvent::CommitRequested
    } else if kind == "error" {
        RealtimeEvent::Error(raw.error_message())
    } else {
        RealtimeEvent::Ignored
    };
    Some(event)
}
