//! Stateless mapping between telephony events and realtime AI events.

use crate::{
    generic_types::{RealtimeEvent, SessionConfig},
    realtime::{ClientEvent, Modality, ResponseSettings, SessionSettings, TurnDetection},
    telephony::{
        MarkLabel, OUTBOUND_TRACK, OutboundMedia, TURN_MARK_NAME, TelephonyCommand, TelephonyEvent,
    },
};

/// What a telephony event means for the AI side.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The stream started: configure the session, then request the greeting.
    Configure {
        call_id: Option<String>,
        call_sid: Option<String>,
        session_update: ClientEvent,
        greeting: ClientEvent,
    },
    /// One chunk of caller audio to append, with its approximate decoded size.
    /// The payload is passed through untouched.
    Audio { append: ClientEvent, bytes: usize },
    /// The stream ended: commit the audio buffer and close.
    Finish(ClientEvent),
    Ignore,
}

/// What a normalized AI event means for the telephony side.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Audio to play to the caller.
    Play(TelephonyCommand),
    /// Text for the tag extractor only; never forwarded to the caller.
    Text(String),
    /// Audio for the response finished: the mark, if not yet sent.
    AudioDone(TelephonyCommand),
    /// End of response: the mark if not yet sent, then tag extraction.
    TurnComplete(TelephonyCommand),
    /// Send a message straight back to the AI connection.
    Echo(ClientEvent),
    /// A protocol error reported by the AI service.
    Error(String),
    Ignore,
}

pub fn translate_inbound(event: TelephonyEvent, config: &SessionConfig) -> Inbound {
    match event {
        TelephonyEvent::Start { .. } => Inbound::Configure {
            call_id: event.call_id().map(str::to_owned),
            call_sid: event.call_sid().map(str::to_owned),
            session_update: session_update(config),
            greeting: greeting(config),
        },
        TelephonyEvent::Media { media } => Inbound::Audio {
            bytes: base64::decoded_len_estimate(media.payload.len()),
            append: audio_append(media.payload, config),
        },
        TelephonyEvent::Stop => Inbound::Finish(ClientEvent::InputAudioBufferCommit),
        TelephonyEvent::Connected | TelephonyEvent::Unknown => Inbound::Ignore,
    }
}

fn turn_mark(call_id: Option<&str>) -> TelephonyCommand {
    TelephonyCommand::Mark {
        stream_sid: call_id.map(str::to_owned),
        mark: MarkLabel {
            name: TURN_MARK_NAME.to_string(),
        },
    }
}

pub fn translate_outbound(event: RealtimeEvent, call_id: Option<&str>) -> Outbound {
    match event {
        RealtimeEvent::AudioDelta(payload) => Outbound::Play(TelephonyCommand::Media {
            stream_sid: call_id.map(str::to_owned),
            media: OutboundMedia {
                payload,
                track: OUTBOUND_TRACK.to_string(),
            },
        }),
        RealtimeEvent::TextDelta(text) => Outbound::Text(text),
        RealtimeEvent::AudioDone => Outbound::AudioDone(turn_mark(call_id)),
        RealtimeEvent::TurnComplete => Outbound::TurnComplete(turn_mark(call_id)),
        RealtimeEvent::CommitRequested => Outbound::Echo(ClientEvent::InputAudioBufferCommit),
        RealtimeEvent::Error(message) => Outbound::Error(message),
        RealtimeEvent::Ignored => Outbound::Ignore,
    }
}

/// The `session.update` sent once per call.
pub fn session_update(config: &SessionConfig) -> ClientEvent {
    let modalities = if config.include_text {
        vec![Modality::Audio, Modality::Text]
    } else {
        vec![Modality::Audio]
    };
    ClientEvent::SessionUpdate {
        session: SessionSettings {
            instructions: config.instructions.clone(),
            modalities,
            voice: config.voice.clone(),
            input_audio_format: config.codec,
            output_audio_format: config.codec,
            turn_detection: TurnDetection::ServerVad {
                threshold: config.vad_threshold,
            },
        },
    }
}

/// The `response.create` asking the AI to open the conversation.
pub fn greeting(config: &SessionConfig) -> ClientEvent {
    ClientEvent::ResponseCreate {
        response: ResponseSettings {
            instructions: config.greeting.clone(),
        },
    }
}

pub fn audio_append(payload: String, config: &SessionConfig) -> ClientEvent {
    ClientEvent::InputAudioBufferAppend {
        audio: payload,
        format: config.codec,
    }
}
