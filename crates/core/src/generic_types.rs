use crate::routing::RouteTable;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default energy threshold for server-side voice activity detection.
pub const DEFAULT_VAD_THRESHOLD: f32 = 0.5;
/// Default number of frames the readiness buffer may hold.
pub const DEFAULT_MAX_BUFFERED_FRAMES: usize = 1500;
/// Smallest usable readiness buffer: both control frames plus one audio frame.
pub const MIN_BUFFERED_FRAMES: usize = 3;
/// Default interval, in audio frames, between milestone observations.
pub const DEFAULT_AUDIO_MILESTONE_FRAMES: u64 = 250;

/// The single audio encoding used on both connections.
///
/// Both the telephony stream and the AI session carry G.711 μ-law at 8 kHz,
/// so audio passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioCodec {
    #[default]
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
}

impl AudioCodec {
    /// The descriptor used inside JSON message bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::G711Ulaw => "g711_ulaw",
        }
    }

    /// The selector used in the AI connection URL.
    pub fn url_selector(&self) -> &'static str {
        match self {
            Self::G711Ulaw => "pcmu",
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::G711Ulaw => 8000,
        }
    }

    /// Playback duration of `bytes` of encoded audio, in milliseconds.
    ///
    /// μ-law stores one byte per sample.
    pub fn duration_ms(&self, bytes: usize) -> u64 {
        (bytes as u64 * 1000) / u64::from(self.sample_rate())
    }
}

/// Per-call conversation configuration, built once at startup and shared by
/// every call session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fully assembled system instructions.
    pub instructions: String,
    /// AI voice identifier (e.g. "alloy").
    pub voice: String,
    /// Request text output alongside audio so routing tags can be extracted.
    pub include_text: bool,
    /// Server VAD energy threshold.
    pub vad_threshold: f32,
    /// Instructions for the opening utterance.
    pub greeting: String,
    pub codec: AudioCodec,
    pub routes: Arc<RouteTable>,
    /// Upper bound on frames held while the AI connection is opening.
    pub max_buffered_frames: usize,
    /// Emit an audio milestone observation every this many frames.
    pub audio_milestone_frames: u64,
}

impl SessionConfig {
    pub fn new(instructions: String, voice: String, greeting: String) -> Self {
        Self {
            instructions,
            voice,
            include_text: true,
            vad_threshold: DEFAULT_VAD_THRESHOLD,
            greeting,
            codec: AudioCodec::default(),
            routes: Arc::new(RouteTable::default()),
            max_buffered_frames: DEFAULT_MAX_BUFFERED_FRAMES,
            audio_milestone_frames: DEFAULT_AUDIO_MILESTONE_FRAMES,
        }
    }
}

/// Semantic events the AI connection can emit, after every known spelling
/// has been normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// A chunk of spoken audio from the AI (base64 encoded).
    AudioDelta(String),
    /// A fragment of the AI's text output.
    TextDelta(String),
    /// The AI finished streaming audio for the current response.
    AudioDone,
    /// The whole AI response has finished; the turn boundary.
    TurnComplete,
    /// The AI asked for its input audio buffer to be committed.
    CommitRequested,
    /// A protocol-level error reported by the AI service.
    Error(String),
    /// Any event kind the relay does not act on.
    Ignored,
}
