//! Diagnostic observations emitted by call sessions.
//!
//! Observations are side information; recording one must never block or fail
//! the relay.

use crate::routing::RouteTag;
use std::fmt;
use tracing::{info, warn};

/// Why a call session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The telephony side sent `stop`.
    Stopped,
    TelephonyClosed,
    TelephonyError,
    AiClosed,
    AiError,
    /// The AI connection did not open in time.
    AiTimeout,
    /// Too many frames arrived before the AI connection opened.
    BufferOverflow,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CloseReason::Stopped => "stopped",
            CloseReason::TelephonyClosed => "telephony_closed",
            CloseReason::TelephonyError => "telephony_error",
            CloseReason::AiClosed => "ai_closed",
            CloseReason::AiError => "ai_error",
            CloseReason::AiTimeout => "ai_timeout",
            CloseReason::BufferOverflow => "buffer_overflow",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    CallIdentified {
        call_id: String,
        call_sid: Option<String>,
    },
    AudioMilestone {
        call_id: Option<String>,
        frames: u64,
        audio_ms: u64,
    },
    RouteTagged {
        call_id: Option<String>,
        tag: RouteTag,
    },
    AiError {
        call_id: Option<String>,
        message: String,
    },
    SessionClosed {
        call_id: Option<String>,
        reason: CloseReason,
        frames: u64,
    },
}

/// Sink for diagnostic observations, shared by every session in the process.
#[cfg_attr(test, mockall::automock)]
pub trait CallObserver: Send + Sync {
    fn record(&self, observation: Observation);
}

/// Records observations as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CallObserver for TracingObserver {
    fn record(&self, observation: Observation) {
        match observation {
            Observation::CallIdentified { call_id, call_sid } => {
                info!(%call_id, call_sid = ?call_sid, "Call identified");
            }
            Observation::AudioMilestone {
                call_id,
                frames,
                audio_ms,
            } => {
                info!(call_id = ?call_id, frames, audio_ms, "Caller audio milestone");
            }
            Observation::RouteTagged { call_id, tag } => {
                info!(call_id = ?call_id, %tag, "Routing tag observed");
            }
            Observation::AiError { call_id, message } => {
                warn!(call_id = ?call_id, %message, "Realtime service reported an error");
            }
            Observation::SessionClosed {
                call_id,
                reason,
                frames,
            } => {
                info!(call_id = ?call_id, %reason, frames, "Call session closed");
            }
        }
    }
}
