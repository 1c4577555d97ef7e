//! Call Session State Machine
//!
//! A `CallSession` owns the state of one phone call: the readiness gate, the
//! readiness buffer, the per-turn text and the diagnostic counters. It performs
//! no I/O; every input returns the [`Directive`]s the socket owner must execute,
//! in order.
//!
//! AI-bound frames are buffered until the AI connection is open *and* the
//! telephony stream has started, so the session configuration always reaches
//! the AI before the greeting request and before any caller audio.

use crate::{
    Directive,
    buffer::{Lane, ReadinessBuffer},
    generic_types::SessionConfig,
    observer::{CallObserver, CloseReason, Observation},
    realtime::{self, ClientEvent},
    routing::TagExtractor,
    telephony::{TelephonyCommand, TelephonyEvent},
    translator::{Inbound, Outbound, translate_inbound, translate_outbound},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle phase of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the telephony `start` event.
    Init,
    /// Started, waiting for the AI connection to open.
    Configuring,
    /// Both sides are live; frames flow without buffering.
    Streaming,
    /// Terminal. Every further input is a no-op.
    Closed,
}

pub struct CallSession {
    config: Arc<SessionConfig>,
    observer: Arc<dyn CallObserver>,
    phase: Phase,
    ready: bool,
    call_id: Option<String>,
    /// Present until the first flush; `None` afterwards.
    buffer: Option<ReadinessBuffer>,
    extractor: TagExtractor,
    /// Whether any AI delta arrived since the last `response.done`.
    response_active: bool,
    /// Latched once the turn mark went out; cleared at `response.done`.
    mark_sent: bool,
    audio_frames: u64,
    audio_bytes: u64,
}

impl CallSession {
    pub fn new(config: Arc<SessionConfig>, observer: Arc<dyn CallObserver>) -> Self {
        let buffer = ReadinessBuffer::new(config.max_buffered_frames);
        Self {
            config,
            observer,
            phase: Phase::Init,
            ready: false,
            call_id: None,
            buffer: Some(buffer),
            extractor: TagExtractor::new(),
            response_active: false,
            mark_sent: false,
            audio_frames: 0,
            audio_bytes: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    /// Number of caller audio frames translated so far.
    pub fn audio_frames(&self) -> u64 {
        self.audio_frames
    }

    /// Frames currently held in the readiness buffer.
    pub fn buffered_frames(&self) -> usize {
        self.buffer.as_ref().map_or(0, ReadinessBuffer::len)
    }

    pub fn turn_text(&self) -> &str {
        self.extractor.turn_text()
    }

    /// Handles one text frame from the telephony socket.
    pub fn on_telephony_message(&mut self, text: &str) -> Vec<Directive> {
        let mut out = Vec::new();
        if self.is_closed() {
            return out;
        }
        let Some(event) = TelephonyEvent::parse(text) else {
            return out;
        };

        match translate_inbound(event, &self.config) {
            Inbound::Configure {
                call_id,
                call_sid,
                session_update,
                greeting,
            } => {
                if self.phase != Phase::Init {
                    debug!("Ignoring repeated start event");
                    return out;
                }
                match call_id {
                    Some(call_id) => {
                        self.observer.record(Observation::CallIdentified {
                            call_id: call_id.clone(),
                            call_sid,
                        });
                        self.call_id = Some(call_id);
                    }
                    None => warn!("Stream started without a call identifier"),
                }
                self.phase = if self.ready {
                    Phase::Streaming
                } else {
                    Phase::Configuring
                };
                self.send_to_ai(Lane::Control, &session_update, &mut out);
                self.send_to_ai(Lane::Control, &greeting, &mut out);
                if self.ready {
                    self.flush(&mut out);
                }
            }
            Inbound::Audio { append, bytes } => {
                self.count_audio_frame(bytes);
                self.send_to_ai(Lane::Audio, &append, &mut out);
            }
            Inbound::Finish(commit) => {
                if self.phase == Phase::Streaming {
                    self.send_to_ai(Lane::Audio, &commit, &mut out);
                } else {
                    info!(
                        abandoned = self.buffered_frames(),
                        "Stream stopped before the AI session was ready; discarding buffered frames"
                    );
                }
                self.close(CloseReason::Stopped, true, true, &mut out);
            }
            Inbound::Ignore => {}
        }
        out
    }

    /// The AI connection completed its handshake.
    pub fn on_ai_open(&mut self) -> Vec<Directive> {
        let mut out = Vec::new();
        if self.is_closed() || self.ready {
            return out;
        }
        self.ready = true;
        info!(call_id = ?self.call_id, "Realtime session is ready");
        if self.phase == Phase::Configuring {
            self.phase = Phase::Streaming;
            self.flush(&mut out);
        }
        out
    }

    /// Handles one text frame from the AI socket.
    pub fn on_ai_message(&mut self, text: &str) -> Vec<Directive> {
        let mut out = Vec::new();
        if self.is_closed() {
            return out;
        }
        let Some(event) = realtime::normalize(text) else {
            return out;
        };

        match translate_outbound(event, self.call_id.as_deref()) {
            Outbound::Play(media) => {
                self.response_active = true;
                self.send_to_telephony(&media, &mut out);
            }
            Outbound::Text(fragment) => {
                self.response_active = true;
                self.extractor.push(&fragment);
            }
            Outbound::AudioDone(mark) => self.mark_turn(&mark, &mut out),
            Outbound::TurnComplete(mark) => {
                self.mark_turn(&mark, &mut out);
                self.response_active = false;
                self.mark_sent = false;
                if let Some(tag) = self.extractor.finish_turn(&self.config.routes) {
                    self.observer.record(Observation::RouteTagged {
                        call_id: self.call_id.clone(),
                        tag,
                    });
                }
            }
            Outbound::Echo(event) => self.send_to_ai(Lane::Audio, &event, &mut out),
            Outbound::Error(message) => self.observer.record(Observation::AiError {
                call_id: self.call_id.clone(),
                message,
            }),
            Outbound::Ignore => {}
        }
        out
    }

    /// The AI connection closed, errored, or never opened.
    pub fn on_ai_closed(&mut self, reason: CloseReason) -> Vec<Directive> {
        let mut out = Vec::new();
        self.close(reason, false, true, &mut out);
        out
    }

    /// The telephony socket closed or errored.
    pub fn on_telephony_closed(&mut self, reason: CloseReason) -> Vec<Directive> {
        let mut out = Vec::new();
        self.close(reason, true, false, &mut out);
        out
    }

    fn count_audio_frame(&mut self, bytes: usize) {
        self.audio_frames += 1;
        self.audio_bytes += bytes as u64;
        let interval = self.config.audio_milestone_frames;
        if interval > 0 && self.audio_frames % interval == 0 {
            self.observer.record(Observation::AudioMilestone {
                call_id: self.call_id.clone(),
                frames: self.audio_frames,
                audio_ms: self.config.codec.duration_ms(self.audio_bytes as usize),
            });
        }
    }

    /// Sends directly once the buffer has been flushed, buffers otherwise.
    fn send_to_ai(&mut self, lane: Lane, event: &ClientEvent, out: &mut Vec<Directive>) {
        if self.is_closed() {
            return;
        }
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize realtime event");
                return;
            }
        };
        let Some(buffer) = self.buffer.as_mut() else {
            out.push(Directive::SendToAi(payload));
            return;
        };
        if let Err(e) = buffer.push(lane, payload) {
            warn!(error = %e, "AI connection not ready in time; closing call");
            self.close(CloseReason::BufferOverflow, true, true, out);
        }
    }

    fn send_to_telephony(&self, command: &TelephonyCommand, out: &mut Vec<Directive>) {
        match serde_json::to_string(command) {
            Ok(payload) => out.push(Directive::SendToTelephony(payload)),
            Err(e) => warn!(error = %e, "Failed to serialize telephony command"),
        }
    }

    /// Sends the turn mark at most once per response.
    fn mark_turn(&mut self, mark: &TelephonyCommand, out: &mut Vec<Directive>) {
        if !self.response_active || self.mark_sent {
            debug!("Ignoring duplicate turn boundary");
            return;
        }
        self.mark_sent = true;
        self.send_to_telephony(mark, out);
    }

    fn flush(&mut self, out: &mut Vec<Directive>) {
        if let Some(buffer) = self.buffer.take() {
            debug!(
                frames = buffer.len(),
                audio = buffer.audio_len(),
                "Flushing readiness buffer"
            );
            out.extend(buffer.drain().map(|frame| Directive::SendToAi(frame.payload)));
        }
    }

    fn close(
        &mut self,
        reason: CloseReason,
        close_ai: bool,
        close_telephony: bool,
        out: &mut Vec<Directive>,
    ) {
        if self.is_closed() {
            return;
        }
        self.phase = Phase::Closed;
        self.buffer = None;
        if close_ai {
            out.push(Directive::CloseAi);
        }
        if close_telephony {
            out.push(Directive::CloseTelephony);
        }
        self.observer.record(Observation::SessionClosed {
            call_id: self.call_id.clone(),
            reason,
            frames: self.audio_frames,
        });
    }
}
