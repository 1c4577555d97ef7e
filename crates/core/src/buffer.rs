//! Holding area for AI-bound frames produced before the AI connection opens.
//!
//! Frames are kept in two lanes. Draining yields every control frame in
//! arrival order, then every audio frame in arrival order. [`ReadinessBuffer::drain`]
//! consumes the buffer, so each frame is delivered at most once and the buffer
//! cannot be reused after the session becomes ready.

use std::collections::VecDeque;
use thiserror::Error;

/// Which lane a frame is queued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Session configuration and response requests.
    Control,
    /// Audio appends and anything that must stay ordered behind them.
    Audio,
}

/// A fully serialized AI-bound message waiting for the connection to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    /// Arrival ordinal across both lanes.
    pub position: u64,
    pub lane: Lane,
    pub payload: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("Readiness buffer is full ({capacity} frames)")]
    Full { capacity: usize },
}

#[derive(Debug)]
pub struct ReadinessBuffer {
    control: VecDeque<QueuedFrame>,
    audio: VecDeque<QueuedFrame>,
    next_position: u64,
    capacity: usize,
}

impl ReadinessBuffer {
    /// Creates an empty buffer holding at most `capacity` frames in total.
    pub fn new(capacity: usize) -> Self {
        Self {
            control: VecDeque::new(),
            audio: VecDeque::new(),
            next_position: 0,
            capacity,
        }
    }

    pub fn push(&mut self, lane: Lane, payload: String) -> Result<(), BufferError> {
        if self.len() >= self.capacity {
            return Err(BufferError::Full {
                capacity: self.capacity,
            });
        }
        let frame = QueuedFrame {
            position: self.next_position,
            lane,
            payload,
        };
        self.next_position += 1;
        match lane {
            Lane::Control => self.control.push_back(frame),
            Lane::Audio => self.audio.push_back(frame),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.control.len() + self.audio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn audio_len(&self) -> usize {
        self.audio.len()
    }

    /// Consumes the buffer, yielding control frames then audio frames.
    pub fn drain(self) -> impl Iterator<Item = QueuedFrame> {
        self.control.into_iter().chain(self.audio)
    }
}
