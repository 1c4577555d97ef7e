//! WebSocket Call Relay
//!
//! This module bridges each telephony media stream to its own realtime AI
//! connection:
//!
//! - `session`: Upgrades the telephony socket and runs the per-call event loop.
//! - `provider`: Opens connections to the realtime AI service.

pub mod provider;
pub mod session;

pub use session::media_stream_handler;
