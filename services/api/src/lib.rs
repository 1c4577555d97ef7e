//! callbridge API Library Crate
//!
//! This library contains the network side of the call relay: configuration,
//! application state, the signaling and health handlers, the per-call
//! WebSocket coordinator, and routing. The `api` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
