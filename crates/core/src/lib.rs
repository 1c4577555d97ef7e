//! Core call-relay logic, free of any network I/O.
//!
//! The service crate owns the sockets; everything here consumes text frames
//! and produces [`Directive`]s describing what the sockets should do next.

pub mod buffer;
pub mod generic_types;
pub mod instructions;
pub mod observer;
pub mod realtime;
pub mod routing;
pub mod session;
pub mod telephony;
pub mod translator;

/// Represents commands that the call session issues to the runtime that owns
/// the two sockets.
///
/// Directives are returned in the exact order they must be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Send a serialized message to the realtime AI connection.
    SendToAi(String),
    /// Send a serialized message to the telephony media stream.
    SendToTelephony(String),
    /// Close the realtime AI connection.
    CloseAi,
    /// Close the telephony media stream.
    CloseTelephony,
}
