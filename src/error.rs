//! Error types for session-relay.

use thiserror::Error;

use crate::session::SessionId;

/// Main error type for session-relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Presented token failed verification (bad signature, malformed, expired).
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token verified but the claimed session is not registered.
    #[error("client with session id {0} not found")]
    UnknownSession(SessionId),

    /// A session with this identity is already registered.
    ///
    /// Identities are random 128-bit values, so this indicates an internal
    /// invariant violation rather than a client error.
    #[error("session {0} already registered")]
    DuplicateIdentity(SessionId),

    /// Read or write failure on the physical connection.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Client sent a frame outside the text-only protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// Attempted to attach a connection to a session that already ended.
    #[error("session terminated")]
    SessionTerminated,

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionPhase,
        to: crate::session::SessionPhase,
    },

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// Channel closed while a message was in flight.
    #[error("channel closed")]
    ChannelClosed,

    /// Token signing failed.
    #[error("token signing failed: {0}")]
    TokenSigning(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for session-relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
