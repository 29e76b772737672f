//! Response types for the diagnostic endpoints.

use serde::{Deserialize, Serialize};

use crate::session::{Session, SessionId};

/// One entry of the session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identity.
    pub session_id: SessionId,
    /// Messages processed so far.
    pub messages: u64,
    /// Seconds until the fixed session deadline fires.
    pub expires_in_secs: u64,
}

impl SessionSummary {
    /// Build a summary from a live session.
    ///
    /// The counter read is a point-in-time value; the listing is for
    /// operational visibility only.
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id(),
            messages: session.counter().unwrap_or(0),
            expires_in_secs: session.expires_in().as_secs(),
        }
    }
}

/// Response body for `GET /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            error: "INTERNAL_ERROR".to_string(),
            message: message.into(),
        }
    }
}
