//! Diagnostic HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};

use super::types::{ErrorResponse, ListSessionsResponse, SessionSummary};
use crate::auth::TokenService;
use crate::session::SessionRegistry;

/// Default fixed session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

/// Default resumption token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Shared application state.
///
/// The registry and token service are constructed once at server startup and
/// handed to every connection handler; there is no process-wide singleton.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub tokens: Arc<TokenService>,
    pub session_ttl: Duration,
}

impl AppState {
    /// Build state from an explicit token service and session lifetime.
    pub fn new(tokens: TokenService, session_ttl: Duration) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            tokens: Arc::new(tokens),
            session_ttl,
        }
    }

    /// State with default secret and lifetimes, for tests and examples.
    pub fn with_secret(secret: &[u8]) -> Self {
        Self::new(
            TokenService::new(secret, "session-relay", DEFAULT_TOKEN_TTL),
            DEFAULT_SESSION_TTL,
        )
    }
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// List current sessions with their message counters.
///
/// Built from a racy registry snapshot; operational visibility only, never
/// part of the client protocol.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ListSessionsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let snapshot = state.registry.snapshot().map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal_error(e.to_string())),
        )
    })?;

    let sessions: Vec<SessionSummary> = snapshot
        .iter()
        .map(|s| SessionSummary::from_session(s))
        .collect();

    Ok(Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionId};

    #[test]
    fn test_app_state_new() {
        let state = AppState::with_secret(b"secret");
        assert_eq!(state.registry.count(), 0);
        assert_eq!(state.session_ttl, DEFAULT_SESSION_TTL);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(health().await, "OK");
    }

    #[tokio::test]
    async fn test_list_sessions_reflects_registry() {
        let state = AppState::with_secret(b"secret");
        let session = Arc::new(Session::new(SessionId::new(), state.session_ttl));
        let id = session.id();
        state.registry.register(session).unwrap();

        let response = list_sessions(State(state)).await.unwrap();
        assert_eq!(response.0.count, 1);
        assert_eq!(response.0.sessions[0].session_id, id);
        assert_eq!(response.0.sessions[0].messages, 0);
    }
}
