//! HTTP and WebSocket surface of the server.
//!
//! ## Endpoints
//!
//! - `WS /` - persistent message connection; an optional
//!   `Authorization: Bearer <token>` header resumes an existing session
//! - `GET /sessions` - diagnostic listing of live sessions
//! - `GET /health` - health check
//!
//! ## Example
//!
//! ```no_run
//! use session_relay::api::{serve, AppState, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> session_relay::Result<()> {
//!     let state = AppState::with_secret(b"secret");
//!     serve(ServerConfig::default(), state).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;
pub mod websocket;

// Re-export commonly used types
pub use handlers::{AppState, DEFAULT_SESSION_TTL, DEFAULT_TOKEN_TTL};
pub use router::{create_router, serve, ServerConfig};
pub use types::{ErrorResponse, ListSessionsResponse, SessionSummary};
pub use websocket::CLOSE_SENTINEL;
