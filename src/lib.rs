//! # session-relay
//!
//! WebSocket message server with token-resumable sessions.
//!
//! Clients open a persistent connection, exchange text messages with the
//! server, and receive a signed token they can later present to resume the
//! same session on a new connection instead of starting over anonymously.
//!
//! ## Features
//!
//! - **Session registry**: single authoritative identity-to-session map
//! - **Resumption tokens**: HS256 JWTs asserting a session identity
//! - **Hard hand-off reattachment**: a resuming connection supersedes the
//!   previous one without tearing the session down
//! - **Fixed session lifetime**: the deadline is set at creation and never
//!   extended
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_relay::api::{serve, AppState, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> session_relay::Result<()> {
//!     session_relay::logging::try_init().ok();
//!
//!     let state = AppState::with_secret(b"change-me");
//!     serve(ServerConfig::new("127.0.0.1", 8080), state).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;

// Re-export commonly used types
pub use api::{create_router, serve, AppState, ServerConfig};
pub use auth::TokenService;
pub use config::Config;
pub use error::{RelayError, Result};
pub use session::{Session, SessionId, SessionPhase, SessionRegistry};
