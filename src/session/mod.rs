//! Session management module.
//!
//! This module provides the session identity type, the per-connection
//! session state, the lifecycle state machine, and the authoritative
//! registry mapping identities to live sessions.

mod id;
mod registry;
#[allow(clippy::module_inception)]
mod session;
mod state;

pub use id::SessionId;
pub use registry::SessionRegistry;
pub use session::{Attachment, Session, PUSH_CHANNEL_CAPACITY};
pub use state::SessionPhase;
