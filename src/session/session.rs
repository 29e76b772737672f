//! Per-connection session state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use super::{SessionId, SessionPhase};
use crate::error::RelayError;
use crate::Result;

/// Buffer size for the server-push channel of one attachment.
pub const PUSH_CHANNEL_CAPACITY: usize = 32;

/// Handle proving ownership of the currently attached physical connection.
///
/// Every teardown-like operation on [`Session`] takes the attachment
/// generation, so a connection handler that has been superseded by a
/// reattachment can no longer mutate the session or remove it from the
/// registry. The `superseded` notifier fires when a newer connection takes
/// over; the old dispatch loop must observe it and exit without teardown.
#[derive(Debug)]
pub struct Attachment {
    pub generation: u64,
    pub superseded: Arc<Notify>,
}

#[derive(Debug)]
struct Inner {
    phase: SessionPhase,
    counter: u64,
    generation: u64,
    push_tx: Option<mpsc::Sender<String>>,
    supersede: Option<Arc<Notify>>,
}

/// Server-side state for one logical client conversation.
///
/// A session outlives individual physical connections: a client holding a
/// valid resumption token may reattach after a disconnect and continue with
/// the same identity and message counter. At most one physical connection is
/// attached at a time; attaching supersedes the previous one (hard hand-off).
///
/// The deadline is fixed at creation and never extended, neither by activity
/// nor by reattachment.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    deadline: Instant,
    inner: Mutex<Inner>,
}

impl Session {
    /// Create a new session that expires `ttl` from now.
    pub fn new(id: SessionId, ttl: Duration) -> Self {
        Self {
            id,
            deadline: Instant::now() + ttl,
            inner: Mutex::new(Inner {
                phase: SessionPhase::Admitting,
                counter: 0,
                generation: 0,
                push_tx: None,
                supersede: None,
            }),
        }
    }

    /// The session's identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Absolute expiry instant, fixed at creation.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time remaining until expiry (zero if already past).
    pub fn expires_in(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| RelayError::LockPoisoned)
    }

    /// Bind a physical connection to this session.
    ///
    /// Installs `push_tx` as the outbound server-push channel, supersedes any
    /// previously attached connection, and returns the new [`Attachment`].
    /// Fails with [`RelayError::SessionTerminated`] if the session already
    /// ended; the caller should treat that the same as an unregistered
    /// identity.
    pub fn attach(&self, push_tx: mpsc::Sender<String>) -> Result<Attachment> {
        let mut inner = self.lock()?;
        if inner.phase.is_terminal() {
            return Err(RelayError::SessionTerminated);
        }
        inner.phase.transition_to(SessionPhase::Active)?;

        let notify = Arc::new(Notify::new());
        if let Some(old) = inner.supersede.replace(Arc::clone(&notify)) {
            old.notify_one();
        }
        inner.push_tx = Some(push_tx);
        inner.generation += 1;

        Ok(Attachment {
            generation: inner.generation,
            superseded: notify,
        })
    }

    /// Record one successfully processed client message.
    ///
    /// Returns the post-increment counter value, or `None` if the caller's
    /// attachment has been superseded or the session is no longer active.
    pub fn record_message(&self, generation: u64) -> Result<Option<u64>> {
        let mut inner = self.lock()?;
        if inner.generation != generation || !inner.phase.is_active() {
            return Ok(None);
        }
        inner.counter += 1;
        Ok(Some(inner.counter))
    }

    /// Current message counter (diagnostics only).
    pub fn counter(&self) -> Result<u64> {
        Ok(self.lock()?.counter)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Result<SessionPhase> {
        Ok(self.lock()?.phase)
    }

    /// Enter the closing phase on behalf of attachment `generation`.
    ///
    /// Returns `true` if this call performed the transition. Returns `false`
    /// when the attachment was superseded or the session is already closing
    /// or terminated, in which case the caller must skip farewell and
    /// teardown.
    pub fn begin_close(&self, generation: u64) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.generation != generation {
            return Ok(false);
        }
        Ok(inner.phase.transition_to(SessionPhase::Closing).is_ok())
    }

    /// Terminate the session on behalf of attachment `generation`.
    ///
    /// Returns `true` exactly once per session: concurrent teardown attempts
    /// from the timer, read failure and write failure paths collapse into a
    /// single effective teardown, and superseded attachments are ignored.
    /// The caller that receives `true` is responsible for removing the
    /// session from the registry.
    pub fn finish(&self, generation: u64) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.generation != generation || inner.phase.is_terminal() {
            return Ok(false);
        }
        if inner.phase.is_active() {
            inner.phase.transition_to(SessionPhase::Closing)?;
        }
        inner.phase.transition_to(SessionPhase::Terminated)?;
        inner.push_tx = None;
        inner.supersede = None;
        Ok(true)
    }

    /// Enqueue a server-initiated message for the currently attached
    /// connection.
    ///
    /// Fails with [`RelayError::ChannelClosed`] if no connection is attached
    /// or the attachment is gone.
    pub async fn push(&self, message: impl Into<String>) -> Result<()> {
        let tx = self
            .lock()?
            .push_tx
            .clone()
            .ok_or(RelayError::ChannelClosed)?;
        tx.send(message.into())
            .await
            .map_err(|_| RelayError::ChannelClosed)
    }
}
