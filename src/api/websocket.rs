//! The per-connection lifecycle: admission, read loop, dispatch loop,
//! teardown.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::IntoResponse,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::handlers::AppState;
use crate::error::RelayError;
use crate::session::{Attachment, Session, SessionId, PUSH_CHANNEL_CAPACITY};
use crate::Result;

/// Reserved payload that triggers a graceful client-initiated close.
pub const CLOSE_SENTINEL: &str = "close";

/// Buffer between the read task and the dispatch loop. Bounded so a client
/// that outruns dispatch suspends in the transport instead of growing a
/// queue.
const INBOUND_CHANNEL_CAPACITY: usize = 32;

const NON_TEXT_NOTICE: &str = "Only text messages are supported";
const EXPIRED_NOTICE: &str = "Session expired. Closing connection with client";
const CLOSING_NOTICE: &str = "Closing connection with client";

/// Wire format note: the server speaks plain UTF-8 text lines, no structured
/// envelope. These builders are the complete server-to-client vocabulary
/// besides the fixed notices above.
fn welcome_line(id: SessionId, token: &str) -> String {
    format!(
        "Connection Successful with session id {id}. Welcome to the server!. \
         Your JWT token for futhur login is {token}"
    )
}

fn echo_ack(payload: &str, counter: u64) -> String {
    format!("Received message {payload} from client. This is message number {counter}")
}

fn not_found_line(id: SessionId) -> String {
    format!("Client with session id {id} not found")
}

/// A frame forwarded from the read task to the dispatch loop.
#[derive(Debug)]
enum Inbound {
    Text(String),
    /// Binary frame; out of protocol scope by design.
    Unsupported,
}

/// Why the dispatch loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// The fixed session deadline fired.
    Expired,
    /// Client sent the close sentinel.
    ClientClose,
    /// Client sent a non-text frame.
    UnsupportedFrame,
    /// Read side ended: peer disconnected or read failed.
    PeerGone,
    /// Write to the connection failed.
    WriteFailed,
    /// A newer connection reattached to the session; this handler must
    /// exit without touching the session or the registry.
    Superseded,
    /// Internal failure (poisoned lock).
    Internal,
}

/// WebSocket upgrade entry point.
///
/// An optional `Authorization: Bearer <token>` header selects between a new
/// anonymous session and resuming an existing one.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let bearer = bearer_token(&headers);
    ws.on_upgrade(move |socket| handle_socket(socket, state, bearer))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

/// Admission: decide between a fresh anonymous session and reattaching to an
/// existing one, and bind this connection's push channel to the session.
///
/// No session is created or mutated on any failure path.
fn admit(
    state: &AppState,
    bearer: Option<&str>,
    push_tx: mpsc::Sender<String>,
) -> Result<(Arc<Session>, Attachment, bool)> {
    match bearer {
        None => {
            let session = Arc::new(Session::new(SessionId::new(), state.session_ttl));
            let attachment = session.attach(push_tx)?;
            state.registry.register(Arc::clone(&session))?;
            Ok((session, attachment, false))
        }
        Some(token) => {
            let id = state.tokens.verify(token)?;
            let session = state
                .registry
                .lookup(&id)?
                .ok_or(RelayError::UnknownSession(id))?;
            // The session may terminate between lookup and attach; treat
            // that the same as an unregistered identity.
            let attachment = session
                .attach(push_tx)
                .map_err(|_| RelayError::UnknownSession(id))?;
            Ok((session, attachment, true))
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState, bearer: Option<String>) {
    let (push_tx, mut push_rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);

    let (session, attachment, resumed) = match admit(&state, bearer.as_deref(), push_tx) {
        Ok(admitted) => admitted,
        Err(RelayError::InvalidToken(reason)) => {
            warn!(%reason, "rejecting connection with invalid token");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "invalid token".into(),
                })))
                .await;
            return;
        }
        Err(RelayError::UnknownSession(id)) => {
            warn!(session_id = %id, "rejecting token for unregistered session");
            let _ = socket.send(Message::Text(not_found_line(id).into())).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        Err(e) => {
            // DuplicateIdentity or a poisoned lock; fatal to this admission
            // only.
            error!(error = %e, "admission failed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let id = session.id();
    if resumed {
        info!(session_id = %id, generation = attachment.generation, "session resumed");
    } else {
        info!(session_id = %id, "session created");
    }

    // A fresh token and the welcome line are the first outbound message.
    let token = match state.tokens.issue(id) {
        Ok(token) => token,
        Err(e) => {
            error!(session_id = %id, error = %e, "failed to issue token");
            teardown(&state, &session, &attachment);
            return;
        }
    };
    if socket
        .send(Message::Text(welcome_line(id, &token).into()))
        .await
        .is_err()
    {
        debug!(session_id = %id, "connection lost before welcome");
        teardown(&state, &session, &attachment);
        return;
    }

    let (mut sink, stream) = socket.split();
    let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
    let read_task = tokio::spawn(read_loop(stream, inbound_tx));

    let reason = dispatch_loop(&mut sink, &session, &attachment, &mut inbound_rx, &mut push_rx).await;

    // The read task has no exit signal of its own; a peer that goes silent
    // after server-initiated teardown would otherwise park it on the
    // transport forever and keep the socket half-open. Aborting it drops
    // the stream half, so the socket fully closes once the sink goes too.
    read_task.abort();

    if reason == CloseReason::Superseded {
        // The abandoned connection is left to die on its own; the new
        // attachment now owns the session.
        debug!(session_id = %id, generation = attachment.generation, "attachment superseded");
        return;
    }

    // Best-effort farewell, but only if this handler still owns the close.
    if session.begin_close(attachment.generation).unwrap_or(false) {
        let farewell = match reason {
            CloseReason::Expired => Some(EXPIRED_NOTICE),
            CloseReason::ClientClose => Some(CLOSING_NOTICE),
            CloseReason::UnsupportedFrame => Some(NON_TEXT_NOTICE),
            CloseReason::PeerGone
            | CloseReason::WriteFailed
            | CloseReason::Internal
            | CloseReason::Superseded => None,
        };
        if let Some(text) = farewell {
            let _ = sink.send(Message::Text(text.into())).await;
        }
    }

    teardown(&state, &session, &attachment);
    let _ = sink.send(Message::Close(None)).await;
    info!(session_id = %id, ?reason, "connection closed");
}

/// Read task: forwards frames into the dispatch loop in FIFO order.
///
/// This task never writes to the connection; the dispatch loop owns the
/// write half exclusively. It ends when the transport fails, the peer sends
/// a close frame, or the dispatch loop goes away.
async fn read_loop(mut stream: SplitStream<WebSocket>, tx: mpsc::Sender<Inbound>) {
    loop {
        let frame = match stream.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                let err = RelayError::Transport(e.to_string());
                debug!(error = %err, "read failed");
                break;
            }
            None => break,
        };

        let inbound = match frame {
            Message::Text(text) => Inbound::Text(text.to_string()),
            Message::Binary(_) => Inbound::Unsupported,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if tx.send(inbound).await.is_err() {
            break;
        }
    }
}

/// Dispatch loop: multi-way wait over inbound messages, server pushes, the
/// session deadline, and supersession by a reattaching connection.
async fn dispatch_loop(
    sink: &mut SplitSink<WebSocket, Message>,
    session: &Arc<Session>,
    attachment: &Attachment,
    inbound_rx: &mut mpsc::Receiver<Inbound>,
    push_rx: &mut mpsc::Receiver<String>,
) -> CloseReason {
    let deadline = session.deadline();

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                return CloseReason::Expired;
            }
            _ = attachment.superseded.notified() => {
                return CloseReason::Superseded;
            }
            push = push_rx.recv() => {
                match push {
                    Some(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            return CloseReason::WriteFailed;
                        }
                    }
                    // The session replaced our push channel.
                    None => return CloseReason::Superseded,
                }
            }
            inbound = inbound_rx.recv() => {
                match inbound {
                    None => return CloseReason::PeerGone,
                    Some(Inbound::Unsupported) => {
                        let err = RelayError::ProtocolViolation("non-text frame");
                        warn!(session_id = %session.id(), error = %err, "rejecting frame");
                        return CloseReason::UnsupportedFrame;
                    }
                    Some(Inbound::Text(text)) if text == CLOSE_SENTINEL => {
                        return CloseReason::ClientClose;
                    }
                    Some(Inbound::Text(text)) => {
                        let counter = match session.record_message(attachment.generation) {
                            Ok(Some(counter)) => counter,
                            Ok(None) => return CloseReason::Superseded,
                            Err(_) => return CloseReason::Internal,
                        };
                        if sink
                            .send(Message::Text(echo_ack(&text, counter).into()))
                            .await
                            .is_err()
                        {
                            return CloseReason::WriteFailed;
                        }
                    }
                }
            }
        }
    }
}

/// Remove the session from the registry, exactly once per session.
///
/// Safe to call from every exit path: a superseded attachment is a no-op,
/// and the finish/remove pair collapses concurrent teardown attempts.
fn teardown(state: &AppState, session: &Session, attachment: &Attachment) {
    match session.finish(attachment.generation) {
        Ok(true) => {
            if let Err(e) = state.registry.remove(&session.id()) {
                error!(session_id = %session.id(), error = %e, "failed to deregister session");
            } else {
                info!(session_id = %session.id(), "session terminated");
            }
        }
        Ok(false) => {}
        Err(e) => error!(session_id = %session.id(), error = %e, "teardown failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_welcome_line_shape() {
        let id = SessionId::new();
        let line = welcome_line(id, "abc.def.ghi");
        assert_eq!(
            line,
            format!(
                "Connection Successful with session id {id}. Welcome to the server!. \
                 Your JWT token for futhur login is abc.def.ghi"
            )
        );
    }

    #[test]
    fn test_echo_ack_shape() {
        assert_eq!(
            echo_ack("ping", 1),
            "Received message ping from client. This is message number 1"
        );
        assert_eq!(
            echo_ack("hello world", 42),
            "Received message hello world from client. This is message number 42"
        );
    }

    #[test]
    fn test_not_found_line_shape() {
        let id = SessionId::new();
        assert_eq!(
            not_found_line(id),
            format!("Client with session id {id} not found")
        );
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer tok123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("tok123".to_string()));

        headers.insert(AUTHORIZATION, "Basic dXNlcg==".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_admit_anonymous_registers_fresh_identity() {
        let state = AppState::with_secret(b"secret");
        let (tx, _rx) = mpsc::channel(1);

        let (session, attachment, resumed) = admit(&state, None, tx).unwrap();
        assert!(!resumed);
        assert_eq!(attachment.generation, 1);
        assert_eq!(state.registry.count(), 1);
        assert!(state
            .registry
            .lookup(&session.id())
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_admit_anonymous_identities_are_distinct() {
        let state = AppState::with_secret(b"secret");
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);

        let (s1, _, _) = admit(&state, None, tx1).unwrap();
        let (s2, _, _) = admit(&state, None, tx2).unwrap();
        assert_ne!(s1.id(), s2.id());
        assert_eq!(state.registry.count(), 2);
    }

    #[tokio::test]
    async fn test_admit_invalid_token_creates_nothing() {
        let state = AppState::with_secret(b"secret");
        let (tx, _rx) = mpsc::channel(1);

        let err = admit(&state, Some("garbage"), tx).unwrap_err();
        assert!(matches!(err, RelayError::InvalidToken(_)));
        assert_eq!(state.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_admit_unknown_session_creates_nothing() {
        let state = AppState::with_secret(b"secret");
        // Valid token for an identity never registered.
        let token = state.tokens.issue(SessionId::new()).unwrap();
        let (tx, _rx) = mpsc::channel(1);

        let err = admit(&state, Some(&token), tx).unwrap_err();
        assert!(matches!(err, RelayError::UnknownSession(_)));
        assert_eq!(state.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_admit_resume_preserves_counter() {
        let state = AppState::with_secret(b"secret");
        let (tx1, _rx1) = mpsc::channel(1);
        let (session, first, _) = admit(&state, None, tx1).unwrap();
        session.record_message(first.generation).unwrap();
        session.record_message(first.generation).unwrap();

        let token = state.tokens.issue(session.id()).unwrap();
        let (tx2, _rx2) = mpsc::channel(1);
        let (resumed_session, second, resumed) = admit(&state, Some(&token), tx2).unwrap();

        assert!(resumed);
        assert_eq!(resumed_session.id(), session.id());
        assert_eq!(second.generation, 2);
        assert_eq!(
            resumed_session.record_message(second.generation).unwrap(),
            Some(3)
        );
        // Still a single registry entry.
        assert_eq!(state.registry.count(), 1);
    }

    #[tokio::test]
    async fn test_admit_resume_after_teardown_is_unknown() {
        let state = AppState::with_secret(b"secret");
        let (tx1, _rx1) = mpsc::channel(1);
        let (session, attachment, _) = admit(&state, None, tx1).unwrap();
        let token = state.tokens.issue(session.id()).unwrap();

        teardown(&state, &session, &attachment);
        assert_eq!(state.registry.count(), 0);

        let (tx2, _rx2) = mpsc::channel(1);
        let err = admit(&state, Some(&token), tx2).unwrap_err();
        assert!(matches!(err, RelayError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn test_teardown_by_superseded_attachment_is_noop() {
        let state = AppState::with_secret(b"secret");
        let (tx1, _rx1) = mpsc::channel(1);
        let (session, old, _) = admit(&state, None, tx1).unwrap();

        let token = state.tokens.issue(session.id()).unwrap();
        let (tx2, _rx2) = mpsc::channel(1);
        let (_, new, _) = admit(&state, Some(&token), tx2).unwrap();

        // The abandoned handler's teardown must not remove the entry the
        // new attachment depends on.
        teardown(&state, &session, &old);
        assert_eq!(state.registry.count(), 1);

        teardown(&state, &session, &new);
        assert_eq!(state.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let state = AppState::with_secret(b"secret");
        let (tx, _rx) = mpsc::channel(1);
        let (session, attachment, _) = admit(&state, None, tx).unwrap();

        teardown(&state, &session, &attachment);
        teardown(&state, &session, &attachment);
        assert_eq!(state.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_deadline_is_not_renewed_by_resume() {
        let state = AppState::with_secret(b"secret");
        let (tx1, _rx1) = mpsc::channel(1);
        let (session, _, _) = admit(&state, None, tx1).unwrap();
        let deadline = session.deadline();

        tokio::time::sleep(Duration::from_millis(20)).await;

        let token = state.tokens.issue(session.id()).unwrap();
        let (tx2, _rx2) = mpsc::channel(1);
        let (resumed_session, _, _) = admit(&state, Some(&token), tx2).unwrap();
        assert_eq!(resumed_session.deadline(), deadline);
    }
}
