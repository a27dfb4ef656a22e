//! Connection lifecycle: AwaitingAuth → Active → Closed.
//!
//! Authentication happens before the upgrade completes; an invalid
//! credential is refused with 401 and no frame is ever sent. Once active,
//! inbound commands are processed one at a time while a dedicated writer
//! task drains the session's bounded outbound queue.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::protocol::{ClientCommand, PageSnapshot, ServerEvent, SessionUser};
use super::registry::SessionHandle;
use crate::error::Result;
use crate::server::AppState;
use crate::store::Store;
use crate::types::User;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(token) = params.token else {
        return (StatusCode::UNAUTHORIZED, "Token required").into_response();
    };
    let claims = match state.credentials.verify(&token) {
        Ok(claims) => claims,
        Err(_) => return (StatusCode::UNAUTHORIZED, "Invalid token").into_response(),
    };
    let user = match state.store.get_user(&claims.sub) {
        Ok(Some(user)) => user,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "Invalid token").into_response(),
        Err(e) => {
            tracing::error!("failed to load user for websocket auth: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    ws.on_upgrade(move |socket| run_session(socket, state, user))
}

async fn run_session(socket: WebSocket, state: Arc<AppState>, user: User) {
    let (tx, rx) = mpsc::channel(state.send_queue_depth);
    let handle = Arc::new(SessionHandle::new(
        user.id.clone(),
        user.username.clone(),
        tx,
    ));

    let snapshot = match initial_state(state.store.as_ref(), &user) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(user = %user.username, "failed to build initial snapshot: {e}");
            return;
        }
    };

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(pump_outbound(sink, rx, handle.clone()));

    // The snapshot goes into the queue before the session joins the
    // registry, so it is always the first frame on the wire and no
    // broadcast can precede it.
    if handle.send_event(&snapshot) {
        state.registry.attach(handle.clone());
        tracing::info!(user = %user.username, session = %handle.id(), "session connected");

        pump_inbound(stream, &state, &handle).await;

        state.registry.detach(&handle);
        tracing::info!(user = %user.username, session = %handle.id(), "session closed");
    }

    handle.close();
    let _ = writer.await;
}

fn initial_state(store: &dyn Store, user: &User) -> Result<ServerEvent> {
    let visible = store.list_pages_visible_to(&user.id)?;
    let page_ids: Vec<String> = visible.iter().map(|v| v.page.id.clone()).collect();
    let alarms = store.list_alarms_in_pages(&page_ids)?;

    Ok(ServerEvent::InitialState {
        user: SessionUser {
            id: user.id.clone(),
            username: user.username.clone(),
        },
        pages: visible.iter().map(PageSnapshot::from_visible).collect(),
        alarms,
    })
}

/// Reads frames until the peer goes away or the session is cancelled.
/// Commands run sequentially; the next frame is not read until the
/// current one has committed and enqueued its fan-out.
async fn pump_inbound(
    mut stream: SplitStream<WebSocket>,
    state: &Arc<AppState>,
    handle: &Arc<SessionHandle>,
) {
    loop {
        tokio::select! {
            _ = handle.cancelled() => break,
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientCommand>(text.as_str()) {
                        Ok(command) => state.dispatcher.dispatch(handle, command),
                        Err(e) => {
                            handle.send_event(&ServerEvent::error(format!(
                                "malformed message: {e}"
                            )));
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Pings and pongs are answered by the transport layer.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session = %handle.id(), "transport error: {e}");
                    break;
                }
            }
        }
    }
}

/// Single writer per session: drains the bounded queue in enqueue order.
async fn pump_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    handle: Arc<SessionHandle>,
) {
    loop {
        tokio::select! {
            _ = handle.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if sink.send(frame).await.is_err() {
                        handle.close();
                        break;
                    }
                }
                None => break,
            }
        }
    }
    let _ = sink.close().await;
}
