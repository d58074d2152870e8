//! Live thread feed over WebSocket.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use common::ThreadId;
use domain::Message;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::parse_uuid;
use crate::routes::threads::MessageResponse;

/// GET /threads/:id/feed — upgrade to a WebSocket that streams every
/// message appended to the thread from this point on.
#[tracing::instrument(skip(state, ws))]
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let thread_id = ThreadId::from_uuid(parse_uuid(&id)?);

    // Unknown threads are rejected before the upgrade so the client
    // sees a plain 404 instead of a dropped socket.
    state.chat.thread(thread_id).await?;

    let rx = state.feed.subscribe();
    metrics::counter!("feed_subscriptions_total").increment(1);

    Ok(ws.on_upgrade(move |socket| pump(socket, rx, thread_id)))
}

/// Forwards feed messages for one thread to the socket until either
/// side disconnects.
async fn pump(socket: WebSocket, mut rx: broadcast::Receiver<Message>, thread_id: ThreadId) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(message) => {
                    if message.thread_id != thread_id {
                        continue;
                    }
                    let Ok(text) = serde_json::to_string(&MessageResponse::from(message)) else {
                        continue;
                    };
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // A slow consumer skips what it missed rather than
                // stalling the feed for everyone else.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%thread_id, skipped, "feed subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
