//! `GET /ws/document/{id}/status` (spec §6 "progress event shape").
//!
//! Grounded in the teacher's `services/event_bus.rs` pub/sub bridging
//! idea, now backed directly by `redis`'s async pub/sub client (a
//! dedicated connection outside the `deadpool-redis` pool, since a
//! blocking `SUBSCRIBE` loop can't share a pooled connection with regular
//! commands) rather than an in-process broadcast channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::cache::progress_channel;
use crate::state::AppState;

pub async fn document_status(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<Uuid>,
) -> Result<Response, edtech_core::error::ApiError> {
    // Authorize before upgrading so an inaccessible document yields a
    // normal JSON 403/404 instead of a silently-closed socket.
    state
        .document_auth
        .load_authorized(user.user_id, user.role, document_id)
        .await?;

    Ok(ws.on_upgrade(move |socket| stream_progress(socket, state, document_id)))
}

async fn stream_progress(mut socket: WebSocket, state: AppState, document_id: Uuid) {
    let client = match redis::Client::open(state.settings.cache.url.clone()) {
        Ok(c) => c,
        Err(e) => {
            warn!(document_id = %document_id, error = %e, "failed to open redis client for ws progress bridge");
            let _ = socket.close().await;
            return;
        }
    };

    let mut pubsub = match client.get_async_pubsub().await {
        Ok(p) => p,
        Err(e) => {
            warn!(document_id = %document_id, error = %e, "failed to open redis pub/sub connection");
            let _ = socket.close().await;
            return;
        }
    };

    let channel = progress_channel(document_id);
    if let Err(e) = pubsub.subscribe(&channel).await {
        warn!(document_id = %document_id, error = %e, "failed to subscribe to progress channel");
        let _ = socket.close().await;
        return;
    }

    let mut messages = pubsub.on_message();
    loop {
        tokio::select! {
            msg = messages.next() => {
                let Some(msg) = msg else { break };
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(document_id = %document_id, error = %e, "undecodable progress payload");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // client messages are ignored; this channel is server-push only
                    Some(Err(e)) => {
                        debug!(document_id = %document_id, error = %e, "ws recv error");
                        break;
                    }
                }
            }
        }
    }
}
