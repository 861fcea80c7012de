//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use tokio::sync::mpsc;

use collab_shared::protocol::ClientFrame;

use crate::{
    domain::{RoomId, UserId},
    ui::state::AppState,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub room_id: String,
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Accepted for compatibility; the reference server does not authenticate.
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let room_id = RoomId::new(query.room_id).map_err(|e| {
        tracing::warn!("Rejecting connection: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let user_id = UserId::new(query.user_id).map_err(|e| {
        tracing::warn!("Rejecting connection: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    if query.token.is_some() {
        tracing::debug!("Connection of '{}' carries a token", user_id);
    }
    let display_name = query.display_name.unwrap_or_default();

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, user_id, display_name)))
}

/// Forward frames queued for this connection to the socket.
///
/// Ends when the channel is closed, i.e. the connection was unregistered, and then sends a
/// close frame.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                return;
            }
        }
        sender.send(Message::Close(None)).await.ok();
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    room_id: RoomId,
    user_id: UserId,
    display_name: String,
) {
    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    let joined = match state
        .join_room_usecase
        .execute(room_id.clone(), user_id.clone(), display_name, tx)
        .await
    {
        Ok(joined) => joined,
        Err(e) => {
            tracing::warn!("'{}' could not join room '{}': {}", user_id, room_id, e);
            return;
        }
    };
    let connection_id = joined.member.connection_id;
    tracing::info!(
        "'{}' joined room '{}' (connection {})",
        user_id,
        room_id,
        connection_id
    );

    let mut send_task = pusher_loop(rx, sender);

    let state_for_recv = state.clone();
    let room_for_recv = room_id.clone();
    let user_for_recv = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        let post = &state_for_recv.post_message_usecase;
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    let frame = match serde_json::from_str::<ClientFrame>(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("Unparsable frame from '{}': {}", user_for_recv, e);
                            post.reject(connection_id, &format!("unparsable frame: {}", e))
                                .await;
                            continue;
                        }
                    };
                    if let Err(e) = post
                        .execute(&room_for_recv, user_for_recv.clone(), frame)
                        .await
                    {
                        tracing::warn!("Message from '{}' rejected: {}", user_for_recv, e);
                        post.reject(connection_id, &e.to_string()).await;
                    }
                }
                Message::Close(_) => {
                    tracing::info!("'{}' requested close", user_for_recv);
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    match state
        .leave_room_usecase
        .execute(&room_id, &user_id, connection_id)
        .await
    {
        Ok(true) => tracing::info!("'{}' left room '{}'", user_id, room_id),
        Ok(false) => tracing::debug!("Connection {} of '{}' closed", connection_id, user_id),
        Err(e) => tracing::warn!("Failed to process leave of '{}': {}", user_id, e),
    }
}
