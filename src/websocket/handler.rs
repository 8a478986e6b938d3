//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//! Both endpoints authenticate with an access token in the query string
//! before upgrading.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::{ClientMessage, ServerMessage, Topic};
use crate::api::extract::user_from_token;
use crate::api::routes::chat::post_message;
use crate::api::{ApiError, AppState};
use crate::auth::AuthError;
use crate::domain::User;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// Per-connection context shared by the receive loop
struct Session {
    state: Arc<AppState>,
    connection_id: String,
    user: User,
    /// Room a `/ws/chat/:room_id` socket is bound to
    room_id: Option<Uuid>,
}

/// `GET /ws?token=<access>`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SocketQuery>,
) -> Response {
    let user = match authenticate(&state, query.token.as_deref()) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, user, None))
}

/// `GET /ws/chat/:room_id?token=<access>`
///
/// Subscribes to the room on connect; plain `{"message": ...}` frames are
/// posted to it.
pub async fn chat_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<SocketQuery>,
) -> Response {
    let user = match authenticate(&state, query.token.as_deref()) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    let room = match state.db.get_chat_room(room_id) {
        Ok(room) => room,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if !room.is_participant(user.id) {
        return ApiError::forbidden("You are not part of this chat room").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, user, Some(room_id)))
}

fn authenticate(state: &AppState, token: Option<&str>) -> Result<User, ApiError> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    user_from_token(state, token)
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: User, room_id: Option<Uuid>) {
    let hub = Arc::clone(&state.ws_hub);
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = match hub.register(user.id, tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Rejected WebSocket connection");
            let error_msg = ServerMessage::Error {
                message: e.to_string(),
            };
            if let Some(frame) = encode(&error_msg) {
                let _ = sender.send(frame).await;
            }
            return;
        }
    };

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user.id,
        room_id = ?room_id,
        "WebSocket connected"
    );

    let connected_msg = ServerMessage::Connected {
        connection_id: connection_id.clone(),
        user_id: user.id,
    };
    let delivered = match encode(&connected_msg) {
        Some(frame) => sender.send(frame).await.is_ok(),
        None => false,
    };
    if !delivered {
        tracing::error!(connection_id = %connection_id, "Failed to send connected message");
        hub.unregister(&connection_id).await;
        return;
    }

    if let Some(room_id) = room_id {
        let topics = vec![Topic::Chat(room_id).to_string()];
        if let Err(e) = hub.subscribe(&connection_id, topics).await {
            tracing::error!(connection_id = %connection_id, error = %e, "Room subscribe failed");
        }
    }

    let conn_id_for_send = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Some(frame) = encode(&msg) else { continue };
            if sender.send(frame).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
    });

    let session = Session {
        state: Arc::clone(&state),
        connection_id: connection_id.clone(),
        user,
        room_id,
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&session, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %session.connection_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&connection_id).await;
    tracing::info!(connection_id = %connection_id, "WebSocket disconnected");
}

/// Handle a received WebSocket frame
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(session: &Session, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            match ClientMessage::parse(&text) {
                Ok(client_msg) => handle_client_message(session, client_msg).await,
                Err(e) => {
                    tracing::debug!(
                        connection_id = %session.connection_id,
                        error = %e,
                        "Invalid client message"
                    );
                    reply_error(session, format!("Invalid message format: {}", e)).await;
                }
            }
            true
        }
        Message::Binary(_) => {
            reply_error(session, "Binary messages not supported").await;
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %session.connection_id, "Client requested close");
            false
        }
    }
}

async fn reply(session: &Session, message: ServerMessage) {
    let _ = session
        .state
        .ws_hub
        .send_to(&session.connection_id, message)
        .await;
}

async fn reply_error(session: &Session, message: impl Into<String>) {
    reply(
        session,
        ServerMessage::Error {
            message: message.into(),
        },
    )
    .await;
}

/// Whether `user` may follow `topic`
fn may_subscribe(state: &AppState, user: &User, topic: &str) -> bool {
    match topic.parse::<Topic>() {
        Ok(Topic::Notifications(owner)) => owner == user.id,
        Ok(Topic::Chat(room_id)) => state
            .db
            .get_chat_room(room_id)
            .map(|room| room.is_participant(user.id))
            .unwrap_or(false),
        Err(()) => false,
    }
}

async fn handle_client_message(session: &Session, message: ClientMessage) {
    let hub = &session.state.ws_hub;
    match message {
        ClientMessage::Subscribe { topics } => {
            let (allowed, denied): (Vec<String>, Vec<String>) = topics
                .into_iter()
                .partition(|t| may_subscribe(&session.state, &session.user, t));

            if !denied.is_empty() {
                tracing::debug!(
                    connection_id = %session.connection_id,
                    denied = ?denied,
                    "Subscription refused"
                );
                reply_error(session, format!("Not allowed to subscribe to: {}", denied.join(", ")))
                    .await;
            }
            match hub.subscribe(&session.connection_id, allowed).await {
                Ok(subscribed) => {
                    reply(session, ServerMessage::Subscribed { topics: subscribed }).await
                }
                Err(e) => reply_error(session, e.to_string()).await,
            }
        }
        ClientMessage::Unsubscribe { topics } => {
            match hub.unsubscribe(&session.connection_id, topics).await {
                Ok(removed) => {
                    reply(session, ServerMessage::Unsubscribed { topics: removed }).await
                }
                Err(e) => reply_error(session, e.to_string()).await,
            }
        }
        ClientMessage::Ping => reply(session, ServerMessage::Pong).await,
        ClientMessage::ChatMessage { room_id, message } => {
            let Some(room_id) = room_id.or(session.room_id) else {
                reply_error(session, "room_id is required").await;
                return;
            };
            if let Err(e) = post_message(&session.state, room_id, &session.user, &message) {
                reply_error(session, e.to_string()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::domain::BloodGroup;
    use crate::storage::fixtures::{seed_donation, seed_user};

    #[tokio::test]
    async fn test_subscription_authorization() {
        let (state, _) = test_state();
        let donation = seed_donation(&state.db);
        let request = state.db.get_blood_request(donation.blood_request_id).unwrap();
        let (room, _) = state
            .db
            .get_or_create_chat_room(donation.id, donation.donor_id, request.patient_id)
            .unwrap();

        let donor = state.db.get_user(donation.donor_id).unwrap();
        let stranger = seed_user(&state.db, "stranger", BloodGroup::BPositive, None);

        let chat = Topic::Chat(room.id).to_string();
        assert!(may_subscribe(&state, &donor, &chat));
        assert!(!may_subscribe(&state, &stranger, &chat));

        assert!(may_subscribe(&state, &donor, &Topic::Notifications(donor.id).to_string()));
        assert!(!may_subscribe(&state, &stranger, &Topic::Notifications(donor.id).to_string()));
        assert!(!may_subscribe(&state, &donor, "alerts.*"));
    }

    #[tokio::test]
    async fn test_authenticate_requires_token() {
        let (state, _) = test_state();
        assert!(authenticate(&state, None).is_err());
        assert!(authenticate(&state, Some("")).is_err());
        assert!(authenticate(&state, Some("not.a.token")).is_err());
    }
}
