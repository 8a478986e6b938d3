//! WebSocket Message Types
//!
//! Frames exchanged between the web clients and the server, plus the topic
//! names events are published under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Message, Notification};

/// A stream a connection can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Messages posted in one chat room
    Chat(Uuid),
    /// Notifications addressed to one user
    Notifications(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Chat(id) => write!(f, "chat.{id}"),
            Topic::Notifications(id) => write!(f, "notifications.{id}"),
        }
    }
}

impl FromStr for Topic {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, id) = s.split_once('.').ok_or(())?;
        let id = Uuid::parse_str(id).map_err(|_| ())?;
        match prefix {
            "chat" => Ok(Topic::Chat(id)),
            "notifications" => Ok(Topic::Notifications(id)),
            _ => Err(()),
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to topics for real-time updates
    Subscribe { topics: Vec<String> },
    Unsubscribe { topics: Vec<String> },
    /// Ping for keepalive
    Ping,
    /// Post to a chat room; `room_id` may be omitted on a room socket
    ChatMessage {
        #[serde(default)]
        room_id: Option<Uuid>,
        message: String,
    },
}

/// Untagged chat frame accepted on `/ws/chat/:room_id`
#[derive(Debug, Deserialize)]
pub struct PlainChatFrame {
    pub message: String,
}

impl ClientMessage {
    /// Parse a text frame, accepting the untagged `{"message": ...}` form
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<ClientMessage>(text).or_else(|err| {
            serde_json::from_str::<PlainChatFrame>(text)
                .map(|frame| ClientMessage::ChatMessage {
                    room_id: None,
                    message: frame.message,
                })
                .map_err(|_| err)
        })
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A message was posted in a chat room
    ChatMessage {
        room_id: Uuid,
        message_id: Uuid,
        message: String,
        sender_id: Uuid,
        sender_name: String,
        timestamp: DateTime<Utc>,
    },
    /// A notification was created for the connected user
    Notification { notification: Notification },
    Subscribed { topics: Vec<String> },
    Unsubscribed { topics: Vec<String> },
    /// Pong response to ping
    Pong,
    Error { message: String },
    /// Connection established
    Connected {
        connection_id: String,
        user_id: Uuid,
    },
}

/// Internal event for broadcasting through the hub
#[derive(Debug, Clone)]
pub struct WsEvent {
    pub topic: String,
    pub message: ServerMessage,
}

impl WsEvent {
    pub fn chat_message(message: &Message, sender_name: &str) -> Self {
        Self {
            topic: Topic::Chat(message.chat_room_id).to_string(),
            message: ServerMessage::ChatMessage {
                room_id: message.chat_room_id,
                message_id: message.id,
                message: message.content.clone(),
                sender_id: message.sender_id,
                sender_name: sender_name.to_string(),
                timestamp: message.timestamp,
            },
        }
    }

    pub fn notification(notification: &Notification) -> Self {
        Self {
            topic: Topic::Notifications(notification.user_id).to_string(),
            message: ServerMessage::Notification {
                notification: notification.clone(),
            },
        }
    }
}
