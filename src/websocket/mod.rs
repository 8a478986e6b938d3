//! WebSocket real-time delivery
//!
//! Pushes chat messages and notifications to connected web clients so they
//! do not have to poll.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: live connections and their topic subscriptions
//! - **Handler**: authenticated upgrade and per-connection message loop
//! - **Messages**: client and server frame formats
//! - **NotificationService**: stores a notification, then pushes it
//!
//! ## Topics
//!
//! - `chat.{room_id}` - messages posted in a chat room (participants only)
//! - `notifications.{user_id}` - notifications for one user (owner only)
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket(`ws://localhost:8000/ws?token=${access}`);
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', topics: [`notifications.${userId}`]}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'notification') showToast(msg.notification.title);
//! };
//! ```

mod handler;
mod hub;
mod messages;
mod notify;

pub use handler::{chat_socket_handler, websocket_handler};
pub use hub::{ConnectionHub, ConnectionId, HubConfig, HubError};
pub use messages::{ClientMessage, ServerMessage, Topic, WsEvent};
pub use notify::NotificationService;
