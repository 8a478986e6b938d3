//! WebSocket Connection Hub
//!
//! Tracks live connections, which user each belongs to and which topics it
//! follows, and fans published events out to subscribers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::{ServerMessage, Topic, WsEvent};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

type Connections = Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>;
type Subscriptions = Arc<RwLock<HashMap<String, HashSet<ConnectionId>>>>;

/// Manages all WebSocket connections and subscriptions
pub struct ConnectionHub {
    connections: Connections,
    /// Topic → subscribed connections
    subscriptions: Subscriptions,
    config: HubConfig,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

/// Handle for sending messages to a specific connection
pub struct ConnectionHandle {
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    /// Authenticated account behind the socket
    pub user_id: Uuid,
    pub subscriptions: HashSet<String>,
}

impl ConnectionHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Register a new connection for `user_id`
    ///
    /// Fails once the connection limit has been reached.
    pub async fn register(
        &self,
        user_id: Uuid,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        connections.insert(
            id.clone(),
            ConnectionHandle {
                sender,
                user_id,
                subscriptions: HashSet::new(),
            },
        );

        tracing::info!(connection_id = %id, user_id = %user_id, "WebSocket connected");
        Ok(id)
    }

    /// Unregister a connection and clean up its subscriptions
    pub async fn unregister(&self, id: &str) {
        let handle = self.connections.write().await.remove(id);

        if let Some(handle) = handle {
            let mut subs = self.subscriptions.write().await;
            drop_subscriptions(&mut subs, id, handle.subscriptions);
        }

        tracing::info!(connection_id = %id, "WebSocket disconnected");
    }

    /// Drop every connection belonging to `user_id`
    ///
    /// Each socket's outbound channel closes, which ends its session.
    /// Returns how many connections were dropped.
    pub async fn disconnect_user(&self, user_id: Uuid) -> usize {
        let removed: Vec<(ConnectionId, ConnectionHandle)> = {
            let mut connections = self.connections.write().await;
            let ids: Vec<ConnectionId> = connections
                .iter()
                .filter(|(_, handle)| handle.user_id == user_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| connections.remove(&id).map(|handle| (id, handle)))
                .collect()
        };

        if !removed.is_empty() {
            let mut subs = self.subscriptions.write().await;
            for (id, handle) in &removed {
                drop_subscriptions(&mut subs, id, handle.subscriptions.iter().cloned());
            }
            tracing::info!(user_id = %user_id, connections = removed.len(), "User disconnected");
        }
        removed.len()
    }

    /// Subscribe a connection to topics
    ///
    /// Malformed topic names and other users' notification topics are
    /// skipped. Callers authorize chat topics before subscribing.
    pub async fn subscribe(&self, id: &str, topics: Vec<String>) -> Result<Vec<String>, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections.get_mut(id).ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.subscriptions.write().await;
        let mut subscribed = Vec::new();

        for topic in topics {
            match topic.parse::<Topic>() {
                Err(()) => {
                    tracing::warn!(topic = %topic, "Invalid topic ignored");
                    continue;
                }
                Ok(Topic::Notifications(owner)) if owner != handle.user_id => {
                    tracing::warn!(topic = %topic, "Foreign notification topic ignored");
                    continue;
                }
                Ok(_) => {}
            }

            handle.subscriptions.insert(topic.clone());
            subs.entry(topic.clone()).or_default().insert(id.to_string());
            subscribed.push(topic);
        }

        tracing::debug!(connection_id = %id, topics = ?subscribed, "Subscribed to topics");
        Ok(subscribed)
    }

    pub async fn unsubscribe(
        &self,
        id: &str,
        topics: Vec<String>,
    ) -> Result<Vec<String>, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections.get_mut(id).ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.subscriptions.write().await;
        let mut unsubscribed = Vec::new();

        for topic in topics {
            if handle.subscriptions.remove(&topic) {
                if let Some(subscribers) = subs.get_mut(&topic) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        subs.remove(&topic);
                    }
                }
                unsubscribed.push(topic);
            }
        }

        tracing::debug!(connection_id = %id, topics = ?unsubscribed, "Unsubscribed from topics");
        Ok(unsubscribed)
    }

    /// Deliver an event to every subscriber of its topic
    ///
    /// Returns how many connections accepted it.
    pub async fn broadcast(&self, event: &WsEvent) -> usize {
        deliver(&self.connections, &self.subscriptions, event).await
    }

    /// Fire-and-forget variant of [`broadcast`](Self::broadcast)
    pub fn publish(&self, event: WsEvent) {
        let connections = Arc::clone(&self.connections);
        let subscriptions = Arc::clone(&self.subscriptions);
        tokio::spawn(async move {
            deliver(&connections, &subscriptions, &event).await;
        });
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        handle.sender.send(message).map_err(|_| HubError::SendFailed)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn subscription_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

fn drop_subscriptions(
    subs: &mut HashMap<String, HashSet<ConnectionId>>,
    id: &str,
    topics: impl IntoIterator<Item = String>,
) {
    for topic in topics {
        if let Some(subscribers) = subs.get_mut(&topic) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                subs.remove(&topic);
            }
        }
    }
}

async fn deliver(
    connections: &Connections,
    subscriptions: &Subscriptions,
    event: &WsEvent,
) -> usize {
    let subs = subscriptions.read().await;
    let Some(subscriber_ids) = subs.get(&event.topic) else {
        return 0;
    };
    let connections = connections.read().await;

    let mut sent_count = 0;
    for id in subscriber_ids {
        if let Some(handle) = connections.get(id) {
            if handle.sender.send(event.message.clone()).is_ok() {
                sent_count += 1;
            }
        }
    }

    if sent_count > 0 {
        tracing::trace!(topic = %event.topic, subscribers = sent_count, "Broadcast event");
    }
    sent_count
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,
}
