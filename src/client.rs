//! Client struct definition
//!
//! Represents a connected client with its state and downlink channel.

use std::net::SocketAddr;

use tokio::sync::mpsc::error::TrySendError;

use crate::channel::Downlink;
use crate::error::SendError;
use crate::types::{ClientId, RoomName};

/// Lifecycle of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Registered, not yet placed in a room
    Connecting,
    /// In a room and accepting requests
    Active,
    /// Downlink closed; waiting to be reclaimed
    Disconnected,
}

/// Connected client information
///
/// Holds all state the coordinator tracks for one connection: identity,
/// nickname, current room and the sender half of its downlink.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Nickname, unique among registered clients
    pub nickname: String,
    /// Current room
    pub room: RoomName,
    /// Remote address, for logging
    pub peer: Option<SocketAddr>,
    /// Coordinator → worker line channel (None once closed)
    downlink: Option<Downlink>,
    /// Lifecycle state
    pub state: ClientState,
}

impl Client {
    /// Create a new client in the `Connecting` state
    pub fn new(
        id: ClientId,
        nickname: String,
        room: RoomName,
        downlink: Downlink,
        peer: Option<SocketAddr>,
    ) -> Self {
        Self {
            id,
            nickname,
            room,
            peer,
            downlink: Some(downlink),
            state: ClientState::Connecting,
        }
    }

    /// Queue a line for this client without waiting
    ///
    /// The coordinator never blocks on a single worker, so a full queue
    /// drops the line instead of waiting for the worker to catch up.
    pub fn send(&self, line: impl Into<String>) -> Result<(), SendError> {
        let Some(downlink) = &self.downlink else {
            return Err(SendError::ChannelClosed);
        };
        downlink.try_send(line.into()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Drop the coordinator's downlink sender
    ///
    /// The worker's writer drains what is already queued, then sees the
    /// channel end and closes the socket.
    pub fn close_downlink(&mut self) {
        self.downlink = None;
        self.state = ClientState::Disconnected;
    }

    pub fn is_active(&self) -> bool {
        self.state == ClientState::Active
    }
}

/// Create a client with a fresh downlink, returning the worker's receiver
#[cfg(test)]
pub(crate) fn test_client(
    nickname: &str,
    room: &str,
) -> (Client, tokio::sync::mpsc::Receiver<String>) {
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let client = Client::new(
        ClientId::new(),
        nickname.to_string(),
        RoomName::parse(room).unwrap(),
        tx,
        None,
    );
    (client, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_client_creation() {
        let (client, _rx) = test_client("guest1", "general");

        assert_eq!(client.nickname, "guest1");
        assert_eq!(client.state, ClientState::Connecting);
        assert!(!client.is_active());
    }

    #[tokio::test]
    async fn test_client_send() {
        let (client, mut rx) = test_client("guest1", "general");

        client.send("hello").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_send_full_queue_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let client = Client::new(
            ClientId::new(),
            "a".into(),
            RoomName::parse("general").unwrap(),
            tx,
            None,
        );

        client.send("one").unwrap();
        assert_eq!(client.send("two"), Err(SendError::ChannelFull));
    }

    #[tokio::test]
    async fn test_close_downlink_ends_worker_stream() {
        let (mut client, mut rx) = test_client("guest1", "general");
        client.send("last").unwrap();
        client.close_downlink();

        assert_eq!(client.state, ClientState::Disconnected);
        assert_eq!(client.send("late"), Err(SendError::ChannelClosed));
        assert_eq!(rx.recv().await.as_deref(), Some("last"));
        assert!(rx.recv().await.is_none());
    }
}
