//! Error types for the chat relay
//!
//! Defines the recoverable chat errors reported back to a single client,
//! the fatal errors that end a worker or the server, and channel send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::types::ClientId;

/// Chat-level errors
///
/// All of these are local and recoverable: the coordinator reports them
/// to the requesting client only and keeps serving everyone else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Line does not follow `TYPE:ARG1:ARG2:CONTENT`
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Command verb is not recognised
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Room already exists
    #[error("room '{0}' already exists")]
    AlreadyExists(String),

    /// Room still has members
    #[error("room '{0}' is not empty")]
    NotEmpty(String),

    /// The default room cannot be removed
    #[error("room '{0}' is the default room and cannot be removed")]
    ProtectedRoom(String),

    /// No room with that name
    #[error("room '{0}' not found")]
    RoomNotFound(String),

    /// No registry entry for that client
    #[error("client {0} not found")]
    ClientNotFound(ClientId),

    /// Nickname held by another client
    #[error("nickname '{0}' is already taken")]
    DuplicateNickname(String),

    /// Whisper target does not exist
    #[error("user '{0}' not found")]
    UserNotFound(String),

    /// Connection cap reached at accept time
    #[error("server is full ({0} clients connected), try again later")]
    ServerFull(usize),

    /// `leave` while already in the default room
    #[error("you are already in the default room '{0}'")]
    AlreadyDefault(String),

    /// Room cap reached
    #[error("room limit of {0} reached")]
    TooManyRooms(usize),
}

impl ChatError {
    /// Stable name of the error kind, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::InvalidFormat(_) => "InvalidFormat",
            ChatError::UnknownCommand(_) => "UnknownCommand",
            ChatError::AlreadyExists(_) => "AlreadyExists",
            ChatError::NotEmpty(_) => "NotEmpty",
            ChatError::ProtectedRoom(_) => "ProtectedRoom",
            ChatError::RoomNotFound(_) => "RoomNotFound",
            ChatError::ClientNotFound(_) => "ClientNotFound",
            ChatError::DuplicateNickname(_) => "DuplicateNickname",
            ChatError::UserNotFound(_) => "UserNotFound",
            ChatError::ServerFull(_) => "ServerFull",
            ChatError::AlreadyDefault(_) => "AlreadyDefault",
            ChatError::TooManyRooms(_) => "TooManyRooms",
        }
    }
}

/// Application-level errors
///
/// Fatal to whoever owns them: a worker ends its connection, `main` exits.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (over-long line or IO while decoding)
    #[error("line codec error: {0}")]
    Line(#[from] LinesCodecError),

    /// Configuration file could not be parsed
    #[error("JSON configuration error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration is present but unusable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Worker sub-task panicked or was cancelled
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,
}

/// Message send errors
///
/// Occurs when delivering to a worker's downlink fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The worker is not draining its queue fast enough
    #[error("Channel full")]
    ChannelFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(ChatError::ProtectedRoom("general".into()).kind(), "ProtectedRoom");
        assert_eq!(ChatError::UserNotFound("z".into()).kind(), "UserNotFound");
        assert_eq!(ChatError::TooManyRooms(4).kind(), "TooManyRooms");
    }

    #[test]
    fn test_display_carries_detail() {
        let err = ChatError::DuplicateNickname("alice".into());
        assert_eq!(err.to_string(), "nickname 'alice' is already taken");
    }
}
