//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based unique client identifier
//! - `RoomName`: validated room name used as a registry key

use crate::error::ChatError;
use uuid::Uuid;

/// Longest accepted nickname or room name, in bytes
pub const MAX_NAME_LEN: usize = 31;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe client identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name
///
/// Case-sensitive, 1..=31 bytes, no colons or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomName(String);

impl RoomName {
    /// Validate and wrap a room name
    pub fn parse(name: &str) -> Result<Self, ChatError> {
        validate_name("room name", name)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for RoomName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Check a nickname or room name against the wire protocol's constraints
///
/// `what` names the field in the error detail.
pub fn validate_name(what: &str, name: &str) -> Result<(), ChatError> {
    if name.is_empty() {
        return Err(ChatError::InvalidFormat(format!("{} must not be empty", what)));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ChatError::InvalidFormat(format!(
            "{} is longer than {} bytes",
            what, MAX_NAME_LEN
        )));
    }
    if name.chars().any(|c| c == ':' || c.is_whitespace() || c.is_control()) {
        return Err(ChatError::InvalidFormat(format!(
            "{} '{}' contains a colon or whitespace",
            what, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        let id1 = ClientId::new();
        let id2 = ClientId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_room_name_valid() {
        let name = RoomName::parse("dev").unwrap();
        assert_eq!(name.as_str(), "dev");
        assert!(name == *"dev");
    }

    #[test]
    fn test_room_name_rejects_bad_input() {
        assert!(matches!(RoomName::parse(""), Err(ChatError::InvalidFormat(_))));
        assert!(matches!(RoomName::parse("a:b"), Err(ChatError::InvalidFormat(_))));
        assert!(matches!(RoomName::parse("two words"), Err(ChatError::InvalidFormat(_))));
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(RoomName::parse(&long), Err(ChatError::InvalidFormat(_))));
    }

    #[test]
    fn test_name_at_length_limit() {
        let name = "x".repeat(MAX_NAME_LEN);
        assert!(validate_name("nickname", &name).is_ok());
    }
}
