//! Room struct definition
//!
//! Represents a named routing scope and the set of clients inside it.

use std::collections::HashSet;

use crate::types::{ClientId, RoomName};

/// Chat room
///
/// Holds the member set; membership is mirrored by `Client::room`, and the
/// registry keeps the two in step.
#[derive(Debug)]
pub struct Room {
    /// Room name (registry key)
    pub name: RoomName,
    /// Current members
    members: HashSet<ClientId>,
    /// The default room is never deleted
    is_default: bool,
}

impl Room {
    /// Create an empty room
    pub fn new(name: RoomName) -> Self {
        Self {
            name,
            members: HashSet::new(),
            is_default: false,
        }
    }

    /// Create the always-present default room
    pub fn new_default(name: RoomName) -> Self {
        Self {
            is_default: true,
            ..Self::new(name)
        }
    }

    /// Check if room has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a client is in this room
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.members.contains(&client_id)
    }

    /// Add a member; returns false if it was already present
    pub fn add_member(&mut self, client_id: ClientId) -> bool {
        self.members.insert(client_id)
    }

    /// Remove a client from the room (handle leaving)
    ///
    /// Returns true if the room should be deleted: it is now empty and is
    /// not the default room.
    pub fn remove_member(&mut self, client_id: ClientId) -> bool {
        self.members.remove(&client_id);
        self.members.is_empty() && !self.is_default
    }

    /// Get the number of members in the room
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> RoomName {
        RoomName::parse(s).unwrap()
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new(name("dev"));
        assert!(room.is_empty());
        assert_eq!(room.member_count(), 0);
    }

    #[test]
    fn test_room_add_member() {
        let mut room = Room::new(name("dev"));
        let id = ClientId::new();

        assert!(room.add_member(id));
        assert!(!room.add_member(id));
        assert!(room.contains(id));
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_last_member_leaving_deletes_room() {
        let mut room = Room::new(name("dev"));
        let a = ClientId::new();
        let b = ClientId::new();
        room.add_member(a);
        room.add_member(b);

        assert!(!room.remove_member(a));
        assert!(room.remove_member(b));
    }

    #[test]
    fn test_default_room_survives_empty() {
        let mut room = Room::new_default(name("general"));
        let a = ClientId::new();
        room.add_member(a);

        assert!(!room.remove_member(a));
        assert!(room.is_empty());
    }

    #[test]
    fn test_members_iter() {
        let mut room = Room::new(name("dev"));
        let a = ClientId::new();
        room.add_member(a);
        assert_eq!(room.members().collect::<Vec<_>>(), vec![a]);
    }
}
