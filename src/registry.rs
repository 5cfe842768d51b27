//! Client and room registry
//!
//! Pure, synchronous state owned by the coordinator task. Every method
//! keeps these invariants:
//!
//! - each client is a member of exactly the room its `room` field names
//! - nicknames are unique (the nickname index maps each to one client)
//! - the default room always exists
//! - a non-default room disappears when its last member leaves

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::{debug, error};

use crate::channel::Downlink;
use crate::client::{Client, ClientState};
use crate::error::ChatError;
use crate::room::Room;
use crate::types::{ClientId, RoomName};

/// Result of moving a client between rooms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Move {
    /// Target was the current room
    Unchanged,
    /// Client changed rooms
    Moved {
        from: RoomName,
        to: RoomName,
        /// The target room did not exist before
        created: bool,
        /// The old room was deleted because it became empty
        vacated: bool,
    },
}

/// A client removed from the registry
#[derive(Debug)]
pub struct Departure {
    pub client: Client,
    /// Its room was deleted because it became empty
    pub vacated: bool,
}

/// Registry of clients and rooms
#[derive(Debug)]
pub struct Registry {
    /// All registered clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// All rooms: RoomName -> Room
    rooms: HashMap<RoomName, Room>,
    /// Nickname -> ClientId
    nicknames: HashMap<String, ClientId>,
    default_room: RoomName,
    max_rooms: usize,
}

impl Registry {
    /// Create a registry holding only the default room
    pub fn new(default_room: RoomName, max_rooms: usize) -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(default_room.clone(), Room::new_default(default_room.clone()));
        Self {
            clients: HashMap::new(),
            rooms,
            nicknames: HashMap::new(),
            default_room,
            max_rooms,
        }
    }

    pub fn default_room(&self) -> &RoomName {
        &self.default_room
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn client(&self, client_id: ClientId) -> Result<&Client, ChatError> {
        self.clients
            .get(&client_id)
            .ok_or(ChatError::ClientNotFound(client_id))
    }

    pub fn client_mut(&mut self, client_id: ClientId) -> Result<&mut Client, ChatError> {
        self.clients
            .get_mut(&client_id)
            .ok_or(ChatError::ClientNotFound(client_id))
    }

    pub fn clients_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.values_mut()
    }

    pub fn contains_room(&self, name: &RoomName) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn is_nickname_taken(&self, nickname: &str) -> bool {
        self.nicknames.contains_key(nickname)
    }

    pub fn find_by_nickname(&self, nickname: &str) -> Option<&Client> {
        self.nicknames
            .get(nickname)
            .and_then(|id| self.clients.get(id))
    }

    /// Members of a room
    pub fn members<'a>(&'a self, room: &RoomName) -> impl Iterator<Item = &'a Client> + 'a {
        self.rooms
            .get(room)
            .into_iter()
            .flat_map(|r| r.members())
            .filter_map(move |id| self.clients.get(&id))
    }

    /// Add a client to the default room
    ///
    /// `nickname` must not be taken; the caller picks a free one.
    pub fn register(
        &mut self,
        client_id: ClientId,
        nickname: String,
        downlink: Downlink,
        peer: Option<SocketAddr>,
    ) -> Result<&Client, ChatError> {
        if self.nicknames.contains_key(&nickname) {
            return Err(ChatError::DuplicateNickname(nickname));
        }
        let mut client = Client::new(
            client_id,
            nickname.clone(),
            self.default_room.clone(),
            downlink,
            peer,
        );
        if let Some(room) = self.rooms.get_mut(&self.default_room) {
            room.add_member(client_id);
        }
        client.state = ClientState::Active;
        self.nicknames.insert(nickname, client_id);
        self.clients.insert(client_id, client);
        self.client(client_id)
    }

    /// Create an empty room
    pub fn add_room(&mut self, name: RoomName) -> Result<(), ChatError> {
        if self.rooms.contains_key(&name) {
            return Err(ChatError::AlreadyExists(name.to_string()));
        }
        if self.rooms.len() >= self.max_rooms {
            return Err(ChatError::TooManyRooms(self.max_rooms));
        }
        debug!("Room {} created", name);
        self.rooms.insert(name.clone(), Room::new(name));
        Ok(())
    }

    /// Delete a room
    ///
    /// The default room is refused regardless of its member count.
    pub fn remove_room(&mut self, name: &RoomName) -> Result<(), ChatError> {
        if *name == self.default_room {
            return Err(ChatError::ProtectedRoom(name.to_string()));
        }
        let Some(room) = self.rooms.get(name) else {
            return Err(ChatError::RoomNotFound(name.to_string()));
        };
        if !room.is_empty() {
            return Err(ChatError::NotEmpty(name.to_string()));
        }
        self.rooms.remove(name);
        debug!("Room {} removed", name);
        Ok(())
    }

    /// Move a client to `target`
    ///
    /// A missing target is created when `create` is set, otherwise the move
    /// fails with `RoomNotFound`. Nothing changes on failure.
    pub fn move_client(
        &mut self,
        client_id: ClientId,
        target: &RoomName,
        create: bool,
    ) -> Result<Move, ChatError> {
        let from = self.client(client_id)?.room.clone();
        if from == *target {
            return Ok(Move::Unchanged);
        }

        let created = !self.rooms.contains_key(target);
        if created {
            if !create {
                return Err(ChatError::RoomNotFound(target.to_string()));
            }
            // A room the client is about to vacate frees its slot for the target
            let frees_slot = from != self.default_room
                && self.rooms.get(&from).is_some_and(|r| r.member_count() == 1);
            if self.rooms.len() >= self.max_rooms && !frees_slot {
                return Err(ChatError::TooManyRooms(self.max_rooms));
            }
        }

        let vacated = self.detach_from_room(client_id, &from);
        if created {
            debug!("Room {} created", target);
            self.rooms.insert(target.clone(), Room::new(target.clone()));
        }
        if let Some(room) = self.rooms.get_mut(target) {
            room.add_member(client_id);
        }
        self.client_mut(client_id)?.room = target.clone();

        Ok(Move::Moved {
            from,
            to: target.clone(),
            created,
            vacated,
        })
    }

    /// Change a client's nickname, returning the old one
    pub fn rename(&mut self, client_id: ClientId, nickname: &str) -> Result<String, ChatError> {
        match self.nicknames.get(nickname) {
            Some(&holder) if holder != client_id => {
                return Err(ChatError::DuplicateNickname(nickname.to_string()));
            }
            _ => {}
        }
        let client = self
            .clients
            .get_mut(&client_id)
            .ok_or(ChatError::ClientNotFound(client_id))?;
        let old = std::mem::replace(&mut client.nickname, nickname.to_string());
        self.nicknames.remove(&old);
        self.nicknames.insert(nickname.to_string(), client_id);
        Ok(old)
    }

    /// Remove a client entirely
    ///
    /// Returns `None` when the client was already removed, which makes
    /// reclamation idempotent.
    pub fn remove_client(&mut self, client_id: ClientId) -> Option<Departure> {
        let mut client = self.clients.remove(&client_id)?;
        self.nicknames.remove(&client.nickname);
        let vacated = self.detach_from_room(client_id, &client.room);
        client.close_downlink();
        Some(Departure { client, vacated })
    }

    /// All rooms with member counts, sorted by name
    pub fn room_summaries(&self) -> Vec<(RoomName, usize)> {
        let mut rooms: Vec<_> = self
            .rooms
            .values()
            .map(|r| (r.name.clone(), r.member_count()))
            .collect();
        rooms.sort();
        rooms
    }

    /// Nicknames of a room's members, sorted
    pub fn nicknames_in(&self, room: &RoomName) -> Vec<String> {
        let mut names: Vec<String> = self.members(room).map(|c| c.nickname.clone()).collect();
        names.sort();
        names
    }

    /// Take a client out of its room, deleting the room if it empties
    ///
    /// Returns whether the room was deleted.
    fn detach_from_room(&mut self, client_id: ClientId, name: &RoomName) -> bool {
        let Some(room) = self.rooms.get_mut(name) else {
            error!("Client {} referenced missing room {}", client_id, name);
            debug_assert!(false, "client room missing from registry");
            return false;
        };
        if room.remove_member(client_id) {
            self.rooms.remove(name);
            debug!("Room {} deleted (empty)", name);
            true
        } else {
            false
        }
    }

    /// Verify all registry invariants, returning a description of the first
    /// violation found
    pub fn check_invariants(&self) -> Result<(), String> {
        if !self.rooms.contains_key(&self.default_room) {
            return Err("default room missing".into());
        }
        if self.nicknames.len() != self.clients.len() {
            return Err("nickname index out of step".into());
        }
        for client in self.clients.values() {
            if self.nicknames.get(&client.nickname) != Some(&client.id) {
                return Err(format!("nickname {} not indexed", client.nickname));
            }
            match self.rooms.get(&client.room) {
                Some(room) if room.contains(client.id) => {}
                _ => return Err(format!("client {} not in its room {}", client.id, client.room)),
            }
        }
        for room in self.rooms.values() {
            for member in room.members() {
                match self.clients.get(&member) {
                    Some(client) if client.room == room.name => {}
                    _ => return Err(format!("room {} has stale member {}", room.name, member)),
                }
            }
        }
        Ok(())
    }

    /// Drop a nickname from the index without touching its client
    #[cfg(test)]
    pub(crate) fn forget_nickname(&mut self, nickname: &str) {
        self.nicknames.remove(nickname);
    }
}
