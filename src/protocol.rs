//! Wire protocol definitions
//!
//! Client → server lines are `TYPE:ARG1:ARG2:CONTENT`, split on the first
//! three colons so the content may itself contain colons:
//!
//! - `CHAT:<nickname>:<room>:<text>`
//! - `CMD:<verb>:<argument>:`
//! - `WHISPER:<sender>:<target>:<text>`
//!
//! Server → client lines are plain text; the helpers in [`notice`] build
//! every one of them.

use crate::error::ChatError;
use crate::types::{validate_name, RoomName};

/// Message kind, the first field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Chat,
    Command,
    Whisper,
}

impl Kind {
    fn parse(tag: &str) -> Result<Self, ChatError> {
        if tag.eq_ignore_ascii_case("CHAT") {
            Ok(Kind::Chat)
        } else if tag.eq_ignore_ascii_case("CMD") {
            Ok(Kind::Command)
        } else if tag.eq_ignore_ascii_case("WHISPER") {
            Ok(Kind::Whisper)
        } else {
            Err(ChatError::InvalidFormat(format!("unknown message type '{}'", tag)))
        }
    }
}

/// A line split into its four fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: Kind,
    pub arg1: &'a str,
    pub arg2: &'a str,
    pub body: &'a str,
}

impl<'a> Frame<'a> {
    /// Split a line into fields
    ///
    /// At least `TYPE:ARG1:ARG2` must be present; a missing content field
    /// is read as empty. Fewer fields is `InvalidFormat`.
    pub fn parse(line: &'a str) -> Result<Self, ChatError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let mut fields = line.splitn(4, ':');
        let (Some(tag), Some(arg1), Some(arg2)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(ChatError::InvalidFormat(
                "expected TYPE:ARG1:ARG2:CONTENT".to_string(),
            ));
        };
        let body = fields.next().unwrap_or("");

        Ok(Self {
            kind: Kind::parse(tag.trim())?,
            arg1: arg1.trim(),
            arg2: arg2.trim(),
            body,
        })
    }
}

/// Server command, the verb of a `CMD` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create an empty room
    Add(RoomName),
    /// Delete an empty, non-default room
    Remove(RoomName),
    /// Move to a room, creating it if allowed
    Join(RoomName),
    /// Return to the default room
    Leave,
    /// All rooms with member counts
    List,
    /// Nicknames in the current room
    Users,
    /// Change nickname
    Nickname(String),
    /// Disconnect
    Quit,
    /// Verb summary
    Help,
}

impl Command {
    fn parse(verb: &str, arg: &str) -> Result<Self, ChatError> {
        if verb.is_empty() {
            return Err(ChatError::InvalidFormat("missing command verb".to_string()));
        }
        let required = |what: &'static str| required_arg(verb, arg, what);

        match verb.to_ascii_lowercase().as_str() {
            "add" => Ok(Command::Add(RoomName::parse(required("room name")?)?)),
            "rm" => Ok(Command::Remove(RoomName::parse(required("room name")?)?)),
            "join" => Ok(Command::Join(RoomName::parse(required("room name")?)?)),
            "leave" => Ok(Command::Leave),
            "list" => Ok(Command::List),
            "users" => Ok(Command::Users),
            "nickname" | "nick" => {
                let nickname = required("nickname")?;
                validate_name("nickname", nickname)?;
                Ok(Command::Nickname(nickname.to_string()))
            }
            "quit" => Ok(Command::Quit),
            "help" => Ok(Command::Help),
            _ => Err(ChatError::UnknownCommand(verb.to_string())),
        }
    }

    /// Whether the command can change registry state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Command::List | Command::Users | Command::Help)
    }
}

fn required_arg<'a>(verb: &str, arg: &'a str, what: &str) -> Result<&'a str, ChatError> {
    if arg.is_empty() {
        Err(ChatError::InvalidFormat(format!(
            "command '{}' requires a {}",
            verb, what
        )))
    } else {
        Ok(arg)
    }
}

/// A decoded client request
///
/// The nickname and room a client writes into `CHAT`/`WHISPER` lines are
/// informational only; the coordinator uses what the registry says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Chat { text: String },
    Command(Command),
    Whisper { target: String, body: String },
}

impl Request {
    /// Decode one line
    pub fn decode(line: &str) -> Result<Self, ChatError> {
        let frame = Frame::parse(line)?;
        match frame.kind {
            Kind::Chat => Ok(Request::Chat {
                text: frame.body.to_string(),
            }),
            Kind::Command => Ok(Request::Command(Command::parse(frame.arg1, frame.arg2)?)),
            Kind::Whisper => {
                if frame.arg2.is_empty() {
                    return Err(ChatError::InvalidFormat(
                        "whisper requires a target nickname".to_string(),
                    ));
                }
                Ok(Request::Whisper {
                    target: frame.arg2.to_string(),
                    body: frame.body.to_string(),
                })
            }
        }
    }
}

/// Server → client line builders
pub mod notice {
    use crate::error::ChatError;
    use crate::types::RoomName;

    pub fn error(err: &ChatError) -> String {
        format!("error: {}: {}", err.kind(), err)
    }

    pub fn welcome(nickname: &str, room: &RoomName) -> String {
        format!(
            "* welcome {}! you are in room '{}' (CMD:help:: lists commands)",
            nickname, room
        )
    }

    pub fn chat(room: &RoomName, nickname: &str, text: &str) -> String {
        format!("[{}] {}: {}", room, nickname, text)
    }

    pub fn connected(nickname: &str) -> String {
        format!("* {} connected", nickname)
    }

    pub fn disconnected(nickname: &str) -> String {
        format!("* {} disconnected", nickname)
    }

    pub fn joined(nickname: &str, room: &RoomName) -> String {
        format!("* {} joined room '{}'", nickname, room)
    }

    pub fn left(nickname: &str, room: &RoomName) -> String {
        format!("* {} left room '{}'", nickname, room)
    }

    pub fn moved(room: &RoomName) -> String {
        format!("* you are now in room '{}'", room)
    }

    pub fn already_in(room: &RoomName) -> String {
        format!("* you are already in room '{}'", room)
    }

    pub fn room_created(room: &RoomName) -> String {
        format!("* room '{}' created", room)
    }

    pub fn room_removed(room: &RoomName) -> String {
        format!("* room '{}' removed", room)
    }

    pub fn room_list(rooms: &[(RoomName, usize)]) -> String {
        let entries: Vec<String> = rooms
            .iter()
            .map(|(name, count)| format!("{} ({})", name, count))
            .collect();
        format!("* rooms ({}): {}", rooms.len(), entries.join(", "))
    }

    pub fn user_list(room: &RoomName, nicknames: &[String]) -> String {
        format!(
            "* users in '{}' ({}): {}",
            room,
            nicknames.len(),
            nicknames.join(", ")
        )
    }

    pub fn nickname_set(nickname: &str) -> String {
        format!("* your nickname is now '{}'", nickname)
    }

    pub fn renamed(old: &str, new: &str) -> String {
        format!("* {} is now known as {}", old, new)
    }

    pub fn whisper_from(sender: &str, body: &str) -> String {
        format!("[whisper from {}] {}", sender, body)
    }

    pub fn whisper_to(target: &str, body: &str) -> String {
        format!("[whisper to {}] {}", target, body)
    }

    pub fn goodbye() -> String {
        "* goodbye".to_string()
    }

    pub fn shutting_down() -> String {
        "* server is shutting down".to_string()
    }

    pub fn help() -> String {
        "* commands: CMD:add:<room>: CMD:rm:<room>: CMD:join:<room>: CMD:leave:: \
         CMD:list:: CMD:users:: CMD:nickname:<name>: CMD:quit:: \
         | chat: CHAT:<nick>:<room>:<text> | whisper: WHISPER:<nick>:<target>:<text>"
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_keeps_colons() {
        let frame = Frame::parse("CHAT:alice:dev:see http://x:80").unwrap();
        assert_eq!(frame.kind, Kind::Chat);
        assert_eq!(frame.arg1, "alice");
        assert_eq!(frame.arg2, "dev");
        assert_eq!(frame.body, "see http://x:80");
    }

    #[test]
    fn test_missing_content_is_empty() {
        let frame = Frame::parse("CMD:list:").unwrap();
        assert_eq!(frame.kind, Kind::Command);
        assert_eq!(frame.body, "");
    }

    #[test]
    fn test_two_fields_rejected() {
        assert!(matches!(Frame::parse("CMD:list"), Err(ChatError::InvalidFormat(_))));
        assert!(matches!(Frame::parse("hello"), Err(ChatError::InvalidFormat(_))));
        assert!(matches!(Frame::parse(""), Err(ChatError::InvalidFormat(_))));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(matches!(
            Request::decode("PING:a:b:c"),
            Err(ChatError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_carriage_return_stripped() {
        assert_eq!(
            Request::decode("CMD:join:dev:\r").unwrap(),
            Request::Command(Command::Join(RoomName::parse("dev").unwrap()))
        );
    }

    #[test]
    fn test_decode_commands() {
        assert_eq!(Request::decode("CMD:leave::").unwrap(), Request::Command(Command::Leave));
        assert_eq!(Request::decode("cmd:LIST::").unwrap(), Request::Command(Command::List));
        assert_eq!(
            Request::decode("CMD:nickname:bob:").unwrap(),
            Request::Command(Command::Nickname("bob".into()))
        );
        assert_eq!(
            Request::decode("CMD:rm:dev:").unwrap(),
            Request::Command(Command::Remove(RoomName::parse("dev").unwrap()))
        );
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(
            Request::decode("CMD:dance::"),
            Err(ChatError::UnknownCommand("dance".into()))
        );
    }

    #[test]
    fn test_missing_argument() {
        assert!(matches!(
            Request::decode("CMD:join::"),
            Err(ChatError::InvalidFormat(_))
        ));
        assert!(matches!(
            Request::decode("CMD:nickname::"),
            Err(ChatError::InvalidFormat(_))
        ));
        assert!(matches!(Request::decode("CMD:::"), Err(ChatError::InvalidFormat(_))));
    }

    #[test]
    fn test_decode_whisper() {
        assert_eq!(
            Request::decode("WHISPER:alice:bob:psst: hi").unwrap(),
            Request::Whisper {
                target: "bob".into(),
                body: "psst: hi".into()
            }
        );
        assert!(matches!(
            Request::decode("WHISPER:alice::hi"),
            Err(ChatError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_mutating_commands() {
        assert!(Command::Leave.is_mutating());
        assert!(!Command::List.is_mutating());
        assert!(!Command::Users.is_mutating());
    }

    #[test]
    fn test_error_notice() {
        let line = notice::error(&ChatError::ProtectedRoom("general".into()));
        assert!(line.starts_with("error: ProtectedRoom:"));
    }

    #[test]
    fn test_room_list_notice() {
        let rooms = vec![
            (RoomName::parse("dev").unwrap(), 2),
            (RoomName::parse("general").unwrap(), 0),
        ];
        assert_eq!(notice::room_list(&rooms), "* rooms (2): dev (2), general (0)");
    }
}
