//! Multi-room TCP Chat Relay Library
//!
//! A line-oriented chat relay built on tokio using the Actor pattern for
//! state management.
//!
//! # Features
//! - Newline-delimited `TYPE:ARG1:ARG2:CONTENT` wire protocol
//! - Named rooms with a protected default room
//! - Room create/remove/join/leave, listings and nickname changes
//! - Room broadcast and private whispers
//! - Connection cap and graceful shutdown
//!
//! # Architecture
//! - `Coordinator` is the single actor owning the registry of clients and rooms
//! - Each connection has a `worker` task that owns its socket exclusively
//! - Workers and the coordinator talk only through per-connection channels;
//!   readiness is either addressed envelopes or a coalescing wake plus sweep
//! - The `Supervisor` reports every worker exit so the registry never keeps
//!   stale entries
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use chat_relay::{ChatRelay, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chat_relay::AppError> {
//!     let config = ServerConfig { port: 9000, ..ServerConfig::default() };
//!     let relay = ChatRelay::bind(config).await?;
//!     relay.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod readiness;
pub mod registry;
pub mod room;
pub mod server;
pub mod supervisor;
pub mod types;
pub mod worker;

// Re-export main types for convenience
pub use client::Client;
pub use config::{ReadinessMode, ServerConfig};
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::{AppError, ChatError, SendError};
pub use registry::Registry;
pub use room::Room;
pub use server::ChatRelay;
pub use types::{ClientId, RoomName};
