//! Server configuration
//!
//! Defaults cover every field; a JSON file named by `CHAT_RELAY_CONFIG`
//! may override any subset of them. The listening port always comes from
//! the command line.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::types::RoomName;

/// Environment variable naming an optional JSON configuration file
pub const CONFIG_ENV: &str = "CHAT_RELAY_CONFIG";

/// How workers tell the coordinator that input is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessMode {
    /// Every worker sends `(ClientId, event)` envelopes into one shared queue
    #[default]
    Addressed,
    /// Workers raise a content-free wake; the coordinator sweeps all uplinks
    Sweep,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub bind_host: String,
    /// TCP port (0 picks an ephemeral port)
    pub port: u16,
    /// Maximum simultaneously connected clients
    pub max_clients: usize,
    /// Maximum number of rooms, default room included
    pub max_rooms: usize,
    /// Room every client joins on connect; never deleted
    pub default_room: String,
    /// Deliver a client's own chat lines back to it
    pub echo_chat_to_sender: bool,
    /// `join` creates missing rooms instead of failing with `RoomNotFound`
    pub auto_create_rooms: bool,
    /// Readiness strategy between workers and the coordinator
    pub readiness: ReadinessMode,
    /// Longest accepted input line, in bytes
    pub max_line_length: usize,
    /// Capacity of the coordinator's control and envelope queues
    pub channel_capacity: usize,
    /// Per-client outbound queue length
    pub client_queue: usize,
    /// Bounded wait for workers to exit on shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            max_clients: 64,
            max_rooms: 64,
            default_room: "general".to_string(),
            echo_chat_to_sender: false,
            auto_create_rooms: true,
            readiness: ReadinessMode::Addressed,
            max_line_length: 1024,
            channel_capacity: 256,
            client_queue: 32,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    /// Load from the file named by `CHAT_RELAY_CONFIG`, or use defaults
    pub fn load() -> Result<Self, AppError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Parse a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse JSON text; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_clients == 0 {
            return Err(AppError::Config("max_clients must be positive".into()));
        }
        if self.max_rooms == 0 {
            return Err(AppError::Config("max_rooms must be positive".into()));
        }
        if self.client_queue == 0 || self.channel_capacity == 0 {
            return Err(AppError::Config("queue capacities must be positive".into()));
        }
        if self.max_line_length == 0 {
            return Err(AppError::Config("max_line_length must be positive".into()));
        }
        self.default_room()?;
        Ok(())
    }

    /// The default room as a validated name
    pub fn default_room(&self) -> Result<RoomName, AppError> {
        RoomName::parse(&self.default_room)
            .map_err(|e| AppError::Config(format!("default_room: {}", e)))
    }

    /// Address to bind the listener to
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.bind_host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("bind address: {}", e)))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
