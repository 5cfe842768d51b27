//! Multi-room TCP Chat Relay - Entry Point
//!
//! Loads configuration, binds the listener and serves until Ctrl-C.

use std::env;
use std::process;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{ChatRelay, ServerConfig};

const USAGE: &str = "usage: chat_relay <port>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let Some(port) = parse_port(env::args().skip(1)) else {
        eprintln!("{}", USAGE);
        process::exit(2);
    };

    let mut config = ServerConfig::load()?;
    config.port = port;

    let relay = ChatRelay::bind(config).await?;
    relay
        .run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C"),
                Err(e) => {
                    error!("Unable to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    Ok(())
}

/// Exactly one argument, a valid port number
fn parse_port(mut args: impl Iterator<Item = String>) -> Option<u16> {
    let port = args.next()?.parse().ok()?;
    match args.next() {
        Some(_) => None,
        None => Some(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(args(&["9000"])), Some(9000));
        assert_eq!(parse_port(args(&[])), None);
        assert_eq!(parse_port(args(&["chat"])), None);
        assert_eq!(parse_port(args(&["70000"])), None);
        assert_eq!(parse_port(args(&["9000", "extra"])), None);
    }
}
