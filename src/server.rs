//! Connection acceptor
//!
//! Owns the listening socket. Each accepted connection gets a slot from the
//! connection semaphore, a channel pair, a registry entry and a worker
//! spawned through the supervisor. The acceptor keeps no reference to the
//! connection afterwards.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::channel;
use crate::config::ServerConfig;
use crate::coordinator::{Coordinator, CoordinatorHandle};
use crate::error::{AppError, ChatError};
use crate::protocol::notice;
use crate::supervisor::Supervisor;
use crate::types::ClientId;
use crate::worker::run_worker;

/// Pause after a failed `accept` so a persistent error cannot spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound chat relay, ready to serve
pub struct ChatRelay {
    listener: TcpListener,
    config: ServerConfig,
}

impl ChatRelay {
    /// Validate the configuration and bind the listening socket
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr()?).await?;
        info!("Chat relay listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` completes
    ///
    /// On shutdown the acceptor stops, the coordinator closes every client
    /// and waits for their workers, and only then is the listener dropped.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        let (coordinator, handle) = Coordinator::new(self.config.clone())?;
        let coordinator_task = tokio::spawn(coordinator.run());
        let supervisor = Supervisor::new(handle.clone());
        let slots = Arc::new(Semaphore::new(self.config.max_clients));

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.admit(stream, peer, &slots, &handle, &supervisor).await?;
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }

        handle.shutdown().await?;
        drop(supervisor);
        drop(handle);
        coordinator_task.await?;

        info!("Chat relay stopped");
        Ok(())
    }

    /// Hand an accepted connection to a new worker
    async fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        slots: &Arc<Semaphore>,
        handle: &CoordinatorHandle,
        supervisor: &Supervisor,
    ) -> Result<(), AppError> {
        let Ok(permit) = slots.clone().try_acquire_owned() else {
            warn!("Refusing {}: {} clients connected", peer, self.config.max_clients);
            tokio::spawn(reject(stream, self.config.max_clients));
            return Ok(());
        };

        let client_id = ClientId::new();
        debug!("New connection from {} as {}", peer, client_id);

        let (worker_ends, coordinator_ends) =
            channel::pair(client_id, handle.connector(), self.config.client_queue);
        handle.register(client_id, Some(peer), coordinator_ends).await?;
        supervisor.spawn(
            client_id,
            Some(permit),
            run_worker(stream, worker_ends, self.config.max_line_length),
        );
        Ok(())
    }
}

/// Tell a connection the server is full, then close it
async fn reject(mut stream: TcpStream, max_clients: usize) {
    let line = format!("{}\n", notice::error(&ChatError::ServerFull(max_clients)));
    if let Err(e) = stream.write_all(line.as_bytes()).await {
        debug!("Could not send ServerFull notice: {}", e);
    }
    let _ = stream.shutdown().await;
}
