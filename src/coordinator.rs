//! Coordinator actor implementation
//!
//! The single owner of the registry. Workers reach it only through their
//! uplinks (via the readiness source) and the acceptor and supervisor only
//! through the control queue. Every registry mutation happens here, one
//! event at a time, so no locks are needed.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::channel::{Connector, CoordinatorEnds, Envelope, Event};
use crate::config::ServerConfig;
use crate::error::{AppError, ChatError, SendError};
use crate::protocol::{notice, Command, Request};
use crate::readiness::ReadinessSource;
use crate::registry::{Move, Registry};
use crate::supervisor::WorkerExit;
use crate::types::{ClientId, RoomName};

/// Commands sent to the coordinator by the acceptor and supervisor
#[derive(Debug)]
pub enum Control {
    /// A connection was accepted; its worker starts once `ack` fires
    Register {
        client_id: ClientId,
        peer: Option<SocketAddr>,
        ends: CoordinatorEnds,
        ack: oneshot::Sender<()>,
    },
    /// A worker task finished
    Exited { client_id: ClientId, exit: WorkerExit },
    /// Close every client and stop
    Shutdown,
}

/// Cloneable handle to a running coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    control: mpsc::Sender<Control>,
    connector: Connector,
}

impl CoordinatorHandle {
    /// Recipe for building uplinks that feed this coordinator
    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Register a client and wait until the coordinator has applied it
    ///
    /// The worker must not be started before this returns, so its first
    /// line can never overtake the registration.
    pub async fn register(
        &self,
        client_id: ClientId,
        peer: Option<SocketAddr>,
        ends: CoordinatorEnds,
    ) -> Result<(), AppError> {
        let (ack, acked) = oneshot::channel();
        self.send(Control::Register {
            client_id,
            peer,
            ends,
            ack,
        })
        .await?;
        acked.await.map_err(|_| AppError::ChannelSend)
    }

    pub async fn report_exit(&self, client_id: ClientId, exit: WorkerExit) -> Result<(), AppError> {
        self.send(Control::Exited { client_id, exit }).await
    }

    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.send(Control::Shutdown).await
    }

    async fn send(&self, control: Control) -> Result<(), AppError> {
        self.control
            .send(control)
            .await
            .map_err(|_| AppError::ChannelSend)
    }
}

/// Handle wired to a bare control queue instead of a running coordinator
#[cfg(test)]
pub(crate) fn test_handle() -> (CoordinatorHandle, mpsc::Receiver<Control>) {
    let (control, rx) = mpsc::channel(16);
    let (envelopes, _) = mpsc::channel(1);
    let handle = CoordinatorHandle {
        control,
        connector: Connector::Addressed(envelopes),
    };
    (handle, rx)
}

/// The coordinator actor
///
/// Processes control messages and worker events until shut down.
pub struct Coordinator {
    config: ServerConfig,
    registry: Registry,
    source: ReadinessSource,
    control: mpsc::Receiver<Control>,
    /// Last number handed out as a `guest<N>` nickname
    guest_counter: u64,
}

impl Coordinator {
    /// Create a coordinator and the handle used to reach it
    pub fn new(config: ServerConfig) -> Result<(Self, CoordinatorHandle), AppError> {
        let registry = Registry::new(config.default_room()?, config.max_rooms);
        let source = ReadinessSource::new(config.readiness, config.channel_capacity);
        let (control_tx, control_rx) = mpsc::channel(config.channel_capacity);
        let handle = CoordinatorHandle {
            control: control_tx,
            connector: source.connector(),
        };
        let coordinator = Self {
            config,
            registry,
            source,
            control: control_rx,
            guest_counter: 0,
        };
        Ok((coordinator, handle))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the coordinator event loop
    ///
    /// Control messages take priority over worker events.
    pub async fn run(mut self) {
        info!(
            "Coordinator started ({:?} readiness, default room '{}')",
            self.source.mode(),
            self.registry.default_room()
        );

        loop {
            tokio::select! {
                biased;
                control = self.control.recv() => match control {
                    Some(Control::Shutdown) | None => break,
                    Some(control) => self.handle_control(control),
                },
                batch = self.source.next_batch() => {
                    for envelope in batch {
                        self.handle_envelope(envelope);
                    }
                }
            }
        }

        self.shutdown().await;
        info!("Coordinator stopped");
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Register {
                client_id,
                peer,
                ends,
                ack,
            } => {
                self.handle_register(client_id, peer, ends);
                let _ = ack.send(());
            }
            Control::Exited { client_id, exit } => self.handle_exit(client_id, exit),
            Control::Shutdown => {}
        }
    }

    /// Handle a newly accepted connection
    fn handle_register(&mut self, client_id: ClientId, peer: Option<SocketAddr>, ends: CoordinatorEnds) {
        let nickname = self.next_guest_nickname();
        self.source.attach(client_id, ends.uplink);

        let client = match self.registry.register(client_id, nickname, ends.downlink, peer) {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to register client {}: {}", client_id, e);
                self.source.detach(client_id);
                return;
            }
        };

        let nickname = client.nickname.clone();
        let room = client.room.clone();
        info!(
            "Client {} registered as '{}' from {}",
            client_id,
            nickname,
            describe_peer(client.peer)
        );

        self.deliver(client_id, notice::welcome(&nickname, &room));
        self.broadcast(&room, &notice::connected(&nickname), Some(client_id));
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.registry.client_count(),
            self.registry.room_count()
        );
    }

    /// Handle a worker exit reported by the supervisor
    fn handle_exit(&mut self, client_id: ClientId, exit: WorkerExit) {
        // Lines the worker queued before exiting are still owed processing
        for envelope in self.source.drain_now() {
            self.handle_envelope(envelope);
        }

        match &exit {
            WorkerExit::Clean => debug!("Worker {} exited", client_id),
            WorkerExit::Failed(reason) => warn!("Worker {} failed: {}", client_id, reason),
            WorkerExit::Panicked => warn!("Worker {} panicked", client_id),
        }
        self.reclaim(client_id);
    }

    fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope.event {
            Event::Line(line) => self.handle_line(envelope.client_id, &line),
            Event::Closed => {
                debug!("Uplink of {} reached end-of-stream", envelope.client_id);
                self.reclaim(envelope.client_id);
            }
        }

        if let Err(violation) = self.audit_registry() {
            debug_assert!(false, "registry invariant violated: {}", violation);
        }
    }

    /// Check registry invariants, logging any violation
    fn audit_registry(&self) -> Result<(), String> {
        self.registry.check_invariants().map_err(|violation| {
            error!("Registry invariant violated: {}", violation);
            violation
        })
    }

    /// Decode and execute one line from a client
    fn handle_line(&mut self, client_id: ClientId, line: &str) {
        match self.registry.client(client_id) {
            Ok(client) if client.is_active() => {}
            Ok(_) => {
                debug!("Ignoring line from disconnecting client {}", client_id);
                return;
            }
            Err(e) => {
                debug!("Dropping line: {}", e);
                return;
            }
        }

        let result = Request::decode(line).and_then(|request| self.dispatch(client_id, request));
        if let Err(e) = result {
            debug!("Request from {} failed: {}", client_id, e);
            self.deliver(client_id, notice::error(&e));
        }
    }

    fn dispatch(&mut self, client_id: ClientId, request: Request) -> Result<(), ChatError> {
        match request {
            Request::Chat { text } => self.handle_chat(client_id, &text),
            Request::Whisper { target, body } => self.handle_whisper(client_id, &target, &body),
            Request::Command(command) => {
                debug!(
                    "Client {} command {:?} (mutating: {})",
                    client_id,
                    command,
                    command.is_mutating()
                );
                self.handle_command(client_id, command)
            }
        }
    }

    /// Handle chat message
    fn handle_chat(&mut self, client_id: ClientId, text: &str) -> Result<(), ChatError> {
        let client = self.registry.client(client_id)?;
        let room = client.room.clone();
        let line = notice::chat(&room, &client.nickname, text);

        let except = if self.config.echo_chat_to_sender {
            None
        } else {
            Some(client_id)
        };
        let delivered = self.broadcast(&room, &line, except);
        debug!("Chat from {} in {} delivered to {}", client_id, room, delivered);
        Ok(())
    }

    /// Handle whisper to a single nickname
    fn handle_whisper(&mut self, client_id: ClientId, target: &str, body: &str) -> Result<(), ChatError> {
        let sender = self.registry.client(client_id)?.nickname.clone();
        let target_id = self
            .registry
            .find_by_nickname(target)
            .filter(|c| c.is_active())
            .map(|c| c.id)
            .ok_or_else(|| ChatError::UserNotFound(target.to_string()))?;

        self.deliver(target_id, notice::whisper_from(&sender, body));
        self.deliver(client_id, notice::whisper_to(target, body));
        Ok(())
    }

    fn handle_command(&mut self, client_id: ClientId, command: Command) -> Result<(), ChatError> {
        match command {
            Command::Add(room) => {
                self.registry.add_room(room.clone())?;
                info!("Client {} created room {}", client_id, room);
                self.deliver(client_id, notice::room_created(&room));
            }
            Command::Remove(room) => {
                self.registry.remove_room(&room)?;
                info!("Client {} removed room {}", client_id, room);
                self.deliver(client_id, notice::room_removed(&room));
            }
            Command::Join(room) => {
                self.move_client(client_id, &room, self.config.auto_create_rooms)?;
            }
            Command::Leave => {
                let default = self.registry.default_room().clone();
                if self.registry.client(client_id)?.room == default {
                    return Err(ChatError::AlreadyDefault(default.to_string()));
                }
                self.move_client(client_id, &default, false)?;
            }
            Command::List => {
                let rooms = self.registry.room_summaries();
                self.deliver(client_id, notice::room_list(&rooms));
            }
            Command::Users => {
                let room = self.registry.client(client_id)?.room.clone();
                let nicknames = self.registry.nicknames_in(&room);
                self.deliver(client_id, notice::user_list(&room, &nicknames));
            }
            Command::Nickname(nickname) => self.rename(client_id, &nickname)?,
            Command::Quit => {
                self.deliver(client_id, notice::goodbye());
                self.registry.client_mut(client_id)?.close_downlink();
                info!("Client {} quit", client_id);
            }
            Command::Help => self.deliver(client_id, notice::help()),
        }
        Ok(())
    }

    /// Move a client and tell both rooms
    fn move_client(&mut self, client_id: ClientId, target: &RoomName, create: bool) -> Result<(), ChatError> {
        let nickname = self.registry.client(client_id)?.nickname.clone();

        match self.registry.move_client(client_id, target, create)? {
            Move::Unchanged => self.deliver(client_id, notice::already_in(target)),
            Move::Moved {
                from,
                to,
                created,
                vacated,
            } => {
                info!(
                    "Client {} moved {} -> {} (created: {}, vacated: {})",
                    client_id, from, to, created, vacated
                );
                if !vacated {
                    self.broadcast(&from, &notice::left(&nickname, &from), Some(client_id));
                }
                self.broadcast(&to, &notice::joined(&nickname, &to), Some(client_id));
                self.deliver(client_id, notice::moved(&to));
            }
        }
        Ok(())
    }

    /// Handle nickname change
    fn rename(&mut self, client_id: ClientId, nickname: &str) -> Result<(), ChatError> {
        let client = self.registry.client(client_id)?;
        if client.nickname == nickname {
            self.deliver(client_id, notice::nickname_set(nickname));
            return Ok(());
        }

        let old = self.registry.rename(client_id, nickname)?;
        let room = self.registry.client(client_id)?.room.clone();
        info!("Client {} renamed '{}' -> '{}'", client_id, old, nickname);

        self.deliver(client_id, notice::nickname_set(nickname));
        self.broadcast(&room, &notice::renamed(&old, nickname), Some(client_id));
        Ok(())
    }

    /// Remove a terminated client and everything it owned
    ///
    /// Safe to call more than once for the same client.
    fn reclaim(&mut self, client_id: ClientId) {
        self.source.detach(client_id);

        let Some(departure) = self.registry.remove_client(client_id) else {
            debug!("Client {} already reclaimed", client_id);
            return;
        };

        let client = departure.client;
        info!(
            "Client {} ('{}', {}) disconnected",
            client_id,
            client.nickname,
            describe_peer(client.peer)
        );
        if !departure.vacated {
            self.broadcast(&client.room, &notice::disconnected(&client.nickname), None);
        }
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.registry.client_count(),
            self.registry.room_count()
        );
    }

    /// Close every client and wait, bounded, for their workers to exit
    async fn shutdown(&mut self) {
        info!("Closing {} clients", self.registry.client_count());
        for client in self.registry.clients_mut() {
            if let Err(e) = client.send(notice::shutting_down()) {
                debug!("Shutdown notice to {} not queued: {}", client.id, e);
            }
            client.close_downlink();
        }

        let deadline = tokio::time::sleep(self.config.shutdown_timeout());
        tokio::pin!(deadline);

        while !self.registry.is_empty() {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    warn!(
                        "Shutdown timed out with {} workers still running",
                        self.registry.client_count()
                    );
                    break;
                }
                Some(control) = self.control.recv() => match control {
                    Control::Register { client_id, .. } => {
                        // Dropping the ends and the ack refuses the worker
                        debug!("Refusing client {} during shutdown", client_id);
                    }
                    Control::Exited { client_id, exit } => self.handle_exit(client_id, exit),
                    Control::Shutdown => {}
                },
                batch = self.source.next_batch() => {
                    for envelope in batch {
                        self.handle_envelope(envelope);
                    }
                }
            }
        }
    }

    /// Queue a line for one client
    fn deliver(&self, client_id: ClientId, line: String) {
        let Ok(client) = self.registry.client(client_id) else {
            return;
        };
        match client.send(line) {
            Ok(()) => {}
            Err(SendError::ChannelFull) => {
                warn!("Outbound queue full for {}, dropping line", client_id);
            }
            Err(SendError::ChannelClosed) => {
                debug!("Downlink of {} already closed", client_id);
            }
        }
    }

    /// Queue a line for every active member of a room
    ///
    /// Returns the number of clients the line was queued for.
    fn broadcast(&self, room: &RoomName, line: &str, except: Option<ClientId>) -> usize {
        let mut delivered = 0;
        for member in self.registry.members(room) {
            if Some(member.id) == except || !member.is_active() {
                continue;
            }
            match member.send(line) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Broadcast to {} skipped: {}", member.id, e),
            }
        }
        delivered
    }

    /// Next free `guest<N>` nickname
    fn next_guest_nickname(&mut self) -> String {
        loop {
            self.guest_counter += 1;
            let nickname = format!("guest{}", self.guest_counter);
            if !self.registry.is_nickname_taken(&nickname) {
                return nickname;
            }
        }
    }
}

fn describe_peer(peer: Option<SocketAddr>) -> String {
    peer.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
