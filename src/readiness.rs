//! Readiness notification between workers and the coordinator
//!
//! The coordinator must react to input from any of N workers without
//! blocking on one of them. Two strategies are provided:
//!
//! - **Addressed**: every worker pushes `Envelope`s into a single shared
//!   queue and the coordinator awaits the next one. This is the native
//!   tokio way and the default.
//! - **Sweep**: every worker owns a private uplink queue and, after writing,
//!   raises a content-free [`Wake`]. Wakes coalesce into at most one stored
//!   permit. On each wake the coordinator sweeps every uplink with a
//!   non-blocking `try_recv`.
//!
//! Both are cancel safe inside `tokio::select!`: the only await point is the
//! queue receive or the wake itself, and a sweep runs to completion
//! synchronously.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use crate::channel::{Connector, Envelope};
use crate::config::ReadinessMode;
use crate::types::ClientId;

/// Coalescing wake-up addressed to the coordinator
///
/// Carries no identity: it only says "some uplink has something".
#[derive(Debug, Clone, Default)]
pub struct Wake(Arc<Notify>);

impl Wake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal pending work; repeated calls before the next `wait` collapse
    pub fn raise(&self) {
        self.0.notify_one();
    }

    /// Wait for the next (possibly already stored) wake
    pub async fn wait(&self) {
        self.0.notified().await;
    }
}

/// Coordinator-side state of the sweep strategy
#[derive(Debug)]
pub struct Sweeper {
    wake: Wake,
    uplinks: HashMap<ClientId, mpsc::UnboundedReceiver<String>>,
}

impl Sweeper {
    pub fn new(wake: Wake) -> Self {
        Self {
            wake,
            uplinks: HashMap::new(),
        }
    }

    /// Start sweeping a worker's uplink
    pub fn attach(&mut self, client_id: ClientId, uplink: mpsc::UnboundedReceiver<String>) {
        self.uplinks.insert(client_id, uplink);
    }

    /// Stop sweeping an uplink and drop it; returns whether it was attached
    pub fn detach(&mut self, client_id: ClientId) -> bool {
        self.uplinks.remove(&client_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.uplinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uplinks.is_empty()
    }

    /// Non-blocking read of every attached uplink
    ///
    /// Each uplink is drained until empty so lines from one worker stay in
    /// order and nothing is left behind without a pending wake. A
    /// disconnected uplink yields `Event::Closed` and is detached.
    pub fn sweep(&mut self) -> Vec<Envelope> {
        let mut ready = Vec::new();
        let mut closed = Vec::new();

        for (&client_id, uplink) in self.uplinks.iter_mut() {
            loop {
                match uplink.try_recv() {
                    Ok(line) => ready.push(Envelope::line(client_id, line)),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed.push(client_id);
                        break;
                    }
                }
            }
        }

        for client_id in closed {
            self.uplinks.remove(&client_id);
            ready.push(Envelope::closed(client_id));
        }

        trace!("Sweep over {} uplinks found {} events", self.uplinks.len(), ready.len());
        ready
    }

    /// Wait for a wake, then sweep; repeats until something is found
    pub async fn next_batch(&mut self) -> Vec<Envelope> {
        loop {
            self.wake.wait().await;
            let batch = self.sweep();
            if !batch.is_empty() {
                return batch;
            }
            debug!("Spurious wake, nothing pending");
        }
    }
}

/// Where the coordinator gets worker events from
#[derive(Debug)]
pub enum ReadinessSource {
    Addressed {
        /// Cloned into every connector; also keeps the queue open
        tx: mpsc::Sender<Envelope>,
        rx: mpsc::Receiver<Envelope>,
    },
    Sweep(Sweeper),
}

impl ReadinessSource {
    pub fn new(mode: ReadinessMode, capacity: usize) -> Self {
        match mode {
            ReadinessMode::Addressed => {
                let (tx, rx) = mpsc::channel(capacity);
                ReadinessSource::Addressed { tx, rx }
            }
            ReadinessMode::Sweep => ReadinessSource::Sweep(Sweeper::new(Wake::new())),
        }
    }

    /// Recipe the acceptor uses to build uplinks feeding this source
    pub fn connector(&self) -> Connector {
        match self {
            ReadinessSource::Addressed { tx, .. } => Connector::Addressed(tx.clone()),
            ReadinessSource::Sweep(sweeper) => Connector::Swept(sweeper.wake.clone()),
        }
    }

    pub fn mode(&self) -> ReadinessMode {
        match self {
            ReadinessSource::Addressed { .. } => ReadinessMode::Addressed,
            ReadinessSource::Sweep(_) => ReadinessMode::Sweep,
        }
    }

    /// Register a new worker's uplink (sweep mode only has one to keep)
    pub fn attach(&mut self, client_id: ClientId, uplink: Option<mpsc::UnboundedReceiver<String>>) {
        if let (ReadinessSource::Sweep(sweeper), Some(uplink)) = (self, uplink) {
            sweeper.attach(client_id, uplink);
        }
    }

    /// Forget a worker's uplink
    pub fn detach(&mut self, client_id: ClientId) {
        if let ReadinessSource::Sweep(sweeper) = self {
            sweeper.detach(client_id);
        }
    }

    /// Wait until at least one event is available
    pub async fn next_batch(&mut self) -> Vec<Envelope> {
        match self {
            ReadinessSource::Addressed { rx, .. } => {
                let mut batch = Vec::new();
                if let Some(first) = rx.recv().await {
                    batch.push(first);
                }
                while let Ok(more) = rx.try_recv() {
                    batch.push(more);
                }
                batch
            }
            ReadinessSource::Sweep(sweeper) => sweeper.next_batch().await,
        }
    }

    /// Collect whatever is pending right now without waiting
    pub fn drain_now(&mut self) -> Vec<Envelope> {
        match self {
            ReadinessSource::Addressed { rx, .. } => {
                let mut batch = Vec::new();
                while let Ok(more) = rx.try_recv() {
                    batch.push(more);
                }
                batch
            }
            ReadinessSource::Sweep(sweeper) => sweeper.sweep(),
        }
    }
}
