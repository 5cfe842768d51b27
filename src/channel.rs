//! Per-connection channel pair
//!
//! Each connection gets an uplink (worker → coordinator) and a downlink
//! (coordinator → worker). `pair` hands every half to exactly one owner:
//! the worker receives `WorkerEnds`, the coordinator `CoordinatorEnds`.
//! Nothing keeps a spare copy, so dropping a half is always observed as
//! end-of-stream on the other side.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SendError;
use crate::readiness::Wake;
use crate::types::ClientId;

/// Coordinator side of the downlink
pub type Downlink = mpsc::Sender<String>;

/// Worker side of the downlink
pub type DownlinkReceiver = mpsc::Receiver<String>;

/// Something a worker reports about its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One complete line read from the socket, newline stripped
    Line(String),
    /// The worker has stopped reading; no more lines will follow
    Closed,
}

/// An event tagged with the client it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub client_id: ClientId,
    pub event: Event,
}

impl Envelope {
    pub fn line(client_id: ClientId, line: impl Into<String>) -> Self {
        Self {
            client_id,
            event: Event::Line(line.into()),
        }
    }

    pub fn closed(client_id: ClientId) -> Self {
        Self {
            client_id,
            event: Event::Closed,
        }
    }
}

/// Cloneable recipe for building uplinks, held by the acceptor
#[derive(Debug, Clone)]
pub enum Connector {
    /// Uplinks feed one shared envelope queue
    Addressed(mpsc::Sender<Envelope>),
    /// Uplinks are private queues announced through a shared wake
    Swept(Wake),
}

/// Worker side of the uplink
#[derive(Debug)]
pub struct Uplink {
    client_id: ClientId,
    inner: Option<UplinkInner>,
}

#[derive(Debug)]
enum UplinkInner {
    Addressed(mpsc::Sender<Envelope>),
    Swept {
        tx: mpsc::UnboundedSender<String>,
        wake: Wake,
    },
}

impl Uplink {
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Forward one line to the coordinator
    ///
    /// In sweep mode the wake is raised after the write, so a sweep that
    /// starts after the wake always finds the line.
    pub async fn forward(&self, line: String) -> Result<(), SendError> {
        match &self.inner {
            Some(UplinkInner::Addressed(tx)) => tx
                .send(Envelope::line(self.client_id, line))
                .await
                .map_err(|_| SendError::ChannelClosed),
            Some(UplinkInner::Swept { tx, wake }) => {
                tx.send(line).map_err(|_| SendError::ChannelClosed)?;
                wake.raise();
                Ok(())
            }
            None => Err(SendError::ChannelClosed),
        }
    }

    /// Close the uplink and make sure the coordinator notices
    pub async fn close(mut self) {
        match self.inner.take() {
            Some(UplinkInner::Addressed(tx)) => {
                let _ = tx.send(Envelope::closed(self.client_id)).await;
            }
            Some(UplinkInner::Swept { tx, wake }) => {
                drop(tx);
                wake.raise();
            }
            None => {}
        }
        debug!("Uplink closed for {}", self.client_id);
    }
}

impl Drop for Uplink {
    // Covers workers that are aborted or panic before calling `close`.
    fn drop(&mut self) {
        match self.inner.take() {
            Some(UplinkInner::Addressed(tx)) => {
                let _ = tx.try_send(Envelope::closed(self.client_id));
            }
            Some(UplinkInner::Swept { tx, wake }) => {
                drop(tx);
                wake.raise();
            }
            None => {}
        }
    }
}

/// Halves owned by the worker
#[derive(Debug)]
pub struct WorkerEnds {
    pub uplink: Uplink,
    pub downlink: DownlinkReceiver,
}

/// Halves owned by the coordinator
#[derive(Debug)]
pub struct CoordinatorEnds {
    pub downlink: Downlink,
    /// Present in sweep mode only; addressed uplinks share the coordinator's queue
    pub uplink: Option<mpsc::UnboundedReceiver<String>>,
}

/// Build the channel pair for one connection
pub fn pair(
    client_id: ClientId,
    connector: &Connector,
    downlink_capacity: usize,
) -> (WorkerEnds, CoordinatorEnds) {
    let (down_tx, down_rx) = mpsc::channel(downlink_capacity);
    let (inner, uplink_rx) = match connector {
        Connector::Addressed(tx) => (UplinkInner::Addressed(tx.clone()), None),
        Connector::Swept(wake) => {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                UplinkInner::Swept {
                    tx,
                    wake: wake.clone(),
                },
                Some(rx),
            )
        }
    };

    let worker = WorkerEnds {
        uplink: Uplink {
            client_id,
            inner: Some(inner),
        },
        downlink: down_rx,
    };
    let coordinator = CoordinatorEnds {
        downlink: down_tx,
        uplink: uplink_rx,
    };
    (worker, coordinator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn test_addressed_uplink_tags_lines() {
        let (tx, mut rx) = mpsc::channel(8);
        let id = ClientId::new();
        let (worker, coordinator) = pair(id, &Connector::Addressed(tx), 4);
        assert!(coordinator.uplink.is_none());

        worker.uplink.forward("CMD:list::".into()).await.unwrap();
        assert_eq!(rx.recv().await, Some(Envelope::line(id, "CMD:list::")));

        worker.uplink.close().await;
        assert_eq!(rx.recv().await, Some(Envelope::closed(id)));
    }

    #[tokio::test]
    async fn test_dropped_addressed_uplink_reports_closed() {
        let (tx, mut rx) = mpsc::channel(8);
        let id = ClientId::new();
        let (worker, _coordinator) = pair(id, &Connector::Addressed(tx), 4);

        drop(worker);
        assert_eq!(rx.recv().await, Some(Envelope::closed(id)));
    }

    #[tokio::test]
    async fn test_swept_uplink_reaches_private_queue() {
        let wake = Wake::new();
        let (worker, coordinator) = pair(ClientId::new(), &Connector::Swept(wake.clone()), 4);
        let mut uplink_rx = coordinator.uplink.unwrap();

        worker.uplink.forward("hello".into()).await.unwrap();
        wake.wait().await;
        assert_eq!(uplink_rx.try_recv().unwrap(), "hello");

        worker.uplink.close().await;
        wake.wait().await;
        assert_eq!(uplink_rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn test_downlink_is_exclusive() {
        let (tx, _rx) = mpsc::channel(8);
        let (mut worker, coordinator) = pair(ClientId::new(), &Connector::Addressed(tx), 4);

        coordinator.downlink.send("hi".into()).await.unwrap();
        drop(coordinator);
        assert_eq!(worker.downlink.recv().await.as_deref(), Some("hi"));
        assert!(worker.downlink.recv().await.is_none());
    }
}
