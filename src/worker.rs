//! Per-connection worker
//!
//! Pumps lines between one TCP socket and its channel pair. The worker owns
//! the socket exclusively and never touches the registry.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::channel::WorkerEnds;
use crate::error::AppError;

/// Run a worker until its connection ends
///
/// A reader sub-task frames socket bytes into lines and forwards them over
/// the uplink. A writer sub-task drains the downlink onto the socket; once
/// the coordinator drops its downlink sender, whatever is still queued is
/// flushed and the socket is closed. Whichever sub-task finishes first
/// stops the other.
pub async fn run_worker(
    stream: TcpStream,
    ends: WorkerEnds,
    max_line_length: usize,
) -> Result<(), AppError> {
    let WorkerEnds {
        uplink,
        mut downlink,
    } = ends;
    let client_id = uplink.client_id();

    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(max_line_length));
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());

    // Spawn read task (socket -> uplink)
    let mut read_task = tokio::spawn(async move {
        let result = loop {
            match lines.next().await {
                Some(Ok(line)) => {
                    if uplink.forward(line).await.is_err() {
                        debug!("Coordinator closed, ending read task for {}", client_id);
                        break Ok(());
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(
                        "Client {} sent a line longer than {} bytes",
                        client_id, max_line_length
                    );
                    break Err(AppError::Line(LinesCodecError::MaxLineLengthExceeded));
                }
                Some(Err(e)) => break Err(AppError::from(e)),
                None => break Ok(()),
            }
        };
        uplink.close().await;
        debug!("Read task ended for {}", client_id);
        result
    });

    // Spawn write task (downlink -> socket)
    let mut write_task = tokio::spawn(async move {
        while let Some(line) = downlink.recv().await {
            sink.send(line).await?;
        }
        // Flushes and shuts down the write half
        SinkExt::<String>::close(&mut sink).await?;
        debug!("Write task ended for {}", client_id);
        Ok::<(), AppError>(())
    });

    // Wait for either task to complete
    let finished = tokio::select! {
        result = &mut read_task => {
            write_task.abort();
            result
        }
        result = &mut write_task => {
            read_task.abort();
            result
        }
    };

    match finished {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(AppError::Task(e)),
    }
}
