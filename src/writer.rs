//! Dedicated writer task serializing outbound frame emission.
//!
//! All sends go through one mpsc channel into a single task that owns the
//! write half of the transport. A queue item is a whole command - every
//! frame of its chunk sequence - so two concurrent `send` calls can never
//! interleave their chunks on the wire. Reassembly on the remote side is
//! keyed only by sender identity, so interleaving would corrupt both
//! messages.
//!
//! ```text
//! send() 1 ─┐
//! send() 2 ─┼─► mpsc::Sender<OutboundMessage> ─► Writer Task ─► transport
//! send() N ─┘
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// One logical message, already framed: the ordered chunk sequence of a
/// single command.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Encoded wire frames, sent back to back.
    pub frames: Vec<Bytes>,
}

impl OutboundMessage {
    /// Wrap a framed chunk sequence.
    pub fn new(frames: Vec<Bytes>) -> Self {
        Self { frames }
    }

    /// Total wire bytes across all frames.
    pub fn wire_size(&self) -> usize {
        self.frames.iter().map(|f| f.len()).sum()
    }
}

/// Handle for enqueueing messages to the writer task. Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundMessage>,
}

impl WriterHandle {
    /// Enqueue a message for transmission.
    ///
    /// Waits for queue space if the writer is behind; fails with
    /// [`BridgeError::ConnectionLost`] once the writer task has exited.
    pub async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| BridgeError::ConnectionLost)
    }
}

/// Spawn the writer task owning the transport's write half.
pub fn spawn_writer_task<W>(
    writer: W,
    channel_capacity: usize,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Writes each queued message's frames contiguously, flushing per message.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundMessage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        for frame in &message.frames {
            writer.write_all(frame).await?;
        }
        writer.flush().await?;
    }
    debug!("writer channel closed, writer task exiting");
    Ok(())
}
