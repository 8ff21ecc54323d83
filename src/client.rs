//! Command client: connection ownership, correlation, and timeouts.
//!
//! The [`BridgeClient`] is the single owner of the physical connection.
//! Each outbound command gets a fresh correlation id and a pending-table
//! entry holding a oneshot resolver; the read loop resolves entries as
//! responses arrive. A request is always resolved exactly once: by its
//! response, by its deadline, or by connection teardown.
//!
//! Inbound handling never blocks: resolving a pending request only fires
//! the oneshot, the waiting caller runs on its own task.
//!
//! # Example
//!
//! ```ignore
//! use studiolink_client::{BridgeClient, BridgeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (reader, writer) = transport::connect(&endpoints).await?;
//!     let client = BridgeClient::builder().connect(reader, writer);
//!
//!     let data = client.send("transport.state", Default::default()).await?;
//!     println!("playing: {}", data["playing"]);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::chunk::split_with_capacity;
use crate::protocol::{
    decode_payload, encode_frame, encode_payload, CommandEnvelope, FrameScanner, MsgType,
    Reassembler, ResponseEnvelope, SenderId,
};
use crate::writer::{spawn_writer_task, OutboundMessage, WriterHandle};

/// Sender identity of the device on this connection. One physical peer
/// per client, so a single id suffices for reassembly.
const DEVICE_SENDER: SenderId = 0;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    /// No connection established.
    Disconnected = 0,
    /// Tasks are being spawned.
    Connecting = 1,
    /// Ready to send commands.
    Open = 2,
    /// Local close in progress.
    Closing = 3,
    /// The transport failed; reconnect with a fresh client.
    Faulted = 4,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnState::Connecting,
            2 => ConnState::Open,
            3 => ConnState::Closing,
            4 => ConnState::Faulted,
            _ => ConnState::Disconnected,
        }
    }
}

/// One in-flight command awaiting its response.
struct PendingRequest {
    command: String,
    issued_at: Instant,
    deadline: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

/// Shared client internals.
struct Inner {
    config: BridgeConfig,
    next_id: AtomicU32,
    pending: Mutex<HashMap<u32, PendingRequest>>,
    writer: WriterHandle,
    state: AtomicU8,
}

impl Inner {
    fn set_state(&self, state: ConnState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Resolve a decoded response against the pending table.
    fn resolve(&self, response: ResponseEnvelope) {
        let entry = {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.remove(&response.id)
        };

        let Some(entry) = entry else {
            // Stale (timed out), duplicate, or malformed id. Not fatal.
            warn!(id = response.id, "dropping response with no pending request");
            return;
        };

        debug!(
            id = response.id,
            command = %entry.command,
            elapsed = ?entry.issued_at.elapsed(),
            success = response.success,
            "resolving pending request"
        );

        let result = if response.success {
            Ok(response.data.unwrap_or(Value::Null))
        } else {
            Err(BridgeError::Remote(
                response.error.unwrap_or_else(|| "unspecified error".into()),
            ))
        };
        // Receiver may be gone if the caller gave up; nothing to do then.
        let _ = entry.tx.send(result);
    }

    /// Fail every pending request with [`BridgeError::ConnectionLost`].
    ///
    /// Draining the table guarantees each entry is failed exactly once.
    fn fail_all_pending(&self) {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            debug!(command = %entry.command, "failing pending request: connection lost");
            let _ = entry.tx.send(Err(BridgeError::ConnectionLost));
        }
    }
}

/// Builder for configuring a [`BridgeClient`].
#[derive(Debug, Default)]
pub struct BridgeClientBuilder {
    config: BridgeConfig,
}

impl BridgeClientBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default timeout for simple commands.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the timeout for discovery-class commands.
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.discovery_timeout = timeout;
        self
    }

    /// Set the per-frame payload capacity.
    pub fn safe_capacity(mut self, capacity: usize) -> Self {
        self.config.safe_capacity = capacity;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach to a connected transport and start the client tasks.
    pub fn connect<R, W>(self, reader: R, writer: W) -> BridgeClient
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        BridgeClient::start(self.config, reader, writer)
    }
}

/// A running bridge client.
pub struct BridgeClient {
    inner: Arc<Inner>,
    read_task: JoinHandle<()>,
    _writer_task: JoinHandle<Result<()>>,
}

impl BridgeClient {
    /// Create a new client builder.
    pub fn builder() -> BridgeClientBuilder {
        BridgeClientBuilder::new()
    }

    /// Start a client over a connected transport with default config.
    pub fn connect<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::builder().connect(reader, writer)
    }

    fn start<R, W>(config: BridgeConfig, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_handle, writer_task) = spawn_writer_task(writer, config.channel_capacity);

        let inner = Arc::new(Inner {
            config,
            // Id 0 is reserved; the first command gets id 1.
            next_id: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            writer: writer_handle,
            state: AtomicU8::new(ConnState::Connecting as u8),
        });

        // Open before the read task exists: a transport that dies
        // instantly must end Faulted or Disconnected, never have that
        // overwritten by a late Open.
        inner.set_state(ConnState::Open);

        let loop_inner = inner.clone();
        let read_task = tokio::spawn(async move {
            match read_loop(reader, &loop_inner).await {
                Ok(()) => {
                    debug!("transport closed by peer");
                    loop_inner.set_state(ConnState::Disconnected);
                }
                Err(err) => {
                    error!("read loop failed: {err}");
                    loop_inner.set_state(ConnState::Faulted);
                }
            }
            // Reassembly buffers for this connection die with the loop;
            // every in-flight command is failed here, exactly once.
            loop_inner.fail_all_pending();
        });

        Self {
            inner,
            read_task,
            _writer_task: writer_task,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnState {
        self.inner.state()
    }

    /// Number of in-flight requests.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().expect("pending table poisoned").len()
    }

    /// Send a command with the default timeout.
    pub async fn send(&self, command: &str, params: Map<String, Value>) -> Result<Value> {
        self.send_with_timeout(command, params, self.inner.config.command_timeout)
            .await
    }

    /// Send a discovery-class command with the discovery timeout.
    pub async fn send_discovery(&self, command: &str, params: Map<String, Value>) -> Result<Value> {
        self.send_with_timeout(command, params, self.inner.config.discovery_timeout)
            .await
    }

    /// Send a command and await its response or a deadline.
    ///
    /// Assigns a correlation id, frames the envelope (chunking payloads
    /// above the safe capacity), registers a pending entry, and suspends
    /// until resolution. On timeout the entry is removed; a late response
    /// is then dropped by the read loop, not misapplied.
    pub async fn send_with_timeout(
        &self,
        command: &str,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.inner.state() != ConnState::Open {
            return Err(BridgeError::ConnectionLost);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = CommandEnvelope::new(command, id, params);
        let payload = encode_payload(&envelope)?;

        let frames = split_with_capacity(MsgType::Command, &payload, self.inner.config.safe_capacity);
        let mut wire_frames = Vec::with_capacity(frames.len());
        for frame in &frames {
            wire_frames.push(encode_frame(frame)?);
        }

        let (tx, mut rx) = oneshot::channel();
        let issued_at = Instant::now();
        {
            let mut pending = self.inner.pending.lock().expect("pending table poisoned");
            pending.insert(
                id,
                PendingRequest {
                    command: command.to_string(),
                    issued_at,
                    deadline: issued_at + timeout,
                    tx,
                },
            );
        }

        debug!(id, command, frames = wire_frames.len(), "sending command");
        if let Err(err) = self.inner.writer.send(OutboundMessage::new(wire_frames)).await {
            self.inner.pending.lock().expect("pending table poisoned").remove(&id);
            return Err(err);
        }

        // Poll through a mutable borrow so the receiver stays available
        // for the deadline-race check below.
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            // Resolver dropped without firing: teardown race.
            Ok(Err(_)) => Err(BridgeError::ConnectionLost),
            Err(_) => {
                let removed = {
                    let mut pending =
                        self.inner.pending.lock().expect("pending table poisoned");
                    pending.remove(&id)
                };
                match removed {
                    Some(entry) => {
                        warn!(
                            id,
                            command = %entry.command,
                            deadline = ?entry.deadline,
                            "request deadline expired"
                        );
                        Err(BridgeError::Timeout {
                            command: command.to_string(),
                            elapsed: timeout,
                        })
                    }
                    // The response squeaked in as the deadline fired;
                    // honor it so the request resolves exactly once.
                    None => match rx.try_recv() {
                        Ok(result) => result,
                        Err(_) => Err(BridgeError::Timeout {
                            command: command.to_string(),
                            elapsed: timeout,
                        }),
                    },
                }
            }
        }
    }

    /// Close the connection, failing any remaining pending requests.
    pub async fn close(self) {
        self.inner.set_state(ConnState::Closing);
        self.read_task.abort();
        let _ = self.read_task.await;
        self.inner.fail_all_pending();
        self.inner.set_state(ConnState::Disconnected);
    }
}

/// Read loop: bytes → frames → reassembled payloads → resolved requests.
async fn read_loop<R>(mut reader: R, inner: &Arc<Inner>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut scanner = FrameScanner::new();
    let mut reassembler = Reassembler::new();
    let mut buf = vec![0u8; 4096];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        for frame in scanner.push(&buf[..n]) {
            if frame.msg_type != MsgType::Response {
                warn!("dropping non-response frame from device");
                continue;
            }
            let Some(payload) = reassembler.absorb(DEVICE_SENDER, &frame) else {
                continue; // more chunks expected
            };
            match decode_payload::<ResponseEnvelope>(&payload) {
                Ok(response) => inner.resolve(response),
                Err(err) => warn!("dropping undecodable response payload: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_frame;
    use bytes::BytesMut;
    use serde_json::json;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    /// Minimal in-process device: decodes one command, answers with `reply`.
    async fn fake_device(
        mut reader: DuplexStream,
        mut writer: DuplexStream,
        reply: impl Fn(CommandEnvelope) -> ResponseEnvelope + Send + 'static,
    ) {
        let mut scanner = FrameScanner::new();
        let mut reassembler = Reassembler::new();
        let mut buf = vec![0u8; 4096];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            for frame in scanner.push(&buf[..n]) {
                if let Some(payload) = reassembler.absorb(0, &frame) {
                    let command: CommandEnvelope = decode_payload(&payload).unwrap();
                    let response = reply(command);
                    let payload = encode_payload(&response).unwrap();
                    let mut wire = BytesMut::new();
                    for frame in split_with_capacity(MsgType::Response, &payload, 1800) {
                        wire.extend_from_slice(&encode_frame(&frame).unwrap());
                    }
                    writer.write_all(&wire).await.unwrap();
                }
            }
        }
    }

    fn pair() -> (BridgeClient, DuplexStream, DuplexStream) {
        let (client_rx, device_tx) = tokio::io::duplex(16 * 1024);
        let (device_rx, client_tx) = tokio::io::duplex(16 * 1024);
        let client = BridgeClient::connect(client_rx, client_tx);
        (client, device_rx, device_tx)
    }

    #[tokio::test]
    async fn test_send_resolves_with_response_data() {
        let (client, device_rx, device_tx) = pair();
        tokio::spawn(fake_device(device_rx, device_tx, |cmd| {
            assert_eq!(cmd.command, "transport.state");
            ResponseEnvelope::ok(cmd.id, json!({"playing": false, "position": 0.0}))
        }));

        let data = client.send("transport.state", Map::new()).await.unwrap();
        assert_eq!(data["playing"], json!(false));
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.state(), ConnState::Open);
    }

    #[tokio::test]
    async fn test_remote_error_propagated_verbatim() {
        let (client, device_rx, device_tx) = pair();
        tokio::spawn(fake_device(device_rx, device_tx, |cmd| {
            ResponseEnvelope::err(cmd.id, "No valid plugin at channel 9, slot -1")
        }));

        let err = client.send("plugins.discover", Map::new()).await.unwrap_err();
        match err {
            BridgeError::Remote(msg) => {
                assert_eq!(msg, "No valid plugin at channel 9, slot -1")
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_correlation_ids_are_independent() {
        let (client, device_rx, device_tx) = pair();
        tokio::spawn(fake_device(device_rx, device_tx, |cmd| {
            ResponseEnvelope::ok(cmd.id, json!({"echo": cmd.params["n"]}))
        }));

        let client = Arc::new(client);
        let mut tasks = Vec::new();
        for n in 0..8i64 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                let mut params = Map::new();
                params.insert("n".into(), json!(n));
                let data = client.send("echo", params).await.unwrap();
                assert_eq!(data["echo"], json!(n));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        // Device that never answers.
        let (client_rx, _device_tx) = tokio::io::duplex(4096);
        let (_device_rx, client_tx) = tokio::io::duplex(4096);
        let client = BridgeClient::builder()
            .command_timeout(Duration::from_millis(50))
            .connect(client_rx, client_tx);

        let err = client.send("transport.start", Map::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert!(err.is_retriable());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_is_dropped() {
        let (client_rx, _device_tx) = tokio::io::duplex(4096);
        let (device_rx, client_tx) = tokio::io::duplex(4096);
        let mut device_rx = device_rx;
        let client = BridgeClient::builder()
            .command_timeout(Duration::from_millis(50))
            .connect(client_rx, client_tx);

        let err = client.send("pattern.create", Map::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));

        // The device answers long after the deadline. Nothing must panic
        // and the table stays empty.
        let mut buf = vec![0u8; 4096];
        let n = device_rx.read(&mut buf).await.unwrap();
        let frame = decode_frame(&buf[..n]).unwrap();
        let command: CommandEnvelope = decode_payload(&frame.payload).unwrap();

        let payload = encode_payload(&ResponseEnvelope::ok(command.id, json!(1))).unwrap();
        let wire =
            encode_frame(&split_with_capacity(MsgType::Response, &payload, 1800)[0]).unwrap();
        // Late reply goes nowhere useful; the client must stay healthy.
        drop(wire);

        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.state(), ConnState::Open);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_response_racing_deadline_resolves_exactly_once() {
        // The device answers exactly at the deadline, over and over. The
        // caller must see either the data or a timeout, never a hang or a
        // leaked pending entry, whichever side of the race wins.
        let deadline = Duration::from_millis(20);
        let (client, device_rx, device_tx) = pair();
        tokio::spawn(async move {
            let mut reader = device_rx;
            let mut writer = device_tx;
            let mut scanner = FrameScanner::new();
            let mut reassembler = Reassembler::new();
            let mut buf = vec![0u8; 4096];
            loop {
                let n = match reader.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for frame in scanner.push(&buf[..n]) {
                    if let Some(payload) = reassembler.absorb(0, &frame) {
                        let cmd: CommandEnvelope = decode_payload(&payload).unwrap();
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        let reply =
                            encode_payload(&ResponseEnvelope::ok(cmd.id, json!("late"))).unwrap();
                        let frame = &split_with_capacity(MsgType::Response, &reply, 1800)[0];
                        if writer.write_all(&encode_frame(frame).unwrap()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        for _ in 0..20 {
            let result = client
                .send_with_timeout("transport.state", Map::new(), deadline)
                .await;
            match result {
                Ok(data) => assert_eq!(data, json!("late")),
                Err(BridgeError::Timeout { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(client.pending_count(), 0);
            // Drain any response that lost the race before the next round,
            // so rounds stay independent.
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        assert_eq!(client.state(), ConnState::Open);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_instantly_dead_transport_never_reads_open() {
        // The reader hits EOF before connect() returns. However the
        // startup races, the observable state must settle on the read
        // loop's verdict, not on Open.
        for _ in 0..50 {
            let (client_rx, device_tx) = tokio::io::duplex(64);
            let (_device_rx, client_tx) = tokio::io::duplex(64);
            drop(device_tx);

            let client = BridgeClient::connect(client_rx, client_tx);
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(client.state(), ConnState::Disconnected);

            let err = client.send("transport.state", Map::new()).await.unwrap_err();
            assert!(matches!(err, BridgeError::ConnectionLost));
        }
    }

    #[tokio::test]
    async fn test_disconnect_fails_all_pending() {
        let (client_rx, device_tx) = tokio::io::duplex(4096);
        let (_device_rx, client_tx) = tokio::io::duplex(4096);
        let client = Arc::new(
            BridgeClient::builder()
                .command_timeout(Duration::from_secs(30))
                .connect(client_rx, client_tx),
        );

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                client.send("transport.start", Map::new()).await
            }));
        }
        // Let the sends register before the device goes away.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.pending_count(), 3);

        drop(device_tx);

        for task in tasks {
            let result = task.await.unwrap();
            assert!(matches!(result, Err(BridgeError::ConnectionLost)));
        }
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.state(), ConnState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_after_disconnect_fails_fast() {
        let (client_rx, device_tx) = tokio::io::duplex(4096);
        let (_device_rx, client_tx) = tokio::io::duplex(4096);
        let client = BridgeClient::connect(client_rx, client_tx);

        drop(device_tx);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = client.send("transport.stop", Map::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionLost));
    }

    #[tokio::test]
    async fn test_chunked_response_reassembled() {
        let (client, device_rx, device_tx) = pair();
        // Large enough that the base64 payload spans multiple frames.
        let big: String = "x".repeat(6000);
        let reply_data = json!({ "blob": big });
        let expected = reply_data.clone();
        tokio::spawn(fake_device(device_rx, device_tx, move |cmd| {
            ResponseEnvelope::ok(cmd.id, reply_data.clone())
        }));

        let data = client
            .send_discovery("state.channels", Map::new())
            .await
            .unwrap();
        assert_eq!(data, expected);
    }

    #[tokio::test]
    async fn test_close_is_clean() {
        let (client, _device_rx, _device_tx) = pair();
        assert_eq!(client.state(), ConnState::Open);
        client.close().await;
    }
}
