//! TCP transport: one connection per stream, hello-line dispatch.
//!
//! Every connection opens with a single hello line, `loft/1 <protocol>
//! <peer-id>`, then carries that protocol's frames. The listener spawns one
//! task per inbound connection; the task reads the hello, records the
//! remote's observed address as transient, and hands the stream to the
//! handler registered for the protocol tag. The hello's peer ID is taken as
//! claimed; binding it cryptographically is where a real secure transport
//! (noise, TLS) slots into this seam.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use loft_core::identity::PeerId;
use loft_core::transport::{MessageStream, Transport, TransportError};

/// Hello-line version marker; the first token of every connection.
pub const HELLO_PREFIX: &str = "loft/1";

/// Protocol tag for bare connection establishment: hello, then close.
const PING_PROTOCOL: &str = "/loft/ping/1.0.0";

/// Invoked once per inbound stream, after the hello line. Handlers that need
/// to read spawn their own task.
pub type InboundHandler = Arc<dyn Fn(PeerId, Box<dyn MessageStream>) + Send + Sync>;

pub struct TcpTransport {
    local_id: PeerId,
    listen_addr: SocketAddr,
    directory: Arc<loft_core::PeerDirectory>,
    connected: Mutex<HashMap<PeerId, String>>,
    handlers: Mutex<HashMap<String, InboundHandler>>,
}

impl TcpTransport {
    /// Bind the listener and start accepting inbound streams.
    pub async fn bind(
        local_id: PeerId,
        directory: Arc<loft_core::PeerDirectory>,
        addr: &str,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        let listen_addr = listener.local_addr()?;
        let transport = Arc::new(Self {
            local_id,
            listen_addr,
            directory,
            connected: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
        });
        debug!(%listen_addr, "transport listening");
        let accept = transport.clone();
        tokio::spawn(async move { accept.accept_loop(listener).await });
        Ok(transport)
    }

    /// Register the handler for one protocol tag. Streams arriving under an
    /// unregistered tag are dropped after the hello.
    pub fn set_stream_handler(&self, protocol: &str, handler: InboundHandler) {
        self.handlers
            .lock()
            .unwrap()
            .insert(protocol.to_string(), handler);
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, remote_addr)) => {
                    let transport = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = transport.handle_inbound(socket, remote_addr).await {
                            debug!(%remote_addr, "inbound stream dropped: {e}");
                        }
                    });
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                }
            }
        }
    }

    async fn handle_inbound(&self, socket: TcpStream, remote_addr: SocketAddr) -> Result<()> {
        let mut stream = TcpMessageStream::new(socket);
        let hello = stream
            .read_line()
            .await?
            .context("connection closed before hello")?;
        let (protocol, remote) = parse_hello(&hello)?;

        self.directory.add_address(
            remote,
            &remote_addr.to_string(),
            loft_core::AddressValidity::Transient,
        );
        self.connected
            .lock()
            .unwrap()
            .insert(remote, remote_addr.to_string());

        if protocol == PING_PROTOCOL {
            return Ok(());
        }
        let handler = self.handlers.lock().unwrap().get(&protocol).cloned();
        match handler {
            Some(handler) => handler(remote, Box::new(stream)),
            None => debug!(%remote, %protocol, "no handler for protocol"),
        }
        Ok(())
    }

    /// Last known dialable address for a peer: the one we connected on, else
    /// the directory's best entry.
    fn resolve_addr(&self, peer: PeerId) -> Result<String, TransportError> {
        if let Some(addr) = self.connected.lock().unwrap().get(&peer) {
            return Ok(addr.clone());
        }
        self.directory
            .addresses_of(peer)
            .first()
            .map(|e| e.addr.clone())
            .ok_or(TransportError::UnknownPeer(peer))
    }

    async fn dial(&self, peer: PeerId, addr: &str, protocol: &str) -> Result<TcpMessageStream, TransportError> {
        let socket = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Dial(format!("{addr}: {e}")))?;
        let mut stream = TcpMessageStream::new(socket);
        stream
            .write_line(&format!("{HELLO_PREFIX} {protocol} {}", self.local_id))
            .await?;
        self.connected
            .lock()
            .unwrap()
            .insert(peer, addr.to_string());
        Ok(stream)
    }
}

fn parse_hello(line: &str) -> Result<(String, PeerId)> {
    let mut parts = line.trim().split(' ');
    let prefix = parts.next().unwrap_or_default();
    anyhow::ensure!(prefix == HELLO_PREFIX, "bad hello prefix: {prefix:?}");
    let protocol = parts.next().context("hello missing protocol tag")?;
    let id_text = parts.next().context("hello missing peer id")?;
    let remote: PeerId = id_text.parse()?;
    Ok((protocol.to_string(), remote))
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_addrs(&self) -> Vec<String> {
        vec![self.listen_addr.to_string()]
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected.lock().unwrap().keys().copied().collect()
    }

    async fn connect(&self, peer: PeerId, addr: &str) -> Result<(), TransportError> {
        let mut stream = self.dial(peer, addr, PING_PROTOCOL).await?;
        stream.close().await?;
        Ok(())
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: &str,
    ) -> Result<Box<dyn MessageStream>, TransportError> {
        let addr = self.resolve_addr(peer)?;
        let stream = self.dial(peer, &addr, protocol).await?;
        Ok(Box::new(stream))
    }
}

/// Newline-framed view over one TCP connection.
pub struct TcpMessageStream {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TcpMessageStream {
    fn new(socket: TcpStream) -> Self {
        let (read, write) = socket.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }
}

#[async_trait]
impl MessageStream for TcpMessageStream {
    async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}
