//! Transport seam: authenticated peer-to-peer streams as an opaque
//! collaborator. Real transports live in the host binary; tests use the
//! in-memory doubles below.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::PeerId;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no known address for peer {0}")]
    UnknownPeer(PeerId),
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One bidirectional stream carrying newline-delimited frames. Dropping a
/// stream releases it; `close` flushes and shuts down the write side.
#[async_trait]
pub trait MessageStream: Send {
    /// Read one line. `Ok(None)` is a clean end of stream.
    async fn read_line(&mut self) -> std::io::Result<Option<String>>;

    /// Write one line, appending the newline delimiter if missing.
    async fn write_line(&mut self, line: &str) -> std::io::Result<()>;

    async fn close(&mut self) -> std::io::Result<()>;
}

/// The channel provider. Implementations own connection state and invoke a
/// registered handler once per inbound stream; this trait covers only the
/// outbound side plus the address/peer views the commands need.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Addresses remote peers can dial to reach this host.
    fn local_addrs(&self) -> Vec<String>;

    /// Peers with an established connection right now.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Establish a connection to `peer` at `addr`.
    async fn connect(&self, peer: PeerId, addr: &str) -> Result<(), TransportError>;

    /// Open a fresh outbound stream to `peer` under `protocol`.
    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: &str,
    ) -> Result<Box<dyn MessageStream>, TransportError>;
}

/// One frame captured by [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub peer: PeerId,
    pub protocol: String,
    pub line: String,
}

/// In-memory transport double: records connects and written frames, and can
/// be told to fail dials.
pub struct MemoryTransport {
    local_addrs: Vec<String>,
    connected: Mutex<Vec<PeerId>>,
    sent: Arc<Mutex<Vec<SentFrame>>>,
    dial_error: Option<String>,
}

impl MemoryTransport {
    pub fn new(local_addrs: Vec<String>) -> Self {
        Self {
            local_addrs,
            connected: Mutex::new(Vec::new()),
            sent: Arc::new(Mutex::new(Vec::new())),
            dial_error: None,
        }
    }

    /// A transport whose every dial fails with the given reason.
    pub fn failing(reason: &str) -> Self {
        Self {
            local_addrs: Vec::new(),
            connected: Mutex::new(Vec::new()),
            sent: Arc::new(Mutex::new(Vec::new())),
            dial_error: Some(reason.to_string()),
        }
    }

    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_addrs(&self) -> Vec<String> {
        self.local_addrs.clone()
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected.lock().unwrap().clone()
    }

    async fn connect(&self, peer: PeerId, _addr: &str) -> Result<(), TransportError> {
        if let Some(reason) = &self.dial_error {
            return Err(TransportError::Dial(reason.clone()));
        }
        let mut connected = self.connected.lock().unwrap();
        if !connected.contains(&peer) {
            connected.push(peer);
        }
        Ok(())
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: &str,
    ) -> Result<Box<dyn MessageStream>, TransportError> {
        if let Some(reason) = &self.dial_error {
            return Err(TransportError::Dial(reason.clone()));
        }
        Ok(Box::new(MemoryStream {
            peer,
            protocol: protocol.to_string(),
            incoming: VecDeque::new(),
            sent: self.sent.clone(),
        }))
    }
}

/// In-memory stream double. Outbound lines land in the owning
/// [`MemoryTransport`]'s sent log; inbound lines and read errors are
/// scripted up front.
pub struct MemoryStream {
    peer: PeerId,
    protocol: String,
    incoming: VecDeque<Result<String, std::io::ErrorKind>>,
    sent: Arc<Mutex<Vec<SentFrame>>>,
}

impl MemoryStream {
    /// A detached stream with a scripted inbound side, for receive-path
    /// tests. Reads yield the pushed items in order, then clean EOF.
    pub fn scripted() -> Self {
        Self {
            peer: PeerId::from_public_key(
                &crate::identity::Keypair::generate().verifying_key(),
            ),
            protocol: String::new(),
            incoming: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.incoming.push_back(Ok(line.to_string()));
    }

    pub fn push_read_error(&mut self, kind: std::io::ErrorKind) {
        self.incoming.push_back(Err(kind));
    }
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        match self.incoming.pop_front() {
            None => Ok(None),
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(kind)) => Err(kind.into()),
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut line = line.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.sent.lock().unwrap().push(SentFrame {
            peer: self.peer,
            protocol: self.protocol.clone(),
            line,
        });
        Ok(())
    }

    async fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
