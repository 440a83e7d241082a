//! Direct messaging: one-shot sends over fresh streams, and the per-stream
//! inbound receive loop.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::identity::PeerId;
use crate::protocol::{Message, PROTOCOL_ID};
use crate::transport::{MessageStream, Transport, TransportError};
use crate::wire::{self, FrameError};

/// Consumer of inbound messages; invoked once per successfully parsed frame.
pub type MessageSink = Arc<dyn Fn(Message) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("stream write failed: {0}")]
    Write(#[from] std::io::Error),
}

pub struct DirectMessenger {
    local_id: PeerId,
    transport: Arc<dyn Transport>,
}

impl DirectMessenger {
    pub fn new(local_id: PeerId, transport: Arc<dyn Transport>) -> Self {
        Self {
            local_id,
            transport,
        }
    }

    /// Send one message to `to`: open a stream under the chat protocol tag,
    /// write exactly one frame, release the stream. The stream is closed on
    /// every exit path; successive sends open independent streams and carry
    /// no ordering guarantee relative to each other.
    pub async fn send(&self, to: PeerId, body: &str) -> Result<(), ProtocolError> {
        let mut stream = self.transport.open_stream(to, PROTOCOL_ID).await?;
        let frame = wire::encode_frame(&Message::new(self.local_id, body))?;
        let written = stream.write_line(&frame).await;
        if let Err(e) = stream.close().await {
            debug!(peer = %to, "stream close failed: {e}");
        }
        written?;
        Ok(())
    }
}

/// Drain one inbound stream: read frames until clean EOF or a read error.
/// A malformed frame is logged with the remote peer and raw text, then
/// skipped; it never terminates the loop or drops later frames. Nothing is
/// propagated from this path, it is event-driven with no waiting caller.
pub async fn run_receive_loop(
    remote: PeerId,
    mut stream: Box<dyn MessageStream>,
    sink: MessageSink,
) {
    loop {
        match stream.read_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match wire::decode_frame(&line) {
                    Ok(msg) => sink(msg),
                    Err(e) => warn!(peer = %remote, raw = %line.trim(), "dropping frame: {e}"),
                }
            }
            Ok(None) => {
                debug!(peer = %remote, "stream closed");
                break;
            }
            Err(e) => {
                debug!(peer = %remote, "stream read error: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::identity::Keypair;
    use crate::protocol::now_millis;
    use crate::transport::{MemoryStream, MemoryTransport};

    fn collecting_sink() -> (MessageSink, Arc<Mutex<Vec<Message>>>) {
        let seen: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: MessageSink = Arc::new(move |m| sink_seen.lock().unwrap().push(m));
        (sink, seen)
    }

    #[tokio::test]
    async fn send_writes_exactly_one_frame() {
        let local = Keypair::generate().peer_id();
        let remote = Keypair::generate().peer_id();
        let transport = Arc::new(MemoryTransport::new(Vec::new()));
        let messenger = DirectMessenger::new(local, transport.clone());

        let before = now_millis();
        messenger.send(remote, "hi").await.unwrap();
        let after = now_millis();

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].peer, remote);
        assert_eq!(sent[0].protocol, PROTOCOL_ID);
        let msg = wire::decode_frame(&sent[0].line).unwrap();
        assert_eq!(msg.from, local);
        assert_eq!(msg.body, "hi");
        assert!(msg.when >= before && msg.when <= after);
    }

    #[tokio::test]
    async fn send_surfaces_dial_failure() {
        let local = Keypair::generate().peer_id();
        let remote = Keypair::generate().peer_id();
        let transport = Arc::new(MemoryTransport::failing("peer offline"));
        let messenger = DirectMessenger::new(local, transport);
        let err = messenger.send(remote, "hi").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Transport(_)));
    }

    #[tokio::test]
    async fn malformed_frame_does_not_stop_the_loop() {
        let sender = Keypair::generate().peer_id();
        let mut stream = MemoryStream::scripted();
        stream.push_line("this is not a frame\n");
        let good = Message::new(sender, "still here");
        stream.push_line(&wire::encode_frame(&good).unwrap());

        let (sink, seen) = collecting_sink();
        run_receive_loop(sender, Box::new(stream), sink).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], good);
    }

    #[tokio::test]
    async fn multiple_frames_on_one_stream_all_deliver() {
        let sender = Keypair::generate().peer_id();
        let mut stream = MemoryStream::scripted();
        let first = Message::new(sender, "one");
        let second = Message::new(sender, "two");
        stream.push_line(&wire::encode_frame(&first).unwrap());
        stream.push_line(&wire::encode_frame(&second).unwrap());

        let (sink, seen) = collecting_sink();
        run_receive_loop(sender, Box::new(stream), sink).await;

        assert_eq!(*seen.lock().unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn read_error_ends_the_loop_quietly() {
        let sender = Keypair::generate().peer_id();
        let mut stream = MemoryStream::scripted();
        let msg = Message::new(sender, "before the error");
        stream.push_line(&wire::encode_frame(&msg).unwrap());
        stream.push_read_error(std::io::ErrorKind::ConnectionReset);

        let (sink, seen) = collecting_sink();
        run_receive_loop(sender, Box::new(stream), sink).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
