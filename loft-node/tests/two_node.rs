//! Integration: two nodes over real TCP.
//!
//! A shares an invite, B connects and sends a direct message; A's sink sees
//! exactly that message. A raw connection with a malformed frame checks the
//! receive loop keeps going. Mailbox store/fetch runs against the shared
//! filesystem backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use loft_core::identity::Keypair;
use loft_core::protocol::{now_millis, PROTOCOL_ID};
use loft_core::transport::Transport;
use loft_core::{
    encode_invite, run_receive_loop, wire, AddressBook, DirectMessenger, MailboxService, Message,
    MessageSink, PeerDirectory,
};
use loft_node::kv_fs::FsKvStore;
use loft_node::transport_tcp::{TcpTransport, HELLO_PREFIX};

struct Node {
    id: loft_core::PeerId,
    directory: Arc<PeerDirectory>,
    transport: Arc<TcpTransport>,
    inbox: mpsc::UnboundedReceiver<Message>,
}

async fn start_node() -> Node {
    let keypair = Keypair::generate();
    let id = keypair.peer_id();
    let directory = Arc::new(PeerDirectory::new());
    let transport = TcpTransport::bind(id, directory.clone(), "127.0.0.1:0")
        .await
        .unwrap();

    let (tx, inbox) = mpsc::unbounded_channel();
    let sink: MessageSink = Arc::new(move |m| {
        tx.send(m).ok();
    });
    let handler: loft_node::transport_tcp::InboundHandler = Arc::new(move |remote, stream| {
        tokio::spawn(run_receive_loop(remote, stream, sink.clone()));
    });
    transport.set_stream_handler(PROTOCOL_ID, handler);

    Node {
        id,
        directory,
        transport,
        inbox,
    }
}

async fn recv_one(inbox: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(5), inbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("sink channel closed")
}

#[tokio::test]
async fn connect_then_msg_delivers_exactly_one_message() {
    let mut a = start_node().await;
    let b = start_node().await;

    let invite = encode_invite(&a.transport.local_addrs()[0], a.id);
    let book = AddressBook::new(b.id, b.directory.clone(), b.transport.clone());
    let connected = book.connect(&invite).await.unwrap();
    assert_eq!(connected, a.id);
    assert_eq!(b.directory.addresses_of(a.id).len(), 1);

    let messenger = DirectMessenger::new(b.id, b.transport.clone() as Arc<dyn Transport>);
    let before = now_millis();
    messenger.send(a.id, "hi").await.unwrap();
    let after = now_millis();

    let msg = recv_one(&mut a.inbox).await;
    assert_eq!(msg.from, b.id);
    assert_eq!(msg.body, "hi");
    assert!(msg.when >= before && msg.when <= after);
    assert!(a.inbox.try_recv().is_err());

    // The connect handshake made B visible on A's side.
    assert!(a.transport.connected_peers().contains(&b.id));
}

#[tokio::test]
async fn malformed_frame_does_not_break_the_inbound_stream() {
    let mut a = start_node().await;
    let sender = Keypair::generate().peer_id();

    let mut raw = tokio::net::TcpStream::connect(a.transport.local_addrs()[0].clone())
        .await
        .unwrap();
    let good = Message::new(sender, "after the bad one");
    let payload = format!(
        "{HELLO_PREFIX} {PROTOCOL_ID} {sender}\nthis is not a frame\n{}",
        wire::encode_frame(&good).unwrap()
    );
    raw.write_all(payload.as_bytes()).await.unwrap();
    raw.shutdown().await.unwrap();

    let msg = recv_one(&mut a.inbox).await;
    assert_eq!(msg, good);
    assert!(a.inbox.try_recv().is_err());
}

#[tokio::test]
async fn two_sends_arrive_on_independent_streams() {
    let mut a = start_node().await;
    let b = start_node().await;

    let invite = encode_invite(&a.transport.local_addrs()[0], a.id);
    AddressBook::new(b.id, b.directory.clone(), b.transport.clone())
        .connect(&invite)
        .await
        .unwrap();

    let messenger = DirectMessenger::new(b.id, b.transport.clone() as Arc<dyn Transport>);
    messenger.send(a.id, "one").await.unwrap();
    messenger.send(a.id, "two").await.unwrap();

    // No cross-stream ordering guarantee; both must arrive.
    let mut bodies = vec![
        recv_one(&mut a.inbox).await.body,
        recv_one(&mut a.inbox).await.body,
    ];
    bodies.sort();
    assert_eq!(bodies, vec!["one".to_string(), "two".to_string()]);
}

#[tokio::test]
async fn offline_store_then_fetch_through_shared_backend() {
    let tmp = tempfile::TempDir::new().unwrap();
    let recipient = Keypair::generate().peer_id();
    let sender = Keypair::generate().peer_id();

    // Writer and reader each open their own view of the shared store, the
    // way two nodes share the external key-value service.
    let writer = MailboxService::new(Arc::new(FsKvStore::open(tmp.path(), 64 * 1024).unwrap()));
    let reader = MailboxService::new(Arc::new(FsKvStore::open(tmp.path(), 64 * 1024).unwrap()));

    writer.store(recipient, sender, "hello").await.unwrap();
    let messages = reader.fetch(recipient).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].from, sender);
    assert_eq!(messages[0].body, "hello");
}
