//! Loft messaging protocol reference implementation.
//! Collaborator-driven: the distributed key-value store and the secure
//! transport are opaque seams; hosts supply concrete backends.

pub mod directory;
pub mod identity;
pub mod invite;
pub mod kv;
pub mod mailbox;
pub mod messenger;
pub mod protocol;
pub mod transport;
pub mod wire;

pub use directory::{AddressEntry, AddressValidity, PeerDirectory};
pub use identity::{load_or_create, IdentityError, Keypair, PeerId};
pub use invite::{encode_invite, encode_invites, parse_invite, AddressBook, AddressError};
pub use kv::{KvError, KvStore, MemoryKv};
pub use mailbox::{MailboxError, MailboxService};
pub use messenger::{run_receive_loop, DirectMessenger, MessageSink, ProtocolError};
pub use protocol::{mailbox_key, Message, MAILBOX_KEY_PREFIX, PROTOCOL_ID};
pub use transport::{MessageStream, Transport, TransportError};
pub use wire::{decode_frame, encode_frame, FrameError};
