//! Offline mailbox: an append-only message log kept as one whole value in
//! the key-value collaborator.
//!
//! Store is a read-modify-write over plain get/put with no version token:
//! two stores racing on the same recipient between their get and put form a
//! lost-update window, and the later put overwrites the earlier append. The
//! blob itself stays well-formed either way; only one of the two entries may
//! survive. Accepted trade-off for a few-pending-messages workload on a
//! collaborator that offers no conditional write.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::identity::PeerId;
use crate::kv::{KvError, KvStore};
use crate::protocol::{mailbox_key, Message};

#[derive(Debug, Error)]
pub enum MailboxError {
    /// No store has ever written a mailbox for this peer. Callers treat this
    /// as an empty result, not a failure.
    #[error("no mailbox stored for {0}")]
    NotFound(PeerId),
    /// A blob exists but does not decode as a message sequence.
    #[error("corrupt mailbox for {peer}: {source}")]
    Corrupt {
        peer: PeerId,
        source: serde_json::Error,
    },
    /// The appended sequence exceeded the collaborator's value size ceiling.
    /// The mailbox is left as it was; nothing is truncated or dropped.
    #[error("mailbox full: attempted {attempted_size} bytes (limit {limit})")]
    Full { attempted_size: usize, limit: usize },
    #[error("key-value error: {0}")]
    Kv(KvError),
}

pub struct MailboxService {
    kv: Arc<dyn KvStore>,
}

impl MailboxService {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Append one message to `recipient`'s mailbox. Returns the number of
    /// messages now stored.
    pub async fn store(
        &self,
        recipient: PeerId,
        from: PeerId,
        body: &str,
    ) -> Result<usize, MailboxError> {
        let key = mailbox_key(recipient);
        let mut messages = match self.kv.get(&key).await.map_err(MailboxError::Kv)? {
            None => Vec::new(),
            Some(blob) => decode_mailbox(recipient, &blob)?,
        };
        messages.push(Message::new(from, body));
        let blob = serde_json::to_vec(&messages)
            .map_err(|e| MailboxError::Kv(KvError::Backend(e.to_string())))?;
        match self.kv.put(&key, blob).await {
            Ok(()) => {
                debug!(recipient = %recipient, count = messages.len(), "mailbox stored");
                Ok(messages.len())
            }
            Err(KvError::ValueTooLarge { size, limit }) => Err(MailboxError::Full {
                attempted_size: size,
                limit,
            }),
            Err(e) => Err(MailboxError::Kv(e)),
        }
    }

    /// Fetch `owner`'s mailbox in stored order.
    pub async fn fetch(&self, owner: PeerId) -> Result<Vec<Message>, MailboxError> {
        let key = mailbox_key(owner);
        match self.kv.get(&key).await.map_err(MailboxError::Kv)? {
            None => Err(MailboxError::NotFound(owner)),
            Some(blob) => decode_mailbox(owner, &blob),
        }
    }
}

fn decode_mailbox(peer: PeerId, blob: &[u8]) -> Result<Vec<Message>, MailboxError> {
    serde_json::from_slice(blob).map_err(|source| MailboxError::Corrupt { peer, source })
}
