//! Loft wire protocol: message record, protocol tag, mailbox key prefix.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::identity::PeerId;

/// Protocol tag for direct-message streams. Distinguishes chat streams from
/// any other protocol carried on the same transport.
pub const PROTOCOL_ID: &str = "/loft/chat/1.0.0";

/// Key prefix for offline mailboxes in the key-value service. The full key
/// is this prefix followed by the recipient's peer ID text.
pub const MAILBOX_KEY_PREFIX: &str = "/loft/mailbox/";

/// One chat message. Immutable once constructed; `from` is the sender's peer
/// ID as claimed at the transport layer (authentication of that claim is the
/// transport's concern, not this record's).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: PeerId,
    /// Milliseconds since the Unix epoch, taken at construction.
    pub when: i64,
    pub body: String,
}

impl Message {
    pub fn new(from: PeerId, body: impl Into<String>) -> Self {
        Self {
            from,
            when: now_millis(),
            body: body.into(),
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Derive the mailbox key for a recipient.
pub fn mailbox_key(recipient: PeerId) -> String {
    format!("{MAILBOX_KEY_PREFIX}{recipient}")
}
