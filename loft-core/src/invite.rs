//! Invites: shareable `<address>/p2p/<peer-id>` strings, and the connect
//! flow that learns an address then dials it.

use std::sync::Arc;

use thiserror::Error;

use crate::directory::{AddressValidity, PeerDirectory};
use crate::identity::{InvalidPeerId, PeerId};
use crate::transport::{Transport, TransportError};

/// Separates the network address from the peer ID suffix in an invite.
pub const PEER_ID_DELIMITER: &str = "/p2p/";

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invite has no {PEER_ID_DELIMITER} section: {0:?}")]
    MissingPeerId(String),
    #[error("invite has an empty address part: {0:?}")]
    EmptyAddress(String),
    #[error(transparent)]
    PeerId(#[from] InvalidPeerId),
    #[error("connect failed: {0}")]
    Connect(#[from] TransportError),
}

/// Encode one invite line for a single reachable address.
pub fn encode_invite(addr: &str, id: PeerId) -> String {
    format!("{addr}{PEER_ID_DELIMITER}{id}")
}

/// One invite line per known local address; the caller chooses which to
/// share.
pub fn encode_invites(addrs: &[String], id: PeerId) -> Vec<String> {
    addrs.iter().map(|a| encode_invite(a, id)).collect()
}

/// Split an invite back into its network address and peer ID.
pub fn parse_invite(invite: &str) -> Result<(String, PeerId), AddressError> {
    let invite = invite.trim();
    let (addr, id_text) = invite
        .rsplit_once(PEER_ID_DELIMITER)
        .ok_or_else(|| AddressError::MissingPeerId(invite.to_string()))?;
    if addr.is_empty() {
        return Err(AddressError::EmptyAddress(invite.to_string()));
    }
    let id = id_text.parse()?;
    Ok((addr.to_string(), id))
}

/// Invite handling bound to this host's identity, directory, and transport.
pub struct AddressBook {
    local_id: PeerId,
    directory: Arc<PeerDirectory>,
    transport: Arc<dyn Transport>,
}

impl AddressBook {
    pub fn new(
        local_id: PeerId,
        directory: Arc<PeerDirectory>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            local_id,
            directory,
            transport,
        }
    }

    /// Invite lines for every address the transport is reachable on.
    pub fn invites(&self) -> Vec<String> {
        encode_invites(&self.transport.local_addrs(), self.local_id)
    }

    /// Parse an invite, register its address as permanent, then dial. The
    /// registration is not rolled back when the dial fails: a peer that is
    /// unreachable now may be reachable later at the same address.
    pub async fn connect(&self, invite: &str) -> Result<PeerId, AddressError> {
        let (addr, peer) = parse_invite(invite)?;
        self.directory
            .add_address(peer, &addr, AddressValidity::Permanent);
        self.transport.connect(peer, &addr).await?;
        Ok(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;
    use crate::transport::MemoryTransport;

    #[test]
    fn invite_roundtrip() {
        let id = Keypair::generate().peer_id();
        let invite = encode_invite("127.0.0.1:4001", id);
        let (addr, parsed) = parse_invite(&invite).unwrap();
        assert_eq!(addr, "127.0.0.1:4001");
        assert_eq!(parsed, id);
    }

    #[test]
    fn one_invite_line_per_address() {
        let id = Keypair::generate().peer_id();
        let addrs = vec!["127.0.0.1:4001".to_string(), "10.0.0.5:4001".to_string()];
        let invites = encode_invites(&addrs, id);
        assert_eq!(invites.len(), 2);
        for (invite, addr) in invites.iter().zip(&addrs) {
            assert_eq!(parse_invite(invite).unwrap(), (addr.clone(), id));
        }
    }

    #[test]
    fn parse_rejects_malformed_invites() {
        assert!(matches!(
            parse_invite("127.0.0.1:4001"),
            Err(AddressError::MissingPeerId(_))
        ));
        assert!(matches!(
            parse_invite("/p2p/00112233445566778899aabbccddeeff"),
            Err(AddressError::EmptyAddress(_))
        ));
        assert!(matches!(
            parse_invite("127.0.0.1:4001/p2p/nothex"),
            Err(AddressError::PeerId(_))
        ));
    }

    #[tokio::test]
    async fn connect_registers_address_and_dials() {
        let local = Keypair::generate().peer_id();
        let remote = Keypair::generate().peer_id();
        let directory = Arc::new(PeerDirectory::new());
        let transport = Arc::new(MemoryTransport::new(vec!["127.0.0.1:4001".into()]));
        let book = AddressBook::new(local, directory.clone(), transport.clone());

        let invite = encode_invite("10.0.0.5:4001", remote);
        let peer = book.connect(&invite).await.unwrap();
        assert_eq!(peer, remote);
        assert_eq!(directory.addresses_of(remote).len(), 1);
        assert_eq!(transport.connected_peers(), vec![remote]);
    }

    #[tokio::test]
    async fn failed_dial_keeps_the_learned_address() {
        let local = Keypair::generate().peer_id();
        let remote = Keypair::generate().peer_id();
        let directory = Arc::new(PeerDirectory::new());
        let transport = Arc::new(MemoryTransport::failing("peer unreachable"));
        let book = AddressBook::new(local, directory.clone(), transport);

        let invite = encode_invite("10.0.0.5:4001", remote);
        let err = book.connect(&invite).await.unwrap_err();
        assert!(matches!(err, AddressError::Connect(_)));
        // Address registration survives the failed dial.
        assert_eq!(directory.addresses_of(remote).len(), 1);
        assert_eq!(
            directory.addresses_of(remote)[0].validity,
            AddressValidity::Permanent
        );
    }
}
