//! Peer directory: peer ID to known addresses, shared between command
//! handling and inbound stream dispatch under one coarse lock.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::identity::PeerId;

/// Whether an address survives freshness-based eviction. Addresses learned
/// from an invite are permanent; addresses observed on inbound connections
/// are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressValidity {
    Permanent,
    Transient,
}

#[derive(Debug, Clone)]
pub struct AddressEntry {
    pub addr: String,
    pub validity: AddressValidity,
}

#[derive(Default)]
pub struct PeerDirectory {
    peers: Mutex<HashMap<PeerId, Vec<AddressEntry>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an address for a peer. Addresses accumulate; an existing entry
    /// is never replaced, though a transient entry is upgraded in place when
    /// the same address arrives as permanent. Returns true if the address
    /// was newly added.
    pub fn add_address(&self, peer: PeerId, addr: &str, validity: AddressValidity) -> bool {
        let mut peers = self.peers.lock().unwrap();
        let entries = peers.entry(peer).or_default();
        if let Some(entry) = entries.iter_mut().find(|e| e.addr == addr) {
            if validity == AddressValidity::Permanent {
                entry.validity = AddressValidity::Permanent;
            }
            return false;
        }
        entries.push(AddressEntry {
            addr: addr.to_string(),
            validity,
        });
        true
    }

    /// Known addresses for a peer, permanent entries first.
    pub fn addresses_of(&self, peer: PeerId) -> Vec<AddressEntry> {
        let peers = self.peers.lock().unwrap();
        let mut entries = peers.get(&peer).cloned().unwrap_or_default();
        entries.sort_by_key(|e| e.validity == AddressValidity::Transient);
        entries
    }

    /// Snapshot of every known peer and its addresses.
    pub fn peers(&self) -> Vec<(PeerId, Vec<AddressEntry>)> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, entries)| (*id, entries.clone()))
            .collect()
    }

    /// Drop transient entries. Permanent entries are exempt from any
    /// freshness policy.
    pub fn prune_transient(&self) {
        let mut peers = self.peers.lock().unwrap();
        for entries in peers.values_mut() {
            entries.retain(|e| e.validity == AddressValidity::Permanent);
        }
        peers.retain(|_, entries| !entries.is_empty());
    }
}
