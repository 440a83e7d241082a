//! Peer identity: ed25519 keypair, derived peer ID, on-disk identity record.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Peer ID: deterministic hash of the public key. Used in invites, mailbox
/// keys, and the wire `from` field. Rendered as 32 lowercase hex chars.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PeerId(#[serde(with = "hex_16")] [u8; 16]);

mod hex_16 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let s: String = Deserialize::deserialize(d)?;
        let buf = hex::decode(&s).map_err(serde::de::Error::custom)?;
        buf.try_into()
            .map_err(|_| serde::de::Error::custom("expected 16 bytes of hex"))
    }
}

impl PeerId {
    /// Derive a peer ID from a public key (same derivation as `Keypair`).
    pub fn from_public_key(public: &VerifyingKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(public.as_bytes());
        let digest = hasher.finalize();
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        PeerId(id)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A string that does not parse as a peer ID (wrong length or not hex).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid peer id: {0:?}")]
pub struct InvalidPeerId(pub String);

impl FromStr for PeerId {
    type Err = InvalidPeerId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let buf = hex::decode(s).map_err(|_| InvalidPeerId(s.to_string()))?;
        let id: [u8; 16] = buf.try_into().map_err(|_| InvalidPeerId(s.to_string()))?;
        Ok(PeerId(id))
    }
}

/// Long-term ed25519 identity. Keep the signing key private; expose only the
/// verifying key and the derived peer ID.
pub struct Keypair {
    signing: SigningKey,
    peer_id: PeerId,
}

impl Keypair {
    /// Generate a fresh random keypair and derive its peer ID.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let peer_id = PeerId::from_public_key(&signing.verifying_key());
        Self { signing, peer_id }
    }

    /// Rebuild a keypair from a stored 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(&seed);
        let peer_id = PeerId::from_public_key(&signing.verifying_key());
        Self { signing, peer_id }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// The persisted identity record: the raw 32-byte seed.
    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity record is not a valid key: {len} bytes, expected 32")]
    KeyFormat { len: usize },
}

/// Load the identity record at `path`, or generate one and persist it with
/// owner-only permissions. Called once at startup; failure is fatal to the
/// host since no peer ID means no addressable node.
pub fn load_or_create(path: &Path) -> Result<Keypair, IdentityError> {
    if path.exists() {
        let bytes = fs::read(path)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| IdentityError::KeyFormat { len: bytes.len() })?;
        return Ok(Keypair::from_seed(seed));
    }
    let keypair = Keypair::generate();
    write_owner_only(path, &keypair.seed())?;
    Ok(keypair)
}

#[cfg(unix)]
fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    f.write_all(bytes)
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}
