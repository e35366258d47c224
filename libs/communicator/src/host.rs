//! Process Identity
//!
//! Every process in the cluster is identified by a 128-bit [`Uid`] and
//! advertises the public halves of its keys in a [`HostInfo`] record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Length of every public or secret key carried by a host
pub const KEY_LEN: usize = 32;

/// Raw 32-byte key material
pub type KeyBytes = [u8; KEY_LEN];

/// 128-bit process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(Uuid);

impl Uid {
    /// The nil UID, meaning "unknown host"
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Generate a fresh random UID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for Uid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::str::FromStr for Uid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Public identity of a process: its UID plus the keys peers need to
/// seal payloads for it and verify payloads from it.
///
/// Immutable once created. Equality and hashing look at the UID only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    uid: Uid,
    encrypt_key: KeyBytes,
    verify_key: KeyBytes,
}

impl HostInfo {
    pub fn new(uid: Uid, encrypt_key: KeyBytes, verify_key: KeyBytes) -> Self {
        Self {
            uid,
            encrypt_key,
            verify_key,
        }
    }

    /// The "unknown host" record
    pub fn null() -> Self {
        Self {
            uid: Uid::nil(),
            encrypt_key: [0u8; KEY_LEN],
            verify_key: [0u8; KEY_LEN],
        }
    }

    pub fn is_null(&self) -> bool {
        self.uid.is_nil()
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// X25519 public key used to seal payloads addressed to this host
    pub fn encrypt_key(&self) -> &KeyBytes {
        &self.encrypt_key
    }

    /// Ed25519 public key used to verify payloads sent by this host
    pub fn verify_key(&self) -> &KeyBytes {
        &self.verify_key
    }
}

impl PartialEq for HostInfo {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for HostInfo {}

impl Hash for HostInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}
