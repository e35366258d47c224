//! Security Layer
//!
//! Payloads are sealed (encrypted for the recipient and signed by the
//! sender) before they are wrapped in an envelope, and unsealed only by the
//! process they are addressed to. The sealing engine sits behind the
//! [`Sealer`] trait so deployments can swap it; [`X25519Sealer`] is the
//! default.

pub mod identity;
pub mod x25519;

pub use identity::Identity;
pub use x25519::X25519Sealer;

use crate::error::SealError;
use crate::host::{HostInfo, KeyBytes, Uid, KEY_LEN};
use curve25519_dalek::montgomery::MontgomeryPoint;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Encrypt-and-sign / verify-and-decrypt capability
pub trait Sealer: Send + Sync {
    /// Seal `plaintext` so only the holder of the secret matching
    /// `recipient_key` can open it, signed with the local signing key.
    fn seal(
        &self,
        plaintext: &[u8],
        recipient_key: &KeyBytes,
        local: &LocalKeys,
    ) -> Result<Vec<u8>, SealError>;

    /// Verify `sealed` against the peer's verify key and decrypt it with the
    /// local secret. Tampering or a wrong key pair must fail, never return
    /// different plaintext.
    fn unseal(
        &self,
        sealed: &[u8],
        local: &LocalKeys,
        peer_verify_key: &KeyBytes,
    ) -> Result<Vec<u8>, SealError>;
}

/// Secret key material of the local process
pub struct LocalKeys {
    decrypt_secret: Zeroizing<KeyBytes>,
    signing: SigningKey,
}

impl LocalKeys {
    /// Fresh random key pair set
    pub fn generate() -> Self {
        let mut decrypt_secret = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut decrypt_secret[..]);

        Self {
            decrypt_secret,
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secrets(decrypt_secret: KeyBytes, signing_secret: KeyBytes) -> Self {
        Self {
            decrypt_secret: Zeroizing::new(decrypt_secret),
            signing: SigningKey::from_bytes(&signing_secret),
        }
    }

    /// X25519 public key matching the decrypt secret
    pub fn encrypt_key(&self) -> KeyBytes {
        MontgomeryPoint::mul_base_clamped(*self.decrypt_secret).to_bytes()
    }

    /// Ed25519 public key matching the signing key
    pub fn verify_key(&self) -> KeyBytes {
        self.signing.verifying_key().to_bytes()
    }

    pub fn decrypt_secret(&self) -> &KeyBytes {
        &self.decrypt_secret
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub(crate) fn signing_secret(&self) -> Zeroizing<KeyBytes> {
        Zeroizing::new(self.signing.to_bytes())
    }

    /// Public identity record for `uid` carrying these keys
    pub fn host_info(&self, uid: Uid) -> HostInfo {
        HostInfo::new(uid, self.encrypt_key(), self.verify_key())
    }
}

impl fmt::Debug for LocalKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeys")
            .field("encrypt_key", &hex::encode(self.encrypt_key()))
            .field("verify_key", &hex::encode(self.verify_key()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_keys_are_stable() {
        let keys = LocalKeys::generate();
        let copy = LocalKeys::from_secrets(*keys.decrypt_secret(), *keys.signing_secret());

        assert_eq!(keys.encrypt_key(), copy.encrypt_key());
        assert_eq!(keys.verify_key(), copy.verify_key());
        assert_ne!(keys.encrypt_key(), LocalKeys::generate().encrypt_key());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let keys = LocalKeys::generate();
        let text = format!("{keys:?}");
        assert!(!text.contains(&hex::encode(keys.decrypt_secret())));
        assert!(text.contains(&hex::encode(keys.encrypt_key())));
    }
}
