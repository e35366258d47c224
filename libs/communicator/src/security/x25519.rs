//! Default sealing engine
//!
//! Ephemeral X25519 agreement with the recipient's encrypt key, HKDF-SHA256
//! key derivation and ChaCha20-Poly1305 encryption, with an Ed25519
//! signature by the sender over the whole blob.
//!
//! Layout: `eph_pub[32] | nonce[12] | ciphertext | signature[64]`.
//! The signature covers `eph_pub | nonce | ciphertext | recipient_key`.

use super::{LocalKeys, Sealer};
use crate::error::SealError;
use crate::host::{KeyBytes, KEY_LEN};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use curve25519_dalek::montgomery::MontgomeryPoint;
use ed25519_dalek::{Signature, Signer, VerifyingKey, SIGNATURE_LENGTH};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KDF_INFO: &[u8] = b"communicator-seal-v1";

/// X25519 + ChaCha20-Poly1305 + Ed25519 sealer
#[derive(Debug, Clone, Copy, Default)]
pub struct X25519Sealer;

impl X25519Sealer {
    pub fn new() -> Self {
        Self
    }

    fn derive_cipher(
        shared: &MontgomeryPoint,
        eph_pub: &KeyBytes,
        recipient_key: &KeyBytes,
    ) -> Result<ChaCha20Poly1305, SealError> {
        let shared = Zeroizing::new(shared.to_bytes());
        // Low-order recipient keys collapse the shared secret to zero
        if shared.iter().all(|b| *b == 0) {
            return Err(SealError::InvalidKey);
        }

        let mut salt = [0u8; 2 * KEY_LEN];
        salt[..KEY_LEN].copy_from_slice(eph_pub);
        salt[KEY_LEN..].copy_from_slice(recipient_key);

        let mut okm = Zeroizing::new([0u8; 32]);
        Hkdf::<Sha256>::new(Some(&salt), &shared[..])
            .expand(KDF_INFO, &mut okm[..])
            .map_err(|_| SealError::InvalidKey)?;

        Ok(ChaCha20Poly1305::new(Key::from_slice(&okm[..])))
    }

    fn signed_region(body: &[u8], recipient_key: &KeyBytes) -> Vec<u8> {
        let mut region = Vec::with_capacity(body.len() + KEY_LEN);
        region.extend_from_slice(body);
        region.extend_from_slice(recipient_key);
        region
    }
}

impl Sealer for X25519Sealer {
    fn seal(
        &self,
        plaintext: &[u8],
        recipient_key: &KeyBytes,
        local: &LocalKeys,
    ) -> Result<Vec<u8>, SealError> {
        if recipient_key.iter().all(|b| *b == 0) {
            return Err(SealError::MissingKey);
        }

        let mut eph_secret = Zeroizing::new([0u8; KEY_LEN]);
        rand::thread_rng().fill_bytes(&mut eph_secret[..]);
        let eph_pub = MontgomeryPoint::mul_base_clamped(*eph_secret).to_bytes();
        let shared = MontgomeryPoint(*recipient_key).mul_clamped(*eph_secret);
        let cipher = Self::derive_cipher(&shared, &eph_pub, recipient_key)?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SealError::InvalidKey)?;

        let mut sealed =
            Vec::with_capacity(KEY_LEN + NONCE_LEN + ciphertext.len() + SIGNATURE_LENGTH);
        sealed.extend_from_slice(&eph_pub);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        let signature = local
            .signing_key()
            .sign(&Self::signed_region(&sealed, recipient_key));
        sealed.extend_from_slice(&signature.to_bytes());

        Ok(sealed)
    }

    fn unseal(
        &self,
        sealed: &[u8],
        local: &LocalKeys,
        peer_verify_key: &KeyBytes,
    ) -> Result<Vec<u8>, SealError> {
        if sealed.len() < KEY_LEN + NONCE_LEN + TAG_LEN + SIGNATURE_LENGTH {
            return Err(SealError::Malformed);
        }
        if peer_verify_key.iter().all(|b| *b == 0) {
            return Err(SealError::MissingKey);
        }

        let (body, signature_bytes) = sealed.split_at(sealed.len() - SIGNATURE_LENGTH);
        let verifying_key =
            VerifyingKey::from_bytes(peer_verify_key).map_err(|_| SealError::InvalidKey)?;
        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature.copy_from_slice(signature_bytes);
        let recipient_key = local.encrypt_key();
        verifying_key
            .verify_strict(
                &Self::signed_region(body, &recipient_key),
                &Signature::from_bytes(&signature),
            )
            .map_err(|_| SealError::AuthenticationFailed)?;

        let (eph_pub_bytes, rest) = body.split_at(KEY_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let mut eph_pub = [0u8; KEY_LEN];
        eph_pub.copy_from_slice(eph_pub_bytes);

        let shared = MontgomeryPoint(eph_pub).mul_clamped(*local.decrypt_secret());
        let cipher = Self::derive_cipher(&shared, &eph_pub, &recipient_key)?;

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_roundtrip() {
        let sender = LocalKeys::generate();
        let recipient = LocalKeys::generate();
        let sealer = X25519Sealer::new();

        let sealed = sealer
            .seal(b"step 42 results", &recipient.encrypt_key(), &sender)
            .unwrap();
        let opened = sealer
            .unseal(&sealed, &recipient, &sender.verify_key())
            .unwrap();

        assert_eq!(opened, b"step 42 results");
        assert!(!sealed.windows(7).any(|w| w == b"step 42"));
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let sender = LocalKeys::generate();
        let recipient = LocalKeys::generate();
        let eavesdropper = LocalKeys::generate();
        let sealer = X25519Sealer::new();

        let sealed = sealer
            .seal(b"secret", &recipient.encrypt_key(), &sender)
            .unwrap();

        assert_eq!(
            sealer.unseal(&sealed, &eavesdropper, &sender.verify_key()),
            Err(SealError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_wrong_verify_key_fails() {
        let sender = LocalKeys::generate();
        let impostor = LocalKeys::generate();
        let recipient = LocalKeys::generate();
        let sealer = X25519Sealer::new();

        let sealed = sealer
            .seal(b"secret", &recipient.encrypt_key(), &sender)
            .unwrap();

        assert_eq!(
            sealer.unseal(&sealed, &recipient, &impostor.verify_key()),
            Err(SealError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sender = LocalKeys::generate();
        let recipient = LocalKeys::generate();
        let sealer = X25519Sealer::new();

        let mut sealed = sealer
            .seal(b"secret", &recipient.encrypt_key(), &sender)
            .unwrap();
        sealed[KEY_LEN + NONCE_LEN] ^= 0x01;

        assert_eq!(
            sealer.unseal(&sealed, &recipient, &sender.verify_key()),
            Err(SealError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_malformed_and_missing_keys() {
        let keys = LocalKeys::generate();
        let sealer = X25519Sealer::new();

        assert_eq!(
            sealer.unseal(&[0u8; 10], &keys, &keys.verify_key()),
            Err(SealError::Malformed)
        );
        assert_eq!(
            sealer.seal(b"x", &[0u8; KEY_LEN], &keys),
            Err(SealError::MissingKey)
        );
    }
}
