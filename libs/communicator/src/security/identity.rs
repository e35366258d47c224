//! Local process identity and its on-disk form
//!
//! The identity file is TOML with hex-encoded secrets:
//!
//! ```toml
//! uid = "6f0c1d7e-..."
//! decrypt_secret = "..."
//! signing_secret = "..."
//! ```

use super::LocalKeys;
use crate::host::{HostInfo, KeyBytes, Uid, KEY_LEN};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;
use zeroize::Zeroizing;

/// UID plus the secret keys of the local process
#[derive(Debug)]
pub struct Identity {
    uid: Uid,
    keys: LocalKeys,
}

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    uid: Uid,
    decrypt_secret: String,
    signing_secret: String,
}

impl Identity {
    pub fn new(uid: Uid, keys: LocalKeys) -> Self {
        Self { uid, keys }
    }

    /// Fresh UID and keys
    pub fn generate() -> Self {
        Self::new(Uid::generate(), LocalKeys::generate())
    }

    /// Load the identity stored at `path`, or create and store a new one
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let identity = Self::generate();
        identity.save(path)?;
        info!("Generated new process identity {} at {:?}", identity.uid, path);
        Ok(identity)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read identity file {:?}", path))?;
        let file: IdentityFile = toml::from_str(&text)
            .with_context(|| format!("Failed to parse identity file {:?}", path))?;

        if file.uid.is_nil() {
            bail!("Identity file {:?} holds the nil UID", path);
        }

        let decrypt_secret = decode_key(&file.decrypt_secret).context("decrypt_secret")?;
        let signing_secret = decode_key(&file.signing_secret).context("signing_secret")?;

        Ok(Self::new(
            file.uid,
            LocalKeys::from_secrets(*decrypt_secret, *signing_secret),
        ))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = IdentityFile {
            uid: self.uid,
            decrypt_secret: hex::encode(self.keys.decrypt_secret()),
            signing_secret: hex::encode(*self.keys.signing_secret()),
        };
        let text = Zeroizing::new(toml::to_string(&file).context("Failed to encode identity")?);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        fs::write(path, text.as_bytes())
            .with_context(|| format!("Failed to write identity file {:?}", path))
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn keys(&self) -> &LocalKeys {
        &self.keys
    }

    pub fn host_info(&self) -> HostInfo {
        self.keys.host_info(self.uid)
    }

    pub(crate) fn into_parts(self) -> (Uid, LocalKeys) {
        (self.uid, self.keys)
    }
}

fn decode_key(text: &str) -> Result<Zeroizing<KeyBytes>> {
    let bytes = Zeroizing::new(hex::decode(text.trim()).context("key is not valid hex")?);
    if bytes.len() != KEY_LEN {
        bail!("key has {} bytes, expected {}", bytes.len(), KEY_LEN);
    }
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_or_generate_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node").join("identity.toml");

        let first = Identity::load_or_generate(&path).unwrap();
        assert!(path.exists());
        let second = Identity::load_or_generate(&path).unwrap();

        assert_eq!(first.uid(), second.uid());
        assert_eq!(first.keys().encrypt_key(), second.keys().encrypt_key());
        assert_eq!(first.keys().verify_key(), second.keys().verify_key());
    }

    #[test]
    fn test_rejects_short_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.toml");
        fs::write(
            &path,
            format!(
                "uid = \"{}\"\ndecrypt_secret = \"abcd\"\nsigning_secret = \"abcd\"\n",
                Uid::generate()
            ),
        )
        .unwrap();

        let err = Identity::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("decrypt_secret"));
    }

    #[test]
    fn test_host_info_matches_keys() {
        let identity = Identity::generate();
        let host = identity.host_info();
        assert_eq!(host.uid(), identity.uid());
        assert_eq!(host.encrypt_key(), &identity.keys().encrypt_key());
        assert_eq!(host.verify_key(), &identity.keys().verify_key());
    }
}
