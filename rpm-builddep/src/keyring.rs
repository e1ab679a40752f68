// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Trusted PGP public keys for package signature verification. */

use {
    crate::error::{BuildDepError, Result},
    log::{debug, warn},
    pgp::{
        types::{KeyId, KeyTrait},
        Deserializable, SignedPublicKey, SignedPublicSubKey,
    },
    std::{io::Cursor, path::Path},
};

/// Default directory holding distribution signing keys.
pub const DEFAULT_KEYRING_DIR: &str = "/etc/pki/rpm-gpg";

/// Render a PGP key ID as lowercase hex.
pub fn key_id_hex(key_id: &KeyId) -> String {
    hex::encode(key_id.as_ref())
}

/// A key able to verify a signature.
pub enum VerificationKey<'a> {
    Primary(&'a SignedPublicKey),
    Subkey(&'a SignedPublicSubKey),
}

/// A collection of trusted public keys.
#[derive(Clone, Debug, Default)]
pub struct Keyring {
    keys: Vec<SignedPublicKey>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a file name looks like it holds an armored public key.
    fn is_key_file(name: &str) -> bool {
        name.ends_with(".asc") || name.starts_with("RPM-GPG-KEY")
    }

    pub fn add_key(&mut self, key: SignedPublicKey) {
        debug!("trusting PGP key {}", key_id_hex(&key.key_id()));
        self.keys.push(key);
    }

    /// Add all keys from ASCII armored data.
    ///
    /// Returns the number of keys added.
    pub fn add_armored(&mut self, data: &[u8]) -> Result<usize> {
        let (keys, _) = SignedPublicKey::from_armor_many(Cursor::new(data))?;

        let mut count = 0;
        for key in keys {
            self.add_key(key?);
            count += 1;
        }

        Ok(count)
    }

    /// Add keys from every key file in a directory.
    ///
    /// A missing directory is not an error. Files that fail to parse are skipped
    /// with a warning.
    pub fn load_dir(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();

        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("keyring directory {} does not exist", path.display());
                return Ok(0);
            }
            Err(e) => return Err(BuildDepError::IoPath(format!("{}", path.display()), e)),
        };

        let mut paths = entries
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| BuildDepError::IoPath(format!("{}", path.display()), e))?;
        paths.sort();

        let mut count = 0;
        for key_path in paths {
            let is_key = key_path
                .file_name()
                .and_then(|name| name.to_str())
                .map(Self::is_key_file)
                .unwrap_or(false);
            if !is_key || !key_path.is_file() {
                continue;
            }

            let data = std::fs::read(&key_path)
                .map_err(|e| BuildDepError::IoPath(format!("{}", key_path.display()), e))?;

            match self.add_armored(&data) {
                Ok(added) => count += added,
                Err(e) => warn!("ignoring unparsable key file {}: {}", key_path.display(), e),
            }
        }

        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Find the key or subkey having the given key ID.
    pub fn find(&self, key_id: &KeyId) -> Option<VerificationKey<'_>> {
        for key in &self.keys {
            if &key.key_id() == key_id {
                return Some(VerificationKey::Primary(key));
            }

            if let Some(subkey) = key
                .public_subkeys
                .iter()
                .find(|subkey| &subkey.key_id() == key_id)
            {
                return Some(VerificationKey::Subkey(subkey));
            }
        }

        None
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::testutil::*};

    #[test]
    fn load_directory() -> Result<()> {
        let td = tempfile::tempdir()?;
        let key = test_signing_key();

        std::fs::write(
            td.path().join("RPM-GPG-KEY-test"),
            key.public.to_armored_string(None)?,
        )?;
        std::fs::write(td.path().join("README"), "not a key")?;
        std::fs::write(td.path().join("broken.asc"), "garbage")?;

        let mut keyring = Keyring::new();
        assert_eq!(keyring.load_dir(td.path())?, 1);
        assert_eq!(keyring.len(), 1);
        assert!(keyring.find(&key.public.key_id()).is_some());

        Ok(())
    }

    #[test]
    fn missing_directory() -> Result<()> {
        let td = tempfile::tempdir()?;

        let mut keyring = Keyring::new();
        assert_eq!(keyring.load_dir(td.path().join("missing"))?, 0);
        assert!(keyring.is_empty());

        Ok(())
    }

    #[test]
    fn find_unknown() {
        let keyring = Keyring::new();
        assert!(keyring.find(&test_signing_key().public.key_id()).is_none());
    }
}
