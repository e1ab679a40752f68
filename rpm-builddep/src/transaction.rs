// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package reading context. */

use {
    crate::{
        error::{BuildDepError, Result},
        header::{PackageHeaders, RpmHeader},
        keyring::Keyring,
        signature::{verify_package, VerifyFlags},
    },
    log::debug,
    std::{io::BufReader, path::Path},
};

/// Holds what is needed to read and verify package files.
#[derive(Clone, Debug, Default)]
pub struct TransactionSet {
    keyring: Keyring,
    verify_flags: VerifyFlags,
}

impl TransactionSet {
    pub fn new(keyring: Keyring) -> Self {
        Self {
            keyring,
            verify_flags: VerifyFlags::default(),
        }
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    pub fn verify_flags(&self) -> VerifyFlags {
        self.verify_flags
    }

    /// Set the verification flags, returning the previous ones.
    pub fn set_verify_flags(&mut self, flags: VerifyFlags) -> VerifyFlags {
        std::mem::replace(&mut self.verify_flags, flags)
    }

    /// Read and verify the header of a package file.
    pub fn header_from_path(&self, path: impl AsRef<Path>) -> Result<RpmHeader> {
        let path = path.as_ref();
        let display_name = format!("{}", path.display());

        let fh = std::fs::File::open(path)
            .map_err(|e| BuildDepError::IoPath(display_name.clone(), e))?;
        let mut reader = BufReader::new(fh);

        let headers = PackageHeaders::read(&mut reader, &display_name)?;
        verify_package(
            &headers,
            &mut reader,
            &self.keyring,
            self.verify_flags,
            &display_name,
        )?;

        debug!("read header of {}", headers.header.nevr());

        Ok(headers.header)
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::testutil::*};

    #[test]
    fn verify_flags_swap() {
        let mut ts = TransactionSet::default();

        assert_eq!(
            ts.set_verify_flags(VerifyFlags::NOSIGNATURES),
            VerifyFlags::empty()
        );
        assert_eq!(ts.verify_flags(), VerifyFlags::NOSIGNATURES);
    }

    #[test]
    fn read_package() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = SourcePackageBuilder::new("hello", "2.10", "1")
            .requires(&["gcc", "make >= 4.0"])
            .write_to(td.path());

        let header = TransactionSet::default().header_from_path(&path)?;
        assert_eq!(header.name(), Some("hello"));
        assert!(header.is_source());
        assert_eq!(
            header
                .requires()?
                .iter()
                .map(|d| d.to_reldep_string())
                .collect::<Vec<_>>(),
            vec!["gcc", "make >= 4.0"]
        );

        Ok(())
    }

    #[test]
    fn missing_and_invalid_files() -> Result<()> {
        let td = tempfile::tempdir()?;
        let ts = TransactionSet::default();

        assert!(matches!(
            ts.header_from_path(td.path().join("missing.src.rpm")),
            Err(BuildDepError::IoPath(_, _))
        ));

        let path = td.path().join("text.src.rpm");
        std::fs::write(&path, "not an rpm")?;
        assert!(matches!(
            ts.header_from_path(&path),
            Err(BuildDepError::NotAnRpm(_))
        ));

        Ok(())
    }

    #[test]
    fn signature_checking() -> Result<()> {
        let td = tempfile::tempdir()?;
        let key = test_signing_key();
        let path = SourcePackageBuilder::new("signed", "1", "1")
            .sign_header(key)
            .write_to(td.path());

        let mut ts = TransactionSet::default();
        assert!(matches!(
            ts.header_from_path(&path),
            Err(BuildDepError::PublicKeyNotAvailable)
        ));

        ts.set_verify_flags(VerifyFlags::NOSIGNATURES);
        ts.header_from_path(&path)?;

        let mut keyring = Keyring::new();
        keyring.add_key(key.public.clone());
        TransactionSet::new(keyring).header_from_path(&path)?;

        Ok(())
    }
}
