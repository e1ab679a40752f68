// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Verification of the RPM signature header.

The signature header carries two kinds of integrity data:

* Digests of the main header (`SHA256HEADER`, `SHA1HEADER`). These are always
  checked unless [VerifyFlags::NODIGESTS] is set.
* PGP signatures. `RSAHEADER` and `DSAHEADER` sign the main header only. The
  legacy `PGP` and `GPG` tags sign the main header plus the payload and are
  only consulted when no header-only signature exists. Signatures are skipped
  when [VerifyFlags::NOSIGNATURES] is set.

A signature made by a key not present in the [Keyring] yields
[BuildDepError::PublicKeyNotAvailable]. Unsigned packages pass.
*/

use {
    crate::{
        diagnostics::{self, Level},
        error::{BuildDepError, Result},
        header::{
            PackageHeaders, RPMSIGTAG_DSA, RPMSIGTAG_GPG, RPMSIGTAG_PGP, RPMSIGTAG_RSA,
            RPMSIGTAG_SHA1, RPMSIGTAG_SHA256,
        },
        keyring::{key_id_hex, Keyring, VerificationKey},
    },
    bitflags::bitflags,
    digest::Digest,
    pgp::{
        packet::{Packet, PacketParser},
        Signature,
    },
    std::io::{Cursor, Read},
};

bitflags! {
    /// Controls which verification steps run when reading a package.
    pub struct VerifyFlags: u32 {
        const NODIGESTS = 1 << 0;
        const NOSIGNATURES = 1 << 1;
    }
}

impl Default for VerifyFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parse the first signature packet from binary PGP data.
fn parse_signature(data: &[u8]) -> Result<Signature> {
    for packet in PacketParser::new(Cursor::new(data)) {
        if let Packet::Signature(signature) = packet? {
            return Ok(signature);
        }
    }

    Err(BuildDepError::HeaderMalformed(
        "signature tag does not contain a PGP signature packet".to_string(),
    ))
}

fn describe(signature: &Signature) -> String {
    format!(
        "{:?}/{:?} Signature, key ID {}",
        signature.config.pub_alg,
        signature.config.hash_alg,
        signature
            .issuer()
            .map(key_id_hex)
            .unwrap_or_else(|| "(none)".to_string())
    )
}

fn check_digest<D: Digest>(
    name: &'static str,
    expected: Option<&str>,
    data: &[u8],
    display_name: &str,
) -> Result<()> {
    if let Some(expected) = expected {
        let got = hex::encode(D::digest(data));

        if !got.eq_ignore_ascii_case(expected.trim()) {
            diagnostics::emit(
                Level::Error,
                format!("{}: Header {} digest: BAD", display_name, name),
            );
            return Err(BuildDepError::HeaderDigestMismatch(
                name,
                expected.to_string(),
                got,
            ));
        }

        diagnostics::emit(
            Level::Debug,
            format!("{}: Header {} digest: OK", display_name, name),
        );
    }

    Ok(())
}

fn check_signature(
    tag_name: &'static str,
    signature_data: &[u8],
    signed_data: &[u8],
    keyring: &Keyring,
    display_name: &str,
) -> Result<()> {
    let signature = parse_signature(signature_data)?;
    let description = format!("{}: {} {}", display_name, tag_name, describe(&signature));

    let key = match signature.issuer().and_then(|issuer| keyring.find(issuer)) {
        Some(key) => key,
        None => {
            diagnostics::emit(Level::Warning, format!("{}: NOKEY", description));
            return Err(BuildDepError::PublicKeyNotAvailable);
        }
    };

    let res = match key {
        VerificationKey::Primary(key) => signature.verify(key, signed_data),
        VerificationKey::Subkey(key) => signature.verify(key, signed_data),
    };

    match res {
        Ok(()) => {
            diagnostics::emit(Level::Debug, format!("{}: OK", description));
            Ok(())
        }
        Err(e) => {
            diagnostics::emit(Level::Error, format!("{}: BAD ({:?})", description, e));
            Err(BuildDepError::SignatureBad(
                tag_name,
                signature
                    .issuer()
                    .map(key_id_hex)
                    .unwrap_or_else(|| "(none)".to_string()),
            ))
        }
    }
}

/// Verify the signature header of a package.
///
/// `payload` is the remainder of the package file after the main header. It is
/// only read if a legacy header+payload signature needs checking.
pub fn verify_package(
    headers: &PackageHeaders,
    payload: &mut impl Read,
    keyring: &Keyring,
    flags: VerifyFlags,
    display_name: &str,
) -> Result<()> {
    let signature = &headers.signature;
    let header_data = headers.header.header().raw();

    if !flags.contains(VerifyFlags::NODIGESTS) {
        check_digest::<sha2::Sha256>(
            "SHA256",
            signature.string(RPMSIGTAG_SHA256),
            header_data,
            display_name,
        )?;
        check_digest::<sha1::Sha1>(
            "SHA1",
            signature.string(RPMSIGTAG_SHA1),
            header_data,
            display_name,
        )?;
    }

    if flags.contains(VerifyFlags::NOSIGNATURES) {
        return Ok(());
    }

    let header_signatures = [(RPMSIGTAG_RSA, "RSA"), (RPMSIGTAG_DSA, "DSA")]
        .into_iter()
        .filter_map(|(tag, name)| signature.binary(tag).map(|data| (name, data)))
        .collect::<Vec<_>>();

    if !header_signatures.is_empty() {
        for (name, data) in header_signatures {
            check_signature(name, data, header_data, keyring, display_name)?;
        }

        return Ok(());
    }

    let legacy_signatures = [(RPMSIGTAG_PGP, "PGP"), (RPMSIGTAG_GPG, "GPG")]
        .into_iter()
        .filter_map(|(tag, name)| signature.binary(tag).map(|data| (name, data)))
        .collect::<Vec<_>>();

    if legacy_signatures.is_empty() {
        diagnostics::emit(
            Level::Debug,
            format!("{}: package is not signed", display_name),
        );
        return Ok(());
    }

    let mut signed_data = header_data.to_vec();
    payload
        .read_to_end(&mut signed_data)
        .map_err(|e| BuildDepError::IoPath(display_name.to_string(), e))?;

    for (name, data) in legacy_signatures {
        check_signature(name, data, &signed_data, keyring, display_name)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use {super::*, crate::testutil::*};

    fn read(package: &[u8]) -> Result<(PackageHeaders, Cursor<Vec<u8>>)> {
        let mut cursor = Cursor::new(package.to_vec());
        let headers = PackageHeaders::read(&mut cursor, "test.src.rpm")?;
        Ok((headers, cursor))
    }

    fn keyring_with(key: &TestKey) -> Keyring {
        let mut keyring = Keyring::new();
        keyring.add_key(key.public.clone());
        keyring
    }

    #[test]
    fn unsigned_passes() -> Result<()> {
        let (headers, mut payload) = read(&SourcePackageBuilder::new("a", "1", "1").build())?;

        verify_package(
            &headers,
            &mut payload,
            &Keyring::new(),
            VerifyFlags::empty(),
            "a",
        )
    }

    #[test]
    fn digest_mismatch() -> Result<()> {
        let package = SourcePackageBuilder::new("a", "1", "1")
            .sha256_override("00")
            .build();
        let (headers, mut payload) = read(&package)?;

        let res = verify_package(
            &headers,
            &mut payload,
            &Keyring::new(),
            VerifyFlags::NOSIGNATURES,
            "a",
        );
        assert!(matches!(
            res,
            Err(BuildDepError::HeaderDigestMismatch("SHA256", _, _))
        ));

        verify_package(
            &headers,
            &mut payload,
            &Keyring::new(),
            VerifyFlags::NODIGESTS,
            "a",
        )
    }

    #[test]
    fn header_signature_trusted() -> Result<()> {
        let key = test_signing_key();
        let package = SourcePackageBuilder::new("a", "1", "1")
            .sign_header(key)
            .build();
        let (headers, mut payload) = read(&package)?;

        verify_package(
            &headers,
            &mut payload,
            &keyring_with(key),
            VerifyFlags::empty(),
            "a",
        )
    }

    #[test]
    fn header_signature_missing_key() -> Result<()> {
        let package = SourcePackageBuilder::new("a", "1", "1")
            .sign_header(test_signing_key())
            .build();
        let (headers, mut payload) = read(&package)?;

        let res = verify_package(
            &headers,
            &mut payload,
            &Keyring::new(),
            VerifyFlags::empty(),
            "a",
        );
        assert!(matches!(res, Err(BuildDepError::PublicKeyNotAvailable)));

        verify_package(
            &headers,
            &mut payload,
            &Keyring::new(),
            VerifyFlags::NOSIGNATURES,
            "a",
        )
    }

    #[test]
    fn header_signature_tampered() -> Result<()> {
        let key = test_signing_key();
        let package = SourcePackageBuilder::new("a", "1", "1")
            .sign_header(key)
            .tamper_after_signing()
            .build();
        let (headers, mut payload) = read(&package)?;

        let res = verify_package(
            &headers,
            &mut payload,
            &keyring_with(key),
            VerifyFlags::NODIGESTS,
            "a",
        );
        assert!(matches!(res, Err(BuildDepError::SignatureBad("RSA", _))));

        Ok(())
    }

    #[test]
    fn legacy_signature_covers_payload() -> Result<()> {
        let key = test_signing_key();
        let package = SourcePackageBuilder::new("a", "1", "1")
            .payload(b"cpio payload")
            .sign_legacy(key)
            .build();
        let (headers, mut payload) = read(&package)?;

        verify_package(
            &headers,
            &mut payload,
            &keyring_with(key),
            VerifyFlags::empty(),
            "a",
        )?;

        let mut corrupted = package.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        let (headers, mut payload) = read(&corrupted)?;

        assert!(matches!(
            verify_package(
                &headers,
                &mut payload,
                &keyring_with(key),
                VerifyFlags::empty(),
                "a",
            ),
            Err(BuildDepError::SignatureBad("PGP", _))
        ));

        Ok(())
    }
}
