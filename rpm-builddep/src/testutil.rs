// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Test helpers: synthetic packages, signing keys and repositories. */

use {
    crate::{
        dependency::Dependency,
        header::*,
        sack::{InstallError, PackageInstaller},
    },
    digest::Digest,
    once_cell::sync::Lazy,
    pgp::{
        crypto::{HashAlgorithm, SymmetricKeyAlgorithm},
        packet::{Packet, SignatureConfig, SignatureType, Subpacket},
        ser::Serialize,
        types::{CompressionAlgorithm, KeyTrait, SecretKeyTrait},
        KeyType, SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey,
    },
    smallvec::smallvec,
    std::{
        collections::HashSet,
        io::{Cursor, Write},
        path::Path,
        str::FromStr,
        sync::{Arc, Mutex, MutexGuard},
    },
};

static SINK_TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serialize tests that swap the process-wide diagnostic sink.
pub fn sink_test_lock() -> MutexGuard<'static, ()> {
    SINK_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// A writer whose content can be inspected after being handed off.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Serializes header structures.
#[derive(Clone, Default)]
pub struct HeaderBuilder {
    entries: Vec<(u32, EntryValue)>,
}

impl HeaderBuilder {
    pub fn entry(mut self, tag: u32, value: EntryValue) -> Self {
        self.entries.retain(|(t, _)| *t != tag);
        self.entries.push((tag, value));
        self
    }

    pub fn string(self, tag: u32, value: &str) -> Self {
        self.entry(tag, EntryValue::String(value.to_string()))
    }

    pub fn i18n_string(self, tag: u32, value: &str) -> Self {
        self.entry(tag, EntryValue::I18nString(vec![value.to_string()]))
    }

    pub fn string_array(self, tag: u32, values: &[&str]) -> Self {
        self.entry(
            tag,
            EntryValue::StringArray(values.iter().map(|s| s.to_string()).collect()),
        )
    }

    pub fn u16s(self, tag: u32, values: &[u16]) -> Self {
        self.entry(tag, EntryValue::Int16(values.to_vec()))
    }

    pub fn u32s(self, tag: u32, values: &[u32]) -> Self {
        self.entry(tag, EntryValue::Int32(values.to_vec()))
    }

    pub fn u64s(self, tag: u32, values: &[u64]) -> Self {
        self.entry(tag, EntryValue::Int64(values.to_vec()))
    }

    pub fn binary(self, tag: u32, value: &[u8]) -> Self {
        self.entry(tag, EntryValue::Binary(value.to_vec()))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|(tag, _)| *tag);

        let mut index = vec![];
        let mut data = vec![];

        for (tag, value) in &entries {
            let alignment = match value {
                EntryValue::Int16(_) => 2,
                EntryValue::Int32(_) => 4,
                EntryValue::Int64(_) => 8,
                _ => 1,
            };
            while data.len() % alignment != 0 {
                data.push(0);
            }

            let offset = data.len();
            let count = match value {
                EntryValue::Null => 1,
                EntryValue::Char(v) | EntryValue::Int8(v) | EntryValue::Binary(v) => {
                    data.extend_from_slice(v);
                    v.len()
                }
                EntryValue::Int16(v) => {
                    v.iter().for_each(|x| data.extend_from_slice(&x.to_be_bytes()));
                    v.len()
                }
                EntryValue::Int32(v) => {
                    v.iter().for_each(|x| data.extend_from_slice(&x.to_be_bytes()));
                    v.len()
                }
                EntryValue::Int64(v) => {
                    v.iter().for_each(|x| data.extend_from_slice(&x.to_be_bytes()));
                    v.len()
                }
                EntryValue::String(s) => {
                    data.extend_from_slice(s.as_bytes());
                    data.push(0);
                    1
                }
                EntryValue::StringArray(v) | EntryValue::I18nString(v) => {
                    for s in v {
                        data.extend_from_slice(s.as_bytes());
                        data.push(0);
                    }
                    v.len()
                }
            };

            index.extend_from_slice(&tag.to_be_bytes());
            index.extend_from_slice(&value.entry_type().to_raw().to_be_bytes());
            index.extend_from_slice(&(offset as u32).to_be_bytes());
            index.extend_from_slice(&(count as u32).to_be_bytes());
        }

        let mut out = HEADER_MAGIC.to_vec();
        out.push(1);
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend(index);
        out.extend(data);

        out
    }
}

/// A PGP key pair for signing test packages.
pub struct TestKey {
    pub secret: SignedSecretKey,
    pub public: SignedPublicKey,
}

fn generate_key(user_id: &str) -> TestKey {
    let mut params = SecretKeyParamsBuilder::default();
    params
        .key_type(KeyType::Rsa(2048))
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_256])
        .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
        .can_create_certificates(false)
        .can_sign(true)
        .primary_user_id(user_id.to_string());

    let secret = params
        .build()
        .expect("key params should build")
        .generate()
        .expect("key generation should succeed")
        .sign(String::new)
        .expect("self-signing secret key should succeed");
    let public = secret
        .public_key()
        .sign(&secret, String::new)
        .expect("self-signing public key should succeed");

    TestKey { secret, public }
}

static SIGNING_KEY: Lazy<TestKey> = Lazy::new(|| generate_key("Packager <packager@example.com>"));

/// A lazily generated signing key shared by all tests.
pub fn test_signing_key() -> &'static TestKey {
    &SIGNING_KEY
}

/// Produce a binary PGP signature packet over `data`.
pub fn sign_binary(key: &TestKey, data: &[u8]) -> Vec<u8> {
    let config = SignatureConfig::new_v4(
        Default::default(),
        SignatureType::Binary,
        key.secret.algorithm(),
        HashAlgorithm::SHA2_256,
        vec![Subpacket::SignatureCreationTime(chrono::Utc::now())],
        vec![Subpacket::Issuer(key.secret.key_id())],
    );

    let signature = config
        .sign(&key.secret, String::new, Cursor::new(data))
        .expect("signing should succeed");

    let mut out = vec![];
    Packet::Signature(signature)
        .to_writer(&mut out)
        .expect("signature packet should serialize");

    out
}

/// Builds synthetic RPM files.
pub struct SourcePackageBuilder {
    name: String,
    version: String,
    release: String,
    source: bool,
    requires: Vec<Dependency>,
    payload: Vec<u8>,
    header_signer: Option<&'static TestKey>,
    legacy_signer: Option<&'static TestKey>,
    tamper: bool,
    sha256_override: Option<String>,
}

impl SourcePackageBuilder {
    pub fn new(name: &str, version: &str, release: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
            source: true,
            requires: vec![],
            payload: b"payload".to_vec(),
            header_signer: None,
            legacy_signer: None,
            tamper: false,
            sha256_override: None,
        }
    }

    /// Add requirements, expressed as reldep strings.
    pub fn requires(mut self, reldeps: &[&str]) -> Self {
        self.requires.extend(
            reldeps
                .iter()
                .map(|s| Dependency::from_str(s).expect("test reldep should parse")),
        );
        self
    }

    /// Add a requirement with raw flags, for flags not expressible as reldep strings.
    pub fn require_raw(mut self, dependency: Dependency) -> Self {
        self.requires.push(dependency);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn sign_header(mut self, key: &'static TestKey) -> Self {
        self.header_signer = Some(key);
        self
    }

    pub fn sign_legacy(mut self, key: &'static TestKey) -> Self {
        self.legacy_signer = Some(key);
        self
    }

    /// Alter the main header after signatures are computed.
    pub fn tamper_after_signing(mut self) -> Self {
        self.tamper = true;
        self
    }

    pub fn sha256_override(mut self, digest: &str) -> Self {
        self.sha256_override = Some(digest.to_string());
        self
    }

    fn main_header(&self, name: &str) -> Vec<u8> {
        let names = self
            .requires
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>();
        let flags = self
            .requires
            .iter()
            .map(|d| d.flags.bits())
            .collect::<Vec<_>>();
        let versions = self
            .requires
            .iter()
            .map(|d| d.evr.as_str())
            .collect::<Vec<_>>();

        let mut builder = HeaderBuilder::default()
            .string(RPMTAG_NAME, name)
            .string(RPMTAG_VERSION, &self.version)
            .string(RPMTAG_RELEASE, &self.release)
            .string(RPMTAG_ARCH, "x86_64");

        if self.source {
            builder = builder.u32s(RPMTAG_SOURCEPACKAGE, &[1]);
        } else {
            builder = builder.string(RPMTAG_SOURCERPM, "source.src.rpm");
        }

        if !names.is_empty() {
            builder = builder
                .string_array(RPMTAG_REQUIRENAME, &names)
                .u32s(RPMTAG_REQUIREFLAGS, &flags)
                .string_array(RPMTAG_REQUIREVERSION, &versions);
        }

        builder.build()
    }

    pub fn build(&self) -> Vec<u8> {
        let signed_header = self.main_header(&self.name);

        let mut signature = HeaderBuilder::default().u32s(
            RPMSIGTAG_SIZE,
            &[(signed_header.len() + self.payload.len()) as u32],
        );

        if let Some(key) = self.header_signer {
            signature = signature.binary(RPMSIGTAG_RSA, &sign_binary(key, &signed_header));
        }
        if let Some(key) = self.legacy_signer {
            let mut data = signed_header.clone();
            data.extend_from_slice(&self.payload);
            signature = signature.binary(RPMSIGTAG_PGP, &sign_binary(key, &data));
        }

        let header = if self.tamper {
            self.main_header(&format!("{}-tampered", self.name))
        } else {
            signed_header
        };

        signature = signature
            .string(
                RPMSIGTAG_SHA256,
                &self
                    .sha256_override
                    .clone()
                    .unwrap_or_else(|| hex::encode(sha2::Sha256::digest(&header))),
            )
            .string(RPMSIGTAG_SHA1, &hex::encode(sha1::Sha1::digest(&header)));
        let signature = signature.build();

        let mut out = Vec::with_capacity(LEAD_SIZE + signature.len() + header.len() + 8);
        out.extend_from_slice(&LEAD_MAGIC);
        out.extend_from_slice(&[3, 0]);
        out.extend_from_slice(&(if self.source { 1u16 } else { 0u16 }).to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        let mut lead_name = [0u8; 66];
        let nvr = format!("{}-{}-{}", self.name, self.version, self.release);
        let len = nvr.len().min(65);
        lead_name[..len].copy_from_slice(&nvr.as_bytes()[..len]);
        out.extend_from_slice(&lead_name);
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&5u16.to_be_bytes());
        out.extend_from_slice(&[0u8; 16]);
        assert_eq!(out.len(), LEAD_SIZE);

        out.extend_from_slice(&signature);
        out.resize(out.len() + (8 - signature.len() % 8) % 8, 0);
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);

        out
    }

    /// Write the package to `dir` as `<name>-<version>-<release>.src.rpm`.
    pub fn write_to(&self, dir: &Path) -> std::path::PathBuf {
        let path = dir.join(format!(
            "{}-{}-{}.src.rpm",
            self.name, self.version, self.release
        ));
        std::fs::write(&path, self.build()).expect("writing test package should succeed");
        path
    }
}

/// An installer recording every request and refusing a configured set of names.
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    pub attempts: Vec<String>,
    pub unavailable: HashSet<String>,
}

impl RecordingInstaller {
    pub fn refusing(names: &[&str]) -> Self {
        Self {
            attempts: vec![],
            unavailable: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PackageInstaller for RecordingInstaller {
    fn install(&mut self, reldep: &str) -> Result<(), InstallError> {
        self.attempts.push(reldep.to_string());

        let name = reldep.split_whitespace().next().unwrap_or(reldep);
        if self.unavailable.contains(name) {
            Err(InstallError::NoMatch(reldep.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Writes a minimal RPM repository: a `repomd.xml` and a `primary.xml`.
pub struct TestRepository {
    packages: Vec<(String, Vec<String>, Vec<String>)>,
    compressed: bool,
    corrupt_digest: bool,
}

impl Default for TestRepository {
    fn default() -> Self {
        Self {
            packages: vec![],
            compressed: true,
            corrupt_digest: false,
        }
    }
}

impl TestRepository {
    /// Add a package with the given provides and files.
    pub fn package(mut self, name: &str, provides: &[&str], files: &[&str]) -> Self {
        self.packages.push((
            name.to_string(),
            provides.iter().map(|s| s.to_string()).collect(),
            files.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Advertise a wrong digest for `primary.xml` in `repomd.xml`.
    pub fn corrupt_primary_digest(mut self) -> Self {
        self.corrupt_digest = true;
        self
    }

    pub fn primary_xml(&self) -> String {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <metadata xmlns=\"http://linux.duke.edu/metadata/common\" \
             xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"{}\">\n",
            self.packages.len()
        );

        for (name, provides, files) in &self.packages {
            xml.push_str(&format!(
                "<package type=\"rpm\">\n\
                 <name>{name}</name>\n\
                 <arch>x86_64</arch>\n\
                 <version epoch=\"0\" ver=\"1.0\" rel=\"1\"/>\n\
                 <summary>{name} package</summary>\n\
                 <location href=\"Packages/{name}-1.0-1.x86_64.rpm\"/>\n\
                 <format>\n",
                name = name
            ));

            if !provides.is_empty() {
                xml.push_str("<rpm:provides>\n");
                for provide in provides {
                    xml.push_str(&format!(
                        "<rpm:entry name=\"{}\" flags=\"EQ\" epoch=\"0\" ver=\"1.0\" rel=\"1\"/>\n",
                        provide
                    ));
                }
                xml.push_str("</rpm:provides>\n");
            }

            for file in files {
                xml.push_str(&format!("<file>{}</file>\n", file));
            }

            xml.push_str("</format>\n</package>\n");
        }

        xml.push_str("</metadata>\n");

        xml
    }

    /// Write `repodata/` under `dir`.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        use futures::AsyncReadExt;

        let primary = self.primary_xml().into_bytes();

        let (stored, file_name) = if self.compressed {
            let compressed = futures::executor::block_on(async {
                let mut encoder = async_compression::futures::bufread::GzipEncoder::new(
                    futures::io::Cursor::new(primary),
                );
                let mut out = vec![];
                encoder.read_to_end(&mut out).await.map(|_| out)
            })?;

            (compressed, "primary.xml.gz")
        } else {
            (primary, "primary.xml")
        };

        let digest = if self.corrupt_digest {
            hex::encode(sha2::Sha256::digest(b"something else"))
        } else {
            hex::encode(sha2::Sha256::digest(&stored))
        };
        let file_name = format!("{}-{}", digest, file_name);

        let repodata = dir.join("repodata");
        std::fs::create_dir_all(&repodata)?;
        std::fs::write(repodata.join(&file_name), &stored)?;

        let repomd = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <repomd xmlns=\"http://linux.duke.edu/metadata/repo\">\n\
             <revision>1</revision>\n\
             <data type=\"primary\">\n\
             <checksum type=\"sha256\">{}</checksum>\n\
             <location href=\"repodata/{}\"/>\n\
             <size>{}</size>\n\
             </data>\n\
             </repomd>\n",
            digest,
            file_name,
            stored.len()
        );
        std::fs::write(repodata.join("repomd.xml"), repomd)?;

        Ok(())
    }
}
