// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `repomd.xml` and `primary.xml` file formats.

Only the fields needed to resolve install requests are modeled. Unknown
elements are ignored.
*/

use {
    crate::{
        error::{BuildDepError, Result},
        repository::io::ContentDigest,
    },
    serde::{Deserialize, Serialize},
    std::io::Read,
};

/// A `repomd.xml` file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RepoMd {
    /// Revision of the repository. Often an integer-like value.
    pub revision: Option<String>,
    /// Data files constituting this repository.
    pub data: Vec<RepoMdData>,
}

impl RepoMd {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }

    pub fn from_xml(s: &str) -> Result<Self> {
        Ok(serde_xml_rs::from_str(s)?)
    }

    /// Find the `<data>` entry of the given type.
    pub fn find_data(&self, data_type: &'static str) -> Result<&RepoMdData> {
        self.data
            .iter()
            .find(|entry| entry.data_type == data_type)
            .ok_or(BuildDepError::MetadataFileNotFound(data_type))
    }
}

/// A `<data>` element in a `repomd.xml` file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RepoMdData {
    #[serde(rename = "type")]
    pub data_type: String,
    /// Content checksum of the file as stored.
    pub checksum: Checksum,
    pub location: Location,
    /// Size in bytes of the file as stored.
    pub size: Option<u64>,
    pub timestamp: Option<u64>,
    /// Size in bytes of the decompressed file.
    #[serde(rename = "open-size")]
    pub open_size: Option<u64>,
}

/// A content checksum element.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Checksum {
    /// Name of the digest algorithm.
    #[serde(rename = "type")]
    pub name: String,
    /// Hex encoded digest.
    #[serde(rename = "$value")]
    pub value: String,
}

impl TryFrom<&Checksum> for ContentDigest {
    type Error = BuildDepError;

    fn try_from(v: &Checksum) -> std::result::Result<Self, Self::Error> {
        ContentDigest::from_hex(&v.name, &v.value)
    }
}

/// A `<location>` element.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Location {
    pub href: String,
}

/// A `primary.xml` file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Primary {
    /// The number of packages expressed by this document.
    #[serde(rename = "packages")]
    pub count: usize,

    #[serde(default, rename = "package")]
    pub packages: Vec<Package>,
}

impl Primary {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_xml_rs::from_reader(reader)?)
    }

    pub fn from_xml(s: &str) -> Result<Self> {
        Ok(serde_xml_rs::from_str(s)?)
    }
}

/// A package advertised in a `primary.xml` file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Package {
    /// e.g. `rpm`.
    #[serde(rename = "type")]
    pub package_type: String,
    pub name: String,
    pub arch: String,
    pub version: PackageVersion,
    pub summary: Option<String>,
    pub location: Location,
    pub format: Option<PackageFormat>,
}

impl Package {
    /// `name-[epoch:]version-release.arch`.
    pub fn nevra(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, self.arch)
    }

    /// Names of the capabilities this package provides.
    pub fn provide_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.format
            .iter()
            .filter_map(|format| format.provides.as_ref())
            .flat_map(|provides| provides.entries.iter())
            .map(|entry| entry.name.as_str())
    }

    /// Paths of files this package advertises.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.format
            .iter()
            .flat_map(|format| format.files.iter())
            .map(|file| file.value.as_str())
    }
}

/// A package version.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PackageVersion {
    #[serde(default)]
    pub epoch: u64,
    #[serde(rename = "ver")]
    pub version: String,
    #[serde(rename = "rel")]
    pub release: String,
}

impl std::fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }

        write!(f, "{}-{}", self.version, self.release)
    }
}

/// The `<format>` element of a package.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PackageFormat {
    /// Name of the source RPM this package was built from.
    #[serde(rename = "sourcerpm")]
    pub source_rpm: Option<String>,

    pub provides: Option<Entries>,

    pub requires: Option<Entries>,

    #[serde(default, rename = "file")]
    pub files: Vec<FileEntry>,
}

/// A collection of [PackageEntry].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Entries {
    #[serde(default, rename = "entry")]
    pub entries: Vec<PackageEntry>,
}

/// A package relationship.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PackageEntry {
    pub name: String,
    /// Comparison, e.g. `EQ` or `GE`.
    pub flags: Option<String>,
    pub epoch: Option<u64>,
    #[serde(rename = "ver")]
    pub version: Option<String>,
    #[serde(rename = "rel")]
    pub release: Option<String>,
}

/// A `<file>` element.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FileEntry {
    /// Missing value implies a regular file.
    #[serde(rename = "type")]
    pub file_type: Option<String>,

    #[serde(rename = "$value")]
    pub value: String,
}
