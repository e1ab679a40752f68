// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM repository interaction.

RPM repositories are defined by a base URL. Under that base URL is a
`repodata` directory containing a `repomd.xml` file. This file (represented
by [metadata::RepoMd]) describes the other metadata files constituting the
repository, notably `primary.xml`, which lists the available packages.

The [RepositoryRootReader] trait defines a generic read interface bound to a
base URL. The [MetadataReader] trait defines an interface to repository
metadata via a parsed `repomd.xml` file.

Concrete readers exist for HTTP ([http::HttpRepositoryClient]) and for the
local filesystem ([filesystem::FilesystemRepositoryReader]).
[reader_from_str()] picks one based on a URL or path.
*/

pub mod filesystem;
pub mod http;
pub mod io;
pub mod metadata;

use {
    crate::{
        error::{BuildDepError, Result},
        repository::{
            io::{Compression, ContentDigest, ContentValidatingReader},
            metadata::{Primary, RepoMd, RepoMdData},
        },
    },
    async_trait::async_trait,
    futures::{AsyncRead, AsyncReadExt},
    std::pin::Pin,
    url::Url,
};

/// Relative path of the metadata directory of a repository.
pub const REPODATA_PATH: &str = "repodata";

/// Path based content fetching.
#[async_trait]
pub trait DataResolver: Sync {
    /// Get the content of a relative path as an async reader.
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>>;

    /// Obtain a reader that checks content size and digest.
    ///
    /// The digest can only be compared once all content is read. Integrity
    /// failures surface as read errors on the returned stream.
    async fn get_path_with_digest_verification(
        &self,
        path: &str,
        expected_size: u64,
        expected_digest: ContentDigest,
    ) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        Ok(Box::pin(ContentValidatingReader::new(
            self.get_path(path).await?,
            expected_size,
            expected_digest,
        )))
    }

    /// Like [Self::get_path_with_digest_verification()] with decompression applied.
    ///
    /// The digest is matched against the stored content, before decompression.
    async fn get_path_decoded_with_digest_verification(
        &self,
        path: &str,
        compression: Compression,
        expected_size: u64,
        expected_digest: ContentDigest,
    ) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        let reader = self
            .get_path_with_digest_verification(path, expected_size, expected_digest)
            .await?;

        Ok(compression.decoder(futures::io::BufReader::new(reader)))
    }
}

/// Read all content from a reader, attributing errors to `path`.
async fn read_all(mut reader: Pin<Box<dyn AsyncRead + Send>>, path: &str) -> Result<Vec<u8>> {
    let mut data = vec![];

    reader.read_to_end(&mut data).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            BuildDepError::RepositoryIntegrity(path.to_string(), e.to_string())
        } else {
            BuildDepError::IoPath(path.to_string(), e)
        }
    })?;

    Ok(data)
}

/// A read-only interface for the root of an RPM repository.
#[async_trait]
pub trait RepositoryRootReader: DataResolver + Sync {
    /// Obtain the URL to which this reader is bound.
    fn url(&self) -> Result<Url>;

    async fn metadata_reader(&self) -> Result<Box<dyn MetadataReader>>;

    /// Fetch and parse a `repomd.xml` file given the relative path to that file.
    async fn fetch_repomd(&self, path: &str) -> Result<RepoMd> {
        let data = read_all(self.get_path(path).await?, path).await?;

        RepoMd::from_reader(std::io::Cursor::new(data))
    }
}

/// A read-only interface for metadata in an RPM repository.
///
/// This provides methods for retrieving and parsing content from the
/// `repodata` directory.
#[async_trait]
pub trait MetadataReader: DataResolver + Sync {
    /// Obtain the base URL to which this instance is bound.
    fn url(&self) -> Result<Url>;

    /// Obtain the parsed `repomd.xml` data structure.
    fn repomd(&self) -> &RepoMd;

    /// Fetch the decompressed content of a data file described by `repomd.xml`.
    ///
    /// `data.location.href` is relative to the repository root.
    async fn fetch_data_file(&self, data: &RepoMdData) -> Result<Vec<u8>> {
        let path = data
            .location
            .href
            .strip_prefix(&format!("{}/", REPODATA_PATH))
            .unwrap_or(&data.location.href);

        let expected_size = data.size.ok_or(BuildDepError::MetadataMissingSize)?;
        let expected_digest = ContentDigest::try_from(&data.checksum)?;

        let reader = self
            .get_path_decoded_with_digest_verification(
                path,
                Compression::from_path(path),
                expected_size,
                expected_digest,
            )
            .await?;

        read_all(reader, &data.location.href).await
    }

    /// Fetch and parse the `primary.xml` file of the repository.
    async fn primary_packages(&self) -> Result<Primary> {
        let entry = self.repomd().find_data("primary")?;
        let data = self.fetch_data_file(entry).await?;

        Primary::from_reader(std::io::Cursor::new(data))
    }
}

/// Obtain a repository reader for a URL or filesystem path.
///
/// `http://` and `https://` URLs use HTTP. `file://` URLs and strings that
/// aren't URLs are treated as local directories.
pub fn reader_from_str(s: &str) -> Result<Box<dyn RepositoryRootReader>> {
    match Url::parse(s) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(Box::new(http::HttpRepositoryClient::new(url)?)),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| BuildDepError::RepositoryUrlUnsupported(s.to_string()))?;

                Ok(Box::new(filesystem::FilesystemRepositoryReader::new(path)))
            }
            _ => Err(BuildDepError::RepositoryUrlUnsupported(s.to_string())),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Ok(Box::new(filesystem::FilesystemRepositoryReader::new(s)))
        }
        Err(e) => Err(e.into()),
    }
}
