// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem based RPM repositories. */

use {
    crate::{
        error::{BuildDepError, Result},
        repository::{
            metadata::RepoMd, DataResolver, MetadataReader, RepositoryRootReader, REPODATA_PATH,
        },
    },
    async_trait::async_trait,
    futures::AsyncRead,
    std::{
        path::{Path, PathBuf},
        pin::Pin,
    },
    url::Url,
};

fn open_path(path: &Path) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
    let f = std::fs::File::open(path)
        .map_err(|e| BuildDepError::IoPath(format!("{}", path.display()), e))?;

    Ok(Box::pin(futures::io::AllowStdIo::new(f)))
}

fn directory_url(path: &Path) -> Result<Url> {
    Url::from_file_path(path)
        .map_err(|_| BuildDepError::RepositoryUrlUnsupported(format!("{}", path.display())))
}

/// A readable interface to an RPM repository backed by a filesystem.
#[derive(Clone, Debug)]
pub struct FilesystemRepositoryReader {
    root_dir: PathBuf,
}

impl FilesystemRepositoryReader {
    /// Construct a new instance, bound to the root directory specified.
    ///
    /// No validation of the passed path is performed.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root_dir: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl DataResolver for FilesystemRepositoryReader {
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        open_path(&self.root_dir.join(path))
    }
}

#[async_trait]
impl RepositoryRootReader for FilesystemRepositoryReader {
    fn url(&self) -> Result<Url> {
        directory_url(&self.root_dir)
    }

    async fn metadata_reader(&self) -> Result<Box<dyn MetadataReader>> {
        let repomd = self
            .fetch_repomd(&format!("{}/repomd.xml", REPODATA_PATH))
            .await?;

        Ok(Box::new(FilesystemMetadataReader {
            metadata_dir: self.root_dir.join(REPODATA_PATH),
            repomd,
        }))
    }
}

/// Filesystem repository reader bound to a parsed `repomd.xml` file.
pub struct FilesystemMetadataReader {
    metadata_dir: PathBuf,
    repomd: RepoMd,
}

#[async_trait]
impl DataResolver for FilesystemMetadataReader {
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        open_path(&self.metadata_dir.join(path))
    }
}

#[async_trait]
impl MetadataReader for FilesystemMetadataReader {
    fn url(&self) -> Result<Url> {
        directory_url(&self.metadata_dir)
    }

    fn repomd(&self) -> &RepoMd {
        &self.repomd
    }
}
