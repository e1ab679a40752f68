// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! HTTP based RPM repositories. */

use {
    crate::{
        error::{BuildDepError, Result},
        repository::{
            metadata::RepoMd, DataResolver, MetadataReader, RepositoryRootReader, REPODATA_PATH,
        },
    },
    async_trait::async_trait,
    futures::{AsyncRead, TryStreamExt},
    log::debug,
    reqwest::{Client, ClientBuilder, IntoUrl, StatusCode, Url},
    std::{io::ErrorKind, pin::Pin},
};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("rpm-builddep/", env!("CARGO_PKG_VERSION"));

/// Map an HTTP status to the I/O error kind callers match on.
fn status_error_kind(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::TimedOut,
        _ => ErrorKind::Other,
    }
}

fn request_error_kind(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::TimedOut
    } else if e.is_connect() {
        ErrorKind::ConnectionRefused
    } else {
        e.status().map(status_error_kind).unwrap_or(ErrorKind::Other)
    }
}

/// An HTTP client bound to a directory URL.
#[derive(Clone, Debug)]
struct HttpDirectory {
    client: Client,
    base: Url,
}

impl HttpDirectory {
    fn new(client: Client, mut base: Url) -> Self {
        // Url::join() replaces the last path segment unless it ends with a slash.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        Self { client, base }
    }

    fn subdirectory(&self, path: &str) -> Result<Self> {
        Ok(Self::new(self.client.clone(), self.base.join(path)?))
    }

    async fn open(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        let url = self.base.join(path)?;
        debug!("fetching {}", url);

        let fail = |kind: ErrorKind, message: String| {
            BuildDepError::IoPath(url.to_string(), std::io::Error::new(kind, message))
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fail(request_error_kind(&e), format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(status_error_kind(status), format!("HTTP {}", status)));
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(request_error_kind(&e), e.to_string()));

        Ok(Box::pin(stream.into_async_read()))
    }
}

/// Reader of an RPM repository served over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpRepositoryClient {
    root: HttpDirectory,
}

impl HttpRepositoryClient {
    /// Construct an instance for the repository rooted at `url`.
    pub fn new(url: impl IntoUrl) -> Result<Self> {
        let client = ClientBuilder::new().user_agent(USER_AGENT).build()?;

        Self::with_client(client, url)
    }

    /// Construct an instance issuing requests through an existing client.
    pub fn with_client(client: Client, url: impl IntoUrl) -> Result<Self> {
        Ok(Self {
            root: HttpDirectory::new(client, url.into_url()?),
        })
    }
}

#[async_trait]
impl DataResolver for HttpRepositoryClient {
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        self.root.open(path).await
    }
}

#[async_trait]
impl RepositoryRootReader for HttpRepositoryClient {
    fn url(&self) -> Result<Url> {
        Ok(self.root.base.clone())
    }

    async fn metadata_reader(&self) -> Result<Box<dyn MetadataReader>> {
        let metadata = self.root.subdirectory(REPODATA_PATH)?;
        let repomd = self
            .fetch_repomd(&format!("{}/repomd.xml", REPODATA_PATH))
            .await?;

        Ok(Box::new(HttpMetadataClient { metadata, repomd }))
    }
}

/// Reader of the `repodata` directory of an HTTP repository.
pub struct HttpMetadataClient {
    metadata: HttpDirectory,
    repomd: RepoMd,
}

#[async_trait]
impl DataResolver for HttpMetadataClient {
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        self.metadata.open(path).await
    }
}

#[async_trait]
impl MetadataReader for HttpMetadataClient {
    fn url(&self) -> Result<Url> {
        Ok(self.metadata.base.clone())
    }

    fn repomd(&self) -> &RepoMd {
        &self.repomd
    }
}
