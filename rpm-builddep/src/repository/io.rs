// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Content digests and decompression of repository data. */

use {
    crate::error::{BuildDepError, Result},
    async_compression::futures::bufread::{GzipDecoder, XzDecoder, ZstdDecoder},
    digest::DynDigest,
    futures::{AsyncBufRead, AsyncRead},
    std::{
        fmt::{Display, Formatter},
        pin::Pin,
        task::{Context, Poll},
    },
};

/// Compression format of a repository data file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    /// Resolve the compression format from a file name extension.
    pub fn from_path(path: &str) -> Self {
        match path {
            _ if path.ends_with(".gz") => Self::Gzip,
            _ if path.ends_with(".xz") => Self::Xz,
            _ if path.ends_with(".zst") => Self::Zstd,
            _ => Self::None,
        }
    }

    /// Wrap a buffered stream so reads yield decompressed data.
    pub fn decoder<'a>(
        self,
        stream: impl AsyncBufRead + Send + 'a,
    ) -> Pin<Box<dyn AsyncRead + Send + 'a>> {
        match self {
            Self::None => Box::pin(stream),
            Self::Gzip => Box::pin(GzipDecoder::new(stream)),
            Self::Xz => Box::pin(XzDecoder::new(stream)),
            Self::Zstd => Box::pin(ZstdDecoder::new(stream)),
        }
    }
}

/// A content digest advertised by repository metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ContentDigest {
    Sha1(Vec<u8>),
    Sha256(Vec<u8>),
}

impl Display for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm(), hex::encode(self.as_bytes()))
    }
}

impl ContentDigest {
    /// Construct an instance from a checksum type name and hex digest.
    ///
    /// `sha` is accepted as an alias of `sha1`, as older `createrepo` versions emit it.
    pub fn from_hex(name: &str, digest: &str) -> Result<Self> {
        let bytes = hex::decode(digest.trim())
            .map_err(|e| BuildDepError::ContentDigestBadHex(digest.to_string(), e))?;

        match name {
            "sha" | "sha1" => Ok(Self::Sha1(bytes)),
            "sha256" => Ok(Self::Sha256(bytes)),
            _ => Err(BuildDepError::UnknownDigestFormat(name.to_string())),
        }
    }

    /// Checksum type name as written in repository metadata.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Sha1(_) => "sha1",
            Self::Sha256(_) => "sha256",
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(x) | Self::Sha256(x) => x,
        }
    }

    fn hasher(&self) -> Box<dyn DynDigest + Send> {
        match self {
            Self::Sha1(_) => Box::new(sha1::Sha1::default()),
            Self::Sha256(_) => Box::new(sha2::Sha256::default()),
        }
    }
}

fn invalid_data(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

/// A reader verifying size and digest of the content flowing through it.
///
/// The digest is compared once the expected number of bytes has been read. A
/// mismatch, or content longer than expected, is reported as a read error.
/// Content shorter than expected is reported at end of stream.
pub struct ContentValidatingReader<R> {
    inner: R,
    expected: ContentDigest,
    hasher: Box<dyn DynDigest + Send>,
    size: u64,
    remaining: u64,
}

impl<R> ContentValidatingReader<R> {
    pub fn new(inner: R, size: u64, expected: ContentDigest) -> Self {
        Self {
            inner,
            hasher: expected.hasher(),
            expected,
            size,
            remaining: size,
        }
    }

    fn consume(&mut self, data: &[u8]) -> std::io::Result<()> {
        let len = data.len() as u64;
        if len > self.remaining {
            return Err(invalid_data(format!(
                "content exceeds advertised size of {} bytes",
                self.size
            )));
        }

        self.hasher.update(data);
        self.remaining -= len;

        if self.remaining == 0 && len > 0 {
            let got = self.hasher.finalize_reset();
            if got.as_ref() != self.expected.as_bytes() {
                return Err(invalid_data(format!(
                    "digest mismatch: expected {}, got {}:{}",
                    self.expected,
                    self.expected.algorithm(),
                    hex::encode(got)
                )));
            }
        }

        Ok(())
    }
}

impl<R> AsyncRead for ContentValidatingReader<R>
where
    R: AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();

        let size = match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(size)) => size,
            other => return other,
        };

        if size == 0 && this.remaining > 0 {
            return Poll::Ready(Err(invalid_data(format!(
                "content ended {} bytes short of advertised size {}",
                this.remaining, this.size
            ))));
        }

        Poll::Ready(this.consume(&buf[..size]).map(|()| size))
    }
}
