// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {
    crate::{dependency::DependencyError, sack::InstallError, spec::SpecError},
    thiserror::Error,
};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum BuildDepError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1}")]
    IoPath(String, std::io::Error),

    #[error("argument parsing error: {0}")]
    Clap(#[from] clap::Error),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("XML error: {0:?}")]
    Xml(#[from] serde_xml_rs::Error),

    #[error("URL parse error: {0:?}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0:?}")]
    Http(#[from] reqwest::Error),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("{0}")]
    Dependency(#[from] DependencyError),

    #[error("{0}")]
    Install(#[from] InstallError),

    #[error("Failed to open: '{0}', not a valid spec file.")]
    SpecInvalid(String, #[source] SpecError),

    #[error("Not all dependencies satisfied")]
    DependenciesNotSatisfied,

    #[error("public key not available, add '--nogpgcheck' option to ignore package sign")]
    PublicKeyNotAvailable,

    #[error("{0}: not an rpm package")]
    NotAnRpm(String),

    #[error("malformed RPM header: {0}")]
    HeaderMalformed(String),

    #[error("{0} digest mismatch: expected {1}, got {2}")]
    HeaderDigestMismatch(&'static str, String, String),

    #[error("{0} signature is BAD (key ID {1})")]
    SignatureBad(&'static str, String),

    #[error("invalid hex in content digest: {0}; {1:?}")]
    ContentDigestBadHex(String, hex::FromHexError),

    #[error("unknown content digest format: {0}")]
    UnknownDigestFormat(String),

    #[error("repository metadata entry not found: {0}")]
    MetadataFileNotFound(&'static str),

    #[error("content size missing from metadata entry")]
    MetadataMissingSize,

    #[error("repository content integrity error on path {0}: {1}")]
    RepositoryIntegrity(String, String),

    #[error("unsupported repository URL: {0}")]
    RepositoryUrlUnsupported(String),

    #[error("invalid macro definition (expected `NAME VALUE`): {0}")]
    MacroDefinitionInvalid(String),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, BuildDepError>;
