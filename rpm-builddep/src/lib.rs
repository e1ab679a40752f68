// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Install the build dependencies of RPM source packages and spec files.

The [command::BuildDepCommand] reads the build requirements of its inputs and
hands each of them to a [sack::PackageInstaller].

Source packages (`.src.rpm` and `.nosrc.rpm` files) are read by a
[transaction::TransactionSet]: the lead, signature header and main header
are parsed by the [header] module and verified against a [keyring::Keyring]
by the [signature] module. Their `rpmlib(...)` requirements describe
features of the package manager itself and are skipped.

Spec files are parsed by the [spec] module, which evaluates macros and
conditionals to find the `BuildRequires` that apply.

Requirements are resolved by a [sack::PackageSack] holding the packages
advertised by the `primary.xml` metadata of RPM repositories. Repositories
are read over HTTP or from the filesystem by the [repository] module.

Readers of packages and spec files report problems through the [diagnostics]
sink, which the command silences while it runs.
*/

pub mod cli;
pub mod command;
pub mod config;
pub mod dependency;
pub mod diagnostics;
pub mod error;
pub mod header;
pub mod keyring;
pub mod repository;
pub mod sack;
pub mod signature;
pub mod spec;
pub mod transaction;

#[cfg(test)]
mod testutil;

pub use crate::error::{BuildDepError, Result};
