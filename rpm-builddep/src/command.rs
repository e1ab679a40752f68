// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The `builddep` command.

Given source packages (`.src.rpm`, `.nosrc.rpm`) or spec files, every build
requirement is handed to a [PackageInstaller]. Requirements nothing
satisfies are reported and the command fails once every requirement of the
input has been tried.
*/

use {
    crate::{
        dependency::Dependency,
        diagnostics::SinkGuard,
        error::{BuildDepError, Result},
        keyring::Keyring,
        sack::{InstallError, PackageInstaller},
        signature::VerifyFlags,
        spec::{macros::MacroContext, SpecFile},
        transaction::TransactionSet,
    },
    log::{debug, warn},
    std::path::Path,
};

/// Names the command is invoked by.
pub const ALIASES: &[&str] = &["builddep"];

pub const SUMMARY: &str = "Install build dependencies for .src.rpm, .nosrc.rpm or .spec file";

pub const USAGE: &str = "[PACKAGE.src.rpm|PACKAGE.nosrc.rpm|PACKAGE.spec]";

/// What a command needs the host to set up before it runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Demands {
    /// Enabled repositories must be loaded.
    pub available_repos: bool,
    /// The install goal is resolved and reported after the command runs.
    pub resolving: bool,
    /// The command changes the system and needs root privileges.
    pub root_user: bool,
    /// Available packages must be loaded into a sack.
    pub sack_activation: bool,
}

/// Kind of input file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputKind {
    /// A `.src.rpm` or `.nosrc.rpm` package.
    SourcePackage,
    /// A spec file.
    Spec,
}

impl InputKind {
    /// Determine the kind of input from its file name.
    ///
    /// Anything not named like a source package is a spec file.
    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".src.rpm") || path.ends_with(".nosrc.rpm") {
            Self::SourcePackage
        } else {
            Self::Spec
        }
    }
}

/// Installs the build dependencies of source packages and spec files.
#[derive(Clone, Debug, Default)]
pub struct BuildDepCommand {
    keyring: Keyring,
    macros: MacroContext,
    nogpgcheck: bool,
    forced_kind: Option<InputKind>,
}

impl BuildDepCommand {
    pub fn new(keyring: Keyring) -> Self {
        Self {
            keyring,
            ..Default::default()
        }
    }

    /// Don't verify signatures of source packages.
    pub fn set_nogpgcheck(&mut self, value: bool) {
        self.nogpgcheck = value;
    }

    /// Treat every input as the given kind, regardless of its name.
    pub fn set_forced_kind(&mut self, kind: Option<InputKind>) {
        self.forced_kind = kind;
    }

    /// Macros to define when reading spec files.
    pub fn macros_mut(&mut self) -> &mut MacroContext {
        &mut self.macros
    }

    /// Register what the host must provide for this command.
    pub fn configure(&self, demands: &mut Demands) {
        demands.available_repos = true;
        demands.resolving = true;
        demands.root_user = true;
        demands.sack_activation = true;
    }

    /// Run the command against a set of input paths.
    ///
    /// Inputs are processed in order. The first input that fails stops processing.
    pub fn run(&self, args: &[String], installer: &mut dyn PackageInstaller) -> Result<()> {
        let _sink = SinkGuard::null();
        let mut ts = TransactionSet::new(self.keyring.clone());

        for path in args {
            match self
                .forced_kind
                .unwrap_or_else(|| InputKind::from_path(path))
            {
                InputKind::SourcePackage => self.src_deps(&mut ts, path, installer)?,
                InputKind::Spec => self.spec_deps(path, installer)?,
            }
        }

        Ok(())
    }

    /// Attempt to install a single requirement.
    ///
    /// Returns whether something satisfied it.
    fn install(installer: &mut dyn PackageInstaller, dependency: &Dependency) -> Result<bool> {
        let reldep = dependency.to_reldep_string();

        match installer.install(&reldep) {
            Ok(()) => Ok(true),
            Err(InstallError::NoMatch(_)) => {
                warn!("No matching package to install: '{}'", reldep);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn install_all<'a>(
        installer: &mut dyn PackageInstaller,
        dependencies: impl Iterator<Item = &'a Dependency>,
    ) -> Result<()> {
        let mut done = true;

        for dependency in dependencies {
            done &= Self::install(installer, dependency)?;
        }

        if done {
            Ok(())
        } else {
            Err(BuildDepError::DependenciesNotSatisfied)
        }
    }

    fn src_deps(
        &self,
        ts: &mut TransactionSet,
        path: &str,
        installer: &mut dyn PackageInstaller,
    ) -> Result<()> {
        if self.nogpgcheck {
            ts.set_verify_flags(VerifyFlags::NOSIGNATURES);
        }

        let header = ts.header_from_path(path)?;
        let requires = header.requires()?;

        Self::install_all(
            installer,
            requires.iter().filter(|dependency| {
                if dependency.is_rpmlib() {
                    debug!("skipping {}", dependency);
                    false
                } else {
                    true
                }
            }),
        )
    }

    fn spec_deps(&self, path: &str, installer: &mut dyn PackageInstaller) -> Result<()> {
        let spec = SpecFile::from_path(Path::new(path), self.macros.clone())
            .map_err(|e| BuildDepError::SpecInvalid(path.to_string(), e))?;

        // rpmlib() requirements are passed through as is.
        Self::install_all(installer, spec.build_requires().iter())
    }
}
