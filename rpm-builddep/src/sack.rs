// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Available packages and install request resolution.

A [PackageSack] holds the packages advertised by the `primary.xml` of every
loaded repository. It implements [PackageInstaller]: each install request is
resolved to one available package, which is marked in an [InstallGoal].
Nothing is downloaded or installed.

Requests match by package name, then by provided capability. Absolute paths
match advertised files. Version constraints are recorded but not compared.
*/

use {
    crate::{
        dependency::{Dependency, DependencyError},
        error::Result,
        repository::{metadata::Package, RepositoryRootReader},
    },
    log::{debug, info},
    std::{
        collections::HashMap,
        fmt::{Display, Formatter},
        str::FromStr,
    },
    thiserror::Error,
};

/// Errors marking a package for installation.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Nothing available satisfies the request.
    #[error("No match for argument: {0}")]
    NoMatch(String),

    #[error("invalid install request {0}: {1}")]
    InvalidRequest(String, #[source] DependencyError),
}

/// Something that can mark packages for installation.
pub trait PackageInstaller {
    /// Mark the best package satisfying `reldep` for installation.
    ///
    /// [InstallError::NoMatch] means nothing satisfies the request. Other
    /// errors are fatal.
    fn install(&mut self, reldep: &str) -> std::result::Result<(), InstallError>;
}

/// A package available from a repository.
#[derive(Clone, Debug)]
pub struct AvailablePackage {
    /// Name of the repository advertising the package.
    pub repository: String,
    pub package: Package,
}

/// A package marked for installation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GoalEntry {
    /// `name-[epoch:]version-release.arch` of the package.
    pub nevra: String,
    pub repository: String,
    /// The request that selected this package.
    pub reldep: String,
}

/// Packages marked for installation, in the order they were marked.
#[derive(Clone, Debug, Default)]
pub struct InstallGoal {
    entries: Vec<GoalEntry>,
}

impl InstallGoal {
    /// Mark a package. Returns false if it was already marked.
    pub fn mark(&mut self, entry: GoalEntry) -> bool {
        if self.entries.iter().any(|e| e.nevra == entry.nevra) {
            false
        } else {
            self.entries.push(entry);
            true
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GoalEntry> {
        self.entries.iter()
    }
}

impl Display for InstallGoal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "Nothing to do.");
        }

        writeln!(f, "Packages to install:")?;
        for entry in &self.entries {
            writeln!(
                f,
                "  {} ({}) for {}",
                entry.nevra, entry.repository, entry.reldep
            )?;
        }

        Ok(())
    }
}

/// The set of packages available for installation.
#[derive(Debug, Default)]
pub struct PackageSack {
    packages: Vec<AvailablePackage>,
    by_name: HashMap<String, Vec<usize>>,
    by_provide: HashMap<String, Vec<usize>>,
    by_file: HashMap<String, Vec<usize>>,
    preferred_arches: Vec<String>,
    goal: InstallGoal,
}

impl PackageSack {
    /// Construct an empty instance preferring packages for the host architecture.
    pub fn new() -> Self {
        Self::with_arch(crate::spec::macros::host_arch())
    }

    /// Construct an empty instance preferring packages of `arch` and `noarch`.
    pub fn with_arch(arch: &str) -> Self {
        Self {
            preferred_arches: vec![arch.to_string(), "noarch".to_string()],
            ..Default::default()
        }
    }

    /// Add packages advertised by a repository.
    pub fn add_packages(&mut self, repository: &str, packages: impl IntoIterator<Item = Package>) {
        for package in packages {
            // Source packages can't satisfy build requirements.
            if package.arch == "src" || package.arch == "nosrc" {
                continue;
            }

            let index = self.packages.len();

            self.by_name
                .entry(package.name.clone())
                .or_default()
                .push(index);
            for provide in package.provide_names() {
                self.by_provide
                    .entry(provide.to_string())
                    .or_default()
                    .push(index);
            }
            for file in package.file_paths() {
                self.by_file.entry(file.to_string()).or_default().push(index);
            }

            self.packages.push(AvailablePackage {
                repository: repository.to_string(),
                package,
            });
        }
    }

    /// Load the primary metadata of a repository.
    ///
    /// Returns the number of packages the repository advertises.
    pub async fn load_repository(
        &mut self,
        name: &str,
        reader: &dyn RepositoryRootReader,
    ) -> Result<usize> {
        let metadata = reader.metadata_reader().await?;
        let primary = metadata.primary_packages().await?;
        let count = primary.packages.len();

        info!("loaded {} packages from repository {}", count, name);
        self.add_packages(name, primary.packages);

        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Find available packages satisfying a dependency, best candidates first.
    pub fn candidates(&self, dependency: &Dependency) -> Vec<&AvailablePackage> {
        if dependency.is_rich() {
            return vec![];
        }

        let indices = if dependency.name.starts_with('/') {
            self.by_file.get(&dependency.name)
        } else {
            self.by_name
                .get(&dependency.name)
                .or_else(|| self.by_provide.get(&dependency.name))
        };

        let mut candidates = indices
            .map(|indices| indices.iter().map(|i| &self.packages[*i]).collect::<Vec<_>>())
            .unwrap_or_default();

        // Stable sort keeps repository order within the same preference.
        candidates.sort_by_key(|candidate| {
            self.preferred_arches
                .iter()
                .position(|arch| arch == &candidate.package.arch)
                .unwrap_or(self.preferred_arches.len())
        });

        candidates
    }

    /// The packages marked for installation so far.
    pub fn goal(&self) -> &InstallGoal {
        &self.goal
    }
}

impl PackageInstaller for PackageSack {
    fn install(&mut self, reldep: &str) -> std::result::Result<(), InstallError> {
        let dependency = Dependency::from_str(reldep)
            .map_err(|e| InstallError::InvalidRequest(reldep.to_string(), e))?;

        let entry = match self.candidates(&dependency).first() {
            Some(candidate) => GoalEntry {
                nevra: candidate.package.nevra(),
                repository: candidate.repository.clone(),
                reldep: reldep.to_string(),
            },
            None => return Err(InstallError::NoMatch(reldep.to_string())),
        };

        debug!("{} satisfied by {}", reldep, entry.nevra);
        if !self.goal.mark(entry) {
            debug!("{} already marked for installation", reldep);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{repository::metadata::Primary, testutil::*},
    };

    fn sack() -> Result<PackageSack> {
        let primary = Primary::from_xml(
            &TestRepository::default()
                .package("make", &["make"], &["/usr/bin/make"])
                .package("zlib-devel", &["pkgconfig(zlib)", "zlib-devel"], &[])
                .package("gcc", &["gcc", "cc"], &["/usr/bin/gcc"])
                .primary_xml(),
        )?;

        let mut sack = PackageSack::with_arch("x86_64");
        sack.add_packages("fedora", primary.packages);

        Ok(sack)
    }

    #[test]
    fn resolve_requests() -> Result<()> {
        let mut sack = sack()?;
        assert_eq!(sack.len(), 3);

        sack.install("make >= 4.0")?;
        sack.install("pkgconfig(zlib)")?;
        sack.install("/usr/bin/gcc")?;
        sack.install("cc")?;

        let goal = sack.goal();
        assert_eq!(goal.len(), 3);
        assert_eq!(
            goal.iter().map(|e| e.nevra.as_str()).collect::<Vec<_>>(),
            vec![
                "make-1.0-1.x86_64",
                "zlib-devel-1.0-1.x86_64",
                "gcc-1.0-1.x86_64"
            ]
        );
        assert_eq!(goal.iter().next().map(|e| e.reldep.as_str()), Some("make >= 4.0"));
        assert!(goal.to_string().contains("gcc-1.0-1.x86_64 (fedora) for /usr/bin/gcc"));

        Ok(())
    }

    #[test]
    fn no_match() -> Result<()> {
        let mut sack = sack()?;

        assert!(matches!(
            sack.install("clang"),
            Err(InstallError::NoMatch(name)) if name == "clang"
        ));
        assert!(matches!(
            sack.install("/usr/bin/clang"),
            Err(InstallError::NoMatch(_))
        ));
        assert!(matches!(
            sack.install("(gcc or clang)"),
            Err(InstallError::NoMatch(_))
        ));
        assert!(matches!(
            sack.install("gcc >="),
            Err(InstallError::InvalidRequest(_, _))
        ));
        assert!(sack.goal().is_empty());
        assert_eq!(sack.goal().to_string(), "Nothing to do.\n");

        Ok(())
    }

    #[tokio::test]
    async fn load_filesystem_repository() -> Result<()> {
        let td = tempfile::tempdir()?;
        TestRepository::default()
            .package("make", &["make"], &[])
            .write_to(td.path())?;

        let mut sack = PackageSack::new();
        let reader = crate::repository::reader_from_str(&format!("{}", td.path().display()))?;
        assert_eq!(sack.load_repository("local", reader.as_ref()).await?, 1);

        sack.install("make")?;
        assert_eq!(sack.goal().len(), 1);

        Ok(())
    }
}
