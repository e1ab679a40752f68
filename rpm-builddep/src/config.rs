// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration file.

A YAML document. Every key is optional:

```yaml
repositories:
  - name: fedora
    url: https://dl.fedoraproject.org/pub/fedora/linux/releases/39/Everything/x86_64/os
  - name: local
    url: /srv/repo
    enabled: false
gpgcheck: true
keyring_dirs:
  - /etc/pki/rpm-gpg
defines:
  fedora: "39"
```
*/

use {
    crate::{
        error::{BuildDepError, Result},
        keyring::DEFAULT_KEYRING_DIR,
    },
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, path::Path},
};

fn default_true() -> bool {
    true
}

fn default_keyring_dirs() -> Vec<String> {
    vec![DEFAULT_KEYRING_DIR.to_string()]
}

/// A package repository.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RepositoryConfig {
    /// Name used in messages.
    pub name: String,

    /// URL or filesystem path of the repository root.
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Configuration of the builddep tool.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BuildDepConfig {
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,

    /// Whether signatures of source packages are verified.
    #[serde(default = "default_true")]
    pub gpgcheck: bool,

    /// Directories holding trusted public keys.
    #[serde(default = "default_keyring_dirs")]
    pub keyring_dirs: Vec<String>,

    /// Macros defined when reading spec files.
    #[serde(default)]
    pub defines: BTreeMap<String, String>,
}

impl Default for BuildDepConfig {
    fn default() -> Self {
        Self {
            repositories: vec![],
            gpgcheck: true,
            keyring_dirs: default_keyring_dirs(),
            defines: BTreeMap::new(),
        }
    }
}

impl BuildDepConfig {
    pub fn from_yaml(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .map_err(|e| BuildDepError::IoPath(format!("{}", path.display()), e))?;

        Ok(serde_yaml::from_reader(f)?)
    }

    /// Add a repository given only its URL. It is named after its position.
    pub fn add_repository_url(&mut self, url: impl ToString) {
        let name = format!("cmdline-{}", self.repositories.len());

        self.repositories.push(RepositoryConfig {
            name,
            url: url.to_string(),
            enabled: true,
        });
    }

    pub fn enabled_repositories(&self) -> impl Iterator<Item = &RepositoryConfig> {
        self.repositories.iter().filter(|repo| repo.enabled)
    }
}

/// Parse a `NAME VALUE` macro definition given on the command line.
pub fn parse_define(s: &str) -> Result<(String, String)> {
    let s = s.trim();

    match s.split_once(char::is_whitespace) {
        Some((name, value)) if !name.is_empty() => {
            Ok((name.trim_start_matches('%').to_string(), value.trim().to_string()))
        }
        _ => Err(BuildDepError::MacroDefinitionInvalid(s.to_string())),
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    #[test]
    fn defaults() -> Result<()> {
        let config = BuildDepConfig::from_yaml("{}")?;

        assert_eq!(config, BuildDepConfig::default());
        assert!(config.gpgcheck);
        assert_eq!(config.keyring_dirs, vec![DEFAULT_KEYRING_DIR.to_string()]);

        Ok(())
    }

    #[test]
    fn full() -> Result<()> {
        let mut config = BuildDepConfig::from_yaml(indoc! {"
            repositories:
              - name: fedora
                url: https://example.com/fedora
              - name: disabled
                url: /srv/repo
                enabled: false
            gpgcheck: false
            keyring_dirs: []
            defines:
              fedora: '39'
        "})?;

        assert!(!config.gpgcheck);
        assert!(config.keyring_dirs.is_empty());
        assert_eq!(config.defines.get("fedora").map(|s| s.as_str()), Some("39"));

        config.add_repository_url("file:///srv/other");
        assert_eq!(
            config
                .enabled_repositories()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>(),
            vec!["fedora", "cmdline-2"]
        );

        Ok(())
    }

    #[test]
    fn from_path() -> Result<()> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("builddep.yaml");
        std::fs::write(&path, "gpgcheck: false\n")?;

        assert!(!BuildDepConfig::from_path(&path)?.gpgcheck);
        assert!(matches!(
            BuildDepConfig::from_path(td.path().join("missing.yaml")),
            Err(BuildDepError::IoPath(_, _))
        ));
        assert!(matches!(
            BuildDepConfig::from_yaml("gpgcheck: [1"),
            Err(BuildDepError::SerdeYaml(_))
        ));

        Ok(())
    }

    #[test]
    fn defines() -> Result<()> {
        assert_eq!(
            parse_define("fedora 39")?,
            ("fedora".to_string(), "39".to_string())
        );
        assert_eq!(
            parse_define("%_with_tests  1")?,
            ("_with_tests".to_string(), "1".to_string())
        );
        assert!(parse_define("lonely").is_err());

        Ok(())
    }
}
