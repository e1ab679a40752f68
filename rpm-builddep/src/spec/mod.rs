// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading of RPM spec files.

This is not a spec file builder. It evaluates just enough of the spec
language to know the build requirements of the source package the spec
would produce:

* Macro definitions (`%define`, `%global`, `%undefine`, `%bcond_with`,
  `%bcond_without`, `%bcond`) and expansion. See [macros].
* Conditionals (`%if`, `%elif`, `%else`, `%endif`, `%ifarch`, `%ifnarch`,
  `%ifos`, `%ifnos`). See [expression].
* Preamble tags of the main package and of `%package` sub-packages.

The content of build scripts, `%description`, `%files` and similar sections
is skipped.
*/

pub mod expression;
pub mod macros;

use {
    crate::{
        dependency::{parse_dependency_list, Dependency, DependencyError},
        diagnostics::{self, Level},
    },
    macros::MacroContext,
    std::{collections::BTreeMap, path::Path},
    thiserror::Error,
};

/// Tags that must be present in the main package preamble.
pub const REQUIRED_TAGS: &[&str] = &["Name", "Version", "Release", "Summary", "License"];

/// Preamble tags accepted but not interpreted.
const IGNORED_TAGS: &[&str] = &[
    "autoprov",
    "autoreq",
    "autoreqprov",
    "buildarch",
    "buildarchitectures",
    "buildconflicts",
    "buildoption",
    "buildroot",
    "buildsystem",
    "bugurl",
    "conflicts",
    "distribution",
    "docdir",
    "distag",
    "disttag",
    "enhances",
    "excludearch",
    "excludeos",
    "exclusivearch",
    "exclusiveos",
    "group",
    "icon",
    "modularitylabel",
    "nopatch",
    "nosource",
    "obsoletes",
    "orderwithrequires",
    "packager",
    "prefix",
    "prefixes",
    "prereq",
    "provides",
    "recommends",
    "removepathpostfixes",
    "requires",
    "sourcelicense",
    "suggests",
    "supplements",
    "url",
    "vcs",
    "vendor",
];

/// Main package tags whose value is also defined as a lowercase macro.
const MACRO_TAGS: &[&str] = &[
    "bugurl",
    "distribution",
    "epoch",
    "group",
    "license",
    "modularitylabel",
    "name",
    "packager",
    "release",
    "sourcelicense",
    "summary",
    "url",
    "vcs",
    "vendor",
    "version",
];

/// Section keywords that end the preamble.
const SECTIONS: &[&str] = &[
    "%build",
    "%changelog",
    "%check",
    "%clean",
    "%conf",
    "%description",
    "%filetriggerin",
    "%filetriggerpostun",
    "%filetriggerun",
    "%files",
    "%generate_buildrequires",
    "%install",
    "%post",
    "%posttrans",
    "%postun",
    "%pre",
    "%prep",
    "%pretrans",
    "%preun",
    "%sourcelist",
    "%patchlist",
    "%transfiletriggerin",
    "%transfiletriggerpostun",
    "%transfiletriggerun",
    "%triggerin",
    "%triggerpostun",
    "%triggerprein",
    "%triggerun",
    "%verifyscript",
];

/// Errors reading a spec file.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {0}: {1}")]
    Line(usize, Box<SpecError>),

    #[error("{0} field must be present in package: (main package)")]
    MissingTag(&'static str),

    #[error("line {0}: unclosed %if")]
    UnterminatedConditional(usize),

    #[error("{0} with no %if")]
    UnexpectedConditional(String),

    #[error("bad %if condition: {0}")]
    Expression(String),

    #[error("{0}")]
    Dependency(#[from] DependencyError),

    #[error("unterminated macro: {0}")]
    UnterminatedMacro(String),

    #[error("too many levels of recursion in macro expansion: {0}")]
    MacroRecursion(String),

    #[error("macro definition is malformed: {0}")]
    MacroDefinition(String),

    #[error("bad syntax: {0}")]
    TagInvalid(String),

    #[error("Unknown tag: {0}")]
    UnknownTag(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Section {
    /// Main package or `%package` preamble.
    Preamble,
    /// Any section we don't interpret.
    Other,
}

/// State of an open conditional block.
#[derive(Debug)]
struct Conditional {
    /// Line the block was opened on.
    line: usize,
    /// Whether the enclosing block is active.
    parent_active: bool,
    /// Whether the current branch is active.
    active: bool,
    /// Whether any branch has been taken.
    taken: bool,
    seen_else: bool,
}

/// Split a preamble line into its tag name, qualifier and value.
///
/// e.g. `BuildRequires(pre): foo` yields `("BuildRequires", Some("pre"), "foo")`.
fn split_tag(line: &str) -> Option<(&str, Option<&str>, &str)> {
    let (tag, value) = line.split_once(':')?;
    let tag = tag.trim_end();

    let (name, qualifier) = match tag.split_once('(') {
        Some((name, rest)) => (name, Some(rest.strip_suffix(')')?)),
        None => (tag, None),
    };

    if name.is_empty()
        || !name.starts_with(|c: char| c.is_ascii_alphabetic())
        || !name.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some((name, qualifier, value.trim()))
}

/// Whether `tag` is `prefix` optionally followed by a number (`Source0`, `Patch12`).
fn is_numbered_tag(tag: &str, prefix: &str) -> bool {
    tag.strip_prefix(prefix)
        .map(|rest| rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Incremental spec parser state.
struct SpecParser {
    macros: MacroContext,
    section: Section,
    conditionals: Vec<Conditional>,
    tags: BTreeMap<String, String>,
    packages: Vec<String>,
    build_requires: Vec<Dependency>,
}

impl SpecParser {
    fn active(&self) -> bool {
        self.conditionals
            .last()
            .map(|c| c.parent_active && c.active)
            .unwrap_or(true)
    }

    fn evaluate_condition(&self, keyword: &str, argument: &str) -> Result<bool, SpecError> {
        let argument = self.macros.expand(argument)?;

        let (macro_name, negate) = match keyword {
            "%if" | "%elif" => return Ok(expression::evaluate(&argument)?.is_true()),
            "%ifarch" => ("_target_cpu", false),
            "%ifnarch" => ("_target_cpu", true),
            "%ifos" => ("_target_os", false),
            _ => ("_target_os", true),
        };

        let current = self.macros.get(macro_name).unwrap_or_default();
        let matched = argument
            .split(|c: char| c.is_whitespace() || c == ',')
            .any(|candidate| candidate == current);

        Ok(matched != negate)
    }

    /// Handle a conditional directive. Returns false if `keyword` isn't one.
    fn conditional(
        &mut self,
        line_number: usize,
        keyword: &str,
        argument: &str,
    ) -> Result<bool, SpecError> {
        match keyword {
            "%if" | "%ifarch" | "%ifnarch" | "%ifos" | "%ifnos" => {
                let parent_active = self.active();
                // Conditions in skipped blocks are not evaluated.
                let active = parent_active && self.evaluate_condition(keyword, argument)?;

                self.conditionals.push(Conditional {
                    line: line_number,
                    parent_active,
                    active,
                    taken: active,
                    seen_else: false,
                });
            }
            "%elif" => {
                let frame = match self.conditionals.last() {
                    Some(frame) if !frame.seen_else => frame,
                    _ => return Err(SpecError::UnexpectedConditional(keyword.to_string())),
                };

                let active = if frame.taken || !frame.parent_active {
                    false
                } else {
                    self.evaluate_condition(keyword, argument)?
                };

                if let Some(frame) = self.conditionals.last_mut() {
                    frame.active = active;
                    frame.taken |= active;
                }
            }
            "%else" => match self.conditionals.last_mut() {
                Some(frame) if !frame.seen_else => {
                    frame.active = !frame.taken;
                    frame.taken = true;
                    frame.seen_else = true;
                }
                _ => return Err(SpecError::UnexpectedConditional(keyword.to_string())),
            },
            "%endif" => {
                if self.conditionals.pop().is_none() {
                    return Err(SpecError::UnexpectedConditional(keyword.to_string()));
                }
            }
            _ => return Ok(false),
        }

        Ok(true)
    }

    /// Handle a macro definition directive. Returns false if `keyword` isn't one.
    fn definition(&mut self, keyword: &str, argument: &str) -> Result<bool, SpecError> {
        let argument = argument.trim();

        match keyword {
            "%define" | "%global" => {
                let (name, body) = argument
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| SpecError::MacroDefinition(argument.to_string()))?;
                // Parametric macros are defined like plain ones. Their options are ignored.
                let name = name.split('(').next().unwrap_or(name);
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(SpecError::MacroDefinition(argument.to_string()));
                }

                let body = body.trim().replace("\\\n", "\n");
                let body = if keyword == "%global" {
                    self.macros.expand(&body)?
                } else {
                    body
                };

                self.macros.define(name, body);
            }
            "%undefine" => {
                self.macros.undefine(argument);
            }
            "%bcond_with" => {
                self.macros.declare_build_condition(argument, false);
            }
            "%bcond_without" => {
                self.macros.declare_build_condition(argument, true);
            }
            "%bcond" => {
                let (name, default) = argument
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| SpecError::MacroDefinition(argument.to_string()))?;
                let default = expression::evaluate(&self.macros.expand(default.trim())?)?;
                self.macros.declare_build_condition(name, default.is_true());
            }
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn tag(&mut self, name: &str, qualifier: Option<&str>, value: &str) -> Result<(), SpecError> {
        let value = self.macros.expand(value)?;
        let lower = name.to_ascii_lowercase();

        match lower.as_str() {
            "name" | "version" | "release" | "epoch" => {
                if value.is_empty() || value.contains(char::is_whitespace) {
                    return Err(SpecError::TagInvalid(format!("{}: {}", name, value)));
                }
                // Sub-package preambles cannot rename the source package.
                if self.packages.is_empty() {
                    self.tags.insert(lower.clone(), value.clone());
                }
            }
            "summary" | "license" => {
                if self.packages.is_empty() {
                    self.tags.insert(lower.clone(), value.clone());
                }
            }
            "buildrequires" | "buildprereq" => {
                if let Some(qualifier) = qualifier {
                    diagnostics::emit(
                        Level::Debug,
                        format!("treating {}({}) as BuildRequires", name, qualifier),
                    );
                }
                self.build_requires.extend(parse_dependency_list(&value)?);
            }
            tag if is_numbered_tag(tag, "source")
                || is_numbered_tag(tag, "patch")
                || IGNORED_TAGS.contains(&tag) => {}
            _ => return Err(SpecError::UnknownTag(name.to_string())),
        }

        if self.packages.is_empty() && MACRO_TAGS.contains(&lower.as_str()) {
            self.macros.define(&lower, &value);
        }

        Ok(())
    }

    fn preamble_line(&mut self, line: &str, expanded: bool) -> Result<(), SpecError> {
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }

        if trimmed.starts_with('%') {
            if expanded {
                let (keyword, argument) = trimmed
                    .split_once(char::is_whitespace)
                    .unwrap_or((trimmed, ""));
                if !self.definition(keyword, argument)? {
                    diagnostics::emit(Level::Debug, format!("ignoring directive: {}", trimmed));
                }
                return Ok(());
            }

            // Macros in the preamble may expand to tags.
            let expansion = self.macros.expand(trimmed)?;
            for expanded_line in expansion.lines() {
                self.preamble_line(expanded_line, true)?;
            }
            return Ok(());
        }

        match split_tag(trimmed) {
            Some((name, qualifier, value)) => self.tag(name, qualifier, value),
            None => Err(SpecError::UnknownTag(trimmed.to_string())),
        }
    }

    fn line(&mut self, line_number: usize, line: &str) -> Result<(), SpecError> {
        let trimmed = line.trim_start();
        let (keyword, argument) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));

        if self.conditional(line_number, keyword, argument)? || !self.active() {
            return Ok(());
        }

        if self.definition(keyword, argument)? {
            return Ok(());
        }

        if keyword == "%package" {
            let argument = self.macros.expand(argument.trim())?;
            let name = match argument.strip_prefix("-n") {
                Some(name) => name.trim().to_string(),
                None => format!(
                    "{}-{}",
                    self.tags.get("name").map(|s| s.as_str()).unwrap_or_default(),
                    argument
                ),
            };
            self.packages.push(name);
            self.section = Section::Preamble;
            return Ok(());
        }

        if SECTIONS.contains(&keyword) {
            self.section = Section::Other;
            return Ok(());
        }

        if keyword == "%include" {
            diagnostics::emit(
                Level::Warning,
                format!("%include not supported: {}", argument.trim()),
            );
            return Ok(());
        }

        match self.section {
            Section::Preamble => self.preamble_line(line, false),
            Section::Other => Ok(()),
        }
    }
}

/// Join lines of multi-line macro definitions ended by a backslash.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut res: Vec<(usize, String)> = vec![];
    let mut continuing = false;

    for (index, line) in text.lines().enumerate() {
        if continuing {
            if let Some((_, current)) = res.last_mut() {
                current.push('\n');
                current.push_str(line);
            }
        } else {
            res.push((index + 1, line.to_string()));
        }

        let is_definition = res
            .last()
            .map(|(_, l)| {
                let l = l.trim_start();
                l.starts_with("%define") || l.starts_with("%global")
            })
            .unwrap_or(false);

        continuing = is_definition && line.ends_with('\\');
    }

    res
}

/// The build-relevant content of a spec file.
#[derive(Clone, Debug)]
pub struct SpecFile {
    tags: BTreeMap<String, String>,
    packages: Vec<String>,
    build_requires: Vec<Dependency>,
    macros: MacroContext,
}

impl SpecFile {
    /// Parse spec file content, starting from the given macro definitions.
    pub fn parse(text: &str, macros: MacroContext) -> Result<Self, SpecError> {
        let mut parser = SpecParser {
            macros,
            section: Section::Preamble,
            conditionals: vec![],
            tags: BTreeMap::new(),
            packages: vec![],
            build_requires: vec![],
        };

        for (line_number, line) in logical_lines(text) {
            parser
                .line(line_number, &line)
                .map_err(|e| SpecError::Line(line_number, Box::new(e)))?;
        }

        if let Some(frame) = parser.conditionals.last() {
            return Err(SpecError::UnterminatedConditional(frame.line));
        }

        for tag in REQUIRED_TAGS {
            if !parser.tags.contains_key(&tag.to_ascii_lowercase()) {
                return Err(SpecError::MissingTag(*tag));
            }
        }

        let mut build_requires = parser.build_requires;
        build_requires.sort();
        build_requires.dedup();

        Ok(Self {
            tags: parser.tags,
            packages: parser.packages,
            build_requires,
            macros: parser.macros,
        })
    }

    /// Read and parse a spec file from the filesystem.
    pub fn from_path(path: impl AsRef<Path>, macros: MacroContext) -> Result<Self, SpecError> {
        let text = std::fs::read_to_string(path)?;

        Self::parse(&text, macros)
    }

    /// Obtain the value of a main package preamble tag. Case insensitive.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn name(&self) -> Option<&str> {
        self.tag("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.tag("version")
    }

    pub fn release(&self) -> Option<&str> {
        self.tag("release")
    }

    /// Names of sub-packages declared with `%package`.
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Requirements of the source package this spec builds, sorted and deduplicated.
    pub fn build_requires(&self) -> &[Dependency] {
        &self.build_requires
    }

    /// Macro definitions in effect at the end of the spec file.
    pub fn macros(&self) -> &MacroContext {
        &self.macros
    }
}
