// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Spec file macro expansion.

Supported forms:

* `%name` and `%{name}`: replaced by the (recursively expanded) body. Undefined
  macros are left verbatim.
* `%{?name}`: the body if defined, otherwise nothing.
* `%{!?name}`: always nothing.
* `%{?name:text}` / `%{!?name:text}`: `text` if `name` is (not) defined.
* `%{expand:text}`: `text`, expanded twice.
* `%{defined:name}` / `%{undefined:name}`: `1` or `0`.
* `%{with name}` / `%{without name}`: `1` or `0` depending on the build
  condition declared with `%bcond_with`, `%bcond_without` or `%bcond`.
* `%%`: a literal `%`.

Shell (`%(...)`) and Lua (`%{lua:...}`) expansions are not evaluated. They
expand to nothing and emit a diagnostic.
*/

use {
    super::SpecError,
    crate::diagnostics::{self, Level},
    std::collections::HashMap,
};

/// Maximum nesting of macro expansion before bailing out.
const MAX_EXPANSION_DEPTH: usize = 64;

/// Architectures matched by the `%{ix86}` macro.
const IX86_ARCHES: &str = "i386 i486 i586 i686 pentium3 pentium4 athlon geode";

/// The RPM name of the architecture we are running on.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i686",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        arch => arch,
    }
}

/// The RPM name of the operating system we are running on.
pub fn host_os() -> &'static str {
    std::env::consts::OS
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Find the index of the delimiter closing the group opened just before `s`.
fn find_closing(s: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 1usize;

    for (i, c) in s.char_indices() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }

    None
}

/// A set of macro definitions.
#[derive(Clone, Debug)]
pub struct MacroContext {
    macros: HashMap<String, String>,
}

impl Default for MacroContext {
    fn default() -> Self {
        let mut slf = Self {
            macros: HashMap::new(),
        };

        slf.define("nil", "");
        slf.define("_arch", host_arch());
        slf.define("_target_cpu", host_arch());
        slf.define("_target_os", host_os());
        slf.define("_host_os", host_os());
        slf.define("ix86", IX86_ARCHES);

        slf
    }
}

impl MacroContext {
    /// Construct an instance with the built-in definitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a macro. The body is expanded lazily on use.
    pub fn define(&mut self, name: impl ToString, body: impl ToString) {
        self.macros.insert(name.to_string(), body.to_string());
    }

    pub fn undefine(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.macros.get(name).map(|s| s.as_str())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Declare a build condition, as `%bcond` does.
    ///
    /// The condition is enabled when `default` is true, unless overridden by
    /// `_with_<name>` or `_without_<name>` (which `rpmbuild --with`/`--without`
    /// define).
    pub fn declare_build_condition(&mut self, name: &str, default: bool) {
        let enabled = if default {
            !self.is_defined(&format!("_without_{}", name))
        } else {
            self.is_defined(&format!("_with_{}", name))
        };

        if enabled {
            self.define(format!("with_{}", name), "1");
        }
    }

    /// Expand all macros in `text`.
    pub fn expand(&self, text: &str) -> Result<String, SpecError> {
        self.expand_depth(text, 0)
    }

    fn expand_depth(&self, text: &str, depth: usize) -> Result<String, SpecError> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(SpecError::MacroRecursion(text.to_string()));
        }

        let mut out = String::with_capacity(text.len());
        let mut position = 0;

        while let Some(offset) = text[position..].find('%') {
            let start = position + offset;
            out.push_str(&text[position..start]);
            let rest = &text[start + 1..];

            if let Some(after) = rest.strip_prefix('%') {
                out.push('%');
                position = text.len() - after.len();
            } else if let Some(inner_and_rest) = rest.strip_prefix('{') {
                let close = find_closing(inner_and_rest, '{', '}')
                    .ok_or_else(|| SpecError::UnterminatedMacro(text[start..].to_string()))?;
                out.push_str(&self.expand_braced(&inner_and_rest[..close], depth)?);
                position = text.len() - inner_and_rest[close + 1..].len();
            } else if let Some(inner_and_rest) = rest.strip_prefix('(') {
                let close = find_closing(inner_and_rest, '(', ')')
                    .ok_or_else(|| SpecError::UnterminatedMacro(text[start..].to_string()))?;
                diagnostics::emit(
                    Level::Warning,
                    format!(
                        "shell expansion not supported: %({})",
                        &inner_and_rest[..close]
                    ),
                );
                position = text.len() - inner_and_rest[close + 1..].len();
            } else if rest.starts_with(|c: char| c == '?' || c == '!') {
                let flags_len = rest.len() - rest.trim_start_matches(['?', '!']).len();
                let name_len = rest[flags_len..]
                    .find(|c| !is_name_char(c))
                    .unwrap_or(rest.len() - flags_len);
                let inner = &rest[..flags_len + name_len];
                out.push_str(&self.expand_braced(inner, depth)?);
                position = start + 1 + inner.len();
            } else if rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
                let name_len = rest.find(|c| !is_name_char(c)).unwrap_or(rest.len());
                let name = &rest[..name_len];

                match self.get(name) {
                    Some(body) => out.push_str(&self.expand_depth(body, depth + 1)?),
                    None => {
                        out.push('%');
                        out.push_str(name);
                    }
                }
                position = start + 1 + name_len;
            } else {
                out.push('%');
                position = start + 1;
            }
        }

        out.push_str(&text[position..]);

        Ok(out)
    }

    fn expand_braced(&self, inner: &str, depth: usize) -> Result<String, SpecError> {
        let mut s = inner;
        let mut negate = false;
        let mut conditional = false;

        loop {
            if let Some(stripped) = s.strip_prefix('!') {
                negate = !negate;
                s = stripped;
            } else if let Some(stripped) = s.strip_prefix('?') {
                conditional = true;
                s = stripped;
            } else {
                break;
            }
        }

        let (name, alternate) = match s.find(':') {
            Some(colon) => (&s[..colon], Some(&s[colon + 1..])),
            None => (s, None),
        };

        if !conditional {
            match (name, alternate) {
                ("expand", Some(text)) => {
                    let once = self.expand_depth(text, depth + 1)?;
                    return self.expand_depth(&once, depth + 1);
                }
                ("defined", Some(text)) | ("undefined", Some(text)) => {
                    let defined = self.is_defined(self.expand_depth(text, depth + 1)?.trim());
                    return Ok(if defined == (name == "defined") {
                        "1".to_string()
                    } else {
                        "0".to_string()
                    });
                }
                ("lua", Some(_)) => {
                    diagnostics::emit(Level::Warning, "lua macros not supported");
                    return Ok(String::new());
                }
                _ => {}
            }

            if let Some((function, argument)) = name.split_once(char::is_whitespace) {
                let argument = self.expand_depth(argument.trim(), depth + 1)?;
                let enabled = self.is_defined(&format!("with_{}", argument));

                match function {
                    "with" => return Ok(if enabled { "1" } else { "0" }.to_string()),
                    "without" => return Ok(if enabled { "0" } else { "1" }.to_string()),
                    _ => {}
                }
            }

            return match self.get(name) {
                Some(body) => self.expand_depth(body, depth + 1),
                None => Ok(format!("%{{{}}}", inner)),
            };
        }

        let defined = self.is_defined(name);

        match alternate {
            Some(text) if defined != negate => self.expand_depth(text, depth + 1),
            Some(_) => Ok(String::new()),
            None if defined && !negate => match self.get(name) {
                Some(body) => self.expand_depth(body, depth + 1),
                None => Ok(String::new()),
            },
            None => Ok(String::new()),
        }
    }
}
