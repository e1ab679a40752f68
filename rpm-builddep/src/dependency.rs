// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RPM dependency expressions.

A dependency is a name, an optional comparison sense and an optional
`[epoch:]version[-release]` string. In RPM headers these live in three
parallel tags (`REQUIRENAME`, `REQUIREFLAGS` and `REQUIREVERSION`). In spec
files they are written as lists like `gcc, make >= 4.0 (foo or bar)`.

The textual form emitted by [Dependency::to_reldep_string()] is what package
managers accept as an install request.
*/

use {
    bitflags::bitflags,
    std::{
        fmt::{Display, Formatter},
        str::FromStr,
    },
    thiserror::Error,
};

/// Name prefix of dependencies that are satisfied by the RPM implementation itself.
pub const RPMLIB_PREFIX: &str = "rpmlib(";

/// Characters besides ASCII alphanumerics allowed in a version string.
const VERSION_EXTRA_CHARS: &str = ".-_+:%{}~^";

bitflags! {
    /// Dependency flags, as stored in the `REQUIREFLAGS` header tag.
    ///
    /// Only the comparison sense and the rpmlib marker are modeled. Other bits
    /// (script contexts, etc) are discarded when constructing from raw values.
    pub struct DependencyFlags: u32 {
        const LESS = 1 << 1;
        const GREATER = 1 << 2;
        const EQUAL = 1 << 3;
        const RPMLIB = 1 << 24;
    }
}

impl DependencyFlags {
    /// Bits expressing the version comparison.
    pub const SENSE_MASK: Self = Self {
        bits: Self::LESS.bits | Self::GREATER.bits | Self::EQUAL.bits,
    };

    /// Construct from a raw `REQUIREFLAGS` value.
    pub fn from_raw(value: u32) -> Self {
        Self::from_bits_truncate(value)
    }

    /// Resolve flags from a comparison operator token.
    pub fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            "<" => Self::LESS,
            ">" => Self::GREATER,
            "=" | "==" => Self::EQUAL,
            "<=" | "=<" => Self::LESS | Self::EQUAL,
            ">=" | "=>" => Self::GREATER | Self::EQUAL,
            _ => return None,
        })
    }

    /// The comparison operator for the sense bits, if any are set.
    pub fn operator(&self) -> Option<String> {
        if self.intersects(Self::SENSE_MASK) {
            let mut op = String::with_capacity(2);
            if self.contains(Self::LESS) {
                op.push('<');
            }
            if self.contains(Self::GREATER) {
                op.push('>');
            }
            if self.contains(Self::EQUAL) {
                op.push('=');
            }

            Some(op)
        } else {
            None
        }
    }
}

/// Errors related to dependency handling.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("Dependency tokens must begin with alpha-numeric, '_' or '/': {0}")]
    BadToken(String),

    #[error("Versioned dependency is missing a version: {0}")]
    MissingVersion(String),

    #[error("Invalid version in dependency {0}: {1}")]
    IllegalVersion(String, String),

    #[error("unbalanced parentheses in rich dependency: {0}")]
    UnbalancedParentheses(String),

    #[error("expected a single dependency expression: {0}")]
    NotSingle(String),
}

/// Result type for dependency handling.
pub type Result<T> = std::result::Result<T, DependencyError>;

/// A single dependency.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Dependency {
    /// Name of the capability. Rich dependencies keep their parenthesized expression here.
    pub name: String,
    /// `[epoch:]version[-release]` constraint. Empty if unversioned.
    pub evr: String,
    /// Comparison flags.
    pub flags: DependencyFlags,
}

impl Dependency {
    pub fn new(name: impl ToString, flags: DependencyFlags, evr: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            evr: evr.to_string(),
            flags,
        }
    }

    /// Construct a dependency on a name without a version constraint.
    pub fn unversioned(name: impl ToString) -> Self {
        Self::new(name, DependencyFlags::empty(), "")
    }

    /// Whether this is a rich (boolean) dependency like `(foo or bar)`.
    pub fn is_rich(&self) -> bool {
        self.name.starts_with('(')
    }

    /// Whether this dependency names a capability provided by RPM itself.
    ///
    /// These only make sense to the RPM implementation building the package and
    /// can never be installed.
    pub fn is_rpmlib(&self) -> bool {
        self.name.starts_with(RPMLIB_PREFIX)
    }

    /// Render as a string suitable for an install request.
    ///
    /// e.g. `gcc`, `make >= 4.0` or `(foo or bar)`.
    pub fn to_reldep_string(&self) -> String {
        let mut s = self.name.clone();

        if let Some(op) = self.flags.operator() {
            s.push(' ');
            s.push_str(&op);
        }
        if !self.evr.is_empty() {
            s.push(' ');
            s.push_str(&self.evr);
        }

        s
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_reldep_string())
    }
}

impl FromStr for Dependency {
    type Err = DependencyError;

    /// Parse a single reldep string.
    fn from_str(s: &str) -> Result<Self> {
        let mut deps = parse_dependency_list(s)?;

        if deps.len() == 1 {
            Ok(deps.remove(0))
        } else {
            Err(DependencyError::NotSingle(s.to_string()))
        }
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=')
}

fn skip_separators(s: &str) -> &str {
    s.trim_start_matches(is_separator)
}

/// Split a leading parenthesized expression off `s`, honoring nesting.
fn split_rich(s: &str) -> Result<(&str, &str)> {
    let mut depth = 0usize;

    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(s.split_at(i + 1));
                }
            }
            _ => {}
        }
    }

    Err(DependencyError::UnbalancedParentheses(s.to_string()))
}

/// Parse a dependency list, as found in the value of a `BuildRequires:` tag.
///
/// Entries are separated by whitespace and/or commas. Each name may be followed by
/// a comparison operator and a version. Operators may be adjacent to the name
/// (`foo>=1.0`). Parenthesized rich dependencies are retained verbatim.
pub fn parse_dependency_list(s: &str) -> Result<Vec<Dependency>> {
    let mut res = vec![];
    let mut remaining = skip_separators(s);

    while let Some(first) = remaining.chars().next() {
        let (name, rest) = if first == '(' {
            split_rich(remaining)?
        } else if first.is_ascii_alphanumeric() || first == '_' || first == '/' {
            let end = remaining
                .find(|c| is_separator(c) || is_operator_char(c))
                .unwrap_or(remaining.len());
            remaining.split_at(end)
        } else {
            let token = remaining
                .split(is_separator)
                .next()
                .unwrap_or(remaining)
                .to_string();
            return Err(DependencyError::BadToken(token));
        };

        // Peek at the next token for a comparison operator.
        let after_name = rest.trim_start_matches(char::is_whitespace);
        let op_len = after_name
            .find(|c| !is_operator_char(c))
            .unwrap_or(after_name.len());

        if op_len == 0 {
            res.push(Dependency::unversioned(name));
            remaining = skip_separators(rest);
            continue;
        }

        let (op, rest) = after_name.split_at(op_len);
        let flags = DependencyFlags::from_operator(op)
            .ok_or_else(|| DependencyError::BadToken(op.to_string()))?;

        let rest = rest.trim_start_matches(char::is_whitespace);
        let version_len = rest.find(is_separator).unwrap_or(rest.len());
        let (evr, rest) = rest.split_at(version_len);

        if evr.is_empty() {
            return Err(DependencyError::MissingVersion(format!("{} {}", name, op)));
        }
        if let Some(c) = evr
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !VERSION_EXTRA_CHARS.contains(*c))
        {
            return Err(DependencyError::IllegalVersion(
                name.to_string(),
                format!("illegal character '{}' in {}", c, evr),
            ));
        }

        res.push(Dependency::new(name, flags, evr));
        remaining = skip_separators(rest);
    }

    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reldep_strings() {
        assert_eq!(Dependency::unversioned("gcc").to_reldep_string(), "gcc");
        assert_eq!(
            Dependency::new("make", DependencyFlags::GREATER | DependencyFlags::EQUAL, "4.0")
                .to_reldep_string(),
            "make >= 4.0"
        );
        assert_eq!(
            Dependency::new("glibc", DependencyFlags::LESS, "2:2.34-1").to_reldep_string(),
            "glibc < 2:2.34-1"
        );
        assert_eq!(
            Dependency::new(
                "rpmlib(CompressedFileNames)",
                DependencyFlags::from_raw(0x0100_0008 | 0x2),
                "3.0.4-1"
            )
            .to_reldep_string(),
            "rpmlib(CompressedFileNames) <= 3.0.4-1"
        );
    }

    #[test]
    fn flags_discard_unknown_bits() {
        // RPMSENSE_FIND_REQUIRES (1 << 14) is not modeled.
        let flags = DependencyFlags::from_raw((1 << 14) | 8);
        assert_eq!(flags, DependencyFlags::EQUAL);
        assert_eq!(flags.operator().as_deref(), Some("="));
        assert!(DependencyFlags::from_raw(1 << 24).operator().is_none());
    }

    #[test]
    fn rpmlib_detection() {
        assert!(Dependency::unversioned("rpmlib(FileDigests)").is_rpmlib());
        assert!(!Dependency::unversioned("rpmlibfoo").is_rpmlib());
        assert!(!Dependency::unversioned("librpm").is_rpmlib());
    }

    #[test]
    fn parse_list() -> Result<()> {
        let deps = parse_dependency_list("gcc, make >= 4.0  zlib-devel,pkgconfig(glib-2.0)")?;

        assert_eq!(
            deps,
            vec![
                Dependency::unversioned("gcc"),
                Dependency::new("make", DependencyFlags::GREATER | DependencyFlags::EQUAL, "4.0"),
                Dependency::unversioned("zlib-devel"),
                Dependency::unversioned("pkgconfig(glib-2.0)"),
            ]
        );

        Ok(())
    }

    #[test]
    fn parse_adjacent_operator() -> Result<()> {
        let deps = parse_dependency_list("foo>=1.0 bar =< 2 baz==3")?;

        assert_eq!(deps[0].to_reldep_string(), "foo >= 1.0");
        assert_eq!(deps[1].to_reldep_string(), "bar <= 2");
        assert_eq!(deps[2].to_reldep_string(), "baz = 3");

        Ok(())
    }

    #[test]
    fn parse_rich() -> Result<()> {
        let deps = parse_dependency_list("(foo or (bar and baz)), /usr/bin/python3")?;

        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name, "(foo or (bar and baz))");
        assert!(deps[0].is_rich());
        assert_eq!(deps[1].name, "/usr/bin/python3");

        assert!(matches!(
            parse_dependency_list("(foo or bar"),
            Err(DependencyError::UnbalancedParentheses(_))
        ));

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            parse_dependency_list("foo >="),
            Err(DependencyError::MissingVersion(_))
        ));
        assert!(matches!(
            parse_dependency_list("foo >= 1.0$"),
            Err(DependencyError::IllegalVersion(_, _))
        ));
        assert!(matches!(
            parse_dependency_list("-foo"),
            Err(DependencyError::BadToken(_))
        ));
        assert!(matches!(
            parse_dependency_list("foo <> 1"),
            Err(DependencyError::BadToken(_))
        ));
    }

    #[test]
    fn from_str_single() -> Result<()> {
        let dep = Dependency::from_str("python3-devel >= 3.9")?;
        assert_eq!(dep.name, "python3-devel");
        assert_eq!(dep.evr, "3.9");

        assert!(matches!(
            Dependency::from_str("a b"),
            Err(DependencyError::NotSingle(_))
        ));

        Ok(())
    }
}
