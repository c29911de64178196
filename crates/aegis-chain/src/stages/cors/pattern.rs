//! Ant-style path patterns for CORS mappings.
//!
//! | Syntax    | Matches                                   |
//! |-----------|-------------------------------------------|
//! | `api`     | the literal segment `api`                 |
//! | `*.json`  | one segment; `*` is any run, `?` one char |
//! | `{id}`    | exactly one segment                       |
//! | `**`      | zero or more segments (last segment only) |
//!
//! Empty segments are ignored on both sides, so `/api/` and `/api` are the
//! same path.

use aegis_core::{ConfigurationError, ConfigurationResult};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// A compiled path pattern.
///
/// # Example
///
/// ```
/// use aegis_chain::PathPattern;
///
/// let pattern: PathPattern = "/api/**".parse().unwrap();
/// assert!(pattern.matches("/api"));
/// assert!(pattern.matches("/api/widgets/42"));
/// assert!(!pattern.matches("/admin"));
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    regex: Regex,
}

impl PathPattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidPathPattern` if the pattern does
    /// not start with `/`, uses `**` anywhere but as the final segment, or
    /// contains a malformed `{name}` segment.
    pub fn parse(pattern: &str) -> ConfigurationResult<Self> {
        let invalid = |reason: &str| ConfigurationError::invalid_path_pattern(pattern, reason);

        if !pattern.starts_with('/') {
            return Err(invalid("pattern must start with '/'"));
        }

        let parts: Vec<&str> = split_path(pattern).collect();
        let mut compiled = String::from("^");

        for (index, part) in parts.iter().enumerate() {
            if *part == "**" {
                if index + 1 != parts.len() {
                    return Err(invalid("'**' is only allowed as the last segment"));
                }
                compiled.push_str("(?:/.*)?");
                continue;
            }

            compiled.push('/');

            if part.contains("**") {
                return Err(invalid("'**' must be a whole segment"));
            } else if let Some(name) = part.strip_prefix('{') {
                match name.strip_suffix('}') {
                    Some(name) if !name.is_empty() && !name.contains(&['{', '}'][..]) => {
                        compiled.push_str("[^/]+");
                    }
                    _ => return Err(invalid("malformed '{name}' segment")),
                }
            } else if part.contains(&['{', '}'][..]) {
                return Err(invalid("'{name}' must be a whole segment"));
            } else {
                push_glob(&mut compiled, part);
            }
        }

        if parts.is_empty() {
            compiled.push('/');
        }
        compiled.push('$');

        let regex = Regex::new(&compiled).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true if `path` matches this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let mut normalized = String::with_capacity(path.len().max(1));
        for part in split_path(path) {
            normalized.push('/');
            normalized.push_str(part);
        }
        if normalized.is_empty() {
            normalized.push('/');
        }

        self.regex.is_match(&normalized)
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PathPattern {}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Appends one segment to `compiled`: `*` is any run within the segment,
/// `?` one character, everything else literal.
fn push_glob(compiled: &mut String, segment: &str) {
    let mut literal = String::new();
    for c in segment.chars() {
        let wildcard = match c {
            '*' => "[^/]*",
            '?' => "[^/]",
            _ => {
                literal.push(c);
                continue;
            }
        };
        compiled.push_str(&regex::escape(&literal));
        literal.clear();
        compiled.push_str(wildcard);
    }
    compiled.push_str(&regex::escape(&literal));
}

impl FromStr for PathPattern {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
