//! Package and project name validation.

use std::fmt;
use std::str::FromStr;

use crate::error::{PkgmetaError, Result};

// Platform-reserved and otherwise unusable names.
const ILLEGAL_NAMES: &[&str] = &[
    "build", "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4",
    "com5", "com6", "com7", "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4",
    "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

const LEGAL_PUNCTUATION: &[char] = &['_', '+', '-', '.'];

/// A validated package (or project) name.
///
/// Rules: at least two characters, not a platform-reserved name, first
/// character alphabetic, interior characters alpha-numeric or `_+-.`, last
/// character alpha-numeric or `+`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        let error = |d: &str| Err(PkgmetaError::PackageName(d.to_string()));

        if name.len() < 2 {
            return error("length is less than two characters");
        }

        if ILLEGAL_NAMES.contains(&name.as_str()) {
            return error("illegal name");
        }

        let bytes = name.as_bytes();

        if !bytes[0].is_ascii_alphabetic() {
            return error("illegal first character (must be alphabetic)");
        }

        for &b in &bytes[1..bytes.len() - 1] {
            if !b.is_ascii_alphanumeric()
                && !LEGAL_PUNCTUATION.contains(&(b as char))
            {
                return error("illegal character");
            }
        }

        let last = bytes[bytes.len() - 1];
        if !last.is_ascii_alphanumeric() && last != b'+' {
            return error(
                "illegal last character (must be alphabetic, digit, or plus)",
            );
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the default (empty, not-yet-assigned) name.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The name without the extension (the part after the final dot).
    pub fn base(&self) -> &str {
        match self.0.rfind('.') {
            Some(p) => &self.0[..p],
            None => &self.0,
        }
    }

    /// The extension: the part after the final dot, if any.
    pub fn extension(&self) -> Option<&str> {
        self.0.rfind('.').map(|p| &self.0[p + 1..])
    }

    /// The name with each `-`, `+`, and `.` replaced with `_`, for use as
    /// a buildfile variable name.
    pub fn variable(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                '-' | '+' | '.' => '_',
                c => c,
            })
            .collect()
    }
}

impl FromStr for PackageName {
    type Err = PkgmetaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
