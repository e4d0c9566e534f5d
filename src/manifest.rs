//! Manifest records: package, repository, and signature manifests.
//!
//! Parsing consumes the name/value stream produced by [`text`]; each
//! manifest type validates its fields eagerly so that a successfully
//! constructed record holds its invariants unconditionally.
//! Serialization emits the canonical field order, which is not
//! necessarily the input order.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use std::sync::LazyLock;

use crate::constraint::VersionConstraint;
use crate::error::{PkgmetaError, Result};
use crate::name::PackageName;

pub mod package;
pub mod repository;
pub mod signature;
pub mod text;

pub use package::{
    DirPackageManifests, GitPackageManifests, PackageManifest,
    PkgPackageManifests,
};
pub use repository::{
    DirRepositoryManifests, GitRepositoryManifests, PkgRepositoryManifests,
    RepositoryManifest, RepositoryRole, find_base_repository,
};
pub use signature::SignatureManifest;
pub use text::{ManifestParser, ManifestSerializer, NameValue};

static SHA256_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9a-f]{64}$").unwrap());

static FINGERPRINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^([0-9a-fA-F]{2}:){31}[0-9a-fA-F]{2}$").unwrap()
});

pub(crate) fn valid_sha256(s: &str) -> bool {
    SHA256_RE.is_match(s)
}

pub(crate) fn valid_fingerprint(s: &str) -> bool {
    FINGERPRINT_RE.is_match(s)
}

// Diagnostics anchored at the name or value position of a pair.
pub(crate) fn bad_name(
    source_name: &str,
    nv: &NameValue,
    description: impl Into<String>,
) -> PkgmetaError {
    PkgmetaError::parsing(
        source_name,
        nv.name_line,
        nv.name_column,
        description,
    )
}

pub(crate) fn bad_value(
    source_name: &str,
    nv: &NameValue,
    description: impl Into<String>,
) -> PkgmetaError {
    PkgmetaError::parsing(
        source_name,
        nv.value_line,
        nv.value_column,
        description,
    )
}

// Parse a delimiter-separated list, skipping empty items and trimming
// the surrounding whitespace (items may contain inner spaces).
pub(crate) fn parse_list_items(s: &str, delim: char) -> Vec<String> {
    s.split(delim)
        .map(|i| i.trim_matches([' ', '\t']).to_string())
        .filter(|i| !i.is_empty())
        .collect()
}

// Split the leading '?' (conditional) and '*' (buildtime) markers, in
// either order, returning the markers and the value that follows.
pub(crate) fn split_activity_markers(v: &str) -> (bool, bool, &str) {
    let mut conditional = false;
    let mut buildtime = false;
    let mut rest = v;

    for _ in 0..2 {
        if !conditional && rest.starts_with('?') {
            conditional = true;
            rest = &rest[1..];
        } else if !buildtime && rest.starts_with('*') {
            buildtime = true;
            rest = &rest[1..];
        } else {
            break;
        }
    }

    (conditional, buildtime, rest.trim_start_matches([' ', '\t']))
}

/// Package priority with an optional comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Priority {
    pub level: PriorityLevel,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Security,
}

impl PriorityLevel {
    pub(crate) fn try_parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "security" => Some(Self::Security),
            _ => None,
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Security => "security",
        };
        write!(f, "{s}")
    }
}

/// An email address with an optional comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub address: String,
    pub comment: String,
}

impl Email {
    pub fn new(address: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            comment: comment.into(),
        }
    }
}

/// Inline text or a reference to a file with the text.
///
/// Used for the `description`/`description-file` and
/// `changes`/`changes-file` mutually-exclusive field pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFile {
    Inline(String),
    File { path: String, comment: String },
}

impl TextFile {
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

/// One license alternative: a list of licenses with a comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Licenses {
    pub licenses: Vec<String>,
    pub comment: String,
}

/// A validated web URL with an optional comment (the `url`, `doc-url`,
/// `src-url`, and `package-url` manifest values).
///
/// The URL must be absolute, non-local (not the `file` scheme), and
/// have a non-empty authority. The original spelling is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestUrl {
    pub url: String,
    pub comment: String,
}

impl ManifestUrl {
    pub fn new(u: impl Into<String>, comment: impl Into<String>) -> Result<Self> {
        let u = u.into();

        let parsed = url::Url::parse(&u)
            .map_err(|e| PkgmetaError::Url(e.to_string()))?;

        if parsed.cannot_be_a_base() {
            return Err(PkgmetaError::Url("rootless URL".to_string()));
        }

        if parsed.scheme().eq_ignore_ascii_case("file") {
            return Err(PkgmetaError::Url("local URL".to_string()));
        }

        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(PkgmetaError::Url("no authority".to_string()));
        }

        Ok(Self {
            url: u,
            comment: comment.into(),
        })
    }
}

impl fmt::Display for ManifestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// A package dependency: a name with an optional version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: PackageName,
    pub constraint: Option<VersionConstraint>,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;

        if let Some(c) = &self.constraint {
            write!(f, " {c}")?;
        }

        Ok(())
    }
}

/// The `depends` value: `|`-separated dependency alternatives with the
/// conditional (`?`) and buildtime (`*`) markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyAlternatives {
    pub alternatives: Vec<Dependency>,
    pub conditional: bool,
    pub buildtime: bool,
    pub comment: String,
}

impl fmt::Display for DependencyAlternatives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditional {
            write!(f, "?")?;
        }

        if self.buildtime {
            write!(f, "*")?;
        }

        if self.conditional || self.buildtime {
            write!(f, " ")?;
        }

        let mut first = true;
        for a in &self.alternatives {
            write!(f, "{}{a}", if first { "" } else { " | " })?;
            first = false;
        }

        if !self.comment.is_empty() {
            write!(f, "; {}", self.comment)?;
        }

        Ok(())
    }
}

/// The `requires` value: `|`-separated requirement alternatives. Unlike
/// dependencies, the alternatives are free-form identifiers (`c++11`,
/// `linux`, etc) and a comment-only form is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementAlternatives {
    pub alternatives: Vec<String>,
    pub conditional: bool,
    pub buildtime: bool,
    pub comment: String,
}

/// Test-style dependency classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestDependencyType {
    Tests,
    Examples,
    Benchmarks,
}

impl TestDependencyType {
    pub(crate) fn try_parse(s: &str) -> Option<Self> {
        match s {
            "tests" => Some(Self::Tests),
            "examples" => Some(Self::Examples),
            "benchmarks" => Some(Self::Benchmarks),
            _ => None,
        }
    }
}

impl fmt::Display for TestDependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tests => "tests",
            Self::Examples => "examples",
            Self::Benchmarks => "benchmarks",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TestDependencyType {
    type Err = PkgmetaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_parse(s).ok_or_else(|| {
            PkgmetaError::Value(format!("invalid test dependency type '{s}'"))
        })
    }
}

/// A test, examples, or benchmarks package dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDependency {
    pub name: PackageName,
    pub dep_type: TestDependencyType,
    pub constraint: Option<VersionConstraint>,
}

impl fmt::Display for TestDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;

        if let Some(c) = &self.constraint {
            write!(f, " {c}")?;
        }

        Ok(())
    }
}

/// A `build-include`/`build-exclude` constraint: filesystem wildcard
/// patterns for the build configuration name and target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConstraint {
    /// If true, the package should not be built for matching
    /// configurations.
    pub exclusion: bool,
    pub config: String,
    pub target: Option<String>,
    pub comment: String,
}

/// Description text type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextType {
    Plain,
    CommonMark,
    GithubMark,
}

impl fmt::Display for TextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Plain => "text/plain",
            Self::CommonMark => "text/markdown;variant=CommonMark",
            Self::GithubMark => "text/markdown;variant=GFM",
        };
        write!(f, "{s}")
    }
}

/// Parse a media-type representation into a text type. A well-formed
/// but unknown text variant yields `None`; a non-text or malformed
/// type is an error. Parameter quoting and comments are not supported.
pub fn to_text_type(t: &str) -> Result<Option<TextType>> {
    let error = |d: &str| PkgmetaError::Value(d.to_string());

    let (tp, params) = match t.split_once(';') {
        Some((tp, ps)) => (tp.trim(), Some(ps)),
        None => (t.trim(), None),
    };

    let mut ps: Vec<(String, String)> = Vec::new();

    if let Some(params) = params {
        for p in params.split(';') {
            let (n, v) = p
                .split_once('=')
                .ok_or_else(|| error("missing '='"))?;
            ps.push((n.trim().to_string(), v.trim().to_string()));
        }
    }

    // Type, subtype, and parameter names are matched
    // case-insensitively; so are the markdown variants (RFC7763).
    if tp.eq_ignore_ascii_case("text/plain") {
        // No parameters are expected for plain text.
        if ps.is_empty() {
            return Ok(Some(TextType::Plain));
        }
    } else if tp.eq_ignore_ascii_case("text/markdown") {
        if ps.is_empty() {
            return Ok(Some(TextType::GithubMark));
        }

        if ps.len() == 1 && ps[0].0.eq_ignore_ascii_case("variant") {
            if ps[0].1.eq_ignore_ascii_case("GFM") {
                return Ok(Some(TextType::GithubMark));
            }

            if ps[0].1.eq_ignore_ascii_case("CommonMark") {
                return Ok(Some(TextType::CommonMark));
            }
        }
    } else if !tp.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("text/")) {
        return Err(error("text type expected"));
    }

    Ok(None)
}

/// Package manifest value validation flags.
///
/// Some values are forbidden or required depending on the repository
/// type and the parsing context (an individual manifest, a manifest
/// list element, etc).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestFlags {
    pub forbid_file: bool,
    pub forbid_location: bool,
    pub forbid_sha256sum: bool,
    pub forbid_fragment: bool,
    pub forbid_incomplete_dependencies: bool,
    pub require_location: bool,
    pub require_sha256sum: bool,
    pub require_description_type: bool,
}

impl ManifestFlags {
    /// The flags of a valid individual package manifest.
    pub fn individual() -> Self {
        Self {
            forbid_location: true,
            forbid_sha256sum: true,
            forbid_fragment: true,
            ..Self::default()
        }
    }

    /// The flags of a pkg package list manifest element.
    pub fn pkg_list_element() -> Self {
        Self {
            forbid_file: true,
            require_description_type: true,
            require_location: true,
            forbid_fragment: true,
            forbid_incomplete_dependencies: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_validation() {
        assert!(valid_sha256(&"a".repeat(64)));
        assert!(valid_sha256(
            "d4b5e782f0b90c2a0fccea02693a1eda943d817bdf9b171c0e29f23369dbf6c2"
        ));
        assert!(!valid_sha256(&"a".repeat(63)));
        assert!(!valid_sha256(&"A".repeat(64)));
        assert!(!valid_sha256(&"g".repeat(64)));
    }

    #[test]
    fn fingerprint_validation() {
        let fp = (0..32).map(|_| "AB").collect::<Vec<_>>().join(":");
        assert!(valid_fingerprint(&fp));
        assert!(!valid_fingerprint(&fp[1..]));
        assert!(!valid_fingerprint("AB:CD"));
    }

    #[test]
    fn activity_markers() {
        assert_eq!(split_activity_markers("foo"), (false, false, "foo"));
        assert_eq!(split_activity_markers("? foo"), (true, false, "foo"));
        assert_eq!(split_activity_markers("* foo"), (false, true, "foo"));
        assert_eq!(split_activity_markers("?* foo"), (true, true, "foo"));
        assert_eq!(split_activity_markers("*? foo"), (true, true, "foo"));
        assert_eq!(split_activity_markers("?*foo"), (true, true, "foo"));
    }

    #[test]
    fn list_items() {
        assert_eq!(
            parse_list_items("a, b c ,, d ", ','),
            vec!["a", "b c", "d"]
        );
        assert!(parse_list_items("  ", ',').is_empty());
    }

    #[test]
    fn text_types() {
        assert_eq!(to_text_type("text/plain").unwrap(), Some(TextType::Plain));
        assert_eq!(
            to_text_type("text/markdown").unwrap(),
            Some(TextType::GithubMark)
        );
        assert_eq!(
            to_text_type("text/markdown;variant=GFM").unwrap(),
            Some(TextType::GithubMark)
        );
        assert_eq!(
            to_text_type("text/markdown; Variant=commonmark").unwrap(),
            Some(TextType::CommonMark)
        );

        // Well-formed but unknown text types.
        assert_eq!(to_text_type("text/plain;variant=x").unwrap(), None);
        assert_eq!(to_text_type("text/unknown").unwrap(), None);

        // Malformed or non-text.
        assert!(to_text_type("image/png").is_err());
        assert!(to_text_type("text/markdown;variant").is_err());
    }

    #[test]
    fn text_type_display_round_trip() {
        for t in [TextType::Plain, TextType::CommonMark, TextType::GithubMark]
        {
            assert_eq!(to_text_type(&t.to_string()).unwrap(), Some(t));
        }
    }

    #[test]
    fn manifest_url_validation() {
        assert!(ManifestUrl::new("https://example.org/foo", "").is_ok());
        assert!(ManifestUrl::new("file:///foo", "").is_err());
        assert!(ManifestUrl::new("mailto:x@example.org", "").is_err());
        assert!(ManifestUrl::new("not a url", "").is_err());
    }

    #[test]
    fn dependency_display() {
        let d = Dependency {
            name: PackageName::new("libfoo").unwrap(),
            constraint: Some(VersionConstraint::parse(">= 1.0").unwrap()),
        };
        assert_eq!(d.to_string(), "libfoo >= 1.0");

        let da = DependencyAlternatives {
            alternatives: vec![
                d,
                Dependency {
                    name: PackageName::new("libbar").unwrap(),
                    constraint: None,
                },
            ],
            conditional: false,
            buildtime: true,
            comment: String::new(),
        };
        assert_eq!(da.to_string(), "* libfoo >= 1.0 | libbar");
    }
}
