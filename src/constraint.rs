//! Dependency version constraints.
//!
//! A constraint is a version range with open or closed endpoints. The
//! textual forms are ranges (`[1.0 2.0)`), comparisons (`>= 1.0`), and the
//! shortcut operators (`~1.2.3`, `^1.2.3`) that expand to standard-version
//! windows. Endpoints may refer to the dependent package's own version
//! with `$`; such endpoints are stored as the empty version and must be
//! completed with [`VersionConstraint::effective`] before use.

use std::fmt;
use std::str::FromStr;

use crate::error::{PkgmetaError, Result};
use crate::version::{Version, VersionFlags};

const SPACES: &[char] = &[' ', '\t'];

fn constraint_error(description: impl Into<String>) -> PkgmetaError {
    PkgmetaError::Constraint(description.into())
}

/// A version range with open/closed endpoints.
///
/// If the endpoints are equal and both closed then this is the
/// `== <version>` constraint. If both endpoints are empty versions and
/// exactly one side is open then this encodes `~$` (min open) or `^$`
/// (max open). An absent endpoint is the open infinity boundary.
///
/// An absent endpoint version revision means "any revision" (except for
/// an earliest release, where the revision is meaningless) and so
/// translates into the effective revision depending on the endpoint
/// side and openness: `[X Y)` covers the same set as `[X+0 Y+0)`, while
/// `(X Y]` covers the same set as `(X+max Y+max]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    min_version: Option<Version>,
    max_version: Option<Version>,
    min_open: bool,
    max_open: bool,
}

/// A standard-version `major.minor.patch` triple: strictly three numeric
/// components without leading zeros. This is the subset of upstream
/// version strings the shortcut operators understand.
fn standard_triple(upstream: &str) -> Option<(u64, u64, u64)> {
    let mut it = upstream.split('.');

    let mut comp = || {
        let c = it.next()?;
        if c.is_empty() || !c.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if c.len() > 1 && c.starts_with('0') {
            return None;
        }
        c.parse::<u64>().ok()
    };

    let r = (comp()?, comp()?, comp()?);
    if it.next().is_some() { None } else { Some(r) }
}

// Whether the release string survives a round trip through the semver
// pre-release grammar: non-empty dot-separated components, numeric ones
// without leading zeros.
fn semver_prerelease(release: &str) -> bool {
    !release.is_empty()
        && release.split('.').all(|c| {
            !c.is_empty()
                && !(c.len() > 1
                    && c.starts_with('0')
                    && c.bytes().all(|b| b.is_ascii_digit()))
        })
}

// The earliest version of the standard-version window opened by the
// shortcut operator: X.(Y+1).0- for '~'; (X+1).0.0- for '^' unless the
// major version is zero, in which case '^' behaves like '~'.
fn shortcut_max(
    op: char,
    epoch: u16,
    explicit_epoch: bool,
    (major, minor, _): (u64, u64, u64),
) -> Result<Version> {
    let overflow = || constraint_error("endpoint version component overflow");

    let upstream = if op == '^' && major > 0 {
        format!("{}.0.0", major.checked_add(1).ok_or_else(overflow)?)
    } else {
        format!("{}.{}.0", major, minor.checked_add(1).ok_or_else(overflow)?)
    };

    let v = if explicit_epoch {
        Version::parse(
            &format!("+{epoch}-{upstream}-"),
            VersionFlags::default(),
        )
    } else {
        Version::parse(&format!("{upstream}-"), VersionFlags::default())
    };

    v.map_err(|e| constraint_error(e.reason()))
}

// Split an optional '+<epoch>-' prefix off a standard version string,
// which the semver grammar has no notion of.
fn split_epoch(s: &str) -> (Option<&str>, &str) {
    if let Some(r) = s.strip_prefix('+')
        && let Some(p) = r.find('-')
        && r[..p].bytes().all(|b| b.is_ascii_digit())
        && p > 0
    {
        return (Some(&r[..p]), &r[p + 1..]);
    }

    (None, s)
}

impl VersionConstraint {
    /// Create a constraint from endpoints, validating the range invariants.
    ///
    /// # Panics
    ///
    /// Panics if both endpoints are absent or if an absent endpoint is
    /// marked closed (caller contract violations).
    pub fn new(
        min_version: Option<Version>,
        min_open: bool,
        max_version: Option<Version>,
        max_open: bool,
    ) -> Result<Self> {
        assert!(
            min_version.is_some() || max_version.is_some(),
            "both endpoint versions are absent"
        );
        assert!(
            (min_version.is_some() || min_open)
                && (max_version.is_some() || max_open),
            "absent endpoint version is closed"
        );

        if let (Some(mn), Some(mx)) = (&min_version, &max_version) {
            let mxe = mx.is_empty();

            // If the endpoints do not refer to the dependent package
            // version then min must be lower than or equal to max. The
            // (X+Y X] corner case (any revision of X is greater or equal
            // than X+Y) is allowed; (X+Y X) is not.
            if mn > mx
                && !mxe
                && !(!max_open
                    && mx.revision().is_none()
                    && mx.compare(mn, true, false) == std::cmp::Ordering::Equal)
            {
                return Err(constraint_error(
                    "min version is greater than max version",
                ));
            }

            if mn == mx {
                if (!mxe && (min_open || max_open))
                    || (mxe && min_open && max_open)
                {
                    return Err(constraint_error(
                        "equal version endpoints not closed",
                    ));
                }

                if !mxe && mx.is_earliest_release() {
                    return Err(constraint_error(
                        "equal version endpoints are earliest",
                    ));
                }
            }
        }

        Ok(Self {
            min_version,
            max_version,
            min_open,
            max_open,
        })
    }

    /// The `== <version>` constraint.
    pub fn exact(v: Version) -> Result<Self> {
        Self::new(Some(v.clone()), false, Some(v), false)
    }

    /// Parse the textual constraint representation. Zero endpoint version
    /// revisions are preserved.
    pub fn parse(s: &str) -> Result<Self> {
        let no_fold = VersionFlags::none();

        let endpoint = |t: &str, what: &str| -> Result<Version> {
            if t == "$" {
                Ok(Version::default())
            } else {
                Version::parse(t, no_fold).map_err(|e| {
                    constraint_error(format!(
                        "invalid {what} version: {}",
                        e.reason()
                    ))
                })
            }
        };

        let c = *s.as_bytes().first().unwrap_or(&0) as char;

        if c == '(' || c == '[' {
            // The version range.
            let min_open = c == '(';

            let p = s[1..]
                .find(|c| !SPACES.contains(&c))
                .map(|i| i + 1)
                .ok_or_else(|| constraint_error("no min version specified"))?;

            let e = s[p..]
                .find(SPACES)
                .map(|i| i + p)
                .ok_or_else(|| constraint_error("no max version specified"))?;

            let min_version = endpoint(&s[p..e], "min")?;

            let p = s[e..]
                .find(|c| !SPACES.contains(&c))
                .map(|i| i + e)
                .ok_or_else(|| constraint_error("no max version specified"))?;

            let e = s[p..]
                .find([' ', '\t', ']', ')'])
                .map(|i| i + p)
                .ok_or_else(|| constraint_error("invalid version range"))?;

            let max_version = endpoint(&s[p..e], "max")?;

            let e = s[e..]
                .find([']', ')'])
                .map(|i| i + e)
                .ok_or_else(|| constraint_error("invalid version range"))?;

            if e + 1 != s.len() {
                return Err(constraint_error(
                    "unexpected text after version range",
                ));
            }

            Self::new(
                Some(min_version),
                min_open,
                Some(max_version),
                s.as_bytes()[e] == b')',
            )
        } else if c == '~' || c == '^' {
            // The shortcut operator. If it refers to the dependent package
            // version then create an incomplete constraint; otherwise the
            // operand must be a standard version.
            let rest = s[1..].trim_matches(SPACES);

            if rest == "$" {
                return Self::new(
                    Some(Version::default()),
                    c == '~',
                    Some(Version::default()),
                    c == '^',
                );
            }

            let (epoch, sv) = split_epoch(rest);

            let sv = semver::Version::parse(sv)
                .map_err(|e| constraint_error(e.to_string()))?;

            // Reassemble the minimum endpoint as a package version,
            // mapping semver build metadata back to a revision.
            let mut mn = String::new();
            if let Some(e) = epoch {
                mn.push('+');
                mn.push_str(e);
                mn.push('-');
            }
            mn.push_str(&format!("{}.{}.{}", sv.major, sv.minor, sv.patch));
            if !sv.pre.is_empty() {
                mn.push('-');
                mn.push_str(sv.pre.as_str());
            }
            if !sv.build.is_empty() {
                mn.push('+');
                mn.push_str(sv.build.as_str());
            }

            let min_version = Version::parse(&mn, VersionFlags::default())
                .map_err(|e| constraint_error(e.reason()))?;

            let max_version = shortcut_max(
                c,
                min_version.epoch(),
                epoch.is_some(),
                (sv.major, sv.minor, sv.patch),
            )?;

            Self::new(Some(min_version), false, Some(max_version), true)
        } else {
            // The version comparison notation.
            let (p, op) = if s.starts_with("==") {
                (2, "==")
            } else if s.starts_with(">=") {
                (2, ">=")
            } else if s.starts_with("<=") {
                (2, "<=")
            } else if c == '>' {
                (1, ">")
            } else if c == '<' {
                (1, "<")
            } else {
                return Err(constraint_error("invalid version comparison"));
            };

            let p = s[p..]
                .find(|c| !SPACES.contains(&c))
                .map(|i| i + p)
                .ok_or_else(|| constraint_error("no version specified"))?;

            let v = if &s[p..] == "$" {
                Version::default()
            } else {
                Version::parse(&s[p..], no_fold).map_err(|e| {
                    constraint_error(format!(
                        "invalid version: {}",
                        e.reason()
                    ))
                })?
            };

            match op {
                "==" => Self::exact(v),
                "<" => Self::new(None, true, Some(v), true),
                "<=" => Self::new(None, true, Some(v), false),
                ">" => Self::new(Some(v), true, None, true),
                ">=" => Self::new(Some(v), false, None, true),
                _ => unreachable!(),
            }
        }
    }

    pub fn min_version(&self) -> Option<&Version> {
        self.min_version.as_ref()
    }

    pub fn max_version(&self) -> Option<&Version> {
        self.max_version.as_ref()
    }

    pub fn min_open(&self) -> bool {
        self.min_open
    }

    pub fn max_open(&self) -> bool {
        self.max_open
    }

    /// Whether no endpoint refers to the dependent package version.
    pub fn is_complete(&self) -> bool {
        self.min_version.as_ref().is_none_or(|v| !v.is_empty())
            && self.max_version.as_ref().is_none_or(|v| !v.is_empty())
    }

    /// Return the completed constraint if it refers to the dependent
    /// package version and a copy of itself otherwise.
    pub fn effective(&self, v: &Version) -> Result<Self> {
        if v.is_empty() {
            return Err(constraint_error("dependent version is empty"));
        }

        if v.is_earliest_release() {
            return Err(constraint_error("dependent version is earliest"));
        }

        // Strip the revision and iteration.
        let v = Version::new(
            v.epoch(),
            v.upstream(),
            v.release().map(str::to_string),
            None,
            0,
        )?;

        // Calculate the effective constraint for a shortcut operator.
        if self.min_version.as_ref().is_some_and(|m| m.is_empty())
            && self.max_version == self.min_version
            && (self.min_open || self.max_open)
        {
            debug_assert!(!(self.min_open && self.max_open));

            // The dependent version must be standard (this also rules out
            // stubs).
            let sv = format!(
                "{}{}",
                v.upstream(),
                v.release().map(|r| format!("-{r}")).unwrap_or_default()
            );

            let sv = semver::Version::parse(&sv).map_err(|_| {
                constraint_error("dependent version is not standard")
            })?;

            let op = if self.min_open { '~' } else { '^' };

            let max_version = shortcut_max(
                op,
                v.epoch(),
                v.epoch() != 1,
                (sv.major, sv.minor, sv.patch),
            )?;

            return Self::new(Some(v), false, Some(max_version), true);
        }

        // Calculate the effective constraint for a range.
        let complete = |e: &Option<Version>| match e {
            Some(ev) if ev.is_empty() => Some(v.clone()),
            e => e.clone(),
        };

        Self::new(
            complete(&self.min_version),
            self.min_open,
            complete(&self.max_version),
            self.max_open,
        )
    }

    // Attempt to represent a [min max) range as a shortcut operator over a
    // standard version.
    fn shortcut_string(&self) -> Option<String> {
        let mn = self.min_version.as_ref()?;
        let mx = self.max_version.as_ref()?;

        if !mx.is_earliest_release()
            || mx.revision().is_some()
            || mx.iteration() != 0
            || mx.epoch() != mn.epoch()
        {
            return None;
        }

        if mn.release().is_some_and(|r| !semver_prerelease(r)) {
            return None;
        }

        let mnt = standard_triple(mn.upstream())?;
        let mxt = standard_triple(mx.upstream())?;

        let minor_bump = (mnt.0, mnt.1.checked_add(1)?, 0);
        let major_bump = (mnt.0.checked_add(1)?, 0, 0);

        let op = if mxt == minor_bump {
            '~'
        } else if mnt.0 > 0 && mxt == major_bump {
            '^'
        } else {
            return None;
        };

        Some(format!("{op}{}", mn.to_string_with(false, false)))
    }
}

impl FromStr for VersionConstraint {
    type Err = PkgmetaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ver = |v: &Version| {
            if v.is_empty() {
                "$".to_string()
            } else {
                v.to_string_with(false, false)
            }
        };

        let (mn, mx) = match (&self.min_version, &self.max_version) {
            (None, Some(mx)) => {
                let op = if self.max_open { "< " } else { "<= " };
                return write!(f, "{op}{}", ver(mx));
            }
            (Some(mn), None) => {
                let op = if self.min_open { "> " } else { ">= " };
                return write!(f, "{op}{}", ver(mn));
            }
            (Some(mn), Some(mx)) => (mn, mx),
            (None, None) => panic!("empty version constraint"),
        };

        if mn == mx {
            if !self.min_open && !self.max_open {
                return write!(f, "== {}", ver(mn));
            }

            debug_assert!(
                mn.is_empty() && (!self.min_open || !self.max_open)
            );
            return write!(f, "{}", if self.min_open { "~$" } else { "^$" });
        }

        // If the range can be represented as a shortcut operator over
        // standard versions, prefer that form.
        if !self.min_open
            && self.max_open
            && !mn.is_empty()
            && !mx.is_empty()
            && let Some(s) = self.shortcut_string()
        {
            return write!(f, "{s}");
        }

        write!(
            f,
            "{}{} {}{}",
            if self.min_open { '(' } else { '[' },
            ver(mn),
            ver(mx),
            if self.max_open { ')' } else { ']' }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(s: &str) -> VersionConstraint {
        VersionConstraint::parse(s).unwrap()
    }

    fn version(v: &str) -> Version {
        v.parse().unwrap()
    }

    #[test]
    fn comparison_forms() {
        let c = constraint(">= 1.0");
        assert_eq!(c.min_version().unwrap(), &version("1.0"));
        assert!(!c.min_open());
        assert!(c.max_version().is_none());
        assert_eq!(c.to_string(), ">= 1.0");

        assert_eq!(constraint("<1.0").to_string(), "< 1.0");
        assert_eq!(constraint("== 1.2.3").to_string(), "== 1.2.3");
        assert_eq!(constraint(">\t2.0-").to_string(), "> 2.0-");
    }

    #[test]
    fn range_forms() {
        let c = constraint("[1.0 2.0)");
        assert!(!c.min_open() && c.max_open());
        assert_eq!(c.to_string(), "[1.0 2.0)");

        assert_eq!(constraint("( 1.0  2.0 ]").to_string(), "(1.0 2.0]");
        assert_eq!(constraint("[1.0 2.0]").to_string(), "[1.0 2.0]");
    }

    #[test]
    fn range_endpoint_revisions_are_preserved() {
        let c = constraint("[1.0+0 2.0]");
        assert_eq!(c.min_version().unwrap().revision(), Some(0));
        assert_eq!(c.to_string(), "[1.0+0 2.0]");
    }

    #[test]
    fn invalid_forms() {
        assert!(VersionConstraint::parse("").is_err());
        assert!(VersionConstraint::parse("[1.0").is_err());
        assert!(VersionConstraint::parse("[1.0]").is_err());
        assert!(VersionConstraint::parse("[1.0 2.0) x").is_err());
        assert!(VersionConstraint::parse("[2.0 1.0)").is_err());
        assert!(VersionConstraint::parse("(1.0 1.0]").is_err());
        assert!(VersionConstraint::parse("=1.0").is_err());
        assert!(VersionConstraint::parse(">=").is_err());
        assert!(VersionConstraint::parse("~1.2").is_err());
        assert!(VersionConstraint::parse("^abc").is_err());
    }

    #[test]
    fn revision_corner_cases() {
        // Any revision of X is greater or equal than X+Y.
        assert!(VersionConstraint::parse("(1.0+2 1.0]").is_ok());
        assert!(VersionConstraint::parse("[1.0+2 1.0]").is_ok());
        assert!(VersionConstraint::parse("(1.0+2 1.0)").is_err());
        assert!(VersionConstraint::parse("(1.0+2 1.0+0]").is_err());
    }

    #[test]
    fn shortcut_expansion() {
        assert_eq!(constraint("~1.2.3").to_string(), "~1.2.3");
        let c = constraint("~1.2.3");
        assert_eq!(c.min_version().unwrap(), &version("1.2.3"));
        assert_eq!(c.max_version().unwrap(), &version("1.3.0-"));

        let c = constraint("^1.2.3");
        assert_eq!(c.max_version().unwrap(), &version("2.0.0-"));

        // For a zero major version '^' behaves like '~'.
        let c = constraint("^0.1.2");
        assert_eq!(c.max_version().unwrap(), &version("0.2.0-"));
        assert_eq!(c.to_string(), "~0.1.2");
    }

    #[test]
    fn shortcut_with_prerelease_and_revision() {
        let c = constraint("~1.2.3-a.1");
        assert_eq!(c.min_version().unwrap(), &version("1.2.3-a.1"));
        assert_eq!(c.max_version().unwrap(), &version("1.3.0-"));
        assert_eq!(c.to_string(), "~1.2.3-a.1");

        let c = constraint("~1.2.3+2");
        assert_eq!(c.min_version().unwrap().revision(), Some(2));
        assert_eq!(c.to_string(), "~1.2.3+2");
    }

    #[test]
    fn shortcut_with_epoch() {
        let c = constraint("~+2-1.2.3");
        assert_eq!(c.min_version().unwrap().epoch(), 2);
        assert_eq!(c.max_version().unwrap(), &version("+2-1.3.0-"));
        assert_eq!(c.to_string(), "~+2-1.2.3");
    }

    #[test]
    fn dependent_endpoints() {
        let c = constraint("== $");
        assert!(!c.is_complete());
        assert_eq!(c.to_string(), "== $");

        let c = constraint("[1.0 $]");
        assert!(!c.is_complete());
        assert_eq!(c.to_string(), "[1.0 $]");

        assert_eq!(constraint("~$").to_string(), "~$");
        assert_eq!(constraint("^$").to_string(), "^$");
    }

    #[test]
    fn effective_range() {
        let c = constraint("[1.0 $]").effective(&version("2.0")).unwrap();
        assert_eq!(c.to_string(), "[1.0 2.0]");

        let c = constraint(">= $").effective(&version("1.5+3")).unwrap();
        assert_eq!(c.to_string(), ">= 1.5");

        let c = constraint("== $").effective(&version("0.1.0")).unwrap();
        assert_eq!(c.to_string(), "== 0.1.0");
    }

    #[test]
    fn effective_shortcut() {
        let c = constraint("~$").effective(&version("1.2.3")).unwrap();
        assert_eq!(c, constraint("[1.2.3 1.3.0-)"));
        assert_eq!(c.to_string(), "~1.2.3");

        let c = constraint("^$").effective(&version("1.2.3")).unwrap();
        assert_eq!(c, constraint("[1.2.3 2.0.0-)"));

        let c = constraint("^$").effective(&version("0.1.2")).unwrap();
        assert_eq!(c, constraint("[0.1.2 0.2.0-)"));
    }

    #[test]
    fn effective_complete_is_identity() {
        let c = constraint("[1.0 2.0)");
        assert_eq!(c.effective(&version("9.9")).unwrap(), c);
    }

    #[test]
    fn effective_rejects_bad_dependents() {
        assert!(constraint("~$").effective(&version("1.2")).is_err());
        assert!(constraint("~$").effective(&version("0")).is_err());
        assert!(constraint("== $").effective(&Version::default()).is_err());
        assert!(constraint("== $").effective(&version("1.0-")).is_err());
    }

    #[test]
    fn range_does_not_round_trip_as_shortcut_when_not_standard() {
        assert_eq!(constraint("[1.2 1.3.0-)").to_string(), "[1.2 1.3.0-)");
        assert_eq!(
            constraint("[1.2.3-01 1.3.0-)").to_string(),
            "[1.2.3-01 1.3.0-)"
        );
        assert_eq!(constraint("[1.2.3 1.3.1-)").to_string(), "[1.2.3 1.3.1-)");
    }
}
