//! Git reference filters.
//!
//! A git repository URL fragment is a comma-separated list of reference
//! filters selecting the refnames and/or commits to fetch.

use crate::error::{PkgmetaError, Result};

fn filter_error(description: impl Into<String>) -> PkgmetaError {
    PkgmetaError::RefFilter(description.into())
}

/// Git refname/pattern and/or commit id filter.
///
/// If neither the name nor the commit is present then the default
/// reference set is assumed. If both are present then the commit is
/// expected to belong to the history of the specified refs. A full
/// 40-character commit id is always stored in the commit member (it may
/// refer to an unadvertised commit); an abbreviated id is stored as the
/// name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitRefFilter {
    pub name: Option<String>,
    pub commit: Option<String>,
    pub exclusion: bool,
}

impl GitRefFilter {
    /// Parse the `[+|-][<name>][@<commit>]` representation.
    pub fn parse(s: &str) -> Result<Self> {
        let exclusion = s.starts_with('-');

        let r = match s.strip_prefix(['+', '-']) {
            Some(r) => r,
            None => s,
        };

        let mut name = None;
        let mut commit = None;

        if let Some((n, c)) = r.split_once('@') {
            if !n.is_empty() {
                name = Some(n.to_string());
            }

            if !c.is_empty() {
                commit = Some(c.to_string());
            }
        } else if !r.is_empty() {
            // A 40-character fragment that consists of only hexadecimal
            // digits is assumed to be a commit id.
            if r.len() == 40 && r.bytes().all(|b| b.is_ascii_hexdigit()) {
                commit = Some(r.to_string());
            } else {
                name = Some(r.to_string());
            }
        }

        if name.is_none() && commit.is_none() {
            return Err(filter_error(
                "missing refname or commit id for git repository",
            ));
        }

        if commit.as_ref().is_some_and(|c| c.len() != 40) {
            return Err(filter_error(
                "git repository commit id must be 40 characters long",
            ));
        }

        Ok(Self {
            name,
            commit,
            exclusion,
        })
    }

    /// Whether this filter selects the default reference set.
    pub fn default_refs(&self) -> bool {
        self.name.is_none() && self.commit.is_none()
    }
}

/// Parse a comma-separated list of git reference filters. If the
/// argument starts with `#` then the default reference set filter is
/// prepended to the resulting list. An absent argument produces the
/// list containing the single default reference set filter.
pub fn parse_git_ref_filters(fs: Option<&str>) -> Result<Vec<GitRefFilter>> {
    let s = match fs {
        Some(s) => s,
        None => return Ok(vec![GitRefFilter::default()]),
    };

    let mut r = Vec::new();

    let s = match s.strip_prefix('#') {
        Some(rest) => {
            r.push(GitRefFilter::default());
            rest
        }
        None => s,
    };

    for f in s.split(',') {
        r.push(GitRefFilter::parse(f)?);
    }

    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(
        name: Option<&str>,
        commit: Option<&str>,
        exclusion: bool,
    ) -> GitRefFilter {
        GitRefFilter {
            name: name.map(str::to_string),
            commit: commit.map(str::to_string),
            exclusion,
        }
    }

    const COMMIT: &str = "0a53e9ddeaddad63ad106860237bbf53411d11a7";

    #[test]
    fn single_filter_forms() {
        assert_eq!(
            GitRefFilter::parse("master").unwrap(),
            filter(Some("master"), None, false)
        );
        assert_eq!(
            GitRefFilter::parse("+master").unwrap(),
            filter(Some("master"), None, false)
        );
        assert_eq!(
            GitRefFilter::parse("-master").unwrap(),
            filter(Some("master"), None, true)
        );
        assert_eq!(
            GitRefFilter::parse(&format!("{COMMIT}@")).unwrap(),
            filter(Some(COMMIT), None, false)
        );
        assert_eq!(
            GitRefFilter::parse(COMMIT).unwrap(),
            filter(None, Some(COMMIT), false)
        );
        assert_eq!(
            GitRefFilter::parse(&format!("@{COMMIT}")).unwrap(),
            filter(None, Some(COMMIT), false)
        );
        assert_eq!(
            GitRefFilter::parse(&format!("master@{COMMIT}")).unwrap(),
            filter(Some("master"), Some(COMMIT), false)
        );
    }

    #[test]
    fn invalid_filters() {
        assert!(GitRefFilter::parse("").is_err());
        assert!(GitRefFilter::parse("@").is_err());
        assert!(GitRefFilter::parse("@123").is_err());
        assert!(GitRefFilter::parse("x@123").is_err());
    }

    #[test]
    fn filter_lists() {
        assert_eq!(
            parse_git_ref_filters(None).unwrap(),
            vec![GitRefFilter::default()]
        );

        assert_eq!(
            parse_git_ref_filters(Some("tag")).unwrap(),
            vec![filter(Some("tag"), None, false)]
        );

        // A leading '#' injects the default reference set.
        assert_eq!(
            parse_git_ref_filters(Some("#tag")).unwrap(),
            vec![GitRefFilter::default(), filter(Some("tag"), None, false)]
        );

        assert_eq!(
            parse_git_ref_filters(Some("a,b")).unwrap(),
            vec![
                filter(Some("a"), None, false),
                filter(Some("b"), None, false)
            ]
        );

        assert!(parse_git_ref_filters(Some("")).is_err());
        assert!(parse_git_ref_filters(Some(",")).is_err());
        assert!(parse_git_ref_filters(Some("a,")).is_err());
        assert!(parse_git_ref_filters(Some("#")).is_err());
    }
}
