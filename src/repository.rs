//! Repository types, URLs, and locations.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{PkgmetaError, Result};
use crate::fspath;

pub mod location;
pub mod refs;
pub mod url;

pub use location::{RepositoryLocation, TypedRepositoryUrl};
pub use refs::{GitRefFilter, parse_git_ref_filters};
pub use url::{RepositoryProtocol, RepositoryUrl, UrlAuthority};

/// Repository type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Archive-based repository with a packages index.
    Pkg,
    /// Local directory tree of package directories.
    Dir,
    /// Version-control (git) tree.
    Git,
}

impl RepositoryType {
    pub(crate) fn try_parse(t: &str) -> Option<Self> {
        match t {
            "pkg" => Some(Self::Pkg),
            "dir" => Some(Self::Dir),
            "git" => Some(Self::Git),
            _ => None,
        }
    }

    pub fn basis(self) -> RepositoryBasis {
        match self {
            Self::Pkg => RepositoryBasis::Archive,
            Self::Dir => RepositoryBasis::Directory,
            Self::Git => RepositoryBasis::VersionControl,
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pkg => "pkg",
            Self::Dir => "dir",
            Self::Git => "git",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RepositoryType {
    type Err = PkgmetaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_parse(s).ok_or_else(|| {
            PkgmetaError::Location(format!("invalid repository type '{s}'"))
        })
    }
}

/// Repository basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryBasis {
    Archive,
    Directory,
    VersionControl,
}

/// Guess the repository type from the URL: the `git` scheme or a `.git`
/// path extension mean git; other remote schemes mean pkg; for a local
/// URL with the `local` flag set, a `.git` subdirectory on disk means
/// git, otherwise pkg.
pub fn guess_type(url: &RepositoryUrl, local: bool) -> RepositoryType {
    assert!(!url.is_empty(), "empty repository URL");

    let path = url.path.as_deref().unwrap_or("");

    match url.protocol() {
        RepositoryProtocol::Git => RepositoryType::Git,
        proto => {
            if fspath::extension(path) == Some("git") {
                RepositoryType::Git
            } else if proto != RepositoryProtocol::File {
                RepositoryType::Pkg
            } else if local && Path::new(path).join(".git").is_dir() {
                RepositoryType::Git
            } else {
                RepositoryType::Pkg
            }
        }
    }
}
