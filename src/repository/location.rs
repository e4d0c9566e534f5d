//! Repository locations and canonical names.
//!
//! A location combines a repository URL with a repository type and a
//! derived canonical name: the stable textual identity of the repository
//! that is independent of cosmetic URL variants (scheme, `www.`-style
//! host prefixes, default ports, the version path component). Relative
//! locations have no canonical name; the canonical name of an empty
//! location is empty.

use std::fmt;

use log::trace;

use crate::error::{PkgmetaError, Result};
use crate::fspath;
use crate::repository::refs::parse_git_ref_filters;
use crate::repository::url::{RepositoryProtocol, RepositoryUrl, UrlAuthority};
use crate::repository::{RepositoryBasis, RepositoryType, guess_type};

fn location_error(description: impl Into<String>) -> PkgmetaError {
    PkgmetaError::Location(description.into())
}

/// A repository URL that may have the repository type specified as part
/// of its scheme in the `<type>+<protocol>` form, for example
/// `git+http://example.com/repo`.
///
/// If the substring preceding the `+` is not a valid repository type or
/// the remainder does not conform to the repository URL notation, the
/// whole string is parsed as an untyped repository URL.
#[derive(Debug, Clone)]
pub struct TypedRepositoryUrl {
    pub url: RepositoryUrl,
    pub repo_type: Option<RepositoryType>,
}

impl TypedRepositoryUrl {
    pub fn parse(s: &str) -> Result<Self> {
        if let Some((prefix, rest)) = s.split_once('+')
            && crate::repository::url::is_url_notation(rest)
            && let Some(t) = RepositoryType::try_parse(prefix)
            && let Ok(url) = RepositoryUrl::parse(rest)
        {
            // Only consider the URL typed if it is not a relative path
            // (which can happen for something like ftp://example.com).
            let relative = url.protocol() == RepositoryProtocol::File
                && !fspath::is_absolute(url.path.as_deref().unwrap_or(""));

            if !relative {
                return Ok(Self {
                    url,
                    repo_type: Some(t),
                });
            }
        }

        Ok(Self {
            url: RepositoryUrl::parse(s)?,
            repo_type: None,
        })
    }
}

// The canonical-name domain prefixes are purely cosmetic.
pub(crate) fn strip_domain(
    host: &str,
    repo_type: RepositoryType,
) -> Result<String> {
    debug_assert!(!host.is_empty());

    let prefixes: &[&str] = match repo_type {
        RepositoryType::Pkg => &["www.", "pkg.", "bpkg."],
        RepositoryType::Git => &["www.", "git.", "scm."],
        // A dir repository location can only be local.
        RepositoryType::Dir => unreachable!("dir repository host"),
    };

    for p in prefixes {
        if let Some(h) = host.strip_prefix(p) {
            if h.is_empty() {
                return Err(location_error("invalid host"));
            }
            return Ok(h.to_string());
        }
    }

    Ok(host.to_string())
}

// The 'pkg' path component and '.git' extension stripping modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StripMode {
    Version,
    Component,
    Path,
    Extension,
}

pub(crate) fn strip_path(p: &str, mode: StripMode) -> Result<String> {
    if mode == StripMode::Extension {
        return Ok(if fspath::extension(p) == Some("git") {
            fspath::strip_extension(p).to_string()
        } else {
            p.to_string()
        });
    }

    let absolute = fspath::is_absolute(p);
    let comps = fspath::components(p);

    // Find the version component (the last all-digit one).
    let vi = comps
        .iter()
        .rposition(|c| c.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| location_error("missing repository version"))?;

    // At the moment the only valid version is 1.
    let v: u64 = comps[vi]
        .parse()
        .map_err(|_| location_error("invalid repository version"))?;

    if v != 1 {
        return Err(location_error("unsupported repository version"));
    }

    let after = &comps[vi + 1..];

    // The canonical name prefix part ends with the special "pkg"
    // component.
    let pc = vi > 0 && (comps[vi - 1] == "pkg" || comps[vi - 1] == "bpkg");

    let (keep_absolute, parts): (bool, Vec<&str>) = match mode {
        StripMode::Version => (absolute, [&comps[..vi], after].concat()),
        StripMode::Component => {
            let e = if pc { vi - 1 } else { vi };
            (absolute, [&comps[..e], after].concat())
        }
        StripMode::Path => {
            if pc {
                (false, after.to_vec())
            } else {
                (absolute, [&comps[..vi], after].concat())
            }
        }
        StripMode::Extension => unreachable!(),
    };

    let joined = parts.join("/");

    Ok(if keep_absolute {
        format!("/{joined}")
    } else {
        joined
    })
}

/// A repository location: a URL, a repository type, and the derived
/// canonical name.
#[derive(Debug, Clone, Default)]
pub struct RepositoryLocation {
    canonical_name: String,
    url: RepositoryUrl,
    repo_type: Option<RepositoryType>,
}

impl RepositoryLocation {
    /// The special empty location.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a remote or absolute location from a potentially typed
    /// repository URL string.
    ///
    /// If the type is not specified in the URL scheme then the one
    /// passed as an argument is used or, if absent, guessed according
    /// to the `local` flag.
    pub fn parse(
        s: &str,
        repo_type: Option<RepositoryType>,
        local: bool,
    ) -> Result<Self> {
        let tu = TypedRepositoryUrl::parse(s)?;

        if let (Some(a), Some(u)) = (repo_type, tu.repo_type)
            && a != u
        {
            return Err(location_error(format!(
                "mismatching repository types: {a} specified, {u} in URL \
                 scheme"
            )));
        }

        let et = tu
            .repo_type
            .or(repo_type)
            .unwrap_or_else(|| guess_type(&tu.url, local));

        Self::from_url(tu.url, et)
    }

    /// Create a remote, absolute, or empty location, making sure the
    /// URL matches the repository type. A relative local path is an
    /// error.
    pub fn from_url(
        url: RepositoryUrl,
        repo_type: RepositoryType,
    ) -> Result<Self> {
        let l = Self::with_base(url, repo_type, &Self::empty())?;

        if !l.is_empty() && l.is_relative() {
            return Err(location_error("relative filesystem path"));
        }

        Ok(l)
    }

    /// Create a potentially relative location. If the base is not
    /// empty, use it to complete a relative location to a remote or
    /// absolute one.
    pub fn with_base(
        url: RepositoryUrl,
        repo_type: RepositoryType,
        base: &RepositoryLocation,
    ) -> Result<Self> {
        if url.is_empty() {
            if !base.is_empty() {
                return Err(location_error("empty location"));
            }

            return Ok(Self::empty());
        }

        let mut url = url;

        // Verify that the URL matches the repository type.
        match repo_type {
            RepositoryType::Pkg => {
                if matches!(
                    url.protocol(),
                    RepositoryProtocol::Git | RepositoryProtocol::Ssh
                ) {
                    return Err(location_error(
                        "unsupported scheme for pkg repository",
                    ));
                }

                if url.fragment.is_some() {
                    return Err(location_error(
                        "unexpected fragment for pkg repository",
                    ));
                }
            }
            RepositoryType::Dir => {
                if url.protocol() != RepositoryProtocol::File {
                    return Err(location_error(
                        "unsupported scheme for dir repository",
                    ));
                }

                if url.fragment.is_some() {
                    return Err(location_error(
                        "unexpected fragment for dir repository",
                    ));
                }
            }
            RepositoryType::Git => {
                if let Some(f) = &url.fragment {
                    parse_git_ref_filters(Some(f))?;
                }
            }
        }

        if !base.is_empty() && base.is_relative() {
            return Err(location_error(
                "base location is relative filesystem path",
            ));
        }

        let mut canonical_name = String::new();

        if url.protocol() != RepositoryProtocol::File {
            // Remote location: canonical name starts with the stripped
            // host, with the port appended unless it is the protocol
            // default.
            let authority =
                url.authority.as_ref().expect("remote URL authority");

            canonical_name = format!(
                "{repo_type}:{}",
                strip_domain(&authority.host, repo_type)?
            );

            let port = authority.port;
            if port != 0 && port != url.protocol().default_port() {
                canonical_name.push_str(&format!(":{port}"));
            }
        } else if !base.is_empty()
            && !fspath::is_absolute(url.path.as_deref().unwrap_or(""))
        {
            // Complete the relative location against the base: splice
            // the base scheme/authority, resolve the path, and override
            // the base fragment with ours.
            let mut u = base.url.clone();
            u.path = Some(fspath::join(
                u.path.as_deref().unwrap_or(""),
                url.path.as_deref().unwrap_or(""),
            ));
            u.fragment = url.fragment.take();
            url = u;

            // Inherit the '<type>:<host>[:<port>]' canonical name part
            // of the base.
            if base.is_remote() {
                let n = &base.canonical_name;
                canonical_name = n
                    [..n.find(['/', '#']).unwrap_or(n.len())]
                    .to_string();
            }
        }

        // Normalize the path to avoid different representations of the
        // same location and canonical name.
        let remote = url.protocol() != RepositoryProtocol::File;

        let path = url.path.take().unwrap_or_default();
        let path = fspath::normalize(&path, remote)
            .map_err(|_| location_error("invalid path"))?;

        // A valid non-empty pkg location cannot have an empty path.
        if repo_type == RepositoryType::Pkg && path.is_empty() {
            return Err(location_error("empty path"));
        }

        // The path must not go past the root directory of a server.
        if remote && (path == ".." || path.starts_with("../")) {
            return Err(location_error("invalid path"));
        }

        url.path = Some(path);

        let l = Self {
            canonical_name: String::new(),
            url,
            repo_type: Some(repo_type),
        };

        // Relative locations have no canonical name.
        if l.is_relative() {
            return Ok(l);
        }

        let url = l.url;
        let path = url.path.clone().unwrap_or_default();
        let path = path.as_str();

        // Canonical name part produced from the path; the algorithm
        // depends on the repository type.
        let sp = match repo_type {
            RepositoryType::Pkg => {
                let mode = if remote {
                    StripMode::Component
                } else {
                    StripMode::Path
                };

                let sp = strip_path(path, mode)?;

                // If the stripping result for an absolute path location
                // is empty, fall back to stripping just the version
                // component.
                if !remote && sp.is_empty() {
                    strip_path(path, StripMode::Version)?
                } else {
                    sp
                }
            }
            RepositoryType::Dir => path.to_string(),
            RepositoryType::Git => strip_path(path, StripMode::Extension)?,
        };

        // Do not allow canonical names without both the host and path
        // parts.
        if canonical_name.is_empty() && sp.is_empty() {
            return Err(location_error("empty repository name"));
        }

        if !sp.is_empty() {
            if !canonical_name.is_empty() {
                canonical_name.push('/');
            } else {
                canonical_name = format!("{repo_type}:");
            }

            canonical_name.push_str(&sp);
        }

        if let Some(f) = &url.fragment {
            canonical_name.push('#');
            canonical_name.push_str(f);
        }

        trace!(
            "repository location {} canonical name {}",
            url, canonical_name
        );

        Ok(Self {
            canonical_name,
            url,
            repo_type: Some(repo_type),
        })
    }

    /// The canonical name. Empty for empty and relative locations.
    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    /// Whether this is the special empty location.
    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }

    /// Whether the location is a local filesystem path.
    ///
    /// # Panics
    ///
    /// This and the following predicates panic for an empty location.
    pub fn is_local(&self) -> bool {
        assert!(!self.is_empty(), "empty location");
        self.url.protocol() == RepositoryProtocol::File
    }

    pub fn is_remote(&self) -> bool {
        !self.is_local()
    }

    pub fn is_absolute(&self) -> bool {
        assert!(!self.is_empty(), "empty location");

        // In remote locations the path is always relative.
        fspath::is_absolute(self.url.path.as_deref().unwrap_or(""))
    }

    pub fn is_relative(&self) -> bool {
        self.is_local() && !self.is_absolute()
    }

    /// The repository type.
    ///
    /// # Panics
    ///
    /// Panics for an empty location.
    pub fn repo_type(&self) -> RepositoryType {
        assert!(!self.is_empty(), "empty location");
        self.repo_type.expect("type of non-empty location")
    }

    pub fn basis(&self) -> RepositoryBasis {
        self.repo_type().basis()
    }

    /// The URL. Empty for an empty location.
    pub fn url(&self) -> &RepositoryUrl {
        &self.url
    }

    /// The repository path.
    ///
    /// # Panics
    ///
    /// Panics for an empty location.
    pub fn path(&self) -> &str {
        assert!(!self.is_empty(), "empty location");
        self.url.path.as_deref().expect("path of non-empty location")
    }

    /// The host name.
    ///
    /// # Panics
    ///
    /// Panics for a local location.
    pub fn host(&self) -> &str {
        assert!(!self.is_local(), "local location");
        &self.url.authority.as_ref().expect("remote authority").host
    }

    /// The port; zero if not specified explicitly.
    ///
    /// # Panics
    ///
    /// Panics for a local location.
    pub fn port(&self) -> u16 {
        assert!(!self.is_local(), "local location");
        self.url.authority.as_ref().expect("remote authority").port
    }

    /// The protocol.
    ///
    /// # Panics
    ///
    /// Panics for an empty location.
    pub fn proto(&self) -> RepositoryProtocol {
        assert!(!self.is_empty(), "empty location");
        self.url.protocol()
    }

    /// The URL fragment.
    ///
    /// # Panics
    ///
    /// Panics for a relative location.
    pub fn fragment(&self) -> Option<&str> {
        assert!(!self.is_relative(), "relative filesystem path");
        self.url.fragment.as_deref()
    }

    pub fn is_archive_based(&self) -> bool {
        self.basis() == RepositoryBasis::Archive
    }

    pub fn is_directory_based(&self) -> bool {
        self.basis() == RepositoryBasis::Directory
    }

    pub fn is_version_control_based(&self) -> bool {
        self.basis() == RepositoryBasis::VersionControl
    }
}

impl fmt::Display for RepositoryLocation {
    /// The string representation: an untyped URL if the correct type
    /// can be guessed from the URL alone and the typed URL otherwise.
    /// Empty for an empty location, always untyped for a relative one.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty()
            || self.is_relative()
            || guess_type(&self.url, false) == self.repo_type()
        {
            return write!(f, "{}", self.url);
        }

        write!(f, "{}+", self.repo_type())?;

        // Enforce the file:// notation for local URLs by adding the
        // empty authority.
        if self.url.protocol() == RepositoryProtocol::File
            && self.url.authority.is_none()
            && self.url.fragment.is_none()
        {
            let mut u = self.url.clone();
            u.authority = Some(UrlAuthority::default());
            write!(f, "{u}")
        } else {
            write!(f, "{}", self.url)
        }
    }
}
