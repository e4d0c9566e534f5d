//! Repository URL parsing and normalization.
//!
//! A repository URL represents both remote (`http(s)://`, `git://`,
//! `ssh://`) and local (`file://` as well as plain directory path)
//! locations. For a non-empty URL the path is always present and
//! normalized; for remote URLs the host is lower-cased and the path is
//! stored relative to the server root. A string that is not in URL
//! notation is parsed as a filesystem path (with an optional `#fragment`)
//! and classified under the `file` scheme.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str};

use crate::error::{PkgmetaError, Result};
use crate::fspath;

// URL path characters that are not percent-encoded: unreserved plus
// sub-delims plus ':', '@', and the separator itself.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@')
    .remove(b'/');

fn url_error(description: impl Into<String>) -> PkgmetaError {
    PkgmetaError::Url(description.into())
}

/// Repository URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryProtocol {
    File,
    Http,
    Https,
    Git,
    Ssh,
}

impl RepositoryProtocol {
    /// The default port of the protocol, used for canonical-name port
    /// omission. Zero for `file`.
    pub fn default_port(self) -> u16 {
        match self {
            Self::File => 0,
            Self::Http => 80,
            Self::Https => 443,
            Self::Git => 9418,
            Self::Ssh => 22,
        }
    }
}

impl fmt::Display for RepositoryProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Http => "http",
            Self::Https => "https",
            Self::Git => "git",
            Self::Ssh => "ssh",
        };
        write!(f, "{s}")
    }
}

/// URL authority: `[user@]host[:port]`. A zero port means the port was
/// not specified explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlAuthority {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl UrlAuthority {
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.host.is_empty() && self.port == 0
    }
}

// Validate and normalize a host name: lower-case, and strip leading
// zeros from IPv4-looking octet quads. Bracketed (IPv6) hosts are not
// supported.
fn parse_host(host: &str) -> Result<String> {
    if host.is_empty() {
        return Err(url_error("invalid host"));
    }

    if host.starts_with('[') {
        return Err(url_error("unsupported host type"));
    }

    if !host
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return Err(url_error("invalid host"));
    }

    let octets: Vec<&str> = host.split('.').collect();

    if octets.len() == 4
        && octets.iter().all(|o| {
            !o.is_empty()
                && o.bytes().all(|b| b.is_ascii_digit())
                && o.parse::<u16>().is_ok_and(|v| v <= 255)
        })
    {
        return Ok(octets
            .iter()
            .map(|o| o.parse::<u8>().unwrap().to_string())
            .collect::<Vec<_>>()
            .join("."));
    }

    Ok(host.to_ascii_lowercase())
}

fn parse_authority(s: &str) -> Result<UrlAuthority> {
    let (user, rest) = match s.split_once('@') {
        Some((u, r)) => (u.to_string(), r),
        None => (String::new(), s),
    };

    let (host, port) = match rest.rsplit_once(':') {
        Some((h, p)) => {
            let port = p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| url_error("invalid port"))?;
            (h, port)
        }
        None => (rest, 0),
    };

    let host = if host.is_empty() {
        String::new()
    } else {
        parse_host(host)?
    };

    Ok(UrlAuthority { user, host, port })
}

// Find the URL-notation scheme: two or more characters (to disambiguate
// from drive letters), alphabetic first, followed by ':' and a rooted
// path. Note that '+' is excluded so that typed prefixes and degenerate
// inputs fall back to the path notation.
fn find_scheme(s: &str) -> Option<(&str, &str)> {
    let p = s.find(':')?;

    if p < 2 || !s[p + 1..].starts_with('/') {
        return None;
    }

    let scheme = &s[..p];
    let bytes = scheme.as_bytes();

    if !bytes[0].is_ascii_alphabetic()
        || !bytes[1..].iter().all(|b| {
            b.is_ascii_alphanumeric() || *b == b'.' || *b == b'-'
        })
    {
        return None;
    }

    Some((scheme, &s[p + 1..]))
}

/// Whether the string is in URL notation (as opposed to being a plain
/// filesystem path).
pub fn is_url_notation(s: &str) -> bool {
    find_scheme(s).is_some()
}

/// A parsed repository URL.
///
/// The empty URL has all components absent. The components are public
/// for the benefit of the location-construction code; they are expected
/// to stay normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryUrl {
    pub scheme: Option<RepositoryProtocol>,
    pub authority: Option<UrlAuthority>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl RepositoryUrl {
    /// Parse a repository URL or a plain (potentially relative) path.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(url_error("empty URL"));
        }

        let Some((scheme, rest)) = find_scheme(s) else {
            return Self::parse_path(s);
        };

        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => RepositoryProtocol::Http,
            "https" => RepositoryProtocol::Https,
            "git" => RepositoryProtocol::Git,
            "ssh" => RepositoryProtocol::Ssh,
            "file" => RepositoryProtocol::File,
            _ => return Err(url_error("unknown scheme")),
        };

        // Split the authority, path, query, and fragment parts.
        let (authority, rest) = match rest.strip_prefix("//") {
            Some(r) => {
                let e = r
                    .find(['/', '?', '#'])
                    .unwrap_or(r.len());
                (Some(parse_authority(&r[..e])?), &r[e..])
            }
            None => (None, rest),
        };

        let (rest, fragment) = match rest.split_once('#') {
            Some((r, f)) => (r, Some(f.to_string())),
            None => (rest, None),
        };

        let (rest, query) = match rest.split_once('?') {
            Some((r, q)) => (r, Some(q.to_string())),
            None => (rest, None),
        };

        // What remains is the path. The leading '/' is the rooted-path
        // marker (or the authority/path separator), not part of the path
        // proper, so exactly one is stripped; any further slashes make
        // the path absolute.
        let path = if rest.is_empty() {
            if authority.is_some() { None } else { Some(String::new()) }
        } else {
            let p = rest.strip_prefix('/').unwrap_or(rest);

            let p = percent_decode_str(p)
                .decode_utf8()
                .map_err(|_| url_error("invalid url"))?
                .into_owned();

            Some(p)
        };

        let mut url = Self {
            scheme: Some(scheme),
            authority,
            path,
            query,
            fragment,
        };

        url.translate()?;
        Ok(url)
    }

    // Parse a plain filesystem path with an optional fragment as a file
    // URL.
    fn parse_path(s: &str) -> Result<Self> {
        let (path, fragment) = match s.split_once('#') {
            Some((p, f)) => (p, Some(f.to_string())),
            None => (s, None),
        };

        let path = fspath::normalize(path, false)
            .map_err(|_| url_error("invalid path"))?;

        Ok(Self {
            scheme: Some(RepositoryProtocol::File),
            authority: None,
            path: Some(path),
            query: None,
            fragment,
        })
    }

    // Validate and normalize the freshly-parsed components against the
    // scheme.
    fn translate(&mut self) -> Result<()> {
        if self.authority.is_none() && self.path.is_none() && self.query.is_none()
        {
            return Err(url_error("empty URL"));
        }

        let scheme = self.scheme.expect("scheme of parsed URL");

        if scheme == RepositoryProtocol::File {
            if let Some(a) = &self.authority {
                if !a.is_empty()
                    && (!a.host.eq_ignore_ascii_case("localhost")
                        || a.port != 0
                        || !a.user.is_empty())
                {
                    return Err(url_error("invalid authority"));
                }

                // The absent, empty, and localhost authorities are not
                // distinguished for local URLs.
                self.authority = None;
            }

            let path = match &self.path {
                Some(p) => p,
                None => return Err(url_error("absent path")),
            };

            // Make the path relative to the authority "root" absolute.
            if fspath::is_absolute(path) {
                return Err(url_error("absolute path"));
            }

            let path = format!("/{path}");
            self.path = Some(
                fspath::normalize(&path, false)
                    .map_err(|_| url_error("invalid path"))?,
            );

            if self.query.is_some() {
                return Err(url_error("invalid URL"));
            }
        } else {
            match &self.authority {
                Some(a) if !a.host.is_empty() => (),
                _ => return Err(url_error("invalid host")),
            }

            let path = self.path.take().unwrap_or_default();

            if fspath::is_absolute(&path) {
                return Err(url_error("absolute path"));
            }

            let path = fspath::normalize(&path, true)
                .map_err(|_| url_error("invalid path"))?;

            // The URL should not escape the root directory of a server.
            if path == ".." || path.starts_with("../") {
                return Err(url_error("invalid path"));
            }

            self.path = Some(path);
        }

        Ok(())
    }

    /// Whether this is the special empty URL.
    pub fn is_empty(&self) -> bool {
        self.scheme.is_none()
    }

    /// The protocol of a non-empty URL.
    ///
    /// # Panics
    ///
    /// Panics if the URL is empty.
    pub fn protocol(&self) -> RepositoryProtocol {
        self.scheme.expect("scheme of empty URL")
    }
}

impl FromStr for RepositoryUrl {
    type Err = PkgmetaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RepositoryUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Some(s) => s,
            None => return Ok(()),
        };

        if scheme == RepositoryProtocol::File {
            let path = self.path.as_deref().unwrap_or("");

            // Use the file:// notation for an absolute path with an
            // authority or fragment present; otherwise represent the URL
            // as a local path, appending the fragment if present.
            if fspath::is_absolute(path)
                && (self.authority.is_some() || self.fragment.is_some())
            {
                write!(f, "file:")?;

                if let Some(a) = &self.authority {
                    write!(f, "//{}", a.host)?;
                }

                write!(
                    f,
                    "{}",
                    percent_encoding::utf8_percent_encode(
                        path,
                        PATH_ENCODE_SET
                    )
                )?;
            } else {
                write!(f, "{path}")?;

                if let Some(frag) = &self.fragment {
                    write!(f, "#{frag}")?;
                }
            }

            return Ok(());
        }

        write!(f, "{scheme}://")?;

        if let Some(a) = &self.authority {
            if !a.user.is_empty() {
                write!(f, "{}@", a.user)?;
            }

            write!(f, "{}", a.host)?;

            if a.port != 0 {
                write!(f, ":{}", a.port)?;
            }
        }

        if let Some(p) = &self.path {
            write!(
                f,
                "/{}",
                percent_encoding::utf8_percent_encode(p, PATH_ENCODE_SET)
            )?;
        }

        if let Some(q) = &self.query {
            write!(f, "?{q}")?;
        }

        if let Some(frag) = &self.fragment {
            write!(f, "#{frag}")?;
        }

        Ok(())
    }
}
