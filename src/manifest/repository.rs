//! Repository manifests and repository manifest lists.

use std::fmt;
use std::sync::LazyLock;

use crate::error::{PkgmetaError, Result};
use crate::fspath;
use crate::manifest::text::{
    ManifestParser, ManifestSerializer, NameValue, merge_comment,
    split_comment,
};
use crate::manifest::{Email, bad_name, bad_value, valid_fingerprint};
use crate::repository::location::{StripMode, strip_domain, strip_path};
use crate::repository::{
    RepositoryLocation, RepositoryType, RepositoryUrl, guess_type,
};

/// The role of a repository in a repository list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryRole {
    Base,
    Prerequisite,
    Complement,
}

impl RepositoryRole {
    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "base" => Some(Self::Base),
            "prerequisite" => Some(Self::Prerequisite),
            "complement" => Some(Self::Complement),
            _ => None,
        }
    }
}

impl fmt::Display for RepositoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Base => "base",
            Self::Prerequisite => "prerequisite",
            Self::Complement => "complement",
        };
        write!(f, "{s}")
    }
}

/// A repository manifest.
///
/// The `url`, `email`, `summary`, `description`, and `certificate`
/// values may only be present for the base repository (and only for
/// certain repository types); `trust` only for a prerequisite or
/// complement pkg repository.
#[derive(Debug, Clone, Default)]
pub struct RepositoryManifest {
    /// Non-empty for non-base roles.
    pub location: RepositoryLocation,
    pub role: Option<RepositoryRole>,
    pub url: Option<String>,
    pub email: Option<Email>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub certificate: Option<String>,
    /// The repository fingerprint to trust.
    pub trust: Option<String>,
    /// The repository fragment id this repository belongs to.
    pub fragment: Option<String>,
}

impl RepositoryManifest {
    /// The effective role: base if not explicitly specified.
    pub fn effective_role(&self) -> RepositoryRole {
        self.role.unwrap_or(RepositoryRole::Base)
    }

    /// The effective web interface URL based on the specified remote
    /// repository location. A url value that does not start with `./.`
    /// or `./..` (or a non-pkg repository type) is returned unchanged.
    /// Otherwise the two leading dot components select whether to strip
    /// the cosmetic domain prefix and the `pkg`-and-version path
    /// components, and the remainder is appended to the stripped
    /// repository URL.
    pub fn effective_url(
        &self,
        l: &RepositoryLocation,
    ) -> Result<Option<String>> {
        const INVALID_LOCATION: &str = "invalid repository location";

        let invalid =
            |d: &str| PkgmetaError::Location(d.to_string());

        if l.is_empty() || l.is_local() {
            return Err(invalid(INVALID_LOCATION));
        }

        let url = match &self.url {
            Some(u) => u,
            None => return Ok(None),
        };

        if l.repo_type() != RepositoryType::Pkg || !url.starts_with('.') {
            return Ok(Some(url.clone()));
        }

        let comps = fspath::components(url);
        let mut it = comps.iter();

        let mut strip = || -> Result<bool> {
            match it.next() {
                Some(&"..") => Ok(true),
                Some(&".") => Ok(false),
                _ => Err(invalid("invalid relative url")),
            }
        };

        let strip_domain_prefix = strip()?;
        let strip_path_component = strip()?;

        // The web interface relative path with the special first two
        // components stripped.
        let rpath = it.copied().collect::<Vec<_>>().join("/");

        let mut u = l.url().clone();

        if strip_domain_prefix {
            let a = u.authority.as_mut().expect("remote URL authority");
            a.host = strip_domain(&a.host, RepositoryType::Pkg)?;
        }

        // Strip the repository URL path before appending the relative
        // path so that excessive '..' components fail instead of
        // escaping into the stripped part.
        let ipath = strip_path(
            l.path(),
            if strip_path_component {
                StripMode::Component
            } else {
                StripMode::Version
            },
        )?;

        let ipath = fspath::join(&ipath, &rpath);
        let ipath = fspath::normalize(&ipath, true)
            .map_err(|_| invalid(INVALID_LOCATION))?;

        if ipath == ".." || ipath.starts_with("../") {
            return Err(invalid(INVALID_LOCATION));
        }

        u.path = if ipath.is_empty() { None } else { Some(ipath) };

        Ok(Some(u.to_string()))
    }

    /// Serialize the manifest, verifying the role-dependent field
    /// rules.
    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        let bad = |s: &ManifestSerializer, d: &str| {
            PkgmetaError::serialization(s.source_name(), d)
        };

        let base = self.effective_role() == RepositoryRole::Base;

        if self.location.is_empty() != base {
            return Err(bad(
                s,
                if self.location.is_empty() {
                    "no location specified"
                } else {
                    "location not allowed"
                },
            ));
        }

        s.next("", "1")?;

        // The location can be relative, in which case the type cannot
        // be guessed from it, so it is serialized too.
        if !self.location.is_empty() {
            s.next("location", &self.location.to_string())?;
            s.next("type", &self.location.repo_type().to_string())?;
        }

        if let Some(r) = &self.role {
            s.next("role", &r.to_string())?;
        }

        if let Some(u) = &self.url {
            if !base {
                return Err(bad(s, "url not allowed"));
            }

            s.next("url", u)?;
        }

        if let Some(e) = &self.email {
            if !base {
                return Err(bad(s, "email not allowed"));
            }

            s.next("email", &merge_comment(&e.address, &e.comment))?;
        }

        if let Some(v) = &self.summary {
            if !base {
                return Err(bad(s, "summary not allowed"));
            }

            s.next("summary", v)?;
        }

        if let Some(v) = &self.description {
            if !base {
                return Err(bad(s, "description not allowed"));
            }

            s.next("description", v)?;
        }

        if let Some(v) = &self.certificate {
            if !base {
                return Err(bad(s, "certificate not allowed"));
            }

            s.next("certificate", v)?;
        }

        if let Some(v) = &self.trust {
            if base
                || self.location.repo_type() != RepositoryType::Pkg
            {
                return Err(bad(s, "trust not allowed"));
            }

            s.next("trust", v)?;
        }

        if let Some(v) = &self.fragment {
            s.next("fragment", v)?;
        }

        s.next("", "")?;

        Ok(())
    }
}

fn parse_repository_manifest(
    p: &mut ManifestParser,
    nv: NameValue,
    base_type: RepositoryType,
    ignore_unknown: bool,
) -> Result<RepositoryManifest> {
    let src = p.source_name().to_string();

    if !nv.name.is_empty() {
        return Err(bad_name(
            &src,
            &nv,
            "start of repository manifest expected",
        ));
    }

    if nv.value != "1" {
        return Err(bad_value(&src, &nv, "unsupported format version"));
    }

    let mut r = RepositoryManifest::default();

    // The repository type value can come after the location value, so
    // the location parsing is postponed until all values are read.
    let mut repo_type: Option<RepositoryType> = None;
    let mut location: Option<NameValue> = None;

    let end;

    loop {
        let nv = p.next()?;

        if nv.is_end() {
            end = nv;
            break;
        }

        let v = nv.value.clone();

        match nv.name.as_str() {
            "location" => {
                if location.is_some() {
                    return Err(bad_name(&src, &nv, "location redefinition"));
                }

                if v.is_empty() {
                    return Err(bad_value(&src, &nv, "empty location"));
                }

                location = Some(nv);
            }
            "type" => {
                if repo_type.is_some() {
                    return Err(bad_name(&src, &nv, "type redefinition"));
                }

                repo_type =
                    Some(v.parse().map_err(|e: PkgmetaError| {
                        bad_value(&src, &nv, e.reason())
                    })?);
            }
            "role" => {
                if r.role.is_some() {
                    return Err(bad_name(&src, &nv, "role redefinition"));
                }

                r.role = Some(RepositoryRole::try_parse(&v).ok_or_else(
                    || bad_value(&src, &nv, "unrecognized role"),
                )?);
            }
            "url" => {
                if r.url.is_some() {
                    return Err(bad_name(&src, &nv, "url redefinition"));
                }

                if v.is_empty() {
                    return Err(bad_value(&src, &nv, "empty url"));
                }

                r.url = Some(v);
            }
            "email" => {
                if r.email.is_some() {
                    return Err(bad_name(&src, &nv, "email redefinition"));
                }

                let (e, c) = split_comment(&v);

                if e.is_empty() {
                    return Err(bad_value(&src, &nv, "empty email"));
                }

                r.email = Some(Email::new(e, c));
            }
            "summary" => {
                if r.summary.is_some() {
                    return Err(bad_name(&src, &nv, "summary redefinition"));
                }

                if v.is_empty() {
                    return Err(bad_value(&src, &nv, "empty summary"));
                }

                r.summary = Some(v);
            }
            "description" => {
                if r.description.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "description redefinition",
                    ));
                }

                if v.is_empty() {
                    return Err(bad_value(&src, &nv, "empty description"));
                }

                r.description = Some(v);
            }
            "certificate" => {
                if base_type != RepositoryType::Pkg {
                    return Err(bad_name(&src, &nv, "certificate not allowed"));
                }

                if r.certificate.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "certificate redefinition",
                    ));
                }

                if v.is_empty() {
                    return Err(bad_value(&src, &nv, "empty certificate"));
                }

                r.certificate = Some(v);
            }
            "trust" => {
                if r.trust.is_some() {
                    return Err(bad_name(&src, &nv, "trust redefinition"));
                }

                if !valid_fingerprint(&v) {
                    return Err(bad_value(&src, &nv, "invalid fingerprint"));
                }

                r.trust = Some(v);
            }
            "fragment" => {
                if r.fragment.is_some() {
                    return Err(bad_name(&src, &nv, "fragment redefinition"));
                }

                if v.is_empty() {
                    return Err(bad_value(&src, &nv, "empty fragment"));
                }

                r.fragment = Some(v);
            }
            n => {
                if !ignore_unknown {
                    return Err(bad_name(
                        &src,
                        &nv,
                        format!("unknown name '{n}' in repository manifest"),
                    ));
                }
            }
        }
    }

    // Parse the location.
    if let Some(nv) = location {
        let parse = || -> Result<RepositoryLocation> {
            let u = RepositoryUrl::parse(&nv.value)?;

            let t = match repo_type {
                Some(t) => t,
                None => guess_type(&u, false),
            };

            // A relative path is allowed here; it is completed by the
            // caller against the base repository location.
            RepositoryLocation::with_base(
                u,
                t,
                &RepositoryLocation::empty(),
            )
        };

        r.location =
            parse().map_err(|e| bad_value(&src, &nv, e.reason()))?;
    }

    // Verify that all non-optional values were specified and the
    // optional ones are allowed.
    let base = r.effective_role() == RepositoryRole::Base;

    if r.location.is_empty() != base {
        return Err(bad_value(
            &src,
            &end,
            if r.location.is_empty() {
                "no location specified"
            } else {
                "location not allowed"
            },
        ));
    }

    if r.trust.is_some()
        && (base || r.location.repo_type() != RepositoryType::Pkg)
    {
        return Err(bad_value(&src, &end, "trust not allowed"));
    }

    if !base {
        if r.url.is_some() {
            return Err(bad_value(&src, &end, "url not allowed"));
        }

        if r.email.is_some() {
            return Err(bad_value(&src, &end, "email not allowed"));
        }

        if r.summary.is_some() {
            return Err(bad_value(&src, &end, "summary not allowed"));
        }

        if r.description.is_some() {
            return Err(bad_value(&src, &end, "description not allowed"));
        }

        if r.certificate.is_some() {
            return Err(bad_value(&src, &end, "certificate not allowed"));
        }
    }

    Ok(r)
}

fn parse_single_repository_manifest(
    p: &mut ManifestParser,
    base_type: RepositoryType,
    ignore_unknown: bool,
) -> Result<RepositoryManifest> {
    let nv = p.next()?;
    let r = parse_repository_manifest(p, nv, base_type, ignore_unknown)?;

    let nv = p.next()?;
    if !nv.is_end() {
        return Err(bad_name(
            p.source_name(),
            &nv,
            "single repository manifest expected",
        ));
    }

    Ok(r)
}

/// Create an individual pkg repository manifest.
pub fn pkg_repository_manifest(
    p: &mut ManifestParser,
    ignore_unknown: bool,
) -> Result<RepositoryManifest> {
    parse_single_repository_manifest(p, RepositoryType::Pkg, ignore_unknown)
}

/// Create an individual dir repository manifest.
pub fn dir_repository_manifest(
    p: &mut ManifestParser,
    ignore_unknown: bool,
) -> Result<RepositoryManifest> {
    parse_single_repository_manifest(p, RepositoryType::Dir, ignore_unknown)
}

/// Create an individual git repository manifest.
pub fn git_repository_manifest(
    p: &mut ManifestParser,
    ignore_unknown: bool,
) -> Result<RepositoryManifest> {
    parse_single_repository_manifest(p, RepositoryType::Git, ignore_unknown)
}

// Parse a repository manifest list, making sure there is at most one
// base repository manifest in it.
fn parse_repository_manifests(
    p: &mut ManifestParser,
    base_type: RepositoryType,
    ignore_unknown: bool,
) -> Result<Vec<RepositoryManifest>> {
    let mut ms: Vec<RepositoryManifest> = Vec::new();
    let mut base = false;

    let mut nv = p.next()?;
    while !nv.is_end() {
        let start = nv.clone();
        ms.push(parse_repository_manifest(p, nv, base_type, ignore_unknown)?);

        if ms.last().unwrap().effective_role() == RepositoryRole::Base {
            if base {
                return Err(bad_name(
                    p.source_name(),
                    &start,
                    "base repository manifest redefinition",
                ));
            }
            base = true;
        }

        nv = p.next()?;
    }

    Ok(ms)
}

fn serialize_repository_manifests(
    s: &mut ManifestSerializer,
    ms: &[RepositoryManifest],
) -> Result<()> {
    for m in ms {
        m.serialize(s)?;
    }

    s.next("", "")?;

    Ok(())
}

/// The pkg repository list manifest.
#[derive(Debug, Clone, Default)]
pub struct PkgRepositoryManifests {
    pub manifests: Vec<RepositoryManifest>,
}

impl PkgRepositoryManifests {
    pub fn parse(
        p: &mut ManifestParser,
        ignore_unknown: bool,
    ) -> Result<Self> {
        Ok(Self {
            manifests: parse_repository_manifests(
                p,
                RepositoryType::Pkg,
                ignore_unknown,
            )?,
        })
    }

    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        serialize_repository_manifests(s, &self.manifests)
    }
}

/// The dir repository list manifest.
#[derive(Debug, Clone, Default)]
pub struct DirRepositoryManifests {
    pub manifests: Vec<RepositoryManifest>,
}

impl DirRepositoryManifests {
    pub fn parse(
        p: &mut ManifestParser,
        ignore_unknown: bool,
    ) -> Result<Self> {
        Ok(Self {
            manifests: parse_repository_manifests(
                p,
                RepositoryType::Dir,
                ignore_unknown,
            )?,
        })
    }

    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        serialize_repository_manifests(s, &self.manifests)
    }
}

/// The git repository list manifest.
#[derive(Debug, Clone, Default)]
pub struct GitRepositoryManifests {
    pub manifests: Vec<RepositoryManifest>,
}

impl GitRepositoryManifests {
    pub fn parse(
        p: &mut ManifestParser,
        ignore_unknown: bool,
    ) -> Result<Self> {
        Ok(Self {
            manifests: parse_repository_manifests(
                p,
                RepositoryType::Git,
                ignore_unknown,
            )?,
        })
    }

    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        serialize_repository_manifests(s, &self.manifests)
    }
}

static EMPTY_BASE: LazyLock<RepositoryManifest> =
    LazyLock::new(RepositoryManifest::default);

/// Search a repository manifest list for the base repository and return
/// it, if found. Otherwise return the empty manifest instance (the
/// representation of the default base).
pub fn find_base_repository(
    ms: &[RepositoryManifest],
) -> &RepositoryManifest {
    ms.iter()
        .find(|m| m.effective_role() == RepositoryRole::Base)
        .unwrap_or(&EMPTY_BASE)
}
