//! Package manifests and package manifest lists.

use log::debug;

use crate::build_class::BuildClassExpr;
use crate::constraint::VersionConstraint;
use crate::error::{PkgmetaError, Result};
use crate::fspath;
use crate::manifest::text::{
    ManifestParser, ManifestSerializer, NameValue, merge_comment,
    split_comment,
};
use crate::manifest::{
    BuildConstraint, Dependency, DependencyAlternatives, Email, Licenses,
    ManifestFlags, ManifestUrl, Priority, PriorityLevel,
    RequirementAlternatives, TestDependency, TestDependencyType, TextFile,
    TextType, bad_name, bad_value, parse_list_items, split_activity_markers,
    to_text_type, valid_sha256,
};
use crate::name::PackageName;
use crate::version::{Version, VersionFlags};

// Value diagnostics that degrade gracefully when the source name is
// empty (an override list supplied without location information).
fn value_error(
    source_name: &str,
    nv: &NameValue,
    description: String,
) -> PkgmetaError {
    if source_name.is_empty() {
        PkgmetaError::parsing_nameless(description)
    } else {
        bad_value(source_name, nv, description)
    }
}

fn name_error(
    source_name: &str,
    nv: &NameValue,
    description: String,
) -> PkgmetaError {
    if source_name.is_empty() {
        PkgmetaError::parsing_nameless(description)
    } else {
        bad_name(source_name, nv, description)
    }
}

fn parse_build_class_expr_value(
    nv: &NameValue,
    first: bool,
    source_name: &str,
) -> Result<BuildClassExpr> {
    let (v, c) = split_comment(&nv.value);

    let invalid = |e: &PkgmetaError| {
        if source_name.is_empty() {
            PkgmetaError::parsing_nameless(format!(
                "invalid package builds in '{v}': {}",
                e.reason()
            ))
        } else {
            bad_value(
                source_name,
                nv,
                format!("invalid package builds: {}", e.reason()),
            )
        }
    };

    let expr = BuildClassExpr::parse(&v, c).map_err(|e| invalid(&e))?;

    // The underlying build configuration class set may only appear in
    // the first builds value.
    if !expr.underlying_classes.is_empty() && !first {
        return Err(invalid(&PkgmetaError::BuildClassExpr(
            "unexpected underlying class set".to_string(),
        )));
    }

    Ok(expr)
}

fn parse_build_constraint_value(
    nv: &NameValue,
    exclusion: bool,
    source_name: &str,
) -> Result<BuildConstraint> {
    let (v, comment) = split_comment(&nv.value);

    let invalid = |d: &str| {
        if source_name.is_empty() {
            PkgmetaError::parsing_nameless(format!("{d} in '{v}'"))
        } else {
            bad_value(source_name, nv, d)
        }
    };

    let (config, target) = match v.split_once('/') {
        Some((c, t)) => (c.to_string(), Some(t.to_string())),
        None => (v.clone(), None),
    };

    if config.is_empty() {
        return Err(invalid("empty build configuration name pattern"));
    }

    if target.as_ref().is_some_and(String::is_empty) {
        return Err(invalid("empty build target pattern"));
    }

    Ok(BuildConstraint {
        exclusion,
        config,
        target,
        comment,
    })
}

fn parse_email_value(
    nv: &NameValue,
    what: &str,
    source_name: &str,
    allow_empty: bool,
) -> Result<Email> {
    let (v, c) = split_comment(&nv.value);

    if v.is_empty() && !allow_empty {
        return Err(value_error(
            source_name,
            nv,
            format!("empty {what} email"),
        ));
    }

    Ok(Email::new(v, c))
}

/// A package manifest.
///
/// The `location`, `sha256sum`, and `fragment` values are only valid in
/// manifest lists (and only for certain repository types).
#[derive(Debug, Clone, Default)]
pub struct PackageManifest {
    pub name: PackageName,
    pub version: Version,
    pub upstream_version: Option<String>,
    pub project: Option<PackageName>,
    pub priority: Option<Priority>,
    pub summary: String,
    pub license_alternatives: Vec<Licenses>,
    pub topics: Vec<String>,
    pub keywords: Vec<String>,
    pub description: Option<TextFile>,
    pub description_type: Option<String>,
    pub changes: Vec<TextFile>,
    pub url: Option<ManifestUrl>,
    pub doc_url: Option<ManifestUrl>,
    pub src_url: Option<ManifestUrl>,
    pub package_url: Option<ManifestUrl>,
    pub email: Option<Email>,
    pub package_email: Option<Email>,
    pub build_email: Option<Email>,
    pub build_warning_email: Option<Email>,
    pub build_error_email: Option<Email>,
    pub dependencies: Vec<DependencyAlternatives>,
    pub requirements: Vec<RequirementAlternatives>,
    pub tests: Vec<TestDependency>,
    pub builds: Vec<BuildClassExpr>,
    pub build_constraints: Vec<BuildConstraint>,
    pub location: Option<String>,
    pub sha256sum: Option<String>,
    pub fragment: Option<String>,
}

/// A version translation hook: may patch the just-parsed version (for
/// example, stamp in snapshot information for a package accessed as a
/// directory).
pub type TranslateVersion<'a> = &'a dyn Fn(&mut Version) -> Result<()>;

// Parse one dependency: a package name followed by an optional version
// constraint.
fn parse_dependency(
    source_name: &str,
    nv: &NameValue,
    d: &str,
    what: &str,
    version: &Version,
    complete_depends: bool,
    flags: ManifestFlags,
) -> Result<Dependency> {
    // The constraint part starts at the first of the constraint
    // characters.
    const CONSTRAINT_CHARS: &[char] = &['=', '<', '>', '(', '[', '~', '^'];

    let (n, c) = match d.find(CONSTRAINT_CHARS) {
        Some(i) => (d[..i].trim_end_matches([' ', '\t']), Some(&d[i..])),
        None => (d, None),
    };

    let name = PackageName::new(n).map_err(|e| {
        value_error(
            source_name,
            nv,
            format!("invalid {what} package name: {}", e.reason()),
        )
    })?;

    let constraint = match c {
        None => None,
        Some(c) => {
            let invalid = |e: &PkgmetaError| {
                value_error(
                    source_name,
                    nv,
                    format!(
                        "invalid {what} package constraint: {}",
                        e.reason()
                    ),
                )
            };

            let vc =
                VersionConstraint::parse(c).map_err(|e| invalid(&e))?;

            if !vc.is_complete() && flags.forbid_incomplete_dependencies {
                return Err(value_error(
                    source_name,
                    nv,
                    "$ not allowed".to_string(),
                ));
            }

            // Complete the constraint against the dependent version.
            let vc = if complete_depends {
                vc.effective(version).map_err(|e| invalid(&e))?
            } else {
                vc
            };

            Some(vc)
        }
    };

    Ok(Dependency { name, constraint })
}

#[allow(clippy::too_many_lines)]
fn parse_package_manifest(
    p: &mut ManifestParser,
    nv: NameValue,
    translate: Option<TranslateVersion<'_>>,
    ignore_unknown: bool,
    complete_depends: bool,
    flags: ManifestFlags,
    m: &mut PackageManifest,
) -> Result<()> {
    let src = p.source_name().to_string();

    // Make sure this is the start and we support the version.
    if !nv.name.is_empty() {
        return Err(bad_name(&src, &nv, "start of package manifest expected"));
    }

    if nv.value != "1" {
        return Err(bad_value(&src, &nv, "unsupported format version"));
    }

    fn parse_string_list(
        src: &str,
        nv: &NameValue,
        r: &mut Vec<String>,
        delim: char,
        single_word: bool,
        truncate: bool,
        what: &str,
    ) -> Result<()> {
        if !r.is_empty() {
            return Err(bad_name(
                src,
                nv,
                format!("package {what} redefinition"),
            ));
        }

        for item in parse_list_items(&nv.value, delim) {
            if single_word && item.contains([' ', '\t']) {
                return Err(bad_value(
                    src,
                    nv,
                    format!("only single-word {what} allowed"),
                ));
            }

            r.push(item);
        }

        if r.is_empty() {
            return Err(bad_value(
                src,
                nv,
                format!("empty package {what} specification"),
            ));
        }

        // If the list length limit is exceeded then truncate or fail.
        if r.len() > 5 {
            if truncate {
                r.truncate(5);
            } else {
                return Err(bad_value(
                    src,
                    nv,
                    format!("up to five {what} allowed"),
                ));
            }
        }

        Ok(())
    }

    let parse_url = |nv: &NameValue, what: &str| -> Result<ManifestUrl> {
        let (v, c) = split_comment(&nv.value);

        if nv.value.is_empty() {
            return Err(bad_value(&src, nv, format!("empty {what} url")));
        }

        ManifestUrl::new(v, c).map_err(|e| {
            bad_value(
                &src,
                nv,
                format!("invalid {what} url: {}", e.reason()),
            )
        })
    };

    // The upstream version, dependency, test dependency, and description
    // values are cached and validated later, after the version value is
    // known.
    let mut upstream_version: Option<NameValue> = None;
    let mut dependencies: Vec<NameValue> = Vec::new();
    let mut tests: Vec<NameValue> = Vec::new();
    let mut description: Option<NameValue> = None;
    let mut description_type: Option<NameValue> = None;

    let end;

    loop {
        let nv = p.next()?;

        if nv.is_end() {
            end = nv;
            break;
        }

        let n = nv.name.clone();
        let v = nv.value.clone();

        match n.as_str() {
            "name" => {
                if !m.name.is_empty() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package name redefinition",
                    ));
                }

                m.name = PackageName::new(v).map_err(|e| {
                    bad_value(
                        &src,
                        &nv,
                        format!("invalid package name: {}", e.reason()),
                    )
                })?;
            }
            "version" => {
                if !m.version.is_empty() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package version redefinition",
                    ));
                }

                m.version = Version::parse(&v, VersionFlags::default())
                    .map_err(|e| {
                        bad_value(
                            &src,
                            &nv,
                            format!(
                                "invalid package version: {}",
                                e.reason()
                            ),
                        )
                    })?;

                // Versions like 1.2.3- are intended for version
                // constraints rather than actual releases.
                if m.version.is_earliest_release() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "invalid package version release",
                    ));
                }

                if let Some(tf) = translate {
                    tf(&mut m.version)?;

                    // Re-validate the version after the translation.
                    if m.version.is_empty() {
                        return Err(bad_value(
                            &src,
                            &nv,
                            "empty translated package version",
                        ));
                    }

                    if m.version.is_earliest_release() {
                        return Err(bad_value(
                            &src,
                            &nv,
                            format!(
                                "invalid translated package version {}: \
                                 earliest release",
                                m.version
                            ),
                        ));
                    }
                }
            }
            "upstream-version" => {
                if upstream_version.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "upstream package version redefinition",
                    ));
                }

                if v.is_empty() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "empty upstream package version",
                    ));
                }

                upstream_version = Some(nv);
            }
            "project" => {
                if m.project.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package project redefinition",
                    ));
                }

                m.project = Some(PackageName::new(v).map_err(|e| {
                    bad_value(
                        &src,
                        &nv,
                        format!("invalid project name: {}", e.reason()),
                    )
                })?);
            }
            "summary" => {
                if !m.summary.is_empty() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package summary redefinition",
                    ));
                }

                if v.is_empty() {
                    return Err(bad_value(&src, &nv, "empty package summary"));
                }

                m.summary = v;
            }
            "topics" => {
                parse_string_list(
                    &src,
                    &nv,
                    &mut m.topics,
                    ',',
                    false,
                    false,
                    "topics",
                )?;
            }
            "keywords" => {
                parse_string_list(
                    &src,
                    &nv,
                    &mut m.keywords,
                    ' ',
                    true,
                    false,
                    "keywords",
                )?;
            }
            "tags" => {
                parse_string_list(
                    &src,
                    &nv,
                    &mut m.keywords,
                    ',',
                    true,
                    true,
                    "tags",
                )?;
            }
            "description" => {
                if let Some(d) = &description {
                    return Err(bad_name(
                        &src,
                        &nv,
                        if d.name == "description-file" {
                            "package description and description-file are \
                             mutually exclusive"
                        } else {
                            "package description redefinition"
                        },
                    ));
                }

                if v.is_empty() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "empty package description",
                    ));
                }

                description = Some(nv);
            }
            "description-file" => {
                if flags.forbid_file {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package description-file not allowed",
                    ));
                }

                if let Some(d) = &description {
                    return Err(bad_name(
                        &src,
                        &nv,
                        if d.name == "description-file" {
                            "package description-file redefinition"
                        } else {
                            "package description-file and description are \
                             mutually exclusive"
                        },
                    ));
                }

                description = Some(nv);
            }
            "description-type" => {
                if description_type.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package description-type redefinition",
                    ));
                }

                description_type = Some(nv);
            }
            "changes" => {
                if v.is_empty() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "empty package changes specification",
                    ));
                }

                m.changes.push(TextFile::Inline(v));
            }
            "changes-file" => {
                if flags.forbid_file {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package changes-file not allowed",
                    ));
                }

                let (path, comment) = split_comment(&v);

                if path.is_empty() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "no path in package changes-file",
                    ));
                }

                if fspath::is_absolute(&path) {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "package changes-file path is absolute",
                    ));
                }

                m.changes.push(TextFile::File { path, comment });
            }
            "url" => {
                if m.url.is_some() {
                    return Err(bad_name(&src, &nv, "project url redefinition"));
                }

                m.url = Some(parse_url(&nv, "project")?);
            }
            "doc-url" => {
                if m.doc_url.is_some() {
                    return Err(bad_name(&src, &nv, "doc url redefinition"));
                }

                m.doc_url = Some(parse_url(&nv, "doc")?);
            }
            "src-url" => {
                if m.src_url.is_some() {
                    return Err(bad_name(&src, &nv, "src url redefinition"));
                }

                m.src_url = Some(parse_url(&nv, "src")?);
            }
            "package-url" => {
                if m.package_url.is_some() {
                    return Err(bad_name(&src, &nv, "package url redefinition"));
                }

                m.package_url = Some(parse_url(&nv, "package")?);
            }
            "email" | "package-email" | "build-email"
            | "build-warning-email" | "build-error-email" => {
                let (slot, what, allow_empty) = match n.as_str() {
                    "email" => (&mut m.email, "project", false),
                    "package-email" => (&mut m.package_email, "package", false),
                    "build-email" => (&mut m.build_email, "build", true),
                    "build-warning-email" => {
                        (&mut m.build_warning_email, "build warning", false)
                    }
                    _ => (&mut m.build_error_email, "build error", false),
                };

                if slot.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        format!("{what} email redefinition"),
                    ));
                }

                *slot = Some(parse_email_value(&nv, what, &src, allow_empty)?);
            }
            "priority" => {
                if m.priority.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package priority redefinition",
                    ));
                }

                let (v, c) = split_comment(&v);

                let level = PriorityLevel::try_parse(&v).ok_or_else(|| {
                    bad_value(&src, &nv, "invalid package priority")
                })?;

                m.priority = Some(Priority { level, comment: c });
            }
            "license" => {
                let (v, c) = split_comment(&v);
                let mut l = Licenses {
                    licenses: Vec::new(),
                    comment: c,
                };

                for lv in parse_list_items(&v, ',') {
                    // License schemes are reserved for future use; only
                    // the 'other' scheme is currently recognized (the
                    // default is 'spdx'). A 'DocumentRef-' prefix marks
                    // an SPDX user-defined license reference rather than
                    // a scheme.
                    if let Some(p) = lv.find(':')
                        && lv.find("DocumentRef-").is_none_or(|d| d > p)
                        && &lv[..p] != "other"
                    {
                        return Err(bad_value(
                            &src,
                            &nv,
                            "invalid package license scheme",
                        ));
                    }

                    l.licenses.push(lv);
                }

                if l.licenses.is_empty() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "empty package license specification",
                    ));
                }

                m.license_alternatives.push(l);
            }
            "requires" => {
                let (conditional, buildtime, _) = split_activity_markers(&v);
                let (vl, comment) = split_comment(&v);
                let (_, _, vl) = split_activity_markers(&vl);

                let ra = RequirementAlternatives {
                    alternatives: parse_list_items(vl, '|'),
                    conditional,
                    buildtime,
                    comment,
                };

                if ra.alternatives.is_empty() && ra.comment.is_empty() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "empty package requirement specification",
                    ));
                }

                m.requirements.push(ra);
            }
            "builds" => {
                m.builds.push(parse_build_class_expr_value(
                    &nv,
                    m.builds.is_empty(),
                    &src,
                )?);
            }
            "build-include" => {
                m.build_constraints
                    .push(parse_build_constraint_value(&nv, false, &src)?);
            }
            "build-exclude" => {
                m.build_constraints
                    .push(parse_build_constraint_value(&nv, true, &src)?);
            }
            "depends" => {
                dependencies.push(nv);
            }
            "tests" | "examples" | "benchmarks" => {
                tests.push(nv);
            }
            "location" => {
                if flags.forbid_location {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package location not allowed",
                    ));
                }

                if m.location.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package location redefinition",
                    ));
                }

                if v.is_empty() {
                    return Err(bad_value(&src, &nv, "empty package location"));
                }

                if fspath::is_absolute(&v) {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "absolute package location",
                    ));
                }

                m.location = Some(v);
            }
            "sha256sum" => {
                if flags.forbid_sha256sum {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package sha256sum not allowed",
                    ));
                }

                if m.sha256sum.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package sha256sum redefinition",
                    ));
                }

                if !valid_sha256(&v) {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "invalid package sha256sum",
                    ));
                }

                m.sha256sum = Some(v);
            }
            "fragment" => {
                if flags.forbid_fragment {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package repository fragment not allowed",
                    ));
                }

                if m.fragment.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package repository fragment redefinition",
                    ));
                }

                if v.is_empty() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "empty package repository fragment",
                    ));
                }

                m.fragment = Some(v);
            }
            _ => {
                if !ignore_unknown {
                    return Err(bad_name(
                        &src,
                        &nv,
                        format!("unknown name '{n}' in package manifest"),
                    ));
                }
            }
        }
    }

    // Verify all non-optional values were specified.
    if m.name.is_empty() {
        return Err(bad_value(&src, &end, "no package name specified"));
    } else if m.version.is_empty() {
        return Err(bad_value(&src, &end, "no package version specified"));
    } else if m.summary.is_empty() {
        return Err(bad_value(&src, &end, "no package summary specified"));
    } else if m.license_alternatives.is_empty() {
        return Err(bad_value(&src, &end, "no project license specified"));
    }

    // Verify that the upstream version is not specified for a stub.
    if let Some(nv) = upstream_version {
        if m.version.is_stub() {
            return Err(bad_name(
                &src,
                &nv,
                "upstream package version specified for a stub",
            ));
        }

        m.upstream_version = Some(nv.value);
    }

    // Verify that the description is specified if its type is.
    if let Some(dt) = &description_type
        && description.is_none()
    {
        return Err(bad_value(
            &src,
            dt,
            "no package description for specified description type",
        ));
    }

    // Validate (and set) the description and its type.
    if let Some(nv) = description {
        if nv.name == "description-file" {
            let (path, comment) = split_comment(&nv.value);

            if path.is_empty() {
                return Err(bad_value(
                    &src,
                    &nv,
                    "no path in package description-file",
                ));
            }

            if fspath::is_absolute(&path) {
                return Err(bad_value(
                    &src,
                    &nv,
                    "package description-file path is absolute",
                ));
            }

            m.description = Some(TextFile::File { path, comment });
        } else {
            m.description = Some(TextFile::Inline(nv.value.clone()));
        }

        if let Some(dt) = &description_type {
            m.description_type = Some(dt.value.clone());
        }

        // Verify the description type.
        if let Err(e) = m.effective_description_type(ignore_unknown) {
            return Err(match &description_type {
                Some(dt) => bad_value(
                    &src,
                    dt,
                    format!(
                        "invalid package description type: {}",
                        e.reason()
                    ),
                ),
                None => bad_value(
                    &src,
                    &nv,
                    format!(
                        "invalid package description file: {}",
                        e.reason()
                    ),
                ),
            });
        }
    }

    // Now that the version value is known, parse the dependencies and
    // complete their constraints, if requested.
    for nv in dependencies {
        let (conditional, buildtime, _) = split_activity_markers(&nv.value);
        let (vl, comment) = split_comment(&nv.value);
        let (_, _, vl) = split_activity_markers(&vl);

        let mut da = DependencyAlternatives {
            alternatives: Vec::new(),
            conditional,
            buildtime,
            comment,
        };

        for d in parse_list_items(vl, '|') {
            da.alternatives.push(parse_dependency(
                &src,
                &nv,
                &d,
                "prerequisite",
                &m.version,
                complete_depends,
                flags,
            )?);
        }

        if da.alternatives.is_empty() {
            return Err(bad_value(
                &src,
                &nv,
                "empty package dependency specification",
            ));
        }

        m.dependencies.push(da);
    }

    // Parse the test dependencies.
    for nv in tests {
        let d = parse_dependency(
            &src,
            &nv,
            &nv.value,
            &nv.name,
            &m.version,
            complete_depends,
            flags,
        )?;

        m.tests.push(TestDependency {
            name: d.name,
            // The type string is already validated by the dispatch.
            dep_type: TestDependencyType::try_parse(&nv.name)
                .expect("test dependency type"),
            constraint: d.constraint,
        });
    }

    if m.description.is_some()
        && m.description_type.is_none()
        && flags.require_description_type
    {
        return Err(bad_name(
            &src,
            &end,
            "no package description type specified",
        ));
    }

    if m.location.is_none() && flags.require_location {
        return Err(bad_name(&src, &end, "no package location specified"));
    }

    if m.sha256sum.is_none() && flags.require_sha256sum {
        return Err(bad_name(&src, &end, "no package sha256sum specified"));
    }

    debug!("parsed package manifest {} {}", m.name, m.version);

    Ok(())
}

impl PackageManifest {
    /// Parse a single (individual) package manifest.
    pub fn parse(
        p: &mut ManifestParser,
        ignore_unknown: bool,
        complete_depends: bool,
        flags: ManifestFlags,
    ) -> Result<Self> {
        Self::parse_with_translate(
            p,
            None,
            ignore_unknown,
            complete_depends,
            flags,
        )
    }

    /// As [`parse`](Self::parse) but also call the translate function
    /// for the version value, passing through any error it may return.
    pub fn parse_with_translate(
        p: &mut ManifestParser,
        translate: Option<TranslateVersion<'_>>,
        ignore_unknown: bool,
        complete_depends: bool,
        flags: ManifestFlags,
    ) -> Result<Self> {
        let mut m = Self::default();
        let nv = p.next()?;

        parse_package_manifest(
            p,
            nv,
            translate,
            ignore_unknown,
            complete_depends,
            flags,
            &mut m,
        )?;

        // Make sure this is the end.
        let nv = p.next()?;
        if !nv.is_end() {
            return Err(bad_name(
                p.source_name(),
                &nv,
                "single package manifest expected",
            ));
        }

        Ok(m)
    }

    /// Parse an element of a package manifest list, starting from the
    /// already-consumed start pair.
    pub fn parse_element(
        p: &mut ManifestParser,
        start: NameValue,
        ignore_unknown: bool,
        complete_depends: bool,
        flags: ManifestFlags,
    ) -> Result<Self> {
        let mut m = Self::default();

        parse_package_manifest(
            p,
            start,
            None,
            ignore_unknown,
            complete_depends,
            flags,
            &mut m,
        )?;

        Ok(m)
    }

    /// The effective project: the project value if present, the package
    /// name otherwise.
    pub fn effective_project(&self) -> &PackageName {
        self.project.as_ref().unwrap_or(&self.name)
    }

    /// The effective description type: the explicit type value, or a
    /// type inferred from the description file extension (`md` and
    /// `markdown` mean github-flavored markdown; `txt`, no extension,
    /// or inline text mean plain). Depending on `ignore_unknown`, an
    /// unknown type or extension is an error or `None`.
    ///
    /// # Panics
    ///
    /// Panics if the description is absent (caller contract violation).
    pub fn effective_description_type(
        &self,
        ignore_unknown: bool,
    ) -> Result<Option<TextType>> {
        let d = self.description.as_ref().expect("absent description");

        let r = if let Some(t) = &self.description_type {
            to_text_type(t)?
        } else if let TextFile::File { path, .. } = d {
            match fspath::extension(path) {
                None => Some(TextType::Plain),
                Some(e) if e.eq_ignore_ascii_case("txt") => {
                    Some(TextType::Plain)
                }
                Some(e)
                    if e.eq_ignore_ascii_case("md")
                        || e.eq_ignore_ascii_case("markdown") =>
                {
                    Some(TextType::GithubMark)
                }
                Some(_) => None,
            }
        } else {
            Some(TextType::Plain)
        };

        if r.is_none() && !ignore_unknown {
            return Err(PkgmetaError::Value("unknown text type".to_string()));
        }

        Ok(r)
    }

    /// Override manifest values with the specified ones. A value
    /// overrides the whole group it belongs to, resetting all the group
    /// values before being applied. The overridable groups are
    /// `{builds, build-include, build-exclude}` (with the constraints
    /// sub-group reset hierarchically) and `{build-*email}`. Any other
    /// name is an error.
    ///
    /// If a non-empty source name is specified the values are assumed
    /// to carry line/column information for diagnostics.
    pub fn apply_overrides(
        &mut self,
        overrides: &[NameValue],
        source_name: &str,
    ) -> Result<()> {
        let mut reset_builds = true;
        let mut reset_constraints = true;
        let mut reset_emails = true;

        for nv in overrides {
            match nv.name.as_str() {
                "builds" => {
                    if reset_builds {
                        self.builds.clear();
                        if reset_constraints {
                            self.build_constraints.clear();
                            reset_constraints = false;
                        }
                        reset_builds = false;
                    }

                    self.builds.push(parse_build_class_expr_value(
                        nv,
                        self.builds.is_empty(),
                        source_name,
                    )?);
                }
                "build-include" | "build-exclude" => {
                    if reset_constraints {
                        self.build_constraints.clear();
                        reset_constraints = false;
                    }

                    self.build_constraints.push(
                        parse_build_constraint_value(
                            nv,
                            nv.name == "build-exclude",
                            source_name,
                        )?,
                    );
                }
                "build-email" | "build-warning-email"
                | "build-error-email" => {
                    if reset_emails {
                        self.build_email = None;
                        self.build_warning_email = None;
                        self.build_error_email = None;
                        reset_emails = false;
                    }

                    match nv.name.as_str() {
                        "build-email" => {
                            self.build_email = Some(parse_email_value(
                                nv,
                                "build",
                                source_name,
                                true,
                            )?);
                        }
                        "build-warning-email" => {
                            self.build_warning_email =
                                Some(parse_email_value(
                                    nv,
                                    "build warning",
                                    source_name,
                                    false,
                                )?);
                        }
                        _ => {
                            self.build_error_email = Some(parse_email_value(
                                nv,
                                "build error",
                                source_name,
                                false,
                            )?);
                        }
                    }
                }
                n => {
                    return Err(name_error(
                        source_name,
                        nv,
                        format!("cannot override '{n}' value"),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Validate override values without applying them to any manifest.
    pub fn validate_overrides(
        overrides: &[NameValue],
        source_name: &str,
    ) -> Result<()> {
        Self::default().apply_overrides(overrides, source_name)
    }

    /// Load the `description-file` and `changes-file` values using the
    /// specified load function, replacing them with the inline text.
    /// The description type is made explicit, with a synthetic
    /// `text/unknown` type assigned when it cannot be derived and
    /// unknown types are ignored.
    ///
    /// An empty file is an error; the load function may want to detect
    /// this itself in order to issue more precise diagnostics.
    pub fn load_files<F>(
        &mut self,
        loader: &mut F,
        ignore_unknown: bool,
    ) -> Result<()>
    where
        F: FnMut(&str, &str) -> Result<String>,
    {
        let mut load = |name: &str, path: &str| -> Result<String> {
            let r = loader(name, path)?;

            if r.is_empty() {
                return Err(PkgmetaError::parsing_nameless(format!(
                    "package {name} references empty file"
                )));
            }

            Ok(r)
        };

        // Load the description-file value.
        if self.description.is_some() {
            // Make the description type explicit.
            let t = self.effective_description_type(ignore_unknown)?;

            debug_assert!(t.is_some() || ignore_unknown);

            if self.description_type.is_none()
                && let Some(t) = t
            {
                self.description_type = Some(t.to_string());
            }

            if let Some(TextFile::File { path, .. }) = &self.description {
                let path = path.clone();

                if self.description_type.is_none() {
                    self.description_type = Some(format!(
                        "text/unknown; extension={}",
                        fspath::extension(&path).unwrap_or("")
                    ));
                }

                debug!("loading package description from {path}");

                self.description = Some(TextFile::Inline(load(
                    "description-file",
                    &path,
                )?));
            }
        }

        // Load the changes-file values.
        for c in &mut self.changes {
            if let TextFile::File { path, .. } = c {
                let path = path.clone();
                *c = TextFile::Inline(load("changes-file", &path)?);
            }
        }

        Ok(())
    }

    /// Serialize the manifest in the canonical field order.
    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        serialize_package_manifest(s, self, false)
    }

    /// Serialize only the header values (name, version, project,
    /// priority, summary, license).
    pub fn serialize_header(&self, s: &mut ManifestSerializer) -> Result<()> {
        serialize_package_manifest(s, self, true)
    }
}

fn serialize_package_manifest(
    s: &mut ManifestSerializer,
    m: &PackageManifest,
    header_only: bool,
) -> Result<()> {
    s.next("", "1")?;

    let bad = |s: &ManifestSerializer, d: &str| {
        PkgmetaError::serialization(s.source_name(), d)
    };

    if m.name.is_empty() {
        return Err(bad(s, "empty package name"));
    }

    s.next("name", m.name.as_str())?;
    s.next("version", &m.version.to_string_with(false, false))?;

    if let Some(v) = &m.upstream_version {
        s.next("upstream-version", v)?;
    }

    if let Some(p) = &m.project {
        s.next("project", p.as_str())?;
    }

    if let Some(p) = &m.priority {
        s.next("priority", &merge_comment(p.level.to_string(), &p.comment))?;
    }

    s.next("summary", &m.summary)?;

    for l in &m.license_alternatives {
        s.next("license", &merge_comment(l.licenses.join(", "), &l.comment))?;
    }

    if !header_only {
        if !m.topics.is_empty() {
            s.next("topics", &m.topics.join(", "))?;
        }

        if !m.keywords.is_empty() {
            s.next("keywords", &m.keywords.join(" "))?;
        }

        if let Some(d) = &m.description {
            match d {
                TextFile::File { path, comment } => {
                    s.next(
                        "description-file",
                        &merge_comment(path, comment),
                    )?;
                }
                TextFile::Inline(t) => s.next("description", t)?,
            }

            if let Some(t) = &m.description_type {
                s.next("description-type", t)?;
            }
        }

        for c in &m.changes {
            match c {
                TextFile::File { path, comment } => {
                    s.next("changes-file", &merge_comment(path, comment))?;
                }
                TextFile::Inline(t) => s.next("changes", t)?,
            }
        }

        if let Some(u) = &m.url {
            s.next("url", &merge_comment(&u.url, &u.comment))?;
        }

        if let Some(u) = &m.doc_url {
            s.next("doc-url", &merge_comment(&u.url, &u.comment))?;
        }

        if let Some(u) = &m.src_url {
            s.next("src-url", &merge_comment(&u.url, &u.comment))?;
        }

        if let Some(u) = &m.package_url {
            s.next("package-url", &merge_comment(&u.url, &u.comment))?;
        }

        let emails: [(&str, &Option<Email>); 5] = [
            ("email", &m.email),
            ("package-email", &m.package_email),
            ("build-email", &m.build_email),
            ("build-warning-email", &m.build_warning_email),
            ("build-error-email", &m.build_error_email),
        ];

        for (n, e) in emails {
            if let Some(e) = e {
                s.next(n, &merge_comment(&e.address, &e.comment))?;
            }
        }

        for d in &m.dependencies {
            let prefix = match (d.conditional, d.buildtime) {
                (true, true) => "?* ",
                (true, false) => "? ",
                (false, true) => "* ",
                (false, false) => "",
            };

            let alternatives = d
                .alternatives
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ");

            s.next(
                "depends",
                &format!(
                    "{prefix}{}",
                    merge_comment(alternatives, &d.comment)
                ),
            )?;
        }

        for r in &m.requirements {
            let prefix = match (r.conditional, r.buildtime) {
                (true, true) => "?* ",
                (true, false) => "? ",
                (false, true) => "* ",
                (false, false) => "",
            };

            s.next(
                "requires",
                &format!(
                    "{prefix}{}",
                    merge_comment(r.alternatives.join(" | "), &r.comment)
                ),
            )?;
        }

        for t in &m.tests {
            s.next(&t.dep_type.to_string(), &t.to_string())?;
        }

        for b in &m.builds {
            s.next("builds", &merge_comment(b.to_string(), &b.comment))?;
        }

        for c in &m.build_constraints {
            let v = match &c.target {
                Some(t) => format!("{}/{t}", c.config),
                None => c.config.clone(),
            };

            s.next(
                if c.exclusion {
                    "build-exclude"
                } else {
                    "build-include"
                },
                &merge_comment(v, &c.comment),
            )?;
        }

        if let Some(l) = &m.location {
            s.next("location", l)?;
        }

        if let Some(sum) = &m.sha256sum {
            s.next("sha256sum", sum)?;
        }

        if let Some(f) = &m.fragment {
            s.next("fragment", f)?;
        }
    }

    s.next("", "")?;

    Ok(())
}

/// Create an individual pkg package manifest.
pub fn pkg_package_manifest(
    p: &mut ManifestParser,
    ignore_unknown: bool,
    complete_depends: bool,
) -> Result<PackageManifest> {
    PackageManifest::parse(
        p,
        ignore_unknown,
        complete_depends,
        ManifestFlags::individual(),
    )
}

/// Create an element of the pkg package list manifest.
pub fn pkg_package_manifest_element(
    p: &mut ManifestParser,
    start: NameValue,
    ignore_unknown: bool,
) -> Result<PackageManifest> {
    PackageManifest::parse_element(
        p,
        start,
        ignore_unknown,
        false,
        ManifestFlags::pkg_list_element(),
    )
}

// Parse the directory manifest that may contain the only (and required)
// location value that refers to the package directory, plus an optional
// repository fragment.
fn parse_directory_manifest(
    p: &mut ManifestParser,
    nv: NameValue,
    ignore_unknown: bool,
) -> Result<PackageManifest> {
    let src = p.source_name().to_string();

    if !nv.name.is_empty() {
        return Err(bad_name(&src, &nv, "start of package manifest expected"));
    }

    if nv.value != "1" {
        return Err(bad_value(&src, &nv, "unsupported format version"));
    }

    let mut m = PackageManifest::default();
    let end;

    loop {
        let nv = p.next()?;

        if nv.is_end() {
            end = nv;
            break;
        }

        match nv.name.as_str() {
            "location" => {
                if m.location.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package location redefinition",
                    ));
                }

                if nv.value.is_empty() {
                    return Err(bad_value(&src, &nv, "empty package location"));
                }

                if fspath::is_absolute(&nv.value) {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "absolute package location",
                    ));
                }

                // Make sure the location is a directory (carries the
                // trailing slash).
                m.location = Some(fspath::to_dir(&nv.value));
            }
            "fragment" => {
                if m.fragment.is_some() {
                    return Err(bad_name(
                        &src,
                        &nv,
                        "package repository fragment redefinition",
                    ));
                }

                if nv.value.is_empty() {
                    return Err(bad_value(
                        &src,
                        &nv,
                        "empty package repository fragment",
                    ));
                }

                m.fragment = Some(nv.value);
            }
            n => {
                if !ignore_unknown {
                    return Err(bad_name(
                        &src,
                        &nv,
                        format!("unknown name '{n}' in package manifest"),
                    ));
                }
            }
        }
    }

    if m.location.is_none() {
        return Err(bad_name(&src, &end, "no package location specified"));
    }

    Ok(m)
}

fn serialize_directory_manifest(
    s: &mut ManifestSerializer,
    m: &PackageManifest,
) -> Result<()> {
    s.next("", "1")?;

    let l = m.location.as_ref().ok_or_else(|| {
        PkgmetaError::serialization(s.source_name(), "no valid location")
    })?;

    s.next("location", l)?;

    if let Some(f) = &m.fragment {
        s.next("fragment", f)?;
    }

    s.next("", "")?;

    Ok(())
}

/// Create an individual dir package manifest.
pub fn dir_package_manifest(
    p: &mut ManifestParser,
    ignore_unknown: bool,
) -> Result<PackageManifest> {
    let nv = p.next()?;
    let m = parse_directory_manifest(p, nv, ignore_unknown)?;

    let nv = p.next()?;
    if !nv.is_end() {
        return Err(bad_name(
            p.source_name(),
            &nv,
            "single package manifest expected",
        ));
    }

    Ok(m)
}

/// Create an element of the dir package list manifest.
pub fn dir_package_manifest_element(
    p: &mut ManifestParser,
    start: NameValue,
    ignore_unknown: bool,
) -> Result<PackageManifest> {
    parse_directory_manifest(p, start, ignore_unknown)
}

/// Create an individual git package manifest.
pub fn git_package_manifest(
    p: &mut ManifestParser,
    ignore_unknown: bool,
) -> Result<PackageManifest> {
    dir_package_manifest(p, ignore_unknown)
}

/// Create an element of the git package list manifest.
pub fn git_package_manifest_element(
    p: &mut ManifestParser,
    start: NameValue,
    ignore_unknown: bool,
) -> Result<PackageManifest> {
    parse_directory_manifest(p, start, ignore_unknown)
}

/// Serialize a dir package manifest (normally only needed for testing).
pub fn serialize_dir_package_manifest(
    s: &mut ManifestSerializer,
    m: &PackageManifest,
) -> Result<()> {
    serialize_directory_manifest(s, m)
}

/// Serialize a git package manifest (normally only needed for testing).
pub fn serialize_git_package_manifest(
    s: &mut ManifestSerializer,
    m: &PackageManifest,
) -> Result<()> {
    serialize_directory_manifest(s, m)
}

/// The pkg package list manifest: a header manifest with the checksum
/// of the repository manifest file followed by the package manifests.
#[derive(Debug, Clone, Default)]
pub struct PkgPackageManifests {
    /// Checksum of the corresponding repository manifests.
    pub sha256sum: String,
    pub manifests: Vec<PackageManifest>,
}

impl PkgPackageManifests {
    pub fn parse(
        p: &mut ManifestParser,
        ignore_unknown: bool,
    ) -> Result<Self> {
        let src = p.source_name().to_string();
        let nv = p.next()?;

        if !nv.name.is_empty() {
            return Err(bad_name(
                &src,
                &nv,
                "start of package list manifest expected",
            ));
        }

        if nv.value != "1" {
            return Err(bad_value(&src, &nv, "unsupported format version"));
        }

        let mut r = Self::default();
        let end;

        // Parse the header manifest.
        loop {
            let nv = p.next()?;

            if nv.is_end() {
                end = nv;
                break;
            }

            match nv.name.as_str() {
                "sha256sum" => {
                    if !r.sha256sum.is_empty() {
                        return Err(bad_name(
                            &src,
                            &nv,
                            "sha256sum redefinition",
                        ));
                    }

                    if !valid_sha256(&nv.value) {
                        return Err(bad_value(&src, &nv, "invalid sha256sum"));
                    }

                    r.sha256sum = nv.value;
                }
                n => {
                    if !ignore_unknown {
                        return Err(bad_name(
                            &src,
                            &nv,
                            format!(
                                "unknown name '{n}' in package list manifest"
                            ),
                        ));
                    }
                }
            }
        }

        if r.sha256sum.is_empty() {
            return Err(bad_value(&src, &end, "no sha256sum specified"));
        }

        // Parse the package manifests.
        loop {
            let nv = p.next()?;

            if nv.is_end() {
                break;
            }

            r.manifests.push(pkg_package_manifest_element(
                p,
                nv,
                ignore_unknown,
            )?);
        }

        Ok(r)
    }

    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        // Serialize the header manifest.
        s.next("", "1")?;
        s.next("sha256sum", &self.sha256sum)?;
        s.next("", "")?;

        // Serialize the package manifests, verifying the list-context
        // requirements.
        for m in &self.manifests {
            let bad = |d: &str| {
                PkgmetaError::serialization(
                    s.source_name(),
                    format!(
                        "{d} for {}-{}",
                        m.name,
                        m.version.to_string_with(false, false)
                    ),
                )
            };

            if let Some(d) = &m.description {
                if d.is_file() {
                    return Err(bad("forbidden description-file"));
                }

                if m.description_type.is_none() {
                    return Err(bad("no valid description-type"));
                }
            }

            for c in &m.changes {
                if c.is_file() {
                    return Err(bad("forbidden changes-file"));
                }
            }

            if m.location.is_none() {
                return Err(bad("no valid location"));
            }

            if m.sha256sum.is_none() {
                return Err(bad("no valid sha256sum"));
            }

            m.serialize(s)?;
        }

        s.next("", "")?;

        Ok(())
    }
}

// Parse package directory manifests. Such manifests are normally
// created manually, so duplicates are checked for.
fn parse_directory_manifests(
    p: &mut ManifestParser,
    ignore_unknown: bool,
) -> Result<Vec<PackageManifest>> {
    let mut ms: Vec<PackageManifest> = Vec::new();

    let mut nv = p.next()?;
    while !nv.is_end() {
        let m = parse_directory_manifest(p, nv, ignore_unknown)?;
        nv = p.next()?;

        if ms.iter().any(|x| x.location == m.location) {
            return Err(bad_name(
                p.source_name(),
                &nv,
                "duplicate package manifest",
            ));
        }

        ms.push(m);
    }

    Ok(ms)
}

fn serialize_directory_manifests(
    s: &mut ManifestSerializer,
    ms: &[PackageManifest],
) -> Result<()> {
    for m in ms {
        serialize_directory_manifest(s, m)?;
    }

    s.next("", "")?;

    Ok(())
}

/// The dir package list manifest.
#[derive(Debug, Clone, Default)]
pub struct DirPackageManifests {
    pub manifests: Vec<PackageManifest>,
}

impl DirPackageManifests {
    pub fn parse(
        p: &mut ManifestParser,
        ignore_unknown: bool,
    ) -> Result<Self> {
        Ok(Self {
            manifests: parse_directory_manifests(p, ignore_unknown)?,
        })
    }

    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        serialize_directory_manifests(s, &self.manifests)
    }
}

/// The git package list manifest.
#[derive(Debug, Clone, Default)]
pub struct GitPackageManifests {
    pub manifests: Vec<PackageManifest>,
}

impl GitPackageManifests {
    pub fn parse(
        p: &mut ManifestParser,
        ignore_unknown: bool,
    ) -> Result<Self> {
        Ok(Self {
            manifests: parse_directory_manifests(p, ignore_unknown)?,
        })
    }

    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        serialize_directory_manifests(s, &self.manifests)
    }
}
