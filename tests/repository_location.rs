//! Repository location construction and canonical name scenarios.

use pkgmeta::repository::{
    GitRefFilter, RepositoryLocation, RepositoryProtocol, RepositoryType,
    RepositoryUrl, parse_git_ref_filters,
};

fn url(s: &str) -> RepositoryUrl {
    RepositoryUrl::parse(s).unwrap()
}

fn loc(s: &str) -> RepositoryLocation {
    RepositoryLocation::from_url(url(s), RepositoryType::Pkg).unwrap()
}

fn loc_as(s: &str, t: RepositoryType) -> RepositoryLocation {
    RepositoryLocation::from_url(url(s), t).unwrap()
}

fn loc_based(s: &str, base: &RepositoryLocation) -> RepositoryLocation {
    RepositoryLocation::with_base(url(s), RepositoryType::Pkg, base).unwrap()
}

fn rel_loc(s: &str) -> RepositoryLocation {
    loc_based(s, &RepositoryLocation::empty())
}

fn bad_loc(s: &str, t: RepositoryType) -> bool {
    match RepositoryUrl::parse(s) {
        Err(_) => true,
        Ok(u) => RepositoryLocation::from_url(u, t).is_err(),
    }
}

fn bad_rel_loc(s: &str) -> bool {
    match RepositoryUrl::parse(s) {
        Err(_) => true,
        Ok(u) => RepositoryLocation::with_base(
            u,
            RepositoryType::Pkg,
            &RepositoryLocation::empty(),
        )
        .is_err(),
    }
}

fn bad_based_loc(s: &str, base: &RepositoryLocation) -> bool {
    match RepositoryUrl::parse(s) {
        Err(_) => true,
        Ok(u) => {
            RepositoryLocation::with_base(u, RepositoryType::Pkg, base)
                .is_err()
        }
    }
}

#[test]
fn invalid_hosts_and_ports() {
    assert!(bad_loc("http:///aa/1/bb", RepositoryType::Pkg));
    assert!(bad_loc("http:///1/aa/bb", RepositoryType::Pkg));
    assert!(bad_loc("http://www./aa/1/bb", RepositoryType::Pkg));
    assert!(bad_loc("http://b|2.org/aa/1/bb", RepositoryType::Pkg));
    assert!(bad_loc("file://abc/", RepositoryType::Pkg));

    assert!(bad_loc("http://a:/aa/bb", RepositoryType::Pkg));
    assert!(bad_loc("http://a:1b/aa/bb", RepositoryType::Pkg));
    assert!(bad_loc("http://c.ru:8a80/1/b", RepositoryType::Pkg));
    assert!(bad_loc("http://c.ru:8:80/1/b", RepositoryType::Pkg));
    assert!(bad_loc("http://a:0/aa/bb", RepositoryType::Pkg));
    assert!(bad_loc("http://c.ru:65536/1/b", RepositoryType::Pkg));
}

#[test]
fn invalid_paths() {
    assert!(bad_loc("1", RepositoryType::Pkg));
    assert!(bad_loc("1/", RepositoryType::Pkg));
    assert!(bad_loc("1/..", RepositoryType::Pkg));
    assert!(bad_loc("bbb", RepositoryType::Pkg));
    assert!(bad_loc("aaa/bbb", RepositoryType::Pkg));
    assert!(bad_loc("http://", RepositoryType::Pkg));
    assert!(bad_loc("http://aa", RepositoryType::Pkg));
    assert!(bad_loc("https://aa", RepositoryType::Pkg));
    assert!(bad_loc("http://aa/", RepositoryType::Pkg));
    assert!(bad_loc("http://aa/b/..", RepositoryType::Pkg));
    assert!(bad_loc("http://aa/.", RepositoryType::Pkg));
    assert!(bad_loc("http://aa/bb", RepositoryType::Pkg));
    assert!(bad_loc("http://a.com/../c/1/aa", RepositoryType::Pkg));
    assert!(bad_loc("http://a.com/a/b/../../../c/1/aa", RepositoryType::Pkg));
    assert!(bad_loc("file://", RepositoryType::Pkg));
    assert!(bad_loc("/aaa/bbb", RepositoryType::Pkg));

    // Invalid or unsupported repository version component.
    assert!(bad_loc("3/aaa/bbb", RepositoryType::Pkg));
    assert!(bad_rel_loc("/3/aaa/bbb"));
    assert!(bad_rel_loc("/aaa/bbb"));

    assert!(bad_loc("http:/abc", RepositoryType::Pkg));
    assert!(bad_loc("http:///abc", RepositoryType::Pkg));
    assert!(bad_loc("http://[123]", RepositoryType::Pkg));
    assert!(bad_loc("file:////abc", RepositoryType::Git));
    assert!(bad_loc("zzz:/abc", RepositoryType::Git));
}

#[test]
fn invalid_fragments() {
    assert!(bad_loc(
        "https://www.example.com/test.git#",
        RepositoryType::Git
    ));
    assert!(bad_loc(
        "https://www.example.com/test.git#,",
        RepositoryType::Git
    ));
    assert!(bad_loc(
        "https://www.example.com/test.git#@",
        RepositoryType::Git
    ));
    assert!(bad_loc(
        "https://www.example.com/test.git#@123",
        RepositoryType::Git
    ));
}

#[test]
fn invalid_prerequisite_locations() {
    // A relative location is invalid without a base.
    assert!(bad_loc("a/c/1/bb", RepositoryType::Pkg));

    let base = loc("http://stable.cppget.org/1/misc");

    assert!(bad_based_loc("", &base));
    assert!(bad_based_loc("../../../1/math", &base));
    assert!(bad_based_loc("../..", &base));

    // A relative base cannot complete anything.
    let rel = rel_loc("./var/1/stable");
    assert!(bad_based_loc("a/c/1/bb", &rel));

    // A dir repository cannot be remote.
    assert!(bad_loc("http://example.com/dir", RepositoryType::Dir));
}

#[test]
fn empty_location() {
    let l = RepositoryLocation::from_url(
        RepositoryUrl::default(),
        RepositoryType::Pkg,
    )
    .unwrap();
    assert!(l.is_empty());
    assert!(l.to_string().is_empty());
    assert!(l.canonical_name().is_empty());
}

#[test]
fn relative_locations() {
    for (s, out) in [
        ("1/aa/bb", "1/aa/bb"),
        ("bpkg/1/aa/bb", "bpkg/1/aa/bb"),
        ("b/pkg/1/aa/bb", "b/pkg/1/aa/bb"),
        ("aa/..", "."),
        ("../c/../c/./1/aa/../bb", "../c/1/bb"),
    ] {
        let l = rel_loc(s);
        assert_eq!(l.to_string(), out, "{s}");
        assert!(l.canonical_name().is_empty());
    }

    let l = RepositoryLocation::with_base(
        url("../test.git#master"),
        RepositoryType::Git,
        &RepositoryLocation::empty(),
    )
    .unwrap();
    assert_eq!(l.to_string(), "../test.git#master");
    assert!(l.canonical_name().is_empty());
    assert_eq!(l.proto(), RepositoryProtocol::File);

    // The scheme-like prefix without URL notation is a path.
    let l = rel_loc("http:repo/1/path");
    assert_eq!(l.to_string(), "http:repo/1/path");
    assert!(l.canonical_name().is_empty());
    assert_eq!(l.proto(), RepositoryProtocol::File);
}

#[test]
fn absolute_pkg_locations() {
    for (s, str_out, name) in [
        ("/1/aa/bb", "/1/aa/bb", "pkg:/aa/bb"),
        ("/pkg/1/aa/bb", "/pkg/1/aa/bb", "pkg:aa/bb"),
        ("/var/bpkg/1", "/var/bpkg/1", "pkg:/var/bpkg"),
        ("/1", "/1", "pkg:/"),
        (
            "/var/pkg/1/example.org/math/testing",
            "/var/pkg/1/example.org/math/testing",
            "pkg:example.org/math/testing",
        ),
        (
            "/var/pkg/example.org/1/math/testing",
            "/var/pkg/example.org/1/math/testing",
            "pkg:/var/pkg/example.org/math/testing",
        ),
        ("/a/b/../c/1/aa/../bb", "/a/c/1/bb", "pkg:/a/c/bb"),
        ("/a/b/../c/pkg/1/aa/../bb", "/a/c/pkg/1/bb", "pkg:bb"),
        ("file:///repo/1/path", "/repo/1/path", "pkg:/repo/path"),
    ] {
        let l = rel_loc(s);
        assert_eq!(l.to_string(), str_out, "{s}");
        assert_eq!(l.canonical_name(), name, "{s}");
        assert_eq!(l.repo_type(), RepositoryType::Pkg);
    }

    assert_eq!(url("file:///repo/1/path"), url("file:/repo/1/path"));
    assert_eq!(url("file:///repo/1/path"), url("/repo/1/path"));
}

#[test]
fn local_git_and_dir_locations() {
    let l = loc_as("file:/git/repo#branch", RepositoryType::Git);
    assert_eq!(l.to_string(), "git+file:/git/repo#branch");
    assert_eq!(l.canonical_name(), "git:/git/repo#branch");

    let l = loc_as("/git/repo#branch", RepositoryType::Git);
    assert_eq!(l.to_string(), "git+file:/git/repo#branch");
    assert_eq!(l.canonical_name(), "git:/git/repo#branch");

    let l = loc_as("file://localhost/", RepositoryType::Git);
    assert_eq!(l.to_string(), "git+file:///");
    assert_eq!(l.canonical_name(), "git:/");

    let l = loc_as("file://localhost/#master", RepositoryType::Git);
    assert_eq!(l.to_string(), "git+file:/#master");
    assert_eq!(l.canonical_name(), "git:/#master");

    let l = loc_as("/home/user/repo", RepositoryType::Dir);
    assert_eq!(l.to_string(), "dir+file:///home/user/repo");
    assert_eq!(l.canonical_name(), "dir:/home/user/repo");
}

#[test]
fn remote_pkg_locations() {
    let checks: &[(&str, &str, &str, RepositoryProtocol)] = &[
        (
            "http://www.a.com:80/1/aa/bb",
            "http://www.a.com:80/1/aa/bb",
            "pkg:a.com/aa/bb",
            RepositoryProtocol::Http,
        ),
        (
            "https://www.a.com:443/1/aa/bb",
            "https://www.a.com:443/1/aa/bb",
            "pkg:a.com/aa/bb",
            RepositoryProtocol::Https,
        ),
        (
            "http://www.a.com:8080/dd/1/aa/bb",
            "http://www.a.com:8080/dd/1/aa/bb",
            "pkg:a.com:8080/dd/aa/bb",
            RepositoryProtocol::Http,
        ),
        (
            "http://www.a.com:8080/dd/pkg/1/aa/bb",
            "http://www.a.com:8080/dd/pkg/1/aa/bb",
            "pkg:a.com:8080/dd/aa/bb",
            RepositoryProtocol::Http,
        ),
        (
            "http://www.a.com:8080/bpkg/dd/1/aa/bb",
            "http://www.a.com:8080/bpkg/dd/1/aa/bb",
            "pkg:a.com:8080/bpkg/dd/aa/bb",
            RepositoryProtocol::Http,
        ),
        (
            "https://www.a.com:444/dd/1/aa/bb",
            "https://www.a.com:444/dd/1/aa/bb",
            "pkg:a.com:444/dd/aa/bb",
            RepositoryProtocol::Https,
        ),
        (
            "http://a.com/a/b/../c/1/aa/../bb",
            "http://a.com/a/c/1/bb",
            "pkg:a.com/a/c/bb",
            RepositoryProtocol::Http,
        ),
        (
            "http://www.CPPget.org/qw/1/a/b/",
            "http://www.cppget.org/qw/1/a/b",
            "pkg:cppget.org/qw/a/b",
            RepositoryProtocol::Http,
        ),
        (
            "http://00.00.010.0/qw/1/a/b/",
            "http://0.0.10.0/qw/1/a/b",
            "pkg:0.0.10.0/qw/a/b",
            RepositoryProtocol::Http,
        ),
        (
            "http://pkg.CPPget.org/qw/1/a/b/",
            "http://pkg.cppget.org/qw/1/a/b",
            "pkg:cppget.org/qw/a/b",
            RepositoryProtocol::Http,
        ),
        (
            "http://bpkg.CPPget.org/qw/1/a/b/",
            "http://bpkg.cppget.org/qw/1/a/b",
            "pkg:cppget.org/qw/a/b",
            RepositoryProtocol::Http,
        ),
        (
            "http://abc.cppget.org/qw/1/a/b/",
            "http://abc.cppget.org/qw/1/a/b",
            "pkg:abc.cppget.org/qw/a/b",
            RepositoryProtocol::Http,
        ),
        (
            "http://pkg.www.cppget.org/qw/1/a/b/",
            "http://pkg.www.cppget.org/qw/1/a/b",
            "pkg:www.cppget.org/qw/a/b",
            RepositoryProtocol::Http,
        ),
        (
            "http://cppget.org/qw//1/a//b/",
            "http://cppget.org/qw/1/a/b",
            "pkg:cppget.org/qw/a/b",
            RepositoryProtocol::Http,
        ),
    ];

    for (s, str_out, name, proto) in checks {
        let l = loc(s);
        assert_eq!(&l.to_string(), str_out, "{s}");
        assert_eq!(&l.canonical_name(), name, "{s}");
        assert_eq!(l.proto(), *proto, "{s}");
        assert_eq!(l.repo_type(), RepositoryType::Pkg);
    }

    let l = loc("http://stable.cppget.org/1/");
    assert_eq!(l.canonical_name(), "pkg:stable.cppget.org");
}

#[test]
fn remote_git_locations() {
    for (s, str_out, name) in [
        (
            "https://www.example.com/test.git",
            "https://www.example.com/test.git",
            "git:example.com/test",
        ),
        (
            "git://example.com/test#master",
            "git://example.com/test#master",
            "git:example.com/test#master",
        ),
        (
            "ssh://example.com/test.git#master",
            "ssh://example.com/test.git#master",
            "git:example.com/test#master",
        ),
        (
            "http://example.com/test.git#master",
            "http://example.com/test.git#master",
            "git:example.com/test#master",
        ),
        (
            "https://git.example.com/test.git#master",
            "https://git.example.com/test.git#master",
            "git:example.com/test#master",
        ),
        (
            "https://scm.example.com/test.git#master",
            "https://scm.example.com/test.git#master",
            "git:example.com/test#master",
        ),
        (
            "http://git.example.com#master",
            "git+http://git.example.com/#master",
            "git:example.com#master",
        ),
    ] {
        let l = loc_as(s, RepositoryType::Git);
        assert_eq!(l.to_string(), str_out, "{s}");
        assert_eq!(l.canonical_name(), name, "{s}");
    }
}

#[test]
fn typed_urls() {
    let l =
        RepositoryLocation::parse("git+http://example.com/repo", None, false)
            .unwrap();
    assert_eq!(l.to_string(), "git+http://example.com/repo");
    assert_eq!(l.repo_type(), RepositoryType::Git);

    let l =
        RepositoryLocation::parse("http://example.com/repo.git", None, false)
            .unwrap();
    assert_eq!(l.to_string(), "http://example.com/repo.git");
    assert_eq!(l.repo_type(), RepositoryType::Git);

    // Empty and relative typed locations are invalid.
    assert!(RepositoryLocation::parse("", None, false).is_err());
    assert!(
        RepositoryLocation::parse("abc+http://example.com/repo", None, false)
            .is_err()
    );

    // Mismatching types in the URL scheme and the argument.
    assert!(
        RepositoryLocation::parse(
            "git+http://example.com/repo",
            Some(RepositoryType::Pkg),
            false
        )
        .is_err()
    );
}

#[test]
fn base_completion() {
    let b = loc("http://stable.cppget.org/1/misc");

    for (s, str_out, name) in [
        (
            "../../1/math",
            "http://stable.cppget.org/1/math",
            "pkg:stable.cppget.org/math",
        ),
        (
            "../../pkg/1/math",
            "http://stable.cppget.org/pkg/1/math",
            "pkg:stable.cppget.org/math",
        ),
        (
            "../math",
            "http://stable.cppget.org/1/math",
            "pkg:stable.cppget.org/math",
        ),
        (
            "math/..",
            "http://stable.cppget.org/1/misc",
            "pkg:stable.cppget.org/misc",
        ),
        (
            ".",
            "http://stable.cppget.org/1/misc",
            "pkg:stable.cppget.org/misc",
        ),
    ] {
        let l = loc_based(s, &b);
        assert_eq!(l.to_string(), str_out, "{s}");
        assert_eq!(l.canonical_name(), name, "{s}");
    }

    // An absolute location ignores the base.
    let l = loc_based("/var/1/test", &b);
    assert_eq!(l.to_string(), "/var/1/test");
    assert_eq!(l.canonical_name(), "pkg:/var/test");

    // So does a remote one.
    let b2 = loc("http://www.cppget.org/1/stable");
    let l = loc_based("http://abc.com/1/test", &b2);
    assert_eq!(l.to_string(), "http://abc.com/1/test");
    assert_eq!(l.canonical_name(), "pkg:abc.com/test");
}

#[test]
fn base_completion_with_ports_and_locals() {
    let b = loc("http://www.stable.cppget.org:8080/1");
    let l = loc_based("../1/math", &b);
    assert_eq!(l.to_string(), "http://www.stable.cppget.org:8080/1/math");
    assert_eq!(l.canonical_name(), "pkg:stable.cppget.org:8080/math");
    assert_eq!(l.proto(), RepositoryProtocol::Http);

    let b = loc("/var/r1/1/misc");
    let l = loc_based("../../../r2/1/math", &b);
    assert_eq!(l.to_string(), "/var/r2/1/math");
    assert_eq!(l.canonical_name(), "pkg:/var/r2/math");

    let b = loc("/var/1/misc");
    let l = loc_based("../math", &b);
    assert_eq!(l.to_string(), "/var/1/math");
    assert_eq!(l.canonical_name(), "pkg:/var/math");
}

#[test]
fn git_base_completion_overrides_fragment() {
    let b = RepositoryLocation::from_url(
        url("https://example.com/stable.git#stable"),
        RepositoryType::Git,
    )
    .unwrap();

    let l = RepositoryLocation::with_base(
        url("../test.git#master"),
        RepositoryType::Git,
        &b,
    )
    .unwrap();
    assert_eq!(l.to_string(), "https://example.com/test.git#master");
    assert_eq!(l.canonical_name(), "git:example.com/test#master");
    assert_eq!(l.proto(), RepositoryProtocol::Https);
}

#[test]
fn completion_is_stable() {
    let l1 = loc("http://stable.cppget.org/1/");
    let l2 = rel_loc("http://stable.cppget.org/1/");
    assert_eq!(l1.to_string(), l2.to_string());
    assert_eq!(l1.canonical_name(), l2.canonical_name());
}

#[test]
fn git_ref_filters() {
    let n = "master".to_string();
    let c = "0a53e9ddeaddad63ad106860237bbf53411d11a7".to_string();

    let f = |name: Option<&str>, commit: Option<&str>, excl: bool| {
        GitRefFilter {
            name: name.map(str::to_string),
            commit: commit.map(str::to_string),
            exclusion: excl,
        }
    };

    assert_eq!(GitRefFilter::default(), f(None, None, false));
    assert_eq!(GitRefFilter::parse(&n).unwrap(), f(Some(&n), None, false));
    assert_eq!(
        GitRefFilter::parse(&format!("+{n}")).unwrap(),
        f(Some(&n), None, false)
    );
    assert_eq!(
        GitRefFilter::parse(&format!("-{n}")).unwrap(),
        f(Some(&n), None, true)
    );
    assert_eq!(
        GitRefFilter::parse(&format!("{c}@")).unwrap(),
        f(Some(&c), None, false)
    );
    assert_eq!(GitRefFilter::parse(&c).unwrap(), f(None, Some(&c), false));
    assert_eq!(
        GitRefFilter::parse(&format!("@{c}")).unwrap(),
        f(None, Some(&c), false)
    );
    assert_eq!(
        GitRefFilter::parse(&format!("{n}@{c}")).unwrap(),
        f(Some(&n), Some(&c), false)
    );

    assert_eq!(
        parse_git_ref_filters(None).unwrap(),
        vec![GitRefFilter::default()]
    );
    assert_eq!(
        parse_git_ref_filters(Some("tag")).unwrap(),
        vec![f(Some("tag"), None, false)]
    );
    assert_eq!(
        parse_git_ref_filters(Some("#tag")).unwrap(),
        vec![GitRefFilter::default(), f(Some("tag"), None, false)]
    );
    assert_eq!(
        parse_git_ref_filters(Some("a,b")).unwrap(),
        vec![f(Some("a"), None, false), f(Some("b"), None, false)]
    );
}

#[test]
fn url_normalization_idempotence() {
    for s in [
        "git://example.com/test.git",
        "git://example.com",
        "git://example.com/",
        "git://example.com/a/..",
        "git://example.com/a/",
        "a/",
        "/a/",
        "http://user@example.com:8080/x/1/y?q=1#f",
    ] {
        let u = url(s);
        let r = RepositoryUrl::parse(&u.to_string()).unwrap();
        assert_eq!(u, r, "{s}");
    }

    assert_eq!(url("git://example.com").to_string(), "git://example.com/");
    assert_eq!(url("git://example.com/a/..").to_string(), "git://example.com/");
    assert_eq!(url("git://example.com/a/").to_string(), "git://example.com/a");
    assert_eq!(url("a/").to_string(), "a");
    assert_eq!(url("/a/").to_string(), "/a");
}

#[test]
fn empty_url_has_no_components() {
    let u = RepositoryUrl::default();
    assert!(u.is_empty());
    assert!(u.authority.is_none());
    assert!(u.path.is_none());
    assert!(u.query.is_none());
    assert!(u.fragment.is_none());
}

#[test]
fn scheme_insensitive_canonical_names() {
    assert_eq!(
        loc("http://pkg.cppget.org/1/x").canonical_name(),
        loc("https://cppget.org/1/x").canonical_name()
    );
    assert_eq!(loc("http://pkg.cppget.org/1/x").canonical_name(), "pkg:cppget.org/x");

    assert_eq!(
        loc("http://www.cppget.org/1/misc").canonical_name(),
        loc("http://pkg.cppget.org/1/misc").canonical_name()
    );
}
