//! Package version parsing, canonicalization, and ordering scenarios.

use pkgmeta::{Version, VersionFlags};

fn version(v: &str) -> Version {
    Version::parse(v, VersionFlags::default()).unwrap()
}

fn bad_version(v: &str) -> bool {
    Version::parse(v, VersionFlags::default()).is_err()
}

fn bad_version_with(v: &str, fl: VersionFlags) -> bool {
    Version::parse(v, fl).is_err()
}

fn bad_new(
    epoch: u16,
    upstream: &str,
    release: Option<&str>,
    revision: Option<u16>,
    iteration: u32,
) -> bool {
    Version::new(
        epoch,
        upstream,
        release.map(str::to_string),
        revision,
        iteration,
    )
    .is_err()
}

// Re-creating a version from its own parts produces an equal version.
fn constructor_round_trip(v: &Version) -> bool {
    *v == Version::new(
        v.epoch(),
        v.upstream(),
        v.release().map(str::to_string),
        v.revision(),
        v.iteration(),
    )
    .unwrap()
}

#[test]
fn invalid_textual_representations() {
    assert!(bad_version("")); // Empty upstream.
    assert!(bad_version("+1-"));
    assert!(bad_version("+1-+3"));
    assert!(bad_version("+0-+3"));
    assert!(bad_version("+1--a"));
    assert!(bad_version("+1--a+3"));
    assert!(bad_version("-a+3"));
    assert!(bad_version("+-3.5")); // Empty epoch.
    assert!(bad_version("a+")); // Empty revision.
    assert!(bad_version("+1-+2-4.1+3")); // Extra epoch.
    assert!(bad_version("1-2-4.1")); // Missed epoch marker.
    assert!(bad_version("3.5+1+4")); // Extra revision.
    assert!(bad_version("++1-2+3")); // Duplicated epoch marker.
    assert!(bad_version("+1-2++3")); // Duplicated revision separator.
    assert!(bad_version("+65536-q.3")); // Too big epoch.
    assert!(bad_version("1+q+65536")); // Too big revision.
    assert!(bad_version("+3.5-1.4")); // Components in epoch.
    assert!(bad_version("+3+5-1.4")); // Plus in epoch.
    assert!(bad_version("3.5+1.4")); // Components in revision.
    assert!(bad_version("3 5+1")); // Non alpha-numeric in upstream.
    assert!(bad_version("+1- +3"));
    assert!(bad_version("1-3 5+1")); // Non alpha-numeric in release.
    assert!(bad_version("+1-1- +3"));
    assert!(bad_version("+3 5-4+1")); // Non numeric in epoch.
    assert!(bad_version("+2b-a"));
    assert!(bad_version("+1-34.1+3 5")); // Non numeric in revision.
    assert!(bad_version("a+3s"));
    assert!(bad_version("a.")); // Not completed upstream.
    assert!(bad_version("a..b")); // Empty upstream component.
    assert!(bad_version("a.b-+1")); // Revision for empty release.
    assert!(bad_version("0.0-+3"));
    assert!(bad_version("1.2.3-~")); // Invalid release.
    assert!(bad_version("+0-0-")); // Empty version.
    assert!(bad_version("+0-0.0-"));
    assert!(bad_version("1.2.3+1#1")); // Unexpected iteration.

    assert!(bad_version("a.39485739122323231.3")); // Too long component.
    assert!(bad_version("a.00000000000000000.3")); // Too many zeros.
    assert!(bad_version("1-a.00000000000000000"));
}

#[test]
fn invalid_constructed_versions() {
    assert!(bad_new(0, "1", Some(""), Some(1), 0)); // Empty release rev.
    assert!(bad_new(0, "1", Some(""), Some(0), 0));
    assert!(bad_new(1, "+1-1.1", Some(""), Some(2), 0)); // Epoch in upstream.
    assert!(bad_new(1, "1.1-1", Some(""), Some(2), 0)); // Release in upstream.
    assert!(bad_new(1, "1.1+1", Some(""), Some(2), 0)); // Revision in upstream.
    assert!(bad_new(1, "1", Some("+1-1.1"), Some(2), 0)); // Epoch in release.
    assert!(bad_new(1, "1", Some("1.1-1"), Some(2), 0)); // Release in release.
    assert!(bad_new(1, "1", Some("1.1+1"), Some(2), 0)); // Revision in release.

    assert!(bad_new(1, "", Some(""), None, 0)); // Unexpected epoch.
    assert!(bad_new(0, "", Some("1"), None, 0)); // Unexpected release.
    assert!(bad_new(0, "", Some(""), Some(1), 0)); // Unexpected revision.
    assert!(bad_new(0, "", None, None, 0)); // Non-empty release expected.
    assert!(bad_new(0, "", Some(""), None, 1)); // Unexpected iteration.
}

#[test]
fn invalid_iterations() {
    let fl = VersionFlags {
        allow_iteration: true,
        ..VersionFlags::default()
    };

    assert!(bad_version("1.0.0#1")); // Iteration disallowed by default.
    assert!(bad_version_with("1.0.0#a", fl));
    assert!(bad_version_with("1.0.0#1a", fl));
    assert!(bad_version_with("1.0.0#", fl));
    assert!(bad_version_with("1.0.0#5000000000", fl));
    assert!(bad_version_with("1.0.0#+1", fl));
}

#[test]
fn empty_version() {
    let v1 = Version::default();
    assert!(v1.is_empty());
    assert!(v1.canonical_upstream().is_empty());
    assert!(v1.canonical_release().is_empty());

    let v2 = version("0.0.0");
    assert!(!v2.is_empty());
    assert!(v2.canonical_upstream().is_empty());
    assert_eq!(v2.canonical_release(), "~");

    assert_ne!(v1, v2);
}

#[test]
fn earliest_release_forms() {
    let v = version("+1-0.0-");
    assert!(!v.is_empty());
    assert_eq!(v.to_string(), "0.0-");
    assert!(v.canonical_upstream().is_empty());
    assert!(v.canonical_release().is_empty());
    assert!(constructor_round_trip(&v));

    let v = version("0-");
    assert!(!v.is_empty());
    assert_eq!(v.to_string(), "0-");
    assert!(constructor_round_trip(&v));

    // Not a stub: the earliest release gets the default epoch of one.
    assert_eq!(version("+1-0-"), version("0-"));
}

#[test]
fn canonical_forms() {
    let checks: &[(&str, &str, &str)] = &[
        // (text, round-tripped text, canonical upstream)
        ("a", "a", "a"),
        ("+65534-ab+65535", "+65534-ab+65535", "ab"),
        ("1", "1", "0000000000000001"),
        ("0", "0", ""),
        ("0+1", "0+1", ""),
        ("0.0.0", "0.0.0", ""),
        ("1.0.0", "1.0.0", "0000000000000001"),
        ("0.1.00", "0.1.00", "0000000000000000.0000000000000001"),
        ("0.0a.00", "0.0a.00", "0000000000000000.0a"),
        ("0.a00.00", "0.a00.00", "0000000000000000.a00"),
        ("+1-0", "+1-0", ""),
        ("+0-0+1", "0+1", ""),
        ("+0-A+1", "+0-A+1", "a"),
        ("+10-B", "+10-B", "b"),
        ("+10-B+0", "+10-B", "b"),
        (
            "+3-1A.31.0.4.0+7",
            "+3-1A.31.0.4.0+7",
            "1a.0000000000000031.0000000000000000.0000000000000004",
        ),
    ];

    for (text, round_trip, canonical) in checks {
        let v = version(text);
        assert_eq!(&v.to_string(), round_trip, "{text}");
        assert_eq!(&v.canonical_upstream(), canonical, "{text}");
        assert!(constructor_round_trip(&v), "{text}");
    }
}

#[test]
fn canonical_release_forms() {
    let v = version("1.2.3");
    assert_eq!(v.release(), None);
    assert_eq!(v.canonical_release(), "~");

    let v = version("1.2.3+1");
    assert_eq!(v.release(), None);
    assert_eq!(v.canonical_release(), "~");

    let v = version("1.2.3-");
    assert_eq!(v.release(), Some(""));
    assert_eq!(v.canonical_release(), "");

    let v = version("+1-A-1.2.3B.00+0");
    assert_eq!(v.to_string(), "A-1.2.3B.00");
    assert_eq!(v.release(), Some("1.2.3B.00"));
    assert_eq!(
        v.canonical_release(),
        "0000000000000001.0000000000000002.3b"
    );

    let v = version("+65535-q.3+65535");
    assert_eq!(v.release(), None);
    assert_eq!(v.canonical_release(), "~");
}

#[test]
fn zero_revision_folding() {
    let v = version("+10-B+0");
    assert_eq!(v.to_string(), "+10-B");
    assert_eq!(v.revision(), None);

    let v = Version::parse("+10-B+0", VersionFlags::none()).unwrap();
    assert_eq!(v.to_string(), "+10-B+0");
    assert_eq!(v.revision(), Some(0));

    // Both forms compare equal.
    assert_eq!(version("+10-B"), v);
}

#[test]
fn string_forms_with_iteration() {
    let v = Version::new(2, "1", None, Some(2), 0).unwrap();
    assert_eq!(v.to_string(), "+2-1+2");

    let v = Version::new(2, "1", Some("".to_string()), None, 0).unwrap();
    assert_eq!(v.to_string(), "+2-1-");

    let v = Version::new(3, "2.0", None, Some(3), 4).unwrap();
    assert_eq!(v.to_string_with(false, false), "+3-2.0+3#4");
    assert_eq!(v.to_string_with(true, true), "+3-2.0");
    assert_eq!(v.to_string_with(true, false), "+3-2.0");
    assert_eq!(v.to_string_with(false, true), "+3-2.0+3");

    assert_eq!(
        Version::new(3, "2.0", None, None, 1).unwrap().to_string(),
        "+3-2.0#1"
    );
    assert_eq!(
        Version::new(3, "2.0", None, Some(0), 1).unwrap().to_string(),
        "+3-2.0+0#1"
    );
    assert_eq!(
        Version::new(3, "2.0", None, Some(1), 0).unwrap().to_string(),
        "+3-2.0+1"
    );
}

#[test]
fn ordering() {
    assert_eq!(version("00+1"), version("0+1")); // Stub.
    assert_eq!(version("0.0.0"), version("0")); // Stub.
    assert_eq!(version("a"), version("a"));
    assert!(version("a") < version("b"));
    assert!(version("a") < version("aa"));
    assert!(version("a.a") < version("aaa"));
    assert!(version("a") < version("a.a"));
    assert_eq!(version("+1-ab"), version("ab"));
    assert!(version("ac") < version("bc"));
    assert_eq!(version("ab+0"), version("ab"));
    assert!(version("a.1+1") > version("a.1"));
    assert!(version("1.2") > version("1.1"));
    assert!(version("1.0") > version("+0-2.0"));
    assert_eq!(version("+1-ab+1"), version("ab+1"));
    assert!(version("12") > version("2"));
    assert!(version("2") < version("12"));
    assert_eq!(version("1"), version("01"));
    assert_eq!(version("1"), version("1.0"));
    assert_eq!(version("1.3"), version("1.3.0"));
    assert_eq!(version("1.3"), version("1.3.0.0"));
    assert!(version("1.3.1") > version("1.3"));
    assert!(version("1.30") > version("1.5"));
    assert!(version("1.alpha.1") < version("1.Beta.1"));
    assert!(version("1.Alpha.1") < version("1.beta.1"));
    assert_eq!(version("1.Alpha.1"), version("1.ALPHA.1"));
    assert!(version("a.1") < version("ab1"));
    assert!(version("a.2") < version("a.1b"));
    assert_eq!(version("1.0.0"), version("01"));
    assert_eq!(version("0.1.00"), version("00.1"));
    assert_eq!(version("0.0a.00"), version("00.0a"));
}

#[test]
fn release_ordering() {
    assert!(version("1.0-alpha") < version("1.0"));
    assert!(version("1.0-") < version("1.0"));
    assert!(version("1.0-") < version("1.0-alpha"));
    assert!(version("1.0-alpha") < version("1.1"));
    assert!(version("1.0-alpha+1") < version("1.0"));
    assert!(version("1.0-alpha+1") < version("1.1"));
    assert!(version("1.0-alpha") > version("1.0-1"));
    assert_eq!(version("1.0-alpha"), version("1.0-alpha.0"));

    assert!(version("1.1.1-a.0.1") < version("1.1.1"));
    assert!(version("1.1.1") < version("1.1.1a"));
    assert!(version("1.1.1a") < version("1.1.1a+1"));
    assert!(version("1.1.1a+1") < version("1.1.1b"));
}

#[test]
fn revision_and_iteration_comparison() {
    use std::cmp::Ordering;

    assert_eq!(version("+1-2+3"), Version::new(1, "2.0", None, Some(3), 0).unwrap());
    assert_eq!(
        version("+1-2-"),
        Version::new(1, "2.0", Some("".to_string()), None, 0).unwrap()
    );
    assert_eq!(
        Version::default(),
        Version::new(0, "", Some("".to_string()), None, 0).unwrap()
    );

    let v = |r, i| Version::new(1, "2.0", None, Some(r), i).unwrap();

    assert_eq!(v(3, 4).compare(&v(3, 4), false, false), Ordering::Equal);
    assert_eq!(v(3, 4).compare(&v(4, 3), false, false), Ordering::Less);
    assert_eq!(v(3, 4).compare(&v(3, 5), false, false), Ordering::Less);
    assert_eq!(v(3, 4).compare(&v(3, 5), false, true), Ordering::Equal);
    assert_eq!(v(3, 4).compare(&v(5, 6), true, false), Ordering::Equal);

    assert_eq!(
        version("+0-ab+1").compare(&version("+0-ab+2"), true, false),
        Ordering::Equal
    );
}

#[test]
fn iteration_parsing() {
    let fl = VersionFlags {
        allow_iteration: true,
        ..VersionFlags::default()
    };

    assert_eq!(
        Version::parse("1.1.1-a.0.1+2#34", fl).unwrap(),
        Version::new(1, "1.1.1", Some("a.0.1".to_string()), Some(2), 34)
            .unwrap()
    );
}

#[test]
fn exact_round_trip_without_folding() {
    // With folding off and iterations disallowed the parse/print round
    // trip is exact.
    for s in [
        "1.0", "1.0+0", "1.0+1", "+2-1.0-alpha+0", "0-", "a.b.c-d.e+65535",
        "+0-X.1",
    ] {
        let v = Version::parse(s, VersionFlags::none()).unwrap();
        assert_eq!(&v.to_string(), s);
    }
}
