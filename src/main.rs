//! # manifest
//!
//! Driver for the pkgmeta library: reads a manifest (or manifest list)
//! from stdin, parses it, and re-serializes it to stdout.
//!
//! ## Modes
//!
//! - `-pp`/`-dp`/`-gp`: parse a pkg/dir/git package manifest list
//! - `-pr`/`-dr`/`-gr`: parse a pkg/dir/git repository manifest list
//! - `-s`: parse a signature manifest
//! - `-p`: parse a single package manifest (`-c` completes incomplete
//!   values, `-i` ignores unknown ones)
//! - `-ec <version>`: round-trip version constraints read one per line,
//!   printing each alongside its effective form
//! - `-v`: print the library version
//!
//! Exits with 0 on success, 1 on a parse or serialization failure, and
//! 2 on an unexpected error.

use std::io::Read;
use std::process::ExitCode;

use clap::Parser;

use pkgmeta::manifest::package::pkg_package_manifest;
use pkgmeta::manifest::repository::{
    DirRepositoryManifests, GitRepositoryManifests, PkgRepositoryManifests,
};
use pkgmeta::manifest::{
    DirPackageManifests, GitPackageManifests, ManifestParser,
    ManifestSerializer, PkgPackageManifests, SignatureManifest,
};
use pkgmeta::{PkgmetaError, Result, Version, VersionConstraint};

const DEBUG_ENV_VAR: &str = "PKGMETA_DEBUG";

/// Parse manifests from stdin and re-serialize them to stdout.
#[derive(Parser, Debug)]
#[command(name = "manifest", version = pkgmeta::VERSION, about)]
struct Args {
    /// Parse a pkg package manifest list.
    #[arg(long = "pp")]
    pkg_packages: bool,

    /// Parse a dir package manifest list.
    #[arg(long = "dp")]
    dir_packages: bool,

    /// Parse a git package manifest list.
    #[arg(long = "gp")]
    git_packages: bool,

    /// Parse a pkg repository manifest list.
    #[arg(long = "pr")]
    pkg_repositories: bool,

    /// Parse a dir repository manifest list.
    #[arg(long = "dr")]
    dir_repositories: bool,

    /// Parse a git repository manifest list.
    #[arg(long = "gr")]
    git_repositories: bool,

    /// Parse a signature manifest.
    #[arg(short = 's')]
    signature: bool,

    /// Parse a single package manifest.
    #[arg(short = 'p')]
    package: bool,

    /// Complete the incomplete values (depends, etc).
    #[arg(short = 'c', requires = "package")]
    complete: bool,

    /// Ignore unknown manifest values.
    #[arg(short = 'i', requires = "package")]
    ignore_unknown: bool,

    /// Don't break long lines while serializing.
    #[arg(short = 'l')]
    long_lines: bool,

    /// Round-trip version constraints read from stdin together with
    /// their effective forms for the given dependent version.
    #[arg(long = "ec", value_name = "VERSION")]
    effective_constraint: Option<String>,

    /// Enable debug logging.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

// The historical mode flags are single-dash multi-character options;
// normalize them to the equivalent long options before clap parsing.
fn normalized_args() -> Vec<String> {
    std::env::args()
        .map(|a| match a.as_str() {
            "-pp" | "-dp" | "-gp" | "-pr" | "-dr" | "-gr" | "-ec" => {
                format!("-{a}")
            }
            "-v" => "--version".to_string(),
            _ => a,
        })
        .collect()
}

/// Initialize terminal logger with debug or info level filtering.
fn initialize_logger(debug: bool) -> Result<()> {
    let filter = if debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Warn
    };

    let config = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("pkgmeta")
        .build();

    simplelog::TermLogger::init(
        filter,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .map_err(|e| PkgmetaError::Value(e.to_string()))?;

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    Ok(input)
}

fn run(args: &Args) -> Result<()> {
    // Round-trip constraints against the dependent version.
    if let Some(v) = &args.effective_constraint {
        let version: Version = v.parse()?;
        let input = read_stdin()?;

        for line in input.lines() {
            let c = VersionConstraint::parse(line)?;
            let ec = c.effective(&version)?;

            debug_assert_eq!(c.is_complete(), c == ec);

            println!("{c} {ec}");
        }

        return Ok(());
    }

    let input = read_stdin()?;
    let mut p = ManifestParser::new(&input, "stdin");
    let mut s = ManifestSerializer::new("stdout", args.long_lines);

    if args.package {
        pkg_package_manifest(&mut p, args.ignore_unknown, args.complete)?
            .serialize(&mut s)?;
    } else if args.pkg_packages {
        PkgPackageManifests::parse(&mut p, false)?.serialize(&mut s)?;
    } else if args.dir_packages {
        DirPackageManifests::parse(&mut p, false)?.serialize(&mut s)?;
    } else if args.git_packages {
        GitPackageManifests::parse(&mut p, false)?.serialize(&mut s)?;
    } else if args.pkg_repositories {
        PkgRepositoryManifests::parse(&mut p, false)?.serialize(&mut s)?;
    } else if args.dir_repositories {
        DirRepositoryManifests::parse(&mut p, false)?.serialize(&mut s)?;
    } else if args.git_repositories {
        GitRepositoryManifests::parse(&mut p, false)?.serialize(&mut s)?;
    } else if args.signature {
        SignatureManifest::parse(&mut p, false)?.serialize(&mut s)?;
    } else {
        return Err(PkgmetaError::Value(
            "no parsing mode specified".to_string(),
        ));
    }

    print!("{}", s.output());

    Ok(())
}

fn main() -> ExitCode {
    let mut args = Args::parse_from(normalized_args());

    if std::env::var(DEBUG_ENV_VAR).is_ok() {
        args.debug = true;
    }

    if let Err(e) = initialize_logger(args.debug) {
        eprintln!("{e}");
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(PkgmetaError::Io(e)) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
    }
}
