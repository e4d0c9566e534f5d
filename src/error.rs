//! Error types for pkgmeta parsing, validation, and serialization.

use std::fmt;

use thiserror::Error;

/// Main error type for pkgmeta operations.
///
/// Scalar value errors (version, constraint, name, url, ...) carry the bare
/// reason; the manifest layer wraps them with field context and input
/// location when reporting. Caller contract violations (accessing the host
/// of a local location, the string form of an empty version, etc) are not
/// represented here and panic instead.
#[derive(Error, Debug)]
pub enum PkgmetaError {
    // Scalar value errors.
    #[error("{0}")]
    Version(String),

    #[error("{0}")]
    Constraint(String),

    #[error("{0}")]
    PackageName(String),

    #[error("{0}")]
    BuildClassExpr(String),

    #[error("{0}")]
    Url(String),

    #[error("{0}")]
    Path(String),

    #[error("{0}")]
    Location(String),

    #[error("{0}")]
    RefFilter(String),

    /// A miscellaneous scalar value failed its grammar (text type,
    /// test dependency type, ...).
    #[error("{0}")]
    Value(String),

    // Structured input errors.
    #[error("{0}")]
    Parsing(ParsingError),

    #[error("{0}")]
    Serialization(SerializationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Manifest parse error with the input location of the offending value.
///
/// The source name is empty when the input has no meaningful name (for
/// example, override values supplied programmatically).
#[derive(Debug)]
pub struct ParsingError {
    pub source_name: String,
    pub line: u64,
    pub column: u64,
    pub description: String,
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source_name.is_empty() {
            write!(f, "{}", self.description)
        } else {
            write!(
                f,
                "{}:{}:{}: error: {}",
                self.source_name, self.line, self.column, self.description
            )
        }
    }
}

/// Manifest serialization error: an in-memory record violates an invariant
/// of the serialization context.
#[derive(Debug)]
pub struct SerializationError {
    pub source_name: String,
    pub description: String,
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source_name.is_empty() {
            write!(f, "{}", self.description)
        } else {
            write!(f, "{}: error: {}", self.source_name, self.description)
        }
    }
}

/// Result type alias using PkgmetaError.
pub type Result<T> = std::result::Result<T, PkgmetaError>;

impl PkgmetaError {
    /// Create a manifest parse error with input location.
    pub fn parsing(
        source_name: impl Into<String>,
        line: u64,
        column: u64,
        description: impl Into<String>,
    ) -> Self {
        Self::Parsing(ParsingError {
            source_name: source_name.into(),
            line,
            column,
            description: description.into(),
        })
    }

    /// Create a manifest parse error without location information.
    pub fn parsing_nameless(description: impl Into<String>) -> Self {
        Self::Parsing(ParsingError {
            source_name: String::new(),
            line: 0,
            column: 0,
            description: description.into(),
        })
    }

    /// Create a manifest serialization error.
    pub fn serialization(
        source_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::Serialization(SerializationError {
            source_name: source_name.into(),
            description: description.into(),
        })
    }

    /// The bare reason string, without any location prefix.
    pub fn reason(&self) -> String {
        match self {
            Self::Version(d)
            | Self::Constraint(d)
            | Self::PackageName(d)
            | Self::BuildClassExpr(d)
            | Self::Url(d)
            | Self::Path(d)
            | Self::Location(d)
            | Self::RefFilter(d)
            | Self::Value(d) => d.clone(),
            Self::Parsing(e) => e.description.clone(),
            Self::Serialization(e) => e.description.clone(),
            Self::Io(e) => e.to_string(),
        }
    }
}
