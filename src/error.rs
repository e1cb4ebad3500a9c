/// Crate-level error types for reflink diagnostics.
use std::path::PathBuf;

/// All errors in reflink carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, id, or reason for failure.
#[allow(clippy::error_impl_error, reason = "crate-level error type re-exported from lib")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file exists but a required value is missing or wrong.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem, naming the offending key.
        reason: String,
    },

    /// A url/text extraction expression could not be compiled.
    #[error("invalid query expression `{expression}`: {reason}")]
    InvalidExpression {
        /// The expression text as written in the configuration.
        expression: String,
        /// Why the expression was rejected.
        reason: String,
    },

    /// A link kind value is not one of the supported names.
    #[error("`{value}` is not a supported link type")]
    InvalidLinkKind {
        /// The rejected value.
        value: String,
    },

    /// A target id is not a well-formed code entity reference.
    #[error("invalid reference link target `{id}`")]
    InvalidTarget {
        /// The malformed id.
        id: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization of a persisted record failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// A marker element could not be interpreted.
    #[error("invalid {element} element: {reason}")]
    Marker {
        /// Element name (`referenceLink` or `conceptualLink`).
        element: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// A reflection file is well-formed XML but does not match the expected shape.
    #[error("the reference targets file {} is not valid: {reason}", file.display())]
    SchemaInvalid {
        /// Offending file.
        file: PathBuf,
        /// Description of the violation.
        reason: String,
    },

    /// The persisted target store failed.
    #[error("target store {}: {source}", path.display())]
    Store {
        /// Path of the database file.
        path: PathBuf,
        /// The wrapped SQLite error.
        source: rusqlite::Error,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// No target or conceptual topic exists for the id.
    #[error("unknown reference link target `{id}`")]
    UnknownTarget {
        /// The id that was looked up.
        id: String,
    },

    /// An XML document is not well-formed.
    #[error("{} is not well-formed XML: {source}", file.display())]
    Xml {
        /// File that failed to parse.
        file: PathBuf,
        /// The wrapped parser error.
        source: roxmltree::Error,
    },
}

impl Error {
    /// Attach a database path to a SQLite error.
    pub(crate) fn store(path: &std::path::Path, source: rusqlite::Error) -> Self {
        return Self::Store {
            path: path.to_path_buf(),
            source,
        };
    }
}
