//! Error types for ff
//!
//! Every fatal error maps to one of the stable exit codes. Per-entry
//! failures during the walk never surface here; they are recorded as
//! missing values in the evaluation context.

use std::path::PathBuf;

/// Stable exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_NO_MATCHES: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_SUBPROCESS: i32 = 3;
pub const EXIT_WALK: i32 = 4;
pub const EXIT_PLUGIN: i32 = 10;
pub const EXIT_ATTRIBUTE: i32 = 11;
pub const EXIT_TEST: i32 = 12;

/// Errors raised while parsing a value literal or applying an operator.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// Literal could not be parsed as the attribute's type
    #[error("invalid {kind} literal '{input}': {message}")]
    BadLiteral {
        kind: &'static str,
        input: String,
        message: String,
    },

    /// Operator is not defined for the attribute's type
    #[error("operator '{op}' is not supported for type {kind}")]
    BadOperator { op: String, kind: &'static str },

    /// Invalid regex on the right-hand side of '~'
    #[error("invalid regex pattern: {0}")]
    BadRegex(#[from] regex::Error),

    /// Invalid glob on the right-hand side of '%'
    #[error("invalid glob pattern: {0}")]
    BadGlob(#[from] globset::Error),
}

/// Errors raised while resolving attribute names against the registry.
#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("unknown attribute '{0}'")]
    Unknown(String),

    #[error("ambiguous attribute '{name}' (provided by {providers}); qualify with a plugin prefix")]
    Ambiguous { name: String, providers: String },

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),
}

/// Errors raised while parsing the expression token stream.
#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("test '{0}' has no operator")]
    MissingOperator(String),

    #[error("test '{0}' has an empty attribute name")]
    EmptyAttribute(String),

    #[error("invalid attribute name '{0}'")]
    BadAttributeName(String),

    #[error("unmatched '{0}' in expression")]
    UnmatchedGroup(&'static str),

    #[error("empty group in expression")]
    EmptyGroup,

    #[error("expected a test after '{0}'")]
    DanglingKeyword(&'static str),
}

/// Provider loading and registration errors.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin '{plugin}' redeclares attribute '{attribute}'")]
    DuplicateAttribute { plugin: String, attribute: String },

    #[error("duplicate plugin name '{0}'")]
    DuplicatePlugin(String),

    #[error("plugin dependency cycle involving '{0}'")]
    DependencyCycle(String),

    #[error("plugin '{plugin}' depends on missing plugin '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },
}

/// Top-level error type; `exit_code` gives the process exit status.
#[derive(Debug, thiserror::Error)]
pub enum FfError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Expr(#[from] ExprError),

    #[error("{0}")]
    Attribute(#[from] AttributeError),

    #[error("{0}")]
    Type(#[from] TypeError),

    #[error("{0}")]
    Plugin(#[from] PluginError),

    #[error("cannot read reference file '{path}': {source}")]
    Reference {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("walk error: {0}")]
    Walk(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FfError {
    /// Maps the error to its stable exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            FfError::Usage(_) | FfError::Reference { .. } => EXIT_USAGE,
            FfError::Expr(_) | FfError::Type(_) => EXIT_TEST,
            FfError::Attribute(_) => EXIT_ATTRIBUTE,
            FfError::Plugin(_) => EXIT_PLUGIN,
            FfError::Walk(_) | FfError::Io(_) => EXIT_WALK,
        }
    }
}
