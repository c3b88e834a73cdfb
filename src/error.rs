use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Coarse classification of [`RetrievalError`], used by callers that react to
/// the failure class rather than the exact variant (exit codes, retries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Format,
    Integrity,
    Callback,
    Filesystem,
}

#[derive(Debug, Error, Diagnostic)]
pub enum RetrievalError {
    #[error("invalid dataset specifier: {0}")]
    #[diagnostic(help("expected `namespace:graph` or `namespace:graph@version`"))]
    InvalidSpecifier(String),

    #[error("invalid graph name: {0}")]
    InvalidGraphName(String),

    #[error("invalid dataset namespace: {0}")]
    InvalidNamespace(String),

    #[error("invalid graph version: {0}")]
    InvalidVersion(String),

    #[error("graph `{name}` is not available in the `{namespace}` registry")]
    #[diagnostic(help("check the registry files passed with --registry"))]
    UnknownGraph { namespace: String, name: String },

    #[error("version `{version}` of graph `{name}` is not available (known versions: {known})")]
    UnknownVersion {
        name: String,
        version: String,
        known: String,
    },

    #[error("no registry loaded for namespace `{0}`")]
    UnknownNamespace(String),

    #[error("invalid column specification: {0}")]
    InvalidColumnSpec(String),

    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("unknown callback: {0}")]
    UnknownCallback(String),

    #[error("preprocessing is not supported: {0}")]
    #[diagnostic(help("retry with --preprocess never to load the raw files directly"))]
    UnsupportedCapability(String),

    #[error("missing config file graph-retrieval.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("download of {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}: {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("{path}:{line}: {message}")]
    MalformedRow {
        path: String,
        line: usize,
        message: String,
    },

    #[error("{path}: column `{column}` not found in header")]
    MissingColumn { path: String, column: String },

    #[error("{path}:{line}: column {column} is out of range (row has {width} fields)")]
    ColumnOutOfRange {
        path: String,
        line: usize,
        column: usize,
        width: usize,
    },

    #[error("integrity check failed for {what}: expected {expected}, found {actual}")]
    #[diagnostic(help(
        "the cached canonical files look inconsistent; retry with --no-cache to rebuild them"
    ))]
    IntegrityMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("callback `{name}` failed: {message}")]
    Callback { name: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetrievalError::InvalidSpecifier(_)
            | RetrievalError::InvalidGraphName(_)
            | RetrievalError::InvalidNamespace(_)
            | RetrievalError::InvalidVersion(_)
            | RetrievalError::UnknownGraph { .. }
            | RetrievalError::UnknownVersion { .. }
            | RetrievalError::UnknownNamespace(_)
            | RetrievalError::InvalidColumnSpec(_)
            | RetrievalError::InvalidRecipe(_)
            | RetrievalError::UnknownCallback(_)
            | RetrievalError::UnsupportedCapability(_)
            | RetrievalError::MissingConfig
            | RetrievalError::ConfigRead(_)
            | RetrievalError::ConfigParse(_) => ErrorKind::Configuration,
            RetrievalError::Http { .. } | RetrievalError::HttpStatus { .. } => {
                ErrorKind::Transport
            }
            RetrievalError::MalformedRow { .. }
            | RetrievalError::MissingColumn { .. }
            | RetrievalError::ColumnOutOfRange { .. } => ErrorKind::Format,
            RetrievalError::IntegrityMismatch { .. } => ErrorKind::Integrity,
            RetrievalError::Callback { .. } => ErrorKind::Callback,
            RetrievalError::Filesystem(_) => ErrorKind::Filesystem,
        }
    }

    pub(crate) fn malformed(path: impl ToString, line: usize, message: impl Into<String>) -> Self {
        RetrievalError::MalformedRow {
            path: path.to_string(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn integrity(
        what: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        RetrievalError::IntegrityMismatch {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_kinds() {
        let err = RetrievalError::UnknownVersion {
            name: "Cora".to_string(),
            version: "v1".to_string(),
            known: "latest".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            RetrievalError::malformed("edges.tsv", 3, "bad weight").kind(),
            ErrorKind::Format
        );
        assert_eq!(
            RetrievalError::integrity("edges", 3, 4).kind(),
            ErrorKind::Integrity
        );
    }
}
