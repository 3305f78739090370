use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ids::Ident;
use crate::persist::IndexKind;

/// Errors produced while building, opening or reading an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("postings store error: {0}")]
    Storage(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Config(String),

    /// Persisted data is absent, truncated or inconsistent with its metadata.
    #[error("corrupt index at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("{kind} {id} out of range (valid ids are below {bound})")]
    OutOfRange {
        kind: &'static str,
        id: u64,
        bound: u64,
    },

    /// Malformed corpus input; the build is aborted without committing metadata.
    #[error("{source_name}:{line}: {reason}")]
    Format {
        source_name: String,
        line: u64,
        reason: String,
    },

    #[error("cannot open corpus file {}: {source}", path.display())]
    Corpus {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("expected a {expected} index at {}, found {found}", path.display())]
    WrongIndexKind {
        path: PathBuf,
        expected: IndexKind,
        found: IndexKind,
    },
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub fn corrupt(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        IndexError::Corrupt {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn out_of_range<I: Ident>(id: I, bound: u64) -> Self {
        IndexError::OutOfRange {
            kind: I::NAME,
            id: id.as_u64(),
            bound,
        }
    }

    pub fn format(source_name: impl Into<String>, line: u64, reason: impl Into<String>) -> Self {
        IndexError::Format {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, IndexError::OutOfRange { .. })
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, IndexError::Corrupt { .. })
    }
}
