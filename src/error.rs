use std::path::PathBuf;
use thiserror::Error;

/// Error kinds surfaced by the alignment library.
///
/// Everything propagates to the session boundary (a tool `main` or a library
/// caller); there is no retry logic anywhere in the core.
#[derive(Error, Debug)]
pub enum HalError {
    #[error("i/o failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bad magic, unknown or future version, corrupt header. The file is
    /// refused outright.
    #[error("format error: {0}")]
    Format(String),

    /// An operation required a tree shape the alignment doesn't have.
    #[error("tree mismatch: {0}")]
    TreeMismatch(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// On-disk data violates a structural invariant (tiling, reciprocity,
    /// paralogy ring, parse consistency). The file is refused.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("write denied: {0} is open read-only")]
    WriteDenied(String),
}

pub type Result<T> = std::result::Result<T, HalError>;

impl HalError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HalError::Io {
            path: path.into(),
            source,
        }
    }
}
