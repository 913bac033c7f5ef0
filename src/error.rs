use std::io;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while reading or writing archives
#[derive(Debug, Error)]
pub enum Error {
    /// The requested entry does not exist in the archive
    #[error("entry not found in archive: {0}")]
    NotFound(String),

    /// The container framing is malformed
    #[error("malformed tar archive: {0}")]
    Format(String),

    /// Two entries share a name and the configured policy rejects that
    #[error("duplicate entry in archive: {0}")]
    DuplicateEntry(String),

    /// Underlying stream or file store failure, kept verbatim
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Error raised by a caller-supplied callback
    #[error(transparent)]
    Handler(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wrap an arbitrary caller error so it can be returned from a `for_each` handler
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Error::Handler(err.into())
    }

    /// True for a missing archive entry as well as a missing file-store entry
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("a".into()).is_not_found());
        assert!(Error::Io(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_not_found());
        assert!(!Error::Format("bad".into()).is_not_found());
    }

    #[test]
    fn test_handler_error_keeps_source() {
        let err = Error::handler("want error");
        assert_eq!(err.to_string(), "want error");
    }
}
