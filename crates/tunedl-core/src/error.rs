//! Engine error taxonomy.
//!
//! Per-item downloader failures are captured on the item itself and never
//! surface here unless a caller asked about that item. The HTTP layer maps
//! each variant to a status code via [`EngineError::kind`].

use std::path::PathBuf;

/// Error returned by job engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Empty or malformed input (e.g. a source URL that is not http/https).
    #[error("{0}")]
    Validation(String),

    /// Unknown job, item or track id.
    #[error("{0} not found")]
    NotFound(String),

    /// The external downloader exited nonzero or could not be started.
    #[error("downloader failed: {message}")]
    Downloader {
        message: String,
        exit_code: Option<i32>,
    },

    /// A subprocess did not terminate within the grace period.
    #[error("process supervision: {0}")]
    ProcessSupervision(String),

    /// Disk or permission failure while moving or cleaning up files.
    #[error("{action} {}: {source}", path.display())]
    FileSystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification used at API boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Internal,
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::FileSystem {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Downloader { .. }
            | EngineError::ProcessSupervision(_)
            | EngineError::FileSystem { .. } => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(EngineError::validation("url is empty").kind(), ErrorKind::Validation);
        assert_eq!(EngineError::not_found("job abc").kind(), ErrorKind::NotFound);
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(EngineError::fs("remove", "/tmp/x", io).kind(), ErrorKind::Internal);
    }

    #[test]
    fn display_is_user_facing() {
        assert_eq!(EngineError::not_found("job abc").to_string(), "job abc not found");
        let err = EngineError::Downloader {
            message: "HTTP Error 403".to_string(),
            exit_code: Some(1),
        };
        assert_eq!(err.to_string(), "downloader failed: HTTP Error 403");
    }
}
