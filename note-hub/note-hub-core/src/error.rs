use std::fmt;
use thiserror::Error;

/// Kind of document a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Note,
    Block,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Note => f.write_str("note"),
            Resource::Block => f.write_str("block"),
        }
    }
}

/// Outcomes surfaced to callers of the core.
///
/// Every guard failure aborts its transaction before anything is written, so
/// receiving one of these means the store is exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("permission denied")]
    PermissionDenied,
    #[error("{0} not found")]
    NotFound(Resource),
    #[error("block locked by another user")]
    Locked,
    #[error("not lock holder")]
    NotHolder,
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the same request may succeed later without changing inputs.
    ///
    /// `Locked` clears once the holder releases or the lease lapses,
    /// `VersionConflict` after re-reading the block.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Locked | CoreError::VersionConflict { .. } | CoreError::Internal(_)
        )
    }

    pub(crate) fn internal(err: impl fmt::Display) -> Self {
        CoreError::Internal(err.to_string())
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// `BadRequest` naming the first required id that is blank.
pub(crate) fn ensure_present(fields: &[(&str, &str)]) -> Result<()> {
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(CoreError::BadRequest(format!("{name} required"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CoreError::Locked.is_retryable());
        assert!(CoreError::VersionConflict { expected: 1, actual: 2 }.is_retryable());
        assert!(CoreError::Internal("io".into()).is_retryable());
        assert!(!CoreError::PermissionDenied.is_retryable());
        assert!(!CoreError::NotHolder.is_retryable());
        assert!(!CoreError::NotFound(Resource::Block).is_retryable());
    }

    #[test]
    fn blank_ids_are_bad_requests() {
        assert!(ensure_present(&[("ownerId", "u1"), ("noteId", "n1")]).is_ok());
        assert_eq!(
            ensure_present(&[("ownerId", "u1"), ("noteId", "  ")]),
            Err(CoreError::BadRequest("noteId required".into()))
        );
    }

    #[test]
    fn messages_name_the_resource() {
        assert_eq!(CoreError::NotFound(Resource::Note).to_string(), "note not found");
        assert_eq!(
            CoreError::VersionConflict { expected: 1, actual: 3 }.to_string(),
            "version conflict: expected 1, found 3"
        );
    }
}
