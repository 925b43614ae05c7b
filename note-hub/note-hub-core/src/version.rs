//! Optimistic version check for block writes.

use crate::error::{CoreError, Result};

/// Compare the stored version against what the caller last saw.
///
/// `None` skips the check entirely and the write goes through regardless of
/// what happened since the caller read the block.
pub fn check_version(stored: u64, expected: Option<u64>) -> Result<()> {
    match expected {
        Some(expected) if expected != stored => Err(CoreError::VersionConflict {
            expected,
            actual: stored,
        }),
        _ => Ok(()),
    }
}

/// Version a successful write commits.
pub fn next_version(stored: u64) -> u64 {
    stored + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_version_passes() {
        assert!(check_version(3, Some(3)).is_ok());
    }

    #[test]
    fn stale_version_conflicts() {
        assert_eq!(
            check_version(2, Some(1)),
            Err(CoreError::VersionConflict {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn missing_expectation_is_unconditional() {
        assert!(check_version(42, None).is_ok());
    }

    #[test]
    fn next_is_plus_one() {
        assert_eq!(next_version(1), 2);
    }
}
