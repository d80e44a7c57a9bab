//! Engine Error Taxonomy
//!
//! One error enum for the whole core, mapped onto the dispositions the
//! public API promises: invalid input and missing rows surface immediately,
//! transport failures are retried inside the operation before surfacing,
//! deadline crossings abort without rollback, and invariant violations are
//! logged with context before they reach the caller.

use std::time::Instant;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Core engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed caller input: empty content, NaN vectors, dimension
    /// mismatches, unparsable patterns.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Row not present. Also covers rows owned by a different user: existence
    /// of another tenant's data is never disclosed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Fact update attempted to change an immutable column
    /// (subject/predicate/object require a new fact).
    #[error("conflicting fact update: {0}")]
    ConflictingFact(String),

    /// Storage or embedder transport failure that survived in-operation
    /// retries.
    #[error("backend unavailable after {attempts} attempt(s): {message}")]
    BackendUnavailable { attempts: u32, message: String },

    /// The operation crossed its deadline. Partial writes are not rolled
    /// back; inserts are at-least-once under id uniqueness.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invariant violation inside the engine (e.g. a waypoint centroid went
    /// non-finite). Callers must not swallow this.
    #[error("internal invariant violation: {0}")]
    Internal(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Startup configuration error (unknown backend, bad env value)
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse error kind for callers that dispatch on disposition rather than
/// on the concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    ConflictingFact,
    BackendUnavailable,
    DeadlineExceeded,
    Internal,
    Config,
}

impl EngineError {
    /// The disposition kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::ConflictingFact(_) => ErrorKind::ConflictingFact,
            EngineError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            EngineError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            EngineError::Config(_) => ErrorKind::Config,
            _ => ErrorKind::Internal,
        }
    }

    /// A short remediation hint, when one exists for the kind.
    pub fn hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::BackendUnavailable => {
                Some("check storage/embedder connectivity; the operation may be retried once")
            }
            ErrorKind::DeadlineExceeded => {
                Some("partial writes are kept; re-issue the operation with the same id")
            }
            ErrorKind::ConflictingFact => {
                Some("subject/predicate/object are immutable; insert a new fact instead")
            }
            ErrorKind::Config => Some("recognized environment keys are listed in the config module docs"),
            _ => None,
        }
    }

    /// Whether the API boundary is allowed to retry this error (at most once).
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::BackendUnavailable { .. })
    }

    /// A row exists but belongs to a different user. Surfaced as a plain
    /// `NotFound` so scoped callers cannot probe for other tenants' ids.
    pub(crate) fn not_found_for_user(id: &str) -> Self {
        EngineError::NotFound(id.to_string())
    }
}

/// Core result type
pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// DEADLINES
// ============================================================================

/// Optional per-operation deadline.
///
/// Checked before every suspension point (storage call, embedding call,
/// cache-miss fill). Crossing it aborts the rest of the operation; writes
/// already acknowledged stay.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline; never expires.
    pub const NONE: Deadline = Deadline(None);

    /// Deadline at an absolute instant.
    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    /// Deadline a duration from now.
    pub fn within(timeout: std::time::Duration) -> Self {
        Deadline(Some(Instant::now() + timeout))
    }

    /// Error if the deadline has passed.
    pub fn check(&self) -> Result<()> {
        match self.0 {
            Some(t) if Instant::now() >= t => Err(EngineError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            EngineError::InvalidInput("x".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(EngineError::DeadlineExceeded.kind(), ErrorKind::DeadlineExceeded);
        assert_eq!(
            EngineError::BackendUnavailable {
                attempts: 3,
                message: "down".into()
            }
            .kind(),
            ErrorKind::BackendUnavailable
        );
    }

    #[test]
    fn test_not_found_for_user_is_opaque() {
        let err = EngineError::not_found_for_user("mem-1");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.to_string().contains("user"));
    }

    #[test]
    fn test_only_backend_unavailable_retryable() {
        assert!(EngineError::BackendUnavailable {
            attempts: 1,
            message: "x".into()
        }
        .is_retryable());
        assert!(!EngineError::DeadlineExceeded.is_retryable());
        assert!(!EngineError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_deadline_none_never_expires() {
        assert!(Deadline::NONE.check().is_ok());
    }

    #[test]
    fn test_deadline_expires() {
        let d = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert!(matches!(d.check(), Err(EngineError::DeadlineExceeded)));

        let d = Deadline::within(Duration::from_secs(60));
        assert!(d.check().is_ok());
    }
}
