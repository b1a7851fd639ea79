//! Shared error types for the services crate.

use thiserror::Error;

use cbt_core::model::TestId;
use storage::repository::StorageError;

/// Errors emitted by exam session services.
///
/// Late or out-of-range calls from the presentation layer are not errors; they
/// are reported as ignored mutations on the session itself.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no user is signed in")]
    Unauthenticated,
    #[error("test {0} not found")]
    NotFound(TestId),
    #[error("test {0} is not published")]
    Unpublished(TestId),
    #[error("test has no questions")]
    Empty,
    #[error("attempt has not been submitted")]
    NotSubmitted,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
