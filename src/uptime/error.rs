//! Errors raised while processing a check result.

use thiserror::Error;

use crate::store::StoreError;
use crate::uptime::issues::IssueError;
use crate::uptime::repository::RepositoryError;

/// A failure that must stop processing of the current result.
///
/// The result's offset is not committed, so the transport redelivers it.
/// Produce failures never appear here: they are logged and counted.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Issue(#[from] IssueError),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
