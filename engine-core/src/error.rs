//! Errors shared by the search engines.

use thiserror::Error;

/// Errors that can end a search.
///
/// Deadlines are not errors: an engine that runs out of time returns
/// the best result it has. These variants cover the cases where no
/// trustworthy result exists.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The adapter broke its contract: a content hash failed to return
    /// to its pre-move value, a terminal score left [-1, 1], or the
    /// position behaved inconsistently. The search tree can no longer
    /// be trusted.
    #[error("adapter contract violation: {detail}")]
    AdapterContract { detail: String },

    /// A live position produced no legal moves.
    #[error("no legal moves in a position that is not game over")]
    NoLegalMoves,

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn search worker: {0}")]
    WorkerSpawn(String),

    /// Worker threads failed to acknowledge cancellation.
    #[error("search workers failed to stop: {stalled:?}")]
    ThreadDeadlock { stalled: Vec<usize> },

    /// The search was cancelled before any level completed.
    #[error("search aborted before producing a result")]
    Aborted,
}

impl SearchError {
    pub fn contract(detail: impl Into<String>) -> Self {
        SearchError::AdapterContract {
            detail: detail.into(),
        }
    }
}
