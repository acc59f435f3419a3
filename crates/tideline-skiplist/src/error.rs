use thiserror::Error;


/// Errors surfaced by [`crate::ConcurrentPrioritySkipList`].
///
/// Validation retries during `TryAdd`/`TryRemove` are internal and never reach this type;
/// only genuine user errors and background-task failures are surfaced here.
#[derive(Debug, Error)]
pub enum Error {
    /// Raised by the constructor when `max_levels` is zero, `promotion_probability` is
    /// outside `[0, 1]`, or a required collaborator is missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Raised by `Update` when the key does not currently map to a live, published entry.
    #[error("key not found, or already deleted")]
    NotFoundOrDeleted,

    /// Raised when an operation's internal retry budget is exhausted under contention.
    ///
    /// Only produced if a retry budget was configured; by default retries are unbounded,
    /// since the search is monotone and every operation's lock set is bounded.
    #[error("exhausted the retry budget under contention")]
    ContentionExhausted,

    /// Raised when the background unlink orchestrator could not execute a job. The list
    /// remains logically consistent: the affected node stays reachable but marked deleted,
    /// and readers continue to filter it out. Only physical reclamation is delayed.
    #[error("background unlink orchestrator failed: {0}")]
    OrchestratorFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
