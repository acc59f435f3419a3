// See https://linebender.org/blog/doc-include for this README inclusion strategy
// File links are not supported by rustdoc
//!
//! [LICENSE-APACHE]: https://github.com/tideline-rs/tideline/blob/main/LICENSE-APACHE
//! [LICENSE-MIT]: https://github.com/tideline-rs/tideline/blob/main/LICENSE-MIT
//!
//! A concurrent, lock-based probabilistic priority skip list.
//!
//! Entries are ordered by a caller-supplied total order over a priority type; uniqueness is
//! enforced over a separate key type. Removal is two-phase: a node is logically deleted
//! under its own lock (visible to every reader immediately), and physically unlinked later
//! by an injected [`orchestrator::Orchestrator`], off the calling thread's critical path.
//! Memory for unlinked nodes is reclaimed through `crossbeam_epoch`, since lock-free readers
//! may still hold a reference to a node mid-unlink.

mod comparator;
mod error;
mod level;
mod list;
mod node;
pub mod orchestrator;

pub use self::comparator::OrdComparator;
pub use self::error::{Error, Result};
pub use self::list::{
    Builder, ConcurrentPrioritySkipList, Iter, DEFAULT_MAX_LEVELS, DEFAULT_MAX_SIZE,
    DEFAULT_PROMOTION_PROBABILITY,
};
pub use self::orchestrator::{InlineOrchestrator, Orchestrator};
#[cfg(feature = "thread-orchestrator")]
pub use self::orchestrator::ThreadOrchestrator;

pub use seekable_iterator::Comparator;
