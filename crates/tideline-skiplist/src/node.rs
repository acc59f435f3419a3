use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_epoch::Atomic;
use parking_lot::Mutex;

/// The identity, priority, and logical-state bits of one list entry.
///
/// `Entry` is kept separate from [`Node`] so the skip list's secondary by-key index
/// (`ListInner::index`) can hold a long-lived `Arc<Entry<K, P>>` without caring about the
/// epoch-managed lifetime of the `Node` that currently splices it into the level chains.
/// The node lock described by the data model lives here, since every operation that needs
/// to exclude concurrent writers to one entry addresses it by key (through the index) just
/// as often as it addresses it by chain position.
pub(crate) struct Entry<K, P> {
    /// `None` only for the head sentinel.
    pub(crate) key:      Option<K>,
    /// `None` only for the head sentinel; compares as less than every real priority.
    pub(crate) priority: Option<P>,
    /// The single exclusive lock the data model assigns to each node.
    pub(crate) lock:        Mutex<()>,
    pub(crate) is_inserted: AtomicBool,
    pub(crate) is_deleted:  AtomicBool,
}

impl<K, P> Entry<K, P> {
    pub(crate) fn head() -> Self {
        Self {
            key:         None,
            priority:    None,
            lock:        Mutex::new(()),
            is_inserted: AtomicBool::new(true),
            is_deleted:  AtomicBool::new(false),
        }
    }

    pub(crate) fn data(key: K, priority: P) -> Self {
        Self {
            key:         Some(key),
            priority:    Some(priority),
            lock:        Mutex::new(()),
            is_inserted: AtomicBool::new(false),
            is_deleted:  AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn is_head(&self) -> bool {
        self.priority.is_none()
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.is_inserted.load(Ordering::Acquire) && !self.is_deleted.load(Ordering::Acquire)
    }
}

/// One level-chained node. The head sentinel and every data node share this representation,
/// which is what lets `WeakSearch` treat predecessor and successor slots uniformly instead
/// of special-casing the head at every level.
pub(crate) struct Node<K, P> {
    pub(crate) entry: Arc<Entry<K, P>>,
    /// Forward pointers, one per level this node participates in. Reclamation of a node is
    /// deferred to the epoch-based scheme in `crossbeam_epoch`, since a `WeakSearch` reader
    /// may be mid-traversal through this node's pointer when it is physically unlinked.
    pub(crate) next: Box<[Atomic<Node<K, P>>]>,
}

impl<K, P> Node<K, P> {
    pub(crate) fn new(entry: Arc<Entry<K, P>>, height: usize) -> Self {
        debug_assert!(height > 0);
        Self {
            entry,
            next: (0..height).map(|_| Atomic::null()).collect(),
        }
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        self.next.len()
    }
}
