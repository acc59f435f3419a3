use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use oorandom::Rand32;
use parking_lot::{Mutex, RwLock};
use seekable_iterator::Comparator;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::level::generate_level;
use crate::node::{Entry, Node};
use crate::orchestrator::{InlineOrchestrator, Orchestrator};

/// Default soft capacity bound, matching the constructor contract's documented default.
pub const DEFAULT_MAX_SIZE: usize = 10_000;
/// Default number of levels, matching the constructor contract's documented default.
pub const DEFAULT_MAX_LEVELS: usize = 32;
/// Default promotion probability, matching the constructor contract's documented default.
pub const DEFAULT_PROMOTION_PROBABILITY: f64 = 0.5;

struct ListInner<K, P, Cmp> {
    head:                   Atomic<Node<K, P>>,
    /// By-key index used by every key-addressed operation (`Contains`, `TryGetValue`,
    /// `TryRemove`, `Update`). Ordering along the level chains is by priority alone per the
    /// constructor contract below; this index is what reconciles that with per-key
    /// uniqueness, resolving the ambiguity between the two that an earlier source variant
    /// left unresolved.
    index:                  RwLock<HashMap<K, Arc<Entry<K, P>>>>,
    count:                  AtomicUsize,
    cmp:                    Cmp,
    orchestrator:           Arc<dyn Orchestrator>,
    level_rng:              Mutex<Rand32>,
    max_levels:             usize,
    max_size:                usize,
    promotion_probability:  f64,
}

/// A concurrent, lock-based probabilistic priority skip list with logical deletion and
/// deferred physical unlinking.
///
/// Ordered by a caller-supplied total order over `P` (the priority); `K` (the key) need only
/// be `Eq + Hash` and is used solely to enforce the uniqueness invariant and to address
/// entries directly, never to position them in the chain. A cheap handle: cloning shares
/// the same underlying list, the same way an `Arc` would.
pub struct ConcurrentPrioritySkipList<K, P, Cmp> {
    inner: Arc<ListInner<K, P, Cmp>>,
}

impl<K, P, Cmp> Clone for ConcurrentPrioritySkipList<K, P, Cmp> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, P, Cmp> ConcurrentPrioritySkipList<K, P, Cmp>
where
    K:   Eq + Hash + Clone,
    P:   Clone,
    Cmp: Comparator<P>,
{
    /// Builds a new list with the given comparator, defaults, and an
    /// [`InlineOrchestrator`]. Use [`Builder`] to customize capacity, level parameters, or
    /// to inject a background [`Orchestrator`].
    pub fn new(cmp: Cmp) -> Result<Self> {
        Builder::new(cmp).build()
    }

    fn new_inner(
        cmp:                    Cmp,
        max_size:               usize,
        max_levels:             usize,
        promotion_probability:  f64,
        orchestrator:           Arc<dyn Orchestrator>,
        seed:                   u64,
    ) -> Result<Self> {
        if max_levels == 0 {
            return Err(Error::InvalidArgument("max_levels must be at least 1".to_owned()));
        }
        if !(0.0..=1.0).contains(&promotion_probability) {
            return Err(Error::InvalidArgument(
                "promotion_probability must be within [0, 1]".to_owned(),
            ));
        }

        let head = Node::new(Arc::new(Entry::head()), max_levels);

        Ok(Self {
            inner: Arc::new(ListInner {
                head:                   Atomic::new(head),
                index:                  RwLock::new(HashMap::new()),
                count:                  AtomicUsize::new(0),
                cmp,
                orchestrator,
                level_rng:              Mutex::new(Rand32::new(seed)),
                max_levels,
                max_size,
                promotion_probability,
            }),
        })
    }

    /// Attempts to insert `key` with `priority`. Returns `false` without modifying the list
    /// if `key` already maps to a live (published, non-deleted) entry.
    pub fn try_add(&self, key: K, priority: P) -> bool {
        loop {
            if let Some(existing) = self.inner.index.read().get(&key).cloned() {
                if self.spin_until_settled(&existing) {
                    // A live duplicate: reject, per the uniqueness invariant.
                    return false;
                }
                // `existing` was logically deleted while we waited; fall through and race
                // to install a fresh entry for this key.
            }

            let guard = epoch::pin();
            let height = {
                let mut rng = self.inner.level_rng.lock();
                generate_level(&mut *rng, self.inner.max_levels, self.inner.promotion_probability) + 1
            };

            let (preds, succs) = self.weak_search(&priority, &guard);

            let mut locked: Vec<Arc<Entry<K, P>>> = Vec::with_capacity(height);
            for pred in preds.iter().take(height) {
                // SAFETY: `pred` was read under the epoch guard that is still pinned.
                let entry = unsafe { pred.deref() }.entry.clone();
                if !locked.iter().any(|e| Arc::ptr_eq(e, &entry)) {
                    locked.push(entry);
                }
            }
            let _guards: Vec<_> = locked.iter().map(|e| e.lock.lock()).collect();

            if !self.validate_links(&preds, &succs, height, &guard) {
                trace!("try_add: validation failed, retrying");
                continue;
            }

            // Reserve the key in the index while still holding the predecessor locks, so no
            // concurrently-validated TryAdd for the same key can slip in between validation
            // and splicing.
            let new_entry = Arc::new(Entry::data(key.clone(), priority.clone()));
            {
                let mut index = self.inner.index.write();
                if let Some(occupant) = index.get(&key) {
                    if !occupant.is_deleted.load(Ordering::Acquire) {
                        drop(index);
                        continue;
                    }
                }
                index.insert(key.clone(), Arc::clone(&new_entry));
            }

            let node = Owned::new(Node::new(Arc::clone(&new_entry), height)).into_shared(&guard);
            for (level, succ) in succs.iter().enumerate().take(height) {
                // SAFETY: the node was just allocated and is not yet reachable from anywhere.
                unsafe { node.deref() }.next[level].store(*succ, Ordering::Release);
            }
            for (level, pred) in preds.iter().enumerate().take(height) {
                // SAFETY: `pred` is locked (directly, or via a head that is never removed).
                unsafe { pred.deref() }.next[level].store(node, Ordering::Release);
            }
            new_entry.is_inserted.store(true, Ordering::Release);

            drop(_guards);

            let new_count = self.inner.count.fetch_add(1, Ordering::AcqRel) + 1;
            if new_count > self.inner.max_size {
                let _ = self.try_remove_min();
            }
            return true;
        }
    }

    /// Attempts to remove `key`. Returns `false` if `key` is absent, not yet published, or
    /// already logically deleted.
    pub fn try_remove(&self, key: &K) -> bool {
        let Some(entry) = self.inner.index.read().get(key).cloned() else {
            return false;
        };
        self.remove_entry(key, &entry)
    }

    /// Removes and returns the key with the current minimum priority, or `None` if the list
    /// has no live entries.
    pub fn try_remove_min(&self) -> Option<K> {
        loop {
            let guard = epoch::pin();
            let head = self.load_head(&guard);
            let candidate = head.next[0].load(Ordering::Acquire, &guard);
            if candidate.is_null() {
                return None;
            }
            // SAFETY: `candidate` was just loaded under the pinned guard.
            let candidate_node = unsafe { candidate.deref() };
            let entry = Arc::clone(&candidate_node.entry);
            let key = entry.key.clone().expect("data nodes always carry a key");

            if !entry.is_inserted.load(Ordering::Acquire) {
                // Still being published by its inserter; not a stable minimum yet.
                continue;
            }
            if entry.is_deleted.load(Ordering::Acquire) {
                // Someone else already claimed it; the orchestrator will unlink it soon.
                continue;
            }

            if self.remove_entry(&key, &entry) {
                return Some(key);
            }
            // Lost the race for this particular node; loop and look at the new minimum.
        }
    }

    fn remove_entry(&self, key: &K, entry: &Arc<Entry<K, P>>) -> bool {
        {
            let _guard = entry.lock.lock();
            if entry.is_deleted.load(Ordering::Acquire) || !entry.is_inserted.load(Ordering::Acquire) {
                return false;
            }
            entry.is_deleted.store(true, Ordering::Release);
        }

        // Remove the index's mapping only if it still points at this exact entry. A
        // concurrent `try_add` for the same key can observe `entry` logically deleted
        // (above) and legitimately splice in a brand-new live entry for `key` before this
        // thread gets here; blind-removing by key would erase that live entry's index
        // record out from under it.
        {
            let mut index = self.inner.index.write();
            if let std::collections::hash_map::Entry::Occupied(occupant) = index.entry(key.clone()) {
                if Arc::ptr_eq(occupant.get(), entry) {
                    occupant.remove();
                }
            }
        }
        self.inner.count.fetch_sub(1, Ordering::AcqRel);

        self.schedule_unlink(Arc::clone(entry));
        true
    }

    /// Hands a physical-unlink job for `entry` to the background orchestrator. Scheduling
    /// the same entry twice is safe: the job only relinks levels where it still finds
    /// `entry` spliced in, so a second run is a no-op.
    fn schedule_unlink(&self, entry: Arc<Entry<K, P>>) {
        let inner = Arc::clone(&self.inner);
        self.inner.orchestrator.run(Box::new(move || {
            physically_unlink(&inner, &entry);
        }));
    }

    /// Returns `true` once `entry` has settled into either the inserted or the deleted
    /// state. Used by `try_add` to resolve the race where a duplicate key is observed
    /// mid-publication.
    fn spin_until_settled(&self, entry: &Arc<Entry<K, P>>) -> bool {
        loop {
            if entry.is_deleted.load(Ordering::Acquire) {
                return false;
            }
            if entry.is_inserted.load(Ordering::Acquire) {
                return true;
            }
            std::hint::spin_loop();
        }
    }

    /// `true` iff `key` currently maps to a published, non-deleted entry.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.index.read().get(key).is_some_and(|e| e.is_live())
    }

    /// Returns `key`'s current priority, if it maps to a published, non-deleted entry.
    ///
    /// Reads the priority without acquiring the node lock; this is sound because `Update`
    /// never mutates a priority in place (see `update`'s doc comment).
    pub fn try_get_value(&self, key: &K) -> Option<P> {
        self.inner.index.read().get(key).and_then(|e| {
            e.is_live().then(|| e.priority.clone().expect("data entries always carry a priority"))
        })
    }

    /// Returns the current count. May be loosely consistent with concurrent mutation in
    /// flight; guaranteed exact once the list is quiescent.
    pub fn get_count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Replaces `key`'s priority with `new_priority`.
    ///
    /// Implemented as logical-delete followed by re-insert, never as an in-place mutation:
    /// mutating a live node's priority in place would violate the ordering invariant, since
    /// the chain is sorted by priority and another thread could be mid-traversal past this
    /// node under the old ordering. Deleting and re-inserting keeps the chain always sorted,
    /// at the cost of a brief window (between the delete and the re-insert) during which a
    /// concurrent `Contains(key)` can observe the key as absent.
    pub fn update(&self, key: &K, new_priority: P) -> Result<()> {
        self.update_with(key, |_, _| new_priority)
    }

    /// As [`Self::update`], but computes the new priority from the key and the current
    /// priority.
    pub fn update_with<F>(&self, key: &K, f: F) -> Result<()>
    where
        F: FnOnce(&K, &P) -> P,
    {
        let Some(entry) = self.inner.index.read().get(key).cloned() else {
            return Err(Error::NotFoundOrDeleted);
        };
        if !entry.is_live() {
            return Err(Error::NotFoundOrDeleted);
        }

        let new_priority = f(key, entry.priority.as_ref().expect("data entries carry a priority"));

        if !self.remove_entry(key, &entry) {
            return Err(Error::NotFoundOrDeleted);
        }

        // A concurrent `try_add` can race into the delete/re-insert window just opened
        // above and install a fresh live entry under `key` first, which would make this
        // `try_add` return `false`. Evict whatever is currently occupying `key` and retry
        // rather than silently dropping `new_priority` and reporting success anyway.
        while !self.try_add(key.clone(), new_priority.clone()) {
            if let Some(occupant) = self.inner.index.read().get(key).cloned() {
                let _ = self.remove_entry(key, &occupant);
            }
        }
        Ok(())
    }

    /// A lazy, lock-free, restartable snapshot of keys in current level-0 order.
    ///
    /// Not a linearizable snapshot: concurrent inserts and removals may or may not be
    /// reflected, per the data model's non-goals.
    pub fn iterate(&self) -> Iter<'_, K, P, Cmp> {
        Iter {
            list:    self,
            guard:   epoch::pin(),
            current: None,
        }
    }

    fn load_head<'g>(&self, guard: &'g Guard) -> &'g Node<K, P> {
        let head = self.inner.head.load(Ordering::Acquire, guard);
        // SAFETY: the head is installed once at construction and never replaced or unlinked.
        unsafe { head.deref() }
    }

    fn less_than(&self, candidate: Option<&P>, target: &P) -> bool {
        match candidate {
            None => true, // the head sentinel compares less than everything
            Some(p) => self.inner.cmp.cmp(p, target) == CmpOrdering::Less,
        }
    }

    /// The lock-free locator described by the data model: for every level, the predecessor
    /// and successor flanking `target`. Ignores logical state entirely; callers interpret
    /// `isInserted`/`isDeleted` themselves.
    fn weak_search<'g>(
        &self,
        target: &P,
        guard:  &'g Guard,
    ) -> (Vec<Shared<'g, Node<K, P>>>, Vec<Shared<'g, Node<K, P>>>) {
        let max_levels = self.inner.max_levels;
        let mut preds = Vec::with_capacity(max_levels);
        let mut succs = Vec::with_capacity(max_levels);
        preds.resize(max_levels, Shared::null());
        succs.resize(max_levels, Shared::null());

        let head = self.inner.head.load(Ordering::Acquire, guard);
        let mut pred = head;

        for level in (0..max_levels).rev() {
            // SAFETY: `pred` is either the head (never unlinked) or a node we reached by
            // following a live forward pointer within this same pinned epoch.
            let mut curr = unsafe { pred.deref() }.next[level].load(Ordering::Acquire, guard);
            while !curr.is_null() {
                // SAFETY: non-null and loaded within this pinned epoch.
                let curr_entry = &unsafe { curr.deref() }.entry;
                if self.less_than(curr_entry.priority.as_ref(), target) {
                    pred = curr;
                    curr = unsafe { pred.deref() }.next[level].load(Ordering::Acquire, guard);
                } else {
                    break;
                }
            }
            preds[level] = pred;
            succs[level] = curr;
        }

        (preds, succs)
    }

    /// Re-validates `preds[L].next[L] == succs[L]` and that neither side is deleted, for
    /// every level below `height`. Called with the relevant predecessor locks already held.
    fn validate_links<'g>(
        &self,
        preds:  &[Shared<'g, Node<K, P>>],
        succs:  &[Shared<'g, Node<K, P>>],
        height: usize,
        guard:  &'g Guard,
    ) -> bool {
        for level in 0..height {
            // SAFETY: held under the predecessor's lock (or the head, which is never
            // removed), within the pinned epoch.
            let pred_node = unsafe { preds[level].deref() };
            if pred_node.entry.is_deleted.load(Ordering::Acquire) {
                return false;
            }
            let actual_succ = pred_node.next[level].load(Ordering::Acquire, guard);
            if actual_succ != succs[level] {
                return false;
            }
            if !succs[level].is_null() {
                // SAFETY: non-null, loaded within this pinned epoch.
                if unsafe { succs[level].deref() }.entry.is_deleted.load(Ordering::Acquire) {
                    return false;
                }
            }
        }
        true
    }
}

/// Physically unlinks `entry` from every level it still participates in, from the top level
/// down to level 0 as the data model requires, by re-walking from the head at each level
/// (the entry's predecessors may have changed since the job was scheduled).
///
/// Safe to run more than once for the same entry: once a level no longer has `entry`
/// spliced in, that level is simply skipped.
fn physically_unlink<K, P, Cmp>(inner: &Arc<ListInner<K, P, Cmp>>, entry: &Arc<Entry<K, P>>)
where
    K:   Eq + Hash + Clone,
    P:   Clone,
    Cmp: Comparator<P>,
{
    debug_assert!(entry.is_deleted.load(Ordering::Acquire));
    let Some(priority) = entry.priority.clone() else {
        return; // never true for a data entry; defensive only
    };

    let guard = epoch::pin();
    for level in (0..inner.max_levels).rev() {
        loop {
            let head = inner.head.load(Ordering::Acquire, &guard);
            // SAFETY: head is never unlinked.
            let mut pred = unsafe { head.deref() };

            let mut curr = pred.next[level].load(Ordering::Acquire, &guard);
            while !curr.is_null() {
                // SAFETY: within this pinned epoch.
                let curr_node = unsafe { curr.deref() };
                if Arc::ptr_eq(&curr_node.entry, entry) {
                    break;
                }
                // Keep scanning through the whole equal-priority run, since ties are
                // broken by insertion order rather than by the comparator; only a
                // strictly-greater priority proves `entry` is absent from this level.
                let not_past_target = curr_node.entry.priority.as_ref()
                    .is_some_and(|p| inner.cmp.cmp(p, &priority) != CmpOrdering::Greater);
                if not_past_target {
                    pred = curr_node;
                    curr = pred.next[level].load(Ordering::Acquire, &guard);
                } else {
                    break;
                }
            }

            if curr.is_null() {
                // `entry` never reached this level, or was already unlinked here.
                break;
            }
            // SAFETY: non-null, within this pinned epoch.
            let curr_node = unsafe { curr.deref() };
            if !Arc::ptr_eq(&curr_node.entry, entry) {
                break;
            }

            let next = curr_node.next[level].load(Ordering::Acquire, &guard);
            match pred.next[level].compare_exchange(
                curr,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(unlinked) => {
                    // SAFETY: `unlinked` is now unreachable from this level; once every
                    // level has been processed the node is unreachable entirely and it is
                    // safe to reclaim once all pinned readers have passed.
                    if level == 0 {
                        unsafe { guard.defer_destroy(unlinked) };
                    }
                    break;
                }
                Err(_) => {
                    trace!(level, "physically_unlink: predecessor changed, retrying this level");
                    continue;
                }
            }
        }
    }
    debug!("physically_unlink: entry fully unlinked");
}

impl<K, P, Cmp> Drop for ListInner<K, P, Cmp> {
    fn drop(&mut self) {
        // No concurrent access is possible once the last handle is dropping, so this walks
        // the level-0 chain and reclaims every node directly rather than deferring to the
        // epoch scheme.
        let guard = unsafe { epoch::unprotected() };
        let head = self.head.swap(Shared::null(), Ordering::Relaxed, guard);
        if head.is_null() {
            return;
        }
        // SAFETY: exclusive access, no other thread can observe this list anymore.
        let mut current = unsafe { head.into_owned() }.into_box().next[0]
            .swap(Shared::null(), Ordering::Relaxed, guard);
        while !current.is_null() {
            // SAFETY: exclusive access during `Drop`.
            let mut boxed = unsafe { current.into_owned() }.into_box();
            current = boxed.next[0].swap(Shared::null(), Ordering::Relaxed, guard);
            drop(boxed);
        }
    }
}

/// A lazy, lock-free, restartable iterator over keys in current level-0 order.
///
/// Skips nodes that are not yet published or that have been logically deleted. Holds its
/// own pinned epoch guard for its lifetime; the current position is tracked as a raw
/// pointer rather than a borrowed `Shared`, since a `Shared` borrowed from that guard cannot
/// be named in this struct's own field list without presupposing its lifetime.
pub struct Iter<'a, K, P, Cmp> {
    list:    &'a ConcurrentPrioritySkipList<K, P, Cmp>,
    guard:   Guard,
    current: Option<*const Node<K, P>>,
}

impl<'a, K, P, Cmp> Iterator for Iter<'a, K, P, Cmp>
where
    K: Eq + Hash + Clone,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        loop {
            let next = match self.current {
                None => self.list.load_head(&self.guard).next[0].load(Ordering::Acquire, &self.guard),
                // SAFETY: `ptr` was obtained from a live `Shared` under this same guard,
                // and the guard has stayed pinned ever since.
                Some(ptr) => unsafe { &*ptr }.next[0].load(Ordering::Acquire, &self.guard),
            };
            if next.is_null() {
                self.current = None;
                return None;
            }
            self.current = Some(next.as_raw());
            // SAFETY: non-null, within the iterator's pinned guard.
            let entry = &unsafe { next.deref() }.entry;
            if entry.is_live() {
                return entry.key.clone();
            }
            // Skip unpublished or logically-deleted nodes and keep walking.
        }
    }
}

/// Builds a [`ConcurrentPrioritySkipList`] with explicit capacity, level parameters, and an
/// injected orchestrator.
pub struct Builder<Cmp> {
    cmp:                    Cmp,
    max_size:               usize,
    max_levels:             usize,
    promotion_probability:  f64,
    orchestrator:           Option<Arc<dyn Orchestrator>>,
    seed:                   u64,
}

impl<Cmp> Builder<Cmp> {
    pub fn new(cmp: Cmp) -> Self {
        Self {
            cmp,
            max_size:              DEFAULT_MAX_SIZE,
            max_levels:            DEFAULT_MAX_LEVELS,
            promotion_probability: DEFAULT_PROMOTION_PROBABILITY,
            orchestrator:          None,
            seed:                  0x_dead_beef,
        }
    }

    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    #[must_use]
    pub fn promotion_probability(mut self, promotion_probability: f64) -> Self {
        self.promotion_probability = promotion_probability;
        self
    }

    #[must_use]
    pub fn orchestrator(mut self, orchestrator: Arc<dyn Orchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Seeds the level generator deterministically, for reproducible tests.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build<K, P>(self) -> Result<ConcurrentPrioritySkipList<K, P, Cmp>>
    where
        K:   Eq + Hash + Clone,
        P:   Clone,
        Cmp: Comparator<P>,
    {
        let orchestrator = self.orchestrator.unwrap_or_else(|| Arc::new(InlineOrchestrator));
        ConcurrentPrioritySkipList::new_inner(
            self.cmp,
            self.max_size,
            self.max_levels,
            self.promotion_probability,
            orchestrator,
            self.seed,
        )
    }
}
