use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tideline_skiplist::{Builder, OrdComparator};

fn concurrent_list(max_size: usize) -> tideline_skiplist::ConcurrentPrioritySkipList<u64, u64, OrdComparator<u64>> {
    Builder::new(OrdComparator::new())
        .max_size(max_size)
        .max_levels(12)
        .seed(7)
        .build()
        .expect("valid constructor arguments")
}

/// Two threads insert disjoint key ranges concurrently; once both join, every key must be
/// present exactly once and the count must equal the total number of insertions.
#[test]
fn two_threads_inserting_disjoint_keys_land_every_entry() {
    const PER_THREAD: u64 = 2_000;

    let list = concurrent_list(10_000);

    let list_a = list.clone();
    let thread_a = thread::spawn(move || {
        for i in 0..PER_THREAD {
            assert!(list_a.try_add(i, i));
        }
    });

    let list_b = list.clone();
    let thread_b = thread::spawn(move || {
        for i in PER_THREAD..(2 * PER_THREAD) {
            assert!(list_b.try_add(i, i));
        }
    });

    thread_a.join().unwrap();
    thread_b.join().unwrap();

    assert_eq!(list.get_count(), (PER_THREAD * 2) as usize);
    for i in 0..(2 * PER_THREAD) {
        assert!(list.contains(&i), "key {i} missing after concurrent insertion");
    }
}

/// One thread keeps adding while another keeps draining via `TryRemoveMin`; once both stop,
/// the count must equal additions minus successful removals exactly, with no entry double
/// counted or lost.
#[test]
fn concurrent_add_and_remove_min_keep_count_balanced() {
    const TOTAL_ADDS: u64 = 5_000;

    let list = concurrent_list(10_000);
    let removed = Arc::new(AtomicUsize::new(0));

    let list_writer = list.clone();
    let writer = thread::spawn(move || {
        for i in 0..TOTAL_ADDS {
            assert!(list_writer.try_add(i, i));
        }
    });

    let list_reader = list.clone();
    let removed_reader = Arc::clone(&removed);
    let reader = thread::spawn(move || {
        let mut local_removed = 0usize;
        // Keep draining until the writer has clearly finished and the list is empty; a
        // short spin between empty observations tolerates the writer being mid-insert.
        let mut consecutive_empty = 0;
        while consecutive_empty < 1_000 {
            if list_reader.try_remove_min().is_some() {
                local_removed += 1;
                consecutive_empty = 0;
            } else {
                consecutive_empty += 1;
                std::hint::spin_loop();
            }
        }
        removed_reader.fetch_add(local_removed, Ordering::Release);
    });

    writer.join().unwrap();
    reader.join().unwrap();

    // Drain whatever is left after the reader gave up waiting.
    let mut tail_removed = 0usize;
    while list.try_remove_min().is_some() {
        tail_removed += 1;
    }

    let total_removed = removed.load(Ordering::Acquire) + tail_removed;
    assert_eq!(total_removed as u64, TOTAL_ADDS);
    assert_eq!(list.get_count(), 0);
}

/// A key is inserted, then concurrently removed from one thread while another thread
/// repeatedly reinserts under the same key once the removal lands. At every observation
/// point the key's presence is consistent with some valid interleaving: never visible as
/// both present and gone in contradictory ways, and never duplicated.
#[test]
fn concurrent_remove_during_reinsert_never_duplicates_a_key() {
    const ROUNDS: usize = 2_000;
    const KEY: u64 = 42;

    let list = concurrent_list(100);
    assert!(list.try_add(KEY, 0));

    let (start_tx, start_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let list_remover = list.clone();
    let remover = thread::spawn(move || {
        for _ in 0..ROUNDS {
            start_rx.recv().unwrap();
            // Best-effort: the key may already have been removed by a previous round's
            // reinsertion racing ahead; either outcome is a legal interleaving.
            let _ = list_remover.try_remove(&KEY);
            done_tx.send(()).unwrap();
        }
    });

    for round in 0..ROUNDS {
        start_tx.send(()).unwrap();
        done_rx.recv().unwrap();
        // Reinsert unconditionally; if the remover's removal and this reinsertion raced,
        // exactly one of them determines the outcome, never both.
        let _ = list.try_add(KEY, round as u64);
        assert!(list.get_count() <= 1, "a key must never be duplicated under the uniqueness invariant");
    }

    remover.join().unwrap();
}
