//! Per-process operation counters.
//!
//! Mirrors the teacher crate's `Stats`/`Snapshot` split: plain `u64` fields
//! bumped with `Relaxed` atomics (observational only, never used for
//! synchronization), read out as an immutable [`Snapshot`]. Unlike the
//! teacher these counters live on the per-rank [`Runtime`](crate::runtime::Runtime),
//! not in a single process-wide `static`, since a `Runtime` is itself an
//! instance rather than a global (see the Design Notes on global state).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Accounting {
    pub put_count: AtomicU64,
    pub get_count: AtomicU64,
    pub acc_count: AtomicU64,
    pub scatter_count: AtomicU64,
    pub gather_count: AtomicU64,
    pub read_inc_count: AtomicU64,
    pub bytes_put: AtomicU64,
    pub bytes_get: AtomicU64,
    pub bytes_acc: AtomicU64,
    pub arrays_created: AtomicU64,
    pub arrays_destroyed: AtomicU64,
    pub current_local_bytes: AtomicU64,
    pub peak_local_bytes: AtomicU64,
}

impl Accounting {
    pub const fn new() -> Self {
        Self {
            put_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            acc_count: AtomicU64::new(0),
            scatter_count: AtomicU64::new(0),
            gather_count: AtomicU64::new(0),
            read_inc_count: AtomicU64::new(0),
            bytes_put: AtomicU64::new(0),
            bytes_get: AtomicU64::new(0),
            bytes_acc: AtomicU64::new(0),
            arrays_created: AtomicU64::new(0),
            arrays_destroyed: AtomicU64::new(0),
            current_local_bytes: AtomicU64::new(0),
            peak_local_bytes: AtomicU64::new(0),
        }
    }

    pub(crate) fn note_alloc(&self, bytes: u64) {
        self.arrays_created.fetch_add(1, Ordering::Relaxed);
        let cur = self.current_local_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak_local_bytes.fetch_max(cur, Ordering::Relaxed);
    }

    pub(crate) fn note_free(&self, bytes: u64) {
        self.arrays_destroyed.fetch_add(1, Ordering::Relaxed);
        self.current_local_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            put_count: self.put_count.load(Ordering::Relaxed),
            get_count: self.get_count.load(Ordering::Relaxed),
            acc_count: self.acc_count.load(Ordering::Relaxed),
            scatter_count: self.scatter_count.load(Ordering::Relaxed),
            gather_count: self.gather_count.load(Ordering::Relaxed),
            read_inc_count: self.read_inc_count.load(Ordering::Relaxed),
            bytes_put: self.bytes_put.load(Ordering::Relaxed),
            bytes_get: self.bytes_get.load(Ordering::Relaxed),
            bytes_acc: self.bytes_acc.load(Ordering::Relaxed),
            arrays_created: self.arrays_created.load(Ordering::Relaxed),
            arrays_destroyed: self.arrays_destroyed.load(Ordering::Relaxed),
            current_local_bytes: self.current_local_bytes.load(Ordering::Relaxed),
            peak_local_bytes: self.peak_local_bytes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time, non-atomic-as-a-whole copy of the counters. Individual
/// fields are each loaded atomically but the snapshot is not globally
/// consistent with itself under concurrent mutation from other threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub put_count: u64,
    pub get_count: u64,
    pub acc_count: u64,
    pub scatter_count: u64,
    pub gather_count: u64,
    pub read_inc_count: u64,
    pub bytes_put: u64,
    pub bytes_get: u64,
    pub bytes_acc: u64,
    pub arrays_created: u64,
    pub arrays_destroyed: u64,
    pub current_local_bytes: u64,
    pub peak_local_bytes: u64,
}
