//! In-process simulation of a cluster of cooperating ranks.
//!
//! Each simulated rank owns a fixed-size, bump-allocated arena. One-sided
//! operations are literal pointer arithmetic into the target rank's arena,
//! guarded by a per-arena spinlock so accumulate and fetch-and-add are
//! atomic with respect to other initiators. Collectives (barrier, the
//! address exchange inside `symmetric_alloc`, small integer reductions) are
//! built on [`Rendezvous`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::rendezvous::Rendezvous;
use crate::sync::{SpinLock, SpinMutex};
use crate::{ElemType, OneSided, ProcessGroup, Scalar, TransportError, VectorPair};

const ALIGN: usize = 16;

struct Arena {
    mem: Box<[u8]>,
    bump: AtomicUsize,
    write_lock: SpinLock,
    mutexes: SpinMutex<Vec<SpinLock>>,
}

impl Arena {
    fn new(bytes: usize) -> Self {
        Self {
            mem: vec![0u8; bytes].into_boxed_slice(),
            bump: AtomicUsize::new(0),
            write_lock: SpinLock::new(),
            mutexes: SpinMutex::new(Vec::new()),
        }
    }

    fn base_addr(&self) -> usize {
        self.mem.as_ptr() as usize
    }

    fn try_bump(&self, bytes: usize) -> Option<usize> {
        self.write_lock.lock();
        let cur = self.bump.load(Ordering::Relaxed);
        let aligned = cur.div_ceil(ALIGN) * ALIGN;
        let end = aligned.checked_add(bytes)?;
        let result = if end <= self.mem.len() {
            self.bump.store(end, Ordering::Relaxed);
            Some(self.base_addr() + aligned)
        } else {
            None
        };
        self.write_lock.unlock();
        result
    }

    fn rollback(&self, base: usize, bytes: usize) {
        self.write_lock.lock();
        let offset = base - self.base_addr();
        if offset + bytes == self.bump.load(Ordering::Relaxed) {
            self.bump.store(offset, Ordering::Relaxed);
        }
        self.write_lock.unlock();
    }
}

/// A handle to one simulated rank within a [`LocalCluster`]. Implements both
/// [`OneSided`] and [`ProcessGroup`]; clone freely, all clones share state.
#[derive(Clone)]
pub struct LocalRank {
    inner: Arc<ClusterInner>,
    rank: usize,
}

struct ClusterInner {
    arenas: Vec<Arena>,
    barrier: Rendezvous<()>,
    alloc_rv: Rendezvous<usize>,
    igop_rv: Rendezvous<Vec<i64>>,
}

/// Builds a cluster of `n` ranks, each with an arena of `arena_bytes`.
/// Returns one [`LocalRank`] handle per rank; hand each to its own thread.
pub struct LocalCluster;

impl LocalCluster {
    pub fn new(n: usize, arena_bytes: usize) -> Vec<LocalRank> {
        let inner = Arc::new(ClusterInner {
            arenas: (0..n).map(|_| Arena::new(arena_bytes)).collect(),
            barrier: Rendezvous::new(n),
            alloc_rv: Rendezvous::new(n),
            igop_rv: Rendezvous::new(n),
        });
        (0..n)
            .map(|rank| LocalRank {
                inner: Arc::clone(&inner),
                rank,
            })
            .collect()
    }
}

fn strided_copy(dst: *mut u8, dst_stride: &[usize], src: *const u8, src_stride: &[usize], count: &[usize]) {
    if count.len() == 1 {
        unsafe { std::ptr::copy_nonoverlapping(src, dst, count[0]) };
        return;
    }
    let dim = count.len() - 1;
    for i in 0..count[dim] {
        let d = unsafe { dst.add(i * dst_stride[dim]) };
        let s = unsafe { src.add(i * src_stride[dim]) };
        strided_copy(d, dst_stride, s, src_stride, &count[..dim]);
    }
}

unsafe fn apply_acc_elem(op: ElemType, scale: Scalar, dst: *mut u8, src: *const u8) {
    match (op, scale) {
        (ElemType::I64, Scalar::I64(a)) => unsafe {
            let s = std::ptr::read_unaligned(src as *const i64);
            let d = std::ptr::read_unaligned(dst as *const i64);
            std::ptr::write_unaligned(dst as *mut i64, d + a * s);
        },
        (ElemType::F64, Scalar::F64(a)) => unsafe {
            let s = std::ptr::read_unaligned(src as *const f64);
            let d = std::ptr::read_unaligned(dst as *const f64);
            std::ptr::write_unaligned(dst as *mut f64, d + a * s);
        },
        (ElemType::C128, Scalar::C128(a)) => unsafe {
            let s = std::ptr::read_unaligned(src as *const [f64; 2]);
            let d = std::ptr::read_unaligned(dst as *const [f64; 2]);
            let re = d[0] + (a[0] * s[0] - a[1] * s[1]);
            let im = d[1] + (a[0] * s[1] + a[1] * s[0]);
            std::ptr::write_unaligned(dst as *mut [f64; 2], [re, im]);
        },
        _ => panic!("accumulate op/scale type mismatch"),
    }
}

fn strided_acc(
    op: ElemType,
    scale: Scalar,
    dst: *mut u8,
    dst_stride: &[usize],
    src: *const u8,
    src_stride: &[usize],
    count: &[usize],
) {
    if count.len() == 1 {
        let elem_size = op.size();
        let n = count[0] / elem_size;
        for e in 0..n {
            unsafe {
                apply_acc_elem(op, scale, dst.add(e * elem_size), src.add(e * elem_size));
            }
        }
        return;
    }
    let dim = count.len() - 1;
    for i in 0..count[dim] {
        let d = unsafe { dst.add(i * dst_stride[dim]) };
        let s = unsafe { src.add(i * src_stride[dim]) };
        strided_acc(op, scale, d, dst_stride, s, src_stride, &count[..dim]);
    }
}

impl LocalRank {
    fn check_target(&self, target: usize) -> Result<(), TransportError> {
        if target >= self.inner.arenas.len() {
            return Err(TransportError::InvalidTarget {
                target,
                size: self.inner.arenas.len(),
            });
        }
        Ok(())
    }
}

impl OneSided for LocalRank {
    fn put_strided(
        &self,
        target: usize,
        dst_ptr: usize,
        dst_stride: &[usize],
        src_ptr: *const u8,
        src_stride: &[usize],
        count: &[usize],
    ) -> Result<(), TransportError> {
        self.check_target(target)?;
        let arena = &self.inner.arenas[target];
        arena.write_lock.lock();
        strided_copy(dst_ptr as *mut u8, dst_stride, src_ptr, src_stride, count);
        arena.write_lock.unlock();
        Ok(())
    }

    fn get_strided(
        &self,
        target: usize,
        dst_ptr: *mut u8,
        dst_stride: &[usize],
        src_ptr: usize,
        src_stride: &[usize],
        count: &[usize],
    ) -> Result<(), TransportError> {
        self.check_target(target)?;
        let arena = &self.inner.arenas[target];
        arena.write_lock.lock();
        strided_copy(dst_ptr, dst_stride, src_ptr as *const u8, src_stride, count);
        arena.write_lock.unlock();
        Ok(())
    }

    fn acc_strided(
        &self,
        target: usize,
        op: ElemType,
        scale: Scalar,
        dst_ptr: usize,
        dst_stride: &[usize],
        src_ptr: *const u8,
        src_stride: &[usize],
        count: &[usize],
    ) -> Result<(), TransportError> {
        self.check_target(target)?;
        let arena = &self.inner.arenas[target];
        arena.write_lock.lock();
        strided_acc(op, scale, dst_ptr as *mut u8, dst_stride, src_ptr, src_stride, count);
        arena.write_lock.unlock();
        Ok(())
    }

    fn put_vector(&self, target: usize, pairs: &[VectorPair], elem_bytes: usize) -> Result<(), TransportError> {
        self.check_target(target)?;
        let arena = &self.inner.arenas[target];
        arena.write_lock.lock();
        for p in pairs {
            unsafe { std::ptr::copy_nonoverlapping(p.src, p.dst, elem_bytes) };
        }
        arena.write_lock.unlock();
        Ok(())
    }

    fn get_vector(&self, target: usize, pairs: &[VectorPair], elem_bytes: usize) -> Result<(), TransportError> {
        self.put_vector(target, pairs, elem_bytes)
    }

    fn acc_vector(
        &self,
        target: usize,
        op: ElemType,
        scale: Scalar,
        pairs: &[VectorPair],
        elem_bytes: usize,
    ) -> Result<(), TransportError> {
        self.check_target(target)?;
        let arena = &self.inner.arenas[target];
        arena.write_lock.lock();
        for p in pairs {
            debug_assert_eq!(elem_bytes, op.size());
            unsafe { apply_acc_elem(op, scale, p.dst, p.src) };
        }
        arena.write_lock.unlock();
        Ok(())
    }

    fn fetch_and_add_i64(&self, target: usize, remote_ptr: usize, increment: i64) -> Result<i64, TransportError> {
        self.check_target(target)?;
        let arena = &self.inner.arenas[target];
        arena.write_lock.lock();
        let ptr = remote_ptr as *mut i64;
        let old = unsafe { std::ptr::read_unaligned(ptr) };
        unsafe { std::ptr::write_unaligned(ptr, old + increment) };
        arena.write_lock.unlock();
        Ok(old)
    }

    fn fence(&self, _target: usize) {}
    fn all_fence(&self) {}

    fn symmetric_alloc(&self, bytes: usize) -> Result<Vec<usize>, TransportError> {
        let my_arena = &self.inner.arenas[self.rank];
        let local_base = my_arena.try_bump(bytes);
        let sentinel = usize::MAX;
        let payload = local_base.unwrap_or(sentinel);
        let all = self.inner.alloc_rv.wait(self.rank, payload);
        if all.iter().any(|&v| v == sentinel) {
            if let Some(base) = local_base {
                my_arena.rollback(base, bytes);
            }
            return Err(TransportError::OutOfMemory { requested: bytes });
        }
        Ok(all)
    }

    fn symmetric_free(&self, _raw_ptr: usize) {
        // Bump arenas never reclaim individual regions; freed bytes are
        // recovered only when the whole arena is dropped.
    }

    fn create_mutexes(&self, n_local: usize) -> Result<(), TransportError> {
        let mut guard = self.inner.arenas[self.rank].mutexes.lock();
        *guard = (0..n_local).map(|_| SpinLock::new()).collect();
        drop(guard);
        self.barrier();
        Ok(())
    }

    fn destroy_mutexes(&self) {
        self.inner.arenas[self.rank].mutexes.lock().clear();
        self.barrier();
    }

    fn lock(&self, target: usize, mutex_id: usize) {
        let guard = self.inner.arenas[target].mutexes.lock();
        guard[mutex_id].lock();
    }

    fn unlock(&self, target: usize, mutex_id: usize) {
        let guard = self.inner.arenas[target].mutexes.lock();
        guard[mutex_id].unlock();
    }
}

impl ProcessGroup for LocalRank {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.inner.arenas.len()
    }

    fn barrier(&self) {
        self.inner.barrier.wait(self.rank, ());
    }

    fn igop_sum(&self, values: &mut [i64]) {
        let all = self.inner.igop_rv.wait(self.rank, values.to_vec());
        for out in values.iter_mut() {
            *out = 0;
        }
        for contribution in &all {
            for (out, v) in values.iter_mut().zip(contribution) {
                *out += v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collective_alloc(ranks: &[LocalRank], bytes: usize) -> Vec<usize> {
        let handles: Vec<_> = ranks
            .iter()
            .cloned()
            .map(|r| std::thread::spawn(move || r.symmetric_alloc(bytes).unwrap()))
            .collect();
        let mut result = None;
        for h in handles {
            result = Some(h.join().unwrap());
        }
        result.unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let ranks = LocalCluster::new(2, 4096);
        let bases = collective_alloc(&ranks, 64);
        let src = 42i64;
        ranks[0]
            .put_strided(1, bases[1], &[0], &src as *const i64 as *const u8, &[0], &[8])
            .unwrap();
        let mut dst = 0i64;
        ranks[0]
            .get_strided(1, &mut dst as *mut i64 as *mut u8, &[0], bases[1], &[0], &[8])
            .unwrap();
        assert_eq!(dst, 42);
    }

    #[test]
    fn fetch_and_add_is_total_under_contention() {
        let ranks = LocalCluster::new(4, 4096);
        let bases = collective_alloc(&ranks, 8);
        let target_addr = bases[0];
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|r| std::thread::spawn(move || r.fetch_and_add_i64(0, target_addr, 1).unwrap()))
            .collect();
        let mut results: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }

    #[test]
    fn barrier_releases_all_threads() {
        let ranks = LocalCluster::new(3, 1024);
        let handles: Vec<_> = ranks.into_iter().map(|r| std::thread::spawn(move || r.barrier())).collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
