//! Fence/sync tracking and cluster mutexes (C7).

use pgarray_transport::{OneSided, ProcessGroup};

use crate::error::{GaError, GaResult};

pub fn init_fence(fence_depth: &mut u32) {
    *fence_depth += 1;
}

pub fn fence<T: OneSided>(transport: &T, fence_depth: &mut u32, fence_targets: &mut [bool]) -> GaResult<()> {
    if *fence_depth == 0 {
        return Err(GaError::usage("fence called without a matching init_fence"));
    }
    *fence_depth -= 1;
    for (target, pending) in fence_targets.iter_mut().enumerate() {
        if *pending {
            transport.fence(target);
            *pending = false;
        }
    }
    Ok(())
}

pub fn sync<T: OneSided + ProcessGroup>(transport: &T, fence_targets: &mut [bool]) {
    transport.all_fence();
    for pending in fence_targets.iter_mut() {
        *pending = false;
    }
    transport.barrier();
}

/// Mutexes are partitioned across ranks in chunks of `ceil(n/nproc)`;
/// returns the chunk size to remember for later `lock`/`unlock` calls.
pub fn create_mutexes<T: OneSided + ProcessGroup>(transport: &T, n: usize) -> GaResult<usize> {
    let nproc = transport.size();
    let chunk = n.div_ceil(nproc);
    transport
        .create_mutexes(chunk)
        .map_err(|e| GaError::resource_exhausted(e.to_string()))?;
    Ok(chunk)
}

pub fn destroy_mutexes<T: OneSided>(transport: &T) {
    transport.destroy_mutexes();
}

fn split(chunk: usize, mutex_id: usize) -> (usize, usize) {
    (mutex_id / chunk, mutex_id % chunk)
}

pub fn lock<T: OneSided>(transport: &T, chunk: usize, mutex_id: usize) {
    let (owner, local) = split(chunk, mutex_id);
    transport.lock(owner, local);
}

pub fn unlock<T: OneSided>(transport: &T, chunk: usize, mutex_id: usize) {
    let (owner, local) = split(chunk, mutex_id);
    transport.unlock(owner, local);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_without_init_is_usage_error() {
        let mut depth = 0u32;
        let mut targets = vec![false; 2];
        let ranks = pgarray_transport::local::LocalCluster::new(2, 1024);
        assert!(fence(&ranks[0], &mut depth, &mut targets).is_err());
    }

    #[test]
    fn init_then_fence_balances_depth() {
        let mut depth = 0u32;
        init_fence(&mut depth);
        assert_eq!(depth, 1);
        let mut targets = vec![false; 2];
        let ranks = pgarray_transport::local::LocalCluster::new(2, 1024);
        fence(&ranks[0], &mut depth, &mut targets).unwrap();
        assert_eq!(depth, 0);
    }
}
