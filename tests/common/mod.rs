//! Shared fixture for whole-cluster integration scenarios.
//!
//! Mirrors the teacher's `tests/stress.rs` pattern of a fixture function
//! every test reuses: spawn one thread per simulated rank, run a per-rank
//! closure against its own `Runtime`, join, and hand every result back to
//! the caller to assert on.

use pgarray::{Runtime, RuntimeConfig};
use pgarray_transport::local::LocalCluster;

pub fn run_cluster<F, R>(nproc: usize, arena_bytes: usize, body: F) -> Vec<R>
where
    F: Fn(&mut Runtime<pgarray_transport::local::LocalRank>, usize) -> R + Send + Sync + Clone + 'static,
    R: Send + 'static,
{
    run_cluster_with_config(nproc, RuntimeConfig { arena_bytes, ..RuntimeConfig::default() }, body)
}

pub fn run_cluster_with_config<F, R>(nproc: usize, config: RuntimeConfig, body: F) -> Vec<R>
where
    F: Fn(&mut Runtime<pgarray_transport::local::LocalRank>, usize) -> R + Send + Sync + Clone + 'static,
    R: Send + 'static,
{
    let ranks = LocalCluster::new(nproc, config.arena_bytes);
    let handles: Vec<_> = ranks
        .into_iter()
        .map(|rank| {
            let body = body.clone();
            std::thread::spawn(move || {
                let me = pgarray_transport::ProcessGroup::rank(&rank);
                let mut rt = Runtime::initialize_with_config(rank, config).expect("initialize");
                let result = body(&mut rt, me);
                rt.terminate();
                result
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().expect("rank thread panicked")).collect()
}
