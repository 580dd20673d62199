//! Runtime configuration.
//!
//! Resolved at [`initialize`](crate::runtime::Runtime::initialize) time
//! rather than compile time: unlike the teacher crate's size classes (baked
//! in by `build.rs` from a TOML file), cluster topology and memory ceilings
//! are inherently run-time properties of a PGAS job.

use std::env;

/// Default per-rank arena size for the bundled [`LocalCluster`](pgarray_transport::local::LocalCluster) backend.
pub const DEFAULT_ARENA_BYTES: usize = 64 * 1024 * 1024;
/// Default descriptor table capacity (matches the reference library's `MA_MAX_ARRAYS`-style ceiling).
pub const DEFAULT_TABLE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct RuntimeConfig {
    /// Bytes reserved for each rank's symmetric arena (local-transport backend only).
    pub arena_bytes: usize,
    /// Maximum number of simultaneously live array handles.
    pub table_capacity: usize,
    /// Per-process byte ceiling for array storage, if memory accounting is enabled.
    pub memory_limit: Option<i64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            arena_bytes: DEFAULT_ARENA_BYTES,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            memory_limit: None,
        }
    }
}

impl RuntimeConfig {
    /// Reads `PGARRAY_ARENA_BYTES` / `PGARRAY_TABLE_CAPACITY` / `PGARRAY_MEMORY_LIMIT`
    /// over the defaults; malformed values are ignored (default retained).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_usize("PGARRAY_ARENA_BYTES") {
            cfg.arena_bytes = v;
        }
        if let Some(v) = env_usize("PGARRAY_TABLE_CAPACITY") {
            cfg.table_capacity = v;
        }
        if let Ok(s) = env::var("PGARRAY_MEMORY_LIMIT") {
            if let Ok(v) = s.parse::<i64>() {
                cfg.memory_limit = Some(v);
            }
        }
        cfg
    }

    pub fn with_memory_limit(mut self, bytes: i64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}
