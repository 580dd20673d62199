//! Public API surface: one [`Runtime`] instance per process.
//!
//! A `Runtime` is deliberately an owned instance rather than a process-wide
//! singleton (§9 Design Notes raises this as an open choice) — the bundled
//! test harness runs every simulated rank as its own OS thread within one
//! real process, so per-rank state has to live in something a thread can
//! own outright.

use pgarray_transport::{ElemType, OneSided, ProcessGroup, Scalar};

use crate::accounting::{Accounting, Snapshot};
use crate::config::RuntimeConfig;
use crate::descriptor::DescriptorTable;
use crate::distribution::unravel;
use crate::error::{GaError, GaResult, OrAbort};
use crate::rng::SplitMix64;
use crate::typed_heap::TypedHeap;
use crate::{access, fence, lifecycle};

pub struct Runtime<T: OneSided + ProcessGroup> {
    transport: T,
    config: RuntimeConfig,
    table: DescriptorTable,
    accounting: Accounting,
    typed_heap: TypedHeap,
    memory_remaining: Option<i64>,
    rng: SplitMix64,
    fence_depth: u32,
    fence_targets: Vec<bool>,
    mutex_chunk: Option<usize>,
    /// Registered once before any array creation (§9); currently validated
    /// and stored but not yet consulted by the bundled in-process transport,
    /// which has no topology of its own to route around.
    proc_list: Option<Vec<usize>>,
}

impl<T: OneSided + ProcessGroup> Runtime<T> {
    pub fn initialize(transport: T) -> GaResult<Self> {
        Self::initialize_with_config(transport, RuntimeConfig::default())
    }

    pub fn initialize_with_memory_limit(transport: T, bytes: i64) -> GaResult<Self> {
        Self::initialize_with_config(transport, RuntimeConfig::default().with_memory_limit(bytes))
    }

    pub fn initialize_with_config(transport: T, config: RuntimeConfig) -> GaResult<Self> {
        log::info!(
            "pgarray: initializing rank {} of {}",
            transport.rank(),
            transport.size()
        );
        let typed_heap = TypedHeap::init(&transport, transport.rank())?;
        let fence_targets = vec![false; transport.size()];
        let rng = SplitMix64::seeded(transport.rank() as u64);
        Ok(Self {
            table: DescriptorTable::new(config.table_capacity),
            accounting: Accounting::new(),
            memory_remaining: config.memory_limit,
            fence_depth: 0,
            fence_targets,
            mutex_chunk: None,
            proc_list: None,
            rng,
            typed_heap,
            config,
            transport,
        })
    }

    pub fn terminate(&mut self) {
        log::info!("pgarray: terminating rank {}", self.transport.rank());
        lifecycle::destroy_all(
            &self.transport,
            &mut self.table,
            &self.accounting,
            &mut self.memory_remaining,
            self.transport.rank(),
        );
    }

    pub fn nodeid(&self) -> usize {
        self.transport.rank()
    }

    pub fn nnodes(&self) -> usize {
        self.transport.size()
    }

    pub fn uses_ma(&self) -> bool {
        true
    }

    pub fn memory_limited(&self) -> bool {
        self.config.memory_limit.is_some()
    }

    pub fn memory_avail(&self) -> Option<i64> {
        self.memory_remaining
    }

    /// Bytes currently held by this rank's live arrays (§6). A rejected
    /// `create` never touches `current_local_bytes`, so this reads 0 when no
    /// array survived creation.
    pub fn inquire_memory(&self) -> i64 {
        self.accounting.snapshot().current_local_bytes as i64
    }

    pub fn accounting(&self) -> Snapshot {
        self.accounting.snapshot()
    }

    pub fn register_proc_list(&mut self, list: Vec<usize>) -> GaResult<()> {
        if list.len() != self.transport.size() {
            return Err(GaError::invalid_argument("proc_list length must equal nnodes"));
        }
        let mut seen = vec![false; list.len()];
        for &p in &list {
            if p >= list.len() || std::mem::replace(&mut seen[p], true) {
                return Err(GaError::invalid_argument("proc_list must be a permutation of 0..nnodes"));
            }
        }
        self.proc_list = Some(list);
        Ok(())
    }

    // ---- Lifecycle (C6) ----

    pub fn create(&mut self, element_type: ElemType, dims: Vec<i64>, name: impl Into<String>) -> GaResult<i32> {
        self.create_with_chunk(element_type, dims, name, None)
    }

    pub fn create_with_chunk(
        &mut self,
        element_type: ElemType,
        dims: Vec<i64>,
        name: impl Into<String>,
        chunk_hint: Option<Vec<i64>>,
    ) -> GaResult<i32> {
        let created = lifecycle::create_regular(
            &self.transport,
            &mut self.table,
            &self.accounting,
            &self.typed_heap,
            &mut self.memory_remaining,
            element_type,
            dims,
            name.into(),
            chunk_hint,
        )?;
        Ok(created.handle)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_irregular(
        &mut self,
        element_type: ElemType,
        dims: Vec<i64>,
        name: impl Into<String>,
        mapc: Vec<Vec<i64>>,
        nblock: Vec<usize>,
    ) -> GaResult<i32> {
        let created = lifecycle::create_irregular(
            &self.transport,
            &mut self.table,
            &self.accounting,
            &self.typed_heap,
            &mut self.memory_remaining,
            element_type,
            dims,
            name.into(),
            mapc,
            nblock,
        )?;
        Ok(created.handle)
    }

    pub fn duplicate(&mut self, handle: i32, new_name: impl Into<String>) -> GaResult<i32> {
        let created = lifecycle::duplicate(
            &self.transport,
            &mut self.table,
            &self.accounting,
            &self.typed_heap,
            &mut self.memory_remaining,
            handle,
            new_name.into(),
        )?;
        Ok(created.handle)
    }

    pub fn destroy(&mut self, handle: i32) -> bool {
        lifecycle::destroy(
            &self.transport,
            &mut self.table,
            &self.accounting,
            &mut self.memory_remaining,
            self.transport.rank(),
            handle,
        )
        .is_some()
    }

    // ---- Inquiry (§6) ----

    pub fn inquire(&self, handle: i32) -> GaResult<(ElemType, usize, Vec<i64>)> {
        let d = self.table.get(handle)?;
        Ok((d.element_type, d.ndim, d.dims.clone()))
    }

    pub fn distribution(&self, handle: i32, proc: usize) -> GaResult<(Vec<i64>, Vec<i64>)> {
        let d = self.table.get(handle)?;
        let (lo, chunk) = crate::distribution::chunk_for_rank(&d.dims, &d.nblock, &d.mapc, proc);
        let hi: Vec<i64> = lo.iter().zip(&chunk).map(|(&l, &c)| l + c - 1).collect();
        Ok((lo, hi))
    }

    pub fn proc_topology(&self, handle: i32, proc: usize) -> GaResult<Vec<usize>> {
        let d = self.table.get(handle)?;
        Ok(unravel(proc, &d.nblock))
    }

    pub fn locate(&self, handle: i32, subscript: &[i64]) -> GaResult<usize> {
        let d = self.table.get(handle)?;
        crate::distribution::locate(d, subscript).ok_or_else(|| GaError::invalid_argument(format!("subscript {subscript:?} out of range")))
    }

    pub fn locate_region(&self, handle: i32, lo: &[i64], hi: &[i64]) -> GaResult<Vec<crate::distribution::Rectangle>> {
        let d = self.table.get(handle)?;
        Ok(crate::distribution::locate_region(d, lo, hi))
    }

    // ---- One-sided access (C5) ----

    pub fn put(&mut self, handle: i32, lo: &[i64], hi: &[i64], src: *const u8, src_ld: &[i64]) {
        let desc = self.table.get(handle).or_abort("put");
        access::put(
            &self.transport,
            desc,
            &mut self.fence_targets,
            self.fence_depth,
            lo,
            hi,
            src,
            src_ld,
            &mut self.rng,
            &self.accounting,
        )
        .or_abort("put");
    }

    pub fn get(&mut self, handle: i32, lo: &[i64], hi: &[i64], dst: *mut u8, dst_ld: &[i64]) {
        let desc = self.table.get(handle).or_abort("get");
        access::get(&self.transport, desc, lo, hi, dst, dst_ld, &mut self.rng, &self.accounting).or_abort("get");
    }

    pub fn acc(&mut self, handle: i32, lo: &[i64], hi: &[i64], src: *const u8, src_ld: &[i64], scale: Scalar) {
        let desc = self.table.get(handle).or_abort("acc");
        access::acc(
            &self.transport,
            desc,
            &mut self.fence_targets,
            self.fence_depth,
            lo,
            hi,
            src,
            src_ld,
            scale,
            &mut self.rng,
            &self.accounting,
        )
        .or_abort("acc");
    }

    pub fn scatter(&mut self, handle: i32, values: *const u8, subscripts: &[i64], nv: usize) {
        let desc = self.table.get(handle).or_abort("scatter");
        access::scatter(
            &self.transport,
            desc,
            &mut self.fence_targets,
            self.fence_depth,
            values,
            subscripts,
            nv,
            &self.accounting,
        )
        .or_abort("scatter");
    }

    pub fn scatter_acc(&mut self, handle: i32, values: *const u8, subscripts: &[i64], nv: usize, scale: Scalar) {
        let desc = self.table.get(handle).or_abort("scatter_acc");
        access::scatter_acc(
            &self.transport,
            desc,
            &mut self.fence_targets,
            self.fence_depth,
            values,
            subscripts,
            nv,
            scale,
            &self.accounting,
        )
        .or_abort("scatter_acc");
    }

    pub fn gather(&mut self, handle: i32, values: *mut u8, subscripts: &[i64], nv: usize) {
        let desc = self.table.get(handle).or_abort("gather");
        access::gather(&self.transport, desc, values, subscripts, nv, &self.accounting).or_abort("gather");
    }

    pub fn read_inc(&mut self, handle: i32, subscripts: &[i64], inc: i64) -> i64 {
        let desc = self.table.get(handle).or_abort("read_inc");
        access::read_inc(&self.transport, desc, subscripts, inc, &self.accounting).or_abort("read_inc")
    }

    pub fn fill(&mut self, handle: i32, value: Scalar) {
        let desc = self.table.get(handle).or_abort("fill");
        access::fill(desc, self.transport.rank(), value).or_abort("fill");
    }

    pub fn access(&self, handle: i32, lo: &[i64], hi: &[i64]) -> (usize, Vec<i64>) {
        let desc = self.table.get(handle).or_abort("access");
        access::access(desc, self.transport.rank(), lo, hi).or_abort("access")
    }

    pub fn release(&self, _handle: i32) {}

    // ---- Fence & sync (C7) ----

    pub fn init_fence(&mut self) {
        fence::init_fence(&mut self.fence_depth);
    }

    pub fn fence(&mut self) {
        fence::fence(&self.transport, &mut self.fence_depth, &mut self.fence_targets).or_abort("fence");
    }

    pub fn sync(&mut self) {
        fence::sync(&self.transport, &mut self.fence_targets);
    }

    pub fn create_mutexes(&mut self, n: usize) {
        self.mutex_chunk = Some(fence::create_mutexes(&self.transport, n).or_abort("create_mutexes"));
    }

    pub fn destroy_mutexes(&mut self) {
        fence::destroy_mutexes(&self.transport);
        self.mutex_chunk = None;
    }

    pub fn lock(&self, mutex_id: usize) {
        let chunk = self.mutex_chunk.expect("create_mutexes not called");
        fence::lock(&self.transport, chunk, mutex_id);
    }

    pub fn unlock(&self, mutex_id: usize) {
        let chunk = self.mutex_chunk.expect("create_mutexes not called");
        fence::unlock(&self.transport, chunk, mutex_id);
    }
}
