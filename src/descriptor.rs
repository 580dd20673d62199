//! Array descriptor table: the replicated bookkeeping structure every
//! process keeps one identical copy of (barring per-process pointer and
//! alignment fields) for every live array handle.

use pgarray_transport::ElemType;

use crate::error::GaError;

/// Maximum supported array rank, matching the reference library's ceiling.
pub const MAX_DIM: usize = 7;

/// Handles are offset below zero so the external handle space never
/// collides with zero/positive values a caller might use as a sentinel.
const GA_OFFSET: i32 = 1000;

pub(crate) fn slot_to_handle(slot: usize) -> i32 {
    -(slot as i32) - GA_OFFSET
}

pub(crate) fn handle_to_slot(handle: i32) -> Option<usize> {
    let slot = -(handle + GA_OFFSET);
    if slot >= 0 { Some(slot as usize) } else { None }
}

#[derive(Clone)]
pub struct ArrayDescriptor {
    pub name: String,
    pub element_type: ElemType,
    pub ndim: usize,
    pub dims: Vec<i64>,
    pub nblock: Vec<usize>,
    /// Per-dimension sorted block-start global indices (1-based).
    pub mapc: Vec<Vec<i64>>,
    /// `nblock[d] / dims[d]`, a seed hint for the owner search.
    pub scale: Vec<f64>,
    /// This process's owned patch: 1-based low corner.
    pub lo: Vec<i64>,
    /// This process's owned patch: extent per dimension (0 if it owns nothing).
    pub chunk: Vec<i64>,
    /// Every peer's base address in the symmetric allocation, indexed by rank.
    pub base_ptr: Vec<usize>,
    /// Byte offset applied at allocation time to satisfy typed-heap alignment.
    pub alloc_adjust: i64,
    /// This process's local byte footprint (product of `chunk[]` times elem size).
    pub size_bytes: i64,
}

impl ArrayDescriptor {
    pub fn elem_size(&self) -> usize {
        self.element_type.size()
    }

    /// Owned-element count for this process (0 for non-owning processes).
    pub fn local_elem_count(&self) -> i64 {
        self.chunk.iter().product()
    }
}

pub struct DescriptorTable {
    slots: Vec<Option<ArrayDescriptor>>,
}

impl DescriptorTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Finds the first free slot without reserving it.
    pub fn find_free_slot(&self) -> Result<usize, GaError> {
        self.slots
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| GaError::resource_exhausted("descriptor table is full"))
    }

    pub fn insert(&mut self, slot: usize, descriptor: ArrayDescriptor) -> i32 {
        self.slots[slot] = Some(descriptor);
        slot_to_handle(slot)
    }

    pub fn release(&mut self, slot: usize) {
        self.slots[slot] = None;
    }

    pub fn get(&self, handle: i32) -> Result<&ArrayDescriptor, GaError> {
        let slot = handle_to_slot(handle).ok_or_else(|| GaError::invalid_handle(handle))?;
        self.slots
            .get(slot)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| GaError::invalid_handle(handle))
    }

    pub fn get_mut(&mut self, handle: i32) -> Result<&mut ArrayDescriptor, GaError> {
        let slot = handle_to_slot(handle).ok_or_else(|| GaError::invalid_handle(handle))?;
        self.slots
            .get_mut(slot)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| GaError::invalid_handle(handle))
    }

    /// `destroy` accepts an inactive handle silently (returns `false`, not an error).
    pub fn try_take(&mut self, handle: i32) -> Option<ArrayDescriptor> {
        let slot = handle_to_slot(handle)?;
        self.slots.get_mut(slot)?.take()
    }

    pub fn active_handles(&self) -> Vec<i32> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, d)| d.as_ref().map(|_| slot_to_handle(slot)))
            .collect()
    }
}
