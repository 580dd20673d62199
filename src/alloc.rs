//! Symmetric allocation with typed-heap alignment (§4.2).
//!
//! The transport's `symmetric_alloc` guarantees every peer gets a base
//! address for an equal-size region, but not that the remainder of that
//! address modulo `elem_size` is the same across peers relative to the
//! typed base. This adjusts each peer's base by a per-peer offset, found
//! through a sum-reduction in which every peer contributes zero except at
//! its own index.

use pgarray_transport::{ElemType, OneSided, ProcessGroup};

use crate::error::GaError;
use crate::typed_heap::TypedHeap;

pub struct Allocation {
    /// Every peer's aligned base address, indexed by rank.
    pub base_ptr: Vec<usize>,
    /// This process's raw (pre-adjustment) base, needed to free the region.
    pub raw_ptr: usize,
    /// Byte offset applied to this process's own base.
    pub adjust: i64,
}

pub fn allocate_aligned<T: OneSided + ProcessGroup>(
    transport: &T,
    element_type: ElemType,
    bytes: usize,
    typed_heap: &TypedHeap,
) -> Result<Allocation, GaError> {
    let elem_size = element_type.size();
    let me = transport.rank();
    let nproc = transport.size();

    let raw_bases = transport
        .symmetric_alloc(bytes + elem_size)
        .map_err(|e| GaError::resource_exhausted(e.to_string()))?;

    let remainder = typed_heap.alignment_remainder(element_type, raw_bases[me]);
    let my_adjust: i64 = if remainder == 0 { 0 } else { (elem_size - remainder) as i64 };

    let mut contributions = vec![0i64; nproc];
    contributions[me] = my_adjust;
    transport.igop_sum(&mut contributions);

    let base_ptr: Vec<usize> = raw_bases
        .iter()
        .zip(&contributions)
        .map(|(&raw, &adj)| (raw as i64 + adj) as usize)
        .collect();

    for (rank, &adj) in contributions.iter().enumerate() {
        let base = base_ptr[rank];
        let rem = base.abs_diff(typed_heap.typed_base(element_type)) % elem_size;
        if rem != 0 {
            return Err(GaError::internal(format!(
                "alignment reduction failed for rank {rank} (adjust {adj}, remainder {rem})"
            )));
        }
    }

    Ok(Allocation {
        base_ptr,
        raw_ptr: raw_bases[me],
        adjust: my_adjust,
    })
}

pub fn free(transport: &impl OneSided, raw_ptr: usize) {
    transport.symmetric_free(raw_ptr);
}
