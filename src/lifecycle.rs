//! Collective creation, duplication, destruction, and memory accounting (C6).

use pgarray_transport::{ElemType, OneSided, ProcessGroup};

use crate::accounting::Accounting;
use crate::alloc::{self, Allocation};
use crate::descriptor::{ArrayDescriptor, DescriptorTable, MAX_DIM};
use crate::distribution::{chunk_for_rank, compute_mapc, compute_nblock, compute_scale, max_local_bytes};
use crate::error::{GaError, GaResult};
use crate::typed_heap::TypedHeap;

fn validate_dims(dims: &[i64]) -> GaResult<()> {
    if dims.is_empty() || dims.len() > MAX_DIM {
        return Err(GaError::invalid_argument(format!(
            "ndim must be in 1..={MAX_DIM}, got {}",
            dims.len()
        )));
    }
    if let Some(d) = dims.iter().position(|&d| d <= 0) {
        return Err(GaError::invalid_argument(format!("dims[{d}] must be positive")));
    }
    Ok(())
}

fn validate_mapc(dims: &[i64], nblock: &[usize], mapc: &[Vec<i64>]) -> GaResult<()> {
    if nblock.len() != dims.len() || mapc.len() != dims.len() {
        return Err(GaError::invalid_argument("nblock/mapc length must equal ndim"));
    }
    for d in 0..dims.len() {
        if mapc[d].len() != nblock[d] {
            return Err(GaError::invalid_argument(format!("mapc[{d}] length must equal nblock[{d}]")));
        }
        if mapc[d].first() != Some(&1) {
            return Err(GaError::invalid_argument(format!("mapc[{d}] must start at 1")));
        }
        if !mapc[d].windows(2).all(|w| w[0] < w[1]) {
            return Err(GaError::invalid_argument(format!("mapc[{d}] must be strictly increasing")));
        }
        if *mapc[d].last().unwrap() > dims[d] {
            return Err(GaError::invalid_argument(format!("mapc[{d}] exceeds dims[{d}]")));
        }
    }
    Ok(())
}

/// Result of a successful collective creation: the handle plus the raw
/// (pre-alignment) pointer the caller must keep for [`destroy`].
pub struct Created {
    pub handle: i32,
    pub raw_ptr: usize,
}

pub fn create_regular<T: OneSided + ProcessGroup>(
    transport: &T,
    table: &mut DescriptorTable,
    accounting: &Accounting,
    typed_heap: &TypedHeap,
    memory_remaining: &mut Option<i64>,
    element_type: ElemType,
    dims: Vec<i64>,
    name: String,
    chunk_hint: Option<Vec<i64>>,
) -> GaResult<Created> {
    validate_dims(&dims)?;
    let nproc = transport.size();
    let nblock = compute_nblock(&dims, nproc, chunk_hint.as_deref());
    let mapc = compute_mapc(&dims, &nblock);
    create_irregular(
        transport,
        table,
        accounting,
        typed_heap,
        memory_remaining,
        element_type,
        dims,
        name,
        mapc,
        nblock,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn create_irregular<T: OneSided + ProcessGroup>(
    transport: &T,
    table: &mut DescriptorTable,
    accounting: &Accounting,
    typed_heap: &TypedHeap,
    memory_remaining: &mut Option<i64>,
    element_type: ElemType,
    dims: Vec<i64>,
    name: String,
    mapc: Vec<Vec<i64>>,
    nblock: Vec<usize>,
) -> GaResult<Created> {
    validate_dims(&dims)?;
    if nblock.iter().product::<usize>() > transport.size() {
        return Err(GaError::invalid_argument("nblock product exceeds process count"));
    }
    validate_mapc(&dims, &nblock, &mapc)?;

    let me = transport.rank();
    let slot = table.find_free_slot()?;

    #[cfg(feature = "debug")]
    log::trace!("create_irregular '{name}': slot {slot} reserved by rank {me}");

    let (lo, chunk) = chunk_for_rank(&dims, &nblock, &mapc, me);
    let elem_size = element_type.size();
    let local_elems: i64 = chunk.iter().product();
    let size_bytes = local_elems * elem_size as i64;

    if let Some(remaining) = memory_remaining {
        let tentative = *remaining - size_bytes;
        let insufficient_here = i64::from(tentative < 0);
        let mut vote = vec![insufficient_here];
        transport.igop_sum(&mut vote);
        if vote[0] > 0 {
            return Err(GaError::resource_exhausted(format!(
                "create '{name}': at least one process lacks memory for {size_bytes} bytes"
            )));
        }
        *remaining = tentative;
    }

    let alloc_bytes = max_local_bytes(&dims, &nblock, &mapc, transport.size(), elem_size);
    let allocation = match alloc::allocate_aligned(transport, element_type, alloc_bytes, typed_heap) {
        Ok(a) => a,
        Err(e) => {
            if let Some(remaining) = memory_remaining {
                *remaining += size_bytes;
            }
            return Err(e);
        }
    };
    let Allocation { base_ptr, raw_ptr, adjust } = allocation;

    let scale = compute_scale(&dims, &nblock);
    let descriptor = ArrayDescriptor {
        name,
        element_type,
        ndim: dims.len(),
        dims,
        nblock,
        mapc,
        scale,
        lo,
        chunk,
        base_ptr,
        alloc_adjust: adjust,
        size_bytes,
    };
    accounting.note_alloc(size_bytes as u64);
    let handle = table.insert(slot, descriptor);
    Ok(Created { handle, raw_ptr })
}

pub fn duplicate<T: OneSided + ProcessGroup>(
    transport: &T,
    table: &mut DescriptorTable,
    accounting: &Accounting,
    typed_heap: &TypedHeap,
    memory_remaining: &mut Option<i64>,
    handle: i32,
    new_name: String,
) -> GaResult<Created> {
    let src = table.get(handle)?.clone();
    create_irregular(
        transport,
        table,
        accounting,
        typed_heap,
        memory_remaining,
        src.element_type,
        src.dims,
        new_name,
        src.mapc,
        src.nblock,
    )
}

/// Returns `Some(raw_ptr)` to free through the transport, or `None` if the
/// handle was already inactive (destroy silently accepts that, per §7).
pub fn destroy<T: OneSided>(
    transport: &T,
    table: &mut DescriptorTable,
    accounting: &Accounting,
    memory_remaining: &mut Option<i64>,
    my_rank: usize,
    handle: i32,
) -> Option<usize> {
    let desc = table.try_take(handle)?;
    #[cfg(feature = "debug")]
    log::trace!("destroy '{}': releasing {} bytes on rank {my_rank}", desc.name, desc.size_bytes);
    let raw_ptr = (desc.base_ptr[my_rank] as i64 - desc.alloc_adjust) as usize;
    accounting.note_free(desc.size_bytes as u64);
    if let Some(remaining) = memory_remaining {
        *remaining += desc.size_bytes;
    }
    alloc::free(transport, raw_ptr);
    Some(raw_ptr)
}

/// Destroys every live array (used by `terminate`).
pub fn destroy_all<T: OneSided>(
    transport: &T,
    table: &mut DescriptorTable,
    accounting: &Accounting,
    memory_remaining: &mut Option<i64>,
    my_rank: usize,
) {
    for handle in table.active_handles() {
        destroy(transport, table, accounting, memory_remaining, my_rank, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgarray_transport::local::LocalCluster;

    #[test]
    fn create_then_destroy_refunds_memory() {
        let ranks = LocalCluster::new(2, 1 << 20);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|r| {
                std::thread::spawn(move || {
                    let mut table = DescriptorTable::new(8);
                    let accounting = Accounting::new();
                    let typed_heap = TypedHeap::init(&r, r.rank()).unwrap();
                    let mut remaining = Some(1024i64);
                    let created = create_regular(
                        &r,
                        &mut table,
                        &accounting,
                        &typed_heap,
                        &mut remaining,
                        ElemType::F64,
                        vec![4, 4],
                        "a".into(),
                        None,
                    )
                    .unwrap();
                    destroy(&r, &mut table, &accounting, &mut remaining, r.rank(), created.handle);
                    remaining
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), Some(1024));
        }
    }
}
