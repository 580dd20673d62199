//! One-sided access engine (C5): patch put/get/accumulate, scatter/gather,
//! fetch-and-add, and local patch access.

use pgarray_transport::{ElemType, OneSided, Scalar, VectorPair};

use crate::accounting::Accounting;
use crate::descriptor::ArrayDescriptor;
use crate::distribution::{chunk_for_rank, locate, locate_region, permute_rectangles, Rectangle};
use crate::error::{GaError, GaResult};
use crate::macros::{acc_add, acc_inc};
use crate::rng::SplitMix64;

fn validate_patch(desc: &ArrayDescriptor, lo: &[i64], hi: &[i64]) -> GaResult<()> {
    if lo.len() != desc.ndim || hi.len() != desc.ndim {
        return Err(GaError::invalid_argument("lo/hi length must equal ndim"));
    }
    for d in 0..desc.ndim {
        if lo[d] < 1 || hi[d] > desc.dims[d] || lo[d] > hi[d] {
            return Err(GaError::invalid_argument(format!(
                "patch out of range on dim {d}: [{}, {}] outside [1, {}]",
                lo[d], hi[d], desc.dims[d]
            )));
        }
    }
    Ok(())
}

/// Row-major strides (in elements) for a shape vector, dim 0 fastest-varying.
fn elem_strides(shape: &[i64]) -> Vec<i64> {
    let ndim = shape.len();
    let mut strides = vec![1i64; ndim];
    for d in 1..ndim {
        strides[d] = strides[d - 1] * shape[d - 1];
    }
    strides
}

struct TransferParams {
    remote_addr: usize,
    remote_stride: Vec<usize>,
    local_offset_bytes: usize,
    local_stride: Vec<usize>,
    count: Vec<usize>,
}

fn transfer_params(desc: &ArrayDescriptor, rect: &Rectangle, lo: &[i64], ld: &[i64]) -> TransferParams {
    let elem_size = desc.elem_size();
    let ndim = desc.ndim;
    let (owner_lo, owner_chunk) = chunk_for_rank(&desc.dims, &desc.nblock, &desc.mapc, rect.owner);
    let owner_strides = elem_strides(&owner_chunk);
    let local_strides = elem_strides(ld);

    let remote_elem_offset: i64 = (0..ndim).map(|d| (rect.sub_lo[d] - owner_lo[d]) * owner_strides[d]).sum();
    let local_elem_offset: i64 = (0..ndim).map(|d| (rect.sub_lo[d] - lo[d]) * local_strides[d]).sum();

    let mut count = vec![0usize; ndim];
    count[0] = (rect.sub_hi[0] - rect.sub_lo[0] + 1) as usize * elem_size;
    for d in 1..ndim {
        count[d] = (rect.sub_hi[d] - rect.sub_lo[d] + 1) as usize;
    }

    TransferParams {
        remote_addr: desc.base_ptr[rect.owner] + remote_elem_offset as usize * elem_size,
        remote_stride: owner_strides.iter().map(|&s| s as usize * elem_size).collect(),
        local_offset_bytes: local_elem_offset as usize * elem_size,
        local_stride: local_strides.iter().map(|&s| s as usize * elem_size).collect(),
        count,
    }
}

fn decomposed(desc: &ArrayDescriptor, lo: &[i64], hi: &[i64], rng: &mut SplitMix64) -> Vec<Rectangle> {
    let mut rects = locate_region(desc, lo, hi);
    permute_rectangles(&mut rects, rng);
    rects
}

#[allow(clippy::too_many_arguments)]
pub fn put<T: OneSided>(
    transport: &T,
    desc: &ArrayDescriptor,
    fence_targets: &mut [bool],
    fence_depth: u32,
    lo: &[i64],
    hi: &[i64],
    src_buf: *const u8,
    src_ld: &[i64],
    rng: &mut SplitMix64,
    accounting: &Accounting,
) -> GaResult<()> {
    validate_patch(desc, lo, hi)?;
    for rect in decomposed(desc, lo, hi, rng) {
        let p = transfer_params(desc, &rect, lo, src_ld);
        transport
            .put_strided(
                rect.owner,
                p.remote_addr,
                &p.remote_stride,
                unsafe { src_buf.add(p.local_offset_bytes) },
                &p.local_stride,
                &p.count,
            )
            .map_err(|e| GaError::internal(e.to_string()))?;
        if fence_depth > 0 {
            fence_targets[rect.owner] = true;
        }
        acc_add!(accounting, bytes_put, p.count[0]);
    }
    acc_inc!(accounting, put_count);
    Ok(())
}

pub fn get<T: OneSided>(
    transport: &T,
    desc: &ArrayDescriptor,
    lo: &[i64],
    hi: &[i64],
    dst_buf: *mut u8,
    dst_ld: &[i64],
    rng: &mut SplitMix64,
    accounting: &Accounting,
) -> GaResult<()> {
    validate_patch(desc, lo, hi)?;
    for rect in decomposed(desc, lo, hi, rng) {
        let p = transfer_params(desc, &rect, lo, dst_ld);
        transport
            .get_strided(
                rect.owner,
                unsafe { dst_buf.add(p.local_offset_bytes) },
                &p.local_stride,
                p.remote_addr,
                &p.remote_stride,
                &p.count,
            )
            .map_err(|e| GaError::internal(e.to_string()))?;
        acc_add!(accounting, bytes_get, p.count[0]);
    }
    acc_inc!(accounting, get_count);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn acc<T: OneSided>(
    transport: &T,
    desc: &ArrayDescriptor,
    fence_targets: &mut [bool],
    fence_depth: u32,
    lo: &[i64],
    hi: &[i64],
    src_buf: *const u8,
    src_ld: &[i64],
    scale: Scalar,
    rng: &mut SplitMix64,
    accounting: &Accounting,
) -> GaResult<()> {
    validate_patch(desc, lo, hi)?;
    for rect in decomposed(desc, lo, hi, rng) {
        let p = transfer_params(desc, &rect, lo, src_ld);
        transport
            .acc_strided(
                rect.owner,
                desc.element_type,
                scale,
                p.remote_addr,
                &p.remote_stride,
                unsafe { src_buf.add(p.local_offset_bytes) },
                &p.local_stride,
                &p.count,
            )
            .map_err(|e| GaError::internal(e.to_string()))?;
        if fence_depth > 0 {
            fence_targets[rect.owner] = true;
        }
        acc_add!(accounting, bytes_acc, p.count[0]);
    }
    acc_inc!(accounting, acc_count);
    Ok(())
}

enum ScatterOp {
    Write,
    Accumulate(Scalar),
}

#[allow(clippy::too_many_arguments)]
fn scatter_like<T: OneSided>(
    transport: &T,
    desc: &ArrayDescriptor,
    fence_targets: &mut [bool],
    fence_depth: u32,
    values: *const u8,
    subscripts: &[i64],
    nv: usize,
    op: ScatterOp,
    accounting: &Accounting,
) -> GaResult<()> {
    let ndim = desc.ndim;
    let elem_size = desc.elem_size();
    let mut owners = Vec::with_capacity(nv);
    for k in 0..nv {
        let idx = &subscripts[k * ndim..(k + 1) * ndim];
        let owner = locate(desc, idx).ok_or_else(|| GaError::invalid_argument(format!("subscript {idx:?} out of range")))?;
        owners.push(owner);
    }
    let mut order: Vec<usize> = (0..nv).collect();
    order.sort_by_key(|&k| owners[k]);

    let mut i = 0;
    while i < order.len() {
        let owner = owners[order[i]];
        let mut j = i;
        let mut pairs = Vec::new();
        while j < order.len() && owners[order[j]] == owner {
            let k = order[j];
            let idx = &subscripts[k * ndim..(k + 1) * ndim];
            let (owner_lo, owner_chunk) = chunk_for_rank(&desc.dims, &desc.nblock, &desc.mapc, owner);
            let strides = elem_strides(&owner_chunk);
            let elem_offset: i64 = (0..ndim).map(|d| (idx[d] - owner_lo[d]) * strides[d]).sum();
            let remote = desc.base_ptr[owner] + elem_offset as usize * elem_size;
            let local = unsafe { values.add(k * elem_size) };
            pairs.push(VectorPair {
                dst: remote as *mut u8,
                src: local,
            });
            j += 1;
        }
        match op {
            ScatterOp::Write => {
                transport.put_vector(owner, &pairs, elem_size).map_err(|e| GaError::internal(e.to_string()))?;
            }
            ScatterOp::Accumulate(scale) => {
                transport
                    .acc_vector(owner, desc.element_type, scale, &pairs, elem_size)
                    .map_err(|e| GaError::internal(e.to_string()))?;
            }
        }
        if fence_depth > 0 {
            fence_targets[owner] = true;
        }
        i = j;
    }
    acc_inc!(accounting, scatter_count);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn scatter<T: OneSided>(
    transport: &T,
    desc: &ArrayDescriptor,
    fence_targets: &mut [bool],
    fence_depth: u32,
    values: *const u8,
    subscripts: &[i64],
    nv: usize,
    accounting: &Accounting,
) -> GaResult<()> {
    scatter_like(transport, desc, fence_targets, fence_depth, values, subscripts, nv, ScatterOp::Write, accounting)
}

#[allow(clippy::too_many_arguments)]
pub fn scatter_acc<T: OneSided>(
    transport: &T,
    desc: &ArrayDescriptor,
    fence_targets: &mut [bool],
    fence_depth: u32,
    values: *const u8,
    subscripts: &[i64],
    nv: usize,
    scale: Scalar,
    accounting: &Accounting,
) -> GaResult<()> {
    scatter_like(
        transport,
        desc,
        fence_targets,
        fence_depth,
        values,
        subscripts,
        nv,
        ScatterOp::Accumulate(scale),
        accounting,
    )
}

pub fn gather<T: OneSided>(
    transport: &T,
    desc: &ArrayDescriptor,
    values: *mut u8,
    subscripts: &[i64],
    nv: usize,
    accounting: &Accounting,
) -> GaResult<()> {
    let ndim = desc.ndim;
    let elem_size = desc.elem_size();
    let mut owners = Vec::with_capacity(nv);
    for k in 0..nv {
        let idx = &subscripts[k * ndim..(k + 1) * ndim];
        let owner = locate(desc, idx).ok_or_else(|| GaError::invalid_argument(format!("subscript {idx:?} out of range")))?;
        owners.push(owner);
    }
    let mut order: Vec<usize> = (0..nv).collect();
    order.sort_by_key(|&k| owners[k]);

    let mut i = 0;
    while i < order.len() {
        let owner = owners[order[i]];
        let mut j = i;
        let mut pairs = Vec::new();
        while j < order.len() && owners[order[j]] == owner {
            let k = order[j];
            let idx = &subscripts[k * ndim..(k + 1) * ndim];
            let (owner_lo, owner_chunk) = chunk_for_rank(&desc.dims, &desc.nblock, &desc.mapc, owner);
            let strides = elem_strides(&owner_chunk);
            let elem_offset: i64 = (0..ndim).map(|d| (idx[d] - owner_lo[d]) * strides[d]).sum();
            let remote = desc.base_ptr[owner] + elem_offset as usize * elem_size;
            let local = unsafe { values.add(k * elem_size) };
            pairs.push(VectorPair {
                dst: local,
                src: remote as *const u8,
            });
            j += 1;
        }
        transport.get_vector(owner, &pairs, elem_size).map_err(|e| GaError::internal(e.to_string()))?;
        i = j;
    }
    acc_inc!(accounting, gather_count);
    Ok(())
}

pub fn read_inc<T: OneSided>(
    transport: &T,
    desc: &ArrayDescriptor,
    subscripts: &[i64],
    inc: i64,
    accounting: &Accounting,
) -> GaResult<i64> {
    if desc.element_type != ElemType::I64 {
        return Err(GaError::usage("read_inc requires an integer-typed array"));
    }
    let owner = locate(desc, subscripts).ok_or_else(|| GaError::invalid_argument(format!("subscript {subscripts:?} out of range")))?;
    let (owner_lo, owner_chunk) = chunk_for_rank(&desc.dims, &desc.nblock, &desc.mapc, owner);
    let strides = elem_strides(&owner_chunk);
    let elem_offset: i64 = (0..desc.ndim).map(|d| (subscripts[d] - owner_lo[d]) * strides[d]).sum();
    let remote = desc.base_ptr[owner] + elem_offset as usize * desc.elem_size();
    let result = transport.fetch_and_add_i64(owner, remote, inc).map_err(|e| GaError::internal(e.to_string()));
    acc_inc!(accounting, read_inc_count);
    result
}

/// Returns a local pointer and leading-dimension vector for `[lo,hi]`, or an
/// error if the caller does not own every index in the patch.
pub fn access(desc: &ArrayDescriptor, my_rank: usize, lo: &[i64], hi: &[i64]) -> GaResult<(usize, Vec<i64>)> {
    validate_patch(desc, lo, hi)?;
    let (owner_lo, owner_chunk) = chunk_for_rank(&desc.dims, &desc.nblock, &desc.mapc, my_rank);
    for d in 0..desc.ndim {
        let owner_hi = owner_lo[d] + owner_chunk[d] - 1;
        if lo[d] < owner_lo[d] || hi[d] > owner_hi {
            return Err(GaError::usage(format!(
                "access: patch on dim {d} not fully owned by this process"
            )));
        }
    }
    let strides = elem_strides(&owner_chunk);
    let elem_offset: i64 = (0..desc.ndim).map(|d| (lo[d] - owner_lo[d]) * strides[d]).sum();
    let ptr = desc.base_ptr[my_rank] + elem_offset as usize * desc.elem_size();
    Ok((ptr, owner_chunk))
}

/// Fills this process's own owned patch with `value`. Purely local: every
/// process fills its own share, so no remote operation is involved.
pub fn fill(desc: &ArrayDescriptor, my_rank: usize, value: Scalar) -> GaResult<()> {
    let elem_size = desc.elem_size();
    let n: i64 = desc.chunk.iter().product();
    let base = desc.base_ptr[my_rank];
    for e in 0..n {
        let ptr = (base + e as usize * elem_size) as *mut u8;
        match (desc.element_type, value) {
            (ElemType::I64, Scalar::I64(v)) => unsafe { std::ptr::write_unaligned(ptr as *mut i64, v) },
            (ElemType::F64, Scalar::F64(v)) => unsafe { std::ptr::write_unaligned(ptr as *mut f64, v) },
            (ElemType::C128, Scalar::C128(v)) => unsafe { std::ptr::write_unaligned(ptr as *mut [f64; 2], v) },
            _ => return Err(GaError::invalid_argument("fill value type does not match array element type")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{compute_mapc, compute_nblock, compute_scale};
    use pgarray_transport::local::LocalCluster;
    use std::sync::Arc;

    /// `symmetric_alloc` is collective: every rank must call it, so tests
    /// that only ever issue one-sided ops from rank 0 still spawn one
    /// thread per rank just for this call.
    fn collective_alloc(ranks: &[pgarray_transport::local::LocalRank], bytes: usize) -> Vec<usize> {
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

    fn make_desc(dims: Vec<i64>, nproc: usize, element_type: ElemType) -> ArrayDescriptor {
        let nblock = compute_nblock(&dims, nproc, None);
        let mapc = compute_mapc(&dims, &nblock);
        let scale = compute_scale(&dims, &nblock);
        let elem_size = element_type.size();
        let max_elems = (0..nproc)
            .map(|p| {
                let (_, c) = chunk_for_rank(&dims, &nblock, &mapc, p);
                c.iter().product::<i64>()
            })
            .max()
            .unwrap();
        ArrayDescriptor {
            name: "t".into(),
            element_type,
            ndim: dims.len(),
            dims,
            nblock,
            mapc,
            scale,
            lo: vec![],
            chunk: vec![],
            base_ptr: vec![],
            alloc_adjust: 0,
            size_bytes: max_elems * elem_size as i64,
        }
    }

    #[test]
    fn put_then_get_round_trips_through_two_ranks() {
        let ranks = LocalCluster::new(2, 1 << 16);
        let mut desc = make_desc(vec![8, 8], 2, ElemType::F64);
        desc.base_ptr = collective_alloc(&ranks, desc.size_bytes as usize);

        let accounting = Accounting::new();
        let mut rng = SplitMix64::seeded(1);
        let mut fence = vec![false; 2];
        let src: Vec<f64> = (0..64).map(|i| i as f64).collect();
        put(
            &ranks[0],
            &desc,
            &mut fence,
            1,
            &[1, 1],
            &[8, 8],
            src.as_ptr() as *const u8,
            &[8, 8],
            &mut rng,
            &accounting,
        )
        .unwrap();

        let mut dst = vec![0f64; 64];
        let mut rng2 = SplitMix64::seeded(2);
        get(&ranks[0], &desc, &[1, 1], &[8, 8], dst.as_mut_ptr() as *mut u8, &[8, 8], &mut rng2, &accounting).unwrap();
        assert_eq!(src, dst);
    }

    #[test]
    fn scatter_then_gather_round_trips() {
        let ranks = LocalCluster::new(3, 1 << 16);
        let mut desc = make_desc(vec![30], 3, ElemType::F64);
        desc.base_ptr = collective_alloc(&ranks, desc.size_bytes as usize);

        let accounting = Accounting::new();
        let mut fence = vec![false; 3];
        let values: Vec<f64> = (0..10).map(|i| i as f64 * 1.5).collect();
        let subs: Vec<i64> = (1..=30).step_by(3).take(10).collect();
        scatter(&ranks[0], &desc, &mut fence, 1, values.as_ptr() as *const u8, &subs, 10, &accounting).unwrap();

        let mut out = vec![0f64; 10];
        gather(&ranks[0], &desc, out.as_mut_ptr() as *mut u8, &subs, 10, &accounting).unwrap();
        assert_eq!(values, out);
    }

    #[test]
    fn read_inc_is_atomic_under_contention() {
        let ranks = LocalCluster::new(4, 1 << 16);
        let mut desc = make_desc(vec![1], 4, ElemType::I64);
        desc.base_ptr = collective_alloc(&ranks, desc.size_bytes as usize);
        let desc = Arc::new(desc);

        let handles: Vec<_> = ranks
            .into_iter()
            .map(|r| {
                let desc = Arc::clone(&desc);
                std::thread::spawn(move || {
                    let accounting = Accounting::new();
                    read_inc(&r, &desc, &[1], 1, &accounting).unwrap()
                })
            })
            .collect();
        let mut results: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, vec![0, 1, 2, 3]);
    }
}
