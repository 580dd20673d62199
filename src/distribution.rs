//! Regular-distribution layout, owner lookup, and patch decomposition.

use crate::descriptor::ArrayDescriptor;
use crate::rng::SplitMix64;

/// A single owner rectangle produced by decomposing a patch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rectangle {
    pub sub_lo: Vec<i64>,
    pub sub_hi: Vec<i64>,
    pub owner: usize,
}

/// Chooses a balanced block count per dimension with `∏ nblock[d] ≤ nproc`,
/// greedily growing whichever dimension currently has the most elements per
/// block. `chunk_hint[d] > 0` pins that dimension's block *size* instead.
pub fn compute_nblock(dims: &[i64], nproc: usize, chunk_hint: Option<&[i64]>) -> Vec<usize> {
    let ndim = dims.len();
    let mut nblock = vec![1usize; ndim];
    if let Some(hint) = chunk_hint {
        for d in 0..ndim {
            if hint[d] > 0 {
                nblock[d] = (dims[d].div_ceil(hint[d])).max(1) as usize;
            }
        }
    }
    loop {
        let mut best: Option<usize> = None;
        let mut best_ratio = 0.0f64;
        let fixed = chunk_hint.map(|h| h.to_vec());
        for d in 0..ndim {
            if let Some(h) = &fixed {
                if h[d] > 0 {
                    continue;
                }
            }
            if nblock[d] as i64 >= dims[d] {
                continue;
            }
            let product: usize = nblock
                .iter()
                .enumerate()
                .map(|(i, &n)| if i == d { n + 1 } else { n })
                .product();
            if product > nproc {
                continue;
            }
            let ratio = dims[d] as f64 / (nblock[d] as f64 + 1.0);
            if ratio > best_ratio {
                best_ratio = ratio;
                best = Some(d);
            }
        }
        match best {
            Some(d) => nblock[d] += 1,
            None => break,
        }
    }
    nblock
}

pub fn compute_mapc(dims: &[i64], nblock: &[usize]) -> Vec<Vec<i64>> {
    dims.iter()
        .zip(nblock)
        .map(|(&dim, &nb)| {
            let blk = dim.div_ceil(nb as i64);
            (0..nb as i64).map(|b| 1 + b * blk).filter(|&s| s <= dim).collect()
        })
        .collect()
}

pub fn compute_scale(dims: &[i64], nblock: &[usize]) -> Vec<f64> {
    dims.iter()
        .zip(nblock)
        .map(|(&dim, &nb)| nb as f64 / dim as f64)
        .collect()
}

/// Column-major (Fortran-order) linearization of block coordinates into an
/// owner rank: dim 0 is fastest-varying, matching the reference toolkit's
/// `ga_ComputeIndexM`. `owner = Σ_d coords[d] · ∏_{k<d} nblock[k]`.
pub fn linearize(block_coords: &[usize], nblock: &[usize]) -> usize {
    let mut idx = 0usize;
    let mut stride = 1usize;
    for d in 0..block_coords.len() {
        idx += block_coords[d] * stride;
        stride *= nblock[d];
    }
    idx
}

/// Seeded search (§4.4.2): starts from `scale[d] · idx`, then walks to the
/// block actually containing `idx`.
fn find_block(mapc_d: &[i64], scale_d: f64, idx: i64) -> usize {
    let nb = mapc_d.len();
    let mut cand = ((scale_d * idx as f64) as i64).clamp(0, nb as i64 - 1) as usize;
    while cand + 1 < nb && mapc_d[cand + 1] <= idx {
        cand += 1;
    }
    while cand > 0 && mapc_d[cand] > idx {
        cand -= 1;
    }
    cand
}

fn block_range(mapc_d: &[i64], dim_extent: i64, b: usize) -> (i64, i64) {
    let lo = mapc_d[b];
    let hi = if b + 1 < mapc_d.len() { mapc_d[b + 1] - 1 } else { dim_extent };
    (lo, hi)
}

/// Inverse of [`linearize`]: block coordinates owned by rank `idx`, dim 0
/// fastest-varying.
pub fn unravel(mut idx: usize, nblock: &[usize]) -> Vec<usize> {
    let ndim = nblock.len();
    let mut coords = vec![0usize; ndim];
    for d in 0..ndim {
        coords[d] = idx % nblock[d];
        idx /= nblock[d];
    }
    coords
}

/// The patch owned by `rank` under a regular/irregular distribution, before
/// any rank-permutation is applied. Every process can compute this for
/// *every* rank (not just itself) because `dims`/`nblock`/`mapc` are
/// identical everywhere — this is what lets a collective allocation size
/// agree across processes without a round trip (§9).
pub fn chunk_for_rank(dims: &[i64], nblock: &[usize], mapc: &[Vec<i64>], rank: usize) -> (Vec<i64>, Vec<i64>) {
    let ndim = dims.len();
    let product: usize = nblock.iter().product();
    if rank >= product {
        return (vec![1i64; ndim], vec![0i64; ndim]);
    }
    let coords = unravel(rank, nblock);
    let mut lo = vec![0i64; ndim];
    let mut chunk = vec![0i64; ndim];
    for d in 0..ndim {
        let (blo, bhi) = block_range(&mapc[d], dims[d], coords[d]);
        lo[d] = blo;
        chunk[d] = bhi - blo + 1;
    }
    (lo, chunk)
}

/// The per-process byte count every rank must request from the symmetric
/// allocator so the collective call agrees everywhere: the maximum local
/// element count over all ranks (§4.6), computed without communication.
pub fn max_local_bytes(dims: &[i64], nblock: &[usize], mapc: &[Vec<i64>], nproc: usize, elem_size: usize) -> usize {
    (0..nproc)
        .map(|p| {
            let (_, chunk) = chunk_for_rank(dims, nblock, mapc, p);
            chunk.iter().product::<i64>() as usize * elem_size
        })
        .max()
        .unwrap_or(0)
}

/// Locates the logical owner (pre-permutation) of a single global index.
/// Returns `None` if any coordinate is out of `[1, dims[d]]`.
pub fn locate(desc: &ArrayDescriptor, idx: &[i64]) -> Option<usize> {
    let ndim = desc.ndim;
    let mut block_coords = vec![0usize; ndim];
    for d in 0..ndim {
        if idx[d] < 1 || idx[d] > desc.dims[d] {
            return None;
        }
        block_coords[d] = find_block(&desc.mapc[d], desc.scale[d], idx[d]);
    }
    Some(linearize(&block_coords, &desc.nblock))
}

/// Decomposes `[lo,hi]` into disjoint owner rectangles covering it exactly.
pub fn locate_region(desc: &ArrayDescriptor, lo: &[i64], hi: &[i64]) -> Vec<Rectangle> {
    let ndim = desc.ndim;
    let mut b_lo = vec![0usize; ndim];
    let mut b_hi = vec![0usize; ndim];
    for d in 0..ndim {
        b_lo[d] = find_block(&desc.mapc[d], desc.scale[d], lo[d]);
        b_hi[d] = find_block(&desc.mapc[d], desc.scale[d], hi[d]);
    }

    let mut out = Vec::new();
    for coords in cartesian_block_coords(&b_lo, &b_hi) {
        let mut sub_lo = vec![0i64; ndim];
        let mut sub_hi = vec![0i64; ndim];
        for d in 0..ndim {
            let (blk_lo, blk_hi) = block_range(&desc.mapc[d], desc.dims[d], coords[d]);
            sub_lo[d] = lo[d].max(blk_lo);
            sub_hi[d] = hi[d].min(blk_hi);
        }
        out.push(Rectangle {
            owner: linearize(&coords, &desc.nblock),
            sub_lo,
            sub_hi,
        });
    }
    out
}

/// Enumerates block coordinates dim 0 fastest, matching [`linearize`].
fn cartesian_block_coords(lo_b: &[usize], hi_b: &[usize]) -> Vec<Vec<usize>> {
    let ndim = lo_b.len();
    let mut out = Vec::new();
    let mut cur = lo_b.to_vec();
    'outer: loop {
        out.push(cur.clone());
        for d in 0..ndim {
            if cur[d] < hi_b[d] {
                cur[d] += 1;
                break;
            } else {
                cur[d] = lo_b[d];
                if d == ndim - 1 {
                    break 'outer;
                }
            }
        }
    }
    out
}

/// Permutes a list of owner rectangles in place using the caller's rng, so
/// concurrent initiators touching the same array don't all contact owners in
/// the same order (§4.4.4).
pub fn permute_rectangles(rects: &mut [Rectangle], rng: &mut SplitMix64) {
    rng.shuffle(rects);
}
