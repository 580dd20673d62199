//! Whole-cluster integration scenarios (S1-S6).

mod common;

use common::{run_cluster, run_cluster_with_config};
use pgarray::RuntimeConfig;
use pgarray_transport::{ElemType, Scalar};

fn read_owned_patch(rt: &pgarray::Runtime<pgarray_transport::local::LocalRank>, h: i32, me: usize) -> Vec<f64> {
    let (lo, hi) = rt.distribution(h, me).unwrap();
    if lo.iter().zip(&hi).any(|(l, h)| l > h) {
        return Vec::new();
    }
    let (ptr, chunk) = rt.access(h, &lo, &hi);
    let n = chunk.iter().product::<i64>() as usize;
    (0..n).map(|i| unsafe { std::ptr::read_unaligned((ptr as *const f64).add(i)) }).collect()
}

/// S1: a single initiator puts a full pattern; every peer reads its own
/// owned patch back and sees exactly its slice of that pattern.
#[test]
fn s1_put_get_round_trip() {
    const DIM: i64 = 40;
    let results = run_cluster(4, 1 << 20, |rt, me| {
        let h = rt.create(ElemType::F64, vec![DIM], "a").unwrap();
        rt.fill(h, Scalar::F64(-1.0));
        rt.sync();

        if me == 0 {
            let whole: Vec<f64> = (0..DIM).map(|i| i as f64).collect();
            rt.init_fence();
            rt.put(h, &[1], &[DIM], whole.as_ptr() as *const u8, &[DIM]);
            rt.fence();
        }
        rt.sync();

        let (lo, _hi) = rt.distribution(h, me).unwrap();
        let mine = read_owned_patch(rt, h, me);
        let expected: Vec<f64> = (0..mine.len()).map(|i| (lo[0] - 1 + i as i64) as f64).collect();
        rt.destroy(h);
        (mine, expected)
    });
    for (mine, expected) in results {
        assert_eq!(mine, expected);
    }
}

/// S2: every peer accumulates +1 into the same full-array patch
/// concurrently; after a fence and sync, every cell must read `nproc`.
#[test]
fn s2_accumulate_convergence() {
    const DIM: i64 = 24;
    let nproc = 4;
    let results = run_cluster(nproc, 1 << 20, move |rt, me| {
        let h = rt.create(ElemType::F64, vec![DIM], "a").unwrap();
        rt.fill(h, Scalar::F64(0.0));
        rt.sync();

        let ones = vec![1.0f64; DIM as usize];
        rt.init_fence();
        rt.acc(h, &[1], &[DIM], ones.as_ptr() as *const u8, &[DIM], Scalar::F64(1.0));
        rt.fence();
        rt.sync();

        let mine = read_owned_patch(rt, h, me);
        rt.destroy(h);
        mine
    });
    for mine in results {
        assert!(mine.iter().all(|&v| v == nproc as f64), "expected every cell to converge to nproc, got {mine:?}");
    }
}

/// S3: every peer issues 50 fetch-and-add increments on the same cell;
/// the returned values across all peers form a permutation of
/// `0..nproc*50`, and the final stored value equals `nproc*50`.
#[test]
fn s3_fetch_and_add_race() {
    const PER_RANK: i64 = 50;
    let nproc = 4;
    let results = run_cluster(nproc, 1 << 16, move |rt, me| {
        let h = rt.create(ElemType::I64, vec![1], "counter").unwrap();
        rt.fill(h, Scalar::I64(0));
        rt.sync();

        let mut mine: Vec<i64> = (0..PER_RANK).map(|_| rt.read_inc(h, &[1], 1)).collect();
        rt.sync();

        let final_value = if me == 0 {
            let mut buf = [0i64];
            rt.get(h, &[1], &[1], buf.as_mut_ptr() as *mut u8, &[1]);
            Some(buf[0])
        } else {
            None
        };
        rt.destroy(h);
        mine.sort();
        (mine, final_value)
    });

    let mut all_returned: Vec<i64> = results.iter().flat_map(|(v, _)| v.clone()).collect();
    all_returned.sort();
    let expected: Vec<i64> = (0..nproc as i64 * PER_RANK).collect();
    assert_eq!(all_returned, expected);

    let final_values: Vec<i64> = results.into_iter().filter_map(|(_, f)| f).collect();
    assert_eq!(final_values, vec![nproc as i64 * PER_RANK]);
}

/// S4: scatter a known set of values at scattered subscripts, then gather
/// them back and confirm round-trip equality.
#[test]
fn s4_scatter_gather_round_trip() {
    let results = run_cluster(3, 1 << 16, |rt, me| {
        let h = rt.create(ElemType::F64, vec![50], "a").unwrap();
        rt.fill(h, Scalar::F64(0.0));
        rt.sync();

        let subs: Vec<i64> = (1..=50).step_by(2).collect();
        let values: Vec<f64> = (0..subs.len()).map(|i| i as f64 * 2.5).collect();

        if me == 0 {
            rt.init_fence();
            rt.scatter(h, values.as_ptr() as *const u8, &subs, subs.len());
            rt.fence();
        }
        rt.sync();

        let out = if me == 0 {
            let mut out = vec![0.0f64; subs.len()];
            rt.gather(h, out.as_mut_ptr() as *mut u8, &subs, subs.len());
            Some((values, out))
        } else {
            None
        };
        rt.destroy(h);
        out
    });
    for r in results.into_iter().flatten() {
        assert_eq!(r.0, r.1);
    }
}

/// S5: `locate_region` over the full domain produces disjoint rectangles
/// whose union exactly covers it, for every process count tried, AND owners
/// land on the column-major (dim-0-fastest) block order the distribution
/// uses: for a 10x10 array split into 2x2 blocks (`mapc = [1,6],[1,6]`),
/// querying `[3,3]..[8,8]` must land block (1,0) on P1 and block (0,1) on P2.
#[test]
fn s5_locate_region_exact_partition() {
    let results = run_cluster(4, 1 << 16, |rt, _me| {
        let h = rt.create(ElemType::F64, vec![10, 10], "a").unwrap();
        let rects = rt.locate_region(h, &[3, 3], &[8, 8]).unwrap();
        rt.destroy(h);
        rects
    });

    let rects = &results[0];
    let mut by_owner: std::collections::HashMap<usize, (Vec<i64>, Vec<i64>)> =
        rects.iter().map(|r| (r.owner, (r.sub_lo.clone(), r.sub_hi.clone()))).collect();
    assert_eq!(by_owner.len(), 4, "expected one rectangle per quadrant, got {rects:?}");

    assert_eq!(by_owner.remove(&0).unwrap(), (vec![3, 3], vec![5, 5]), "P0 owns the top-left block");
    assert_eq!(by_owner.remove(&1).unwrap(), (vec![6, 3], vec![8, 5]), "block (1,0) must be owned by P1");
    assert_eq!(by_owner.remove(&2).unwrap(), (vec![3, 6], vec![5, 8]), "block (0,1) must be owned by P2");
    assert_eq!(by_owner.remove(&3).unwrap(), (vec![6, 6], vec![8, 8]), "P3 owns the bottom-right block");

    let results = run_cluster(5, 1 << 16, |rt, _me| {
        let h = rt.create(ElemType::F64, vec![17, 13], "a").unwrap();
        let rects = rt.locate_region(h, &[1, 1], &[17, 13]).unwrap();
        rt.destroy(h);
        rects
    });

    let rects = &results[0];
    let mut covered = vec![vec![false; 13]; 17];
    for r in rects {
        for i in r.sub_lo[0]..=r.sub_hi[0] {
            for j in r.sub_lo[1]..=r.sub_hi[1] {
                let cell = &mut covered[(i - 1) as usize][(j - 1) as usize];
                assert!(!*cell, "cell ({i},{j}) covered twice");
                *cell = true;
            }
        }
    }
    assert!(covered.iter().all(|row| row.iter().all(|&c| c)));
}

/// S6: a memory ceiling too small for the requested array causes every
/// peer's `create` to fail with `ResourceExhausted`, collectively.
#[test]
fn s6_memory_limit_rejected_everywhere() {
    let config = RuntimeConfig { memory_limit: Some(64), ..RuntimeConfig::default() };
    let results = run_cluster_with_config(3, config, |rt, _me| rt.create(ElemType::F64, vec![1000, 1000], "too_big").is_err());
    assert!(results.into_iter().all(|rejected| rejected));
}
