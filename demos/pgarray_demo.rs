use pgarray::Runtime;
use pgarray_transport::local::LocalCluster;
use pgarray_transport::{ElemType, ProcessGroup, Scalar};

fn main() {
    env_logger::init();
    println!("pgarray demo");
    println!("============\n");

    let nproc = 4;
    let ranks = LocalCluster::new(nproc, 4 * 1024 * 1024);

    let handles: Vec<_> = ranks
        .into_iter()
        .map(|rank| {
            std::thread::spawn(move || {
                let me = rank.rank();
                let mut rt = Runtime::initialize(rank).expect("initialize");

                let g = rt.create(ElemType::F64, vec![100, 100], "g").expect("create");
                rt.fill(g, Scalar::F64(0.0));
                rt.sync();

                let (lo, hi) = rt.distribution(g, me).unwrap();
                if lo[0] <= hi[0] && lo[1] <= hi[1] {
                    let src = vec![me as f64; ((hi[0] - lo[0] + 1) * (hi[1] - lo[1] + 1)) as usize];
                    let ld = vec![hi[1] - lo[1] + 1];
                    rt.init_fence();
                    rt.put(g, &lo, &hi, src.as_ptr() as *const u8, &ld);
                    rt.fence();
                }
                rt.sync();

                let counter = rt.create(ElemType::I64, vec![1], "counter").expect("create");
                rt.fill(counter, Scalar::I64(0));
                rt.sync();

                let mine = rt.read_inc(counter, &[1], 1);
                println!("rank {me}: read_inc returned {mine}");

                rt.destroy(g);
                rt.destroy(counter);
                let snap = rt.accounting();
                rt.terminate();
                snap
            })
        })
        .collect();

    let mut total_puts = 0u64;
    for h in handles {
        let snap = h.join().expect("rank panicked");
        total_puts += snap.put_count;
    }
    println!("\ntotal puts across ranks: {total_puts}");
    println!("Done.");
}
