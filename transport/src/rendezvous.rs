//! Generation-counted rendezvous, generalizing [`std::sync::Barrier`] to carry
//! a payload from every participant back to every participant.
//!
//! Barrier, collective reduction (`igop`), and the base-address exchange in
//! `symmetric_alloc` are all "every rank contributes one value, every rank
//! gets the full vector back" — this is that primitive, built once.

use std::sync::{Condvar, Mutex};

struct State<T> {
    generation: u64,
    arrived: usize,
    slots: Vec<Option<T>>,
}

pub struct Rendezvous<T> {
    n: usize,
    state: Mutex<State<T>>,
    condvar: Condvar,
}

impl<T: Clone> Rendezvous<T> {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            state: Mutex::new(State {
                generation: 0,
                arrived: 0,
                slots: vec![None; n],
            }),
            condvar: Condvar::new(),
        }
    }

    /// Blocks until all `n` participants have called `wait`, then returns the
    /// full vector of payloads (indexed by rank) to every participant.
    pub fn wait(&self, rank: usize, payload: T) -> Vec<T> {
        let mut guard = self.state.lock().unwrap();
        let my_generation = guard.generation;
        guard.slots[rank] = Some(payload);
        guard.arrived += 1;

        if guard.arrived == self.n {
            guard.arrived = 0;
            guard.generation = guard.generation.wrapping_add(1);
            self.condvar.notify_all();
        } else {
            while guard.generation == my_generation {
                guard = self.condvar.wait(guard).unwrap();
            }
        }

        guard
            .slots
            .iter()
            .map(|s| s.clone().expect("all ranks arrived before any slot is cleared"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn all_ranks_see_all_payloads() {
        let rv = Arc::new(Rendezvous::new(4));
        let handles: Vec<_> = (0..4)
            .map(|rank| {
                let rv = Arc::clone(&rv);
                thread::spawn(move || rv.wait(rank, rank as i64 * 10))
            })
            .collect();
        for h in handles {
            let mut out = h.join().unwrap();
            out.sort();
            assert_eq!(out, vec![0, 10, 20, 30]);
        }
    }

    #[test]
    fn reusable_across_generations() {
        let rv = Arc::new(Rendezvous::new(2));
        for round in 0..3 {
            let rv1 = Arc::clone(&rv);
            let rv2 = Arc::clone(&rv);
            let t1 = thread::spawn(move || rv1.wait(0, round));
            let t2 = thread::spawn(move || rv2.wait(1, round + 1));
            assert_eq!(t1.join().unwrap(), vec![round, round + 1]);
            assert_eq!(t2.join().unwrap(), vec![round, round + 1]);
        }
    }
}
