//! Properties: the driver loop terminates in finite time whenever the total
//! work is finite (even if individual peers dynamically enqueue more items
//! mid-run), and it never terminates while reachable work remains anywhere
//! in the cluster. The token ring only reports global quiescence once every
//! peer has gone idle and every in-flight reply has settled; a ring that
//! lost or misrouted a token would show up here as either a hang (caught by
//! proptest's per-case timeout) or a processed count short of what was
//! actually spawned.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use proptest::prelude::*;

use ringcopy::task::{PeerHandle, Task};
use ringcopy::transport::channel::build_cluster;
use ringcopy::{Driver, Outcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Unit;

/// Each processed item has a fixed chance of spawning `fanout` more, capped
/// by a shared budget so the total amount of work stays finite and known in
/// advance even though no single peer knows the final count up front.
struct Spawner {
    seed_count: u32,
    fanout: u32,
    spawn_chance: u8,
    budget: Arc<AtomicU32>,
    processed: Arc<AtomicU32>,
    rng_state: u64,
}

impl Spawner {
    fn next_coin(&mut self) -> u8 {
        // xorshift64: cheap, deterministic-per-seed, no external dependency
        // needed for a yes/no coin flip inside process().
        self.rng_state ^= self.rng_state << 13;
        self.rng_state ^= self.rng_state >> 7;
        self.rng_state ^= self.rng_state << 17;
        (self.rng_state % 100) as u8
    }
}

impl Task<Unit> for Spawner {
    type Error = std::convert::Infallible;

    fn create(&mut self, peer: &mut PeerHandle<'_, Unit>) -> Result<(), Self::Error> {
        for _ in 0..self.seed_count {
            peer.enq(Unit);
        }
        Ok(())
    }

    fn process(&mut self, peer: &mut PeerHandle<'_, Unit>) -> Result<(), Self::Error> {
        let Some(Unit) = peer.deq() else { return Ok(()) };
        self.processed.fetch_add(1, Ordering::SeqCst);

        if self.next_coin() < self.spawn_chance {
            for _ in 0..self.fanout {
                if self
                    .budget
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
                    .is_ok()
                {
                    peer.enq(Unit);
                }
            }
        }
        Ok(())
    }
}

fn run_to_completion(
    n: usize,
    seed_count: u32,
    fanout: u32,
    spawn_chance: u8,
    extra_budget: u32,
    seed: u64,
) -> (Vec<Outcome>, u32) {
    let cluster = build_cluster::<Unit>(n);
    let processed = Arc::new(AtomicU32::new(0));
    let budget = Arc::new(AtomicU32::new(extra_budget));

    let mut seeds = vec![0u32; n];
    seeds[0] = seed_count;

    let outcomes: Vec<Outcome> = thread::scope(|scope| {
        let handles: Vec<_> = cluster
            .into_iter()
            .zip(seeds)
            .enumerate()
            .map(|(rank, (transport, own_seed))| {
                let processed = Arc::clone(&processed);
                let budget = Arc::clone(&budget);
                scope.spawn(move || {
                    let mut task = Spawner {
                        seed_count: own_seed,
                        fanout,
                        spawn_chance,
                        budget,
                        processed,
                        rng_state: seed ^ (rank as u64 + 1).wrapping_mul(0x9E3779B97F4A7C15),
                    };
                    Driver::new(&transport).begin(&mut task).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let total = processed.load(Ordering::SeqCst);
    (outcomes, total)
}

fn terminates_exactly_on_the_reachable_set(n: usize, seed_count: u32, extra_budget: u32, seed: u64) {
    let (outcomes, processed) = run_to_completion(n, seed_count, 2, 35, extra_budget, seed);

    assert!(
        outcomes.iter().all(|o| *o == Outcome::Terminated),
        "finite work must reach termination, not abort, on every peer"
    );
    assert!(
        processed >= seed_count,
        "no premature termination: every seeded item must have been processed"
    );
    assert!(
        processed <= seed_count + extra_budget,
        "token ring must not report quiescence while spawned work is still outstanding"
    );
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 24, .. ProptestConfig::default() })]

    #[test]
    fn terminates_n1(seed_count in 0u32..20, extra_budget in 0u32..40, seed in any::<u64>()) {
        terminates_exactly_on_the_reachable_set(1, seed_count, extra_budget, seed);
    }

    #[test]
    fn terminates_n2(seed_count in 0u32..20, extra_budget in 0u32..40, seed in any::<u64>()) {
        terminates_exactly_on_the_reachable_set(2, seed_count, extra_budget, seed);
    }

    #[test]
    fn terminates_n4(seed_count in 0u32..20, extra_budget in 0u32..40, seed in any::<u64>()) {
        terminates_exactly_on_the_reachable_set(4, seed_count, extra_budget, seed);
    }

    #[test]
    fn terminates_n8(seed_count in 0u32..20, extra_budget in 0u32..40, seed in any::<u64>()) {
        terminates_exactly_on_the_reachable_set(8, seed_count, extra_budget, seed);
    }
}

#[test]
fn empty_workload_terminates_immediately_on_every_peer() {
    for n in [1usize, 2, 4, 8] {
        let (outcomes, processed) = run_to_completion(n, 0, 0, 0, 0, 1);
        assert!(outcomes.iter().all(|o| *o == Outcome::Terminated));
        assert_eq!(processed, 0);
    }
}
