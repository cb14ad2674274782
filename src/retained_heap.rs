//! Retained-size calculation: how much heap becomes unreachable if a given
//! object, or a given thread's locals, disappeared.
//!
//! Phase 1 collapses strict subtrees (objects with at most one inbound edge
//! whose referents are themselves already subtree roots) to their cheap
//! recursive sum. Phase 2 falls back to simulated deletion for everything
//! else: walk the object's reference graph decrementing an inbound view
//! count per edge severed, and sum the sizes of whatever hits zero. Phase 3
//! repeats Phase 2 per thread, seeding every local as a root at once.
//! Simulated deletion runs sequentially or, via `rayon` over a shuffled
//! chunked address list, in parallel — both paths must agree exactly.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::inbound_index::InboundIndex;
use crate::schema::{Address, Heap};

/// The computed retained size of every object and every thread in one
/// snapshot. Cheap to compare for equality (used to assert sequential and
/// parallel calculators agree) and to (de)serialize for the on-disk cache.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetainedHeap {
    objects: HashMap<Address, u64>,
    threads: HashMap<String, u64>,
}

impl RetainedHeap {
    pub fn get_for_object(&self, address: Address) -> Option<u64> {
        self.objects.get(&address).copied()
    }

    pub fn get_for_thread(&self, name: &str) -> Option<u64> {
        self.threads.get(name).copied()
    }

    pub fn objects(&self) -> &HashMap<Address, u64> {
        &self.objects
    }

    pub fn threads(&self) -> &HashMap<String, u64> {
        &self.threads
    }
}

/// Passed as `chunk_size` to [`RetainedHeapEngine::calculate`] to let the
/// parallel calculator size its own chunks from the detected core count
/// instead of a fixed figure.
pub const DEFAULT_CHUNK_SIZE: usize = 0;

pub struct RetainedHeapEngine<'a> {
    heap: &'a Heap,
    inbound: &'a InboundIndex,
}

impl<'a> RetainedHeapEngine<'a> {
    pub fn new(heap: &'a Heap, inbound: &'a InboundIndex) -> Self {
        RetainedHeapEngine { heap, inbound }
    }

    pub fn calculate(&self, parallel: bool, chunk_size: usize) -> RetainedHeap {
        let subtree_roots = self.find_strict_subtrees();
        info!(
            subtree_roots = subtree_roots.len(),
            objects = self.heap.objects().len(),
            "strict-subtree precomputation finished"
        );

        let objects = if parallel {
            self.calculate_for_all_objects_parallel(&subtree_roots, chunk_size)
        } else {
            self.calculate_for_all_objects_sequential(&subtree_roots)
        };

        let threads = self.calculate_for_all_threads();

        RetainedHeap { objects, threads }
    }

    /// Phase 1: a strict subtree root is an object with at most one inbound
    /// reference whose every forward referent is itself already a subtree
    /// root. Returns the retained size of every such root.
    fn find_strict_subtrees(&self) -> HashMap<Address, u64> {
        let mut roots: HashMap<Address, u64> = HashMap::new();
        let mut queue: VecDeque<Address> = self
            .heap
            .objects()
            .keys()
            .filter(|a| self.inbound.inbound_count(**a) <= 1)
            .copied()
            .collect();
        let mut queued: HashSet<Address> = queue.iter().copied().collect();

        while let Some(addr) = queue.pop_front() {
            queued.remove(&addr);
            if roots.contains_key(&addr) {
                continue;
            }
            if self.inbound.inbound_count(addr) > 1 {
                continue;
            }
            let obj = match self.heap.objects().get(&addr) {
                Some(o) => o,
                None => continue,
            };

            let ready = obj
                .referents()
                .iter()
                .all(|r| roots.contains_key(r) || !self.heap.objects().contains_key(r));
            if !ready {
                continue;
            }

            let retained = obj.size() as u64
                + obj
                    .referents()
                    .iter()
                    .filter_map(|r| roots.get(r))
                    .sum::<u64>();
            roots.insert(addr, retained);

            if let Some(referrers) = self.inbound.inbound(addr) {
                for referrer in referrers {
                    if !roots.contains_key(referrer)
                        && self.inbound.inbound_count(*referrer) <= 1
                        && !queued.contains(referrer)
                    {
                        queue.push_back(*referrer);
                        queued.insert(*referrer);
                    }
                }
            }
        }

        roots
    }

    fn calculate_for_all_objects_sequential(
        &self,
        subtree_roots: &HashMap<Address, u64>,
    ) -> HashMap<Address, u64> {
        self.heap
            .objects()
            .keys()
            .map(|addr| (*addr, self.retained_for_object(*addr, subtree_roots)))
            .collect()
    }

    fn calculate_for_all_objects_parallel(
        &self,
        subtree_roots: &HashMap<Address, u64>,
        chunk_size: usize,
    ) -> HashMap<Address, u64> {
        let mut addresses: Vec<Address> = self.heap.objects().keys().copied().collect();
        // Randomize order before chunking so that one worker does not get
        // stuck with a cluster of unusually expensive objects.
        addresses.shuffle(&mut rand::thread_rng());
        // `chunk_size == 0` means "let the engine pick one", sized so that
        // every available core gets a handful of chunks rather than one.
        let chunk_size = if chunk_size == 0 {
            (addresses.len() / (num_cpus::get() * 4)).max(1)
        } else {
            chunk_size
        };

        addresses
            .par_chunks(chunk_size)
            .flat_map_iter(|chunk| {
                chunk
                    .iter()
                    .map(|addr| (*addr, self.retained_for_object(*addr, subtree_roots)))
            })
            .collect()
    }

    /// Phase 2: retained size of a single object via simulated deletion.
    /// Subtree roots computed in Phase 1 are used as shortcuts.
    fn retained_for_object(&self, start: Address, subtree_roots: &HashMap<Address, u64>) -> u64 {
        if let Some(&precomputed) = subtree_roots.get(&start) {
            return precomputed;
        }
        self.simulate_deletion(vec![(start, 0)], &HashMap::new(), Some(subtree_roots))
    }

    fn calculate_for_all_threads(&self) -> HashMap<String, u64> {
        let holder_count = self.thread_local_holder_count();

        self.heap
            .threads()
            .iter()
            .map(|thread| {
                let locals = thread.locals();
                let extra_view: HashMap<Address, i64> = locals
                    .iter()
                    .map(|addr| {
                        let others = holder_count.get(addr).copied().unwrap_or(1).saturating_sub(1);
                        (*addr, others as i64)
                    })
                    .collect();
                let seeds: Vec<(Address, i64)> = locals
                    .iter()
                    .map(|addr| {
                        let global = self.inbound.inbound_count(*addr) as i64;
                        let extra = extra_view.get(addr).copied().unwrap_or(0);
                        (*addr, global + extra)
                    })
                    .collect();
                // Subtree shortcuts assume a single-root deletion and are
                // disabled here.
                let retained = self.simulate_deletion(seeds, &extra_view, None);
                (thread.name().clone(), retained)
            })
            .collect()
    }

    fn thread_local_holder_count(&self) -> HashMap<Address, usize> {
        let mut count = HashMap::new();
        for thread in self.heap.threads() {
            for addr in thread.locals() {
                *count.entry(addr).or_insert(0) += 1;
            }
        }
        count
    }

    /// Shared simulated-deletion sweep used by both Phase 2 and Phase 3.
    ///
    /// `seeds` carries each root's *forced* initial view count: Phase 2
    /// forces it to zero (the object is unconditionally considered gone),
    /// Phase 3 seeds it with the address's remaining external holders
    /// (other objects' referents plus other threads), so a local still
    /// reachable another way never gets counted.
    fn simulate_deletion(
        &self,
        seeds: Vec<(Address, i64)>,
        extra_view: &HashMap<Address, i64>,
        subtree_roots: Option<&HashMap<Address, u64>>,
    ) -> u64 {
        let mut view: HashMap<Address, i64> = HashMap::new();
        let mut visited: HashSet<Address> = HashSet::new();
        let mut stack: Vec<Address> = Vec::new();
        let mut total = 0u64;

        for (addr, initial) in seeds {
            view.insert(addr, initial);
            stack.push(addr);
        }

        while let Some(addr) = stack.pop() {
            if visited.contains(&addr) {
                continue;
            }
            let current_view = *view.get(&addr).unwrap_or(&0);
            if current_view > 0 {
                continue;
            }
            let obj = match self.heap.objects().get(&addr) {
                Some(o) => o,
                None => {
                    visited.insert(addr);
                    continue;
                }
            };
            visited.insert(addr);

            if let Some(roots) = subtree_roots {
                if let Some(&precomputed) = roots.get(&addr) {
                    total += precomputed;
                    continue;
                }
            }

            total += obj.size() as u64;

            for referent in obj.referents() {
                if visited.contains(referent) {
                    continue;
                }
                // First touch seeds the view with every inbound edge this
                // referent currently has (plus any other-thread holders);
                // the decrement just below accounts for severing the one
                // edge from the parent we are visiting right now. A shared
                // referent with more than one surviving inbound edge must
                // not reach zero after a single parent is processed.
                let entry = view.entry(*referent).or_insert_with(|| {
                    let global = self.inbound.inbound_count(*referent) as i64;
                    let extra = extra_view.get(referent).copied().unwrap_or(0);
                    global + extra
                });
                *entry -= 1;
                stack.push(*referent);
            }
        }

        total
    }
}
