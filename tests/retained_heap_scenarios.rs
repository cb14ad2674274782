//! Retained-size scenarios: simple chains, shared objects, self-references,
//! pure cycles, and per-thread retained size. Also checks that the
//! sequential and parallel calculators always agree.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use pyheap::inbound_index::InboundIndex;
use pyheap::retained_heap::RetainedHeapEngine;
use pyheap::schema::{Address, HeapThread, HeapThreadFrame};
use pyheap::writer::{PendingObject, SnapshotWriter};
use pyheap::SnapshotReader;

/// `objects` is `(address, size, referents)`; no containers, no threads
/// unless supplied separately.
fn build_snapshot(objects: &[(u64, u32, &[u64])], threads: Vec<HeapThread>) -> Vec<u8> {
    let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()), "now", false).unwrap();
    writer.write_well_known_types(&HashMap::new()).unwrap();
    writer.write_threads(&threads).unwrap();
    writer.write_frequent_attributes(&[]).unwrap();
    writer.write_common_types(&[]).unwrap();
    writer.begin_objects().unwrap();
    for (addr, size, referents) in objects {
        let extra: HashSet<Address> = referents.iter().map(|r| Address::from(*r)).collect();
        writer
            .write_object(&PendingObject {
                address: Address::from(*addr),
                type_id: Address::from(0),
                size: *size,
                content: None,
                extra_referents: &extra,
                attributes: &[],
                str_repr: None,
            })
            .unwrap();
    }
    writer.finish_objects().unwrap();
    writer.write_type_names(&HashMap::new()).unwrap();
    writer.finish().unwrap().into_inner()
}

fn calculate(bytes: &[u8]) -> pyheap::retained_heap::RetainedHeap {
    let reader = SnapshotReader::open(bytes).unwrap();
    let heap = reader.heap();
    let inbound = InboundIndex::build(heap);
    let engine = RetainedHeapEngine::new(heap, &inbound);
    engine.calculate(false, 10_000)
}

#[test]
fn simple_chain() {
    let bytes = build_snapshot(&[(1, 10, &[2]), (2, 20, &[])], vec![]);
    let r = calculate(&bytes);
    assert_eq!(r.get_for_object(Address::from(1)), Some(30));
    assert_eq!(r.get_for_object(Address::from(2)), Some(20));
}

#[test]
fn shared_objects_are_not_retained_by_either_parent_alone() {
    // 1 -> {3,4}, 2 -> {3,4}, sizes 10,20,30,40.
    let bytes = build_snapshot(
        &[(1, 10, &[3, 4]), (2, 20, &[3, 4]), (3, 30, &[]), (4, 40, &[])],
        vec![],
    );
    let r = calculate(&bytes);
    assert_eq!(r.get_for_object(Address::from(1)), Some(10));
    assert_eq!(r.get_for_object(Address::from(2)), Some(20));
    assert_eq!(r.get_for_object(Address::from(3)), Some(30));
    assert_eq!(r.get_for_object(Address::from(4)), Some(40));
}

#[test]
fn long_chain_with_off_branch() {
    // 1 -> {2,7}, 2 -> 3 -> 4 -> 5 -> 6, sizes 10..60, 70.
    let bytes = build_snapshot(
        &[
            (1, 10, &[2, 7]),
            (2, 20, &[3]),
            (3, 30, &[4]),
            (4, 40, &[5]),
            (5, 50, &[6]),
            (6, 60, &[]),
            (7, 70, &[]),
        ],
        vec![],
    );
    let r = calculate(&bytes);
    assert_eq!(r.get_for_object(Address::from(1)), Some(280));
    assert_eq!(r.get_for_object(Address::from(2)), Some(200));
    assert_eq!(r.get_for_object(Address::from(3)), Some(180));
    assert_eq!(r.get_for_object(Address::from(4)), Some(150));
    assert_eq!(r.get_for_object(Address::from(5)), Some(110));
    assert_eq!(r.get_for_object(Address::from(6)), Some(60));
    assert_eq!(r.get_for_object(Address::from(7)), Some(70));
}

#[test]
fn self_reference_retains_only_its_own_size() {
    let bytes = build_snapshot(&[(1, 42, &[1])], vec![]);
    let r = calculate(&bytes);
    assert_eq!(r.get_for_object(Address::from(1)), Some(42));
}

#[test]
fn pure_cycle_retains_the_whole_cycle_at_every_node() {
    let bytes = build_snapshot(&[(1, 10, &[2]), (2, 20, &[3]), (3, 30, &[1])], vec![]);
    let r = calculate(&bytes);
    assert_eq!(r.get_for_object(Address::from(1)), Some(60));
    assert_eq!(r.get_for_object(Address::from(2)), Some(60));
    assert_eq!(r.get_for_object(Address::from(3)), Some(60));
}

#[test]
fn disconnected_subgraphs_are_independent() {
    let bytes = build_snapshot(&[(1, 10, &[2]), (2, 20, &[]), (3, 5, &[])], vec![]);
    let r = calculate(&bytes);
    assert_eq!(r.get_for_object(Address::from(1)), Some(30));
    assert_eq!(r.get_for_object(Address::from(3)), Some(5));
}

#[test]
fn two_threads_each_retain_only_their_own_local() {
    let frame1 = HeapThreadFrame::new(
        "a.py".to_string(),
        1,
        "f".to_string(),
        vec![("x".to_string(), Address::from(1))],
    );
    let frame2 = HeapThreadFrame::new(
        "b.py".to_string(),
        1,
        "g".to_string(),
        vec![("y".to_string(), Address::from(2))],
    );
    let threads = vec![
        HeapThread::new("thread1".to_string(), true, false, vec![frame1]),
        HeapThread::new("thread2".to_string(), true, false, vec![frame2]),
    ];
    let bytes = build_snapshot(&[(1, 10, &[]), (2, 20, &[])], threads);
    let r = calculate(&bytes);
    assert_eq!(r.get_for_thread("thread1"), Some(10));
    assert_eq!(r.get_for_thread("thread2"), Some(20));
}

#[test]
fn a_local_also_reachable_from_the_graph_is_not_double_retained() {
    // object 1 holds object 2 (which is also thread1's local): removing
    // the thread alone must not free object 2, since object 1 still
    // references it.
    let frame = HeapThreadFrame::new(
        "a.py".to_string(),
        1,
        "f".to_string(),
        vec![("y".to_string(), Address::from(2))],
    );
    let threads = vec![HeapThread::new(
        "thread1".to_string(),
        true,
        false,
        vec![frame],
    )];
    let bytes = build_snapshot(&[(1, 10, &[2]), (2, 20, &[])], threads);
    let r = calculate(&bytes);
    assert_eq!(r.get_for_thread("thread1"), Some(0));
}

#[test]
fn sequential_and_parallel_calculators_agree() {
    // A moderately branchy synthetic graph so the parallel chunking path
    // actually exercises more than one chunk.
    let mut refs: HashMap<u64, Vec<u64>> = HashMap::new();
    for i in 1..200u64 {
        refs.entry(i).or_default().push(i + 1);
        if i % 7 == 0 && i > 10 {
            refs.entry(i).or_default().push(i - 10);
        }
    }
    let empty = Vec::new();
    let owned: Vec<(u64, u32, Vec<u64>)> = (1..=200u64)
        .map(|i| (i, (i % 50 + 1) as u32, refs.get(&i).unwrap_or(&empty).clone()))
        .collect();
    let borrowed: Vec<(u64, u32, &[u64])> =
        owned.iter().map(|(a, s, r)| (*a, *s, r.as_slice())).collect();

    let bytes = build_snapshot(&borrowed, vec![]);
    let reader = SnapshotReader::open(&bytes).unwrap();
    let heap = reader.heap();
    let inbound = InboundIndex::build(heap);
    let engine = RetainedHeapEngine::new(heap, &inbound);

    let sequential = engine.calculate(false, 10_000);
    let parallel = engine.calculate(true, 32);
    assert_eq!(sequential, parallel);
}
