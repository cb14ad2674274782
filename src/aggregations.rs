//! Sorted views over a decoded heap and its computed retained sizes.

use crate::retained_heap::RetainedHeap;
use crate::schema::{Address, Heap};

/// Objects ordered by descending retained size, tie-broken by ascending
/// address.
pub fn objects_by_retained_heap(retained: &RetainedHeap) -> Vec<(Address, u64)> {
    let mut rows: Vec<(Address, u64)> = retained
        .objects()
        .iter()
        .map(|(addr, size)| (*addr, *size))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    rows
}

/// Sum of retained size per type, ordered by descending total.
pub fn types_by_retained_heap(heap: &Heap, retained: &RetainedHeap) -> Vec<(Address, u64)> {
    let mut totals = std::collections::HashMap::new();
    for (addr, obj) in heap.objects() {
        let size = retained.get_for_object(*addr).unwrap_or(0);
        *totals.entry(obj.type_id()).or_insert(0u64) += size;
    }
    let mut rows: Vec<(Address, u64)> = totals.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    rows
}

/// Threads ordered by descending retained size, tie-broken by name.
pub fn threads_by_retained_heap(retained: &RetainedHeap) -> Vec<(String, u64)> {
    let mut rows: Vec<(String, u64)> = retained
        .threads()
        .iter()
        .map(|(name, size)| (name.clone(), *size))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    rows
}
