//! Reverse adjacency over a decoded heap: for every object `a` that appears
//! as a key in the heap, `index[a]` holds every `b` with `a` in
//! `b.referents()`.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::schema::{Address, Heap};

pub struct InboundIndex {
    index: HashMap<Address, HashSet<Address>>,
}

impl InboundIndex {
    pub fn build(heap: &Heap) -> Self {
        let mut index: HashMap<Address, HashSet<Address>> = heap
            .objects()
            .keys()
            .map(|addr| (*addr, HashSet::new()))
            .collect();

        for (address, obj) in heap.objects() {
            for referent in obj.referents() {
                // Unknown referents (data skew) simply never gain an entry
                // of their own; they are not objects in this snapshot.
                if let Some(inbound) = index.get_mut(referent) {
                    inbound.insert(*address);
                }
            }
        }

        info!(objects = index.len(), "built inbound reference index");
        InboundIndex { index }
    }

    pub fn inbound_count(&self, address: Address) -> usize {
        self.index.get(&address).map(HashSet::len).unwrap_or(0)
    }

    pub fn inbound(&self, address: Address) -> Option<&HashSet<Address>> {
        self.index.get(&address)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.index.contains_key(&address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;
    use std::collections::HashMap as Map;

    fn obj(addr: u64, referents: &[u64]) -> HeapObject {
        HeapObject::new(
            Address::from(addr),
            Address::from(0),
            10,
            referents.iter().map(|r| Address::from(*r)).collect(),
            None,
            Attributes::Inline(0),
            None,
        )
    }

    fn tiny_heap(objects: Vec<HeapObject>) -> Heap {
        let mut map = Map::new();
        for o in objects {
            map.insert(o.address(), o);
        }
        Heap::new(
            HeapHeader::new(
                "2026-01-01T00:00:00Z".into(),
                HeapFlags::new(false),
                Map::new(),
            ),
            vec![],
            map,
            Map::new(),
        )
    }

    #[test]
    fn self_reference_preserved() {
        let heap = tiny_heap(vec![obj(1, &[1])]);
        let idx = InboundIndex::build(&heap);
        assert_eq!(idx.inbound_count(Address::from(1)), 1);
        assert!(idx.inbound(Address::from(1)).unwrap().contains(&Address::from(1)));
    }

    #[test]
    fn every_object_has_an_entry() {
        let heap = tiny_heap(vec![obj(1, &[]), obj(2, &[])]);
        let idx = InboundIndex::build(&heap);
        assert!(idx.contains(Address::from(1)));
        assert!(idx.contains(Address::from(2)));
        assert_eq!(idx.inbound_count(Address::from(1)), 0);
    }

    #[test]
    fn unknown_referent_is_tolerated() {
        let heap = tiny_heap(vec![obj(1, &[99])]);
        let idx = InboundIndex::build(&heap);
        assert!(!idx.contains(Address::from(99)));
    }
}
