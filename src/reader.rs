//! Decodes a mapped snapshot buffer into a [`Heap`], eagerly materializing
//! everything except per-object attribute maps and string representations,
//! which are resolved on demand from saved file offsets rather than
//! captured in closures, so resolution is safe to call concurrently from
//! multiple workers.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::codec::{Cursor, MAGIC};
use crate::error::{FormatError, PyHeapResult};
use crate::schema::{
    Address, Attributes, Heap, HeapFlags, HeapHeader, HeapObject, HeapThread, HeapThreadFrame,
    ObjectContent, TypeId, WellKnownContainer,
};

#[derive(Debug)]
pub struct SnapshotReader<'a> {
    buf: &'a [u8],
    heap: Heap,
    frequent_attrs: Vec<String>,
    common_type_attrs: HashMap<TypeId, Vec<(String, Address)>>,
    data_skew_count: u64,
}

impl<'a> SnapshotReader<'a> {
    pub fn open(buf: &'a [u8]) -> PyHeapResult<Self> {
        let mut cur = Cursor::new(buf);

        let opening = cur.read_u64()?;
        if opening != MAGIC {
            return Err(FormatError::BadOpeningMagic {
                expected: MAGIC,
                found: opening,
            }
            .into());
        }

        let version = cur.read_u32()?;
        if version != HeapHeader::FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version).into());
        }
        let created_at = cur.read_long_string()?;
        let flags = HeapFlags::from_bits(cur.read_u64()?);

        let well_known_types = read_well_known_types(&mut cur)?;
        let threads = read_threads(&mut cur)?;
        let frequent_attrs = read_frequent_attrs(&mut cur)?;
        let common_type_attrs = read_common_types(&mut cur, &frequent_attrs)?;
        let common_type_ids: HashSet<TypeId> = common_type_attrs.keys().copied().collect();

        let objects = read_objects(
            &mut cur,
            &well_known_types,
            &common_type_ids,
            &frequent_attrs,
            flags.with_str_repr(),
        )?;

        let types = read_type_names(&mut cur)?;

        let closing = cur.read_u64()?;
        if closing != MAGIC {
            return Err(FormatError::BadClosingMagic {
                expected: MAGIC,
                found: closing,
            }
            .into());
        }

        let header = HeapHeader::new(created_at, flags, well_known_types);
        let heap = Heap::new(header, threads, objects, types);

        let data_skew_count = count_data_skew(&heap);
        if data_skew_count > 0 {
            warn!(
                count = data_skew_count,
                "snapshot references addresses absent from the object map (data skew)"
            );
        }

        Ok(SnapshotReader {
            buf,
            heap,
            frequent_attrs,
            common_type_attrs,
            data_skew_count,
        })
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn data_skew_count(&self) -> u64 {
        self.data_skew_count
    }

    /// Resolves an object's attribute map, following a shared common-type
    /// table or decoding the inline block at its saved offset.
    pub fn resolve_attributes(&self, obj: &HeapObject) -> PyHeapResult<Vec<(String, Address)>> {
        match obj.attributes() {
            Attributes::Shared(type_id) => Ok(self
                .common_type_attrs
                .get(type_id)
                .cloned()
                .unwrap_or_default()),
            Attributes::Inline(offset) => {
                let mut cur = Cursor::at(self.buf, *offset as usize);
                let count = cur.read_u32()?;
                let mut attrs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let name = cur.read_short_or_indexed_string(&self.frequent_attrs)?;
                    let addr = Address::from(cur.read_u64()?);
                    attrs.push((name, addr));
                }
                Ok(attrs)
            }
        }
    }

    /// The inline string representation stored for a non-container object,
    /// if the snapshot carries one. Containers are never stored inline;
    /// see [`crate::str_repr`] to synthesize theirs.
    pub fn inline_str_repr(&self, obj: &HeapObject) -> PyHeapResult<Option<String>> {
        match obj.str_repr_offset() {
            None => Ok(None),
            Some(offset) => {
                let mut cur = Cursor::at(self.buf, offset as usize);
                Ok(Some(cur.read_long_string()?))
            }
        }
    }
}

fn read_well_known_types(cur: &mut Cursor) -> PyHeapResult<HashMap<String, TypeId>> {
    let count = cur.read_u32()?;
    let mut map = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let name = cur.read_long_string()?;
        let type_id = Address::from(cur.read_u64()?);
        map.insert(name, type_id);
    }
    Ok(map)
}

fn read_threads(cur: &mut Cursor) -> PyHeapResult<Vec<HeapThread>> {
    let count = cur.read_u32()?;
    let mut threads = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = cur.read_long_string()?;
        let alive = cur.read_bool()?;
        let daemon = cur.read_bool()?;
        let frame_count = cur.read_u32()?;
        let mut frames = Vec::with_capacity(frame_count as usize);
        for _ in 0..frame_count {
            let filename = cur.read_long_string()?;
            let line = cur.read_u32()?;
            let function_name = cur.read_long_string()?;
            let local_count = cur.read_u32()?;
            let mut locals = Vec::with_capacity(local_count as usize);
            for _ in 0..local_count {
                let local_name = cur.read_long_string()?;
                let addr = Address::from(cur.read_u64()?);
                locals.push((local_name, addr));
            }
            frames.push(HeapThreadFrame::new(filename, line, function_name, locals));
        }
        threads.push(HeapThread::new(name, alive, daemon, frames));
    }
    Ok(threads)
}

fn read_frequent_attrs(cur: &mut Cursor) -> PyHeapResult<Vec<String>> {
    let count = cur.read_u32()?;
    if count as usize > 1 << 15 {
        return Err(FormatError::TooManyFrequentAttrs(count as usize).into());
    }
    let mut attrs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attrs.push(cur.read_short_or_indexed_string(&[])?);
    }
    Ok(attrs)
}

fn read_common_types(
    cur: &mut Cursor,
    frequent_attrs: &[String],
) -> PyHeapResult<HashMap<TypeId, Vec<(String, Address)>>> {
    let count = cur.read_u32()?;
    let mut map = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let type_id = Address::from(cur.read_u64()?);
        let attr_count = cur.read_u32()?;
        let mut attrs = Vec::with_capacity(attr_count as usize);
        for _ in 0..attr_count {
            let name = cur.read_short_or_indexed_string(frequent_attrs)?;
            let addr = Address::from(cur.read_u64()?);
            attrs.push((name, addr));
        }
        map.insert(type_id, attrs);
    }
    Ok(map)
}

fn well_known_container(
    well_known: &HashMap<String, TypeId>,
    type_id: TypeId,
) -> Option<WellKnownContainer> {
    for (name, container) in [
        ("dict", WellKnownContainer::Dict),
        ("list", WellKnownContainer::List),
        ("set", WellKnownContainer::Set),
        ("tuple", WellKnownContainer::Tuple),
    ] {
        if well_known.get(name) == Some(&type_id) {
            return Some(container);
        }
    }
    None
}

fn read_objects(
    cur: &mut Cursor,
    well_known: &HashMap<String, TypeId>,
    common_type_ids: &HashSet<TypeId>,
    frequent_attrs: &[String],
    with_str_repr: bool,
) -> PyHeapResult<HashMap<Address, HeapObject>> {
    let count = cur.read_u32()?;
    let mut objects = HashMap::with_capacity(count as usize);

    for _ in 0..count {
        let address = Address::from(cur.read_u64()?);
        let type_id = Address::from(cur.read_u64()?);
        let size = cur.read_u32()?;

        let container_kind = well_known_container(well_known, type_id);
        let mut referents = HashSet::new();
        let content = match container_kind {
            Some(WellKnownContainer::Dict) => {
                let pairs = cur.read_u32()?;
                let mut entries = Vec::with_capacity(pairs as usize);
                for _ in 0..pairs {
                    let k = Address::from(cur.read_u64()?);
                    let v = Address::from(cur.read_u64()?);
                    referents.insert(k);
                    referents.insert(v);
                    entries.push((k, v));
                }
                Some(ObjectContent::Dict(entries))
            }
            Some(kind @ (WellKnownContainer::List | WellKnownContainer::Set | WellKnownContainer::Tuple)) => {
                let n = cur.read_u32()?;
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let a = Address::from(cur.read_u64()?);
                    referents.insert(a);
                    items.push(a);
                }
                Some(match kind {
                    WellKnownContainer::List => ObjectContent::List(items),
                    WellKnownContainer::Set => ObjectContent::Set(items),
                    WellKnownContainer::Tuple => ObjectContent::Tuple(items),
                    WellKnownContainer::Dict => unreachable!(),
                })
            }
            None => None,
        };

        let extra_count = cur.read_u32()?;
        for _ in 0..extra_count {
            referents.insert(Address::from(cur.read_u64()?));
        }

        let attributes = if common_type_ids.contains(&type_id) {
            Attributes::Shared(type_id)
        } else {
            let block_offset = cur.position() as u32;
            let attr_count = cur.read_u32()?;
            for _ in 0..attr_count {
                let _name = cur.read_short_or_indexed_string(frequent_attrs)?;
                let _addr = cur.read_u64()?;
            }
            Attributes::Inline(block_offset)
        };

        let str_repr_offset = if with_str_repr && container_kind.is_none() {
            let offset = cur.position() as u32;
            cur.read_long_string()?;
            Some(offset)
        } else {
            None
        };

        objects.insert(
            address,
            HeapObject::new(
                address,
                type_id,
                size,
                referents,
                content,
                attributes,
                str_repr_offset,
            ),
        );
    }

    Ok(objects)
}

fn read_type_names(cur: &mut Cursor) -> PyHeapResult<HashMap<TypeId, String>> {
    let count = cur.read_u32()?;
    let mut map = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let type_id = Address::from(cur.read_u64()?);
        let name = cur.read_long_string()?;
        map.insert(type_id, name);
    }
    Ok(map)
}

fn count_data_skew(heap: &Heap) -> u64 {
    let mut count = 0u64;
    for obj in heap.objects().values() {
        for referent in obj.referents() {
            if !heap.objects().contains_key(referent) {
                count += 1;
            }
        }
    }
    for thread in heap.threads() {
        for local in thread.locals() {
            if !heap.objects().contains_key(&local) {
                count += 1;
            }
        }
    }
    count
}
