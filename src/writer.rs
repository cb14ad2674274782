//! Streams a heap snapshot to a `Write + Seek` sink in the fixed section
//! order the format requires: header, threads, frequent attributes, common
//! types, object stream (with a backpatched count), type-name table,
//! footer. Pure byte plumbing: decisions about object visibility, shallow
//! size, or how to format a string representation belong to the external
//! walker that calls these primitives.

use std::collections::{HashMap, HashSet};
use std::io::{self, Seek, Write};

use chrono::Utc;

use crate::codec::{self, Mark, MAGIC};
use crate::schema::{Address, HeapThread, ObjectContent, TypeId};

/// The `created_at` value a fresh snapshot gets when the caller has no
/// timestamp of their own to supply (see [`SnapshotWriter::new_now`]).
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Everything about one object the writer needs in order to emit it; this is
/// the collaborator-facing shape, distinct from [`crate::schema::HeapObject`]
/// which is what the reader produces (referents there are the union of
/// container content and extra referents; here they are kept separate
/// because that is how the wire format lays them out).
pub struct PendingObject<'a> {
    pub address: Address,
    pub type_id: TypeId,
    pub size: u32,
    pub content: Option<ObjectContent>,
    pub extra_referents: &'a HashSet<Address>,
    pub attributes: &'a [(String, Address)],
    pub str_repr: Option<&'a str>,
}

pub struct SnapshotWriter<W: Write + Seek> {
    out: W,
    frequent_index: HashMap<String, usize>,
    common_type_ids: HashSet<TypeId>,
    with_str_repr: bool,
    object_count_mark: Option<Mark>,
    object_count: u32,
}

impl<W: Write + Seek> SnapshotWriter<W> {
    pub fn new(mut out: W, created_at: &str, with_str_repr: bool) -> io::Result<Self> {
        codec::write_u64(&mut out, MAGIC)?;
        codec::write_u32(&mut out, crate::schema::HeapHeader::FORMAT_VERSION)?;
        codec::write_long_string(&mut out, created_at)?;
        codec::write_u64(
            &mut out,
            crate::schema::HeapFlags::new(with_str_repr).to_bits(),
        )?;
        Ok(SnapshotWriter {
            out,
            frequent_index: HashMap::new(),
            common_type_ids: HashSet::new(),
            with_str_repr,
            object_count_mark: None,
            object_count: 0,
        })
    }

    /// Convenience entry point for a writer stamping the snapshot with the
    /// current wall-clock time rather than a caller-supplied value.
    pub fn new_now(out: W, with_str_repr: bool) -> io::Result<Self> {
        Self::new(out, &now_iso8601(), with_str_repr)
    }

    pub fn write_well_known_types(
        &mut self,
        well_known: &HashMap<String, TypeId>,
    ) -> io::Result<()> {
        codec::write_u32(&mut self.out, well_known.len() as u32)?;
        for (name, type_id) in well_known {
            codec::write_long_string(&mut self.out, name)?;
            codec::write_u64(&mut self.out, type_id.value())?;
        }
        Ok(())
    }

    pub fn write_threads(&mut self, threads: &[HeapThread]) -> io::Result<()> {
        codec::write_u32(&mut self.out, threads.len() as u32)?;
        for thread in threads {
            codec::write_long_string(&mut self.out, thread.name())?;
            codec::write_bool(&mut self.out, thread.alive())?;
            codec::write_bool(&mut self.out, thread.daemon())?;
            codec::write_u32(&mut self.out, thread.stack_trace().len() as u32)?;
            for frame in thread.stack_trace() {
                codec::write_long_string(&mut self.out, frame.filename())?;
                codec::write_u32(&mut self.out, frame.line())?;
                codec::write_long_string(&mut self.out, frame.function_name())?;
                codec::write_u32(&mut self.out, frame.locals().len() as u32)?;
                for (name, addr) in frame.locals() {
                    codec::write_long_string(&mut self.out, name)?;
                    codec::write_u64(&mut self.out, addr.value())?;
                }
            }
        }
        Ok(())
    }

    /// `attrs` should favor names expected to recur across many objects
    /// (built-in dunder/method names); the caller selects and truncates to
    /// at most 2^15 entries, longest names first, mirroring how the walker
    /// builds the table from `dir()` of the built-in types.
    pub fn write_frequent_attributes(&mut self, attrs: &[String]) -> io::Result<()> {
        assert!(attrs.len() <= 1 << 15, "frequent-attribute table overflow");
        codec::write_u32(&mut self.out, attrs.len() as u32)?;
        for (i, attr) in attrs.iter().enumerate() {
            codec::write_short_or_indexed_string(&mut self.out, attr, None)?;
            self.frequent_index.insert(attr.clone(), i);
        }
        Ok(())
    }

    pub fn write_common_types(
        &mut self,
        common: &[(TypeId, Vec<(String, Address)>)],
    ) -> io::Result<()> {
        codec::write_u32(&mut self.out, common.len() as u32)?;
        for (type_id, attrs) in common {
            self.common_type_ids.insert(*type_id);
            codec::write_u64(&mut self.out, type_id.value())?;
            codec::write_u32(&mut self.out, attrs.len() as u32)?;
            for (name, addr) in attrs {
                self.write_attr_name(name)?;
                codec::write_u64(&mut self.out, addr.value())?;
            }
        }
        Ok(())
    }

    pub fn begin_objects(&mut self) -> io::Result<()> {
        self.object_count_mark = Some(codec::reserve_u32_mark(&mut self.out)?);
        Ok(())
    }

    pub fn write_object(&mut self, obj: &PendingObject) -> io::Result<()> {
        codec::write_u64(&mut self.out, obj.address.value())?;
        codec::write_u64(&mut self.out, obj.type_id.value())?;
        codec::write_u32(&mut self.out, obj.size)?;

        if let Some(content) = &obj.content {
            self.write_container_payload(content)?;
        }

        codec::write_u32(&mut self.out, obj.extra_referents.len() as u32)?;
        for referent in obj.extra_referents {
            codec::write_u64(&mut self.out, referent.value())?;
        }

        if !self.common_type_ids.contains(&obj.type_id) {
            codec::write_u32(&mut self.out, obj.attributes.len() as u32)?;
            for (name, addr) in obj.attributes {
                self.write_attr_name(name)?;
                codec::write_u64(&mut self.out, addr.value())?;
            }
        }

        if self.with_str_repr && obj.content.is_none() {
            let repr = obj.str_repr.unwrap_or_default();
            codec::write_long_string(&mut self.out, repr)?;
        }

        self.object_count += 1;
        Ok(())
    }

    fn write_container_payload(&mut self, content: &ObjectContent) -> io::Result<()> {
        match content {
            ObjectContent::Dict(pairs) => {
                codec::write_u32(&mut self.out, pairs.len() as u32)?;
                for (k, v) in pairs {
                    codec::write_u64(&mut self.out, k.value())?;
                    codec::write_u64(&mut self.out, v.value())?;
                }
            }
            ObjectContent::List(items) | ObjectContent::Set(items) | ObjectContent::Tuple(items) => {
                codec::write_u32(&mut self.out, items.len() as u32)?;
                for item in items {
                    codec::write_u64(&mut self.out, item.value())?;
                }
            }
        }
        Ok(())
    }

    fn write_attr_name(&mut self, name: &str) -> io::Result<()> {
        let idx = self.frequent_index.get(name).copied();
        codec::write_short_or_indexed_string(&mut self.out, name, idx)
    }

    pub fn finish_objects(&mut self) -> io::Result<()> {
        let mark = self
            .object_count_mark
            .take()
            .expect("begin_objects must be called before finish_objects");
        codec::close_u32_mark(&mut self.out, mark, self.object_count)
    }

    pub fn write_type_names(&mut self, types: &HashMap<TypeId, String>) -> io::Result<()> {
        codec::write_u32(&mut self.out, types.len() as u32)?;
        for (type_id, name) in types {
            codec::write_u64(&mut self.out, type_id.value())?;
            codec::write_long_string(&mut self.out, name)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        codec::write_u64(&mut self.out, MAGIC)?;
        Ok(self.out)
    }
}
