//! Shared entity and tag definitions used by both the writer and the reader.
//!
//! Addresses are a thin `Copy` wrapper around the wire integer, with
//! `getset::CopyGetters` for the accessor and a `From<u64>` conversion,
//! rather than exposing the raw `u64` everywhere.

use std::collections::{HashMap, HashSet};
use std::fmt;

use getset::{CopyGetters, Getters};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque identifier of an object within one snapshot. Not a real pointer;
/// equality is the only operation callers may rely on.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, CopyGetters)]
pub struct Address {
    #[getset(get_copy = "pub")]
    value: u64,
}

impl Address {
    pub fn new(value: u64) -> Self {
        Address { value }
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({:#x})", self.value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.value)
    }
}

// Serialized as a bare integer (not a `{value: ...}` object) so that an
// `Address` can be used directly as a JSON object key in the retained-heap
// cache record.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.value)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Address::new)
    }
}

/// An [`Address`] that happens to name a type object. Types are also
/// ordinary objects in the object map, so this is a bare alias rather than a
/// distinct wire representation.
pub type TypeId = Address;

/// The built-in container shapes that get structured inline encoding instead
/// of a generic attribute map.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum WellKnownContainer {
    Dict,
    List,
    Set,
    Tuple,
}

impl WellKnownContainer {
    pub fn type_name(self) -> &'static str {
        match self {
            WellKnownContainer::Dict => "dict",
            WellKnownContainer::List => "list",
            WellKnownContainer::Set => "set",
            WellKnownContainer::Tuple => "tuple",
        }
    }
}

/// The canonical scalar/container types whose instances share one
/// type-level attribute map instead of carrying their own.
pub const COMMON_TYPE_NAMES: [&str; 8] = [
    "int", "float", "bool", "str", "bytes", "list", "set", "dict",
];

/// The full set of names a snapshot's well-known-types table must cover.
pub const WELL_KNOWN_TYPE_NAMES: [&str; 13] = [
    "dict", "list", "set", "tuple", "str", "bytes", "bytearray", "int", "bool", "float",
    "object", "type", "NoneType",
];

/// Decoded content of a well-known container. Element addresses here are
/// duplicated into the owning object's `referents` set by the reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectContent {
    Dict(Vec<(Address, Address)>),
    List(Vec<Address>),
    Set(Vec<Address>),
    Tuple(Vec<Address>),
}

/// Where an object's attribute map lives. Common-type instances never carry
/// their own inline block; they point at the type's shared table instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attributes {
    Shared(TypeId),
    Inline(AttrOffset),
}

/// Byte offset into the mapped snapshot of an inline attribute block, or of
/// a string representation. Resolved lazily by [`crate::reader::SnapshotReader`].
pub type AttrOffset = u32;

/// A decoded object. `attributes` and `str_repr` are never populated eagerly
/// by the reader: they carry either a shared type reference or a file
/// offset, resolved on demand via explicit accessor functions that take the
/// mapped buffer as an argument (see `reader::resolve_attributes`).
#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct HeapObject {
    #[getset(get_copy = "pub")]
    address: Address,
    #[getset(get_copy = "pub")]
    type_id: TypeId,
    #[getset(get_copy = "pub")]
    size: u32,
    #[getset(get = "pub")]
    referents: HashSet<Address>,
    #[getset(get = "pub")]
    content: Option<ObjectContent>,
    #[getset(get = "pub")]
    attributes: Attributes,
    str_repr_offset: Option<AttrOffset>,
}

impl HeapObject {
    pub fn new(
        address: Address,
        type_id: TypeId,
        size: u32,
        referents: HashSet<Address>,
        content: Option<ObjectContent>,
        attributes: Attributes,
        str_repr_offset: Option<AttrOffset>,
    ) -> Self {
        HeapObject {
            address,
            type_id,
            size,
            referents,
            content,
            attributes,
            str_repr_offset,
        }
    }

    pub fn is_container(&self) -> bool {
        self.content.is_some()
    }

    pub fn str_repr_offset(&self) -> Option<AttrOffset> {
        self.str_repr_offset
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Getters, CopyGetters)]
pub struct HeapThreadFrame {
    #[getset(get = "pub")]
    filename: String,
    #[getset(get_copy = "pub")]
    line: u32,
    #[getset(get = "pub")]
    function_name: String,
    #[getset(get = "pub")]
    locals: Vec<(String, Address)>,
}

impl HeapThreadFrame {
    pub fn new(
        filename: String,
        line: u32,
        function_name: String,
        locals: Vec<(String, Address)>,
    ) -> Self {
        HeapThreadFrame {
            filename,
            line,
            function_name,
            locals,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Getters, CopyGetters)]
pub struct HeapThread {
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    alive: bool,
    #[getset(get_copy = "pub")]
    daemon: bool,
    #[getset(get = "pub")]
    stack_trace: Vec<HeapThreadFrame>,
}

impl HeapThread {
    pub fn new(name: String, alive: bool, daemon: bool, stack_trace: Vec<HeapThreadFrame>) -> Self {
        HeapThread {
            name,
            alive,
            daemon,
            stack_trace,
        }
    }

    /// The union of every local in every frame of this thread's stack.
    pub fn locals(&self) -> HashSet<Address> {
        self.stack_trace
            .iter()
            .flat_map(|frame| frame.locals.iter().map(|(_, addr)| *addr))
            .collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Default, CopyGetters)]
pub struct HeapFlags {
    #[getset(get_copy = "pub")]
    with_str_repr: bool,
}

impl HeapFlags {
    pub fn new(with_str_repr: bool) -> Self {
        HeapFlags { with_str_repr }
    }

    pub fn to_bits(self) -> u64 {
        if self.with_str_repr {
            1
        } else {
            0
        }
    }

    pub fn from_bits(bits: u64) -> Self {
        HeapFlags {
            with_str_repr: bits & 1 != 0,
        }
    }
}

#[derive(Clone, Debug, Getters)]
pub struct HeapHeader {
    #[getset(get = "pub")]
    created_at: String,
    #[getset(get = "pub")]
    flags: HeapFlags,
    #[getset(get = "pub")]
    well_known_types: HashMap<String, TypeId>,
}

impl HeapHeader {
    pub const FORMAT_VERSION: u32 = 1;

    pub fn new(
        created_at: String,
        flags: HeapFlags,
        well_known_types: HashMap<String, TypeId>,
    ) -> Self {
        HeapHeader {
            created_at,
            flags,
            well_known_types,
        }
    }

}

/// A fully decoded snapshot.
#[derive(Clone, Debug, Getters)]
pub struct Heap {
    #[getset(get = "pub")]
    header: HeapHeader,
    #[getset(get = "pub")]
    threads: Vec<HeapThread>,
    #[getset(get = "pub")]
    objects: HashMap<Address, HeapObject>,
    #[getset(get = "pub")]
    types: HashMap<TypeId, String>,
}

impl Heap {
    pub fn new(
        header: HeapHeader,
        threads: Vec<HeapThread>,
        objects: HashMap<Address, HeapObject>,
        types: HashMap<TypeId, String>,
    ) -> Self {
        Heap {
            header,
            threads,
            objects,
            types,
        }
    }

    pub fn total_heap_size(&self) -> u64 {
        self.objects.values().map(|o| o.size() as u64).sum()
    }
}
