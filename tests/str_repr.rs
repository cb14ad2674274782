//! String-representation synthesis for containers, including the
//! cycle-guard behavior for self- and mutually-referential structures.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use pyheap::schema::{Address, ObjectContent};
use pyheap::writer::{PendingObject, SnapshotWriter};
use pyheap::SnapshotReader;

fn well_known() -> HashMap<String, Address> {
    let mut m = HashMap::new();
    m.insert("dict".to_string(), Address::from(900));
    m.insert("list".to_string(), Address::from(901));
    m.insert("set".to_string(), Address::from(902));
    m.insert("tuple".to_string(), Address::from(903));
    m
}

fn build(objects: Vec<PendingObject>) -> Vec<u8> {
    let mut writer = SnapshotWriter::new(Cursor::new(Vec::new()), "now", true).unwrap();
    writer.write_well_known_types(&well_known()).unwrap();
    writer.write_threads(&[]).unwrap();
    writer.write_frequent_attributes(&[]).unwrap();
    writer.write_common_types(&[]).unwrap();
    writer.begin_objects().unwrap();
    for obj in &objects {
        writer.write_object(obj).unwrap();
    }
    writer.finish_objects().unwrap();
    writer.write_type_names(&HashMap::new()).unwrap();
    writer.finish().unwrap().into_inner()
}

#[test]
fn self_referencing_list_renders_with_its_own_brackets() {
    let empty = HashSet::new();
    let bytes = build(vec![PendingObject {
        address: Address::from(5),
        type_id: Address::from(901),
        size: 16,
        content: Some(ObjectContent::List(vec![Address::from(5)])),
        extra_referents: &empty,
        attributes: &[],
        str_repr: None,
    }]);
    let reader = SnapshotReader::open(&bytes).unwrap();
    let repr = pyheap::str_repr::resolve(&reader, Address::from(5)).unwrap();
    assert_eq!(repr, "[[...]]");
}

#[test]
fn unknown_referent_renders_as_unknown() {
    let empty = HashSet::new();
    let bytes = build(vec![PendingObject {
        address: Address::from(5),
        type_id: Address::from(901),
        size: 16,
        content: Some(ObjectContent::List(vec![Address::from(999)])),
        extra_referents: &empty,
        attributes: &[],
        str_repr: None,
    }]);
    let reader = SnapshotReader::open(&bytes).unwrap();
    let repr = pyheap::str_repr::resolve(&reader, Address::from(5)).unwrap();
    assert_eq!(repr, "[(unknown)]");
}

#[test]
fn nested_dict_and_tuple_render_recursively() {
    let empty = HashSet::new();
    let bytes = build(vec![
        PendingObject {
            address: Address::from(1),
            type_id: Address::from(900),
            size: 16,
            content: Some(ObjectContent::Dict(vec![(Address::from(2), Address::from(3))])),
            extra_referents: &empty,
            attributes: &[],
            str_repr: None,
        },
        PendingObject {
            address: Address::from(2),
            type_id: Address::from(200),
            size: 8,
            content: None,
            extra_referents: &empty,
            attributes: &[],
            str_repr: Some("key"),
        },
        PendingObject {
            address: Address::from(3),
            type_id: Address::from(903),
            size: 16,
            content: Some(ObjectContent::Tuple(vec![Address::from(2)])),
            extra_referents: &empty,
            attributes: &[],
            str_repr: None,
        },
    ]);
    let reader = SnapshotReader::open(&bytes).unwrap();
    let repr = pyheap::str_repr::resolve(&reader, Address::from(1)).unwrap();
    assert_eq!(repr, "{key: (key)}");
}
