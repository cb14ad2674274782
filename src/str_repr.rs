//! Synthesizes `str_repr` for the four well-known container shapes, with
//! cycle guarding for self- and mutually-referential containers: a
//! re-encountered container on the current recursion stack renders as its
//! own bracket pair around `...`, not a generic placeholder.

use std::collections::HashSet;

use crate::reader::SnapshotReader;
use crate::schema::{Address, ObjectContent};

/// Resolves the string representation of `address`, synthesizing container
/// contents recursively. Returns `None` for every address when the snapshot
/// was taken with `with_str_repr` disabled.
pub fn resolve(reader: &SnapshotReader, address: Address) -> Option<String> {
    if !reader.heap().header().flags().with_str_repr() {
        return None;
    }
    let mut visiting = HashSet::new();
    Some(resolve_inner(reader, address, &mut visiting))
}

fn resolve_inner(reader: &SnapshotReader, address: Address, visiting: &mut HashSet<Address>) -> String {
    if visiting.contains(&address) {
        return match reader.heap().objects().get(&address).and_then(|o| o.content().as_ref()) {
            Some(ObjectContent::Dict(_)) | Some(ObjectContent::Set(_)) => "{...}".to_string(),
            Some(ObjectContent::List(_)) => "[...]".to_string(),
            Some(ObjectContent::Tuple(_)) => "(...)".to_string(),
            None => "(unknown)".to_string(),
        };
    }

    let obj = match reader.heap().objects().get(&address) {
        None => return "(unknown)".to_string(),
        Some(obj) => obj,
    };

    if !obj.is_container() {
        return reader
            .inline_str_repr(obj)
            .ok()
            .flatten()
            .unwrap_or_default();
    }

    let content = obj.content().as_ref().expect("is_container implies content");
    visiting.insert(address);
    let rendered = render_container(reader, content, visiting);
    visiting.remove(&address);
    rendered
}

fn render_container(
    reader: &SnapshotReader,
    content: &ObjectContent,
    visiting: &mut HashSet<Address>,
) -> String {
    match content {
        ObjectContent::Dict(pairs) => {
            let body = pairs
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}: {}",
                        resolve_inner(reader, *k, visiting),
                        resolve_inner(reader, *v, visiting)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{}}}", body)
        }
        ObjectContent::List(items) => {
            let body = items
                .iter()
                .map(|a| resolve_inner(reader, *a, visiting))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{}]", body)
        }
        ObjectContent::Set(items) => {
            let body = items
                .iter()
                .map(|a| resolve_inner(reader, *a, visiting))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{}}}", body)
        }
        ObjectContent::Tuple(items) => {
            let body = items
                .iter()
                .map(|a| resolve_inner(reader, *a, visiting))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", body)
        }
    }
}
