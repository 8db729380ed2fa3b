//! Stable identities for array elements.
//!
//! Updates are resolved asynchronously, so an index captured when an update
//! starts may point at a different element once the backend answers. Every
//! element that takes part in an update therefore gets an opaque id; the id
//! is carried through the round trip and mapped back to the element's
//! position when the answer arrives.
//!
//! The registry mirrors the array structure of the settings tree: one
//! [`ArrayRecord`] per array-bearing object, keyed by the data-path segment
//! of the array relative to the enclosing element, with a nested record per
//! element. Structural edits have to be reported through
//! [`ArrayIdentityRegistry::element_inserted`] and friends so that ids keep
//! following their elements.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use dialog_protocol::IndexRef;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scope::{split_index, strip_segment};
use crate::tree::get_path;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexId(String);

impl IndexId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for IndexId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IndexId> for IndexRef {
    fn from(id: IndexId) -> Self {
        IndexRef::Id(id.0)
    }
}

impl From<&IndexId> for IndexRef {
    fn from(id: &IndexId) -> Self {
        IndexRef::Id(id.0.clone())
    }
}

#[derive(Debug)]
struct ElementRecord {
    id: IndexId,
    nested: ArrayRecord,
}

/// Identities of the arrays directly below one object (the tree root or a
/// single array element).
#[derive(Debug, Default)]
pub struct ArrayRecord {
    arrays: BTreeMap<String, Vec<Option<ElementRecord>>>,
}

impl ArrayRecord {
    fn elements_mut(&mut self, path: &str) -> Option<&mut Vec<Option<ElementRecord>>> {
        if self.arrays.contains_key(path) {
            return self.arrays.get_mut(path);
        }
        for (key, elements) in self.arrays.iter_mut() {
            let Some(rest) = strip_segment(path, key) else {
                continue;
            };
            let (index, tail) = split_index(rest)?;
            return elements
                .get_mut(index)?
                .as_mut()?
                .nested
                .elements_mut(tail);
        }
        None
    }

    fn slot(&mut self, prefix: &str, index: usize, ledger: &mut IdLedger) -> &mut ElementRecord {
        let elements = self.arrays.entry(prefix.to_string()).or_default();
        if elements.len() <= index {
            elements.resize_with(index + 1, || None);
        }
        elements[index].get_or_insert_with(|| {
            let id = ledger.mint();
            ledger.positions.insert(id.clone(), index);
            ElementRecord {
                id,
                nested: ArrayRecord::default(),
            }
        })
    }
}

#[derive(Debug)]
struct IdLedger {
    seed: u64,
    next: u64,
    positions: HashMap<IndexId, usize>,
}

impl IdLedger {
    fn new() -> Self {
        let mut bytes = [0u8; 8];
        let seed = match getrandom::getrandom(&mut bytes) {
            Ok(()) => u64::from_be_bytes(bytes),
            Err(err) => {
                debug!("falling back to a fixed id seed: {err}");
                0x5eed
            }
        };
        Self {
            seed,
            next: 0,
            positions: HashMap::new(),
        }
    }

    fn mint(&mut self) -> IndexId {
        self.next += 1;
        IndexId(format!("{:016x}-{}", self.seed, self.next))
    }

    fn forget(&mut self, element: ElementRecord) {
        self.positions.remove(&element.id);
        for nested in element.nested.arrays.into_values().flatten().flatten() {
            self.forget(nested);
        }
    }

    fn reindex(&mut self, elements: &[Option<ElementRecord>], from: usize) {
        for (position, slot) in elements.iter().enumerate().skip(from) {
            if let Some(element) = slot {
                self.positions.insert(element.id.clone(), position);
            }
        }
    }
}

/// Handle on one [`ArrayRecord`] that can mint ids.
pub struct RecordCursor<'a> {
    record: &'a mut ArrayRecord,
    ledger: &'a mut IdLedger,
}

impl<'a> RecordCursor<'a> {
    /// Id of the element at `index` of the array `prefix`, minted on first use.
    pub fn get_or_create_id_for_index(&mut self, prefix: &str, index: usize) -> IndexId {
        self.record.slot(prefix, index, self.ledger).id.clone()
    }

    /// Record of the arrays nested inside the element at `index`.
    pub fn get_or_create_nested_array_record(self, prefix: &str, index: usize) -> RecordCursor<'a> {
        let RecordCursor { record, ledger } = self;
        let element = record.slot(prefix, index, ledger);
        RecordCursor {
            record: &mut element.nested,
            ledger,
        }
    }
}

/// Per-session registry of array element identities.
#[derive(Debug)]
pub struct ArrayIdentityRegistry {
    root: ArrayRecord,
    ledger: IdLedger,
}

impl Default for ArrayIdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayIdentityRegistry {
    pub fn new() -> Self {
        Self {
            root: ArrayRecord::default(),
            ledger: IdLedger::new(),
        }
    }

    pub fn root(&mut self) -> RecordCursor<'_> {
        RecordCursor {
            record: &mut self.root,
            ledger: &mut self.ledger,
        }
    }

    /// Ids for a concrete index path through the arrays named by `data_paths`.
    pub fn to_index_ids(&mut self, data_paths: &[String], indices: &[usize]) -> Vec<IndexId> {
        let mut cursor = self.root();
        let mut ids = Vec::with_capacity(indices.len());
        for (prefix, &index) in data_paths.iter().zip(indices) {
            ids.push(cursor.get_or_create_id_for_index(prefix, index));
            cursor = cursor.get_or_create_nested_array_record(prefix, index);
        }
        ids
    }

    /// Current position of an element, `None` once it has been removed.
    pub fn get_index(&self, id: &IndexId) -> Option<usize> {
        self.ledger.positions.get(id).copied()
    }

    pub fn resolve_ids(&self, ids: &[IndexId]) -> Option<Vec<usize>> {
        ids.iter().map(|id| self.get_index(id)).collect()
    }

    /// Positions for index references taken from a backend response.
    pub fn resolve_refs(&self, refs: &[IndexRef]) -> Option<Vec<usize>> {
        refs.iter()
            .map(|index| match index {
                IndexRef::Id(id) => self.ledger.positions.get(id.as_str()).copied(),
                IndexRef::Position(position) => Some(*position),
            })
            .collect()
    }

    pub fn element_inserted(&mut self, array_path: &str, index: usize) {
        let Self { root, ledger } = self;
        let Some(elements) = root.elements_mut(array_path) else {
            return;
        };
        if index > elements.len() {
            return;
        }
        elements.insert(index, None);
        ledger.reindex(elements, index);
    }

    pub fn element_removed(&mut self, array_path: &str, index: usize) {
        let Self { root, ledger } = self;
        let Some(elements) = root.elements_mut(array_path) else {
            return;
        };
        if index >= elements.len() {
            return;
        }
        if let Some(removed) = elements.remove(index) {
            ledger.forget(removed);
        }
        ledger.reindex(elements, index);
    }

    pub fn element_moved(&mut self, array_path: &str, from: usize, to: usize) {
        let Self { root, ledger } = self;
        let Some(elements) = root.elements_mut(array_path) else {
            return;
        };
        let needed = from.max(to) + 1;
        if elements.len() < needed {
            elements.resize_with(needed, || None);
        }
        let element = elements.remove(from);
        elements.insert(to, element);
        ledger.reindex(elements, from.min(to));
    }

    /// Drop identities of elements that no longer exist in `tree`, e.g. after
    /// a write replaced an array by a shorter one.
    pub fn reconcile(&mut self, tree: &Value) {
        reconcile_record(&mut self.root, tree, &mut self.ledger);
    }

    pub fn len(&self) -> usize {
        self.ledger.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.positions.is_empty()
    }
}

fn reconcile_record(record: &mut ArrayRecord, node: &Value, ledger: &mut IdLedger) {
    for (key, elements) in record.arrays.iter_mut() {
        let items: &[Value] = match get_path(node, key) {
            Some(Value::Array(items)) => items,
            _ => &[],
        };
        if elements.len() > items.len() {
            for removed in elements.drain(items.len()..).flatten() {
                ledger.forget(removed);
            }
        }
        for (slot, item) in elements.iter_mut().zip(items) {
            if let Some(element) = slot {
                reconcile_record(&mut element.nested, item, ledger);
            }
        }
    }
}
