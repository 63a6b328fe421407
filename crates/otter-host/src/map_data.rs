//! Backing data structures for Map and Set.
//!
//! Uses SameValueZero semantics via `MapKey`, insertion-ordered storage
//! with tombstone-based deletion for live iteration.

use otter_bridge_gc::CellId;
use rustc_hash::FxHashMap;

use crate::string::JsString;
use crate::value::{ObjectRef, Value};

/// Hashable SameValueZero projection of a [`Value`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MapKey {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// Number bits, with `-0` folded into `+0` and every NaN canonical
    Number(u64),
    /// String
    String(JsString),
    /// Symbol id
    Symbol(u64),
    /// Object address
    Object(ObjectRef),
}

impl MapKey {
    /// Project a value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Undefined => Self::Undefined,
            Value::Null => Self::Null,
            Value::Boolean(b) => Self::Boolean(*b),
            Value::Int32(i) => Self::number(*i as f64),
            Value::Number(n) => Self::number(*n),
            Value::String(s) => Self::String(s.clone()),
            Value::Symbol(s) => Self::Symbol(s.id()),
            Value::Object(o) => Self::Object(*o),
        }
    }

    fn number(n: f64) -> Self {
        if n.is_nan() {
            Self::Number(f64::NAN.to_bits())
        } else if n == 0.0 {
            Self::Number(0f64.to_bits())
        } else {
            Self::Number(n.to_bits())
        }
    }
}

/// Internal storage for a host `Map` or `Set`.
///
/// Entries are stored in a `Vec` in insertion order. Deleted entries become
/// `None` (tombstones) so that live iterators correctly skip them and still
/// see entries appended after iterator creation. Sets store `undefined` as
/// every value.
///
/// A separate hash map provides O(1) key→index lookup.
#[derive(Default)]
pub struct MapData {
    /// Insertion-ordered entries. `None` = tombstone (deleted).
    entries: Vec<Option<(Value, Value)>>,
    /// Key → index in `entries` for O(1) lookup.
    index: FxHashMap<MapKey, usize>,
    /// Count of live (non-None) entries.
    size: usize,
}

impl MapData {
    /// Create an empty MapData.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the value associated with `key`, or `None`.
    pub fn get(&self, key: &Value) -> Option<Value> {
        let idx = *self.index.get(&MapKey::from_value(key))?;
        match self.entries.get(idx) {
            Some(Some((_, v))) => Some(v.clone()),
            _ => None,
        }
    }

    /// Returns `true` if `key` exists.
    pub fn has(&self, key: &Value) -> bool {
        self.index.contains_key(&MapKey::from_value(key))
    }

    /// Insert or update `key` → `value`. Returns `true` if this was an update.
    pub fn set(&mut self, key: Value, value: Value) -> bool {
        // -0 is stored as +0
        let key = match key {
            Value::Number(n) if n == 0.0 => Value::Int32(0),
            other => other,
        };
        let map_key = MapKey::from_value(&key);
        if let Some(&idx) = self.index.get(&map_key) {
            // Update existing entry in-place (preserves insertion order)
            self.entries[idx] = Some((key, value));
            true
        } else {
            let idx = self.entries.len();
            self.index.insert(map_key, idx);
            self.entries.push(Some((key, value)));
            self.size += 1;
            false
        }
    }

    /// Delete `key`. Returns `true` if it existed.
    pub fn delete(&mut self, key: &Value) -> bool {
        if let Some(idx) = self.index.remove(&MapKey::from_value(key)) {
            self.entries[idx] = None;
            self.size -= 1;
            true
        } else {
            false
        }
    }

    /// Remove all entries (iterators in progress will see "done").
    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
        self.index.clear();
        self.size = 0;
    }

    /// Read entry at `position` for iterator advancement.
    pub fn entry_at(&self, position: usize) -> Option<(Value, Value)> {
        match self.entries.get(position) {
            Some(Some((k, v))) => Some((k.clone(), v.clone())),
            _ => None,
        }
    }

    /// Current length of the entries vector (including tombstones).
    pub fn entries_len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of live entries. Callbacks run on the snapshot so they may
    /// mutate the map.
    pub fn live_entries(&self) -> Vec<(Value, Value)> {
        self.entries.iter().flatten().cloned().collect()
    }

    pub(crate) fn trace(&self, tracer: &mut dyn FnMut(CellId)) {
        for (k, v) in self.entries.iter().flatten() {
            k.trace(tracer);
            v.trace(tracer);
        }
    }

    /// Object keys hash by address, so the index is rebuilt after a move.
    pub(crate) fn relocate(&mut self, forward: &dyn Fn(CellId) -> CellId) {
        let mut touched = false;
        for (k, v) in self.entries.iter_mut().flatten() {
            touched |= matches!(k, Value::Object(_));
            k.relocate(forward);
            v.relocate(forward);
        }
        if touched {
            self.index = self
                .entries
                .iter()
                .enumerate()
                .filter_map(|(i, e)| e.as_ref().map(|(k, _)| (MapKey::from_value(k), i)))
                .collect();
        }
    }
}

impl std::fmt::Debug for MapData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MapData(size={})", self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_value_zero_keys() {
        let mut map = MapData::new();
        map.set(Value::Int32(1), Value::string("a"));
        assert!(map.has(&Value::Number(1.0)));
        map.set(Value::Number(f64::NAN), Value::Int32(1));
        assert!(map.has(&Value::Number(f64::NAN)));
        map.set(Value::Number(-0.0), Value::Int32(2));
        assert!(map.has(&Value::Int32(0)));
        assert_eq!(map.size(), 3);
    }

    #[test]
    fn test_tombstones_keep_order() {
        let mut map = MapData::new();
        map.set(Value::string("a"), Value::Int32(1));
        map.set(Value::string("b"), Value::Int32(2));
        map.set(Value::string("c"), Value::Int32(3));
        assert!(map.delete(&Value::string("b")));
        assert!(!map.delete(&Value::string("b")));
        assert_eq!(map.entries_len(), 3);
        assert!(map.entry_at(1).is_none());
        let keys: Vec<String> = map
            .live_entries()
            .into_iter()
            .map(|(k, _)| k.as_string().map(|s| s.to_string()).unwrap_or_default())
            .collect();
        assert_eq!(keys, vec!["a", "c"]);
    }
}
