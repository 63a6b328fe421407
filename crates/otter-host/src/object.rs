//! Host object layout: property keys, slots and object kinds

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use otter_bridge_gc::{CellId, GcTraceable};
use rustc_hash::FxBuildHasher;

use crate::class::NativeClass;
use crate::context::Context;
use crate::error::HostResult;
use crate::map_data::MapData;
use crate::string::JsString;
use crate::value::{ObjectRef, Symbol, Value};

/// Property key: string, symbol or canonical array index
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String key (never a canonical array index)
    String(JsString),
    /// Symbol key
    Symbol(Symbol),
    /// Array index
    Index(u32),
}

impl PropertyKey {
    /// Build a key from a string, canonicalizing array indices.
    pub fn string(s: &str) -> Self {
        Self::from_js_string(JsString::new(s))
    }

    /// Build a key from a host string, canonicalizing array indices.
    pub fn from_js_string(s: JsString) -> Self {
        match s.as_array_index() {
            Some(i) => Self::Index(i),
            None => Self::String(s),
        }
    }

    /// Convert a property-name value (string, number or symbol).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::from_js_string(s.clone())),
            Value::Symbol(s) => Some(Self::Symbol(s.clone())),
            Value::Int32(i) if *i >= 0 => Some(Self::Index(*i as u32)),
            _ => None,
        }
    }

    /// The key as a host value; indices become strings.
    pub fn to_value(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Symbol(s) => Value::Symbol(s.clone()),
            Self::Index(i) => Value::string(&i.to_string()),
        }
    }

    /// Whether this key names `name`.
    pub fn is(&self, name: &str) -> bool {
        match self {
            Self::String(s) => s == name,
            Self::Index(i) => name.parse::<u32>().ok() == Some(*i) && i.to_string() == name,
            Self::Symbol(_) => false,
        }
    }

    fn order(&self) -> u8 {
        match self {
            Self::Index(_) => 0,
            Self::String(_) => 1,
            Self::Symbol(_) => 2,
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(s: Symbol) -> Self {
        Self::Symbol(s)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Symbol(s) => write!(f, "{:?}", s),
            Self::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Property attributes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Value may change
    pub writable: bool,
    /// Visible to enumeration
    pub enumerable: bool,
    /// May be deleted
    pub configurable: bool,
}

impl PropertyAttributes {
    /// writable, enumerable, configurable
    pub const DATA: Self = Self {
        writable: true,
        enumerable: true,
        configurable: true,
    };

    /// writable, configurable, hidden from enumeration (builtin methods)
    pub const HIDDEN: Self = Self {
        writable: true,
        enumerable: false,
        configurable: true,
    };

    /// Nothing allowed
    pub const FROZEN: Self = Self {
        writable: false,
        enumerable: false,
        configurable: false,
    };
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::DATA
    }
}

/// Storage for one own property
#[derive(Clone, Debug)]
pub enum PropertySlot {
    /// Data property
    Data {
        /// Current value
        value: Value,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Accessor property; getter/setter are function objects
    Accessor {
        /// Getter
        get: Option<ObjectRef>,
        /// Setter
        set: Option<ObjectRef>,
        /// Attributes (`writable` is ignored)
        attributes: PropertyAttributes,
    },
}

impl PropertySlot {
    /// Attributes of either slot kind.
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    fn trace(&self, tracer: &mut dyn FnMut(CellId)) {
        match self {
            Self::Data { value, .. } => value.trace(tracer),
            Self::Accessor { get, set, .. } => {
                for o in get.iter().chain(set.iter()) {
                    tracer(o.cell());
                }
            }
        }
    }

    fn relocate(&mut self, forward: &dyn Fn(CellId) -> CellId) {
        match self {
            Self::Data { value, .. } => value.relocate(forward),
            Self::Accessor { get, set, .. } => {
                for o in get.iter_mut().chain(set.iter_mut()) {
                    *o = ObjectRef::from_cell(forward(o.cell()));
                }
            }
        }
    }
}

/// Native function body: `(context, this, arguments) -> result`.
///
/// Bodies must not capture [`ObjectRef`]s: captured addresses are not traced
/// and go stale after compaction. Capture a [`Persistent`](crate::Persistent)
/// or look objects up through the context instead.
pub type NativeFn = Rc<dyn Fn(&Context, &Value, &[Value]) -> HostResult<Value>>;

/// Function capabilities
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    /// Usable with `new`
    pub constructor: bool,
    /// Only usable with `new`
    pub class_constructor: bool,
}

impl FunctionFlags {
    /// Plain callable
    pub const PLAIN: Self = Self {
        constructor: false,
        class_constructor: false,
    };
    /// Callable and constructible
    pub const CONSTRUCTOR: Self = Self {
        constructor: true,
        class_constructor: false,
    };
    /// Constructible only
    pub const CLASS: Self = Self {
        constructor: true,
        class_constructor: true,
    };
}

/// Function object payload
#[derive(Clone)]
pub struct FunctionData {
    /// `name`
    pub name: JsString,
    /// Capabilities
    pub flags: FunctionFlags,
    /// Body
    pub call: NativeFn,
}

/// Which projection an iterator yields
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterKind {
    /// Keys (indices for arrays)
    Keys,
    /// Values
    Values,
    /// `[key, value]` pairs
    Entries,
}

/// Iterator object payload
#[derive(Clone, Debug)]
pub struct IteratorState {
    /// Iterated array, map or set
    pub target: ObjectRef,
    /// Projection
    pub kind: IterKind,
    /// Next position
    pub position: usize,
    /// Exhausted
    pub done: bool,
}

/// Native object payload: class hooks plus opaque embedder data
#[derive(Clone)]
pub struct NativeData {
    /// Class hooks
    pub class: Rc<dyn NativeClass>,
    /// Private data, handed to the class finalizer when the object dies
    pub data: Rc<dyn Any>,
}

/// Object kinds
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Dense array
    Array(Vec<Value>),
    /// `Map`
    Map(MapData),
    /// `Set`
    Set(MapData),
    /// Function
    Function(FunctionData),
    /// `Error` instance
    Error,
    /// Array/Map/Set iterator
    Iterator(IteratorState),
    /// Native (class-hook) object
    Native(NativeData),
}

impl ObjectKind {
    /// Class name used by `toString`.
    pub fn class_name(&self) -> &str {
        match self {
            Self::Ordinary => "Object",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
            Self::Set(_) => "Set",
            Self::Function(_) => "Function",
            Self::Error => "Error",
            Self::Iterator(_) => "Iterator",
            Self::Native(native) => native.class.name(),
        }
    }
}

pub(crate) type PropertyMap = IndexMap<PropertyKey, PropertySlot, FxBuildHasher>;

/// A host heap object
pub struct HostObject {
    pub(crate) uid: u64,
    pub(crate) proto: Option<ObjectRef>,
    pub(crate) properties: PropertyMap,
    pub(crate) kind: ObjectKind,
}

impl HostObject {
    pub(crate) fn new(proto: Option<ObjectRef>, kind: ObjectKind) -> Self {
        Self {
            uid: 0,
            proto,
            properties: PropertyMap::default(),
            kind,
        }
    }

    /// Own keys in host order: indices ascending, then strings, then
    /// symbols, each group in insertion order.
    pub(crate) fn ordered_keys(&self, enumerable_only: bool) -> Vec<PropertyKey> {
        let mut keys: Vec<PropertyKey> = Vec::new();
        if let ObjectKind::Array(items) = &self.kind {
            keys.extend((0..items.len() as u32).map(PropertyKey::Index));
        }
        let mut own: Vec<&PropertyKey> = self
            .properties
            .iter()
            .filter(|(_, slot)| !enumerable_only || slot.attributes().enumerable)
            .map(|(k, _)| k)
            .collect();
        own.sort_by(|a, b| match (a, b) {
            (PropertyKey::Index(x), PropertyKey::Index(y)) => x.cmp(y),
            _ => a.order().cmp(&b.order()),
        });
        keys.extend(own.into_iter().cloned());
        keys
    }
}

impl GcTraceable for HostObject {
    fn trace(&self, tracer: &mut dyn FnMut(CellId)) {
        if let Some(proto) = self.proto {
            tracer(proto.cell());
        }
        for slot in self.properties.values() {
            slot.trace(tracer);
        }
        match &self.kind {
            ObjectKind::Array(items) => items.iter().for_each(|v| v.trace(tracer)),
            ObjectKind::Map(data) | ObjectKind::Set(data) => data.trace(tracer),
            ObjectKind::Iterator(state) => tracer(state.target.cell()),
            ObjectKind::Ordinary
            | ObjectKind::Function(_)
            | ObjectKind::Error
            | ObjectKind::Native(_) => {}
        }
    }

    fn relocate(&mut self, forward: &dyn Fn(CellId) -> CellId) {
        if let Some(proto) = &mut self.proto {
            *proto = ObjectRef::from_cell(forward(proto.cell()));
        }
        for slot in self.properties.values_mut() {
            slot.relocate(forward);
        }
        match &mut self.kind {
            ObjectKind::Array(items) => items.iter_mut().for_each(|v| v.relocate(forward)),
            ObjectKind::Map(data) | ObjectKind::Set(data) => data.relocate(forward),
            ObjectKind::Iterator(state) => {
                state.target = ObjectRef::from_cell(forward(state.target.cell()));
            }
            ObjectKind::Ordinary
            | ObjectKind::Function(_)
            | ObjectKind::Error
            | ObjectKind::Native(_) => {}
        }
    }

    fn tag(&self) -> u8 {
        match &self.kind {
            ObjectKind::Ordinary => 0,
            ObjectKind::Array(_) => 1,
            ObjectKind::Map(_) => 2,
            ObjectKind::Set(_) => 3,
            ObjectKind::Function(_) => 4,
            ObjectKind::Error => 5,
            ObjectKind::Iterator(_) => 6,
            ObjectKind::Native(_) => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_key_canonicalization() {
        assert_eq!(PropertyKey::string("3"), PropertyKey::Index(3));
        assert!(matches!(PropertyKey::string("03"), PropertyKey::String(_)));
        assert!(PropertyKey::string("length").is("length"));
        assert!(PropertyKey::Index(7).is("7"));
        assert!(matches!(PropertyKey::Index(7).to_value(), Value::String(_)));
    }

    #[test]
    fn test_ordered_keys() {
        let mut obj = HostObject::new(None, ObjectKind::Ordinary);
        obj.properties.insert(PropertyKey::string("b"), PropertySlot::Data {
            value: Value::Int32(1),
            attributes: PropertyAttributes::DATA,
        });
        obj.properties.insert(PropertyKey::Index(2), PropertySlot::Data {
            value: Value::Int32(2),
            attributes: PropertyAttributes::DATA,
        });
        obj.properties.insert(PropertyKey::string("a"), PropertySlot::Data {
            value: Value::Int32(3),
            attributes: PropertyAttributes::HIDDEN,
        });
        obj.properties.insert(PropertyKey::Index(0), PropertySlot::Data {
            value: Value::Int32(4),
            attributes: PropertyAttributes::DATA,
        });
        let keys = obj.ordered_keys(false);
        assert_eq!(keys, vec![
            PropertyKey::Index(0),
            PropertyKey::Index(2),
            PropertyKey::string("b"),
            PropertyKey::string("a"),
        ]);
        assert_eq!(obj.ordered_keys(true).len(), 3);
    }
}
