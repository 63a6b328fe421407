//! Host values
//!
//! Values are plain enums. Object values carry an [`ObjectRef`], a heap
//! address that stays valid until the next collection; anything kept across
//! a collection must be reachable from a root or held in a
//! [`Persistent`](crate::Persistent).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use otter_bridge_gc::CellId;

use crate::string::JsString;

/// Address of a host object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(CellId);

impl ObjectRef {
    pub(crate) const fn from_cell(id: CellId) -> Self {
        Self(id)
    }

    pub(crate) const fn cell(self) -> CellId {
        self.0
    }

    /// Numeric address, usable as a stable identity between collections.
    pub const fn addr(self) -> usize {
        self.0.index()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:?})", self.0)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct SymbolData {
    id: u64,
    description: Option<JsString>,
}

/// A host symbol. Identity is the symbol id.
#[derive(Clone)]
pub struct Symbol(Rc<SymbolData>);

impl Symbol {
    pub(crate) fn new(id: u64, description: Option<JsString>) -> Self {
        Self(Rc::new(SymbolData { id, description }))
    }

    /// Unique id within its context.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Description passed at creation, if any.
    pub fn description(&self) -> Option<&JsString> {
        self.0.description.as_ref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.description {
            Some(d) => write!(f, "Symbol({})", d),
            None => write!(f, "Symbol()"),
        }
    }
}

/// A host value
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// Small integer
    Int32(i32),
    /// IEEE double
    Number(f64),
    /// UTF-16 string
    String(JsString),
    /// Symbol
    Symbol(Symbol),
    /// Heap object
    Object(ObjectRef),
}

impl Value {
    /// Build a string value.
    pub fn string(s: &str) -> Self {
        Self::String(JsString::new(s))
    }

    /// Normalize a double to `Int32` when it is integral and fits.
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 && !(n == 0.0 && n.is_sign_negative()) {
            Self::Int32(n as i32)
        } else {
            Self::Number(n)
        }
    }

    /// Whether this is `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether this is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Object address, if this is an object.
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Self::Object(o) => Some(*o),
            _ => None,
        }
    }

    /// Numeric value for either number representation.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int32(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_string(&self) -> Option<&JsString> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// ToBoolean
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Int32(i) => *i != 0,
            Self::Number(n) => !(*n == 0.0 || n.is_nan()),
            Self::String(s) => !s.is_empty(),
            Self::Symbol(_) | Self::Object(_) => true,
        }
    }

    /// `typeof` without the function distinction (that needs the heap).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Boolean(_) => "boolean",
            Self::Int32(_) | Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
        }
    }

    /// Strict equality (`===`). Objects compare by address.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// SameValueZero, the equality used by Map, Set and `includes`.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(x), Some(y)) if x.is_nan() && y.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    pub(crate) fn trace(&self, tracer: &mut dyn FnMut(CellId)) {
        if let Self::Object(o) = self {
            tracer(o.cell());
        }
    }

    pub(crate) fn relocate(&mut self, forward: &dyn Fn(CellId) -> CellId) {
        if let Self::Object(o) = self {
            *o = ObjectRef::from_cell(forward(o.cell()));
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int32(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<JsString> for Value {
    fn from(s: JsString) -> Self {
        Self::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Self::Object(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_equals_numbers() {
        assert!(Value::Int32(1).strict_equals(&Value::Number(1.0)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));
        assert!(!Value::Int32(1).strict_equals(&Value::string("1")));
    }

    #[test]
    fn test_number_normalization() {
        assert!(matches!(Value::number(3.0), Value::Int32(3)));
        assert!(matches!(Value::number(3.5), Value::Number(_)));
        assert!(matches!(Value::number(-0.0), Value::Number(_)));
        assert!(matches!(Value::number(1e12), Value::Number(_)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.truthy());
        assert!(!Value::string("").truthy());
        assert!(Value::string("x").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
    }
}
