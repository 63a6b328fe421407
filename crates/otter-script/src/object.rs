//! Script object model
//!
//! Every script value is an [`Obj`], a reference-counted handle to a
//! [`Payload`]. Identity is the allocation address; it is stable for as long
//! as any handle is alive and is what identity caches key on.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use num_bigint::BigInt;
use rustc_hash::FxBuildHasher;

use crate::error::ScriptResult;
use crate::interp::Interp;
use crate::native::{NativeObject, TypeFeatures};

/// Keyword arguments in call order.
pub type Kwargs = [(String, Obj)];

/// Body of a builtin function: `(interp, positional, keyword) -> result`.
///
/// Methods stored in a class dict receive the bound receiver as the first
/// positional argument.
pub type BuiltinFn = Rc<dyn Fn(&Interp, &[Obj], &Kwargs) -> ScriptResult<Obj>>;

/// Advance function of an iterator object; `Ok(None)` means exhausted.
pub type NextFn = Box<dyn FnMut(&Interp) -> ScriptResult<Option<Obj>>>;

/// Attribute dictionary of classes, instances and exceptions.
pub type AttrMap = IndexMap<String, Obj, FxBuildHasher>;

/// Insertion-ordered dict storage: hash key to `(key, value)`.
pub type DictMap = IndexMap<HashKey, (Obj, Obj), FxBuildHasher>;

/// Insertion-ordered set storage.
pub type SetMap = IndexMap<HashKey, Obj, FxBuildHasher>;

/// Handle to a script object.
#[derive(Clone)]
pub struct Obj(Rc<Payload>);

/// Non-owning handle.
#[derive(Clone)]
pub struct WeakObj(Weak<Payload>);

impl WeakObj {
    /// The object, if still alive.
    pub fn upgrade(&self) -> Option<Obj> {
        self.0.upgrade().map(Obj)
    }
}

impl Obj {
    pub(crate) fn new(payload: Payload) -> Self {
        Self(Rc::new(payload))
    }

    /// Object payload.
    pub fn payload(&self) -> &Payload {
        &self.0
    }

    /// Identity: the allocation address.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// `a is b`
    pub fn is(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of strong handles.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Non-owning handle.
    pub fn downgrade(&self) -> WeakObj {
        WeakObj(Rc::downgrade(&self.0))
    }

    /// `None`
    pub fn is_none(&self) -> bool {
        matches!(self.payload(), Payload::None)
    }

    /// Text payload.
    pub fn as_str(&self) -> Option<&str> {
        match self.payload() {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Machine-word integer payload (bools included).
    pub fn as_int(&self) -> Option<i64> {
        match self.payload() {
            Payload::Int(i) => Some(*i),
            Payload::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Float payload.
    pub fn as_float(&self) -> Option<f64> {
        match self.payload() {
            Payload::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Bool payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self.payload() {
            Payload::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// List storage.
    pub fn as_list(&self) -> Option<&RefCell<Vec<Obj>>> {
        match self.payload() {
            Payload::List(items) => Some(items),
            _ => None,
        }
    }

    /// Tuple items.
    pub fn as_tuple(&self) -> Option<&[Obj]> {
        match self.payload() {
            Payload::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Dict storage.
    pub fn as_dict(&self) -> Option<&RefCell<DictMap>> {
        match self.payload() {
            Payload::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Class data.
    pub fn as_class(&self) -> Option<&ClassData> {
        match self.payload() {
            Payload::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Exception data.
    pub fn as_exception(&self) -> Option<&ExceptionData> {
        match self.payload() {
            Payload::Exception(exc) => Some(exc),
            _ => None,
        }
    }

    /// Native extension cell.
    pub fn as_native(&self) -> Option<&NativeCell> {
        match self.payload() {
            Payload::Native(cell) => Some(cell),
            _ => None,
        }
    }

    /// Native extension data of a concrete type.
    pub fn native_data<T: 'static>(&self) -> Option<&T> {
        self.as_native()
            .and_then(|cell| cell.data.as_any().downcast_ref::<T>())
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload() {
            Payload::None => write!(f, "None"),
            Payload::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Payload::Int(i) => write!(f, "{}", i),
            Payload::Long(i) => write!(f, "{}", i),
            Payload::Float(x) => write!(f, "{}", x),
            Payload::Str(s) => write!(f, "{:?}", s),
            other => write!(f, "<{} at {:#x}>", other.kind_name(), self.id()),
        }
    }
}

/// Object payloads
pub enum Payload {
    /// `None`
    None,
    /// `NotImplemented`
    NotImplemented,
    /// `True` / `False`
    Bool(bool),
    /// Machine-word `int`
    Int(i64),
    /// `int` beyond a machine word
    Long(BigInt),
    /// `float`
    Float(f64),
    /// `str`
    Str(String),
    /// `bytes`
    Bytes(Vec<u8>),
    /// `list`
    List(RefCell<Vec<Obj>>),
    /// `tuple`
    Tuple(Vec<Obj>),
    /// `dict`
    Dict(RefCell<DictMap>),
    /// `set`
    Set(RefCell<SetMap>),
    /// `frozenset`
    FrozenSet(SetMap),
    /// `slice(start, stop, step)`
    Slice(Obj, Obj, Obj),
    /// Builtin function or lambda
    Function(FunctionData),
    /// Function bound to a receiver
    BoundMethod(Obj, Obj),
    /// Type object
    Class(ClassData),
    /// Instance of a user class
    Instance(InstanceData),
    /// Iterator or generator
    Iterator(IteratorData),
    /// Exception instance
    Exception(ExceptionData),
    /// Module
    Module(ModuleData),
    /// Native extension object
    Native(NativeCell),
}

impl Payload {
    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::NotImplemented => "NotImplementedType",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::Long(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::FrozenSet(_) => "frozenset",
            Self::Slice(..) => "slice",
            Self::Function(_) => "function",
            Self::BoundMethod(..) => "method",
            Self::Class(_) => "type",
            Self::Instance(_) => "object",
            Self::Iterator(_) => "iterator",
            Self::Exception(_) => "exception",
            Self::Module(_) => "module",
            Self::Native(_) => "native",
        }
    }
}

/// Function flavor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    /// Implemented in Rust
    Builtin,
    /// `lambda` from source
    Lambda,
}

/// Function payload
pub struct FunctionData {
    /// `__name__`
    pub name: String,
    /// `__module__`
    pub module: Option<String>,
    /// Flavor
    pub kind: FunctionKind,
    /// Body
    pub call: BuiltinFn,
}

/// Builtin layout a class's instances use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinKind {
    /// `object` and plain user classes
    Object,
    /// `type`
    Type,
    /// `NoneType`
    NoneType,
    /// `NotImplementedType`
    NotImplementedType,
    /// `bool`
    Bool,
    /// `int`
    Int,
    /// `float`
    Float,
    /// `str`
    Str,
    /// `bytes`
    Bytes,
    /// `list`
    List,
    /// `tuple`
    Tuple,
    /// `dict`
    Dict,
    /// `set`
    Set,
    /// `frozenset`
    FrozenSet,
    /// `slice`
    Slice,
    /// `function` and `builtin_function_or_method`
    Function,
    /// `method`
    Method,
    /// `iterator`
    Iterator,
    /// `generator`
    Generator,
    /// `module`
    Module,
    /// `BaseException` and subclasses
    Exception,
    /// Native extension classes
    Native,
}

/// Type object payload
pub struct ClassData {
    /// `__name__`
    pub name: String,
    /// `__module__`
    pub module: String,
    /// `__bases__`
    pub bases: RefCell<Vec<Obj>>,
    /// Class attribute dictionary
    pub dict: RefCell<AttrMap>,
    /// Instance layout
    pub kind: BuiltinKind,
    /// Protocol slots of native classes
    pub features: TypeFeatures,
    /// Constructor of builtin classes, called with the arguments of
    /// `cls(...)`
    pub ctor: Option<BuiltinFn>,
}

/// Instance payload
pub struct InstanceData {
    /// `__class__`
    pub class: Obj,
    /// `__dict__`
    pub dict: RefCell<AttrMap>,
}

/// Iterator flavor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IteratorKind {
    /// Builtin iterator
    Iterator,
    /// Generator
    Generator,
}

/// Iterator payload
pub struct IteratorData {
    /// Flavor
    pub kind: IteratorKind,
    /// Name shown by `repr`
    pub name: String,
    /// Advance function; dropped once exhausted
    pub next: RefCell<Option<NextFn>>,
}

/// One traceback entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Source file name
    pub filename: String,
    /// 1-based line
    pub lineno: usize,
    /// 1-based column, 0 when unknown
    pub colno: usize,
    /// Function name (`<module>`, `<lambda>`, ...)
    pub name: String,
    /// Source line, when captured at raise time
    pub line: Option<String>,
}

/// Exception payload
pub struct ExceptionData {
    /// `__class__`
    pub class: Obj,
    /// `args`
    pub args: RefCell<Vec<Obj>>,
    /// Traceback, outermost frame first
    pub traceback: RefCell<Vec<Frame>>,
    /// `__cause__`
    pub cause: RefCell<Option<Obj>>,
    /// `__context__`
    pub context: RefCell<Option<Obj>>,
    /// `__suppress_context__`
    pub suppress_context: Cell<bool>,
    /// Extra attributes (`filename`, `lineno` of syntax errors, ...)
    pub dict: RefCell<AttrMap>,
}

/// Module payload
pub struct ModuleData {
    /// `__name__`
    pub name: String,
    /// Globals dict
    pub dict: Obj,
}

/// Native extension payload
pub struct NativeCell {
    /// `__class__`
    pub class: Obj,
    /// Extension state and protocol hooks
    pub data: Box<dyn NativeObject>,
}

/// Hashable identity of a dict key or set element.
///
/// Numbers hash by value across `bool`, `int` and integral `float`; strings,
/// bytes and tuples by content; everything else by object identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashKey {
    /// `None`
    None,
    /// Integral number
    Int(i64),
    /// Integral number beyond a machine word
    Long(BigInt),
    /// Non-integral float, by bit pattern
    Float(u64),
    /// Text
    Str(String),
    /// Bytes
    Bytes(Vec<u8>),
    /// Tuple of hashable items
    Tuple(Vec<HashKey>),
    /// Native hash supplied by an extension
    Native(i64),
    /// Object identity
    Identity(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_and_refcount() {
        let a = Obj::new(Payload::Str("x".to_string()));
        let b = a.clone();
        assert!(a.is(&b));
        assert_eq!(a.id(), b.id());
        assert_eq!(a.ref_count(), 2);
        let weak = a.downgrade();
        drop(a);
        drop(b);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Obj::new(Payload::Bool(true)).as_int(), Some(1));
        assert_eq!(Obj::new(Payload::Str("s".into())).as_str(), Some("s"));
        assert!(Obj::new(Payload::None).is_none());
        assert_eq!(format!("{:?}", Obj::new(Payload::Int(3))), "3");
    }
}
