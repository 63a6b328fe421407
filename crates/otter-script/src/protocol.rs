//! Abstract object protocol
//!
//! Attribute, item, call, iteration, hashing, comparison and operator
//! dispatch. Builtin payloads are handled directly; user classes dispatch
//! through special methods found on their MRO; native objects through
//! their [`NativeObject`](crate::NativeObject) hooks.

use std::hash::{Hash, Hasher};

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use rustc_hash::{FxHashSet, FxHasher};

use crate::error::{ScriptError, ScriptResult};
use crate::interp::Interp;
use crate::number::{self, Number};
use crate::object::{BuiltinKind, HashKey, Kwargs, Obj, Payload, SetMap};
use crate::ops::{BinaryOp, CompareOp};

/// Resolved `slice` bounds for a sequence of known length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliceIndices {
    /// First index
    pub start: isize,
    /// Stop bound (exclusive)
    pub stop: isize,
    /// Step, never zero
    pub step: isize,
}

impl SliceIndices {
    /// Indices selected, in order.
    pub fn indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut i = self.start;
        if self.step > 0 {
            while i < self.stop {
                out.push(i as usize);
                i += self.step;
            }
        } else {
            while i > self.stop {
                out.push(i as usize);
                i += self.step;
            }
        }
        out
    }
}

impl Interp {
    // ---------------------------------------------------------------
    // Types
    // ---------------------------------------------------------------

    /// `type(obj)`
    pub fn type_of(&self, obj: &Obj) -> Obj {
        let t = self.types();
        match obj.payload() {
            Payload::None => t.none_type.clone(),
            Payload::NotImplemented => t.not_implemented_type.clone(),
            Payload::Bool(_) => t.bool_.clone(),
            Payload::Int(_) | Payload::Long(_) => t.int.clone(),
            Payload::Float(_) => t.float.clone(),
            Payload::Str(_) => t.str_.clone(),
            Payload::Bytes(_) => t.bytes.clone(),
            Payload::List(_) => t.list.clone(),
            Payload::Tuple(_) => t.tuple.clone(),
            Payload::Dict(_) => t.dict.clone(),
            Payload::Set(_) => t.set.clone(),
            Payload::FrozenSet(_) => t.frozenset.clone(),
            Payload::Slice(..) => t.slice.clone(),
            Payload::Function(f) => match f.kind {
                crate::object::FunctionKind::Builtin => t.builtin_function.clone(),
                crate::object::FunctionKind::Lambda => t.function.clone(),
            },
            Payload::BoundMethod(..) => t.method.clone(),
            Payload::Class(_) => t.type_.clone(),
            Payload::Instance(i) => i.class.clone(),
            Payload::Iterator(it) => match it.kind {
                crate::object::IteratorKind::Iterator => t.iterator.clone(),
                crate::object::IteratorKind::Generator => t.generator.clone(),
            },
            Payload::Exception(e) => e.class.clone(),
            Payload::Module(_) => t.module.clone(),
            Payload::Native(n) => n.class.clone(),
        }
    }

    /// `type(obj).__name__`
    pub fn type_name(&self, obj: &Obj) -> String {
        class_name(&self.type_of(obj))
    }

    /// Method resolution order: depth-first, left to right, each class
    /// kept at its last occurrence. Cyclic base lists are cut.
    pub fn mro(&self, class: &Obj) -> Vec<Obj> {
        fn walk(class: &Obj, path: &mut Vec<usize>, out: &mut Vec<Obj>) {
            if path.contains(&class.id()) {
                return;
            }
            path.push(class.id());
            out.push(class.clone());
            if let Some(data) = class.as_class() {
                let bases = data.bases.borrow().clone();
                for base in &bases {
                    walk(base, path, out);
                }
            }
            path.pop();
        }
        let mut order = Vec::new();
        walk(class, &mut Vec::new(), &mut order);
        let mut seen = FxHashSet::default();
        let mut mro: Vec<Obj> = order
            .into_iter()
            .rev()
            .filter(|c| seen.insert(c.id()))
            .collect();
        mro.reverse();
        mro
    }

    /// Find `name` in the dicts along `class`'s MRO.
    pub fn lookup_type_attr(&self, class: &Obj, name: &str) -> Option<Obj> {
        self.mro(class).iter().find_map(|c| {
            c.as_class()
                .and_then(|data| data.dict.borrow().get(name).cloned())
        })
    }

    /// Whether `sub` is `sup` or derives from it.
    pub fn is_subclass(&self, sub: &Obj, sup: &Obj) -> bool {
        sub.is(sup) || self.mro(sub).iter().any(|c| c.is(sup))
    }

    /// Whether `obj` is an instance of `class`.
    pub fn is_instance(&self, obj: &Obj, class: &Obj) -> bool {
        self.is_subclass(&self.type_of(obj), class)
    }

    /// `isinstance(obj, classinfo)`; `classinfo` may be a tuple.
    pub fn isinstance(&self, obj: &Obj, classinfo: &Obj) -> ScriptResult<bool> {
        let cls = self.type_of(obj);
        self.issubclass(&cls, classinfo)
    }

    /// `issubclass(cls, classinfo)`; `classinfo` may be a tuple.
    pub fn issubclass(&self, cls: &Obj, classinfo: &Obj) -> ScriptResult<bool> {
        if let Some(items) = classinfo.as_tuple() {
            for item in items {
                if self.issubclass(cls, item)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        if classinfo.as_class().is_none() {
            return Err(ScriptError::type_error(
                "isinstance() arg 2 must be a type or tuple of types",
            ));
        }
        Ok(self.is_subclass(cls, classinfo))
    }

    // ---------------------------------------------------------------
    // Classification predicates
    // ---------------------------------------------------------------

    /// Whether `obj` is a type object.
    pub fn is_type(&self, obj: &Obj) -> bool {
        obj.as_class().is_some()
    }

    fn class_kind(&self, class: &Obj) -> Option<BuiltinKind> {
        class.as_class().map(|c| c.kind)
    }

    /// `issubclass(cls, dict)`
    pub fn type_is_dict_subclass(&self, class: &Obj) -> bool {
        self.is_subclass(class, &self.types().dict)
    }

    /// `issubclass(cls, (list, tuple))`
    pub fn type_is_list_or_tuple_subclass(&self, class: &Obj) -> bool {
        self.is_subclass(class, &self.types().list) || self.is_subclass(class, &self.types().tuple)
    }

    /// `issubclass(cls, (set, frozenset))`
    pub fn type_is_set_subclass(&self, class: &Obj) -> bool {
        self.is_subclass(class, &self.types().set) || self.is_subclass(class, &self.types().frozenset)
    }

    /// Whether instances are iterators.
    pub fn type_has_iternext(&self, class: &Obj) -> bool {
        matches!(
            self.class_kind(class),
            Some(BuiltinKind::Iterator | BuiltinKind::Generator)
        ) || class.as_class().is_some_and(|c| c.features.iternext)
            || self.lookup_type_attr(class, "__next__").is_some()
    }

    /// Whether instances support mapping subscription.
    pub fn type_has_subscript(&self, class: &Obj) -> bool {
        matches!(
            self.class_kind(class),
            Some(
                BuiltinKind::Str
                    | BuiltinKind::Bytes
                    | BuiltinKind::List
                    | BuiltinKind::Tuple
                    | BuiltinKind::Dict
            )
        ) || class.as_class().is_some_and(|c| c.features.mapping)
            || self.lookup_type_attr(class, "__getitem__").is_some()
    }

    /// Whether instances support sequence item access.
    pub fn type_has_sq_item(&self, class: &Obj) -> bool {
        matches!(
            self.class_kind(class),
            Some(BuiltinKind::Str | BuiltinKind::Bytes | BuiltinKind::List | BuiltinKind::Tuple)
        ) || class.as_class().is_some_and(|c| c.features.sequence)
            || self.lookup_type_attr(class, "__getitem__").is_some()
    }

    /// Sequence check: sequence item access on a non-dict.
    pub fn is_sequence(&self, obj: &Obj) -> bool {
        let class = self.type_of(obj);
        !self.type_is_dict_subclass(&class) && self.type_has_sq_item(&class)
    }

    /// Mapping check: supports subscription.
    pub fn is_mapping(&self, obj: &Obj) -> bool {
        self.type_has_subscript(&self.type_of(obj))
    }

    /// `callable(obj)`
    pub fn is_callable(&self, obj: &Obj) -> bool {
        match obj.payload() {
            Payload::Function(_) | Payload::BoundMethod(..) | Payload::Class(_) => true,
            Payload::Native(cell) => cell.data.is_callable(),
            Payload::Instance(i) => self.lookup_type_attr(&i.class, "__call__").is_some(),
            _ => false,
        }
    }

    // ---------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------

    fn bind(&self, value: Obj, receiver: &Obj) -> Obj {
        match value.payload() {
            Payload::Function(_) => self.bound_method(value, receiver.clone()),
            _ => value,
        }
    }

    fn no_attribute(&self, obj: &Obj, name: &str) -> ScriptError {
        ScriptError::attribute_error(format!(
            "'{}' object has no attribute '{}'",
            self.type_name(obj),
            name
        ))
    }

    /// Attribute lookup without native hooks: instance dict, then the
    /// type's MRO with functions bound to `obj`.
    pub fn generic_getattr(&self, obj: &Obj, name: &str) -> ScriptResult<Obj> {
        if name == "__class__" {
            return Ok(self.type_of(obj));
        }
        match obj.payload() {
            Payload::Instance(i) => {
                if name == "__dict__" {
                    return self.vars(obj);
                }
                if let Some(v) = i.dict.borrow().get(name) {
                    return Ok(v.clone());
                }
            }
            Payload::Exception(_) => {
                if let Some(v) = self.exception_attr(obj, name) {
                    return Ok(v);
                }
            }
            Payload::Function(f) => match name {
                "__name__" | "__qualname__" => return Ok(self.str(f.name.as_str())),
                "__module__" => {
                    return Ok(f.module.as_ref().map(|m| self.str(m.as_str())).unwrap_or_else(|| self.none()));
                }
                _ => {}
            },
            Payload::BoundMethod(func, receiver) => match name {
                "__self__" => return Ok(receiver.clone()),
                "__func__" => return Ok(func.clone()),
                "__name__" => return self.getattr(func, name),
                _ => {}
            },
            Payload::Iterator(it) if name == "__name__" => return Ok(self.str(it.name.as_str())),
            _ => {}
        }
        match self.lookup_type_attr(&self.type_of(obj), name) {
            Some(value) => Ok(self.bind(value, obj)),
            None => Err(self.no_attribute(obj, name)),
        }
    }

    fn class_getattr(&self, class: &Obj, name: &str) -> ScriptResult<Obj> {
        let Some(data) = class.as_class() else {
            return Err(self.no_attribute(class, name));
        };
        match name {
            "__name__" | "__qualname__" => return Ok(self.str(data.name.as_str())),
            "__module__" => return Ok(self.str(data.module.as_str())),
            "__bases__" => return Ok(self.tuple(data.bases.borrow().clone())),
            "__mro__" => return Ok(self.tuple(self.mro(class))),
            "__dict__" => return self.vars(class),
            "__class__" => return Ok(self.types().type_.clone()),
            _ => {}
        }
        if let Some(v) = self.lookup_type_attr(class, name) {
            return Ok(v);
        }
        if let Some(v) = self.lookup_type_attr(&self.types().type_, name) {
            return Ok(self.bind(v, class));
        }
        Err(ScriptError::attribute_error(format!(
            "type object '{}' has no attribute '{}'",
            data.name, name
        )))
    }

    /// `getattr(obj, name)`
    pub fn getattr(&self, obj: &Obj, name: &str) -> ScriptResult<Obj> {
        match obj.payload() {
            Payload::Class(_) => self.class_getattr(obj, name),
            Payload::Module(m) => {
                if name == "__dict__" {
                    return Ok(m.dict.clone());
                }
                match self.dict_get_str(&m.dict, name) {
                    Some(v) => Ok(v),
                    None => Err(ScriptError::attribute_error(format!(
                        "module '{}' has no attribute '{}'",
                        m.name, name
                    ))),
                }
            }
            Payload::Native(cell) => match cell.data.getattr(self, obj, name) {
                Some(Err(e)) if self.is_attribute_error(&e) => {
                    self.generic_getattr(obj, name).map_err(|_| e)
                }
                Some(result) => result,
                None => self.generic_getattr(obj, name),
            },
            _ => self.generic_getattr(obj, name),
        }
    }

    /// `hasattr(obj, name)`; errors other than `AttributeError` propagate.
    pub fn hasattr(&self, obj: &Obj, name: &str) -> ScriptResult<bool> {
        match self.getattr(obj, name) {
            Ok(_) => Ok(true),
            Err(e) if self.is_attribute_error(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// `setattr(obj, name, value)`
    pub fn setattr(&self, obj: &Obj, name: &str, value: Obj) -> ScriptResult<()> {
        self.store_attr(obj, name, Some(&value))
    }

    /// `delattr(obj, name)`
    pub fn delattr(&self, obj: &Obj, name: &str) -> ScriptResult<()> {
        self.store_attr(obj, name, None)
    }

    fn store_attr(&self, obj: &Obj, name: &str, value: Option<&Obj>) -> ScriptResult<()> {
        let update = |dict: &std::cell::RefCell<crate::object::AttrMap>| -> ScriptResult<()> {
            match value {
                Some(v) => {
                    dict.borrow_mut().insert(name.to_string(), v.clone());
                    Ok(())
                }
                None => match dict.borrow_mut().shift_remove(name) {
                    Some(_) => Ok(()),
                    None => Err(self.no_attribute(obj, name)),
                },
            }
        };
        match obj.payload() {
            Payload::Instance(i) => update(&i.dict),
            Payload::Class(c) => {
                if c.module == "builtins" {
                    return Err(ScriptError::type_error(format!(
                        "cannot set '{}' attribute of immutable type '{}'",
                        name, c.name
                    )));
                }
                update(&c.dict)
            }
            Payload::Module(m) => match value {
                Some(v) => {
                    self.dict_set_str(&m.dict, name, v.clone());
                    Ok(())
                }
                None => match self.dict_del_str(&m.dict, name) {
                    Some(_) => Ok(()),
                    None => Err(ScriptError::attribute_error(format!(
                        "module '{}' has no attribute '{}'",
                        m.name, name
                    ))),
                },
            },
            Payload::Exception(e) => {
                if self.store_exception_attr(obj, name, value)? {
                    return Ok(());
                }
                update(&e.dict)
            }
            Payload::Native(cell) => match cell.data.setattr(self, obj, name, value) {
                Some(result) => result,
                None => Err(self.no_attribute(obj, name)),
            },
            _ => Err(self.no_attribute(obj, name)),
        }
    }

    // ---------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------

    /// `f(*args, **kwargs)`
    pub fn call(&self, f: &Obj, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
        let _depth = self.enter_call()?;
        match f.payload() {
            Payload::Function(data) => (data.call)(self, args, kwargs),
            Payload::BoundMethod(func, receiver) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(receiver.clone());
                full.extend_from_slice(args);
                self.call(func, &full, kwargs)
            }
            Payload::Class(_) => self.construct(f, args, kwargs),
            Payload::Instance(i) => match self.lookup_type_attr(&i.class, "__call__") {
                Some(method) => self.call(&self.bind(method, f), args, kwargs),
                None => Err(self.not_callable(f)),
            },
            Payload::Native(cell) => match cell.data.call(self, f, args, kwargs) {
                Some(result) => result,
                None => Err(self.not_callable(f)),
            },
            _ => Err(self.not_callable(f)),
        }
    }

    fn not_callable(&self, f: &Obj) -> ScriptError {
        ScriptError::type_error(format!("'{}' object is not callable", self.type_name(f)))
    }

    /// `obj.name(*args)`
    pub fn call_method(&self, obj: &Obj, name: &str, args: &[Obj]) -> ScriptResult<Obj> {
        let method = self.getattr(obj, name)?;
        self.call(&method, args, &[])
    }

    fn run_init(&self, class: &Obj, instance: &Obj, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<bool> {
        let Some(init) = self.lookup_type_attr(class, "__init__") else {
            return Ok(false);
        };
        let result = self.call(&self.bind(init, instance), args, kwargs)?;
        if !result.is_none() {
            return Err(ScriptError::type_error(format!(
                "__init__() should return None, not '{}'",
                self.type_name(&result)
            )));
        }
        Ok(true)
    }

    /// `cls(*args, **kwargs)`
    pub fn construct(&self, class: &Obj, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
        let Some(data) = class.as_class() else {
            return Err(self.not_callable(class));
        };
        if class.is(&self.types().type_) && args.len() == 1 && kwargs.is_empty() {
            return Ok(self.type_of(&args[0]));
        }
        match data.kind {
            BuiltinKind::Exception => {
                let exc = self.new_exception(class, args.to_vec());
                self.run_init(class, &exc, args, kwargs)?;
                Ok(exc)
            }
            BuiltinKind::Object => {
                let instance = Obj::new(Payload::Instance(crate::object::InstanceData {
                    class: class.clone(),
                    dict: Default::default(),
                }));
                if !self.run_init(class, &instance, args, kwargs)? && (!args.is_empty() || !kwargs.is_empty()) {
                    return Err(ScriptError::type_error(format!("{}() takes no arguments", data.name)));
                }
                Ok(instance)
            }
            _ => {
                let ctor = self
                    .mro(class)
                    .iter()
                    .find_map(|c| c.as_class().and_then(|c| c.ctor.clone()));
                match ctor {
                    Some(ctor) if data.ctor.is_some() || data.kind == BuiltinKind::Native => {
                        ctor(self, args, kwargs)
                    }
                    _ => Err(ScriptError::type_error(format!(
                        "cannot create '{}' instances",
                        qualified_class_name(class)
                    ))),
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Items
    // ---------------------------------------------------------------

    /// Integer index value of `key`, `None` if it is not an integer.
    pub fn index_value(&self, key: &Obj) -> ScriptResult<Option<isize>> {
        match key.payload() {
            Payload::Int(i) => isize::try_from(*i).map(Some).map_err(|_| {
                ScriptError::index_error("cannot fit 'int' into an index-sized integer")
            }),
            Payload::Bool(b) => Ok(Some(*b as isize)),
            Payload::Long(_) => Err(ScriptError::index_error(
                "cannot fit 'int' into an index-sized integer",
            )),
            _ => Ok(None),
        }
    }

    /// Resolve `slice` bounds against a sequence length.
    pub fn slice_indices(&self, slice: &Obj, len: usize) -> ScriptResult<SliceIndices> {
        let Payload::Slice(start, stop, step) = slice.payload() else {
            return Err(ScriptError::type_error("expected a slice"));
        };
        let len = len as isize;
        let bound = |v: &Obj| -> ScriptResult<Option<isize>> {
            if v.is_none() {
                return Ok(None);
            }
            match self.index_value(v)? {
                Some(i) => Ok(Some(i)),
                None => Err(ScriptError::type_error(
                    "slice indices must be integers or None or have an __index__ method",
                )),
            }
        };
        let step = bound(step)?.unwrap_or(1);
        if step == 0 {
            return Err(ScriptError::value_error("slice step cannot be zero"));
        }
        let clamp = |v: Option<isize>, default: isize, lower: isize, upper: isize| match v {
            None => default,
            Some(i) if i < 0 => (i + len).max(lower),
            Some(i) => i.min(upper),
        };
        let (start, stop) = if step > 0 {
            (clamp(bound(start)?, 0, 0, len), clamp(bound(stop)?, len, 0, len))
        } else {
            (clamp(bound(start)?, len - 1, -1, len - 1), clamp(bound(stop)?, -1, -1, len - 1))
        };
        Ok(SliceIndices { start, stop, step })
    }

    fn normalize_index(&self, i: isize, len: usize, what: &str) -> ScriptResult<usize> {
        let j = if i < 0 { i + len as isize } else { i };
        if j < 0 || j >= len as isize {
            return Err(ScriptError::index_error(format!("{} index out of range", what)));
        }
        Ok(j as usize)
    }

    fn sequence_index_error(&self, obj: &Obj, key: &Obj) -> ScriptError {
        ScriptError::type_error(format!(
            "{} indices must be integers or slices, not {}",
            self.type_name(obj),
            self.type_name(key)
        ))
    }

    fn pick<T: Clone>(&self, items: &[T], key: &Obj, what: &str, obj: &Obj) -> ScriptResult<Result<T, Vec<T>>> {
        if let Some(i) = self.index_value(key)? {
            return Ok(Ok(items[self.normalize_index(i, items.len(), what)?].clone()));
        }
        if matches!(key.payload(), Payload::Slice(..)) {
            let bounds = self.slice_indices(key, items.len())?;
            return Ok(Err(bounds.indices().into_iter().map(|i| items[i].clone()).collect()));
        }
        Err(self.sequence_index_error(obj, key))
    }

    /// `obj[key]`
    pub fn getitem(&self, obj: &Obj, key: &Obj) -> ScriptResult<Obj> {
        match obj.payload() {
            Payload::List(items) => {
                let items = items.borrow().clone();
                Ok(match self.pick(&items, key, "list", obj)? {
                    Ok(item) => item,
                    Err(slice) => self.list(slice),
                })
            }
            Payload::Tuple(items) => Ok(match self.pick(items, key, "tuple", obj)? {
                Ok(item) => item,
                Err(slice) => self.tuple(slice),
            }),
            Payload::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(match self.pick(&chars, key, "string", obj)? {
                    Ok(c) => self.str(c.to_string()),
                    Err(slice) => self.str(slice.into_iter().collect::<String>()),
                })
            }
            Payload::Bytes(b) => Ok(match self.pick(b, key, "index", obj)? {
                Ok(byte) => self.int(byte as i64),
                Err(slice) => self.bytes(slice),
            }),
            Payload::Dict(map) => {
                let hk = self.hash_key(key)?;
                let found = map.borrow().get(&hk).map(|(_, v)| v.clone());
                match found {
                    Some(v) => Ok(v),
                    None => Err(self.key_error(key)),
                }
            }
            Payload::Instance(i) => match self.lookup_type_attr(&i.class, "__getitem__") {
                Some(m) => self.call(&self.bind(m, obj), &[key.clone()], &[]),
                None => Err(self.not_subscriptable(obj)),
            },
            Payload::Native(cell) => match cell.data.getitem(self, obj, key) {
                Some(result) => result,
                None => Err(self.not_subscriptable(obj)),
            },
            _ => Err(self.not_subscriptable(obj)),
        }
    }

    fn not_subscriptable(&self, obj: &Obj) -> ScriptError {
        ScriptError::type_error(format!("'{}' object is not subscriptable", self.type_name(obj)))
    }

    /// `obj[key] = value`
    pub fn setitem(&self, obj: &Obj, key: &Obj, value: Obj) -> ScriptResult<()> {
        match obj.payload() {
            Payload::List(items) => {
                if let Some(i) = self.index_value(key)? {
                    let len = items.borrow().len();
                    let j = self.normalize_index(i, len, "list assignment")?;
                    items.borrow_mut()[j] = value;
                    return Ok(());
                }
                if matches!(key.payload(), Payload::Slice(..)) {
                    let replacement = self.iterate(&value)?;
                    let len = items.borrow().len();
                    let bounds = self.slice_indices(key, len)?;
                    if bounds.step == 1 {
                        let start = bounds.start as usize;
                        let stop = (bounds.stop.max(bounds.start)) as usize;
                        items.borrow_mut().splice(start..stop, replacement);
                        return Ok(());
                    }
                    let indices = bounds.indices();
                    if indices.len() != replacement.len() {
                        return Err(ScriptError::value_error(format!(
                            "attempt to assign sequence of size {} to extended slice of size {}",
                            replacement.len(),
                            indices.len()
                        )));
                    }
                    let mut items = items.borrow_mut();
                    for (i, v) in indices.into_iter().zip(replacement) {
                        items[i] = v;
                    }
                    return Ok(());
                }
                Err(self.sequence_index_error(obj, key))
            }
            Payload::Dict(map) => {
                let hk = self.hash_key(key)?;
                let mut map = map.borrow_mut();
                match map.get_mut(&hk) {
                    Some(slot) => slot.1 = value,
                    None => {
                        map.insert(hk, (key.clone(), value));
                    }
                }
                Ok(())
            }
            Payload::Instance(i) => match self.lookup_type_attr(&i.class, "__setitem__") {
                Some(m) => self.call(&self.bind(m, obj), &[key.clone(), value], &[]).map(|_| ()),
                None => Err(self.no_item_assignment(obj)),
            },
            Payload::Native(cell) => match cell.data.setitem(self, obj, key, Some(&value)) {
                Some(result) => result,
                None => Err(self.no_item_assignment(obj)),
            },
            _ => Err(self.no_item_assignment(obj)),
        }
    }

    fn no_item_assignment(&self, obj: &Obj) -> ScriptError {
        ScriptError::type_error(format!(
            "'{}' object does not support item assignment",
            self.type_name(obj)
        ))
    }

    /// `del obj[key]`
    pub fn delitem(&self, obj: &Obj, key: &Obj) -> ScriptResult<()> {
        let unsupported = || {
            ScriptError::type_error(format!(
                "'{}' object doesn't support item deletion",
                self.type_name(obj)
            ))
        };
        match obj.payload() {
            Payload::List(items) => {
                let len = items.borrow().len();
                if let Some(i) = self.index_value(key)? {
                    let j = self.normalize_index(i, len, "list assignment")?;
                    items.borrow_mut().remove(j);
                    return Ok(());
                }
                if matches!(key.payload(), Payload::Slice(..)) {
                    let mut indices = self.slice_indices(key, len)?.indices();
                    indices.sort_unstable();
                    let mut items = items.borrow_mut();
                    for i in indices.into_iter().rev() {
                        items.remove(i);
                    }
                    return Ok(());
                }
                Err(self.sequence_index_error(obj, key))
            }
            Payload::Dict(map) => {
                let hk = self.hash_key(key)?;
                let removed = map.borrow_mut().shift_remove(&hk);
                match removed {
                    Some(_) => Ok(()),
                    None => Err(self.key_error(key)),
                }
            }
            Payload::Instance(i) => match self.lookup_type_attr(&i.class, "__delitem__") {
                Some(m) => self.call(&self.bind(m, obj), &[key.clone()], &[]).map(|_| ()),
                None => Err(unsupported()),
            },
            Payload::Native(cell) => match cell.data.setitem(self, obj, key, None) {
                Some(result) => result,
                None => Err(unsupported()),
            },
            _ => Err(unsupported()),
        }
    }

    /// `len(obj)`
    pub fn len(&self, obj: &Obj) -> ScriptResult<usize> {
        let unsupported = || {
            ScriptError::type_error(format!("object of type '{}' has no len()", self.type_name(obj)))
        };
        match obj.payload() {
            Payload::Str(s) => Ok(s.chars().count()),
            Payload::Bytes(b) => Ok(b.len()),
            Payload::List(items) => Ok(items.borrow().len()),
            Payload::Tuple(items) => Ok(items.len()),
            Payload::Dict(map) => Ok(map.borrow().len()),
            Payload::Set(map) => Ok(map.borrow().len()),
            Payload::FrozenSet(map) => Ok(map.len()),
            Payload::Instance(i) => match self.lookup_type_attr(&i.class, "__len__") {
                Some(m) => {
                    let n = self.call(&self.bind(m, obj), &[], &[])?;
                    match self.index_value(&n)? {
                        Some(n) if n >= 0 => Ok(n as usize),
                        Some(_) => Err(ScriptError::value_error("__len__() should return >= 0")),
                        None => Err(ScriptError::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            self.type_name(&n)
                        ))),
                    }
                }
                None => Err(unsupported()),
            },
            Payload::Native(cell) => match cell.data.len(self, obj) {
                Some(result) => result,
                None => Err(unsupported()),
            },
            _ => Err(unsupported()),
        }
    }

    // ---------------------------------------------------------------
    // Iteration
    // ---------------------------------------------------------------

    fn snapshot_iterator(&self, items: Vec<Obj>) -> Obj {
        let mut items = items.into_iter();
        self.iterator("iterator", Box::new(move |_| Ok(items.next())))
    }

    /// `iter(obj)`
    pub fn iter(&self, obj: &Obj) -> ScriptResult<Obj> {
        let not_iterable =
            || ScriptError::type_error(format!("'{}' object is not iterable", self.type_name(obj)));
        match obj.payload() {
            Payload::List(_) => {
                let list = obj.clone();
                let mut index = 0;
                Ok(self.iterator(
                    "list_iterator",
                    Box::new(move |_| {
                        let item = list.as_list().and_then(|items| items.borrow().get(index).cloned());
                        index += 1;
                        Ok(item)
                    }),
                ))
            }
            Payload::Tuple(items) => Ok(self.snapshot_iterator(items.clone())),
            Payload::Str(s) => {
                let chars: Vec<Obj> = s.chars().map(|c| self.str(c.to_string())).collect();
                Ok(self.snapshot_iterator(chars))
            }
            Payload::Bytes(b) => Ok(self.snapshot_iterator(b.iter().map(|x| self.int(*x as i64)).collect())),
            Payload::Dict(map) => {
                let keys = map.borrow().values().map(|(k, _)| k.clone()).collect();
                Ok(self.snapshot_iterator(keys))
            }
            Payload::Set(map) => Ok(self.snapshot_iterator(map.borrow().values().cloned().collect())),
            Payload::FrozenSet(map) => Ok(self.snapshot_iterator(map.values().cloned().collect())),
            Payload::Iterator(_) => Ok(obj.clone()),
            Payload::Instance(i) => {
                if let Some(m) = self.lookup_type_attr(&i.class, "__iter__") {
                    let it = self.call(&self.bind(m, obj), &[], &[])?;
                    if !self.is_iterator(&it) {
                        return Err(ScriptError::type_error(format!(
                            "iter() returned non-iterator of type '{}'",
                            self.type_name(&it)
                        )));
                    }
                    return Ok(it);
                }
                if self.lookup_type_attr(&i.class, "__getitem__").is_some() {
                    let target = obj.clone();
                    let mut index = 0i64;
                    return Ok(self.iterator(
                        "iterator",
                        Box::new(move |interp| {
                            match interp.getitem(&target, &interp.int(index)) {
                                Ok(v) => {
                                    index += 1;
                                    Ok(Some(v))
                                }
                                Err(e) if interp.error_matches(&e, &interp.types().index_error) => Ok(None),
                                Err(e) => Err(e),
                            }
                        }),
                    ));
                }
                Err(not_iterable())
            }
            Payload::Native(cell) => match cell.data.iter(self, obj) {
                Some(result) => result,
                None if self.is_iterator(obj) => Ok(obj.clone()),
                None => Err(not_iterable()),
            },
            _ => Err(not_iterable()),
        }
    }

    /// Whether `obj` implements `__next__`.
    pub fn is_iterator(&self, obj: &Obj) -> bool {
        match obj.payload() {
            Payload::Iterator(_) => true,
            _ => self.type_has_iternext(&self.type_of(obj)),
        }
    }

    /// `next(it)`; `Ok(None)` once exhausted.
    pub fn next(&self, it: &Obj) -> ScriptResult<Option<Obj>> {
        let stop = |interp: &Interp, r: ScriptResult<Option<Obj>>| match r {
            Err(e) if interp.error_matches(&e, &interp.types().stop_iteration) => Ok(None),
            other => other,
        };
        match it.payload() {
            Payload::Iterator(data) => {
                let mut slot = data
                    .next
                    .try_borrow_mut()
                    .map_err(|_| ScriptError::value_error("generator already executing"))?;
                let Some(advance) = slot.as_mut() else {
                    return Ok(None);
                };
                let result = stop(self, advance(self));
                if !matches!(result, Ok(Some(_))) {
                    *slot = None;
                }
                result
            }
            Payload::Instance(i) => match self.lookup_type_attr(&i.class, "__next__") {
                Some(m) => stop(self, self.call(&self.bind(m, it), &[], &[]).map(Some)),
                None => Err(self.not_iterator(it)),
            },
            Payload::Native(cell) => match cell.data.next(self, it) {
                Some(result) => stop(self, result),
                None => Err(self.not_iterator(it)),
            },
            _ => Err(self.not_iterator(it)),
        }
    }

    fn not_iterator(&self, it: &Obj) -> ScriptError {
        ScriptError::type_error(format!("'{}' object is not an iterator", self.type_name(it)))
    }

    /// Drain an iterable.
    pub fn iterate(&self, obj: &Obj) -> ScriptResult<Vec<Obj>> {
        match obj.payload() {
            Payload::List(items) => return Ok(items.borrow().clone()),
            Payload::Tuple(items) => return Ok(items.clone()),
            _ => {}
        }
        let it = self.iter(obj)?;
        let mut out = Vec::new();
        while let Some(item) = self.next(&it)? {
            out.push(item);
        }
        Ok(out)
    }

    /// `item in container`
    pub fn contains(&self, container: &Obj, item: &Obj) -> ScriptResult<bool> {
        match container.payload() {
            Payload::Str(s) => match item.as_str() {
                Some(sub) => Ok(s.contains(sub)),
                None => Err(ScriptError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    self.type_name(item)
                ))),
            },
            Payload::Dict(map) => {
                let hk = self.hash_key(item)?;
                Ok(map.borrow().contains_key(&hk))
            }
            Payload::Set(map) => {
                let hk = self.hash_key(item)?;
                Ok(map.borrow().contains_key(&hk))
            }
            Payload::FrozenSet(map) => Ok(map.contains_key(&self.hash_key(item)?)),
            Payload::Instance(i) => match self.lookup_type_attr(&i.class, "__contains__") {
                Some(m) => {
                    let r = self.call(&self.bind(m, container), &[item.clone()], &[])?;
                    self.truthy(&r)
                }
                None => self.contains_by_iteration(container, item),
            },
            Payload::Native(cell) => match cell.data.contains(self, container, item) {
                Some(result) => result,
                None => self.contains_by_iteration(container, item),
            },
            _ => self.contains_by_iteration(container, item),
        }
    }

    fn contains_by_iteration(&self, container: &Obj, item: &Obj) -> ScriptResult<bool> {
        let it = self.iter(container).map_err(|_| {
            ScriptError::type_error(format!(
                "argument of type '{}' is not iterable",
                self.type_name(container)
            ))
        })?;
        while let Some(x) = self.next(&it)? {
            if self.eq(&x, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ---------------------------------------------------------------
    // Truth and hashing
    // ---------------------------------------------------------------

    /// `bool(obj)`
    pub fn truthy(&self, obj: &Obj) -> ScriptResult<bool> {
        Ok(match obj.payload() {
            Payload::None => false,
            Payload::Bool(b) => *b,
            Payload::Int(i) => *i != 0,
            Payload::Long(_) => true,
            Payload::Float(f) => *f != 0.0,
            Payload::Str(s) => !s.is_empty(),
            Payload::Bytes(b) => !b.is_empty(),
            Payload::List(items) => !items.borrow().is_empty(),
            Payload::Tuple(items) => !items.is_empty(),
            Payload::Dict(map) => !map.borrow().is_empty(),
            Payload::Set(map) => !map.borrow().is_empty(),
            Payload::FrozenSet(map) => !map.is_empty(),
            Payload::Instance(i) => {
                if let Some(m) = self.lookup_type_attr(&i.class, "__bool__") {
                    let r = self.call(&self.bind(m, obj), &[], &[])?;
                    return match r.as_bool() {
                        Some(b) => Ok(b),
                        None => Err(ScriptError::type_error(format!(
                            "__bool__ should return bool, returned {}",
                            self.type_name(&r)
                        ))),
                    };
                }
                if self.lookup_type_attr(&i.class, "__len__").is_some() {
                    return Ok(self.len(obj)? > 0);
                }
                true
            }
            Payload::Native(cell) => match cell.data.len(self, obj) {
                Some(n) => n? > 0,
                None => true,
            },
            _ => true,
        })
    }

    /// Dict key / set element identity of `obj`.
    pub fn hash_key(&self, obj: &Obj) -> ScriptResult<HashKey> {
        let unhashable =
            || ScriptError::type_error(format!("unhashable type: '{}'", self.type_name(obj)));
        Ok(match obj.payload() {
            Payload::None => HashKey::None,
            Payload::Bool(b) => HashKey::Int(*b as i64),
            Payload::Int(i) => HashKey::Int(*i),
            Payload::Long(i) => HashKey::Long(i.clone()),
            Payload::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    match f.to_i64() {
                        Some(i) => HashKey::Int(i),
                        None => HashKey::Long(BigInt::from_f64(*f).unwrap_or_default()),
                    }
                } else {
                    HashKey::Float(f.to_bits())
                }
            }
            Payload::Str(s) => HashKey::Str(s.clone()),
            Payload::Bytes(b) => HashKey::Bytes(b.clone()),
            Payload::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(|item| self.hash_key(item))
                    .collect::<ScriptResult<Vec<_>>>()?,
            ),
            Payload::List(_) | Payload::Dict(_) | Payload::Set(_) => return Err(unhashable()),
            Payload::Instance(i) => {
                if let Some(m) = self.lookup_type_attr(&i.class, "__hash__") {
                    if m.is_none() {
                        return Err(unhashable());
                    }
                    let r = self.call(&self.bind(m, obj), &[], &[])?;
                    match r.as_int() {
                        Some(h) => HashKey::Native(h),
                        None => {
                            return Err(ScriptError::type_error(
                                "__hash__ method should return an integer",
                            ));
                        }
                    }
                } else if self.lookup_type_attr(&i.class, "__eq__").is_some() {
                    return Err(unhashable());
                } else {
                    HashKey::Identity(obj.id())
                }
            }
            Payload::Native(cell) => match cell.data.hash(self, obj) {
                Some(h) => HashKey::Native(h?),
                None => HashKey::Identity(obj.id()),
            },
            _ => HashKey::Identity(obj.id()),
        })
    }

    /// `hash(obj)`
    pub fn hash(&self, obj: &Obj) -> ScriptResult<i64> {
        Ok(match self.hash_key(obj)? {
            HashKey::Int(i) | HashKey::Native(i) => i,
            other => {
                let mut hasher = FxHasher::default();
                other.hash(&mut hasher);
                hasher.finish() as i64
            }
        })
    }

    // ---------------------------------------------------------------
    // Comparison
    // ---------------------------------------------------------------

    fn sequence_compare(&self, a: &[Obj], b: &[Obj], op: CompareOp) -> ScriptResult<bool> {
        if matches!(op, CompareOp::Eq | CompareOp::Ne) && a.len() != b.len() {
            return Ok(op == CompareOp::Ne);
        }
        for (x, y) in a.iter().zip(b) {
            if !self.eq(x, y)? {
                return match op {
                    CompareOp::Eq => Ok(false),
                    CompareOp::Ne => Ok(true),
                    _ => self.compare(x, y, op),
                };
            }
        }
        Ok(op.test(a.len().cmp(&b.len())))
    }

    fn set_compare(&self, a: &SetMap, b: &SetMap, op: CompareOp) -> bool {
        let subset = |x: &SetMap, y: &SetMap| x.keys().all(|k| y.contains_key(k));
        match op {
            CompareOp::Eq => a.len() == b.len() && subset(a, b),
            CompareOp::Ne => !(a.len() == b.len() && subset(a, b)),
            CompareOp::Le => subset(a, b),
            CompareOp::Lt => a.len() < b.len() && subset(a, b),
            CompareOp::Ge => subset(b, a),
            CompareOp::Gt => a.len() > b.len() && subset(b, a),
        }
    }

    fn set_view(obj: &Obj) -> Option<SetMap> {
        match obj.payload() {
            Payload::Set(map) => Some(map.borrow().clone()),
            Payload::FrozenSet(map) => Some(map.clone()),
            _ => None,
        }
    }

    /// One side of a rich comparison; `None` means `NotImplemented`.
    fn compare_slot(&self, a: &Obj, b: &Obj, op: CompareOp) -> ScriptResult<Option<Obj>> {
        if let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) {
            let result = match number::compare(&x, &y)? {
                Some(ord) => op.test(ord),
                None => op == CompareOp::Ne,
            };
            return Ok(Some(self.bool(result)));
        }
        let builtin = match (a.payload(), b.payload()) {
            (Payload::None, Payload::None) if matches!(op, CompareOp::Eq | CompareOp::Ne) => {
                Some(op == CompareOp::Eq)
            }
            (Payload::Str(x), Payload::Str(y)) => Some(op.test(x.cmp(y))),
            (Payload::Bytes(x), Payload::Bytes(y)) => Some(op.test(x.cmp(y))),
            (Payload::List(x), Payload::List(y)) => {
                let (x, y) = (x.borrow().clone(), y.borrow().clone());
                Some(self.sequence_compare(&x, &y, op)?)
            }
            (Payload::Tuple(x), Payload::Tuple(y)) => Some(self.sequence_compare(x, y, op)?),
            (Payload::Dict(x), Payload::Dict(y)) if matches!(op, CompareOp::Eq | CompareOp::Ne) => {
                let (x, y) = (x.borrow().clone(), y.borrow().clone());
                let mut equal = x.len() == y.len();
                if equal {
                    for (k, (_, v)) in &x {
                        match y.get(k) {
                            Some((_, w)) if self.eq(v, w)? => {}
                            _ => {
                                equal = false;
                                break;
                            }
                        }
                    }
                }
                Some(equal == (op == CompareOp::Eq))
            }
            _ => match (Self::set_view(a), Self::set_view(b)) {
                (Some(x), Some(y)) => Some(self.set_compare(&x, &y, op)),
                _ => None,
            },
        };
        if let Some(result) = builtin {
            return Ok(Some(self.bool(result)));
        }
        let answer = match a.payload() {
            Payload::Instance(i) => match self.lookup_type_attr(&i.class, op.dunder()) {
                Some(m) => Some(self.call(&self.bind(m, a), &[b.clone()], &[])?),
                None => None,
            },
            Payload::Native(cell) => cell.data.richcompare(self, a, b, op).transpose()?,
            _ => None,
        };
        Ok(answer.filter(|r| !matches!(r.payload(), Payload::NotImplemented)))
    }

    /// Rich comparison with reflection and the identity fallback for
    /// `==` / `!=`.
    pub fn richcompare(&self, a: &Obj, b: &Obj, op: CompareOp) -> ScriptResult<Obj> {
        if let Some(r) = self.compare_slot(a, b, op)? {
            return Ok(r);
        }
        if let Some(r) = self.compare_slot(b, a, op.reflected())? {
            return Ok(r);
        }
        match op {
            CompareOp::Eq => Ok(self.bool(a.is(b))),
            CompareOp::Ne => Ok(self.bool(!a.is(b))),
            _ => Err(ScriptError::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.symbol(),
                self.type_name(a),
                self.type_name(b)
            ))),
        }
    }

    /// Rich comparison reduced to a bool.
    pub fn compare(&self, a: &Obj, b: &Obj, op: CompareOp) -> ScriptResult<bool> {
        let r = self.richcompare(a, b, op)?;
        self.truthy(&r)
    }

    /// `a == b` with the identity shortcut.
    pub fn eq(&self, a: &Obj, b: &Obj) -> ScriptResult<bool> {
        if a.is(b) {
            return Ok(true);
        }
        self.compare(a, b, CompareOp::Eq)
    }

    // ---------------------------------------------------------------
    // Operators
    // ---------------------------------------------------------------

    fn repeat<T: Clone>(items: &[T], count: &Obj) -> Option<Vec<T>> {
        let n = count.as_int()?;
        let n = usize::try_from(n).unwrap_or(0);
        Some(items.iter().cloned().cycle().take(items.len() * n).collect())
    }

    fn set_algebra(&self, a: &SetMap, b: &SetMap, op: BinaryOp) -> Option<SetMap> {
        Some(match op {
            BinaryOp::And => a.iter().filter(|(k, _)| b.contains_key(*k)).map(|(k, v)| (k.clone(), v.clone())).collect(),
            BinaryOp::Or => {
                let mut out = a.clone();
                for (k, v) in b {
                    out.entry(k.clone()).or_insert_with(|| v.clone());
                }
                out
            }
            BinaryOp::Sub => a.iter().filter(|(k, _)| !b.contains_key(*k)).map(|(k, v)| (k.clone(), v.clone())).collect(),
            BinaryOp::Xor => a
                .iter()
                .filter(|(k, _)| !b.contains_key(*k))
                .chain(b.iter().filter(|(k, _)| !a.contains_key(*k)))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => return None,
        })
    }

    fn builtin_binary(&self, a: &Obj, b: &Obj, op: BinaryOp) -> ScriptResult<Option<Obj>> {
        if let Some(r) = number::binary(self, op, a, b)? {
            return Ok(Some(r));
        }
        Ok(match (a.payload(), b.payload(), op) {
            (Payload::Str(x), Payload::Str(y), BinaryOp::Add) => Some(self.str(format!("{}{}", x, y))),
            (Payload::Bytes(x), Payload::Bytes(y), BinaryOp::Add) => Some(self.bytes([x.as_slice(), y.as_slice()].concat())),
            (Payload::List(x), Payload::List(y), BinaryOp::Add) => {
                let mut items = x.borrow().clone();
                items.extend(y.borrow().iter().cloned());
                Some(self.list(items))
            }
            (Payload::Tuple(x), Payload::Tuple(y), BinaryOp::Add) => Some(self.tuple([x.as_slice(), y.as_slice()].concat())),
            (Payload::Str(s), _, BinaryOp::Mul) => {
                Self::repeat(&s.chars().collect::<Vec<_>>(), b).map(|c| self.str(c.into_iter().collect::<String>()))
            }
            (_, Payload::Str(s), BinaryOp::Mul) => {
                Self::repeat(&s.chars().collect::<Vec<_>>(), a).map(|c| self.str(c.into_iter().collect::<String>()))
            }
            (Payload::List(x), _, BinaryOp::Mul) => Self::repeat(x.borrow().as_slice(), b).map(|v| self.list(v)),
            (_, Payload::List(x), BinaryOp::Mul) => Self::repeat(x.borrow().as_slice(), a).map(|v| self.list(v)),
            (Payload::Tuple(x), _, BinaryOp::Mul) => Self::repeat(x, b).map(|v| self.tuple(v)),
            (_, Payload::Tuple(x), BinaryOp::Mul) => Self::repeat(x, a).map(|v| self.tuple(v)),
            _ => match (Self::set_view(a), Self::set_view(b)) {
                (Some(x), Some(y)) => self.set_algebra(&x, &y, op).map(|map| match a.payload() {
                    Payload::FrozenSet(_) => Obj::new(Payload::FrozenSet(map)),
                    _ => Obj::new(Payload::Set(std::cell::RefCell::new(map))),
                }),
                _ => None,
            },
        })
    }

    fn binary_slot(&self, a: &Obj, b: &Obj, op: BinaryOp, reflected: bool) -> ScriptResult<Option<Obj>> {
        let answer = match a.payload() {
            Payload::Instance(i) => {
                let name = if reflected { op.reflected_dunder() } else { op.dunder() };
                match self.lookup_type_attr(&i.class, &name) {
                    Some(m) => Some(self.call(&self.bind(m, a), &[b.clone()], &[])?),
                    None => None,
                }
            }
            Payload::Native(cell) => cell.data.binary_op(self, a, op, b, reflected).transpose()?,
            _ => None,
        };
        Ok(answer.filter(|r| !matches!(r.payload(), Payload::NotImplemented)))
    }

    /// `a <op> b`
    pub fn binary_op(&self, a: &Obj, b: &Obj, op: BinaryOp) -> ScriptResult<Obj> {
        if let Some(r) = self.builtin_binary(a, b, op)? {
            return Ok(r);
        }
        if let Some(r) = self.binary_slot(a, b, op, false)? {
            return Ok(r);
        }
        if let Some(r) = self.binary_slot(b, a, op, true)? {
            return Ok(r);
        }
        Err(ScriptError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            self.type_name(a),
            self.type_name(b)
        )))
    }

    /// `a <op>= b`
    pub fn inplace_op(&self, a: &Obj, b: &Obj, op: BinaryOp) -> ScriptResult<Obj> {
        match (a.payload(), op) {
            (Payload::List(items), BinaryOp::Add) => {
                let extra = self.iterate(b)?;
                items.borrow_mut().extend(extra);
                return Ok(a.clone());
            }
            (Payload::List(items), BinaryOp::Mul) => {
                let repeated = Self::repeat(items.borrow().as_slice(), b);
                if let Some(repeated) = repeated {
                    *items.borrow_mut() = repeated;
                    return Ok(a.clone());
                }
            }
            (Payload::Set(map), BinaryOp::And | BinaryOp::Or | BinaryOp::Sub | BinaryOp::Xor) => {
                if let Some(other) = Self::set_view(b) {
                    let current = map.borrow().clone();
                    if let Some(updated) = self.set_algebra(&current, &other, op) {
                        *map.borrow_mut() = updated;
                        return Ok(a.clone());
                    }
                }
            }
            (Payload::Instance(i), _) => {
                if let Some(m) = self.lookup_type_attr(&i.class, &op.inplace_dunder()) {
                    let r = self.call(&self.bind(m, a), &[b.clone()], &[])?;
                    if !matches!(r.payload(), Payload::NotImplemented) {
                        return Ok(r);
                    }
                }
            }
            (Payload::Native(cell), _) => {
                if let Some(r) = cell.data.inplace_op(self, a, op, b).transpose()? {
                    if !matches!(r.payload(), Payload::NotImplemented) {
                        return Ok(r);
                    }
                }
            }
            _ => {}
        }
        self.binary_op(a, b, op)
    }

    /// Unary `-`, `+` or `~`.
    pub fn unary_op(&self, op: char, a: &Obj) -> ScriptResult<Obj> {
        let result = match (op, Number::of(a)) {
            ('-', Some(Number::Int(i))) => Some(match i.checked_neg() {
                Some(n) => self.int(n),
                None => self.long(-BigInt::from(i)),
            }),
            ('-', Some(Number::Long(i))) => Some(self.long(-i)),
            ('-', Some(Number::Float(f))) => Some(self.float(-f)),
            ('+', Some(Number::Int(i))) => Some(self.int(i)),
            ('+', Some(Number::Long(i))) => Some(self.long(i)),
            ('+', Some(Number::Float(f))) => Some(self.float(f)),
            ('~', Some(Number::Int(i))) => Some(self.int(!i)),
            ('~', Some(Number::Long(i))) => Some(self.long(-i - 1)),
            _ => None,
        };
        if let Some(r) = result {
            return Ok(r);
        }
        if let Payload::Instance(i) = a.payload() {
            let name = match op {
                '-' => "__neg__",
                '+' => "__pos__",
                _ => "__invert__",
            };
            if let Some(m) = self.lookup_type_attr(&i.class, name) {
                return self.call(&self.bind(m, a), &[], &[]);
            }
        }
        Err(ScriptError::type_error(format!(
            "bad operand type for unary {}: '{}'",
            op,
            self.type_name(a)
        )))
    }

    // ---------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------

    fn type_attr_names(&self, class: &Obj, names: &mut Vec<String>) {
        for c in self.mro(class) {
            if let Some(data) = c.as_class() {
                names.extend(data.dict.borrow().keys().cloned());
            }
        }
    }

    /// `dir(obj)`: sorted, duplicate-free attribute names.
    pub fn dir(&self, obj: &Obj) -> ScriptResult<Vec<String>> {
        let mut names = Vec::new();
        match obj.payload() {
            Payload::Class(_) => self.type_attr_names(obj, &mut names),
            Payload::Module(m) => {
                if let Some(map) = m.dict.as_dict() {
                    names.extend(map.borrow().values().filter_map(|(k, _)| k.as_str().map(str::to_string)));
                }
            }
            Payload::Instance(i) => {
                names.extend(i.dict.borrow().keys().cloned());
                self.type_attr_names(&i.class, &mut names);
            }
            Payload::Exception(e) => {
                names.extend(e.dict.borrow().keys().cloned());
                names.extend(["args", "__cause__", "__context__", "__suppress_context__"].map(String::from));
                self.type_attr_names(&e.class, &mut names);
            }
            Payload::Native(cell) => {
                if let Some(own) = cell.data.dir(self, obj) {
                    names.extend(own?);
                }
                self.type_attr_names(&cell.class, &mut names);
            }
            _ => self.type_attr_names(&self.type_of(obj), &mut names),
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// `vars(obj)`. Modules return their live globals; classes and
    /// instances a snapshot of their attribute dict.
    pub fn vars(&self, obj: &Obj) -> ScriptResult<Obj> {
        let snapshot = |dict: &crate::object::AttrMap| {
            let out = self.dict();
            for (k, v) in dict {
                self.dict_set_str(&out, k, v.clone());
            }
            out
        };
        match obj.payload() {
            Payload::Module(m) => Ok(m.dict.clone()),
            Payload::Instance(i) => Ok(snapshot(&*i.dict.borrow())),
            Payload::Class(c) => Ok(snapshot(&*c.dict.borrow())),
            Payload::Exception(e) => Ok(snapshot(&*e.dict.borrow())),
            _ => Err(ScriptError::type_error(
                "vars() argument must have __dict__ attribute",
            )),
        }
    }
}

/// `__name__` of a class object.
pub fn class_name(class: &Obj) -> String {
    class
        .as_class()
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "object".to_string())
}

/// `module.Name`, or the bare name for builtins.
pub fn qualified_class_name(class: &Obj) -> String {
    match class.as_class() {
        Some(c) if c.module == "builtins" => c.name.clone(),
        Some(c) => format!("{}.{}", c.module, c.name),
        None => "object".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_indices() {
        let interp = Interp::new();
        let s = interp.slice(interp.int(1), interp.none(), interp.none());
        let bounds = interp.slice_indices(&s, 4).unwrap();
        assert_eq!(bounds.indices(), vec![1, 2, 3]);

        let rev = interp.slice(interp.none(), interp.none(), interp.int(-1));
        assert_eq!(interp.slice_indices(&rev, 3).unwrap().indices(), vec![2, 1, 0]);

        let neg = interp.slice(interp.int(-2), interp.int(100), interp.none());
        assert_eq!(interp.slice_indices(&neg, 3).unwrap().indices(), vec![1, 2]);
    }

    #[test]
    fn test_mro_diamond() {
        let interp = Interp::new();
        let base = interp.new_class("Base", "m", vec![], Default::default()).unwrap();
        let left = interp.new_class("Left", "m", vec![base.clone()], Default::default()).unwrap();
        let right = interp.new_class("Right", "m", vec![base.clone()], Default::default()).unwrap();
        let child = interp.new_class("Child", "m", vec![left.clone(), right.clone()], Default::default()).unwrap();
        let names: Vec<String> = interp.mro(&child).iter().map(class_name).collect();
        assert_eq!(names, vec!["Child", "Left", "Right", "Base", "object"]);
    }

    #[test]
    fn test_hash_key_folds_numbers() {
        let interp = Interp::new();
        let one = interp.hash_key(&interp.int(1)).unwrap();
        assert_eq!(one, interp.hash_key(&interp.bool(true)).unwrap());
        assert_eq!(one, interp.hash_key(&interp.float(1.0)).unwrap());
        assert!(interp.hash_key(&interp.list(vec![])).is_err());
    }
}
