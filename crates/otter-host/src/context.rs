//! Host execution context
//!
//! A [`Context`] owns the heap, the intrinsics and every realm global. All
//! object operations go through it. Heap borrows are scoped to single
//! primitive steps: native functions and class hooks always run with the
//! heap released, so they may re-enter the context.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

use otter_bridge_gc::{CellId, GcHeap};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use smallvec::SmallVec;

use crate::class::NativeClass;
use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use crate::gc::{GcReport, Persistent, RootSet};
use crate::intrinsics::{self, Intrinsics};
use crate::map_data::MapData;
use crate::object::{
    FunctionData, FunctionFlags, HostObject, IterKind, IteratorState, NativeData, NativeFn,
    ObjectKind, PropertyAttributes, PropertyKey, PropertySlot,
};
use crate::string::JsString;
use crate::value::{ObjectRef, Symbol, Value};

/// Well-known symbols
#[derive(Debug, Clone)]
pub struct WellKnownSymbols {
    /// `Symbol.iterator`
    pub iterator: Symbol,
    /// `Symbol.toPrimitive`
    pub to_primitive: Symbol,
    /// `Symbol.hasInstance`
    pub has_instance: Symbol,
}

/// Held while host code runs; reentrant on the owning thread.
pub struct ContextGuard<'a> {
    cx: &'a Context,
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.cx.depth.set(self.cx.depth.get() - 1);
    }
}

/// Makes a global current until dropped.
pub struct RealmGuard<'a> {
    cx: &'a Context,
}

impl Drop for RealmGuard<'_> {
    fn drop(&mut self) {
        self.cx.entered.borrow_mut().pop();
    }
}

type Args = SmallVec<[Value; 4]>;

/// The host runtime.
pub struct Context {
    heap: RefCell<GcHeap<HostObject>>,
    roots: RootSet,
    intrinsics: RefCell<Intrinsics>,
    realms: RefCell<Vec<ObjectRef>>,
    entered: RefCell<Vec<ObjectRef>>,
    symbols: WellKnownSymbols,
    next_symbol: Cell<u64>,
    next_uid: Cell<u64>,
    lock: ReentrantMutex<()>,
    depth: Cell<usize>,
    config: HostConfig,
    _not_send: PhantomData<*mut ()>,
}

impl Context {
    /// Create a context with one realm.
    pub fn new() -> Rc<Self> {
        Self::with_config(HostConfig::default())
    }

    /// Create a context with custom settings.
    pub fn with_config(config: HostConfig) -> Rc<Self> {
        let mut heap = GcHeap::with_config(config.gc.clone());
        let intrinsics = Intrinsics::allocate(&mut heap);
        let first_uid = heap.len() as u64 + 1;
        let symbols = WellKnownSymbols {
            iterator: Symbol::new(1, Some(JsString::new("Symbol.iterator"))),
            to_primitive: Symbol::new(2, Some(JsString::new("Symbol.toPrimitive"))),
            has_instance: Symbol::new(3, Some(JsString::new("Symbol.hasInstance"))),
        };
        let cx = Rc::new(Self {
            heap: RefCell::new(heap),
            roots: RootSet::default(),
            intrinsics: RefCell::new(intrinsics),
            realms: RefCell::new(Vec::new()),
            entered: RefCell::new(Vec::new()),
            symbols,
            next_symbol: Cell::new(16),
            next_uid: Cell::new(first_uid),
            lock: ReentrantMutex::new(()),
            depth: Cell::new(0),
            config,
            _not_send: PhantomData,
        });
        intrinsics::install(&cx);
        cx.new_global();
        cx
    }

    /// Configuration
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // ---------------------------------------------------------------
    // Execution lock and realms
    // ---------------------------------------------------------------

    /// Acquire the execution context. Reentrant.
    pub fn enter(&self) -> ContextGuard<'_> {
        let guard = self.lock.lock();
        self.depth.set(self.depth.get() + 1);
        ContextGuard {
            cx: self,
            _guard: guard,
        }
    }

    /// Whether the current thread holds the execution context.
    pub fn is_entered(&self) -> bool {
        self.depth.get() > 0
    }

    /// Create a new realm global populated with the standard constructors.
    pub fn new_global(&self) -> ObjectRef {
        let proto = self.intrinsics.borrow().object_prototype;
        let global = self.alloc(HostObject::new(Some(proto), ObjectKind::Ordinary));
        let constructors = self.intrinsics.borrow().constructors.clone();
        for (name, ctor) in constructors {
            self.define_property(global, name, Value::Object(ctor), PropertyAttributes::HIDDEN);
        }
        self.define_property(
            global,
            self.config.global_this_name.as_str(),
            Value::Object(global),
            PropertyAttributes::HIDDEN,
        );
        self.realms.borrow_mut().push(global);
        global
    }

    /// Drop a realm global from the root set.
    pub fn remove_global(&self, global: ObjectRef) {
        self.realms.borrow_mut().retain(|g| *g != global);
    }

    /// Every realm global.
    pub fn globals(&self) -> Vec<ObjectRef> {
        self.realms.borrow().clone()
    }

    /// The innermost entered realm's global, or the first realm.
    pub fn global(&self) -> ObjectRef {
        if let Some(g) = self.entered.borrow().last() {
            return *g;
        }
        self.realms
            .borrow()
            .first()
            .copied()
            .unwrap_or_else(|| self.intrinsics.borrow().object_prototype)
    }

    /// Make `global` current until the guard drops.
    pub fn enter_realm(&self, global: ObjectRef) -> RealmGuard<'_> {
        self.entered.borrow_mut().push(global);
        RealmGuard { cx: self }
    }

    /// Well-known symbols
    pub fn symbols(&self) -> &WellKnownSymbols {
        &self.symbols
    }

    /// Create a fresh symbol.
    pub fn new_symbol(&self, description: Option<&str>) -> Symbol {
        let id = self.next_symbol.get();
        self.next_symbol.set(id + 1);
        Symbol::new(id, description.map(JsString::new))
    }

    // ---------------------------------------------------------------
    // Heap access
    // ---------------------------------------------------------------

    fn alloc(&self, mut object: HostObject) -> ObjectRef {
        object.uid = self.next_uid.get();
        self.next_uid.set(object.uid + 1);
        ObjectRef::from_cell(self.heap.borrow_mut().alloc(object))
    }

    fn with_object<R>(&self, o: ObjectRef, f: impl FnOnce(&HostObject) -> R) -> HostResult<R> {
        let heap = self.heap.borrow();
        match heap.get(o.cell()) {
            Some(object) => Ok(f(object)),
            None => Err(HostError::internal(format!("access to dead object {}", o))),
        }
    }

    fn with_object_mut<R>(
        &self,
        o: ObjectRef,
        f: impl FnOnce(&mut HostObject) -> R,
    ) -> HostResult<R> {
        let mut heap = self.heap.borrow_mut();
        match heap.get_mut(o.cell()) {
            Some(object) => Ok(f(object)),
            None => Err(HostError::internal(format!("access to dead object {}", o))),
        }
    }

    /// Insertion barrier for a value stored into the heap.
    fn barrier(&self, value: &Value) {
        if let Value::Object(o) = value {
            let mut heap = self.heap.borrow_mut();
            if heap.is_marking() {
                heap.write_barrier(o.cell());
            }
        }
    }

    pub(crate) fn intrinsics(&self) -> std::cell::Ref<'_, Intrinsics> {
        self.intrinsics.borrow()
    }

    pub(crate) fn intrinsics_mut(&self) -> std::cell::RefMut<'_, Intrinsics> {
        self.intrinsics.borrow_mut()
    }

    /// Whether `o` addresses a live object.
    pub fn is_alive(&self, o: ObjectRef) -> bool {
        self.heap.borrow().contains(o.cell())
    }

    /// Identity that survives relocation and is never reused.
    pub fn unique_id(&self, o: ObjectRef) -> Option<u64> {
        self.with_object(o, |obj| obj.uid).ok()
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.heap.borrow().len()
    }

    /// Root a value across collections.
    pub fn root(&self, value: Value) -> Persistent {
        self.roots.add(value)
    }

    /// Number of live persistent roots.
    pub fn persistent_count(&self) -> usize {
        self.roots.len()
    }

    // ---------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------

    /// New plain object inheriting from `Object.prototype`.
    pub fn new_object(&self) -> ObjectRef {
        let proto = self.intrinsics.borrow().object_prototype;
        self.alloc(HostObject::new(Some(proto), ObjectKind::Ordinary))
    }

    /// New plain object with an explicit prototype.
    pub fn new_object_with_proto(&self, proto: Option<ObjectRef>) -> ObjectRef {
        self.alloc(HostObject::new(proto, ObjectKind::Ordinary))
    }

    /// New array.
    pub fn new_array(&self, values: Vec<Value>) -> ObjectRef {
        let proto = self.intrinsics.borrow().array_prototype;
        self.alloc(HostObject::new(Some(proto), ObjectKind::Array(values)))
    }

    /// New empty `Map`.
    pub fn new_map(&self) -> ObjectRef {
        let proto = self.intrinsics.borrow().map_prototype;
        self.alloc(HostObject::new(Some(proto), ObjectKind::Map(MapData::new())))
    }

    /// New empty `Set`.
    pub fn new_set(&self) -> ObjectRef {
        let proto = self.intrinsics.borrow().set_prototype;
        self.alloc(HostObject::new(Some(proto), ObjectKind::Set(MapData::new())))
    }

    /// New error object. Known names (`TypeError`, `RangeError`, ...) use
    /// their own prototype; other names get an own `name` property.
    pub fn new_error(&self, name: &str, message: &str) -> ObjectRef {
        let (proto, known) = {
            let intrinsics = self.intrinsics.borrow();
            match intrinsics.error_prototype_for(name) {
                Some(p) => (p, true),
                None => (intrinsics.error_prototype, false),
            }
        };
        let error = self.alloc(HostObject::new(Some(proto), ObjectKind::Error));
        if !known {
            self.define_property(error, "name", Value::string(name), PropertyAttributes::HIDDEN);
        }
        self.define_property(error, "message", Value::string(message), PropertyAttributes::HIDDEN);
        error
    }

    /// New native function.
    pub fn new_function(
        &self,
        name: &str,
        flags: FunctionFlags,
        call: impl Fn(&Context, &Value, &[Value]) -> HostResult<Value> + 'static,
    ) -> ObjectRef {
        let call: NativeFn = Rc::new(call);
        let proto = self.intrinsics.borrow().function_prototype;
        let function = self.alloc(HostObject::new(
            Some(proto),
            ObjectKind::Function(FunctionData {
                name: JsString::new(name),
                flags,
                call,
            }),
        ));
        self.define_property(function, "name", Value::string(name), PropertyAttributes::HIDDEN);
        if flags.constructor {
            let prototype = self.new_object();
            self.define_property(function, "prototype", Value::Object(prototype), PropertyAttributes::HIDDEN);
            self.define_property(prototype, "constructor", Value::Object(function), PropertyAttributes::HIDDEN);
        }
        function
    }

    /// New native object.
    pub fn new_native(
        &self,
        proto: Option<ObjectRef>,
        class: Rc<dyn NativeClass>,
        data: Rc<dyn Any>,
    ) -> ObjectRef {
        self.alloc(HostObject::new(proto, ObjectKind::Native(NativeData { class, data })))
    }

    /// `{ value, done }` iterator result record.
    pub fn iter_result(&self, value: Value, done: bool) -> ObjectRef {
        let record = self.new_object();
        self.define_property(record, "value", value, PropertyAttributes::DATA);
        self.define_property(record, "done", Value::Boolean(done), PropertyAttributes::DATA);
        record
    }

    pub(crate) fn new_iterator(&self, target: ObjectRef, kind: IterKind) -> ObjectRef {
        let proto = self.intrinsics.borrow().iterator_prototype;
        self.alloc(HostObject::new(
            Some(proto),
            ObjectKind::Iterator(IteratorState {
                target,
                kind,
                position: 0,
                done: false,
            }),
        ))
    }

    // ---------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------

    /// Class name of an object (`Array`, `Map`, native class name...).
    pub fn class_name(&self, o: ObjectRef) -> String {
        self.with_object(o, |obj| obj.kind.class_name().to_string())
            .unwrap_or_else(|_| "Object".to_string())
    }

    fn kind_matches(&self, value: &Value, pred: impl FnOnce(&ObjectKind) -> bool) -> bool {
        match value {
            Value::Object(o) => self.with_object(*o, |obj| pred(&obj.kind)).unwrap_or(false),
            _ => false,
        }
    }

    /// `Array.isArray`
    pub fn is_array(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Array(_)))
    }

    /// Whether `value` is a `Map`.
    pub fn is_map(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Map(_)))
    }

    /// Whether `value` is a `Set`.
    pub fn is_set(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Set(_)))
    }

    /// Whether `value` is an `Error` instance.
    pub fn is_error(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Error))
    }

    /// `IsCallable`
    pub fn is_callable(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| match k {
            ObjectKind::Function(_) => true,
            ObjectKind::Native(n) => n.class.is_callable(),
            _ => false,
        })
    }

    /// `IsConstructor`
    pub fn is_constructor(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| match k {
            ObjectKind::Function(f) => f.flags.constructor,
            ObjectKind::Native(n) => n.class.is_constructor(),
            _ => false,
        })
    }

    /// Whether `value` is a class constructor (callable only with `new`).
    pub fn is_class_constructor(&self, value: &Value) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Function(f) if f.flags.class_constructor))
    }

    /// Native payload of `o`, if it is a native object.
    pub fn native_data(&self, o: ObjectRef) -> Option<NativeData> {
        self.with_object(o, |obj| match &obj.kind {
            ObjectKind::Native(native) => Some(native.clone()),
            _ => None,
        })
        .ok()
        .flatten()
    }

    /// Native private data of `o` downcast to `T`.
    pub fn native_data_as<T: 'static>(&self, o: ObjectRef) -> Option<Rc<T>> {
        self.native_data(o).and_then(|n| n.data.downcast::<T>().ok())
    }

    /// Array length, for arrays.
    pub fn array_length(&self, o: ObjectRef) -> Option<usize> {
        self.with_object(o, |obj| match &obj.kind {
            ObjectKind::Array(items) => Some(items.len()),
            _ => None,
        })
        .ok()
        .flatten()
    }

    /// Snapshot of array elements.
    pub fn array_elements(&self, o: ObjectRef) -> HostResult<Vec<Value>> {
        self.with_object(o, |obj| match &obj.kind {
            ObjectKind::Array(items) => Ok(items.clone()),
            _ => Err(HostError::type_error("not an array")),
        })?
    }

    /// Map or Set size.
    pub fn collection_size(&self, o: ObjectRef) -> Option<usize> {
        self.with_object(o, |obj| match &obj.kind {
            ObjectKind::Map(data) | ObjectKind::Set(data) => Some(data.size()),
            _ => None,
        })
        .ok()
        .flatten()
    }

    /// Snapshot of Map entries or Set `(value, undefined)` pairs.
    pub fn collection_entries(&self, o: ObjectRef) -> HostResult<Vec<(Value, Value)>> {
        self.with_object(o, |obj| match &obj.kind {
            ObjectKind::Map(data) | ObjectKind::Set(data) => Ok(data.live_entries()),
            _ => Err(HostError::type_error("not a Map or Set")),
        })?
    }

    /// Prototype of `o`.
    pub fn get_prototype_of(&self, o: ObjectRef) -> HostResult<Option<ObjectRef>> {
        self.with_object(o, |obj| obj.proto)
    }

    /// Replace the prototype of `o`.
    pub fn set_prototype_of(&self, o: ObjectRef, proto: Option<ObjectRef>) -> HostResult<()> {
        if let Some(p) = proto {
            self.barrier(&Value::Object(p));
        }
        self.with_object_mut(o, |obj| obj.proto = proto)
    }

    /// `typeof`
    pub fn type_of(&self, value: &Value) -> &'static str {
        if self.is_callable(value) {
            "function"
        } else {
            value.type_name()
        }
    }

    // ---------------------------------------------------------------
    // Property protocol
    // ---------------------------------------------------------------

    fn native_class(&self, o: ObjectRef) -> HostResult<Option<Rc<dyn NativeClass>>> {
        self.with_object(o, |obj| match &obj.kind {
            ObjectKind::Native(native) => Some(native.class.clone()),
            _ => None,
        })
    }

    /// Own property without class hooks. Array elements and `length`
    /// are reported as data properties.
    pub fn get_own_property(&self, o: ObjectRef, key: &PropertyKey) -> HostResult<Option<PropertySlot>> {
        self.with_object(o, |obj| {
            if let ObjectKind::Array(items) = &obj.kind {
                match key {
                    PropertyKey::Index(i) => {
                        return items.get(*i as usize).map(|v| PropertySlot::Data {
                            value: v.clone(),
                            attributes: PropertyAttributes::DATA,
                        });
                    }
                    k if k.is("length") => {
                        return Some(PropertySlot::Data {
                            value: Value::number(items.len() as f64),
                            attributes: PropertyAttributes {
                                writable: true,
                                enumerable: false,
                                configurable: false,
                            },
                        });
                    }
                    _ => {}
                }
            }
            obj.properties.get(key).cloned()
        })
    }

    /// Find the object on the prototype chain that owns `key` and its slot.
    ///
    /// Class hooks are not consulted; this mirrors a descriptor lookup.
    pub fn find_property(
        &self,
        o: ObjectRef,
        key: &PropertyKey,
    ) -> HostResult<Option<(ObjectRef, PropertySlot)>> {
        let mut current = Some(o);
        while let Some(obj) = current {
            if let Some(slot) = self.get_own_property(obj, key)? {
                return Ok(Some((obj, slot)));
            }
            current = self.get_prototype_of(obj)?;
        }
        Ok(None)
    }

    /// `o[key]`
    pub fn get(&self, o: ObjectRef, key: impl Into<PropertyKey>) -> HostResult<Value> {
        let key = key.into();
        self.get_with_receiver(o, &key, &Value::Object(o))
    }

    /// `o[key]` with an explicit receiver for accessors and class hooks.
    pub fn get_with_receiver(
        &self,
        o: ObjectRef,
        key: &PropertyKey,
        receiver: &Value,
    ) -> HostResult<Value> {
        let mut current = Some(o);
        while let Some(obj) = current {
            if let Some(class) = self.native_class(obj)? {
                if let Some(value) = class.get_property(self, obj, key, receiver)? {
                    return Ok(value);
                }
            }
            match self.get_own_property(obj, key)? {
                Some(PropertySlot::Data { value, .. }) => return Ok(value),
                Some(PropertySlot::Accessor { get, .. }) => {
                    return match get {
                        Some(getter) => self.call(&Value::Object(getter), receiver, &[]),
                        None => Ok(Value::Undefined),
                    };
                }
                None => {}
            }
            current = self.get_prototype_of(obj)?;
        }
        Ok(Value::Undefined)
    }

    /// Property read on any value. Primitives other than strings have no
    /// properties; `undefined` and `null` throw.
    pub fn get_value(&self, target: &Value, key: impl Into<PropertyKey>) -> HostResult<Value> {
        let key = key.into();
        match target {
            Value::Object(o) => self.get_with_receiver(*o, &key, target),
            Value::String(s) if key.is("length") => Ok(Value::number(s.len() as f64)),
            Value::Undefined | Value::Null => Err(HostError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                if target.is_null() { "null" } else { "undefined" },
                key
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    /// `key in o`
    pub fn has_property(&self, o: ObjectRef, key: impl Into<PropertyKey>) -> HostResult<bool> {
        let key = key.into();
        let mut current = Some(o);
        while let Some(obj) = current {
            if let Some(class) = self.native_class(obj)? {
                if let Some(found) = class.has_property(self, obj, &key)? {
                    if found {
                        return Ok(true);
                    }
                }
            }
            if self.get_own_property(obj, &key)?.is_some() {
                return Ok(true);
            }
            current = self.get_prototype_of(obj)?;
        }
        Ok(false)
    }

    /// `Object.hasOwn(o, key)` without class hooks.
    pub fn has_own_property(&self, o: ObjectRef, key: impl Into<PropertyKey>) -> HostResult<bool> {
        Ok(self.get_own_property(o, &key.into())?.is_some())
    }

    /// `o[key] = value`
    pub fn set(&self, o: ObjectRef, key: impl Into<PropertyKey>, value: Value) -> HostResult<()> {
        let key = key.into();
        if let Some(class) = self.native_class(o)? {
            if class.set_property(self, o, &key, &value)? {
                return Ok(());
            }
        }
        self.barrier(&value);

        // Array elements and length
        let handled = self.with_object_mut(o, |obj| -> HostResult<bool> {
            if let ObjectKind::Array(items) = &mut obj.kind {
                match &key {
                    PropertyKey::Index(i) => {
                        let i = *i as usize;
                        if i >= items.len() {
                            items.resize(i + 1, Value::Undefined);
                        }
                        items[i] = value.clone();
                        return Ok(true);
                    }
                    k if k.is("length") => {
                        let len = value
                            .as_number()
                            .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64)
                            .ok_or_else(|| HostError::range_error("Invalid array length"))?;
                        items.resize(len as usize, Value::Undefined);
                        return Ok(true);
                    }
                    _ => {}
                }
            }
            match obj.properties.get_mut(&key) {
                Some(PropertySlot::Data { value: slot, attributes }) => {
                    if !attributes.writable {
                        return Err(HostError::type_error(format!(
                            "Cannot assign to read only property '{}' of object",
                            key
                        )));
                    }
                    *slot = value.clone();
                    Ok(true)
                }
                _ => Ok(false),
            }
        })??;
        if handled {
            return Ok(());
        }

        // Inherited setter or read-only data property
        if let Some((_, slot)) = self.find_property(o, &key)? {
            match slot {
                PropertySlot::Accessor { set, .. } => {
                    return match set {
                        Some(setter) => self
                            .call(&Value::Object(setter), &Value::Object(o), &[value])
                            .map(|_| ()),
                        None => Err(HostError::type_error(format!(
                            "Cannot set property {} which has only a getter",
                            key
                        ))),
                    };
                }
                PropertySlot::Data { attributes, .. } if !attributes.writable => {
                    return Err(HostError::type_error(format!(
                        "Cannot assign to read only property '{}' of object",
                        key
                    )));
                }
                PropertySlot::Data { .. } => {}
            }
        }
        self.with_object_mut(o, |obj| {
            obj.properties.insert(key, PropertySlot::Data {
                value,
                attributes: PropertyAttributes::DATA,
            });
        })
    }

    /// Define (or redefine) an own data property. Dead objects are ignored.
    pub fn define_property(
        &self,
        o: ObjectRef,
        key: impl Into<PropertyKey>,
        value: Value,
        attributes: PropertyAttributes,
    ) {
        self.barrier(&value);
        let key = key.into();
        let _ = self.with_object_mut(o, |obj| {
            obj.properties.insert(key, PropertySlot::Data { value, attributes });
        });
    }

    /// Define an own accessor property.
    pub fn define_accessor(
        &self,
        o: ObjectRef,
        key: impl Into<PropertyKey>,
        get: Option<ObjectRef>,
        set: Option<ObjectRef>,
        attributes: PropertyAttributes,
    ) {
        for f in get.iter().chain(set.iter()) {
            self.barrier(&Value::Object(*f));
        }
        let key = key.into();
        let _ = self.with_object_mut(o, |obj| {
            obj.properties.insert(key, PropertySlot::Accessor { get, set, attributes });
        });
    }

    /// Define a hidden method.
    pub fn define_method(
        &self,
        o: ObjectRef,
        key: impl Into<PropertyKey>,
        name: &str,
        call: impl Fn(&Context, &Value, &[Value]) -> HostResult<Value> + 'static,
    ) -> ObjectRef {
        let f = self.new_function(name, FunctionFlags::PLAIN, call);
        self.define_property(o, key, Value::Object(f), PropertyAttributes::HIDDEN);
        f
    }

    /// Define a hidden getter.
    pub fn define_getter(
        &self,
        o: ObjectRef,
        name: &str,
        get: impl Fn(&Context, &Value, &[Value]) -> HostResult<Value> + 'static,
    ) {
        let f = self.new_function(&format!("get {}", name), FunctionFlags::PLAIN, get);
        self.define_accessor(o, name, Some(f), None, PropertyAttributes::HIDDEN);
    }

    /// `delete o[key]`
    pub fn delete(&self, o: ObjectRef, key: impl Into<PropertyKey>) -> HostResult<bool> {
        let key = key.into();
        if let Some(class) = self.native_class(o)? {
            if let Some(result) = class.delete_property(self, o, &key)? {
                return Ok(result);
            }
        }
        self.with_object_mut(o, |obj| {
            if let ObjectKind::Array(items) = &mut obj.kind {
                match &key {
                    PropertyKey::Index(i) => {
                        if let Some(slot) = items.get_mut(*i as usize) {
                            *slot = Value::Undefined;
                        }
                        return true;
                    }
                    k if k.is("length") => return false,
                    _ => {}
                }
            }
            let configurable = obj.properties.get(&key).map(|slot| slot.attributes().configurable);
            match configurable {
                Some(false) => false,
                Some(true) => {
                    obj.properties.shift_remove(&key);
                    true
                }
                None => true,
            }
        })
    }

    /// Every own key, hidden ones included, in host order.
    pub fn own_keys(&self, o: ObjectRef) -> HostResult<Vec<PropertyKey>> {
        self.with_object(o, |obj| obj.ordered_keys(false))
    }

    /// Enumerable own keys; native classes may supply their own list.
    pub fn enumerate(&self, o: ObjectRef) -> HostResult<Vec<PropertyKey>> {
        if let Some(class) = self.native_class(o)? {
            if let Some(keys) = class.enumerate(self, o)? {
                return Ok(keys);
            }
        }
        self.with_object(o, |obj| obj.ordered_keys(true))
    }

    // ---------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------

    fn describe_callee(&self, value: &Value) -> String {
        match value {
            Value::Object(o) => self
                .with_object(*o, |obj| match &obj.kind {
                    ObjectKind::Function(f) => f.name.to_string(),
                    kind => kind.class_name().to_string(),
                })
                .unwrap_or_else(|_| "object".to_string()),
            other => self.display(other),
        }
    }

    /// `f.call(this, ...args)`
    pub fn call(&self, f: &Value, this: &Value, args: &[Value]) -> HostResult<Value> {
        let Value::Object(o) = f else {
            return Err(HostError::type_error(format!("{} is not a function", self.display(f))));
        };
        enum Target {
            Function(FunctionData),
            Native(Rc<dyn NativeClass>),
            None,
        }
        let target = self.with_object(*o, |obj| match &obj.kind {
            ObjectKind::Function(data) => Target::Function(data.clone()),
            ObjectKind::Native(native) if native.class.is_callable() => {
                Target::Native(native.class.clone())
            }
            _ => Target::None,
        })?;
        let _guard = self.enter();
        match target {
            Target::Function(data) if data.flags.class_constructor => Err(HostError::type_error(format!(
                "Class constructor {} cannot be invoked without 'new'",
                data.name
            ))),
            Target::Function(data) => (data.call)(self, this, args),
            Target::Native(class) => class.call(self, *o, this, args),
            Target::None => Err(HostError::type_error(format!(
                "{} is not a function",
                self.describe_callee(f)
            ))),
        }
    }

    /// `new f(...args)`
    pub fn construct(&self, f: &Value, args: &[Value]) -> HostResult<Value> {
        let Value::Object(o) = f else {
            return Err(HostError::type_error(format!("{} is not a constructor", self.display(f))));
        };
        enum Target {
            Function(FunctionData),
            Native(Rc<dyn NativeClass>),
            None,
        }
        let target = self.with_object(*o, |obj| match &obj.kind {
            ObjectKind::Function(data) if data.flags.constructor => Target::Function(data.clone()),
            ObjectKind::Native(native) if native.class.is_constructor() => {
                Target::Native(native.class.clone())
            }
            _ => Target::None,
        })?;
        let _guard = self.enter();
        match target {
            Target::Function(data) => {
                let proto = match self.get(*o, "prototype")? {
                    Value::Object(p) => p,
                    _ => self.intrinsics.borrow().object_prototype,
                };
                let this = Value::Object(self.new_object_with_proto(Some(proto)));
                let result = (data.call)(self, &this, args)?;
                Ok(if matches!(result, Value::Object(_)) { result } else { this })
            }
            Target::Native(class) => class.construct(self, *o, args),
            Target::None => Err(HostError::type_error(format!(
                "{} is not a constructor",
                self.describe_callee(f)
            ))),
        }
    }

    /// `target[name](...args)`
    pub fn call_method(&self, target: &Value, name: impl Into<PropertyKey>, args: &[Value]) -> HostResult<Value> {
        let key = name.into();
        let f = self.get_value(target, key.clone())?;
        if !self.is_callable(&f) {
            return Err(HostError::type_error(format!(
                "{}.{} is not a function",
                self.display(target),
                key
            )));
        }
        self.call(&f, target, args)
    }

    /// `value instanceof ctor`
    pub fn instance_of(&self, value: &Value, ctor: &Value) -> HostResult<bool> {
        let Value::Object(c) = ctor else {
            return Err(HostError::type_error("Right-hand side of 'instanceof' is not an object"));
        };
        if let Some(class) = self.native_class(*c)? {
            if let Some(result) = class.has_instance(self, *c, value)? {
                return Ok(result);
            }
        }
        if !self.is_callable(ctor) {
            return Err(HostError::type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let Value::Object(mut o) = value.clone() else {
            return Ok(false);
        };
        let Value::Object(proto) = self.get(*c, "prototype")? else {
            return Err(HostError::type_error("Function has non-object prototype in instanceof check"));
        };
        while let Some(p) = self.get_prototype_of(o)? {
            if p == proto {
                return Ok(true);
            }
            o = p;
        }
        Ok(false)
    }

    // ---------------------------------------------------------------
    // Iteration
    // ---------------------------------------------------------------

    /// `value[Symbol.iterator]()`
    pub fn get_iterator(&self, value: &Value) -> HostResult<Value> {
        let method = self.get_value(value, PropertyKey::Symbol(self.symbols.iterator.clone()))?;
        if !self.is_callable(&method) {
            return Err(HostError::type_error(format!("{} is not iterable", self.display(value))));
        }
        let iterator = self.call(&method, value, &[])?;
        if !matches!(iterator, Value::Object(_)) {
            return Err(HostError::type_error("Result of the Symbol.iterator method is not an object"));
        }
        Ok(iterator)
    }

    /// Advance an iterator. `None` once it reports `done`.
    pub fn iterator_step(&self, iterator: &Value) -> HostResult<Option<Value>> {
        let result = self.call_method(iterator, "next", &[])?;
        let Value::Object(record) = result else {
            return Err(HostError::type_error(format!(
                "Iterator result {} is not an object",
                self.display(&result)
            )));
        };
        if self.get(record, "done")?.truthy() {
            return Ok(None);
        }
        Ok(Some(self.get(record, "value")?))
    }

    /// Drain an iterable into a vector.
    pub fn iterate(&self, iterable: &Value) -> HostResult<Vec<Value>> {
        let iterator = self.get_iterator(iterable)?;
        let mut out = Vec::new();
        while let Some(value) = self.iterator_step(&iterator)? {
            out.push(value);
        }
        Ok(out)
    }

    /// `next()` for builtin iterator objects.
    pub(crate) fn builtin_iterator_next(&self, this: &Value) -> HostResult<Value> {
        let Value::Object(o) = this else {
            return Err(HostError::type_error("next method called on incompatible receiver"));
        };
        let state = self.with_object(*o, |obj| match &obj.kind {
            ObjectKind::Iterator(state) => Some(state.clone()),
            _ => None,
        })?;
        let Some(mut state) = state else {
            return Err(HostError::type_error("next method called on incompatible receiver"));
        };
        if state.done {
            return Ok(Value::Object(self.iter_result(Value::Undefined, true)));
        }
        let step: Option<(Value, Value)> = self.with_object(state.target, |obj| match &obj.kind {
            ObjectKind::Array(items) => {
                let item = items.get(state.position).map(|v| (Value::number(state.position as f64), v.clone()));
                state.position += 1;
                item
            }
            ObjectKind::Map(data) | ObjectKind::Set(data) => {
                while state.position < data.entries_len() {
                    let position = state.position;
                    state.position += 1;
                    if let Some((k, v)) = data.entry_at(position) {
                        let v = if matches!(obj.kind, ObjectKind::Set(_)) { k.clone() } else { v };
                        return Some((k, v));
                    }
                }
                None
            }
            _ => None,
        })?;
        state.done = step.is_none();
        let result = match step {
            None => Value::Undefined,
            Some((k, v)) => match state.kind {
                IterKind::Keys => k,
                IterKind::Values => v,
                IterKind::Entries => Value::Object(self.new_array(vec![k, v])),
            },
        };
        let done = state.done;
        self.with_object_mut(*o, |obj| obj.kind = ObjectKind::Iterator(state))?;
        Ok(Value::Object(self.iter_result(result, done)))
    }

    // ---------------------------------------------------------------
    // Collections (builtin primitives used by the prototype methods)
    // ---------------------------------------------------------------

    pub(crate) fn with_map_data<R>(
        &self,
        this: &Value,
        set: bool,
        f: impl FnOnce(&mut MapData) -> R,
    ) -> HostResult<R> {
        let Value::Object(o) = this else {
            return Err(HostError::type_error("method called on incompatible receiver"));
        };
        self.with_object_mut(*o, |obj| match (&mut obj.kind, set) {
            (ObjectKind::Map(data), false) | (ObjectKind::Set(data), true) => Ok(f(data)),
            _ => Err(HostError::type_error(format!(
                "method called on incompatible receiver {}",
                obj.kind.class_name()
            ))),
        })?
    }

    pub(crate) fn with_array<R>(&self, this: &Value, f: impl FnOnce(&mut Vec<Value>) -> R) -> HostResult<R> {
        let Value::Object(o) = this else {
            return Err(HostError::type_error("Array method called on incompatible receiver"));
        };
        self.with_object_mut(*o, |obj| match &mut obj.kind {
            ObjectKind::Array(items) => Ok(f(items)),
            _ => Err(HostError::type_error("Array method called on incompatible receiver")),
        })?
    }

    pub(crate) fn store_barrier(&self, values: &[Value]) {
        for v in values {
            self.barrier(v);
        }
    }

    // ---------------------------------------------------------------
    // Conversion
    // ---------------------------------------------------------------

    /// `ToString`
    pub fn to_string(&self, value: &Value) -> HostResult<JsString> {
        match value {
            Value::Undefined => Ok(JsString::new("undefined")),
            Value::Null => Ok(JsString::new("null")),
            Value::Boolean(b) => Ok(JsString::new(if *b { "true" } else { "false" })),
            Value::Int32(i) => Ok(JsString::new(&i.to_string())),
            Value::Number(n) => Ok(JsString::new(&number_to_string(*n))),
            Value::String(s) => Ok(s.clone()),
            Value::Symbol(_) => Err(HostError::type_error("Cannot convert a Symbol value to a string")),
            Value::Object(_) => {
                let primitive = self.to_primitive(value)?;
                if let Value::Object(o) = primitive {
                    return Ok(JsString::new(&format!("[object {}]", self.class_name(o))));
                }
                self.to_string(&primitive)
            }
        }
    }

    /// `ToPrimitive` with the string hint.
    pub fn to_primitive(&self, value: &Value) -> HostResult<Value> {
        let Value::Object(o) = value else {
            return Ok(value.clone());
        };
        let exotic = self.get(*o, PropertyKey::Symbol(self.symbols.to_primitive.clone()))?;
        if self.is_callable(&exotic) {
            let result = self.call(&exotic, value, &[Value::string("string")])?;
            if matches!(result, Value::Object(_)) {
                return Err(HostError::type_error("Cannot convert object to primitive value"));
            }
            return Ok(result);
        }
        for name in ["toString", "valueOf"] {
            let method = self.get(*o, name)?;
            if self.is_callable(&method) {
                let result = self.call(&method, value, &[])?;
                if !matches!(result, Value::Object(_)) {
                    return Ok(result);
                }
            }
        }
        Ok(value.clone())
    }

    /// Best-effort rendering that never fails, used in messages and logs.
    pub fn display(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.to_string(),
            Value::Symbol(s) => format!("{:?}", s),
            Value::Object(o) => {
                if !self.is_alive(*o) {
                    return format!("<dead object {}>", o);
                }
                match self.to_string(value) {
                    Ok(s) => s.to_string(),
                    Err(_) => format!("[object {}]", self.class_name(*o)),
                }
            }
            other => self
                .to_string(other)
                .map(|s| s.to_string())
                .unwrap_or_default(),
        }
    }

    /// Materialize a host error as a thrown value.
    pub fn error_to_value(&self, error: HostError) -> Value {
        match error {
            HostError::Exception(thrown) => thrown.value,
            HostError::OutOfMemory => Value::Object(self.new_error("InternalError", "out of memory")),
            other => {
                let message = match &other {
                    HostError::TypeError(m)
                    | HostError::ReferenceError(m)
                    | HostError::RangeError(m)
                    | HostError::InternalError(m) => m.clone(),
                    _ => other.to_string(),
                };
                Value::Object(self.new_error(other.class_name(), &message))
            }
        }
    }

    /// Wrap a value as a thrown host error.
    pub fn throw(&self, value: Value) -> HostError {
        let message = match &value {
            Value::Object(o) if self.is_error(&value) => {
                let (name, message) = self.error_name_and_message(*o);
                if message.is_empty() {
                    name
                } else {
                    format!("{}: {}", name, message)
                }
            }
            other => self.display(other),
        };
        HostError::exception(value, message)
    }

    /// `(name, message)` of an error-like object, read through the
    /// property protocol. Missing fields become empty strings.
    pub fn error_name_and_message(&self, o: ObjectRef) -> (String, String) {
        let read = |name: &str| -> String {
            match self.get(o, name) {
                Ok(Value::Undefined) | Err(_) => String::new(),
                Ok(v) => self.display(&v),
            }
        };
        (read("name"), read("message"))
    }

    // ---------------------------------------------------------------
    // Garbage collection
    // ---------------------------------------------------------------

    fn root_cells(&self) -> Vec<CellId> {
        let mut roots = self.roots.cells();
        roots.extend(self.realms.borrow().iter().map(|g| g.cell()));
        roots.extend(self.entered.borrow().iter().map(|g| g.cell()));
        self.intrinsics.borrow().for_each(|o| roots.push(o.cell()));
        roots
    }

    /// Full collection. Relocation hooks run before finalizers, and both
    /// run before this returns.
    pub fn gc(&self) -> GcReport {
        let roots = self.root_cells();
        let collection = self.heap.borrow_mut().collect(&roots);
        self.after_collection(collection)
    }

    /// Begin an incremental cycle.
    pub fn start_incremental_gc(&self) {
        let roots = self.root_cells();
        self.heap.borrow_mut().start_incremental_gc(&roots);
    }

    /// Run one marking step; true when marking is done.
    pub fn gc_step(&self) -> bool {
        let budget = self.config.gc.incremental_budget;
        self.heap.borrow_mut().incremental_mark_step(budget)
    }

    /// Finish the running incremental cycle.
    pub fn finish_gc(&self) -> GcReport {
        let roots = self.root_cells();
        let collection = self.heap.borrow_mut().finish_gc(&roots);
        self.after_collection(collection)
    }

    /// Whether an incremental cycle is marking.
    pub fn is_gc_marking(&self) -> bool {
        self.heap.borrow().is_marking()
    }

    /// Keep `o` alive through the running cycle. Objects handed out of
    /// untraced side tables must go through here.
    pub fn expose_to_active_gc(&self, o: ObjectRef) -> bool {
        self.heap.borrow_mut().expose(o.cell())
    }

    fn after_collection(&self, collection: otter_bridge_gc::Collection<HostObject>) -> GcReport {
        let forwarding = collection.forwarding;
        if !forwarding.is_empty() {
            let forward = |id: CellId| forwarding.forward(id);
            self.roots.relocate(&forward);
            for g in self.realms.borrow_mut().iter_mut().chain(self.entered.borrow_mut().iter_mut()) {
                *g = ObjectRef::from_cell(forward(g.cell()));
            }
            self.intrinsics
                .borrow_mut()
                .for_each_mut(|o| *o = ObjectRef::from_cell(forward(o.cell())));
        }

        // Relocation hooks, collected first so no heap borrow is held
        let moved: Vec<(NativeData, ObjectRef, ObjectRef)> = {
            let heap = self.heap.borrow();
            forwarding
                .moves()
                .iter()
                .filter_map(|&(from, to)| match heap.get(to).map(|o| &o.kind) {
                    Some(ObjectKind::Native(native)) => Some((
                        native.clone(),
                        ObjectRef::from_cell(from),
                        ObjectRef::from_cell(to),
                    )),
                    _ => None,
                })
                .collect()
        };
        for (native, from, to) in &moved {
            native.class.moved(&native.data, *from, *to);
        }

        let freed = collection.finalized.len();
        let mut finalized = 0;
        for (_, object) in collection.finalized {
            if let ObjectKind::Native(native) = object.kind {
                finalized += 1;
                native.class.finalize(native.data);
            }
        }

        tracing::trace!(freed, moved = forwarding.len(), finalized, "host gc complete");
        GcReport {
            freed,
            moved: forwarding.len(),
            finalized,
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let cells = self.heap.get_mut().drain_all();
        for (_, object) in cells {
            if let ObjectKind::Native(native) = object.kind {
                native.class.finalize(native.data);
            }
        }
    }
}

/// Render a double the way the host prints numbers.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

/// Collect arguments with `undefined` padding.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

pub(crate) fn collect_args(args: &[Value]) -> Args {
    args.iter().cloned().collect()
}
