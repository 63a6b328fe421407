//! Host-side proxies for script objects
//!
//! A [`HostProxy`] is the payload of a native host object that owns one
//! strong reference to a script object. Instances get the wrapper type of
//! their script class as prototype; wrapper types chain to the wrapper of
//! `type` itself (the proto base). Helper methods live on the wrapper types
//! (see `types.rs`), so host code finds `size`, `forEach` or `next` through
//! ordinary prototype lookup while everything else forwards to the script
//! object.
//!
//! The class hooks see a property lookup only when it started at the proxy
//! itself. A lookup that reaches a wrapper type through the prototype chain
//! of an instance reads the wrapper's own helpers and nothing else.

mod types;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use otter_host::{Context, HostError, HostResult, NativeClass, ObjectRef, PropertyKey, Value};
use otter_script::{Interp, Obj, ScriptError, ScriptResult};
use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::report::ScriptResultExt;
use crate::state::BridgeState;

/// Shape of a wrapper type, from what the script class supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeShape {
    /// Any other class
    Base,
    /// `dict` subclasses and classes with mapping subscription
    Mapping,
    /// `list`/`tuple` subclasses and classes with sequence item access
    Sequence,
    /// `set`/`frozenset` subclasses
    Set,
    /// Classes whose instances are iterators
    Iterator,
}

impl TypeShape {
    /// Classify a script class. The checks run in a fixed order and the
    /// first match wins.
    pub fn classify(interp: &Interp, class: &Obj) -> Self {
        if interp.type_is_dict_subclass(class) {
            Self::Mapping
        } else if interp.type_is_list_or_tuple_subclass(class) {
            Self::Sequence
        } else if interp.type_is_set_subclass(class) {
            Self::Set
        } else if interp.type_has_iternext(class) {
            Self::Iterator
        } else if interp.type_has_subscript(class) {
            Self::Mapping
        } else if interp.type_has_sq_item(class) {
            Self::Sequence
        } else {
            Self::Base
        }
    }
}

/// Shape of a host proxy, fixed when the proxy is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostShape {
    /// Plain script object
    Object,
    /// `list`, `tuple` or another non-mapping sequence; integer keys are items
    Sequence,
    /// Callable script object
    Callable,
    /// Script class
    Type(TypeShape),
}

impl HostShape {
    /// Classify a script object.
    pub fn classify(interp: &Interp, obj: &Obj) -> Self {
        if interp.is_type(obj) {
            return Self::Type(TypeShape::classify(interp, obj));
        }
        let class = interp.type_of(obj);
        if interp.type_is_list_or_tuple_subclass(&class)
            || (interp.is_sequence(obj) && !interp.is_mapping(obj))
        {
            Self::Sequence
        } else if interp.is_callable(obj) {
            Self::Callable
        } else {
            Self::Object
        }
    }
}

/// Payload of a host proxy object.
pub(crate) struct HostProxy {
    target: RefCell<Option<Obj>>,
    /// Address of the script object, the cache key
    id: usize,
    shape: HostShape,
    cached: bool,
    /// `__iterator__` mode: `next` yields bare values and throws at the end
    legacy: bool,
    /// Current heap location, kept up to date by the relocation hook
    location: Cell<Option<ObjectRef>>,
}

impl HostProxy {
    /// The wrapped script object, `None` once released.
    pub(crate) fn target(&self) -> Option<Obj> {
        self.target.borrow().clone()
    }

    pub(crate) fn shape(&self) -> HostShape {
        self.shape
    }

    pub(crate) fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub(crate) fn release(&self) -> Option<Obj> {
        self.target.borrow_mut().take()
    }

    fn live_target(&self) -> HostResult<Obj> {
        self.target()
            .ok_or_else(|| HostError::internal("script object was released"))
    }
}

/// The native classes of host proxies, one per shape family.
pub(crate) struct HostClasses {
    object: Rc<HostProxyClass>,
    sequence: Rc<HostProxyClass>,
    callable: Rc<HostProxyClass>,
    type_: Rc<HostProxyClass>,
}

impl HostClasses {
    pub(crate) fn new(state: &Weak<BridgeState>) -> Self {
        let class = |name, callable, constructor| {
            Rc::new(HostProxyClass {
                state: state.clone(),
                name,
                callable,
                constructor,
            })
        };
        Self {
            object: class("ScriptObject", false, false),
            sequence: class("ScriptSequence", false, false),
            callable: class("ScriptFunction", true, false),
            type_: class("ScriptType", true, true),
        }
    }

    fn for_shape(&self, shape: HostShape) -> Rc<dyn NativeClass> {
        match shape {
            HostShape::Object => self.object.clone(),
            HostShape::Sequence => self.sequence.clone(),
            HostShape::Callable => self.callable.clone(),
            HostShape::Type(_) => self.type_.clone(),
        }
    }
}

struct HostProxyClass {
    state: Weak<BridgeState>,
    name: &'static str,
    callable: bool,
    constructor: bool,
}

impl HostProxyClass {
    fn state(&self) -> HostResult<Rc<BridgeState>> {
        self.state
            .upgrade()
            .ok_or_else(|| HostError::internal("bridge has been finalized"))
    }

    fn proxy(cx: &Context, this: ObjectRef) -> HostResult<Rc<HostProxy>> {
        cx.native_data_as::<HostProxy>(this)
            .ok_or_else(|| HostError::type_error("not a script object proxy"))
    }

    /// Attribute name for a string or index key. Symbols have none.
    fn attribute_name(key: &PropertyKey) -> Option<String> {
        match key {
            PropertyKey::String(s) => Some(s.to_string_lossy()),
            PropertyKey::Index(i) => Some(i.to_string()),
            PropertyKey::Symbol(_) => None,
        }
    }

    fn sequence_index(proxy: &HostProxy, key: &PropertyKey) -> Option<u32> {
        match (proxy.shape, key) {
            (HostShape::Sequence, PropertyKey::Index(i)) => Some(*i),
            _ => None,
        }
    }
}

impl NativeClass for HostProxyClass {
    fn name(&self) -> &str {
        self.name
    }

    fn get_property(
        &self,
        cx: &Context,
        this: ObjectRef,
        key: &PropertyKey,
        receiver: &Value,
    ) -> HostResult<Option<Value>> {
        if receiver.as_object() != Some(this) {
            return Ok(None);
        }
        let Some(name) = Self::attribute_name(key) else {
            return Ok(None);
        };
        // Helpers on the wrapper types win over script attributes
        if cx.find_property(this, key)?.is_some() {
            return Ok(None);
        }
        let state = self.state()?;
        let proxy = Self::proxy(cx, this)?;
        let target = proxy.live_target()?;
        let _entry = state.enter_from_host();
        let interp = &*state.interp;

        if let Some(index) = Self::sequence_index(&proxy, key) {
            return match interp.getitem(&target, &interp.int(i64::from(index))) {
                Ok(item) => state.to_host(&item).into_host(&state).map(Some),
                Err(err) if interp.error_matches(&err, &interp.types().index_error) => {
                    Ok(Some(Value::Undefined))
                }
                Err(err) => Err(state.script_error_to_host(err)),
            };
        }
        match interp.getattr(&target, &name) {
            Ok(value) => state.to_host(&value).into_host(&state).map(Some),
            // Not found: ordinary lookup continues on the prototype chain
            Err(err) if interp.is_attribute_error(&err) => Ok(None),
            Err(err) => Err(state.script_error_to_host(err)),
        }
    }

    fn set_property(
        &self,
        cx: &Context,
        this: ObjectRef,
        key: &PropertyKey,
        value: &Value,
    ) -> HostResult<bool> {
        let Some(name) = Self::attribute_name(key) else {
            return Ok(false);
        };
        let state = self.state()?;
        let proxy = Self::proxy(cx, this)?;
        let target = proxy.live_target()?;
        let _entry = state.enter_from_host();
        let interp = &*state.interp;
        let value = state.to_script(value).into_host(&state)?;
        match Self::sequence_index(&proxy, key) {
            Some(index) => interp.setitem(&target, &interp.int(i64::from(index)), value),
            None => interp.setattr(&target, &name, value),
        }
        .into_host(&state)?;
        Ok(true)
    }

    fn delete_property(
        &self,
        cx: &Context,
        this: ObjectRef,
        key: &PropertyKey,
    ) -> HostResult<Option<bool>> {
        let Some(name) = Self::attribute_name(key) else {
            return Ok(None);
        };
        let state = self.state()?;
        let proxy = Self::proxy(cx, this)?;
        let target = proxy.live_target()?;
        let _entry = state.enter_from_host();
        let interp = &*state.interp;
        let result = match Self::sequence_index(&proxy, key) {
            Some(index) => interp.delitem(&target, &interp.int(i64::from(index))),
            None => interp.delattr(&target, &name),
        };
        match result {
            Ok(()) => Ok(Some(true)),
            Err(err) if interp.is_attribute_error(&err) => Ok(Some(true)),
            Err(err) => Err(state.script_error_to_host(err)),
        }
    }

    fn has_property(&self, cx: &Context, this: ObjectRef, key: &PropertyKey) -> HostResult<Option<bool>> {
        let Some(name) = Self::attribute_name(key) else {
            return Ok(None);
        };
        let state = self.state()?;
        let proxy = Self::proxy(cx, this)?;
        let target = proxy.live_target()?;
        let _entry = state.enter_from_host();
        let interp = &*state.interp;
        if let Some(index) = Self::sequence_index(&proxy, key) {
            let len = interp.len(&target).into_host(&state)?;
            return Ok(Some((index as usize) < len));
        }
        interp.hasattr(&target, &name).into_host(&state).map(Some)
    }

    fn enumerate(&self, cx: &Context, this: ObjectRef) -> HostResult<Option<Vec<PropertyKey>>> {
        let state = self.state()?;
        let proxy = Self::proxy(cx, this)?;
        let target = proxy.live_target()?;
        let _entry = state.enter_from_host();
        let interp = &*state.interp;
        let names = match proxy.shape {
            HostShape::Sequence => {
                let len = interp.len(&target).into_host(&state)?;
                let len = u32::try_from(len).map_err(|_| HostError::range_error("sequence is too long"))?;
                return Ok(Some((0..len).map(PropertyKey::Index).collect()));
            }
            HostShape::Type(_) => class_attributes(&target),
            _ => instance_attributes(interp, &target).into_host(&state)?,
        };
        Ok(Some(names.iter().map(|n| PropertyKey::string(n)).collect()))
    }

    fn is_callable(&self) -> bool {
        self.callable
    }

    fn is_constructor(&self) -> bool {
        self.constructor
    }

    fn call(&self, cx: &Context, callee: ObjectRef, _this: &Value, args: &[Value]) -> HostResult<Value> {
        let state = self.state()?;
        let target = Self::proxy(cx, callee)?.live_target()?;
        let _entry = state.enter_from_host();
        tracing::debug!(callee = %state.interp.type_name(&target), argc = args.len(), "host calls script");
        let args = state.script_args(args).into_host(&state)?;
        let result = state.interp.call(&target, &args, &[]).into_host(&state)?;
        state.to_host(&result).into_host(&state)
    }

    fn construct(&self, cx: &Context, callee: ObjectRef, args: &[Value]) -> HostResult<Value> {
        self.call(cx, callee, &Value::Undefined, args)
    }

    /// Values that are not script proxies count as instances of every
    /// wrapper type.
    fn has_instance(&self, cx: &Context, callee: ObjectRef, value: &Value) -> HostResult<Option<bool>> {
        let state = self.state()?;
        let class = Self::proxy(cx, callee)?.live_target()?;
        let Some(instance) = value
            .as_object()
            .and_then(|o| cx.native_data_as::<HostProxy>(o))
            .and_then(|p| p.target())
        else {
            return Ok(Some(true));
        };
        let _entry = state.enter_from_host();
        state.interp.isinstance(&instance, &class).into_host(&state).map(Some)
    }

    fn finalize(&self, data: Rc<dyn Any>) {
        let Some(proxy) = data.downcast_ref::<HostProxy>() else {
            return;
        };
        let Some(state) = self.state.upgrade() else {
            drop(proxy.release());
            return;
        };
        let _gil = state.interp.gil();
        if proxy.cached {
            if let Some(location) = proxy.location.get() {
                state.host_proxies.remove_if(proxy.id, location);
            }
        }
        tracing::trace!(id = proxy.id, shape = ?proxy.shape, "host proxy finalized");
        drop(proxy.release());
    }

    fn moved(&self, data: &Rc<dyn Any>, from: ObjectRef, to: ObjectRef) {
        let Some(proxy) = data.downcast_ref::<HostProxy>() else {
            return;
        };
        proxy.location.set(Some(to));
        if proxy.cached {
            if let Some(state) = self.state.upgrade() {
                state.host_proxies.update_location(proxy.id, from, to);
            }
        }
    }
}

/// Attribute names of an instance: `vars()` when it has a namespace,
/// otherwise `dir()`.
fn instance_attributes(interp: &Interp, target: &Obj) -> ScriptResult<Vec<String>> {
    match interp.vars(target) {
        Ok(namespace) => Ok(interp
            .iterate(&namespace)?
            .iter()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect()),
        Err(_) => interp.dir(target),
    }
}

/// Class attributes merged depth-first over the bases. Names found first
/// stay in place; a class already visited is skipped, so cyclic base
/// lists terminate.
fn class_attributes(class: &Obj) -> Vec<String> {
    fn visit(class: &Obj, names: &mut IndexSet<String, FxBuildHasher>, seen: &mut FxHashSet<usize>) {
        if !seen.insert(class.id()) {
            return;
        }
        let Some(data) = class.as_class() else {
            return;
        };
        names.extend(data.dict.borrow().keys().cloned());
        let bases = data.bases.borrow().clone();
        for base in &bases {
            visit(base, names, seen);
        }
    }
    let mut names = IndexSet::default();
    let mut seen = FxHashSet::default();
    visit(class, &mut names, &mut seen);
    names.into_iter().collect()
}

impl BridgeState {
    /// Cached host proxy for a script object. Classes map to their wrapper
    /// type.
    pub(crate) fn host_proxy_for(&self, obj: &Obj) -> ScriptResult<ObjectRef> {
        if self.interp.is_type(obj) {
            return self.type_proxy(obj);
        }
        let id = obj.id();
        if let Some(proxy) = self.host_proxies.get(id) {
            if self.cx.is_alive(proxy) && self.cx.expose_to_active_gc(proxy) {
                return Ok(proxy);
            }
            self.host_proxies.remove(id);
        }
        let shape = HostShape::classify(&self.interp, obj);
        let proto = self.type_proxy(&self.interp.type_of(obj))?;
        let proxy = self.new_host_proxy(obj, shape, Some(proto), true, false);
        self.host_proxies.put(id, proxy);
        Ok(proxy)
    }

    /// Uncached proxy for a script iterator, used by the iteration helpers.
    pub(crate) fn host_iterator_proxy(&self, iterator: &Obj, legacy: bool) -> ScriptResult<ObjectRef> {
        let proto = self.type_proxy(&self.interp.type_of(iterator))?;
        Ok(self.new_host_proxy(iterator, HostShape::Object, Some(proto), false, legacy))
    }

    /// Wrapper type of a script class, created once and kept rooted in the
    /// registry until the bridge is finalized.
    pub(crate) fn type_proxy(&self, class: &Obj) -> ScriptResult<ObjectRef> {
        let class_id = class.id();
        if let Some(proxy) = self.wrapper_types.get(class_id) {
            return Ok(proxy);
        }
        let root = self.proto_base()?;
        if class.is(&self.interp.types().type_) {
            return Ok(root);
        }
        let shape = TypeShape::classify(&self.interp, class);
        let proxy = self.new_host_proxy(class, HostShape::Type(shape), Some(root), false, false);
        self.install_type_helpers(proxy, shape);
        self.wrapper_types.register(class, self.cx.root(Value::Object(proxy)));
        tracing::debug!(class = %otter_script::qualified_class_name(class), shape = ?shape, "wrapper type created");
        Ok(proxy)
    }

    /// The wrapper type of `type`, prototype of every other wrapper type.
    pub(crate) fn proto_base(&self) -> ScriptResult<ObjectRef> {
        if let Some(root) = self.wrapper_types.root() {
            return Ok(root);
        }
        if self.is_finalized() {
            return Err(ScriptError::runtime_error("bridge has been finalized"));
        }
        let type_ = self.interp.types().type_.clone();
        let root = self.new_host_proxy(&type_, HostShape::Type(TypeShape::Base), None, false, false);
        self.install_type_helpers(root, TypeShape::Base);
        self.wrapper_types.set_root(Some(self.cx.root(Value::Object(root))));
        Ok(root)
    }

    fn new_host_proxy(
        &self,
        obj: &Obj,
        shape: HostShape,
        proto: Option<ObjectRef>,
        cached: bool,
        legacy: bool,
    ) -> ObjectRef {
        let proxy = Rc::new(HostProxy {
            target: RefCell::new(Some(obj.clone())),
            id: obj.id(),
            shape,
            cached,
            legacy,
            location: Cell::new(None),
        });
        let o = self
            .cx
            .new_native(proto, self.host_classes.for_shape(shape), proxy.clone());
        proxy.location.set(Some(o));
        tracing::trace!(id = proxy.id, shape = ?shape, cached, "host proxy created");
        o
    }
}

#[cfg(test)]
mod tests {
    use otter_host::{Context, PropertyKey, Value};
    use otter_script::Interp;

    use super::*;
    use crate::{Bridge, BridgeConfig};

    fn bridge() -> Bridge {
        Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_shape_priority() {
        let bridge = bridge();
        let interp = bridge.interp();
        let t = interp.types();
        assert_eq!(TypeShape::classify(interp, &t.dict), TypeShape::Mapping);
        assert_eq!(TypeShape::classify(interp, &t.tuple), TypeShape::Sequence);
        assert_eq!(TypeShape::classify(interp, &t.frozenset), TypeShape::Set);
        assert_eq!(TypeShape::classify(interp, &t.generator), TypeShape::Iterator);
        assert_eq!(TypeShape::classify(interp, &t.int), TypeShape::Base);

        assert_eq!(HostShape::classify(interp, &interp.list(vec![])), HostShape::Sequence);
        assert_eq!(HostShape::classify(interp, &interp.dict()), HostShape::Object);
        assert_eq!(HostShape::classify(interp, &t.list), HostShape::Type(TypeShape::Sequence));
        let f = interp.function("f", |interp, _, _| Ok(interp.none()));
        assert_eq!(HostShape::classify(interp, &f), HostShape::Callable);
    }

    #[test]
    fn test_identity_is_cached() {
        let bridge = bridge();
        let interp = bridge.interp();
        let obj = interp.list(vec![interp.int(1)]);
        let a = bridge.to_host(&obj).unwrap();
        let b = bridge.to_host(&obj).unwrap();
        assert!(a.strict_equals(&b));
        assert_eq!(bridge.host_proxy_count(), 1);
        assert!(bridge.to_script(&a).unwrap().is(&obj));
    }

    #[test]
    fn test_sequence_items_and_length() {
        let bridge = bridge();
        let cx = bridge.context();
        let interp = bridge.interp();
        let list = interp.list(vec![interp.int(10), interp.str("x")]);
        let Value::Object(proxy) = bridge.to_host(&list).unwrap() else {
            panic!("expected an object");
        };
        assert!(cx.get(proxy, 0u32).unwrap().strict_equals(&Value::Int32(10)));
        assert!(cx.get(proxy, 5u32).unwrap().is_undefined());
        assert!(cx.get(proxy, "length").unwrap().strict_equals(&Value::Int32(2)));
        cx.set(proxy, 1u32, Value::Boolean(true)).unwrap();
        assert_eq!(list.as_list().unwrap().borrow()[1].as_bool(), Some(true));
        assert_eq!(cx.enumerate(proxy).unwrap(), vec![PropertyKey::Index(0), PropertyKey::Index(1)]);
    }

    #[test]
    fn test_enumerate_merges_bases_once() {
        let bridge = bridge();
        let interp = bridge.interp();
        let cx = bridge.context();
        let mut base_attrs = otter_script::AttrMap::default();
        base_attrs.insert("shared".to_string(), interp.int(1));
        base_attrs.insert("base_only".to_string(), interp.int(2));
        let base = interp.new_class("Base", "m", vec![], base_attrs).unwrap();
        let mut attrs = otter_script::AttrMap::default();
        attrs.insert("shared".to_string(), interp.int(3));
        let derived = interp.new_class("Derived", "m", vec![base.clone()], attrs).unwrap();
        // A cycle in the base list must not hang the walk
        if let Some(data) = base.as_class() {
            data.bases.borrow_mut().push(derived.clone());
        }
        let Value::Object(proxy) = bridge.to_host(&derived).unwrap() else {
            panic!("expected an object");
        };
        let keys = cx.enumerate(proxy).unwrap();
        let names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let shared = names.iter().filter(|n| n.as_str() == "shared").count();
        assert_eq!(shared, 1);
        assert!(names.iter().any(|n| n == "base_only"));
        if let Some(data) = base.as_class() {
            data.bases.borrow_mut().clear();
        }
    }
}
