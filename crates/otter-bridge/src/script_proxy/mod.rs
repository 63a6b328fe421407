//! Script-side proxies for host objects
//!
//! A [`ScriptProxy`] is a native script object holding a rooted host value.
//! Its shape is fixed at creation and selects the protocol slots it
//! answers:
//!
//! | shape | from | extra protocol |
//! |---|---|---|
//! | `Array` | host array | length, index/slice items, `+`, `*`, `in`, ordering |
//! | `Map` | host `Map` | length, keyed items, structural equality |
//! | `Set` | host `Set` | length, `in`, set algebra |
//! | `Callable` | host function | call / construct |
//! | `Iterator` | `[Symbol.iterator]()` result | `next` |
//! | `Plain` | anything else | attributes only |
//!
//! Every proxy forwards attribute access, `dir`, iteration and `str` to the
//! host object.

mod array;
mod callable;
mod iterator;
mod map;
mod set;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use otter_host::{Context, ObjectRef, Persistent, PropertyKey, Value};
use otter_script::{
    BinaryOp, CompareOp, Interp, Kwargs, NativeObject, Obj, ScriptError, ScriptResult, TypeFeatures,
};

use crate::host_proxy::HostProxy;
use crate::report::HostResultExt;
use crate::state::BridgeState;

/// Shape of a script proxy, fixed when the proxy is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScriptShape {
    /// Host array
    Array,
    /// Host `Map`
    Map,
    /// Host `Set`
    Set,
    /// Host function
    Callable,
    /// Host iterator obtained from `[Symbol.iterator]()`
    Iterator,
    /// Any other host object
    Plain,
}

impl ScriptShape {
    /// Classify a host value. Array, map and set shapes take priority over
    /// callability.
    pub fn classify(cx: &Context, value: &Value) -> Self {
        if cx.is_array(value) {
            Self::Array
        } else if cx.is_map(value) {
            Self::Map
        } else if cx.is_set(value) {
            Self::Set
        } else if cx.is_callable(value) {
            Self::Callable
        } else {
            Self::Plain
        }
    }

    /// Script class name of proxies with this shape.
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Array => "Array",
            Self::Map => "Map",
            Self::Set => "Set",
            Self::Callable => "Function",
            Self::Iterator => "Iterator",
            Self::Plain => "Object",
        }
    }
}

/// Script classes of the proxies, one per shape.
pub(crate) struct ScriptClasses {
    object: Obj,
    array: Obj,
    map: Obj,
    set: Obj,
    function: Obj,
    iterator: Obj,
}

impl ScriptClasses {
    pub(crate) fn install(interp: &Interp, module: &Obj, module_name: &str) -> Self {
        let object = interp.native_class(ScriptShape::Plain.class_name(), module_name, TypeFeatures::default());
        let derived = |shape: ScriptShape, features: TypeFeatures| {
            let class = interp.native_class(shape.class_name(), module_name, features);
            if let Some(data) = class.as_class() {
                *data.bases.borrow_mut() = vec![object.clone()];
            }
            class
        };
        let classes = Self {
            array: derived(
                ScriptShape::Array,
                TypeFeatures {
                    sequence: true,
                    ..TypeFeatures::default()
                },
            ),
            map: derived(
                ScriptShape::Map,
                TypeFeatures {
                    mapping: true,
                    ..TypeFeatures::default()
                },
            ),
            set: derived(ScriptShape::Set, TypeFeatures::default()),
            function: derived(ScriptShape::Callable, TypeFeatures::default()),
            iterator: derived(
                ScriptShape::Iterator,
                TypeFeatures {
                    iternext: true,
                    ..TypeFeatures::default()
                },
            ),
            object,
        };
        map::install_methods(interp, &classes.map);
        set::install_methods(interp, &classes.set);

        if let Some(dict) = interp.module_dict(module) {
            for shape in [
                ScriptShape::Plain,
                ScriptShape::Array,
                ScriptShape::Map,
                ScriptShape::Set,
                ScriptShape::Callable,
                ScriptShape::Iterator,
            ] {
                interp.dict_set_str(&dict, shape.class_name(), classes.for_shape(shape).clone());
            }
        }
        classes
    }

    pub(crate) fn for_shape(&self, shape: ScriptShape) -> &Obj {
        match shape {
            ScriptShape::Array => &self.array,
            ScriptShape::Map => &self.map,
            ScriptShape::Set => &self.set,
            ScriptShape::Callable => &self.function,
            ScriptShape::Iterator => &self.iterator,
            ScriptShape::Plain => &self.object,
        }
    }
}

/// A script object wrapping one host value.
pub(crate) struct ScriptProxy {
    state: Weak<BridgeState>,
    shape: ScriptShape,
    uid: u64,
    cached: bool,
    target: RefCell<Option<Persistent>>,
    /// `this` for bound callables
    receiver: RefCell<Option<Persistent>>,
    exhausted: Cell<bool>,
}

impl ScriptProxy {
    pub(crate) fn shape(&self) -> ScriptShape {
        self.shape
    }

    pub(crate) fn state(&self) -> ScriptResult<Rc<BridgeState>> {
        self.state
            .upgrade()
            .ok_or_else(|| ScriptError::runtime_error("bridge has been finalized"))
    }

    fn released(&self) -> ScriptError {
        match self.state.upgrade() {
            Some(state) => state.xpcom_error("host object was released"),
            None => ScriptError::runtime_error("bridge has been finalized"),
        }
    }

    /// The wrapped host value.
    pub(crate) fn host_value(&self) -> ScriptResult<Value> {
        match self.target.borrow().as_ref() {
            Some(target) => Ok(target.get()),
            None => Err(self.released()),
        }
    }

    pub(crate) fn object(&self) -> ScriptResult<ObjectRef> {
        match self.target.borrow().as_ref().and_then(Persistent::object) {
            Some(o) => Ok(o),
            None => Err(self.released()),
        }
    }

    fn receiver(&self) -> Option<Value> {
        self.receiver.borrow().as_ref().map(Persistent::get)
    }

    /// Drop the host roots. Later use raises `XPCOMError`.
    pub(crate) fn release(&self) {
        self.target.borrow_mut().take();
        self.receiver.borrow_mut().take();
    }

    /// Run `f` with both runtimes entered.
    fn with_state<T>(&self, f: impl FnOnce(&BridgeState) -> ScriptResult<T>) -> ScriptResult<T> {
        let state = self.state()?;
        let _entry = state.enter_from_script();
        f(&state)
    }

    fn describe(&self, interp: &Interp, this: &Obj) -> String {
        interp
            .repr(this)
            .unwrap_or_else(|_| format!("<{} object>", self.shape.class_name()))
    }

    /// Identity comparison between two proxies. Bound callables compare
    /// equal when both the function and the receiver match.
    fn identity_compare(&self, interp: &Interp, other: &Obj, op: CompareOp) -> ScriptResult<Obj> {
        let Some(other) = other.native_data::<ScriptProxy>() else {
            return Ok(interp.not_implemented());
        };
        let same_receiver = match (self.receiver(), other.receiver()) {
            (Some(a), Some(b)) => a.strict_equals(&b),
            (None, None) => true,
            _ => false,
        };
        let same = same_receiver && self.host_value()?.strict_equals(&other.host_value()?);
        match op {
            CompareOp::Eq => Ok(interp.bool(same)),
            CompareOp::Ne => Ok(interp.bool(!same)),
            _ => Err(ScriptError::type_error(format!(
                "unorderable types: {}() {} {}()",
                self.shape.class_name(),
                op.symbol(),
                other.shape.class_name()
            ))),
        }
    }

    fn iterate_host(&self, interp: &Interp, this: &Obj) -> ScriptResult<Obj> {
        self.with_state(|state| {
            let value = self.host_value()?;
            if self.shape == ScriptShape::Map {
                let keys = state.cx.call_method(&value, "keys", &[]).into_script(state)?;
                return state.iterator_proxy(keys);
            }
            let key = PropertyKey::Symbol(state.cx.symbols().iterator.clone());
            let method = state.cx.get_value(&value, key).into_script(state)?;
            if !state.cx.is_callable(&method) {
                return Err(ScriptError::type_error(format!(
                    "{} is not iterable",
                    self.describe(interp, this)
                )));
            }
            let iterator = state.cx.call(&method, &value, &[]).into_script(state)?;
            if !matches!(iterator, Value::Object(_)) {
                return Err(ScriptError::type_error(
                    "Result of the Symbol.iterator method is not an object",
                ));
            }
            state.iterator_proxy(iterator)
        })
    }
}

impl Drop for ScriptProxy {
    fn drop(&mut self) {
        tracing::trace!(uid = self.uid, shape = ?self.shape, "script proxy finalized");
        if self.cached {
            if let Some(state) = self.state.upgrade() {
                state.script_proxies.forget(self.uid);
            }
        }
    }
}

impl NativeObject for ScriptProxy {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn getattr(&self, interp: &Interp, this: &Obj, name: &str) -> Option<ScriptResult<Obj>> {
        // Helpers on the proxy class win over host properties
        if interp.lookup_type_attr(&interp.type_of(this), name).is_some() {
            return None;
        }
        Some(self.with_state(|state| {
            let o = self.object()?;
            let value = state.cx.get(o, name).into_script(state)?;
            if value.is_undefined() {
                return Err(ScriptError::attribute_error(format!(
                    "{} has no attribute '{}'",
                    self.describe(interp, this),
                    name
                )));
            }
            state.attribute_to_script(&value, o)
        }))
    }

    fn setattr(
        &self,
        _interp: &Interp,
        _this: &Obj,
        name: &str,
        value: Option<&Obj>,
    ) -> Option<ScriptResult<()>> {
        Some(self.with_state(|state| {
            let o = self.object()?;
            match value {
                Some(value) => {
                    let value = state.to_host(value)?;
                    state.cx.set(o, name, value).into_script(state)
                }
                None => {
                    let deleted = state.cx.delete(o, name).into_script(state)?;
                    if !deleted || state.cx.has_own_property(o, name).into_script(state)? {
                        return Err(ScriptError::attribute_error(format!(
                            "readonly attribute '{}'",
                            name
                        )));
                    }
                    Ok(())
                }
            }
        }))
    }

    fn dir(&self, _interp: &Interp, _this: &Obj) -> Option<ScriptResult<Vec<String>>> {
        Some(self.with_state(|state| {
            let keys = state.cx.enumerate(self.object()?).into_script(state)?;
            Ok(keys.iter().filter_map(|k| state.key_name(k).ok()).collect())
        }))
    }

    fn repr(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<String>> {
        let wrapping = match (self.state(), self.host_value()) {
            (Ok(state), Ok(value)) => {
                let _entry = state.enter_from_script();
                state.cx.display(&value)
            }
            _ => "<released>".to_string(),
        };
        Some(Ok(format!(
            "<{} object at {:#x}; wrapping: {}>",
            interp.type_name(this),
            this.id(),
            wrapping
        )))
    }

    fn str(&self, _interp: &Interp, _this: &Obj) -> Option<ScriptResult<String>> {
        Some(self.with_state(|state| {
            let text = state.cx.to_string(&self.host_value()?).into_script(state)?;
            Ok(text.to_string_lossy())
        }))
    }

    fn hash(&self, _interp: &Interp, _this: &Obj) -> Option<ScriptResult<i64>> {
        Some(Ok(self.uid as i64))
    }

    fn richcompare(
        &self,
        interp: &Interp,
        _this: &Obj,
        other: &Obj,
        op: CompareOp,
    ) -> Option<ScriptResult<Obj>> {
        Some(match self.shape {
            ScriptShape::Array => self.with_state(|state| self.array_compare(state, other, op)),
            ScriptShape::Map => self.with_state(|state| self.map_compare(state, other, op)),
            ScriptShape::Set => self.with_state(|state| self.set_compare(state, other, op)),
            _ => self.identity_compare(interp, other, op),
        })
    }

    fn len(&self, _interp: &Interp, _this: &Obj) -> Option<ScriptResult<usize>> {
        match self.shape {
            ScriptShape::Array => Some(self.with_state(|state| self.array_len(state))),
            ScriptShape::Map | ScriptShape::Set => Some(self.with_state(|state| {
                state
                    .cx
                    .collection_size(self.object()?)
                    .ok_or_else(|| ScriptError::type_error("host collection has no size"))
            })),
            _ => None,
        }
    }

    fn getitem(&self, _interp: &Interp, _this: &Obj, key: &Obj) -> Option<ScriptResult<Obj>> {
        match self.shape {
            ScriptShape::Array => Some(self.with_state(|state| self.array_getitem(state, key))),
            ScriptShape::Map => Some(self.with_state(|state| self.map_getitem(state, key))),
            _ => None,
        }
    }

    fn setitem(
        &self,
        _interp: &Interp,
        _this: &Obj,
        key: &Obj,
        value: Option<&Obj>,
    ) -> Option<ScriptResult<()>> {
        match (self.shape, value) {
            (ScriptShape::Array, Some(v)) => Some(self.with_state(|state| self.array_setitem(state, key, v))),
            (ScriptShape::Array, None) => Some(self.with_state(|state| self.array_delitem(state, key))),
            (ScriptShape::Map, Some(v)) => Some(self.with_state(|state| self.map_setitem(state, key, v))),
            (ScriptShape::Map, None) => Some(self.with_state(|state| self.map_delitem(state, key))),
            _ => None,
        }
    }

    fn contains(&self, _interp: &Interp, _this: &Obj, item: &Obj) -> Option<ScriptResult<bool>> {
        match self.shape {
            ScriptShape::Array => Some(self.with_state(|state| self.array_contains(state, item))),
            ScriptShape::Map | ScriptShape::Set => Some(self.with_state(|state| self.collection_has(state, item))),
            _ => None,
        }
    }

    fn iter(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<Obj>> {
        match self.shape {
            ScriptShape::Iterator => Some(Ok(this.clone())),
            _ => Some(self.iterate_host(interp, this)),
        }
    }

    fn next(&self, _interp: &Interp, _this: &Obj) -> Option<ScriptResult<Option<Obj>>> {
        match self.shape {
            ScriptShape::Iterator => Some(self.with_state(|state| self.iterator_next(state))),
            _ => None,
        }
    }

    fn is_callable(&self) -> bool {
        self.shape == ScriptShape::Callable
    }

    fn call(
        &self,
        _interp: &Interp,
        _this: &Obj,
        args: &[Obj],
        kwargs: &Kwargs,
    ) -> Option<ScriptResult<Obj>> {
        match self.shape {
            ScriptShape::Callable => Some(self.with_state(|state| self.invoke(state, args, kwargs))),
            _ => None,
        }
    }

    fn binary_op(
        &self,
        _interp: &Interp,
        this: &Obj,
        op: BinaryOp,
        other: &Obj,
        reflected: bool,
    ) -> Option<ScriptResult<Obj>> {
        match self.shape {
            ScriptShape::Array => Some(self.with_state(|state| self.array_binary(state, op, other, reflected))),
            ScriptShape::Set => Some(self.with_state(|state| self.set_binary(state, this, op, other, reflected))),
            _ => None,
        }
    }

    fn inplace_op(
        &self,
        _interp: &Interp,
        this: &Obj,
        op: BinaryOp,
        other: &Obj,
    ) -> Option<ScriptResult<Obj>> {
        match self.shape {
            ScriptShape::Array => Some(self.with_state(|state| self.array_inplace(state, this, op, other))),
            _ => None,
        }
    }
}

impl ScriptProxy {
    /// `key in` a host `Map` or `Set`.
    fn collection_has(&self, state: &BridgeState, item: &Obj) -> ScriptResult<bool> {
        let key = state.to_host(item)?;
        let found = state
            .cx
            .call_method(&self.host_value()?, "has", &[key])
            .into_script(state)?;
        Ok(found.truthy())
    }
}

/// Receiver of a helper method installed on a proxy class.
fn method_receiver<'a>(args: &'a [Obj], name: &str) -> ScriptResult<(&'a Obj, &'a ScriptProxy)> {
    let receiver = args
        .first()
        .and_then(|this| this.native_data::<ScriptProxy>().map(|proxy| (this, proxy)));
    receiver.ok_or_else(|| {
        ScriptError::type_error(format!("descriptor '{}' requires a host proxy receiver", name))
    })
}

impl BridgeState {
    /// Cached proxy for a host object.
    pub(crate) fn script_proxy_for(&self, o: ObjectRef) -> ScriptResult<Obj> {
        let uid = self
            .cx
            .unique_id(o)
            .ok_or_else(|| self.xpcom_error("host object is no longer alive"))?;
        if let Some(proxy) = self.script_proxies.get(uid) {
            return Ok(proxy);
        }
        let value = Value::Object(o);
        let shape = ScriptShape::classify(&self.cx, &value);
        let proxy = self.new_script_proxy(value, shape, None, true)?;
        self.script_proxies.put(uid, &proxy);
        Ok(proxy)
    }

    pub(crate) fn new_script_proxy(
        &self,
        value: Value,
        shape: ScriptShape,
        receiver: Option<Value>,
        cached: bool,
    ) -> ScriptResult<Obj> {
        let uid = value
            .as_object()
            .and_then(|o| self.cx.unique_id(o))
            .ok_or_else(|| self.xpcom_error("host object is no longer alive"))?;
        let proxy = ScriptProxy {
            state: self.this.clone(),
            shape,
            uid,
            cached,
            target: RefCell::new(Some(self.cx.root(value))),
            receiver: RefCell::new(receiver.map(|r| self.cx.root(r))),
            exhausted: Cell::new(false),
        };
        tracing::trace!(uid, shape = ?shape, cached, "script proxy created");
        Ok(self.interp.new_native(self.script_classes.for_shape(shape), proxy))
    }

    /// A property value read off `owner`. Functions are bound to `owner`.
    ///
    /// Bound callables are not cached: every read yields a new proxy, so
    /// two reads compare equal but are not the same script object.
    pub(crate) fn attribute_to_script(&self, value: &Value, owner: ObjectRef) -> ScriptResult<Obj> {
        if let Value::Object(o) = value {
            let foreign = self.cx.native_data_as::<HostProxy>(*o).is_some();
            if !foreign && ScriptShape::classify(&self.cx, value) == ScriptShape::Callable {
                return self.new_script_proxy(
                    value.clone(),
                    ScriptShape::Callable,
                    Some(Value::Object(owner)),
                    false,
                );
            }
        }
        self.to_script(value)
    }

    /// Uncached iterator proxy.
    pub(crate) fn iterator_proxy(&self, iterator: Value) -> ScriptResult<Obj> {
        self.new_script_proxy(iterator, ScriptShape::Iterator, None, false)
    }
}
