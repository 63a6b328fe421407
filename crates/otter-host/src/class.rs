//! Native class hooks
//!
//! A native object is a heap object whose behavior is partly supplied by
//! the embedder. Every hook has a default that falls back to ordinary
//! object semantics, so a class only overrides what it intercepts.

use std::any::Any;
use std::rc::Rc;

use crate::context::Context;
use crate::error::{HostError, HostResult};
use crate::object::PropertyKey;
use crate::value::{ObjectRef, Value};

/// Class hooks for native objects.
///
/// Hooks run with no heap borrow held; they may call back into the
/// [`Context`] freely, including allocating and running host functions.
pub trait NativeClass {
    /// Class name, reported by `Object.prototype.toString`.
    fn name(&self) -> &str;

    /// Intercept a property read on `this`.
    ///
    /// `Ok(None)` continues with the ordinary lookup (own properties, then
    /// the prototype chain). `receiver` is the object the lookup started
    /// from, which differs from `this` when `this` is on its prototype chain.
    fn get_property(
        &self,
        _cx: &Context,
        _this: ObjectRef,
        _key: &PropertyKey,
        _receiver: &Value,
    ) -> HostResult<Option<Value>> {
        Ok(None)
    }

    /// Intercept a property write. `Ok(false)` performs the ordinary write.
    fn set_property(
        &self,
        _cx: &Context,
        _this: ObjectRef,
        _key: &PropertyKey,
        _value: &Value,
    ) -> HostResult<bool> {
        Ok(false)
    }

    /// Intercept a delete. `Ok(None)` performs the ordinary delete.
    fn delete_property(
        &self,
        _cx: &Context,
        _this: ObjectRef,
        _key: &PropertyKey,
    ) -> HostResult<Option<bool>> {
        Ok(None)
    }

    /// Intercept `has`. `Ok(None)` performs the ordinary check.
    fn has_property(
        &self,
        _cx: &Context,
        _this: ObjectRef,
        _key: &PropertyKey,
    ) -> HostResult<Option<bool>> {
        Ok(None)
    }

    /// Supply the enumerable keys. `Ok(None)` uses the own properties.
    fn enumerate(&self, _cx: &Context, _this: ObjectRef) -> HostResult<Option<Vec<PropertyKey>>> {
        Ok(None)
    }

    /// Whether objects of this class are callable.
    fn is_callable(&self) -> bool {
        false
    }

    /// Whether objects of this class are constructors.
    fn is_constructor(&self) -> bool {
        false
    }

    /// `callee(...args)` with `this`.
    fn call(&self, _cx: &Context, _callee: ObjectRef, _this: &Value, _args: &[Value]) -> HostResult<Value> {
        Err(HostError::type_error(format!("{} is not a function", self.name())))
    }

    /// `new callee(...args)`.
    fn construct(&self, _cx: &Context, _callee: ObjectRef, _args: &[Value]) -> HostResult<Value> {
        Err(HostError::type_error(format!("{} is not a constructor", self.name())))
    }

    /// `value instanceof callee`. `Ok(None)` uses the prototype-chain check.
    fn has_instance(&self, _cx: &Context, _callee: ObjectRef, _value: &Value) -> HostResult<Option<bool>> {
        Ok(None)
    }

    /// The object died. Runs after the sweep, outside any heap borrow.
    fn finalize(&self, _data: Rc<dyn Any>) {}

    /// The collector moved the object from `from` to `to`.
    ///
    /// Runs before the collection returns, so untraced side tables keyed
    /// on object addresses can be updated before anyone reads them again.
    fn moved(&self, _data: &Rc<dyn Any>, _from: ObjectRef, _to: ObjectRef) {}
}
