//! Native extension objects
//!
//! A native object is an instance of a native class whose protocol slots
//! are supplied by Rust code. Every hook defaults to `None`, meaning "slot
//! not provided": the interpreter then falls back to its generic behavior
//! (class dict lookup for attributes, identity for hashing and equality,
//! `TypeError` for the rest).

use std::any::Any;

use crate::error::ScriptResult;
use crate::interp::Interp;
use crate::object::{Kwargs, Obj};
use crate::ops::{BinaryOp, CompareOp};

/// Protocol slots a native class advertises on its type object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeFeatures {
    /// Instances are iterators (`__next__`)
    pub iternext: bool,
    /// Instances support mapping subscription
    pub mapping: bool,
    /// Instances support sequence item access
    pub sequence: bool,
}

/// Protocol hooks of a native extension object.
///
/// `this` is the object the hook was invoked on; it owns `self`.
#[allow(unused_variables)]
pub trait NativeObject: Any {
    /// Downcast support.
    fn as_any(&self) -> &dyn Any;

    /// `this.name`. An `AttributeError` continues with the class dict.
    fn getattr(&self, interp: &Interp, this: &Obj, name: &str) -> Option<ScriptResult<Obj>> {
        None
    }

    /// `this.name = value`, or `del this.name` when `value` is `None`.
    fn setattr(
        &self,
        interp: &Interp,
        this: &Obj,
        name: &str,
        value: Option<&Obj>,
    ) -> Option<ScriptResult<()>> {
        None
    }

    /// Instance attribute names for `dir()`.
    fn dir(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<Vec<String>>> {
        None
    }

    /// `repr(this)`
    fn repr(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<String>> {
        None
    }

    /// `str(this)`; falls back to `repr`.
    fn str(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<String>> {
        None
    }

    /// `hash(this)`; falls back to identity.
    fn hash(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<i64>> {
        None
    }

    /// Rich comparison. May answer `NotImplemented`.
    fn richcompare(
        &self,
        interp: &Interp,
        this: &Obj,
        other: &Obj,
        op: CompareOp,
    ) -> Option<ScriptResult<Obj>> {
        None
    }

    /// `len(this)`
    fn len(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<usize>> {
        None
    }

    /// `this[key]`
    fn getitem(&self, interp: &Interp, this: &Obj, key: &Obj) -> Option<ScriptResult<Obj>> {
        None
    }

    /// `this[key] = value`, or `del this[key]` when `value` is `None`.
    fn setitem(
        &self,
        interp: &Interp,
        this: &Obj,
        key: &Obj,
        value: Option<&Obj>,
    ) -> Option<ScriptResult<()>> {
        None
    }

    /// `item in this`; falls back to iteration.
    fn contains(&self, interp: &Interp, this: &Obj, item: &Obj) -> Option<ScriptResult<bool>> {
        None
    }

    /// `iter(this)`
    fn iter(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<Obj>> {
        None
    }

    /// `next(this)`: `Ok(None)` when exhausted. Only consulted on classes
    /// whose features include `iternext`.
    fn next(&self, interp: &Interp, this: &Obj) -> Option<ScriptResult<Option<Obj>>> {
        None
    }

    /// Whether instances are callable.
    fn is_callable(&self) -> bool {
        false
    }

    /// `this(*args, **kwargs)`
    fn call(
        &self,
        interp: &Interp,
        this: &Obj,
        args: &[Obj],
        kwargs: &Kwargs,
    ) -> Option<ScriptResult<Obj>> {
        None
    }

    /// Binary operator with `this` on the left, or on the right when
    /// `reflected`. May answer `NotImplemented`.
    fn binary_op(
        &self,
        interp: &Interp,
        this: &Obj,
        op: BinaryOp,
        other: &Obj,
        reflected: bool,
    ) -> Option<ScriptResult<Obj>> {
        None
    }

    /// In-place operator. Falls back to [`NativeObject::binary_op`].
    fn inplace_op(
        &self,
        interp: &Interp,
        this: &Obj,
        op: BinaryOp,
        other: &Obj,
    ) -> Option<ScriptResult<Obj>> {
        None
    }
}
