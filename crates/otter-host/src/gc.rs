//! Rooting support for values held outside the heap

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use otter_bridge_gc::CellId;

use crate::value::{ObjectRef, Value};

/// A value kept alive across collections.
///
/// The slot is traced as a root and rewritten when its object moves.
/// Dropping the last clone releases the root.
#[derive(Clone)]
pub struct Persistent {
    slot: Rc<RefCell<Value>>,
}

impl Persistent {
    /// Current value.
    pub fn get(&self) -> Value {
        self.slot.borrow().clone()
    }

    /// Current object address, if the value is an object.
    pub fn object(&self) -> Option<ObjectRef> {
        self.slot.borrow().as_object()
    }

    /// Replace the rooted value.
    pub fn set(&self, value: Value) {
        *self.slot.borrow_mut() = value;
    }
}

impl std::fmt::Debug for Persistent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Persistent({:?})", self.slot.borrow())
    }
}

/// Weak list of persistent slots.
#[derive(Default)]
pub(crate) struct RootSet {
    slots: RefCell<Vec<Weak<RefCell<Value>>>>,
}

impl RootSet {
    pub(crate) fn add(&self, value: Value) -> Persistent {
        let slot = Rc::new(RefCell::new(value));
        self.slots.borrow_mut().push(Rc::downgrade(&slot));
        Persistent { slot }
    }

    /// Live root cells; dropped slots are pruned on the way.
    pub(crate) fn cells(&self) -> Vec<CellId> {
        let mut slots = self.slots.borrow_mut();
        slots.retain(|w| w.strong_count() > 0);
        slots
            .iter()
            .filter_map(Weak::upgrade)
            .filter_map(|slot| slot.borrow().as_object())
            .map(ObjectRef::cell)
            .collect()
    }

    pub(crate) fn relocate(&self, forward: &dyn Fn(CellId) -> CellId) {
        for slot in self.slots.borrow().iter().filter_map(Weak::upgrade) {
            slot.borrow_mut().relocate(forward);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

/// Summary of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Objects freed
    pub freed: usize,
    /// Objects relocated
    pub moved: usize,
    /// Native finalizers run
    pub finalized: usize,
}
