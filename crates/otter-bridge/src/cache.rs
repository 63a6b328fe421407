//! Identity caches
//!
//! One table per direction maps a foreign object's identity to the proxy
//! already created for it. Neither table owns what it indexes:
//!
//! - [`ScriptProxyCache`] keys on a host object's unique id and holds weak
//!   script handles; a dead entry is the same as a missing one.
//! - [`HostProxyCache`] keys on a script object's address and holds the
//!   proxy's current heap location. Locations are untraced, so the proxy
//!   class updates them from its relocation hook and removes them from its
//!   finalizer.
//!
//! The caches do no locking of their own. Callers hold the owning side's
//! lock.

use std::cell::RefCell;

use otter_host::{ObjectRef, Persistent};
use otter_script::{Obj, WeakObj};
use rustc_hash::FxHashMap;

/// Host object uid → script proxy.
#[derive(Default)]
pub(crate) struct ScriptProxyCache {
    entries: RefCell<FxHashMap<u64, WeakObj>>,
}

impl ScriptProxyCache {
    pub(crate) fn get(&self, uid: u64) -> Option<Obj> {
        let mut entries = self.entries.borrow_mut();
        let found = entries.get(&uid)?.upgrade();
        if found.is_none() {
            entries.remove(&uid);
        }
        found
    }

    pub(crate) fn put(&self, uid: u64, proxy: &Obj) {
        self.entries.borrow_mut().insert(uid, proxy.downgrade());
    }

    /// Drop the entry for `uid` unless a live proxy replaced it.
    ///
    /// Runs from proxy destructors, which may fire while the table is
    /// borrowed; the entry then stays behind as a dead weak handle and is
    /// pruned by the next lookup.
    pub(crate) fn forget(&self, uid: u64) {
        let Ok(mut entries) = self.entries.try_borrow_mut() else {
            return;
        };
        if entries.get(&uid).is_some_and(|w| w.upgrade().is_none()) {
            entries.remove(&uid);
        }
    }

    /// Live entries.
    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().values().filter(|w| w.upgrade().is_some()).count()
    }

    /// Empty the table, returning the proxies that were still alive.
    pub(crate) fn drain(&self) -> Vec<Obj> {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        entries.into_values().filter_map(|w| w.upgrade()).collect()
    }
}

/// Script object address → host proxy location.
#[derive(Default)]
pub(crate) struct HostProxyCache {
    entries: RefCell<FxHashMap<usize, ObjectRef>>,
}

impl HostProxyCache {
    pub(crate) fn get(&self, id: usize) -> Option<ObjectRef> {
        self.entries.borrow().get(&id).copied()
    }

    pub(crate) fn put(&self, id: usize, proxy: ObjectRef) {
        self.entries.borrow_mut().insert(id, proxy);
    }

    pub(crate) fn remove(&self, id: usize) -> Option<ObjectRef> {
        self.entries.borrow_mut().remove(&id)
    }

    /// Repoint the entry for `id` after the proxy moved from `from` to `to`.
    /// An entry that no longer names `from` belongs to a newer proxy and is
    /// left alone.
    pub(crate) fn update_location(&self, id: usize, from: ObjectRef, to: ObjectRef) -> bool {
        match self.entries.borrow_mut().get_mut(&id) {
            Some(slot) if *slot == from => {
                *slot = to;
                true
            }
            _ => false,
        }
    }

    /// Remove `id` only while it still names `proxy`.
    pub(crate) fn remove_if(&self, id: usize, proxy: ObjectRef) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.get(&id) == Some(&proxy) {
            entries.remove(&id);
            return true;
        }
        false
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn drain(&self) -> Vec<(usize, ObjectRef)> {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        entries.into_iter().collect()
    }
}

/// Script class address → rooted host wrapper type.
///
/// The root entry is the wrapper type of `type` itself, the prototype every
/// other wrapper type chains to.
#[derive(Default)]
pub(crate) struct WrapperTypeRegistry {
    root: RefCell<Option<Persistent>>,
    types: RefCell<FxHashMap<usize, (Obj, Persistent)>>,
}

impl WrapperTypeRegistry {
    pub(crate) fn get(&self, class_id: usize) -> Option<ObjectRef> {
        self.types.borrow().get(&class_id).and_then(|(_, p)| p.object())
    }

    pub(crate) fn register(&self, class: &Obj, proxy: Persistent) {
        self.types.borrow_mut().insert(class.id(), (class.clone(), proxy));
    }

    pub(crate) fn set_root(&self, root: Option<Persistent>) {
        *self.root.borrow_mut() = root;
    }

    pub(crate) fn root(&self) -> Option<ObjectRef> {
        self.root.borrow().as_ref().and_then(Persistent::object)
    }

    pub(crate) fn len(&self) -> usize {
        self.types.borrow().len()
    }

    /// Empty the registry. Dropping the returned roots lets the collector
    /// finalize the wrapper types.
    pub(crate) fn drain(&self) -> Vec<(Obj, Persistent)> {
        self.root.borrow_mut().take();
        let types = std::mem::take(&mut *self.types.borrow_mut());
        types.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_host::{Context, Value};
    use otter_script::Interp;

    #[test]
    fn test_script_cache_prunes_dead_entries() {
        let interp = Interp::new();
        let cache = ScriptProxyCache::default();
        let proxy = interp.list(vec![]);
        cache.put(7, &proxy);
        assert!(cache.get(7).is_some_and(|p| p.is(&proxy)));
        assert_eq!(cache.len(), 1);

        drop(proxy);
        assert_eq!(cache.len(), 0);
        assert!(cache.get(7).is_none());
        assert!(cache.drain().is_empty());
    }

    #[test]
    fn test_script_cache_forget_keeps_live_replacement() {
        let interp = Interp::new();
        let cache = ScriptProxyCache::default();
        let proxy = interp.list(vec![]);
        cache.put(1, &proxy);
        cache.forget(1);
        assert!(cache.get(1).is_some());
    }

    #[test]
    fn test_host_cache_update_location() {
        let cx = Context::new();
        let a = cx.new_object();
        let b = cx.new_object();
        let cache = HostProxyCache::default();
        cache.put(42, a);

        assert!(!cache.update_location(42, b, a));
        assert!(cache.update_location(42, a, b));
        assert_eq!(cache.get(42), Some(b));

        assert!(!cache.remove_if(42, a));
        assert!(cache.remove_if(42, b));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_registry_roots_entries() {
        let cx = Context::new();
        let interp = Interp::new();
        let registry = WrapperTypeRegistry::default();
        let class = interp.types().dict.clone();
        let proxy = cx.new_object();
        registry.register(&class, cx.root(Value::Object(proxy)));
        registry.set_root(Some(cx.root(Value::Object(proxy))));

        assert_eq!(registry.get(class.id()), Some(proxy));
        assert_eq!(registry.root(), Some(proxy));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.drain().len(), 1);
        assert!(registry.root().is_none());
        assert_eq!(registry.len(), 0);
    }
}
