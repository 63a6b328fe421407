//! Map proxies: host `Map` objects used as script mappings.

use otter_host::Value;
use otter_script::{CompareOp, Interp, Obj, ScriptError, ScriptResult};

use super::{ScriptProxy, ScriptShape, method_receiver};
use crate::report::HostResultExt;
use crate::state::BridgeState;

impl ScriptProxy {
    pub(super) fn map_getitem(&self, state: &BridgeState, key: &Obj) -> ScriptResult<Obj> {
        let target = self.host_value()?;
        let host_key = state.to_host(key)?;
        let cx = &*state.cx;
        if !cx.call_method(&target, "has", &[host_key.clone()]).into_script(state)?.truthy() {
            return Err(state.interp.key_error(key));
        }
        let value = cx.call_method(&target, "get", &[host_key]).into_script(state)?;
        state.to_script(&value)
    }

    pub(super) fn map_setitem(&self, state: &BridgeState, key: &Obj, value: &Obj) -> ScriptResult<()> {
        let args = [state.to_host(key)?, state.to_host(value)?];
        state
            .cx
            .call_method(&self.host_value()?, "set", &args)
            .into_script(state)
            .map(drop)
    }

    pub(super) fn map_delitem(&self, state: &BridgeState, key: &Obj) -> ScriptResult<()> {
        let target = self.host_value()?;
        let host_key = state.to_host(key)?;
        let removed = state
            .cx
            .call_method(&target, "delete", &[host_key])
            .into_script(state)?;
        if !removed.truthy() {
            return Err(state.interp.key_error(key));
        }
        Ok(())
    }

    /// `(key, value)` pairs of the host map.
    fn map_entries(&self, state: &BridgeState) -> ScriptResult<Vec<(Obj, Obj)>> {
        let entries = state
            .cx
            .collection_entries(self.object()?)
            .into_script(state)?;
        entries
            .iter()
            .map(|(k, v)| Ok((state.to_script(k)?, state.to_script(v)?)))
            .collect()
    }

    /// Structural equality with another mapping.
    fn map_equals(&self, state: &BridgeState, other: &Obj) -> ScriptResult<bool> {
        let interp = &*state.interp;
        let entries = self.map_entries(state)?;
        if entries.len() != interp.len(other)? {
            return Ok(false);
        }
        for (key, value) in &entries {
            if !interp.contains(other, key)? {
                return Ok(false);
            }
            let theirs = interp.getitem(other, key)?;
            if !interp.eq(value, &theirs)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(super) fn map_compare(&self, state: &BridgeState, other: &Obj, op: CompareOp) -> ScriptResult<Obj> {
        let interp = &*state.interp;
        if !is_mapping_like(interp, other) {
            return Ok(interp.not_implemented());
        }
        let equal = self.map_equals(state, other)?;
        match op {
            CompareOp::Eq => Ok(interp.bool(equal)),
            CompareOp::Ne => Ok(interp.bool(!equal)),
            CompareOp::Le | CompareOp::Ge if equal => Ok(interp.bool(true)),
            _ => Err(ScriptError::type_error(format!(
                "unorderable types: Map() {} {}()",
                op.symbol(),
                interp.type_name(other)
            ))),
        }
    }
}

fn is_mapping_like(interp: &Interp, other: &Obj) -> bool {
    if let Some(proxy) = other.native_data::<ScriptProxy>() {
        return proxy.shape == ScriptShape::Map;
    }
    interp.type_is_dict_subclass(&interp.type_of(other))
        || (interp.is_mapping(other) && !interp.is_sequence(other))
}

/// `keys()`, `values()` and `items()` on the map proxy class.
pub(super) fn install_methods(interp: &Interp, class: &Obj) {
    interp.add_method(class, "keys", |interp, args, _| {
        let (_, proxy) = method_receiver(args, "keys")?;
        proxy.with_state(|state| {
            let keys = proxy.map_entries(state)?.into_iter().map(|(k, _)| k).collect();
            Ok(interp.list(keys))
        })
    });
    interp.add_method(class, "values", |interp, args, _| {
        let (_, proxy) = method_receiver(args, "values")?;
        proxy.with_state(|state| {
            let values = proxy.map_entries(state)?.into_iter().map(|(_, v)| v).collect();
            Ok(interp.list(values))
        })
    });
    interp.add_method(class, "items", |interp, args, _| {
        let (_, proxy) = method_receiver(args, "items")?;
        proxy.with_state(|state| {
            let items = proxy
                .map_entries(state)?
                .into_iter()
                .map(|(k, v)| interp.tuple(vec![k, v]))
                .collect();
            Ok(interp.list(items))
        })
    });
    interp.add_method(class, "get", |interp, args, _| {
        let (_, proxy) = method_receiver(args, "get")?;
        let Some(key) = args.get(1) else {
            return Err(ScriptError::type_error("get() takes at least 1 argument (0 given)"));
        };
        let default = args.get(2).cloned().unwrap_or_else(|| interp.none());
        proxy.with_state(|state| {
            let target = proxy.host_value()?;
            let host_key = state.to_host(key)?;
            if !state.cx.call_method(&target, "has", &[host_key.clone()]).into_script(state)?.truthy() {
                return Ok(default);
            }
            let value = state.cx.call_method(&target, "get", &[host_key]).into_script(state)?;
            match value {
                Value::Undefined => Ok(interp.none()),
                other => state.to_script(&other),
            }
        })
    });
}

#[cfg(test)]
mod tests {
    use otter_host::{Context, Value};
    use otter_script::{CompareOp, Interp};

    use crate::{Bridge, BridgeConfig};

    fn host_map(bridge: &Bridge, pairs: &[(&str, i32)]) -> otter_script::Obj {
        let cx = bridge.context();
        let map = Value::Object(cx.new_map());
        for (k, v) in pairs {
            cx.call_method(&map, "set", &[Value::string(k), Value::Int32(*v)]).unwrap();
        }
        bridge.to_script(&map).unwrap()
    }

    #[test]
    fn test_items_and_keys() {
        let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let interp = bridge.interp();
        let map = host_map(&bridge, &[("a", 1), ("b", 2)]);

        assert_eq!(interp.len(&map).unwrap(), 2);
        assert_eq!(interp.getitem(&map, &interp.str("b")).unwrap().as_int(), Some(2));
        let err = interp.getitem(&map, &interp.str("zz")).unwrap_err();
        assert!(err.to_string().starts_with("KeyError"));

        interp.setitem(&map, &interp.str("c"), interp.int(3)).unwrap();
        assert!(interp.contains(&map, &interp.str("c")).unwrap());
        interp.delitem(&map, &interp.str("a")).unwrap();
        assert!(interp.delitem(&map, &interp.str("a")).is_err());

        let keys = interp.iterate(&map).unwrap();
        let keys: Vec<_> = keys.iter().filter_map(|k| k.as_str().map(str::to_string)).collect();
        assert_eq!(keys, ["b", "c"]);

        let items = interp.call_method(&map, "items", &[]).unwrap();
        assert_eq!(interp.len(&items).unwrap(), 2);
        let missing = interp.call_method(&map, "get", &[interp.str("q")]).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_structural_equality() {
        let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let interp = bridge.interp();
        let a = host_map(&bridge, &[("x", 1), ("y", 2)]);
        let b = host_map(&bridge, &[("y", 2), ("x", 1)]);
        let c = host_map(&bridge, &[("x", 1)]);
        assert!(!a.is(&b));
        assert!(interp.compare(&a, &b, CompareOp::Eq).unwrap());
        assert!(interp.compare(&a, &c, CompareOp::Ne).unwrap());
        assert!(interp.compare(&a, &b, CompareOp::Le).unwrap());
        assert!(interp.compare(&a, &c, CompareOp::Ge).is_err());
        assert!(interp.compare(&a, &b, CompareOp::Lt).is_err());

        let dict = interp
            .dict_from(vec![(interp.str("x"), interp.int(1)), (interp.str("y"), interp.int(2))])
            .unwrap();
        assert!(interp.compare(&a, &dict, CompareOp::Eq).unwrap());
    }
}
