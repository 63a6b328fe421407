//! Set proxies: host `Set` objects with script set algebra.
//!
//! Every operation copies the host set first and then edits the copy with
//! `add`/`delete`, so results are fresh host sets wrapped as new proxies.

use otter_host::Value;
use otter_script::{BinaryOp, CompareOp, Interp, Obj, ScriptError, ScriptResult};

use super::{ScriptProxy, ScriptShape, method_receiver};
use crate::report::HostResultExt;
use crate::state::BridgeState;

fn is_set_like(interp: &Interp, other: &Obj) -> bool {
    match other.native_data::<ScriptProxy>() {
        Some(proxy) => proxy.shape == ScriptShape::Set,
        None => interp.type_is_set_subclass(&interp.type_of(other)),
    }
}

fn elements(state: &BridgeState, set: &Value) -> ScriptResult<Vec<Value>> {
    let o = set
        .as_object()
        .ok_or_else(|| ScriptError::type_error("not a host Set"))?;
    let entries = state.cx.collection_entries(o).into_script(state)?;
    Ok(entries.into_iter().map(|(value, _)| value).collect())
}

fn has(state: &BridgeState, set: &Value, item: &Value) -> ScriptResult<bool> {
    let found = state
        .cx
        .call_method(set, "has", std::slice::from_ref(item))
        .into_script(state)?;
    Ok(found.truthy())
}

fn add(state: &BridgeState, set: &Value, item: Value) -> ScriptResult<()> {
    state.cx.call_method(set, "add", &[item]).into_script(state).map(drop)
}

fn remove(state: &BridgeState, set: &Value, item: Value) -> ScriptResult<()> {
    state.cx.call_method(set, "delete", &[item]).into_script(state).map(drop)
}

/// A new host set holding the elements of `source`.
fn copy_set(state: &BridgeState, source: &Value) -> ScriptResult<Value> {
    let copy = Value::Object(state.cx.new_set());
    for item in elements(state, source)? {
        add(state, &copy, item)?;
    }
    Ok(copy)
}

/// A host set for any script iterable. Set proxies are used as they are.
fn as_host_set(state: &BridgeState, iterable: &Obj) -> ScriptResult<Value> {
    if let Some(proxy) = iterable.native_data::<ScriptProxy>() {
        if proxy.shape == ScriptShape::Set {
            return proxy.host_value();
        }
    }
    let set = Value::Object(state.cx.new_set());
    for item in state.interp.iterate(iterable)? {
        add(state, &set, state.to_host(&item)?)?;
    }
    Ok(set)
}

/// `left <op> right` as a new host set.
fn algebra(state: &BridgeState, left: &Value, right: &Value, op: BinaryOp) -> ScriptResult<Value> {
    match op {
        BinaryOp::Or => {
            let out = copy_set(state, left)?;
            for item in elements(state, right)? {
                add(state, &out, item)?;
            }
            Ok(out)
        }
        BinaryOp::And => {
            let out = Value::Object(state.cx.new_set());
            for item in elements(state, left)? {
                if has(state, right, &item)? {
                    add(state, &out, item)?;
                }
            }
            Ok(out)
        }
        BinaryOp::Sub => {
            let out = copy_set(state, left)?;
            for item in elements(state, right)? {
                remove(state, &out, item)?;
            }
            Ok(out)
        }
        BinaryOp::Xor => {
            let out = copy_set(state, left)?;
            for item in elements(state, right)? {
                if has(state, left, &item)? {
                    remove(state, &out, item)?;
                } else {
                    add(state, &out, item)?;
                }
            }
            Ok(out)
        }
        _ => Err(ScriptError::type_error(format!(
            "unsupported set operation '{}'",
            op.symbol()
        ))),
    }
}

/// Whether every element of `sub` is in `sup`.
fn is_subset(state: &BridgeState, sub: &Value, sup: &Value) -> ScriptResult<bool> {
    for item in elements(state, sub)? {
        if !has(state, sup, &item)? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl ScriptProxy {
    pub(super) fn set_binary(
        &self,
        state: &BridgeState,
        _this: &Obj,
        op: BinaryOp,
        other: &Obj,
        reflected: bool,
    ) -> ScriptResult<Obj> {
        let interp = &*state.interp;
        let supported = matches!(op, BinaryOp::Sub | BinaryOp::And | BinaryOp::Xor | BinaryOp::Or);
        if !supported || !is_set_like(interp, other) {
            return Ok(interp.not_implemented());
        }
        let this = self.host_value()?;
        let other = as_host_set(state, other)?;
        let result = if reflected {
            algebra(state, &other, &this, op)?
        } else {
            algebra(state, &this, &other, op)?
        };
        state.to_script(&result)
    }

    pub(super) fn set_compare(&self, state: &BridgeState, other: &Obj, op: CompareOp) -> ScriptResult<Obj> {
        let interp = &*state.interp;
        if !is_set_like(interp, other) {
            return Ok(interp.not_implemented());
        }
        let this = self.host_value()?;
        let other = as_host_set(state, other)?;
        let (ours, theirs) = (elements(state, &this)?.len(), elements(state, &other)?.len());
        let answer = match op {
            CompareOp::Eq => ours == theirs && is_subset(state, &this, &other)?,
            CompareOp::Ne => !(ours == theirs && is_subset(state, &this, &other)?),
            CompareOp::Le => is_subset(state, &this, &other)?,
            CompareOp::Ge => is_subset(state, &other, &this)?,
            CompareOp::Lt => ours < theirs && is_subset(state, &this, &other)?,
            CompareOp::Gt => ours > theirs && is_subset(state, &other, &this)?,
        };
        Ok(interp.bool(answer))
    }

    /// Fold `op` over every iterable in `others`, starting from a copy.
    fn set_fold(&self, state: &BridgeState, others: &[Obj], op: BinaryOp) -> ScriptResult<Obj> {
        let mut result = copy_set(state, &self.host_value()?)?;
        for other in others {
            let other = as_host_set(state, other)?;
            result = algebra(state, &result, &other, op)?;
        }
        state.to_script(&result)
    }
}

fn single_argument<'a>(args: &'a [Obj], name: &str) -> ScriptResult<&'a Obj> {
    match args {
        [_, other] => Ok(other),
        _ => Err(ScriptError::type_error(format!(
            "{}() takes exactly one argument ({} given)",
            name,
            args.len().saturating_sub(1)
        ))),
    }
}

pub(super) fn install_methods(interp: &Interp, class: &Obj) {
    for name in ["copy", "__copy__"] {
        interp.add_method(class, name, move |_, args, _| {
            let (_, proxy) = method_receiver(args, name)?;
            proxy.with_state(|state| state.to_script(&copy_set(state, &proxy.host_value()?)?))
        });
    }

    let folds = [
        ("difference", BinaryOp::Sub),
        ("intersection", BinaryOp::And),
        ("symmetric_difference", BinaryOp::Xor),
        ("union", BinaryOp::Or),
    ];
    for (name, op) in folds {
        interp.add_method(class, name, move |_, args, _| {
            let (_, proxy) = method_receiver(args, name)?;
            proxy.with_state(|state| proxy.set_fold(state, &args[1..], op))
        });
    }

    interp.add_method(class, "isdisjoint", |interp, args, _| {
        let (_, proxy) = method_receiver(args, "isdisjoint")?;
        let other = single_argument(args, "isdisjoint")?;
        proxy.with_state(|state| {
            let this = proxy.host_value()?;
            let other = as_host_set(state, other)?;
            for item in elements(state, &this)? {
                if has(state, &other, &item)? {
                    return Ok(interp.bool(false));
                }
            }
            Ok(interp.bool(true))
        })
    });
    interp.add_method(class, "issubset", |interp, args, _| {
        let (_, proxy) = method_receiver(args, "issubset")?;
        let other = single_argument(args, "issubset")?;
        proxy.with_state(|state| {
            let other = as_host_set(state, other)?;
            Ok(interp.bool(is_subset(state, &proxy.host_value()?, &other)?))
        })
    });
    interp.add_method(class, "issuperset", |interp, args, _| {
        let (_, proxy) = method_receiver(args, "issuperset")?;
        let other = single_argument(args, "issuperset")?;
        proxy.with_state(|state| {
            let other = as_host_set(state, other)?;
            Ok(interp.bool(is_subset(state, &other, &proxy.host_value()?)?))
        })
    });
}

#[cfg(test)]
mod tests {
    use otter_host::Value;
    use otter_script::{BinaryOp, CompareOp, Interp, Obj};

    use crate::{Bridge, BridgeConfig};

    fn host_set(bridge: &Bridge, items: &[i32]) -> Obj {
        let cx = bridge.context();
        let set = Value::Object(cx.new_set());
        for i in items {
            cx.call_method(&set, "add", &[Value::Int32(*i)]).unwrap();
        }
        bridge.to_script(&set).unwrap()
    }

    fn sorted_ints(interp: &Interp, obj: &Obj) -> Vec<i64> {
        let mut out: Vec<i64> = interp
            .iterate(obj)
            .unwrap()
            .iter()
            .filter_map(|o| o.as_int())
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn test_operators_produce_new_host_sets() {
        let bridge = Bridge::initialize(otter_host::Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let interp = bridge.interp();
        let a = host_set(&bridge, &[1, 2, 3]);
        let b = interp.set(vec![interp.int(2), interp.int(3), interp.int(4)]).unwrap();

        let both = interp.binary_op(&a, &b, BinaryOp::And).unwrap();
        assert!(!both.is(&a));
        assert_eq!(interp.type_name(&both), "Set");
        assert_eq!(sorted_ints(interp, &both), [2, 3]);

        assert_eq!(sorted_ints(interp, &interp.binary_op(&a, &b, BinaryOp::Or).unwrap()), [1, 2, 3, 4]);
        assert_eq!(sorted_ints(interp, &interp.binary_op(&a, &b, BinaryOp::Sub).unwrap()), [1]);
        assert_eq!(sorted_ints(interp, &interp.binary_op(&b, &a, BinaryOp::Sub).unwrap()), [4]);
        assert_eq!(sorted_ints(interp, &interp.binary_op(&a, &b, BinaryOp::Xor).unwrap()), [1, 4]);
        assert_eq!(sorted_ints(interp, &a), [1, 2, 3]);

        let list = interp.list(vec![interp.int(1)]);
        let err = interp.binary_op(&a, &list, BinaryOp::Sub).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unsupported operand type(s) for -: 'Set' and 'list'");
    }

    #[test]
    fn test_methods_accept_any_iterable() {
        let bridge = Bridge::initialize(otter_host::Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let interp = bridge.interp();
        let a = host_set(&bridge, &[1, 2, 3]);
        let items = interp.list(vec![interp.int(3), interp.int(5)]);

        let union = interp.call_method(&a, "union", &[items.clone()]).unwrap();
        assert_eq!(sorted_ints(interp, &union), [1, 2, 3, 5]);
        let diff = interp.call_method(&a, "difference", &[items.clone()]).unwrap();
        assert_eq!(sorted_ints(interp, &diff), [1, 2]);

        let copy = interp.call_method(&a, "copy", &[]).unwrap();
        assert!(interp.compare(&copy, &a, CompareOp::Eq).unwrap());
        assert!(!copy.is(&a));

        let disjoint = interp.call_method(&a, "isdisjoint", &[items]).unwrap();
        assert_eq!(disjoint.as_bool(), Some(false));
        let small = interp.list(vec![interp.int(1)]);
        let superset = interp.call_method(&a, "issuperset", &[small]).unwrap();
        assert_eq!(superset.as_bool(), Some(true));
        assert!(interp.call_method(&a, "issubset", &[]).is_err());
    }

    #[test]
    fn test_subset_ordering() {
        let bridge = Bridge::initialize(otter_host::Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let interp = bridge.interp();
        let small = host_set(&bridge, &[1]);
        let big = host_set(&bridge, &[1, 2]);
        assert!(interp.compare(&small, &big, CompareOp::Lt).unwrap());
        assert!(interp.compare(&small, &big, CompareOp::Le).unwrap());
        assert!(!interp.compare(&small, &big, CompareOp::Ge).unwrap());
        assert!(interp.compare(&big, &small, CompareOp::Gt).unwrap());
        assert!(interp.compare(&small, &big, CompareOp::Ne).unwrap());
        assert!(interp.contains(&big, &interp.int(2)).unwrap());
        assert_eq!(interp.len(&big).unwrap(), 2);
    }
}
