//! Helpers installed on wrapper types
//!
//! Every wrapper type gets the base helpers (`toString`, `toSource`,
//! `valueOf`, `@@toPrimitive`, `@@iterator`, `__iterator__`, `forEach`).
//! Specialized types add the host collection idioms on top:
//!
//! | shape | helpers | default iteration |
//! |---|---|---|
//! | `Mapping` | `get` `set` `delete` `has` `clear` `size` `keys` `values` `entries` | configured, entries by default |
//! | `Sequence` | `length` `keys` `values` `entries` | values |
//! | `Set` | `add` `delete` `has` `clear` `size` `keys` `values` `entries` | values |
//! | `Iterator` | `next` | the iterator itself |

use std::rc::{Rc, Weak};

use otter_host::{Context, HostError, HostResult, IterKind, ObjectRef, PropertyKey, Value};
use otter_script::{Obj, ScriptError, ScriptResult};

use super::{HostProxy, TypeShape, instance_attributes};
use crate::report::ScriptResultExt;
use crate::state::BridgeState;

/// Accepted argument counts of a helper.
#[derive(Clone, Copy)]
enum Arity {
    Exactly(usize),
    AtMost(usize),
    Between(usize, usize),
}

impl Arity {
    fn check(self, name: &str, given: usize) -> HostResult<()> {
        let (ok, bound, n) = match self {
            Self::Exactly(n) => (given == n, "exactly", n),
            Self::AtMost(n) => (given <= n, "at most", n),
            Self::Between(lo, _) if given < lo => (false, "at least", lo),
            Self::Between(_, hi) => (given <= hi, "at most", hi),
        };
        if ok {
            return Ok(());
        }
        Err(HostError::type_error(format!(
            "{}() takes {} {} argument{} ({} given)",
            name,
            bound,
            n,
            if n == 1 { "" } else { "s" },
            given
        )))
    }
}

/// One helper invocation with both runtimes entered.
struct Call<'a> {
    state: &'a BridgeState,
    proxy: &'a HostProxy,
    target: Obj,
    this: &'a Value,
    args: &'a [Value],
}

impl Call<'_> {
    fn script<T>(&self, result: ScriptResult<T>) -> HostResult<T> {
        result.into_host(self.state)
    }

    /// Argument `i` as a script value. Missing arguments are `None`.
    fn arg(&self, i: usize) -> HostResult<Obj> {
        match self.args.get(i) {
            Some(value) => self.script(self.state.to_script(value)),
            None => Ok(self.state.interp.none()),
        }
    }

    fn host(&self, obj: &Obj) -> HostResult<Value> {
        self.script(self.state.to_host(obj))
    }

    /// Non-legacy host proxy over a script iterator.
    fn iterator(&self, iterator: &Obj) -> HostResult<Value> {
        let proxy = self.script(self.state.host_iterator_proxy(iterator, false))?;
        Ok(Value::Object(proxy))
    }
}

type Helper = dyn Fn(&Call<'_>) -> HostResult<Value>;

/// Wrap `f` as a host native function: arity check, receiver check, then
/// `f` with both runtimes entered.
fn helper(
    state: &Weak<BridgeState>,
    name: &'static str,
    arity: Arity,
    f: impl Fn(&Call<'_>) -> HostResult<Value> + 'static,
) -> impl Fn(&Context, &Value, &[Value]) -> HostResult<Value> + 'static {
    let state = state.clone();
    let f: Rc<Helper> = Rc::new(f);
    move |cx, this, args| {
        let state = state
            .upgrade()
            .ok_or_else(|| HostError::internal("bridge has been finalized"))?;
        arity.check(name, args.len())?;
        let proxy = this
            .as_object()
            .and_then(|o| cx.native_data_as::<HostProxy>(o))
            .ok_or_else(|| HostError::type_error(format!("{} called on incompatible receiver", name)))?;
        let target = proxy
            .target()
            .ok_or_else(|| HostError::internal("script object was released"))?;
        let _entry = state.enter_from_host();
        f(&Call {
            state: &state,
            proxy: &proxy,
            target,
            this,
            args,
        })
    }
}

/// The views behind `keys`, `values`, `entries` and `forEach`.
fn attribute_pairs(state: &BridgeState, target: &Obj) -> ScriptResult<Vec<(Obj, Obj)>> {
    let interp = &*state.interp;
    let names = if interp.is_type(target) {
        super::class_attributes(target)
    } else {
        instance_attributes(interp, target)?
    };
    names
        .into_iter()
        .map(|name| {
            let value = interp.getattr(target, &name)?;
            Ok((interp.str(name), value))
        })
        .collect()
}

fn pairs(state: &BridgeState, target: &Obj, shape: TypeShape) -> ScriptResult<Vec<(Obj, Obj)>> {
    let interp = &*state.interp;
    match shape {
        TypeShape::Mapping => interp
            .iterate(target)?
            .into_iter()
            .map(|key| {
                let value = interp.getitem(target, &key)?;
                Ok((key, value))
            })
            .collect(),
        TypeShape::Sequence | TypeShape::Iterator => Ok(interp
            .iterate(target)?
            .into_iter()
            .enumerate()
            .map(|(i, v)| (interp.int(i as i64), v))
            .collect()),
        TypeShape::Set => Ok(interp
            .iterate(target)?
            .into_iter()
            .map(|v| (v.clone(), v))
            .collect()),
        TypeShape::Base => attribute_pairs(state, target),
    }
}

/// A script iterator over one view of `target`.
fn view(state: &BridgeState, target: &Obj, shape: TypeShape, kind: IterKind) -> ScriptResult<Obj> {
    let interp = &*state.interp;
    match (shape, kind) {
        (TypeShape::Mapping | TypeShape::Set, IterKind::Keys)
        | (TypeShape::Sequence | TypeShape::Set | TypeShape::Iterator, IterKind::Values) => interp.iter(target),
        (TypeShape::Sequence, IterKind::Keys) => {
            let len = interp.len(target)?;
            interp.iter(&interp.list((0..len as i64).map(|i| interp.int(i)).collect()))
        }
        (_, IterKind::Keys) => {
            let keys = pairs(state, target, shape)?.into_iter().map(|(k, _)| k).collect();
            interp.iter(&interp.list(keys))
        }
        (_, IterKind::Values) => {
            let values = pairs(state, target, shape)?.into_iter().map(|(_, v)| v).collect();
            interp.iter(&interp.list(values))
        }
        (_, IterKind::Entries) => {
            let entries = pairs(state, target, shape)?
                .into_iter()
                .map(|(k, v)| interp.list(vec![k, v]))
                .collect();
            interp.iter(&interp.list(entries))
        }
    }
}

impl BridgeState {
    /// Define the helpers for `shape` on the wrapper type `proxy`.
    pub(super) fn install_type_helpers(&self, proxy: ObjectRef, shape: TypeShape) {
        self.install_base_helpers(proxy, shape);
        match shape {
            TypeShape::Base => {}
            TypeShape::Mapping => {
                self.install_mapping_helpers(proxy);
                self.install_view_helpers(proxy, shape);
            }
            TypeShape::Sequence => {
                self.install_sequence_helpers(proxy);
                self.install_view_helpers(proxy, shape);
            }
            TypeShape::Set => {
                self.install_set_helpers(proxy);
                self.install_view_helpers(proxy, shape);
            }
            TypeShape::Iterator => self.install_iterator_helpers(proxy),
        }
    }

    fn install_base_helpers(&self, proxy: ObjectRef, shape: TypeShape) {
        let cx = &*self.cx;
        let state = &self.this;

        cx.define_method(proxy, "toString", "toString", helper(state, "toString", Arity::AtMost(0), |call| {
            let text = call.script(call.state.interp.str_of(&call.target))?;
            Ok(Value::string(&text))
        }));
        cx.define_method(proxy, "toSource", "toSource", helper(state, "toSource", Arity::AtMost(0), |call| {
            let text = call.script(call.state.interp.repr(&call.target))?;
            Ok(Value::string(&text))
        }));
        cx.define_method(proxy, "valueOf", "valueOf", helper(state, "valueOf", Arity::AtMost(0), |call| {
            Ok(call.this.clone())
        }));
        let to_primitive = PropertyKey::Symbol(cx.symbols().to_primitive.clone());
        cx.define_method(
            proxy,
            to_primitive,
            "[Symbol.toPrimitive]",
            helper(state, "[Symbol.toPrimitive]", Arity::AtMost(1), |call| {
                let text = call.script(call.state.interp.str_of(&call.target))?;
                Ok(Value::string(&text))
            }),
        );

        let iterator = PropertyKey::Symbol(cx.symbols().iterator.clone());
        cx.define_method(
            proxy,
            iterator,
            "[Symbol.iterator]",
            helper(state, "[Symbol.iterator]", Arity::AtMost(0), move |call| {
                let interp = &*call.state.interp;
                let it = match shape {
                    TypeShape::Iterator => return Ok(call.this.clone()),
                    TypeShape::Base => interp.iter(&call.target),
                    TypeShape::Mapping => view(call.state, &call.target, shape, call.state.config.mapping_iteration),
                    TypeShape::Sequence | TypeShape::Set => view(call.state, &call.target, shape, IterKind::Values),
                };
                let it = call.script(it)?;
                call.iterator(&it)
            }),
        );

        cx.define_method(
            proxy,
            "__iterator__",
            "__iterator__",
            helper(state, "__iterator__", Arity::AtMost(1), move |call| {
                let keys_only = call.args.first().is_some_and(Value::truthy);
                let kind = if keys_only { IterKind::Keys } else { IterKind::Values };
                let it = call.script(view(call.state, &call.target, shape, kind))?;
                let proxy = call.script(call.state.host_iterator_proxy(&it, true))?;
                Ok(Value::Object(proxy))
            }),
        );

        cx.define_method(
            proxy,
            "forEach",
            "forEach",
            helper(state, "forEach", Arity::Between(1, 2), move |call| {
                let cx = &*call.state.cx;
                let callback = &call.args[0];
                if !cx.is_callable(callback) {
                    return Err(HostError::type_error(format!(
                        "{} is not a function",
                        cx.display(callback)
                    )));
                }
                let this_arg = call.args.get(1).cloned().unwrap_or_default();
                for (key, value) in call.script(pairs(call.state, &call.target, shape))? {
                    let args = [call.host(&value)?, call.host(&key)?, call.this.clone()];
                    cx.call(callback, &this_arg, &args)?;
                }
                Ok(Value::Undefined)
            }),
        );
    }

    fn install_view_helpers(&self, proxy: ObjectRef, shape: TypeShape) {
        let views = [
            ("keys", IterKind::Keys),
            ("values", IterKind::Values),
            ("entries", IterKind::Entries),
        ];
        for (name, kind) in views {
            self.cx.define_method(
                proxy,
                name,
                name,
                helper(&self.this, name, Arity::Exactly(0), move |call| {
                    let it = call.script(view(call.state, &call.target, shape, kind))?;
                    call.iterator(&it)
                }),
            );
        }
    }

    fn install_mapping_helpers(&self, proxy: ObjectRef) {
        let cx = &*self.cx;
        let state = &self.this;

        cx.define_method(proxy, "get", "get", helper(state, "get", Arity::Exactly(1), |call| {
            let interp = &*call.state.interp;
            let key = call.arg(0)?;
            match interp.getitem(&call.target, &key) {
                Ok(value) => call.host(&value),
                Err(err) if interp.error_matches(&err, &interp.types().key_error) => Ok(Value::Undefined),
                Err(err) => Err(call.state.script_error_to_host(err)),
            }
        }));
        cx.define_method(proxy, "set", "set", helper(state, "set", Arity::Exactly(2), |call| {
            let (key, value) = (call.arg(0)?, call.arg(1)?);
            call.script(call.state.interp.setitem(&call.target, &key, value))?;
            Ok(call.this.clone())
        }));
        cx.define_method(proxy, "delete", "delete", helper(state, "delete", Arity::Exactly(1), |call| {
            let interp = &*call.state.interp;
            let key = call.arg(0)?;
            if !call.script(interp.contains(&call.target, &key))? {
                return Ok(Value::Boolean(false));
            }
            call.script(interp.delitem(&call.target, &key))?;
            Ok(Value::Boolean(true))
        }));
        self.install_has_clear_size(proxy);
    }

    fn install_sequence_helpers(&self, proxy: ObjectRef) {
        self.cx.define_getter(proxy, "length", helper(&self.this, "length", Arity::Exactly(0), |call| {
            let len = call.script(call.state.interp.len(&call.target))?;
            Ok(Value::number(len as f64))
        }));
    }

    fn install_set_helpers(&self, proxy: ObjectRef) {
        let cx = &*self.cx;
        let state = &self.this;

        cx.define_method(proxy, "add", "add", helper(state, "add", Arity::Exactly(1), |call| {
            let item = call.arg(0)?;
            call.script(call.state.interp.call_method(&call.target, "add", &[item]))?;
            Ok(call.this.clone())
        }));
        cx.define_method(proxy, "delete", "delete", helper(state, "delete", Arity::Exactly(1), |call| {
            let interp = &*call.state.interp;
            let item = call.arg(0)?;
            if !call.script(interp.contains(&call.target, &item))? {
                return Ok(Value::Boolean(false));
            }
            call.script(interp.call_method(&call.target, "discard", &[item]))?;
            Ok(Value::Boolean(true))
        }));
        self.install_has_clear_size(proxy);
    }

    /// `has`, `clear` and `size`, shared by mapping and set types.
    fn install_has_clear_size(&self, proxy: ObjectRef) {
        let cx = &*self.cx;
        let state = &self.this;

        cx.define_method(proxy, "has", "has", helper(state, "has", Arity::Exactly(1), |call| {
            let item = call.arg(0)?;
            let found = call.script(call.state.interp.contains(&call.target, &item))?;
            Ok(Value::Boolean(found))
        }));
        cx.define_method(proxy, "clear", "clear", helper(state, "clear", Arity::Exactly(0), |call| {
            call.script(call.state.interp.call_method(&call.target, "clear", &[]))?;
            Ok(Value::Undefined)
        }));
        cx.define_getter(proxy, "size", helper(state, "size", Arity::Exactly(0), |call| {
            let len = call.script(call.state.interp.len(&call.target))?;
            Ok(Value::number(len as f64))
        }));
    }

    fn install_iterator_helpers(&self, proxy: ObjectRef) {
        self.cx.define_method(proxy, "next", "next", helper(&self.this, "next", Arity::AtMost(1), |call| {
            let interp = &*call.state.interp;
            if !interp.is_iterator(&call.target) {
                return Err(call.state.script_error_to_host(ScriptError::not_implemented(format!(
                    "'{}' object is not an iterator",
                    interp.type_name(&call.target)
                ))));
            }
            let legacy = call.proxy.is_legacy();
            match call.script(interp.next(&call.target))? {
                Some(value) if legacy => call.host(&value),
                Some(value) => {
                    let value = call.host(&value)?;
                    Ok(Value::Object(call.state.cx.iter_result(value, false)))
                }
                None if legacy => Err(call.state.script_error_to_host(ScriptError::StopIteration)),
                None => Ok(Value::Object(call.state.cx.iter_result(Value::Undefined, true))),
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use otter_host::{Context, FunctionFlags, Value};
    use otter_script::Interp;

    use crate::{Bridge, BridgeConfig};

    fn bridge() -> Bridge {
        Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_mapping_helpers() {
        let bridge = bridge();
        let cx = bridge.context();
        let interp = bridge.interp();
        let dict = interp
            .dict_from(vec![(interp.str("x"), interp.int(1)), (interp.str("y"), interp.int(2))])
            .unwrap();
        let proxy = bridge.to_host(&dict).unwrap();

        let x = cx.call_method(&proxy, "get", &[Value::string("x")]).unwrap();
        assert!(x.strict_equals(&Value::Int32(1)));
        let has = cx.call_method(&proxy, "has", &[Value::string("z")]).unwrap();
        assert!(has.strict_equals(&Value::Boolean(false)));
        let size = cx.get_value(&proxy, "size").unwrap();
        assert!(size.strict_equals(&Value::Int32(2)));

        let returned = cx.call_method(&proxy, "set", &[Value::string("z"), Value::Int32(3)]).unwrap();
        assert!(returned.strict_equals(&proxy));
        let entries = cx.iterate(&proxy).unwrap();
        assert_eq!(entries.len(), 3);

        let err = cx.call_method(&proxy, "get", &[]).unwrap_err();
        assert!(err.to_string().contains("get() takes exactly 1 argument (0 given)"));
    }

    #[test]
    fn test_sequence_views() {
        let bridge = bridge();
        let cx = bridge.context();
        let interp = bridge.interp();
        let list = interp.list(vec![interp.str("a"), interp.str("b")]);
        let proxy = bridge.to_host(&list).unwrap();

        let values = cx.iterate(&proxy).unwrap();
        assert_eq!(values.len(), 2);
        assert!(values[1].strict_equals(&Value::string("b")));

        let keys = cx.call_method(&proxy, "keys", &[]).unwrap();
        let keys = cx.iterate(&keys).unwrap();
        assert!(keys[1].strict_equals(&Value::Int32(1)));

        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = seen.clone();
        let callback = cx.new_function("cb", FunctionFlags::PLAIN, move |_, _, args| {
            sink.borrow_mut().push(args.get(1).cloned().unwrap_or_default());
            Ok(Value::Undefined)
        });
        cx.call_method(&proxy, "forEach", &[Value::Object(callback)]).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert!(seen.borrow()[0].strict_equals(&Value::Int32(0)));
    }

    #[test]
    fn test_set_helpers() {
        let bridge = bridge();
        let cx = bridge.context();
        let interp = bridge.interp();
        let set = interp.set(vec![interp.int(1)]).unwrap();
        let proxy = bridge.to_host(&set).unwrap();

        let returned = cx.call_method(&proxy, "add", &[Value::Int32(2)]).unwrap();
        assert!(returned.strict_equals(&proxy));
        assert!(cx.get_value(&proxy, "size").unwrap().strict_equals(&Value::Int32(2)));
        let deleted = cx.call_method(&proxy, "delete", &[Value::Int32(1)]).unwrap();
        assert!(deleted.strict_equals(&Value::Boolean(true)));
        let deleted = cx.call_method(&proxy, "delete", &[Value::Int32(1)]).unwrap();
        assert!(deleted.strict_equals(&Value::Boolean(false)));
        assert_eq!(interp.len(&set).unwrap(), 1);
    }

    #[test]
    fn test_legacy_iterator_throws_at_end() {
        let bridge = bridge();
        let cx = bridge.context();
        let interp = bridge.interp();
        let list = interp.list(vec![interp.int(7)]);
        let proxy = bridge.to_host(&list).unwrap();

        let legacy = cx.call_method(&proxy, "__iterator__", &[Value::Boolean(false)]).unwrap();
        let first = cx.call_method(&legacy, "next", &[]).unwrap();
        assert!(first.strict_equals(&Value::Int32(7)));
        let err = cx.call_method(&legacy, "next", &[]).unwrap_err();
        assert!(err.to_string().contains("StopIteration"));
    }

    #[test]
    fn test_helpers_check_receiver() {
        let bridge = bridge();
        let cx = bridge.context();
        let interp = bridge.interp();
        let proxy = bridge.to_host(&interp.dict()).unwrap();
        let get = cx.get_value(&proxy, "get").unwrap();
        let err = cx.call(&get, &Value::Object(cx.new_object()), &[Value::Null]).unwrap_err();
        assert!(err.to_string().contains("get called on incompatible receiver"));
    }
}
