//! Iterator proxies over host iterator objects.

use otter_host::Value;
use otter_script::{Obj, ScriptError, ScriptResult};

use super::ScriptProxy;
use crate::report::HostResultExt;
use crate::state::BridgeState;

impl ScriptProxy {
    /// One `next()` step. Once the host reports `done` the proxy stays
    /// exhausted and never calls the host again.
    pub(super) fn iterator_next(&self, state: &BridgeState) -> ScriptResult<Option<Obj>> {
        if self.exhausted.get() {
            return Ok(None);
        }
        let result = state
            .cx
            .call_method(&self.host_value()?, "next", &[])
            .into_script(state)?;
        let Value::Object(record) = result else {
            return Err(ScriptError::type_error(
                "iterator.next() returned a non-object value",
            ));
        };
        let done = match state.cx.get(record, "done").into_script(state)? {
            Value::Boolean(done) => done,
            _ => {
                return Err(ScriptError::type_error(
                    "iterator.next() returned a non-boolean value for result.done",
                ));
            }
        };
        if done {
            self.exhausted.set(true);
            return Ok(None);
        }
        let value = state.cx.get(record, "value").into_script(state)?;
        match value {
            Value::Undefined => Ok(Some(state.interp.none())),
            value => state.to_script(&value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use otter_host::{Context, PropertyKey, Value};
    use otter_script::Interp;

    use crate::{Bridge, BridgeConfig};

    #[test]
    fn test_exhaustion_is_sticky() {
        let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let cx = bridge.context();
        let interp = bridge.interp();
        let array = Value::Object(cx.new_array(vec![Value::Int32(1), Value::Int32(2)]));
        let proxy = bridge.to_script(&array).unwrap();

        let it = interp.iter(&proxy).unwrap();
        assert_eq!(interp.type_name(&it), "Iterator");
        assert_eq!(interp.next(&it).unwrap().and_then(|o| o.as_int()), Some(1));
        assert_eq!(interp.next(&it).unwrap().and_then(|o| o.as_int()), Some(2));
        assert!(interp.next(&it).unwrap().is_none());
        assert!(interp.next(&it).unwrap().is_none());

        let fresh = interp.iterate(&proxy).unwrap();
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn test_done_must_be_boolean() {
        let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let cx = bridge.context();
        let interp = bridge.interp();

        let iterable = cx.new_object();
        let key = PropertyKey::Symbol(cx.symbols().iterator.clone());
        cx.define_method(iterable, key, "[Symbol.iterator]", |cx, _, _| {
            let iterator = cx.new_object();
            cx.define_method(iterator, "next", "next", |cx, _, _| {
                let record = cx.new_object();
                cx.set(record, "done", Value::Int32(0))?;
                Ok(Value::Object(record))
            });
            Ok(Value::Object(iterator))
        });
        let proxy = bridge.to_script(&Value::Object(iterable)).unwrap();
        let err = interp.iterate(&proxy).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: iterator.next() returned a non-boolean value for result.done"
        );

        let plain = bridge.to_script(&Value::Object(cx.new_object())).unwrap();
        let err = interp.iter(&plain).unwrap_err();
        assert!(err.to_string().ends_with("is not iterable"));
    }
}
