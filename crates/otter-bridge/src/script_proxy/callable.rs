//! Callable proxies: host functions invoked from script.

use otter_host::Value;
use otter_script::{Kwargs, Obj, ScriptError, ScriptResult};

use super::ScriptProxy;
use crate::report::HostResultExt;
use crate::state::BridgeState;

impl ScriptProxy {
    /// Call or construct the host function.
    ///
    /// Class constructors are always constructed. Other constructors are
    /// constructed only when the proxy carries no bound receiver, so that
    /// methods read off an object still run as calls.
    pub(super) fn invoke(&self, state: &BridgeState, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
        if !kwargs.is_empty() {
            return Err(ScriptError::type_error(
                "host functions do not take keyword arguments",
            ));
        }
        let callee = self.host_value()?;
        let args = state.host_args(args)?;
        let receiver = self.receiver();
        let construct = state.cx.is_class_constructor(&callee)
            || (receiver.is_none() && state.cx.is_constructor(&callee));
        tracing::debug!(uid = self.uid, construct, argc = args.len(), "script calls host");

        let result = if construct {
            state.cx.construct(&callee, &args)
        } else {
            let this = receiver.unwrap_or(Value::Undefined);
            state.cx.call(&callee, &this, &args)
        }
        .into_script(state)?;

        match result {
            Value::Undefined => Ok(state.interp.none()),
            value => state.to_script(&value),
        }
    }
}

#[cfg(test)]
mod tests {
    use otter_host::{Context, FunctionFlags, HostError, Value};
    use otter_script::Interp;

    use crate::{Bridge, BridgeConfig};

    #[test]
    fn test_call_and_construct() {
        let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let cx = bridge.context();
        let interp = bridge.interp();

        let add = cx.new_function("add", FunctionFlags::PLAIN, |_, _, args| {
            let a = args.first().and_then(Value::as_number).unwrap_or(0.0);
            let b = args.get(1).and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::number(a + b))
        });
        let add = bridge.to_script(&Value::Object(add)).unwrap();
        let sum = interp.call(&add, &[interp.int(2), interp.int(3)], &[]).unwrap();
        assert_eq!(sum.as_int(), Some(5));

        let kwargs = [("x".to_string(), interp.int(1))];
        assert!(interp.call(&add, &[], &kwargs).is_err());

        let nothing = cx.new_function("nothing", FunctionFlags::PLAIN, |_, _, _| Ok(Value::Undefined));
        let nothing = bridge.to_script(&Value::Object(nothing)).unwrap();
        assert!(interp.call(&nothing, &[], &[]).unwrap().is_none());

        let class = cx.new_function("Point", FunctionFlags::CLASS, |cx, _, _| {
            let o = cx.new_object();
            cx.set(o, "kind", Value::string("point"))?;
            Ok(Value::Object(o))
        });
        let class = bridge.to_script(&Value::Object(class)).unwrap();
        let point = interp.call(&class, &[], &[]).unwrap();
        assert_eq!(interp.getattr(&point, "kind").unwrap().as_str(), Some("point"));
    }

    #[test]
    fn test_methods_keep_their_receiver() {
        let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
        let cx = bridge.context();
        let interp = bridge.interp();

        let counter = cx.new_object();
        cx.set(counter, "count", Value::Int32(41)).unwrap();
        cx.define_method(counter, "bump", "bump", |cx, this, _| {
            let Value::Object(o) = this else {
                return Err(HostError::type_error("bad receiver"));
            };
            let next = cx.get(*o, "count")?.as_number().unwrap_or(0.0) + 1.0;
            cx.set(*o, "count", Value::number(next))?;
            Ok(Value::number(next))
        });
        let proxy = bridge.to_script(&Value::Object(counter)).unwrap();
        let bump = interp.getattr(&proxy, "bump").unwrap();
        assert_eq!(interp.call(&bump, &[], &[]).unwrap().as_int(), Some(42));
        assert_eq!(interp.getattr(&proxy, "count").unwrap().as_int(), Some(42));
    }
}
