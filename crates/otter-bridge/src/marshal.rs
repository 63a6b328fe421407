//! Value marshalling
//!
//! Primitives are copied across; everything else crosses as a proxy.
//! Unwrapping comes first: a proxy handed back to the side that owns its
//! target turns into the target again.

use otter_host::{JsString, PropertyKey, Value};
use otter_script::number::long_to_f64;
use otter_script::{Obj, Payload, ScriptError, ScriptResult};
use smallvec::SmallVec;

use crate::host_proxy::HostProxy;
use crate::report::HostResultExt;
use crate::script_proxy::ScriptProxy;
use crate::state::BridgeState;

/// Marshalled call arguments.
pub(crate) type HostArgs = SmallVec<[Value; 4]>;
pub(crate) type ScriptArgs = SmallVec<[Obj; 4]>;

impl BridgeState {
    /// Script value to host value.
    pub(crate) fn to_host(&self, obj: &Obj) -> ScriptResult<Value> {
        match obj.payload() {
            Payload::None => Ok(Value::Null),
            Payload::Bool(b) => Ok(Value::Boolean(*b)),
            Payload::Int(i) => Ok(match i32::try_from(*i) {
                Ok(small) => Value::Int32(small),
                Err(_) => Value::Number(*i as f64),
            }),
            Payload::Long(big) => Ok(Value::Number(long_to_f64(big)?)),
            Payload::Float(f) => Ok(Value::Number(*f)),
            Payload::Str(s) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                self.check_string_length(units.len())?;
                Ok(Value::String(JsString::from_utf16(units)))
            }
            Payload::Bytes(bytes) => {
                // One code unit per byte
                self.check_string_length(bytes.len())?;
                Ok(Value::String(JsString::from_latin1(bytes)))
            }
            _ => {
                if let Some(proxy) = obj.native_data::<ScriptProxy>() {
                    return proxy.host_value();
                }
                Ok(Value::Object(self.host_proxy_for(obj)?))
            }
        }
    }

    fn check_string_length(&self, len: usize) -> ScriptResult<()> {
        if len > self.cx.config().max_string_length {
            return Err(ScriptError::overflow_error("string is too long"));
        }
        Ok(())
    }

    /// Host value to script value.
    pub(crate) fn to_script(&self, value: &Value) -> ScriptResult<Obj> {
        let interp = &*self.interp;
        match value {
            Value::Undefined => Err(ScriptError::type_error("undefined cannot be wrapped")),
            Value::Null => Ok(interp.none()),
            Value::Boolean(b) => Ok(interp.bool(*b)),
            Value::Int32(i) => Ok(interp.int(i64::from(*i))),
            Value::Number(n) => Ok(interp.float(*n)),
            Value::String(s) => s
                .to_utf8()
                .map(|text| interp.str(text))
                .map_err(|_| ScriptError::value_error("string contains an unpaired surrogate")),
            Value::Symbol(symbol) => match symbol.description() {
                Some(description) => Ok(interp.str(description.to_string_lossy())),
                None => Err(self.js_error("Symbol without description")),
            },
            Value::Object(o) => {
                if !self.cx.is_alive(*o) {
                    return Err(self.xpcom_error("host object is no longer alive"));
                }
                if let Some(proxy) = self.cx.native_data_as::<HostProxy>(*o) {
                    return proxy
                        .target()
                        .ok_or_else(|| self.xpcom_error("host proxy was released"));
                }
                self.script_proxy_for(*o)
            }
        }
    }

    /// A host property key as a script attribute name.
    pub(crate) fn key_name(&self, key: &PropertyKey) -> ScriptResult<String> {
        match key {
            PropertyKey::String(s) => Ok(s.to_string_lossy()),
            PropertyKey::Index(i) => Ok(i.to_string()),
            PropertyKey::Symbol(symbol) => match symbol.description() {
                Some(description) if !description.is_empty() => Ok(description.to_string_lossy()),
                _ => Err(self.js_error("Symbol without description")),
            },
        }
    }

    pub(crate) fn host_args(&self, args: &[Obj]) -> ScriptResult<HostArgs> {
        args.iter().map(|a| self.to_host(a)).collect()
    }

    pub(crate) fn script_args(&self, args: &[Value]) -> ScriptResult<ScriptArgs> {
        args.iter().map(|a| self.to_script(a)).collect()
    }

    /// Script list of host values.
    pub(crate) fn script_list(&self, values: &[Value]) -> ScriptResult<Obj> {
        Ok(self.interp.list(self.script_args(values)?.into_vec()))
    }

    /// Host array of script values.
    pub(crate) fn host_array(&self, items: &[Obj]) -> ScriptResult<Value> {
        let values = self.host_args(items)?.into_vec();
        Ok(Value::Object(self.cx.new_array(values)))
    }

    /// Drain a host iterable into script values.
    pub(crate) fn iterate_host(&self, iterable: &Value) -> ScriptResult<Vec<Obj>> {
        let values = self.cx.iterate(iterable).into_script(self)?;
        values.iter().map(|v| self.to_script(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use otter_host::Context;
    use otter_script::Interp;

    use crate::{Bridge, BridgeConfig};

    use super::*;

    fn bridge() -> Bridge {
        Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_primitives_to_host() {
        let bridge = bridge();
        let interp = bridge.interp();
        assert!(matches!(bridge.to_host(&interp.none()).unwrap(), Value::Null));
        assert!(matches!(bridge.to_host(&interp.bool(true)).unwrap(), Value::Boolean(true)));
        assert!(matches!(bridge.to_host(&interp.int(-7)).unwrap(), Value::Int32(-7)));
        assert!(matches!(bridge.to_host(&interp.float(1.5)).unwrap(), Value::Number(n) if n == 1.5));
        let s = bridge.to_host(&interp.str("héllo")).unwrap();
        assert!(matches!(s, Value::String(ref js) if *js == "héllo"));
    }

    #[test]
    fn test_large_int_falls_back_to_double() {
        let bridge = bridge();
        let big = 1i64 << 40;
        let v = bridge.to_host(&bridge.interp().int(big)).unwrap();
        assert!(matches!(v, Value::Number(n) if n == big as f64));
    }

    #[test]
    fn test_bytes_widen_to_code_units() {
        let bridge = bridge();
        let v = bridge.to_host(&bridge.interp().bytes(b"ok".to_vec())).unwrap();
        assert!(matches!(v, Value::String(ref js) if *js == "ok"));

        // Odd lengths and high bytes are copied unit for unit
        let v = bridge.to_host(&bridge.interp().bytes(vec![0x61, 0xe9, 0x62])).unwrap();
        let Value::String(js) = v else {
            panic!("expected a string");
        };
        assert_eq!(js.as_utf16(), &[0x61, 0xe9, 0x62]);
    }

    #[test]
    fn test_primitives_to_script() {
        let bridge = bridge();
        assert!(bridge.to_script(&Value::Null).unwrap().is_none());
        assert_eq!(bridge.to_script(&Value::Int32(3)).unwrap().as_int(), Some(3));
        assert_eq!(bridge.to_script(&Value::Number(2.5)).unwrap().as_float(), Some(2.5));
        assert_eq!(bridge.to_script(&Value::string("x")).unwrap().as_str(), Some("x"));
        assert_eq!(bridge.to_script(&Value::Boolean(false)).unwrap().as_bool(), Some(false));

        let err = bridge.to_script(&Value::Undefined).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: undefined cannot be wrapped");
    }

    #[test]
    fn test_symbols_need_a_description() {
        let bridge = bridge();
        let cx = bridge.context();
        let named = Value::Symbol(cx.new_symbol(Some("tag")));
        assert_eq!(bridge.to_script(&named).unwrap().as_str(), Some("tag"));

        let anonymous = Value::Symbol(cx.new_symbol(None));
        let err = bridge.to_script(&anonymous).unwrap_err();
        assert!(err.to_string().contains("Symbol without description"));
    }

    #[test]
    fn test_primitive_round_trip() {
        let bridge = bridge();
        let interp = bridge.interp();
        for obj in [interp.int(42), interp.float(0.25), interp.str("text"), interp.bool(true)] {
            let back = bridge.to_script(&bridge.to_host(&obj).unwrap()).unwrap();
            assert!(interp.eq(&obj, &back).unwrap());
        }
        for value in [Value::Int32(-1), Value::Number(1.25), Value::string("abc"), Value::Boolean(true)] {
            let back = bridge.to_host(&bridge.to_script(&value).unwrap()).unwrap();
            assert!(back.strict_equals(&value));
        }
    }

    #[test]
    fn test_proxies_unwrap() {
        let bridge = bridge();
        let cx = bridge.context();
        let array = Value::Object(cx.new_array(vec![Value::Int32(1)]));
        let proxy = bridge.to_script(&array).unwrap();
        assert!(bridge.to_host(&proxy).unwrap().strict_equals(&array));

        let list = bridge.interp().list(vec![]);
        let host = bridge.to_host(&list).unwrap();
        assert!(bridge.to_script(&host).unwrap().is(&list));
    }
}
