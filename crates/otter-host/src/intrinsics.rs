//! Builtin prototypes and constructors

use otter_bridge_gc::GcHeap;

use crate::context::{Context, arg, collect_args, number_to_string};
use crate::error::{HostError, HostResult};
use crate::object::{FunctionFlags, HostObject, IterKind, ObjectKind, PropertyAttributes, PropertyKey};
use crate::value::{ObjectRef, Value};

/// Error classes with their own prototype
const ERROR_CLASSES: [&str; 4] = ["TypeError", "RangeError", "ReferenceError", "InternalError"];

/// Builtin objects shared by every realm
pub(crate) struct Intrinsics {
    pub(crate) object_prototype: ObjectRef,
    pub(crate) function_prototype: ObjectRef,
    pub(crate) array_prototype: ObjectRef,
    pub(crate) map_prototype: ObjectRef,
    pub(crate) set_prototype: ObjectRef,
    pub(crate) iterator_prototype: ObjectRef,
    pub(crate) error_prototype: ObjectRef,
    pub(crate) error_subclasses: Vec<(&'static str, ObjectRef)>,
    pub(crate) constructors: Vec<(&'static str, ObjectRef)>,
}

impl Intrinsics {
    /// Allocate the bare prototypes; methods come later in [`install`].
    pub(crate) fn allocate(heap: &mut GcHeap<HostObject>) -> Self {
        let mut alloc = |proto: Option<ObjectRef>| {
            let mut object = HostObject::new(proto, ObjectKind::Ordinary);
            object.uid = heap.len() as u64 + 1;
            ObjectRef::from_cell(heap.alloc(object))
        };
        let object_prototype = alloc(None);
        let function_prototype = alloc(Some(object_prototype));
        let array_prototype = alloc(Some(object_prototype));
        let map_prototype = alloc(Some(object_prototype));
        let set_prototype = alloc(Some(object_prototype));
        let iterator_prototype = alloc(Some(object_prototype));
        let error_prototype = alloc(Some(object_prototype));
        let error_subclasses = ERROR_CLASSES
            .iter()
            .map(|name| (*name, alloc(Some(error_prototype))))
            .collect();
        Self {
            object_prototype,
            function_prototype,
            array_prototype,
            map_prototype,
            set_prototype,
            iterator_prototype,
            error_prototype,
            error_subclasses,
            constructors: Vec::new(),
        }
    }

    pub(crate) fn error_prototype_for(&self, name: &str) -> Option<ObjectRef> {
        if name == "Error" {
            return Some(self.error_prototype);
        }
        self.error_subclasses
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| *p)
    }

    pub(crate) fn for_each(&self, mut f: impl FnMut(ObjectRef)) {
        for o in [
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.map_prototype,
            self.set_prototype,
            self.iterator_prototype,
            self.error_prototype,
        ] {
            f(o);
        }
        for (_, o) in self.error_subclasses.iter().chain(self.constructors.iter()) {
            f(*o);
        }
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut ObjectRef)) {
        for o in [
            &mut self.object_prototype,
            &mut self.function_prototype,
            &mut self.array_prototype,
            &mut self.map_prototype,
            &mut self.set_prototype,
            &mut self.iterator_prototype,
            &mut self.error_prototype,
        ] {
            f(o);
        }
        for (_, o) in self.error_subclasses.iter_mut().chain(self.constructors.iter_mut()) {
            f(o);
        }
    }
}

fn this_object(this: &Value, method: &str) -> HostResult<ObjectRef> {
    this.as_object()
        .ok_or_else(|| HostError::type_error(format!("{} called on non-object", method)))
}

fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    let Some(n) = value.as_number() else {
        return default;
    };
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

/// Populate the prototypes and create the constructors.
pub(crate) fn install(cx: &Context) {
    let (object_proto, function_proto, array_proto, map_proto, set_proto, iterator_proto, error_proto, subclasses) = {
        let i = cx.intrinsics();
        (
            i.object_prototype,
            i.function_prototype,
            i.array_prototype,
            i.map_prototype,
            i.set_prototype,
            i.iterator_prototype,
            i.error_prototype,
            i.error_subclasses.clone(),
        )
    };
    let iterator_key = PropertyKey::Symbol(cx.symbols().iterator.clone());

    install_object_prototype(cx, object_proto);
    cx.define_method(function_proto, "toString", "toString", |cx, this, _| {
        let name = match this {
            Value::Object(o) => cx.get(*o, "name")?,
            _ => return Err(HostError::type_error("Function.prototype.toString requires a function")),
        };
        Ok(Value::string(&format!("function {}() {{ [native code] }}", cx.display(&name))))
    });
    install_array_prototype(cx, array_proto, &iterator_key);
    install_collection_prototype(cx, map_proto, false, &iterator_key);
    install_collection_prototype(cx, set_proto, true, &iterator_key);

    cx.define_method(iterator_proto, "next", "next", |cx, this, _| cx.builtin_iterator_next(this));
    cx.define_method(iterator_proto, iterator_key, "[Symbol.iterator]", |_, this, _| Ok(this.clone()));

    cx.define_property(error_proto, "name", Value::string("Error"), PropertyAttributes::HIDDEN);
    cx.define_property(error_proto, "message", Value::string(""), PropertyAttributes::HIDDEN);
    cx.define_method(error_proto, "toString", "toString", |cx, this, _| {
        let o = this_object(this, "Error.prototype.toString")?;
        let (name, message) = cx.error_name_and_message(o);
        let name = if name.is_empty() { "Error".to_string() } else { name };
        Ok(Value::string(&if message.is_empty() {
            name
        } else {
            format!("{}: {}", name, message)
        }))
    });
    for (name, proto) in &subclasses {
        cx.define_property(*proto, "name", Value::string(name), PropertyAttributes::HIDDEN);
    }

    // Constructors
    let mut constructors = Vec::new();
    let object_ctor = cx.new_function("Object", FunctionFlags::CONSTRUCTOR, |cx, _, args| match arg(args, 0) {
        Value::Object(o) => Ok(Value::Object(o)),
        _ => Ok(Value::Object(cx.new_object())),
    });
    cx.define_method(object_ctor, "keys", "keys", |cx, _, args| {
        let o = this_object(&arg(args, 0), "Object.keys")?;
        let keys = cx
            .enumerate(o)?
            .into_iter()
            .filter(|k| !matches!(k, PropertyKey::Symbol(_)))
            .map(|k| k.to_value())
            .collect();
        Ok(Value::Object(cx.new_array(keys)))
    });
    constructors.push(("Object", object_ctor, object_proto));

    let array_ctor = cx.new_function("Array", FunctionFlags::CONSTRUCTOR, |cx, _, args| {
        Ok(Value::Object(cx.new_array(args.to_vec())))
    });
    cx.define_method(array_ctor, "isArray", "isArray", |cx, _, args| {
        Ok(Value::Boolean(cx.is_array(&arg(args, 0))))
    });
    constructors.push(("Array", array_ctor, array_proto));

    let map_ctor = cx.new_function("Map", FunctionFlags::CLASS, |cx, _, args| {
        let map = cx.new_map();
        let source = arg(args, 0);
        if !source.is_nullish() {
            for entry in cx.iterate(&source)? {
                let key = cx.get_value(&entry, 0u32)?;
                let value = cx.get_value(&entry, 1u32)?;
                cx.store_barrier(&[key.clone(), value.clone()]);
                cx.with_map_data(&Value::Object(map), false, |d| d.set(key, value))?;
            }
        }
        Ok(Value::Object(map))
    });
    constructors.push(("Map", map_ctor, map_proto));

    let set_ctor = cx.new_function("Set", FunctionFlags::CLASS, |cx, _, args| {
        let set = cx.new_set();
        let source = arg(args, 0);
        if !source.is_nullish() {
            for value in cx.iterate(&source)? {
                cx.store_barrier(std::slice::from_ref(&value));
                cx.with_map_data(&Value::Object(set), true, |d| d.set(value, Value::Undefined))?;
            }
        }
        Ok(Value::Object(set))
    });
    constructors.push(("Set", set_ctor, set_proto));

    let error_ctor = cx.new_function("Error", FunctionFlags::CONSTRUCTOR, |cx, _, args| {
        let message = match arg(args, 0) {
            Value::Undefined => String::new(),
            v => cx.to_string(&v)?.to_string(),
        };
        Ok(Value::Object(cx.new_error("Error", &message)))
    });
    constructors.push(("Error", error_ctor, error_proto));
    for (name, proto) in subclasses {
        let ctor = cx.new_function(name, FunctionFlags::CONSTRUCTOR, move |cx, _, args| {
            let message = match arg(args, 0) {
                Value::Undefined => String::new(),
                v => cx.to_string(&v)?.to_string(),
            };
            Ok(Value::Object(cx.new_error(name, &message)))
        });
        constructors.push((name, ctor, proto));
    }

    for (_, ctor, proto) in &constructors {
        cx.define_property(*ctor, "prototype", Value::Object(*proto), PropertyAttributes::FROZEN);
        cx.define_property(*proto, "constructor", Value::Object(*ctor), PropertyAttributes::HIDDEN);
    }
    cx.intrinsics_mut().constructors = constructors.into_iter().map(|(n, c, _)| (n, c)).collect();
}

fn install_object_prototype(cx: &Context, proto: ObjectRef) {
    cx.define_method(proto, "toString", "toString", |cx, this, _| {
        let tag = match this {
            Value::Undefined => "Undefined".to_string(),
            Value::Null => "Null".to_string(),
            Value::Object(o) => cx.class_name(*o),
            _ => "Object".to_string(),
        };
        Ok(Value::string(&format!("[object {}]", tag)))
    });
    cx.define_method(proto, "hasOwnProperty", "hasOwnProperty", |cx, this, args| {
        let o = this_object(this, "hasOwnProperty")?;
        let key = PropertyKey::from_value(&arg(args, 0))
            .map(Ok)
            .unwrap_or_else(|| cx.to_string(&arg(args, 0)).map(PropertyKey::from_js_string))?;
        Ok(Value::Boolean(cx.has_own_property(o, key)?))
    });
    cx.define_method(proto, "valueOf", "valueOf", |_, this, _| Ok(this.clone()));
}

fn install_array_prototype(cx: &Context, proto: ObjectRef, iterator_key: &PropertyKey) {
    cx.define_method(proto, "push", "push", |cx, this, args| {
        cx.store_barrier(args);
        let len = cx.with_array(this, |items| {
            items.extend(args.iter().cloned());
            items.len()
        })?;
        Ok(Value::number(len as f64))
    });
    cx.define_method(proto, "pop", "pop", |cx, this, _| {
        Ok(cx.with_array(this, |items| items.pop())?.unwrap_or_default())
    });
    cx.define_method(proto, "slice", "slice", |cx, this, args| {
        let items = cx.with_array(this, |items| items.clone())?;
        let start = relative_index(&arg(args, 0), items.len(), 0);
        let end = relative_index(&arg(args, 1), items.len(), items.len());
        let slice = if start < end { items[start..end].to_vec() } else { Vec::new() };
        Ok(Value::Object(cx.new_array(slice)))
    });
    cx.define_method(proto, "splice", "splice", |cx, this, args| {
        cx.store_barrier(args);
        let removed = cx.with_array(this, |items| {
            let len = items.len();
            let start = relative_index(&arg(args, 0), len, 0);
            let count = match args.get(1) {
                None => len - start,
                Some(v) => (v.as_number().unwrap_or(0.0).max(0.0) as usize).min(len - start),
            };
            let insert = args.iter().skip(2).cloned();
            items.splice(start..start + count, insert).collect::<Vec<_>>()
        })?;
        Ok(Value::Object(cx.new_array(removed)))
    });
    cx.define_method(proto, "concat", "concat", |cx, this, args| {
        let mut out = cx.with_array(this, |items| items.clone())?;
        for a in args {
            if cx.is_array(a) {
                out.extend(cx.with_array(a, |items| items.clone())?);
            } else {
                out.push(a.clone());
            }
        }
        Ok(Value::Object(cx.new_array(out)))
    });
    cx.define_method(proto, "includes", "includes", |cx, this, args| {
        let needle = arg(args, 0);
        Ok(Value::Boolean(
            cx.with_array(this, |items| items.iter().any(|v| v.same_value_zero(&needle)))?,
        ))
    });
    cx.define_method(proto, "indexOf", "indexOf", |cx, this, args| {
        let needle = arg(args, 0);
        let found = cx.with_array(this, |items| items.iter().position(|v| v.strict_equals(&needle)))?;
        Ok(Value::number(found.map_or(-1.0, |i| i as f64)))
    });
    let join = cx.define_method(proto, "join", "join", |cx, this, args| {
        let separator = match arg(args, 0) {
            Value::Undefined => ",".to_string(),
            v => cx.to_string(&v)?.to_string(),
        };
        let items = cx.with_array(this, |items| items.clone())?;
        let mut parts = Vec::with_capacity(items.len());
        for item in &items {
            parts.push(if item.is_nullish() {
                String::new()
            } else {
                cx.to_string(item)?.to_string()
            });
        }
        Ok(Value::string(&parts.join(&separator)))
    });
    cx.define_property(proto, "toString", Value::Object(join), PropertyAttributes::HIDDEN);
    cx.define_method(proto, "forEach", "forEach", |cx, this, args| {
        let callback = arg(args, 0);
        let this_arg = arg(args, 1);
        let items = cx.with_array(this, |items| collect_args(items))?;
        for (i, item) in items.into_iter().enumerate() {
            cx.call(&callback, &this_arg, &[item, Value::number(i as f64), this.clone()])?;
        }
        Ok(Value::Undefined)
    });
    for (name, kind) in [("keys", IterKind::Keys), ("entries", IterKind::Entries)] {
        cx.define_method(proto, name, name, move |cx, this, _| {
            cx.with_array(this, |_| ())?;
            Ok(Value::Object(cx.new_iterator(this_object(this, name)?, kind)))
        });
    }
    let values = cx.define_method(proto, "values", "values", |cx, this, _| {
        cx.with_array(this, |_| ())?;
        Ok(Value::Object(cx.new_iterator(this_object(this, "values")?, IterKind::Values)))
    });
    cx.define_property(proto, iterator_key.clone(), Value::Object(values), PropertyAttributes::HIDDEN);
}

fn install_collection_prototype(cx: &Context, proto: ObjectRef, set: bool, iterator_key: &PropertyKey) {
    if set {
        cx.define_method(proto, "add", "add", |cx, this, args| {
            let value = arg(args, 0);
            cx.store_barrier(std::slice::from_ref(&value));
            cx.with_map_data(this, true, |d| d.set(value, Value::Undefined))?;
            Ok(this.clone())
        });
    } else {
        cx.define_method(proto, "get", "get", |cx, this, args| {
            Ok(cx.with_map_data(this, false, |d| d.get(&arg(args, 0)))?.unwrap_or_default())
        });
        cx.define_method(proto, "set", "set", |cx, this, args| {
            let (key, value) = (arg(args, 0), arg(args, 1));
            cx.store_barrier(&[key.clone(), value.clone()]);
            cx.with_map_data(this, false, |d| d.set(key, value))?;
            Ok(this.clone())
        });
    }
    cx.define_method(proto, "has", "has", move |cx, this, args| {
        Ok(Value::Boolean(cx.with_map_data(this, set, |d| d.has(&arg(args, 0)))?))
    });
    cx.define_method(proto, "delete", "delete", move |cx, this, args| {
        Ok(Value::Boolean(cx.with_map_data(this, set, |d| d.delete(&arg(args, 0)))?))
    });
    cx.define_method(proto, "clear", "clear", move |cx, this, _| {
        cx.with_map_data(this, set, |d| d.clear())?;
        Ok(Value::Undefined)
    });
    cx.define_getter(proto, "size", move |cx, this, _| {
        Ok(Value::number(cx.with_map_data(this, set, |d| d.size())? as f64))
    });
    cx.define_method(proto, "forEach", "forEach", move |cx, this, args| {
        let callback = arg(args, 0);
        let this_arg = arg(args, 1);
        let entries = cx.with_map_data(this, set, |d| d.live_entries())?;
        for (key, value) in entries {
            let value = if set { key.clone() } else { value };
            cx.call(&callback, &this_arg, &[value, key, this.clone()])?;
        }
        Ok(Value::Undefined)
    });

    let mut iterators = Vec::new();
    for (name, kind) in [
        ("keys", IterKind::Keys),
        ("values", IterKind::Values),
        ("entries", IterKind::Entries),
    ] {
        let f = cx.define_method(proto, name, name, move |cx, this, _| {
            cx.with_map_data(this, set, |_| ())?;
            Ok(Value::Object(cx.new_iterator(this_object(this, name)?, kind)))
        });
        iterators.push(f);
    }
    let default_iterator = if set { iterators[1] } else { iterators[2] };
    cx.define_property(proto, iterator_key.clone(), Value::Object(default_iterator), PropertyAttributes::HIDDEN);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_index() {
        assert_eq!(relative_index(&Value::Int32(-1), 5, 0), 4);
        assert_eq!(relative_index(&Value::Int32(9), 5, 0), 5);
        assert_eq!(relative_index(&Value::Undefined, 5, 3), 3);
        assert_eq!(relative_index(&Value::Int32(-9), 5, 0), 0);
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(-0.0), "0");
    }
}
