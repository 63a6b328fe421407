//! Host runtime integration tests

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use otter_host::{
    Context, FunctionFlags, HostError, NativeClass, ObjectRef, PropertyAttributes, PropertyKey,
    Value,
};

fn array_values(cx: &Context, v: &Value) -> Vec<Value> {
    cx.array_elements(v.as_object().expect("array")).expect("elements")
}

#[test]
fn test_property_protocol() {
    let cx = Context::new();
    let o = cx.new_object();
    cx.set(o, "a", Value::Int32(1)).unwrap();
    cx.define_property(o, "hidden", Value::Int32(2), PropertyAttributes::HIDDEN);
    cx.define_property(o, "fixed", Value::Int32(3), PropertyAttributes::FROZEN);

    assert!(matches!(cx.get(o, "a").unwrap(), Value::Int32(1)));
    assert!(cx.has_property(o, "toString").unwrap());
    assert!(!cx.has_own_property(o, "toString").unwrap());
    assert_eq!(cx.enumerate(o).unwrap(), vec![PropertyKey::string("a")]);
    assert_eq!(cx.own_keys(o).unwrap().len(), 3);

    assert!(matches!(cx.set(o, "fixed", Value::Int32(9)), Err(HostError::TypeError(_))));
    assert!(!cx.delete(o, "fixed").unwrap());
    assert!(cx.delete(o, "a").unwrap());
    assert!(cx.get(o, "a").unwrap().is_undefined());
}

#[test]
fn test_accessors_use_receiver() {
    let cx = Context::new();
    let proto = cx.new_object();
    cx.define_getter(proto, "self_ref", |_, this, _| Ok(this.clone()));
    let child = cx.new_object_with_proto(Some(proto));
    let got = cx.get(child, "self_ref").unwrap();
    assert_eq!(got.as_object(), Some(child));
}

#[test]
fn test_array_methods() {
    let cx = Context::new();
    let arr = Value::Object(cx.new_array(vec![Value::Int32(1), Value::Int32(2)]));
    cx.call_method(&arr, "push", &[Value::Int32(3)]).unwrap();
    let o = arr.as_object().unwrap();
    assert_eq!(cx.array_length(o), Some(3));
    assert!(matches!(cx.get(o, "length").unwrap(), Value::Int32(3)));

    let joined = cx.call_method(&arr, "join", &[Value::string("-")]).unwrap();
    assert_eq!(joined.as_string().unwrap(), "1-2-3");

    let sliced = cx.call_method(&arr, "slice", &[Value::Int32(-2)]).unwrap();
    assert_eq!(array_values(&cx, &sliced).len(), 2);

    let included = cx.call_method(&arr, "includes", &[Value::Number(2.0)]).unwrap();
    assert!(included.truthy());

    cx.set(o, "length", Value::Int32(1)).unwrap();
    assert_eq!(cx.array_length(o), Some(1));
    cx.set(o, 4u32, Value::Int32(5)).unwrap();
    assert_eq!(cx.array_length(o), Some(5));
}

#[test]
fn test_map_and_set() {
    let cx = Context::new();
    let map = Value::Object(cx.new_map());
    cx.call_method(&map, "set", &[Value::string("k"), Value::Int32(7)]).unwrap();
    let size = cx.get_value(&map, "size").unwrap();
    assert!(matches!(size, Value::Int32(1)));
    let got = cx.call_method(&map, "get", &[Value::string("k")]).unwrap();
    assert!(matches!(got, Value::Int32(7)));
    assert!(cx.call_method(&map, "get", &[Value::string("x")]).unwrap().is_undefined());

    let entries = cx.iterate(&map).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(array_values(&cx, &entries[0]).len(), 2);

    let set = Value::Object(cx.new_set());
    cx.call_method(&set, "add", &[Value::Int32(1)]).unwrap();
    cx.call_method(&set, "add", &[Value::Number(1.0)]).unwrap();
    cx.call_method(&set, "add", &[Value::Number(-0.0)]).unwrap();
    assert_eq!(cx.collection_size(set.as_object().unwrap()), Some(2));
    let values = cx.iterate(&set).unwrap();
    assert!(matches!(values[0], Value::Int32(1)));
}

#[test]
fn test_map_constructor_from_entries() {
    let cx = Context::new();
    let global = cx.global();
    let ctor = cx.get(global, "Map").unwrap();
    let pair = Value::Object(cx.new_array(vec![Value::string("a"), Value::Int32(1)]));
    let entries = Value::Object(cx.new_array(vec![pair]));
    let map = cx.construct(&ctor, &[entries]).unwrap();
    assert!(cx.is_map(&map));
    assert_eq!(cx.collection_size(map.as_object().unwrap()), Some(1));
}

#[test]
fn test_call_and_construct() {
    let cx = Context::new();
    let add = cx.new_function("add", FunctionFlags::PLAIN, |_, _, args| {
        let a = args.first().and_then(Value::as_number).unwrap_or(0.0);
        let b = args.get(1).and_then(Value::as_number).unwrap_or(0.0);
        Ok(Value::number(a + b))
    });
    let result = cx.call(&Value::Object(add), &Value::Undefined, &[Value::Int32(2), Value::Int32(3)]).unwrap();
    assert!(matches!(result, Value::Int32(5)));
    assert!(cx.construct(&Value::Object(add), &[]).is_err());

    let class = cx.new_function("Point", FunctionFlags::CLASS, |cx, this, args| {
        let o = this.as_object().unwrap();
        cx.set(o, "x", args.first().cloned().unwrap_or_default())?;
        Ok(Value::Undefined)
    });
    let err = cx.call(&Value::Object(class), &Value::Undefined, &[]).unwrap_err();
    assert!(err.to_string().contains("Class constructor Point cannot be invoked without 'new'"));

    let point = cx.construct(&Value::Object(class), &[Value::Int32(4)]).unwrap();
    assert!(matches!(cx.get_value(&point, "x").unwrap(), Value::Int32(4)));
    assert!(cx.instance_of(&point, &Value::Object(class)).unwrap());
}

#[test]
fn test_errors_round_trip() {
    let cx = Context::new();
    let value = cx.error_to_value(HostError::type_error("bad thing"));
    assert!(cx.is_error(&value));
    let o = value.as_object().unwrap();
    let (name, message) = cx.error_name_and_message(o);
    assert_eq!(name, "TypeError");
    assert_eq!(message, "bad thing");
    assert_eq!(cx.display(&value), "TypeError: bad thing");

    let custom = cx.new_error("JSError", "wrapped");
    assert_eq!(cx.error_name_and_message(custom).0, "JSError");
    let thrown = cx.throw(Value::Object(custom));
    assert!(thrown.to_string().contains("JSError: wrapped"));
}

#[test]
fn test_to_string_conversions() {
    let cx = Context::new();
    assert_eq!(cx.to_string(&Value::Number(1.5)).unwrap(), "1.5");
    assert_eq!(cx.to_string(&Value::Null).unwrap(), "null");
    let o = Value::Object(cx.new_object());
    assert_eq!(cx.to_string(&o).unwrap(), "[object Object]");
    assert_eq!(cx.type_of(&Value::Object(cx.new_function("f", FunctionFlags::PLAIN, |_, _, _| Ok(Value::Undefined)))), "function");
}

struct Counted {
    finalized: Rc<Cell<usize>>,
    moves: Rc<RefCell<Vec<(ObjectRef, ObjectRef)>>>,
}

impl NativeClass for Counted {
    fn name(&self) -> &str {
        "Counted"
    }

    fn get_property(
        &self,
        _cx: &Context,
        _this: ObjectRef,
        key: &PropertyKey,
        _receiver: &Value,
    ) -> otter_host::HostResult<Option<Value>> {
        if key.is("magic") {
            return Ok(Some(Value::Int32(42)));
        }
        Ok(None)
    }

    fn finalize(&self, _data: Rc<dyn Any>) {
        self.finalized.set(self.finalized.get() + 1);
    }

    fn moved(&self, _data: &Rc<dyn Any>, from: ObjectRef, to: ObjectRef) {
        self.moves.borrow_mut().push((from, to));
    }
}

fn counted() -> (Rc<Counted>, Rc<Cell<usize>>, Rc<RefCell<Vec<(ObjectRef, ObjectRef)>>>) {
    let finalized = Rc::new(Cell::new(0));
    let moves = Rc::new(RefCell::new(Vec::new()));
    let class = Rc::new(Counted {
        finalized: finalized.clone(),
        moves: moves.clone(),
    });
    (class, finalized, moves)
}

#[test]
fn test_native_hooks_and_finalize() {
    let cx = Context::new();
    let (class, finalized, _) = counted();
    let o = cx.new_native(None, class, Rc::new(5u32));
    assert!(matches!(cx.get(o, "magic").unwrap(), Value::Int32(42)));
    assert_eq!(*cx.native_data_as::<u32>(o).unwrap(), 5);

    cx.gc();
    assert_eq!(finalized.get(), 1);
    assert!(!cx.is_alive(o));
}

#[test]
fn test_persistent_survives_relocation() {
    let cx = Context::new();
    let (class, finalized, moves) = counted();
    let _junk = cx.new_object();
    let native = cx.new_native(None, class, Rc::new(()));
    let rooted = cx.root(Value::Object(native));
    let uid = cx.unique_id(native).unwrap();

    let report = cx.gc();
    assert!(report.freed >= 1);
    assert!(report.moved >= 1);
    assert_eq!(finalized.get(), 0);

    let now = rooted.object().unwrap();
    assert_ne!(now, native);
    assert_eq!(cx.unique_id(now), Some(uid));
    assert!(moves.borrow().contains(&(native, now)));
    assert!(matches!(cx.get(now, "magic").unwrap(), Value::Int32(42)));

    drop(rooted);
    cx.gc();
    assert_eq!(finalized.get(), 1);
}

#[test]
fn test_globals_survive_gc() {
    let cx = Context::new();
    let global = cx.global();
    let o = cx.new_object();
    cx.set(global, "kept", Value::Object(o)).unwrap();
    cx.gc();
    let global = cx.global();
    let kept = cx.get(global, "kept").unwrap();
    assert!(cx.is_alive(kept.as_object().unwrap()));
    let array_ctor = cx.get(global, "Array").unwrap();
    assert!(cx.is_constructor(&array_ctor));
}

#[test]
fn test_incremental_gc_expose() {
    let cx = Context::new();
    let table: Rc<RefCell<Option<ObjectRef>>> = Rc::new(RefCell::new(None));
    let o = cx.new_object();
    *table.borrow_mut() = Some(o);

    cx.start_incremental_gc();
    assert!(cx.is_gc_marking());
    while !cx.gc_step() {}

    // Handed out from the untraced table mid-cycle, then stored in a root
    let handed = table.borrow().unwrap();
    assert!(cx.expose_to_active_gc(handed));
    let rooted = cx.root(Value::Object(handed));
    cx.finish_gc();
    assert!(rooted.object().is_some_and(|o| cx.is_alive(o)));
}

#[test]
fn test_context_lock_is_reentrant() {
    let cx = Context::new();
    assert!(!cx.is_entered());
    let outer = cx.enter();
    {
        let _inner = cx.enter();
        assert!(cx.is_entered());
    }
    assert!(cx.is_entered());
    drop(outer);
    assert!(!cx.is_entered());
}

#[test]
fn test_realms() {
    let cx = Context::new();
    let first = cx.global();
    let second = cx.new_global();
    assert_ne!(first, second);
    {
        let _realm = cx.enter_realm(second);
        assert_eq!(cx.global(), second);
    }
    assert_eq!(cx.global(), first);
}
