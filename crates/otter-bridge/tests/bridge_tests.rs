//! Proxy behaviour across the bridge in both directions

use otter_bridge::{Bridge, BridgeConfig, HostShape, ScriptShape, TypeShape};
use otter_host::{Context, HostError, ObjectRef, Value};
use otter_script::{AttrMap, BinaryOp, CompareOp, Interp, Obj};

fn bridge() -> Bridge {
    Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap()
}

fn object(value: &Value) -> ObjectRef {
    value.as_object().expect("object")
}

fn host_map(bridge: &Bridge, pairs: &[(&str, i32)]) -> Value {
    let cx = bridge.context();
    let map = Value::Object(cx.new_map());
    for (k, v) in pairs {
        cx.call_method(&map, "set", &[Value::string(k), Value::Int32(*v)]).unwrap();
    }
    map
}

fn sorted_ints(interp: &Interp, obj: &Obj) -> Vec<i64> {
    let mut out: Vec<i64> = interp.iterate(obj).unwrap().iter().filter_map(|o| o.as_int()).collect();
    out.sort_unstable();
    out
}

#[test]
fn test_host_array_from_script() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let array = Value::Object(cx.new_array(vec![Value::Int32(1), Value::string("a"), Value::Boolean(true)]));
    let list = bridge.to_script(&array).unwrap();
    assert_eq!(bridge.script_shape(&list), Some(ScriptShape::Array));

    assert_eq!(interp.getitem(&list, &interp.int(0)).unwrap().as_int(), Some(1));
    assert_eq!(interp.getitem(&list, &interp.int(2)).unwrap().as_bool(), Some(true));
    assert_eq!(interp.len(&list).unwrap(), 3);

    let extra = interp.list(vec![interp.str("b")]);
    let same = interp.inplace_op(&list, &extra, BinaryOp::Add).unwrap();
    assert!(same.is(&list));
    assert_eq!(interp.len(&list).unwrap(), 4);
    assert_eq!(cx.array_length(object(&array)), Some(4));
}

#[test]
fn test_script_dict_from_host() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let dict = interp
        .dict_from(vec![(interp.str("x"), interp.int(1)), (interp.str("y"), interp.int(2))])
        .unwrap();
    let proxy = bridge.to_host(&dict).unwrap();
    assert_eq!(bridge.host_shape(&proxy), Some(HostShape::Object));

    let x = cx.call_method(&proxy, "get", &[Value::string("x")]).unwrap();
    assert!(x.strict_equals(&Value::Int32(1)));
    let has = cx.call_method(&proxy, "has", &[Value::string("z")]).unwrap();
    assert!(has.strict_equals(&Value::Boolean(false)));
    assert!(cx.get(object(&proxy), "size").unwrap().strict_equals(&Value::Int32(2)));

    let removed = cx.call_method(&proxy, "delete", &[Value::string("x")]).unwrap();
    assert!(removed.strict_equals(&Value::Boolean(true)));
    assert!(cx.call_method(&proxy, "get", &[Value::string("x")]).unwrap().is_undefined());
    assert_eq!(interp.len(&dict).unwrap(), 1);
}

#[test]
fn test_script_generator_from_host() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let mut pending = vec![30, 20, 10];
    let generator = interp.generator(
        "numbers",
        Box::new(move |interp: &Interp| Ok(pending.pop().map(|n| interp.int(n)))),
    );
    let proxy = bridge.to_host(&generator).unwrap();

    let mut seen = Vec::new();
    loop {
        let step = cx.call_method(&proxy, "next", &[]).unwrap();
        let step = object(&step);
        if cx.get(step, "done").unwrap().truthy() {
            break;
        }
        seen.push(cx.get(step, "value").unwrap());
    }
    let seen: Vec<i32> = seen
        .iter()
        .map(|v| match v {
            Value::Int32(n) => *n,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    assert_eq!(seen, [10, 20, 30]);

    let again = cx.call_method(&proxy, "next", &[]).unwrap();
    assert!(cx.get(object(&again), "done").unwrap().truthy());
}

#[test]
fn test_script_exception_reaches_host() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let boom = interp
        .new_class("Boom", "components", vec![interp.types().exception.clone()], AttrMap::default())
        .unwrap();
    let explode = interp.function("explode", move |interp, _, _| {
        Err(interp.raise_new(&boom, vec![interp.str("boom")]))
    });
    let proxy = bridge.to_host(&explode).unwrap();
    assert_eq!(bridge.host_shape(&proxy), Some(HostShape::Callable));

    let err = cx.call(&proxy, &Value::Undefined, &[]).unwrap_err();
    assert!(err.to_string().contains("boom"));
    let HostError::Exception(thrown) = err else {
        panic!("expected a thrown error, got {}", err);
    };
    let (name, message) = cx.error_name_and_message(object(&thrown.value));
    assert_eq!(name, "components.Boom");
    assert_eq!(message, "boom");
}

#[test]
fn test_attribute_lookups_share_a_proxy() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let holder_class = interp.new_class("Holder", "app", vec![], AttrMap::default()).unwrap();
    let holder = interp.call(&holder_class, &[], &[]).unwrap();
    interp.setattr(&holder, "child", interp.list(vec![interp.int(1)])).unwrap();

    let proxy = object(&bridge.to_host(&holder).unwrap());
    let first = cx.get(proxy, "child").unwrap();
    let second = cx.get(proxy, "child").unwrap();
    assert!(first.as_object().is_some());
    assert!(first.strict_equals(&second));
}

#[test]
fn test_set_intersection_yields_new_host_set() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let host_set = Value::Object(cx.new_set());
    for n in [1, 2, 3] {
        cx.call_method(&host_set, "add", &[Value::Int32(n)]).unwrap();
    }
    let set = bridge.to_script(&host_set).unwrap();

    let other = interp.set(vec![interp.int(2), interp.int(3), interp.int(4)]).unwrap();
    let both = interp.binary_op(&set, &other, BinaryOp::And).unwrap();
    assert_eq!(bridge.script_shape(&both), Some(ScriptShape::Set));
    assert_eq!(sorted_ints(interp, &both), [2, 3]);

    let result = bridge.to_host(&both).unwrap();
    assert!(cx.is_set(&result));
    assert!(!result.strict_equals(&host_set));
    assert_eq!(cx.collection_size(object(&result)), Some(2));

    let array = Value::Object(cx.new_array(vec![Value::Int32(2), Value::Int32(3), Value::Int32(4)]));
    let array = bridge.to_script(&array).unwrap();
    let via_method = interp.call_method(&set, "intersection", &[array]).unwrap();
    assert_eq!(sorted_ints(interp, &via_method), [2, 3]);
    assert_eq!(cx.collection_size(object(&host_set)), Some(3));
}

#[test]
fn test_identity_is_stable() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();

    let host = Value::Object(cx.new_object());
    let a = bridge.to_script(&host).unwrap();
    let b = bridge.to_script(&host).unwrap();
    assert!(a.is(&b));
    assert_eq!(bridge.script_proxy_count(), 1);

    let list = interp.list(vec![]);
    let x = bridge.to_host(&list).unwrap();
    let y = bridge.to_host(&list).unwrap();
    assert!(x.strict_equals(&y));
    assert!(bridge.to_host(&a).unwrap().strict_equals(&host));
    assert!(bridge.to_script(&x).unwrap().is(&list));
}

#[test]
fn test_shape_priority_is_deterministic() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();

    // A class is callable and a type; the type shape wins
    let dict_type = interp.types().dict.clone();
    for _ in 0..2 {
        let proxy = bridge.to_host(&dict_type).unwrap();
        assert_eq!(bridge.host_shape(&proxy), Some(HostShape::Type(TypeShape::Mapping)));
        assert!(cx.is_callable(&proxy));
    }

    let map = host_map(&bridge, &[]);
    for _ in 0..2 {
        assert_eq!(bridge.script_shape(&bridge.to_script(&map).unwrap()), Some(ScriptShape::Map));
    }
}

#[test]
fn test_primitives_round_trip() {
    let bridge = bridge();
    let interp = bridge.interp();
    let values = [
        interp.bool(true),
        interp.bool(false),
        interp.int(0),
        interp.int(-7),
        interp.int(i64::from(i32::MAX)),
        interp.float(2.5),
        interp.str("héllo wörld"),
        interp.none(),
    ];
    for value in &values {
        let back = bridge.to_script(&bridge.to_host(value).unwrap()).unwrap();
        assert!(interp.eq(value, &back).unwrap(), "{:?} did not survive", interp.repr(value));
    }

    let host = [
        Value::Boolean(true),
        Value::Int32(42),
        Value::Number(0.25),
        Value::string("ünïcode"),
        Value::Null,
    ];
    for value in &host {
        let back = bridge.to_host(&bridge.to_script(value).unwrap()).unwrap();
        assert!(back.strict_equals(value));
    }
}

#[test]
fn test_iterator_proxy_exhausts_once() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let array = Value::Object(cx.new_array(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]));
    let list = bridge.to_script(&array).unwrap();

    let it = interp.iter(&list).unwrap();
    assert_eq!(bridge.script_shape(&it), Some(ScriptShape::Iterator));
    let mut seen = Vec::new();
    while let Some(item) = interp.next(&it).unwrap() {
        seen.push(item.as_int().unwrap());
    }
    assert_eq!(seen, [1, 2, 3]);
    assert!(interp.next(&it).unwrap().is_none());
    assert!(interp.next(&it).unwrap().is_none());

    let fresh = interp.iter(&list).unwrap();
    assert!(!fresh.is(&it));
    assert_eq!(interp.next(&fresh).unwrap().and_then(|o| o.as_int()), Some(1));
}

#[test]
fn test_map_equality_is_structural() {
    let bridge = bridge();
    let interp = bridge.interp();
    let a = bridge.to_script(&host_map(&bridge, &[("k", 1), ("v", 2)])).unwrap();
    let b = bridge.to_script(&host_map(&bridge, &[("v", 2), ("k", 1)])).unwrap();
    let extra = bridge.to_script(&host_map(&bridge, &[("k", 1), ("v", 2), ("w", 3)])).unwrap();
    let missing = bridge.to_script(&host_map(&bridge, &[("k", 1)])).unwrap();

    assert!(!a.is(&b));
    assert!(interp.compare(&a, &b, CompareOp::Eq).unwrap());
    assert!(!interp.compare(&a, &extra, CompareOp::Eq).unwrap());
    assert!(!interp.compare(&a, &missing, CompareOp::Eq).unwrap());
    assert!(interp.compare(&a, &missing, CompareOp::Ne).unwrap());
}

#[test]
fn test_finalized_proxies_leave_the_cache() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();

    let list = interp.list(vec![interp.int(1)]);
    bridge.to_host(&list).unwrap();
    assert_eq!(bridge.host_proxy_count(), 1);
    cx.gc();
    assert_eq!(bridge.host_proxy_count(), 0);
    bridge.to_host(&list).unwrap();
    assert_eq!(bridge.host_proxy_count(), 1);

    let host = Value::Object(cx.new_object());
    let rooted = cx.root(host);
    let proxy = bridge.to_script(&rooted.get()).unwrap();
    drop(proxy);
    assert_eq!(bridge.script_proxy_count(), 0);
    let again = bridge.to_script(&rooted.get()).unwrap();
    assert_eq!(bridge.script_proxy_count(), 1);
    assert!(bridge.to_host(&again).unwrap().strict_equals(&rooted.get()));
}

#[test]
fn test_relocated_proxy_is_found_again() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let list = interp.list(vec![interp.int(1)]);
    bridge.to_host(&interp.list(vec![])).unwrap();

    let _junk = cx.new_object();
    let proxy = bridge.to_host(&list).unwrap();
    let rooted = cx.root(proxy.clone());
    let report = cx.gc();
    assert!(report.moved >= 1);

    let now = rooted.get();
    assert!(!now.strict_equals(&proxy));
    let again = bridge.to_host(&list).unwrap();
    assert!(again.strict_equals(&now));
    assert_eq!(bridge.host_proxy_count(), 1);
    assert!(cx.get(object(&again), "length").unwrap().strict_equals(&Value::Int32(1)));
}

#[test]
fn test_cached_proxy_survives_incremental_gc() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let list = interp.list(vec![interp.int(1), interp.int(2)]);
    let first = bridge.to_host(&list).unwrap();
    assert_eq!(bridge.host_proxy_count(), 1);

    cx.start_incremental_gc();
    assert!(cx.is_gc_marking());
    cx.gc_step();

    // Only the untraced cache refers to the proxy when it is handed out
    let handed = bridge.to_host(&list).unwrap();
    assert!(handed.strict_equals(&first));
    while !cx.gc_step() {}
    cx.finish_gc();

    assert_eq!(bridge.host_proxy_count(), 1);
    let again = bridge.to_host(&list).unwrap();
    assert!(cx.is_alive(object(&again)));
    assert!(cx.get(object(&again), "length").unwrap().strict_equals(&Value::Int32(2)));
    assert!(bridge.to_host(&list).unwrap().strict_equals(&again));
    assert_eq!(bridge.host_proxy_count(), 1);
}

#[test]
fn test_host_methods_keep_their_receiver() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let array = Value::Object(cx.new_array(vec![Value::Int32(1)]));
    let list = bridge.to_script(&array).unwrap();

    let push = interp.getattr(&list, "push").unwrap();
    assert_eq!(bridge.script_shape(&push), Some(ScriptShape::Callable));
    interp.call(&push, &[interp.int(2)], &[]).unwrap();
    assert_eq!(cx.array_length(object(&array)), Some(2));
}

#[test]
fn test_bound_methods_compare_by_function_and_receiver() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let first = bridge.to_script(&Value::Object(cx.new_array(vec![]))).unwrap();
    let second = bridge.to_script(&Value::Object(cx.new_array(vec![]))).unwrap();

    let a = interp.getattr(&first, "push").unwrap();
    let b = interp.getattr(&first, "push").unwrap();
    assert!(!a.is(&b));
    assert!(interp.compare(&a, &b, CompareOp::Eq).unwrap());
    assert_eq!(interp.hash(&a).unwrap(), interp.hash(&b).unwrap());

    let other = interp.getattr(&second, "push").unwrap();
    assert!(interp.compare(&a, &other, CompareOp::Ne).unwrap());
    let pop = interp.getattr(&first, "pop").unwrap();
    assert!(!interp.compare(&a, &pop, CompareOp::Eq).unwrap());
}

#[test]
fn test_host_error_round_trips_through_script() {
    let bridge = bridge();
    let cx = bridge.context();
    let interp = bridge.interp();
    let original = cx.new_error("RangeError", "too far");
    let thrower = cx.new_function("thrower", otter_host::FunctionFlags::PLAIN, move |cx, _, _| {
        Err(cx.throw(Value::Object(original)))
    });
    let thrower = bridge.to_script(&Value::Object(thrower)).unwrap();

    let err = interp.call(&thrower, &[], &[]).unwrap_err();
    let exc = interp.exception_object(&err);
    assert_eq!(interp.type_name(&exc), "JSError");

    let relay = interp.function("relay", move |interp, _, _| interp.call(&thrower, &[], &[]));
    let relay = bridge.to_host(&relay).unwrap();
    let HostError::Exception(thrown) = cx.call(&relay, &Value::Undefined, &[]).unwrap_err() else {
        panic!("expected a thrown error");
    };
    assert!(thrown.value.strict_equals(&Value::Object(original)));
}
