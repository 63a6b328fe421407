//! Script runtime integration tests

use std::cell::RefCell;
use std::rc::Rc;

use otter_script::{
    Interp, NativeObject, Obj, ScriptConfig, ScriptError, TypeFeatures, WarningRecord, traceback,
};

fn exec(interp: &Interp, source: &str) -> Obj {
    let globals = interp.dict();
    interp
        .exec_source(source, "<test>", &globals)
        .unwrap_or_else(|e| panic!("exec failed: {}", e));
    globals
}

fn exec_err(interp: &Interp, source: &str) -> ScriptError {
    let globals = interp.dict();
    interp
        .exec_source(source, "<test>", &globals)
        .expect_err("exec should fail")
}

fn global_repr(interp: &Interp, globals: &Obj, name: &str) -> String {
    let value = interp.dict_get_str(globals, name).expect("global");
    interp.repr(&value).expect("repr")
}

#[test]
fn test_list_methods_and_slices() {
    let interp = Interp::new();
    let g = exec(
        &interp,
        "xs = [3, 1, 2]\nxs.append(5)\nxs.sort(reverse=True)\nhead = xs[:2]\ntail = xs[-1]\nxs[1:3] = [9]\n",
    );
    assert_eq!(global_repr(&interp, &g, "head"), "[5, 3]");
    assert_eq!(global_repr(&interp, &g, "tail"), "1");
    assert_eq!(global_repr(&interp, &g, "xs"), "[5, 9, 1]");
}

#[test]
fn test_dict_and_set_operations() {
    let interp = Interp::new();
    let g = exec(
        &interp,
        "d = dict(a=1)\nd['b'] = 2\nks = sorted(d.keys())\ns = {1, 2} | {3}\nn = len(s)\nhas = 2 in s\ngot = d.get('zz', 0)\n",
    );
    assert_eq!(global_repr(&interp, &g, "ks"), "['a', 'b']");
    assert_eq!(global_repr(&interp, &g, "n"), "3");
    assert_eq!(global_repr(&interp, &g, "has"), "True");
    assert_eq!(global_repr(&interp, &g, "got"), "0");
}

#[test]
fn test_missing_key_raises_key_error_with_key() {
    let interp = Interp::new();
    let err = exec_err(&interp, "d = {}\nd['x']\n");
    let exc = interp.exception_object(&err);
    assert_eq!(interp.exception_summary(&exc), "KeyError: 'x'");
    assert!(interp.error_matches(&err, &interp.types().lookup_error));
}

#[test]
fn test_numbers() {
    let interp = Interp::new();
    let g = exec(&interp, "big = 2 ** 100\nhalf = 7 / 2\nfloor = -7 // 2\nmixed = 1 + 0.5\n");
    assert_eq!(global_repr(&interp, &g, "big"), "1267650600228229401496703205376");
    assert_eq!(global_repr(&interp, &g, "half"), "3.5");
    assert_eq!(global_repr(&interp, &g, "floor"), "-4");
    assert_eq!(global_repr(&interp, &g, "mixed"), "1.5");
    let err = exec_err(&interp, "x = 1 / 0\n");
    assert!(interp.exception_object(&err).as_exception().is_some());
    assert!(err.to_string().starts_with("ZeroDivisionError"));
}

#[test]
fn test_classes_built_with_type() {
    let interp = Interp::new();
    let g = exec(
        &interp,
        "P = type('P', (), {'__module__': 'pkg', 'v': 1, 'get': lambda self: self.v + 1})\np = P()\np.w = 2\nr = (p.v, p.w, p.get())\nok = isinstance(p, P)\n",
    );
    assert_eq!(global_repr(&interp, &g, "r"), "(1, 2, 2)");
    assert_eq!(global_repr(&interp, &g, "ok"), "True");
    let p = interp.dict_get_str(&g, "P").unwrap();
    assert_eq!(interp.repr(&p).unwrap(), "<class 'pkg.P'>");
}

#[test]
fn test_eq_without_hash_is_unhashable() {
    let interp = Interp::new();
    let err = exec_err(&interp, "C = type('C', (), {'__eq__': lambda s, o: True})\nx = {C()}\n");
    assert_eq!(err.to_string(), "TypeError: unhashable type: 'C'");
}

#[test]
fn test_raise_from_sets_cause() {
    let interp = Interp::new();
    let err = exec_err(&interp, "raise ValueError('outer') from KeyError('inner')\n");
    let exc = interp.exception_object(&err);
    let cause = interp.getattr(&exc, "__cause__").unwrap();
    assert_eq!(interp.exception_summary(&cause), "KeyError: 'inner'");
    let suppress = interp.getattr(&exc, "__suppress_context__").unwrap();
    assert_eq!(suppress.as_bool(), Some(true));
}

#[test]
fn test_traceback_frames_and_lines() {
    let interp = Interp::new();
    let globals = interp.dict();
    let err = interp
        .exec_source("a = 1\nb = a.nope\n", "mod.py", &globals)
        .unwrap_err();
    let frames = traceback(&interp.exception_object(&err));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].filename, "mod.py");
    assert_eq!(frames[0].lineno, 2);
    assert_eq!(frames[0].line.as_deref(), Some("b = a.nope"));
}

#[test]
fn test_syntax_error_location() {
    let interp = Interp::new();
    let globals = interp.dict();
    let err = interp
        .exec_source("x = 1\ny = (1 +\n", "bad.py", &globals)
        .unwrap_err();
    let ScriptError::SyntaxError(info) = &err else {
        panic!("expected a syntax error, got {}", err);
    };
    assert_eq!(info.filename, "bad.py");
    let exc = interp.exception_object(&err);
    let args = interp.getattr(&exc, "args").unwrap();
    assert_eq!(interp.len(&args).unwrap(), 2);
}

#[test]
fn test_recursion_limit() {
    let interp = Interp::with_config(ScriptConfig::new().recursion_limit(40));
    let err = exec_err(&interp, "f = lambda n: f(n + 1)\nf(0)\n");
    assert!(err.to_string().starts_with("RecursionError"));
}

#[test]
fn test_warnings_module_uses_current_line() {
    let interp = Interp::new();
    let seen: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink_seen = seen.clone();
    interp.set_warning_sink(Some(Rc::new(move |_: &Interp, record: &WarningRecord| {
        sink_seen.borrow_mut().push(record.format());
    })));
    let globals = interp.dict();
    interp
        .exec_source("import warnings\nwarnings.warn('old api', DeprecationWarning)\n", "w.py", &globals)
        .unwrap();
    assert_eq!(
        seen.borrow().as_slice(),
        ["w.py:2: DeprecationWarning: old api\n  warnings.warn('old api', DeprecationWarning)\n"]
    );
}

#[test]
fn test_rust_generator_drives_list() {
    let interp = Interp::new();
    let mut n = 0;
    let generator = interp.generator(
        "countdown",
        Box::new(move |interp: &Interp| {
            n += 1;
            Ok(if n <= 3 { Some(interp.int(n)) } else { None })
        }),
    );
    let globals = interp.dict();
    interp.dict_set_str(&globals, "g", generator);
    let values = interp.eval_expr("list(g)", &globals).unwrap();
    assert_eq!(interp.repr(&values).unwrap(), "[1, 2, 3]");
}

#[test]
fn test_import_file_registers_module() {
    let interp = Interp::new();
    let path = std::env::temp_dir().join(format!("otter_script_import_{}.py", std::process::id()));
    std::fs::write(&path, "answer = 6 * 7\n").unwrap();
    let module = interp.import_file(&path, "answers").unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(interp.getattr(&module, "answer").unwrap().as_int(), Some(42));
    let globals = interp.dict();
    interp
        .exec_source("from answers import answer as a\n", "<test>", &globals)
        .unwrap();
    assert_eq!(interp.dict_get_str(&globals, "a").and_then(|a| a.as_int()), Some(42));
}

struct Point {
    x: i64,
}

impl NativeObject for Point {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn getattr(&self, interp: &Interp, _this: &Obj, name: &str) -> Option<otter_script::ScriptResult<Obj>> {
        match name {
            "x" => Some(Ok(interp.int(self.x))),
            _ => None,
        }
    }
}

#[test]
fn test_native_object_attributes() {
    let interp = Interp::new();
    let class = interp.native_class("Point", "geo", TypeFeatures::default());
    let point = interp.new_native(&class, Point { x: 7 });
    assert_eq!(interp.getattr(&point, "x").unwrap().as_int(), Some(7));
    assert!(interp.getattr(&point, "y").is_err());
    assert_eq!(point.native_data::<Point>().map(|p| p.x), Some(7));
    assert_eq!(interp.type_name(&point), "Point");
}
