//! Entry points: execution, exports, component modules, cleanup, reports

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use otter_bridge::{Bridge, BridgeConfig, BridgeError, ErrorReport, HostShape, ReportSink, WarningReport};
use otter_host::{Context, PropertyAttributes, Value};
use otter_script::Interp;
use serial_test::serial;

#[derive(Default)]
struct Capture {
    errors: RefCell<Vec<ErrorReport>>,
    warnings: RefCell<Vec<WarningReport>>,
}

impl ReportSink for Capture {
    fn error(&self, report: &ErrorReport) {
        self.errors.borrow_mut().push(report.clone());
    }

    fn warning(&self, report: &WarningReport) {
        self.warnings.borrow_mut().push(report.clone());
    }
}

fn bridge_with_capture() -> (Bridge, Rc<Capture>) {
    let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
    let capture = Rc::new(Capture::default());
    bridge.set_report_sink(capture.clone());
    (bridge, capture)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("otter_bridge=trace"))
        .with_test_writer()
        .try_init();
}

#[test]
fn test_execute_exports_names() {
    let (bridge, capture) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.new_object();
    cx.set(window, "base", Value::Int32(40)).unwrap();

    bridge
        .execute(
            window,
            "answer = window.base + 2\nname = 'otter'\nhidden = 1\n__js__ = ['answer', 'name']\n",
            "page.py",
        )
        .unwrap();

    assert!(cx.get(window, "answer").unwrap().strict_equals(&Value::Int32(42)));
    assert_eq!(cx.get(window, "name").unwrap().as_string().unwrap(), "otter");
    assert!(cx.get(window, "hidden").unwrap().is_undefined());
    assert!(cx.get(window, "__js__").unwrap().is_undefined());
    assert!(capture.errors.borrow().is_empty());
}

#[test]
fn test_execute_writes_through_window() {
    let (bridge, _) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.new_object();
    bridge
        .execute(window, "window.title = 'hello'\nwindow.count = len([1, 2, 3])\n", "page.py")
        .unwrap();
    assert_eq!(cx.get(window, "title").unwrap().as_string().unwrap(), "hello");
    assert!(cx.get(window, "count").unwrap().strict_equals(&Value::Int32(3)));
}

#[test]
fn test_export_list_errors() {
    let (bridge, capture) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.new_object();

    let err = bridge.execute(window, "__js__ = 'answer'\n", "a.py").unwrap_err();
    assert_eq!(err.to_string(), "TypeError: __js__ must be a list");

    let err = bridge.execute(window, "__js__ = [1]\n", "b.py").unwrap_err();
    assert_eq!(err.to_string(), "TypeError: __js__'s items must be strings");

    let err = bridge.execute(window, "__js__ = ['missing']\n", "c.py").unwrap_err();
    assert_eq!(err.to_string(), "NameError: global name 'missing' is not defined");

    let errors = capture.errors.borrow();
    assert_eq!(errors.len(), 3);
    assert_eq!(errors[2].name, "NameError");
}

#[test]
fn test_executions_share_the_main_namespace() {
    let (bridge, _) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.new_object();

    bridge.execute(window, "a = 1\n", "first.py").unwrap();
    bridge.execute(window, "b = a + 1\n__js__ = ['a', 'b']\n", "second.py").unwrap();
    assert!(cx.get(window, "a").unwrap().strict_equals(&Value::Int32(1)));
    assert!(cx.get(window, "b").unwrap().strict_equals(&Value::Int32(2)));

    let main = bridge.interp().module("__main__").expect("main module");
    let globals = bridge.interp().module_dict(&main).unwrap();
    assert!(bridge.interp().dict_get_str(&globals, "b").is_some());
    assert!(bridge.interp().dict_get_str(&globals, "__js__").is_none());
}

#[test]
fn test_failed_exports_drop_the_list() {
    let (bridge, _) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.new_object();
    let main = bridge.interp().module("__main__").expect("main module");
    let globals = bridge.interp().module_dict(&main).unwrap();

    let failing = [
        "__js__ = 'a'\n",
        "__js__ = [1]\n",
        "__js__ = ['missing']\n",
        "__js__ = []\nraise ValueError('x')\n",
    ];
    for source in failing {
        assert!(bridge.execute(window, source, "page.py").is_err());
        assert!(bridge.interp().dict_get_str(&globals, "__js__").is_none());
    }

    // A later script without an export list exports nothing
    bridge.execute(window, "missing = 1\n", "page.py").unwrap();
    assert!(cx.get(window, "missing").unwrap().is_undefined());
}

#[test]
fn test_uncaught_errors_are_reported_with_location() {
    let (bridge, capture) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.new_object();

    let err = bridge.execute(window, "x = 1\ny = x.nope\n", "page.py").unwrap_err();
    assert!(matches!(err, BridgeError::Script(_)));

    let errors = capture.errors.borrow();
    assert_eq!(errors.len(), 1);
    let report = &errors[0];
    assert_eq!(report.name, "AttributeError");
    assert_eq!(report.file_name.as_deref(), Some("page.py"));
    assert_eq!(report.line_number, Some(2));
    assert_eq!(report.source_line.as_deref(), Some("y = x.nope"));
    assert!(report.text.contains("File \"page.py\", line 2"));
    assert!(report.text.trim_end().ends_with(&format!("AttributeError: {}", report.message)));

    let object = report.object.as_object().expect("error object");
    let (name, _) = cx.error_name_and_message(object);
    assert_eq!(name, "AttributeError");
    assert!(cx.get(object, "stack").unwrap().as_string().is_some());
}

#[test]
fn test_script_warnings_reach_the_sink() {
    let (bridge, capture) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.new_object();

    bridge
        .execute(
            window,
            "import warnings\nwarnings.warn('old api', DeprecationWarning)\n",
            "w.py",
        )
        .unwrap();
    bridge.warn_from_host("careful").unwrap();

    let warnings = capture.warnings.borrow();
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].category, "DeprecationWarning");
    assert_eq!(warnings[0].file_name, "w.py");
    assert_eq!(warnings[0].line_number, 2);
    assert_eq!(
        warnings[0].text,
        "w.py:2: DeprecationWarning: old api\n  warnings.warn('old api', DeprecationWarning)\n"
    );
    let object = warnings[0].object.as_object().expect("warning object");
    assert_eq!(cx.get(object, "message").unwrap().as_string().unwrap(), "old api");

    assert_eq!(warnings[1].category, "otter.JSWarning");
    assert_eq!(warnings[1].message, "careful");
    assert!(capture.errors.borrow().is_empty());
}

#[test]
fn test_load_module_returns_factory() {
    let (bridge, capture) = bridge_with_capture();
    let cx = bridge.context();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("component.py");
    fs::write(&path, "NSGetFactory = lambda: 42\n").unwrap();

    let factory = bridge.load_module(&path).unwrap();
    assert_eq!(bridge.host_shape(&factory), Some(HostShape::Callable));
    assert!(cx.call(&factory, &Value::Undefined, &[]).unwrap().strict_equals(&Value::Int32(42)));

    // The module is cached, so the factory is the same object
    fs::write(&path, "NSGetFactory = lambda: 7\n").unwrap();
    let again = bridge.load_module(&path).unwrap();
    assert!(again.strict_equals(&factory));
    assert!(capture.errors.borrow().is_empty());
}

#[test]
fn test_load_module_failures() {
    let (bridge, capture) = bridge_with_capture();
    let dir = tempfile::tempdir().unwrap();

    let not_callable = dir.path().join("not_callable.py");
    fs::write(&not_callable, "NSGetFactory = 3\n").unwrap();
    let err = bridge.load_module(&not_callable).unwrap_err();
    assert!(matches!(err, BridgeError::ModuleLoad { .. }));
    assert!(err.to_string().contains("NSGetFactory must be callable"));

    let missing = dir.path().join("missing.py");
    let err = bridge.load_module(&missing).unwrap_err();
    assert!(err.to_string().contains("ImportError"));

    let zipped = dir.path().join("bundle.zip").join("component.py");
    let err = bridge.load_module(&zipped).unwrap_err();
    assert!(err.to_string().contains("Cannot import module from zip"));

    let broken = dir.path().join("broken.py");
    fs::write(&broken, "x = (1 +\n").unwrap();
    let err = bridge.load_module(&broken).unwrap_err();
    assert!(err.to_string().contains("SyntaxError"));

    let errors = capture.errors.borrow();
    assert_eq!(errors.len(), 4);
    assert_eq!(errors[3].name, "SyntaxError");
    let expected = fs::canonicalize(&broken).unwrap();
    assert_eq!(errors[3].file_name.as_deref(), expected.to_str());
}

#[test]
fn test_cleanup_removes_proxies() {
    let (bridge, _) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.global();
    let child = cx.new_object();
    cx.set(window, "child", Value::Object(child)).unwrap();
    cx.set(child, "back", Value::Object(window)).unwrap();

    bridge
        .execute(
            window,
            "window.items = [1, 2]\nwindow.child.data = {'a': 1}\nwindow.count = 3\n",
            "page.py",
        )
        .unwrap();
    assert_eq!(bridge.host_shape(&cx.get(window, "items").unwrap()), Some(HostShape::Sequence));
    assert_eq!(bridge.host_proxy_count(), 2);

    let removed = bridge.cleanup(window).unwrap();
    assert_eq!(removed, 2);

    // The collection may have moved the global
    let window = cx.global();
    let child = cx.get(window, "child").unwrap().as_object().unwrap();
    assert!(cx.get(window, "items").unwrap().is_undefined());
    assert!(cx.get(child, "data").unwrap().is_undefined());
    assert!(cx.get(window, "count").unwrap().strict_equals(&Value::Int32(3)));
    assert_eq!(bridge.host_proxy_count(), 0);
}

#[test]
fn test_cleanup_overwrites_fixed_slots() {
    let (bridge, _) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.global();
    let pinned = PropertyAttributes {
        writable: true,
        enumerable: true,
        configurable: false,
    };
    let list = bridge.interp().list(vec![bridge.interp().int(1)]);
    let proxy = bridge.to_host(&list).unwrap();
    cx.define_property(window, "pinned", proxy, pinned);
    let frozen = bridge.to_host(&bridge.interp().list(vec![])).unwrap();
    cx.define_property(window, "frozen", frozen, PropertyAttributes::FROZEN);

    let removed = bridge.cleanup(window).unwrap();
    assert_eq!(removed, 1);

    let window = cx.global();
    assert!(cx.get(window, "pinned").unwrap().is_undefined());
    assert_eq!(bridge.host_shape(&cx.get(window, "frozen").unwrap()), Some(HostShape::Sequence));
    assert_eq!(bridge.host_proxy_count(), 1);
}

#[test]
fn test_finalize_releases_proxies() {
    let (bridge, _) = bridge_with_capture();
    let cx = bridge.context();
    let interp = bridge.interp().clone();

    let host = bridge.to_script(&Value::Object(cx.new_object())).unwrap();
    let list = interp.list(vec![interp.int(1)]);
    let proxy = bridge.to_host(&list).unwrap();
    let rooted = cx.root(proxy);

    bridge.finalize().unwrap();
    assert_eq!(bridge.script_proxy_count(), 0);
    assert_eq!(bridge.host_proxy_count(), 0);
    assert_eq!(bridge.wrapper_type_count(), 0);

    let err = interp.getattr(&host, "anything").unwrap_err();
    assert!(err.to_string().contains("released"));
    assert!(cx.get(rooted.get().as_object().unwrap(), 0u32).is_err());

    let window = cx.new_object();
    assert!(matches!(bridge.execute(window, "x = 1\n", "a.py"), Err(BridgeError::NotInitialized)));
    assert!(matches!(bridge.finalize(), Err(BridgeError::NotInitialized)));

    // The interpreter can carry a fresh bridge afterwards
    let fresh = Bridge::initialize(cx.clone(), interp, BridgeConfig::default()).unwrap();
    assert!(fresh.to_host(&list).is_ok());
}

#[test]
fn test_bridge_module_is_importable() {
    let (bridge, _) = bridge_with_capture();
    let cx = bridge.context();
    let window = cx.new_object();
    bridge
        .execute(
            window,
            "import otter\nkinds = [repr(otter.JSError), repr(otter.XPCOMError)]\notter.__collect__()\n__js__ = ['kinds']\n",
            "m.py",
        )
        .unwrap();
    let kinds = cx.get(window, "kinds").unwrap();
    assert_eq!(bridge.host_shape(&kinds), Some(HostShape::Sequence));
    let first = cx.get(kinds.as_object().unwrap(), 0u32).unwrap();
    assert_eq!(first.as_string().unwrap(), "<class 'otter.JSError'>");
}

#[test]
#[serial]
fn test_default_sink_logs() {
    init_tracing();
    let bridge = Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap();
    let cx = bridge.context();
    let window = cx.new_object();
    assert!(bridge.execute(window, "raise ValueError('logged')\n", "log.py").is_err());
    bridge.warn_from_host("logged too").unwrap();
}

#[test]
#[serial]
fn test_custom_module_name() {
    init_tracing();
    let config = BridgeConfig::new().module_name("bridge").window_name("page").export_list_name("exports");
    let bridge = Bridge::initialize(Context::new(), Interp::new(), config).unwrap();
    assert!(bridge.interp().module("bridge").is_some());
    assert!(bridge.interp().module("otter").is_none());

    let cx = bridge.context();
    let window = cx.new_object();
    cx.set(window, "n", Value::Int32(2)).unwrap();
    bridge.execute(window, "twice = page.n * 2\nexports = ['twice']\n", "c.py").unwrap();
    assert!(cx.get(window, "twice").unwrap().strict_equals(&Value::Int32(4)));
}
