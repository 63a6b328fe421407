//! Bridge lifecycle and entry points
//!
//! [`Bridge`] owns the shared state for one host context paired with one
//! script interpreter. Everything an embedder does goes through here:
//! running script source against a host global, loading component modules,
//! marshalling values by hand and tearing the bridge down again.
//!
//! Entry points lock the host context before the interpreter. Failures that
//! leave an entry point are handed to the report sink before they are
//! returned.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use otter_host::{Context, ObjectRef, PropertySlot, Value};
use otter_script::{Interp, Obj, ScriptError, ScriptResult, WarningRecord};
use rustc_hash::FxHashSet;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::host_proxy::{HostProxy, HostShape};
use crate::report::ReportSink;
use crate::script_proxy::{ScriptProxy, ScriptShape};
use crate::state::BridgeState;

/// A live pairing of a host context and a script interpreter.
///
/// The bridge is single-threaded: both runtimes are `Rc`-shared and every
/// proxy holds only a weak reference back to the bridge state.
pub struct Bridge {
    state: Rc<BridgeState>,
}

impl Bridge {
    /// Pair `cx` with `interp`.
    ///
    /// Registers the bridge module under `config.module_name`, routes
    /// script warnings to the report sink and creates the root wrapper
    /// type. Fails with [`BridgeError::AlreadyInitialized`] when the
    /// interpreter already has a module of that name.
    pub fn initialize(cx: Rc<Context>, interp: Rc<Interp>, config: BridgeConfig) -> BridgeResult<Self> {
        if interp.module(&config.module_name).is_some() {
            return Err(BridgeError::AlreadyInitialized);
        }
        let state = {
            let _cx = cx.enter();
            let _gil = interp.gil();
            BridgeState::new(cx.clone(), interp.clone(), config)?
        };
        {
            let _entry = state.enter_from_host();
            let interp = &*state.interp;
            interp.add_module(&state.config.module_name, state.module.clone());
            interp.module_or_new(&interp.config().main_module);

            if let Some(namespace) = interp.module_dict(&state.module) {
                let weak = Rc::downgrade(&state);
                let collect = interp.function("__collect__", move |interp, _, _| {
                    if let Some(state) = weak.upgrade() {
                        state.collect();
                    }
                    Ok(interp.none())
                });
                interp.dict_set_str(&namespace, "__collect__", collect);
            }

            let weak = Rc::downgrade(&state);
            interp.set_warning_sink(Some(Rc::new(move |_: &Interp, record: &WarningRecord| {
                if let Some(state) = weak.upgrade() {
                    state.report_warning(record);
                }
            })));

            state.proto_base()?;
        }
        tracing::debug!(module = %state.config.module_name, "bridge initialized");
        Ok(Self { state })
    }

    /// Tear the bridge down.
    ///
    /// Every cached proxy is released: script proxies drop their host
    /// roots and host proxies drop their script objects. Proxies still
    /// referenced afterwards raise on use. A second call fails with
    /// [`BridgeError::NotInitialized`].
    pub fn finalize(&self) -> BridgeResult<()> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        state.finalized.set(true);

        let script_proxies = state.script_proxies.drain();
        for proxy in &script_proxies {
            if let Some(proxy) = proxy.native_data::<ScriptProxy>() {
                proxy.release();
            }
        }
        let host_proxies = state.host_proxies.drain();
        for (_, proxy) in &host_proxies {
            if let Some(proxy) = state.cx.native_data_as::<HostProxy>(*proxy) {
                proxy.release();
            }
        }
        let wrapper_types = state.wrapper_types.drain();
        for (_, root) in &wrapper_types {
            if let Some(proxy) = root.object().and_then(|o| state.cx.native_data_as::<HostProxy>(o)) {
                proxy.release();
            }
        }
        drop(wrapper_types);
        state.wrapper_types.set_root(None);
        state.modules.borrow_mut().clear();

        state.interp.remove_module(&state.config.module_name);
        state.interp.set_warning_sink(None);
        state.sink.borrow_mut().take();
        let report = state.cx.gc();
        tracing::debug!(
            script_proxies = script_proxies.len(),
            host_proxies = host_proxies.len(),
            freed = report.freed,
            "bridge finalized"
        );
        Ok(())
    }

    /// Whether [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.state.is_finalized()
    }

    /// The host context.
    pub fn context(&self) -> &Rc<Context> {
        &self.state.cx
    }

    /// The script interpreter.
    pub fn interp(&self) -> &Rc<Interp> {
        &self.state.interp
    }

    /// The configuration the bridge was created with.
    pub fn config(&self) -> &BridgeConfig {
        &self.state.config
    }

    /// The bridge module registered with the interpreter.
    pub fn module(&self) -> &Obj {
        &self.state.module
    }

    /// Replace the receiver of error and warning reports.
    pub fn set_report_sink(&self, sink: Rc<dyn ReportSink>) {
        *self.state.sink.borrow_mut() = Some(sink);
    }

    /// Convert a script value for use by host code.
    pub fn to_host(&self, obj: &Obj) -> ScriptResult<Value> {
        let state = self.live().map_err(|_| finalized())?;
        let _entry = state.enter_from_host();
        state.to_host(obj)
    }

    /// Convert a host value for use by script code.
    pub fn to_script(&self, value: &Value) -> ScriptResult<Obj> {
        let state = self.live().map_err(|_| finalized())?;
        let _entry = state.enter_from_host();
        state.to_script(value)
    }

    /// The shape of a script proxy, `None` for ordinary script objects.
    pub fn script_shape(&self, obj: &Obj) -> Option<ScriptShape> {
        obj.native_data::<ScriptProxy>().map(|proxy| proxy.shape())
    }

    /// The shape of a host proxy, `None` for ordinary host values.
    pub fn host_shape(&self, value: &Value) -> Option<HostShape> {
        let o = value.as_object()?;
        self.state.cx.native_data_as::<HostProxy>(o).map(|proxy| proxy.shape())
    }

    /// Number of cached script proxies.
    pub fn script_proxy_count(&self) -> usize {
        self.state.script_proxies.len()
    }

    /// Number of cached host proxies.
    pub fn host_proxy_count(&self) -> usize {
        self.state.host_proxies.len()
    }

    /// Number of wrapper types, the root included.
    pub fn wrapper_type_count(&self) -> usize {
        self.state.wrapper_types.len()
    }

    /// Script proxy of the host global object.
    pub fn global_object(&self) -> BridgeResult<Obj> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        Ok(state.script_proxy_for(state.cx.global())?)
    }

    /// Host error object for a script exception, with its cause chain.
    pub fn wrap_error(&self, exception: &Obj) -> BridgeResult<Value> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        Ok(Value::Object(state.wrap_error_for_host(exception)))
    }

    /// Host object describing a script warning.
    pub fn wrap_warning(&self, record: &WarningRecord) -> BridgeResult<Value> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        Ok(Value::Object(state.wrap_warning_for_host(record)))
    }

    /// Traceback text for a script exception, as shown in reports.
    pub fn format_exception(&self, exception: &Obj) -> String {
        let _entry = self.state.enter_from_host();
        self.state.format_report(exception)
    }

    /// Issue a `JSWarning` into the script runtime on behalf of host code.
    pub fn warn_from_host(&self, message: &str) -> BridgeResult<()> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        Ok(state.interp.warn(message, &state.errors.js_warning)?)
    }

    /// Hand an error to the report sink.
    pub fn report(&self, err: &BridgeError) {
        self.state.report_error(err);
    }

    /// Run script `source` against the host object `target`.
    ///
    /// Every run shares the interpreter's main module namespace, where
    /// `target` is bound as the global named by `config.window_name`.
    /// After the source runs, every name listed in the export list
    /// (`__js__` by default) is copied onto `target`. The list is deleted
    /// whether or not the run succeeds.
    pub fn execute(&self, target: ObjectRef, source: &str, location: &str) -> BridgeResult<()> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        let result = self.run(state, target, source, location);
        if let Err(err) = &result {
            state.report_error(err);
        }
        result
    }

    fn run(&self, state: &BridgeState, target: ObjectRef, source: &str, location: &str) -> BridgeResult<()> {
        let interp = &*state.interp;
        let config = &state.config;
        let main = interp.module_or_new(&interp.config().main_module);
        let globals = interp
            .module_dict(&main)
            .ok_or_else(|| ScriptError::runtime_error("main module has no namespace"))?;
        interp.dict_set_str(&globals, &config.window_name, state.to_script(&Value::Object(target))?);

        tracing::debug!(location, "execute");
        let result = interp
            .exec_source(source, location, &globals)
            .map_err(BridgeError::from)
            .and_then(|()| self.export(state, target, &globals));
        // The export list never outlives the run that declared it
        interp.dict_del_str(&globals, &config.export_list_name);
        result
    }

    fn export(&self, state: &BridgeState, target: ObjectRef, globals: &Obj) -> BridgeResult<()> {
        let interp = &*state.interp;
        let list_name = &state.config.export_list_name;
        let Some(exports) = interp.dict_get_str(globals, list_name) else {
            return Ok(());
        };
        let Some(names) = exports.as_list().map(|items| items.borrow().clone()) else {
            return Err(ScriptError::type_error(format!("{} must be a list", list_name)).into());
        };
        for name in &names {
            let Some(name) = name.as_str() else {
                return Err(ScriptError::type_error(format!("{}'s items must be strings", list_name)).into());
            };
            let Some(value) = interp.dict_get_str(globals, name) else {
                return Err(ScriptError::name_error(format!("global name '{}' is not defined", name)).into());
            };
            let value = state.to_host(&value)?;
            state.cx.set(target, name, value)?;
        }
        tracing::trace!(exported = names.len(), "exports copied");
        Ok(())
    }

    /// Remove host-proxy-valued properties from everything reachable from
    /// `target`, returning how many were removed.
    ///
    /// Breaks the cycles a script leaves behind when it stores script
    /// objects on host objects that outlive it. Runs a host collection
    /// afterwards when `config.cleanup_runs_gc` is set.
    pub fn cleanup(&self, target: ObjectRef) -> BridgeResult<usize> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        let cx = &*state.cx;

        let mut removed = 0;
        let mut visited = FxHashSet::default();
        let mut pending = vec![target];
        while let Some(o) = pending.pop() {
            if !visited.insert(o) || !cx.is_alive(o) {
                continue;
            }
            for key in cx.own_keys(o)? {
                let Some(PropertySlot::Data { value: Value::Object(child), attributes }) =
                    cx.get_own_property(o, &key)?
                else {
                    continue;
                };
                if cx.native_data_as::<HostProxy>(child).is_some() {
                    if cx.delete(o, key.clone())? {
                        removed += 1;
                    } else if attributes.writable {
                        // Non-configurable slots are overwritten instead
                        cx.set(o, key, Value::Undefined)?;
                        removed += 1;
                    }
                } else {
                    pending.push(child);
                }
            }
        }
        tracing::debug!(removed, visited = visited.len(), "cleanup");
        if state.config.cleanup_runs_gc {
            cx.gc();
        }
        Ok(removed)
    }

    /// Load the component module at `path` and return its factory.
    ///
    /// Modules are cached by canonical path. The module must define a
    /// callable named by `config.factory_name` (`NSGetFactory` by
    /// default); the host receives a proxy of it. Failures are reported
    /// and surface as [`BridgeError::ModuleLoad`].
    pub fn load_module(&self, path: &Path) -> BridgeResult<Value> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        match self.import_component(state, path) {
            Ok(factory) => Ok(factory),
            Err(err) => {
                let err = BridgeError::from(err);
                state.report_error(&err);
                Err(BridgeError::module_load(path.display().to_string(), err.to_string()))
            }
        }
    }

    fn import_component(&self, state: &BridgeState, path: &Path) -> ScriptResult<Value> {
        let interp = &*state.interp;
        if in_zip_archive(path) {
            return Err(ScriptError::import_error("Cannot import module from zip"));
        }
        let canonical = std::fs::canonicalize(path)
            .map_err(|e| ScriptError::import_error(format!("No module at {}: {}", path.display(), e)))?;

        let cached = state.modules.borrow().get(&canonical).cloned();
        let module = match cached {
            Some(module) => module,
            None => {
                let module = interp.import_file(&canonical, &module_name(&canonical))?;
                state.modules.borrow_mut().insert(canonical.clone(), module.clone());
                tracing::debug!(path = %canonical.display(), "component module loaded");
                module
            }
        };

        let factory_name = &state.config.factory_name;
        let factory = interp.getattr(&module, factory_name)?;
        if !interp.is_callable(&factory) {
            return Err(ScriptError::type_error(format!("{} must be callable", factory_name)));
        }
        state.to_host(&factory)
    }

    /// Run both collectors, script first and last.
    pub fn collect(&self) -> BridgeResult<()> {
        let state = self.live()?;
        let _entry = state.enter_from_host();
        state.collect();
        Ok(())
    }

    fn live(&self) -> BridgeResult<&BridgeState> {
        if self.state.is_finalized() {
            return Err(BridgeError::NotInitialized);
        }
        Ok(&self.state)
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("module", &self.state.config.module_name)
            .field("script_proxies", &self.state.script_proxies.len())
            .field("host_proxies", &self.state.host_proxies.len())
            .field("finalized", &self.state.is_finalized())
            .finish()
    }
}

impl BridgeState {
    /// Script collection, host collection, then script collection again so
    /// proxies freed by the host pass are reclaimed.
    pub(crate) fn collect(&self) {
        let first = self.interp.collect();
        let report = self.cx.gc();
        let second = self.interp.collect();
        tracing::trace!(
            script = first + second,
            host_freed = report.freed,
            host_moved = report.moved,
            "collect"
        );
    }
}

fn finalized() -> ScriptError {
    ScriptError::runtime_error("bridge has been finalized")
}

/// Whether any component of `path` is a zip archive.
fn in_zip_archive(path: &Path) -> bool {
    path.ancestors().any(|p| {
        p.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    })
}

/// Module name for a component file: its stem, made unique per path.
fn module_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "component".to_string());
    let parent: PathBuf = path.parent().map(Path::to_path_buf).unwrap_or_default();
    format!("{}@{}", stem, parent.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> Bridge {
        Bridge::initialize(Context::new(), Interp::new(), BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_initialize_twice_fails() {
        let cx = Context::new();
        let interp = Interp::new();
        let _bridge = Bridge::initialize(cx.clone(), interp.clone(), BridgeConfig::default()).unwrap();
        let err = Bridge::initialize(cx, interp, BridgeConfig::default()).unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyInitialized));
    }

    #[test]
    fn test_finalize_is_one_shot() {
        let bridge = bridge();
        let module_name = bridge.config().module_name.clone();
        assert!(bridge.interp().module(&module_name).is_some());
        bridge.finalize().unwrap();
        assert!(bridge.is_finalized());
        assert!(bridge.interp().module(&module_name).is_none());
        assert!(matches!(bridge.finalize(), Err(BridgeError::NotInitialized)));
        assert!(bridge.to_script(&Value::Int32(1)).is_err());
    }

    #[test]
    fn test_zip_paths() {
        assert!(in_zip_archive(Path::new("/tmp/bundle.zip/component.py")));
        assert!(in_zip_archive(Path::new("/tmp/BUNDLE.ZIP")));
        assert!(!in_zip_archive(Path::new("/tmp/zipper/component.py")));
    }

    #[test]
    fn test_module_names_are_per_directory() {
        let a = module_name(Path::new("/a/comp.py"));
        let b = module_name(Path::new("/b/comp.py"));
        assert!(a.starts_with("comp@"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_collect_entry_point() {
        let bridge = bridge();
        let interp = bridge.interp();
        let module = interp.module(&bridge.config().module_name).unwrap();
        let collect = interp.getattr(&module, "__collect__").unwrap();
        assert!(interp.call(&collect, &[], &[]).unwrap().is_none());
        bridge.collect().unwrap();
    }
}
