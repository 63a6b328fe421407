//! Shared bridge state
//!
//! One [`BridgeState`] exists per bridged runtime pair. Proxies on both
//! sides hold a `Weak` reference to it so that dropping the bridge never
//! depends on either heap letting go of its proxies first.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use otter_host::{Context, ContextGuard};
use otter_script::{GilGuard, Interp, Obj, ScriptResult};
use rustc_hash::FxBuildHasher;

use crate::cache::{HostProxyCache, ScriptProxyCache, WrapperTypeRegistry};
use crate::config::BridgeConfig;
use crate::host_proxy::HostClasses;
use crate::report::{ErrorClasses, ReportSink};
use crate::script_proxy::ScriptClasses;

/// Locks held while servicing a call that arrived from the script side.
pub(crate) struct ScriptEntry<'a> {
    _cx: ContextGuard<'a>,
    _gil: GilGuard<'a>,
}

/// Locks held while servicing a call that arrived from the host side.
pub(crate) struct HostEntry<'a> {
    _gil: GilGuard<'a>,
    _cx: ContextGuard<'a>,
}

pub(crate) struct BridgeState {
    pub(crate) this: Weak<BridgeState>,
    pub(crate) cx: Rc<Context>,
    pub(crate) interp: Rc<Interp>,
    pub(crate) config: BridgeConfig,
    /// Script module exposing the bridge classes
    pub(crate) module: Obj,
    pub(crate) script_classes: ScriptClasses,
    pub(crate) errors: ErrorClasses,
    pub(crate) host_classes: HostClasses,
    pub(crate) script_proxies: ScriptProxyCache,
    pub(crate) host_proxies: HostProxyCache,
    pub(crate) wrapper_types: WrapperTypeRegistry,
    /// Component modules by canonical path
    pub(crate) modules: RefCell<IndexMap<PathBuf, Obj, FxBuildHasher>>,
    pub(crate) sink: RefCell<Option<Rc<dyn ReportSink>>>,
    pub(crate) finalized: Cell<bool>,
}

impl BridgeState {
    pub(crate) fn new(cx: Rc<Context>, interp: Rc<Interp>, config: BridgeConfig) -> ScriptResult<Rc<Self>> {
        let module = interp.new_module(&config.module_name);
        let script_classes = ScriptClasses::install(&interp, &module, &config.module_name);
        let errors = ErrorClasses::install(&interp, &module, &config.module_name)?;
        Ok(Rc::new_cyclic(|this| Self {
            this: this.clone(),
            host_classes: HostClasses::new(this),
            cx,
            interp,
            config,
            module,
            script_classes,
            errors,
            script_proxies: ScriptProxyCache::default(),
            host_proxies: HostProxyCache::default(),
            wrapper_types: WrapperTypeRegistry::default(),
            modules: RefCell::new(IndexMap::default()),
            sink: RefCell::new(None),
            finalized: Cell::new(false),
        }))
    }

    /// Interpreter lock first, then the host context.
    pub(crate) fn enter_from_script(&self) -> ScriptEntry<'_> {
        let gil = self.interp.gil();
        let cx = self.cx.enter();
        ScriptEntry { _cx: cx, _gil: gil }
    }

    /// Host context first, then the interpreter lock.
    pub(crate) fn enter_from_host(&self) -> HostEntry<'_> {
        let cx = self.cx.enter();
        let gil = self.interp.gil();
        HostEntry { _gil: gil, _cx: cx }
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized.get()
    }
}
