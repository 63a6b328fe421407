//! Interpreter state
//!
//! An [`Interp`] owns the builtin types, the module registry, the line
//! cache, the warning sink and the global interpreter lock. Object
//! operations live in the protocol modules as further `impl Interp` blocks.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use rustc_hash::FxBuildHasher;

use crate::builtins;
use crate::config::ScriptConfig;
use crate::error::{ScriptError, ScriptResult};
use crate::linecache::LineCache;
use crate::native::{NativeObject, TypeFeatures};
use crate::object::{
    AttrMap, BuiltinFn, BuiltinKind, ClassData, DictMap, ExceptionData, FunctionData,
    FunctionKind, HashKey, IteratorData, IteratorKind, Kwargs, ModuleData, NativeCell, NextFn, Obj,
    Payload, SetMap,
};
use crate::warnings::WarningSink;

/// Held while script objects are touched; reentrant on the owning thread.
pub struct GilGuard<'a> {
    interp: &'a Interp,
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl Drop for GilGuard<'_> {
    fn drop(&mut self) {
        self.interp.gil_depth.set(self.interp.gil_depth.get() - 1);
    }
}

/// The builtin type objects.
pub struct BuiltinTypes {
    /// `object`
    pub object: Obj,
    /// `type`
    pub type_: Obj,
    /// `NoneType`
    pub none_type: Obj,
    /// `NotImplementedType`
    pub not_implemented_type: Obj,
    /// `bool`
    pub bool_: Obj,
    /// `int`
    pub int: Obj,
    /// `float`
    pub float: Obj,
    /// `str`
    pub str_: Obj,
    /// `bytes`
    pub bytes: Obj,
    /// `list`
    pub list: Obj,
    /// `tuple`
    pub tuple: Obj,
    /// `dict`
    pub dict: Obj,
    /// `set`
    pub set: Obj,
    /// `frozenset`
    pub frozenset: Obj,
    /// `slice`
    pub slice: Obj,
    /// `function`
    pub function: Obj,
    /// `builtin_function_or_method`
    pub builtin_function: Obj,
    /// `method`
    pub method: Obj,
    /// `iterator`
    pub iterator: Obj,
    /// `generator`
    pub generator: Obj,
    /// `module`
    pub module: Obj,

    /// `BaseException`
    pub base_exception: Obj,
    /// `Exception`
    pub exception: Obj,
    /// `AssertionError`
    pub assertion_error: Obj,
    /// `TypeError`
    pub type_error: Obj,
    /// `ValueError`
    pub value_error: Obj,
    /// `LookupError`
    pub lookup_error: Obj,
    /// `KeyError`
    pub key_error: Obj,
    /// `IndexError`
    pub index_error: Obj,
    /// `AttributeError`
    pub attribute_error: Obj,
    /// `NameError`
    pub name_error: Obj,
    /// `ArithmeticError`
    pub arithmetic_error: Obj,
    /// `OverflowError`
    pub overflow_error: Obj,
    /// `ZeroDivisionError`
    pub zero_division_error: Obj,
    /// `StopIteration`
    pub stop_iteration: Obj,
    /// `RuntimeError`
    pub runtime_error: Obj,
    /// `NotImplementedError`
    pub not_implemented_error: Obj,
    /// `RecursionError`
    pub recursion_error: Obj,
    /// `ImportError`
    pub import_error: Obj,
    /// `SyntaxError`
    pub syntax_error: Obj,
    /// `MemoryError`
    pub memory_error: Obj,

    /// `Warning`
    pub warning: Obj,
    /// `UserWarning`
    pub user_warning: Obj,
    /// `DeprecationWarning`
    pub deprecation_warning: Obj,
    /// `RuntimeWarning`
    pub runtime_warning: Obj,
}

fn builtin_class(name: &str, bases: Vec<Obj>, kind: BuiltinKind, ctor: Option<BuiltinFn>) -> Obj {
    Obj::new(Payload::Class(ClassData {
        name: name.to_string(),
        module: "builtins".to_string(),
        bases: RefCell::new(bases),
        dict: RefCell::new(AttrMap::default()),
        kind,
        features: TypeFeatures::default(),
        ctor,
    }))
}

impl BuiltinTypes {
    fn new() -> Self {
        let ctor = |f: fn(&Interp, &[Obj], &Kwargs) -> ScriptResult<Obj>| -> Option<BuiltinFn> {
            Some(Rc::new(f))
        };
        let object = builtin_class("object", vec![], BuiltinKind::Object, None);
        let sub = |name: &str, kind: BuiltinKind, c: Option<BuiltinFn>| {
            builtin_class(name, vec![object.clone()], kind, c)
        };
        let int = sub("int", BuiltinKind::Int, ctor(builtins::ctor_int));
        let bool_ = builtin_class("bool", vec![int.clone()], BuiltinKind::Bool, ctor(builtins::ctor_bool));

        let exc = |name: &str, base: &Obj| builtin_class(name, vec![base.clone()], BuiltinKind::Exception, None);
        let base_exception = sub("BaseException", BuiltinKind::Exception, None);
        let exception = exc("Exception", &base_exception);
        let lookup_error = exc("LookupError", &exception);
        let arithmetic_error = exc("ArithmeticError", &exception);
        let runtime_error = exc("RuntimeError", &exception);
        let warning = exc("Warning", &exception);

        Self {
            type_: sub("type", BuiltinKind::Type, ctor(builtins::ctor_type)),
            none_type: sub("NoneType", BuiltinKind::NoneType, None),
            not_implemented_type: sub("NotImplementedType", BuiltinKind::NotImplementedType, None),
            bool_,
            float: sub("float", BuiltinKind::Float, ctor(builtins::ctor_float)),
            str_: sub("str", BuiltinKind::Str, ctor(builtins::ctor_str)),
            bytes: sub("bytes", BuiltinKind::Bytes, ctor(builtins::ctor_bytes)),
            list: sub("list", BuiltinKind::List, ctor(builtins::ctor_list)),
            tuple: sub("tuple", BuiltinKind::Tuple, ctor(builtins::ctor_tuple)),
            dict: sub("dict", BuiltinKind::Dict, ctor(builtins::ctor_dict)),
            set: sub("set", BuiltinKind::Set, ctor(builtins::ctor_set)),
            frozenset: sub("frozenset", BuiltinKind::FrozenSet, ctor(builtins::ctor_frozenset)),
            slice: sub("slice", BuiltinKind::Slice, ctor(builtins::ctor_slice)),
            function: sub("function", BuiltinKind::Function, None),
            builtin_function: sub("builtin_function_or_method", BuiltinKind::Function, None),
            method: sub("method", BuiltinKind::Method, None),
            iterator: sub("iterator", BuiltinKind::Iterator, None),
            generator: sub("generator", BuiltinKind::Generator, None),
            module: sub("module", BuiltinKind::Module, None),

            assertion_error: exc("AssertionError", &exception),
            type_error: exc("TypeError", &exception),
            value_error: exc("ValueError", &exception),
            key_error: exc("KeyError", &lookup_error),
            index_error: exc("IndexError", &lookup_error),
            attribute_error: exc("AttributeError", &exception),
            name_error: exc("NameError", &exception),
            overflow_error: exc("OverflowError", &arithmetic_error),
            zero_division_error: exc("ZeroDivisionError", &arithmetic_error),
            stop_iteration: exc("StopIteration", &exception),
            not_implemented_error: exc("NotImplementedError", &runtime_error),
            recursion_error: exc("RecursionError", &runtime_error),
            import_error: exc("ImportError", &exception),
            syntax_error: exc("SyntaxError", &exception),
            memory_error: exc("MemoryError", &exception),
            user_warning: exc("UserWarning", &warning),
            deprecation_warning: exc("DeprecationWarning", &warning),
            runtime_warning: exc("RuntimeWarning", &warning),

            object,
            int,
            base_exception,
            exception,
            lookup_error,
            arithmetic_error,
            runtime_error,
            warning,
        }
    }

    /// Every builtin class, in a stable order.
    pub fn all(&self) -> Vec<&Obj> {
        vec![
            &self.object,
            &self.type_,
            &self.none_type,
            &self.not_implemented_type,
            &self.bool_,
            &self.int,
            &self.float,
            &self.str_,
            &self.bytes,
            &self.list,
            &self.tuple,
            &self.dict,
            &self.set,
            &self.frozenset,
            &self.slice,
            &self.function,
            &self.builtin_function,
            &self.method,
            &self.iterator,
            &self.generator,
            &self.module,
            &self.base_exception,
            &self.exception,
            &self.assertion_error,
            &self.type_error,
            &self.value_error,
            &self.lookup_error,
            &self.key_error,
            &self.index_error,
            &self.attribute_error,
            &self.name_error,
            &self.arithmetic_error,
            &self.overflow_error,
            &self.zero_division_error,
            &self.stop_iteration,
            &self.runtime_error,
            &self.not_implemented_error,
            &self.recursion_error,
            &self.import_error,
            &self.syntax_error,
            &self.memory_error,
            &self.warning,
            &self.user_warning,
            &self.deprecation_warning,
            &self.runtime_warning,
        ]
    }

    /// Builtin exception class by name.
    pub fn exception_class(&self, name: &str) -> Option<&Obj> {
        self.all().into_iter().find(|c| {
            c.as_class()
                .is_some_and(|class| class.kind == BuiltinKind::Exception && class.name == name)
        })
    }
}

/// A frame currently executing, used for warning locations.
struct ActiveFrame {
    filename: String,
    lineno: Cell<usize>,
}

/// Pops the active frame when dropped.
pub struct FrameGuard<'a> {
    interp: &'a Interp,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.interp.frames.borrow_mut().pop();
    }
}

/// Decrements the call depth when dropped.
pub struct CallGuard<'a> {
    interp: &'a Interp,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.interp.call_depth.set(self.interp.call_depth.get() - 1);
    }
}

/// The script runtime.
pub struct Interp {
    types: BuiltinTypes,
    none: Obj,
    true_: Obj,
    false_: Obj,
    not_implemented: Obj,
    builtins: Obj,
    modules: RefCell<IndexMap<String, Obj, FxBuildHasher>>,
    pub(crate) linecache: LineCache,
    pub(crate) warning_sink: RefCell<Option<WarningSink>>,
    frames: RefCell<Vec<ActiveFrame>>,
    call_depth: Cell<usize>,
    pub(crate) repr_stack: RefCell<Vec<usize>>,
    gil: ReentrantMutex<()>,
    gil_depth: Cell<usize>,
    config: ScriptConfig,
    _not_send: PhantomData<*mut ()>,
}

impl Interp {
    /// Create an interpreter with default settings.
    pub fn new() -> Rc<Self> {
        Self::with_config(ScriptConfig::default())
    }

    /// Create an interpreter with custom settings.
    pub fn with_config(config: ScriptConfig) -> Rc<Self> {
        let builtins = Obj::new(Payload::Module(ModuleData {
            name: "builtins".to_string(),
            dict: Obj::new(Payload::Dict(RefCell::new(DictMap::default()))),
        }));
        let interp = Rc::new(Self {
            types: BuiltinTypes::new(),
            none: Obj::new(Payload::None),
            true_: Obj::new(Payload::Bool(true)),
            false_: Obj::new(Payload::Bool(false)),
            not_implemented: Obj::new(Payload::NotImplemented),
            builtins,
            modules: RefCell::new(IndexMap::default()),
            linecache: LineCache::default(),
            warning_sink: RefCell::new(None),
            frames: RefCell::new(Vec::new()),
            call_depth: Cell::new(0),
            repr_stack: RefCell::new(Vec::new()),
            gil: ReentrantMutex::new(()),
            gil_depth: Cell::new(0),
            config,
            _not_send: PhantomData,
        });
        builtins::install(&interp);
        interp
            .modules
            .borrow_mut()
            .insert("builtins".to_string(), interp.builtins.clone());
        interp
    }

    /// Configuration
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Builtin type objects
    pub fn types(&self) -> &BuiltinTypes {
        &self.types
    }

    // ---------------------------------------------------------------
    // Global interpreter lock
    // ---------------------------------------------------------------

    /// Acquire the interpreter lock. Reentrant.
    pub fn gil(&self) -> GilGuard<'_> {
        let guard = self.gil.lock();
        self.gil_depth.set(self.gil_depth.get() + 1);
        GilGuard {
            interp: self,
            _guard: guard,
        }
    }

    /// Whether the current thread holds the interpreter lock.
    pub fn gil_held(&self) -> bool {
        self.gil_depth.get() > 0
    }

    // ---------------------------------------------------------------
    // Frames and recursion
    // ---------------------------------------------------------------

    /// Mark a frame as executing until the guard drops.
    pub fn push_frame(&self, filename: &str) -> FrameGuard<'_> {
        self.frames.borrow_mut().push(ActiveFrame {
            filename: filename.to_string(),
            lineno: Cell::new(0),
        });
        FrameGuard { interp: self }
    }

    /// Update the line of the innermost executing frame.
    pub fn set_line(&self, lineno: usize) {
        if let Some(frame) = self.frames.borrow().last() {
            frame.lineno.set(lineno);
        }
    }

    /// `(filename, line)` of the innermost executing frame.
    pub fn current_location(&self) -> Option<(String, usize)> {
        self.frames
            .borrow()
            .last()
            .map(|f| (f.filename.clone(), f.lineno.get()))
    }

    /// Count one nested call against the recursion limit.
    pub fn enter_call(&self) -> ScriptResult<CallGuard<'_>> {
        let depth = self.call_depth.get();
        if depth >= self.config.recursion_limit {
            return Err(ScriptError::RecursionError(
                "maximum recursion depth exceeded".to_string(),
            ));
        }
        self.call_depth.set(depth + 1);
        Ok(CallGuard { interp: self })
    }

    // ---------------------------------------------------------------
    // Constructors
    // ---------------------------------------------------------------

    /// `None`
    pub fn none(&self) -> Obj {
        self.none.clone()
    }

    /// `NotImplemented`
    pub fn not_implemented(&self) -> Obj {
        self.not_implemented.clone()
    }

    /// `True` / `False`
    pub fn bool(&self, b: bool) -> Obj {
        if b { self.true_.clone() } else { self.false_.clone() }
    }

    /// `int`
    pub fn int(&self, i: i64) -> Obj {
        Obj::new(Payload::Int(i))
    }

    /// `int` from a big integer, narrowed to a machine word when it fits.
    pub fn long(&self, i: BigInt) -> Obj {
        match i.to_i64() {
            Some(small) => self.int(small),
            None => Obj::new(Payload::Long(i)),
        }
    }

    /// `float`
    pub fn float(&self, f: f64) -> Obj {
        Obj::new(Payload::Float(f))
    }

    /// `str`
    pub fn str(&self, s: impl Into<String>) -> Obj {
        Obj::new(Payload::Str(s.into()))
    }

    /// `bytes`
    pub fn bytes(&self, b: Vec<u8>) -> Obj {
        Obj::new(Payload::Bytes(b))
    }

    /// `list`
    pub fn list(&self, items: Vec<Obj>) -> Obj {
        Obj::new(Payload::List(RefCell::new(items)))
    }

    /// `tuple`
    pub fn tuple(&self, items: Vec<Obj>) -> Obj {
        Obj::new(Payload::Tuple(items))
    }

    /// Empty `dict`
    pub fn dict(&self) -> Obj {
        Obj::new(Payload::Dict(RefCell::new(DictMap::default())))
    }

    /// `dict` from key/value pairs; later keys win.
    pub fn dict_from(&self, pairs: Vec<(Obj, Obj)>) -> ScriptResult<Obj> {
        let mut map = DictMap::default();
        for (k, v) in pairs {
            let hk = self.hash_key(&k)?;
            match map.get_mut(&hk) {
                Some(slot) => slot.1 = v,
                None => {
                    map.insert(hk, (k, v));
                }
            }
        }
        Ok(Obj::new(Payload::Dict(RefCell::new(map))))
    }

    fn set_map(&self, items: Vec<Obj>) -> ScriptResult<SetMap> {
        let mut map = SetMap::default();
        for item in items {
            let hk = self.hash_key(&item)?;
            map.entry(hk).or_insert(item);
        }
        Ok(map)
    }

    /// `set`
    pub fn set(&self, items: Vec<Obj>) -> ScriptResult<Obj> {
        Ok(Obj::new(Payload::Set(RefCell::new(self.set_map(items)?))))
    }

    /// `frozenset`
    pub fn frozenset(&self, items: Vec<Obj>) -> ScriptResult<Obj> {
        Ok(Obj::new(Payload::FrozenSet(self.set_map(items)?)))
    }

    /// `slice(start, stop, step)`
    pub fn slice(&self, start: Obj, stop: Obj, step: Obj) -> Obj {
        Obj::new(Payload::Slice(start, stop, step))
    }

    /// Builtin function.
    pub fn function(
        &self,
        name: &str,
        call: impl Fn(&Interp, &[Obj], &Kwargs) -> ScriptResult<Obj> + 'static,
    ) -> Obj {
        Obj::new(Payload::Function(FunctionData {
            name: name.to_string(),
            module: None,
            kind: FunctionKind::Builtin,
            call: Rc::new(call),
        }))
    }

    pub(crate) fn lambda(&self, module: Option<String>, call: BuiltinFn) -> Obj {
        Obj::new(Payload::Function(FunctionData {
            name: "<lambda>".to_string(),
            module,
            kind: FunctionKind::Lambda,
            call,
        }))
    }

    /// Bound method.
    pub fn bound_method(&self, func: Obj, receiver: Obj) -> Obj {
        Obj::new(Payload::BoundMethod(func, receiver))
    }

    /// New class object. Bases must be classes; an empty list means
    /// `(object,)`.
    pub fn new_class(
        &self,
        name: &str,
        module: &str,
        bases: Vec<Obj>,
        dict: AttrMap,
    ) -> ScriptResult<Obj> {
        let bases = if bases.is_empty() {
            vec![self.types.object.clone()]
        } else {
            bases
        };
        let mut kind = BuiltinKind::Object;
        let mut features = TypeFeatures::default();
        for base in &bases {
            let Some(class) = base.as_class() else {
                return Err(ScriptError::type_error(format!(
                    "bases must be types, not '{}'",
                    self.type_name(base)
                )));
            };
            if kind == BuiltinKind::Object {
                kind = class.kind;
            }
            features.iternext |= class.features.iternext;
            features.mapping |= class.features.mapping;
            features.sequence |= class.features.sequence;
        }
        Ok(Obj::new(Payload::Class(ClassData {
            name: name.to_string(),
            module: module.to_string(),
            bases: RefCell::new(bases),
            dict: RefCell::new(dict),
            kind,
            features,
            ctor: None,
        })))
    }

    /// New native extension class deriving from `object`.
    pub fn native_class(&self, name: &str, module: &str, features: TypeFeatures) -> Obj {
        Obj::new(Payload::Class(ClassData {
            name: name.to_string(),
            module: module.to_string(),
            bases: RefCell::new(vec![self.types.object.clone()]),
            dict: RefCell::new(AttrMap::default()),
            kind: BuiltinKind::Native,
            features,
            ctor: None,
        }))
    }

    /// Add a method to a class dict.
    pub fn add_method(
        &self,
        class: &Obj,
        name: &str,
        call: impl Fn(&Interp, &[Obj], &Kwargs) -> ScriptResult<Obj> + 'static,
    ) {
        if let Some(data) = class.as_class() {
            let f = self.function(name, call);
            data.dict.borrow_mut().insert(name.to_string(), f);
        }
    }

    /// New native extension object.
    pub fn new_native(&self, class: &Obj, data: impl NativeObject) -> Obj {
        Obj::new(Payload::Native(NativeCell {
            class: class.clone(),
            data: Box::new(data),
        }))
    }

    /// Iterator driven by `next`.
    pub fn iterator(&self, name: &str, next: NextFn) -> Obj {
        Obj::new(Payload::Iterator(IteratorData {
            kind: IteratorKind::Iterator,
            name: name.to_string(),
            next: RefCell::new(Some(next)),
        }))
    }

    /// Generator driven by `next`.
    pub fn generator(&self, name: &str, next: NextFn) -> Obj {
        Obj::new(Payload::Iterator(IteratorData {
            kind: IteratorKind::Generator,
            name: name.to_string(),
            next: RefCell::new(Some(next)),
        }))
    }

    /// Exception instance of `class` with `args`.
    pub fn new_exception(&self, class: &Obj, args: Vec<Obj>) -> Obj {
        Obj::new(Payload::Exception(ExceptionData {
            class: class.clone(),
            args: RefCell::new(args),
            traceback: RefCell::new(Vec::new()),
            cause: RefCell::new(None),
            context: RefCell::new(None),
            suppress_context: Cell::new(false),
            dict: RefCell::new(AttrMap::default()),
        }))
    }

    // ---------------------------------------------------------------
    // Modules
    // ---------------------------------------------------------------

    /// The `builtins` module.
    pub fn builtins(&self) -> &Obj {
        &self.builtins
    }

    /// New module with `__name__` set; not registered.
    pub fn new_module(&self, name: &str) -> Obj {
        let dict = self.dict();
        if let Some(map) = dict.as_dict() {
            let key = self.str("__name__");
            map.borrow_mut()
                .insert(HashKey::Str("__name__".to_string()), (key, self.str(name)));
        }
        Obj::new(Payload::Module(ModuleData {
            name: name.to_string(),
            dict,
        }))
    }

    /// Globals dict of a module.
    pub fn module_dict(&self, module: &Obj) -> Option<Obj> {
        match module.payload() {
            Payload::Module(m) => Some(m.dict.clone()),
            _ => None,
        }
    }

    /// Register a module under `name`.
    pub fn add_module(&self, name: &str, module: Obj) {
        self.modules.borrow_mut().insert(name.to_string(), module);
    }

    /// Registered module by name.
    pub fn module(&self, name: &str) -> Option<Obj> {
        self.modules.borrow().get(name).cloned()
    }

    /// Registered module, creating and registering an empty one if absent.
    pub fn module_or_new(&self, name: &str) -> Obj {
        if let Some(m) = self.module(name) {
            return m;
        }
        let m = self.new_module(name);
        self.add_module(name, m.clone());
        m
    }

    /// Drop a module from the registry.
    pub fn remove_module(&self, name: &str) -> Option<Obj> {
        self.modules.borrow_mut().shift_remove(name)
    }

    /// Read a string-keyed global from a dict.
    pub fn dict_get_str(&self, dict: &Obj, key: &str) -> Option<Obj> {
        dict.as_dict().and_then(|map| {
            map.borrow()
                .get(&HashKey::Str(key.to_string()))
                .map(|(_, v)| v.clone())
        })
    }

    /// Write a string-keyed global into a dict.
    pub fn dict_set_str(&self, dict: &Obj, key: &str, value: Obj) {
        if let Some(map) = dict.as_dict() {
            map.borrow_mut().insert(
                HashKey::Str(key.to_string()),
                (self.str(key), value),
            );
        }
    }

    /// Remove a string-keyed global from a dict.
    pub fn dict_del_str(&self, dict: &Obj, key: &str) -> Option<Obj> {
        dict.as_dict().and_then(|map| {
            map.borrow_mut()
                .shift_remove(&HashKey::Str(key.to_string()))
                .map(|(_, v)| v)
        })
    }

    /// Cycle collection pass. Reference counting frees acyclic garbage
    /// eagerly; cycles are not collected.
    pub fn collect(&self) -> usize {
        tracing::trace!("script collect");
        0
    }

    /// Line cache used for traceback and warning source lines.
    pub fn linecache(&self) -> &LineCache {
        &self.linecache
    }
}

impl Drop for Interp {
    fn drop(&mut self) {
        // Module globals may hold lambdas that capture the globals dict.
        let modules: Vec<Obj> = self.modules.get_mut().drain(..).map(|(_, m)| m).collect();
        for module in modules {
            if let Payload::Module(m) = module.payload() {
                if let Some(map) = m.dict.as_dict() {
                    map.borrow_mut().clear();
                }
            }
        }
    }
}
