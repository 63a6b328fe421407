//! # Otter Script
//!
//! Reference-counted object runtime on the script side of the bridge.
//!
//! ## Design Principles
//!
//! - **Reference counting**: every object is an [`Obj`], an `Rc` handle;
//!   objects die when the last handle drops, cycles are not collected
//! - **Single-threaded**: an [`Interp`] is `!Send`; a reentrant interpreter
//!   lock marks the regions where script objects are touched
//! - **Lazy exceptions**: builtin error kinds travel as plain
//!   [`ScriptError`] values and are only turned into exception objects when
//!   something needs the object
//! - **Native objects**: extension types implement [`NativeObject`] to take
//!   over attribute, item, iteration, call and comparison protocols
//!
//! ```compile_fail
//! fn assert_send<T: Send>() {}
//! assert_send::<otter_script::Interp>();
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

mod builtins;
pub mod config;
pub mod error;
pub mod eval;
pub mod exceptions;
pub mod interp;
pub mod linecache;
pub mod native;
pub mod number;
pub mod object;
pub mod ops;
pub mod protocol;
pub mod repr;
pub mod warnings;

pub use config::ScriptConfig;
pub use error::{RaisedException, ScriptError, ScriptResult, SyntaxErrorInfo};
pub use exceptions::{exception_name, traceback};
pub use interp::{BuiltinTypes, CallGuard, FrameGuard, GilGuard, Interp};
pub use linecache::LineCache;
pub use native::{NativeObject, TypeFeatures};
pub use object::{
    AttrMap, BuiltinFn, BuiltinKind, ClassData, DictMap, ExceptionData, Frame, FunctionData,
    FunctionKind, HashKey, InstanceData, IteratorData, IteratorKind, Kwargs, ModuleData,
    NativeCell, NextFn, Obj, Payload, SetMap, WeakObj,
};
pub use ops::{BinaryOp, CompareOp};
pub use protocol::{SliceIndices, class_name, qualified_class_name};
pub use repr::quote_str;
pub use warnings::{WarningRecord, WarningSink};
