//! # Otter Host
//!
//! Garbage-collected object runtime on the host side of the bridge.
//!
//! ## Design Principles
//!
//! - **Single-threaded**: a [`Context`] is `!Send`; execution is guarded
//!   by a reentrant context lock
//! - **Explicit safe points**: the collector runs only from [`Context::gc`]
//!   and the incremental entry points, never behind an allocation
//! - **Moving collector**: objects may be relocated; anything stored outside
//!   the heap is either a [`Persistent`] root or updated from a
//!   [`NativeClass::moved`] hook
//! - **Class hooks**: native objects intercept the property protocol,
//!   calls, construction and `instanceof`
//!
//! ```compile_fail
//! fn assert_send<T: Send>() {}
//! assert_send::<otter_host::Context>();
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod class;
pub mod config;
pub mod context;
pub mod error;
pub mod gc;
mod intrinsics;
pub mod map_data;
pub mod object;
pub mod string;
pub mod value;

pub use class::NativeClass;
pub use config::HostConfig;
pub use context::{Context, ContextGuard, RealmGuard, WellKnownSymbols};
pub use error::{HostError, HostResult, ThrownValue};
pub use gc::{GcReport, Persistent};
pub use map_data::MapData;
pub use object::{
    FunctionData, FunctionFlags, IterKind, NativeData, NativeFn, ObjectKind, PropertyAttributes,
    PropertyKey, PropertySlot,
};
pub use otter_bridge_gc::GcConfig;
pub use string::JsString;
pub use value::{ObjectRef, Symbol, Value};
