//! # Otter Bridge
//!
//! Bidirectional foreign-object bridge between an Otter host context and a
//! script interpreter. Host objects appear in script code as proxies that
//! speak the script protocols (attributes, items, iteration, calls,
//! comparison, set algebra); script objects appear in host code as proxy
//! objects with host-style properties and helper methods.
//!
//! ## Design Principles
//!
//! - **Identity**: one proxy per foreign object, cached on both sides, so
//!   `a is b` and `a === b` survive round trips
//! - **Unwrap, never double-wrap**: a proxy returning to its home runtime
//!   becomes the original object again
//! - **Lock order**: host context before interpreter when entering from the
//!   host, the reverse when entering from script code
//! - **Errors cross once**: failures convert at the boundary, and the
//!   original exception is recovered if it comes back
//! - **Weak back-references**: proxies never keep the bridge alive
//!
//! ```compile_fail
//! fn assert_send<T: Send>() {}
//! assert_send::<otter_bridge::Bridge>();
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod bridge;
mod cache;
pub mod config;
pub mod error;
pub mod host_proxy;
mod marshal;
pub mod report;
pub mod script_proxy;
mod state;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use host_proxy::{HostShape, TypeShape};
pub use report::{ErrorReport, ReportSink, TracingSink, WarningReport};
pub use script_proxy::ScriptShape;
