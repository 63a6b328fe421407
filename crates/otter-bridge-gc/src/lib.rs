//! # Otter Bridge Garbage Collector
//!
//! Tri-color mark/sweep collector for the bridge's host heap.
//!
//! ## Design
//!
//! - **Slot arena**: cells are addressed by [`CellId`], not by pointer
//! - **Incremental marking** with an insertion barrier and black allocation
//! - **Sliding compaction**: live cells move, and the move list is returned
//!   so the embedder can run relocation hooks and rewrite untraced tables
//! - **Finalization**: swept cells are returned by value, never dropped
//!   while the heap is borrowed

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod heap;
pub mod mark_sweep;
pub mod object;

pub use heap::{GcConfig, GcHeap, GcStats};
pub use mark_sweep::{Collection, Forwarding, GcPhase};
pub use object::{CellId, GcHeader, GcTraceable, MarkColor};
