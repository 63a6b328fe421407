//! Incremental Mark/Sweep Garbage Collector
//!
//! ## Design
//!
//! - **Slot Arena**: Cells live in a vector of slots addressed by [`CellId`]
//! - **Tri-color Marking**: Uses white/gray/black marking for cycle detection
//! - **Incremental Marking**: Processes a budget of gray cells per safepoint
//! - **Insertion Barrier**: Stores during marking shade the stored cell gray
//! - **Black Allocation**: Cells allocated during marking are pre-marked live
//! - **Sliding Compaction**: Live cells are packed after sweep; every move is
//!   reported through a [`Forwarding`] table

use std::collections::VecDeque;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::heap::{GcHeap, Slot};
use crate::object::{CellId, GcTraceable, MarkColor};

/// GC phase for incremental collection.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    /// No GC in progress, normal mutation
    Idle = 0,
    /// Incremental marking in progress, write barriers active
    Marking = 1,
}

/// Old-to-new address table produced by compaction.
#[derive(Debug, Default, Clone)]
pub struct Forwarding {
    moves: Vec<(CellId, CellId)>,
    index: FxHashMap<CellId, CellId>,
}

impl Forwarding {
    fn insert(&mut self, from: CellId, to: CellId) {
        self.moves.push((from, to));
        self.index.insert(from, to);
    }

    /// New address of `id`, or `id` itself when it did not move.
    #[inline]
    pub fn forward(&self, id: CellId) -> CellId {
        self.index.get(&id).copied().unwrap_or(id)
    }

    /// Every `(from, to)` move in address order.
    pub fn moves(&self) -> &[(CellId, CellId)] {
        &self.moves
    }

    /// Number of moved cells.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Whether nothing moved.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Outcome of a completed cycle.
///
/// Dead cells are handed back by value so the embedder can run finalizers
/// outside any borrow of the heap.
pub struct Collection<T> {
    /// Swept cells with the address they had when they died
    pub finalized: Vec<(CellId, T)>,
    /// Relocations performed by compaction
    pub forwarding: Forwarding,
}

fn shade<T>(slots: &[Option<Slot<T>>], worklist: &mut VecDeque<CellId>, id: CellId) {
    if let Some(Some(slot)) = slots.get(id.index()) {
        if slot.header.mark() == MarkColor::White {
            slot.header.set_mark(MarkColor::Gray);
            worklist.push_back(id);
        }
    }
}

impl<T: GcTraceable> GcHeap<T> {
    /// Get the current GC phase.
    pub fn gc_phase(&self) -> GcPhase {
        self.phase
    }

    /// Returns true if incremental marking is in progress.
    #[inline]
    pub fn is_marking(&self) -> bool {
        self.phase == GcPhase::Marking
    }

    /// Insertion barrier: shade `id` if a cycle is marking.
    #[inline]
    pub fn write_barrier(&mut self, id: CellId) {
        if self.phase == GcPhase::Marking {
            shade(&self.slots, &mut self.worklist, id);
        }
    }

    /// Make a cell reachable for the running cycle.
    ///
    /// Used when a cell is handed out from a side table that the collector
    /// does not trace. Returns false when `id` is not a live cell.
    pub fn expose(&mut self, id: CellId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.write_barrier(id);
        true
    }

    /// Perform a full mark/sweep collection
    pub fn collect(&mut self, roots: &[CellId]) -> Collection<T> {
        let start = Instant::now();

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "otter::gc",
            roots = roots.len(),
            cells = self.live,
            "GC cycle starting"
        );

        // A full collection supersedes any incremental cycle in flight
        self.worklist.clear();
        self.phase = GcPhase::Idle;

        self.reset_marks();
        for &root in roots {
            shade(&self.slots, &mut self.worklist, root);
        }
        self.drain_worklist(usize::MAX);

        self.complete(start)
    }

    /// Start an incremental GC cycle.
    ///
    /// Resets marks, seeds the worklist from roots and transitions to
    /// [`GcPhase::Marking`].
    pub fn start_incremental_gc(&mut self, roots: &[CellId]) {
        self.reset_marks();
        self.worklist.clear();
        for &root in roots {
            shade(&self.slots, &mut self.worklist, root);
        }
        self.mark_start = Some(Instant::now());
        self.phase = GcPhase::Marking;

        #[cfg(feature = "gc_logging")]
        tracing::trace!(target: "otter::gc", roots = roots.len(), "incremental marking started");
    }

    /// Process up to `budget` gray cells.
    ///
    /// Returns `true` when the worklist is empty.
    pub fn incremental_mark_step(&mut self, budget: usize) -> bool {
        if self.phase != GcPhase::Marking {
            return true;
        }
        self.drain_worklist(budget)
    }

    /// Complete the incremental cycle: re-scan roots, drain, sweep, compact.
    pub fn finish_gc(&mut self, roots: &[CellId]) -> Collection<T> {
        let start = self.mark_start.take().unwrap_or_else(Instant::now);
        if self.phase != GcPhase::Marking {
            return self.collect(roots);
        }
        for &root in roots {
            shade(&self.slots, &mut self.worklist, root);
        }
        self.drain_worklist(usize::MAX);
        self.phase = GcPhase::Idle;
        self.complete(start)
    }

    fn complete(&mut self, start: Instant) -> Collection<T> {
        let finalized = self.sweep();
        let forwarding = self.compact();

        self.stats.collections += 1;
        self.stats.last_freed = finalized.len();
        self.stats.total_freed += finalized.len();
        self.stats.last_moved = forwarding.len();
        self.stats.last_pause = start.elapsed();
        self.allocated_since_gc = 0;

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "otter::gc",
            collection = self.stats.collections,
            freed = finalized.len(),
            moved = forwarding.len(),
            live = self.live,
            pause_us = self.stats.last_pause.as_micros() as u64,
            "GC cycle complete"
        );

        Collection {
            finalized,
            forwarding,
        }
    }

    fn reset_marks(&mut self) {
        for slot in self.slots.iter().flatten() {
            slot.header.set_mark(MarkColor::White);
        }
    }

    fn drain_worklist(&mut self, budget: usize) -> bool {
        let slots = &self.slots;
        let worklist = &mut self.worklist;
        let mut processed = 0;

        while processed < budget {
            let Some(id) = worklist.pop_front() else {
                break;
            };
            let Some(Some(slot)) = slots.get(id.index()) else {
                continue;
            };
            // Skip if already black (fully processed)
            if slot.header.mark() == MarkColor::Black {
                continue;
            }
            slot.value.trace(&mut |child| shade(slots, worklist, child));
            slot.header.set_mark(MarkColor::Black);
            processed += 1;
        }

        worklist.is_empty()
    }

    fn sweep(&mut self) -> Vec<(CellId, T)> {
        let mut finalized = Vec::new();
        for (index, entry) in self.slots.iter_mut().enumerate() {
            let dead = matches!(entry, Some(slot) if slot.header.mark() == MarkColor::White);
            if dead {
                if let Some(slot) = entry.take() {
                    finalized.push((CellId::from_index(index), slot.value));
                    self.free.push(index as u32);
                }
            } else if let Some(slot) = entry {
                slot.header.set_mark(MarkColor::White);
            }
        }
        self.live -= finalized.len();
        finalized
    }

    fn compact(&mut self) -> Forwarding {
        let mut forwarding = Forwarding::default();
        if !self.config.compact
            || self.free.is_empty()
            || self.free.len() < self.config.compaction_threshold
        {
            return forwarding;
        }

        let old = std::mem::take(&mut self.slots);
        let mut packed = Vec::with_capacity(self.live);
        for (index, slot) in old.into_iter().enumerate() {
            if let Some(slot) = slot {
                let to = packed.len();
                if to != index {
                    forwarding.insert(CellId::from_index(index), CellId::from_index(to));
                }
                packed.push(Some(slot));
            }
        }

        if !forwarding.is_empty() {
            let forward = |id: CellId| forwarding.forward(id);
            for slot in packed.iter_mut().flatten() {
                slot.value.relocate(&forward);
            }
        }

        self.slots = packed;
        self.free.clear();
        forwarding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::GcConfig;

    struct Leaf;

    impl GcTraceable for Leaf {
        fn trace(&self, _tracer: &mut dyn FnMut(CellId)) {}
        fn relocate(&mut self, _forward: &dyn Fn(CellId) -> CellId) {}
    }

    #[test]
    fn test_forwarding_identity_for_unmoved() {
        let mut forwarding = Forwarding::default();
        forwarding.insert(CellId::from_index(4), CellId::from_index(1));
        assert_eq!(forwarding.forward(CellId::from_index(4)), CellId::from_index(1));
        assert_eq!(forwarding.forward(CellId::from_index(2)), CellId::from_index(2));
        assert_eq!(forwarding.len(), 1);
    }

    #[test]
    fn test_black_allocation_during_marking() {
        let mut heap: GcHeap<Leaf> = GcHeap::new();
        heap.start_incremental_gc(&[]);
        let id = heap.alloc(Leaf);
        assert_eq!(heap.mark_of(id), Some(MarkColor::Black));
        let collection = heap.finish_gc(&[]);
        assert!(collection.finalized.is_empty());
        assert!(heap.contains(id));
    }

    #[test]
    fn test_expose_revives_during_marking() {
        let mut heap: GcHeap<Leaf> = GcHeap::with_config(GcConfig::default().compact(false));
        let id = heap.alloc(Leaf);
        heap.start_incremental_gc(&[]);
        assert!(heap.expose(id));
        let collection = heap.finish_gc(&[]);
        assert!(collection.finalized.is_empty());

        let collection = heap.collect(&[]);
        assert_eq!(collection.finalized.len(), 1);
        assert!(!heap.expose(id));
    }
}
