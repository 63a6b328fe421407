//! GC heap: slot storage and configuration

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::mark_sweep::GcPhase;
use crate::object::{CellId, GcHeader, GcTraceable, MarkColor};

/// GC configuration
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Gray cells processed per incremental step (default: 256)
    pub incremental_budget: usize,
    /// Slide live cells into holes after each sweep (default: true)
    pub compact: bool,
    /// Minimum number of free slots before compaction kicks in (default: 1)
    pub compaction_threshold: usize,
    /// Allocations between automatic collection requests (default: 10_000)
    pub allocation_threshold: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            incremental_budget: 256,
            compact: true,
            compaction_threshold: 1,
            allocation_threshold: 10_000,
        }
    }
}

impl GcConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the incremental marking budget.
    pub fn incremental_budget(mut self, budget: usize) -> Self {
        self.incremental_budget = budget.max(1);
        self
    }

    /// Enable or disable compaction.
    pub fn compact(mut self, enabled: bool) -> Self {
        self.compact = enabled;
        self
    }

    /// Set the number of holes that triggers compaction.
    pub fn compaction_threshold(mut self, holes: usize) -> Self {
        self.compaction_threshold = holes;
        self
    }

    /// Set the allocation count that makes [`GcHeap::should_gc`] true.
    pub fn allocation_threshold(mut self, count: usize) -> Self {
        self.allocation_threshold = count;
        self
    }
}

/// Collection statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    /// Completed collections
    pub collections: usize,
    /// Cells freed by the last collection
    pub last_freed: usize,
    /// Cells moved by the last compaction
    pub last_moved: usize,
    /// Cells freed over the heap lifetime
    pub total_freed: usize,
    /// Duration of the last collection (start of marking to end of compaction)
    pub last_pause: Duration,
}

pub(crate) struct Slot<T> {
    pub(crate) header: GcHeader,
    pub(crate) value: T,
}

/// A heap of traced cells addressed by [`CellId`].
///
/// Supports stop-the-world collection ([`GcHeap::collect`]) and incremental
/// marking ([`GcHeap::start_incremental_gc`] /
/// [`GcHeap::incremental_mark_step`] / [`GcHeap::finish_gc`]).
pub struct GcHeap<T> {
    pub(crate) slots: Vec<Option<Slot<T>>>,
    pub(crate) free: Vec<u32>,
    pub(crate) live: usize,
    pub(crate) config: GcConfig,
    pub(crate) stats: GcStats,
    pub(crate) allocated_since_gc: usize,

    // --- Incremental marking state ---
    pub(crate) phase: GcPhase,
    pub(crate) worklist: VecDeque<CellId>,
    pub(crate) mark_start: Option<Instant>,
}

impl<T: GcTraceable> GcHeap<T> {
    /// Create new heap with default config
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    /// Create new heap with custom config
    pub fn with_config(config: GcConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            config,
            stats: GcStats::default(),
            allocated_since_gc: 0,
            phase: GcPhase::Idle,
            worklist: VecDeque::new(),
            mark_start: None,
        }
    }

    /// Allocate a cell.
    ///
    /// Cells allocated while marking is in progress are pre-marked black so
    /// the running cycle cannot reclaim them.
    pub fn alloc(&mut self, value: T) -> CellId {
        let header = GcHeader::new(value.tag());
        if self.phase == GcPhase::Marking {
            header.set_mark(MarkColor::Black);
        }
        let slot = Slot { header, value };
        self.live += 1;
        self.allocated_since_gc += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                CellId::from_index(index as usize)
            }
            None => {
                self.slots.push(Some(slot));
                CellId::from_index(self.slots.len() - 1)
            }
        }
    }

    /// Borrow a live cell.
    #[inline]
    pub fn get(&self, id: CellId) -> Option<&T> {
        self.slots.get(id.index())?.as_ref().map(|slot| &slot.value)
    }

    /// Mutably borrow a live cell.
    #[inline]
    pub fn get_mut(&mut self, id: CellId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index())?
            .as_mut()
            .map(|slot| &mut slot.value)
    }

    /// Whether `id` addresses a live cell.
    pub fn contains(&self, id: CellId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    /// Number of live cells.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the heap holds no cells.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live cell ids in address order.
    pub fn ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| CellId::from_index(index))
    }

    /// Mark color of a live cell.
    pub fn mark_of(&self, id: CellId) -> Option<MarkColor> {
        self.slots
            .get(id.index())?
            .as_ref()
            .map(|slot| slot.header.mark())
    }

    /// Whether enough allocations happened since the last cycle.
    pub fn should_gc(&self) -> bool {
        self.allocated_since_gc >= self.config.allocation_threshold
    }

    /// Heap configuration
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Collection statistics
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Drop every cell without marking and hand them back for finalization.
    pub fn drain_all(&mut self) -> Vec<(CellId, T)> {
        let drained: Vec<_> = self
            .slots
            .drain(..)
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|s| (CellId::from_index(index), s.value)))
            .collect();
        self.free.clear();
        self.worklist.clear();
        self.live = 0;
        self.phase = GcPhase::Idle;
        drained
    }
}

impl<T: GcTraceable> Default for GcHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
