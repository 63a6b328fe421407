//! GC cell layout

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Address of a cell in a [`GcHeap`](crate::GcHeap).
///
/// Addresses are only stable between collections: compaction may slide a
/// live cell to a lower slot, and every holder of a `CellId` that is not
/// reported as a root must be rewritten through the returned
/// [`Forwarding`](crate::Forwarding) table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

impl CellId {
    /// Build an id from a raw slot index.
    pub const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Raw slot index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// GC cell header
pub struct GcHeader {
    /// Mark bits for tri-color marking
    mark: AtomicU8,
    /// Cell type tag, free for the embedder
    tag: u8,
}

/// Mark color for tri-color marking
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkColor {
    /// Not yet visited
    White = 0,
    /// In worklist
    Gray = 1,
    /// Fully scanned
    Black = 2,
}

impl GcHeader {
    /// Create new header
    pub const fn new(tag: u8) -> Self {
        Self {
            mark: AtomicU8::new(MarkColor::White as u8),
            tag,
        }
    }

    /// Get mark color
    pub fn mark(&self) -> MarkColor {
        match self.mark.load(Ordering::Acquire) {
            0 => MarkColor::White,
            1 => MarkColor::Gray,
            _ => MarkColor::Black,
        }
    }

    /// Set mark color
    pub fn set_mark(&self, color: MarkColor) {
        self.mark.store(color as u8, Ordering::Release);
    }

    /// Get cell tag
    pub fn tag(&self) -> u8 {
        self.tag
    }
}

/// Trait for values stored in a [`GcHeap`](crate::GcHeap).
pub trait GcTraceable {
    /// Report every outgoing edge.
    fn trace(&self, tracer: &mut dyn FnMut(CellId));

    /// Rewrite every outgoing edge after compaction.
    fn relocate(&mut self, forward: &dyn Fn(CellId) -> CellId);

    /// Tag stored in the header, used only for diagnostics.
    fn tag(&self) -> u8 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_marking() {
        let header = GcHeader::new(3);
        assert_eq!(header.mark(), MarkColor::White);

        header.set_mark(MarkColor::Gray);
        assert_eq!(header.mark(), MarkColor::Gray);

        header.set_mark(MarkColor::Black);
        assert_eq!(header.mark(), MarkColor::Black);
        assert_eq!(header.tag(), 3);
    }

    #[test]
    fn test_cell_id_display() {
        let id = CellId::from_index(26);
        assert_eq!(id.index(), 26);
        assert_eq!(format!("{:?}", id), "#26");
        assert_eq!(id.to_string(), "0x0000001a");
    }
}
