//! GC correctness tests
//!
//! These tests verify that the mark/sweep collector reclaims unreachable
//! cells, keeps reachable graphs alive and reports compaction moves.

use otter_bridge_gc::{CellId, GcConfig, GcHeap, GcTraceable, MarkColor};

/// Simple test object for GC testing
struct TestObject {
    value: i32,
    /// Outgoing references
    references: Vec<CellId>,
}

impl TestObject {
    fn leaf(value: i32) -> Self {
        Self {
            value,
            references: Vec::new(),
        }
    }
}

impl GcTraceable for TestObject {
    fn trace(&self, tracer: &mut dyn FnMut(CellId)) {
        for &id in &self.references {
            tracer(id);
        }
    }

    fn relocate(&mut self, forward: &dyn Fn(CellId) -> CellId) {
        for id in &mut self.references {
            *id = forward(*id);
        }
    }
}

#[test]
fn test_collect_simple_garbage() {
    let mut heap = GcHeap::new();
    let _ = heap.alloc(TestObject::leaf(42));
    assert_eq!(heap.len(), 1);

    // Force GC with no roots
    let collection = heap.collect(&[]);

    assert_eq!(collection.finalized.len(), 1);
    assert_eq!(collection.finalized[0].1.value, 42);
    assert!(heap.is_empty());
    assert_eq!(heap.stats().collections, 1);
}

#[test]
fn test_rooted_object_survives() {
    let mut heap = GcHeap::new();
    let root = heap.alloc(TestObject::leaf(1));
    let collection = heap.collect(&[root]);
    assert!(collection.finalized.is_empty());
    assert_eq!(heap.get(root).map(|o| o.value), Some(1));
    assert_eq!(heap.mark_of(root), Some(MarkColor::White));
}

#[test]
fn test_transitive_reachability_and_cycles() {
    let mut heap = GcHeap::new();
    let a = heap.alloc(TestObject::leaf(1));
    let b = heap.alloc(TestObject::leaf(2));
    heap.get_mut(a).unwrap().references.push(b);
    heap.get_mut(b).unwrap().references.push(a);

    // Unreachable cycle
    let c = heap.alloc(TestObject::leaf(3));
    let d = heap.alloc(TestObject::leaf(4));
    heap.get_mut(c).unwrap().references.push(d);
    heap.get_mut(d).unwrap().references.push(c);

    let collection = heap.collect(&[a]);
    let mut freed: Vec<i32> = collection.finalized.iter().map(|(_, o)| o.value).collect();
    freed.sort();
    assert_eq!(freed, vec![3, 4]);
    assert_eq!(heap.len(), 2);
}

#[test]
fn test_compaction_reports_moves_and_rewrites_edges() {
    let mut heap = GcHeap::new();
    let garbage = heap.alloc(TestObject::leaf(0));
    let target = heap.alloc(TestObject::leaf(7));
    let holder = heap.alloc(TestObject::leaf(8));
    heap.get_mut(holder).unwrap().references.push(target);
    assert_eq!(garbage.index(), 0);

    let collection = heap.collect(&[holder]);
    assert_eq!(collection.finalized.len(), 1);

    let new_target = collection.forwarding.forward(target);
    let new_holder = collection.forwarding.forward(holder);
    assert_eq!(new_target, CellId::from_index(0));
    assert_eq!(new_holder, CellId::from_index(1));
    assert_eq!(collection.forwarding.moves(), &[(target, new_target), (holder, new_holder)]);
    assert_eq!(heap.get(new_holder).unwrap().references, vec![new_target]);
    assert_eq!(heap.get(new_target).unwrap().value, 7);
}

#[test]
fn test_no_compaction_when_disabled() {
    let mut heap = GcHeap::with_config(GcConfig::default().compact(false));
    let _garbage = heap.alloc(TestObject::leaf(0));
    let kept = heap.alloc(TestObject::leaf(1));
    let collection = heap.collect(&[kept]);
    assert!(collection.forwarding.is_empty());
    assert!(heap.contains(kept));

    // Freed slot is reused
    let reused = heap.alloc(TestObject::leaf(2));
    assert_eq!(reused.index(), 0);
}

#[test]
fn test_incremental_cycle_with_barrier() {
    let mut heap = GcHeap::with_config(GcConfig::default().compact(false));
    let root = heap.alloc(TestObject::leaf(1));
    let orphan = heap.alloc(TestObject::leaf(2));

    heap.start_incremental_gc(&[root]);
    assert!(heap.is_marking());
    // Root is scanned before the store happens
    assert!(heap.incremental_mark_step(1));
    assert_eq!(heap.mark_of(root), Some(MarkColor::Black));

    heap.get_mut(root).unwrap().references.push(orphan);
    heap.write_barrier(orphan);

    let collection = heap.finish_gc(&[root]);
    assert!(collection.finalized.is_empty());
    assert!(!heap.is_marking());
    assert!(heap.contains(orphan));
}

#[test]
fn test_should_gc_threshold() {
    let mut heap = GcHeap::with_config(GcConfig::default().allocation_threshold(2));
    heap.alloc(TestObject::leaf(1));
    assert!(!heap.should_gc());
    heap.alloc(TestObject::leaf(2));
    assert!(heap.should_gc());
    heap.collect(&[]);
    assert!(!heap.should_gc());
}

#[test]
fn test_drain_all_returns_every_cell() {
    let mut heap = GcHeap::new();
    heap.alloc(TestObject::leaf(1));
    heap.alloc(TestObject::leaf(2));
    let drained = heap.drain_all();
    assert_eq!(drained.len(), 2);
    assert!(heap.is_empty());
}
