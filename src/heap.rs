// Copyright 2014 Nick Fitzgerald
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The heap: a single arena of [`HeapObject`] slots, collected by a
//! stop-the-world, non-moving, tri-color mark-sweep collector.
//!
//! Objects are never referenced by address. An [`ObjRef`] is an index into
//! [`Heap::slots`]; the collector frees slots and returns their indices to a
//! free list, so a live `ObjRef` is always valid for as long as the object it
//! names survives a collection.
//!
//! Unlike the source, which threads an intrusive pointer into the VM back
//! into the allocator so it can ask for the root set at collection time, this
//! heap takes its roots as a plain slice passed in at the point of
//! allocation. Rust's ownership rules make a `Heap` holding a callback back
//! into its owning `Vm` awkward without a `Rc<RefCell<_>>` or unsafe
//! aliasing; computing the root list just before a possibly-collecting
//! allocation is the safe equivalent of `allocator_set_roots`/`all_roots_set`
//! and costs nothing extra since every call site already has the VM in hand.

use log::debug;

use crate::object::{HeapObject, ObjRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Gray,
    Black,
}

enum Slot {
    Free,
    Used(Color, HeapObject),
}

/// Heap size/growth configuration. Mirrors the source's
/// `ObjectAllocator_Config` (hard/soft limit, grow factor).
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    pub hard_limit: usize,
    pub soft_limit_initial: usize,
    pub soft_limit_grow_factor: f64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            hard_limit: 1024 * 1024,
            soft_limit_initial: 1024,
            soft_limit_grow_factor: 1.25,
        }
    }
}

/// Every allocated object counts as one unit toward the soft/hard limits;
/// the source sizes by bytes, but since every variant here lives in the same
/// `Vec<Slot>` rather than a `calloc`'d block of varying size, object count is
/// the natural unit-of-account for this arena.
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    soft_limit: usize,
    hard_limit: usize,
    grow_factor: f64,
    gc_running: bool,
    nil: ObjRef,
}

pub struct AllocError;

impl Heap {
    pub fn new(config: HeapConfig) -> Heap {
        let mut heap = Heap {
            slots: Vec::new(),
            free: Vec::new(),
            soft_limit: config.soft_limit_initial,
            hard_limit: config.hard_limit,
            grow_factor: config.soft_limit_grow_factor,
            gc_running: false,
            nil: ObjRef(0),
        };
        let nil = heap.force_allocate(HeapObject::Nil);
        debug_assert_eq!(nil, ObjRef(0));
        heap.nil = nil;
        heap
    }

    /// The unique, permanently-rooted empty-list/falsity/empty-dict object.
    pub fn nil(&self) -> ObjRef {
        self.nil
    }

    pub fn get(&self, r: ObjRef) -> &HeapObject {
        match &self.slots[r.index()] {
            Slot::Used(_, obj) => obj,
            Slot::Free => panic!("dangling ObjRef {:?}: slot has been freed", r),
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut HeapObject {
        match &mut self.slots[r.index()] {
            Slot::Used(_, obj) => obj,
            Slot::Free => panic!("dangling ObjRef {:?}: slot has been freed", r),
        }
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Allocate unconditionally, bypassing the soft/hard limit checks. Used
    /// only for the Nil singleton and the pre-allocated out-of-memory error,
    /// both constructed before any limit-governed allocation can occur.
    fn force_allocate(&mut self, obj: HeapObject) -> ObjRef {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Slot::Used(Color::White, obj);
            ObjRef(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot::Used(Color::White, obj));
            ObjRef(idx)
        }
    }

    /// `allocate(size)` from §4.B: runs the collector if the post-allocation
    /// heap size would cross the soft limit, then fails without mutating
    /// state if it would still cross the hard limit.
    pub fn try_allocate(&mut self, obj: HeapObject, roots: &[ObjRef]) -> Result<ObjRef, AllocError> {
        let prospective = self.live_count() + 1;

        if prospective >= self.soft_limit {
            self.collect_garbage(roots);
            self.soft_limit = ((self.live_count() + 1) as f64 * 1.0 + self.soft_limit as f64 * self.grow_factor)
                .min(self.hard_limit as f64) as usize;
            self.soft_limit = self.soft_limit.max(self.live_count() + 1);
        }

        if self.live_count() + 1 >= self.hard_limit {
            return Err(AllocError);
        }

        Ok(self.force_allocate(obj))
    }

    /// Stop-the-world tri-color mark-sweep. `roots` is every `ObjRef` the VM
    /// currently considers live: frame fields, scratch locals, the globals
    /// environment, the pending-expressions list, the parser's in-progress
    /// expression stack, and the interned constants table.
    pub fn collect_garbage(&mut self, roots: &[ObjRef]) {
        assert!(!self.gc_running, "collect_garbage is not re-entrant");
        self.gc_running = true;

        let before = self.live_count();

        let mut worklist = Vec::new();
        for &r in roots {
            self.mark_gray_if_white(r, &mut worklist);
        }
        while let Some(r) = worklist.pop() {
            let children = self.get(r).children();
            for c in children {
                self.mark_gray_if_white(c, &mut worklist);
            }
            self.paint(r, Color::Black);
        }

        let freed = self.sweep();

        debug!(
            "gc: {} objects before, {} freed, {} after, soft_limit={}",
            before,
            freed,
            self.live_count(),
            self.soft_limit
        );

        self.gc_running = false;
    }

    fn mark_gray_if_white(&mut self, r: ObjRef, worklist: &mut Vec<ObjRef>) {
        if self.color(r) == Color::White {
            self.paint(r, Color::Gray);
            worklist.push(r);
        }
    }

    fn color(&self, r: ObjRef) -> Color {
        match &self.slots[r.index()] {
            Slot::Used(color, _) => *color,
            Slot::Free => panic!("dangling ObjRef {:?}: slot has been freed", r),
        }
    }

    fn paint(&mut self, r: ObjRef, color: Color) {
        match &mut self.slots[r.index()] {
            Slot::Used(c, _) => *c = color,
            Slot::Free => panic!("dangling ObjRef {:?}: slot has been freed", r),
        }
    }

    /// Free every white slot, repaint every black slot white. Pre- and
    /// post-invariant: every live object is white.
    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for idx in 0..self.slots.len() {
            match &self.slots[idx] {
                Slot::Used(Color::White, _) => {
                    if idx as u32 != self.nil.0 {
                        self.slots[idx] = Slot::Free;
                        self.free.push(idx as u32);
                        freed += 1;
                    }
                }
                Slot::Used(Color::Black, _) => {
                    self.paint(ObjRef(idx as u32), Color::White);
                }
                Slot::Used(Color::Gray, _) => unreachable!("sweep ran with a gray object still on the worklist"),
                Slot::Free => {}
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_slot_zero_and_never_collected() {
        let mut heap = Heap::new(HeapConfig::default());
        let nil = heap.nil();
        heap.collect_garbage(&[]);
        assert!(matches!(heap.get(nil), HeapObject::Nil));
    }

    #[test]
    fn unreachable_objects_are_swept() {
        let mut heap = Heap::new(HeapConfig::default());
        let nil = heap.nil();
        let a = heap.try_allocate(HeapObject::Int(1), &[nil]).unwrap();
        let before = heap.live_count();
        heap.collect_garbage(&[nil]);
        assert!(heap.live_count() < before);
        let _ = a;
    }

    #[test]
    fn rooted_objects_survive_collection() {
        let mut heap = Heap::new(HeapConfig::default());
        let nil = heap.nil();
        let a = heap.try_allocate(HeapObject::Int(7), &[nil]).unwrap();
        heap.collect_garbage(&[nil, a]);
        assert!(matches!(heap.get(a), HeapObject::Int(7)));
    }

    #[test]
    fn hard_limit_fails_without_mutating_state() {
        let mut heap = Heap::new(HeapConfig {
            hard_limit: 2,
            soft_limit_initial: 64,
            soft_limit_grow_factor: 1.25,
        });
        let nil = heap.nil();
        let before = heap.live_count();
        let result = heap.try_allocate(HeapObject::Int(1), &[nil]);
        assert!(result.is_err());
        assert_eq!(heap.live_count(), before);
    }
}
