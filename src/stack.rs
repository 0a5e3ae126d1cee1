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

//! The explicit evaluation stack: a bounded sequence of [`Frame`]s, each with
//! room for per-frame scratch locals. This is the evaluator's only stack —
//! `step` never recurses on the host call stack, so `swap_top` can rewrite a
//! tail call without growing anything.
//!
//! The source packs frames and their scratch locals into one flat byte
//! buffer via an intrusive `WrappedFrame` linked list (`src/vm/stack.c`).
//! Here a `Vec<Frame>` plays the same role; `capacity` bounds the combined
//! count of frames and scratch locals the same way the source bounds bytes.

use log::trace;

use crate::object::ObjRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Call,
    If,
    Do,
    Define,
    Fn,
    Macro,
    Import,
    Quote,
    Try,
}

/// Where a sub-evaluation's result should be appended. `Discard` is the
/// source's `results_list == nullptr` (non-final `do` sub-expressions).
/// `Frame(i)` and `VmSlot` are the Rust equivalent of a raw pointer into
/// another frame's `evaluated` field or into the VM's top-level value slot:
/// since two `&mut Frame`s into the same `Vec` can't coexist, the target is
/// named by index and resolved at the point of use instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsTarget {
    Discard,
    Frame(usize),
    VmSlot,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub expr: ObjRef,
    pub env: ObjRef,
    pub unevaluated: ObjRef,
    pub evaluated: ObjRef,
    pub results_list: ResultsTarget,
    pub locals: Vec<ObjRef>,
}

impl Frame {
    pub fn new(kind: FrameKind, expr: ObjRef, env: ObjRef, unevaluated: ObjRef, results_list: ResultsTarget, nil: ObjRef) -> Frame {
        Frame {
            kind,
            expr,
            env,
            unevaluated,
            evaluated: nil,
            results_list,
            locals: Vec::new(),
        }
    }
}

pub struct StackOverflow;

pub struct Stack {
    frames: Vec<Frame>,
    capacity: usize,
}

impl Stack {
    pub fn new(capacity: usize) -> Stack {
        Stack { frames: Vec::new(), capacity }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    fn total_used(&self) -> usize {
        self.frames.len() + self.frames.iter().map(|f| f.locals.len()).sum::<usize>()
    }

    pub fn top(&self) -> &Frame {
        self.frames.last().expect("stack is empty")
    }

    pub fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("stack is empty")
    }

    pub fn get(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Frame {
        &mut self.frames[index]
    }

    /// Index of the current top frame; used to build a `ResultsTarget::Frame`
    /// pointing at "my own `evaluated` field" for the frame about to be
    /// pushed beneath it.
    pub fn top_index(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn push(&mut self, frame: Frame) -> Result<(), StackOverflow> {
        if self.total_used() + 1 > self.capacity {
            return Err(StackOverflow);
        }
        trace!("push {:?}", frame.kind);
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) {
        let frame = self.frames.pop().expect("stack is empty");
        trace!("pop {:?}", frame.kind);
    }

    /// Atomic replace of the top frame — the tail-call mechanism.
    pub fn swap_top(&mut self, frame: Frame) {
        trace!("swap_top {:?} -> {:?}", self.top().kind, frame.kind);
        *self.frames.last_mut().expect("stack is empty") = frame;
    }

    /// Reserve one additional scratch-local slot (initialized to `nil`) in
    /// the top frame, returning its index for later use with
    /// `top_mut().locals[idx]`.
    pub fn create_local(&mut self, nil: ObjRef) -> Result<usize, StackOverflow> {
        if self.total_used() + 1 > self.capacity {
            return Err(StackOverflow);
        }
        let top = self.frames.last_mut().expect("stack is empty");
        top.locals.push(nil);
        Ok(top.locals.len() - 1)
    }

    /// Every `ObjRef` anchored directly by the stack: each frame's `expr`,
    /// `env`, `unevaluated`, `evaluated`, and every scratch local. Used to
    /// build the GC root set.
    pub fn roots(&self) -> Vec<ObjRef> {
        let mut roots = Vec::new();
        for frame in &self.frames {
            roots.push(frame.expr);
            roots.push(frame.env);
            roots.push(frame.unevaluated);
            roots.push(frame.evaluated);
            roots.extend_from_slice(&frame.locals);
        }
        roots
    }

    /// Most-recent-call-last would require reversing; traceback capture
    /// wants most-recent-first order to build the list tail-first, so this
    /// walks top to bottom.
    pub fn iter_from_top(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: FrameKind) -> Frame {
        Frame::new(kind, ObjRef(0), ObjRef(0), ObjRef(0), ResultsTarget::Discard, ObjRef(0))
    }

    #[test]
    fn push_pop_respects_capacity() {
        let mut stack = Stack::new(2);
        stack.push(frame(FrameKind::Call)).unwrap();
        stack.push(frame(FrameKind::If)).unwrap();
        assert!(stack.push(frame(FrameKind::Do)).is_err());
        stack.pop();
        stack.push(frame(FrameKind::Do)).unwrap();
    }

    #[test]
    fn create_local_counts_against_capacity() {
        let mut stack = Stack::new(2);
        stack.push(frame(FrameKind::Call)).unwrap();
        stack.create_local(ObjRef(0)).unwrap();
        assert!(stack.create_local(ObjRef(0)).is_err());
    }

    #[test]
    fn swap_top_replaces_in_place_without_changing_depth() {
        let mut stack = Stack::new(4);
        stack.push(frame(FrameKind::Call)).unwrap();
        stack.push(frame(FrameKind::If)).unwrap();
        stack.swap_top(frame(FrameKind::Do));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.top().kind, FrameKind::Do);
    }
}
