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

//! The VM façade: owns the heap, the evaluation stack, the globals
//! environment, the top-level value/error slots, the interned-symbol cache,
//! and import-nesting bookkeeping. Every other module reaches the heap and
//! stack only through here, mirroring the source's `struct VM` in
//! `src/vm/vm.h`.

use std::collections::{HashMap, VecDeque};

use anyhow::Context;

use crate::dict;
use crate::environment::env_create;
use crate::heap::{Heap, HeapConfig};
use crate::object::{HeapObject, ObjRef};
use crate::stack::Stack;

#[derive(Debug, Clone)]
pub struct Config {
    pub heap: HeapConfig,
    pub stack_size: usize,
    pub max_import_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            heap: HeapConfig::default(),
            stack_size: 4096,
            max_import_depth: 64,
        }
    }
}

impl Config {
    /// Layer `PERSIMMON_HEAP_HARD_LIMIT`, `PERSIMMON_HEAP_SOFT_LIMIT`,
    /// `PERSIMMON_STACK_SIZE`, and `PERSIMMON_MAX_IMPORT_DEPTH` over the
    /// defaults. Used by the CLI driver at startup; library embedders can
    /// build a `Config` directly instead.
    pub fn from_env() -> anyhow::Result<Config> {
        let mut config = Config::default();
        if let Ok(v) = std::env::var("PERSIMMON_HEAP_HARD_LIMIT") {
            config.heap.hard_limit = v.parse().context("PERSIMMON_HEAP_HARD_LIMIT must be a positive integer")?;
        }
        if let Ok(v) = std::env::var("PERSIMMON_HEAP_SOFT_LIMIT") {
            config.heap.soft_limit_initial = v.parse().context("PERSIMMON_HEAP_SOFT_LIMIT must be a positive integer")?;
        }
        if let Ok(v) = std::env::var("PERSIMMON_STACK_SIZE") {
            config.stack_size = v.parse().context("PERSIMMON_STACK_SIZE must be a positive integer")?;
        }
        if let Ok(v) = std::env::var("PERSIMMON_MAX_IMPORT_DEPTH") {
            config.max_import_depth = v.parse().context("PERSIMMON_MAX_IMPORT_DEPTH must be a positive integer")?;
        }
        Ok(config)
    }
}

pub struct Vm {
    heap: Heap,
    stack: Stack,
    globals: ObjRef,
    value_slot: ObjRef,
    error_slot: Option<ObjRef>,
    interned: HashMap<String, ObjRef>,
    oom_error: ObjRef,
    import_depth: usize,
    max_import_depth: usize,
    exit_requested: bool,
    /// Top-level forms the reader has produced but the CLI driver or
    /// `import` hasn't yet handed to the evaluator (or folded into an
    /// already-rooted structure). Read in file/import-sized batches, these
    /// sit only in a caller-side `Vec` otherwise, so they're a GC root in
    /// their own right, not reachable from anything else.
    pending_expressions: VecDeque<ObjRef>,
    /// Snapshot of every `ObjRef` a `Parser` is currently holding mid-parse
    /// (an open list's accumulated elements), refreshed after each token.
    /// Reachable only from the parser's own stack otherwise.
    parser_scratch: Vec<ObjRef>,
}

impl Vm {
    pub fn new(config: Config) -> Vm {
        let heap = Heap::new(config.heap);
        let nil = heap.nil();
        let stack = Stack::new(config.stack_size);

        let mut vm = Vm {
            heap,
            stack,
            globals: nil,
            value_slot: nil,
            error_slot: None,
            interned: HashMap::new(),
            oom_error: nil,
            import_depth: 0,
            max_import_depth: config.max_import_depth,
            exit_requested: false,
            pending_expressions: VecDeque::new(),
            parser_scratch: Vec::new(),
        };

        for name in ["type", "message", "traceback"] {
            vm.intern_symbol(name).expect("bootstrap allocation cannot fail");
        }
        vm.oom_error = build_oom_error(&mut vm);
        vm.globals = env_create(&mut vm, nil).expect("bootstrap allocation cannot fail");
        crate::primitives::install(&mut vm);
        vm
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub fn globals(&self) -> ObjRef {
        self.globals
    }

    /// Every `ObjRef` the VM currently considers live: the stack's frames
    /// and scratch locals, the globals environment, the top-level value and
    /// error slots, the out-of-memory singleton, every interned symbol, any
    /// top-level forms read but not yet evaluated, and the parser's
    /// in-progress expression stack.
    fn roots(&self) -> Vec<ObjRef> {
        let mut roots = self.stack.roots();
        roots.push(self.globals);
        roots.push(self.value_slot);
        if let Some(e) = self.error_slot {
            roots.push(e);
        }
        roots.push(self.oom_error);
        roots.extend(self.interned.values().copied());
        roots.extend(self.pending_expressions.iter().copied());
        roots.extend(self.parser_scratch.iter().copied());
        roots
    }

    /// Record a top-level form as read-but-not-yet-evaluated. Called by the
    /// reader as soon as a form is complete; the caller that goes on to
    /// evaluate (or otherwise root) it removes it again with
    /// [`Vm::pop_pending_expression`] or [`Vm::drop_recent_pending_expressions`].
    pub fn push_pending_expression(&mut self, expr: ObjRef) {
        self.pending_expressions.push_back(expr);
    }

    /// Consume the oldest still-pending top-level form, in read order.
    pub fn pop_pending_expression(&mut self) -> Option<ObjRef> {
        self.pending_expressions.pop_front()
    }

    /// Drop the `n` most recently pushed pending expressions without regard
    /// to read order. Used where a single caller pushes a batch (the raw
    /// forms it read, plus any accumulator built while folding them) and
    /// wants to release exactly that batch once the result is rooted
    /// elsewhere, leaving any earlier, unrelated pending forms untouched.
    pub fn drop_recent_pending_expressions(&mut self, n: usize) {
        for _ in 0..n {
            self.pending_expressions.pop_back();
        }
    }

    /// Replace the parser-scratch root snapshot. Called by `Parser` after
    /// every token it consumes.
    pub fn set_parser_scratch(&mut self, elements: Vec<ObjRef>) {
        self.parser_scratch = elements;
    }

    /// Allocate through the soft/hard-limit-governed path. On failure the
    /// error slot is set to the pre-built out-of-memory error without any
    /// further allocation, so every caller that propagates `Err(())` up
    /// through `?` leaves the VM in a state `eval_top_level` can report.
    pub fn alloc(&mut self, obj: HeapObject) -> Result<ObjRef, ()> {
        let roots = self.roots();
        match self.heap.try_allocate(obj, &roots) {
            Ok(r) => Ok(r),
            Err(_) => {
                self.error_slot = Some(self.oom_error);
                Err(())
            }
        }
    }

    pub fn alloc_int(&mut self, n: i64) -> Result<ObjRef, ()> {
        self.alloc(HeapObject::Int(n))
    }

    pub fn alloc_string(&mut self, s: String) -> Result<ObjRef, ()> {
        self.alloc(HeapObject::String(s))
    }

    pub fn alloc_symbol(&mut self, name: &str) -> Result<ObjRef, ()> {
        self.alloc(HeapObject::Symbol(name.to_string()))
    }

    pub fn alloc_cons(&mut self, first: ObjRef, rest: ObjRef) -> Result<ObjRef, ()> {
        self.alloc(HeapObject::Cons { first, rest })
    }

    /// Look up a cached symbol by name, allocating and caching it on a
    /// miss. Symbol *values* never rely on interning for correctness —
    /// `object::equals` compares by string content — this exists purely so
    /// the handful of symbols the VM itself repeatedly needs (dict keys,
    /// error-kind tags) don't churn the heap.
    pub fn intern_symbol(&mut self, name: &str) -> Result<ObjRef, ()> {
        if let Some(&r) = self.interned.get(name) {
            return Ok(r);
        }
        let r = self.alloc_symbol(name)?;
        self.interned.insert(name.to_string(), r);
        Ok(r)
    }

    /// Infallible lookup of a symbol pre-interned at startup (`type`,
    /// `message`, `traceback`). Panics on a name that was never interned —
    /// a programming error, not a runtime condition.
    pub fn constant_symbol(&self, name: &str) -> ObjRef {
        *self
            .interned
            .get(name)
            .unwrap_or_else(|| panic!("constant_symbol: {name:?} was never interned"))
    }

    pub fn oom_error(&self) -> ObjRef {
        self.oom_error
    }

    pub fn set_error_slot(&mut self, err: ObjRef) {
        self.error_slot = Some(err);
    }

    pub fn take_error(&mut self) -> Option<ObjRef> {
        self.error_slot.take()
    }

    pub fn has_error(&self) -> bool {
        self.error_slot.is_some()
    }

    pub fn clear_error(&mut self) {
        self.error_slot = None;
    }

    pub fn set_value_slot(&mut self, value: ObjRef) {
        self.value_slot = value;
    }

    pub fn value_slot(&self) -> ObjRef {
        self.value_slot
    }

    pub fn import_depth(&self) -> usize {
        self.import_depth
    }

    pub fn max_import_depth(&self) -> usize {
        self.max_import_depth
    }

    pub fn enter_import(&mut self) {
        self.import_depth += 1;
    }

    pub fn exit_import(&mut self) {
        self.import_depth -= 1;
    }

    /// Set by the `exit` primitive; checked by the CLI driver after each
    /// top-level evaluation, matching the source's `prim_exit` returning
    /// false to stop the REPL loop.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}

/// Built once at startup, while the heap holds only a handful of objects, so
/// there is no realistic risk of it failing to allocate — `set_error`'s
/// fallback to this singleton only needs to hold at error time, not here.
fn build_oom_error(vm: &mut Vm) -> ObjRef {
    let nil = vm.heap.nil();
    let kind_sym = vm.alloc_symbol("OutOfMemoryError").expect("bootstrap allocation cannot fail");
    let msg = vm
        .alloc_string("out of memory".to_string())
        .expect("bootstrap allocation cannot fail");
    let key_type = vm.intern_symbol("type").expect("bootstrap allocation cannot fail");
    let key_message = vm.intern_symbol("message").expect("bootstrap allocation cannot fail");
    let key_traceback = vm.intern_symbol("traceback").expect("bootstrap allocation cannot fail");

    let d = dict::put(vm, nil, key_type, kind_sym).expect("bootstrap allocation cannot fail");
    let d = dict::put(vm, d, key_message, msg).expect("bootstrap allocation cannot fail");
    dict::put(vm, d, key_traceback, nil).expect("bootstrap allocation cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::HeapObject;

    #[test]
    fn new_vm_has_empty_globals_and_stack() {
        let vm = Vm::new(Config::default());
        assert!(vm.stack().is_empty());
        assert!(matches!(vm.heap().get(vm.globals()), HeapObject::Cons { .. }));
    }

    #[test]
    fn intern_symbol_caches_repeated_lookups() {
        let mut vm = Vm::new(Config::default());
        let a = vm.intern_symbol("foo").unwrap();
        let b = vm.intern_symbol("foo").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn constant_symbol_finds_bootstrap_interned_names() {
        let vm = Vm::new(Config::default());
        let ty = vm.constant_symbol("type");
        assert!(matches!(vm.heap().get(ty), HeapObject::Symbol(s) if s == "type"));
    }

    #[test]
    fn alloc_failure_past_hard_limit_sets_oom_error() {
        let mut config = Config::default();
        config.heap.hard_limit = 32;
        config.heap.soft_limit_initial = 32;
        let mut vm = Vm::new(config);
        loop {
            if vm.alloc_int(1).is_err() {
                break;
            }
        }
        let err = vm.take_error().unwrap();
        assert_eq!(err, vm.oom_error());
    }
}
