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

//! Structured error values and traceback capture.
//!
//! Errors are ordinary `Dict` objects with exactly three entries (`type`,
//! `message`, `traceback`), so they are heap values subject to the same GC as
//! everything else — grounded on `src/vm/errors.c`. Because constructing an
//! error can itself require allocation, the VM pre-allocates a single
//! `OutOfMemoryError` object at startup and falls back to it, without
//! allocating, whenever building a *different* error runs out of heap.

use std::fmt::Write as _;

use log::warn;
use strum::{Display, EnumString, IntoStaticStr};

use crate::dict;
use crate::environment::BindError;
use crate::object::{self, ObjRef, ObjectType};
use crate::vm::Vm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    OSError,
    SyntaxError,
    TypeError,
    CallError,
    NameError,
    ZeroDivisionError,
    OutOfMemoryError,
    StackOverflowError,
    BindingError,
    KeyError,
}

/// Build `{type, message, traceback}` and store it in the VM's error slot.
/// Falls back to the pre-allocated out-of-memory error, without allocating,
/// if construction itself runs out of heap.
///
/// This does not log: a `try` may catch the error before it ever reaches the
/// top level, so only the CLI driver, once it knows an error went uncaught,
/// logs it at `error!` level.
pub fn set_error(vm: &mut Vm, kind: ErrorKind, message: String) {
    match try_build_error(vm, kind, &message) {
        Ok(obj) => vm.set_error_slot(obj),
        Err(()) => {
            let oom = vm.oom_error();
            vm.set_error_slot(oom);
        }
    }
}

fn try_build_error(vm: &mut Vm, kind: ErrorKind, message: &str) -> Result<ObjRef, ()> {
    let type_sym = vm.intern_symbol(kind.into())?;
    let msg_obj = vm.alloc_string(message.to_string())?;
    let traceback = capture_traceback(vm)?;

    let nil = vm.heap().nil();
    let key_type = vm.intern_symbol("type")?;
    let key_message = vm.intern_symbol("message")?;
    let key_traceback = vm.intern_symbol("traceback")?;

    let d = dict::put(vm, nil, key_type, type_sym)?;
    let d = dict::put(vm, d, key_message, msg_obj)?;
    dict::put(vm, d, key_traceback, traceback)
}

/// Walk the stack from the top outward, collecting each live frame's source
/// expression into a list ordered outermost-first / innermost-last ("most
/// recent call last"). Lossy across tail calls, since `swap_top` discards the
/// frame it replaces.
fn capture_traceback(vm: &mut Vm) -> Result<ObjRef, ()> {
    let exprs: Vec<ObjRef> = vm.stack().iter_from_top().map(|f| f.expr).collect();
    let mut list = vm.heap().nil();
    for expr in exprs {
        list = vm.alloc_cons(expr, list)?;
    }
    Ok(list)
}

/// Format a captured traceback list the way the top-level driver shows it to
/// the user: header, one indented `repr` per frame, and the fixed warning
/// that tail calls may have hidden frames.
pub fn format_traceback(vm: &Vm, traceback: ObjRef) -> String {
    let mut out = String::new();
    out.push_str("Traceback (most recent call last):\n");
    let mut cur = traceback;
    loop {
        match vm.heap().get(cur) {
            crate::object::HeapObject::Nil => break,
            crate::object::HeapObject::Cons { first, rest } => {
                let _ = writeln!(out, "    {}", object::repr(vm.heap(), *first));
                cur = *rest;
            }
            _ => break,
        }
    }
    out.push_str("Some calls may be missing due to tail call optimization.\n");
    out
}

/// Format an error Dict (`{type, message, traceback}`) the way the REPL and
/// file driver print an uncaught error.
pub fn format_error(vm: &Vm, err: ObjRef) -> String {
    let key_type = vm.constant_symbol("type");
    let key_message = vm.constant_symbol("message");
    let key_traceback = vm.constant_symbol("traceback");

    let kind = dict::get(vm.heap(), err, key_type).map(|s| object::repr(vm.heap(), s)).unwrap_or_else(|| "?".to_string());
    let message = dict::get(vm.heap(), err, key_message).map(|m| object::print_form(vm.heap(), m)).unwrap_or_default();
    let traceback = dict::get(vm.heap(), err, key_traceback);

    let mut out = String::new();
    let _ = writeln!(out, "{kind}: {message}");
    if let Some(tb) = traceback {
        out.push_str(&format_traceback(vm, tb));
    }
    out
}

pub fn report_syntax_error(message: &str) {
    warn!("syntax error: {message}");
}

/// Build a `SyntaxError` Dict from the reader's scanner/parser failures, so
/// a syntax error raised while evaluating `(import "path")` is catchable by
/// `try` exactly like any other interpreter error.
pub fn set_syntax_error(vm: &mut Vm, message: String) {
    set_error(vm, ErrorKind::SyntaxError, message)
}

/// Turn a `bind()` failure into the matching structured error, mirroring
/// `set_binding_error` in the source.
pub fn set_binding_error(vm: &mut Vm, err: BindError) {
    match err {
        BindError::InvalidTargetType => {
            set_error(vm, ErrorKind::BindingError, "invalid bind target".to_string())
        }
        BindError::InvalidVariadicSyntax => set_error(
            vm,
            ErrorKind::SyntaxError,
            "'&' must be followed by exactly one expression".to_string(),
        ),
        BindError::ValueCountMismatch { expected, is_variadic, got } => {
            let at_least = if is_variadic { "at least " } else { "" };
            set_error(
                vm,
                ErrorKind::BindingError,
                format!("cannot bind values (expected {at_least}{expected}, got {got})"),
            )
        }
        BindError::CannotUnpack(ty) => set_error(vm, ErrorKind::TypeError, format!("cannot unpack value of type {ty}")),
        BindError::AllocationFailed => set_error(vm, ErrorKind::OutOfMemoryError, "out of memory".to_string()),
    }
}

pub fn set_type_error(vm: &mut Vm, got: ObjectType, expected: &[ObjectType]) {
    let list = expected.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" or ");
    set_error(vm, ErrorKind::TypeError, format!("unsupported type (expected {list}, got {got})"))
}

pub fn set_call_error(vm: &mut Vm, name: &str, expected: usize, got: usize) {
    set_error(vm, ErrorKind::CallError, format!("{name} takes {expected} arguments (got {got})"))
}

pub fn set_name_error(vm: &mut Vm, name: &str) {
    set_error(vm, ErrorKind::NameError, format!("name '{name}' is not defined"))
}

pub fn set_zero_division_error(vm: &mut Vm) {
    set_error(vm, ErrorKind::ZeroDivisionError, "division by zero".to_string())
}

pub fn set_stack_overflow_error(vm: &mut Vm) {
    set_error(vm, ErrorKind::StackOverflowError, "stack capacity exceeded".to_string())
}

pub fn set_key_error(vm: &mut Vm, key: ObjRef) {
    let repr = object::repr(vm.heap(), key);
    set_error(vm, ErrorKind::KeyError, format!("key {repr} not found"))
}

pub fn set_special_form_error(vm: &mut Vm, form: &str, usages: &[&str]) {
    let mut message = format!("invalid '{form}' syntax\nUsage:");
    for usage in usages {
        message.push_str("\n       ");
        message.push_str(usage);
    }
    set_error(vm, ErrorKind::SyntaxError, message)
}

pub fn set_os_error(vm: &mut Vm, context: &str, io_err: &std::io::Error) {
    set_error(vm, ErrorKind::OSError, format!("{context}: {io_err}"))
}

pub fn set_import_nesting_too_deep_error(vm: &mut Vm) {
    set_error(vm, ErrorKind::CallError, "import nesting too deep".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Config, Vm};
    use pretty_assertions::assert_eq;

    #[test]
    fn set_error_populates_three_keys() {
        let mut vm = Vm::new(Config::default());
        set_name_error(&mut vm, "x");
        let err = vm.take_error().unwrap();
        let text = format_error(&vm, err);
        assert!(text.contains("NameError"));
        assert!(text.contains("'x' is not defined"));
    }

    #[test]
    fn format_error_renders_kind_message_and_traceback_header() {
        let mut vm = Vm::new(Config::default());
        set_zero_division_error(&mut vm);
        let err = vm.take_error().unwrap();
        let text = format_error(&vm, err);
        let expected = "ZeroDivisionError: division by zero\nTraceback (most recent call last):\nSome calls may be missing due to tail call optimization.\n";
        assert_eq!(text, expected);
    }
}
