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

//! The stepper: a trampoline that evaluates one [`Frame`] at a time so that
//! tail calls `swap_top` instead of recursing on the host stack. Grounded on
//! `src/vm/eval.c`'s `eval_begin`/`eval_step`, translated from its in-place
//! `Frame` mutation into explicit reads of `Stack::get`/writes through
//! `Stack::get_mut`, since Rust won't let two `&mut Frame` into the same
//! `Vec` coexist.

use crate::environment::{bind, env_create, env_find};
use crate::error::{set_binding_error, set_import_nesting_too_deep_error, set_stack_overflow_error, set_type_error};
use crate::object::{list_len, type_of, HeapObject, ObjRef, ObjectType};
use crate::reader;
use crate::stack::{Frame, FrameKind, ResultsTarget};
use crate::vm::Vm;

/// Whether a sub-evaluation should push a new frame (non-tail position) or
/// rewrite the current one in place (tail position).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Keep,
    Remove,
}

/// Drive one full top-level evaluation to completion: push the initial
/// frame, `step()` until the stack empties, and unwind to the nearest `try`
/// frame on error. Panics if called with a non-empty stack (nested `eval`
/// calls don't happen — `try` handles recovery in-VM, not by reentering
/// this function).
pub fn eval_top_level(vm: &mut Vm, env: ObjRef, expr: ObjRef) -> Result<ObjRef, ObjRef> {
    assert!(vm.stack().is_empty(), "eval_top_level: stack must be empty");
    let nil = vm.heap().nil();
    vm.set_value_slot(nil);
    vm.clear_error();

    let mut failed = begin_eval(vm, EvalMode::Keep, env, expr, ResultsTarget::VmSlot).is_err();

    loop {
        if vm.stack().is_empty() {
            break;
        }
        if failed {
            while !vm.stack().is_empty() && vm.stack().top().kind != FrameKind::Try {
                vm.stack_mut().pop();
            }
            if vm.stack().is_empty() {
                break;
            }
            failed = false;
        }
        failed = step(vm).is_err();
    }

    if failed {
        Err(vm.take_error().expect("a failed step leaves an error in the error slot"))
    } else {
        Ok(vm.value_slot())
    }
}

/// Append `value` to the destination named by `target`. `Discard` is a
/// no-op (non-final `do`/`Call` sub-expressions); `Frame(i)` prepends onto
/// frame `i`'s `evaluated` list (reversed back to source order once
/// complete); `VmSlot` writes the top-level result slot.
fn save_result(vm: &mut Vm, target: ResultsTarget, value: ObjRef) -> Result<(), ()> {
    match target {
        ResultsTarget::Discard => Ok(()),
        ResultsTarget::Frame(idx) => {
            let old = vm.stack().get(idx).evaluated;
            let new_list = vm.alloc_cons(value, old)?;
            vm.stack_mut().get_mut(idx).evaluated = new_list;
            Ok(())
        }
        ResultsTarget::VmSlot => {
            vm.set_value_slot(value);
            Ok(())
        }
    }
}

/// Build a fresh list holding `list`'s elements in reverse. Used to turn a
/// `Frame::evaluated` accumulator (built by repeated prepend) back into
/// source order, and backs the `reverse` primitive.
pub fn reverse_list(vm: &mut Vm, mut list: ObjRef) -> Result<ObjRef, ()> {
    let mut out = vm.heap().nil();
    loop {
        match vm.heap().get(list) {
            HeapObject::Nil => return Ok(out),
            HeapObject::Cons { first, rest } => {
                let (first, rest) = (*first, *rest);
                out = vm.alloc_cons(first, out)?;
                list = rest;
            }
            _ => panic!("reverse_list: improper list"),
        }
    }
}

fn special_form_kind(vm: &Vm, first: ObjRef) -> Option<FrameKind> {
    if let HeapObject::Symbol(name) = vm.heap().get(first) {
        match name.as_str() {
            "if" => Some(FrameKind::If),
            "do" => Some(FrameKind::Do),
            "define" => Some(FrameKind::Define),
            "fn" => Some(FrameKind::Fn),
            "macro" => Some(FrameKind::Macro),
            "quote" => Some(FrameKind::Quote),
            "import" => Some(FrameKind::Import),
            "try" => Some(FrameKind::Try),
            _ => None,
        }
    } else {
        None
    }
}

/// Special forms validate their shape up front, before any sub-form is
/// evaluated, so a malformed `(if)` never runs a single step.
fn validate_form_shape(vm: &mut Vm, kind: FrameKind, rest: ObjRef) -> Result<(), ()> {
    use crate::error::set_special_form_error as err;
    match kind {
        FrameKind::If => match list_len(vm.heap(), rest) {
            Some(2) | Some(3) => Ok(()),
            _ => {
                err(vm, "if", &["(if condition then)", "(if condition then else)"]);
                Err(())
            }
        },
        FrameKind::Define => match list_len(vm.heap(), rest) {
            Some(2) => Ok(()),
            _ => {
                err(vm, "define", &["(define target value)"]);
                Err(())
            }
        },
        FrameKind::Fn | FrameKind::Macro => {
            if matches!(vm.heap().get(rest), HeapObject::Cons { .. }) {
                Ok(())
            } else {
                let form = if kind == FrameKind::Fn { "fn" } else { "macro" };
                err(vm, form, &["(fn params body...)"]);
                Err(())
            }
        }
        FrameKind::Quote => match list_len(vm.heap(), rest) {
            Some(1) => Ok(()),
            _ => {
                err(vm, "quote", &["(quote expr)"]);
                Err(())
            }
        },
        FrameKind::Import => match list_len(vm.heap(), rest) {
            Some(1) => Ok(()),
            _ => {
                err(vm, "import", &["(import path)"]);
                Err(())
            }
        },
        FrameKind::Try => match list_len(vm.heap(), rest) {
            Some(1) => Ok(()),
            _ => {
                err(vm, "try", &["(try expr)"]);
                Err(())
            }
        },
        FrameKind::Do | FrameKind::Call => Ok(()),
    }
}

fn finish_self_evaluating(vm: &mut Vm, mode: EvalMode, results_list: ResultsTarget, value: ObjRef) -> Result<(), ()> {
    save_result(vm, results_list, value)?;
    if mode == EvalMode::Remove {
        vm.stack_mut().pop();
    }
    Ok(())
}

/// Classify `expr` and either resolve it immediately (literals, symbol
/// lookups) or start a new [`Frame`] for it — pushed in `Keep` mode (a
/// non-tail sub-evaluation returns control to its caller) or swapped in
/// `Remove` mode (a tail call, replacing the frame that led to it).
pub fn begin_eval(vm: &mut Vm, mode: EvalMode, env: ObjRef, expr: ObjRef, results_list: ResultsTarget) -> Result<(), ()> {
    match vm.heap().get(expr).clone() {
        HeapObject::Nil
        | HeapObject::Int(_)
        | HeapObject::String(_)
        | HeapObject::Dict { .. }
        | HeapObject::Primitive { .. }
        | HeapObject::Closure { .. }
        | HeapObject::Macro { .. } => finish_self_evaluating(vm, mode, results_list, expr),
        HeapObject::Symbol(ref name) => match env_find(vm.heap(), env, expr) {
            Some(value) => finish_self_evaluating(vm, mode, results_list, value),
            None => {
                let name = name.clone();
                crate::error::set_name_error(vm, &name);
                Err(())
            }
        },
        HeapObject::Cons { first, rest } => {
            let kind = special_form_kind(vm, first);
            let (frame_kind, unevaluated) = match kind {
                Some(k) => (k, rest),
                None => (FrameKind::Call, expr),
            };
            if kind.is_some() {
                validate_form_shape(vm, frame_kind, rest)?;
            }
            let nil = vm.heap().nil();
            let frame = Frame::new(frame_kind, expr, env, unevaluated, results_list, nil);
            match mode {
                EvalMode::Keep => match vm.stack_mut().push(frame) {
                    Ok(()) => Ok(()),
                    Err(_) => {
                        set_stack_overflow_error(vm);
                        Err(())
                    }
                },
                EvalMode::Remove => {
                    vm.stack_mut().swap_top(frame);
                    Ok(())
                }
            }
        }
    }
}

/// Run the top frame one step forward. Returns `Err(())` with the VM's
/// error slot set on failure; the driver loop in [`eval_top_level`] unwinds
/// to the nearest `try` frame.
pub fn step(vm: &mut Vm) -> Result<(), ()> {
    match vm.stack().top().kind {
        FrameKind::Call => step_call(vm),
        FrameKind::If => step_if(vm),
        FrameKind::Do => step_do(vm),
        FrameKind::Define => step_define(vm),
        FrameKind::Fn | FrameKind::Macro => step_fn_or_macro(vm),
        FrameKind::Import => step_import(vm),
        FrameKind::Quote => step_quote(vm),
        FrameKind::Try => step_try(vm),
    }
}

fn step_call(vm: &mut Vm) -> Result<(), ()> {
    let idx = vm.stack().top_index();
    let env = vm.stack().get(idx).env;
    let evaluated = vm.stack().get(idx).evaluated;
    let unevaluated = vm.stack().get(idx).unevaluated;
    let results_list = vm.stack().get(idx).results_list;

    // Once exactly the callee position has been evaluated, check whether it
    // names a macro: if so, the remaining (still-unevaluated) arguments are
    // bound raw, without evaluating them, instead of continuing the normal
    // peel-and-evaluate loop below.
    if let HeapObject::Cons { first: head_val, rest: tail } = vm.heap().get(evaluated).clone() {
        if matches!(vm.heap().get(tail), HeapObject::Nil) {
            if let HeapObject::Macro { env: menv, params, body } = vm.heap().get(head_val).clone() {
                let raw_args = unevaluated;
                let new_env = env_create(vm, menv)?;
                if let Err(e) = bind(vm, new_env, params, raw_args) {
                    set_binding_error(vm, e);
                    return Err(());
                }
                let expr = vm.stack().get(idx).expr;
                let nil = vm.heap().nil();
                let frame = Frame::new(FrameKind::Do, expr, new_env, body, results_list, nil);
                vm.stack_mut().swap_top(frame);
                return Ok(());
            }
        }
    }

    match vm.heap().get(unevaluated).clone() {
        HeapObject::Cons { first, rest } => {
            vm.stack_mut().get_mut(idx).unevaluated = rest;
            begin_eval(vm, EvalMode::Keep, env, first, ResultsTarget::Frame(idx))
        }
        HeapObject::Nil => {
            let ordered = reverse_list(vm, evaluated)?;
            let (callee, args) = match vm.heap().get(ordered) {
                HeapObject::Cons { first, rest } => (*first, *rest),
                _ => unreachable!("a Call frame always evaluates at least the callee position"),
            };
            dispatch_call(vm, idx, callee, args, results_list)
        }
        _ => panic!("Call frame unevaluated must be a proper list"),
    }
}

fn dispatch_call(vm: &mut Vm, idx: usize, callee: ObjRef, args: ObjRef, results_list: ResultsTarget) -> Result<(), ()> {
    match vm.heap().get(callee).clone() {
        HeapObject::Primitive { func, .. } => match func(vm, args) {
            Ok(value) => {
                save_result(vm, results_list, value)?;
                vm.stack_mut().pop();
                Ok(())
            }
            Err(()) => Err(()),
        },
        HeapObject::Closure { env: cenv, params, body } => {
            let new_env = env_create(vm, cenv)?;
            if let Err(e) = bind(vm, new_env, params, args) {
                set_binding_error(vm, e);
                return Err(());
            }
            let expr = vm.stack().get(idx).expr;
            let nil = vm.heap().nil();
            let frame = Frame::new(FrameKind::Do, expr, new_env, body, results_list, nil);
            vm.stack_mut().swap_top(frame);
            Ok(())
        }
        other => {
            set_type_error(vm, other.object_type(), &[ObjectType::Primitive, ObjectType::Closure, ObjectType::Macro]);
            Err(())
        }
    }
}

fn step_if(vm: &mut Vm) -> Result<(), ()> {
    let idx = vm.stack().top_index();
    let env = vm.stack().get(idx).env;
    let evaluated = vm.stack().get(idx).evaluated;
    let unevaluated = vm.stack().get(idx).unevaluated;
    let results_list = vm.stack().get(idx).results_list;

    if matches!(vm.heap().get(evaluated), HeapObject::Nil) {
        let cond_expr = match vm.heap().get(unevaluated) {
            HeapObject::Cons { first, .. } => *first,
            _ => unreachable!(),
        };
        return begin_eval(vm, EvalMode::Keep, env, cond_expr, ResultsTarget::Frame(idx));
    }

    let cond_val = match vm.heap().get(evaluated) {
        HeapObject::Cons { first, .. } => *first,
        _ => unreachable!(),
    };
    let truthy = !matches!(vm.heap().get(cond_val), HeapObject::Nil);
    let (then_expr, rest1) = match vm.heap().get(unevaluated) {
        HeapObject::Cons { first, rest } => (*first, *rest),
        _ => unreachable!(),
    };
    if truthy {
        begin_eval(vm, EvalMode::Remove, env, then_expr, results_list)
    } else {
        match vm.heap().get(rest1) {
            HeapObject::Cons { first, .. } => {
                let else_expr = *first;
                begin_eval(vm, EvalMode::Remove, env, else_expr, results_list)
            }
            HeapObject::Nil => {
                let nil = vm.heap().nil();
                save_result(vm, results_list, nil)?;
                vm.stack_mut().pop();
                Ok(())
            }
            _ => unreachable!(),
        }
    }
}

fn step_do(vm: &mut Vm) -> Result<(), ()> {
    let idx = vm.stack().top_index();
    let env = vm.stack().get(idx).env;
    let unevaluated = vm.stack().get(idx).unevaluated;
    let results_list = vm.stack().get(idx).results_list;

    match vm.heap().get(unevaluated).clone() {
        HeapObject::Nil => {
            let nil = vm.heap().nil();
            save_result(vm, results_list, nil)?;
            vm.stack_mut().pop();
            Ok(())
        }
        HeapObject::Cons { first, rest } => {
            if matches!(vm.heap().get(rest), HeapObject::Nil) {
                // Last form in the body: evaluate it in tail position.
                begin_eval(vm, EvalMode::Remove, env, first, results_list)
            } else {
                vm.stack_mut().get_mut(idx).unevaluated = rest;
                begin_eval(vm, EvalMode::Keep, env, first, ResultsTarget::Discard)
            }
        }
        _ => panic!("do body must be a proper list"),
    }
}

fn step_define(vm: &mut Vm) -> Result<(), ()> {
    let idx = vm.stack().top_index();
    let env = vm.stack().get(idx).env;
    let evaluated = vm.stack().get(idx).evaluated;
    // `unevaluated` keeps holding `(target value)` unchanged for the whole
    // lifetime of this frame, so `target` stays reachable as a GC root
    // through it without needing a scratch local.
    let unevaluated = vm.stack().get(idx).unevaluated;
    let results_list = vm.stack().get(idx).results_list;

    let (target, value_expr) = match vm.heap().get(unevaluated) {
        HeapObject::Cons { first, rest } => {
            let target = *first;
            let value_expr = match vm.heap().get(*rest) {
                HeapObject::Cons { first, .. } => *first,
                _ => unreachable!(),
            };
            (target, value_expr)
        }
        _ => unreachable!(),
    };

    if matches!(vm.heap().get(evaluated), HeapObject::Nil) {
        begin_eval(vm, EvalMode::Keep, env, value_expr, ResultsTarget::Frame(idx))
    } else {
        let value = match vm.heap().get(evaluated) {
            HeapObject::Cons { first, .. } => *first,
            _ => unreachable!(),
        };
        match bind(vm, env, target, value) {
            Ok(()) => {
                save_result(vm, results_list, value)?;
                vm.stack_mut().pop();
                Ok(())
            }
            Err(e) => {
                set_binding_error(vm, e);
                Err(())
            }
        }
    }
}

fn step_fn_or_macro(vm: &mut Vm) -> Result<(), ()> {
    let idx = vm.stack().top_index();
    let kind = vm.stack().get(idx).kind;
    let env = vm.stack().get(idx).env;
    let unevaluated = vm.stack().get(idx).unevaluated;
    let results_list = vm.stack().get(idx).results_list;

    let (params, body) = match vm.heap().get(unevaluated) {
        HeapObject::Cons { first, rest } => (*first, *rest),
        _ => unreachable!(),
    };
    if !matches!(vm.heap().get(params), HeapObject::Cons { .. } | HeapObject::Nil) {
        let got = type_of(vm.heap(), params);
        set_type_error(vm, got, &[ObjectType::Cons, ObjectType::Nil]);
        return Err(());
    }

    let obj = if kind == FrameKind::Fn {
        HeapObject::Closure { env, params, body }
    } else {
        HeapObject::Macro { env, params, body }
    };
    let value = vm.alloc(obj)?;
    save_result(vm, results_list, value)?;
    vm.stack_mut().pop();
    Ok(())
}

fn step_quote(vm: &mut Vm) -> Result<(), ()> {
    let idx = vm.stack().top_index();
    let unevaluated = vm.stack().get(idx).unevaluated;
    let results_list = vm.stack().get(idx).results_list;
    let x = match vm.heap().get(unevaluated) {
        HeapObject::Cons { first, .. } => *first,
        _ => unreachable!(),
    };
    save_result(vm, results_list, x)?;
    vm.stack_mut().pop();
    Ok(())
}

fn step_try(vm: &mut Vm) -> Result<(), ()> {
    let idx = vm.stack().top_index();
    let results_list = vm.stack().get(idx).results_list;

    if vm.has_error() {
        // Resumed after an unwind: wrap the pending error as `(() error)`.
        let err = vm.take_error().expect("has_error just returned true");
        let nil = vm.heap().nil();
        let tail = vm.alloc_cons(err, nil)?;
        let wrapped = vm.alloc_cons(nil, tail)?;
        save_result(vm, results_list, wrapped)?;
        vm.stack_mut().pop();
        return Ok(());
    }

    let env = vm.stack().get(idx).env;
    let evaluated = vm.stack().get(idx).evaluated;
    let unevaluated = vm.stack().get(idx).unevaluated;

    if matches!(vm.heap().get(evaluated), HeapObject::Nil) {
        let e = match vm.heap().get(unevaluated) {
            HeapObject::Cons { first, .. } => *first,
            _ => unreachable!(),
        };
        begin_eval(vm, EvalMode::Keep, env, e, ResultsTarget::Frame(idx))
    } else {
        let value = match vm.heap().get(evaluated) {
            HeapObject::Cons { first, .. } => *first,
            _ => unreachable!(),
        };
        let nil = vm.heap().nil();
        let wrapped = vm.alloc_cons(value, nil)?;
        save_result(vm, results_list, wrapped)?;
        vm.stack_mut().pop();
        Ok(())
    }
}

fn step_import(vm: &mut Vm) -> Result<(), ()> {
    let idx = vm.stack().top_index();
    let env = vm.stack().get(idx).env;
    let evaluated = vm.stack().get(idx).evaluated;
    let unevaluated = vm.stack().get(idx).unevaluated;
    let results_list = vm.stack().get(idx).results_list;

    if matches!(vm.heap().get(evaluated), HeapObject::Nil) {
        let path_expr = match vm.heap().get(unevaluated) {
            HeapObject::Cons { first, .. } => *first,
            _ => unreachable!(),
        };
        return begin_eval(vm, EvalMode::Keep, env, path_expr, ResultsTarget::Frame(idx));
    }

    let path_val = match vm.heap().get(evaluated) {
        HeapObject::Cons { first, .. } => *first,
        _ => unreachable!(),
    };
    let path = match vm.heap().get(path_val) {
        HeapObject::String(s) => s.clone(),
        other => {
            let ty = other.object_type();
            set_type_error(vm, ty, &[ObjectType::String]);
            return Err(());
        }
    };

    if vm.import_depth() >= vm.max_import_depth() {
        set_import_nesting_too_deep_error(vm);
        return Err(());
    }
    vm.enter_import();
    let outcome = import_file(vm, &path);
    vm.exit_import();

    match outcome {
        Ok(body) => {
            let expr = vm.stack().get(idx).expr;
            let nil = vm.heap().nil();
            let frame = Frame::new(FrameKind::Do, expr, env, body, results_list, nil);
            vm.stack_mut().swap_top(frame);
            Ok(())
        }
        Err(()) => Err(()),
    }
}

/// Read and parse a file into a proper list of top-level expressions, ready
/// to hand to a `Do` frame as an implicit `(do ...)` body.
fn import_file(vm: &mut Vm, path: &str) -> Result<ObjRef, ()> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(io_err) => {
            crate::error::set_os_error(vm, path, &io_err);
            return Err(());
        }
    };
    let exprs = reader::read_all(vm, &text)?;
    // `read_all` already pushed each of these onto `Vm::pending_expressions`.
    // `body` itself is rebuilt every iteration as a plain local, so without
    // rooting it too a collection triggered by the next `alloc_cons` could
    // sweep the partially-built list out from under us; track every push we
    // add here so we can release exactly this batch once `body` is handed
    // back to `step_import`, which roots it in a `Do` frame before anything
    // else can allocate.
    let mut added = exprs.len();
    let nil = vm.heap().nil();
    let mut body = nil;
    for expr in exprs.into_iter().rev() {
        let result = vm.alloc_cons(expr, body);
        match result {
            Ok(cons) => {
                body = cons;
                vm.push_pending_expression(body);
                added += 1;
            }
            Err(()) => {
                vm.drop_recent_pending_expressions(added);
                return Err(());
            }
        }
    }
    vm.drop_recent_pending_expressions(added);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Config, Vm};

    fn parse_one(vm: &mut Vm, src: &str) -> ObjRef {
        let mut exprs = reader::read_all(vm, src).unwrap();
        assert_eq!(exprs.len(), 1);
        exprs.pop().unwrap()
    }

    #[test]
    fn evaluates_self_evaluating_literal() {
        let mut vm = Vm::new(Config::default());
        let env = vm.globals();
        let expr = parse_one(&mut vm, "42");
        let result = eval_top_level(&mut vm, env, expr).unwrap();
        assert!(matches!(vm.heap().get(result), HeapObject::Int(42)));
    }

    #[test]
    fn if_picks_the_taken_branch() {
        let mut vm = Vm::new(Config::default());
        let env = vm.globals();
        let expr = parse_one(&mut vm, "(if 1 10 20)");
        let result = eval_top_level(&mut vm, env, expr).unwrap();
        assert!(matches!(vm.heap().get(result), HeapObject::Int(10)));
    }

    #[test]
    fn define_then_reference_in_do() {
        let mut vm = Vm::new(Config::default());
        let env = vm.globals();
        let expr = parse_one(&mut vm, "(do (define x 5) (+ x 1))");
        let result = eval_top_level(&mut vm, env, expr).unwrap();
        assert!(matches!(vm.heap().get(result), HeapObject::Int(6)));
    }

    #[test]
    fn closure_call_and_recursion() {
        let mut vm = Vm::new(Config::default());
        let env = vm.globals();
        let expr = parse_one(
            &mut vm,
            "(do (define count-down (fn (n) (if n (count-down (- n 1)) 0))) (count-down 100000))",
        );
        let result = eval_top_level(&mut vm, env, expr).unwrap();
        assert!(matches!(vm.heap().get(result), HeapObject::Int(0)));
    }

    #[test]
    fn try_catches_an_uncaught_name_error() {
        let mut vm = Vm::new(Config::default());
        let env = vm.globals();
        let expr = parse_one(&mut vm, "(try undefined-name)");
        let result = eval_top_level(&mut vm, env, expr).unwrap();
        assert_eq!(list_len(vm.heap(), result), Some(2));
    }

    #[test]
    fn quote_suppresses_evaluation() {
        let mut vm = Vm::new(Config::default());
        let env = vm.globals();
        let expr = parse_one(&mut vm, "(quote (1 2 undefined-name))");
        let result = eval_top_level(&mut vm, env, expr).unwrap();
        assert_eq!(list_len(vm.heap(), result), Some(3));
    }

    #[test]
    fn macro_receives_unevaluated_arguments() {
        let mut vm = Vm::new(Config::default());
        let env = vm.globals();
        let expr = parse_one(
            &mut vm,
            "(do (define noop (macro (x) (quote 99))) (noop undefined-name))",
        );
        let result = eval_top_level(&mut vm, env, expr).unwrap();
        assert!(matches!(vm.heap().get(result), HeapObject::Int(99)));
    }

    #[test]
    fn uncaught_error_propagates_out_of_eval_top_level() {
        let mut vm = Vm::new(Config::default());
        let env = vm.globals();
        let expr = parse_one(&mut vm, "undefined-name");
        assert!(eval_top_level(&mut vm, env, expr).is_err());
    }
}
