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

//! The built-in global bindings. Grounded on the source's `primitives.c`
//! (the older, smaller `+ - * / list first rest prepend eq? print exit`
//! surface) and `src/vm/primitives.c` (the fuller revision adding
//! `not type traceback throw dict get put str repr`), reconciled against
//! this spec's own argument-order decision for `get`/`put`
//! (`(dict, key[, value])`, not the source's `(key[, value], dict)`).
//!
//! Every primitive validates its own arity and argument types before doing
//! any work, mirroring the source's `guard_is_one_of` / arity-check
//! discipline — each produces `CallError` or `TypeError` up front rather
//! than failing partway through.

use std::io::Write as _;

use crate::dict;
use crate::environment::env_define;
use crate::error::{set_call_error, set_key_error, set_type_error, set_zero_division_error};
use crate::eval::reverse_list;
use crate::object::{self, list_len, type_of, HeapObject, ObjRef, ObjectType};
use crate::vm::Vm;

/// Install every primitive binding, plus the `true` canonical symbol, into
/// the VM's globals environment.
pub fn install(vm: &mut Vm) {
    define_true(vm);

    define_primitive(vm, "+", plus);
    define_primitive(vm, "-", minus);
    define_primitive(vm, "*", star);
    define_primitive(vm, "/", slash);
    define_primitive(vm, "eq?", eq);
    define_primitive(vm, "not", not);
    define_primitive(vm, "list", list);
    define_primitive(vm, "first", first);
    define_primitive(vm, "rest", rest);
    define_primitive(vm, "prepend", prepend);
    define_primitive(vm, "reverse", reverse);
    define_primitive(vm, "concat", concat);
    define_primitive(vm, "dict", make_dict);
    define_primitive(vm, "get", get);
    define_primitive(vm, "put", put);
    define_primitive(vm, "str", str_fn);
    define_primitive(vm, "repr", repr_fn);
    define_primitive(vm, "print", print_fn);
    define_primitive(vm, "type", type_fn);
    define_primitive(vm, "traceback", traceback_fn);
    define_primitive(vm, "throw", throw);
    define_primitive(vm, "exit", exit_fn);
}

fn define_true(vm: &mut Vm) {
    let name = vm.intern_symbol("true").expect("bootstrap allocation cannot fail");
    let globals = vm.globals();
    env_define(vm, globals, name, name).expect("bootstrap allocation cannot fail");
}

fn define_primitive(vm: &mut Vm, name: &'static str, func: crate::object::PrimitiveFn) {
    let value = vm.alloc(HeapObject::Primitive { name, func }).expect("bootstrap allocation cannot fail");
    let symbol = vm.intern_symbol(name).expect("bootstrap allocation cannot fail");
    let globals = vm.globals();
    env_define(vm, globals, symbol, value).expect("bootstrap allocation cannot fail");
}

fn true_value(vm: &mut Vm) -> ObjRef {
    vm.constant_symbol("true")
}

/// Walk a proper argument list into a `Vec`. Arguments always arrive as a
/// proper list built by `dispatch_call`'s `reverse_list`, so an improper
/// spine here would be an evaluator bug, not user input.
fn args_vec(vm: &Vm, mut args: ObjRef) -> Vec<ObjRef> {
    let mut out = Vec::new();
    loop {
        match vm.heap().get(args) {
            HeapObject::Nil => return out,
            HeapObject::Cons { first, rest } => {
                out.push(*first);
                args = *rest;
            }
            _ => panic!("primitive argument list must be proper"),
        }
    }
}

fn expect_arity(vm: &mut Vm, name: &str, got: usize, expected: usize) -> Result<(), ()> {
    if got == expected {
        Ok(())
    } else {
        set_call_error(vm, name, expected, got);
        Err(())
    }
}

fn expect_int(vm: &mut Vm, obj: ObjRef) -> Result<i64, ()> {
    match vm.heap().get(obj) {
        HeapObject::Int(n) => Ok(*n),
        _ => {
            let got = type_of(vm.heap(), obj);
            set_type_error(vm, got, &[ObjectType::Int]);
            Err(())
        }
    }
}

fn expect_cons(vm: &mut Vm, obj: ObjRef) -> Result<(ObjRef, ObjRef), ()> {
    match vm.heap().get(obj) {
        HeapObject::Cons { first, rest } => Ok((*first, *rest)),
        _ => {
            let got = type_of(vm.heap(), obj);
            set_type_error(vm, got, &[ObjectType::Cons]);
            Err(())
        }
    }
}

fn expect_list_shape(vm: &mut Vm, obj: ObjRef) -> Result<(), ()> {
    if list_len(vm.heap(), obj).is_some() {
        Ok(())
    } else {
        let got = type_of(vm.heap(), obj);
        set_type_error(vm, got, &[ObjectType::Cons, ObjectType::Nil]);
        Err(())
    }
}

fn expect_dict_shape(vm: &mut Vm, obj: ObjRef) -> Result<(), ()> {
    if matches!(vm.heap().get(obj), HeapObject::Dict { .. } | HeapObject::Nil) {
        Ok(())
    } else {
        let got = type_of(vm.heap(), obj);
        set_type_error(vm, got, &[ObjectType::Dict, ObjectType::Nil]);
        Err(())
    }
}

fn plus(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let mut total: i64 = 0;
    for a in args_vec(vm, args) {
        total += expect_int(vm, a)?;
    }
    vm.alloc_int(total)
}

fn minus(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    match xs.split_first() {
        None => vm.alloc_int(0),
        Some((first, rest)) => {
            let first = expect_int(vm, *first)?;
            if rest.is_empty() {
                return vm.alloc_int(first);
            }
            let mut total = first;
            for a in rest {
                total -= expect_int(vm, *a)?;
            }
            vm.alloc_int(total)
        }
    }
}

fn star(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let mut total: i64 = 1;
    for a in args_vec(vm, args) {
        total *= expect_int(vm, a)?;
    }
    vm.alloc_int(total)
}

fn slash(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    match xs.split_first() {
        None => vm.alloc_int(1),
        Some((first, rest)) => {
            let first = expect_int(vm, *first)?;
            if rest.is_empty() {
                return vm.alloc_int(first);
            }
            let mut total = first;
            for a in rest {
                let divisor = expect_int(vm, *a)?;
                if divisor == 0 {
                    set_zero_division_error(vm);
                    return Err(());
                }
                total /= divisor;
            }
            vm.alloc_int(total)
        }
    }
}

fn eq(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "eq?", xs.len(), 2)?;
    if object::equals(vm.heap(), xs[0], xs[1]) {
        Ok(true_value(vm))
    } else {
        Ok(vm.heap().nil())
    }
}

fn not(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "not", xs.len(), 1)?;
    if matches!(vm.heap().get(xs[0]), HeapObject::Nil) {
        Ok(true_value(vm))
    } else {
        Ok(vm.heap().nil())
    }
}

fn list(_vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    Ok(args)
}

fn first(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "first", xs.len(), 1)?;
    let (head, _) = expect_cons(vm, xs[0])?;
    Ok(head)
}

fn rest(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "rest", xs.len(), 1)?;
    let (_, tail) = expect_cons(vm, xs[0])?;
    Ok(tail)
}

fn prepend(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "prepend", xs.len(), 2)?;
    expect_list_shape(vm, xs[1])?;
    vm.alloc_cons(xs[0], xs[1])
}

fn reverse(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "reverse", xs.len(), 1)?;
    expect_list_shape(vm, xs[0])?;
    reverse_list(vm, xs[0])
}

fn concat(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "concat", xs.len(), 2)?;
    expect_list_shape(vm, xs[0])?;
    expect_list_shape(vm, xs[1])?;
    let reversed_left = reverse_list(vm, xs[0])?;
    let mut out = xs[1];
    let mut cur = reversed_left;
    loop {
        match vm.heap().get(cur) {
            HeapObject::Nil => return Ok(out),
            HeapObject::Cons { first, rest } => {
                let (first, rest) = (*first, *rest);
                out = vm.alloc_cons(first, out)?;
                cur = rest;
            }
            _ => unreachable!("reverse_list always returns a proper list"),
        }
    }
}

fn make_dict(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    if xs.len() % 2 != 0 {
        set_call_error(vm, "dict", xs.len() + 1, xs.len());
        return Err(());
    }
    let mut d = vm.heap().nil();
    for pair in xs.chunks(2) {
        d = dict::put(vm, d, pair[0], pair[1])?;
    }
    Ok(d)
}

fn get(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "get", xs.len(), 2)?;
    expect_dict_shape(vm, xs[0])?;
    match dict::get(vm.heap(), xs[0], xs[1]) {
        Some(v) => Ok(v),
        None => {
            set_key_error(vm, xs[1]);
            Err(())
        }
    }
}

fn put(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "put", xs.len(), 3)?;
    expect_dict_shape(vm, xs[0])?;
    dict::put(vm, xs[0], xs[1], xs[2])
}

fn str_fn(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "str", xs.len(), 1)?;
    let text = object::print_form(vm.heap(), xs[0]);
    vm.alloc_string(text)
}

fn repr_fn(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "repr", xs.len(), 1)?;
    let text = object::repr(vm.heap(), xs[0]);
    vm.alloc_string(text)
}

fn print_fn(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    let rendered: Vec<String> = xs.iter().map(|&x| object::print_form(vm.heap(), x)).collect();
    println!("{}", rendered.join(" "));
    let _ = std::io::stdout().flush();
    Ok(vm.heap().nil())
}

fn type_fn(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "type", xs.len(), 1)?;
    let name = type_of(vm.heap(), xs[0]).to_string();
    vm.intern_symbol(&name)
}

/// Returns the current call stack (innermost-to-outermost), excluding the
/// `(traceback)` call's own frame — mirrors the source's `traceback_try_get`
/// followed by `object_list_shift` to drop the first element, though this
/// spec's `traceback` primitive contract orders the opposite way from the
/// error-traceback's outermost-first convention (§4.J / §4.F).
fn traceback_fn(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "traceback", xs.len(), 0)?;
    let exprs: Vec<ObjRef> = vm.stack().iter_from_top().skip(1).map(|f| f.expr).collect();
    let mut list = vm.heap().nil();
    for expr in exprs.into_iter().rev() {
        list = vm.alloc_cons(expr, list)?;
    }
    Ok(list)
}

fn throw(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "throw", xs.len(), 1)?;
    if matches!(vm.heap().get(xs[0]), HeapObject::Nil) {
        set_type_error(vm, ObjectType::Nil, &[ObjectType::Int, ObjectType::String, ObjectType::Symbol, ObjectType::Cons, ObjectType::Dict]);
        return Err(());
    }
    vm.set_error_slot(xs[0]);
    Err(())
}

fn exit_fn(vm: &mut Vm, args: ObjRef) -> Result<ObjRef, ()> {
    let xs = args_vec(vm, args);
    expect_arity(vm, "exit", xs.len(), 0)?;
    vm.request_exit();
    Ok(vm.heap().nil())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::eval_top_level;
    use crate::reader::read_all;
    use crate::vm::{Config, Vm};

    fn eval_str(vm: &mut Vm, src: &str) -> ObjRef {
        let mut exprs = read_all(vm, src).unwrap();
        assert_eq!(exprs.len(), 1);
        let expr = exprs.pop().unwrap();
        let env = vm.globals();
        eval_top_level(vm, env, expr).unwrap()
    }

    #[test]
    fn arithmetic_primitives() {
        let mut vm = Vm::new(Config::default());
        let r = eval_str(&mut vm, "(+ 1 2 3)");
        assert!(matches!(vm.heap().get(r), HeapObject::Int(6)));
        let r = eval_str(&mut vm, "(- 10 1 2)");
        assert!(matches!(vm.heap().get(r), HeapObject::Int(7)));
        let r = eval_str(&mut vm, "(*)");
        assert!(matches!(vm.heap().get(r), HeapObject::Int(1)));
        let r = eval_str(&mut vm, "(/)");
        assert!(matches!(vm.heap().get(r), HeapObject::Int(1)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut vm = Vm::new(Config::default());
        let mut exprs = read_all(&mut vm, "(/ 1 0)").unwrap();
        let expr = exprs.pop().unwrap();
        let env = vm.globals();
        assert!(eval_top_level(&mut vm, env, expr).is_err());
    }

    #[test]
    fn list_primitives_round_trip() {
        let mut vm = Vm::new(Config::default());
        let r = eval_str(&mut vm, "(reverse (list 1 2 3))");
        assert_eq!(list_len(vm.heap(), r), Some(3));
        assert_eq!(object::repr(vm.heap(), r), "(3 2 1)");
    }

    #[test]
    fn concat_joins_two_lists() {
        let mut vm = Vm::new(Config::default());
        let r = eval_str(&mut vm, "(concat (list 1 2) (list 3 4))");
        assert_eq!(object::repr(vm.heap(), r), "(1 2 3 4)");
    }

    #[test]
    fn dict_get_put_use_dict_key_order() {
        let mut vm = Vm::new(Config::default());
        let r = eval_str(&mut vm, "(get (put (dict) 'a 1) 'a)");
        assert!(matches!(vm.heap().get(r), HeapObject::Int(1)));
    }

    #[test]
    fn get_missing_key_is_a_key_error() {
        let mut vm = Vm::new(Config::default());
        let mut exprs = read_all(&mut vm, "(get (dict) 'missing)").unwrap();
        let expr = exprs.pop().unwrap();
        let env = vm.globals();
        assert!(eval_top_level(&mut vm, env, expr).is_err());
    }

    #[test]
    fn type_returns_symbol_name() {
        let mut vm = Vm::new(Config::default());
        let r = eval_str(&mut vm, "(type 5)");
        assert!(matches!(vm.heap().get(r), HeapObject::Symbol(s) if s == "int"));
    }

    #[test]
    fn throw_sets_error_slot_directly_to_its_argument() {
        let mut vm = Vm::new(Config::default());
        let mut exprs = read_all(&mut vm, "(throw 42)").unwrap();
        let expr = exprs.pop().unwrap();
        let env = vm.globals();
        let err = eval_top_level(&mut vm, env, expr).unwrap_err();
        assert!(matches!(vm.heap().get(err), HeapObject::Int(42)));
    }

    #[test]
    fn exit_requests_driver_to_stop() {
        let mut vm = Vm::new(Config::default());
        eval_str(&mut vm, "(exit)");
        assert!(vm.exit_requested());
    }
}
