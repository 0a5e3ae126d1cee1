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

//! Environments and destructuring bind.
//!
//! An environment is a chain of scopes: a `Cons` whose `first` is the
//! innermost scope (a `Dict` from symbol to value) and whose `rest` is the
//! enclosing environment (`Cons` or `Nil`). This is the dict-per-scope model
//! the specification picked over the source's other, list-of-binding-lists
//! environment representation, because it lets `get`/`put` treat a scope
//! uniformly as a `Dict`.

use crate::dict;
use crate::heap::Heap;
use crate::object::{list_len, type_of, HeapObject, ObjRef, ObjectType};
use crate::vm::Vm;

/// Why a `bind` call failed, before any environment mutation took place.
/// Mirrors the source's `Binding_Error` variants (`src/vm/bindings.c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    InvalidTargetType,
    InvalidVariadicSyntax,
    ValueCountMismatch { expected: usize, is_variadic: bool, got: usize },
    CannotUnpack(ObjectType),
    AllocationFailed,
}

/// Wrap a fresh, empty scope around `base`.
pub fn env_create(vm: &mut Vm, base: ObjRef) -> Result<ObjRef, ()> {
    let nil = vm.heap().nil();
    vm.alloc(HeapObject::Cons { first: nil, rest: base })
}

/// Insert `name -> value` into the innermost scope of `env`.
pub fn env_define(vm: &mut Vm, env: ObjRef, name: ObjRef, value: ObjRef) -> Result<(), ()> {
    let scope = match vm.heap().get(env) {
        HeapObject::Cons { first, .. } => *first,
        _ => panic!("env_define: not an environment"),
    };
    let new_scope = dict::put(vm, scope, name, value)?;
    match vm.heap_mut().get_mut(env) {
        HeapObject::Cons { first, .. } => *first = new_scope,
        _ => unreachable!(),
    }
    Ok(())
}

/// Walk scopes from innermost outward; `None` on a miss (the caller reports
/// `NameError`).
pub fn env_find(heap: &Heap, env: ObjRef, name: ObjRef) -> Option<ObjRef> {
    let mut cur = env;
    loop {
        match heap.get(cur) {
            HeapObject::Nil => return None,
            HeapObject::Cons { first, rest } => {
                if let Some(v) = dict::get(heap, *first, name) {
                    return Some(v);
                }
                cur = *rest;
            }
            _ => panic!("env_find: malformed environment chain"),
        }
    }
}

fn is_variadic_marker(heap: &Heap, obj: ObjRef) -> bool {
    matches!(heap.get(obj), HeapObject::Symbol(s) if s == "&")
}

fn is_valid_target(heap: &Heap, target: ObjRef) -> Result<(), BindError> {
    match heap.get(target) {
        HeapObject::Symbol(_) | HeapObject::Nil => Ok(()),
        HeapObject::Cons { first, rest } => {
            if is_variadic_marker(heap, *first) {
                match heap.get(*rest) {
                    HeapObject::Cons { first: last_target, rest: tail } => {
                        if !matches!(heap.get(*tail), HeapObject::Nil) {
                            return Err(BindError::InvalidVariadicSyntax);
                        }
                        is_valid_target(heap, *last_target)
                    }
                    _ => Err(BindError::InvalidVariadicSyntax),
                }
            } else {
                is_valid_target(heap, *first)?;
                is_valid_target(heap, *rest)
            }
        }
        _ => Err(BindError::InvalidTargetType),
    }
}

/// Count positional sub-targets; `true` if a `&` tail marker terminates the
/// list early.
fn count_targets(heap: &Heap, target: ObjRef) -> (usize, bool) {
    let mut count = 0;
    let mut cur = target;
    loop {
        match heap.get(cur) {
            HeapObject::Nil => return (count, false),
            HeapObject::Cons { first, rest } => {
                if is_variadic_marker(heap, *first) {
                    return (count, true);
                }
                count += 1;
                cur = *rest;
            }
            _ => return (count, false),
        }
    }
}

fn is_valid_value(heap: &Heap, target: ObjRef, value: ObjRef) -> Result<(), BindError> {
    match heap.get(target) {
        HeapObject::Symbol(_) => Ok(()),
        HeapObject::Nil => {
            if matches!(heap.get(value), HeapObject::Nil) {
                Ok(())
            } else {
                Err(BindError::ValueCountMismatch { expected: 0, is_variadic: false, got: list_len(heap, value).unwrap_or(1) })
            }
        }
        HeapObject::Cons { first, rest } => {
            if is_variadic_marker(heap, *first) {
                let last_target = match heap.get(*rest) {
                    HeapObject::Cons { first: last_target, .. } => *last_target,
                    _ => unreachable!("is_valid_target already validated variadic syntax"),
                };
                if list_len(heap, value).is_none() {
                    return Err(BindError::CannotUnpack(type_of(heap, value)));
                }
                return is_valid_value(heap, last_target, value);
            }

            let (expected, is_variadic) = count_targets(heap, target);
            let got = match list_len(heap, value) {
                Some(n) => n,
                None => return Err(BindError::CannotUnpack(type_of(heap, value))),
            };
            let mismatch = if is_variadic { got < expected } else { got != expected };
            if mismatch {
                return Err(BindError::ValueCountMismatch { expected, is_variadic, got });
            }

            let (v_first, v_rest) = match heap.get(value) {
                HeapObject::Cons { first, rest } => (*first, *rest),
                _ => unreachable!("the length check above confirmed value is a non-empty list"),
            };
            is_valid_value(heap, *first, v_first)?;
            is_valid_value(heap, *rest, v_rest)
        }
        _ => unreachable!("is_valid_target already rejected this target shape"),
    }
}

fn bind_validated(vm: &mut Vm, env: ObjRef, target: ObjRef, value: ObjRef) -> Result<(), BindError> {
    match vm.heap().get(target) {
        HeapObject::Symbol(_) => env_define(vm, env, target, value).map_err(|_| BindError::AllocationFailed),
        HeapObject::Nil => Ok(()),
        HeapObject::Cons { first, rest } => {
            let (first, rest) = (*first, *rest);
            if is_variadic_marker(vm.heap(), first) {
                let last_target = match vm.heap().get(rest) {
                    HeapObject::Cons { first, .. } => *first,
                    _ => unreachable!(),
                };
                bind_validated(vm, env, last_target, value)
            } else {
                let (v_first, v_rest) = match vm.heap().get(value) {
                    HeapObject::Cons { first, rest } => (*first, *rest),
                    _ => unreachable!("is_valid_value already confirmed value is a list of matching shape"),
                };
                bind_validated(vm, env, first, v_first)?;
                bind_validated(vm, env, rest, v_rest)
            }
        }
        _ => unreachable!("is_valid_target already rejected this target shape"),
    }
}

/// Destructuring bind: validate target shape, then value shape against it,
/// then perform the recursive bind. Nothing is defined in `env` unless both
/// validations pass.
pub fn bind(vm: &mut Vm, env: ObjRef, target: ObjRef, value: ObjRef) -> Result<(), BindError> {
    is_valid_target(vm.heap(), target)?;
    is_valid_value(vm.heap(), target, value)?;
    bind_validated(vm, env, target, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Config, Vm};

    #[test]
    fn define_then_find() {
        let mut vm = Vm::new(Config::default());
        let nil = vm.heap().nil();
        let env = env_create(&mut vm, nil).unwrap();
        let name = vm.alloc_symbol("x").unwrap();
        let value = vm.alloc_int(10).unwrap();
        env_define(&mut vm, env, name, value).unwrap();
        let found = env_find(vm.heap(), env, name).unwrap();
        assert!(matches!(vm.heap().get(found), HeapObject::Int(10)));
    }

    #[test]
    fn find_walks_outward_through_enclosing_scopes() {
        let mut vm = Vm::new(Config::default());
        let nil = vm.heap().nil();
        let outer = env_create(&mut vm, nil).unwrap();
        let name = vm.alloc_symbol("x").unwrap();
        let value = vm.alloc_int(1).unwrap();
        env_define(&mut vm, outer, name, value).unwrap();
        let inner = env_create(&mut vm, outer).unwrap();
        let found = env_find(vm.heap(), inner, name).unwrap();
        assert!(matches!(vm.heap().get(found), HeapObject::Int(1)));
    }

    #[test]
    fn bind_symbol_target() {
        let mut vm = Vm::new(Config::default());
        let nil = vm.heap().nil();
        let env = env_create(&mut vm, nil).unwrap();
        let target = vm.alloc_symbol("x").unwrap();
        let value = vm.alloc_int(5).unwrap();
        bind(&mut vm, env, target, value).unwrap();
        assert!(matches!(vm.heap().get(env_find(vm.heap(), env, target).unwrap()), HeapObject::Int(5)));
    }

    #[test]
    fn bind_variadic_tail() {
        let mut vm = Vm::new(Config::default());
        let nil = vm.heap().nil();
        let env = env_create(&mut vm, nil).unwrap();

        let amp = vm.alloc_symbol("&").unwrap();
        let rest_name = vm.alloc_symbol("rest").unwrap();
        let rest_list = vm.alloc_cons(rest_name, nil).unwrap();
        let amp_cons = vm.alloc_cons(amp, rest_list).unwrap();
        let x = vm.alloc_symbol("x").unwrap();
        let target = vm.alloc_cons(x, amp_cons).unwrap();

        let v1 = vm.alloc_int(1).unwrap();
        let v2 = vm.alloc_int(2).unwrap();
        let v3 = vm.alloc_int(3).unwrap();
        let tail_val = vm.alloc_cons(v2, vm.heap().nil()).unwrap();
        let tail_val = vm.alloc_cons(v3, tail_val).unwrap();
        let value = vm.alloc_cons(v1, tail_val).unwrap();

        bind(&mut vm, env, target, value).unwrap();
        let bound_rest = env_find(vm.heap(), env, rest_name).unwrap();
        assert_eq!(list_len(vm.heap(), bound_rest), Some(2));
    }

    #[test]
    fn bind_rejects_count_mismatch_without_partial_define() {
        let mut vm = Vm::new(Config::default());
        let nil = vm.heap().nil();
        let env = env_create(&mut vm, nil).unwrap();
        let x = vm.alloc_symbol("x").unwrap();
        let y = vm.alloc_symbol("y").unwrap();
        let target = vm.alloc_cons(x, vm.alloc_cons(y, nil).unwrap()).unwrap();
        let v1 = vm.alloc_int(1).unwrap();
        let value = vm.alloc_cons(v1, nil).unwrap();

        let err = bind(&mut vm, env, target, value).unwrap_err();
        assert!(matches!(err, BindError::ValueCountMismatch { expected: 2, is_variadic: false, got: 1 }));
        assert!(env_find(vm.heap(), env, x).is_none());
    }

    #[test]
    fn bind_rejects_unpacking_a_non_list_into_a_nested_target() {
        let mut vm = Vm::new(Config::default());
        let nil = vm.heap().nil();
        let env = env_create(&mut vm, nil).unwrap();
        let a = vm.alloc_symbol("a").unwrap();
        let b = vm.alloc_symbol("b").unwrap();
        let c = vm.alloc_symbol("c").unwrap();
        let inner_target = vm.alloc_cons(a, vm.alloc_cons(b, nil).unwrap()).unwrap();
        let target = vm.alloc_cons(inner_target, vm.alloc_cons(c, nil).unwrap()).unwrap();

        // value: (1 2) -- first element is an Int, not a list, so it cannot
        // be unpacked into the nested target (a b).
        let v1 = vm.alloc_int(1).unwrap();
        let v2 = vm.alloc_int(2).unwrap();
        let value = vm.alloc_cons(v1, vm.alloc_cons(v2, nil).unwrap()).unwrap();

        let err = bind(&mut vm, env, target, value).unwrap_err();
        assert!(matches!(err, BindError::CannotUnpack(ObjectType::Int)));
        assert!(env_find(vm.heap(), env, c).is_none());
    }
}
