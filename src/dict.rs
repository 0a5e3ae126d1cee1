//! Persistent AVL-tree dictionaries.
//!
//! A `Dict` value is either the shared `Nil` object (the empty dict) or a
//! `HeapObject::Dict` node holding a key, a value, a `height`/`size` pair used
//! to keep the tree balanced, and `left`/`right` subtree handles. `put`
//! rebuilds the path to the inserted key rather than mutating existing nodes,
//! matching §3.2's "Dict contents are logically immutable to user code": an
//! old `Dict` value keeps denoting the same entries after a `put` on it.
//!
//! Grounded on the source's `src/object/dict.c`, which implements the same
//! AVL rotations over an `Object_Dict` node embedded in the tagged `Object`
//! union.

use std::cmp::Ordering;

use crate::object::{equals, compare, HeapObject, ObjRef};
use crate::heap::Heap;
use crate::vm::Vm;

pub fn size(heap: &Heap, r: ObjRef) -> usize {
    match heap.get(r) {
        HeapObject::Nil => 0,
        HeapObject::Dict { size, .. } => *size,
        _ => panic!("dict::size called on a non-dict object"),
    }
}

fn height(heap: &Heap, r: ObjRef) -> i64 {
    match heap.get(r) {
        HeapObject::Nil => 0,
        HeapObject::Dict { height, .. } => *height,
        _ => panic!("dict::height called on a non-dict object"),
    }
}

fn node(heap: &Heap, r: ObjRef) -> (ObjRef, ObjRef, ObjRef, ObjRef) {
    match heap.get(r) {
        HeapObject::Dict { key, value, left, right, .. } => (*key, *value, *left, *right),
        _ => panic!("dict::node called on a non-dict object"),
    }
}

/// Find the value bound to `key`, walking by `compare`-order like a plain
/// binary search tree (the structure is ordered, not hashed).
pub fn get(heap: &Heap, root: ObjRef, key: ObjRef) -> Option<ObjRef> {
    if matches!(heap.get(root), HeapObject::Nil) {
        return None;
    }
    let (k, v, left, right) = node(heap, root);
    match compare(heap, key, k) {
        Some(Ordering::Less) => get(heap, left, key),
        Some(Ordering::Greater) => get(heap, right, key),
        Some(Ordering::Equal) => Some(v),
        None => {
            if equals(heap, key, k) {
                Some(v)
            } else {
                get(heap, left, key).or_else(|| get(heap, right, key))
            }
        }
    }
}

/// In-order traversal, yielding `(key, value)` pairs in ascending key order.
/// This also defines the iteration/print order for `repr`.
pub fn entries(heap: &Heap, root: ObjRef) -> Vec<(ObjRef, ObjRef)> {
    let mut out = Vec::new();
    entries_into(heap, root, &mut out);
    out
}

fn entries_into(heap: &Heap, root: ObjRef, out: &mut Vec<(ObjRef, ObjRef)>) {
    if matches!(heap.get(root), HeapObject::Nil) {
        return;
    }
    let (k, v, left, right) = node(heap, root);
    entries_into(heap, left, out);
    out.push((k, v));
    entries_into(heap, right, out);
}

fn make_node(vm: &mut Vm, key: ObjRef, value: ObjRef, left: ObjRef, right: ObjRef) -> Result<ObjRef, ()> {
    let h = 1 + height(vm.heap(), left).max(height(vm.heap(), right));
    let s = 1 + size(vm.heap(), left) + size(vm.heap(), right);
    vm.alloc(HeapObject::Dict {
        key,
        value,
        height: h,
        size: s,
        left,
        right,
    })
}

fn balance_factor(heap: &Heap, r: ObjRef) -> i64 {
    let (_, _, left, right) = node(heap, r);
    height(heap, right) - height(heap, left)
}

fn rotate_left(vm: &mut Vm, q: ObjRef) -> Result<ObjRef, ()> {
    let (qk, qv, qleft, p) = node(vm.heap(), q);
    let (pk, pv, pleft, pright) = node(vm.heap(), p);
    let new_q = make_node(vm, qk, qv, qleft, pleft)?;
    make_node(vm, pk, pv, new_q, pright)
}

fn rotate_right(vm: &mut Vm, p: ObjRef) -> Result<ObjRef, ()> {
    let (pk, pv, q, pright) = node(vm.heap(), p);
    let (qk, qv, qleft, qright) = node(vm.heap(), q);
    let new_p = make_node(vm, pk, pv, qright, pright)?;
    make_node(vm, qk, qv, qleft, new_p)
}

fn balance(vm: &mut Vm, r: ObjRef) -> Result<ObjRef, ()> {
    let factor = balance_factor(vm.heap(), r);
    if factor == 2 {
        let (_, _, _, right) = node(vm.heap(), r);
        let r = if balance_factor(vm.heap(), right) < 0 {
            let (rk, rv, rleft, rright) = node(vm.heap(), r);
            let new_right = rotate_right(vm, right)?;
            make_node(vm, rk, rv, rleft, new_right)?
        } else {
            r
        };
        return rotate_left(vm, r);
    }
    if factor == -2 {
        let (_, _, left, _) = node(vm.heap(), r);
        let r = if balance_factor(vm.heap(), left) > 0 {
            let (rk, rv, rleft, rright) = node(vm.heap(), r);
            let new_left = rotate_left(vm, left)?;
            make_node(vm, rk, rv, new_left, rright)?
        } else {
            r
        };
        return rotate_right(vm, r);
    }
    Ok(r)
}

/// Return a new dict with `key` bound to `value`, replacing any existing
/// binding for `key`. Non-destructive: `root` continues to denote its
/// original entries.
pub fn put(vm: &mut Vm, root: ObjRef, key: ObjRef, value: ObjRef) -> Result<ObjRef, ()> {
    if matches!(vm.heap().get(root), HeapObject::Nil) {
        return make_node(vm, key, value, vm.heap().nil(), vm.heap().nil());
    }

    let (k, v, left, right) = node(vm.heap(), root);
    let ord = compare(vm.heap(), key, k).unwrap_or(if equals(vm.heap(), key, k) {
        Ordering::Equal
    } else {
        Ordering::Less
    });

    let rebuilt = match ord {
        Ordering::Equal => make_node(vm, k, value, left, right)?,
        Ordering::Less => {
            let new_left = put(vm, left, key, value)?;
            make_node(vm, k, v, new_left, right)?
        }
        Ordering::Greater => {
            let new_right = put(vm, right, key, value)?;
            make_node(vm, k, v, left, new_right)?
        }
    };

    balance(vm, rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{Config, Vm};

    #[test]
    fn put_then_get_roundtrips() {
        let mut vm = Vm::new(Config::default());
        let nil = vm.heap().nil();
        let k = vm.alloc_symbol("a").unwrap();
        let v = vm.alloc_int(1).unwrap();
        let d = put(&mut vm, nil, k, v).unwrap();
        assert_eq!(size(vm.heap(), d), 1);
        let got = get(vm.heap(), d, k).unwrap();
        assert!(equals(vm.heap(), got, v));
    }

    #[test]
    fn put_is_non_destructive() {
        let mut vm = Vm::new(Config::default());
        let nil = vm.heap().nil();
        let k = vm.alloc_symbol("a").unwrap();
        let v1 = vm.alloc_int(1).unwrap();
        let v2 = vm.alloc_int(2).unwrap();
        let d1 = put(&mut vm, nil, k, v1).unwrap();
        let d2 = put(&mut vm, d1, k, v2).unwrap();
        assert!(equals(vm.heap(), get(vm.heap(), d1, k).unwrap(), v1));
        assert!(equals(vm.heap(), get(vm.heap(), d2, k).unwrap(), v2));
    }

    #[test]
    fn many_inserts_stay_balanced_and_gettable() {
        let mut vm = Vm::new(Config::default());
        let mut d = vm.heap().nil();
        let mut keys = Vec::new();
        for i in 0..50 {
            let k = vm.alloc_int(i).unwrap();
            let v = vm.alloc_int(i * 10).unwrap();
            d = put(&mut vm, d, k, v).unwrap();
            keys.push(k);
        }
        assert_eq!(size(vm.heap(), d), 50);
        for (i, k) in keys.iter().enumerate() {
            let got = get(vm.heap(), d, *k).unwrap();
            assert!(matches!(vm.heap().get(got), HeapObject::Int(n) if *n == i as i64 * 10));
        }
    }
}
