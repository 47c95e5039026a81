//! Per-type method-class dispatch tables.
//!
//! Unary operators dispatch on the single operand's type; binary operators
//! single-dispatch on the left operand's type. A missing table entry is a
//! [`ExcType::Type`] error naming the operator and the operand's type, not
//! a panic.

use std::rc::Rc;

use super::heap::Heap;
use super::{HeapValue, Value};
use crate::error::{ExcType, RunError, RunResult};
use crate::interp::symbols::{BinaryOp, UnaryOp};

pub fn call_unary(op: UnaryOp, operand: &Value, heap: &Heap) -> RunResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy(heap))),
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOp::Neg, Value::Double(d)) => Ok(Value::Double(-d)),
        (UnaryOp::Neg, other) => Err(other.type_error_for(heap, &op.builtin_name())),
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some((*a as f64, *b as f64)),
        (Value::Int(a), Value::Double(b)) => Some((*a as f64, *b)),
        (Value::Double(a), Value::Int(b)) => Some((*a, *b as f64)),
        (Value::Double(a), Value::Double(b)) => Some((*a, *b)),
        _ => None,
    }
}

fn both_int(left: &Value, right: &Value) -> Option<(i64, i64)> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some((*a, *b)),
        _ => None,
    }
}

pub fn call_binary(op: BinaryOp, left: &Value, right: &Value, heap: &mut Heap) -> RunResult<Value> {
    use BinaryOp::*;
    match op {
        Add => arithmetic(op, left, right, heap),
        Sub => arithmetic(op, left, right, heap),
        Mul => arithmetic(op, left, right, heap),
        Div => arithmetic(op, left, right, heap),
        Mod => {
            if let Some((a, b)) = both_int(left, right) {
                if b == 0 {
                    return Err(RunError::value("integer modulo by zero"));
                }
                return Ok(Value::Int(a.rem_euclid(b)));
            }
            Err(left.type_error_for(heap, &op.builtin_name()))
        }
        EQ => Ok(Value::Bool(left.py_eq(right, heap)?)),
        NE => Ok(Value::Bool(!left.py_eq(right, heap)?)),
        LT | GT | LE | GE => compare(op, left, right, heap),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value, heap: &mut Heap) -> RunResult<Value> {
    use BinaryOp::*;
    if let Some((a, b)) = both_int(left, right) {
        return Ok(match op {
            Add => Value::Int(a.wrapping_add(b)),
            Sub => Value::Int(a.wrapping_sub(b)),
            Mul => Value::Int(a.wrapping_mul(b)),
            Div => {
                if b == 0 {
                    return Err(RunError::value("integer division by zero"));
                }
                Value::Int(a.wrapping_div(b))
            }
            _ => unreachable!(),
        });
    }
    if let Some((a, b)) = numeric_pair(left, right) {
        return Ok(match op {
            Add => Value::Double(a + b),
            Sub => Value::Double(a - b),
            Mul => Value::Double(a * b),
            Div => Value::Double(a / b),
            _ => unreachable!(),
        });
    }
    if op == Add {
        if let (Value::Str(a), Value::Str(b)) = (left, right) {
            return Ok(Value::Str(str_concat(a, b)));
        }
        if let (Value::Ref(a), Value::Ref(b)) = (left, right) {
            if let (HeapValue::List(xs), HeapValue::List(ys)) = (heap.get(*a), heap.get(*b)) {
                let mut combined = xs.clone();
                combined.extend(ys.clone());
                return Ok(Value::list(combined, heap));
            }
        }
    }
    Err(left.type_error_for(heap, &op.builtin_name()))
}

fn str_concat(a: &Rc<str>, b: &Rc<str>) -> Rc<str> {
    let mut s = String::with_capacity(a.len() + b.len());
    s.push_str(a);
    s.push_str(b);
    Rc::from(s)
}

fn compare(op: BinaryOp, left: &Value, right: &Value, heap: &Heap) -> RunResult<Value> {
    use std::cmp::Ordering;
    use BinaryOp::*;
    let ordering = if let Some((a, b)) = numeric_pair(left, right) {
        a.partial_cmp(&b).ok_or_else(|| RunError::value("comparison of NaN is undefined"))?
    } else if let (Value::Str(a), Value::Str(b)) = (left, right) {
        a.cmp(b)
    } else {
        return Err(left.type_error_for(heap, &op.builtin_name()));
    };
    Ok(Value::Bool(match op {
        LT => ordering == Ordering::Less,
        GT => ordering == Ordering::Greater,
        LE => ordering != Ordering::Greater,
        GE => ordering != Ordering::Less,
        _ => unreachable!(),
    }))
}

/// `__builtin_getattr__`: looks up a named field on an object, or a bound
/// method on any value whose type exposes one. Kernel/pattern-node fields are
/// exposed the same way.
pub fn get_attr(receiver: &Value, name: &str, heap: &Heap) -> RunResult<Value> {
    if let Value::Ref(id) = receiver {
        if let HeapValue::Object(fields) = heap.get(*id) {
            if let Some(v) = fields.get(name) {
                return Ok(v.clone());
            }
            return Err(RunError::new(ExcType::Attribute, format!("object has no attribute '{name}'")));
        }
    }
    Err(RunError::new(ExcType::Attribute, format!("'{}' has no attribute '{name}'", receiver.type_tag(heap))))
}

/// `__builtin_setattr__`: writes a named field on an object, allocating the
/// field fresh if absent — the DRR pattern DSL relies on
/// attribute-write-creates-a-binding semantics.
pub fn set_attr(receiver: &Value, name: &str, value: Value, heap: &mut Heap) -> RunResult<()> {
    if let Value::Ref(id) = receiver {
        if let HeapValue::Object(fields) = heap.get_mut(*id) {
            fields.insert(name.to_string(), value);
            return Ok(());
        }
    }
    Err(RunError::new(ExcType::Attribute, format!("'{}' does not support attribute assignment", receiver.type_tag(heap))))
}

/// `__builtin_getitem__`: list indexing and object key lookup.
pub fn get_item(receiver: &Value, index: &Value, heap: &Heap) -> RunResult<Value> {
    match (receiver, index) {
        (Value::Ref(id), Value::Int(i)) => {
            if let HeapValue::List(items) = heap.get(*id) {
                let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                return usize::try_from(idx)
                    .ok()
                    .and_then(|idx| items.get(idx))
                    .cloned()
                    .ok_or_else(|| RunError::index(format!("list index out of range: {i}")));
            }
        }
        (Value::Ref(id), Value::Str(key)) => {
            if let HeapValue::Object(fields) = heap.get(*id) {
                return fields.get(key.as_ref()).cloned().ok_or_else(|| RunError::index(format!("no such key: '{key}'")));
            }
        }
        _ => {}
    }
    Err(receiver.type_error_for(heap, "__builtin_getitem__"))
}
