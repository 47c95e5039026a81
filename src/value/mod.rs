//! The value universe and method dispatch.
//!
//! `Value` is an open sum rendered as a Rust enum: the domain-specific
//! variants (pattern nodes, kernel modules, the DRR context,
//! compiler/launcher handles) live in the same enum as the core variants
//! rather than behind a separate extensible tail, and every heap-allocated
//! compound value is addressed through [`heap::HeapId`] rather than
//! `Rc<RefCell<_>>`.
//!
//! `Value` derives `Clone`: there is no refcount-leak hazard to guard
//! against here, because heap identity lives in the arena, not in the
//! `Value` itself.

pub mod heap;
pub mod method_class;

use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::core::Lambda;
use crate::env::Environment;
use crate::error::{ExcType, RunError, RunResult};
use crate::interp::symbols::BuiltinSymbol;
use heap::HeapId;

/// A value, immediate or heap-allocated.
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Rc<str>),
    /// A built-in symbol reference, e.g. `__builtin_Add__` or `__builtin_if__`
    ///. Resolved by the interpreter's built-in-symbol dispatch step
    /// rather than by a method-class lookup.
    Builtin(BuiltinSymbol),
    /// A type descriptor, callable as a constructor ("type
    /// descriptor" dispatch case).
    Type(TypeTag),
    /// A host-provided function exposed to user code, e.g. a DRR namespace
    /// method or a kernel-definer helper ("plain"/"higher-order"
    /// built-in dispatch cases).
    Native(NativeFunction),
    /// A bound method: a receiver paired with the function found on its
    /// type's method-class table.
    Method(Box<Method>),
    /// A tensor attribute's value (`t.x`): a stable cross-namespace
    /// identity token, not yet resolved to any particular pattern side's
    /// local graph node. Small enough to keep as an immediate rather than a
    /// heap allocation.
    TensorToken(usize),
    Ref(HeapId),
}

/// Everything heap-allocated, addressed from a [`Value::Ref`] via the arena
/// in [`heap::Heap`].
#[derive(Debug, Clone)]
pub enum HeapValue {
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    /// A `starred` wrapper marking a value for unpacking into the surrounding
    /// list/argument construction (`__builtin_starred__`).
    Starred(Value),
    Closure(Closure),
    PatternNode(crate::pattern::BoundPatternNode),
    KernelModule(crate::kernel::KernelModule),
    DrrContext(crate::pattern::DrrContext),
    Namespace(crate::pattern::Namespace),
    TensorNamespace(crate::pattern::TensorNamespace),
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub lambda: Lambda,
    pub environment: Rc<std::cell::RefCell<Environment>>,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub receiver: Value,
    pub func: Value,
}

/// A type descriptor value. Naming matches the glossary in 
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TypeTag {
    Unit,
    Bool,
    Int,
    Double,
    Str,
    List,
    Object,
    Starred,
    Closure,
    Builtin,
    Type,
    Native,
    Method,
    PatternNode,
    KernelModule,
    DrrContext,
    Namespace,
    TensorNamespace,
    TensorToken,
}

/// A host-provided callable, exposed to user code as an ordinary [`Value`].
///
/// The two arities mirror the "plain" vs. "higher-order" built-in dispatch
/// cases in / `cps_expr_interpreter.h`: a plain native function
/// receives already-evaluated arguments and returns a value outright; a
/// higher-order one needs the interpreter itself (e.g. to invoke a closure
/// passed as an argument, as `__builtin_apply__` does).
#[derive(Clone)]
pub enum NativeFunction {
    Plain(Rc<PlainNativeFn>),
    HigherOrder(Rc<HigherOrderNativeFn>),
}

/// A plain native function: evaluated synchronously against already-reduced
/// arguments ("plain built-in" dispatch row). Takes the heap
/// explicitly (rather than a whole `&mut Interpreter`) since most plain
/// builtins only need to allocate or inspect compound values, not recurse
/// into the evaluator.
pub type PlainNativeFn = dyn Fn(&[Value], &mut heap::Heap) -> RunResult<Value>;
/// A higher-order native function: receives the whole interpreter so it can
/// invoke a callback closure itself ("higher-order built-in"; e.g.
/// `__builtin_apply__`'s callback in the original source).
pub type HigherOrderNativeFn = dyn Fn(&mut crate::interp::Interpreter, &[Value]) -> RunResult<Value>;

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeFunction::Plain(_) => write!(f, "<native function>"),
            NativeFunction::HigherOrder(_) => write!(f, "<native higher-order function>"),
        }
    }
}

impl Value {
    pub fn list(items: Vec<Value>, heap: &mut heap::Heap) -> Value {
        Value::Ref(heap.alloc(HeapValue::List(items)))
    }

    pub fn object(fields: IndexMap<String, Value>, heap: &mut heap::Heap) -> Value {
        Value::Ref(heap.alloc(HeapValue::Object(fields)))
    }

    pub fn starred(inner: Value, heap: &mut heap::Heap) -> Value {
        Value::Ref(heap.alloc(HeapValue::Starred(inner)))
    }

    pub fn closure(lambda: Lambda, environment: Rc<std::cell::RefCell<Environment>>, heap: &mut heap::Heap) -> Value {
        Value::Ref(heap.alloc(HeapValue::Closure(Closure { lambda, environment })))
    }

    pub fn type_tag(&self, heap: &heap::Heap) -> TypeTag {
        match self {
            Value::Unit => TypeTag::Unit,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Double(_) => TypeTag::Double,
            Value::Str(_) => TypeTag::Str,
            Value::Builtin(_) => TypeTag::Builtin,
            Value::Type(_) => TypeTag::Type,
            Value::Native(_) => TypeTag::Native,
            Value::Method(_) => TypeTag::Method,
            Value::TensorToken(_) => TypeTag::TensorToken,
            Value::Ref(id) => match heap.get(*id) {
                HeapValue::List(_) => TypeTag::List,
                HeapValue::Object(_) => TypeTag::Object,
                HeapValue::Starred(_) => TypeTag::Starred,
                HeapValue::Closure(_) => TypeTag::Closure,
                HeapValue::PatternNode(_) => TypeTag::PatternNode,
                HeapValue::KernelModule(_) => TypeTag::KernelModule,
                HeapValue::DrrContext(_) => TypeTag::DrrContext,
                HeapValue::Namespace(_) => TypeTag::Namespace,
                HeapValue::TensorNamespace(_) => TypeTag::TensorNamespace,
            },
        }
    }

    /// Truthiness used by `__builtin_if__`: unit and `false` are
    /// falsy, zero-valued numbers are falsy, every other value is truthy.
    pub fn is_truthy(&self, heap: &heap::Heap) -> bool {
        match self {
            Value::Unit => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Double(d) => *d != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Ref(id) => match heap.get(*id) {
                HeapValue::List(items) => !items.is_empty(),
                HeapValue::Object(fields) => !fields.is_empty(),
                _ => true,
            },
            _ => true,
        }
    }

    /// Structural equality: every compound value compares element/key-wise.
    /// Closures and kernel-module handles are the documented exception — they
    /// compare by heap identity, since two syntactically identical closures
    /// captured over different environments are not interchangeable.
    pub fn py_eq(&self, other: &Value, heap: &heap::Heap) -> RunResult<bool> {
        Ok(match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::TensorToken(a), Value::TensorToken(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => match (heap.get(*a), heap.get(*b)) {
                (HeapValue::List(xs), HeapValue::List(ys)) => {
                    xs.len() == ys.len()
                        && xs.iter().zip(ys).try_fold(true, |acc, (x, y)| Ok::<_, RunError>(acc && x.py_eq(y, heap)?))?
                }
                (HeapValue::Object(xs), HeapValue::Object(ys)) => {
                    xs.len() == ys.len()
                        && xs.iter().try_fold(true, |acc, (k, v)| {
                            Ok::<_, RunError>(acc && ys.get(k).is_some_and(|ov| v.py_eq(ov, heap).unwrap_or(false)))
                        })?
                }
                (HeapValue::Starred(x), HeapValue::Starred(y)) => x.py_eq(y, heap)?,
                // Closures and kernel modules: identity equality by heap slot.
                (HeapValue::Closure(_), HeapValue::Closure(_))
                | (HeapValue::KernelModule(_), HeapValue::KernelModule(_)) => a == b,
                _ => false,
            },
            _ => false,
        })
    }

    pub fn to_display_string(&self, heap: &heap::Heap) -> String {
        match self {
            Value::Unit => "()".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Str(s) => s.to_string(),
            Value::Builtin(b) => b.name(),
            Value::Type(t) => t.to_string(),
            Value::Native(_) => "<native function>".to_string(),
            Value::Method(_) => "<bound method>".to_string(),
            Value::TensorToken(t) => format!("<tensor #{t}>"),
            Value::Ref(id) => match heap.get(*id) {
                HeapValue::List(items) => {
                    let rendered: Vec<String> = items.iter().map(|v| v.to_display_string(heap)).collect();
                    format!("[{}]", rendered.join(", "))
                }
                HeapValue::Object(fields) => {
                    let rendered: Vec<String> =
                        fields.iter().map(|(k, v)| format!("{k}: {}", v.to_display_string(heap))).collect();
                    format!("{{{}}}", rendered.join(", "))
                }
                HeapValue::Starred(v) => format!("*{}", v.to_display_string(heap)),
                HeapValue::Closure(_) => "<closure>".to_string(),
                HeapValue::PatternNode(_) => "<pattern node>".to_string(),
                HeapValue::KernelModule(m) => format!("<kernel module {}>", m.name),
                HeapValue::DrrContext(_) => "<drr context>".to_string(),
                HeapValue::Namespace(_) => "<drr op namespace>".to_string(),
                HeapValue::TensorNamespace(_) => "<drr tensor namespace>".to_string(),
            },
        }
    }

    pub fn type_error_for(&self, heap: &heap::Heap, op: &str) -> RunError {
        RunError::new(ExcType::Type, format!("unsupported operand type for {op}: '{}'", self.type_tag(heap)))
    }
}
