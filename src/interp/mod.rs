//! The CPS interpreter core.
//!
//! A run is a loop over a mutable three-field reduction record —
//! `(outer, inner, args)` — until `inner` is the internal [`symbols::BuiltinSymbol::Halt`]
//! sentinel. Each [`Interpreter::step`] inspects `inner`'s value and either:
//!
//! - dispatches a built-in symbol (`If`/`Apply` mutate the record directly as
//!   a tail call, leaving `outer` untouched; every other symbol installs
//!   `Halt` on `outer` as its result is produced — see [`Interpreter::swap_halt`]),
//! - calls a native/method function and finishes via [`Interpreter::finish_native_result`],
//!   which reuses a still-pending closure's captured environment directly
//!   instead of installing `Halt`, mirroring the original's
//!   `InterpretBuiltinMethodCall` closure-reuse shortcut, or
//! - enters a closure, rebinding `__builtin_return__` to `outer` in a fresh
//!   child environment.
//!
//! This asymmetry between operator dispatch (`swap_halt`, uniform) and
//! native/closure-call dispatch (`finish_native_result`, closure-reuse aware)
//! is load-bearing, not incidental — it is exactly what the original source
//! does, and reproducing it keeps tail calls through `Identity`/`List`/native
//! functions from growing the reduction loop by an extra iteration.

pub mod prelude;
pub mod symbols;

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use symbols::{BuiltinSymbol, OpSymbol};

use crate::ast::core::{Atomic, Expr, Lambda};
use crate::ast::surface::Literal;
use crate::env::{Environment, EnvironmentManager, Frame};
use crate::error::{RunError, RunResult};
use crate::io::{NoPrint, PrintSink};
use crate::pattern::{BoundPatternNode, DrrContext, Namespace, TensorNamespace};
use crate::resource::Limits;
use crate::tracer::{NoopTracer, Tracer};
use crate::value::heap::{Heap, HeapId};
use crate::value::method_class;
use crate::value::{Closure, HeapValue, Method, NativeFunction, TypeTag, Value};

/// The mutable reduction record threaded through one [`Interpreter::run`] call
///: `outer` is the pending continuation, `inner` the function
/// about to be applied to `args`.
struct State {
    outer: Value,
    inner: Value,
    args: Vec<Value>,
}

/// Owns the heap, the environment chain, and the resource ceilings for one
/// logical program run. Not `Clone`: a run's heap and
/// environments are only ever meant to be built up and torn down together.
pub struct Interpreter {
    heap: Heap,
    envs: EnvironmentManager,
    builtin_env: Rc<RefCell<Environment>>,
    limits: Limits,
    tracer: Box<dyn Tracer>,
    print_sink: Box<dyn PrintSink>,
    steps: usize,
}

impl Interpreter {
    /// Builds an interpreter rooted at `frame` (typically
    /// [`prelude::root_frame`](crate::interp::prelude::root_frame)), using
    /// default resource limits, a no-op tracer, and a [`NoPrint`] sink —
    /// I/O stays opt-in, see `crate::io` module docs.
    pub fn new(frame: Frame) -> Self {
        Self::with_limits_and_tracer(frame, Limits::default(), Box::new(NoopTracer))
    }

    pub fn with_limits_and_tracer(frame: Frame, limits: Limits, tracer: Box<dyn Tracer>) -> Self {
        let mut envs = EnvironmentManager::new();
        let builtin_env = envs.new_init_env(frame);
        Self { heap: Heap::new(), envs, builtin_env, limits, tracer, print_sink: Box::new(NoPrint), steps: 0 }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>) {
        self.tracer = tracer;
    }

    /// Swaps in a different destination for `__builtin_print__` output, e.g.
    /// [`crate::io::StdPrint`] for a binary embedder or
    /// [`crate::io::CollectPrint`] for a test asserting on side effects.
    pub fn set_print_sink(&mut self, sink: Box<dyn PrintSink>) {
        self.print_sink = sink;
    }

    /// Interprets a top-level lambda against `args`:
    /// closes it over the built-in environment, then runs it as an ordinary
    /// closure call.
    pub fn interpret_lambda(&mut self, lambda: Lambda, args: Vec<Value>) -> RunResult<Value> {
        let closure = Value::closure(lambda, self.builtin_env.clone(), &mut self.heap);
        self.run(closure, args)
    }

    /// Runs `func(args...)` to completion: loops [`Interpreter::step`]
    /// until `inner` is the halt sentinel, then returns the single value
    /// `halt` was called with.
    pub fn run(&mut self, func: Value, args: Vec<Value>) -> RunResult<Value> {
        let mut state = State { outer: Value::Builtin(BuiltinSymbol::Halt), inner: func, args };
        while !is_halt(&state.inner) {
            self.steps += 1;
            self.limits.check_steps(self.steps)?;
            self.step(&mut state)?;
        }
        if state.args.len() != 1 {
            return Err(RunError::runtime(format!(
                "a completed run must produce exactly 1 value, but {} were produced",
                state.args.len()
            )));
        }
        Ok(state.args.remove(0))
    }

    fn step(&mut self, state: &mut State) -> RunResult<()> {
        match state.inner.clone() {
            Value::Builtin(BuiltinSymbol::Halt) => unreachable!("run() never steps a halted state"),
            Value::Builtin(symbol) => self.dispatch_builtin_symbol(symbol, state),
            Value::Native(NativeFunction::Plain(f)) => self.dispatch_plain_native(&f, state),
            Value::Native(NativeFunction::HigherOrder(f)) => self.dispatch_higher_order_native(&f, state),
            Value::Method(method) => self.dispatch_method(*method, state),
            Value::Ref(id) => match self.heap.get(id) {
                HeapValue::Closure(closure) => {
                    let closure = closure.clone();
                    self.dispatch_closure_call(closure, state)
                }
                HeapValue::PatternNode(node) => {
                    let node = node.clone();
                    self.dispatch_pattern_node_call(node, state)
                }
                _ => self.dispatch_call_unary_fallback(state),
            },
            _ => self.dispatch_call_unary_fallback(state),
        }
    }

    fn dispatch_plain_native(&mut self, f: &Rc<crate::value::PlainNativeFn>, state: &mut State) -> RunResult<()> {
        let args = std::mem::take(&mut state.args);
        let result = f(&args, &mut self.heap)?;
        self.finish_native_result(result, state)
    }

    fn dispatch_higher_order_native(&mut self, f: &Rc<crate::value::HigherOrderNativeFn>, state: &mut State) -> RunResult<()> {
        let args = std::mem::take(&mut state.args);
        let result = f(self, &args)?;
        self.finish_native_result(result, state)
    }

    /// A bound method: the receiver is prepended to the call's
    /// arguments, exactly as `InterpretMethodCall` prepends `obj` in the
    /// original source, and dispatch continues from there.
    fn dispatch_method(&mut self, method: Method, state: &mut State) -> RunResult<()> {
        let mut combined = Vec::with_capacity(state.args.len() + 1);
        combined.push(method.receiver);
        combined.append(&mut state.args);
        match method.func {
            Value::Native(NativeFunction::Plain(f)) => {
                let result = f(&combined, &mut self.heap)?;
                self.finish_native_result(result, state)
            }
            Value::Native(NativeFunction::HigherOrder(f)) => {
                let result = f(self, &combined)?;
                self.finish_native_result(result, state)
            }
            other => {
                state.inner = other;
                state.args = combined;
                Ok(())
            }
        }
    }

    fn dispatch_call_unary_fallback(&mut self, state: &mut State) -> RunResult<()> {
        let resolved = resolve_call_unary(&state.inner, &self.heap)?;
        state.inner = resolved;
        Ok(())
    }

    fn dispatch_builtin_symbol(&mut self, symbol: BuiltinSymbol, state: &mut State) -> RunResult<()> {
        match symbol {
            BuiltinSymbol::Halt => unreachable!("run() never steps a halted state"),
            BuiltinSymbol::If => self.eval_if(state),
            BuiltinSymbol::Apply => self.eval_apply(state),
            BuiltinSymbol::Identity => {
                self.expect_arity(state, 1, symbols::IDENTITY)?;
                let result = state.args[0].clone();
                self.finish_native_result(result, state)
            }
            BuiltinSymbol::List => {
                let built = build_list(&state.args, &mut self.heap)?;
                self.finish_native_result(built, state)
            }
            BuiltinSymbol::Print => {
                let rendered: Vec<String> = state.args.iter().map(|v| v.to_display_string(&self.heap)).collect();
                self.print_sink.print(&rendered.join(" "))?;
                self.finish_native_result(Value::Unit, state)
            }
            BuiltinSymbol::Op(op) => self.dispatch_op(op, state),
        }
    }

    /// `__builtin_if__` is a CPS tail call: it never installs
    /// `Halt` on `outer`, it just picks a branch and lets the existing
    /// continuation keep threading through.
    fn eval_if(&mut self, state: &mut State) -> RunResult<()> {
        self.expect_arity(state, 3, symbols::IF)?;
        let chosen = if state.args[0].is_truthy(&self.heap) { state.args[1].clone() } else { state.args[2].clone() };
        state.inner = chosen;
        state.args = Vec::new();
        Ok(())
    }

    /// `__builtin_apply__` is likewise a CPS tail call: it
    /// unpacks its second argument (a list) into the call's argument vector
    /// and hands control to the first argument, again without touching
    /// `outer`.
    fn eval_apply(&mut self, state: &mut State) -> RunResult<()> {
        self.expect_arity(state, 2, symbols::APPLY)?;
        let func = state.args[0].clone();
        let items = match &state.args[1] {
            Value::Ref(id) => match self.heap.get(*id) {
                HeapValue::List(items) => items.clone(),
                _ => return Err(RunError::type_error("'__builtin_apply__' second argument must be a list")),
            },
            _ => return Err(RunError::type_error("'__builtin_apply__' second argument must be a list")),
        };
        state.inner = func;
        state.args = items;
        Ok(())
    }

    fn dispatch_op(&mut self, op: OpSymbol, state: &mut State) -> RunResult<()> {
        self.expect_arity(state, op.num_operands(), &op.name())?;
        let result = match op {
            OpSymbol::Binary(bop) => method_class::call_binary(bop, &state.args[0], &state.args[1], &mut self.heap)?,
            OpSymbol::Unary(uop) => method_class::call_unary(uop, &state.args[0], &self.heap)?,
            OpSymbol::GetAttr => {
                let name = expect_str(&state.args[1])?;
                let receiver = state.args[0].clone();
                self.get_attr(&receiver, &name)?
            }
            OpSymbol::SetAttr => {
                let receiver = state.args[0].clone();
                let name = expect_str(&state.args[1])?;
                make_setter(receiver, name)
            }
            OpSymbol::GetItem => method_class::get_item(&state.args[0], &state.args[1], &self.heap)?,
            OpSymbol::Call => resolve_call_unary(&state.args[0], &self.heap)?,
            OpSymbol::ToString => Value::Str(Rc::from(state.args[0].to_display_string(&self.heap))),
            OpSymbol::Starred => Value::starred(state.args[0].clone(), &mut self.heap),
        };
        // Uniform finish: every Op symbol installs Halt on `outer` and moves
        // the old `outer` into `inner`, with no closure-reuse shortcut.
        self.swap_halt(result, state);
        Ok(())
    }

    fn swap_halt(&mut self, result: Value, state: &mut State) {
        state.args = vec![result];
        state.inner = std::mem::replace(&mut state.outer, Value::Builtin(BuiltinSymbol::Halt));
    }

    /// Finishes a native/method/`Identity`/`List` call (
    /// `InterpretBuiltinMethodCall`). If the pending `outer` continuation is
    /// already a closure, reuses its captured environment directly instead
    /// of installing `Halt` and looping once more — this is the closure-reuse
    /// optimization present in the original source, not a generic shortcut,
    /// so it is only taken here and never from [`Interpreter::swap_halt`].
    fn finish_native_result(&mut self, result: Value, state: &mut State) -> RunResult<()> {
        if let Value::Ref(id) = &state.outer {
            if let HeapValue::Closure(closure) = self.heap.get(*id) {
                let closure = closure.clone();
                return self.interpret_lambda_call(closure.environment, Value::Builtin(BuiltinSymbol::Halt), &closure.lambda, vec![result], state);
            }
        }
        self.swap_halt(result, state);
        Ok(())
    }

    fn dispatch_closure_call(&mut self, closure: Closure, state: &mut State) -> RunResult<()> {
        let args = std::mem::take(&mut state.args);
        self.tracer.on_closure_entry(&closure.lambda.params, &args);
        let env = self.envs.new_child(Some(closure.environment), &self.limits)?;
        let outer = std::mem::replace(&mut state.outer, Value::Builtin(BuiltinSymbol::Halt));
        env.borrow_mut().set(symbols::RETURN, outer.clone());
        self.interpret_lambda_call(env, outer, &closure.lambda, args, state)
    }

    /// Binds `lambda`'s parameters to `args` in `env`, then evaluates its
    /// body (either an atomic return value or a composed call) into the
    /// reduction record.
    fn interpret_lambda_call(
        &mut self,
        env: Rc<RefCell<Environment>>,
        outer_func: Value,
        lambda: &Lambda,
        args: Vec<Value>,
        state: &mut State,
    ) -> RunResult<()> {
        if args.len() != lambda.params.len() {
            return Err(RunError::type_error(format!(
                "<lambda> takes {} argument(s), but {} were given",
                lambda.params.len(),
                args.len()
            )));
        }
        for (param, arg) in lambda.params.iter().zip(args) {
            if !env.borrow_mut().set(param.as_str(), arg) {
                return Err(RunError::syntax(format!("duplicate parameter name '{}'", param.as_str())));
            }
        }
        match lambda.body.as_ref() {
            Expr::Atomic(atomic) => {
                let value = self.eval_atomic(&env, atomic)?;
                state.outer = outer_func;
                state.inner = Value::Builtin(BuiltinSymbol::Identity);
                state.args = vec![value];
            }
            Expr::ComposedCall(call) => {
                self.tracer.on_composed_call(call);
                let outer = self.eval_atomic(&env, &call.outer)?;
                let inner = self.eval_atomic(&env, &call.inner)?;
                let mut args = Vec::with_capacity(call.args.len());
                for atomic in &call.args {
                    args.push(self.eval_atomic(&env, atomic)?);
                }
                state.outer = outer;
                state.inner = inner;
                state.args = args;
            }
        }
        Ok(())
    }

    fn eval_atomic(&mut self, env: &Rc<RefCell<Environment>>, atomic: &Atomic) -> RunResult<Value> {
        match atomic {
            Atomic::Lambda(lambda) => Ok(Value::closure(lambda.clone(), env.clone(), &mut self.heap)),
            Atomic::Var(var) => self.resolve_var(env, var.as_str()),
            Atomic::Literal(literal) => Ok(literal_to_value(literal)),
        }
    }

    /// Resolves a free variable: the lexical environment is tried
    /// first, and only on a name-not-found error does resolution fall back to
    /// the built-in symbol table — this Rust port keeps `Var` as a plain
    /// string end to end rather than pre-resolving built-ins at parse time,
    /// so both paths have to be tried here, at lookup time, on every access.
    fn resolve_var(&self, env: &Rc<RefCell<Environment>>, name: &str) -> RunResult<Value> {
        match env.borrow().get(name) {
            Ok(value) => Ok(value),
            Err(err) if err.kind == crate::error::ExcType::Name => {
                BuiltinSymbol::from_name(name).map(Value::Builtin).ok_or(err)
            }
            Err(err) => Err(err),
        }
    }

    /// `__builtin_getattr__`: namespace and DRR
    /// context attribute access is special-cased ahead of the generic
    /// object-field lookup in [`method_class::get_attr`], since reading an
    /// attribute on `o`/`t` *materializes* a node/token rather than failing
    /// when the name hasn't been seen before.
    fn get_attr(&mut self, receiver: &Value, name: &str) -> RunResult<Value> {
        if let Value::Ref(id) = receiver {
            let id = *id;
            match self.heap.get(id) {
                HeapValue::Namespace(_) => {
                    let node_id = match self.heap.get_mut(id) {
                        HeapValue::Namespace(ns) => ns.bind(name, false)?,
                        _ => unreachable!(),
                    };
                    return Ok(Value::Ref(self.heap.alloc(HeapValue::PatternNode(BoundPatternNode { namespace: id, node_id }))));
                }
                HeapValue::TensorNamespace(_) => {
                    let token = match self.heap.get_mut(id) {
                        HeapValue::TensorNamespace(tensors) => tensors.bind(name, false),
                        _ => unreachable!(),
                    };
                    return Ok(Value::TensorToken(token));
                }
                HeapValue::DrrContext(ctx) => {
                    let ctx = ctx.clone();
                    return self.drr_context_get_attr(&ctx, name);
                }
                _ => {}
            }
        }
        method_class::get_attr(receiver, name, &self.heap)
    }

    fn drr_context_get_attr(&mut self, ctx: &DrrContext, name: &str) -> RunResult<Value> {
        match name {
            "pass_name" => Ok(Value::Str(Rc::from(ctx.pass_name.as_str()))),
            "source_pattern" => Ok(make_pattern_decorator(ctx.source_ops, ctx.tensors)),
            "result_pattern" => Ok(make_pattern_decorator(ctx.result_ops, ctx.tensors)),
            other => Err(RunError::attribute(format!("drr context has no attribute '{other}'"))),
        }
    }

    /// Calling a node bound on an `o` namespace: its two
    /// arguments are the input and output lists for the call it represents,
    /// each entry either another bound node in the same namespace or a
    /// [`Value::TensorToken`] resolved to this namespace's local node for
    /// that token.
    fn dispatch_pattern_node_call(&mut self, node: BoundPatternNode, state: &mut State) -> RunResult<()> {
        if state.args.len() != 2 {
            return Err(RunError::type_error(format!(
                "calling a pattern node takes an input list and an output list, but {} argument(s) were given",
                state.args.len()
            )));
        }
        let input_list = state.args[0].clone();
        let output_list = state.args[1].clone();
        let inputs = self.resolve_edge_list(&input_list, node.namespace)?;
        let outputs = self.resolve_edge_list(&output_list, node.namespace)?;
        match self.heap.get_mut(node.namespace) {
            HeapValue::Namespace(ns) => {
                ns.apply_inputs(node.node_id, &inputs);
                ns.apply_outputs(node.node_id, &outputs);
            }
            _ => return Err(RunError::runtime("pattern node's namespace heap slot is not a namespace")),
        }
        self.finish_native_result(Value::Unit, state)
    }

    fn resolve_edge_list(&mut self, list_value: &Value, namespace: HeapId) -> RunResult<Vec<(usize, bool)>> {
        let items = match list_value {
            Value::Ref(id) => match self.heap.get(*id) {
                HeapValue::List(items) => items.clone(),
                _ => return Err(RunError::type_error("pattern node input/output list must be a list value")),
            },
            _ => return Err(RunError::type_error("pattern node input/output list must be a list value")),
        };
        let mut edges = Vec::with_capacity(items.len());
        for item in items {
            let (inner, starred) = match &item {
                Value::Ref(id) => match self.heap.get(*id) {
                    HeapValue::Starred(inner) => (inner.clone(), true),
                    _ => (item.clone(), false),
                },
                _ => (item.clone(), false),
            };
            edges.push((self.edge_target_node(&inner, namespace)?, starred));
        }
        Ok(edges)
    }

    fn edge_target_node(&mut self, value: &Value, namespace: HeapId) -> RunResult<usize> {
        match value {
            Value::TensorToken(token) => match self.heap.get_mut(namespace) {
                HeapValue::Namespace(ns) => Ok(ns.node_for_token(*token, false)),
                _ => Err(RunError::runtime("pattern node's namespace heap slot is not a namespace")),
            },
            Value::Ref(id) => match self.heap.get(*id) {
                HeapValue::PatternNode(node) if node.namespace == namespace => Ok(node.node_id),
                _ => Err(RunError::type_error(
                    "pattern node input/output list entries must be a node bound on this namespace or a tensor",
                )),
            },
            _ => Err(RunError::type_error("pattern node input/output list entries must be a pattern node or a tensor")),
        }
    }

    fn expect_arity(&self, state: &State, n: usize, name: &str) -> RunResult<()> {
        if state.args.len() != n {
            return Err(RunError::type_error(format!("'{name}' takes {n} argument(s), but {} were given", state.args.len())));
        }
        Ok(())
    }
}

fn is_halt(value: &Value) -> bool {
    matches!(value, Value::Builtin(BuiltinSymbol::Halt))
}

fn literal_to_value(literal: &Literal) -> Value {
    match literal {
        Literal::Unit => Value::Unit,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Double(d) => Value::Double(*d),
        Literal::Str(s) => Value::Str(Rc::from(s.as_str())),
    }
}

fn expect_str(value: &Value) -> RunResult<String> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        _ => Err(RunError::type_error("attribute name must be a string")),
    }
}

/// `__builtin_list__`: collects its arguments into a list,
/// unpacking any that were wrapped in `__builtin_starred__` in place.
fn build_list(args: &[Value], heap: &mut Heap) -> RunResult<Value> {
    let mut items = Vec::with_capacity(args.len());
    for arg in args {
        if let Value::Ref(id) = arg {
            if let HeapValue::Starred(inner) = heap.get(*id) {
                let inner = inner.clone();
                match &inner {
                    Value::Ref(inner_id) => match heap.get(*inner_id) {
                        HeapValue::List(inner_items) => {
                            items.extend(inner_items.clone());
                            continue;
                        }
                        _ => return Err(RunError::type_error("'__builtin_list__' can only unpack a starred list")),
                    },
                    _ => return Err(RunError::type_error("'__builtin_list__' can only unpack a starred list")),
                }
            }
        }
        items.push(arg.clone());
    }
    Ok(Value::list(items, heap))
}

/// `__builtin_call__` dispatch and the call-site fallback for any value that
/// isn't already a closure, method, or pattern node ("type
/// descriptor" dispatch case): a [`Value::Type`] resolves to its constructor,
/// anything else is simply not callable.
fn resolve_call_unary(value: &Value, heap: &Heap) -> RunResult<Value> {
    match value {
        Value::Type(tag) => Ok(constructor_for(*tag)),
        other => Err(other.type_error_for(heap, symbols::CALL)),
    }
}

fn constructor_for(tag: TypeTag) -> Value {
    Value::Native(NativeFunction::Plain(Rc::new(move |args: &[Value], heap: &mut Heap| construct(tag, args, heap))))
}

fn construct(tag: TypeTag, args: &[Value], heap: &mut Heap) -> RunResult<Value> {
    match tag {
        TypeTag::Unit => {
            expect_ctor_arity(tag, args, 0)?;
            Ok(Value::Unit)
        }
        TypeTag::Bool => {
            expect_ctor_arity(tag, args, 1)?;
            Ok(Value::Bool(args[0].is_truthy(heap)))
        }
        TypeTag::Int => {
            expect_ctor_arity(tag, args, 1)?;
            coerce_int(&args[0])
        }
        TypeTag::Double => {
            expect_ctor_arity(tag, args, 1)?;
            coerce_double(&args[0])
        }
        TypeTag::Str => {
            expect_ctor_arity(tag, args, 1)?;
            Ok(Value::Str(Rc::from(args[0].to_display_string(heap))))
        }
        TypeTag::List => Ok(Value::list(args.to_vec(), heap)),
        TypeTag::Object => {
            expect_ctor_arity(tag, args, 0)?;
            Ok(Value::object(IndexMap::new(), heap))
        }
        TypeTag::Starred => {
            expect_ctor_arity(tag, args, 1)?;
            Ok(Value::starred(args[0].clone(), heap))
        }
        other => Err(RunError::type_error(format!("no constructor for type '{other}'"))),
    }
}

fn expect_ctor_arity(tag: TypeTag, args: &[Value], n: usize) -> RunResult<()> {
    if args.len() != n {
        return Err(RunError::invalid_argument(format!("'{tag}' constructor takes {n} argument(s), but {} were given", args.len())));
    }
    Ok(())
}

fn coerce_int(value: &Value) -> RunResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Double(d) => Ok(Value::Int(*d as i64)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Str(s) => s.parse::<i64>().map(Value::Int).map_err(|_| RunError::value(format!("invalid 'Int' literal: '{s}'"))),
        _ => Err(RunError::type_error("cannot convert value to 'Int'")),
    }
}

fn coerce_double(value: &Value) -> RunResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Double(*i as f64)),
        Value::Double(d) => Ok(Value::Double(*d)),
        Value::Bool(b) => Ok(Value::Double(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s.parse::<f64>().map(Value::Double).map_err(|_| RunError::value(format!("invalid 'Double' literal: '{s}'"))),
        _ => Err(RunError::type_error("cannot convert value to 'Double'")),
    }
}

/// `__builtin_setattr__`'s 1-ary setter closure: calling `getattr`-with-a-name
/// on an attribute-settable receiver returns a
/// setter rather than mutating eagerly, so `SetAttr` shares the same 2-ary
/// call shape as `GetAttr`/`GetItem` while the actual write happens one call
/// later, against the value being assigned.
fn make_setter(receiver: Value, name: String) -> Value {
    Value::Native(NativeFunction::Plain(Rc::new(move |args: &[Value], heap: &mut Heap| {
        if args.len() != 1 {
            return Err(RunError::invalid_argument("a '__builtin_setattr__' closure takes exactly 1 argument"));
        }
        perform_set_attr(&receiver, &name, args[0].clone(), heap)?;
        Ok(Value::Unit)
    })))
}

fn perform_set_attr(receiver: &Value, name: &str, value: Value, heap: &mut Heap) -> RunResult<()> {
    if let Value::Ref(id) = receiver {
        let id = *id;
        let is_namespace = matches!(heap.get(id), HeapValue::Namespace(_));
        let is_tensor_namespace = matches!(heap.get(id), HeapValue::TensorNamespace(_));
        let is_drr_context = matches!(heap.get(id), HeapValue::DrrContext(_));
        if is_drr_context && name == "pass_name" {
            let name_str = match &value {
                Value::Str(s) => s.to_string(),
                _ => return Err(RunError::type_error("'pass_name' must be assigned a string")),
            };
            if let HeapValue::DrrContext(ctx) = heap.get_mut(id) {
                ctx.pass_name = name_str;
                return Ok(());
            }
            unreachable!()
        }
        if is_namespace {
            let node_id = pattern_node_id_for(&value, id, heap)?;
            if let HeapValue::Namespace(ns) = heap.get_mut(id) {
                ns.rebind(name, node_id);
                return Ok(());
            }
            unreachable!()
        }
        if is_tensor_namespace {
            let token = expect_tensor_token(&value)?;
            if let HeapValue::TensorNamespace(tensors) = heap.get_mut(id) {
                return tensors.alias(name, token);
            }
            unreachable!()
        }
    }
    method_class::set_attr(receiver, name, value, heap)
}

fn pattern_node_id_for(value: &Value, namespace: HeapId, heap: &Heap) -> RunResult<usize> {
    match value {
        Value::Ref(id) => match heap.get(*id) {
            HeapValue::PatternNode(node) if node.namespace == namespace => Ok(node.node_id),
            _ => Err(RunError::attribute("assigning an op-namespace attribute requires a pattern node bound on that same namespace")),
        },
        _ => Err(RunError::attribute("assigning an op-namespace attribute requires a pattern node value")),
    }
}

fn expect_tensor_token(value: &Value) -> RunResult<usize> {
    match value {
        Value::TensorToken(token) => Ok(*token),
        _ => Err(RunError::attribute("assigning a tensor-namespace attribute requires a tensor value")),
    }
}

/// The `source_pattern`/`result_pattern` decorator a [`DrrContext`] exposes
///: calling it with a single builder closure runs that builder
/// *immediately*, passing the op and tensor namespaces as its two arguments.
/// Host code has no native decorator syntax to bind the builder for later, so
/// the decorator just invokes it eagerly and returns unit.
fn make_pattern_decorator(ops_namespace: HeapId, tensors_namespace: HeapId) -> Value {
    Value::Native(NativeFunction::HigherOrder(Rc::new(move |interp: &mut Interpreter, args: &[Value]| {
        if args.len() != 1 {
            return Err(RunError::invalid_argument("a pattern decorator takes exactly one builder closure"));
        }
        let builder = args[0].clone();
        let o = Value::Ref(ops_namespace);
        let t = Value::Ref(tensors_namespace);
        interp.run(builder, vec![o, t]).map_err(|e| e.with_frame("running pattern builder"))?;
        Ok(Value::Unit)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::surface::Var;
    use crate::env::Frame;

    fn lambda(params: &[&str], body: Expr) -> Lambda {
        Lambda { params: params.iter().map(|p| Var::new(*p)).collect(), body: Box::new(body) }
    }

    fn var(name: &str) -> Atomic {
        Atomic::Var(Var::new(name))
    }

    fn lit_int(i: i64) -> Atomic {
        Atomic::Literal(Literal::Int(i))
    }

    /// [`Value`] deliberately has no `PartialEq` (see its module docs:
    /// structural comparison goes through [`Value::py_eq`], which needs the
    /// heap) — tests pattern-match out the primitive they expect instead.
    fn expect_int(value: &Value) -> i64 {
        match value {
            Value::Int(i) => *i,
            other => panic!("expected an int, got {other:?}"),
        }
    }

    #[test]
    fn identity_lambda_returns_its_argument() {
        let mut interp = Interpreter::new(Frame::default());
        let id_lambda = lambda(&["x"], Expr::Atomic(var("x")));
        let result = interp.interpret_lambda(id_lambda, vec![Value::Int(42)]).unwrap();
        assert_eq!(expect_int(&result), 42);
    }

    #[test]
    fn composed_call_applies_a_binary_builtin() {
        let mut interp = Interpreter::new(Frame::default());
        // \x -> __builtin_return__(__builtin_Add__(x, 1))
        let add_lambda = lambda(
            &["x"],
            Expr::ComposedCall(crate::ast::core::ComposedCall {
                outer: var(symbols::RETURN),
                inner: Atomic::Var(Var::new("__builtin_Add__")),
                args: vec![var("x"), lit_int(1)],
            }),
        );
        let result = interp.interpret_lambda(add_lambda, vec![Value::Int(41)]).unwrap();
        assert_eq!(expect_int(&result), 42);
    }

    #[test]
    fn if_picks_a_branch_without_consuming_a_step_for_outer() {
        let mut interp = Interpreter::new(Frame::default());
        let if_lambda = lambda(
            &["cond"],
            Expr::ComposedCall(crate::ast::core::ComposedCall {
                outer: var(symbols::RETURN),
                inner: Atomic::Var(Var::new(symbols::IF)),
                args: vec![var("cond"), lit_int(1), lit_int(0)],
            }),
        );
        let result = interp.interpret_lambda(if_lambda, vec![Value::Bool(true)]).unwrap();
        assert_eq!(expect_int(&result), 1);
    }

    #[test]
    fn apply_unpacks_a_list_into_the_callee_arguments() {
        let mut interp = Interpreter::new(Frame::default());
        let func = Value::Builtin(BuiltinSymbol::Op(OpSymbol::Binary(symbols::BinaryOp::Add)));
        let list = Value::list(vec![Value::Int(10), Value::Int(32)], interp.heap_mut());
        let result = interp.run(Value::Builtin(BuiltinSymbol::Apply), vec![func, list]).unwrap();
        assert_eq!(expect_int(&result), 42);
    }

    #[test]
    fn free_variable_falls_back_to_a_builtin_symbol() {
        let mut interp = Interpreter::new(Frame::default());
        let env = interp.builtin_env.clone();
        let value = interp.resolve_var(&env, "__builtin_Add__").unwrap();
        assert!(matches!(value, Value::Builtin(BuiltinSymbol::Op(OpSymbol::Binary(symbols::BinaryOp::Add)))));
    }

    #[test]
    fn unresolvable_free_variable_is_a_name_error() {
        let interp = Interpreter::new(Frame::default());
        let env = interp.builtin_env.clone();
        let err = interp.resolve_var(&env, "nope").unwrap_err();
        assert_eq!(err.kind, crate::error::ExcType::Name);
    }

    #[test]
    fn getattr_on_an_op_namespace_materializes_a_pattern_node() {
        let mut interp = Interpreter::new(Frame::default());
        let ns = Value::Ref(interp.heap_mut().alloc(HeapValue::Namespace(Namespace::new())));
        let node_a = interp.get_attr(&ns, "relu").unwrap();
        let node_b = interp.get_attr(&ns, "relu").unwrap();
        let Value::Ref(a) = node_a else { panic!("expected a pattern node value") };
        let Value::Ref(b) = node_b else { panic!("expected a pattern node value") };
        assert_eq!(a, b, "re-reading the same attribute must return the same node");
    }

    #[test]
    fn getattr_on_a_tensor_namespace_returns_a_stable_token() {
        let mut interp = Interpreter::new(Frame::default());
        let ns = Value::Ref(interp.heap_mut().alloc(HeapValue::TensorNamespace(TensorNamespace::new())));
        let Value::TensorToken(a) = interp.get_attr(&ns, "x").unwrap() else { panic!("expected a tensor token") };
        let Value::TensorToken(b) = interp.get_attr(&ns, "x").unwrap() else { panic!("expected a tensor token") };
        assert_eq!(a, b);
    }

    #[test]
    fn calling_a_pattern_node_installs_graph_edges() {
        let mut interp = Interpreter::new(Frame::default());
        let ns_id = interp.heap_mut().alloc(HeapValue::Namespace(Namespace::new()));
        let ns = Value::Ref(ns_id);
        let x = interp.get_attr(&ns, "x").unwrap();
        let relu = interp.get_attr(&ns, "relu").unwrap();
        let y = interp.get_attr(&ns, "y").unwrap();
        let inputs = Value::list(vec![x], interp.heap_mut());
        let outputs = Value::list(vec![y], interp.heap_mut());
        interp.run(relu, vec![inputs, outputs]).unwrap();
        match interp.heap().get(ns_id) {
            HeapValue::Namespace(ns) => {
                let relu_id = ns.node_id("relu").unwrap();
                assert_eq!(ns.graph().upstream(relu_id).len(), 1);
                assert_eq!(ns.graph().downstream(relu_id).len(), 1);
            }
            _ => panic!("expected a namespace"),
        }
    }

    #[test]
    fn drr_source_pattern_decorator_runs_its_builder_immediately() {
        let mut interp = Interpreter::new(Frame::default());
        let source_ops = interp.heap_mut().alloc(HeapValue::Namespace(Namespace::new()));
        let result_ops = interp.heap_mut().alloc(HeapValue::Namespace(Namespace::new()));
        let tensors = interp.heap_mut().alloc(HeapValue::TensorNamespace(TensorNamespace::new()));
        let ctx = DrrContext::new("fuse_relu", source_ops, result_ops, tensors);
        let ctx_value = Value::Ref(interp.heap_mut().alloc(HeapValue::DrrContext(ctx)));

        let decorator = interp.get_attr(&ctx_value, "source_pattern").unwrap();
        // \o, t -> __builtin_return__(__builtin_getattr__(o, "relu"))
        let builder = lambda(
            &["o", "t"],
            Expr::ComposedCall(crate::ast::core::ComposedCall {
                outer: var(symbols::RETURN),
                inner: Atomic::Var(Var::new(symbols::GETATTR)),
                args: vec![var("o"), Atomic::Literal(Literal::Str("relu".to_string()))],
            }),
        );
        let env = interp.builtin_env.clone();
        let builder_value = Value::closure(builder, env, interp.heap_mut());
        interp.run(decorator, vec![builder_value]).unwrap();

        match interp.heap().get(source_ops) {
            HeapValue::Namespace(ns) => assert!(ns.node_id("relu").is_some()),
            _ => panic!("expected a namespace"),
        }
    }

    #[test]
    fn type_value_is_callable_as_a_constructor() {
        let mut interp = Interpreter::new(Frame::default());
        let result = interp.run(Value::Type(TypeTag::Int), vec![Value::Str(Rc::from("7"))]).unwrap();
        assert_eq!(expect_int(&result), 7);
    }

    #[test]
    fn calling_a_non_callable_value_is_a_type_error() {
        let mut interp = Interpreter::new(Frame::default());
        let err = interp.run(Value::Int(1), vec![]).unwrap_err();
        assert_eq!(err.kind, crate::error::ExcType::Type);
    }

    #[test]
    fn setattr_returns_a_setter_closure_that_mutates_on_invocation() {
        let mut interp = Interpreter::new(Frame::default());
        let obj = Value::object(IndexMap::new(), interp.heap_mut());
        let setter = interp
            .run(
                Value::Builtin(BuiltinSymbol::Op(OpSymbol::SetAttr)),
                vec![obj.clone(), Value::Str(Rc::from("x"))],
            )
            .unwrap();
        interp.run(setter, vec![Value::Int(9)]).unwrap();
        let got = interp.get_attr(&obj, "x").unwrap();
        assert_eq!(expect_int(&got), 9);
    }

    #[test]
    fn setattr_on_a_drr_context_updates_pass_name() {
        let mut interp = Interpreter::new(Frame::default());
        let source_ops = interp.heap_mut().alloc(HeapValue::Namespace(Namespace::new()));
        let result_ops = interp.heap_mut().alloc(HeapValue::Namespace(Namespace::new()));
        let tensors = interp.heap_mut().alloc(HeapValue::TensorNamespace(TensorNamespace::new()));
        let ctx = DrrContext::new("<unnamed>", source_ops, result_ops, tensors);
        let ctx_value = Value::Ref(interp.heap_mut().alloc(HeapValue::DrrContext(ctx)));

        let setter = interp
            .run(Value::Builtin(BuiltinSymbol::Op(OpSymbol::SetAttr)), vec![ctx_value.clone(), Value::Str(Rc::from("pass_name"))])
            .unwrap();
        interp.run(setter, vec![Value::Str(Rc::from("fuse_relu"))]).unwrap();

        let got = interp.get_attr(&ctx_value, "pass_name").unwrap();
        match got {
            Value::Str(s) => assert_eq!(s.as_ref(), "fuse_relu"),
            other => panic!("expected a string, got {other:?}"),
        }
    }

    #[test]
    fn print_builtin_forwards_to_the_configured_sink() {
        let mut interp = Interpreter::new(Frame::default());
        interp.set_print_sink(Box::new(crate::io::CollectPrint::default()));
        interp.run(Value::Builtin(BuiltinSymbol::Print), vec![Value::Int(1), Value::Int(2)]).unwrap();
        // `Box<dyn PrintSink>` doesn't expose a downcast; re-run with a sink
        // we keep a handle to instead, to assert on the captured output.
        let sink = std::rc::Rc::new(RefCell::new(Vec::<String>::new()));
        struct Recording(Rc<RefCell<Vec<String>>>);
        impl crate::io::PrintSink for Recording {
            fn print(&mut self, line: &str) -> RunResult<()> {
                self.0.borrow_mut().push(line.to_string());
                Ok(())
            }
        }
        interp.set_print_sink(Box::new(Recording(sink.clone())));
        interp.run(Value::Builtin(BuiltinSymbol::Print), vec![Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(*sink.borrow(), vec!["1 2".to_string()]);
    }
}
