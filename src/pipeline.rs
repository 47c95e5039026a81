//! The end-to-end DRR/kernel flow, a NEW orchestration layer: wires the
//! surface codec (A), lowering (B), interpreter (E), pattern DSL (F), matcher
//! (G), and kernel facades (H) into one pipeline, so an embedder doesn't have
//! to re-derive that wiring.
//!
//! This module stops exactly at the boundary of external collaborators with
//! named interfaces: it parses, lowers, and interprets DRR programs and
//! kernel definers/dispatchers, and it drives [`crate::graph::match_graph`]
//! against whatever host graph the embedder provides, but it never invents a
//! concrete representation for a host-IR node inside the value universe —
//! that conversion is supplied by the caller (`to_value` below), and the
//! final `compile`/`launch` calls through
//! [`crate::kernel::Compiler`]/[`crate::kernel::Launcher`] are made by the
//! embedder directly against the [`KernelModule`] this module hands back.

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::ast::core::{Atomic, Expr, Lambda};
use crate::ast::{self, Surface};
use crate::cache;
use crate::env::Frame;
use crate::error::{RunError, RunResult};
use crate::graph::{self, GraphDescriptor, MatchContext, PatternGraph};
use crate::interp::{prelude, Interpreter};
use crate::kernel::KernelModule;
use crate::pattern::{DrrContext, Namespace, TensorNamespace};
use crate::value::heap::HeapId;
use crate::value::{HeapValue, Value};

/// Parses `text` as the JSON surface grammar and lowers it to core form,
/// through the process-wide textual-key cache keyed on the source text
/// itself.
pub fn parse_and_lower(text: &str) -> RunResult<Expr> {
    cache::lowered_lambdas().get_or_lower(text, |text| {
        let json: Json = serde_json::from_str(text).map_err(|e| RunError::syntax(format!("malformed JSON: {e}")))?;
        let surface = Surface::decode(&json)?;
        Ok(ast::lower(&surface))
    })
}

/// A DRR program, a kernel-definer, and a kernel-dispatcher are each "a
/// single top-level lambda": reject anything else up front rather
/// than failing confusingly deep inside the interpreter.
fn expect_top_level_lambda(expr: Expr) -> RunResult<Lambda> {
    match expr {
        Expr::Atomic(Atomic::Lambda(lambda)) => Ok(lambda),
        _ => Err(RunError::type_error(
            "a DRR program, kernel definer, or kernel dispatcher must lower to a single top-level lambda",
        )),
    }
}

/// The output of compiling a DRR program: the separate source- and
/// result-side pattern graphs the program's builder closures populated,
/// plus the source graph's deterministically chosen anchor.
#[derive(Debug, Clone)]
pub struct CompiledDrrProgram {
    pub pass_name: String,
    pub source_graph: PatternGraph,
    pub result_graph: PatternGraph,
    pub anchor: usize,
}

/// Runs a DRR program's top-level lambda against a fresh [`DrrContext`]
/// ("Running the DRR program under the interpreter populates
/// a pattern graph"), then reads the populated namespaces back out.
pub fn compile_drr_program(drr_program_text: &str) -> RunResult<CompiledDrrProgram> {
    let lowered = parse_and_lower(drr_program_text)?;
    let lambda = expect_top_level_lambda(lowered)?;

    let mut interp = Interpreter::new(prelude::root_frame());
    let source_ops = interp.heap_mut().alloc(HeapValue::Namespace(Namespace::new()));
    let result_ops = interp.heap_mut().alloc(HeapValue::Namespace(Namespace::new()));
    let tensors = interp.heap_mut().alloc(HeapValue::TensorNamespace(TensorNamespace::new()));
    let ctx = DrrContext::new("<unnamed>", source_ops, result_ops, tensors);
    let ctx_id = interp.heap_mut().alloc(HeapValue::DrrContext(ctx));
    let ctx_value = Value::Ref(ctx_id);

    interp.interpret_lambda(lambda, vec![ctx_value]).map_err(|e| e.with_frame("compiling DRR program"))?;

    let pass_name = match interp.heap().get(ctx_id) {
        HeapValue::DrrContext(ctx) => ctx.pass_name.clone(),
        _ => unreachable!("the heap slot allocated for the DRR context stays a DrrContext"),
    };
    let source_graph = match interp.heap().get(source_ops) {
        HeapValue::Namespace(ns) => ns.graph().clone(),
        _ => unreachable!("the heap slot allocated for the source op namespace stays a Namespace"),
    };
    let result_graph = match interp.heap().get(result_ops) {
        HeapValue::Namespace(ns) => ns.graph().clone(),
        _ => unreachable!("the heap slot allocated for the result op namespace stays a Namespace"),
    };
    let anchor = source_graph.anchor().ok_or_else(|| RunError::value("source pattern declares no nodes to anchor on"))?;
    Ok(CompiledDrrProgram { pass_name, source_graph, result_graph, anchor })
}

/// Attempts to align a compiled DRR program's source-pattern anchor with one
/// host-IR node. `host_anchor_candidate` is "a host-IR
/// location" from the embedder's search order; this function itself tries
/// only that one candidate — looping over candidates until one matches is
/// the embedder's traversal to drive.
pub fn match_against_host<H: GraphDescriptor>(
    compiled: &CompiledDrrProgram,
    host: &H,
    host_anchor_candidate: H::NodeId,
) -> RunResult<Option<MatchContext<usize, H::NodeId>>> {
    graph::match_graph(&compiled.source_graph, compiled.anchor, host, host_anchor_candidate)
}

/// Interprets a kernel-definer's top-level lambda with the match context
/// bound to a fresh `Object` value, one field per matched pattern node keyed
/// by its numeric id ("interpreted with the match context as
/// an argument"). `to_value` supplies the one embedder-specific piece: how a
/// bound host-IR node becomes a [`Value`] the definer's body can inspect.
pub fn run_kernel_definer<N: Copy>(
    definer_text: &str,
    match_context: &MatchContext<usize, N>,
    to_value: impl Fn(N, &mut Interpreter) -> Value,
    interp: &mut Interpreter,
) -> RunResult<Value> {
    let lowered = parse_and_lower(definer_text)?;
    let lambda = expect_top_level_lambda(lowered)?;

    let mut fields = IndexMap::with_capacity(match_context.len());
    for (&pattern_node, &host_node) in match_context {
        fields.insert(pattern_node.to_string(), to_value(host_node, interp));
    }
    let ctx_value = Value::object(fields, interp.heap_mut());
    interp.interpret_lambda(lambda, vec![ctx_value]).map_err(|e| e.with_frame("running kernel definer"))
}

/// Pulls the [`KernelModule`] a kernel-definer's body is contractually
/// required to return ("a kernel module description passed to (H)
/// for compilation").
pub fn extract_kernel_module(result: &Value, interp: &Interpreter) -> RunResult<KernelModule> {
    if let Value::Ref(id) = result {
        if let HeapValue::KernelModule(module) = interp.heap().get(*id) {
            return Ok(module.clone());
        }
    }
    Err(RunError::type_error("a kernel definer must return a kernel module value"))
}

/// A stable textual key for a match context ("Caching is keyed
/// by... `(definer_text, define_ctx_text)`"), independent of the `HashMap`'s
/// iteration order.
fn match_context_key<N: std::fmt::Debug>(match_context: &MatchContext<usize, N>) -> String {
    let mut entries: Vec<(usize, String)> = match_context.iter().map(|(&p, h)| (p, format!("{h:?}"))).collect();
    entries.sort_by_key(|&(p, _)| p);
    entries.into_iter().map(|(p, h)| format!("{p}={h}")).collect::<Vec<_>>().join(",")
}

/// Runs a kernel-definer against `match_context`, through the process-wide
/// `(definer_text, define_ctx_text)` kernel-module cache.
pub fn define_kernel_module<N: Copy + std::fmt::Debug>(
    definer_text: &str,
    match_context: &MatchContext<usize, N>,
    to_value: impl Fn(N, &mut Interpreter) -> Value,
) -> RunResult<KernelModule> {
    let define_ctx_text = match_context_key(match_context);
    cache::kernel_modules().get_or_build(definer_text, &define_ctx_text, |definer_text, _define_ctx_text| {
        let mut interp = Interpreter::new(prelude::root_frame());
        let result = run_kernel_definer(definer_text, match_context, &to_value, &mut interp)?;
        extract_kernel_module(&result, &interp)
    })
}

/// Interprets a kernel-dispatcher's top-level lambda against the compiled
/// module and the actual runtime tensor/buffer arguments.
/// The dispatcher's body issues the launch itself, by calling a native
/// function the embedder has bound into `frame` ("bound into the
/// value universe as callable objects") that closes over their concrete
/// [`crate::kernel::Launcher`] — this function only supplies the arguments,
/// it never calls `Launcher::launch` on the dispatcher's behalf.
pub fn run_kernel_dispatcher(dispatcher_text: &str, frame: Frame, module: KernelModule, tensor_args: Vec<Value>) -> RunResult<Value> {
    let lowered = parse_and_lower(dispatcher_text)?;
    let lambda = expect_top_level_lambda(lowered)?;

    let mut interp = Interpreter::new(frame);
    let module_value = Value::Ref(interp.heap_mut().alloc(HeapValue::KernelModule(module)));
    let mut args = Vec::with_capacity(tensor_args.len() + 1);
    args.push(module_value);
    args.extend(tensor_args);
    interp.interpret_lambda(lambda, args).map_err(|e| e.with_frame("running kernel dispatcher"))
}
