//! Zero-cost-when-unused tracing hooks.
//!
//! The interpreter calls through a `&mut dyn Tracer` rather than hard-coding
//! a particular sink, keeping diagnostics behind a trait object instead of
//! baking `tracing` macros into the hot loop directly. [`TracingTracer`] is
//! the one real implementation, forwarding to the `tracing` crate;
//! [`NoopTracer`] is the default for callers that don't want the overhead.

use crate::ast::core::{Atomic, ComposedCall};
use crate::graph::NodeConstraint;
use crate::value::Value;

/// Hook points a [`crate::interp::Interpreter`] run touches: composed-call
/// dispatch, closure entry, matcher decisions.
pub trait Tracer {
    fn on_composed_call(&mut self, _call: &ComposedCall) {}
    fn on_closure_entry(&mut self, _params: &[Atomic], _args: &[Value]) {}
    fn on_match_candidate(&mut self, _pattern_node: usize, _constraint: &NodeConstraint, _accepted: bool) {}
}

/// The default tracer: every hook is a no-op, compiling down to nothing.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Forwards every hook to `tracing` at debug level, for embedders that want
/// a subscriber-visible trail without modifying the interpreter.
#[derive(Debug, Default)]
pub struct TracingTracer;

impl Tracer for TracingTracer {
    fn on_composed_call(&mut self, call: &ComposedCall) {
        tracing::debug!(args = call.args.len(), "composed call dispatch");
    }

    fn on_closure_entry(&mut self, params: &[Atomic], args: &[Value]) {
        tracing::debug!(params = params.len(), args = args.len(), "closure entry");
    }

    fn on_match_candidate(&mut self, pattern_node: usize, constraint: &NodeConstraint, accepted: bool) {
        tracing::debug!(pattern_node, ?constraint, accepted, "match candidate");
    }
}
