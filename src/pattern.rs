//! DRR (Declarative Rewrite Rule) pattern-construction DSL.
//!
//! A rewrite pass is authored as two host-language closures — a
//! `source_pattern` and a `result_pattern` — each taking an `o` (op)
//! namespace and a `t` (tensor) namespace as arguments. Writing or reading an
//! attribute on `o` materializes a [`crate::graph::PatternNode`]; calling an
//! attribute already bound to an op node installs edges from its input list
//! and to its output list, indexed by position unless an argument was wrapped
//! in `__builtin_starred__`, in which case the edge is unindexed: it stands
//! for "zero or more" packed operands.
//!
//! `source_pattern` and `result_pattern` build two *separate* op graphs (one
//! per pattern side, so the source side is the only one ever handed to
//! [`crate::graph::match_graph`]), but a tensor referenced under the same
//! name in both sides must resolve to the same tensor identity rather than
//! being treated as two unrelated values. [`TensorNamespace`] gives every
//! name a stable token; each side's op graph lazily materializes its own
//! local node for a token the first time that side references it
//! ([`crate::graph::PatternGraph::node_for_token`]), so "shared by name" never
//! requires literally sharing graph storage across the two sides.

use ahash::AHashMap;

use crate::error::{ExcType, RunError, RunResult};
use crate::graph::{EdgeRole, GraphDescriptor, NodeConstraint, PatternGraph};
use crate::value::heap::HeapId;

/// One `o` namespace object: names an op graph's nodes and owns
/// the graph itself.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    graph: PatternGraph,
    /// name -> (node id, whether it was bound starred/packed)
    bound: AHashMap<String, (usize, bool)>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &PatternGraph {
        &self.graph
    }

    /// Materializes a fresh op node for `name` on first attribute access
    ///. Re-accessing the same name returns the same node.
    pub fn bind(&mut self, name: &str, packed: bool) -> RunResult<usize> {
        if let Some(&(existing, _)) = self.bound.get(name) {
            return Ok(existing);
        }
        let constraint =
            if packed { NodeConstraint::PackedOp { name: name.to_string() } } else { NodeConstraint::NativeOp { name: name.to_string() } };
        let id = self.graph.add_node(constraint);
        self.bound.insert(name.to_string(), (id, packed));
        Ok(id)
    }

    pub fn node_id(&self, name: &str) -> Option<usize> {
        self.bound.get(name).map(|&(id, _)| id)
    }

    /// Unconditionally (re)binds `name` to `node_id` (
    /// `__builtin_setattr__` on an op namespace: re-exporting a node already
    /// produced by a prior call under a new name).
    pub fn rebind(&mut self, name: &str, node_id: usize) {
        let packed = self.bound.get(name).map_or(false, |&(_, p)| p);
        self.bound.insert(name.to_string(), (node_id, packed));
    }

    /// Gets or creates this namespace's own local node for a tensor token
    ///, so an op on this side can take a cross-referenced tensor
    /// as an input/output without that tensor needing a node of its own in
    /// this namespace's name table.
    pub fn node_for_token(&mut self, token: usize, packed: bool) -> usize {
        self.graph.node_for_token(token, packed)
    }

    /// Installs edges from `inputs` into a call on `callee_node`: position
    /// `i` for a plain argument, unindexed for a starred one. A starred
    /// input also upgrades its own node to the packed variant of its
    /// constraint, since "starred" marks the referenced node as standing
    /// for zero or more collapsed units.
    pub fn apply_inputs(&mut self, callee_node: usize, inputs: &[(usize, bool)]) {
        let mut positional = 0;
        for &(arg_node, starred) in inputs {
            let role = if starred {
                self.graph.mark_packed(arg_node);
                EdgeRole::Unindexed
            } else {
                let role = EdgeRole::Indexed(positional);
                positional += 1;
                role
            };
            self.graph.add_edge(arg_node, callee_node, role);
        }
    }

    /// Installs edges from `callee_node` to `outputs` ("calling a
    /// node with input and output lists installs edges" — the output side
    /// of the same call).
    pub fn apply_outputs(&mut self, callee_node: usize, outputs: &[(usize, bool)]) {
        let mut positional = 0;
        for &(out_node, starred) in outputs {
            let role = if starred {
                self.graph.mark_packed(out_node);
                EdgeRole::Unindexed
            } else {
                let role = EdgeRole::Indexed(positional);
                positional += 1;
                role
            };
            self.graph.add_edge(callee_node, out_node, role);
        }
    }

    pub fn node_constraint(&self, node_id: usize) -> NodeConstraint {
        GraphDescriptor::node_constraint(&self.graph, node_id)
    }
}

/// The `t` namespace object: a name → stable token registry
/// shared, by heap identity, between a rewrite pass's `source_pattern` and
/// `result_pattern` decorator calls. Carries no graph of its own — see the
/// module docs for why each op namespace materializes its own local node per
/// token instead.
#[derive(Debug, Clone, Default)]
pub struct TensorNamespace {
    tokens: AHashMap<String, (usize, bool)>,
    next_token: usize,
}

impl TensorNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materializes a fresh token for `name` on first attribute access, or
    /// returns the existing one.
    pub fn bind(&mut self, name: &str, packed: bool) -> usize {
        if let Some(&(token, _)) = self.tokens.get(name) {
            return token;
        }
        let token = self.next_token;
        self.next_token += 1;
        self.tokens.insert(name.to_string(), (token, packed));
        token
    }

    /// Re-binds `name` to an already-existing token (an attribute write of
    /// the form `t.x = t.x`, a no-op, or `t.y = t.x` aliasing two names to
    /// the same tensor). Refuses to rebind a name already pointing elsewhere.
    pub fn alias(&mut self, name: &str, token: usize) -> RunResult<()> {
        if let Some(&(existing, _)) = self.tokens.get(name) {
            if existing != token {
                return Err(RunError::new(ExcType::Attribute, format!("tensor name '{name}' already bound in this namespace")));
            }
            return Ok(());
        }
        self.tokens.insert(name.to_string(), (token, false));
        Ok(())
    }

    pub fn token_of(&self, name: &str) -> Option<usize> {
        self.tokens.get(name).map(|&(t, _)| t)
    }
}

/// A pattern-node value bound to the op namespace it was materialized in
///: carried as a [`crate::value::HeapValue::PatternNode`] so
/// that calling it (installing edges) can reach back into the owning
/// namespace's graph, addressed by [`HeapId`] rather than embedding the
/// namespace directly.
#[derive(Debug, Clone)]
pub struct BoundPatternNode {
    pub namespace: HeapId,
    pub node_id: usize,
}

/// A tensor attribute's value (`t.x`): the stable cross-namespace
/// identity for a name bound on the shared [`TensorNamespace`], not yet
/// resolved to any particular op graph's local node — that resolution
/// happens lazily, per pattern side, the first time the token is used as a
/// call input/output (see [`Namespace::node_for_token`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorToken(pub usize);

/// The DRR context object passed to a rewrite pass's decorators:
/// owns the separate source/result op namespaces and the tensor namespace
/// shared between them, each addressed by the [`HeapId`] of its own heap
/// allocation so `source_pattern`/`result_pattern` can be handed the
/// identical `t` namespace value both times.
#[derive(Debug, Clone)]
pub struct DrrContext {
    pub pass_name: String,
    pub source_ops: HeapId,
    pub result_ops: HeapId,
    pub tensors: HeapId,
}

impl DrrContext {
    pub fn new(pass_name: impl Into<String>, source_ops: HeapId, result_ops: HeapId, tensors: HeapId) -> Self {
        Self { pass_name: pass_name.into(), source_ops, result_ops, tensors }
    }
}
