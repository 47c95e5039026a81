//! Generic graph & matcher.
//!
//! [`GraphDescriptor`] is shared by the pattern graph the DRR DSL builds
//! (`pattern.rs`) and whatever host-IR graph the embedding compiler exposes:
//! the matcher in this file never looks past this trait, so it has no
//! knowledge of concrete IR node types.

use std::collections::VecDeque;
use std::hash::Hash;

use ahash::{AHashMap, AHashSet};

use crate::error::{ExcType, RunError, RunResult};

/// What a pattern node expects of whatever host node it might match: a
/// native single op/value, or a "packed" (zero-or-more) op/value standing in
/// for a starred group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeConstraint {
    NativeOp { name: String },
    PackedOp { name: String },
    NativeValue,
    PackedValue,
}

/// The role an edge plays at the node it arrives at: one fixed operand
/// position, or an unindexed member of a packed (starred) operand group
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeRole {
    Indexed(usize),
    Unindexed,
}

/// A constructed pattern node: the DRR `o`/`t` namespaces
/// materialize one of these on every attribute write.
#[derive(Debug, Clone)]
pub struct PatternNode {
    pub id: usize,
    pub constraint: NodeConstraint,
}

/// Shared traversal/constraint surface for both the pattern graph and a host
/// IR graph.
pub trait GraphDescriptor {
    type NodeId: Copy + Eq + Hash + std::fmt::Debug;

    /// Each neighbor paired with the role the connecting edge plays at
    /// `node`'s end, so callers can pair pattern edges with host edges of the
    /// same role instead of matching positions at random.
    fn upstream(&self, node: Self::NodeId) -> Vec<(Self::NodeId, EdgeRole)>;
    fn downstream(&self, node: Self::NodeId) -> Vec<(Self::NodeId, EdgeRole)>;
    /// Whether `node` satisfies `constraint` (name match for ops, arity/kind
    /// match for packed groups).
    fn satisfies(&self, node: Self::NodeId, constraint: &NodeConstraint) -> bool;
    fn node_constraint(&self, node: Self::NodeId) -> NodeConstraint;
    /// Host-graph nodes the matcher should never bind to (e.g. control-flow
    /// scaffolding with no pattern-side counterpart). The matcher walks
    /// straight through an ignored node to its own neighbors rather than
    /// treating it as a dead end.
    fn is_ignored(&self, node: Self::NodeId) -> bool;
}

/// A directed multigraph of [`PatternNode`]s built by the DRR DSL.
#[derive(Debug, Clone, Default)]
pub struct PatternGraph {
    nodes: Vec<PatternNode>,
    edges: Vec<(usize, usize, EdgeRole)>,
    /// Maps a cross-namespace tensor identity token (a tensor
    /// bound by name in the source pattern is referred to, not re-created,
    /// by the result pattern) to the node materialized for it *in this
    /// graph specifically* — each pattern side (source/result) gets its own
    /// node for the same tensor, lazily created on first reference.
    token_nodes: AHashMap<usize, usize>,
}

impl PatternGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, constraint: NodeConstraint) -> usize {
        let id = self.nodes.len();
        self.nodes.push(PatternNode { id, constraint });
        id
    }

    pub fn add_edge(&mut self, from: usize, to: usize, role: EdgeRole) {
        self.edges.push((from, to, role));
    }

    /// Upgrades a node's constraint to its "packed" variant: a node used
    /// starred in an input/output list stands for "zero or more" collapsed
    /// into a unit. A no-op if the node is already packed.
    pub fn mark_packed(&mut self, node: usize) {
        let constraint = &mut self.nodes[node].constraint;
        *constraint = match std::mem::replace(constraint, NodeConstraint::NativeValue) {
            NodeConstraint::NativeOp { name } => NodeConstraint::PackedOp { name },
            NodeConstraint::NativeValue => NodeConstraint::PackedValue,
            already_packed => already_packed,
        };
    }

    /// Gets or creates this graph's local node for a cross-namespace tensor
    /// token, so a tensor named in both the source and result
    /// pattern ends up as one node per side, not duplicated on every access.
    pub fn node_for_token(&mut self, token: usize, packed: bool) -> usize {
        if let Some(&id) = self.token_nodes.get(&token) {
            return id;
        }
        let constraint = if packed { NodeConstraint::PackedValue } else { NodeConstraint::NativeValue };
        let id = self.add_node(constraint);
        self.token_nodes.insert(token, id);
        id
    }

    /// Picks the graph-center node (minimal eccentricity over shortest-path
    /// distances in the undirected sense) as the anchor to root the matcher
    /// at.
    pub fn anchor(&self) -> Option<usize> {
        if self.nodes.is_empty() {
            return None;
        }
        let adjacency = self.undirected_adjacency();
        (0..self.nodes.len()).min_by_key(|&n| self.eccentricity(n, &adjacency))
    }

    fn undirected_adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for &(from, to, _) in &self.edges {
            adjacency[from].push(to);
            adjacency[to].push(from);
        }
        adjacency
    }

    fn eccentricity(&self, start: usize, adjacency: &[Vec<usize>]) -> usize {
        let mut dist = vec![usize::MAX; self.nodes.len()];
        dist[start] = 0;
        let mut queue = VecDeque::from([start]);
        let mut max_dist = 0;
        while let Some(node) = queue.pop_front() {
            for &next in &adjacency[node] {
                if dist[next] == usize::MAX {
                    dist[next] = dist[node] + 1;
                    max_dist = max_dist.max(dist[next]);
                    queue.push_back(next);
                }
            }
        }
        max_dist
    }
}

impl GraphDescriptor for PatternGraph {
    type NodeId = usize;

    fn upstream(&self, node: usize) -> Vec<(usize, EdgeRole)> {
        self.edges.iter().filter(|&&(_, to, _)| to == node).map(|&(from, _, role)| (from, role)).collect()
    }

    fn downstream(&self, node: usize) -> Vec<(usize, EdgeRole)> {
        self.edges.iter().filter(|&&(from, _, _)| from == node).map(|&(_, to, role)| (to, role)).collect()
    }

    fn satisfies(&self, node: usize, constraint: &NodeConstraint) -> bool {
        &self.nodes[node].constraint == constraint
    }

    fn node_constraint(&self, node: usize) -> NodeConstraint {
        self.nodes[node].constraint.clone()
    }

    fn is_ignored(&self, _node: usize) -> bool {
        false
    }
}

/// The result of a successful match: a 1:1 mapping from pattern node to host
/// node.
pub type MatchContext<P, H> = AHashMap<P, H>;

/// Anchor-rooted BFS subgraph-isomorphism matcher.
///
/// Walks the pattern graph breadth-first from `pattern_anchor`, maintaining a
/// candidate set of host nodes for each pattern node as it is discovered.
/// When a pattern node has more than one viable candidate the choice is
/// deferred and tried via backtracking; [`ExcType::Mismatch`] is used purely
/// as the internal "this candidate doesn't work, try the next one" signal and
/// never escapes this function.
pub fn match_graph<P, H>(
    pattern: &P,
    pattern_anchor: P::NodeId,
    host: &H,
    host_anchor: H::NodeId,
) -> RunResult<Option<MatchContext<P::NodeId, H::NodeId>>>
where
    P: GraphDescriptor,
    H: GraphDescriptor,
{
    if !host.satisfies(host_anchor, &pattern.node_constraint(pattern_anchor)) {
        return Ok(None);
    }
    let mut assignment = AHashMap::default();
    assignment.insert(pattern_anchor, host_anchor);
    match extend(pattern, host, &mut assignment, &[pattern_anchor]) {
        Ok(()) => Ok(Some(assignment)),
        Err(e) if e.kind == ExcType::Mismatch => Ok(None),
        Err(e) => Err(e),
    }
}

/// Host neighbors of `node` in the given direction whose connecting edge
/// plays `role`, walking straight through any ignored node instead of
/// stopping at it ("ignored nodes are passed through without consuming a
/// host node"). A `visited` set guards against looping through a cycle of
/// ignored scaffolding.
fn role_matched_host_neighbors<H: GraphDescriptor>(
    host: &H,
    node: H::NodeId,
    role: EdgeRole,
    want_downstream: bool,
    visited: &mut AHashSet<H::NodeId>,
) -> Vec<H::NodeId> {
    if !visited.insert(node) {
        return Vec::new();
    }
    let neighbors = if want_downstream { host.downstream(node) } else { host.upstream(node) };
    let mut out = Vec::new();
    for (neighbor, edge_role) in neighbors {
        if edge_role != role {
            continue;
        }
        if host.is_ignored(neighbor) {
            out.extend(role_matched_host_neighbors(host, neighbor, role, want_downstream, visited));
        } else {
            out.push(neighbor);
        }
    }
    out
}

fn extend<P, H>(
    pattern: &P,
    host: &H,
    assignment: &mut MatchContext<P::NodeId, H::NodeId>,
    frontier: &[P::NodeId],
) -> RunResult<()>
where
    P: GraphDescriptor,
    H: GraphDescriptor,
{
    let mut next_frontier = Vec::new();
    for &p_node in frontier {
        let h_node = assignment[&p_node];
        for (p_neighbors, want_downstream) in [(pattern.downstream(p_node), true), (pattern.upstream(p_node), false)] {
            for (p_next, role) in p_neighbors {
                let mut visited = AHashSet::default();
                let h_neighbors = role_matched_host_neighbors(host, h_node, role, want_downstream, &mut visited);
                if let Some(&already) = assignment.get(&p_next) {
                    if !h_neighbors.contains(&already) {
                        return Err(RunError::mismatch("pattern edge has no corresponding host edge"));
                    }
                    continue;
                }
                let constraint = pattern.node_constraint(p_next);
                let candidates: Vec<H::NodeId> =
                    h_neighbors.into_iter().filter(|&h| host.satisfies(h, &constraint)).collect();
                if candidates.is_empty() {
                    return Err(RunError::mismatch("no host candidate satisfies the pattern constraint"));
                }
                let chosen = choose_candidate(pattern, host, assignment, p_next, &candidates)?;
                assignment.insert(p_next, chosen);
                next_frontier.push(p_next);
            }
        }
    }
    if next_frontier.is_empty() {
        Ok(())
    } else {
        extend(pattern, host, assignment, &next_frontier)
    }
}

/// Tries each surviving candidate in order, backtracking past the whole
/// remaining match on mismatch ("tie-break deferral").
fn choose_candidate<P, H>(
    pattern: &P,
    host: &H,
    assignment: &MatchContext<P::NodeId, H::NodeId>,
    p_node: P::NodeId,
    candidates: &[H::NodeId],
) -> RunResult<H::NodeId>
where
    P: GraphDescriptor,
    H: GraphDescriptor,
{
    let assigned_hosts: AHashSet<H::NodeId> = assignment.values().copied().collect();
    let mut last_err: Option<RunError> = None;
    for &candidate in candidates {
        if assigned_hosts.contains(&candidate) {
            continue;
        }
        let mut trial = assignment.clone();
        trial.insert(p_node, candidate);
        match extend(pattern, host, &mut trial, &[p_node]) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind == ExcType::Mismatch => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| RunError::mismatch("no surviving candidate for pattern node")))
}
