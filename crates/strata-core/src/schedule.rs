// Schedule — Partition a graph into ordered execution sets
//
// Kahn-style layering:
//
//   set 0     = all nodes without incoming edges (sources)
//   set k + 1 = all unassigned nodes whose predecessors all lie in sets <= k
//
// Nodes inside one set never depend on each other, so a set may be evaluated
// in any order (or in parallel). Within a set, nodes are listed by ascending
// id so the same topology always yields the same schedule.
//
// If a round assigns nothing while nodes remain, the remaining nodes all sit
// on or behind a cycle. We walk unassigned predecessors from one of them
// until a node repeats; that node is on the cycle and is the one reported.

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};

/// One topological wave of mutually independent nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSet {
    pub index: usize,
    pub nodes: Vec<NodeId>,
}

/// Ordered execution sets plus a reverse index node → set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    sets: Vec<ExecutionSet>,
    set_of: Vec<usize>,
}

impl Schedule {
    pub fn sets(&self) -> &[ExecutionSet] {
        &self.sets
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Index of the execution set containing `node`.
    pub fn set_index(&self, node: NodeId) -> usize {
        self.set_of[node.0]
    }

    /// All nodes in execution order (set by set).
    pub fn node_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sets.iter().flat_map(|s| s.nodes.iter().copied())
    }
}

const UNASSIGNED: usize = usize::MAX;

/// Compute the execution sets of `graph`.
///
/// Fails with `CyclicGraph` if the graph has a cycle, and with `DeadNode`
/// if a node has no outgoing edges but is not marked as an output.
pub fn schedule(graph: &Graph) -> Result<Schedule> {
    let n = graph.num_nodes();
    let mut set_of = vec![UNASSIGNED; n];
    let mut pending: Vec<usize> = (0..n)
        .map(|i| graph.afferents(NodeId(i)).len())
        .collect();
    let mut sets: Vec<ExecutionSet> = Vec::new();
    let mut assigned = 0usize;

    while assigned < n {
        let index = sets.len();
        let wave: Vec<NodeId> = (0..n)
            .filter(|&i| set_of[i] == UNASSIGNED && pending[i] == 0)
            .map(NodeId)
            .collect();

        if wave.is_empty() {
            return Err(Error::CyclicGraph {
                node: find_cycle_member(graph, &set_of),
            });
        }

        // Assign the whole wave before releasing successors, so a successor
        // freed by this wave lands in the next set rather than this one.
        for &node in &wave {
            set_of[node.0] = index;
        }
        for &node in &wave {
            for &e in graph.efferents(node) {
                pending[graph.edge(e).dst.0] -= 1;
            }
        }

        assigned += wave.len();
        sets.push(ExecutionSet { index, nodes: wave });
    }

    for node in graph.nodes() {
        if !node.is_output && graph.efferents(node.id).is_empty() {
            return Err(Error::DeadNode {
                node: node.id,
                name: node.name.clone(),
            });
        }
    }

    debug!(
        nodes = n,
        sets = sets.len(),
        "scheduled graph into execution sets"
    );

    Ok(Schedule { sets, set_of })
}

/// Every unassigned node has at least one unassigned predecessor, so
/// following them must eventually revisit a node. That node is on a cycle.
fn find_cycle_member(graph: &Graph, set_of: &[usize]) -> NodeId {
    let mut visited = vec![false; set_of.len()];
    let mut current = (0..set_of.len())
        .find(|&i| set_of[i] == UNASSIGNED)
        .map(NodeId)
        .unwrap_or(NodeId(0));

    while !visited[current.0] {
        visited[current.0] = true;
        let next = graph
            .afferents(current)
            .iter()
            .map(|&e| graph.edge(e).src)
            .find(|p| set_of[p.0] == UNASSIGNED);
        match next {
            Some(p) => current = p,
            None => break,
        }
    }
    current
}
