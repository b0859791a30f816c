//! The application call graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::graph;

/// A call graph node: either an application function, identified by its
/// numeric address, or an unresolved external target known only by name.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CallgraphNode {
    index: usize,
    name: String,
}

impl CallgraphNode {
    pub fn new(index: usize, name: String) -> CallgraphNode {
        CallgraphNode { index, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl graph::Vertex for CallgraphNode {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        self.name.clone()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CallgraphEdge {
    head: usize,
    tail: usize,
}

impl graph::Edge for CallgraphEdge {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn dot_label(&self) -> String {
        String::new()
    }
}

/// Who-calls-whom over one binary. Nodes are keyed by name: a function's
/// name is its formatted address unless a symbol name is known.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Callgraph {
    graph: graph::Graph<CallgraphNode, CallgraphEdge>,
    indices: BTreeMap<String, usize>,
}

impl Callgraph {
    pub fn new() -> Callgraph {
        Callgraph::default()
    }

    /// Add a node if not already present; returns its index.
    pub fn add_node(&mut self, name: &str) -> Result<usize, Error> {
        if let Some(&index) = self.indices.get(name) {
            return Ok(index);
        }
        let index = self.indices.len();
        self.graph
            .insert_vertex(CallgraphNode::new(index, name.to_string()))?;
        self.indices.insert(name.to_string(), index);
        Ok(index)
    }

    /// Record a call from `caller` to `callee`, creating nodes as needed.
    pub fn add_call(&mut self, caller: &str, callee: &str) -> Result<(), Error> {
        let head = self.add_node(caller)?;
        let tail = self.add_node(callee)?;
        if !self.graph.has_edge(head, tail) {
            self.graph.insert_edge(CallgraphEdge { head, tail })?;
        }
        Ok(())
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.num_vertices()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.num_edges()
    }

    /// The names every node calls, ascending.
    pub fn callees(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, true)
    }

    /// The names of every node calling `name`, ascending.
    pub fn callers(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, false)
    }

    fn neighbors(&self, name: &str, forward: bool) -> Vec<&str> {
        let index = match self.indices.get(name) {
            Some(index) => *index,
            None => return Vec::new(),
        };
        let neighbor_indices = if forward {
            self.graph.successor_indices(index)
        } else {
            self.graph.predecessor_indices(index)
        };
        let neighbor_indices = match neighbor_indices {
            Ok(indices) => indices,
            Err(_) => return Vec::new(),
        };
        let mut names: Vec<&str> = neighbor_indices
            .into_iter()
            .filter_map(|i| self.graph.vertex(i).ok().map(|v| v.name()))
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_call_creates_nodes() {
        let mut cg = Callgraph::new();
        cg.add_call("0x1000", "0x2000").unwrap();
        cg.add_call("0x1000", "memcpy").unwrap();
        cg.add_call("0x2000", "memcpy").unwrap();
        assert_eq!(cg.node_count(), 3);
        assert_eq!(cg.edge_count(), 3);
        assert_eq!(cg.callees("0x1000"), vec!["0x2000", "memcpy"]);
        assert_eq!(cg.callers("memcpy"), vec!["0x1000", "0x2000"]);
    }

    #[test]
    fn test_duplicate_call_is_idempotent() {
        let mut cg = Callgraph::new();
        cg.add_call("a", "b").unwrap();
        cg.add_call("a", "b").unwrap();
        assert_eq!(cg.edge_count(), 1);
    }
}
