//! Per-function control flow graphs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;
use crate::graph;

/// A vertex in a control flow graph: one basic block, identified by its
/// (mode-stripped) numeric address.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CfgBlock {
    index: usize,
    baddr: String,
}

impl CfgBlock {
    pub fn new(index: usize, baddr: String) -> CfgBlock {
        CfgBlock { index, baddr }
    }

    pub fn baddr(&self) -> &str {
        &self.baddr
    }
}

impl graph::Vertex for CfgBlock {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        self.baddr.clone()
    }
}

/// A control-flow edge between two blocks.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CfgEdge {
    head: usize,
    tail: usize,
}

impl CfgEdge {
    pub fn new(head: usize, tail: usize) -> CfgEdge {
        CfgEdge { head, tail }
    }
}

impl graph::Edge for CfgEdge {
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

/// The control flow graph of one function.
///
/// Blocks are addressed by numeric block address; the entry block is the
/// one at the function address.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Cfg {
    graph: graph::Graph<CfgBlock, CfgEdge>,
    indices: BTreeMap<u64, usize>,
    entry: u64,
}

impl Cfg {
    /// Build a CFG from block addresses and their successor lists. All
    /// addresses may carry mode prefixes; they are normalized to numeric
    /// form. Edge endpoints must name known blocks.
    pub fn new(
        entry: &str,
        blocks: &[String],
        edges: &[(String, String)],
    ) -> Result<Cfg, Error> {
        let mut graph = graph::Graph::new();
        let mut indices = BTreeMap::new();
        for baddr in blocks {
            let addr = super::parse_address(baddr)?;
            if indices.contains_key(&addr) {
                continue;
            }
            let index = indices.len();
            graph.insert_vertex(CfgBlock::new(index, super::format_address(addr)))?;
            indices.insert(addr, index);
        }
        for (src, tgt) in edges {
            let src = super::parse_address(src)?;
            let tgt = super::parse_address(tgt)?;
            let head = *indices
                .get(&src)
                .ok_or_else(|| Error::MissingAddress(super::format_address(src)))?;
            let tail = *indices
                .get(&tgt)
                .ok_or_else(|| Error::MissingAddress(super::format_address(tgt)))?;
            if !graph.has_edge(head, tail) {
                graph.insert_edge(CfgEdge::new(head, tail))?;
            }
        }
        Ok(Cfg {
            graph,
            indices,
            entry: super::parse_address(entry)?,
        })
    }

    pub fn entry_address(&self) -> String {
        super::format_address(self.entry)
    }

    pub fn block_count(&self) -> usize {
        self.graph.num_vertices()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.num_edges()
    }

    pub fn has_block(&self, addr: u64) -> bool {
        self.indices.contains_key(&addr)
    }

    /// Numeric block addresses in ascending order.
    pub fn block_addresses(&self) -> Vec<u64> {
        self.indices.keys().copied().collect()
    }

    /// The edge relation as a set of numeric (source, target) address
    /// pairs.
    pub fn edges_as_set(&self) -> BTreeSet<(u64, u64)> {
        let addr_of: BTreeMap<usize, u64> =
            self.indices.iter().map(|(a, i)| (*i, *a)).collect();
        self.graph
            .edge_indices()
            .iter()
            .filter_map(|(head, tail)| {
                Some((*addr_of.get(head)?, *addr_of.get(tail)?))
            })
            .collect()
    }

    /// Successor block addresses of `addr`, ascending.
    pub fn successors(&self, addr: u64) -> Vec<u64> {
        self.neighbors(addr, true)
    }

    /// Predecessor block addresses of `addr`, ascending.
    pub fn predecessors(&self, addr: u64) -> Vec<u64> {
        self.neighbors(addr, false)
    }

    fn neighbors(&self, addr: u64, forward: bool) -> Vec<u64> {
        let index = match self.indices.get(&addr) {
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
        let addr_of: BTreeMap<usize, u64> =
            self.indices.iter().map(|(a, i)| (*i, *a)).collect();
        let mut result: Vec<u64> = neighbor_indices
            .into_iter()
            .filter_map(|i| addr_of.get(&i).copied())
            .collect();
        result.sort_unstable();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Cfg {
        Cfg::new(
            "0x1000",
            &[
                "0x1000".to_string(),
                "0x1010".to_string(),
                "0x1020".to_string(),
                "0x1030".to_string(),
            ],
            &[
                ("0x1000".to_string(), "0x1010".to_string()),
                ("0x1000".to_string(), "0x1020".to_string()),
                ("0x1010".to_string(), "0x1030".to_string()),
                ("0x1020".to_string(), "0x1030".to_string()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_counts() {
        let cfg = diamond();
        assert_eq!(cfg.block_count(), 4);
        assert_eq!(cfg.edge_count(), 4);
    }

    #[test]
    fn test_successors_and_predecessors() {
        let cfg = diamond();
        assert_eq!(cfg.successors(0x1000), vec![0x1010, 0x1020]);
        assert_eq!(cfg.predecessors(0x1030), vec![0x1010, 0x1020]);
        assert!(cfg.successors(0x1030).is_empty());
    }

    #[test]
    fn test_edges_as_set() {
        let cfg = diamond();
        let edges = cfg.edges_as_set();
        assert!(edges.contains(&(0x1000, 0x1020)));
        assert_eq!(edges.len(), 4);
    }

    #[test]
    fn test_edge_to_unknown_block_is_rejected() {
        let result = Cfg::new(
            "0x1000",
            &["0x1000".to_string()],
            &[("0x1000".to_string(), "0x2000".to_string())],
        );
        assert!(result.is_err());
    }
}
