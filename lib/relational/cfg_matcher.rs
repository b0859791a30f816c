//! Best-effort CFG block matching.
//!
//! Used when two functions are not address-isomorphic: the patch inserted,
//! removed, or resized blocks. Matching is conservative: blocks are paired
//! only on strong evidence (entry position, a content hash unique on both
//! sides, or being the only unmatched neighbor of an already-matched
//! pair), and anything left over is reported as unmatched rather than
//! guessed.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::app::{parse_address, BasicBlock, Function};

/// The outcome of a best-effort block correspondence.
#[derive(Clone, Debug)]
pub struct CfgMatchResult {
    /// Matched block addresses, version 1 to version 2.
    pub mapping: BTreeMap<u64, u64>,
    /// Version-1 blocks with no counterpart (removed or changed beyond
    /// recognition).
    pub unmatched1: Vec<u64>,
    /// Version-2 blocks with no counterpart (added).
    pub unmatched2: Vec<u64>,
    /// Matched nodes over version-1 nodes.
    pub node_ratio: f64,
    /// Version-1 edges preserved under the mapping, over version-1 edges.
    pub edge_ratio: f64,
}

fn block_md5(block: &BasicBlock, reversed: bool) -> String {
    if reversed {
        block.rev_md5()
    } else {
        block.md5()
    }
}

/// Match the blocks of two non-isomorphic functions.
pub fn match_cfgs(fn1: &Function, fn2: &Function, endian_mismatch: bool) -> CfgMatchResult {
    let mut mapping: BTreeMap<u64, u64> = BTreeMap::new();
    let mut matched2: BTreeSet<u64> = BTreeSet::new();

    // the entry blocks correspond by construction
    if let (Ok(entry1), Ok(entry2)) = (
        parse_address(fn1.faddr()),
        parse_address(fn2.faddr()),
    ) {
        if fn1.has_block(entry1) && fn2.has_block(entry2) {
            mapping.insert(entry1, entry2);
            matched2.insert(entry2);
        }
    }

    // content hashes that are unique on both sides
    let md5s1 = md5_index(fn1, false, &mapping, |a, m| m.contains_key(&a));
    let md5s2 = md5_index(fn2, endian_mismatch, &mapping, |a, _| matched2.contains(&a));
    for (md5, addrs1) in &md5s1 {
        if let (1, Some(addrs2)) = (addrs1.len(), md5s2.get(md5)) {
            if addrs2.len() == 1 {
                mapping.insert(addrs1[0], addrs2[0]);
                matched2.insert(addrs2[0]);
            }
        }
    }

    // propagate along the edge relation to a fixpoint
    loop {
        let mut changed = false;
        let pairs: Vec<(u64, u64)> = mapping.iter().map(|(a, b)| (*a, *b)).collect();
        for (a, b) in pairs {
            for forward in [true, false] {
                let cand1 = sole_unmatched_neighbor(fn1, a, forward, |x| {
                    mapping.contains_key(&x)
                });
                let cand2 = sole_unmatched_neighbor(fn2, b, forward, |x| {
                    matched2.contains(&x)
                });
                if let (Some(n1), Some(n2)) = (cand1, cand2) {
                    if !mapping.contains_key(&n1) && !matched2.contains(&n2) {
                        debug!(
                            "cfg matcher: 0x{:x} -> 0x{:x} via neighbor propagation",
                            n1, n2
                        );
                        mapping.insert(n1, n2);
                        matched2.insert(n2);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    let unmatched1: Vec<u64> = fn1
        .cfg()
        .block_addresses()
        .into_iter()
        .filter(|a| !mapping.contains_key(a))
        .collect();
    let unmatched2: Vec<u64> = fn2
        .cfg()
        .block_addresses()
        .into_iter()
        .filter(|a| !matched2.contains(a))
        .collect();

    let nodes1 = fn1.cfg().block_count().max(1);
    let node_ratio = mapping.len() as f64 / nodes1 as f64;

    let edges2 = fn2.cfg().edges_as_set();
    let mut preserved = 0usize;
    let edges1 = fn1.cfg().edges_as_set();
    for (src, tgt) in &edges1 {
        if let (Some(m_src), Some(m_tgt)) = (mapping.get(src), mapping.get(tgt)) {
            if edges2.contains(&(*m_src, *m_tgt)) {
                preserved += 1;
            }
        }
    }
    let edge_ratio = preserved as f64 / edges1.len().max(1) as f64;

    CfgMatchResult {
        mapping,
        unmatched1,
        unmatched2,
        node_ratio,
        edge_ratio,
    }
}

fn md5_index<F>(
    f: &Function,
    reversed: bool,
    mapping: &BTreeMap<u64, u64>,
    is_matched: F,
) -> BTreeMap<String, Vec<u64>>
where
    F: Fn(u64, &BTreeMap<u64, u64>) -> bool,
{
    let mut index: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for block in f.blocks() {
        if let Ok(addr) = parse_address(block.real_baddr()) {
            if is_matched(addr, mapping) {
                continue;
            }
            index
                .entry(block_md5(block, reversed))
                .or_default()
                .push(addr);
        }
    }
    index
}

/// The single unmatched successor (or predecessor) of a block, if there is
/// exactly one.
fn sole_unmatched_neighbor<F>(f: &Function, addr: u64, forward: bool, is_matched: F) -> Option<u64>
where
    F: Fn(u64) -> bool,
{
    let neighbors = if forward {
        f.cfg().successors(addr)
    } else {
        f.cfg().predecessors(addr)
    };
    let mut unmatched = neighbors.into_iter().filter(|n| !is_matched(*n));
    match (unmatched.next(), unmatched.next()) {
        (Some(n), None) => Some(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{InstrXData, Instruction};
    use crate::opcodes::Opcode;

    fn instr(iaddr: &str, bytes: Vec<u8>) -> Instruction {
        Instruction::new(
            iaddr.to_string(),
            bytes,
            Opcode::unknown("test"),
            InstrXData::default(),
        )
    }

    fn block(baddr: u64, byte: u8) -> BasicBlock {
        let addr = format!("0x{:x}", baddr);
        BasicBlock::new(addr.clone(), vec![instr(&addr, vec![byte])]).unwrap()
    }

    /// entry -> a -> exit with distinctive bytes per block.
    fn linear_function(base: u64, bytes: &[u8]) -> Function {
        let blocks: Vec<BasicBlock> = bytes
            .iter()
            .enumerate()
            .map(|(i, b)| block(base + (i as u64) * 0x10, *b))
            .collect();
        let edges: Vec<(String, String)> = (1..bytes.len())
            .map(|i| {
                (
                    format!("0x{:x}", base + ((i - 1) as u64) * 0x10),
                    format!("0x{:x}", base + (i as u64) * 0x10),
                )
            })
            .collect();
        Function::new(format!("0x{:x}", base), blocks, edges).unwrap()
    }

    #[test]
    fn test_identical_shape_matches_fully() {
        let f1 = linear_function(0x1000, &[1, 2, 3]);
        let f2 = linear_function(0x2000, &[1, 2, 3]);
        let result = match_cfgs(&f1, &f2, false);
        assert_eq!(result.mapping.len(), 3);
        assert!(result.unmatched1.is_empty());
        assert!(result.unmatched2.is_empty());
        assert_eq!(result.node_ratio, 1.0);
        assert_eq!(result.edge_ratio, 1.0);
    }

    #[test]
    fn test_added_block_is_reported_unmatched() {
        let f1 = linear_function(0x1000, &[1, 2]);
        let f2 = linear_function(0x2000, &[1, 9, 2]);
        let result = match_cfgs(&f1, &f2, false);
        // entry matches by position; block 2 matches by unique hash
        assert_eq!(result.mapping.get(&0x1000), Some(&0x2000));
        assert_eq!(result.mapping.get(&0x1010), Some(&0x2020));
        assert_eq!(result.unmatched2, vec![0x2010]);
    }

    #[test]
    fn test_neighbor_propagation_matches_changed_block() {
        // middle block differs in content on both sides, but is the sole
        // unmatched successor of the matched entry
        let f1 = linear_function(0x1000, &[1, 5, 3]);
        let f2 = linear_function(0x2000, &[1, 7, 3]);
        let result = match_cfgs(&f1, &f2, false);
        assert_eq!(result.mapping.get(&0x1010), Some(&0x2010));
        assert_eq!(result.mapping.len(), 3);
    }
}
