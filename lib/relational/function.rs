//! Function-pair comparison.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use log::debug;

use crate::app::{format_address, parse_address, Function};
use crate::relational::block::BlockRelationalAnalysis;
use crate::relational::cfg_matcher::{match_cfgs, CfgMatchResult};

/// Comparison of two functions believed to correspond.
///
/// The block correspondence prefers an exact test: when the two versions
/// are address-isomorphic (same shape, every block shifted by the entry
/// offset) the mapping is the shift itself. Only when that test fails is
/// the CFG matcher consulted, once, with its result memoized.
pub struct FunctionRelationalAnalysis<'a> {
    fn1: &'a Function,
    fn2: &'a Function,
    endian_mismatch: bool,
    cfg_match: OnceCell<CfgMatchResult>,
    block_mapping: OnceCell<BTreeMap<u64, u64>>,
    block_analyses: OnceCell<Vec<BlockRelationalAnalysis<'a>>>,
}

impl<'a> FunctionRelationalAnalysis<'a> {
    pub fn new(
        fn1: &'a Function,
        fn2: &'a Function,
        endian_mismatch: bool,
    ) -> FunctionRelationalAnalysis<'a> {
        FunctionRelationalAnalysis {
            fn1,
            fn2,
            endian_mismatch,
            cfg_match: OnceCell::new(),
            block_mapping: OnceCell::new(),
            block_analyses: OnceCell::new(),
        }
    }

    pub fn fn1(&self) -> &Function {
        self.fn1
    }

    pub fn fn2(&self) -> &Function {
        self.fn2
    }

    fn entry_addresses(&self) -> Option<(u64, u64)> {
        match (
            parse_address(self.fn1.faddr()),
            parse_address(self.fn2.faddr()),
        ) {
            (Ok(a1), Ok(a2)) => Some((a1, a2)),
            _ => None,
        }
    }

    /// The address shift applied to the function in the second version.
    pub fn offset(&self) -> i64 {
        self.entry_addresses()
            .map(|(a1, a2)| a2 as i64 - a1 as i64)
            .unwrap_or(0)
    }

    pub fn moved(&self) -> bool {
        self.offset() != 0
    }

    /// Endianness-normalized content-hash equality of the whole function.
    pub fn is_md5_equal(&self) -> bool {
        let md5_2 = if self.endian_mismatch {
            self.fn2.rev_md5()
        } else {
            self.fn2.md5()
        };
        self.fn1.md5() == md5_2
    }

    /// The two versions have the same CFG shape with every block address
    /// shifted by the entry offset.
    pub fn is_structurally_equivalent(&self) -> bool {
        let cfg1 = self.fn1.cfg();
        let cfg2 = self.fn2.cfg();
        if cfg1.block_count() != cfg2.block_count() || cfg1.edge_count() != cfg2.edge_count() {
            return false;
        }
        let offset = self.offset();
        let shift = |a: u64| (a as i64 - offset) as u64;
        let blocks1 = cfg1.block_addresses();
        let blocks2: Vec<u64> = cfg2.block_addresses().into_iter().map(shift).collect();
        if blocks1 != blocks2 {
            return false;
        }
        let edges2: std::collections::BTreeSet<(u64, u64)> = cfg2
            .edges_as_set()
            .into_iter()
            .map(|(s, t)| (shift(s), shift(t)))
            .collect();
        cfg1.edges_as_set() == edges2
    }

    /// The CFG matcher result, computed once on first use.
    pub fn cfg_match(&self) -> &CfgMatchResult {
        self.cfg_match.get_or_init(|| {
            debug!(
                "function {} is not address-isomorphic to {}; invoking cfg matcher",
                self.fn1.faddr(),
                self.fn2.faddr()
            );
            match_cfgs(self.fn1, self.fn2, self.endian_mismatch)
        })
    }

    /// Block addresses of version 1 mapped to block addresses of version 2.
    pub fn block_mapping(&self) -> &BTreeMap<u64, u64> {
        self.block_mapping.get_or_init(|| {
            if self.is_structurally_equivalent() {
                let offset = self.offset();
                self.fn1
                    .cfg()
                    .block_addresses()
                    .into_iter()
                    .map(|a| (a, (a as i64 + offset) as u64))
                    .collect()
            } else {
                self.cfg_match().mapping.clone()
            }
        })
    }

    /// Per-pair block analyses for all mapped blocks.
    pub fn block_analyses(&self) -> &[BlockRelationalAnalysis<'a>] {
        self.block_analyses.get_or_init(|| {
            self.block_mapping()
                .iter()
                .filter_map(|(a1, a2)| {
                    match (self.fn1.block(*a1), self.fn2.block(*a2)) {
                        (Some(b1), Some(b2)) => Some(BlockRelationalAnalysis::new(
                            b1,
                            b2,
                            self.endian_mismatch,
                        )),
                        _ => None,
                    }
                })
                .collect()
        })
    }

    /// Addresses of version-1 blocks whose content differs or that have no
    /// counterpart, ascending.
    pub fn blocks_changed(&self) -> Vec<u64> {
        let mapping = self.block_mapping();
        let mut changed: Vec<u64> = self
            .block_analyses()
            .iter()
            .filter(|bra| bra.is_changed())
            .filter_map(|bra| parse_address(bra.b1().real_baddr()).ok())
            .collect();
        for addr in self.fn1.cfg().block_addresses() {
            if !mapping.contains_key(&addr) {
                changed.push(addr);
            }
        }
        changed.sort_unstable();
        changed.dedup();
        changed
    }

    pub fn is_changed(&self) -> bool {
        !self.is_md5_equal()
    }

    /// Plain-text block comparison table.
    pub fn report(&self) -> String {
        let mut lines = vec![format!(
            "function {} -> {}",
            self.fn1.faddr(),
            self.fn2.faddr()
        )];
        if self.is_md5_equal() {
            lines.push("  unchanged".to_string());
            return lines.join("\n");
        }
        if !self.is_structurally_equivalent() {
            let m = self.cfg_match();
            lines.push(format!(
                "  cfg matcher: node ratio {:.2}, edge ratio {:.2}",
                m.node_ratio, m.edge_ratio
            ));
        }
        for bra in self.block_analyses() {
            let status = if bra.is_changed() { "changed" } else { "unchanged" };
            lines.push(format!(
                "  {:>12} -> {:<12} {}",
                bra.b1().baddr(),
                bra.b2().baddr(),
                status
            ));
            if bra.is_changed() {
                for iaddr in bra.instrs_changed() {
                    lines.push(format!("    {}", iaddr));
                }
            }
        }
        let mapping = self.block_mapping();
        for addr in self.fn1.cfg().block_addresses() {
            if !mapping.contains_key(&addr) {
                lines.push(format!("  {:>12}    removed", format_address(addr)));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{BasicBlock, InstrXData, Instruction};
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
    fn test_shifted_function_is_structurally_equivalent() {
        let f1 = linear_function(0x1000, &[1, 2, 3]);
        let f2 = linear_function(0x2000, &[1, 2, 3]);
        let fra = FunctionRelationalAnalysis::new(&f1, &f2, false);
        assert_eq!(fra.offset(), 0x1000);
        assert!(fra.moved());
        assert!(fra.is_structurally_equivalent());
        let mapping = fra.block_mapping();
        assert_eq!(mapping.get(&0x1000), Some(&0x2000));
        assert_eq!(mapping.get(&0x1020), Some(&0x2020));
        assert!(!fra.is_changed());
        assert!(fra.blocks_changed().is_empty());
    }

    #[test]
    fn test_changed_block_with_same_shape() {
        let f1 = linear_function(0x1000, &[1, 2, 3]);
        let f2 = linear_function(0x1000, &[1, 9, 3]);
        let fra = FunctionRelationalAnalysis::new(&f1, &f2, false);
        assert!(fra.is_structurally_equivalent());
        assert!(fra.is_changed());
        assert_eq!(fra.blocks_changed(), vec![0x1010]);
    }

    #[test]
    fn test_matcher_fallback_when_shape_differs() {
        let f1 = linear_function(0x1000, &[1, 2]);
        let f2 = linear_function(0x1000, &[1, 9, 2]);
        let fra = FunctionRelationalAnalysis::new(&f1, &f2, false);
        assert!(!fra.is_structurally_equivalent());
        let mapping = fra.block_mapping();
        assert_eq!(mapping.get(&0x1000), Some(&0x1000));
        assert_eq!(mapping.get(&0x1010), Some(&0x1020));
    }

    #[test]
    fn test_report_lists_changed_blocks() {
        let f1 = linear_function(0x1000, &[1, 2, 3]);
        let f2 = linear_function(0x1000, &[1, 9, 3]);
        let fra = FunctionRelationalAnalysis::new(&f1, &f2, false);
        let report = fra.report();
        assert!(report.contains("0x1010"));
        assert!(report.contains("changed"));
        let same = FunctionRelationalAnalysis::new(&f1, &f1, false);
        assert!(same.report().contains("unchanged"));
    }

    #[test]
    fn test_cfg_match_is_memoized() {
        let f1 = linear_function(0x1000, &[1, 2]);
        let f2 = linear_function(0x1000, &[1, 9, 2]);
        let fra = FunctionRelationalAnalysis::new(&f1, &f2, false);
        let first = fra.cfg_match() as *const CfgMatchResult;
        let second = fra.cfg_match() as *const CfgMatchResult;
        assert!(std::ptr::eq(first, second));
    }
}
