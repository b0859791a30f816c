//! Functions: address-ordered blocks plus a control flow graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::app::block::BasicBlock;
use crate::app::cfg::Cfg;
use crate::app::instruction::Instruction;
use crate::error::Error;

/// A disassembled function: its entry address, its basic blocks keyed by
/// numeric block address, and its control flow graph.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Function {
    faddr: String,
    blocks: BTreeMap<u64, BasicBlock>,
    cfg: Cfg,
}

impl Function {
    /// Assemble a function from its blocks and control-flow edges. Edge
    /// endpoints are block addresses and must name blocks in `blocks`.
    pub fn new(
        faddr: String,
        blocks: Vec<BasicBlock>,
        edges: Vec<(String, String)>,
    ) -> Result<Function, Error> {
        let mut map = BTreeMap::new();
        let mut baddrs = Vec::new();
        for block in blocks {
            let addr = super::parse_address(block.baddr())?;
            baddrs.push(super::format_address(addr));
            map.insert(addr, block);
        }
        let cfg = Cfg::new(&faddr, &baddrs, &edges)?;
        Ok(Function {
            faddr,
            blocks: map,
            cfg,
        })
    }

    pub fn faddr(&self) -> &str {
        &self.faddr
    }

    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Blocks in ascending address order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.values()
    }

    pub fn block(&self, baddr: u64) -> Option<&BasicBlock> {
        self.blocks.get(&baddr)
    }

    pub fn has_block(&self, baddr: u64) -> bool {
        self.blocks.contains_key(&baddr)
    }

    /// Look up an instruction anywhere in the function.
    pub fn instruction(&self, iaddr: &str) -> Option<&Instruction> {
        self.blocks.values().find_map(|b| b.instruction(iaddr))
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.values().map(|b| b.instruction_count()).sum()
    }

    pub fn call_instructions(&self) -> Vec<&Instruction> {
        self.blocks
            .values()
            .flat_map(|b| b.call_instructions())
            .collect()
    }

    /// The names of all resolved call targets, in address order.
    pub fn call_targets(&self) -> Vec<&str> {
        self.call_instructions()
            .into_iter()
            .filter_map(|i| i.call_target())
            .collect()
    }

    /// Content hash over all instruction encodings, in address order.
    pub fn md5(&self) -> String {
        let bytes: String = self
            .blocks
            .values()
            .flat_map(|b| b.instructions())
            .map(|i| i.bytestring())
            .collect();
        format!("{:x}", md5::compute(bytes.as_bytes()))
    }

    /// Content hash with every instruction's encoding byte-reversed.
    pub fn rev_md5(&self) -> String {
        let bytes: String = self
            .blocks
            .values()
            .flat_map(|b| b.instructions())
            .map(|i| {
                i.bytes()
                    .iter()
                    .rev()
                    .map(|byte| format!("{:02x}", byte))
                    .collect::<String>()
            })
            .collect();
        format!("{:x}", md5::compute(bytes.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::xdata::InstrXData;
    use crate::opcodes::Opcode;

    fn instr(iaddr: &str, bytes: Vec<u8>) -> Instruction {
        Instruction::new(
            iaddr.to_string(),
            bytes,
            Opcode::unknown("test"),
            InstrXData::default(),
        )
    }

    fn two_block_function() -> Function {
        let b1 = BasicBlock::new(
            "0x1000".to_string(),
            vec![instr("0x1000", vec![1]), instr("0x1004", vec![2])],
        )
        .unwrap();
        let b2 =
            BasicBlock::new("0x1008".to_string(), vec![instr("0x1008", vec![3])]).unwrap();
        Function::new(
            "0x1000".to_string(),
            vec![b1, b2],
            vec![("0x1000".to_string(), "0x1008".to_string())],
        )
        .unwrap()
    }

    #[test]
    fn test_blocks_and_cfg_agree() {
        let f = two_block_function();
        assert_eq!(f.block_count(), 2);
        assert_eq!(f.cfg().block_count(), 2);
        assert_eq!(f.cfg().edge_count(), 1);
    }

    #[test]
    fn test_instruction_lookup_spans_blocks() {
        let f = two_block_function();
        assert!(f.instruction("0x1008").is_some());
        assert!(f.instruction("0x2000").is_none());
        assert_eq!(f.instruction_count(), 3);
    }

    #[test]
    fn test_md5_covers_all_blocks() {
        let f = two_block_function();
        let expected = format!("{:x}", md5::compute("010203".as_bytes()));
        assert_eq!(f.md5(), expected);
    }
}
