//! Block-pair comparison.

use std::cell::OnceCell;

use crate::app::{parse_address, BasicBlock};
use crate::relational::instruction::InstructionRelationalAnalysis;

/// Comparison of two basic blocks believed to correspond.
///
/// Produces an ordered instruction pairing and the subset of instructions
/// whose endianness-normalized content hash differs. When the two blocks
/// have equal instruction counts the pairing is positional; otherwise
/// instructions are aligned by the block-address offset and leftovers stay
/// unmapped.
pub struct BlockRelationalAnalysis<'a> {
    b1: &'a BasicBlock,
    b2: &'a BasicBlock,
    endian_mismatch: bool,
    instr_analyses: OnceCell<Vec<InstructionRelationalAnalysis<'a>>>,
}

impl<'a> BlockRelationalAnalysis<'a> {
    pub fn new(
        b1: &'a BasicBlock,
        b2: &'a BasicBlock,
        endian_mismatch: bool,
    ) -> BlockRelationalAnalysis<'a> {
        BlockRelationalAnalysis {
            b1,
            b2,
            endian_mismatch,
            instr_analyses: OnceCell::new(),
        }
    }

    pub fn b1(&self) -> &BasicBlock {
        self.b1
    }

    pub fn b2(&self) -> &BasicBlock {
        self.b2
    }

    /// Endianness-normalized content-hash equality of the whole block.
    pub fn is_md5_equal(&self) -> bool {
        let md5_2 = if self.endian_mismatch {
            self.b2.rev_md5()
        } else {
            self.b2.md5()
        };
        self.b1.md5() == md5_2
    }

    /// The ordered instruction pairing, computed once.
    pub fn instr_analyses(&self) -> &[InstructionRelationalAnalysis<'a>] {
        self.instr_analyses.get_or_init(|| self.pair_instructions())
    }

    fn pair_instructions(&self) -> Vec<InstructionRelationalAnalysis<'a>> {
        let instrs1: Vec<_> = self.b1.instructions().collect();
        let instrs2: Vec<_> = self.b2.instructions().collect();
        if instrs1.len() == instrs2.len() {
            return instrs1
                .into_iter()
                .zip(instrs2)
                .map(|(i1, i2)| {
                    InstructionRelationalAnalysis::new(i1, Some(i2), self.endian_mismatch)
                })
                .collect();
        }
        // align by the block-address offset
        let offset = match (
            parse_address(self.b1.real_baddr()),
            parse_address(self.b2.real_baddr()),
        ) {
            (Ok(a1), Ok(a2)) => a2 as i64 - a1 as i64,
            _ => 0,
        };
        instrs1
            .into_iter()
            .map(|i1| {
                let i2 = parse_address(i1.real_iaddr())
                    .ok()
                    .map(|a| (a as i64 + offset) as u64)
                    .and_then(|a2| self.b2.instruction(&crate::app::format_address(a2)));
                InstructionRelationalAnalysis::new(i1, i2, self.endian_mismatch)
            })
            .collect()
    }

    /// Addresses of instructions whose content hash differs or that have
    /// no counterpart.
    pub fn instrs_changed(&self) -> Vec<&str> {
        self.instr_analyses()
            .iter()
            .filter(|ira| match ira.is_md5_equal() {
                Ok(equal) => !equal,
                Err(_) => true,
            })
            .map(|ira| ira.instr1().iaddr())
            .collect()
    }

    pub fn is_changed(&self) -> bool {
        !self.is_md5_equal()
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

    fn block(baddr: &str, instrs: Vec<Instruction>) -> BasicBlock {
        BasicBlock::new(baddr.to_string(), instrs).unwrap()
    }

    #[test]
    fn test_equal_blocks_are_unchanged() {
        let b1 = block("0x1000", vec![instr("0x1000", vec![1]), instr("0x1004", vec![2])]);
        let b2 = block("0x2000", vec![instr("0x2000", vec![1]), instr("0x2004", vec![2])]);
        let bra = BlockRelationalAnalysis::new(&b1, &b2, false);
        assert!(bra.is_md5_equal());
        assert!(bra.instrs_changed().is_empty());
    }

    #[test]
    fn test_positional_pairing_with_equal_counts() {
        let b1 = block("0x1000", vec![instr("0x1000", vec![1]), instr("0x1004", vec![2])]);
        let b2 = block("0x2000", vec![instr("0x2000", vec![1]), instr("0x2004", vec![9])]);
        let bra = BlockRelationalAnalysis::new(&b1, &b2, false);
        let analyses = bra.instr_analyses();
        assert_eq!(analyses.len(), 2);
        assert!(analyses.iter().all(|a| a.is_mapped()));
        assert_eq!(bra.instrs_changed(), vec!["0x1004"]);
    }

    #[test]
    fn test_offset_alignment_with_unequal_counts() {
        let b1 = block("0x1000", vec![instr("0x1000", vec![1]), instr("0x1004", vec![2])]);
        let b2 = block(
            "0x1100",
            vec![
                instr("0x1100", vec![1]),
                instr("0x1104", vec![2]),
                instr("0x1108", vec![3]),
            ],
        );
        let bra = BlockRelationalAnalysis::new(&b1, &b2, false);
        let analyses = bra.instr_analyses();
        assert_eq!(analyses.len(), 2);
        assert!(analyses.iter().all(|a| a.is_mapped()));
        assert_eq!(analyses[0].instr2().unwrap().iaddr(), "0x1100");
        assert!(analyses[0].is_md5_equal().unwrap());
    }

    #[test]
    fn test_instr_analyses_are_memoized() {
        let b1 = block("0x1000", vec![instr("0x1000", vec![1])]);
        let b2 = block("0x1000", vec![instr("0x1000", vec![1])]);
        let bra = BlockRelationalAnalysis::new(&b1, &b2, false);
        let first = bra.instr_analyses().as_ptr();
        let second = bra.instr_analyses().as_ptr();
        assert!(std::ptr::eq(first, second));
    }
}
