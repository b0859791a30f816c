//! Basic blocks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::app::instruction::Instruction;
use crate::error::Error;

/// A basic block: a non-empty, address-ordered run of instructions.
///
/// Instructions are keyed by numeric address so iteration follows address
/// order regardless of insertion order. The block address itself may carry
/// an instruction-set-mode prefix; `real_baddr` strips it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BasicBlock {
    baddr: String,
    instructions: BTreeMap<u64, Instruction>,
}

impl BasicBlock {
    /// Create a block from its instructions. Fails on an empty instruction
    /// list or an unparseable instruction address.
    pub fn new(baddr: String, instructions: Vec<Instruction>) -> Result<BasicBlock, Error> {
        if instructions.is_empty() {
            return Err(Error::Custom(format!(
                "basic block {} has no instructions",
                baddr
            )));
        }
        let mut map = BTreeMap::new();
        for instr in instructions {
            let addr = super::parse_address(instr.iaddr())?;
            map.insert(addr, instr);
        }
        Ok(BasicBlock {
            baddr,
            instructions: map,
        })
    }

    pub fn baddr(&self) -> &str {
        &self.baddr
    }

    /// The block address with any mode prefix stripped.
    pub fn real_baddr(&self) -> &str {
        super::real_address(&self.baddr)
    }

    /// The address of the last instruction.
    pub fn lastaddr(&self) -> &str {
        self.instructions
            .values()
            .next_back()
            .map(|i| i.iaddr())
            .unwrap_or(&self.baddr)
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.values().next_back()
    }

    /// The block ends the function (its last instruction is a return).
    pub fn has_return(&self) -> bool {
        self.last_instruction()
            .map(|i| i.is_return_instruction())
            .unwrap_or(false)
    }

    pub fn has_instruction(&self, iaddr: &str) -> bool {
        self.instruction(iaddr).is_some()
    }

    pub fn instruction(&self, iaddr: &str) -> Option<&Instruction> {
        let addr = super::parse_address(iaddr).ok()?;
        self.instructions.get(&addr)
    }

    /// Instructions in address order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn call_instructions(&self) -> Vec<&Instruction> {
        self.instructions()
            .filter(|i| i.is_call_instruction())
            .collect()
    }

    pub fn jump_instructions(&self) -> Vec<&Instruction> {
        self.instructions()
            .filter(|i| i.is_jump_instruction())
            .collect()
    }

    pub fn load_instructions(&self) -> Vec<&Instruction> {
        self.instructions()
            .filter(|i| i.is_load_instruction())
            .collect()
    }

    pub fn store_instructions(&self) -> Vec<&Instruction> {
        self.instructions()
            .filter(|i| i.is_store_instruction())
            .collect()
    }

    /// Content hash of the concatenated instruction encodings.
    pub fn md5(&self) -> String {
        let bytes: String = self.instructions().map(|i| i.bytestring()).collect();
        format!("{:x}", md5::compute(bytes.as_bytes()))
    }

    /// Content hash with every instruction's encoding byte-reversed.
    pub fn rev_md5(&self) -> String {
        let bytes: String = self
            .instructions()
            .map(|i| {
                i.bytes()
                    .iter()
                    .rev()
                    .map(|b| format!("{:02x}", b))
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

    #[test]
    fn test_empty_block_is_rejected() {
        assert!(BasicBlock::new("0x1000".to_string(), vec![]).is_err());
    }

    #[test]
    fn test_iteration_follows_address_order() {
        let block = BasicBlock::new(
            "0x1000".to_string(),
            vec![
                instr("0x1008", vec![3]),
                instr("0x1000", vec![1]),
                instr("0x1004", vec![2]),
            ],
        )
        .unwrap();
        let addrs: Vec<&str> = block.instructions().map(|i| i.iaddr()).collect();
        assert_eq!(addrs, vec!["0x1000", "0x1004", "0x1008"]);
        assert_eq!(block.lastaddr(), "0x1008");
    }

    #[test]
    fn test_real_baddr() {
        let block =
            BasicBlock::new("F68_0x3f0c".to_string(), vec![instr("F68_0x3f0c", vec![0])])
                .unwrap();
        assert_eq!(block.real_baddr(), "0x3f0c");
    }

    #[test]
    fn test_has_return() {
        let dict = crate::app::OperandDict::new();
        let record =
            crate::app::IndexedRecord::new(vec!["ret".to_string()], vec![]);
        let ret = Opcode::construct(crate::opcodes::Arch::X86, &dict, &record).unwrap();
        let block = BasicBlock::new(
            "0x1000".to_string(),
            vec![
                instr("0x1000", vec![1]),
                Instruction::new("0x1004".to_string(), vec![0xc3], ret, InstrXData::default()),
            ],
        )
        .unwrap();
        assert!(block.has_return());
        assert_eq!(block.last_instruction().map(|i| i.iaddr()), Some("0x1004"));
    }

    #[test]
    fn test_md5_covers_all_instructions_in_order() {
        let one = BasicBlock::new(
            "0x1000".to_string(),
            vec![instr("0x1000", vec![0xaa]), instr("0x1004", vec![0xbb])],
        )
        .unwrap();
        let expected = format!("{:x}", md5::compute("aabb".as_bytes()));
        assert_eq!(one.md5(), expected);
    }
}
