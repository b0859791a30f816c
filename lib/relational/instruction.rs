//! Instruction-pair comparison.

use std::collections::BTreeSet;

use crate::app::Instruction;
use crate::error::Error;

/// Comparison of one instruction against its counterpart in the other
/// binary version, when one exists.
///
/// With no counterpart the analysis is terminal: the instruction is
/// changed by definition and any comparison that needs the other side
/// fails with `NoCorrespondence`.
pub struct InstructionRelationalAnalysis<'a> {
    instr1: &'a Instruction,
    instr2: Option<&'a Instruction>,
    /// True when the two binaries differ in byte order; content hashes of
    /// the second side are computed over byte-reversed encodings.
    endian_mismatch: bool,
}

impl<'a> InstructionRelationalAnalysis<'a> {
    pub fn new(
        instr1: &'a Instruction,
        instr2: Option<&'a Instruction>,
        endian_mismatch: bool,
    ) -> InstructionRelationalAnalysis<'a> {
        InstructionRelationalAnalysis {
            instr1,
            instr2,
            endian_mismatch,
        }
    }

    pub fn instr1(&self) -> &Instruction {
        self.instr1
    }

    pub fn is_mapped(&self) -> bool {
        self.instr2.is_some()
    }

    /// The matched instruction in the second version.
    pub fn instr2(&self) -> Result<&Instruction, Error> {
        self.instr2
            .ok_or_else(|| Error::NoCorrespondence(self.instr1.iaddr().to_string()))
    }

    pub fn same_address(&self) -> Result<bool, Error> {
        Ok(self.instr1.iaddr() == self.instr2()?.iaddr())
    }

    /// Endianness-normalized content-hash equality.
    pub fn is_md5_equal(&self) -> Result<bool, Error> {
        let instr2 = self.instr2()?;
        let md5_2 = if self.endian_mismatch {
            instr2.rev_md5()
        } else {
            instr2.md5()
        };
        Ok(self.instr1.md5() == md5_2)
    }

    /// Annotation equality, a proxy for semantically equivalent effect.
    pub fn same_annotation(&self) -> Result<bool, Error> {
        Ok(self.instr1.annotation() == self.instr2()?.annotation())
    }

    /// Both sides load the identical string literal.
    pub fn loads_same_string(&self) -> Result<bool, Error> {
        let instr2 = self.instr2()?;
        match (
            self.instr1.string_pointer_loaded(),
            instr2.string_pointer_loaded(),
        ) {
            (Some((s1, _)), Some((s2, _))) => Ok(s1 == s2),
            _ => Ok(false),
        }
    }

    /// The instruction calls one of the given functions. An empty list
    /// accepts any resolved call.
    pub fn calls_function(&self, callees: &[String]) -> bool {
        match self.instr1.call_target() {
            Some(target) => callees.is_empty() || callees.iter().any(|c| c == target),
            None => false,
        }
    }

    /// Both sides call the same function with the same arguments.
    ///
    /// Declared extension point; not implemented, always false.
    pub fn calls_same_function_with_same_args(&self) -> Result<bool, Error> {
        self.instr2()?;
        Ok(false)
    }

    /// Byte and address differences are discounted when the two sides are
    /// recognized as semantically equal.
    fn has_equal_semantics(&self) -> Result<bool, Error> {
        Ok(self.loads_same_string()? || self.calls_same_function_with_same_args()?)
    }

    /// The set of differences, drawn from {address, bytes, semantics}.
    pub fn changes(&self) -> Result<BTreeSet<&'static str>, Error> {
        let mut changes = BTreeSet::new();
        let equal_semantics = self.has_equal_semantics()?;
        if !self.same_address()? {
            changes.insert("address");
        }
        if !self.is_md5_equal()? && !equal_semantics {
            changes.insert("bytes");
        }
        if !self.same_annotation()? && !equal_semantics {
            changes.insert("semantics");
        }
        Ok(changes)
    }

    pub fn is_changed(&self) -> bool {
        match self.changes() {
            Ok(changes) => !changes.is_empty(),
            // unmapped: changed by definition
            Err(_) => true,
        }
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

    fn string_load(iaddr: &str, bytes: Vec<u8>, s: &str, saddr: &str) -> Instruction {
        Instruction::new(
            iaddr.to_string(),
            bytes,
            Opcode::unknown("test"),
            InstrXData::new(vec!["a:".to_string()], vec![], vec![])
                .with_string_loaded(s, saddr),
        )
    }

    #[test]
    fn test_unmapped_is_changed_and_fails_on_access() {
        let i1 = instr("0x1000", vec![1, 2]);
        let ira = InstructionRelationalAnalysis::new(&i1, None, false);
        assert!(ira.is_changed());
        assert!(matches!(ira.instr2(), Err(Error::NoCorrespondence(_))));
        assert!(ira.same_address().is_err());
    }

    #[test]
    fn test_identical_pair_has_no_changes() {
        let i1 = instr("0x1000", vec![1, 2]);
        let i2 = instr("0x1000", vec![1, 2]);
        let ira = InstructionRelationalAnalysis::new(&i1, Some(&i2), false);
        assert!(!ira.is_changed());
        assert!(ira.changes().unwrap().is_empty());
    }

    #[test]
    fn test_moved_instruction_changes_address_only() {
        let i1 = instr("0x1000", vec![1, 2]);
        let i2 = instr("0x1010", vec![1, 2]);
        let ira = InstructionRelationalAnalysis::new(&i1, Some(&i2), false);
        let changes = ira.changes().unwrap();
        assert!(changes.contains("address"));
        assert!(!changes.contains("bytes"));
    }

    #[test]
    fn test_endianness_normalized_content_equality() {
        let i1 = instr("0x1000", vec![0x01, 0x02, 0x03, 0x04]);
        let i2 = instr("0x1000", vec![0x04, 0x03, 0x02, 0x01]);
        let swapped = InstructionRelationalAnalysis::new(&i1, Some(&i2), true);
        assert!(swapped.is_md5_equal().unwrap());
        let plain = InstructionRelationalAnalysis::new(&i1, Some(&i2), false);
        assert!(!plain.is_md5_equal().unwrap());
    }

    #[test]
    fn test_same_string_load_discounts_byte_difference() {
        let i1 = string_load("0x1000", vec![1, 2], "hello", "0x5000");
        let i2 = string_load("0x1000", vec![3, 4], "hello", "0x5100");
        let ira = InstructionRelationalAnalysis::new(&i1, Some(&i2), false);
        assert!(ira.loads_same_string().unwrap());
        assert!(!ira.changes().unwrap().contains("bytes"));
    }

    #[test]
    fn test_calls_function_restriction() {
        let call = Instruction::new(
            "0x1000".to_string(),
            vec![1],
            Opcode::unknown("test"),
            InstrXData::new(vec!["a:".to_string()], vec![], vec![])
                .with_call_target("memcpy"),
        );
        let ira = InstructionRelationalAnalysis::new(&call, None, false);
        assert!(ira.calls_function(&[]));
        assert!(ira.calls_function(&["memcpy".to_string()]));
        assert!(!ira.calls_function(&["strcpy".to_string()]));
        let plain = instr("0x1004", vec![2]);
        let ira = InstructionRelationalAnalysis::new(&plain, None, false);
        assert!(!ira.calls_function(&[]));
    }

    #[test]
    fn test_call_argument_equivalence_is_unimplemented() {
        let i1 = instr("0x1000", vec![1]);
        let i2 = instr("0x1000", vec![1]);
        let ira = InstructionRelationalAnalysis::new(&i1, Some(&i2), false);
        assert!(!ira.calls_same_function_with_same_args().unwrap());
    }
}
