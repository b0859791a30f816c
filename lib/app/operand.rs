//! Operands and the interned operand dictionary.
//!
//! Decoded opcode records do not carry operands inline; they carry indices
//! into a shared, append-only operand table, deduplicated per architecture.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Error;

/// The shape of a single decoded operand.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Operand {
    Register {
        name: String,
    },
    Immediate {
        value: i64,
    },
    /// A memory operand `[base, #offset]`. `writeback` marks
    /// auto-incrementing addressing modes that update the base register.
    Indirect {
        base: String,
        offset: i64,
        writeback: bool,
    },
    /// An ordered register list, e.g. for POP.
    RegisterList {
        registers: Vec<String>,
    },
}

impl Operand {
    pub fn register<S: Into<String>>(name: S) -> Operand {
        Operand::Register { name: name.into() }
    }

    pub fn immediate(value: i64) -> Operand {
        Operand::Immediate { value }
    }

    pub fn indirect<S: Into<String>>(base: S, offset: i64) -> Operand {
        Operand::Indirect {
            base: base.into(),
            offset,
            writeback: false,
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(self, Operand::Register { .. })
    }

    pub fn is_indirect(&self) -> bool {
        matches!(self, Operand::Indirect { .. })
    }

    /// The register name of a register operand.
    pub fn register_name(&self) -> Option<&str> {
        match self {
            Operand::Register { name } => Some(name),
            _ => None,
        }
    }

    /// True for auto-incrementing memory operands.
    pub fn is_writeback(&self) -> bool {
        matches!(
            self,
            Operand::Indirect {
                writeback: true,
                ..
            }
        )
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Register { name } => write!(f, "{}", name),
            Operand::Immediate { value } => write!(f, "#{}", value),
            Operand::Indirect {
                base,
                offset,
                writeback,
            } => {
                let wb = if *writeback { "!" } else { "" };
                write!(f, "[{}, #{}]{}", base, offset, wb)
            }
            Operand::RegisterList { registers } => {
                write!(f, "{{{}}}", registers.join(","))
            }
        }
    }
}

/// The shared, append-only operand table of one architecture.
///
/// Interning the same operand twice returns the same index; indices never
/// change once handed out.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OperandDict {
    operands: Vec<Operand>,
    #[serde(skip)]
    indices: FxHashMap<Operand, usize>,
}

impl OperandDict {
    pub fn new() -> OperandDict {
        OperandDict::default()
    }

    /// Intern an operand, returning its index.
    pub fn intern(&mut self, operand: Operand) -> usize {
        if let Some(&index) = self.indices.get(&operand) {
            return index;
        }
        let index = self.operands.len();
        self.indices.insert(operand.clone(), index);
        self.operands.push(operand);
        index
    }

    /// Look up an operand by index.
    pub fn operand(&self, index: usize) -> Result<&Operand, Error> {
        self.operands
            .get(index)
            .ok_or(Error::OperandNotFound(index))
    }

    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }
}

/// A raw decoded opcode record: the mnemonic tag plus fixed-width integer
/// arguments whose positions are a per-mnemonic contract.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexedRecord {
    tags: Vec<String>,
    args: Vec<usize>,
}

impl IndexedRecord {
    pub fn new(tags: Vec<String>, args: Vec<usize>) -> IndexedRecord {
        IndexedRecord { tags, args }
    }

    /// The mnemonic tag.
    pub fn mnemonic(&self) -> Result<&str, Error> {
        self.tags
            .first()
            .map(|s| s.as_str())
            .ok_or_else(|| "opcode record without mnemonic tag".into())
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn args(&self) -> &[usize] {
        &self.args
    }

    /// Validate this record against a mnemonic's fixed arity.
    ///
    /// A mismatch means the artifact is corrupted or produced by a
    /// different decoder version; the instruction cannot be constructed.
    pub fn check_key(
        &self,
        expected_tags: usize,
        expected_args: usize,
        mnemonic: &str,
    ) -> Result<(), Error> {
        if self.tags.len() != expected_tags || self.args.len() != expected_args {
            return Err(Error::MalformedArtifact {
                mnemonic: mnemonic.to_string(),
                expected_tags,
                expected_args,
                found_tags: self.tags.len(),
                found_args: self.args.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_deduplicates() {
        let mut dict = OperandDict::new();
        let i0 = dict.intern(Operand::register("R0"));
        let i1 = dict.intern(Operand::register("R1"));
        let i2 = dict.intern(Operand::register("R0"));
        assert_eq!(i0, i2);
        assert_ne!(i0, i1);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.operand(i1).unwrap(), &Operand::register("R1"));
    }

    #[test]
    fn test_operand_lookup_out_of_range() {
        let dict = OperandDict::new();
        assert!(dict.operand(3).is_err());
    }

    #[test]
    fn test_check_key_rejects_wrong_arity() {
        let record = IndexedRecord::new(
            vec!["ADD".to_string(), "".to_string()],
            vec![0, 1, 2, 3],
        );
        assert!(record.check_key(2, 5, "Add").is_err());
        assert!(record.check_key(2, 4, "Add").is_ok());
    }
}
