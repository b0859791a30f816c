//! Abstract machine state for concrete single-step simulation.
//!
//! An opcode's `simulate` contract reads operand values from, and writes
//! results back to, an implementation of [`SimState`]. A value read back
//! may be symbolic (unresolved); simulation steps that require a concrete
//! value signal this with [`Error::SymbolicExpression`] instead of
//! fabricating one.
//!
//! [`Error::SymbolicExpression`]: crate::Error::SymbolicExpression

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::app::Operand;
use crate::error::Error;

/// The value of one machine word in the simulated state.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SimValue {
    /// A concrete value, truncated to `bits`.
    Concrete { value: u64, bits: usize },
    /// A value the simulator could not resolve; carries a rendering of the
    /// symbolic expression it stands for.
    Symbolic { expr: String },
}

impl SimValue {
    pub fn word(value: u64) -> SimValue {
        SimValue::Concrete {
            value: value & 0xffff_ffff,
            bits: 32,
        }
    }

    pub fn doubleword(value: u64) -> SimValue {
        SimValue::Concrete { value, bits: 64 }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, SimValue::Symbolic { .. })
    }

    /// The concrete value, or a symbolic-expression error tagged with the
    /// instruction address that needed it.
    pub fn to_concrete(&self, iaddr: &str) -> Result<u64, Error> {
        match self {
            SimValue::Concrete { value, .. } => Ok(*value),
            SimValue::Symbolic { expr } => Err(Error::SymbolicExpression {
                iaddr: iaddr.to_string(),
                expr: expr.clone(),
            }),
        }
    }
}

impl fmt::Display for SimValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimValue::Concrete { value, .. } => write!(f, "0x{:x}", value),
            SimValue::Symbolic { expr } => write!(f, "?{}?", expr),
        }
    }
}

/// One step's view of the simulated machine.
///
/// The contract specifies only what is read and written; how state is
/// stored is the implementor's concern.
pub trait SimState {
    /// The current value of an operand (register read or memory load).
    fn get_rhs(&self, iaddr: &str, operand: &Operand) -> Result<SimValue, Error>;

    /// Write a value to an operand (register write or memory store).
    fn set_lhs(&mut self, iaddr: &str, operand: &Operand, value: SimValue)
        -> Result<(), Error>;

    /// Update a condition flag, e.g. "N" or "Z".
    fn update_flag(&mut self, flag: &str, value: bool);

    /// Advance the program counter past the current instruction.
    fn increment_pc(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_truncates() {
        assert_eq!(
            SimValue::word(0x1_2345_6789),
            SimValue::Concrete {
                value: 0x2345_6789,
                bits: 32
            }
        );
    }

    #[test]
    fn test_symbolic_to_concrete_fails() {
        let v = SimValue::Symbolic {
            expr: "R3_in".to_string(),
        };
        assert!(v.is_symbolic());
        match v.to_concrete("0x1000") {
            Err(Error::SymbolicExpression { iaddr, .. }) => assert_eq!(iaddr, "0x1000"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
