//! Symbolic variables.
//!
//! A variable denotes either a register or temporary, a memory location
//! (stack-frame-relative, global, or relative to an unknown base), or an
//! auxiliary constant-valuation: a value fixed at function entry or at a
//! call site, such as the initial value of a register or a function return
//! value.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::expression::XXpr;

/// The base of a memory-denoted variable.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum MemoryBase {
    /// The local stack frame of the enclosing function.
    LocalStackFrame,
    /// A statically-linked global location.
    Global,
    /// An arbitrary base held in another variable (heap or unknown).
    BaseVar(Box<XVariable>),
}

impl MemoryBase {
    pub fn is_local_stack_frame(&self) -> bool {
        matches!(self, MemoryBase::LocalStackFrame)
    }

    pub fn is_global(&self) -> bool {
        matches!(self, MemoryBase::Global)
    }

    pub fn is_basevar(&self) -> bool {
        matches!(self, MemoryBase::BaseVar(_))
    }
}

/// The offset of a memory-denoted variable from its base.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum MemoryOffset {
    Constant(i64),
    Symbolic(Box<XXpr>),
}

impl MemoryOffset {
    pub fn is_constant_value_offset(&self) -> bool {
        matches!(self, MemoryOffset::Constant(_))
    }

    /// The constant offset value. Callers check
    /// `is_constant_value_offset` first.
    pub fn offset_value(&self) -> Option<i64> {
        match self {
            MemoryOffset::Constant(v) => Some(*v),
            MemoryOffset::Symbolic(_) => None,
        }
    }
}

impl fmt::Display for MemoryOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemoryOffset::Constant(v) => write!(f, "{}", v),
            MemoryOffset::Symbolic(x) => write!(f, "{}", x),
        }
    }
}

/// An auxiliary constant-valuation variable.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum AuxVariable {
    /// The value a register held at function entry. `argindex` is set when
    /// the register is an argument register per the calling convention.
    InitialRegisterValue {
        register: String,
        argindex: Option<usize>,
    },
    /// The value a memory location held at function entry.
    InitialMemoryValue { variable: Box<XVariable> },
    /// The value returned by the call at `callsite`.
    FunctionReturnValue {
        callsite: String,
        calltarget: Option<String>,
    },
}

impl AuxVariable {
    pub fn is_initial_register_value(&self) -> bool {
        matches!(self, AuxVariable::InitialRegisterValue { .. })
    }

    pub fn is_initial_memory_value(&self) -> bool {
        matches!(self, AuxVariable::InitialMemoryValue { .. })
    }

    pub fn is_function_return_value(&self) -> bool {
        matches!(self, AuxVariable::FunctionReturnValue { .. })
    }

    /// True if this is an initial register value bound to a formal argument.
    pub fn is_argument_value(&self) -> bool {
        matches!(
            self,
            AuxVariable::InitialRegisterValue {
                argindex: Some(_),
                ..
            }
        )
    }
}

impl fmt::Display for AuxVariable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuxVariable::InitialRegisterValue { register, .. } => {
                write!(f, "{}_in", register)
            }
            AuxVariable::InitialMemoryValue { variable } => write!(f, "{}_in", variable),
            AuxVariable::FunctionReturnValue { callsite, .. } => {
                write!(f, "rtn_{}", callsite)
            }
        }
    }
}

/// A symbolic variable.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum XVariable {
    /// A temporary with no denotation.
    Tmp { id: usize },
    /// An architectural register, qualified by architecture in its name.
    Register { name: String },
    /// A memory-denoted variable. `size` is the access size in bytes.
    Memory {
        base: MemoryBase,
        offset: MemoryOffset,
        size: usize,
    },
    /// An auxiliary constant-valuation variable.
    Auxiliary(AuxVariable),
}

impl XVariable {
    pub fn tmp(id: usize) -> XVariable {
        XVariable::Tmp { id }
    }

    pub fn register<S: Into<String>>(name: S) -> XVariable {
        XVariable::Register { name: name.into() }
    }

    /// A word-sized stack-frame variable at a constant offset.
    pub fn stack(offset: i64) -> XVariable {
        XVariable::Memory {
            base: MemoryBase::LocalStackFrame,
            offset: MemoryOffset::Constant(offset),
            size: 4,
        }
    }

    pub fn is_tmp(&self) -> bool {
        matches!(self, XVariable::Tmp { .. })
    }

    pub fn is_register_variable(&self) -> bool {
        matches!(self, XVariable::Register { .. })
    }

    pub fn is_memory_variable(&self) -> bool {
        matches!(self, XVariable::Memory { .. })
    }

    pub fn is_auxiliary_variable(&self) -> bool {
        matches!(self, XVariable::Auxiliary(_))
    }

    pub fn auxiliary(&self) -> Option<&AuxVariable> {
        match self {
            XVariable::Auxiliary(aux) => Some(aux),
            _ => None,
        }
    }
}

impl fmt::Display for XVariable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            XVariable::Tmp { id } => write!(f, "tmp_{}", id),
            XVariable::Register { name } => write!(f, "{}", name),
            XVariable::Memory { base, offset, .. } => match base {
                MemoryBase::LocalStackFrame => write!(f, "var.{}", offset),
                MemoryBase::Global => match offset.offset_value() {
                    Some(v) => write!(f, "gv_0x{:x}", v),
                    None => write!(f, "gv_{}", offset),
                },
                MemoryBase::BaseVar(base) => write!(f, "{}[{}]", base, offset),
            },
            XVariable::Auxiliary(aux) => write!(f, "{}", aux),
        }
    }
}
