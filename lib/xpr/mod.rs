//! The symbolic value algebra.
//!
//! Instruction semantics are expressed over `XXpr` expressions and
//! `XVariable` variables. These are pure values: they carry no identity
//! beyond structural equality, and are owned by the xdata record of the
//! instruction that produced them.

pub mod constant;
pub mod expression;
pub mod variable;

pub use self::constant::XConstant;
pub use self::expression::{basevar_memory, simplify_result, Operator, XXpr};
pub use self::variable::{AuxVariable, MemoryBase, MemoryOffset, XVariable};
