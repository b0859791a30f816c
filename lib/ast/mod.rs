//! A small C-like abstract syntax tree and its builder.
//!
//! Opcode lowering emits pairs of statement lists over these nodes: a
//! low-level list faithful to the architectural side effects and a
//! high-level list over resolved symbolic variables. The builder assigns
//! every node a unique id and records the correspondence and provenance
//! between the two levels.

pub mod builder;
pub mod nodes;
pub mod types;

pub use self::builder::AstBuilder;
pub use self::nodes::{
    AstBinaryOp, AstExpr, AstInstruction, AstLhost, AstLval, AstOffset, AstUnaryOp,
};
pub use self::types::{AstCompInfo, AstFieldInfo, AstFormal, AstTyp, VarInfo};
