//! Kestrel is a library for semantic lifting and relational diffing of
//! binary programs.
//!
//! Kestrel does not decode bytes itself. It consumes pre-decoded artifacts
//! (indexed operand dictionaries and opcode records for ARM, MIPS and x86),
//! lifts instruction semantics into a symbolic expression algebra, lowers
//! those expressions to C-like AST nodes with full provenance, and compares
//! two versions of a binary at the function, block, and instruction level.
//!
//! The comparison is tuned for micropatches: every level first attempts a
//! cheap exact correspondence (address offset, content hash, address
//! isomorphism) and only falls back to graph matching when that fails.

pub mod app;
pub mod ast;
pub mod error;
pub mod graph;
pub mod lower;
pub mod opcodes;
pub mod relational;
pub mod sim;
pub mod xpr;

pub use error::Error;
