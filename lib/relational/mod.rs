//! Relational (patch-diff) analysis between two versions of a binary.
//!
//! Comparison is top-down: the binary pair is resolved into a function
//! mapping, each mapped function pair into a block mapping, and each
//! mapped block pair into an instruction pairing. Every level tries a
//! cheap exact strategy first (address identity, content hash, address
//! isomorphism) and falls back to a more expensive matcher only on
//! failure. All derived state is computed once and memoized.

pub mod app;
pub mod block;
pub mod callgraph_matcher;
pub mod cfg_matcher;
pub mod function;
pub mod instruction;

pub use self::app::RelationalAnalysis;
pub use self::block::BlockRelationalAnalysis;
pub use self::callgraph_matcher::match_callgraphs;
pub use self::cfg_matcher::{match_cfgs, CfgMatchResult};
pub use self::function::FunctionRelationalAnalysis;
pub use self::instruction::InstructionRelationalAnalysis;
