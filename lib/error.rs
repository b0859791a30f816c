//! Error types for Kestrel.

use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A decoded opcode record's tag/argument counts do not match the
    /// mnemonic's fixed arity. The artifact is corrupt or foreign.
    #[error("malformed artifact for {mnemonic}: expected {expected_tags} tags \
             and {expected_args} args, found {found_tags}/{found_args}")]
    MalformedArtifact {
        mnemonic: String,
        expected_tags: usize,
        expected_args: usize,
        found_tags: usize,
        found_args: usize,
    },

    #[error("unknown mnemonic {0} for architecture {1}")]
    UnknownMnemonic(String, String),

    #[error("required address missing from artifact: {0}")]
    MissingAddress(String),

    #[error("cannot parse address {0}")]
    AddressParse(String),

    #[error("operand index {0} not present in operand dictionary")]
    OperandNotFound(usize),

    /// A symbolic expression could not be lowered to a single AST node per
    /// operand.
    #[error("unsupported expression shape: {0}")]
    UnsupportedExpressionShape(String),

    /// No declared field of the composite type spans the requested offset.
    #[error("no field at offset {offset} in struct {compname}")]
    NoFieldAtOffset { compname: String, offset: i64 },

    /// The matched side of an unmapped instruction, block, or function was
    /// requested.
    #[error("no corresponding item found for {0}")]
    NoCorrespondence(String),

    /// An abstract simulation step encountered a symbolic value where a
    /// concrete one was required.
    #[error("symbolic expression encountered at {iaddr}: {expr}")]
    SymbolicExpression { iaddr: String, expr: String },

    #[error("vertex with index {0} not found in graph")]
    GraphVertexNotFound(usize),

    #[error("edge ({0}, {1}) not found in graph")]
    GraphEdgeNotFound(usize, usize),

    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
