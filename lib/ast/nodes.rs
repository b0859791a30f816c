//! AST node definitions.
//!
//! Every expression, lvalue, and instruction carries a numeric id assigned
//! by the builder; ids are the keys of the provenance tables.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum AstUnaryOp {
    Neg,
    BNot,
    LNot,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum AstBinaryOp {
    Plus,
    Minus,
    Mult,
    Div,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Ge,
}

impl fmt::Display for AstBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AstBinaryOp::Plus => "+",
            AstBinaryOp::Minus => "-",
            AstBinaryOp::Mult => "*",
            AstBinaryOp::Div => "/",
            AstBinaryOp::BAnd => "&",
            AstBinaryOp::BOr => "|",
            AstBinaryOp::BXor => "^",
            AstBinaryOp::Shl => "<<",
            AstBinaryOp::Shr => ">>",
            AstBinaryOp::Eq => "==",
            AstBinaryOp::Ne => "!=",
            AstBinaryOp::Lt => "<",
            AstBinaryOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for AstUnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AstUnaryOp::Neg => "-",
            AstUnaryOp::BNot => "~",
            AstUnaryOp::LNot => "!",
        };
        write!(f, "{}", s)
    }
}

/// The host of an lvalue: a named variable or a memory dereference.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum AstLhost {
    Variable { name: String },
    MemRef { expr: Box<AstExpr> },
}

/// The offset path of an lvalue into its host.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum AstOffset {
    NoOffset,
    Field {
        fieldname: String,
        compkey: usize,
        rest: Box<AstOffset>,
    },
    Index {
        index: Box<AstExpr>,
        rest: Box<AstOffset>,
    },
}

impl AstOffset {
    pub fn is_no_offset(&self) -> bool {
        matches!(self, AstOffset::NoOffset)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AstLval {
    pub id: usize,
    pub host: AstLhost,
    pub offset: AstOffset,
}

impl AstLval {
    /// The name of a plain named lvalue with no offset.
    pub fn name(&self) -> Option<&str> {
        match (&self.host, &self.offset) {
            (AstLhost::Variable { name }, AstOffset::NoOffset) => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum AstExpr {
    IntConstant {
        id: usize,
        value: i64,
    },
    LvalExpr {
        id: usize,
        lval: AstLval,
    },
    AddressOf {
        id: usize,
        lval: AstLval,
    },
    Unary {
        id: usize,
        op: AstUnaryOp,
        operand: Box<AstExpr>,
    },
    Binary {
        id: usize,
        op: AstBinaryOp,
        lhs: Box<AstExpr>,
        rhs: Box<AstExpr>,
    },
}

impl AstExpr {
    pub fn id(&self) -> usize {
        match self {
            AstExpr::IntConstant { id, .. }
            | AstExpr::LvalExpr { id, .. }
            | AstExpr::AddressOf { id, .. }
            | AstExpr::Unary { id, .. }
            | AstExpr::Binary { id, .. } => *id,
        }
    }

    pub fn int_value(&self) -> Option<i64> {
        match self {
            AstExpr::IntConstant { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// One AST statement.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum AstInstruction {
    Assign {
        id: usize,
        lhs: AstLval,
        rhs: AstExpr,
        iaddr: String,
    },
    Call {
        id: usize,
        lhs: Option<AstLval>,
        target: String,
        args: Vec<AstExpr>,
        iaddr: String,
    },
}

impl AstInstruction {
    pub fn id(&self) -> usize {
        match self {
            AstInstruction::Assign { id, .. } | AstInstruction::Call { id, .. } => *id,
        }
    }

    pub fn iaddr(&self) -> &str {
        match self {
            AstInstruction::Assign { iaddr, .. } | AstInstruction::Call { iaddr, .. } => {
                iaddr
            }
        }
    }
}

impl fmt::Display for AstLhost {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AstLhost::Variable { name } => write!(f, "{}", name),
            AstLhost::MemRef { expr } => write!(f, "(*{})", expr),
        }
    }
}

impl fmt::Display for AstOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AstOffset::NoOffset => Ok(()),
            AstOffset::Field {
                fieldname, rest, ..
            } => write!(f, ".{}{}", fieldname, rest),
            AstOffset::Index { index, rest } => write!(f, "[{}]{}", index, rest),
        }
    }
}

impl fmt::Display for AstLval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.host, self.offset)
    }
}

impl fmt::Display for AstExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AstExpr::IntConstant { value, .. } => write!(f, "{}", value),
            AstExpr::LvalExpr { lval, .. } => write!(f, "{}", lval),
            AstExpr::AddressOf { lval, .. } => write!(f, "&{}", lval),
            AstExpr::Unary { op, operand, .. } => write!(f, "{}{}", op, operand),
            AstExpr::Binary { op, lhs, rhs, .. } => {
                write!(f, "({} {} {})", lhs, op, rhs)
            }
        }
    }
}

impl fmt::Display for AstInstruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AstInstruction::Assign { lhs, rhs, .. } => write!(f, "{} = {}", lhs, rhs),
            AstInstruction::Call {
                lhs, target, args, ..
            } => {
                if let Some(lhs) = lhs {
                    write!(f, "{} = ", lhs)?;
                }
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", target, rendered.join(", "))
            }
        }
    }
}
