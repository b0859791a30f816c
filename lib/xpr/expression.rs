//! Symbolic expressions over variables and constants.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::constant::XConstant;
use super::variable::{AuxVariable, MemoryBase, MemoryOffset, XVariable};

/// The operator of a compound expression.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Operator {
    Plus,
    Minus,
    Mult,
    Divu,
    Band,
    Bor,
    Bxor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Ge,
    Not,
    Bnot,
    Neg,
}

impl Operator {
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::Not | Operator::Bnot | Operator::Neg)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Mult => "*",
            Operator::Divu => "/u",
            Operator::Band => "&",
            Operator::Bor => "|",
            Operator::Bxor => "^",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Not => "!",
            Operator::Bnot => "~",
            Operator::Neg => "-",
        };
        write!(f, "{}", s)
    }
}

/// A symbolic expression.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum XXpr {
    Constant(XConstant),
    Variable(XVariable),
    Compound { op: Operator, operands: Vec<XXpr> },
}

impl XXpr {
    pub fn constant(constant: XConstant) -> XXpr {
        XXpr::Constant(constant)
    }

    /// A 32-bit integer constant.
    pub fn int_constant(value: u64) -> XXpr {
        XXpr::Constant(XConstant::word(value))
    }

    pub fn variable(variable: XVariable) -> XXpr {
        XXpr::Variable(variable)
    }

    pub fn unary(op: Operator, operand: XXpr) -> XXpr {
        XXpr::Compound {
            op,
            operands: vec![operand],
        }
    }

    pub fn binary(op: Operator, lhs: XXpr, rhs: XXpr) -> XXpr {
        XXpr::Compound {
            op,
            operands: vec![lhs, rhs],
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, XXpr::Constant(_))
    }

    pub fn is_int_constant(&self) -> bool {
        self.is_constant()
    }

    pub fn is_var(&self) -> bool {
        matches!(self, XXpr::Variable(_))
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, XXpr::Compound { .. })
    }

    /// The integer value of a constant expression.
    pub fn int_value(&self) -> Option<u64> {
        match self {
            XXpr::Constant(c) => Some(c.value()),
            _ => None,
        }
    }

    /// True if this expression is `sp_in + c`: a constant offset from the
    /// initial stack pointer, i.e. a stack address.
    pub fn is_stack_address(&self) -> bool {
        self.stack_address_offset().is_some()
    }

    /// The stack offset of a stack-address expression.
    pub fn stack_address_offset(&self) -> Option<i64> {
        if let XXpr::Compound { op, operands } = self {
            if operands.len() == 2 {
                if let (XXpr::Variable(XVariable::Auxiliary(aux)), Some(c)) =
                    (&operands[0], operands[1].int_value())
                {
                    if let AuxVariable::InitialRegisterValue { register, .. } = aux {
                        if register.ends_with("sp") {
                            return match op {
                                Operator::Plus => Some(c as i64),
                                Operator::Minus => Some(-(c as i64)),
                                _ => None,
                            };
                        }
                    }
                }
            }
        }
        None
    }

    /// All variables appearing in this expression.
    pub fn collect_variables(&self) -> Vec<&XVariable> {
        let mut variables: Vec<&XVariable> = Vec::new();
        match self {
            XXpr::Constant(_) => {}
            XXpr::Variable(variable) => variables.push(variable),
            XXpr::Compound { operands, .. } => {
                for operand in operands {
                    variables.append(&mut operand.collect_variables());
                }
            }
        }
        variables
    }

    /// Arithmetically simplify this expression.
    ///
    /// Constant subexpressions are folded; all machine-word arithmetic is
    /// modulo `2^bits` of the wider operand. Simplification is
    /// deterministic and total: an expression that cannot be reduced is
    /// returned unchanged.
    pub fn simplify(&self) -> XXpr {
        match self {
            XXpr::Constant(_) | XXpr::Variable(_) => self.clone(),
            XXpr::Compound { op, operands } => {
                let operands: Vec<XXpr> = operands.iter().map(|x| x.simplify()).collect();
                if operands.len() == 2 {
                    if let (XXpr::Constant(lhs), XXpr::Constant(rhs)) =
                        (&operands[0], &operands[1])
                    {
                        if let Some(folded) = fold_binary(*op, lhs, rhs) {
                            return XXpr::Constant(folded);
                        }
                    }
                    // x + 0, x - 0, x | 0
                    if operands[1].int_value() == Some(0)
                        && matches!(op, Operator::Plus | Operator::Minus | Operator::Bor)
                    {
                        return operands[0].clone();
                    }
                }
                XXpr::Compound {
                    op: *op,
                    operands,
                }
            }
        }
    }
}

fn fold_binary(op: Operator, lhs: &XConstant, rhs: &XConstant) -> Option<XConstant> {
    let bits = std::cmp::max(lhs.bits(), rhs.bits());
    let mask = if bits == 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    };
    let (a, b) = (lhs.value(), rhs.value());
    let value = match op {
        Operator::Plus => a.wrapping_add(b),
        Operator::Minus => a.wrapping_sub(b),
        Operator::Mult => a.wrapping_mul(b),
        Operator::Divu => {
            if b == 0 {
                return None;
            }
            a / b
        }
        Operator::Band => a & b,
        Operator::Bor => a | b,
        Operator::Bxor => a ^ b,
        Operator::Shl => a.wrapping_shl(b as u32),
        Operator::Shr => a.wrapping_shr(b as u32),
        _ => return None,
    };
    Some(XConstant::new(value & mask, bits))
}

impl fmt::Display for XXpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            XXpr::Constant(c) => c.fmt(f),
            XXpr::Variable(v) => v.fmt(f),
            XXpr::Compound { op, operands } => {
                if operands.len() == 1 {
                    write!(f, "{}{}", op, operands[0])
                } else if operands.len() == 2 {
                    write!(f, "({} {} {})", operands[0], op, operands[1])
                } else {
                    write!(f, "{}(", op)?;
                    for (i, operand) in operands.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", operand)?;
                    }
                    write!(f, ")")
                }
            }
        }
    }
}

/// Render a result expression next to its simplified form.
///
/// If the two render identically, the syntactic form alone is returned;
/// otherwise the simplified form is shown first with the syntactic form in
/// parentheses.
pub fn simplify_result(syntactic: &XXpr, simplified: &XXpr) -> String {
    let s1 = syntactic.to_string();
    let s2 = simplified.to_string();
    if s1 == s2 {
        s1
    } else {
        format!("{} ({})", s2, s1)
    }
}

/// Convenience: a memory variable relative to an unknown base.
pub fn basevar_memory(base: XVariable, offset: i64, size: usize) -> XVariable {
    XVariable::Memory {
        base: MemoryBase::BaseVar(Box::new(base)),
        offset: MemoryOffset::Constant(offset),
        size,
    }
}
