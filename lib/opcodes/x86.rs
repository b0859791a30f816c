//! x86 opcode descriptors.
//!
//! x86 records carry a single tag. Two-operand ALU forms write their first
//! operand; xdata layouts follow the ALU convention of the other
//! architectures.

use serde::{Deserialize, Serialize};

use crate::app::{IndexedRecord, InstrXData, Operand, OperandDict};
use crate::error::Error;
use crate::sim::{SimState, SimValue};
use crate::xpr::{simplify_result, XVariable, XXpr};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum X86Opcode {
    /// args: [dst, src]
    Add { dst: Operand, src: Operand },
    /// args: [dst, src]
    RotateRight { dst: Operand, src: Operand },
    /// args: [dst, src]
    Xor { dst: Operand, src: Operand },
    /// args: [op1, op2]
    Compare { op1: Operand, op2: Operand },
    /// args: [target]
    Call { target: Operand },
    /// args: []
    Return,
}

impl X86Opcode {
    pub fn construct(dict: &OperandDict, record: &IndexedRecord) -> Result<X86Opcode, Error> {
        let mnemonic = record.mnemonic()?.to_string();
        let args = record.args();
        let pair = |name: &str| -> Result<(Operand, Operand), Error> {
            record.check_key(1, 2, name)?;
            Ok((dict.operand(args[0])?.clone(), dict.operand(args[1])?.clone()))
        };
        match mnemonic.as_str() {
            "add" => {
                let (dst, src) = pair("add")?;
                Ok(X86Opcode::Add { dst, src })
            }
            "ror" => {
                let (dst, src) = pair("ror")?;
                Ok(X86Opcode::RotateRight { dst, src })
            }
            "xor" => {
                let (dst, src) = pair("xor")?;
                Ok(X86Opcode::Xor { dst, src })
            }
            "cmp" => {
                let (op1, op2) = pair("cmp")?;
                Ok(X86Opcode::Compare { op1, op2 })
            }
            "call" => {
                record.check_key(1, 1, "call")?;
                Ok(X86Opcode::Call {
                    target: dict.operand(args[0])?.clone(),
                })
            }
            "ret" => {
                record.check_key(1, 0, "ret")?;
                Ok(X86Opcode::Return)
            }
            _ => Err(Error::UnknownMnemonic(mnemonic, "x86".to_string())),
        }
    }

    pub fn mnemonic(&self) -> &str {
        match self {
            X86Opcode::Add { .. } => "add",
            X86Opcode::RotateRight { .. } => "ror",
            X86Opcode::Xor { .. } => "xor",
            X86Opcode::Compare { .. } => "cmp",
            X86Opcode::Call { .. } => "call",
            X86Opcode::Return => "ret",
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            X86Opcode::Add { dst, src }
            | X86Opcode::RotateRight { dst, src }
            | X86Opcode::Xor { dst, src } => vec![dst, src],
            X86Opcode::Compare { op1, op2 } => vec![op1, op2],
            X86Opcode::Call { target } => vec![target],
            X86Opcode::Return => Vec::new(),
        }
    }

    pub fn is_load(&self, _xdata: &InstrXData) -> bool {
        false
    }

    pub fn is_store(&self, _xdata: &InstrXData) -> bool {
        false
    }

    pub fn is_call(&self, _xdata: &InstrXData) -> bool {
        matches!(self, X86Opcode::Call { .. })
    }

    pub fn is_jump(&self, _xdata: &InstrXData) -> bool {
        false
    }

    pub fn is_return(&self, _xdata: &InstrXData) -> bool {
        matches!(self, X86Opcode::Return)
    }

    pub fn annotation(&self, xdata: &InstrXData) -> String {
        match self {
            X86Opcode::Add { .. } | X86Opcode::RotateRight { .. } => {
                match X86AluXData::new(xdata) {
                    Ok(xd) => format!(
                        "{} := {}",
                        xd.vdst,
                        simplify_result(xd.result, xd.rresult)
                    ),
                    Err(_) => "?".to_string(),
                }
            }
            X86Opcode::Xor { dst, src } => {
                // xor r, r is the zeroing idiom
                if dst == src {
                    match xdata.vars().first() {
                        Some(v) => format!("{} := 0", v),
                        None => format!("{} := 0", dst),
                    }
                } else {
                    match X86AluXData::new(xdata) {
                        Ok(xd) => format!(
                            "{} := {}",
                            xd.vdst,
                            simplify_result(xd.result, xd.rresult)
                        ),
                        Err(_) => "?".to_string(),
                    }
                }
            }
            X86Opcode::Compare { op1, op2 } => {
                match (xdata.xpr(0), xdata.xpr(1)) {
                    (Some(x1), Some(x2)) => format!("cmp {}, {}", x1, x2),
                    _ => format!("cmp {}, {}", op1, op2),
                }
            }
            X86Opcode::Call { target } => match xdata.call_target() {
                Some(name) => format!("call {}", name),
                None => format!("call {}", target),
            },
            X86Opcode::Return => "return".to_string(),
        }
    }

    pub fn simulate(&self, iaddr: &str, state: &mut dyn SimState) -> Result<String, Error> {
        match self {
            X86Opcode::Add { dst, src } => {
                let op1 = state.get_rhs(iaddr, dst)?.to_concrete(iaddr)?;
                let op2 = state.get_rhs(iaddr, src)?.to_concrete(iaddr)?;
                let result = op1.wrapping_add(op2) & 0xffff_ffff;
                state.set_lhs(iaddr, dst, SimValue::word(result))?;
                state.update_flag("ZF", result == 0);
                state.update_flag("SF", result & 0x8000_0000 != 0);
                state.increment_pc();
                Ok(format!("{} := 0x{:x}", dst, result))
            }
            X86Opcode::RotateRight { dst, src } => {
                let value = state.get_rhs(iaddr, dst)?.to_concrete(iaddr)? & 0xffff_ffff;
                let count = state.get_rhs(iaddr, src)?.to_concrete(iaddr)? % 32;
                let result = if count == 0 {
                    value
                } else {
                    ((value >> count) | (value << (32 - count))) & 0xffff_ffff
                };
                state.set_lhs(iaddr, dst, SimValue::word(result))?;
                state.increment_pc();
                Ok(format!("{} := 0x{:x}", dst, result))
            }
            _ => Err(Error::Custom(format!(
                "simulation not supported for {}",
                self.mnemonic()
            ))),
        }
    }
}

/// Two-operand ALU xdata layout: vars: [dst];
/// xprs: [dst value, src value, result, simplified result].
pub struct X86AluXData<'a> {
    pub vdst: &'a XVariable,
    pub x1: &'a XXpr,
    pub x2: &'a XXpr,
    pub result: &'a XXpr,
    pub rresult: &'a XXpr,
}

impl<'a> X86AluXData<'a> {
    pub fn new(xdata: &'a InstrXData) -> Result<X86AluXData<'a>, Error> {
        if !xdata.is_ok() || xdata.vars().len() != 1 || xdata.xprs().len() != 4 {
            return Err(Error::Custom(format!(
                "x86 alu: invalid semantic record with {} vars and {} xprs",
                xdata.vars().len(),
                xdata.xprs().len()
            )));
        }
        Ok(X86AluXData {
            vdst: &xdata.vars()[0],
            x1: &xdata.xprs()[0],
            x2: &xdata.xprs()[1],
            result: &xdata.xprs()[2],
            rresult: &xdata.xprs()[3],
        })
    }
}
