//! MIPS opcode descriptors.
//!
//! MIPS records carry a single tag (the mnemonic); argument positions are
//! listed per variant. The xdata layouts mirror the ARM ones: ALU opcodes
//! put the destination in `vars[0]` and [operand values, result,
//! simplified result] in `xprs`.

use log::error;
use serde::{Deserialize, Serialize};

use crate::app::{IndexedRecord, InstrXData, Operand, OperandDict};
use crate::ast::{AstBinaryOp, AstBuilder, AstInstruction};
use crate::error::Error;
use crate::lower;
use crate::sim::{SimState, SimValue};
use crate::xpr::{simplify_result, XVariable, XXpr};

use super::{
    attach_defuses, attach_reachingdefs, memory_rvalue, operand_lvalue, operand_rvalue,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum MipsOpcode {
    /// args: [rd, rs, rt]
    AddUnsigned {
        rd: Operand,
        rs: Operand,
        rt: Operand,
    },
    /// args: [rd, rs, rt]
    And {
        rd: Operand,
        rs: Operand,
        rt: Operand,
    },
    /// args: [rd, rs, rt]
    SubtractUnsigned {
        rd: Operand,
        rs: Operand,
        rt: Operand,
    },
    /// args: [target]
    JumpLink { target: Operand },
    /// args: [rs]
    JumpRegister { rs: Operand },
    /// args: [rt, mem]
    LoadWord { rt: Operand, mem: Operand },
}

impl MipsOpcode {
    pub fn construct(
        dict: &OperandDict,
        record: &IndexedRecord,
    ) -> Result<MipsOpcode, Error> {
        let mnemonic = record.mnemonic()?.to_string();
        let args = record.args();
        let alu = |record: &IndexedRecord| -> Result<(Operand, Operand, Operand), Error> {
            record.check_key(1, 3, record.mnemonic()?)?;
            Ok((
                dict.operand(args[0])?.clone(),
                dict.operand(args[1])?.clone(),
                dict.operand(args[2])?.clone(),
            ))
        };
        match mnemonic.as_str() {
            "addu" => {
                let (rd, rs, rt) = alu(record)?;
                Ok(MipsOpcode::AddUnsigned { rd, rs, rt })
            }
            "and" => {
                let (rd, rs, rt) = alu(record)?;
                Ok(MipsOpcode::And { rd, rs, rt })
            }
            "subu" => {
                let (rd, rs, rt) = alu(record)?;
                Ok(MipsOpcode::SubtractUnsigned { rd, rs, rt })
            }
            "jal" => {
                record.check_key(1, 1, "jal")?;
                Ok(MipsOpcode::JumpLink {
                    target: dict.operand(args[0])?.clone(),
                })
            }
            "jr" => {
                record.check_key(1, 1, "jr")?;
                Ok(MipsOpcode::JumpRegister {
                    rs: dict.operand(args[0])?.clone(),
                })
            }
            "lw" => {
                record.check_key(1, 2, "lw")?;
                Ok(MipsOpcode::LoadWord {
                    rt: dict.operand(args[0])?.clone(),
                    mem: dict.operand(args[1])?.clone(),
                })
            }
            _ => Err(Error::UnknownMnemonic(mnemonic, "mips".to_string())),
        }
    }

    pub fn mnemonic(&self) -> &str {
        match self {
            MipsOpcode::AddUnsigned { .. } => "addu",
            MipsOpcode::And { .. } => "and",
            MipsOpcode::SubtractUnsigned { .. } => "subu",
            MipsOpcode::JumpLink { .. } => "jal",
            MipsOpcode::JumpRegister { .. } => "jr",
            MipsOpcode::LoadWord { .. } => "lw",
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            MipsOpcode::AddUnsigned { rd, rs, rt }
            | MipsOpcode::And { rd, rs, rt }
            | MipsOpcode::SubtractUnsigned { rd, rs, rt } => vec![rd, rs, rt],
            MipsOpcode::JumpLink { target } => vec![target],
            MipsOpcode::JumpRegister { rs } => vec![rs],
            MipsOpcode::LoadWord { rt, mem } => vec![rt, mem],
        }
    }

    pub fn is_load(&self, _xdata: &InstrXData) -> bool {
        matches!(self, MipsOpcode::LoadWord { .. })
    }

    pub fn is_store(&self, _xdata: &InstrXData) -> bool {
        false
    }

    pub fn is_call(&self, _xdata: &InstrXData) -> bool {
        matches!(self, MipsOpcode::JumpLink { .. })
    }

    pub fn is_jump(&self, _xdata: &InstrXData) -> bool {
        match self {
            // jr $ra is the return idiom; any other register is an
            // indirect jump
            MipsOpcode::JumpRegister { rs } => rs.register_name() != Some("ra"),
            _ => false,
        }
    }

    pub fn is_return(&self, _xdata: &InstrXData) -> bool {
        match self {
            MipsOpcode::JumpRegister { rs } => rs.register_name() == Some("ra"),
            _ => false,
        }
    }

    pub fn annotation(&self, xdata: &InstrXData) -> String {
        match self {
            MipsOpcode::AddUnsigned { .. }
            | MipsOpcode::And { .. }
            | MipsOpcode::SubtractUnsigned { .. } => match MipsAluXData::new(xdata) {
                Ok(xd) => {
                    format!("{} := {}", xd.vrd, simplify_result(xd.result, xd.rresult))
                }
                Err(_) => "?".to_string(),
            },
            MipsOpcode::JumpLink { target } => match xdata.call_target() {
                Some(name) => format!("call {}", name),
                None => format!("call {}", target),
            },
            MipsOpcode::JumpRegister { rs } => {
                if self.is_return(xdata) {
                    "return".to_string()
                } else {
                    format!("goto {}", rs)
                }
            }
            MipsOpcode::LoadWord { .. } => match MipsLoadXData::new(xdata) {
                Ok(xd) => {
                    format!("{} := {}", xd.vrt, simplify_result(xd.result, xd.rresult))
                }
                Err(_) => "?".to_string(),
            },
        }
    }

    pub fn ast_prov(
        &self,
        astree: &mut AstBuilder,
        iaddr: &str,
        bytes: &[u8],
        xdata: &InstrXData,
    ) -> Result<(Vec<AstInstruction>, Vec<AstInstruction>), Error> {
        let _ = bytes;
        match self {
            MipsOpcode::AddUnsigned { rd, rs, rt } => {
                self.alu_ast_prov(astree, iaddr, xdata, rd, rs, rt, AstBinaryOp::Plus)
            }
            MipsOpcode::And { rd, rs, rt } => {
                self.alu_ast_prov(astree, iaddr, xdata, rd, rs, rt, AstBinaryOp::BAnd)
            }
            MipsOpcode::SubtractUnsigned { rd, rs, rt } => {
                self.alu_ast_prov(astree, iaddr, xdata, rd, rs, rt, AstBinaryOp::Minus)
            }
            MipsOpcode::LoadWord { rt, mem } => {
                self.load_ast_prov(astree, iaddr, xdata, rt, mem)
            }
            MipsOpcode::JumpLink { target } => {
                self.call_ast_prov(astree, iaddr, xdata, target)
            }
            MipsOpcode::JumpRegister { .. } => Ok((Vec::new(), Vec::new())),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn alu_ast_prov(
        &self,
        astree: &mut AstBuilder,
        iaddr: &str,
        xdata: &InstrXData,
        rd: &Operand,
        rs: &Operand,
        rt: &Operand,
        op: AstBinaryOp,
    ) -> Result<(Vec<AstInstruction>, Vec<AstInstruction>), Error> {
        let ll_lhs = operand_lvalue(rd, astree);
        let ll_op1 = operand_rvalue(rs, astree);
        let ll_op2 = operand_rvalue(rt, astree);
        let ll_rhs = astree.mk_binary_op(op, ll_op1.clone(), ll_op2.clone());
        let ll_assign = astree.mk_assign(iaddr, ll_lhs.clone(), ll_rhs.clone());

        if !xdata.is_ok() {
            error!(
                "{} at {}: invalid semantic data; no high-level lowering",
                self.mnemonic(),
                iaddr
            );
            return Ok((Vec::new(), vec![ll_assign]));
        }
        let xd = MipsAluXData::new(xdata)?;
        let hl_lhs = lower::xvariable_to_ast_lval(xd.vrd, 4, astree)?;
        let hl_rhs = lower::xxpr_to_ast_expr(xd.rresult, astree, iaddr)?;
        let hl_assign = astree.mk_assign(iaddr, hl_lhs.clone(), hl_rhs.clone());

        astree.add_instr_mapping(&hl_assign, &ll_assign);
        astree.add_instr_address(&hl_assign, vec![iaddr.to_string()]);
        astree.add_expr_mapping(&hl_rhs, &ll_rhs);
        astree.add_lval_mapping(&hl_lhs, &ll_lhs);
        attach_reachingdefs(astree, &ll_op1, xdata, &[0]);
        attach_reachingdefs(astree, &ll_op2, xdata, &[1]);
        attach_reachingdefs(astree, &hl_rhs, xdata, &[0, 1]);
        attach_defuses(astree, &hl_lhs, xdata, 0);

        Ok((vec![hl_assign], vec![ll_assign]))
    }

    fn load_ast_prov(
        &self,
        astree: &mut AstBuilder,
        iaddr: &str,
        xdata: &InstrXData,
        rt: &Operand,
        mem: &Operand,
    ) -> Result<(Vec<AstInstruction>, Vec<AstInstruction>), Error> {
        let ll_lhs = operand_lvalue(rt, astree);
        let ll_rhs = memory_rvalue(mem, astree);
        let ll_assign = astree.mk_assign(iaddr, ll_lhs.clone(), ll_rhs.clone());

        if !xdata.is_ok() {
            error!("lw at {}: invalid semantic data; no high-level lowering", iaddr);
            return Ok((Vec::new(), vec![ll_assign]));
        }
        let xd = MipsLoadXData::new(xdata)?;
        let hl_lhs = lower::xvariable_to_ast_lval(xd.vrt, 4, astree)?;
        let hl_rhs = lower::xxpr_to_ast_expr(xd.rresult, astree, iaddr)?;
        let hl_assign = astree.mk_assign(iaddr, hl_lhs.clone(), hl_rhs.clone());

        astree.add_instr_mapping(&hl_assign, &ll_assign);
        astree.add_instr_address(&hl_assign, vec![iaddr.to_string()]);
        astree.add_expr_mapping(&hl_rhs, &ll_rhs);
        astree.add_lval_mapping(&hl_lhs, &ll_lhs);
        attach_reachingdefs(astree, &hl_rhs, xdata, &[0, 1]);
        attach_defuses(astree, &hl_lhs, xdata, 0);

        Ok((vec![hl_assign], vec![ll_assign]))
    }

    fn call_ast_prov(
        &self,
        astree: &mut AstBuilder,
        iaddr: &str,
        xdata: &InstrXData,
        target: &Operand,
    ) -> Result<(Vec<AstInstruction>, Vec<AstInstruction>), Error> {
        let ll_lhs = astree.mk_register_variable_lval("v0");
        let ll_call = astree.mk_call(iaddr, Some(ll_lhs), &target.to_string(), Vec::new());
        if !xdata.is_ok() {
            error!("jal at {}: invalid semantic data; no high-level lowering", iaddr);
            return Ok((Vec::new(), vec![ll_call]));
        }
        let name = xdata
            .call_target()
            .map(|t| t.to_string())
            .unwrap_or_else(|| target.to_string());
        let mut args = Vec::new();
        for xpr in xdata.xprs() {
            args.push(lower::xxpr_to_ast_expr(xpr, astree, iaddr)?);
        }
        let hl_lhs = astree.mk_named_lval(&format!("rtn_{}", iaddr));
        let hl_call = astree.mk_call(iaddr, Some(hl_lhs), &name, args);
        astree.add_instr_mapping(&hl_call, &ll_call);
        astree.add_instr_address(&hl_call, vec![iaddr.to_string()]);
        Ok((vec![hl_call], vec![ll_call]))
    }

    pub fn simulate(&self, iaddr: &str, state: &mut dyn SimState) -> Result<String, Error> {
        match self {
            MipsOpcode::AddUnsigned { rd, rs, rt } => {
                let op1 = state.get_rhs(iaddr, rs)?.to_concrete(iaddr)?;
                let op2 = state.get_rhs(iaddr, rt)?.to_concrete(iaddr)?;
                let result = op1.wrapping_add(op2) & 0xffff_ffff;
                state.set_lhs(iaddr, rd, SimValue::word(result))?;
                state.increment_pc();
                Ok(format!("{} := 0x{:x}", rd, result))
            }
            _ => Err(Error::Custom(format!(
                "simulation not supported for {}",
                self.mnemonic()
            ))),
        }
    }
}

/// ALU xdata layout: vars: [rd]; xprs: [rs value, rt value, result,
/// simplified result].
pub struct MipsAluXData<'a> {
    pub vrd: &'a XVariable,
    pub xrs: &'a XXpr,
    pub xrt: &'a XXpr,
    pub result: &'a XXpr,
    pub rresult: &'a XXpr,
}

impl<'a> MipsAluXData<'a> {
    pub fn new(xdata: &'a InstrXData) -> Result<MipsAluXData<'a>, Error> {
        if !xdata.is_ok() || xdata.vars().len() != 1 || xdata.xprs().len() != 4 {
            return Err(Error::Custom(format!(
                "mips alu: invalid semantic record with {} vars and {} xprs",
                xdata.vars().len(),
                xdata.xprs().len()
            )));
        }
        Ok(MipsAluXData {
            vrd: &xdata.vars()[0],
            xrs: &xdata.xprs()[0],
            xrt: &xdata.xprs()[1],
            result: &xdata.xprs()[2],
            rresult: &xdata.xprs()[3],
        })
    }
}

/// lw xdata layout: vars: [rt]; xprs: [result, simplified result, address].
pub struct MipsLoadXData<'a> {
    pub vrt: &'a XVariable,
    pub result: &'a XXpr,
    pub rresult: &'a XXpr,
    pub xaddr: &'a XXpr,
}

impl<'a> MipsLoadXData<'a> {
    pub fn new(xdata: &'a InstrXData) -> Result<MipsLoadXData<'a>, Error> {
        if !xdata.is_ok() || xdata.vars().len() != 1 || xdata.xprs().len() != 3 {
            return Err(Error::Custom(format!(
                "lw: invalid semantic record with {} vars and {} xprs",
                xdata.vars().len(),
                xdata.xprs().len()
            )));
        }
        Ok(MipsLoadXData {
            vrt: &xdata.vars()[0],
            result: &xdata.xprs()[0],
            rresult: &xdata.xprs()[1],
            xaddr: &xdata.xprs()[2],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpr::Operator;

    fn addu_opcode() -> MipsOpcode {
        let mut dict = OperandDict::new();
        let rd = dict.intern(Operand::register("v0"));
        let rs = dict.intern(Operand::register("a0"));
        let rt = dict.intern(Operand::register("a1"));
        let record = IndexedRecord::new(vec!["addu".to_string()], vec![rd, rs, rt]);
        MipsOpcode::construct(&dict, &record).unwrap()
    }

    #[test]
    fn test_addu_annotation() {
        let opc = addu_opcode();
        let xrs = XXpr::variable(XVariable::register("a0"));
        let xrt = XXpr::variable(XVariable::register("a1"));
        let result = XXpr::binary(Operator::Plus, xrs.clone(), xrt.clone());
        let rresult = result.simplify();
        let xdata = InstrXData::new(
            vec!["a:vxxxx".to_string()],
            vec![XVariable::register("v0")],
            vec![xrs, xrt, result, rresult],
        );
        assert_eq!(opc.annotation(&xdata), "v0 := (a0 + a1)");
    }

    #[test]
    fn test_jr_ra_is_return() {
        let mut dict = OperandDict::new();
        let rs = dict.intern(Operand::register("ra"));
        let record = IndexedRecord::new(vec!["jr".to_string()], vec![rs]);
        let opc = MipsOpcode::construct(&dict, &record).unwrap();
        let xdata = InstrXData::default();
        assert!(opc.is_return(&xdata));
        assert!(!opc.is_jump(&xdata));
        assert_eq!(opc.annotation(&xdata), "return");
    }

    #[test]
    fn test_addu_simulation_symbolic_escape() {
        let opc = addu_opcode();
        struct S;
        impl SimState for S {
            fn get_rhs(&self, _: &str, operand: &Operand) -> Result<SimValue, Error> {
                Ok(SimValue::Symbolic {
                    expr: operand.to_string(),
                })
            }
            fn set_lhs(&mut self, _: &str, _: &Operand, _: SimValue) -> Result<(), Error> {
                Ok(())
            }
            fn update_flag(&mut self, _: &str, _: bool) {}
            fn increment_pc(&mut self) {}
        }
        assert!(matches!(
            opc.simulate("0x400100", &mut S),
            Err(Error::SymbolicExpression { .. })
        ));
    }
}
