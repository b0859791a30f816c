//! Opcode semantic descriptors.
//!
//! One variant per supported mnemonic, grouped by architecture family.
//! A descriptor is an immutable value built from a raw indexed record; its
//! operands are resolved against the shared operand dictionary at
//! construction time. Everything an instruction can be asked to do —
//! render its annotation, classify itself, lower to AST, simulate one
//! step — dispatches through these enums, so coverage stays exhaustive
//! under compilation.

pub mod arm;
pub mod mips;
pub mod x86;

pub use self::arm::ArmOpcode;
pub use self::mips::MipsOpcode;
pub use self::x86::X86Opcode;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::app::{IndexedRecord, InstrXData, Operand, OperandDict};
use crate::ast::{AstBuilder, AstInstruction};
use crate::error::Error;
use crate::sim::SimState;

/// The architecture family an opcode belongs to.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Arch {
    Arm,
    Mips,
    X86,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Arch::Arm => "arm",
            Arch::Mips => "mips",
            Arch::X86 => "x86",
        };
        write!(f, "{}", s)
    }
}

/// A decoded opcode.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Opcode {
    Arm(ArmOpcode),
    Mips(MipsOpcode),
    X86(X86Opcode),
    /// A mnemonic recognized by the decoder but not modeled here.
    Unknown { mnemonic: String },
}

impl Opcode {
    /// Build an opcode from a raw indexed record, resolving its operand
    /// indices against the dictionary.
    pub fn construct(
        arch: Arch,
        dict: &OperandDict,
        record: &IndexedRecord,
    ) -> Result<Opcode, Error> {
        match arch {
            Arch::Arm => Ok(Opcode::Arm(ArmOpcode::construct(dict, record)?)),
            Arch::Mips => Ok(Opcode::Mips(MipsOpcode::construct(dict, record)?)),
            Arch::X86 => Ok(Opcode::X86(X86Opcode::construct(dict, record)?)),
        }
    }

    pub fn unknown<S: Into<String>>(mnemonic: S) -> Opcode {
        Opcode::Unknown {
            mnemonic: mnemonic.into(),
        }
    }

    pub fn mnemonic(&self) -> &str {
        match self {
            Opcode::Arm(opc) => opc.mnemonic(),
            Opcode::Mips(opc) => opc.mnemonic(),
            Opcode::X86(opc) => opc.mnemonic(),
            Opcode::Unknown { mnemonic } => mnemonic,
        }
    }

    /// The resolved operands, in mnemonic order.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Opcode::Arm(opc) => opc.operands(),
            Opcode::Mips(opc) => opc.operands(),
            Opcode::X86(opc) => opc.operands(),
            Opcode::Unknown { .. } => Vec::new(),
        }
    }

    /// The rendered semantic annotation, wrapped with the guard-condition
    /// prefix and any base-update side-effect clause.
    pub fn annotation(&self, xdata: &InstrXData) -> String {
        let core = match self {
            Opcode::Arm(opc) => opc.annotation(xdata),
            Opcode::Mips(opc) => opc.annotation(xdata),
            Opcode::X86(opc) => opc.annotation(xdata),
            Opcode::Unknown { mnemonic } => format!("?{}?", mnemonic),
        };
        wrap_annotation(core, xdata)
    }

    pub fn is_load(&self, xdata: &InstrXData) -> bool {
        match self {
            Opcode::Arm(opc) => opc.is_load(xdata),
            Opcode::Mips(opc) => opc.is_load(xdata),
            Opcode::X86(opc) => opc.is_load(xdata),
            Opcode::Unknown { .. } => false,
        }
    }

    pub fn is_store(&self, xdata: &InstrXData) -> bool {
        match self {
            Opcode::Arm(opc) => opc.is_store(xdata),
            Opcode::Mips(opc) => opc.is_store(xdata),
            Opcode::X86(opc) => opc.is_store(xdata),
            Opcode::Unknown { .. } => false,
        }
    }

    pub fn is_call(&self, xdata: &InstrXData) -> bool {
        match self {
            Opcode::Arm(opc) => opc.is_call(xdata),
            Opcode::Mips(opc) => opc.is_call(xdata),
            Opcode::X86(opc) => opc.is_call(xdata),
            Opcode::Unknown { .. } => false,
        }
    }

    pub fn is_jump(&self, xdata: &InstrXData) -> bool {
        match self {
            Opcode::Arm(opc) => opc.is_jump(xdata),
            Opcode::Mips(opc) => opc.is_jump(xdata),
            Opcode::X86(opc) => opc.is_jump(xdata),
            Opcode::Unknown { .. } => false,
        }
    }

    pub fn is_return(&self, xdata: &InstrXData) -> bool {
        match self {
            Opcode::Arm(opc) => opc.is_return(xdata),
            Opcode::Mips(opc) => opc.is_return(xdata),
            Opcode::X86(opc) => opc.is_return(xdata),
            Opcode::Unknown { .. } => false,
        }
    }

    /// Lower to (high-level, low-level) AST statement lists.
    ///
    /// Opcodes without a lowering rule produce two empty lists.
    pub fn ast_prov(
        &self,
        astree: &mut AstBuilder,
        iaddr: &str,
        bytes: &[u8],
        xdata: &InstrXData,
    ) -> Result<(Vec<AstInstruction>, Vec<AstInstruction>), Error> {
        match self {
            Opcode::Arm(opc) => opc.ast_prov(astree, iaddr, bytes, xdata),
            Opcode::Mips(opc) => opc.ast_prov(astree, iaddr, bytes, xdata),
            Opcode::X86(_) | Opcode::Unknown { .. } => Ok((Vec::new(), Vec::new())),
        }
    }

    /// Advance `state` by one instruction's concrete effect.
    pub fn simulate(&self, iaddr: &str, state: &mut dyn SimState) -> Result<String, Error> {
        match self {
            Opcode::Arm(opc) => opc.simulate(iaddr, state),
            Opcode::Mips(opc) => opc.simulate(iaddr, state),
            Opcode::X86(opc) => opc.simulate(iaddr, state),
            Opcode::Unknown { mnemonic } => Err(Error::Custom(format!(
                "simulation not supported for {}",
                mnemonic
            ))),
        }
    }
}

/// Apply the shared annotation decorations: a trailing base-register
/// update clause and a leading guard-condition prefix.
pub(crate) fn wrap_annotation(core: String, xdata: &InstrXData) -> String {
    let core = match xdata.base_update() {
        Some((lhs, rhs)) => format!("{}; {} := {}", core, lhs, rhs),
        None => core,
    };
    match xdata.instruction_condition() {
        Some(c) => format!("if {} then {}", c, core),
        None if xdata.has_unknown_condition() => format!("if ? then {}", core),
        None => core,
    }
}

/// The low-level assignment for an auto-increment base-register update,
/// when the instruction has one.
pub(crate) fn base_update_ll(
    astree: &mut AstBuilder,
    iaddr: &str,
    xdata: &InstrXData,
) -> Result<Vec<AstInstruction>, Error> {
    match xdata.base_update() {
        Some((lhs, rhs)) => {
            let lhs = lhs.clone();
            let rhs = rhs.clone();
            let ll_lhs = crate::lower::xvariable_to_ast_lval(&lhs, 4, astree)?;
            let ll_rhs = crate::lower::xxpr_to_ast_expr(&rhs, astree, iaddr)?;
            Ok(vec![astree.mk_assign(iaddr, ll_lhs, ll_rhs)])
        }
        None => Ok(Vec::new()),
    }
}

pub(crate) fn attach_reachingdefs(
    astree: &mut AstBuilder,
    expr: &crate::ast::AstExpr,
    xdata: &InstrXData,
    indices: &[usize],
) {
    let mut addresses = Vec::new();
    for &i in indices {
        if let Some(xref) = xdata.reachingdefs().get(i) {
            addresses.extend(xref.addresses().iter().cloned());
        }
    }
    astree.add_expr_reachingdefs(expr, addresses);
}

pub(crate) fn attach_defuses(
    astree: &mut AstBuilder,
    lval: &crate::ast::AstLval,
    xdata: &InstrXData,
    index: usize,
) {
    if let Some(xref) = xdata.defuses().get(index) {
        astree.add_lval_defuses(lval, xref.addresses().to_vec());
    }
    if let Some(xref) = xdata.defuses_high().get(index) {
        astree.add_lval_defuses_high(lval, xref.addresses().to_vec());
    }
}

/// The low-level lvalue of an architectural operand.
pub(crate) fn operand_lvalue(operand: &Operand, astree: &mut AstBuilder) -> crate::ast::AstLval {
    match operand {
        Operand::Register { name } => astree.mk_register_variable_lval(name),
        _ => operand_memref_lvalue(operand, astree),
    }
}

/// The low-level rvalue of an architectural operand.
pub(crate) fn operand_rvalue(operand: &Operand, astree: &mut AstBuilder) -> crate::ast::AstExpr {
    match operand {
        Operand::Register { name } => {
            let lval = astree.mk_register_variable_lval(name);
            astree.mk_lval_expr(lval)
        }
        Operand::Immediate { value } => astree.mk_integer_constant(*value),
        _ => {
            let lval = operand_memref_lvalue(operand, astree);
            astree.mk_lval_expr(lval)
        }
    }
}

/// The dereference lvalue `*(base + offset)` of a memory operand.
pub(crate) fn operand_memref_lvalue(
    operand: &Operand,
    astree: &mut AstBuilder,
) -> crate::ast::AstLval {
    match operand {
        Operand::Indirect { base, offset, .. } => {
            let base = astree.mk_register_variable_lval(base);
            let base = astree.mk_lval_expr(base);
            let off = astree.mk_integer_constant(*offset);
            let addr = astree.mk_binary_op(crate::ast::AstBinaryOp::Plus, base, off);
            astree.mk_memref_lval(addr, crate::ast::AstOffset::NoOffset)
        }
        _ => {
            let name = operand.to_string();
            astree.mk_named_lval(&name)
        }
    }
}

pub(crate) fn memory_rvalue(operand: &Operand, astree: &mut AstBuilder) -> crate::ast::AstExpr {
    let lval = operand_memref_lvalue(operand, astree);
    astree.mk_lval_expr(lval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpr::{Operator, XVariable, XXpr};

    #[test]
    fn test_wrap_annotation_plain() {
        let xdata = InstrXData::new(vec![], vec![], vec![]);
        assert_eq!(wrap_annotation("R0 := 1".to_string(), &xdata), "R0 := 1");
    }

    #[test]
    fn test_wrap_annotation_condition_prefix() {
        let cond = XXpr::binary(
            Operator::Ne,
            XXpr::variable(XVariable::register("R3")),
            XXpr::int_constant(0),
        );
        let xdata = InstrXData::new(vec![], vec![], vec![]).with_condition(cond);
        assert_eq!(
            wrap_annotation("R0 := 1".to_string(), &xdata),
            "if (R3 != 0x0) then R0 := 1"
        );
    }

    #[test]
    fn test_wrap_annotation_unknown_condition() {
        let xdata = InstrXData::new(vec![], vec![], vec![]).with_unknown_condition();
        assert_eq!(
            wrap_annotation("R0 := 1".to_string(), &xdata),
            "if ? then R0 := 1"
        );
    }

    #[test]
    fn test_wrap_annotation_base_update() {
        let xdata = InstrXData::new(vec![], vec![], vec![]).with_base_update(
            XVariable::register("R3"),
            XXpr::binary(
                Operator::Plus,
                XXpr::variable(XVariable::register("R3")),
                XXpr::int_constant(4),
            ),
        );
        assert_eq!(
            wrap_annotation("R0 := x".to_string(), &xdata),
            "R0 := x; R3 := (R3 + 0x4)"
        );
    }
}
