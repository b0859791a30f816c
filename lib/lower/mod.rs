//! Lowering of symbolic variables and expressions to AST form.
//!
//! The central difficulty is aliasing: the same symbolic memory location
//! may denote a stack slot, a struct field, an array element, or a raw
//! named placeholder, depending on what type information is statically
//! known. Resolution is deterministic and total over the variable and
//! expression variants; shapes that cannot be represented in exactly one
//! AST node per operand are rejected with `UnsupportedExpressionShape`
//! rather than approximated.

use log::debug;

use crate::ast::{
    AstBinaryOp, AstBuilder, AstExpr, AstLval, AstOffset, AstTyp, AstUnaryOp,
};
use crate::error::Error;
use crate::xpr::{AuxVariable, MemoryBase, MemoryOffset, Operator, XVariable, XXpr};

/// Argument-index bias for stack-passed arguments: the first four argument
/// locations are registers, so the word at stack offset 0 is argument 4.
const STACK_ARG_INDEX_BIAS: usize = 4;

/// Lower a symbolic variable to one or more AST lvalues.
///
/// Most variables produce exactly one lvalue; a 2-byte stack access is
/// split into two consecutive 1-byte slots.
pub fn xvariable_to_ast_lvals(
    xvar: &XVariable,
    size: usize,
    astree: &mut AstBuilder,
) -> Result<Vec<AstLval>, Error> {
    match xvar {
        XVariable::Tmp { .. } => Ok(vec![astree.mk_temp_lval()]),
        XVariable::Register { name } => Ok(vec![astree.mk_register_variable_lval(name)]),
        XVariable::Memory { base, offset, size } => {
            memory_variable_to_ast_lvals(base, offset, *size, astree)
        }
        XVariable::Auxiliary(aux) => Ok(vec![auxiliary_to_ast_lval(aux, size, astree)?]),
    }
}

/// Lower a symbolic variable to exactly one AST lvalue.
pub fn xvariable_to_ast_lval(
    xvar: &XVariable,
    size: usize,
    astree: &mut AstBuilder,
) -> Result<AstLval, Error> {
    let mut lvals = xvariable_to_ast_lvals(xvar, size, astree)?;
    if lvals.len() == 1 {
        Ok(lvals.remove(0))
    } else {
        Err(Error::UnsupportedExpressionShape(format!(
            "variable {} lowers to {} lvalues",
            xvar,
            lvals.len()
        )))
    }
}

/// Lower a list of variables jointly.
///
/// If every variable in the list is an argument value of the same formal
/// parameter and together they cover exactly that formal's declared
/// storage locations, the whole list collapses to the single formal
/// lvalue. Otherwise each variable is lowered individually.
pub fn xvariable_list_to_ast_lvals(
    xvars: &[XVariable],
    astree: &mut AstBuilder,
) -> Result<Vec<AstLval>, Error> {
    if let Some(lval) = formal_aggregate_lval(xvars, astree) {
        return Ok(vec![lval]);
    }
    let mut lvals = Vec::new();
    for xvar in xvars {
        lvals.append(&mut xvariable_to_ast_lvals(xvar, 4, astree)?);
    }
    Ok(lvals)
}

/// The single formal covering an aggregate register group, when the group
/// exactly matches the formal's location set.
fn formal_aggregate_lval(xvars: &[XVariable], astree: &mut AstBuilder) -> Option<AstLval> {
    if xvars.is_empty() {
        return None;
    }
    let mut argindices = Vec::new();
    for xvar in xvars {
        match xvar.auxiliary() {
            Some(AuxVariable::InitialRegisterValue {
                argindex: Some(argindex),
                ..
            }) => argindices.push(*argindex),
            _ => return None,
        }
    }
    let (formal, _) = astree.formal_with_argindex(argindices[0])?;
    let name = formal.name.clone();
    let base = formal.argindex;
    let span = formal.arglocs.len();
    let mut locindices: Vec<usize> = argindices
        .iter()
        .map(|&a| a.checked_sub(base))
        .collect::<Option<Vec<usize>>>()?;
    locindices.sort_unstable();
    locindices.dedup();
    if locindices.len() == span
        && locindices.len() == xvars.len()
        && locindices == (0..span).collect::<Vec<usize>>()
    {
        Some(astree.mk_named_lval(&name))
    } else {
        None
    }
}

fn memory_variable_to_ast_lvals(
    base: &MemoryBase,
    offset: &MemoryOffset,
    size: usize,
    astree: &mut AstBuilder,
) -> Result<Vec<AstLval>, Error> {
    match (base, offset) {
        (MemoryBase::LocalStackFrame, MemoryOffset::Constant(off)) => {
            if size == 2 {
                // split a halfword access into its two byte slots
                Ok(vec![
                    astree.mk_stack_variable_lval(*off, 1),
                    astree.mk_stack_variable_lval(*off + 1, 1),
                ])
            } else {
                Ok(vec![astree.mk_stack_variable_lval(*off, size)])
            }
        }
        (MemoryBase::Global, MemoryOffset::Constant(off)) => {
            let addr = *off as u64;
            let lval = match astree.global_at(addr) {
                Some(varinfo) => {
                    let name = varinfo.name.clone();
                    astree.mk_named_lval(&name)
                }
                None => astree.mk_named_lval(&format!("gv_0x{:x}", addr)),
            };
            Ok(vec![lval])
        }
        (MemoryBase::BaseVar(basevar), MemoryOffset::Constant(off)) => {
            Ok(vec![basevar_to_ast_lval(basevar, *off, astree)?])
        }
        _ => {
            // exact reconstruction abandoned; the name must still be
            // unique and stable for this variable
            let name = sanitize_name(&format!("{}__{}", base_name(base), offset));
            Ok(vec![astree.mk_named_lval(&name)])
        }
    }
}

fn base_name(base: &MemoryBase) -> String {
    match base {
        MemoryBase::LocalStackFrame => "var".to_string(),
        MemoryBase::Global => "gv".to_string(),
        MemoryBase::BaseVar(v) => v.to_string(),
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Resolve a base-variable memory access through the base's declared type.
fn basevar_to_ast_lval(
    basevar: &XVariable,
    offset: i64,
    astree: &mut AstBuilder,
) -> Result<AstLval, Error> {
    let basename = basevar.to_string();
    let basetype = astree.variable_type(&basename).cloned();
    match basetype {
        Some(AstTyp::Array { element, .. }) => {
            let elsize = element.byte_size().unwrap_or(1).max(1) as i64;
            let index = offset / elsize;
            let off = astree.mk_scalar_index_offset(index, AstOffset::NoOffset);
            Ok(astree.mk_named_lval_with_offset(&basename, off))
        }
        Some(AstTyp::Comp { compkey, .. }) => {
            let off = field_offset_path(compkey, offset, astree)?;
            Ok(astree.mk_named_lval_with_offset(&basename, off))
        }
        Some(AstTyp::Pointer { target }) => match *target {
            AstTyp::Comp { compkey, .. } => {
                let off = field_offset_path(compkey, offset, astree)?;
                let base = astree.mk_named_lval(&basename);
                let base = astree.mk_lval_expr(base);
                Ok(astree.mk_memref_lval(base, off))
            }
            AstTyp::Int { bytes } => {
                let elsize = bytes.max(1) as i64;
                let base = astree.mk_named_lval(&basename);
                let base = astree.mk_lval_expr(base);
                let off =
                    astree.mk_scalar_index_offset(offset / elsize, AstOffset::NoOffset);
                Ok(astree.mk_memref_lval(base, off))
            }
            AstTyp::Void => {
                let base = astree.mk_named_lval(&basename);
                let base = astree.mk_lval_expr(base);
                let off = astree.mk_scalar_index_offset(offset, AstOffset::NoOffset);
                Ok(astree.mk_memref_lval(base, off))
            }
            _ => untyped_basevar_lval(&basename, offset, astree),
        },
        _ => untyped_basevar_lval(&basename, offset, astree),
    }
}

fn untyped_basevar_lval(
    basename: &str,
    offset: i64,
    astree: &mut AstBuilder,
) -> Result<AstLval, Error> {
    if offset == 0 {
        // plain dereference of an untyped pointer
        let base = astree.mk_named_lval(basename);
        let base = astree.mk_lval_expr(base);
        Ok(astree.mk_memref_lval(base, AstOffset::NoOffset))
    } else {
        let name = sanitize_name(&format!("{}_{}", basename, offset));
        Ok(astree.mk_named_lval(&name))
    }
}

/// The field path into the composite `compkey` at byte offset `offset`,
/// descending through nested composites and arrays.
fn field_offset_path(
    compkey: usize,
    offset: i64,
    astree: &mut AstBuilder,
) -> Result<AstOffset, Error> {
    let (fieldname, fieldkey, fieldtyp, rest) = {
        let compinfo = astree.compinfo(compkey)?;
        let (field, rest) = compinfo.field_at_offset(offset)?;
        (
            field.name.clone(),
            compinfo.compkey,
            field.typ.clone(),
            rest,
        )
    };
    let suboffset = if rest == 0 {
        AstOffset::NoOffset
    } else {
        match fieldtyp {
            AstTyp::Comp { compkey, .. } => field_offset_path(compkey, rest, astree)?,
            AstTyp::Array { element, .. } => {
                let elsize = element.byte_size().unwrap_or(1).max(1) as i64;
                astree.mk_scalar_index_offset(rest / elsize, AstOffset::NoOffset)
            }
            _ => {
                return Err(Error::NoFieldAtOffset {
                    compname: fieldname,
                    offset: rest,
                })
            }
        }
    };
    Ok(astree.mk_field_offset(&fieldname, fieldkey, suboffset))
}

fn auxiliary_to_ast_lval(
    aux: &AuxVariable,
    size: usize,
    astree: &mut AstBuilder,
) -> Result<AstLval, Error> {
    match aux {
        AuxVariable::InitialRegisterValue { register, argindex } => {
            if register.ends_with("sp") {
                return Ok(astree.mk_named_lval("base_sp"));
            }
            if let Some(argindex) = *argindex {
                if let Some((formal, _)) = astree.formal_with_argindex(argindex) {
                    if formal.arglocs.len() == 1 {
                        let name = formal.name.clone();
                        return Ok(astree.mk_named_lval(&name));
                    }
                }
            }
            Ok(astree.mk_named_lval(&format!("{}_in", register)))
        }
        AuxVariable::InitialMemoryValue { variable } => {
            initial_memory_value_to_ast_lval(variable, size, astree)
        }
        AuxVariable::FunctionReturnValue {
            callsite,
            calltarget,
        } => {
            let name = format!("rtn_{}", callsite);
            if let Some(target) = calltarget {
                if let Some(typ) = astree.return_type(target).cloned() {
                    astree.set_variable_type(&name, typ);
                }
            }
            Ok(astree.mk_named_lval(&name))
        }
    }
}

/// The initial value of a word-aligned, non-negative stack location is an
/// incoming stack-passed argument; anything else resolves as an ordinary
/// memory variable.
fn initial_memory_value_to_ast_lval(
    variable: &XVariable,
    size: usize,
    astree: &mut AstBuilder,
) -> Result<AstLval, Error> {
    if let XVariable::Memory {
        base: MemoryBase::LocalStackFrame,
        offset: MemoryOffset::Constant(off),
        ..
    } = variable
    {
        if *off >= 0 && *off % 4 == 0 {
            let argindex = STACK_ARG_INDEX_BIAS + (*off / 4) as usize;
            if let Some((formal, _)) = astree.formal_with_argindex(argindex) {
                if formal.arglocs.len() == 1 {
                    let name = formal.name.clone();
                    return Ok(astree.mk_named_lval(&name));
                }
            }
            return Ok(astree.mk_named_lval(&format!("arg_{}", argindex)));
        }
    }
    xvariable_to_ast_lval(variable, size, astree)
}

/// Lower a symbolic expression to one or more AST expressions.
pub fn xxpr_to_ast_exprs(
    xpr: &XXpr,
    astree: &mut AstBuilder,
    iaddr: &str,
) -> Result<Vec<AstExpr>, Error> {
    match xpr {
        XXpr::Constant(c) => Ok(vec![astree.mk_integer_constant(c.value() as i64)]),
        XXpr::Variable(xvar) => {
            let lvals = xvariable_to_ast_lvals(xvar, 4, astree)?;
            Ok(lvals
                .into_iter()
                .map(|lval| astree.mk_lval_expr(lval))
                .collect())
        }
        XXpr::Compound { op, operands } => {
            compound_to_ast_exprs(*op, operands, astree, iaddr)
        }
    }
}

/// Lower a symbolic expression to exactly one AST expression.
pub fn xxpr_to_ast_expr(
    xpr: &XXpr,
    astree: &mut AstBuilder,
    iaddr: &str,
) -> Result<AstExpr, Error> {
    let mut exprs = xxpr_to_ast_exprs(xpr, astree, iaddr)?;
    if exprs.len() == 1 {
        Ok(exprs.remove(0))
    } else {
        Err(Error::UnsupportedExpressionShape(format!(
            "{} lowers to {} expressions at {}",
            xpr,
            exprs.len(),
            iaddr
        )))
    }
}

fn compound_to_ast_exprs(
    op: Operator,
    operands: &[XXpr],
    astree: &mut AstBuilder,
    iaddr: &str,
) -> Result<Vec<AstExpr>, Error> {
    // a stack address is the address of a stack slot
    let whole = XXpr::Compound {
        op,
        operands: operands.to_vec(),
    };
    if let Some(off) = whole.stack_address_offset() {
        let lval = astree.mk_stack_variable_lval(off, 4);
        return Ok(vec![astree.mk_address_of(lval)]);
    }

    if op.is_unary() && operands.len() == 1 {
        let operand = xxpr_to_ast_expr(&operands[0], astree, iaddr)?;
        let astop = unary_operator(op)?;
        return Ok(vec![astree.mk_unary_op(astop, operand)]);
    }

    if operands.len() != 2 {
        return Err(Error::UnsupportedExpressionShape(format!(
            "{}-ary {} at {}",
            operands.len(),
            op,
            iaddr
        )));
    }

    if op == Operator::Band {
        if let Some(exprs) = byte_mask_to_ast_exprs(&operands[0], &operands[1], astree)? {
            return Ok(vec![exprs]);
        }
    }

    if matches!(op, Operator::Plus | Operator::Minus) {
        match field_address_expr(op, &operands[0], &operands[1], astree) {
            Ok(Some(expr)) => return Ok(vec![expr]),
            Ok(None) => {}
            Err(e) => {
                // structural resolution is best-effort; arithmetic is
                // always a correct rendering
                debug!("field address resolution failed at {}: {}", iaddr, e);
            }
        }
    }

    let lhs = xxpr_to_ast_expr(&operands[0], astree, iaddr)?;
    let rhs = xxpr_to_ast_expr(&operands[1], astree, iaddr)?;
    let astop = binary_operator(op)?;
    Ok(vec![astree.mk_binary_op(astop, lhs, rhs)])
}

/// Reduce a bitwise-AND against a 4-element byte-array variable: mask 0xff
/// selects the first byte, mask 0 is the constant 0, any other mask stays
/// an explicit masking operation (handled by the caller).
fn byte_mask_to_ast_exprs(
    lhs: &XXpr,
    rhs: &XXpr,
    astree: &mut AstBuilder,
) -> Result<Option<AstExpr>, Error> {
    let mask = match rhs.int_value() {
        Some(mask) => mask,
        None => return Ok(None),
    };
    let xvar = match lhs {
        XXpr::Variable(xvar) => xvar,
        _ => return Ok(None),
    };
    let is_byte_array = match astree.variable_type(&xvar.to_string()) {
        Some(AstTyp::Array { element, size }) => {
            element.byte_size() == Some(1) && *size == Some(4)
        }
        _ => false,
    };
    if !is_byte_array {
        return Ok(None);
    }
    match mask {
        0 => Ok(Some(astree.mk_integer_constant(0))),
        0xff => {
            let name = xvar.to_string();
            let off = astree.mk_scalar_index_offset(0, AstOffset::NoOffset);
            let lval = astree.mk_named_lval_with_offset(&name, off);
            Ok(Some(astree.mk_lval_expr(lval)))
        }
        _ => Ok(None),
    }
}

/// Attempt to render `ptr +/- c` as the address of a struct field when the
/// pointer operand's declared type identifies the composite. Returns
/// `Ok(None)` when the shape does not apply; an `Err` means resolution was
/// attempted and failed, and the caller falls back to plain arithmetic.
fn field_address_expr(
    op: Operator,
    lhs: &XXpr,
    rhs: &XXpr,
    astree: &mut AstBuilder,
) -> Result<Option<AstExpr>, Error> {
    if op != Operator::Plus {
        return Ok(None);
    }
    let offset = match rhs.int_value() {
        Some(offset) => offset as i64,
        None => return Ok(None),
    };
    let xvar = match lhs {
        XXpr::Variable(xvar) => xvar,
        _ => return Ok(None),
    };
    let compkey = match astree.variable_type(&xvar.to_string()) {
        Some(AstTyp::Pointer { target }) => match target.as_ref() {
            AstTyp::Comp { compkey, .. } => *compkey,
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    let off = field_offset_path(compkey, offset, astree)?;
    let basename = xvar.to_string();
    let base = astree.mk_named_lval(&basename);
    let base = astree.mk_lval_expr(base);
    let lval = astree.mk_memref_lval(base, off);
    Ok(Some(astree.mk_address_of(lval)))
}

fn unary_operator(op: Operator) -> Result<AstUnaryOp, Error> {
    match op {
        Operator::Not => Ok(AstUnaryOp::LNot),
        Operator::Bnot => Ok(AstUnaryOp::BNot),
        Operator::Neg => Ok(AstUnaryOp::Neg),
        _ => Err(Error::UnsupportedExpressionShape(format!(
            "unary {}",
            op
        ))),
    }
}

fn binary_operator(op: Operator) -> Result<AstBinaryOp, Error> {
    match op {
        Operator::Plus => Ok(AstBinaryOp::Plus),
        Operator::Minus => Ok(AstBinaryOp::Minus),
        Operator::Mult => Ok(AstBinaryOp::Mult),
        Operator::Divu => Ok(AstBinaryOp::Div),
        Operator::Band => Ok(AstBinaryOp::BAnd),
        Operator::Bor => Ok(AstBinaryOp::BOr),
        Operator::Bxor => Ok(AstBinaryOp::BXor),
        Operator::Shl => Ok(AstBinaryOp::Shl),
        Operator::Shr => Ok(AstBinaryOp::Shr),
        Operator::Eq => Ok(AstBinaryOp::Eq),
        Operator::Ne => Ok(AstBinaryOp::Ne),
        Operator::Lt => Ok(AstBinaryOp::Lt),
        Operator::Ge => Ok(AstBinaryOp::Ge),
        _ => Err(Error::UnsupportedExpressionShape(format!(
            "binary {}",
            op
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstCompInfo, AstFieldInfo, AstFormal, VarInfo};
    use crate::xpr::XConstant;

    fn initial_register(register: &str, argindex: Option<usize>) -> XVariable {
        XVariable::Auxiliary(AuxVariable::InitialRegisterValue {
            register: register.to_string(),
            argindex,
        })
    }

    #[test]
    fn test_halfword_stack_access_splits_into_bytes() {
        let mut astree = AstBuilder::new();
        let xvar = XVariable::Memory {
            base: MemoryBase::LocalStackFrame,
            offset: MemoryOffset::Constant(-12),
            size: 2,
        };
        let lvals = xvariable_to_ast_lvals(&xvar, 2, &mut astree).unwrap();
        assert_eq!(lvals.len(), 2);
        assert_eq!(lvals[0].name(), Some("localvar_12b"));
        assert_eq!(lvals[1].name(), Some("localvar_11b"));
    }

    #[test]
    fn test_word_stack_access_is_single_lval() {
        let mut astree = AstBuilder::new();
        let xvar = XVariable::stack(-16);
        let lvals = xvariable_to_ast_lvals(&xvar, 4, &mut astree).unwrap();
        assert_eq!(lvals.len(), 1);
        assert_eq!(lvals[0].name(), Some("localvar_16"));
    }

    #[test]
    fn test_global_falls_back_to_synthesized_name() {
        let mut astree = AstBuilder::new();
        let xvar = XVariable::Memory {
            base: MemoryBase::Global,
            offset: MemoryOffset::Constant(0x11d0),
            size: 4,
        };
        let lval = xvariable_to_ast_lval(&xvar, 4, &mut astree).unwrap();
        assert_eq!(lval.name(), Some("gv_0x11d0"));
    }

    #[test]
    fn test_global_resolves_declared_name() {
        let mut astree = AstBuilder::new();
        astree.add_global(
            0x11d0,
            VarInfo {
                name: "config".to_string(),
                typ: None,
            },
        );
        let xvar = XVariable::Memory {
            base: MemoryBase::Global,
            offset: MemoryOffset::Constant(0x11d0),
            size: 4,
        };
        let lval = xvariable_to_ast_lval(&xvar, 4, &mut astree).unwrap();
        assert_eq!(lval.name(), Some("config"));
    }

    fn pair_formals() -> Vec<AstFormal> {
        vec![AstFormal {
            name: "pair".to_string(),
            argindex: 1,
            arglocs: vec!["R1".to_string(), "R2".to_string()],
        }]
    }

    #[test]
    fn test_aggregate_argument_merge() {
        let mut astree = AstBuilder::new();
        astree.set_formals(pair_formals());
        let xvars = vec![initial_register("R1", Some(1)), initial_register("R2", Some(2))];
        let lvals = xvariable_list_to_ast_lvals(&xvars, &mut astree).unwrap();
        assert_eq!(lvals.len(), 1);
        assert_eq!(lvals[0].name(), Some("pair"));
    }

    #[test]
    fn test_partial_aggregate_does_not_merge() {
        let mut astree = AstBuilder::new();
        astree.set_formals(pair_formals());
        let xvars = vec![initial_register("R1", Some(1))];
        let lvals = xvariable_list_to_ast_lvals(&xvars, &mut astree).unwrap();
        assert_eq!(lvals.len(), 1);
        assert_eq!(lvals[0].name(), Some("R1_in"));
    }

    #[test]
    fn test_initial_sp_is_base_sp() {
        let mut astree = AstBuilder::new();
        let xvar = initial_register("sp", None);
        let lval = xvariable_to_ast_lval(&xvar, 4, &mut astree).unwrap();
        assert_eq!(lval.name(), Some("base_sp"));
    }

    #[test]
    fn test_stack_passed_argument_index() {
        let mut astree = AstBuilder::new();
        let xvar = XVariable::Auxiliary(AuxVariable::InitialMemoryValue {
            variable: Box::new(XVariable::stack(8)),
        });
        let lval = xvariable_to_ast_lval(&xvar, 4, &mut astree).unwrap();
        // 4 register arguments, then offset 8 is the third stack word
        assert_eq!(lval.name(), Some("arg_6"));
    }

    #[test]
    fn test_return_value_placeholder() {
        let mut astree = AstBuilder::new();
        let xvar = XVariable::Auxiliary(AuxVariable::FunctionReturnValue {
            callsite: "0x3f0c".to_string(),
            calltarget: Some("malloc".to_string()),
        });
        let lval = xvariable_to_ast_lval(&xvar, 4, &mut astree).unwrap();
        assert_eq!(lval.name(), Some("rtn_0x3f0c"));
    }

    fn point_compinfo() -> AstCompInfo {
        AstCompInfo {
            compkey: 7,
            name: "point".to_string(),
            fields: vec![
                AstFieldInfo {
                    name: "x".to_string(),
                    offset: 0,
                    typ: AstTyp::int(4),
                    size: 4,
                },
                AstFieldInfo {
                    name: "y".to_string(),
                    offset: 4,
                    typ: AstTyp::int(4),
                    size: 4,
                },
            ],
        }
    }

    #[test]
    fn test_pointer_to_struct_field_access() {
        let mut astree = AstBuilder::new();
        astree.add_compinfo(point_compinfo());
        let base = initial_register("R0", None);
        astree.set_variable_type(
            "R0_in",
            AstTyp::pointer(AstTyp::Comp {
                compkey: 7,
                name: "point".to_string(),
            }),
        );
        let xvar = crate::xpr::basevar_memory(base, 4, 4);
        let lval = xvariable_to_ast_lval(&xvar, 4, &mut astree).unwrap();
        assert_eq!(lval.to_string(), "(*R0_in).y");
    }

    #[test]
    fn test_unknown_field_offset_is_an_error() {
        let mut astree = AstBuilder::new();
        astree.add_compinfo(point_compinfo());
        let base = initial_register("R0", None);
        astree.set_variable_type(
            "R0_in",
            AstTyp::pointer(AstTyp::Comp {
                compkey: 7,
                name: "point".to_string(),
            }),
        );
        let xvar = crate::xpr::basevar_memory(base, 12, 4);
        assert!(xvariable_to_ast_lval(&xvar, 4, &mut astree).is_err());
    }

    #[test]
    fn test_constant_lowering() {
        let mut astree = AstBuilder::new();
        let x = XXpr::constant(XConstant::word(42));
        let e = xxpr_to_ast_expr(&x, &mut astree, "0x1000").unwrap();
        assert_eq!(e.int_value(), Some(42));
    }

    #[test]
    fn test_byte_mask_selects_first_byte() {
        let mut astree = AstBuilder::new();
        let xvar = XVariable::register("R4");
        astree.set_variable_type(
            "R4",
            AstTyp::Array {
                element: Box::new(AstTyp::int(1)),
                size: Some(4),
            },
        );
        let x = XXpr::binary(
            Operator::Band,
            XXpr::variable(xvar),
            XXpr::int_constant(0xff),
        );
        let e = xxpr_to_ast_expr(&x, &mut astree, "0x1000").unwrap();
        assert_eq!(e.to_string(), "R4[0]");
    }

    #[test]
    fn test_byte_mask_zero_is_zero() {
        let mut astree = AstBuilder::new();
        astree.set_variable_type(
            "R4",
            AstTyp::Array {
                element: Box::new(AstTyp::int(1)),
                size: Some(4),
            },
        );
        let x = XXpr::binary(
            Operator::Band,
            XXpr::variable(XVariable::register("R4")),
            XXpr::int_constant(0),
        );
        let e = xxpr_to_ast_expr(&x, &mut astree, "0x1000").unwrap();
        assert_eq!(e.int_value(), Some(0));
    }

    #[test]
    fn test_field_address_resolution() {
        let mut astree = AstBuilder::new();
        astree.add_compinfo(point_compinfo());
        astree.set_variable_type(
            "R0_in",
            AstTyp::pointer(AstTyp::Comp {
                compkey: 7,
                name: "point".to_string(),
            }),
        );
        let x = XXpr::binary(
            Operator::Plus,
            XXpr::variable(initial_register("R0", None)),
            XXpr::int_constant(4),
        );
        let e = xxpr_to_ast_expr(&x, &mut astree, "0x1000").unwrap();
        assert_eq!(e.to_string(), "&(*R0_in).y");
    }

    #[test]
    fn test_field_address_failure_falls_back_to_arithmetic() {
        let mut astree = AstBuilder::new();
        astree.add_compinfo(point_compinfo());
        astree.set_variable_type(
            "R0_in",
            AstTyp::pointer(AstTyp::Comp {
                compkey: 7,
                name: "point".to_string(),
            }),
        );
        // offset 12 is outside the struct; lowering degrades to plain
        // pointer arithmetic
        let x = XXpr::binary(
            Operator::Plus,
            XXpr::variable(initial_register("R0", None)),
            XXpr::int_constant(12),
        );
        let e = xxpr_to_ast_expr(&x, &mut astree, "0x1000").unwrap();
        assert_eq!(e.to_string(), "(R0_in + 12)");
    }

    #[test]
    fn test_stack_address_lowers_to_address_of() {
        let mut astree = AstBuilder::new();
        let sp_in = XXpr::variable(initial_register("sp", None));
        let x = XXpr::binary(Operator::Minus, sp_in, XXpr::int_constant(16));
        let e = xxpr_to_ast_expr(&x, &mut astree, "0x1000").unwrap();
        assert_eq!(e.to_string(), "&localvar_16");
    }
}
