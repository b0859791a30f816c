//! The AST builder: node constructors, symbol tables, and provenance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Error;

use super::nodes::{
    AstBinaryOp, AstExpr, AstInstruction, AstLhost, AstLval, AstOffset, AstUnaryOp,
};
use super::types::{AstCompInfo, AstFormal, AstTyp, VarInfo};

/// Constructs AST nodes with unique ids and records the bookkeeping that
/// links high-level output to its low-level counterpart: instruction
/// correspondence, expression and lvalue correspondence, reaching
/// definitions, and def-use chains.
///
/// The builder also owns the symbol tables lowering consults: declared
/// globals by address, composite-type layouts by key, the formal
/// parameters of the function being lowered, and declared types for base
/// variables and call-target return values.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AstBuilder {
    id_counter: usize,
    tmp_counter: usize,

    globals: BTreeMap<u64, VarInfo>,
    compinfos: BTreeMap<usize, AstCompInfo>,
    formals: Vec<AstFormal>,
    variable_types: BTreeMap<String, AstTyp>,
    return_types: BTreeMap<String, AstTyp>,

    instr_mapping: BTreeMap<usize, usize>,
    instr_addresses: BTreeMap<usize, Vec<String>>,
    expr_mapping: BTreeMap<usize, usize>,
    lval_mapping: BTreeMap<usize, usize>,
    expr_reachingdefs: BTreeMap<usize, Vec<String>>,
    lval_defuses: BTreeMap<usize, Vec<String>>,
    lval_defuses_high: BTreeMap<usize, Vec<String>>,
}

impl AstBuilder {
    pub fn new() -> AstBuilder {
        AstBuilder::default()
    }

    fn next_id(&mut self) -> usize {
        let id = self.id_counter;
        self.id_counter += 1;
        id
    }

    // --- symbol tables -------------------------------------------------

    pub fn add_global(&mut self, addr: u64, varinfo: VarInfo) {
        self.globals.insert(addr, varinfo);
    }

    pub fn global_at(&self, addr: u64) -> Option<&VarInfo> {
        self.globals.get(&addr)
    }

    pub fn add_compinfo(&mut self, compinfo: AstCompInfo) {
        self.compinfos.insert(compinfo.compkey, compinfo);
    }

    pub fn compinfo(&self, compkey: usize) -> Result<&AstCompInfo, Error> {
        self.compinfos
            .get(&compkey)
            .ok_or_else(|| Error::Custom(format!("unknown struct key {}", compkey)))
    }

    pub fn set_formals(&mut self, formals: Vec<AstFormal>) {
        self.formals = formals;
    }

    pub fn formals(&self) -> &[AstFormal] {
        &self.formals
    }

    /// The formal occupying argument location `argindex`, with the index
    /// of that location within the formal's storage locations.
    pub fn formal_with_argindex(&self, argindex: usize) -> Option<(&AstFormal, usize)> {
        self.formals
            .iter()
            .find_map(|f| f.locindex(argindex).map(|loc| (f, loc)))
    }

    /// Declare the static type of a named base variable.
    pub fn set_variable_type(&mut self, name: &str, typ: AstTyp) {
        self.variable_types.insert(name.to_string(), typ);
    }

    pub fn variable_type(&self, name: &str) -> Option<&AstTyp> {
        self.variable_types.get(name)
    }

    /// Declare the return type of a named call target.
    pub fn set_return_type(&mut self, name: &str, typ: AstTyp) {
        self.return_types.insert(name.to_string(), typ);
    }

    pub fn return_type(&self, name: &str) -> Option<&AstTyp> {
        self.return_types.get(name)
    }

    // --- node constructors ---------------------------------------------

    pub fn mk_integer_constant(&mut self, value: i64) -> AstExpr {
        AstExpr::IntConstant {
            id: self.next_id(),
            value,
        }
    }

    pub fn mk_lval(&mut self, host: AstLhost, offset: AstOffset) -> AstLval {
        AstLval {
            id: self.next_id(),
            host,
            offset,
        }
    }

    /// A named variable lvalue with no offset.
    pub fn mk_named_lval(&mut self, name: &str) -> AstLval {
        self.mk_lval(
            AstLhost::Variable {
                name: name.to_string(),
            },
            AstOffset::NoOffset,
        )
    }

    /// A named variable lvalue with the given offset path.
    pub fn mk_named_lval_with_offset(&mut self, name: &str, offset: AstOffset) -> AstLval {
        self.mk_lval(
            AstLhost::Variable {
                name: name.to_string(),
            },
            offset,
        )
    }

    /// A register-binding lvalue; the name is architecture-qualified.
    pub fn mk_register_variable_lval(&mut self, name: &str) -> AstLval {
        self.mk_named_lval(name)
    }

    /// A fresh synthetic local, used for temporaries with no denotation.
    pub fn mk_temp_lval(&mut self) -> AstLval {
        let n = self.tmp_counter;
        self.tmp_counter += 1;
        self.mk_named_lval(&format!("asttmp_{}", n))
    }

    /// A stack-slot lvalue at a byte offset from the frame base. `size` is
    /// the access size in bytes.
    pub fn mk_stack_variable_lval(&mut self, offset: i64, size: usize) -> AstLval {
        let name = if offset < 0 {
            format!("localvar_{}", -offset)
        } else {
            format!("stackvar_{}", offset)
        };
        let name = if size == 1 {
            format!("{}b", name)
        } else {
            name
        };
        self.mk_named_lval(&name)
    }

    /// A memory dereference lvalue `*(expr)` with the given offset path.
    pub fn mk_memref_lval(&mut self, expr: AstExpr, offset: AstOffset) -> AstLval {
        self.mk_lval(
            AstLhost::MemRef {
                expr: Box::new(expr),
            },
            offset,
        )
    }

    pub fn mk_field_offset(
        &self,
        fieldname: &str,
        compkey: usize,
        rest: AstOffset,
    ) -> AstOffset {
        AstOffset::Field {
            fieldname: fieldname.to_string(),
            compkey,
            rest: Box::new(rest),
        }
    }

    pub fn mk_scalar_index_offset(&mut self, index: i64, rest: AstOffset) -> AstOffset {
        let index = self.mk_integer_constant(index);
        AstOffset::Index {
            index: Box::new(index),
            rest: Box::new(rest),
        }
    }

    pub fn mk_lval_expr(&mut self, lval: AstLval) -> AstExpr {
        AstExpr::LvalExpr {
            id: self.next_id(),
            lval,
        }
    }

    pub fn mk_address_of(&mut self, lval: AstLval) -> AstExpr {
        AstExpr::AddressOf {
            id: self.next_id(),
            lval,
        }
    }

    pub fn mk_unary_op(&mut self, op: AstUnaryOp, operand: AstExpr) -> AstExpr {
        AstExpr::Unary {
            id: self.next_id(),
            op,
            operand: Box::new(operand),
        }
    }

    pub fn mk_binary_op(&mut self, op: AstBinaryOp, lhs: AstExpr, rhs: AstExpr) -> AstExpr {
        AstExpr::Binary {
            id: self.next_id(),
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn mk_assign(&mut self, iaddr: &str, lhs: AstLval, rhs: AstExpr) -> AstInstruction {
        AstInstruction::Assign {
            id: self.next_id(),
            lhs,
            rhs,
            iaddr: iaddr.to_string(),
        }
    }

    pub fn mk_call(
        &mut self,
        iaddr: &str,
        lhs: Option<AstLval>,
        target: &str,
        args: Vec<AstExpr>,
    ) -> AstInstruction {
        AstInstruction::Call {
            id: self.next_id(),
            lhs,
            target: target.to_string(),
            args,
            iaddr: iaddr.to_string(),
        }
    }

    // --- provenance ----------------------------------------------------

    /// Link a high-level instruction to its low-level counterpart.
    pub fn add_instr_mapping(&mut self, hl: &AstInstruction, ll: &AstInstruction) {
        self.instr_mapping.insert(hl.id(), ll.id());
    }

    /// Record the instruction address(es) an AST instruction covers.
    pub fn add_instr_address(&mut self, instr: &AstInstruction, addresses: Vec<String>) {
        self.instr_addresses.insert(instr.id(), addresses);
    }

    /// Link a high-level expression to its low-level counterpart.
    pub fn add_expr_mapping(&mut self, hl: &AstExpr, ll: &AstExpr) {
        self.expr_mapping.insert(hl.id(), ll.id());
    }

    /// Link a high-level lvalue to its low-level counterpart.
    pub fn add_lval_mapping(&mut self, hl: &AstLval, ll: &AstLval) {
        self.lval_mapping.insert(hl.id, ll.id);
    }

    /// Attach reaching-definition addresses to an expression.
    pub fn add_expr_reachingdefs(&mut self, expr: &AstExpr, addresses: Vec<String>) {
        if !addresses.is_empty() {
            self.expr_reachingdefs.insert(expr.id(), addresses);
        }
    }

    /// Attach def-use addresses to a written lvalue.
    pub fn add_lval_defuses(&mut self, lval: &AstLval, addresses: Vec<String>) {
        if !addresses.is_empty() {
            self.lval_defuses.insert(lval.id, addresses);
        }
    }

    /// Attach high-level-only def-use addresses to a written lvalue.
    pub fn add_lval_defuses_high(&mut self, lval: &AstLval, addresses: Vec<String>) {
        if !addresses.is_empty() {
            self.lval_defuses_high.insert(lval.id, addresses);
        }
    }

    pub fn instr_mapping(&self) -> &BTreeMap<usize, usize> {
        &self.instr_mapping
    }

    pub fn instr_addresses(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.instr_addresses
    }

    pub fn expr_mapping(&self) -> &BTreeMap<usize, usize> {
        &self.expr_mapping
    }

    pub fn lval_mapping(&self) -> &BTreeMap<usize, usize> {
        &self.lval_mapping
    }

    pub fn expr_reachingdefs(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.expr_reachingdefs
    }

    pub fn lval_defuses(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.lval_defuses
    }

    pub fn lval_defuses_high(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.lval_defuses_high
    }
}
