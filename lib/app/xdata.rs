//! The structured semantic payload attached to each instruction.
//!
//! When an opcode's semantics are resolved against the dataflow facts of
//! the enclosing function, the result is an `InstrXData` record: the
//! ordered variables written, the ordered expressions read, and the
//! provenance of each (reaching definitions for reads, def-use chains for
//! writes). Positions within `vars` and `xprs` are a per-mnemonic contract;
//! typed accessor wrappers in the opcode modules validate them at
//! construction time.

use serde::{Deserialize, Serialize};

use crate::xpr::{XVariable, XXpr};

/// A reference from a use site to the definition(s) that reach it, or from
/// a definition to its use sites. Each entry names an instruction address.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DefXref {
    addresses: Vec<String>,
}

impl DefXref {
    pub fn new(addresses: Vec<String>) -> DefXref {
        DefXref { addresses }
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// The semantic-effect record of one instruction.
///
/// `ok` is false when an upstream analysis could not resolve all required
/// facts; such "error value" records still carry tags but their vars and
/// xprs must not be trusted. High-level lowering skips them; low-level
/// lowering and annotation proceed from the raw operands.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct InstrXData {
    tags: Vec<String>,
    vars: Vec<XVariable>,
    xprs: Vec<XXpr>,
    reachingdefs: Vec<DefXref>,
    defuses: Vec<DefXref>,
    defuseshigh: Vec<DefXref>,
    /// Guard of a conditionally executed instruction, when resolved.
    instruction_condition: Option<XXpr>,
    /// Set when the instruction is guarded but the guard could not be
    /// resolved.
    unknown_condition: bool,
    /// Base-register update of an auto-incrementing memory operand.
    base_update: Option<(XVariable, XXpr)>,
    /// Resolved call target name, for call instructions.
    call_target: Option<String>,
    /// (string value, source address) when the instruction loads the
    /// address of a string literal.
    string_loaded: Option<(String, String)>,
    ok: bool,
}

impl InstrXData {
    pub fn new(
        tags: Vec<String>,
        vars: Vec<XVariable>,
        xprs: Vec<XXpr>,
    ) -> InstrXData {
        InstrXData {
            tags,
            vars,
            xprs,
            ok: true,
            ..Default::default()
        }
    }

    /// An error-value record: the analysis could not produce semantics for
    /// this instruction.
    pub fn error_value(tags: Vec<String>) -> InstrXData {
        InstrXData {
            tags,
            ok: false,
            ..Default::default()
        }
    }

    pub fn with_reachingdefs(mut self, reachingdefs: Vec<DefXref>) -> InstrXData {
        self.reachingdefs = reachingdefs;
        self
    }

    pub fn with_defuses(mut self, defuses: Vec<DefXref>) -> InstrXData {
        self.defuses = defuses;
        self
    }

    pub fn with_defuses_high(mut self, defuseshigh: Vec<DefXref>) -> InstrXData {
        self.defuseshigh = defuseshigh;
        self
    }

    pub fn with_condition(mut self, condition: XXpr) -> InstrXData {
        self.instruction_condition = Some(condition);
        self
    }

    pub fn with_unknown_condition(mut self) -> InstrXData {
        self.unknown_condition = true;
        self
    }

    pub fn with_base_update(mut self, lhs: XVariable, rhs: XXpr) -> InstrXData {
        self.base_update = Some((lhs, rhs));
        self
    }

    pub fn with_call_target<S: Into<String>>(mut self, target: S) -> InstrXData {
        self.call_target = Some(target.into());
        self
    }

    pub fn with_string_loaded<S: Into<String>>(mut self, s: S, addr: S) -> InstrXData {
        self.string_loaded = Some((s.into(), addr.into()));
        self
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn vars(&self) -> &[XVariable] {
        &self.vars
    }

    pub fn xprs(&self) -> &[XXpr] {
        &self.xprs
    }

    pub fn var(&self, index: usize) -> Option<&XVariable> {
        self.vars.get(index)
    }

    pub fn xpr(&self, index: usize) -> Option<&XXpr> {
        self.xprs.get(index)
    }

    pub fn reachingdefs(&self) -> &[DefXref] {
        &self.reachingdefs
    }

    pub fn defuses(&self) -> &[DefXref] {
        &self.defuses
    }

    pub fn defuses_high(&self) -> &[DefXref] {
        &self.defuseshigh
    }

    /// The guard of a conditionally executed instruction.
    pub fn instruction_condition(&self) -> Option<&XXpr> {
        self.instruction_condition.as_ref()
    }

    /// True if the instruction is guarded but the guard is unresolved.
    pub fn has_unknown_condition(&self) -> bool {
        self.unknown_condition
    }

    pub fn has_condition(&self) -> bool {
        self.instruction_condition.is_some() || self.unknown_condition
    }

    pub fn base_update(&self) -> Option<&(XVariable, XXpr)> {
        self.base_update.as_ref()
    }

    pub fn call_target(&self) -> Option<&str> {
        self.call_target.as_deref()
    }

    /// The string literal whose address this instruction loads, if any.
    pub fn string_loaded(&self) -> Option<&(String, String)> {
        self.string_loaded.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpr::XVariable;

    #[test]
    fn test_error_value_is_not_ok() {
        let xdata = InstrXData::error_value(vec!["a:".to_string()]);
        assert!(!xdata.is_ok());
        assert!(xdata.vars().is_empty());
    }

    #[test]
    fn test_positions_are_preserved() {
        let xdata = InstrXData::new(
            vec!["a:vxx".to_string()],
            vec![XVariable::register("R0")],
            vec![
                XXpr::variable(XVariable::register("R1")),
                XXpr::int_constant(4),
            ],
        );
        assert!(xdata.is_ok());
        assert_eq!(xdata.var(0), Some(&XVariable::register("R0")));
        assert_eq!(xdata.xpr(1), Some(&XXpr::int_constant(4)));
        assert_eq!(xdata.xpr(2), None);
    }

    #[test]
    fn test_condition_states() {
        let base = InstrXData::new(vec!["a:".to_string()], vec![], vec![]);
        assert!(!base.has_condition());
        let unknown = base.clone().with_unknown_condition();
        assert!(unknown.has_condition());
        assert!(unknown.has_unknown_condition());
        assert!(unknown.instruction_condition().is_none());
    }
}
