//! A single decoded instruction.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::app::xdata::InstrXData;
use crate::ast::{AstBuilder, AstInstruction};
use crate::error::Error;
use crate::opcodes::Opcode;
use crate::sim::SimState;

/// An immutable decoded instruction: its (possibly mode-prefixed) address,
/// its raw byte encoding, the decoded opcode, and the semantic-effect
/// record produced by analysis.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Instruction {
    iaddr: String,
    bytes: Vec<u8>,
    opcode: Opcode,
    xdata: InstrXData,
}

impl Instruction {
    pub fn new(
        iaddr: String,
        bytes: Vec<u8>,
        opcode: Opcode,
        xdata: InstrXData,
    ) -> Instruction {
        Instruction {
            iaddr,
            bytes,
            opcode,
            xdata,
        }
    }

    pub fn iaddr(&self) -> &str {
        &self.iaddr
    }

    /// The numeric address with any instruction-set-mode prefix stripped.
    pub fn real_iaddr(&self) -> &str {
        super::real_address(&self.iaddr)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The byte encoding as a lowercase hex string.
    pub fn bytestring(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn opcode(&self) -> &Opcode {
        &self.opcode
    }

    pub fn xdata(&self) -> &InstrXData {
        &self.xdata
    }

    pub fn mnemonic(&self) -> &str {
        self.opcode.mnemonic()
    }

    /// Content hash of the byte encoding.
    pub fn md5(&self) -> String {
        format!("{:x}", md5::compute(self.bytestring().as_bytes()))
    }

    /// Content hash of the byte-reversed encoding, for comparison against
    /// an opposite-endianness binary.
    pub fn rev_md5(&self) -> String {
        let reversed: String = self
            .bytes
            .iter()
            .rev()
            .map(|b| format!("{:02x}", b))
            .collect();
        format!("{:x}", md5::compute(reversed.as_bytes()))
    }

    /// Human-readable rendering of the instruction's semantics.
    pub fn annotation(&self) -> String {
        self.opcode.annotation(&self.xdata)
    }

    pub fn is_load_instruction(&self) -> bool {
        self.opcode.is_load(&self.xdata)
    }

    pub fn is_store_instruction(&self) -> bool {
        self.opcode.is_store(&self.xdata)
    }

    pub fn is_call_instruction(&self) -> bool {
        self.opcode.is_call(&self.xdata)
    }

    pub fn is_jump_instruction(&self) -> bool {
        self.opcode.is_jump(&self.xdata)
    }

    pub fn is_return_instruction(&self) -> bool {
        self.opcode.is_return(&self.xdata)
    }

    /// The name of the called function, for resolved call instructions.
    pub fn call_target(&self) -> Option<&str> {
        self.xdata.call_target()
    }

    /// The string literal loaded by this instruction, if the analysis
    /// resolved one.
    pub fn string_pointer_loaded(&self) -> Option<&(String, String)> {
        self.xdata.string_loaded()
    }

    /// Lower this instruction to AST form: a high-level statement list over
    /// symbolic variables and a low-level statement list faithful to the
    /// architectural side effects.
    pub fn ast_prov(
        &self,
        astree: &mut AstBuilder,
    ) -> Result<(Vec<AstInstruction>, Vec<AstInstruction>), Error> {
        self.opcode
            .ast_prov(astree, &self.iaddr, &self.bytes, &self.xdata)
    }

    /// Advance `state` by this instruction's concrete effect.
    pub fn simulate(&self, state: &mut dyn SimState) -> Result<String, Error> {
        self.opcode.simulate(&self.iaddr, state)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}  {}  {}", self.iaddr, self.mnemonic(), self.annotation())
    }
}
