//! The decoded-artifact data model.
//!
//! Kestrel consumes binaries that have already been disassembled into
//! indexed artifacts: an interned operand dictionary per architecture and
//! one decoded opcode record per instruction. This module holds the
//! in-memory view of such an artifact: instructions, basic blocks,
//! functions, control flow graphs, the call graph, and the `App` container
//! for one loaded binary.

pub mod app;
pub mod block;
pub mod callgraph;
pub mod cfg;
pub mod function;
pub mod instruction;
pub mod operand;
pub mod xdata;

pub use self::app::App;
pub use self::block::BasicBlock;
pub use self::callgraph::Callgraph;
pub use self::cfg::Cfg;
pub use self::function::Function;
pub use self::instruction::Instruction;
pub use self::operand::{IndexedRecord, Operand, OperandDict};
pub use self::xdata::{DefXref, InstrXData};

use crate::Error;

/// Strip an instruction-set-mode prefix tag from an address.
///
/// Block and instruction addresses may carry a mode prefix of the form
/// `F<tag>_0x...` (e.g. Thumb blocks inlined from another function); the
/// numeric address is the part after the last underscore.
pub fn real_address(addr: &str) -> &str {
    if addr.starts_with('F') {
        addr.rsplit('_').next().unwrap_or(addr)
    } else {
        addr
    }
}

/// Parse a (possibly mode-prefixed) hexadecimal address string.
pub fn parse_address(addr: &str) -> Result<u64, Error> {
    let real = real_address(addr);
    let digits = real.strip_prefix("0x").unwrap_or(real);
    u64::from_str_radix(digits, 16).map_err(|_| Error::AddressParse(addr.to_string()))
}

/// Format a numeric address the way artifact addresses are written.
pub fn format_address(addr: u64) -> String {
    format!("0x{:x}", addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_address_strips_mode_prefix() {
        assert_eq!(real_address("F68_0x3f0c"), "0x3f0c");
        assert_eq!(real_address("0x3f0c"), "0x3f0c");
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x3f0c").unwrap(), 0x3f0c);
        assert_eq!(parse_address("F68_0x3f0c").unwrap(), 0x3f0c);
        assert!(parse_address("not-an-address").is_err());
    }

    #[test]
    fn test_format_address_round_trips() {
        assert_eq!(format_address(0x11d0), "0x11d0");
        assert_eq!(parse_address(&format_address(0x11d0)).unwrap(), 0x11d0);
    }
}
