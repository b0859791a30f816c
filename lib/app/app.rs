//! The container for one loaded binary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::app::callgraph::Callgraph;
use crate::app::function::Function;
use crate::error::Error;

/// One analyzed binary: its functions keyed by numeric entry address, the
/// symbol names known for them, and the call graph derived from resolved
/// call instructions.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct App {
    name: String,
    big_endian: bool,
    functions: BTreeMap<u64, Function>,
    function_names: BTreeMap<u64, String>,
    callgraph: Callgraph,
}

impl App {
    pub fn new<S: Into<String>>(name: S, big_endian: bool) -> App {
        App {
            name: name.into(),
            big_endian,
            functions: BTreeMap::new(),
            function_names: BTreeMap::new(),
            callgraph: Callgraph::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Register a function, extending the call graph with its resolved
    /// call targets.
    pub fn add_function(&mut self, function: Function) -> Result<(), Error> {
        let faddr = super::parse_address(function.faddr())?;
        let caller = match self.function_names.get(&faddr) {
            Some(name) => name.clone(),
            None => {
                let name = super::format_address(faddr);
                self.function_names.insert(faddr, name.clone());
                name
            }
        };
        self.callgraph.add_node(&caller)?;
        for target in function.call_targets() {
            self.callgraph.add_call(&caller, target)?;
        }
        self.functions.insert(faddr, function);
        Ok(())
    }

    /// Record the symbol name of a function.
    pub fn set_function_name(&mut self, faddr: u64, name: &str) {
        self.function_names.insert(faddr, name.to_string());
    }

    /// The symbol name of a function, if one is known.
    pub fn function_name(&self, faddr: u64) -> Option<String> {
        self.function_names.get(&faddr).cloned()
    }

    pub fn has_function(&self, faddr: u64) -> bool {
        self.functions.contains_key(&faddr)
    }

    pub fn function(&self, faddr: u64) -> Option<&Function> {
        self.functions.get(&faddr)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Numeric function addresses, ascending and deduplicated.
    pub fn function_addresses(&self) -> Vec<u64> {
        self.functions.keys().copied().collect()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn callgraph(&self) -> &Callgraph {
        &self.callgraph
    }

    /// Flat content-hash snapshot: function address to md5 of its
    /// instruction encodings.
    pub fn function_md5s(&self) -> BTreeMap<String, String> {
        self.functions
            .iter()
            .map(|(faddr, f)| (super::format_address(*faddr), f.md5()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::block::BasicBlock;
    use crate::app::instruction::Instruction;
    use crate::app::xdata::InstrXData;
    use crate::opcodes::Opcode;

    fn leaf_function(faddr: &str, byte: u8) -> Function {
        let block = BasicBlock::new(
            faddr.to_string(),
            vec![Instruction::new(
                faddr.to_string(),
                vec![byte],
                Opcode::unknown("test"),
                InstrXData::default(),
            )],
        )
        .unwrap();
        Function::new(faddr.to_string(), vec![block], vec![]).unwrap()
    }

    #[test]
    fn test_add_function_and_lookup() {
        let mut app = App::new("v1", false);
        app.add_function(leaf_function("0x1000", 1)).unwrap();
        app.add_function(leaf_function("0x2000", 2)).unwrap();
        assert_eq!(app.function_count(), 2);
        assert!(app.has_function(0x1000));
        assert_eq!(app.function_addresses(), vec![0x1000, 0x2000]);
        assert!(app.callgraph().has_node("0x1000"));
    }

    #[test]
    fn test_function_md5s_snapshot() {
        let mut app = App::new("v1", false);
        app.add_function(leaf_function("0x1000", 1)).unwrap();
        let md5s = app.function_md5s();
        assert_eq!(md5s.len(), 1);
        assert_eq!(
            md5s.get("0x1000").map(String::as_str),
            Some(format!("{:x}", md5::compute("01".as_bytes())).as_str())
        );
    }
}
