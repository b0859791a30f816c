//! Binary-pair comparison.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use log::{debug, warn};

use crate::app::{format_address, App};
use crate::relational::callgraph_matcher::match_callgraphs;
use crate::relational::function::FunctionRelationalAnalysis;

/// Comparison of two versions of the same binary.
///
/// The function correspondence is resolved by the first applicable of
/// three strategies: a user-supplied mapping is taken verbatim; equal-size
/// function lists are paired by address with the leftovers paired
/// positionally in address order; anything else goes through the call
/// graph matcher.
pub struct RelationalAnalysis<'a> {
    app1: &'a App,
    app2: &'a App,
    usermapping: BTreeMap<u64, u64>,
    /// When non-empty, reports restrict instruction detail to calls of
    /// these functions.
    callees: Vec<String>,
    function_mapping: OnceCell<BTreeMap<u64, u64>>,
    fn_analyses: OnceCell<BTreeMap<u64, FunctionRelationalAnalysis<'a>>>,
}

impl<'a> RelationalAnalysis<'a> {
    pub fn new(
        app1: &'a App,
        app2: &'a App,
        usermapping: BTreeMap<u64, u64>,
    ) -> RelationalAnalysis<'a> {
        RelationalAnalysis {
            app1,
            app2,
            usermapping,
            callees: Vec::new(),
            function_mapping: OnceCell::new(),
            fn_analyses: OnceCell::new(),
        }
    }

    pub fn with_callees(mut self, callees: Vec<String>) -> RelationalAnalysis<'a> {
        self.callees = callees;
        self
    }

    pub fn callees(&self) -> &[String] {
        &self.callees
    }

    pub fn app1(&self) -> &App {
        self.app1
    }

    pub fn app2(&self) -> &App {
        self.app2
    }

    /// The two versions differ in byte order; all content hashes on the
    /// second side are computed over byte-reversed encodings.
    pub fn endian_mismatch(&self) -> bool {
        self.app1.is_big_endian() != self.app2.is_big_endian()
    }

    /// Function addresses of version 1 mapped to function addresses of
    /// version 2, computed once.
    pub fn function_mapping(&self) -> &BTreeMap<u64, u64> {
        self.function_mapping
            .get_or_init(|| self.resolve_function_mapping())
    }

    fn resolve_function_mapping(&self) -> BTreeMap<u64, u64> {
        if !self.usermapping.is_empty() {
            debug!(
                "function mapping: {} user-supplied pairs",
                self.usermapping.len()
            );
            return self.usermapping.clone();
        }
        let addrs1 = self.app1.function_addresses();
        let addrs2 = self.app2.function_addresses();
        if addrs1.len() == addrs2.len() {
            debug!("function mapping: equal-size function lists");
            let mut mapping: BTreeMap<u64, u64> = BTreeMap::new();
            let mut leftover1: Vec<u64> = Vec::new();
            for addr in &addrs1 {
                if addrs2.binary_search(addr).is_ok() {
                    mapping.insert(*addr, *addr);
                } else {
                    leftover1.push(*addr);
                }
            }
            let leftover2: Vec<u64> = addrs2
                .iter()
                .filter(|a| addrs1.binary_search(a).is_err())
                .copied()
                .collect();
            // equal totals: the leftovers pair up positionally
            for (a1, a2) in leftover1.into_iter().zip(leftover2) {
                mapping.insert(a1, a2);
            }
            return mapping;
        }
        debug!("function mapping: falling back to the call graph matcher");
        match_callgraphs(self.app1, self.app2, &self.usermapping)
    }

    /// Per-pair function analyses, keyed by the version-1 address.
    pub fn fn_analyses(&self) -> &BTreeMap<u64, FunctionRelationalAnalysis<'a>> {
        self.fn_analyses.get_or_init(|| {
            let endian_mismatch = self.endian_mismatch();
            self.function_mapping()
                .iter()
                .filter_map(|(a1, a2)| {
                    match (self.app1.function(*a1), self.app2.function(*a2)) {
                        (Some(f1), Some(f2)) => Some((
                            *a1,
                            FunctionRelationalAnalysis::new(f1, f2, endian_mismatch),
                        )),
                        _ => None,
                    }
                })
                .collect()
        })
    }

    pub fn function_analysis(&self, faddr: u64) -> Option<&FunctionRelationalAnalysis<'a>> {
        self.fn_analyses().get(&faddr)
    }

    /// Version-1 addresses of functions that moved or whose content
    /// differs, ascending.
    pub fn functions_changed(&self) -> Vec<u64> {
        let md5s1 = self.app1.function_md5s();
        let md5s2 = self.app2.function_md5s();
        let endian_mismatch = self.endian_mismatch();
        let mut changed = Vec::new();
        for (faddr, fra) in self.fn_analyses() {
            if fra.is_changed() || fra.moved() {
                changed.push(*faddr);
            } else if !endian_mismatch {
                // cross-check against the flat hash snapshots
                let m1 = md5s1.get(&format_address(*faddr));
                let m2 = self
                    .function_mapping()
                    .get(faddr)
                    .and_then(|a2| md5s2.get(&format_address(*a2)));
                if let (Some(m1), Some(m2)) = (m1, m2) {
                    if m1 != m2 {
                        warn!(
                            "function {} compares equal but its hash snapshots disagree",
                            format_address(*faddr)
                        );
                        changed.push(*faddr);
                    }
                }
            }
        }
        changed
    }

    /// Version-2 addresses of functions with no counterpart in version 1.
    pub fn functions_added(&self) -> Vec<u64> {
        let mapped2: std::collections::BTreeSet<u64> =
            self.function_mapping().values().copied().collect();
        self.app2
            .function_addresses()
            .into_iter()
            .filter(|a| !mapped2.contains(a))
            .collect()
    }

    /// Version-1 addresses of functions with no counterpart in version 2.
    pub fn functions_removed(&self) -> Vec<u64> {
        let mapping = self.function_mapping();
        self.app1
            .function_addresses()
            .into_iter()
            .filter(|a| !mapping.contains_key(a))
            .collect()
    }

    pub fn is_changed(&self) -> bool {
        !self.functions_changed().is_empty()
            || !self.functions_added().is_empty()
            || !self.functions_removed().is_empty()
    }

    /// Display names for version-1 functions: the symbol name when known,
    /// otherwise the address.
    pub fn function_names(&self) -> BTreeMap<u64, String> {
        self.app1
            .function_addresses()
            .into_iter()
            .map(|a| {
                let name = self
                    .app1
                    .function_name(a)
                    .unwrap_or_else(|| format_address(a));
                (a, name)
            })
            .collect()
    }

    /// Plain-text function comparison table: one line per mapped pair,
    /// followed by the added and removed functions. When a callee
    /// restriction is set, changed calls to those functions are listed
    /// under their caller.
    pub fn report(&self) -> String {
        let names = self.function_names();
        let mut lines = vec![format!("{} vs {}", self.app1.name(), self.app2.name())];
        for (faddr, fra) in self.fn_analyses() {
            let status = if fra.is_changed() {
                "changed"
            } else if fra.moved() {
                "moved"
            } else {
                "unchanged"
            };
            let name = names
                .get(faddr)
                .cloned()
                .unwrap_or_else(|| format_address(*faddr));
            lines.push(format!(
                "  {:>12} -> {:<12} {:<10} {}",
                format_address(*faddr),
                fra.fn2().faddr(),
                status,
                name
            ));
            if !self.callees.is_empty() && fra.is_changed() {
                for bra in fra.block_analyses() {
                    for ira in bra.instr_analyses() {
                        if ira.calls_function(&self.callees) && ira.is_changed() {
                            lines.push(format!(
                                "    {}  {}",
                                ira.instr1().iaddr(),
                                ira.instr1().annotation()
                            ));
                        }
                    }
                }
            }
        }
        for faddr in self.functions_added() {
            lines.push(format!("  {:>12}    added", format_address(faddr)));
        }
        for faddr in self.functions_removed() {
            lines.push(format!("  {:>12}    removed", format_address(faddr)));
        }
        lines.join("\n")
    }
}
