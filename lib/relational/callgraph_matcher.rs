//! Binary-level function matching through the call graphs.
//!
//! Used when the function lists of the two versions cannot be paired
//! directly. Matches are seeded from the user-supplied mapping, functions
//! at identical addresses, and content hashes unique on both sides, then
//! propagated along call edges to a fixpoint: when a matched pair has
//! exactly one unmatched callee (or caller) on each side, those
//! correspond too.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::app::App;

/// Match the functions of two binary versions. Returns the function-address
/// mapping, version 1 to version 2.
pub fn match_callgraphs(
    app1: &App,
    app2: &App,
    usermapping: &BTreeMap<u64, u64>,
) -> BTreeMap<u64, u64> {
    let endian_mismatch = app1.is_big_endian() != app2.is_big_endian();
    let mut mapping: BTreeMap<u64, u64> = BTreeMap::new();
    let mut matched2: BTreeSet<u64> = BTreeSet::new();

    // the user-supplied mapping is authoritative
    for (a1, a2) in usermapping {
        if app1.has_function(*a1) && app2.has_function(*a2) {
            mapping.insert(*a1, *a2);
            matched2.insert(*a2);
        }
    }

    // functions that stayed at the same address
    for addr in app1.function_addresses() {
        if !mapping.contains_key(&addr) && !matched2.contains(&addr) && app2.has_function(addr) {
            mapping.insert(addr, addr);
            matched2.insert(addr);
        }
    }

    // content hashes unique on both sides
    let md5s1 = md5_index(app1, false, |a| mapping.contains_key(&a));
    let md5s2 = md5_index(app2, endian_mismatch, |a| matched2.contains(&a));
    for (md5, addrs1) in &md5s1 {
        if let (1, Some(addrs2)) = (addrs1.len(), md5s2.get(md5)) {
            if addrs2.len() == 1 {
                debug!(
                    "callgraph matcher: 0x{:x} -> 0x{:x} via unique content hash",
                    addrs1[0], addrs2[0]
                );
                mapping.insert(addrs1[0], addrs2[0]);
                matched2.insert(addrs2[0]);
            }
        }
    }

    // propagate along call edges to a fixpoint
    let names1 = name_index(app1);
    let names2 = name_index(app2);
    loop {
        let mut changed = false;
        let pairs: Vec<(u64, u64)> = mapping.iter().map(|(a, b)| (*a, *b)).collect();
        for (a, b) in pairs {
            for forward in [true, false] {
                let cand1 = sole_unmatched_neighbor(app1, &names1, a, forward, |x| {
                    mapping.contains_key(&x)
                });
                let cand2 = sole_unmatched_neighbor(app2, &names2, b, forward, |x| {
                    matched2.contains(&x)
                });
                if let (Some(n1), Some(n2)) = (cand1, cand2) {
                    if !mapping.contains_key(&n1) && !matched2.contains(&n2) {
                        debug!(
                            "callgraph matcher: 0x{:x} -> 0x{:x} via call-edge propagation",
                            n1, n2
                        );
                        mapping.insert(n1, n2);
                        matched2.insert(n2);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    mapping
}

fn md5_index<F>(app: &App, reversed: bool, is_matched: F) -> BTreeMap<String, Vec<u64>>
where
    F: Fn(u64) -> bool,
{
    let mut index: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for addr in app.function_addresses() {
        if is_matched(addr) {
            continue;
        }
        if let Some(f) = app.function(addr) {
            let md5 = if reversed { f.rev_md5() } else { f.md5() };
            index.entry(md5).or_default().push(addr);
        }
    }
    index
}

/// Callgraph node name to function address, for every application function.
fn name_index(app: &App) -> BTreeMap<String, u64> {
    app.function_addresses()
        .into_iter()
        .filter_map(|addr| app.function_name(addr).map(|name| (name, addr)))
        .collect()
}

/// The single unmatched application-function callee (or caller) of a
/// function, if there is exactly one. External targets with no function
/// body are ignored.
fn sole_unmatched_neighbor<F>(
    app: &App,
    names: &BTreeMap<String, u64>,
    addr: u64,
    forward: bool,
    is_matched: F,
) -> Option<u64>
where
    F: Fn(u64) -> bool,
{
    let name = app.function_name(addr)?;
    let neighbors = if forward {
        app.callgraph().callees(&name)
    } else {
        app.callgraph().callers(&name)
    };
    let mut unmatched = neighbors
        .into_iter()
        .filter_map(|n| names.get(n).copied())
        .filter(|n| !is_matched(*n));
    match (unmatched.next(), unmatched.next()) {
        (Some(n), None) => Some(n),
        _ => None,
    }
}
