//! WCEC and RWCEC computation.
//!
//! Folds the assembly-derived per-line instruction costs into each node's
//! raw WCEC, then propagates RWCEC bottom-up along the worst (highest-cost)
//! path to each function's `END`, finally patching loop-body nodes to
//! reflect the loop's settled per-iteration cost.
//!
//! `AnalyzerSession::effective_wcec`/`refnode_rwcec`/`effective_loop_iters`
//! quietly forward through `PSEUDO`/`CALL` rather than reporting the node's
//! own raw field — every place below that reads "wcec" or "loop iters" off
//! a neighbor node goes through those effective accessors, never the raw
//! `CFGNode` field directly (the one exception: the WCEC assignment pass
//! itself, which is *setting* the raw field).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::asmcost::{ClineInstrTable, InstrCycleTable};
use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::node::{NodeId, NodeKind, Ref};
use crate::session::AnalyzerSession;

/// `[^//]*\s*[@LOOP]\s*(\d+)` as a character class, not a literal string —
/// `[@LOOP]` matches any single one of `@`, `L`, `O`, `P`. Kept as-is
/// (see `DESIGN.md`): a stray `L`, `O`, or `P` followed by digits anywhere
/// on the loop condition line satisfies the tag, same as the tool this was
/// ported from.
static LOOP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^/]*\s*[@LOOP]\s*(\d+)").unwrap());

/// Read the `loop_cond_line`'th line (1-indexed) of `source_lines` and pull
/// a maximum iteration count out of it, or `0` if the tag isn't present.
pub fn parse_loop_tag(source_lines: &[&str], loop_cond_line: usize) -> u64 {
    if loop_cond_line == 0 || loop_cond_line > source_lines.len() {
        return 0;
    }
    let line = source_lines[loop_cond_line - 1];
    LOOP_TAG
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn lookup_cycles(table: &InstrCycleTable, instr: &str) -> AnalyzerResult<u64> {
    table
        .get(&instr.to_lowercase())
        .copied()
        .ok_or_else(|| AnalyzerError::UnknownMnemonic(instr.to_owned()))
}

/// Run both passes: fold assembly costs into raw `wcec`, then propagate
/// `rwcec`. `cline_instr_table` is consumed destructively (same as the
/// original): each C line's instructions are spent once, against whichever
/// node claims that line first.
pub fn compute_cfg_wcec(
    session: &mut AnalyzerSession,
    source: &str,
    instr_cycle_table: &InstrCycleTable,
    mut cline_instr_table: ClineInstrTable,
) -> AnalyzerResult<()> {
    compute_wcec(session, instr_cycle_table, &mut cline_instr_table, source)?;
    compute_cfg_rwcec(session);
    Ok(())
}

fn compute_wcec(
    session: &mut AnalyzerSession,
    instr_cycle_table: &InstrCycleTable,
    cline_instr_table: &mut ClineInstrTable,
    source: &str,
) -> AnalyzerResult<()> {
    let source_lines: Vec<&str> = source.lines().collect();
    let firsts: Vec<NodeId> = session
        .entries_in_parse_order()
        .iter()
        .map(|e| e.first_node)
        .collect();
    for first in firsts {
        let mut visited = HashSet::new();
        compute_wcec_visited(
            session,
            first,
            &mut visited,
            instr_cycle_table,
            cline_instr_table,
            &source_lines,
        )?;
    }
    Ok(())
}

/// The first node visited in each
/// function's walk is allowed to also claim any instructions at lines
/// *before* its own start line (prologue instructions the compiler
/// attributes to an early line); every `END` node additionally claims
/// whatever line is left latest in its function's table (epilogue
/// instructions).
fn compute_wcec_visited(
    session: &mut AnalyzerSession,
    n: NodeId,
    visited: &mut HashSet<NodeId>,
    instr_cycle_table: &InstrCycleTable,
    cline_instr_table: &mut ClineInstrTable,
    source_lines: &[&str],
) -> AnalyzerResult<()> {
    visited.insert(n);
    let kind = session.node(n).kind;

    if kind == NodeKind::While {
        let start_line = session.node(n).start_line;
        let iters = parse_loop_tag(source_lines, start_line);
        session.node_mut(n).loop_iters = iters;
    }

    if kind == NodeKind::Pseudo {
        if let Some(Ref::LoopHeader(w)) = session.node(n).refnode {
            compute_wcec_visited(
                session,
                w,
                visited,
                instr_cycle_table,
                cline_instr_table,
                source_lines,
            )?;
        }
    } else {
        let func_name = session.node(n).owner_function.clone();
        let start_line = session.node(n).start_line;
        let last_line = session.node(n).last_line;
        let is_first_node = visited.len() == 1;

        let mut wcec = 0u64;
        if let Some(clines_map) = cline_instr_table.get_mut(&func_name) {
            let mut clines: Vec<usize> = clines_map.keys().copied().collect();
            clines.sort_unstable();

            for cline in &clines {
                if (*cline >= start_line && *cline <= last_line) || (is_first_node && *cline <= last_line) {
                    if let Some(instrs) = clines_map.remove(cline) {
                        for instr in &instrs {
                            wcec += lookup_cycles(instr_cycle_table, instr)?;
                        }
                    }
                }
            }

            if kind == NodeKind::End {
                if let Some(&last_cline) = clines.last() {
                    if let Some(instrs) = clines_map.remove(&last_cline) {
                        for instr in &instrs {
                            wcec += lookup_cycles(instr_cycle_table, instr)?;
                        }
                    }
                }
            }
        }
        session.node_mut(n).wcec = wcec;
    }

    let children = session.node(n).children.clone();
    for c in children {
        if !visited.contains(&c) {
            compute_wcec_visited(
                session,
                c,
                visited,
                instr_cycle_table,
                cline_instr_table,
                source_lines,
            )?;
        }
    }
    Ok(())
}

fn compute_cfg_rwcec(session: &mut AnalyzerSession) {
    let firsts: Vec<NodeId> = session
        .entries_in_parse_order()
        .iter()
        .map(|e| e.first_node)
        .collect();
    for first in firsts {
        if session.node(first).rwcec == 0 {
            let mut visited = HashSet::new();
            compute_cfg_rwcec_visit(session, first, &mut visited, 1);
        }
    }
}

/// The worst (largest) of each child
/// candidate wins, with a formula chosen by what kind of edge the child
/// represents (loop back-edge into `WHILE`, the `WHILE` node's own
/// candidate, the fan-out through a `PSEUDO`, or the default straight-line
/// candidate). `loop_iters` defaults to 1 outside a loop so the same
/// default-straight-line formula works unchanged whether or not `n` sits
/// inside a loop body.
fn compute_cfg_rwcec_visit(session: &mut AnalyzerSession, n: NodeId, visited: &mut HashSet<NodeId>, loop_iters: u64) {
    visited.insert(n);
    let kind = session.node(n).kind;

    if kind == NodeKind::Pseudo {
        if let Some(Ref::LoopHeader(w)) = session.node(n).refnode {
            let iters = session.effective_loop_iters(n);
            compute_cfg_rwcec_visit(session, w, visited, iters);
            update_loop_rwcec(session, w, &mut HashSet::new());
        }
    } else if kind == NodeKind::Call {
        if let Some(Ref::Callee(entry_id)) = session.node(n).refnode {
            let first = session.entry(entry_id).first_node;
            if session.node(first).rwcec == 0 {
                compute_cfg_rwcec_visit(session, first, visited, 1);
            }
        }
    }

    let children = session.node(n).children.clone();
    for child in children {
        if !visited.contains(&child) {
            compute_cfg_rwcec_visit(session, child, visited, loop_iters);
        }

        let child_kind = session.node(child).kind;
        let n_wcec = session.effective_wcec(n);
        let child_wcec = session.effective_wcec(child);
        let child_rwcec = session.node(child).rwcec;
        let n_rwcec = session.node(n).rwcec;

        let candidate = if child_kind == NodeKind::While {
            (n_wcec + child_wcec) * loop_iters
        } else if kind == NodeKind::While {
            n_wcec + child_rwcec
        } else if kind == NodeKind::Pseudo {
            session.refnode_rwcec(n) + child_rwcec
        } else {
            n_wcec * loop_iters + child_rwcec
        };

        if candidate > n_rwcec {
            session.node_mut(n).rwcec = candidate;
        }
    }

    if session.node(n).children.is_empty() {
        let w = session.effective_wcec(n);
        session.node_mut(n).rwcec = w;
    }
}

/// The loop header's RWCEC (the worst full
/// run of the loop) is right as soon as `compute_cfg_rwcec_visit` settles
/// it, but the nodes inside the loop body were computed against whatever
/// partial RWCEC the `WHILE` node had at the time, so walk the body again
/// and patch every node's RWCEC against the now-final loop numbers.
fn update_loop_rwcec(session: &mut AnalyzerSession, n: NodeId, visited: &mut HashSet<NodeId>) {
    visited.insert(n);
    let children = session.node(n).children.clone();

    for child in children {
        if !visited.contains(&child) {
            update_loop_rwcec(session, child, visited);
        }

        let is_loop_back_edge = matches!(session.node(n).refnode, Some(Ref::LoopHeader(w)) if w == child);
        let child_kind = session.node(child).kind;
        let n_wcec = session.effective_wcec(n);

        let rwcec = if !is_loop_back_edge && child_kind == NodeKind::While {
            let loop_max_rwcec = session.node(child).rwcec;
            let child_wcec = session.effective_wcec(child);
            let child_iters = session.effective_loop_iters(child).max(1);
            // Integer floor division, same rounding direction the table in
            // DESIGN.md settles on for a per-iteration estimate.
            let loop_one_run_rwcec = (loop_max_rwcec - child_wcec) / child_iters;
            loop_max_rwcec - loop_one_run_rwcec + n_wcec
        } else {
            session.node(child).rwcec + n_wcec
        };

        if rwcec > session.node(n).rwcec {
            session.node_mut(n).rwcec = rwcec;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_tag_matches_any_of_at_l_o_p_before_digits() {
        let lines = vec!["while (x) { // @LOOP 10"];
        assert_eq!(parse_loop_tag(&lines, 1), 10);

        // The character class means a bare 'L' followed by digits matches too.
        let lines2 = vec!["while (x) { // L 7"];
        assert_eq!(parse_loop_tag(&lines2, 1), 7);
    }

    #[test]
    fn loop_tag_defaults_to_zero_without_a_match() {
        let lines = vec!["while (x) {"];
        assert_eq!(parse_loop_tag(&lines, 1), 0);
    }

    #[test]
    fn loop_tag_out_of_range_line_is_zero() {
        let lines = vec!["while (x) {"];
        assert_eq!(parse_loop_tag(&lines, 99), 0);
    }

    #[test]
    fn straight_line_rwcec_sums_wcec_down_to_end() {
        let mut session = AnalyzerSession::new();
        let a = session.add_node(NodeKind::Common, "f");
        let b = session.add_node(NodeKind::Common, "f");
        let end = session.add_node(NodeKind::End, "f");
        session.add_child(a, b);
        session.add_child(b, end);
        session.add_entry("f", a);

        session.node_mut(a).wcec = 2;
        session.node_mut(b).wcec = 3;
        session.node_mut(end).wcec = 1;

        compute_cfg_rwcec(&mut session);

        assert_eq!(session.node(end).rwcec, 1);
        assert_eq!(session.node(b).rwcec, 4);
        assert_eq!(session.node(a).rwcec, 6);
    }

    #[test]
    fn call_rwcec_is_folded_into_caller_via_effective_wcec() {
        let mut session = AnalyzerSession::new();
        let callee_first = session.add_node(NodeKind::Common, "g");
        let callee_end = session.add_node(NodeKind::End, "g");
        session.add_child(callee_first, callee_end);
        session.node_mut(callee_first).wcec = 5;
        session.node_mut(callee_end).wcec = 1;
        let callee_entry = session.add_entry("g", callee_first);

        let call = session.add_node(NodeKind::Call, "f");
        let end = session.add_node(NodeKind::End, "f");
        session.add_child(call, end);
        session.node_mut(call).wcec = 2;
        session.node_mut(call).refnode = Some(Ref::Callee(callee_entry));
        session.node_mut(end).wcec = 1;
        session.add_entry("f", call);

        compute_cfg_rwcec(&mut session);

        assert_eq!(session.node(callee_end).rwcec, 1);
        assert_eq!(session.node(callee_first).rwcec, 6);
        // call's effective wcec = 2 (own) + 6 (callee rwcec) = 8
        assert_eq!(session.node(end).rwcec, 1);
        assert_eq!(session.node(call).rwcec, 9);
    }
}
