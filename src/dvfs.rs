//! DVFS-aware C source synthesis.
//!
//! Walks every function's CFG looking for type-B (an `IF` whose branch will
//! finish well before the worst-case sibling) and type-L (the node right
//! after a loop) edges, and splices an `adjust_freq(...)` call — declared by
//! the bundled `cfg_wcec.h` — into the original source text at each one.
//!
//! Source lines are kept as `(original_line_number, text)` pairs: synthetic
//! insertions carry `-1` so they never collide with a later lookup by real
//! line number, and lookups always scan from the front for the first
//! matching real number.

use std::collections::HashSet;

use crate::errors::{AnalyzerError, AnalyzerResult};
use crate::node::{NodeId, NodeKind, Ref};
use crate::session::AnalyzerSession;

const BANNER: &str = "auto generate DVFS code";

/// The `adjust_freq` declaration and supporting typedefs, shipped next to
/// every generated `_dvfs.c` file.
pub const HEADER_SOURCE: &str = include_str!("../assets/cfg_wcec.h");

/// Detect a `PSEUDO` nested inside another loop's body before attempting
/// synthesis (the node right after an inner loop may actually be
/// the outer loop's own condition node, so "the edge right after the loop"
/// stops being well-defined).
fn check_no_nested_loops(session: &AnalyzerSession) -> AnalyzerResult<()> {
    for i in 0..session.node_count() {
        let id = NodeId(i);
        if session.node(id).kind != NodeKind::While {
            continue;
        }
        let body = loop_body_nodes(session, id);
        if let Some(nested) = body.iter().find(|&&b| session.node(b).kind == NodeKind::Pseudo) {
            return Err(AnalyzerError::NestedLoopUnsupported(
                session.node(*nested).owner_function.clone(),
            ));
        }
    }
    Ok(())
}

/// Every node reachable from `while_id`'s children without crossing back
/// through `while_id` itself (the loop's own back-edge).
fn loop_body_nodes(session: &AnalyzerSession, while_id: NodeId) -> HashSet<NodeId> {
    let mut visited = HashSet::new();
    let mut stack = session.node(while_id).children.clone();
    while let Some(n) = stack.pop() {
        if n == while_id || !visited.insert(n) {
            continue;
        }
        stack.extend(session.node(n).children.clone());
    }
    visited
}

/// Rewrite `source` into a DVFS-aware copy. Returns the full new source
/// text; callers decide whether that goes to a `_dvfs.c` file or stdout.
pub fn generate_dvfs_source(session: &AnalyzerSession, source: &str) -> AnalyzerResult<String> {
    if source.is_empty() {
        return Err(AnalyzerError::EmptySource);
    }
    check_no_nested_loops(session)?;

    let mut clines: Vec<(i64, String)> = source
        .split_inclusive('\n')
        .enumerate()
        .map(|(i, text)| ((i + 1) as i64, text.to_owned()))
        .collect();

    insert_header(&mut clines);

    for entry in session.entries_in_parse_order().to_vec() {
        let mut visited = HashSet::new();
        insert_dvfs_info_visit(session, &mut clines, entry.first_node, &mut visited);
    }

    Ok(clines.into_iter().map(|(_, text)| text).collect())
}

fn insert_header(clines: &mut Vec<(i64, String)>) {
    let code = "#include \"cfg_wcec.h\"\n".to_string();
    clines.insert(0, (-1, dvfs_block("", &code)));
}

fn insert_dvfs_info_visit(
    session: &AnalyzerSession,
    clines: &mut Vec<(i64, String)>,
    n: NodeId,
    visited: &mut HashSet<NodeId>,
) {
    visited.insert(n);
    let kind = session.node(n).kind;

    if kind == NodeKind::Pseudo {
        if let Some(Ref::LoopHeader(w)) = session.node(n).refnode {
            insert_dvfs_info_visit(session, clines, w, visited);
        }
    }

    let children = session.node(n).children.clone();
    for child in children {
        if !visited.contains(&child) {
            if kind == NodeKind::If {
                check_type_b_edge(session, clines, n, child);
            } else if kind == NodeKind::Pseudo {
                check_type_l_edge(session, clines, n, child);
            }
            insert_dvfs_info_visit(session, clines, child, visited);
        }
    }
}

/// A type-B edge: `child` will finish with cycles to spare relative to the
/// worst sibling branch `n` could have taken, so the frequency can be
/// lowered for it.
fn check_type_b_edge(session: &AnalyzerSession, clines: &mut Vec<(i64, String)>, n: NodeId, child: NodeId) {
    let succbi = session.node(n).rwcec - session.effective_wcec(n);
    let bj = session.node(child).rwcec;
    let bjline = session.node(child).start_line;
    if bj < succbi {
        insert_type_b_info(clines, bjline, succbi, bj);
    }
}

fn check_type_l_edge(session: &AnalyzerSession, clines: &mut Vec<(i64, String)>, n: NodeId, child: NodeId) {
    let loop_iters = session.effective_loop_iters(n);
    let refnode_rwcec = session.refnode_rwcec(n);
    let loop_wcec_once = if loop_iters != 0 {
        refnode_rwcec / loop_iters
    } else {
        refnode_rwcec
    };
    let loop_cond_line = session.node(n).start_line;
    let loop_after_line = session.node(child).start_line;
    let loop_after_rwcec = session.node(child).rwcec;
    insert_type_l_info(
        clines,
        loop_cond_line,
        loop_wcec_once,
        loop_iters,
        loop_after_line,
        loop_after_rwcec,
    );
}

fn insert_type_b_info(clines: &mut Vec<(i64, String)>, bjline: usize, rwcec_bi: u64, rwcec_bj: u64) {
    let (index, spaces) = line_index_spaces(clines, bjline);
    let code = format!(
        "{spaces}adjust_freq(TYPE_B, {rwcec_bi}.0f, {rwcec_bj}.0f, 0, 0);\n",
        spaces = spaces
    );
    clines.insert(index, (-1, dvfs_block(&spaces, &code)));
}

/// Three insertions: declare the loop's own iteration counter right before
/// it starts, bump that counter on every pass through the body, and call
/// `adjust_freq` once on the node right after the loop exits.
fn insert_type_l_info(
    clines: &mut Vec<(i64, String)>,
    loop_cond_line: usize,
    loop_wcec_once: u64,
    loop_max_iter: u64,
    loop_after_line: usize,
    loop_after_rwcec: u64,
) {
    let (index, spaces) = line_index_spaces(clines, loop_cond_line);
    let code = format!("{spaces}int __cfg_loop{loop_cond_line}_iter = 0;\n");
    clines.insert(index.saturating_sub(1), (-1, dvfs_block(&spaces, &code)));

    let (index, spaces) = line_index_spaces(clines, loop_cond_line + 1);
    let code = format!("{spaces}__cfg_loop{loop_cond_line}_iter++;\n");
    clines.insert(index, (-1, dvfs_block(&spaces, &code)));

    let (index, spaces) = line_index_spaces(clines, loop_after_line);
    let code = format!(
        "{spaces}adjust_freq(TYPE_L, {loop_wcec_once}.0f, {loop_after_rwcec}.0f, \
         {loop_max_iter}, __cfg_loop{loop_cond_line}_iter);\n"
    );
    clines.insert(index, (-1, dvfs_block(&spaces, &code)));
}

fn dvfs_block(spaces: &str, code: &str) -> String {
    format!("\n{spaces}/*** {BANNER} ***/\n{code}\n")
}

/// Find the (first, front-to-back) entry whose original line number is
/// `line`, and the leading-whitespace run on that line, to mirror a new
/// block's indentation. Falls back to the last line with no indentation if
/// `line` isn't present (shouldn't happen for a line the CFG itself named).
fn line_index_spaces(clines: &[(i64, String)], line: usize) -> (usize, String) {
    for (i, (l, text)) in clines.iter().enumerate() {
        if *l == line as i64 {
            let stripped = text.trim_start();
            let n = text.chars().count() - stripped.chars().count();
            return (i, " ".repeat(n));
        }
    }
    (clines.len().saturating_sub(1), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn header_is_spliced_in_at_the_top() {
        let session = AnalyzerSession::new();
        let out = generate_dvfs_source(&session, "int main() { return 0; }\n").unwrap();
        assert!(out.contains("#include \"cfg_wcec.h\""));
        assert!(out.contains("return 0;"));
    }

    #[test]
    fn empty_source_is_rejected() {
        let session = AnalyzerSession::new();
        let err = generate_dvfs_source(&session, "").unwrap_err();
        assert!(matches!(err, AnalyzerError::EmptySource));
    }

    #[test]
    fn nested_pseudo_is_rejected() {
        let mut session = AnalyzerSession::new();
        let inner_while = session.add_node(NodeKind::While, "f");
        let inner_pseudo = session.add_node(NodeKind::Pseudo, "f");
        session.node_mut(inner_pseudo).refnode = Some(Ref::LoopHeader(inner_while));

        let outer_while = session.add_node(NodeKind::While, "f");
        session.add_child(outer_while, inner_pseudo);
        session.add_child(inner_pseudo, outer_while);

        let outer_pseudo = session.add_node(NodeKind::Pseudo, "f");
        session.node_mut(outer_pseudo).refnode = Some(Ref::LoopHeader(outer_while));
        session.add_entry("f", outer_pseudo);

        let err = generate_dvfs_source(&session, "int f(){}\n").unwrap_err();
        assert!(matches!(err, AnalyzerError::NestedLoopUnsupported(_)));
    }

    #[test]
    fn type_b_edge_inserts_adjust_freq_call_before_low_cost_branch() {
        let mut session = AnalyzerSession::new();
        let if_id = session.add_node(NodeKind::If, "f");
        let branch = session.add_node(NodeKind::Common, "f");
        session.node_mut(branch).start_line = 2;
        session.node_mut(branch).rwcec = 1;
        session.node_mut(if_id).rwcec = 10;
        session.node_mut(if_id).wcec = 2;
        session.add_child(if_id, branch);
        session.add_entry("f", if_id);

        let source = "if (x) {\n    y();\n}\n";
        let out = generate_dvfs_source(&session, source).unwrap();
        assert!(out.contains("adjust_freq(TYPE_B, 8.0f, 1.0f, 0, 0);"));
    }
}
