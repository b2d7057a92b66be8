//! GraphML sink: an alternate, optional output format parallel to the DVFS
//! synthesizer.
//!
//! One nested `<graph>` per function, nodes numbered `g<fid>n<nid>` and
//! edges `g<fid>e<eid>` in pre-order, with nine per-node data keys
//! (`k0`..`k8`). No yFiles/yEd graphical extension attributes — nothing in
//! this crate renders the graph, so there is no consumer for node shapes or
//! edge labels; only the plain GraphML keys survive.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::node::{NodeId, NodeKind, Ref};
use crate::session::AnalyzerSession;

const NODE_KEYS: &[(&str, &str, &str)] = &[
    ("k0", "node_type", "string"),
    ("k1", "start_line", "int"),
    ("k2", "last_line", "int"),
    ("k3", "function_owner", "string"),
    ("k4", "call", "string"),
    ("k5", "refnode_wcec", "int"),
    ("k6", "iterations", "int"),
    ("k7", "wcec", "int"),
    ("k8", "rwcec", "int"),
];

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render the whole session as a single GraphML document, one nested
/// `<graph>` element per function entry point.
pub fn write_graphml(session: &AnalyzerSession) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(
        "<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:schemaLocation=\"http://graphml.graphdrawing.org/xmlns \
         http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd\">\n",
    );
    for (id, name, attr_type) in NODE_KEYS {
        let _ = writeln!(
            out,
            "  <key id=\"{id}\" for=\"node\" attr.name=\"{name}\" attr.type=\"{attr_type}\"/>"
        );
    }

    let mut total_nodes = 0;
    let mut total_edges = 0;

    for (idx, entry) in session.entries_in_parse_order().iter().enumerate() {
        let fid = idx + 1;
        let _ = writeln!(out, "  <graph id=\"g{fid}\" edgedefault=\"directed\">");

        let mut ids: HashMap<NodeId, String> = HashMap::new();
        write_nodes(session, &mut out, fid, entry.first_node, &mut ids);

        let mut visited = HashSet::new();
        let edges = write_edges(session, &mut out, fid, entry.first_node, 0, &mut visited, &ids);

        out.push_str("  </graph>\n");
        total_nodes += ids.len();
        total_edges += edges;
    }

    let _ = writeln!(
        out,
        "  <!-- parse.nodes={total_nodes} parse.edges={total_edges} -->"
    );
    out.push_str("</graphml>\n");
    out
}

fn write_nodes(session: &AnalyzerSession, out: &mut String, fid: usize, n: NodeId, ids: &mut HashMap<NodeId, String>) {
    let nid = ids.len();
    let id = format!("g{fid}n{nid}");
    ids.insert(n, id.clone());
    write_node_xml(session, out, &id, n);

    if session.node(n).kind == NodeKind::Pseudo {
        if let Some(Ref::LoopHeader(w)) = session.node(n).refnode {
            if !ids.contains_key(&w) {
                write_nodes(session, out, fid, w, ids);
            }
        }
    }

    let children = session.node(n).children.clone();
    for child in children {
        if !ids.contains_key(&child) {
            write_nodes(session, out, fid, child, ids);
        }
    }
}

fn write_node_xml(session: &AnalyzerSession, out: &mut String, id: &str, n: NodeId) {
    let node = session.node(n);
    let _ = writeln!(out, "    <node id=\"{id}\">");
    emit_data(out, "k0", &node.kind.to_string());
    emit_data(out, "k1", &node.start_line.to_string());
    emit_data(out, "k2", &node.last_line.to_string());
    emit_data(out, "k3", &xml_escape(&node.owner_function));
    emit_data(out, "k4", &xml_escape(node.call_target_name.as_deref().unwrap_or("none")));
    emit_data(out, "k5", &session.refnode_rwcec(n).to_string());
    emit_data(out, "k6", &session.effective_loop_iters(n).to_string());
    emit_data(out, "k7", &session.effective_wcec(n).to_string());
    emit_data(out, "k8", &node.rwcec.to_string());
    out.push_str("    </node>\n");
}

fn emit_data(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "      <data key=\"{key}\">{value}</data>");
}

fn write_edges(
    session: &AnalyzerSession,
    out: &mut String,
    fid: usize,
    n: NodeId,
    eid: usize,
    visited: &mut HashSet<NodeId>,
    ids: &HashMap<NodeId, String>,
) -> usize {
    visited.insert(n);
    let mut eid = eid;

    if session.node(n).kind == NodeKind::Pseudo {
        if let Some(Ref::LoopHeader(w)) = session.node(n).refnode {
            if !visited.contains(&w) {
                eid = write_edges(session, out, fid, w, eid, visited, ids);
            }
            write_edge_xml(session, out, fid, eid, n, w, ids);
            eid += 1;
        }
    }

    let children = session.node(n).children.clone();
    for child in children {
        if !visited.contains(&child) {
            eid = write_edges(session, out, fid, child, eid, visited, ids);
        }
        write_edge_xml(session, out, fid, eid, n, child, ids);
        eid += 1;
    }

    eid
}

/// A loop's own back-edge (the `WHILE` condition reached again at the
/// bottom of its body) can't report the loop's full RWCEC as the edge
/// weight — that's the cost of the *whole remaining* loop, not of running
/// the body once more — so it's discounted by one iteration's share first.
fn write_edge_xml(session: &AnalyzerSession, out: &mut String, fid: usize, eid: usize, n: NodeId, child: NodeId, ids: &HashMap<NodeId, String>) {
    let source = &ids[&n];
    let target = &ids[&child];

    let is_loop_back_edge = matches!(session.node(n).refnode, Some(Ref::LoopHeader(w)) if w == child);
    let mut rwcec = 0u64;
    if !is_loop_back_edge && session.node(child).kind == NodeKind::While {
        let child_rwcec = session.node(child).rwcec;
        let child_wcec = session.effective_wcec(child);
        let child_iters = session.effective_loop_iters(child).max(1);
        let loop_wcec_once = (child_rwcec.saturating_sub(child_wcec)) / child_iters;
        rwcec = child_rwcec.saturating_sub(loop_wcec_once);
    }
    if rwcec == 0 {
        rwcec = session.node(child).rwcec;
    }

    let _ = writeln!(out, "    <edge id=\"g{fid}e{eid}\" source=\"{source}\" target=\"{target}\">");
    emit_data(out, "k8", &rwcec.to_string());
    out.push_str("    </edge>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_node_function_produces_one_node_and_no_edges() {
        let mut session = AnalyzerSession::new();
        let n = session.add_node(NodeKind::Common, "f");
        session.add_entry("f", n);

        let xml = write_graphml(&session);
        assert!(xml.contains("id=\"g1n0\""));
        assert!(xml.contains("parse.nodes=1 parse.edges=0"));
    }

    #[test]
    fn straight_chain_produces_deterministic_ids() {
        let mut session = AnalyzerSession::new();
        let a = session.add_node(NodeKind::Common, "f");
        let b = session.add_node(NodeKind::End, "f");
        session.add_child(a, b);
        session.add_entry("f", a);

        let xml = write_graphml(&session);
        assert!(xml.contains("id=\"g1n0\""));
        assert!(xml.contains("id=\"g1n1\""));
        assert!(xml.contains("id=\"g1e0\" source=\"g1n0\" target=\"g1n1\""));
    }
}
