//! The analyzer session: owns the node arena and the function table for one
//! analysis run, and exposes the accessors built on top of them
//! (`refnode_rwcec`, the effective `wcec`, and the `show` text dumper).
//!
//! Construct at request entry, drop at exit — there is no global mutable
//! state anywhere in this crate.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::node::{ByteSpan, CFGNode, EntryId, EntryNode, NodeId, NodeKind, Ref};

#[derive(Debug, Default)]
pub struct AnalyzerSession {
    nodes: Vec<CFGNode>,
    entries: Vec<EntryNode>,
    by_name: HashMap<String, EntryId>,
}

impl AnalyzerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, kind: NodeKind, owner_function: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(CFGNode::new(kind, owner_function));
        id
    }

    pub fn add_entry(&mut self, function_name: impl Into<String>, first_node: NodeId) -> EntryId {
        let name = function_name.into();
        let id = EntryId(self.entries.len());
        self.entries.push(EntryNode {
            function_name: name.clone(),
            first_node,
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn node(&self, id: NodeId) -> &CFGNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CFGNode {
        &mut self.nodes[id.0]
    }

    pub fn entry(&self, id: EntryId) -> &EntryNode {
        &self.entries[id.0]
    }

    pub fn entries(&self) -> impl Iterator<Item = EntryId> + '_ {
        (0..self.entries.len()).map(EntryId)
    }

    pub fn entries_in_parse_order(&self) -> &[EntryNode] {
        &self.entries
    }

    pub fn find_entry_by_name(&self, name: &str) -> Option<EntryId> {
        self.by_name.get(name).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(parent).children.push(child);
    }

    pub fn push_ast_span(&mut self, id: NodeId, span: ByteSpan, line: usize) {
        self.node_mut(id).push_ast_span(span, line);
    }

    /// `ref.rwcec` when `n` is a `PSEUDO`, `ref.first_node.rwcec` when `n` is
    /// a resolved `CALL`, else zero.
    pub fn refnode_rwcec(&self, id: NodeId) -> u64 {
        let n = self.node(id);
        match (n.kind, n.refnode) {
            (NodeKind::Pseudo, Some(Ref::LoopHeader(loop_id))) => self.node(loop_id).rwcec,
            (NodeKind::Call, Some(Ref::Callee(entry_id))) => {
                self.node(self.entry(entry_id).first_node).rwcec
            }
            _ => 0,
        }
    }

    /// Effective WCEC: `PSEUDO` forwards to its loop header's WCEC; a
    /// resolved `CALL` adds its own call cost to the callee's RWCEC; every
    /// other node just reports its own `wcec` field.
    pub fn effective_wcec(&self, id: NodeId) -> u64 {
        let n = self.node(id);
        match (n.kind, n.refnode) {
            (NodeKind::Pseudo, Some(Ref::LoopHeader(loop_id))) => self.node(loop_id).wcec,
            (NodeKind::Call, Some(Ref::Callee(_))) => n.wcec + self.refnode_rwcec(id),
            _ => n.wcec,
        }
    }

    /// Effective loop-iteration bound: a `PSEUDO` forwards to its `WHILE`.
    pub fn effective_loop_iters(&self, id: NodeId) -> u64 {
        let n = self.node(id);
        match (n.kind, n.refnode) {
            (NodeKind::Pseudo, Some(Ref::LoopHeader(loop_id))) => self.node(loop_id).loop_iters,
            _ => n.loop_iters,
        }
    }

    /// Recursive text dumper matching the original tool's `.cfg` dump
    /// format: one `- <kind>, <start_line>` line per node, indented one
    /// level per recursion depth, with loop bodies nested under a `|`
    /// marker and loop back-edges rendered as a bare `WHILE` line instead of
    /// being followed again.
    pub fn show(&self) -> String {
        let mut out = String::new();
        for entry_id in self.entries() {
            let entry = self.entry(entry_id);
            let _ = writeln!(out, "  entry point - {}", entry.function_name);
            self.show_node(entry.first_node, 1, "  ", &mut out);
        }
        out
    }

    fn show_node(&self, id: NodeId, indent: usize, lead: &str, out: &mut String) {
        let lead = format!("{lead}{}", " ".repeat(indent));
        let n = self.node(id);
        let _ = writeln!(out, "{lead}- {}, {}", n.kind.to_string(), n.start_line);

        if let (NodeKind::Pseudo, Some(Ref::LoopHeader(loop_id))) = (n.kind, n.refnode) {
            self.show_node(loop_id, indent, &format!("{lead}|"), out);
        }

        for &child in &n.children {
            if self.node(child).kind == NodeKind::While {
                let c = self.node(child);
                let _ = writeln!(out, "{lead}| - {}, {}", c.kind.to_string(), c.start_line);
            } else {
                self.show_node(child, indent, &format!("{lead}|"), out);
            }
        }
    }
}
