//! CFG node model: the arena, node/entry handles, and the closed set of
//! node kinds described by the analyzer's data model.
//!
//! Nodes never own their neighbors. The whole graph — including the loop
//! back-edges and call edges that make it cyclic — lives in a dense
//! `Vec<CFGNode>` owned by the session (see `session.rs`); everything else
//! just holds `NodeId`/`EntryId` handles into that vector.

use std::fmt;

/// Handle into `AnalyzerSession::nodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Handle into `AnalyzerSession::entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub usize);

/// The closed set of node kinds the builder produces (plus three reserved
/// kinds that exist for completeness but are never emitted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Common,
    If,
    ElseIf,
    EndIf,
    While,
    Pseudo,
    Call,
    End,
    // Reserved: the builder never produces these.
    For,
    DoWhile,
    Else,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Common => "common",
            NodeKind::If => "if",
            NodeKind::ElseIf => "else_if",
            NodeKind::EndIf => "end_if",
            NodeKind::While => "while",
            NodeKind::Pseudo => "pseudo",
            NodeKind::Call => "call",
            NodeKind::End => "end",
            NodeKind::For => "for",
            NodeKind::DoWhile => "do_while",
            NodeKind::Else => "else",
        };
        f.write_str(s)
    }
}

/// Dual semantics of `ref`: a `PSEUDO` points at the loop's `WHILE` node, a
/// `CALL` points at a (possibly unresolved) callee entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ref {
    LoopHeader(NodeId),
    Callee(EntryId),
}

/// A span of bytes in the original source, used only for line discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

/// A single CFG node. Kind-specific fields are simply unused for kinds that
/// don't need them — there's no dynamic dispatch here, just a flat record
/// a `match` on `kind` switches over.
#[derive(Debug, Clone)]
pub struct CFGNode {
    pub kind: NodeKind,
    pub owner_function: String,
    pub start_line: usize,
    pub last_line: usize,
    pub call_target_name: Option<String>,
    pub refnode: Option<Ref>,
    pub loop_iters: u64,
    pub wcec: u64,
    pub rwcec: u64,
    pub children: Vec<NodeId>,
    ast_spans: Vec<ByteSpan>,
}

impl CFGNode {
    pub fn new(kind: NodeKind, owner_function: impl Into<String>) -> Self {
        CFGNode {
            kind,
            owner_function: owner_function.into(),
            start_line: 0,
            last_line: 0,
            call_target_name: None,
            refnode: None,
            loop_iters: 0,
            wcec: 0,
            rwcec: 0,
            children: Vec::new(),
            ast_spans: Vec::new(),
        }
    }

    pub fn push_ast_span(&mut self, span: ByteSpan, line: usize) {
        if self.start_line == 0 {
            self.start_line = line;
        }
        self.last_line = line;
        self.ast_spans.push(span);
    }

    pub fn ast_spans(&self) -> &[ByteSpan] {
        &self.ast_spans
    }

    pub fn is_pseudo(&self) -> bool {
        self.kind == NodeKind::Pseudo
    }

    pub fn is_call(&self) -> bool {
        self.kind == NodeKind::Call
    }
}

/// Per-function entry: function name plus the handle of its first node.
/// Functions are kept in parse order in `AnalyzerSession::entries`.
#[derive(Debug, Clone)]
pub struct EntryNode {
    pub function_name: String,
    pub first_node: NodeId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_display_uses_snake_case_names() {
        assert_eq!(NodeKind::EndIf.to_string(), "end_if");
        assert_eq!(NodeKind::While.to_string(), "while");
    }

    #[test]
    fn push_ast_span_sets_start_and_last_line() {
        let mut n = CFGNode::new(NodeKind::Common, "f");
        n.push_ast_span(ByteSpan { start: 0, end: 4 }, 3);
        n.push_ast_span(ByteSpan { start: 5, end: 9 }, 5);
        assert_eq!(n.start_line, 3);
        assert_eq!(n.last_line, 5);
    }
}
