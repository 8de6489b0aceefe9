//! Evaluation trace - per-evaluation record for live inspection
//!
//! Nodes are stored in an arena in visit order. Every traced condition opens
//! a scope, so anything evaluated inside it (nested sets, presets) lands
//! under it and the tree shape of the rules is preserved.

use std::fmt::Write;

/// Outcome of one traced node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceResult {
    Success,
    Fail,
    Disabled,
}

impl From<bool> for TraceResult {
    fn from(value: bool) -> Self {
        if value {
            TraceResult::Success
        } else {
            TraceResult::Fail
        }
    }
}

/// One traced condition
#[derive(Debug, Clone)]
pub struct TraceNode {
    pub name: String,
    pub negated: bool,
    pub argument: String,
    pub result: TraceResult,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Tree-shaped record of a single evaluation
#[derive(Debug, Clone, Default)]
pub struct EvaluationTrace {
    nodes: Vec<TraceNode>,
    roots: Vec<usize>,
    scope: Option<usize>,
}

impl EvaluationTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node under the current scope; result defaults to Fail
    pub fn begin(&mut self, name: &str, negated: bool, argument: String) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(TraceNode {
            name: name.to_string(),
            negated,
            argument,
            result: TraceResult::Fail,
            parent: self.scope,
            children: Vec::new(),
        });
        match self.scope {
            Some(parent) => self.nodes[parent].children.push(idx),
            None => self.roots.push(idx),
        }
        idx
    }

    /// Open a child scope; returns the scope to restore
    pub fn enter(&mut self, node: usize) -> Option<usize> {
        self.scope.replace(node)
    }

    pub fn exit(&mut self, previous: Option<usize>) {
        self.scope = previous;
    }

    pub fn finish(&mut self, node: usize, result: TraceResult) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.result = result;
        }
    }

    /// Start a labelled group (one candidate) at the root
    pub fn group(&mut self, label: &str) -> usize {
        let previous = self.scope.take();
        let idx = self.begin(label, false, String::new());
        self.scope = previous;
        idx
    }

    pub fn nodes(&self) -> &[TraceNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, idx: usize) -> Option<&TraceNode> {
        self.nodes.get(idx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.scope = None;
    }

    /// Depth of a node (roots are 0)
    pub fn depth(&self, idx: usize) -> usize {
        let mut depth = 0;
        let mut cur = self.nodes.get(idx).and_then(|n| n.parent);
        while let Some(p) = cur {
            depth += 1;
            cur = self.nodes[p].parent;
        }
        depth
    }

    /// Indented text rendering for logs and tooling
    pub fn render(&self) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.render_node(root, 0, &mut out);
        }
        out
    }

    fn render_node(&self, idx: usize, indent: usize, out: &mut String) {
        let node = &self.nodes[idx];
        let marker = match node.result {
            TraceResult::Success => "+",
            TraceResult::Fail => "-",
            TraceResult::Disabled => "~",
        };
        let not = if node.negated { "NOT " } else { "" };
        let _ = writeln!(
            out,
            "{:width$}{} {}{} {}",
            "",
            marker,
            not,
            node.name,
            node.argument,
            width = indent * 2
        );
        for &child in &node.children {
            self.render_node(child, indent + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_scopes() {
        let mut trace = EvaluationTrace::new();
        let and = trace.begin("AND", false, String::new());
        let outer = trace.enter(and);
        let leaf = trace.begin("HasFlag", true, "flag 'X'".into());
        trace.finish(leaf, TraceResult::Success);
        trace.exit(outer);
        trace.finish(and, TraceResult::Success);
        let sibling = trace.begin("Random", false, String::new());

        assert_eq!(trace.roots(), &[and, sibling]);
        assert_eq!(trace.node(and).unwrap().children, vec![leaf]);
        assert_eq!(trace.depth(leaf), 1);
        assert_eq!(trace.node(sibling).unwrap().result, TraceResult::Fail);
    }

    #[test]
    fn test_render() {
        let mut trace = EvaluationTrace::new();
        let n = trace.begin("HasFlag", true, "flag 'IsSneaking'".into());
        trace.finish(n, TraceResult::Disabled);
        assert_eq!(trace.render(), "~ NOT HasFlag flag 'IsSneaking'\n");
    }
}
