//! Expression nodes and the arena that owns them.
//!
//! Nodes of one compilation live in an [`ExprArena`] and refer to each other
//! through [`NodeId`] handles. Clearing the arena frees every tree at once.

use super::operator;
use crate::model::ModelId;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

/// Handle of a node in an [`ExprArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Returns the arena slot.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Column or table reference.
    Literal,
    /// Number, string, boolean or null.
    Constant,
    /// Unary or binary operator.
    Operation,
    /// Operator whose right side may be a value list, such as `in`.
    SetOperation,
    /// Function call, including `case`.
    Function,
    /// Sub-query.
    Lambda,
}

/// One expression node.
#[derive(Clone, Debug)]
pub struct ExprNode {
    pub kind: NodeKind,
    pub token: String,
    pub position: usize,
    pub precedence: i32,
    pub param_count: usize,
    pub lhs: Option<NodeId>,
    pub rhs: Option<NodeId>,
    /// Arguments in source order when `param_count > 2`.
    pub args: Vec<NodeId>,
    /// Sub-query of a lambda node.
    pub query: Option<ModelId>,
}

impl ExprNode {
    /// Creates a leaf node.
    pub fn new(kind: NodeKind, token: impl Into<String>, precedence: i32, position: usize) -> Self {
        Self {
            kind,
            token: token.into(),
            position,
            precedence,
            param_count: 0,
            lhs: None,
            rhs: None,
            args: Vec::new(),
            query: None,
        }
    }

    /// Returns whether the token equals `s`, ignoring case.
    #[inline]
    pub fn is(&self, s: &str) -> bool {
        self.token.eq_ignore_ascii_case(s)
    }
}

/// Owner of all expression nodes of one compilation.
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Number of allocated nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stores `node` and returns its handle.
    pub fn push(&mut self, node: ExprNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Creates a literal.
    pub fn literal(&mut self, token: impl Into<String>, position: usize) -> NodeId {
        self.push(ExprNode::new(NodeKind::Literal, token, 0, position))
    }

    /// Creates a constant.
    pub fn constant(&mut self, token: impl Into<String>, position: usize) -> NodeId {
        self.push(ExprNode::new(NodeKind::Constant, token, 0, position))
    }

    /// Creates a binary operation.
    pub fn operation(&mut self, token: &str, lhs: NodeId, rhs: NodeId, position: usize) -> NodeId {
        let precedence = operator::lookup(token).map_or(0, |o| o.precedence);
        let mut node = ExprNode::new(NodeKind::Operation, token, precedence, position);
        node.param_count = 2;
        node.lhs = Some(lhs);
        node.rhs = Some(rhs);
        self.push(node)
    }

    /// Creates a unary operation.
    pub fn unary(&mut self, token: &str, rhs: NodeId, position: usize) -> NodeId {
        let precedence = operator::lookup(token).map_or(0, |o| o.precedence);
        let mut node = ExprNode::new(NodeKind::Operation, token, precedence, position);
        node.param_count = 1;
        node.rhs = Some(rhs);
        self.push(node)
    }

    /// Creates a function call over `args` in source order.
    pub fn function(&mut self, name: &str, args: &[NodeId], position: usize) -> NodeId {
        let mut node = ExprNode::new(NodeKind::Function, name, 0, position);
        set_arguments(&mut node, args);
        self.push(node)
    }

    /// Creates a sub-query node.
    pub fn lambda(&mut self, query: ModelId, position: usize) -> NodeId {
        let mut node = ExprNode::new(NodeKind::Lambda, "", 0, position);
        node.query = Some(query);
        self.push(node)
    }

    /// Returns the operands of `id` in source order.
    pub fn arguments(&self, id: NodeId) -> Vec<NodeId> {
        let node = &self[id];
        match node.param_count {
            0 => Vec::new(),
            1 => node.rhs.into_iter().collect(),
            2 => node.lhs.into_iter().chain(node.rhs).collect(),
            _ => node.args.clone(),
        }
    }

    /// Returns the token of `id`.
    #[inline]
    pub fn token(&self, id: NodeId) -> &str {
        &self[id].token
    }

    /// Returns whether `id` is a literal.
    #[inline]
    pub fn is_literal(&self, id: NodeId) -> bool {
        self[id].kind == NodeKind::Literal
    }

    /// Returns whether `id` is the operator or function `token`.
    pub fn is_call(&self, id: NodeId, token: &str) -> bool {
        let node = &self[id];
        matches!(
            node.kind,
            NodeKind::Operation | NodeKind::SetOperation | NodeKind::Function
        ) && node.is(token)
    }

    /// Copies the tree rooted at `id`. Sub-query models are shared.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let mut node = self[id].clone();
        node.lhs = node.lhs.map(|n| self.deep_copy(n));
        node.rhs = node.rhs.map(|n| self.deep_copy(n));
        let args: Vec<NodeId> = node.args.clone();
        node.args = args.into_iter().map(|n| self.deep_copy(n)).collect();
        self.push(node)
    }

    /// Returns the nodes of the tree rooted at `id`, children before parents.
    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = alloc::vec![(id, false)];
        while let Some((n, visited)) = stack.pop() {
            if visited {
                out.push(n);
                continue;
            }
            stack.push((n, true));
            for a in self.arguments(n).into_iter().rev() {
                stack.push((a, false));
            }
        }
        out
    }

    /// Replaces operand `i` of `id`, counted in source order.
    pub fn replace_argument(&mut self, id: NodeId, i: usize, with: NodeId) {
        let node = &mut self[id];
        match node.param_count {
            0 => {}
            1 => node.rhs = Some(with),
            2 if i == 0 => node.lhs = Some(with),
            2 => node.rhs = Some(with),
            _ => node.args[i] = with,
        }
    }

    /// Renames an operator and refreshes its precedence.
    pub fn set_operator(&mut self, id: NodeId, token: &str) {
        let precedence = operator::lookup(token).map_or(0, |o| o.precedence);
        let node = &mut self[id];
        node.token = token.to_string();
        node.precedence = precedence;
    }

    /// Chains `node` onto `existing` with `and`.
    pub fn concat_and(&mut self, existing: Option<NodeId>, node: NodeId) -> NodeId {
        match existing {
            None => node,
            Some(e) => {
                let position = self[node].position;
                self.operation("and", e, node, position)
            }
        }
    }

    /// Flattens an `and` tree into its conjuncts, left to right.
    pub fn conjuncts(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = alloc::vec![id];
        while let Some(n) = stack.pop() {
            let node = &self[n];
            if node.kind == NodeKind::Operation && node.param_count == 2 && node.is("and") {
                if let Some(r) = node.rhs {
                    stack.push(r);
                }
                if let Some(l) = node.lhs {
                    stack.push(l);
                }
            } else {
                out.push(n);
            }
        }
        out
    }

    /// Renders `id` in reverse Polish notation.
    pub fn to_rpn(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.rpn_into(id, &mut out);
        out
    }

    fn rpn_into(&self, id: NodeId, out: &mut String) {
        let node = &self[id];
        match node.param_count {
            0 => out.push_str(&node.token),
            1 => {
                if let Some(r) = node.rhs {
                    self.rpn_into(r, out);
                }
                out.push_str(&node.token);
            }
            2 => {
                if let Some(l) = node.lhs {
                    self.rpn_into(l, out);
                }
                if let Some(r) = node.rhs {
                    self.rpn_into(r, out);
                }
                out.push_str(&node.token);
            }
            _ => {
                for &a in &node.args {
                    self.rpn_into(a, out);
                }
                out.push_str(&node.token);
            }
        }
    }

    /// Renders `id` as SQL text without sub-query bodies.
    pub fn to_infix(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_infix(id, &mut out, &mut |_, out| out.push_str("(...)"));
        out
    }

    /// Renders `id` as SQL text, delegating sub-queries to `lambda`.
    pub fn write_infix(
        &self,
        id: NodeId,
        out: &mut String,
        lambda: &mut dyn FnMut(ModelId, &mut String),
    ) {
        let node = &self[id];
        match node.kind {
            NodeKind::Lambda => {
                out.push('(');
                if let Some(q) = node.query {
                    lambda(q, out);
                }
                out.push(')');
            }
            NodeKind::Literal | NodeKind::Constant => out.push_str(&node.token),
            NodeKind::Operation | NodeKind::SetOperation if node.param_count == 2 => {
                if let Some(l) = node.lhs {
                    self.write_operand(l, node.precedence, false, out, lambda);
                }
                out.push(' ');
                out.push_str(&node.token);
                out.push(' ');
                if let Some(r) = node.rhs {
                    self.write_operand(r, node.precedence, true, out, lambda);
                }
            }
            NodeKind::Function if node.is("in") && node.param_count >= 2 => {
                let args = self.arguments(id);
                self.write_operand(args[0], node.precedence, false, out, lambda);
                if let &[sub_query] = &args[1..] {
                    if self[sub_query].kind == NodeKind::Lambda {
                        out.push_str(" in ");
                        self.write_infix(sub_query, out, lambda);
                        return;
                    }
                }
                out.push_str(" in (");
                for (i, &a) in args[1..].iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_infix(a, out, lambda);
                }
                out.push(')');
            }
            NodeKind::Function if node.is("case") => {
                let args = self.arguments(id);
                out.push_str("case");
                let mut i = 0;
                while i + 1 < args.len() {
                    out.push_str(" when ");
                    self.write_infix(args[i], out, lambda);
                    out.push_str(" then ");
                    self.write_infix(args[i + 1], out, lambda);
                    i += 2;
                }
                if i < args.len() {
                    out.push_str(" else ");
                    self.write_infix(args[i], out, lambda);
                }
                out.push_str(" end");
            }
            _ => {
                out.push_str(&node.token);
                out.push('(');
                for (i, a) in self.arguments(id).into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_infix(a, out, lambda);
                }
                out.push(')');
            }
        }
    }

    fn write_operand(
        &self,
        id: NodeId,
        parent_precedence: i32,
        right: bool,
        out: &mut String,
        lambda: &mut dyn FnMut(ModelId, &mut String),
    ) {
        let node = &self[id];
        let binary = node.param_count == 2
            && matches!(node.kind, NodeKind::Operation | NodeKind::SetOperation);
        let wrap = binary
            && (node.precedence > parent_precedence
                || (right && node.precedence == parent_precedence));
        if wrap {
            out.push('(');
        }
        self.write_infix(id, out, lambda);
        if wrap {
            out.push(')');
        }
    }
}

/// Stores `args` on `node` following the operand layout of its arity.
pub fn set_arguments(node: &mut ExprNode, args: &[NodeId]) {
    node.param_count = args.len();
    node.lhs = None;
    node.rhs = None;
    node.args.clear();
    match args {
        [] => {}
        [rhs] => node.rhs = Some(*rhs),
        [lhs, rhs] => {
            node.lhs = Some(*lhs);
            node.rhs = Some(*rhs);
        }
        _ => node.args.extend_from_slice(args),
    }
}

impl Index<NodeId> for ExprArena {
    type Output = ExprNode;

    fn index(&self, id: NodeId) -> &ExprNode {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for ExprArena {
    fn index_mut(&mut self, id: NodeId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }
}

/// Parses a numeric constant token.
pub fn parse_number(token: &str) -> Option<strata_core::Value> {
    use strata_core::Value;
    let t = token.trim_end_matches(['L', 'l']);
    if token.len() != t.len() {
        return t.parse::<i64>().ok().map(Value::Long);
    }
    if let Ok(v) = t.parse::<i32>() {
        return Some(Value::Int(v));
    }
    if let Ok(v) = t.parse::<i64>() {
        return Some(Value::Long(v));
    }
    t.parse::<f64>().ok().map(Value::Double)
}

/// Returns the name part of a possibly qualified column reference.
pub fn column_name(token: &str) -> &str {
    match token.rfind('.') {
        Some(dot) => &token[dot + 1..],
        None => token,
    }
}

/// Returns the qualifier of a column reference, if any.
pub fn column_prefix(token: &str) -> Option<&str> {
    token.rfind('.').map(|dot| &token[..dot])
}

/// Renders a node position and token, for log messages.
pub fn describe(arena: &ExprArena, id: NodeId) -> String {
    let mut s = arena.to_infix(id);
    s.push_str(" @");
    s.push_str(&arena[id].position.to_string());
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_arguments_source_order() {
        let mut arena = ExprArena::new();
        let a = arena.literal("a", 0);
        let b = arena.literal("b", 2);
        let c = arena.literal("c", 4);
        let f = arena.function("f", &[a, b, c], 0);
        assert_eq!(arena.arguments(f), vec![a, b, c]);
        assert_eq!(arena.to_rpn(f), "abcf");
        assert_eq!(arena.to_infix(f), "f(a,b,c)");

        let g = arena.function("g", &[a, b], 0);
        assert_eq!(arena[g].lhs, Some(a));
        assert_eq!(arena.arguments(g), vec![a, b]);
    }

    #[test]
    fn test_infix_parentheses() {
        let mut arena = ExprArena::new();
        let a = arena.literal("a", 0);
        let b = arena.literal("b", 0);
        let c = arena.literal("c", 0);
        let sum = arena.operation("+", a, b, 0);
        let product = arena.operation("*", sum, c, 0);
        assert_eq!(arena.to_infix(product), "(a + b) * c");

        let product = arena.operation("*", b, c, 0);
        let sum = arena.operation("+", a, product, 0);
        assert_eq!(arena.to_infix(sum), "a + b * c");

        let diff = arena.operation("-", b, c, 0);
        let outer = arena.operation("-", a, diff, 0);
        assert_eq!(arena.to_infix(outer), "a - (b - c)");
    }

    #[test]
    fn test_conjuncts_and_copy() {
        let mut arena = ExprArena::new();
        let x = arena.literal("x", 0);
        let y = arena.literal("y", 0);
        let z = arena.literal("z", 0);
        let xy = arena.operation("and", x, y, 0);
        let all = arena.concat_and(Some(xy), z);
        assert_eq!(arena.conjuncts(all), vec![x, y, z]);

        let copy = arena.deep_copy(all);
        assert_ne!(copy, all);
        assert_eq!(arena.to_infix(copy), arena.to_infix(all));
    }

    #[test]
    fn test_post_order_and_replace() {
        let mut arena = ExprArena::new();
        let a = arena.literal("a", 0);
        let b = arena.literal("b", 0);
        let sum = arena.operation("+", a, b, 0);
        let f = arena.function("f", &[sum], 0);
        assert_eq!(arena.post_order(f), vec![a, b, sum, f]);

        let c = arena.literal("c", 0);
        arena.replace_argument(sum, 1, c);
        assert_eq!(arena.to_infix(f), "f(a + c)");

        arena.set_operator(sum, "*");
        assert_eq!(arena[sum].precedence, 3);
    }

    #[test]
    fn test_numbers_and_names() {
        use strata_core::Value;
        assert_eq!(parse_number("42"), Some(Value::Int(42)));
        assert_eq!(parse_number("42L"), Some(Value::Long(42)));
        assert_eq!(parse_number("5000000000"), Some(Value::Long(5_000_000_000)));
        assert_eq!(parse_number("1.5"), Some(Value::Double(1.5)));
        assert_eq!(parse_number("x"), None);
        assert_eq!(column_name("t.x"), "x");
        assert_eq!(column_prefix("t.x"), Some("t"));
        assert_eq!(column_prefix("x"), None);
    }
}
