//! Operator precedence expression parser.
//!
//! Tokens are converted to reverse Polish order with a shunting-yard loop and
//! assembled into trees as they are emitted. Literals wait on the operator
//! stack so that a following `(` can turn them into function calls. `case`
//! sits on the stack like a function whose arguments are separated by the
//! `when`, `then` and `else` keywords and closed by `end`.
//!
//! The parser stops, leaving the token unread, at the first token that
//! cannot continue the expression: a comma or `)` outside of brackets, or a
//! literal or constant right after an operand.

use super::SqlParser;
use crate::ast::{operator, ExprNode, NodeId, NodeKind, OperatorKind};
use alloc::vec::Vec;
use strata_core::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Branch {
    None,
    Comma,
    LeftBrace,
    RightBrace,
    Constant,
    Operator,
    Literal,
    Lambda,
    CaseControl,
}

impl Branch {
    /// Returns whether an operand may not follow this branch.
    fn ends_operand(self) -> bool {
        matches!(
            self,
            Branch::RightBrace | Branch::Constant | Branch::Literal | Branch::Lambda
        )
    }
}

#[derive(Clone, Copy, Debug)]
enum Pending {
    /// Opening bracket and its position.
    Brace(usize),
    Node(NodeId),
}

fn missing_arguments(position: usize) -> Error {
    Error::parse(position, "missing arguments")
}

fn case_keyword(text: &str) -> Option<u8> {
    if text.eq_ignore_ascii_case("when") {
        Some(0)
    } else if text.eq_ignore_ascii_case("then") {
        Some(1)
    } else if text.eq_ignore_ascii_case("else") {
        Some(2)
    } else {
        None
    }
}

impl<'a, 'c> SqlParser<'a, 'c> {
    /// Parses one expression and returns every tree left on the output
    /// stack. Well formed input leaves exactly one; a bracketed list such
    /// as `(a, b)` leaves one per element.
    pub(crate) fn parse_expr(&mut self) -> Result<Vec<NodeId>> {
        let mut ops: Vec<Pending> = Vec::new();
        let mut params: Vec<usize> = Vec::new();
        let mut out: Vec<NodeId> = Vec::new();

        let mut param_count = 0usize;
        let mut brace_count = 0usize;
        let mut case_count = 0usize;
        let mut this_branch = Branch::None;

        while let Some(tok) = self.lexer.next_token()? {
            let prev_branch = this_branch;
            let position = tok.position;
            let first = tok.first_char();

            match first {
                ',' => {
                    if matches!(prev_branch, Branch::Comma | Branch::LeftBrace) {
                        return Err(missing_arguments(position));
                    }
                    this_branch = Branch::Comma;
                    if brace_count == 0 {
                        self.lexer.unparse();
                        break;
                    }
                    self.pop_until_brace(&mut ops, &mut out);
                    param_count += 1;
                    continue;
                }
                '(' => {
                    this_branch = Branch::LeftBrace;
                    brace_count += 1;
                    params.push(param_count);
                    param_count = 0;
                    ops.push(Pending::Brace(position));
                    continue;
                }
                ')' => {
                    if prev_branch == Branch::Comma {
                        return Err(missing_arguments(position));
                    }
                    if brace_count == 0 {
                        self.lexer.unparse();
                        break;
                    }
                    this_branch = Branch::RightBrace;
                    brace_count -= 1;
                    self.pop_until_brace(&mut ops, &mut out);
                    // drop the bracket itself
                    ops.pop();

                    if let Some(&Pending::Node(top)) = ops.last() {
                        let node = &mut self.exprs[top];
                        if matches!(node.kind, NodeKind::Literal | NodeKind::SetOperation) {
                            let own = if node.param_count == 2 { 1 } else { 0 };
                            node.param_count = if prev_branch == Branch::LeftBrace {
                                0
                            } else {
                                param_count + 1
                            } + own;
                            node.kind = NodeKind::Function;
                            ops.pop();
                            self.emit(&mut out, top);
                        }
                    }
                    if let Some(p) = params.pop() {
                        param_count = p;
                    }
                    continue;
                }
                _ => {}
            }

            if tok.is("select") {
                this_branch = Branch::Lambda;
                self.lexer.unparse();
                let query = self.parse_dml(true)?;
                let lambda = self.exprs.lambda(query, position);
                self.emit(&mut out, lambda);
                continue;
            }

            if first.is_ascii_digit() || first == '"' || first == '\'' {
                if prev_branch.ends_operand() {
                    self.lexer.unparse();
                    break;
                }
                this_branch = Branch::Constant;
                let id = self.exprs.constant(tok.text, position);
                self.emit(&mut out, id);
                continue;
            }

            if tok.is("nan") || tok.is("null") || tok.is("true") || tok.is("false") {
                this_branch = Branch::Constant;
                let id = self.exprs.constant(tok.text, position);
                self.emit(&mut out, id);
                continue;
            }

            if let Some(op) = operator::lookup(tok.text) {
                this_branch = Branch::Operator;
                let unary = op.kind == OperatorKind::Unary
                    || (tok.text == "-"
                        && matches!(
                            prev_branch,
                            Branch::Operator | Branch::LeftBrace | Branch::Comma | Branch::None
                        ));

                // unary operators never pop binary ones, which keeps -a^b intact
                while let Some(&Pending::Node(other)) = ops.last() {
                    let other = &self.exprs[other];
                    let binds = (op.left_associative && op.precedence >= other.precedence)
                        || (!op.left_associative && op.precedence > other.precedence);
                    if binds && (!unary || other.param_count == 1) {
                        if let Some(Pending::Node(id)) = ops.pop() {
                            self.emit(&mut out, id);
                        }
                    } else {
                        break;
                    }
                }

                let kind = if op.kind == OperatorKind::Set {
                    NodeKind::SetOperation
                } else {
                    NodeKind::Operation
                };
                let mut node = ExprNode::new(kind, op.token, op.precedence, position);
                node.param_count = if unary { 1 } else { 2 };
                let id = self.exprs.push(node);
                ops.push(Pending::Node(id));
                continue;
            }

            if case_count == 0 && prev_branch.ends_operand() {
                // an operand right after an operand ends the expression
                self.lexer.unparse();
                break;
            }

            this_branch = Branch::Literal;

            if tok.is("case") {
                case_count += 1;
                params.push(param_count);
                param_count = 0;
                let id = self
                    .exprs
                    .push(ExprNode::new(NodeKind::Function, "case", i32::MAX, position));
                ops.push(Pending::Node(id));
                continue;
            }

            if case_count > 0 {
                if tok.is("end") {
                    if prev_branch == Branch::CaseControl {
                        return Err(missing_arguments(position));
                    }
                    let case = self.pop_until_case(&mut ops, &mut out);
                    if let Some(case) = case {
                        ops.pop();
                        self.exprs[case].param_count = param_count;
                        self.emit(&mut out, case);
                    }
                    if let Some(p) = params.pop() {
                        param_count = p;
                    }
                    case_count -= 1;
                    continue;
                }

                if let Some(keyword) = case_keyword(tok.text) {
                    if prev_branch == Branch::CaseControl {
                        return Err(missing_arguments(position));
                    }
                    match keyword {
                        // when, else
                        0 | 2 if param_count % 2 != 0 => {
                            return Err(Error::parse(position, "'then' expected"));
                        }
                        1 if param_count % 2 == 0 => {
                            return Err(Error::parse(position, "'when' expected"));
                        }
                        _ => {}
                    }
                    self.pop_until_case(&mut ops, &mut out);
                    param_count += 1;
                    this_branch = Branch::CaseControl;
                    continue;
                }
            }

            let id = self
                .exprs
                .push(ExprNode::new(NodeKind::Literal, tok.text, i32::MIN, position));
            ops.push(Pending::Node(id));
        }

        while let Some(pending) = ops.pop() {
            match pending {
                Pending::Brace(position) => return Err(Error::unbalanced(position, "(")),
                Pending::Node(id) => {
                    let node = &self.exprs[id];
                    if node.kind == NodeKind::Function && node.is("case") {
                        return Err(Error::unbalanced(node.position, "'case'"));
                    }
                    self.emit(&mut out, id);
                }
            }
        }

        Ok(out)
    }

    fn pop_until_brace(&mut self, ops: &mut Vec<Pending>, out: &mut Vec<NodeId>) {
        while let Some(&Pending::Node(id)) = ops.last() {
            ops.pop();
            self.emit(out, id);
        }
    }

    /// Emits operators down to the innermost `case`, which stays on the stack.
    fn pop_until_case(&mut self, ops: &mut Vec<Pending>, out: &mut Vec<NodeId>) -> Option<NodeId> {
        while let Some(&Pending::Node(id)) = ops.last() {
            let node = &self.exprs[id];
            if node.kind == NodeKind::Function && node.is("case") {
                return Some(id);
            }
            ops.pop();
            self.emit(out, id);
        }
        None
    }

    /// Attaches operands to `id` from the output stack and pushes it.
    fn emit(&mut self, out: &mut Vec<NodeId>, id: NodeId) {
        let count = self.exprs[id].param_count;
        match count {
            0 => {}
            1 => {
                let rhs = out.pop();
                self.exprs[id].rhs = rhs;
            }
            2 => {
                let rhs = out.pop();
                let lhs = out.pop();
                let node = &mut self.exprs[id];
                node.rhs = rhs;
                node.lhs = lhs;
            }
            _ => {
                let split = out.len().saturating_sub(count);
                let args = out.split_off(split);
                self.exprs[id].args = args;
            }
        }
        // literals, calls and case carry stack sentinels until emitted
        let node = &mut self.exprs[id];
        if node.precedence == i32::MIN || node.precedence == i32::MAX {
            node.precedence = 0;
        }
        out.push(id);
    }
}
