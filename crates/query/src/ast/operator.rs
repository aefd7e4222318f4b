//! Operator table used by the expression parser and the printer.

/// How many operands an operator takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorKind {
    /// Prefix operator with one operand.
    Unary,
    /// Infix operator with two operands.
    Binary,
    /// Infix operator whose right side can be a parenthesized list.
    Set,
}

/// One SQL operator. Lower precedence binds tighter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operator {
    /// Operator token.
    pub token: &'static str,
    /// Binding strength, lower is tighter.
    pub precedence: i32,
    /// Left associativity.
    pub left_associative: bool,
    /// Operand shape.
    pub kind: OperatorKind,
}

const fn op(token: &'static str, precedence: i32, left: bool, kind: OperatorKind) -> Operator {
    Operator {
        token,
        precedence,
        left_associative: left,
        kind,
    }
}

/// All operators.
pub const OPERATORS: [Operator; 19] = [
    op("^", 2, false, OperatorKind::Binary),
    op("*", 3, true, OperatorKind::Binary),
    op("/", 3, true, OperatorKind::Binary),
    op("%", 3, true, OperatorKind::Binary),
    op("+", 4, true, OperatorKind::Binary),
    op("-", 4, true, OperatorKind::Binary),
    op("<", 6, true, OperatorKind::Binary),
    op("<=", 6, true, OperatorKind::Binary),
    op(">", 6, true, OperatorKind::Binary),
    op(">=", 6, true, OperatorKind::Binary),
    op("=", 7, true, OperatorKind::Binary),
    op("!=", 7, true, OperatorKind::Binary),
    op("~", 7, true, OperatorKind::Binary),
    op("!~", 7, true, OperatorKind::Binary),
    op("like", 7, true, OperatorKind::Binary),
    op("in", 7, true, OperatorKind::Set),
    op("not", 10, false, OperatorKind::Unary),
    op("and", 11, true, OperatorKind::Binary),
    op("or", 12, true, OperatorKind::Binary),
];

/// Looks up an operator by token, ignoring case.
pub fn lookup(token: &str) -> Option<&'static Operator> {
    OPERATORS.iter().find(|o| o.token.eq_ignore_ascii_case(token))
}

/// Returns whether `token` is an operator.
pub fn is_operator(token: &str) -> bool {
    lookup(token).is_some()
}
