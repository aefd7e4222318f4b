//! NOT expression simplification optimization pass.
//!
//! This pass pushes `not` into the expression below it:
//! - Eliminating double negation: `not(not(x))` → `x`
//! - Applying De Morgan's laws: `not(a and b)` → `not(a) or not(b)`
//! - Flipping comparisons: `not(a < b)` → `a >= b`, `not(a = b)` → `a != b`

use super::{OptimizerContext, OptimizerPass};
use crate::ast::{NodeId, NodeKind};
use crate::model::ModelId;
use strata_core::{Error, Result};

/// NOT expression simplification pass.
pub struct NotSimplification;

impl OptimizerPass for NotSimplification {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        self.simplify_model(cx, model)?;
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "not_simplification"
    }
}

impl NotSimplification {
    fn simplify_model(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<()> {
        if let Some(filter) = cx.models[model].where_clause {
            let simplified = self.simplify_expr(cx, filter, false)?;
            cx.models[model].where_clause = Some(simplified);
        }
        if let Some(nested) = cx.models[model].nested {
            self.simplify_model(cx, nested)?;
        }
        let joins = cx.models[model].join_models.clone();
        for &jm in joins.iter().skip(1) {
            self.simplify_model(cx, jm)?;
        }
        Ok(())
    }

    /// Simplifies `node`; `reverse` asks for the negation of `node`.
    pub(crate) fn simplify_expr(
        &self,
        cx: &mut OptimizerContext<'_>,
        node: NodeId,
        reverse: bool,
    ) -> Result<NodeId> {
        let (kind, token, position, lhs, rhs) = {
            let n = &cx.exprs[node];
            (n.kind, n.token.to_ascii_lowercase(), n.position, n.lhs, n.rhs)
        };
        if kind != NodeKind::Operation {
            return Ok(self.negate_if(cx, node, reverse));
        }

        match token.as_str() {
            "not" => {
                let rhs = rhs.ok_or_else(|| Error::parse(position, "Missing right argument"))?;
                if reverse {
                    return self.simplify_expr(cx, rhs, false);
                }
                match cx.exprs[rhs].kind {
                    NodeKind::Literal | NodeKind::Constant => Ok(node),
                    _ => self.simplify_expr(cx, rhs, true),
                }
            }
            "and" | "or" => {
                if reverse {
                    let flipped = if token == "and" { "or" } else { "and" };
                    cx.exprs.set_operator(node, flipped);
                }
                let lhs = lhs.ok_or_else(|| Error::parse(position, "Missing left argument"))?;
                let rhs = rhs.ok_or_else(|| Error::parse(position, "Missing right argument"))?;
                let lhs = self.simplify_expr(cx, lhs, reverse)?;
                let rhs = self.simplify_expr(cx, rhs, reverse)?;
                let n = &mut cx.exprs[node];
                n.lhs = Some(lhs);
                n.rhs = Some(rhs);
                Ok(node)
            }
            op => match inverse_comparison(op) {
                Some(inverse) if lhs.is_some() => {
                    if reverse {
                        cx.exprs.set_operator(node, inverse);
                    }
                    Ok(node)
                }
                _ => Ok(self.negate_if(cx, node, reverse)),
            },
        }
    }

    fn negate_if(&self, cx: &mut OptimizerContext<'_>, node: NodeId, reverse: bool) -> NodeId {
        if reverse {
            let position = cx.exprs[node].position;
            cx.exprs.unary("not", node, position)
        } else {
            node
        }
    }
}

fn inverse_comparison(token: &str) -> Option<&'static str> {
    match token {
        ">" => Some("<="),
        ">=" => Some("<"),
        "<" => Some(">="),
        "<=" => Some(">"),
        "=" => Some("!="),
        "!=" => Some("="),
        _ => None,
    }
}
