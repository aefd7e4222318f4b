//! Text rendering of model trees.
//!
//! The output is a compact SQL-like form used by `explain` and by tests.
//! Each select layer prints its label (`select-choose`, `select-virtual`,
//! ...), join members print in execution order with their `on` edges, and
//! clauses the optimizer moved around show up where they landed
//! (`post-join-where`, `const-where`).

use super::{JoinType, ModelArena, ModelId, SortOrder};
use crate::ast::{ExprArena, NodeId, NodeKind};
use alloc::string::String;

/// Renders the model tree rooted at `id`.
pub fn to_sink(models: &ModelArena, exprs: &ExprArena, id: ModelId) -> String {
    let mut out = String::new();
    Sink { models, exprs }.model(id, false, &mut out);
    out
}

struct Sink<'a> {
    models: &'a ModelArena,
    exprs: &'a ExprArena,
}

impl Sink<'_> {
    fn node(&self, id: NodeId, out: &mut String) {
        let models = self.models;
        let exprs = self.exprs;
        exprs.write_infix(id, out, &mut |q, out| {
            Sink { models, exprs }.model(q, false, out)
        });
    }

    fn alias(&self, alias: &str, out: &mut String) {
        out.push(' ');
        if alias.contains(' ') {
            out.push('\'');
            out.push_str(alias);
            out.push('\'');
        } else {
            out.push_str(alias);
        }
    }

    fn model(&self, id: ModelId, join_slave: bool, out: &mut String) {
        let model = &self.models[id];
        let exprs = self.exprs;

        if !model.columns.is_empty() {
            out.push_str(model.select_model_type.label());
            out.push(' ');
            for (i, column) in model.columns.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.node(column.ast, out);
                let ast = &exprs[column.ast];
                match &column.analytic {
                    Some(spec) => {
                        self.alias(&column.alias, out);
                        out.push_str(" over (");
                        if !spec.partition_by.is_empty() {
                            out.push_str("partition by ");
                            for (k, &p) in spec.partition_by.iter().enumerate() {
                                if k > 0 {
                                    out.push_str(", ");
                                }
                                self.node(p, out);
                            }
                        }
                        if !spec.order_by.is_empty() {
                            if !spec.partition_by.is_empty() {
                                out.push(' ');
                            }
                            out.push_str("order by ");
                            for (k, &(o, direction)) in spec.order_by.iter().enumerate() {
                                if k > 0 {
                                    out.push_str(", ");
                                }
                                self.node(o, out);
                                if direction == SortOrder::Desc {
                                    out.push_str(" desc");
                                }
                            }
                        }
                        out.push(')');
                    }
                    None => {
                        if ast.kind != NodeKind::Literal || ast.token != column.alias {
                            self.alias(&column.alias, out);
                        }
                    }
                }
            }
            out.push_str(" from ");
        }

        match (model.table_name, model.nested) {
            (Some(table), _) => self.node(table, out),
            (None, Some(nested)) => {
                out.push('(');
                self.model(nested, false, out);
                out.push(')');
            }
            (None, None) => {}
        }
        if let Some(alias) = model.alias {
            self.alias(exprs.token(alias), out);
        }

        if let Some(ts) = model.timestamp {
            out.push_str(" timestamp (");
            self.node(ts, out);
            out.push(')');
        }

        if let Some(latest) = model.latest_by {
            out.push_str(" latest by ");
            self.node(latest, out);
        }

        if model.ordered_join_models.len() > 1 {
            for &index in &model.ordered_join_models {
                let member_id = model.join_models[index];
                if member_id == id {
                    continue;
                }
                let member = &self.models[member_id];
                out.push_str(match member.join_type {
                    JoinType::Outer => " outer join ",
                    JoinType::Asof => " asof join ",
                    JoinType::Cross => " cross join ",
                    JoinType::Inner => " join ",
                });

                if member.where_clause.is_some() {
                    out.push('(');
                    self.model(member_id, true, out);
                    out.push(')');
                    if let Some(name) = member.alias.or(member.table_name) {
                        self.alias(exprs.token(name), out);
                    }
                } else {
                    self.model(member_id, true, out);
                }

                if let Some(jc) = member.context.as_ref().filter(|jc| !jc.is_empty()) {
                    out.push_str(" on ");
                    for k in 0..jc.len() {
                        if k > 0 {
                            out.push_str(" and ");
                        }
                        self.node(jc.a_nodes[k], out);
                        out.push_str(" = ");
                        self.node(jc.b_nodes[k], out);
                    }
                }

                if let Some(post) = member.post_join_where {
                    out.push_str(" post-join-where ");
                    self.node(post, out);
                }
            }
        }

        if let Some(w) = model.where_clause {
            out.push_str(" where ");
            self.node(w, out);
        }

        if let Some(w) = model.const_where {
            out.push_str(" const-where ");
            self.node(w, out);
        }

        if !join_slave {
            if let Some(w) = model.post_join_where {
                out.push_str(" post-join-where ");
                self.node(w, out);
            }
        }

        if let Some(s) = model.sample_by {
            out.push_str(" sample by ");
            self.node(s, out);
        }

        if !model.order_by.is_empty() {
            out.push_str(" order by ");
            for (i, (&o, &direction)) in model
                .order_by
                .iter()
                .zip(&model.order_by_direction)
                .enumerate()
            {
                if i > 0 {
                    out.push_str(", ");
                }
                self.node(o, out);
                if direction == SortOrder::Desc {
                    out.push_str(" desc");
                }
            }
        }

        if model.limit_lo.is_some() || model.limit_hi.is_some() {
            out.push_str(" limit ");
            if let Some(lo) = model.limit_lo {
                self.node(lo, out);
            }
            if let Some(hi) = model.limit_hi {
                out.push(',');
                self.node(hi, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueryColumn, SelectModelType};

    #[test]
    fn test_choose_over_table() {
        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let outer = models.alloc();
        let inner = models.alloc();

        let a = exprs.literal("a", 7);
        let b = exprs.literal("b", 10);
        let x = exprs.literal("x", 12);
        models[outer].add_column(QueryColumn::new("a", a), &exprs);
        models[outer].add_column(QueryColumn::new("my b", b), &exprs);
        models[outer].select_model_type = SelectModelType::Choose;
        models[outer].nested = Some(inner);

        let t = exprs.literal("t", 20);
        let one = exprs.constant("1", 30);
        let filter = exprs.operation(">", x, one, 28);
        models[inner].table_name = Some(t);
        models[inner].where_clause = Some(filter);
        models[inner].add_order_by(x, SortOrder::Desc);
        let ten = exprs.constant("10", 50);
        models[inner].set_limit(Some(ten), None);

        assert_eq!(
            to_sink(&models, &exprs, outer),
            "select-choose a, b 'my b' from (t where x > 1 order by x desc limit 10)"
        );
    }

    #[test]
    fn test_join_members_in_order() {
        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let a = models.alloc();
        let b = models.alloc();
        let ta = exprs.literal("a", 0);
        let tb = exprs.literal("b", 0);
        models[a].table_name = Some(ta);
        models[b].table_name = Some(tb);
        models[b].join_type = JoinType::Cross;
        models[a].join_models.push(b);
        models[a].ordered_join_models = alloc::vec![1, 0];

        assert_eq!(to_sink(&models, &exprs, a), "a cross join b");
    }
}
