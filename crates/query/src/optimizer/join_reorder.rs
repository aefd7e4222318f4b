//! Join graph analysis and table reordering.
//!
//! For every model with more than one join member this pass:
//!
//! 1. Splits the WHERE clause and join criteria into conjuncts. Equalities
//!    between two tables become join edges, single-table conditions are
//!    pushed to their table, everything else is kept as a post-join filter.
//! 2. Merges edges per slave table, deriving `a.x = a.y` filters and new
//!    edges from columns that appear in two edges.
//! 3. Orders tables topologically along the edges, trying each cross-joined
//!    table as the anchor and keeping the cheapest order.
//! 4. Assigns remaining filters to the first point in the order where all
//!    their tables are available, and propagates constants across edges.

use super::{LiteralRefs, OptimizerContext, OptimizerPass};
use crate::ast::NodeId;
use crate::model::{JoinContext, JoinType, ModelId};
use alloc::collections::{BTreeSet, BinaryHeap};
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Reverse;
use hashbrown::HashMap;
use strata_core::{Error, Result};
use tracing::debug;

const CROSS_JOIN_COST: usize = 10;
const JOIN_COST: usize = 5;

/// Reorders join members and places filters.
pub struct JoinReorder;

impl OptimizerPass for JoinReorder {
    fn optimize(&self, cx: &mut OptimizerContext<'_>, model: ModelId) -> Result<ModelId> {
        JoinAnalyser::new(cx).optimize_joins(model)?;
        Ok(model)
    }

    fn name(&self) -> &'static str {
        "join_reorder"
    }
}

/// A column pinned to a constant by `col = K` or `col ~ K`.
#[derive(Clone, Copy, Debug)]
struct ConstantFilter {
    index: usize,
    value: NodeId,
    operator: &'static str,
}

/// Join analysis state of one optimizer run.
struct JoinAnalyser<'c, 'a> {
    cx: &'c mut OptimizerContext<'a>,
    emitted: Vec<JoinContext>,
    deleted: BTreeSet<usize>,
    constants: HashMap<String, ConstantFilter>,
}

impl<'c, 'a> JoinAnalyser<'c, 'a> {
    fn new(cx: &'c mut OptimizerContext<'a>) -> Self {
        Self {
            cx,
            emitted: Vec::new(),
            deleted: BTreeSet::new(),
            constants: HashMap::new(),
        }
    }

    fn optimize_joins(&mut self, model: ModelId) -> Result<()> {
        let joins = self.cx.models[model].join_models.clone();
        if joins.len() > 1 {
            self.build_join_graph(model)?;
            self.reorder_tables(model)?;
            self.assign_filters(model)?;
            self.align_join_clauses(model);
            self.add_transitive_filters(model);
        }

        for jm in joins {
            if let Some(nested) = self.cx.models[jm].nested {
                self.optimize_joins(nested)?;
            }
        }
        Ok(())
    }

    /// Collects the equality edges of the WHERE clause and join criteria
    /// into join contexts and member dependencies.
    fn build_join_graph(&mut self, model: ModelId) -> Result<()> {
        self.emitted.clear();
        let filter = self.cx.models[model].where_clause.take();
        self.process_join_conditions(model, filter)?;
        let joins = self.cx.models[model].join_models.clone();
        for &jm in joins.iter().skip(1) {
            let criteria = self.cx.models[jm].join_criteria;
            self.process_join_conditions(model, criteria)?;
        }

        self.process_emitted_join_clauses(model);
        self.create_implied_dependencies(model);
        self.homogenize_cross_joins(model);
        Ok(())
    }

    fn join_type(&self, parent: ModelId, index: usize) -> JoinType {
        self.cx.models[self.cx.models.join_model(parent, index)].join_type
    }

    fn link_dependencies(&mut self, parent: ModelId, from: usize, to: usize) {
        let jm = self.cx.models.join_model(parent, from);
        self.cx.models[jm].dependencies.insert(to);
    }

    fn unlink_dependencies(&mut self, parent: ModelId, from: usize, to: usize) {
        let jm = self.cx.models.join_model(parent, from);
        self.cx.models[jm].dependencies.remove(&to);
    }

    /// Walks the AND tree of `node`, routing each conjunct.
    fn process_join_conditions(&mut self, parent: ModelId, node: Option<NodeId>) -> Result<()> {
        let Some(node) = node else {
            return Ok(());
        };
        let (token, lhs, rhs) = {
            let n = &self.cx.exprs[node];
            (n.token.to_ascii_lowercase(), n.lhs, n.rhs)
        };
        match token.as_str() {
            "=" => self.analyse_equals(parent, node)?,
            "and" => {
                self.process_join_conditions(parent, lhs)?;
                self.process_join_conditions(parent, rhs)?;
            }
            "~" => {
                self.analyse_regex(parent, node)?;
                self.cx.models[parent].parsed_where.push(node);
            }
            _ => self.cx.models[parent].parsed_where.push(node),
        }
        Ok(())
    }

    fn names_and_indices(&self, parent: ModelId, node: NodeId) -> Result<(LiteralRefs, LiteralRefs)> {
        let (lhs, rhs) = {
            let n = &self.cx.exprs[node];
            (n.lhs, n.rhs)
        };
        let mut a = LiteralRefs::default();
        let mut b = LiteralRefs::default();
        self.cx.collect_literals(parent, lhs, &mut a)?;
        self.cx.collect_literals(parent, rhs, &mut b)?;
        Ok((a, b))
    }

    fn analyse_equals(&mut self, parent: ModelId, node: NodeId) -> Result<()> {
        let (a, b) = self.names_and_indices(parent, node)?;
        let null_count = a.null_count + b.null_count;
        let (lhs, rhs) = {
            let n = &self.cx.exprs[node];
            (n.lhs, n.rhs)
        };

        match a.indexes.len() {
            0 if b.indexes.len() == 1
                && null_count == 0
                && !self.join_type(parent, b.indexes[0]).is_barrier() =>
            {
                let index = b.indexes[0];
                self.pin_constant(parent, node, index, &b.names[0], lhs, "=");
            }
            1 if b.indexes.len() == 1 => {
                let (lhi, rhi) = (a.indexes[0], b.indexes[0]);
                let mut jc = JoinContext::new();
                if lhi == rhi {
                    jc.slave_index = lhi;
                    self.cx.add_join_where(parent, lhi, node);
                } else if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    jc.add_edge((lhi, &a.names[0], lhs), (rhi, &b.names[0], rhs));
                    let (min, max) = (lhi.min(rhi), lhi.max(rhi));
                    jc.slave_index = max;
                    jc.parents.insert(min);
                    self.link_dependencies(parent, min, max);
                }
                self.add_join_context(parent, jc);
            }
            1 if b.indexes.is_empty()
                && null_count == 0
                && !self.join_type(parent, a.indexes[0]).is_barrier() =>
            {
                let index = a.indexes[0];
                self.pin_constant(parent, node, index, &a.names[0], rhs, "=");
            }
            _ => self.cx.models[parent].parsed_where.push(node),
        }
        Ok(())
    }

    /// Pushes a single-table `col = K` to its table and remembers `K`.
    fn pin_constant(
        &mut self,
        parent: ModelId,
        node: NodeId,
        index: usize,
        name: &str,
        value: Option<NodeId>,
        operator: &'static str,
    ) {
        let mut jc = JoinContext::new();
        jc.slave_index = index;
        self.cx.add_join_where(parent, index, node);
        self.add_join_context(parent, jc);
        if let Some(value) = value {
            self.constants.insert(
                name.into(),
                ConstantFilter {
                    index,
                    value,
                    operator,
                },
            );
        }
    }

    fn analyse_regex(&mut self, parent: ModelId, node: NodeId) -> Result<()> {
        let (a, b) = self.names_and_indices(parent, node)?;
        if a.null_count + b.null_count == 0 && a.indexes.len() == 1 && b.indexes.is_empty() {
            if let Some(value) = self.cx.exprs[node].rhs {
                self.constants.insert(
                    a.names[0].clone(),
                    ConstantFilter {
                        index: a.indexes[0],
                        value,
                        operator: "~",
                    },
                );
            }
        }
        Ok(())
    }

    fn add_join_context(&mut self, parent: ModelId, context: JoinContext) {
        let jm = self.cx.models.join_model(parent, context.slave_index);
        let merged = match self.cx.models[jm].context.take() {
            None => context,
            Some(other) => self.merge_contexts(parent, other, context),
        };
        self.cx.models[jm].context = Some(merged);
    }

    /// Merges the edges of `b` into `a`. Two edges sharing a column on one
    /// side imply an edge, or a filter, between their other sides.
    fn merge_contexts(&mut self, parent: ModelId, a: JoinContext, b: JoinContext) -> JoinContext {
        self.deleted.clear();
        let mut r = JoinContext::new();
        r.slave_index = a.slave_index;

        for i in 0..b.len() {
            let ba = (b.a_indexes[i], b.a_names[i].as_str(), b.a_nodes[i]);
            let bb = (b.b_indexes[i], b.b_names[i].as_str(), b.b_nodes[i]);

            for k in 0..a.len() {
                let aa = (a.a_indexes[k], a.a_names[k].as_str(), a.a_nodes[k]);
                let ab = (a.b_indexes[k], a.b_names[k].as_str(), a.b_nodes[k]);

                if aa.0 == ba.0 && aa.1 == ba.1 {
                    self.add_filter_or_emit_join(parent, k, ab, bb);
                    break;
                } else if ab.0 == ba.0 && ab.1 == ba.1 {
                    self.add_filter_or_emit_join(parent, k, aa, bb);
                    break;
                } else if aa.0 == bb.0 && aa.1 == bb.1 {
                    self.add_filter_or_emit_join(parent, k, ab, ba);
                    break;
                } else if ab.0 == bb.0 && ab.1 == bb.1 {
                    self.add_filter_or_emit_join(parent, k, aa, ba);
                    break;
                }
            }

            r.add_edge(ba, bb);
            let (min, max) = (ba.0.min(bb.0), ba.0.max(bb.0));
            r.slave_index = max;
            r.parents.insert(min);
            self.link_dependencies(parent, min, max);
        }

        for i in 0..a.len() {
            let (aai, abi) = (a.a_indexes[i], a.b_indexes[i]);
            let (min, max) = (aai.min(abi), aai.max(abi));
            if self.deleted.contains(&i) {
                if !r.parents.contains(&min) {
                    self.unlink_dependencies(parent, min, max);
                }
            } else {
                r.add_edge(
                    (aai, &a.a_names[i], a.a_nodes[i]),
                    (abi, &a.b_names[i], a.b_nodes[i]),
                );
                r.parents.insert(min);
                self.link_dependencies(parent, min, max);
            }
        }
        r
    }

    fn add_filter_or_emit_join(
        &mut self,
        parent: ModelId,
        idx: usize,
        a: (usize, &str, NodeId),
        b: (usize, &str, NodeId),
    ) {
        self.deleted.insert(idx);
        if a.0 == b.0 && a.1 == b.1 {
            return;
        }

        if a.0 == b.0 {
            let node = self.cx.exprs.operation("=", a.2, b.2, 0);
            self.cx.add_join_where(parent, a.0, node);
        } else {
            let mut jc = JoinContext::new();
            jc.add_edge(a, b);
            jc.slave_index = a.0.max(b.0);
            jc.parents.insert(a.0.min(b.0));
            self.emitted.push(jc);
        }
    }

    /// Merges edges discovered while merging. Edges emitted by these merges
    /// are not revisited.
    fn process_emitted_join_clauses(&mut self, parent: ModelId) {
        let emitted = core::mem::take(&mut self.emitted);
        for jc in emitted {
            self.add_join_context(parent, jc);
        }
    }

    /// An ASOF member always follows the first table.
    fn create_implied_dependencies(&mut self, parent: ModelId) {
        let joins = self.cx.models[parent].join_models.clone();
        for (i, jm) in joins.into_iter().enumerate() {
            if self.cx.models[jm].join_type != JoinType::Asof {
                continue;
            }
            self.link_dependencies(parent, 0, i);
            if self.cx.models[jm].context.is_none() {
                let mut jc = JoinContext::new();
                jc.parents.insert(0);
                jc.slave_index = i;
                self.cx.models[jm].context = Some(jc);
            }
        }
    }

    /// Members with edges are inner joins, members without are cross joins.
    fn homogenize_cross_joins(&mut self, parent: ModelId) {
        let joins = self.cx.models[parent].join_models.clone();
        for jm in joins {
            let m = &mut self.cx.models[jm];
            let has_parents = m.context.as_ref().is_some_and(|c| !c.parents.is_empty());
            match m.join_type {
                JoinType::Cross if has_parents => m.join_type = JoinType::Inner,
                JoinType::Cross | JoinType::Asof => {}
                _ if !has_parents => m.join_type = JoinType::Cross,
                _ => {}
            }
        }
    }

    /// Lets each cross-joined member take over edges of its neighbours,
    /// then keeps the cheapest topological order found.
    fn reorder_tables(&mut self, parent: ModelId) -> Result<usize> {
        let joins = self.cx.models[parent].join_models.clone();
        let n = joins.len();
        let crosses: Vec<usize> = (0..n)
            .filter(|&i| {
                self.cx.models[joins[i]]
                    .context
                    .as_ref()
                    .map_or(true, |c| c.parents.is_empty())
            })
            .collect();

        let limit = self.cx.config.max_join_permutations.max(1);
        let mut cost = usize::MAX;
        for z in 0..crosses.len().min(limit) {
            for (i, &to) in crosses.iter().enumerate() {
                if i == z {
                    continue;
                }
                for k in (0..to).rev() {
                    if !self.swap_join_order(parent, to, k) {
                        break;
                    }
                }
                for k in to + 1..n {
                    if !self.swap_join_order(parent, to, k) {
                        break;
                    }
                }
            }

            let (ordered, this_cost) = self.do_reorder_tables(parent);
            if this_cost < cost {
                cost = this_cost;
                self.cx.models[parent].ordered_join_models = ordered;
            }
        }

        if cost == usize::MAX {
            let position = self.cx.models[parent]
                .alias
                .or(self.cx.models[parent].table_name)
                .map_or(0, |n| self.cx.exprs[n].position);
            return Err(Error::join_cycle(position));
        }
        debug!(
            order = ?self.cx.models[parent].ordered_join_models,
            cost,
            "join order chosen"
        );
        Ok(cost)
    }

    /// Returns false when `from` is a barrier the search may not cross.
    fn swap_join_order(&mut self, parent: ModelId, to: usize, from: usize) -> bool {
        let jm = self.cx.models.join_model(parent, from);
        if self.cx.models[jm].join_type.is_barrier() {
            return false;
        }
        let depends_on_target = self.cx.models[jm]
            .context
            .as_ref()
            .is_some_and(|c| c.parents.contains(&to));
        if depends_on_target {
            self.steal_clauses(parent, jm, to);
        }
        true
    }

    /// Moves the edges of `jm` that touch `to` into the context of `to`,
    /// unless that would leave `jm` without edges.
    fn steal_clauses(&mut self, parent: ModelId, jm: ModelId, to: usize) {
        let Some(that) = self.cx.models[jm].context.take() else {
            return;
        };
        let steal: Vec<usize> = (0..that.len()).filter(|&z| that.touches(z, to)).collect();
        if steal.is_empty() || steal.len() == that.len() {
            self.cx.models[jm].context = Some(that);
            return;
        }

        let target = self.cx.models.join_model(parent, to);
        self.cx.models[target].dependencies.clear();
        let mut jc = self.cx.models[target].context.take().unwrap_or_default();
        jc.slave_index = to;
        let retained = self.move_clauses(parent, &that, &mut jc, &steal);
        self.cx.models[target].context = Some(jc);
        self.cx.models[jm].context = Some(retained);
        if self.cx.models[target].join_type == JoinType::Cross {
            self.cx.models[target].join_type = JoinType::Inner;
        }
    }

    /// Copies edges at `positions` into `to` and returns the rest.
    fn move_clauses(
        &mut self,
        parent: ModelId,
        from: &JoinContext,
        to: &mut JoinContext,
        positions: &[usize],
    ) -> JoinContext {
        let mut result = JoinContext::new();
        result.slave_index = from.slave_index;

        for i in 0..from.len() {
            let t: &mut JoinContext = if positions.contains(&i) { &mut *to } else { &mut result };
            let (ai, bi) = (from.a_indexes[i], from.b_indexes[i]);
            t.add_edge(
                (ai, &from.a_names[i], from.a_nodes[i]),
                (bi, &from.b_names[i], from.b_nodes[i]),
            );
            let (parent_index, child) = if ai != t.slave_index { (ai, bi) } else { (bi, ai) };
            t.parents.insert(parent_index);
            self.link_dependencies(parent, parent_index, child);
        }
        result
    }

    /// Orders members topologically, returning the order and its cost.
    /// A cyclic graph costs `usize::MAX`.
    fn do_reorder_tables(&mut self, parent: ModelId) -> (Vec<usize>, usize) {
        let joins = self.cx.models[parent].join_models.clone();
        let mut ordered = Vec::with_capacity(joins.len());
        let mut pure_crosses = Vec::new();
        let mut ready = BinaryHeap::new();

        for (i, &jm) in joins.iter().enumerate() {
            let m = &mut self.cx.models[jm];
            let is_root = m.join_type == JoinType::Cross
                || m.context.as_ref().map_or(true, |c| c.parents.is_empty());
            if is_root {
                if m.dependencies.is_empty() {
                    pure_crosses.push(i);
                } else {
                    ready.push(Reverse(i));
                }
            } else if let Some(c) = m.context.as_mut() {
                c.in_count = c.parents.len();
            }
        }

        let mut cost = 0;
        while let Some(Reverse(index)) = ready.pop() {
            ordered.push(index);
            let m = &self.cx.models[joins[index]];
            cost += match m.join_type {
                JoinType::Cross => CROSS_JOIN_COST,
                _ => JOIN_COST,
            };

            let dependencies: Vec<usize> = m.dependencies.iter().copied().collect();
            for dep in dependencies {
                if let Some(jc) = self.cx.models[joins[dep]].context.as_mut() {
                    if jc.in_count > 0 {
                        jc.in_count -= 1;
                        if jc.in_count == 0 {
                            ready.push(Reverse(dep));
                        }
                    }
                }
            }
        }

        let unresolved = joins.iter().any(|&jm| {
            self.cx.models[jm]
                .context
                .as_ref()
                .is_some_and(|c| c.in_count > 0)
        });
        if unresolved {
            return (ordered, usize::MAX);
        }

        ordered.extend(pure_crosses);
        (ordered, cost)
    }

    /// Sends each residual filter to its single table, to the constant
    /// filter, or to the first member after which all its tables are joined.
    fn assign_filters(&mut self, parent: ModelId) -> Result<()> {
        let filters = self.cx.models[parent].parsed_where.clone();
        let mut refs = Vec::with_capacity(filters.len());
        for &filter in &filters {
            let mut r = LiteralRefs::default();
            self.cx.collect_literals(parent, Some(filter), &mut r)?;
            refs.push(r);
        }

        let mut removed = alloc::vec![false; filters.len()];
        let mut so_far = BTreeSet::new();
        let ordered = self.cx.models[parent].ordered_join_models.clone();
        for index in ordered {
            so_far.insert(index);
            for (k, &filter) in filters.iter().enumerate() {
                if removed[k] {
                    continue;
                }
                let r = &refs[k];
                if r.indexes.is_empty() {
                    removed[k] = true;
                    let existing = self.cx.models[parent].const_where;
                    let combined = self.cx.exprs.concat_and(existing, filter);
                    self.cx.models[parent].const_where = Some(combined);
                } else if r.indexes.len() == 1
                    && r.null_count == 0
                    && !self.join_type(parent, r.indexes[0]).is_barrier()
                {
                    removed[k] = true;
                    self.cx.add_join_where(parent, r.indexes[0], filter);
                } else if r.indexes.iter().all(|i| so_far.contains(i)) {
                    removed[k] = true;
                    let jm = self.cx.models.join_model(parent, index);
                    let existing = self.cx.models[jm].post_join_where;
                    let combined = self.cx.exprs.concat_and(existing, filter);
                    self.cx.models[jm].post_join_where = Some(combined);
                }
            }
        }
        Ok(())
    }

    /// Puts the slave column on the left of every edge.
    fn align_join_clauses(&mut self, parent: ModelId) {
        let joins = self.cx.models[parent].join_models.clone();
        for jm in joins {
            if let Some(jc) = self.cx.models[jm].context.as_mut() {
                for k in 0..jc.len() {
                    if jc.a_indexes[k] != jc.slave_index {
                        jc.swap_sides(k);
                    }
                }
            }
        }
    }

    /// Derives `a.x = K` from `a.x = b.x` and `b.x = K`.
    fn add_transitive_filters(&mut self, parent: ModelId) {
        let joins = self.cx.models[parent].join_models.clone();
        for jm in joins {
            let Some(jc) = self.cx.models[jm].context.clone() else {
                continue;
            };
            for k in 0..jc.b_names.len() {
                let Some(constant) = self.constants.get(&jc.b_names[k]).copied() else {
                    continue;
                };
                if constant.index != jc.b_indexes[k] {
                    continue;
                }
                let node = self
                    .cx
                    .exprs
                    .operation(constant.operator, jc.a_nodes[k], constant.value, 0);
                self.cx.add_join_where(parent, jc.slave_index, node);
            }
        }
    }
}
