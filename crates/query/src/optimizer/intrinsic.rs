//! Intrinsic predicate extraction.
//!
//! Walks the AND-tree of a WHERE clause and lifts out the conjuncts a table
//! scan can answer without evaluating them per row:
//!
//! - `key = 'v'`, `key in ('a', 'b')` and `key in (select ...)` on an
//!   indexed column become index key lookups,
//! - comparisons of the designated timestamp with date constants, and
//!   `ts in ('lo', 'hi')`, narrow the scanned intervals,
//! - `key != 'v'` and `not (key in (...))` remove values from the key set.
//!
//! Consumed conjuncts are tracked in a mark set kept by the analyser; the
//! expression tree itself is not annotated. What remains becomes the
//! residual filter of the returned [`IntrinsicModel`].

use crate::ast::{ExprArena, NodeId, NodeKind};
use crate::lexer::unquote;
use crate::model::interval::parse_timestamp;
use crate::model::{IntrinsicModel, IntrinsicValue, QueryModel};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashSet;
use strata_core::schema::RecordMetadata;
use strata_core::{Error, Result};

/// Maps a column alias used in a filter to the underlying column name.
pub trait AliasTranslator {
    fn translate<'a>(&'a self, alias: &'a str) -> &'a str;
}

impl AliasTranslator for QueryModel {
    fn translate<'a>(&'a self, alias: &'a str) -> &'a str {
        self.translate_alias(alias).unwrap_or(alias)
    }
}

/// Resolves nothing; every name is a column name.
pub struct IdentityTranslator;

impl AliasTranslator for IdentityTranslator {
    fn translate<'a>(&'a self, alias: &'a str) -> &'a str {
        alias
    }
}

/// Extracts an [`IntrinsicModel`] from a WHERE clause.
///
/// One analyser can serve any number of extractions; its scratch state is
/// reset on every call.
#[derive(Default)]
pub struct QueryFilterAnalyser {
    /// Conjuncts answered by the model.
    consumed: HashSet<NodeId>,
    /// Conjuncts that contributed to the current key set.
    key_nodes: Vec<NodeId>,
    /// `!=` and `not in` conjuncts applied after the key column is settled.
    key_excl_nodes: Vec<NodeId>,
    temp_keys: Vec<Option<String>>,
    temp_positions: Vec<usize>,
    timestamp: Option<String>,
    preferred_key_column: Option<String>,
}

/// Operand view of a binary node.
struct Operand<'e> {
    kind: NodeKind,
    token: &'e str,
    position: usize,
}

impl QueryFilterAnalyser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyses `node` against the columns of `metadata`.
    ///
    /// `preferred_key_column` restricts key extraction to one column, as
    /// needed by `latest by`. `timestamp_index` names the column intervals
    /// apply to; without it no intervals are extracted.
    pub fn extract(
        &mut self,
        exprs: &mut ExprArena,
        translator: &dyn AliasTranslator,
        node: NodeId,
        metadata: &dyn RecordMetadata,
        preferred_key_column: Option<&str>,
        timestamp_index: Option<usize>,
    ) -> Result<IntrinsicModel> {
        self.reset();
        self.timestamp = timestamp_index.map(|i| metadata.column_name(i).to_string());
        self.preferred_key_column = preferred_key_column.map(ToString::to_string);

        let mut model = IntrinsicModel::new();
        if self.remove_and_intrinsics(exprs, translator, &mut model, node, metadata)? {
            return Ok(model);
        }

        // pre-order walk of the AND tree
        let mut stack = Vec::new();
        let mut current = Some(node);
        while current.is_some() || !stack.is_empty() {
            match current {
                Some(n) if exprs[n].is("and") => {
                    let (lhs, rhs) = (exprs[n].lhs, exprs[n].rhs);
                    if let Some(rhs) = rhs {
                        if !self.remove_and_intrinsics(exprs, translator, &mut model, rhs, metadata)? {
                            stack.push(rhs);
                        }
                    }
                    current = match lhs {
                        Some(lhs)
                            if !self.remove_and_intrinsics(
                                exprs, translator, &mut model, lhs, metadata,
                            )? =>
                        {
                            Some(lhs)
                        }
                        _ => None,
                    };
                }
                _ => current = stack.pop(),
            }
        }

        self.apply_key_exclusions(exprs, translator, &mut model);
        model.filter = self.collapse_intrinsic_nodes(exprs, Some(node));
        Ok(model)
    }

    fn reset(&mut self) {
        self.consumed.clear();
        self.key_nodes.clear();
        self.key_excl_nodes.clear();
        self.temp_keys.clear();
        self.temp_positions.clear();
    }

    fn remove_and_intrinsics(
        &mut self,
        exprs: &ExprArena,
        translator: &dyn AliasTranslator,
        model: &mut IntrinsicModel,
        node: NodeId,
        metadata: &dyn RecordMetadata,
    ) -> Result<bool> {
        let token = exprs[node].token.to_ascii_lowercase();
        match token.as_str() {
            "in" => self.analyze_in(exprs, translator, model, node, metadata),
            ">" => self.analyze_greater(exprs, model, node, 1),
            ">=" => self.analyze_greater(exprs, model, node, 0),
            "<" => self.analyze_less(exprs, model, node, 1),
            "<=" => self.analyze_less(exprs, model, node, 0),
            "=" => self.analyze_equals(exprs, translator, model, node, metadata),
            "!=" => self.analyze_not_equals(exprs, translator, model, node, metadata),
            "not" => match exprs[node].rhs {
                Some(rhs) if exprs[rhs].is("in") => {
                    self.analyze_not_in(exprs, translator, model, node, metadata)
                }
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }

    fn operands<'e>(&self, exprs: &'e ExprArena, node: NodeId) -> Result<(Operand<'e>, Operand<'e>)> {
        let n = &exprs[node];
        match (n.lhs, n.rhs) {
            (Some(lhs), Some(rhs)) => Ok((operand(exprs, lhs), operand(exprs, rhs))),
            _ => Err(Error::parse(n.position, "Argument expected")),
        }
    }

    fn is_timestamp(&self, token: &str) -> bool {
        self.timestamp.as_deref() == Some(token)
    }

    fn preferred_allows(&self, column: &str) -> bool {
        self.preferred_key_column
            .as_deref()
            .map_or(true, |preferred| preferred == column)
    }

    /// Returns whether `column` should replace the current key column.
    /// Fewer buckets mean fewer rows per key; ties keep the current column.
    ///
    /// Conjuncts are visited right operand first, so on a tie the key is the
    /// column of the rightmost equality: `sym = 'A' and mkt = 'M'` keys on
    /// `mkt`.
    fn is_more_selective(
        &self,
        model: &IntrinsicModel,
        metadata: &dyn RecordMetadata,
        index: usize,
        column: &str,
    ) -> bool {
        match model.key_column.as_deref() {
            None => true,
            Some(key) if key == column => true,
            Some(key) => match metadata.column_index_quiet(key) {
                Some(key_index) => metadata.bucket_count(index) < metadata.bucket_count(key_index),
                None => true,
            },
        }
    }

    fn revert_key_nodes(&mut self) {
        for node in self.key_nodes.drain(..) {
            self.consumed.remove(&node);
        }
    }

    fn resolve_indexed_column<'t>(
        &self,
        translator: &'t dyn AliasTranslator,
        metadata: &dyn RecordMetadata,
        literal: &Operand<'t>,
    ) -> Result<Option<(usize, &'t str)>> {
        let column = translator.translate(literal.token);
        let index = metadata
            .column_index_quiet(column)
            .ok_or_else(|| Error::invalid_column(literal.position, literal.token))?;
        if metadata.column_type(index).is_indexable() && metadata.is_indexed(index) {
            Ok(Some((index, column)))
        } else {
            Ok(None)
        }
    }

    fn analyze_equals(
        &mut self,
        exprs: &ExprArena,
        translator: &dyn AliasTranslator,
        model: &mut IntrinsicModel,
        node: NodeId,
        metadata: &dyn RecordMetadata,
    ) -> Result<bool> {
        let (lhs, rhs) = self.operands(exprs, node)?;
        Ok(self.analyze_equals0(translator, model, node, &lhs, &rhs, metadata)?
            || self.analyze_equals0(translator, model, node, &rhs, &lhs, metadata)?)
    }

    fn analyze_equals0(
        &mut self,
        translator: &dyn AliasTranslator,
        model: &mut IntrinsicModel,
        node: NodeId,
        a: &Operand<'_>,
        b: &Operand<'_>,
        metadata: &dyn RecordMetadata,
    ) -> Result<bool> {
        if a.token == b.token {
            self.consumed.insert(node);
            return Ok(true);
        }
        if a.kind != NodeKind::Literal || b.kind != NodeKind::Constant {
            return Ok(false);
        }

        if self.is_timestamp(a.token) {
            model.intersect_interval_text(unquote(b.token), b.position)?;
            self.consumed.insert(node);
            return Ok(true);
        }

        let Some((index, column)) = self.resolve_indexed_column(translator, metadata, a)? else {
            return Ok(false);
        };
        if !self.preferred_allows(column) {
            return Ok(false);
        }
        let new_column = model.key_column.as_deref() != Some(column);
        if new_column && !self.is_more_selective(model, metadata, index, column) {
            return Ok(false);
        }

        let value = key_value(b.token);
        if new_column {
            model.key_column = Some(column.to_string());
            model.key_values.clear();
            model.key_value_positions.clear();
            model.key_values.push(value);
            model.key_value_positions.push(b.position);
            model.key_values_is_lambda = false;
            model.key_values_lambda = None;
            self.revert_key_nodes();
        } else if model.key_values.contains(&value) {
            model.key_values.clear();
            model.key_value_positions.clear();
            model.key_values.push(value);
            model.key_value_positions.push(b.position);
        } else {
            model.intrinsic_value = IntrinsicValue::False;
            return Ok(false);
        }

        self.key_nodes.push(node);
        self.consumed.insert(node);
        Ok(true)
    }

    fn analyze_greater(
        &mut self,
        exprs: &ExprArena,
        model: &mut IntrinsicModel,
        node: NodeId,
        increment: i64,
    ) -> Result<bool> {
        let (lhs, rhs) = self.operands(exprs, node)?;
        if lhs.token == rhs.token {
            model.intrinsic_value = IntrinsicValue::False;
            return Ok(false);
        }
        if self.timestamp.is_none() {
            return Ok(false);
        }

        if lhs.kind == NodeKind::Literal && self.is_timestamp(lhs.token) {
            if rhs.kind != NodeKind::Constant {
                return Ok(false);
            }
            let lo = parse_timestamp(unquote(rhs.token), rhs.position)?;
            model.intersect_intervals(lo.saturating_add(increment), i64::MAX);
            self.consumed.insert(node);
            return Ok(true);
        }

        if rhs.kind == NodeKind::Literal && self.is_timestamp(rhs.token) {
            if lhs.kind != NodeKind::Constant {
                return Ok(false);
            }
            let hi = parse_timestamp(unquote(lhs.token), lhs.position)?;
            model.intersect_intervals(i64::MIN, hi.saturating_sub(increment));
            self.consumed.insert(node);
            return Ok(true);
        }
        Ok(false)
    }

    fn analyze_less(
        &mut self,
        exprs: &ExprArena,
        model: &mut IntrinsicModel,
        node: NodeId,
        increment: i64,
    ) -> Result<bool> {
        let (lhs, rhs) = self.operands(exprs, node)?;
        if lhs.token == rhs.token {
            model.intrinsic_value = IntrinsicValue::False;
            return Ok(false);
        }
        if self.timestamp.is_none() {
            return Ok(false);
        }

        if lhs.kind == NodeKind::Literal && self.is_timestamp(lhs.token) {
            if rhs.kind != NodeKind::Constant {
                return Ok(false);
            }
            let hi = parse_timestamp(unquote(rhs.token), rhs.position)?;
            model.intersect_intervals(i64::MIN, hi.saturating_sub(increment));
            self.consumed.insert(node);
            return Ok(true);
        }

        if rhs.kind == NodeKind::Literal && self.is_timestamp(rhs.token) {
            if lhs.kind != NodeKind::Constant {
                return Ok(false);
            }
            let lo = parse_timestamp(unquote(lhs.token), lhs.position)?;
            model.intersect_intervals(lo.saturating_add(increment), i64::MAX);
            self.consumed.insert(node);
            return Ok(true);
        }
        Ok(false)
    }

    /// Returns the column operand of an `in` node after validating it.
    fn in_column<'e>(
        &self,
        exprs: &'e ExprArena,
        translator: &'e dyn AliasTranslator,
        node: NodeId,
        metadata: &dyn RecordMetadata,
    ) -> Result<(Operand<'e>, &'e str)> {
        let n = &exprs[node];
        if n.param_count < 2 {
            return Err(Error::parse(n.position, "Too few arguments for 'in'"));
        }
        let col = exprs
            .arguments(node)
            .first()
            .map(|&c| operand(exprs, c))
            .ok_or_else(|| Error::parse(n.position, "Too few arguments for 'in'"))?;
        if col.kind != NodeKind::Literal {
            return Err(Error::parse(col.position, "Column name expected"));
        }
        let column = translator.translate(col.token);
        if metadata.column_index_quiet(column).is_none() {
            return Err(Error::invalid_column(col.position, col.token));
        }
        Ok((col, column))
    }

    fn analyze_in(
        &mut self,
        exprs: &ExprArena,
        translator: &dyn AliasTranslator,
        model: &mut IntrinsicModel,
        node: NodeId,
        metadata: &dyn RecordMetadata,
    ) -> Result<bool> {
        let (col, column) = self.in_column(exprs, translator, node, metadata)?;
        if self.is_timestamp(col.token) {
            return match interval_bounds(exprs, node)? {
                Some(TimestampBounds::Range(lo, hi)) => {
                    model.intersect_intervals(lo, hi);
                    self.consumed.insert(node);
                    Ok(true)
                }
                Some(TimestampBounds::Literal(text, position)) => {
                    model.intersect_interval_text(&text, position)?;
                    self.consumed.insert(node);
                    Ok(true)
                }
                None => Ok(false),
            };
        }
        Ok(self.analyze_list_of_values(exprs, model, column, node, metadata)
            || self.analyze_in_lambda(exprs, model, column, node, metadata)?)
    }

    fn analyze_list_of_values(
        &mut self,
        exprs: &ExprArena,
        model: &mut IntrinsicModel,
        column: &str,
        node: NodeId,
        metadata: &dyn RecordMetadata,
    ) -> bool {
        let Some(index) = metadata.column_index_quiet(column) else {
            return false;
        };
        if !metadata.is_indexed(index) || !self.preferred_allows(column) {
            return false;
        }
        let new_column = model.key_column.as_deref() != Some(column);
        if new_column && !self.is_more_selective(model, metadata, index, column) {
            return false;
        }

        self.temp_keys.clear();
        self.temp_positions.clear();
        for &value in exprs.arguments(node).iter().skip(1) {
            let v = &exprs[value];
            if v.kind != NodeKind::Constant {
                return false;
            }
            let key = key_value(&v.token);
            if !self.temp_keys.contains(&key) {
                self.temp_keys.push(key);
                self.temp_positions.push(v.position);
            }
        }

        if new_column {
            model.key_column = Some(column.to_string());
            model.key_values = core::mem::take(&mut self.temp_keys);
            model.key_value_positions = core::mem::take(&mut self.temp_positions);
            model.key_values_is_lambda = false;
            model.key_values_lambda = None;
            self.revert_key_nodes();
        } else if !model.key_values_is_lambda {
            self.replace_all_with_overlap(model);
        } else {
            return false;
        }
        self.key_nodes.push(node);
        self.consumed.insert(node);
        true
    }

    fn replace_all_with_overlap(&mut self, model: &mut IntrinsicModel) {
        let mut keys = Vec::new();
        let mut positions = Vec::new();
        for (key, &position) in self.temp_keys.iter().zip(&self.temp_positions) {
            if model.key_values.contains(key) && !keys.contains(key) {
                keys.push(key.clone());
                positions.push(position);
            }
        }
        if keys.is_empty() {
            model.intrinsic_value = IntrinsicValue::False;
        } else {
            model.key_values = keys;
            model.key_value_positions = positions;
        }
    }

    fn analyze_in_lambda(
        &mut self,
        exprs: &ExprArena,
        model: &mut IntrinsicModel,
        column: &str,
        node: NodeId,
        metadata: &dyn RecordMetadata,
    ) -> Result<bool> {
        let Some(index) = metadata.column_index_quiet(column) else {
            return Ok(false);
        };
        if !metadata.is_indexed(index) || !self.preferred_allows(column) {
            return Ok(false);
        }
        let n = &exprs[node];
        let Some(lambda) = n.rhs.filter(|&r| exprs[r].kind == NodeKind::Lambda) else {
            return Ok(false);
        };
        let same_column = model.key_column.as_deref() == Some(column);
        if !same_column && !self.is_more_selective(model, metadata, index, column) {
            return Ok(false);
        }
        if same_column && model.key_values_is_lambda {
            return Err(Error::constraint(
                n.position,
                "Multiple lambda expressions not supported",
            ));
        }

        model.key_values.clear();
        model.key_value_positions.clear();
        model.key_value_positions.push(n.position);
        model.key_values_is_lambda = true;
        model.key_values_lambda = Some(lambda);
        model.key_column = Some(column.to_string());
        self.revert_key_nodes();
        self.key_nodes.push(node);
        self.consumed.insert(node);
        Ok(true)
    }

    fn analyze_not_equals(
        &mut self,
        exprs: &ExprArena,
        translator: &dyn AliasTranslator,
        model: &mut IntrinsicModel,
        node: NodeId,
        metadata: &dyn RecordMetadata,
    ) -> Result<bool> {
        let (lhs, rhs) = self.operands(exprs, node)?;
        Ok(self.analyze_not_equals0(translator, model, node, &lhs, &rhs, metadata)?
            || self.analyze_not_equals0(translator, model, node, &rhs, &lhs, metadata)?)
    }

    fn analyze_not_equals0(
        &mut self,
        translator: &dyn AliasTranslator,
        model: &mut IntrinsicModel,
        node: NodeId,
        a: &Operand<'_>,
        b: &Operand<'_>,
        metadata: &dyn RecordMetadata,
    ) -> Result<bool> {
        if a.token == b.token {
            model.intrinsic_value = IntrinsicValue::False;
            return Ok(true);
        }
        if a.kind != NodeKind::Literal || b.kind != NodeKind::Constant {
            return Ok(false);
        }

        if self.is_timestamp(a.token) {
            model.subtract_interval_text(unquote(b.token), b.position)?;
            self.consumed.insert(node);
            return Ok(true);
        }

        if let Some((_, column)) = self.resolve_indexed_column(translator, metadata, a)? {
            if self.preferred_allows(column) {
                self.key_excl_nodes.push(node);
            }
        }
        Ok(false)
    }

    fn analyze_not_in(
        &mut self,
        exprs: &ExprArena,
        translator: &dyn AliasTranslator,
        model: &mut IntrinsicModel,
        not_node: NodeId,
        metadata: &dyn RecordMetadata,
    ) -> Result<bool> {
        let Some(node) = exprs[not_node].rhs else {
            return Ok(false);
        };
        let (col, column) = self.in_column(exprs, translator, node, metadata)?;

        if self.is_timestamp(col.token) {
            let subtracted = match interval_bounds(exprs, node)? {
                Some(TimestampBounds::Range(lo, hi)) => {
                    model.subtract_intervals(lo, hi);
                    true
                }
                Some(TimestampBounds::Literal(text, position)) => {
                    model.subtract_interval_text(&text, position)?;
                    true
                }
                None => false,
            };
            if subtracted {
                self.consumed.insert(node);
                self.consumed.insert(not_node);
                return Ok(true);
            }
        }

        if let Some(index) = metadata.column_index_quiet(column) {
            if metadata.column_type(index).is_indexable()
                && metadata.is_indexed(index)
                && self.preferred_allows(column)
            {
                self.key_excl_nodes.push(not_node);
            }
        }
        Ok(false)
    }

    /// Removes excluded values once the key column is known.
    fn apply_key_exclusions(
        &mut self,
        exprs: &ExprArena,
        translator: &dyn AliasTranslator,
        model: &mut IntrinsicModel,
    ) {
        let exclusions = core::mem::take(&mut self.key_excl_nodes);
        let Some(key_column) = model.key_column.clone() else {
            return;
        };
        if model.key_values_is_lambda {
            return;
        }

        for parent in exclusions {
            let node = match exprs[parent].rhs {
                Some(rhs) if exprs[parent].is("not") => rhs,
                _ => parent,
            };
            let args = exprs.arguments(node);
            let (col, values): (NodeId, Vec<NodeId>) = match args.as_slice() {
                [lhs, rhs] if exprs[*lhs].kind == NodeKind::Literal => (*lhs, alloc::vec![*rhs]),
                [lhs, rhs] => (*rhs, alloc::vec![*lhs]),
                [col, rest @ ..] if !rest.is_empty() => (*col, rest.to_vec()),
                _ => continue,
            };
            if translator.translate(&exprs[col].token) != key_column {
                continue;
            }
            for value in values {
                model.exclude_value(&key_value(&exprs[value].token));
                if model.intrinsic_value == IntrinsicValue::False {
                    return;
                }
            }
            self.consumed.insert(parent);
        }
    }

    /// Rebuilds the AND tree without consumed conjuncts.
    fn collapse_intrinsic_nodes(&self, exprs: &mut ExprArena, node: Option<NodeId>) -> Option<NodeId> {
        let node = node?;
        if self.consumed.contains(&node) {
            return None;
        }
        if !exprs[node].is("and") {
            return Some(node);
        }
        let (lhs, rhs, position) = {
            let n = &exprs[node];
            (n.lhs, n.rhs, n.position)
        };
        let l = self.collapse_intrinsic_nodes(exprs, lhs);
        let r = self.collapse_intrinsic_nodes(exprs, rhs);
        match (l, r) {
            (Some(l), Some(r)) if Some(l) == lhs && Some(r) == rhs => Some(node),
            (Some(l), Some(r)) => Some(exprs.operation("and", l, r, position)),
            (Some(x), None) | (None, Some(x)) => Some(x),
            (None, None) => None,
        }
    }
}

fn operand(exprs: &ExprArena, id: NodeId) -> Operand<'_> {
    let n = &exprs[id];
    Operand {
        kind: n.kind,
        token: &n.token,
        position: n.position,
    }
}

/// Key value of a constant token; `null` is the absent value.
fn key_value(token: &str) -> Option<String> {
    if token.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(unquote(token).to_string())
    }
}

enum TimestampBounds {
    /// `ts in ('lo', 'hi')`
    Range(i64, i64),
    /// `ts in ('2018-01;1d;1M;3')`
    Literal(String, usize),
}

/// Reads the bounds of `ts in (...)`. Returns None when an operand is not
/// a constant.
fn interval_bounds(exprs: &ExprArena, node: NodeId) -> Result<Option<TimestampBounds>> {
    let n = &exprs[node];
    let args = exprs.arguments(node);
    match args.len() {
        2 => {
            let v = &exprs[args[1]];
            if v.kind != NodeKind::Constant {
                return Ok(None);
            }
            Ok(Some(TimestampBounds::Literal(
                unquote(&v.token).to_string(),
                v.position,
            )))
        }
        3 => {
            let (lo, hi) = (&exprs[args[1]], &exprs[args[2]]);
            if lo.kind != NodeKind::Constant || hi.kind != NodeKind::Constant {
                return Ok(None);
            }
            let lo = parse_timestamp(unquote(&lo.token), lo.position)?;
            let hi = parse_timestamp(unquote(&hi.token), hi.position)?;
            Ok(Some(TimestampBounds::Range(lo, hi)))
        }
        0 | 1 => Err(Error::parse(n.position, "Too few args")),
        _ => Err(Error::parse(exprs[args[3]].position, "Too many args")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::interval::format_intervals;
    use crate::model::ModelArena;
    use crate::parser::SqlParser;
    use strata_core::schema::{TableSchema, TableSchemaBuilder};
    use strata_core::DataType;

    fn schema() -> TableSchema {
        TableSchemaBuilder::new("trades")
            .unwrap()
            .add_indexed("sym", DataType::Symbol, 16)
            .unwrap()
            .add_indexed("ex", DataType::Symbol, 4)
            .unwrap()
            .add_indexed("mkt", DataType::Symbol, 16)
            .unwrap()
            .add_column("price", DataType::Double)
            .unwrap()
            .add_column("ts", DataType::Timestamp)
            .unwrap()
            .timestamp("ts")
            .build()
            .unwrap()
    }

    fn extract_with(where_clause: &str, preferred: Option<&str>) -> Result<(IntrinsicModel, ExprArena)> {
        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let root = {
            let mut parser = SqlParser::new(where_clause, &mut exprs, &mut models);
            parser.parse_expr()?[0]
        };
        let schema = schema();
        let mut analyser = QueryFilterAnalyser::new();
        let model = analyser.extract(
            &mut exprs,
            &IdentityTranslator,
            root,
            &schema,
            preferred,
            schema.timestamp_index(),
        )?;
        Ok((model, exprs))
    }

    fn extract(where_clause: &str) -> (IntrinsicModel, ExprArena) {
        extract_with(where_clause, None).unwrap()
    }

    fn keys(model: &IntrinsicModel) -> Vec<&str> {
        model
            .key_values
            .iter()
            .map(|v| v.as_deref().unwrap_or("null"))
            .collect()
    }

    fn residual(model: &IntrinsicModel, exprs: &ExprArena) -> Option<String> {
        model.filter.map(|f| exprs.to_infix(f))
    }

    fn printed(where_clause: &str) -> String {
        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let root = {
            let mut parser = SqlParser::new(where_clause, &mut exprs, &mut models);
            parser.parse_expr().unwrap()[0]
        };
        exprs.to_infix(root)
    }

    #[test]
    fn test_printed_filter_extracts_the_same_model() {
        for clause in [
            "ts >= '2020-01-01' and ts < '2020-02-01' and sym in ('A','B')",
            "sym = 'A' and price > 10 and ts > '2018-01-01T00:00:00.000Z'",
            "ex in ('X','Y') and ex != 'X' and mkt = 'M' and price < 3",
            "ts = '2018-02' and ts != '2018-02-10'",
        ] {
            let (original, original_exprs) = extract(clause);
            let text = printed(clause);
            let (reparsed, reparsed_exprs) = extract(&text);
            assert_eq!(original.key_column, reparsed.key_column, "{}", text);
            assert_eq!(original.key_values, reparsed.key_values, "{}", text);
            assert_eq!(original.intervals, reparsed.intervals, "{}", text);
            assert_eq!(original.intrinsic_value, reparsed.intrinsic_value, "{}", text);
            assert_eq!(
                residual(&original, &original_exprs),
                residual(&reparsed, &reparsed_exprs),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_month_range_and_key_list() {
        let (m, exprs) = extract("ts >= '2020-01-01' and ts < '2020-02-01' and sym in ('A','B')");
        assert_eq!(
            format_intervals(m.intervals.as_deref().unwrap()),
            "[{lo=2020-01-01T00:00:00.000000Z, hi=2020-01-31T23:59:59.999999Z}]"
        );
        assert_eq!(m.key_column.as_deref(), Some("sym"));
        assert_eq!(keys(&m), ["A", "B"]);
        assert_eq!(residual(&m, &exprs), None);
        assert_eq!(m.intrinsic_value, IntrinsicValue::Undefined);
    }

    #[test]
    fn test_residual_filter_keeps_other_conjuncts() {
        let (m, exprs) = extract("sym = 'A' and price > 10 and ts > '2018-01-01T00:00:00.000Z'");
        assert_eq!(keys(&m), ["A"]);
        assert_eq!(residual(&m, &exprs).as_deref(), Some("price > 10"));
        let intervals = m.intervals.clone().unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].hi, i64::MAX);
    }

    #[test]
    fn test_fewer_buckets_win_and_previous_key_returns_to_filter() {
        let (m, exprs) = extract("sym = 'A' and ex = 'X'");
        assert_eq!(m.key_column.as_deref(), Some("ex"));
        assert_eq!(keys(&m), ["X"]);
        assert_eq!(residual(&m, &exprs).as_deref(), Some("sym = 'A'"));
    }

    #[test]
    fn test_equal_buckets_keep_first_visited_column() {
        let (m, exprs) = extract("sym = 'A' and mkt = 'M'");
        assert_eq!(m.key_column.as_deref(), Some("mkt"));
        assert_eq!(residual(&m, &exprs).as_deref(), Some("sym = 'A'"));

        let (m, exprs) = extract("mkt = 'M' and sym = 'A'");
        assert_eq!(m.key_column.as_deref(), Some("sym"));
        assert_eq!(residual(&m, &exprs).as_deref(), Some("mkt = 'M'"));
    }

    #[test]
    fn test_preferred_key_column() {
        let (m, exprs) = extract_with("mkt = 'M' and sym = 'A'", Some("sym")).unwrap();
        assert_eq!(m.key_column.as_deref(), Some("sym"));
        assert_eq!(residual(&m, &exprs).as_deref(), Some("mkt = 'M'"));
    }

    #[test]
    fn test_repeated_key_intersects_values() {
        let (m, exprs) = extract("sym in ('A','B','C') and sym = 'B'");
        assert_eq!(keys(&m), ["B"]);
        assert_eq!(residual(&m, &exprs), None);

        let (m, _) = extract("sym in ('A','B') and sym in ('B','C')");
        assert_eq!(keys(&m), ["B"]);

        let (m, _) = extract("sym = 'A' and sym = 'B'");
        assert_eq!(m.intrinsic_value, IntrinsicValue::False);
    }

    #[test]
    fn test_exclusions_remove_values() {
        let (m, exprs) = extract("sym in ('A','B',null) and sym != 'A' and not (sym in (null))");
        assert_eq!(keys(&m), ["B"]);
        assert_eq!(residual(&m, &exprs), None);

        let (m, _) = extract("sym = 'A' and not (sym in ('A','Z'))");
        assert_eq!(m.intrinsic_value, IntrinsicValue::False);
    }

    #[test]
    fn test_exclusion_without_key_stays_in_filter() {
        let (m, exprs) = extract("sym != 'A' and price < 3");
        assert_eq!(m.key_column, None);
        assert_eq!(residual(&m, &exprs).as_deref(), Some("sym != 'A' and price < 3"));
    }

    #[test]
    fn test_timestamp_in_range() {
        let (m, _) = extract("ts in ('2018-01-01', '2018-01-02')");
        assert_eq!(
            format_intervals(m.intervals.as_deref().unwrap()),
            "[{lo=2018-01-01T00:00:00.000000Z, hi=2018-01-02T00:00:00.000000Z}]"
        );
    }

    #[test]
    fn test_inverted_timestamp_range_is_false() {
        let (m, _) = extract("ts in ('2018-01-02', '2018-01-01')");
        assert_eq!(m.intrinsic_value, IntrinsicValue::False);
    }

    #[test]
    fn test_timestamp_equals_interval_literal() {
        let (m, exprs) = extract("ts = '2018-02' and ts != '2018-02-10'");
        let intervals = m.intervals.clone().unwrap();
        assert_eq!(intervals.len(), 2);
        assert_eq!(
            format_intervals(&intervals),
            "[{lo=2018-02-01T00:00:00.000000Z, hi=2018-02-09T23:59:59.999999Z},\
             {lo=2018-02-11T00:00:00.000000Z, hi=2018-02-28T23:59:59.999999Z}]"
        );
        assert_eq!(residual(&m, &exprs), None);
    }

    #[test]
    fn test_not_in_timestamp_range() {
        let (m, exprs) = extract("not (ts in ('2018-01-01', '2018-01-02')) and ts < '2019-01-01'");
        let intervals = m.intervals.clone().unwrap();
        assert_eq!(intervals[0].lo, i64::MIN);
        assert_eq!(intervals.len(), 2);
        assert_eq!(residual(&m, &exprs), None);
    }

    #[test]
    fn test_disjoint_timestamps_are_false() {
        let (m, _) = extract("ts > '2019-01-01' and ts < '2018-01-01'");
        assert_eq!(m.intrinsic_value, IntrinsicValue::False);
    }

    #[test]
    fn test_same_operands() {
        let (m, exprs) = extract("price = price and sym = 'A'");
        assert_eq!(residual(&m, &exprs), None);

        let (m, _) = extract("price < price");
        assert_eq!(m.intrinsic_value, IntrinsicValue::False);
    }

    #[test]
    fn test_lambda_keys() {
        let (m, exprs) = extract("sym in (select sym from other) and price > 1");
        assert!(m.key_values_is_lambda);
        assert!(m.key_values_lambda.is_some());
        assert_eq!(residual(&m, &exprs).as_deref(), Some("price > 1"));

        let err = extract_with("sym in (select sym from a) and sym in (select sym from b)", None).unwrap_err();
        assert_eq!(err.message(), "Multiple lambda expressions not supported");
    }

    #[test]
    fn test_errors() {
        let err = extract_with("nope = 'A'", None).unwrap_err();
        assert_eq!(err.message(), "Invalid column: nope");
        assert_eq!(err.position(), Some(0));

        let err = extract_with("ts > 'yesterday'", None).unwrap_err();
        assert_eq!(err.position(), Some(5));

        let err = extract_with("1 in (2, 3)", None).unwrap_err();
        assert_eq!(err.message(), "Column name expected");

        let err = extract_with("ts in ('2018', '2019', '2020')", None).unwrap_err();
        assert_eq!(err.message(), "Too many args");
    }
}
