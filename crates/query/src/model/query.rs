//! Query models: one per SELECT level or join member.

use super::join_context::JoinContext;
use super::OrderedMap;
use crate::ast::{ExprArena, NodeId, NodeKind};
use alloc::collections::BTreeSet;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

/// Prefix of aliases generated for unnamed join members.
pub const SUB_QUERY_ALIAS_PREFIX: &str = "_xQdbA";

/// Handle of a model in a [`ModelArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u32);

impl ModelId {
    /// Returns the arena slot.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Join type of a join member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Outer,
    Cross,
    Asof,
}

impl JoinType {
    /// Returns whether clauses may not be moved away from this member.
    #[inline]
    pub fn is_barrier(self) -> bool {
        matches!(self, JoinType::Outer | JoinType::Asof)
    }
}

/// Role of a model in the layered select pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SelectModelType {
    /// Plain table or join model.
    #[default]
    None,
    /// Column selection and renaming.
    Choose,
    /// Scalar expressions.
    Virtual,
    /// Window functions.
    Analytic,
    /// Aggregation.
    GroupBy,
}

impl SelectModelType {
    /// Header printed before the column list.
    pub fn label(self) -> &'static str {
        match self {
            SelectModelType::Choose => "select-choose",
            SelectModelType::Virtual => "select-virtual",
            SelectModelType::Analytic => "select-analytic",
            SelectModelType::GroupBy | SelectModelType::None => "select-group-by",
        }
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// `over (partition by ... order by ...)` of an analytic column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnalyticSpec {
    pub partition_by: Vec<NodeId>,
    pub order_by: Vec<(NodeId, SortOrder)>,
}

/// One output column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryColumn {
    pub alias: String,
    pub ast: NodeId,
    pub analytic: Option<AnalyticSpec>,
}

impl QueryColumn {
    /// Creates a plain column.
    pub fn new(alias: impl Into<String>, ast: NodeId) -> Self {
        Self {
            alias: alias.into(),
            ast,
            analytic: None,
        }
    }

    /// Creates an analytic column.
    pub fn analytic(alias: impl Into<String>, ast: NodeId, spec: AnalyticSpec) -> Self {
        Self {
            alias: alias.into(),
            ast,
            analytic: Some(spec),
        }
    }
}

/// One SELECT level or join member.
#[derive(Clone, Debug)]
pub struct QueryModel {
    pub columns: Vec<QueryColumn>,
    pub alias_to_column: OrderedMap<String>,
    pub column_to_alias: OrderedMap<String>,
    /// Column name to the kind of the expression producing it.
    pub column_name_type: OrderedMap<NodeKind>,
    /// Join member alias to its index in `join_models`.
    pub alias_indexes: OrderedMap<usize>,
    /// Join members, self first.
    pub join_models: Vec<ModelId>,
    /// Execution order of `join_models` indexes.
    pub ordered_join_models: Vec<usize>,
    pub order_by: Vec<NodeId>,
    pub order_by_direction: Vec<SortOrder>,
    /// Columns the output is ordered by, with their direction.
    pub order_hash: OrderedMap<SortOrder>,
    pub dependencies: BTreeSet<usize>,
    /// Conjuncts of the WHERE clause and of join criteria.
    pub parsed_where: Vec<NodeId>,
    pub join_columns: Vec<NodeId>,
    pub where_clause: Option<NodeId>,
    pub post_join_where: Option<NodeId>,
    pub const_where: Option<NodeId>,
    pub nested: Option<ModelId>,
    pub table_name: Option<NodeId>,
    pub alias: Option<NodeId>,
    pub latest_by: Option<NodeId>,
    pub timestamp: Option<NodeId>,
    pub sample_by: Option<NodeId>,
    pub context: Option<JoinContext>,
    pub join_criteria: Option<NodeId>,
    pub join_type: JoinType,
    pub limit_lo: Option<NodeId>,
    pub limit_hi: Option<NodeId>,
    pub select_model_type: SelectModelType,
}

impl QueryModel {
    fn new(id: ModelId) -> Self {
        Self {
            columns: Vec::new(),
            alias_to_column: OrderedMap::default(),
            column_to_alias: OrderedMap::default(),
            column_name_type: OrderedMap::default(),
            alias_indexes: OrderedMap::default(),
            join_models: alloc::vec![id],
            ordered_join_models: Vec::new(),
            order_by: Vec::new(),
            order_by_direction: Vec::new(),
            order_hash: OrderedMap::default(),
            dependencies: BTreeSet::new(),
            parsed_where: Vec::new(),
            join_columns: Vec::new(),
            where_clause: None,
            post_join_where: None,
            const_where: None,
            nested: None,
            table_name: None,
            alias: None,
            latest_by: None,
            timestamp: None,
            sample_by: None,
            context: None,
            join_criteria: None,
            join_type: JoinType::Inner,
            limit_lo: None,
            limit_hi: None,
            select_model_type: SelectModelType::None,
        }
    }

    /// Adds an output column and records its alias.
    pub fn add_column(&mut self, column: QueryColumn, exprs: &ExprArena) {
        let node = &exprs[column.ast];
        self.alias_to_column
            .insert(column.alias.clone(), node.token.clone());
        self.column_to_alias
            .insert(node.token.clone(), column.alias.clone());
        self.column_name_type.insert(column.alias.clone(), node.kind);
        self.columns.push(column);
    }

    /// Records a column the model exposes without selecting it.
    pub fn add_field(&mut self, name: &str) {
        self.column_name_type
            .insert(name.to_string(), NodeKind::Literal);
        self.alias_to_column
            .insert(name.to_string(), name.to_string());
    }

    /// Appends an order-by column.
    pub fn add_order_by(&mut self, node: NodeId, direction: SortOrder) {
        self.order_by.push(node);
        self.order_by_direction.push(direction);
    }

    /// Drops every order-by column.
    pub fn clear_order_by(&mut self) {
        self.order_by.clear();
        self.order_by_direction.clear();
    }

    /// Alias, falling back to table name.
    pub fn name<'a>(&self, exprs: &'a ExprArena) -> Option<&'a str> {
        self.alias
            .or(self.table_name)
            .map(|n| exprs.token(n))
    }

    /// Position of this member in its parent's join list, by alias.
    pub fn alias_index(&self, alias: &str) -> Option<usize> {
        self.alias_indexes.get(alias).copied()
    }

    /// Translates an output alias back to the column it reads.
    pub fn translate_alias(&self, alias: &str) -> Option<&str> {
        self.alias_to_column.get(alias).map(|s| s.as_str())
    }

    /// Sets the limit bounds.
    pub fn set_limit(&mut self, lo: Option<NodeId>, hi: Option<NodeId>) {
        self.limit_lo = lo;
        self.limit_hi = hi;
    }
}

/// Owner of all models of one compilation.
#[derive(Clone, Debug, Default)]
pub struct ModelArena {
    models: Vec<QueryModel>,
}

impl ModelArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every model.
    pub fn clear(&mut self) {
        self.models.clear();
    }

    /// Number of allocated models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns whether the arena holds no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Allocates an empty model.
    pub fn alloc(&mut self) -> ModelId {
        let id = ModelId(self.models.len() as u32);
        self.models.push(QueryModel::new(id));
        id
    }

    /// Replaces the column maps of `to` with those of `from`.
    pub fn copy_columns(&mut self, to: ModelId, from: ModelId) {
        let names = self[from].column_name_type.clone();
        let aliases = self[from].alias_to_column.clone();
        let target = &mut self[to];
        target.column_name_type = names;
        target.alias_to_column = aliases;
    }

    /// Returns the model at join position `index` of `parent`.
    #[inline]
    pub fn join_model(&self, parent: ModelId, index: usize) -> ModelId {
        self[parent].join_models[index]
    }
}

impl Index<ModelId> for ModelArena {
    type Output = QueryModel;

    fn index(&self, id: ModelId) -> &QueryModel {
        &self.models[id.index()]
    }
}

impl IndexMut<ModelId> for ModelArena {
    fn index_mut(&mut self, id: ModelId) -> &mut QueryModel {
        &mut self.models[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_model_joins_itself() {
        let mut models = ModelArena::new();
        let id = models.alloc();
        assert_eq!(models[id].join_models, [id]);
        assert_eq!(models.join_model(id, 0), id);
    }

    #[test]
    fn test_add_column_maps() {
        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let id = models.alloc();
        let x = exprs.literal("x", 7);
        models[id].add_column(QueryColumn::new("y", x), &exprs);

        let m = &models[id];
        assert_eq!(m.translate_alias("y"), Some("x"));
        assert_eq!(m.column_to_alias.get("x").map(String::as_str), Some("y"));
        assert_eq!(m.column_name_type.get("y"), Some(&NodeKind::Literal));
    }

    #[test]
    fn test_copy_columns_and_name() {
        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let a = models.alloc();
        let b = models.alloc();
        models[a].add_field("ts");
        models.copy_columns(b, a);
        assert!(models[b].column_name_type.contains_key("ts"));

        let t = exprs.literal("trades", 0);
        models[b].table_name = Some(t);
        assert_eq!(models[b].name(&exprs), Some("trades"));
        let alias = exprs.literal("x", 7);
        models[b].alias = Some(alias);
        assert_eq!(models[b].name(&exprs), Some("x"));
    }

    #[test]
    fn test_barriers() {
        assert!(JoinType::Outer.is_barrier());
        assert!(JoinType::Asof.is_barrier());
        assert!(!JoinType::Cross.is_barrier());
        assert_eq!(SelectModelType::Choose.label(), "select-choose");
    }
}
