//! SQL statement parser.
//!
//! Builds query models straight from the token stream, one model per select
//! level and per join member. Models and expression nodes are allocated in
//! arenas owned by the caller so that one compilation can be dropped at once.
//!
//! Statements:
//! - `[with name as (query), ...] select columns from source ...`
//! - a bare `source ...`, which selects every column of the source
//! - `create table name (...)` and `create table name as (query)`
//! - `rename table a to b`
//!
//! The parser only checks syntax. Names are resolved by the optimizer.

mod ddl;
mod expr;

use crate::ast::{column_name, ExprArena, NodeId, NodeKind};
use crate::lexer::{unquote, Lexer, Token};
use crate::model::{
    AnalyticSpec, CreateTableModel, JoinType, ModelArena, ModelId, QueryColumn, RenameTableModel,
    SelectModelType, SortOrder,
};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use strata_core::schema::DEFAULT_INDEX_BLOCK_SIZE;
use strata_core::{Error, Result};

/// Upper bound on `order by` columns of one model.
const MAX_ORDER_BY_COLUMNS: usize = 1560;

const TABLE_ALIAS_STOP: [&str; 13] = [
    "where", "latest", "join", "inner", "outer", "asof", "cross", "sample", "order", "on",
    "timestamp", "limit", ")",
];

const COLUMN_ALIAS_STOP: [&str; 3] = ["from", ",", "over"];

/// A parsed statement.
#[derive(Clone, Debug)]
pub enum Statement {
    /// A query; the model is owned by the parser's model arena.
    Query(ModelId),
    CreateTable(CreateTableModel),
    RenameTable(RenameTableModel),
}

/// `with name as (...)` body. The first reference takes the parsed model,
/// later references parse the text again so that every use owns its tree.
#[derive(Clone, Debug)]
struct WithClause {
    name: String,
    lo: usize,
    hi: usize,
    parsed: Option<ModelId>,
}

/// Recursive descent parser over one SQL text.
pub struct SqlParser<'a, 'c> {
    pub(crate) lexer: Lexer<'a>,
    pub(crate) exprs: &'c mut ExprArena,
    pub(crate) models: &'c mut ModelArena,
    with_clauses: Vec<WithClause>,
    index_block_size: usize,
}

fn is_table_alias_stop(tok: &Token<'_>) -> bool {
    TABLE_ALIAS_STOP.iter().any(|s| tok.is(s))
}

fn is_column_alias_stop(tok: &Token<'_>) -> bool {
    COLUMN_ALIAS_STOP.iter().any(|s| tok.is(s))
}

fn join_type_of(tok: &Token<'_>) -> Option<JoinType> {
    if tok.is("join") || tok.is("inner") {
        Some(JoinType::Inner)
    } else if tok.is("outer") {
        Some(JoinType::Outer)
    } else if tok.is("cross") {
        Some(JoinType::Cross)
    } else if tok.is("asof") {
        Some(JoinType::Asof)
    } else {
        None
    }
}

impl<'a, 'c> SqlParser<'a, 'c> {
    /// Creates a parser over `sql` allocating into the given arenas.
    pub fn new(sql: &'a str, exprs: &'c mut ExprArena, models: &'c mut ModelArena) -> Self {
        Self {
            lexer: Lexer::new(sql),
            exprs,
            models,
            with_clauses: Vec::new(),
            index_block_size: DEFAULT_INDEX_BLOCK_SIZE,
        }
    }

    /// Sets the block size of indexes declared without one.
    pub fn with_index_block_size(mut self, size: usize) -> Self {
        self.index_block_size = size;
        self
    }

    /// Parses one statement.
    pub fn parse(&mut self) -> Result<Statement> {
        let tok = self.tok()?;
        if tok.is("create") {
            let tok = self.tok()?;
            if !tok.is("table") {
                return Err(Error::parse(tok.position, "table expected"));
            }
            return self.parse_create_table().map(Statement::CreateTable);
        }
        if tok.is("rename") {
            return self.parse_rename_table().map(Statement::RenameTable);
        }
        self.lexer.unparse();
        self.parse_dml(false).map(Statement::Query)
    }

    /// Parses a query. A sub-query leaves the token that ends it unread.
    pub(crate) fn parse_dml(&mut self, sub_query: bool) -> Result<ModelId> {
        let scope = self.with_clauses.len();
        let model = self.models.alloc();

        let mut tok = self.tok()?;
        if tok.is("with") {
            self.parse_with_clauses(scope)?;
            tok = self.tok()?;
        }

        if tok.is("select") {
            self.models[model].select_model_type = SelectModelType::Choose;
            self.parse_select_clause(model)?;
            let nested = self.models.alloc();
            self.parse_from_clause(nested, sub_query)?;
            self.adopt_nested(model, nested);
        } else if sub_query {
            self.lexer.unparse();
            self.parse_from_clause(model, true)?;
        } else {
            self.lexer.unparse();
            let nested = self.models.alloc();
            self.parse_from_clause(nested, false)?;
            let star = self.exprs.literal("*", tok.position);
            self.models[model].select_model_type = SelectModelType::Choose;
            self.models[model].add_column(QueryColumn::new("*", star), self.exprs);
            self.adopt_nested(model, nested);
        }

        self.with_clauses.truncate(scope);
        Ok(model)
    }

    /// Links `nested` under `model`; `sample by` stays with the select list.
    fn adopt_nested(&mut self, model: ModelId, nested: ModelId) {
        if let Some(sample_by) = self.models[nested].sample_by.take() {
            self.models[model].sample_by = Some(sample_by);
        }
        self.models[model].nested = Some(nested);
    }

    fn parse_with_clauses(&mut self, scope: usize) -> Result<()> {
        loop {
            let name = self.expect_literal()?;
            let position = self.exprs[name].position;
            let name = unquote(self.exprs.token(name)).to_string();
            if self.with_clauses[scope..]
                .iter()
                .any(|w| w.name.eq_ignore_ascii_case(&name))
            {
                return Err(Error::parse(position, "duplicate name"));
            }

            self.expect_tok("as")?;
            self.expect_tok("(")?;
            let lo = self.lexer.offset();
            let parsed = self.parse_dml(true)?;
            let hi = self.lexer.offset();
            self.expect_tok(")")?;
            self.with_clauses.push(WithClause {
                name,
                lo,
                hi,
                parsed: Some(parsed),
            });

            match self.lexer.next_token()? {
                Some(t) if t.text == "," => {}
                Some(_) => {
                    self.lexer.unparse();
                    return Ok(());
                }
                None => return Ok(()),
            }
        }
    }

    fn with_clause_model(&mut self, name: &str) -> Result<Option<ModelId>> {
        let Some(index) = self
            .with_clauses
            .iter()
            .rposition(|w| w.name.eq_ignore_ascii_case(name))
        else {
            return Ok(None);
        };
        if let Some(model) = self.with_clauses[index].parsed.take() {
            return Ok(Some(model));
        }

        let (lo, hi) = (self.with_clauses[index].lo, self.with_clauses[index].hi);
        let content = self.lexer.content();
        let saved = core::mem::replace(&mut self.lexer, Lexer::with_range(content, lo, hi));
        let parsed = self.parse_dml(true);
        self.lexer = saved;
        parsed.map(Some)
    }

    fn parse_select_clause(&mut self, model: ModelId) -> Result<()> {
        loop {
            let tok = self.tok()?;
            let expr = if tok.text == "*" {
                self.exprs.literal("*", tok.position)
            } else {
                self.lexer.unparse();
                self.expr()?
                    .ok_or_else(|| Error::parse(self.lexer.position(), "missing column"))?
            };

            let mut tok = self.tok()?;
            let alias = if !is_column_alias_stop(&tok) {
                if tok.text.contains('.') {
                    return Err(Error::parse(tok.position, "'.' is not allowed here"));
                }
                let alias = unquote(tok.text).to_string();
                if self.models[model].column_name_type.contains_key(&alias) {
                    return Err(Error::duplicate_alias(tok.position));
                }
                tok = self.tok()?;
                alias
            } else {
                self.create_column_alias(model, expr)
            };

            if tok.is("over") {
                self.expect_tok("(")?;
                let mut spec = AnalyticSpec::default();
                tok = self.tok()?;

                if tok.is("partition") {
                    self.expect_tok("by")?;
                    loop {
                        spec.partition_by.push(self.expect_literal()?);
                        tok = self.tok()?;
                        if tok.text != "," {
                            break;
                        }
                    }
                }

                if tok.is("order") {
                    self.expect_tok("by")?;
                    loop {
                        let e = self.expect_literal()?;
                        tok = self.tok()?;
                        if tok.is("desc") {
                            spec.order_by.push((e, SortOrder::Desc));
                            tok = self.tok()?;
                        } else {
                            spec.order_by.push((e, SortOrder::Asc));
                            if tok.is("asc") {
                                tok = self.tok()?;
                            }
                        }
                        if tok.text != "," {
                            break;
                        }
                    }
                }

                if tok.text != ")" {
                    return Err(Error::parse(tok.position, ") expected"));
                }
                self.models[model].add_column(QueryColumn::analytic(alias, expr, spec), self.exprs);
                tok = self.tok()?;
            } else {
                self.models[model].add_column(QueryColumn::new(alias, expr), self.exprs);
            }

            if tok.is("from") {
                return Ok(());
            }
            if tok.text != "," {
                return Err(Error::parse(tok.position, ",|from expected"));
            }
        }
    }

    /// Derives an alias from the column expression, numbered past names in use.
    fn create_column_alias(&self, model: ModelId, expr: NodeId) -> String {
        let node = &self.exprs[expr];
        let base = match node.kind {
            NodeKind::Literal => column_name(unquote(&node.token)),
            NodeKind::Function => node.token.as_str(),
            _ => "column",
        };
        let names = &self.models[model].column_name_type;
        if !names.contains_key(base) {
            return base.to_string();
        }
        let mut sequence = 1;
        loop {
            let alias = format!("{}{}", base, sequence);
            if !names.contains_key(&alias) {
                return alias;
            }
            sequence += 1;
        }
    }

    fn parse_from_clause(&mut self, model: ModelId, sub_query: bool) -> Result<()> {
        let tok = self.tok()?;
        let mut tok = if tok.text == "(" {
            let nested = self.parse_dml(true)?;
            self.models[model].nested = Some(nested);
            self.expect_tok(")")?;
            let tok = self.parse_table_alias(model)?;
            self.parse_timestamp_clause(model, tok)?
        } else {
            self.lexer.unparse();
            self.parse_table_name(model)?;
            let tok = self.parse_table_alias(model)?;
            let tok = self.parse_timestamp_clause(model, tok)?;
            match tok {
                Some(t) if t.is("latest") => {
                    self.expect_tok("by")?;
                    let latest = self.expect_expr()?;
                    self.models[model].latest_by = Some(latest);
                    self.lexer.next_token()?
                }
                other => other,
            }
        };

        while let Some(keyword) = tok {
            let Some(join_type) = join_type_of(&keyword) else {
                break;
            };
            let join = self.parse_join(keyword, join_type)?;
            self.models[model].join_models.push(join);
            tok = self.lexer.next_token()?;
        }

        if tok.is_some_and(|t| t.is("where")) {
            let filter = self.expect_expr()?;
            self.models[model].where_clause = Some(filter);
            tok = self.lexer.next_token()?;
        }

        if tok.is_some_and(|t| t.is("sample")) {
            self.expect_tok("by")?;
            let sample_by = self.expect_literal()?;
            self.models[model].sample_by = Some(sample_by);
            tok = self.lexer.next_token()?;
        }

        if tok.is_some_and(|t| t.is("order")) {
            self.expect_tok("by")?;
            loop {
                let t = self.tok()?;
                if t.text == ")" {
                    return Err(Error::parse(t.position, "Expression expected"));
                }
                self.lexer.unparse();
                let column = self.expect_literal()?;

                tok = self.lexer.next_token()?;
                match tok {
                    Some(t) if t.is("desc") => {
                        self.models[model].add_order_by(column, SortOrder::Desc);
                        tok = self.lexer.next_token()?;
                    }
                    Some(t) if t.is("asc") => {
                        self.models[model].add_order_by(column, SortOrder::Asc);
                        tok = self.lexer.next_token()?;
                    }
                    _ => self.models[model].add_order_by(column, SortOrder::Asc),
                }

                if self.models[model].order_by.len() >= MAX_ORDER_BY_COLUMNS {
                    return Err(Error::parse(self.lexer.position(), "Too many columns"));
                }
                if !tok.is_some_and(|t| t.text == ",") {
                    break;
                }
            }
        }

        if tok.is_some_and(|t| t.is("limit")) {
            let lo = self.expect_expr()?;
            let mut hi = None;
            tok = self.lexer.next_token()?;
            if tok.is_some_and(|t| t.text == ",") {
                hi = Some(self.expect_expr()?);
                tok = self.lexer.next_token()?;
            }
            self.models[model].set_limit(Some(lo), hi);
        }

        match tok {
            Some(_) if sub_query => {
                self.lexer.unparse();
                Ok(())
            }
            Some(t) => Err(Error::unexpected_token(t.position, t.text)),
            None => Ok(()),
        }
    }

    /// Reads an optional alias and returns the token after it.
    fn parse_table_alias(&mut self, model: ModelId) -> Result<Option<Token<'a>>> {
        match self.lexer.next_token()? {
            Some(t) if !is_table_alias_stop(&t) => {
                let alias = self.exprs.literal(unquote(t.text), t.position);
                self.models[model].alias = Some(alias);
                self.lexer.next_token()
            }
            other => Ok(other),
        }
    }

    /// Reads `timestamp(column)` when `tok` starts it and returns the next token.
    fn parse_timestamp_clause(
        &mut self,
        model: ModelId,
        tok: Option<Token<'a>>,
    ) -> Result<Option<Token<'a>>> {
        match tok {
            Some(t) if t.is("timestamp") => {
                self.expect_tok("(")?;
                let ts = self.expect_literal()?;
                self.expect_tok(")")?;
                self.models[model].timestamp = Some(ts);
                self.lexer.next_token()
            }
            other => Ok(other),
        }
    }

    fn parse_table_name(&mut self, target: ModelId) -> Result<()> {
        let tok = self.tok()?;
        let name = unquote(tok.text);
        match self.with_clause_model(name)? {
            Some(nested) => {
                let alias = self.exprs.literal(name, tok.position);
                let target = &mut self.models[target];
                target.nested = Some(nested);
                target.alias = Some(alias);
            }
            None => {
                let table = self.exprs.literal(name, tok.position);
                self.models[target].table_name = Some(table);
            }
        }
        Ok(())
    }

    fn parse_join(&mut self, keyword: Token<'a>, join_type: JoinType) -> Result<ModelId> {
        let join = self.models.alloc();
        self.models[join].join_type = join_type;

        if !keyword.is("join") {
            self.expect_tok("join")?;
        }

        let tok = self.tok()?;
        if tok.text == "(" {
            let nested = self.parse_dml(true)?;
            self.models[join].nested = Some(nested);
            self.expect_tok(")")?;
        } else {
            self.lexer.unparse();
            self.parse_table_name(join)?;
        }

        let tok = match self.lexer.next_token()? {
            Some(t) if !is_table_alias_stop(&t) => {
                let alias = self.exprs.literal(unquote(t.text), t.position);
                self.models[join].alias = Some(alias);
                self.lexer.next_token()?
            }
            other => other,
        };

        let on = tok.filter(|t| t.is("on"));
        match (join_type, on) {
            (JoinType::Cross, Some(t)) => {
                return Err(Error::parse(t.position, "Cross joins cannot have join clauses"));
            }
            (JoinType::Cross, None) | (JoinType::Asof, None) => {
                if tok.is_some() {
                    self.lexer.unparse();
                }
            }
            (_, None) => {
                let position = tok.map_or(self.lexer.position(), |t| t.position);
                return Err(Error::parse(position, "'on' expected"));
            }
            (_, Some(_)) => {
                let roots = self.parse_expr()?;
                match roots.as_slice() {
                    [] => return Err(Error::parse(self.lexer.position(), "Expression expected")),
                    [single] if !self.exprs.is_literal(*single) => {
                        self.models[join].join_criteria = Some(*single);
                    }
                    _ => {
                        if roots.iter().any(|&r| !self.exprs.is_literal(r)) {
                            return Err(Error::parse(self.lexer.position(), "Column name expected"));
                        }
                        self.models[join].join_columns.extend(roots);
                    }
                }
            }
        }
        Ok(join)
    }

    fn parse_rename_table(&mut self) -> Result<RenameTableModel> {
        self.expect_tok("table")?;
        let (from, from_position) = self.expect_table_reference()?;
        self.expect_tok("to")?;
        let (to, to_position) = self.expect_table_reference()?;
        if let Some(t) = self.lexer.next_token()? {
            return Err(Error::unexpected_token(t.position, t.text));
        }
        Ok(RenameTableModel {
            from,
            from_position,
            to,
            to_position,
        })
    }

    fn expect_table_reference(&mut self) -> Result<(String, usize)> {
        let e = self.expect_expr()?;
        let node = &self.exprs[e];
        if !matches!(node.kind, NodeKind::Literal | NodeKind::Constant) {
            return Err(Error::parse(node.position, "literal or constant expected"));
        }
        Ok((unquote(&node.token).to_string(), node.position))
    }

    /// Next token; end of input is an error.
    pub(crate) fn tok(&mut self) -> Result<Token<'a>> {
        self.lexer
            .next_token()?
            .ok_or_else(|| Error::parse(self.lexer.position(), "Unexpected end of input"))
    }

    pub(crate) fn expect_tok(&mut self, expected: &str) -> Result<()> {
        let tok = self.tok()?;
        if tok.is(expected) {
            Ok(())
        } else {
            Err(Error::parse(tok.position, format!("'{}' expected", expected)))
        }
    }

    /// Reads a literal token. Brackets, commas and quoted strings are rejected.
    pub(crate) fn expect_literal(&mut self) -> Result<NodeId> {
        let tok = self.tok()?;
        if matches!(tok.first_char(), '(' | ')' | ',' | '`' | '"' | '\'') {
            return Err(Error::parse(tok.position, "literal expected"));
        }
        Ok(self.exprs.literal(tok.text, tok.position))
    }

    /// Parses an expression; None when no expression starts here.
    pub(crate) fn expr(&mut self) -> Result<Option<NodeId>> {
        Ok(self.parse_expr()?.pop())
    }

    pub(crate) fn expect_expr(&mut self) -> Result<NodeId> {
        self.expr()?
            .ok_or_else(|| Error::parse(self.lexer.position(), "Expression expected"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::to_sink;

    fn parse(sql: &str) -> (ExprArena, ModelArena, Statement) {
        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let statement = SqlParser::new(sql, &mut exprs, &mut models).parse().unwrap();
        (exprs, models, statement)
    }

    fn sink(sql: &str) -> String {
        let (exprs, models, statement) = parse(sql);
        match statement {
            Statement::Query(id) => to_sink(&models, &exprs, id),
            other => panic!("not a query: {:?}", other),
        }
    }

    fn error(sql: &str) -> (usize, String) {
        let mut exprs = ExprArena::new();
        let mut models = ModelArena::new();
        let err = SqlParser::new(sql, &mut exprs, &mut models)
            .parse()
            .unwrap_err();
        (err.position().unwrap(), err.message().into())
    }

    #[test]
    fn test_select_from_table() {
        assert_eq!(
            sink("select a, b c from t where a > 1 order by b desc limit 10"),
            "select-choose a, b c from (t where a > 1 order by b desc limit 10)"
        );
    }

    #[test]
    fn test_bare_table_selects_everything() {
        assert_eq!(
            sink("x 'b a' where x > 1"),
            "select-choose * from (x 'b a' where x > 1)"
        );
    }

    #[test]
    fn test_generated_aliases() {
        assert_eq!(
            sink("select t.x, x, sum(y), a + b from t"),
            "select-choose t.x x, x x1, sum(y) sum, a + b column from (t)"
        );
    }

    #[test]
    fn test_sample_by_moves_to_select() {
        assert_eq!(
            sink("select x, avg(y) from tab sample by 2m"),
            "select-choose x, avg(y) avg from (tab) sample by 2m"
        );
    }

    #[test]
    fn test_sub_query_and_timestamp() {
        assert_eq!(
            sink("select a from (select a, ts from t latest by a) s timestamp(ts) where a > 1"),
            "select-choose a from ((select-choose a, ts from (t latest by a)) s timestamp (ts) where a > 1)"
        );
    }

    #[test]
    fn test_joins() {
        let (_, models, statement) = parse(
            "select * from a join b on (x, y) outer join c on c.z = a.z cross join d asof join e",
        );
        let Statement::Query(id) = statement else {
            panic!("not a query")
        };
        let from = models[id].nested.unwrap();
        let joins = &models[from].join_models;
        assert_eq!(joins.len(), 5);
        assert_eq!(models[joins[1]].join_columns.len(), 2);
        assert_eq!(models[joins[2]].join_type, JoinType::Outer);
        assert!(models[joins[2]].join_criteria.is_some());
        assert_eq!(models[joins[3]].join_type, JoinType::Cross);
        assert_eq!(models[joins[4]].join_type, JoinType::Asof);
    }

    #[test]
    fn test_analytic_column() {
        assert_eq!(
            sink("select a, row_number() rn over (partition by b order by ts desc) from t"),
            "select-choose a, row_number() rn over (partition by b order by ts desc) from (t)"
        );
    }

    #[test]
    fn test_in_sub_query() {
        assert_eq!(
            sink("select a from t where b in (select c from u)"),
            "select-choose a from (t where b in (select-choose c from (u)))"
        );
    }

    #[test]
    fn test_with_clause_reuse() {
        let (exprs, models, statement) =
            parse("with x as (select a from t) select a from x join x y on (a)");
        let Statement::Query(id) = statement else {
            panic!("not a query")
        };
        let from = models[id].nested.unwrap();
        let first = models[from].nested.unwrap();
        let second = models[models[from].join_models[1]].nested.unwrap();
        assert_ne!(first, second);
        assert_eq!(to_sink(&models, &exprs, first), to_sink(&models, &exprs, second));
        assert_eq!(to_sink(&models, &exprs, first), "select-choose a from (t)");
    }

    #[test]
    fn test_with_duplicate_name() {
        assert_eq!(
            error("with x as (t), x as (u) select a from x"),
            (15, "duplicate name".into())
        );
    }

    #[test]
    fn test_select_errors() {
        assert_eq!(error("select a.b.c t.x from t"), (13, "'.' is not allowed here".into()));
        assert_eq!(error("select a b c from t"), (11, ",|from expected".into()));
        assert_eq!(error("select a, b a from t"), (12, "Duplicate alias".into()));
        assert_eq!(error("select a from t x y"), (18, "Unexpected token: y".into()));
        assert_eq!(error("select a from"), (9, "Unexpected end of input".into()));
        assert_eq!(error("select a from t order by )"), (25, "Expression expected".into()));
    }

    #[test]
    fn test_join_errors() {
        assert_eq!(
            error("select x from a a cross join b on b.x = a.x"),
            (31, "Cross joins cannot have join clauses".into())
        );
        assert_eq!(error("select x from a join b where x > 1"), (23, "'on' expected".into()));
        assert_eq!(error("select x from a outer b on (x)"), (22, "'join' expected".into()));
        assert_eq!(
            error("select x from a join b on (x, y + 1)"),
            (35, "Column name expected".into())
        );
    }

    #[test]
    fn test_rename() {
        let (_, _, statement) = parse("rename table 'a b' to c");
        let Statement::RenameTable(model) = statement else {
            panic!("not a rename")
        };
        assert_eq!(model.from, "a b");
        assert_eq!(model.to, "c");
        assert_eq!(model.to_position, 22);
        assert_eq!(
            error("rename table a + b to c"),
            (15, "literal or constant expected".into())
        );
    }
}
