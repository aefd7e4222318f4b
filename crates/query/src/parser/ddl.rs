//! `CREATE TABLE` grammar.

use super::SqlParser;
use crate::ast::NodeKind;
use crate::lexer::{unquote, Token};
use crate::model::{ColumnCastModel, CreateTableModel};
use alloc::string::ToString;
use strata_core::schema::PartitionBy;
use strata_core::{DataType, Error, Result};

fn is_field_term(tok: &Token<'_>) -> bool {
    tok.text == "," || tok.text == ")"
}

impl<'a, 'c> SqlParser<'a, 'c> {
    /// Parses the statement after `create table`.
    pub(super) fn parse_create_table(&mut self) -> Result<CreateTableModel> {
        let name = self.tok()?;
        let mut model = CreateTableModel::new(unquote(name.text), name.position);

        let tok = self.tok()?;
        if tok.text == "(" {
            self.lexer.unparse();
            self.parse_table_fields(&mut model)?;
        } else if tok.is("as") {
            self.expect_tok("(")?;
            model.query = Some(self.parse_dml(true)?);
            self.expect_tok(")")?;
        } else {
            return Err(Error::parse(tok.position, "Unexpected token"));
        }

        let mut tok = self.lexer.next_token()?;
        while tok.is_some_and(|t| t.text == ",") {
            let item = self.tok()?;
            if item.is("index") {
                self.parse_index_clause(&mut model)?;
            } else if item.is("cast") {
                self.parse_cast_clause(&mut model)?;
            } else {
                return Err(Error::parse(item.position, "Unexpected token"));
            }
            tok = self.lexer.next_token()?;
        }

        if tok.is_some_and(|t| t.is("timestamp")) {
            self.expect_tok("(")?;
            let column = self.tok()?;
            if model.query.is_none() && model.column_index(unquote(column.text)).is_none() {
                return Err(Error::invalid_column(column.position, column.text));
            }
            model.timestamp = Some((unquote(column.text).to_string(), column.position));
            self.expect_tok(")")?;
            tok = self.lexer.next_token()?;
        }

        if tok.is_some_and(|t| t.is("partition")) {
            self.expect_tok("by")?;
            let kind = self.tok()?;
            model.partition_by = PartitionBy::from_name(kind.text)
                .ok_or_else(|| Error::parse(kind.position, "'NONE', 'DAY', 'MONTH' or 'YEAR' expected"))?;
            tok = self.lexer.next_token()?;
        }

        if tok.is_some_and(|t| t.is("record")) {
            self.expect_tok("hint")?;
            let hint = self.expect_expr()?;
            let node = &self.exprs[hint];
            if node.kind != NodeKind::Constant {
                return Err(Error::parse(node.position, "Constant expected"));
            }
            let value = node
                .token
                .parse::<usize>()
                .map_err(|_| Error::parse(node.position, "Constant expected"))?;
            model.record_hint = Some(value);
            tok = self.lexer.next_token()?;
        }

        match tok {
            Some(t) => Err(Error::parse(t.position, "Unexpected token")),
            None => Ok(model),
        }
    }

    fn parse_table_fields(&mut self, model: &mut CreateTableModel) -> Result<()> {
        self.expect_tok("(")?;
        loop {
            let name = self.not_term_tok()?;
            let type_tok = self.not_term_tok()?;
            let data_type = DataType::from_name(type_tok.text)
                .ok_or_else(|| Error::parse(type_tok.position, "invalid type"))?;
            if !model.add_column(unquote(name.text), name.position, data_type, self.index_block_size) {
                return Err(Error::parse(name.position, "Duplicate column"));
            }

            let tok = if data_type.is_indexable() {
                self.parse_index_definition(model)?
            } else {
                self.tok()?
            };

            if tok.text == ")" {
                return Ok(());
            }
            if tok.text != "," {
                return Err(Error::parse(tok.position, ", or ) expected"));
            }
        }
    }

    /// Reads `[index [block size n]]` after an indexable field and returns
    /// the token that follows.
    fn parse_index_definition(&mut self, model: &mut CreateTableModel) -> Result<Token<'a>> {
        let last = model.columns.len() - 1;
        let tok = self.tok()?;
        if is_field_term(&tok) {
            return Ok(tok);
        }
        if !tok.is("index") {
            return Err(Error::parse(tok.position, "', ', ')' or 'index' expected"));
        }

        let tok = self.tok()?;
        if is_field_term(&tok) {
            model.set_index_flags(last, true, self.index_block_size);
            return Ok(tok);
        }
        if !tok.is("block") {
            return Err(Error::parse(tok.position, "'block' expected"));
        }
        self.expect_tok("size")?;
        let size = self.int_constant()?;
        model.set_index_flags(last, true, size);
        self.tok()
    }

    /// `index(col [block size n])` after the column list or query.
    fn parse_index_clause(&mut self, model: &mut CreateTableModel) -> Result<()> {
        self.expect_tok("(")?;
        let column = self.tok()?;
        let name = unquote(column.text);

        let mut tok = self.tok()?;
        let block_size = if tok.is("block") {
            self.expect_tok("size")?;
            let size = self.int_constant()?;
            tok = self.tok()?;
            size
        } else {
            self.index_block_size
        };
        if tok.text != ")" {
            return Err(Error::parse(tok.position, "')' expected"));
        }

        if model.query.is_some() {
            model.add_query_index(name, column.position, block_size);
            return Ok(());
        }
        let index = model
            .column_index(name)
            .ok_or_else(|| Error::invalid_column(column.position, name))?;
        if !model.columns[index].data_type.is_indexable() {
            return Err(Error::parse(
                column.position,
                "indexes are supported only for SYMBOL, STRING, INT and LONG",
            ));
        }
        model.set_index_flags(index, true, block_size);
        Ok(())
    }

    /// `cast(col as type [count n])`.
    fn parse_cast_clause(&mut self, model: &mut CreateTableModel) -> Result<()> {
        self.expect_tok("(")?;
        let column = self.tok()?;
        self.expect_tok("as")?;
        let type_tok = self.tok()?;
        let data_type = DataType::from_name(type_tok.text)
            .ok_or_else(|| Error::parse(type_tok.position, "invalid type"))?;

        let mut tok = self.tok()?;
        let mut count = None;
        if data_type == DataType::Symbol && tok.is("count") {
            let value = self.tok()?;
            count = Some(
                value
                    .text
                    .parse::<usize>()
                    .map_err(|_| Error::parse(value.position, "int value expected"))?,
            );
            tok = self.tok()?;
        }
        if tok.text != ")" {
            return Err(Error::parse(tok.position, "')' expected"));
        }

        let added = model.add_cast(ColumnCastModel {
            name: unquote(column.text).to_string(),
            position: column.position,
            data_type,
            type_position: type_tok.position,
            count,
        });
        if !added {
            return Err(Error::parse(column.position, "duplicate cast"));
        }
        Ok(())
    }

    fn int_constant(&mut self) -> Result<usize> {
        let tok = self.tok()?;
        tok.text
            .parse::<usize>()
            .map_err(|_| Error::parse(tok.position, "Int constant expected"))
    }

    fn not_term_tok(&mut self) -> Result<Token<'a>> {
        let tok = self.tok()?;
        if is_field_term(&tok) {
            return Err(Error::parse(tok.position, "Invalid column definition"));
        }
        Ok(tok)
    }
}
