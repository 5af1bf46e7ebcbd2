//! SQL text derivation from an [`EntityShape`].
//!
//! Naming policy: the table is the record type name verbatim and each column
//! is the field name verbatim, both unquoted. [`EntityShape::of`] only admits
//! plain identifiers, so no record-derived name can smuggle SQL. Every value
//! travels as a bound `?N` parameter.

use std::fmt;

use crate::error::{OrmError, Result};
use crate::record::EntityShape;
use crate::value::Value;

/// Which statement a [`SqlQuery`] was built for, carried into error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    SelectAll,
    SelectById,
    SelectWhere,
    Insert,
    Update,
    Delete,
    Migration,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::SelectAll => "select-all",
            StatementKind::SelectById => "select-by-id",
            StatementKind::SelectWhere => "select-where",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Migration => "migration",
        };
        f.write_str(name)
    }
}

/// SQL Query with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub kind: StatementKind,
    pub table: String,
    pub statement: String,
    pub params: Vec<Value>,
}

pub fn table_name(shape: &EntityShape) -> &str {
    &shape.type_name
}

pub fn column_name(field: &str) -> &str {
    field
}

fn placeholder(idx: usize) -> String {
    format!("?{idx}")
}

fn query(kind: StatementKind, shape: &EntityShape, statement: String, params: Vec<Value>) -> SqlQuery {
    SqlQuery {
        kind,
        table: table_name(shape).to_string(),
        statement,
        params,
    }
}

pub fn select_all(shape: &EntityShape) -> SqlQuery {
    let sql = format!("SELECT * FROM {}", table_name(shape));
    query(StatementKind::SelectAll, shape, sql, Vec::new())
}

pub fn select_by_id(shape: &EntityShape, id: Value) -> Result<SqlQuery> {
    let id_column = column_name(shape.id_field()?);
    let sql = format!(
        "SELECT * FROM {} WHERE {} = {}",
        table_name(shape),
        id_column,
        placeholder(1)
    );
    Ok(query(StatementKind::SelectById, shape, sql, vec![id]))
}

/// `predicate` is spliced into the statement as-is and `args` are bound unchanged.
///
/// The predicate is trusted caller text: it must never be assembled from
/// untrusted input. Values belong in `args`.
pub fn select_where(shape: &EntityShape, predicate: &str, args: Vec<Value>) -> SqlQuery {
    let sql = format!("SELECT * FROM {} WHERE {}", table_name(shape), predicate);
    query(StatementKind::SelectWhere, shape, sql, args)
}

pub fn insert(shape: &EntityShape) -> SqlQuery {
    let columns: Vec<&str> = shape.fields.iter().map(|f| column_name(f)).collect();
    let placeholders: Vec<String> = (1..=shape.fields.len()).map(placeholder).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_name(shape),
        columns.join(", "),
        placeholders.join(", ")
    );
    query(StatementKind::Insert, shape, sql, shape.values.clone())
}

/// Non-id columns are set in declaration order; the id is bound last.
pub fn update(shape: &EntityShape) -> Result<SqlQuery> {
    let Some(id_idx) = shape.id_index() else {
        return Err(OrmError::MissingIdField(shape.type_name.clone()));
    };
    if shape.fields.len() < 2 {
        return Err(OrmError::NotARecord(format!(
            "{} has no fields besides its id to update",
            shape.type_name
        )));
    }

    let mut assignments = Vec::with_capacity(shape.fields.len());
    let mut params = Vec::with_capacity(shape.fields.len());
    for (idx, (field, value)) in shape.fields.iter().zip(&shape.values).enumerate() {
        if idx == id_idx {
            continue;
        }
        params.push(value.clone());
        assignments.push(format!("{} = {}", column_name(field), placeholder(params.len())));
    }
    params.push(shape.values[id_idx].clone());

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        table_name(shape),
        assignments.join(", "),
        column_name(&shape.fields[id_idx]),
        placeholder(params.len())
    );
    Ok(query(StatementKind::Update, shape, sql, params))
}

pub fn delete(shape: &EntityShape, id: Value) -> Result<SqlQuery> {
    let id_column = column_name(shape.id_field()?);
    let sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        table_name(shape),
        id_column,
        placeholder(1)
    );
    Ok(query(StatementKind::Delete, shape, sql, vec![id]))
}
