//! Table state and constraint enforcement.
//!
//! Failures are worded like PostgreSQL's and carry its SQLSTATE codes.

use std::collections::BTreeMap;

use keystone_core::StorageFailure;
use uuid::Uuid;

use super::schema::{ColumnType, Row, TABLES, TableSchema, Value};

pub(crate) const ORIGIN: &str = "keystone_infra::memory::EngineError";

/// One write, as recorded in a transaction's change log.
#[derive(Debug, Clone)]
pub(crate) enum Change {
    Insert(&'static TableSchema, Row),
    Update(&'static TableSchema, Row),
    Delete(&'static TableSchema, Uuid),
}

/// Rows per table, in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    rows: BTreeMap<&'static str, Vec<Row>>,
}

impl Tables {
    pub fn rows(&self, table: &str) -> &[Row] {
        self.rows.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, table: &str, id: Uuid) -> Option<&Row> {
        self.rows(table).iter().find(|row| row.id == id)
    }

    /// Rows matching every `(column, value)` condition.
    pub fn select<'a>(
        &'a self,
        table: &str,
        conditions: &'a [(&'static str, Value)],
    ) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows(table).iter().filter(move |row| {
            conditions
                .iter()
                .all(|(column, value)| row.matches(column, value))
        })
    }

    /// Apply a change, or leave the tables untouched and report why not.
    pub fn apply(&mut self, change: &Change) -> Result<(), StorageFailure> {
        match change {
            Change::Insert(schema, row) => {
                self.validate(schema, row, true)?;
                self.rows.entry(schema.name).or_default().push(row.clone());
            }
            Change::Update(schema, row) => {
                self.validate(schema, row, false)?;
                // A row deleted concurrently is simply not updated.
                if let Some(slot) = self
                    .rows
                    .get_mut(schema.name)
                    .and_then(|rows| rows.iter_mut().find(|stored| stored.id == row.id))
                {
                    *slot = row.clone();
                }
            }
            Change::Delete(schema, id) => self.delete_cascade(schema.name, *id),
        }
        Ok(())
    }

    /// Bypasses every constraint.
    pub fn seed(&mut self, schema: &'static TableSchema, row: Row) {
        self.rows.entry(schema.name).or_default().push(row);
    }

    fn delete_cascade(&mut self, table: &'static str, id: Uuid) {
        let Some(rows) = self.rows.get_mut(table) else {
            return;
        };
        let before = rows.len();
        rows.retain(|row| row.id != id);
        if rows.len() == before {
            return;
        }

        let key = Value::Uuid(id);
        for dependent in TABLES.iter() {
            for fk in dependent.foreign_keys.iter().filter(|fk| fk.table == table) {
                let doomed: Vec<Uuid> = self
                    .rows(dependent.name)
                    .iter()
                    .filter(|row| row.matches(fk.column, &key))
                    .map(|row| row.id)
                    .collect();
                for child in doomed {
                    self.delete_cascade(dependent.name, child);
                }
            }
        }
    }

    fn validate(&self, schema: &TableSchema, row: &Row, inserting: bool) -> Result<(), StorageFailure> {
        if let Some(unknown) = row.values.keys().find(|name| schema.column(name).is_none()) {
            return Err(StorageFailure::programming(format!(
                "column \"{unknown}\" of relation \"{}\" does not exist",
                schema.name
            ))
            .with_code("42703")
            .with_origin(ORIGIN));
        }

        for column in schema.columns {
            match (row.get(column.name), column.ty) {
                (Value::Null, _) if !column.nullable => {
                    return Err(StorageFailure::integrity(format!(
                        "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                        column.name, schema.name
                    ))
                    .with_code("23502")
                    .with_origin(ORIGIN));
                }
                (Value::Null, _) | (Value::Bool(_), ColumnType::Bool) | (Value::Uuid(_), ColumnType::Uuid) => {}
                (Value::Text(text), ColumnType::Text { max_len }) => {
                    if text.chars().count() > max_len {
                        return Err(StorageFailure::data(format!(
                            "value too long for type character varying({max_len})"
                        ))
                        .with_code("22001")
                        .with_origin(ORIGIN));
                    }
                }
                (value, ty) => {
                    return Err(StorageFailure::data(format!(
                        "invalid input syntax for type {}: \"{value}\"",
                        ty.sql_name()
                    ))
                    .with_code("22P02")
                    .with_origin(ORIGIN));
                }
            }
        }

        for check in schema.checks {
            if let Value::Text(text) = row.get(check.column) {
                if text.trim().is_empty() {
                    return Err(StorageFailure::integrity(format!(
                        "new row for relation \"{}\" violates check constraint \"{}\"",
                        schema.name, check.name
                    ))
                    .with_code("23514")
                    .with_origin(ORIGIN));
                }
            }
        }

        if inserting && self.get(schema.name, row.id).is_some() {
            return Err(duplicate_key(
                &format!("{}_pkey", schema.name),
                "id",
                &row.id.to_string(),
            ));
        }

        for unique in schema.unique {
            let key: Vec<&Value> = unique.columns.iter().map(|column| row.get(column)).collect();
            if key.iter().any(|value| **value == Value::Null) {
                continue;
            }
            let taken = self.rows(schema.name).iter().any(|other| {
                other.id != row.id
                    && unique
                        .columns
                        .iter()
                        .zip(&key)
                        .all(|(column, value)| other.get(column) == *value)
            });
            if taken {
                let values: Vec<String> = key.iter().map(ToString::to_string).collect();
                return Err(duplicate_key(
                    unique.name,
                    &unique.columns.join(", "),
                    &values.join(", "),
                ));
            }
        }

        for fk in schema.foreign_keys {
            let value = row.get(fk.column);
            let present = match value {
                Value::Null => true,
                Value::Uuid(id) => self.get(fk.table, *id).is_some(),
                _ => false,
            };
            if !present {
                return Err(StorageFailure::integrity(format!(
                    "insert or update on table \"{}\" violates foreign key constraint \"{}\"\n\
                     DETAIL:  Key ({})=({value}) is not present in table \"{}\".",
                    schema.name, fk.name, fk.column, fk.table
                ))
                .with_code("23503")
                .with_origin(ORIGIN));
            }
        }

        Ok(())
    }
}

fn duplicate_key(constraint: &str, columns: &str, values: &str) -> StorageFailure {
    StorageFailure::integrity(format!(
        "duplicate key value violates unique constraint \"{constraint}\"\n\
         DETAIL:  Key ({columns})=({values}) already exists."
    ))
    .with_code("23505")
    .with_origin(ORIGIN)
}
