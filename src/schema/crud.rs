//! Row-level operations on a table, built on the statement builder.
//!
//! Restrictions that cannot be translated exactly never widen a write:
//! `save_all` and `delete_all` then fetch the matching rows, re-filter
//! them in process and write each one by primary key.

use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::expr::{Binding, Expression, Node};
use crate::sql::{Assignment, Query, Statement};
use crate::types::{Kwargs, Row, Value};

use super::table::Table;

impl Table {
    /// Insert `row` and return it completed with generated keys.
    pub async fn insert(&self, db: &Database, row: &Row) -> Result<Row> {
        let compiled = db.builder().insert(self, row)?;
        let mut stored = row.clone();

        if !compiled.columns.is_empty() {
            let output = db.execute(&compiled.sql).await?;
            if let Some(cells) = output.rows.first() {
                stored.extend(compiled.decode_row(cells)?);
            }
            return Ok(stored);
        }

        let generated: Vec<_> = self
            .columns()
            .filter(|c| c.autoincrement && row.get(&c.key).map_or(true, Value::is_null))
            .collect();
        match (generated.as_slice(), db.dialect().last_insert_id_sql()) {
            ([column], Some(last_id)) => {
                let outputs = db.execute_all(&[compiled.sql.clone(), last_id]).await?;
                if let Some(wire) = outputs.last().and_then(|o| o.scalar()) {
                    stored.insert(column.key.clone(), column.pull(wire)?);
                }
            }
            _ => {
                db.execute(&compiled.sql).await?;
            }
        }
        Ok(stored)
    }

    /// Write the non-key values of `row` to the stored row with the same
    /// primary key. Returns the number of rows changed.
    pub async fn save(&self, db: &Database, row: &Row) -> Result<u64> {
        let restriction = self.key_restriction(row)?;
        let assignments: Vec<(String, Assignment)> = self
            .columns()
            .filter(|c| !c.is_key)
            .filter_map(|c| row.get(&c.key).map(|v| (c.key.clone(), Assignment::Value(v.clone()))))
            .collect();
        if assignments.is_empty() {
            return Ok(0);
        }
        let sql = db
            .builder()
            .update(self, &assignments, Some(&restriction), &Kwargs::new())?;
        Ok(db.execute(&sql).await?.affected.unwrap_or(0))
    }

    pub async fn save_all(
        &self,
        db: &Database,
        assignments: &[(String, Assignment)],
        restriction: Option<&Expression>,
        kwargs: &Kwargs,
    ) -> Result<u64> {
        if let Some(restriction) = restriction.filter(|r| self.is_imperfect(db, r, kwargs)) {
            let rows = self.fallback_rows(db, restriction, kwargs, "UPDATE").await?;
            let builder = db.builder();
            let statements = rows
                .iter()
                .map(|row| {
                    let by_key = self.key_restriction(row)?;
                    builder.update(self, assignments, Some(&by_key), kwargs)
                })
                .collect::<Result<Vec<_>>>()?;
            return affected(db, &statements).await;
        }
        let sql = db.builder().update(self, assignments, restriction, kwargs)?;
        Ok(db.execute(&sql).await?.affected.unwrap_or(0))
    }

    /// Delete the stored row with the primary key of `row`.
    pub async fn delete(&self, db: &Database, row: &Row) -> Result<u64> {
        let restriction = self.key_restriction(row)?;
        let sql = db.builder().delete(self, Some(&restriction), &Kwargs::new())?;
        Ok(db.execute(&sql).await?.affected.unwrap_or(0))
    }

    pub async fn delete_all(&self, db: &Database, restriction: Option<&Expression>, kwargs: &Kwargs) -> Result<u64> {
        if let Some(restriction) = restriction.filter(|r| self.is_imperfect(db, r, kwargs)) {
            let rows = self.fallback_rows(db, restriction, kwargs, "DELETE").await?;
            let builder = db.builder();
            let statements = rows
                .iter()
                .map(|row| {
                    let by_key = self.key_restriction(row)?;
                    builder.delete(self, Some(&by_key), &Kwargs::new())
                })
                .collect::<Result<Vec<_>>>()?;
            return affected(db, &statements).await;
        }
        let sql = db.builder().delete(self, restriction, kwargs)?;
        Ok(db.execute(&sql).await?.affected.unwrap_or(0))
    }

    /// First row matching `restriction`, if any.
    pub async fn select(&self, db: &Database, restriction: Option<&Expression>, kwargs: &Kwargs) -> Result<Option<Row>> {
        let exact = restriction.map_or(true, |r| !self.is_imperfect(db, r, kwargs));
        let mut statement = self.statement(restriction, kwargs);
        if exact {
            statement = statement.limit(1);
        }
        Ok(db.select(&statement).await?.into_iter().next())
    }

    pub async fn select_all(&self, db: &Database, restriction: Option<&Expression>, kwargs: &Kwargs) -> Result<Vec<Row>> {
        db.select(&self.statement(restriction, kwargs)).await
    }

    fn statement(&self, restriction: Option<&Expression>, kwargs: &Kwargs) -> Statement<'_> {
        let mut query = Query::new(self);
        if let Some(restriction) = restriction {
            query = query.filter(restriction.clone());
        }
        let mut statement = Statement::new(query);
        statement.kwargs = kwargs.clone();
        statement
    }

    /// Compile errors count as exact so the real statement reports them.
    fn is_imperfect(&self, db: &Database, restriction: &Expression, kwargs: &Kwargs) -> bool {
        let bindings = [Binding::new(self.name.clone(), self)];
        db.builder()
            .restriction(&bindings, restriction, kwargs)
            .map(|c| c.imperfect)
            .unwrap_or(false)
    }

    async fn fallback_rows(
        &self,
        db: &Database,
        restriction: &Expression,
        kwargs: &Kwargs,
        statement: &str,
    ) -> Result<Vec<Row>> {
        if self.key_columns().next().is_none() {
            return Err(Error::Translation(format!(
                "{} of {} needs an exact restriction: the table has no primary key to fall back on",
                statement, self.name
            )));
        }
        warn!(table = %self.name, %restriction, "imperfect restriction; writing row by row");
        let rows = self.select_all(db, Some(restriction), kwargs).await?;
        debug!(table = %self.name, rows = rows.len(), "rows selected for {}", statement);
        Ok(rows)
    }

    /// `row.k1 == v1 and row.k2 == v2 ...` over the primary key.
    fn key_restriction(&self, row: &Row) -> Result<Expression> {
        let mut body: Option<Node> = None;
        for column in self.key_columns() {
            let value = row
                .get(&column.key)
                .filter(|v| !v.is_null())
                .ok_or_else(|| Error::programmer(format!("row has no value for key {}.{}", self.name, column.key)))?;
            let term = Node::Param(0).attr(&column.key).eq(Node::constant(value.clone()));
            body = Some(match body {
                Some(body) => body.and(term),
                None => term,
            });
        }
        let body = body.ok_or_else(|| Error::programmer(format!("table {} has no primary key", self.name)))?;
        Expression::new(vec![self.name.clone()], body)
    }
}

async fn affected(db: &Database, statements: &[String]) -> Result<u64> {
    if statements.is_empty() {
        return Ok(0);
    }
    let outputs = db.execute_all(statements).await?;
    Ok(outputs.iter().filter_map(|o| o.affected).sum())
}
