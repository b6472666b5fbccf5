//! FROM clause rendering: aliases for repeated tables and ON conditions.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::expr::{compile_predicate, Binding, CompareOp, Env};
use crate::schema::Table;
use crate::types::Kwargs;

use super::query::{Bias, Join, Relation};

/// A resolved relation: one binding per table, in relation order.
pub struct FromClause<'a> {
    pub bindings: Vec<Binding<'a>>,
    pub sql: String,
}

/// Aliases for `tables`: the table name, or `name_N` from the second
/// occurrence of a name on.
pub fn aliases(tables: &[&Table]) -> Vec<String> {
    let mut used = HashSet::new();
    tables
        .iter()
        .map(|table| {
            let mut alias = table.name.clone();
            let mut n = 1;
            while !used.insert(alias.clone()) {
                n += 1;
                alias = format!("{}_{}", table.name, n);
            }
            alias
        })
        .collect()
}

impl<'a> FromClause<'a> {
    pub fn resolve(env: Env<'_>, relation: &Relation<'a>, kwargs: &Kwargs) -> Result<Self> {
        let tables = relation.tables();
        let bindings: Vec<Binding<'a>> = aliases(&tables)
            .into_iter()
            .zip(tables)
            .map(|(alias, table)| Binding::new(alias, table))
            .collect();
        let sql = Renderer {
            env,
            bindings: &bindings,
            kwargs,
        }
        .render(relation, 0)?;
        Ok(Self { bindings, sql })
    }
}

struct Renderer<'e, 'b, 'a> {
    env: Env<'e>,
    bindings: &'b [Binding<'a>],
    kwargs: &'b Kwargs,
}

impl Renderer<'_, '_, '_> {
    fn render(&self, relation: &Relation<'_>, start: usize) -> Result<String> {
        match relation {
            Relation::Table(_) => Ok(self.table_ref(start)),
            Relation::Join(join) => self.render_join(join, start),
        }
    }

    fn render_join(&self, join: &Join<'_>, start: usize) -> Result<String> {
        let split = start + join.left.table_count();
        let end = split + join.right.table_count();
        let mut left = (self.render(&join.left, start)?, is_join(&join.left));
        let mut right = (self.render(&join.right, split)?, is_join(&join.right));
        let on = self.on_clause(join, start, split, end)?;

        let keyword = match join.bias {
            Bias::Right if !self.env.dialect.supports_right_join() => {
                std::mem::swap(&mut left, &mut right);
                Bias::Left.keyword()
            }
            bias => bias.keyword(),
        };
        let right_sql = if right.1 {
            format!("({})", right.0)
        } else {
            right.0
        };
        Ok(format!("{} {} {} ON {}", left.0, keyword, right_sql, on))
    }

    fn table_ref(&self, index: usize) -> String {
        let binding = &self.bindings[index];
        if binding.alias == binding.table.name {
            binding.table.quoted_name.clone()
        } else {
            format!(
                "{} AS {}",
                binding.table.quoted_name,
                self.env.dialect.quote_identifier(&binding.alias)
            )
        }
    }

    fn on_clause(&self, join: &Join<'_>, start: usize, split: usize, end: usize) -> Result<String> {
        let scope = &self.bindings[start..end];
        if let Some(path) = &join.path {
            let compiled = compile_predicate(self.env, scope, path, self.kwargs)?;
            if compiled.imperfect {
                return Err(Error::Translation(format!(
                    "join path {} cannot be expressed exactly in SQL",
                    path
                )));
            }
            return Ok(compiled.sql);
        }

        let (near, far) = scope.split_at(split - start);
        for l in near {
            for r in far {
                if let Some(on) = self.reference_path(l, r).or_else(|| self.reference_path(r, l)) {
                    return Ok(on);
                }
            }
        }
        Err(Error::Reference {
            near: names(near),
            far: names(far),
        })
    }

    /// ON condition from the references `near` declares towards `far`.
    fn reference_path(&self, near: &Binding<'_>, far: &Binding<'_>) -> Option<String> {
        let dialect = self.env.dialect;
        let terms: Vec<String> = near
            .table
            .references_to(&far.table.name)
            .filter_map(|r| {
                let n = near.table.column(&r.near)?;
                let f = far.table.column(&r.far)?;
                Some(dialect.compare(
                    &format!("{}.{}", dialect.quote_identifier(&near.alias), n.quoted_name),
                    CompareOp::Eq,
                    &format!("{}.{}", dialect.quote_identifier(&far.alias), f.quoted_name),
                ))
            })
            .collect();
        match terms.len() {
            0 => None,
            1 => terms.into_iter().next(),
            _ => Some(format!("({})", terms.join(" AND "))),
        }
    }
}

fn is_join(relation: &Relation<'_>) -> bool {
    matches!(relation, Relation::Join(_))
}

fn names(bindings: &[Binding<'_>]) -> String {
    bindings
        .iter()
        .map(|b| b.table.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
