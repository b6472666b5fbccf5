//! Statement assembly.
//!
//! Clauses are rendered one by one into `parts` and joined with spaces.
//! Restrictions go through the predicate compiler (and its cache); a
//! SELECT may carry an imperfect restriction as long as the caller can
//! re-filter the rows, UPDATE and DELETE may not.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::dialect::{Dialect, LimitStyle};
use crate::error::{Error, Result};
use crate::expr::{compile_predicate, Binding, CompiledPredicate, Compiler, Env, Expression, Node, DESC};
use crate::schema::{Column, Table};
use crate::types::{Kwargs, Row};

use super::join::FromClause;
use super::query::{Assignment, Attributes, CompiledStatement, Order, OutputColumn, Statement};

struct Projection {
    fields: Vec<String>,
    columns: Vec<OutputColumn>,
    /// Non-aggregate terms, when any term aggregates.
    group_by: Vec<String>,
    aggregate: bool,
}

#[derive(Clone, Copy)]
pub struct SqlBuilder<'a> {
    env: Env<'a>,
    strict: bool,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(env: Env<'a>) -> Self {
        Self { env, strict: false }
    }

    /// Refuse imperfect restrictions in every SELECT.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn env(&self) -> Env<'a> {
        self.env
    }

    pub fn restriction(
        &self,
        bindings: &[Binding<'_>],
        restriction: &Expression,
        kwargs: &Kwargs,
    ) -> Result<CompiledPredicate> {
        compile_predicate(self.env, bindings, restriction, kwargs)
    }

    pub fn select(&self, statement: &Statement<'_>) -> Result<CompiledStatement> {
        let dialect = self.env.dialect;
        let query = &statement.query;
        let kwargs = &statement.kwargs;
        let from = FromClause::resolve(self.env, &query.relation, kwargs)?;
        let bindings = from.bindings.as_slice();
        let projection = self.projection(&query.attributes, bindings, kwargs)?;

        let top = dialect.limit_style() == LimitStyle::Top;
        if top && statement.offset.is_some() {
            return Err(Error::Unsupported(format!(
                "{} has no OFFSET",
                dialect.name()
            )));
        }

        let mut parts = vec!["SELECT".to_string()];
        if statement.distinct {
            parts.push("DISTINCT".to_string());
        }
        if let (true, Some(limit)) = (top, statement.limit) {
            parts.push(format!("TOP {}", limit));
        }
        parts.push(projection.fields.join(", "));
        parts.push(format!("FROM {}", from.sql));

        let mut imperfect = false;
        if let Some(restriction) = &query.restriction {
            let compiled = self.restriction(bindings, restriction, kwargs)?;
            imperfect = compiled.imperfect;
            if compiled.sql != dialect.boolean_clause(true) {
                parts.push(format!("WHERE {}", compiled.sql));
            }
            if imperfect {
                let blocker = if statement.strict || self.strict {
                    Some("strict mode")
                } else if statement.limit.is_some() || statement.offset.is_some() {
                    Some("LIMIT/OFFSET")
                } else if projection.aggregate {
                    Some("an aggregate projection")
                } else if statement.distinct {
                    Some("DISTINCT")
                } else {
                    None
                };
                if let Some(blocker) = blocker {
                    return Err(Error::Translation(format!(
                        "restriction {} is not exactly representable in SQL, which {} requires",
                        restriction, blocker
                    )));
                }
                warn!(restriction = %restriction, "imperfect restriction; rows will be re-filtered");
            }
        }

        if !projection.group_by.is_empty() {
            parts.push(format!("GROUP BY {}", projection.group_by.join(", ")));
        }
        if let Some(order) = &statement.order {
            parts.push(format!("ORDER BY {}", self.order_by(order, bindings, kwargs)?));
        }
        if !top {
            if let Some(clause) = dialect.limit_clause(statement.limit, statement.offset) {
                parts.push(clause);
            }
        }

        Ok(CompiledStatement {
            sql: parts.join(" "),
            imperfect,
            columns: projection.columns,
        })
    }

    fn projection(&self, attributes: &Attributes, bindings: &[Binding<'_>], kwargs: &Kwargs) -> Result<Projection> {
        match attributes {
            Attributes::All => {
                let picked = bindings
                    .iter()
                    .enumerate()
                    .flat_map(|(i, b)| b.table.columns().map(move |c| (i, c)))
                    .collect();
                Ok(self.column_projection(bindings, picked))
            }
            Attributes::Columns(lists) => {
                if lists.len() != bindings.len() {
                    return Err(Error::ArityMismatch {
                        expected: bindings.len(),
                        found: lists.len(),
                    });
                }
                let mut picked = Vec::new();
                for (i, (binding, keys)) in bindings.iter().zip(lists).enumerate() {
                    for key in keys {
                        picked.push((i, lookup(binding.table, key)?));
                    }
                }
                Ok(self.column_projection(bindings, picked))
            }
            Attributes::Computed(expression) => self.computed_projection(expression, bindings, kwargs),
        }
    }

    fn column_projection(&self, bindings: &[Binding<'_>], picked: Vec<(usize, &Column)>) -> Projection {
        let dialect = self.env.dialect;
        let candidates: Vec<_> = picked
            .iter()
            .map(|(i, column)| (column.key.clone(), Some(bindings[*i].alias.as_str())))
            .collect();
        let names = output_names(&candidates);

        let mut fields = Vec::with_capacity(picked.len());
        let mut columns = Vec::with_capacity(picked.len());
        for ((i, column), name) in picked.iter().zip(names) {
            let mut output = OutputColumn::from_column(column, *i);
            output.name = name;
            let source = qualified(bindings, *i, column, dialect);
            fields.push(if output.name == column.name {
                source
            } else {
                format!("{} AS {}", source, dialect.quote_identifier(&output.name))
            });
            columns.push(output);
        }
        Projection {
            fields,
            columns,
            group_by: Vec::new(),
            aggregate: false,
        }
    }

    fn computed_projection(
        &self,
        expression: &Expression,
        bindings: &[Binding<'_>],
        kwargs: &Kwargs,
    ) -> Result<Projection> {
        let dialect = self.env.dialect;
        let mut compiler = Compiler::new(self.env, bindings, kwargs);
        let exprs = compiler.field_list(expression)?;
        let nodes: Vec<&Node> = match expression.body() {
            Node::Tuple(items) => items.iter().collect(),
            single => vec![single],
        };

        let sources: Vec<_> = nodes
            .iter()
            .map(|node| column_ref(node).filter(|(b, _)| *b < bindings.len()))
            .collect();
        let candidates: Vec<_> = exprs
            .iter()
            .zip(&sources)
            .enumerate()
            .map(|(i, (expr, source))| {
                let name = expr.name.clone().unwrap_or_else(|| format!("expr{}", i + 1));
                (name, source.map(|(b, _)| bindings[b].alias.as_str()))
            })
            .collect();
        let names = output_names(&candidates);
        let aggregate = exprs.iter().any(|e| e.aggregate);

        let mut projection = Projection {
            fields: Vec::with_capacity(exprs.len()),
            columns: Vec::with_capacity(exprs.len()),
            group_by: Vec::new(),
            aggregate,
        };
        for ((expr, source), name) in exprs.into_iter().zip(sources).zip(names) {
            if aggregate && !expr.aggregate && !expr.is_constant() {
                projection.group_by.push(expr.sql.clone());
            }
            projection
                .fields
                .push(format!("{} AS {}", expr.sql, dialect.quote_identifier(&name)));
            projection.columns.push(OutputColumn {
                name,
                key: source.map(|(_, key)| key.to_string()),
                binding: source.map(|(b, _)| b),
                host_type: expr.host_type,
                dbtype: expr.dbtype,
            });
        }
        Ok(projection)
    }

    fn order_by(&self, order: &Order, bindings: &[Binding<'_>], kwargs: &Kwargs) -> Result<String> {
        match order {
            Order::Columns(keys) => {
                if bindings.len() != 1 {
                    return Err(Error::programmer(
                        "ordering by column names needs a single table; order joins by expression",
                    ));
                }
                let table = bindings[0].table;
                let terms = keys
                    .iter()
                    .map(|k| lookup(table, k).map(|c| c.quoted_name.clone()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(terms.join(", "))
            }
            Order::Computed(expression) => {
                let items: Vec<&Node> = match expression.body() {
                    Node::Tuple(items) => items.iter().collect(),
                    single => vec![single],
                };
                let (terms, descending): (Vec<Node>, Vec<bool>) = items
                    .into_iter()
                    .map(|node| match node {
                        Node::Call { name, args } if name == DESC && args.len() == 1 => (args[0].clone(), true),
                        other => (other.clone(), false),
                    })
                    .unzip();
                let stripped = Expression::new(expression.params().to_vec(), Node::tuple(terms))?;
                let mut compiler = Compiler::new(self.env, bindings, kwargs);
                let exprs = compiler.field_list(&stripped)?;
                Ok(exprs
                    .iter()
                    .zip(descending)
                    .map(|(e, desc)| if desc { format!("{} DESC", e.sql) } else { e.sql.clone() })
                    .collect::<Vec<_>>()
                    .join(", "))
            }
        }
    }

    /// `UPDATE table SET ... [WHERE ...]`. The restriction and every
    /// computed value must translate exactly.
    pub fn update(
        &self,
        table: &Table,
        assignments: &[(String, Assignment)],
        restriction: Option<&Expression>,
        kwargs: &Kwargs,
    ) -> Result<String> {
        if assignments.is_empty() {
            return Err(Error::programmer(format!("UPDATE of {} without assignments", table.name)));
        }
        let dialect = self.env.dialect;
        let bindings = [Binding::new(table.name.clone(), table)];
        let mut sets = Vec::with_capacity(assignments.len());
        for (key, assignment) in assignments {
            let column = lookup(table, key)?;
            let value = match assignment {
                Assignment::Value(value) => column.push(value, dialect)?,
                Assignment::Expr(expression) => {
                    let mut compiler = Compiler::new(self.env, &bindings, kwargs);
                    let expr = compiler.value(expression)?;
                    match &expr.constant {
                        Some(value) => column.push(value, dialect)?,
                        None if expr.host_type == column.host_type
                            || (expr.host_type.is_numeric() && column.host_type.is_numeric()) =>
                        {
                            expr.sql
                        }
                        None => {
                            return Err(Error::value(format!(
                                "{} yields {} values, column {} holds {}",
                                expression, expr.host_type, column.name, column.host_type
                            )))
                        }
                    }
                }
            };
            sets.push(format!("{} = {}", column.quoted_name, value));
        }

        let mut parts = vec![
            format!("UPDATE {}", table.quoted_name),
            format!("SET {}", sets.join(", ")),
        ];
        if let Some(clause) = self.exact_where(&bindings, restriction, kwargs, "UPDATE")? {
            parts.push(clause);
        }
        Ok(parts.join(" "))
    }

    pub fn delete(&self, table: &Table, restriction: Option<&Expression>, kwargs: &Kwargs) -> Result<String> {
        let bindings = [Binding::new(table.name.clone(), table)];
        let mut parts = vec![format!("DELETE FROM {}", table.quoted_name)];
        if let Some(clause) = self.exact_where(&bindings, restriction, kwargs, "DELETE")? {
            parts.push(clause);
        }
        Ok(parts.join(" "))
    }

    /// `INSERT INTO table ...` for the columns present in `row`. When the
    /// dialect supports it, generated autoincrement values come back
    /// through RETURNING and `columns` describes them.
    pub fn insert(&self, table: &Table, row: &Row) -> Result<CompiledStatement> {
        let dialect = self.env.dialect;
        if let Some(unknown) = row.keys().find(|k| table.column(k).is_none()) {
            return Err(Error::mapping(format!("table {} has no column {:?}", table.name, unknown)));
        }

        let mut names = Vec::new();
        let mut values = Vec::new();
        let mut generated = Vec::new();
        for column in table.columns() {
            match row.get(&column.key).filter(|v| !v.is_null()) {
                Some(value) => {
                    names.push(column.quoted_name.clone());
                    values.push(column.push(value, dialect)?);
                }
                None if column.autoincrement => generated.push(column),
                None if row.contains_key(&column.key) => {
                    names.push(column.quoted_name.clone());
                    values.push("NULL".to_string());
                }
                None => {}
            }
        }

        let mut sql = if names.is_empty() {
            dialect.empty_insert_sql(&table.quoted_name)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.quoted_name,
                names.join(", "),
                values.join(", ")
            )
        };
        let mut columns = Vec::new();
        if !generated.is_empty() && dialect.supports_returning() {
            let returned: Vec<&str> = generated.iter().map(|c| c.quoted_name.as_str()).collect();
            sql.push_str(&format!(" RETURNING {}", returned.join(", ")));
            columns = generated.iter().map(|c| OutputColumn::from_column(c, 0)).collect();
        }
        Ok(CompiledStatement {
            sql,
            imperfect: false,
            columns,
        })
    }

    fn exact_where(
        &self,
        bindings: &[Binding<'_>],
        restriction: Option<&Expression>,
        kwargs: &Kwargs,
        statement: &str,
    ) -> Result<Option<String>> {
        let Some(restriction) = restriction else {
            return Ok(None);
        };
        let compiled = self.restriction(bindings, restriction, kwargs)?;
        if compiled.imperfect {
            return Err(Error::Translation(format!(
                "{} needs an exact restriction; {} is not representable in SQL",
                statement, restriction
            )));
        }
        if compiled.sql == self.env.dialect.boolean_clause(true) {
            return Ok(None);
        }
        Ok(Some(format!("WHERE {}", compiled.sql)))
    }
}

fn lookup<'t>(table: &'t Table, key: &str) -> Result<&'t Column> {
    table
        .column(key)
        .ok_or_else(|| Error::mapping(format!("table {} has no column {:?}", table.name, key)))
}

fn qualified(bindings: &[Binding<'_>], index: usize, column: &Column, dialect: &dyn Dialect) -> String {
    if bindings.len() > 1 {
        format!(
            "{}.{}",
            dialect.quote_identifier(&bindings[index].alias),
            column.quoted_name
        )
    } else {
        column.quoted_name.clone()
    }
}

/// `(binding, key)` when `node` is a plain column reference.
fn column_ref(node: &Node) -> Option<(usize, &str)> {
    match node {
        Node::Attr(target, key) => match target.as_ref() {
            Node::Param(i) => Some((*i, key.as_str())),
            _ => None,
        },
        Node::Alias(inner, _) => column_ref(inner),
        _ => None,
    }
}

/// Output names for a projection, one per `(name, table alias)`. A name
/// picked more than once is prefixed with its table alias, or numbered by
/// position when it has none. Should that collide with another output, a
/// counter is appended until it is free.
fn output_names(candidates: &[(String, Option<&str>)]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (name, _) in candidates {
        *counts.entry(name.as_str()).or_default() += 1;
    }
    let mut taken: HashSet<String> = candidates
        .iter()
        .filter(|(name, _)| counts[name.as_str()] == 1)
        .map(|(name, _)| name.clone())
        .collect();

    let mut names = Vec::with_capacity(candidates.len());
    for (i, (name, alias)) in candidates.iter().enumerate() {
        if counts[name.as_str()] == 1 {
            names.push(name.clone());
            continue;
        }
        let base = match alias {
            Some(alias) => format!("{}_{}", alias, name),
            None => format!("{}_{}", name, i + 1),
        };
        let mut unique = base.clone();
        let mut n = 2;
        while taken.contains(&unique) {
            unique = format!("{}_{}", base, n);
            n += 1;
        }
        taken.insert(unique.clone());
        names.push(unique);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, GenericDialect, MySqlDialect, PostgresDialect, SqliteDialect};
    use crate::expr::FunctionRegistry;
    use crate::schema::ColumnDef;
    use crate::sql::{verify, Query, Relation};
    use crate::types::{DatabaseTypeSet, HostType, TypeHints, Value};

    struct Fixture {
        dialect: Box<dyn Dialect>,
        set: DatabaseTypeSet,
        functions: FunctionRegistry,
        people: Table,
        pets: Table,
    }

    impl Fixture {
        fn new(dialect: Box<dyn Dialect>) -> Self {
            let set = dialect.type_set();
            let d = dialect.as_ref();
            let mut people = Table::new(d, "people");
            people
                .define(d, &set, ColumnDef::new("id", HostType::Int).primary_key().autoincrement())
                .unwrap();
            people
                .define(d, &set, ColumnDef::new("name", HostType::Str).hints(TypeHints::bytes(64)))
                .unwrap();
            people.define(d, &set, ColumnDef::new("age", HostType::Int)).unwrap();
            let mut pets = Table::new(d, "pets");
            pets.define(d, &set, ColumnDef::new("id", HostType::Int).primary_key()).unwrap();
            pets.define(d, &set, ColumnDef::new("owner_id", HostType::Int)).unwrap();
            pets.define(d, &set, ColumnDef::new("name", HostType::Str)).unwrap();
            pets.reference("owner_id", &people, "id").unwrap();
            Self {
                dialect,
                set,
                functions: FunctionRegistry::standard(),
                people,
                pets,
            }
        }

        fn builder(&self) -> SqlBuilder<'_> {
            SqlBuilder::new(Env::new(self.dialect.as_ref(), &self.set, &self.functions))
        }
    }

    fn generic() -> Fixture {
        Fixture::new(Box::new(GenericDialect))
    }

    #[test]
    fn test_select_all_single_table() {
        let f = generic();
        let adults = Expression::lambda(["p"], |[p]| p.attr("age").ge(18));
        let stmt = Statement::new(Query::new(&f.people).filter(adults));
        let compiled = f.builder().select(&stmt).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"id\", \"name\", \"age\" FROM \"people\" WHERE \"age\" >= 18"
        );
        assert!(!compiled.imperfect);
        assert_eq!(compiled.columns.len(), 3);
        verify(f.dialect.as_ref(), &compiled.sql).unwrap();
    }

    #[test]
    fn test_join_disambiguates_duplicate_names() {
        let f = generic();
        let rel = Relation::from(&f.pets).join(&f.people);
        let stmt = Statement::new(Query::new(rel).select(Attributes::Columns(vec![
            vec!["name".into()],
            vec!["name".into(), "age".into()],
        ])));
        let compiled = f.builder().select(&stmt).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"pets\".\"name\" AS \"pets_name\", \"people\".\"name\" AS \"people_name\", \
             \"people\".\"age\" FROM \"pets\" INNER JOIN \"people\" ON \"pets\".\"owner_id\" = \"people\".\"id\""
        );
        let names: Vec<_> = compiled.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pets_name", "people_name", "age"]);
        verify(f.dialect.as_ref(), &compiled.sql).unwrap();
    }

    #[test]
    fn test_prefixed_names_avoid_existing_columns() {
        let f = generic();
        let d = f.dialect.as_ref();
        let mut owners = Table::new(d, "owners");
        owners.define(d, &f.set, ColumnDef::new("id", HostType::Int).primary_key()).unwrap();
        owners.define(d, &f.set, ColumnDef::new("name", HostType::Str)).unwrap();
        owners.define(d, &f.set, ColumnDef::new("pets_name", HostType::Str)).unwrap();
        let mut pets = Table::new(d, "pets");
        pets.define(d, &f.set, ColumnDef::new("owner_id", HostType::Int)).unwrap();
        pets.define(d, &f.set, ColumnDef::new("name", HostType::Str)).unwrap();
        pets.reference("owner_id", &owners, "id").unwrap();

        let rel = Relation::from(&pets).join(&owners);
        let stmt = Statement::new(Query::new(rel));
        let compiled = f.builder().select(&stmt).unwrap();
        let names: Vec<_> = compiled.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["owner_id", "pets_name_2", "id", "owners_name", "pets_name"]);
        assert!(compiled.sql.contains("\"pets\".\"name\" AS \"pets_name_2\""), "{}", compiled.sql);

        let fields = Expression::lambda(["p", "o"], |[p, o]| {
            Node::tuple(vec![p.attr("name"), o.attr("name"), o.attr("pets_name")])
        });
        let stmt = Statement::new(Query::new(Relation::from(&pets).join(&owners)).select(Attributes::Computed(fields)));
        let compiled = f.builder().select(&stmt).unwrap();
        let names: Vec<_> = compiled.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pets_name_2", "owners_name", "pets_name"]);
    }

    #[test]
    fn test_decode_rejects_cell_count_mismatch() {
        let f = generic();
        let compiled = f.builder().select(&Statement::new(Query::new(&f.people))).unwrap();
        let short: Vec<crate::types::WireValue> = vec!["1".into(), "Ada".into()];
        assert!(matches!(compiled.decode_row(&short), Err(Error::Value(_))));
        let mut long = short.clone();
        long.extend(["36".into(), "extra".into()]);
        assert!(matches!(compiled.decode_row(&long), Err(Error::Value(_))));
        long.pop();
        assert_eq!(compiled.decode_row(&long).unwrap()["age"], Value::Int(36));
    }

    #[test]
    fn test_aggregates_group_by_the_rest() {
        let f = generic();
        let rel = Relation::from(&f.people).left_join(&f.pets);
        let fields = Expression::lambda(["p", "q"], |[p, q]| {
            Node::tuple(vec![p.attr("name"), Node::call("count", vec![q.attr("id")]).alias("pets")])
        });
        let order = Expression::lambda(["p", "q"], |[p, _q]| Node::tuple(vec![p.attr("name").desc()]));
        let stmt = Statement::new(Query::new(rel).select(Attributes::Computed(fields)))
            .order_by(Order::Computed(order));
        let compiled = f.builder().select(&stmt).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"people\".\"name\" AS \"name\", COUNT(\"pets\".\"id\") AS \"pets\" \
             FROM \"people\" LEFT JOIN \"pets\" ON \"pets\".\"owner_id\" = \"people\".\"id\" \
             GROUP BY \"people\".\"name\" ORDER BY \"people\".\"name\" DESC"
        );
        verify(f.dialect.as_ref(), &compiled.sql).unwrap();
    }

    #[test]
    fn test_imperfect_restriction_rules() {
        let f = generic();
        let fuzzy = Expression::lambda(["p"], |[p]| p.attr("age").gt(1) & Node::call("fuzzy", vec![p.attr("name")]));
        let stmt = Statement::new(Query::new(&f.people).filter(fuzzy.clone()));
        let compiled = f.builder().select(&stmt).unwrap();
        assert!(compiled.imperfect);
        assert!(compiled.sql.ends_with("WHERE (\"age\" > 1 AND TRUE)"));

        let ordered = stmt.clone().order_by(Order::Columns(vec!["age".into()]));
        assert!(f.builder().select(&ordered).is_ok());

        for stmt in [
            stmt.clone().limit(5),
            stmt.clone().offset(5),
            stmt.clone().distinct(),
            stmt.clone().strict(true),
        ] {
            assert!(matches!(f.builder().select(&stmt), Err(Error::Translation(_))));
        }
        assert!(matches!(
            f.builder().strict(true).select(&stmt),
            Err(Error::Translation(_))
        ));
    }

    #[test]
    fn test_always_true_restriction_drops_where() {
        let f = Fixture::new(Box::new(SqliteDialect));
        let everything = Expression::lambda(["p"], |[_p]| Node::constant(1).lt(2));
        let stmt = Statement::new(Query::new(&f.people).filter(everything)).limit(10).offset(20);
        assert_eq!(
            f.builder().select(&stmt).unwrap().sql,
            "SELECT \"id\", \"name\", \"age\" FROM \"people\" LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_order_by_columns_needs_single_table() {
        let f = generic();
        let rel = Relation::from(&f.pets).join(&f.people);
        let stmt = Statement::new(Query::new(rel)).order_by(Order::Columns(vec!["name".into()]));
        assert!(matches!(f.builder().select(&stmt), Err(Error::Programmer(_))));
        let stmt = Statement::new(Query::new(&f.people)).order_by(Order::Columns(vec!["nope".into()]));
        assert!(matches!(f.builder().select(&stmt), Err(Error::Mapping(_))));
    }

    #[test]
    fn test_update_with_values_and_expressions() {
        let f = generic();
        let bump = Expression::lambda(["p"], |[p]| p.attr("age") + 1);
        let who = Expression::lambda(["p"], |[p]| p.attr("name").eq("Ada"));
        let sql = f
            .builder()
            .update(
                &f.people,
                &[
                    ("age".into(), Assignment::Expr(bump)),
                    ("name".into(), Assignment::Value(Value::from("Ada L."))),
                ],
                Some(&who),
                &Kwargs::new(),
            )
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE \"people\" SET \"age\" = (\"age\" + 1), \"name\" = 'Ada L.' WHERE \"name\" = 'Ada'"
        );
        verify(f.dialect.as_ref(), &sql).unwrap();

        let fuzzy = Expression::lambda(["p"], |[p]| Node::call("fuzzy", vec![p.attr("name")]));
        let err = f
            .builder()
            .update(&f.people, &[("age".into(), Value::Int(1).into())], Some(&fuzzy), &Kwargs::new())
            .unwrap_err();
        assert!(matches!(err, Error::Translation(_)));

        let inexact = Expression::lambda(["p"], |[p]| Node::call("fuzzy", vec![p.attr("age")]));
        assert!(matches!(
            f.builder()
                .update(&f.people, &[("age".into(), inexact.into())], None, &Kwargs::new()),
            Err(Error::Translation(_))
        ));
    }

    #[test]
    fn test_delete_sql() {
        let f = generic();
        let young = Expression::lambda(["p"], |[p]| p.attr("age").lt(3));
        assert_eq!(
            f.builder().delete(&f.people, Some(&young), &Kwargs::new()).unwrap(),
            "DELETE FROM \"people\" WHERE \"age\" < 3"
        );
        assert_eq!(
            f.builder().delete(&f.people, None, &Kwargs::new()).unwrap(),
            "DELETE FROM \"people\""
        );
    }

    #[test]
    fn test_insert_returning_generated_key() {
        let f = Fixture::new(Box::new(PostgresDialect));
        let row: Row = [("name".to_string(), Value::from("Ada")), ("age".to_string(), Value::Int(36))]
            .into_iter()
            .collect();
        let compiled = f.builder().insert(&f.people, &row).unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO \"people\" (\"name\", \"age\") VALUES ('Ada', 36) RETURNING \"id\""
        );
        assert_eq!(compiled.columns[0].name, "id");
        verify(f.dialect.as_ref(), &compiled.sql).unwrap();

        let f = Fixture::new(Box::new(MySqlDialect));
        let compiled = f.builder().insert(&f.people, &Row::new()).unwrap();
        assert_eq!(compiled.sql, "INSERT INTO `people` () VALUES ()");
        assert!(compiled.columns.is_empty());

        let bad: Row = [("height".to_string(), Value::Int(1))].into_iter().collect();
        assert!(matches!(f.builder().insert(&f.people, &bad), Err(Error::Mapping(_))));
    }

    #[test]
    fn test_decode_and_split_rows() {
        let f = generic();
        let rel = Relation::from(&f.pets).join(&f.people);
        let stmt = Statement::new(Query::new(rel));
        let compiled = f.builder().select(&stmt).unwrap();
        let wire: Vec<crate::types::WireValue> = ["1", "7", "Rex", "7", "Ada", "36"]
            .into_iter()
            .map(Into::into)
            .collect();
        let row = compiled.decode_row(&wire).unwrap();
        assert_eq!(row["pets_name"], Value::from("Rex"));
        let parts = compiled.split_row(&row, 2);
        assert_eq!(parts[0]["name"], Value::from("Rex"));
        assert_eq!(parts[1]["name"], Value::from("Ada"));
        assert_eq!(parts[1]["age"], Value::Int(36));
    }
}
