/// Function and method handlers the compiler dispatches calls to.
///
/// A [`FunctionDef`] may carry an SQL handler, an in-process evaluator, or
/// both. Calls with no SQL handler compile as imperfect; calls with no
/// evaluator cannot be re-filtered or constant-folded.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Local;
use tracing::warn;

use crate::dialect::{escape_like, DatePart, Dialect};
use crate::error::{CannotRepresent, Error, Result};
use crate::types::{DatabaseType, DatabaseTypeSet, HostType, TypeHints, Value};

use super::eval;
use super::ops::CompareOp;
use super::sqlexpr::SqlExpression;

pub type Rendered = std::result::Result<SqlExpression, CannotRepresent>;

/// Renders a call given its compiled arguments. Method targets come first.
pub type SqlHandler = dyn Fn(&mut HandlerContext<'_>, &[SqlExpression]) -> Rendered + Send + Sync;

/// Evaluates a call in process.
pub type EvalHandler = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// What a handler may consult while rendering.
pub struct HandlerContext<'a> {
    pub dialect: &'a dyn Dialect,
    pub typeset: &'a DatabaseTypeSet,
    approximate: bool,
}

impl<'a> HandlerContext<'a> {
    pub fn new(dialect: &'a dyn Dialect, typeset: &'a DatabaseTypeSet) -> Self {
        Self {
            dialect,
            typeset,
            approximate: false,
        }
    }

    /// Mark the rendered SQL as matching a superset of the true result.
    pub fn approximate(&mut self) {
        self.approximate = true;
    }

    pub fn is_approximate(&self) -> bool {
        self.approximate
    }

    /// An expression of `host` type, typed with the default type for it.
    pub fn typed(&self, sql: impl Into<String>, host: HostType) -> Rendered {
        let dbtype = result_type(self.typeset, host).ok_or(CannotRepresent)?;
        Ok(SqlExpression::new(sql, host, dbtype))
    }

    pub fn predicate(&self, sql: impl Into<String>) -> Rendered {
        self.typed(sql, HostType::Bool)
    }
}

/// Default database type for computed values of `host`.
pub(crate) fn result_type(typeset: &DatabaseTypeSet, host: HostType) -> Option<DatabaseType> {
    let hints = match host {
        HostType::Int => TypeHints::bytes(8),
        _ => TypeHints::default(),
    };
    typeset.resolve(host, &hints).ok()
}

#[derive(Clone, Default)]
pub struct FunctionDef {
    sql: Option<Arc<SqlHandler>>,
    eval: Option<Arc<EvalHandler>>,
    aggregate: bool,
    volatile: bool,
}

impl FunctionDef {
    pub fn sql<F>(handler: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &[SqlExpression]) -> Rendered + Send + Sync + 'static,
    {
        Self {
            sql: Some(Arc::new(handler)),
            ..Default::default()
        }
    }

    /// A function only the in-process evaluator understands.
    pub fn eval<F>(evaluator: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            eval: Some(Arc::new(evaluator)),
            ..Default::default()
        }
    }

    pub fn with_eval<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.eval = Some(Arc::new(evaluator));
        self
    }

    pub fn aggregate(mut self) -> Self {
        self.aggregate = true;
        self
    }

    /// Never folded into a constant, even with constant arguments.
    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    pub fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    /// Whether constant arguments may be folded through the evaluator.
    pub fn is_foldable(&self) -> bool {
        self.eval.is_some() && !self.volatile && !self.aggregate
    }

    pub(crate) fn render(&self, ctx: &mut HandlerContext<'_>, args: &[SqlExpression]) -> Rendered {
        match &self.sql {
            Some(handler) => handler(ctx, args),
            None => Err(CannotRepresent),
        }
    }

    pub fn evaluate(&self, name: &str, args: &[Value]) -> Result<Value> {
        if self.aggregate {
            return Err(Error::Unsupported(format!(
                "aggregate {} cannot be evaluated per row",
                name
            )));
        }
        match &self.eval {
            Some(evaluator) => evaluator(args),
            None => Err(Error::Unsupported(format!(
                "{} has no in-process evaluator",
                name
            ))),
        }
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("sql", &self.sql.is_some())
            .field("eval", &self.eval.is_some())
            .field("aggregate", &self.aggregate)
            .field("volatile", &self.volatile)
            .finish()
    }
}

/// Handlers by name. Lookup order for free calls is builtin first, then
/// custom functions registered under their full name.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    methods: HashMap<String, FunctionDef>,
    builtins: HashMap<String, FunctionDef>,
    custom: HashMap<String, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FunctionRegistry {
    /// No handlers at all: every call compiles as imperfect.
    pub fn empty() -> Self {
        Self {
            methods: HashMap::new(),
            builtins: HashMap::new(),
            custom: HashMap::new(),
        }
    }

    /// String methods, case-insensitive comparisons, clock functions,
    /// aggregates and date parts.
    pub fn standard() -> Self {
        let mut registry = Self::empty();

        registry.methods.insert("startswith".into(), affix_def(Affix::Prefix, false));
        registry.methods.insert("endswith".into(), affix_def(Affix::Suffix, false));
        registry.methods.insert("lower".into(), case_def(false));
        registry.methods.insert("upper".into(), case_def(true));

        let b = &mut registry.builtins;
        b.insert("istartswith".into(), affix_def(Affix::Prefix, true));
        b.insert("iendswith".into(), affix_def(Affix::Suffix, true));
        b.insert("icontains".into(), affix_def(Affix::Infix, true));
        b.insert(
            "ieq".into(),
            FunctionDef::sql(|ctx, args| {
                let [a, b] = args else { return Err(CannotRepresent) };
                if a.host_type != HostType::Str || b.host_type != HostType::Str {
                    return Err(CannotRepresent);
                }
                let d = ctx.dialect;
                ctx.predicate(d.compare(&d.lower(&a.sql), CompareOp::Eq, &d.lower(&b.sql)))
            })
            .with_eval(|args| match args {
                [Value::Str(a), Value::Str(b)] => Ok(Value::Bool(a.to_lowercase() == b.to_lowercase())),
                _ => Err(arg_error("ieq", args)),
            }),
        );
        b.insert(
            "now".into(),
            FunctionDef::sql(|ctx, args| {
                if !args.is_empty() {
                    return Err(CannotRepresent);
                }
                ctx.typed(ctx.dialect.now(), HostType::DateTime)
            })
            .with_eval(|_| Ok(Value::DateTime(Local::now().naive_local())))
            .volatile(),
        );
        b.insert(
            "today".into(),
            FunctionDef::sql(|ctx, args| {
                if !args.is_empty() {
                    return Err(CannotRepresent);
                }
                ctx.typed(ctx.dialect.today(), HostType::Date)
            })
            .with_eval(|_| Ok(Value::Date(Local::now().date_naive())))
            .volatile(),
        );
        b.insert(
            "count".into(),
            FunctionDef::sql(|ctx, args| match args {
                [] => ctx.typed("COUNT(*)", HostType::Int),
                [x] => ctx.typed(format!("COUNT({})", x.sql), HostType::Int),
                _ => Err(CannotRepresent),
            })
            .aggregate(),
        );
        b.insert("min".into(), same_type_aggregate("MIN"));
        b.insert("max".into(), same_type_aggregate("MAX"));
        b.insert(
            "sum".into(),
            FunctionDef::sql(|ctx, args| {
                let [x] = args else { return Err(CannotRepresent) };
                let sql = format!("SUM({})", x.sql);
                match x.host_type {
                    HostType::Int => ctx.typed(sql, HostType::Int),
                    HostType::Float | HostType::Decimal => {
                        Ok(SqlExpression::new(sql, x.host_type, x.dbtype.clone()))
                    }
                    _ => Err(CannotRepresent),
                }
            })
            .aggregate(),
        );
        b.insert(
            "avg".into(),
            FunctionDef::sql(|ctx, args| {
                let [x] = args else { return Err(CannotRepresent) };
                let sql = format!("AVG({})", x.sql);
                match x.host_type {
                    HostType::Int | HostType::Float => ctx.typed(sql, HostType::Float),
                    HostType::Decimal => Ok(SqlExpression::new(sql, x.host_type, x.dbtype.clone())),
                    _ => Err(CannotRepresent),
                }
            })
            .aggregate(),
        );
        for part in [
            DatePart::Year,
            DatePart::Month,
            DatePart::Day,
            DatePart::Hour,
            DatePart::Minute,
            DatePart::Second,
        ] {
            let name = part.keyword().to_ascii_lowercase();
            let field = name.clone();
            b.insert(
                name,
                FunctionDef::sql(move |ctx, args| {
                    let [x] = args else { return Err(CannotRepresent) };
                    extract_part(ctx, part, x)
                })
                .with_eval(move |args| match args {
                    [v] => eval::attribute(v, &field),
                    _ => Err(arg_error(&field, args)),
                }),
            );
        }
        b.insert(
            "len".into(),
            FunctionDef::sql(|ctx, args| match args {
                [x] if x.host_type == HostType::Str => {
                    ctx.typed(ctx.dialect.length(&x.sql), HostType::Int)
                }
                _ => Err(CannotRepresent),
            })
            .with_eval(|args| match args {
                [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
                [Value::Bytes(b)] => Ok(Value::Int(b.len() as i64)),
                [Value::List(l)] => Ok(Value::Int(l.len() as i64)),
                _ => Err(arg_error("len", args)),
            }),
        );
        b.insert(
            "abs".into(),
            FunctionDef::sql(|_ctx, args| match args {
                [x] if x.host_type.is_numeric() => Ok(SqlExpression::new(
                    format!("ABS({})", x.sql),
                    x.host_type,
                    x.dbtype.clone(),
                )),
                _ => Err(CannotRepresent),
            })
            .with_eval(|args| match args {
                [Value::Int(i)] => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| Error::value("integer overflow")),
                [Value::Float(f)] => Ok(Value::Float(f.abs())),
                [Value::Decimal(d)] => Ok(Value::Decimal(d.abs())),
                [Value::Interval(d)] => Ok(Value::Interval(d.abs())),
                _ => Err(arg_error("abs", args)),
            }),
        );
        registry
    }

    /// Register a free function under its full name, e.g. `geo.distance`.
    pub fn register(&mut self, name: impl Into<String>, def: FunctionDef) -> &mut Self {
        self.custom.insert(name.into(), def);
        self
    }

    pub fn register_method(&mut self, name: impl Into<String>, def: FunctionDef) -> &mut Self {
        self.methods.insert(name.into(), def);
        self
    }

    pub fn method(&self, name: &str) -> Option<&FunctionDef> {
        self.methods.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.builtins
            .get(name)
            .or_else(|| self.builtins.get(&name.to_ascii_lowercase()))
            .or_else(|| self.custom.get(name))
    }
}

fn arg_error(name: &str, args: &[Value]) -> Error {
    let types: Vec<&str> = args.iter().map(|a| a.host_type().name()).collect();
    Error::value(format!("{}() does not accept ({})", name, types.join(", ")))
}

/// Where the needle sits in a LIKE pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Affix {
    Prefix,
    Suffix,
    Infix,
}

impl Affix {
    fn wrap(self, escaped: &str) -> String {
        match self {
            Affix::Prefix => format!("{}%", escaped),
            Affix::Suffix => format!("%{}", escaped),
            Affix::Infix => format!("%{}%", escaped),
        }
    }

    fn wrap_sql(self, dialect: &dyn Dialect, escaped: &str) -> String {
        let wild = dialect.quote_string("%");
        match self {
            Affix::Prefix => dialect.concat(escaped, &wild),
            Affix::Suffix => dialect.concat(&wild, escaped),
            Affix::Infix => dialect.concat(&dialect.concat(&wild, escaped), &wild),
        }
    }

    fn test(self, haystack: &str, needle: &str) -> bool {
        match self {
            Affix::Prefix => haystack.starts_with(needle),
            Affix::Suffix => haystack.ends_with(needle),
            Affix::Infix => haystack.contains(needle),
        }
    }
}

/// `target LIKE pattern` where the needle's metacharacters match literally.
pub(crate) fn like_test(
    ctx: &mut HandlerContext<'_>,
    target: &SqlExpression,
    needle: &SqlExpression,
    affix: Affix,
    case_insensitive: bool,
) -> Rendered {
    if target.host_type != HostType::Str || needle.host_type != HostType::Str {
        return Err(CannotRepresent);
    }
    let dialect = ctx.dialect;
    if case_insensitive && !dialect.folds_unicode_case() {
        // Outside ASCII the database would miss rows the host matches.
        let ascii = matches!(&needle.constant, Some(Value::Str(s)) if s.is_ascii());
        if !ascii {
            warn!(dialect = dialect.name(), "case-insensitive LIKE folds ASCII only; leaving test to the host");
            return Err(CannotRepresent);
        }
    }
    let pattern = match &needle.constant {
        Some(Value::Str(s)) => dialect.quote_string(&affix.wrap(&escape_like(s))),
        Some(_) => return Err(CannotRepresent),
        None => affix.wrap_sql(dialect, &dialect.escape_like_sql(&needle.sql)),
    };
    let (sql, exact) = dialect.like(&target.sql, &pattern, case_insensitive);
    if !exact {
        warn!(
            dialect = dialect.name(),
            case_insensitive, "LIKE does not match host semantics here; restriction over-approximates"
        );
        ctx.approximate();
    }
    ctx.predicate(sql)
}

fn affix_def(affix: Affix, case_insensitive: bool) -> FunctionDef {
    FunctionDef::sql(move |ctx, args| {
        let [target, needle] = args else { return Err(CannotRepresent) };
        like_test(ctx, target, needle, affix, case_insensitive)
    })
    .with_eval(move |args| match args {
        [Value::Str(h), Value::Str(n)] if case_insensitive => {
            Ok(Value::Bool(affix.test(&h.to_lowercase(), &n.to_lowercase())))
        }
        [Value::Str(h), Value::Str(n)] => Ok(Value::Bool(affix.test(h, n))),
        _ => Err(arg_error("like", args)),
    })
}

fn case_def(upper: bool) -> FunctionDef {
    FunctionDef::sql(move |ctx, args| {
        let [x] = args else { return Err(CannotRepresent) };
        if x.host_type != HostType::Str || !ctx.dialect.folds_unicode_case() {
            return Err(CannotRepresent);
        }
        let sql = if upper {
            ctx.dialect.upper(&x.sql)
        } else {
            ctx.dialect.lower(&x.sql)
        };
        Ok(SqlExpression::new(sql, HostType::Str, x.dbtype.clone()))
    })
    .with_eval(move |args| match args {
        [Value::Str(s)] if upper => Ok(Value::Str(s.to_uppercase())),
        [Value::Str(s)] => Ok(Value::Str(s.to_lowercase())),
        _ => Err(arg_error(if upper { "upper" } else { "lower" }, args)),
    })
}

fn same_type_aggregate(sql_name: &'static str) -> FunctionDef {
    FunctionDef::sql(move |_ctx, args| {
        let [x] = args else { return Err(CannotRepresent) };
        if matches!(x.host_type, HostType::Json | HostType::List | HostType::Null) {
            return Err(CannotRepresent);
        }
        Ok(SqlExpression::new(
            format!("{}({})", sql_name, x.sql),
            x.host_type,
            x.dbtype.clone(),
        ))
    })
    .aggregate()
}

/// A date or time field of a temporal expression, as an integer.
pub(crate) fn extract_part(
    ctx: &mut HandlerContext<'_>,
    part: DatePart,
    arg: &SqlExpression,
) -> Rendered {
    let date_part = matches!(part, DatePart::Year | DatePart::Month | DatePart::Day);
    let supported = match arg.host_type {
        HostType::DateTime => true,
        HostType::Date => date_part,
        HostType::Time => !date_part,
        _ => false,
    };
    if !supported {
        return Err(CannotRepresent);
    }
    ctx.typed(ctx.dialect.extract(part, &arg.sql), HostType::Int)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, PostgresDialect, SqliteDialect};

    fn column(dialect: &dyn Dialect, sql: &str, host: HostType) -> SqlExpression {
        let dbtype = result_type(&dialect.type_set(), host).unwrap();
        SqlExpression::new(sql, host, dbtype)
    }

    fn literal(dialect: &dyn Dialect, value: &str) -> SqlExpression {
        let dbtype = result_type(&dialect.type_set(), HostType::Str).unwrap();
        SqlExpression::constant(dialect.quote_string(value), Value::from(value), dbtype)
    }

    #[test]
    fn test_startswith_escapes_wildcards() {
        let dialect = GenericDialect;
        let typeset = dialect.type_set();
        let mut ctx = HandlerContext::new(&dialect, &typeset);
        let registry = FunctionRegistry::standard();
        let def = registry.method("startswith").unwrap();
        let out = def
            .render(
                &mut ctx,
                &[column(&dialect, "\"name\"", HostType::Str), literal(&dialect, "50%")],
            )
            .unwrap();
        assert_eq!(out.sql, "\"name\" LIKE '50\\%%' ESCAPE '\\'");
        assert_eq!(out.host_type, HostType::Bool);
        assert!(!ctx.is_approximate());
    }

    #[test]
    fn test_case_sensitive_like_is_approximate_on_sqlite() {
        let dialect = SqliteDialect;
        let typeset = dialect.type_set();
        let mut ctx = HandlerContext::new(&dialect, &typeset);
        let target = column(&dialect, "\"name\"", HostType::Str);
        let needle = literal(&dialect, "A");
        like_test(&mut ctx, &target, &needle, Affix::Prefix, false).unwrap();
        assert!(ctx.is_approximate());
    }

    #[test]
    fn test_icontains_uses_ilike_on_postgres() {
        let dialect = PostgresDialect;
        let typeset = dialect.type_set();
        let mut ctx = HandlerContext::new(&dialect, &typeset);
        let registry = FunctionRegistry::standard();
        let out = registry
            .function("icontains")
            .unwrap()
            .render(
                &mut ctx,
                &[column(&dialect, "\"title\"", HostType::Str), literal(&dialect, "a_b")],
            )
            .unwrap();
        assert!(out.sql.contains("ILIKE '%a\\_b%'"), "{}", out.sql);
    }

    #[test]
    fn test_non_ascii_icontains_left_to_host_on_sqlite() {
        let dialect = SqliteDialect;
        let typeset = dialect.type_set();
        let registry = FunctionRegistry::standard();
        let icontains = registry.function("icontains").unwrap();
        let target = column(&dialect, "\"name\"", HostType::Str);

        let mut ctx = HandlerContext::new(&dialect, &typeset);
        assert!(icontains.render(&mut ctx, &[target.clone(), literal(&dialect, "É")]).is_err());

        let mut ctx = HandlerContext::new(&dialect, &typeset);
        let out = icontains.render(&mut ctx, &[target, literal(&dialect, "e")]).unwrap();
        assert_eq!(out.sql, "\"name\" LIKE '%e%' ESCAPE '\\'");

        let pg = PostgresDialect;
        let pg_types = pg.type_set();
        let mut ctx = HandlerContext::new(&pg, &pg_types);
        let out = icontains
            .render(&mut ctx, &[column(&pg, "\"name\"", HostType::Str), literal(&pg, "É")])
            .unwrap();
        assert!(out.sql.contains("ILIKE '%É%'"), "{}", out.sql);
        assert!(!ctx.is_approximate());
    }

    #[test]
    fn test_aggregates_flagged_and_not_evaluable() {
        let registry = FunctionRegistry::standard();
        let count = registry.function("count").unwrap();
        assert!(count.is_aggregate());
        assert!(!count.is_foldable());
        assert!(count.evaluate("count", &[]).is_err());
        assert!(!registry.function("now").unwrap().is_foldable());
        assert!(registry.function("len").unwrap().is_foldable());
    }

    #[test]
    fn test_custom_functions_by_full_name() {
        let mut registry = FunctionRegistry::empty();
        registry.register(
            "geo.double",
            FunctionDef::eval(|args| match args {
                [Value::Int(i)] => Ok(Value::Int(i * 2)),
                _ => Err(Error::value("bad args")),
            }),
        );
        let def = registry.function("geo.double").unwrap();
        assert_eq!(def.evaluate("geo.double", &[Value::Int(4)]).unwrap(), Value::Int(8));
        assert!(registry.function("double").is_none());
        assert!(registry.function("count").is_none());
    }

    #[test]
    fn test_date_part_requires_matching_type() {
        let dialect = GenericDialect;
        let typeset = dialect.type_set();
        let mut ctx = HandlerContext::new(&dialect, &typeset);
        let date = column(&dialect, "\"born\"", HostType::Date);
        assert_eq!(
            extract_part(&mut ctx, DatePart::Year, &date).unwrap().sql,
            "EXTRACT(YEAR FROM \"born\")"
        );
        assert!(extract_part(&mut ctx, DatePart::Hour, &date).is_err());
    }

    #[test]
    fn test_builtin_evaluators() {
        let registry = FunctionRegistry::standard();
        let ieq = registry.function("ieq").unwrap();
        assert_eq!(
            ieq.evaluate("ieq", &[Value::from("ABC"), Value::from("abc")]).unwrap(),
            Value::Bool(true)
        );
        let len = registry.function("LEN").unwrap();
        assert_eq!(len.evaluate("len", &[Value::from("héllo")]).unwrap(), Value::Int(5));
    }
}
