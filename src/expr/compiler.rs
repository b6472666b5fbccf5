/// Expression tree → SQL.
///
/// The walk returns fragments tagged with whether they match the host
/// semantics exactly. A subexpression with no SQL equivalent fails with
/// [`CannotRepresent`]; the nearest enclosing AND/OR (or the root)
/// replaces it with TRUE and the result becomes imperfect, meaning the
/// SQL selects a superset of the true result. Positions where a superset
/// is not safe (under NOT, comparison and arithmetic operands, function
/// arguments, containment tests) demand exact fragments and escalate
/// anything else to `CannotRepresent`.
use tracing::debug;

use crate::adapter::operand_sql;
use crate::dialect::{DatePart, Dialect};
use crate::error::{CannotRepresent, Error, Result};
use crate::schema::Table;
use crate::types::{DatabaseType, DatabaseTypeSet, HostType, Kwargs, TypeFamily, TypeHints, Value};

use super::cache::{CacheKey, CompileCache, CompiledPredicate};
use super::eval;
use super::expression::Expression;
use super::functions::{extract_part, like_test, result_type, Affix, FunctionDef, FunctionRegistry, HandlerContext};
use super::node::Node;
use super::ops::{binary_result, comparable, BinaryOp, CompareOp};
use super::sqlexpr::SqlExpression;

/// A table in scope, under the alias its columns are qualified with.
#[derive(Debug, Clone)]
pub struct Binding<'a> {
    pub alias: String,
    pub table: &'a Table,
}

impl<'a> Binding<'a> {
    pub fn new(alias: impl Into<String>, table: &'a Table) -> Self {
        Self {
            alias: alias.into(),
            table,
        }
    }
}

/// Everything compilation reads besides the tree itself.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub dialect: &'a dyn Dialect,
    pub typeset: &'a DatabaseTypeSet,
    pub functions: &'a FunctionRegistry,
    pub cache: Option<&'a CompileCache>,
}

impl<'a> Env<'a> {
    pub fn new(dialect: &'a dyn Dialect, typeset: &'a DatabaseTypeSet, functions: &'a FunctionRegistry) -> Self {
        Self {
            dialect,
            typeset,
            functions,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a CompileCache) -> Self {
        self.cache = Some(cache);
        self
    }
}

enum Fail {
    Cannot,
    Hard(Error),
}

impl From<Error> for Fail {
    fn from(err: Error) -> Self {
        Fail::Hard(err)
    }
}

impl From<CannotRepresent> for Fail {
    fn from(_: CannotRepresent) -> Self {
        Fail::Cannot
    }
}

type Walk<T> = std::result::Result<T, Fail>;

struct Fragment {
    expr: SqlExpression,
    exact: bool,
    /// Boolean-valued SQL usable directly in WHERE/ON/AND/OR.
    predicate: bool,
}

impl Fragment {
    fn value(expr: SqlExpression) -> Self {
        Self {
            expr,
            exact: true,
            predicate: false,
        }
    }
}

/// Database type for an inline literal of `value`.
pub(crate) fn literal_type(typeset: &DatabaseTypeSet, value: &Value) -> Result<DatabaseType> {
    let hints = match value {
        Value::Null | Value::List(_) => {
            return Ok(DatabaseType::new(
                value.host_type().name().to_ascii_uppercase(),
                TypeFamily::Varchar,
            ))
        }
        Value::Int(_) => TypeHints::bytes(8),
        Value::Decimal(d) => {
            let scale = d.scale();
            let digits = d.mantissa().unsigned_abs().to_string().len() as u32;
            TypeHints::precision(digits.max(scale).max(1), scale)
        }
        _ => TypeHints::default(),
    };
    typeset.resolve(value.host_type(), &hints)
}

pub struct Compiler<'a> {
    env: Env<'a>,
    bindings: &'a [Binding<'a>],
    kwargs: &'a Kwargs,
    params: Vec<String>,
    imperfect: bool,
}

impl<'a> Compiler<'a> {
    pub fn new(env: Env<'a>, bindings: &'a [Binding<'a>], kwargs: &'a Kwargs) -> Self {
        Self {
            env,
            bindings,
            kwargs,
            params: Vec::new(),
            imperfect: false,
        }
    }

    /// True once any compiled predicate had to be over-approximated.
    pub fn is_imperfect(&self) -> bool {
        self.imperfect
    }

    /// Compile a predicate. Never fails for untranslatable parts: those
    /// become TRUE and set the imperfect flag.
    pub fn code(&mut self, expression: &Expression) -> Result<SqlExpression> {
        self.start(expression)?;
        match self.predicate(expression.body()) {
            Ok(fragment) => {
                if !fragment.exact {
                    self.imperfect = true;
                }
                Ok(fragment.expr)
            }
            Err(Fail::Cannot) => {
                self.imperfect = true;
                self.bool_constant(true)
                    .map(|f| f.expr)
                    .map_err(|_| Error::Unsupported("no boolean type".into()))
            }
            Err(Fail::Hard(err)) => Err(err),
        }
    }

    /// Compile a value expression that must translate exactly, such as
    /// an UPDATE assignment.
    pub fn value(&mut self, expression: &Expression) -> Result<SqlExpression> {
        self.start(expression)?;
        self.exact_value(expression.body(), expression)
    }

    /// Compile a projection: a tuple of expressions, or a single one.
    pub fn field_list(&mut self, expression: &Expression) -> Result<Vec<SqlExpression>> {
        self.start(expression)?;
        let items: Vec<&Node> = match expression.body() {
            Node::Tuple(items) => items.iter().collect(),
            single => vec![single],
        };
        items
            .into_iter()
            .enumerate()
            .map(|(i, node)| {
                let mut expr = self.exact_value(node, expression)?;
                if expr.name.is_none() {
                    expr.name = Some(default_name(node, i));
                }
                Ok(expr)
            })
            .collect()
    }

    fn start(&mut self, expression: &Expression) -> Result<()> {
        if expression.arity() != self.bindings.len() {
            return Err(Error::ArityMismatch {
                expected: expression.arity(),
                found: self.bindings.len(),
            });
        }
        self.params = expression.params().to_vec();
        Ok(())
    }

    fn exact_value(&mut self, node: &Node, expression: &Expression) -> Result<SqlExpression> {
        let untranslatable = || {
            Error::Translation(format!(
                "{} in {} cannot be expressed exactly in SQL",
                node.repr(expression.params()),
                expression
            ))
        };
        match self.walk(node) {
            Ok(f) if f.exact && !matches!(f.expr.constant, Some(Value::List(_))) => Ok(self.operand(f)),
            Ok(_) | Err(Fail::Cannot) => Err(untranslatable()),
            Err(Fail::Hard(err)) => Err(err),
        }
    }

    fn repr(&self, node: &Node) -> String {
        node.repr(&self.params)
    }

    fn dialect(&self) -> &'a dyn Dialect {
        self.env.dialect
    }

    fn handler_context(&self) -> HandlerContext<'a> {
        HandlerContext::new(self.env.dialect, self.env.typeset)
    }

    // ---- walk ----

    fn walk(&mut self, node: &Node) -> Walk<Fragment> {
        match node {
            Node::Param(i) => Err(Fail::Hard(Error::programmer(format!(
                "row parameter {} used as a value",
                self.repr(&Node::Param(*i))
            )))),
            Node::Attr(target, name) => self.attribute(target, name),
            Node::Const(value) => self.literal(value.clone()),
            Node::Kwarg(name) => {
                let value = eval::kwarg(self.kwargs, name)?;
                self.literal(value)
            }
            Node::Subscript(target, key) => {
                let target = self.exact(target)?;
                let key = self.exact(key)?;
                match (&target.expr.constant, &key.expr.constant) {
                    (Some(t), Some(k)) => self.literal(eval::subscript(t, k)?),
                    _ => Err(Fail::Cannot),
                }
            }
            Node::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match self.exact(item)?.expr.constant {
                        Some(v) => values.push(v),
                        None => return Err(Fail::Cannot),
                    }
                }
                self.literal(Value::List(values))
            }
            Node::Call { name, args } => {
                let functions = self.env.functions;
                let def = functions.function(name).ok_or(Fail::Cannot)?;
                let args: Vec<&Node> = args.iter().collect();
                self.call(name, def, &args)
            }
            Node::Method { target, name, args } => {
                let functions = self.env.functions;
                let def = functions.method(name).ok_or(Fail::Cannot)?;
                let all: Vec<&Node> = std::iter::once(target.as_ref()).chain(args.iter()).collect();
                self.call(name, def, &all)
            }
            Node::Compare(l, op, r) => self.comparison(l, *op, r),
            Node::In {
                item,
                collection,
                negated,
            } => self.containment(item, collection, *negated),
            Node::Binary(l, op, r) => self.arithmetic(l, *op, r),
            Node::And(items) => self.junction(items, true),
            Node::Or(items) => self.junction(items, false),
            Node::Not(inner) => {
                let f = self.exact_predicate(inner)?;
                if let Some(v) = &f.expr.constant {
                    return self.bool_constant(!v.truthy());
                }
                self.predicate_fragment(format!("NOT ({})", f.expr.sql), f.expr.aggregate, true)
            }
            Node::Neg(inner) => {
                let f = self.exact(inner)?;
                if let Some(v) = &f.expr.constant {
                    return self.literal(eval::negate(v)?);
                }
                let host = f.expr.host_type;
                if !(host.is_numeric() || host == HostType::Interval) {
                    return Err(Fail::Cannot);
                }
                let e = f.expr;
                Ok(Fragment::value(
                    SqlExpression::new(format!("(-{})", e.sql), host, e.dbtype).with_aggregate(e.aggregate),
                ))
            }
            Node::Alias(inner, name) => {
                let mut f = self.walk(inner)?;
                f.expr.name = Some(name.clone());
                Ok(f)
            }
        }
    }

    fn exact(&mut self, node: &Node) -> Walk<Fragment> {
        let f = self.walk(node)?;
        if f.exact {
            Ok(f)
        } else {
            Err(Fail::Cannot)
        }
    }

    /// Walk `node` and coerce the result into predicate form.
    fn predicate(&mut self, node: &Node) -> Walk<Fragment> {
        let f = self.walk(node)?;
        if f.predicate {
            return Ok(f);
        }
        if let Some(v) = &f.expr.constant {
            return self.bool_constant(v.truthy());
        }
        if f.expr.host_type == HostType::Bool {
            let dialect = self.dialect();
            let truth = f.expr.adapter().push(&Value::Bool(true), &f.expr.dbtype, dialect)?;
            let sql = dialect.compare(&f.expr.sql, CompareOp::Eq, &truth);
            return self.predicate_fragment(sql, f.expr.aggregate, f.exact);
        }
        Err(Fail::Cannot)
    }

    fn exact_predicate(&mut self, node: &Node) -> Walk<Fragment> {
        let f = self.predicate(node)?;
        if f.exact {
            Ok(f)
        } else {
            Err(Fail::Cannot)
        }
    }

    /// A fragment as an operand of a larger expression.
    fn operand(&self, f: Fragment) -> SqlExpression {
        let mut expr = f.expr;
        match expr.constant {
            Some(Value::Bool(b)) => expr.sql = self.dialect().bool_literal(b),
            _ if f.predicate => expr.sql = format!("({})", expr.sql),
            _ => {}
        }
        expr
    }

    fn bool_type(&self) -> Walk<DatabaseType> {
        result_type(self.env.typeset, HostType::Bool).ok_or(Fail::Cannot)
    }

    fn bool_constant(&self, value: bool) -> Walk<Fragment> {
        let dbtype = self.bool_type()?;
        Ok(Fragment {
            expr: SqlExpression::constant(self.dialect().boolean_clause(value), Value::Bool(value), dbtype),
            exact: true,
            predicate: true,
        })
    }

    fn predicate_fragment(&self, sql: String, aggregate: bool, exact: bool) -> Walk<Fragment> {
        let dbtype = self.bool_type()?;
        Ok(Fragment {
            expr: SqlExpression::new(sql, HostType::Bool, dbtype).with_aggregate(aggregate),
            exact,
            predicate: true,
        })
    }

    fn literal(&self, value: Value) -> Walk<Fragment> {
        if let Value::Bool(b) = value {
            return self.bool_constant(b);
        }
        let dbtype = literal_type(self.env.typeset, &value)?;
        let sql = match &value {
            Value::List(_) => String::new(),
            v => dbtype.adapter(v.host_type()).push(v, &dbtype, self.dialect())?,
        };
        Ok(Fragment::value(SqlExpression::constant(sql, value, dbtype)))
    }

    fn column(&self, index: usize, key: &str) -> Walk<Fragment> {
        let binding = self.bindings.get(index).ok_or(Fail::Hard(Error::ArityMismatch {
            expected: index + 1,
            found: self.bindings.len(),
        }))?;
        let column = binding.table.column(key).ok_or_else(|| {
            Fail::Hard(Error::mapping(format!(
                "table {} has no column {:?}",
                binding.table.name, key
            )))
        })?;
        let sql = if self.bindings.len() > 1 {
            format!(
                "{}.{}",
                self.dialect().quote_identifier(&binding.alias),
                column.quoted_name
            )
        } else {
            column.quoted_name.clone()
        };
        Ok(Fragment::value(
            SqlExpression::new(sql, column.host_type, column.dbtype.clone()).named(column.key.clone()),
        ))
    }

    fn attribute(&mut self, target: &Node, name: &str) -> Walk<Fragment> {
        if let Node::Param(i) = target {
            return self.column(*i, name);
        }
        let base = self.exact(target)?;
        if let Some(v) = &base.expr.constant {
            return self.literal(eval::attribute(v, name)?);
        }
        let part = DatePart::from_name(name).ok_or(Fail::Cannot)?;
        let mut ctx = self.handler_context();
        let expr = extract_part(&mut ctx, part, &base.expr)?;
        Ok(Fragment::value(expr.with_aggregate(base.expr.aggregate)))
    }

    fn call(&mut self, name: &str, def: &FunctionDef, args: &[&Node]) -> Walk<Fragment> {
        let mut frags = Vec::with_capacity(args.len());
        for arg in args {
            frags.push(self.exact(arg)?);
        }
        if def.is_foldable() {
            let constants: Option<Vec<Value>> = frags.iter().map(|f| f.expr.constant.clone()).collect();
            if let Some(values) = constants {
                return self.literal(def.evaluate(name, &values)?);
            }
        }
        let exprs: Vec<SqlExpression> = frags.into_iter().map(|f| self.operand(f)).collect();
        let aggregate = def.is_aggregate() || exprs.iter().any(|e| e.aggregate);
        let mut ctx = self.handler_context();
        let expr = def.render(&mut ctx, &exprs)?;
        let predicate = expr.host_type == HostType::Bool;
        Ok(Fragment {
            expr: expr.with_aggregate(aggregate),
            exact: !ctx.is_approximate(),
            predicate,
        })
    }

    fn comparison(&mut self, l: &Node, op: CompareOp, r: &Node) -> Walk<Fragment> {
        let mut lf = self.exact(l)?;
        let mut rf = self.exact(r)?;
        let (lnull, rnull) = (lf.expr.is_null(), rf.expr.is_null());
        if (lnull || rnull) && !op.is_equality() {
            return Err(Fail::Hard(Error::IllegalNullComparison(format!(
                "{} {} {}",
                self.repr(l),
                op,
                self.repr(r)
            ))));
        }
        if let (Some(a), Some(b)) = (&lf.expr.constant, &rf.expr.constant) {
            return self.bool_constant(eval::compare(a, op, b)?);
        }
        let aggregate = lf.expr.aggregate || rf.expr.aggregate;
        if lnull || rnull {
            let other = self.operand(if lnull { rf } else { lf });
            let not = if op == CompareOp::Ne { "NOT " } else { "" };
            return self.predicate_fragment(format!("{} IS {}NULL", other.sql, not), aggregate, true);
        }
        if !comparable(lf.expr.host_type, op, rf.expr.host_type) {
            return Err(Fail::Cannot);
        }

        // Keep the non-constant side on the left so constants are
        // encoded through the column's type.
        let mut op = op;
        if lf.expr.is_constant() {
            std::mem::swap(&mut lf, &mut rf);
            op = op.mirror();
        }
        let (lhs, rhs) = (self.operand(lf), self.operand(rf));
        let dialect = self.dialect();
        let sql = lhs
            .adapter()
            .compare_op(&lhs, op, &rhs, dialect)
            .or_else(|_| rhs.adapter().compare_op(&rhs, op.mirror(), &lhs, dialect))?;
        self.predicate_fragment(sql, aggregate, true)
    }

    fn containment(&mut self, item: &Node, collection: &Node, negated: bool) -> Walk<Fragment> {
        let item = self.exact(item)?;

        // A tuple with column references becomes an IN over expressions.
        if let Node::Tuple(members) = collection {
            let mut frags = Vec::with_capacity(members.len());
            for member in members {
                frags.push(self.exact(member)?);
            }
            if frags.iter().any(|f| !f.expr.is_constant()) {
                return self.membership(item, frags, negated);
            }
        }

        let collection = self.exact(collection)?;
        if let (Some(i), Some(c)) = (&item.expr.constant, &collection.expr.constant) {
            return self.bool_constant(eval::contains(c, i)? != negated);
        }
        match collection.expr.constant.clone() {
            Some(Value::List(values)) => {
                let mut members = Vec::with_capacity(values.len());
                for value in values {
                    members.push(self.literal(value)?);
                }
                self.membership(item, members, negated)
            }
            _ if collection.expr.host_type == HostType::Str => self.substring(collection, item, negated),
            _ => Err(Fail::Cannot),
        }
    }

    /// `item [NOT] IN (members)`, with NULL members tested separately.
    fn membership(&mut self, item: Fragment, members: Vec<Fragment>, negated: bool) -> Walk<Fragment> {
        if members.is_empty() {
            return self.bool_constant(negated);
        }
        let item = self.operand(item);
        let dialect = self.dialect();
        let mut aggregate = item.aggregate;
        let mut has_null = false;
        let mut sqls = Vec::with_capacity(members.len());
        for member in members {
            if member.expr.is_null() {
                has_null = true;
                continue;
            }
            if !comparable(item.host_type, CompareOp::Eq, member.expr.host_type) {
                return Err(Fail::Cannot);
            }
            let member = self.operand(member);
            aggregate |= member.aggregate;
            sqls.push(operand_sql(&item, &member, dialect));
        }

        let null_test = format!("{} IS {}NULL", item.sql, if negated { "NOT " } else { "" });
        let sql = match (sqls.is_empty(), has_null, negated) {
            (true, _, _) => null_test,
            (false, false, false) => format!("{} IN ({})", item.sql, sqls.join(", ")),
            (false, false, true) => format!("{} NOT IN ({})", item.sql, sqls.join(", ")),
            (false, true, false) => format!("({} IN ({}) OR {})", item.sql, sqls.join(", "), null_test),
            (false, true, true) => format!("({} NOT IN ({}) AND {})", item.sql, sqls.join(", "), null_test),
        };
        self.predicate_fragment(sql, aggregate, true)
    }

    /// `needle in haystack` for strings, as a LIKE test.
    fn substring(&mut self, haystack: Fragment, needle: Fragment, negated: bool) -> Walk<Fragment> {
        let aggregate = haystack.expr.aggregate || needle.expr.aggregate;
        let (haystack, needle) = (self.operand(haystack), self.operand(needle));
        let mut ctx = self.handler_context();
        let test = like_test(&mut ctx, &haystack, &needle, Affix::Infix, false)?;
        let exact = !ctx.is_approximate();
        if negated {
            if !exact {
                return Err(Fail::Cannot);
            }
            return self.predicate_fragment(format!("NOT ({})", test.sql), aggregate, true);
        }
        self.predicate_fragment(test.sql, aggregate, exact)
    }

    fn arithmetic(&mut self, l: &Node, op: BinaryOp, r: &Node) -> Walk<Fragment> {
        let lf = self.exact(l)?;
        let rf = self.exact(r)?;
        if let (Some(a), Some(b)) = (&lf.expr.constant, &rf.expr.constant) {
            return self.literal(eval::arithmetic(a, op, b)?);
        }
        let result = binary_result(lf.expr.host_type, op, rf.expr.host_type).ok_or(Fail::Cannot)?;
        let (lhs, rhs) = (self.operand(lf), self.operand(rf));
        let sql = lhs.adapter().binary_op(&lhs, op, &rhs, self.dialect())?;
        let dbtype = if result == lhs.host_type {
            lhs.dbtype.clone()
        } else if result == rhs.host_type {
            rhs.dbtype.clone()
        } else {
            result_type(self.env.typeset, result).ok_or(Fail::Cannot)?
        };
        Ok(Fragment::value(
            SqlExpression::new(sql, result, dbtype).with_aggregate(lhs.aggregate || rhs.aggregate),
        ))
    }

    /// AND (`conjunction`) or OR over predicate children. Children that
    /// cannot be translated become TRUE and make the result inexact.
    fn junction(&mut self, items: &[Node], conjunction: bool) -> Walk<Fragment> {
        if items.is_empty() {
            return self.bool_constant(conjunction);
        }
        let mut parts = Vec::with_capacity(items.len());
        let mut exact = true;
        let mut aggregate = false;
        for item in items {
            match self.predicate(item) {
                Ok(f) => {
                    exact &= f.exact;
                    aggregate |= f.expr.aggregate;
                    parts.push(f.expr.sql);
                }
                Err(Fail::Cannot) => {
                    debug!(clause = %self.repr(item), "clause not representable; substituting TRUE");
                    exact = false;
                    parts.push(self.dialect().boolean_clause(true));
                }
                Err(hard) => return Err(hard),
            }
        }
        let sql = if parts.len() == 1 {
            parts.remove(0)
        } else {
            let keyword = if conjunction { " AND " } else { " OR " };
            format!("({})", parts.join(keyword))
        };
        self.predicate_fragment(sql, aggregate, exact)
    }
}

fn default_name(node: &Node, index: usize) -> String {
    match node {
        Node::Attr(_, name) => name.clone(),
        Node::Call { name, .. } | Node::Method { name, .. } => {
            name.rsplit('.').next().unwrap_or(name).to_string()
        }
        _ => format!("expr{}", index + 1),
    }
}

/// Compile a restriction, through the cache when the environment has one.
pub fn compile_predicate(
    env: Env<'_>,
    bindings: &[Binding<'_>],
    expression: &Expression,
    kwargs: &Kwargs,
) -> Result<CompiledPredicate> {
    let compile = || {
        let mut compiler = Compiler::new(env, bindings, kwargs);
        let expr = compiler.code(expression)?;
        if expr.aggregate {
            return Err(Error::Unsupported(format!(
                "aggregate in restriction {}",
                expression
            )));
        }
        Ok(CompiledPredicate {
            sql: expr.sql,
            imperfect: compiler.is_imperfect(),
        })
    };
    match env.cache {
        Some(cache) => {
            let tables = bindings
                .iter()
                .map(|b| (b.alias.clone(), b.table.name.clone()))
                .collect();
            let key = CacheKey::new(env.typeset.name(), env.dialect.name(), expression, tables, kwargs);
            cache.get_or_compile(key, compile)
        }
        None => compile(),
    }
}
