use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::schema::{Column, Table};
use crate::types::{DatabaseType, HostType, Kwargs, Row, Value, WireValue};

/// Orientation of a two-table join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bias {
    #[default]
    Inner,
    Left,
    Right,
}

impl Bias {
    pub fn keyword(self) -> &'static str {
        match self {
            Bias::Inner => "INNER JOIN",
            Bias::Left => "LEFT JOIN",
            Bias::Right => "RIGHT JOIN",
        }
    }
}

/// A table or a tree of joined tables.
#[derive(Debug, Clone)]
pub enum Relation<'a> {
    Table(&'a Table),
    Join(Box<Join<'a>>),
}

impl<'a> Relation<'a> {
    /// The tables in the tree, left to right. Row parameters of
    /// expressions over this relation bind in the same order.
    pub fn tables(&self) -> Vec<&'a Table> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<&'a Table>) {
        match self {
            Relation::Table(t) => out.push(t),
            Relation::Join(j) => {
                j.left.collect(out);
                j.right.collect(out);
            }
        }
    }

    pub fn table_count(&self) -> usize {
        match self {
            Relation::Table(_) => 1,
            Relation::Join(j) => j.left.table_count() + j.right.table_count(),
        }
    }

    pub fn join(self, other: impl Into<Relation<'a>>) -> Relation<'a> {
        Join::new(self, other, Bias::Inner).into()
    }

    pub fn left_join(self, other: impl Into<Relation<'a>>) -> Relation<'a> {
        Join::new(self, other, Bias::Left).into()
    }

    pub fn right_join(self, other: impl Into<Relation<'a>>) -> Relation<'a> {
        Join::new(self, other, Bias::Right).into()
    }
}

impl<'a> From<&'a Table> for Relation<'a> {
    fn from(table: &'a Table) -> Self {
        Relation::Table(table)
    }
}

impl<'a> From<Join<'a>> for Relation<'a> {
    fn from(join: Join<'a>) -> Self {
        Relation::Join(Box::new(join))
    }
}

#[derive(Debug, Clone)]
pub struct Join<'a> {
    pub left: Relation<'a>,
    pub right: Relation<'a>,
    pub bias: Bias,
    /// Explicit ON condition, over every table of this join in order.
    /// Without one, the ON clause comes from declared references.
    pub path: Option<Expression>,
}

impl<'a> Join<'a> {
    pub fn new(left: impl Into<Relation<'a>>, right: impl Into<Relation<'a>>, bias: Bias) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            bias,
            path: None,
        }
    }

    pub fn on(mut self, path: Expression) -> Self {
        self.path = Some(path);
        self
    }
}

/// What a SELECT projects.
#[derive(Debug, Clone, Default)]
pub enum Attributes {
    /// Every column of every table.
    #[default]
    All,
    /// Column keys, one list per table.
    Columns(Vec<Vec<String>>),
    /// A tuple of expressions over the relation's rows.
    Computed(Expression),
}

#[derive(Debug, Clone)]
pub enum Order {
    /// Column keys, ascending. Single-table relations only.
    Columns(Vec<String>),
    /// A tuple of expressions; wrap a term in [`crate::expr::Node::desc`]
    /// to sort it descending.
    Computed(Expression),
}

#[derive(Debug, Clone)]
pub struct Query<'a> {
    pub relation: Relation<'a>,
    pub attributes: Attributes,
    pub restriction: Option<Expression>,
}

impl<'a> Query<'a> {
    pub fn new(relation: impl Into<Relation<'a>>) -> Self {
        Self {
            relation: relation.into(),
            attributes: Attributes::All,
            restriction: None,
        }
    }

    pub fn select(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn filter(mut self, restriction: Expression) -> Self {
        self.restriction = Some(restriction);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Statement<'a> {
    pub query: Query<'a>,
    pub order: Option<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
    /// Refuse imperfect restrictions instead of relying on re-filtering.
    pub strict: bool,
    pub kwargs: Kwargs,
}

impl<'a> Statement<'a> {
    pub fn new(query: Query<'a>) -> Self {
        Self {
            query,
            order: None,
            limit: None,
            offset: None,
            distinct: false,
            strict: false,
            kwargs: Kwargs::new(),
        }
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

impl<'a> From<Query<'a>> for Statement<'a> {
    fn from(query: Query<'a>) -> Self {
        Statement::new(query)
    }
}

/// The new value of one column in an UPDATE.
#[derive(Debug, Clone)]
pub enum Assignment {
    Value(Value),
    /// Computed from the row being updated; must translate exactly.
    Expr(Expression),
}

impl From<Value> for Assignment {
    fn from(value: Value) -> Self {
        Assignment::Value(value)
    }
}

impl From<Expression> for Assignment {
    fn from(expr: Expression) -> Self {
        Assignment::Expr(expr)
    }
}

/// One column of a statement's result set.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    /// Source column key, when the output is a plain column reference.
    pub key: Option<String>,
    /// Index of the table the column comes from.
    pub binding: Option<usize>,
    pub host_type: HostType,
    pub dbtype: DatabaseType,
}

impl OutputColumn {
    /// A plain reference to `column` of the `binding`-th table.
    pub fn from_column(column: &Column, binding: usize) -> Self {
        Self {
            name: column.key.clone(),
            key: Some(column.key.clone()),
            binding: Some(binding),
            host_type: column.host_type,
            dbtype: column.dbtype.clone(),
        }
    }

    pub fn decode(&self, wire: &WireValue) -> Result<Value> {
        self.dbtype.adapter(self.host_type).pull(wire, &self.dbtype)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    /// The WHERE clause selects a superset of the requested rows.
    pub imperfect: bool,
    pub columns: Vec<OutputColumn>,
}

impl CompiledStatement {
    /// Decode one result row, keyed by output name.
    pub fn decode_row(&self, cells: &[WireValue]) -> Result<Row> {
        if cells.len() != self.columns.len() {
            return Err(Error::value(format!(
                "row has {} cells but the statement selects {} columns",
                cells.len(),
                self.columns.len()
            )));
        }
        self.columns
            .iter()
            .zip(cells)
            .map(|(column, wire)| Ok((column.name.clone(), column.decode(wire)?)))
            .collect()
    }

    /// Split a decoded row into one row per table, keyed by column key,
    /// for in-process re-filtering.
    pub fn split_row(&self, row: &Row, tables: usize) -> Vec<Row> {
        let mut rows = vec![Row::new(); tables];
        for column in &self.columns {
            if let (Some(b), Some(key), Some(value)) = (column.binding, &column.key, row.get(&column.name)) {
                if let Some(target) = rows.get_mut(b) {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        rows
    }
}
