//! Benchmarks for the predicate compiler and statement assembly.
//!
//! Benchmarks cover:
//! - Predicate compilation without a cache, by predicate size
//! - Cached compilation of a repeated predicate
//! - Full SELECT assembly over a join with a computed projection
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlsieve::dialect::{Dialect, PostgresDialect, SqliteDialect};
use sqlsieve::expr::{compile_predicate, Binding, CompileCache, Env, Expression, FunctionRegistry, Node};
use sqlsieve::schema::{ColumnDef, Table};
use sqlsieve::sql::{Attributes, Order, Query, Relation, SqlBuilder, Statement};
use sqlsieve::types::{HostType, Kwargs, TypeHints};

fn people(dialect: &dyn Dialect) -> Table {
    let set = dialect.type_set();
    let mut t = Table::new(dialect, "people");
    let defs = [
        ColumnDef::new("id", HostType::Int).primary_key(),
        ColumnDef::new("name", HostType::Str).hints(TypeHints::bytes(64)),
        ColumnDef::new("age", HostType::Int),
        ColumnDef::new("active", HostType::Bool),
    ];
    for def in defs {
        t.define(dialect, &set, def).unwrap();
    }
    t
}

fn pets(dialect: &dyn Dialect, owners: &Table) -> Table {
    let set = dialect.type_set();
    let mut t = Table::new(dialect, "pets");
    t.define(dialect, &set, ColumnDef::new("id", HostType::Int).primary_key()).unwrap();
    t.define(dialect, &set, ColumnDef::new("owner_id", HostType::Int)).unwrap();
    t.define(dialect, &set, ColumnDef::new("name", HostType::Str)).unwrap();
    t.reference("owner_id", owners, "id").unwrap();
    t
}

/// `p.age >= 18 and (p.age < 30 or p.name.startswith("A")) ...`, `terms` deep.
fn predicate(terms: usize) -> Expression {
    Expression::lambda(["p"], |[p]| {
        let mut body = p.attr("age").ge(18);
        for i in 0..terms {
            let term = if i % 2 == 0 {
                p.attr("age").lt(30 + i as i64) | p.attr("name").startswith("A")
            } else {
                p.attr("active").eq(true) & p.attr("id").is_in(vec![1i64, 2, 3])
            };
            body = body & term;
        }
        body
    })
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let dialect = PostgresDialect;
    let set = dialect.type_set();
    let functions = FunctionRegistry::standard();
    let table = people(&dialect);
    let bindings = [Binding::new("people", &table)];
    let kwargs = Kwargs::new();

    for terms in [1, 4, 16] {
        let expr = predicate(terms);
        group.bench_with_input(BenchmarkId::new("uncached", terms), &expr, |b, expr| {
            b.iter(|| {
                let env = Env::new(&dialect, &set, &functions);
                compile_predicate(env, black_box(&bindings), black_box(expr), &kwargs)
            })
        });
    }

    let cache = CompileCache::default();
    let expr = predicate(16);
    group.bench_function("cached", |b| {
        b.iter(|| {
            let env = Env::new(&dialect, &set, &functions).with_cache(&cache);
            compile_predicate(env, black_box(&bindings), black_box(&expr), &kwargs)
        })
    });
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    for dialect in [&PostgresDialect as &dyn Dialect, &SqliteDialect] {
        let set = dialect.type_set();
        let functions = FunctionRegistry::standard();
        let owners = people(dialect);
        let animals = pets(dialect, &owners);

        let fields = Expression::lambda(["o", "p"], |[o, p]| {
            Node::tuple(vec![o.attr("name"), Node::call("count", vec![p.attr("id")]).alias("pets")])
        });
        let order = Expression::lambda(["o", "p"], |[o, _p]| Node::tuple(vec![o.attr("name").desc()]));
        let restriction = Expression::lambda(["o", "p"], |[o, p]| o.attr("age").ge(18) & p.attr("name").ne("Rex"));
        let statement = Statement::new(
            Query::new(Relation::from(&owners).left_join(&animals))
                .select(Attributes::Computed(fields))
                .filter(restriction),
        )
        .order_by(Order::Computed(order));

        group.bench_function(dialect.name(), |b| {
            b.iter(|| SqlBuilder::new(Env::new(dialect, &set, &functions)).select(black_box(&statement)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_select);
criterion_main!(benches);
