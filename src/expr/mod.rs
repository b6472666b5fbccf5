/// Expression trees and their translation to SQL.
///
/// An [`Expression`] is a [`Node`] tree over one row parameter per table.
/// [`Compiler`] walks it into [`SqlExpression`]s; [`Evaluator`] interprets
/// it over decoded rows so imperfect SQL can be re-filtered in process.
mod cache;
mod compiler;
pub mod eval;
mod expression;
mod functions;
mod node;
mod ops;
mod sqlexpr;

pub use cache::{CacheKey, CompileCache, CompiledPredicate, DEFAULT_CACHE_CAPACITY};
pub use compiler::{compile_predicate, Binding, Compiler, Env};
pub use eval::Evaluator;
pub use expression::Expression;
pub use functions::{EvalHandler, FunctionDef, FunctionRegistry, HandlerContext, Rendered, SqlHandler};
pub use node::{Node, DESC};
pub use ops::{binary_result, comparable, BinaryOp, CompareOp};
pub use sqlexpr::SqlExpression;
