/// Memoized predicate compilation.
///
/// Keys cover everything that changes the emitted SQL: type set, dialect,
/// expression repr, the ordered (alias, table) tuple and, for expressions
/// that use them, the keyword arguments. Entries are evicted least
/// recently used first.
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::error::Result;
use crate::types::Kwargs;

use super::expression::Expression;

/// Default number of compiled predicates kept.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    typeset: String,
    dialect: String,
    expression: String,
    tables: Vec<(String, String)>,
    kwargs: Option<String>,
}

impl CacheKey {
    pub fn new(
        typeset: &str,
        dialect: &str,
        expression: &Expression,
        tables: Vec<(String, String)>,
        kwargs: &Kwargs,
    ) -> Self {
        let kwargs = expression.body().has_kwargs().then(|| {
            kwargs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.repr()))
                .collect::<Vec<_>>()
                .join(", ")
        });
        Self {
            typeset: typeset.to_string(),
            dialect: dialect.to_string(),
            expression: expression.repr(),
            tables,
            kwargs,
        }
    }
}

/// The memoized outcome of compiling a restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPredicate {
    pub sql: String,
    pub imperfect: bool,
}

pub struct CompileCache {
    entries: Mutex<LruCache<CacheKey, CompiledPredicate>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for CompileCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl CompileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached entry for `key`, or run `compile` and remember
    /// its result. Errors are not cached. The lock is not held while
    /// compiling, so two threads racing on one key may both compile.
    pub fn get_or_compile<F>(&self, key: CacheKey, compile: F) -> Result<CompiledPredicate>
    where
        F: FnOnce() -> Result<CompiledPredicate>,
    {
        if let Some(hit) = self.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(expression = %key.expression, "compile cache hit");
            return Ok(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(expression = %key.expression, "compile cache miss");
        let compiled = compile()?;
        self.lock().put(key, compiled.clone());
        Ok(compiled)
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that had to compile.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Drop every entry, e.g. after a schema change.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, CompiledPredicate>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CompileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileCache")
            .field("len", &self.len())
            .field("hits", &self.hits())
            .field("misses", &self.misses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::expr::Node;
    use crate::types::Value;

    fn key(expr: &Expression, kwargs: &Kwargs) -> CacheKey {
        CacheKey::new(
            "generic",
            "generic",
            expr,
            vec![("people".into(), "people".into())],
            kwargs,
        )
    }

    fn compiled(sql: &str) -> CompiledPredicate {
        CompiledPredicate {
            sql: sql.to_string(),
            imperfect: false,
        }
    }

    #[test]
    fn test_second_lookup_does_not_compile() {
        let cache = CompileCache::default();
        let expr = Expression::lambda(["p"], |[p]| p.attr("a").eq(1));
        let kwargs = Kwargs::new();
        let mut runs = 0;
        for _ in 0..2 {
            let out = cache
                .get_or_compile(key(&expr, &kwargs), || {
                    runs += 1;
                    Ok(compiled("\"a\" = 1"))
                })
                .unwrap();
            assert_eq!(out.sql, "\"a\" = 1");
        }
        assert_eq!(runs, 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_kwargs_only_key_expressions_that_use_them() {
        let plain = Expression::lambda(["p"], |[p]| p.attr("a").eq(1));
        let late = Expression::lambda(["p"], |[p]| p.attr("a").eq(Node::kwarg("n")));
        let one: Kwargs = [("n".to_string(), Value::Int(1))].into_iter().collect();
        let two: Kwargs = [("n".to_string(), Value::Int(2))].into_iter().collect();
        assert_eq!(key(&plain, &one), key(&plain, &two));
        assert_ne!(key(&late, &one), key(&late, &two));
    }

    #[test]
    fn test_lru_eviction_and_errors_not_cached() {
        let cache = CompileCache::new(1);
        let a = Expression::lambda(["p"], |[p]| p.attr("a").eq(1));
        let b = Expression::lambda(["p"], |[p]| p.attr("b").eq(1));
        let kwargs = Kwargs::new();
        cache.get_or_compile(key(&a, &kwargs), || Ok(compiled("a"))).unwrap();
        cache.get_or_compile(key(&b, &kwargs), || Ok(compiled("b"))).unwrap();
        assert_eq!(cache.len(), 1);

        let failed = cache.get_or_compile(key(&a, &kwargs), || Err(Error::programmer("boom")));
        assert!(failed.is_err());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.misses(), 3);
    }
}
