//! Process-wide, mutex-guarded textual-key caches. Caching is strictly
//! additive: a failed lookup is cached too, so a definer that errors once
//! returns the same error on every subsequent call instead of re-running
//! (and possibly re-failing differently) each time.

use std::sync::{Mutex, OnceLock};

use ahash::AHashMap;

use crate::ast::core::Expr;
use crate::error::RunResult;
use crate::kernel::KernelModule;

/// Caches the lowered core form of a DRR/kernel-definer lambda, keyed by its
/// source text ("textual-key cache").
#[derive(Default)]
pub struct LoweredLambdaCache {
    entries: Mutex<AHashMap<String, RunResult<Expr>>>,
}

impl LoweredLambdaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached lowering for `definer_text`, computing and storing
    /// it via `lower` on a miss. A cached error is returned again verbatim,
    /// without re-invoking `lower`.
    pub fn get_or_lower(&self, definer_text: &str, lower: impl FnOnce(&str) -> RunResult<Expr>) -> RunResult<Expr> {
        if let Some(cached) = self.entries.lock().unwrap().get(definer_text) {
            return cached.clone();
        }
        let result = lower(definer_text);
        self.entries.lock().unwrap().insert(definer_text.to_string(), result.clone());
        result
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Caches a compiled [`KernelModule`], keyed by the definer's source text
/// together with the textual representation of the match context it ran
/// against ("(definer_text, define_ctx_text) -> KernelModule").
#[derive(Default)]
pub struct KernelModuleCache {
    entries: Mutex<AHashMap<(String, String), RunResult<KernelModule>>>,
}

impl KernelModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        definer_text: &str,
        define_ctx_text: &str,
        build: impl FnOnce(&str, &str) -> RunResult<KernelModule>,
    ) -> RunResult<KernelModule> {
        let key = (definer_text.to_string(), define_ctx_text.to_string());
        if let Some(cached) = self.entries.lock().unwrap().get(&key) {
            return cached.clone();
        }
        let result = build(definer_text, define_ctx_text);
        self.entries.lock().unwrap().insert(key, result.clone());
        result
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The process-wide lowered-lambda cache ("process-wide... cache").
pub fn lowered_lambdas() -> &'static LoweredLambdaCache {
    static CACHE: OnceLock<LoweredLambdaCache> = OnceLock::new();
    CACHE.get_or_init(LoweredLambdaCache::new)
}

/// The process-wide compiled-kernel-module cache.
pub fn kernel_modules() -> &'static KernelModuleCache {
    static CACHE: OnceLock<KernelModuleCache> = OnceLock::new();
    CACHE.get_or_init(KernelModuleCache::new)
}
