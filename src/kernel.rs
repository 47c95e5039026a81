//! Kernel build & dispatch facades, plus the argument-type enumeration a
//! generated kernel's function signature is described with.
//!
//! This crate never compiles or launches anything itself: `Compiler` and
//! `Launcher` are collaborator traits the embedding compiler implements, kept
//! here only as the shape the interpreter calls through (-goals:
//! "concrete GPU codegen/compilation/launch" stay opaque facades).

use indexmap::IndexMap;

use crate::error::RunResult;

/// The enumerated kernel-function argument types, kept
/// abstract beyond naming — no layout or ABI details are in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ArgType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    ConstPointer,
    MutablePointer,
    VoidPointer,
}

/// A single declared kernel function: a name plus its ordered argument types.
#[derive(Debug, Clone)]
pub struct FunctionDeclaration {
    pub name: String,
    pub arg_types: Vec<ArgType>,
}

/// A kernel module value: the result of a definer running to completion —
/// a named collection of function declarations plus the generated source
/// text that produced it, used as the cache key.
#[derive(Debug, Clone)]
pub struct KernelModule {
    pub name: String,
    pub source_text: String,
    pub functions: IndexMap<String, FunctionDeclaration>,
}

impl KernelModule {
    pub fn new(name: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self { name: name.into(), source_text: source_text.into(), functions: IndexMap::new() }
    }

    pub fn declare(&mut self, decl: FunctionDeclaration) {
        self.functions.insert(decl.name.clone(), decl);
    }
}

/// A tensor-like argument passed across the dispatch facade: kept to the
/// handful of accessors a kernel launch actually reads.
pub trait TensorView {
    fn data_ptr(&self) -> usize;
    fn dtype(&self) -> ArgType;
    fn dims(&self) -> &[usize];
}

/// Compiles kernel source text into a host-opaque compiled-module handle.
/// Implemented by the embedding compiler; this crate only calls through it.
pub trait Compiler {
    type CompiledModule;
    fn compile(&self, module: &KernelModule) -> RunResult<Self::CompiledModule>;
}

/// Launches a compiled kernel function against a set of tensor arguments.
pub trait Launcher {
    type CompiledModule;
    fn launch(
        &self,
        compiled: &Self::CompiledModule,
        function: &str,
        args: &[&dyn TensorView],
    ) -> RunResult<()>;
}
