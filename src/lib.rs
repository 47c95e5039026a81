#![doc = include_str!("../README.md")]

pub mod ast;
pub mod cache;
pub mod env;
pub mod error;
pub mod graph;
pub mod interp;
pub mod io;
pub mod kernel;
pub mod pattern;
pub mod pipeline;
pub mod resource;
pub mod tracer;
pub mod value;

pub use crate::{
    ast::{lower, CoreExpr, Surface},
    env::{Environment, EnvironmentManager, Frame},
    error::{ExcType, RunError, RunResult, StackFrame},
    graph::{GraphDescriptor, MatchContext, NodeConstraint, PatternGraph, PatternNode},
    interp::{prelude::root_frame, Interpreter},
    io::{CollectPrint, NoPrint, PrintSink, StdPrint},
    kernel::{ArgType, Compiler, FunctionDeclaration, KernelModule, Launcher, TensorView},
    pattern::{BoundPatternNode, DrrContext, Namespace, TensorNamespace, TensorToken},
    pipeline::{
        compile_drr_program, define_kernel_module, extract_kernel_module, match_against_host, parse_and_lower,
        run_kernel_definer, run_kernel_dispatcher, CompiledDrrProgram,
    },
    resource::Limits,
    tracer::{NoopTracer, Tracer, TracingTracer},
    value::{heap::Heap, Closure, HeapValue, Method, NativeFunction, TypeTag, Value},
};
