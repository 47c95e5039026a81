//! The core form: the target of lowering and the only form the interpreter
//! (`interp.rs`) ever reduces.
//!
//! A core expression is either an atomic value or a *composed call*:
//! `outer(inner(args...))`, i.e. a call to `inner` whose result is
//! immediately passed to `outer`. The body of every lambda is one or the
//! other — never a nested `let` or a bare combined form, both of which
//! lowering eliminates.

use crate::ast::surface::{self, Surface};
use crate::interp::symbols;

/// A variable, literal, or nested lambda — identical in shape to
/// [`surface::Atomic`] but closed over the core grammar so a core lambda's
/// body can only ever be atomic or composed, never a surface `let`.
#[derive(Debug, Clone, PartialEq)]
pub enum Atomic {
    Var(surface::Var),
    Literal(surface::Literal),
    Lambda(Lambda),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<surface::Var>,
    pub body: Box<Expr>,
}

/// `outer(inner(args...))` — a call whose result is immediately handed to a
/// continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedCall {
    pub outer: Atomic,
    pub inner: Atomic,
    pub args: Vec<Atomic>,
}

/// A core expression: either reduced already, or a pending composed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Atomic(Atomic),
    ComposedCall(ComposedCall),
}

impl Atomic {
    fn var(name: &str) -> Self {
        Atomic::Var(surface::Var::new(name))
    }
}

/// A core expression awaiting a continuation atom before it can be finished,
/// or one already fully reduced. Mirrors `MaybeLazyCoreExpr` in
/// `anf_expr_util.cc`: atomic surface forms convert directly to `Expr`, while
/// calls, conditionals, and lets convert to a closure over "whatever happens
/// next."
enum Pending {
    Done(Expr),
    Lazy(Box<dyn FnOnce(Atomic) -> ComposedCall>),
}

type Lazy = Box<dyn FnOnce(Atomic) -> ComposedCall>;

fn to_lazy(pending: Pending) -> Lazy {
    match pending {
        Pending::Lazy(f) => f,
        // An already-reduced atomic, wrapped through identity so it can still
        // be threaded to an arbitrary continuation (`TryWrapperToLazyCoreExpr`
        // in the original lowering pass).
        Pending::Done(Expr::Atomic(a)) => Box::new(move |k: Atomic| ComposedCall {
            outer: k,
            inner: Atomic::var(symbols::IDENTITY),
            args: vec![a],
        }),
        Pending::Done(Expr::ComposedCall(_)) => {
            unreachable!("convert() never returns an already-composed call directly")
        }
    }
}

fn convert_atomic(atomic: &surface::Atomic) -> Pending {
    match atomic {
        surface::Atomic::Var(v) => Pending::Done(Expr::Atomic(Atomic::Var(v.clone()))),
        surface::Atomic::Literal(l) => Pending::Done(Expr::Atomic(Atomic::Literal(l.clone()))),
        surface::Atomic::Lambda(lambda) => Pending::Done(Expr::Atomic(Atomic::Lambda(convert_lambda(lambda)))),
    }
}

fn convert_lambda(lambda: &surface::Lambda) -> Lambda {
    let body = match convert(&lambda.body) {
        // A body that reduces to a bare atomic is preserved verbatim, rather
        // than forced through an identity composed call — the interpreter's
        // closure-call step handles an atomic lambda body
        // directly, so there is no need to manufacture a call here.
        Pending::Done(done @ Expr::Atomic(_)) => done,
        Pending::Done(Expr::ComposedCall(_)) => {
            unreachable!("convert() never returns an already-composed call directly")
        }
        pending @ Pending::Lazy(_) => {
            let lazy = to_lazy(pending);
            Expr::ComposedCall(lazy(Atomic::var(symbols::RETURN)))
        }
    };
    Lambda { params: lambda.params.clone(), body: Box::new(body) }
}

fn atomic_to_core(atomic: &surface::Atomic) -> Atomic {
    match convert_atomic(atomic) {
        Pending::Done(Expr::Atomic(a)) => a,
        _ => unreachable!("an atomic surface form always converts to an atomic core form"),
    }
}

fn convert_combined(combined: &surface::Combined) -> Pending {
    match combined {
        surface::Combined::Call { callee, args } => {
            let inner = atomic_to_core(callee);
            let args: Vec<Atomic> = args.iter().map(atomic_to_core).collect();
            Pending::Lazy(Box::new(move |k: Atomic| ComposedCall { outer: k, inner, args }))
        }
        surface::Combined::If { cond, then_branch, else_branch } => {
            let cond = atomic_to_core(cond);
            let then_thunk = thunk(then_branch);
            let else_thunk = thunk(else_branch);
            Pending::Lazy(Box::new(move |k: Atomic| ComposedCall {
                outer: k,
                inner: Atomic::var(symbols::IF),
                args: vec![cond, then_thunk, else_thunk],
            }))
        }
    }
}

/// Wraps a branch of an `if` as a zero-argument lambda, so evaluation of the
/// untaken branch never happens: `if` forces at most one thunk.
fn thunk(body: &Surface) -> Atomic {
    Atomic::Lambda(convert_lambda(&surface::Lambda { params: Vec::new(), body: Box::new(body.clone()) }))
}

fn convert_let(bindings: &[surface::Bind], body: &Surface) -> Pending {
    let binding_lazies: Vec<(surface::Var, Lazy)> =
        bindings.iter().map(|b| (b.var.clone(), to_lazy(convert_combined(&b.value)))).collect();
    let body_lazy = to_lazy(convert(body));
    Pending::Lazy(Box::new(move |k: Atomic| thread_bindings(binding_lazies, body_lazy, k)))
}

/// Folds a chain of let-bindings into nested continuations ("each
/// let-binding becomes a composed call whose outer function is a lambda
/// binding that variable over the rest"), grounded on `ConvertLet` in
/// `anf_expr_util.cc`.
fn thread_bindings(mut bindings: Vec<(surface::Var, Lazy)>, body_lazy: Lazy, continuation: Atomic) -> ComposedCall {
    if bindings.is_empty() {
        return body_lazy(continuation);
    }
    let (var, lazy) = bindings.remove(0);
    let inner = thread_bindings(bindings, body_lazy, continuation);
    let k = Atomic::Lambda(Lambda { params: vec![var], body: Box::new(Expr::ComposedCall(inner)) });
    lazy(k)
}

fn convert(expr: &Surface) -> Pending {
    match expr {
        Surface::Atomic(a) => convert_atomic(a),
        Surface::Combined(c) => convert_combined(c),
        Surface::Let { bindings, body } => convert_let(bindings, body),
    }
}

/// Lowers a surface expression into its core form.
///
/// The top level is treated like the body of an implicit enclosing lambda:
/// an already-atomic expression is returned verbatim, anything else is forced
/// against the `__builtin_return__` continuation sentinel.
pub fn lower(expr: &Surface) -> Expr {
    match convert(expr) {
        Pending::Done(done) => done,
        pending @ Pending::Lazy(_) => Expr::ComposedCall(to_lazy(pending)(Atomic::var(symbols::RETURN))),
    }
}

/// Capture-avoiding substitution of a free variable reference with an atomic
/// value, grounded on `Replace` in `core_expr_util.cc`.
pub fn replace(expr: &Expr, var: &surface::Var, replacement: &Atomic) -> Expr {
    match expr {
        Expr::Atomic(a) => Expr::Atomic(replace_atomic(a, var, replacement)),
        Expr::ComposedCall(call) => Expr::ComposedCall(ComposedCall {
            outer: replace_atomic(&call.outer, var, replacement),
            inner: replace_atomic(&call.inner, var, replacement),
            args: call.args.iter().map(|a| replace_atomic(a, var, replacement)).collect(),
        }),
    }
}

fn replace_atomic(atomic: &Atomic, var: &surface::Var, replacement: &Atomic) -> Atomic {
    match atomic {
        Atomic::Var(v) if v == var => replacement.clone(),
        Atomic::Var(_) | Atomic::Literal(_) => atomic.clone(),
        Atomic::Lambda(lambda) => {
            // A lambda that rebinds `var` shadows the substitution in its own body.
            if lambda.params.contains(var) {
                Atomic::Lambda(lambda.clone())
            } else {
                Atomic::Lambda(Lambda {
                    params: lambda.params.clone(),
                    body: Box::new(replace(&lambda.body, var, replacement)),
                })
            }
        }
    }
}

/// Renames a lambda's parameter `old_name` to a name produced by `fresh`,
/// rewriting every reference to it in the body. Used when two lambdas nested
/// inside a pattern would otherwise capture each other's parameter, enforcing
/// a capture-avoidance contract during lowering.
pub fn replace_lambda_arg_name(lambda: &Lambda, old_name: &surface::Var, fresh: impl FnOnce() -> surface::Var) -> Lambda {
    if !lambda.params.contains(old_name) {
        return lambda.clone();
    }
    let new_name = fresh();
    let params = lambda.params.iter().map(|p| if p == old_name { new_name.clone() } else { p.clone() }).collect();
    let body = replace(&lambda.body, old_name, &Atomic::Var(new_name));
    Lambda { params, body: Box::new(body) }
}
