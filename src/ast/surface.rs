//! Surface AST (A-normal form) and its JSON codec.

use serde_json::Value as Json;

use crate::error::{ExcType, RunError, RunResult};

/// A named lexical reference. Scoping is lexical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Var {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A literal constant (unit, boolean, 64-bit integer, double, string).
///
/// Unit has no JSON literal representation; it is only ever produced by
/// operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Unit,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
}

/// Atomic surface forms: every callee, call argument, and conditional test
/// must be one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Atomic {
    Var(Var),
    Literal(Literal),
    Lambda(Lambda),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<Var>,
    pub body: Box<Surface>,
}

/// One ordered `let` binding: a variable bound to a combined (non-atomic) expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub var: Var,
    pub value: Combined,
}

/// Combined (non-atomic) surface forms: calls and conditionals.
#[derive(Debug, Clone, PartialEq)]
pub enum Combined {
    Call { callee: Atomic, args: Vec<Atomic> },
    If { cond: Atomic, then_branch: Box<Surface>, else_branch: Box<Surface> },
}

/// A full surface expression: atomic, combined, or a `let`.
#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    Atomic(Atomic),
    Combined(Combined),
    Let { bindings: Vec<Bind>, body: Box<Surface> },
}

impl Surface {
    pub fn var(name: impl Into<String>) -> Self {
        Surface::Atomic(Atomic::Var(Var::new(name)))
    }

    pub fn int(v: i64) -> Self {
        Surface::Atomic(Atomic::Literal(Literal::Int(v)))
    }

    pub fn double(v: f64) -> Self {
        Surface::Atomic(Atomic::Literal(Literal::Double(v)))
    }

    pub fn bool(v: bool) -> Self {
        Surface::Atomic(Atomic::Literal(Literal::Bool(v)))
    }

    pub fn string(v: impl Into<String>) -> Self {
        Surface::Atomic(Atomic::Literal(Literal::Str(v.into())))
    }

    pub fn lambda(params: Vec<&str>, body: Surface) -> Self {
        Surface::Atomic(Atomic::Lambda(Lambda {
            params: params.into_iter().map(Var::new).collect(),
            body: Box::new(body),
        }))
    }

    pub fn call(callee: Atomic, args: Vec<Atomic>) -> Self {
        Surface::Combined(Combined::Call { callee, args })
    }

    /// Round-trips this expression through the JSON codec.
    pub fn encode(&self) -> Json {
        encode_surface(self)
    }

    pub fn decode(json: &Json) -> RunResult<Self> {
        decode_surface(json)
    }
}

const KEY_STR: &str = "str";
const KW_LAMBDA: &str = "lambda";
const KW_IF: &str = "if";
const KW_LET: &str = "__builtin_let__";

fn encode_atomic(atomic: &Atomic) -> Json {
    match atomic {
        Atomic::Var(v) => Json::String(v.0.clone()),
        Atomic::Literal(Literal::Unit) => {
            // Unit has no literal JSON form; callers should never
            // try to encode a bare Unit atomic. We still need a total
            // function, so fall back to `null`, which never round-trips.
            Json::Null
        }
        Atomic::Literal(Literal::Bool(b)) => Json::Bool(*b),
        Atomic::Literal(Literal::Int(i)) => Json::Number((*i).into()),
        Atomic::Literal(Literal::Double(d)) => {
            serde_json::Number::from_f64(*d).map(Json::Number).unwrap_or(Json::Null)
        }
        Atomic::Literal(Literal::Str(s)) => {
            let mut obj = serde_json::Map::new();
            obj.insert(KEY_STR.to_string(), Json::String(s.clone()));
            Json::Object(obj)
        }
        Atomic::Lambda(lambda) => Json::Array(vec![
            Json::String(KW_LAMBDA.to_string()),
            Json::Array(lambda.params.iter().map(|p| Json::String(p.0.clone())).collect()),
            encode_surface(&lambda.body),
        ]),
    }
}

fn encode_surface(expr: &Surface) -> Json {
    match expr {
        Surface::Atomic(a) => encode_atomic(a),
        Surface::Combined(Combined::If { cond, then_branch, else_branch }) => Json::Array(vec![
            Json::String(KW_IF.to_string()),
            encode_atomic(cond),
            encode_surface(then_branch),
            encode_surface(else_branch),
        ]),
        Surface::Combined(Combined::Call { callee, args }) => {
            let mut arr = vec![encode_atomic(callee)];
            arr.extend(args.iter().map(encode_atomic));
            Json::Array(arr)
        }
        Surface::Let { bindings, body } => {
            let bindings_json = bindings
                .iter()
                .map(|b| Json::Array(vec![Json::String(b.var.0.clone()), encode_combined(&b.value)]))
                .collect();
            Json::Array(vec![
                Json::String(KW_LET.to_string()),
                Json::Array(bindings_json),
                encode_surface(body),
            ])
        }
    }
}

fn encode_combined(combined: &Combined) -> Json {
    encode_surface(&Surface::Combined(combined.clone()))
}

/// Distinguishes "this JSON shape doesn't look like the variant I'm trying"
/// (keep trying the cascade) from "it does, but its contents are malformed"
/// (abort with a syntax error) — 
enum DecodeOutcome<T> {
    NoMatch,
    Matched(RunResult<T>),
}

fn decode_surface(json: &Json) -> RunResult<Surface> {
    if let DecodeOutcome::Matched(r) = try_decode_let(json) {
        return r;
    }
    if let DecodeOutcome::Matched(r) = try_decode_if(json) {
        return r.map(Surface::Combined);
    }
    if let DecodeOutcome::Matched(r) = try_decode_call(json) {
        return r.map(Surface::Combined);
    }
    decode_atomic(json).map(Surface::Atomic)
}

fn decode_atomic(json: &Json) -> RunResult<Atomic> {
    match try_decode_lambda(json) {
        DecodeOutcome::Matched(r) => return r.map(Atomic::Lambda),
        DecodeOutcome::NoMatch => {}
    }
    match json {
        Json::String(s) => Ok(Atomic::Var(Var::new(s.clone()))),
        Json::Bool(b) => Ok(Atomic::Literal(Literal::Bool(*b))),
        Json::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Ok(Atomic::Literal(Literal::Int(n.as_i64().unwrap_or_else(|| n.as_u64().unwrap() as i64))))
            } else {
                Ok(Atomic::Literal(Literal::Double(n.as_f64().ok_or_else(|| {
                    RunError::syntax(format!("malformed numeric literal: {n}"))
                })?)))
            }
        }
        Json::Object(obj) => {
            if let Some(Json::String(s)) = obj.get(KEY_STR) {
                if obj.len() == 1 {
                    return Ok(Atomic::Literal(Literal::Str(s.clone())));
                }
            }
            Err(RunError::syntax(format!("malformed string-literal fragment: {json}")))
        }
        other => Err(RunError::syntax(format!("expression fragment is not an atomic surface form: {other}"))),
    }
}

fn try_decode_lambda(json: &Json) -> DecodeOutcome<Lambda> {
    let Json::Array(items) = json else { return DecodeOutcome::NoMatch };
    let Some(Json::String(tag)) = items.first() else { return DecodeOutcome::NoMatch };
    if tag != KW_LAMBDA {
        return DecodeOutcome::NoMatch;
    }
    DecodeOutcome::Matched((|| {
        if items.len() != 3 {
            return Err(RunError::syntax("'lambda' requires exactly [\"lambda\", [params...], body]"));
        }
        let Json::Array(param_items) = &items[1] else {
            return Err(RunError::syntax("lambda parameter list must be a JSON array"));
        };
        let mut params = Vec::with_capacity(param_items.len());
        for p in param_items {
            let Json::String(name) = p else {
                return Err(RunError::syntax("lambda parameter names must be strings"));
            };
            params.push(Var::new(name.clone()));
        }
        let body = decode_surface(&items[2])?;
        Ok(Lambda { params, body: Box::new(body) })
    })())
}

fn try_decode_if(json: &Json) -> DecodeOutcome<Combined> {
    let Json::Array(items) = json else { return DecodeOutcome::NoMatch };
    let Some(Json::String(tag)) = items.first() else { return DecodeOutcome::NoMatch };
    if tag != KW_IF {
        return DecodeOutcome::NoMatch;
    }
    DecodeOutcome::Matched((|| {
        if items.len() != 4 {
            return Err(RunError::syntax("'if' requires exactly [\"if\", cond, then, else]"));
        }
        let cond = decode_atomic(&items[1])?;
        let then_branch = Box::new(decode_surface(&items[2])?);
        let else_branch = Box::new(decode_surface(&items[3])?);
        Ok(Combined::If { cond, then_branch, else_branch })
    })())
}

fn try_decode_let(json: &Json) -> DecodeOutcome<Surface> {
    let Json::Array(items) = json else { return DecodeOutcome::NoMatch };
    let Some(Json::String(tag)) = items.first() else { return DecodeOutcome::NoMatch };
    if tag != KW_LET {
        return DecodeOutcome::NoMatch;
    }
    DecodeOutcome::Matched((|| {
        if items.len() != 3 {
            return Err(RunError::syntax(
                "'__builtin_let__' requires exactly [\"__builtin_let__\", [[var, val]...], body]",
            ));
        }
        let Json::Array(binding_items) = &items[1] else {
            return Err(RunError::syntax("let bindings must be a JSON array"));
        };
        let mut bindings = Vec::with_capacity(binding_items.len());
        for b in binding_items {
            let Json::Array(pair) = b else {
                return Err(RunError::syntax("each let binding must be a [var, value] pair"));
            };
            if pair.len() != 2 {
                return Err(RunError::syntax("each let binding must be a [var, value] pair"));
            }
            let Json::String(name) = &pair[0] else {
                return Err(RunError::syntax("let binding variable must be a string"));
            };
            let value = decode_combined_required(&pair[1])?;
            bindings.push(Bind { var: Var::new(name.clone()), value });
        }
        let body = Box::new(decode_surface(&items[2])?);
        Ok(Surface::Let { bindings, body })
    })())
}

/// A let-binding's value must itself be a combined expression:
/// `[["x0", <c0>], ...]` where each `c0` is a call or `if`.
fn decode_combined_required(json: &Json) -> RunResult<Combined> {
    match try_decode_if(json) {
        DecodeOutcome::Matched(r) => return r,
        DecodeOutcome::NoMatch => {}
    }
    match try_decode_call(json) {
        DecodeOutcome::Matched(r) => return r,
        DecodeOutcome::NoMatch => {}
    }
    Err(RunError::syntax(format!("let-binding value must be a call or 'if': {json}")))
}

fn try_decode_call(json: &Json) -> DecodeOutcome<Combined> {
    let Json::Array(items) = json else { return DecodeOutcome::NoMatch };
    // A call is any JSON array not matched by lambda/if/let above.
    DecodeOutcome::Matched((|| {
        if items.is_empty() {
            return Err(RunError::syntax("call expression requires at least a callee"));
        }
        let callee = decode_atomic(&items[0])?;
        let args = items[1..].iter().map(decode_atomic).collect::<RunResult<Vec<_>>>()?;
        Ok(Combined::Call { callee, args })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_identity_lambda() {
        let expr = Surface::lambda(vec!["x"], Surface::var("x"));
        let json = expr.encode();
        assert_eq!(Surface::decode(&json).unwrap(), expr);
    }

    #[test]
    fn round_trips_let_with_arithmetic() {
        let expr = Surface::Let {
            bindings: vec![Bind {
                var: Var::new("a"),
                value: Combined::Call {
                    callee: Atomic::Var(Var::new("__builtin_Add__")),
                    args: vec![Atomic::Literal(Literal::Int(2)), Atomic::Literal(Literal::Int(3))],
                },
            }],
            body: Box::new(Surface::var("a")),
        };
        let json = expr.encode();
        assert_eq!(Surface::decode(&json).unwrap(), expr);
    }

    #[test]
    fn string_literal_disambiguated_from_identifier() {
        let json: Json = serde_json::json!({"str": "hello"});
        let atomic = decode_atomic(&json).unwrap();
        assert_eq!(atomic, Atomic::Literal(Literal::Str("hello".to_string())));

        let var_json: Json = serde_json::json!("hello");
        assert_eq!(decode_atomic(&var_json).unwrap(), Atomic::Var(Var::new("hello")));
    }

    #[test]
    fn malformed_lambda_aborts_instead_of_falling_through() {
        let json: Json = serde_json::json!(["lambda", "not-an-array", "x"]);
        let err = Surface::decode(&json).unwrap_err();
        assert_eq!(err.kind, ExcType::Syntax);
    }

    #[test]
    fn float_vs_integer_literal_distinguished_by_fractional_part() {
        let json: Json = serde_json::json!(3);
        assert_eq!(decode_atomic(&json).unwrap(), Atomic::Literal(Literal::Int(3)));
        let json: Json = serde_json::json!(3.5);
        assert_eq!(decode_atomic(&json).unwrap(), Atomic::Literal(Literal::Double(3.5)));
    }
}
