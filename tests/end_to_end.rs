//! End-to-end scenarios: each test below is one of the numbered walkthroughs
//! plus the round-trip/lowering-preservation/determinism invariants.

use axpr::ast::core::{Atomic, Expr as CoreExpr, Lambda};
use axpr::{self, parse_and_lower, Interpreter, Surface, Value};

fn expect_int(value: &Value) -> i64 {
    match value {
        Value::Int(i) => *i,
        other => panic!("expected an int, got {other:?}"),
    }
}

fn expect_str(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        other => panic!("expected a string, got {other:?}"),
    }
}

/// A DRR program, kernel definer, or kernel dispatcher lowers to a single
/// top-level lambda; every scenario below exercises that same shape.
fn top_level_lambda(text: &str) -> Lambda {
    match parse_and_lower(text).unwrap() {
        CoreExpr::Atomic(Atomic::Lambda(lambda)) => lambda,
        other => panic!("expected a top-level lambda, got {other:?}"),
    }
}

fn run(text: &str, args: Vec<Value>) -> Value {
    let lambda = top_level_lambda(text);
    let mut interp = Interpreter::new(axpr::interp::prelude::root_frame());
    interp.interpret_lambda(lambda, args).unwrap()
}

/// Scenario 1: `["lambda", ["x"], "x"]` applied to `7` produces `7`.
#[test]
fn identity_round_trip() {
    let result = run(r#"["lambda", ["x"], "x"]"#, vec![Value::Int(7)]);
    assert_eq!(expect_int(&result), 7);
}

/// Scenario 2: `["__builtin_let__", [["a", ["__builtin_Add__", 2, 3]]], "a"]`
/// evaluates to `5`. Wrapped in a zero-argument lambda since every DRR/kernel
/// program lowers from a top-level lambda.
#[test]
fn arithmetic_under_let() {
    let text = r#"
        ["lambda", [],
          ["__builtin_let__",
            [["a", ["__builtin_Add__", 2, 3]]],
            "a"]]
    "#;
    let result = run(text, vec![]);
    assert_eq!(expect_int(&result), 5);
}

/// Scenario 3: applying the lambda to the empty list produces `"empty"`; to a
/// 1-element list it produces `"nonempty"`.
#[test]
fn conditional_truthiness() {
    let text = r#"
        ["lambda", ["xs"],
          ["if", "xs", {"str": "nonempty"}, {"str": "empty"}]]
    "#;
    let lambda = top_level_lambda(text);

    let mut interp = Interpreter::new(axpr::interp::prelude::root_frame());
    let empty_list = Value::list(vec![], interp.heap_mut());
    let result = interp.interpret_lambda(lambda.clone(), vec![empty_list]).unwrap();
    assert_eq!(expect_str(&result), "empty");

    let mut interp = Interpreter::new(axpr::interp::prelude::root_frame());
    let one_item = Value::list(vec![Value::Int(1)], interp.heap_mut());
    let result = interp.interpret_lambda(lambda, vec![one_item]).unwrap();
    assert_eq!(expect_str(&result), "nonempty");
}

/// Scenario 4: building `[1, *[2, 3], 4]` through `__builtin_list__` unpacks
/// the starred sublist in place, evaluating to `[1, 2, 3, 4]`. Every call
/// argument must itself be atomic, so the sublist and its starred wrapper are
/// let-bound before being spliced into the outer list.
#[test]
fn starred_list_unpacking() {
    let text = r#"
        ["lambda", [],
          ["__builtin_let__",
            [["inner", ["__builtin_list__", 2, 3]],
             ["packed", ["__builtin_starred__", "inner"]]],
            ["__builtin_list__", 1, "packed", 4]]]
    "#;
    let lambda = top_level_lambda(text);
    let mut interp = Interpreter::new(axpr::interp::prelude::root_frame());
    let result = interp.interpret_lambda(lambda, vec![]).unwrap();

    let Value::Ref(id) = result else { panic!("expected a list value") };
    let items = match interp.heap().get(id) {
        axpr::HeapValue::List(items) => items.clone(),
        other => panic!("expected a list, got {other:?}"),
    };
    let ints: Vec<i64> = items.iter().map(expect_int).collect();
    assert_eq!(ints, vec![1, 2, 3, 4]);
}

/// Scenario 5: given `o = { "a": { "b": 9 } }`, `o.a.b` evaluates to `9`.
/// `__builtin_getattr__`'s own receiver argument must be atomic, so the
/// intermediate `o.a` is let-bound before `.b` is read off it.
#[test]
fn nested_attribute_path() {
    let text = r#"
        ["lambda", ["o"],
          ["__builtin_let__",
            [["inner", ["__builtin_getattr__", "o", {"str": "a"}]]],
            ["__builtin_getattr__", "inner", {"str": "b"}]]]
    "#;
    let lambda = top_level_lambda(text);
    let mut interp = Interpreter::new(axpr::interp::prelude::root_frame());
    let inner = {
        let mut fields = indexmap::IndexMap::new();
        fields.insert("b".to_string(), Value::Int(9));
        Value::object(fields, interp.heap_mut())
    };
    let outer = {
        let mut fields = indexmap::IndexMap::new();
        fields.insert("a".to_string(), inner);
        Value::object(fields, interp.heap_mut())
    };
    let result = interp.interpret_lambda(lambda, vec![outer]).unwrap();
    assert_eq!(expect_int(&result), 9);
}

/// Scenario 6: a source pattern whose `softmax` op takes a starred (packed)
/// `fusion` op as its sole input and a plain tensor as its output matches a
/// host graph with the same shape, binding the packed op's host node to the
/// softmax's upstream and the tensor's host node to its downstream.
#[test]
fn drr_match_binds_packed_op_output_to_softmax_input() {
    use axpr::graph::{EdgeRole, GraphDescriptor, NodeConstraint};

    // \ctx ->
    //   let get_src = ctx.source_pattern in
    //   get_src(\o, t ->
    //     let fusion = o.fusion in
    //     let softmax_op = o.softmax in
    //     let z = t.z in
    //     let packed_fusion = *fusion in
    //     let inputs = List(packed_fusion) in
    //     let outputs = List(z) in
    //     softmax_op(inputs, outputs))
    let drr_program = r#"
        ["lambda", ["ctx"],
          ["__builtin_let__",
            [["get_src", ["__builtin_getattr__", "ctx", {"str": "source_pattern"}]]],
            ["get_src",
              ["lambda", ["o", "t"],
                ["__builtin_let__",
                  [["fusion", ["__builtin_getattr__", "o", {"str": "fusion"}]],
                   ["softmax_op", ["__builtin_getattr__", "o", {"str": "softmax"}]],
                   ["z", ["__builtin_getattr__", "t", {"str": "z"}]],
                   ["packed_fusion", ["__builtin_starred__", "fusion"]],
                   ["inputs", ["List", "packed_fusion"]],
                   ["outputs", ["List", "z"]]],
                  ["softmax_op", "inputs", "outputs"]]]]]
        ]
    "#;

    let compiled = axpr::pipeline::compile_drr_program(drr_program).unwrap();

    // The anchor is softmax: it is the only node with eccentricity 1 in the
    // 3-node fusion-softmax-tensor chain.
    assert_eq!(compiled.source_graph.node_constraint(compiled.anchor), NodeConstraint::NativeOp { name: "softmax".to_string() });
    let fusion_node = compiled.source_graph.upstream(compiled.anchor)[0].0;
    let tensor_node = compiled.source_graph.downstream(compiled.anchor)[0].0;
    assert_eq!(compiled.source_graph.node_constraint(fusion_node), NodeConstraint::PackedOp { name: "fusion".to_string() });
    assert_eq!(compiled.source_graph.node_constraint(tensor_node), NodeConstraint::NativeValue);

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum HostKind {
        Op(&'static str),
        Value,
    }

    #[derive(Debug, Clone)]
    struct HostGraph {
        kinds: Vec<HostKind>,
        edges: Vec<(usize, usize, EdgeRole)>,
    }
    impl GraphDescriptor for HostGraph {
        type NodeId = usize;
        fn upstream(&self, node: usize) -> Vec<(usize, EdgeRole)> {
            self.edges.iter().filter(|&&(_, to, _)| to == node).map(|&(from, _, role)| (from, role)).collect()
        }
        fn downstream(&self, node: usize) -> Vec<(usize, EdgeRole)> {
            self.edges.iter().filter(|&&(from, _, _)| from == node).map(|&(_, to, role)| (to, role)).collect()
        }
        fn satisfies(&self, node: usize, constraint: &NodeConstraint) -> bool {
            match (self.kinds[node], constraint) {
                (HostKind::Op(name), NodeConstraint::NativeOp { name: want }) => name == want,
                (HostKind::Op(_), NodeConstraint::PackedOp { .. }) => true,
                (HostKind::Value, NodeConstraint::NativeValue | NodeConstraint::PackedValue) => true,
                _ => false,
            }
        }
        fn node_constraint(&self, node: usize) -> NodeConstraint {
            match self.kinds[node] {
                HostKind::Op(name) => NodeConstraint::NativeOp { name: name.to_string() },
                HostKind::Value => NodeConstraint::NativeValue,
            }
        }
        fn is_ignored(&self, _node: usize) -> bool {
            false
        }
    }

    // host: some_fusion(0) -> softmax(1) -> result_tensor(2). The fusion
    // input is packed/unindexed (it was referenced starred), the tensor
    // output sits at position 0.
    let host = HostGraph {
        kinds: vec![HostKind::Op("some_fusion"), HostKind::Op("softmax"), HostKind::Value],
        edges: vec![(0, 1, EdgeRole::Unindexed), (1, 2, EdgeRole::Indexed(0))],
    };
    let result = axpr::pipeline::match_against_host(&compiled, &host, 1).unwrap();
    let mapping = result.expect("expected the fusion-then-softmax-then-tensor chain to match");
    assert_eq!(mapping[&compiled.anchor], 1);
    assert_eq!(mapping[&fusion_node], 0);
    assert_eq!(mapping[&tensor_node], 2);

    // A name mismatch on the softmax side must fail to match.
    let mismatched = HostGraph {
        kinds: vec![HostKind::Op("some_fusion"), HostKind::Op("sigmoid"), HostKind::Value],
        edges: vec![(0, 1, EdgeRole::Unindexed), (1, 2, EdgeRole::Indexed(0))],
    };
    let no_match = axpr::pipeline::match_against_host(&compiled, &mismatched, 1).unwrap();
    assert!(no_match.is_none());
}

/// A pattern whose op has two distinct (non-starred, non-commutative)
/// operands of the same constraint must bind each to the host node actually
/// wired to that operand position, not to whichever same-typed candidate is
/// discovered first.
#[test]
fn drr_match_respects_distinct_operand_positions() {
    use axpr::graph::{EdgeRole, GraphDescriptor, NodeConstraint};

    // \ctx ->
    //   let get_src = ctx.source_pattern in
    //   get_src(\o, t ->
    //     let x = t.x in
    //     let y = t.y in
    //     let sub_op = o.sub in
    //     let z = t.z in
    //     let inputs = List(x, y) in
    //     let outputs = List(z) in
    //     sub_op(inputs, outputs))
    let drr_program = r#"
        ["lambda", ["ctx"],
          ["__builtin_let__",
            [["get_src", ["__builtin_getattr__", "ctx", {"str": "source_pattern"}]]],
            ["get_src",
              ["lambda", ["o", "t"],
                ["__builtin_let__",
                  [["x", ["__builtin_getattr__", "t", {"str": "x"}]],
                   ["y", ["__builtin_getattr__", "t", {"str": "y"}]],
                   ["sub_op", ["__builtin_getattr__", "o", {"str": "sub"}]],
                   ["z", ["__builtin_getattr__", "t", {"str": "z"}]],
                   ["inputs", ["List", "x", "y"]],
                   ["outputs", ["List", "z"]]],
                  ["sub_op", "inputs", "outputs"]]]]]
        ]
    "#;

    let compiled = axpr::pipeline::compile_drr_program(drr_program).unwrap();
    assert_eq!(compiled.source_graph.node_constraint(compiled.anchor), NodeConstraint::NativeOp { name: "sub".to_string() });

    let upstream = compiled.source_graph.upstream(compiled.anchor);
    let x_node = upstream.iter().find(|&&(_, role)| role == EdgeRole::Indexed(0)).unwrap().0;
    let y_node = upstream.iter().find(|&&(_, role)| role == EdgeRole::Indexed(1)).unwrap().0;

    #[derive(Debug, Clone)]
    struct HostGraph {
        ops: Vec<&'static str>,
        edges: Vec<(usize, usize, EdgeRole)>,
    }
    impl GraphDescriptor for HostGraph {
        type NodeId = usize;
        fn upstream(&self, node: usize) -> Vec<(usize, EdgeRole)> {
            self.edges.iter().filter(|&&(_, to, _)| to == node).map(|&(from, _, role)| (from, role)).collect()
        }
        fn downstream(&self, node: usize) -> Vec<(usize, EdgeRole)> {
            self.edges.iter().filter(|&&(from, _, _)| from == node).map(|&(_, to, role)| (to, role)).collect()
        }
        fn satisfies(&self, node: usize, constraint: &NodeConstraint) -> bool {
            match constraint {
                NodeConstraint::NativeOp { name } => *name == self.ops[node],
                NodeConstraint::NativeValue => self.ops[node] == "__value__",
                _ => false,
            }
        }
        fn node_constraint(&self, node: usize) -> NodeConstraint {
            if self.ops[node] == "__value__" {
                NodeConstraint::NativeValue
            } else {
                NodeConstraint::NativeOp { name: self.ops[node].to_string() }
            }
        }
        fn is_ignored(&self, _node: usize) -> bool {
            false
        }
    }

    // host: ten(0) feeds operand 1, two(1) feeds operand 0 — deliberately the
    // reverse of the pattern-node insertion order, so a position-blind
    // matcher would bind them the wrong way round.
    let host = HostGraph {
        ops: vec!["__value__", "__value__", "sub", "__value__"],
        edges: vec![(0, 2, EdgeRole::Indexed(1)), (1, 2, EdgeRole::Indexed(0)), (2, 3, EdgeRole::Indexed(0))],
    };
    let result = axpr::pipeline::match_against_host(&compiled, &host, 2).unwrap();
    let mapping = result.expect("expected a position-respecting match");
    assert_eq!(mapping[&x_node], 1, "pattern's Indexed(0) operand must bind to the host node wired at Indexed(0)");
    assert_eq!(mapping[&y_node], 0, "pattern's Indexed(1) operand must bind to the host node wired at Indexed(1)");
}

/// Round-trip invariant: `decode(encode(e)) == e` for a representative
/// expression exercising every surface form.
#[test]
fn round_trip_invariant_holds_across_forms() {
    let expr = Surface::Let {
        bindings: vec![axpr::ast::surface::Bind {
            var: axpr::ast::surface::Var::new("a"),
            value: axpr::ast::surface::Combined::Call {
                callee: axpr::ast::surface::Atomic::Var(axpr::ast::surface::Var::new("__builtin_Add__")),
                args: vec![
                    axpr::ast::surface::Atomic::Literal(axpr::ast::surface::Literal::Int(1)),
                    axpr::ast::surface::Atomic::Literal(axpr::ast::surface::Literal::Int(2)),
                ],
            },
        }],
        body: Box::new(Surface::lambda(vec!["x"], Surface::var("x"))),
    };
    let json = expr.encode();
    assert_eq!(Surface::decode(&json).unwrap(), expr);
}

/// Lowering-preservation invariant: lowering the same surface expression
/// twice is deterministic (produces structurally identical core forms), and
/// interpreting the lowered form produces the value the surface expression
/// describes.
#[test]
fn lowering_preserves_interpreted_value() {
    let surface = Surface::lambda(
        vec![],
        Surface::Let {
            bindings: vec![axpr::ast::surface::Bind {
                var: axpr::ast::surface::Var::new("a"),
                value: axpr::ast::surface::Combined::Call {
                    callee: axpr::ast::surface::Atomic::Var(axpr::ast::surface::Var::new("__builtin_Add__")),
                    args: vec![
                        axpr::ast::surface::Atomic::Literal(axpr::ast::surface::Literal::Int(10)),
                        axpr::ast::surface::Atomic::Literal(axpr::ast::surface::Literal::Int(32)),
                    ],
                },
            }],
            body: Box::new(Surface::var("a")),
        },
    );

    let lowered_once = axpr::ast::lower(&surface);
    let lowered_again = axpr::ast::lower(&surface);
    assert_eq!(lowered_once, lowered_again);

    let lambda = match lowered_once {
        CoreExpr::Atomic(Atomic::Lambda(lambda)) => lambda,
        other => panic!("expected a top-level lambda, got {other:?}"),
    };
    let mut interp = Interpreter::new(axpr::interp::prelude::root_frame());
    let result = interp.interpret_lambda(lambda, vec![]).unwrap();
    assert_eq!(expect_int(&result), 42);
}

/// Determinism invariant: interpreting the same core expression in the same
/// initial environment twice produces the same result and the same sequence
/// of observable `print` side effects.
#[test]
fn determinism_same_input_same_output_and_prints() {
    let text = r#"
        ["lambda", ["x"],
          ["__builtin_let__",
            [["doubled", ["__builtin_Mul__", "x", 2]],
             ["_", ["__builtin_print__", "doubled"]]],
            "doubled"]]
    "#;
    let lambda = top_level_lambda(text);

    // `Box<dyn PrintSink>` doesn't expose a downcast, so each side keeps its
    // own handle to an `Rc<RefCell<_>>`-backed sink to read the captured
    // output back out after the run.
    struct RecordingSink(std::rc::Rc<std::cell::RefCell<Vec<String>>>);
    impl axpr::io::PrintSink for RecordingSink {
        fn print(&mut self, line: &str) -> axpr::RunResult<()> {
            self.0.borrow_mut().push(line.to_string());
            Ok(())
        }
    }

    let mut interp_a = Interpreter::new(axpr::interp::prelude::root_frame());
    let sink_a = std::rc::Rc::new(std::cell::RefCell::new(Vec::<String>::new()));
    interp_a.set_print_sink(Box::new(RecordingSink(sink_a.clone())));
    let result_a = interp_a.interpret_lambda(lambda.clone(), vec![Value::Int(21)]).unwrap();

    let mut interp_b = Interpreter::new(axpr::interp::prelude::root_frame());
    let sink_b = std::rc::Rc::new(std::cell::RefCell::new(Vec::<String>::new()));
    interp_b.set_print_sink(Box::new(RecordingSink(sink_b.clone())));
    let result_b = interp_b.interpret_lambda(lambda, vec![Value::Int(21)]).unwrap();

    assert_eq!(expect_int(&result_a), expect_int(&result_b));
    assert_eq!(expect_int(&result_a), 42);
    assert_eq!(*sink_a.borrow(), *sink_b.borrow());
    assert_eq!(*sink_a.borrow(), vec!["42".to_string()]);
}
