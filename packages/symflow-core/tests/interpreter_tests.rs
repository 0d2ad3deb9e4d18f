//! End-to-end interpreter tests
//!
//! Programs are built with the AstNode helpers (the same shapes a front-end
//! ships as JSON) and run through the full dispatch path.

use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

use symflow_core::errors::SymflowError;
use symflow_core::features::value_store::stamp_taint;
use symflow_core::shared::models::{AstKind, AstNode, Loc};
use symflow_core::{
    AnalysisDriver, AssignInfo, CallInfo, Checker, EntryPoint, ExecState, HookDispatcher,
    HookPoint, Interpreter, InterpreterConfig, Prim, TraceStep, VKind, ValueId,
};

fn interp() -> Interpreter {
    Interpreter::new(InterpreterConfig::default(), HookDispatcher::new())
}

fn run(interp: &mut Interpreter, stmts: Vec<Rc<AstNode>>) -> ExecState {
    let mut state = ExecState::new();
    let top = interp.top_scope;
    interp.process_body(top, &stmts, &mut state);
    state
}

fn read(interp: &mut Interpreter, state: &mut ExecState, name: &str) -> ValueId {
    let top = interp.top_scope;
    interp.resolve(top, &AstNode::ident(name), state)
}

fn prim_of(interp: &Interpreter, id: ValueId) -> Option<Prim> {
    interp.arena.val(id).prim.clone()
}

fn union_prims(interp: &Interpreter, id: ValueId) -> Vec<Prim> {
    let mut prims: Vec<Prim> = match interp.arena.val(id).union_members() {
        Some(members) => members
            .iter()
            .filter_map(|&m| interp.arena.val(m).prim.clone())
            .collect(),
        None => interp.arena.val(id).prim.clone().into_iter().collect(),
    };
    prims.sort_by_key(|p| format!("{p:?}"));
    prims
}

fn binary(op: &str, left: Rc<AstNode>, right: Rc<AstNode>) -> Rc<AstNode> {
    AstNode::new(AstKind::Binary {
        operator: op.to_string(),
        left,
        right,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Addressing model
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn resolving_static_chain_twice_yields_same_identity() {
    let mut interp = interp();
    let mut state = ExecState::new();
    let top = interp.top_scope;

    let chain = AstNode::member(
        AstNode::member(AstNode::ident("a"), AstNode::ident("b")),
        AstNode::ident("c"),
    );
    let first = interp.resolve(top, &chain, &mut state);
    let second = interp.resolve(top, &chain, &mut state);

    assert_eq!(first, second);
    assert_eq!(interp.arena.val(first).qid, "a.b.c");
}

#[test]
fn read_after_write_returns_written_value() {
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![AstNode::assign(AstNode::ident("x"), AstNode::lit_int(42))],
    );
    let x = read(&mut interp, &mut state, "x");
    assert_eq!(prim_of(&interp, x), Some(Prim::Int(42)));
}

#[test]
fn member_chain_auto_vivifies_and_reads_back() {
    // a.b.c = 5; read(a.b.c) with no prior bindings
    let chain = AstNode::member(
        AstNode::member(AstNode::ident("a"), AstNode::ident("b")),
        AstNode::ident("c"),
    );
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![AstNode::assign(Rc::clone(&chain), AstNode::lit_int(5))],
    );

    let top = interp.top_scope;
    let back = interp.resolve(top, &chain, &mut state);
    assert_eq!(prim_of(&interp, back), Some(Prim::Int(5)));

    // The intermediate hops were vivified as addressable values
    let a = read(&mut interp, &mut state, "a");
    let b = interp.arena.binding(a, "b").expect("a.b vivified");
    assert!(interp.arena.binding(b, "c").is_some());
}

#[test]
fn computed_member_chain_normalizes_to_static_key() {
    // key = "k"; a[key] = 5; out = a.k
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::assign(AstNode::ident("key"), AstNode::lit_str("k")),
            AstNode::assign(
                AstNode::member_computed(AstNode::ident("a"), AstNode::ident("key")),
                AstNode::lit_int(5),
            ),
            AstNode::assign(
                AstNode::ident("out"),
                AstNode::member(AstNode::ident("a"), AstNode::ident("k")),
            ),
        ],
    );

    let out = read(&mut interp, &mut state, "out");
    assert_eq!(prim_of(&interp, out), Some(Prim::Int(5)));
}

// ═══════════════════════════════════════════════════════════════════════════
// Fork/merge through real control flow
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn if_else_writes_merge_to_literal_union() {
    // if (cond) { y = 1 } else { y = 2 }; read(y)
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![AstNode::if_stmt(
            AstNode::ident("cond"),
            AstNode::block(vec![AstNode::assign(AstNode::ident("y"), AstNode::lit_int(1))]),
            Some(AstNode::block(vec![AstNode::assign(
                AstNode::ident("y"),
                AstNode::lit_int(2),
            )])),
        )],
    );

    let y = read(&mut interp, &mut state, "y");
    assert_eq!(union_prims(&interp, y), vec![Prim::Int(1), Prim::Int(2)]);
}

#[test]
fn single_branch_write_keeps_pre_branch_value_visible() {
    // x = 0; if (cond) { x = 1 }; read(x) -> {0, 1}
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::assign(AstNode::ident("x"), AstNode::lit_int(0)),
            AstNode::if_stmt(
                AstNode::ident("cond"),
                AstNode::block(vec![AstNode::assign(AstNode::ident("x"), AstNode::lit_int(1))]),
                None,
            ),
        ],
    );

    let x = read(&mut interp, &mut state, "x");
    assert_eq!(union_prims(&interp, x), vec![Prim::Int(0), Prim::Int(1)]);
}

#[test]
fn switch_cases_merge_to_union() {
    let case = |n: i64| {
        AstNode::new(AstKind::Case {
            test: Some(AstNode::lit_int(n)),
            body: vec![AstNode::assign(AstNode::ident("y"), AstNode::lit_int(n * 10))],
        })
    };
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![AstNode::new(AstKind::Switch {
            discriminant: AstNode::ident("v"),
            cases: vec![case(1), case(2)],
        })],
    );

    let y = read(&mut interp, &mut state, "y");
    assert_eq!(union_prims(&interp, y), vec![Prim::Int(10), Prim::Int(20)]);
}

#[test]
fn conditional_expression_unions_arm_values() {
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![AstNode::assign(
            AstNode::ident("z"),
            AstNode::new(AstKind::Conditional {
                condition: AstNode::ident("flag"),
                consequent: AstNode::lit_str("yes"),
                alternate: AstNode::lit_str("no"),
            }),
        )],
    );

    let z = read(&mut interp, &mut state, "z");
    assert_eq!(
        union_prims(&interp, z),
        vec![Prim::Str("no".into()), Prim::Str("yes".into())]
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// Functions
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn function_with_branching_returns_unions_them() {
    // f(c) { if (c) { return 1 } return 2 }; out = f(anything)
    let body = AstNode::block(vec![
        AstNode::if_stmt(
            AstNode::ident("c"),
            AstNode::block(vec![AstNode::ret(Some(AstNode::lit_int(1)))]),
            None,
        ),
        AstNode::ret(Some(AstNode::lit_int(2))),
    ]);
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::func("f", vec![AstNode::param("c")], body),
            AstNode::assign(
                AstNode::ident("out"),
                AstNode::call(AstNode::ident("f"), vec![AstNode::ident("anything")]),
            ),
        ],
    );

    let out = read(&mut interp, &mut state, "out");
    assert_eq!(union_prims(&interp, out), vec![Prim::Int(1), Prim::Int(2)]);
}

#[test]
fn self_recursion_terminates_with_degenerate_symbol() {
    // f(n) { return f(n) }; out = f(1)
    let body = AstNode::block(vec![AstNode::ret(Some(AstNode::call(
        AstNode::ident("f"),
        vec![AstNode::ident("n")],
    )))]);
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::func("f", vec![AstNode::param("n")], body),
            AstNode::assign(
                AstNode::ident("out"),
                AstNode::call(AstNode::ident("f"), vec![AstNode::lit_int(1)]),
            ),
        ],
    );

    assert!(!interp.aborted());
    let out = read(&mut interp, &mut state, "out");
    // The innermost re-entry degrades to an opaque call symbol
    assert!(matches!(
        interp.arena.val(out).kind,
        VKind::Symbol | VKind::Union(_)
    ));
}

#[test]
fn hoisting_allows_call_before_declaration() {
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::assign(
                AstNode::ident("out"),
                AstNode::call(AstNode::ident("later"), vec![]),
            ),
            AstNode::func(
                "later",
                vec![],
                AstNode::block(vec![AstNode::ret(Some(AstNode::lit_int(9)))]),
            ),
        ],
    );

    let out = read(&mut interp, &mut state, "out");
    assert_eq!(prim_of(&interp, out), Some(Prim::Int(9)));
}

#[test]
fn overloads_resolve_by_arity() {
    // f() { return 1 }  f(a) { return a }  out = f(7)
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::func(
                "f",
                vec![],
                AstNode::block(vec![AstNode::ret(Some(AstNode::lit_int(1)))]),
            ),
            AstNode::func(
                "f",
                vec![AstNode::param("a")],
                AstNode::block(vec![AstNode::ret(Some(AstNode::ident("a")))]),
            ),
            AstNode::assign(
                AstNode::ident("out"),
                AstNode::call(AstNode::ident("f"), vec![AstNode::lit_int(7)]),
            ),
        ],
    );

    let out = read(&mut interp, &mut state, "out");
    assert_eq!(prim_of(&interp, out), Some(Prim::Int(7)));
}

#[test]
fn default_parameter_used_when_argument_missing() {
    // f(x = 5) { return x }; out = f()
    let param = AstNode::new(AstKind::Parameter {
        name: "x".into(),
        rest: false,
        default_value: Some(AstNode::lit_int(5)),
        type_hint: None,
    });
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::func(
                "f",
                vec![param],
                AstNode::block(vec![AstNode::ret(Some(AstNode::ident("x")))]),
            ),
            AstNode::assign(AstNode::ident("out"), AstNode::call(AstNode::ident("f"), vec![])),
        ],
    );

    let out = read(&mut interp, &mut state, "out");
    assert_eq!(prim_of(&interp, out), Some(Prim::Int(5)));
}

#[test]
fn variadic_rest_collects_trailing_arguments() {
    // f(a, ...rest) { return rest }; out = f(1, 2, 3)
    let rest = AstNode::new(AstKind::Parameter {
        name: "rest".into(),
        rest: true,
        default_value: None,
        type_hint: None,
    });
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::func(
                "f",
                vec![AstNode::param("a"), rest],
                AstNode::block(vec![AstNode::ret(Some(AstNode::ident("rest")))]),
            ),
            AstNode::assign(
                AstNode::ident("out"),
                AstNode::call(
                    AstNode::ident("f"),
                    vec![AstNode::lit_int(1), AstNode::lit_int(2), AstNode::lit_int(3)],
                ),
            ),
        ],
    );

    let out = read(&mut interp, &mut state, "out");
    let elements = &interp.arena.val(out).elements;
    assert_eq!(elements.len(), 2);
    assert_eq!(prim_of(&interp, elements[0]), Some(Prim::Int(2)));
    assert_eq!(prim_of(&interp, elements[1]), Some(Prim::Int(3)));
}

#[test]
fn decorator_chain_applies_in_reverse_declaration_order() {
    // replacement() { return "replaced" }
    // outer(f) { return replacement }   <- declared first, applies last
    // inner(f) { return f }
    // @outer @inner target() { return "body" }
    // out = target()
    let target = AstNode::new(AstKind::FunctionDef {
        id: Some(AstNode::ident("target")),
        params: vec![],
        body: AstNode::block(vec![AstNode::ret(Some(AstNode::lit_str("body")))]),
        decorators: vec![AstNode::ident("outer"), AstNode::ident("inner")],
    });
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::func(
                "replacement",
                vec![],
                AstNode::block(vec![AstNode::ret(Some(AstNode::lit_str("replaced")))]),
            ),
            AstNode::func(
                "outer",
                vec![AstNode::param("f")],
                AstNode::block(vec![AstNode::ret(Some(AstNode::ident("replacement")))]),
            ),
            AstNode::func(
                "inner",
                vec![AstNode::param("f")],
                AstNode::block(vec![AstNode::ret(Some(AstNode::ident("f")))]),
            ),
            target,
            AstNode::assign(
                AstNode::ident("out"),
                AstNode::call(AstNode::ident("target"), vec![]),
            ),
        ],
    );

    // outer wraps the result of inner, so the replacement wins
    let out = read(&mut interp, &mut state, "out");
    assert_eq!(prim_of(&interp, out), Some(Prim::Str("replaced".into())));
}

fn element_count_thunk(
    interp: &mut Interpreter,
    _receiver: Option<ValueId>,
    args: &[ValueId],
    _state: &mut ExecState,
) -> symflow_core::Result<ValueId> {
    let n = args
        .first()
        .map(|&a| interp.arena.val(a).elements.len() as i64)
        .unwrap_or(0);
    Ok(interp.arena.prim(Prim::Int(n), None))
}

#[test]
fn registered_builtin_executes_native_thunk() {
    let mut interp = interp();
    interp.register_builtin("length", element_count_thunk);

    let list = AstNode::new(AstKind::ListExpr {
        elements: vec![AstNode::lit_int(1), AstNode::lit_int(2), AstNode::lit_int(3)],
    });
    let mut state = run(
        &mut interp,
        vec![AstNode::assign(
            AstNode::ident("n"),
            AstNode::call(AstNode::ident("length"), vec![list]),
        )],
    );

    let n = read(&mut interp, &mut state, "n");
    assert_eq!(prim_of(&interp, n), Some(Prim::Int(3)));
}

#[test]
fn call_graph_edges_recorded_when_enabled() {
    let mut config = InterpreterConfig::default();
    config.build_call_graph = true;
    let mut interp = Interpreter::new(config, HookDispatcher::new());

    run(
        &mut interp,
        vec![
            AstNode::func(
                "callee_fn",
                vec![],
                AstNode::block(vec![AstNode::ret(Some(AstNode::lit_int(1)))]),
            ),
            AstNode::func(
                "caller_fn",
                vec![],
                AstNode::block(vec![AstNode::new(AstKind::ExprStatement {
                    expression: AstNode::call(AstNode::ident("callee_fn"), vec![]),
                })]),
            ),
            AstNode::new(AstKind::ExprStatement {
                expression: AstNode::call(AstNode::ident("caller_fn"), vec![]),
            }),
        ],
    );

    assert!(interp
        .call_edges
        .iter()
        .any(|e| e.caller == "caller_fn" && e.callee == "callee_fn"));
    assert!(interp
        .call_edges
        .iter()
        .any(|e| e.caller == "<entry>" && e.callee == "caller_fn"));
}

#[test]
fn bounded_loop_unrolling_terminates() {
    // while (true) { x = x + 1 }
    let mut interp = interp();
    run(
        &mut interp,
        vec![AstNode::new(AstKind::While {
            condition: AstNode::lit_bool(true),
            body: AstNode::block(vec![AstNode::assign(
                AstNode::ident("x"),
                binary("+", AstNode::ident("x"), AstNode::lit_int(1)),
            )]),
        })],
    );
    assert!(!interp.aborted());
}

#[test]
fn foreach_iterates_concrete_collection() {
    // sum = 0; for (v of [1, 2, 3]) { sum = sum + v }
    let list = AstNode::new(AstKind::ListExpr {
        elements: vec![AstNode::lit_int(1), AstNode::lit_int(2), AstNode::lit_int(3)],
    });
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            AstNode::assign(AstNode::ident("sum"), AstNode::lit_int(0)),
            AstNode::new(AstKind::ForEach {
                key: None,
                value: AstNode::ident("v"),
                iterable: list,
                body: AstNode::block(vec![AstNode::assign(
                    AstNode::ident("sum"),
                    binary("+", AstNode::ident("sum"), AstNode::ident("v")),
                )]),
            }),
        ],
    );

    let sum = read(&mut interp, &mut state, "sum");
    assert_eq!(prim_of(&interp, sum), Some(Prim::Int(6)));
}

#[test]
fn instruction_budget_aborts_analysis() {
    let mut config = InterpreterConfig::default();
    config.instruction_budget = Some(8);
    let mut interp = Interpreter::new(config, HookDispatcher::new());

    let stmts: Vec<Rc<AstNode>> = (0..50)
        .map(|i| AstNode::assign(AstNode::ident(format!("v{i}")), AstNode::lit_int(i)))
        .collect();
    run(&mut interp, stmts);

    assert!(interp.aborted());
    assert!(interp.executed() <= 9);
}

// ═══════════════════════════════════════════════════════════════════════════
// Taint propagation
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn identity_function_propagates_taint_with_call_site_trace() {
    // f(x) { return x }; y = f(SOURCE) with SOURCE pre-tainted
    let mut interp = interp();
    let source = interp.arena.symbol("SOURCE", None);
    stamp_taint(
        &mut interp.arena,
        source,
        "http-param",
        TraceStep::new(None, "request read"),
    );
    let top = interp.top_scope;
    interp.arena.bind(top, "src", source);

    let call = AstNode::with_loc(
        AstKind::Call {
            callee: AstNode::ident("f"),
            arguments: vec![AstNode::ident("src")],
        },
        Loc::line(7).with_file("app.js"),
    );
    let mut state = run(
        &mut interp,
        vec![
            AstNode::func(
                "f",
                vec![AstNode::param("x")],
                AstNode::block(vec![AstNode::ret(Some(AstNode::ident("x")))]),
            ),
            AstNode::assign(AstNode::ident("y"), call),
        ],
    );

    let y = read(&mut interp, &mut state, "y");
    let val = interp.arena.val(y);
    assert!(val.has_tag_rec);
    assert!(!val.trace.is_empty());
    assert!(
        val.trace.iter().any(|s| s.file == "app.js" && s.line == 7),
        "trace must contain an entry at the call site: {:?}",
        val.trace
    );
}

#[test]
fn unknown_callee_defaults_to_arg_to_return_passthrough() {
    let mut interp = interp();
    let source = interp.arena.symbol("SOURCE", None);
    stamp_taint(
        &mut interp.arena,
        source,
        "query",
        TraceStep::new(None, "source"),
    );
    let top = interp.top_scope;
    interp.arena.bind(top, "src", source);

    let mut state = run(
        &mut interp,
        vec![AstNode::assign(
            AstNode::ident("y"),
            AstNode::call(AstNode::ident("mystery"), vec![AstNode::ident("src")]),
        )],
    );

    let y = read(&mut interp, &mut state, "y");
    assert!(interp.arena.val(y).has_tag_rec);
}

#[test]
fn symbolic_foreach_taints_the_any_element_binding() {
    // for (v of items) { sink = v } where items is a tainted symbolic
    // collection: the body runs once against an "any element" value that
    // inherits the collection's taint.
    let mut interp = interp();
    let items = interp.arena.symbol("items", None);
    stamp_taint(
        &mut interp.arena,
        items,
        "http-body",
        TraceStep::new(None, "request collection"),
    );
    let top = interp.top_scope;
    interp.arena.bind(top, "items", items);

    let mut state = run(
        &mut interp,
        vec![AstNode::new(AstKind::ForEach {
            key: None,
            value: AstNode::ident("v"),
            iterable: AstNode::ident("items"),
            body: AstNode::block(vec![AstNode::assign(
                AstNode::ident("sink"),
                AstNode::ident("v"),
            )]),
        })],
    );

    let sink = read(&mut interp, &mut state, "sink");
    assert!(interp.arena.val(sink).has_tag_rec);
    assert!(!interp.arena.val(sink).trace.is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// Checker dispatch
// ═══════════════════════════════════════════════════════════════════════════

struct FailingChecker;

impl Checker for FailingChecker {
    fn id(&self) -> &str {
        "failing-checker"
    }
    fn subscriptions(&self) -> &[HookPoint] {
        &[HookPoint::Assignment]
    }
    fn at_assignment(
        &self,
        _interp: &mut Interpreter,
        _scope: ValueId,
        _node: &Rc<AstNode>,
        _state: &mut ExecState,
        _info: &AssignInfo,
    ) -> symflow_core::Result<()> {
        Err(SymflowError::checker("failing-checker", "intentional"))
    }
}

#[derive(Default)]
struct CountingChecker {
    assignments: RefCell<usize>,
}

impl Checker for CountingChecker {
    fn id(&self) -> &str {
        "counting-checker"
    }
    fn subscriptions(&self) -> &[HookPoint] {
        &[HookPoint::Assignment]
    }
    fn at_assignment(
        &self,
        _interp: &mut Interpreter,
        _scope: ValueId,
        _node: &Rc<AstNode>,
        _state: &mut ExecState,
        _info: &AssignInfo,
    ) -> symflow_core::Result<()> {
        *self.assignments.borrow_mut() += 1;
        Ok(())
    }
}

#[test]
fn failing_checker_does_not_stop_later_checkers() {
    let mut hooks = HookDispatcher::new();
    hooks.register(Rc::new(FailingChecker));
    let counter = Rc::new(CountingChecker::default());
    hooks.register(Rc::clone(&counter) as Rc<dyn Checker>);

    let mut interp = Interpreter::new(InterpreterConfig::default(), hooks);
    run(
        &mut interp,
        vec![
            AstNode::assign(AstNode::ident("a"), AstNode::lit_int(1)),
            AstNode::assign(AstNode::ident("b"), AstNode::lit_int(2)),
        ],
    );

    assert_eq!(*counter.assignments.borrow(), 2);
}

#[derive(Default)]
struct CalleeRecorder {
    callees: RefCell<Vec<String>>,
}

impl Checker for CalleeRecorder {
    fn id(&self) -> &str {
        "callee-recorder"
    }
    fn subscriptions(&self) -> &[HookPoint] {
        &[HookPoint::FunctionCallBefore]
    }
    fn at_function_call_before(
        &self,
        interp: &mut Interpreter,
        _scope: ValueId,
        _node: &Rc<AstNode>,
        _state: &mut ExecState,
        info: &CallInfo,
    ) -> symflow_core::Result<()> {
        self.callees
            .borrow_mut()
            .push(interp.arena.val(info.fclos).qid.clone());
        Ok(())
    }
}

#[test]
fn call_before_hook_fans_out_per_union_member() {
    // if (cond) { h = f1 } else { h = f2 }; out = h()
    // The dispatcher fires the before-hook once per union member, so the
    // recorder sees both closures without handling unions itself; the call
    // goes through each member and the results union.
    let recorder = Rc::new(CalleeRecorder::default());
    let mut hooks = HookDispatcher::new();
    hooks.register(Rc::clone(&recorder) as Rc<dyn Checker>);

    let mut interp = Interpreter::new(InterpreterConfig::default(), hooks);
    let mut state = run(
        &mut interp,
        vec![
            AstNode::func(
                "f1",
                vec![],
                AstNode::block(vec![AstNode::ret(Some(AstNode::lit_int(1)))]),
            ),
            AstNode::func(
                "f2",
                vec![],
                AstNode::block(vec![AstNode::ret(Some(AstNode::lit_int(2)))]),
            ),
            AstNode::if_stmt(
                AstNode::ident("cond"),
                AstNode::block(vec![AstNode::assign(AstNode::ident("h"), AstNode::ident("f1"))]),
                Some(AstNode::block(vec![AstNode::assign(
                    AstNode::ident("h"),
                    AstNode::ident("f2"),
                )])),
            ),
            AstNode::assign(
                AstNode::ident("out"),
                AstNode::call(AstNode::ident("h"), vec![]),
            ),
        ],
    );

    let out = read(&mut interp, &mut state, "out");
    assert_eq!(union_prims(&interp, out), vec![Prim::Int(1), Prim::Int(2)]);

    let callees = recorder.callees.borrow();
    assert!(callees.contains(&"f1".to_string()));
    assert!(callees.contains(&"f2".to_string()));
}

struct SkippingChecker;

impl Checker for SkippingChecker {
    fn id(&self) -> &str {
        "skipping-checker"
    }
    fn subscriptions(&self) -> &[HookPoint] {
        &[HookPoint::CompileUnitStart]
    }
    fn at_compile_unit_start(
        &self,
        _interp: &mut Interpreter,
        _scope: ValueId,
        _node: &Rc<AstNode>,
        _state: &mut ExecState,
    ) -> symflow_core::Result<bool> {
        Ok(true)
    }
}

#[test]
fn compile_unit_short_circuit_skips_processing() {
    let mut hooks = HookDispatcher::new();
    hooks.register(Rc::new(SkippingChecker));
    let counter = Rc::new(CountingChecker::default());
    hooks.register(Rc::clone(&counter) as Rc<dyn Checker>);

    let mut interp = Interpreter::new(InterpreterConfig::default(), hooks);
    let unit = AstNode::compile_unit(vec![AstNode::assign(
        AstNode::ident("a"),
        AstNode::lit_int(1),
    )]);
    let report = AnalysisDriver::new().run(&mut interp, &[unit]);

    assert_eq!(report.compile_units, 1);
    assert_eq!(*counter.assignments.borrow(), 0);
}

/// Entry-point collector + sink observer working together through the
/// driver, the way real framework checkers consume the engine.
struct RouteCollector;

impl Checker for RouteCollector {
    fn id(&self) -> &str {
        "route-collector"
    }
    fn subscriptions(&self) -> &[HookPoint] {
        &[HookPoint::FunctionDef]
    }
    fn at_function_def(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        _state: &mut ExecState,
        fclos: ValueId,
    ) -> symflow_core::Result<()> {
        let AstKind::FunctionDef { id: Some(id), .. } = &node.kind else {
            return Ok(());
        };
        if id.ident_name() != Some("handler") {
            return Ok(());
        }
        let request = interp.arena.symbol("request", None);
        stamp_taint(
            &mut interp.arena,
            request,
            "http-request",
            TraceStep::new(None, "route argument"),
        );
        interp.push_entry_point(EntryPoint {
            kind: "http-route".into(),
            scope,
            arg_values: vec![request],
            entry_point_sym_val: Some(fclos),
            function_name: "handler".into(),
            file_path: "app.js".into(),
            attribute: Some("/users/:id".into()),
            func_receiver_type: None,
        });
        Ok(())
    }
}

#[derive(Default)]
struct SinkObserver {
    tainted_sink_calls: RefCell<usize>,
}

impl Checker for SinkObserver {
    fn id(&self) -> &str {
        "sink-observer"
    }
    fn subscriptions(&self) -> &[HookPoint] {
        &[HookPoint::FunctionCallBefore]
    }
    fn at_function_call_before(
        &self,
        interp: &mut Interpreter,
        _scope: ValueId,
        _node: &Rc<AstNode>,
        _state: &mut ExecState,
        info: &CallInfo,
    ) -> symflow_core::Result<()> {
        let callee = interp.arena.val(info.fclos).qid.clone();
        if !callee.contains("exec_query") {
            return Ok(());
        }
        let tainted = info
            .argvalues
            .first()
            .map(|&a| interp.arena.val(a).has_tag_rec)
            .unwrap_or(false);
        if tainted {
            *self.tainted_sink_calls.borrow_mut() += 1;
        }
        Ok(())
    }
}

#[test]
fn entry_point_invocation_carries_taint_to_sink() {
    // handler(req) { exec_query(req) } - the collector queues the handler as
    // an entry point with a tainted request, the observer sees the flow.
    let mut hooks = HookDispatcher::new();
    hooks.register(Rc::new(RouteCollector));
    let observer = Rc::new(SinkObserver::default());
    hooks.register(Rc::clone(&observer) as Rc<dyn Checker>);

    let mut interp = Interpreter::new(InterpreterConfig::default(), hooks);
    let unit = AstNode::compile_unit(vec![AstNode::func(
        "handler",
        vec![AstNode::param("req")],
        AstNode::block(vec![AstNode::new(AstKind::ExprStatement {
            expression: AstNode::call(AstNode::ident("exec_query"), vec![AstNode::ident("req")]),
        })]),
    )]);

    let report = AnalysisDriver::new().run(&mut interp, &[unit]);
    assert_eq!(report.entry_points_run, 1);
    assert_eq!(*observer.tainted_sink_calls.borrow(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Classes
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn construction_clones_prototype_and_runs_constructor() {
    // class C { constructor(v) { this.v = v } }  obj = new C(3)
    let ctor = AstNode::new(AstKind::FunctionDef {
        id: Some(AstNode::ident("constructor")),
        params: vec![AstNode::param("v")],
        body: AstNode::block(vec![AstNode::assign(
            AstNode::member(AstNode::new(AstKind::This), AstNode::ident("v")),
            AstNode::ident("v"),
        )]),
        decorators: vec![],
    });
    let class = AstNode::new(AstKind::ClassDef {
        id: Some(AstNode::ident("C")),
        supers: vec![],
        body: vec![ctor],
        decorators: vec![],
    });
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            class,
            AstNode::assign(
                AstNode::ident("obj"),
                AstNode::new(AstKind::New {
                    callee: AstNode::ident("C"),
                    arguments: vec![AstNode::lit_int(3)],
                }),
            ),
        ],
    );

    let obj = read(&mut interp, &mut state, "obj");
    let v = interp.arena.binding(obj, "v").expect("constructor wrote this.v");
    assert_eq!(prim_of(&interp, v), Some(Prim::Int(3)));
}

#[test]
fn multi_supertype_fields_merge_into_instance() {
    let class_with_field = |name: &str, field: &str, value: i64| {
        AstNode::new(AstKind::ClassDef {
            id: Some(AstNode::ident(name)),
            supers: vec![],
            body: vec![AstNode::new(AstKind::VarDecl {
                id: AstNode::ident(field),
                init: Some(AstNode::lit_int(value)),
            })],
            decorators: vec![],
        })
    };
    let derived = AstNode::new(AstKind::ClassDef {
        id: Some(AstNode::ident("D")),
        supers: vec![AstNode::ident("A"), AstNode::ident("B")],
        body: vec![],
        decorators: vec![],
    });
    let mut interp = interp();
    let mut state = run(
        &mut interp,
        vec![
            class_with_field("A", "left", 1),
            class_with_field("B", "right", 2),
            derived,
            AstNode::assign(
                AstNode::ident("obj"),
                AstNode::new(AstKind::New {
                    callee: AstNode::ident("D"),
                    arguments: vec![],
                }),
            ),
        ],
    );

    let obj = read(&mut interp, &mut state, "obj");
    let left = interp.arena.binding(obj, "left").expect("inherited from A");
    let right = interp.arena.binding(obj, "right").expect("inherited from B");
    assert_eq!(prim_of(&interp, left), Some(Prim::Int(1)));
    assert_eq!(prim_of(&interp, right), Some(Prim::Int(2)));
}

// ═══════════════════════════════════════════════════════════════════════════
// Front-end JSON contract
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn json_block_runs_end_to_end() {
    let json = r#"{
        "type": "Block",
        "body": [
            {
                "type": "Assignment",
                "left": {"type": "Identifier", "name": "greeting"},
                "right": {
                    "type": "Binary",
                    "operator": "+",
                    "left": {"type": "Literal", "value": "hello "},
                    "right": {"type": "Literal", "value": "world"}
                },
                "loc": {"start": {"line": 1, "column": 0}, "sourcefile": "demo.js"}
            }
        ]
    }"#;
    let block: Rc<AstNode> = Rc::new(serde_json::from_str(json).expect("front-end contract"));

    let mut interp = interp();
    let mut state = ExecState::new();
    let top = interp.top_scope;
    interp.process_instruction(top, &block, &mut state);

    let v = read(&mut interp, &mut state, "greeting");
    assert_eq!(prim_of(&interp, v), Some(Prim::Str("hello world".into())));
}
