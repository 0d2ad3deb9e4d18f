//! Dispatch entry point
//!
//! `process_instruction` is the single gate every node goes through: it
//! checks the caller-supplied budget, distributes union-typed scopes,
//! dispatches on the node kind, isolates handler failures, and fires the
//! end-of-node hook. Calling order at every site mirrors real execution:
//! syntax check → operand evaluation → before-hook → simulated execution →
//! after-hook.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::InterpreterConfig;
use crate::errors::Result;
use crate::features::branch_state::{ExecState, ExitKind};
use crate::features::hooks::{EntryPoint, HookDispatcher};
use crate::features::scoping::{self, SubEvaluator};
use crate::features::value_store::{Prim, ScopeKind, VKind, ValueArena, ValueId};
use crate::shared::models::{AstKind, AstNode, LitValue};

use super::calls::PropagationRuleSet;

/// Native execution thunk for engine-registered builtins
pub type NativeFn =
    fn(&mut Interpreter, Option<ValueId>, &[ValueId], &mut ExecState) -> Result<ValueId>;

/// One caller → callee edge, recorded when `build_call_graph` is enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    pub file: String,
    pub line: u32,
}

/// The abstract interpreter
pub struct Interpreter {
    /// All values of this analysis run
    pub arena: ValueArena,
    /// Injected policy configuration
    pub config: InterpreterConfig,
    /// Checker-plugin dispatcher; the sole way security logic observes us
    pub hooks: Rc<HookDispatcher>,
    /// Root of every scope chain
    pub top_scope: ValueId,
    /// Caller → callee edges, when `build_call_graph` is on
    pub call_edges: Vec<CallEdge>,
    /// Entry points collected by checkers, drained by the driver
    entry_points: VecDeque<EntryPoint>,
    /// Registered native thunks, looked up by builtin name
    builtins: FxHashMap<String, NativeFn>,
    /// Library-call taint propagation rules
    lib_rules: PropagationRuleSet,
    /// Stable decorator-stripped closure per decorated closure; keeps the
    /// re-entry guard effective across repeated decorated calls
    pub(crate) undecorated: FxHashMap<ValueId, ValueId>,
    executed: u64,
    started: Instant,
    aborted: bool,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("values", &self.arena.len())
            .field("executed", &self.executed)
            .field("aborted", &self.aborted)
            .finish()
    }
}

impl Interpreter {
    pub fn new(config: InterpreterConfig, hooks: HookDispatcher) -> Self {
        let mut arena = ValueArena::new();
        let top_scope = arena.scope(ScopeKind::Top, None);
        // The top scope anchors every qid; keep its own qid empty so
        // top-level names qualify as bare names.
        {
            let top = arena.val_mut(top_scope);
            top.qid = String::new();
            top.sid = "<top>".to_string();
        }
        Self {
            arena,
            config,
            hooks: Rc::new(hooks),
            top_scope,
            call_edges: Vec::new(),
            entry_points: VecDeque::new(),
            builtins: FxHashMap::default(),
            lib_rules: PropagationRuleSet::with_defaults(),
            undecorated: FxHashMap::default(),
            executed: 0,
            started: Instant::now(),
            aborted: false,
        }
    }

    /// Replace the library-call propagation rule table
    pub fn set_propagation_rules(&mut self, rules: PropagationRuleSet) {
        self.lib_rules = rules;
    }

    pub(crate) fn lib_rules(&self) -> &PropagationRuleSet {
        &self.lib_rules
    }

    /// Register a native thunk and bind it as a callable in the top scope
    pub fn register_builtin(&mut self, name: &str, thunk: NativeFn) {
        self.builtins.insert(name.to_string(), thunk);
        let closure = self.arena.closure(
            crate::features::value_store::ClosureData {
                name: name.to_string(),
                params: Vec::new(),
                body: None,
                decorators: Vec::new(),
                captured_scope: self.top_scope,
                native: Some(name.to_string()),
            },
            None,
        );
        self.arena.bind(self.top_scope, name, closure);
    }

    pub(crate) fn builtin(&self, name: &str) -> Option<NativeFn> {
        self.builtins.get(name).copied()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Entry-point list (checkers append, the driver drains)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn push_entry_point(&mut self, ep: EntryPoint) {
        self.entry_points.push_back(ep);
    }

    pub fn take_next_entry_point(&mut self) -> Option<EntryPoint> {
        self.entry_points.pop_front()
    }

    pub fn pending_entry_points(&self) -> usize {
        self.entry_points.len()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Budget
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Instructions dispatched so far
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Whether the budget/deadline abort fired
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// External abort check at the single dispatch entry point. Exceeding
    /// the instruction budget or deadline flips `aborted` once; every
    /// dispatch afterwards degrades to an opaque symbol.
    fn budget_ok(&mut self) -> bool {
        if self.aborted {
            return false;
        }
        self.executed += 1;
        if let Some(limit) = self.config.instruction_budget {
            if self.executed > limit {
                warn!(executed = self.executed, "instruction budget exhausted; aborting analysis");
                self.aborted = true;
                return false;
            }
        }
        if let Some(ms) = self.config.deadline_ms {
            // Amortize the clock read; drift of a few hundred dispatches is fine
            if self.executed % 512 == 0 && self.started.elapsed() > Duration::from_millis(ms) {
                warn!(executed = self.executed, "deadline exceeded; aborting analysis");
                self.aborted = true;
                return false;
            }
        }
        true
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Dispatch
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Evaluate one node. Total: never fails, never panics.
    pub fn process_instruction(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> ValueId {
        if !self.budget_ok() {
            return self.arena.symbol("<aborted>", Some(Rc::clone(node)));
        }

        // A union-typed scope distributes the same node across every member
        if let VKind::Union(members) = &self.arena.val(scope).kind {
            let members = members.clone();
            let results: Vec<ValueId> = members
                .iter()
                .map(|&m| self.process_instruction(m, node, state))
                .collect();
            let config = self.config.clone();
            return self.arena.union_of(results, &config);
        }

        let value = match self.dispatch_node(scope, node, state) {
            Ok(v) => v,
            Err(err) => {
                warn!(
                    node = node.tag(),
                    loc = %node.loc.clone().unwrap_or_default(),
                    error = %err,
                    "node handler failed; continuing with Undefined"
                );
                self.arena.fresh_undefined(Some(Rc::clone(node)))
            }
        };

        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_node_end(self, scope, node, state, value);
        value
    }

    /// Evaluate a node list in sequence, honoring block exits. Yields the
    /// last produced value.
    pub fn process_nodes(
        &mut self,
        scope: ValueId,
        nodes: &[Rc<AstNode>],
        state: &mut ExecState,
    ) -> ValueId {
        let mut last = self.arena.undefined();
        for node in nodes {
            if state.einfo.kind.stops_block() || self.aborted {
                break;
            }
            last = self.process_instruction(scope, node, state);
        }
        last
    }

    fn dispatch_node(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        match &node.kind {
            AstKind::CompileUnit { body } => {
                let body = body.clone();
                self.eval_compile_unit(scope, node, &body, state)
            }
            AstKind::Block { body } => {
                let body = body.clone();
                self.eval_block(scope, node, &body, state)
            }
            AstKind::ExprStatement { expression } => {
                let expression = Rc::clone(expression);
                Ok(self.process_instruction(scope, &expression, state))
            }
            AstKind::Identifier { .. } | AstKind::This | AstKind::Super => {
                self.eval_reference(scope, node, state)
            }
            AstKind::Literal { value } => Ok(self.eval_literal(value.clone(), node)),
            AstKind::ListExpr { elements } => {
                let elements = elements.clone();
                self.eval_list(scope, node, &elements, state)
            }
            AstKind::MapExpr { entries } => {
                let entries = entries.clone();
                self.eval_map(scope, node, &entries, state)
            }
            AstKind::Property { value, .. } => {
                let value = Rc::clone(value);
                Ok(self.process_instruction(scope, &value, state))
            }
            AstKind::MemberAccess { .. } => self.eval_member_access(scope, node, state),
            AstKind::Tuple { elements } => {
                let elements = elements.clone();
                self.eval_tuple(scope, node, &elements, state)
            }
            AstKind::Sequence { expressions } => {
                let expressions = expressions.clone();
                Ok(self.process_nodes(scope, &expressions, state))
            }
            AstKind::Assignment { .. } => self.eval_assignment(scope, node, state),
            AstKind::VarDecl { .. } => self.eval_var_decl(scope, node, state),
            AstKind::FunctionDef { .. } => self.eval_function_def(scope, node, state),
            AstKind::ClassDef { .. } => self.eval_class_def(scope, node, state),
            AstKind::If { .. } => self.eval_if(scope, node, state),
            AstKind::Conditional { .. } => self.eval_conditional(scope, node, state),
            AstKind::Switch { .. } => self.eval_switch(scope, node, state),
            AstKind::While { .. } => self.eval_while(scope, node, state),
            AstKind::For { .. } => self.eval_for(scope, node, state),
            AstKind::ForEach { .. } => self.eval_foreach(scope, node, state),
            AstKind::Return { argument } => {
                let argument = argument.clone();
                self.eval_return(scope, node, argument, state)
            }
            AstKind::Throw { argument } => {
                let argument = argument.clone();
                self.eval_throw(scope, node, argument, state)
            }
            AstKind::Break => {
                state.einfo.kind = ExitKind::Break;
                Ok(self.arena.undefined())
            }
            AstKind::Continue => {
                state.einfo.kind = ExitKind::Continue;
                Ok(self.arena.undefined())
            }
            AstKind::Try { .. } => self.eval_try(scope, node, state),
            AstKind::Call { .. } => self.eval_call(scope, node, state),
            AstKind::New { .. } => self.eval_new(scope, node, state),
            AstKind::Binary { .. } => self.eval_binary(scope, node, state),
            AstKind::Unary { .. } => self.eval_unary(scope, node, state),
            // Structural nodes reached out of context degrade quietly
            AstKind::Parameter { name, .. } => {
                let name = name.clone();
                let ident = AstNode::ident(name);
                self.eval_reference(scope, &ident, state)
            }
            AstKind::Case { .. } | AstKind::CatchClause { .. } => {
                Ok(self.arena.fresh_undefined(Some(Rc::clone(node))))
            }
            AstKind::Unknown => {
                debug!(loc = %node.loc.clone().unwrap_or_default(), "unknown node kind; degrading to symbol");
                Ok(self.arena.symbol("<unknown>", Some(Rc::clone(node))))
            }
        }
    }

    pub(crate) fn eval_literal(&mut self, value: LitValue, node: &Rc<AstNode>) -> ValueId {
        let prim = match value {
            LitValue::Bool(b) => Prim::Bool(b),
            LitValue::Int(i) => Prim::Int(i),
            LitValue::Float(f) => Prim::Float(f),
            LitValue::Str(s) => Prim::Str(s),
            LitValue::Null => Prim::Null,
        };
        self.arena.prim(prim, Some(Rc::clone(node)))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Two-phase block processing (hoisting)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Declare phase: function and class declarations are bound before any
    /// evaluation so later code can reference earlier-than-declared names.
    pub(crate) fn declare_pass(
        &mut self,
        scope: ValueId,
        nodes: &[Rc<AstNode>],
        state: &mut ExecState,
    ) {
        for node in nodes {
            match &node.kind {
                AstKind::FunctionDef { id: Some(_), .. } => {
                    if let Err(err) = self.define_function(scope, node, state) {
                        warn!(error = %err, "declare pass: function definition failed");
                    }
                }
                AstKind::ClassDef { id: Some(_), .. } => {
                    if let Err(err) = self.define_class(scope, node, state) {
                        warn!(error = %err, "declare pass: class definition failed");
                    }
                }
                _ => {}
            }
        }
    }

    /// Declare phase then evaluate phase over one statement list. This is
    /// also the API for driving bare statement sequences that are not
    /// wrapped in a CompileUnit node.
    pub fn process_body(
        &mut self,
        scope: ValueId,
        nodes: &[Rc<AstNode>],
        state: &mut ExecState,
    ) -> ValueId {
        self.declare_pass(scope, nodes, state);
        self.process_nodes(scope, nodes, state)
    }

    fn eval_compile_unit(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        body: &[Rc<AstNode>],
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let unit_scope = self.arena.scope(ScopeKind::Unit, Some(scope));
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_pre_declaration(self, unit_scope, node, state);
        let last = self.process_body(unit_scope, body, state);
        hooks.check_at_block_end(self, unit_scope, node, state);
        Ok(last)
    }

    fn eval_block(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        body: &[Rc<AstNode>],
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let block_scope = self.arena.scope(ScopeKind::Block, Some(scope));
        let last = self.process_body(block_scope, body, state);
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_block_end(self, block_scope, node, state);
        Ok(last)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scoping port implementation
// ═══════════════════════════════════════════════════════════════════════════

impl SubEvaluator for Interpreter {
    fn eval_sub(&mut self, scope: ValueId, node: &Rc<AstNode>, state: &mut ExecState) -> ValueId {
        self.process_instruction(scope, node, state)
    }

    fn arena(&self) -> &ValueArena {
        &self.arena
    }

    fn arena_mut(&mut self) -> &mut ValueArena {
        &mut self.arena
    }

    fn interp_config(&self) -> &InterpreterConfig {
        &self.config
    }
}

// Re-exported convenience: resolve a reference through the addressing layer
impl Interpreter {
    /// Resolve a reference expression, lazily creating bindings
    pub fn resolve(&mut self, scope: ValueId, node: &Rc<AstNode>, state: &mut ExecState) -> ValueId {
        scoping::member_value(self, scope, node, state)
    }

    /// Resolve without creating bindings
    pub fn resolve_no_create(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> ValueId {
        scoping::member_value_no_create(self, scope, node, state)
    }
}
