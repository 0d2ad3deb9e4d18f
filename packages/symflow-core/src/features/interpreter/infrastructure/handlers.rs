//! Per-node handlers
//!
//! One handler per node kind. Control-flow handlers own the fork/merge
//! choreography; reference handlers delegate to the addressing layer.

use std::rc::Rc;
use tracing::debug;

use crate::errors::Result;
use crate::features::branch_state::{
    fork_states, merge_forked_values, ExecState, ExitKind, PathCond,
};
use crate::features::hooks::{AssignInfo, BinaryInfo};
use crate::features::scoping::{self};
use crate::features::value_store::{
    propagate_taint, ClosureData, Prim, ScopeKind, TraceStep, VKind, ValueId,
};
use crate::shared::models::{AstKind, AstNode};

use super::dispatch::Interpreter;

impl Interpreter {
    pub(crate) fn step_at(&self, node: &Rc<AstNode>, desc: impl Into<String>) -> TraceStep {
        TraceStep::new(node.loc.as_ref(), desc)
    }

    /// Scopes reachable by parent links from `scope`, innermost first.
    /// These are the merge roots: every write lands in one of them or in an
    /// object reachable from them.
    pub(crate) fn scope_chain_roots(&self, scope: ValueId) -> Vec<ValueId> {
        let mut roots = Vec::with_capacity(8);
        let mut current = scope;
        for _ in 0..self.config.scope_hop_limit {
            if roots.contains(&current) {
                break;
            }
            roots.push(current);
            match self.arena.val(current).parent {
                Some(p) => current = p,
                None => break,
            }
        }
        roots
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // References
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub(crate) fn eval_reference(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let value = scoping::member_value(self, scope, node, state);
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_identifier(self, scope, node, state, value);
        Ok(value)
    }

    pub(crate) fn eval_member_access(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let normalized = scoping::resolve_indices(self, scope, node, state);
        let value = scoping::member_value(self, scope, &normalized, state);
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_member_access(self, scope, &normalized, state, value);
        Ok(value)
    }

    pub(crate) fn eval_list(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        elements: &[Rc<AstNode>],
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let values: Vec<ValueId> = elements
            .iter()
            .map(|e| self.process_instruction(scope, e, state))
            .collect();
        Ok(self.arena.list(values, Some(Rc::clone(node))))
    }

    pub(crate) fn eval_tuple(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        elements: &[Rc<AstNode>],
        state: &mut ExecState,
    ) -> Result<ValueId> {
        self.eval_list(scope, node, elements, state)
    }

    pub(crate) fn eval_map(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        entries: &[Rc<AstNode>],
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let obj = self.arena.object(Some(Rc::clone(node)));
        for entry in entries {
            if let AstKind::Property { key, value } = &entry.kind {
                let key_text = key.ref_text();
                let value = Rc::clone(value);
                let v = self.process_instruction(scope, &value, state);
                self.arena.bind(obj, &key_text, v);
                if self.arena.val(v).has_tag_rec {
                    let step = self.step_at(entry, "map entry");
                    propagate_taint(&mut self.arena, v, obj, step);
                }
            }
        }
        Ok(obj)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Assignment and declarations
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub(crate) fn eval_assignment(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::Assignment {
            left,
            right,
            operator,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let left = Rc::clone(left);
        let right = Rc::clone(right);
        let operator = operator.clone();

        let mut rvalue = self.process_instruction(scope, &right, state);

        // Compound assignment: fold the current value in first
        if let Some(op) = operator.as_deref() {
            if op != "=" {
                let op = op.trim_end_matches('=');
                let current = scoping::member_value_no_create(self, scope, &left, state);
                rvalue = self.apply_binary(op, current, rvalue, node, state);
            }
        }

        let target = scoping::resolve_indices(self, scope, &left, state);
        scoping::save_var_in_scope(self, scope, &target, rvalue, state);

        if self.arena.val(rvalue).has_tag_rec {
            let step = self.step_at(node, format!("assignment to {}", target.ref_text()));
            self.arena.val_mut(rvalue).trace.push(step);
        }

        let info = AssignInfo {
            lvalue: target,
            rvalue,
            lscope: scope,
        };
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_assignment(self, scope, node, state, &info);
        Ok(rvalue)
    }

    pub(crate) fn eval_var_decl(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::VarDecl { id, init } = &node.kind else {
            return Ok(self.arena.undefined());
        };
        let id = Rc::clone(id);
        let init = init.clone();

        let value = match init {
            Some(expr) => self.process_instruction(scope, &expr, state),
            None => self.arena.uninitialized(Some(Rc::clone(node))),
        };
        scoping::save_var_in_current_scope(self, scope, &id, value, state);

        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_var_def(self, scope, node, state, value);
        Ok(value)
    }

    pub(crate) fn eval_function_def(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        self.define_function(scope, node, state)
    }

    /// Bind (or re-find) a function declaration. Redeclaration under the
    /// same name forms a union - that union is the overload set the call
    /// machinery resolves against.
    pub(crate) fn define_function(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::FunctionDef {
            id,
            params,
            body,
            decorators,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let name = id.as_ref().and_then(|n| n.ident_name()).map(str::to_string);
        let params = params.clone();
        let body = Rc::clone(body);
        let decorators = decorators.clone();

        // Already declared in the declare phase? Return the existing binding.
        if let Some(name) = &name {
            if let Some(existing) = self.arena.binding(scope, name) {
                if self.holds_ast(existing, node) {
                    return Ok(existing);
                }
            }
        }

        let closure = self.arena.closure(
            ClosureData {
                name: name.clone().unwrap_or_default(),
                params,
                body: Some(body),
                decorators,
                captured_scope: scope,
                native: None,
            },
            Some(Rc::clone(node)),
        );

        if let Some(name) = &name {
            match self.arena.binding(scope, name) {
                Some(existing)
                    if self.arena.val(existing).is_closure()
                        || self.arena.val(existing).is_union() =>
                {
                    // Overload set; an existing union flattens in
                    let config = self.config.clone();
                    let set = self.arena.union_of(vec![existing, closure], &config);
                    self.arena.val_mut(scope).fields.insert(name.clone(), set);
                }
                _ => self.arena.bind(scope, name, closure),
            }
        }

        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_function_def(self, scope, node, state, closure);
        Ok(closure)
    }

    /// Whether `value` is (or contains) the closure/class created from `node`
    fn holds_ast(&self, value: ValueId, node: &Rc<AstNode>) -> bool {
        let v = self.arena.val(value);
        let direct = v
            .ast
            .as_ref()
            .map(|a| Rc::ptr_eq(a, node))
            .unwrap_or(false);
        if direct {
            return true;
        }
        match &v.kind {
            VKind::Union(members) => members.iter().any(|&m| {
                self.arena
                    .val(m)
                    .ast
                    .as_ref()
                    .map(|a| Rc::ptr_eq(a, node))
                    .unwrap_or(false)
            }),
            _ => false,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Control flow
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub(crate) fn eval_if(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::If {
            condition,
            consequent,
            alternate,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let condition = Rc::clone(condition);
        let consequent = Rc::clone(consequent);
        let alternate = alternate.clone();

        let cond_v = self.process_instruction(scope, &condition, state);
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_condition(self, scope, &condition, state, cond_v);

        let mut children = fork_states(state, 2);
        children[0].pcond.push(PathCond {
            cond: cond_v,
            assumed: true,
        });
        children[1].pcond.push(PathCond {
            cond: cond_v,
            assumed: false,
        });

        let then_scope = self.arena.scope(ScopeKind::Block, Some(scope));
        self.process_instruction(then_scope, &consequent, &mut children[0]);
        if let Some(alt) = alternate {
            let else_scope = self.arena.scope(ScopeKind::Block, Some(scope));
            self.process_instruction(else_scope, &alt, &mut children[1]);
        }

        let roots = self.scope_chain_roots(scope);
        merge_forked_values(&mut self.arena, &roots, state, &children, &self.config);
        self.propagate_fork_exits(state, &children);
        Ok(self.arena.undefined())
    }

    pub(crate) fn eval_conditional(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::Conditional {
            condition,
            consequent,
            alternate,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let condition = Rc::clone(condition);
        let consequent = Rc::clone(consequent);
        let alternate = Rc::clone(alternate);

        let cond_v = self.process_instruction(scope, &condition, state);
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_condition(self, scope, &condition, state, cond_v);

        let mut children = fork_states(state, 2);
        children[0].pcond.push(PathCond {
            cond: cond_v,
            assumed: true,
        });
        children[1].pcond.push(PathCond {
            cond: cond_v,
            assumed: false,
        });

        let then_scope = self.arena.scope(ScopeKind::Block, Some(scope));
        let v1 = self.process_instruction(then_scope, &consequent, &mut children[0]);
        let else_scope = self.arena.scope(ScopeKind::Block, Some(scope));
        let v2 = self.process_instruction(else_scope, &alternate, &mut children[1]);

        let roots = self.scope_chain_roots(scope);
        merge_forked_values(&mut self.arena, &roots, state, &children, &self.config);
        self.propagate_fork_exits(state, &children);

        let mut arms = Vec::with_capacity(2);
        if !children[0].einfo.kind.is_terminal() {
            arms.push(v1);
        }
        if !children[1].einfo.kind.is_terminal() {
            arms.push(v2);
        }
        let config = self.config.clone();
        Ok(self.arena.union_of(arms, &config))
    }

    pub(crate) fn eval_switch(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::Switch {
            discriminant,
            cases,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let discriminant = Rc::clone(discriminant);
        let cases = cases.clone();

        let disc = self.process_instruction(scope, &discriminant, state);
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_condition(self, scope, &discriminant, state, disc);

        if cases.is_empty() {
            return Ok(self.arena.undefined());
        }

        // N-way fork, one state per case; fall-through is approximated away
        let mut children = fork_states(state, cases.len());
        for (i, case) in cases.iter().enumerate() {
            let AstKind::Case { test, body } = &case.kind else {
                continue;
            };
            let test = test.clone();
            let body = body.clone();
            if let Some(test) = test {
                let tv = self.process_instruction(scope, &test, &mut children[i]);
                children[i].pcond.push(PathCond {
                    cond: tv,
                    assumed: true,
                });
            }
            let case_scope = self.arena.scope(ScopeKind::Block, Some(scope));
            self.process_body(case_scope, &body, &mut children[i]);
            // A break only leaves the switch
            if children[i].einfo.kind == ExitKind::Break {
                children[i].einfo.clear();
            }
        }

        let roots = self.scope_chain_roots(scope);
        merge_forked_values(&mut self.arena, &roots, state, &children, &self.config);
        self.propagate_fork_exits(state, &children);
        Ok(self.arena.undefined())
    }

    pub(crate) fn eval_while(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::While { condition, body } = &node.kind else {
            return Ok(self.arena.undefined());
        };
        let condition = Rc::clone(condition);
        let body = Rc::clone(body);
        self.run_loop(scope, Some(&condition), None, &body, state);
        Ok(self.arena.undefined())
    }

    pub(crate) fn eval_for(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::For {
            init,
            condition,
            update,
            body,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let init = init.clone();
        let condition = condition.clone();
        let update = update.clone();
        let body = Rc::clone(body);

        let loop_scope = self.arena.scope(ScopeKind::Block, Some(scope));
        if let Some(init) = init {
            self.process_instruction(loop_scope, &init, state);
        }
        self.run_loop(loop_scope, condition.as_ref(), update.as_ref(), &body, state);
        Ok(self.arena.undefined())
    }

    /// Bounded unrolling: loop bodies run a small fixed number of passes
    /// instead of iterating to a fixpoint. An explicit time/precision trade.
    fn run_loop(
        &mut self,
        scope: ValueId,
        condition: Option<&Rc<AstNode>>,
        update: Option<&Rc<AstNode>>,
        body: &Rc<AstNode>,
        state: &mut ExecState,
    ) {
        let hooks = Rc::clone(&self.hooks);
        for _pass in 0..self.config.loop_pass_limit {
            if self.aborted() {
                break;
            }
            if let Some(cond) = condition {
                let cond_v = self.process_instruction(scope, cond, state);
                hooks.check_at_condition(self, scope, cond, state, cond_v);
                if self.arena.val(cond_v).truthiness() == Some(false) {
                    break;
                }
            }
            let body_scope = self.arena.scope(ScopeKind::Block, Some(scope));
            self.process_instruction(body_scope, body, state);
            match state.einfo.kind {
                ExitKind::Break => {
                    state.einfo.clear();
                    break;
                }
                ExitKind::Continue => state.einfo.clear(),
                ExitKind::Return | ExitKind::Throw => break,
                ExitKind::None => {}
            }
            if let Some(update) = update {
                self.process_instruction(scope, update, state);
            }
        }
    }

    pub(crate) fn eval_foreach(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::ForEach {
            key,
            value,
            iterable,
            body,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let key = key.clone();
        let value = Rc::clone(value);
        let iterable = Rc::clone(iterable);
        let body = Rc::clone(body);

        let coll = scoping::member_value(self, scope, &iterable, state);
        let cap = self.config.collection_iter_cap;

        let elements = self.arena.val(coll).elements.clone();
        if !elements.is_empty() {
            // Concrete ordered collection: iterate directly, capped
            for (i, el) in elements.into_iter().take(cap).enumerate() {
                let iter_scope = self.arena.scope(ScopeKind::Block, Some(scope));
                if let Some(k) = &key {
                    let idx = self.arena.prim(Prim::Int(i as i64), None);
                    scoping::save_var_in_current_scope(self, iter_scope, k, idx, state);
                }
                scoping::save_var_in_current_scope(self, iter_scope, &value, el, state);
                self.process_instruction(iter_scope, &body, state);
                if self.loop_exit(state) {
                    break;
                }
            }
            return Ok(self.arena.undefined());
        }

        let mut field_entries: Vec<(String, ValueId)> = self
            .arena
            .val(coll)
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        if !field_entries.is_empty() && field_entries.len() <= cap {
            field_entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, el) in field_entries {
                let iter_scope = self.arena.scope(ScopeKind::Block, Some(scope));
                if let Some(k) = &key {
                    let kv = self.arena.prim(Prim::Str(name), None);
                    scoping::save_var_in_current_scope(self, iter_scope, k, kv, state);
                }
                scoping::save_var_in_current_scope(self, iter_scope, &value, el, state);
                self.process_instruction(iter_scope, &body, state);
                if self.loop_exit(state) {
                    break;
                }
            }
            return Ok(self.arena.undefined());
        }

        // Symbolic collection: execute the body once against an unresolved
        // key/value pair modeling "any element".
        let iter_scope = self.arena.scope(ScopeKind::Block, Some(scope));
        let coll_qid = self.arena.val(coll).qid.clone();
        if let Some(k) = &key {
            let kv = self.arena.symbol(format!("{coll_qid}[key]"), None);
            scoping::save_var_in_current_scope(self, iter_scope, k, kv, state);
        }
        let ev = self.arena.symbol(format!("{coll_qid}[?]"), Some(Rc::clone(node)));
        if self.arena.val(coll).has_tag_rec {
            let step = self.step_at(node, "element of tainted collection");
            propagate_taint(&mut self.arena, coll, ev, step);
        }
        scoping::save_var_in_current_scope(self, iter_scope, &value, ev, state);
        self.process_instruction(iter_scope, &body, state);
        self.loop_exit(state);
        Ok(self.arena.undefined())
    }

    /// Consume loop-local exits; report whether iteration must stop
    fn loop_exit(&self, state: &mut ExecState) -> bool {
        match state.einfo.kind {
            ExitKind::Break => {
                state.einfo.clear();
                true
            }
            ExitKind::Continue => {
                state.einfo.clear();
                false
            }
            ExitKind::Return | ExitKind::Throw => true,
            ExitKind::None => self.aborted(),
        }
    }

    /// Exit propagation after a merge: returned values from joined branches
    /// accumulate on the parent so the enclosing call can union them, and
    /// when every live branch left the enclosing block, the fall-through
    /// path is dead and the parent state inherits the exit.
    pub(crate) fn propagate_fork_exits(&mut self, state: &mut ExecState, children: &[ExecState]) {
        if children.is_empty() {
            return;
        }
        // Children cloned the parent's pending list at the fork; everything
        // beyond that shared prefix was observed inside one branch.
        let shared = state.pending_returns.len();
        for child in children {
            for &v in child.pending_returns.iter().skip(shared) {
                if !state.pending_returns.contains(&v) {
                    state.pending_returns.push(v);
                }
            }
            if child.einfo.kind == ExitKind::Return {
                if let Some(v) = child.einfo.value {
                    if !state.pending_returns.contains(&v) {
                        state.pending_returns.push(v);
                    }
                }
            }
        }
        if children.iter().all(|c| c.einfo.kind.is_terminal()) {
            let all_throw = children.iter().all(|c| c.einfo.kind == ExitKind::Throw);
            let values: Vec<ValueId> = children
                .iter()
                .filter_map(|c| c.einfo.value)
                .collect();
            let config = self.config.clone();
            let merged = self.arena.union_of(values, &config);
            state.einfo.kind = if all_throw {
                ExitKind::Throw
            } else {
                ExitKind::Return
            };
            state.einfo.value = Some(merged);
        } else if children.iter().all(|c| c.einfo.kind.stops_block()) {
            // Mixed break/continue across every branch: the block stops
            state.einfo.kind = children
                .iter()
                .map(|c| c.einfo.kind)
                .find(|k| !k.is_terminal())
                .unwrap_or(ExitKind::Break);
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Exits
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub(crate) fn eval_return(
        &mut self,
        scope: ValueId,
        _node: &Rc<AstNode>,
        argument: Option<Rc<AstNode>>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let value = match argument {
            Some(arg) => self.process_instruction(scope, &arg, state),
            None => self.arena.undefined(),
        };
        state.einfo.kind = ExitKind::Return;
        state.einfo.value = Some(value);
        Ok(value)
    }

    pub(crate) fn eval_throw(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        argument: Option<Rc<AstNode>>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let value = match argument {
            Some(arg) => self.process_instruction(scope, &arg, state),
            None => self.arena.symbol("<exception>", Some(Rc::clone(node))),
        };
        state.einfo.kind = ExitKind::Throw;
        state.einfo.value = Some(value);
        Ok(value)
    }

    pub(crate) fn eval_try(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::Try {
            block,
            handler,
            finalizer,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let block = Rc::clone(block);
        let handler = handler.clone();
        let finalizer = finalizer.clone();

        self.process_instruction(scope, &block, state);

        if state.einfo.kind == ExitKind::Throw {
            let exc = state
                .einfo
                .value
                .unwrap_or_else(|| self.arena.undefined());
            state.einfo.clear();
            if let Some(h) = handler {
                if let AstKind::CatchClause { param, body } = &h.kind {
                    let param = param.clone();
                    let body = Rc::clone(body);
                    let catch_scope = self.arena.scope(ScopeKind::Block, Some(scope));
                    if let Some(p) = param {
                        scoping::save_var_in_current_scope(self, catch_scope, &p, exc, state);
                    }
                    self.process_instruction(catch_scope, &body, state);
                }
            }
        }

        if let Some(fin) = finalizer {
            // A pending exit survives the finalizer unless it exits itself
            let pending = std::mem::take(&mut state.einfo);
            self.process_instruction(scope, &fin, state);
            if state.einfo.kind == ExitKind::None {
                state.einfo = pending;
            }
        }
        Ok(self.arena.undefined())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Operators
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub(crate) fn eval_binary(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::Binary {
            operator,
            left,
            right,
        } = &node.kind
        else {
            return Ok(self.arena.undefined());
        };
        let operator = operator.clone();
        let left = Rc::clone(left);
        let right = Rc::clone(right);

        let lhs = self.process_instruction(scope, &left, state);
        let rhs = self.process_instruction(scope, &right, state);
        let result = self.apply_binary(&operator, lhs, rhs, node, state);

        let info = BinaryInfo {
            operator,
            lhs,
            rhs,
            result,
        };
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_binary_op(self, scope, node, state, &info);
        Ok(result)
    }

    /// Constant-fold when both operands are concrete; degrade to a symbol
    /// otherwise. Taint from either operand reaches the result.
    pub(crate) fn apply_binary(
        &mut self,
        operator: &str,
        lhs: ValueId,
        rhs: ValueId,
        node: &Rc<AstNode>,
        _state: &mut ExecState,
    ) -> ValueId {
        let folded = fold_binary(
            operator,
            self.arena.val(lhs).prim.as_ref(),
            self.arena.val(rhs).prim.as_ref(),
        );
        let result = match folded {
            Some(prim) => self.arena.prim(prim, Some(Rc::clone(node))),
            None => {
                let qid = format!("<{} {operator} {}>", self.arena.val(lhs).qid, self.arena.val(rhs).qid);
                self.arena.symbol(qid, Some(Rc::clone(node)))
            }
        };
        for operand in [lhs, rhs] {
            if self.arena.val(operand).has_tag_rec {
                let step = self.step_at(node, format!("binary {operator}"));
                propagate_taint(&mut self.arena, operand, result, step);
            }
        }
        result
    }

    pub(crate) fn eval_unary(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::Unary { operator, argument } = &node.kind else {
            return Ok(self.arena.undefined());
        };
        let operator = operator.clone();
        let argument = Rc::clone(argument);

        let operand = self.process_instruction(scope, &argument, state);
        let folded = match operator.as_str() {
            "!" => self
                .arena
                .val(operand)
                .truthiness()
                .map(|t| Prim::Bool(!t)),
            "-" => match self.arena.val(operand).prim.clone() {
                Some(Prim::Int(i)) => Some(Prim::Int(-i)),
                Some(Prim::Float(f)) => Some(Prim::Float(-f)),
                _ => None,
            },
            "typeof" => Some(Prim::Str(self.arena.val(operand).kind.tag().to_string())),
            _ => None,
        };
        let result = match folded {
            Some(prim) => self.arena.prim(prim, Some(Rc::clone(node))),
            None => {
                let qid = format!("<{operator} {}>", self.arena.val(operand).qid);
                self.arena.symbol(qid, Some(Rc::clone(node)))
            }
        };
        if self.arena.val(operand).has_tag_rec {
            let step = self.step_at(node, format!("unary {operator}"));
            propagate_taint(&mut self.arena, operand, result, step);
        }
        Ok(result)
    }
}

/// Constant folding over concrete primitive pairs
fn fold_binary(op: &str, lhs: Option<&Prim>, rhs: Option<&Prim>) -> Option<Prim> {
    let (l, r) = (lhs?, rhs?);
    match op {
        "+" => match (l, r) {
            (Prim::Int(a), Prim::Int(b)) => Some(Prim::Int(a.wrapping_add(*b))),
            (Prim::Str(a), Prim::Str(b)) => Some(Prim::Str(format!("{a}{b}"))),
            (Prim::Str(a), b) => Some(Prim::Str(format!("{a}{}", prim_text(b)))),
            (a, Prim::Str(b)) => Some(Prim::Str(format!("{}{b}", prim_text(a)))),
            _ => numeric(l, r).map(|(a, b)| Prim::Float(a + b)),
        },
        "-" => int_or_float(l, r, |a, b| a.wrapping_sub(b), |a, b| a - b),
        "*" => int_or_float(l, r, |a, b| a.wrapping_mul(b), |a, b| a * b),
        "/" => match (l, r) {
            (_, Prim::Int(0)) => None,
            (Prim::Int(a), Prim::Int(b)) => Some(Prim::Int(a / b)),
            _ => {
                let (a, b) = numeric(l, r)?;
                if b == 0.0 {
                    None
                } else {
                    Some(Prim::Float(a / b))
                }
            }
        },
        "%" => match (l, r) {
            (Prim::Int(a), Prim::Int(b)) if *b != 0 => Some(Prim::Int(a % b)),
            _ => None,
        },
        "==" => prim_eq(l, r).map(Prim::Bool),
        "!=" => prim_eq(l, r).map(|b| Prim::Bool(!b)),
        "<" => numeric(l, r).map(|(a, b)| Prim::Bool(a < b)),
        "<=" => numeric(l, r).map(|(a, b)| Prim::Bool(a <= b)),
        ">" => numeric(l, r).map(|(a, b)| Prim::Bool(a > b)),
        ">=" => numeric(l, r).map(|(a, b)| Prim::Bool(a >= b)),
        "&&" => Some(Prim::Bool(l.is_truthy() && r.is_truthy())),
        "||" => Some(Prim::Bool(l.is_truthy() || r.is_truthy())),
        _ => {
            debug!(op, "unfolded binary operator");
            None
        }
    }
}

fn int_or_float(
    l: &Prim,
    r: &Prim,
    fi: impl Fn(i64, i64) -> i64,
    ff: impl Fn(f64, f64) -> f64,
) -> Option<Prim> {
    match (l, r) {
        (Prim::Int(a), Prim::Int(b)) => Some(Prim::Int(fi(*a, *b))),
        _ => numeric(l, r).map(|(a, b)| Prim::Float(ff(a, b))),
    }
}

fn numeric(l: &Prim, r: &Prim) -> Option<(f64, f64)> {
    let n = |p: &Prim| match p {
        Prim::Int(i) => Some(*i as f64),
        Prim::Float(f) => Some(*f),
        _ => None,
    };
    Some((n(l)?, n(r)?))
}

fn prim_eq(l: &Prim, r: &Prim) -> Option<bool> {
    match (l, r) {
        (Prim::Int(_), Prim::Int(_))
        | (Prim::Float(_), Prim::Float(_))
        | (Prim::Str(_), Prim::Str(_))
        | (Prim::Bool(_), Prim::Bool(_))
        | (Prim::Null, Prim::Null) => Some(l == r),
        (Prim::Int(a), Prim::Float(b)) | (Prim::Float(b), Prim::Int(a)) => {
            Some((*a as f64) == *b)
        }
        _ => Some(false),
    }
}

fn prim_text(p: &Prim) -> String {
    match p {
        Prim::Int(i) => i.to_string(),
        Prim::Float(f) => f.to_string(),
        Prim::Str(s) => s.clone(),
        Prim::Bool(b) => b.to_string(),
        Prim::Null => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_arithmetic() {
        assert_eq!(
            fold_binary("+", Some(&Prim::Int(2)), Some(&Prim::Int(3))),
            Some(Prim::Int(5))
        );
        assert_eq!(
            fold_binary("+", Some(&Prim::Str("a".into())), Some(&Prim::Int(1))),
            Some(Prim::Str("a1".into()))
        );
        assert_eq!(fold_binary("/", Some(&Prim::Int(1)), Some(&Prim::Int(0))), None);
    }

    #[test]
    fn test_fold_comparison() {
        assert_eq!(
            fold_binary("<", Some(&Prim::Int(1)), Some(&Prim::Float(1.5))),
            Some(Prim::Bool(true))
        );
        assert_eq!(
            fold_binary("==", Some(&Prim::Str("x".into())), Some(&Prim::Int(0))),
            Some(Prim::Bool(false))
        );
    }

    #[test]
    fn test_symbolic_operand_stays_symbolic() {
        assert_eq!(fold_binary("+", None, Some(&Prim::Int(1))), None);
    }
}
