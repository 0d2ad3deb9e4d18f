//! Function invocation
//!
//! Execution branches on what the callee resolves to:
//! (a) a user-defined closure with a body - fresh activation record,
//!     parameter binding (variadics, overload resolution), body execution,
//!     union'd multi-return collection;
//! (b) a decorated function - decorators applied in reverse declaration
//!     order;
//! (c) a builtin with a native thunk;
//! (d) a library/unknown function - configurable tag-propagation rules with
//!     default argument → return pass-through.
//!
//! A closure already on the call stack past the re-entry threshold is not
//! re-entered; an opaque call symbol is returned instead, bounding
//! non-termination.

use once_cell::sync::Lazy;
use regex::Regex;
use std::rc::Rc;
use tracing::debug;

use crate::errors::{Result, SymflowError};
use crate::features::branch_state::{load_forked_value, CallFrame, ExecState, ExitKind};
use crate::features::hooks::CallInfo;
use crate::features::scoping::{self};
use crate::features::value_store::{propagate_taint, ClosureData, ScopeKind, VKind, ValueId};
use crate::shared::models::{AstKind, AstNode};

use super::dispatch::{CallEdge, Interpreter};

// ═══════════════════════════════════════════════════════════════════════════
// Library-call taint propagation rules
// ═══════════════════════════════════════════════════════════════════════════

/// One propagation direction of a library-call rule
#[derive(Debug, Clone)]
pub enum PropagationKind {
    /// Taint flows from argument `from` to argument `to`
    ArgToArg { from: usize, to: usize },
    /// Taint flows from argument `from` onto the receiver
    ArgToReceiver { from: usize },
    /// Taint flows from the receiver to argument `to`
    ReceiverToArg { to: usize },
    /// Taint flows from every argument to the return value
    ArgToReturn,
}

/// Rule matching callee names by pattern
#[derive(Debug, Clone)]
pub struct PropagationRule {
    pub pattern: Regex,
    pub kinds: Vec<PropagationKind>,
}

impl PropagationRule {
    pub fn new(pattern: &str, kinds: Vec<PropagationKind>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| SymflowError::config(format!("bad propagation pattern: {e}")))?;
        Ok(Self { pattern, kinds })
    }
}

/// Ordered rule table; first match wins
#[derive(Debug, Clone, Default)]
pub struct PropagationRuleSet {
    rules: Vec<PropagationRule>,
}

static DEFAULT_RULES: Lazy<PropagationRuleSet> = Lazy::new(|| {
    let mut set = PropagationRuleSet::default();
    let table: &[(&str, Vec<PropagationKind>)] = &[
        (
            r"(?i)(^|\.)(push|append|add|insert|extend|write|send|put)$",
            vec![PropagationKind::ArgToReceiver { from: 0 }],
        ),
        (
            r"(?i)(^|\.)(copy_into|copyto|fill|assign)$",
            vec![PropagationKind::ReceiverToArg { to: 0 }],
        ),
        (
            r"(?i)(^|\.)(concat|join|format|replace|slice|substring)$",
            vec![PropagationKind::ArgToReturn],
        ),
    ];
    for (pattern, kinds) in table {
        if let Ok(rule) = PropagationRule::new(pattern, kinds.clone()) {
            set.push(rule);
        }
    }
    set
});

impl PropagationRuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in defaults for common collection/string library shapes
    pub fn with_defaults() -> Self {
        DEFAULT_RULES.clone()
    }

    pub fn push(&mut self, rule: PropagationRule) {
        self.rules.push(rule);
    }

    pub fn matching(&self, name: &str) -> Option<&PropagationRule> {
        self.rules.iter().find(|r| r.pattern.is_match(name))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Call evaluation
// ═══════════════════════════════════════════════════════════════════════════

impl Interpreter {
    pub(crate) fn eval_call(
        &mut self,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let AstKind::Call { callee, arguments } = &node.kind else {
            return Ok(self.arena.undefined());
        };
        let callee = Rc::clone(callee);
        let arguments = arguments.clone();

        // Operand evaluation before any hook fires
        let args: Vec<ValueId> = arguments
            .iter()
            .map(|a| self.process_instruction(scope, a, state))
            .collect();

        let fclos = scoping::member_value(self, scope, &callee, state);
        let receiver = match &callee.kind {
            AstKind::MemberAccess { object, .. } => {
                let object = Rc::clone(object);
                Some(scoping::member_value_no_create(self, scope, &object, state))
            }
            _ => None,
        };

        let info = CallInfo {
            fclos,
            argvalues: args.clone(),
            receiver,
        };
        let hooks = Rc::clone(&self.hooks);
        hooks.check_at_function_call_before(self, scope, node, state, &info);

        let ret = self.execute_call(fclos, receiver, &args, node, scope, state)?;

        hooks.check_at_function_call_after(self, scope, node, state, &info, ret);
        Ok(ret)
    }

    /// Execute a resolved callee. Total: every shape of callee produces a
    /// value.
    pub fn execute_call(
        &mut self,
        fclos: ValueId,
        receiver: Option<ValueId>,
        args: &[ValueId],
        call_node: &Rc<AstNode>,
        scope: ValueId,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        if self.config.build_call_graph {
            self.record_call_edge(fclos, call_node, state);
        }

        let kind = self.arena.val(fclos).kind.clone();
        match kind {
            VKind::Union(members) => {
                // A same-named union is an overload set: resolve one member
                // by arity and structural type match. Anything else calls
                // through every member and unions the results.
                if let Some(target) = self.overload_target(&members, args) {
                    return self.execute_call(target, receiver, args, call_node, scope, state);
                }
                let mut results = Vec::with_capacity(members.len());
                for member in members {
                    let member = load_forked_value(&self.arena, member, state);
                    match self.execute_call(member, receiver, args, call_node, scope, state) {
                        Ok(v) => results.push(v),
                        Err(err) => {
                            debug!(error = %err, "union member call failed; skipping member");
                        }
                    }
                }
                let config = self.config.clone();
                Ok(self.arena.union_of(results, &config))
            }
            VKind::Closure(data) => {
                if let Some(native) = &data.native {
                    if let Some(thunk) = self.builtin(native) {
                        return thunk(self, receiver, args, state);
                    }
                    return self.unknown_call(fclos, receiver, args, call_node, scope, state);
                }
                if !data.decorators.is_empty() {
                    return self.invoke_decorated(
                        fclos, &data, receiver, args, call_node, scope, state,
                    );
                }
                if data.body.is_some() {
                    if state.reentry_count(fclos) >= self.config.reentry_limit {
                        debug!(name = %data.name, "re-entry threshold reached; degrading recursive call");
                        let qid = format!("{}()", data.name);
                        return Ok(self.arena.symbol(qid, Some(Rc::clone(call_node))));
                    }
                    return self.invoke_closure(fclos, &data, receiver, args, &[], call_node, state);
                }
                self.unknown_call(fclos, receiver, args, call_node, scope, state)
            }
            VKind::Class(_) => self.construct_object(fclos, args, call_node, scope, state),
            _ => self.unknown_call(fclos, receiver, args, call_node, scope, state),
        }
    }

    /// Build the activation record, bind parameters, run the body, collect
    /// the (possibly union'd) return value.
    pub(crate) fn invoke_closure(
        &mut self,
        fclos: ValueId,
        data: &ClosureData,
        receiver: Option<ValueId>,
        args: &[ValueId],
        extra_bindings: &[(&str, ValueId)],
        call_node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let act = self.arena.scope(ScopeKind::Call, Some(data.captured_scope));

        let mut next_arg = 0usize;
        for param in &data.params {
            match &param.kind {
                AstKind::Parameter {
                    name,
                    rest,
                    default_value,
                    ..
                } => {
                    if *rest {
                        // Variadic tail: collect the remaining arguments
                        let tail: Vec<ValueId> = args[next_arg.min(args.len())..].to_vec();
                        let pack = self.arena.list(tail, Some(Rc::clone(param)));
                        self.arena.bind(act, name, pack);
                        next_arg = args.len();
                    } else {
                        let bound = match args.get(next_arg) {
                            Some(&v) => v,
                            None => match default_value {
                                Some(dflt) => {
                                    let dflt = Rc::clone(dflt);
                                    self.process_instruction(act, &dflt, state)
                                }
                                None => self.arena.fresh_undefined(Some(Rc::clone(param))),
                            },
                        };
                        self.arena.bind(act, name, bound);
                        next_arg += 1;
                    }
                }
                AstKind::Identifier { name } => {
                    let bound = args
                        .get(next_arg)
                        .copied()
                        .unwrap_or_else(|| self.arena.fresh_undefined(Some(Rc::clone(param))));
                    self.arena.bind(act, name.as_str(), bound);
                    next_arg += 1;
                }
                _ => next_arg += 1,
            }
        }

        if let Some(receiver) = receiver {
            self.arena.bind(act, "this", receiver);
        }
        for (name, value) in extra_bindings {
            self.arena.bind(act, name, *value);
        }

        state.callstack.push(CallFrame {
            fclos,
            call_node: Some(Rc::clone(call_node)),
        });
        let body = match &data.body {
            Some(b) => Rc::clone(b),
            None => {
                state.callstack.pop();
                return Ok(self.arena.undefined());
            }
        };
        // Everything pushed past this mark is a return observed inside this
        // call (branch joins accumulate them).
        let return_mark = state.pending_returns.len();
        self.process_instruction(act, &body, state);
        state.callstack.pop();

        let mut returns: Vec<ValueId> = state.pending_returns.split_off(return_mark);
        // The call consumes a Return exit; a Throw keeps propagating until
        // some enclosing try handles it.
        if state.einfo.kind == ExitKind::Return {
            if let Some(v) = state.einfo.value {
                if !returns.contains(&v) {
                    returns.push(v);
                }
            }
            state.einfo.clear();
        }
        let config = self.config.clone();
        let ret = self.arena.union_of(returns, &config);
        if self.arena.val(ret).has_tag_rec {
            let step = self.step_at(
                call_node,
                format!("return from {}", display_name(&data.name)),
            );
            self.arena.val_mut(ret).trace.push(step);
        }
        Ok(ret)
    }

    /// Decorator chains apply in reverse declaration order: the decorator
    /// written closest to the function wraps first.
    ///
    /// The stripped closure is cached per decorated closure: a decorated
    /// function calling itself must re-enter the same closure identity or
    /// the re-entry guard cannot see the cycle.
    #[allow(clippy::too_many_arguments)]
    fn invoke_decorated(
        &mut self,
        fclos: ValueId,
        data: &ClosureData,
        receiver: Option<ValueId>,
        args: &[ValueId],
        call_node: &Rc<AstNode>,
        scope: ValueId,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let undecorated = match self.undecorated.get(&fclos) {
            Some(&cached) => cached,
            None => {
                let stripped = self.arena.closure(
                    ClosureData {
                        decorators: Vec::new(),
                        ..data.clone()
                    },
                    None,
                );
                self.undecorated.insert(fclos, stripped);
                stripped
            }
        };
        let mut effective = undecorated;
        for dec in data.decorators.iter().rev() {
            let dec_value = self.process_instruction(data.captured_scope, dec, state);
            effective = self.execute_call(dec_value, None, &[effective], dec, scope, state)?;
        }
        self.execute_call(effective, receiver, args, call_node, scope, state)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Overload resolution
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// A union is an overload set when every member is a closure sharing one
    /// declared name. Returns the best-matching member, or None when the
    /// union came from data flow instead of redeclaration.
    fn overload_target(&self, members: &[ValueId], args: &[ValueId]) -> Option<ValueId> {
        let mut shared_name: Option<&str> = None;
        for &m in members {
            let data = self.arena.val(m).closure()?;
            if data.name.is_empty() {
                return None;
            }
            match shared_name {
                None => shared_name = Some(&data.name),
                Some(n) if n == data.name => {}
                _ => return None,
            }
        }
        Some(self.select_overload(members, args))
    }

    /// Rank candidates by parameter count and structural type match
    pub(crate) fn select_overload(&self, candidates: &[ValueId], args: &[ValueId]) -> ValueId {
        let mut best = candidates[0];
        let mut best_score = i32::MIN;
        for &cand in candidates {
            let Some(data) = self.arena.val(cand).closure() else {
                continue;
            };
            let score = self.overload_score(data, args);
            if score > best_score {
                best = cand;
                best_score = score;
            }
        }
        best
    }

    fn overload_score(&self, data: &ClosureData, args: &[ValueId]) -> i32 {
        let mut fixed = 0usize;
        let mut has_rest = false;
        for p in &data.params {
            match &p.kind {
                AstKind::Parameter { rest: true, .. } => has_rest = true,
                _ => fixed += 1,
            }
        }

        let mut score = 0i32;
        if fixed == args.len() {
            score += 4;
        } else if has_rest && args.len() >= fixed {
            score += 2;
        } else if args.len() < fixed {
            score += 1; // callable with padding
        } else {
            score -= 2; // extra arguments dropped
        }

        // Structural type match against declared hints
        for (p, &arg) in data.params.iter().zip(args.iter()) {
            let AstKind::Parameter {
                type_hint: Some(hint),
                ..
            } = &p.kind
            else {
                continue;
            };
            if self.arg_matches_hint(arg, hint) {
                score += 1;
            }
        }
        score
    }

    fn arg_matches_hint(&self, arg: ValueId, hint: &str) -> bool {
        let v = self.arena.val(arg);
        match hint {
            "any" => true,
            "int" | "float" | "str" | "bool" | "null" => v
                .prim
                .as_ref()
                .map(|p| p.kind_name() == hint)
                .unwrap_or(false),
            "object" => matches!(v.kind, VKind::Object),
            "function" | "callable" => v.is_closure(),
            _ => false,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Library / unknown callee fallback
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Best-effort modeling of a call with no resolvable body: apply the
    /// propagation rule table, default to argument → return pass-through,
    /// and optionally invoke closure-typed arguments once with symbolic
    /// arguments (callback modeling).
    pub(crate) fn unknown_call(
        &mut self,
        fclos: ValueId,
        receiver: Option<ValueId>,
        args: &[ValueId],
        call_node: &Rc<AstNode>,
        scope: ValueId,
        state: &mut ExecState,
    ) -> Result<ValueId> {
        let name = {
            let qid = &self.arena.val(fclos).qid;
            if qid.is_empty() {
                call_node.ref_text()
            } else {
                qid.clone()
            }
        };
        let ret = self
            .arena
            .symbol(format!("{name}()"), Some(Rc::clone(call_node)));

        let rule = self.lib_rules().matching(&name).cloned();
        match rule {
            Some(rule) => {
                for kind in &rule.kinds {
                    match *kind {
                        PropagationKind::ArgToArg { from, to } => {
                            if let (Some(&f), Some(&t)) = (args.get(from), args.get(to)) {
                                let step = self.step_at(call_node, format!("{name} arg flow"));
                                propagate_taint(&mut self.arena, f, t, step);
                            }
                        }
                        PropagationKind::ArgToReceiver { from } => {
                            if let (Some(&f), Some(recv)) = (args.get(from), receiver) {
                                let step =
                                    self.step_at(call_node, format!("{name} taints receiver"));
                                propagate_taint(&mut self.arena, f, recv, step);
                            }
                        }
                        PropagationKind::ReceiverToArg { to } => {
                            if let (Some(recv), Some(&t)) = (receiver, args.get(to)) {
                                let step =
                                    self.step_at(call_node, format!("{name} receiver flow"));
                                propagate_taint(&mut self.arena, recv, t, step);
                            }
                        }
                        PropagationKind::ArgToReturn => {
                            for &arg in args {
                                let step = self.step_at(call_node, format!("through {name}"));
                                propagate_taint(&mut self.arena, arg, ret, step);
                            }
                        }
                    }
                }
            }
            None => {
                // Default: arguments pass through to the return value
                for &arg in args {
                    let step = self.step_at(call_node, format!("through {name}"));
                    propagate_taint(&mut self.arena, arg, ret, step);
                }
            }
        }

        if self.config.invoke_unresolved_callbacks {
            self.invoke_callback_arguments(args, call_node, scope, state);
        }
        Ok(ret)
    }

    /// Closure arguments handed to an unknown callee are assumed invoked
    /// once, each parameter an unresolved symbol.
    fn invoke_callback_arguments(
        &mut self,
        args: &[ValueId],
        call_node: &Rc<AstNode>,
        scope: ValueId,
        state: &mut ExecState,
    ) {
        for &arg in args {
            let is_callback = self
                .arena
                .val(arg)
                .closure()
                .map(|c| c.body.is_some() && c.native.is_none())
                .unwrap_or(false);
            if !is_callback {
                continue;
            }
            let param_count = self
                .arena
                .val(arg)
                .closure()
                .map(|c| c.params.len())
                .unwrap_or(0);
            let sym_args: Vec<ValueId> = (0..param_count)
                .map(|i| self.arena.symbol(format!("<callback arg {i}>"), None))
                .collect();
            if let Err(err) = self.execute_call(arg, None, &sym_args, call_node, scope, state) {
                debug!(error = %err, "callback invocation failed; skipping");
            }
        }
    }

    fn record_call_edge(&mut self, fclos: ValueId, call_node: &Rc<AstNode>, state: &ExecState) {
        let caller = state
            .callstack
            .last()
            .and_then(|f| self.arena.val(f.fclos).closure().map(|c| c.name.clone()))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "<entry>".to_string());
        let callee = {
            let qid = &self.arena.val(fclos).qid;
            if qid.is_empty() {
                call_node.ref_text()
            } else {
                qid.clone()
            }
        };
        let (file, line) = call_node
            .loc
            .as_ref()
            .map(|l| (l.file().to_string(), l.start.line))
            .unwrap_or_else(|| ("<unknown>".to_string(), 0));
        self.call_edges.push(CallEdge {
            caller,
            callee,
            file,
            line,
        });
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "<anonymous>"
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_match_qualified_names() {
        let rules = PropagationRuleSet::with_defaults();
        assert!(rules.matching("items.push").is_some());
        assert!(rules.matching("append").is_some());
        assert!(rules.matching("fetch_rows").is_none());
    }

    #[test]
    fn test_bad_pattern_rejected() {
        assert!(PropagationRule::new("(unclosed", vec![PropagationKind::ArgToReturn]).is_err());
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        let mut set = PropagationRuleSet::empty();
        set.push(PropagationRule::new("^a", vec![PropagationKind::ArgToReturn]).unwrap());
        set.push(
            PropagationRule::new("^ab", vec![PropagationKind::ArgToReceiver { from: 0 }]).unwrap(),
        );
        let rule = set.matching("abc").unwrap();
        assert!(matches!(rule.kinds[0], PropagationKind::ArgToReturn));
    }
}
