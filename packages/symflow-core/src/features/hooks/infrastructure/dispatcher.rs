//! Checker registry and fan-out
//!
//! The interpreter calls exactly one dispatcher method per hook site,
//! unconditionally. The dispatcher iterates that hook's checkers in
//! registration order with failure isolation: one misbehaving checker is
//! logged and swallowed, it never aborts the analysis or another checker's
//! turn.

use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::warn;

use crate::errors::Result;
use crate::features::branch_state::ExecState;
use crate::features::interpreter::Interpreter;
use crate::features::value_store::{VKind, ValueId};
use crate::shared::models::AstNode;

use super::super::ports::{
    AssignInfo, BinaryInfo, CallInfo, Checker, EntryPoint, HookPoint, NewInfo,
};

/// Registry of checker plugins, indexed per hook point
pub struct HookDispatcher {
    registry: FxHashMap<HookPoint, Vec<Rc<dyn Checker>>>,
    count: usize,
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("checkers", &self.count)
            .field("hooks", &self.registry.len())
            .finish()
    }
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self {
            registry: FxHashMap::default(),
            count: 0,
        }
    }

    /// Register one checker under every hook point it subscribes to,
    /// preserving registration order within each hook.
    pub fn register(&mut self, checker: Rc<dyn Checker>) {
        for &point in checker.subscriptions() {
            self.registry
                .entry(point)
                .or_default()
                .push(Rc::clone(&checker));
        }
        self.count += 1;
    }

    /// Total registered checkers
    pub fn checker_count(&self) -> usize {
        self.count
    }

    fn checkers(&self, point: HookPoint) -> Vec<Rc<dyn Checker>> {
        self.registry.get(&point).cloned().unwrap_or_default()
    }

    /// Log-and-swallow wrapper around one trigger invocation
    fn guard(checker_id: &str, result: Result<()>) {
        if let Err(err) = result {
            warn!(checker = checker_id, error = %err, "checker trigger failed; continuing");
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Lifecycle hooks
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn check_at_analyze_start(&self, interp: &mut Interpreter) {
        for c in self.checkers(HookPoint::AnalyzeStart) {
            Self::guard(c.id(), c.at_analyze_start(interp));
        }
    }

    pub fn check_at_analyze_end(&self, interp: &mut Interpreter) {
        for c in self.checkers(HookPoint::AnalyzeEnd) {
            Self::guard(c.id(), c.at_analyze_end(interp));
        }
    }

    /// The single short-circuiting hook: returns the boolean OR of checker
    /// verdicts; `true` means "skip this compile unit".
    pub fn check_at_compile_unit_start(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> bool {
        let mut skip = false;
        for c in self.checkers(HookPoint::CompileUnitStart) {
            match c.at_compile_unit_start(interp, scope, node, state) {
                Ok(v) => skip = skip || v,
                Err(err) => {
                    warn!(checker = c.id(), error = %err, "checker trigger failed; continuing");
                }
            }
        }
        skip
    }

    pub fn check_at_compile_unit_end(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) {
        for c in self.checkers(HookPoint::CompileUnitEnd) {
            Self::guard(c.id(), c.at_compile_unit_end(interp, scope, node, state));
        }
    }

    pub fn check_at_entry_point_before(&self, interp: &mut Interpreter, ep: &EntryPoint) {
        for c in self.checkers(HookPoint::EntryPointBefore) {
            Self::guard(c.id(), c.at_entry_point_before(interp, ep));
        }
    }

    pub fn check_at_entry_point_after(
        &self,
        interp: &mut Interpreter,
        ep: &EntryPoint,
        ret: ValueId,
    ) {
        for c in self.checkers(HookPoint::EntryPointAfter) {
            Self::guard(c.id(), c.at_entry_point_after(interp, ep, ret));
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Node hooks
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn check_at_pre_declaration(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) {
        for c in self.checkers(HookPoint::PreDeclaration) {
            Self::guard(c.id(), c.at_pre_declaration(interp, scope, node, state));
        }
    }

    pub fn check_at_condition(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        condition: ValueId,
    ) {
        for c in self.checkers(HookPoint::Condition) {
            Self::guard(c.id(), c.at_condition(interp, scope, node, state, condition));
        }
    }

    /// Fans out once per union member when `fclos` is a union of closures,
    /// so individual checkers never handle closure unions themselves.
    pub fn check_at_function_call_before(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &CallInfo,
    ) {
        let members: Vec<ValueId> = match &interp.arena.val(info.fclos).kind {
            VKind::Union(members) => members.clone(),
            _ => vec![info.fclos],
        };
        for fclos in members {
            let member_info = CallInfo {
                fclos,
                argvalues: info.argvalues.clone(),
                receiver: info.receiver,
            };
            for c in self.checkers(HookPoint::FunctionCallBefore) {
                Self::guard(
                    c.id(),
                    c.at_function_call_before(interp, scope, node, state, &member_info),
                );
            }
        }
    }

    pub fn check_at_function_call_after(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &CallInfo,
        ret: ValueId,
    ) {
        for c in self.checkers(HookPoint::FunctionCallAfter) {
            Self::guard(
                c.id(),
                c.at_function_call_after(interp, scope, node, state, info, ret),
            );
        }
    }

    pub fn check_at_new_expr_before(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &NewInfo,
    ) {
        for c in self.checkers(HookPoint::NewExprBefore) {
            Self::guard(c.id(), c.at_new_expr_before(interp, scope, node, state, info));
        }
    }

    pub fn check_at_new_expr_object(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        object: ValueId,
    ) {
        for c in self.checkers(HookPoint::NewExprObject) {
            Self::guard(c.id(), c.at_new_expr_object(interp, scope, node, state, object));
        }
    }

    pub fn check_at_new_expr_after(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        object: ValueId,
    ) {
        for c in self.checkers(HookPoint::NewExprAfter) {
            Self::guard(c.id(), c.at_new_expr_after(interp, scope, node, state, object));
        }
    }

    pub fn check_at_assignment(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &AssignInfo,
    ) {
        for c in self.checkers(HookPoint::Assignment) {
            Self::guard(c.id(), c.at_assignment(interp, scope, node, state, info));
        }
    }

    pub fn check_at_block_end(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) {
        for c in self.checkers(HookPoint::BlockEnd) {
            Self::guard(c.id(), c.at_block_end(interp, scope, node, state));
        }
    }

    pub fn check_at_function_def(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        fclos: ValueId,
    ) {
        for c in self.checkers(HookPoint::FunctionDef) {
            Self::guard(c.id(), c.at_function_def(interp, scope, node, state, fclos));
        }
    }

    pub fn check_at_var_def(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        value: ValueId,
    ) {
        for c in self.checkers(HookPoint::VarDef) {
            Self::guard(c.id(), c.at_var_def(interp, scope, node, state, value));
        }
    }

    pub fn check_at_class_def(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        class: ValueId,
    ) {
        for c in self.checkers(HookPoint::ClassDef) {
            Self::guard(c.id(), c.at_class_def(interp, scope, node, state, class));
        }
    }

    pub fn check_at_identifier(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        value: ValueId,
    ) {
        for c in self.checkers(HookPoint::Identifier) {
            Self::guard(c.id(), c.at_identifier(interp, scope, node, state, value));
        }
    }

    pub fn check_at_member_access(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        value: ValueId,
    ) {
        for c in self.checkers(HookPoint::MemberAccess) {
            Self::guard(c.id(), c.at_member_access(interp, scope, node, state, value));
        }
    }

    pub fn check_at_binary_op(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &BinaryInfo,
    ) {
        for c in self.checkers(HookPoint::BinaryOp) {
            Self::guard(c.id(), c.at_binary_op(interp, scope, node, state, info));
        }
    }

    pub fn check_at_node_end(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        value: ValueId,
    ) {
        for c in self.checkers(HookPoint::NodeEnd) {
            Self::guard(c.id(), c.at_node_end(interp, scope, node, state, value));
        }
    }
}
