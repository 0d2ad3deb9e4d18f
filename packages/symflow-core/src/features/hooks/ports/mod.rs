//! Checker plugin contract
//!
//! A checker is any object exposing a stable identifier, the set of hook
//! points it answers, and trigger methods for those points. One checker
//! instance typically answers several hooks.
//!
//! Rust note: the describing protocol detects triggers structurally
//! (duck-typed method probing). Here subscription is explicit -
//! [`Checker::subscriptions`] - and every trigger has a default no-op body,
//! which keeps "one checker, several hooks" without reflection.
//!
//! Checker-local memoization (processed-route sets and the like) belongs in
//! checker-owned fields behind interior mutability, reset in
//! `at_analyze_end`. Never process-wide state.

use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::errors::Result;
use crate::features::branch_state::ExecState;
use crate::features::interpreter::Interpreter;
use crate::features::value_store::ValueId;
use crate::shared::models::AstNode;

/// The fixed hook vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookPoint {
    AnalyzeStart,
    AnalyzeEnd,
    CompileUnitStart,
    CompileUnitEnd,
    PreDeclaration,
    Condition,
    FunctionCallBefore,
    FunctionCallAfter,
    NewExprBefore,
    NewExprObject,
    NewExprAfter,
    Assignment,
    BlockEnd,
    FunctionDef,
    VarDef,
    ClassDef,
    Identifier,
    MemberAccess,
    BinaryOp,
    NodeEnd,
    EntryPointBefore,
    EntryPointAfter,
}

/// Payload for call hooks
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Resolved callee (may be a union of closures; the dispatcher fans the
    /// before-hook out per member)
    pub fclos: ValueId,
    /// Evaluated argument values
    pub argvalues: Vec<ValueId>,
    /// Receiver for method calls
    pub receiver: Option<ValueId>,
}

/// Payload for the assignment hook
#[derive(Debug, Clone)]
pub struct AssignInfo {
    /// The write target expression
    pub lvalue: Rc<AstNode>,
    /// The evaluated right-hand value
    pub rvalue: ValueId,
    /// Scope the write resolves against
    pub lscope: ValueId,
}

/// Payload for new-expression hooks
#[derive(Debug, Clone)]
pub struct NewInfo {
    /// Resolved class value
    pub class: ValueId,
    /// Evaluated constructor arguments
    pub argvalues: Vec<ValueId>,
}

/// Payload for the binary-operation hook
#[derive(Debug, Clone)]
pub struct BinaryInfo {
    pub operator: String,
    pub lhs: ValueId,
    pub rhs: ValueId,
    pub result: ValueId,
}

/// One simulated top-level invocation
///
/// Produced by entry-point collectors (web-framework route scanners, CLI
/// registrations - external to this engine), consumed by the execution
/// driver: "invoke this function as if called with these arguments from
/// this scope".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Collector-defined kind ("http-route", "cli-command", "main", ...)
    pub kind: String,
    /// Scope to resolve the invocation in
    pub scope: ValueId,
    /// Pre-built argument values (typically tainted request symbols)
    pub arg_values: Vec<ValueId>,
    /// The function value itself, when the collector resolved one
    pub entry_point_sym_val: Option<ValueId>,
    /// Name to resolve when no value was provided
    pub function_name: String,
    /// File the entry point was collected from
    pub file_path: String,
    /// Collector-specific attribute (route path, command name, ...)
    #[serde(default)]
    pub attribute: Option<String>,
    /// Receiver type for method-style entry points
    #[serde(default)]
    pub func_receiver_type: Option<String>,
}

/// Checker plugin trait
///
/// Every trigger defaults to a no-op so a checker only writes the hooks it
/// subscribes to. All triggers may mutate Values through the interpreter;
/// results are reported through the checker's own injected sink, which the
/// engine never inspects.
#[allow(unused_variables)]
pub trait Checker {
    /// Stable identifier, used for registration and failure logs
    fn id(&self) -> &str;

    /// Hook points this checker answers
    fn subscriptions(&self) -> &[HookPoint];

    fn at_analyze_start(&self, interp: &mut Interpreter) -> Result<()> {
        Ok(())
    }

    fn at_analyze_end(&self, interp: &mut Interpreter) -> Result<()> {
        Ok(())
    }

    /// The single hook whose return value matters: `true` requests skipping
    /// this compile unit (ORed across checkers).
    fn at_compile_unit_start(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<bool> {
        Ok(false)
    }

    fn at_compile_unit_end(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<()> {
        Ok(())
    }

    fn at_pre_declaration(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<()> {
        Ok(())
    }

    fn at_condition(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        condition: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_function_call_before(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &CallInfo,
    ) -> Result<()> {
        Ok(())
    }

    fn at_function_call_after(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &CallInfo,
        ret: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_new_expr_before(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &NewInfo,
    ) -> Result<()> {
        Ok(())
    }

    fn at_new_expr_object(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        object: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_new_expr_after(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        object: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_assignment(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &AssignInfo,
    ) -> Result<()> {
        Ok(())
    }

    fn at_block_end(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
    ) -> Result<()> {
        Ok(())
    }

    fn at_function_def(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        fclos: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_var_def(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        value: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_class_def(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        class: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_identifier(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        value: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_member_access(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        value: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_binary_op(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        info: &BinaryInfo,
    ) -> Result<()> {
        Ok(())
    }

    fn at_node_end(
        &self,
        interp: &mut Interpreter,
        scope: ValueId,
        node: &Rc<AstNode>,
        state: &mut ExecState,
        value: ValueId,
    ) -> Result<()> {
        Ok(())
    }

    fn at_entry_point_before(&self, interp: &mut Interpreter, ep: &EntryPoint) -> Result<()> {
        Ok(())
    }

    fn at_entry_point_after(
        &self,
        interp: &mut Interpreter,
        ep: &EntryPoint,
        ret: ValueId,
    ) -> Result<()> {
        Ok(())
    }
}
