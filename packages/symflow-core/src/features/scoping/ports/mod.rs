//! Scoping ports
//!
//! The addressing layer needs to evaluate sub-expressions (computed member
//! keys like `A[f(x)]`) without depending on the interpreter feature. The
//! interpreter implements this port.

use std::rc::Rc;

use crate::config::InterpreterConfig;
use crate::features::branch_state::ExecState;
use crate::features::value_store::{ValueArena, ValueId};
use crate::shared::models::AstNode;

/// Evaluation capability handed down to the addressing layer
pub trait SubEvaluator {
    /// Evaluate one sub-expression to a value
    fn eval_sub(&mut self, scope: ValueId, node: &Rc<AstNode>, state: &mut ExecState) -> ValueId;

    /// The value arena backing this evaluation
    fn arena(&self) -> &ValueArena;

    /// Mutable access to the value arena
    fn arena_mut(&mut self) -> &mut ValueArena;

    /// The active interpreter configuration
    fn interp_config(&self) -> &InterpreterConfig;
}
