//! Analysis orchestration
//!
//! The driver owns the analysis lifecycle: analyze-start, one pass over the
//! compile units (honoring the compile-unit short-circuit), then draining
//! the entry-point list - checkers may keep appending entry points while the
//! list drains - and analyze-end.

use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::{debug, warn};

use crate::features::branch_state::ExecState;
use crate::features::hooks::EntryPoint;
use crate::features::interpreter::Interpreter;
use crate::features::value_store::ValueId;
use crate::shared::models::AstNode;

/// Upper bound on drained entry points; a checker that keeps appending must
/// not wedge the run
const ENTRY_POINT_DRAIN_CAP: usize = 10_000;

/// Summary of one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub compile_units: usize,
    pub entry_points_run: usize,
    pub instructions: u64,
    pub aborted: bool,
}

/// Entry-point execution driver
#[derive(Debug, Default)]
pub struct AnalysisDriver;

impl AnalysisDriver {
    pub fn new() -> Self {
        Self
    }

    /// Run the full lifecycle over the given compile units
    pub fn run(&self, interp: &mut Interpreter, units: &[Rc<AstNode>]) -> AnalysisReport {
        let hooks = Rc::clone(&interp.hooks);
        hooks.check_at_analyze_start(interp);

        for unit in units {
            let mut state = ExecState::new();
            let top = interp.top_scope;
            let skip = hooks.check_at_compile_unit_start(interp, top, unit, &mut state);
            if skip {
                debug!("compile unit skipped by checker short-circuit");
            } else {
                interp.process_instruction(top, unit, &mut state);
            }
            hooks.check_at_compile_unit_end(interp, top, unit, &mut state);
        }

        let mut entry_points_run = 0usize;
        while let Some(ep) = interp.take_next_entry_point() {
            if entry_points_run >= ENTRY_POINT_DRAIN_CAP {
                warn!(cap = ENTRY_POINT_DRAIN_CAP, "entry-point drain cap reached; stopping");
                break;
            }
            if interp.aborted() {
                break;
            }
            entry_points_run += 1;
            hooks.check_at_entry_point_before(interp, &ep);
            let ret = Self::invoke_entry_point(interp, &ep);
            hooks.check_at_entry_point_after(interp, &ep, ret);
        }

        hooks.check_at_analyze_end(interp);

        AnalysisReport {
            compile_units: units.len(),
            entry_points_run,
            instructions: interp.executed(),
            aborted: interp.aborted(),
        }
    }

    /// "Invoke this function as if called with these arguments from this
    /// scope."
    fn invoke_entry_point(interp: &mut Interpreter, ep: &EntryPoint) -> ValueId {
        let mut state = ExecState::new();
        let call_node = AstNode::call(AstNode::ident(ep.function_name.clone()), Vec::new());

        let fclos = match ep.entry_point_sym_val {
            Some(v) => v,
            None => {
                let ident = AstNode::ident(ep.function_name.clone());
                interp.resolve(ep.scope, &ident, &mut state)
            }
        };

        match interp.execute_call(fclos, None, &ep.arg_values, &call_node, ep.scope, &mut state) {
            Ok(ret) => ret,
            Err(err) => {
                warn!(
                    entry_point = %ep.function_name,
                    error = %err,
                    "entry point failed; continuing"
                );
                interp.arena.undefined()
            }
        }
    }
}
