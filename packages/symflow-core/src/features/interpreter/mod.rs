//! Interpreter - the AST-dispatch core
//!
//! Recursively evaluates unified-AST nodes into symbolic values given
//! `(scope, node, state)`, threading the lexical environment and path/call
//! context, and firing checker hooks at the fixed points.
//!
//! The interpreter is total: unknown node kinds degrade to opaque symbols,
//! unresolved bindings auto-vivify, unresolved callees fall back to
//! best-effort taint pass-through, and a failing node handler is logged and
//! replaced by Undefined. There is no fatal-error surface.

pub mod infrastructure;

pub use infrastructure::calls::{PropagationKind, PropagationRule, PropagationRuleSet};
pub use infrastructure::dispatch::{CallEdge, Interpreter, NativeFn};
