//! Scoping - the Value/Scope addressing layer
//!
//! Translates AST reference expressions (Identifier, MemberAccess chains,
//! Literal-as-key, This/Super, tuples) into Values, reading or lazily
//! creating, and persists writes to the correct owning scope.
//!
//! The interpreter is total over this layer: missing bindings auto-vivify a
//! symbolic value rather than failing. An approximate analyzer must never
//! crash on partial or unknown code.

pub mod infrastructure;
pub mod ports;

pub use infrastructure::resolver::{
    def_scope, member_value, member_value_no_create, resolve_indices, save_var_in_current_scope,
    save_var_in_scope,
};
pub use ports::SubEvaluator;
