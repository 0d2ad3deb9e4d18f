//! Value Store - the symbolic value model
//!
//! Every runtime quantity the interpreter manipulates is a [`Value`] held in
//! a [`ValueArena`] and addressed by [`ValueId`]. Scope/value graphs are
//! cyclic by design (parent back-references, self-referential unions) and
//! shared by reference across forked states, so all links are arena indices
//! and every traversal is visited-set guarded.

pub mod domain;

pub use domain::arena::ValueArena;
pub use domain::taint::{has_tag_rec, propagate_taint, stamp_taint, TraceStep};
pub use domain::value::{
    BvtData, ClassData, ClosureData, Prim, ScopeKind, VKind, Value, ValueId,
};
