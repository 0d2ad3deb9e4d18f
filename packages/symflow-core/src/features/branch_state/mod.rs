//! Branch State - path-sensitive fork/merge
//!
//! Cloning the whole heap at every conditional is exponential under nesting.
//! Forking is instead a data-structure operation: a child state extends a
//! branch-path label, and a write under a still-open branch materializes a
//! Branch Value Tree (BVT) node at just the written field, leaving the
//! pre-branch value visible to sibling branches. The join point walks the
//! touched structure and collapses every BVT recorded by that fork into a
//! single union, in place.

pub mod domain;
pub mod infrastructure;

pub use domain::state::{CallFrame, ExecState, ExitInfo, ExitKind, ForkRecord, PathCond};
pub use infrastructure::fork::{fork_states, load_forked_value, write_value};
pub use infrastructure::merge::{merge_forked_values, union_values};
