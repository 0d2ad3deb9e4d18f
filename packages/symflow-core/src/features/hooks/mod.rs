//! Hooks - the checker-plugin dispatch protocol
//!
//! Security logic never lives in the engine: checkers observe interpretation
//! through a fixed vocabulary of hook points and may mutate Values (taint
//! stamping) or append entry points, but never steer control flow - with one
//! exception, the compile-unit short-circuit.

pub mod infrastructure;
pub mod ports;

pub use infrastructure::dispatcher::HookDispatcher;
pub use ports::{
    AssignInfo, BinaryInfo, CallInfo, Checker, EntryPoint, HookPoint, NewInfo,
};
