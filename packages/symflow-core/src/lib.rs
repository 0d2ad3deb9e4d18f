/*
 * Symflow Core - Abstract Interpretation Engine for Taint Analysis
 *
 * Feature-First Hexagonal Architecture:
 * - shared/      : Common models (unified AST, source spans)
 * - features/    : Vertical slices (value_store → scoping → branch_state → interpreter → hooks)
 * - pipeline/    : Orchestration (entry-point execution driver)
 *
 * The engine walks a unified AST handed over by per-language front-ends and
 * simulates execution over symbolic values, tracking data provenance so
 * checker plugins can detect source → sink flows. It is deliberately
 * best-effort: bounded iteration, approximate merging, and total over
 * partial or unknown code.
 */

// Crate-level lint configuration
#![allow(dead_code)] // Some accessors reserved for checker-facing API
#![allow(clippy::too_many_arguments)] // Hook trigger signatures are fixed by contract
#![allow(clippy::type_complexity)] // Complex types are necessary for analysis
#![allow(clippy::collapsible_if)] // Readability over brevity
#![allow(clippy::collapsible_else_if)] // else if clarity
#![allow(clippy::new_without_default)] // Default impl not always needed
#![allow(clippy::upper_case_acronyms)] // BVT naming

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Shared models and utilities
pub mod shared;

/// Feature modules (vertical slices)
pub mod features;

/// Configuration system
pub mod config;

/// Unified error handling
pub mod errors;

/// Analysis orchestration
pub mod pipeline;

// ═══════════════════════════════════════════════════════════════════════════
// Public API Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{InterpreterConfig, Preset, UnionMergeLevel};
pub use errors::{Result, SymflowError};
pub use features::branch_state::{ExecState, ExitKind};
pub use features::hooks::{
    AssignInfo, BinaryInfo, CallInfo, Checker, EntryPoint, HookDispatcher, HookPoint, NewInfo,
};
pub use features::interpreter::Interpreter;
pub use features::value_store::{
    has_tag_rec, propagate_taint, stamp_taint, Prim, TraceStep, VKind, Value, ValueArena, ValueId,
};
pub use pipeline::{AnalysisDriver, AnalysisReport};
pub use shared::models::{AstKind, AstNode, Loc, Pos};
