//! Interpreter configuration
//!
//! The engine accepts every policy knob as injected configuration, never as a
//! hardcoded constant. Progressive disclosure:
//! - Preset (most users): `InterpreterConfig::preset(Preset::Balanced)`
//! - Field override (some users): mutate the struct before handing it over
//!
//! Every bound here is a precision/performance heuristic, not a guaranteed
//! correct threshold. Tune per deployment.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SymflowError};

/// Analysis presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    /// Shallow bounds, small caps - quick scans of large trees
    Fast,
    /// Default precision/performance balance
    Balanced,
    /// Deep bounds, large caps - audit runs
    Thorough,
}

/// Union merge strategy level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnionMergeLevel {
    /// Deduplicate by identity and primitive equality only
    #[default]
    Precise,
    /// Additionally collapse same-kind primitives into one symbolic member
    Coarse,
}

/// Interpreter policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Invoke closure arguments passed to unresolved library calls
    pub invoke_unresolved_callbacks: bool,

    /// Record caller → callee edges during interpretation
    pub build_call_graph: bool,

    /// Union merge strategy
    pub union_merge_level: UnionMergeLevel,

    /// Maximum members kept in one union value (1..=1000, silently capped)
    pub union_limit: usize,

    /// Maximum parent hops when resolving a name to its defining scope (1..=64)
    pub scope_hop_limit: usize,

    /// Loop bodies are unrolled this many passes instead of run to fixpoint (1..=16)
    pub loop_pass_limit: usize,

    /// Concrete collections iterate at most this many elements (1..=10000)
    pub collection_iter_cap: usize,

    /// A closure already on the call stack this many times is not re-entered (1..=32)
    pub reentry_limit: usize,

    /// Prototype clone depth during object construction (1..=32)
    pub clone_depth_limit: usize,

    /// Depth cap for merge walks over the shared value graph (1..=256)
    pub merge_walk_depth: usize,

    /// Abort interpretation after this many dispatched instructions
    pub instruction_budget: Option<u64>,

    /// Abort interpretation after this many milliseconds
    pub deadline_ms: Option<u64>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::preset(Preset::Balanced)
    }
}

impl InterpreterConfig {
    /// Build a configuration from a preset
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => Self {
                invoke_unresolved_callbacks: false,
                build_call_graph: false,
                union_merge_level: UnionMergeLevel::Coarse,
                union_limit: 8,
                scope_hop_limit: 20,
                loop_pass_limit: 1,
                collection_iter_cap: 10,
                reentry_limit: 1,
                clone_depth_limit: 4,
                merge_walk_depth: 24,
                instruction_budget: Some(200_000),
                deadline_ms: None,
            },
            Preset::Balanced => Self {
                invoke_unresolved_callbacks: true,
                build_call_graph: false,
                union_merge_level: UnionMergeLevel::Precise,
                union_limit: 20,
                scope_hop_limit: 20,
                loop_pass_limit: 2,
                collection_iter_cap: 30,
                reentry_limit: 2,
                clone_depth_limit: 6,
                merge_walk_depth: 24,
                instruction_budget: None,
                deadline_ms: None,
            },
            Preset::Thorough => Self {
                invoke_unresolved_callbacks: true,
                build_call_graph: true,
                union_merge_level: UnionMergeLevel::Precise,
                union_limit: 40,
                scope_hop_limit: 32,
                loop_pass_limit: 3,
                collection_iter_cap: 100,
                reentry_limit: 3,
                clone_depth_limit: 10,
                merge_walk_depth: 48,
                instruction_budget: None,
                deadline_ms: None,
            },
        }
    }

    /// Range-check every bound
    pub fn validate(&self) -> Result<()> {
        fn check(name: &str, value: usize, lo: usize, hi: usize) -> Result<()> {
            if value < lo || value > hi {
                return Err(SymflowError::config(format!(
                    "{name} must be in {lo}..={hi}, got {value}"
                )));
            }
            Ok(())
        }

        check("union_limit", self.union_limit, 1, 1000)?;
        check("scope_hop_limit", self.scope_hop_limit, 1, 64)?;
        check("loop_pass_limit", self.loop_pass_limit, 1, 16)?;
        check("collection_iter_cap", self.collection_iter_cap, 1, 10_000)?;
        check("reentry_limit", self.reentry_limit, 1, 32)?;
        check("clone_depth_limit", self.clone_depth_limit, 1, 32)?;
        check("merge_walk_depth", self.merge_walk_depth, 1, 256)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for preset in [Preset::Fast, Preset::Balanced, Preset::Thorough] {
            assert!(InterpreterConfig::preset(preset).validate().is_ok());
        }
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut config = InterpreterConfig::default();
        config.union_limit = 0;
        assert!(config.validate().is_err());

        config = InterpreterConfig::default();
        config.loop_pass_limit = 99;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let config: InterpreterConfig = serde_json::from_str(r#"{"union_limit": 5}"#).unwrap();
        assert_eq!(config.union_limit, 5);
        assert_eq!(config.loop_pass_limit, 2); // Balanced default
    }
}
