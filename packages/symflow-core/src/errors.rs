//! Error types for symflow-core
//!
//! Provides unified error handling across the crate.
//!
//! The interpreter itself never aborts on malformed input: node-handler and
//! checker failures are recoverable, logged, and replaced by degraded values.
//! These variants exist so the failure sites can report *what* degraded.

use thiserror::Error;

use crate::shared::models::Loc;

/// Main error type for symflow-core operations
#[derive(Debug, Error)]
pub enum SymflowError {
    /// A single node handler failed; the node is replaced by Undefined
    #[error("node handler error at {loc}: {message}")]
    NodeHandler {
        /// Source location of the failing node (best effort)
        loc: String,
        /// What went wrong
        message: String,
    },

    /// A single checker trigger failed; remaining checkers still run
    #[error("checker '{checker}' failed: {message}")]
    Checker {
        /// Stable checker identifier
        checker: String,
        /// What went wrong
        message: String,
    },

    /// The caller-supplied instruction budget or deadline was exhausted
    #[error("analysis budget exhausted after {executed} instructions")]
    BudgetExhausted {
        /// Instructions dispatched before the abort
        executed: u64,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed AST input (front-end contract violation)
    #[error("malformed AST: {0}")]
    MalformedAst(String),
}

impl SymflowError {
    /// Create a node-handler error from a source location
    pub fn node_handler(loc: Option<&Loc>, message: impl Into<String>) -> Self {
        SymflowError::NodeHandler {
            loc: loc.map(|l| l.to_string()).unwrap_or_else(|| "<unknown>".to_string()),
            message: message.into(),
        }
    }

    /// Create a checker error
    pub fn checker(checker: impl Into<String>, message: impl Into<String>) -> Self {
        SymflowError::Checker {
            checker: checker.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        SymflowError::Config(msg.into())
    }
}

/// Result type alias for symflow operations
pub type Result<T> = std::result::Result<T, SymflowError>;
