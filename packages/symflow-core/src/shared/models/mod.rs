//! Shared models

pub mod ast;
mod span;

pub use ast::{AstKind, AstNode, LitValue, NodeList};
pub use span::{Loc, Pos};
