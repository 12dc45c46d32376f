//! Type-resolution errors.
//!
//! Every error carries the position of the expression or pattern that
//! produced it. Nonexhaustive matches are deliberately *not* here: they
//! are warnings, reported through the diagnostic handler during
//! lowering, and never abort a statement.

use quill_util::{Pos, Symbol};
use thiserror::Error;

/// An error found while resolving types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("unbound variable or constructor: {0}")]
    UnboundId(Symbol, Pos),

    #[error("unbound type: {0}")]
    UnboundType(Symbol, Pos),

    #[error("type mismatch: expected {expected}, actual {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        pos: Pos,
    },

    #[error("type {name} expects {expected} type argument(s), got {actual}")]
    TypeArityMismatch {
        name: Symbol,
        expected: usize,
        actual: usize,
        pos: Pos,
    },

    #[error("constructor {0} used with wrong number of arguments")]
    ConstructorArityMismatch(Symbol, Pos),

    #[error("{0} is not a constructor")]
    NotAConstructor(Symbol, Pos),

    #[error("clauses of {0} differ in number of arguments")]
    ClauseArityMismatch(Symbol, Pos),

    #[error("no field {field} in type {ty}")]
    NoSuchField {
        field: String,
        ty: String,
        pos: Pos,
    },

    #[error("unresolved type variable; add a type annotation")]
    UnguardedTypevar(Pos),

    #[error("match redundant")]
    RedundantMatch(Pos),

    #[error("{0} is not an overloaded name")]
    NotOverloaded(Symbol, Pos),

    #[error("no instance of {name} matches type {ty}")]
    NoMatchingInstance {
        name: Symbol,
        ty: String,
        pos: Pos,
    },

    #[error("recursive binding must be a function")]
    IllegalRecBinding(Pos),

    #[error("step not allowed here: {0}")]
    MisplacedStep(String, Pos),
}

impl TypeError {
    pub fn pos(&self) -> Pos {
        match self {
            TypeError::UnboundId(_, pos)
            | TypeError::UnboundType(_, pos)
            | TypeError::TypeMismatch { pos, .. }
            | TypeError::TypeArityMismatch { pos, .. }
            | TypeError::ConstructorArityMismatch(_, pos)
            | TypeError::NotAConstructor(_, pos)
            | TypeError::ClauseArityMismatch(_, pos)
            | TypeError::NoSuchField { pos, .. }
            | TypeError::UnguardedTypevar(pos)
            | TypeError::RedundantMatch(pos)
            | TypeError::NotOverloaded(_, pos)
            | TypeError::NoMatchingInstance { pos, .. }
            | TypeError::IllegalRecBinding(pos)
            | TypeError::MisplacedStep(_, pos) => *pos,
        }
    }
}
