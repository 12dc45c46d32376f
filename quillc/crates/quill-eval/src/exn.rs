//! Exception values and the unwinding effect.
//!
//! Exceptions are ordinary values of a distinguished sum: a tag plus an
//! optional payload. The evaluator models the unwinding effect with
//! `Result`: every evaluation returns either a value or a [`Raise`]
//! carrying the exception and the positions it passed on the way out.
//! The REPL prints the result as
//! `uncaught exception Bind raised at: stdIn:1.5-1.9`.

use crate::value::Value;
use quill_util::{Pos, Symbol};
use std::fmt;

/// An exception value
#[derive(Debug, Clone)]
pub struct ExnValue {
    pub tag: Symbol,
    pub payload: Option<Value>,
}

impl fmt::Display for ExnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "{} {}", self.tag, payload),
            None => write!(f, "{}", self.tag),
        }
    }
}

/// An in-flight exception: the value plus its position chain
///
/// `trace[0]` is the point of raise; later entries are call positions
/// recorded while unwinding.
#[derive(Debug, Clone)]
pub struct Raise {
    pub exn: ExnValue,
    pub trace: Vec<Pos>,
}

impl Raise {
    pub fn new(tag: &str, pos: Pos) -> Self {
        Self {
            exn: ExnValue {
                tag: Symbol::intern(tag),
                payload: None,
            },
            trace: vec![pos],
        }
    }

    pub fn with_payload(tag: &str, payload: Value, pos: Pos) -> Self {
        Self {
            exn: ExnValue {
                tag: Symbol::intern(tag),
                payload: Some(payload),
            },
            trace: vec![pos],
        }
    }

    /// `Fail s`, the user-raisable failure
    pub fn fail(message: &str, pos: Pos) -> Self {
        Self::with_payload("Fail", Value::str(message), pos)
    }

    /// Record a call position while unwinding
    pub fn traced(mut self, pos: Pos) -> Self {
        self.trace.push(pos);
        self
    }

    /// The position of the original raise
    pub fn raised_at(&self) -> Pos {
        self.trace.first().copied().unwrap_or(Pos::DUMMY)
    }
}

impl fmt::Display for Raise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uncaught exception {}", self.exn)
    }
}

/// Every evaluation either produces a value or unwinds
pub type EvalResult = Result<Value, Raise>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_payload() {
        let raise = Raise::new("Bind", Pos::DUMMY);
        assert_eq!(raise.to_string(), "uncaught exception Bind");
    }

    #[test]
    fn test_display_with_payload() {
        let raise = Raise::fail("boom", Pos::DUMMY);
        assert_eq!(raise.to_string(), "uncaught exception Fail \"boom\"");
    }

    #[test]
    fn test_trace_accumulates() {
        let origin = Pos::new(0, 1, 1, 1, 1, 2);
        let call = Pos::new(5, 9, 2, 1, 2, 5);
        let raise = Raise::new("Div", origin).traced(call);
        assert_eq!(raise.raised_at(), origin);
        assert_eq!(raise.trace.len(), 2);
    }
}
