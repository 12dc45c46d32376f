//! quill-util - Core Utilities and Foundation Types
//!
//! ============================================================================
//! MODULE OVERVIEW
//! ============================================================================
//!
//! This crate provides the foundation types shared by every phase of the
//! Quill interpreter. They are deliberately small and dependency-light:
//! everything above (lexer, parser, resolver, evaluator, shell) builds
//! on them, so they must not pull the tower sideways.
//!
//! SOURCE POSITIONS:
//! -----------------
//! Every AST and core-IR node carries a [`Pos`] (file id, start and end
//! line/column, byte offsets), so that errors can be rendered with a
//! `raised at` trace back to the offending source range. A [`SourceMap`]
//! registers the interactive stream (`stdIn`) and every `use`d file and
//! maps a [`FileId`] back to a display name.
//!
//! STRING INTERNING:
//! -----------------
//! Identifiers, record labels, constructor names and exception tags
//! appear many times over a session. [`Symbol`] interns each distinct
//! spelling once in a global table, so comparison and hashing are O(1)
//! index operations and the trees stay compact. Interned strings live
//! for the whole session; the table only ever grows.
//!
//! RECORD LABEL ORDERING:
//! ----------------------
//! Record types and record values use one canonical label ordering
//! everywhere ([`Label`], [`LabelMap`]): numeric labels sort
//! numerically, all others lexicographically. Two record types are
//! equal iff their sorted label/type maps are equal, so the ordering is
//! part of the data model, not a presentation detail. A record whose
//! labels are exactly `1..n` is a tuple in disguise, which is why the
//! comparison must be numeric: `{10: a, 2: b}` orders `2` before `10`.
//!
//! DIAGNOSTICS:
//! ------------
//! Phases report through a shared [`Handler`]. Errors abort the current
//! statement; warnings (such as a nonexhaustive match) are reported and
//! evaluation continues. The REPL drains the handler after each
//! statement.

pub mod diagnostic;
pub mod label;
pub mod span;
pub mod symbol;

pub use diagnostic::{Diagnostic, Handler, Level};
pub use label::{Label, LabelMap};
pub use span::{FileId, Pos, SourceFile, SourceMap};
pub use symbol::Symbol;
