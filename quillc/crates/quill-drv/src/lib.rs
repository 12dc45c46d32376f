//! quill-drv - Session Orchestration and the REPL
//!
//! ============================================================================
//! DRIVER OVERVIEW
//! ============================================================================
//!
//! The driver is the entry point and orchestrator of the whole
//! pipeline. It owns the long-lived pieces of an interactive session -
//! the type registry, the environment chain, the overload and instance
//! tables, the source map, the compiled-statement cache - and threads
//! each statement through the phases:
//!
//! ```text
//! text -> parse -> resolve types -> lower -> evaluate -> publish
//! ```
//!
//! STATEMENT PIPELINE:
//! -------------------
//! [`Session::prepare_statement`] runs the compile half and returns the
//! compiled statement together with any warnings (the newer, tracer-free
//! shape of the contract); [`Session::execute`] adds evaluation,
//! binding publication and the statement cache. All declarations inside
//! one statement evaluate strictly before any binding is published to
//! the outer environment.
//!
//! ERROR HANDLING:
//! ---------------
//! Parse, type and lowering errors abort the statement leaving the
//! environment untouched; runtime exceptions are caught, rendered with
//! their `raised at` trace, and leave the environment untouched as
//! well. Warnings are printed and do not abort.
//!
//! The shell, the CLI and the configuration file live in their own
//! modules; the `quill` binary is a thin wrapper over [`shell::Shell`].

pub mod cache;
pub mod config;
pub mod session;
pub mod shell;

pub use config::Config;
pub use session::{PrintedBinding, Session, SessionError, StatementOutcome};
pub use shell::Shell;
