//! quill-dl - The Datalog Frontend
//!
//! ============================================================================
//! DEDUCTIVE FRONTEND OVERVIEW
//! ============================================================================
//!
//! A deductive-query surface over the Quill pipeline. A Datalog program
//! is parsed ([`parser`]), checked ([`analyze`]) and translated
//! ([`translate`]) into one Quill `let` expression that the ordinary
//! resolve/lower/evaluate pipeline executes; the frontend itself never
//! evaluates anything.
//!
//! ANALYSIS:
//! ---------
//! Before translation every program is checked for: declared relations
//! with matching arity and column types, ground facts, rule safety
//! (head variables and variables under negation or in comparisons must
//! occur in a positive body atom), and stratification (no negated edge
//! inside a dependency cycle - the classic guarantee that negation has
//! a well-defined meaning).
//!
//! EVALUATION STRATEGY:
//! --------------------
//! Recursive relations iterate with the `fixpoint` combinator using
//! semi-naive evaluation: each round applies the rules with the
//! previous round's frontier substituted for one recursive occurrence
//! at a time, so already-derived rows are not re-derived. The union is
//! monotone - it only ever grows - and terminates on finite inputs.

pub mod analyze;
pub mod ast;
pub mod parser;
pub mod translate;

pub use analyze::{analyze, Analysis};
pub use parser::parse_program;
pub use translate::translate;

use quill_util::{FileId, Pos, Symbol};
use std::path::Path;
use thiserror::Error;

/// Errors from parsing, analysis or translation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatalogError {
    #[error("{message}")]
    Parse { message: String, pos: Pos },

    #[error("relation {relation} is not declared")]
    UndeclaredRelation { relation: Symbol, pos: Pos },

    #[error("relation {relation} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        relation: Symbol,
        expected: usize,
        actual: usize,
        pos: Pos,
    },

    #[error("in {relation}, column {param} expects {expected}, got {actual}")]
    ColumnTypeMismatch {
        relation: Symbol,
        param: Symbol,
        expected: &'static str,
        actual: &'static str,
        pos: Pos,
    },

    #[error("fact for {relation} contains a non-constant argument")]
    NonGroundFact { relation: Symbol, pos: Pos },

    #[error("unsafe rule for {relation}: variable {var} does not occur in a positive atom")]
    UnsafeRule {
        relation: Symbol,
        var: Symbol,
        pos: Pos,
    },

    #[error("Program is not stratified")]
    NotStratified { relation: Symbol },

    #[error("mutually recursive relations are not supported: {relations:?}")]
    MutualRecursion { relations: Vec<Symbol> },

    #[error("cannot read {path}: {message}")]
    Io {
        path: String,
        message: String,
        pos: Pos,
    },

    #[error("{path}:{line}: {message}")]
    CsvFormat {
        path: String,
        line: usize,
        message: String,
        pos: Pos,
    },
}

impl DatalogError {
    pub fn pos(&self) -> Pos {
        match self {
            DatalogError::Parse { pos, .. }
            | DatalogError::UndeclaredRelation { pos, .. }
            | DatalogError::ArityMismatch { pos, .. }
            | DatalogError::ColumnTypeMismatch { pos, .. }
            | DatalogError::NonGroundFact { pos, .. }
            | DatalogError::UnsafeRule { pos, .. }
            | DatalogError::Io { pos, .. }
            | DatalogError::CsvFormat { pos, .. } => *pos,
            DatalogError::NotStratified { .. } | DatalogError::MutualRecursion { .. } => {
                Pos::DUMMY
            }
        }
    }
}

/// Parse, analyze and translate a program in one call
///
/// The result is a Quill expression ready for the normal pipeline;
/// `base_dir` anchors `.input` file paths.
pub fn compile_program(
    source: &str,
    file_id: FileId,
    base_dir: &Path,
) -> Result<quill_par::ast::Expr, DatalogError> {
    let program = parse_program(source, file_id)?;
    let analysis = analyze(&program)?;
    translate(&analysis, base_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Lowerer;
    use quill_eval::builtins;
    use quill_eval::rel::NoopAdapter;
    use quill_eval::{value_eq, Binding, Env, Evaluator, InstanceTable, Value};
    use quill_par::ast::Statement;
    use quill_sem::{EnvEntry, OverloadTable, TypeResolver};
    use quill_typ::TypeRegistry;
    use quill_util::{Handler, Label};
    use rustc_hash::FxHashMap;

    /// Compile a Datalog program and run the translated expression
    /// through the full pipeline
    fn run_datalog(source: &str, base_dir: &Path) -> Value {
        let exp = compile_program(source, FileId::STDIN, base_dir)
            .unwrap_or_else(|e| panic!("datalog error: {}", e));
        let stmt = Statement::Expr(exp);

        let mut registry = TypeRegistry::new();
        let mut overloads = OverloadTable::new();
        let mut globals = FxHashMap::default();
        let mut env_bindings = Vec::new();
        for (name, scheme, value) in builtins::basis(&mut registry) {
            globals.insert(name, EnvEntry::var(scheme.clone()));
            env_bindings.push(Binding {
                name,
                scheme,
                value,
            });
        }
        let env = Env::empty().extend(env_bindings);

        let tstmt = {
            let mut resolver = TypeResolver::new(&mut registry, &globals, &mut overloads);
            resolver
                .resolve_statement(&stmt)
                .unwrap_or_else(|e| panic!("type error: {}", e))
        };
        let handler = Handler::new();
        let core = {
            let mut lowerer = Lowerer::new(&mut registry, &handler);
            lowerer
                .lower_statement(&tstmt)
                .unwrap_or_else(|e| panic!("lower error: {}", e))
        };
        let adapter = NoopAdapter;
        let instances = InstanceTable::new();
        let evaluator = Evaluator::new(&registry, &adapter, &instances);
        let mut scratch = env;
        for decl in &core.decls {
            scratch = evaluator
                .eval_decl(decl, &scratch)
                .unwrap_or_else(|e| panic!("eval raised {}", e));
        }
        scratch
            .lookup_value(quill_util::symbol::SYM_IT)
            .expect("datalog result bound to it")
    }

    fn edge_record(x: i64, y: i64) -> Value {
        Value::record(
            [
                (Label::from("x"), Value::Int(x)),
                (Label::from("y"), Value::Int(y)),
            ]
            .into_iter()
            .collect(),
        )
    }

    /// Multiset equality over the `path` field of the output record
    fn assert_set_equal(actual: &Value, expected: &[Value]) {
        let items = match actual.deref() {
            Value::List(items) => items.as_ref().clone(),
            Value::Bag(items) => items.as_ref().clone(),
            other => panic!("expected a collection, got {:?}", other),
        };
        assert_eq!(items.len(), expected.len(), "cardinality of {:?}", items);
        for e in expected {
            assert!(
                items.iter().any(|v| value_eq(v, e)),
                "missing {:?} in {:?}",
                e,
                items
            );
        }
    }

    #[test]
    fn test_fact_only_relation() {
        let v = run_datalog(
            "edge(x: int, y: int).\nedge(1, 2).\nedge(2, 3).\n.output edge.",
            Path::new("."),
        );
        let edges = match v.deref() {
            Value::Record(fields) => fields.get_str("edge").unwrap().clone(),
            other => panic!("expected record, got {:?}", other),
        };
        assert_set_equal(&edges, &[edge_record(1, 2), edge_record(2, 3)]);
    }

    #[test]
    fn test_transitive_closure() {
        let source = "edge(x: int, y: int).\n\
                      path(x: int, y: int).\n\
                      edge(1, 2).\n\
                      edge(2, 3).\n\
                      path(X, Y) :- edge(X, Y).\n\
                      path(X, Z) :- path(X, Y), edge(Y, Z).\n\
                      .output path.";
        let v = run_datalog(source, Path::new("."));
        let paths = match v.deref() {
            Value::Record(fields) => fields.get_str("path").unwrap().clone(),
            other => panic!("expected record, got {:?}", other),
        };
        assert_set_equal(
            &paths,
            &[edge_record(1, 2), edge_record(2, 3), edge_record(1, 3)],
        );
    }

    #[test]
    fn test_longer_chain_closure() {
        let source = "edge(x: int, y: int).\n\
                      path(x: int, y: int).\n\
                      edge(1, 2).\nedge(2, 3).\nedge(3, 4).\nedge(4, 5).\n\
                      path(X, Y) :- edge(X, Y).\n\
                      path(X, Z) :- path(X, Y), edge(Y, Z).\n\
                      .output path.";
        let v = run_datalog(source, Path::new("."));
        let paths = match v.deref() {
            Value::Record(fields) => fields.get_str("path").unwrap().clone(),
            other => panic!("expected record, got {:?}", other),
        };
        // 4 + 3 + 2 + 1 pairs.
        match paths.deref() {
            Value::List(items) => assert_eq!(items.len(), 10),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_negation() {
        let source = "node(x: int).\nblocked(x: int).\nok(x: int).\n\
                      node(1).\nnode(2).\nnode(3).\nblocked(2).\n\
                      ok(X) :- node(X), !blocked(X).\n\
                      .output ok.";
        let v = run_datalog(source, Path::new("."));
        let ok = match v.deref() {
            Value::Record(fields) => fields.get_str("ok").unwrap().clone(),
            other => panic!("expected record, got {:?}", other),
        };
        let node = |x: i64| {
            Value::record([(Label::from("x"), Value::Int(x))].into_iter().collect())
        };
        assert_set_equal(&ok, &[node(1), node(3)]);
    }

    #[test]
    fn test_comparison_and_arithmetic() {
        let source = "num(x: int).\nbig(x: int).\n\
                      num(1).\nnum(5).\nnum(10).\n\
                      big(X) :- num(X), X > 2 + 2.\n\
                      .output big.";
        let v = run_datalog(source, Path::new("."));
        let big = match v.deref() {
            Value::Record(fields) => fields.get_str("big").unwrap().clone(),
            other => panic!("expected record, got {:?}", other),
        };
        let num = |x: i64| {
            Value::record([(Label::from("x"), Value::Int(x))].into_iter().collect())
        };
        assert_set_equal(&big, &[num(5), num(10)]);
    }

    #[test]
    fn test_repeated_variable_in_atom() {
        let source = "edge(x: int, y: int).\nloop(x: int).\n\
                      edge(1, 1).\nedge(1, 2).\nedge(3, 3).\n\
                      loop(X) :- edge(X, X).\n\
                      .output loop.";
        let v = run_datalog(source, Path::new("."));
        let loops = match v.deref() {
            Value::Record(fields) => fields.get_str("loop").unwrap().clone(),
            other => panic!("expected record, got {:?}", other),
        };
        let node = |x: i64| {
            Value::record([(Label::from("x"), Value::Int(x))].into_iter().collect())
        };
        assert_set_equal(&loops, &[node(1), node(3)]);
    }

    #[test]
    fn test_csv_input() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("edges.csv"), "1,2\n2,3\n").unwrap();
        let source = "edge(x: int, y: int).\n\
                      .input edge \"edges.csv\".\n\
                      .output edge.";
        let v = run_datalog(source, dir.path());
        let edges = match v.deref() {
            Value::Record(fields) => fields.get_str("edge").unwrap().clone(),
            other => panic!("expected record, got {:?}", other),
        };
        assert_set_equal(&edges, &[edge_record(1, 2), edge_record(2, 3)]);
    }

    #[test]
    fn test_csv_missing_file_is_io_error() {
        let source = "edge(x: int, y: int).\n.input edge \"nope.csv\".";
        let err = compile_program(source, FileId::STDIN, Path::new("/nonexistent-base"))
            .unwrap_err();
        assert!(matches!(err, DatalogError::Io { .. }));
    }

    #[test]
    fn test_csv_bad_column_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("edges.csv"), "1,two\n").unwrap();
        let source = "edge(x: int, y: int).\n.input edge \"edges.csv\".";
        let err = compile_program(source, FileId::STDIN, dir.path()).unwrap_err();
        assert!(matches!(err, DatalogError::CsvFormat { .. }));
    }

    #[test]
    fn test_non_stratified_produces_no_translation() {
        let source = "p(x: int).\nq(x: int).\nn(x: int).\n\
                      p(X) :- n(X), !q(X).\n\
                      q(X) :- n(X), !p(X).";
        let err = compile_program(source, FileId::STDIN, Path::new(".")).unwrap_err();
        assert_eq!(err.to_string(), "Program is not stratified");
    }

    #[test]
    fn test_monotone_growth() {
        // all_k is a subset of all_{k+1}: the closure contains every
        // single-step edge.
        let source = "edge(x: int, y: int).\npath(x: int, y: int).\n\
                      edge(1, 2).\nedge(2, 3).\n\
                      path(X, Y) :- edge(X, Y).\n\
                      path(X, Z) :- path(X, Y), edge(Y, Z).\n\
                      .output path.\n.output edge.";
        let v = run_datalog(source, Path::new("."));
        let (paths, edges) = match v.deref() {
            Value::Record(fields) => (
                fields.get_str("path").unwrap().clone(),
                fields.get_str("edge").unwrap().clone(),
            ),
            other => panic!("expected record, got {:?}", other),
        };
        let path_items = match paths.deref() {
            Value::List(items) => items.as_ref().clone(),
            other => panic!("expected list, got {:?}", other),
        };
        let edge_items = match edges.deref() {
            Value::List(items) => items.as_ref().clone(),
            other => panic!("expected list, got {:?}", other),
        };
        for e in &edge_items {
            assert!(path_items.iter().any(|p| value_eq(p, e)));
        }
    }
}
