//! quill-core - Core IR and Lowering
//!
//! ============================================================================
//! LOWERING OVERVIEW
//! ============================================================================
//!
//! The typed, desugared intermediate representation the evaluator
//! executes, and the lowering resolver that produces it from the typed
//! AST. Lowering keeps types and positions on every node while
//! flattening the surface conveniences away: after it runs, the only
//! branching construct is an n-ary `case`, every function takes exactly
//! one parameter, and every infix operator is an application of a named
//! builtin.
//!
//! MODULE LAYOUT:
//! --------------
//! - [`ir`]: the core node set (`Lit`, `Id`, `Fn`, `Apply`, `Let`,
//!   `Case`, `Tuple`, `Record`, `From`, ...).
//! - [`lower`]: the desugaring rules, from `fun` clause compilation
//!   down to `exists`/`forall` rewriting.
//! - [`matches`]: the pattern-matrix usefulness analysis behind
//!   redundant-arm errors and nonexhaustive-match warnings.
//!
//! LIFECYCLE:
//! ----------
//! The surface AST is dropped once lowering completes; a
//! `CoreStatement` is what the statement cache retains.

pub mod ir;
pub mod lower;
pub mod matches;

pub use ir::*;
pub use lower::{LowerError, Lowerer};
pub use matches::{analyze_arms, analyze_clause_rows, is_irrefutable, MatchAnalysis};

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::lower::Lowerer;
    use quill_par::Parser;
    use quill_sem::{EnvEntry, OverloadTable, TypeResolver};
    use quill_typ::TypeRegistry;
    use quill_util::{FileId, Handler, Symbol};
    use rustc_hash::FxHashMap;

    #[derive(Debug)]
    struct Lowered {
        stmt: CoreStatement,
        registry: TypeRegistry,
        handler: Handler,
    }

    fn lower(source: &str) -> Result<Lowered, crate::LowerError> {
        let mut registry = TypeRegistry::new();
        let mut overloads = OverloadTable::new();
        let globals = FxHashMap::<Symbol, EnvEntry>::default();
        let handler = Handler::new();
        let stmt = Parser::parse_single(source, FileId::STDIN).unwrap();
        let tstmt = {
            let mut resolver = TypeResolver::new(&mut registry, &globals, &mut overloads);
            resolver.resolve_statement(&stmt).unwrap()
        };
        let core = {
            let mut lowerer = Lowerer::new(&mut registry, &handler);
            lowerer.lower_statement(&tstmt)?
        };
        Ok(Lowered {
            stmt: core,
            registry,
            handler,
        })
    }

    fn first_exp(lowered: &Lowered) -> &CoreExpr {
        match &lowered.stmt.decls[0] {
            CoreDecl::NonRec { exp, .. } => exp,
            CoreDecl::Rec { binds } => &binds[0].1,
            CoreDecl::Datatype(_) => panic!("expected a value declaration"),
        }
    }

    #[test]
    fn test_fun_desugars_to_rec_fn() {
        let lowered = lower("fun add x y = x + y;").unwrap();
        match &lowered.stmt.decls[0] {
            CoreDecl::Rec { binds } => {
                assert_eq!(binds[0].0.as_str(), "add");
                // Curried: fn x => fn y => …
                match &binds[0].1.kind {
                    CoreKind::Fn { body, .. } => {
                        assert!(matches!(body.kind, CoreKind::Fn { .. }));
                    }
                    other => panic!("expected fn, got {:?}", other),
                }
            }
            other => panic!("expected rec, got {:?}", other),
        }
    }

    #[test]
    fn test_if_lowered_to_case() {
        let lowered = lower("val x = if true then 1 else 2;").unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::Case { arms, .. } => assert_eq!(arms.len(), 2),
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn test_andalso_shortcircuit_shape() {
        // The right operand must live in an arm body, not be
        // pre-evaluated.
        let lowered = lower("val x = true andalso false;").unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::Case { scrutinee, arms } => {
                assert!(matches!(scrutinee.kind, CoreKind::Lit(_)));
                assert_eq!(arms.len(), 2);
            }
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn test_arith_lowered_to_builtin_apply() {
        let lowered = lower("val x = 1 + 2;").unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::Apply(f, arg) => {
                assert!(
                    matches!(&f.kind, CoreKind::Id(name) if name.as_str() == "+"),
                    "callee should be the + builtin"
                );
                assert!(matches!(arg.kind, CoreKind::Tuple(_)));
            }
            other => panic!("expected apply, got {:?}", other),
        }
    }

    #[test]
    fn test_compose_expands_to_lambda() {
        let lowered =
            lower("val f = (fn x => x + 1) o (fn y => y * 2);").unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::Fn { body, .. } => {
                assert!(matches!(body.kind, CoreKind::Apply(_, _)));
            }
            other => panic!("expected fn, got {:?}", other),
        }
    }

    #[test]
    fn test_field_access_lowered_to_selector_apply() {
        let lowered = lower("val n = {id = 1}.id;").unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::Apply(f, _) => {
                assert!(matches!(f.kind, CoreKind::RecordSel(_)));
            }
            other => panic!("expected apply, got {:?}", other),
        }
    }

    #[test]
    fn test_record_update_copies_fields() {
        let lowered =
            lower("val e = {{id = 1, name = \"a\"} with id = 2};").unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::Let(decl, body) => {
                assert!(matches!(**decl, CoreDecl::NonRec { .. }));
                match &body.kind {
                    CoreKind::Record(fields) => assert_eq!(fields.len(), 2),
                    other => panic!("expected record, got {:?}", other),
                }
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_clause_fun_compiles_to_case_with_bind() {
        let lowered = lower("fun f 1 = 0;").unwrap();
        assert_eq!(lowered.handler.warning_count(), 1);
        match &lowered.stmt.decls[0] {
            CoreDecl::Rec { binds } => match &binds[0].1.kind {
                CoreKind::Fn { body, .. } => match &body.kind {
                    CoreKind::Case { arms, .. } => {
                        assert_eq!(arms.len(), 2);
                        assert!(matches!(
                            &arms[1].body.kind,
                            CoreKind::Raise(tag) if tag.as_str() == "Bind"
                        ));
                    }
                    other => panic!("expected case, got {:?}", other),
                },
                other => panic!("expected fn, got {:?}", other),
            },
            other => panic!("expected rec, got {:?}", other),
        }
    }

    #[test]
    fn test_exhaustive_fun_has_no_bind_arm() {
        let lowered = lower("fun f 0 = 1 | f _ = 0;").unwrap();
        assert_eq!(lowered.handler.warning_count(), 0);
        match &lowered.stmt.decls[0] {
            CoreDecl::Rec { binds } => match &binds[0].1.kind {
                CoreKind::Fn { body, .. } => match &body.kind {
                    CoreKind::Case { arms, .. } => assert_eq!(arms.len(), 2),
                    other => panic!("expected case, got {:?}", other),
                },
                other => panic!("expected fn, got {:?}", other),
            },
            other => panic!("expected rec, got {:?}", other),
        }
    }

    #[test]
    fn test_redundant_match_is_an_error() {
        let err = lower("fun f _ = 1 | f 2 = 0;").unwrap_err();
        assert!(matches!(err, crate::LowerError::RedundantMatch(_)));
    }

    #[test]
    fn test_nonexhaustive_case_warns_without_extra_arm() {
        let lowered = lower("val x = case 1 of 2 => 0;").unwrap();
        assert_eq!(lowered.handler.warning_count(), 1);
        match &first_exp(&lowered).kind {
            CoreKind::Case { arms, .. } => assert_eq!(arms.len(), 1),
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn test_refutable_val_binding_warns() {
        let lowered = lower("val (1, x) = (1, 2);").unwrap();
        assert_eq!(lowered.handler.warning_count(), 1);
    }

    #[test]
    fn test_exists_gains_into_step() {
        let lowered = lower("val b = exists x in [1, 2] where x > 1;").unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::From(steps) => {
                assert!(matches!(
                    &steps.last().unwrap().kind,
                    CoreStepKind::Into(into) if matches!(
                        &into.kind,
                        CoreKind::Id(name) if name.as_str() == "nonEmpty"
                    )
                ));
            }
            other => panic!("expected from, got {:?}", other),
        }
    }

    #[test]
    fn test_forall_is_negated_exists() {
        let lowered = lower("val b = forall x in [1, 2] require x > 0;").unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::Apply(f, arg) => {
                assert!(matches!(&f.kind, CoreKind::Id(name) if name.as_str() == "not"));
                match &arg.kind {
                    CoreKind::From(steps) => {
                        // where (not cond), then into nonEmpty
                        assert!(matches!(
                            steps[steps.len() - 2].kind,
                            CoreStepKind::Where(_)
                        ));
                        assert!(matches!(
                            steps[steps.len() - 1].kind,
                            CoreStepKind::Into(_)
                        ));
                    }
                    other => panic!("expected from, got {:?}", other),
                }
            }
            other => panic!("expected apply, got {:?}", other),
        }
    }

    #[test]
    fn test_join_becomes_scan() {
        let lowered = lower(
            "val q = from x in [1] join y in [2] on x < y yield x + y;",
        )
        .unwrap();
        match &first_exp(&lowered).kind {
            CoreKind::From(steps) => {
                assert!(matches!(steps[1].kind, CoreStepKind::Scan { .. }));
            }
            other => panic!("expected from, got {:?}", other),
        }
    }

    #[test]
    fn test_datatype_produces_ctor_decl() {
        let lowered = lower("datatype color = RED | GREEN;").unwrap();
        match &lowered.stmt.decls[0] {
            CoreDecl::Datatype(names) => assert_eq!(names[0].as_str(), "color"),
            other => panic!("expected datatype, got {:?}", other),
        }
        assert!(lowered
            .registry
            .datatype(Symbol::intern("color"))
            .is_some());
    }

    #[test]
    fn test_every_core_node_is_typed() {
        // The invariant: lowering assigns a concrete type everywhere.
        let lowered = lower("val x = if 1 < 2 then [1] else [];").unwrap();
        let exp = first_exp(&lowered);
        assert_eq!(lowered.registry.display(exp.ty), "int list");
    }
}
