//! Pattern-matrix usefulness analysis.
//!
//! The classic algorithm: a pattern vector is *useful* with respect to
//! a matrix when some value matches the vector and none of the matrix
//! rows. Redundancy and exhaustiveness both reduce to usefulness:
//!
//! - arm *i* is redundant iff its row is not useful against the rows
//!   above it (an error);
//! - a match is nonexhaustive iff the all-wildcard vector is useful
//!   against the whole matrix (a warning, never an error).
//!
//! Patterns are first simplified: names and layered patterns become
//! wildcards over their sub-structure, list patterns become nested
//! cons/nil, record patterns expand to the full label set of their
//! resolved record type with wildcards for unlisted fields. Literal
//! domains (`int`, `string`, `char`, `real`) are treated as infinite,
//! so a match over them is exhaustive only via a catch-all; `bool`,
//! `unit`, tuples, records, lists and datatypes have complete
//! constructor signatures.

use quill_par::ast::Literal;
use quill_sem::{TPat, TPatKind};
use quill_typ::{TypeKind, TypeRegistry};
use quill_util::Symbol;

/// Result of analyzing a sequence of match arms
#[derive(Debug, Clone, PartialEq)]
pub struct MatchAnalysis {
    /// Index of the first redundant arm, if any
    pub redundant: Option<usize>,
    pub exhaustive: bool,
}

/// Analyze the patterns of a match, one per arm
pub fn analyze_arms(registry: &TypeRegistry, pats: &[&TPat]) -> MatchAnalysis {
    let rows: Vec<Vec<SimplePat>> = pats
        .iter()
        .map(|p| vec![simplify(registry, p)])
        .collect();
    let mut redundant = None;
    for (i, row) in rows.iter().enumerate() {
        if i > 0 && !useful(registry, &rows[..i], row) {
            redundant = Some(i);
            break;
        }
    }
    let exhaustive = !useful(registry, &rows, &[SimplePat::Wild]);
    MatchAnalysis {
        redundant,
        exhaustive,
    }
}

/// Analyze clause rows of a multi-pattern `fun` (one row per clause)
pub fn analyze_clause_rows(registry: &TypeRegistry, rows_in: &[Vec<&TPat>]) -> MatchAnalysis {
    let rows: Vec<Vec<SimplePat>> = rows_in
        .iter()
        .map(|row| row.iter().map(|p| simplify(registry, p)).collect())
        .collect();
    let width = rows.first().map_or(0, Vec::len);
    let mut redundant = None;
    for (i, row) in rows.iter().enumerate() {
        if i > 0 && !useful(registry, &rows[..i], row) {
            redundant = Some(i);
            break;
        }
    }
    let all_wild = vec![SimplePat::Wild; width];
    let exhaustive = !useful(registry, &rows, &all_wild);
    MatchAnalysis {
        redundant,
        exhaustive,
    }
}

/// Is a single pattern irrefutable (matches every value of its type)?
pub fn is_irrefutable(registry: &TypeRegistry, pat: &TPat) -> bool {
    let rows = vec![vec![simplify(registry, pat)]];
    !useful(registry, &rows, &[SimplePat::Wild])
}

// =============================================================================
// Simplified patterns
// =============================================================================

/// Head constructors with complete or incomplete signatures
#[derive(Debug, Clone, PartialEq)]
enum Head {
    Unit,
    Bool(bool),
    /// n-ary product (tuples and records after label expansion)
    Product(usize),
    Nil,
    Cons,
    /// Datatype constructor: owning type, name, payload arity (0 or 1)
    Data(Symbol, Symbol, usize),
}

impl Head {
    fn arity(&self) -> usize {
        match self {
            Head::Unit | Head::Bool(_) | Head::Nil => 0,
            Head::Product(n) => *n,
            Head::Cons => 2,
            Head::Data(_, _, arity) => *arity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SimplePat {
    Wild,
    /// Literal over an effectively infinite domain
    Lit(Literal),
    Ctor(Head, Vec<SimplePat>),
}

fn simplify(registry: &TypeRegistry, pat: &TPat) -> SimplePat {
    match &pat.kind {
        TPatKind::Wild | TPatKind::Id(_) => SimplePat::Wild,
        TPatKind::As(_, inner) => simplify(registry, inner),
        TPatKind::Lit(Literal::Unit) => SimplePat::Ctor(Head::Unit, Vec::new()),
        TPatKind::Lit(Literal::Bool(b)) => SimplePat::Ctor(Head::Bool(*b), Vec::new()),
        TPatKind::Lit(lit) => SimplePat::Lit(lit.clone()),
        TPatKind::Cons(head, tail) => SimplePat::Ctor(
            Head::Cons,
            vec![simplify(registry, head), simplify(registry, tail)],
        ),
        TPatKind::List(pats) => {
            let mut acc = SimplePat::Ctor(Head::Nil, Vec::new());
            for p in pats.iter().rev() {
                acc = SimplePat::Ctor(Head::Cons, vec![simplify(registry, p), acc]);
            }
            acc
        }
        TPatKind::Tuple(pats) => SimplePat::Ctor(
            Head::Product(pats.len()),
            pats.iter().map(|p| simplify(registry, p)).collect(),
        ),
        TPatKind::Record { fields, .. } => {
            // Expand to the full label set of the resolved record type;
            // unlisted labels match anything.
            match registry.kind(pat.ty).clone() {
                TypeKind::Record(type_fields) => {
                    let args = type_fields
                        .labels()
                        .map(|label| {
                            fields
                                .iter()
                                .find(|(l, _)| l == label)
                                .map(|(_, p)| simplify(registry, p))
                                .unwrap_or(SimplePat::Wild)
                        })
                        .collect::<Vec<_>>();
                    SimplePat::Ctor(Head::Product(args.len()), args)
                }
                TypeKind::Tuple(parts) => {
                    let args = (1..=parts.len() as u32)
                        .map(|i| {
                            fields
                                .iter()
                                .find(|(l, _)| l.as_ordinal() == Some(i))
                                .map(|(_, p)| simplify(registry, p))
                                .unwrap_or(SimplePat::Wild)
                        })
                        .collect::<Vec<_>>();
                    SimplePat::Ctor(Head::Product(args.len()), args)
                }
                _ => SimplePat::Wild,
            }
        }
        TPatKind::Con(name, arg) => {
            let datatype = registry
                .datatype_of_ctor(*name)
                .map(|def| def.name)
                .unwrap_or(*name);
            let args: Vec<SimplePat> = arg
                .iter()
                .map(|a| simplify(registry, a))
                .collect();
            let arity = args.len();
            SimplePat::Ctor(Head::Data(datatype, *name, arity), args)
        }
    }
}

// =============================================================================
// Usefulness
// =============================================================================

fn useful(registry: &TypeRegistry, matrix: &[Vec<SimplePat>], q: &[SimplePat]) -> bool {
    if q.is_empty() {
        return matrix.is_empty();
    }
    match &q[0] {
        SimplePat::Ctor(head, args) => {
            let specialized = specialize(matrix, head);
            let mut new_q: Vec<SimplePat> = args.clone();
            new_q.extend_from_slice(&q[1..]);
            useful(registry, &specialized, &new_q)
        }
        SimplePat::Lit(lit) => {
            let filtered: Vec<Vec<SimplePat>> = matrix
                .iter()
                .filter(|row| match &row[0] {
                    SimplePat::Wild => true,
                    SimplePat::Lit(other) => other == lit,
                    SimplePat::Ctor(_, _) => false,
                })
                .map(|row| row[1..].to_vec())
                .collect();
            useful(registry, &filtered, &q[1..])
        }
        SimplePat::Wild => {
            let heads: Vec<Head> = matrix
                .iter()
                .filter_map(|row| match &row[0] {
                    SimplePat::Ctor(head, _) => Some(head.clone()),
                    _ => None,
                })
                .fold(Vec::new(), |mut acc, head| {
                    if !acc.contains(&head) {
                        acc.push(head);
                    }
                    acc
                });
            if !heads.is_empty() && is_complete_signature(registry, &heads) {
                heads.iter().any(|head| {
                    let specialized = specialize(matrix, head);
                    let mut new_q = vec![SimplePat::Wild; head.arity()];
                    new_q.extend_from_slice(&q[1..]);
                    useful(registry, &specialized, &new_q)
                })
            } else {
                // Default matrix: rows whose head matches anything.
                let default: Vec<Vec<SimplePat>> = matrix
                    .iter()
                    .filter(|row| matches!(row[0], SimplePat::Wild))
                    .map(|row| row[1..].to_vec())
                    .collect();
                useful(registry, &default, &q[1..])
            }
        }
    }
}

/// Rows compatible with `head`, with the head column expanded
fn specialize(matrix: &[Vec<SimplePat>], head: &Head) -> Vec<Vec<SimplePat>> {
    let mut out = Vec::new();
    for row in matrix {
        match &row[0] {
            SimplePat::Wild => {
                let mut new_row = vec![SimplePat::Wild; head.arity()];
                new_row.extend_from_slice(&row[1..]);
                out.push(new_row);
            }
            SimplePat::Ctor(row_head, args) if heads_equal(row_head, head) => {
                let mut new_row = args.clone();
                new_row.extend_from_slice(&row[1..]);
                out.push(new_row);
            }
            _ => {}
        }
    }
    out
}

fn heads_equal(a: &Head, b: &Head) -> bool {
    match (a, b) {
        (Head::Data(da, ca, _), Head::Data(db, cb, _)) => da == db && ca == cb,
        _ => a == b,
    }
}

/// Do the heads cover every constructor of their type?
fn is_complete_signature(registry: &TypeRegistry, heads: &[Head]) -> bool {
    match &heads[0] {
        Head::Unit | Head::Product(_) => true,
        Head::Bool(_) => {
            heads.contains(&Head::Bool(true)) && heads.contains(&Head::Bool(false))
        }
        Head::Nil | Head::Cons => {
            heads.iter().any(|h| matches!(h, Head::Nil))
                && heads.iter().any(|h| matches!(h, Head::Cons))
        }
        Head::Data(datatype, _, _) => match registry.datatype(*datatype) {
            Some(def) => {
                let covered: Vec<Symbol> = heads
                    .iter()
                    .filter_map(|h| match h {
                        Head::Data(_, ctor, _) => Some(*ctor),
                        _ => None,
                    })
                    .collect();
                def.ctors.keys().all(|ctor| covered.contains(ctor))
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_par::Parser;
    use quill_sem::{EnvEntry, OverloadTable, TExprKind, TypeResolver};
    use quill_util::FileId;

    /// Type a `fn` expression and return its arm patterns for analysis
    fn analyzed(source: &str) -> (MatchAnalysis, TypeRegistry) {
        let mut registry = TypeRegistry::new();
        let mut overloads = OverloadTable::new();
        let globals = rustc_hash::FxHashMap::<quill_util::Symbol, EnvEntry>::default();
        let stmt = Parser::parse_single(source, FileId::STDIN).unwrap();
        let mut resolver = TypeResolver::new(&mut registry, &globals, &mut overloads);
        let tstmt = resolver.resolve_statement(&stmt).unwrap();
        let arms = match &tstmt.decl.kind {
            quill_sem::TDeclKind::Val { binds, .. } => match &binds[0].exp.kind {
                TExprKind::Fn(arms) => arms.iter().map(|a| &a.pat).collect::<Vec<_>>(),
                other => panic!("expected fn, got {:?}", other),
            },
            other => panic!("expected val, got {:?}", other),
        };
        let analysis = analyze_arms(&registry, &arms);
        (analysis, registry)
    }

    #[test]
    fn test_wildcard_is_exhaustive() {
        let (a, _) = analyzed("val f = fn _ => 1;");
        assert!(a.exhaustive);
        assert_eq!(a.redundant, None);
    }

    #[test]
    fn test_int_literal_is_not_exhaustive() {
        let (a, _) = analyzed("val f = fn 1 => 0;");
        assert!(!a.exhaustive);
    }

    #[test]
    fn test_int_literal_with_catchall_is_exhaustive() {
        let (a, _) = analyzed("val f = fn 1 => 0 | _ => 1;");
        assert!(a.exhaustive);
        assert_eq!(a.redundant, None);
    }

    #[test]
    fn test_bool_pair_is_exhaustive() {
        let (a, _) = analyzed("val f = fn true => 1 | false => 0;");
        assert!(a.exhaustive);
    }

    #[test]
    fn test_bool_single_is_not_exhaustive() {
        let (a, _) = analyzed("val f = fn true => 1;");
        assert!(!a.exhaustive);
    }

    #[test]
    fn test_redundant_after_wildcard() {
        let (a, _) = analyzed("val f = fn _ => 1 | 2 => 0;");
        assert_eq!(a.redundant, Some(1));
    }

    #[test]
    fn test_duplicate_literal_is_redundant() {
        let (a, _) = analyzed("val f = fn 1 => 0 | 1 => 1;");
        assert_eq!(a.redundant, Some(1));
    }

    #[test]
    fn test_list_nil_cons_is_exhaustive() {
        let (a, _) = analyzed("val f = fn [] => 0 | x :: _ => x;");
        assert!(a.exhaustive);
        assert_eq!(a.redundant, None);
    }

    #[test]
    fn test_list_cons_only_is_not_exhaustive() {
        let (a, _) = analyzed("val f = fn x :: _ => x;");
        assert!(!a.exhaustive);
    }

    #[test]
    fn test_fixed_length_list_not_exhaustive() {
        let (a, _) = analyzed("val f = fn [x] => x | [] => 0;");
        // [x, y, ...] is uncovered.
        assert!(!a.exhaustive);
    }

    #[test]
    fn test_option_both_ctors_exhaustive() {
        let (a, _) = analyzed("val f = fn SOME x => x | NONE => 0;");
        assert!(a.exhaustive);
        assert_eq!(a.redundant, None);
    }

    #[test]
    fn test_option_one_ctor_not_exhaustive() {
        let (a, _) = analyzed("val f = fn SOME x => x;");
        assert!(!a.exhaustive);
    }

    #[test]
    fn test_tuple_of_wilds_exhaustive() {
        let (a, _) = analyzed("val f = fn (a, _) => a;");
        assert!(a.exhaustive);
    }

    #[test]
    fn test_tuple_with_literal_not_exhaustive() {
        let (a, _) = analyzed("val f = fn (1, x) => x;");
        assert!(!a.exhaustive);
    }

    #[test]
    fn test_nested_option_matrix() {
        let (a, _) =
            analyzed("val f = fn SOME true => 1 | SOME false => 2 | NONE => 0;");
        assert!(a.exhaustive);
        assert_eq!(a.redundant, None);
    }

    #[test]
    fn test_irrefutable() {
        let mut registry = TypeRegistry::new();
        let mut overloads = OverloadTable::new();
        let globals = rustc_hash::FxHashMap::<quill_util::Symbol, EnvEntry>::default();
        let stmt = Parser::parse_single("val (a, b) = (1, 2);", FileId::STDIN).unwrap();
        let mut resolver = TypeResolver::new(&mut registry, &globals, &mut overloads);
        let tstmt = resolver.resolve_statement(&stmt).unwrap();
        let pat = match &tstmt.decl.kind {
            quill_sem::TDeclKind::Val { binds, .. } => &binds[0].pat,
            _ => panic!("expected val"),
        };
        assert!(is_irrefutable(&registry, pat));
    }
}
