//! Translation: a checked Datalog program to one Quill expression.
//!
//! The program becomes a single `let`: one `val` per relation in
//! bottom-up stratum order, with a record of the `.output` relations as
//! the body.
//!
//! - A fact-only relation is a list literal of records (fields in the
//!   declaration's labels; the record type canonicalizes their order).
//! - A non-recursive relation with rules is the facts appended to one
//!   `from` comprehension per rule, wrapped in `distinct` for set
//!   semantics.
//! - A recursive relation is `fixpoint (seed, fn (all, new) => step)`:
//!   the seed is the facts plus the non-recursive rules, and the step
//!   is the semi-naive expansion - a rule with k occurrences of the
//!   recursive relation contributes k variants, the i-th scanning the
//!   frontier `new` at position i and the running union `all` at the
//!   others.
//! - `!p(…)` lowers to a `notelem` membership test, comparisons and
//!   arithmetic to their Quill counterparts.
//! - `.input` reads a headerless CSV while translating; columns match
//!   the declared parameters positionally.

use crate::analyze::Analysis;
use crate::ast::*;
use crate::DatalogError;
use quill_par::ast as q;
use quill_util::{Label, Pos, Symbol};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Translate a checked program; `base_dir` anchors `.input` paths
pub fn translate(analysis: &Analysis, base_dir: &Path) -> Result<q::Expr, DatalogError> {
    let mut facts: FxHashMap<Symbol, Vec<Vec<Const>>> = FxHashMap::default();
    for (relation, relation_facts) in &analysis.facts {
        facts
            .entry(*relation)
            .or_default()
            .extend(relation_facts.iter().map(|f| f.values.clone()));
    }
    for input in &analysis.inputs {
        let decl = &analysis.decls[&input.relation];
        let rows = read_csv(base_dir, input, decl)?;
        facts.entry(input.relation).or_default().extend(rows);
    }

    let mut decls = Vec::new();
    for relation in &analysis.order {
        let decl = &analysis.decls[relation];
        let relation_facts = facts.get(relation).cloned().unwrap_or_default();
        let rules = analysis
            .rules
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let exp = if analysis.recursive.contains(relation) {
            recursive_relation(&analysis.decls, decl, &relation_facts, rules)
        } else {
            flat_relation(&analysis.decls, decl, &relation_facts, rules)
        };
        decls.push(q::Decl::new(
            q::DeclKind::Val {
                rec: false,
                inst: false,
                binds: vec![q::ValBind {
                    pat: q::Pat::new(q::PatKind::Id(*relation), decl.pos),
                    exp,
                    pos: decl.pos,
                }],
            },
            decl.pos,
        ));
    }

    let body = if analysis.outputs.is_empty() {
        lit(q::Literal::Unit, Pos::DUMMY)
    } else {
        q::Expr::new(
            q::ExprKind::Record {
                fields: analysis
                    .outputs
                    .iter()
                    .map(|output| {
                        (
                            Label::from(output.relation),
                            id(output.relation, output.pos),
                        )
                    })
                    .collect(),
                base: None,
            },
            Pos::DUMMY,
        )
    };
    Ok(q::Expr::new(
        q::ExprKind::Let(decls, Box::new(body)),
        Pos::DUMMY,
    ))
}

// =============================================================================
// Relations
// =============================================================================

/// Facts plus rule comprehensions, deduplicated
fn flat_relation(
    decls: &FxHashMap<Symbol, RelDecl>,
    decl: &RelDecl,
    facts: &[Vec<Const>],
    rules: &[Rule],
) -> q::Expr {
    let mut exp = fact_list(decl, facts);
    for rule in rules {
        let comprehension = rule_comprehension(decls, decl, rule, None);
        exp = append(exp, comprehension, rule.pos);
    }
    if rules.is_empty() {
        return exp;
    }
    // Set semantics: dedup the union of the rules.
    distinct_wrap(exp, decl.pos)
}

/// `fixpoint (seed, fn (all, new) => variants)`
fn recursive_relation(
    decls: &FxHashMap<Symbol, RelDecl>,
    decl: &RelDecl,
    facts: &[Vec<Const>],
    rules: &[Rule],
) -> q::Expr {
    let all = Symbol::intern("$all");
    let new = Symbol::intern("$new");

    let mut seed = fact_list(decl, facts);
    let mut step: Option<q::Expr> = None;
    for rule in rules {
        let recursive_positions: Vec<usize> = rule
            .body
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                BodyItem::Atom(atom) if atom.relation == decl.name => Some(i),
                _ => None,
            })
            .collect();
        if recursive_positions.is_empty() {
            // Base rule: part of the seed.
            let comprehension = rule_comprehension(decls, decl, rule, None);
            seed = append(seed, comprehension, rule.pos);
            continue;
        }
        // One variant per recursive occurrence: that occurrence scans
        // the frontier, the others the running union.
        for frontier_position in &recursive_positions {
            let sources = RecursiveSources {
                relation: decl.name,
                all,
                new,
                frontier_position: *frontier_position,
            };
            let variant = rule_comprehension(decls, decl, rule, Some(&sources));
            step = Some(match step {
                Some(acc) => append(acc, variant, rule.pos),
                None => variant,
            });
        }
    }
    let step_body = step.unwrap_or_else(|| empty_list(decl.pos));

    let step_fn = q::Expr::new(
        q::ExprKind::Fn(vec![q::MatchArm {
            pat: q::Pat::new(
                q::PatKind::Tuple(vec![
                    q::Pat::new(q::PatKind::Id(all), decl.pos),
                    q::Pat::new(q::PatKind::Id(new), decl.pos),
                ]),
                decl.pos,
            ),
            exp: step_body,
            pos: decl.pos,
        }]),
        decl.pos,
    );
    apply(
        id(Symbol::intern("fixpoint"), decl.pos),
        q::Expr::new(q::ExprKind::Tuple(vec![seed, step_fn]), decl.pos),
        decl.pos,
    )
}

/// How a recursive rule variant reads the recursive relation
struct RecursiveSources {
    relation: Symbol,
    all: Symbol,
    new: Symbol,
    frontier_position: usize,
}

/// One rule as a `from` comprehension:
/// scans for the positive atoms, `where`s for bindings equalities,
/// negations and comparisons, and a `yield` of the head record
fn rule_comprehension(
    decls: &FxHashMap<Symbol, RelDecl>,
    decl: &RelDecl,
    rule: &Rule,
    recursive: Option<&RecursiveSources>,
) -> q::Expr {
    let pos = rule.pos;
    let mut steps = Vec::new();
    let mut conditions: Vec<q::Expr> = Vec::new();
    let mut bound: Vec<Symbol> = Vec::new();
    let mut fresh_counter = 0usize;

    for (index, body_item) in rule.body.iter().enumerate() {
        match body_item {
            BodyItem::Atom(atom) => {
                let source_name = match recursive {
                    Some(sources) if atom.relation == sources.relation => {
                        if index == sources.frontier_position {
                            sources.new
                        } else {
                            sources.all
                        }
                    }
                    _ => atom.relation,
                };
                let atom_decl_params = decl_params_for(decls, atom);
                let mut fields = Vec::new();
                for (term, param) in atom.args.iter().zip(atom_decl_params) {
                    let pat = match term {
                        Term::Var(var) if !bound.contains(var) => {
                            bound.push(*var);
                            q::Pat::new(q::PatKind::Id(*var), atom.pos)
                        }
                        Term::Var(var) => {
                            // Repeated variable: bind fresh, equate.
                            fresh_counter += 1;
                            let fresh =
                                Symbol::intern(&format!("{}__{}", var, fresh_counter));
                            conditions.push(infix(
                                q::BinOp::Eq,
                                id(*var, atom.pos),
                                id(fresh, atom.pos),
                                atom.pos,
                            ));
                            q::Pat::new(q::PatKind::Id(fresh), atom.pos)
                        }
                        Term::Const(c) => {
                            q::Pat::new(q::PatKind::Lit(const_literal(c)), atom.pos)
                        }
                        Term::Arith(_, _, _) => {
                            fresh_counter += 1;
                            let fresh = Symbol::intern(&format!("$a{}", fresh_counter));
                            conditions.push(infix(
                                q::BinOp::Eq,
                                id(fresh, atom.pos),
                                term_expr(term, atom.pos),
                                atom.pos,
                            ));
                            q::Pat::new(q::PatKind::Id(fresh), atom.pos)
                        }
                    };
                    fields.push((Label::from(param), pat));
                }
                steps.push(q::Step {
                    kind: q::StepKind::Scan {
                        pat: q::Pat::new(
                            q::PatKind::Record {
                                fields,
                                ellipsis: false,
                            },
                            atom.pos,
                        ),
                        source: q::ScanSource::In(id(source_name, atom.pos)),
                        on: None,
                    },
                    pos: atom.pos,
                });
            }
            BodyItem::Negated(atom) => {
                // !p(t1, …)  ==>  {l1 = t1, …} notelem p
                let atom_decl_params = decl_params_for(decls, atom);
                let probe = q::Expr::new(
                    q::ExprKind::Record {
                        fields: atom
                            .args
                            .iter()
                            .zip(atom_decl_params)
                            .map(|(term, param)| {
                                (Label::from(param), term_expr(term, atom.pos))
                            })
                            .collect(),
                        base: None,
                    },
                    atom.pos,
                );
                conditions.push(infix(
                    q::BinOp::Notelem,
                    probe,
                    id(atom.relation, atom.pos),
                    atom.pos,
                ));
            }
            BodyItem::Compare { op, lhs, rhs, pos } => {
                conditions.push(infix(
                    cmp_op(*op),
                    term_expr(lhs, *pos),
                    term_expr(rhs, *pos),
                    *pos,
                ));
            }
        }
    }

    for condition in conditions {
        let cond_pos = condition.pos;
        steps.push(q::Step {
            kind: q::StepKind::Where(condition),
            pos: cond_pos,
        });
    }

    // yield {l1 = t1, …} for the head.
    let head_record = q::Expr::new(
        q::ExprKind::Record {
            fields: rule
                .head
                .args
                .iter()
                .zip(decl.params.iter().map(|(param, _)| *param))
                .map(|(term, param)| (Label::from(param), term_expr(term, rule.head.pos)))
                .collect(),
            base: None,
        },
        rule.head.pos,
    );
    steps.push(q::Step {
        kind: q::StepKind::Yield(head_record),
        pos: rule.head.pos,
    });

    q::Expr::new(q::ExprKind::From(steps), pos)
}

/// The parameter names of an atom's relation
///
/// Analysis guarantees the declaration exists and arities match.
fn decl_params_for(decls: &FxHashMap<Symbol, RelDecl>, atom: &Atom) -> Vec<Symbol> {
    decls
        .get(&atom.relation)
        .map(|decl| decl.params.iter().map(|(p, _)| *p).collect())
        .unwrap_or_default()
}

// =============================================================================
// CSV input
// =============================================================================

/// Headerless CSV; columns positional per the declared parameters
fn read_csv(
    base_dir: &Path,
    input: &Input,
    decl: &RelDecl,
) -> Result<Vec<Vec<Const>>, DatalogError> {
    let path = base_dir.join(&input.path);
    let content = std::fs::read_to_string(&path).map_err(|source| DatalogError::Io {
        path: path.display().to_string(),
        message: source.to_string(),
        pos: input.pos,
    })?;
    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns.len() != decl.params.len() {
            return Err(DatalogError::CsvFormat {
                path: input.path.clone(),
                line: line_no + 1,
                message: format!(
                    "expected {} columns, found {}",
                    decl.params.len(),
                    columns.len()
                ),
                pos: input.pos,
            });
        }
        let mut row = Vec::with_capacity(columns.len());
        for (column, (param, ty)) in columns.iter().zip(&decl.params) {
            let value = parse_column(column, *ty).ok_or_else(|| DatalogError::CsvFormat {
                path: input.path.clone(),
                line: line_no + 1,
                message: format!("column {} is not a {}", param, ty.name()),
                pos: input.pos,
            })?;
            row.push(value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn parse_column(text: &str, ty: ColumnType) -> Option<Const> {
    match ty {
        ColumnType::Int => text.parse().ok().map(Const::Int),
        ColumnType::Real => text.parse().ok().map(Const::Real),
        ColumnType::Bool => match text {
            "true" => Some(Const::Bool(true)),
            "false" => Some(Const::Bool(false)),
            _ => None,
        },
        ColumnType::String => {
            let trimmed = text
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .unwrap_or(text);
            Some(Const::Str(trimmed.to_string()))
        }
    }
}

// =============================================================================
// Expression building
// =============================================================================

fn fact_list(decl: &RelDecl, facts: &[Vec<Const>]) -> q::Expr {
    let rows = facts
        .iter()
        .map(|row| {
            q::Expr::new(
                q::ExprKind::Record {
                    fields: decl
                        .params
                        .iter()
                        .zip(row)
                        .map(|((param, _), value)| {
                            (Label::from(*param), lit(const_literal(value), decl.pos))
                        })
                        .collect(),
                    base: None,
                },
                decl.pos,
            )
        })
        .collect();
    q::Expr::new(q::ExprKind::List(rows), decl.pos)
}

fn empty_list(pos: Pos) -> q::Expr {
    q::Expr::new(q::ExprKind::List(Vec::new()), pos)
}

fn distinct_wrap(exp: q::Expr, pos: Pos) -> q::Expr {
    let row = Symbol::intern("$r");
    q::Expr::new(
        q::ExprKind::From(vec![
            q::Step {
                kind: q::StepKind::Scan {
                    pat: q::Pat::new(q::PatKind::Id(row), pos),
                    source: q::ScanSource::In(exp),
                    on: None,
                },
                pos,
            },
            q::Step {
                kind: q::StepKind::Distinct,
                pos,
            },
        ]),
        pos,
    )
}

fn const_literal(value: &Const) -> q::Literal {
    match value {
        Const::Int(n) => q::Literal::Int(*n),
        Const::Real(r) => q::Literal::Real(*r),
        Const::Bool(b) => q::Literal::Bool(*b),
        Const::Str(s) => q::Literal::Str(s.clone()),
    }
}

fn term_expr(term: &Term, pos: Pos) -> q::Expr {
    match term {
        Term::Var(var) => id(*var, pos),
        Term::Const(c) => lit(const_literal(c), pos),
        Term::Arith(op, lhs, rhs) => {
            let bin_op = match op {
                ArithOp::Add => q::BinOp::Plus,
                ArithOp::Sub => q::BinOp::Minus,
                ArithOp::Mul => q::BinOp::Times,
                ArithOp::Div => q::BinOp::Div,
                ArithOp::Mod => q::BinOp::Mod,
            };
            infix(bin_op, term_expr(lhs, pos), term_expr(rhs, pos), pos)
        }
    }
}

fn cmp_op(op: CmpOp) -> q::BinOp {
    match op {
        CmpOp::Eq => q::BinOp::Eq,
        CmpOp::Ne => q::BinOp::Ne,
        CmpOp::Lt => q::BinOp::Lt,
        CmpOp::Le => q::BinOp::Le,
        CmpOp::Gt => q::BinOp::Gt,
        CmpOp::Ge => q::BinOp::Ge,
    }
}

fn id(name: Symbol, pos: Pos) -> q::Expr {
    q::Expr::new(q::ExprKind::Id(name), pos)
}

fn lit(literal: q::Literal, pos: Pos) -> q::Expr {
    q::Expr::new(q::ExprKind::Lit(literal), pos)
}

fn infix(op: q::BinOp, lhs: q::Expr, rhs: q::Expr, pos: Pos) -> q::Expr {
    q::Expr::new(q::ExprKind::Infix(op, Box::new(lhs), Box::new(rhs)), pos)
}

fn apply(f: q::Expr, arg: q::Expr, pos: Pos) -> q::Expr {
    q::Expr::new(q::ExprKind::Apply(Box::new(f), Box::new(arg)), pos)
}

fn append(lhs: q::Expr, rhs: q::Expr, pos: Pos) -> q::Expr {
    infix(q::BinOp::Append, lhs, rhs, pos)
}
