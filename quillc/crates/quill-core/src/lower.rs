//! Lowering: typed AST to core IR.
//!
//! The desugaring rules, in the order they apply:
//!
//! - `fun f p1 p2 = e` becomes a recursive binding of nested
//!   single-parameter functions; multi-clause functions compile to a
//!   `case` over the argument tuple with redundancy analysis (an
//!   error) and exhaustiveness analysis (a warning plus a `Bind`-raising
//!   catch-all arm).
//! - `if`, `andalso`, `orelse` and `implies` compile to boolean `case`,
//!   which gives the short-circuit behavior for free: the right operand
//!   sits in an arm body and is only evaluated when that arm is taken.
//! - `f o g` expands to `fn x => f (g x)`.
//! - Remaining infix operators become applications of the named builtin
//!   over the operand pair.
//! - `{e with f = v}` expands to a full record construction copying the
//!   unchanged fields out of a temporary.
//! - `e.label` becomes an application of the `#label` selector.
//! - `exists steps` becomes `from steps into nonEmpty`; `forall steps
//!   require p` becomes `not (from steps where not p into nonEmpty)`.

use crate::ir::*;
use crate::matches::{analyze_arms, analyze_clause_rows, is_irrefutable};
use quill_par::ast::{BinOp, Literal};
use quill_sem::{
    TDecl, TDeclKind, TExpr, TExprKind, TMatchArm, TPat, TPatKind, TScanSource, TStatement, TStep,
    TStepKind,
};
use quill_typ::{TypeId, TypeKind, TypeRegistry};
use quill_util::{Handler, Label, Pos, Symbol};
use thiserror::Error;

/// Errors produced while lowering
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerError {
    #[error("match redundant")]
    RedundantMatch(Pos),
}

impl LowerError {
    pub fn pos(&self) -> Pos {
        match self {
            LowerError::RedundantMatch(pos) => *pos,
        }
    }
}

/// The lowering resolver
pub struct Lowerer<'a> {
    registry: &'a mut TypeRegistry,
    handler: &'a Handler,
    gensym: u32,
}

impl<'a> Lowerer<'a> {
    pub fn new(registry: &'a mut TypeRegistry, handler: &'a Handler) -> Self {
        Self {
            registry,
            handler,
            gensym: 0,
        }
    }

    /// Fresh internal name; `$` keeps it out of the user namespace
    fn fresh_name(&mut self) -> Symbol {
        let name = Symbol::intern(&format!("$v{}", self.gensym));
        self.gensym += 1;
        name
    }

    pub fn lower_statement(&mut self, stmt: &TStatement) -> Result<CoreStatement, LowerError> {
        let pos = stmt.decl.pos;
        if let TDeclKind::Inst(name, bind) = &stmt.decl.kind {
            let exp = self.lower_expr(&bind.exp)?;
            return Ok(CoreStatement {
                decls: Vec::new(),
                inst: Some((*name, Box::new(exp))),
                pos,
            });
        }
        let decls = self.lower_decl(&stmt.decl)?;
        Ok(CoreStatement {
            decls,
            inst: None,
            pos,
        })
    }

    pub fn lower_decl(&mut self, decl: &TDecl) -> Result<Vec<CoreDecl>, LowerError> {
        match &decl.kind {
            TDeclKind::Val { rec: false, binds } => {
                let mut out = Vec::new();
                for bind in binds {
                    if !is_irrefutable(self.registry, &bind.pat) {
                        self.handler.warn(bind.pos, "binding not exhaustive");
                    }
                    out.push(CoreDecl::NonRec {
                        pat: self.lower_pat(&bind.pat),
                        exp: self.lower_expr(&bind.exp)?,
                    });
                }
                Ok(out)
            }
            TDeclKind::Val { rec: true, binds } => {
                let mut group = Vec::new();
                for bind in binds {
                    let name = match &bind.pat.kind {
                        TPatKind::Id(name) => *name,
                        // The resolver admits only simple names here.
                        _ => unreachable!("rec binding pattern is a name"),
                    };
                    group.push((name, self.lower_expr(&bind.exp)?));
                }
                Ok(vec![CoreDecl::Rec { binds: group }])
            }
            TDeclKind::Fun(funbinds) => {
                let mut group = Vec::new();
                for funbind in funbinds {
                    let exp = self.lower_funbind(funbind)?;
                    group.push((funbind.name, exp));
                }
                Ok(vec![CoreDecl::Rec { binds: group }])
            }
            TDeclKind::Datatype(names) => Ok(vec![CoreDecl::Datatype(names.clone())]),
            TDeclKind::TypeAlias(_) | TDeclKind::Over(_) => Ok(Vec::new()),
            TDeclKind::Inst(_, _) => {
                unreachable!("inst declarations are handled by lower_statement")
            }
        }
    }

    /// `fun f p1 … pn = e | …` to nested single-parameter functions
    fn lower_funbind(&mut self, funbind: &quill_sem::TFunBind) -> Result<CoreExpr, LowerError> {
        let arity = funbind.clauses[0].0.len();
        let param_tys = self.peel_fn_params(funbind.ty, arity);

        // Fast path: one clause, all parameters irrefutable.
        let single_simple = funbind.clauses.len() == 1
            && funbind.clauses[0]
                .0
                .iter()
                .all(|p| is_irrefutable(self.registry, p));
        if single_simple {
            let (pats, body) = &funbind.clauses[0];
            let mut built = self.lower_expr(body)?;
            for pat in pats.iter().rev() {
                let fn_ty = self.registry.fn_type(pat.ty, built.ty);
                built = CoreExpr::new(
                    CoreKind::Fn {
                        param: Box::new(self.lower_pat(pat)),
                        body: Box::new(built),
                    },
                    fn_ty,
                    funbind.pos,
                );
            }
            return Ok(built);
        }

        // General path: case over the argument tuple.
        let rows: Vec<Vec<&TPat>> = funbind
            .clauses
            .iter()
            .map(|(pats, _)| pats.iter().collect())
            .collect();
        let analysis = analyze_clause_rows(self.registry, &rows);
        if let Some(index) = analysis.redundant {
            return Err(LowerError::RedundantMatch(funbind.clauses[index].0[0].pos));
        }
        if !analysis.exhaustive {
            self.handler.warn(funbind.pos, "match nonexhaustive");
        }

        let params: Vec<(Symbol, TypeId)> = param_tys
            .iter()
            .map(|ty| (self.fresh_name(), *ty))
            .collect();
        let scrutinee_ty = self.registry.tuple_type(param_tys.clone());
        let scrutinee = if params.len() == 1 {
            CoreExpr::new(CoreKind::Id(params[0].0), params[0].1, funbind.pos)
        } else {
            CoreExpr::new(
                CoreKind::Tuple(
                    params
                        .iter()
                        .map(|(name, ty)| CoreExpr::new(CoreKind::Id(*name), *ty, funbind.pos))
                        .collect(),
                ),
                scrutinee_ty,
                funbind.pos,
            )
        };

        let result_ty = self.peel_fn_result(funbind.ty, arity);
        let mut arms = Vec::new();
        for (pats, body) in &funbind.clauses {
            let pat = if pats.len() == 1 {
                self.lower_pat(&pats[0])
            } else {
                let parts: Vec<CorePat> = pats.iter().map(|p| self.lower_pat(p)).collect();
                CorePat::new(CorePatKind::Tuple(parts), scrutinee_ty, pats[0].pos)
            };
            arms.push(CoreArm {
                pat,
                body: self.lower_expr(body)?,
            });
        }
        if !analysis.exhaustive {
            // Unmatched arguments raise Bind.
            arms.push(CoreArm {
                pat: CorePat::new(CorePatKind::Wild, scrutinee.ty, funbind.pos),
                body: CoreExpr::new(
                    CoreKind::Raise(Symbol::intern("Bind")),
                    result_ty,
                    funbind.pos,
                ),
            });
        }

        let mut built = CoreExpr::new(
            CoreKind::Case {
                scrutinee: Box::new(scrutinee),
                arms,
            },
            result_ty,
            funbind.pos,
        );
        for (name, ty) in params.iter().rev() {
            let fn_ty = self.registry.fn_type(*ty, built.ty);
            built = CoreExpr::new(
                CoreKind::Fn {
                    param: Box::new(CorePat::new(CorePatKind::Id(*name), *ty, funbind.pos)),
                    body: Box::new(built),
                },
                fn_ty,
                funbind.pos,
            );
        }
        Ok(built)
    }

    fn peel_fn_params(&self, fun_ty: TypeId, arity: usize) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut current = fun_ty;
        for _ in 0..arity {
            match self.registry.kind(current) {
                TypeKind::Fn(param, result) => {
                    out.push(*param);
                    current = *result;
                }
                _ => break,
            }
        }
        out
    }

    fn peel_fn_result(&self, fun_ty: TypeId, arity: usize) -> TypeId {
        let mut current = fun_ty;
        for _ in 0..arity {
            if let TypeKind::Fn(_, result) = self.registry.kind(current) {
                current = *result;
            }
        }
        current
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn lower_expr(&mut self, exp: &TExpr) -> Result<CoreExpr, LowerError> {
        let ty = exp.ty;
        let pos = exp.pos;
        let kind = match &exp.kind {
            TExprKind::Lit(lit) => CoreKind::Lit(lit.clone()),
            TExprKind::Id(name) => CoreKind::Id(*name),
            TExprKind::Ctor(name) => CoreKind::Ctor(*name),
            TExprKind::OverloadedUse { name, index } => CoreKind::OverloadedUse {
                name: *name,
                index: *index,
            },
            TExprKind::RecordSel(label) => CoreKind::RecordSel(*label),
            TExprKind::If(c, t, f) => {
                let tc = self.lower_expr(c)?;
                let tt = self.lower_expr(t)?;
                let tf = self.lower_expr(f)?;
                self.bool_case(tc, tt, tf, pos)
            }
            TExprKind::Let(decls, body) => {
                let mut core_decls = Vec::new();
                for decl in decls {
                    core_decls.extend(self.lower_decl(decl)?);
                }
                let body = self.lower_expr(body)?;
                return Ok(core_decls.into_iter().rev().fold(body, |acc, decl| {
                    let acc_ty = acc.ty;
                    CoreExpr::new(CoreKind::Let(Box::new(decl), Box::new(acc)), acc_ty, pos)
                }));
            }
            TExprKind::Fn(arms) => return self.lower_fn(arms, ty, pos),
            TExprKind::Apply(f, arg) => CoreKind::Apply(
                Box::new(self.lower_expr(f)?),
                Box::new(self.lower_expr(arg)?),
            ),
            TExprKind::Case(scrutinee, arms) => {
                let core_scrutinee = self.lower_expr(scrutinee)?;
                let core_arms = self.lower_arms(arms, "match nonexhaustive")?;
                CoreKind::Case {
                    scrutinee: Box::new(core_scrutinee),
                    arms: core_arms,
                }
            }
            TExprKind::Tuple(exps) => CoreKind::Tuple(
                exps.iter()
                    .map(|e| self.lower_expr(e))
                    .collect::<Result<_, _>>()?,
            ),
            TExprKind::Record { fields, base } => match base {
                None => CoreKind::Record(
                    fields
                        .iter()
                        .map(|(l, e)| Ok((*l, self.lower_expr(e)?)))
                        .collect::<Result<_, LowerError>>()?,
                ),
                Some(base_exp) => return self.lower_record_update(base_exp, fields, ty, pos),
            },
            TExprKind::List(exps) => CoreKind::List(
                exps.iter()
                    .map(|e| self.lower_expr(e))
                    .collect::<Result<_, _>>()?,
            ),
            TExprKind::Infix(op, lhs, rhs) => return self.lower_infix(*op, lhs, rhs, ty, pos),
            TExprKind::Negate(operand) => {
                let core_operand = self.lower_expr(operand)?;
                let neg_ty = self.registry.fn_type(core_operand.ty, ty);
                CoreKind::Apply(
                    Box::new(CoreExpr::new(
                        CoreKind::Id(Symbol::intern("~")),
                        neg_ty,
                        pos,
                    )),
                    Box::new(core_operand),
                )
            }
            TExprKind::Field(base, label) => {
                let core_base = self.lower_expr(base)?;
                let sel_ty = self.registry.fn_type(core_base.ty, ty);
                CoreKind::Apply(
                    Box::new(CoreExpr::new(CoreKind::RecordSel(*label), sel_ty, pos)),
                    Box::new(core_base),
                )
            }
            TExprKind::From(steps) => CoreKind::From(self.lower_steps(steps)?),
            TExprKind::Exists(steps) => {
                let mut core_steps = self.lower_steps(steps)?;
                core_steps.push(self.non_empty_step(steps, pos));
                CoreKind::From(core_steps)
            }
            TExprKind::Forall(steps, cond) => {
                // forall … require p  ==  not (exists … where not p)
                let mut core_steps = self.lower_steps(steps)?;
                let core_cond = self.lower_expr(cond)?;
                let negated = self.apply_not(core_cond, pos);
                core_steps.push(CoreStep {
                    kind: CoreStepKind::Where(negated),
                    pos,
                });
                core_steps.push(self.non_empty_step(steps, pos));
                let bool_ty = self.registry.bool_type();
                let exists = CoreExpr::new(CoreKind::From(core_steps), bool_ty, pos);
                return Ok(self.apply_not(exists, pos));
            }
            TExprKind::Aggregate(agg, arg) => CoreKind::Aggregate {
                agg: Box::new(self.lower_expr(agg)?),
                arg: Box::new(self.lower_expr(arg)?),
            },
        };
        Ok(CoreExpr::new(kind, ty, pos))
    }

    /// `fn` expressions: single irrefutable arm lowers directly,
    /// anything else becomes a fresh parameter and a `case`
    fn lower_fn(
        &mut self,
        arms: &[TMatchArm],
        ty: TypeId,
        pos: Pos,
    ) -> Result<CoreExpr, LowerError> {
        if arms.len() == 1 && is_irrefutable(self.registry, &arms[0].pat) {
            let body = self.lower_expr(&arms[0].exp)?;
            return Ok(CoreExpr::new(
                CoreKind::Fn {
                    param: Box::new(self.lower_pat(&arms[0].pat)),
                    body: Box::new(body),
                },
                ty,
                pos,
            ));
        }
        let (param_ty, result_ty) = match self.registry.kind(ty) {
            TypeKind::Fn(p, r) => (*p, *r),
            _ => (arms[0].pat.ty, arms[0].exp.ty),
        };
        let pats: Vec<&TPat> = arms.iter().map(|a| &a.pat).collect();
        let analysis = analyze_arms(self.registry, &pats);
        if let Some(index) = analysis.redundant {
            return Err(LowerError::RedundantMatch(arms[index].pos));
        }
        if !analysis.exhaustive {
            self.handler.warn(pos, "match nonexhaustive");
        }
        let param = self.fresh_name();
        let mut core_arms = self.lower_arms_unchecked(arms)?;
        if !analysis.exhaustive {
            core_arms.push(CoreArm {
                pat: CorePat::new(CorePatKind::Wild, param_ty, pos),
                body: CoreExpr::new(CoreKind::Raise(Symbol::intern("Bind")), result_ty, pos),
            });
        }
        let body = CoreExpr::new(
            CoreKind::Case {
                scrutinee: Box::new(CoreExpr::new(CoreKind::Id(param), param_ty, pos)),
                arms: core_arms,
            },
            result_ty,
            pos,
        );
        Ok(CoreExpr::new(
            CoreKind::Fn {
                param: Box::new(CorePat::new(CorePatKind::Id(param), param_ty, pos)),
                body: Box::new(body),
            },
            ty,
            pos,
        ))
    }

    /// Lower `case` arms with redundancy (error) and exhaustiveness
    /// (warning) analysis
    fn lower_arms(
        &mut self,
        arms: &[TMatchArm],
        warning: &str,
    ) -> Result<Vec<CoreArm>, LowerError> {
        let pats: Vec<&TPat> = arms.iter().map(|a| &a.pat).collect();
        let analysis = analyze_arms(self.registry, &pats);
        if let Some(index) = analysis.redundant {
            return Err(LowerError::RedundantMatch(arms[index].pos));
        }
        if !analysis.exhaustive {
            self.handler.warn(arms[0].pos, warning);
        }
        self.lower_arms_unchecked(arms)
    }

    fn lower_arms_unchecked(&mut self, arms: &[TMatchArm]) -> Result<Vec<CoreArm>, LowerError> {
        arms.iter()
            .map(|arm| {
                Ok(CoreArm {
                    pat: self.lower_pat(&arm.pat),
                    body: self.lower_expr(&arm.exp)?,
                })
            })
            .collect()
    }

    /// `case cond of true => t | false => f`
    fn bool_case(&mut self, cond: CoreExpr, t: CoreExpr, f: CoreExpr, pos: Pos) -> CoreKind {
        let bool_ty = self.registry.bool_type();
        CoreKind::Case {
            scrutinee: Box::new(cond),
            arms: vec![
                CoreArm {
                    pat: CorePat::new(CorePatKind::Lit(Literal::Bool(true)), bool_ty, pos),
                    body: t,
                },
                CoreArm {
                    pat: CorePat::new(CorePatKind::Lit(Literal::Bool(false)), bool_ty, pos),
                    body: f,
                },
            ],
        }
    }

    fn lower_infix(
        &mut self,
        op: BinOp,
        lhs: &TExpr,
        rhs: &TExpr,
        ty: TypeId,
        pos: Pos,
    ) -> Result<CoreExpr, LowerError> {
        let bool_ty = self.registry.bool_type();
        match op {
            BinOp::Andalso => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                let false_exp =
                    CoreExpr::new(CoreKind::Lit(Literal::Bool(false)), bool_ty, pos);
                let kind = self.bool_case(l, r, false_exp, pos);
                Ok(CoreExpr::new(kind, bool_ty, pos))
            }
            BinOp::Orelse => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                let true_exp = CoreExpr::new(CoreKind::Lit(Literal::Bool(true)), bool_ty, pos);
                let kind = self.bool_case(l, true_exp, r, pos);
                Ok(CoreExpr::new(kind, bool_ty, pos))
            }
            BinOp::Implies => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                let true_exp = CoreExpr::new(CoreKind::Lit(Literal::Bool(true)), bool_ty, pos);
                let kind = self.bool_case(l, r, true_exp, pos);
                Ok(CoreExpr::new(kind, bool_ty, pos))
            }
            BinOp::Compose => {
                // f o g  ==>  fn x => f (g x)
                let f = self.lower_expr(lhs)?;
                let g = self.lower_expr(rhs)?;
                let (param_ty, result_ty) = match self.registry.kind(ty) {
                    TypeKind::Fn(p, r) => (*p, *r),
                    _ => (ty, ty),
                };
                let x = self.fresh_name();
                let x_exp = CoreExpr::new(CoreKind::Id(x), param_ty, pos);
                let g_result_ty = match self.registry.kind(g.ty) {
                    TypeKind::Fn(_, r) => *r,
                    _ => param_ty,
                };
                let inner = CoreExpr::new(
                    CoreKind::Apply(Box::new(g), Box::new(x_exp)),
                    g_result_ty,
                    pos,
                );
                let outer = CoreExpr::new(
                    CoreKind::Apply(Box::new(f), Box::new(inner)),
                    result_ty,
                    pos,
                );
                Ok(CoreExpr::new(
                    CoreKind::Fn {
                        param: Box::new(CorePat::new(CorePatKind::Id(x), param_ty, pos)),
                        body: Box::new(outer),
                    },
                    ty,
                    pos,
                ))
            }
            _ => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                let pair_ty = self.registry.tuple_type(vec![l.ty, r.ty]);
                let fn_ty = self.registry.fn_type(pair_ty, ty);
                let args = CoreExpr::new(CoreKind::Tuple(vec![l, r]), pair_ty, pos);
                let callee = CoreExpr::new(
                    CoreKind::Id(Symbol::intern(op.text())),
                    fn_ty,
                    pos,
                );
                Ok(CoreExpr::new(
                    CoreKind::Apply(Box::new(callee), Box::new(args)),
                    ty,
                    pos,
                ))
            }
        }
    }

    /// `{base with f = v, …}` copies the unchanged fields
    fn lower_record_update(
        &mut self,
        base: &TExpr,
        fields: &[(Label, TExpr)],
        ty: TypeId,
        pos: Pos,
    ) -> Result<CoreExpr, LowerError> {
        let core_base = self.lower_expr(base)?;
        let all_labels: Vec<(Label, TypeId)> = match self.registry.kind(core_base.ty).clone() {
            TypeKind::Record(type_fields) => {
                type_fields.iter().map(|(l, t)| (*l, *t)).collect()
            }
            TypeKind::Tuple(parts) => parts
                .iter()
                .enumerate()
                .map(|(i, t)| (Label::ordinal(i as u32 + 1), *t))
                .collect(),
            _ => Vec::new(),
        };
        let tmp = self.fresh_name();
        let mut record_fields = Vec::new();
        for (label, field_ty) in &all_labels {
            let updated = fields.iter().find(|(l, _)| l == label);
            let value = match updated {
                Some((_, new_value)) => self.lower_expr(new_value)?,
                None => {
                    let sel_ty = self.registry.fn_type(core_base.ty, *field_ty);
                    let tmp_ref = CoreExpr::new(CoreKind::Id(tmp), core_base.ty, pos);
                    CoreExpr::new(
                        CoreKind::Apply(
                            Box::new(CoreExpr::new(CoreKind::RecordSel(*label), sel_ty, pos)),
                            Box::new(tmp_ref),
                        ),
                        *field_ty,
                        pos,
                    )
                }
            };
            record_fields.push((*label, value));
        }
        let record = CoreExpr::new(CoreKind::Record(record_fields), ty, pos);
        let base_ty = core_base.ty;
        Ok(CoreExpr::new(
            CoreKind::Let(
                Box::new(CoreDecl::NonRec {
                    pat: CorePat::new(CorePatKind::Id(tmp), base_ty, pos),
                    exp: core_base,
                }),
                Box::new(record),
            ),
            ty,
            pos,
        ))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn lower_steps(&mut self, steps: &[TStep]) -> Result<Vec<CoreStep>, LowerError> {
        let mut out = Vec::new();
        for step in steps {
            let kind = match &step.kind {
                // `join` is the same operation as a scan once the
                // pipeline is explicit.
                TStepKind::Scan { pat, source, on }
                | TStepKind::Join { pat, source, on } => CoreStepKind::Scan {
                    pat: self.lower_pat(pat),
                    source: match source {
                        TScanSource::In(e) => CoreSource::In(self.lower_expr(e)?),
                        TScanSource::Eq(e) => CoreSource::Eq(self.lower_expr(e)?),
                    },
                    on: on.as_ref().map(|c| self.lower_expr(c)).transpose()?,
                },
                TStepKind::Where(cond) => CoreStepKind::Where(self.lower_expr(cond)?),
                TStepKind::Group { keys, computes } => CoreStepKind::Group {
                    keys: keys
                        .iter()
                        .map(|(n, e)| Ok((*n, self.lower_expr(e)?)))
                        .collect::<Result<_, LowerError>>()?,
                    computes: computes
                        .iter()
                        .map(|(n, e)| Ok((*n, self.lower_expr(e)?)))
                        .collect::<Result<_, LowerError>>()?,
                },
                TStepKind::Order(key) => CoreStepKind::Order(self.lower_expr(key)?),
                TStepKind::Take(n) => CoreStepKind::Take(self.lower_expr(n)?),
                TStepKind::Skip(n) => CoreStepKind::Skip(self.lower_expr(n)?),
                TStepKind::Yield(e) => CoreStepKind::Yield(self.lower_expr(e)?),
                TStepKind::Into(e) => CoreStepKind::Into(self.lower_expr(e)?),
                TStepKind::Through { pat, exp } => CoreStepKind::Through {
                    pat: self.lower_pat(pat),
                    exp: self.lower_expr(exp)?,
                },
                TStepKind::Union { distinct, sources } => CoreStepKind::Union {
                    distinct: *distinct,
                    sources: sources
                        .iter()
                        .map(|e| self.lower_expr(e))
                        .collect::<Result<_, _>>()?,
                },
                TStepKind::Intersect { distinct, sources } => CoreStepKind::Intersect {
                    distinct: *distinct,
                    sources: sources
                        .iter()
                        .map(|e| self.lower_expr(e))
                        .collect::<Result<_, _>>()?,
                },
                TStepKind::Except { distinct, sources } => CoreStepKind::Except {
                    distinct: *distinct,
                    sources: sources
                        .iter()
                        .map(|e| self.lower_expr(e))
                        .collect::<Result<_, _>>()?,
                },
                TStepKind::Distinct => CoreStepKind::Distinct,
                TStepKind::Unorder => CoreStepKind::Unorder,
                TStepKind::Compute(computes) => CoreStepKind::Compute(
                    computes
                        .iter()
                        .map(|(n, e)| Ok((*n, self.lower_expr(e)?)))
                        .collect::<Result<_, LowerError>>()?,
                ),
            };
            out.push(CoreStep {
                kind,
                pos: step.pos,
            });
        }
        Ok(out)
    }

    /// The `into nonEmpty` step that `exists`/`forall` desugar into
    fn non_empty_step(&mut self, steps: &[TStep], pos: Pos) -> CoreStep {
        let row_ty = self.row_type_of(steps);
        let coll_ty = self.registry.list_type(row_ty);
        let bool_ty = self.registry.bool_type();
        let fn_ty = self.registry.fn_type(coll_ty, bool_ty);
        CoreStep {
            kind: CoreStepKind::Into(CoreExpr::new(
                CoreKind::Id(Symbol::intern("nonEmpty")),
                fn_ty,
                pos,
            )),
            pos,
        }
    }

    fn apply_not(&mut self, exp: CoreExpr, pos: Pos) -> CoreExpr {
        let bool_ty = self.registry.bool_type();
        let not_ty = self.registry.fn_type(bool_ty, bool_ty);
        CoreExpr::new(
            CoreKind::Apply(
                Box::new(CoreExpr::new(
                    CoreKind::Id(Symbol::intern("not")),
                    not_ty,
                    pos,
                )),
                Box::new(exp),
            ),
            bool_ty,
            pos,
        )
    }

    /// The row type after a step sequence, mirroring the resolver's
    /// scope discipline
    fn row_type_of(&mut self, steps: &[TStep]) -> TypeId {
        let mut bindings: Vec<(Symbol, TypeId)> = Vec::new();
        let mut anonymous: Option<TypeId> = None;
        for step in steps {
            match &step.kind {
                TStepKind::Scan { pat, .. }
                | TStepKind::Join { pat, .. }
                | TStepKind::Through { pat, .. } => {
                    anonymous = None;
                    bindings.extend(pat.bound_vars());
                }
                TStepKind::Group { keys, computes } => {
                    anonymous = None;
                    bindings = keys
                        .iter()
                        .chain(computes.iter())
                        .map(|(n, e)| (*n, e.ty))
                        .collect();
                }
                TStepKind::Yield(e) => match &e.kind {
                    TExprKind::Record { fields, base: None } => {
                        anonymous = None;
                        bindings = fields
                            .iter()
                            .map(|(l, fe)| (Symbol::intern(l.as_str()), fe.ty))
                            .collect();
                    }
                    _ => {
                        bindings.clear();
                        anonymous = Some(e.ty);
                    }
                },
                _ => {}
            }
        }
        if let Some(ty) = anonymous {
            return ty;
        }
        match bindings.as_slice() {
            [] => self.registry.unit_type(),
            [(_, ty)] => *ty,
            many => {
                let fields = many
                    .iter()
                    .map(|(name, ty)| (Label::from(*name), *ty))
                    .collect();
                self.registry.record_type(fields)
            }
        }
    }

    // =========================================================================
    // Patterns
    // =========================================================================

    pub fn lower_pat(&mut self, pat: &TPat) -> CorePat {
        let ty = pat.ty;
        let pos = pat.pos;
        let kind = match &pat.kind {
            TPatKind::Wild => CorePatKind::Wild,
            TPatKind::Id(name) => CorePatKind::Id(*name),
            TPatKind::Lit(lit) => CorePatKind::Lit(lit.clone()),
            TPatKind::Cons(head, tail) => CorePatKind::Cons(
                Box::new(self.lower_pat(head)),
                Box::new(self.lower_pat(tail)),
            ),
            TPatKind::Tuple(pats) => {
                CorePatKind::Tuple(pats.iter().map(|p| self.lower_pat(p)).collect())
            }
            TPatKind::List(pats) => {
                CorePatKind::List(pats.iter().map(|p| self.lower_pat(p)).collect())
            }
            // Ellipsis patterns lower to the listed fields only;
            // matching is by label lookup.
            TPatKind::Record { fields, .. } => CorePatKind::Record(
                fields
                    .iter()
                    .map(|(l, p)| (*l, self.lower_pat(p)))
                    .collect(),
            ),
            TPatKind::Con(name, arg) => CorePatKind::Con(
                *name,
                arg.as_ref().map(|a| Box::new(self.lower_pat(a))),
            ),
            TPatKind::As(name, inner) => {
                CorePatKind::As(*name, Box::new(self.lower_pat(inner)))
            }
        };
        CorePat::new(kind, ty, pos)
    }
}
