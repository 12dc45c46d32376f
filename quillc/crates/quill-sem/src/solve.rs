//! Deferred-constraint solving and the final rewrite pass.
//!
//! The main inference walk unifies what it can and queues the rest as
//! [`Deferred`] obligations. This module drives them to a fixed point:
//! each round attempts every obligation against the current
//! substitution; when a round makes no progress a single *default* is
//! applied (an unconstrained collection becomes a `list`, an
//! unconstrained numeric becomes `int`, an unconstrained ordered
//! operand becomes `int`) and solving resumes. Obligations that survive
//! the fixed point are errors: a field selection whose record never
//! materialized is `UnguardedTypevar`, an overloaded use that no
//! instance matches is `NoMatchingInstance`.
//!
//! The rewrite pass then rebuilds the typed tree with every node's type
//! resolved through the final substitution, and replaces overloaded
//! `Id` nodes with the instance selection recorded while solving.

use crate::error::TypeError;
use crate::tast::*;
use crate::{Deferred, TypeResolver};
use quill_typ::{PrimType, TypeKind};

impl TypeResolver<'_> {
    /// Solve all deferred obligations to a fixed point
    pub(crate) fn solve_pending(&mut self) -> Result<(), TypeError> {
        loop {
            let mut progress = false;
            let mut remaining = Vec::new();
            let pending = std::mem::take(&mut self.pending);
            for item in pending {
                match self.try_solve(item)? {
                    None => progress = true,
                    Some(item) => remaining.push(item),
                }
            }
            self.pending = remaining;
            if self.pending.is_empty() {
                return Ok(());
            }
            if progress {
                continue;
            }
            if !self.apply_default()? {
                break;
            }
        }
        // Whatever survives has no solution.
        let leftover = self.pending.clone();
        for item in &leftover {
            match item {
                Deferred::Overload { name, use_ty, pos } => {
                    // Ambiguous to the end: commit the first matching
                    // instance deterministically.
                    let resolved = self.subst.resolve(self.registry, *use_ty);
                    let instances = self.overloads.instances(*name).to_vec();
                    let mut committed = false;
                    for (index, scheme) in instances.iter().enumerate() {
                        let candidate = scheme.instantiate(self.registry);
                        if self.unify_at(resolved, candidate, *pos).is_ok() {
                            self.overload_picks.insert(*use_ty, index);
                            committed = true;
                            break;
                        }
                    }
                    if !committed {
                        return Err(TypeError::NoMatchingInstance {
                            name: *name,
                            ty: self.registry.display(resolved),
                            pos: *pos,
                        });
                    }
                }
                Deferred::Field { pos, .. } => return Err(TypeError::UnguardedTypevar(*pos)),
                Deferred::Coll { pos, .. }
                | Deferred::Numeric { pos, .. }
                | Deferred::Ordered { pos, .. }
                | Deferred::QueryShape { pos, .. } => {
                    return Err(TypeError::UnguardedTypevar(*pos))
                }
            }
        }
        self.pending.clear();
        Ok(())
    }

    /// Attempt one obligation; `Ok(None)` means solved, `Ok(Some)` means
    /// not yet decidable
    fn try_solve(&mut self, item: Deferred) -> Result<Option<Deferred>, TypeError> {
        match item {
            Deferred::Field {
                record,
                label,
                result,
                pos,
            } => {
                let resolved = self.subst.resolve(self.registry, record);
                match self.registry.kind(resolved).clone() {
                    TypeKind::Var(_) => Ok(Some(Deferred::Field {
                        record,
                        label,
                        result,
                        pos,
                    })),
                    TypeKind::Record(fields) => match fields.get(&label) {
                        Some(field_ty) => {
                            self.unify_at(result, *field_ty, pos)?;
                            Ok(None)
                        }
                        None => Err(TypeError::NoSuchField {
                            field: label.to_string(),
                            ty: self.registry.display(resolved),
                            pos,
                        }),
                    },
                    TypeKind::Tuple(parts) => {
                        let index = label
                            .as_ordinal()
                            .and_then(|i| parts.get(i as usize - 1).copied());
                        match index {
                            Some(part_ty) => {
                                self.unify_at(result, part_ty, pos)?;
                                Ok(None)
                            }
                            None => Err(TypeError::NoSuchField {
                                field: label.to_string(),
                                ty: self.registry.display(resolved),
                                pos,
                            }),
                        }
                    }
                    _ => Err(TypeError::NoSuchField {
                        field: label.to_string(),
                        ty: self.registry.display(resolved),
                        pos,
                    }),
                }
            }
            Deferred::Coll { coll, elem, pos } => {
                let resolved = self.subst.resolve(self.registry, coll);
                match self.registry.kind(resolved).clone() {
                    TypeKind::Var(_) => Ok(Some(Deferred::Coll { coll, elem, pos })),
                    TypeKind::List(t) | TypeKind::Bag(t) | TypeKind::Vector(t) => {
                        self.unify_at(elem, t, pos)?;
                        Ok(None)
                    }
                    _ => Err(TypeError::TypeMismatch {
                        expected: "a list, bag or vector".to_string(),
                        actual: self.registry.display(resolved),
                        pos,
                    }),
                }
            }
            Deferred::Numeric { ty, pos } => {
                let resolved = self.subst.resolve(self.registry, ty);
                match self.registry.kind(resolved) {
                    TypeKind::Var(_) => Ok(Some(Deferred::Numeric { ty, pos })),
                    TypeKind::Primitive(PrimType::Int) | TypeKind::Primitive(PrimType::Real) => {
                        Ok(None)
                    }
                    _ => Err(TypeError::TypeMismatch {
                        expected: "int or real".to_string(),
                        actual: self.registry.display(resolved),
                        pos,
                    }),
                }
            }
            Deferred::Ordered { ty, pos } => {
                let resolved = self.subst.resolve(self.registry, ty);
                match self.registry.kind(resolved) {
                    TypeKind::Var(_) => Ok(Some(Deferred::Ordered { ty, pos })),
                    TypeKind::Primitive(
                        PrimType::Int | PrimType::Real | PrimType::String | PrimType::Char,
                    ) => Ok(None),
                    _ => Err(TypeError::TypeMismatch {
                        expected: "int, real, string or char".to_string(),
                        actual: self.registry.display(resolved),
                        pos,
                    }),
                }
            }
            Deferred::Overload { name, use_ty, pos } => {
                let resolved = self.subst.resolve(self.registry, use_ty);
                let instances = self.overloads.instances(name).to_vec();
                if instances.is_empty() {
                    return Err(TypeError::NoMatchingInstance {
                        name,
                        ty: self.registry.display(resolved),
                        pos,
                    });
                }
                // Count instances whose type can still match.
                let mut matching = Vec::new();
                for (index, scheme) in instances.iter().enumerate() {
                    let candidate = scheme.instantiate(self.registry);
                    let left = self.subst.resolve(self.registry, resolved);
                    if quill_typ::unify(self.registry, vec![(left, candidate)]).is_ok() {
                        matching.push((index, candidate));
                    }
                }
                match matching.as_slice() {
                    [] => Err(TypeError::NoMatchingInstance {
                        name,
                        ty: self.registry.display(resolved),
                        pos,
                    }),
                    [(index, candidate)] => {
                        self.unify_at(resolved, *candidate, pos)?;
                        self.overload_picks.insert(use_ty, *index);
                        Ok(None)
                    }
                    _ => Ok(Some(Deferred::Overload { name, use_ty, pos })),
                }
            }
            Deferred::QueryShape {
                result,
                row,
                sources,
                forced,
                pos,
            } => {
                let ordered = match forced {
                    Some(answer) => answer,
                    None => {
                        let mut all_known = true;
                        let mut any_bag = false;
                        for source in &sources {
                            let resolved = self.subst.resolve(self.registry, *source);
                            match self.registry.kind(resolved) {
                                TypeKind::Var(_) => all_known = false,
                                TypeKind::Bag(_) => any_bag = true,
                                _ => {}
                            }
                        }
                        if !all_known {
                            return Ok(Some(Deferred::QueryShape {
                                result,
                                row,
                                sources,
                                forced,
                                pos,
                            }));
                        }
                        !any_bag
                    }
                };
                let row_resolved = self.subst.resolve(self.registry, row);
                let coll = if ordered {
                    self.registry.list_type(row_resolved)
                } else {
                    self.registry.bag_type(row_resolved)
                };
                self.unify_at(result, coll, pos)?;
                Ok(None)
            }
        }
    }

    /// Apply one defaulting rule; true when something was defaulted
    fn apply_default(&mut self) -> Result<bool, TypeError> {
        let int_ty = self.registry.int_type();
        // Collections first: resolving a source can unblock fields and
        // query shapes.
        let pending = self.pending.clone();
        for item in &pending {
            if let Deferred::Coll { coll, elem, pos } = item {
                let resolved = self.subst.resolve(self.registry, *coll);
                if matches!(self.registry.kind(resolved), TypeKind::Var(_)) {
                    let elem_resolved = self.subst.resolve(self.registry, *elem);
                    let list = self.registry.list_type(elem_resolved);
                    self.unify_at(resolved, list, *pos)?;
                    return Ok(true);
                }
            }
        }
        for item in &pending {
            match item {
                Deferred::Numeric { ty, pos } | Deferred::Ordered { ty, pos } => {
                    let resolved = self.subst.resolve(self.registry, *ty);
                    if matches!(self.registry.kind(resolved), TypeKind::Var(_)) {
                        self.unify_at(resolved, int_ty, *pos)?;
                        return Ok(true);
                    }
                }
                _ => {}
            }
        }
        Ok(false)
    }

    // =========================================================================
    // Rewrite
    // =========================================================================

    pub(crate) fn rewrite_decl(&mut self, decl: TDecl) -> TDecl {
        let kind = match decl.kind {
            TDeclKind::Val { rec, binds } => TDeclKind::Val {
                rec,
                binds: binds
                    .into_iter()
                    .map(|b| self.rewrite_val_bind(b))
                    .collect(),
            },
            TDeclKind::Fun(funbinds) => TDeclKind::Fun(
                funbinds
                    .into_iter()
                    .map(|fb| TFunBind {
                        name: fb.name,
                        clauses: fb
                            .clauses
                            .into_iter()
                            .map(|(pats, body)| {
                                (
                                    pats.into_iter().map(|p| self.rewrite_pat(p)).collect(),
                                    self.rewrite_expr(body),
                                )
                            })
                            .collect(),
                        ty: self.subst.resolve(self.registry, fb.ty),
                        pos: fb.pos,
                    })
                    .collect(),
            ),
            TDeclKind::Inst(name, bind) => {
                TDeclKind::Inst(name, Box::new(self.rewrite_val_bind(*bind)))
            }
            other @ (TDeclKind::Datatype(_) | TDeclKind::TypeAlias(_) | TDeclKind::Over(_)) => {
                other
            }
        };
        TDecl {
            kind,
            pos: decl.pos,
        }
    }

    fn rewrite_val_bind(&mut self, bind: TValBind) -> TValBind {
        TValBind {
            pat: self.rewrite_pat(bind.pat),
            exp: self.rewrite_expr(bind.exp),
            pos: bind.pos,
        }
    }

    fn rewrite_expr(&mut self, exp: TExpr) -> TExpr {
        let ty = self.subst.resolve(self.registry, exp.ty);
        let kind = match exp.kind {
            TExprKind::Id(name) => {
                // An overloaded use becomes the instance selection that
                // solving committed for this use site.
                match self.overload_picks.get(&exp.ty) {
                    Some(index) => TExprKind::OverloadedUse {
                        name,
                        index: *index,
                    },
                    None => TExprKind::Id(name),
                }
            }
            TExprKind::Lit(lit) => TExprKind::Lit(lit),
            TExprKind::Ctor(name) => TExprKind::Ctor(name),
            TExprKind::OverloadedUse { name, index } => TExprKind::OverloadedUse { name, index },
            TExprKind::RecordSel(label) => TExprKind::RecordSel(label),
            TExprKind::If(c, t, f) => TExprKind::If(
                Box::new(self.rewrite_expr(*c)),
                Box::new(self.rewrite_expr(*t)),
                Box::new(self.rewrite_expr(*f)),
            ),
            TExprKind::Let(decls, body) => {
                let decls = decls.into_iter().map(|d| self.rewrite_decl(d)).collect();
                TExprKind::Let(decls, Box::new(self.rewrite_expr(*body)))
            }
            TExprKind::Fn(arms) => {
                TExprKind::Fn(arms.into_iter().map(|a| self.rewrite_arm(a)).collect())
            }
            TExprKind::Apply(f, arg) => TExprKind::Apply(
                Box::new(self.rewrite_expr(*f)),
                Box::new(self.rewrite_expr(*arg)),
            ),
            TExprKind::Case(scrutinee, arms) => TExprKind::Case(
                Box::new(self.rewrite_expr(*scrutinee)),
                arms.into_iter().map(|a| self.rewrite_arm(a)).collect(),
            ),
            TExprKind::Tuple(exps) => {
                TExprKind::Tuple(exps.into_iter().map(|e| self.rewrite_expr(e)).collect())
            }
            TExprKind::Record { fields, base } => TExprKind::Record {
                fields: fields
                    .into_iter()
                    .map(|(l, e)| (l, self.rewrite_expr(e)))
                    .collect(),
                base: base.map(|b| Box::new(self.rewrite_expr(*b))),
            },
            TExprKind::List(exps) => {
                TExprKind::List(exps.into_iter().map(|e| self.rewrite_expr(e)).collect())
            }
            TExprKind::Infix(op, lhs, rhs) => TExprKind::Infix(
                op,
                Box::new(self.rewrite_expr(*lhs)),
                Box::new(self.rewrite_expr(*rhs)),
            ),
            TExprKind::Negate(operand) => {
                TExprKind::Negate(Box::new(self.rewrite_expr(*operand)))
            }
            TExprKind::Field(base, label) => {
                TExprKind::Field(Box::new(self.rewrite_expr(*base)), label)
            }
            TExprKind::From(steps) => {
                TExprKind::From(steps.into_iter().map(|s| self.rewrite_step(s)).collect())
            }
            TExprKind::Exists(steps) => {
                TExprKind::Exists(steps.into_iter().map(|s| self.rewrite_step(s)).collect())
            }
            TExprKind::Forall(steps, cond) => TExprKind::Forall(
                steps.into_iter().map(|s| self.rewrite_step(s)).collect(),
                Box::new(self.rewrite_expr(*cond)),
            ),
            TExprKind::Aggregate(agg, arg) => TExprKind::Aggregate(
                Box::new(self.rewrite_expr(*agg)),
                Box::new(self.rewrite_expr(*arg)),
            ),
        };
        TExpr {
            kind,
            ty,
            pos: exp.pos,
        }
    }

    fn rewrite_arm(&mut self, arm: TMatchArm) -> TMatchArm {
        TMatchArm {
            pat: self.rewrite_pat(arm.pat),
            exp: self.rewrite_expr(arm.exp),
            pos: arm.pos,
        }
    }

    fn rewrite_step(&mut self, step: TStep) -> TStep {
        let kind = match step.kind {
            TStepKind::Scan { pat, source, on } => TStepKind::Scan {
                pat: self.rewrite_pat(pat),
                source: self.rewrite_source(source),
                on: on.map(|c| self.rewrite_expr(c)),
            },
            TStepKind::Join { pat, source, on } => TStepKind::Join {
                pat: self.rewrite_pat(pat),
                source: self.rewrite_source(source),
                on: on.map(|c| self.rewrite_expr(c)),
            },
            TStepKind::Where(cond) => TStepKind::Where(self.rewrite_expr(cond)),
            TStepKind::Group { keys, computes } => TStepKind::Group {
                keys: keys
                    .into_iter()
                    .map(|(n, e)| (n, self.rewrite_expr(e)))
                    .collect(),
                computes: computes
                    .into_iter()
                    .map(|(n, e)| (n, self.rewrite_expr(e)))
                    .collect(),
            },
            TStepKind::Order(key) => TStepKind::Order(self.rewrite_expr(key)),
            TStepKind::Take(n) => TStepKind::Take(self.rewrite_expr(n)),
            TStepKind::Skip(n) => TStepKind::Skip(self.rewrite_expr(n)),
            TStepKind::Yield(e) => TStepKind::Yield(self.rewrite_expr(e)),
            TStepKind::Into(e) => TStepKind::Into(self.rewrite_expr(e)),
            TStepKind::Through { pat, exp } => TStepKind::Through {
                pat: self.rewrite_pat(pat),
                exp: self.rewrite_expr(exp),
            },
            TStepKind::Union { distinct, sources } => TStepKind::Union {
                distinct,
                sources: sources.into_iter().map(|e| self.rewrite_expr(e)).collect(),
            },
            TStepKind::Intersect { distinct, sources } => TStepKind::Intersect {
                distinct,
                sources: sources.into_iter().map(|e| self.rewrite_expr(e)).collect(),
            },
            TStepKind::Except { distinct, sources } => TStepKind::Except {
                distinct,
                sources: sources.into_iter().map(|e| self.rewrite_expr(e)).collect(),
            },
            TStepKind::Distinct => TStepKind::Distinct,
            TStepKind::Unorder => TStepKind::Unorder,
            TStepKind::Compute(computes) => TStepKind::Compute(
                computes
                    .into_iter()
                    .map(|(n, e)| (n, self.rewrite_expr(e)))
                    .collect(),
            ),
        };
        TStep {
            kind,
            pos: step.pos,
        }
    }

    fn rewrite_source(&mut self, source: TScanSource) -> TScanSource {
        match source {
            TScanSource::In(e) => TScanSource::In(self.rewrite_expr(e)),
            TScanSource::Eq(e) => TScanSource::Eq(self.rewrite_expr(e)),
        }
    }

    pub(crate) fn rewrite_pat(&mut self, pat: TPat) -> TPat {
        let ty = self.subst.resolve(self.registry, pat.ty);
        let kind = match pat.kind {
            TPatKind::Wild => TPatKind::Wild,
            TPatKind::Id(name) => TPatKind::Id(name),
            TPatKind::Lit(lit) => TPatKind::Lit(lit),
            TPatKind::Cons(head, tail) => TPatKind::Cons(
                Box::new(self.rewrite_pat(*head)),
                Box::new(self.rewrite_pat(*tail)),
            ),
            TPatKind::Tuple(pats) => {
                TPatKind::Tuple(pats.into_iter().map(|p| self.rewrite_pat(p)).collect())
            }
            TPatKind::List(pats) => {
                TPatKind::List(pats.into_iter().map(|p| self.rewrite_pat(p)).collect())
            }
            TPatKind::Record { fields, ellipsis } => TPatKind::Record {
                fields: fields
                    .into_iter()
                    .map(|(l, p)| (l, self.rewrite_pat(p)))
                    .collect(),
                ellipsis,
            },
            TPatKind::Con(name, arg) => {
                TPatKind::Con(name, arg.map(|a| Box::new(self.rewrite_pat(*a))))
            }
            TPatKind::As(name, inner) => TPatKind::As(name, Box::new(self.rewrite_pat(*inner))),
        };
        TPat {
            kind,
            ty,
            pos: pat.pos,
        }
    }
}
