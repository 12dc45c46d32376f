//! Inference rules for expressions, patterns, type expressions and
//! query pipelines.
//!
//! Operator typing notes:
//!
//! - `+ - *` and unary `~` work over `int` and `real`; the operand type
//!   is a deferred numeric obligation that defaults to `int`.
//! - `/` is real division; `div`/`mod` are integer.
//! - `< <= > >=` accept any ordered primitive (`int real string char`),
//!   again deferred, defaulting to `int`.
//! - `= <>` equate any two values of one type.
//! - `elem`/`notelem` relate an element to a collection of it.
//!
//! Query pipelines thread a row scope through the steps: scans add the
//! pattern's bindings, `group` replaces the scope with its key and
//! compute columns, a record `yield` replaces it with the record's
//! fields, and any other `yield` makes the row anonymous. The row
//! *value* downstream steps see is the single binding when there is
//! exactly one, otherwise a record of all bindings - the same
//! convention the evaluator applies.

use crate::error::TypeError;
use crate::tast::*;
use crate::{Deferred, EnvEntry, IdStatus, TypeResolver};
use quill_par::ast::{
    BinOp, Expr, ExprKind, Literal, MatchArm, Pat, PatKind, ScanSource, Step, StepKind, TypeExp,
    TypeExpKind,
};
use quill_typ::{NamedType, Scheme, TypeId, TypeKind};
use quill_util::symbol::{SYM_FALSE, SYM_NIL, SYM_TRUE};
use quill_util::{Label, Pos, Symbol};

/// The row bindings in scope at a point in a query pipeline
#[derive(Debug, Clone, Default)]
struct RowScope {
    bindings: Vec<(Symbol, TypeId)>,
    /// Set when a non-record `yield` made the row a bare value
    anonymous: Option<TypeId>,
}

impl RowScope {
    fn row_type(&self, resolver: &mut TypeResolver) -> TypeId {
        if let Some(ty) = self.anonymous {
            return ty;
        }
        match self.bindings.as_slice() {
            [] => resolver.registry.unit_type(),
            [(_, ty)] => *ty,
            many => {
                let fields = many
                    .iter()
                    .map(|(name, ty)| (Label::from(*name), *ty))
                    .collect();
                resolver.registry.record_type(fields)
            }
        }
    }
}

impl TypeResolver<'_> {
    // =========================================================================
    // Expressions
    // =========================================================================

    pub(crate) fn infer_expr(&mut self, exp: &Expr) -> Result<TExpr, TypeError> {
        let pos = exp.pos;
        match &exp.kind {
            ExprKind::Lit(lit) => {
                let ty = self.literal_type(lit);
                Ok(texpr(TExprKind::Lit(lit.clone()), ty, pos))
            }
            ExprKind::Id(name) => self.infer_id(*name, pos),
            ExprKind::RecordSel(label) => {
                let record = self.fresh();
                let field = self.fresh();
                self.pending.push(Deferred::Field {
                    record,
                    label: *label,
                    result: field,
                    pos,
                });
                let ty = self.registry.fn_type(record, field);
                Ok(texpr(TExprKind::RecordSel(*label), ty, pos))
            }
            ExprKind::If(c, t, f) => {
                let tc = self.infer_expr(c)?;
                let bool_ty = self.registry.bool_type();
                self.unify_at(tc.ty, bool_ty, c.pos)?;
                let tt = self.infer_expr(t)?;
                let tf = self.infer_expr(f)?;
                self.unify_at(tt.ty, tf.ty, pos)?;
                let ty = tt.ty;
                Ok(texpr(
                    TExprKind::If(Box::new(tc), Box::new(tt), Box::new(tf)),
                    ty,
                    pos,
                ))
            }
            ExprKind::Let(decls, body) => {
                self.push_scope();
                let mut tdecls = Vec::new();
                for decl in decls {
                    let (tdecl, _) = self.resolve_decl(decl)?;
                    tdecls.push(tdecl);
                }
                let tbody = self.infer_expr(body)?;
                self.pop_scope();
                let ty = tbody.ty;
                Ok(texpr(TExprKind::Let(tdecls, Box::new(tbody)), ty, pos))
            }
            ExprKind::Fn(arms) => {
                let param = self.fresh();
                let result = self.fresh();
                let tarms = self.infer_arms(arms, param, result)?;
                let ty = self.registry.fn_type(param, result);
                Ok(texpr(TExprKind::Fn(tarms), ty, pos))
            }
            ExprKind::Apply(f, arg) => {
                let tf = self.infer_expr(f)?;
                let targ = self.infer_expr(arg)?;
                let result = self.fresh();
                let expected = self.registry.fn_type(targ.ty, result);
                self.unify_at(tf.ty, expected, pos)?;
                Ok(texpr(
                    TExprKind::Apply(Box::new(tf), Box::new(targ)),
                    result,
                    pos,
                ))
            }
            ExprKind::Case(scrutinee, arms) => {
                let tscrut = self.infer_expr(scrutinee)?;
                let result = self.fresh();
                let tarms = self.infer_arms(arms, tscrut.ty, result)?;
                Ok(texpr(
                    TExprKind::Case(Box::new(tscrut), tarms),
                    result,
                    pos,
                ))
            }
            ExprKind::Tuple(exps) => {
                let texps: Vec<TExpr> = exps
                    .iter()
                    .map(|e| self.infer_expr(e))
                    .collect::<Result<_, _>>()?;
                let ty = self
                    .registry
                    .tuple_type(texps.iter().map(|t| t.ty).collect());
                Ok(texpr(TExprKind::Tuple(texps), ty, pos))
            }
            ExprKind::Record { fields, base } => self.infer_record(fields, base.as_deref(), pos),
            ExprKind::List(exps) => {
                let elem = self.fresh();
                let texps: Vec<TExpr> = exps
                    .iter()
                    .map(|e| {
                        let te = self.infer_expr(e)?;
                        self.unify_at(te.ty, elem, e.pos)?;
                        Ok(te)
                    })
                    .collect::<Result<_, TypeError>>()?;
                let ty = self.registry.list_type(elem);
                Ok(texpr(TExprKind::List(texps), ty, pos))
            }
            ExprKind::Infix(op, lhs, rhs) => self.infer_infix(*op, lhs, rhs, pos),
            ExprKind::Negate(operand) => {
                let toperand = self.infer_expr(operand)?;
                self.pending.push(Deferred::Numeric {
                    ty: toperand.ty,
                    pos,
                });
                let ty = toperand.ty;
                Ok(texpr(TExprKind::Negate(Box::new(toperand)), ty, pos))
            }
            ExprKind::Field(base, label) => {
                let tbase = self.infer_expr(base)?;
                let field = self.fresh();
                self.pending.push(Deferred::Field {
                    record: tbase.ty,
                    label: *label,
                    result: field,
                    pos,
                });
                Ok(texpr(
                    TExprKind::Field(Box::new(tbase), *label),
                    field,
                    pos,
                ))
            }
            ExprKind::Annotated(inner, ty_exp) => {
                let tinner = self.infer_expr(inner)?;
                let annotated = self.resolve_type_exp(ty_exp)?;
                self.unify_at(tinner.ty, annotated, pos)?;
                Ok(tinner)
            }
            ExprKind::From(steps) => self.infer_from(steps, pos),
            ExprKind::Exists(steps) => {
                let (tsteps, _) = self.infer_steps(steps, None)?;
                let ty = self.registry.bool_type();
                Ok(texpr(TExprKind::Exists(tsteps), ty, pos))
            }
            ExprKind::Forall(steps, cond) => {
                let (tsteps, row) = self.infer_steps(steps, None)?;
                self.push_scope();
                self.bind_row(&row.row);
                let tcond = self.infer_expr(cond)?;
                let bool_ty = self.registry.bool_type();
                self.unify_at(tcond.ty, bool_ty, cond.pos)?;
                self.pop_scope();
                Ok(texpr(
                    TExprKind::Forall(tsteps, Box::new(tcond)),
                    bool_ty,
                    pos,
                ))
            }
            ExprKind::Aggregate(agg, arg) => {
                if !self.aggregate_ok {
                    return Err(TypeError::MisplacedStep(
                        "'over' (aggregate application) is only legal in group or compute"
                            .to_string(),
                        pos,
                    ));
                }
                let (tagg, targ, result) = self.infer_aggregate(agg, arg)?;
                Ok(texpr(
                    TExprKind::Aggregate(Box::new(tagg), Box::new(targ)),
                    result,
                    pos,
                ))
            }
        }
    }

    fn literal_type(&mut self, lit: &Literal) -> TypeId {
        match lit {
            Literal::Unit => self.registry.unit_type(),
            Literal::Bool(_) => self.registry.bool_type(),
            Literal::Int(_) => self.registry.int_type(),
            Literal::Real(_) => self.registry.real_type(),
            Literal::Char(_) => self.registry.char_type(),
            Literal::Str(_) => self.registry.string_type(),
        }
    }

    fn infer_id(&mut self, name: Symbol, pos: Pos) -> Result<TExpr, TypeError> {
        if name == SYM_NIL {
            let elem = self.fresh();
            let ty = self.registry.list_type(elem);
            return Ok(texpr(TExprKind::List(Vec::new()), ty, pos));
        }
        if self.overloads.is_overloaded(name) {
            let use_ty = self.fresh();
            self.pending.push(Deferred::Overload { name, use_ty, pos });
            return Ok(texpr(TExprKind::Id(name), use_ty, pos));
        }
        match self.lookup(name) {
            Some(entry) => {
                let entry = entry.clone();
                let ty = entry.scheme.instantiate(self.registry);
                let kind = match entry.status {
                    IdStatus::Var => TExprKind::Id(name),
                    IdStatus::Ctor(_) => TExprKind::Ctor(name),
                };
                Ok(texpr(kind, ty, pos))
            }
            None => match self.ctor_scheme(name) {
                Some(scheme) => {
                    let ty = scheme.instantiate(self.registry);
                    Ok(texpr(TExprKind::Ctor(name), ty, pos))
                }
                None => Err(TypeError::UnboundId(name, pos)),
            },
        }
    }

    /// A constructor's scheme straight from the registry, for names not
    /// shadowed in the environment
    pub(crate) fn ctor_scheme(&mut self, name: Symbol) -> Option<Scheme> {
        let def = self.registry.datatype_of_ctor(name)?.clone();
        let payload = def.ctors.get(&name).copied().flatten();
        let param_tys: Vec<quill_typ::TypeId> = def
            .params
            .iter()
            .map(|p| self.registry.var_type(*p))
            .collect();
        let data_ty = self.registry.data_type(def.name, param_tys);
        let body = match payload {
            Some(p) => self.registry.fn_type(p, data_ty),
            None => data_ty,
        };
        Some(Scheme {
            vars: def.params,
            body,
        })
    }

    fn infer_record(
        &mut self,
        fields: &[(Label, Expr)],
        base: Option<&Expr>,
        pos: Pos,
    ) -> Result<TExpr, TypeError> {
        match base {
            Some(base_exp) => {
                // Functional update: the result keeps the base's type;
                // each updated field must already exist with a
                // compatible type.
                let tbase = self.infer_expr(base_exp)?;
                let mut tfields = Vec::new();
                for (label, value) in fields {
                    let tvalue = self.infer_expr(value)?;
                    self.pending.push(Deferred::Field {
                        record: tbase.ty,
                        label: *label,
                        result: tvalue.ty,
                        pos: value.pos,
                    });
                    tfields.push((*label, tvalue));
                }
                let ty = tbase.ty;
                Ok(texpr(
                    TExprKind::Record {
                        fields: tfields,
                        base: Some(Box::new(tbase)),
                    },
                    ty,
                    pos,
                ))
            }
            None => {
                let mut tfields = Vec::new();
                let mut field_tys = Vec::new();
                for (label, value) in fields {
                    let tvalue = self.infer_expr(value)?;
                    field_tys.push((*label, tvalue.ty));
                    tfields.push((*label, tvalue));
                }
                let ty = self
                    .registry
                    .record_type(field_tys.into_iter().collect());
                Ok(texpr(
                    TExprKind::Record {
                        fields: tfields,
                        base: None,
                    },
                    ty,
                    pos,
                ))
            }
        }
    }

    fn infer_arms(
        &mut self,
        arms: &[MatchArm],
        scrutinee_ty: TypeId,
        result_ty: TypeId,
    ) -> Result<Vec<TMatchArm>, TypeError> {
        let mut tarms = Vec::new();
        for arm in arms {
            self.push_scope();
            let tpat = self.infer_pat(&arm.pat)?;
            self.unify_at(tpat.ty, scrutinee_ty, arm.pat.pos)?;
            let texp = self.infer_expr(&arm.exp)?;
            self.unify_at(texp.ty, result_ty, arm.exp.pos)?;
            self.pop_scope();
            tarms.push(TMatchArm {
                pat: tpat,
                exp: texp,
                pos: arm.pos,
            });
        }
        Ok(tarms)
    }

    fn infer_infix(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: Pos,
    ) -> Result<TExpr, TypeError> {
        let tl = self.infer_expr(lhs)?;
        let tr = self.infer_expr(rhs)?;
        let bool_ty = self.registry.bool_type();
        let int_ty = self.registry.int_type();
        let real_ty = self.registry.real_type();
        let string_ty = self.registry.string_type();
        let ty = match op {
            BinOp::Implies | BinOp::Orelse | BinOp::Andalso => {
                self.unify_at(tl.ty, bool_ty, lhs.pos)?;
                self.unify_at(tr.ty, bool_ty, rhs.pos)?;
                bool_ty
            }
            BinOp::Compose => {
                // (b -> c) o (a -> b) : a -> c
                let a = self.fresh();
                let b = self.fresh();
                let c = self.fresh();
                let left = self.registry.fn_type(b, c);
                let right = self.registry.fn_type(a, b);
                self.unify_at(tl.ty, left, lhs.pos)?;
                self.unify_at(tr.ty, right, rhs.pos)?;
                self.registry.fn_type(a, c)
            }
            BinOp::Eq | BinOp::Ne => {
                self.unify_at(tl.ty, tr.ty, pos)?;
                bool_ty
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                self.unify_at(tl.ty, tr.ty, pos)?;
                self.pending.push(Deferred::Ordered { ty: tl.ty, pos });
                bool_ty
            }
            BinOp::Elem | BinOp::Notelem => {
                self.pending.push(Deferred::Coll {
                    coll: tr.ty,
                    elem: tl.ty,
                    pos,
                });
                bool_ty
            }
            BinOp::Cons => {
                let list = self.registry.list_type(tl.ty);
                self.unify_at(tr.ty, list, pos)?;
                list
            }
            BinOp::Append => {
                let elem = self.fresh();
                let list = self.registry.list_type(elem);
                self.unify_at(tl.ty, list, lhs.pos)?;
                self.unify_at(tr.ty, list, rhs.pos)?;
                list
            }
            BinOp::Plus | BinOp::Minus | BinOp::Times => {
                self.unify_at(tl.ty, tr.ty, pos)?;
                self.pending.push(Deferred::Numeric { ty: tl.ty, pos });
                tl.ty
            }
            BinOp::Divide => {
                self.unify_at(tl.ty, real_ty, lhs.pos)?;
                self.unify_at(tr.ty, real_ty, rhs.pos)?;
                real_ty
            }
            BinOp::Div | BinOp::Mod => {
                self.unify_at(tl.ty, int_ty, lhs.pos)?;
                self.unify_at(tr.ty, int_ty, rhs.pos)?;
                int_ty
            }
            BinOp::Concat => {
                self.unify_at(tl.ty, string_ty, lhs.pos)?;
                self.unify_at(tr.ty, string_ty, rhs.pos)?;
                string_ty
            }
        };
        Ok(texpr(
            TExprKind::Infix(op, Box::new(tl), Box::new(tr)),
            ty,
            pos,
        ))
    }

    /// `agg over arg`: the aggregate function consumes the list of
    /// per-row values of `arg`. The argument is elementwise, so nested
    /// aggregates are rejected.
    fn infer_aggregate(
        &mut self,
        agg: &Expr,
        arg: &Expr,
    ) -> Result<(TExpr, TExpr, TypeId), TypeError> {
        let was = self.aggregate_ok;
        self.aggregate_ok = false;
        let tagg = self.infer_expr(agg)?;
        let targ = self.infer_expr(arg)?;
        self.aggregate_ok = was;
        let result = self.fresh();
        let coll = self.registry.list_type(targ.ty);
        let expected = self.registry.fn_type(coll, result);
        self.unify_at(tagg.ty, expected, agg.pos)?;
        Ok((tagg, targ, result))
    }

    // =========================================================================
    // Patterns
    // =========================================================================

    pub(crate) fn infer_pat(&mut self, pat: &Pat) -> Result<TPat, TypeError> {
        let pos = pat.pos;
        match &pat.kind {
            PatKind::Wild => {
                let ty = self.fresh();
                Ok(tpat(TPatKind::Wild, ty, pos))
            }
            PatKind::Id(name) => self.infer_id_pat(*name, pos),
            PatKind::Lit(lit) => {
                let ty = self.literal_type(lit);
                Ok(tpat(TPatKind::Lit(lit.clone()), ty, pos))
            }
            PatKind::Cons(head, tail) => {
                let thead = self.infer_pat(head)?;
                let ttail = self.infer_pat(tail)?;
                let list = self.registry.list_type(thead.ty);
                self.unify_at(ttail.ty, list, tail.pos)?;
                Ok(tpat(
                    TPatKind::Cons(Box::new(thead), Box::new(ttail)),
                    list,
                    pos,
                ))
            }
            PatKind::Tuple(pats) => {
                let tpats: Vec<TPat> = pats
                    .iter()
                    .map(|p| self.infer_pat(p))
                    .collect::<Result<_, _>>()?;
                let ty = self
                    .registry
                    .tuple_type(tpats.iter().map(|p| p.ty).collect());
                Ok(tpat(TPatKind::Tuple(tpats), ty, pos))
            }
            PatKind::List(pats) => {
                let elem = self.fresh();
                let tpats: Vec<TPat> = pats
                    .iter()
                    .map(|p| {
                        let tp = self.infer_pat(p)?;
                        self.unify_at(tp.ty, elem, p.pos)?;
                        Ok(tp)
                    })
                    .collect::<Result<_, TypeError>>()?;
                let ty = self.registry.list_type(elem);
                Ok(tpat(TPatKind::List(tpats), ty, pos))
            }
            PatKind::Record { fields, ellipsis } => {
                let mut tfields = Vec::new();
                if *ellipsis {
                    // Row-open: the record type comes from the
                    // scrutinee; each listed field is a deferred
                    // projection.
                    let record = self.fresh();
                    for (label, p) in fields {
                        let tp = self.infer_pat(p)?;
                        self.pending.push(Deferred::Field {
                            record,
                            label: *label,
                            result: tp.ty,
                            pos: p.pos,
                        });
                        tfields.push((*label, tp));
                    }
                    Ok(tpat(
                        TPatKind::Record {
                            fields: tfields,
                            ellipsis: true,
                        },
                        record,
                        pos,
                    ))
                } else {
                    let mut field_tys = Vec::new();
                    for (label, p) in fields {
                        let tp = self.infer_pat(p)?;
                        field_tys.push((*label, tp.ty));
                        tfields.push((*label, tp));
                    }
                    let ty = self
                        .registry
                        .record_type(field_tys.into_iter().collect());
                    Ok(tpat(
                        TPatKind::Record {
                            fields: tfields,
                            ellipsis: false,
                        },
                        ty,
                        pos,
                    ))
                }
            }
            PatKind::Con(name, arg) => self.infer_con_pat(*name, arg.as_deref(), pos),
            PatKind::As(name, inner) => {
                let tinner = self.infer_pat(inner)?;
                let ty = tinner.ty;
                self.bind(*name, EnvEntry::var(Scheme::mono(ty)));
                Ok(tpat(TPatKind::As(*name, Box::new(tinner)), ty, pos))
            }
            PatKind::Annotated(inner, ty_exp) => {
                let tinner = self.infer_pat(inner)?;
                let annotated = self.resolve_type_exp(ty_exp)?;
                self.unify_at(tinner.ty, annotated, pos)?;
                Ok(tinner)
            }
        }
    }

    /// A bare identifier pattern: a nullary constructor when the name
    /// resolves to one, otherwise a fresh variable binding
    fn infer_id_pat(&mut self, name: Symbol, pos: Pos) -> Result<TPat, TypeError> {
        if name == SYM_NIL {
            let elem = self.fresh();
            let ty = self.registry.list_type(elem);
            return Ok(tpat(TPatKind::List(Vec::new()), ty, pos));
        }
        if name == SYM_TRUE {
            let ty = self.registry.bool_type();
            return Ok(tpat(TPatKind::Lit(Literal::Bool(true)), ty, pos));
        }
        if name == SYM_FALSE {
            let ty = self.registry.bool_type();
            return Ok(tpat(TPatKind::Lit(Literal::Bool(false)), ty, pos));
        }
        let ctor_scheme = match self.lookup(name) {
            Some(entry) => match entry.status {
                IdStatus::Ctor(_) => Some(entry.scheme.clone()),
                IdStatus::Var => None,
            },
            None => self.ctor_scheme(name),
        };
        if let Some(scheme) = ctor_scheme {
            let ty = scheme.instantiate(self.registry);
            return match self.registry.kind(ty).clone() {
                TypeKind::Fn(_, _) => {
                    // A payload-carrying constructor used without an
                    // argument.
                    Err(TypeError::ConstructorArityMismatch(name, pos))
                }
                _ => Ok(tpat(TPatKind::Con(name, None), ty, pos)),
            };
        }
        let ty = self.fresh();
        self.bind(name, EnvEntry::var(Scheme::mono(ty)));
        Ok(tpat(TPatKind::Id(name), ty, pos))
    }

    fn infer_con_pat(
        &mut self,
        name: Symbol,
        arg: Option<&Pat>,
        pos: Pos,
    ) -> Result<TPat, TypeError> {
        let scheme = match self.lookup(name) {
            Some(entry) => {
                if !matches!(entry.status, IdStatus::Ctor(_)) {
                    return Err(TypeError::NotAConstructor(name, pos));
                }
                entry.scheme.clone()
            }
            None => match self.ctor_scheme(name) {
                Some(scheme) => scheme,
                None => return Err(TypeError::UnboundId(name, pos)),
            },
        };
        let ty = scheme.instantiate(self.registry);
        match (self.registry.kind(ty).clone(), arg) {
            (TypeKind::Fn(payload, data), Some(arg_pat)) => {
                let targ = self.infer_pat(arg_pat)?;
                self.unify_at(targ.ty, payload, arg_pat.pos)?;
                Ok(tpat(TPatKind::Con(name, Some(Box::new(targ))), data, pos))
            }
            (TypeKind::Fn(_, _), None) | (_, Some(_)) => {
                Err(TypeError::ConstructorArityMismatch(name, pos))
            }
            (_, None) => Ok(tpat(TPatKind::Con(name, None), ty, pos)),
        }
    }

    // =========================================================================
    // Type expressions
    // =========================================================================

    pub(crate) fn resolve_type_exp(&mut self, ty_exp: &TypeExp) -> Result<TypeId, TypeError> {
        let pos = ty_exp.pos;
        match &ty_exp.kind {
            TypeExpKind::Var(name) => {
                let var = match self.tyvar_scope.get(name) {
                    Some(var) => *var,
                    None => {
                        let fresh = self.registry.fresh_tyvar();
                        self.tyvar_scope.insert(*name, fresh);
                        fresh
                    }
                };
                Ok(self.registry.var_type(var))
            }
            TypeExpKind::Named(args, name) => {
                let arg_tys: Vec<TypeId> = args
                    .iter()
                    .map(|a| self.resolve_type_exp(a))
                    .collect::<Result<_, _>>()?;
                match self.registry.lookup_opt(*name) {
                    Some(NamedType::Primitive(p)) => {
                        if !arg_tys.is_empty() {
                            return Err(TypeError::TypeArityMismatch {
                                name: *name,
                                expected: 0,
                                actual: arg_tys.len(),
                                pos,
                            });
                        }
                        Ok(self.registry.primitive(p))
                    }
                    Some(NamedType::List) => {
                        self.expect_type_args(*name, 1, &arg_tys, pos)?;
                        Ok(self.registry.list_type(arg_tys[0]))
                    }
                    Some(NamedType::Bag) => {
                        self.expect_type_args(*name, 1, &arg_tys, pos)?;
                        Ok(self.registry.bag_type(arg_tys[0]))
                    }
                    Some(NamedType::Vector) => {
                        self.expect_type_args(*name, 1, &arg_tys, pos)?;
                        Ok(self.registry.vector_type(arg_tys[0]))
                    }
                    Some(NamedType::Data(data_name)) => {
                        let arity = self
                            .registry
                            .datatype(data_name)
                            .map(|d| d.arity())
                            .unwrap_or(0);
                        self.expect_type_args(*name, arity, &arg_tys, pos)?;
                        Ok(self.registry.data_type(data_name, arg_tys))
                    }
                    Some(NamedType::Alias(alias_name)) => self
                        .registry
                        .apply_alias(alias_name, &arg_tys)
                        .ok_or_else(|| TypeError::TypeArityMismatch {
                            name: *name,
                            expected: self
                                .registry
                                .alias(alias_name)
                                .map(|a| a.params.len())
                                .unwrap_or(0),
                            actual: arg_tys.len(),
                            pos,
                        }),
                    None => Err(TypeError::UnboundType(*name, pos)),
                }
            }
            TypeExpKind::Record(fields) => {
                let mut resolved = Vec::new();
                for (label, field_ty) in fields {
                    resolved.push((*label, self.resolve_type_exp(field_ty)?));
                }
                Ok(self.registry.record_type(resolved.into_iter().collect()))
            }
            TypeExpKind::Tuple(parts) => {
                let part_tys: Vec<TypeId> = parts
                    .iter()
                    .map(|p| self.resolve_type_exp(p))
                    .collect::<Result<_, _>>()?;
                Ok(self.registry.tuple_type(part_tys))
            }
            TypeExpKind::Fn(param, result) => {
                let param_ty = self.resolve_type_exp(param)?;
                let result_ty = self.resolve_type_exp(result)?;
                Ok(self.registry.fn_type(param_ty, result_ty))
            }
            TypeExpKind::Composite(parts) => match parts.as_slice() {
                [single] => self.resolve_type_exp(single),
                _ => Err(TypeError::TypeMismatch {
                    expected: "a type".to_string(),
                    actual: "a type sequence without a constructor".to_string(),
                    pos,
                }),
            },
            TypeExpKind::Expression(exp) => {
                // `typeof e`: infer the expression's type without ever
                // evaluating it. The typed tree is discarded.
                let texp = self.infer_expr(exp)?;
                Ok(texp.ty)
            }
        }
    }

    fn expect_type_args(
        &self,
        name: Symbol,
        expected: usize,
        actual: &[TypeId],
        pos: Pos,
    ) -> Result<(), TypeError> {
        if actual.len() == expected {
            Ok(())
        } else {
            Err(TypeError::TypeArityMismatch {
                name,
                expected,
                actual: actual.len(),
                pos,
            })
        }
    }

    // =========================================================================
    // Query pipelines
    // =========================================================================

    fn infer_from(&mut self, steps: &[Step], pos: Pos) -> Result<TExpr, TypeError> {
        let (tsteps, outcome) = self.infer_steps(steps, Some(pos))?;
        let ty = match outcome.scalar {
            Some(scalar) => scalar,
            None => {
                let row_ty = outcome.row.row_type(self);
                let result = self.fresh();
                self.pending.push(Deferred::QueryShape {
                    result,
                    row: row_ty,
                    sources: outcome.sources,
                    forced: outcome.forced,
                    pos,
                });
                result
            }
        };
        Ok(texpr(TExprKind::From(tsteps), ty, pos))
    }

    fn bind_row(&mut self, row: &RowScope) {
        for (name, ty) in &row.bindings {
            self.bind(*name, EnvEntry::var(Scheme::mono(*ty)));
        }
    }

    /// Walk a step sequence, threading the row scope
    fn infer_steps(
        &mut self,
        steps: &[Step],
        _from_pos: Option<Pos>,
    ) -> Result<(Vec<TStep>, StepOutcome), TypeError> {
        let mut row = RowScope::default();
        let mut sources: Vec<TypeId> = Vec::new();
        let mut forced: Option<bool> = None;
        let mut scalar: Option<TypeId> = None;
        let mut tsteps = Vec::new();
        self.push_scope();
        for step in steps {
            if let Some(_done) = scalar {
                self.pop_scope();
                return Err(TypeError::MisplacedStep(
                    "steps cannot follow 'into' or 'compute'".to_string(),
                    step.pos,
                ));
            }
            let kind = match &step.kind {
                StepKind::Scan { pat, source, on }
                | StepKind::Join { pat, source, on } => {
                    let (tsource, elem) = match source {
                        ScanSource::In(src) => {
                            let tsrc = self.infer_expr(src)?;
                            let elem = self.fresh();
                            self.pending.push(Deferred::Coll {
                                coll: tsrc.ty,
                                elem,
                                pos: src.pos,
                            });
                            sources.push(tsrc.ty);
                            (TScanSource::In(tsrc), elem)
                        }
                        ScanSource::Eq(src) => {
                            let tsrc = self.infer_expr(src)?;
                            let elem = tsrc.ty;
                            (TScanSource::Eq(tsrc), elem)
                        }
                    };
                    let tpat = self.infer_pat(pat)?;
                    self.unify_at(tpat.ty, elem, pat.pos)?;
                    row.anonymous = None;
                    row.bindings.extend(tpat.bound_vars());
                    let ton = match on {
                        Some(cond) => {
                            let tcond = self.infer_expr(cond)?;
                            let bool_ty = self.registry.bool_type();
                            self.unify_at(tcond.ty, bool_ty, cond.pos)?;
                            Some(tcond)
                        }
                        None => None,
                    };
                    if matches!(step.kind, StepKind::Join { .. }) {
                        TStepKind::Join {
                            pat: tpat,
                            source: tsource,
                            on: ton,
                        }
                    } else {
                        TStepKind::Scan {
                            pat: tpat,
                            source: tsource,
                            on: ton,
                        }
                    }
                }
                StepKind::Where(cond) => {
                    let tcond = self.infer_expr(cond)?;
                    let bool_ty = self.registry.bool_type();
                    self.unify_at(tcond.ty, bool_ty, cond.pos)?;
                    TStepKind::Where(tcond)
                }
                StepKind::Group { key, compute } => {
                    let keys = self.infer_named_columns(key, "group key")?;
                    let computes = match compute {
                        Some(compute_exp) => {
                            self.infer_named_columns(compute_exp, "compute column")?
                        }
                        None => Vec::new(),
                    };
                    // The scope after grouping is the keys plus the
                    // aggregates; grouping destroys source order.
                    row.bindings = keys
                        .iter()
                        .chain(computes.iter())
                        .map(|(name, texp)| (*name, texp.ty))
                        .collect();
                    row.anonymous = None;
                    forced = Some(false);
                    TStepKind::Group { keys, computes }
                }
                StepKind::Compute(compute_exp) => {
                    let computes = self.infer_named_columns(compute_exp, "compute column")?;
                    let result = match computes.as_slice() {
                        [(_, single)] => single.ty,
                        many => {
                            let fields = many
                                .iter()
                                .map(|(name, texp)| (Label::from(*name), texp.ty))
                                .collect();
                            self.registry.record_type(fields)
                        }
                    };
                    scalar = Some(result);
                    TStepKind::Compute(computes)
                }
                StepKind::Order(key) => {
                    let tkey = self.infer_expr(key)?;
                    self.pending.push(Deferred::Ordered {
                        ty: tkey.ty,
                        pos: key.pos,
                    });
                    forced = Some(true);
                    TStepKind::Order(tkey)
                }
                StepKind::Take(n) => {
                    let tn = self.infer_expr(n)?;
                    let int_ty = self.registry.int_type();
                    self.unify_at(tn.ty, int_ty, n.pos)?;
                    TStepKind::Take(tn)
                }
                StepKind::Skip(n) => {
                    let tn = self.infer_expr(n)?;
                    let int_ty = self.registry.int_type();
                    self.unify_at(tn.ty, int_ty, n.pos)?;
                    TStepKind::Skip(tn)
                }
                StepKind::Yield(value) => {
                    let tvalue = self.infer_expr(value)?;
                    match (&value.kind, &tvalue.kind) {
                        (ExprKind::Record { base: None, .. }, TExprKind::Record { fields, .. }) => {
                            row.bindings = fields
                                .iter()
                                .map(|(label, texp)| (Symbol::intern(label.as_str()), texp.ty))
                                .collect();
                            row.anonymous = None;
                        }
                        _ => {
                            row.bindings.clear();
                            row.anonymous = Some(tvalue.ty);
                        }
                    }
                    TStepKind::Yield(tvalue)
                }
                StepKind::Into(target) => {
                    let row_ty = row.row_type(self);
                    let ttarget = self.infer_expr(target)?;
                    let coll = self.fresh();
                    self.pending.push(Deferred::Coll {
                        coll,
                        elem: row_ty,
                        pos: target.pos,
                    });
                    let result = self.fresh();
                    let expected = self.registry.fn_type(coll, result);
                    self.unify_at(ttarget.ty, expected, target.pos)?;
                    scalar = Some(result);
                    TStepKind::Into(ttarget)
                }
                StepKind::Through { pat, exp } => {
                    let row_ty = row.row_type(self);
                    let texp = self.infer_expr(exp)?;
                    let coll_in = self.fresh();
                    self.pending.push(Deferred::Coll {
                        coll: coll_in,
                        elem: row_ty,
                        pos: exp.pos,
                    });
                    let elem_out = self.fresh();
                    let coll_out = self.fresh();
                    self.pending.push(Deferred::Coll {
                        coll: coll_out,
                        elem: elem_out,
                        pos: exp.pos,
                    });
                    let expected = self.registry.fn_type(coll_in, coll_out);
                    self.unify_at(texp.ty, expected, exp.pos)?;
                    let tpat = self.infer_pat(pat)?;
                    self.unify_at(tpat.ty, elem_out, pat.pos)?;
                    row.bindings = tpat.bound_vars();
                    row.anonymous = None;
                    TStepKind::Through { pat: tpat, exp: texp }
                }
                StepKind::Union { distinct, sources: exps } => {
                    let kind = self.infer_setop(exps, &row)?;
                    forced = Some(false);
                    TStepKind::Union {
                        distinct: *distinct,
                        sources: kind,
                    }
                }
                StepKind::Intersect { distinct, sources: exps } => {
                    let kind = self.infer_setop(exps, &row)?;
                    forced = Some(false);
                    TStepKind::Intersect {
                        distinct: *distinct,
                        sources: kind,
                    }
                }
                StepKind::Except { distinct, sources: exps } => {
                    let kind = self.infer_setop(exps, &row)?;
                    forced = Some(false);
                    TStepKind::Except {
                        distinct: *distinct,
                        sources: kind,
                    }
                }
                StepKind::Distinct => TStepKind::Distinct,
                StepKind::Unorder => {
                    forced = Some(false);
                    TStepKind::Unorder
                }
                StepKind::Require(_) => {
                    // The parser only admits `require` inside `forall`,
                    // where it is carried on the Forall node itself.
                    return Err(TypeError::MisplacedStep("require".to_string(), step.pos));
                }
            };
            // Rebind the row scope after every step so later steps see
            // exactly the current bindings.
            self.pop_scope();
            self.push_scope();
            self.bind_row(&row);
            tsteps.push(TStep {
                kind,
                pos: step.pos,
            });
        }
        self.pop_scope();
        Ok((
            tsteps,
            StepOutcome {
                row,
                sources,
                forced,
                scalar,
            },
        ))
    }

    fn infer_setop(&mut self, exps: &[Expr], row: &RowScope) -> Result<Vec<TExpr>, TypeError> {
        let row_ty = row.clone().row_type(self);
        let mut texps = Vec::new();
        for exp in exps {
            let texp = self.infer_expr(exp)?;
            self.pending.push(Deferred::Coll {
                coll: texp.ty,
                elem: row_ty,
                pos: exp.pos,
            });
            texps.push(texp);
        }
        Ok(texps)
    }

    /// Columns of a `group` key or `compute`: a record expression gives
    /// one named column per field; otherwise the single column's name is
    /// derived from the expression (a variable or field selection)
    fn infer_named_columns(
        &mut self,
        exp: &Expr,
        what: &str,
    ) -> Result<Vec<(Symbol, TExpr)>, TypeError> {
        let was = self.aggregate_ok;
        self.aggregate_ok = true;
        let result: Result<Vec<(Symbol, TExpr)>, TypeError> = (|| {
            if let ExprKind::Record { fields, base: None } = &exp.kind {
                let mut columns = Vec::new();
                for (label, value) in fields {
                    let tvalue = self.infer_expr(value)?;
                    columns.push((Symbol::intern(label.as_str()), tvalue));
                }
                return Ok(columns);
            }
            let name = derive_column_name(exp).ok_or_else(|| {
                TypeError::MisplacedStep(
                    format!("{} must be a record, a variable or a field selection", what),
                    exp.pos,
                )
            })?;
            let texp = self.infer_expr(exp)?;
            Ok(vec![(name, texp)])
        })();
        self.aggregate_ok = was;
        result
    }
}

/// Result of walking a step sequence
struct StepOutcome {
    row: RowScope,
    sources: Vec<TypeId>,
    forced: Option<bool>,
    scalar: Option<TypeId>,
}

/// Derive the implicit column name for a bare group/compute expression
fn derive_column_name(exp: &Expr) -> Option<Symbol> {
    match &exp.kind {
        ExprKind::Id(name) => Some(*name),
        ExprKind::Field(_, label) => Some(Symbol::intern(label.as_str())),
        ExprKind::Apply(f, _) => derive_column_name(f),
        ExprKind::Aggregate(agg, _) => derive_column_name(agg),
        ExprKind::RecordSel(label) => Some(Symbol::intern(label.as_str())),
        _ => None,
    }
}

fn texpr(kind: TExprKind, ty: TypeId, pos: Pos) -> TExpr {
    TExpr { kind, ty, pos }
}

fn tpat(kind: TPatKind, ty: TypeId, pos: Pos) -> TPat {
    TPat { kind, ty, pos }
}
