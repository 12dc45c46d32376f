//! quill-sem - The Type Resolver
//!
//! ============================================================================
//! TYPE INFERENCE OVERVIEW
//! ============================================================================
//!
//! Hindley-Milner inference over the surface AST, producing the typed
//! tree in [`tast`]. The aim is principal types: for a well-typed
//! statement the resolver assigns the most general type every ground
//! instance is an instance of, with polymorphism introduced only at
//! binding sites.
//!
//! PHASES OF RESOLUTION:
//! ---------------------
//! The resolver walks each statement once:
//!
//! 1. Every expression and pattern gets a type, most of them fresh
//!    variables; equations between types are unified *eagerly* as the
//!    walk proceeds, so a conflict is reported at the position that
//!    produced it.
//! 2. Constraints that cannot be expressed as plain equations - field
//!    selections on not-yet-known records, collection membership,
//!    numeric operator operands, overloaded-name uses - are deferred
//!    and solved to a fixed point after the walk, with defaulting
//!    (`int` for unconstrained numerics, `list` for unconstrained
//!    collections) applied only when no further progress is possible.
//! 3. The typed tree is rewritten with the final substitution, so every
//!    node carries a fully resolved type, and `let`-bound names are
//!    generalized into schemes.
//!
//! GENERALIZATION:
//! ---------------
//! Generalization follows the classic discipline: non-recursive `val`
//! bindings generalize immediately after their right-hand side is
//! solved, quantifying the variables free in the bound type but not in
//! the surrounding environment; `val rec` and `fun` groups are typed
//! monomorphically inside the group and generalized once the whole
//! group's fixpoint has unified. Lambda-bound names stay monomorphic,
//! which is what separates `let`-polymorphism from unsound
//! generalization under a binder.

pub mod error;
mod infer;
mod solve;
pub mod tast;

pub use error::TypeError;
pub use tast::*;

use quill_par::ast::{Decl, DeclKind, Pat, PatKind, Statement, ValBind};
use quill_typ::{Scheme, Substitution, TyVar, TypeId, TypeRegistry};
use quill_util::{Pos, Symbol};
use rustc_hash::FxHashMap;

/// Whether a name is an ordinary value or a datatype constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStatus {
    Var,
    /// Constructor of the named datatype
    Ctor(Symbol),
}

/// One name's typing information in the environment
#[derive(Debug, Clone)]
pub struct EnvEntry {
    pub scheme: Scheme,
    pub status: IdStatus,
}

impl EnvEntry {
    pub fn var(scheme: Scheme) -> Self {
        Self {
            scheme,
            status: IdStatus::Var,
        }
    }

    pub fn ctor(scheme: Scheme, datatype: Symbol) -> Self {
        Self {
            scheme,
            status: IdStatus::Ctor(datatype),
        }
    }
}

/// Overload families registered with `over`, and their instances
#[derive(Debug, Clone, Default)]
pub struct OverloadTable {
    families: FxHashMap<Symbol, Vec<Scheme>>,
}

impl OverloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: Symbol) {
        self.families.entry(name).or_default();
    }

    pub fn is_overloaded(&self, name: Symbol) -> bool {
        self.families.contains_key(&name)
    }

    pub fn add_instance(&mut self, name: Symbol, scheme: Scheme) -> usize {
        let family = self.families.entry(name).or_default();
        family.push(scheme);
        family.len() - 1
    }

    pub fn instances(&self, name: Symbol) -> &[Scheme] {
        self.families
            .get(&name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A constraint that plain unification cannot express, solved after the
/// main walk
#[derive(Debug, Clone)]
pub(crate) enum Deferred {
    /// `result = (field `label` of `record`)`
    Field {
        record: TypeId,
        label: quill_util::Label,
        result: TypeId,
        pos: Pos,
    },
    /// `coll` is a list/bag/vector of `elem`
    Coll {
        coll: TypeId,
        elem: TypeId,
        pos: Pos,
    },
    /// `ty` must end up `int` or `real`
    Numeric { ty: TypeId, pos: Pos },
    /// `ty` must end up `int`, `real`, `string` or `char`
    Ordered { ty: TypeId, pos: Pos },
    /// A use of overloaded `name` at type `use_ty` (a fresh var keyed
    /// to the use site); instance selection resolves it
    Overload {
        name: Symbol,
        use_ty: TypeId,
        pos: Pos,
    },
    /// The result collection of a `from`: `result` is list-of-`row` or
    /// bag-of-`row` depending on the sources (all ordered -> ordered)
    /// unless a step forced the answer
    QueryShape {
        result: TypeId,
        row: TypeId,
        sources: Vec<TypeId>,
        /// `Some(true)` = forced ordered, `Some(false)` = forced bag
        forced: Option<bool>,
        pos: Pos,
    },
}

/// The per-statement type resolver
pub struct TypeResolver<'a> {
    pub(crate) registry: &'a mut TypeRegistry,
    globals: &'a FxHashMap<Symbol, EnvEntry>,
    pub(crate) overloads: &'a mut OverloadTable,
    /// Innermost scope last; scope 0 is the statement's own layer
    pub(crate) scopes: Vec<FxHashMap<Symbol, EnvEntry>>,
    pub(crate) subst: Substitution,
    pub(crate) pending: Vec<Deferred>,
    /// Use-site var -> chosen overload instance, filled by solving
    pub(crate) overload_picks: FxHashMap<TypeId, usize>,
    /// Scoped user type variables (`'a`) for the current declaration
    pub(crate) tyvar_scope: FxHashMap<Symbol, TyVar>,
    /// True while typing a `group`/`compute` column, where aggregate
    /// application (`over`) is legal
    pub(crate) aggregate_ok: bool,
}

impl<'a> TypeResolver<'a> {
    pub fn new(
        registry: &'a mut TypeRegistry,
        globals: &'a FxHashMap<Symbol, EnvEntry>,
        overloads: &'a mut OverloadTable,
    ) -> Self {
        Self {
            registry,
            globals,
            overloads,
            scopes: vec![FxHashMap::default()],
            subst: Substitution::new(),
            pending: Vec::new(),
            overload_picks: FxHashMap::default(),
            tyvar_scope: FxHashMap::default(),
            aggregate_ok: false,
        }
    }

    /// Resolve one statement to a typed declaration plus its new
    /// bindings
    pub fn resolve_statement(&mut self, stmt: &Statement) -> Result<TStatement, TypeError> {
        let decl = match stmt {
            Statement::Decl(decl) => decl.clone(),
            // A bare expression is the implicit binding `val it = exp`.
            Statement::Expr(exp) => Decl::new(
                DeclKind::Val {
                    rec: false,
                    inst: false,
                    binds: vec![ValBind {
                        pat: Pat::new(PatKind::Id(quill_util::symbol::SYM_IT), exp.pos),
                        exp: exp.clone(),
                        pos: exp.pos,
                    }],
                },
                exp.pos,
            ),
        };
        let (tdecl, mono_bindings) = self.resolve_decl(&decl)?;
        self.solve_pending()?;
        let tdecl = self.rewrite_decl(tdecl);
        // At the top level the surrounding environment is closed
        // schemes, so generalization is pinned only by types still
        // involved in deferred obligations.
        let pending_vars = self.pending_free_vars();
        let bindings: Vec<(Symbol, Scheme)> = mono_bindings
            .into_iter()
            .map(|(name, ty, already_scheme)| {
                if let Some(scheme) = already_scheme {
                    return (name, scheme);
                }
                let resolved = self.subst.resolve(self.registry, ty);
                let scheme = Scheme::generalize(self.registry, resolved, &pending_vars);
                (name, scheme)
            })
            .collect();
        // An overload instance registers its generalized scheme with
        // the family; the driver pairs it with the evaluated value.
        if let TDeclKind::Inst(name, tbind) = &tdecl.kind {
            let scheme = Scheme::generalize(self.registry, tbind.exp.ty, &pending_vars);
            self.overloads.add_instance(*name, scheme);
        }
        Ok(TStatement {
            decl: tdecl,
            bindings,
        })
    }

    // =========================================================================
    // Environment
    // =========================================================================

    pub(crate) fn lookup(&self, name: Symbol) -> Option<&EnvEntry> {
        for scope in self.scopes.iter().rev() {
            if let Some(entry) = scope.get(&name) {
                return Some(entry);
            }
        }
        self.globals.get(&name)
    }

    pub(crate) fn bind(&mut self, name: Symbol, entry: EnvEntry) {
        self.scopes
            .last_mut()
            .expect("resolver always has a scope")
            .insert(name, entry);
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Type variables free in the environment (and thus not
    /// generalizable)
    pub(crate) fn env_free_vars(&mut self) -> Vec<TyVar> {
        let mut tys = Vec::new();
        for scope in &self.scopes {
            for entry in scope.values() {
                if entry.scheme.is_mono() {
                    tys.push(entry.scheme.body);
                }
            }
        }
        let mut out = Vec::new();
        for ty in tys {
            let resolved = self.subst.resolve(self.registry, ty);
            for v in self.registry.free_vars(resolved) {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    /// Variables still constrained by deferred obligations; these must
    /// not be quantified
    pub(crate) fn pending_free_vars(&mut self) -> Vec<TyVar> {
        let mut tys = Vec::new();
        for deferred in &self.pending {
            match deferred {
                Deferred::Field { record, result, .. } => {
                    tys.push(*record);
                    tys.push(*result);
                }
                Deferred::Coll { coll, elem, .. } => {
                    tys.push(*coll);
                    tys.push(*elem);
                }
                Deferred::Numeric { ty, .. } | Deferred::Ordered { ty, .. } => tys.push(*ty),
                Deferred::Overload { use_ty, .. } => tys.push(*use_ty),
                Deferred::QueryShape {
                    result,
                    row,
                    sources,
                    ..
                } => {
                    tys.push(*result);
                    tys.push(*row);
                    tys.extend(sources.iter().copied());
                }
            }
        }
        let mut out = Vec::new();
        for ty in tys {
            let resolved = self.subst.resolve(self.registry, ty);
            for v in self.registry.free_vars(resolved) {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    // =========================================================================
    // Unification plumbing
    // =========================================================================

    /// Unify two types now, reporting failure at `pos`
    pub(crate) fn unify_at(&mut self, a: TypeId, b: TypeId, pos: Pos) -> Result<(), TypeError> {
        let ra = self.subst.resolve(self.registry, a);
        let rb = self.subst.resolve(self.registry, b);
        match quill_typ::unify(self.registry, vec![(ra, rb)]) {
            Ok(new_bindings) => {
                for (var, ty) in new_bindings.iter() {
                    self.subst.bind(var, ty);
                }
                Ok(())
            }
            Err(quill_typ::UnifyError::Conflict { left, right }) => Err(TypeError::TypeMismatch {
                expected: left,
                actual: right,
                pos,
            }),
            Err(quill_typ::UnifyError::Cycle { var, ty }) => Err(TypeError::TypeMismatch {
                expected: var,
                actual: format!("cyclic type {}", ty),
                pos,
            }),
        }
    }

    pub(crate) fn fresh(&mut self) -> TypeId {
        self.registry.fresh_var_type()
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    /// Resolve a declaration; returns the typed declaration and the
    /// names it binds with either a pre-solved type to generalize or a
    /// ready-made scheme
    #[allow(clippy::type_complexity)]
    pub(crate) fn resolve_decl(
        &mut self,
        decl: &Decl,
    ) -> Result<(TDecl, Vec<(Symbol, TypeId, Option<Scheme>)>), TypeError> {
        match &decl.kind {
            DeclKind::Val { rec, inst, binds } => {
                if *inst {
                    self.resolve_inst_decl(decl, binds)
                } else if *rec {
                    self.resolve_rec_val(decl, binds)
                } else {
                    self.resolve_nonrec_val(decl, binds)
                }
            }
            DeclKind::Fun(funbinds) => self.resolve_fun_decl(decl, funbinds),
            DeclKind::Datatype(binds) => self.resolve_datatype_decl(decl, binds),
            DeclKind::TypeAlias(binds) => self.resolve_alias_decl(decl, binds),
            DeclKind::Over(name) => {
                self.overloads.declare(*name);
                Ok((
                    TDecl {
                        kind: TDeclKind::Over(*name),
                        pos: decl.pos,
                    },
                    Vec::new(),
                ))
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn resolve_nonrec_val(
        &mut self,
        decl: &Decl,
        binds: &[ValBind],
    ) -> Result<(TDecl, Vec<(Symbol, TypeId, Option<Scheme>)>), TypeError> {
        let mut tbinds = Vec::new();
        let mut bindings = Vec::new();
        for bind in binds {
            let texp = self.infer_expr(&bind.exp)?;
            self.push_scope();
            let tpat = self.infer_pat(&bind.pat)?;
            // The pattern's bindings move into the enclosing scope so
            // later `and` binds cannot see them but the caller can.
            let pat_scope = self.scopes.pop().expect("pattern scope");
            self.unify_at(tpat.ty, texp.ty, bind.pos)?;
            // Let-generalization happens here, so a `let`-bound name is
            // polymorphic in the body even before the statement-level
            // solve completes.
            let env_free = self.env_free_vars();
            let pending = self.pending_free_vars();
            let pinned = [env_free.as_slice(), pending.as_slice()].concat();
            // Pattern source order keeps binding output deterministic.
            for (name, _) in tpat.bound_vars() {
                let Some(entry) = pat_scope.get(&name) else {
                    continue;
                };
                let ty = entry.scheme.body;
                let resolved = self.subst.resolve(self.registry, ty);
                let scheme = Scheme::generalize(self.registry, resolved, &pinned);
                bindings.push((name, ty, None));
                self.bind(name, EnvEntry::var(scheme));
            }
            tbinds.push(TValBind {
                pat: tpat,
                exp: texp,
                pos: bind.pos,
            });
        }
        Ok((
            TDecl {
                kind: TDeclKind::Val {
                    rec: false,
                    binds: tbinds,
                },
                pos: decl.pos,
            },
            bindings,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn resolve_rec_val(
        &mut self,
        decl: &Decl,
        binds: &[ValBind],
    ) -> Result<(TDecl, Vec<(Symbol, TypeId, Option<Scheme>)>), TypeError> {
        // Bind every name monomorphically first, then type the
        // right-hand sides in that environment.
        let mut names = Vec::new();
        for bind in binds {
            let name = match &bind.pat.kind {
                PatKind::Id(name) => *name,
                PatKind::Annotated(inner, _) => match &inner.kind {
                    PatKind::Id(name) => *name,
                    _ => return Err(TypeError::IllegalRecBinding(bind.pos)),
                },
                _ => return Err(TypeError::IllegalRecBinding(bind.pos)),
            };
            let ty = self.fresh();
            names.push((name, ty));
            self.bind(name, EnvEntry::var(Scheme::mono(ty)));
        }
        let mut tbinds = Vec::new();
        for (bind, (name, ty)) in binds.iter().zip(&names) {
            if !matches!(
                bind.exp.kind,
                quill_par::ast::ExprKind::Fn(_)
            ) {
                return Err(TypeError::IllegalRecBinding(bind.pos));
            }
            let texp = self.infer_expr(&bind.exp)?;
            self.unify_at(*ty, texp.ty, bind.pos)?;
            // Honor an annotation on the binding pattern if present.
            if let PatKind::Annotated(_, ty_exp) = &bind.pat.kind {
                let annotated = self.resolve_type_exp(ty_exp)?;
                self.unify_at(*ty, annotated, bind.pos)?;
            }
            tbinds.push(TValBind {
                pat: TPat {
                    kind: TPatKind::Id(*name),
                    ty: *ty,
                    pos: bind.pat.pos,
                },
                exp: texp,
                pos: bind.pos,
            });
        }
        self.generalize_group(&names);
        let bindings = names
            .into_iter()
            .map(|(name, ty)| (name, ty, None))
            .collect();
        Ok((
            TDecl {
                kind: TDeclKind::Val {
                    rec: true,
                    binds: tbinds,
                },
                pos: decl.pos,
            },
            bindings,
        ))
    }

    /// Re-bind a recursive group's names with generalized schemes, now
    /// that the group's fixpoint has unified
    fn generalize_group(&mut self, names: &[(Symbol, TypeId)]) {
        // The group's own monomorphic entries must not pin their vars.
        for (name, _) in names {
            for scope in self.scopes.iter_mut().rev() {
                if scope.remove(name).is_some() {
                    break;
                }
            }
        }
        let env_free = self.env_free_vars();
        let pending = self.pending_free_vars();
        let pinned = [env_free.as_slice(), pending.as_slice()].concat();
        for (name, ty) in names {
            let resolved = self.subst.resolve(self.registry, *ty);
            let scheme = Scheme::generalize(self.registry, resolved, &pinned);
            self.bind(*name, EnvEntry::var(scheme));
        }
    }

    #[allow(clippy::type_complexity)]
    fn resolve_fun_decl(
        &mut self,
        decl: &Decl,
        funbinds: &[quill_par::ast::FunBind],
    ) -> Result<(TDecl, Vec<(Symbol, TypeId, Option<Scheme>)>), TypeError> {
        // Fixpoint group: every function is in scope, monomorphic,
        // while the bodies are typed.
        let mut names = Vec::new();
        for funbind in funbinds {
            let ty = self.fresh();
            names.push((funbind.name, ty));
            self.bind(funbind.name, EnvEntry::var(Scheme::mono(ty)));
        }
        let mut tfunbinds = Vec::new();
        for (funbind, (name, fun_ty)) in funbinds.iter().zip(&names) {
            let arity = funbind.clauses[0].pats.len();
            // One type variable per curried parameter plus a result.
            let param_tys: Vec<TypeId> = (0..arity).map(|_| self.fresh()).collect();
            let result_ty = self.fresh();
            let mut built = result_ty;
            for param in param_tys.iter().rev() {
                built = self.registry.fn_type(*param, built);
            }
            self.unify_at(*fun_ty, built, funbind.pos)?;

            let mut tclauses = Vec::new();
            for clause in &funbind.clauses {
                if clause.pats.len() != arity {
                    return Err(TypeError::ClauseArityMismatch(*name, clause.pos));
                }
                self.push_scope();
                let mut tpats = Vec::new();
                for (pat, param_ty) in clause.pats.iter().zip(&param_tys) {
                    let tpat = self.infer_pat(pat)?;
                    self.unify_at(tpat.ty, *param_ty, pat.pos)?;
                    tpats.push(tpat);
                }
                let body = self.infer_expr(&clause.exp)?;
                self.unify_at(body.ty, result_ty, clause.exp.pos)?;
                if let Some(ret_ty) = &clause.ret_ty {
                    let annotated = self.resolve_type_exp(ret_ty)?;
                    self.unify_at(result_ty, annotated, clause.pos)?;
                }
                self.pop_scope();
                tclauses.push((tpats, body));
            }
            tfunbinds.push(TFunBind {
                name: *name,
                clauses: tclauses,
                ty: *fun_ty,
                pos: funbind.pos,
            });
        }
        self.generalize_group(&names);
        let bindings = names
            .into_iter()
            .map(|(name, ty)| (name, ty, None))
            .collect();
        Ok((
            TDecl {
                kind: TDeclKind::Fun(tfunbinds),
                pos: decl.pos,
            },
            bindings,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn resolve_datatype_decl(
        &mut self,
        decl: &Decl,
        binds: &[quill_par::ast::DatatypeBind],
    ) -> Result<(TDecl, Vec<(Symbol, TypeId, Option<Scheme>)>), TypeError> {
        use indexmap::IndexMap;
        // Pre-register every datatype in the group so payload types can
        // refer to any of them (including mutual recursion).
        let mut params_per_bind = Vec::new();
        for bind in binds {
            let mut params = Vec::new();
            self.tyvar_scope.clear();
            for tv in &bind.tyvars {
                let fresh = self.registry.fresh_tyvar();
                self.tyvar_scope.insert(*tv, fresh);
                params.push(fresh);
            }
            params_per_bind.push((params.clone(), self.tyvar_scope.clone()));
            self.registry.define_datatype(quill_typ::DataDef {
                name: bind.name,
                params,
                ctors: IndexMap::new(),
            });
        }
        let mut bindings = Vec::new();
        let mut names = Vec::new();
        for (bind, (params, tyvar_scope)) in binds.iter().zip(&params_per_bind) {
            self.tyvar_scope = tyvar_scope.clone();
            let mut ctors = IndexMap::new();
            let param_tys: Vec<TypeId> = params
                .iter()
                .map(|p| self.registry.var_type(*p))
                .collect();
            let data_ty = self.registry.data_type(bind.name, param_tys.clone());
            for ctor in &bind.ctors {
                let payload = match &ctor.payload {
                    Some(ty_exp) => Some(self.resolve_type_exp(ty_exp)?),
                    None => None,
                };
                ctors.insert(ctor.name, payload);
                // Constructor binding: payload -> data, or data.
                let ctor_ty = match payload {
                    Some(p) => self.registry.fn_type(p, data_ty),
                    None => data_ty,
                };
                let scheme = Scheme {
                    vars: params.clone(),
                    body: ctor_ty,
                };
                self.bind(ctor.name, EnvEntry::ctor(scheme.clone(), bind.name));
                bindings.push((ctor.name, ctor_ty, Some(scheme)));
            }
            quill_typ::sort_ctors(&mut ctors);
            self.registry.define_datatype(quill_typ::DataDef {
                name: bind.name,
                params: params.clone(),
                ctors,
            });
            names.push(bind.name);
        }
        self.tyvar_scope.clear();
        Ok((
            TDecl {
                kind: TDeclKind::Datatype(names),
                pos: decl.pos,
            },
            bindings,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn resolve_alias_decl(
        &mut self,
        decl: &Decl,
        binds: &[quill_par::ast::TypeBind],
    ) -> Result<(TDecl, Vec<(Symbol, TypeId, Option<Scheme>)>), TypeError> {
        let mut names = Vec::new();
        for bind in binds {
            self.tyvar_scope.clear();
            let mut params = Vec::new();
            for tv in &bind.tyvars {
                let fresh = self.registry.fresh_tyvar();
                self.tyvar_scope.insert(*tv, fresh);
                params.push(fresh);
            }
            let body = self.resolve_type_exp(&bind.ty)?;
            self.registry.define_alias(quill_typ::AliasDef {
                name: bind.name,
                params,
                body,
            });
            names.push(bind.name);
        }
        self.tyvar_scope.clear();
        Ok((
            TDecl {
                kind: TDeclKind::TypeAlias(names),
                pos: decl.pos,
            },
            Vec::new(),
        ))
    }

    #[allow(clippy::type_complexity)]
    fn resolve_inst_decl(
        &mut self,
        decl: &Decl,
        binds: &[ValBind],
    ) -> Result<(TDecl, Vec<(Symbol, TypeId, Option<Scheme>)>), TypeError> {
        // `val inst name = exp` extends an overload family.
        let bind = match binds {
            [single] => single,
            _ => return Err(TypeError::IllegalRecBinding(decl.pos)),
        };
        let name = match &bind.pat.kind {
            PatKind::Id(name) => *name,
            _ => return Err(TypeError::IllegalRecBinding(bind.pos)),
        };
        if !self.overloads.is_overloaded(name) {
            return Err(TypeError::NotOverloaded(name, bind.pos));
        }
        let texp = self.infer_expr(&bind.exp)?;
        let tbind = TValBind {
            pat: TPat {
                kind: TPatKind::Id(name),
                ty: texp.ty,
                pos: bind.pat.pos,
            },
            exp: texp,
            pos: bind.pos,
        };
        Ok((
            TDecl {
                kind: TDeclKind::Inst(name, Box::new(tbind)),
                pos: decl.pos,
            },
            Vec::new(),
        ))
    }
}

#[cfg(test)]
mod tests;
