//! AST visitor: a depth-first walk with pre/post hooks.
//!
//! Implement [`Visitor`] and override the hooks you care about; the
//! `walk_*` functions drive the traversal. A `pre_*` hook returning
//! `false` prunes the subtree (its children and the matching `post_*`
//! hook are skipped).

use crate::ast::*;

/// Visitor hooks; every hook has a default no-op implementation
pub trait Visitor {
    /// Called before an expression's children; return `false` to prune
    fn pre_expr(&mut self, _exp: &Expr) -> bool {
        true
    }
    fn post_expr(&mut self, _exp: &Expr) {}

    fn pre_pat(&mut self, _pat: &Pat) -> bool {
        true
    }
    fn post_pat(&mut self, _pat: &Pat) {}

    fn pre_decl(&mut self, _decl: &Decl) -> bool {
        true
    }
    fn post_decl(&mut self, _decl: &Decl) {}
}

/// Walk an expression depth-first
pub fn walk_expr<V: Visitor>(visitor: &mut V, exp: &Expr) {
    if !visitor.pre_expr(exp) {
        return;
    }
    match &exp.kind {
        ExprKind::Lit(_) | ExprKind::Id(_) | ExprKind::RecordSel(_) => {}
        ExprKind::If(c, t, f) => {
            walk_expr(visitor, c);
            walk_expr(visitor, t);
            walk_expr(visitor, f);
        }
        ExprKind::Let(decls, body) => {
            for d in decls {
                walk_decl(visitor, d);
            }
            walk_expr(visitor, body);
        }
        ExprKind::Fn(arms) => {
            for arm in arms {
                walk_pat(visitor, &arm.pat);
                walk_expr(visitor, &arm.exp);
            }
        }
        ExprKind::Apply(f, arg) => {
            walk_expr(visitor, f);
            walk_expr(visitor, arg);
        }
        ExprKind::Case(scrutinee, arms) => {
            walk_expr(visitor, scrutinee);
            for arm in arms {
                walk_pat(visitor, &arm.pat);
                walk_expr(visitor, &arm.exp);
            }
        }
        ExprKind::Tuple(exps) | ExprKind::List(exps) => {
            for e in exps {
                walk_expr(visitor, e);
            }
        }
        ExprKind::Record { fields, base } => {
            if let Some(base) = base {
                walk_expr(visitor, base);
            }
            for (_, e) in fields {
                walk_expr(visitor, e);
            }
        }
        ExprKind::Infix(_, lhs, rhs) => {
            walk_expr(visitor, lhs);
            walk_expr(visitor, rhs);
        }
        ExprKind::Negate(operand) => walk_expr(visitor, operand),
        ExprKind::Field(base, _) => walk_expr(visitor, base),
        ExprKind::Annotated(inner, _) => walk_expr(visitor, inner),
        ExprKind::From(steps) | ExprKind::Exists(steps) => {
            for step in steps {
                walk_step(visitor, step);
            }
        }
        ExprKind::Forall(steps, cond) => {
            for step in steps {
                walk_step(visitor, step);
            }
            walk_expr(visitor, cond);
        }
        ExprKind::Aggregate(agg, arg) => {
            walk_expr(visitor, agg);
            walk_expr(visitor, arg);
        }
    }
    visitor.post_expr(exp);
}

fn walk_step<V: Visitor>(visitor: &mut V, step: &Step) {
    match &step.kind {
        StepKind::Scan { pat, source, on } | StepKind::Join { pat, source, on } => {
            walk_pat(visitor, pat);
            match source {
                ScanSource::In(e) | ScanSource::Eq(e) => walk_expr(visitor, e),
            }
            if let Some(cond) = on {
                walk_expr(visitor, cond);
            }
        }
        StepKind::Where(e)
        | StepKind::Order(e)
        | StepKind::Take(e)
        | StepKind::Skip(e)
        | StepKind::Yield(e)
        | StepKind::Into(e)
        | StepKind::Compute(e)
        | StepKind::Require(e) => walk_expr(visitor, e),
        StepKind::Group { key, compute } => {
            walk_expr(visitor, key);
            if let Some(c) = compute {
                walk_expr(visitor, c);
            }
        }
        StepKind::Through { pat, exp } => {
            walk_pat(visitor, pat);
            walk_expr(visitor, exp);
        }
        StepKind::Union { sources, .. }
        | StepKind::Intersect { sources, .. }
        | StepKind::Except { sources, .. } => {
            for e in sources {
                walk_expr(visitor, e);
            }
        }
        StepKind::Distinct | StepKind::Unorder => {}
    }
}

/// Walk a pattern depth-first
pub fn walk_pat<V: Visitor>(visitor: &mut V, pat: &Pat) {
    if !visitor.pre_pat(pat) {
        return;
    }
    match &pat.kind {
        PatKind::Wild | PatKind::Id(_) | PatKind::Lit(_) => {}
        PatKind::Cons(head, tail) => {
            walk_pat(visitor, head);
            walk_pat(visitor, tail);
        }
        PatKind::Tuple(pats) | PatKind::List(pats) => {
            for p in pats {
                walk_pat(visitor, p);
            }
        }
        PatKind::Record { fields, .. } => {
            for (_, p) in fields {
                walk_pat(visitor, p);
            }
        }
        PatKind::Con(_, arg) => {
            if let Some(arg) = arg {
                walk_pat(visitor, arg);
            }
        }
        PatKind::As(_, inner) => walk_pat(visitor, inner),
        PatKind::Annotated(inner, _) => walk_pat(visitor, inner),
    }
    visitor.post_pat(pat);
}

/// Walk a declaration depth-first
pub fn walk_decl<V: Visitor>(visitor: &mut V, decl: &Decl) {
    if !visitor.pre_decl(decl) {
        return;
    }
    match &decl.kind {
        DeclKind::Val { binds, .. } => {
            for bind in binds {
                walk_pat(visitor, &bind.pat);
                walk_expr(visitor, &bind.exp);
            }
        }
        DeclKind::Fun(binds) => {
            for bind in binds {
                for clause in &bind.clauses {
                    for p in &clause.pats {
                        walk_pat(visitor, p);
                    }
                    walk_expr(visitor, &clause.exp);
                }
            }
        }
        DeclKind::Datatype(_) | DeclKind::TypeAlias(_) | DeclKind::Over(_) => {}
    }
    visitor.post_decl(decl);
}

/// Walk a statement
pub fn walk_statement<V: Visitor>(visitor: &mut V, stmt: &Statement) {
    match stmt {
        Statement::Decl(d) => walk_decl(visitor, d),
        Statement::Expr(e) => walk_expr(visitor, e),
    }
}
