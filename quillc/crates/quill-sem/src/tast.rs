//! The typed AST: the surface tree annotated with resolved types.
//!
//! Shape-wise this mirrors `quill_par::ast`, but every expression and
//! pattern node carries a fully resolved [`TypeId`], identifier uses are
//! split into variables and constructors, and type annotations have been
//! absorbed into the node types. Lowering consumes this tree; nothing
//! here is desugared yet.

use quill_par::ast::{BinOp, Literal};
use quill_typ::{Scheme, TypeId};
use quill_util::{Label, Pos, Symbol};

/// Typed expression
#[derive(Debug, Clone)]
pub struct TExpr {
    pub kind: TExprKind,
    pub ty: TypeId,
    pub pos: Pos,
}

/// Typed expression variants
#[derive(Debug, Clone)]
pub enum TExprKind {
    Lit(Literal),
    /// A variable reference
    Id(Symbol),
    /// A datatype constructor reference
    Ctor(Symbol),
    /// A use of an overloaded name, resolved to one instance of its
    /// family
    OverloadedUse { name: Symbol, index: usize },
    /// `#label`, usable as a function
    RecordSel(Label),
    If(Box<TExpr>, Box<TExpr>, Box<TExpr>),
    Let(Vec<TDecl>, Box<TExpr>),
    Fn(Vec<TMatchArm>),
    Apply(Box<TExpr>, Box<TExpr>),
    Case(Box<TExpr>, Vec<TMatchArm>),
    Tuple(Vec<TExpr>),
    Record {
        fields: Vec<(Label, TExpr)>,
        base: Option<Box<TExpr>>,
    },
    List(Vec<TExpr>),
    Infix(BinOp, Box<TExpr>, Box<TExpr>),
    Negate(Box<TExpr>),
    Field(Box<TExpr>, Label),
    From(Vec<TStep>),
    Exists(Vec<TStep>),
    Forall(Vec<TStep>, Box<TExpr>),
    Aggregate(Box<TExpr>, Box<TExpr>),
}

/// One typed `pat => exp` arm
#[derive(Debug, Clone)]
pub struct TMatchArm {
    pub pat: TPat,
    pub exp: TExpr,
    pub pos: Pos,
}

/// Typed query step
#[derive(Debug, Clone)]
pub struct TStep {
    pub kind: TStepKind,
    pub pos: Pos,
}

/// Typed scan source
#[derive(Debug, Clone)]
pub enum TScanSource {
    In(TExpr),
    Eq(TExpr),
}

/// Typed step variants
#[derive(Debug, Clone)]
pub enum TStepKind {
    Scan {
        pat: TPat,
        source: TScanSource,
        on: Option<TExpr>,
    },
    Join {
        pat: TPat,
        source: TScanSource,
        on: Option<TExpr>,
    },
    Where(TExpr),
    /// Group with named key and compute columns; the names are the row
    /// bindings in scope after this step
    Group {
        keys: Vec<(Symbol, TExpr)>,
        computes: Vec<(Symbol, TExpr)>,
    },
    Order(TExpr),
    Take(TExpr),
    Skip(TExpr),
    Yield(TExpr),
    Into(TExpr),
    Through {
        pat: TPat,
        exp: TExpr,
    },
    Union {
        distinct: bool,
        sources: Vec<TExpr>,
    },
    Intersect {
        distinct: bool,
        sources: Vec<TExpr>,
    },
    Except {
        distinct: bool,
        sources: Vec<TExpr>,
    },
    Distinct,
    Unorder,
    /// Whole-stream aggregation; named like group computes
    Compute(Vec<(Symbol, TExpr)>),
}

/// Typed pattern
#[derive(Debug, Clone)]
pub struct TPat {
    pub kind: TPatKind,
    pub ty: TypeId,
    pub pos: Pos,
}

/// Typed pattern variants
#[derive(Debug, Clone)]
pub enum TPatKind {
    Wild,
    /// A variable binding
    Id(Symbol),
    Lit(Literal),
    Cons(Box<TPat>, Box<TPat>),
    Tuple(Vec<TPat>),
    List(Vec<TPat>),
    /// Record pattern; `ellipsis` means only the listed fields are
    /// matched and the rest of the (statically known) row is ignored
    Record {
        fields: Vec<(Label, TPat)>,
        ellipsis: bool,
    },
    /// Constructor pattern
    Con(Symbol, Option<Box<TPat>>),
    As(Symbol, Box<TPat>),
}

impl TPat {
    /// All variables this pattern binds, in source order
    pub fn bound_vars(&self) -> Vec<(Symbol, TypeId)> {
        let mut out = Vec::new();
        self.collect_bound(&mut out);
        out
    }

    fn collect_bound(&self, out: &mut Vec<(Symbol, TypeId)>) {
        match &self.kind {
            TPatKind::Wild | TPatKind::Lit(_) => {}
            TPatKind::Id(name) => out.push((*name, self.ty)),
            TPatKind::Cons(head, tail) => {
                head.collect_bound(out);
                tail.collect_bound(out);
            }
            TPatKind::Tuple(pats) | TPatKind::List(pats) => {
                for p in pats {
                    p.collect_bound(out);
                }
            }
            TPatKind::Record { fields, .. } => {
                for (_, p) in fields {
                    p.collect_bound(out);
                }
            }
            TPatKind::Con(_, arg) => {
                if let Some(arg) = arg {
                    arg.collect_bound(out);
                }
            }
            TPatKind::As(name, inner) => {
                out.push((*name, self.ty));
                inner.collect_bound(out);
            }
        }
    }
}

/// Typed declaration
#[derive(Debug, Clone)]
pub struct TDecl {
    pub kind: TDeclKind,
    pub pos: Pos,
}

impl TDeclKind {
    /// True when evaluating the declaration changes session-level
    /// tables (the registry, aliases, overload families) rather than
    /// just the environment; such statements are not replayable from a
    /// statement cache
    pub fn registers_session_state(&self) -> bool {
        matches!(
            self,
            TDeclKind::Datatype(_)
                | TDeclKind::TypeAlias(_)
                | TDeclKind::Over(_)
                | TDeclKind::Inst(_, _)
        )
    }
}

/// Typed declaration variants
#[derive(Debug, Clone)]
pub enum TDeclKind {
    Val {
        rec: bool,
        binds: Vec<TValBind>,
    },
    Fun(Vec<TFunBind>),
    /// Datatype declarations register themselves in the type registry
    /// during resolution; the names remain for REPL printing
    Datatype(Vec<Symbol>),
    TypeAlias(Vec<Symbol>),
    Over(Symbol),
    /// `val inst name = exp` - an overload instance registration
    Inst(Symbol, Box<TValBind>),
}

/// Typed val binding
#[derive(Debug, Clone)]
pub struct TValBind {
    pub pat: TPat,
    pub exp: TExpr,
    pub pos: Pos,
}

/// Typed fun binding: one name, its clauses, and its resolved type
#[derive(Debug, Clone)]
pub struct TFunBind {
    pub name: Symbol,
    /// Each clause: the argument patterns and the body
    pub clauses: Vec<(Vec<TPat>, TExpr)>,
    pub ty: TypeId,
    pub pos: Pos,
}

/// A fully resolved statement: the typed declaration plus the bindings
/// it introduces, each with its generalized scheme
#[derive(Debug, Clone)]
pub struct TStatement {
    pub decl: TDecl,
    pub bindings: Vec<(Symbol, Scheme)>,
}
