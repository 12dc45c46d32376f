//! The core intermediate representation.
//!
//! A typed, desugared tree. Compared to the typed AST:
//!
//! - `Fn` has exactly one parameter; curried functions are nested.
//! - `Case` is n-ary and is the only branching construct: `if`,
//!   `andalso`, `orelse` and `implies` have been compiled away.
//! - `Let` carries exactly one declaration, a `NonRec` pattern binding
//!   or a `Rec` group of function bindings.
//! - Infix operators are applications of builtin functions; `o` is
//!   expanded to a lambda.
//! - Record functional update has been expanded to a full record
//!   construction; ellipsis record patterns list only the fields they
//!   extract.
//! - `exists`/`forall` are gone, rewritten into `from … into` form.
//!
//! Every node carries its resolved type and source position.

use quill_par::ast::Literal;
use quill_typ::TypeId;
use quill_util::{Label, Pos, Symbol};

/// Core expression
#[derive(Debug, Clone)]
pub struct CoreExpr {
    pub kind: CoreKind,
    pub ty: TypeId,
    pub pos: Pos,
}

impl CoreExpr {
    pub fn new(kind: CoreKind, ty: TypeId, pos: Pos) -> Self {
        Self { kind, ty, pos }
    }
}

/// Core expression variants
#[derive(Debug, Clone)]
pub enum CoreKind {
    Lit(Literal),
    /// Variable reference
    Id(Symbol),
    /// Datatype constructor reference
    Ctor(Symbol),
    /// Resolved overloaded use: family name and instance index
    OverloadedUse { name: Symbol, index: usize },
    /// `#label` as a function value
    RecordSel(Label),
    /// Single-parameter function
    Fn {
        param: Box<CorePat>,
        body: Box<CoreExpr>,
    },
    Apply(Box<CoreExpr>, Box<CoreExpr>),
    /// One declaration scoped over a body
    Let(Box<CoreDecl>, Box<CoreExpr>),
    /// N-ary case; an unmatched scrutinee raises `Match` at runtime
    Case {
        scrutinee: Box<CoreExpr>,
        arms: Vec<CoreArm>,
    },
    Tuple(Vec<CoreExpr>),
    Record(Vec<(Label, CoreExpr)>),
    List(Vec<CoreExpr>),
    /// Relational pipeline; steps in order
    From(Vec<CoreStep>),
    /// Aggregate application inside a group/compute column
    Aggregate {
        agg: Box<CoreExpr>,
        arg: Box<CoreExpr>,
    },
    /// Raise a builtin exception (`Bind` from compiled function
    /// matches)
    Raise(Symbol),
}

/// One arm of a core `Case`
#[derive(Debug, Clone)]
pub struct CoreArm {
    pub pat: CorePat,
    pub body: CoreExpr,
}

/// A core declaration
#[derive(Debug, Clone)]
pub enum CoreDecl {
    /// Non-recursive pattern binding; a refutable pattern raises `Bind`
    /// when the value does not match
    NonRec { pat: CorePat, exp: CoreExpr },
    /// Recursive group; every right-hand side is a `Fn`
    Rec { binds: Vec<(Symbol, CoreExpr)> },
    /// Bring the constructors of already-registered datatypes into
    /// scope as values
    Datatype(Vec<Symbol>),
}

/// Core pattern
#[derive(Debug, Clone)]
pub struct CorePat {
    pub kind: CorePatKind,
    pub ty: TypeId,
    pub pos: Pos,
}

impl CorePat {
    pub fn new(kind: CorePatKind, ty: TypeId, pos: Pos) -> Self {
        Self { kind, ty, pos }
    }

    /// All variables the pattern binds, in source order
    pub fn bound_vars(&self) -> Vec<(Symbol, TypeId)> {
        let mut out = Vec::new();
        self.collect_bound(&mut out);
        out
    }

    fn collect_bound(&self, out: &mut Vec<(Symbol, TypeId)>) {
        match &self.kind {
            CorePatKind::Wild | CorePatKind::Lit(_) => {}
            CorePatKind::Id(name) => out.push((*name, self.ty)),
            CorePatKind::Cons(head, tail) => {
                head.collect_bound(out);
                tail.collect_bound(out);
            }
            CorePatKind::Tuple(pats) | CorePatKind::List(pats) => {
                for p in pats {
                    p.collect_bound(out);
                }
            }
            CorePatKind::Record(fields) => {
                for (_, p) in fields {
                    p.collect_bound(out);
                }
            }
            CorePatKind::Con(_, arg) => {
                if let Some(arg) = arg {
                    arg.collect_bound(out);
                }
            }
            CorePatKind::As(name, inner) => {
                out.push((*name, self.ty));
                inner.collect_bound(out);
            }
        }
    }
}

/// Core pattern variants
///
/// A record pattern lists only the fields it extracts; matching is by
/// label lookup, which is how ellipsis patterns lower.
#[derive(Debug, Clone)]
pub enum CorePatKind {
    Wild,
    Id(Symbol),
    Lit(Literal),
    Cons(Box<CorePat>, Box<CorePat>),
    Tuple(Vec<CorePat>),
    List(Vec<CorePat>),
    Record(Vec<(Label, CorePat)>),
    Con(Symbol, Option<Box<CorePat>>),
    As(Symbol, Box<CorePat>),
}

/// A core query step
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub kind: CoreStepKind,
    pub pos: Pos,
}

/// The source of a core scan
#[derive(Debug, Clone)]
pub enum CoreSource {
    /// Iterate a collection
    In(CoreExpr),
    /// Bind a single scalar
    Eq(CoreExpr),
}

/// Core step variants
#[derive(Debug, Clone)]
pub enum CoreStepKind {
    Scan {
        pat: CorePat,
        source: CoreSource,
        on: Option<CoreExpr>,
    },
    Where(CoreExpr),
    Group {
        keys: Vec<(Symbol, CoreExpr)>,
        computes: Vec<(Symbol, CoreExpr)>,
    },
    Order(CoreExpr),
    Take(CoreExpr),
    Skip(CoreExpr),
    Yield(CoreExpr),
    Into(CoreExpr),
    Through {
        pat: CorePat,
        exp: CoreExpr,
    },
    Union {
        distinct: bool,
        sources: Vec<CoreExpr>,
    },
    Intersect {
        distinct: bool,
        sources: Vec<CoreExpr>,
    },
    Except {
        distinct: bool,
        sources: Vec<CoreExpr>,
    },
    Distinct,
    Unorder,
    Compute(Vec<(Symbol, CoreExpr)>),
}

/// A lowered statement: the declarations to evaluate in order, plus an
/// overload-instance expression when the statement was `val inst`
#[derive(Debug, Clone)]
pub struct CoreStatement {
    pub decls: Vec<CoreDecl>,
    /// `val inst name = exp`: evaluate `exp` and append it to `name`'s
    /// instance family
    pub inst: Option<(Symbol, Box<CoreExpr>)>,
    pub pos: Pos,
}
