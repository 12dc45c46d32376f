//! quill-typ - Type Representation and Registry
//!
//! ============================================================================
//! TYPE SYSTEM DATA MODEL
//! ============================================================================
//!
//! The type system's data model: structural types, type schemes,
//! substitutions and the unifier. Types are immutable structural values
//! interned in a [`TypeRegistry`]: each distinct structure is stored
//! once, keyed by its canonical description string, and referenced by a
//! [`TypeId`] handle. Two types are equal iff their handles are equal,
//! which makes type comparison O(1) everywhere downstream.
//!
//! INTERNING AND RECURSIVE DATATYPES:
//! ----------------------------------
//! Datatypes are the one place structural interning would chase its own
//! tail: `datatype 'a tree = NODE of 'a tree * …` refers to itself. The
//! registry breaks the cycle by storing a [`DataDef`] under the datatype
//! *name* and representing uses as `TypeKind::Data { name, args }` - the
//! use site carries the key, never a handle into the definition.
//!
//! RECORDS AND TUPLES:
//! -------------------
//! Record labels are kept in the canonical [`LabelMap`] order, and a
//! record whose labels are exactly `1..n` degrades to a tuple in
//! [`TypeRegistry::record_type`], so `{1: int, 2: bool}` and
//! `int * bool` are the same handle.
//!
//! SCHEMES, SUBSTITUTIONS, UNIFICATION:
//! ------------------------------------
//! Polymorphism lives in [`Scheme`] (a type quantified over a set of
//! variables); the environment stores schemes, expressions carry
//! monotypes. [`Substitution`]s resolve to a fixed point and compose;
//! [`unify`] implements Martelli-Montanari with a mandatory occurs
//! check, so a substitution it produces is always acyclic.

pub mod scheme;
pub mod subst;
pub mod unify;

pub use scheme::Scheme;
pub use subst::Substitution;
pub use unify::{unify, UnifyError};

use indexmap::IndexMap;
use quill_util::{Label, LabelMap, Symbol};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Handle to an interned type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// A type variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyVar(pub u32);

/// Primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimType {
    Bool,
    Int,
    Real,
    Char,
    String,
    Unit,
}

impl PrimType {
    pub fn name(&self) -> &'static str {
        match self {
            PrimType::Bool => "bool",
            PrimType::Int => "int",
            PrimType::Real => "real",
            PrimType::Char => "char",
            PrimType::String => "string",
            PrimType::Unit => "unit",
        }
    }
}

/// The structure of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Primitive(PrimType),
    /// An unresolved type variable
    Var(TyVar),
    /// Function type
    Fn(TypeId, TypeId),
    /// Tuple of two or more components
    Tuple(Vec<TypeId>),
    /// Record with canonically ordered labels (never tuple-shaped; the
    /// constructor degrades those)
    Record(LabelMap<TypeId>),
    /// Ordered collection
    List(TypeId),
    /// Unordered collection
    Bag(TypeId),
    /// Indexed collection
    Vector(TypeId),
    /// A use of a named datatype; `name` keys into the registry's
    /// datatype definitions
    Data { name: Symbol, args: Vec<TypeId> },
}

/// A datatype definition, stored once in the registry under its name
#[derive(Debug, Clone)]
pub struct DataDef {
    pub name: Symbol,
    /// Formal type parameters, referenced from constructor payloads
    pub params: Vec<TyVar>,
    /// Constructors sorted by name, each with an optional payload type
    pub ctors: IndexMap<Symbol, Option<TypeId>>,
}

impl DataDef {
    /// A datatype with k type parameters is applicable to exactly k
    /// arguments
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A type alias definition (`type point = {x: int, y: int}`)
#[derive(Debug, Clone)]
pub struct AliasDef {
    pub name: Symbol,
    pub params: Vec<TyVar>,
    pub body: TypeId,
}

/// The interning type registry
///
/// Owns every type in a session. Shared immutably by in-flight
/// evaluations; expansion only ever appends.
#[derive(Debug)]
pub struct TypeRegistry {
    kinds: Vec<TypeKind>,
    descs: Vec<String>,
    by_desc: FxHashMap<String, TypeId>,
    datatypes: FxHashMap<Symbol, DataDef>,
    aliases: FxHashMap<Symbol, AliasDef>,
    next_var: u32,
    /// Cached handles for the primitives
    prims: [TypeId; 6],
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            kinds: Vec::new(),
            descs: Vec::new(),
            by_desc: FxHashMap::default(),
            datatypes: FxHashMap::default(),
            aliases: FxHashMap::default(),
            next_var: 0,
            prims: [TypeId(0); 6],
        };
        registry.prims = [
            registry.intern(TypeKind::Primitive(PrimType::Bool)),
            registry.intern(TypeKind::Primitive(PrimType::Int)),
            registry.intern(TypeKind::Primitive(PrimType::Real)),
            registry.intern(TypeKind::Primitive(PrimType::Char)),
            registry.intern(TypeKind::Primitive(PrimType::String)),
            registry.intern(TypeKind::Primitive(PrimType::Unit)),
        ];
        registry.register_option_datatype();
        registry
    }

    /// The predeclared `'a option` datatype with `NONE` and `SOME`
    fn register_option_datatype(&mut self) {
        let param = self.fresh_tyvar();
        let param_ty = self.var_type(param);
        let mut ctors = IndexMap::new();
        ctors.insert(Symbol::intern("NONE"), None);
        ctors.insert(Symbol::intern("SOME"), Some(param_ty));
        sort_ctors(&mut ctors);
        self.define_datatype(DataDef {
            name: Symbol::intern("option"),
            params: vec![param],
            ctors,
        });
    }

    // =========================================================================
    // Interning
    // =========================================================================

    /// Intern a structure, returning its stable handle
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        let desc = self.describe_kind(&kind);
        if let Some(&id) = self.by_desc.get(&desc) {
            return id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind);
        self.descs.push(desc.clone());
        self.by_desc.insert(desc, id);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.0 as usize]
    }

    /// The canonical description string a type is interned under
    pub fn describe(&self, id: TypeId) -> &str {
        &self.descs[id.0 as usize]
    }

    /// Canonical, unambiguous description of a structure. This is the
    /// interning key, so it must encode structure exactly; it is not the
    /// pretty-printed form the REPL shows.
    fn describe_kind(&self, kind: &TypeKind) -> String {
        let mut out = String::new();
        match kind {
            TypeKind::Primitive(p) => out.push_str(p.name()),
            TypeKind::Var(v) => {
                let _ = write!(out, "?{}", v.0);
            }
            TypeKind::Fn(param, result) => {
                let _ = write!(out, "({} -> {})", self.describe(*param), self.describe(*result));
            }
            TypeKind::Tuple(parts) => {
                out.push('(');
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" * ");
                    }
                    out.push_str(self.describe(*p));
                }
                out.push(')');
            }
            TypeKind::Record(fields) => {
                out.push('{');
                for (i, (label, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}:{}", label, self.describe(*ty));
                }
                out.push('}');
            }
            TypeKind::List(t) => {
                let _ = write!(out, "{} list", self.describe(*t));
            }
            TypeKind::Bag(t) => {
                let _ = write!(out, "{} bag", self.describe(*t));
            }
            TypeKind::Vector(t) => {
                let _ = write!(out, "{} vector", self.describe(*t));
            }
            TypeKind::Data { name, args } => {
                if !args.is_empty() {
                    out.push('(');
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(self.describe(*a));
                    }
                    out.push_str(") ");
                }
                let _ = write!(out, "{}", name);
            }
        }
        out
    }

    // =========================================================================
    // Type constructors
    // =========================================================================

    pub fn bool_type(&self) -> TypeId {
        self.prims[0]
    }
    pub fn int_type(&self) -> TypeId {
        self.prims[1]
    }
    pub fn real_type(&self) -> TypeId {
        self.prims[2]
    }
    pub fn char_type(&self) -> TypeId {
        self.prims[3]
    }
    pub fn string_type(&self) -> TypeId {
        self.prims[4]
    }
    pub fn unit_type(&self) -> TypeId {
        self.prims[5]
    }

    pub fn primitive(&self, p: PrimType) -> TypeId {
        match p {
            PrimType::Bool => self.prims[0],
            PrimType::Int => self.prims[1],
            PrimType::Real => self.prims[2],
            PrimType::Char => self.prims[3],
            PrimType::String => self.prims[4],
            PrimType::Unit => self.prims[5],
        }
    }

    /// Allocate a fresh, unused type variable
    pub fn fresh_tyvar(&mut self) -> TyVar {
        let v = TyVar(self.next_var);
        self.next_var += 1;
        v
    }

    /// A fresh type variable as a type
    pub fn fresh_var_type(&mut self) -> TypeId {
        let v = self.fresh_tyvar();
        self.var_type(v)
    }

    pub fn var_type(&mut self, v: TyVar) -> TypeId {
        self.intern(TypeKind::Var(v))
    }

    pub fn fn_type(&mut self, param: TypeId, result: TypeId) -> TypeId {
        self.intern(TypeKind::Fn(param, result))
    }

    /// Tuple; the empty tuple is `unit`, a singleton is the component
    pub fn tuple_type(&mut self, parts: Vec<TypeId>) -> TypeId {
        match parts.len() {
            0 => self.unit_type(),
            1 => parts[0],
            _ => self.intern(TypeKind::Tuple(parts)),
        }
    }

    /// Record; degrades to a tuple when the labels are exactly `1..n`
    pub fn record_type(&mut self, fields: LabelMap<TypeId>) -> TypeId {
        if fields.is_empty() {
            return self.unit_type();
        }
        if fields.is_tuple_shaped() {
            let parts: Vec<TypeId> = fields.values().copied().collect();
            return self.tuple_type(parts);
        }
        self.intern(TypeKind::Record(fields))
    }

    pub fn list_type(&mut self, t: TypeId) -> TypeId {
        self.intern(TypeKind::List(t))
    }

    pub fn bag_type(&mut self, t: TypeId) -> TypeId {
        self.intern(TypeKind::Bag(t))
    }

    pub fn vector_type(&mut self, t: TypeId) -> TypeId {
        self.intern(TypeKind::Vector(t))
    }

    /// A use of a datatype; panics are avoided by arity-checking at the
    /// call site (`ConstructorArityMismatch` belongs to the resolver)
    pub fn data_type(&mut self, name: Symbol, args: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Data { name, args })
    }

    // =========================================================================
    // Datatypes and aliases
    // =========================================================================

    /// Register a datatype definition under its name
    pub fn define_datatype(&mut self, def: DataDef) {
        self.datatypes.insert(def.name, def);
    }

    pub fn datatype(&self, name: Symbol) -> Option<&DataDef> {
        self.datatypes.get(&name)
    }

    pub fn define_alias(&mut self, def: AliasDef) {
        self.aliases.insert(def.name, def);
    }

    pub fn alias(&self, name: Symbol) -> Option<&AliasDef> {
        self.aliases.get(&name)
    }

    /// Look up a named type: primitive, datatype or alias head
    pub fn lookup_opt(&self, name: Symbol) -> Option<NamedType> {
        match name.as_str() {
            "bool" => return Some(NamedType::Primitive(PrimType::Bool)),
            "int" => return Some(NamedType::Primitive(PrimType::Int)),
            "real" => return Some(NamedType::Primitive(PrimType::Real)),
            "char" => return Some(NamedType::Primitive(PrimType::Char)),
            "string" => return Some(NamedType::Primitive(PrimType::String)),
            "unit" => return Some(NamedType::Primitive(PrimType::Unit)),
            "list" => return Some(NamedType::List),
            "bag" => return Some(NamedType::Bag),
            "vector" => return Some(NamedType::Vector),
            _ => {}
        }
        if self.datatypes.contains_key(&name) {
            Some(NamedType::Data(name))
        } else if self.aliases.contains_key(&name) {
            Some(NamedType::Alias(name))
        } else {
            None
        }
    }

    /// Instantiate an alias with type arguments
    ///
    /// Returns `None` when the name is unknown or the arity is wrong.
    pub fn apply_alias(&mut self, name: Symbol, args: &[TypeId]) -> Option<TypeId> {
        let def = self.aliases.get(&name)?.clone();
        if def.params.len() != args.len() {
            return None;
        }
        let mut subst = Substitution::new();
        for (param, arg) in def.params.iter().zip(args) {
            subst.bind(*param, *arg);
        }
        Some(subst.resolve(self, def.body))
    }

    /// The payload type of a constructor instantiated at `args`,
    /// together with the instantiated datatype use
    ///
    /// Returns `None` when the datatype or constructor is unknown.
    pub fn instantiate_ctor(
        &mut self,
        data_name: Symbol,
        ctor: Symbol,
        args: &[TypeId],
    ) -> Option<(Option<TypeId>, TypeId)> {
        let def = self.datatypes.get(&data_name)?.clone();
        if def.params.len() != args.len() {
            return None;
        }
        let payload = *def.ctors.get(&ctor)?;
        let mut subst = Substitution::new();
        for (param, arg) in def.params.iter().zip(args) {
            subst.bind(*param, *arg);
        }
        let payload = payload.map(|p| subst.resolve(self, p));
        let data_ty = self.data_type(data_name, args.to_vec());
        Some((payload, data_ty))
    }

    /// Find the datatype owning a constructor name
    pub fn datatype_of_ctor(&self, ctor: Symbol) -> Option<&DataDef> {
        self.datatypes.values().find(|def| def.ctors.contains_key(&ctor))
    }

    // =========================================================================
    // Structure queries
    // =========================================================================

    /// Free type variables, in first-appearance order
    pub fn free_vars(&self, ty: TypeId) -> Vec<TyVar> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        self.collect_free_vars(ty, &mut seen, &mut out);
        out
    }

    fn collect_free_vars(&self, ty: TypeId, seen: &mut BTreeSet<TyVar>, out: &mut Vec<TyVar>) {
        match self.kind(ty) {
            TypeKind::Primitive(_) => {}
            TypeKind::Var(v) => {
                if seen.insert(*v) {
                    out.push(*v);
                }
            }
            TypeKind::Fn(param, result) => {
                let (param, result) = (*param, *result);
                self.collect_free_vars(param, seen, out);
                self.collect_free_vars(result, seen, out);
            }
            TypeKind::Tuple(parts) => {
                for p in parts.clone() {
                    self.collect_free_vars(p, seen, out);
                }
            }
            TypeKind::Record(fields) => {
                let children: Vec<TypeId> = fields.values().copied().collect();
                for c in children {
                    self.collect_free_vars(c, seen, out);
                }
            }
            TypeKind::List(t) | TypeKind::Bag(t) | TypeKind::Vector(t) => {
                let t = *t;
                self.collect_free_vars(t, seen, out);
            }
            TypeKind::Data { args, .. } => {
                for a in args.clone() {
                    self.collect_free_vars(a, seen, out);
                }
            }
        }
    }

    /// Does `var` occur anywhere inside `ty`?
    pub fn occurs(&self, var: TyVar, ty: TypeId) -> bool {
        self.free_vars(ty).contains(&var)
    }

    /// Pretty-print a type the way the REPL shows it: free variables
    /// renamed `'a`, `'b`, … in order of appearance
    pub fn display(&self, ty: TypeId) -> String {
        let free = self.free_vars(ty);
        let names: FxHashMap<TyVar, String> = free
            .iter()
            .enumerate()
            .map(|(i, v)| (*v, tyvar_display_name(i)))
            .collect();
        let mut out = String::new();
        self.display_into(&mut out, ty, &names, 0);
        out
    }

    /// Levels: 0 = any, 1 = tuple operand (parenthesize `->`),
    /// 2 = constructor operand (parenthesize `*` too)
    fn display_into(
        &self,
        out: &mut String,
        ty: TypeId,
        names: &FxHashMap<TyVar, String>,
        level: u8,
    ) {
        match self.kind(ty) {
            TypeKind::Primitive(p) => out.push_str(p.name()),
            TypeKind::Var(v) => match names.get(v) {
                Some(name) => {
                    let _ = write!(out, "'{}", name);
                }
                None => {
                    let _ = write!(out, "'_{}", v.0);
                }
            },
            TypeKind::Fn(param, result) => {
                if level >= 1 {
                    out.push('(');
                }
                self.display_into(out, *param, names, 1);
                out.push_str(" -> ");
                self.display_into(out, *result, names, 0);
                if level >= 1 {
                    out.push(')');
                }
            }
            TypeKind::Tuple(parts) => {
                if level >= 2 {
                    out.push('(');
                }
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" * ");
                    }
                    self.display_into(out, *p, names, 2);
                }
                if level >= 2 {
                    out.push(')');
                }
            }
            TypeKind::Record(fields) => {
                out.push('{');
                for (i, (label, field_ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{}:", label);
                    self.display_into(out, *field_ty, names, 0);
                }
                out.push('}');
            }
            TypeKind::List(t) => {
                self.display_into(out, *t, names, 2);
                out.push_str(" list");
            }
            TypeKind::Bag(t) => {
                self.display_into(out, *t, names, 2);
                out.push_str(" bag");
            }
            TypeKind::Vector(t) => {
                self.display_into(out, *t, names, 2);
                out.push_str(" vector");
            }
            TypeKind::Data { name, args } => {
                match args.len() {
                    0 => {}
                    1 => {
                        self.display_into(out, args[0], names, 2);
                        out.push(' ');
                    }
                    _ => {
                        out.push('(');
                        for (i, a) in args.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            self.display_into(out, *a, names, 0);
                        }
                        out.push_str(") ");
                    }
                }
                let _ = write!(out, "{}", name);
            }
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a name lookup in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedType {
    Primitive(PrimType),
    List,
    Bag,
    Vector,
    Data(Symbol),
    Alias(Symbol),
}

/// Display name for the i-th type variable: 'a … 'z, then 'a1, 'b1, …
fn tyvar_display_name(i: usize) -> String {
    let letter = (b'a' + (i % 26) as u8) as char;
    if i < 26 {
        letter.to_string()
    } else {
        format!("{}{}", letter, i / 26)
    }
}

/// Helper used by record typing: build a `LabelMap` from pairs
pub fn label_map<I: IntoIterator<Item = (Label, TypeId)>>(pairs: I) -> LabelMap<TypeId> {
    LabelMap::from_entries(pairs)
}

/// Sort a constructor map by constructor name
///
/// `Symbol`'s own ordering is interning order; datatype definitions
/// need name order so that constructor maps compare canonically.
pub fn sort_ctors(ctors: &mut IndexMap<Symbol, Option<TypeId>>) {
    ctors.sort_by(|k1, _, k2, _| k1.as_str().cmp(k2.as_str()));
}
