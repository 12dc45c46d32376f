//! quill-eval - The Evaluator
//!
//! ============================================================================
//! EVALUATION OVERVIEW
//! ============================================================================
//!
//! A tree-walking interpreter over the core IR. Evaluation is direct
//! and synchronous, single-threaded by construction; the only effect is
//! the exception unwind, modeled as the `Err` arm of
//! [`exn::EvalResult`] rather than host unwinding.
//!
//! VALUES AND ENVIRONMENTS:
//! ------------------------
//! Values are immutable and cheap to clone (every composite is behind
//! an `Rc`). Closures capture the persistent environment by
//! reference-counted handle; applying one matches the parameter pattern
//! and evaluates the body in the extended environment. Recursive
//! declarations tie the knot through write-once slots: the slots are
//! bound first, the right-hand sides (all functions) evaluate with the
//! slots in scope, then the slots are filled.
//!
//! MATCHING AND EXCEPTIONS:
//! ------------------------
//! A `Case` tries its arms in order; no match raises `Match`. Compiled
//! function matches carry an explicit `Bind`-raising arm instead, so an
//! unmatched argument raises `Bind`. Runtime failures (`Div`,
//! `Overflow`, `Empty`, `Subscript`, ...) are exception values with a
//! position chain the REPL renders as a `raised at` trace.
//!
//! RELATIONAL PIPELINE:
//! --------------------
//! `From` pipelines stream through [`query`] as pull-based iterators; a
//! pipeline whose translation the relational adapter accepts is
//! delegated wholesale, and the in-process engine is the unconditional
//! fallback. The variant wire format ([`variant`]) and foreign
//! providers ([`foreign`]) live here too, at the value boundary.

pub mod builtins;
pub mod env;
pub mod exn;
pub mod foreign;
pub mod query;
pub mod rel;
pub mod value;
pub mod variant;

pub use env::{Binding, Env};
pub use exn::{EvalResult, ExnValue, Raise};
pub use value::{value_cmp, value_eq, Closure, Value};

use quill_core::{CoreDecl, CoreExpr, CoreKind, CorePat, CorePatKind};
use quill_par::ast::Literal;
use quill_typ::{Scheme, TypeRegistry};
use quill_util::{Pos, Symbol};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Values of overload instances, indexed per family in registration
/// order (matching the resolver's instance indices)
#[derive(Default)]
pub struct InstanceTable {
    families: FxHashMap<Symbol, Vec<Value>>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: Symbol, value: Value) -> usize {
        let family = self.families.entry(name).or_default();
        family.push(value);
        family.len() - 1
    }

    pub fn get(&self, name: Symbol, index: usize) -> Option<&Value> {
        self.families.get(&name).and_then(|f| f.get(index))
    }
}

/// The evaluator: immutable context for one statement's evaluation
pub struct Evaluator<'a> {
    pub registry: &'a TypeRegistry,
    pub adapter: &'a dyn rel::RelAdapter,
    pub instances: &'a InstanceTable,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        adapter: &'a dyn rel::RelAdapter,
        instances: &'a InstanceTable,
    ) -> Self {
        Self {
            registry,
            adapter,
            instances,
        }
    }

    /// Evaluate an expression in an environment
    pub fn eval(&self, exp: &CoreExpr, env: &Env) -> EvalResult {
        match &exp.kind {
            CoreKind::Lit(lit) => Ok(literal_value(lit)),
            CoreKind::Id(name) => match env.lookup_value(*name) {
                Some(value) => Ok(value.deref()),
                None => Err(Raise::fail(
                    &format!("unbound variable: {}", name),
                    exp.pos,
                )),
            },
            CoreKind::Ctor(name) => Ok(self.ctor_value(*name)),
            CoreKind::OverloadedUse { name, index } => {
                match self.instances.get(*name, *index) {
                    Some(value) => Ok(value.clone()),
                    None => Err(Raise::fail(
                        &format!("no instance {} of {}", index, name),
                        exp.pos,
                    )),
                }
            }
            CoreKind::RecordSel(label) => Ok(Value::SelFn(*label)),
            CoreKind::Fn { param, body } => Ok(Value::Closure(Rc::new(Closure {
                param: (**param).clone(),
                body: (**body).clone(),
                env: env.clone(),
            }))),
            CoreKind::Apply(f, arg) => {
                let vf = self.eval(f, env)?;
                let va = self.eval(arg, env)?;
                self.apply_value(vf, va, exp.pos)
                    .map_err(|raise| raise.traced(exp.pos))
            }
            CoreKind::Let(decl, body) => {
                let extended = self.eval_decl(decl, env)?;
                self.eval(body, &extended)
            }
            CoreKind::Case { scrutinee, arms } => {
                let value = self.eval(scrutinee, env)?;
                for arm in arms {
                    let mut bound = Vec::new();
                    if self.match_pattern(&arm.pat, &value, &mut bound) {
                        let extended = self.bind_values(env, bound);
                        return self.eval(&arm.body, &extended);
                    }
                }
                Err(Raise::new("Match", exp.pos))
            }
            CoreKind::Tuple(exps) => {
                let mut items = Vec::with_capacity(exps.len());
                for e in exps {
                    items.push(self.eval(e, env)?);
                }
                Ok(Value::tuple(items))
            }
            CoreKind::Record(fields) => {
                let mut map = quill_util::LabelMap::new();
                for (label, e) in fields {
                    map.insert(*label, self.eval(e, env)?);
                }
                Ok(Value::record(map))
            }
            CoreKind::List(exps) => {
                let mut items = Vec::with_capacity(exps.len());
                for e in exps {
                    items.push(self.eval(e, env)?);
                }
                Ok(Value::list(items))
            }
            CoreKind::From(steps) => {
                // Offer the pipeline to the relational adapter first;
                // the in-process engine is the unconditional fallback.
                if let Some(plan) = self.adapter.translate(steps, env) {
                    let rows = self.adapter.run(&plan, &[])?;
                    return Ok(Value::list(rows.collect()));
                }
                query::eval_pipeline(self, steps, env, exp.pos)
            }
            CoreKind::Aggregate { .. } => Err(Raise::fail(
                "aggregate application outside group/compute",
                exp.pos,
            )),
            CoreKind::Raise(tag) => Err(Raise::new(tag.as_str(), exp.pos)),
        }
    }

    /// Evaluate a declaration, returning the extended environment
    pub fn eval_decl(&self, decl: &CoreDecl, env: &Env) -> Result<Env, Raise> {
        match decl {
            CoreDecl::NonRec { pat, exp } => {
                let value = self.eval(exp, env)?;
                let mut bound = Vec::new();
                if !self.match_pattern(pat, &value, &mut bound) {
                    return Err(Raise::new("Bind", pat.pos));
                }
                Ok(self.bind_values(env, bound))
            }
            CoreDecl::Rec { binds } => {
                // Tie the knot: slots first, then fill.
                let slots: Vec<Rc<RefCell<Option<Value>>>> =
                    binds.iter().map(|_| Rc::new(RefCell::new(None))).collect();
                let bindings = binds
                    .iter()
                    .zip(&slots)
                    .map(|((name, exp), slot)| Binding {
                        name: *name,
                        scheme: Scheme::mono(exp.ty),
                        value: Value::Slot(slot.clone()),
                    })
                    .collect();
                let extended = env.extend(bindings);
                for ((_, exp), slot) in binds.iter().zip(&slots) {
                    let value = self.eval(exp, &extended)?;
                    *slot.borrow_mut() = Some(value);
                }
                Ok(extended)
            }
            CoreDecl::Datatype(names) => {
                let mut bindings = Vec::new();
                for name in names {
                    if let Some(def) = self.registry.datatype(*name) {
                        for (ctor, payload) in &def.ctors {
                            let value = match payload {
                                Some(_) => Value::CtorFn(*ctor),
                                None => Value::Constructed {
                                    ctor: *ctor,
                                    arg: None,
                                },
                            };
                            bindings.push(Binding {
                                name: *ctor,
                                scheme: Scheme::mono(self.registry.unit_type()),
                                value,
                            });
                        }
                    }
                }
                Ok(env.extend(bindings))
            }
        }
    }

    /// Apply a function value to an argument
    pub fn apply_value(&self, f: Value, arg: Value, pos: Pos) -> EvalResult {
        match f.deref() {
            Value::Closure(closure) => {
                let mut bound = Vec::new();
                if !self.match_pattern(&closure.param, &arg, &mut bound) {
                    return Err(Raise::new("Bind", pos));
                }
                let extended = self.bind_values(&closure.env, bound);
                self.eval(&closure.body, &extended)
            }
            Value::Builtin(builtin) => builtins::apply(self, &builtin, arg, pos),
            Value::CtorFn(ctor) => Ok(Value::Constructed {
                ctor,
                arg: Some(Rc::new(arg)),
            }),
            Value::SelFn(label) => project_field(&arg, label, pos),
            _ => Err(Raise::fail("value is not a function", pos)),
        }
    }

    /// Constructor as a value: nullary constructors are constants,
    /// payload constructors are functions
    pub fn ctor_value(&self, name: Symbol) -> Value {
        let has_payload = self
            .registry
            .datatype_of_ctor(name)
            .and_then(|def| def.ctors.get(&name).copied())
            .flatten()
            .is_some();
        if has_payload {
            Value::CtorFn(name)
        } else {
            Value::Constructed {
                ctor: name,
                arg: None,
            }
        }
    }

    /// Match a pattern against a value, collecting bindings; `false`
    /// means no match (and `bound` may hold partial bindings)
    pub fn match_pattern(
        &self,
        pat: &CorePat,
        value: &Value,
        bound: &mut Vec<(Symbol, Value)>,
    ) -> bool {
        let value = value.deref();
        match &pat.kind {
            CorePatKind::Wild => true,
            CorePatKind::Id(name) => {
                bound.push((*name, value));
                true
            }
            CorePatKind::Lit(lit) => value_eq(&literal_value(lit), &value),
            CorePatKind::Cons(head, tail) => match &value {
                Value::List(items) if !items.is_empty() => {
                    let rest = Value::list(items[1..].to_vec());
                    self.match_pattern(head, &items[0], bound)
                        && self.match_pattern(tail, &rest, bound)
                }
                _ => false,
            },
            CorePatKind::Tuple(pats) => match &value {
                Value::Tuple(items) if items.len() == pats.len() => pats
                    .iter()
                    .zip(items.iter())
                    .all(|(p, v)| self.match_pattern(p, v, bound)),
                _ => false,
            },
            CorePatKind::List(pats) => match &value {
                Value::List(items) if items.len() == pats.len() => pats
                    .iter()
                    .zip(items.iter())
                    .all(|(p, v)| self.match_pattern(p, v, bound)),
                _ => false,
            },
            CorePatKind::Record(fields) => fields.iter().all(|(label, p)| {
                match project_field(&value, *label, pat.pos) {
                    Ok(field_value) => self.match_pattern(p, &field_value, bound),
                    Err(_) => false,
                }
            }),
            CorePatKind::Con(name, arg) => match &value {
                Value::Constructed { ctor, arg: varg } if ctor == name => {
                    match (arg, varg) {
                        (None, None) => true,
                        (Some(p), Some(v)) => self.match_pattern(p, v, bound),
                        _ => false,
                    }
                }
                _ => false,
            },
            CorePatKind::As(name, inner) => {
                bound.push((*name, value.clone()));
                self.match_pattern(inner, &value, bound)
            }
        }
    }

    /// Extend an environment with matched values
    pub fn bind_values(&self, env: &Env, bound: Vec<(Symbol, Value)>) -> Env {
        if bound.is_empty() {
            return env.clone();
        }
        let unit = self.registry.unit_type();
        env.extend(
            bound
                .into_iter()
                .map(|(name, value)| Binding {
                    name,
                    scheme: Scheme::mono(unit),
                    value,
                })
                .collect(),
        )
    }
}

/// Project a record or tuple field
pub(crate) fn project_field(
    value: &Value,
    label: quill_util::Label,
    pos: Pos,
) -> EvalResult {
    match value.deref() {
        Value::Record(fields) => fields
            .get(&label)
            .cloned()
            .ok_or_else(|| Raise::fail(&format!("no field {}", label), pos)),
        Value::Tuple(items) => label
            .as_ordinal()
            .and_then(|i| items.get(i as usize - 1).cloned())
            .ok_or_else(|| Raise::fail(&format!("no field {}", label), pos)),
        _ => Err(Raise::fail("field selection on a non-record", pos)),
    }
}

pub(crate) fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Unit => Value::Unit,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Int(*n),
        Literal::Real(r) => Value::Real(*r),
        Literal::Char(c) => Value::Char(*c),
        Literal::Str(s) => Value::str(s.clone()),
    }
}
