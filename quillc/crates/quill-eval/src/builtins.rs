//! Builtin functions and the initial basis.
//!
//! Lowered operators (`+`, `::`, `elem`, …) and the library functions
//! (`map`, `hd`, `sum`, `fixpoint`, …) are all values of
//! [`Value::Builtin`]. A builtin knows its curried arity; applying it
//! to fewer arguments returns a new builtin with the argument captured,
//! so `map f` is a value like any other.
//!
//! [`basis`] produces the initial environment triples
//! `(name, scheme, value)`; the driver installs them once per session.
//!
//! Arithmetic notes: `div`/`mod` are flooring division with the
//! remainder taking the divisor's sign; integer overflow raises
//! `Overflow`, division by zero raises `Div`; `chr` outside 0..255
//! raises `Chr`; `hd`/`tl`/`min`/`max` of an empty collection raise
//! `Empty`; `nth` out of range raises `Subscript`.

use crate::exn::{EvalResult, Raise};
use crate::value::{value_cmp, value_eq, Value};
use crate::Evaluator;
use quill_typ::{Scheme, TypeId, TypeRegistry};
use quill_util::{Pos, Symbol};
use std::rc::Rc;

/// The builtin operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    // Operators over a pair argument
    Add,
    Sub,
    Mul,
    DivReal,
    DivInt,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Elem,
    Notelem,
    ConsOp,
    Append,
    // Unary
    Neg,
    Not,
    Abs,
    Ceil,
    Floor,
    RealOf,
    Trunc,
    Ord,
    Chr,
    Size,
    StrOf,
    Ignore,
    // Collections
    Hd,
    Tl,
    Rev,
    Length,
    Null,
    NonEmpty,
    ConcatLists,
    Nth,
    // Higher-order (curried)
    Map,
    Filter,
    Foldl,
    // Aggregates
    Sum,
    Count,
    MinFn,
    MaxFn,
    Avg,
    Collect,
    // Deductive fixpoint
    Fixpoint,
}

impl BuiltinKind {
    /// Curried arity: how many applications before the body runs
    pub fn arity(&self) -> usize {
        match self {
            BuiltinKind::Map | BuiltinKind::Filter => 2,
            BuiltinKind::Foldl => 3,
            _ => 1,
        }
    }
}

/// A builtin with its captured (partially applied) arguments
#[derive(Debug)]
pub struct BuiltinClosure {
    pub kind: BuiltinKind,
    pub captured: Vec<Value>,
}

impl BuiltinClosure {
    pub fn value(kind: BuiltinKind) -> Value {
        Value::Builtin(Rc::new(BuiltinClosure {
            kind,
            captured: Vec::new(),
        }))
    }
}

/// Apply a builtin to one more argument
pub fn apply(
    evaluator: &Evaluator,
    builtin: &BuiltinClosure,
    arg: Value,
    pos: Pos,
) -> EvalResult {
    let mut args = builtin.captured.clone();
    args.push(arg);
    if args.len() < builtin.kind.arity() {
        return Ok(Value::Builtin(Rc::new(BuiltinClosure {
            kind: builtin.kind,
            captured: args,
        })));
    }
    exec(evaluator, builtin.kind, args, pos)
}

fn exec(evaluator: &Evaluator, kind: BuiltinKind, mut args: Vec<Value>, pos: Pos) -> EvalResult {
    match kind {
        BuiltinKind::Add => arith(args, pos, i64::checked_add, |a, b| a + b),
        BuiltinKind::Sub => arith(args, pos, i64::checked_sub, |a, b| a - b),
        BuiltinKind::Mul => arith(args, pos, i64::checked_mul, |a, b| a * b),
        BuiltinKind::DivReal => {
            let (a, b) = pair(args);
            match (a.deref(), b.deref()) {
                (Value::Real(x), Value::Real(y)) => Ok(Value::Real(x / y)),
                _ => Err(Raise::fail("real division expects reals", pos)),
            }
        }
        BuiltinKind::DivInt | BuiltinKind::Mod => {
            let (a, b) = pair(args);
            match (a.deref(), b.deref()) {
                (Value::Int(x), Value::Int(y)) => {
                    if y == 0 {
                        return Err(Raise::new("Div", pos));
                    }
                    let (q, r) = floor_div_mod(x, y);
                    Ok(Value::Int(if kind == BuiltinKind::DivInt { q } else { r }))
                }
                _ => Err(Raise::fail("div expects integers", pos)),
            }
        }
        BuiltinKind::Concat => {
            let (a, b) = pair(args);
            match (a.deref(), b.deref()) {
                (Value::Str(x), Value::Str(y)) => {
                    Ok(Value::str(format!("{}{}", x, y)))
                }
                _ => Err(Raise::fail("^ expects strings", pos)),
            }
        }
        BuiltinKind::Eq => {
            let (a, b) = pair(args);
            Ok(Value::Bool(value_eq(&a, &b)))
        }
        BuiltinKind::Ne => {
            let (a, b) = pair(args);
            Ok(Value::Bool(!value_eq(&a, &b)))
        }
        BuiltinKind::Lt | BuiltinKind::Le | BuiltinKind::Gt | BuiltinKind::Ge => {
            let (a, b) = pair(args);
            let ordering = value_cmp(&a, &b);
            let result = match kind {
                BuiltinKind::Lt => ordering.is_lt(),
                BuiltinKind::Le => ordering.is_le(),
                BuiltinKind::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BuiltinKind::Elem | BuiltinKind::Notelem => {
            let (x, coll) = pair(args);
            let coll = coll.deref();
            let items = coll
                .collection_items()
                .ok_or_else(|| Raise::fail("elem expects a collection", pos))?;
            let found = items.iter().any(|item| value_eq(item, &x));
            Ok(Value::Bool(if kind == BuiltinKind::Elem {
                found
            } else {
                !found
            }))
        }
        BuiltinKind::ConsOp => {
            let (x, xs) = pair(args);
            match xs.deref() {
                Value::List(items) => {
                    let mut out = Vec::with_capacity(items.len() + 1);
                    out.push(x);
                    out.extend(items.iter().cloned());
                    Ok(Value::list(out))
                }
                _ => Err(Raise::fail(":: expects a list", pos)),
            }
        }
        BuiltinKind::Append => {
            let (xs, ys) = pair(args);
            match (xs.deref(), ys.deref()) {
                (Value::List(a), Value::List(b)) => {
                    let mut out = a.as_ref().clone();
                    out.extend(b.iter().cloned());
                    Ok(Value::list(out))
                }
                _ => Err(Raise::fail("@ expects lists", pos)),
            }
        }
        BuiltinKind::Neg => match args.remove(0).deref() {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Raise::new("Overflow", pos)),
            Value::Real(r) => Ok(Value::Real(-r)),
            _ => Err(Raise::fail("~ expects a number", pos)),
        },
        BuiltinKind::Not => match args.remove(0).deref() {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => Err(Raise::fail("not expects a bool", pos)),
        },
        BuiltinKind::Abs => match args.remove(0).deref() {
            Value::Int(n) => n
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| Raise::new("Overflow", pos)),
            Value::Real(r) => Ok(Value::Real(r.abs())),
            _ => Err(Raise::fail("abs expects a number", pos)),
        },
        BuiltinKind::Ceil => real_to_int(args, pos, f64::ceil),
        BuiltinKind::Floor => real_to_int(args, pos, f64::floor),
        BuiltinKind::RealOf => match args.remove(0).deref() {
            Value::Int(n) => Ok(Value::Real(n as f64)),
            _ => Err(Raise::fail("real expects an int", pos)),
        },
        BuiltinKind::Trunc => real_to_int(args, pos, f64::trunc),
        BuiltinKind::Ord => match args.remove(0).deref() {
            Value::Char(c) => Ok(Value::Int(c as i64)),
            _ => Err(Raise::fail("ord expects a char", pos)),
        },
        BuiltinKind::Chr => match args.remove(0).deref() {
            Value::Int(n) => {
                if (0..=255).contains(&n) {
                    Ok(Value::Char(n as u8 as char))
                } else {
                    Err(Raise::new("Chr", pos))
                }
            }
            _ => Err(Raise::fail("chr expects an int", pos)),
        },
        BuiltinKind::Size => match args.remove(0).deref() {
            Value::Str(s) => Ok(Value::Int(s.len() as i64)),
            _ => Err(Raise::fail("size expects a string", pos)),
        },
        BuiltinKind::StrOf => match args.remove(0).deref() {
            Value::Char(c) => Ok(Value::str(c.to_string())),
            _ => Err(Raise::fail("str expects a char", pos)),
        },
        BuiltinKind::Ignore => Ok(Value::Unit),
        BuiltinKind::Hd => {
            let items = nonempty_items(&args[0], pos)?;
            Ok(items[0].clone())
        }
        BuiltinKind::Tl => {
            let items = nonempty_items(&args[0], pos)?;
            Ok(Value::list(items[1..].to_vec()))
        }
        BuiltinKind::Rev => {
            let items = collection(&args[0], pos)?;
            let mut out = items.to_vec();
            out.reverse();
            Ok(Value::list(out))
        }
        BuiltinKind::Length | BuiltinKind::Count => {
            let items = collection(&args[0], pos)?;
            Ok(Value::Int(items.len() as i64))
        }
        BuiltinKind::Null => {
            let items = collection(&args[0], pos)?;
            Ok(Value::Bool(items.is_empty()))
        }
        BuiltinKind::NonEmpty => {
            let items = collection(&args[0], pos)?;
            Ok(Value::Bool(!items.is_empty()))
        }
        BuiltinKind::ConcatLists => {
            let items = collection(&args[0], pos)?.to_vec();
            let mut out = Vec::new();
            for item in items {
                out.extend(collection(&item, pos)?.iter().cloned());
            }
            Ok(Value::list(out))
        }
        BuiltinKind::Nth => {
            let (xs, i) = pair(args);
            let items = collection(&xs, pos)?;
            match i.deref() {
                Value::Int(index) if index >= 0 && (index as usize) < items.len() => {
                    Ok(items[index as usize].clone())
                }
                Value::Int(_) => Err(Raise::new("Subscript", pos)),
                _ => Err(Raise::fail("nth expects an int index", pos)),
            }
        }
        BuiltinKind::Map => {
            let f = args[0].clone();
            let items = collection(&args[1], pos)?.to_vec();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluator.apply_value(f.clone(), item, pos)?);
            }
            Ok(Value::list(out))
        }
        BuiltinKind::Filter => {
            let f = args[0].clone();
            let items = collection(&args[1], pos)?.to_vec();
            let mut out = Vec::new();
            for item in items {
                match evaluator.apply_value(f.clone(), item.clone(), pos)?.deref() {
                    Value::Bool(true) => out.push(item),
                    Value::Bool(false) => {}
                    _ => return Err(Raise::fail("filter expects a predicate", pos)),
                }
            }
            Ok(Value::list(out))
        }
        BuiltinKind::Foldl => {
            let f = args[0].clone();
            let mut acc = args[1].clone();
            let items = collection(&args[2], pos)?.to_vec();
            for item in items {
                acc = evaluator.apply_value(f.clone(), Value::tuple(vec![item, acc]), pos)?;
            }
            Ok(acc)
        }
        BuiltinKind::Sum => {
            let items = collection(&args[0], pos)?;
            let mut int_sum: i64 = 0;
            let mut real_sum: f64 = 0.0;
            let mut saw_real = false;
            for item in items.iter() {
                match item.deref() {
                    Value::Int(n) => {
                        int_sum = int_sum
                            .checked_add(n)
                            .ok_or_else(|| Raise::new("Overflow", pos))?;
                    }
                    Value::Real(r) => {
                        saw_real = true;
                        real_sum += r;
                    }
                    _ => return Err(Raise::fail("sum expects numbers", pos)),
                }
            }
            if saw_real {
                Ok(Value::Real(real_sum + int_sum as f64))
            } else {
                Ok(Value::Int(int_sum))
            }
        }
        BuiltinKind::MinFn | BuiltinKind::MaxFn => {
            let items = nonempty_items(&args[0], pos)?;
            let mut best = items[0].clone();
            for item in &items[1..] {
                let ordering = value_cmp(item, &best);
                let better = if kind == BuiltinKind::MinFn {
                    ordering.is_lt()
                } else {
                    ordering.is_gt()
                };
                if better {
                    best = item.clone();
                }
            }
            Ok(best)
        }
        BuiltinKind::Avg => {
            let items = nonempty_items(&args[0], pos)?;
            let mut sum: i64 = 0;
            for item in items.iter() {
                match item.deref() {
                    Value::Int(n) => {
                        sum = sum
                            .checked_add(n)
                            .ok_or_else(|| Raise::new("Overflow", pos))?;
                    }
                    _ => return Err(Raise::fail("avg expects integers", pos)),
                }
            }
            let (q, _) = floor_div_mod(sum, items.len() as i64);
            Ok(Value::Int(q))
        }
        BuiltinKind::Collect => {
            let items = collection(&args[0], pos)?;
            Ok(Value::list(items.to_vec()))
        }
        BuiltinKind::Fixpoint => fixpoint(evaluator, args.remove(0), pos),
    }
}

/// Flooring division; the remainder takes the divisor's sign
fn floor_div_mod(a: i64, b: i64) -> (i64, i64) {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        (q - 1, r + b)
    } else {
        (q, r)
    }
}

fn arith(
    args: Vec<Value>,
    pos: Pos,
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> EvalResult {
    let (a, b) = pair(args);
    match (a.deref(), b.deref()) {
        (Value::Int(x), Value::Int(y)) => int_op(x, y)
            .map(Value::Int)
            .ok_or_else(|| Raise::new("Overflow", pos)),
        (Value::Real(x), Value::Real(y)) => Ok(Value::Real(real_op(x, y))),
        _ => Err(Raise::fail("arithmetic expects two numbers", pos)),
    }
}

fn real_to_int(mut args: Vec<Value>, pos: Pos, op: fn(f64) -> f64) -> EvalResult {
    match args.remove(0).deref() {
        Value::Real(r) => {
            let rounded = op(r);
            if rounded.is_finite() && (i64::MIN as f64..=i64::MAX as f64).contains(&rounded) {
                Ok(Value::Int(rounded as i64))
            } else {
                Err(Raise::new("Overflow", pos))
            }
        }
        _ => Err(Raise::fail("expected a real", pos)),
    }
}

fn pair(mut args: Vec<Value>) -> (Value, Value) {
    match args.remove(0).deref() {
        Value::Tuple(items) if items.len() == 2 => (items[0].clone(), items[1].clone()),
        other => (other, Value::Unit),
    }
}

fn collection(v: &Value, pos: Pos) -> Result<Rc<Vec<Value>>, Raise> {
    match v.deref() {
        Value::List(items) | Value::Bag(items) | Value::Vector(items) => Ok(items),
        _ => Err(Raise::fail("expected a collection", pos)),
    }
}

fn nonempty_items(v: &Value, pos: Pos) -> Result<Rc<Vec<Value>>, Raise> {
    let items = collection(v, pos)?;
    if items.is_empty() {
        Err(Raise::new("Empty", pos))
    } else {
        Ok(items)
    }
}

/// Semi-naive fixpoint: `fixpoint (seed, step)`
///
/// `step (all, new)` derives one round from the running union and the
/// previous round's frontier; iteration stops when a round adds nothing
/// unseen. The result is the final union, in derivation order.
fn fixpoint(evaluator: &Evaluator, arg: Value, pos: Pos) -> EvalResult {
    let (seed, step) = match arg.deref() {
        Value::Tuple(items) if items.len() == 2 => (items[0].clone(), items[1].clone()),
        _ => return Err(Raise::fail("fixpoint expects (seed, step)", pos)),
    };
    let mut all: Vec<Value> = Vec::new();
    for item in collection(&seed, pos)?.iter() {
        if !all.iter().any(|seen| value_eq(seen, item)) {
            all.push(item.clone());
        }
    }
    let mut frontier = all.clone();
    while !frontier.is_empty() {
        let round = evaluator.apply_value(
            step.clone(),
            Value::tuple(vec![
                Value::list(all.clone()),
                Value::list(frontier.clone()),
            ]),
            pos,
        )?;
        let mut fresh = Vec::new();
        for item in collection(&round, pos)?.iter() {
            let unseen = !all.iter().any(|seen| value_eq(seen, item))
                && !fresh.iter().any(|seen| value_eq(seen, item));
            if unseen {
                fresh.push(item.clone());
            }
        }
        all.extend(fresh.iter().cloned());
        frontier = fresh;
    }
    Ok(Value::list(all))
}

// =============================================================================
// The initial basis
// =============================================================================

/// Build the initial environment: `(name, scheme, value)` triples
pub fn basis(registry: &mut TypeRegistry) -> Vec<(Symbol, Scheme, Value)> {
    let mut out = Vec::new();
    let int = registry.int_type();
    let real = registry.real_type();
    let bool_ty = registry.bool_type();
    let char_ty = registry.char_type();
    let string = registry.string_type();
    let unit = registry.unit_type();

    let mut entry = |name: &str, scheme: Scheme, kind: BuiltinKind| {
        out.push((Symbol::intern(name), scheme, BuiltinClosure::value(kind)));
    };

    // Operators. Their schemes are not consulted by inference (infix
    // typing is structural) but keep the environment self-describing.
    let int_pair = registry.tuple_type(vec![int, int]);
    let int_binop = registry.fn_type(int_pair, int);
    for (name, kind) in [
        ("+", BuiltinKind::Add),
        ("-", BuiltinKind::Sub),
        ("*", BuiltinKind::Mul),
        ("div", BuiltinKind::DivInt),
        ("mod", BuiltinKind::Mod),
    ] {
        entry(name, Scheme::mono(int_binop), kind);
    }
    let real_pair = registry.tuple_type(vec![real, real]);
    let real_binop = registry.fn_type(real_pair, real);
    entry("/", Scheme::mono(real_binop), BuiltinKind::DivReal);
    let str_pair = registry.tuple_type(vec![string, string]);
    let str_binop = registry.fn_type(str_pair, string);
    entry("^", Scheme::mono(str_binop), BuiltinKind::Concat);

    for (name, kind) in [
        ("=", BuiltinKind::Eq),
        ("<>", BuiltinKind::Ne),
        ("<", BuiltinKind::Lt),
        ("<=", BuiltinKind::Le),
        (">", BuiltinKind::Gt),
        (">=", BuiltinKind::Ge),
    ] {
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let a_pair = registry.tuple_type(vec![ta, ta]);
        let cmp_ty = registry.fn_type(a_pair, bool_ty);
        entry(
            name,
            Scheme {
                vars: vec![a],
                body: cmp_ty,
            },
            kind,
        );
    }

    // elem / notelem : 'a * 'a list -> bool
    for (name, kind) in [("elem", BuiltinKind::Elem), ("notelem", BuiltinKind::Notelem)] {
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let list_a = registry.list_type(ta);
        let arg = registry.tuple_type(vec![ta, list_a]);
        let ty = registry.fn_type(arg, bool_ty);
        entry(
            name,
            Scheme {
                vars: vec![a],
                body: ty,
            },
            kind,
        );
    }

    // :: : 'a * 'a list -> 'a list ; @ : 'a list * 'a list -> 'a list
    {
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let list_a = registry.list_type(ta);
        let arg = registry.tuple_type(vec![ta, list_a]);
        let ty = registry.fn_type(arg, list_a);
        entry(
            "::",
            Scheme {
                vars: vec![a],
                body: ty,
            },
            BuiltinKind::ConsOp,
        );
    }
    {
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let list_a = registry.list_type(ta);
        let arg = registry.tuple_type(vec![list_a, list_a]);
        let ty = registry.fn_type(arg, list_a);
        entry(
            "@",
            Scheme {
                vars: vec![a],
                body: ty,
            },
            BuiltinKind::Append,
        );
    }

    // Unary numerics and conversions
    let int_to_int = registry.fn_type(int, int);
    entry("~", Scheme::mono(int_to_int), BuiltinKind::Neg);
    entry("abs", Scheme::mono(int_to_int), BuiltinKind::Abs);
    let bool_to_bool = registry.fn_type(bool_ty, bool_ty);
    entry("not", Scheme::mono(bool_to_bool), BuiltinKind::Not);
    let real_to_int_ty = registry.fn_type(real, int);
    entry("ceil", Scheme::mono(real_to_int_ty), BuiltinKind::Ceil);
    entry("floor", Scheme::mono(real_to_int_ty), BuiltinKind::Floor);
    entry("trunc", Scheme::mono(real_to_int_ty), BuiltinKind::Trunc);
    let int_to_real = registry.fn_type(int, real);
    entry("real", Scheme::mono(int_to_real), BuiltinKind::RealOf);
    let char_to_int = registry.fn_type(char_ty, int);
    entry("ord", Scheme::mono(char_to_int), BuiltinKind::Ord);
    let int_to_char = registry.fn_type(int, char_ty);
    entry("chr", Scheme::mono(int_to_char), BuiltinKind::Chr);
    let string_to_int = registry.fn_type(string, int);
    entry("size", Scheme::mono(string_to_int), BuiltinKind::Size);
    let char_to_string = registry.fn_type(char_ty, string);
    entry("str", Scheme::mono(char_to_string), BuiltinKind::StrOf);
    {
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let ty = registry.fn_type(ta, unit);
        entry(
            "ignore",
            Scheme {
                vars: vec![a],
                body: ty,
            },
            BuiltinKind::Ignore,
        );
    }

    // List functions
    let list_fn = |registry: &mut TypeRegistry,
                   make: &dyn Fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId|
     -> Scheme {
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let list_a = registry.list_type(ta);
        let body = make(registry, ta, list_a);
        Scheme {
            vars: vec![a],
            body,
        }
    };
    entry(
        "hd",
        list_fn(registry, &|r, ta, list_a| r.fn_type(list_a, ta)),
        BuiltinKind::Hd,
    );
    entry(
        "tl",
        list_fn(registry, &|r, _, list_a| r.fn_type(list_a, list_a)),
        BuiltinKind::Tl,
    );
    entry(
        "rev",
        list_fn(registry, &|r, _, list_a| r.fn_type(list_a, list_a)),
        BuiltinKind::Rev,
    );
    entry(
        "length",
        list_fn(registry, &|r, _, list_a| {
            let int = r.int_type();
            r.fn_type(list_a, int)
        }),
        BuiltinKind::Length,
    );
    entry(
        "null",
        list_fn(registry, &|r, _, list_a| {
            let b = r.bool_type();
            r.fn_type(list_a, b)
        }),
        BuiltinKind::Null,
    );
    entry(
        "nonEmpty",
        list_fn(registry, &|r, _, list_a| {
            let b = r.bool_type();
            r.fn_type(list_a, b)
        }),
        BuiltinKind::NonEmpty,
    );
    entry(
        "concat",
        list_fn(registry, &|r, _, list_a| {
            let list_list = r.list_type(list_a);
            r.fn_type(list_list, list_a)
        }),
        BuiltinKind::ConcatLists,
    );
    entry(
        "nth",
        list_fn(registry, &|r, ta, list_a| {
            let int = r.int_type();
            let arg = r.tuple_type(vec![list_a, int]);
            r.fn_type(arg, ta)
        }),
        BuiltinKind::Nth,
    );

    // map : ('a -> 'b) -> 'a list -> 'b list
    {
        let a = registry.fresh_tyvar();
        let b = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let tb = registry.var_type(b);
        let f = registry.fn_type(ta, tb);
        let list_a = registry.list_type(ta);
        let list_b = registry.list_type(tb);
        let inner = registry.fn_type(list_a, list_b);
        let ty = registry.fn_type(f, inner);
        entry(
            "map",
            Scheme {
                vars: vec![a, b],
                body: ty,
            },
            BuiltinKind::Map,
        );
    }
    // filter : ('a -> bool) -> 'a list -> 'a list
    {
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let pred = registry.fn_type(ta, bool_ty);
        let list_a = registry.list_type(ta);
        let inner = registry.fn_type(list_a, list_a);
        let ty = registry.fn_type(pred, inner);
        entry(
            "filter",
            Scheme {
                vars: vec![a],
                body: ty,
            },
            BuiltinKind::Filter,
        );
    }
    // foldl : ('a * 'b -> 'b) -> 'b -> 'a list -> 'b
    {
        let a = registry.fresh_tyvar();
        let b = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let tb = registry.var_type(b);
        let step_arg = registry.tuple_type(vec![ta, tb]);
        let step = registry.fn_type(step_arg, tb);
        let list_a = registry.list_type(ta);
        let from_list = registry.fn_type(list_a, tb);
        let from_init = registry.fn_type(tb, from_list);
        let ty = registry.fn_type(step, from_init);
        entry(
            "foldl",
            Scheme {
                vars: vec![a, b],
                body: ty,
            },
            BuiltinKind::Foldl,
        );
    }

    // Aggregates
    let int_list = registry.list_type(int);
    let sum_ty = registry.fn_type(int_list, int);
    entry("sum", Scheme::mono(sum_ty), BuiltinKind::Sum);
    entry("avg", Scheme::mono(sum_ty), BuiltinKind::Avg);
    entry(
        "count",
        list_fn(registry, &|r, _, list_a| {
            let int = r.int_type();
            r.fn_type(list_a, int)
        }),
        BuiltinKind::Count,
    );
    entry(
        "min",
        list_fn(registry, &|r, ta, list_a| r.fn_type(list_a, ta)),
        BuiltinKind::MinFn,
    );
    entry(
        "max",
        list_fn(registry, &|r, ta, list_a| r.fn_type(list_a, ta)),
        BuiltinKind::MaxFn,
    );
    entry(
        "collect",
        list_fn(registry, &|r, _, list_a| r.fn_type(list_a, list_a)),
        BuiltinKind::Collect,
    );

    // fixpoint : 'a list * ('a list * 'a list -> 'a list) -> 'a list
    {
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let list_a = registry.list_type(ta);
        let step_arg = registry.tuple_type(vec![list_a, list_a]);
        let step = registry.fn_type(step_arg, list_a);
        let arg = registry.tuple_type(vec![list_a, step]);
        let ty = registry.fn_type(arg, list_a);
        entry(
            "fixpoint",
            Scheme {
                vars: vec![a],
                body: ty,
            },
            BuiltinKind::Fixpoint,
        );
    }

    out
}
