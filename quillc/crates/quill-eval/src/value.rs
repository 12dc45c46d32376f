//! Runtime values.
//!
//! Values are cheap to clone: every composite is behind an `Rc`. The
//! language has no mutable state, so sharing is safe; the single
//! exception is [`Value::Slot`], the write-once cell that ties the knot
//! for recursive bindings.
//!
//! Structural equality and ordering are defined here because several
//! relational steps need them (`distinct`, `order`, the set
//! operations, `elem`). Functions compare unequal to everything,
//! matching the language's lack of function equality; bags compare as
//! multisets.

use crate::builtins::BuiltinClosure;
use quill_core::{CoreExpr, CorePat};
use quill_util::{Label, LabelMap, Symbol};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// A closure: one parameter pattern, a body, and the captured
/// environment
#[derive(Debug)]
pub struct Closure {
    pub param: CorePat,
    pub body: CoreExpr,
    pub env: crate::env::Env,
}

/// An opaque foreign value, passed through from a provider or a
/// relational engine
pub struct ForeignValue {
    pub tag: Symbol,
    pub opaque: Rc<dyn std::any::Any>,
}

impl fmt::Debug for ForeignValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignValue({})", self.tag)
    }
}

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Real(f64),
    Char(char),
    Str(Rc<str>),
    Tuple(Rc<Vec<Value>>),
    Record(Rc<LabelMap<Value>>),
    List(Rc<Vec<Value>>),
    Bag(Rc<Vec<Value>>),
    Vector(Rc<Vec<Value>>),
    Closure(Rc<Closure>),
    /// A builtin function, possibly partially applied
    Builtin(Rc<BuiltinClosure>),
    /// A constructed datatype value
    Constructed {
        ctor: Symbol,
        arg: Option<Rc<Value>>,
    },
    /// A payload-carrying constructor used as a function
    CtorFn(Symbol),
    /// `#label` used as a function
    SelFn(Label),
    /// Write-once recursion slot; reads see the filled value
    Slot(Rc<RefCell<Option<Value>>>),
    Foreign(Rc<ForeignValue>),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn bag(items: Vec<Value>) -> Self {
        Value::Bag(Rc::new(items))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn record(fields: LabelMap<Value>) -> Self {
        Value::Record(Rc::new(fields))
    }

    /// Chase recursion slots to the underlying value
    pub fn deref(&self) -> Value {
        match self {
            Value::Slot(slot) => match slot.borrow().as_ref() {
                Some(inner) => inner.clone(),
                None => self.clone(),
            },
            other => other.clone(),
        }
    }

    /// The elements of any collection value
    pub fn collection_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Bag(items) | Value::Vector(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_ordered_collection(&self) -> bool {
        matches!(self, Value::List(_) | Value::Vector(_))
    }
}

/// Structural equality; functions are never equal, bags compare as
/// multisets
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (&a.deref(), &b.deref()) {
        (Value::Unit, Value::Unit) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Real(x), Value::Real(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) | (Value::Vector(x), Value::Vector(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| value_eq(a, b))
        }
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| value_eq(a, b))
        }
        (Value::Bag(x), Value::Bag(y)) => {
            if x.len() != y.len() {
                return false;
            }
            let mut xs: Vec<&Value> = x.iter().collect();
            let mut ys: Vec<&Value> = y.iter().collect();
            xs.sort_by(|a, b| value_cmp(a, b));
            ys.sort_by(|a, b| value_cmp(a, b));
            xs.iter().zip(ys.iter()).all(|(a, b)| value_eq(a, b))
        }
        (Value::Record(x), Value::Record(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((la, va), (lb, vb))| la == lb && value_eq(va, vb))
        }
        (
            Value::Constructed { ctor: ca, arg: aa },
            Value::Constructed { ctor: cb, arg: ab },
        ) => {
            ca == cb
                && match (aa, ab) {
                    (None, None) => true,
                    (Some(x), Some(y)) => value_eq(x, y),
                    _ => false,
                }
        }
        _ => false,
    }
}

/// Total ordering used by `order`, `distinct` and bag canonicalization
///
/// Values of different shapes order by shape rank, so the comparator is
/// total even on heterogeneous (ill-typed, impossible in practice)
/// inputs.
pub fn value_cmp(a: &Value, b: &Value) -> Ordering {
    let a = a.deref();
    let b = b.deref();
    match (&a, &b) {
        (Value::Unit, Value::Unit) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Char(x), Value::Char(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Tuple(x), Value::Tuple(y))
        | (Value::List(x), Value::List(y))
        | (Value::Vector(x), Value::Vector(y)) => seq_cmp(x, y),
        (Value::Bag(x), Value::Bag(y)) => {
            let mut xs: Vec<&Value> = x.iter().collect();
            let mut ys: Vec<&Value> = y.iter().collect();
            xs.sort_by(|a, b| value_cmp(a, b));
            ys.sort_by(|a, b| value_cmp(a, b));
            for (a, b) in xs.iter().zip(ys.iter()) {
                match value_cmp(a, b) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            xs.len().cmp(&ys.len())
        }
        (Value::Record(x), Value::Record(y)) => {
            for ((la, va), (lb, vb)) in x.iter().zip(y.iter()) {
                match la.cmp(lb) {
                    Ordering::Equal => {}
                    other => return other,
                }
                match value_cmp(va, vb) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        (
            Value::Constructed { ctor: ca, arg: aa },
            Value::Constructed { ctor: cb, arg: ab },
        ) => match ca.as_str().cmp(cb.as_str()) {
            Ordering::Equal => match (aa, ab) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => value_cmp(x, y),
            },
            other => other,
        },
        _ => shape_rank(&a).cmp(&shape_rank(&b)),
    }
}

fn seq_cmp(x: &[Value], y: &[Value]) -> Ordering {
    for (a, b) in x.iter().zip(y.iter()) {
        match value_cmp(a, b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    x.len().cmp(&y.len())
}

fn shape_rank(v: &Value) -> u8 {
    match v {
        Value::Unit => 0,
        Value::Bool(_) => 1,
        Value::Int(_) => 2,
        Value::Real(_) => 3,
        Value::Char(_) => 4,
        Value::Str(_) => 5,
        Value::Tuple(_) => 6,
        Value::Record(_) => 7,
        Value::List(_) => 8,
        Value::Bag(_) => 9,
        Value::Vector(_) => 10,
        Value::Constructed { .. } => 11,
        Value::Closure(_) => 12,
        Value::Builtin(_) => 13,
        Value::CtorFn(_) => 14,
        Value::SelFn(_) => 15,
        Value::Slot(_) => 16,
        Value::Foreign(_) => 17,
    }
}

impl fmt::Display for Value {
    /// REPL rendering: `[1,2,3]`, `{deptno=10, name="SALES"}`, `fn`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.deref() {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) if *n < 0 => write!(f, "~{}", -n),
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(r) if *r < 0.0 => write!(f, "~{}", fmt_real(-r)),
            Value::Real(r) => write!(f, "{}", fmt_real(*r)),
            Value::Char(c) => write!(f, "#\"{}\"", c),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (label, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", label, value)?;
                }
                write!(f, "}}")
            }
            Value::List(items) | Value::Bag(items) | Value::Vector(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Constructed { ctor, arg } => match arg {
                Some(arg) => write!(f, "{} {}", ctor, arg),
                None => write!(f, "{}", ctor),
            },
            Value::Closure(_) | Value::Builtin(_) | Value::CtorFn(_) | Value::SelFn(_) => {
                write!(f, "fn")
            }
            Value::Slot(_) => write!(f, "fn"),
            Value::Foreign(foreign) => write!(f, "<{}>", foreign.tag),
        }
    }
}

fn fmt_real(r: f64) -> String {
    let text = r.to_string();
    if text.contains('.') || text.contains('e') {
        text
    } else {
        format!("{}.0", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_equality() {
        assert!(value_eq(&Value::Int(3), &Value::Int(3)));
        assert!(!value_eq(&Value::Int(3), &Value::Int(4)));
        assert!(!value_eq(&Value::Int(3), &Value::str("3")));
    }

    #[test]
    fn test_list_equality_is_ordered() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(2), Value::Int(1)]);
        assert!(!value_eq(&a, &b));
    }

    #[test]
    fn test_bag_equality_is_multiset() {
        let a = Value::bag(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::bag(vec![Value::Int(2), Value::Int(1)]);
        assert!(value_eq(&a, &b));
        let c = Value::bag(vec![Value::Int(1), Value::Int(1)]);
        assert!(!value_eq(&a, &c));
    }

    #[test]
    fn test_record_equality() {
        let a = Value::record(
            [
                (Label::from("x"), Value::Int(1)),
                (Label::from("y"), Value::Int(2)),
            ]
            .into_iter()
            .collect(),
        );
        let b = Value::record(
            [
                (Label::from("y"), Value::Int(2)),
                (Label::from("x"), Value::Int(1)),
            ]
            .into_iter()
            .collect(),
        );
        assert!(value_eq(&a, &b));
    }

    #[test]
    fn test_ordering() {
        assert_eq!(value_cmp(&Value::Int(1), &Value::Int(2)), Ordering::Less);
        assert_eq!(
            value_cmp(&Value::str("a"), &Value::str("b")),
            Ordering::Less
        );
        let a = Value::tuple(vec![Value::Int(1), Value::Int(9)]);
        let b = Value::tuple(vec![Value::Int(2), Value::Int(0)]);
        assert_eq!(value_cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(-5).to_string(), "~5");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::Real(1.0).to_string(), "1.0");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1,2]"
        );
        assert_eq!(Value::str("hi").to_string(), "\"hi\"");
        let rec = Value::record(
            [
                (Label::from("name"), Value::str("SALES")),
                (Label::from("deptno"), Value::Int(10)),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(rec.to_string(), "{deptno=10,name=\"SALES\"}");
    }

    #[test]
    fn test_constructed_display() {
        let v = Value::Constructed {
            ctor: Symbol::intern("SOME"),
            arg: Some(Rc::new(Value::Int(3))),
        };
        assert_eq!(v.to_string(), "SOME 3");
    }

    #[test]
    fn test_slot_deref() {
        let slot = Rc::new(RefCell::new(None));
        let v = Value::Slot(slot.clone());
        *slot.borrow_mut() = Some(Value::Int(7));
        assert!(value_eq(&v, &Value::Int(7)));
    }
}
