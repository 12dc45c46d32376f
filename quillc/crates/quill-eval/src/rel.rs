//! The relational adapter interface.
//!
//! An external relational engine can take over evaluation of a `from`
//! pipeline: the evaluator offers every pipeline to
//! [`RelAdapter::translate`], and when the adapter accepts (returns a
//! plan), [`RelAdapter::run`] supplies the rows and the in-process
//! engine is bypassed. The default [`NoopAdapter`] declines everything,
//! and the core works unchanged with it - delegation is an
//! optimization, never a semantic dependency.
//!
//! Value conversion helpers are provided here so adapters can move
//! between engine tuples and language values: records map to rows by
//! canonical (sorted) label order, and nullable columns map to the
//! `option` wrapper.

use crate::env::Env;
use crate::exn::Raise;
use crate::value::Value;
use quill_core::CoreStep;
use quill_util::{Label, Symbol};
use std::any::Any;
use std::rc::Rc;

/// An opaque plan produced by an adapter's translator and consumed by
/// its runner
pub struct RelPlan(pub Box<dyn Any>);

/// The contract an external relational engine implements
pub trait RelAdapter {
    /// Attempt to translate a pipeline; `None` declines and the
    /// in-process engine evaluates it
    fn translate(&self, steps: &[CoreStep], env: &Env) -> Option<RelPlan>;

    /// Execute a previously translated plan; rows are returned fully
    /// materialized as language values
    fn run(
        &self,
        plan: &RelPlan,
        params: &[Value],
    ) -> Result<Box<dyn Iterator<Item = Value>>, Raise>;

    /// Make a foreign value visible to the engine under a name
    fn register_foreign(&mut self, name: Symbol, value: Value);
}

/// The default adapter: declines every pipeline
#[derive(Default)]
pub struct NoopAdapter;

impl RelAdapter for NoopAdapter {
    fn translate(&self, _steps: &[CoreStep], _env: &Env) -> Option<RelPlan> {
        None
    }

    fn run(
        &self,
        _plan: &RelPlan,
        _params: &[Value],
    ) -> Result<Box<dyn Iterator<Item = Value>>, Raise> {
        Ok(Box::new(std::iter::empty()))
    }

    fn register_foreign(&mut self, _name: Symbol, _value: Value) {}
}

/// Convert a record value to an engine row: column values in canonical
/// label order
pub fn record_to_row(value: &Value) -> Option<Vec<Value>> {
    match value.deref() {
        Value::Record(fields) => Some(fields.values().cloned().collect()),
        Value::Tuple(items) => Some(items.as_ref().clone()),
        _ => None,
    }
}

/// Convert an engine row back to a record given its (unsorted) column
/// labels; columns are positional in the labels' given order
pub fn row_to_record(labels: &[Label], columns: Vec<Value>) -> Value {
    Value::record(labels.iter().copied().zip(columns).collect())
}

/// Nullable column to `option`: absent becomes `NONE`, present wraps in
/// `SOME`
pub fn nullable_to_option(value: Option<Value>) -> Value {
    match value {
        Some(v) => Value::Constructed {
            ctor: Symbol::intern("SOME"),
            arg: Some(Rc::new(v)),
        },
        None => Value::Constructed {
            ctor: Symbol::intern("NONE"),
            arg: None,
        },
    }
}

/// `option` back to a nullable column
pub fn option_to_nullable(value: &Value) -> Option<Value> {
    match value.deref() {
        Value::Constructed { ctor, arg } if ctor.eq_str("SOME") => {
            arg.as_ref().map(|v| (**v).clone())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::value_eq;

    #[test]
    fn test_record_row_round_trip() {
        let labels = [Label::from("deptno"), Label::from("name")];
        let record = Value::record(
            [
                (Label::from("name"), Value::str("SALES")),
                (Label::from("deptno"), Value::Int(10)),
            ]
            .into_iter()
            .collect(),
        );
        let row = record_to_row(&record).unwrap();
        // Sorted order: deptno then name.
        assert!(value_eq(&row[0], &Value::Int(10)));
        let back = row_to_record(&labels, row);
        assert!(value_eq(&back, &record));
    }

    #[test]
    fn test_nullable_option_round_trip() {
        let some = nullable_to_option(Some(Value::Int(1)));
        assert!(option_to_nullable(&some).is_some());
        let none = nullable_to_option(None);
        assert!(option_to_nullable(&none).is_none());
    }

    #[test]
    fn test_noop_adapter_declines() {
        let adapter = NoopAdapter;
        assert!(adapter.translate(&[], &Env::empty()).is_none());
    }
}
