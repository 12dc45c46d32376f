//! Foreign value providers.
//!
//! A provider injects external data into the session as ordinary
//! bindings: it returns a name-to-value map with the type of each
//! value. Providers are looked up by name at startup (`--foreign=NAME`);
//! the core holds no reflection - the registry of available providers
//! is a plain function.

use crate::value::Value;
use quill_typ::{TypeId, TypeRegistry};
use quill_util::{Label, Symbol};

/// A source of foreign bindings
pub trait ForeignProvider {
    /// The name the provider is selected by
    fn name(&self) -> &str;

    /// The bindings: each with its type (built against the session's
    /// registry) and its value
    fn provide(&self, registry: &mut TypeRegistry) -> Vec<(Symbol, TypeId, Value)>;
}

/// Look up a provider by name
pub fn find_provider(name: &str) -> Option<Box<dyn ForeignProvider>> {
    match name {
        "scott" => Some(Box::new(ScottProvider)),
        _ => None,
    }
}

/// The classic demo schema: a handful of employees and departments
pub struct ScottProvider;

impl ForeignProvider for ScottProvider {
    fn name(&self) -> &str {
        "scott"
    }

    fn provide(&self, registry: &mut TypeRegistry) -> Vec<(Symbol, TypeId, Value)> {
        let int = registry.int_type();
        let string = registry.string_type();

        let emp_row_ty = registry.record_type(
            [(Label::from("dept"), string), (Label::from("id"), int)]
                .into_iter()
                .collect(),
        );
        let emps_ty = registry.list_type(emp_row_ty);
        let emp = |dept: &str, id: i64| {
            Value::record(
                [
                    (Label::from("dept"), Value::str(dept)),
                    (Label::from("id"), Value::Int(id)),
                ]
                .into_iter()
                .collect(),
            )
        };
        let emps = Value::list(vec![
            emp("A", 100),
            emp("B", 101),
            emp("A", 102),
            emp("C", 103),
        ]);

        let dept_row_ty = registry.record_type(
            [
                (Label::from("dept"), string),
                (Label::from("dname"), string),
            ]
            .into_iter()
            .collect(),
        );
        let depts_ty = registry.list_type(dept_row_ty);
        let dept = |code: &str, dname: &str| {
            Value::record(
                [
                    (Label::from("dept"), Value::str(code)),
                    (Label::from("dname"), Value::str(dname)),
                ]
                .into_iter()
                .collect(),
            )
        };
        let depts = Value::list(vec![
            dept("A", "ACCOUNTING"),
            dept("B", "RESEARCH"),
            dept("C", "SALES"),
        ]);

        vec![
            (Symbol::intern("emps"), emps_ty, emps),
            (Symbol::intern("depts"), depts_ty, depts),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_provider() {
        assert!(find_provider("scott").is_some());
        assert!(find_provider("nessie").is_none());
    }

    #[test]
    fn test_scott_schema() {
        let mut registry = TypeRegistry::new();
        let provided = ScottProvider.provide(&mut registry);
        assert_eq!(provided.len(), 2);
        let (name, ty, value) = &provided[0];
        assert_eq!(name.as_str(), "emps");
        assert_eq!(registry.display(*ty), "{dept:string, id:int} list");
        match value {
            Value::List(items) => assert_eq!(items.len(), 4),
            other => panic!("expected list, got {:?}", other),
        }
    }
}
