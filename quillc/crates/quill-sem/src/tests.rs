//! Resolver tests: statements are threaded through a small session so
//! bindings from one statement are visible to the next, the way the
//! REPL drives the resolver.

use crate::*;
use quill_par::Parser;
use quill_typ::{Scheme, TypeRegistry};
use quill_util::{FileId, Label, Symbol};
use rustc_hash::FxHashMap;

struct TestSession {
    registry: TypeRegistry,
    overloads: OverloadTable,
    globals: FxHashMap<Symbol, EnvEntry>,
}

impl TestSession {
    fn new() -> Self {
        let mut registry = TypeRegistry::new();
        let mut globals = FxHashMap::default();

        // A handful of builtins the tests lean on.
        let int = registry.int_type();
        let bool_ty = registry.bool_type();
        let string = registry.string_type();

        // length, count : 'a list -> int
        for name in ["length", "count"] {
            let a = registry.fresh_tyvar();
            let ta = registry.var_type(a);
            let list_a = registry.list_type(ta);
            let ty = registry.fn_type(list_a, int);
            globals.insert(
                Symbol::intern(name),
                EnvEntry::var(Scheme { vars: vec![a], body: ty }),
            );
        }
        // sum : int list -> int
        let int_list = registry.list_type(int);
        let sum_ty = registry.fn_type(int_list, int);
        globals.insert(Symbol::intern("sum"), EnvEntry::var(Scheme::mono(sum_ty)));
        // nonEmpty : 'a list -> bool
        let a = registry.fresh_tyvar();
        let ta = registry.var_type(a);
        let list_a = registry.list_type(ta);
        let ne_ty = registry.fn_type(list_a, bool_ty);
        globals.insert(
            Symbol::intern("nonEmpty"),
            EnvEntry::var(Scheme { vars: vec![a], body: ne_ty }),
        );
        // emps : {deptno:int, id:int, name:string} list (and a bag copy)
        let emp_row = registry.record_type(
            [
                (Label::from("deptno"), int),
                (Label::from("id"), int),
                (Label::from("name"), string),
            ]
            .into_iter()
            .collect(),
        );
        let emp_list = registry.list_type(emp_row);
        let emp_bag = registry.bag_type(emp_row);
        globals.insert(Symbol::intern("emps"), EnvEntry::var(Scheme::mono(emp_list)));
        globals.insert(
            Symbol::intern("empsBag"),
            EnvEntry::var(Scheme::mono(emp_bag)),
        );

        Self {
            registry,
            overloads: OverloadTable::new(),
            globals,
        }
    }

    fn run(&mut self, source: &str) -> Result<TStatement, TypeError> {
        let stmt = Parser::parse_single(source, FileId::STDIN).expect("test source parses");
        let mut resolver =
            TypeResolver::new(&mut self.registry, &self.globals, &mut self.overloads);
        let tstmt = resolver.resolve_statement(&stmt)?;
        for (name, scheme) in &tstmt.bindings {
            let entry = match self.registry.datatype_of_ctor(*name) {
                Some(def) => EnvEntry::ctor(scheme.clone(), def.name),
                None => EnvEntry::var(scheme.clone()),
            };
            self.globals.insert(*name, entry);
        }
        Ok(tstmt)
    }

    /// Resolve and render the first binding's type
    fn type_of(&mut self, source: &str) -> Result<String, TypeError> {
        let tstmt = self.run(source)?;
        let (_, scheme) = tstmt
            .bindings
            .first()
            .expect("statement produced a binding");
        Ok(self.registry.display(scheme.body))
    }
}

fn type_of(source: &str) -> Result<String, TypeError> {
    TestSession::new().type_of(source)
}

#[test]
fn test_factorial_type() {
    assert_eq!(
        type_of("fun fact n = if n < 1 then 1 else n * fact (n - 1);").unwrap(),
        "int -> int"
    );
}

#[test]
fn test_identity_is_polymorphic() {
    assert_eq!(type_of("val id = fn x => x;").unwrap(), "'a -> 'a");
}

#[test]
fn test_let_polymorphism() {
    assert_eq!(
        type_of("val p = let val id = fn x => x in (id 1, id \"a\") end;").unwrap(),
        "int * string"
    );
}

#[test]
fn test_lambda_bound_var_is_monomorphic() {
    // x is lambda-bound, so both uses must agree.
    let err = type_of("val f = fn g => (g 1, g \"a\");").unwrap_err();
    assert!(matches!(err, TypeError::TypeMismatch { .. }));
}

#[test]
fn test_numeric_defaults_to_int() {
    assert_eq!(type_of("val dbl = fn x => x + x;").unwrap(), "int -> int");
}

#[test]
fn test_real_arithmetic() {
    assert_eq!(type_of("val x = 1.5 + 2.0;").unwrap(), "real");
    assert_eq!(type_of("val x = 1.0 / 2.0;").unwrap(), "real");
}

#[test]
fn test_arithmetic_mixing_is_an_error() {
    assert!(type_of("val x = 1 + 2.0;").is_err());
    assert!(type_of("val x = 1 + \"a\";").is_err());
}

#[test]
fn test_div_mod_are_int() {
    assert_eq!(type_of("val x = 7 div 2;").unwrap(), "int");
    assert_eq!(type_of("val x = 7 mod 2;").unwrap(), "int");
}

#[test]
fn test_string_ops() {
    assert_eq!(type_of("val s = \"a\" ^ \"b\";").unwrap(), "string");
    assert_eq!(type_of("val b = \"a\" < \"b\";").unwrap(), "bool");
}

#[test]
fn test_unbound_identifier() {
    assert!(matches!(
        type_of("val x = mystery;").unwrap_err(),
        TypeError::UnboundId(_, _)
    ));
}

#[test]
fn test_infinite_type_rejected() {
    // `fun f x = f` forces f's result to be f itself.
    assert!(type_of("fun f x = f;").is_err());
}

#[test]
fn test_record_construction_and_selection() {
    assert_eq!(
        type_of("val e = {id = 1, name = \"a\"};").unwrap(),
        "{id:int, name:string}"
    );
    assert_eq!(
        type_of("val n = #id {id = 1, name = \"a\"};").unwrap(),
        "int"
    );
    assert_eq!(
        type_of("val n = {id = 1, name = \"a\"}.name;").unwrap(),
        "string"
    );
}

#[test]
fn test_tuple_selection() {
    assert_eq!(type_of("val x = #1 (1, \"a\");").unwrap(), "int");
    assert_eq!(type_of("val x = #2 (1, \"a\");").unwrap(), "string");
}

#[test]
fn test_no_such_field() {
    assert!(matches!(
        type_of("val x = #nope {id = 1};").unwrap_err(),
        TypeError::NoSuchField { .. }
    ));
}

#[test]
fn test_functional_update_keeps_type() {
    assert_eq!(
        type_of("val e = {{id = 1, name = \"a\"} with id = 2};").unwrap(),
        "{id:int, name:string}"
    );
    // Updating a missing field is an error.
    assert!(type_of("val e = {{id = 1} with name = \"a\"};").is_err());
}

#[test]
fn test_record_pattern_with_ellipsis_needs_annotation() {
    assert!(matches!(
        type_of("val f = fn {id, ...} => id;").unwrap_err(),
        TypeError::UnguardedTypevar(_)
    ));
    assert_eq!(
        type_of("val f = fn ({id, ...} : {deptno: int, id: int, name: string}) => id;").unwrap(),
        "{deptno:int, id:int, name:string} -> int"
    );
}

#[test]
fn test_list_and_cons() {
    assert_eq!(type_of("val xs = [1, 2, 3];").unwrap(), "int list");
    assert_eq!(type_of("val xs = 1 :: 2 :: nil;").unwrap(), "int list");
    assert_eq!(type_of("val xs = [1] @ [2];").unwrap(), "int list");
    assert!(type_of("val xs = [1, \"a\"];").is_err());
}

#[test]
fn test_elem() {
    assert_eq!(type_of("val b = 1 elem [1, 2];").unwrap(), "bool");
    assert!(type_of("val b = \"a\" elem [1];").is_err());
}

#[test]
fn test_compose() {
    let mut session = TestSession::new();
    session.run("fun inc x = x + 1;").unwrap();
    session.run("fun show x = if x > 0 then \"p\" else \"n\";").unwrap();
    assert_eq!(session.type_of("val f = show o inc;").unwrap(), "int -> string");
}

#[test]
fn test_datatype_declaration() {
    let mut session = TestSession::new();
    let tstmt = session.run("datatype color = BLUE | GREEN | RED;").unwrap();
    let names: Vec<&str> = tstmt
        .bindings
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(names, ["BLUE", "GREEN", "RED"]);
    assert_eq!(session.type_of("val c = RED;").unwrap(), "color");
    assert_eq!(
        session
            .type_of("val f = fn RED => 1 | GREEN => 2 | BLUE => 3;")
            .unwrap(),
        "color -> int"
    );
}

#[test]
fn test_recursive_datatype() {
    let mut session = TestSession::new();
    session
        .run("datatype 'a tree = LEAF | NODE of 'a tree * 'a * 'a tree;")
        .unwrap();
    assert_eq!(
        session.type_of("val t = NODE (LEAF, 1, LEAF);").unwrap(),
        "int tree"
    );
    assert_eq!(
        session
            .type_of("fun depth t = case t of LEAF => 0 | NODE (l, _, r) => 1 + depth l;")
            .unwrap(),
        "'a tree -> int"
    );
}

#[test]
fn test_option_constructors() {
    assert_eq!(type_of("val x = SOME 3;").unwrap(), "int option");
    assert_eq!(type_of("val x = NONE;").unwrap(), "'a option");
    assert_eq!(
        type_of("val f = fn SOME x => x | NONE => 0;").unwrap(),
        "int option -> int"
    );
}

#[test]
fn test_constructor_arity() {
    assert!(matches!(
        type_of("val f = fn SOME => 1;").unwrap_err(),
        TypeError::ConstructorArityMismatch(_, _)
    ));
    assert!(matches!(
        type_of("val f = fn NONE x => 1;").unwrap_err(),
        TypeError::ConstructorArityMismatch(_, _)
    ));
}

#[test]
fn test_type_alias() {
    let mut session = TestSession::new();
    session.run("type point = {x: int, y: int};").unwrap();
    assert_eq!(
        session
            .type_of("val f = fn (p : point) => p.x + p.y;")
            .unwrap(),
        "{x:int, y:int} -> int"
    );
}

#[test]
fn test_typeof_annotation() {
    assert_eq!(type_of("val xs = (nil : typeof [1]);").unwrap(), "int list");
}

#[test]
fn test_annotation_mismatch() {
    assert!(type_of("val x = (1 : string);").is_err());
}

#[test]
fn test_val_rec_requires_fn() {
    assert!(matches!(
        type_of("val rec x = 1;").unwrap_err(),
        TypeError::IllegalRecBinding(_)
    ));
}

#[test]
fn test_mutual_recursion() {
    let mut session = TestSession::new();
    let tstmt = session
        .run("fun even n = if n = 0 then true else odd (n - 1) and odd n = if n = 0 then false else even (n - 1);")
        .unwrap();
    assert_eq!(tstmt.bindings.len(), 2);
    assert_eq!(session.type_of("val e = even 4;").unwrap(), "bool");
}

#[test]
fn test_query_pipeline_type() {
    assert_eq!(
        type_of("val q = from e in emps where e.deptno = 10 yield e.id;").unwrap(),
        "int list"
    );
}

#[test]
fn test_query_over_bag_is_bag() {
    assert_eq!(
        type_of("val q = from e in empsBag yield e.id;").unwrap(),
        "int bag"
    );
}

#[test]
fn test_order_promotes_to_list() {
    assert_eq!(
        type_of("val q = from e in empsBag order e.id yield e.id;").unwrap(),
        "int list"
    );
}

#[test]
fn test_unorder_demotes_to_bag() {
    assert_eq!(
        type_of("val q = from e in emps unorder;").unwrap(),
        "{deptno:int, id:int, name:string} bag"
    );
}

#[test]
fn test_multi_scan_row_is_record() {
    let mut session = TestSession::new();
    session
        .run("val depts = [{deptno = 10, dname = \"SALES\"}];")
        .unwrap();
    assert_eq!(
        session
            .type_of("val q = from e in emps, d in depts where e.deptno = d.deptno;")
            .unwrap(),
        "{d:{deptno:int, dname:string}, e:{deptno:int, id:int, name:string}} list"
    );
}

#[test]
fn test_group_compute() {
    assert_eq!(
        type_of("val g = from e in emps group e.deptno compute count over e;").unwrap(),
        "{count:int, deptno:int} bag"
    );
}

#[test]
fn test_into_yields_scalar() {
    assert_eq!(type_of("val n = from e in emps into length;").unwrap(), "int");
}

#[test]
fn test_compute_step_yields_scalar() {
    assert_eq!(
        type_of("val n = from e in emps compute count over e;").unwrap(),
        "int"
    );
}

#[test]
fn test_exists_and_forall_are_bool() {
    assert_eq!(
        type_of("val b = exists e in emps where e.deptno = 10;").unwrap(),
        "bool"
    );
    assert_eq!(
        type_of("val b = forall e in emps require e.id > 0;").unwrap(),
        "bool"
    );
}

#[test]
fn test_where_requires_bool() {
    assert!(type_of("val q = from e in emps where e.deptno;").is_err());
}

#[test]
fn test_take_requires_int() {
    assert!(type_of("val q = from e in emps take \"three\";").is_err());
}

#[test]
fn test_overload_resolution() {
    let mut session = TestSession::new();
    session.run("over describe;").unwrap();
    session
        .run("val inst describe = fn (x : int) => \"int\";")
        .unwrap();
    session
        .run("val inst describe = fn (s : string) => s;")
        .unwrap();
    assert_eq!(session.type_of("val d = describe 3;").unwrap(), "string");
    assert_eq!(
        session.type_of("val d = describe \"hi\";").unwrap(),
        "string"
    );
}

#[test]
fn test_overload_no_matching_instance() {
    let mut session = TestSession::new();
    session.run("over describe;").unwrap();
    session
        .run("val inst describe = fn (x : int) => \"int\";")
        .unwrap();
    assert!(matches!(
        session.type_of("val d = describe 1.5;").unwrap_err(),
        TypeError::NoMatchingInstance { .. }
    ));
}

#[test]
fn test_inst_of_undeclared_name() {
    let mut session = TestSession::new();
    assert!(matches!(
        session.run("val inst describe = fn (x : int) => x;").unwrap_err(),
        TypeError::NotOverloaded(_, _)
    ));
}

#[test]
fn test_aggregate_outside_query_is_rejected() {
    assert!(matches!(
        type_of("val s = sum over [1, 2, 3];").unwrap_err(),
        TypeError::MisplacedStep(_, _)
    ));
}

#[test]
fn test_tuple_pattern_binding() {
    let mut session = TestSession::new();
    let tstmt = session.run("val (a, b) = (1, \"x\");").unwrap();
    assert_eq!(tstmt.bindings.len(), 2);
    assert_eq!(session.type_of("val c = a;").unwrap(), "int");
    assert_eq!(session.type_of("val c = b;").unwrap(), "string");
}

#[test]
fn test_as_pattern() {
    assert_eq!(
        type_of("val f = fn whole as (a, b) => whole;").unwrap(),
        "'a * 'b -> 'a * 'b"
    );
}

#[test]
fn test_shadowing() {
    let mut session = TestSession::new();
    session.run("val x = 1;").unwrap();
    session.run("val x = \"now a string\";").unwrap();
    assert_eq!(session.type_of("val y = x;").unwrap(), "string");
}
