//! Program analysis: declarations, groundness, safety, stratification.
//!
//! The checks, in order:
//!
//! 1. Every relation used anywhere (fact, rule atom, directive) is
//!    declared, with matching arity; fact constants match the declared
//!    column types.
//! 2. Rule safety: every head variable, and every variable inside a
//!    negated atom or a comparison, also occurs in a positive body
//!    atom - otherwise the rule's answer would be infinite.
//! 3. Stratification: the dependency graph's strongly connected
//!    components are computed (Tarjan); a negated edge inside a
//!    component means a relation depends negatively on itself and the
//!    program is rejected with `Program is not stratified`.
//!
//! The analysis result records, per relation, its declaration, its
//! facts and rules, and a bottom-up evaluation order of the strata.

use crate::ast::*;
use crate::DatalogError;
use quill_util::Symbol;
use rustc_hash::{FxHashMap, FxHashSet};

/// Everything translation needs to know about a checked program
#[derive(Debug)]
pub struct Analysis {
    pub decls: FxHashMap<Symbol, RelDecl>,
    pub facts: FxHashMap<Symbol, Vec<Fact>>,
    pub rules: FxHashMap<Symbol, Vec<Rule>>,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    /// Relations in bottom-up evaluation order
    pub order: Vec<Symbol>,
    /// Relations that appear in a cycle with themselves (directly or
    /// through other relations) and need fixpoint iteration
    pub recursive: FxHashSet<Symbol>,
}

/// Check a program
pub fn analyze(program: &Program) -> Result<Analysis, DatalogError> {
    let mut decls: FxHashMap<Symbol, RelDecl> = FxHashMap::default();
    for item in &program.items {
        if let Item::Decl(decl) = item {
            decls.insert(decl.name, decl.clone());
        }
    }

    let mut facts: FxHashMap<Symbol, Vec<Fact>> = FxHashMap::default();
    let mut rules: FxHashMap<Symbol, Vec<Rule>> = FxHashMap::default();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    let check_declared = |name: Symbol, arity: Option<usize>, pos| match decls.get(&name) {
        None => Err(DatalogError::UndeclaredRelation {
            relation: name,
            pos,
        }),
        Some(decl) => {
            if let Some(arity) = arity {
                if arity != decl.params.len() {
                    return Err(DatalogError::ArityMismatch {
                        relation: name,
                        expected: decl.params.len(),
                        actual: arity,
                        pos,
                    });
                }
            }
            Ok(())
        }
    };

    for item in &program.items {
        match item {
            Item::Decl(_) => {}
            Item::Fact(fact) => {
                check_declared(fact.relation, Some(fact.values.len()), fact.pos)?;
                let decl = &decls[&fact.relation];
                for (value, (param, expected)) in fact.values.iter().zip(&decl.params) {
                    if value.column_type() != *expected {
                        return Err(DatalogError::ColumnTypeMismatch {
                            relation: fact.relation,
                            param: *param,
                            expected: expected.name(),
                            actual: value.column_type().name(),
                            pos: fact.pos,
                        });
                    }
                }
                facts.entry(fact.relation).or_default().push(fact.clone());
            }
            Item::Rule(rule) => {
                check_declared(rule.head.relation, Some(rule.head.args.len()), rule.head.pos)?;
                for body_item in &rule.body {
                    match body_item {
                        BodyItem::Atom(atom) | BodyItem::Negated(atom) => {
                            check_declared(atom.relation, Some(atom.args.len()), atom.pos)?;
                        }
                        BodyItem::Compare { .. } => {}
                    }
                }
                check_safety(rule)?;
                rules.entry(rule.head.relation).or_default().push(rule.clone());
            }
            Item::Input(input) => {
                check_declared(input.relation, None, input.pos)?;
                inputs.push(input.clone());
            }
            Item::Output(output) => {
                check_declared(output.relation, None, output.pos)?;
                outputs.push(output.clone());
            }
        }
    }

    let (order, recursive) = stratify(&decls, &rules)?;
    Ok(Analysis {
        decls,
        facts,
        rules,
        inputs,
        outputs,
        order,
        recursive,
    })
}

/// Rule safety: head vars, negated vars and comparison vars must occur
/// in a positive body atom
fn check_safety(rule: &Rule) -> Result<(), DatalogError> {
    let mut positive: Vec<Symbol> = Vec::new();
    for body_item in &rule.body {
        if let BodyItem::Atom(atom) = body_item {
            for arg in &atom.args {
                arg.vars(&mut positive);
            }
        }
    }
    let mut check = |vars: &[Symbol], pos| {
        for var in vars {
            if !positive.contains(var) {
                return Err(DatalogError::UnsafeRule {
                    relation: rule.head.relation,
                    var: *var,
                    pos,
                });
            }
        }
        Ok(())
    };
    let mut head_vars = Vec::new();
    for arg in &rule.head.args {
        arg.vars(&mut head_vars);
    }
    check(&head_vars, rule.pos)?;
    for body_item in &rule.body {
        match body_item {
            BodyItem::Negated(atom) => {
                let mut vars = Vec::new();
                for arg in &atom.args {
                    arg.vars(&mut vars);
                }
                check(&vars, atom.pos)?;
            }
            BodyItem::Compare { lhs, rhs, pos, .. } => {
                let mut vars = Vec::new();
                lhs.vars(&mut vars);
                rhs.vars(&mut vars);
                check(&vars, *pos)?;
            }
            BodyItem::Atom(_) => {}
        }
    }
    Ok(())
}

/// Tarjan SCC over the dependency graph; rejects negated edges inside a
/// component and mutual recursion (a multi-relation component)
fn stratify(
    decls: &FxHashMap<Symbol, RelDecl>,
    rules: &FxHashMap<Symbol, Vec<Rule>>,
) -> Result<(Vec<Symbol>, FxHashSet<Symbol>), DatalogError> {
    // Edges: head depends on each body relation; negated edges flagged.
    let nodes: Vec<Symbol> = decls.keys().copied().collect();
    let mut edges: FxHashMap<Symbol, Vec<(Symbol, bool)>> = FxHashMap::default();
    for (head, head_rules) in rules {
        for rule in head_rules {
            for body_item in &rule.body {
                match body_item {
                    BodyItem::Atom(atom) => {
                        edges.entry(*head).or_default().push((atom.relation, false));
                    }
                    BodyItem::Negated(atom) => {
                        edges.entry(*head).or_default().push((atom.relation, true));
                    }
                    BodyItem::Compare { .. } => {}
                }
            }
        }
    }

    let sccs = tarjan(&nodes, &edges);
    let mut component_of: FxHashMap<Symbol, usize> = FxHashMap::default();
    for (index, component) in sccs.iter().enumerate() {
        for node in component {
            component_of.insert(*node, index);
        }
    }

    // A negated edge inside one component is non-stratified.
    for (head, targets) in &edges {
        for (target, negated) in targets {
            if *negated && component_of.get(head) == component_of.get(target) {
                return Err(DatalogError::NotStratified {
                    relation: *head,
                });
            }
        }
    }

    let mut recursive: FxHashSet<Symbol> = FxHashSet::default();
    for component in &sccs {
        if component.len() > 1 {
            // Mutual recursion across relations would need a tupled
            // fixpoint; it is rejected rather than mistranslated.
            return Err(DatalogError::MutualRecursion {
                relations: component.clone(),
            });
        }
        let node = component[0];
        let self_loop = edges
            .get(&node)
            .is_some_and(|targets| targets.iter().any(|(t, _)| *t == node));
        if self_loop {
            recursive.insert(node);
        }
    }

    // Tarjan emits components in reverse topological order of the
    // condensation, which here is dependencies-first: exactly the
    // bottom-up evaluation order.
    let order = sccs.into_iter().map(|component| component[0]).collect();
    Ok((order, recursive))
}

fn tarjan(
    nodes: &[Symbol],
    edges: &FxHashMap<Symbol, Vec<(Symbol, bool)>>,
) -> Vec<Vec<Symbol>> {
    struct State<'a> {
        edges: &'a FxHashMap<Symbol, Vec<(Symbol, bool)>>,
        index: usize,
        indices: FxHashMap<Symbol, usize>,
        lowlink: FxHashMap<Symbol, usize>,
        stack: Vec<Symbol>,
        on_stack: FxHashSet<Symbol>,
        components: Vec<Vec<Symbol>>,
    }

    fn strongconnect(state: &mut State, v: Symbol) {
        state.indices.insert(v, state.index);
        state.lowlink.insert(v, state.index);
        state.index += 1;
        state.stack.push(v);
        state.on_stack.insert(v);

        let targets: Vec<Symbol> = state
            .edges
            .get(&v)
            .map(|ts| ts.iter().map(|(t, _)| *t).collect())
            .unwrap_or_default();
        for w in targets {
            if !state.indices.contains_key(&w) {
                strongconnect(state, w);
                let low = state.lowlink[&v].min(state.lowlink[&w]);
                state.lowlink.insert(v, low);
            } else if state.on_stack.contains(&w) {
                let low = state.lowlink[&v].min(state.indices[&w]);
                state.lowlink.insert(v, low);
            }
        }

        if state.lowlink[&v] == state.indices[&v] {
            let mut component = Vec::new();
            loop {
                let w = state.stack.pop().expect("tarjan stack invariant");
                state.on_stack.remove(&w);
                component.push(w);
                if w == v {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let mut state = State {
        edges,
        index: 0,
        indices: FxHashMap::default(),
        lowlink: FxHashMap::default(),
        stack: Vec::new(),
        on_stack: FxHashSet::default(),
        components: Vec::new(),
    };
    for node in nodes {
        if !state.indices.contains_key(node) {
            strongconnect(&mut state, *node);
        }
    }
    state.components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use quill_util::FileId;

    fn analyzed(source: &str) -> Result<Analysis, DatalogError> {
        analyze(&parse_program(source, FileId::STDIN).unwrap())
    }

    const EDGES: &str = "edge(x: int, y: int).\nedge(1, 2).\nedge(2, 3).\n";

    #[test]
    fn test_simple_program() {
        let analysis = analyzed(EDGES).unwrap();
        assert_eq!(analysis.facts[&Symbol::intern("edge")].len(), 2);
        assert!(analysis.recursive.is_empty());
    }

    #[test]
    fn test_undeclared_relation_in_fact() {
        assert!(matches!(
            analyzed("edge(1, 2).").unwrap_err(),
            DatalogError::UndeclaredRelation { .. }
        ));
    }

    #[test]
    fn test_undeclared_relation_in_rule_body() {
        let source = "path(x: int, y: int).\npath(X, Y) :- edge(X, Y).";
        assert!(matches!(
            analyzed(source).unwrap_err(),
            DatalogError::UndeclaredRelation { .. }
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        assert!(matches!(
            analyzed("edge(x: int, y: int).\nedge(1).").unwrap_err(),
            DatalogError::ArityMismatch { .. }
        ));
    }

    #[test]
    fn test_column_type_mismatch() {
        assert!(matches!(
            analyzed("edge(x: int, y: int).\nedge(1, \"two\").").unwrap_err(),
            DatalogError::ColumnTypeMismatch { .. }
        ));
    }

    #[test]
    fn test_unsafe_head_variable() {
        let source = "p(x: int).\nq(x: int).\np(X) :- q(Y).";
        assert!(matches!(
            analyzed(source).unwrap_err(),
            DatalogError::UnsafeRule { .. }
        ));
    }

    #[test]
    fn test_unsafe_negated_variable() {
        let source = "p(x: int).\nq(x: int).\np(X) :- q(X), !q(Z).";
        assert!(matches!(
            analyzed(source).unwrap_err(),
            DatalogError::UnsafeRule { .. }
        ));
    }

    #[test]
    fn test_unsafe_comparison_variable() {
        let source = "p(x: int).\nq(x: int).\np(X) :- q(X), Z < 3.";
        assert!(matches!(
            analyzed(source).unwrap_err(),
            DatalogError::UnsafeRule { .. }
        ));
    }

    #[test]
    fn test_recursion_detected() {
        let source = "edge(x: int, y: int).\npath(x: int, y: int).\n\
                      path(X, Y) :- edge(X, Y).\n\
                      path(X, Z) :- path(X, Y), edge(Y, Z).";
        let analysis = analyzed(source).unwrap();
        assert!(analysis.recursive.contains(&Symbol::intern("path")));
        // edge is evaluated before path.
        let edge_pos = analysis
            .order
            .iter()
            .position(|s| s.eq_str("edge"))
            .unwrap();
        let path_pos = analysis
            .order
            .iter()
            .position(|s| s.eq_str("path"))
            .unwrap();
        assert!(edge_pos < path_pos);
    }

    #[test]
    fn test_negation_between_strata_is_fine() {
        let source = "node(x: int).\nblocked(x: int).\nok(x: int).\n\
                      ok(X) :- node(X), !blocked(X).";
        assert!(analyzed(source).is_ok());
    }

    #[test]
    fn test_non_stratified_rejection() {
        // p and q mutually recursive through a negation.
        let source = "p(x: int).\nq(x: int).\nn(x: int).\n\
                      p(X) :- n(X), !q(X).\n\
                      q(X) :- n(X), !p(X).";
        assert!(matches!(
            analyzed(source).unwrap_err(),
            DatalogError::NotStratified { .. }
        ));
    }

    #[test]
    fn test_self_negation_rejected() {
        let source = "p(x: int).\nn(x: int).\np(X) :- n(X), !p(X).";
        assert!(matches!(
            analyzed(source).unwrap_err(),
            DatalogError::NotStratified { .. }
        ));
    }

    #[test]
    fn test_mutual_recursion_rejected() {
        let source = "a(x: int).\nb(x: int).\nn(x: int).\n\
                      a(X) :- b(X).\n\
                      b(X) :- a(X).\n\
                      a(X) :- n(X).";
        assert!(matches!(
            analyzed(source).unwrap_err(),
            DatalogError::MutualRecursion { .. }
        ));
    }
}
