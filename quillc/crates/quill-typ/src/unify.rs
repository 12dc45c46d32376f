//! Unification: Martelli-Montanari over interned types.
//!
//! Given a list of term pairs, [`unify`] returns either a substitution
//! under which every pair resolves to the same handle, or the failure
//! that rules it out. The six rules play out on a worklist:
//!
//! - **delete**: identical handles are dropped;
//! - **decompose**: equal constructors push their component pairs;
//! - **conflict**: different constructors fail with [`UnifyError::Conflict`];
//! - **swap**: `t = 'a` flips so the variable is on the left;
//! - **eliminate**: `'a = t` binds `'a` after the occurs check;
//! - **occurs check**: `'a = t` with `'a` inside `t` fails with
//!   [`UnifyError::Cycle`]. The check walks `t` through the current
//!   bindings with a DFS active set, so indirect cycles
//!   (`'a = 'b list`, `'b = 'a list`) are caught too.
//!
//! The occurs check is mandatory: the language admits recursion only
//! through explicit `rec`, never through an infinite type.

use crate::{Substitution, TyVar, TypeId, TypeKind, TypeRegistry};
use thiserror::Error;

/// Why a set of pairs does not unify
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnifyError {
    #[error("cannot unify {left} with {right}")]
    Conflict { left: String, right: String },
    #[error("cyclic type: '{var}' occurs in {ty}")]
    Cycle { var: String, ty: String },
}

/// Unify all pairs, returning the solving substitution
pub fn unify(
    registry: &mut TypeRegistry,
    pairs: Vec<(TypeId, TypeId)>,
) -> Result<Substitution, UnifyError> {
    let mut subst = Substitution::new();
    let mut worklist = pairs;
    while let Some((left, right)) = worklist.pop() {
        let left = shallow_resolve(registry, &subst, left);
        let right = shallow_resolve(registry, &subst, right);
        if left == right {
            continue; // delete
        }
        match (registry.kind(left).clone(), registry.kind(right).clone()) {
            (TypeKind::Var(v), _) => {
                if occurs_through(registry, &subst, v, right) {
                    return Err(UnifyError::Cycle {
                        var: registry.display(left),
                        ty: registry.display(right),
                    });
                }
                subst.bind(v, right); // eliminate
            }
            (_, TypeKind::Var(_)) => {
                worklist.push((right, left)); // swap
            }
            (TypeKind::Fn(p1, r1), TypeKind::Fn(p2, r2)) => {
                worklist.push((p1, p2));
                worklist.push((r1, r2));
            }
            (TypeKind::Tuple(a), TypeKind::Tuple(b)) if a.len() == b.len() => {
                worklist.extend(a.into_iter().zip(b));
            }
            (TypeKind::Record(a), TypeKind::Record(b)) if same_labels(&a, &b) => {
                for ((_, t1), (_, t2)) in a.iter().zip(b.iter()) {
                    worklist.push((*t1, *t2));
                }
            }
            (TypeKind::List(a), TypeKind::List(b))
            | (TypeKind::Bag(a), TypeKind::Bag(b))
            | (TypeKind::Vector(a), TypeKind::Vector(b)) => {
                worklist.push((a, b));
            }
            (
                TypeKind::Data { name: n1, args: a1 },
                TypeKind::Data { name: n2, args: a2 },
            ) if n1 == n2 && a1.len() == a2.len() => {
                worklist.extend(a1.into_iter().zip(a2));
            }
            _ => {
                return Err(UnifyError::Conflict {
                    left: registry.display(left),
                    right: registry.display(right),
                });
            }
        }
    }
    Ok(subst)
}

/// Chase variable bindings at the top level only
fn shallow_resolve(registry: &TypeRegistry, subst: &Substitution, ty: TypeId) -> TypeId {
    let mut current = ty;
    loop {
        match registry.kind(current) {
            TypeKind::Var(v) => match subst.get(*v) {
                Some(bound) => current = bound,
                None => return current,
            },
            _ => return current,
        }
    }
}

/// Occurs check through the current substitution, DFS with an active set
fn occurs_through(
    registry: &TypeRegistry,
    subst: &Substitution,
    var: TyVar,
    ty: TypeId,
) -> bool {
    fn walk(
        registry: &TypeRegistry,
        subst: &Substitution,
        var: TyVar,
        ty: TypeId,
        active: &mut Vec<TyVar>,
    ) -> bool {
        match registry.kind(ty) {
            TypeKind::Primitive(_) => false,
            TypeKind::Var(v) => {
                if *v == var {
                    return true;
                }
                if active.contains(v) {
                    // Already being expanded higher in this DFS.
                    return false;
                }
                match subst.get(*v) {
                    Some(bound) => {
                        active.push(*v);
                        let hit = walk(registry, subst, var, bound, active);
                        active.pop();
                        hit
                    }
                    None => false,
                }
            }
            TypeKind::Fn(param, result) => {
                walk(registry, subst, var, *param, active)
                    || walk(registry, subst, var, *result, active)
            }
            TypeKind::Tuple(parts) => parts
                .iter()
                .any(|p| walk(registry, subst, var, *p, active)),
            TypeKind::Record(fields) => fields
                .values()
                .any(|t| walk(registry, subst, var, *t, active)),
            TypeKind::List(t) | TypeKind::Bag(t) | TypeKind::Vector(t) => {
                walk(registry, subst, var, *t, active)
            }
            TypeKind::Data { args, .. } => args
                .iter()
                .any(|a| walk(registry, subst, var, *a, active)),
        }
    }
    let mut active = Vec::new();
    walk(registry, subst, var, ty, &mut active)
}

fn same_labels(a: &quill_util::LabelMap<TypeId>, b: &quill_util::LabelMap<TypeId>) -> bool {
    a.len() == b.len() && a.labels().zip(b.labels()).all(|(x, y)| x == y)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A small generator of random types over two variables
    fn arb_type() -> impl Strategy<Value = fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId> {
        prop_oneof![
            Just((|reg, _, _| reg.int_type()) as fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId),
            Just((|reg, _, _| reg.bool_type()) as fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId),
            Just((|_, a, _| a) as fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId),
            Just((|_, _, b| b) as fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId),
            Just((|reg, a, _| reg.list_type(a)) as fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId),
            Just(
                (|reg, a, b| reg.fn_type(a, b)) as fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId
            ),
            Just(
                (|reg, a, b| reg.tuple_type(vec![a, b]))
                    as fn(&mut TypeRegistry, TypeId, TypeId) -> TypeId
            ),
        ]
    }

    proptest! {
        /// Soundness: whenever unify succeeds, resolving both sides
        /// yields the same handle.
        #[test]
        fn prop_unify_soundness(make1 in arb_type(), make2 in arb_type()) {
            let mut reg = TypeRegistry::new();
            let a = reg.fresh_var_type();
            let b = reg.fresh_var_type();
            let t1 = make1(&mut reg, a, b);
            let t2 = make2(&mut reg, a, b);
            if let Ok(subst) = unify(&mut reg, vec![(t1, t2)]) {
                prop_assert_eq!(
                    subst.resolve(&mut reg, t1),
                    subst.resolve(&mut reg, t2)
                );
            }
        }

        /// Idempotence of resolution under a unifier-produced
        /// substitution.
        #[test]
        fn prop_resolution_idempotent(make1 in arb_type(), make2 in arb_type()) {
            let mut reg = TypeRegistry::new();
            let a = reg.fresh_var_type();
            let b = reg.fresh_var_type();
            let t1 = make1(&mut reg, a, b);
            let t2 = make2(&mut reg, a, b);
            if let Ok(subst) = unify(&mut reg, vec![(t1, t2)]) {
                let once = subst.resolve(&mut reg, t1);
                let twice = subst.resolve(&mut reg, once);
                prop_assert_eq!(once, twice);
            }
        }
    }
}
