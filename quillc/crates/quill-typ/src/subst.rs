//! Substitutions: finite maps from type variables to types.
//!
//! A substitution produced by unification is acyclic (the occurs check
//! guarantees it), so [`Substitution::resolve`] can chase bindings to a
//! fixed point: the result of resolving contains no variable that the
//! substitution binds. That makes resolution idempotent,
//! `resolve(resolve(t)) = resolve(t)`, which the type resolver relies on
//! when it rewrites inferred types after solving.

use crate::{TyVar, TypeId, TypeKind, TypeRegistry};
use quill_util::LabelMap;
use rustc_hash::FxHashMap;

/// A mapping from type variables to types
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    map: FxHashMap<TyVar, TypeId>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable. The caller is responsible for the occurs check;
    /// the unifier never binds a variable to a type containing it.
    pub fn bind(&mut self, var: TyVar, ty: TypeId) {
        self.map.insert(var, ty);
    }

    pub fn get(&self, var: TyVar) -> Option<TypeId> {
        self.map.get(&var).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TyVar, TypeId)> + '_ {
        self.map.iter().map(|(v, t)| (*v, *t))
    }

    /// Apply the substitution to a fixed point
    ///
    /// Every bound variable inside `ty` is replaced, recursively, until
    /// none remain. Terminates because bindings are acyclic.
    pub fn resolve(&self, registry: &mut TypeRegistry, ty: TypeId) -> TypeId {
        match registry.kind(ty).clone() {
            TypeKind::Primitive(_) => ty,
            TypeKind::Var(v) => match self.get(v) {
                Some(bound) => self.resolve(registry, bound),
                None => ty,
            },
            TypeKind::Fn(param, result) => {
                let param = self.resolve(registry, param);
                let result = self.resolve(registry, result);
                registry.fn_type(param, result)
            }
            TypeKind::Tuple(parts) => {
                let parts = parts
                    .into_iter()
                    .map(|p| self.resolve(registry, p))
                    .collect();
                registry.tuple_type(parts)
            }
            TypeKind::Record(fields) => {
                let resolved: LabelMap<TypeId> = fields
                    .into_iter()
                    .map(|(label, t)| (label, self.resolve(registry, t)))
                    .collect();
                registry.record_type(resolved)
            }
            TypeKind::List(t) => {
                let t = self.resolve(registry, t);
                registry.list_type(t)
            }
            TypeKind::Bag(t) => {
                let t = self.resolve(registry, t);
                registry.bag_type(t)
            }
            TypeKind::Vector(t) => {
                let t = self.resolve(registry, t);
                registry.vector_type(t)
            }
            TypeKind::Data { name, args } => {
                let args = args
                    .into_iter()
                    .map(|a| self.resolve(registry, a))
                    .collect();
                registry.data_type(name, args)
            }
        }
    }

    /// Compose with another substitution: `self.compose(other)` behaves
    /// like applying `other` first, then `self`
    pub fn compose(&self, registry: &mut TypeRegistry, other: &Substitution) -> Substitution {
        let mut out = Substitution::new();
        for (var, ty) in other.iter() {
            let resolved = self.resolve(registry, ty);
            out.bind(var, resolved);
        }
        for (var, ty) in self.iter() {
            if out.get(var).is_none() {
                out.bind(var, ty);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeRegistry;

    #[test]
    fn test_resolve_unbound_is_identity() {
        let mut reg = TypeRegistry::new();
        let a = reg.fresh_var_type();
        let subst = Substitution::new();
        assert_eq!(subst.resolve(&mut reg, a), a);
    }

    #[test]
    fn test_resolve_direct_binding() {
        let mut reg = TypeRegistry::new();
        let a = reg.fresh_tyvar();
        let ta = reg.var_type(a);
        let mut subst = Substitution::new();
        subst.bind(a, reg.int_type());
        assert_eq!(subst.resolve(&mut reg, ta), reg.int_type());
    }

    #[test]
    fn test_resolve_chases_chains() {
        let mut reg = TypeRegistry::new();
        let a = reg.fresh_tyvar();
        let b = reg.fresh_tyvar();
        let ta = reg.var_type(a);
        let tb = reg.var_type(b);
        let mut subst = Substitution::new();
        subst.bind(a, tb);
        subst.bind(b, reg.int_type());
        assert_eq!(subst.resolve(&mut reg, ta), reg.int_type());
    }

    #[test]
    fn test_resolve_inside_structures() {
        let mut reg = TypeRegistry::new();
        let a = reg.fresh_tyvar();
        let ta = reg.var_type(a);
        let f = reg.fn_type(ta, ta);
        let mut subst = Substitution::new();
        subst.bind(a, reg.bool_type());
        let resolved = subst.resolve(&mut reg, f);
        let expected = reg.fn_type(reg.bool_type(), reg.bool_type());
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut reg = TypeRegistry::new();
        let a = reg.fresh_tyvar();
        let b = reg.fresh_tyvar();
        let ta = reg.var_type(a);
        let tb = reg.var_type(b);
        let pair = reg.tuple_type(vec![ta, tb]);
        let mut subst = Substitution::new();
        let int_list = reg.list_type(reg.int_type());
        subst.bind(a, tb);
        subst.bind(b, int_list);
        let once = subst.resolve(&mut reg, pair);
        let twice = subst.resolve(&mut reg, once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_compose_order() {
        let mut reg = TypeRegistry::new();
        let a = reg.fresh_tyvar();
        let b = reg.fresh_tyvar();
        let tb = reg.var_type(b);
        // other: a -> b, self: b -> int. Composition sends a to int.
        let mut other = Substitution::new();
        other.bind(a, tb);
        let mut this = Substitution::new();
        this.bind(b, reg.int_type());
        let composed = this.compose(&mut reg, &other);
        let ta = reg.var_type(a);
        assert_eq!(composed.resolve(&mut reg, ta), reg.int_type());
    }
}
