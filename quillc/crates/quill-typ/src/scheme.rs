//! Type schemes (polytypes).
//!
//! A [`Scheme`] wraps a type with the set of type variables quantified
//! over it. The environment stores schemes; expressions carry monotypes.
//! Generalization at a `let` binding quantifies the variables free in
//! the bound type but not free in the surrounding environment, and
//! instantiation replaces every quantified variable with a fresh one so
//! each use site unifies independently - that is what makes
//! `val id = fn x => x` usable at `int` and `string` in one expression.

use crate::{Substitution, TyVar, TypeId, TypeRegistry};

/// A polytype: universally quantified variables over a body
#[derive(Debug, Clone, PartialEq)]
pub struct Scheme {
    /// Quantified variables, in order of appearance in the body
    pub vars: Vec<TyVar>,
    pub body: TypeId,
}

impl Scheme {
    /// A monotype scheme quantifying nothing
    pub fn mono(body: TypeId) -> Self {
        Self {
            vars: Vec::new(),
            body,
        }
    }

    /// Quantify all free variables of `ty` not in `env_free`
    pub fn generalize(registry: &TypeRegistry, ty: TypeId, env_free: &[TyVar]) -> Self {
        let vars = registry
            .free_vars(ty)
            .into_iter()
            .filter(|v| !env_free.contains(v))
            .collect();
        Self { vars, body: ty }
    }

    /// Replace every quantified variable with a fresh one
    pub fn instantiate(&self, registry: &mut TypeRegistry) -> TypeId {
        if self.vars.is_empty() {
            return self.body;
        }
        let mut subst = Substitution::new();
        for var in &self.vars {
            let fresh = registry.fresh_var_type();
            subst.bind(*var, fresh);
        }
        subst.resolve(registry, self.body)
    }

    pub fn is_mono(&self) -> bool {
        self.vars.is_empty()
    }
}
