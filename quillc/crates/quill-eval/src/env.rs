//! The persistent runtime environment.
//!
//! A layered immutable dictionary: each extension allocates a new layer
//! pointing at its parent, so nested scopes and closure capture are a
//! couple of `Rc` bumps. Rebinding a name simply shadows it; lookup
//! walks outward and finds the most recent layer.
//!
//! Long REPL sessions would otherwise build unboundedly deep chains -
//! one layer per statement - so an extension that would push the chain
//! past a threshold first collapses the whole chain into one flat
//! layer. Old layers remain valid for any closure still holding them;
//! flattening creates new structure and never mutates.

use crate::value::Value;
use quill_typ::Scheme;
use quill_util::Symbol;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Depth at which an extension flattens the chain first
const FLATTEN_DEPTH: usize = 64;

/// One name's runtime information
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: Symbol,
    pub scheme: Scheme,
    pub value: Value,
}

#[derive(Debug)]
struct EnvNode {
    parent: Option<Env>,
    bindings: FxHashMap<Symbol, Binding>,
    depth: usize,
}

/// The environment handle; cloning is cheap and shares structure
#[derive(Debug, Clone)]
pub struct Env(Rc<EnvNode>);

impl Env {
    pub fn empty() -> Self {
        Env(Rc::new(EnvNode {
            parent: None,
            bindings: FxHashMap::default(),
            depth: 0,
        }))
    }

    /// Extend with a batch of bindings, creating one new layer
    pub fn extend(&self, bindings: Vec<Binding>) -> Env {
        let base = if self.0.depth >= FLATTEN_DEPTH {
            self.flatten()
        } else {
            self.clone()
        };
        let mut map = FxHashMap::default();
        for binding in bindings {
            map.insert(binding.name, binding);
        }
        let depth = base.0.depth + 1;
        Env(Rc::new(EnvNode {
            parent: Some(base),
            bindings: map,
            depth,
        }))
    }

    /// Extend with one binding
    pub fn bind(&self, name: Symbol, scheme: Scheme, value: Value) -> Env {
        self.extend(vec![Binding {
            name,
            scheme,
            value,
        }])
    }

    /// Walk outward to the most recent binding of `name`
    pub fn lookup(&self, name: Symbol) -> Option<&Binding> {
        let mut current = self;
        loop {
            if let Some(binding) = current.0.bindings.get(&name) {
                return Some(binding);
            }
            match &current.0.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    pub fn lookup_value(&self, name: Symbol) -> Option<Value> {
        self.lookup(name).map(|b| b.value.clone())
    }

    /// Chain depth (number of layers)
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    /// Collapse the chain into a single flat layer
    pub fn flatten(&self) -> Env {
        let mut flat: FxHashMap<Symbol, Binding> = FxHashMap::default();
        let mut layers = Vec::new();
        let mut current = Some(self.clone());
        while let Some(env) = current {
            layers.push(env.clone());
            current = env.0.parent.clone();
        }
        // Outermost first so inner layers overwrite.
        for layer in layers.iter().rev() {
            for (name, binding) in &layer.0.bindings {
                flat.insert(*name, binding.clone());
            }
        }
        Env(Rc::new(EnvNode {
            parent: None,
            bindings: flat,
            depth: 0,
        }))
    }

    /// All visible bindings, innermost definition winning
    pub fn visible_bindings(&self) -> Vec<&Binding> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        let mut current = self;
        loop {
            for binding in current.0.bindings.values() {
                if !seen.contains(&binding.name) {
                    seen.push(binding.name);
                    out.push(binding);
                }
            }
            match &current.0.parent {
                Some(parent) => current = parent,
                None => return out,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_typ::TypeRegistry;

    fn mono_unit(registry: &TypeRegistry) -> Scheme {
        Scheme::mono(registry.unit_type())
    }

    #[test]
    fn test_bind_and_lookup() {
        let registry = TypeRegistry::new();
        let env = Env::empty();
        let env = env.bind(Symbol::intern("x"), mono_unit(&registry), Value::Int(1));
        assert!(matches!(
            env.lookup_value(Symbol::intern("x")),
            Some(Value::Int(1))
        ));
        assert!(env.lookup(Symbol::intern("y")).is_none());
    }

    #[test]
    fn test_shadowing_finds_most_recent() {
        let registry = TypeRegistry::new();
        let env = Env::empty()
            .bind(Symbol::intern("x"), mono_unit(&registry), Value::Int(1))
            .bind(Symbol::intern("x"), mono_unit(&registry), Value::Int(2));
        assert!(matches!(
            env.lookup_value(Symbol::intern("x")),
            Some(Value::Int(2))
        ));
    }

    #[test]
    fn test_old_layers_stay_valid() {
        let registry = TypeRegistry::new();
        let outer = Env::empty().bind(Symbol::intern("x"), mono_unit(&registry), Value::Int(1));
        let inner = outer.bind(Symbol::intern("x"), mono_unit(&registry), Value::Int(2));
        // The outer handle still sees the old binding.
        assert!(matches!(
            outer.lookup_value(Symbol::intern("x")),
            Some(Value::Int(1))
        ));
        assert!(matches!(
            inner.lookup_value(Symbol::intern("x")),
            Some(Value::Int(2))
        ));
    }

    #[test]
    fn test_depth_grows_by_one_per_layer() {
        let registry = TypeRegistry::new();
        let env = Env::empty();
        let env1 = env.bind(Symbol::intern("a"), mono_unit(&registry), Value::Int(1));
        let env2 = env1.bind(Symbol::intern("b"), mono_unit(&registry), Value::Int(2));
        assert_eq!(env1.depth(), 1);
        assert_eq!(env2.depth(), 2);
    }

    #[test]
    fn test_flatten_preserves_visibility() {
        let registry = TypeRegistry::new();
        let mut env = Env::empty();
        for i in 0..10 {
            env = env.bind(
                Symbol::intern(&format!("x{}", i)),
                mono_unit(&registry),
                Value::Int(i),
            );
        }
        env = env.bind(Symbol::intern("x0"), mono_unit(&registry), Value::Int(99));
        let flat = env.flatten();
        assert_eq!(flat.depth(), 0);
        assert!(matches!(
            flat.lookup_value(Symbol::intern("x0")),
            Some(Value::Int(99))
        ));
        assert!(matches!(
            flat.lookup_value(Symbol::intern("x9")),
            Some(Value::Int(9))
        ));
    }

    #[test]
    fn test_deep_chain_flattens_automatically() {
        let registry = TypeRegistry::new();
        let mut env = Env::empty();
        for i in 0..(FLATTEN_DEPTH * 2) {
            env = env.bind(
                Symbol::intern(&format!("v{}", i)),
                mono_unit(&registry),
                Value::Int(i as i64),
            );
        }
        assert!(env.depth() <= FLATTEN_DEPTH + 1);
        assert!(matches!(
            env.lookup_value(Symbol::intern("v0")),
            Some(Value::Int(0))
        ));
    }

    #[test]
    fn test_visible_bindings_dedupes() {
        let registry = TypeRegistry::new();
        let env = Env::empty()
            .bind(Symbol::intern("x"), mono_unit(&registry), Value::Int(1))
            .bind(Symbol::intern("x"), mono_unit(&registry), Value::Int(2))
            .bind(Symbol::intern("y"), mono_unit(&registry), Value::Int(3));
        let visible = env.visible_bindings();
        assert_eq!(visible.len(), 2);
    }
}
