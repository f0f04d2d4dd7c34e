//! Name environments for the FCP evaluator.
//!
//! An [`Environment`] is a shared handle to one scope. Scopes chain to a
//! parent that is consulted when a lookup misses, and may register named
//! delegatees so that `prefix:name` resolves `name` inside the environment
//! registered as `prefix`. Closures hold a handle to the scope they were
//! defined in; call scopes are children that are dropped on return.

use crate::error::{EvalError, EvalResult};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[derive(Default)]
struct Scope {
    bindings: BTreeMap<String, Value>,
    parent: Option<Environment>,
    delegatees: BTreeMap<String, Environment>,
}

#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Scope>>);

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh scope whose lookups fall back to `self`.
    pub fn child(&self) -> Environment {
        Environment(Rc::new(RefCell::new(Scope {
            parent: Some(self.clone()),
            ..Scope::default()
        })))
    }

    /// Bind `name` in this scope. Rebinding a name in the same scope is a
    /// name error; shadowing a parent's binding is allowed.
    pub fn define(&self, name: &str, value: Value) -> EvalResult<()> {
        let mut scope = self.0.borrow_mut();
        if scope.bindings.contains_key(name) {
            return Err(EvalError::name(format!("'{name}' is already defined")));
        }
        scope.bindings.insert(name.to_string(), value);
        Ok(())
    }

    /// Bind or rebind `name` in this scope. Used by the simulation engine
    /// for range variables and results, never by protocol statements.
    pub fn overwrite(&self, name: &str, value: Value) {
        self.0.borrow_mut().bindings.insert(name.to_string(), value);
    }

    pub fn lookup(&self, name: &str) -> EvalResult<Value> {
        self.try_lookup(name)
            .ok_or_else(|| EvalError::name(format!("'{name}' is not defined")))
    }

    /// Walk this scope, its delegatees (for qualified names) and then the
    /// parent chain.
    pub fn try_lookup(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        if let Some(value) = scope.bindings.get(name) {
            return Some(value.clone());
        }
        if let Some((prefix, rest)) = name.split_once(':') {
            if let Some(found) = scope.delegatees.get(prefix).and_then(|d| d.try_lookup(rest)) {
                return Some(found);
            }
        }
        scope.parent.as_ref().and_then(|p| p.try_lookup(name))
    }

    pub fn is_defined_locally(&self, name: &str) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    /// Names bound in this scope, sorted.
    pub fn names(&self) -> Vec<String> {
        self.0.borrow().bindings.keys().cloned().collect()
    }

    /// `(name, value)` pairs bound in this scope, sorted by name.
    pub fn bindings(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().bindings.is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().bindings.clear();
    }

    /// Make `prefix:name` resolve in `env`.
    pub fn add_delegatee(&self, prefix: &str, env: Environment) -> EvalResult<()> {
        let mut scope = self.0.borrow_mut();
        if scope.delegatees.contains_key(prefix) {
            return Err(EvalError::name(format!(
                "prefix '{prefix}' is already in use"
            )));
        }
        scope.delegatees.insert(prefix.to_string(), env);
        Ok(())
    }

    /// Find the delegatee registered for `prefix` here or in a parent.
    pub fn delegatee(&self, prefix: &str) -> Option<Environment> {
        let scope = self.0.borrow();
        match scope.delegatees.get(prefix) {
            Some(env) => Some(env.clone()),
            None => scope.parent.as_ref().and_then(|p| p.delegatee(prefix)),
        }
    }

    /// Copy every binding of `other` into this scope, failing on the first
    /// collision.
    pub fn merge(&self, other: &Environment) -> EvalResult<()> {
        for (name, value) in other.bindings() {
            self.define(&name, value)?;
        }
        Ok(())
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Environment {
    // Only names: bound closures refer back to their environments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = self.0.borrow();
        f.debug_struct("Environment")
            .field("names", &scope.bindings.keys().collect::<Vec<_>>())
            .field("delegatees", &scope.delegatees.keys().collect::<Vec<_>>())
            .field("has_parent", &scope.parent.is_some())
            .finish()
    }
}
