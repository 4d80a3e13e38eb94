//!
//! Class variables.
//!
//! A class variable lives in exactly one module of a hierarchy. Lookups check the module, then
//! the module a singleton class is attached to, then the ancestors. Assigning an existing
//! variable replaces it in place without locking; only a first definition takes the universe's
//! definition lock, so two threads defining the same variable concurrently create one binding.
//!

use std::sync::{Arc, PoisonError};

use indexmap::IndexMap;
use rmo_core::{identifiers, Interned};

use crate::error::{Result, RubyError};
use crate::module::{Module, ModuleRef};
use crate::universe::Universe;
use crate::value::Value;

/// Apply `action` along the class variable lookup path of `module` until it returns something.
fn class_variable_lookup<R>(
    module: &ModuleRef,
    mut action: impl FnMut(&Module) -> Option<R>,
) -> Option<R> {
    if let Some(result) = action(&**module) {
        return Some(result);
    }

    let mut start = module.clone();
    if module.is_singleton_class() {
        if let Some(Value::Module(attached)) = module.attached() {
            if let Some(result) = action(&*attached) {
                return Some(result);
            }
            start = attached;
        }
    }

    for ancestor in start.ancestors() {
        if Arc::ptr_eq(&ancestor, &start) {
            continue;
        }
        if let Some(result) = action(&*ancestor) {
            return Some(result);
        }
    }
    None
}

/// The value of class variable `name` as seen from `module`.
pub fn lookup_class_variable(module: &ModuleRef, name: Interned) -> Option<Value> {
    class_variable_lookup(module, |candidate| {
        candidate
            .class_variables
            .get(&name)
            .map(|entry| entry.value().clone())
    })
}

/// Replace an existing binding of `name` along the lookup path, returning whether one existed.
fn try_set_class_variable(module: &ModuleRef, name: Interned, value: &Value) -> bool {
    class_variable_lookup(module, |candidate| {
        candidate.class_variables.get_mut(&name).map(|mut entry| {
            *entry = value.clone();
        })
    })
    .is_some()
}

/// Every class variable visible from `module`, nearest binding first.
pub fn get_all_class_variables(module: &ModuleRef) -> IndexMap<Interned, Value> {
    let mut variables = IndexMap::new();
    class_variable_lookup(module, |candidate| {
        for (name, value) in candidate.own_class_variables() {
            variables.entry(name).or_insert(value);
        }
        None::<()>
    });
    variables
}

impl Universe {
    fn checked_class_variable_name(&self, module: &Module, name: &str) -> Result<Interned> {
        if !identifiers::is_valid_class_variable_name(name) {
            return Err(RubyError::name_error(
                format!(
                    "`{}' is not allowed as a class variable name (in {})",
                    name, module
                ),
                name,
            ));
        }
        Ok(self.intern(name))
    }

    /// Assign class variable `name` where it is already bound, or define it in `module`.
    pub fn set_class_variable(&self, module: &ModuleRef, name: Interned, value: Value) -> Result<()> {
        module.check_frozen()?;

        if try_set_class_variable(module, name, &value) {
            return Ok(());
        }

        let _guard = self
            .class_variable_definition_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !try_set_class_variable(module, name, &value) {
            // Every other definition goes through this lock, so the re-check above is final.
            module.class_variables.insert(name, value);
            tracing::debug!(
                module = %module,
                name = %self.lookup_symbol(name),
                "defined class variable"
            );
        }
        Ok(())
    }

    /// `Module#class_variable_get`.
    pub fn class_variable_get(&self, module: &ModuleRef, name: &str) -> Result<Value> {
        let interned = self.checked_class_variable_name(module, name)?;
        lookup_class_variable(module, interned)
            .ok_or_else(|| RubyError::uninitialized_class_variable(name, &module.to_string()))
    }

    /// `Module#class_variable_set`.
    pub fn class_variable_set(&self, module: &ModuleRef, name: &str, value: Value) -> Result<()> {
        let interned = self.checked_class_variable_name(module, name)?;
        self.set_class_variable(module, interned, value)
    }

    /// `Module#class_variable_defined?`.
    pub fn class_variable_defined(&self, module: &ModuleRef, name: &str) -> Result<bool> {
        let interned = self.checked_class_variable_name(module, name)?;
        Ok(lookup_class_variable(module, interned).is_some())
    }

    /// `Module#class_variables`: names along the lookup path.
    pub fn class_variables(&self, module: &ModuleRef) -> Vec<Interned> {
        get_all_class_variables(module).into_keys().collect()
    }

    /// `Module#remove_class_variable`: only bindings of `module` itself can be removed.
    pub fn remove_class_variable(&self, module: &ModuleRef, name: &str) -> Result<Value> {
        let interned = self.checked_class_variable_name(module, name)?;
        module.check_frozen()?;
        match module.class_variables.remove(&interned) {
            Some((_, value)) => {
                tracing::debug!(module = %module, name, "removed class variable");
                Ok(value)
            }
            None => Err(RubyError::class_variable_not_defined(
                name,
                &module.to_string(),
            )),
        }
    }
}
