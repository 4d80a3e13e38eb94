use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use rmo_core::Interned;

use crate::module::ModuleRef;
use crate::value::Value;

pub type ObjectRef = Arc<RubyObject>;

/// Represents a plain (non-module) object.
pub struct RubyObject {
    /// The class of which this is an instance from.
    pub(crate) class: ModuleRef,
    /// The singleton class, created on first request.
    pub(crate) singleton: OnceLock<ModuleRef>,
    /// This object's instance variables.
    pub(crate) ivars: DashMap<Interned, Value>,
    id: u64,
}

impl RubyObject {
    pub(crate) fn new(class: ModuleRef, id: u64) -> Self {
        Self {
            class,
            singleton: OnceLock::new(),
            ivars: DashMap::new(),
            id,
        }
    }

    /// Get the class of which this is an instance from.
    pub fn class(&self) -> ModuleRef {
        self.class.clone()
    }

    /// Get the singleton class, if it was already created.
    pub fn singleton_class(&self) -> Option<&ModuleRef> {
        self.singleton.get()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Search for an instance variable.
    pub fn instance_variable_get(&self, name: Interned) -> Option<Value> {
        self.ivars.get(&name).map(|entry| entry.value().clone())
    }

    /// Assign a value to an instance variable.
    pub fn instance_variable_set(&self, name: Interned, value: Value) {
        self.ivars.insert(name, value);
    }

    pub fn instance_variable_defined(&self, name: Interned) -> bool {
        self.ivars.contains_key(&name)
    }
}

impl fmt::Debug for RubyObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RubyObject")
            .field("class", &self.class.to_string())
            .field("id", &self.id)
            .finish()
    }
}
