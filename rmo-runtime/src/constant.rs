use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};

use indexmap::{IndexMap, IndexSet};
use rmo_core::{identifiers, Interned};

use crate::error::{Result, RubyError};
use crate::module::{Module, ModuleRef};
use crate::universe::Universe;
use crate::value::Value;

/// Where a constant was assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub line: u32,
}

/// The pending `autoload` of a constant.
///
/// Shared between the successive bindings of one constant so that the autoloading thread stays
/// recorded while the feature redefines other constants of the module.
pub struct AutoloadConstant {
    feature: Arc<str>,
    autoloading_thread: Mutex<Option<ThreadId>>,
}

impl AutoloadConstant {
    pub fn new(feature: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            feature: feature.into(),
            autoloading_thread: Mutex::new(None),
        })
    }

    /// The feature to require to define the constant.
    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Whether some thread is currently loading the feature.
    pub fn is_autoloading(&self) -> bool {
        self.thread().is_some()
    }

    /// Whether the current thread is the one loading the feature.
    pub fn is_autoloading_thread(&self) -> bool {
        self.thread() == Some(thread::current().id())
    }

    /// Mark the current thread as loading the feature until the guard is dropped.
    ///
    /// Returns `None` when another thread already is; its marker is left in place.
    pub fn try_start_autoloading(self: &Arc<Self>) -> Option<AutoloadGuard> {
        let mut marker = self
            .autoloading_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if marker.is_some() {
            return None;
        }
        *marker = Some(thread::current().id());
        Some(AutoloadGuard {
            constant: Arc::clone(self),
        })
    }

    fn thread(&self) -> Option<ThreadId> {
        *self
            .autoloading_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AutoloadConstant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AutoloadConstant")
            .field("feature", &self.feature)
            .field("autoloading_thread", &self.thread())
            .finish()
    }
}

/// Clears the autoloading marker when dropped.
#[must_use]
pub struct AutoloadGuard {
    constant: Arc<AutoloadConstant>,
}

impl Drop for AutoloadGuard {
    fn drop(&mut self) {
        *self
            .constant
            .autoloading_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// One constant binding.
///
/// A binding is immutable: visibility changes and reassignments replace it in its module's table.
#[derive(Clone)]
pub struct RubyConstant {
    declaring_module: Weak<Module>,
    name: Interned,
    value: Option<Value>,
    private: bool,
    deprecated: bool,
    autoload: Option<Arc<AutoloadConstant>>,
    source: Option<SourceLocation>,
}

impl RubyConstant {
    pub(crate) fn new(declaring_module: &ModuleRef, name: Interned, value: Value) -> Self {
        Self {
            declaring_module: Arc::downgrade(declaring_module),
            name,
            value: Some(value),
            private: false,
            deprecated: false,
            autoload: None,
            source: None,
        }
    }

    pub(crate) fn autoload(
        declaring_module: &ModuleRef,
        name: Interned,
        autoload: Arc<AutoloadConstant>,
    ) -> Self {
        Self {
            declaring_module: Arc::downgrade(declaring_module),
            name,
            value: None,
            private: false,
            deprecated: false,
            autoload: Some(autoload),
            source: None,
        }
    }

    pub(crate) fn with_value(&self, value: Value) -> Self {
        Self {
            value: Some(value),
            autoload: None,
            ..self.clone()
        }
    }

    pub(crate) fn with_private(&self, private: bool) -> Self {
        Self {
            private,
            ..self.clone()
        }
    }

    pub(crate) fn with_deprecated(&self) -> Self {
        Self {
            deprecated: true,
            ..self.clone()
        }
    }

    pub(crate) fn with_source(&self, source: Option<SourceLocation>) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    /// The placeholder left behind by an autoload that did not define its constant.
    pub(crate) fn undefined(&self) -> Self {
        Self {
            value: None,
            autoload: None,
            ..self.clone()
        }
    }

    pub fn name(&self) -> Interned {
        self.name
    }

    pub fn declaring_module(&self) -> Option<ModuleRef> {
        self.declaring_module.upgrade()
    }

    /// The bound value, or `None` for autoload and undefined constants.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn is_autoload(&self) -> bool {
        self.autoload.is_some()
    }

    pub fn autoload_constant(&self) -> Option<&Arc<AutoloadConstant>> {
        self.autoload.as_ref()
    }

    pub fn is_undefined(&self) -> bool {
        self.value.is_none() && self.autoload.is_none()
    }

    pub fn source_location(&self) -> Option<&SourceLocation> {
        self.source.as_ref()
    }

    /// Whether the binding counts as defined: not undefined, and not being autoloaded by the
    /// current thread.
    pub fn is_defined(&self) -> bool {
        match &self.autoload {
            Some(autoload) => !autoload.is_autoloading_thread(),
            None => self.value.is_some(),
        }
    }
}

impl fmt::Debug for RubyConstant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RubyConstant")
            .field("name", &self.name.0)
            .field("value", &self.value)
            .field("private", &self.private)
            .field("autoload", &self.autoload)
            .finish()
    }
}

impl Universe {
    /// The name of constant `name` of `module`, as shown in messages.
    pub fn constant_name(&self, module: &Module, name: &str) -> String {
        if std::ptr::eq(module, Arc::as_ptr(&self.core.object_class)) {
            name.to_string()
        } else {
            format!("{}::{}", module, name)
        }
    }

    fn checked_constant_name(&self, name: &str) -> Result<Interned> {
        if !identifiers::is_valid_constant_name(name) {
            return Err(RubyError::wrong_constant_name(name));
        }
        Ok(self.intern(name))
    }

    /// Assign a constant (`Module#const_set`); an anonymous module assigned this way gets named.
    pub fn const_set(&self, module: &ModuleRef, name: &str, value: Value) -> Result<()> {
        let interned = self.checked_constant_name(name)?;
        self.set_constant(module, interned, value, None)?;
        Ok(())
    }

    /// Assign a constant, recording where the assignment happened.
    pub fn set_constant(
        &self,
        module: &ModuleRef,
        name: Interned,
        value: Value,
        source: Option<SourceLocation>,
    ) -> Result<Arc<RubyConstant>> {
        module.check_frozen()?;

        let (previous, constant) = module.update_constants(|table| {
            let previous = table.get(&name).cloned();
            let constant = match &previous {
                Some(previous) => previous.with_value(value.clone()),
                None => RubyConstant::new(module, name, value.clone()),
            };
            let constant = Arc::new(constant.with_source(source));
            table.insert(name, Arc::clone(&constant));
            (previous, constant)
        });

        let text = self.lookup_symbol(name);
        if let Some(previous) = previous {
            if previous.value().is_some() && self.options().warn_on_constant_redefinition {
                tracing::warn!(
                    constant = %self.constant_name(module, &text),
                    "already initialized constant"
                );
            }
        }
        tracing::trace!(constant = %self.constant_name(module, &text), "set constant");

        if let Value::Module(child) = &value {
            self.adopt_module(module, &text, child);
        }
        Ok(constant)
    }

    /// Remove a constant (`Module#remove_const`), returning its value (nil for an unresolved
    /// autoload).
    pub fn remove_const(&self, module: &ModuleRef, name: &str) -> Result<Value> {
        let interned = self.checked_constant_name(name)?;
        module.check_frozen()?;
        let removed = module.update_constants(|table| table.shift_remove(&interned));
        match removed {
            Some(constant) => {
                tracing::debug!(constant = %self.constant_name(module, name), "removed constant");
                Ok(constant.value().cloned().unwrap_or(Value::Nil))
            }
            None => Err(RubyError::constant_not_defined(
                &self.constant_name(module, name),
                name,
            )),
        }
    }

    fn update_existing_constants(
        &self,
        module: &ModuleRef,
        names: &[&str],
        update: impl Fn(&RubyConstant) -> RubyConstant,
    ) -> Result<()> {
        module.check_frozen()?;
        for name in names {
            let interned = self.checked_constant_name(name)?;
            let updated = module.update_constants(|table| match table.get_mut(&interned) {
                Some(constant) => {
                    *constant = Arc::new(update(&**constant));
                    true
                }
                None => false,
            });
            if !updated {
                return Err(RubyError::constant_not_defined(
                    &self.constant_name(module, name),
                    *name,
                ));
            }
        }
        Ok(())
    }

    /// Make constants of `module` private (`Module#private_constant`).
    pub fn private_constant(&self, module: &ModuleRef, names: &[&str]) -> Result<()> {
        self.update_existing_constants(module, names, |constant| constant.with_private(true))
    }

    /// Make constants of `module` public again (`Module#public_constant`).
    pub fn public_constant(&self, module: &ModuleRef, names: &[&str]) -> Result<()> {
        self.update_existing_constants(module, names, |constant| constant.with_private(false))
    }

    /// Flag constants of `module` as deprecated (`Module#deprecate_constant`).
    pub fn deprecate_constant(&self, module: &ModuleRef, names: &[&str]) -> Result<()> {
        self.update_existing_constants(module, names, RubyConstant::with_deprecated)
    }

    /// Register `feature` to be loaded on first reference to constant `name` (`Module#autoload`).
    ///
    /// Ignored when the constant is already defined.
    pub fn autoload(&self, module: &ModuleRef, name: &str, feature: &str) -> Result<()> {
        let interned = self.checked_constant_name(name)?;
        if feature.is_empty() {
            return Err(RubyError::argument_error("empty file name"));
        }
        module.check_frozen()?;
        let registered = module.update_constants(|table| {
            if let Some(existing) = table.get(&interned) {
                if existing.value().is_some() {
                    return false;
                }
            }
            let autoload = AutoloadConstant::new(feature);
            table.insert(
                interned,
                Arc::new(RubyConstant::autoload(module, interned, autoload)),
            );
            true
        });
        if registered {
            tracing::debug!(constant = %self.constant_name(module, name), feature, "registered autoload");
        }
        Ok(())
    }

    /// The feature registered for constant `name` (`Module#autoload?`), unless it is loading.
    pub fn autoload_path(&self, module: &ModuleRef, name: &str) -> Result<Option<Arc<str>>> {
        let interned = self.checked_constant_name(name)?;
        let found = module
            .ancestors()
            .find_map(|ancestor| ancestor.get_constant(interned));
        Ok(found.and_then(|constant| {
            constant
                .autoload_constant()
                .filter(|autoload| !autoload.is_autoloading())
                .map(|autoload| Arc::clone(&autoload.feature))
        }))
    }

    /// The public constant names of `module` (`Module#constants`), own constants first.
    ///
    /// With `inherit`, constants of ancestors are added, stopping at `Object` unless `module` is
    /// `Object` itself.
    pub fn constants(&self, module: &ModuleRef, inherit: bool) -> Vec<Interned> {
        let mut names: IndexSet<Interned> = IndexSet::new();
        let mut add = |constants: &ConstantSnapshot| {
            for (name, constant) in constants.iter() {
                if !constant.is_private() {
                    names.insert(*name);
                }
            }
        };
        add(&module.constants());
        if inherit {
            let object = &self.core.object_class;
            for ancestor in module.ancestors() {
                if Arc::ptr_eq(&ancestor, module) {
                    continue;
                }
                if Arc::ptr_eq(&ancestor, object) {
                    break;
                }
                add(&ancestor.constants());
            }
        }
        names.into_iter().collect()
    }
}

type ConstantSnapshot = Arc<IndexMap<Interned, Arc<RubyConstant>>>;
