//!
//! Constant resolution.
//!
//! Unqualified references search the lexical scopes (own tables only), then the ancestors of
//! the innermost enclosing module, then `Object` for code nested in plain modules. Scoped
//! references (`A::B`) search the ancestors of the scope. Every inspected table contributes an
//! [`Assumption`]; a constant being autoloaded makes the result uncacheable.
//!

use std::sync::Arc;

use rmo_core::{identifiers, Interned};

use crate::assumption::{self, Assumption};
use crate::constant::RubyConstant;
use crate::error::{Result, RubyError};
use crate::lexical_scope::LexicalScope;
use crate::module::{Module, ModuleRef};
use crate::universe::Universe;
use crate::value::Value;

/// The outcome of a constant lookup.
#[derive(Debug, Clone)]
pub struct ConstantLookupResult {
    constant: Option<Arc<RubyConstant>>,
    assumptions: Vec<Assumption>,
}

impl ConstantLookupResult {
    fn new(constant: Option<Arc<RubyConstant>>, assumptions: Vec<Assumption>) -> Self {
        Self {
            constant,
            assumptions,
        }
    }

    /// The binding found, possibly an undefined or autoload one.
    pub fn constant(&self) -> Option<&Arc<RubyConstant>> {
        self.constant.as_ref()
    }

    pub fn is_found(&self) -> bool {
        self.constant.is_some()
    }

    pub fn is_deprecated(&self) -> bool {
        self.constant
            .as_ref()
            .map_or(false, |constant| constant.is_deprecated())
    }

    pub fn assumptions(&self) -> &[Assumption] {
        &self.assumptions
    }

    /// Whether this result still reflects the constant tables it was computed from.
    pub fn is_valid(&self) -> bool {
        assumption::all_valid(&self.assumptions)
    }
}

/// Whether the lookup stops at `constant`.
///
/// A constant autoloaded by the current thread is skipped, and makes the lookup uncacheable.
fn constant_exists(constant: Option<&Arc<RubyConstant>>, assumptions: &mut Vec<Assumption>) -> bool {
    let constant = match constant {
        Some(constant) => constant,
        None => return false,
    };
    match constant.autoload_constant() {
        Some(autoload) if autoload.is_autoloading() => {
            assumptions.push(Assumption::never_valid());
            !autoload.is_autoloading_thread()
        }
        _ => true,
    }
}

fn lookup_in_table(
    module: &Module,
    name: Interned,
    assumptions: &mut Vec<Assumption>,
) -> Option<Arc<RubyConstant>> {
    assumptions.push(module.constants_assumption());
    let constant = module.get_constant(name);
    if constant_exists(constant.as_ref(), assumptions) {
        constant
    } else {
        None
    }
}

fn lookup_constant_in(
    module: &Module,
    name: Interned,
    assumptions: &mut Vec<Assumption>,
) -> Option<Arc<RubyConstant>> {
    if let Some(constant) = lookup_in_table(module, name, assumptions) {
        return Some(constant);
    }
    for ancestor in module.ancestors() {
        if std::ptr::eq(Arc::as_ptr(&ancestor), module) {
            continue;
        }
        if let Some(constant) = lookup_in_table(&ancestor, name, assumptions) {
            return Some(constant);
        }
    }
    None
}

/// Look `name` up in `module` and its ancestors.
pub fn lookup_constant(module: &Module, name: Interned) -> ConstantLookupResult {
    let mut assumptions = Vec::new();
    let constant = lookup_constant_in(module, name, &mut assumptions);
    ConstantLookupResult::new(constant, assumptions)
}

fn lookup_constant_in_object(
    universe: &Universe,
    name: Interned,
    assumptions: &mut Vec<Assumption>,
) -> Option<Arc<RubyConstant>> {
    let object = &universe.core.object_class;
    if let Some(constant) = lookup_in_table(object, name, assumptions) {
        return Some(constant);
    }
    object
        .prepended_and_included_modules()
        .iter()
        .find_map(|module| lookup_in_table(module, name, assumptions))
}

fn lookup_constant_and_object(
    universe: &Universe,
    module: &Module,
    name: Interned,
    assumptions: &mut Vec<Assumption>,
) -> Option<Arc<RubyConstant>> {
    if let Some(constant) = lookup_constant_in(module, name, assumptions) {
        return Some(constant);
    }
    // Code nested in plain modules also sees toplevel constants.
    if !module.is_class() {
        return lookup_constant_in_object(universe, name, assumptions);
    }
    None
}

/// Resolve an unqualified constant reference made in `lexical_scope`.
pub fn lookup_constant_with_lexical_scope(
    universe: &Universe,
    lexical_scope: &LexicalScope,
    name: Interned,
) -> ConstantLookupResult {
    let module = lexical_scope.live_module();
    let mut assumptions = Vec::new();

    let mut scope = Some(lexical_scope);
    while let Some(current) = scope {
        if current.is_root() {
            break;
        }
        if let Some(constant) = lookup_in_table(current.live_module(), name, &mut assumptions) {
            return ConstantLookupResult::new(Some(constant), assumptions);
        }
        scope = current.parent().map(Arc::as_ref);
    }

    let constant = lookup_constant_and_object(universe, module, name, &mut assumptions);
    ConstantLookupResult::new(constant, assumptions)
}

/// Resolve `name` in `module` only, or in its ancestors too with `inherit`.
pub fn lookup_constant_with_inherit(
    universe: &Universe,
    module: &Module,
    name: &str,
    inherit: bool,
) -> Result<ConstantLookupResult> {
    if !identifiers::is_valid_constant_name(name) {
        return Err(RubyError::wrong_constant_name(name));
    }
    let name = universe.intern(name);
    let mut assumptions = Vec::new();
    let constant = if inherit {
        lookup_constant_and_object(universe, module, name, &mut assumptions)
    } else {
        lookup_in_table(module, name, &mut assumptions)
    };
    Ok(ConstantLookupResult::new(constant, assumptions))
}

/// Resolve a possibly scoped name (`A::B::C`, `::A`) starting from `module`.
///
/// Each segment but the last must name a module.
pub fn lookup_scoped_constant(
    universe: &Universe,
    module: &ModuleRef,
    full_name: &str,
    inherit: bool,
) -> Result<ConstantLookupResult> {
    let (absolute, segments) = identifiers::split_constant_path(full_name);
    let mut module = if absolute {
        universe.object_class()
    } else {
        module.clone()
    };

    let (last, path) = match segments.split_last() {
        Some(split) => split,
        None => return Err(RubyError::wrong_constant_name(full_name)),
    };

    let mut consumed = if absolute { 2 } else { 0 };
    for segment in path {
        consumed += segment.len();
        let found = lookup_constant_with_inherit(universe, &module, segment, inherit)?;
        let constant = match found.constant() {
            Some(constant) => Arc::clone(constant),
            None => return Ok(found),
        };
        let value = universe.constant_value(&module, &constant)?;
        match value {
            Some(Value::Module(next)) => module = next,
            Some(_) => {
                return Err(RubyError::type_error(format!(
                    "{} does not refer to class/module",
                    &full_name[..consumed]
                )));
            }
            None => return Ok(ConstantLookupResult::new(None, found.assumptions)),
        }
        consumed += 2;
    }

    if !identifiers::is_valid_constant_name(last) {
        return Err(RubyError::wrong_constant_name(full_name));
    }
    lookup_constant_with_inherit(universe, &module, last, inherit)
}

impl Universe {
    /// Run the autoload registered by `constant` of `module` and return the resulting binding.
    ///
    /// Returns `None` on the autoloading thread itself, while another thread is loading the
    /// feature, and when the feature did not define the constant (which is then left undefined).
    pub(crate) fn resolve_autoload(
        &self,
        module: &ModuleRef,
        name: Interned,
        constant: &Arc<RubyConstant>,
    ) -> Result<Option<Arc<RubyConstant>>> {
        let autoload = match constant.autoload_constant() {
            Some(autoload) => Arc::clone(autoload),
            None => return Ok(Some(Arc::clone(constant))),
        };
        if autoload.is_autoloading_thread() {
            return Ok(None);
        }

        let qualified = self.constant_name(module, &self.lookup_symbol(name));
        match self.feature_loader() {
            Some(loader) => {
                let _guard = match autoload.try_start_autoloading() {
                    Some(guard) => guard,
                    None => {
                        // Another thread is loading the feature: in flight until it is done.
                        tracing::debug!(
                            constant = %qualified,
                            "autoload in progress on another thread"
                        );
                        return Ok(module
                            .get_constant(name)
                            .filter(|current| !current.is_autoload() && !current.is_undefined()));
                    }
                };
                tracing::debug!(constant = %qualified, feature = autoload.feature(), "autoloading");
                loader.require(self, autoload.feature())?;
                tracing::debug!(constant = %qualified, "autoloaded");
            }
            None => {
                tracing::warn!(constant = %qualified, "no feature loader installed for autoload");
            }
        }

        let current = module.get_constant(name);
        match current {
            Some(current) if current.is_autoload() => {
                // The feature did not define the constant.
                module.update_constants(|table| {
                    if let Some(entry) = table.get_mut(&name) {
                        if entry.is_autoload() {
                            *entry = Arc::new(entry.undefined());
                        }
                    }
                });
                Ok(None)
            }
            Some(current) if current.is_undefined() => Ok(None),
            other => Ok(other),
        }
    }

    /// The value bound by `constant` (found in `module`'s lookup), running its autoload if needed.
    pub fn constant_value(
        &self,
        module: &ModuleRef,
        constant: &Arc<RubyConstant>,
    ) -> Result<Option<Value>> {
        if constant.is_deprecated() {
            tracing::warn!(
                constant = %self.constant_name(module, &self.lookup_symbol(constant.name())),
                "constant is deprecated"
            );
        }
        if constant.is_autoload() {
            let holder = constant.declaring_module().unwrap_or_else(|| module.clone());
            let loaded = self.resolve_autoload(&holder, constant.name(), constant)?;
            return Ok(loaded.and_then(|constant| constant.value().cloned()));
        }
        Ok(constant.value().cloned())
    }

    /// Resolve an unqualified constant reference made in `lexical_scope`.
    pub fn lookup_constant(&self, lexical_scope: &LexicalScope, name: &str) -> Result<Value> {
        if !identifiers::is_valid_constant_name(name) {
            return Err(RubyError::wrong_constant_name(name));
        }
        let module = lexical_scope.live_module();
        let found = lookup_constant_with_lexical_scope(self, lexical_scope, self.intern(name));
        let value = match found.constant() {
            Some(constant) => self.constant_value(module, constant)?,
            None => None,
        };
        value.ok_or_else(|| {
            RubyError::uninitialized_constant(&self.constant_name(module, name), name)
        })
    }

    /// Resolve `module::name`, where `name` is a single segment; private constants are refused.
    pub fn scoped_constant_get(&self, module: &ModuleRef, name: &str) -> Result<Value> {
        let found = lookup_constant_with_inherit(self, module, name, true)?;
        let qualified = self.constant_name(module, name);
        let constant = match found.constant() {
            Some(constant) => constant,
            None => return Err(RubyError::uninitialized_constant(&qualified, name)),
        };
        if constant.is_private() {
            return Err(RubyError::name_error(
                format!("private constant {} referenced", qualified),
                name,
            ));
        }
        self.constant_value(module, constant)?
            .ok_or_else(|| RubyError::uninitialized_constant(&qualified, name))
    }

    /// `Module#const_get`: resolve a possibly scoped name, ignoring constant privacy.
    pub fn const_get(&self, module: &ModuleRef, name: &str, inherit: bool) -> Result<Value> {
        let found = lookup_scoped_constant(self, module, name, inherit)?;
        let value = match found.constant() {
            Some(constant) => self.constant_value(module, constant)?,
            None => None,
        };
        value.ok_or_else(|| {
            let last = name.rsplit("::").next().unwrap_or(name);
            RubyError::uninitialized_constant(&self.constant_name(module, name), last)
        })
    }

    /// `Module#const_defined?`: whether the name resolves, without triggering autoloads.
    pub fn const_defined(&self, module: &ModuleRef, name: &str, inherit: bool) -> Result<bool> {
        let found = lookup_scoped_constant(self, module, name, inherit)?;
        Ok(found
            .constant()
            .map_or(false, |constant| constant.is_defined()))
    }

    /// `Module.nesting` for code in `lexical_scope`.
    pub fn nesting(&self, lexical_scope: &LexicalScope) -> Vec<ModuleRef> {
        lexical_scope.nesting()
    }
}
