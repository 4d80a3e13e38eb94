use std::sync::Arc;

use indexmap::IndexMap;
use rmo_core::{identifiers, visibility, Interned, Visibility};

use crate::declaration::DeclarationContext;
use crate::error::{Result, RubyError};
use crate::frame::Frame;
use crate::lexical_scope::LexicalScope;
use crate::lookup;
use crate::method::{InternalMethod, MethodKind, RubyProc, UnboundMethod};
use crate::module::ModuleRef;
use crate::universe::Universe;
use crate::value::Value;

/// What `define_method` builds a method from.
#[derive(Debug, Clone)]
pub enum MethodSource {
    Proc(Arc<RubyProc>),
    Method(InternalMethod),
    Unbound(UnboundMethod),
}

impl Universe {
    /// The lexical scope of a toplevel `module`/`class` body.
    pub fn module_scope(&self, module: &ModuleRef) -> Arc<LexicalScope> {
        LexicalScope::new(self.root_lexical_scope(), module.clone())
    }

    /// Store `method` in the method table of `module`, replacing any previous entry.
    pub fn add_method(&self, module: &ModuleRef, method: InternalMethod) -> Result<()> {
        module.check_frozen()?;
        let method = method.with_built_in(!self.options().core_loaded);
        let name = method.name();
        let undefined = method.is_undefined();
        module.methods.insert(name, method);
        module.methods_token.invalidate();
        tracing::trace!(
            module = %module,
            name = %self.lookup_symbol(name),
            undefined,
            "added method"
        );
        Ok(())
    }

    /// Add `method` to `module` with the given visibility, applying the implicit rules.
    ///
    /// Initializers are always private; `ModuleFunction` stores a private copy in the module
    /// and a public one in its singleton class.
    pub fn add_method_with_visibility(
        &self,
        module: &ModuleRef,
        method: InternalMethod,
        visibility: Visibility,
    ) -> Result<()> {
        let name = self.lookup_symbol(method.name());
        let visibility = if visibility::is_method_private_from_name(&name) {
            Visibility::Private
        } else {
            visibility
        };

        if visibility == Visibility::ModuleFunction {
            self.add_method(module, method.with_visibility(Visibility::Private))?;
            let singleton = self.singleton_class(module);
            self.add_method(
                &singleton,
                method
                    .with_declaring_module(&singleton)
                    .with_visibility(Visibility::Public),
            )
        } else {
            self.add_method(module, method.with_visibility(visibility))
        }
    }

    /// Define a public host method in the body of `module`.
    pub fn define_native_method(
        &self,
        module: &ModuleRef,
        name: &str,
        body: impl Fn(&Frame<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<InternalMethod> {
        let scope = self.module_scope(module);
        self.define_native_method_in(module, name, &scope, &DeclarationContext::none(), body)
    }

    /// Define a host method as a `def` in `lexical_scope` under `context` would.
    pub fn define_native_method_in(
        &self,
        module: &ModuleRef,
        name: &str,
        lexical_scope: &Arc<LexicalScope>,
        context: &Arc<DeclarationContext>,
        body: impl Fn(&Frame<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<InternalMethod> {
        let method = InternalMethod::new(
            self.intern(name),
            module.clone(),
            context.visibility,
            Arc::clone(lexical_scope),
            Arc::clone(context),
            MethodKind::Native(Arc::new(body)),
        );
        self.add_method_with_visibility(module, method.clone(), context.visibility)?;
        tracing::debug!(module = %module, name, "defined method");
        Ok(method)
    }

    /// `Module#define_method`.
    pub fn define_method(
        &self,
        module: &ModuleRef,
        name: &str,
        source: MethodSource,
    ) -> Result<InternalMethod> {
        let interned = self.intern(name);
        let method = match source {
            MethodSource::Proc(proc) => InternalMethod::new(
                interned,
                module.clone(),
                Visibility::Public,
                Arc::clone(proc.lexical_scope()),
                Arc::clone(proc.declaration_context()),
                MethodKind::Proc(proc),
            ),
            MethodSource::Method(method) => self.rebind_for_definition(module, method)?,
            MethodSource::Unbound(unbound) => {
                self.rebind_for_definition(module, unbound.method().clone())?
            }
        };
        let method = method.with_name(interned);
        self.add_method_with_visibility(module, method.clone(), Visibility::Public)?;
        tracing::debug!(module = %module, name, "defined method");
        Ok(method)
    }

    fn rebind_for_definition(
        &self,
        module: &ModuleRef,
        method: InternalMethod,
    ) -> Result<InternalMethod> {
        if !lookup::can_bind_method_to(&method, module) {
            return Err(RubyError::type_error(format!(
                "bind argument must be a subclass of {}",
                method.declaring_module()
            )));
        }
        Ok(method.with_declaring_module(module))
    }

    /// Look `name` up from `module`, falling back to `Object` for plain modules.
    fn deep_method_search(&self, module: &ModuleRef, name: Interned) -> Option<InternalMethod> {
        lookup::lookup_method_uncached(module, name, None).or_else(|| {
            if module.is_class() {
                None
            } else {
                lookup::lookup_method_uncached(&self.core.object_class, name, None)
            }
        })
    }

    fn find_defined_method(&self, module: &ModuleRef, name: &str) -> Result<InternalMethod> {
        self.deep_method_search(module, self.intern(name))
            .filter(|method| !method.is_undefined())
            .ok_or_else(|| RubyError::undefined_method(name, &module.to_string()))
    }

    /// `Module#alias_method`.
    pub fn alias_method(&self, module: &ModuleRef, new_name: &str, old_name: &str) -> Result<()> {
        let method = self.find_defined_method(module, old_name)?;
        self.add_method(module, method.with_name(self.intern(new_name)))?;
        tracing::debug!(module = %module, new_name, old_name, "aliased method");
        Ok(())
    }

    /// `Module#remove_method`: drop the entry of `module` itself, uncovering inherited ones.
    pub fn remove_method(&self, module: &ModuleRef, name: &str) -> Result<()> {
        module.check_frozen()?;
        let interned = self.intern(name);
        if module.methods.remove(&interned).is_none() {
            return Err(RubyError::method_not_defined_in(name, &module.to_string()));
        }
        module.methods_token.invalidate();
        tracing::debug!(module = %module, name, "removed method");
        Ok(())
    }

    /// `Module#undef_method`: hide the method, inherited definitions included.
    pub fn undef_method(&self, module: &ModuleRef, name: &str) -> Result<()> {
        module.check_frozen()?;
        let method = self.find_defined_method(module, name)?;
        self.add_method(module, method.with_declaring_module(module).undefined())?;
        tracing::debug!(module = %module, name, "undefined method");
        Ok(())
    }

    /// Change the visibility of the named methods as seen from `module`.
    pub fn set_method_visibility(
        &self,
        module: &ModuleRef,
        names: &[&str],
        visibility: Visibility,
    ) -> Result<()> {
        if visibility == Visibility::ModuleFunction && module.is_class() {
            return Err(RubyError::type_error(
                "module_function must be called for modules",
            ));
        }
        for name in names {
            let method = self.find_defined_method(module, name)?;
            if visibility == Visibility::ModuleFunction {
                self.add_method_with_visibility(module, method, visibility)?;
            } else if method.visibility() != visibility {
                self.add_method(module, method.with_visibility(visibility))?;
            }
        }
        Ok(())
    }

    /// `public`, `protected`, `private` and `module_function`.
    ///
    /// Without names, returns the context with its default visibility changed; with names,
    /// changes those methods and returns the context unchanged.
    pub fn set_visibility(
        &self,
        context: &Arc<DeclarationContext>,
        module: &ModuleRef,
        names: &[&str],
        visibility: Visibility,
    ) -> Result<Arc<DeclarationContext>> {
        if names.is_empty() {
            if visibility == Visibility::ModuleFunction && module.is_class() {
                return Err(RubyError::type_error(
                    "module_function must be called for modules",
                ));
            }
            return Ok(context.with_visibility(visibility));
        }
        self.set_method_visibility(module, names, visibility)?;
        Ok(Arc::clone(context))
    }

    /// `Module#public_class_method`.
    pub fn public_class_method(&self, module: &ModuleRef, names: &[&str]) -> Result<()> {
        let singleton = self.singleton_class(module);
        self.set_method_visibility(&singleton, names, Visibility::Public)
    }

    /// `Module#private_class_method`.
    pub fn private_class_method(&self, module: &ModuleRef, names: &[&str]) -> Result<()> {
        let singleton = self.singleton_class(module);
        self.set_method_visibility(&singleton, names, Visibility::Private)
    }

    fn define_accessor(&self, module: &ModuleRef, name: &str, writer: bool) -> Result<()> {
        let has_suffix = name.ends_with(|c: char| matches!(c, '?' | '!' | '='));
        if !identifiers::is_valid_method_name(name) || has_suffix {
            return Err(RubyError::name_error(
                format!("invalid attribute name `{}'", name),
                name,
            ));
        }
        let ivar = self.intern(&format!("@{}", name));
        let (method_name, kind) = if writer {
            (format!("{}=", name), MethodKind::AttrWriter(ivar))
        } else {
            (name.to_string(), MethodKind::AttrReader(ivar))
        };
        let method = InternalMethod::new(
            self.intern(&method_name),
            module.clone(),
            Visibility::Public,
            self.module_scope(module),
            DeclarationContext::none(),
            kind,
        );
        self.add_method_with_visibility(module, method, Visibility::Public)
    }

    /// `Module#attr_reader`.
    pub fn attr_reader(&self, module: &ModuleRef, names: &[&str]) -> Result<()> {
        for name in names {
            self.define_accessor(module, name, false)?;
        }
        Ok(())
    }

    /// `Module#attr_writer`.
    pub fn attr_writer(&self, module: &ModuleRef, names: &[&str]) -> Result<()> {
        for name in names {
            self.define_accessor(module, name, true)?;
        }
        Ok(())
    }

    /// `Module#attr_accessor`.
    pub fn attr_accessor(&self, module: &ModuleRef, names: &[&str]) -> Result<()> {
        for name in names {
            self.define_accessor(module, name, false)?;
            self.define_accessor(module, name, true)?;
        }
        Ok(())
    }

    fn method_with_visibility(
        &self,
        module: &ModuleRef,
        name: &str,
        inherit: bool,
    ) -> Option<Visibility> {
        let interned = self.intern(name);
        let method = if inherit {
            lookup::lookup_method_uncached(module, interned, None)
        } else {
            module.get_method(interned)
        };
        method
            .filter(|method| !method.is_undefined())
            .map(|method| method.visibility())
    }

    /// `Module#method_defined?`: public or protected methods only.
    pub fn method_defined(&self, module: &ModuleRef, name: &str, inherit: bool) -> bool {
        self.method_with_visibility(module, name, inherit)
            .map_or(false, |visibility| !visibility.is_private())
    }

    pub fn public_method_defined(&self, module: &ModuleRef, name: &str, inherit: bool) -> bool {
        self.method_with_visibility(module, name, inherit) == Some(Visibility::Public)
    }

    pub fn protected_method_defined(&self, module: &ModuleRef, name: &str, inherit: bool) -> bool {
        self.method_with_visibility(module, name, inherit) == Some(Visibility::Protected)
    }

    pub fn private_method_defined(&self, module: &ModuleRef, name: &str, inherit: bool) -> bool {
        self.method_with_visibility(module, name, inherit)
            .map_or(false, Visibility::is_private)
    }

    fn filtered_instance_methods(
        &self,
        module: &ModuleRef,
        inherit: bool,
        filter: impl Fn(Visibility) -> bool,
    ) -> Vec<Interned> {
        let methods: IndexMap<Interned, InternalMethod> = if inherit {
            lookup::get_all_methods(module)
        } else {
            module
                .methods()
                .into_iter()
                .map(|method| (method.name(), method))
                .collect()
        };
        lookup::without_undefined_methods(methods)
            .into_iter()
            .filter(|(_, method)| filter(method.visibility()))
            .map(|(name, _)| name)
            .collect()
    }

    /// `Module#instance_methods`: public and protected methods.
    pub fn instance_methods(&self, module: &ModuleRef, inherit: bool) -> Vec<Interned> {
        self.filtered_instance_methods(module, inherit, |visibility| !visibility.is_private())
    }

    pub fn public_instance_methods(&self, module: &ModuleRef, inherit: bool) -> Vec<Interned> {
        self.filtered_instance_methods(module, inherit, Visibility::is_public)
    }

    pub fn protected_instance_methods(&self, module: &ModuleRef, inherit: bool) -> Vec<Interned> {
        self.filtered_instance_methods(module, inherit, Visibility::is_protected)
    }

    pub fn private_instance_methods(&self, module: &ModuleRef, inherit: bool) -> Vec<Interned> {
        self.filtered_instance_methods(module, inherit, Visibility::is_private)
    }

    /// `Module#instance_method`.
    pub fn instance_method(&self, module: &ModuleRef, name: &str) -> Result<UnboundMethod> {
        let method = self.find_defined_method(module, name)?;
        Ok(UnboundMethod::new(module.clone(), method))
    }

    /// `Module#public_instance_method`.
    pub fn public_instance_method(&self, module: &ModuleRef, name: &str) -> Result<UnboundMethod> {
        let method = self.find_defined_method(module, name)?;
        if !method.visibility().is_public() {
            return Err(RubyError::name_error(
                format!(
                    "method `{}' for {} is {}",
                    name,
                    module,
                    method.visibility().keyword()
                ),
                name,
            ));
        }
        Ok(UnboundMethod::new(module.clone(), method))
    }

    /// `Object#singleton_methods`: with `all`, methods of modules extending the object too.
    pub fn singleton_methods(&self, value: &Value, all: bool) -> Vec<Interned> {
        let metaclass = self.metaclass_of(value);
        if !metaclass.is_singleton_class() {
            return Vec::new();
        }
        let methods = if all {
            lookup::get_methods_before_logical_class(&metaclass)
        } else {
            metaclass
                .methods()
                .into_iter()
                .map(|method| (method.name(), method))
                .collect()
        };
        lookup::without_undefined_methods(methods)
            .into_iter()
            .filter(|(_, method)| !method.visibility().is_private())
            .map(|(name, _)| name)
            .collect()
    }
}
