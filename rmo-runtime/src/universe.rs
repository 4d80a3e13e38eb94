use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use arc_swap::ArcSwapOption;
use rmo_core::{identifiers, Interned, Interner};

use crate::chain::{ChainLink, ModuleChain};
use crate::constant::RubyConstant;
use crate::declaration::DeclarationContext;
use crate::error::{Result, RubyError};
use crate::instance::RubyObject;
use crate::lexical_scope::LexicalScope;
use crate::module::{Attached, Module, ModuleKind, ModuleRef};
use crate::options::UniverseOptions;
use crate::value::Value;

/// Loads a feature on behalf of `autoload`.
///
/// Returns whether the feature was loaded by this call.
pub trait FeatureLoader: Send + Sync {
    fn require(&self, universe: &Universe, feature: &str) -> Result<bool>;
}

impl<F> FeatureLoader for F
where
    F: Fn(&Universe, &str) -> Result<bool> + Send + Sync,
{
    fn require(&self, universe: &Universe, feature: &str) -> Result<bool> {
        self(universe, feature)
    }
}

/// The core classes of the runtime.
///
/// This struct allows to always keep a reference to important classes,
/// even in case of modifications to the constants of `Object` by user code.
#[derive(Debug)]
pub struct CoreClasses {
    /// The **BasicObject** class, root of the class hierarchy.
    pub basic_object_class: ModuleRef,
    /// The **Object** class.
    pub object_class: ModuleRef,
    /// The **Module** class.
    pub module_class: ModuleRef,
    /// The **Class** class.
    pub class_class: ModuleRef,
    /// The **Kernel** module.
    pub kernel_module: ModuleRef,

    /// The **NilClass** class.
    pub nil_class: ModuleRef,
    /// The **TrueClass** class.
    pub true_class: ModuleRef,
    /// The **FalseClass** class.
    pub false_class: ModuleRef,
    /// The **Integer** class.
    pub integer_class: ModuleRef,
    /// The **Symbol** class.
    pub symbol_class: ModuleRef,
    /// The **String** class.
    pub string_class: ModuleRef,
}

/// The central data structure of the runtime.
///
/// It owns every module created through it and the state shared between them: the symbol
/// interner, the core classes and the class variable definition lock.
pub struct Universe {
    /// The string interner for symbols.
    pub interner: Interner,
    /// The runtime's core classes.
    pub core: CoreClasses,
    options: UniverseOptions,
    root_lexical_scope: Arc<LexicalScope>,
    pub(crate) class_variable_definition_lock: Mutex<()>,
    feature_loader: ArcSwapOption<Box<dyn FeatureLoader>>,
    registry: Mutex<Vec<Weak<Module>>>,
    next_id: AtomicU64,
}

fn class_kind() -> ModuleKind {
    ModuleKind::Class { attached: None }
}

impl Universe {
    /// Bootstrap a universe with the default options.
    pub fn new() -> Self {
        Self::with_options(UniverseOptions::default())
    }

    /// Bootstrap a universe: the core classes, bound as constants of `Object`.
    pub fn with_options(options: UniverseOptions) -> Self {
        let interner = Interner::with_capacity(256);
        let next_id = AtomicU64::new(1);
        let mut registry = Vec::new();

        let mut allocate = |kind: ModuleKind, parent: Option<ModuleRef>| {
            let module = Module::new(next_id.fetch_add(1, Ordering::Relaxed), kind, parent);
            registry.push(Arc::downgrade(&module));
            module
        };

        let basic_object_class = allocate(class_kind(), None);
        let kernel_module = allocate(ModuleKind::Module, None);
        let object_class = allocate(class_kind(), Some(basic_object_class.clone()));
        object_class.chain.store(Arc::new(ModuleChain {
            links: vec![ChainLink::Origin, ChainLink::Module(kernel_module.clone())],
            parent: Some(basic_object_class.clone()),
        }));
        let module_class = allocate(class_kind(), Some(object_class.clone()));
        let class_class = allocate(class_kind(), Some(module_class.clone()));

        let nil_class = allocate(class_kind(), Some(object_class.clone()));
        let true_class = allocate(class_kind(), Some(object_class.clone()));
        let false_class = allocate(class_kind(), Some(object_class.clone()));
        let integer_class = allocate(class_kind(), Some(object_class.clone()));
        let symbol_class = allocate(class_kind(), Some(object_class.clone()));
        let string_class = allocate(class_kind(), Some(object_class.clone()));

        let core = CoreClasses {
            basic_object_class,
            object_class,
            module_class,
            class_class,
            kernel_module,
            nil_class,
            true_class,
            false_class,
            integer_class,
            symbol_class,
            string_class,
        };

        let named = [
            ("BasicObject", &core.basic_object_class),
            ("Object", &core.object_class),
            ("Module", &core.module_class),
            ("Class", &core.class_class),
            ("Kernel", &core.kernel_module),
            ("NilClass", &core.nil_class),
            ("TrueClass", &core.true_class),
            ("FalseClass", &core.false_class),
            ("Integer", &core.integer_class),
            ("Symbol", &core.symbol_class),
            ("String", &core.string_class),
        ];
        let object_class = core.object_class.clone();
        object_class.update_constants(|table| {
            for (name, module) in named {
                let interned = interner.intern(name);
                module.set_full_name(name.to_string());
                table.insert(
                    interned,
                    Arc::new(RubyConstant::new(
                        &object_class,
                        interned,
                        Value::Module(module.clone()),
                    )),
                );
            }
        });

        let root_lexical_scope = LexicalScope::root(object_class);
        tracing::debug!(modules = registry.len(), "bootstrapped universe");

        Self {
            interner,
            core,
            options,
            root_lexical_scope,
            class_variable_definition_lock: Mutex::new(()),
            feature_loader: ArcSwapOption::empty(),
            registry: Mutex::new(registry),
            next_id,
        }
    }

    pub fn options(&self) -> &UniverseOptions {
        &self.options
    }

    /// The toplevel lexical scope, whose live module is `Object`.
    pub fn root_lexical_scope(&self) -> &Arc<LexicalScope> {
        &self.root_lexical_scope
    }

    /// Intern a name.
    pub fn intern(&self, name: &str) -> Interned {
        self.interner.intern(name)
    }

    /// Get the text of an interned name.
    pub fn lookup_symbol(&self, name: Interned) -> Arc<str> {
        self.interner.lookup(name)
    }

    /// Intern a name as a symbol value.
    pub fn symbol(&self, name: &str) -> Value {
        Value::Symbol(self.intern(name))
    }

    /// Install the loader used by `autoload`.
    pub fn set_feature_loader(&self, loader: impl FeatureLoader + 'static) {
        self.feature_loader.store(Some(Arc::new(Box::new(loader))));
    }

    pub(crate) fn feature_loader(&self) -> Option<Arc<Box<dyn FeatureLoader>>> {
        self.feature_loader.load_full()
    }

    pub(crate) fn next_object_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn allocate(&self, kind: ModuleKind, parent: Option<ModuleRef>) -> ModuleRef {
        let module = Module::new(self.next_object_id(), kind, parent);
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.len() >= 64 && registry.len().is_power_of_two() {
            registry.retain(|module| module.strong_count() > 0);
        }
        registry.push(Arc::downgrade(&module));
        module
    }

    /// Get the **BasicObject** class.
    pub fn basic_object_class(&self) -> ModuleRef {
        self.core.basic_object_class.clone()
    }

    /// Get the **Object** class.
    pub fn object_class(&self) -> ModuleRef {
        self.core.object_class.clone()
    }

    /// Get the **Module** class.
    pub fn module_class(&self) -> ModuleRef {
        self.core.module_class.clone()
    }

    /// Get the **Class** class.
    pub fn class_class(&self) -> ModuleRef {
        self.core.class_class.clone()
    }

    /// Get the **Kernel** module.
    pub fn kernel_module(&self) -> ModuleRef {
        self.core.kernel_module.clone()
    }

    /// Get the **NilClass** class.
    pub fn nil_class(&self) -> ModuleRef {
        self.core.nil_class.clone()
    }

    /// Get the **TrueClass** class.
    pub fn true_class(&self) -> ModuleRef {
        self.core.true_class.clone()
    }

    /// Get the **FalseClass** class.
    pub fn false_class(&self) -> ModuleRef {
        self.core.false_class.clone()
    }

    /// Get the **Integer** class.
    pub fn integer_class(&self) -> ModuleRef {
        self.core.integer_class.clone()
    }

    /// Get the **Symbol** class.
    pub fn symbol_class(&self) -> ModuleRef {
        self.core.symbol_class.clone()
    }

    /// Get the **String** class.
    pub fn string_class(&self) -> ModuleRef {
        self.core.string_class.clone()
    }

    /// Create an anonymous module (`Module.new`).
    pub fn new_module(&self) -> ModuleRef {
        self.allocate(ModuleKind::Module, None)
    }

    /// Create an anonymous class (`Class.new`), inheriting from `Object` by default.
    pub fn new_class(&self, superclass: Option<&ModuleRef>) -> Result<ModuleRef> {
        let superclass = match superclass {
            Some(superclass) => {
                if !superclass.is_class() {
                    return Err(RubyError::type_error(
                        "superclass must be a Class (Module given)",
                    ));
                }
                if superclass.is_singleton_class() {
                    return Err(RubyError::type_error(
                        "can't make subclass of singleton class",
                    ));
                }
                if Arc::ptr_eq(superclass, &self.core.class_class) {
                    return Err(RubyError::type_error("can't make subclass of Class"));
                }
                superclass.clone()
            }
            None => self.object_class(),
        };
        Ok(self.allocate(class_kind(), Some(superclass)))
    }

    /// The existing module bound to `name` in `lexical_parent`, for reopening.
    fn lookup_for_existing_module(
        &self,
        lexical_parent: &ModuleRef,
        name: Interned,
    ) -> Result<Option<Value>> {
        let mut constant = lexical_parent.get_constant(name);
        if constant.is_none() && Arc::ptr_eq(lexical_parent, &self.core.object_class) {
            constant = lexical_parent
                .prepended_and_included_modules()
                .iter()
                .find_map(|module| module.get_constant(name));
        }
        let constant = match constant {
            Some(constant) => constant,
            None => return Ok(None),
        };
        if constant.is_autoload() {
            let holder = constant
                .declaring_module()
                .unwrap_or_else(|| lexical_parent.clone());
            return self.resolve_autoload(&holder, name, &constant).map(|found| {
                found.and_then(|constant| constant.value().cloned())
            });
        }
        Ok(constant.value().cloned())
    }

    /// Open the module `name` of `lexical_parent`, creating it if needed (`module Name`).
    pub fn define_module(&self, lexical_parent: &ModuleRef, name: &str) -> Result<ModuleRef> {
        if !identifiers::is_valid_constant_name(name) {
            return Err(RubyError::wrong_constant_name(name));
        }
        let interned = self.intern(name);
        match self.lookup_for_existing_module(lexical_parent, interned)? {
            Some(Value::Module(module)) if !module.is_class() => Ok(module),
            Some(_) => Err(RubyError::type_error(format!("{} is not a module", name))),
            None => {
                let module = self.new_module();
                self.const_set(lexical_parent, name, Value::Module(module.clone()))?;
                tracing::debug!(module = %module, "defined module");
                Ok(module)
            }
        }
    }

    /// Open the class `name` of `lexical_parent`, creating it if needed (`class Name < Super`).
    pub fn define_class(
        &self,
        lexical_parent: &ModuleRef,
        name: &str,
        superclass: Option<&ModuleRef>,
    ) -> Result<ModuleRef> {
        if !identifiers::is_valid_constant_name(name) {
            return Err(RubyError::wrong_constant_name(name));
        }
        let interned = self.intern(name);
        match self.lookup_for_existing_module(lexical_parent, interned)? {
            Some(Value::Module(class)) if class.is_class() => {
                if let Some(superclass) = superclass {
                    let matches = class
                        .superclass()
                        .map_or(false, |current| Arc::ptr_eq(&current, superclass));
                    if !matches {
                        return Err(RubyError::type_error(format!(
                            "superclass mismatch for class {}",
                            name
                        )));
                    }
                }
                Ok(class)
            }
            Some(_) => Err(RubyError::type_error(format!("{} is not a class", name))),
            None => {
                let class = self.new_class(superclass)?;
                self.const_set(lexical_parent, name, Value::Module(class.clone()))?;
                tracing::debug!(class = %class, "defined class");
                Ok(class)
            }
        }
    }

    /// Give `module` its name as constant `name` of `lexical_parent`, if it has none yet.
    pub(crate) fn adopt_module(&self, lexical_parent: &ModuleRef, name: &str, module: &ModuleRef) {
        if module.has_full_name() {
            return;
        }
        if Arc::ptr_eq(lexical_parent, &self.core.object_class) {
            module.set_full_name(name.to_string());
        } else if let Some(parent_name) = lexical_parent.name() {
            module.set_full_name(format!("{}::{}", parent_name, name));
        } else {
            // Named once the parent itself gets a name.
            return;
        }
        self.name_anonymous_children(module);
    }

    fn name_anonymous_children(&self, module: &ModuleRef) {
        for (name, constant) in module.constants().iter() {
            if let Some(Value::Module(child)) = constant.value() {
                if !child.has_full_name() {
                    self.adopt_module(module, &self.lookup_symbol(*name), child);
                }
            }
        }
    }

    /// Get (creating it if needed) the singleton class of a module.
    pub fn singleton_class(&self, module: &ModuleRef) -> ModuleRef {
        if let Some(singleton) = module.singleton.get() {
            return singleton.clone();
        }
        let superclass = if module.is_class() {
            match module.superclass() {
                Some(superclass) => self.singleton_class(&superclass),
                None => self.class_class(),
            }
        } else {
            self.module_class()
        };
        module
            .singleton
            .get_or_init(|| {
                let attached = Attached::Module(Arc::downgrade(module));
                self.allocate(
                    ModuleKind::Class {
                        attached: Some(attached),
                    },
                    Some(superclass),
                )
            })
            .clone()
    }

    /// Get (creating it if needed) the singleton class of a value.
    pub fn singleton_class_of(&self, value: &Value) -> Result<ModuleRef> {
        match value {
            Value::Module(module) => Ok(self.singleton_class(module)),
            Value::Object(object) => Ok(object
                .singleton
                .get_or_init(|| {
                    let attached = Attached::Object(Arc::downgrade(object));
                    self.allocate(
                        ModuleKind::Class {
                            attached: Some(attached),
                        },
                        Some(object.class()),
                    )
                })
                .clone()),
            Value::Nil => Ok(self.nil_class()),
            Value::Boolean(true) => Ok(self.true_class()),
            Value::Boolean(false) => Ok(self.false_class()),
            Value::Integer(_) | Value::Symbol(_) | Value::String(_) => {
                Err(RubyError::type_error("can't define singleton"))
            }
        }
    }

    /// Get the logical class of a value.
    pub fn class_of(&self, value: &Value) -> ModuleRef {
        match value {
            Value::Nil => self.nil_class(),
            Value::Boolean(true) => self.true_class(),
            Value::Boolean(false) => self.false_class(),
            Value::Integer(_) => self.integer_class(),
            Value::Symbol(_) => self.symbol_class(),
            Value::String(_) => self.string_class(),
            Value::Module(module) if module.is_class() => self.class_class(),
            Value::Module(_) => self.module_class(),
            Value::Object(object) => object.class(),
        }
    }

    /// Get the class method lookups on a value start from.
    pub fn metaclass_of(&self, value: &Value) -> ModuleRef {
        match value {
            Value::Module(module) => self.singleton_class(module),
            Value::Object(object) => object
                .singleton_class()
                .cloned()
                .unwrap_or_else(|| object.class()),
            other => self.class_of(other),
        }
    }

    /// Instantiate a class (`Class#allocate`).
    pub fn new_object(&self, class: &ModuleRef) -> Result<Value> {
        if !class.is_class() {
            return Err(RubyError::type_error(format!(
                "wrong argument type {} (expected Class)",
                class
            )));
        }
        if class.is_singleton_class() {
            return Err(RubyError::type_error(
                "can't create instance of singleton class",
            ));
        }
        let object = RubyObject::new(class.clone(), self.next_object_id());
        Ok(Value::Object(Arc::new(object)))
    }

    /// Whether `value` is an instance of `module` or of one of its descendants (`Module#===`).
    pub fn is_a(&self, value: &Value, module: &Module) -> bool {
        self.metaclass_of(value).includes_module(module)
    }

    /// Copy a module or class (`initialize_copy`): its methods, constants, class variables and
    /// mixins.
    pub fn copy_module(&self, source: &ModuleRef) -> Result<ModuleRef> {
        if Arc::ptr_eq(source, &self.core.basic_object_class) {
            return Err(RubyError::type_error("can't copy the root class"));
        }
        if source.is_singleton_class() {
            return Err(RubyError::type_error("can't copy singleton class"));
        }
        let (kind, parent) = match source.kind() {
            ModuleKind::Module => (ModuleKind::Module, None),
            ModuleKind::Class { .. } => (class_kind(), source.superclass()),
            ModuleKind::Refinement { .. } => {
                return Err(RubyError::type_error("can't copy refinement"));
            }
        };
        let copy = self.allocate(kind, parent);

        let chain = source.chain.load();
        copy.chain.store(Arc::new(ModuleChain::clone(&chain)));
        for method in source.methods() {
            copy.methods
                .insert(method.name(), method.with_declaring_module(&copy));
        }
        for (name, value) in source.own_class_variables() {
            copy.class_variables.insert(name, value);
        }
        let constants = source.constants();
        copy.update_constants(|table| {
            for (name, constant) in constants.iter() {
                table.insert(*name, Arc::clone(constant));
            }
        });

        tracing::debug!(source = %source, copy = %copy, "copied module");
        Ok(copy)
    }

    /// The declaration context of toplevel code.
    pub fn toplevel_context(&self) -> Arc<DeclarationContext> {
        DeclarationContext::none()
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Universe {
    fn drop(&mut self) {
        // Methods, constants and chains reference modules strongly and form cycles.
        let registry = self.registry.get_mut().unwrap_or_else(PoisonError::into_inner);
        for module in registry.drain(..) {
            if let Some(module) = module.upgrade() {
                module.clear();
            }
        }
    }
}
