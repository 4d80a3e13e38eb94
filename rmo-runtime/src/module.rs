use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use indexmap::IndexMap;
use rmo_core::Interned;

use crate::assumption::{Assumption, InvalidationToken};
use crate::chain::ModuleChain;
use crate::constant::RubyConstant;
use crate::error::{Result, RubyError};
use crate::instance::RubyObject;
use crate::method::InternalMethod;
use crate::value::Value;

pub type ModuleRef = Arc<Module>;

pub(crate) type ConstantTable = IndexMap<Interned, Arc<RubyConstant>>;

/// What a singleton class is attached to.
#[derive(Debug, Clone)]
pub enum Attached {
    Module(Weak<Module>),
    Object(Weak<RubyObject>),
}

impl Attached {
    pub fn upgrade(&self) -> Option<Value> {
        match self {
            Self::Module(module) => module.upgrade().map(Value::Module),
            Self::Object(object) => object.upgrade().map(Value::Object),
        }
    }
}

/// The flavour of a module.
#[derive(Debug)]
pub enum ModuleKind {
    /// A plain module.
    Module,
    /// A class; singleton classes carry what they are attached to.
    Class { attached: Option<Attached> },
    /// The anonymous module holding the refinements of `refined` declared in `namespace`.
    Refinement {
        refined: ModuleRef,
        namespace: Weak<Module>,
    },
}

/// Represents a class or a module.
///
/// Every table supports lock-free reads; writers are serialized per table and invalidate the
/// token guarding that table once the change is published.
pub struct Module {
    id: u64,
    this: Weak<Module>,
    pub(crate) kind: ModuleKind,
    name: ArcSwapOption<String>,
    pub(crate) chain: ArcSwap<ModuleChain>,
    pub(crate) chain_lock: Mutex<()>,
    pub(crate) methods: DashMap<Interned, InternalMethod>,
    pub(crate) methods_token: InvalidationToken,
    pub(crate) constants: ArcSwap<ConstantTable>,
    pub(crate) constants_lock: Mutex<()>,
    pub(crate) constants_token: InvalidationToken,
    pub(crate) class_variables: DashMap<Interned, Value>,
    pub(crate) refinements: DashMap<ModuleRef, ModuleRef>,
    pub(crate) singleton: OnceLock<ModuleRef>,
    frozen: AtomicBool,
    sealed: AtomicBool,
}

impl Module {
    pub(crate) fn new(id: u64, kind: ModuleKind, parent: Option<ModuleRef>) -> ModuleRef {
        Arc::new_cyclic(|this| Self {
            id,
            this: this.clone(),
            kind,
            name: ArcSwapOption::empty(),
            chain: ArcSwap::from_pointee(ModuleChain::new(parent)),
            chain_lock: Mutex::new(()),
            methods: DashMap::new(),
            methods_token: InvalidationToken::new(),
            constants: ArcSwap::from_pointee(ConstantTable::new()),
            constants_lock: Mutex::new(()),
            constants_token: InvalidationToken::new(),
            class_variables: DashMap::new(),
            refinements: DashMap::new(),
            singleton: OnceLock::new(),
            frozen: AtomicBool::new(false),
            sealed: AtomicBool::new(false),
        })
    }

    /// A strong handle on this module.
    pub fn self_ref(&self) -> Option<ModuleRef> {
        self.this.upgrade()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &ModuleKind {
        &self.kind
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, ModuleKind::Class { .. })
    }

    pub fn is_singleton_class(&self) -> bool {
        matches!(self.kind, ModuleKind::Class { attached: Some(_) })
    }

    pub fn is_refinement(&self) -> bool {
        matches!(self.kind, ModuleKind::Refinement { .. })
    }

    /// What this singleton class is attached to, if it is one and its owner is still alive.
    pub fn attached(&self) -> Option<Value> {
        match &self.kind {
            ModuleKind::Class {
                attached: Some(attached),
            } => attached.upgrade(),
            _ => None,
        }
    }

    /// The module refined by this refinement.
    pub fn refined_module(&self) -> Option<&ModuleRef> {
        match &self.kind {
            ModuleKind::Refinement { refined, .. } => Some(refined),
            _ => None,
        }
    }

    /// The module whose `refine` created this refinement.
    pub fn refinement_namespace(&self) -> Option<ModuleRef> {
        match &self.kind {
            ModuleKind::Refinement { namespace, .. } => namespace.upgrade(),
            _ => None,
        }
    }

    /// The superclass of this class (`None` for modules and the root class).
    pub fn superclass(&self) -> Option<ModuleRef> {
        if !self.is_class() {
            return None;
        }
        self.chain.load().parent.clone()
    }

    /// The singleton class, if it was already created.
    pub fn singleton_class_if_exists(&self) -> Option<&ModuleRef> {
        self.singleton.get()
    }

    /// The fully qualified name, or `None` while anonymous.
    pub fn name(&self) -> Option<String> {
        self.name.load_full().map(|name| name.as_str().to_owned())
    }

    pub fn has_full_name(&self) -> bool {
        self.name.load().is_some()
    }

    pub(crate) fn set_full_name(&self, name: String) {
        self.name.store(Some(Arc::new(name)));
    }

    pub fn freeze(&self) {
        self.frozen.store(true, AtomicOrdering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(AtomicOrdering::Acquire)
    }

    /// Seal this module: any further mutation is a security violation.
    pub fn seal(&self) {
        self.sealed.store(true, AtomicOrdering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(AtomicOrdering::Acquire)
    }

    /// Fail if this module may not be mutated.
    pub fn check_frozen(&self) -> Result<()> {
        let kind = if self.is_class() { "Class" } else { "Module" };
        if self.is_frozen() {
            return Err(RubyError::FrozenError(format!(
                "can't modify frozen {}: {}",
                kind, self
            )));
        }
        if self.is_sealed() {
            return Err(RubyError::SecurityError(format!(
                "can't modify sealed {}: {}",
                kind, self
            )));
        }
        Ok(())
    }

    /// Search this module's own method table.
    pub fn get_method(&self, name: Interned) -> Option<InternalMethod> {
        self.methods.get(&name).map(|entry| entry.value().clone())
    }

    /// A snapshot of this module's own methods.
    pub fn methods(&self) -> Vec<InternalMethod> {
        self.methods
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Invalidated whenever the method table changes.
    pub fn methods_assumption(&self) -> Assumption {
        self.methods_token.assumption()
    }

    /// Invalidated whenever the constant table changes.
    pub fn constants_assumption(&self) -> Assumption {
        self.constants_token.assumption()
    }

    /// Search this module's own constant table.
    pub fn get_constant(&self, name: Interned) -> Option<Arc<RubyConstant>> {
        self.constants.load().get(&name).cloned()
    }

    /// A snapshot of this module's own constants, in definition order.
    pub fn constants(&self) -> Arc<IndexMap<Interned, Arc<RubyConstant>>> {
        self.constants.load_full()
    }

    /// Copy the constant table, apply `update` and publish the result.
    pub(crate) fn update_constants<R>(&self, update: impl FnOnce(&mut ConstantTable) -> R) -> R {
        let _guard = self
            .constants_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut table = (**self.constants.load()).clone();
        let result = update(&mut table);
        self.constants.store(Arc::new(table));
        self.constants_token.invalidate();
        result
    }

    /// A snapshot of this module's own class variables.
    pub fn own_class_variables(&self) -> Vec<(Interned, Value)> {
        self.class_variables
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// The refinements declared in this namespace, as `(refined, refinement)` pairs.
    pub fn refinements(&self) -> Vec<(ModuleRef, ModuleRef)> {
        self.refinements
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Whether `other` appears in the ancestors of this module (itself included).
    pub fn includes_module(&self, other: &Module) -> bool {
        self.ancestors()
            .any(|ancestor| std::ptr::eq(Arc::as_ptr(&ancestor), other))
    }

    /// `self < other`: `None` when the modules are unrelated.
    pub fn is_lt(&self, other: &Module) -> Option<bool> {
        if std::ptr::eq(self, other) {
            return Some(false);
        }
        self.relation(other)
    }

    /// `self <= other`.
    pub fn is_le(&self, other: &Module) -> Option<bool> {
        if std::ptr::eq(self, other) {
            return Some(true);
        }
        self.relation(other)
    }

    /// `self > other`.
    pub fn is_gt(&self, other: &Module) -> Option<bool> {
        other.is_lt(self)
    }

    /// `self >= other`.
    pub fn is_ge(&self, other: &Module) -> Option<bool> {
        other.is_le(self)
    }

    /// `self <=> other`: `Less` when `self` descends from `other`.
    pub fn compare(&self, other: &Module) -> Option<Ordering> {
        if std::ptr::eq(self, other) {
            return Some(Ordering::Equal);
        }
        match self.relation(other)? {
            true => Some(Ordering::Less),
            false => Some(Ordering::Greater),
        }
    }

    fn relation(&self, other: &Module) -> Option<bool> {
        if self.includes_module(other) {
            Some(true)
        } else if other.includes_module(self) {
            Some(false)
        } else {
            None
        }
    }

    /// `self < value`, failing when `value` is not a module.
    pub fn lt_value(&self, value: &Value) -> Result<Option<bool>> {
        Ok(self.is_lt(comparable(value)?))
    }

    pub fn le_value(&self, value: &Value) -> Result<Option<bool>> {
        Ok(self.is_le(comparable(value)?))
    }

    pub fn gt_value(&self, value: &Value) -> Result<Option<bool>> {
        Ok(self.is_gt(comparable(value)?))
    }

    pub fn ge_value(&self, value: &Value) -> Result<Option<bool>> {
        Ok(self.is_ge(comparable(value)?))
    }

    /// `self <=> value`, `None` for unrelated modules and non-modules alike.
    pub fn compare_value(&self, value: &Value) -> Option<Ordering> {
        self.compare(value.as_module()?)
    }

    /// Drop every reference this module holds to other runtime entities.
    pub(crate) fn clear(&self) {
        self.methods.clear();
        self.class_variables.clear();
        self.refinements.clear();
        self.constants.store(Arc::new(ConstantTable::new()));
        self.chain.store(Arc::new(ModuleChain::new(None)));
    }
}

fn comparable(value: &Value) -> Result<&Module> {
    value
        .as_module()
        .map(|module| module.as_ref())
        .ok_or_else(|| RubyError::type_error("compared with non class/module"))
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Module {}

impl Hash for Module {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(name) = self.name.load().as_deref() {
            return f.write_str(name);
        }
        match &self.kind {
            ModuleKind::Class {
                attached: Some(attached),
            } => match attached.upgrade() {
                Some(Value::Module(module)) => write!(f, "#<Class:{}>", module),
                Some(Value::Object(object)) => {
                    write!(f, "#<Class:#<{}:0x{:016x}>>", object.class(), object.id())
                }
                _ => write!(f, "#<Class:0x{:016x}>", self.id),
            },
            ModuleKind::Class { attached: None } => write!(f, "#<Class:0x{:016x}>", self.id),
            ModuleKind::Refinement { refined, namespace } => match namespace.upgrade() {
                Some(namespace) => write!(f, "#<refinement:{}@{}>", refined, namespace),
                None => write!(f, "#<refinement:{}>", refined),
            },
            ModuleKind::Module => write!(f, "#<Module:0x{:016x}>", self.id),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Module({})", self)
    }
}
