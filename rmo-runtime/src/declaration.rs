//!
//! A declaration context is the bundle of state a `def` or a call site sees at some point in
//! the source: the default visibility of new methods, where unqualified definitions land, and
//! the refinements activated by `using`.
//!

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rmo_core::Visibility;

use crate::error::Result;
use crate::lexical_scope::LexicalScope;
use crate::module::{ModuleKind, ModuleRef};
use crate::universe::Universe;
use crate::value::Value;

/// Active refinements, keyed by refined module, most recently activated first.
pub type Refinements = HashMap<ModuleRef, Arc<[ModuleRef]>>;

static NONE: Lazy<Arc<DeclarationContext>> = Lazy::new(|| {
    Arc::new(DeclarationContext {
        visibility: Visibility::Public,
        default_definee: DefaultDefinee::LexicalScope,
        refinements: Arc::new(Refinements::new()),
    })
});

/// Where a `def` without an explicit receiver defines its method.
#[derive(Debug, Clone)]
pub enum DefaultDefinee {
    /// The innermost enclosing class or module body.
    LexicalScope,
    /// The singleton class of `self` (`instance_eval`).
    SingletonClass,
    /// `self` when it is a module (`class_eval`), its class otherwise.
    SelfValue,
    /// Always this module (refinement bodies).
    Fixed(ModuleRef),
}

impl DefaultDefinee {
    fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::LexicalScope, Self::LexicalScope) => true,
            (Self::SingletonClass, Self::SingletonClass) => true,
            (Self::SelfValue, Self::SelfValue) => true,
            (Self::Fixed(a), Self::Fixed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Immutable declaration state; every change produces a new context.
#[derive(Debug, Clone)]
pub struct DeclarationContext {
    pub visibility: Visibility,
    pub default_definee: DefaultDefinee,
    refinements: Arc<Refinements>,
}

impl DeclarationContext {
    /// The context of toplevel code: public, lexical definee, no refinements.
    pub fn none() -> Arc<Self> {
        Arc::clone(&NONE)
    }

    pub fn new(visibility: Visibility, default_definee: DefaultDefinee) -> Arc<Self> {
        Arc::new(Self {
            visibility,
            default_definee,
            refinements: Arc::new(Refinements::new()),
        })
    }

    pub fn with_visibility(self: &Arc<Self>, visibility: Visibility) -> Arc<Self> {
        if visibility == self.visibility {
            return Arc::clone(self);
        }
        Arc::new(Self {
            visibility,
            default_definee: self.default_definee.clone(),
            refinements: Arc::clone(&self.refinements),
        })
    }

    pub fn with_default_definee(self: &Arc<Self>, default_definee: DefaultDefinee) -> Arc<Self> {
        if default_definee.is_same(&self.default_definee) {
            return Arc::clone(self);
        }
        Arc::new(Self {
            visibility: self.visibility,
            default_definee,
            refinements: Arc::clone(&self.refinements),
        })
    }

    pub fn with_refinements(self: &Arc<Self>, refinements: Refinements) -> Arc<Self> {
        Arc::new(Self {
            visibility: self.visibility,
            default_definee: self.default_definee.clone(),
            refinements: Arc::new(refinements),
        })
    }

    pub fn refinements(&self) -> &Refinements {
        &self.refinements
    }

    pub fn has_refinements(&self) -> bool {
        !self.refinements.is_empty()
    }

    /// The refinements active for `module`, in lookup order.
    pub fn refinements_for(&self, module: &ModuleRef) -> Option<&Arc<[ModuleRef]>> {
        self.refinements.get(module)
    }

    /// The namespaces whose refinements are active, without duplicates.
    pub fn used_modules(&self) -> Vec<ModuleRef> {
        let mut modules: Vec<ModuleRef> = Vec::new();
        for refinement in self.refinements.values().flat_map(|list| list.iter()) {
            if let ModuleKind::Refinement { namespace, .. } = &refinement.kind {
                if let Some(namespace) = namespace.upgrade() {
                    if !modules.iter().any(|module| Arc::ptr_eq(module, &namespace)) {
                        modules.push(namespace);
                    }
                }
            }
        }
        modules
    }

    /// Every active refinement module, without duplicates.
    pub fn used_refinements(&self) -> Vec<ModuleRef> {
        let mut refinements: Vec<ModuleRef> = Vec::new();
        for refinement in self.refinements.values().flat_map(|list| list.iter()) {
            if !refinements.iter().any(|known| Arc::ptr_eq(known, refinement)) {
                refinements.push(refinement.clone());
            }
        }
        refinements
    }

    /// Resolve the module an unqualified `def` executed with `self_value` would define into.
    pub fn resolve_definee(
        &self,
        universe: &Universe,
        lexical_scope: &LexicalScope,
        self_value: &Value,
    ) -> Result<ModuleRef> {
        match &self.default_definee {
            DefaultDefinee::LexicalScope => Ok(lexical_scope.live_module().clone()),
            DefaultDefinee::SingletonClass => universe.singleton_class_of(self_value),
            DefaultDefinee::SelfValue => match self_value {
                Value::Module(module) => Ok(module.clone()),
                other => Ok(universe.class_of(other)),
            },
            DefaultDefinee::Fixed(module) => Ok(module.clone()),
        }
    }
}

