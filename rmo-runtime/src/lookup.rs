//!
//! Method resolution.
//!
//! Lookups walk the ancestors of a module, consulting the refinements a declaration context
//! activates for each ancestor before the ancestor's own method table. The cached variants
//! report one [`Assumption`] per method table they inspected.
//!

use std::sync::Arc;

use indexmap::IndexMap;
use rmo_core::{Interned, Visibility};

use crate::assumption::{self, Assumption};
use crate::chain::ChainItem;
use crate::declaration::{DeclarationContext, Refinements};
use crate::method::InternalMethod;
use crate::module::{Module, ModuleRef};

/// The outcome of a cached method lookup.
#[derive(Debug, Clone)]
pub struct MethodLookupResult {
    method: Option<InternalMethod>,
    assumptions: Vec<Assumption>,
}

impl MethodLookupResult {
    /// The method found, possibly an undefined one.
    pub fn method(&self) -> Option<&InternalMethod> {
        self.method.as_ref()
    }

    pub fn into_method(self) -> Option<InternalMethod> {
        self.method
    }

    /// Whether a method was found and is not undefined.
    pub fn is_defined(&self) -> bool {
        self.method
            .as_ref()
            .map_or(false, |method| !method.is_undefined())
    }

    pub fn assumptions(&self) -> &[Assumption] {
        &self.assumptions
    }

    /// Whether this result still reflects the method tables it was computed from.
    pub fn is_valid(&self) -> bool {
        assumption::all_valid(&self.assumptions)
    }
}

fn is_boundary(lookup_to: Option<&Module>, ancestor: &ModuleRef) -> bool {
    lookup_to.map_or(false, |boundary| std::ptr::eq(Arc::as_ptr(ancestor), boundary))
}

fn lookup_method_in(
    module: &Module,
    lookup_to: Option<&Module>,
    name: Interned,
    context: Option<&Arc<DeclarationContext>>,
    mut assumptions: Option<&mut Vec<Assumption>>,
) -> Option<InternalMethod> {
    for ancestor in module.ancestors() {
        if is_boundary(lookup_to, &ancestor) {
            return None;
        }

        if let Some(context) = context {
            if let Some(refinements) = context.refinements_for(&ancestor) {
                // With R1.ancestors = [R1, A, C] and R2.ancestors = [R2, B, C] active for C,
                // the search goes R2 -> B -> R1 -> A before C itself.
                for refinement in refinements.iter() {
                    let refined = lookup_method_in(
                        refinement,
                        Some(&*ancestor),
                        name,
                        None,
                        assumptions.as_deref_mut(),
                    );
                    if let Some(method) = refined.filter(|method| !method.is_undefined()) {
                        return Some(method.with_active_refinements(context));
                    }
                }
            }
        }

        if let Some(assumptions) = assumptions.as_deref_mut() {
            assumptions.push(ancestor.methods_assumption());
        }
        if let Some(method) = ancestor.get_method(name) {
            return Some(method);
        }
    }

    None
}

/// Look `name` up from `module`, recording the method tables inspected.
pub fn lookup_method_cached(
    module: &Module,
    name: Interned,
    context: Option<&Arc<DeclarationContext>>,
) -> MethodLookupResult {
    let mut assumptions = Vec::new();
    let method = lookup_method_in(module, None, name, context, Some(&mut assumptions));
    MethodLookupResult {
        method,
        assumptions,
    }
}

/// Look `name` up from `module` without tracking assumptions.
pub fn lookup_method_uncached(
    module: &Module,
    name: Interned,
    context: Option<&Arc<DeclarationContext>>,
) -> Option<InternalMethod> {
    lookup_method_in(module, None, name, context, None)
}

/// Look `name` up from `module`, stopping before `lookup_to`.
pub fn lookup_method_up_to(
    module: &Module,
    lookup_to: &Module,
    name: Interned,
    context: Option<&Arc<DeclarationContext>>,
) -> Option<InternalMethod> {
    lookup_method_in(module, Some(lookup_to), name, context, None)
}

/// A defined method with exactly the given visibility.
pub fn lookup_method_with_visibility(
    module: &Module,
    name: Interned,
    visibility: Visibility,
) -> Option<InternalMethod> {
    lookup_method_uncached(module, name, None)
        .filter(|method| !method.is_undefined() && method.visibility() == visibility)
}

/// Look up the method a `super` call in `current` reaches, for a receiver whose method lookups
/// start at `metaclass`.
///
/// The search resumes after the module declaring `current`, under the refinements of the
/// method's declaration context merged with the ones active when it was looked up.
pub fn lookup_super_method(current: &InternalMethod, metaclass: &Module) -> MethodLookupResult {
    let mut search = SuperSearch {
        declaring_module: current.declaring_module(),
        name: current.original_name(),
        is_refined_method: current.declaring_module().is_refinement(),
        found_declaring_module: false,
        assumptions: Vec::new(),
    };
    let method = search.walk(
        metaclass,
        None,
        Some(current.declaration_context()),
        current.active_refinements(),
    );
    MethodLookupResult {
        method,
        assumptions: search.assumptions,
    }
}

struct SuperSearch<'a> {
    declaring_module: &'a ModuleRef,
    name: Interned,
    is_refined_method: bool,
    found_declaring_module: bool,
    assumptions: Vec<Assumption>,
}

impl SuperSearch<'_> {
    fn walk(
        &mut self,
        start: &Module,
        lookup_to: Option<&Module>,
        lexical: Option<&Arc<DeclarationContext>>,
        caller: Option<&Arc<DeclarationContext>>,
    ) -> Option<InternalMethod> {
        for ancestor in start.ancestors() {
            if is_boundary(lookup_to, &ancestor) {
                return None;
            }

            if let Some(refinements) = merged_refinements(lexical, caller, &ancestor) {
                for refinement in refinements.iter() {
                    let found = self
                        .walk(refinement, Some(&*ancestor), None, None)
                        .filter(|method| !method.is_undefined());
                    if let Some(method) = found {
                        return Some(remember_used_refinements(
                            &method,
                            lexical,
                            &refinements,
                            &ancestor,
                        ));
                    }
                    if self.found_declaring_module && self.is_refined_method {
                        // A method of a refinement only supers into that refinement.
                        break;
                    }
                }
            }

            if !self.found_declaring_module {
                if Arc::ptr_eq(&ancestor, self.declaring_module) {
                    self.found_declaring_module = true;
                }
            } else {
                self.assumptions.push(ancestor.methods_assumption());
                if let Some(method) = ancestor.get_method(self.name) {
                    return Some(method);
                }
            }
        }

        None
    }
}

/// Refinements of `module` active for a `super` call: the ones of the method's own declaration
/// context first, then those only the caller activated.
fn merged_refinements(
    lexical: Option<&Arc<DeclarationContext>>,
    caller: Option<&Arc<DeclarationContext>>,
    module: &ModuleRef,
) -> Option<Arc<[ModuleRef]>> {
    let lexical_refinements = lexical.and_then(|context| context.refinements_for(module));
    let caller_refinements = caller.and_then(|context| context.refinements_for(module));

    match (lexical_refinements, caller_refinements) {
        (None, None) => None,
        (Some(refinements), None) | (None, Some(refinements)) => Some(Arc::clone(refinements)),
        (Some(lexical), Some(caller)) => {
            if Arc::ptr_eq(lexical, caller) {
                return Some(Arc::clone(lexical));
            }
            let mut merged: Vec<ModuleRef> = lexical.to_vec();
            for refinement in caller.iter() {
                if !lexical.iter().any(|known| Arc::ptr_eq(known, refinement)) {
                    merged.push(refinement.clone());
                }
            }
            Some(Arc::from(merged))
        }
    }
}

fn remember_used_refinements(
    method: &InternalMethod,
    lexical: Option<&Arc<DeclarationContext>>,
    refinements: &Arc<[ModuleRef]>,
    ancestor: &ModuleRef,
) -> InternalMethod {
    let context = lexical.cloned().unwrap_or_else(DeclarationContext::none);
    let mut current: Refinements = context.refinements().clone();
    current.insert(ancestor.clone(), Arc::clone(refinements));
    method.with_active_refinements(&context.with_refinements(current))
}

/// Whether `method` may be bound to instances of `module`.
pub fn can_bind_method_to(method: &InternalMethod, module: &Module) -> bool {
    let origin = method.declaring_module();
    if !origin.is_class() {
        // Methods of modules bind to anything.
        return true;
    }
    match module.refined_module() {
        Some(refined) => refined.is_class() && refined.includes_module(origin),
        None => module.is_class() && module.includes_module(origin),
    }
}

fn collect_methods(methods: &mut IndexMap<Interned, InternalMethod>, module: &Module) {
    for method in module.methods() {
        methods.entry(method.name()).or_insert(method);
    }
}

/// Every method visible from `module`, first definition wins; refinements also see the methods
/// of the refined module.
pub fn get_all_methods(module: &Module) -> IndexMap<Interned, InternalMethod> {
    let mut methods = IndexMap::new();
    for ancestor in module.ancestors() {
        collect_methods(&mut methods, &ancestor);
    }
    if let Some(refined) = module.refined_module() {
        for ancestor in refined.ancestors() {
            collect_methods(&mut methods, &ancestor);
        }
    }
    methods
}

fn is_logical_class(module: &Module) -> bool {
    module.is_class() && !module.is_singleton_class()
}

/// Methods of the ancestors preceding the first logical class (and its prepended modules).
pub fn get_methods_before_logical_class(module: &Module) -> IndexMap<Interned, InternalMethod> {
    let mut methods = IndexMap::new();
    for item in module.links() {
        match item {
            ChainItem::PrependMarker { origin } => {
                if is_logical_class(&origin) {
                    break;
                }
            }
            ChainItem::Module(ancestor) => {
                if is_logical_class(&ancestor) {
                    break;
                }
                collect_methods(&mut methods, &ancestor);
            }
        }
    }
    methods
}

/// Methods of the ancestors up to and including the first logical class.
pub fn get_methods_until_logical_class(module: &Module) -> IndexMap<Interned, InternalMethod> {
    let mut methods = IndexMap::new();
    for ancestor in module.ancestors() {
        collect_methods(&mut methods, &ancestor);
        if is_logical_class(&ancestor) {
            break;
        }
    }
    methods
}

pub fn without_undefined_methods(
    methods: IndexMap<Interned, InternalMethod>,
) -> IndexMap<Interned, InternalMethod> {
    methods
        .into_iter()
        .filter(|(_, method)| !method.is_undefined())
        .collect()
}
