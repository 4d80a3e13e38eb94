//!
//! Ancestor chains.
//!
//! Each module publishes an immutable [`ModuleChain`]: its own links (prepended modules, the
//! module itself and its included modules, flattened at inclusion time) followed by a parent
//! whose live chain continues the linearization (the superclass of a class, the refined module
//! of a refinement). Readers walk a snapshot without locking; `include` and `prepend` build a
//! new chain under the module's chain lock and swap it in.
//!

use std::collections::HashSet;
use std::sync::{Arc, PoisonError};

use crate::error::{Result, RubyError};
use crate::module::{Module, ModuleRef};

/// One link of a module's own chain.
#[derive(Debug, Clone)]
pub enum ChainLink {
    /// Marks that the modules up to [`ChainLink::Origin`] were prepended.
    PrependMarker,
    /// The module owning the chain.
    Origin,
    /// A prepended or included module.
    Module(ModuleRef),
}

/// The published chain of one module.
#[derive(Debug, Clone)]
pub struct ModuleChain {
    pub(crate) links: Vec<ChainLink>,
    pub(crate) parent: Option<ModuleRef>,
}

impl ModuleChain {
    pub(crate) fn new(parent: Option<ModuleRef>) -> Self {
        Self {
            links: vec![ChainLink::Origin],
            parent,
        }
    }

    fn origin_index(&self) -> usize {
        self.links
            .iter()
            .position(|link| matches!(link, ChainLink::Origin))
            .unwrap_or(0)
    }

    fn position_of(&self, module: &Module) -> Option<usize> {
        self.links.iter().position(|link| match link {
            ChainLink::Module(linked) => std::ptr::eq(Arc::as_ptr(linked), module),
            _ => false,
        })
    }

    pub fn has_prepends(&self) -> bool {
        matches!(self.links.first(), Some(ChainLink::PrependMarker))
    }
}

/// An item of a chain walk: a marker or a module.
#[derive(Debug, Clone)]
pub enum ChainItem {
    /// Entering the prepended modules of `origin`.
    PrependMarker { origin: ModuleRef },
    Module(ModuleRef),
}

/// Walk over chain items, markers included.
#[derive(Clone)]
pub struct Links {
    current: Option<(ModuleRef, Arc<ModuleChain>)>,
    index: usize,
}

impl Links {
    fn new(module: ModuleRef) -> Self {
        let chain = module.chain.load_full();
        Self {
            current: Some((module, chain)),
            index: 0,
        }
    }
}

impl Iterator for Links {
    type Item = ChainItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (owner, chain) = self.current.as_ref()?;
            if let Some(link) = chain.links.get(self.index) {
                self.index += 1;
                return Some(match link {
                    ChainLink::PrependMarker => ChainItem::PrependMarker {
                        origin: owner.clone(),
                    },
                    ChainLink::Origin => ChainItem::Module(owner.clone()),
                    ChainLink::Module(module) => ChainItem::Module(module.clone()),
                });
            }
            let parent = chain.parent.clone();
            self.current = parent.map(|parent| {
                let chain = parent.chain.load_full();
                (parent, chain)
            });
            self.index = 0;
        }
    }
}

/// The linearized ancestors of a module, starting with the module itself (or its prepended
/// modules).
///
/// A module reachable through several chains (mixed into both a class and its superclass) is
/// only yielded at its first position.
#[derive(Clone)]
pub struct Ancestors {
    links: Links,
    seen: HashSet<u64>,
}

impl Iterator for Ancestors {
    type Item = ModuleRef;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.links.next()? {
                ChainItem::PrependMarker { .. } => continue,
                ChainItem::Module(module) => {
                    if self.seen.insert(module.id()) {
                        return Some(module);
                    }
                }
            }
        }
    }
}

impl Module {
    /// Walk the ancestors of this module.
    ///
    /// The walk reads the chains as published when each module is reached; it is finite and can
    /// be restarted by cloning the iterator.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            links: self.links(),
            seen: HashSet::new(),
        }
    }

    /// Walk the ancestors of this module, with prepend markers.
    pub fn links(&self) -> Links {
        match self.self_ref() {
            Some(module) => Links::new(module),
            None => Links {
                current: None,
                index: 0,
            },
        }
    }

    /// The modules mixed into this module's own chain (prepended first), without itself.
    pub fn prepended_and_included_modules(&self) -> Vec<ModuleRef> {
        self.chain
            .load()
            .links
            .iter()
            .filter_map(|link| match link {
                ChainLink::Module(module) => Some(module.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every non-class ancestor except this module itself.
    pub fn included_modules(&self) -> Vec<ModuleRef> {
        self.ancestors()
            .filter(|ancestor| !ancestor.is_class() && !std::ptr::eq(Arc::as_ptr(ancestor), self))
            .collect()
    }

    /// Mix `module` (and its own ancestors) in right after this module.
    pub fn include(&self, module: &ModuleRef) -> Result<()> {
        self.check_frozen()?;
        check_mixin(module)?;
        if module.includes_module(self) {
            return Err(RubyError::argument_error("cyclic include detected"));
        }

        let _guard = self.chain_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut chain = ModuleChain::clone(&self.chain.load());
        let mut insertion = chain.origin_index() + 1;
        let mut pending: Vec<ModuleRef> = Vec::new();
        let mut changed = false;

        for ancestor in module.ancestors() {
            match chain.position_of(&ancestor) {
                Some(index) if index > chain.origin_index() => {
                    // Already included: the rest goes after it.
                    changed |= flush_pending(&mut chain, insertion, &mut pending);
                    insertion = chain.position_of(&ancestor).unwrap_or(index) + 1;
                }
                Some(_) => {}
                None if is_in_parent_chain(&chain, &ancestor) => {}
                None => pending.push(ancestor),
            }
        }
        changed |= flush_pending(&mut chain, insertion, &mut pending);

        if changed {
            self.chain.store(Arc::new(chain));
            self.methods_token.invalidate();
            self.constants_token.invalidate();
            tracing::debug!(module = %self, included = %module, "included module");
        }
        Ok(())
    }

    /// Mix `module` (and its own ancestors) in before this module.
    pub fn prepend(&self, module: &ModuleRef) -> Result<()> {
        self.check_frozen()?;
        check_mixin(module)?;
        if module.includes_module(self) {
            return Err(RubyError::argument_error("cyclic prepend detected"));
        }

        let _guard = self.chain_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut chain = ModuleChain::clone(&self.chain.load());
        let mut changed = false;
        if !chain.has_prepends() {
            chain.links.insert(0, ChainLink::PrependMarker);
        }

        let mut cursor = 0;
        for item in module.links() {
            let ancestor = match item {
                ChainItem::PrependMarker { .. } => continue,
                ChainItem::Module(ancestor) => ancestor,
            };
            if ancestor.is_class() {
                break;
            }
            match chain.position_of(&ancestor) {
                Some(index) if index < chain.origin_index() => cursor = index,
                Some(_) => {}
                None => {
                    cursor += 1;
                    chain.links.insert(cursor, ChainLink::Module(ancestor));
                    changed = true;
                }
            }
        }

        if changed {
            self.chain.store(Arc::new(chain));
            self.methods_token.invalidate();
            self.constants_token.invalidate();
            tracing::debug!(module = %self, prepended = %module, "prepended module");
        }
        Ok(())
    }
}

fn check_mixin(module: &Module) -> Result<()> {
    if module.is_class() {
        return Err(RubyError::type_error(
            "wrong argument type Class (expected Module)",
        ));
    }
    Ok(())
}

fn is_in_parent_chain(chain: &ModuleChain, module: &Module) -> bool {
    chain
        .parent
        .as_ref()
        .map_or(false, |parent| parent.includes_module(module))
}

fn flush_pending(chain: &mut ModuleChain, at: usize, pending: &mut Vec<ModuleRef>) -> bool {
    if pending.is_empty() {
        return false;
    }
    let links = pending.drain(..).map(ChainLink::Module);
    chain.links.splice(at..at, links);
    true
}
