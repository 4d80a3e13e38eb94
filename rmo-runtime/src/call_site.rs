//!
//! Inline caches for call sites.
//!
//! A [`CallSiteCache`] remembers, per receiver class, the result of a method lookup made under a
//! fixed declaration context. Entries are reused while their assumptions hold and recomputed
//! otherwise. Past the configured number of receiver classes the site goes megamorphic and stops
//! caching.
//!

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use rmo_core::Interned;

use crate::declaration::DeclarationContext;
use crate::error::{Result, RubyError};
use crate::lookup::{self, MethodLookupResult};
use crate::module::ModuleRef;
use crate::universe::Universe;
use crate::value::Value;

#[derive(Debug, Clone)]
struct CacheEntry {
    receiver_class: ModuleRef,
    result: MethodLookupResult,
}

/// The cache of one call site (`receiver.name(...)` at some place in the code).
pub struct CallSiteCache {
    name: Interned,
    context: Arc<DeclarationContext>,
    entries: ArcSwap<Vec<CacheEntry>>,
    limit: usize,
    megamorphic: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CallSiteCache {
    pub fn new(universe: &Universe, name: &str, context: Arc<DeclarationContext>) -> Self {
        Self {
            name: universe.intern(name),
            context,
            entries: ArcSwap::from_pointee(Vec::new()),
            limit: universe.options().method_cache_limit,
            megamorphic: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> Interned {
        self.name
    }

    /// Resolve the method called at this site for `receiver`.
    pub fn lookup(&self, universe: &Universe, receiver: &Value) -> MethodLookupResult {
        let metaclass = universe.metaclass_of(receiver);

        let entries = self.entries.load();
        let cached = entries
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.receiver_class, &metaclass));
        if let Some(entry) = cached {
            if entry.result.is_valid() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return entry.result.clone();
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let result = lookup::lookup_method_cached(&metaclass, self.name, Some(&self.context));
        if self.is_megamorphic() || !result.is_valid() {
            return result;
        }

        let limit = self.limit;
        let mut overflowed = false;
        self.entries.rcu(|entries| {
            let mut updated: Vec<CacheEntry> = entries
                .iter()
                .filter(|entry| {
                    !Arc::ptr_eq(&entry.receiver_class, &metaclass) && entry.result.is_valid()
                })
                .cloned()
                .collect();
            overflowed = updated.len() >= limit;
            if overflowed {
                updated.clear();
            } else {
                updated.push(CacheEntry {
                    receiver_class: metaclass.clone(),
                    result: result.clone(),
                });
            }
            updated
        });

        if overflowed && !self.megamorphic.swap(true, Ordering::AcqRel) {
            tracing::debug!(
                "call site for `{}' went megamorphic",
                universe.lookup_symbol(self.name)
            );
        }
        result
    }

    /// Perform the call on `receiver` from toplevel code.
    pub fn call(&self, universe: &Universe, receiver: Value, args: &[Value]) -> Result<Value> {
        let result = self.lookup(universe, &receiver);
        let name = universe.lookup_symbol(self.name);
        match result.into_method() {
            Some(method) if !method.is_undefined() => {
                if !method.is_visible_to(&universe.object_class()) {
                    return Err(universe.visibility_error(&method, &receiver, &name));
                }
                universe.invoke(&method, receiver, args)
            }
            _ => Err(RubyError::no_method_error(
                format!(
                    "undefined method `{}' for {}",
                    name,
                    universe.describe(&receiver)
                ),
                &*name,
            )),
        }
    }

    /// The number of receiver classes currently cached.
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_megamorphic(&self) -> bool {
        self.megamorphic.load(Ordering::Acquire)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
