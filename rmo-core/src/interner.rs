//!
//! This is an implementation of a string interner.
//!
//! It brings down the memory usage of names and allows for fast comparisons by replacing them by essentially an ID.
//!
//! The layout follows [matklad's "Fast and Simple Rust Interner" blog post](https://matklad.github.io/2020/03/22/fast-simple-rust-interner.html),
//! with the table behind a lock so that several threads can intern names into the same universe.
//!

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An interned string.
///
/// This is fast to move, clone and compare.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Interned(pub u32);

#[derive(Debug, Default)]
struct Table {
    map: HashMap<Arc<str>, u32>,
    vec: Vec<Arc<str>>,
}

/// A string interner.
///
/// Interning takes the write lock only for names that were never seen before.
#[derive(Debug, Default)]
pub struct Interner {
    table: RwLock<Table>,
}

impl Interner {
    /// Initialize the interner with an initial capacity.
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.next_power_of_two();
        Self {
            table: RwLock::new(Table {
                map: HashMap::with_capacity(cap),
                vec: Vec::with_capacity(cap),
            }),
        }
    }

    /// Intern a given string.
    pub fn intern(&self, name: &str) -> Interned {
        if let Some(&id) = self.read().map.get(name) {
            return Interned(id);
        }

        let mut table = self.write();
        // Another thread may have interned it between both locks.
        if let Some(&id) = table.map.get(name) {
            return Interned(id);
        }

        let id = table.vec.len() as u32;
        let name: Arc<str> = Arc::from(name);
        table.map.insert(name.clone(), id);
        table.vec.push(name);

        Interned(id)
    }

    /// Get the ID of an already interned string, without interning it.
    pub fn get(&self, name: &str) -> Option<Interned> {
        self.read().map.get(name).copied().map(Interned)
    }

    /// Get the string associated to a given interning ID.
    pub fn lookup(&self, id: Interned) -> Arc<str> {
        self.read()
            .vec
            .get(id.0 as usize)
            .cloned()
            .unwrap_or_else(|| Arc::from("<unknown>"))
    }

    /// The number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.read().vec.len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}
