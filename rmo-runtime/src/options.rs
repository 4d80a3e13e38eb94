use std::env;
use std::str::FromStr;

/// Tunables of a [`Universe`](crate::universe::Universe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseOptions {
    /// How many receiver classes a call-site cache remembers before giving up on caching.
    pub method_cache_limit: usize,
    /// Whether reassigning an initialized constant logs a warning.
    pub warn_on_constant_redefinition: bool,
    /// Whether the core library is considered loaded (methods defined before are built-ins).
    pub core_loaded: bool,
}

impl Default for UniverseOptions {
    fn default() -> Self {
        Self {
            method_cache_limit: 8,
            warn_on_constant_redefinition: true,
            core_loaded: true,
        }
    }
}

impl UniverseOptions {
    /// The defaults, overridden by `RMO_METHOD_CACHE_LIMIT` and `RMO_WARN_CONSTANT_REDEFINITION`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(limit) = read_env("RMO_METHOD_CACHE_LIMIT") {
            options.method_cache_limit = limit;
        }
        if let Some(warn) = read_env("RMO_WARN_CONSTANT_REDEFINITION") {
            options.warn_on_constant_redefinition = warn;
        }
        options
    }

    pub fn with_method_cache_limit(mut self, limit: usize) -> Self {
        self.method_cache_limit = limit;
        self
    }

    pub fn with_constant_redefinition_warnings(mut self, warn: bool) -> Self {
        self.warn_on_constant_redefinition = warn;
        self
    }

    pub fn with_core_loaded(mut self, loaded: bool) -> Self {
        self.core_loaded = loaded;
        self
    }
}

fn read_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable option");
            None
        }
    }
}
