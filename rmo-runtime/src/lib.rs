//!
//! This is the object/module model of the runtime.
//!
//! It owns every class and module of a universe, resolves methods and constants through
//! their ancestor chains (honoring refinements), and hands out invalidation assumptions
//! so that call sites can cache the outcome of a lookup.
//!

/// Invalidation tokens and the assumptions derived from them.
pub mod assumption;
/// Per-site polymorphic method caches.
pub mod call_site;
/// Ancestor chains and their linearization.
pub mod chain;
/// Class variable resolution.
pub mod class_variable;
/// Constant bindings and autoload state.
pub mod constant;
/// Constant resolution.
pub mod constant_lookup;
/// Declaration contexts (default visibility, definee and active refinements).
pub mod declaration;
/// Method definition, removal and visibility changes.
pub mod definition;
/// The error kinds raised by the runtime.
pub mod error;
/// Invocation of resolved methods.
pub mod frame;
/// Facilities for manipulating plain objects.
pub mod instance;
/// Lexical scopes.
pub mod lexical_scope;
/// Subscriber setup for embedders.
pub mod logging;
/// Method resolution.
pub mod lookup;
/// Facilities for manipulating internal methods.
pub mod method;
/// Facilities for manipulating classes and modules.
pub mod module;
/// Tunables of a universe.
pub mod options;
/// Refinement registries and `using`.
pub mod refinement;
/// The collection of all known modules.
pub mod universe;
/// Facilities for manipulating values.
pub mod value;

pub use crate::error::{Result, RubyError};
pub use crate::module::{Module, ModuleRef};
pub use crate::universe::Universe;
pub use crate::value::Value;
pub use rmo_core::{Interned, Visibility};
