//!
//! This crate contains the small vocabulary types shared by every part of the module runtime.
//!

/// Validity rules for constant, variable and method names.
pub mod identifiers;
/// Facilities for name interning.
pub mod interner;
/// Method and constant visibilities.
pub mod visibility;

pub use crate::interner::{Interned, Interner};
pub use crate::visibility::Visibility;
