use std::fmt;
use std::sync::Arc;

use rmo_core::Interned;

use crate::instance::ObjectRef;
use crate::module::ModuleRef;
use crate::universe::Universe;

/// Represents a runtime value.
#[derive(Clone)]
pub enum Value {
    /// The **nil** value.
    Nil,
    /// A boolean value (**true** or **false**).
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// An interned symbol value.
    Symbol(Interned),
    /// An immutable string value.
    String(Arc<str>),
    /// A class or module.
    Module(ModuleRef),
    /// A plain object.
    Object(ObjectRef),
}

impl Value {
    pub const NIL: Self = Self::Nil;
    pub const TRUE: Self = Self::Boolean(true);
    pub const FALSE: Self = Self::Boolean(false);

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Whether this value is neither **nil** nor **false**.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Boolean(false))
    }

    #[inline]
    pub fn as_module(&self) -> Option<&ModuleRef> {
        match self {
            Self::Module(module) => Some(module),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Get the logical class of the current value (singleton classes are skipped).
    pub fn class(&self, universe: &Universe) -> ModuleRef {
        universe.class_of(self)
    }

    /// Get the class that method lookups on this value start from.
    pub fn metaclass(&self, universe: &Universe) -> ModuleRef {
        universe.metaclass_of(self)
    }

    /// Whether both values are the same object.
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::String(a), Self::String(b)) => Arc::ptr_eq(a, b),
            (Self::Module(a), Self::Module(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            _ => self.is_identical(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Boolean(value) => write!(f, "{}", value),
            Self::Integer(value) => write!(f, "{}", value),
            Self::Symbol(symbol) => write!(f, "Symbol({})", symbol.0),
            Self::String(value) => write!(f, "{:?}", value),
            Self::Module(module) => write!(f, "{}", module),
            Self::Object(object) => write!(f, "#<{}:{}>", object.class(), object.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<ModuleRef> for Value {
    fn from(module: ModuleRef) -> Self {
        Self::Module(module)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Self::Object(object)
    }
}
