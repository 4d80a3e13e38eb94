use std::result;

use thiserror::Error;

/// The kind of a [`RubyError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NameError,
    NoMethodError,
    TypeError,
    ArgumentError,
    FrozenError,
    SecurityError,
}

/// An error raised by the module runtime.
///
/// A negative lookup is never an error: lookups return `Option`s or results with a
/// "not found" state, and only the operations that require a binding raise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RubyError {
    /// Reference to an undefined constant, method or class variable, or a badly-formed name.
    #[error("{message}")]
    NameError { message: String, name: String },
    /// Call of a method that is undefined or not visible from the call site.
    #[error("{message}")]
    NoMethodError { message: String, name: String },
    /// An argument of the wrong kind.
    #[error("{0}")]
    TypeError(String),
    /// An argument with the right kind but an unacceptable value.
    #[error("{0}")]
    ArgumentError(String),
    /// Mutation of a frozen module.
    #[error("{0}")]
    FrozenError(String),
    /// Mutation of a sealed module.
    #[error("{0}")]
    SecurityError(String),
}

pub type Result<T, E = RubyError> = result::Result<T, E>;

impl RubyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NameError { .. } => ErrorKind::NameError,
            Self::NoMethodError { .. } => ErrorKind::NoMethodError,
            Self::TypeError(_) => ErrorKind::TypeError,
            Self::ArgumentError(_) => ErrorKind::ArgumentError,
            Self::FrozenError(_) => ErrorKind::FrozenError,
            Self::SecurityError(_) => ErrorKind::SecurityError,
        }
    }

    /// Whether this error is a `NameError` or one of its sub-kinds.
    pub fn is_name_error(&self) -> bool {
        matches!(self, Self::NameError { .. } | Self::NoMethodError { .. })
    }

    /// The offending name, for name errors.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::NameError { name, .. } | Self::NoMethodError { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn name_error(message: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NameError {
            message: message.into(),
            name: name.into(),
        }
    }

    pub fn no_method_error(message: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NoMethodError {
            message: message.into(),
            name: name.into(),
        }
    }

    pub fn wrong_constant_name(name: &str) -> Self {
        Self::name_error(format!("wrong constant name {}", name), name)
    }

    pub fn uninitialized_constant(qualified_name: &str, name: &str) -> Self {
        Self::name_error(format!("uninitialized constant {}", qualified_name), name)
    }

    pub fn constant_not_defined(qualified_name: &str, name: &str) -> Self {
        Self::name_error(format!("constant {} not defined", qualified_name), name)
    }

    pub fn undefined_method(name: &str, module: &str) -> Self {
        Self::name_error(format!("undefined method `{}' for {}", name, module), name)
    }

    pub fn method_not_defined_in(name: &str, module: &str) -> Self {
        Self::name_error(format!("method `{}' not defined in {}", name, module), name)
    }

    pub fn uninitialized_class_variable(name: &str, module: &str) -> Self {
        Self::name_error(
            format!("uninitialized class variable {} in {}", name, module),
            name,
        )
    }

    pub fn class_variable_not_defined(name: &str, module: &str) -> Self {
        Self::name_error(
            format!("class variable {} not defined for {}", name, module),
            name,
        )
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    pub fn argument_error(message: impl Into<String>) -> Self {
        Self::ArgumentError(message.into())
    }
}
