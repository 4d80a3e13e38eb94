use std::fmt;

/// The visibility of a method or of a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Callable from anywhere.
    Public,
    /// Callable with an explicit receiver only from within the declaring module's hierarchy.
    Protected,
    /// Callable with an implicit receiver only.
    Private,
    /// Private in the module, public in its singleton class.
    ModuleFunction,
}

impl Visibility {
    /// Whether this visibility forbids explicit receivers.
    pub fn is_private(self) -> bool {
        matches!(self, Self::Private | Self::ModuleFunction)
    }

    pub fn is_protected(self) -> bool {
        self == Self::Protected
    }

    pub fn is_public(self) -> bool {
        self == Self::Public
    }

    /// The keyword used to select this visibility in a module body.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
            Self::ModuleFunction => "module_function",
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Public
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Whether a method with this name is made private whatever the current default visibility is.
pub fn is_method_private_from_name(name: &str) -> bool {
    matches!(
        name,
        "initialize"
            | "initialize_copy"
            | "initialize_clone"
            | "initialize_dup"
            | "respond_to_missing?"
    )
}
