use std::sync::Arc;

use crate::module::ModuleRef;

/// One level of lexical nesting: the module whose body encloses some code.
///
/// Scopes form a parent-linked list ending at the root scope, whose live module is `Object`.
#[derive(Debug)]
pub struct LexicalScope {
    parent: Option<Arc<LexicalScope>>,
    live_module: ModuleRef,
}

impl LexicalScope {
    /// The toplevel scope.
    pub fn root(object_class: ModuleRef) -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            live_module: object_class,
        })
    }

    /// A scope nested in `parent`, for the body of `module`.
    pub fn new(parent: &Arc<Self>, module: ModuleRef) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            live_module: module,
        })
    }

    pub fn parent(&self) -> Option<&Arc<LexicalScope>> {
        self.parent.as_ref()
    }

    pub fn live_module(&self) -> &ModuleRef {
        &self.live_module
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The enclosing modules, innermost first, without the root scope.
    pub fn nesting(&self) -> Vec<ModuleRef> {
        let mut modules = Vec::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.is_root() {
                break;
            }
            modules.push(current.live_module.clone());
            scope = current.parent.as_deref();
        }
        modules
    }
}
