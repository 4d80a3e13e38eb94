use std::fmt;
use std::sync::Arc;

use rmo_core::{Interned, Visibility};

use crate::declaration::DeclarationContext;
use crate::error::{Result, RubyError};
use crate::frame::Frame;
use crate::lexical_scope::LexicalScope;
use crate::lookup;
use crate::module::ModuleRef;
use crate::universe::Universe;
use crate::value::Value;

/// The signature of a host-provided method body.
pub type NativeFn = dyn Fn(&Frame<'_>, &[Value]) -> Result<Value> + Send + Sync;

/// A closure, as captured at its creation site.
pub struct RubyProc {
    pub(crate) lexical_scope: Arc<LexicalScope>,
    pub(crate) declaration_context: Arc<DeclarationContext>,
    pub(crate) body: Arc<NativeFn>,
}

impl RubyProc {
    pub fn new(
        lexical_scope: Arc<LexicalScope>,
        declaration_context: Arc<DeclarationContext>,
        body: impl Fn(&Frame<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            lexical_scope,
            declaration_context,
            body: Arc::new(body),
        })
    }

    pub fn lexical_scope(&self) -> &Arc<LexicalScope> {
        &self.lexical_scope
    }

    pub fn declaration_context(&self) -> &Arc<DeclarationContext> {
        &self.declaration_context
    }
}

impl fmt::Debug for RubyProc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RubyProc")
            .field("lexical_scope", &self.lexical_scope.live_module().to_string())
            .finish()
    }
}

/// The callable body of a method.
#[derive(Clone)]
pub enum MethodKind {
    /// A host closure.
    Native(Arc<NativeFn>),
    /// A method made out of a proc (`define_method`).
    Proc(Arc<RubyProc>),
    /// A generated reader for the given instance variable.
    AttrReader(Interned),
    /// A generated writer for the given instance variable.
    AttrWriter(Interned),
    /// A method that exists but cannot be called.
    Unimplemented,
}

impl fmt::Debug for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native"),
            Self::Proc(_) => f.write_str("Proc"),
            Self::AttrReader(ivar) => write!(f, "AttrReader({})", ivar.0),
            Self::AttrWriter(ivar) => write!(f, "AttrWriter({})", ivar.0),
            Self::Unimplemented => f.write_str("Unimplemented"),
        }
    }
}

#[derive(Clone)]
struct MethodData {
    original_name: Interned,
    name: Interned,
    declaring_module: ModuleRef,
    visibility: Visibility,
    lexical_scope: Arc<LexicalScope>,
    declaration_context: Arc<DeclarationContext>,
    active_refinements: Option<Arc<DeclarationContext>>,
    undefined: bool,
    unimplemented: bool,
    built_in: bool,
    kind: MethodKind,
}

/// A method, as stored in a method table.
///
/// Methods are immutable: every `with_*` operation returns a new method (or the same one when
/// nothing changes), so a method obtained from a lookup is never affected by later redefinitions.
#[derive(Clone)]
pub struct InternalMethod(Arc<MethodData>);

impl InternalMethod {
    pub fn new(
        name: Interned,
        declaring_module: ModuleRef,
        visibility: Visibility,
        lexical_scope: Arc<LexicalScope>,
        declaration_context: Arc<DeclarationContext>,
        kind: MethodKind,
    ) -> Self {
        let unimplemented = matches!(kind, MethodKind::Unimplemented);
        Self(Arc::new(MethodData {
            original_name: name,
            name,
            declaring_module,
            visibility,
            lexical_scope,
            declaration_context,
            active_refinements: None,
            undefined: false,
            unimplemented,
            built_in: false,
            kind,
        }))
    }

    fn rebuild(&self, update: impl FnOnce(&mut MethodData)) -> Self {
        let mut data = MethodData::clone(&self.0);
        update(&mut data);
        Self(Arc::new(data))
    }

    /// Whether both handles refer to the very same method value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The name this method was first defined under (aliases keep it).
    pub fn original_name(&self) -> Interned {
        self.0.original_name
    }

    pub fn name(&self) -> Interned {
        self.0.name
    }

    pub fn declaring_module(&self) -> &ModuleRef {
        &self.0.declaring_module
    }

    pub fn visibility(&self) -> Visibility {
        self.0.visibility
    }

    pub fn lexical_scope(&self) -> &Arc<LexicalScope> {
        &self.0.lexical_scope
    }

    pub fn declaration_context(&self) -> &Arc<DeclarationContext> {
        &self.0.declaration_context
    }

    /// The refinements that were active when this method was looked up, if any.
    pub fn active_refinements(&self) -> Option<&Arc<DeclarationContext>> {
        self.0.active_refinements.as_ref()
    }

    pub fn is_undefined(&self) -> bool {
        self.0.undefined
    }

    pub fn is_unimplemented(&self) -> bool {
        self.0.unimplemented
    }

    pub fn is_built_in(&self) -> bool {
        self.0.built_in
    }

    pub fn kind(&self) -> &MethodKind {
        &self.0.kind
    }

    pub fn proc(&self) -> Option<&Arc<RubyProc>> {
        match &self.0.kind {
            MethodKind::Proc(proc) => Some(proc),
            _ => None,
        }
    }

    pub fn with_name(&self, name: Interned) -> Self {
        if name == self.0.name {
            return self.clone();
        }
        self.rebuild(|data| data.name = name)
    }

    pub fn with_visibility(&self, visibility: Visibility) -> Self {
        if visibility == self.0.visibility {
            return self.clone();
        }
        self.rebuild(|data| data.visibility = visibility)
    }

    pub fn with_declaring_module(&self, module: &ModuleRef) -> Self {
        if Arc::ptr_eq(module, &self.0.declaring_module) {
            return self.clone();
        }
        self.rebuild(|data| data.declaring_module = module.clone())
    }

    pub fn with_declaration_context(&self, context: &Arc<DeclarationContext>) -> Self {
        if Arc::ptr_eq(context, &self.0.declaration_context) {
            return self.clone();
        }
        self.rebuild(|data| data.declaration_context = Arc::clone(context))
    }

    pub fn with_active_refinements(&self, context: &Arc<DeclarationContext>) -> Self {
        if let Some(current) = &self.0.active_refinements {
            if Arc::ptr_eq(current, context) {
                return self.clone();
            }
        }
        self.rebuild(|data| data.active_refinements = Some(Arc::clone(context)))
    }

    pub(crate) fn with_built_in(&self, built_in: bool) -> Self {
        if built_in == self.0.built_in {
            return self.clone();
        }
        self.rebuild(|data| data.built_in = built_in)
    }

    /// A copy marking the name as undefined (`undef_method`).
    pub fn undefined(&self) -> Self {
        self.rebuild(|data| data.undefined = true)
    }

    /// A copy marking the method as not callable.
    pub fn unimplemented(&self) -> Self {
        self.rebuild(|data| data.unimplemented = true)
    }

    /// Whether a call with an explicit receiver from code running in `caller_class` may see this
    /// method.
    ///
    /// Private methods are never visible here: they may only be called with an implicit receiver,
    /// which the caller checks before asking.
    pub fn is_visible_to(&self, caller_class: &ModuleRef) -> bool {
        match self.0.visibility {
            Visibility::Public => true,
            Visibility::Protected => self.is_protected_method_visible_to(caller_class),
            Visibility::Private | Visibility::ModuleFunction => false,
        }
    }

    fn is_protected_method_visible_to(&self, caller_class: &ModuleRef) -> bool {
        let declaring = &self.0.declaring_module;
        caller_class.ancestors().any(|ancestor| {
            Arc::ptr_eq(&ancestor, declaring)
                || ancestor
                    .singleton
                    .get()
                    .map_or(false, |singleton| Arc::ptr_eq(singleton, declaring))
        })
    }
}

impl fmt::Debug for InternalMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InternalMethod")
            .field("name", &self.0.name.0)
            .field("declaring_module", &self.0.declaring_module.to_string())
            .field("visibility", &self.0.visibility)
            .field("undefined", &self.0.undefined)
            .field("kind", &self.0.kind)
            .finish()
    }
}

/// A method detached from any receiver (`instance_method`).
#[derive(Debug, Clone)]
pub struct UnboundMethod {
    origin: ModuleRef,
    method: InternalMethod,
}

impl UnboundMethod {
    pub(crate) fn new(origin: ModuleRef, method: InternalMethod) -> Self {
        Self { origin, method }
    }

    /// The module `instance_method` was called on.
    pub fn origin(&self) -> &ModuleRef {
        &self.origin
    }

    pub fn method(&self) -> &InternalMethod {
        &self.method
    }

    /// Attach this method to `receiver`, which must be an instance of the declaring hierarchy.
    pub fn bind(&self, universe: &Universe, receiver: Value) -> Result<BoundMethod> {
        let metaclass = universe.metaclass_of(&receiver);
        if !lookup::can_bind_method_to(&self.method, &metaclass) {
            return Err(RubyError::type_error(format!(
                "bind argument must be an instance of {}",
                self.method.declaring_module()
            )));
        }
        Ok(BoundMethod {
            receiver,
            method: self.method.clone(),
        })
    }
}

/// A method together with its receiver (`obj.method(:name)`).
#[derive(Debug, Clone)]
pub struct BoundMethod {
    receiver: Value,
    method: InternalMethod,
}

impl BoundMethod {
    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn method(&self) -> &InternalMethod {
        &self.method
    }

    pub fn unbind(&self, universe: &Universe) -> UnboundMethod {
        UnboundMethod::new(universe.class_of(&self.receiver), self.method.clone())
    }

    pub fn call(&self, universe: &Universe, args: &[Value]) -> Result<Value> {
        universe.invoke(&self.method, self.receiver.clone(), args)
    }
}
