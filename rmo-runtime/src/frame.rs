//!
//! Invocation of resolved methods.
//!
//! The runtime does not interpret code: method bodies are host closures. A [`Frame`] is what a
//! body receives, giving it its receiver, the method being run and ways to perform the calls a
//! method body makes (`super`, calls on `self`, calls on other receivers).
//!

use std::sync::Arc;

use rmo_core::Visibility;

use crate::declaration::DeclarationContext;
use crate::error::{Result, RubyError};
use crate::lookup;
use crate::method::{InternalMethod, MethodKind};
use crate::module::ModuleRef;
use crate::universe::Universe;
use crate::value::Value;

/// The activation of one method.
pub struct Frame<'a> {
    universe: &'a Universe,
    self_value: Value,
    method: InternalMethod,
}

impl<'a> Frame<'a> {
    pub fn universe(&self) -> &'a Universe {
        self.universe
    }

    /// The receiver of the call.
    pub fn self_value(&self) -> &Value {
        &self.self_value
    }

    /// The method being run.
    pub fn method(&self) -> &InternalMethod {
        &self.method
    }

    /// The declaration context of the method body.
    pub fn declaration_context(&self) -> &Arc<DeclarationContext> {
        self.method.declaration_context()
    }

    /// Call the next definition of the current method along the receiver's ancestors.
    pub fn call_super(&self, args: &[Value]) -> Result<Value> {
        let metaclass = self.universe.metaclass_of(&self.self_value);
        let found = lookup::lookup_super_method(&self.method, &metaclass);
        match found.into_method() {
            Some(method) if !method.is_undefined() => {
                self.universe.invoke(&method, self.self_value.clone(), args)
            }
            _ => {
                let name = self.universe.lookup_symbol(self.method.original_name());
                Err(RubyError::no_method_error(
                    format!(
                        "super: no superclass method `{}' for {}",
                        name,
                        self.universe.describe(&self.self_value)
                    ),
                    &*name,
                ))
            }
        }
    }

    /// Call `name` on `receiver` from this method (`receiver.name(*args)`).
    pub fn call(&self, receiver: Value, name: &str, args: &[Value]) -> Result<Value> {
        let caller_class = self.universe.metaclass_of(&self.self_value);
        self.universe.dispatch(
            self.method.declaration_context(),
            Some(&caller_class),
            receiver,
            name,
            args,
        )
    }

    /// Call `name` on `self` with an implicit receiver (private methods allowed).
    pub fn call_self(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.universe.dispatch(
            self.method.declaration_context(),
            None,
            self.self_value.clone(),
            name,
            args,
        )
    }
}

impl Universe {
    /// How a receiver is shown in error messages.
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Boolean(value) => value.to_string(),
            Value::Module(module) => module.to_string(),
            other => format!("an instance of {}", self.class_of(other)),
        }
    }

    /// Run `method` with `receiver` as `self`.
    pub fn invoke(&self, method: &InternalMethod, receiver: Value, args: &[Value]) -> Result<Value> {
        let name = || self.lookup_symbol(method.name());
        if method.is_undefined() {
            let name = name();
            return Err(RubyError::no_method_error(
                format!(
                    "undefined method `{}' for {}",
                    name,
                    self.describe(&receiver)
                ),
                &*name,
            ));
        }

        let not_implemented = || -> Result<Value> {
            let name = name();
            Err(RubyError::no_method_error(
                format!("method `{}' is not implemented", name),
                &*name,
            ))
        };

        match method.kind() {
            _ if method.is_unimplemented() => not_implemented(),
            MethodKind::Native(body) => {
                let body = Arc::clone(body);
                let frame = Frame {
                    universe: self,
                    self_value: receiver,
                    method: method.clone(),
                };
                body(&frame, args)
            }
            MethodKind::Proc(proc) => {
                let body = Arc::clone(&proc.body);
                let frame = Frame {
                    universe: self,
                    self_value: receiver,
                    method: method.clone(),
                };
                body(&frame, args)
            }
            MethodKind::AttrReader(ivar) => {
                check_arity(args, 0)?;
                Ok(receiver
                    .as_object()
                    .and_then(|object| object.instance_variable_get(*ivar))
                    .unwrap_or(Value::Nil))
            }
            MethodKind::AttrWriter(ivar) => {
                check_arity(args, 1)?;
                let value = args[0].clone();
                match receiver.as_object() {
                    Some(object) => {
                        object.instance_variable_set(*ivar, value.clone());
                        Ok(value)
                    }
                    None => Err(RubyError::FrozenError(format!(
                        "can't modify frozen {}",
                        self.class_of(&receiver)
                    ))),
                }
            }
            MethodKind::Unimplemented => not_implemented(),
        }
    }

    /// Look `name` up on `receiver` under `context` and call it.
    ///
    /// With a `caller_class`, this is a call with an explicit receiver and the method must be
    /// visible to that class; without, it is a call on `self`.
    pub fn dispatch(
        &self,
        context: &Arc<DeclarationContext>,
        caller_class: Option<&ModuleRef>,
        receiver: Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        let metaclass = self.metaclass_of(&receiver);
        let method = lookup::lookup_method_uncached(&metaclass, self.intern(name), Some(context))
            .filter(|method| !method.is_undefined());
        let method = match method {
            Some(method) => method,
            None => {
                return Err(RubyError::no_method_error(
                    format!(
                        "undefined method `{}' for {}",
                        name,
                        self.describe(&receiver)
                    ),
                    name,
                ));
            }
        };

        if let Some(caller_class) = caller_class {
            if !method.is_visible_to(caller_class) {
                return Err(self.visibility_error(&method, &receiver, name));
            }
        }
        self.invoke(&method, receiver, args)
    }

    pub(crate) fn visibility_error(
        &self,
        method: &InternalMethod,
        receiver: &Value,
        name: &str,
    ) -> RubyError {
        let visibility = match method.visibility() {
            Visibility::ModuleFunction => Visibility::Private,
            other => other,
        };
        RubyError::no_method_error(
            format!(
                "{} method `{}' called for {}",
                visibility.keyword(),
                name,
                self.describe(receiver)
            ),
            name,
        )
    }

    /// Call a public method from toplevel code (`receiver.name(*args)`).
    pub fn call(&self, receiver: Value, name: &str, args: &[Value]) -> Result<Value> {
        self.call_in(&DeclarationContext::none(), receiver, name, args)
    }

    /// Call a method from code running under `context` at toplevel.
    pub fn call_in(
        &self,
        context: &Arc<DeclarationContext>,
        receiver: Value,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        let caller_class = self.object_class();
        self.dispatch(context, Some(&caller_class), receiver, name, args)
    }

    /// Call a method as if on `self`, private methods included.
    pub fn call_private(&self, receiver: Value, name: &str, args: &[Value]) -> Result<Value> {
        self.dispatch(&DeclarationContext::none(), None, receiver, name, args)
    }
}

fn check_arity(args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(RubyError::argument_error(format!(
            "wrong number of arguments (given {}, expected {})",
            args.len(),
            expected
        )));
    }
    Ok(())
}
