use std::sync::Arc;
use std::thread;

use rmo_runtime::error::ErrorKind;
use rmo_runtime::frame::Frame;
use rmo_runtime::refinement::using;
use rmo_runtime::{ModuleRef, Result, Universe, Value};

fn constant(value: i64) -> impl Fn(&Frame<'_>, &[Value]) -> Result<Value> {
    move |_, _| Ok(Value::Integer(value))
}

/// Refine `target` in `namespace` with a method `name` running `body`.
fn refine_method(
    universe: &Universe,
    namespace: &ModuleRef,
    target: &ModuleRef,
    name: &str,
    body: impl Fn(&Frame<'_>, &[Value]) -> Result<Value> + Send + Sync + 'static,
) -> Result<ModuleRef> {
    universe.refine(namespace, target, |refinement, context| {
        let scope = universe.module_scope(refinement);
        universe.define_native_method_in(refinement, name, &scope, context, body)?;
        Ok(())
    })
}

#[test]
fn refinement_scope_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let class = universe.define_class(&object, "C", None)?;
    universe.define_native_method(&class, "f", constant(1))?;
    let namespace = universe.define_module(&object, "Ext")?;
    let refinement = refine_method(&universe, &namespace, &class, "f", constant(2))?;

    assert!(refinement.is_refinement());
    assert!(Arc::ptr_eq(refinement.refined_module().expect("refines C"), &class));
    assert_eq!(refinement.to_string(), "#<refinement:C@Ext>");

    let instance = universe.new_object(&class)?;
    assert_eq!(universe.call(instance.clone(), "f", &[])?, Value::Integer(1));

    let context = using(&universe.toplevel_context(), &namespace)?;
    assert_eq!(universe.call_in(&context, instance.clone(), "f", &[])?, Value::Integer(2));

    // Activating twice changes nothing.
    let again = using(&context, &namespace)?;
    assert_eq!(again.used_refinements().len(), 1);
    assert_eq!(universe.call_in(&again, instance, "f", &[])?, Value::Integer(2));
    Ok(())
}

#[test]
fn refinement_errors_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let class = universe.define_class(&object, "C", None)?;
    let error = universe.refine(&class, &class, |_, _| Ok(())).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NoMethodError);
    assert_eq!(error.to_string(), "undefined method `refine' for C");

    let error = using(&universe.toplevel_context(), &class).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TypeError);
    Ok(())
}

#[test]
fn refined_super_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let class = universe.define_class(&object, "C", None)?;
    universe.define_native_method(&class, "f", constant(1))?;
    let namespace = universe.define_module(&object, "Ext")?;
    refine_method(&universe, &namespace, &class, "f", |frame, args| {
        let base = frame.call_super(args)?;
        Ok(Value::Integer(base.as_integer().unwrap_or_default() + 10))
    })?;

    let context = using(&universe.toplevel_context(), &namespace)?;
    let instance = universe.new_object(&class)?;
    assert_eq!(universe.call_in(&context, instance, "f", &[])?, Value::Integer(11));
    Ok(())
}

#[test]
fn sibling_refinements_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let a = universe.define_class(&object, "A", None)?;
    let b = universe.define_class(&object, "B", None)?;
    let namespace = universe.define_module(&object, "Ext")?;

    // `B#g` is refined to call `A#h`, which only exists as a refinement declared afterwards.
    let target = a.clone();
    refine_method(&universe, &namespace, &b, "g", move |frame, _| {
        let receiver = frame.universe().new_object(&target)?;
        frame.call(receiver, "h", &[])
    })?;
    refine_method(&universe, &namespace, &a, "h", constant(5))?;

    let context = using(&universe.toplevel_context(), &namespace)?;
    let instance = universe.new_object(&b)?;
    assert_eq!(universe.call_in(&context, instance, "g", &[])?, Value::Integer(5));

    let instance = universe.new_object(&a)?;
    assert!(universe.call(instance, "h", &[]).is_err());
    Ok(())
}

#[test]
fn super_refinement_order_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let a = universe.define_class(&object, "A", None)?;
    let b = universe.define_class(&object, "B", Some(&a))?;
    universe.define_native_method(&a, "f", constant(1))?;

    // `Outer` refines `B#f` to call super, and refines `A#f` as well.
    let outer = universe.define_module(&object, "Outer")?;
    refine_method(&universe, &outer, &b, "f", |frame, args| frame.call_super(args))?;
    refine_method(&universe, &outer, &a, "f", constant(2))?;

    // `Caller` only refines `A#f`.
    let caller = universe.define_module(&object, "Caller")?;
    refine_method(&universe, &caller, &a, "f", constant(3))?;

    let instance = universe.new_object(&b)?;

    // The caller activates `Caller` last, so its refinement of `A` comes first in its own list;
    // super still prefers the refinements visible where the method was declared.
    let context = using(&universe.toplevel_context(), &outer)?;
    let context = using(&context, &caller)?;
    assert_eq!(universe.call_in(&context, instance.clone(), "f", &[])?, Value::Integer(2));

    // Refinements only the caller activated are honored too.
    let only_b = universe.define_module(&object, "OnlyB")?;
    refine_method(&universe, &only_b, &b, "f", |frame, args| frame.call_super(args))?;
    let context = using(&universe.toplevel_context(), &caller)?;
    let context = using(&context, &only_b)?;
    assert_eq!(universe.call_in(&context, instance.clone(), "f", &[])?, Value::Integer(3));

    let context = using(&universe.toplevel_context(), &only_b)?;
    assert_eq!(universe.call_in(&context, instance, "f", &[])?, Value::Integer(1));
    Ok(())
}

#[test]
fn concurrent_refine_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let class = universe.define_class(&object, "C", None)?;
    let namespace = universe.define_module(&object, "Ext")?;

    let refinements: Vec<ModuleRef> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| universe.refine(&namespace, &class, |_, _| Ok(()))))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("refining thread panicked"))
            .collect::<Result<_>>()
    })?;

    let first = &refinements[0];
    assert!(refinements.iter().all(|refinement| Arc::ptr_eq(refinement, first)));
    assert_eq!(namespace.refinements().len(), 1);
    Ok(())
}

#[test]
fn refine_keeps_concurrent_definitions_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let class = universe.define_class(&object, "C", None)?;
    let namespace = universe.define_module(&object, "Ext")?;
    let refinement = refine_method(&universe, &namespace, &class, "f", constant(0))?;
    let targets: Vec<ModuleRef> = (0..50).map(|_| universe.new_module()).collect();

    // New refinements in the namespace redeclare the methods of `refinement` meanwhile.
    thread::scope(|scope| -> Result<()> {
        let refiner = scope.spawn(|| -> Result<()> {
            for target in &targets {
                universe.refine(&namespace, target, |_, _| Ok(()))?;
            }
            Ok(())
        });
        for value in 1..=200 {
            refine_method(&universe, &namespace, &class, "f", constant(value))?;
        }
        refiner.join().expect("refining thread panicked")
    })?;

    assert_eq!(namespace.refinements().len(), 51);
    let instance = universe.new_object(&class)?;
    let context = using(&universe.toplevel_context(), &namespace)?;
    assert_eq!(universe.call_in(&context, instance, "f", &[])?, Value::Integer(200));

    let method = refinement.get_method(universe.intern("f")).expect("f is defined");
    assert!(Arc::ptr_eq(method.declaring_module(), &refinement));
    Ok(())
}
