use std::cmp::Ordering;

use rmo_runtime::error::ErrorKind;
use rmo_runtime::{ModuleRef, Universe, Value};

fn names(modules: impl Iterator<Item = ModuleRef>) -> Vec<String> {
    modules.map(|module| module.to_string()).collect()
}

#[test]
fn core_ancestors_test() {
    let universe = Universe::new();

    assert_eq!(
        names(universe.object_class().ancestors()),
        vec!["Object", "Kernel", "BasicObject"],
    );
    assert_eq!(
        names(universe.class_class().ancestors()),
        vec!["Class", "Module", "Object", "Kernel", "BasicObject"],
    );
    assert_eq!(names(universe.kernel_module().ancestors()), vec!["Kernel"]);
}

#[test]
fn include_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let m1 = universe.define_module(&object, "M1")?;
    let m2 = universe.define_module(&object, "M2")?;
    m2.include(&m1)?;
    let class = universe.define_class(&object, "C", None)?;
    class.include(&m2)?;

    let expected = vec!["C", "M2", "M1", "Object", "Kernel", "BasicObject"];
    assert_eq!(names(class.ancestors()), expected);

    // Including again changes nothing.
    class.include(&m2)?;
    class.include(&m1)?;
    assert_eq!(names(class.ancestors()), expected);

    // Modules already in the superclass chain are not repeated.
    let subclass = universe.define_class(&object, "D", Some(&class))?;
    subclass.include(&m1)?;
    subclass.include(&universe.kernel_module())?;
    assert_eq!(
        names(subclass.ancestors()),
        vec!["D", "C", "M2", "M1", "Object", "Kernel", "BasicObject"],
    );

    assert_eq!(names(class.included_modules().into_iter()), vec!["M2", "M1", "Kernel"]);
    Ok(())
}

#[test]
fn include_later_module_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let a = universe.define_module(&object, "A")?;
    let b = universe.define_module(&object, "B")?;
    let class = universe.define_class(&object, "C", None)?;
    class.include(&a)?;
    class.include(&b)?;

    // Last included comes first.
    assert_eq!(
        names(class.ancestors()),
        vec!["C", "B", "A", "Object", "Kernel", "BasicObject"],
    );
    Ok(())
}

#[test]
fn shared_mixin_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let m = universe.define_module(&object, "M")?;
    let a = universe.define_class(&object, "A", None)?;
    let b = universe.define_class(&object, "B", Some(&a))?;
    b.include(&m)?;
    a.include(&m)?;

    assert_eq!(
        names(b.ancestors()),
        vec!["B", "M", "A", "Object", "Kernel", "BasicObject"],
    );
    assert_eq!(
        names(a.ancestors()),
        vec!["A", "M", "Object", "Kernel", "BasicObject"],
    );
    assert_eq!(names(b.included_modules().into_iter()), vec!["M", "Kernel"]);

    // Super from A must not reach M a second time.
    universe.define_native_method(&m, "f", |frame, args| frame.call_super(args))?;
    universe.define_native_method(&a, "f", |frame, args| frame.call_super(args))?;
    let instance = universe.new_object(&b)?;
    let error = universe.call(instance, "f", &[]).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NoMethodError);
    assert_eq!(
        error.to_string(),
        "super: no superclass method `f' for an instance of B"
    );
    Ok(())
}

#[test]
fn prepend_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let q = universe.define_module(&object, "Q")?;
    let p = universe.define_module(&object, "P")?;
    p.include(&q)?;
    let m = universe.define_module(&object, "M")?;
    let class = universe.define_class(&object, "C", None)?;
    class.include(&m)?;
    class.prepend(&p)?;

    let expected = vec!["P", "Q", "C", "M", "Object", "Kernel", "BasicObject"];
    assert_eq!(names(class.ancestors()), expected);

    class.prepend(&p)?;
    class.include(&p)?;
    assert_eq!(names(class.ancestors()), expected);

    assert_eq!(
        names(class.prepended_and_included_modules().into_iter()),
        vec!["P", "Q", "M"],
    );
    Ok(())
}

#[test]
fn invalid_mixin_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let m = universe.define_module(&object, "M")?;
    let n = universe.define_module(&object, "N")?;
    n.include(&m)?;

    let error = m.include(&m).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::ArgumentError);
    assert_eq!(error.to_string(), "cyclic include detected");

    let error = m.include(&n).unwrap_err();
    assert_eq!(error.to_string(), "cyclic include detected");

    let error = m.prepend(&n).unwrap_err();
    assert_eq!(error.to_string(), "cyclic prepend detected");

    let class = universe.define_class(&object, "C", None)?;
    let error = m.include(&class).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TypeError);
    assert_eq!(error.to_string(), "wrong argument type Class (expected Module)");

    assert_eq!(names(m.ancestors()), vec!["M"]);
    Ok(())
}

#[test]
fn frozen_mixin_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let m = universe.define_module(&object, "M")?;
    let class = universe.define_class(&object, "C", None)?;
    class.freeze();

    let error = class.include(&m).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::FrozenError);
    assert_eq!(error.to_string(), "can't modify frozen Class: C");
    assert_eq!(names(class.ancestors()), vec!["C", "Object", "Kernel", "BasicObject"]);
    Ok(())
}

#[test]
fn comparison_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let m = universe.define_module(&object, "M")?;
    let base = universe.define_class(&object, "Base", None)?;
    let derived = universe.define_class(&object, "Derived", Some(&base))?;
    derived.include(&m)?;
    let other = universe.define_class(&object, "Other", None)?;

    assert_eq!(derived.is_lt(&base), Some(true));
    assert_eq!(derived.is_lt(&m), Some(true));
    assert_eq!(derived.is_lt(&derived), Some(false));
    assert_eq!(derived.is_le(&derived), Some(true));
    assert_eq!(base.is_lt(&derived), Some(false));
    assert_eq!(base.is_gt(&derived), Some(true));
    assert_eq!(m.is_ge(&derived), Some(true));
    assert_eq!(other.is_lt(&base), None);

    assert_eq!(derived.compare(&base), Some(Ordering::Less));
    assert_eq!(base.compare(&derived), Some(Ordering::Greater));
    assert_eq!(base.compare(&base), Some(Ordering::Equal));
    assert_eq!(other.compare(&base), None);

    assert_eq!(derived.lt_value(&Value::Module(base.clone()))?, Some(true));
    let error = derived.lt_value(&Value::Integer(3)).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TypeError);
    assert_eq!(error.to_string(), "compared with non class/module");
    assert_eq!(derived.compare_value(&Value::Integer(3)), None);
    Ok(())
}

#[test]
fn singleton_class_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let base = universe.define_class(&object, "Base", None)?;
    let derived = universe.define_class(&object, "Derived", Some(&base))?;

    let singleton = universe.singleton_class(&derived);
    assert!(singleton.is_singleton_class());
    assert_eq!(singleton.to_string(), "#<Class:Derived>");
    assert!(std::sync::Arc::ptr_eq(&singleton, &universe.singleton_class(&derived)));

    let ancestors = names(singleton.ancestors());
    assert_eq!(
        &ancestors[..4],
        &["#<Class:Derived>", "#<Class:Base>", "#<Class:Object>", "#<Class:BasicObject>"],
    );
    assert_eq!(&ancestors[4..6], &["Class", "Module"]);

    let instance = universe.new_object(&derived)?;
    assert!(universe.is_a(&instance, &base));
    assert!(!universe.is_a(&instance, &universe.integer_class()));

    let error = universe.singleton_class_of(&Value::Integer(1)).unwrap_err();
    assert_eq!(error.to_string(), "can't define singleton");
    let error = universe.new_object(&singleton).unwrap_err();
    assert_eq!(error.to_string(), "can't create instance of singleton class");
    let error = universe.new_class(Some(&singleton)).unwrap_err();
    assert_eq!(error.to_string(), "can't make subclass of singleton class");
    Ok(())
}

#[test]
fn class_reopening_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let base = universe.define_class(&object, "Base", None)?;
    let class = universe.define_class(&object, "C", Some(&base))?;
    let reopened = universe.define_class(&object, "C", None)?;
    assert!(std::sync::Arc::ptr_eq(&class, &reopened));

    let error = universe.define_class(&object, "C", Some(&object)).unwrap_err();
    assert_eq!(error.to_string(), "superclass mismatch for class C");

    let error = universe.define_module(&object, "C").unwrap_err();
    assert_eq!(error.to_string(), "C is not a module");

    let m = universe.define_module(&object, "M")?;
    let nested = universe.define_class(&m, "Inner", None)?;
    assert_eq!(nested.to_string(), "M::Inner");
    Ok(())
}

#[test]
fn copy_module_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let m = universe.define_module(&object, "M")?;
    let class = universe.define_class(&object, "C", None)?;
    class.include(&m)?;
    universe.const_set(&class, "LIMIT", Value::Integer(3))?;

    let copy = universe.copy_module(&class)?;
    assert!(copy.includes_module(&m));
    assert_eq!(universe.const_get(&copy, "LIMIT", false)?, Value::Integer(3));
    assert!(!copy.has_full_name());

    let error = universe.copy_module(&universe.basic_object_class()).unwrap_err();
    assert_eq!(error.to_string(), "can't copy the root class");
    let singleton = universe.singleton_class(&class);
    let error = universe.copy_module(&singleton).unwrap_err();
    assert_eq!(error.to_string(), "can't copy singleton class");
    Ok(())
}
