use rmo_runtime::call_site::CallSiteCache;
use rmo_runtime::options::UniverseOptions;
use rmo_runtime::{Universe, Value};

#[test]
fn call_site_cache_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let class = universe.define_class(&object, "A", None)?;
    universe.define_native_method(&class, "f", |_, _| Ok(Value::Integer(1)))?;
    let instance = universe.new_object(&class)?;

    let site = CallSiteCache::new(&universe, "f", universe.toplevel_context());
    let first = site.lookup(&universe, &instance);
    assert!(first.is_defined());
    let second = site.lookup(&universe, &instance);
    assert!(first.method().zip(second.method()).map_or(false, |(a, b)| a.ptr_eq(b)));
    assert_eq!(site.len(), 1);
    assert_eq!(site.misses(), 1);
    assert_eq!(site.hits(), 1);

    // Redefinition invalidates the cached entry.
    universe.define_native_method(&class, "f", |_, _| Ok(Value::Integer(2)))?;
    assert!(!first.is_valid());
    assert_eq!(site.call(&universe, instance.clone(), &[])?, Value::Integer(2));
    assert_eq!(site.misses(), 2);

    // So does a mixin shadowing it.
    let m = universe.define_module(&object, "M")?;
    universe.define_native_method(&m, "f", |_, _| Ok(Value::Integer(3)))?;
    class.prepend(&m)?;
    assert_eq!(site.call(&universe, instance, &[])?, Value::Integer(3));
    assert_eq!(site.misses(), 3);
    Ok(())
}

#[test]
fn negative_lookup_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let class = universe.define_class(&object, "A", None)?;
    let instance = universe.new_object(&class)?;
    let site = CallSiteCache::new(&universe, "greet", universe.toplevel_context());

    let result = site.lookup(&universe, &instance);
    assert!(!result.is_defined());
    assert!(result.is_valid());
    assert!(site.call(&universe, instance.clone(), &[]).is_err());

    // Defining the method anywhere on the path invalidates the negative result.
    universe.define_native_method(&universe.kernel_module(), "greet", |_, _| Ok(Value::TRUE))?;
    assert!(!result.is_valid());
    assert_eq!(site.call(&universe, instance, &[])?, Value::TRUE);
    Ok(())
}

#[test]
fn megamorphic_test() -> anyhow::Result<()> {
    let universe = Universe::with_options(UniverseOptions::default().with_method_cache_limit(2));
    let object = universe.object_class();

    let base = universe.define_class(&object, "Base", None)?;
    universe.define_native_method(&base, "f", |_, _| Ok(Value::Integer(1)))?;
    let site = CallSiteCache::new(&universe, "f", universe.toplevel_context());

    for name in ["A", "B"] {
        let class = universe.define_class(&object, name, Some(&base))?;
        site.call(&universe, universe.new_object(&class)?, &[])?;
    }
    assert_eq!(site.len(), 2);
    assert!(!site.is_megamorphic());

    let class = universe.define_class(&object, "C", Some(&base))?;
    assert_eq!(site.call(&universe, universe.new_object(&class)?, &[])?, Value::Integer(1));
    assert!(site.is_megamorphic());
    assert!(site.is_empty());

    // Still resolves correctly without caching.
    assert_eq!(site.call(&universe, universe.new_object(&base)?, &[])?, Value::Integer(1));
    assert!(site.is_empty());
    Ok(())
}

#[test]
fn private_call_site_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let class = universe.define_class(&object, "A", None)?;
    universe.define_native_method(&class, "initialize", |_, _| Ok(Value::Nil))?;
    let site = CallSiteCache::new(&universe, "initialize", universe.toplevel_context());

    let error = site.call(&universe, universe.new_object(&class)?, &[]).unwrap_err();
    assert_eq!(error.to_string(), "private method `initialize' called for an instance of A");
    Ok(())
}
