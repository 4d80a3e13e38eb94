use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rmo_runtime::constant_lookup::{lookup_constant, lookup_constant_with_lexical_scope};
use rmo_runtime::error::ErrorKind;
use rmo_runtime::lexical_scope::LexicalScope;
use rmo_runtime::{Result, Universe, Value};
use tracing_test::traced_test;

#[test]
fn inherited_constant_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let m = universe.define_module(&object, "M")?;
    universe.const_set(&m, "C", Value::Integer(1))?;
    let k = universe.define_class(&object, "K", None)?;
    k.include(&m)?;

    assert_eq!(universe.scoped_constant_get(&k, "C")?, Value::Integer(1));
    assert_eq!(universe.const_get(&k, "C", true)?, Value::Integer(1));
    assert!(universe.const_get(&k, "C", false).is_err());

    assert_eq!(universe.remove_const(&m, "C")?, Value::Integer(1));
    let error = universe.scoped_constant_get(&k, "C").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NameError);
    assert_eq!(error.to_string(), "uninitialized constant K::C");
    assert_eq!(error.name(), Some("C"));

    let error = universe.remove_const(&m, "C").unwrap_err();
    assert_eq!(error.to_string(), "constant M::C not defined");
    Ok(())
}

#[test]
fn lexical_lookup_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let base = universe.define_class(&object, "Base", None)?;
    universe.const_set(&base, "Y", Value::Integer(2))?;
    let outer = universe.define_module(&object, "Outer")?;
    universe.const_set(&outer, "X", Value::Integer(1))?;
    let inner = universe.define_module(&outer, "Inner")?;
    let derived = universe.define_class(&outer, "Derived", Some(&base))?;

    let outer_scope = universe.module_scope(&outer);
    let inner_scope = LexicalScope::new(&outer_scope, inner.clone());
    let derived_scope = LexicalScope::new(&outer_scope, derived.clone());

    assert_eq!(universe.lookup_constant(&inner_scope, "X")?, Value::Integer(1));
    assert_eq!(
        universe.lookup_constant(&inner_scope, "String")?,
        Value::Module(universe.string_class()),
    );
    assert_eq!(universe.lookup_constant(&derived_scope, "Y")?, Value::Integer(2));
    let error = universe.lookup_constant(&inner_scope, "Y").unwrap_err();
    assert_eq!(error.to_string(), "uninitialized constant Outer::Inner::Y");

    // Enclosing scopes win over ancestors.
    universe.const_set(&outer, "Y", Value::Integer(3))?;
    assert_eq!(universe.lookup_constant(&derived_scope, "Y")?, Value::Integer(3));

    let nesting: Vec<String> = universe
        .nesting(&derived_scope)
        .iter()
        .map(|module| module.to_string())
        .collect();
    assert_eq!(nesting, vec!["Outer::Derived", "Outer"]);

    let error = universe.lookup_constant(&inner_scope, "lower").unwrap_err();
    assert_eq!(error.to_string(), "wrong constant name lower");
    Ok(())
}

#[test]
fn scoped_path_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let outer = universe.define_module(&object, "Outer")?;
    universe.const_set(&outer, "X", Value::Integer(1))?;
    let inner = universe.define_module(&outer, "Inner")?;

    assert_eq!(universe.const_get(&object, "Outer::Inner", true)?, Value::Module(inner.clone()));
    assert_eq!(universe.const_get(&inner, "::Outer", true)?, Value::Module(outer.clone()));
    assert!(universe.const_defined(&object, "Outer::X", true)?);
    assert!(!universe.const_defined(&object, "Outer::Missing", true)?);

    let error = universe.const_get(&object, "Outer::X::Y", true).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::TypeError);
    assert_eq!(error.to_string(), "Outer::X does not refer to class/module");

    let error = universe.const_get(&object, "Outer::", true).unwrap_err();
    assert_eq!(error.to_string(), "wrong constant name Outer::");
    let error = universe.const_get(&object, "Missing", true).unwrap_err();
    assert_eq!(error.to_string(), "uninitialized constant Missing");
    let error = universe.const_set(&object, "lower", Value::Nil).unwrap_err();
    assert_eq!(error.to_string(), "wrong constant name lower");
    Ok(())
}

#[test]
fn constant_names_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let m = universe.define_module(&object, "M")?;
    universe.const_set(&m, "A", Value::Integer(1))?;
    universe.const_set(&m, "B", Value::Integer(2))?;
    let k = universe.define_class(&object, "K", None)?;
    k.include(&m)?;
    universe.const_set(&k, "B", Value::Integer(3))?;
    universe.const_set(&k, "C", Value::Integer(4))?;

    let names = |inherit: bool| -> Vec<String> {
        universe
            .constants(&k, inherit)
            .into_iter()
            .map(|name| universe.lookup_symbol(name).to_string())
            .collect()
    };
    assert_eq!(names(false), vec!["B", "C"]);
    // Own constants first, each name once, nothing from `Object`.
    assert_eq!(names(true), vec!["B", "C", "A"]);
    Ok(())
}

#[test]
fn private_constant_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let outer = universe.define_module(&object, "Outer")?;
    universe.const_set(&outer, "X", Value::Integer(1))?;
    universe.const_set(&outer, "Z", Value::Integer(2))?;
    universe.private_constant(&outer, &["X"])?;

    let error = universe.scoped_constant_get(&outer, "X").unwrap_err();
    assert_eq!(error.to_string(), "private constant Outer::X referenced");
    assert_eq!(universe.const_get(&outer, "X", true)?, Value::Integer(1));
    let scope = universe.module_scope(&outer);
    assert_eq!(universe.lookup_constant(&scope, "X")?, Value::Integer(1));

    let names: Vec<String> = universe
        .constants(&outer, false)
        .into_iter()
        .map(|name| universe.lookup_symbol(name).to_string())
        .collect();
    assert_eq!(names, vec!["Z"]);

    universe.public_constant(&outer, &["X"])?;
    assert_eq!(universe.scoped_constant_get(&outer, "X")?, Value::Integer(1));

    let error = universe.private_constant(&outer, &["Missing"]).unwrap_err();
    assert_eq!(error.to_string(), "constant Outer::Missing not defined");
    Ok(())
}

#[test]
fn anonymous_module_naming_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let outer = universe.new_module();
    let inner = universe.new_class(None)?;
    universe.const_set(&outer, "Inner", Value::Module(inner.clone()))?;
    assert!(!inner.has_full_name());

    universe.const_set(&object, "Outer", Value::Module(outer.clone()))?;
    assert_eq!(outer.to_string(), "Outer");
    assert_eq!(inner.to_string(), "Outer::Inner");

    // A module keeps its first name.
    universe.const_set(&object, "Alias", Value::Module(outer.clone()))?;
    assert_eq!(outer.to_string(), "Outer");
    Ok(())
}

#[test]
fn lookup_assumptions_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let base = universe.define_class(&object, "Base", None)?;
    let derived = universe.define_class(&object, "Derived", Some(&base))?;
    universe.const_set(&base, "LIMIT", Value::Integer(1))?;

    let found = lookup_constant(&derived, universe.intern("LIMIT"));
    assert!(found.is_found());
    assert!(found.is_valid());

    // Shadowing in the subclass invalidates the result.
    universe.const_set(&derived, "LIMIT", Value::Integer(2))?;
    assert!(!found.is_valid());

    let scope = universe.module_scope(&derived);
    let found = lookup_constant_with_lexical_scope(&universe, &scope, universe.intern("LIMIT"));
    assert_eq!(found.constant().and_then(|constant| constant.value().cloned()), Some(Value::Integer(2)));
    assert!(found.is_valid());

    let missing = lookup_constant(&derived, universe.intern("Missing"));
    assert!(!missing.is_found());
    assert!(missing.is_valid());
    universe.const_set(&base, "Missing", Value::Nil)?;
    assert!(!missing.is_valid());
    Ok(())
}

#[test]
fn autoload_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    universe.set_feature_loader(move |universe: &Universe, feature: &str| -> Result<bool> {
        assert_eq!(feature, "lazy");
        counter.fetch_add(1, Ordering::SeqCst);
        let object = universe.object_class();

        // While loading, the constant is invisible to the loading thread.
        assert!(universe.const_get(&object, "Lazy", false).is_err());
        assert!(!universe.const_defined(&object, "Lazy", false)?);
        assert_eq!(universe.autoload_path(&object, "Lazy")?, None);

        universe.const_set(&object, "Lazy", Value::Integer(42))?;
        Ok(true)
    });

    universe.autoload(&object, "Lazy", "lazy")?;
    assert_eq!(universe.autoload_path(&object, "Lazy")?.as_deref(), Some("lazy"));
    assert!(universe.const_defined(&object, "Lazy", false)?);

    assert_eq!(universe.const_get(&object, "Lazy", false)?, Value::Integer(42));
    assert_eq!(universe.const_get(&object, "Lazy", false)?, Value::Integer(42));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(universe.autoload_path(&object, "Lazy")?, None);

    // Registering over a defined constant is ignored.
    universe.autoload(&object, "Lazy", "other")?;
    assert_eq!(universe.const_get(&object, "Lazy", false)?, Value::Integer(42));

    let error = universe.autoload(&object, "Empty", "").unwrap_err();
    assert_eq!(error.to_string(), "empty file name");
    Ok(())
}

#[test]
fn concurrent_autoload_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    let loads = Arc::new(AtomicUsize::new(0));
    let loading = Arc::new(Barrier::new(2));
    let counter = Arc::clone(&loads);
    let barrier = Arc::clone(&loading);
    universe.set_feature_loader(move |universe: &Universe, _: &str| -> Result<bool> {
        if counter.fetch_add(1, Ordering::SeqCst) > 0 {
            return Ok(false);
        }
        let object = universe.object_class();
        barrier.wait();
        // The other thread has looked the constant up in the meantime.
        barrier.wait();
        assert!(universe.const_get(&object, "Slow", false).is_err());
        universe.const_set(&object, "Slow", Value::Integer(7))?;
        Ok(true)
    });
    universe.autoload(&object, "Slow", "slow")?;

    thread::scope(|scope| {
        let loader = scope.spawn(|| universe.const_get(&universe.object_class(), "Slow", false));
        let waiter = scope.spawn(|| {
            loading.wait();
            let attempt = universe.const_get(&universe.object_class(), "Slow", false);
            loading.wait();
            attempt
        });

        assert_eq!(loader.join().unwrap().unwrap(), Value::Integer(7));
        let error = waiter.join().unwrap().unwrap_err();
        assert_eq!(error.to_string(), "uninitialized constant Slow");
    });

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(universe.const_get(&object, "Slow", false)?, Value::Integer(7));
    Ok(())
}

#[test]
fn autoload_reopening_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    universe.set_feature_loader(|universe: &Universe, _: &str| -> Result<bool> {
        universe.define_module(&universe.object_class(), "Plugin")?;
        Ok(true)
    });
    universe.autoload(&object, "Plugin", "plugin")?;

    // Opening the module runs the autoload first and reopens what it defined.
    let plugin = universe.define_module(&object, "Plugin")?;
    assert_eq!(universe.const_get(&object, "Plugin", false)?, Value::Module(plugin.clone()));
    assert_eq!(plugin.to_string(), "Plugin");
    Ok(())
}

#[traced_test]
#[test]
fn constant_warnings_test() -> anyhow::Result<()> {
    let universe = Universe::new();
    let object = universe.object_class();

    universe.autoload(&object, "Nowhere", "nowhere")?;
    let error = universe.const_get(&object, "Nowhere", false).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NameError);
    assert!(logs_contain("no feature loader installed for autoload"));
    assert!(!universe.const_defined(&object, "Nowhere", false)?);

    universe.const_set(&object, "OLD", Value::Integer(1))?;
    universe.deprecate_constant(&object, &["OLD"])?;
    assert_eq!(universe.const_get(&object, "OLD", false)?, Value::Integer(1));
    assert!(logs_contain("constant is deprecated"));

    universe.const_set(&object, "OLD", Value::Integer(2))?;
    assert!(logs_contain("already initialized constant"));
    Ok(())
}
