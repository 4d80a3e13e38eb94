use std::sync::Arc;
use std::thread;

use rmo_core::identifiers::{
    is_valid_class_variable_name, is_valid_constant_name, is_valid_instance_variable_name,
    is_valid_method_name, split_constant_path,
};
use rmo_core::visibility::is_method_private_from_name;
use rmo_core::{Interner, Visibility};

#[test]
fn constant_names_test() {
    assert!(is_valid_constant_name("Foo"));
    assert!(is_valid_constant_name("FOO_BAR"));
    assert!(is_valid_constant_name("Ünicode"));
    assert!(is_valid_constant_name("A1"));

    assert!(!is_valid_constant_name("foo"));
    assert!(!is_valid_constant_name("_Foo"));
    assert!(!is_valid_constant_name("1Foo"));
    assert!(!is_valid_constant_name(""));
    assert!(!is_valid_constant_name("Foo-Bar"));
    assert!(!is_valid_constant_name("Foo::Bar"));
}

#[test]
fn variable_names_test() {
    assert!(is_valid_class_variable_name("@@count"));
    assert!(is_valid_class_variable_name("@@_x1"));
    assert!(!is_valid_class_variable_name("@count"));
    assert!(!is_valid_class_variable_name("@@1x"));
    assert!(!is_valid_class_variable_name("@@"));
    assert!(!is_valid_class_variable_name("count"));

    assert!(is_valid_instance_variable_name("@name"));
    assert!(!is_valid_instance_variable_name("@@name"));
    assert!(!is_valid_instance_variable_name("name"));
}

#[test]
fn method_names_test() {
    assert!(is_valid_method_name("each"));
    assert!(is_valid_method_name("empty?"));
    assert!(is_valid_method_name("map!"));
    assert!(is_valid_method_name("name="));
    assert!(is_valid_method_name("<=>"));
    assert!(is_valid_method_name("[]="));
    assert!(is_valid_method_name("Integer"));

    assert!(!is_valid_method_name("1st"));
    assert!(!is_valid_method_name("a b"));
    assert!(!is_valid_method_name("?"));
}

#[test]
fn constant_path_test() {
    assert_eq!(split_constant_path("A::B::C"), (false, vec!["A", "B", "C"]));
    assert_eq!(split_constant_path("::A"), (true, vec!["A"]));
    assert_eq!(split_constant_path("A::"), (false, vec!["A", ""]));
}

#[test]
fn visibility_test() {
    assert!(Visibility::Private.is_private());
    assert!(Visibility::ModuleFunction.is_private());
    assert!(!Visibility::Protected.is_private());
    assert!(Visibility::Protected.is_protected());
    assert_eq!(Visibility::default(), Visibility::Public);
    assert_eq!(Visibility::ModuleFunction.to_string(), "module_function");

    assert!(is_method_private_from_name("initialize"));
    assert!(is_method_private_from_name("respond_to_missing?"));
    assert!(!is_method_private_from_name("initialize!"));
}

#[test]
fn interner_test() {
    let interner = Interner::with_capacity(10);
    assert!(interner.is_empty());

    let foo = interner.intern("foo");
    let bar = interner.intern("bar");
    assert_ne!(foo, bar);
    assert_eq!(interner.intern("foo"), foo);
    assert_eq!(&*interner.lookup(bar), "bar");
    assert_eq!(interner.get("bar"), Some(bar));
    assert_eq!(interner.get("baz"), None);
    assert_eq!(interner.len(), 2);
}

#[test]
fn concurrent_interning_test() {
    let interner = Arc::new(Interner::default());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let interner = Arc::clone(&interner);
            thread::spawn(move || {
                (0..100)
                    .map(|i| interner.intern(&format!("name{}", i)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("interning thread panicked"))
        .collect();

    for ids in &results[1..] {
        assert_eq!(ids, &results[0]);
    }
    assert_eq!(interner.len(), 100);
}
