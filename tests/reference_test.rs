use std::sync::Arc;

use inventory_refresh::collection::{CollectionSpec, InMemoryCollection};
use inventory_refresh::lazy::{LazyFindOptions, LazyHandle};
use inventory_refresh::reference::*;
use inventory_refresh::types::*;
use serde_json::{json, Value};

fn data(pairs: &[(&str, Value)]) -> AttrMap {
    attr_map(pairs.iter().map(|(k, v)| (*k, v.clone())))
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// A `stacks` collection with a secondary `by_name` reference.
fn stacks() -> Arc<InMemoryCollection> {
    let mut spec = CollectionSpec::named("stacks");
    spec.secondary_refs
        .insert("by_name".to_string(), keys(&["name"]));
    Arc::new(InMemoryCollection::new(spec))
}

#[test]
fn test_loadable_requires_every_key() {
    let full = Reference::new(
        PRIMARY_REF,
        keys(&["ems_ref", "uid"]),
        data(&[("ems_ref", json!("vm-1")), ("uid", json!(7))]),
    );
    assert!(full.is_loadable());
    assert!(full.first_null_key().is_none());

    let partial = Reference::new(
        PRIMARY_REF,
        keys(&["ems_ref", "uid"]),
        data(&[("ems_ref", json!("vm-1")), ("uid", Value::Null)]),
    );
    assert!(!partial.is_loadable());
    assert_eq!(partial.first_null_key(), Some("uid"));

    let missing = Reference::new(PRIMARY_REF, keys(&["ems_ref"]), data(&[("name", json!("x"))]));
    assert!(!missing.is_loadable());
    assert_eq!(missing.first_null_key(), Some("ems_ref"));
}

#[test]
fn test_reference_without_keys_is_not_loadable() {
    let reference = Reference::new("unknown", Vec::new(), data(&[("ems_ref", json!("vm-1"))]));
    assert!(!reference.is_loadable());
}

#[test]
fn test_primary_detection() {
    let primary = Reference::new(PRIMARY_REF, keys(&["ems_ref"]), AttrMap::new());
    let secondary = Reference::new("by_name", keys(&["name"]), AttrMap::new());
    assert!(primary.is_primary());
    assert!(!secondary.is_primary());
}

#[test]
fn test_stringified_joins_key_values() {
    let reference = Reference::new(
        PRIMARY_REF,
        keys(&["ems_ref", "uid", "region"]),
        data(&[
            ("ems_ref", json!("vm-1")),
            ("uid", json!(42)),
            ("region", Value::Null),
            ("name", json!("ignored")),
        ]),
    );
    assert_eq!(reference.stringified(), "vm-1__42__");
}

#[test]
fn test_separator_inside_values_does_not_collide() {
    let pair = keys(&["a", "b"]);
    let left = Reference::new(PRIMARY_REF, pair.clone(), data(&[("a", json!("x__y")), ("b", json!("z"))]));
    let right = Reference::new(PRIMARY_REF, pair, data(&[("a", json!("x")), ("b", json!("y__z"))]));

    assert_ne!(left.stringified(), right.stringified());
    assert_eq!(left.stringified(), r"x\_\_y__z");
    assert_eq!(join_fragments(vec![r"a\".to_string(), "b".to_string()]), r"a\\__b");
}

#[test]
fn test_duplicate_keys_are_dropped() {
    let reference = Reference::new(
        PRIMARY_REF,
        keys(&["ems_ref", "uid", "ems_ref"]),
        data(&[("ems_ref", json!("a")), ("uid", json!("b"))]),
    );
    assert_eq!(reference.keys(), &keys(&["ems_ref", "uid"])[..]);
    assert_eq!(reference.stringified(), "a__b");
}

#[test]
fn test_key_values_only_holds_keys() {
    let reference = Reference::new(
        PRIMARY_REF,
        keys(&["ems_ref"]),
        data(&[("ems_ref", json!("vm-1")), ("name", json!("web"))]),
    );
    let key_values = reference.key_values();
    assert_eq!(key_values.len(), 1);
    assert_eq!(key_values["ems_ref"].as_value(), Some(&json!("vm-1")));
    assert_eq!(reference.full_reference().len(), 2);
}

#[test]
fn test_nested_secondary_index_detection() {
    let stacks = stacks();
    let by_name = LazyHandle::new(
        stacks.clone(),
        data(&[("name", json!("web"))]),
        LazyFindOptions {
            ref_name: "by_name".to_string(),
            key: Some("id".to_string()),
            ..Default::default()
        },
    );
    let by_primary = LazyHandle::new(
        stacks.clone(),
        data(&[("ems_ref", json!("s-1"))]),
        LazyFindOptions::default(),
    );

    let mut nested = AttrMap::new();
    nested.insert("stack".to_string(), AttrValue::from(by_name.clone()));
    let reference = Reference::new("by_stack", keys(&["stack"]), nested);
    assert!(reference.has_nested_secondary_index());

    let mut primary_only = AttrMap::new();
    primary_only.insert("stack".to_string(), AttrValue::from(by_primary));
    let reference = Reference::new("by_stack", keys(&["stack"]), primary_only);
    assert!(!reference.has_nested_secondary_index());

    // Lazy values outside the key set do not count.
    let mut outside_keys = data(&[("ems_ref", json!("r-1"))]);
    outside_keys.insert("stack".to_string(), AttrValue::from(by_name));
    let reference = Reference::new(PRIMARY_REF, keys(&["ems_ref"]), outside_keys);
    assert!(!reference.has_nested_secondary_index());
}

#[test]
fn test_lazy_value_stringifies_as_its_target() {
    let stacks = stacks();
    let lazy = LazyHandle::new(
        stacks,
        data(&[("ems_ref", json!("s-1"))]),
        LazyFindOptions::default(),
    );
    let mut map = AttrMap::new();
    map.insert("stack".to_string(), AttrValue::from(lazy));
    map.insert("name".to_string(), AttrValue::from("web"));
    let reference = Reference::new("by_stack", keys(&["stack", "name"]), map);

    assert_eq!(reference.stringified(), "s-1__web");
    assert!(reference.is_loadable());
}

#[test]
fn test_display_lists_keys() {
    let reference = Reference::new(
        PRIMARY_REF,
        keys(&["ems_ref", "uid"]),
        data(&[("ems_ref", json!("vm-1")), ("uid", json!(3))]),
    );
    assert_eq!(reference.to_string(), "manager_ref(ems_ref: vm-1, uid: 3)");
}
