use std::fs;

use inventory_refresh::errors::InventoryError;
use inventory_refresh::inventory::*;
use inventory_refresh::lazy::LazyResolver;
use serde_json::{json, Value};
use tempfile::TempDir;

fn document() -> Value {
    json!({
        "collections": [
            {
                "name": "hosts",
                "manager_ref": ["ems_ref"],
                "persisted": [
                    {"id": 1, "ems_ref": "h-0", "name": "legacy"}
                ],
                "objects": [
                    {"ems_ref": "h-1", "name": "esx-1"}
                ]
            },
            {
                "name": "vms",
                "manager_ref": ["ems_ref"],
                "secondary_refs": {"by_name": ["name"]},
                "dependency_attributes": ["host"],
                "objects": [
                    {
                        "ems_ref": "vm-1",
                        "name": "web",
                        "host": {"$lazy": {"collection": "hosts", "data": {"ems_ref": "h-1"}}},
                        "host_name": {"$lazy": {"collection": "hosts", "data": "h-0", "key": "name"}}
                    },
                    {
                        "ems_ref": "vm-2",
                        "name": "db",
                        "host": {"$lazy": {"collection": "hosts", "data": {"ems_ref": "h-2"}}},
                        "flavor": {"$lazy": {"collection": "flavors", "data": "f-1", "key": "name", "default": "small"}}
                    }
                ]
            },
            {
                "name": "flavors",
                "parallel_safe": false
            }
        ]
    })
}

fn inventory() -> Inventory {
    let document: InventoryDocument = serde_json::from_value(document()).unwrap();
    Inventory::from_document(document).unwrap()
}

#[test]
fn test_document_builds_collections_in_order() {
    let inventory = inventory();
    let names: Vec<_> = inventory
        .collections()
        .iter()
        .map(|c| c.spec().name.clone())
        .collect();
    assert_eq!(names, vec!["hosts", "vms", "flavors"]);
    assert_eq!(inventory.collection("vms").unwrap().objects().len(), 2);
    assert!(!inventory.collection("flavors").unwrap().spec().parallel_safe);
}

#[test]
fn test_lazy_values_precreate_placeholders() {
    let inventory = inventory();
    let hosts = inventory.collection("hosts").unwrap();
    let placeholders: Vec<_> = hosts
        .skeletal_objects()
        .iter()
        .map(|p| p.manager_uuid())
        .collect();
    // h-1 has full data; h-2 exists only as a placeholder.
    assert_eq!(placeholders, vec!["h-2"]);
    assert!(inventory.collection("flavors").unwrap().skeletal_objects().is_empty());
}

#[test]
fn test_resolve_report() {
    let inventory = inventory();
    let report = inventory.resolve(&LazyResolver::default()).unwrap();

    assert_eq!(report.objects.len(), 3);
    let vm1 = report
        .objects
        .iter()
        .find(|o| o.identity.manager_uuid == "vm-1")
        .unwrap();
    assert_eq!(vm1.attributes["host_name"], json!("legacy"));
    assert_eq!(vm1.attributes["host"]["$entity"]["manager_uuid"], json!("h-1"));

    let vm2 = report
        .objects
        .iter()
        .find(|o| o.identity.manager_uuid == "vm-2")
        .unwrap();
    assert_eq!(vm2.attributes["flavor"], json!("small"));
    assert_eq!(vm2.attributes["host"]["$entity"]["manager_uuid"], json!("h-2"));

    assert_eq!(report.placeholders.len(), 1);
    assert_eq!(report.placeholders[0].to_string(), "hosts/h-2");

    assert_eq!(report.unconnected_edges.len(), 1);
    let edge = &report.unconnected_edges[0];
    assert_eq!(edge.owner.to_string(), "vms/vm-2");
    assert_eq!(edge.attribute, "flavor");
    assert_eq!(edge.target, "flavors:manager_ref(ems_ref: f-1).name");
}

#[test]
fn test_dependencies_per_collection() {
    let inventory = inventory();
    let scans = inventory.dependencies(&LazyResolver::default());

    assert!(scans["hosts"].is_empty());
    assert!(scans["flavors"].is_empty());
    let vms = &scans["vms"];
    let deps: Vec<_> = vms.dependencies().into_iter().collect();
    assert_eq!(deps, vec!["hosts".to_string()]);
    assert!(vms.dependency_attributes.contains_key("host"));
    assert!(!vms.dependency_attributes.contains_key("host_name"));
    assert!(!vms.dependency_attributes.contains_key("flavor"));
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("inventory.json");
    fs::write(&path, serde_json::to_string_pretty(&document()).unwrap()).unwrap();

    let inventory = Inventory::load(&path).unwrap();
    assert_eq!(inventory.collections().len(), 3);
}

#[test]
fn test_unparseable_file_is_inventory_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{").unwrap();

    match Inventory::load(&path) {
        Err(InventoryError::Inventory { path: reported, .. }) => {
            assert!(reported.ends_with("broken.json"));
        }
        Err(other) => panic!("expected inventory error, got {other}"),
        Ok(_) => panic!("expected inventory error"),
    }
}

#[test]
fn test_missing_file_is_inventory_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");

    match Inventory::load(&path) {
        Err(InventoryError::Inventory { message, path: reported }) => {
            assert!(message.starts_with("failed to read inventory"));
            assert!(reported.ends_with("absent.json"));
        }
        Err(other) => panic!("expected inventory error, got {other}"),
        Ok(_) => panic!("expected inventory error"),
    }
}

#[test]
fn test_unknown_collection_in_lazy_value() {
    let document: InventoryDocument = serde_json::from_value(json!({
        "collections": [{
            "name": "vms",
            "objects": [{"ems_ref": "vm-1", "host": {"$lazy": {"collection": "hosts", "data": "h-1"}}}]
        }]
    }))
    .unwrap();

    match Inventory::from_document(document) {
        Err(InventoryError::UnknownCollection { name }) => assert_eq!(name, "hosts"),
        Err(other) => panic!("expected unknown collection, got {other}"),
        Ok(_) => panic!("expected unknown collection"),
    }
}

#[test]
fn test_duplicate_collection_is_rejected() {
    let document: InventoryDocument = serde_json::from_value(json!({
        "collections": [{"name": "vms"}, {"name": "vms"}]
    }))
    .unwrap();

    let err = Inventory::from_document(document).err().unwrap();
    assert!(err.to_string().contains("duplicate collection 'vms'"));
}

#[test]
fn test_scalar_data_needs_single_key_reference() {
    let document: InventoryDocument = serde_json::from_value(json!({
        "collections": [
            {"name": "hosts", "manager_ref": ["ems_ref", "region"]},
            {"name": "vms", "objects": [
                {"ems_ref": "vm-1", "host": {"$lazy": {"collection": "hosts", "data": "h-1"}}}
            ]}
        ]
    }))
    .unwrap();

    let err = Inventory::from_document(document).err().unwrap();
    assert!(err.to_string().contains("single-key reference"));
}
