use ripple_core::prelude::*;
use ripple_core::ConfigError;
use ripple_test_utils::{init_tracing, nested_maps, CountingListener};

const SCHEMAS: &str = include_str!("fixtures/schemas.toml");

#[test]
fn test_fixture_loads() {
    let registry = SchemaRegistry::from_toml(SCHEMAS).unwrap();

    assert_eq!(registry.len(), 2);
    let user = registry.get("user").unwrap();
    assert_eq!(user.max_depth, 3);
    assert_eq!(user.depth_overflow, DepthOverflow::Warn);
    assert_eq!(user.propagation.max_failures, 2);
    assert_eq!(user.propagation.snapshot_retries, 5);
    assert!(user.skip.is_internal("_sa_instance_state"));
    assert!(user.skip.is_internal("session"));
}

#[test]
fn test_configured_schema_drives_records() {
    init_tracing();
    let registry = SchemaRegistry::from_toml(SCHEMAS).unwrap();
    let user = Record::new(registry.get("user").unwrap());
    let listener = CountingListener::attach(&user);

    user.set("session", Value::list([1]));
    assert_eq!(listener.count(), 0);

    user.set("home", Value::map([("city", "Lima")]));
    assert!(user.get("home").unwrap().as_record().is_some());

    user.set("deep", nested_maps(6));
    let mut level = user.get("deep").unwrap();
    for _ in 0..4 {
        level = level.as_map().unwrap().get("next").unwrap();
    }
    assert!(level.is_raw());
    assert_eq!(listener.count(), 2);
}

#[test]
fn test_loading_twice_reports_duplicate() {
    let registry = SchemaRegistry::from_toml(SCHEMAS).unwrap();
    let err = registry.load_toml(SCHEMAS).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateSchema(name) if name == "address"));
}

#[test]
fn test_zero_snapshot_retries_rejected() {
    let err = SchemaRegistry::from_toml(
        r#"
        [[schema]]
        name = "broken"
        propagation = { snapshot_retries = 0 }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_revive_through_configured_registry() {
    let registry = SchemaRegistry::from_toml(SCHEMAS).unwrap();
    let snapshot: RecordSnapshot = serde_json::from_str(
        r#"{ "schema": "user", "fields": { "home": { "city": "Quito" }, "tags": ["a"] } }"#,
    )
    .unwrap();

    let user = registry.revive(&snapshot).unwrap();
    let listener = CountingListener::attach(&user);

    assert!(user.get("home").unwrap().as_record().is_some());
    user.get("tags").unwrap().as_list().unwrap().push("b");
    assert_eq!(listener.count(), 1);
}
