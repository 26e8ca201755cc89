use ripple_core::prelude::*;
use ripple_core::{Coerce, CoerceError, PropagationPolicy, TokenSlot, TrackingError, Wave};
use ripple_test_utils::{
    failing_token, init_tracing, token_of, user_schema, CountingListener, DirtyRow, FailingOwner,
    FlagOnlyOwner,
};
use std::sync::Arc;

#[test]
fn test_host_row_marked_with_column() {
    init_tracing();
    let record = Record::new(user_schema());
    let row = DirtyRow::new();
    row.attach("payload", &record);

    record.set("tags", Value::list([1]));
    record.get("tags").unwrap().as_list().unwrap().push(2);

    assert_eq!(row.marks(), vec![".payload".to_string(), ".payload".to_string()]);
}

#[test]
fn test_flag_modified_fallback() {
    let record = Record::new(user_schema());
    let owner = FlagOnlyOwner::new();
    let slot = TokenSlot::new();
    record.link_owner(token_of(&owner, &slot), LinkKey::None);

    record.set("a", 1);
    assert_eq!(owner.flags(), 1);
}

#[test]
fn test_dead_host_owner_is_skipped() {
    let record = Record::new(user_schema());
    let listener = CountingListener::attach(&record);
    {
        let row = DirtyRow::new();
        row.attach("payload", &record);
        assert_eq!(record.owner_count(), 1);
    }

    record.set("a", 1);
    assert_eq!(listener.count(), 1);
    assert_eq!(record.owner_count(), 0);
}

#[test]
fn test_dropped_record_leaves_container_usable() {
    let tags = TrackedList::new();
    {
        let record = Record::new(user_schema());
        record.set("tags", tags.clone());
        assert_eq!(tags.owner_count(), 1);
    }

    tags.push(1);
    assert_eq!(tags.owner_count(), 0);
    assert_eq!(tags.len(), 1);
}

#[test]
fn test_unlink_owner_stops_delivery() {
    let record = Record::new(user_schema());
    let row = DirtyRow::new();
    row.attach("payload", &record);

    assert!(record.unlink_owner(&row.token()));
    assert!(!record.unlink_owner(&row.token()));

    record.set("a", 1);
    assert_eq!(row.count(), 0);
}

#[test]
fn test_failure_ceiling_limits_fan_out() {
    let schema = RecordSchema::new("user").with_propagation(PropagationPolicy {
        max_failures: 10,
        ..PropagationPolicy::default()
    });
    let record = Record::new(schema);
    let owners: Vec<_> = (0..15).map(|_| FailingOwner::new()).collect();
    for owner in &owners {
        record.link_owner(failing_token(owner), LinkKey::None);
    }

    record.set("a", 1);

    let calls: usize = owners.iter().map(|o| o.calls()).sum();
    assert_eq!(calls, 10);
}

#[test]
fn test_failing_owner_does_not_block_healthy_owner() {
    let record = Record::new(user_schema());
    let failing = FailingOwner::new();
    let row = DirtyRow::new();
    record.link_owner(failing_token(&failing), LinkKey::None);
    row.attach("payload", &record);

    record.set("a", 1);

    assert_eq!(failing.calls(), 1);
    assert_eq!(row.count(), 1);
}

#[test]
fn test_notify_reports_delivery() {
    let links = ripple_core::OwnerLinks::new();
    let row = DirtyRow::new();
    let failing = FailingOwner::new();
    links.link(row.token(), LinkKey::field("a"));
    links.link(failing_token(&failing), LinkKey::field("b"));

    let delivery = ripple_core::notify("test", &links, &PropagationPolicy::default(), &mut Wave::new());

    assert_eq!(delivery.delivered, 1);
    assert_eq!(delivery.failures, 1);
    assert!(!delivery.aborted);
    assert!(!delivery.truncated);
}

#[test]
fn test_container_listener_order_record_then_owner() {
    let record = Record::new(user_schema());
    let row = DirtyRow::new();
    row.attach("payload", &record);

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let row_view = Arc::clone(&row);
    record.subscribe(move |_: &Record| {
        log.lock().push(row_view.count());
    });

    record.set("a", 1);

    assert_eq!(*seen.lock(), vec![0]);
    assert_eq!(row.count(), 1);
}

#[test]
fn test_coercion_failure_keeps_raw_mapping() {
    let address = Arc::new(RecordSchema::new("address").with_required("city"));
    let user = Record::new(RecordSchema::new("user").with_nested("home", address));
    let listener = CountingListener::attach(&user);

    user.set("home", Value::map([("street", "Main")]));

    let home = user.get("home").unwrap();
    assert!(home.as_map().is_some());
    assert_eq!(listener.count(), 1);

    home.as_map().unwrap().insert("city", "Oslo");
    assert_eq!(listener.count(), 2);
}

struct UpperCoercer;

impl Coerce for UpperCoercer {
    fn coerce(&self, schema: &Arc<RecordSchema>, value: &Value) -> Result<Record, CoerceError> {
        let text = value
            .as_str()
            .ok_or_else(|| CoerceError::Custom(format!("expected text, got {}", value.kind_name())))?;
        let record = Record::new(Arc::clone(schema));
        record.set("name", text.to_uppercase());
        Ok(record)
    }
}

#[test]
fn test_custom_coercer() {
    let tag = Arc::new(RecordSchema::new("tag").with_coercer(UpperCoercer));
    let post = Record::new(RecordSchema::new("post").with_nested("tag", tag));

    post.set("tag", "rust");

    let tag = post.get("tag").unwrap();
    assert_eq!(tag.as_record().unwrap().get("name"), Some(Value::from("RUST")));
}

#[test]
fn test_strict_assignment_surfaces_coercion_failure() {
    let address = Arc::new(RecordSchema::new("address").with_required("city"));
    let user = Record::new(RecordSchema::new("user").with_nested("home", address));
    let row = DirtyRow::new();
    row.attach("payload", &user);

    let err = user.try_set("home", Value::map([("street", "Main")])).unwrap_err();
    assert!(matches!(err, TrackingError::Coerce(_)));
    assert_eq!(row.count(), 0);

    user.try_set("home", Value::map([("city", "Oslo")])).unwrap();
    assert_eq!(row.count(), 1);
}
