use proptest::prelude::*;
use ripple_core::prelude::*;
use ripple_test_utils::{init_tracing, user_schema, CountingListener, DirtyRow};
use std::panic::{catch_unwind, AssertUnwindSafe};

#[test]
fn test_batch_coalesces_writes() {
    init_tracing();
    let record = Record::new(user_schema());
    let listener = CountingListener::attach(&record);

    {
        let _batch = record.batch_changes();
        for i in 0..25 {
            record.set("counter", i);
        }
        record.set("tags", Value::list(["a"]));
        let tags = record.get("tags").unwrap();
        tags.as_list().unwrap().push("b");
        assert_eq!(listener.count(), 0);
    }

    assert_eq!(listener.count(), 1);
    assert!(!record.has_pending_change());
}

#[test]
fn test_nested_batches_deliver_at_outermost_exit() {
    let record = Record::new(user_schema());
    let listener = CountingListener::attach(&record);

    let outer = record.batch_changes();
    record.set("a", 1);
    {
        let _inner = record.batch_changes();
        record.set("b", 2);
        assert_eq!(record.suppression_depth(), 2);
    }
    assert_eq!(listener.count(), 0);
    assert_eq!(record.suppression_depth(), 1);

    drop(outer);
    assert_eq!(listener.count(), 1);
    assert_eq!(record.suppression_depth(), 0);
}

#[test]
fn test_batch_reaches_host_owner_once() {
    let record = Record::new(user_schema());
    let row = DirtyRow::new();
    row.attach("profile", &record);

    {
        let _batch = record.batch_changes();
        record.set("a", 1);
        record.set("b", 2);
    }

    assert_eq!(row.marks(), vec![".profile".to_string()]);
}

#[test]
fn test_panic_inside_batch_restores_depth() {
    let record = Record::new(user_schema());
    let listener = CountingListener::attach(&record);

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _batch = record.batch_changes();
        record.set("a", 1);
        panic!("host code failed mid-batch");
    }));

    assert!(result.is_err());
    assert_eq!(record.suppression_depth(), 0);
    assert_eq!(listener.count(), 1);

    record.set("a", 2);
    assert_eq!(listener.count(), 2);
}

#[test]
fn test_early_return_inside_batch_restores_depth() {
    fn update(record: &Record, fail: bool) -> Result<(), TrackingError> {
        let _batch = record.batch_changes();
        record.set("a", 1);
        if fail {
            return Err(TrackingError::UnknownSchema("bail".to_string()));
        }
        record.set("b", 2);
        Ok(())
    }

    let record = Record::new(user_schema());
    let listener = CountingListener::attach(&record);

    assert!(update(&record, true).is_err());
    assert_eq!(record.suppression_depth(), 0);
    assert_eq!(listener.count(), 1);
}

#[test]
fn test_batch_without_changes_is_silent() {
    let record = Record::new(user_schema());
    let listener = CountingListener::attach(&record);

    {
        let _batch = record.batch_changes();
        record.set("__internal", 1);
        let _ = record.get("missing");
    }

    assert_eq!(listener.count(), 0);
}

proptest! {
    #[test]
    fn prop_any_batch_delivers_at_most_once(
        writes in proptest::collection::vec(0..5i64, 0..40),
        nesting in 1..5usize,
    ) {
        let record = Record::new(user_schema());
        let listener = CountingListener::attach(&record);

        {
            let guards: Vec<_> = (0..nesting).map(|_| record.batch_changes()).collect();
            for (i, value) in writes.iter().enumerate() {
                record.set(format!("f{}", i % 3), *value);
            }
            prop_assert_eq!(listener.count(), 0);
            drop(guards);
        }

        let expected = usize::from(!writes.is_empty());
        prop_assert_eq!(listener.count(), expected);
        prop_assert_eq!(record.suppression_depth(), 0);
    }
}
