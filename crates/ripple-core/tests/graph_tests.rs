use pretty_assertions::assert_eq;
use ripple_core::prelude::*;
use ripple_core::RawList;
use ripple_test_utils::{init_tracing, nested_maps, schema_with_depth, user_schema, CountingListener};

#[test]
fn test_shared_list_notifies_each_owner_once() {
    init_tracing();
    let a = Record::new(user_schema());
    let b = Record::new(user_schema());
    a.set("L", Value::list([1, 2]));
    b.set("L", a.get("L").unwrap());

    let hits_a = CountingListener::attach(&a);
    let hits_b = CountingListener::attach(&b);

    a.get("L").unwrap().as_list().unwrap().push(3);

    assert_eq!(hits_a.count(), 1);
    assert_eq!(hits_b.count(), 1);
    let expected = vec![Value::from(1), Value::from(2), Value::from(3)];
    assert_eq!(a.get("L").unwrap().as_list().unwrap().to_vec(), expected);
    assert_eq!(b.get("L").unwrap().as_list().unwrap().to_vec(), expected);
}

#[test]
fn test_self_containing_list_wraps_to_itself() {
    let raw = RawList::new();
    raw.push(1);
    raw.push(Value::RawList(raw.clone()));

    let record = Record::new(user_schema());
    record.set("loop", Value::RawList(raw.clone()));
    let listener = CountingListener::attach(&record);

    let wrapped = record.get("loop").unwrap();
    let list = wrapped.as_list().unwrap();
    assert!(list.get(1).unwrap().same(&wrapped));

    list.push(2);
    assert_eq!(listener.count(), 1);

    list.clear();
    raw.clear();
}

#[test]
fn test_two_node_cycle_terminates() {
    let first = TrackedMap::new();
    let second = TrackedMap::new();
    first.insert("next", second.clone());
    second.insert("next", first.clone());

    let record = Record::new(user_schema());
    record.set("graph", first.clone());
    let listener = CountingListener::attach(&record);

    second.insert("payload", 1);
    assert_eq!(listener.count(), 1);

    first.clear();
    second.clear();
}

#[test]
fn test_diamond_shares_one_instance() {
    let shared = Value::list([1]);
    let record = Record::new(user_schema());
    record.set("pair", Value::map([("left", shared.clone()), ("right", shared)]));
    let listener = CountingListener::attach(&record);

    let pair = record.get("pair").unwrap();
    let pair = pair.as_map().unwrap();
    let left = pair.get("left").unwrap();
    let right = pair.get("right").unwrap();
    assert!(left.same(&right));

    left.as_list().unwrap().push(2);
    assert_eq!(listener.count(), 1);
    assert_eq!(right.as_list().unwrap().len(), 2);
}

#[test]
fn test_diamond_through_two_parents_delivers_once() {
    let shared = TrackedList::new();
    let left = TrackedMap::new();
    let right = TrackedMap::new();
    left.insert("items", shared.clone());
    right.insert("items", shared.clone());

    let record = Record::new(user_schema());
    record.set("left", left);
    record.set("right", right);
    let listener = CountingListener::attach(&record);

    shared.push(1);
    assert_eq!(listener.count(), 1);
    assert_eq!(shared.owner_count(), 2);
}

#[test]
fn test_depth_ceiling_boundary() {
    let record = Record::new(schema_with_depth(2));
    record.set("root", nested_maps(4));
    let listener = CountingListener::attach(&record);

    let level0 = record.get("root").unwrap();
    let level1 = level0.as_map().unwrap().get("next").unwrap();
    let level2 = level1.as_map().unwrap().get("next").unwrap();
    let level3 = level2.as_map().unwrap().get("next").unwrap();

    assert!(level2.is_tracked());
    assert!(level3.is_raw());

    level2.as_map().unwrap().insert("k", 1);
    assert_eq!(listener.count(), 1);

    level3.as_raw_map().unwrap().insert("k", 1);
    assert_eq!(listener.count(), 1);
}

#[test]
fn test_tracked_record_inside_container_propagates() {
    let parent = Record::new(user_schema());
    let child = Record::new(user_schema());
    parent.set("children", Value::list([Value::Record(child.clone())]));
    let listener = CountingListener::attach(&parent);

    child.set("name", "ada");
    assert_eq!(listener.count(), 1);
}

#[test]
fn test_unlinked_value_no_longer_notifies() {
    let record = Record::new(user_schema());
    record.set("tags", Value::list(["a"]));
    let tags = record.get("tags").unwrap();
    let listener = CountingListener::attach(&record);

    record.remove("tags");
    assert_eq!(listener.count(), 1);

    tags.as_list().unwrap().push("b");
    assert_eq!(listener.count(), 1);
}

#[test]
fn test_structural_equality_of_tracked_and_raw() {
    let record = Record::new(user_schema());
    record.set("tags", Value::list([1, 2]));

    assert_eq!(record.get("tags").unwrap(), Value::list([1, 2]));
}
