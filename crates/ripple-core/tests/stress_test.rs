use ripple_core::prelude::*;
use ripple_core::TokenSlot;
use ripple_test_utils::{token_of, user_schema, CountingListener, DirtyRow};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const THREADS: usize = 8;
const OPS: usize = 200;

#[test]
fn test_concurrent_pushes_all_land_and_notify() {
    let record = Record::new(user_schema());
    record.set("events", Value::list(Vec::<Value>::new()));
    let listener = CountingListener::attach(&record);
    let events = record.get("events").unwrap().as_list().unwrap().clone();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let events = events.clone();
            scope.spawn(move || {
                for i in 0..OPS {
                    events.push((t * OPS + i) as i64);
                }
            });
        }
    });

    assert_eq!(events.len(), THREADS * OPS);
    assert_eq!(listener.count(), THREADS * OPS);
}

#[test]
fn test_concurrent_token_creation_agrees() {
    let record = Record::new(user_schema());

    let tokens: Vec<Token> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS).map(|_| scope.spawn(|| record.token())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(tokens.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_concurrent_linking_from_many_owners() {
    let shared = TrackedMap::new();
    let records: Vec<_> = (0..THREADS).map(|_| Record::new(user_schema())).collect();

    thread::scope(|scope| {
        for record in &records {
            let shared = shared.clone();
            scope.spawn(move || record.set("shared", shared));
        }
    });

    assert_eq!(shared.owner_count(), THREADS);
    let listeners: Vec<_> = records.iter().map(CountingListener::attach).collect();
    shared.insert("k", 1);
    assert!(listeners.iter().all(|l| l.count() == 1));
}

#[test]
fn test_concurrent_batches_on_separate_records() {
    let rows: Vec<_> = (0..THREADS).map(|_| DirtyRow::new()).collect();
    let records: Vec<_> = rows
        .iter()
        .map(|row| {
            let record = Record::new(user_schema());
            row.attach("data", &record);
            record
        })
        .collect();

    thread::scope(|scope| {
        for record in &records {
            scope.spawn(move || {
                let _batch = record.batch_changes();
                for i in 0..OPS {
                    record.set("n", i as i64);
                }
            });
        }
    });

    assert!(rows.iter().all(|row| row.count() == 1));
}

#[test]
fn test_concurrent_owner_churn() {
    let shared = TrackedList::new();
    let slot_owners: Vec<_> = (0..THREADS).map(|_| (DirtyRow::new(), TokenSlot::new())).collect();

    thread::scope(|scope| {
        for (row, slot) in &slot_owners {
            let shared = shared.clone();
            scope.spawn(move || {
                let token = token_of(row, slot);
                for i in 0..OPS {
                    shared.owner_links().link(token.clone(), LinkKey::Index(i));
                    shared.push(i as i64);
                    shared.owner_links().unlink(&token);
                }
            });
        }
    });

    assert_eq!(shared.owner_count(), 0);
    assert_eq!(shared.len(), THREADS * OPS);
}

#[test]
fn test_notifications_survive_link_churn() {
    const PUSHES: usize = 20_000;

    let record = Record::new(user_schema());
    record.set("items", Value::list(Vec::<Value>::new()));
    let listener = CountingListener::attach(&record);
    let items = record.get("items").unwrap();
    let list = items.as_list().unwrap().clone();
    let churners: Vec<_> = (0..4).map(|_| Record::new(user_schema())).collect();
    let stop = AtomicBool::new(false);

    thread::scope(|scope| {
        for churner in &churners {
            let (items, stop) = (items.clone(), &stop);
            scope.spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    churner.set("shared", items.clone());
                    churner.remove("shared");
                }
            });
        }
        for i in 0..PUSHES {
            list.push(i as i64);
        }
        stop.store(true, Ordering::Relaxed);
    });

    assert_eq!(list.len(), PUSHES);
    assert_eq!(listener.count(), PUSHES);
}
