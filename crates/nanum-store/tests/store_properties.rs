//! Property tests for Store implementations
//!
//! - Memory and redb backends agree on every document after the same writes
//! - Query results are ordered, filtered and bounded by the limit
//! - Chaotic failures never leave partial batches behind

use std::time::Duration;

use nanum_store::{
    Batch, ChaoticStore, Clock, CollectionPath, Direction, DocId, FieldOp, FilterOp, ManualClock,
    MemoryStore, Patch, Query, RedbStore, Store, StoreError, Timestamp, Value,
};
use proptest::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Write {
    Add { text: u8 },
    Join { doc: u8, user: u8 },
    Leave { doc: u8, user: u8 },
    Delete { doc: u8 },
    Tick { millis: u16 },
}

fn write_strategy() -> impl Strategy<Value = Write> {
    prop_oneof![
        any::<u8>().prop_map(|text| Write::Add { text }),
        (0u8..8, 0u8..4).prop_map(|(doc, user)| Write::Join { doc, user }),
        (0u8..8, 0u8..4).prop_map(|(doc, user)| Write::Leave { doc, user }),
        (0u8..8).prop_map(|doc| Write::Delete { doc }),
        any::<u16>().prop_map(|millis| Write::Tick { millis }),
    ]
}

fn messages() -> CollectionPath {
    CollectionPath::root("chatRooms").doc("r").collection("messages")
}

/// Apply one write, ignoring NotFound (both backends must agree on it anyway).
fn apply<S: Store>(store: &S, clock: &ManualClock, write: &Write) -> Result<(), StoreError> {
    let doc = |n: u8| messages().doc(format!("{:016x}", u64::from(n)));
    let result = match write {
        Write::Add { text } => store
            .add(&messages(), &Patch::new().set("text", i64::from(*text)).server_timestamp("createdAt"))
            .map(|_| ()),
        Write::Join { doc: n, user } => store.update(
            &doc(*n),
            &Patch::new().with("readBy", FieldOp::ArrayUnion(vec![format!("u{user}").into()])),
        ),
        Write::Leave { doc: n, user } => store.update(
            &doc(*n),
            &Patch::new().with("readBy", FieldOp::ArrayRemove(vec![format!("u{user}").into()])),
        ),
        Write::Delete { doc: n } => store.delete(&doc(*n)),
        Write::Tick { millis } => {
            clock.advance(Duration::from_millis(u64::from(*millis)));
            Ok(())
        },
    };
    match result {
        Err(StoreError::NotFound { .. }) => Ok(()),
        other => other,
    }
}

#[test]
fn prop_memory_and_redb_agree() {
    proptest!(ProptestConfig::with_cases(32), |(writes in prop::collection::vec(write_strategy(), 1..40))| {
        let dir = tempdir().expect("tempdir");
        let memory_clock = ManualClock::starting_at(Timestamp::from_secs(1));
        let redb_clock = ManualClock::starting_at(Timestamp::from_secs(1));
        let memory = MemoryStore::with_clock(memory_clock.clone());
        let redb = RedbStore::open_with_clock(dir.path().join("store.redb"), redb_clock.clone())
            .expect("open failed");

        for write in &writes {
            apply(&memory, &memory_clock, write).expect("memory write failed");
            apply(&redb, &redb_clock, write).expect("redb write failed");
        }

        let query = Query::collection(messages()).order_by("createdAt", Direction::Ascending);
        let from_memory = memory.query(&query).expect("memory query failed");
        let from_redb = redb.query(&query).expect("redb query failed");

        // ORACLE: identical documents in identical order
        prop_assert_eq!(from_memory, from_redb);
    });
}

#[test]
fn prop_query_respects_order_filter_and_limit() {
    proptest!(|(
        writes in prop::collection::vec(write_strategy(), 1..60),
        limit in 1usize..10,
    )| {
        let clock = ManualClock::starting_at(Timestamp::from_secs(1));
        let store = MemoryStore::with_clock(clock.clone());
        for write in &writes {
            apply(&store, &clock, write).expect("write failed");
        }

        let query = Query::collection(messages())
            .filter("readBy", FilterOp::ArrayContains("u1".into()))
            .order_by("createdAt", Direction::Descending)
            .limit(limit);
        let docs = store.query(&query).expect("query failed");

        prop_assert!(docs.len() <= limit);
        for doc in &docs {
            let read_by = doc.field("readBy").and_then(Value::as_array).unwrap_or_default();
            prop_assert!(read_by.contains(&Value::from("u1")));
        }
        for pair in docs.windows(2) {
            let newer = pair[0].timestamp_field("createdAt");
            let older = pair[1].timestamp_field("createdAt");
            prop_assert!(newer >= older);
            if newer == older {
                prop_assert!(pair[0].id() > pair[1].id());
            }
        }
    });
}

#[test]
fn prop_chaotic_batches_are_atomic() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        batch_count in 1usize..30,
    )| {
        let inner = MemoryStore::new();
        let ids: Vec<_> = (0..3)
            .map(|i| inner.add(&messages(), &Patch::new().set("n", i64::from(i))).expect("add failed"))
            .collect();
        let store = ChaoticStore::with_seed(inner, failure_rate, seed);

        let mut committed = 0i64;
        for _ in 0..batch_count {
            let mut batch = Batch::new();
            for id in &ids {
                batch.update(messages().doc(id.clone()), Patch::new().with("hits", FieldOp::Increment(1)));
            }
            match store.commit(&batch) {
                Ok(()) => committed += 1,
                Err(StoreError::Io(_)) => {},
                Err(e) => panic!("Unexpected error: {e:?}"),
            }
        }

        // ORACLE: every document saw exactly the committed batches
        for id in &ids {
            let doc = store.inner().get(&messages().doc(id.clone())).expect("get failed").expect("document should exist");
            let hits = doc.field("hits").and_then(Value::as_int).unwrap_or(0);
            prop_assert_eq!(hits, committed);
        }
    });
}

#[test]
fn server_timestamps_never_go_backwards() {
    let clock = ManualClock::starting_at(Timestamp::from_secs(10));
    let store = MemoryStore::with_clock(clock.clone());

    let first = store.add(&messages(), &Patch::new().server_timestamp("createdAt")).expect("add failed");
    clock.set(Timestamp::from_secs(5));
    let second = store.add(&messages(), &Patch::new().server_timestamp("createdAt")).expect("add failed");

    let at = |id: DocId| {
        store
            .get(&messages().doc(id))
            .expect("get failed")
            .and_then(|d| d.timestamp_field("createdAt"))
    };
    assert!(at(second) >= at(first));
    assert_eq!(clock.now(), Timestamp::from_secs(10));
}
