// SPDX-License-Identifier: MIT OR Apache-2.0

//! Records convergence, reads, queries and deletes.
mod common;

use dwn_core::builder::{
    RecordsDeleteBuilder, RecordsQueryBuilder, RecordsReadBuilder, RecordsWriteBuilder,
};
use dwn_core::message::RecordsFilter;
use dwn_core::{Cid, Timestamp};
use dwn_store::{DataStore, EventLog};

use common::{actor, actor_with_two_keys, engine};

fn base_timestamp() -> Timestamp {
    "2023-01-14T10:30:00.000000Z".parse().unwrap()
}

#[tokio::test]
async fn write_then_read_round_trip() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");

    let write = RecordsWriteBuilder::new()
        .data(b"hello world".to_vec())
        .data_format("text/plain")
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let record_id = write.record_id.unwrap();

    let reply = dwn.process_message(&alice.did, write.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202, "{}", reply.status.detail);

    let read = RecordsReadBuilder::new()
        .record_id(record_id)
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, read.to_value().unwrap()).await;

    assert_eq!(reply.status.code, 200, "{}", reply.status.detail);
    assert_eq!(reply.data, Some(b"hello world".to_vec()));
    let entries = reply.entries.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].pointer("/recordId").and_then(|v| v.as_str()),
        Some(record_id.to_string().as_str())
    );
}

#[tokio::test]
async fn newer_write_supersedes_and_older_write_loses() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let timestamp = base_timestamp();

    let initial = RecordsWriteBuilder::new()
        .data(b"v1".to_vec())
        .data_format("text/plain")
        .message_timestamp(timestamp)
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let record_id = initial.record_id.unwrap();
    let reply = dwn.process_message(&alice.did, initial.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202);

    let update = RecordsWriteBuilder::new()
        .data(b"v2".to_vec())
        .data_format("text/plain")
        .record_id(record_id)
        .date_created(timestamp)
        .message_timestamp(timestamp.plus_seconds(20).unwrap())
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, update.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202, "{}", reply.status.detail);

    // A late-arriving write that is older in the total order is
    // acknowledged and discarded.
    let stale = RecordsWriteBuilder::new()
        .data(b"stale".to_vec())
        .data_format("text/plain")
        .record_id(record_id)
        .date_created(timestamp)
        .message_timestamp(timestamp.plus_seconds(10).unwrap())
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, stale.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202);

    let read = RecordsReadBuilder::new()
        .record_id(record_id)
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, read.to_value().unwrap()).await;
    assert_eq!(reply.data, Some(b"v2".to_vec()));

    // Records supersession does not splice the event log; both accepted
    // writes remain.
    let events = dwn.event_log().events(&alice.did, None).await.unwrap().events;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], initial.cid().unwrap());
    assert_eq!(events[1], update.cid().unwrap());
}

#[tokio::test]
async fn conflicting_initial_writes_are_rejected() {
    let (dwn, resolver) = engine();
    let (alice, alice_second_key) = actor_with_two_keys(&resolver, "alice");
    let timestamp = base_timestamp();

    // Identical descriptors signed by two keys: same derived record
    // identity, different message CIDs.
    let mut writes = vec![
        RecordsWriteBuilder::new()
            .data(b"seed".to_vec())
            .data_format("text/plain")
            .message_timestamp(timestamp)
            .sign(&alice.did, &alice.kid, &alice.key)
            .unwrap(),
        RecordsWriteBuilder::new()
            .data(b"seed".to_vec())
            .data_format("text/plain")
            .message_timestamp(timestamp)
            .sign(&alice.did, &alice_second_key.kid, &alice_second_key.key)
            .unwrap(),
    ];
    writes.sort_by_key(|write| write.cid().unwrap());
    assert_eq!(writes[0].record_id, writes[1].record_id);

    let reply = dwn
        .process_message(&alice.did, writes[0].to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 202, "{}", reply.status.detail);

    // The second write wins the (timestamp, cid) comparison, exposing the
    // initial-write collision.
    let reply = dwn
        .process_message(&alice.did, writes[1].to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 409, "{}", reply.status.detail);
    assert!(
        reply
            .status
            .detail
            .contains("RecordsWriteInitialWriteCollision"),
        "{}",
        reply.status.detail
    );
}

#[tokio::test]
async fn replaying_a_write_changes_nothing() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");

    let write = RecordsWriteBuilder::new()
        .data(b"hello".to_vec())
        .data_format("text/plain")
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();

    for _ in 0..2 {
        let reply = dwn.process_message(&alice.did, write.to_value().unwrap()).await;
        assert_eq!(reply.status.code, 202, "{}", reply.status.detail);
    }

    let events = dwn.event_log().events(&alice.did, None).await.unwrap().events;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn foreign_writers_and_readers_are_rejected_without_protocol() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    let foreign_write = RecordsWriteBuilder::new()
        .data(b"intrusion".to_vec())
        .sign(&alice.did, &bob.kid, &bob.key)
        .unwrap();
    let reply = dwn
        .process_message(&alice.did, foreign_write.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 401);

    let write = RecordsWriteBuilder::new()
        .data(b"private".to_vec())
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let record_id = write.record_id.unwrap();
    let reply = dwn.process_message(&alice.did, write.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202);

    let foreign_read = RecordsReadBuilder::new()
        .record_id(record_id)
        .sign(&bob.kid, &bob.key)
        .unwrap();
    let reply = dwn
        .process_message(&alice.did, foreign_read.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 401);

    let foreign_query = RecordsQueryBuilder::new()
        .sign(&bob.kid, &bob.key)
        .unwrap();
    let reply = dwn
        .process_message(&alice.did, foreign_query.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 401);
}

#[tokio::test]
async fn query_returns_latest_states_matching_the_filter() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let timestamp = base_timestamp();

    let note = RecordsWriteBuilder::new()
        .data(b"note".to_vec())
        .schema("https://example.com/note")
        .message_timestamp(timestamp)
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let todo = RecordsWriteBuilder::new()
        .data(b"todo".to_vec())
        .schema("https://example.com/todo")
        .message_timestamp(timestamp.plus_seconds(1).unwrap())
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();

    for message in [&note, &todo] {
        let reply = dwn
            .process_message(&alice.did, message.to_value().unwrap())
            .await;
        assert_eq!(reply.status.code, 202);
    }

    // Supersede the note; only the newest state may surface.
    let updated_note = RecordsWriteBuilder::new()
        .data(b"note v2".to_vec())
        .schema("https://example.com/note")
        .record_id(note.record_id.unwrap())
        .date_created(timestamp)
        .message_timestamp(timestamp.plus_seconds(2).unwrap())
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let reply = dwn
        .process_message(&alice.did, updated_note.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 202);

    let all = RecordsQueryBuilder::new()
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, all.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 200);
    assert_eq!(reply.entries.as_ref().unwrap().len(), 2);

    let notes_only = RecordsQueryBuilder::new()
        .filter(RecordsFilter {
            schema: Some("https://example.com/note".to_string()),
            ..RecordsFilter::default()
        })
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn
        .process_message(&alice.did, notes_only.to_value().unwrap())
        .await;
    let entries = reply.entries.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].pointer("/descriptor/dataCid").and_then(|v| v.as_str()),
        Some(Cid::of_raw(b"note v2").to_string().as_str())
    );
}

#[tokio::test]
async fn write_without_data_must_reference_held_data() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");

    let dangling = RecordsWriteBuilder::new()
        .data_reference(Cid::of_raw(b"never stored"), 12)
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let reply = dwn
        .process_message(&alice.did, dangling.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 400);
    assert!(
        reply.status.detail.contains("RecordsWriteDataMissing"),
        "{}",
        reply.status.detail
    );
}

#[tokio::test]
async fn delete_tombstones_the_record() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let timestamp = base_timestamp();

    let write = RecordsWriteBuilder::new()
        .data(b"ephemeral".to_vec())
        .message_timestamp(timestamp.plus_seconds(5).unwrap())
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let record_id = write.record_id.unwrap();
    let data_cid = write.descriptor.data_cid;
    let reply = dwn.process_message(&alice.did, write.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202);

    // An out-of-order delete older than the stored state is a conflict.
    let stale_delete = RecordsDeleteBuilder::new()
        .record_id(record_id)
        .message_timestamp(timestamp)
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn
        .process_message(&alice.did, stale_delete.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 409, "{}", reply.status.detail);

    let delete = RecordsDeleteBuilder::new()
        .record_id(record_id)
        .message_timestamp(timestamp.plus_seconds(10).unwrap())
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, delete.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202, "{}", reply.status.detail);

    let read = RecordsReadBuilder::new()
        .record_id(record_id)
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, read.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 404);

    assert_eq!(
        dwn.data_store()
            .get(&alice.did, record_id, data_cid)
            .await
            .unwrap(),
        None
    );

    // Deleting an already deleted record finds nothing to act on.
    let repeat = RecordsDeleteBuilder::new()
        .record_id(record_id)
        .message_timestamp(timestamp.plus_seconds(20).unwrap())
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, repeat.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 404);
}

#[tokio::test]
async fn update_to_unknown_record_is_rejected() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");

    let orphan = RecordsWriteBuilder::new()
        .data(b"orphan".to_vec())
        .record_id(Cid::of_raw(b"no such record"))
        .sign(&alice.did, &alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, orphan.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 400);
    assert!(
        reply
            .status
            .detail
            .contains("RecordsWriteInitialWriteMissing"),
        "{}",
        reply.status.detail
    );
}
