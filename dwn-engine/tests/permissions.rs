// SPDX-License-Identifier: MIT OR Apache-2.0

//! Permission lifecycle: grant issuance and revoke convergence.
mod common;

use dwn_core::builder::{PermissionsGrantBuilder, PermissionsRevokeBuilder};
use dwn_core::{Cid, Timestamp};
use dwn_store::{EventLog, Filter, FilterValue, MessageStore};

use common::{Actor, TestDwn, actor, actor_with_two_keys, engine};

fn base_timestamp() -> Timestamp {
    "2023-01-14T10:30:00.000000Z".parse().unwrap()
}

async fn issue_grant(dwn: &TestDwn, alice: &Actor, bob: &Actor, timestamp: Timestamp) -> Cid {
    let grant = PermissionsGrantBuilder::new()
        .granted_to(bob.did.clone())
        .granted_by(alice.did.clone())
        .granted_for(alice.did.clone())
        .message_timestamp(timestamp)
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let cid = grant.cid().unwrap();

    let reply = dwn
        .process_message(&alice.did, grant.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 202, "{}", reply.status.detail);
    cid
}

fn revoke_filter(grant_id: Cid) -> Filter {
    let mut filter = Filter::new();
    filter.insert(
        "interface".to_string(),
        FilterValue::Equals("Permissions".to_string()),
    );
    filter.insert(
        "method".to_string(),
        FilterValue::Equals("Revoke".to_string()),
    );
    filter.insert(
        "permissionsGrantId".to_string(),
        FilterValue::Equals(grant_id.to_string()),
    );
    filter
}

// Alice issues a grant to Bob and later revokes it.
#[tokio::test]
async fn grant_then_revoke() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    let timestamp = base_timestamp();
    let grant_id = issue_grant(&dwn, &alice, &bob, timestamp).await;

    let revoke = PermissionsRevokeBuilder::new()
        .permissions_grant_id(grant_id)
        .message_timestamp(timestamp.plus_seconds(10).unwrap())
        .sign(&alice.kid, &alice.key)
        .unwrap();

    let reply = dwn
        .process_message(&alice.did, revoke.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 202, "{}", reply.status.detail);
}

// A revoke citing an unknown grant is a malformed reference.
#[tokio::test]
async fn revoke_without_grant() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");

    let revoke = PermissionsRevokeBuilder::new()
        .permissions_grant_id(Cid::of_raw(b"no such grant"))
        .sign(&alice.kid, &alice.key)
        .unwrap();

    let reply = dwn
        .process_message(&alice.did, revoke.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 400);
    assert!(
        reply.status.detail.contains("Could not find PermissionsGrant"),
        "{}",
        reply.status.detail
    );
}

// A revoke dated before the grant it cites is rejected.
#[tokio::test]
async fn revoke_timestamp_precedes_grant() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    let earlier = base_timestamp();
    let grant_id = issue_grant(&dwn, &alice, &bob, earlier.plus_seconds(1).unwrap()).await;

    let revoke = PermissionsRevokeBuilder::new()
        .permissions_grant_id(grant_id)
        .message_timestamp(earlier)
        .sign(&alice.kid, &alice.key)
        .unwrap();

    let reply = dwn
        .process_message(&alice.did, revoke.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 400);
    assert!(
        reply
            .status
            .detail
            .contains("earlier date than associated PermissionsGrant"),
        "{}",
        reply.status.detail
    );
}

// Only the principal the grant was issued for may revoke it.
#[tokio::test]
async fn unauthorized_revoker() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    let timestamp = base_timestamp();
    let grant_id = issue_grant(&dwn, &alice, &bob, timestamp).await;

    let revoke = PermissionsRevokeBuilder::new()
        .permissions_grant_id(grant_id)
        .message_timestamp(timestamp.plus_seconds(10).unwrap())
        .sign(&bob.kid, &bob.key)
        .unwrap();

    let reply = dwn.process_message(&alice.did, revoke.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 401);
    assert!(
        reply
            .status
            .detail
            .contains("PermissionsRevokeUnauthorizedRevoke"),
        "{}",
        reply.status.detail
    );
}

// A second revoke with a later timestamp is superseded by the stored one.
#[tokio::test]
async fn later_revoke_is_superseded() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    let timestamp = base_timestamp();
    let grant_id = issue_grant(&dwn, &alice, &bob, timestamp).await;

    let first = PermissionsRevokeBuilder::new()
        .permissions_grant_id(grant_id)
        .message_timestamp(timestamp.plus_seconds(10).unwrap())
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, first.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202);

    let second = PermissionsRevokeBuilder::new()
        .permissions_grant_id(grant_id)
        .message_timestamp(timestamp.plus_seconds(20).unwrap())
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, second.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 409, "{}", reply.status.detail);
}

// With identical timestamps the lexicographically smaller CID wins.
#[tokio::test]
async fn same_timestamp_ties_break_on_cid() {
    let (dwn, resolver) = engine();
    let (alice, alice_second_key) = actor_with_two_keys(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    let timestamp = base_timestamp();
    let grant_id = issue_grant(&dwn, &alice, &bob, timestamp).await;
    let revoke_timestamp = timestamp.plus_seconds(10).unwrap();

    // Identical descriptors signed by two different keys yield two distinct
    // message CIDs over the same instant.
    let mut revokes = vec![
        PermissionsRevokeBuilder::new()
            .permissions_grant_id(grant_id)
            .message_timestamp(revoke_timestamp)
            .sign(&alice.kid, &alice.key)
            .unwrap(),
        PermissionsRevokeBuilder::new()
            .permissions_grant_id(grant_id)
            .message_timestamp(revoke_timestamp)
            .sign(&alice_second_key.kid, &alice_second_key.key)
            .unwrap(),
    ];
    revokes.sort_by_key(|revoke| revoke.cid().unwrap());

    let reply = dwn
        .process_message(&alice.did, revokes[0].to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 202, "{}", reply.status.detail);

    let reply = dwn
        .process_message(&alice.did, revokes[1].to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 409, "{}", reply.status.detail);

    let stored = dwn
        .message_store()
        .query(&alice.did, &revoke_filter(grant_id))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].cid, revokes[0].cid().unwrap());
}

// A retroactive earlier revoke replaces the stored one and splices its
// event out of the log.
#[tokio::test]
async fn earlier_revoke_purges_later() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    let timestamp = base_timestamp();
    let grant_id = issue_grant(&dwn, &alice, &bob, timestamp).await;

    let early = PermissionsRevokeBuilder::new()
        .permissions_grant_id(grant_id)
        .message_timestamp(timestamp.plus_seconds(10).unwrap())
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let late = PermissionsRevokeBuilder::new()
        .permissions_grant_id(grant_id)
        .message_timestamp(timestamp.plus_seconds(20).unwrap())
        .sign(&alice.kid, &alice.key)
        .unwrap();

    let reply = dwn.process_message(&alice.did, late.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202);

    let events = dwn.event_log().events(&alice.did, None).await.unwrap().events;
    assert_eq!(events.len(), 2);
    assert_eq!(events.last(), Some(&late.cid().unwrap()));

    let reply = dwn.process_message(&alice.did, early.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 202, "{}", reply.status.detail);

    let events = dwn.event_log().events(&alice.did, None).await.unwrap().events;
    assert_eq!(events.len(), 2);
    assert_eq!(events.last(), Some(&early.cid().unwrap()));

    // The superseded revoke is tombstoned everywhere.
    assert!(
        dwn.message_store()
            .get(&alice.did, late.cid().unwrap())
            .await
            .unwrap()
            .is_none()
    );

    // Every logged event is resolvable against the live store: replaying
    // the log reconstructs it.
    for event in events {
        assert!(
            dwn.message_store()
                .get(&alice.did, event)
                .await
                .unwrap()
                .is_some()
        );
    }
}

// Submitting the stored revoke again changes nothing.
#[tokio::test]
async fn duplicate_revoke_is_idempotent() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    let timestamp = base_timestamp();
    let grant_id = issue_grant(&dwn, &alice, &bob, timestamp).await;

    let revoke = PermissionsRevokeBuilder::new()
        .permissions_grant_id(grant_id)
        .message_timestamp(timestamp.plus_seconds(10).unwrap())
        .sign(&alice.kid, &alice.key)
        .unwrap();

    for _ in 0..2 {
        let reply = dwn.process_message(&alice.did, revoke.to_value().unwrap()).await;
        assert_eq!(reply.status.code, 202, "{}", reply.status.detail);
    }

    let events = dwn.event_log().events(&alice.did, None).await.unwrap().events;
    assert_eq!(events.len(), 2);
}

// Any submission order of the same revoke set converges to the revoke with
// the smallest (timestamp, cid) key.
#[tokio::test]
async fn revokes_converge_under_any_submission_order() {
    let resolver = dwn_core::KeyResolver::new();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");
    let timestamp = base_timestamp();

    const ORDERS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in ORDERS {
        let dwn = dwn_engine::Dwn::in_memory(resolver.clone());
        let grant_id = issue_grant(&dwn, &alice, &bob, timestamp).await;

        let revokes: Vec<_> = (1..=3)
            .map(|n| {
                PermissionsRevokeBuilder::new()
                    .permissions_grant_id(grant_id)
                    .message_timestamp(timestamp.plus_seconds(10 * n).unwrap())
                    .sign(&alice.kid, &alice.key)
                    .unwrap()
            })
            .collect();

        for index in order {
            let reply = dwn
                .process_message(&alice.did, revokes[index].to_value().unwrap())
                .await;
            assert!(
                reply.status.code == 202 || reply.status.code == 409,
                "{}",
                reply.status.detail
            );
        }

        let stored = dwn
            .message_store()
            .query(&alice.did, &revoke_filter(grant_id))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1, "order {order:?}");
        assert_eq!(
            stored[0].cid,
            revokes[0].cid().unwrap(),
            "order {order:?} must converge on the earliest revoke"
        );
    }
}

// Grants are owner-issued: nobody else may mint them, and the scope fields
// must be self-consistent.
#[tokio::test]
async fn grant_issuance_is_guarded() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");
    let bob = actor(&resolver, "bob");

    // Bob cannot issue grants in Alice's data space.
    let foreign = PermissionsGrantBuilder::new()
        .granted_to(bob.did.clone())
        .granted_by(bob.did.clone())
        .granted_for(alice.did.clone())
        .sign(&bob.kid, &bob.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, foreign.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 401);

    // grantedFor must be the tenant the message is processed against.
    let misdirected = PermissionsGrantBuilder::new()
        .granted_to(bob.did.clone())
        .granted_by(alice.did.clone())
        .granted_for(bob.did.clone())
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn
        .process_message(&alice.did, misdirected.to_value().unwrap())
        .await;
    assert_eq!(reply.status.code, 400);

    // An expiry at or before issuance is malformed.
    let timestamp = base_timestamp();
    let expired = PermissionsGrantBuilder::new()
        .granted_to(bob.did.clone())
        .granted_by(alice.did.clone())
        .granted_for(alice.did.clone())
        .message_timestamp(timestamp)
        .date_expires(timestamp)
        .sign(&alice.kid, &alice.key)
        .unwrap();
    let reply = dwn.process_message(&alice.did, expired.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 400);
}

// Signatures from unregistered principals fail authentication.
#[tokio::test]
async fn unresolvable_signer_is_rejected() {
    let (dwn, resolver) = engine();
    let alice = actor(&resolver, "alice");

    let stranger = Actor {
        did: dwn_core::Did::new("did:example:stranger"),
        kid: "did:example:stranger#key-1".to_string(),
        key: dwn_core::PrivateKey::new(),
    };

    let revoke = PermissionsRevokeBuilder::new()
        .permissions_grant_id(Cid::of_raw(b"anything"))
        .sign(&stranger.kid, &stranger.key)
        .unwrap();

    let reply = dwn.process_message(&alice.did, revoke.to_value().unwrap()).await;
    assert_eq!(reply.status.code, 401);
}
