//! End-to-end engine scenarios over in-memory collaborators.

use quiver_core::{
    EngineConfig, EngineError, GroupConfig, Incoming, MemoryRelay, MemoryStorage, MemoryTransport,
    MessagingEngine, Partition, Priority, Storage,
};
use quiver_crypto::IdentityConfig;

type Engine = MessagingEngine<MemoryStorage, MemoryTransport, MemoryRelay>;

struct Harness {
    transport: MemoryTransport,
    relay: MemoryRelay,
    alice_storage: MemoryStorage,
    alice: Engine,
    bob: Engine,
}

fn engine(
    id: &str,
    storage: MemoryStorage,
    transport: MemoryTransport,
    relay: MemoryRelay,
    now: u64,
) -> Engine {
    let config =
        EngineConfig { local_id: id.to_string(), identity: IdentityConfig::default() };
    MessagingEngine::new(storage, transport, relay, config, now).unwrap()
}

/// Two engines sharing one transport fabric, with a session already
/// established between them.
async fn paired(now: u64) -> Harness {
    let transport = MemoryTransport::new();
    let relay = MemoryRelay::new();
    let alice_storage = MemoryStorage::new();

    let alice = engine("alice", alice_storage.clone(), transport.clone(), relay.clone(), now);
    let bob = engine("bob", MemoryStorage::new(), transport.clone(), relay.clone(), now);

    let bundle = bob.prekey_bundle(now).await.unwrap();
    let invite = alice.establish_session("bob", &bundle, now).await.unwrap();
    bob.accept_session("alice", invite.identity, invite.ephemeral, now).await.unwrap();

    alice.set_online(true, now).await.unwrap();
    bob.set_online(true, now).await.unwrap();

    Harness { transport, relay, alice_storage, alice, bob }
}

/// Latest payload delivered to a peer over the direct transport.
fn last_delivery(transport: &MemoryTransport, peer: &str) -> Vec<u8> {
    transport
        .delivered()
        .iter()
        .rev()
        .find(|(recipient, _)| recipient == peer)
        .map(|(_, payload)| payload.clone())
        .unwrap()
}

#[tokio::test]
async fn direct_message_round_trip_with_ack() {
    let h = paired(1000).await;
    h.transport.connect("bob");
    h.transport.connect("alice");

    let message_id =
        h.alice.send_message("bob", b"hello world", Priority::Normal, 1001).await.unwrap();

    let payload = last_delivery(&h.transport, "bob");
    let incoming = h.bob.receive(&payload, 1002).await.unwrap();
    let Incoming::Message(message) = incoming else {
        panic!("expected a message");
    };
    assert_eq!(message.plaintext, b"hello world");
    assert_eq!(message.sender_id, "alice");
    assert_eq!(message.message_id, message_id);

    // Bob acked back over the transport; Alice consumes it.
    let ack_payload = last_delivery(&h.transport, "alice");
    let incoming = h.alice.receive(&ack_payload, 1003).await.unwrap();
    let Incoming::Ack { message_id: acked } = incoming else {
        panic!("expected an ack");
    };
    assert_eq!(acked, message_id);
}

#[tokio::test]
async fn replayed_envelope_is_rejected() {
    let h = paired(1000).await;
    h.transport.connect("bob");
    h.transport.connect("alice");

    h.alice.send_message("bob", b"once only", Priority::Normal, 1001).await.unwrap();
    let payload = last_delivery(&h.transport, "bob");

    h.bob.receive(&payload, 1002).await.unwrap();
    let err = h.bob.receive(&payload, 1003).await.unwrap_err();
    assert!(matches!(err, EngineError::CounterMismatch { .. }));
}

#[tokio::test]
async fn conversation_alternates_both_directions() {
    let h = paired(1000).await;
    h.transport.connect("bob");
    h.transport.connect("alice");

    for round in 0..5u64 {
        let now = 1001 + round;
        h.alice
            .send_message("bob", format!("ping {round}").as_bytes(), Priority::Normal, now)
            .await
            .unwrap();
        let Incoming::Message(message) =
            h.bob.receive(&last_delivery(&h.transport, "bob"), now).await.unwrap()
        else {
            panic!("expected a message");
        };
        assert_eq!(message.plaintext, format!("ping {round}").as_bytes());

        h.bob
            .send_message("alice", format!("pong {round}").as_bytes(), Priority::Normal, now)
            .await
            .unwrap();
        let Incoming::Message(message) =
            h.alice.receive(&last_delivery(&h.transport, "alice"), now).await.unwrap()
        else {
            panic!("expected a message");
        };
        assert_eq!(message.plaintext, format!("pong {round}").as_bytes());
    }
}

#[tokio::test]
async fn safety_numbers_match_on_both_sides() {
    let h = paired(1000).await;

    let ours = h.alice.safety_number_with("bob", 1001).await.unwrap();
    let theirs = h.bob.safety_number_with("alice", 1001).await.unwrap();

    assert_eq!(ours, theirs);
    // Eight uppercase hex blocks of four characters.
    assert_eq!(ours.split(' ').count(), 8);
    assert!(ours.split(' ').all(|block| block.len() == 4));
}

#[tokio::test]
async fn sending_without_a_session_fails() {
    let transport = MemoryTransport::new();
    let relay = MemoryRelay::new();
    let alice =
        engine("alice", MemoryStorage::new(), transport, relay, 1000);

    let err = alice.send_message("stranger", b"hi", Priority::Normal, 1001).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionMissing { .. }));
}

#[tokio::test]
async fn offline_messages_drain_through_the_relay_on_reconnect() {
    let h = paired(1000).await;
    h.alice.set_online(false, 1000).await.unwrap();

    // Queued while offline; nothing moves.
    h.alice.send_message("bob", b"stored", Priority::High, 1001).await.unwrap();
    assert!(h.transport.delivered().is_empty());
    assert!(h.relay.drain().is_empty());

    // Bob has no direct path, so the drain falls back to the relay.
    let report = h.alice.set_online(true, 1002).await.unwrap();
    assert_eq!(report.sent, 1);

    let posted = h.relay.drain();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].0, "bob");

    let incoming = h.bob.receive(&posted[0].1, 1003).await.unwrap();
    let Incoming::Message(message) = incoming else {
        panic!("expected a message");
    };
    assert_eq!(message.plaintext, b"stored");
}

#[tokio::test]
async fn engine_restart_resumes_sessions_from_storage() {
    let h = paired(1000).await;
    h.transport.connect("bob");
    h.transport.connect("alice");

    h.alice.send_message("bob", b"before restart", Priority::Normal, 1001).await.unwrap();
    h.bob.receive(&last_delivery(&h.transport, "bob"), 1001).await.unwrap();
    h.alice.shutdown().await.unwrap();
    drop(h.alice);

    let restarted = engine(
        "alice",
        h.alice_storage.clone(),
        h.transport.clone(),
        h.relay.clone(),
        1002,
    );
    restarted.set_online(true, 1002).await.unwrap();

    restarted.send_message("bob", b"after restart", Priority::Normal, 1003).await.unwrap();
    let Incoming::Message(message) =
        h.bob.receive(&last_delivery(&h.transport, "bob"), 1004).await.unwrap()
    else {
        panic!("expected a message");
    };
    assert_eq!(message.plaintext, b"after restart");
}

#[tokio::test]
async fn group_lifecycle_is_admin_gated() {
    let transport = MemoryTransport::new();
    let relay = MemoryRelay::new();
    let alice = engine("alice", MemoryStorage::new(), transport.clone(), relay.clone(), 1000);
    alice.set_online(true, 1000).await.unwrap();

    alice
        .create_group(
            "room",
            &["bob".to_string(), "carol".to_string()],
            GroupConfig::default(),
            1000,
        )
        .await
        .unwrap();

    let delivery = alice
        .send_group_message("room", b"welcome", Priority::Normal, 1001)
        .await
        .unwrap();
    assert!(delivery.failures.is_empty());
    let mut recipients = delivery.recipients.clone();
    recipients.sort();
    assert_eq!(recipients, vec!["bob".to_string(), "carol".to_string()]);

    // Both members were unreachable directly, so the fan-out went to
    // the relay.
    assert_eq!(relay.drain().len(), 2);

    alice.remove_group_member("room", "carol", 1002).await.unwrap();
    let delivery = alice
        .send_group_message("room", b"smaller room", Priority::Normal, 1003)
        .await
        .unwrap();
    assert_eq!(delivery.recipients, vec!["bob".to_string()]);
}

#[tokio::test]
async fn group_messages_are_acknowledged_by_members() {
    let transport = MemoryTransport::new();
    let relay = MemoryRelay::new();
    let alice_storage = MemoryStorage::new();
    let bob_storage = MemoryStorage::new();

    let alice =
        engine("alice", alice_storage.clone(), transport.clone(), relay.clone(), 1000);
    alice
        .create_group("room", &["bob".to_string()], GroupConfig::default(), 1000)
        .await
        .unwrap();

    // Bob picks up the shared group state when his engine starts.
    let record = alice_storage.get(Partition::Secure, "group/room").unwrap().unwrap();
    bob_storage.put(Partition::Secure, "group/room", &record).unwrap();
    let bob = engine("bob", bob_storage, transport.clone(), relay.clone(), 1000);

    alice.set_online(true, 1000).await.unwrap();
    bob.set_online(true, 1000).await.unwrap();
    transport.connect("bob");
    transport.connect("alice");

    let delivery = alice
        .send_group_message("room", b"hello room", Priority::Normal, 1001)
        .await
        .unwrap();
    assert_eq!(delivery.recipients, vec!["bob".to_string()]);

    let Incoming::Message(message) =
        bob.receive(&last_delivery(&transport, "bob"), 1002).await.unwrap()
    else {
        panic!("expected a message");
    };
    assert_eq!(message.group_id.as_deref(), Some("room"));
    assert_eq!(message.plaintext, b"hello room");

    // Bob's ack came back over the transport and names the fan-out
    // message id.
    let Incoming::Ack { message_id } =
        alice.receive(&last_delivery(&transport, "alice"), 1003).await.unwrap()
    else {
        panic!("expected an ack");
    };
    assert_eq!(message_id, delivery.message_id);
}

#[tokio::test]
async fn lost_responder_session_is_rebuilt_once_from_the_stored_handshake() {
    let transport = MemoryTransport::new();
    let relay = MemoryRelay::new();
    let bob_storage = MemoryStorage::new();

    let alice =
        engine("alice", MemoryStorage::new(), transport.clone(), relay.clone(), 1000);
    let bob = engine("bob", bob_storage.clone(), transport.clone(), relay.clone(), 1000);
    let bundle = bob.prekey_bundle(1000).await.unwrap();
    let invite = alice.establish_session("bob", &bundle, 1000).await.unwrap();
    bob.accept_session("alice", invite.identity, invite.ephemeral, 1000).await.unwrap();
    alice.set_online(true, 1000).await.unwrap();
    transport.connect("bob");
    transport.connect("alice");

    alice.send_message("bob", b"first", Priority::Normal, 1001).await.unwrap();
    let first = last_delivery(&transport, "bob");

    // Bob's session record vanishes before he sees the message.
    bob_storage.delete(Partition::Secure, "session/alice").unwrap();
    drop(bob);
    let bob = engine("bob", bob_storage.clone(), transport.clone(), relay.clone(), 1001);

    let Incoming::Message(message) = bob.receive(&first, 1002).await.unwrap() else {
        panic!("expected a message");
    };
    assert_eq!(message.plaintext, b"first");

    // The conversation continues on the rebuilt session.
    alice.send_message("bob", b"second", Priority::Normal, 1003).await.unwrap();
    let Incoming::Message(message) =
        bob.receive(&last_delivery(&transport, "bob"), 1004).await.unwrap()
    else {
        panic!("expected a message");
    };
    assert_eq!(message.plaintext, b"second");

    // A second loss is permanent.
    bob_storage.delete(Partition::Secure, "session/alice").unwrap();
    drop(bob);
    let bob = engine("bob", bob_storage, transport.clone(), relay, 1005);

    alice.send_message("bob", b"third", Priority::Normal, 1006).await.unwrap();
    let err = bob.receive(&last_delivery(&transport, "bob"), 1007).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionMissing { .. }));
}

#[tokio::test]
async fn maintenance_rotates_an_expired_identity() {
    let h = paired(1000).await;

    let month = 31 * 24 * 60 * 60;
    let report = h.alice.maintain(1000 + month).await.unwrap();
    assert!(report.identity_rotated);

    // A second pass inside the fresh key's lifetime does nothing.
    let report = h.alice.maintain(1001 + month).await.unwrap();
    assert!(!report.identity_rotated);
}

#[tokio::test]
async fn compromised_identity_blocks_nothing_after_rotation() {
    let h = paired(1000).await;
    h.transport.connect("bob");

    h.alice.mark_identity_compromised(1001).await.unwrap();

    // Ratchet sessions are unaffected by an identity rotation; the
    // new identity only matters for future handshakes.
    h.alice.send_message("bob", b"still flows", Priority::Normal, 1002).await.unwrap();
    let Incoming::Message(message) =
        h.bob.receive(&last_delivery(&h.transport, "bob"), 1003).await.unwrap()
    else {
        panic!("expected a message");
    };
    assert_eq!(message.plaintext, b"still flows");
}
