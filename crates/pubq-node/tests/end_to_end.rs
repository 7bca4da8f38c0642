use pubq_core::{MsgId, Score, Timestamp};
use pubq_node::{Broker, BrokerConfig, NewMessage};
use pubq_store::MemoryStore;

fn at(raw: &str) -> Timestamp {
    Timestamp::new(raw)
}

fn id(raw: &str) -> MsgId {
    MsgId::parse(raw).expect("test ids should be valid")
}

fn message(raw_id: &str, score: f64, payload: &[u8], expire_at: &str) -> NewMessage {
    NewMessage {
        id: id(raw_id),
        score: Score(score),
        payload: payload.to_vec(),
        expire_at: at(expire_at),
    }
}

#[test]
fn fan_out_message_is_collected_after_last_ack() {
    let broker = Broker::new(MemoryStore::new(), BrokerConfig::default());
    let now = at("2024-05-01T10:00:00.000000");

    broker
        .publish("t", "p1", message("m1", 1.0, b"hello", "2099-01-01T00:00:00.000000"), &now)
        .expect("publish should succeed");
    let outcome = broker.dispatch("t", &["c1", "c2"]).expect("dispatch should succeed");
    assert_eq!(outcome.ids, vec![id("m1")]);
    assert_eq!(outcome.pushes, 2);
    assert_eq!(broker.message(&id("m1")).expect("read").unacked, Some(2));

    for consumer in ["c1", "c2"] {
        let leased = broker.lease(consumer, &now).expect("lease should succeed");
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].id, id("m1"));
        assert_eq!(leased[0].payload.as_deref(), Some(&b"hello"[..]));
    }

    let first = broker.ack("c1", &[id("m1")]).expect("ack should succeed");
    assert_eq!(first.acked, vec![id("m1")]);
    assert!(first.collected.is_empty());
    let record = broker.message(&id("m1")).expect("read");
    assert_eq!(record.unacked, Some(1));
    assert_eq!(record.body.as_deref(), Some(&b"hello"[..]));

    let second = broker.ack("c2", &[id("m1")]).expect("ack should succeed");
    assert_eq!(second.collected, vec![id("m1")]);
    assert!(broker.message(&id("m1")).expect("read").is_collected());
    for consumer in ["c1", "c2"] {
        assert_eq!(broker.depth(consumer).expect("depth").in_flight, 0);
    }
}

#[test]
fn fifo_dispatch_leases_lowest_score_first() {
    let broker = Broker::new(MemoryStore::new(), BrokerConfig::default());
    let now = at("2024-05-01T10:00:00.000000");
    for (raw, score) in [("m3", 3.0), ("m1", 1.0), ("m2", 2.0)] {
        broker
            .publish("t", "p1", message(raw, score, raw.as_bytes(), "2099-01-01T00:00:00.000000"), &now)
            .expect("publish should succeed");
    }
    broker.dispatch("t", &["c1"]).expect("dispatch should succeed");

    let leased: Vec<MsgId> = broker
        .lease("c1", &now)
        .expect("lease should succeed")
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(leased, vec![id("m1"), id("m2"), id("m3")]);
}

#[test]
fn rejected_message_is_leased_again() {
    let broker = Broker::new(MemoryStore::new(), BrokerConfig::default());
    let now = at("2024-05-01T10:00:00.000000");
    broker
        .publish("t", "p1", message("m1", 1.0, b"x", "2099-01-01T00:00:00.000000"), &now)
        .expect("publish should succeed");
    broker.dispatch("t", &["c1"]).expect("dispatch should succeed");
    broker.lease("c1", &now).expect("lease should succeed");

    assert_eq!(broker.reject("c1", &[id("m1")]).expect("reject should succeed"), 1);
    let again = broker.lease("c1", &now).expect("lease should succeed");
    assert_eq!(again.len(), 1);
    assert_eq!(broker.message(&id("m1")).expect("read").unacked, Some(1));
}

#[test]
fn expired_message_is_swept_unless_in_flight() {
    let broker = Broker::new(MemoryStore::new(), BrokerConfig::default());
    let publish_time = at("2024-05-01T09:00:00.000000");
    let now = at("2024-05-01T10:00:00.000000");
    broker
        .publish("t", "p1", message("old", 1.0, b"a", "2024-05-01T09:30:00.000000"), &publish_time)
        .expect("publish should succeed");
    broker
        .publish("t", "p1", message("busy", 2.0, b"b", "2024-05-01T09:30:00.000000"), &publish_time)
        .expect("publish should succeed");
    broker
        .publish("t", "p1", message("fresh", 3.0, b"c", "2099-01-01T00:00:00.000000"), &publish_time)
        .expect("publish should succeed");
    broker.dispatch("t", &["c1"]).expect("dispatch should succeed");

    // Lease everything, then hand back the two that are not busy.
    broker.lease("c1", &now).expect("lease should succeed");
    broker
        .reject("c1", &[id("old"), id("fresh")])
        .expect("reject should succeed");

    let expired = broker.sweep("c1", &now).expect("sweep should succeed");
    assert_eq!(expired, vec![id("old")]);
    assert!(broker.message(&id("old")).expect("read").is_collected());
    assert!(!broker.message(&id("busy")).expect("read").is_collected());
    assert!(!broker.message(&id("fresh")).expect("read").is_collected());

    broker.purge("c1", &expired).expect("purge should succeed");
    let leased: Vec<MsgId> = broker
        .lease("c1", &now)
        .expect("lease should succeed")
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(leased, vec![id("fresh")]);
}

#[test]
fn stale_leases_are_reclaimed() {
    let broker = Broker::new(MemoryStore::new(), BrokerConfig::default());
    let early = at("2024-05-01T09:00:00.000000");
    let late = at("2024-05-01T11:00:00.000000");
    broker
        .publish("t", "p1", message("m1", 1.0, b"x", "2099-01-01T00:00:00.000000"), &early)
        .expect("publish should succeed");
    broker.dispatch("t", &["c1"]).expect("dispatch should succeed");
    broker.lease("c1", &early).expect("lease should succeed");

    let reclaimed = broker
        .reclaim("c1", &at("2024-05-01T10:00:00.000000"))
        .expect("reclaim should succeed");
    assert_eq!(reclaimed, vec![id("m1")]);
    let depth = broker.depth("c1").expect("depth");
    assert_eq!((depth.queued, depth.in_flight), (1, 0));

    broker.lease("c1", &late).expect("lease should succeed");
    let none = broker
        .reclaim("c1", &at("2024-05-01T10:00:00.000000"))
        .expect("reclaim should succeed");
    assert!(none.is_empty());
}
