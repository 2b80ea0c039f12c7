//! Integration coverage for the availability-protocol subscription consumer
//! against its public API only (no access to private fields like the
//! in-crate unit test that forces the flush timer).

use syncr_p2p::availability::{AvailabilityConsumer, AvailabilityMessage, ObjType, ObjectId};

fn obj(id: &str) -> ObjectId {
	ObjectId { obj_type: ObjType::File, obj_id: id.into() }
}

#[test]
fn flushing_250_subscriptions_splits_into_priority_singletons_and_batches() {
	let mut consumer = AvailabilityConsumer::new();
	for i in 0..250 {
		consumer.subscribe(obj(&format!("f{i}")), "peer1");
	}
	assert_eq!(consumer.pending_count(), 250);

	let flushed = consumer.flush();
	let envelopes = &flushed["peer1"];

	// 5 priority singletons, then ceil(245/100) = 3 batches.
	assert_eq!(envelopes.len(), 8);
	for envelope in &envelopes[..5] {
		assert_eq!(envelope.len(), 1);
		assert!(matches!(envelope[0], AvailabilityMessage::InfoRequest { .. }));
	}
	assert_eq!(envelopes[5].len(), 100);
	assert_eq!(envelopes[6].len(), 100);
	assert_eq!(envelopes[7].len(), 45);

	assert_eq!(consumer.pending_count(), 0);
}

#[test]
fn subscribe_is_idempotent_per_object_peer_pair() {
	let mut consumer = AvailabilityConsumer::new();
	let object = obj("shared.txt");
	consumer.subscribe(object.clone(), "peer1");
	consumer.subscribe(object.clone(), "peer1");
	assert_eq!(consumer.pending_count(), 1);

	consumer.unsubscribe(&object, "peer1");
	assert_eq!(consumer.pending_count(), 0);
}

#[test]
fn flush_marks_every_drained_subscription_as_subscribed() {
	let mut consumer = AvailabilityConsumer::new();
	let object = obj("doc.pdf");
	consumer.subscribe(object.clone(), "peer1");
	consumer.flush();
	assert_eq!(
		consumer.state_of(&object, "peer1"),
		syncr_p2p::availability::ConsumerState::Subscribed
	);
}
