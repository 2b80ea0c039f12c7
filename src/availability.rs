//! Availability Protocol: advertising and querying which byte ranges of
//! which objects each peer holds (SPEC_FULL §4.4).
//!
//! A symmetric protocol layered over `ConnectivityManager`'s data channels.
//! The wire envelope and command/response shape is modeled on
//! `protocol/messages.rs`'s `ProtocolCommand`/`ProtocolResponse` pair; the
//! consumer/supplier split follows `protocol/traits.rs`'s `SyncProtocol`
//! async-trait boundary, generalized from a single SSH-subprocess peer to
//! many WebRTC peers tracked independently.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::error::AvailabilityError;

/// 32-bit magic cookie every envelope starts with.
pub const MAGIC_COOKIE: u32 = 0x7a52_fa73;

/// Up to this many sub-messages are packed into one envelope.
pub const MAX_BATCH_SIZE: usize = 100;

/// The first N pending subscriptions are sent individually ("priority")
/// rather than batched.
pub const PRIORITY_SUBSCRIPTION_COUNT: usize = 5;

/// How often the consumer flushes queued subscriptions into wire requests.
pub const SUBSCRIPTION_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjType {
	File,
	Patch,
}

impl ObjType {
	fn to_byte(self) -> u8 {
		match self {
			ObjType::File => 0,
			ObjType::Patch => 1,
		}
	}

	fn from_byte(b: u8) -> Result<Self, AvailabilityError> {
		match b {
			0 => Ok(ObjType::File),
			1 => Ok(ObjType::Patch),
			other => Err(AvailabilityError::Malformed { message: format!("bad obj_type {other}") }),
		}
	}
}

/// Byte range a peer holds of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
	pub offset: u64,
	pub length: u64,
}

/// Identity of an object tracked by the protocol.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId {
	pub obj_type: ObjType,
	pub obj_id: String,
}

/// One message of the Availability Protocol wire format.
#[derive(Clone, Debug, PartialEq)]
pub enum AvailabilityMessage {
	InfoRequest { object: ObjectId },
	InfoResponse { object: ObjectId, ranges: Vec<Range> },
	InfoAbort { object: ObjectId },
	InfoFailure { object: ObjectId, error: String },
	DataRequest { object: ObjectId, offset: u64, length: u64 },
	DataResponse { object: ObjectId, offset: u64, data: Vec<u8> },
	DataAbort { object: ObjectId, offset: Option<u64> },
	DataFailure { object: ObjectId, offset: u64, error: String },
}

const KIND_INFO_REQUEST: u8 = 0;
const KIND_INFO_RESPONSE: u8 = 1;
const KIND_INFO_ABORT: u8 = 2;
const KIND_INFO_FAILURE: u8 = 3;
const KIND_DATA_REQUEST: u8 = 4;
const KIND_DATA_RESPONSE: u8 = 5;
const KIND_DATA_ABORT: u8 = 6;
const KIND_DATA_FAILURE: u8 = 7;

fn put_string(buf: &mut Vec<u8>, s: &str) {
	let bytes = s.as_bytes();
	buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
	buf.extend_from_slice(bytes);
}

fn take_string(buf: &[u8], cursor: &mut usize) -> Result<String, AvailabilityError> {
	let len = take_u32(buf, cursor)? as usize;
	let end = *cursor + len;
	if end > buf.len() {
		return Err(AvailabilityError::Malformed { message: "truncated string".into() });
	}
	let s = String::from_utf8(buf[*cursor..end].to_vec())
		.map_err(|e| AvailabilityError::Malformed { message: e.to_string() })?;
	*cursor = end;
	Ok(s)
}

fn take_u8(buf: &[u8], cursor: &mut usize) -> Result<u8, AvailabilityError> {
	let b = *buf.get(*cursor).ok_or_else(|| AvailabilityError::Malformed { message: "truncated u8".into() })?;
	*cursor += 1;
	Ok(b)
}

fn take_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, AvailabilityError> {
	let end = *cursor + 4;
	let slice = buf.get(*cursor..end).ok_or_else(|| AvailabilityError::Malformed { message: "truncated u32".into() })?;
	*cursor = end;
	Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn take_u64(buf: &[u8], cursor: &mut usize) -> Result<u64, AvailabilityError> {
	let end = *cursor + 8;
	let slice = buf.get(*cursor..end).ok_or_else(|| AvailabilityError::Malformed { message: "truncated u64".into() })?;
	*cursor = end;
	Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

fn put_object(buf: &mut Vec<u8>, object: &ObjectId) {
	buf.push(object.obj_type.to_byte());
	put_string(buf, &object.obj_id);
}

fn take_object(buf: &[u8], cursor: &mut usize) -> Result<ObjectId, AvailabilityError> {
	let obj_type = ObjType::from_byte(take_u8(buf, cursor)?)?;
	let obj_id = take_string(buf, cursor)?;
	Ok(ObjectId { obj_type, obj_id })
}

impl AvailabilityMessage {
	/// Encode this message as a full envelope: magic cookie, kind
	/// discriminant, then the kind-specific payload.
	pub fn encode(&self) -> Vec<u8> {
		let mut buf = Vec::new();
		buf.extend_from_slice(&MAGIC_COOKIE.to_le_bytes());
		match self {
			AvailabilityMessage::InfoRequest { object } => {
				buf.push(KIND_INFO_REQUEST);
				put_object(&mut buf, object);
			}
			AvailabilityMessage::InfoResponse { object, ranges } => {
				buf.push(KIND_INFO_RESPONSE);
				put_object(&mut buf, object);
				buf.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
				for r in ranges {
					buf.extend_from_slice(&r.offset.to_le_bytes());
					buf.extend_from_slice(&r.length.to_le_bytes());
				}
			}
			AvailabilityMessage::InfoAbort { object } => {
				buf.push(KIND_INFO_ABORT);
				put_object(&mut buf, object);
			}
			AvailabilityMessage::InfoFailure { object, error } => {
				buf.push(KIND_INFO_FAILURE);
				put_object(&mut buf, object);
				put_string(&mut buf, error);
			}
			AvailabilityMessage::DataRequest { object, offset, length } => {
				buf.push(KIND_DATA_REQUEST);
				put_object(&mut buf, object);
				buf.extend_from_slice(&offset.to_le_bytes());
				buf.extend_from_slice(&length.to_le_bytes());
			}
			AvailabilityMessage::DataResponse { object, offset, data } => {
				buf.push(KIND_DATA_RESPONSE);
				put_object(&mut buf, object);
				buf.extend_from_slice(&offset.to_le_bytes());
				buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
				buf.extend_from_slice(data);
			}
			AvailabilityMessage::DataAbort { object, offset } => {
				buf.push(KIND_DATA_ABORT);
				put_object(&mut buf, object);
				buf.push(offset.is_some() as u8);
				buf.extend_from_slice(&offset.unwrap_or(0).to_le_bytes());
			}
			AvailabilityMessage::DataFailure { object, offset, error } => {
				buf.push(KIND_DATA_FAILURE);
				put_object(&mut buf, object);
				buf.extend_from_slice(&offset.to_le_bytes());
				put_string(&mut buf, error);
			}
		}
		buf
	}

	pub fn decode(buf: &[u8]) -> Result<Self, AvailabilityError> {
		let mut cursor = 0usize;
		let magic = take_u32(buf, &mut cursor)?;
		if magic != MAGIC_COOKIE {
			return Err(AvailabilityError::BadMagic { found: magic });
		}
		let kind = take_u8(buf, &mut cursor)?;
		Ok(match kind {
			KIND_INFO_REQUEST => AvailabilityMessage::InfoRequest { object: take_object(buf, &mut cursor)? },
			KIND_INFO_RESPONSE => {
				let object = take_object(buf, &mut cursor)?;
				let count = take_u32(buf, &mut cursor)? as usize;
				let mut ranges = Vec::with_capacity(count);
				for _ in 0..count {
					let offset = take_u64(buf, &mut cursor)?;
					let length = take_u64(buf, &mut cursor)?;
					ranges.push(Range { offset, length });
				}
				AvailabilityMessage::InfoResponse { object, ranges }
			}
			KIND_INFO_ABORT => AvailabilityMessage::InfoAbort { object: take_object(buf, &mut cursor)? },
			KIND_INFO_FAILURE => {
				let object = take_object(buf, &mut cursor)?;
				let error = take_string(buf, &mut cursor)?;
				AvailabilityMessage::InfoFailure { object, error }
			}
			KIND_DATA_REQUEST => {
				let object = take_object(buf, &mut cursor)?;
				let offset = take_u64(buf, &mut cursor)?;
				let length = take_u64(buf, &mut cursor)?;
				AvailabilityMessage::DataRequest { object, offset, length }
			}
			KIND_DATA_RESPONSE => {
				let object = take_object(buf, &mut cursor)?;
				let offset = take_u64(buf, &mut cursor)?;
				let len = take_u32(buf, &mut cursor)? as usize;
				let end = cursor + len;
				let data = buf
					.get(cursor..end)
					.ok_or_else(|| AvailabilityError::Malformed { message: "truncated data".into() })?
					.to_vec();
				cursor = end;
				AvailabilityMessage::DataResponse { object, offset, data }
			}
			KIND_DATA_ABORT => {
				let object = take_object(buf, &mut cursor)?;
				let has_offset = take_u8(buf, &mut cursor)? != 0;
				let offset = take_u64(buf, &mut cursor)?;
				AvailabilityMessage::DataAbort { object, offset: has_offset.then_some(offset) }
			}
			KIND_DATA_FAILURE => {
				let object = take_object(buf, &mut cursor)?;
				let offset = take_u64(buf, &mut cursor)?;
				let error = take_string(buf, &mut cursor)?;
				AvailabilityMessage::DataFailure { object, offset, error }
			}
			other => return Err(AvailabilityError::UnknownKind { kind: other }),
		})
	}
}

/// State of one (object, peer) pair on the wanting side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
	Unsubscribed,
	QueuedRequest,
	Subscribed,
}

/// Tracks subscriptions this node wants from peers and batches the wire
/// requests on a flush timer (SPEC_FULL §4.4, scenario S6).
pub struct AvailabilityConsumer {
	states: HashMap<(ObjectId, String), ConsumerState>,
	queued: Vec<(ObjectId, String)>,
	last_flush: Instant,
}

impl Default for AvailabilityConsumer {
	fn default() -> Self {
		Self::new()
	}
}

impl AvailabilityConsumer {
	pub fn new() -> Self {
		AvailabilityConsumer { states: HashMap::new(), queued: Vec::new(), last_flush: Instant::now() }
	}

	/// Queue interest in `object` held by `peer`. No wire traffic yet.
	pub fn subscribe(&mut self, object: ObjectId, peer: impl Into<String>) {
		let peer = peer.into();
		let key = (object.clone(), peer.clone());
		if self.states.contains_key(&key) {
			return;
		}
		self.states.insert(key.clone(), ConsumerState::QueuedRequest);
		self.queued.push(key);
	}

	pub fn unsubscribe(&mut self, object: &ObjectId, peer: &str) {
		self.states.remove(&(object.clone(), peer.to_string()));
		self.queued.retain(|(o, p)| !(o == object && p == peer));
	}

	pub fn mark_subscribed(&mut self, object: &ObjectId, peer: &str) {
		if let Some(state) = self.states.get_mut(&(object.clone(), peer.to_string())) {
			*state = ConsumerState::Subscribed;
		}
	}

	/// Whether it's been at least `SUBSCRIPTION_FLUSH_INTERVAL` since the
	/// last flush and there's at least one connected `node`-type peer.
	pub fn should_flush(&self, connected_node_peers: usize) -> bool {
		connected_node_peers > 0
			&& !self.queued.is_empty()
			&& self.last_flush.elapsed() >= SUBSCRIPTION_FLUSH_INTERVAL
	}

	/// Drain the queued set into wire envelopes: the first
	/// `PRIORITY_SUBSCRIPTION_COUNT` individually, the rest batched up to
	/// `MAX_BATCH_SIZE` per envelope. Returns one `Vec<AvailabilityMessage>`
	/// per envelope to send, grouped by peer.
	pub fn flush(&mut self) -> HashMap<String, Vec<Vec<AvailabilityMessage>>> {
		self.last_flush = Instant::now();
		let drained = std::mem::take(&mut self.queued);
		let mut by_peer: HashMap<String, Vec<ObjectId>> = HashMap::new();
		for (object, peer) in &drained {
			by_peer.entry(peer.clone()).or_default().push(object.clone());
			self.mark_subscribed(object, peer);
		}
		let mut out: HashMap<String, Vec<Vec<AvailabilityMessage>>> = HashMap::new();
		for (peer, objects) in by_peer {
			let mut envelopes = Vec::new();
			let (priority, rest) = objects.split_at(objects.len().min(PRIORITY_SUBSCRIPTION_COUNT));
			for object in priority {
				envelopes.push(vec![AvailabilityMessage::InfoRequest { object: object.clone() }]);
			}
			for chunk in rest.chunks(MAX_BATCH_SIZE) {
				envelopes.push(
					chunk
						.iter()
						.map(|object| AvailabilityMessage::InfoRequest { object: object.clone() })
						.collect(),
				);
			}
			out.insert(peer, envelopes);
		}
		out
	}

	pub fn state_of(&self, object: &ObjectId, peer: &str) -> ConsumerState {
		self.states.get(&(object.clone(), peer.to_string())).copied().unwrap_or(ConsumerState::Unsubscribed)
	}

	pub fn pending_count(&self) -> usize {
		self.queued.len()
	}
}

/// Peers subscribed to a locally-held object, and the ranges already
/// advertised to them (SPEC_FULL §4.4 supplier state machine).
#[derive(Default)]
struct Subscription {
	peers: HashSet<String>,
}

/// Serves availability info and data for objects this node is willing to
/// share.
#[derive(Default)]
pub struct AvailabilitySupplier {
	local_ranges: HashMap<ObjectId, Vec<Range>>,
	subscriptions: HashMap<ObjectId, Subscription>,
}

impl AvailabilitySupplier {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record that this node now holds `ranges` of `object`, replacing
	/// whatever was previously known.
	pub fn set_local_ranges(&mut self, object: ObjectId, ranges: Vec<Range>) {
		self.local_ranges.insert(object, ranges);
	}

	/// Handle an incoming INFO_REQUEST: FAILURE if the object isn't locally
	/// held at all, otherwise RESPONSE with the full known range set and the
	/// peer is registered as subscribed.
	pub fn handle_info_request(&mut self, object: &ObjectId, peer: &str) -> AvailabilityMessage {
		match self.local_ranges.get(object) {
			Some(ranges) => {
				self.subscriptions.entry(object.clone()).or_default().peers.insert(peer.to_string());
				AvailabilityMessage::InfoResponse { object: object.clone(), ranges: ranges.clone() }
			}
			None => AvailabilityMessage::InfoFailure {
				object: object.clone(),
				error: "object not locally held".into(),
			},
		}
	}

	/// A new range just became available (e.g. a DownloadManager completion
	/// callback): unicast a RESPONSE with just the new range to every
	/// subscribed peer, then drop the subscription if the object is now
	/// fully covered by `total_size`.
	pub fn announce_new_range(
		&mut self,
		object: &ObjectId,
		new_range: Range,
		total_size: Option<u64>,
	) -> Vec<(String, AvailabilityMessage)> {
		let ranges = self.local_ranges.entry(object.clone()).or_default();
		ranges.push(new_range);

		let peers: Vec<String> = self
			.subscriptions
			.get(object)
			.map(|s| s.peers.iter().cloned().collect())
			.unwrap_or_default();
		let message = AvailabilityMessage::InfoResponse { object: object.clone(), ranges: vec![new_range] };
		let out = peers.iter().map(|p| (p.clone(), message.clone())).collect();

		if let Some(total) = total_size {
			let covered: u64 = self.local_ranges.get(object).map(|rs| rs.iter().map(|r| r.length).sum()).unwrap_or(0);
			if covered >= total {
				self.subscriptions.remove(object);
			}
		}
		out
	}
}

/// Transport boundary used by both consumer and supplier to actually move
/// bytes, generalized from `protocol/traits.rs`'s `SyncProtocol` so the
/// availability layer doesn't depend on a specific data-channel
/// implementation.
#[async_trait]
pub trait AvailabilityTransport: Send + Sync {
	async fn send(&self, peer: &str, envelope: &[AvailabilityMessage]) -> Result<(), AvailabilityError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn obj(id: &str) -> ObjectId {
		ObjectId { obj_type: ObjType::File, obj_id: id.to_string() }
	}

	#[test]
	fn encode_decode_round_trip_every_variant() {
		let messages = vec![
			AvailabilityMessage::InfoRequest { object: obj("f1") },
			AvailabilityMessage::InfoResponse {
				object: obj("f1"),
				ranges: vec![Range { offset: 0, length: 10 }],
			},
			AvailabilityMessage::InfoAbort { object: obj("f1") },
			AvailabilityMessage::InfoFailure { object: obj("f1"), error: "nope".into() },
			AvailabilityMessage::DataRequest { object: obj("f1"), offset: 0, length: 10 },
			AvailabilityMessage::DataResponse { object: obj("f1"), offset: 0, data: vec![1, 2, 3] },
			AvailabilityMessage::DataAbort { object: obj("f1"), offset: Some(5) },
			AvailabilityMessage::DataAbort { object: obj("f1"), offset: None },
			AvailabilityMessage::DataFailure { object: obj("f1"), offset: 0, error: "boom".into() },
		];
		for m in messages {
			let encoded = m.encode();
			let decoded = AvailabilityMessage::decode(&encoded).unwrap();
			assert_eq!(m, decoded);
		}
	}

	#[test]
	fn decode_rejects_bad_magic() {
		let mut buf = vec![0u8; 16];
		buf[0] = 0xff;
		assert!(matches!(AvailabilityMessage::decode(&buf), Err(AvailabilityError::BadMagic { .. })));
	}

	#[test]
	fn supplier_fails_unknown_object() {
		let mut supplier = AvailabilitySupplier::new();
		let reply = supplier.handle_info_request(&obj("missing"), "peer1");
		assert!(matches!(reply, AvailabilityMessage::InfoFailure { .. }));
	}

	#[test]
	fn supplier_responds_and_drops_subscription_when_complete() {
		let mut supplier = AvailabilitySupplier::new();
		supplier.set_local_ranges(obj("f1"), vec![Range { offset: 0, length: 5 }]);
		let reply = supplier.handle_info_request(&obj("f1"), "peer1");
		assert!(matches!(reply, AvailabilityMessage::InfoResponse { .. }));

		let sent = supplier.announce_new_range(&obj("f1"), Range { offset: 5, length: 5 }, Some(10));
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].0, "peer1");
	}

	#[test]
	fn consumer_flush_splits_priority_and_batches() {
		let mut consumer = AvailabilityConsumer::new();
		for i in 0..250 {
			consumer.subscribe(obj(&format!("f{i}")), "peer1");
		}
		// Force the flush timer.
		consumer.last_flush = Instant::now() - SUBSCRIPTION_FLUSH_INTERVAL;
		assert!(consumer.should_flush(1));
		let flushed = consumer.flush();
		let envelopes = &flushed["peer1"];
		// 5 priority singletons + ceil(245/100) = 3 batches = 8 envelopes.
		assert_eq!(envelopes.len(), 8);
		assert_eq!(envelopes[0].len(), 1);
		assert_eq!(envelopes[5].len(), 100);
		assert_eq!(envelopes[7].len(), 45);
		assert_eq!(consumer.pending_count(), 0);
	}
}

// vim: ts=4
