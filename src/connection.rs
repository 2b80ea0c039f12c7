//! Peer connectivity: a pool of bidirectional WebRTC data channels per peer
//! (SPEC_FULL §4.3).
//!
//! Generalized from the original `Node`/`ConnectionType` SSH-subprocess
//! transport (this module used to spawn `ssh host syncr serve path`) into a
//! real multi-peer data-channel pool. The connect/connect_all error-handling
//! shape and the `Node` naming survive; the transport underneath is now
//! `webrtc::data_channel::RTCDataChannel` instead of a child process's
//! stdio pipes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::error::ConnectionError;

/// Per-peer outgoing channel hard cap (SPEC_FULL §4.3).
pub const MAX_OUTGOING_PER_PEER: usize = 8;

/// Channel considered failed if not open within this long.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Debounce window for coalescing reconnect attempts.
pub const RECONNECT_DEBOUNCE: Duration = Duration::from_secs(1);

/// A message is rescheduled after this long when no channel qualifies.
pub const RESEND_INTERVAL: Duration = Duration::from_millis(250);

/// A message is rescheduled after this long when the upload limiter's token
/// bucket is empty.
pub const LIMITER_RETRY_INTERVAL: Duration = Duration::from_millis(15);

/// Channels stay below half of this before they're considered for sending.
pub const MAX_BUFFER_CAPACITY: u64 = 16 * 1024 * 1024;

/// Per-peer outgoing channel cap: ceil(5 / online_peers) + 1, capped at
/// `MAX_OUTGOING_PER_PEER`.
pub fn outgoing_channel_cap(online_peers: usize) -> usize {
	if online_peers == 0 {
		return MAX_OUTGOING_PER_PEER.min(5 + 1);
	}
	let dividend = 5usize;
	let ceil_div = dividend.div_ceil(online_peers);
	(ceil_div + 1).min(MAX_OUTGOING_PER_PEER)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
	Incoming,
	Outgoing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelClass {
	Direct,
	Relayed,
	Unknown,
}

/// A single data channel to a peer. The real `RTCDataChannel` handle lives
/// behind the transport trait (`DataChannelHandle`) so the bookkeeping here
/// (buffered amount, classification, open/closed) is plain and unit
/// testable without a live WebRTC stack.
pub struct Channel {
	pub peer_id: String,
	pub channel_id: u64,
	pub direction: Direction,
	pub open: bool,
	pub buffered_amount: u64,
	pub used: bool,
	pub class: ChannelClass,
	handle: Arc<dyn DataChannelHandle>,
}

/// Transport boundary: the concrete WebRTC data channel. A production build
/// wires this to `webrtc::data_channel::RTCDataChannel`; tests use an
/// in-memory fake.
#[async_trait::async_trait]
pub trait DataChannelHandle: Send + Sync {
	async fn send(&self, data: &[u8]) -> Result<(), ConnectionError>;
	fn buffered_amount(&self) -> u64;
	fn is_open(&self) -> bool;
}

struct TokenBucket {
	capacity: u64,
	tokens: u64,
	rate_per_sec: u64,
	last_refill: Instant,
}

impl TokenBucket {
	fn new(capacity: u64, rate_per_sec: u64) -> Self {
		TokenBucket { capacity, tokens: capacity, rate_per_sec, last_refill: Instant::now() }
	}

	fn refill(&mut self) {
		let elapsed = self.last_refill.elapsed().as_secs_f64();
		let add = (elapsed * self.rate_per_sec as f64) as u64;
		if add > 0 {
			self.tokens = (self.tokens + add).min(self.capacity);
			self.last_refill = Instant::now();
		}
	}

	/// Try to deduct `amount` tokens; returns whether the deduction
	/// succeeded.
	fn try_take(&mut self, amount: u64) -> bool {
		self.refill();
		if self.tokens >= amount {
			self.tokens -= amount;
			true
		} else {
			false
		}
	}
}

struct PeerChannels {
	incoming: Vec<Channel>,
	outgoing: Vec<Channel>,
}

/// Maintains a pool of data channels to online peers: reconnection, upload
/// rate limiting, and direct-vs-relayed classification (SPEC_FULL §4.3).
pub struct ConnectivityManager {
	peers: RwLock<HashMap<String, PeerChannels>>,
	limiter: Option<Mutex<TokenBucket>>,
	next_channel_id: std::sync::atomic::AtomicU64,
}

impl ConnectivityManager {
	pub fn new(limiter: Option<(u64, u64)>) -> Self {
		ConnectivityManager {
			peers: RwLock::new(HashMap::new()),
			limiter: limiter.map(|(cap, rate)| Mutex::new(TokenBucket::new(cap, rate))),
			next_channel_id: std::sync::atomic::AtomicU64::new(1),
		}
	}

	pub async fn register_channel(
		&self,
		peer_id: &str,
		direction: Direction,
		handle: Arc<dyn DataChannelHandle>,
	) -> u64 {
		let channel_id = self.next_channel_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
		let channel = Channel {
			peer_id: peer_id.to_string(),
			channel_id,
			direction,
			open: handle.is_open(),
			buffered_amount: handle.buffered_amount(),
			used: false,
			class: ChannelClass::Unknown,
			handle,
		};
		let mut peers = self.peers.write().await;
		let entry = peers.entry(peer_id.to_string()).or_insert_with(|| PeerChannels {
			incoming: Vec::new(),
			outgoing: Vec::new(),
		});
		match direction {
			Direction::Incoming => entry.incoming.push(channel),
			Direction::Outgoing => entry.outgoing.push(channel),
		}
		channel_id
	}

	pub async fn classify(&self, peer_id: &str, channel_id: u64, class: ChannelClass) {
		let mut peers = self.peers.write().await;
		if let Some(entry) = peers.get_mut(peer_id) {
			for channel in entry.incoming.iter_mut().chain(entry.outgoing.iter_mut()) {
				if channel.channel_id == channel_id {
					channel.class = class;
				}
			}
		}
	}

	pub async fn outgoing_count(&self, peer_id: &str) -> usize {
		self.peers.read().await.get(peer_id).map(|p| p.outgoing.len()).unwrap_or(0)
	}

	/// Per-peer outgoing count must never exceed `outgoing_channel_cap`.
	pub async fn can_open_outgoing(&self, peer_id: &str, online_peers: usize) -> bool {
		self.outgoing_count(peer_id).await < outgoing_channel_cap(online_peers)
	}

	/// Pick a random open channel in `direction` whose buffered amount is
	/// below half of `MAX_BUFFER_CAPACITY`, deduct from the upload limiter
	/// if attached, and send. Returns `Err(ConnectionError::Timeout)` to
	/// signal "reschedule" without actually sleeping -- callers own their
	/// own retry loop per SPEC_FULL §4.3's RESEND_INTERVAL/15ms policy.
	pub async fn send(
		&self,
		peer_id: &str,
		payload: &[u8],
		by_incoming_channel: bool,
	) -> Result<(), ConnectionError> {
		if let Some(limiter) = &self.limiter {
			let mut bucket = limiter.lock().await;
			if !bucket.try_take(payload.len() as u64) {
				return Err(ConnectionError::Timeout);
			}
		}

		let peers = self.peers.read().await;
		let entry = peers.get(peer_id).ok_or(ConnectionError::Disconnected)?;
		let candidates = if by_incoming_channel { &entry.incoming } else { &entry.outgoing };
		let eligible: Vec<&Channel> = candidates
			.iter()
			.filter(|c| c.open && c.buffered_amount < MAX_BUFFER_CAPACITY / 2)
			.collect();
		let chosen = eligible
			.get(fastrand_index(eligible.len()))
			.ok_or(ConnectionError::Timeout)?;
		chosen.handle.send(payload).await
	}

	/// Send a batch of messages in order using `predicate` to decide
	/// whether each should still be sent. Returns the tail that was left
	/// unsent when the predicate first returned false.
	pub async fn send_batch<'a>(
		&self,
		peer_id: &str,
		messages: &'a [Vec<u8>],
		by_incoming_channel: bool,
		mut predicate: impl FnMut(usize) -> bool,
	) -> &'a [Vec<u8>] {
		for (i, message) in messages.iter().enumerate() {
			if !predicate(i) {
				return &messages[i..];
			}
			if self.send(peer_id, message, by_incoming_channel).await.is_err() {
				return &messages[i..];
			}
		}
		&[]
	}

	/// Wipe all channels for every peer, as happens when the signal-server
	/// connection is lost.
	pub async fn disconnect_from_all_nodes(&self) -> (Vec<String>, Vec<String>) {
		let mut peers = self.peers.write().await;
		let incoming: Vec<String> = peers.keys().cloned().collect();
		let outgoing = incoming.clone();
		peers.clear();
		(incoming, outgoing)
	}

	/// Idempotent per-peer disconnect.
	pub async fn disconnect_peer(&self, peer_id: &str) {
		self.peers.write().await.remove(peer_id);
	}
}

fn fastrand_index(len: usize) -> usize {
	if len == 0 {
		return 0;
	}
	// Simple time-seeded choice; the teacher's dependency set has no `rand`
	// crate, and a fair pick among a handful of channels doesn't need one.
	let nanos = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.subsec_nanos())
		.unwrap_or(0);
	(nanos as usize) % len
}


// vim: ts=4
