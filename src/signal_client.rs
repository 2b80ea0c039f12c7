//! JSON-over-WebSocket client for the signal server (SPEC_FULL §6).
//!
//! The signal server brokers peer discovery and relays SDP offer/answer/ICE
//! candidate exchange, keyed by (peer_id, channel_id), so two nodes can
//! negotiate a WebRTC data channel without a direct connection yet.
//! `SignalClient` is a trait so `ConnectivityManager` never depends on
//! `tokio-tungstenite` directly; `TungsteniteSignalClient` is the concrete,
//! compiled implementation. Grounded on `protocol/internal_client.rs`'s
//! channel-handoff shape, adapted from in-process channels to a WebSocket.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::RemoteError;

/// One JSON frame received from the signal server (SPEC_FULL §6).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalEvent {
	NodeListObtained { peers: Vec<String> },
	NodeConnect { peer_id: String },
	NodeDisconnect { peer_id: String },
	ServerDisconnect,
	SdpMessage { peer_id: String, channel_id: u64, sdp_type: SdpType, payload: String },
}

/// Kind of payload carried by an `SdpMessage` frame.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SdpType {
	Offer,
	Answer,
	Candidate,
}

/// Outbound frames this node sends to the signal server.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalCommand {
	SdpMessage { peer_id: String, channel_id: u64, sdp_type: SdpType, payload: String },
}

/// Client-side contract of the signal-server protocol. `ConnectivityManager`
/// depends only on this trait for peer discovery and SDP relay.
#[async_trait]
pub trait SignalClient: Send + Sync {
	async fn send_sdp(&self, peer_id: &str, channel_id: u64, sdp_type: SdpType, payload: String) -> Result<(), RemoteError>;

	/// Pull the next signal-server event, blocking until one arrives or the
	/// connection drops.
	async fn recv(&self) -> Option<SignalEvent>;
}

/// `tokio-tungstenite`-backed client. A background task owns the socket and
/// forwards decoded frames through an internal channel so `recv()` never
/// contends with outbound sends.
pub struct TungsteniteSignalClient {
	outbound: mpsc::Sender<WsMessage>,
	inbound: Mutex<mpsc::Receiver<SignalEvent>>,
}

impl TungsteniteSignalClient {
	pub async fn connect(url: &str) -> Result<Self, RemoteError> {
		let (stream, _response) =
			tokio_tungstenite::connect_async(url).await.map_err(|e| RemoteError::Transport { source: Box::new(e) })?;
		let (mut write, mut read) = stream.split();

		let (out_tx, mut out_rx) = mpsc::channel::<WsMessage>(64);
		let (in_tx, in_rx) = mpsc::channel::<SignalEvent>(64);

		tokio::spawn(async move {
			while let Some(msg) = out_rx.recv().await {
				if write.send(msg).await.is_err() {
					break;
				}
			}
		});

		tokio::spawn(async move {
			while let Some(Ok(msg)) = read.next().await {
				if let WsMessage::Text(text) = msg {
					if let Ok(event) = serde_json::from_str::<SignalEvent>(&text) {
						if in_tx.send(event).await.is_err() {
							break;
						}
					}
				}
			}
			let _ = in_tx.send(SignalEvent::ServerDisconnect).await;
		});

		Ok(TungsteniteSignalClient { outbound: out_tx, inbound: Mutex::new(in_rx) })
	}
}

#[async_trait]
impl SignalClient for TungsteniteSignalClient {
	async fn send_sdp(&self, peer_id: &str, channel_id: u64, sdp_type: SdpType, payload: String) -> Result<(), RemoteError> {
		let cmd = SignalCommand::SdpMessage { peer_id: peer_id.to_string(), channel_id, sdp_type, payload };
		let text = serde_json::to_string(&cmd).map_err(|e| RemoteError::BadResponse { message: e.to_string() })?;
		self.outbound.send(WsMessage::Text(text.into())).await.map_err(|_| RemoteError::Disconnected)
	}

	async fn recv(&self) -> Option<SignalEvent> {
		self.inbound.lock().await.recv().await
	}
}

/// Shared handle so both the connectivity layer and the UI-facing task can
/// hold a reference to the same signal connection.
pub type SharedSignalClient = Arc<dyn SignalClient>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn node_connect_round_trips_through_json() {
		let event = SignalEvent::NodeConnect { peer_id: "peer-1".into() };
		let json = serde_json::to_string(&event).unwrap();
		let decoded: SignalEvent = serde_json::from_str(&json).unwrap();
		assert_eq!(decoded, event);
	}

	#[test]
	fn sdp_message_round_trips_with_candidate_type() {
		let event =
			SignalEvent::SdpMessage { peer_id: "peer-2".into(), channel_id: 7, sdp_type: SdpType::Candidate, payload: "candidate:1 1 UDP".into() };
		let json = serde_json::to_string(&event).unwrap();
		let decoded: SignalEvent = serde_json::from_str(&json).unwrap();
		assert_eq!(decoded, event);
	}

	#[test]
	fn signal_command_serializes_as_sdp_message() {
		let cmd = SignalCommand::SdpMessage { peer_id: "peer-3".into(), channel_id: 1, sdp_type: SdpType::Offer, payload: "v=0".into() };
		let json = serde_json::to_string(&cmd).unwrap();
		assert!(json.contains("\"type\":\"sdp_message\""));
	}
}

// vim: ts=4
